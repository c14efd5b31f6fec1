//! Desired-state store: remote subnet to authoritative next hop.
//!
//! Entries are only written after the dataplane accepted the route, so the
//! store never claims a route the backend refused. Nothing is removed; a
//! newer next hop for the same subnet supersedes the old one. An entry whose
//! route was deleted from the backend without a successful replacement is
//! kept but marked withdrawn, and is no longer current.
//!
//! The store itself is not synchronized. [`SliceRouter`](crate::SliceRouter)
//! keeps it behind the same lock as the reconcile clock.

use std::collections::{BTreeMap, BTreeSet};
use std::net::Ipv4Addr;

use ipnet::Ipv4Net;
use slicerouter_common::RouteIntent;

/// Map of remote subnet to the next hop the sidecar installed for it.
///
/// Lookups never create entries. Iteration is ordered by subnet.
#[derive(Debug, Clone, Default)]
pub struct DesiredRouteTable {
    routes: BTreeMap<Ipv4Net, Ipv4Addr>,
    withdrawn: BTreeSet<Ipv4Net>,
}

impl DesiredRouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Returns the recorded next hop for `subnet`.
    pub fn get(&self, subnet: &Ipv4Net) -> Option<Ipv4Addr> {
        self.routes.get(subnet).copied()
    }

    /// Returns true if `intent` is exactly what is recorded and its route
    /// has not been withdrawn.
    pub fn is_current(&self, intent: &RouteIntent) -> bool {
        self.get(&intent.remote_subnet) == Some(intent.next_hop)
            && !self.is_withdrawn(&intent.remote_subnet)
    }

    /// Records `intent`, returning the next hop it superseded.
    pub fn record(&mut self, intent: &RouteIntent) -> Option<Ipv4Addr> {
        self.withdrawn.remove(&intent.remote_subnet);
        self.routes.insert(intent.remote_subnet, intent.next_hop)
    }

    /// Marks the recorded route for `subnet` as deleted from the backend.
    ///
    /// The entry stays until a new route for the subnet is recorded.
    pub fn mark_withdrawn(&mut self, subnet: Ipv4Net) {
        if self.routes.contains_key(&subnet) {
            self.withdrawn.insert(subnet);
        }
    }

    pub fn is_withdrawn(&self, subnet: &Ipv4Net) -> bool {
        self.withdrawn.contains(subnet)
    }

    /// Records `intent` only if the subnet still maps to `expected`.
    ///
    /// Returns false and leaves the store untouched when another writer got
    /// there first.
    pub fn compare_and_set(&mut self, intent: &RouteIntent, expected: Option<Ipv4Addr>) -> bool {
        if self.get(&intent.remote_subnet) != expected {
            return false;
        }
        self.record(intent);
        true
    }

    /// Iterates recorded routes in subnet order.
    pub fn iter(&self) -> impl Iterator<Item = RouteIntent> + '_ {
        self.routes
            .iter()
            .map(|(subnet, next_hop)| RouteIntent::new(*subnet, *next_hop))
    }

    /// Snapshot of all recorded routes.
    pub fn to_vec(&self) -> Vec<RouteIntent> {
        self.iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn intent(subnet: &str, next_hop: &str) -> RouteIntent {
        RouteIntent::parse(subnet, next_hop).unwrap()
    }

    #[test]
    fn test_get_does_not_create_entries() {
        let table = DesiredRouteTable::new();
        assert!(table.get(&"10.1.0.0/16".parse().unwrap()).is_none());
        assert!(table.is_empty());
    }

    #[test]
    fn test_record_and_supersede() {
        let mut table = DesiredRouteTable::new();
        assert_eq!(table.record(&intent("10.1.0.0/16", "192.168.3.1")), None);
        assert!(table.is_current(&intent("10.1.0.0/16", "192.168.3.1")));

        let prior = table.record(&intent("10.1.0.0/16", "192.168.3.5"));
        assert_eq!(prior, Some(Ipv4Addr::new(192, 168, 3, 1)));
        assert!(!table.is_current(&intent("10.1.0.0/16", "192.168.3.1")));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_compare_and_set() {
        let mut table = DesiredRouteTable::new();
        let first = intent("10.2.0.0/16", "10.0.0.5");
        let second = intent("10.2.0.0/16", "10.0.0.9");

        assert!(table.compare_and_set(&first, None));
        // Stale expectation is rejected
        assert!(!table.compare_and_set(&second, None));
        assert!(table.is_current(&first));

        assert!(table.compare_and_set(&second, Some(Ipv4Addr::new(10, 0, 0, 5))));
        assert!(table.is_current(&second));
    }

    #[test]
    fn test_iter_is_ordered_by_subnet() {
        let mut table = DesiredRouteTable::new();
        table.record(&intent("10.3.0.0/16", "10.0.0.1"));
        table.record(&intent("10.1.0.0/16", "10.0.0.1"));
        table.record(&intent("10.2.0.0/16", "10.0.0.1"));

        let subnets: Vec<String> = table.iter().map(|i| i.remote_subnet.to_string()).collect();
        assert_eq!(subnets, vec!["10.1.0.0/16", "10.2.0.0/16", "10.3.0.0/16"]);
    }

    #[test]
    fn test_withdrawn_entry_is_not_current() {
        let mut table = DesiredRouteTable::new();
        let route = intent("10.1.0.0/16", "192.168.3.1");
        table.record(&route);

        table.mark_withdrawn(route.remote_subnet);
        assert!(table.is_withdrawn(&route.remote_subnet));
        assert!(!table.is_current(&route));
        // Still recorded
        assert_eq!(table.get(&route.remote_subnet), Some(route.next_hop));

        table.record(&route);
        assert!(!table.is_withdrawn(&route.remote_subnet));
        assert!(table.is_current(&route));
    }

    #[test]
    fn test_withdraw_unknown_subnet_is_ignored() {
        let mut table = DesiredRouteTable::new();
        let subnet = "10.1.0.0/16".parse().unwrap();
        table.mark_withdrawn(subnet);
        assert!(!table.is_withdrawn(&subnet));
    }
}
