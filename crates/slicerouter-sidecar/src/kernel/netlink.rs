//! rtnetlink-backed [`RouteTable`].
//!
//! Each call opens its own netlink connection; the connection task ends
//! when the handle is dropped.

use std::net::{IpAddr, Ipv4Addr};

use async_trait::async_trait;
use futures::TryStreamExt;
use ipnet::Ipv4Net;
use netlink_packet_route::address::{AddressAttribute, AddressMessage};
use netlink_packet_route::link::{LinkAttribute, LinkMessage};
use netlink_packet_route::route::{
    RouteAddress, RouteAttribute, RouteFlag, RouteHeader, RouteMessage,
};
use netlink_packet_route::AddressFamily;
use rtnetlink::{Handle, IpVersion};
use slicerouter_common::{DataplaneMode, InstalledRoute, RouterError, RouterResult};
use tracing::debug;

use super::{LinkInfo, RouteSpec, RouteTable};

/// Kernel tables reached over `NETLINK_ROUTE`.
#[derive(Debug, Default, Clone, Copy)]
pub struct NetlinkRouteTable;

impl NetlinkRouteTable {
    pub fn new() -> Self {
        Self
    }

    fn connect(operation: &str) -> RouterResult<Handle> {
        let (connection, handle, _) = rtnetlink::new_connection().map_err(|e| {
            RouterError::unreachable(DataplaneMode::Kernel, operation, e.to_string())
        })?;
        tokio::spawn(connection);
        Ok(handle)
    }
}

/// Converts a main-table IPv4 route message; other tables yield `None`.
fn route_from_message(msg: &RouteMessage) -> Option<InstalledRoute> {
    if msg.header.table != RouteHeader::RT_TABLE_MAIN {
        return None;
    }

    let mut route = InstalledRoute {
        destination: None,
        gateway: None,
        link_index: None,
    };
    for attr in &msg.attributes {
        match attr {
            RouteAttribute::Destination(RouteAddress::Inet(addr)) => {
                route.destination =
                    Ipv4Net::new(*addr, msg.header.destination_prefix_length).ok();
            }
            RouteAttribute::Gateway(RouteAddress::Inet(addr)) => route.gateway = Some(*addr),
            RouteAttribute::Oif(index) => route.link_index = Some(*index),
            _ => {}
        }
    }
    Some(route)
}

fn link_from_message(msg: &LinkMessage) -> LinkInfo {
    let mut link = LinkInfo {
        index: msg.header.index,
        name: String::new(),
        alias: None,
    };
    for attr in &msg.attributes {
        match attr {
            LinkAttribute::IfName(name) => link.name = name.clone(),
            LinkAttribute::IfAlias(alias) => link.alias = Some(alias.clone()),
            _ => {}
        }
    }
    link
}

/// The interface's own address: `IFA_LOCAL` when present (point-to-point
/// links put the peer in `IFA_ADDRESS`), otherwise `IFA_ADDRESS`.
fn ipv4_from_message(msg: &AddressMessage) -> Option<Ipv4Addr> {
    if msg.header.family != AddressFamily::Inet {
        return None;
    }

    let mut local = None;
    let mut address = None;
    for attr in &msg.attributes {
        match attr {
            AddressAttribute::Local(IpAddr::V4(addr)) => local = Some(*addr),
            AddressAttribute::Address(IpAddr::V4(addr)) => address = Some(*addr),
            _ => {}
        }
    }
    local.or(address)
}

#[async_trait]
impl RouteTable for NetlinkRouteTable {
    async fn routes(&self) -> RouterResult<Vec<InstalledRoute>> {
        let handle = Self::connect("route list")?;
        let mut stream = handle.route().get(IpVersion::V4).execute();

        let mut routes = Vec::new();
        while let Some(msg) = stream
            .try_next()
            .await
            .map_err(|e| RouterError::netlink("route list", e.to_string()))?
        {
            if let Some(route) = route_from_message(&msg) {
                routes.push(route);
            }
        }
        debug!(count = routes.len(), "Listed kernel routes");
        Ok(routes)
    }

    async fn replace_route(&self, route: &RouteSpec) -> RouterResult<()> {
        let handle = Self::connect("route replace")?;
        let mut request = handle
            .route()
            .add()
            .v4()
            .destination_prefix(route.destination.addr(), route.destination.prefix_len())
            .gateway(route.gateway)
            .output_interface(route.link_index)
            .replace();
        if route.onlink {
            request.message_mut().header.flags.push(RouteFlag::Onlink);
        }

        request
            .execute()
            .await
            .map_err(|e| RouterError::netlink("route replace", e.to_string()))
    }

    async fn links(&self) -> RouterResult<Vec<LinkInfo>> {
        let handle = Self::connect("link list")?;
        let mut stream = handle.link().get().execute();

        let mut links = Vec::new();
        while let Some(msg) = stream
            .try_next()
            .await
            .map_err(|e| RouterError::netlink("link list", e.to_string()))?
        {
            links.push(link_from_message(&msg));
        }
        Ok(links)
    }

    async fn ipv4_addresses(&self, link_index: u32) -> RouterResult<Vec<Ipv4Addr>> {
        let handle = Self::connect("address list")?;
        let mut stream = handle
            .address()
            .get()
            .set_link_index_filter(link_index)
            .execute();

        let mut addrs = Vec::new();
        while let Some(msg) = stream
            .try_next()
            .await
            .map_err(|e| RouterError::netlink("address list", e.to_string()))?
        {
            if let Some(addr) = ipv4_from_message(&msg) {
                addrs.push(addr);
            }
        }
        Ok(addrs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route_message(
        table: u8,
        dst: Option<(Ipv4Addr, u8)>,
        gw: Option<Ipv4Addr>,
        oif: u32,
    ) -> RouteMessage {
        let mut msg = RouteMessage::default();
        msg.header.address_family = AddressFamily::Inet;
        msg.header.table = table;
        if let Some((addr, len)) = dst {
            msg.header.destination_prefix_length = len;
            msg.attributes
                .push(RouteAttribute::Destination(RouteAddress::Inet(addr)));
        }
        if let Some(gw) = gw {
            msg.attributes
                .push(RouteAttribute::Gateway(RouteAddress::Inet(gw)));
        }
        msg.attributes.push(RouteAttribute::Oif(oif));
        msg
    }

    #[test]
    fn test_route_from_message() {
        let msg = route_message(
            RouteHeader::RT_TABLE_MAIN,
            Some((Ipv4Addr::new(10, 0, 1, 0), 24)),
            Some(Ipv4Addr::new(10, 0, 0, 5)),
            9,
        );
        let route = route_from_message(&msg).unwrap();
        assert_eq!(route.destination, Some("10.0.1.0/24".parse().unwrap()));
        assert_eq!(route.gateway, Some(Ipv4Addr::new(10, 0, 0, 5)));
        assert_eq!(route.link_index, Some(9));
    }

    #[test]
    fn test_default_route_has_no_destination() {
        let msg = route_message(
            RouteHeader::RT_TABLE_MAIN,
            None,
            Some(Ipv4Addr::new(172, 17, 0, 1)),
            2,
        );
        assert!(route_from_message(&msg).unwrap().is_default());
    }

    #[test]
    fn test_non_main_table_ignored() {
        // 255 is the kernel's local table
        let msg = route_message(
            255,
            Some((Ipv4Addr::new(127, 0, 0, 1), 32)),
            None,
            1,
        );
        assert!(route_from_message(&msg).is_none());
    }

    #[test]
    fn test_link_from_message() {
        let mut msg = LinkMessage::default();
        msg.header.index = 12;
        msg.attributes.push(LinkAttribute::IfName("vl3-a1b2".to_string()));
        msg.attributes
            .push(LinkAttribute::IfAlias("iperf-client-0".to_string()));

        let link = link_from_message(&msg);
        assert_eq!(link.index, 12);
        assert_eq!(link.name, "vl3-a1b2");
        assert_eq!(link.alias.as_deref(), Some("iperf-client-0"));
    }

    #[test]
    fn test_ipv4_prefers_local_attribute() {
        let mut msg = AddressMessage::default();
        msg.header.family = AddressFamily::Inet;
        msg.attributes
            .push(AddressAttribute::Address(IpAddr::V4(Ipv4Addr::new(192, 168, 3, 1))));
        msg.attributes
            .push(AddressAttribute::Local(IpAddr::V4(Ipv4Addr::new(192, 168, 3, 2))));
        assert_eq!(ipv4_from_message(&msg), Some(Ipv4Addr::new(192, 168, 3, 2)));

        let mut v6 = AddressMessage::default();
        v6.header.family = AddressFamily::Inet6;
        assert_eq!(ipv4_from_message(&v6), None);
    }
}
