//! Configuration agent wire types and client.
//!
//! Hand-maintained subset of the `ligato.configurator` and `ligato.vpp`
//! protobuf packages: only the fields the sidecar reads or writes. Field
//! tags match the agent's schema; everything else the agent sends is
//! skipped on decode.

use tonic::codegen::http::uri::PathAndQuery;
use tonic::transport::Channel;

/// `ligato.vpp.l3.Route.RouteType`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum RouteType {
    /// Forwarding within one VRF.
    IntraVrf = 0,
    /// Forwarding across VRFs; what the sidecar installs.
    InterVrf = 1,
    /// Drop route.
    Drop = 2,
}

/// `ligato.vpp.l3.Route`
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Route {
    #[prost(uint32, tag = "1")]
    pub vrf_id: u32,
    #[prost(string, tag = "3")]
    pub dst_network: ::prost::alloc::string::String,
    #[prost(string, tag = "4")]
    pub next_hop_addr: ::prost::alloc::string::String,
    #[prost(string, tag = "5")]
    pub outgoing_interface: ::prost::alloc::string::String,
    #[prost(uint32, tag = "6")]
    pub weight: u32,
    #[prost(uint32, tag = "7")]
    pub preference: u32,
    #[prost(uint32, tag = "8")]
    pub via_vrf_id: u32,
    #[prost(enumeration = "RouteType", tag = "10")]
    pub r#type: i32,
}

/// `ligato.vpp.interfaces.Interface`
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Interface {
    #[prost(string, tag = "1")]
    pub name: ::prost::alloc::string::String,
    #[prost(bool, tag = "3")]
    pub enabled: bool,
    #[prost(string, repeated, tag = "8")]
    pub ip_addresses: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
}

/// `ligato.vpp.ConfigData`
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct VppConfigData {
    #[prost(message, repeated, tag = "10")]
    pub interfaces: ::prost::alloc::vec::Vec<Interface>,
    #[prost(message, repeated, tag = "40")]
    pub routes: ::prost::alloc::vec::Vec<Route>,
}

/// `ligato.configurator.Config`
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Config {
    #[prost(message, optional, tag = "1")]
    pub vpp_config: ::core::option::Option<VppConfigData>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct UpdateRequest {
    #[prost(message, optional, tag = "1")]
    pub update: ::core::option::Option<Config>,
    #[prost(bool, tag = "2")]
    pub full_resync: bool,
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct UpdateResponse {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DeleteRequest {
    #[prost(message, optional, tag = "1")]
    pub delete: ::core::option::Option<Config>,
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct DeleteResponse {}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct GetRequest {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetResponse {
    #[prost(message, optional, tag = "1")]
    pub config: ::core::option::Option<Config>,
}

/// Unary client for `ligato.configurator.ConfiguratorService`.
#[derive(Debug, Clone)]
pub struct ConfiguratorServiceClient {
    inner: tonic::client::Grpc<Channel>,
}

impl ConfiguratorServiceClient {
    const GET: &'static str = "/ligato.configurator.ConfiguratorService/Get";
    const UPDATE: &'static str = "/ligato.configurator.ConfiguratorService/Update";
    const DELETE: &'static str = "/ligato.configurator.ConfiguratorService/Delete";

    pub fn new(channel: Channel) -> Self {
        Self {
            inner: tonic::client::Grpc::new(channel),
        }
    }

    pub async fn get(
        &mut self,
        request: impl tonic::IntoRequest<GetRequest>,
    ) -> Result<tonic::Response<GetResponse>, tonic::Status> {
        self.unary(request.into_request(), Self::GET).await
    }

    pub async fn update(
        &mut self,
        request: impl tonic::IntoRequest<UpdateRequest>,
    ) -> Result<tonic::Response<UpdateResponse>, tonic::Status> {
        self.unary(request.into_request(), Self::UPDATE).await
    }

    pub async fn delete(
        &mut self,
        request: impl tonic::IntoRequest<DeleteRequest>,
    ) -> Result<tonic::Response<DeleteResponse>, tonic::Status> {
        self.unary(request.into_request(), Self::DELETE).await
    }

    async fn unary<Req, Resp>(
        &mut self,
        request: tonic::Request<Req>,
        path: &'static str,
    ) -> Result<tonic::Response<Resp>, tonic::Status>
    where
        Req: ::prost::Message + Send + Sync + 'static,
        Resp: ::prost::Message + Default + Send + Sync + 'static,
    {
        self.inner
            .ready()
            .await
            .map_err(|e| tonic::Status::unknown(format!("Service was not ready: {}", e)))?;
        let codec = tonic::codec::ProstCodec::<Req, Resp>::default();
        self.inner
            .unary(request, PathAndQuery::from_static(path), codec)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    #[test]
    fn test_route_encoding_tags() {
        let route = Route {
            dst_network: "10.0.1.0/24".to_string(),
            next_hop_addr: "10.0.0.5".to_string(),
            r#type: RouteType::InterVrf as i32,
            ..Default::default()
        };
        let bytes = route.encode_to_vec();
        // dst_network: field 3, wire type 2
        assert_eq!(bytes[0], 0x1a);
        // type is the last field written: field 10 varint, value 1
        assert_eq!(&bytes[bytes.len() - 2..], &[0x50, 0x01]);
    }

    #[test]
    fn test_get_response_skips_unknown_fields() {
        let mut bytes = GetResponse {
            config: Some(Config {
                vpp_config: Some(VppConfigData {
                    interfaces: vec![Interface {
                        name: "memif1/1".to_string(),
                        enabled: true,
                        ip_addresses: vec!["192.168.3.2/30".to_string()],
                    }],
                    routes: vec![],
                }),
            }),
        }
        .encode_to_vec();
        // Trailing field 99 (varint) the sidecar does not model
        bytes.extend_from_slice(&[0x98, 0x06, 0x01]);

        let decoded = GetResponse::decode(bytes.as_slice()).unwrap();
        let interfaces = decoded.config.unwrap().vpp_config.unwrap().interfaces;
        assert_eq!(interfaces.len(), 1);
        assert_eq!(interfaces[0].ip_addresses, vec!["192.168.3.2/30"]);
    }
}
