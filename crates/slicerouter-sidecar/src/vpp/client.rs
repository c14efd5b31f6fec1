//! gRPC transport to the configuration agent.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use slicerouter_common::{DataplaneMode, RouterError, RouterResult};
use tonic::transport::Endpoint;
use tonic::Code;
use tracing::{debug, error, info};

use super::proto::{
    Config, ConfiguratorServiceClient, DeleteRequest, GetRequest, UpdateRequest, VppConfigData,
};
use super::ConfiguratorApi;

/// Talks to the agent over a fresh channel per request.
///
/// Dial and call together are bounded by `timeout`; the channel is dropped
/// when the request returns.
#[derive(Debug, Clone)]
pub struct GrpcConfigurator {
    endpoint: String,
    timeout: Duration,
}

impl GrpcConfigurator {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        Self {
            endpoint: endpoint.into(),
            timeout,
        }
    }

    fn uri(&self) -> String {
        if self.endpoint.contains("://") {
            self.endpoint.clone()
        } else {
            format!("http://{}", self.endpoint)
        }
    }

    async fn connect(&self, operation: &str) -> RouterResult<ConfiguratorServiceClient> {
        let endpoint = Endpoint::from_shared(self.uri())
            .map_err(|e| RouterError::invalid_config("vpp.agent_endpoint", e.to_string()))?
            .connect_timeout(self.timeout)
            .timeout(self.timeout);

        let channel = endpoint.connect().await.map_err(|e| {
            error!(endpoint = %self.endpoint, error = %e, "Can't dial configuration agent");
            RouterError::unreachable(DataplaneMode::Vpp, operation, e.to_string())
        })?;

        Ok(ConfiguratorServiceClient::new(channel))
    }

    /// Runs one request under the configured deadline.
    async fn with_deadline<T, F>(&self, operation: &str, fut: F) -> RouterResult<T>
    where
        F: Future<Output = RouterResult<T>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(RouterError::unreachable(
                DataplaneMode::Vpp,
                operation,
                format!("no answer within {}s", self.timeout.as_secs()),
            )),
        }
    }
}

fn status_to_error(operation: &str, status: tonic::Status) -> RouterError {
    match status.code() {
        Code::Unavailable | Code::DeadlineExceeded => {
            RouterError::unreachable(DataplaneMode::Vpp, operation, status.message())
        }
        code => RouterError::Rpc {
            operation: operation.to_string(),
            code: format!("{:?}", code),
            message: status.message().to_string(),
        },
    }
}

#[async_trait]
impl ConfiguratorApi for GrpcConfigurator {
    async fn update(&self, config: VppConfigData) -> RouterResult<()> {
        self.with_deadline("update", async {
            let mut client = self.connect("update").await?;
            info!(config = ?config, "Sending update to configuration agent");
            client
                .update(UpdateRequest {
                    update: Some(Config {
                        vpp_config: Some(config),
                    }),
                    full_resync: false,
                })
                .await
                .map_err(|status| {
                    error!(status = %status, "Failed to update vpp config");
                    status_to_error("update", status)
                })?;
            Ok(())
        })
        .await
    }

    async fn delete(&self, config: VppConfigData) -> RouterResult<()> {
        self.with_deadline("delete", async {
            let mut client = self.connect("delete").await?;
            info!(config = ?config, "Sending delete to configuration agent");
            client
                .delete(DeleteRequest {
                    delete: Some(Config {
                        vpp_config: Some(config),
                    }),
                })
                .await
                .map_err(|status| {
                    error!(status = %status, "Failed to delete vpp config");
                    status_to_error("delete", status)
                })?;
            Ok(())
        })
        .await
    }

    async fn get(&self) -> RouterResult<VppConfigData> {
        self.with_deadline("get", async {
            let mut client = self.connect("get").await?;
            let response = client.get(GetRequest {}).await.map_err(|status| {
                error!(status = %status, "Failed to get vpp config");
                status_to_error("get", status)
            })?;
            let config = response
                .into_inner()
                .config
                .and_then(|c| c.vpp_config)
                .unwrap_or_default();
            debug!(
                interfaces = config.interfaces.len(),
                routes = config.routes.len(),
                "Fetched vpp config"
            );
            Ok(config)
        })
        .await
    }
}
