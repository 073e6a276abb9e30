// src/connection/grpc.rs
//! gRPC transport for the management interface
//!
//! Talks to the management bridge next to the target over the single
//! `Management/Invoke` RPC. Transport-level failures surface as
//! `ConnectionFailed`; an operation the target rejected surfaces as
//! `RecordingFailed`.

use crate::connection::management::{Connector, ManagementConnection, Value};
use crate::generated::management::management_client::ManagementClient;
use crate::generated::management::{value::Kind, InvokeRequest, StringTable, Value as WireValue};
use crate::utils::errors::{DaemonError, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tonic::transport::{Channel, Endpoint};
use tonic::Code;
use tracing::{debug, info};

/// Headroom on top of the stream block size for message framing
const MESSAGE_OVERHEAD: usize = 1024 * 1024;

/// Connection settings for [`GrpcConnector`]
#[derive(Debug, Clone)]
pub struct GrpcConnectorConfig {
    /// `http://host:port` of the management bridge
    pub endpoint: String,

    /// Per-attempt connect timeout
    pub connect_timeout: Duration,

    /// Largest stream block that will be requested
    pub max_block_size: usize,
}

/// Opens [`GrpcManagementConnection`]s
pub struct GrpcConnector {
    config: GrpcConnectorConfig,
}

impl GrpcConnector {
    pub fn new(config: GrpcConnectorConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Connector for GrpcConnector {
    async fn connect(&self) -> Result<Arc<dyn ManagementConnection>> {
        let endpoint = Endpoint::from_shared(self.config.endpoint.clone())
            .map_err(|e| DaemonError::ConfigError(format!("Invalid target endpoint: {}", e)))?
            .connect_timeout(self.config.connect_timeout);

        debug!("Connecting to {}", self.config.endpoint);
        let channel = endpoint.connect().await.map_err(|e| {
            DaemonError::ConnectionFailed(format!("{}: {}", self.config.endpoint, e))
        })?;

        let limit = self.config.max_block_size.saturating_add(MESSAGE_OVERHEAD);
        let client = ManagementClient::new(channel).max_decoding_message_size(limit);

        info!("Opened management channel to {}", self.config.endpoint);
        Ok(Arc::new(GrpcManagementConnection { client }))
    }
}

/// Management connection over a tonic channel
pub struct GrpcManagementConnection {
    client: ManagementClient<Channel>,
}

#[async_trait]
impl ManagementConnection for GrpcManagementConnection {
    async fn invoke(&self, target: &str, operation: &str, args: Vec<Value>) -> Result<Option<Value>> {
        let request = InvokeRequest {
            target: target.to_string(),
            operation: operation.to_string(),
            arguments: args.into_iter().map(to_wire).collect(),
        };

        // Channel clones share the underlying connection.
        let mut client = self.client.clone();
        let response = client
            .invoke(request)
            .await
            .map_err(|status| status_to_error(operation, status))?;

        Ok(response.into_inner().result.and_then(from_wire))
    }
}

fn status_to_error(operation: &str, status: tonic::Status) -> DaemonError {
    match status.code() {
        Code::Unavailable | Code::DeadlineExceeded | Code::Cancelled | Code::Unknown => {
            DaemonError::ConnectionFailed(format!("{}: {}", operation, status.message()))
        }
        _ => DaemonError::RecordingFailed(format!(
            "{} rejected ({:?}): {}",
            operation,
            status.code(),
            status.message()
        )),
    }
}

fn to_wire(value: Value) -> WireValue {
    let kind = match value {
        Value::Long(v) => Kind::LongValue(v),
        Value::Bool(v) => Kind::BoolValue(v),
        Value::Text(v) => Kind::StringValue(v),
        Value::Bytes(v) => Kind::BytesValue(v),
        Value::Table(entries) => Kind::TableValue(StringTable {
            entries: entries.into_iter().collect(),
        }),
    };
    WireValue { kind: Some(kind) }
}

fn from_wire(value: WireValue) -> Option<Value> {
    Some(match value.kind? {
        Kind::LongValue(v) => Value::Long(v),
        Kind::BoolValue(v) => Value::Bool(v),
        Kind::StringValue(v) => Value::Text(v),
        Kind::BytesValue(v) => Value::Bytes(v),
        Kind::TableValue(table) => Value::Table(table.entries.into_iter().collect()),
    })
}
