// src/connection/management.rs
//! Management interface of the target process
//!
//! The target exposes named management objects with invokable operations.
//! [`ManagementConnection`] is the untyped transport; [`FlightRecorder`] and
//! [`LinkingMetadata`] are typed facades that check every reply's shape.
//!
//! ```text
//! RecordingSession ──► FlightRecorder ──┐
//!                                       ├──► Arc<dyn ManagementConnection> ──► target
//! EntityResolver ───► LinkingMetadata ──┘
//! ```

use crate::utils::errors::{DaemonError, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Management object controlling the target's diagnostic recordings
pub const FLIGHT_RECORDER_OBJECT: &str = "jdk.management.jfr:type=FlightRecorder";

/// Management object published by an in-process agent for entity linking
pub const LINKING_METADATA_OBJECT: &str = "com.newrelic.jfr:type=LinkingMetadata";

/// Linking metadata key carrying the entity guid
pub const ENTITY_GUID_KEY: &str = "entity.guid";

/// Argument or result of a management operation
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Long(i64),
    Bool(bool),
    Text(String),
    Bytes(Vec<u8>),
    /// String-to-string table (options maps, metadata)
    Table(BTreeMap<String, String>),
}

impl Value {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Long(_) => "long",
            Value::Bool(_) => "bool",
            Value::Text(_) => "text",
            Value::Bytes(_) => "bytes",
            Value::Table(_) => "table",
        }
    }

    pub fn table<K, V, I>(entries: I) -> Self
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        Value::Table(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

fn describe(value: &Option<Value>) -> String {
    match value {
        Some(v) => v.kind_name().to_string(),
        None => "null".to_string(),
    }
}

/// An established connection to the target's management interface
///
/// Any `Err` from `invoke` other than a shape mismatch means the connection
/// must be considered broken.
#[async_trait]
pub trait ManagementConnection: Send + Sync {
    /// Invoke `operation` on the management object `target`.
    async fn invoke(&self, target: &str, operation: &str, args: Vec<Value>) -> Result<Option<Value>>;

    /// Release the connection. Best effort.
    async fn close(&self) {}
}

/// Produces fresh management connections
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn ManagementConnection>>;
}

/// Options applied to a recording before it starts
#[derive(Debug, Clone)]
pub struct RecordingOptions {
    pub name: String,
    pub to_disk: bool,
    pub max_age: Duration,
}

impl RecordingOptions {
    fn to_value(&self) -> Value {
        Value::table([
            ("name", self.name.clone()),
            ("disk", self.to_disk.to_string()),
            ("maxAge", format!("{}s", self.max_age.as_secs())),
        ])
    }
}

/// Typed view of the recording management object
#[derive(Clone)]
pub struct FlightRecorder {
    connection: Arc<dyn ManagementConnection>,
}

impl FlightRecorder {
    pub fn new(connection: Arc<dyn ManagementConnection>) -> Self {
        Self { connection }
    }

    pub fn connection(&self) -> &Arc<dyn ManagementConnection> {
        &self.connection
    }

    async fn call(&self, operation: &str, args: Vec<Value>) -> Result<Option<Value>> {
        debug!("Invoking {} with {} argument(s)", operation, args.len());
        self.connection
            .invoke(FLIGHT_RECORDER_OBJECT, operation, args)
            .await
    }

    async fn call_long(&self, operation: &str, args: Vec<Value>) -> Result<i64> {
        match self.call(operation, args).await? {
            Some(Value::Long(id)) => Ok(id),
            other => Err(DaemonError::shape(operation, "long", describe(&other))),
        }
    }

    /// Create a recording; returns its id.
    pub async fn new_recording(&self) -> Result<i64> {
        self.call_long("newRecording", vec![]).await
    }

    /// Apply one of the target's predefined configurations (e.g. `profile`).
    pub async fn set_predefined_configuration(&self, id: i64, configuration: &str) -> Result<()> {
        self.call(
            "setPredefinedConfiguration",
            vec![Value::Long(id), Value::Text(configuration.to_string())],
        )
        .await?;
        Ok(())
    }

    pub async fn set_recording_options(&self, id: i64, options: &RecordingOptions) -> Result<()> {
        self.call("setRecordingOptions", vec![Value::Long(id), options.to_value()])
            .await?;
        Ok(())
    }

    pub async fn start_recording(&self, id: i64) -> Result<()> {
        self.call("startRecording", vec![Value::Long(id)]).await?;
        Ok(())
    }

    /// Clone a running recording without stopping it; returns the clone's id.
    pub async fn clone_recording(&self, id: i64) -> Result<i64> {
        self.call_long("cloneRecording", vec![Value::Long(id), Value::Bool(true)])
            .await
    }

    /// Open a block stream over a recording; returns the stream id.
    pub async fn open_stream(&self, id: i64, block_size: usize) -> Result<i64> {
        let options = Value::table([("blockSize", block_size.to_string())]);
        self.call_long("openStream", vec![Value::Long(id), options]).await
    }

    /// Next block of a stream. `None` marks the end of the stream.
    pub async fn read_stream(&self, stream_id: i64) -> Result<Option<Vec<u8>>> {
        match self.call("readStream", vec![Value::Long(stream_id)]).await? {
            None => Ok(None),
            Some(Value::Bytes(bytes)) => Ok(Some(bytes)),
            other => Err(DaemonError::shape("readStream", "bytes", describe(&other))),
        }
    }

    pub async fn close_stream(&self, stream_id: i64) -> Result<()> {
        self.call("closeStream", vec![Value::Long(stream_id)]).await?;
        Ok(())
    }

    /// Ask the target to write a recording to a path on its filesystem.
    pub async fn copy_to(&self, id: i64, path: &str) -> Result<()> {
        self.call("copyTo", vec![Value::Long(id), Value::Text(path.to_string())])
            .await?;
        Ok(())
    }

    pub async fn close_recording(&self, id: i64) -> Result<()> {
        self.call("closeRecording", vec![Value::Long(id)]).await?;
        Ok(())
    }
}

/// Typed view of the agent's linking metadata object
#[derive(Clone)]
pub struct LinkingMetadata {
    connection: Arc<dyn ManagementConnection>,
}

impl LinkingMetadata {
    pub fn new(connection: Arc<dyn ManagementConnection>) -> Self {
        Self { connection }
    }

    /// Read the metadata table published by the agent.
    pub async fn read(&self) -> Result<BTreeMap<String, String>> {
        let operation = "readLinkingMetadata";
        match self
            .connection
            .invoke(LINKING_METADATA_OBJECT, operation, vec![])
            .await?
        {
            Some(Value::Table(table)) => Ok(table),
            other => Err(DaemonError::shape(operation, "table", describe(&other))),
        }
    }

    /// The entity guid, if the agent has one yet.
    pub async fn entity_guid(&self) -> Result<Option<String>> {
        Ok(self.read().await?.remove(ENTITY_GUID_KEY))
    }
}
