// src/connection/fake.rs
//! Scripted in-memory target used by unit tests.

use crate::connection::management::{Connector, ManagementConnection, Value};
use crate::utils::errors::{DaemonError, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// One scripted reply to an operation
#[derive(Debug, Clone)]
pub enum Reply {
    Value(Value),
    Null,
    /// Remote operation failure
    Fail(String),
    /// Transport failure
    Disconnect(String),
}

/// Connection whose replies are queued per operation. Unscripted calls
/// answer `null`, except `newRecording`, `cloneRecording` and `openStream`
/// which hand out increasing ids.
#[derive(Default)]
pub struct FakeConnection {
    replies: Mutex<HashMap<String, VecDeque<Reply>>>,
    calls: Mutex<Vec<(String, Vec<Value>)>>,
    next_id: AtomicU32,
    closed: Mutex<bool>,
}

impl FakeConnection {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            next_id: AtomicU32::new(1),
            ..Default::default()
        })
    }

    pub fn script(&self, operation: &str, reply: Reply) {
        self.replies
            .lock()
            .entry(operation.to_string())
            .or_default()
            .push_back(reply);
    }

    pub fn calls(&self) -> Vec<(String, Vec<Value>)> {
        self.calls.lock().clone()
    }

    pub fn operations(&self) -> Vec<String> {
        self.calls.lock().iter().map(|(op, _)| op.clone()).collect()
    }

    pub fn count(&self, operation: &str) -> usize {
        self.calls.lock().iter().filter(|(op, _)| op == operation).count()
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.lock()
    }
}

#[async_trait]
impl ManagementConnection for FakeConnection {
    async fn invoke(&self, _target: &str, operation: &str, args: Vec<Value>) -> Result<Option<Value>> {
        self.calls.lock().push((operation.to_string(), args));

        let scripted = self
            .replies
            .lock()
            .get_mut(operation)
            .and_then(|queue| queue.pop_front());

        match scripted {
            Some(Reply::Value(v)) => Ok(Some(v)),
            Some(Reply::Null) => Ok(None),
            Some(Reply::Fail(msg)) => Err(DaemonError::RecordingFailed(msg)),
            Some(Reply::Disconnect(msg)) => Err(DaemonError::ConnectionFailed(msg)),
            None => match operation {
                "newRecording" | "cloneRecording" | "openStream" => Ok(Some(Value::Long(
                    self.next_id.fetch_add(1, Ordering::SeqCst) as i64,
                ))),
                _ => Ok(None),
            },
        }
    }

    async fn close(&self) {
        *self.closed.lock() = true;
    }
}

/// Connector handing out scripted outcomes, then a fallback connection
pub struct FakeConnector {
    outcomes: Mutex<VecDeque<Option<Arc<FakeConnection>>>>,
    fallback: Option<Arc<FakeConnection>>,
    attempts: AtomicU32,
}

impl FakeConnector {
    /// Always connects to `connection`
    pub fn to(connection: Arc<FakeConnection>) -> Self {
        Self {
            outcomes: Mutex::new(VecDeque::new()),
            fallback: Some(connection),
            attempts: AtomicU32::new(0),
        }
    }

    /// Never connects
    pub fn refusing() -> Self {
        Self {
            outcomes: Mutex::new(VecDeque::new()),
            fallback: None,
            attempts: AtomicU32::new(0),
        }
    }

    /// Queue a refused attempt
    pub fn then_refuse(self) -> Self {
        self.outcomes.lock().push_back(None);
        self
    }

    /// Queue a successful attempt on `connection`
    pub fn then_connect(self, connection: Arc<FakeConnection>) -> Self {
        self.outcomes.lock().push_back(Some(connection));
        self
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self) -> Result<Arc<dyn ManagementConnection>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let outcome = match self.outcomes.lock().pop_front() {
            Some(outcome) => outcome,
            None => self.fallback.clone(),
        };
        match outcome {
            Some(connection) => Ok(connection as Arc<dyn ManagementConnection>),
            None => Err(DaemonError::ConnectionFailed("connection refused".into())),
        }
    }
}
