// src/telemetry/entity.rs
//! Background entity guid resolution
//!
//! An agent running inside the target may publish an entity guid through its
//! linking metadata. When it does, the guid is merged into the common
//! attributes so later batches link to that entity.
//!
//! - no metadata object (no agent): give up, no guid
//! - object present but no guid yet: poll again with backoff
//! - connection lost while polling: back off, reconnect, poll again

use crate::connection::backoff::{Backoff, BackoffPolicy};
use crate::connection::management::{LinkingMetadata, ManagementConnection};
use crate::connection::supervisor::ConnectionSupervisor;
use crate::telemetry::attributes::{Attributes, CommonAttributes, ENTITY_GUID};
use crate::utils::errors::{DaemonError, Result};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub struct EntityGuidResolver {
    supervisor: ConnectionSupervisor,
    common: Arc<CommonAttributes>,
    poll_policy: BackoffPolicy,
}

impl EntityGuidResolver {
    pub fn new(supervisor: ConnectionSupervisor, common: Arc<CommonAttributes>) -> Self {
        Self {
            supervisor,
            common,
            poll_policy: BackoffPolicy::wait_forever(),
        }
    }

    /// Policy used while the agent is present but has no guid yet
    pub fn with_poll_policy(mut self, policy: BackoffPolicy) -> Self {
        self.poll_policy = policy;
        self
    }

    /// Run resolution on the runtime; failures are logged.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            if let Err(e) = self.resolve().await {
                warn!("Entity guid resolution stopped: {}", e);
            }
        })
    }

    /// Connect, poll for the guid and publish it. Returns the guid found.
    pub async fn resolve(&self) -> Result<Option<String>> {
        let mut backoff = self.poll_policy.start();

        let guid = loop {
            let connection = self
                .supervisor
                .await_connection(&BackoffPolicy::wait_forever())
                .await?;

            let polled = self.await_entity_guid(Arc::clone(&connection), &mut backoff).await;
            connection.close().await;

            if let Lookup::Done(guid) = polled {
                break guid;
            }
        };

        if let Some(guid) = &guid {
            self.common
                .merge(&Attributes::new().with(ENTITY_GUID, guid.as_str()));
        }
        Ok(guid)
    }

    async fn await_entity_guid(&self, connection: Arc<dyn ManagementConnection>, backoff: &mut Backoff) -> Lookup {
        let metadata = LinkingMetadata::new(connection);
        let sleeper = Arc::clone(&self.supervisor.retry_context().sleeper);

        loop {
            let pending = match metadata.entity_guid().await {
                Err(DaemonError::ConnectionFailed(e)) => {
                    info!("Connection lost while reading linking metadata ({}).", e);
                    false
                }
                Err(e) => {
                    info!("Unable to identify remote agent ({}). Not setting entity guid.", e);
                    return Lookup::Done(None);
                }
                Ok(Some(guid)) => {
                    info!("Obtained entity guid from remote agent: {}", guid);
                    return Lookup::Done(Some(guid));
                }
                Ok(None) => true,
            };

            let Some(wait) = backoff.next_wait() else {
                info!("No entity guid after backing off. Not setting entity guid.");
                return Lookup::Done(None);
            };

            if pending {
                info!(
                    "Remote agent identified but entity guid not yet available. Backing off {:?}.",
                    wait
                );
                sleeper.sleep(wait).await;
            } else {
                info!("Reconnecting in {:?}.", wait);
                sleeper.sleep(wait).await;
                return Lookup::Reconnect;
            }
        }
    }
}

enum Lookup {
    Done(Option<String>),
    Reconnect,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::fake::{FakeConnection, FakeConnector, Reply};
    use crate::connection::management::Value;
    use crate::connection::supervisor::{RetryContext, DEFAULT_LOG_INTERVAL};
    use crate::utils::time::{epoch, ManualClock, RecordingSleeper};
    use std::time::Duration;

    fn resolver(connection: Arc<FakeConnection>) -> (EntityGuidResolver, Arc<CommonAttributes>, RecordingSleeper) {
        let clock = ManualClock::new(epoch());
        let sleeper = RecordingSleeper::with_clock(clock.clone());
        let retry = RetryContext::new(Arc::new(sleeper.clone()), Arc::new(clock), DEFAULT_LOG_INTERVAL);
        let supervisor = ConnectionSupervisor::new(Arc::new(FakeConnector::to(connection)), retry);
        let common = Arc::new(CommonAttributes::default());
        (
            EntityGuidResolver::new(supervisor, Arc::clone(&common)),
            common,
            sleeper,
        )
    }

    #[tokio::test]
    async fn test_no_agent_means_no_guid() {
        let fake = FakeConnection::new();
        fake.script("readLinkingMetadata", Reply::Fail("instance not found".into()));
        let (resolver, common, _) = resolver(fake.clone());

        assert_eq!(resolver.resolve().await.unwrap(), None);
        assert!(common.snapshot().get(ENTITY_GUID).is_none());
        assert!(fake.is_closed());
    }

    #[tokio::test]
    async fn test_guid_after_polling() {
        let fake = FakeConnection::new();
        fake.script("readLinkingMetadata", Reply::Value(Value::table(Vec::<(String, String)>::new())));
        fake.script("readLinkingMetadata", Reply::Value(Value::table([("entity.guid", "abc")])));
        let (resolver, common, sleeper) = resolver(fake);

        assert_eq!(resolver.resolve().await.unwrap().as_deref(), Some("abc"));
        assert_eq!(common.snapshot().get_str(ENTITY_GUID), Some("abc"));
        assert_eq!(sleeper.slept(), vec![Duration::from_secs(1)]);
    }

    #[tokio::test]
    async fn test_connection_loss_reconnects_and_keeps_polling() {
        let fake = FakeConnection::new();
        fake.script("readLinkingMetadata", Reply::Disconnect("reset".into()));
        fake.script("readLinkingMetadata", Reply::Value(Value::table([("entity.guid", "abc")])));
        let connector = Arc::new(FakeConnector::to(fake.clone()));
        let clock = ManualClock::new(epoch());
        let sleeper = RecordingSleeper::with_clock(clock.clone());
        let retry = RetryContext::new(Arc::new(sleeper.clone()), Arc::new(clock), DEFAULT_LOG_INTERVAL);
        let common = Arc::new(CommonAttributes::default());
        let resolver = EntityGuidResolver::new(ConnectionSupervisor::new(connector.clone(), retry), Arc::clone(&common));

        assert_eq!(resolver.resolve().await.unwrap().as_deref(), Some("abc"));
        assert_eq!(connector.attempts(), 2);
        assert_eq!(common.snapshot().get_str(ENTITY_GUID), Some("abc"));
        assert_eq!(sleeper.slept(), vec![Duration::from_secs(1)]);
    }

    #[tokio::test]
    async fn test_polling_gives_up_under_bounded_policy() {
        let fake = FakeConnection::new();
        for _ in 0..3 {
            fake.script("readLinkingMetadata", Reply::Value(Value::table([("other", "x")])));
        }
        let (resolver, _, sleeper) = resolver(fake);
        let resolver = resolver.with_poll_policy(BackoffPolicy::new(
            Duration::from_secs(1),
            Duration::from_secs(15),
            Some(2),
        ));

        assert_eq!(resolver.resolve().await.unwrap(), None);
        assert_eq!(sleeper.slept().len(), 2);
    }
}
