//! Single-writer loop that feeds document snapshots into the synchronizer
//! and the interrupt coordinator, in publication order.

use std::sync::Arc;

use tracing::{debug, info};

use crate::core::interrupt::Transition;
use crate::io::agent_client::AgentClient;
use crate::io::coordinator::InterruptCoordinator;
use crate::io::document::{DocumentReader, VersionedSnapshot};
use crate::io::sync::StateSynchronizer;

/// Change notifications emitted after a snapshot has been absorbed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectionEvent {
    StateChanged { version: u64 },
    InterruptRaised { episode: u64 },
    InterruptCleared,
}

pub struct SnapshotPump<C> {
    reader: DocumentReader,
    synchronizer: Arc<StateSynchronizer<C>>,
    coordinator: Arc<InterruptCoordinator<C>>,
}

impl<C: AgentClient> SnapshotPump<C> {
    pub fn new(
        reader: DocumentReader,
        synchronizer: Arc<StateSynchronizer<C>>,
        coordinator: Arc<InterruptCoordinator<C>>,
    ) -> Self {
        SnapshotPump {
            reader,
            synchronizer,
            coordinator,
        }
    }

    /// Absorb one snapshot and report what changed.
    pub fn absorb(&self, versioned: &VersionedSnapshot) -> Vec<ProjectionEvent> {
        let mut events = Vec::new();
        if !self.synchronizer.apply_snapshot(versioned) {
            return events;
        }
        events.push(ProjectionEvent::StateChanged {
            version: versioned.version,
        });
        match self.coordinator.observe(versioned) {
            Transition::Raised { episode } => events.push(ProjectionEvent::InterruptRaised { episode }),
            Transition::Cleared => events.push(ProjectionEvent::InterruptCleared),
            Transition::Unchanged => {}
        }
        events
    }

    /// Run until the document channel closes, handing every event to `sink`.
    pub async fn run<F>(mut self, mut sink: F)
    where
        F: FnMut(ProjectionEvent),
    {
        info!("snapshot pump started");
        while let Some(versioned) = self.reader.next_or_current().await {
            debug!(version = versioned.version, "absorbing snapshot");
            for event in self.absorb(&versioned) {
                sink(event);
            }
        }
        info!("document channel closed, snapshot pump stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::document::DocumentChannel;
    use crate::test_support::{ScriptedAgentClient, interrupted_json, snapshot_json};
    use serde_json::json;

    fn pump(channel: &DocumentChannel) -> SnapshotPump<ScriptedAgentClient> {
        let client = Arc::new(ScriptedAgentClient::new());
        SnapshotPump::new(
            channel.subscribe(),
            Arc::new(StateSynchronizer::new(client.clone())),
            Arc::new(InterruptCoordinator::new(client)),
        )
    }

    #[test]
    fn absorb_reports_state_and_interrupt_changes() {
        let channel = DocumentChannel::new();
        let pump = pump(&channel);

        channel.publish_value(interrupted_json("Run?", None));
        let first = pump.absorb(&channel.latest().expect("v1"));
        assert_eq!(
            first,
            vec![
                ProjectionEvent::StateChanged { version: 1 },
                ProjectionEvent::InterruptRaised { episode: 1 }
            ]
        );

        channel.publish_value(snapshot_json(1, &[], 0));
        let second = pump.absorb(&channel.latest().expect("v2"));
        assert_eq!(
            second,
            vec![
                ProjectionEvent::StateChanged { version: 2 },
                ProjectionEvent::InterruptCleared
            ]
        );
    }

    #[test]
    fn absorbing_same_version_twice_is_silent() {
        let channel = DocumentChannel::new();
        let pump = pump(&channel);
        channel.publish_value(json!({}));
        let latest = channel.latest().expect("v1");
        assert_eq!(pump.absorb(&latest).len(), 1);
        assert!(pump.absorb(&latest).is_empty());
    }

    #[tokio::test]
    async fn run_stops_when_channel_closes() {
        let channel = DocumentChannel::new();
        let pump = pump(&channel);
        channel.publish_value(json!({}));
        drop(channel);

        let mut events = Vec::new();
        pump.run(|event| events.push(event)).await;
        assert_eq!(events, vec![ProjectionEvent::StateChanged { version: 1 }]);
    }
}
