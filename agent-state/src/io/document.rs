//! Versioned shared-state document channel.
//!
//! One [`DocumentChannel`] carries the agent's document; every publish fully
//! replaces the previous value and gets the next version number. Readers may
//! skip intermediate versions but never observe them out of order.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::core::snapshot::{RecoveredField, Snapshot};

/// A decoded snapshot tagged with its position in the stream.
#[derive(Debug, Clone)]
pub struct VersionedSnapshot {
    pub version: u64,
    pub snapshot: Arc<Snapshot>,
}

/// Publisher side of the document.
#[derive(Clone)]
pub struct DocumentChannel {
    tx: Arc<watch::Sender<Option<VersionedSnapshot>>>,
    next_version: Arc<AtomicU64>,
}

/// Subscriber side of the document.
#[derive(Clone)]
pub struct DocumentReader {
    rx: watch::Receiver<Option<VersionedSnapshot>>,
}

impl Default for DocumentChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentChannel {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        DocumentChannel {
            tx: Arc::new(tx),
            next_version: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Decode and publish a raw document. Returns the assigned version and
    /// any fields that had to be defaulted.
    pub fn publish_value(&self, value: Value) -> (u64, Vec<RecoveredField>) {
        let parsed = Snapshot::from_value(value);
        for field in &parsed.recovered {
            warn!(key = %field.key, reason = %field.reason, "snapshot field recovered to default");
        }
        let version = self.publish(parsed.snapshot);
        (version, parsed.recovered)
    }

    /// Publish an already decoded snapshot.
    pub fn publish(&self, snapshot: Snapshot) -> u64 {
        let mut assigned = 0;
        // Version assignment and send happen under the channel lock so two
        // publishers cannot interleave out of order.
        self.tx.send_modify(|slot| {
            assigned = self.next_version.fetch_add(1, Ordering::SeqCst);
            *slot = Some(VersionedSnapshot {
                version: assigned,
                snapshot: Arc::new(snapshot),
            });
        });
        debug!(version = assigned, "snapshot published");
        assigned
    }

    /// Read, modify and republish the latest document as one step.
    ///
    /// `apply` runs under the channel lock, so concurrent updates and
    /// publishes are serialized and none is lost. An `Err` leaves the
    /// document and the version counter untouched.
    pub fn update<T, E>(
        &self,
        apply: impl FnOnce(&mut Snapshot) -> Result<T, E>,
    ) -> Result<(u64, T), E> {
        let mut outcome = None;
        self.tx.send_if_modified(|slot| {
            let mut snapshot = slot
                .as_ref()
                .map(|versioned| (*versioned.snapshot).clone())
                .unwrap_or_default();
            match apply(&mut snapshot) {
                Ok(value) => {
                    let version = self.next_version.fetch_add(1, Ordering::SeqCst);
                    *slot = Some(VersionedSnapshot {
                        version,
                        snapshot: Arc::new(snapshot),
                    });
                    outcome = Some(Ok((version, value)));
                    true
                }
                Err(err) => {
                    outcome = Some(Err(err));
                    false
                }
            }
        });
        match outcome {
            Some(outcome) => outcome,
            None => unreachable!("send_if_modified always runs its closure"),
        }
    }

    pub fn latest(&self) -> Option<VersionedSnapshot> {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> DocumentReader {
        DocumentReader {
            rx: self.tx.subscribe(),
        }
    }
}

impl DocumentReader {
    /// Latest snapshot, if any has been published.
    pub fn current(&self) -> Option<VersionedSnapshot> {
        self.rx.borrow().clone()
    }

    /// Wait for a version newer than the last one seen by this reader.
    ///
    /// Returns `None` once every publisher is gone.
    pub async fn next(&mut self) -> Option<VersionedSnapshot> {
        loop {
            if self.rx.changed().await.is_err() {
                return None;
            }
            let latest = self.rx.borrow_and_update().clone();
            if latest.is_some() {
                return latest;
            }
        }
    }

    /// Like [`DocumentReader::next`] but yields the current value first when
    /// it has not been seen yet.
    pub async fn next_or_current(&mut self) -> Option<VersionedSnapshot> {
        if self.rx.has_changed().unwrap_or(false) {
            let latest = self.rx.borrow_and_update().clone();
            if latest.is_some() {
                return latest;
            }
        }
        self.next().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn versions_increase_from_one() {
        let channel = DocumentChannel::new();
        assert!(channel.latest().is_none());
        let (v1, _) = channel.publish_value(json!({}));
        let (v2, _) = channel.publish_value(json!({ "interrupted": false }));
        assert_eq!((v1, v2), (1, 2));
        assert_eq!(channel.latest().expect("latest").version, 2);
    }

    #[test]
    fn publish_reports_recovered_fields() {
        let channel = DocumentChannel::new();
        let (_, recovered) = channel.publish_value(json!({ "user:query_results": 7 }));
        assert_eq!(recovered.len(), 1);
        assert_eq!(recovered[0].key, "user:query_results");
    }

    #[tokio::test]
    async fn reader_sees_latest_version_only() {
        let channel = DocumentChannel::new();
        let mut reader = channel.subscribe();
        channel.publish_value(json!({ "user:queries": [{ "query": "a" }] }));
        channel.publish_value(json!({ "user:queries": [{ "query": "b" }] }));

        let seen = reader.next_or_current().await.expect("snapshot");
        assert_eq!(seen.version, 2);
        assert_eq!(seen.snapshot.collections.queries[0].query, "b");
    }

    #[test]
    fn failed_update_keeps_document_and_version() {
        let channel = DocumentChannel::new();
        channel.publish_value(json!({ "interrupted": true }));

        let err = channel
            .update(|snapshot| {
                snapshot.interrupted = false;
                Err::<(), _>("rejected")
            })
            .expect_err("update fails");
        assert_eq!(err, "rejected");
        let latest = channel.latest().expect("latest");
        assert_eq!(latest.version, 1);
        assert!(latest.snapshot.interrupted);

        let (version, ()) = channel
            .update(|snapshot| {
                snapshot.interrupted = false;
                Ok::<_, &str>(())
            })
            .expect("update");
        assert_eq!(version, 2);
        assert!(!channel.latest().expect("latest").snapshot.interrupted);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn concurrent_updates_are_not_lost() {
        let channel = DocumentChannel::new();
        let tasks: Vec<_> = (0..200)
            .map(|i| {
                let channel = channel.clone();
                tokio::spawn(async move {
                    channel.update(|snapshot| {
                        snapshot
                            .collections
                            .queries
                            .push(crate::core::types::Query {
                                query: format!("SELECT {i}"),
                                ..Default::default()
                            });
                        Ok::<_, ()>(())
                    })
                })
            })
            .collect();
        for task in tasks {
            task.await.expect("join").expect("update");
        }
        let latest = channel.latest().expect("latest");
        assert_eq!(latest.snapshot.collections.queries.len(), 200);
        assert_eq!(latest.version, 200);
    }

    #[tokio::test]
    async fn reader_ends_when_channel_dropped() {
        let channel = DocumentChannel::new();
        let mut reader = channel.subscribe();
        drop(channel);
        assert!(reader.next().await.is_none());
    }
}
