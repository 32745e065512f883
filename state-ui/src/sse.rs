//! Server-Sent Events stream, snapshot pump and snapshot file watcher.

use std::convert::Infallible;
use std::path::{Path, PathBuf};
use std::time::Duration;

use agent_state::io::pump::ProjectionEvent;
use agent_state::io::snapshot_file::read_snapshot_file;
use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use notify::{Event as NotifyEvent, EventKind, PollWatcher, RecursiveMode, Watcher};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::state::AppState;

#[derive(Debug, PartialEq, Eq, Serialize)]
struct SsePayload {
    #[serde(rename = "type")]
    event_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    episode: Option<u64>,
}

impl From<&ProjectionEvent> for SsePayload {
    fn from(event: &ProjectionEvent) -> Self {
        match event {
            ProjectionEvent::StateChanged { version } => SsePayload {
                event_type: "state_changed",
                version: Some(*version),
                episode: None,
            },
            ProjectionEvent::InterruptRaised { episode } => SsePayload {
                event_type: "interrupt_raised",
                version: None,
                episode: Some(*episode),
            },
            ProjectionEvent::InterruptCleared => SsePayload {
                event_type: "interrupt_cleared",
                version: None,
                episode: None,
            },
        }
    }
}

/// SSE endpoint handler.
pub async fn events_handler(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut rx = state.event_tx.subscribe();

    let stream = async_stream::stream! {
        yield Ok(Event::default().event("connected").data("{}"));

        loop {
            match rx.recv().await {
                Ok(change_event) => {
                    let payload = SsePayload::from(&change_event);
                    if let Ok(json) = serde_json::to_string(&payload) {
                        yield Ok(Event::default().event("change").data(json));
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "SSE client lagged, some events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    break;
                }
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}

/// Run the snapshot pump in a background task, broadcasting its events.
pub fn start_snapshot_pump(state: AppState) {
    let pump = state.pump();
    let event_tx = state.event_tx.clone();
    tokio::spawn(pump.run(move |event| {
        debug!(?event, "broadcasting projection change");
        // No subscribers is fine; the projection is still current.
        let _ = event_tx.send(event);
    }));
}

/// Watch a snapshot file and publish its contents whenever it changes.
pub fn start_snapshot_watcher(state: AppState, path: PathBuf, poll_interval: Duration) {
    tokio::spawn(async move {
        if let Err(e) = run_snapshot_watcher(state, path, poll_interval).await {
            warn!(error = %e, "snapshot watcher failed");
        }
    });
}

async fn run_snapshot_watcher(
    state: AppState,
    path: PathBuf,
    poll_interval: Duration,
) -> anyhow::Result<()> {
    let (tx, mut rx) = mpsc::channel::<NotifyEvent>(100);

    let mut watcher = PollWatcher::new(
        move |res: Result<NotifyEvent, notify::Error>| {
            if let Ok(event) = res {
                let _ = tx.try_send(event);
            }
        },
        notify::Config::default().with_poll_interval(poll_interval),
    )?;

    // Watch the directory so the file may be created or replaced later.
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    watcher.watch(&dir, RecursiveMode::NonRecursive)?;
    info!(path = %path.display(), "watching snapshot file");

    if path.exists() {
        load_snapshot(&state, &path);
    }

    let mut pending_events: Vec<NotifyEvent> = Vec::new();
    let mut flush_tick = tokio::time::interval(poll_interval);
    flush_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            Some(event) = rx.recv() => {
                pending_events.push(event);
            }
            _ = flush_tick.tick() => {
                if pending_events.is_empty() {
                    continue;
                }
                process_events(&state, &path, &pending_events);
                pending_events.clear();
            }
        }
    }
}

/// Publish the snapshot file once if any of `events` touched it.
fn process_events(state: &AppState, path: &Path, events: &[NotifyEvent]) -> Option<u64> {
    let file_name = path.file_name()?;
    let touched = events
        .iter()
        .filter(|event| matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)))
        .flat_map(|event| &event.paths)
        .any(|candidate| candidate.file_name() == Some(file_name));
    if !touched {
        return None;
    }
    load_snapshot(state, path)
}

fn load_snapshot(state: &AppState, path: &Path) -> Option<u64> {
    match read_snapshot_file(path) {
        Ok(Value::Null) => {
            debug!(path = %path.display(), "snapshot file empty, skipping");
            None
        }
        Ok(value) => {
            let (version, recovered) = state.document.publish_value(value);
            info!(
                version,
                recovered = recovered.len(),
                "snapshot file published"
            );
            Some(version)
        }
        Err(e) => {
            let error = format!("{e:#}");
            warn!(error = %error, "snapshot file unreadable, keeping last snapshot");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_state::test_support::snapshot_json;

    fn modify_event(path: PathBuf) -> NotifyEvent {
        NotifyEvent {
            kind: EventKind::Modify(notify::event::ModifyKind::Any),
            paths: vec![path],
            attrs: Default::default(),
        }
    }

    #[test]
    fn payload_shapes_match_event_kinds() {
        let raised = serde_json::to_value(SsePayload::from(&ProjectionEvent::InterruptRaised {
            episode: 3,
        }))
        .expect("serialize");
        assert_eq!(raised, serde_json::json!({ "type": "interrupt_raised", "episode": 3 }));

        let changed = serde_json::to_value(SsePayload::from(&ProjectionEvent::StateChanged {
            version: 7,
        }))
        .expect("serialize");
        assert_eq!(changed, serde_json::json!({ "type": "state_changed", "version": 7 }));

        let cleared = serde_json::to_value(SsePayload::from(&ProjectionEvent::InterruptCleared))
            .expect("serialize");
        assert_eq!(cleared, serde_json::json!({ "type": "interrupt_cleared" }));
    }

    #[test]
    fn modified_snapshot_file_is_published() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("state.json");
        std::fs::write(&path, snapshot_json(2, &[], 0).to_string()).expect("write");
        let state = AppState::local(8);

        let version = process_events(&state, &path, &[modify_event(path.clone())]);

        assert_eq!(version, Some(1));
        let latest = state.document.latest().expect("published");
        assert_eq!(latest.snapshot.collections.queries.len(), 2);
    }

    #[test]
    fn unrelated_files_are_ignored() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("state.json");
        std::fs::write(&path, "{}").expect("write");
        let state = AppState::local(8);

        let other = temp.path().join("notes.txt");
        assert_eq!(process_events(&state, &path, &[modify_event(other)]), None);
        assert!(state.document.latest().is_none());
    }

    #[test]
    fn empty_or_broken_file_keeps_last_snapshot() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("state.json");
        std::fs::write(&path, snapshot_json(1, &[], 0).to_string()).expect("write");
        let state = AppState::local(8);
        assert_eq!(load_snapshot(&state, &path), Some(1));

        std::fs::write(&path, "").expect("truncate");
        assert_eq!(load_snapshot(&state, &path), None);
        std::fs::write(&path, "{ half").expect("partial write");
        assert_eq!(load_snapshot(&state, &path), None);

        assert_eq!(state.document.latest().expect("latest").version, 1);
    }

    #[tokio::test]
    async fn pump_broadcasts_projection_events() {
        let state = AppState::local(8);
        let mut rx = state.event_tx.subscribe();
        start_snapshot_pump(state.clone());

        state.document.publish_value(snapshot_json(1, &[], 0));
        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("event before timeout")
            .expect("event");
        assert_eq!(event, ProjectionEvent::StateChanged { version: 1 });
    }
}
