//! SSE Transport — one `text/event-stream` response per session (spec §4.7).
//!
//! Grounded on `sven-gateway::http::ws` for the "bridge an internal event
//! channel to an HTTP connection, forward until the channel closes" shape,
//! adapted from WebSocket framing to Server-Sent Events.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::http::StatusCode;
use futures::stream::{self, Stream};
use serde_json::json;
use tokio::sync::{Mutex, Notify};
use tracing::{info, warn};
use uuid::Uuid;

use crate::session::{SessionChannelManager, SessionError};

/// Cap on events delivered over one connection before it is force-closed
/// (spec §4.7).
pub const MAX_EVENTS_PER_CONNECTION: u64 = 10_000;

/// Heartbeat cadence.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// A connection with no activity for longer than this is considered stale.
pub const STALE_TIMEOUT: Duration = Duration::from_secs(5 * 60);

pub type SharedSessionManager = Arc<Mutex<SessionChannelManager>>;

/// Broadcasts server shutdown to every live SSE connection. `notify_waiters`
/// only wakes futures already polling `notified()`, which every open
/// connection is (blocked in `next_frame`'s `select!`), so a single call at
/// shutdown reaches all of them.
pub type ShutdownSignal = Arc<Notify>;

#[derive(Clone)]
pub struct SseState {
    pub manager: SharedSessionManager,
    pub shutdown: ShutdownSignal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    SessionComplete,
    EventLimitReached,
    StaleConnection,
    ChannelClosed,
    ServerShutdown,
}

impl DisconnectReason {
    fn as_str(&self) -> &'static str {
        match self {
            DisconnectReason::SessionComplete => "session_complete",
            DisconnectReason::EventLimitReached => "event_limit_reached",
            DisconnectReason::StaleConnection => "stale_connection",
            DisconnectReason::ChannelClosed => "channel_closed",
            DisconnectReason::ServerShutdown => "server_shutdown",
        }
    }
}

struct ConnState {
    rx: tokio::sync::mpsc::UnboundedReceiver<brutalist_types::EventBatch>,
    manager: SharedSessionManager,
    shutdown: ShutdownSignal,
    session_id: String,
    subscriber_id: String,
    events_sent: u64,
    last_activity: Instant,
    next_id: u64,
    finished: bool,
    pending_completion: bool,
}

/// GET /sse/{session_id} — axum handler. Verifies the session exists
/// (404), attempts to subscribe (503 on subscriber-cap overflow), then
/// streams SSE frames until the session completes, the connection goes
/// stale, the event cap is hit, or the server shuts down.
pub async fn sse_handler(Path(session_id): Path<String>, State(state): State<SseState>) -> Response {
    let SseState { manager, shutdown } = state;
    let now = chrono::Utc::now();
    {
        let mut mgr = manager.lock().await;
        if mgr.get_session(&session_id, false, now).is_none() {
            return (StatusCode::NOT_FOUND, "session not found").into_response();
        }
    }

    let subscriber_id = Uuid::new_v4().to_string();
    let rx = {
        let mut mgr = manager.lock().await;
        match mgr.subscribe(&session_id, subscriber_id.clone()) {
            Ok(rx) => rx,
            Err(SessionError::SubscriberCapReached(_)) => {
                return (StatusCode::SERVICE_UNAVAILABLE, "connection cap reached").into_response();
            }
            Err(_) => return (StatusCode::NOT_FOUND, "session not found").into_response(),
        }
    };

    let state = ConnState {
        rx,
        manager,
        shutdown,
        session_id: session_id.clone(),
        subscriber_id,
        events_sent: 0,
        last_activity: Instant::now(),
        next_id: 0,
        finished: false,
        pending_completion: false,
    };

    let connection_event = Event::default()
        .id("0")
        .event("connection")
        .data(json!({"sessionId": session_id}).to_string());

    let body = stream::once(async move { Ok::<_, Infallible>(connection_event) })
        .chain(stream::unfold(state, next_frame));

    Sse::new(body).keep_alive(KeepAlive::default())
}

async fn next_frame(mut st: ConnState) -> Option<(Result<Event, Infallible>, ConnState)> {
    if st.finished {
        unsubscribe(&st).await;
        return None;
    }

    if st.pending_completion {
        st.finished = true;
        return Some((Ok(disconnect_event(DisconnectReason::SessionComplete)), st));
    }

    if st.events_sent >= MAX_EVENTS_PER_CONNECTION {
        warn!(session_id = %st.session_id, "SSE connection hit event cap");
        st.finished = true;
        return Some((Ok(disconnect_event(DisconnectReason::EventLimitReached)), st));
    }

    tokio::select! {
        _ = st.shutdown.notified() => {
            st.finished = true;
            Some((Ok(disconnect_event(DisconnectReason::ServerShutdown)), st))
        }
        maybe_batch = st.rx.recv() => {
            match maybe_batch {
                Some(batch) => {
                    st.last_activity = Instant::now();
                    st.events_sent += batch.events.len() as u64;
                    let is_complete = batch.events.iter().any(|e| {
                        matches!(e.event_type, brutalist_types::EventType::AgentComplete)
                    });
                    let id = st.next_id;
                    st.next_id += 1;
                    let event = Event::default()
                        .id(id.to_string())
                        .event("batch")
                        .data(serde_json::to_string(&batch).unwrap_or_default());
                    if is_complete {
                        info!(session_id = %st.session_id, "session complete, closing SSE connection");
                        st.pending_completion = true;
                    }
                    Some((Ok(event), st))
                }
                None => {
                    st.finished = true;
                    Some((Ok(disconnect_event(DisconnectReason::ChannelClosed)), st))
                }
            }
        }
        _ = tokio::time::sleep(HEARTBEAT_INTERVAL) => {
            if st.last_activity.elapsed() > STALE_TIMEOUT {
                st.finished = true;
                return Some((Ok(disconnect_event(DisconnectReason::StaleConnection)), st));
            }
            let event = Event::default()
                .event("heartbeat")
                .data(json!({
                    "timestamp": chrono::Utc::now().to_rfc3339(),
                    "sessionId": st.session_id,
                }).to_string());
            Some((Ok(event), st))
        }
    }
}

fn disconnect_event(reason: DisconnectReason) -> Event {
    Event::default()
        .event("session_complete")
        .data(json!({"reason": reason.as_str()}).to_string())
}

async fn unsubscribe(st: &ConnState) {
    let mut mgr = st.manager.lock().await;
    mgr.unsubscribe(&st.session_id, &st.subscriber_id);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disconnect_reasons_have_stable_names() {
        assert_eq!(DisconnectReason::EventLimitReached.as_str(), "event_limit_reached");
        assert_eq!(DisconnectReason::StaleConnection.as_str(), "stale_connection");
    }
}
