use std::{sync::Arc, time::Duration};

use dashmap::DashMap;
use futures::{StreamExt, stream};
use itertools::Itertools;
use jiff::Timestamp;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::event::{EventStream, NormalizedEvent};

/// An in-flight stream that can be cancelled by id.
#[derive(Debug)]
pub struct Session {
    id: String,
    created_at: Timestamp,
    token: CancellationToken,
}

impl Session {
    fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            created_at: Timestamp::now(),
            token: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// How a session left the active set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    Completed,
    Errored,
    Cancelled,
    Abandoned,
}

impl SessionOutcome {
    fn from_terminal(event: &NormalizedEvent) -> Self {
        match event {
            NormalizedEvent::Complete { .. } => Self::Completed,
            NormalizedEvent::Cancelled { .. } => Self::Cancelled,
            _ => Self::Errored,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SessionInfo {
    pub id: String,
    pub created_at: Timestamp,
    pub cancel_requested: bool,
}

/// Tracks active streams by caller-chosen id.
///
/// Cloning is cheap and every clone sees the same sessions. Registering an id that is
/// already active joins the existing session, so a stop request reaches every stream
/// sharing that id.
#[derive(Debug, Clone, Default)]
pub struct SessionManager {
    sessions: Arc<DashMap<String, Arc<Session>>>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an active session, or returns the one already registered under `id`.
    pub fn begin(&self, id: &str) -> Arc<Session> {
        let session = self
            .sessions
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(Session::new(id)))
            .clone();

        log::debug!("Stream session '{id}' started");

        session
    }

    /// Flags a session for cancellation.
    ///
    /// Returns true while the session is tracked, also for repeated requests. The stream
    /// observes the flag before forwarding its next event.
    pub fn request_cancel(&self, id: &str) -> bool {
        match self.sessions.get(id) {
            Some(session) => {
                session.token.cancel();
                log::debug!("Cancellation requested for stream session '{id}'");
                true
            }
            None => false,
        }
    }

    pub fn is_active(&self, id: &str) -> bool {
        self.sessions.contains_key(id)
    }

    pub fn active_ids(&self) -> Vec<String> {
        self.sessions.iter().map(|entry| entry.key().clone()).sorted().collect()
    }

    /// Active sessions, oldest first.
    pub fn sessions(&self) -> Vec<SessionInfo> {
        let mut sessions = self
            .sessions
            .iter()
            .map(|entry| SessionInfo {
                id: entry.id.clone(),
                created_at: entry.created_at,
                cancel_requested: entry.is_cancel_requested(),
            })
            .collect::<Vec<_>>();

        sessions.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        sessions
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Puts `events` under the control of `session`.
    ///
    /// The first event is always forwarded. Before each later one the cancellation flag
    /// is checked: once set, the pending event is dropped, a single `cancelled` event is
    /// emitted and the inner stream is released. The session is removed when a terminal
    /// event passes through, or when the returned stream is dropped early.
    pub fn gate(&self, session: Arc<Session>, events: EventStream, pacing: Option<Duration>) -> EventStream {
        let gate = Gate {
            events,
            lease: Lease {
                sessions: self.sessions.clone(),
                session,
                released: false,
            },
            pacing,
            forwarded: false,
        };

        Box::pin(stream::unfold(Some(gate), |gate| async move {
            let mut gate = gate?;

            if !gate.forwarded {
                gate.forwarded = true;

                return match gate.events.next().await {
                    Some(event) => gate.forward(event),
                    None => gate.finish(NormalizedEvent::error("stream ended unexpectedly")),
                };
            }

            let token = gate.lease.session.token.clone();

            if let Some(pacing) = gate.pacing {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => {}
                    _ = tokio::time::sleep(pacing) => {}
                }
            }

            let next = tokio::select! {
                biased;
                _ = token.cancelled() => None,
                event = gate.events.next() => Some(event),
            };

            match next {
                _ if token.is_cancelled() => gate.finish(NormalizedEvent::cancelled()),
                Some(Some(event)) => gate.forward(event),
                _ => gate.finish(NormalizedEvent::error("stream ended unexpectedly")),
            }
        }))
    }

    fn release(sessions: &DashMap<String, Arc<Session>>, session: &Arc<Session>, outcome: SessionOutcome) {
        let removed = sessions.remove_if(&session.id, |_, current| Arc::ptr_eq(current, session));

        if removed.is_some() {
            log::debug!("Stream session '{}' ended: {outcome:?}", session.id);
        }
    }
}

struct Gate {
    events: EventStream,
    lease: Lease,
    pacing: Option<Duration>,
    forwarded: bool,
}

impl Gate {
    fn forward(self, event: NormalizedEvent) -> Option<(NormalizedEvent, Option<Gate>)> {
        if event.is_terminal() {
            self.finish(event)
        } else {
            Some((event, Some(self)))
        }
    }

    fn finish(mut self, event: NormalizedEvent) -> Option<(NormalizedEvent, Option<Gate>)> {
        self.lease.release(SessionOutcome::from_terminal(&event));

        Some((event, None))
    }
}

/// Removes the session from the active set exactly once, on a terminal event or on drop.
struct Lease {
    sessions: Arc<DashMap<String, Arc<Session>>>,
    session: Arc<Session>,
    released: bool,
}

impl Lease {
    fn release(&mut self, outcome: SessionOutcome) {
        if !self.released {
            self.released = true;
            SessionManager::release(&self.sessions, &self.session, outcome);
        }
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        self.release(SessionOutcome::Abandoned);
    }
}
