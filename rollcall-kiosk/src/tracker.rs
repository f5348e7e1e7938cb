//! Tracks which class session is current.
//!
//! The tracker cycles `Unarmed -> Armed -> Closing -> Unarmed`. A session is
//! armed when the schedule has one whose `[start, end)` window contains the
//! clock; it closes once the clock reaches its end or the date changes.

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use rollcall_registry::storage::{StorageError, Store, models::ClassSession};
use tracing::{debug, info};

/// A session matched on a particular date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArmedSession {
    pub session: ClassSession,
    pub date: NaiveDate,
}

impl ArmedSession {
    /// Whether `at` still falls inside this occurrence of the session.
    pub fn covers(&self, at: NaiveDateTime) -> bool {
        at.date() == self.date && at.time() < self.session.end_time
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TrackerState {
    #[default]
    Unarmed,
    Armed(ArmedSession),
    Closing(ArmedSession),
}

/// What the caller should do after a poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Nothing is scheduled now.
    Idle,
    /// A session was matched on this poll.
    Armed(ArmedSession),
    /// The armed session is still running.
    Open(ArmedSession),
    /// The armed session just ended; dispatch, then call [`SessionTracker::finish`].
    Closed(ArmedSession),
    /// A close is still waiting for [`SessionTracker::finish`].
    Pending,
}

#[derive(Debug, Default)]
pub struct SessionTracker {
    state: TrackerState,
}

impl SessionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &TrackerState {
        &self.state
    }

    pub fn current(&self) -> Option<&ArmedSession> {
        match &self.state {
            TrackerState::Armed(armed) => Some(armed),
            _ => None,
        }
    }

    pub async fn poll(&mut self, store: &Store, at: NaiveDateTime) -> Result<Step, StorageError> {
        match &self.state {
            TrackerState::Unarmed => {
                let Some(session) = store.session_active_at(at.weekday(), at.time()).await? else {
                    return Ok(Step::Idle);
                };
                let armed = ArmedSession {
                    session,
                    date: at.date(),
                };
                info!(session=%armed.session.label(), date=%armed.date, "session armed");
                self.state = TrackerState::Armed(armed.clone());
                Ok(Step::Armed(armed))
            }
            TrackerState::Armed(armed) if armed.covers(at) => Ok(Step::Open(armed.clone())),
            TrackerState::Armed(armed) => {
                let armed = armed.clone();
                info!(session=%armed.session.label(), date=%armed.date, %at, "session closing");
                self.state = TrackerState::Closing(armed.clone());
                Ok(Step::Closed(armed))
            }
            TrackerState::Closing(_) => Ok(Step::Pending),
        }
    }

    /// Returns to `Unarmed` once dispatch is over, whatever its result.
    pub fn finish(&mut self) {
        if let TrackerState::Closing(armed) = &self.state {
            debug!(session=%armed.session.label(), "session finished");
        }
        self.state = TrackerState::Unarmed;
    }
}
