use chrono::NaiveDateTime;
use rollcall_registry::storage::{RecordOutcome, StorageError, Store, models::Student};
use tracing::{info, warn};

use crate::tracker::ArmedSession;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    /// Blank payload.
    Ignored,
    Recorded(Student),
    AlreadyRecorded(Student),
    /// No student carries this LRN.
    UnknownStudent(String),
    /// The scan was stamped after the armed session ended.
    OutsideWindow,
}

/// Turns scanned payloads into attendance records for the armed session.
#[derive(Clone)]
pub struct ScanGate {
    store: Store,
}

impl ScanGate {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub async fn admit(
        &self,
        armed: &ArmedSession,
        payload: &str,
        stamped: NaiveDateTime,
    ) -> Result<ScanOutcome, StorageError> {
        let lrn = payload.trim();
        if lrn.is_empty() {
            return Ok(ScanOutcome::Ignored);
        }
        if !armed.covers(stamped) {
            warn!(%lrn, %stamped, "scan after session end; not recorded");
            return Ok(ScanOutcome::OutsideWindow);
        }
        let Some(student) = self.store.find_student(lrn).await? else {
            info!(%lrn, "unknown LRN scanned");
            return Ok(ScanOutcome::UnknownStudent(lrn.to_string()));
        };
        let outcome = self
            .store
            .record_attendance(&student.lrn, armed.session.id, armed.date, Some(stamped.time()))
            .await?;
        Ok(match outcome {
            RecordOutcome::Recorded => {
                info!(lrn=%student.lrn, name=%student.full_name(), session=%armed.session.subject, "attendance recorded");
                ScanOutcome::Recorded(student)
            }
            RecordOutcome::AlreadyRecorded => {
                info!(lrn=%student.lrn, session=%armed.session.subject, "already recorded");
                ScanOutcome::AlreadyRecorded(student)
            }
        })
    }
}
