//! End-of-session notifications.
//!
//! The teacher receives a summary of who attended and who did not; each
//! guardian receives a notice about their student. Messages go out one at a
//! time with a fixed pause between them.

use std::time::Duration;

use chrono::{NaiveDate, NaiveTime};
use rollcall_registry::roll::Roll;
use rollcall_registry::storage::models::{ClassSession, Student};
use rollcall_registry::storage::{StorageError, Store};
use rollcall_shared::domain;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::peripherals::MessageTransport;
use crate::tracker::ArmedSession;

/// Longest text that fits a single SMS.
pub const SMS_LIMIT: usize = 160;

/// Which guardians hear about a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardianPolicy {
    #[default]
    All,
    AbsentOnly,
}

/// Messages for one recipient. A failed part abandons the remaining parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outgoing {
    pub recipient: String,
    pub parts: Vec<String>,
}

impl Outgoing {
    fn single(recipient: &str, text: String) -> Self {
        Self {
            recipient: recipient.to_string(),
            parts: vec![text],
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Messages (SMS parts) delivered to the transport.
    pub sent: usize,
    /// Recipients that were abandoned after a failed send.
    pub failed: Vec<String>,
}

impl DispatchReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

pub fn teacher_summary(session: &ClassSession, date: NaiveDate, roll: &Roll) -> String {
    let mut lines = vec![
        format!("Attendance - {}", domain::long_date(date)),
        format!(
            "{} ({} - {})",
            session.subject,
            domain::short_time(session.start_time),
            domain::short_time(session.end_time)
        ),
        "Present:".to_string(),
    ];
    for (student, time_in) in &roll.present {
        let at = time_in
            .map(|t| t.format("%H:%M:%S").to_string())
            .unwrap_or_else(|| "-".into());
        lines.push(format!("{} ({}) - {at}", student.full_name(), student.lrn));
    }
    lines.push("Absent:".to_string());
    for student in &roll.absent {
        lines.push(format!("{} ({})", student.full_name(), student.lrn));
    }
    lines.join("\n")
}

pub fn absent_notice(student: &Student, session: &ClassSession, date: NaiveDate) -> String {
    format!(
        "{} ({}) missed the {} class on {}.",
        student.full_name(),
        student.lrn,
        session.subject,
        domain::long_date(date)
    )
}

pub fn present_notice(
    student: &Student,
    session: &ClassSession,
    date: NaiveDate,
    time_in: Option<NaiveTime>,
) -> String {
    let mut text = format!(
        "{} ({}) attended the {} class on {}",
        student.full_name(),
        student.lrn,
        session.subject,
        domain::long_date(date)
    );
    if let Some(t) = time_in {
        text.push_str(&format!(" at {}", domain::short_time(t)));
    }
    text.push('.');
    text
}

/// Splits `text` at line boundaries into parts of at most `limit` characters.
/// A single line longer than `limit` is cut into `limit`-sized pieces.
pub fn split_sms(text: &str, limit: usize) -> Vec<String> {
    let limit = limit.max(1);
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;
    for line in text.lines() {
        let chars: Vec<char> = line.chars().collect();
        let pieces: Vec<String> = if chars.is_empty() {
            vec![String::new()]
        } else {
            chars.chunks(limit).map(|c| c.iter().collect()).collect()
        };
        for piece in pieces {
            let piece_len = piece.chars().count();
            let joined = if current.is_empty() {
                piece_len
            } else {
                current_len + 1 + piece_len
            };
            if joined > limit && !current.is_empty() {
                parts.push(std::mem::take(&mut current));
                current_len = 0;
            }
            if !current.is_empty() {
                current.push('\n');
                current_len += 1;
            }
            current.push_str(&piece);
            current_len += piece_len;
        }
    }
    if !current.is_empty() {
        parts.push(current);
    }
    parts
}

/// Every message for one closed session, teacher first, then guardians of
/// absentees, then guardians of attendees.
pub fn plan_messages(
    session: &ClassSession,
    teacher_phone: Option<&str>,
    date: NaiveDate,
    roll: &Roll,
    policy: GuardianPolicy,
) -> Vec<Outgoing> {
    let mut plan = Vec::new();
    if let Some(phone) = teacher_phone {
        plan.push(Outgoing {
            recipient: phone.to_string(),
            parts: split_sms(&teacher_summary(session, date, roll), SMS_LIMIT),
        });
    }
    for student in &roll.absent {
        plan.push(Outgoing::single(
            &student.guardian_phone_number,
            absent_notice(student, session, date),
        ));
    }
    if policy == GuardianPolicy::All {
        for (student, time_in) in &roll.present {
            plan.push(Outgoing::single(
                &student.guardian_phone_number,
                present_notice(student, session, date, *time_in),
            ));
        }
    }
    plan
}

pub struct Dispatcher {
    store: Store,
    transport: Box<dyn MessageTransport>,
    policy: GuardianPolicy,
    send_interval: Duration,
    maintenance_contact: Option<String>,
}

impl Dispatcher {
    pub fn new(
        store: Store,
        transport: Box<dyn MessageTransport>,
        policy: GuardianPolicy,
        send_interval: Duration,
        maintenance_contact: Option<String>,
    ) -> Self {
        Self {
            store,
            transport,
            policy,
            send_interval,
            maintenance_contact,
        }
    }

    /// Computes the roll for the closed session and sends every notification.
    /// Transport failures are reported, never returned; storage failures are.
    pub async fn dispatch(&mut self, armed: &ArmedSession) -> Result<DispatchReport, StorageError> {
        let session = &armed.session;
        let roll = self.store.roll_call(session.id, armed.date).await?;
        let teacher = self.store.get_teacher(&session.teacher_handle).await?;
        if teacher.is_none() {
            warn!(handle=%session.teacher_handle, "teacher not found; summary skipped");
        }
        info!(
            session=%session.label(),
            date=%armed.date,
            present=roll.present.len(),
            absent=roll.absent.len(),
            "dispatching attendance"
        );

        let plan = plan_messages(
            session,
            teacher.as_ref().map(|t| t.phone_number.as_str()),
            armed.date,
            &roll,
            self.policy,
        );
        let report = self.deliver(&plan).await;

        if !report.is_clean() {
            self.alert_maintenance(armed, &report, plan.len()).await;
        }
        info!(sent = report.sent, failed = report.failed.len(), "dispatch finished");
        Ok(report)
    }

    async fn deliver(&mut self, plan: &[Outgoing]) -> DispatchReport {
        let mut report = DispatchReport::default();
        let mut first = true;
        for outgoing in plan {
            for part in &outgoing.parts {
                if !first {
                    tokio::time::sleep(self.send_interval).await;
                }
                first = false;
                match self.transport.send(&outgoing.recipient, part).await {
                    Ok(()) => report.sent += 1,
                    Err(e) => {
                        error!(recipient=%outgoing.recipient, error=%e, "send failed; skipping recipient");
                        report.failed.push(outgoing.recipient.clone());
                        break;
                    }
                }
            }
        }
        report
    }

    async fn alert_maintenance(&mut self, armed: &ArmedSession, report: &DispatchReport, total: usize) {
        let Some(contact) = self.maintenance_contact.clone() else {
            return;
        };
        let text = format!(
            "Roll call: {} of {} notifications for {} on {} failed.",
            report.failed.len(),
            total,
            armed.session.label(),
            domain::long_date(armed.date)
        );
        tokio::time::sleep(self.send_interval).await;
        if let Err(e) = self.transport.send(&contact, &text).await {
            error!(contact=%contact, error=%e, "maintenance alert failed");
        }
    }
}
