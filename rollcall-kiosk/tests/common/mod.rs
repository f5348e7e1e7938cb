#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use rollcall_kiosk::clock::Clock;
use rollcall_kiosk::dispatch::{Dispatcher, GuardianPolicy};
use rollcall_kiosk::indicator::{Indicator, LedColor};
use rollcall_kiosk::kiosk::{Kiosk, Timing};
use rollcall_kiosk::peripherals::{
    InboxMessage, MessageTransport, PeripheralError, ScanSource, StatusSignal,
};
use rollcall_registry::roster::Roster;
use rollcall_registry::storage::Store;
use rollcall_shared::{Lrn, PhoneNumber, StudentEntry};
use tokio_util::sync::CancellationToken;

pub const ROSTER: &str = r#"
teachers:
  - handle: mreyes
    first_name: Maria
    last_name: Reyes
    phone: "+639171234567"
students:
  - lrn: "136514120001"
    first_name: Ana
    last_name: Cruz
    guardian_phone: "+639181111111"
  - lrn: "136514120002"
    first_name: Ben
    last_name: Santos
    guardian_phone: "+639182222222"
sessions:
  - subject: Mathematics
    day: monday
    start: "09:00:00"
    end: "10:00:00"
    teacher: mreyes
"#;

pub const ANA: &str = "136514120001";
pub const BEN: &str = "136514120002";
pub const TEACHER_PHONE: &str = "+639171234567";
pub const ANA_GUARDIAN: &str = "+639181111111";
pub const BEN_GUARDIAN: &str = "+639182222222";
pub const MAINTENANCE: &str = "+639179999999";

/// 2023-09-18 was a Monday.
pub fn monday_at(h: u32, m: u32, s: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2023, 9, 18)
        .unwrap()
        .and_hms_opt(h, m, s)
        .unwrap()
}

#[derive(Clone)]
pub struct ManualClock(Arc<Mutex<NaiveDateTime>>);

impl ManualClock {
    pub fn new(at: NaiveDateTime) -> Self {
        Self(Arc::new(Mutex::new(at)))
    }

    pub fn set(&self, at: NaiveDateTime) {
        *self.0.lock().unwrap() = at;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> NaiveDateTime {
        *self.0.lock().unwrap()
    }
}

/// Records every send; recipients in `failing` always fail, and a recipient
/// in `allowance` fails once that many sends to it went through.
#[derive(Clone, Default)]
pub struct FakeTransport {
    pub sent: Arc<Mutex<Vec<(String, String)>>>,
    pub failing: Arc<Mutex<Vec<String>>>,
    pub allowance: Arc<Mutex<HashMap<String, usize>>>,
}

impl FakeTransport {
    pub fn fail_for(&self, recipient: &str) {
        self.failing.lock().unwrap().push(recipient.to_string());
    }

    pub fn fail_after(&self, recipient: &str, successes: usize) {
        self.allowance
            .lock()
            .unwrap()
            .insert(recipient.to_string(), successes);
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self, recipient: &str) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter(|(r, _)| r == recipient)
            .map(|(_, t)| t)
            .collect()
    }
}

#[async_trait]
impl MessageTransport for FakeTransport {
    async fn send(&mut self, recipient: &str, text: &str) -> Result<(), PeripheralError> {
        if self.failing.lock().unwrap().iter().any(|r| r == recipient) {
            return Err(PeripheralError::Transport(format!("no signal for {recipient}")));
        }
        if let Some(left) = self.allowance.lock().unwrap().get_mut(recipient) {
            if *left == 0 {
                return Err(PeripheralError::Transport(format!("signal lost for {recipient}")));
            }
            *left -= 1;
        }
        self.sent
            .lock()
            .unwrap()
            .push((recipient.to_string(), text.to_string()));
        Ok(())
    }

    async fn receive_unread(&mut self) -> Result<Vec<InboxMessage>, PeripheralError> {
        Ok(Vec::new())
    }
}

/// Hands out scripted poll results; once the script runs dry it cancels
/// `done` (when set) and reports no scan.
#[derive(Clone, Default)]
pub struct FakeScanner {
    script: Arc<Mutex<VecDeque<Result<Option<String>, String>>>>,
    done: Option<CancellationToken>,
}

impl FakeScanner {
    pub fn cancelling(done: CancellationToken) -> Self {
        Self {
            script: Arc::default(),
            done: Some(done),
        }
    }

    pub fn push(&self, lrn: &str) {
        self.script.lock().unwrap().push_back(Ok(Some(lrn.to_string())));
    }

    pub fn push_fault(&self, reason: &str) {
        self.script.lock().unwrap().push_back(Err(reason.to_string()));
    }
}

#[async_trait]
impl ScanSource for FakeScanner {
    async fn poll(&mut self, _timeout: Duration) -> Result<Option<String>, PeripheralError> {
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Ok(scan)) => Ok(scan),
            Some(Err(reason)) => Err(PeripheralError::Scan(reason)),
            None => {
                if let Some(done) = &self.done {
                    done.cancel();
                }
                Ok(None)
            }
        }
    }
}

#[derive(Clone, Default)]
pub struct FakeLed {
    pub history: Arc<Mutex<Vec<LedColor>>>,
}

impl FakeLed {
    pub fn history(&self) -> Vec<LedColor> {
        self.history.lock().unwrap().clone()
    }

    pub fn last(&self) -> Option<LedColor> {
        self.history().last().copied()
    }
}

#[async_trait]
impl StatusSignal for FakeLed {
    async fn set(&mut self, color: LedColor) -> Result<(), PeripheralError> {
        self.history.lock().unwrap().push(color);
        Ok(())
    }
}

pub struct Harness {
    pub kiosk: Kiosk,
    pub store: Store,
    pub clock: ManualClock,
    pub transport: FakeTransport,
    pub scanner: FakeScanner,
    pub led: FakeLed,
    _tempdir: tempfile::TempDir,
}

pub struct HarnessOptions {
    pub policy: GuardianPolicy,
    pub maintenance: Option<String>,
    pub scanner: FakeScanner,
    /// Replaces `scanner` as the kiosk's scan source when set.
    pub scan_source: Option<Box<dyn ScanSource>>,
    /// Students enrolled on top of the two in `ROSTER`.
    pub extra_students: usize,
    pub start: NaiveDateTime,
}

impl Default for HarnessOptions {
    fn default() -> Self {
        Self {
            policy: GuardianPolicy::All,
            maintenance: None,
            scanner: FakeScanner::default(),
            scan_source: None,
            extra_students: 0,
            start: monday_at(8, 59, 0),
        }
    }
}

/// Guardian number of the `n`th extra student.
pub fn extra_guardian(n: usize) -> String {
    format!("+63918000{n:04}")
}

pub async fn seeded_store() -> (Store, tempfile::TempDir) {
    seeded_store_with(0).await
}

pub async fn seeded_store_with(extra_students: usize) -> (Store, tempfile::TempDir) {
    let mut roster = Roster::from_yaml_str(ROSTER).unwrap();
    for n in 0..extra_students {
        roster.students.push(StudentEntry {
            lrn: Lrn::from(format!("1365141201{n:02}")),
            first_name: format!("Pupil{n:02}"),
            last_name: "Villanueva".into(),
            guardian_phone: PhoneNumber::parse(&extra_guardian(n)).unwrap(),
        });
    }
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("kiosk.db");
    let store = Store::connect_sqlite(db_path.to_str().unwrap())
        .await
        .expect("db");
    store
        .seed_roster(&roster)
        .await
        .expect("seed");
    (store, dir)
}

impl Harness {
    pub async fn new() -> Self {
        Self::with(HarnessOptions::default()).await
    }

    pub async fn with(opts: HarnessOptions) -> Self {
        let (store, dir) = seeded_store_with(opts.extra_students).await;
        let clock = ManualClock::new(opts.start);
        let transport = FakeTransport::default();
        let led = FakeLed::default();
        let dispatcher = Dispatcher::new(
            store.clone(),
            Box::new(transport.clone()),
            opts.policy,
            Duration::ZERO,
            opts.maintenance,
        );
        let kiosk = Kiosk::new(
            store.clone(),
            Box::new(clock.clone()),
            dispatcher,
            Indicator::new(Box::new(led.clone())),
            opts.scan_source
                .unwrap_or_else(|| Box::new(opts.scanner.clone())),
            Timing {
                tick: Duration::from_millis(1),
                scan_timeout: Duration::from_millis(1),
                feedback: Duration::ZERO,
            },
        );
        Self {
            kiosk,
            store,
            clock,
            transport,
            scanner: opts.scanner,
            led,
            _tempdir: dir,
        }
    }
}
