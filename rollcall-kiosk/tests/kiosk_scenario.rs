mod common;

use std::time::Duration;

use common::*;
use rollcall_kiosk::AppError;
use rollcall_kiosk::dispatch::GuardianPolicy;
use rollcall_kiosk::gate::{ScanGate, ScanOutcome};
use rollcall_kiosk::indicator::LedColor;
use rollcall_kiosk::kiosk::Tick;
use rollcall_kiosk::peripherals::{LineScanner, PeripheralError, ProcessScanner};
use rollcall_kiosk::tracker::{ArmedSession, TrackerState};
use tokio_util::sync::CancellationToken;

const SUMMARY: &str = "Attendance - September 18, 2023\n\
Mathematics (09:00 - 10:00)\n\
Present:\n\
Ana Cruz (136514120001) - 09:15:00\n\
Absent:\n\
Ben Santos (136514120002)";

#[tokio::test]
async fn full_session_records_and_notifies() {
    let mut h = Harness::new().await;

    assert_eq!(h.kiosk.tick().await.unwrap(), Tick::Idle);
    assert_eq!(h.led.last(), Some(LedColor::White));

    h.clock.set(monday_at(9, 15, 0));
    h.scanner.push(ANA);
    let tick = h.kiosk.tick().await.unwrap();
    assert!(matches!(tick, Tick::Scanned(ScanOutcome::Recorded(ref s)) if s.lrn == ANA));
    assert_eq!(
        h.led.history(),
        vec![LedColor::White, LedColor::Blue, LedColor::Green]
    );

    h.clock.set(monday_at(9, 20, 0));
    assert_eq!(h.kiosk.tick().await.unwrap(), Tick::Waiting);

    h.clock.set(monday_at(10, 1, 0));
    let Tick::Dispatched(report) = h.kiosk.tick().await.unwrap() else {
        panic!("expected dispatch at 10:01");
    };
    assert_eq!(report.sent, 3);
    assert!(report.is_clean());
    assert_eq!(h.led.last(), Some(LedColor::Yellow));

    assert_eq!(h.transport.sent_to(TEACHER_PHONE), vec![SUMMARY.to_string()]);
    assert_eq!(
        h.transport.sent_to(BEN_GUARDIAN),
        vec!["Ben Santos (136514120002) missed the Mathematics class on September 18, 2023.".to_string()]
    );
    assert_eq!(
        h.transport.sent_to(ANA_GUARDIAN),
        vec!["Ana Cruz (136514120001) attended the Mathematics class on September 18, 2023 at 09:15.".to_string()]
    );
    // Teacher first, then absentees, then attendees.
    let order: Vec<String> = h.transport.sent().into_iter().map(|(r, _)| r).collect();
    assert_eq!(order, vec![TEACHER_PHONE, BEN_GUARDIAN, ANA_GUARDIAN]);

    assert_eq!(h.kiosk.tracker().state(), &TrackerState::Unarmed);
    assert_eq!(h.kiosk.tick().await.unwrap(), Tick::Idle);
    assert_eq!(h.transport.sent().len(), 3);
}

#[tokio::test]
async fn absent_only_policy_skips_present_guardians() {
    let mut h = Harness::with(HarnessOptions {
        policy: GuardianPolicy::AbsentOnly,
        start: monday_at(9, 15, 0),
        ..Default::default()
    })
    .await;

    h.scanner.push(ANA);
    h.kiosk.tick().await.unwrap();
    h.clock.set(monday_at(10, 1, 0));
    let Tick::Dispatched(report) = h.kiosk.tick().await.unwrap() else {
        panic!("expected dispatch");
    };

    assert_eq!(report.sent, 2);
    assert!(h.transport.sent_to(ANA_GUARDIAN).is_empty());
    assert_eq!(h.transport.sent_to(BEN_GUARDIAN).len(), 1);
}

#[tokio::test]
async fn unknown_lrn_is_rejected_without_a_record() {
    let mut h = Harness::with(HarnessOptions {
        start: monday_at(9, 5, 0),
        ..Default::default()
    })
    .await;

    h.scanner.push("000000000000");
    let tick = h.kiosk.tick().await.unwrap();
    assert_eq!(
        tick,
        Tick::Scanned(ScanOutcome::UnknownStudent("000000000000".into()))
    );
    assert_eq!(h.led.last(), Some(LedColor::Red));
    assert!(h.store.list_attendance(None, None).await.unwrap().is_empty());

    h.scanner.push(BEN);
    let tick = h.kiosk.tick().await.unwrap();
    assert!(matches!(tick, Tick::Scanned(ScanOutcome::Recorded(_))));
    assert_eq!(h.led.last(), Some(LedColor::Green));
}

#[tokio::test]
async fn second_scan_is_a_duplicate() {
    let mut h = Harness::with(HarnessOptions {
        start: monday_at(9, 5, 0),
        ..Default::default()
    })
    .await;

    h.scanner.push(ANA);
    h.kiosk.tick().await.unwrap();
    h.clock.set(monday_at(9, 40, 0));
    h.scanner.push(ANA);
    let tick = h.kiosk.tick().await.unwrap();

    assert!(matches!(tick, Tick::Scanned(ScanOutcome::AlreadyRecorded(_))));
    assert_eq!(h.led.last(), Some(LedColor::Yellow));
    let records = h.store.list_attendance(None, None).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].time_in, chrono::NaiveTime::from_hms_opt(9, 5, 0));
}

#[tokio::test]
async fn session_closes_exactly_once_at_its_end() {
    let mut h = Harness::with(HarnessOptions {
        start: monday_at(9, 0, 0),
        ..Default::default()
    })
    .await;

    assert_eq!(h.kiosk.tick().await.unwrap(), Tick::Waiting);
    h.clock.set(monday_at(9, 59, 59));
    assert_eq!(h.kiosk.tick().await.unwrap(), Tick::Waiting);
    assert!(h.kiosk.tracker().current().is_some());

    h.clock.set(monday_at(10, 0, 0));
    assert!(matches!(h.kiosk.tick().await.unwrap(), Tick::Dispatched(_)));
    assert_eq!(h.kiosk.tick().await.unwrap(), Tick::Idle);
    assert_eq!(h.kiosk.tick().await.unwrap(), Tick::Idle);

    // Nobody scanned: the teacher summary and two absence notices.
    assert_eq!(h.transport.sent().len(), 3);
}

#[tokio::test]
async fn date_change_closes_the_session() {
    let mut h = Harness::with(HarnessOptions {
        start: monday_at(9, 30, 0),
        ..Default::default()
    })
    .await;

    h.kiosk.tick().await.unwrap();
    let next_monday = monday_at(9, 30, 0) + chrono::Duration::days(7);
    h.clock.set(next_monday);

    assert!(matches!(h.kiosk.tick().await.unwrap(), Tick::Dispatched(_)));
    // The same slot a week later arms again for the new date.
    assert_eq!(h.kiosk.tick().await.unwrap(), Tick::Waiting);
    assert_eq!(
        h.kiosk.tracker().current().map(|a| a.date),
        Some(next_monday.date())
    );
}

#[tokio::test]
async fn failed_sends_are_skipped_and_reported() {
    let mut h = Harness::with(HarnessOptions {
        maintenance: Some(MAINTENANCE.into()),
        start: monday_at(9, 10, 0),
        ..Default::default()
    })
    .await;
    h.transport.fail_for(BEN_GUARDIAN);

    h.scanner.push(ANA);
    h.kiosk.tick().await.unwrap();
    h.clock.set(monday_at(10, 0, 0));
    let Tick::Dispatched(report) = h.kiosk.tick().await.unwrap() else {
        panic!("expected dispatch");
    };

    assert_eq!(report.sent, 2);
    assert_eq!(report.failed, vec![BEN_GUARDIAN.to_string()]);
    assert_eq!(h.transport.sent_to(ANA_GUARDIAN).len(), 1);
    let alerts = h.transport.sent_to(MAINTENANCE);
    assert_eq!(alerts.len(), 1);
    assert!(alerts[0].contains("1 of 3"));
    assert_eq!(h.kiosk.tracker().state(), &TrackerState::Unarmed);
}

#[tokio::test]
async fn scanner_fault_shows_red_and_loop_continues() {
    let cancel = CancellationToken::new();
    let scanner = FakeScanner::cancelling(cancel.clone());
    scanner.push_fault("camera unplugged");
    scanner.push(ANA);
    let mut h = Harness::with(HarnessOptions {
        scanner,
        start: monday_at(9, 10, 0),
        ..Default::default()
    })
    .await;

    h.kiosk.run(cancel).await.unwrap();

    let history = h.led.history();
    let red = history.iter().position(|c| *c == LedColor::Red).expect("fault shown");
    let green = history.iter().position(|c| *c == LedColor::Green).expect("scan recorded");
    assert!(red < green);
    assert_eq!(h.led.last(), Some(LedColor::Off));
    assert_eq!(h.store.list_attendance(None, None).await.unwrap().len(), 1);
}

#[tokio::test]
async fn scans_after_the_end_are_not_recorded() {
    let (store, _dir) = seeded_store().await;
    let session = store
        .session_active_at(chrono::Weekday::Mon, monday_at(9, 0, 0).time())
        .await
        .unwrap()
        .unwrap();
    let armed = ArmedSession {
        session,
        date: monday_at(9, 0, 0).date(),
    };
    let gate = ScanGate::new(store.clone());

    let late = gate.admit(&armed, ANA, monday_at(10, 0, 0)).await.unwrap();
    assert_eq!(late, ScanOutcome::OutsideWindow);
    assert_eq!(gate.admit(&armed, "  ", monday_at(9, 30, 0)).await.unwrap(), ScanOutcome::Ignored);
    assert!(store.list_attendance(None, None).await.unwrap().is_empty());
}

#[tokio::test]
async fn closed_scan_stream_ends_the_loop_with_an_error() {
    // A decoder whose output already hit end of file.
    let source = LineScanner::new(std::io::Cursor::new(Vec::<u8>::new()));
    let mut h = Harness::with(HarnessOptions {
        scan_source: Some(Box::new(source)),
        start: monday_at(9, 11, 0),
        ..Default::default()
    })
    .await;

    let result = tokio::time::timeout(Duration::from_secs(5), h.kiosk.run(CancellationToken::new()))
        .await
        .expect("loop returns instead of retrying forever");

    let err = result.unwrap_err();
    assert!(
        matches!(err, AppError::Peripheral(PeripheralError::Closed(_))),
        "{err}"
    );
    assert_eq!(h.led.last(), Some(LedColor::Red));
    assert!(h.store.list_attendance(None, None).await.unwrap().is_empty());
}

#[tokio::test]
async fn exited_decoder_is_restarted_and_scanning_resumes() {
    let argv = vec!["echo".to_string(), ANA.to_string()];
    let mut h = Harness::with(HarnessOptions {
        scan_source: Some(Box::new(ProcessScanner::spawn(&argv).unwrap())),
        start: monday_at(9, 11, 0),
        ..Default::default()
    })
    .await;

    // The decoder exits after its one line. Ticking on restarts it, and its
    // next payload still reaches the gate.
    let mut outcomes = Vec::new();
    let seen_twice = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            if let Tick::Scanned(outcome) = h.kiosk.tick().await.unwrap() {
                outcomes.push(outcome);
                if outcomes.len() == 2 {
                    break;
                }
            }
        }
    })
    .await;

    assert!(seen_twice.is_ok(), "{outcomes:?}");
    assert!(matches!(outcomes[0], ScanOutcome::Recorded(_)));
    assert!(matches!(outcomes[1], ScanOutcome::AlreadyRecorded(_)));
    assert_eq!(h.store.list_attendance(None, None).await.unwrap().len(), 1);
}

#[tokio::test]
async fn long_teacher_summary_is_sent_in_parts() {
    let mut h = Harness::with(HarnessOptions {
        extra_students: 8,
        start: monday_at(9, 10, 0),
        ..Default::default()
    })
    .await;

    h.scanner.push(ANA);
    h.kiosk.tick().await.unwrap();
    h.clock.set(monday_at(10, 0, 0));
    let Tick::Dispatched(report) = h.kiosk.tick().await.unwrap() else {
        panic!("expected dispatch");
    };

    let parts = h.transport.sent_to(TEACHER_PHONE);
    assert!(parts.len() > 1, "{parts:?}");
    assert!(parts.iter().all(|p| p.chars().count() <= 160));
    let summary = parts.join("\n");
    assert!(summary.starts_with("Attendance - September 18, 2023\nMathematics (09:00 - 10:00)"));
    for n in 0..8 {
        assert!(summary.contains(&format!("(1365141201{n:02})")));
    }
    assert!(report.is_clean());
    // Every part, plus one notice per guardian.
    assert_eq!(report.sent, parts.len() + 10);
}

#[tokio::test]
async fn failed_summary_part_abandons_the_rest_for_that_teacher() {
    let mut h = Harness::with(HarnessOptions {
        extra_students: 8,
        maintenance: Some(MAINTENANCE.into()),
        start: monday_at(9, 10, 0),
        ..Default::default()
    })
    .await;
    h.transport.fail_after(TEACHER_PHONE, 1);

    h.scanner.push(ANA);
    h.kiosk.tick().await.unwrap();
    h.clock.set(monday_at(10, 0, 0));
    let Tick::Dispatched(report) = h.kiosk.tick().await.unwrap() else {
        panic!("expected dispatch");
    };

    let teacher_parts = h.transport.sent_to(TEACHER_PHONE);
    assert_eq!(teacher_parts.len(), 1);
    assert!(teacher_parts[0].starts_with("Attendance - September 18, 2023"));
    assert_eq!(report.failed, vec![TEACHER_PHONE.to_string()]);

    // Guardians are still notified after the teacher is skipped.
    assert_eq!(h.transport.sent_to(BEN_GUARDIAN).len(), 1);
    assert_eq!(h.transport.sent_to(ANA_GUARDIAN).len(), 1);
    for n in 0..8 {
        assert_eq!(h.transport.sent_to(&extra_guardian(n)).len(), 1);
    }
    assert_eq!(report.sent, 1 + 10);
    let alerts = h.transport.sent_to(MAINTENANCE);
    assert_eq!(alerts.len(), 1);
    assert!(alerts[0].contains("1 of 11"), "{}", alerts[0]);
}
