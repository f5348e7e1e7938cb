use std::time::Duration;

use rollcall_registry::storage::Store;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::AppError;
use crate::clock::Clock;
use crate::dispatch::{DispatchReport, Dispatcher};
use crate::gate::{ScanGate, ScanOutcome};
use crate::indicator::{Indicator, KioskStatus, LedColor};
use crate::peripherals::ScanSource;
use crate::tracker::{ArmedSession, SessionTracker, Step};

#[derive(Debug, Clone, Copy)]
pub struct Timing {
    /// Pause between polls while no session is armed, and after a fault.
    pub tick: Duration,
    /// Longest wait for one scan before the session end is re-checked.
    pub scan_timeout: Duration,
    /// How long a scan outcome stays on the indicator.
    pub feedback: Duration,
}

/// Result of one loop iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tick {
    Idle,
    /// Armed, but no scan arrived within the timeout.
    Waiting,
    Scanned(ScanOutcome),
    Dispatched(DispatchReport),
}

pub struct Kiosk {
    store: Store,
    clock: Box<dyn Clock>,
    tracker: SessionTracker,
    gate: ScanGate,
    dispatcher: Dispatcher,
    indicator: Indicator,
    scanner: Box<dyn ScanSource>,
    timing: Timing,
}

impl Kiosk {
    pub fn new(
        store: Store,
        clock: Box<dyn Clock>,
        dispatcher: Dispatcher,
        indicator: Indicator,
        scanner: Box<dyn ScanSource>,
        timing: Timing,
    ) -> Self {
        Self {
            gate: ScanGate::new(store.clone()),
            store,
            clock,
            tracker: SessionTracker::new(),
            dispatcher,
            indicator,
            scanner,
            timing,
        }
    }

    pub fn tracker(&self) -> &SessionTracker {
        &self.tracker
    }

    pub fn indicator(&self) -> &Indicator {
        &self.indicator
    }

    /// One pass: poll the tracker, then scan or dispatch as the state demands.
    pub async fn tick(&mut self) -> Result<Tick, AppError> {
        let now = self.clock.now();
        match self.tracker.poll(&self.store, now).await? {
            Step::Idle => {
                self.indicator.show(KioskStatus::NotReady).await?;
                Ok(Tick::Idle)
            }
            Step::Armed(armed) | Step::Open(armed) => {
                self.indicator.show(KioskStatus::Ready).await?;
                self.scan(&armed).await
            }
            Step::Closed(armed) => {
                let shown = self.indicator.show(KioskStatus::Busy).await;
                let report = self.dispatcher.dispatch(&armed).await;
                self.tracker.finish();
                shown?;
                Ok(Tick::Dispatched(report?))
            }
            Step::Pending => {
                // Only reachable if a previous dispatch never returned.
                self.tracker.finish();
                Ok(Tick::Idle)
            }
        }
    }

    async fn scan(&mut self, armed: &ArmedSession) -> Result<Tick, AppError> {
        let Some(payload) = self.scanner.poll(self.timing.scan_timeout).await? else {
            return Ok(Tick::Waiting);
        };
        let stamped = self.clock.now();
        let outcome = self.gate.admit(armed, &payload, stamped).await?;
        let feedback = match &outcome {
            ScanOutcome::Recorded(_) => Some(KioskStatus::Recorded),
            ScanOutcome::AlreadyRecorded(_) => Some(KioskStatus::Duplicate),
            ScanOutcome::UnknownStudent(_) => Some(KioskStatus::Rejected),
            ScanOutcome::Ignored | ScanOutcome::OutsideWindow => None,
        };
        if let Some(status) = feedback {
            self.indicator.show(status).await?;
            tokio::time::sleep(self.timing.feedback).await;
        }
        Ok(Tick::Scanned(outcome))
    }

    /// Runs until `cancel` fires. Faults inside an iteration are logged,
    /// shown on the indicator, and the loop carries on. A fatal peripheral
    /// fault (the scan source is gone) ends the loop with that error, leaving
    /// the fault colour lit.
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<(), AppError> {
        info!("kiosk loop started");
        while !cancel.is_cancelled() {
            let pause = match self.tick().await {
                Ok(Tick::Idle) => true,
                Ok(Tick::Dispatched(report)) => {
                    if !report.is_clean() {
                        warn!(failed=?report.failed, "some notifications were not delivered");
                    }
                    false
                }
                Ok(_) => false,
                Err(AppError::Peripheral(e)) if e.is_fatal() => {
                    error!(error=%e, "kiosk cannot continue");
                    if let Err(e) = self.indicator.show(KioskStatus::Fault).await {
                        warn!(error=%e, "could not show fault on indicator");
                    }
                    return Err(e.into());
                }
                Err(e) => {
                    error!(error=%e, "kiosk iteration failed");
                    if let Err(e) = self.indicator.show(KioskStatus::Fault).await {
                        warn!(error=%e, "could not show fault on indicator");
                    }
                    true
                }
            };
            if pause {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(self.timing.tick) => {}
                }
            }
        }
        if let Err(e) = self.indicator.set(LedColor::Off).await {
            warn!(error=%e, "could not switch indicator off");
        }
        info!("kiosk loop stopped");
        Ok(())
    }
}
