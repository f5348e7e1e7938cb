use chrono::{Local, NaiveDateTime, Utc};
use chrono_tz::Tz;

/// Wall-clock source for the kiosk loop.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// System time, read in a fixed zone when one is configured and in the
/// host's local zone otherwise.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock {
    zone: Option<Tz>,
}

impl SystemClock {
    pub fn new(zone: Option<Tz>) -> Self {
        Self { zone }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        match self.zone {
            Some(tz) => Utc::now().with_timezone(&tz).naive_local(),
            None => Local::now().naive_local(),
        }
    }
}
