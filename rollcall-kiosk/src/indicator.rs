use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::peripherals::{PeripheralError, StatusSignal};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LedColor {
    Off,
    White,
    Blue,
    Yellow,
    Green,
    Red,
}

impl LedColor {
    /// Which of the (red, green, blue) channels are lit.
    pub fn channels(self) -> (bool, bool, bool) {
        match self {
            LedColor::Off => (false, false, false),
            LedColor::White => (true, true, true),
            LedColor::Blue => (false, false, true),
            LedColor::Yellow => (true, true, false),
            LedColor::Green => (false, true, false),
            LedColor::Red => (true, false, false),
        }
    }
}

impl fmt::Display for LedColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LedColor::Off => "off",
            LedColor::White => "white",
            LedColor::Blue => "blue",
            LedColor::Yellow => "yellow",
            LedColor::Green => "green",
            LedColor::Red => "red",
        };
        f.write_str(name)
    }
}

/// What the kiosk wants the person in front of it to know.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KioskStatus {
    NotReady,
    Ready,
    Busy,
    Recorded,
    Duplicate,
    Rejected,
    Fault,
}

impl KioskStatus {
    pub fn color(self) -> LedColor {
        match self {
            KioskStatus::NotReady => LedColor::White,
            KioskStatus::Ready => LedColor::Blue,
            KioskStatus::Busy | KioskStatus::Duplicate => LedColor::Yellow,
            KioskStatus::Recorded => LedColor::Green,
            KioskStatus::Rejected | KioskStatus::Fault => LedColor::Red,
        }
    }
}

/// Drives a [`StatusSignal`], skipping writes that would not change the colour.
pub struct Indicator {
    signal: Box<dyn StatusSignal>,
    shown: Option<LedColor>,
}

impl Indicator {
    pub fn new(signal: Box<dyn StatusSignal>) -> Self {
        Self {
            signal,
            shown: None,
        }
    }

    pub async fn show(&mut self, status: KioskStatus) -> Result<(), PeripheralError> {
        self.set(status.color()).await
    }

    pub async fn set(&mut self, color: LedColor) -> Result<(), PeripheralError> {
        if self.shown == Some(color) {
            return Ok(());
        }
        debug!(%color, "indicator");
        // Forget the cached colour on failure so the next write is retried.
        self.shown = None;
        self.signal.set(color).await?;
        self.shown = Some(color);
        Ok(())
    }

    pub fn shown(&self) -> Option<LedColor> {
        self.shown
    }
}
