pub mod gpio_led;
pub mod modem;
pub mod scanner;

use std::time::Duration;

use async_trait::async_trait;

use crate::indicator::LedColor;

pub use gpio_led::GpioLed;
pub use modem::{InboxMessage, Modem};
pub use scanner::{LineScanner, ProcessScanner};

#[derive(Debug, thiserror::Error)]
pub enum PeripheralError {
    /// The device could not be brought up; fatal at startup.
    #[error("init error: {0}")]
    Init(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("scan error: {0}")]
    Scan(String),
    /// The scan source ended and cannot be brought back.
    #[error("scanner closed: {0}")]
    Closed(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl PeripheralError {
    /// Faults the kiosk loop cannot ride out.
    pub fn is_fatal(&self) -> bool {
        matches!(self, PeripheralError::Init(_) | PeripheralError::Closed(_))
    }
}

/// Source of scanned identifiers (QR payloads).
#[async_trait]
pub trait ScanSource: Send {
    /// Waits at most `timeout` for the next non-empty payload.
    async fn poll(&mut self, timeout: Duration) -> Result<Option<String>, PeripheralError>;
}

/// Outbound and inbound text messaging.
#[async_trait]
pub trait MessageTransport: Send {
    async fn send(&mut self, recipient: &str, text: &str) -> Result<(), PeripheralError>;
    async fn receive_unread(&mut self) -> Result<Vec<InboxMessage>, PeripheralError>;
}

/// A single tri-colour lamp.
#[async_trait]
pub trait StatusSignal: Send {
    async fn set(&mut self, color: LedColor) -> Result<(), PeripheralError>;
}
