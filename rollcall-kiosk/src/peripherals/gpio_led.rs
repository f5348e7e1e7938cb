use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use super::{PeripheralError, StatusSignal};
use crate::config::LedConfig;
use crate::indicator::LedColor;

const EXPORT_ATTEMPTS: u32 = 20;
const EXPORT_POLL: Duration = Duration::from_millis(50);

/// RGB lamp wired to three sysfs GPIO lines.
pub struct GpioLed {
    root: PathBuf,
    pins: [u32; 3],
    active_low: bool,
}

impl GpioLed {
    /// Exports the pins (when not yet exported) and configures them as outputs.
    pub async fn open(cfg: &LedConfig) -> Result<Self, PeripheralError> {
        let led = Self {
            root: cfg.gpio_root.clone(),
            pins: [cfg.red, cfg.green, cfg.blue],
            active_low: cfg.active_low,
        };
        for pin in led.pins {
            led.export(pin).await?;
            write_attr(&led.pin_dir(pin).join("direction"), "out")
                .map_err(|e| PeripheralError::Init(format!("gpio{pin} direction: {e}")))?;
        }
        info!(root=%led.root.display(), pins=?led.pins, active_low=led.active_low, "status LED ready");
        Ok(led)
    }

    fn pin_dir(&self, pin: u32) -> PathBuf {
        self.root.join(format!("gpio{pin}"))
    }

    async fn export(&self, pin: u32) -> Result<(), PeripheralError> {
        let dir = self.pin_dir(pin);
        if dir.exists() {
            return Ok(());
        }
        debug!(pin, "exporting gpio");
        write_attr(&self.root.join("export"), &pin.to_string())
            .map_err(|e| PeripheralError::Init(format!("export gpio{pin}: {e}")))?;
        // udev creates the directory asynchronously after export.
        for _ in 0..EXPORT_ATTEMPTS {
            if dir.exists() {
                return Ok(());
            }
            tokio::time::sleep(EXPORT_POLL).await;
        }
        Err(PeripheralError::Init(format!(
            "gpio{pin} did not appear under {}",
            self.root.display()
        )))
    }

    fn write_pin(&self, pin: u32, lit: bool) -> Result<(), PeripheralError> {
        let level = if lit != self.active_low { "1" } else { "0" };
        write_attr(&self.pin_dir(pin).join("value"), level)?;
        Ok(())
    }
}

#[async_trait]
impl StatusSignal for GpioLed {
    async fn set(&mut self, color: LedColor) -> Result<(), PeripheralError> {
        let (r, g, b) = color.channels();
        let [red, green, blue] = self.pins;
        self.write_pin(red, r)?;
        self.write_pin(green, g)?;
        self.write_pin(blue, b)?;
        Ok(())
    }
}

fn write_attr(path: &Path, value: &str) -> std::io::Result<()> {
    std::fs::write(path, value)
}
