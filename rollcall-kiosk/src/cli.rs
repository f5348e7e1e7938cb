use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::indicator::LedColor;

const HELP_EPILOG: &str = r#"Config resolution order:
  1) --config/-c PATH
  2) $ROLLCALL_CONFIG
  3) XDG default: ~/.config/rollcall/kiosk.yaml
"#;

#[derive(Debug, Parser)]
#[command(
    name = "rollcall-kiosk",
    version,
    about = "Attendance kiosk: QR check-in and SMS roll-call notifications",
    long_about = None,
    after_long_help = HELP_EPILOG,
)]
pub struct Cli {
    /// Path to YAML config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Optional subcommand. Without one, runs the kiosk.
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the kiosk loop
    Run,
    /// Print unread text messages held by the modem
    Inbox,
    /// Set the status LED to one colour and exit
    Led {
        #[arg(value_enum)]
        color: LedColor,
    },
    /// Write the default config and a systemd unit
    Install {
        /// Unit file location
        #[arg(long, default_value = "/etc/systemd/system/rollcall-kiosk.service")]
        unit: PathBuf,
        /// Overwrite existing files
        #[arg(long)]
        force: bool,
    },
    /// Remove the systemd unit (and optionally the config)
    Uninstall {
        #[arg(long, default_value = "/etc/systemd/system/rollcall-kiosk.service")]
        unit: PathBuf,
        #[arg(long)]
        remove_config: bool,
    },
}
