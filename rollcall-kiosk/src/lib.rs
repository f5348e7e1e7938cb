use std::path::Path;
use std::time::Duration;

use rollcall_registry::storage::{StorageError, Store};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

pub mod cli;
pub mod clock;
pub mod config;
pub mod dispatch;
pub mod gate;
pub mod indicator;
pub mod install;
pub mod kiosk;
pub mod peripherals;
pub mod tracker;

pub use cli::{Cli, Command};
pub use config::{KioskConfig, load_config, resolve_config_path};

use clock::SystemClock;
use dispatch::Dispatcher;
use indicator::{Indicator, LedColor};
use kiosk::{Kiosk, Timing};
use peripherals::{
    GpioLed, LineScanner, MessageTransport, Modem, PeripheralError, ProcessScanner, ScanSource,
    StatusSignal,
};

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(String),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("peripheral error: {0}")]
    Peripheral(#[from] PeripheralError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Console output, plus a daily rolling file when `log_dir` is given. The
/// returned guard flushes the file writer on drop.
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let console = fmt::layer().with_target(false).compact();
    match log_dir.filter(|dir| std::fs::create_dir_all(dir).is_ok()) {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "rollcall-kiosk.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(env_filter)
                .with(console)
                .with(fmt::layer().with_ansi(false).with_writer(writer))
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(console)
                .init();
            None
        }
    }
}

pub async fn run(cli: Cli) -> Result<(), AppError> {
    match cli.command.unwrap_or(Command::Run) {
        Command::Install { unit, force } => {
            let _guard = init_tracing(None);
            let config_path = resolve_config_path(cli.config)?;
            let binary = std::env::current_exe()?;
            install::install_system(&unit, &config_path, &binary, force)
        }
        Command::Uninstall {
            unit,
            remove_config,
        } => {
            let _guard = init_tracing(None);
            let config_path = resolve_config_path(cli.config)?;
            install::uninstall_system(&unit, remove_config, &config_path)
        }
        Command::Led { color } => {
            let (_, cfg) = KioskConfig::find_and_load(cli.config)?;
            let _guard = init_tracing(None);
            let mut led = GpioLed::open(&cfg.led).await?;
            led.set(color).await?;
            println!("LED set to {color}");
            Ok(())
        }
        Command::Inbox => {
            let (_, cfg) = KioskConfig::find_and_load(cli.config)?;
            let _guard = init_tracing(None);
            let mut modem = Modem::open(&cfg.modem).await?;
            let messages = modem.receive_unread().await?;
            if messages.is_empty() {
                println!("no unread messages");
            }
            for m in messages {
                println!(
                    "#{} from {} at {}:\n{}\n",
                    m.index,
                    m.sender,
                    m.timestamp.as_deref().unwrap_or("?"),
                    m.text
                );
            }
            Ok(())
        }
        Command::Run => {
            let (cfg_path, cfg) = KioskConfig::find_and_load(cli.config)?;
            let _guard = init_tracing(Some(&cfg.log_dir));
            info!(path=%cfg_path.display(), "loaded config");
            run_kiosk(cfg).await
        }
    }
}

/// Brings up storage and peripherals (any failure here is fatal), then runs
/// the loop until SIGINT or SIGTERM.
async fn run_kiosk(cfg: KioskConfig) -> Result<(), AppError> {
    let db_path = cfg.db_path.to_string_lossy().into_owned();
    let store = Store::connect_sqlite(&db_path).await?;
    info!(path=%db_path, "database ready");

    let mut led = GpioLed::open(&cfg.led).await?;
    led.set(LedColor::White).await?;
    let modem = Modem::open(&cfg.modem).await?;
    let scanner: Box<dyn ScanSource> = match cfg.scanner.kind {
        config::ScannerKind::Command => Box::new(ProcessScanner::spawn(&cfg.scanner.command)?),
        config::ScannerKind::Stdin => Box::new(LineScanner::stdin()),
    };

    let dispatcher = Dispatcher::new(
        store.clone(),
        Box::new(modem),
        cfg.dispatch.guardian_policy,
        Duration::from_millis(cfg.dispatch.send_interval_ms),
        cfg.maintenance_contact.as_ref().map(|p| p.as_str().to_string()),
    );
    let timing = Timing {
        tick: cfg.tick(),
        scan_timeout: Duration::from_millis(cfg.scanner.timeout_ms),
        feedback: Duration::from_millis(cfg.scanner.feedback_ms),
    };
    let mut kiosk = Kiosk::new(
        store,
        Box::new(SystemClock::new(cfg.zone()?)),
        dispatcher,
        Indicator::new(Box::new(led)),
        scanner,
        timing,
    );

    let cancel = CancellationToken::new();
    let main_loop = kiosk.run(cancel.child_token());
    tokio::pin!(main_loop);

    // Shutdown is observed between iterations; an in-flight dispatch completes.
    tokio::select! {
        res = &mut main_loop => return res,
        sig = shutdown_signal() => {
            sig?;
            info!("shutdown signal received; stopping after the current iteration");
            cancel.cancel();
        }
    }
    main_loop.await
}

async fn shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::select! {
        _ = sigint.recv() => {
            info!("shutdown: received SIGINT");
        }
        _ = sigterm.recv() => {
            info!("shutdown: received SIGTERM");
        }
    }
    Ok(())
}
