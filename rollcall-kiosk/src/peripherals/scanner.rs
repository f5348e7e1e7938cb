use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::process::{Child, ChildStdout, Command};
use tracing::{info, warn};

use super::{PeripheralError, ScanSource};

/// Reads one payload per line from any buffered reader.
pub struct LineScanner<R> {
    lines: Lines<R>,
    closed: bool,
}

impl<R: AsyncBufRead + Unpin + Send> LineScanner<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            closed: false,
        }
    }
}

impl LineScanner<BufReader<Stdin>> {
    /// Keyboard-wedge scanners type the payload followed by Enter.
    pub fn stdin() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()))
    }
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send> ScanSource for LineScanner<R> {
    async fn poll(&mut self, timeout: Duration) -> Result<Option<String>, PeripheralError> {
        if self.closed {
            return Err(PeripheralError::Closed("end of input".into()));
        }
        // `next_line` is cancellation safe, so a timeout never loses a partial line.
        match tokio::time::timeout(timeout, self.lines.next_line()).await {
            Err(_) => Ok(None),
            Ok(Ok(Some(line))) => {
                let payload = line.trim();
                if payload.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(payload.to_string()))
                }
            }
            Ok(Ok(None)) => {
                self.closed = true;
                Err(PeripheralError::Closed("end of input".into()))
            }
            Ok(Err(e)) => Err(e.into()),
        }
    }
}

/// Consecutive decoder restarts without a payload before the scanner gives up.
const MAX_RESTARTS: u32 = 3;

/// A decoder process (e.g. `zbarcam --raw`) printing one payload per line.
/// The process is restarted when its output ends.
pub struct ProcessScanner {
    argv: Vec<String>,
    child: Child,
    lines: LineScanner<BufReader<ChildStdout>>,
    restarts: u32,
}

impl ProcessScanner {
    pub fn spawn(argv: &[String]) -> Result<Self, PeripheralError> {
        let (child, lines) = start_decoder(argv)?;
        Ok(Self {
            argv: argv.to_vec(),
            child,
            lines,
            restarts: 0,
        })
    }

    async fn restart(&mut self) -> Result<(), PeripheralError> {
        if self.child.try_wait()?.is_none() {
            self.child.start_kill()?;
        }
        let status = self.child.wait().await?;
        if self.restarts >= MAX_RESTARTS {
            return Err(PeripheralError::Closed(format!(
                "{} exited {} times without a scan (last: {status})",
                self.argv[0],
                self.restarts + 1
            )));
        }
        self.restarts += 1;
        warn!(%status, attempt = self.restarts, "scanner process exited; restarting");
        let (child, lines) = start_decoder(&self.argv)?;
        self.child = child;
        self.lines = lines;
        Ok(())
    }
}

fn start_decoder(
    argv: &[String],
) -> Result<(Child, LineScanner<BufReader<ChildStdout>>), PeripheralError> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| PeripheralError::Init("scanner command is empty".into()))?;
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| PeripheralError::Init(format!("spawn {program}: {e}")))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| PeripheralError::Init(format!("{program} has no stdout")))?;
    info!(program=%program, args=?args, pid=?child.id(), "scanner process started");
    Ok((child, LineScanner::new(BufReader::new(stdout))))
}

#[async_trait]
impl ScanSource for ProcessScanner {
    async fn poll(&mut self, timeout: Duration) -> Result<Option<String>, PeripheralError> {
        match self.lines.poll(timeout).await {
            Ok(Some(payload)) => {
                self.restarts = 0;
                Ok(Some(payload))
            }
            Err(PeripheralError::Closed(_)) => {
                self.restart().await?;
                Ok(None)
            }
            other => other,
        }
    }
}
