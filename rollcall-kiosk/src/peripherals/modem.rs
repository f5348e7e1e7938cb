use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::time::Duration;

use async_trait::async_trait;
use nix::sys::termios::{self, BaudRate, SetArg, SpecialCharacterIndices};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::{MessageTransport, PeripheralError};
use crate::config::ModemConfig;

const CTRL_Z: u8 = 0x1a;

/// An SMS read from the modem's storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboxMessage {
    pub index: u32,
    pub sender: String,
    pub timestamp: Option<String>,
    pub text: String,
}

/// GSM modem in SMS text mode, driven with AT commands over a byte port.
pub struct Modem<P> {
    port: P,
    command_delay: Duration,
    response_timeout: Duration,
    /// Wait for the network's verdict after the body is submitted.
    send_timeout: Duration,
}

impl Modem<File> {
    /// Opens and configures the serial device, then performs the AT handshake.
    pub async fn open(cfg: &ModemConfig) -> Result<Self, PeripheralError> {
        let port = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&cfg.port)
            .map_err(|e| PeripheralError::Init(format!("open {}: {e}", cfg.port.display())))?;
        configure_serial(&port, cfg.baud)?;
        let mut modem = Modem::new(
            port,
            Duration::from_millis(cfg.command_delay_ms),
            Duration::from_millis(cfg.response_timeout_ms),
        )
        .with_send_timeout(Duration::from_millis(cfg.send_timeout_ms));
        modem
            .handshake()
            .await
            .map_err(|e| PeripheralError::Init(format!("modem handshake: {e}")))?;
        info!(port=%cfg.port.display(), baud=cfg.baud, "modem ready");
        Ok(modem)
    }
}

impl<P: Read + Write + Send> Modem<P> {
    pub fn new(port: P, command_delay: Duration, response_timeout: Duration) -> Self {
        Self {
            port,
            command_delay,
            response_timeout,
            send_timeout: response_timeout,
        }
    }

    pub fn with_send_timeout(mut self, send_timeout: Duration) -> Self {
        self.send_timeout = send_timeout;
        self
    }

    /// `AT` must answer `OK`, then the modem is switched to text mode with
    /// plain ASCII (IRA) as the character set.
    pub async fn handshake(&mut self) -> Result<(), PeripheralError> {
        self.command("AT").await?;
        self.command("AT+CMGF=1").await?;
        self.command("AT+CSCS=\"IRA\"").await?;
        Ok(())
    }

    /// Sends one command line and waits for its final result code.
    async fn command(&mut self, line: &str) -> Result<String, PeripheralError> {
        self.write_raw(format!("{line}\r").as_bytes())?;
        let reply = self.read_until(is_final, self.response_timeout).await?;
        if reply.contains("ERROR") {
            return Err(PeripheralError::Transport(format!(
                "{line} failed: {}",
                reply.trim()
            )));
        }
        Ok(reply)
    }

    fn write_raw(&mut self, bytes: &[u8]) -> Result<(), PeripheralError> {
        self.port.write_all(bytes)?;
        self.port.flush()?;
        Ok(())
    }

    /// Accumulates output until `done` accepts it or `timeout` passes.
    async fn read_until(
        &mut self,
        done: fn(&str) -> bool,
        timeout: Duration,
    ) -> Result<String, PeripheralError> {
        let deadline = Instant::now() + timeout;
        let mut reply = String::new();
        let mut buf = [0u8; 256];
        loop {
            tokio::time::sleep(self.command_delay).await;
            loop {
                match self.port.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => reply.push_str(&String::from_utf8_lossy(&buf[..n])),
                    Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => {
                        break;
                    }
                    Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                    Err(e) => return Err(e.into()),
                }
            }
            if done(&reply) {
                return Ok(reply);
            }
            if Instant::now() >= deadline {
                return Err(PeripheralError::Transport(format!(
                    "no response from modem (got {:?})",
                    reply.trim()
                )));
            }
        }
    }
}

#[async_trait]
impl<P: Read + Write + Send> MessageTransport for Modem<P> {
    async fn send(&mut self, recipient: &str, text: &str) -> Result<(), PeripheralError> {
        debug!(%recipient, len = text.len(), "sending sms");
        self.command("AT+CMGF=1").await?;
        self.write_raw(format!("AT+CMGS=\"{recipient}\"\r").as_bytes())?;
        let prompt = self
            .read_until(|r| r.contains('>') || r.contains("ERROR"), self.response_timeout)
            .await?;
        if !prompt.contains('>') {
            return Err(PeripheralError::Transport(format!(
                "AT+CMGS rejected: {}",
                prompt.trim()
            )));
        }
        let mut body = to_ira_text(text).into_bytes();
        body.push(CTRL_Z);
        self.write_raw(&body)?;
        let reply = self.read_until(is_final, self.send_timeout).await?;
        if reply.contains("ERROR") {
            return Err(PeripheralError::Transport(format!(
                "send to {recipient} failed: {}",
                reply.trim()
            )));
        }
        Ok(())
    }

    async fn receive_unread(&mut self) -> Result<Vec<InboxMessage>, PeripheralError> {
        self.command("AT+CMGF=1").await?;
        let listing = self.command("AT+CMGL=\"REC UNREAD\"").await?;
        Ok(parse_cmgl(&listing))
    }
}

fn is_final(reply: &str) -> bool {
    reply
        .lines()
        .map(str::trim)
        .any(|l| l == "OK" || l == "ERROR" || l.starts_with("+CMS ERROR") || l.starts_with("+CME ERROR"))
}

/// Folds text into the printable ASCII the modem accepts under `AT+CSCS="IRA"`.
/// Accented Latin letters lose their marks; anything else outside ASCII
/// becomes `?`. Control characters other than newline would end or cancel
/// the message, so they become spaces.
pub fn to_ira_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        let folded = match c {
            '\n' => "\n",
            c if c.is_ascii_control() => " ",
            c if c.is_ascii() => {
                out.push(c);
                continue;
            }
            'á' | 'à' | 'â' | 'ä' | 'ã' | 'å' => "a",
            'Á' | 'À' | 'Â' | 'Ä' | 'Ã' | 'Å' => "A",
            'é' | 'è' | 'ê' | 'ë' => "e",
            'É' | 'È' | 'Ê' | 'Ë' => "E",
            'í' | 'ì' | 'î' | 'ï' => "i",
            'Í' | 'Ì' | 'Î' | 'Ï' => "I",
            'ó' | 'ò' | 'ô' | 'ö' | 'õ' => "o",
            'Ó' | 'Ò' | 'Ô' | 'Ö' | 'Õ' => "O",
            'ú' | 'ù' | 'û' | 'ü' => "u",
            'Ú' | 'Ù' | 'Û' | 'Ü' => "U",
            'ñ' => "n",
            'Ñ' => "N",
            'ç' => "c",
            'Ç' => "C",
            '‘' | '’' => "'",
            '“' | '”' => "\"",
            '–' | '—' => "-",
            '…' => "...",
            _ => "?",
        };
        out.push_str(folded);
    }
    out
}

/// Parses a `+CMGL` listing in text mode. Each header is followed by body
/// lines up to the next header or the final result code.
pub fn parse_cmgl(listing: &str) -> Vec<InboxMessage> {
    let mut messages = Vec::new();
    let mut current: Option<InboxMessage> = None;
    for line in listing.lines() {
        let line = line.trim_end_matches('\r');
        if let Some(header) = line.strip_prefix("+CMGL:") {
            if let Some(done) = current.take() {
                messages.push(done);
            }
            match parse_header(header) {
                Some(msg) => current = Some(msg),
                None => warn!(header = %line, "unparseable CMGL header"),
            }
            continue;
        }
        let trimmed = line.trim();
        if trimmed == "OK" || trimmed.starts_with("AT+CMGL") {
            continue;
        }
        if let Some(msg) = current.as_mut() {
            if trimmed.is_empty() {
                continue;
            }
            if !msg.text.is_empty() {
                msg.text.push('\n');
            }
            msg.text.push_str(line);
        }
    }
    if let Some(done) = current {
        messages.push(done);
    }
    messages
}

fn parse_header(header: &str) -> Option<InboxMessage> {
    let (index, _) = header.split_once(',')?;
    let index = index.trim().parse().ok()?;
    // Odd pieces of a split on '"' are the quoted fields: status, sender, [name], [timestamp].
    let quoted: Vec<&str> = header.split('"').skip(1).step_by(2).collect();
    let sender = quoted.get(1)?.to_string();
    let timestamp = quoted
        .iter()
        .skip(2)
        .rev()
        .find(|q| q.contains('/'))
        .map(|q| q.to_string());
    Some(InboxMessage {
        index,
        sender,
        timestamp,
        text: String::new(),
    })
}

fn configure_serial(port: &File, baud: u32) -> Result<(), PeripheralError> {
    let rate = match baud {
        9600 => BaudRate::B9600,
        19200 => BaudRate::B19200,
        38400 => BaudRate::B38400,
        57600 => BaudRate::B57600,
        115200 => BaudRate::B115200,
        other => return Err(PeripheralError::Init(format!("unsupported baud rate {other}"))),
    };
    let init = |e: nix::Error| PeripheralError::Init(format!("termios: {e}"));
    let mut tio = termios::tcgetattr(port).map_err(init)?;
    termios::cfmakeraw(&mut tio);
    termios::cfsetspeed(&mut tio, rate).map_err(init)?;
    // Non-blocking-ish reads: return after 100ms without data.
    tio.control_chars[SpecialCharacterIndices::VMIN as usize] = 0;
    tio.control_chars[SpecialCharacterIndices::VTIME as usize] = 1;
    termios::tcsetattr(port, SetArg::TCSANOW, &tio).map_err(init)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_unread_listing() {
        let listing = "AT+CMGL=\"REC UNREAD\"\r\n\
            +CMGL: 1,\"REC UNREAD\",\"+639171234567\",,\"23/09/18,09:15:00+32\"\r\n\
            Running late\r\n\
            +CMGL: 4,\"REC UNREAD\",\"639181111111\",\"Mama\",\"23/09/18,10:02:11+32\"\r\n\
            Is Ana in class?\r\n\
            Thanks\r\n\
            \r\n\
            OK\r\n";
        let msgs = parse_cmgl(listing);
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].index, 1);
        assert_eq!(msgs[0].sender, "+639171234567");
        assert_eq!(msgs[0].timestamp.as_deref(), Some("23/09/18,09:15:00+32"));
        assert_eq!(msgs[0].text, "Running late");
        assert_eq!(msgs[1].index, 4);
        assert_eq!(msgs[1].text, "Is Ana in class?\nThanks");
    }

    #[test]
    fn empty_listing_has_no_messages() {
        assert!(parse_cmgl("\r\nOK\r\n").is_empty());
    }

    #[test]
    fn text_is_folded_to_ascii() {
        assert_eq!(to_ira_text("Santo Niño, Peña"), "Santo Nino, Pena");
        assert_eq!(to_ira_text("ÑAÑO José"), "NANO Jose");
        assert_eq!(to_ira_text("“Late” – 5 mins…"), "\"Late\" - 5 mins...");
        assert_eq!(to_ira_text("a\u{1a}b\nc 日"), "a b\nc ?");
        assert_eq!(to_ira_text("Present:\nAna Cruz"), "Present:\nAna Cruz");
    }

    #[test]
    fn final_codes_end_a_response() {
        assert!(is_final("\r\nOK\r\n"));
        assert!(is_final("\r\n+CMS ERROR: 500\r\n"));
        assert!(!is_final("\r\n> "));
    }
}
