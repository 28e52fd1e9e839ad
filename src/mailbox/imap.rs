//! IMAP-over-TLS mailbox source.
//!
//! Each call opens a short-lived session on the blocking pool:
//! connect → LOGIN → SELECT → command → LOGOUT. Bodies are fetched with
//! `BODY.PEEK[]` so fetching never flips `\Seen`; marking read is a separate
//! `UID STORE`.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rustls::{ClientConfig, ClientConnection, RootCertStore, StreamOwned};
use rustls_pki_types::ServerName;
use secrecy::ExposeSecret;
use tracing::debug;

use super::types::{ItemRef, MailSource, RawItem};
use crate::config::MailboxConfig;
use crate::error::TransportError;

const READ_TIMEOUT: Duration = Duration::from_secs(30);

/// `MailSource` backed by an IMAP server.
pub struct ImapSource {
    config: MailboxConfig,
}

impl ImapSource {
    pub fn new(config: MailboxConfig) -> Self {
        Self { config }
    }

    /// Run `f` against a fresh session on the blocking pool.
    async fn with_session<T, F>(&self, f: F) -> Result<T, TransportError>
    where
        T: Send + 'static,
        F: FnOnce(&mut ImapSession) -> Result<T, TransportError> + Send + 'static,
    {
        let config = self.config.clone();
        tokio::task::spawn_blocking(move || {
            let mut session = ImapSession::open(&config)?;
            let out = f(&mut session);
            session.logout();
            out
        })
        .await
        .map_err(|e| TransportError::Task(e.to_string()))?
    }
}

#[async_trait]
impl MailSource for ImapSource {
    fn name(&self) -> &str {
        "imap"
    }

    async fn list_unread(&self, max: usize) -> Result<Vec<ItemRef>, TransportError> {
        self.with_session(move |session| {
            let resp = session.command("UID SEARCH UNSEEN")?;
            resp.ensure_ok("UID SEARCH")?;
            let uids = parse_search_response(&resp.lines);
            Ok(uids.into_iter().take(max).map(ItemRef::new).collect())
        })
        .await
    }

    async fn fetch_full(&self, item: &ItemRef) -> Result<RawItem, TransportError> {
        let item = item.clone();
        self.with_session(move |session| {
            let resp = session.command(&format!("UID FETCH {} (FLAGS BODY.PEEK[])", item.id))?;
            resp.ensure_ok("UID FETCH")?;
            let bytes = resp.literals.into_iter().next().ok_or_else(|| {
                TransportError::Protocol(format!("no body returned for uid {}", item.id))
            })?;
            let labels = parse_flags(&resp.lines);
            Ok(RawItem {
                item_ref: item,
                bytes,
                labels,
            })
        })
        .await
    }

    async fn mark_read(&self, item: &ItemRef) -> Result<(), TransportError> {
        let uid = item.id.clone();
        self.with_session(move |session| {
            session
                .command(&format!("UID STORE {uid} +FLAGS (\\Seen)"))?
                .ensure_ok("UID STORE")
        })
        .await
    }
}

// ── Blocking session ────────────────────────────────────────────────

/// Tagged response: untagged lines, any literals, and the completion status.
struct ImapResponse {
    lines: Vec<String>,
    literals: Vec<Vec<u8>>,
    ok: bool,
    status: String,
}

impl ImapResponse {
    fn ensure_ok(&self, what: &str) -> Result<(), TransportError> {
        if self.ok {
            Ok(())
        } else {
            Err(TransportError::Protocol(format!(
                "{what} rejected: {}",
                self.status.trim()
            )))
        }
    }
}

struct ImapSession {
    stream: StreamOwned<ClientConnection, TcpStream>,
    next_tag: u32,
}

impl ImapSession {
    fn open(config: &MailboxConfig) -> Result<Self, TransportError> {
        let connect_err = |reason: String| TransportError::Connect {
            host: config.imap_host.clone(),
            reason,
        };

        let tcp = TcpStream::connect((config.imap_host.as_str(), config.imap_port))
            .map_err(|e| connect_err(e.to_string()))?;
        tcp.set_read_timeout(Some(READ_TIMEOUT))?;

        let mut roots = RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let tls_config = Arc::new(
            ClientConfig::builder()
                .with_root_certificates(roots)
                .with_no_client_auth(),
        );
        let server_name = ServerName::try_from(config.imap_host.clone())
            .map_err(|e| connect_err(e.to_string()))?;
        let conn =
            ClientConnection::new(tls_config, server_name).map_err(|e| connect_err(e.to_string()))?;

        let mut session = Self {
            stream: StreamOwned::new(conn, tcp),
            next_tag: 1,
        };

        let greeting = session.read_line()?;
        debug!(greeting = %greeting.trim(), "IMAP connected");

        let login = session.command(&format!(
            "LOGIN {} {}",
            quote(&config.username),
            quote(config.password.expose_secret())
        ))?;
        if !login.ok {
            return Err(TransportError::Auth {
                user: config.username.clone(),
            });
        }

        session
            .command(&format!("SELECT {}", quote(&config.folder)))?
            .ensure_ok("SELECT")?;

        Ok(session)
    }

    fn read_line(&mut self) -> Result<String, TransportError> {
        let mut buf = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            match self.stream.read(&mut byte)? {
                0 => return Err(TransportError::Protocol("connection closed".into())),
                _ => {
                    buf.push(byte[0]);
                    if buf.ends_with(b"\r\n") {
                        return Ok(String::from_utf8_lossy(&buf).into_owned());
                    }
                }
            }
        }
    }

    fn command(&mut self, cmd: &str) -> Result<ImapResponse, TransportError> {
        let tag = format!("A{}", self.next_tag);
        self.next_tag += 1;

        self.stream.write_all(format!("{tag} {cmd}\r\n").as_bytes())?;
        self.stream.flush()?;

        let prefix = format!("{tag} ");
        let mut lines = Vec::new();
        let mut literals = Vec::new();
        loop {
            let line = self.read_line()?;
            if let Some(status) = line.strip_prefix(&prefix) {
                return Ok(ImapResponse {
                    lines,
                    literals,
                    ok: status.starts_with("OK"),
                    status: status.to_string(),
                });
            }
            if let Some(size) = literal_size(&line) {
                let mut literal = vec![0u8; size];
                self.stream.read_exact(&mut literal)?;
                literals.push(literal);
            }
            lines.push(line);
        }
    }

    fn logout(&mut self) {
        if let Err(e) = self.command("LOGOUT") {
            debug!(error = %e, "IMAP logout failed");
        }
    }
}

// ── Protocol helpers ────────────────────────────────────────────────

/// Quote a string argument.
fn quote(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

/// `{1234}\r\n` at end of line announces a literal of that many bytes.
fn literal_size(line: &str) -> Option<usize> {
    let trimmed = line.trim_end();
    let inner = trimmed.strip_suffix('}')?;
    let open = inner.rfind('{')?;
    inner[open + 1..].parse().ok()
}

fn parse_search_response(lines: &[String]) -> Vec<String> {
    lines
        .iter()
        .filter_map(|l| l.strip_prefix("* SEARCH"))
        .flat_map(|rest| rest.split_whitespace().map(str::to_string))
        .collect()
}

fn parse_flags(lines: &[String]) -> Vec<String> {
    let Some(line) = lines.iter().find(|l| l.contains("FLAGS (")) else {
        return Vec::new();
    };
    let start = line.find("FLAGS (").map(|i| i + "FLAGS (".len());
    let Some(start) = start else {
        return Vec::new();
    };
    let end = line[start..].find(')').map_or(line.len(), |i| start + i);
    line[start..end]
        .split_whitespace()
        .map(str::to_string)
        .collect()
}
