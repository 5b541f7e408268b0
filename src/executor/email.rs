//! Email backend — SMTP via lettre for approved replies, raw IMAP over
//! TLS for the unread fetch the auto-check poller runs.
//!
//! Both sides are blocking and run under `spawn_blocking`; nothing here
//! holds a lock across I/O.

use std::io::Write as IoWrite;
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use mail_parser::MessageParser;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::MailError;

// ── Configuration ───────────────────────────────────────────────────

/// Mailbox configuration, built from environment variables.
#[derive(Clone)]
pub struct EmailConfig {
    pub imap_host: String,
    pub imap_port: u16,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub username: String,
    pub password: SecretString,
    pub from_address: String,
}

impl EmailConfig {
    /// Build config from environment variables. Returns `None` when
    /// `EMAIL_IMAP_HOST` is not set (mail backend disabled).
    pub fn from_env() -> Option<Self> {
        let imap_host = std::env::var("EMAIL_IMAP_HOST").ok()?;

        let imap_port: u16 = std::env::var("EMAIL_IMAP_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(993);

        let smtp_host = std::env::var("EMAIL_SMTP_HOST")
            .unwrap_or_else(|_| imap_host.replace("imap", "smtp"));

        let smtp_port: u16 = std::env::var("EMAIL_SMTP_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(587);

        let username = std::env::var("EMAIL_USERNAME").unwrap_or_default();
        let password = std::env::var("EMAIL_PASSWORD").unwrap_or_default();
        let from_address =
            std::env::var("EMAIL_FROM_ADDRESS").unwrap_or_else(|_| username.clone());

        Some(Self {
            imap_host,
            imap_port,
            smtp_host,
            smtp_port,
            username,
            password: SecretString::from(password),
            from_address,
        })
    }
}

// ── Outbound (SMTP) ─────────────────────────────────────────────────

/// SMTP sender for approved email replies.
pub struct SmtpMailer {
    config: EmailConfig,
}

impl SmtpMailer {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }

    /// Send one plain-text email. Blocking transport, run off the
    /// async worker threads.
    pub async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), MailError> {
        let config = self.config.clone();
        let to = to.to_string();
        let subject = subject.to_string();
        let body = body.to_string();

        tokio::task::spawn_blocking(move || send_blocking(&config, &to, &subject, &body))
            .await
            .map_err(|e| MailError::Smtp(format!("send task panicked: {e}")))?
    }
}

fn send_blocking(
    config: &EmailConfig,
    to: &str,
    subject: &str,
    body: &str,
) -> Result<(), MailError> {
    let message = Message::builder()
        .from(
            config
                .from_address
                .parse()
                .map_err(|e| MailError::Smtp(format!("bad from address: {e}")))?,
        )
        .to(to
            .parse()
            .map_err(|e| MailError::Smtp(format!("bad recipient: {e}")))?)
        .subject(subject)
        .body(body.to_string())
        .map_err(|e| MailError::Smtp(e.to_string()))?;

    let creds = Credentials::new(
        config.username.clone(),
        config.password.expose_secret().to_string(),
    );

    let transport = SmtpTransport::starttls_relay(&config.smtp_host)
        .map_err(|e| MailError::Smtp(e.to_string()))?
        .port(config.smtp_port)
        .credentials(creds)
        .build();

    transport
        .send(&message)
        .map_err(|e| MailError::Smtp(e.to_string()))?;

    info!(to, subject, "Email sent");
    Ok(())
}

// ── Inbound (IMAP) ──────────────────────────────────────────────────

/// A fetched unread email.
#[derive(Debug, Clone)]
pub struct FetchedEmail {
    pub message_id: String,
    pub sender: String,
    pub subject: String,
    pub body: String,
}

type TlsStream = rustls::StreamOwned<rustls::ClientConnection, TcpStream>;

/// Fetch unseen emails via raw IMAP over TLS, marking them `\Seen`.
/// Blocking — run in `spawn_blocking`.
pub fn fetch_unseen_imap(config: &EmailConfig) -> Result<Vec<FetchedEmail>, MailError> {
    let tcp = TcpStream::connect((&*config.imap_host, config.imap_port))?;
    tcp.set_read_timeout(Some(Duration::from_secs(30)))?;

    let mut root_store = rustls::RootCertStore::empty();
    root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let tls_config = Arc::new(
        rustls::ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth(),
    );
    let server_name: rustls::pki_types::ServerName<'_> =
        rustls::pki_types::ServerName::try_from(config.imap_host.clone())
            .map_err(|e| MailError::Tls(e.to_string()))?;
    let conn = rustls::ClientConnection::new(tls_config, server_name)
        .map_err(|e| MailError::Tls(e.to_string()))?;
    let mut tls = rustls::StreamOwned::new(conn, tcp);

    let _greeting = read_line(&mut tls)?;

    let login = send_cmd(
        &mut tls,
        "A1",
        &format!(
            "LOGIN \"{}\" \"{}\"",
            config.username,
            config.password.expose_secret()
        ),
    )?;
    if !login.last().is_some_and(|l| l.contains("OK")) {
        return Err(MailError::Imap("login failed".to_string()));
    }

    let _select = send_cmd(&mut tls, "A2", "SELECT \"INBOX\"")?;

    let search = send_cmd(&mut tls, "A3", "SEARCH UNSEEN")?;
    let mut uids: Vec<String> = Vec::new();
    for line in &search {
        if line.starts_with("* SEARCH") {
            uids.extend(line.split_whitespace().skip(2).map(String::from));
        }
    }
    debug!(count = uids.len(), "Unseen emails found");

    let mut results = Vec::new();
    let mut tag = 4_u32;

    for uid in &uids {
        let fetch = send_cmd(&mut tls, &format!("A{tag}"), &format!("FETCH {uid} RFC822"))?;
        tag += 1;

        let raw: String = fetch
            .iter()
            .skip(1)
            .take(fetch.len().saturating_sub(2))
            .cloned()
            .collect();

        if let Some(parsed) = MessageParser::default().parse(raw.as_bytes()) {
            let sender = parsed
                .from()
                .and_then(|a| a.first())
                .and_then(|a| a.address())
                .unwrap_or("unknown")
                .to_string();
            let subject = parsed.subject().unwrap_or("(sin asunto)").to_string();
            let body = parsed
                .body_text(0)
                .map(|t| t.to_string())
                .unwrap_or_else(|| "(sin contenido legible)".to_string());
            let message_id = parsed
                .message_id()
                .map(String::from)
                .unwrap_or_else(|| format!("gen-{}", Uuid::new_v4()));

            results.push(FetchedEmail {
                message_id,
                sender,
                subject,
                body,
            });
        }

        let _ = send_cmd(
            &mut tls,
            &format!("A{tag}"),
            &format!("STORE {uid} +FLAGS (\\Seen)"),
        );
        tag += 1;
    }

    let _ = send_cmd(&mut tls, &format!("A{tag}"), "LOGOUT");

    Ok(results)
}

fn read_line(tls: &mut TlsStream) -> Result<String, MailError> {
    let mut buf = Vec::new();
    loop {
        let mut byte = [0u8; 1];
        match std::io::Read::read(tls, &mut byte) {
            Ok(0) => return Err(MailError::Imap("connection closed".to_string())),
            Ok(_) => {
                buf.push(byte[0]);
                if buf.ends_with(b"\r\n") {
                    return Ok(String::from_utf8_lossy(&buf).to_string());
                }
            }
            Err(e) => return Err(e.into()),
        }
    }
}

fn send_cmd(tls: &mut TlsStream, tag: &str, cmd: &str) -> Result<Vec<String>, MailError> {
    let full = format!("{tag} {cmd}\r\n");
    IoWrite::write_all(tls, full.as_bytes())?;
    IoWrite::flush(tls)?;
    let mut lines = Vec::new();
    loop {
        let line = read_line(tls)?;
        let done = line.starts_with(tag);
        lines.push(line);
        if done {
            break;
        }
    }
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> EmailConfig {
        EmailConfig {
            imap_host: "imap.test.com".into(),
            imap_port: 993,
            smtp_host: "smtp.test.com".into(),
            smtp_port: 587,
            username: "relay@test.com".into(),
            password: SecretString::from("secret"),
            from_address: "relay@test.com".into(),
        }
    }

    #[test]
    fn bad_recipient_is_rejected_before_any_network() {
        let result = send_blocking(&config(), "not-an-address", "Hola", "cuerpo");
        match result {
            Err(MailError::Smtp(reason)) => assert!(reason.contains("bad recipient")),
            other => panic!("Expected Smtp error, got {other:?}"),
        }
    }

    #[test]
    fn bad_from_address_is_rejected() {
        let mut cfg = config();
        cfg.from_address = "broken".into();
        let result = send_blocking(&cfg, "alice@example.com", "Hola", "cuerpo");
        match result {
            Err(MailError::Smtp(reason)) => assert!(reason.contains("bad from address")),
            other => panic!("Expected Smtp error, got {other:?}"),
        }
    }

    #[test]
    fn fetch_against_unreachable_host_errors() {
        let mut cfg = config();
        cfg.imap_host = "127.0.0.1".into();
        cfg.imap_port = 1; // nothing listens here
        assert!(fetch_unseen_imap(&cfg).is_err());
    }
}
