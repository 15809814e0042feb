//! Outbound mail transport seam.
//!
//! The dispatcher sends through [`MailTransport`] without knowing what is on
//! the other side. [`SmtpMailTransport`] is the production implementation: an
//! authenticated STARTTLS relay via lettre. Tests substitute their own mocks.

use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, header::ContentType},
    transport::smtp::authentication::Credentials,
};
use serde::Deserialize;
use thiserror::Error;

/// A fully prepared outbound email: tracked body, final subject, one
/// recipient.
#[derive(Debug, Clone)]
pub struct OutboundEmail {
    pub to: String,
    pub subject: String,
    pub html: String,
}

/// Send failure for a single email.
///
/// All variants are treated as transient by the dispatcher — the retry policy
/// decides how many attempts an item gets, not the error shape.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The server accepted the connection but refused the message.
    #[error("message rejected: {0}")]
    Rejected(String),

    /// The relay could not be reached or the session broke down.
    #[error("connection failed: {0}")]
    Connection(String),

    /// The message itself could not be constructed.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}

/// Abstract mail transport.
#[async_trait]
pub trait MailTransport: Send + Sync {
    /// Send a single email.
    async fn send_one(&self, email: &OutboundEmail) -> Result<(), TransportError>;

    /// Send a batch sequentially, returning per-item results.
    ///
    /// One failure never aborts the rest; the dispatcher does its own
    /// batching and concurrency on top of `send_one`.
    async fn send_many(&self, emails: &[OutboundEmail]) -> Vec<Result<(), TransportError>> {
        let mut results = Vec::with_capacity(emails.len());
        for email in emails {
            results.push(self.send_one(email).await);
        }
        results
    }
}

/// SMTP relay configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    pub host: String,

    #[serde(default = "default_smtp_port")]
    pub port: u16,

    pub username: String,
    pub password: String,

    /// Address placed in the From header.
    pub from_address: String,

    #[serde(default)]
    pub from_name: Option<String>,
}

const fn default_smtp_port() -> u16 {
    587
}

/// Production [`MailTransport`] over an authenticated STARTTLS SMTP relay.
pub struct SmtpMailTransport {
    from: Mailbox,
    relay: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailTransport {
    /// Build the relay connection pool.
    ///
    /// # Errors
    /// `TransportError::InvalidMessage` when the configured from address does
    /// not parse, `TransportError::Connection` when the relay parameters are
    /// rejected.
    pub fn new(config: &SmtpConfig) -> Result<Self, TransportError> {
        let from_name = config.from_name.as_deref().unwrap_or("Herald");
        let from: Mailbox = format!("{from_name} <{}>", config.from_address)
            .parse()
            .map_err(|e| TransportError::InvalidMessage(format!("invalid from address: {e}")))?;

        let credentials = Credentials::new(config.username.clone(), config.password.clone());
        let relay = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            .map_err(|e| TransportError::Connection(format!("smtp relay setup: {e}")))?
            .port(config.port)
            .credentials(credentials)
            .build();

        Ok(Self { from, relay })
    }
}

#[async_trait]
impl MailTransport for SmtpMailTransport {
    async fn send_one(&self, email: &OutboundEmail) -> Result<(), TransportError> {
        let to: Mailbox = email
            .to
            .parse()
            .map_err(|e| TransportError::InvalidMessage(format!("invalid recipient: {e}")))?;

        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(email.subject.clone())
            .header(ContentType::TEXT_HTML)
            .body(email.html.clone())
            .map_err(|e| TransportError::InvalidMessage(e.to_string()))?;

        self.relay.send(message).await.map(|_| ()).map_err(|e| {
            if e.is_permanent() {
                TransportError::Rejected(e.to_string())
            } else {
                TransportError::Connection(e.to_string())
            }
        })
    }
}
