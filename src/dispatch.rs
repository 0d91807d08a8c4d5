//! Rendering and delivery of notification jobs over SMTP.
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};

use crate::config;
use crate::error::{ScanError, TransportError};
use crate::model::NotificationJob;
use crate::pool::JobSink;
use crate::render;
use crate::window::FreshnessWindow;

/// A rendered message ready for the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub html: String,
}

#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, email: &Email) -> Result<(), TransportError>;
}

/// Fixed backoff between attempts. `max_attempts: None` never gives up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub backoff: Duration,
    pub max_attempts: Option<u32>,
}

impl RetryPolicy {
    pub fn unbounded(backoff: Duration) -> Self {
        Self {
            backoff,
            max_attempts: None,
        }
    }

    /// Whether another attempt may follow attempt number `attempt` (1-indexed).
    pub fn allows_retry(&self, attempt: u32) -> bool {
        self.max_attempts.map_or(true, |max| attempt < max)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            backoff: Duration::from_secs(1),
            max_attempts: Some(10),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ack {
    pub idempotency_key: String,
    pub attempts: u32,
}

/// SMTP over implicit TLS (or STARTTLS on 587), one connection per message.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl fmt::Debug for SmtpMailer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpMailer").finish_non_exhaustive()
    }
}

impl SmtpMailer {
    pub fn from_config(cfg: &config::Email) -> Result<Self, TransportError> {
        let builder = if cfg.port == 587 {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&cfg.host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&cfg.host)
        }
        .map_err(|e| TransportError::permanent(format!("invalid smtp host {}: {}", cfg.host, e)))?;

        let transport = builder
            .port(cfg.port)
            .credentials(Credentials::new(cfg.user.clone(), cfg.pass.clone()))
            .timeout(Some(Duration::from_secs(cfg.timeout_seconds)))
            .build();
        Ok(Self { transport })
    }
}

pub fn build_message(email: &Email) -> Result<Message, TransportError> {
    let from: Mailbox = email
        .from
        .parse()
        .map_err(|e| TransportError::permanent(format!("invalid sender {}: {}", email.from, e)))?;
    let to: Mailbox = email
        .to
        .parse()
        .map_err(|e| TransportError::permanent(format!("invalid recipient {}: {}", email.to, e)))?;
    Message::builder()
        .from(from)
        .to(to)
        .subject(email.subject.clone())
        .header(ContentType::TEXT_HTML)
        .body(email.html.clone())
        .map_err(|e| TransportError::permanent(format!("failed to build message: {}", e)))
}

#[async_trait]
impl MailTransport for SmtpMailer {
    async fn send(&self, email: &Email) -> Result<(), TransportError> {
        let message = build_message(email)?;
        self.transport.send(message).await.map(|_| ()).map_err(|e| {
            // Rejections and client-side faults will not improve on retry.
            if e.is_permanent() || e.is_client() {
                TransportError::permanent(e.to_string())
            } else {
                TransportError::transient(e.to_string())
            }
        })
    }
}

pub struct Dispatcher {
    transport: Arc<dyn MailTransport>,
    sender: String,
    recipient: String,
    policy: RetryPolicy,
    window: FreshnessWindow,
    run_id: String,
}

impl Dispatcher {
    pub fn new(
        transport: Arc<dyn MailTransport>,
        sender: String,
        recipient: String,
        policy: RetryPolicy,
        window: FreshnessWindow,
        run_id: String,
    ) -> Self {
        Self {
            transport,
            sender,
            recipient,
            policy,
            window,
            run_id,
        }
    }

    pub fn render(&self, job: &NotificationJob) -> Email {
        Email {
            from: self.sender.clone(),
            to: self.recipient.clone(),
            subject: render::subject(job),
            html: render::render_body(job, &self.window, &self.run_id),
        }
    }

    /// Sends `job` once, retrying transient failures per the policy.
    #[instrument(skip_all, fields(repo = %job.repo.full_name, key = %job.idempotency_key))]
    pub async fn deliver(&self, job: &NotificationJob) -> Result<Ack, ScanError> {
        let email = self.render(job);
        info!("start send email of {}", job.event.payload_id());

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.transport.send(&email).await {
                Ok(()) => {
                    info!(attempt, "finish send email of {}", job.event.payload_id());
                    return Ok(Ack {
                        idempotency_key: job.idempotency_key.clone(),
                        attempts: attempt,
                    });
                }
                Err(err) if err.transient && self.policy.allows_retry(attempt) => {
                    warn!(attempt, error = %err, "failed to send email of {}; retrying", job.event.payload_id());
                    tokio::time::sleep(self.policy.backoff).await;
                }
                Err(err) => {
                    error!(attempt, transient = err.transient, error = %err, "failed to send email of {}", job.event.payload_id());
                    return Err(ScanError::Transport {
                        key: job.idempotency_key.clone(),
                        attempts: attempt,
                        source: err,
                    });
                }
            }
        }
    }
}

#[async_trait]
impl JobSink for Dispatcher {
    async fn submit(&self, job: NotificationJob) -> Result<(), ScanError> {
        self.deliver(&job).await.map(|_| ())
    }
}
