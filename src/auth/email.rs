use async_trait::async_trait;
use lettre::{
    message::Mailbox, transport::smtp::authentication::Credentials, AsyncSmtpTransport,
    AsyncTransport, Message, Tokio1Executor,
};
use tracing::{info, warn};

use crate::config::SmtpConfig;

/// Outbound-mail boundary. The reset flow only needs one message shape, so
/// the trait stays that narrow.
#[async_trait]
pub trait MailSender: Send + Sync {
    async fn send_reset_link(&self, to: &str, link: &str) -> anyhow::Result<()>;
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(cfg: &SmtpConfig) -> anyhow::Result<Self> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&cfg.host)?
            .port(cfg.port)
            .credentials(Credentials::new(cfg.username.clone(), cfg.password.clone()))
            .build();
        let from: Mailbox = cfg
            .from
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid SMTP from address: {e}"))?;
        Ok(Self { transport, from })
    }
}

#[async_trait]
impl MailSender for SmtpMailer {
    async fn send_reset_link(&self, to: &str, link: &str) -> anyhow::Result<()> {
        let message = Message::builder()
            .from(self.from.clone())
            .to(to.parse()
                .map_err(|e| anyhow::anyhow!("invalid recipient address: {e}"))?)
            .subject("Reset your password")
            .body(format!(
                "A password reset was requested for your account.\n\n\
                 Use this link within the next hour:\n{link}\n\n\
                 If you did not request this, ignore this message."
            ))?;
        self.transport.send(message).await?;
        info!(to, "reset email sent");
        Ok(())
    }
}

/// Fallback when SMTP is not configured: logs instead of sending. Keeps local
/// development usable without exposing the token to the client.
pub struct LogMailer;

#[async_trait]
impl MailSender for LogMailer {
    async fn send_reset_link(&self, to: &str, link: &str) -> anyhow::Result<()> {
        warn!(to, link, "SMTP not configured; reset link logged instead of emailed");
        Ok(())
    }
}
