//! Operator e-mail notifications.

use async_trait::async_trait;

use crate::Result;

/// Outbound mail port. Delivery mechanics (SMTP, relay API) live in adapters.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, subject: &str, body: &str) -> Result<()>;

    /// `false` when `send` only records the message locally.
    fn delivers(&self) -> bool {
        true
    }
}

/// Mailer that records notifications in the log instead of delivering them.
///
/// Used when no delivery adapter is wired in.
#[derive(Clone, Debug, Default)]
pub struct LogMailer {
    receivers: Vec<String>,
}

impl LogMailer {
    pub fn new(receivers: Vec<String>) -> Self {
        Self { receivers }
    }
}

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, subject: &str, body: &str) -> Result<()> {
        tracing::info!(
            to = %self.receivers.join(", "),
            subject,
            body_len = body.chars().count(),
            "email notification not delivered (log-only mailer)"
        );
        Ok(())
    }

    fn delivers(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn log_mailer_accepts_but_does_not_deliver() {
        let mailer = LogMailer::new(vec!["ops@example.com".to_string()]);
        assert!(mailer.send("subject", "body").await.is_ok());
        assert!(!mailer.delivers());
    }
}
