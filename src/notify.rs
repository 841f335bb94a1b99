//! Outbound delivery of one-time codes.
//!
//! Requests never wait on the transport: `CodeDispatcher::dispatch` hands the
//! message to a spawned task and returns. A failed send is logged and dropped.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::users::AuthType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodePurpose {
    Registration,
    PasswordReset,
}

impl CodePurpose {
    pub fn subject(self) -> &'static str {
        match self {
            CodePurpose::Registration => "Registration",
            CodePurpose::PasswordReset => "Password reset",
        }
    }
}

#[derive(Debug, Clone)]
pub struct OutboundCode {
    pub channel: AuthType,
    pub recipient: String,
    pub purpose: CodePurpose,
    pub code: String,
}

impl OutboundCode {
    pub fn body(&self) -> String {
        format!("Your verification code is {}.", self.code)
    }
}

/// Transport for codes (SMTP, SMS gateway, ...).
#[async_trait]
pub trait CodeSender: Send + Sync {
    async fn send(&self, message: &OutboundCode) -> anyhow::Result<()>;
}

/// Dev sender: logs the delivery instead of performing it.
#[derive(Clone, Debug)]
pub struct LogCodeSender;

#[async_trait]
impl CodeSender for LogCodeSender {
    async fn send(&self, message: &OutboundCode) -> anyhow::Result<()> {
        info!(
            recipient = %message.recipient,
            channel = ?message.channel,
            subject = message.purpose.subject(),
            "code delivery stub"
        );
        debug!(code = %message.code, "code body");
        Ok(())
    }
}

#[derive(Clone)]
pub struct CodeDispatcher {
    sender: Arc<dyn CodeSender>,
}

impl CodeDispatcher {
    pub fn new(sender: Arc<dyn CodeSender>) -> Self {
        Self { sender }
    }

    pub fn dispatch(&self, message: OutboundCode) {
        let sender = Arc::clone(&self.sender);
        tokio::spawn(async move {
            if let Err(e) = sender.send(&message).await {
                warn!(
                    error = %e,
                    recipient = %message.recipient,
                    channel = ?message.channel,
                    "code delivery failed"
                );
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::mpsc;

    struct ChannelSender(mpsc::UnboundedSender<OutboundCode>);

    #[async_trait]
    impl CodeSender for ChannelSender {
        async fn send(&self, message: &OutboundCode) -> anyhow::Result<()> {
            self.0.send(message.clone())?;
            Ok(())
        }
    }

    struct FailingSender;

    #[async_trait]
    impl CodeSender for FailingSender {
        async fn send(&self, _message: &OutboundCode) -> anyhow::Result<()> {
            anyhow::bail!("smtp unavailable")
        }
    }

    fn message() -> OutboundCode {
        OutboundCode {
            channel: AuthType::Email,
            recipient: "user@example.com".into(),
            purpose: CodePurpose::Registration,
            code: "0421".into(),
        }
    }

    #[tokio::test]
    async fn dispatch_delivers_in_background() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let dispatcher = CodeDispatcher::new(Arc::new(ChannelSender(tx)));
        dispatcher.dispatch(message());
        let got = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("delivered in time")
            .expect("message");
        assert_eq!(got.recipient, "user@example.com");
        assert!(got.body().contains("0421"));
    }

    #[tokio::test]
    async fn dispatch_swallows_transport_errors() {
        let dispatcher = CodeDispatcher::new(Arc::new(FailingSender));
        dispatcher.dispatch(message());
        tokio::task::yield_now().await;
    }

    #[test]
    fn subjects() {
        assert_eq!(CodePurpose::Registration.subject(), "Registration");
        assert_eq!(CodePurpose::PasswordReset.subject(), "Password reset");
    }
}
