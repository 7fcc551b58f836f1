//! Human Confirmation
//!
//! The single yes/no question the loop asks an operator. Waiting has no
//! timeout: the loop blocks until the host answers or drops the request.

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tracing::warn;

#[async_trait]
pub trait Confirmation: Send + Sync {
    /// Ask the operator. `false` covers "no" and an abandoned question.
    async fn confirm(&self, message: &str) -> bool;
}

/// Answers every question the same way. For unattended runs and tests.
#[derive(Debug, Clone, Copy)]
pub struct AutoConfirm(pub bool);

#[async_trait]
impl Confirmation for AutoConfirm {
    async fn confirm(&self, _message: &str) -> bool {
        self.0
    }
}

/// A question waiting for the host.
#[derive(Debug)]
pub struct ConfirmationRequest {
    pub message: String,
    respond: oneshot::Sender<bool>,
}

impl ConfirmationRequest {
    pub fn answer(self, proceed: bool) {
        let _ = self.respond.send(proceed);
    }
}

/// Forwards questions over a channel to whoever renders them.
///
/// Dropping a [`ConfirmationRequest`] without answering counts as "no".
#[derive(Debug, Clone)]
pub struct ChannelConfirmation {
    tx: mpsc::Sender<ConfirmationRequest>,
}

impl ChannelConfirmation {
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<ConfirmationRequest>) {
        let (tx, rx) = mpsc::channel(buffer);
        (Self { tx }, rx)
    }
}

#[async_trait]
impl Confirmation for ChannelConfirmation {
    async fn confirm(&self, message: &str) -> bool {
        let (respond, answer) = oneshot::channel();
        let request = ConfirmationRequest {
            message: message.to_string(),
            respond,
        };
        if self.tx.send(request).await.is_err() {
            warn!("confirmation channel closed, treating as no");
            return false;
        }
        answer.await.unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_round_trip() {
        let (confirm, mut rx) = ChannelConfirmation::new(1);
        let host = tokio::spawn(async move {
            let request = rx.recv().await.unwrap();
            assert_eq!(request.message, "Continue?");
            request.answer(true);
        });
        assert!(confirm.confirm("Continue?").await);
        host.await.unwrap();
    }

    #[tokio::test]
    async fn test_dropped_request_is_no() {
        let (confirm, mut rx) = ChannelConfirmation::new(1);
        let host = tokio::spawn(async move {
            let request = rx.recv().await.unwrap();
            drop(request);
        });
        assert!(!confirm.confirm("Continue?").await);
        host.await.unwrap();
    }

    #[tokio::test]
    async fn test_closed_channel_is_no() {
        let (confirm, rx) = ChannelConfirmation::new(1);
        drop(rx);
        assert!(!confirm.confirm("Continue?").await);
        assert!(AutoConfirm(true).confirm("Continue?").await);
    }
}
