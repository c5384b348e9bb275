//! Payout completion notifications. Delivery is best effort.

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;

use crate::types::PayoutRecord;

#[derive(Error, Debug)]
#[error("Notification failed: {0}")]
pub struct NotifyError(pub String);

#[async_trait]
pub trait PayoutNotifier: Send + Sync {
    async fn payout_completed(&self, payout: &PayoutRecord) -> Result<(), NotifyError>;
}

/// Emits completed payouts as structured log events
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl PayoutNotifier for LogNotifier {
    async fn payout_completed(&self, payout: &PayoutRecord) -> Result<(), NotifyError> {
        tracing::info!(
            payout_id = %payout.id,
            ece_converted = payout.ece_converted,
            usdc_received = payout.usdc_received,
            signature = payout.transaction_signature.as_deref().unwrap_or_default(),
            "weekly payout completed"
        );
        Ok(())
    }
}

/// Keeps every notification in memory
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    delivered: Mutex<Vec<String>>,
    failing: bool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the attempt, then reports failure
    pub fn failing() -> Self {
        Self {
            delivered: Mutex::new(Vec::new()),
            failing: true,
        }
    }

    /// Payout ids notified so far
    pub fn delivered(&self) -> Vec<String> {
        self.delivered.lock().clone()
    }
}

#[async_trait]
impl PayoutNotifier for RecordingNotifier {
    async fn payout_completed(&self, payout: &PayoutRecord) -> Result<(), NotifyError> {
        self.delivered.lock().push(payout.id.clone());
        if self.failing {
            return Err(NotifyError("notification channel closed".to_string()));
        }
        Ok(())
    }
}
