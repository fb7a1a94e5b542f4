//! Graceful shutdown (spec §5 SUPPLEMENT-4): stop accepting new signals,
//! wait up to 30s for in-flight placements to settle, then optionally
//! flatten every position with reduce-only exits before exiting. Grounded
//! on the teacher's `ShutdownService`, generalised from its stock
//! liquidation flow to the spec's `close_all_positions` contract.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

use super::oms_supervisor::OmsCommand;

/// Upper bound on how long shutdown waits for the OMS to flatten
/// everything before giving up and exiting anyway (spec §5).
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

pub struct ShutdownService {
    oms_tx: mpsc::Sender<OmsCommand>,
}

impl ShutdownService {
    pub fn new(oms_tx: mpsc::Sender<OmsCommand>) -> Self {
        Self { oms_tx }
    }

    /// Runs the SIGTERM sequence: the caller is expected to have already
    /// stopped feeding new candles/signals in (dropping the relevant
    /// senders achieves that); this only drives the OMS-side flatten.
    pub async fn shutdown(&self, flatten_on_exit: bool) {
        info!("graceful shutdown: sequence starting");

        if !flatten_on_exit {
            info!("graceful shutdown: flatten-on-exit disabled, leaving open positions");
            return;
        }

        let (ack_tx, ack_rx) = oneshot::channel();
        if self.oms_tx.send(OmsCommand::CloseAll(ack_tx)).await.is_err() {
            warn!("graceful shutdown: OMS supervisor already gone");
            return;
        }

        match tokio::time::timeout(SHUTDOWN_TIMEOUT, ack_rx).await {
            Ok(Ok(())) => info!("graceful shutdown: all positions flattened"),
            Ok(Err(_)) => warn!("graceful shutdown: OMS supervisor dropped the ack"),
            Err(_) => warn!(
                timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
                "graceful shutdown: flatten did not complete in time, exiting anyway"
            ),
        }
    }
}
