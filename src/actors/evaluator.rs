//! EvaluatorActor - runs alert evaluation after readings are committed
//!
//! Notifications are fire-and-forget. A failed pass is logged and the next
//! notification evaluates from scratch, so nothing is retried here.

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, instrument, warn};
use uuid::Uuid;

use crate::evaluator::AlertEvaluator;
use crate::storage::AlertRecord;

use super::messages::EvaluatorCommand;

pub struct EvaluatorActor {
    evaluator: AlertEvaluator,
    command_rx: mpsc::Receiver<EvaluatorCommand>,
}

impl EvaluatorActor {
    pub fn new(evaluator: AlertEvaluator, command_rx: mpsc::Receiver<EvaluatorCommand>) -> Self {
        Self {
            evaluator,
            command_rx,
        }
    }

    #[instrument(skip(self))]
    pub async fn run(mut self) {
        debug!("starting evaluator actor");

        while let Some(cmd) = self.command_rx.recv().await {
            match cmd {
                EvaluatorCommand::ReadingPersisted { reading_id } => {
                    if let Err(e) = self.evaluator.evaluate(Utc::now()).await {
                        error!("alert evaluation after reading {reading_id} failed: {e}");
                    }
                }

                EvaluatorCommand::EvaluateNow { respond_to } => {
                    let result = self
                        .evaluator
                        .evaluate(Utc::now())
                        .await
                        .context("alert evaluation failed");
                    let _ = respond_to.send(result);
                }

                EvaluatorCommand::Shutdown => {
                    debug!("received shutdown command");
                    break;
                }
            }
        }

        debug!("evaluator actor stopped");
    }
}

/// Handle for triggering evaluations
#[derive(Clone)]
pub struct EvaluatorHandle {
    sender: mpsc::Sender<EvaluatorCommand>,
}

impl EvaluatorHandle {
    pub fn spawn(evaluator: AlertEvaluator) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(64);

        let actor = EvaluatorActor::new(evaluator, cmd_rx);
        tokio::spawn(actor.run());

        Self { sender: cmd_tx }
    }

    /// Request a pass for a committed reading without waiting for it
    ///
    /// When the queue is full a pass is already pending and the request is
    /// dropped.
    pub fn notify_persisted(&self, reading_id: Uuid) {
        match self
            .sender
            .try_send(EvaluatorCommand::ReadingPersisted { reading_id })
        {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                debug!("evaluation queue full, skipping trigger for {reading_id}");
            }
            Err(TrySendError::Closed(_)) => {
                warn!("evaluator stopped, reading {reading_id} not evaluated");
            }
        }
    }

    /// Run a pass now and return the alerts it created
    pub async fn evaluate_now(&self) -> Result<Vec<AlertRecord>> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(EvaluatorCommand::EvaluateNow { respond_to: tx })
            .await
            .context("failed to send EvaluateNow command")?;

        rx.await.context("failed to receive evaluation result")?
    }

    pub async fn shutdown(&self) {
        let _ = self.sender.send(EvaluatorCommand::Shutdown).await;
    }
}
