//! Queue worker.
//!
//! Polls the admission scheduler of its instance and executes each admitted
//! row: claim, resurrect, run the chain, record the terminal state.

use std::sync::Arc;

use entity_events_core::content::Content;
use entity_events_core::context::{EventContext, OperationResult, OperationState};
use entity_events_core::error::EventError;
use entity_events_core::repository::PersistedEvent;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument, warn};

use crate::manager::EntityEventManager;

/// How one admitted row ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// The chain ran to completion.
    Executed,
    /// The chain or the resurrection failed.
    Failed,
    /// The owner of the content was deleted.
    Canceled,
    /// A processor suspended the chain.
    Blocked,
    /// Another worker claimed the row first.
    Skipped,
}

/// Counts of one polling round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Rows returned by admission.
    pub admitted: usize,
    /// Rows whose chain completed.
    pub executed: usize,
    /// Rows that ended in `EXCEPTION`.
    pub failed: usize,
    /// Rows canceled because their owner is gone.
    pub canceled: usize,
    /// Rows suspended by a processor.
    pub blocked: usize,
    /// Rows another worker claimed first.
    pub skipped: usize,
}

impl BatchReport {
    fn record(&mut self, disposition: Disposition) {
        match disposition {
            Disposition::Executed => self.executed += 1,
            Disposition::Failed => self.failed += 1,
            Disposition::Canceled => self.canceled += 1,
            Disposition::Blocked => self.blocked += 1,
            Disposition::Skipped => self.skipped += 1,
        }
    }
}

/// Executes queued events of the manager's instance.
#[derive(Debug)]
pub struct EventWorker<C: Content> {
    manager: Arc<EntityEventManager<C>>,
}

impl<C: Content> EventWorker<C> {
    /// Creates a worker for the manager's instance.
    #[must_use]
    pub fn new(manager: Arc<EntityEventManager<C>>) -> Self {
        Self { manager }
    }

    /// Admits one batch and executes it.
    ///
    /// # Errors
    ///
    /// Returns an error when admission fails. Failures of single rows are
    /// counted in the report instead.
    pub async fn run_once(&self) -> Result<BatchReport, EventError> {
        let config = self.manager.config();
        let batch = self
            .manager
            .admit(&config.instance_id, config.batch_size)
            .await?;

        let mut report = BatchReport {
            admitted: batch.len(),
            ..BatchReport::default()
        };
        for row in batch {
            let id = row.id;
            match self.execute(row).await {
                Ok(disposition) => report.record(disposition),
                Err(e) => {
                    error!(event_id = %id, error = %e, "failed to record event outcome");
                    report.failed += 1;
                }
            }
        }
        Ok(report)
    }

    #[instrument(skip(self, row), fields(event_id = %row.id, event_type = %row.event_type))]
    async fn execute(&self, row: PersistedEvent) -> Result<Disposition, EventError> {
        let sink = self.manager.sink();
        if !sink.claim(row.id).await? {
            return Ok(Disposition::Skipped);
        }

        let mut event = match self.manager.to_event(&row).await {
            Ok(event) => event,
            Err(e) if e.is_content_deleted() => {
                info!(error = %e, "owner deleted, event canceled");
                sink.finish(row.id, OperationResult::canceled(e.to_string()))
                    .await?;
                return Ok(Disposition::Canceled);
            }
            Err(e) => {
                warn!(error = %e, "event could not be resurrected");
                sink.finish(row.id, OperationResult::exception(e.to_string()))
                    .await?;
                return Ok(Disposition::Failed);
            }
        };

        match self.manager.process(&mut event).await {
            Ok(context) if context.is_suspended() => {
                sink.finish(row.id, blocked(&context)).await?;
                Ok(Disposition::Blocked)
            }
            Ok(context) if context.has_exception() => {
                sink.finish(row.id, OperationResult::exception(first_exception(&context)))
                    .await?;
                Ok(Disposition::Failed)
            }
            Ok(_) => {
                sink.complete(row.id, self.manager.config().retain_executed)
                    .await?;
                Ok(Disposition::Executed)
            }
            Err(e) => {
                sink.finish(row.id, OperationResult::exception(e.to_string()))
                    .await?;
                Ok(Disposition::Failed)
            }
        }
    }

    /// Starts the worker on a background task.
    ///
    /// The recovery sweep runs first: rows this instance left `RUNNING` are
    /// canceled before the first batch is admitted. Host exactly one worker
    /// per instance id.
    ///
    /// # Errors
    ///
    /// Returns an error when the recovery sweep fails; the worker is not
    /// started then.
    pub async fn spawn(
        self,
        shutdown: watch::Receiver<bool>,
    ) -> Result<JoinHandle<()>, EventError> {
        self.manager.init().await?;
        Ok(tokio::spawn(async move { self.run(shutdown).await }))
    }

    /// Polls until `shutdown` turns `true` or its sender is dropped.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.manager.config().poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(instance_id = %self.manager.config().instance_id, "event worker started");

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.run_once().await {
                        Ok(report) if report.admitted > 0 => debug!(?report, "batch finished"),
                        Ok(_) => {}
                        Err(e) => error!(error = %e, "admission failed"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("event worker stopped");
    }
}

fn blocked<C: Content>(context: &EventContext<C>) -> OperationResult {
    let processed = context.processed_order();
    let mut result = OperationResult::new(OperationState::Blocked)
        .with_property("processedOrder", serde_json::json!(processed));
    if let Some(last) = context.last_result() {
        result = result.with_property("suspendedBy", serde_json::json!(last.processor));
    }
    result
}

fn first_exception<C: Content>(context: &EventContext<C>) -> String {
    context
        .results()
        .iter()
        .find_map(|step| {
            step.results
                .iter()
                .find(|r| r.state == OperationState::Exception)
                .map(|r| match &r.exception {
                    Some(message) if !message.is_empty() => message.clone(),
                    _ => format!("processor {} reported an exception", step.processor),
                })
        })
        .unwrap_or_else(|| "chain reported an exception".to_owned())
}
