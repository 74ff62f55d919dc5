//! Admission scheduler.
//!
//! Selects the next batch of persisted events an instance may execute:
//! `HIGH` before `NORMAL`, oldest first within a priority, never before the
//! execute date. Logically identical events waiting in the queue collapse to
//! the newest one, which inherits the highest priority of the group.

use std::collections::HashSet;
use std::sync::Arc;

use entity_events_core::clock::Clock;
use entity_events_core::context::OperationState;
use entity_events_core::error::EventError;
use entity_events_core::event::Priority;
use entity_events_core::repository::{PersistedEvent, PersistedEventRepository};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Picks admission batches. One admission runs at a time per scheduler.
pub struct AdmissionScheduler {
    repository: Arc<dyn PersistedEventRepository>,
    clock: Arc<dyn Clock>,
    admitting: Mutex<()>,
}

impl std::fmt::Debug for AdmissionScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdmissionScheduler").finish_non_exhaustive()
    }
}

impl AdmissionScheduler {
    /// Creates a scheduler reading `repository` at the time given by `clock`.
    pub fn new(repository: Arc<dyn PersistedEventRepository>, clock: Arc<dyn Clock>) -> Self {
        Self {
            repository,
            clock,
            admitting: Mutex::new(()),
        }
    }

    /// Returns up to `batch_size` `CREATED` events of `instance_id` that are
    /// eligible now, ordered by priority and then age.
    ///
    /// Duplicates of an admitted event are deleted from the queue; the
    /// surviving row is escalated to the highest priority of its group.
    ///
    /// # Errors
    ///
    /// Returns a repository error.
    #[instrument(skip(self))]
    pub async fn admit(
        &self,
        instance_id: &str,
        batch_size: usize,
    ) -> Result<Vec<PersistedEvent>, EventError> {
        if batch_size == 0 {
            return Ok(Vec::new());
        }
        let _admitting = self.admitting.lock().await;
        let now = self.clock.now();

        let mut candidates = self
            .repository
            .find_to_execute(instance_id, Priority::High, now, batch_size)
            .await?;
        if candidates.len() < batch_size {
            let normal = self
                .repository
                .find_to_execute(
                    instance_id,
                    Priority::Normal,
                    now,
                    batch_size - candidates.len(),
                )
                .await?;
            candidates.extend(normal);
        }

        let mut handled: HashSet<Uuid> = HashSet::new();
        let mut batch: Vec<PersistedEvent> = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            if handled.contains(&candidate.id) {
                continue;
            }
            let survivor = self.collapse_duplicates(candidate, &mut handled, now).await?;
            if handled.insert(survivor.id) {
                batch.push(survivor);
            }
        }

        batch.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| a.created.cmp(&b.created))
        });
        batch.truncate(batch_size);

        if !batch.is_empty() {
            info!(instance_id, admitted = batch.len(), "events admitted");
        }
        Ok(batch)
    }

    async fn collapse_duplicates(
        &self,
        candidate: PersistedEvent,
        handled: &mut HashSet<Uuid>,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<PersistedEvent, EventError> {
        let group: Vec<PersistedEvent> = self
            .repository
            .find_duplicates(&candidate, now)
            .await?
            .into_iter()
            .filter(|other| other.is_duplicate_of(&candidate))
            .collect();
        if group.is_empty() {
            return Ok(candidate);
        }

        let mut survivor = candidate;
        let mut older = Vec::with_capacity(group.len());
        for other in group {
            if (other.created, other.id) > (survivor.created, survivor.id) {
                older.push(std::mem::replace(&mut survivor, other));
            } else {
                older.push(other);
            }
        }
        let highest = older
            .iter()
            .map(|e| e.priority)
            .fold(survivor.priority, Ord::max);

        for duplicate in &older {
            handled.insert(duplicate.id);
            if self
                .repository
                .delete_if(duplicate.id, OperationState::Created)
                .await?
            {
                debug!(
                    event_id = %duplicate.id,
                    survivor_id = %survivor.id,
                    "duplicate event removed"
                );
            }
        }

        if highest > survivor.priority
            && self.repository.update_priority(survivor.id, highest).await?
        {
            info!(
                event_id = %survivor.id,
                from = %survivor.priority,
                to = %highest,
                "event priority escalated"
            );
            survivor.priority = highest;
        }
        Ok(survivor)
    }
}
