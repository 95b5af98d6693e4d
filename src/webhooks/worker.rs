//! Delivery workers.
//!
//! Workers pull leases from the [`DedupQueue`], load the task, deliver it and
//! record the outcome. A delivery failure is terminal for the task; only
//! storage errors leave the identifier in the durable queue for the next
//! start.

use super::delivery::{DeliveryRequest, WebhookDelivery};
use super::queue::DedupQueue;
use crate::models::{DeliveryOutcome, TaskId};
use crate::storage::{RegistrationStore, TaskStore};
use crate::{Error, Result};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Collaborators a worker needs.
#[derive(Clone)]
pub struct DeliveryContext {
    /// Task history.
    pub tasks: Arc<dyn TaskStore>,
    /// Registration lookup.
    pub registrations: Arc<dyn RegistrationStore>,
    /// Network delivery.
    pub deliverer: Arc<dyn WebhookDelivery>,
}

/// What processing one task did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// The task was attempted and the outcome recorded.
    Delivered(DeliveryOutcome),
    /// The task had already been delivered; nothing happened.
    AlreadyDelivered,
    /// No task with this identifier exists.
    TaskMissing,
}

/// Delivers one task and records the outcome.
///
/// The caller must hold the task's lease.
///
/// # Errors
///
/// Returns a storage error if the task cannot be loaded or the outcome
/// cannot be recorded.
pub async fn process_task(ctx: &DeliveryContext, id: TaskId) -> Result<ProcessOutcome> {
    let task = match ctx.tasks.get(id) {
        Ok(task) => task,
        Err(Error::NotFound(_)) => {
            tracing::warn!(task_id = %id, "Queued task no longer exists");
            metrics::counter!("webhook_tasks_skipped_total", "reason" => "missing").increment(1);
            return Ok(ProcessOutcome::TaskMissing);
        },
        Err(e) => return Err(e),
    };

    if task.delivered {
        tracing::debug!(task_id = %id, "Task already delivered, skipping");
        metrics::counter!("webhook_tasks_skipped_total", "reason" => "delivered").increment(1);
        return Ok(ProcessOutcome::AlreadyDelivered);
    }

    let outcome = match ctx.registrations.get(task.hook_id)? {
        Some(registration) => {
            metrics::counter!(
                "webhook_deliveries_total",
                "provider" => registration.provider.as_str(),
                "event_type" => task.event_type.as_str()
            )
            .increment(1);
            let request = DeliveryRequest::new(&task, &registration);
            ctx.deliverer.deliver(&request).await
        },
        None => DeliveryOutcome::failure(0, format!("registration {} not found", task.hook_id)),
    };

    ctx.tasks.mark_delivered(id, &outcome)?;

    #[allow(clippy::cast_precision_loss)]
    let duration_ms = outcome.duration_ms as f64;
    metrics::histogram!("webhook_delivery_duration_ms").record(duration_ms);

    if outcome.succeeded {
        metrics::counter!("webhook_deliveries_success_total").increment(1);
        tracing::debug!(
            task_id = %id,
            hook_id = %task.hook_id,
            event_type = %task.event_type,
            status_code = ?outcome.status_code,
            duration_ms = outcome.duration_ms,
            "Webhook delivered successfully"
        );
    } else {
        metrics::counter!("webhook_deliveries_failed_total").increment(1);
        tracing::warn!(
            task_id = %id,
            hook_id = %task.hook_id,
            event_type = %task.event_type,
            status_code = ?outcome.status_code,
            duration_ms = outcome.duration_ms,
            response = %outcome.response_snippet,
            "Webhook delivery failed"
        );
    }

    Ok(ProcessOutcome::Delivered(outcome))
}

/// Fixed set of workers draining a queue.
#[derive(Debug)]
pub struct WorkerPool {
    queue: Arc<DedupQueue>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawns `workers` workers (at least one) on the current runtime.
    ///
    /// Reopens the queue if an earlier pool shut it down.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    #[must_use]
    pub fn spawn(workers: usize, queue: Arc<DedupQueue>, ctx: Arc<DeliveryContext>) -> Self {
        let workers = workers.max(1);
        queue.reopen();
        let handles = (0..workers)
            .map(|worker| {
                let queue = Arc::clone(&queue);
                let ctx = Arc::clone(&ctx);
                tokio::spawn(run_worker(worker, queue, ctx))
            })
            .collect();
        tracing::info!(workers, "Webhook worker pool started");
        Self { queue, handles }
    }

    /// Number of workers.
    #[must_use]
    pub fn size(&self) -> usize {
        self.handles.len()
    }

    /// Waits until the queue has nothing queued or in flight.
    pub async fn drain(&self) {
        self.queue.wait_idle().await;
    }

    /// Closes the queue and waits for in-flight deliveries to finish.
    ///
    /// Identifiers still buffered stay in the durable queue.
    pub async fn shutdown(self) {
        self.queue.close();
        for handle in self.handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Webhook worker terminated abnormally");
            }
        }
        tracing::info!(pending = self.queue.len(), "Webhook worker pool stopped");
    }
}

async fn run_worker(worker: usize, queue: Arc<DedupQueue>, ctx: Arc<DeliveryContext>) {
    while let Some(lease) = queue.pop().await {
        let id = lease.task_id();
        match process_task(&ctx, id).await {
            Ok(_) => {
                if let Err(e) = lease.complete() {
                    tracing::error!(worker, task_id = %id, error = %e, "Failed to dequeue task");
                }
            },
            Err(e) => {
                tracing::error!(worker, task_id = %id, error = %e, "Failed to process task");
            },
        }
    }
    tracing::debug!(worker, "Webhook worker exiting");
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::{HookEventType, HookId, NewTask, Registration, RegistrationScope};
    use crate::storage::{MemoryQueueStore, MemoryRegistrationStore, MemoryTaskStore, QueueStore};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Records requests and answers with a fixed status.
    pub struct RecordingDeliverer {
        pub requests: Mutex<Vec<DeliveryRequest>>,
        pub status: u16,
    }

    impl RecordingDeliverer {
        pub fn with_status(status: u16) -> Self {
            Self {
                requests: Mutex::new(Vec::new()),
                status,
            }
        }

        pub fn count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl WebhookDelivery for RecordingDeliverer {
        async fn deliver(&self, request: &DeliveryRequest) -> DeliveryOutcome {
            self.requests.lock().unwrap().push(request.clone());
            DeliveryOutcome::from_response(self.status, 1, "ok".to_string())
        }
    }

    fn context(deliverer: Arc<RecordingDeliverer>) -> (DeliveryContext, Arc<MemoryTaskStore>) {
        let tasks = Arc::new(MemoryTaskStore::new());
        let registrations = Arc::new(MemoryRegistrationStore::new(vec![Registration::new(
            1,
            "https://example.com/hook",
            RegistrationScope::System,
        )]));
        let ctx = DeliveryContext {
            tasks: tasks.clone(),
            registrations,
            deliverer,
        };
        (ctx, tasks)
    }

    fn new_task(hook_id: i64) -> NewTask {
        NewTask::new(HookId::new(hook_id), HookEventType::Push, b"{}".to_vec())
    }

    #[tokio::test]
    async fn test_process_records_outcome() {
        let deliverer = Arc::new(RecordingDeliverer::with_status(200));
        let (ctx, tasks) = context(deliverer.clone());
        let task = tasks.create(new_task(1)).unwrap();

        let outcome = process_task(&ctx, task.id).await.unwrap();
        assert!(matches!(outcome, ProcessOutcome::Delivered(ref o) if o.succeeded));

        let stored = tasks.get(task.id).unwrap();
        assert!(stored.delivered);
        assert!(stored.succeeded);
        assert_eq!(stored.status_code, Some(200));
        assert_eq!(deliverer.count(), 1);
    }

    #[tokio::test]
    async fn test_delivered_task_is_skipped() {
        let deliverer = Arc::new(RecordingDeliverer::with_status(200));
        let (ctx, tasks) = context(deliverer.clone());
        let task = tasks.create(new_task(1)).unwrap();

        process_task(&ctx, task.id).await.unwrap();
        let second = process_task(&ctx, task.id).await.unwrap();
        assert_eq!(second, ProcessOutcome::AlreadyDelivered);
        assert_eq!(deliverer.count(), 1);
    }

    #[tokio::test]
    async fn test_missing_registration_fails_task() {
        let deliverer = Arc::new(RecordingDeliverer::with_status(200));
        let (ctx, tasks) = context(deliverer.clone());
        let task = tasks.create(new_task(99)).unwrap();

        process_task(&ctx, task.id).await.unwrap();
        let stored = tasks.get(task.id).unwrap();
        assert!(stored.delivered);
        assert!(!stored.succeeded);
        assert_eq!(stored.response_snippet.as_deref(), Some("registration 99 not found"));
        assert_eq!(deliverer.count(), 0);
    }

    #[tokio::test]
    async fn test_missing_task_is_reported() {
        let (ctx, _tasks) = context(Arc::new(RecordingDeliverer::with_status(200)));
        let outcome = process_task(&ctx, TaskId::new(404)).await.unwrap();
        assert_eq!(outcome, ProcessOutcome::TaskMissing);
    }

    #[tokio::test]
    async fn test_pool_drains_queue() {
        let deliverer = Arc::new(RecordingDeliverer::with_status(500));
        let (ctx, tasks) = context(deliverer.clone());
        let store = Arc::new(MemoryQueueStore::new());
        let queue = Arc::new(DedupQueue::new(2, store.clone()));
        let pool = WorkerPool::spawn(3, Arc::clone(&queue), Arc::new(ctx));
        assert_eq!(pool.size(), 3);

        let mut ids = Vec::new();
        for _ in 0..6 {
            let task = tasks.create(new_task(1)).unwrap();
            queue.push(task.id).await.unwrap();
            ids.push(task.id);
        }
        pool.drain().await;
        pool.shutdown().await;

        assert_eq!(deliverer.count(), 6);
        for id in ids {
            let task = tasks.get(id).unwrap();
            assert!(task.delivered);
            assert!(!task.succeeded);
        }
        assert!(store.load().unwrap().is_empty());
    }
}
