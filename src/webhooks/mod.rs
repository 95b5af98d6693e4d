//! Outbound webhook delivery.
//!
//! # Architecture
//!
//! - **Resolver** (`resolver.rs`): registrations for an event source
//! - **Filter** (`filter.rs`, `glob.rs`): event subscription and branch filter
//! - **Payload** (`payload/`): provider transforms behind an immutable registry
//! - **Signing** (`signing.rs`): HMAC-SHA256 signatures
//! - **Queue** (`queue.rs`): durable dedup queue of task identifiers
//! - **Delivery** (`delivery.rs`): HTTP delivery trait and implementation
//! - **Worker** (`worker.rs`): worker pool and the per-task delivery step
//!
//! [`WebhookService`] wires them together. [`WebhookService::notify`] is the
//! only entry point for domain events; it creates and enqueues tasks and
//! never waits for delivery.
//!
//! # Error Policy
//!
//! | Failure | Effect |
//! |---------|--------|
//! | Event not subscribed, branch filtered, empty push | Registration skipped silently |
//! | Invalid branch filter, unsupported provider, bad provider meta | Registration skipped, logged |
//! | Registration lookup fails | Whole fan-out fails |
//! | Task creation or enqueue fails | Siblings still processed, first error returned |
//! | Timeout, transport error, non-2xx | Task recorded as failed, never retried |

mod delivery;
mod filter;
mod glob;
mod payload;
mod queue;
mod resolver;
mod signing;
mod worker;

pub use delivery::{
    DELIVERY_HEADER, DeliveryRequest, EVENT_HEADER, HUB_SIGNATURE_HEADER, HttpDeliverer,
    SIGNATURE_HEADER, WebhookDelivery,
};
pub use filter::{Eligibility, check_eligibility, eligible};
pub use glob::{BranchGlob, matches_everything};
pub use payload::{
    DeliveryTarget, PayloadShaper, ProviderRegistry, Transform, TransformFn, delivery_target,
};
pub use queue::{DedupQueue, PushOutcome, QueueLease};
pub use resolver::RegistrationResolver;
pub use signing::{SIGNATURE_PREFIX, compute_signature, verify_signature};
pub use worker::{DeliveryContext, ProcessOutcome, WorkerPool, process_task};

use crate::config::{HookrelayConfig, WebhookSettings};
use crate::models::{
    DeliveryTask, EventSource, HookEventType, HookId, HookPayload, NewTask, Registration,
    RepositoryRef, TaskId,
};
use crate::storage::{
    MemoryQueueStore, MemoryRegistrationStore, MemoryTaskStore, QueueStore, RegistrationStore,
    SqliteQueueStore, SqliteTaskStore, TaskStore,
};
use crate::{Error, Result};
use std::sync::Arc;

/// What one [`WebhookService::notify`] call did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotifyReport {
    /// Tasks created and enqueued, one per eligible registration.
    pub created: Vec<TaskId>,
    /// Registrations that did not want the event.
    pub skipped: usize,
    /// Registrations skipped because of their configuration.
    pub failed: usize,
}

/// Pluggable collaborators for [`WebhookService::with_backends`].
pub struct WebhookBackends {
    /// Registration lookup.
    pub registrations: Arc<dyn RegistrationStore>,
    /// Task history.
    pub tasks: Arc<dyn TaskStore>,
    /// Durable queue backing.
    pub queue_store: Arc<dyn QueueStore>,
    /// Network delivery.
    pub deliverer: Arc<dyn WebhookDelivery>,
    /// Provider transforms.
    pub shaper: PayloadShaper,
}

impl WebhookBackends {
    /// In-memory stores with the standard provider set.
    #[must_use]
    pub fn in_memory(
        registrations: Vec<Registration>,
        deliverer: Arc<dyn WebhookDelivery>,
    ) -> Self {
        Self {
            registrations: Arc::new(MemoryRegistrationStore::new(registrations)),
            tasks: Arc::new(MemoryTaskStore::new()),
            queue_store: Arc::new(MemoryQueueStore::new()),
            deliverer,
            shaper: PayloadShaper::default(),
        }
    }
}

/// Webhook service: fan-out, queueing, delivery and task history.
///
/// # Example
///
/// ```rust,ignore
/// use hookrelay::{HookrelayConfig, WebhookService};
///
/// let service = WebhookService::open(&HookrelayConfig::load_default())?;
/// service.recover().await?;
/// let pool = service.start();
/// let report = service.notify(&source, HookEventType::Push, &payload).await?;
/// pool.shutdown().await;
/// ```
pub struct WebhookService {
    settings: WebhookSettings,
    resolver: RegistrationResolver,
    shaper: PayloadShaper,
    queue_store: Arc<dyn QueueStore>,
    queue: Arc<DedupQueue>,
    ctx: Arc<DeliveryContext>,
}

impl WebhookService {
    /// Builds the service from configuration.
    ///
    /// Tasks and the durable queue live in `<data_dir>/hookrelay.db` when a
    /// data directory is configured, in memory otherwise. Registrations come
    /// from the `[[registrations]]` section.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or the HTTP client
    /// cannot be built.
    pub fn open(config: &HookrelayConfig) -> Result<Self> {
        let (tasks, queue_store): (Arc<dyn TaskStore>, Arc<dyn QueueStore>) =
            match config.database_path() {
                Some(path) => {
                    tracing::info!(path = %path.display(), "Opening task database");
                    (
                        Arc::new(SqliteTaskStore::open(&path)?),
                        Arc::new(SqliteQueueStore::open(&path)?),
                    )
                },
                None => {
                    tracing::warn!("No data directory configured, tasks are kept in memory");
                    (
                        Arc::new(MemoryTaskStore::new()),
                        Arc::new(MemoryQueueStore::new()),
                    )
                },
            };

        let backends = WebhookBackends {
            registrations: Arc::new(MemoryRegistrationStore::new(config.registrations.clone())),
            tasks,
            queue_store,
            deliverer: Arc::new(HttpDeliverer::new(&config.webhook)?),
            shaper: PayloadShaper::default(),
        };
        Ok(Self::with_backends(config.webhook.clone(), backends))
    }

    /// Creates a service over custom backends.
    #[must_use]
    pub fn with_backends(settings: WebhookSettings, backends: WebhookBackends) -> Self {
        let queue = Arc::new(DedupQueue::new(
            settings.queue_capacity,
            Arc::clone(&backends.queue_store),
        ));
        let ctx = Arc::new(DeliveryContext {
            tasks: backends.tasks,
            registrations: Arc::clone(&backends.registrations),
            deliverer: backends.deliverer,
        });
        Self {
            settings,
            resolver: RegistrationResolver::new(backends.registrations),
            shaper: backends.shaper,
            queue_store: backends.queue_store,
            queue,
            ctx,
        }
    }

    /// Delivery settings in use.
    #[must_use]
    pub const fn settings(&self) -> &WebhookSettings {
        &self.settings
    }

    /// The delivery queue.
    #[must_use]
    pub const fn queue(&self) -> &Arc<DedupQueue> {
        &self.queue
    }

    /// Fans an event out to every eligible registration.
    ///
    /// Creates and enqueues one task per eligible registration; delivery
    /// happens on the worker pool. Blocks while the queue buffer is full.
    ///
    /// # Errors
    ///
    /// Returns an error if registrations cannot be resolved, or the first
    /// task creation or enqueue error after every registration was tried.
    pub async fn notify(
        &self,
        source: &EventSource,
        event: HookEventType,
        payload: &HookPayload,
    ) -> Result<NotifyReport> {
        let mut report = NotifyReport::default();
        if !self.settings.enabled {
            tracing::debug!(event_type = %event, "Webhooks disabled, dropping event");
            return Ok(report);
        }

        metrics::counter!("webhook_events_received_total", "event_type" => event.as_str())
            .increment(1);

        let registrations = self.resolver.resolve(source)?;
        let mut first_error = None;

        for registration in &registrations {
            match self.fan_out_one(registration, event, payload).await {
                Ok(Some(task_id)) => report.created.push(task_id),
                Ok(None) => report.skipped += 1,
                Err(e) if e.is_configuration() => {
                    report.failed += 1;
                    metrics::counter!("webhook_registrations_rejected_total").increment(1);
                    tracing::warn!(
                        hook_id = %registration.id,
                        event_type = %event,
                        error = %e,
                        "Skipping misconfigured webhook"
                    );
                },
                Err(e) => {
                    report.failed += 1;
                    tracing::error!(
                        hook_id = %registration.id,
                        event_type = %event,
                        error = %e,
                        "Failed to create webhook task"
                    );
                    first_error.get_or_insert(e);
                },
            }
        }

        if let Some(e) = first_error {
            return Err(e);
        }

        tracing::debug!(
            event_type = %event,
            created = report.created.len(),
            skipped = report.skipped,
            failed = report.failed,
            "Webhook fan-out complete"
        );
        Ok(report)
    }

    /// Creates and enqueues the task for one registration, if eligible.
    async fn fan_out_one(
        &self,
        registration: &Registration,
        event: HookEventType,
        payload: &HookPayload,
    ) -> Result<Option<TaskId>> {
        match check_eligibility(registration, event, payload) {
            Eligibility::Eligible => {},
            Eligibility::InvalidBranchFilter { pattern, cause } => {
                return Err(Error::InvalidBranchFilter { pattern, cause });
            },
            other => {
                tracing::trace!(
                    hook_id = %registration.id,
                    event_type = %event,
                    reason = other.reason(),
                    "Webhook not eligible"
                );
                return Ok(None);
            },
        }

        let body = self.shaper.shape(payload, event, registration)?;
        self.enqueue(NewTask::new(registration.id, event, body))
            .await
            .map(Some)
    }

    async fn enqueue(&self, new_task: NewTask) -> Result<TaskId> {
        let task = self.ctx.tasks.create(new_task)?;
        self.queue.push(task.id).await?;
        metrics::counter!("webhook_tasks_created_total").increment(1);
        Ok(task.id)
    }

    /// Re-delivers a previous task as a new task with the same payload.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the task does not exist or belongs to a
    /// different registration, or a storage error.
    pub async fn replay(&self, hook_id: HookId, task_id: TaskId) -> Result<TaskId> {
        let task = self.ctx.tasks.replay(hook_id, task_id)?;
        self.queue.push(task.id).await?;
        tracing::info!(hook_id = %hook_id, task_id = %task_id, replay_id = %task.id, "Replaying webhook task");
        Ok(task.id)
    }

    /// Enqueues a sample push for a registration, ignoring its filters.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for an unknown registration, a shaping
    /// error, or a storage error.
    pub async fn send_test(&self, hook_id: HookId) -> Result<TaskId> {
        let registration = self
            .ctx
            .registrations
            .get(hook_id)?
            .ok_or_else(|| Error::NotFound(format!("registration {hook_id}")))?;

        let payload = HookPayload::sample_push(RepositoryRef {
            id: 0,
            owner_id: 0,
            name: "test".to_string(),
            full_name: "hookrelay/test".to_string(),
            html_url: String::new(),
        });
        let body = self
            .shaper
            .shape(&payload, HookEventType::Push, &registration)?;
        self.enqueue(NewTask::new(hook_id, HookEventType::Push, body))
            .await
    }

    /// Re-enqueues work left over from a previous process.
    ///
    /// Covers the durable queue and every task still marked undelivered. Run
    /// it before [`start`](Self::start). Identifiers beyond the buffer
    /// capacity are fed in the background on the current runtime.
    ///
    /// # Errors
    ///
    /// Returns a storage error or [`Error::QueueClosed`].
    #[allow(clippy::unused_async)] // requires a runtime for the background feeder
    pub async fn recover(&self) -> Result<usize> {
        let mut ids = self.queue_store.load()?;
        ids.extend(self.ctx.tasks.undelivered()?.into_iter().map(|task| task.id));

        let restored = self.queue.restore(ids)?;
        if restored > 0 {
            tracing::info!(restored, "Recovered pending webhook tasks");
        }
        metrics::counter!("webhook_tasks_recovered_total").increment(restored as u64);
        Ok(restored)
    }

    /// Spawns the worker pool.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    #[must_use]
    pub fn start(&self) -> WorkerPool {
        WorkerPool::spawn(
            self.settings.workers,
            Arc::clone(&self.queue),
            Arc::clone(&self.ctx),
        )
    }

    /// Delivers one task immediately on the calling task.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] if the task is queued or in flight,
    /// or a storage error.
    pub async fn deliver_now(&self, task_id: TaskId) -> Result<ProcessOutcome> {
        let lease = self.queue.try_claim(task_id).ok_or_else(|| {
            Error::InvalidState(format!("task {task_id} is already queued or in flight"))
        })?;
        let outcome = process_task(&self.ctx, task_id).await?;
        lease.complete()?;
        Ok(outcome)
    }

    /// Waits until no task is queued or in flight.
    ///
    /// Once the pool has shut down, only in-flight deliveries are awaited.
    pub async fn wait_idle(&self) {
        self.queue.wait_idle().await;
    }

    /// Loads a task.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] or a storage error.
    pub fn task(&self, task_id: TaskId) -> Result<DeliveryTask> {
        self.ctx.tasks.get(task_id)
    }

    /// Recent tasks of a registration, newest first.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub fn tasks(&self, hook_id: HookId, limit: usize) -> Result<Vec<DeliveryTask>> {
        self.ctx.tasks.list_for_registration(hook_id, limit)
    }

    /// Deletes delivered tasks older than `before` (Unix seconds).
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub fn prune(&self, before: i64) -> Result<usize> {
        let pruned = self.ctx.tasks.prune_delivered(before)?;
        tracing::info!(pruned, before, "Pruned delivered webhook tasks");
        Ok(pruned)
    }
}
