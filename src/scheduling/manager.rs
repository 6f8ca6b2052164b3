use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use chrono::{DateTime, Utc};
use tokio::{
    sync::{Mutex, watch},
    task, time,
};
use tokio_util::sync::CancellationToken;

use crate::appsettings::SchedulerSettings;
use crate::clock::Clock;
use crate::dispatch::DispatchExecutor;
use crate::reminder::{Reminder, ReminderFireTime, ReminderId, ReminderStatus};
use crate::storage::{NewReminder, ReminderStorage, StatusChange};
use crate::time_parser::{self, format_fire_at, format_relative};

use super::error::{ScheduleReminderError, SchedulingError};
use super::scheduler::{JobSlot, ScheduledJob, delay_until, wait_for_fire_time};

const RECORD_ATTEMPTS: u32 = 3;
const RECORD_BACKOFF: Duration = Duration::from_secs(1);
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// What a reconciliation pass found in the store.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Timers started by this pass, overdue ones included.
    pub armed: usize,
    /// Reminders whose fire time had already passed. They fire right away.
    pub overdue: usize,
    pub already_armed: usize,
}

struct SweepTask(watch::Sender<()>);

struct SchedulerCore {
    storage: Arc<dyn ReminderStorage>,
    executor: DispatchExecutor,
    clock: Arc<dyn Clock>,
    settings: SchedulerSettings,
    jobs: Mutex<HashMap<ReminderId, JobSlot>>,
    next_generation: AtomicU64,
}

/// Owns one timer per pending reminder and records what happened to it.
///
/// The job table lock is held across the store call of every operation that
/// changes it, so `schedule`, `cancel`, `reschedule` and reconciliation never
/// interleave. Delivery runs outside the lock.
pub struct ReminderScheduler {
    core: Arc<SchedulerCore>,
    sweep_task: SweepTask,
}

impl ReminderScheduler {
    pub fn new(
        storage: Arc<dyn ReminderStorage>,
        executor: DispatchExecutor,
        clock: Arc<dyn Clock>,
        settings: SchedulerSettings,
    ) -> Self {
        let core = Arc::new(SchedulerCore {
            storage,
            executor,
            clock,
            settings,
            jobs: Mutex::new(HashMap::new()),
            next_generation: AtomicU64::new(0),
        });
        let sweep_task = Self::spawn_sweep_task(Arc::clone(&core));

        Self { core, sweep_task }
    }

    fn spawn_sweep_task(core: Arc<SchedulerCore>) -> SweepTask {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(());
        let interval = core.settings.sweep_interval();
        task::spawn(async move {
            loop {
                tokio::select! {
                    _ = time::sleep(interval) => {
                        match core.reconcile().await {
                            Ok(report) if report.armed > 0 => log::info!(
                                "[SWEEP] Armed {} reminders nobody was waiting for. [overdue = {}]",
                                report.armed,
                                report.overdue
                            ),
                            Ok(_) => {}
                            Err(error) => log::warn!("[SWEEP] Skipping this round: {error}"),
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        log::info!("Sweep task shutting down");
                        break;
                    }
                };
            }
        });

        SweepTask(shutdown_tx)
    }

    /// Saves a Pending reminder and arms its timer.
    pub async fn schedule(&self, reminder: Reminder) -> Result<Reminder, SchedulingError> {
        self.core.schedule(reminder).await
    }

    /// Parses `time_text` against `now` and schedules a new reminder for it.
    pub async fn schedule_reminder(
        &self,
        new_reminder: NewReminder,
        time_text: &str,
        now: DateTime<Utc>,
    ) -> Result<Reminder, ScheduleReminderError> {
        let fire_at = time_parser::parse(time_text, now)?;
        let reminder = Reminder::new_pending(
            new_reminder.task_id,
            new_reminder.recipient,
            ReminderFireTime::new(fire_at),
            new_reminder.text,
            now,
        );

        Ok(self.schedule(reminder).await?)
    }

    /// Returns `true` when this call moved the reminder to Cancelled. Calling
    /// it again, or while the reminder is being delivered, returns `false`.
    pub async fn cancel(&self, id: ReminderId) -> Result<bool, SchedulingError> {
        self.core.cancel(id).await
    }

    pub async fn cancel_reminders_for_task(&self, task_id: &str) -> Result<usize, SchedulingError> {
        let pending = self
            .core
            .store_call(self.core.storage.pending_for_task(task_id))
            .await?;

        let mut cancelled = 0;
        for reminder in pending {
            match self.cancel(reminder.id).await {
                Ok(true) => cancelled += 1,
                Ok(false) | Err(SchedulingError::UnknownReminder(_)) => {}
                Err(error) => return Err(error),
            }
        }

        log::info!("Cancelled {cancelled} reminders. [task_id = {task_id}]");
        Ok(cancelled)
    }

    /// Cancels the task's reminders and deletes every record it owns.
    /// Returns the number of deleted records.
    pub async fn forget_task(&self, task_id: &str) -> Result<usize, SchedulingError> {
        self.cancel_reminders_for_task(task_id).await?;
        let deleted = self
            .core
            .store_call(self.core.storage.delete_by_task(task_id))
            .await?;

        log::info!("Deleted {deleted} reminders. [task_id = {task_id}]");
        Ok(deleted)
    }

    pub async fn reschedule(
        &self,
        id: ReminderId,
        time_text: &str,
        now: DateTime<Utc>,
    ) -> Result<Reminder, ScheduleReminderError> {
        let fire_at = ReminderFireTime::new(time_parser::parse(time_text, now)?);
        self.core.reschedule(id, fire_at).await
    }

    pub async fn reconcile_on_startup(&self) -> Result<ReconcileReport, SchedulingError> {
        let report = self.core.reconcile().await?;
        log::info!(
            "Reconciled pending reminders. [armed = {}, overdue = {}, already_armed = {}]",
            report.armed,
            report.overdue,
            report.already_armed
        );
        Ok(report)
    }

    pub async fn pending_for_task(&self, task_id: &str) -> Result<Vec<Reminder>, SchedulingError> {
        self.core
            .store_call(self.core.storage.pending_for_task(task_id))
            .await
    }

    /// Timers currently waiting to go off.
    pub async fn armed_count(&self) -> usize {
        self.core
            .jobs
            .lock()
            .await
            .values()
            .filter(|slot| matches!(slot, JobSlot::Armed(_)))
            .count()
    }

    /// Stops the sweep and every timer. Pending reminders stay Pending in the
    /// store and are picked up again on the next start.
    pub async fn shutdown(self) {
        let _ = self.sweep_task.0.send(());

        let jobs: Vec<_> = self.core.jobs.lock().await.drain().collect();
        let mut disarmed = 0;
        for (_, slot) in jobs {
            if let JobSlot::Armed(job) = slot {
                job.cancel(SHUTDOWN_TIMEOUT).await;
                disarmed += 1;
            }
        }

        log::info!("Scheduler stopped, {disarmed} timers disarmed");
    }
}

impl Drop for ReminderScheduler {
    fn drop(&mut self) {
        let _ = self.sweep_task.0.send(());
    }
}

impl SchedulerCore {
    async fn store_call<T>(
        &self,
        call: impl Future<Output = anyhow::Result<T>>,
    ) -> Result<T, SchedulingError> {
        let timeout = self.settings.store_timeout();
        match time::timeout(timeout, call).await {
            Ok(result) => result.map_err(SchedulingError::StoreUnavailable),
            Err(_) => Err(SchedulingError::StoreUnavailable(anyhow::anyhow!(
                "no answer within {timeout:?}"
            ))),
        }
    }

    async fn schedule(self: &Arc<Self>, reminder: Reminder) -> Result<Reminder, SchedulingError> {
        let now = self.clock.now();
        if *reminder.fire_at.instant() <= now {
            return Err(SchedulingError::PastTime);
        }
        if !reminder.is_pending() {
            return Err(SchedulingError::NotPending(reminder.id));
        }

        let mut jobs = self.jobs.lock().await;
        if jobs.contains_key(&reminder.id) {
            return Err(SchedulingError::AlreadyScheduled(reminder.id));
        }

        // Saving upserts, so a finished record must not be overwritten back to Pending.
        match self.store_call(self.storage.get(reminder.id)).await? {
            Some(stored) if stored.status.is_terminal() => {
                return Err(SchedulingError::NotPending(reminder.id));
            }
            _ => {}
        }

        let reminder = self.store_call(self.storage.save(reminder)).await?;
        let job = self.arm(reminder.clone(), now);
        jobs.insert(reminder.id, JobSlot::Armed(job));

        let fire_at = reminder.fire_at.instant();
        log::info!(
            "[SCHEDULE] Reminder set for {} ({}). [reminder_id = {}, task_id = {}]",
            format_fire_at(fire_at),
            format_relative(fire_at, &now),
            reminder.id,
            reminder.task_id
        );

        Ok(reminder)
    }

    async fn cancel(&self, id: ReminderId) -> Result<bool, SchedulingError> {
        let mut jobs = self.jobs.lock().await;
        if matches!(jobs.get(&id), Some(JobSlot::Dispatching)) {
            log::info!("[CANCEL] Reminder is being delivered, nothing to cancel. [reminder_id = {id}]");
            return Ok(false);
        }

        if self.store_call(self.storage.get(id)).await?.is_none() {
            return Err(SchedulingError::UnknownReminder(id));
        }

        let change = self
            .store_call(self.storage.mark_status(id, ReminderStatus::Cancelled))
            .await?;

        if let Some(JobSlot::Armed(job)) = jobs.remove(&id) {
            job.disarm();
        }

        match change {
            StatusChange::Applied => log::info!("[CANCEL] Reminder cancelled. [reminder_id = {id}]"),
            StatusChange::Unchanged(status) => {
                log::debug!("[CANCEL] Reminder was already {status}. [reminder_id = {id}]")
            }
        }

        Ok(change.applied())
    }

    async fn reschedule(
        self: &Arc<Self>,
        id: ReminderId,
        fire_at: ReminderFireTime,
    ) -> Result<Reminder, ScheduleReminderError> {
        let now = self.clock.now();
        if *fire_at.instant() <= now {
            return Err(SchedulingError::PastTime.into());
        }

        let mut jobs = self.jobs.lock().await;
        if matches!(jobs.get(&id), Some(JobSlot::Dispatching)) {
            return Err(SchedulingError::NotPending(id).into());
        }

        let Some(mut reminder) = self.store_call(self.storage.get(id)).await? else {
            return Err(SchedulingError::UnknownReminder(id).into());
        };

        let change = self
            .store_call(self.storage.update_fire_at(id, fire_at))
            .await?;
        if !change.applied() {
            return Err(SchedulingError::NotPending(id).into());
        }

        if let Some(JobSlot::Armed(job)) = jobs.remove(&id) {
            job.disarm();
        }

        reminder.fire_at = fire_at;
        let job = self.arm(reminder.clone(), now);
        jobs.insert(id, JobSlot::Armed(job));

        log::info!(
            "[SCHEDULE] Reminder moved to {}. [reminder_id = {}]",
            format_fire_at(fire_at.instant()),
            id
        );

        Ok(reminder)
    }

    /// Arms every Pending reminder that has no job yet. Holding the table
    /// lock across the read keeps a finishing dispatch from being armed again.
    async fn reconcile(self: &Arc<Self>) -> Result<ReconcileReport, SchedulingError> {
        let mut jobs = self.jobs.lock().await;
        let pending = self.store_call(self.storage.load_all_pending()).await?;
        let now = self.clock.now();

        let mut report = ReconcileReport::default();
        for reminder in pending {
            if jobs.contains_key(&reminder.id) {
                report.already_armed += 1;
                continue;
            }

            if *reminder.fire_at.instant() <= now {
                log::warn!(
                    "Reminder was missed while offline, firing now. [reminder_id = {}, due = {}]",
                    reminder.id,
                    format_fire_at(reminder.fire_at.instant())
                );
                report.overdue += 1;
            }

            let id = reminder.id;
            let job = self.arm(reminder, now);
            jobs.insert(id, JobSlot::Armed(job));
            report.armed += 1;
        }

        Ok(report)
    }

    fn arm(self: &Arc<Self>, reminder: Reminder, now: DateTime<Utc>) -> ScheduledJob {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let delay = delay_until(&reminder.fire_at, now);

        let cancellation_token = CancellationToken::new();
        let task_cancellation_token = cancellation_token.child_token();
        let core = Arc::clone(self);

        log::debug!(
            "Sleeping for {:?} delay. [reminder_id = {}, generation = {}]",
            delay,
            reminder.id,
            generation
        );

        let task_handle = task::spawn(async move {
            if wait_for_fire_time(task_cancellation_token, delay).await {
                core.on_fire(reminder, generation).await;
            } else {
                log::debug!("Timer disarmed. [reminder_id = {}]", reminder.id);
            }
        });

        ScheduledJob::new(generation, task_handle, cancellation_token)
    }

    /// Called by the timer task. A wake-up whose generation no longer matches
    /// the armed job is dropped.
    async fn on_fire(&self, reminder: Reminder, generation: u64) {
        let id = reminder.id;
        {
            let mut jobs = self.jobs.lock().await;
            let current = matches!(
                jobs.get(&id),
                Some(JobSlot::Armed(job)) if job.generation == generation
            );
            if !current {
                log::debug!("Ignoring stale wake-up. [reminder_id = {id}, generation = {generation}]");
                return;
            }
            jobs.insert(id, JobSlot::Dispatching);
        }

        if let Some(reminder) = self.load_if_pending(id).await {
            log::info!(
                "[FIRE] Reminder is due. [reminder_id = {}, task_id = {}, generation = {}]",
                id,
                reminder.task_id,
                generation
            );
            let report = self.executor.dispatch(&reminder).await;
            self.record_outcome(id, report.terminal_status()).await;
        }

        self.jobs.lock().await.remove(&id);
    }

    async fn load_if_pending(&self, id: ReminderId) -> Option<Reminder> {
        match self.store_call(self.storage.get(id)).await {
            Ok(Some(reminder)) if reminder.is_pending() => Some(reminder),
            Ok(Some(reminder)) => {
                log::info!(
                    "Reminder is already {}, not delivering it. [reminder_id = {id}]",
                    reminder.status
                );
                None
            }
            Ok(None) => {
                log::info!("Reminder was deleted before it fired. [reminder_id = {id}]");
                None
            }
            Err(error) => {
                log::warn!("Leaving reminder for the next sweep: {error}. [reminder_id = {id}]");
                None
            }
        }
    }

    async fn record_outcome(&self, id: ReminderId, status: ReminderStatus) {
        for attempt in 1..=RECORD_ATTEMPTS {
            match self.store_call(self.storage.mark_status(id, status)).await {
                Ok(StatusChange::Applied) => {
                    log::info!("Reminder marked {status}. [reminder_id = {id}]");
                    return;
                }
                Ok(StatusChange::Unchanged(current)) => {
                    log::warn!(
                        "Reminder was already {current}, dropping outcome {status}. [reminder_id = {id}]"
                    );
                    return;
                }
                Err(error) => {
                    if let Ok(None) = self.store_call(self.storage.get(id)).await {
                        log::info!(
                            "Reminder was deleted while being delivered, dropping outcome {status}. [reminder_id = {id}]"
                        );
                        return;
                    }
                    log::error!(
                        "Could not record outcome {status} (attempt {attempt}/{RECORD_ATTEMPTS}): {error}. [reminder_id = {id}]"
                    );
                    if attempt < RECORD_ATTEMPTS {
                        time::sleep(RECORD_BACKOFF).await;
                    }
                }
            }
        }
    }
}
