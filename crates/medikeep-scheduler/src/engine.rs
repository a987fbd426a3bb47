use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use chrono::{DateTime, Timelike, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::{
    error::{Result, SchedulerError},
    job::{BackupJob, JobOutcome, Notifier, Trigger},
    schedule::next_occurrence_of,
    state::StateStore,
    types::{SchedulePatch, ScheduleState, StatusSnapshot},
};

/// Drives the daily backup: polls the clock, fires the registered job at most
/// once per calendar day, persists bookkeeping after every attempt.
///
/// One instance per process, shared via `Arc` by the HTTP handlers and the
/// tick task.
pub struct AutoScheduler {
    store: Arc<dyn StateStore>,
    notifier: Option<Arc<dyn Notifier>>,
    state: Mutex<ScheduleState>,
    job: RwLock<Option<Arc<dyn BackupJob>>>,
    /// Shutdown sender for the running tick task; `None` while stopped.
    ticker: Mutex<Option<watch::Sender<bool>>>,
    check_interval: Duration,
}

impl AutoScheduler {
    /// Load persisted state (defaults when absent or corrupt) and build the
    /// scheduler. `next_run_at` is recomputed unconditionally: a persisted
    /// value only disagrees after downtime crossed the fire instant, and then
    /// it must advance anyway.
    pub fn new(
        store: Arc<dyn StateStore>,
        notifier: Option<Arc<dyn Notifier>>,
        check_interval: Duration,
    ) -> Self {
        let now = Utc::now();
        let mut state = store.load().unwrap_or_else(|| ScheduleState::bootstrap(now));
        if let Some(next) = next_occurrence_of(state.fire_time, &state.timezone, now) {
            state.next_run_at = next;
        }
        info!(
            enabled = state.enabled,
            fire_time = %state.fire_time,
            timezone = %state.timezone,
            next_run = %state.next_run_at,
            "schedule state loaded"
        );
        Self {
            store,
            notifier,
            state: Mutex::new(state),
            job: RwLock::new(None),
            ticker: Mutex::new(None),
            check_interval,
        }
    }

    /// Register the backup job. Replaces any previous registration; the
    /// scheduler holds at most one.
    pub fn set_job(&self, job: Arc<dyn BackupJob>) {
        *self.job.write().unwrap() = Some(job);
    }

    /// Begin periodic checking. Idempotent: a second call while running is a
    /// no-op, so duplicate tick tasks cannot exist. Does not itself fire.
    pub fn start(self: &Arc<Self>) {
        let mut ticker = self.ticker.lock().unwrap();
        if ticker.is_some() {
            debug!("backup scheduler already running");
            return;
        }
        let (shutdown_tx, mut shutdown) = watch::channel(false);
        *ticker = Some(shutdown_tx);

        let scheduler = Arc::clone(self);
        let interval = self.check_interval;
        tokio::spawn(async move {
            info!(interval_secs = interval.as_secs(), "backup scheduler started");
            let mut tick = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = tick.tick() => {
                        scheduler.check_at(Utc::now());
                    }
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            info!("backup scheduler stopped");
                            break;
                        }
                    }
                }
            }
        });
    }

    /// Cancel periodic checking. In-flight invocations run to completion and
    /// manual operations keep working.
    pub fn stop(&self) {
        let mut ticker = self.ticker.lock().unwrap();
        if let Some(shutdown_tx) = ticker.take() {
            let _ = shutdown_tx.send(true);
        }
    }

    pub fn is_running(&self) -> bool {
        self.ticker.lock().unwrap().is_some()
    }

    /// One periodic check against the given instant. Fires when the local
    /// HH:MM matches the fire time, no attempt started on the same local day
    /// yet, and the schedule is enabled.
    ///
    /// Returns the handle of the spawned invocation when a fire was decided;
    /// the tick loop ignores it, tests await it.
    pub fn check_at(self: &Arc<Self>, now: DateTime<Utc>) -> Option<JoinHandle<()>> {
        // Job handle first: lock order (job, then state) matches run_now.
        let job = self.job.read().unwrap().clone();

        let mut state = self.state.lock().unwrap();
        if !state.enabled {
            return None;
        }
        let local = state.timezone.to_local(now);
        if local.hour() != state.fire_time.hour as u32
            || local.minute() != state.fire_time.minute as u32
        {
            return None;
        }
        if let Some(last) = state.last_run_at {
            if state.timezone.to_local(last).date() == local.date() {
                debug!("backup already ran today, skipping");
                return None;
            }
        }
        let Some(job) = job else {
            warn!("fire time reached but no backup job is registered");
            return None;
        };
        // Attempt start recorded before the job runs: a slow job crossing the
        // minute boundary must not register as "not yet run today".
        state.last_run_at = Some(now);
        drop(state);

        info!(started_at = %now, "firing scheduled backup");
        let scheduler = Arc::clone(self);
        Some(tokio::spawn(async move {
            let outcome = scheduler.invoke(job, now, Trigger::Scheduled).await;
            if let Err(e) = scheduler.settle(&outcome) {
                error!("failed to persist schedule state after backup: {e}");
            }
            scheduler.notify(&outcome).await;
        }))
    }

    /// Invoke the backup job immediately, bypassing the time and enabled
    /// gates. Updates `last_run_at` on completion, leaves `next_run_at`
    /// alone. Not serialized against a concurrent scheduled fire; the
    /// same-day guard stops any further automatic attempt.
    pub async fn run_now(&self) -> Result<JobOutcome> {
        let Some(job) = self.job.read().unwrap().clone() else {
            // Immediate failure, no state mutation.
            let now = Utc::now();
            return Ok(JobOutcome {
                trigger: Trigger::Manual,
                success: false,
                error: Some("no backup job configured".to_string()),
                artifact: None,
                started_at: now,
                finished_at: now,
            });
        };
        info!("manual backup run requested");
        let outcome = self.invoke(job, Utc::now(), Trigger::Manual).await;
        let persisted = self.settle(&outcome);
        self.notify(&outcome).await;
        persisted?;
        Ok(outcome)
    }

    /// Merge a partial update, recompute `next_run_at`, persist, and adjust
    /// the ticker on enabled transitions. Returns the new `next_run_at`.
    ///
    /// A rejected patch leaves the state untouched. A failed persist keeps
    /// the in-memory update and surfaces the store error.
    pub fn update_schedule(self: &Arc<Self>, patch: SchedulePatch) -> Result<DateTime<Utc>> {
        let now = Utc::now();
        let (snapshot, was_enabled) = {
            let mut state = self.state.lock().unwrap();
            let was_enabled = state.enabled;
            let mut updated = state.clone();
            if let Some(enabled) = patch.enabled {
                updated.enabled = enabled;
            }
            if let Some(fire_time) = patch.fire_time {
                updated.fire_time = fire_time;
            }
            if let Some(timezone) = patch.timezone {
                updated.timezone = timezone;
            }
            updated.next_run_at = next_occurrence_of(updated.fire_time, &updated.timezone, now)
                .ok_or_else(|| {
                    SchedulerError::Config(format!(
                        "fire time {} has no upcoming occurrence in {}",
                        updated.fire_time, updated.timezone
                    ))
                })?;
            *state = updated.clone();
            (updated, was_enabled)
        };

        info!(
            enabled = snapshot.enabled,
            fire_time = %snapshot.fire_time,
            timezone = %snapshot.timezone,
            next_run = %snapshot.next_run_at,
            "schedule updated"
        );
        if snapshot.enabled && !was_enabled {
            self.start();
        } else if !snapshot.enabled && was_enabled {
            self.stop();
        }
        self.store.save(&snapshot)?;
        Ok(snapshot.next_run_at)
    }

    /// Read-only snapshot for "next backup in …" displays. Computed, never
    /// stored.
    pub fn status(&self) -> StatusSnapshot {
        let state = self.state.lock().unwrap().clone();
        let now = Utc::now();
        StatusSnapshot {
            running: self.is_running(),
            enabled: state.enabled,
            next_run_at: state.next_run_at,
            last_run_at: state.last_run_at,
            time_until_next_secs: (state.next_run_at - now).num_seconds().max(0),
        }
    }

    /// Current schedule state (wire shape) for the settings screen.
    pub fn schedule(&self) -> ScheduleState {
        self.state.lock().unwrap().clone()
    }

    // --- private helpers ---------------------------------------------------

    /// Run one attempt to completion and shape the outcome. Job errors become
    /// failed outcomes, never panics into the caller.
    async fn invoke(
        &self,
        job: Arc<dyn BackupJob>,
        started_at: DateTime<Utc>,
        trigger: Trigger,
    ) -> JobOutcome {
        let result = job.run().await;
        let finished_at = Utc::now();
        match result {
            Ok(artifact) => {
                info!(
                    %trigger,
                    filename = %artifact.filename,
                    size = artifact.size,
                    duration_ms = (finished_at - started_at).num_milliseconds(),
                    "backup completed"
                );
                JobOutcome {
                    trigger,
                    success: true,
                    error: None,
                    artifact: Some(artifact),
                    started_at,
                    finished_at,
                }
            }
            Err(e) => {
                error!(%trigger, "backup failed: {e:#}");
                JobOutcome {
                    trigger,
                    success: false,
                    error: Some(format!("{e:#}")),
                    artifact: None,
                    started_at,
                    finished_at,
                }
            }
        }
    }

    /// Post-settlement bookkeeping: `last_run_at` from the attempt start, a
    /// fresh `next_run_at` for scheduled fires, then persist. State is only
    /// persisted once the outcome is known.
    fn settle(&self, outcome: &JobOutcome) -> Result<()> {
        let snapshot = {
            let mut state = self.state.lock().unwrap();
            state.last_run_at = Some(outcome.started_at);
            if outcome.trigger == Trigger::Scheduled {
                match next_occurrence_of(state.fire_time, &state.timezone, outcome.started_at) {
                    Some(next) => state.next_run_at = next,
                    None => warn!("no next occurrence found, keeping previous next run"),
                }
            }
            state.clone()
        };
        self.store.save(&snapshot)
    }

    async fn notify(&self, outcome: &JobOutcome) {
        if let Some(notifier) = &self.notifier {
            notifier.record(outcome).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::BackupArtifact;
    use crate::types::Timezone;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct MemoryStore {
        loaded: Option<ScheduleState>,
        fail_writes: bool,
        saved: Mutex<Vec<ScheduleState>>,
    }

    impl MemoryStore {
        fn empty() -> Arc<Self> {
            Arc::new(Self {
                loaded: None,
                fail_writes: false,
                saved: Mutex::new(Vec::new()),
            })
        }

        fn with_state(state: ScheduleState) -> Arc<Self> {
            Arc::new(Self {
                loaded: Some(state),
                fail_writes: false,
                saved: Mutex::new(Vec::new()),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                loaded: None,
                fail_writes: true,
                saved: Mutex::new(Vec::new()),
            })
        }

        fn save_count(&self) -> usize {
            self.saved.lock().unwrap().len()
        }

        fn last_saved(&self) -> Option<ScheduleState> {
            self.saved.lock().unwrap().last().cloned()
        }
    }

    impl StateStore for MemoryStore {
        fn load(&self) -> Option<ScheduleState> {
            self.loaded.clone()
        }

        fn save(&self, state: &ScheduleState) -> Result<()> {
            if self.fail_writes {
                return Err(SchedulerError::Store("write failed".to_string()));
            }
            self.saved.lock().unwrap().push(state.clone());
            Ok(())
        }
    }

    struct CountingJob {
        runs: AtomicUsize,
        fail: bool,
    }

    impl CountingJob {
        fn succeeding() -> Arc<Self> {
            Arc::new(Self {
                runs: AtomicUsize::new(0),
                fail: false,
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                runs: AtomicUsize::new(0),
                fail: true,
            })
        }

        fn run_count(&self) -> usize {
            self.runs.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl BackupJob for CountingJob {
        async fn run(&self) -> anyhow::Result<BackupArtifact> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("network error");
            }
            Ok(BackupArtifact {
                filename: "backup-20260823-230000.json".to_string(),
                size: 2048,
                download_url: "https://github.example/backup-20260823-230000.json".to_string(),
            })
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        outcomes: Mutex<Vec<JobOutcome>>,
    }

    impl RecordingNotifier {
        fn recorded(&self) -> Vec<JobOutcome> {
            self.outcomes.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn record(&self, outcome: &JobOutcome) {
            self.outcomes.lock().unwrap().push(outcome.clone());
        }
    }

    fn scheduler_with(
        store: Arc<MemoryStore>,
        notifier: Option<Arc<RecordingNotifier>>,
    ) -> Arc<AutoScheduler> {
        Arc::new(AutoScheduler::new(
            store,
            notifier.map(|n| n as Arc<dyn Notifier>),
            Duration::from_secs(30),
        ))
    }

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[tokio::test]
    async fn no_fire_before_the_minute() {
        let store = MemoryStore::empty();
        let scheduler = scheduler_with(Arc::clone(&store), None);
        let job = CountingJob::succeeding();
        scheduler.set_job(job.clone());

        assert!(scheduler.check_at(utc(2026, 8, 23, 22, 59)).is_none());
        assert_eq!(job.run_count(), 0);
        assert_eq!(store.save_count(), 0);
    }

    #[tokio::test]
    async fn scheduled_fire_updates_bookkeeping() {
        let store = MemoryStore::empty();
        let notifier = Arc::new(RecordingNotifier::default());
        let scheduler = scheduler_with(Arc::clone(&store), Some(notifier.clone()));
        let job = CountingJob::succeeding();
        scheduler.set_job(job.clone());

        let fired_at = utc(2026, 8, 23, 23, 0);
        let handle = scheduler.check_at(fired_at).unwrap();
        handle.await.unwrap();

        assert_eq!(job.run_count(), 1);
        let saved = store.last_saved().unwrap();
        assert_eq!(saved.last_run_at, Some(fired_at));
        assert_eq!(saved.next_run_at, utc(2026, 8, 24, 23, 0));

        let recorded = notifier.recorded();
        assert_eq!(recorded.len(), 1);
        assert!(recorded[0].success);
        assert_eq!(recorded[0].trigger, Trigger::Scheduled);
        assert!(recorded[0].artifact.is_some());
    }

    #[tokio::test]
    async fn same_day_guard_blocks_a_second_fire() {
        let store = MemoryStore::empty();
        let scheduler = scheduler_with(Arc::clone(&store), None);
        let job = CountingJob::succeeding();
        scheduler.set_job(job.clone());

        let handle = scheduler.check_at(utc(2026, 8, 23, 23, 0)).unwrap();
        handle.await.unwrap();
        assert_eq!(job.run_count(), 1);

        // Later check inside the same fire minute, same day: suppressed.
        assert!(scheduler.check_at(utc(2026, 8, 23, 23, 0)).is_none());
        assert_eq!(job.run_count(), 1);

        // Next day fires again.
        let handle = scheduler.check_at(utc(2026, 8, 24, 23, 0)).unwrap();
        handle.await.unwrap();
        assert_eq!(job.run_count(), 2);
    }

    #[tokio::test]
    async fn disabled_scheduler_never_fires() {
        let now = Utc::now();
        let mut seed = ScheduleState::bootstrap(now);
        seed.enabled = false;
        let store = MemoryStore::with_state(seed);
        let scheduler = scheduler_with(Arc::clone(&store), None);
        let job = CountingJob::succeeding();
        scheduler.set_job(job.clone());

        assert!(scheduler.check_at(utc(2026, 8, 23, 23, 0)).is_none());
        assert_eq!(job.run_count(), 0);
    }

    #[tokio::test]
    async fn run_now_bypasses_enabled_gate_and_keeps_next_run() {
        let now = Utc::now();
        let mut seed = ScheduleState::bootstrap(now);
        seed.enabled = false;
        let store = MemoryStore::with_state(seed);
        let scheduler = scheduler_with(Arc::clone(&store), None);
        let job = CountingJob::succeeding();
        scheduler.set_job(job.clone());

        let next_before = scheduler.status().next_run_at;
        let outcome = scheduler.run_now().await.unwrap();

        assert!(outcome.success);
        assert_eq!(outcome.trigger, Trigger::Manual);
        assert_eq!(job.run_count(), 1);
        let status = scheduler.status();
        assert!(status.last_run_at.is_some());
        assert_eq!(status.next_run_at, next_before);
        assert!(!status.enabled);
        assert_eq!(store.save_count(), 1);
    }

    #[tokio::test]
    async fn failed_job_records_failure_and_advances_last_run() {
        let store = MemoryStore::empty();
        let notifier = Arc::new(RecordingNotifier::default());
        let scheduler = scheduler_with(Arc::clone(&store), Some(notifier.clone()));
        scheduler.set_job(CountingJob::failing());

        let fired_at = utc(2026, 8, 23, 23, 0);
        let handle = scheduler.check_at(fired_at).unwrap();
        handle.await.unwrap();

        let recorded = notifier.recorded();
        assert_eq!(recorded.len(), 1);
        assert!(!recorded[0].success);
        assert!(recorded[0].error.as_deref().unwrap().contains("network error"));

        // No same-day retry: the attempt still counts.
        assert_eq!(scheduler.status().last_run_at, Some(fired_at));
        assert!(scheduler.check_at(utc(2026, 8, 23, 23, 0)).is_none());
    }

    #[tokio::test]
    async fn run_now_without_job_reports_not_configured() {
        let store = MemoryStore::empty();
        let notifier = Arc::new(RecordingNotifier::default());
        let scheduler = scheduler_with(Arc::clone(&store), Some(notifier.clone()));

        let outcome = scheduler.run_now().await.unwrap();
        assert!(!outcome.success);
        assert!(outcome.error.as_deref().unwrap().contains("configured"));
        // Not-configured mutates nothing and records nothing.
        assert!(scheduler.status().last_run_at.is_none());
        assert_eq!(store.save_count(), 0);
        assert!(notifier.recorded().is_empty());
    }

    #[tokio::test]
    async fn update_fire_time_recomputes_next_run() {
        let store = MemoryStore::empty();
        let scheduler = scheduler_with(Arc::clone(&store), None);

        let before = Utc::now();
        let next = scheduler
            .update_schedule(SchedulePatch {
                fire_time: Some("07:30".parse().unwrap()),
                ..Default::default()
            })
            .unwrap();

        assert!(next > before);
        assert!(next - before <= chrono::Duration::days(1));
        let saved = store.last_saved().unwrap();
        assert_eq!(saved.fire_time.to_string(), "07:30");
        assert_eq!(saved.next_run_at, next);
        assert_eq!(scheduler.status().next_run_at, next);
    }

    #[tokio::test]
    async fn disable_then_enable_recomputes_and_restarts() {
        let store = MemoryStore::empty();
        let scheduler = scheduler_with(Arc::clone(&store), None);

        scheduler
            .update_schedule(SchedulePatch {
                enabled: Some(false),
                ..Default::default()
            })
            .unwrap();
        assert!(!scheduler.is_running());
        assert!(!scheduler.status().enabled);

        let before = Utc::now();
        let next = scheduler
            .update_schedule(SchedulePatch {
                enabled: Some(true),
                ..Default::default()
            })
            .unwrap();
        assert!(scheduler.is_running());
        assert!(next > before);
        assert!(next - before <= chrono::Duration::days(1));

        scheduler.stop();
        assert!(!scheduler.is_running());
    }

    #[tokio::test]
    async fn write_failure_reaches_caller_but_keeps_memory_state() {
        let store = MemoryStore::failing();
        let notifier = Arc::new(RecordingNotifier::default());
        let scheduler = scheduler_with(store, Some(notifier.clone()));
        scheduler.set_job(CountingJob::succeeding());

        let err = scheduler.run_now().await.unwrap_err();
        assert!(matches!(err, SchedulerError::Store(_)));
        // In-memory bookkeeping survives the failed write.
        assert!(scheduler.status().last_run_at.is_some());
        assert_eq!(notifier.recorded().len(), 1);
    }

    #[tokio::test]
    async fn stale_persisted_next_run_is_recomputed_on_load() {
        let stale = ScheduleState {
            enabled: true,
            fire_time: "23:00".parse().unwrap(),
            timezone: Timezone::Utc,
            last_run_at: Some(utc(2020, 1, 1, 23, 0)),
            next_run_at: utc(2020, 1, 2, 23, 0),
        };
        let store = MemoryStore::with_state(stale);
        let scheduler = scheduler_with(store, None);

        let status = scheduler.status();
        let now = Utc::now();
        assert!(status.next_run_at > now);
        assert!(status.next_run_at - now <= chrono::Duration::days(1));
        assert!(status.time_until_next_secs >= 0);
    }

    #[tokio::test]
    async fn start_is_idempotent_and_stop_unwinds() {
        let scheduler = scheduler_with(MemoryStore::empty(), None);
        scheduler.start();
        scheduler.start();
        assert!(scheduler.is_running());
        scheduler.stop();
        assert!(!scheduler.is_running());
        scheduler.stop();
    }
}
