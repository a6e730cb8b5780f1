//! Auto-checkout scheduler
//!
//! Closes every open visit of the target category once per local calendar day at
//! the configured cutoff. Ticks that find an execution in flight are skipped;
//! manual runs wait for it. Store failures never escape: they are logged, counted
//! and reported as [`TickResult::Deferred`].

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, FixedOffset};
use tokio::sync::{broadcast, watch};
use tokio::time::MissedTickBehavior;

use super::tick::{TickConfig, TickResult, TickState};
use crate::clock::Clock;
use crate::domain::{CheckoutEvent, CheckoutTrigger};
use crate::error::Result;
use crate::store::VisitStore;

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Daily bulk checkout driver
pub struct AutoCheckoutScheduler<S: VisitStore + ?Sized> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    config: TickConfig,
    state: Mutex<TickState>,
    /// Held for the whole gate check, bulk close and date stamp
    executing: tokio::sync::Mutex<()>,
    event_tx: broadcast::Sender<CheckoutEvent>,
}

impl<S: VisitStore + ?Sized> AutoCheckoutScheduler<S> {
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>, config: TickConfig) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            store,
            clock,
            config,
            state: Mutex::new(TickState::new()),
            executing: tokio::sync::Mutex::new(()),
            event_tx,
        }
    }

    pub fn config(&self) -> &TickConfig {
        &self.config
    }

    /// Get a receiver for checkout events
    pub fn subscribe(&self) -> broadcast::Receiver<CheckoutEvent> {
        self.event_tx.subscribe()
    }

    /// Snapshot of the tick state
    pub fn state(&self) -> TickState {
        self.lock_state().clone()
    }

    fn lock_state(&self) -> MutexGuard<'_, TickState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// One periodic check. Runs the bulk close when the gate is open.
    pub async fn tick(&self) -> TickResult {
        let Ok(_guard) = self.executing.try_lock() else {
            self.lock_state().skip();
            log::debug!("Auto-checkout tick skipped: execution in flight");
            return TickResult::Busy;
        };

        let now = self.clock.now();
        let today = now.date_naive();
        {
            let mut state = self.lock_state();
            state.tick();
            if !self.config.should_execute(now.time(), today, state.last_run_date) {
                return TickResult::Idle;
            }
        }

        match self.execute(CheckoutTrigger::Scheduled, now).await {
            Ok(count) => {
                self.lock_state().stamp(today);
                TickResult::Executed(count)
            }
            Err(e) => TickResult::Deferred(e.to_string()),
        }
    }

    /// Run the bulk close immediately, bypassing the cutoff gate.
    ///
    /// Waits for an in-flight execution to finish first. Today's date is stamped
    /// only when `stamp_manual_runs` is set.
    pub async fn run_now(&self) -> TickResult {
        let _guard = self.executing.lock().await;
        let now = self.clock.now();

        match self.execute(CheckoutTrigger::Manual, now).await {
            Ok(count) => {
                if self.config.stamp_manual_runs {
                    self.lock_state().stamp(now.date_naive());
                }
                TickResult::Executed(count)
            }
            Err(e) => TickResult::Deferred(e.to_string()),
        }
    }

    /// Tick on the configured interval until `shutdown` flips to true or its sender
    /// is dropped.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.config.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        log::info!(
            "Auto-checkout scheduler started: cutoff {} ({}), category {}, every {:?}",
            self.config.cutoff,
            self.config.policy,
            self.config.target_category,
            self.config.tick_interval
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.tick().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        log::info!("Auto-checkout scheduler stopped");
    }

    async fn execute(&self, trigger: CheckoutTrigger, now: DateTime<FixedOffset>) -> Result<usize> {
        let category = self.config.target_category;
        let executed_at = now.to_utc();

        match self.store.bulk_close_open_visits(category, executed_at).await {
            Ok(count) => {
                self.lock_state().executed(count);
                tracing::info!(
                    count,
                    category = %category,
                    date = %now.date_naive(),
                    trigger = ?trigger,
                    "Auto-checkout executed"
                );
                let event = CheckoutEvent {
                    trigger,
                    category,
                    count,
                    executed_at,
                };
                // No subscribers is fine
                let _ = self.event_tx.send(event);
                Ok(count)
            }
            Err(e) => {
                self.lock_state().failed();
                tracing::warn!(
                    error = %e,
                    category = %category,
                    date = %now.date_naive(),
                    "Auto-checkout deferred"
                );
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::daemon::tick::TriggerPolicy;
    use crate::domain::{Category, VisitRecord};
    use crate::error::VisitrackError;
    use async_trait::async_trait;
    use chrono::{Duration, Utc};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration as StdDuration;

    /// Records bulk close calls; optionally fails or stalls
    #[derive(Default)]
    struct CountingStore {
        calls: AtomicUsize,
        fail: AtomicBool,
        delay: Option<StdDuration>,
        closed: Mutex<Vec<(Category, DateTime<Utc>)>>,
    }

    #[async_trait]
    impl VisitStore for CountingStore {
        async fn list_open_visits(&self, _category: Category) -> Result<Vec<VisitRecord>> {
            Ok(Vec::new())
        }

        async fn bulk_close_open_visits(&self, category: Category, close_time: DateTime<Utc>) -> Result<usize> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail.load(Ordering::SeqCst) {
                return Err(VisitrackError::StoreUnavailable("connection refused".to_string()));
            }
            self.closed.lock().unwrap().push((category, close_time));
            Ok(3)
        }

        async fn create_visit(&self, visit: &VisitRecord) -> Result<VisitRecord> {
            Ok(visit.clone())
        }

        async fn get_visit(&self, _id: &str) -> Result<Option<VisitRecord>> {
            Ok(None)
        }

        async fn close_visit(&self, id: &str, _close_time: DateTime<Utc>) -> Result<VisitRecord> {
            Err(VisitrackError::VisitNotFound(id.to_string()))
        }

        async fn list_visits(&self, _category: Option<Category>) -> Result<Vec<VisitRecord>> {
            Ok(Vec::new())
        }
    }

    fn at(s: &str) -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339(s).unwrap()
    }

    fn create_test_scheduler(
        store: CountingStore,
        start: &str,
        config: TickConfig,
    ) -> (AutoCheckoutScheduler<CountingStore>, Arc<CountingStore>, Arc<ManualClock>) {
        let store = Arc::new(store);
        let clock = Arc::new(ManualClock::new(at(start)));
        let scheduler = AutoCheckoutScheduler::new(store.clone(), clock.clone(), config);
        (scheduler, store, clock)
    }

    #[tokio::test]
    async fn test_idle_before_cutoff() {
        let (scheduler, store, _clock) =
            create_test_scheduler(CountingStore::default(), "2025-03-02T00:59:00+09:00", TickConfig::default());
        assert_eq!(scheduler.tick().await, TickResult::Idle);
        assert_eq!(store.calls.load(Ordering::SeqCst), 0);
        assert_eq!(scheduler.state().tick_count, 1);
    }

    #[tokio::test]
    async fn test_executes_at_cutoff_with_execution_timestamp() {
        let (scheduler, store, clock) =
            create_test_scheduler(CountingStore::default(), "2025-03-02T01:00:00+09:00", TickConfig::default());
        let mut events = scheduler.subscribe();

        assert_eq!(scheduler.tick().await, TickResult::Executed(3));

        let closed = store.closed.lock().unwrap().clone();
        assert_eq!(closed, vec![(Category::Factory, clock.now_utc())]);
        assert_eq!(
            scheduler.state().last_run_date,
            Some(clock.now().date_naive())
        );

        let event = events.try_recv().unwrap();
        assert_eq!(event.trigger, CheckoutTrigger::Scheduled);
        assert_eq!(event.count, 3);
        assert_eq!(event.executed_at, clock.now_utc());
    }

    #[tokio::test]
    async fn test_already_ran_today_makes_no_call() {
        let (scheduler, store, clock) =
            create_test_scheduler(CountingStore::default(), "2025-03-02T01:00:00+09:00", TickConfig::default());
        scheduler.tick().await;
        assert_eq!(store.calls.load(Ordering::SeqCst), 1);

        clock.advance(Duration::seconds(30));
        assert_eq!(scheduler.tick().await, TickResult::Idle);
        assert_eq!(store.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_at_most_once_per_day_with_sub_minute_ticks() {
        let config = TickConfig::default().with_tick_interval(StdDuration::from_secs(10));
        let (scheduler, store, clock) =
            create_test_scheduler(CountingStore::default(), "2025-03-02T00:59:00+09:00", config);

        // Two days of ticks every 10 seconds
        for _ in 0..(2 * 24 * 60 * 6) {
            scheduler.tick().await;
            clock.advance(Duration::seconds(10));
        }
        assert_eq!(store.calls.load(Ordering::SeqCst), 2);
        assert_eq!(scheduler.state().executions, 2);
    }

    #[tokio::test]
    async fn test_failure_does_not_stamp_date() {
        let store = CountingStore::default();
        store.fail.store(true, Ordering::SeqCst);
        let (scheduler, store, clock) =
            create_test_scheduler(store, "2025-03-02T01:00:00+09:00", TickConfig::default());

        assert!(matches!(scheduler.tick().await, TickResult::Deferred(_)));
        assert_eq!(scheduler.state().last_run_date, None);
        assert_eq!(scheduler.state().failures, 1);

        // Retried on the next tick inside the cutoff minute
        store.fail.store(false, Ordering::SeqCst);
        clock.advance(Duration::seconds(20));
        assert_eq!(scheduler.tick().await, TickResult::Executed(3));
        assert_eq!(store.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_exact_minute_missed_window_waits_for_tomorrow() {
        let store = CountingStore::default();
        store.fail.store(true, Ordering::SeqCst);
        let (scheduler, store, clock) =
            create_test_scheduler(store, "2025-03-02T01:00:00+09:00", TickConfig::default());
        scheduler.tick().await;

        store.fail.store(false, Ordering::SeqCst);
        clock.set(at("2025-03-02T09:00:00+09:00"));
        assert_eq!(scheduler.tick().await, TickResult::Idle);

        clock.set(at("2025-03-03T01:00:10+09:00"));
        assert_eq!(scheduler.tick().await, TickResult::Executed(3));
    }

    #[tokio::test]
    async fn test_catch_up_retries_later_same_day() {
        let store = CountingStore::default();
        store.fail.store(true, Ordering::SeqCst);
        let config = TickConfig::default().with_policy(TriggerPolicy::CatchUp);
        let (scheduler, store, clock) = create_test_scheduler(store, "2025-03-02T01:00:00+09:00", config);
        scheduler.tick().await;

        store.fail.store(false, Ordering::SeqCst);
        clock.set(at("2025-03-02T09:00:00+09:00"));
        assert_eq!(scheduler.tick().await, TickResult::Executed(3));

        clock.advance(Duration::hours(1));
        assert_eq!(scheduler.tick().await, TickResult::Idle);
    }

    #[tokio::test]
    async fn test_manual_run_does_not_stamp_by_default() {
        let (scheduler, store, _clock) =
            create_test_scheduler(CountingStore::default(), "2025-03-02T01:00:00+09:00", TickConfig::default());
        let mut events = scheduler.subscribe();

        assert_eq!(scheduler.run_now().await, TickResult::Executed(3));
        assert_eq!(scheduler.state().last_run_date, None);
        assert_eq!(events.try_recv().unwrap().trigger, CheckoutTrigger::Manual);

        // The scheduled run still happens
        assert_eq!(scheduler.tick().await, TickResult::Executed(3));
        assert_eq!(store.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_manual_run_stamps_when_configured() {
        let config = TickConfig::default().with_stamp_manual_runs(true);
        let (scheduler, store, _clock) =
            create_test_scheduler(CountingStore::default(), "2025-03-02T01:00:00+09:00", config);

        scheduler.run_now().await;
        assert_eq!(scheduler.tick().await, TickResult::Idle);
        assert_eq!(store.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_manual_run_failure_is_deferred() {
        let store = CountingStore::default();
        store.fail.store(true, Ordering::SeqCst);
        let (scheduler, _store, _clock) =
            create_test_scheduler(store, "2025-03-02T13:00:00+09:00", TickConfig::default());
        assert!(matches!(scheduler.run_now().await, TickResult::Deferred(_)));
    }

    #[tokio::test]
    async fn test_tick_skipped_while_executing() {
        let store = CountingStore {
            delay: Some(StdDuration::from_millis(200)),
            ..Default::default()
        };
        let (scheduler, store, _clock) =
            create_test_scheduler(store, "2025-03-02T01:00:00+09:00", TickConfig::default());
        let scheduler = Arc::new(scheduler);

        let first = {
            let scheduler = scheduler.clone();
            tokio::spawn(async move { scheduler.tick().await })
        };
        tokio::time::sleep(StdDuration::from_millis(50)).await;

        assert_eq!(scheduler.tick().await, TickResult::Busy);
        assert_eq!(first.await.unwrap(), TickResult::Executed(3));
        assert_eq!(store.calls.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.state().skipped, 1);
    }

    #[tokio::test]
    async fn test_manual_run_waits_for_execution() {
        let store = CountingStore {
            delay: Some(StdDuration::from_millis(100)),
            ..Default::default()
        };
        let (scheduler, store, _clock) =
            create_test_scheduler(store, "2025-03-02T01:00:00+09:00", TickConfig::default());
        let scheduler = Arc::new(scheduler);

        let first = {
            let scheduler = scheduler.clone();
            tokio::spawn(async move { scheduler.tick().await })
        };
        tokio::time::sleep(StdDuration::from_millis(20)).await;

        assert_eq!(scheduler.run_now().await, TickResult::Executed(3));
        assert_eq!(first.await.unwrap(), TickResult::Executed(3));
        assert_eq!(store.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_on_shutdown() {
        let (scheduler, store, _clock) = create_test_scheduler(
            CountingStore::default(),
            "2025-03-02T01:00:00+09:00",
            TickConfig::default().with_tick_interval(StdDuration::from_secs(1)),
        );
        let scheduler = Arc::new(scheduler);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = {
            let scheduler = scheduler.clone();
            tokio::spawn(async move { scheduler.run(shutdown_rx).await })
        };
        tokio::time::sleep(StdDuration::from_millis(3500)).await;
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();

        // First tick fires immediately; the cutoff minute never changes on a manual clock
        assert_eq!(store.calls.load(Ordering::SeqCst), 1);
        assert!(scheduler.state().tick_count >= 3);
    }
}
