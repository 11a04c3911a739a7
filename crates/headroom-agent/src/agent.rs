//! The control loop: sample, diff, decide, apply.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::{RwLock, watch};
use tracing::{debug, info, warn};

use headroom_config::{LimitsSection, Tunables};
use headroom_policy::{decide, shrink_target};
use headroom_state::{AdjustmentAction, AdjustmentRecord, HistoryStore, RuntimeCounters};

use crate::publisher::BudgetPublisher;
use crate::source::MetricsSource;

/// Why the wait returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    /// The sampling interval elapsed.
    Timer,
    /// A configuration reload was requested.
    Reload,
    /// Shutdown was requested.
    Shutdown,
}

/// Whether the loop keeps running after a wake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

/// The sizing agent. Owns all loop state; everything else sees only the
/// published [`RuntimeCounters`] snapshot and the history store.
pub struct SizingAgent<M, P> {
    tunables_path: PathBuf,
    tunables: Arc<RwLock<Tunables>>,
    metrics: M,
    publisher: P,
    store: HistoryStore,
    counters: Arc<RwLock<RuntimeCounters>>,
    /// Single-slot token: set right before notifying the service, consumed
    /// at the very next wake so the reload we caused ourselves is not
    /// mistaken for a scheduled or external one.
    suppress_next_wake: bool,
}

impl<M: MetricsSource, P: BudgetPublisher> SizingAgent<M, P> {
    pub fn new(
        tunables_path: impl Into<PathBuf>,
        tunables: Arc<RwLock<Tunables>>,
        metrics: M,
        publisher: P,
        store: HistoryStore,
        counters: Arc<RwLock<RuntimeCounters>>,
    ) -> Self {
        Self {
            tunables_path: tunables_path.into(),
            tunables,
            metrics,
            publisher,
            store,
            counters,
            suppress_next_wake: false,
        }
    }

    /// Run until shutdown.
    ///
    /// The `tokio::select!` below is the loop's single suspension point:
    /// interval elapsed, reload requested, or shutdown, whichever comes
    /// first. Iterations never overlap.
    pub async fn run(
        mut self,
        mut reload: watch::Receiver<()>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        {
            let tunables = self.tunables.read().await;
            info!(
                interval_secs = tunables.agent.interval_secs,
                "sizing agent started"
            );
        }

        loop {
            let interval =
                Duration::from_secs(self.tunables.read().await.agent.interval_secs.max(1));
            let wake = tokio::select! {
                _ = tokio::time::sleep(interval) => Wake::Timer,
                changed = reload.changed() => match changed {
                    Ok(()) => Wake::Reload,
                    // Sender dropped: the daemon is tearing down.
                    Err(_) => Wake::Shutdown,
                },
                _ = shutdown.changed() => Wake::Shutdown,
            };

            if self.handle_wake(wake).await == Flow::Exit {
                break;
            }
        }

        info!("sizing agent stopped");
    }

    /// Dispatch one wake of the loop protocol.
    ///
    /// Split from [`run`](Self::run) so the protocol is drivable in tests
    /// without timers or signals.
    pub async fn handle_wake(&mut self, wake: Wake) -> Flow {
        if wake == Wake::Shutdown {
            info!("sizing agent shutting down");
            return Flow::Exit;
        }

        // The wake right after our own notify is the reload we caused; it
        // must not be diffed against the metrics source or reprocessed.
        if self.suppress_next_wake {
            self.suppress_next_wake = false;
            debug!("consumed self-triggered reload wake");
            return Flow::Continue;
        }

        match wake {
            Wake::Reload => self.reload_tunables().await,
            Wake::Timer => self.cycle().await,
            Wake::Shutdown => unreachable!("handled above"),
        }
        Flow::Continue
    }

    /// Re-read the tunables file after an external reload request.
    async fn reload_tunables(&mut self) {
        match Tunables::from_file(&self.tunables_path) {
            Ok(fresh) => {
                *self.tunables.write().await = fresh;
                info!("tunables reloaded");
            }
            Err(e) => warn!(error = %e, "tunables reload failed; keeping previous values"),
        }
    }

    /// One scheduled sampling cycle.
    async fn cycle(&mut self) {
        let tunables = self.tunables.read().await.clone();
        if !tunables.sizing.enable {
            debug!("auto-sizing disabled, skipping cycle");
            return;
        }

        let mut state = *self.counters.read().await;
        state.last_check_unix = now_unix();

        self.run_window(&tunables, &mut state);
        *self.counters.write().await = state;

        self.prune_history(&tunables);
    }

    /// Sample, diff against the baseline, decide, and maybe apply.
    ///
    /// `state` is committed by the caller; on a persist failure this
    /// returns early without advancing the baseline or quiet streak so the
    /// next cycle recomputes from a consistent base.
    fn run_window(&mut self, tunables: &Tunables, state: &mut RuntimeCounters) {
        let interval_secs = tunables.agent.interval_secs;

        let sample = match self.metrics.sample() {
            Ok(sample) => sample,
            Err(e) => {
                warn!(error = %e, "forced-flush counter unavailable, skipping cycle");
                return;
            }
        };

        let Some(baseline) = state.baseline else {
            state.baseline = Some(sample);
            info!(forced_flushes = sample, "baseline forced-flush count established");
            return;
        };
        let forced = sample.saturating_sub(baseline);

        let current = match self.publisher.current_budget() {
            Ok(current) => current,
            Err(e) => {
                warn!(error = %e, "cannot read current budget, skipping cycle");
                return;
            }
        };

        let sizing = &tunables.sizing;
        if forced >= sizing.threshold {
            // A loud window breaks any quiet streak, applied or not.
            state.quiet_intervals = 0;
            info!(
                forced,
                interval_secs, "detected forced flushes over the last window"
            );
            let decision = decide(current, sizing.ceiling_mb, forced, sizing.threshold);
            if !decision.applied {
                debug!(current_mb = current, "budget already at target, no change");
            } else if let Some(reason) = rate_limited(state, &tunables.limits, now_unix()) {
                warn!(
                    %reason,
                    current_mb = current,
                    wanted_mb = decision.new_budget_mb,
                    "sizing change skipped"
                );
                self.record(
                    AdjustmentAction::Skipped,
                    current,
                    current,
                    forced,
                    interval_secs,
                    Some(reason),
                );
            } else {
                info!(
                    current_mb = current,
                    new_mb = decision.new_budget_mb,
                    "resizing journal budget"
                );
                if let Err(e) = self.apply(decision.new_budget_mb) {
                    warn!(error = %e, "failed to persist new budget, will retry next cycle");
                    return;
                }
                let action = if decision.capped {
                    AdjustmentAction::Capped
                } else {
                    AdjustmentAction::Increase
                };
                self.record(
                    action,
                    current,
                    decision.new_budget_mb,
                    forced,
                    interval_secs,
                    None,
                );
                mark_adjusted(state, now_unix());
            }
        } else {
            let quiet = state.quiet_intervals + 1;
            let shrink = &tunables.shrink;
            let target = shrink_target(current, shrink.factor, shrink.floor_mb);
            let wants_shrink = shrink.enable
                && quiet >= shrink.intervals
                && current > shrink.floor_mb
                && target < current;

            if wants_shrink {
                if let Some(reason) = rate_limited(state, &tunables.limits, now_unix()) {
                    warn!(%reason, current_mb = current, wanted_mb = target, "shrink skipped");
                    self.record(
                        AdjustmentAction::Skipped,
                        current,
                        current,
                        forced,
                        interval_secs,
                        Some(reason),
                    );
                    state.quiet_intervals = quiet;
                } else {
                    info!(
                        current_mb = current,
                        new_mb = target,
                        quiet_intervals = quiet,
                        "shrinking journal budget after sustained quiet"
                    );
                    if let Err(e) = self.apply(target) {
                        warn!(error = %e, "failed to persist shrunk budget, will retry next cycle");
                        return;
                    }
                    self.record(
                        AdjustmentAction::Decrease,
                        current,
                        target,
                        forced,
                        interval_secs,
                        Some(format!("{quiet} quiet intervals")),
                    );
                    mark_adjusted(state, now_unix());
                    state.quiet_intervals = 0;
                }
            } else {
                debug!(quiet_intervals = quiet, "quiet window");
                state.quiet_intervals = quiet;
            }
        }

        state.baseline = Some(sample);
    }

    /// Persist the new budget, arm the suppression token, then notify.
    ///
    /// Ordered so the reload the notify causes lands on the next wait and
    /// is swallowed there. A failed notify is not retried: the persisted
    /// value is durable and the service adopts it on its next reload.
    fn apply(&mut self, budget_mb: u64) -> anyhow::Result<()> {
        self.publisher.publish(budget_mb)?;
        self.suppress_next_wake = true;
        if let Err(e) = self.publisher.notify_reload() {
            warn!(
                error = %e,
                "reload notification failed; the service adopts the new budget on its next reload"
            );
        }
        Ok(())
    }

    fn record(
        &self,
        action: AdjustmentAction,
        old_mb: u64,
        new_mb: u64,
        forced_events: u64,
        interval_secs: u64,
        reason: Option<String>,
    ) {
        let record = AdjustmentRecord {
            unix_ms: now_unix_ms(),
            action,
            old_mb,
            new_mb,
            forced_events,
            interval_secs,
            reason,
        };
        if let Err(e) = self.store.append(&record) {
            warn!(error = %e, "failed to record adjustment history");
        }
    }

    fn prune_history(&self, tunables: &Tunables) {
        let retention_ms = u64::from(tunables.history.retention_days) * 86_400_000;
        let cutoff = now_unix_ms().saturating_sub(retention_ms);
        match self.store.prune_older_than(cutoff) {
            Ok(0) => {}
            Ok(deleted) => debug!(deleted, "pruned adjustment history"),
            Err(e) => warn!(error = %e, "history pruning failed"),
        }
    }
}

/// Reason a warranted change must be declined right now, if any.
fn rate_limited(state: &RuntimeCounters, limits: &LimitsSection, now: i64) -> Option<String> {
    if limits.cooldown_secs > 0 && state.last_adjustment_unix > 0 {
        let until = state
            .last_adjustment_unix
            .saturating_add(limits.cooldown_secs as i64);
        if now < until {
            return Some(format!("cooldown active for another {}s", until - now));
        }
    }
    if limits.max_changes_per_hour > 0
        && state.hour_window_start_unix > 0
        && now - state.hour_window_start_unix < 3600
        && state.changes_this_hour >= limits.max_changes_per_hour
    {
        return Some(format!(
            "hourly change limit of {} reached",
            limits.max_changes_per_hour
        ));
    }
    None
}

/// Advance the adjustment counters and the rolling hour window.
fn mark_adjusted(state: &mut RuntimeCounters, now: i64) {
    state.total_adjustments += 1;
    state.last_adjustment_unix = now;
    if state.hour_window_start_unix == 0 || now - state.hour_window_start_unix >= 3600 {
        state.hour_window_start_unix = now;
        state.changes_this_hour = 1;
    } else {
        state.changes_this_hour += 1;
    }
}

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn now_unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct FakeSource {
        samples: Mutex<VecDeque<Result<u64, String>>>,
        calls: AtomicUsize,
    }

    impl FakeSource {
        fn new(samples: Vec<Result<u64, String>>) -> Arc<Self> {
            Arc::new(Self {
                samples: Mutex::new(samples.into()),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl MetricsSource for Arc<FakeSource> {
        fn sample(&self) -> anyhow::Result<u64> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.samples.lock().unwrap().pop_front() {
                Some(Ok(sample)) => Ok(sample),
                Some(Err(msg)) => Err(anyhow::anyhow!(msg)),
                None => Err(anyhow::anyhow!("no more samples")),
            }
        }
    }

    struct FakePublisher {
        budget: Mutex<u64>,
        published: Mutex<Vec<u64>>,
        notifies: AtomicUsize,
        fail_publish: AtomicBool,
    }

    impl FakePublisher {
        fn new(budget: u64) -> Arc<Self> {
            Arc::new(Self {
                budget: Mutex::new(budget),
                published: Mutex::new(Vec::new()),
                notifies: AtomicUsize::new(0),
                fail_publish: AtomicBool::new(false),
            })
        }

        fn published(&self) -> Vec<u64> {
            self.published.lock().unwrap().clone()
        }
    }

    impl BudgetPublisher for Arc<FakePublisher> {
        fn current_budget(&self) -> anyhow::Result<u64> {
            Ok(*self.budget.lock().unwrap())
        }

        fn publish(&self, budget_mb: u64) -> anyhow::Result<()> {
            if self.fail_publish.load(Ordering::SeqCst) {
                anyhow::bail!("config store rejected the write");
            }
            *self.budget.lock().unwrap() = budget_mb;
            self.published.lock().unwrap().push(budget_mb);
            Ok(())
        }

        fn notify_reload(&self) -> anyhow::Result<()> {
            self.notifies.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Harness {
        agent: SizingAgent<Arc<FakeSource>, Arc<FakePublisher>>,
        source: Arc<FakeSource>,
        publisher: Arc<FakePublisher>,
        counters: Arc<RwLock<RuntimeCounters>>,
        store: HistoryStore,
    }

    fn harness(
        budget: u64,
        samples: Vec<Result<u64, String>>,
        mutate: impl FnOnce(&mut Tunables),
    ) -> Harness {
        let mut tunables = Tunables::default();
        tunables.agent.interval_secs = 300;
        tunables.limits.cooldown_secs = 0;
        tunables.limits.max_changes_per_hour = 0;
        mutate(&mut tunables);

        let source = FakeSource::new(samples);
        let publisher = FakePublisher::new(budget);
        let store = HistoryStore::open_in_memory().unwrap();
        let counters = Arc::new(RwLock::new(RuntimeCounters::default()));
        let agent = SizingAgent::new(
            "/nonexistent/headroom.toml",
            Arc::new(RwLock::new(tunables)),
            source.clone(),
            publisher.clone(),
            store.clone(),
            counters.clone(),
        );
        Harness {
            agent,
            source,
            publisher,
            counters,
            store,
        }
    }

    async fn tick(h: &mut Harness) {
        assert_eq!(h.agent.handle_wake(Wake::Timer).await, Flow::Continue);
    }

    #[tokio::test]
    async fn first_snapshot_only_primes() {
        let mut h = harness(1000, vec![Ok(10)], |_| {});

        tick(&mut h).await;

        assert!(h.publisher.published().is_empty());
        let counters = *h.counters.read().await;
        assert_eq!(counters.baseline, Some(10));
        assert_eq!(counters.total_adjustments, 0);
        assert_eq!(h.publisher.current_budget().unwrap(), 1000);
    }

    #[tokio::test]
    async fn priming_ignores_counter_magnitude() {
        // A huge first snapshot never triggers a decision.
        let mut h = harness(1000, vec![Ok(1_000_000)], |_| {});
        tick(&mut h).await;
        assert!(h.publisher.published().is_empty());
        assert_eq!(h.counters.read().await.baseline, Some(1_000_000));
    }

    #[tokio::test]
    async fn grows_when_threshold_met() {
        // budget=1000, ceiling=4096, threshold=2, window sees 3 forced flushes.
        let mut h = harness(1000, vec![Ok(10), Ok(13)], |_| {});

        tick(&mut h).await;
        tick(&mut h).await;

        assert_eq!(h.publisher.published(), vec![4000]);
        assert_eq!(h.publisher.notifies.load(Ordering::SeqCst), 1);

        let counters = *h.counters.read().await;
        assert_eq!(counters.baseline, Some(13));
        assert_eq!(counters.total_adjustments, 1);
        assert!(counters.last_adjustment_unix > 0);

        let history = h.store.recent(10).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].action, AdjustmentAction::Increase);
        assert_eq!(history[0].old_mb, 1000);
        assert_eq!(history[0].new_mb, 4000);
        assert_eq!(history[0].forced_events, 3);
    }

    #[tokio::test]
    async fn clamps_at_ceiling_and_records_capped() {
        let mut h = harness(1000, vec![Ok(10), Ok(13)], |t| {
            t.sizing.ceiling_mb = 2000;
        });

        tick(&mut h).await;
        tick(&mut h).await;

        assert_eq!(h.publisher.published(), vec![2000]);
        let history = h.store.recent(10).unwrap();
        assert_eq!(history[0].action, AdjustmentAction::Capped);
    }

    #[tokio::test]
    async fn no_redundant_write_at_ceiling() {
        // Already at the clamped value: candidate clamps to 2000 == current.
        let mut h = harness(2000, vec![Ok(10), Ok(13)], |t| {
            t.sizing.ceiling_mb = 2000;
        });

        tick(&mut h).await;
        tick(&mut h).await;

        assert!(h.publisher.published().is_empty());
        assert_eq!(h.publisher.notifies.load(Ordering::SeqCst), 0);
        assert_eq!(h.counters.read().await.baseline, Some(13));
    }

    #[tokio::test]
    async fn below_threshold_does_nothing() {
        let mut h = harness(1000, vec![Ok(10), Ok(11)], |_| {});

        tick(&mut h).await;
        tick(&mut h).await;

        assert!(h.publisher.published().is_empty());
        let counters = *h.counters.read().await;
        assert_eq!(counters.quiet_intervals, 1);
        assert_eq!(counters.baseline, Some(11));
    }

    #[tokio::test]
    async fn disabled_never_samples_or_touches_window_state() {
        let mut h = harness(1000, vec![Ok(10), Ok(13)], |t| {
            t.sizing.enable = false;
        });

        tick(&mut h).await;
        tick(&mut h).await;

        assert_eq!(h.source.calls(), 0);
        assert!(h.publisher.published().is_empty());
        assert_eq!(h.counters.read().await.baseline, None);
    }

    #[tokio::test]
    async fn metrics_failure_skips_cycle_without_corrupting_baseline() {
        let mut h = harness(
            1000,
            vec![Ok(10), Err("stats file gone".to_string()), Ok(13)],
            |_| {},
        );

        tick(&mut h).await; // prime at 10
        tick(&mut h).await; // failure, baseline must stay 10
        assert_eq!(h.counters.read().await.baseline, Some(10));

        tick(&mut h).await; // 13 - 10 = 3 forced, grows
        assert_eq!(h.publisher.published(), vec![4000]);
    }

    #[tokio::test]
    async fn publish_failure_leaves_baseline_for_retry() {
        let mut h = harness(1000, vec![Ok(10), Ok(13), Ok(13)], |t| {
            t.sizing.ceiling_mb = 100_000;
        });

        tick(&mut h).await; // prime
        h.publisher.fail_publish.store(true, Ordering::SeqCst);
        tick(&mut h).await; // decision applies but persist fails

        let counters = *h.counters.read().await;
        assert_eq!(counters.baseline, Some(10));
        assert_eq!(counters.total_adjustments, 0);
        assert!(h.store.recent(10).unwrap().is_empty());

        // Next cycle retries against the same baseline and succeeds.
        h.publisher.fail_publish.store(false, Ordering::SeqCst);
        tick(&mut h).await;
        assert_eq!(h.publisher.published(), vec![4000]);
        assert_eq!(h.counters.read().await.baseline, Some(13));
    }

    #[tokio::test]
    async fn self_triggered_wake_consumed_exactly_once() {
        let mut h = harness(1000, vec![Ok(10), Ok(13), Ok(20)], |_| {});

        tick(&mut h).await;
        tick(&mut h).await; // grows, arms the suppression token
        assert_eq!(h.publisher.published(), vec![4000]);
        let calls_after_grow = h.source.calls();

        // The reload our own SIGHUP caused: swallowed, no sampling.
        assert_eq!(h.agent.handle_wake(Wake::Reload).await, Flow::Continue);
        assert_eq!(h.source.calls(), calls_after_grow);

        // The token is single-use: the next timer wake samples normally.
        tick(&mut h).await;
        assert_eq!(h.source.calls(), calls_after_grow + 1);
    }

    #[tokio::test]
    async fn undelivered_self_signal_swallows_one_timer_wake() {
        // Notify delivery can fail; the token is still consumed at the
        // very next wake, whatever its cause.
        let mut h = harness(1000, vec![Ok(10), Ok(13), Ok(20)], |t| {
            t.sizing.ceiling_mb = 1_000_000;
        });

        tick(&mut h).await;
        tick(&mut h).await; // grows, arms the token
        let calls_after_grow = h.source.calls();

        tick(&mut h).await; // swallowed
        assert_eq!(h.source.calls(), calls_after_grow);

        tick(&mut h).await; // samples again
        assert_eq!(h.source.calls(), calls_after_grow + 1);
    }

    #[tokio::test]
    async fn shutdown_wins_over_suppression() {
        let mut h = harness(1000, vec![Ok(10), Ok(13)], |_| {});
        tick(&mut h).await;
        tick(&mut h).await; // arms the token

        assert_eq!(h.agent.handle_wake(Wake::Shutdown).await, Flow::Exit);
    }

    #[tokio::test]
    async fn cooldown_skips_and_records() {
        let mut h = harness(1000, vec![Ok(10), Ok(13), Ok(20)], |t| {
            t.limits.cooldown_secs = 300;
            t.sizing.ceiling_mb = 1_000_000;
        });

        tick(&mut h).await;
        tick(&mut h).await; // first grow applies
        assert_eq!(h.publisher.published(), vec![4000]);

        tick(&mut h).await; // second trigger lands inside the cooldown
        assert_eq!(h.publisher.published(), vec![4000]);

        let history = h.store.recent(10).unwrap();
        assert_eq!(history[0].action, AdjustmentAction::Skipped);
        assert!(history[0].reason.as_deref().unwrap().contains("cooldown"));
        // The measurement was consumed even though the change was declined.
        assert_eq!(h.counters.read().await.baseline, Some(20));
    }

    #[tokio::test]
    async fn hourly_limit_skips_after_cap() {
        let mut h = harness(1000, vec![Ok(10), Ok(13), Ok(20)], |t| {
            t.limits.max_changes_per_hour = 1;
            t.sizing.ceiling_mb = 1_000_000;
        });

        tick(&mut h).await;
        tick(&mut h).await;
        assert_eq!(h.publisher.published(), vec![4000]);

        tick(&mut h).await;
        assert_eq!(h.publisher.published(), vec![4000]);
        let history = h.store.recent(10).unwrap();
        assert_eq!(history[0].action, AdjustmentAction::Skipped);
        assert!(history[0].reason.as_deref().unwrap().contains("hourly"));
    }

    #[tokio::test]
    async fn shrinks_after_sustained_quiet() {
        let mut h = harness(2048, vec![Ok(10), Ok(10), Ok(10)], |t| {
            t.shrink.enable = true;
            t.shrink.intervals = 2;
            t.shrink.factor = 0.5;
            t.shrink.floor_mb = 512;
        });

        tick(&mut h).await; // prime
        tick(&mut h).await; // quiet 1
        assert!(h.publisher.published().is_empty());
        tick(&mut h).await; // quiet 2, shrinks

        assert_eq!(h.publisher.published(), vec![1024]);
        let counters = *h.counters.read().await;
        assert_eq!(counters.quiet_intervals, 0);
        assert_eq!(counters.total_adjustments, 1);

        let history = h.store.recent(10).unwrap();
        assert_eq!(history[0].action, AdjustmentAction::Decrease);
        assert_eq!(history[0].new_mb, 1024);
    }

    #[tokio::test]
    async fn shrink_never_goes_below_floor() {
        let mut h = harness(600, vec![Ok(10), Ok(10)], |t| {
            t.shrink.enable = true;
            t.shrink.intervals = 1;
            t.shrink.factor = 0.5;
            t.shrink.floor_mb = 512;
        });

        tick(&mut h).await;
        tick(&mut h).await;

        assert_eq!(h.publisher.published(), vec![512]);
    }

    #[tokio::test]
    async fn at_floor_keeps_counting_quiet_windows() {
        let mut h = harness(512, vec![Ok(10), Ok(10), Ok(10)], |t| {
            t.shrink.enable = true;
            t.shrink.intervals = 1;
            t.shrink.factor = 0.5;
            t.shrink.floor_mb = 512;
        });

        tick(&mut h).await;
        tick(&mut h).await;
        tick(&mut h).await;

        assert!(h.publisher.published().is_empty());
        assert_eq!(h.counters.read().await.quiet_intervals, 2);
    }

    #[tokio::test]
    async fn grow_resets_quiet_streak() {
        let mut h = harness(1000, vec![Ok(10), Ok(10), Ok(13)], |_| {});

        tick(&mut h).await; // prime
        tick(&mut h).await; // quiet 1
        assert_eq!(h.counters.read().await.quiet_intervals, 1);
        tick(&mut h).await; // grow

        assert_eq!(h.counters.read().await.quiet_intervals, 0);
    }

    #[tokio::test]
    async fn loud_window_breaks_quiet_streak_even_without_apply() {
        // Already at the ceiling: the loud window applies nothing but
        // still breaks the streak.
        let mut h = harness(2000, vec![Ok(10), Ok(10), Ok(13)], |t| {
            t.sizing.ceiling_mb = 2000;
        });

        tick(&mut h).await; // prime
        tick(&mut h).await; // quiet 1
        assert_eq!(h.counters.read().await.quiet_intervals, 1);
        tick(&mut h).await; // 3 forced, clamps to current, no write

        assert!(h.publisher.published().is_empty());
        assert_eq!(h.counters.read().await.quiet_intervals, 0);
    }

    #[tokio::test]
    async fn reload_rereads_tunables_file() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[agent]
interval_secs = 60
service_config = "/tmp/svc.toml"
stats_file = "/tmp/stats.json"
pidfile = "/tmp/svc.pid"

[sizing]
enable = false
"#
        )
        .unwrap();

        let mut h = harness(1000, vec![Ok(10)], |_| {});
        h.agent.tunables_path = file.path().to_path_buf();

        assert_eq!(h.agent.handle_wake(Wake::Reload).await, Flow::Continue);

        let tunables = h.agent.tunables.read().await.clone();
        assert!(!tunables.sizing.enable);
        assert_eq!(tunables.agent.interval_secs, 60);
    }

    #[tokio::test]
    async fn failed_reload_keeps_previous_tunables() {
        let mut h = harness(1000, vec![Ok(10)], |t| {
            t.sizing.ceiling_mb = 2222;
        });

        // tunables_path points at a nonexistent file.
        assert_eq!(h.agent.handle_wake(Wake::Reload).await, Flow::Continue);
        assert_eq!(h.agent.tunables.read().await.sizing.ceiling_mb, 2222);
    }

    #[test]
    fn rate_limited_cooldown_window() {
        let limits = LimitsSection {
            cooldown_secs: 300,
            max_changes_per_hour: 0,
        };
        let mut state = RuntimeCounters::default();
        assert!(rate_limited(&state, &limits, 1_000).is_none());

        state.last_adjustment_unix = 900;
        assert!(rate_limited(&state, &limits, 1_000).is_some());
        assert!(rate_limited(&state, &limits, 1_200).is_none());
    }

    #[test]
    fn rate_limited_hourly_window_expires() {
        let limits = LimitsSection {
            cooldown_secs: 0,
            max_changes_per_hour: 2,
        };
        let mut state = RuntimeCounters::default();
        state.hour_window_start_unix = 10_000;
        state.changes_this_hour = 2;

        assert!(rate_limited(&state, &limits, 10_100).is_some());
        // Window expired an hour later.
        assert!(rate_limited(&state, &limits, 13_601).is_none());
    }

    #[test]
    fn mark_adjusted_rolls_hour_window() {
        let mut state = RuntimeCounters::default();
        mark_adjusted(&mut state, 10_000);
        assert_eq!(state.changes_this_hour, 1);
        assert_eq!(state.hour_window_start_unix, 10_000);

        mark_adjusted(&mut state, 10_500);
        assert_eq!(state.changes_this_hour, 2);
        assert_eq!(state.hour_window_start_unix, 10_000);

        mark_adjusted(&mut state, 13_700);
        assert_eq!(state.changes_this_hour, 1);
        assert_eq!(state.hour_window_start_unix, 13_700);
        assert_eq!(state.total_adjustments, 3);
    }
}
