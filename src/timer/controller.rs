//! Timer controller: the single owner and mutator of `TimerState`
//!
//! Both sub-loops derive elapsed time independently and push candidates back
//! here. The controller is the serialization point: it drops anything tagged
//! with a stale run id and only ever moves the committed value forward.

use std::sync::Arc;
use tokio::{
    sync::{broadcast, mpsc, watch},
    time::Instant,
};
use tracing::{debug, info, trace, warn};

use crate::{
    clock::TimeSource,
    state::{Advisory, BackgroundMode, ElapsedUpdate, TimerPhase, TimerSnapshot, TimerState},
    tasks::{BackgroundTicker, FrameSync},
};
use super::{TimerCommand, TimerEvent, TimerOptions};

const UPDATE_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Default)]
struct TickerHealth {
    last_heard: Option<Instant>,
    restarts: u32,
}

#[derive(Debug)]
pub struct TimerController {
    state: TimerState,
    options: TimerOptions,
    clock: Arc<dyn TimeSource>,
    ticker: Option<BackgroundTicker>,
    frames: FrameSync,
    events: mpsc::UnboundedSender<TimerEvent>,
    /// Bumped on every start, pause and reset
    run_id: u64,
    health: TickerHealth,
    advisory: Option<Advisory>,
    snapshot_tx: watch::Sender<TimerSnapshot>,
    /// Keep the receiver alive to prevent channel closure
    _snapshot_rx: watch::Receiver<TimerSnapshot>,
    updates_tx: broadcast::Sender<ElapsedUpdate>,
}

impl TimerController {
    /// Create an idle controller seeded from a checkpoint. The returned
    /// receiver carries sub-loop events that must be fed to
    /// [`TimerController::handle_event`].
    pub fn new(
        clock: Arc<dyn TimeSource>,
        options: TimerOptions,
        seed_seconds: u64,
    ) -> (Self, mpsc::UnboundedReceiver<TimerEvent>) {
        let (events, events_rx) = mpsc::unbounded_channel();
        let ticker = match options.background {
            BackgroundMode::Disabled => None,
            mode => Some(BackgroundTicker::new(
                mode,
                options.tick_period,
                Arc::clone(&clock),
                events.clone(),
            )),
        };

        let state = TimerState::seeded(seed_seconds);
        let background = ticker.as_ref().map_or(BackgroundMode::Disabled, |t| t.mode());
        let (snapshot_tx, snapshot_rx) =
            watch::channel(TimerSnapshot::capture(&state, background, None));
        let (updates_tx, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);

        let controller = Self {
            state,
            options,
            clock,
            ticker,
            frames: FrameSync::new(options.frame_period),
            events,
            run_id: 0,
            health: TickerHealth::default(),
            advisory: None,
            snapshot_tx,
            _snapshot_rx: snapshot_rx,
            updates_tx,
        };
        (controller, events_rx)
    }

    /// Current committed value, suitable for display
    pub fn elapsed_seconds(&self) -> u64 {
        self.state.committed_seconds
    }

    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }

    pub fn phase(&self) -> TimerPhase {
        self.state.phase
    }

    pub fn run_id(&self) -> u64 {
        self.run_id
    }

    pub fn options(&self) -> &TimerOptions {
        &self.options
    }

    /// Effective background capability
    pub fn background_mode(&self) -> BackgroundMode {
        self.ticker
            .as_ref()
            .map_or(BackgroundMode::Disabled, |ticker| ticker.mode())
    }

    pub fn advisory(&self) -> Option<Advisory> {
        self.advisory
    }

    pub fn snapshot(&self) -> TimerSnapshot {
        TimerSnapshot::capture(&self.state, self.background_mode(), self.advisory)
    }

    /// Receive an update on every committed change
    pub fn subscribe(&self) -> broadcast::Receiver<ElapsedUpdate> {
        self.updates_tx.subscribe()
    }

    /// Latest snapshot, updated on any observable change
    pub fn watch(&self) -> watch::Receiver<TimerSnapshot> {
        self.snapshot_tx.subscribe()
    }

    pub(crate) fn updates_sender(&self) -> broadcast::Sender<ElapsedUpdate> {
        self.updates_tx.clone()
    }

    /// `Idle|Paused -> Running`
    pub fn start(&mut self) {
        let now = self.clock.now();
        if !self.state.begin_segment(now) {
            debug!("Start ignored, timer already running");
            return;
        }
        self.run_id += 1;
        self.health = TickerHealth::default();

        if let Some(reference) = self.state.reference() {
            if let Some(ticker) = self.ticker.as_mut() {
                ticker.start(self.run_id, reference);
            }
            self.frames.start(
                self.run_id,
                reference,
                Arc::clone(&self.clock),
                self.events.clone(),
            );
        }

        info!(
            "Timer started at {}s (run {}, background={})",
            self.state.committed_seconds,
            self.run_id,
            self.background_mode().as_str()
        );
        self.publish(false);
    }

    /// `Running -> Paused`, folding the segment into the prior baseline
    pub fn pause(&mut self) {
        let before = self.state.committed_seconds;
        if !self.state.end_segment(self.clock.now()) {
            debug!("Pause ignored, timer not running");
            return;
        }
        self.run_id += 1;
        self.stop_loops(false);

        info!(
            "Timer paused at {}s ({:?} accumulated)",
            self.state.committed_seconds, self.state.prior_elapsed
        );
        self.publish(self.state.committed_seconds != before);
    }

    pub fn toggle(&mut self) {
        if self.state.is_running() {
            self.pause();
        } else {
            self.start();
        }
    }

    /// Any state `-> Idle` at zero
    pub fn reset(&mut self) {
        let before = self.state.committed_seconds;
        self.run_id += 1;
        self.stop_loops(true);
        self.state = TimerState::new();
        self.health = TickerHealth::default();
        self.advisory = None;

        info!("Timer reset (was {}s)", before);
        self.publish(before != 0);
    }

    /// Apply a command and return the resulting snapshot
    pub fn apply(&mut self, command: TimerCommand) -> TimerSnapshot {
        match command {
            TimerCommand::Start => self.start(),
            TimerCommand::Pause => self.pause(),
            TimerCommand::Toggle => self.toggle(),
            TimerCommand::Reset => self.reset(),
        }
        self.snapshot()
    }

    /// Commit a candidate value from a sub-loop. Only values for the current
    /// run that move the committed value forward are accepted.
    pub fn absorb_tick(&mut self, run_id: u64, candidate_seconds: u64) -> bool {
        if run_id != self.run_id {
            trace!("Dropping tick from run {} (current {})", run_id, self.run_id);
            return false;
        }
        if !self.state.try_commit(candidate_seconds) {
            return false;
        }
        self.publish(true);
        true
    }

    /// Route a sub-loop event
    pub fn handle_event(&mut self, event: TimerEvent) {
        if event.run_id() != self.run_id || !self.state.is_running() {
            trace!("Dropping stale event {:?}", event);
            return;
        }

        if let TimerEvent::Background(tick) = event {
            // Queued ticks may arrive after a restart stamped a later instant
            let heard = self.health.last_heard.map_or(tick.emitted_at, |h| h.max(tick.emitted_at));
            self.health.last_heard = Some(heard);
            self.health.restarts = 0;
            if self.advisory.take().is_some() {
                info!("Background ticker recovered");
                self.publish(false);
            }
        }

        self.absorb_tick(event.run_id(), event.candidate_seconds());
    }

    /// Stall watchdog: restart a silent background ticker, and give up on it
    /// after too many consecutive restarts
    pub fn check_background(&mut self) {
        if !self.state.is_running() {
            return;
        }
        let Some(since) = self.health.last_heard.or(self.state.start_instant) else {
            return;
        };
        let Some(ticker) = self.ticker.as_mut() else {
            return;
        };
        if !ticker.is_ticking() {
            return;
        }

        let now = self.clock.now();
        let silent_for = now.saturating_duration_since(since);
        if silent_for <= self.options.stall_window() {
            return;
        }

        if self.health.restarts >= self.options.max_restarts {
            warn!(
                "Background ticker silent for {:?} after {} restarts, continuing on frame sync only",
                silent_for, self.health.restarts
            );
            ticker.pause();
            self.advisory = Some(Advisory::ReducedPrecision);
            self.publish(false);
            return;
        }

        self.health.restarts += 1;
        warn!(
            "Background ticker silent for {:?}, restarting ({}/{})",
            silent_for, self.health.restarts, self.options.max_restarts
        );
        ticker.restart();
        self.health.last_heard = Some(now);
    }

    /// Mandatory teardown: fold any running segment, stop both loops and
    /// release the background execution context
    pub async fn shutdown(&mut self) {
        self.pause();
        self.frames.stop();
        if let Some(ticker) = self.ticker.as_mut() {
            ticker.shutdown().await;
        }
        info!("Timer shut down at {}s", self.state.committed_seconds);
    }

    fn stop_loops(&mut self, clear_reference: bool) {
        self.frames.stop();
        if let Some(ticker) = self.ticker.as_mut() {
            if clear_reference {
                ticker.reset();
            } else {
                ticker.pause();
            }
        }
    }

    fn publish(&self, committed_changed: bool) {
        let snapshot = self.snapshot();
        self.snapshot_tx.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });

        if committed_changed {
            let update = ElapsedUpdate { elapsed_seconds: self.state.committed_seconds };
            if self.updates_tx.send(update).is_err() {
                trace!("No elapsed-time subscribers");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timer::{BackgroundTick, FrameTick};
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use tokio::time::sleep;

    use crate::clock::TokioClock;

    fn controller(
        background: BackgroundMode,
        seed: u64,
    ) -> (TimerController, mpsc::UnboundedReceiver<TimerEvent>) {
        let options = TimerOptions { background, ..TimerOptions::default() };
        TimerController::new(Arc::new(TokioClock), options, seed)
    }

    fn pump(controller: &mut TimerController, events: &mut mpsc::UnboundedReceiver<TimerEvent>) {
        while let Ok(event) = events.try_recv() {
            controller.handle_event(event);
        }
    }

    async fn run_for(
        controller: &mut TimerController,
        events: &mut mpsc::UnboundedReceiver<TimerEvent>,
        duration: Duration,
    ) {
        let step = Duration::from_millis(250);
        let mut remaining = duration;
        while !remaining.is_zero() {
            let chunk = remaining.min(step);
            sleep(chunk).await;
            remaining -= chunk;
            pump(controller, events);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn pause_resume_conserves_running_time() {
        let (mut timer, mut events) = controller(BackgroundMode::SameContext, 0);

        timer.start();
        run_for(&mut timer, &mut events, Duration::from_secs(125)).await;
        timer.pause();
        assert_eq!(timer.elapsed_seconds(), 125);

        sleep(Duration::from_secs(500)).await;
        pump(&mut timer, &mut events);
        assert_eq!(timer.elapsed_seconds(), 125);

        timer.start();
        run_for(&mut timer, &mut events, Duration::from_secs(10)).await;
        timer.pause();
        assert_eq!(timer.elapsed_seconds(), 135);

        timer.reset();
        assert_eq!(timer.elapsed_seconds(), 0);
        assert!(!timer.is_running());
        assert_eq!(timer.phase(), TimerPhase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn published_sequence_is_non_decreasing() {
        let (mut timer, mut events) = controller(BackgroundMode::SameContext, 0);
        let mut updates = timer.subscribe();

        timer.start();
        let run = timer.run_id();
        run_for(&mut timer, &mut events, Duration::from_secs(4)).await;
        for candidate in [2, 9, 3, 9, 7, 10] {
            timer.absorb_tick(run, candidate);
        }
        run_for(&mut timer, &mut events, Duration::from_secs(8)).await;
        timer.pause();

        let mut seen = Vec::new();
        while let Ok(update) = updates.try_recv() {
            seen.push(update.elapsed_seconds);
        }
        assert!(!seen.is_empty());
        assert!(seen.windows(2).all(|w| w[0] < w[1]), "{:?}", seen);
        assert_eq!(timer.elapsed_seconds(), 12);
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_and_smaller_ticks_are_ignored() {
        let (mut timer, _events) = controller(BackgroundMode::Disabled, 0);
        timer.start();
        let run = timer.run_id();

        assert!(timer.absorb_tick(run, 5));
        assert!(!timer.absorb_tick(run, 5));
        assert!(!timer.absorb_tick(run, 4));
        assert_eq!(timer.elapsed_seconds(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn no_commit_after_pause_or_reset() {
        let (mut timer, mut events) = controller(BackgroundMode::SameContext, 0);

        timer.start();
        run_for(&mut timer, &mut events, Duration::from_secs(3)).await;
        let stale_run = timer.run_id();
        timer.pause();
        assert_eq!(timer.elapsed_seconds(), 3);

        timer.handle_event(TimerEvent::Frame(FrameTick { run_id: stale_run, seconds: 1_000 }));
        assert!(!timer.absorb_tick(stale_run, 1_000));
        sleep(Duration::from_secs(5)).await;
        pump(&mut timer, &mut events);
        assert_eq!(timer.elapsed_seconds(), 3);

        timer.start();
        run_for(&mut timer, &mut events, Duration::from_secs(50)).await;
        let stale_run = timer.run_id();
        timer.reset();

        timer.handle_event(TimerEvent::Background(BackgroundTick {
            run_id: stale_run,
            elapsed_ms: 53_000,
            emitted_at: Instant::now(),
        }));
        timer.start();
        timer.handle_event(TimerEvent::Background(BackgroundTick {
            run_id: stale_run,
            elapsed_ms: 53_000,
            emitted_at: Instant::now(),
        }));
        assert_eq!(timer.elapsed_seconds(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn frame_sync_alone_keeps_time() {
        let (mut timer, mut events) = controller(BackgroundMode::Disabled, 0);
        let mut updates = timer.subscribe();
        assert_eq!(timer.background_mode(), BackgroundMode::Disabled);

        timer.start();
        run_for(&mut timer, &mut events, Duration::from_secs(60)).await;

        let elapsed = timer.elapsed_seconds();
        assert!((59..=61).contains(&elapsed), "elapsed {}", elapsed);

        let mut last = 0;
        while let Ok(update) = updates.try_recv() {
            assert!(update.elapsed_seconds > last);
            last = update.elapsed_seconds;
        }
        assert_eq!(last, elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn seeded_checkpoint_carries_into_first_run() {
        let (mut timer, mut events) = controller(BackgroundMode::SameContext, 3_672);
        assert_eq!(timer.elapsed_seconds(), 3_672);

        timer.start();
        run_for(&mut timer, &mut events, Duration::from_secs(8)).await;
        timer.pause();
        assert_eq!(timer.elapsed_seconds(), 3_680);
    }

    #[tokio::test(start_paused = true)]
    async fn toggle_and_invalid_transitions() {
        let (mut timer, _events) = controller(BackgroundMode::SameContext, 0);

        timer.pause();
        assert_eq!(timer.phase(), TimerPhase::Idle);

        timer.toggle();
        assert!(timer.is_running());
        let run = timer.run_id();
        timer.start();
        assert_eq!(timer.run_id(), run);

        sleep(Duration::from_secs(2)).await;
        let snapshot = timer.apply(TimerCommand::Toggle);
        assert!(!snapshot.running);
        assert_eq!(snapshot.phase, TimerPhase::Paused);
        assert_eq!(snapshot.elapsed_seconds, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn watch_reflects_transitions() {
        let (mut timer, _events) = controller(BackgroundMode::SameContext, 0);
        let watcher = timer.watch();

        timer.start();
        assert!(watcher.borrow().running);
        assert_eq!(watcher.borrow().background, BackgroundMode::SameContext);

        timer.reset();
        assert!(!watcher.borrow().running);
        assert_eq!(watcher.borrow().phase, TimerPhase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn silent_ticker_is_restarted() {
        let (mut timer, mut events) = controller(BackgroundMode::SameContext, 0);

        timer.start();
        if let Some(ticker) = timer.ticker.as_mut() {
            ticker.kill_context();
        }
        sleep(Duration::from_millis(600)).await;
        pump(&mut timer, &mut events);
        timer.check_background();
        assert_eq!(timer.health.restarts, 1);

        sleep(Duration::from_millis(300)).await;
        pump(&mut timer, &mut events);
        assert_eq!(timer.health.restarts, 0);
        assert!(timer.health.last_heard.is_some());
        assert_eq!(timer.advisory(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn ticker_liveness_follows_emission_time() {
        let (mut timer, _events) = controller(BackgroundMode::SameContext, 0);

        timer.start();
        let emitted_at = Instant::now();
        sleep(Duration::from_millis(400)).await;
        timer.handle_event(TimerEvent::Background(BackgroundTick {
            run_id: timer.run_id(),
            elapsed_ms: 0,
            emitted_at,
        }));
        assert_eq!(timer.health.last_heard, Some(emitted_at));

        let older = emitted_at - Duration::from_millis(100);
        timer.handle_event(TimerEvent::Background(BackgroundTick {
            run_id: timer.run_id(),
            elapsed_ms: 0,
            emitted_at: older,
        }));
        assert_eq!(timer.health.last_heard, Some(emitted_at));

        // 400ms since emission plus 150ms more exceeds the 500ms stall window
        sleep(Duration::from_millis(150)).await;
        timer.check_background();
        assert_eq!(timer.health.restarts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_stalls_raise_reduced_precision() {
        let (mut timer, mut events) = controller(BackgroundMode::SameContext, 0);
        let max_restarts = timer.options().max_restarts;

        timer.start();
        for _ in 0..=max_restarts {
            if let Some(ticker) = timer.ticker.as_mut() {
                ticker.kill_context();
            }
            sleep(Duration::from_millis(600)).await;
            pump(&mut timer, &mut events);
            timer.check_background();
        }
        assert_eq!(timer.advisory(), Some(Advisory::ReducedPrecision));
        assert_eq!(timer.watch().borrow().advisory, Some(Advisory::ReducedPrecision));

        let before = timer.elapsed_seconds();
        run_for(&mut timer, &mut events, Duration::from_secs(3)).await;
        assert!(timer.elapsed_seconds() > before);

        timer.pause();
        timer.start();
        run_for(&mut timer, &mut events, Duration::from_millis(500)).await;
        assert_eq!(timer.advisory(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_folds_running_segment() {
        let (mut timer, mut events) = controller(BackgroundMode::SameContext, 0);
        timer.start();
        run_for(&mut timer, &mut events, Duration::from_secs(7)).await;

        timer.shutdown().await;
        assert!(!timer.is_running());
        assert_eq!(timer.elapsed_seconds(), 7);
    }
}
