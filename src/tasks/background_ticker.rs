//! Background ticker
//!
//! Keeps emitting elapsed-time ticks on a fixed period regardless of how the
//! host's foreground loop is being scheduled. By default the loop runs on a
//! dedicated thread with its own single-threaded runtime; when that cannot be
//! created it degrades to a task on the caller's runtime and reports the
//! degraded mode through [`BackgroundTicker::mode`].

use std::{sync::Arc, thread, time::Duration};
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{interval, MissedTickBehavior},
};
use tracing::{debug, error, info, trace, warn};

use crate::{
    clock::{TimeSource, TimerReference},
    state::BackgroundMode,
    timer::{BackgroundTick, TimerEvent},
};

/// How long teardown waits for an isolated ticker thread to exit
const THREAD_JOIN_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug)]
enum TickerCommand {
    Start { run_id: u64, reference: TimerReference },
    Pause,
    Reset,
}

#[derive(Debug)]
enum TickerContext {
    Isolated(thread::JoinHandle<()>),
    SameContext(JoinHandle<()>),
}

/// Handle to the background ticking loop
#[derive(Debug)]
pub struct BackgroundTicker {
    requested: BackgroundMode,
    mode: BackgroundMode,
    period: Duration,
    clock: Arc<dyn TimeSource>,
    events: mpsc::UnboundedSender<TimerEvent>,
    commands: Option<mpsc::UnboundedSender<TickerCommand>>,
    context: Option<TickerContext>,
    ticking: bool,
    segment: Option<(u64, TimerReference)>,
    #[cfg(test)]
    fail_isolated_runtime: bool,
}

impl BackgroundTicker {
    /// Create a ticker. The execution context is spawned lazily on first start.
    pub fn new(
        requested: BackgroundMode,
        period: Duration,
        clock: Arc<dyn TimeSource>,
        events: mpsc::UnboundedSender<TimerEvent>,
    ) -> Self {
        Self {
            requested,
            mode: requested,
            period,
            clock,
            events,
            commands: None,
            context: None,
            ticking: false,
            segment: None,
            #[cfg(test)]
            fail_isolated_runtime: false,
        }
    }

    /// Effective execution mode, which may be degraded from the requested one
    pub fn mode(&self) -> BackgroundMode {
        self.mode
    }

    pub fn is_ticking(&self) -> bool {
        self.ticking
    }

    /// Begin ticking for a run segment. No-op while already ticking.
    pub fn start(&mut self, run_id: u64, reference: TimerReference) {
        if self.ticking {
            trace!("Background ticker already ticking, ignoring start");
            return;
        }
        if self.commands.as_ref().map_or(true, |tx| tx.is_closed()) {
            self.spawn_context();
        }
        self.segment = Some((run_id, reference));
        self.ticking = true;
        self.send(TickerCommand::Start { run_id, reference });
    }

    /// Stop ticking, keeping the execution context alive
    pub fn pause(&mut self) {
        self.ticking = false;
        self.send(TickerCommand::Pause);
    }

    /// Stop ticking and forget the reference instant
    pub fn reset(&mut self) {
        self.ticking = false;
        self.segment = None;
        self.send(TickerCommand::Reset);
    }

    /// Replace the execution context with a fresh one, resuming the current
    /// segment if the ticker was supposed to be ticking
    pub fn restart(&mut self) {
        info!("Restarting background ticker ({})", self.requested.as_str());
        self.detach_context();
        self.spawn_context();
        if self.ticking {
            if let Some((run_id, reference)) = self.segment {
                self.send(TickerCommand::Start { run_id, reference });
            }
        }
    }

    /// Close the command channel and release the execution context
    pub async fn shutdown(&mut self) {
        self.ticking = false;
        self.segment = None;
        self.commands = None;

        match self.context.take() {
            Some(TickerContext::SameContext(task)) => {
                task.abort();
                debug!("Background ticker task aborted");
            }
            Some(TickerContext::Isolated(thread)) => {
                let join = tokio::task::spawn_blocking(move || thread.join());
                match tokio::time::timeout(THREAD_JOIN_GRACE, join).await {
                    Ok(Ok(Ok(()))) => debug!("Background ticker thread joined"),
                    Ok(Ok(Err(_))) => warn!("Background ticker thread panicked"),
                    Ok(Err(e)) => warn!("Failed to join background ticker thread: {}", e),
                    Err(_) => warn!(
                        "Background ticker thread did not exit within {:?}, detaching",
                        THREAD_JOIN_GRACE
                    ),
                }
            }
            None => {}
        }
    }

    fn send(&self, command: TickerCommand) {
        let Some(commands) = &self.commands else {
            return;
        };
        if let Err(e) = commands.send(command) {
            // The context is gone; the stall watchdog restarts it
            debug!("Background ticker unreachable: {:?}", e.0);
        }
    }

    fn spawn_context(&mut self) {
        if self.requested == BackgroundMode::Isolated {
            match self.spawn_isolated() {
                Ok(()) => return,
                Err(e) => warn!(
                    "Cannot create isolated ticker thread ({}), falling back to same-context ticking",
                    e
                ),
            }
        }
        self.spawn_same_context();
    }

    fn spawn_isolated(&mut self) -> Result<(), String> {
        let runtime = self.build_isolated_runtime()?;
        let (tx, rx) = mpsc::unbounded_channel();
        let events = self.events.clone();
        let clock = Arc::clone(&self.clock);
        let period = self.period;

        let handle = thread::Builder::new()
            .name("background-ticker".to_string())
            .spawn(move || runtime.block_on(ticker_loop(rx, events, clock, period)))
            .map_err(|e| format!("thread spawn failed: {}", e))?;

        self.mode = BackgroundMode::Isolated;
        self.commands = Some(tx);
        self.context = Some(TickerContext::Isolated(handle));
        debug!("Background ticker running on a dedicated thread");
        Ok(())
    }

    fn build_isolated_runtime(&self) -> Result<TickerRuntime, String> {
        #[cfg(test)]
        if self.fail_isolated_runtime {
            return Err("runtime construction disabled".to_string());
        }
        tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .map(|runtime| TickerRuntime(Some(runtime)))
            .map_err(|e| format!("runtime build failed: {}", e))
    }

    fn spawn_same_context(&mut self) {
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                error!("No runtime available for background ticker: {}", e);
                return;
            }
        };

        let (tx, rx) = mpsc::unbounded_channel();
        let task = runtime.spawn(ticker_loop(
            rx,
            self.events.clone(),
            Arc::clone(&self.clock),
            self.period,
        ));

        self.mode = BackgroundMode::SameContext;
        self.commands = Some(tx);
        self.context = Some(TickerContext::SameContext(task));
        debug!("Background ticker running on the caller's runtime");
    }

    fn detach_context(&mut self) {
        self.commands = None;
        match self.context.take() {
            Some(TickerContext::SameContext(task)) => task.abort(),
            // Exits on its own once it notices the closed channel
            Some(TickerContext::Isolated(_thread)) => {}
            None => {}
        }
    }

    /// Kill the context without telling anyone, as a forced termination would
    #[cfg(test)]
    pub(crate) fn kill_context(&mut self) {
        self.detach_context();
    }
}

impl Drop for BackgroundTicker {
    fn drop(&mut self) {
        if let Some(TickerContext::SameContext(task)) = &self.context {
            task.abort();
        }
    }
}

/// Runtime owned by the isolated ticker thread. Built on the caller's side so
/// a construction failure can still fall back to same-context ticking.
struct TickerRuntime(Option<tokio::runtime::Runtime>);

impl TickerRuntime {
    fn block_on(&self, future: impl std::future::Future<Output = ()>) {
        if let Some(runtime) = &self.0 {
            runtime.block_on(future);
        }
    }
}

impl Drop for TickerRuntime {
    // May be dropped inside the caller's runtime if the thread never starts
    fn drop(&mut self) {
        if let Some(runtime) = self.0.take() {
            runtime.shutdown_background();
        }
    }
}

async fn ticker_loop(
    mut commands: mpsc::UnboundedReceiver<TickerCommand>,
    events: mpsc::UnboundedSender<TimerEvent>,
    clock: Arc<dyn TimeSource>,
    period: Duration,
) {
    let mut segment: Option<(u64, TimerReference)> = None;
    let mut ticking = false;
    let mut ticks = interval(period);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(TickerCommand::Start { run_id, reference }) => {
                    if ticking {
                        continue;
                    }
                    segment = Some((run_id, reference));
                    ticking = true;
                    ticks.reset();
                    trace!("Ticker started for run {}", run_id);
                }
                Some(TickerCommand::Pause) => ticking = false,
                Some(TickerCommand::Reset) => {
                    ticking = false;
                    segment = None;
                }
                None => {
                    debug!("Ticker command channel closed, exiting loop");
                    break;
                }
            },
            _ = ticks.tick(), if ticking => {
                let Some((run_id, reference)) = segment else {
                    continue;
                };
                let now = clock.now();
                let elapsed_ms = u64::try_from(reference.elapsed_at(now).as_millis()).unwrap_or(u64::MAX);
                let tick = BackgroundTick { run_id, elapsed_ms, emitted_at: now };
                if events.send(TimerEvent::Background(tick)).is_err() {
                    debug!("Timer controller gone, stopping ticker loop");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{ManualClock, TokioClock};
    use pretty_assertions::assert_eq;
    use tokio::time::{sleep, timeout};

    fn drain(events: &mut mpsc::UnboundedReceiver<TimerEvent>) -> Vec<BackgroundTick> {
        let mut ticks = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let TimerEvent::Background(tick) = event {
                ticks.push(tick);
            }
        }
        ticks
    }

    #[tokio::test(start_paused = true)]
    async fn same_context_ticks_every_period() {
        let clock = Arc::new(TokioClock);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut ticker = BackgroundTicker::new(
            BackgroundMode::SameContext,
            Duration::from_millis(100),
            clock.clone(),
            tx,
        );

        let reference = TimerReference::new(clock.now(), Duration::from_secs(2));
        ticker.start(7, reference);
        sleep(Duration::from_millis(1_050)).await;

        let ticks = drain(&mut rx);
        assert_eq!(ticks.len(), 10);
        assert!(ticks.iter().all(|t| t.run_id == 7));
        assert!(ticks.windows(2).all(|w| w[0].elapsed_ms < w[1].elapsed_ms));
        assert_eq!(ticks.last().map(|t| t.elapsed_ms), Some(3_000));
        assert_eq!(ticker.mode(), BackgroundMode::SameContext);
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_start_does_not_double_the_rate() {
        let clock = Arc::new(TokioClock);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut ticker =
            BackgroundTicker::new(BackgroundMode::SameContext, Duration::from_millis(100), clock.clone(), tx);

        let reference = TimerReference::new(clock.now(), Duration::ZERO);
        ticker.start(1, reference);
        ticker.start(1, reference);
        sleep(Duration::from_millis(550)).await;

        assert_eq!(drain(&mut rx).len(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn pause_and_reset_stop_emissions() {
        let clock = Arc::new(TokioClock);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut ticker =
            BackgroundTicker::new(BackgroundMode::SameContext, Duration::from_millis(100), clock.clone(), tx);

        ticker.start(1, TimerReference::new(clock.now(), Duration::ZERO));
        sleep(Duration::from_millis(350)).await;
        ticker.pause();
        sleep(Duration::from_millis(10)).await;
        drain(&mut rx);

        sleep(Duration::from_secs(2)).await;
        assert!(drain(&mut rx).is_empty());

        ticker.start(2, TimerReference::new(clock.now(), Duration::ZERO));
        sleep(Duration::from_millis(250)).await;
        ticker.reset();
        sleep(Duration::from_millis(10)).await;
        let ticks = drain(&mut rx);
        assert!(!ticks.is_empty());
        assert!(ticks.iter().all(|t| t.run_id == 2));

        sleep(Duration::from_secs(2)).await;
        assert!(drain(&mut rx).is_empty());
        assert!(!ticker.is_ticking());
    }

    #[tokio::test]
    async fn isolated_thread_emits_from_its_own_schedule() {
        let clock = ManualClock::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut ticker = BackgroundTicker::new(
            BackgroundMode::Isolated,
            Duration::from_millis(20),
            Arc::new(clock.clone()),
            tx,
        );

        let reference = TimerReference::new(clock.now(), Duration::from_secs(1));
        clock.advance(Duration::from_millis(2_500));
        ticker.start(3, reference);
        assert_eq!(ticker.mode(), BackgroundMode::Isolated);

        let event = timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("ticker should emit")
            .expect("channel open");
        assert_eq!(event.run_id(), 3);
        assert_eq!(event.candidate_seconds(), 3);

        ticker.shutdown().await;
        sleep(Duration::from_millis(100)).await;
        drain(&mut rx);
        sleep(Duration::from_millis(100)).await;
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn isolated_runtime_failure_falls_back_to_same_context() {
        let clock = Arc::new(TokioClock);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut ticker =
            BackgroundTicker::new(BackgroundMode::Isolated, Duration::from_millis(100), clock.clone(), tx);
        ticker.fail_isolated_runtime = true;

        ticker.start(5, TimerReference::new(clock.now(), Duration::ZERO));
        assert_eq!(ticker.mode(), BackgroundMode::SameContext);

        sleep(Duration::from_millis(350)).await;
        let ticks = drain(&mut rx);
        assert_eq!(ticks.len(), 3);
        assert!(ticks.iter().all(|t| t.run_id == 5));

        ticker.restart();
        assert_eq!(ticker.mode(), BackgroundMode::SameContext);
    }

    #[tokio::test(start_paused = true)]
    async fn restart_resumes_current_segment() {
        let clock = Arc::new(TokioClock);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut ticker =
            BackgroundTicker::new(BackgroundMode::SameContext, Duration::from_millis(100), clock.clone(), tx);

        ticker.start(4, TimerReference::new(clock.now(), Duration::ZERO));
        ticker.kill_context();
        sleep(Duration::from_millis(500)).await;
        assert!(drain(&mut rx).is_empty());

        ticker.restart();
        sleep(Duration::from_millis(250)).await;
        let ticks = drain(&mut rx);
        assert_eq!(ticks.len(), 2);
        assert!(ticks.iter().all(|t| t.run_id == 4 && t.elapsed_ms >= 500));
    }
}
