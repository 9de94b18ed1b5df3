use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::{DateTime, FixedOffset};

use crate::clock::Clock;
use crate::counter::delta::{DeltaTicker, TimeDelta};

// Upper bound on how long the worker sleeps before re-checking the stop flag.
const STOP_POLL_SLICE: Duration = Duration::from_millis(50);

/// Runs a [`DeltaTicker`] on a background thread until stopped or dropped.
pub struct TickerHandle {
    initial: TimeDelta,
    countdown: bool,
    stop: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl TickerHandle {
    /// The initial delta is computed and delivered on the calling thread
    /// before the worker starts.
    pub fn spawn<F>(target: DateTime<FixedOffset>, clock: Arc<dyn Clock>, mut on_delta: F) -> Self
    where
        F: FnMut(TimeDelta) + Send + 'static,
    {
        let ticker = DeltaTicker::start(target, clock.now());
        let initial = ticker.delta();
        let countdown = ticker.is_countdown();
        on_delta(initial);

        let stop = Arc::new(AtomicBool::new(false));
        let stop_for_thread = Arc::clone(&stop);
        let join = thread::spawn(move || run_ticker_loop(ticker, clock, stop_for_thread, on_delta));

        Self {
            initial,
            countdown,
            stop,
            join: Some(join),
        }
    }

    pub fn initial(&self) -> TimeDelta {
        self.initial
    }

    pub fn is_countdown(&self) -> bool {
        self.countdown
    }

    pub fn is_running(&self) -> bool {
        self.join
            .as_ref()
            .map(|join| !join.is_finished())
            .unwrap_or(false)
    }

    /// Idempotent; returns once the worker has exited.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

impl Drop for TickerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_ticker_loop<F>(
    mut ticker: DeltaTicker,
    clock: Arc<dyn Clock>,
    stop: Arc<AtomicBool>,
    mut on_delta: F,
) where
    F: FnMut(TimeDelta),
{
    while !stop.load(Ordering::Relaxed) {
        let Some(deadline) = ticker.next_deadline() else {
            break;
        };
        let remaining = (deadline - clock.now()).to_std().unwrap_or(Duration::ZERO);
        if !remaining.is_zero() {
            thread::sleep(remaining.min(STOP_POLL_SLICE));
            continue;
        }
        if let Some(delta) = ticker.poll(clock.now()) {
            on_delta(delta);
        }
    }
    ticker.cancel();
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;

    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::clock::{ManualClock, SystemClock};

    #[test]
    fn initial_delta_arrives_before_spawn_returns() {
        let (tx, rx) = mpsc::channel();
        let clock = Arc::new(SystemClock);
        let target = (clock.now() + chrono::Duration::seconds(90)).fixed_offset();
        let mut handle = TickerHandle::spawn(target, clock, move |delta| {
            let _ = tx.send(delta);
        });

        let first = rx.try_recv().expect("initial delta delivered synchronously");
        assert_eq!(first, handle.initial());
        assert!(handle.is_countdown());
        assert_eq!(first.minutes, 1);

        handle.stop();
        handle.stop();
        assert!(!handle.is_running());
    }

    #[test]
    fn ticks_follow_the_clock_and_stop_on_drop() {
        let start = Utc
            .with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
            .single()
            .expect("valid");
        let manual = Arc::new(ManualClock::new(start));
        let clock: Arc<dyn Clock> = Arc::clone(&manual) as Arc<dyn Clock>;
        let (tx, rx) = mpsc::channel();
        let target = (start + chrono::Duration::seconds(30)).fixed_offset();
        let handle = TickerHandle::spawn(target, clock, move |delta| {
            let _ = tx.send(delta);
        });
        assert_eq!(rx.recv().expect("initial").seconds, 30);

        manual.advance(chrono::Duration::milliseconds(1_500));
        let tick = rx
            .recv_timeout(Duration::from_secs(5))
            .expect("tick after alignment and one interval");
        assert_eq!(tick.seconds, 28);

        drop(handle);
        manual.advance(chrono::Duration::seconds(10));
        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
    }
}
