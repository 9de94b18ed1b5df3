use chrono::{DateTime, Duration, FixedOffset, Utc};
use tracing::debug;

use crate::counter::config::Digit;

const MS_PER_SECOND: i64 = 1_000;
const MS_PER_MINUTE: i64 = 60 * MS_PER_SECOND;
const MS_PER_HOUR: i64 = 60 * MS_PER_MINUTE;
const MS_PER_DAY: i64 = 24 * MS_PER_HOUR;

pub const TICK_INTERVAL_MS: i64 = 1_000;

/// Per-unit distance between now and a target instant. Every component is a
/// magnitude; direction is reported by [`is_countdown`].
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub struct TimeDelta {
    pub days: u64,
    pub hours: u64,
    pub minutes: u64,
    pub seconds: u64,
}

impl TimeDelta {
    /// Splits the signed difference into days/hours/minutes/seconds, each
    /// truncated toward zero, then drops the sign of each component.
    pub fn between(target: DateTime<FixedOffset>, now: DateTime<Utc>) -> Self {
        let signed_ms = (target.with_timezone(&Utc) - now).num_milliseconds();
        let days = signed_ms / MS_PER_DAY;
        let hours = (signed_ms % MS_PER_DAY) / MS_PER_HOUR;
        let minutes = (signed_ms % MS_PER_HOUR) / MS_PER_MINUTE;
        let seconds = (signed_ms % MS_PER_MINUTE) / MS_PER_SECOND;
        Self {
            days: days.unsigned_abs(),
            hours: hours.unsigned_abs(),
            minutes: minutes.unsigned_abs(),
            seconds: seconds.unsigned_abs(),
        }
    }

    pub fn get(&self, digit: Digit) -> u64 {
        match digit {
            Digit::Days => self.days,
            Digit::Hours => self.hours,
            Digit::Minutes => self.minutes,
            Digit::Seconds => self.seconds,
        }
    }
}

pub fn is_countdown(target: DateTime<FixedOffset>, now: DateTime<Utc>) -> bool {
    target > now
}

/// Delay until the next half-second mark of the wall clock.
pub fn start_offset(now: DateTime<Utc>) -> Duration {
    // Leap seconds report 1000..2000 ms.
    let offset_ms = i64::from(now.timestamp_subsec_millis().min(999));
    if offset_ms < 500 {
        Duration::milliseconds(500 - offset_ms)
    } else {
        Duration::milliseconds(1_500 - offset_ms)
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum Phase {
    Aligning { fire_at: DateTime<Utc> },
    Ticking { next_tick: DateTime<Utc> },
    Cancelled,
}

/// One epoch of live deltas for a target instant: an alignment one-shot
/// followed by a fixed 1000 ms interval. Driven by [`DeltaTicker::poll`].
#[derive(Debug, Clone)]
pub struct DeltaTicker {
    target: DateTime<FixedOffset>,
    countdown: bool,
    latest: TimeDelta,
    phase: Phase,
    epoch: u64,
}

impl DeltaTicker {
    pub fn start(target: DateTime<FixedOffset>, now: DateTime<Utc>) -> Self {
        let mut ticker = Self {
            target,
            countdown: false,
            latest: TimeDelta::default(),
            phase: Phase::Cancelled,
            epoch: 0,
        };
        ticker.arm(now);
        ticker
    }

    pub fn target(&self) -> DateTime<FixedOffset> {
        self.target
    }

    pub fn delta(&self) -> TimeDelta {
        self.latest
    }

    /// Direction fixed at the start of the epoch.
    pub fn is_countdown(&self) -> bool {
        self.countdown
    }

    /// Number of epochs started so far, starting at 1.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn is_active(&self) -> bool {
        self.phase != Phase::Cancelled
    }

    /// When the next pending timer is due.
    pub fn next_deadline(&self) -> Option<DateTime<Utc>> {
        match self.phase {
            Phase::Aligning { fire_at } => Some(fire_at),
            Phase::Ticking { next_tick } => Some(next_tick),
            Phase::Cancelled => None,
        }
    }

    /// Fires whatever timers are due at `now`. Returns the recomputed delta
    /// when an interval tick fired.
    pub fn poll(&mut self, now: DateTime<Utc>) -> Option<TimeDelta> {
        if let Phase::Aligning { fire_at } = self.phase {
            if now < fire_at {
                return None;
            }
            self.phase = Phase::Ticking {
                next_tick: fire_at + Duration::milliseconds(TICK_INTERVAL_MS),
            };
        }

        let Phase::Ticking { next_tick } = self.phase else {
            return None;
        };
        if now < next_tick {
            return None;
        }

        // Missed ticks are coalesced into one.
        let interval = Duration::milliseconds(TICK_INTERVAL_MS);
        let mut upcoming = next_tick + interval;
        while upcoming <= now {
            upcoming += interval;
        }
        self.phase = Phase::Ticking {
            next_tick: upcoming,
        };
        self.latest = TimeDelta::between(self.target, now);
        Some(self.latest)
    }

    /// Cancels the current timers and starts a fresh epoch for `target`.
    pub fn retarget(&mut self, target: DateTime<FixedOffset>, now: DateTime<Utc>) -> TimeDelta {
        self.cancel();
        self.target = target;
        self.arm(now);
        self.latest
    }

    /// Safe to call repeatedly and before any timer fired.
    pub fn cancel(&mut self) {
        if self.phase != Phase::Cancelled {
            debug!("cancelling delta epoch {}", self.epoch);
        }
        self.phase = Phase::Cancelled;
    }

    fn arm(&mut self, now: DateTime<Utc>) {
        self.epoch += 1;
        self.countdown = is_countdown(self.target, now);
        self.latest = TimeDelta::between(self.target, now);
        self.phase = Phase::Aligning {
            fire_at: now + start_offset(now),
        };
        debug!(
            "delta epoch {} started for {}, countdown: {}",
            self.epoch, self.target, self.countdown
        );
    }
}
