//! Deterministic round-timing state machine.
//!
//! The clock never schedules wall-clock timers itself; the owning room drives
//! it with `advance` from its tick loop (or directly from tests) and every
//! transition is reported as a typed [`ClockEvent`] the caller dispatches.
//! This keeps all timer behavior deterministic and cancellation-safe: a
//! superseded resume-countdown is simply replaced, it can never fire late.

use smallvec::SmallVec;
use std::time::Duration;

const ONE_SECOND: Duration = Duration::from_secs(1);

/// Events emitted by clock transitions, in occurrence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockEvent {
    Resumed,
    Paused,
    CountdownTick { seconds: u32 },
    TimeLeftChanged { seconds: u32 },
    IntermissionStarted,
    IntermissionEnded,
}

/// Event batch for one clock operation. Stack-allocated for the common case.
pub type ClockEvents = SmallVec<[ClockEvent; 4]>;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Countdown {
    seconds_left: u32,
    until_tick: Duration,
}

/// Exactly one of these holds at a time; the resume-countdown is a sub-state
/// of `Paused`.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Phase {
    Stopped,
    Running,
    Paused { countdown: Option<Countdown> },
    Intermission { remaining: Duration },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameClock {
    phase: Phase,
    /// Remaining round time; `None` for untimed rounds.
    timeleft: Option<Duration>,
    intermission_len: Duration,
    /// Sub-second progress toward the next whole-second decrement.
    second_carry: Duration,
    /// Total time spent in `Running` since the last `start`.
    elapsed: Duration,
}

impl Default for GameClock {
    fn default() -> Self {
        Self::new()
    }
}

impl GameClock {
    pub fn new() -> Self {
        Self {
            phase: Phase::Stopped,
            timeleft: None,
            intermission_len: Duration::ZERO,
            second_carry: Duration::ZERO,
            elapsed: Duration::ZERO,
        }
    }

    /// Begin a timed round. The clock starts paused; the room calls `resume`
    /// (possibly with a countdown) to begin play.
    pub fn start(&mut self, timeout: Duration, intermission_len: Duration) -> ClockEvents {
        self.phase = Phase::Paused { countdown: None };
        self.timeleft = Some(timeout);
        self.intermission_len = intermission_len;
        self.second_carry = Duration::ZERO;
        self.elapsed = Duration::ZERO;

        let mut events = ClockEvents::new();
        events.push(ClockEvent::TimeLeftChanged {
            seconds: timeout.as_secs() as u32,
        });
        events
    }

    /// Begin a round with no expiry.
    pub fn start_untimed(&mut self) -> ClockEvents {
        self.phase = Phase::Paused { countdown: None };
        self.timeleft = None;
        self.second_carry = Duration::ZERO;
        self.elapsed = Duration::ZERO;
        ClockEvents::new()
    }

    /// Stop the clock entirely (room decommission).
    pub fn stop(&mut self) {
        self.phase = Phase::Stopped;
        self.timeleft = None;
    }

    /// Pause a running round. Cancels an active resume-countdown.
    pub fn pause(&mut self) -> ClockEvents {
        let mut events = ClockEvents::new();
        match self.phase {
            Phase::Running => {
                self.phase = Phase::Paused { countdown: None };
                events.push(ClockEvent::Paused);
            }
            Phase::Paused {
                countdown: Some(_),
            } => {
                self.phase = Phase::Paused { countdown: None };
                events.push(ClockEvent::Paused);
            }
            _ => {}
        }
        events
    }

    /// Resume from pause. With `delay`, starts (or restarts) a once-per-second
    /// countdown and announces the full delay immediately; without, resumes
    /// on the spot.
    pub fn resume(&mut self, delay: Option<u32>) -> ClockEvents {
        let mut events = ClockEvents::new();
        if !matches!(self.phase, Phase::Paused { .. }) {
            return events;
        }
        match delay {
            None | Some(0) => {
                self.phase = Phase::Running;
                events.push(ClockEvent::Resumed);
            }
            Some(seconds) => {
                self.phase = Phase::Paused {
                    countdown: Some(Countdown {
                        seconds_left: seconds,
                        until_tick: ONE_SECOND,
                    }),
                };
                events.push(ClockEvent::CountdownTick { seconds });
            }
        }
        events
    }

    /// Overwrite the remaining round time. Setting zero while running ends
    /// the round immediately.
    pub fn set_time_left(&mut self, seconds: u32) -> ClockEvents {
        let mut events = ClockEvents::new();
        self.timeleft = Some(Duration::from_secs(u64::from(seconds)));
        self.second_carry = Duration::ZERO;
        events.push(ClockEvent::TimeLeftChanged { seconds });
        if seconds == 0 && matches!(self.phase, Phase::Running) {
            self.enter_intermission(&mut events);
        }
        events
    }

    /// Advance the clock by `dt`, emitting every transition crossed. The
    /// result is independent of how `dt` is chunked across calls.
    pub fn advance(&mut self, dt: Duration) -> ClockEvents {
        let mut events = ClockEvents::new();
        let mut remaining = dt;

        while remaining > Duration::ZERO {
            match &mut self.phase {
                Phase::Stopped | Phase::Paused { countdown: None } => break,
                Phase::Paused {
                    countdown: Some(cd),
                } => {
                    let step = remaining.min(cd.until_tick);
                    cd.until_tick -= step;
                    remaining -= step;
                    if cd.until_tick.is_zero() {
                        cd.seconds_left -= 1;
                        if cd.seconds_left == 0 {
                            self.phase = Phase::Running;
                            events.push(ClockEvent::Resumed);
                        } else {
                            let seconds = cd.seconds_left;
                            cd.until_tick = ONE_SECOND;
                            events.push(ClockEvent::CountdownTick { seconds });
                        }
                    }
                }
                Phase::Running => match self.timeleft {
                    None => {
                        self.elapsed += remaining;
                        remaining = Duration::ZERO;
                    }
                    Some(timeleft) => {
                        let to_boundary = ONE_SECOND - self.second_carry;
                        let step = remaining.min(to_boundary);
                        self.elapsed += step;
                        self.second_carry += step;
                        remaining -= step;
                        if self.second_carry == ONE_SECOND {
                            self.second_carry = Duration::ZERO;
                            let left = timeleft.saturating_sub(ONE_SECOND);
                            self.timeleft = Some(left);
                            if left.is_zero() {
                                self.enter_intermission(&mut events);
                            }
                        }
                    }
                },
                Phase::Intermission { remaining: left } => {
                    let step = remaining.min(*left);
                    *left -= step;
                    remaining -= step;
                    if left.is_zero() {
                        self.phase = Phase::Stopped;
                        events.push(ClockEvent::IntermissionEnded);
                    }
                }
            }
        }
        events
    }

    fn enter_intermission(&mut self, events: &mut ClockEvents) {
        events.push(ClockEvent::IntermissionStarted);
        if self.intermission_len.is_zero() {
            self.phase = Phase::Stopped;
            events.push(ClockEvent::IntermissionEnded);
        } else {
            self.phase = Phase::Intermission {
                remaining: self.intermission_len,
            };
        }
    }

    pub fn is_paused(&self) -> bool {
        matches!(self.phase, Phase::Paused { .. })
    }

    pub fn is_running(&self) -> bool {
        matches!(self.phase, Phase::Running)
    }

    pub fn is_intermission(&self) -> bool {
        matches!(self.phase, Phase::Intermission { .. })
    }

    /// Remaining whole seconds, `None` for untimed rounds.
    pub fn timeleft_seconds(&self) -> Option<u32> {
        self.timeleft.map(|d| d.as_secs() as u32)
    }

    /// Total running time since the round started. Spawn-delay eligibility is
    /// measured against this, so pausing the game also pauses spawn waits.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    fn started_clock(timeout: u64) -> GameClock {
        let mut clock = GameClock::new();
        clock.start(secs(timeout), secs(10));
        clock.resume(None);
        clock
    }

    #[test]
    fn start_emits_timeleft_and_stays_paused() {
        let mut clock = GameClock::new();
        let events = clock.start(secs(600), secs(10));
        assert_eq!(
            events.as_slice(),
            &[ClockEvent::TimeLeftChanged { seconds: 600 }]
        );
        assert!(clock.is_paused());
    }

    #[test]
    fn immediate_resume_starts_running() {
        let mut clock = GameClock::new();
        clock.start(secs(600), secs(10));
        let events = clock.resume(None);
        assert_eq!(events.as_slice(), &[ClockEvent::Resumed]);
        assert!(clock.is_running());
    }

    #[test]
    fn countdown_ticks_once_per_second_then_resumes() {
        let mut clock = GameClock::new();
        clock.start(secs(600), secs(10));
        let events = clock.resume(Some(3));
        assert_eq!(
            events.as_slice(),
            &[ClockEvent::CountdownTick { seconds: 3 }]
        );

        assert_eq!(
            clock.advance(secs(1)).as_slice(),
            &[ClockEvent::CountdownTick { seconds: 2 }]
        );
        assert_eq!(
            clock.advance(secs(1)).as_slice(),
            &[ClockEvent::CountdownTick { seconds: 1 }]
        );
        assert_eq!(clock.advance(secs(1)).as_slice(), &[ClockEvent::Resumed]);
        assert!(clock.is_running());
    }

    #[test]
    fn reissued_resume_restarts_countdown() {
        let mut clock = GameClock::new();
        clock.start(secs(600), secs(10));
        clock.resume(Some(5));
        clock.advance(Duration::from_millis(2500));

        // Superseding resume: the old countdown must never fire again.
        let events = clock.resume(Some(3));
        assert_eq!(
            events.as_slice(),
            &[ClockEvent::CountdownTick { seconds: 3 }]
        );
        let events = clock.advance(secs(3));
        assert_eq!(
            events.as_slice(),
            &[
                ClockEvent::CountdownTick { seconds: 2 },
                ClockEvent::CountdownTick { seconds: 1 },
                ClockEvent::Resumed,
            ]
        );
    }

    #[test]
    fn pause_cancels_countdown() {
        let mut clock = GameClock::new();
        clock.start(secs(600), secs(10));
        clock.resume(Some(3));
        let events = clock.pause();
        assert_eq!(events.as_slice(), &[ClockEvent::Paused]);
        assert!(clock.advance(secs(30)).is_empty());
        assert!(clock.is_paused());
    }

    #[test]
    fn round_expiry_enters_then_leaves_intermission() {
        let mut clock = started_clock(3);
        let events = clock.advance(secs(3));
        assert_eq!(events.as_slice(), &[ClockEvent::IntermissionStarted]);
        assert!(clock.is_intermission());

        let events = clock.advance(secs(10));
        assert_eq!(events.as_slice(), &[ClockEvent::IntermissionEnded]);
        assert!(!clock.is_running());
    }

    #[test]
    fn untimed_round_never_expires() {
        let mut clock = GameClock::new();
        clock.start_untimed();
        clock.resume(None);
        assert!(clock.advance(secs(100_000)).is_empty());
        assert!(clock.is_running());
        assert_eq!(clock.timeleft_seconds(), None);
        assert_eq!(clock.elapsed(), secs(100_000));
    }

    #[test]
    fn elapsed_excludes_paused_time() {
        let mut clock = started_clock(600);
        clock.advance(secs(5));
        clock.pause();
        clock.advance(secs(60));
        clock.resume(None);
        clock.advance(secs(2));
        assert_eq!(clock.elapsed(), secs(7));
    }

    #[test]
    fn set_time_left_zero_ends_running_round() {
        let mut clock = started_clock(600);
        let events = clock.set_time_left(0);
        assert_eq!(
            events.as_slice(),
            &[
                ClockEvent::TimeLeftChanged { seconds: 0 },
                ClockEvent::IntermissionStarted,
            ]
        );
        assert!(clock.is_intermission());
    }

    proptest! {
        /// Advancing in arbitrary chunks is equivalent to one big advance,
        /// both in emitted events and in final clock state.
        #[test]
        fn advance_is_chunking_independent(chunks in prop::collection::vec(1u64..4000, 1..40)) {
            let total: u64 = chunks.iter().sum();

            let mut chunked = GameClock::new();
            chunked.start(secs(5), secs(3));
            chunked.resume(Some(2));
            let mut chunked_events = Vec::new();
            for ms in &chunks {
                chunked_events.extend(chunked.advance(Duration::from_millis(*ms)));
            }

            let mut whole = GameClock::new();
            whole.start(secs(5), secs(3));
            whole.resume(Some(2));
            let whole_events: Vec<_> = whole.advance(Duration::from_millis(total)).into_iter().collect();

            prop_assert_eq!(chunked_events, whole_events);
            prop_assert_eq!(chunked, whole);
        }
    }
}
