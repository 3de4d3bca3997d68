//! Chess clock: pure time bookkeeping in [`ClockState`] and the
//! [`ChessClock`] coordinator that owns the periodic ticker.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chess::PlayerSide;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// How often a running clock is refreshed.
pub const TICK_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeControl {
    Unlimited,
    Timed { base: Duration, increment: Duration },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClockError {
    #[error("Invalid time control '{0}': expected 'unlimited' or 'minutes|increment'")]
    InvalidPreset(String),
}

impl FromStr for TimeControl {
    type Err = ClockError;

    /// Parses `unlimited` or `minutes|incrementSeconds`, e.g. `5|3`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("unlimited") {
            return Ok(Self::Unlimited);
        }
        let invalid = || ClockError::InvalidPreset(s.to_string());
        let (minutes, increment) = s.split_once('|').unwrap_or((s, "0"));
        let minutes: u64 = minutes.trim().parse().map_err(|_| invalid())?;
        let increment: u64 = match increment.trim() {
            "" => 0,
            value => value.parse().map_err(|_| invalid())?,
        };
        let seconds = minutes
            .checked_mul(60)
            .filter(|seconds| *seconds > 0)
            .ok_or_else(invalid)?;
        Ok(Self::Timed {
            base: Duration::from_secs(seconds),
            increment: Duration::from_secs(increment),
        })
    }
}

impl fmt::Display for TimeControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unlimited => write!(f, "unlimited"),
            Self::Timed { base, increment } => {
                write!(f, "{}|{}", base.as_secs() / 60, increment.as_secs())
            }
        }
    }
}

/// Remaining time per side. `None` remaining means unbounded.
#[derive(Debug, Clone)]
pub struct ClockState {
    control: TimeControl,
    white_remaining: Option<Duration>,
    black_remaining: Option<Duration>,
    active_side: Option<PlayerSide>,
    last_tick: Instant,
}

impl ClockState {
    pub fn new(control: TimeControl, now: Instant) -> Self {
        let base = match control {
            TimeControl::Unlimited => None,
            TimeControl::Timed { base, .. } => Some(base),
        };
        Self {
            control,
            white_remaining: base,
            black_remaining: base,
            active_side: None,
            last_tick: now,
        }
    }

    pub fn control(&self) -> TimeControl {
        self.control
    }

    pub fn is_timed(&self) -> bool {
        matches!(self.control, TimeControl::Timed { .. })
    }

    pub fn active_side(&self) -> Option<PlayerSide> {
        self.active_side
    }

    pub fn remaining(&self, side: PlayerSide) -> Option<Duration> {
        match side {
            PlayerSide::White => self.white_remaining,
            PlayerSide::Black => self.black_remaining,
        }
    }

    fn remaining_mut(&mut self, side: PlayerSide) -> &mut Option<Duration> {
        match side {
            PlayerSide::White => &mut self.white_remaining,
            PlayerSide::Black => &mut self.black_remaining,
        }
    }

    pub fn is_flag_fallen(&self, side: PlayerSide) -> bool {
        self.remaining(side) == Some(Duration::ZERO)
    }

    /// Start running `side`'s clock from `now`. Returns whether a clock is
    /// now running.
    pub fn switch_to(&mut self, side: PlayerSide, now: Instant) -> bool {
        if !self.is_timed() || self.is_flag_fallen(side) {
            return false;
        }
        self.active_side = Some(side);
        self.last_tick = now;
        true
    }

    /// Deduct the time elapsed since the previous tick from the active side.
    /// Returns the side whose flag fell, if any; its clock stops at zero.
    pub fn tick_at(&mut self, now: Instant) -> Option<PlayerSide> {
        let side = self.active_side?;
        let elapsed = now.saturating_duration_since(self.last_tick);
        self.last_tick = now;

        let remaining = self.remaining_mut(side).as_mut()?;
        *remaining = remaining.saturating_sub(elapsed);
        if remaining.is_zero() {
            self.active_side = None;
            return Some(side);
        }
        None
    }

    pub fn apply_increment(&mut self, side: PlayerSide) {
        let TimeControl::Timed { increment, .. } = self.control else {
            return;
        };
        if let Some(remaining) = self.remaining_mut(side) {
            *remaining = remaining.saturating_add(increment);
        }
    }

    pub fn stop(&mut self) {
        self.active_side = None;
    }
}

/// Marker sent by the [`Ticker`] on every interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockTick;

/// Periodic tick source. The task is aborted when the ticker is dropped.
#[derive(Debug)]
pub struct Ticker {
    handle: JoinHandle<()>,
}

impl Ticker {
    pub fn spawn(period: Duration, ticks: mpsc::UnboundedSender<ClockTick>) -> Self {
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick completes immediately.
            interval.tick().await;
            loop {
                interval.tick().await;
                if ticks.send(ClockTick).is_err() {
                    break;
                }
            }
        });
        Self { handle }
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Clock coordinator: owns the state and the ticker of the running side.
pub struct ChessClock {
    state: ClockState,
    ticker: Option<Ticker>,
    ticks: mpsc::UnboundedSender<ClockTick>,
}

impl ChessClock {
    /// Create a stopped clock. Ticks arrive on the returned receiver while a
    /// side's clock is running.
    pub fn new(control: TimeControl) -> (Self, mpsc::UnboundedReceiver<ClockTick>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let clock = Self {
            state: ClockState::new(control, Instant::now()),
            ticker: None,
            ticks: tx,
        };
        (clock, rx)
    }

    pub fn configure(&mut self, control: TimeControl) {
        self.ticker = None;
        self.state = ClockState::new(control, Instant::now());
        tracing::debug!("Clock configured: {}", control);
    }

    pub fn switch_to(&mut self, side: PlayerSide) {
        self.ticker = None;
        if self.state.switch_to(side, Instant::now()) {
            self.ticker = Some(Ticker::spawn(TICK_INTERVAL, self.ticks.clone()));
        }
    }

    /// Returns the side whose flag fell on this tick.
    pub fn tick(&mut self) -> Option<PlayerSide> {
        let flagged = self.state.tick_at(Instant::now());
        if let Some(side) = flagged {
            tracing::info!("{} flag fell", side.title());
            self.ticker = None;
        }
        flagged
    }

    pub fn apply_increment(&mut self, side: PlayerSide) {
        self.state.apply_increment(side);
    }

    pub fn stop(&mut self) {
        self.ticker = None;
        self.state.stop();
    }

    pub fn is_running(&self) -> bool {
        self.ticker.is_some()
    }

    pub fn state(&self) -> &ClockState {
        &self.state
    }

    pub fn remaining(&self, side: PlayerSide) -> Option<Duration> {
        self.state.remaining(side)
    }
}

/// `∞` when unbounded, `M:SS`, or `0:SS.t` under ten seconds.
pub fn format_clock(remaining: Option<Duration>) -> String {
    let Some(remaining) = remaining else {
        return "∞".to_string();
    };
    let total_secs = remaining.as_secs();
    let minutes = total_secs / 60;
    let seconds = total_secs % 60;

    if total_secs < 10 {
        let tenths = remaining.subsec_millis() / 100;
        format!("0:{:02}.{}", seconds, tenths)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timed(minutes: u64, increment: u64) -> TimeControl {
        TimeControl::Timed {
            base: Duration::from_secs(minutes * 60),
            increment: Duration::from_secs(increment),
        }
    }

    #[test]
    fn test_parse_presets() {
        assert_eq!("unlimited".parse::<TimeControl>().unwrap(), TimeControl::Unlimited);
        assert_eq!("5|3".parse::<TimeControl>().unwrap(), timed(5, 3));
        assert_eq!("10".parse::<TimeControl>().unwrap(), timed(10, 0));
        assert!(matches!(
            "fast".parse::<TimeControl>(),
            Err(ClockError::InvalidPreset(_))
        ));
        assert!("0|5".parse::<TimeControl>().is_err());
        assert_eq!(timed(3, 2).to_string(), "3|2");
    }

    #[test]
    fn test_oversized_preset_rejected() {
        assert!(matches!(
            "307445734561825862|0".parse::<TimeControl>(),
            Err(ClockError::InvalidPreset(_))
        ));
    }

    #[test]
    fn test_unlimited_never_runs() {
        let now = Instant::now();
        let mut clock = ClockState::new(TimeControl::Unlimited, now);
        assert!(!clock.switch_to(PlayerSide::White, now));
        assert_eq!(clock.tick_at(now + Duration::from_secs(3600)), None);
        clock.apply_increment(PlayerSide::White);
        assert_eq!(clock.remaining(PlayerSide::White), None);
    }

    #[test]
    fn test_tick_reduces_active_side() {
        let start = Instant::now();
        let mut clock = ClockState::new(timed(3, 0), start);
        clock.switch_to(PlayerSide::White, start);
        assert_eq!(clock.tick_at(start + Duration::from_secs(1)), None);
        assert_eq!(
            clock.remaining(PlayerSide::White),
            Some(Duration::from_secs(179))
        );
        assert_eq!(
            clock.remaining(PlayerSide::Black),
            Some(Duration::from_secs(180))
        );
    }

    #[test]
    fn test_tick_measures_from_previous_tick() {
        let start = Instant::now();
        let mut clock = ClockState::new(timed(1, 0), start);
        clock.switch_to(PlayerSide::Black, start);
        clock.tick_at(start + Duration::from_millis(200));
        clock.tick_at(start + Duration::from_millis(400));
        assert_eq!(
            clock.remaining(PlayerSide::Black),
            Some(Duration::from_millis(59_600))
        );
    }

    #[test]
    fn test_stopped_clock_does_not_tick() {
        let start = Instant::now();
        let mut clock = ClockState::new(timed(1, 0), start);
        clock.switch_to(PlayerSide::White, start);
        clock.stop();
        clock.tick_at(start + Duration::from_secs(10));
        assert_eq!(
            clock.remaining(PlayerSide::White),
            Some(Duration::from_secs(60))
        );
    }

    #[test]
    fn test_flag_falls_and_clamps() {
        let start = Instant::now();
        let mut clock = ClockState::new(timed(1, 0), start);
        clock.switch_to(PlayerSide::White, start);
        assert_eq!(
            clock.tick_at(start + Duration::from_secs(61)),
            Some(PlayerSide::White)
        );
        assert_eq!(clock.remaining(PlayerSide::White), Some(Duration::ZERO));
        assert_eq!(clock.active_side(), None);
        assert!(clock.is_flag_fallen(PlayerSide::White));
        // A fallen flag cannot be restarted.
        assert!(!clock.switch_to(PlayerSide::White, start));
    }

    #[test]
    fn test_increment() {
        let start = Instant::now();
        let mut clock = ClockState::new(timed(5, 3), start);
        clock.apply_increment(PlayerSide::Black);
        assert_eq!(
            clock.remaining(PlayerSide::Black),
            Some(Duration::from_secs(303))
        );
        assert_eq!(
            clock.remaining(PlayerSide::White),
            Some(Duration::from_secs(300))
        );
    }

    #[test]
    fn test_format_clock() {
        assert_eq!(format_clock(None), "∞");
        assert_eq!(format_clock(Some(Duration::from_secs(180))), "3:00");
        assert_eq!(format_clock(Some(Duration::from_secs(65))), "1:05");
        assert_eq!(format_clock(Some(Duration::from_millis(5300))), "0:05.3");
        assert_eq!(format_clock(Some(Duration::ZERO)), "0:00.0");
    }

    #[tokio::test]
    async fn test_ticker_drives_clock() {
        let (mut clock, mut ticks) = ChessClock::new(timed(1, 0));
        clock.switch_to(PlayerSide::White);
        assert!(clock.is_running());

        let tick = tokio::time::timeout(Duration::from_secs(2), ticks.recv())
            .await
            .unwrap();
        assert_eq!(tick, Some(ClockTick));
        assert_eq!(clock.tick(), None);
        assert!(clock.remaining(PlayerSide::White).unwrap() < Duration::from_secs(60));

        clock.stop();
        assert!(!clock.is_running());
        assert_eq!(clock.state().active_side(), None);
    }
}
