//! Tick gate - decides whether a tick runs the daily auto-checkout
//!
//! Each tick compares the local time of day against the cutoff and today's date
//! against the last successful run date.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{NaiveDate, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::domain::Category;
use crate::error::{Result, VisitrackError};

/// Daily cutoff as a 24h time of day, minute granularity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Cutoff {
    hour: u32,
    minute: u32,
}

impl Cutoff {
    pub fn new(hour: u32, minute: u32) -> Result<Self> {
        if hour > 23 || minute > 59 {
            return Err(VisitrackError::InvalidInput(format!(
                "cutoff {:02}:{:02} is not a valid time of day",
                hour, minute
            )));
        }
        Ok(Self { hour, minute })
    }

    /// Same hour and minute as `time`
    pub fn matches(&self, time: NaiveTime) -> bool {
        time.hour() == self.hour && time.minute() == self.minute
    }

    /// `time` is at or past the cutoff minute
    pub fn reached(&self, time: NaiveTime) -> bool {
        (time.hour(), time.minute()) >= (self.hour, self.minute)
    }
}

impl Default for Cutoff {
    fn default() -> Self {
        Self { hour: 1, minute: 0 }
    }
}

impl fmt::Display for Cutoff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl FromStr for Cutoff {
    type Err = VisitrackError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || VisitrackError::InvalidInput(format!("cutoff must be HH:MM (24h), got {:?}", s));
        let (hour, minute) = s.trim().split_once(':').ok_or_else(invalid)?;
        let digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
        if hour.is_empty() || hour.len() > 2 || minute.len() != 2 || !digits(hour) || !digits(minute) {
            return Err(invalid());
        }
        let hour = hour.parse().map_err(|_| invalid())?;
        let minute = minute.parse().map_err(|_| invalid())?;
        Self::new(hour, minute)
    }
}

/// When a tick may fire the daily run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TriggerPolicy {
    /// Only during the cutoff minute itself
    #[default]
    ExactMinute,
    /// Any time from the cutoff until midnight, so a run missed or failed at the
    /// cutoff is retried later the same day
    CatchUp,
}

impl fmt::Display for TriggerPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerPolicy::ExactMinute => f.write_str("exact-minute"),
            TriggerPolicy::CatchUp => f.write_str("catch-up"),
        }
    }
}

/// Configuration for the auto-checkout tick loop
#[derive(Debug, Clone)]
pub struct TickConfig {
    pub cutoff: Cutoff,
    /// Category whose open visits are closed
    pub target_category: Category,
    /// Interval between ticks
    pub tick_interval: Duration,
    pub policy: TriggerPolicy,
    /// Manual runs also count as today's run
    pub stamp_manual_runs: bool,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            cutoff: Cutoff::default(),
            target_category: Category::Factory,
            tick_interval: Duration::from_secs(60),
            policy: TriggerPolicy::ExactMinute,
            stamp_manual_runs: false,
        }
    }
}

impl TickConfig {
    pub fn new(cutoff: Cutoff, target_category: Category) -> Self {
        Self {
            cutoff,
            target_category,
            ..Self::default()
        }
    }

    pub fn with_tick_interval(mut self, tick_interval: Duration) -> Self {
        self.tick_interval = tick_interval;
        self
    }

    pub fn with_policy(mut self, policy: TriggerPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_stamp_manual_runs(mut self, stamp: bool) -> Self {
        self.stamp_manual_runs = stamp;
        self
    }

    /// The tick gate: fire iff the cutoff applies now and today has not run yet
    pub fn should_execute(&self, time: NaiveTime, today: NaiveDate, last_run_date: Option<NaiveDate>) -> bool {
        if last_run_date == Some(today) {
            return false;
        }
        match self.policy {
            TriggerPolicy::ExactMinute => self.cutoff.matches(time),
            TriggerPolicy::CatchUp => self.cutoff.reached(time),
        }
    }
}

/// What happened during a tick or manual run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickResult {
    /// Gate closed, nothing to do
    Idle,
    /// Bulk close ran and closed this many visits
    Executed(usize),
    /// Bulk close failed; the run will be retried per the trigger policy
    Deferred(String),
    /// Another execution was in flight
    Busy,
}

/// Tick state tracks what's happening between ticks
#[derive(Debug, Default, Clone)]
pub struct TickState {
    /// Local date of the last successful run
    pub last_run_date: Option<NaiveDate>,
    /// Number of ticks since start
    pub tick_count: u64,
    /// Successful executions, scheduled and manual
    pub executions: u64,
    /// Visits closed this session
    pub total_closed: u64,
    /// Failed executions this session
    pub failures: u64,
    /// Ticks skipped because an execution was in flight
    pub skipped: u64,
}

impl TickState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new tick
    pub fn tick(&mut self) {
        self.tick_count += 1;
    }

    /// Record a successful execution
    pub fn executed(&mut self, closed: usize) {
        self.executions += 1;
        self.total_closed += closed as u64;
    }

    pub fn failed(&mut self) {
        self.failures += 1;
    }

    pub fn skip(&mut self) {
        self.skipped += 1;
    }

    pub fn stamp(&mut self, date: NaiveDate) {
        self.last_run_date = Some(date);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn time(h: u32, m: u32, s: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, s).unwrap()
    }

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, d).unwrap()
    }

    #[test]
    fn test_cutoff_parse() {
        assert_eq!("01:00".parse::<Cutoff>().unwrap(), Cutoff::new(1, 0).unwrap());
        assert_eq!("23:59".parse::<Cutoff>().unwrap().to_string(), "23:59");
        assert_eq!("7:05".parse::<Cutoff>().unwrap().to_string(), "07:05");
    }

    #[test]
    fn test_cutoff_parse_rejects_garbage() {
        for bad in ["", "24:00", "12:60", "1200", "12:5", "aa:bb", "-1:00", "12:00:00", "12:+5", "+1:00", " 1: 00"] {
            assert!(bad.parse::<Cutoff>().is_err(), "accepted {:?}", bad);
        }
    }

    #[test]
    fn test_cutoff_matches_whole_minute() {
        let cutoff = Cutoff::default();
        assert!(cutoff.matches(time(1, 0, 0)));
        assert!(cutoff.matches(time(1, 0, 59)));
        assert!(!cutoff.matches(time(1, 1, 0)));
        assert!(!cutoff.matches(time(0, 59, 59)));
    }

    #[test]
    fn test_tick_config_default() {
        let config = TickConfig::default();
        assert_eq!(config.cutoff.to_string(), "01:00");
        assert_eq!(config.target_category, Category::Factory);
        assert_eq!(config.tick_interval, Duration::from_secs(60));
        assert_eq!(config.policy, TriggerPolicy::ExactMinute);
        assert!(!config.stamp_manual_runs);
    }

    #[test]
    fn test_exact_minute_gate() {
        let config = TickConfig::default();
        assert!(config.should_execute(time(1, 0, 30), date(2), Some(date(1))));
        assert!(config.should_execute(time(1, 0, 30), date(2), None));
        assert!(!config.should_execute(time(1, 0, 30), date(2), Some(date(2))));
        assert!(!config.should_execute(time(1, 1, 0), date(2), Some(date(1))));
    }

    #[test]
    fn test_catch_up_gate() {
        let config = TickConfig::default().with_policy(TriggerPolicy::CatchUp);
        assert!(config.should_execute(time(9, 30, 0), date(2), Some(date(1))));
        assert!(!config.should_execute(time(0, 59, 0), date(2), Some(date(1))));
        assert!(!config.should_execute(time(9, 30, 0), date(2), Some(date(2))));
    }

    #[test]
    fn test_trigger_policy_serde() {
        let policy: TriggerPolicy = serde_yaml::from_str("catch-up").unwrap();
        assert_eq!(policy, TriggerPolicy::CatchUp);
        assert_eq!(serde_yaml::to_string(&TriggerPolicy::ExactMinute).unwrap().trim(), "exact-minute");
    }

    #[test]
    fn test_tick_state_counters() {
        let mut state = TickState::new();
        state.tick();
        state.executed(3);
        state.failed();
        state.skip();
        state.stamp(date(2));
        assert_eq!(state.tick_count, 1);
        assert_eq!((state.executions, state.total_closed), (1, 3));
        assert_eq!((state.failures, state.skipped), (1, 1));
        assert_eq!(state.last_run_date, Some(date(2)));
    }
}
