//! Wall-clock triggers for profile runs.
//!
//! A [`ScheduleEntry`] names a profile and the weekday/time it should run at.
//! Matching is to the minute; the scheduler loop decides what to do with a
//! match (fire, or drop it when a run is already active).

use crate::error::{CoreError, Result};
use chrono::{Datelike, NaiveDateTime, NaiveTime, Timelike, Weekday};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

// ---------------------------------------------------------------------------
// ScheduleEntry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    /// Unique label, used for the once-per-day bookkeeping.
    pub name: String,
    /// Profile to run, by name.
    pub profile: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Days to fire on. Empty means every day.
    #[serde(
        default,
        serialize_with = "serialize_days",
        deserialize_with = "deserialize_days",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub days: Vec<Weekday>,
    /// Local time of day, `HH:MM`.
    #[serde(serialize_with = "serialize_time", deserialize_with = "deserialize_time")]
    pub time: NaiveTime,
}

fn default_enabled() -> bool {
    true
}

impl ScheduleEntry {
    pub fn new(name: impl Into<String>, profile: impl Into<String>, time: NaiveTime) -> Self {
        Self {
            name: name.into(),
            profile: profile.into(),
            enabled: true,
            days: Vec::new(),
            time,
        }
    }

    pub fn on_days(mut self, days: impl IntoIterator<Item = Weekday>) -> Self {
        self.days = days.into_iter().collect();
        self
    }

    pub fn runs_on(&self, day: Weekday) -> bool {
        self.days.is_empty() || self.days.contains(&day)
    }

    /// True when `now` falls on a selected day and in the configured minute.
    pub fn matches(&self, now: NaiveDateTime) -> bool {
        self.enabled
            && self.runs_on(now.weekday())
            && now.hour() == self.time.hour()
            && now.minute() == self.time.minute()
    }
}

// ---------------------------------------------------------------------------
// Parsing helpers
// ---------------------------------------------------------------------------

pub fn parse_time(s: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(s.trim(), "%H:%M").map_err(|_| CoreError::InvalidTime(s.to_string()))
}

/// English day names or three-letter abbreviations, any case.
pub fn parse_weekday(s: &str) -> Result<Weekday> {
    s.trim()
        .parse::<Weekday>()
        .map_err(|_| CoreError::InvalidWeekday(s.to_string()))
}

fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "monday",
        Weekday::Tue => "tuesday",
        Weekday::Wed => "wednesday",
        Weekday::Thu => "thursday",
        Weekday::Fri => "friday",
        Weekday::Sat => "saturday",
        Weekday::Sun => "sunday",
    }
}

fn serialize_time<S: Serializer>(t: &NaiveTime, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_str(&t.format("%H:%M").to_string())
}

fn deserialize_time<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<NaiveTime, D::Error> {
    let raw = String::deserialize(d)?;
    parse_time(&raw).map_err(serde::de::Error::custom)
}

fn serialize_days<S: Serializer>(days: &[Weekday], s: S) -> std::result::Result<S::Ok, S::Error> {
    s.collect_seq(days.iter().map(|d| weekday_name(*d)))
}

fn deserialize_days<'de, D: Deserializer<'de>>(
    d: D,
) -> std::result::Result<Vec<Weekday>, D::Error> {
    let raw: Vec<String> = Vec::deserialize(d)?;
    let mut days = Vec::with_capacity(raw.len());
    for name in &raw {
        let day = parse_weekday(name).map_err(serde::de::Error::custom)?;
        if !days.contains(&day) {
            days.push(day);
        }
    }
    Ok(days)
}
