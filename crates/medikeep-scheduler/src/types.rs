use chrono::{DateTime, Duration, FixedOffset, Local, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Fire time on a fresh install: 23:00, after the clinic closes.
pub const DEFAULT_FIRE_TIME: FireTime = FireTime { hour: 23, minute: 0 };

/// Wall-clock time of day the backup fires, minute granularity.
///
/// Parses from and serializes to `"HH:MM"` (24h), the shape the dashboard's
/// time picker produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FireTime {
    pub hour: u8,
    pub minute: u8,
}

impl std::fmt::Display for FireTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl std::str::FromStr for FireTime {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let invalid = || format!("invalid fire time: {s:?} (expected \"HH:MM\", 24h)");
        let (hour, minute) = s.split_once(':').ok_or_else(invalid)?;
        let hour: u8 = hour.trim().parse().map_err(|_| invalid())?;
        let minute: u8 = minute.trim().parse().map_err(|_| invalid())?;
        if hour > 23 || minute > 59 {
            return Err(invalid());
        }
        Ok(Self { hour, minute })
    }
}

impl Serialize for FireTime {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for FireTime {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Timezone the fire time is interpreted in.
///
/// Covers the deployments the dashboard sees in practice: UTC, the host's
/// local zone, or a fixed UTC offset ("+05:30", "UTC-04:00"). Unrecognized
/// names are rejected at parse time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timezone {
    Utc,
    Local,
    Fixed(FixedOffset),
}

impl Default for Timezone {
    fn default() -> Self {
        Timezone::Utc
    }
}

impl Timezone {
    /// Naive local date-time of a UTC instant in this zone. Drives both the
    /// fire-minute match and the same-day guard.
    pub fn to_local(&self, instant: DateTime<Utc>) -> NaiveDateTime {
        match self {
            Timezone::Utc => instant.naive_utc(),
            Timezone::Local => instant.with_timezone(&Local).naive_local(),
            Timezone::Fixed(offset) => instant.with_timezone(offset).naive_local(),
        }
    }
}

impl std::fmt::Display for Timezone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Timezone::Utc => write!(f, "UTC"),
            Timezone::Local => write!(f, "local"),
            Timezone::Fixed(offset) => {
                let secs = offset.local_minus_utc();
                let sign = if secs < 0 { '-' } else { '+' };
                let abs = secs.abs();
                write!(f, "{sign}{:02}:{:02}", abs / 3600, (abs % 3600) / 60)
            }
        }
    }
}

impl std::str::FromStr for Timezone {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("utc") {
            return Ok(Timezone::Utc);
        }
        if trimmed.eq_ignore_ascii_case("local") {
            return Ok(Timezone::Local);
        }
        let offset = trimmed
            .strip_prefix("UTC")
            .or_else(|| trimmed.strip_prefix("utc"))
            .unwrap_or(trimmed);
        parse_fixed_offset(offset).map(Timezone::Fixed).ok_or_else(|| {
            format!("unrecognized timezone: {s:?} (expected \"UTC\", \"local\", or an offset like \"+05:30\")")
        })
    }
}

fn parse_fixed_offset(s: &str) -> Option<FixedOffset> {
    let (sign, rest) = match s.as_bytes().first()? {
        b'+' => (1i32, &s[1..]),
        b'-' => (-1i32, &s[1..]),
        _ => return None,
    };
    let (hours, minutes) = rest.split_once(':')?;
    let hours: i32 = hours.parse().ok()?;
    let minutes: i32 = minutes.parse().ok()?;
    if !(0..=23).contains(&hours) || !(0..=59).contains(&minutes) {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

impl Serialize for Timezone {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Timezone {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// The sole persisted scheduler entity.
///
/// Wire shape (schedule.json):
/// `{"enabled":true,"time":"23:00","timezone":"UTC","lastRun":null,"nextRun":"…"}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleState {
    pub enabled: bool,
    #[serde(rename = "time")]
    pub fire_time: FireTime,
    pub timezone: Timezone,
    /// When the last attempt started, if any.
    #[serde(rename = "lastRun")]
    pub last_run_at: Option<DateTime<Utc>>,
    /// Next instant the scheduler intends to fire. Always strictly in the
    /// future at recomputation time, never more than 24h out.
    #[serde(rename = "nextRun")]
    pub next_run_at: DateTime<Utc>,
}

impl ScheduleState {
    /// First-start defaults: enabled, 23:00 UTC, next occurrence from `now`.
    pub fn bootstrap(now: DateTime<Utc>) -> Self {
        let fire_time = DEFAULT_FIRE_TIME;
        let timezone = Timezone::Utc;
        let next_run_at = crate::schedule::next_occurrence_of(fire_time, &timezone, now)
            // UTC has no gaps, so the occurrence always exists.
            .unwrap_or(now + Duration::days(1));
        Self {
            enabled: true,
            fire_time,
            timezone,
            last_run_at: None,
            next_run_at,
        }
    }
}

/// Partial schedule update; absent fields keep their current value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SchedulePatch {
    pub enabled: Option<bool>,
    #[serde(rename = "time")]
    pub fire_time: Option<FireTime>,
    pub timezone: Option<Timezone>,
}

/// Read-only view assembled on demand, never stored.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub running: bool,
    pub enabled: bool,
    pub next_run_at: DateTime<Utc>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub time_until_next_secs: i64,
}
