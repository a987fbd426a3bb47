use chrono::{DateTime, Local, NaiveDate, TimeZone, Utc};

use crate::types::{FireTime, Timezone};

/// Next instant `fire` occurs in `tz`, strictly after `now`.
///
/// Today's occurrence only counts while it is still in the future; at the
/// exact fire instant the result is already tomorrow, so a single check cycle
/// can never schedule the same instant twice.
///
/// Returns `None` only when no occurrence exists within the next few days,
/// which no real timezone produces.
pub fn next_occurrence_of(
    fire: FireTime,
    tz: &Timezone,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    match tz {
        Timezone::Utc => next_in_zone(&Utc, fire, now),
        Timezone::Local => next_in_zone(&Local, fire, now),
        Timezone::Fixed(offset) => next_in_zone(offset, fire, now),
    }
}

fn next_in_zone<Tz: TimeZone>(tz: &Tz, fire: FireTime, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let local_now = now.with_timezone(tz);
    let mut date = local_now.date_naive();
    // Today's candidate may already be in the past, and a DST gap can swallow
    // a day's fire time entirely, so walk forward a few days.
    for _ in 0..4 {
        if let Some(candidate) = at_fire_time(tz, date, fire) {
            if candidate > local_now {
                return Some(candidate.with_timezone(&Utc));
            }
        }
        date = date.succ_opt()?;
    }
    None
}

fn at_fire_time<Tz: TimeZone>(tz: &Tz, date: NaiveDate, fire: FireTime) -> Option<DateTime<Tz>> {
    let naive = date.and_hms_opt(fire.hour as u32, fire.minute as u32, 0)?;
    // `earliest` resolves a DST fold to its first occurrence and a gap to None.
    tz.from_local_datetime(&naive).earliest()
}
