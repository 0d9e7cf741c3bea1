//! Local weekday/time-of-day source and weekly-window admission check for
//! the Queue Manager's schedule gate (spec §4.6).
//!
//! No `chrono`/`time` dependency exists anywhere in this workspace (see
//! [`crate::model::now_iso8601`]'s doc comment), and a schedule window is
//! defined in local wall-clock time, which `now_iso8601`'s UTC arithmetic
//! can't give us. `libc`'s `time`/`localtime_r` is already a direct,
//! unix-only dependency here (`crate::storage` uses `posix_fallocate` the
//! same way), so the schedule gate reaches for the same FFI rather than
//! pulling in a new crate for one struct.

use crate::model::{Schedule, Weekday};

/// Returns the caller's local weekday and minutes-since-local-midnight,
/// read via `localtime_r` so DST and the process's `TZ` are honored.
#[cfg(unix)]
pub fn local_weekday_and_minute() -> (Weekday, u16) {
    // Safety: `time(NULL)` cannot fail; `localtime_r` writes into a
    // stack-local `tm` we own and never retains the pointer past this call.
    unsafe {
        let now = libc::time(std::ptr::null_mut());
        let mut tm: libc::tm = std::mem::zeroed();
        libc::localtime_r(&now, &mut tm);
        let weekday = weekday_from_tm_wday(tm.tm_wday);
        let minute_of_day = (tm.tm_hour as u16) * 60 + (tm.tm_min as u16);
        (weekday, minute_of_day)
    }
}

/// Stub for non-Unix: treats local time as UTC (no libc `tm` available).
#[cfg(not(unix))]
pub fn local_weekday_and_minute() -> (Weekday, u16) {
    let secs = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    let days = (secs / 86_400) as i64;
    let minute_of_day = ((secs % 86_400) / 60) as u16;
    // 1970-01-01 was a Thursday.
    let weekday = match ((days % 7) + 7) % 7 {
        0 => Weekday::Thu,
        1 => Weekday::Fri,
        2 => Weekday::Sat,
        3 => Weekday::Sun,
        4 => Weekday::Mon,
        5 => Weekday::Tue,
        _ => Weekday::Wed,
    };
    (weekday, minute_of_day)
}

/// `tm_wday` is 0=Sunday..6=Saturday; [`Weekday`] is Monday-first.
#[cfg(unix)]
fn weekday_from_tm_wday(tm_wday: i32) -> Weekday {
    match tm_wday {
        0 => Weekday::Sun,
        1 => Weekday::Mon,
        2 => Weekday::Tue,
        3 => Weekday::Wed,
        4 => Weekday::Thu,
        5 => Weekday::Fri,
        _ => Weekday::Sat,
    }
}

/// Whether `schedule` currently admits, given the caller's local `weekday`
/// and `minute_of_day` (spec §4.6, property P7). A schedule with an empty
/// `days` list never admits. `end_hhmm < start_hhmm` expresses a window
/// wrapping past midnight (e.g. 22:00-06:00): such a window also admits on
/// the *following* day up to `end_hhmm`, so the day check alone is not
/// sufficient — a window that started yesterday and hasn't ended yet must
/// still admit even on a day not listed in `days`, as long as *yesterday*
/// was listed.
pub fn schedule_admits(schedule: &Schedule, weekday: Weekday, minute_of_day: u16) -> bool {
    if schedule.days.is_empty() {
        return false;
    }
    let wraps = schedule.end_hhmm < schedule.start_hhmm;

    if !wraps {
        return schedule.days.contains(&weekday) && in_range(minute_of_day, schedule.start_hhmm, schedule.end_hhmm, false);
    }

    let starts_today = schedule.days.contains(&weekday) && minute_of_day >= schedule.start_hhmm;
    let continues_from_yesterday =
        schedule.days.contains(&previous_weekday(weekday)) && minute_of_day <= schedule.end_hhmm;
    starts_today || continues_from_yesterday
}

/// Spec §4.6: "the `HH:MM` minute-of-day must fall in `[start, end]`
/// (inclusive)". Both bounds are inclusive.
fn in_range(minute_of_day: u16, start: u16, end: u16, _wraps: bool) -> bool {
    minute_of_day >= start && minute_of_day <= end
}

fn previous_weekday(weekday: Weekday) -> Weekday {
    match weekday {
        Weekday::Mon => Weekday::Sun,
        Weekday::Tue => Weekday::Mon,
        Weekday::Wed => Weekday::Tue,
        Weekday::Thu => Weekday::Wed,
        Weekday::Fri => Weekday::Thu,
        Weekday::Sat => Weekday::Fri,
        Weekday::Sun => Weekday::Sat,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schedule(start: u16, end: u16, days: &[Weekday]) -> Schedule {
        Schedule {
            start_hhmm: start,
            end_hhmm: end,
            days: days.to_vec(),
        }
    }

    #[test]
    fn non_wrapping_window_admits_inside_and_refuses_outside() {
        let s = schedule(60, 300, &[Weekday::Mon]);
        assert!(schedule_admits(&s, Weekday::Mon, 60));
        assert!(schedule_admits(&s, Weekday::Mon, 299));
        // end_hhmm is inclusive (spec §4.6: "[start, end] (inclusive)").
        assert!(schedule_admits(&s, Weekday::Mon, 300));
        assert!(!schedule_admits(&s, Weekday::Mon, 301));
        assert!(!schedule_admits(&s, Weekday::Mon, 59));
        assert!(!schedule_admits(&s, Weekday::Tue, 100));
    }

    #[test]
    fn wrapping_window_admits_across_midnight() {
        // 22:00 (1320) -> 06:00 (360), active Friday night into Saturday.
        let s = schedule(1320, 360, &[Weekday::Fri]);
        assert!(schedule_admits(&s, Weekday::Fri, 1320));
        assert!(schedule_admits(&s, Weekday::Fri, 23 * 60));
        // Past midnight: weekday is now Saturday, but the window continues
        // because Friday (the day it started) was listed.
        assert!(schedule_admits(&s, Weekday::Sat, 0));
        assert!(schedule_admits(&s, Weekday::Sat, 359));
        // end_hhmm is inclusive on the wrap tail too.
        assert!(schedule_admits(&s, Weekday::Sat, 360));
        assert!(!schedule_admits(&s, Weekday::Sat, 361));
        // Saturday is not itself a listed day, so a fresh window never
        // starts on Saturday evening.
        assert!(!schedule_admits(&s, Weekday::Sat, 1320));
    }

    #[test]
    fn empty_days_never_admits() {
        let s = schedule(0, 1440, &[]);
        assert!(!schedule_admits(&s, Weekday::Mon, 500));
    }
}
