use chrono::{Duration, NaiveDateTime, Weekday};
use rusqlite::Connection;

use crate::config::AppConfig;
use crate::db::queries;

#[derive(Debug, Clone, Copy)]
pub struct BusinessHours {
    pub open_hour: u32,
    pub close_hour: u32,
    pub closed_weekday: Weekday,
}

impl BusinessHours {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            open_hour: config.open_hour,
            close_hour: config.close_hour,
            closed_weekday: config.closed_weekday,
        }
    }

    fn closed_day_name(&self) -> &'static str {
        match self.closed_weekday {
            Weekday::Mon => "Mondays",
            Weekday::Tue => "Tuesdays",
            Weekday::Wed => "Wednesdays",
            Weekday::Thu => "Thursdays",
            Weekday::Fri => "Fridays",
            Weekday::Sat => "Saturdays",
            Weekday::Sun => "Sundays",
        }
    }
}

#[derive(Debug)]
pub enum SchedulingError {
    ClosedDay { day: &'static str },
    OutsideHours { open: u32, close: u32 },
}

impl std::fmt::Display for SchedulingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchedulingError::ClosedDay { day } => {
                write!(
                    f,
                    "We're closed on {day}. Can you pick another day and time?"
                )
            }
            SchedulingError::OutsideHours { open, close } => {
                write!(
                    f,
                    "Our booking hours are {open}:00-{close}:00. Can you choose a time within this window?"
                )
            }
        }
    }
}

/// A booking must start within `[open, close)` and its full duration must
/// end within `(open, close]`: ending exactly at closing time is allowed,
/// running past it is not.
pub fn validate_business_hours(
    start: &NaiveDateTime,
    duration_minutes: i64,
    hours: &BusinessHours,
) -> Result<(), SchedulingError> {
    use chrono::{Datelike, Timelike};

    if start.weekday() == hours.closed_weekday {
        return Err(SchedulingError::ClosedDay {
            day: hours.closed_day_name(),
        });
    }

    let outside = SchedulingError::OutsideHours {
        open: hours.open_hour,
        close: hours.close_hour,
    };

    if start.hour() < hours.open_hour || start.hour() >= hours.close_hour {
        return Err(outside);
    }

    let end = *start + Duration::minutes(duration_minutes);
    if end.date() != start.date() {
        return Err(outside);
    }
    if end.hour() > hours.close_hour || (end.hour() == hours.close_hour && end.minute() > 0) {
        return Err(outside);
    }

    Ok(())
}

/// Walks forward from the requested start in fixed steps, skipping the
/// closed weekday and off-hours candidates, and returns up to
/// `max_suggestions` starts whose full window is free.
#[allow(clippy::too_many_arguments)]
pub fn find_alternative_slots(
    conn: &Connection,
    from: &NaiveDateTime,
    duration_minutes: i64,
    hours: &BusinessHours,
    step_minutes: i64,
    horizon_days: i64,
    max_suggestions: usize,
    now: &NaiveDateTime,
) -> anyhow::Result<Vec<NaiveDateTime>> {
    let mut suggestions = Vec::with_capacity(max_suggestions);
    let horizon = *from + Duration::days(horizon_days);

    let mut candidate = *from + Duration::minutes(step_minutes);
    while candidate <= horizon && suggestions.len() < max_suggestions {
        if validate_business_hours(&candidate, duration_minutes, hours).is_ok() {
            let end = candidate + Duration::minutes(duration_minutes);
            if queries::is_window_available(conn, &candidate, &end, None, now)? {
                suggestions.push(candidate);
            }
        }
        candidate += Duration::minutes(step_minutes);
    }

    Ok(suggestions)
}

/// "Tue 03 Sep 2030, 10:00–11:00", the shape every customer-facing and
/// admin-facing message uses for a slot.
pub fn format_window(start: &NaiveDateTime, end: &NaiveDateTime) -> String {
    format!(
        "{}\u{2013}{}",
        start.format("%a %d %b %Y, %H:%M"),
        end.format("%H:%M")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn hours() -> BusinessHours {
        BusinessHours {
            open_hour: 9,
            close_hour: 18,
            closed_weekday: Weekday::Sun,
        }
    }

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").unwrap()
    }

    #[test]
    fn test_within_hours_ok() {
        // 2030-09-03 is a Tuesday
        assert!(validate_business_hours(&dt("2030-09-03 10:00"), 60, &hours()).is_ok());
        assert!(validate_business_hours(&dt("2030-09-03 09:00"), 60, &hours()).is_ok());
    }

    #[test]
    fn test_closed_day_rejected() {
        // 2030-09-08 is a Sunday
        let err = validate_business_hours(&dt("2030-09-08 10:00"), 60, &hours()).unwrap_err();
        assert!(matches!(err, SchedulingError::ClosedDay { .. }));
        assert!(err.to_string().contains("Sundays"));
    }

    #[test]
    fn test_start_outside_hours_rejected() {
        assert!(validate_business_hours(&dt("2030-09-03 08:30"), 60, &hours()).is_err());
        assert!(validate_business_hours(&dt("2030-09-03 18:00"), 60, &hours()).is_err());
        assert!(validate_business_hours(&dt("2030-09-03 20:00"), 60, &hours()).is_err());
    }

    #[test]
    fn test_end_may_touch_close_but_not_pass_it() {
        // 17:00 + 60min ends exactly at close
        assert!(validate_business_hours(&dt("2030-09-03 17:00"), 60, &hours()).is_ok());
        // 17:30 + 60min runs past close
        assert!(validate_business_hours(&dt("2030-09-03 17:30"), 60, &hours()).is_err());
    }

    #[test]
    fn test_alternatives_skip_taken_and_offhours() {
        let conn = db::init_db(":memory:").unwrap();
        let now = dt("2030-09-03 09:00");

        // 17:30 requested; next in-hours 60-minute start that day is none
        // (18:00 onward is closed), so suggestions land on Wednesday morning
        let alts = find_alternative_slots(
            &conn,
            &dt("2030-09-03 17:30"),
            60,
            &hours(),
            30,
            7,
            3,
            &now,
        )
        .unwrap();

        assert_eq!(alts.len(), 3);
        assert_eq!(alts[0], dt("2030-09-04 09:00"));
        assert_eq!(alts[1], dt("2030-09-04 09:30"));
        assert_eq!(alts[2], dt("2030-09-04 10:00"));
    }

    #[test]
    fn test_alternatives_avoid_held_windows() {
        let conn = db::init_db(":memory:").unwrap();
        let now = dt("2030-09-03 09:00");
        queries::create_hold(
            &conn,
            "+6590000001",
            "car_wash",
            &dt("2030-09-03 10:30"),
            &dt("2030-09-03 11:30"),
            60,
            &now,
        )
        .unwrap();

        let alts = find_alternative_slots(
            &conn,
            &dt("2030-09-03 10:00"),
            60,
            &hours(),
            30,
            7,
            2,
            &now,
        )
        .unwrap();

        // 10:30 and 11:00 collide with the hold; the first free start is 11:30
        assert_eq!(alts, vec![dt("2030-09-03 11:30"), dt("2030-09-03 12:00")]);
    }

    #[test]
    fn test_alternatives_skip_closed_day() {
        let conn = db::init_db(":memory:").unwrap();
        let now = dt("2030-09-07 09:00");

        // Saturday 17:30 request; Sunday is skipped entirely
        let alts = find_alternative_slots(
            &conn,
            &dt("2030-09-07 17:30"),
            60,
            &hours(),
            30,
            7,
            1,
            &now,
        )
        .unwrap();

        assert_eq!(alts, vec![dt("2030-09-09 09:00")]);
    }

    #[test]
    fn test_alternatives_empty_when_horizon_exhausted() {
        let conn = db::init_db(":memory:").unwrap();
        let now = dt("2030-09-03 09:00");

        // a 10-hour service can never fit the 9-18 window
        let alts = find_alternative_slots(
            &conn,
            &dt("2030-09-03 10:00"),
            600,
            &hours(),
            30,
            2,
            3,
            &now,
        )
        .unwrap();
        assert!(alts.is_empty());
    }

    #[test]
    fn test_format_window() {
        let s = format_window(&dt("2030-09-03 10:00"), &dt("2030-09-03 11:00"));
        assert_eq!(s, "Tue 03 Sep 2030, 10:00\u{2013}11:00");
    }
}
