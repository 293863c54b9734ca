use chrono::{Duration, NaiveDateTime, Utc};

/// Current wall-clock time in the business timezone, expressed as a naive
/// local datetime. The business runs in a single fixed timezone, so a plain
/// UTC offset is enough.
pub fn now_local(tz_offset_minutes: i64) -> NaiveDateTime {
    Utc::now().naive_utc() + Duration::minutes(tz_offset_minutes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offset_applied() {
        let utc = now_local(0);
        let sgt = now_local(480);
        let diff = sgt - utc;
        // the two calls straddle an instant; allow a second of slack
        assert!(diff >= Duration::minutes(480) - Duration::seconds(1));
        assert!(diff <= Duration::minutes(480) + Duration::seconds(1));
    }
}
