// src/migrate/anchor.rs
use chrono::{DateTime, Datelike, LocalResult, NaiveDate, NaiveDateTime, Offset, TimeDelta, TimeZone};
use chrono_tz::Tz;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

/// Layout of the next-billing-date column, e.g. `2024/07/15`.
pub const NEXT_BILL_FORMAT: &str = "%Y/%m/%d";

#[derive(Debug, Error)]
pub enum AnchorError {
    #[error("next billing date {0:?} is not laid out as YYYY/MM/DD")]
    DateLayout(String),

    #[error("cannot parse next billing date {value:?} as YYYY/MM/DD: {source}")]
    InvalidDate {
        value: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error("unsupported billing interval {0:?}")]
    UnknownInterval(String),
}

/// How to treat a billing interval that is neither monthly nor yearly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum UnknownInterval {
    /// Use a zero-length cadence: lapsed dates are not advanced and the cap is "now".
    #[default]
    NoAdvance,
    /// Fail the row, which aborts the run.
    Reject,
}

/// Billing cadence of the previous provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    Yearly,
    Monthly,
    None,
}

impl Cadence {
    /// Case-insensitive; anything unrecognised is `Cadence::None`.
    pub fn parse(interval: &str) -> Self {
        match interval.to_lowercase().as_str() {
            "yearly" => Cadence::Yearly,
            "monthly" => Cadence::Monthly,
            _ => Cadence::None,
        }
    }

    fn months(self) -> i32 {
        match self {
            Cadence::Yearly => 12,
            Cadence::Monthly => 1,
            Cadence::None => 0,
        }
    }

    /// Move `at` forward by one cadence step on the local wall clock.
    ///
    /// A day past the end of the target month rolls into the next month,
    /// so Jan 31 + 1 month is Mar 2 or Mar 3.
    pub fn advance(self, at: DateTime<Tz>) -> DateTime<Tz> {
        let months = self.months();
        if months == 0 {
            return at;
        }
        let local = at.naive_local();
        match add_months(local, months) {
            Some(naive) => localize(&at.timezone(), naive),
            None => {
                debug!(%at, months, "cadence step leaves chrono's range, date kept");
                at
            }
        }
    }
}

fn add_months(at: NaiveDateTime, months: i32) -> Option<NaiveDateTime> {
    let total = at.year() * 12 + at.month0() as i32 + months;
    let first = NaiveDate::from_ymd_opt(total.div_euclid(12), total.rem_euclid(12) as u32 + 1, 1)?;
    let date = first.checked_add_days(chrono::Days::new(u64::from(at.day() - 1)))?;
    Some(date.and_time(at.time()))
}

/// Attach `tz` to a wall-clock time.
///
/// Ambiguous times take the earlier instant. Times inside a DST gap are read
/// with the offset in force after the gap, which lands them before it, on the
/// wall clock of the pre-transition offset.
pub fn localize(tz: &Tz, naive: NaiveDateTime) -> DateTime<Tz> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => dt,
        LocalResult::Ambiguous(earliest, _) => earliest,
        LocalResult::None => {
            let after = tz
                .offset_from_utc_datetime(&(naive + TimeDelta::days(1)))
                .fix()
                .local_minus_utc();
            tz.from_utc_datetime(&(naive - TimeDelta::seconds(i64::from(after))))
        }
    }
}

/// Parse a next billing date; exactly four-digit year, two-digit month and day.
fn parse_next_bill(value: &str) -> Result<NaiveDate, AnchorError> {
    let fixed_width = value.len() == 10
        && value.bytes().enumerate().all(|(i, b)| match i {
            4 | 7 => b == b'/',
            _ => b.is_ascii_digit(),
        });
    if !fixed_width {
        return Err(AnchorError::DateLayout(value.to_string()));
    }
    NaiveDate::parse_from_str(value, NEXT_BILL_FORMAT).map_err(|source| AnchorError::InvalidDate {
        value: value.to_string(),
        source,
    })
}

fn local_midnight(tz: &Tz, date: NaiveDate) -> DateTime<Tz> {
    localize(tz, date.and_time(chrono::NaiveTime::MIN))
}

/// Compute the billing cycle anchor as Unix seconds.
///
/// `next_bill` is parsed as local midnight in `now`'s timezone. A next bill
/// date already behind `now` is advanced once by the cadence; the result is
/// then capped at `now` plus one cadence step and truncated to local midnight.
pub fn billing_cycle_anchor(
    interval: &str,
    next_bill: &str,
    now: DateTime<Tz>,
    unknown: UnknownInterval,
) -> Result<i64, AnchorError> {
    let tz = now.timezone();
    let date = parse_next_bill(next_bill)?;

    let cadence = Cadence::parse(interval);
    if cadence == Cadence::None && unknown == UnknownInterval::Reject {
        return Err(AnchorError::UnknownInterval(interval.to_string()));
    }

    let mut next = local_midnight(&tz, date);
    if now > next {
        next = cadence.advance(next);
    }
    let cap = cadence.advance(now);
    if cap < next {
        next = cap;
    }

    Ok(local_midnight(&tz, next.date_naive()).timestamp())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn utc_now(y: i32, m: u32, d: u32, h: u32) -> DateTime<Tz> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0)
            .unwrap()
            .with_timezone(&chrono_tz::UTC)
    }

    fn utc_midnight(y: i32, m: u32, d: u32) -> i64 {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap().timestamp()
    }

    fn anchor(interval: &str, next_bill: &str, now: DateTime<Tz>) -> i64 {
        billing_cycle_anchor(interval, next_bill, now, UnknownInterval::NoAdvance).unwrap()
    }

    #[test]
    fn cadence_is_case_insensitive() {
        assert_eq!(Cadence::parse("MONTHLY"), Cadence::Monthly);
        assert_eq!(Cadence::parse("Yearly"), Cadence::Yearly);
        assert_eq!(Cadence::parse("weekly"), Cadence::None);
        assert_eq!(Cadence::parse(""), Cadence::None);
    }

    #[test]
    fn upcoming_date_within_one_step_is_kept() {
        let now = utc_now(2024, 7, 1, 12);
        assert_eq!(anchor("Monthly", "2024/07/20", now), utc_midnight(2024, 7, 20));
        assert_eq!(anchor("Yearly", "2025/03/01", now), utc_midnight(2025, 3, 1));
    }

    #[test]
    fn lapsed_date_advances_one_step_only() {
        let now = utc_now(2024, 7, 1, 12);
        // repeatedly lapsed dates still only move forward once
        assert_eq!(anchor("Monthly", "2023/06/15", now), utc_midnight(2023, 7, 15));
        assert_eq!(anchor("yearly", "2024/03/10", now), utc_midnight(2025, 3, 10));
    }

    #[test]
    fn same_day_counts_as_lapsed() {
        let now = utc_now(2024, 7, 1, 12);
        assert_eq!(anchor("Monthly", "2024/07/01", now), utc_midnight(2024, 8, 1));
    }

    #[test]
    fn far_future_date_is_capped_one_step_past_now() {
        let now = utc_now(2024, 7, 1, 12);
        assert_eq!(anchor("Monthly", "2024/12/01", now), utc_midnight(2024, 8, 1));
        assert_eq!(anchor("Yearly", "2027/01/01", now), utc_midnight(2025, 7, 1));
    }

    #[test]
    fn month_end_overflows_into_following_month() {
        let now = utc_now(2024, 2, 5, 12);
        assert_eq!(anchor("Monthly", "2024/01/31", now), utc_midnight(2024, 3, 2));
        let now = utc_now(2025, 3, 5, 12);
        assert_eq!(anchor("Yearly", "2024/02/29", now), utc_midnight(2025, 3, 1));
    }

    #[test]
    fn unknown_interval_without_advance() {
        let now = utc_now(2024, 7, 1, 12);
        // lapsed: stays put
        assert_eq!(anchor("weekly", "2024/06/01", now), utc_midnight(2024, 6, 1));
        // upcoming: collapses to today
        assert_eq!(anchor("", "2024/08/01", now), utc_midnight(2024, 7, 1));
    }

    #[test]
    fn unknown_interval_can_be_rejected() {
        let now = utc_now(2024, 7, 1, 12);
        let err = billing_cycle_anchor("weekly", "2024/08/01", now, UnknownInterval::Reject)
            .unwrap_err();
        assert!(matches!(err, AnchorError::UnknownInterval(ref i) if i == "weekly"));
    }

    #[test]
    fn malformed_date_is_an_error() {
        let now = utc_now(2024, 7, 1, 12);
        for bad in ["2024-13-40", "", "next week", "2024/7/9", "+2024/07/09", "2024/07/09 "] {
            let err = billing_cycle_anchor("Monthly", bad, now, UnknownInterval::NoAdvance)
                .unwrap_err();
            assert!(matches!(err, AnchorError::DateLayout(_)), "{bad}: {err:?}");
        }
        for bad in ["2024/13/40", "2023/02/29", "2024/00/10"] {
            let err = billing_cycle_anchor("Monthly", bad, now, UnknownInterval::NoAdvance)
                .unwrap_err();
            assert!(matches!(err, AnchorError::InvalidDate { .. }), "{bad}: {err:?}");
        }
    }

    #[test]
    fn midnight_is_local_to_the_timezone() {
        let halifax: Tz = "America/Halifax".parse().unwrap();
        let now = Utc
            .with_ymd_and_hms(2024, 7, 1, 12, 0, 0)
            .unwrap()
            .with_timezone(&halifax);
        // ADT is UTC-3
        let expected = Utc.with_ymd_and_hms(2024, 7, 20, 3, 0, 0).unwrap().timestamp();
        assert_eq!(anchor("Monthly", "2024/07/20", now), expected);
    }

    #[test]
    fn dst_gap_takes_the_offset_after_the_transition() {
        let ny: Tz = "America/New_York".parse().unwrap();
        let naive = NaiveDate::from_ymd_opt(2024, 3, 10)
            .unwrap()
            .and_hms_opt(2, 30, 0)
            .unwrap();
        let dt = localize(&ny, naive);
        // read as EDT, i.e. 01:30 EST
        assert_eq!(
            dt.with_timezone(&Utc),
            Utc.with_ymd_and_hms(2024, 3, 10, 6, 30, 0).unwrap()
        );
    }

    #[test]
    fn skipped_midnight_anchors_on_the_previous_day() {
        // Chile skips 2024-09-08 00:00 local, clocks jump to 01:00 (-03)
        let santiago: Tz = "America/Santiago".parse().unwrap();
        let now = Utc
            .with_ymd_and_hms(2024, 9, 1, 12, 0, 0)
            .unwrap()
            .with_timezone(&santiago);
        // Sep 7 00:00 at -04
        let expected = Utc.with_ymd_and_hms(2024, 9, 7, 4, 0, 0).unwrap().timestamp();
        assert_eq!(expected, 1_725_681_600);
        assert_eq!(anchor("Monthly", "2024/09/08", now), expected);
    }

    #[test]
    fn out_of_range_step_keeps_the_date() {
        let at = chrono_tz::UTC.from_utc_datetime(&NaiveDateTime::MAX);
        assert_eq!(Cadence::Monthly.advance(at), at);
        assert_eq!(Cadence::Yearly.advance(at), at);
    }
}
