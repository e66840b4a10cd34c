//! Locale-aware extraction of absolute time ranges from free text.
//! Pure and side-effect-free: given a text and a reference instant, always
//! returns the same ranges.

pub mod chinese_numerals;
mod patterns;

use crate::types::TimeRange;
use chinese_numerals::parse_numeral;
use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use patterns::{PatternTag, LITERAL_PHRASES, PATTERNS};
use std::collections::HashSet;
use std::str::FromStr;

/// Extracts zero or more absolute day ranges from free text, interpreting
/// relative phrases ("今天", "三天前", "上周") against a configured IANA
/// time zone.
pub struct TimeExpressionParser {
    zone: Tz,
}

impl Default for TimeExpressionParser {
    fn default() -> Self {
        Self {
            zone: Tz::Asia__Shanghai,
        }
    }
}

impl TimeExpressionParser {
    /// A parser for the given IANA zone name (e.g. `"Asia/Shanghai"`).
    /// Falls back to `Asia/Shanghai` if `zone_name` is not a recognized
    /// IANA zone.
    #[must_use]
    pub fn new(zone_name: &str) -> Self {
        let zone = Tz::from_str(zone_name).unwrap_or(Tz::Asia__Shanghai);
        Self { zone }
    }

    /// Parse `text` against the reference instant `now`, returning
    /// deduplicated half-open day ranges `[start, end)` in UTC.
    #[must_use]
    pub fn parse_at(&self, text: &str, now: DateTime<Utc>) -> Vec<TimeRange> {
        let today = now.with_timezone(&self.zone).date_naive();
        let mut seen: HashSet<(DateTime<Utc>, DateTime<Utc>)> = HashSet::new();
        let mut ranges = Vec::new();

        for literal in LITERAL_PHRASES {
            if text.contains(literal.phrase) {
                self.push_single_day(&mut ranges, &mut seen, today - Duration::days(literal.days_ago));
            }
        }

        for tagged in PATTERNS.iter() {
            for capture in tagged.regex.captures_iter(text) {
                self.apply_pattern(tagged.tag, &capture, today, &mut ranges, &mut seen);
            }
        }

        ranges
    }

    /// Parse `text` against the current instant.
    #[must_use]
    pub fn parse(&self, text: &str) -> Vec<TimeRange> {
        self.parse_at(text, Utc::now())
    }

    /// Today's date in the parser's configured zone, as `YYYY-MM-DD`. Used
    /// as the query cache's date bucket for `Time`-modifier placeholders.
    #[must_use]
    pub fn today_string(&self) -> String {
        Utc::now().with_timezone(&self.zone).date_naive().to_string()
    }

    fn push_single_day(
        &self,
        ranges: &mut Vec<TimeRange>,
        seen: &mut HashSet<(DateTime<Utc>, DateTime<Utc>)>,
        day: NaiveDate,
    ) {
        self.push_range(ranges, seen, day, day + Duration::days(1));
    }

    fn push_range(
        &self,
        ranges: &mut Vec<TimeRange>,
        seen: &mut HashSet<(DateTime<Utc>, DateTime<Utc>)>,
        start_day: NaiveDate,
        end_day: NaiveDate,
    ) {
        let Some(start) = self.day_start_utc(start_day) else {
            return;
        };
        let Some(end) = self.day_start_utc(end_day) else {
            return;
        };
        if seen.insert((start, end)) {
            ranges.push(TimeRange { start, end });
        }
    }

    fn day_start_utc(&self, day: NaiveDate) -> Option<DateTime<Utc>> {
        let midnight = day.and_hms_opt(0, 0, 0)?;
        let local = self.zone.from_local_datetime(&midnight).single()?;
        Some(local.with_timezone(&Utc))
    }

    fn apply_pattern(
        &self,
        tag: PatternTag,
        capture: &regex::Captures<'_>,
        today: NaiveDate,
        ranges: &mut Vec<TimeRange>,
        seen: &mut HashSet<(DateTime<Utc>, DateTime<Utc>)>,
    ) {
        match tag {
            PatternTag::DaysAgo => {
                if let Some(n) = capture.get(1).and_then(|m| parse_numeral(m.as_str())) {
                    self.push_single_day(ranges, seen, today - Duration::days(i64::from(n)));
                }
            }
            PatternTag::WeeksAgo => {
                if let Some(n) = capture.get(1).and_then(|m| parse_numeral(m.as_str())) {
                    self.push_single_day(ranges, seen, today - Duration::weeks(i64::from(n)));
                }
            }
            PatternTag::MonthsAgo => {
                if let Some(n) = capture.get(1).and_then(|m| parse_numeral(m.as_str())) {
                    if let Some(day) = shift_months(today, -(i64::from(n))) {
                        self.push_single_day(ranges, seen, day);
                    }
                }
            }
            PatternTag::LastWeekday => {
                if let Some(weekday) = capture
                    .get(1)
                    .and_then(|m| m.as_str().chars().next())
                    .and_then(patterns::weekday_from_char)
                {
                    let day = last_weekday(today, weekday);
                    self.push_single_day(ranges, seen, day);
                }
            }
            PatternTag::ThisWeek => {
                let (start, end) = week_bounds(today, 0);
                self.push_range(ranges, seen, start, end);
            }
            PatternTag::LastWeek => {
                let (start, end) = week_bounds(today, -1);
                self.push_range(ranges, seen, start, end);
            }
            PatternTag::ThisMonth => {
                let (start, end) = month_bounds(today, 0);
                self.push_range(ranges, seen, start, end);
            }
            PatternTag::LastMonth => {
                let (start, end) = month_bounds(today, -1);
                self.push_range(ranges, seen, start, end);
            }
            PatternTag::LastMonthEarlyTen => {
                if let Some((start, end)) = last_month_ten_day(today, 0) {
                    self.push_range(ranges, seen, start, end);
                }
            }
            PatternTag::LastMonthMidTen => {
                if let Some((start, end)) = last_month_ten_day(today, 1) {
                    self.push_range(ranges, seen, start, end);
                }
            }
            PatternTag::LastMonthLateTen => {
                if let Some((start, end)) = last_month_ten_day(today, 2) {
                    self.push_range(ranges, seen, start, end);
                }
            }
        }
    }
}

fn shift_months(date: NaiveDate, delta: i64) -> Option<NaiveDate> {
    let total_months = i64::from(date.year()) * 12 + i64::from(date.month()) - 1 + delta;
    let year = (total_months.div_euclid(12)) as i32;
    let month = (total_months.rem_euclid(12)) as u32 + 1;
    let day = date.day().min(days_in_month(year, month));
    NaiveDate::from_ymd_opt(year, month, day)
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    };
    next.and_then(|d| d.pred_opt())
        .map(|d| d.day())
        .unwrap_or(28)
}

fn last_weekday(today: NaiveDate, target: chrono::Weekday) -> NaiveDate {
    let (start, _) = week_bounds(today, -1);
    start + Duration::days(i64::from(target.num_days_from_monday()))
}

/// `[start, end)` of the Monday-anchored week containing `today`, shifted by
/// `week_offset` whole weeks.
fn week_bounds(today: NaiveDate, week_offset: i64) -> (NaiveDate, NaiveDate) {
    let monday = today - Duration::days(i64::from(today.weekday().num_days_from_monday()));
    let start = monday + Duration::weeks(week_offset);
    (start, start + Duration::days(7))
}

/// `[start, end)` of the calendar month containing `today`, shifted by
/// `month_offset` whole months.
fn month_bounds(today: NaiveDate, month_offset: i64) -> (NaiveDate, NaiveDate) {
    let first_of_this_month = NaiveDate::from_ymd_opt(today.year(), today.month(), 1).unwrap();
    let start = shift_months(first_of_this_month, month_offset).unwrap_or(first_of_this_month);
    let end = shift_months(first_of_this_month, month_offset + 1).unwrap_or(start);
    (start, end)
}

/// `[start, end)` of one ten-day subdivision (`0` = 1st-10th, `1` =
/// 11th-20th, `2` = 21st-end) of last month.
fn last_month_ten_day(today: NaiveDate, third: u32) -> Option<(NaiveDate, NaiveDate)> {
    let (month_start, month_end) = month_bounds(today, -1);
    let start_day = 1 + third * 10;
    let start = NaiveDate::from_ymd_opt(month_start.year(), month_start.month(), start_day)?;
    let end = if third == 2 {
        month_end
    } else {
        NaiveDate::from_ymd_opt(month_start.year(), month_start.month(), start_day + 10)?
    };
    Some((start, end))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn reference_now() -> DateTime<Utc> {
        // 2026-07-28 is a Tuesday.
        Utc.with_ymd_and_hms(2026, 7, 28, 4, 0, 0).unwrap()
    }

    #[test]
    fn today_and_yesterday_are_distinct_single_day_ranges() {
        let parser = TimeExpressionParser::default();
        let ranges = parser.parse_at("今天和昨天发生了什么", reference_now());
        assert_eq!(ranges.len(), 2);
        assert!(ranges[0].start < ranges[1].start || ranges[1].start < ranges[0].start);
    }

    #[test]
    fn chinese_numeral_days_ago_matches_arabic() {
        let parser = TimeExpressionParser::default();
        let arabic = parser.parse_at("3天前发生了什么", reference_now());
        let chinese = parser.parse_at("三天前发生了什么", reference_now());
        assert_eq!(arabic, chinese);
    }

    #[test]
    fn this_week_and_last_week_do_not_overlap() {
        let parser = TimeExpressionParser::default();
        let this_week = parser.parse_at("本周做了什么", reference_now());
        let last_week = parser.parse_at("上周做了什么", reference_now());
        assert_eq!(this_week.len(), 1);
        assert_eq!(last_week.len(), 1);
        assert!(this_week[0].start >= last_week[0].end);
    }

    #[test]
    fn last_month_ten_day_subdivisions_are_sequential() {
        let parser = TimeExpressionParser::default();
        let early = parser.parse_at("上月上旬做了什么", reference_now());
        let mid = parser.parse_at("上月中旬做了什么", reference_now());
        let late = parser.parse_at("上月下旬做了什么", reference_now());
        assert_eq!(early[0].end, mid[0].start);
        assert_eq!(mid[0].end, late[0].start);
    }

    #[test]
    fn duplicate_phrases_deduplicate_to_one_range() {
        let parser = TimeExpressionParser::default();
        let ranges = parser.parse_at("今天,今天,今日", reference_now());
        assert_eq!(ranges.len(), 1);
    }

    #[test]
    fn is_idempotent() {
        let parser = TimeExpressionParser::default();
        let first = parser.parse_at("上周三发生了什么", reference_now());
        let second = parser.parse_at("上周三发生了什么", reference_now());
        assert_eq!(first, second);
    }
}
