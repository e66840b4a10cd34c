//! The locale table: literal day-offset phrases plus the tagged regex
//! patterns for relative time expressions.

use regex::Regex;
use std::sync::LazyLock;

/// What kind of relative expression a pattern matched, driving how
/// [`super::TimeExpressionParser`] turns the match into a day range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternTag {
    DaysAgo,
    WeeksAgo,
    MonthsAgo,
    LastWeekday,
    ThisWeek,
    LastWeek,
    ThisMonth,
    LastMonth,
    LastMonthEarlyTen,
    LastMonthMidTen,
    LastMonthLateTen,
}

/// A literal phrase with no embedded numeral, e.g. `今天` = 0 days ago.
pub struct LiteralPhrase {
    pub phrase: &'static str,
    pub days_ago: i64,
}

/// Literal phrase → offset-in-days table.
pub static LITERAL_PHRASES: &[LiteralPhrase] = &[
    LiteralPhrase { phrase: "大前天", days_ago: 3 },
    LiteralPhrase { phrase: "前天", days_ago: 2 },
    LiteralPhrase { phrase: "昨天", days_ago: 1 },
    LiteralPhrase { phrase: "今天", days_ago: 0 },
    LiteralPhrase { phrase: "今日", days_ago: 0 },
];

pub struct TaggedPattern {
    pub tag: PatternTag,
    pub regex: &'static LazyLock<Regex>,
}

static DAYS_AGO_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([0-9零一二三四五六七八九十两]+)\s*天前").unwrap());
static WEEKS_AGO_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([0-9零一二三四五六七八九十两]+)\s*(?:周|星期)前").unwrap());
static MONTHS_AGO_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([0-9零一二三四五六七八九十两]+)\s*个?月前").unwrap());
static LAST_WEEKDAY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"上(?:周|星期)([一二三四五六日天])").unwrap());
static THIS_WEEK_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"本周|这周|这星期").unwrap());
static LAST_WEEK_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"上周|上星期").unwrap());
static THIS_MONTH_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"本月|这个月").unwrap());
static LAST_MONTH_EARLY_TEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"上(?:个)?月上旬").unwrap());
static LAST_MONTH_MID_TEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"上(?:个)?月中旬").unwrap());
static LAST_MONTH_LATE_TEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"上(?:个)?月下旬").unwrap());
static LAST_MONTH_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"上(?:个)?月").unwrap());

/// All patterns, ordered most-specific first: the ten-day subdivisions and
/// `lastWeekday` must be tried before their more general `lastMonth` /
/// `thisWeek` siblings, since a looser pattern would otherwise swallow the
/// match first.
pub static PATTERNS: LazyLock<Vec<TaggedPattern>> = LazyLock::new(|| {
    vec![
        TaggedPattern { tag: PatternTag::DaysAgo, regex: &DAYS_AGO_RE },
        TaggedPattern { tag: PatternTag::WeeksAgo, regex: &WEEKS_AGO_RE },
        TaggedPattern { tag: PatternTag::MonthsAgo, regex: &MONTHS_AGO_RE },
        TaggedPattern { tag: PatternTag::LastWeekday, regex: &LAST_WEEKDAY_RE },
        TaggedPattern { tag: PatternTag::LastMonthEarlyTen, regex: &LAST_MONTH_EARLY_TEN_RE },
        TaggedPattern { tag: PatternTag::LastMonthMidTen, regex: &LAST_MONTH_MID_TEN_RE },
        TaggedPattern { tag: PatternTag::LastMonthLateTen, regex: &LAST_MONTH_LATE_TEN_RE },
        TaggedPattern { tag: PatternTag::ThisWeek, regex: &THIS_WEEK_RE },
        TaggedPattern { tag: PatternTag::LastWeek, regex: &LAST_WEEK_RE },
        TaggedPattern { tag: PatternTag::ThisMonth, regex: &THIS_MONTH_RE },
        TaggedPattern { tag: PatternTag::LastMonth, regex: &LAST_MONTH_RE },
    ]
});

/// Map a single weekday character (`一二三四五六日天`) to `chrono`'s
/// `Weekday` (`Mon = 0 ... Sun = 6`).
#[must_use]
pub fn weekday_from_char(c: char) -> Option<chrono::Weekday> {
    use chrono::Weekday::*;
    Some(match c {
        '一' => Mon,
        '二' => Tue,
        '三' => Wed,
        '四' => Thu,
        '五' => Fri,
        '六' => Sat,
        '日' | '天' => Sun,
        _ => return None,
    })
}
