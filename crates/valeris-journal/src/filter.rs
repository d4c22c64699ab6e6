// Date-range and attribute filters for the trade list.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};
use serde::Serialize;
use thiserror::Error;

use valeris_core::models::{Side, Trade};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown date range `{0}` (expected today, 7d, 30d, month, year, all or YYYY-MM-DD..YYYY-MM-DD)")]
pub struct UnknownRange(pub String);

/// Window of entry times shown in the journal. Calendar ranges are
/// computed in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DateRange {
    Today,
    /// Today and the six days before it.
    Last7Days,
    /// Today and the 29 days before it.
    Last30Days,
    ThisMonth,
    ThisYear,
    All,
    /// `start` inclusive, `end` exclusive.
    Custom {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

/// Order used when cycling ranges from the keyboard.
const CYCLE: [DateRange; 6] = [
    DateRange::Today,
    DateRange::Last7Days,
    DateRange::Last30Days,
    DateRange::ThisMonth,
    DateRange::ThisYear,
    DateRange::All,
];

fn midnight(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0).unwrap_or_default())
}

impl DateRange {
    /// `[start, end)` for the range as seen at `now`, or `None` for `All`.
    pub fn bounds(&self, now: DateTime<Utc>) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let today = now.date_naive();
        let tomorrow = midnight(today) + Duration::days(1);
        match self {
            DateRange::Today => Some((midnight(today), tomorrow)),
            DateRange::Last7Days => Some((midnight(today) - Duration::days(6), tomorrow)),
            DateRange::Last30Days => Some((midnight(today) - Duration::days(29), tomorrow)),
            DateRange::ThisMonth => {
                let first = today.with_day(1)?;
                let next = if first.month() == 12 {
                    NaiveDate::from_ymd_opt(first.year() + 1, 1, 1)?
                } else {
                    NaiveDate::from_ymd_opt(first.year(), first.month() + 1, 1)?
                };
                Some((midnight(first), midnight(next)))
            }
            DateRange::ThisYear => {
                let first = NaiveDate::from_ymd_opt(today.year(), 1, 1)?;
                let next = NaiveDate::from_ymd_opt(today.year() + 1, 1, 1)?;
                Some((midnight(first), midnight(next)))
            }
            DateRange::All => None,
            DateRange::Custom { start, end } => Some((*start, *end)),
        }
    }

    pub fn contains(&self, time: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        match self.bounds(now) {
            Some((start, end)) => time >= start && time < end,
            None => true,
        }
    }

    /// Next preset range; `Custom` cycles back to `Today`.
    pub fn next(&self) -> DateRange {
        match CYCLE.iter().position(|r| r == self) {
            Some(i) => CYCLE[(i + 1) % CYCLE.len()],
            None => DateRange::Today,
        }
    }

    pub fn label(&self) -> String {
        match self {
            DateRange::Today => "Today".to_string(),
            DateRange::Last7Days => "Last 7 days".to_string(),
            DateRange::Last30Days => "Last 30 days".to_string(),
            DateRange::ThisMonth => "This month".to_string(),
            DateRange::ThisYear => "This year".to_string(),
            DateRange::All => "All time".to_string(),
            DateRange::Custom { start, end } => format!(
                "{} to {}",
                start.format("%Y-%m-%d"),
                (*end - Duration::days(1)).format("%Y-%m-%d")
            ),
        }
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

impl FromStr for DateRange {
    type Err = UnknownRange;

    /// Accepts the preset keys or `YYYY-MM-DD..YYYY-MM-DD` (both dates
    /// inclusive).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase();
        match key.as_str() {
            "today" => return Ok(DateRange::Today),
            "7d" => return Ok(DateRange::Last7Days),
            "30d" => return Ok(DateRange::Last30Days),
            "month" => return Ok(DateRange::ThisMonth),
            "year" => return Ok(DateRange::ThisYear),
            "all" | "" => return Ok(DateRange::All),
            _ => {}
        }

        let unknown = || UnknownRange(s.to_string());
        let (from, to) = key.split_once("..").ok_or_else(unknown)?;
        let from = NaiveDate::parse_from_str(from.trim(), "%Y-%m-%d").map_err(|_| unknown())?;
        let to = NaiveDate::parse_from_str(to.trim(), "%Y-%m-%d").map_err(|_| unknown())?;
        if to < from {
            return Err(unknown());
        }
        Ok(DateRange::Custom {
            start: midnight(from),
            end: midnight(to) + Duration::days(1),
        })
    }
}

// ---------------------------------------------------------------------------
// TradeFilter
// ---------------------------------------------------------------------------

/// Combined filter applied to the trade list. Text matches ignore case.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeFilter {
    pub range: DateRange,
    pub symbol: Option<String>,
    pub side: Option<Side>,
    pub setup: Option<String>,
    pub closed_only: bool,
}

impl Default for TradeFilter {
    fn default() -> Self {
        TradeFilter {
            range: DateRange::All,
            symbol: None,
            side: None,
            setup: None,
            closed_only: false,
        }
    }
}

impl TradeFilter {
    pub fn for_range(range: DateRange) -> Self {
        TradeFilter {
            range,
            ..Default::default()
        }
    }

    pub fn matches(&self, trade: &Trade, now: DateTime<Utc>) -> bool {
        if !self.range.contains(trade.entry_time, now) {
            return false;
        }
        if self.closed_only && !trade.is_closed() {
            return false;
        }
        if let Some(symbol) = &self.symbol {
            if !trade.symbol.eq_ignore_ascii_case(symbol.trim()) {
                return false;
            }
        }
        if let Some(side) = self.side {
            if trade.side != side {
                return false;
            }
        }
        if let Some(setup) = &self.setup {
            let tagged = trade
                .setup
                .as_deref()
                .is_some_and(|s| s.trim().eq_ignore_ascii_case(setup.trim()));
            if !tagged {
                return false;
            }
        }
        true
    }

    pub fn apply(&self, trades: &[Trade], now: DateTime<Utc>) -> Vec<Trade> {
        trades
            .iter()
            .filter(|t| self.matches(t, now))
            .cloned()
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
