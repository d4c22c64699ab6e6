// Performance analytics over a user's trade history.
//
// Every reduction here considers closed trades only. Sequence-dependent
// numbers (streaks, drawdown, equity curve) walk trades in exit-time order.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, NaiveDate, Timelike, Utc};
use serde::Serialize;

use valeris_core::models::Trade;

/// Label used by `by_setup` for trades with no setup tag.
pub const UNTAGGED_SETUP: &str = "untagged";

// ---------------------------------------------------------------------------
// Ordering helper
// ---------------------------------------------------------------------------

/// Closed trades paired with their pnl, sorted by exit time. Ties fall back
/// to entry time and then id so the order is stable across reloads.
pub(crate) fn closed_by_exit(trades: &[Trade]) -> Vec<(&Trade, f64, DateTime<Utc>)> {
    let mut closed: Vec<_> = trades
        .iter()
        .filter_map(|t| Some((t, t.pnl()?, t.exit_time?)))
        .collect();
    closed.sort_by(|a, b| {
        a.2.cmp(&b.2)
            .then_with(|| a.0.entry_time.cmp(&b.0.entry_time))
            .then_with(|| a.0.id.cmp(&b.0.id))
    });
    closed
}

// ---------------------------------------------------------------------------
// TradeStats
// ---------------------------------------------------------------------------

/// Headline performance numbers for a set of trades.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TradeStats {
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub breakeven_trades: usize,
    /// Percentage of closed trades with positive pnl.
    pub win_rate: f64,
    pub gross_profit: f64,
    /// Sum of losing pnl as a positive magnitude.
    pub gross_loss: f64,
    pub net_pnl: f64,
    pub avg_win: f64,
    /// Positive magnitude.
    pub avg_loss: f64,
    /// Average win over average loss.
    pub profit_factor: f64,
    /// Net pnl per closed trade.
    pub expectancy: f64,
    pub largest_win: f64,
    /// Positive magnitude.
    pub largest_loss: f64,
    pub max_consecutive_wins: usize,
    pub max_consecutive_losses: usize,
    /// Length of the run ending at the most recent trade: positive for
    /// wins, negative for losses, 0 after a breakeven trade.
    pub current_streak: i64,
    /// Largest peak-to-trough fall of the equity curve, in currency.
    pub max_drawdown: f64,
    /// `max_drawdown` as a percentage of the peak it fell from.
    pub max_drawdown_pct: f64,
}

impl TradeStats {
    /// Stats with the equity curve starting at zero.
    pub fn compute(trades: &[Trade]) -> Self {
        Self::compute_with_balance(trades, 0.0)
    }

    /// Stats with the equity curve starting at `starting_balance`, which
    /// only affects `max_drawdown_pct`.
    pub fn compute_with_balance(trades: &[Trade], starting_balance: f64) -> Self {
        let closed = closed_by_exit(trades);
        let mut stats = TradeStats {
            total_trades: closed.len(),
            ..Default::default()
        };
        if closed.is_empty() {
            return stats;
        }

        let mut streak: i64 = 0;
        let mut equity = starting_balance;
        let mut peak = starting_balance;

        for &(_, pnl, _) in &closed {
            if pnl > 0.0 {
                stats.winning_trades += 1;
                stats.gross_profit += pnl;
                stats.largest_win = stats.largest_win.max(pnl);
                streak = if streak > 0 { streak + 1 } else { 1 };
                stats.max_consecutive_wins = stats.max_consecutive_wins.max(streak as usize);
            } else if pnl < 0.0 {
                stats.losing_trades += 1;
                stats.gross_loss += -pnl;
                stats.largest_loss = stats.largest_loss.max(-pnl);
                streak = if streak < 0 { streak - 1 } else { -1 };
                stats.max_consecutive_losses =
                    stats.max_consecutive_losses.max(streak.unsigned_abs() as usize);
            } else {
                stats.breakeven_trades += 1;
                streak = 0;
            }

            equity += pnl;
            peak = peak.max(equity);
            let drawdown = peak - equity;
            if drawdown > stats.max_drawdown {
                stats.max_drawdown = drawdown;
                stats.max_drawdown_pct = if peak > 0.0 {
                    drawdown / peak * 100.0
                } else {
                    0.0
                };
            }
        }

        let total = stats.total_trades as f64;
        stats.current_streak = streak;
        stats.net_pnl = stats.gross_profit - stats.gross_loss;
        stats.win_rate = stats.winning_trades as f64 / total * 100.0;
        stats.expectancy = stats.net_pnl / total;
        if stats.winning_trades > 0 {
            stats.avg_win = stats.gross_profit / stats.winning_trades as f64;
        }
        if stats.losing_trades > 0 {
            stats.avg_loss = stats.gross_loss / stats.losing_trades as f64;
        }
        if stats.avg_loss > 0.0 {
            stats.profit_factor = stats.avg_win / stats.avg_loss;
        }
        stats
    }
}

// ---------------------------------------------------------------------------
// Equity curve and daily pnl
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EquityPoint {
    pub time: DateTime<Utc>,
    pub trade_id: String,
    pub pnl: f64,
    pub equity: f64,
}

/// Running balance after each closed trade.
pub fn equity_curve(trades: &[Trade], starting_balance: f64) -> Vec<EquityPoint> {
    let mut equity = starting_balance;
    closed_by_exit(trades)
        .into_iter()
        .map(|(trade, pnl, time)| {
            equity += pnl;
            EquityPoint {
                time,
                trade_id: trade.id.clone(),
                pnl,
                equity,
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyPnl {
    pub date: NaiveDate,
    pub pnl: f64,
    pub trades: usize,
    pub wins: usize,
}

/// Realized pnl grouped by UTC exit date, ascending.
pub fn daily_pnl(trades: &[Trade]) -> Vec<DailyPnl> {
    let mut days: BTreeMap<NaiveDate, DailyPnl> = BTreeMap::new();
    for (_, pnl, exit) in closed_by_exit(trades) {
        let date = exit.date_naive();
        let day = days.entry(date).or_insert(DailyPnl {
            date,
            pnl: 0.0,
            trades: 0,
            wins: 0,
        });
        day.pnl += pnl;
        day.trades += 1;
        if pnl > 0.0 {
            day.wins += 1;
        }
    }
    days.into_values().collect()
}

// ---------------------------------------------------------------------------
// Heatmap
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct HeatCell {
    pub trades: usize,
    pub pnl: f64,
}

/// Trade activity by weekday (Monday first) and hour of entry, UTC.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Heatmap {
    pub cells: [[HeatCell; 24]; 7],
}

impl Default for Heatmap {
    fn default() -> Self {
        Heatmap {
            cells: [[HeatCell::default(); 24]; 7],
        }
    }
}

impl Heatmap {
    /// `weekday` 0 = Monday.
    pub fn cell(&self, weekday: usize, hour: usize) -> HeatCell {
        self.cells[weekday][hour]
    }

    /// Largest absolute cell pnl, for scaling colours.
    pub fn max_abs_pnl(&self) -> f64 {
        self.cells
            .iter()
            .flatten()
            .map(|c| c.pnl.abs())
            .fold(0.0, f64::max)
    }

    /// Hours (0..24) with at least one trade on any day.
    pub fn active_hours(&self) -> Vec<usize> {
        (0..24)
            .filter(|&h| self.cells.iter().any(|row| row[h].trades > 0))
            .collect()
    }
}

pub fn heatmap(trades: &[Trade]) -> Heatmap {
    let mut map = Heatmap::default();
    for (trade, pnl, _) in closed_by_exit(trades) {
        let weekday = trade.entry_time.weekday().num_days_from_monday() as usize;
        let hour = trade.entry_time.hour() as usize;
        let cell = &mut map.cells[weekday][hour];
        cell.trades += 1;
        cell.pnl += pnl;
    }
    map
}

// ---------------------------------------------------------------------------
// Breakdowns
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupStats {
    pub key: String,
    pub trades: usize,
    pub win_rate: f64,
    pub net_pnl: f64,
}

fn group_by<F>(trades: &[Trade], key_of: F) -> Vec<GroupStats>
where
    F: Fn(&Trade) -> String,
{
    // (trades, wins, pnl)
    let mut groups: BTreeMap<String, (usize, usize, f64)> = BTreeMap::new();
    for (trade, pnl, _) in closed_by_exit(trades) {
        let entry = groups.entry(key_of(trade)).or_default();
        entry.0 += 1;
        if pnl > 0.0 {
            entry.1 += 1;
        }
        entry.2 += pnl;
    }

    let mut out: Vec<GroupStats> = groups
        .into_iter()
        .map(|(key, (count, wins, pnl))| GroupStats {
            key,
            trades: count,
            win_rate: wins as f64 / count as f64 * 100.0,
            net_pnl: pnl,
        })
        .collect();
    out.sort_by(|a, b| b.net_pnl.total_cmp(&a.net_pnl).then_with(|| a.key.cmp(&b.key)));
    out
}

pub fn by_symbol(trades: &[Trade]) -> Vec<GroupStats> {
    group_by(trades, |t| t.symbol.clone())
}

pub fn by_setup(trades: &[Trade]) -> Vec<GroupStats> {
    group_by(trades, |t| {
        t.setup
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(UNTAGGED_SETUP)
            .to_string()
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlySummary {
    /// `YYYY-MM`
    pub month: String,
    pub net_pnl: f64,
    pub trades: usize,
}

/// Net pnl per exit month, ascending.
pub fn monthly_summary(trades: &[Trade]) -> Vec<MonthlySummary> {
    let mut months: BTreeMap<String, (f64, usize)> = BTreeMap::new();
    for (_, pnl, exit) in closed_by_exit(trades) {
        let entry = months.entry(exit.format("%Y-%m").to_string()).or_default();
        entry.0 += pnl;
        entry.1 += 1;
    }
    months
        .into_iter()
        .map(|(month, (net_pnl, trades))| MonthlySummary {
            month,
            net_pnl,
            trades,
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use valeris_core::models::Side;

    /// Monday 2026-03-02 09:30 UTC.
    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 9, 30, 0).unwrap()
    }

    /// A long trade of 1 share at 100 closed `hours` after t0 with `pnl`.
    fn trade(symbol: &str, pnl: f64, hours: i64) -> Trade {
        let entry = t0() + Duration::hours(hours);
        Trade::open("u1", symbol, Side::Long, 1.0, 100.0, entry)
            .closed_at(100.0 + pnl, entry + Duration::minutes(10))
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn empty_history_has_zero_stats() {
        let stats = TradeStats::compute(&[]);
        assert_eq!(stats, TradeStats::default());
        assert_eq!(stats.win_rate, 0.0);
    }

    #[test]
    fn open_trades_are_ignored() {
        let open = Trade::open("u1", "AAPL", Side::Long, 1.0, 100.0, t0());
        let stats = TradeStats::compute(&[open, trade("AAPL", 10.0, 1)]);
        assert_eq!(stats.total_trades, 1);
        assert_eq!(stats.win_rate, 100.0);
    }

    #[test]
    fn headline_numbers() {
        let trades = vec![
            trade("AAPL", 30.0, 0),
            trade("AAPL", -10.0, 1),
            trade("MSFT", 10.0, 2),
            trade("MSFT", -20.0, 3),
            trade("TSLA", 0.0, 4),
        ];
        let stats = TradeStats::compute(&trades);
        assert_eq!(stats.total_trades, 5);
        assert_eq!(stats.winning_trades, 2);
        assert_eq!(stats.losing_trades, 2);
        assert_eq!(stats.breakeven_trades, 1);
        assert!(approx(stats.win_rate, 40.0));
        assert!(approx(stats.gross_profit, 40.0));
        assert!(approx(stats.gross_loss, 30.0));
        assert!(approx(stats.net_pnl, 10.0));
        assert!(approx(stats.avg_win, 20.0));
        assert!(approx(stats.avg_loss, 15.0));
        assert!(approx(stats.profit_factor, 20.0 / 15.0));
        assert!(approx(stats.expectancy, 2.0));
        assert!(approx(stats.largest_win, 30.0));
        assert!(approx(stats.largest_loss, 20.0));
        assert_eq!(stats.current_streak, 0);
    }

    #[test]
    fn profit_factor_is_zero_without_losses() {
        let stats = TradeStats::compute(&[trade("A", 5.0, 0), trade("B", 7.0, 1)]);
        assert_eq!(stats.profit_factor, 0.0);
        assert_eq!(stats.avg_loss, 0.0);
    }

    #[test]
    fn streaks_follow_exit_order() {
        // Listed out of order on purpose.
        let trades = vec![
            trade("A", -1.0, 5),
            trade("A", 1.0, 0),
            trade("A", 1.0, 1),
            trade("A", 1.0, 2),
            trade("A", -1.0, 3),
            trade("A", -1.0, 4),
        ];
        let stats = TradeStats::compute(&trades);
        assert_eq!(stats.max_consecutive_wins, 3);
        assert_eq!(stats.max_consecutive_losses, 3);
        assert_eq!(stats.current_streak, -3);
    }

    #[test]
    fn drawdown_is_peak_to_trough() {
        let trades = vec![
            trade("A", 100.0, 0),
            trade("A", -50.0, 1),
            trade("A", -30.0, 2),
            trade("A", 200.0, 3),
            trade("A", -60.0, 4),
        ];
        let stats = TradeStats::compute_with_balance(&trades, 1000.0);
        // Peak 1100 falls to 1020.
        assert!(approx(stats.max_drawdown, 80.0));
        assert!(approx(stats.max_drawdown_pct, 80.0 / 1100.0 * 100.0));
    }

    #[test]
    fn equity_curve_accumulates() {
        let curve = equity_curve(&[trade("A", 10.0, 1), trade("B", -4.0, 0)], 100.0);
        let equities: Vec<f64> = curve.iter().map(|p| p.equity).collect();
        assert_eq!(equities, vec![96.0, 106.0]);
    }

    #[test]
    fn daily_pnl_groups_by_exit_date() {
        let trades = vec![
            trade("A", 10.0, 0),
            trade("B", -4.0, 1),
            trade("C", 5.0, 24),
        ];
        let days = daily_pnl(&trades);
        assert_eq!(days.len(), 2);
        assert_eq!(days[0].date, NaiveDate::from_ymd_opt(2026, 3, 2).unwrap());
        assert!(approx(days[0].pnl, 6.0));
        assert_eq!(days[0].trades, 2);
        assert_eq!(days[0].wins, 1);
        assert_eq!(days[1].trades, 1);
    }

    #[test]
    fn heatmap_buckets_by_entry_weekday_and_hour() {
        let trades = vec![
            trade("A", 10.0, 0),
            trade("B", -4.0, 0),
            trade("C", 5.0, 25), // Tuesday 10:30
        ];
        let map = heatmap(&trades);
        assert_eq!(map.cell(0, 9).trades, 2);
        assert!(approx(map.cell(0, 9).pnl, 6.0));
        assert_eq!(map.cell(1, 10).trades, 1);
        assert_eq!(map.active_hours(), vec![9, 10]);
        assert!(approx(map.max_abs_pnl(), 6.0));
    }

    #[test]
    fn breakdowns_sort_by_pnl_then_name() {
        let mut tagged = trade("MSFT", 5.0, 2);
        tagged.setup = Some("breakout".into());
        let trades = vec![
            trade("AAPL", 5.0, 0),
            trade("AAPL", -1.0, 1),
            tagged,
            trade("TSLA", 8.0, 3),
        ];

        let symbols: Vec<(String, f64)> = by_symbol(&trades)
            .into_iter()
            .map(|g| (g.key, g.net_pnl))
            .collect();
        assert_eq!(
            symbols,
            vec![
                ("TSLA".to_string(), 8.0),
                ("MSFT".to_string(), 5.0),
                ("AAPL".to_string(), 4.0),
            ]
        );

        let setups = by_setup(&trades);
        assert_eq!(setups[0].key, UNTAGGED_SETUP);
        assert_eq!(setups[0].trades, 3);
        assert!(approx(setups[0].win_rate, 200.0 / 3.0));
        assert_eq!(setups[1].key, "breakout");
    }

    #[test]
    fn monthly_summary_by_exit_month() {
        let trades = vec![trade("A", 10.0, 0), trade("B", -3.0, 24 * 31)];
        let months = monthly_summary(&trades);
        assert_eq!(months[0].month, "2026-03");
        assert_eq!(months[1].month, "2026-04");
        assert!(approx(months[1].net_pnl, -3.0));
    }
}
