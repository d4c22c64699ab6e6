// Funded-account challenge checking.
//
// A challenge starts from `account_size` and passes once the profit target
// is reached over enough distinct trading days, unless the account breached
// the maximum drawdown or a daily loss limit at any point. Drawdown is
// measured against the starting balance, not a trailing peak.

use serde::Serialize;

use valeris_core::config::EvaluationConfig;
use valeris_core::models::Trade;

use crate::stats::{closed_by_exit, daily_pnl};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EvaluationRules {
    pub account_size: f64,
    pub profit_target_pct: f64,
    pub max_drawdown_pct: f64,
    pub daily_loss_limit_pct: f64,
    pub min_trading_days: u32,
}

impl From<&EvaluationConfig> for EvaluationRules {
    fn from(config: &EvaluationConfig) -> Self {
        EvaluationRules {
            account_size: config.account_size,
            profit_target_pct: config.profit_target_pct,
            max_drawdown_pct: config.max_drawdown_pct,
            daily_loss_limit_pct: config.daily_loss_limit_pct,
            min_trading_days: config.min_trading_days,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    MaxDrawdown,
    DailyLossLimit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationStatus {
    InProgress,
    Passed,
    Failed(FailureReason),
}

impl EvaluationStatus {
    pub fn label(&self) -> &'static str {
        match self {
            EvaluationStatus::InProgress => "In progress",
            EvaluationStatus::Passed => "Passed",
            EvaluationStatus::Failed(FailureReason::MaxDrawdown) => "Failed: max drawdown",
            EvaluationStatus::Failed(FailureReason::DailyLossLimit) => "Failed: daily loss limit",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationReport {
    pub status: EvaluationStatus,
    pub current_balance: f64,
    /// Net pnl as a percentage of the starting balance.
    pub profit_pct: f64,
    /// Share of the profit target reached, clamped to 0..=100.
    pub progress_pct: f64,
    /// Deepest fall below the starting balance, as a percentage of it.
    pub drawdown_pct: f64,
    /// Largest single-day loss as a percentage of the starting balance.
    pub worst_daily_loss_pct: f64,
    /// Distinct UTC dates with at least one closed trade.
    pub trading_days: u32,
}

fn pct(part: f64, whole: f64) -> f64 {
    if whole > 0.0 {
        part / whole * 100.0
    } else {
        0.0
    }
}

pub fn evaluate(rules: &EvaluationRules, trades: &[Trade]) -> EvaluationReport {
    let start = rules.account_size;

    let mut balance = start;
    let mut lowest = start;
    for (_, pnl, _) in closed_by_exit(trades) {
        balance += pnl;
        lowest = lowest.min(balance);
    }
    let drawdown_pct = pct(start - lowest, start).max(0.0);

    let days = daily_pnl(trades);
    let worst_daily_loss = days.iter().map(|d| -d.pnl).fold(0.0, f64::max);
    let worst_daily_loss_pct = pct(worst_daily_loss, start);
    let trading_days = days.len() as u32;

    let profit_pct = pct(balance - start, start);
    let progress_pct = if rules.profit_target_pct > 0.0 {
        (profit_pct / rules.profit_target_pct * 100.0).clamp(0.0, 100.0)
    } else {
        0.0
    };

    let status = if drawdown_pct > rules.max_drawdown_pct {
        EvaluationStatus::Failed(FailureReason::MaxDrawdown)
    } else if worst_daily_loss_pct > rules.daily_loss_limit_pct {
        EvaluationStatus::Failed(FailureReason::DailyLossLimit)
    } else if profit_pct >= rules.profit_target_pct && trading_days >= rules.min_trading_days {
        EvaluationStatus::Passed
    } else {
        EvaluationStatus::InProgress
    };

    EvaluationReport {
        status,
        current_balance: balance,
        profit_pct,
        progress_pct,
        drawdown_pct,
        worst_daily_loss_pct,
        trading_days,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use valeris_core::models::Side;

    fn rules() -> EvaluationRules {
        EvaluationRules {
            account_size: 10_000.0,
            profit_target_pct: 8.0,
            max_drawdown_pct: 10.0,
            daily_loss_limit_pct: 5.0,
            min_trading_days: 3,
        }
    }

    fn day(n: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, 1, 14, 0, 0).unwrap() + Duration::days(n)
    }

    /// 1 share entered at 1000 on day `n`, closed the same day for `pnl`.
    fn trade_on(n: i64, pnl: f64) -> Trade {
        Trade::open("u1", "ES", Side::Long, 1.0, 1000.0, day(n))
            .closed_at(1000.0 + pnl, day(n) + Duration::minutes(30))
    }

    #[test]
    fn no_trades_is_in_progress_with_zero_drawdown() {
        let report = evaluate(&rules(), &[]);
        assert_eq!(report.status, EvaluationStatus::InProgress);
        assert_eq!(report.drawdown_pct, 0.0);
        assert_eq!(report.current_balance, 10_000.0);
        assert_eq!(report.trading_days, 0);
    }

    #[test]
    fn profit_never_counts_as_drawdown() {
        let report = evaluate(&rules(), &[trade_on(0, 300.0)]);
        assert_eq!(report.drawdown_pct, 0.0);
        assert!((report.profit_pct - 3.0).abs() < 1e-9);
        assert!((report.progress_pct - 37.5).abs() < 1e-9);
    }

    #[test]
    fn passes_with_target_and_enough_days() {
        let trades = vec![trade_on(0, 300.0), trade_on(1, 300.0), trade_on(2, 250.0)];
        let report = evaluate(&rules(), &trades);
        assert_eq!(report.status, EvaluationStatus::Passed);
        assert_eq!(report.trading_days, 3);
        assert_eq!(report.progress_pct, 100.0);
    }

    #[test]
    fn target_without_enough_days_is_in_progress() {
        let report = evaluate(&rules(), &[trade_on(0, 900.0)]);
        assert_eq!(report.status, EvaluationStatus::InProgress);
    }

    #[test]
    fn daily_loss_limit_fails() {
        let trades = vec![trade_on(0, -300.0), trade_on(0, -250.0), trade_on(1, 600.0)];
        let report = evaluate(&rules(), &trades);
        assert!((report.worst_daily_loss_pct - 5.5).abs() < 1e-9);
        assert_eq!(
            report.status,
            EvaluationStatus::Failed(FailureReason::DailyLossLimit)
        );
    }

    #[test]
    fn drawdown_failure_takes_precedence_over_passing() {
        // Dips 11% below start across several days, then recovers past target.
        let trades = vec![
            trade_on(0, -400.0),
            trade_on(1, -400.0),
            trade_on(2, -300.0),
            trade_on(3, 900.0),
            trade_on(4, 900.0),
            trade_on(5, 100.0),
        ];
        let report = evaluate(&rules(), &trades);
        assert!((report.drawdown_pct - 11.0).abs() < 1e-9);
        assert!(report.profit_pct >= 8.0);
        assert_eq!(
            report.status,
            EvaluationStatus::Failed(FailureReason::MaxDrawdown)
        );
    }

    #[test]
    fn zero_account_size_does_not_divide_by_zero() {
        let mut r = rules();
        r.account_size = 0.0;
        let report = evaluate(&r, &[trade_on(0, -50.0)]);
        assert_eq!(report.drawdown_pct, 0.0);
        assert_eq!(report.profit_pct, 0.0);
    }
}
