// Prompt construction for the AI trading coach.
//
// Prompts carry pre-computed numbers so the model spends its answer on
// behaviour and risk rather than arithmetic.

use std::fmt::Write as _;

use valeris_core::models::Trade;

use crate::evaluation::EvaluationReport;
use crate::stats::{closed_by_exit, TradeStats};

/// Most recent closed trades included in a prompt.
pub const MAX_RECENT_TRADES: usize = 20;

pub fn system_prompt() -> String {
    "You are an experienced trading coach reviewing a retail trader's journal.\n\
     \n\
     You receive the trader's headline statistics, their most recent closed trades \
     and, when they are in a funded-account challenge, its current status.\n\
     \n\
     Answer the trader's question directly. Point to specific trades or numbers when \
     they support your point. Focus on process: risk per trade, cutting losers, \
     position sizing, setup selection and emotional discipline.\n\
     \n\
     Use the numbers provided and do not recompute them. Never promise returns and \
     do not give personalised investment advice about specific securities. Keep the \
     answer under 250 words."
        .to_string()
}

/// Build the user message for a coach question.
pub fn build_coach_prompt(
    stats: &TradeStats,
    trades: &[Trade],
    evaluation: Option<&EvaluationReport>,
    question: &str,
) -> String {
    let mut prompt = String::with_capacity(2048);

    prompt.push_str("## PERFORMANCE\n");
    prompt.push_str(&format_stats(stats));
    prompt.push('\n');

    if let Some(report) = evaluation {
        prompt.push_str("## CHALLENGE\n");
        let _ = writeln!(
            prompt,
            "Status: {} | Balance: {:.2} | Profit: {:.2}% ({:.0}% of target)",
            report.status.label(),
            report.current_balance,
            report.profit_pct,
            report.progress_pct,
        );
        let _ = writeln!(
            prompt,
            "Max drawdown: {:.2}% | Worst day: -{:.2}% | Trading days: {}\n",
            report.drawdown_pct, report.worst_daily_loss_pct, report.trading_days,
        );
    }

    prompt.push_str("## RECENT TRADES (newest first)\n");
    prompt.push_str(&format_recent_trades(trades));
    prompt.push('\n');

    prompt.push_str("## QUESTION\n");
    let question = question.trim();
    if question.is_empty() {
        prompt.push_str("Review my recent trading and tell me the one thing to fix first.\n");
    } else {
        prompt.push_str(question);
        prompt.push('\n');
    }
    prompt
}

fn format_stats(stats: &TradeStats) -> String {
    if stats.total_trades == 0 {
        return "No closed trades yet.\n".to_string();
    }
    format!(
        "Trades: {} ({}W / {}L / {}BE) | Win rate: {:.1}%\n\
         Net P&L: {:.2} | Avg win: {:.2} | Avg loss: {:.2} | Profit factor: {:.2}\n\
         Expectancy: {:.2} | Largest win: {:.2} | Largest loss: {:.2}\n\
         Max drawdown: {:.2} | Streaks: best {}W, worst {}L, current {}\n",
        stats.total_trades,
        stats.winning_trades,
        stats.losing_trades,
        stats.breakeven_trades,
        stats.win_rate,
        stats.net_pnl,
        stats.avg_win,
        stats.avg_loss,
        stats.profit_factor,
        stats.expectancy,
        stats.largest_win,
        stats.largest_loss,
        stats.max_drawdown,
        stats.max_consecutive_wins,
        stats.max_consecutive_losses,
        stats.current_streak,
    )
}

fn format_recent_trades(trades: &[Trade]) -> String {
    let closed = closed_by_exit(trades);
    if closed.is_empty() {
        return "(none)\n".to_string();
    }
    let mut out = String::new();
    for (trade, pnl, exit) in closed.iter().rev().take(MAX_RECENT_TRADES) {
        let _ = write!(
            out,
            "{} {} {} {} @ {:.2} -> {:.2} | P&L {:+.2}",
            exit.format("%Y-%m-%d %H:%M"),
            trade.side.as_str().to_uppercase(),
            trade.quantity,
            trade.symbol,
            trade.entry_price,
            trade.exit_price.unwrap_or_default(),
            pnl,
        );
        if let Some(setup) = trade.setup.as_deref().filter(|s| !s.is_empty()) {
            let _ = write!(out, " | setup: {setup}");
        }
        if let Some(notes) = trade.notes.as_deref().filter(|s| !s.is_empty()) {
            let _ = write!(out, " | notes: {notes}");
        }
        out.push('\n');
    }
    out
}
