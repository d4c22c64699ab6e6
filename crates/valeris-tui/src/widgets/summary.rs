// Summary banner: headline performance numbers for the selected range.

use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph};
use ratatui::Frame;

use valeris_journal::stats::TradeStats;

use super::{format_money, pnl_color, pnl_span};
use crate::ViewState;

pub fn render(frame: &mut Frame, area: Rect, state: &ViewState) {
    let title = if state.range_label.is_empty() {
        "Summary".to_string()
    } else {
        format!("Summary -- {}", state.range_label)
    };

    let lines = if !state.loaded {
        vec![Line::from(Span::styled(
            "Loading journal...",
            Style::default().fg(Color::DarkGray),
        ))]
    } else if state.stats.total_trades == 0 {
        vec![Line::from(Span::styled(
            "No closed trades in this range. Press n to log one.",
            Style::default().fg(Color::DarkGray),
        ))]
    } else {
        vec![headline(&state.stats), detail(&state.stats)]
    };

    let paragraph = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title(title));
    frame.render_widget(paragraph, area);
}

fn label(text: &'static str) -> Span<'static> {
    Span::styled(text, Style::default().fg(Color::DarkGray))
}

fn headline(stats: &TradeStats) -> Line<'static> {
    Line::from(vec![
        label(" Net P&L "),
        Span::styled(
            format_money(stats.net_pnl),
            Style::default()
                .fg(pnl_color(stats.net_pnl))
                .add_modifier(Modifier::BOLD),
        ),
        label("   Win rate "),
        Span::raw(format!("{:.1}%", stats.win_rate)),
        label("   Profit factor "),
        Span::raw(format_ratio(stats.profit_factor, stats.losing_trades)),
        label("   Expectancy "),
        pnl_span(stats.expectancy),
    ])
}

fn detail(stats: &TradeStats) -> Line<'static> {
    Line::from(vec![
        label(" Trades "),
        Span::raw(format!(
            "{} ({}W/{}L)",
            stats.total_trades, stats.winning_trades, stats.losing_trades
        )),
        label("   Best "),
        pnl_span(stats.largest_win),
        label("   Worst "),
        pnl_span(-stats.largest_loss),
        label("   Max DD "),
        Span::raw(format!("{:.1}%", stats.max_drawdown_pct)),
        label("   Streak "),
        Span::styled(
            streak_text(stats.current_streak),
            Style::default().fg(pnl_color(stats.current_streak as f64)),
        ),
    ])
}

/// Profit factor is undefined without losses.
pub fn format_ratio(ratio: f64, losing_trades: usize) -> String {
    if losing_trades == 0 {
        "--".to_string()
    } else {
        format!("{ratio:.2}")
    }
}

/// `3W`, `2L` or `-`.
pub fn streak_text(streak: i64) -> String {
    match streak {
        0 => "-".to_string(),
        n if n > 0 => format!("{n}W"),
        n => format!("{}L", n.unsigned_abs()),
    }
}
