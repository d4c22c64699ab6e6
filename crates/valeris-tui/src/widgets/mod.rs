// TUI widget modules for each dashboard panel, plus shared formatting.

pub mod analytics;
pub mod breakdown;
pub mod coach;
pub mod daily;
pub mod evaluation;
pub mod heatmap;
pub mod help_bar;
pub mod news;
pub mod quit_confirm;
pub mod status_bar;
pub mod summary;
pub mod trades;

use ratatui::style::{Color, Style};
use ratatui::text::Span;

/// Signed currency amount, e.g. `+$1,234.50` or `-$80.00`.
pub fn format_money(value: f64) -> String {
    let sign = if value > 0.0 {
        "+"
    } else if value < 0.0 {
        "-"
    } else {
        ""
    };
    let cents = (value.abs() * 100.0).round() as u64;
    format!("{sign}${}.{:02}", group_thousands(cents / 100), cents % 100)
}

/// Unsigned amount with separators, for balances.
pub fn format_balance(value: f64) -> String {
    let cents = (value.abs() * 100.0).round() as u64;
    let sign = if value < 0.0 { "-" } else { "" };
    format!("{sign}${}.{:02}", group_thousands(cents / 100), cents % 100)
}

fn group_thousands(mut n: u64) -> String {
    let mut groups = Vec::new();
    loop {
        if n < 1000 {
            groups.push(n.to_string());
            break;
        }
        groups.push(format!("{:03}", n % 1000));
        n /= 1000;
    }
    groups.reverse();
    groups.join(",")
}

pub fn pnl_color(value: f64) -> Color {
    if value > 0.0 {
        Color::Green
    } else if value < 0.0 {
        Color::Red
    } else {
        Color::Gray
    }
}

pub fn pnl_span(value: f64) -> Span<'static> {
    Span::styled(format_money(value), Style::default().fg(pnl_color(value)))
}
