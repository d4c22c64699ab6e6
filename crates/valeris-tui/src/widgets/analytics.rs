// Analytics tab: full stat sheet, the per-setup breakdown and the
// weekday x hour heatmap.

use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Cell, Paragraph, Row, Table};
use ratatui::Frame;

use valeris_journal::stats::TradeStats;

use super::summary::format_ratio;
use super::{format_money, heatmap, pnl_color, pnl_span};
use crate::ViewState;

pub fn render(frame: &mut Frame, area: Rect, state: &ViewState) {
    let sections = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(10), Constraint::Min(4)])
        .split(area);

    let paragraph = Paragraph::new(stat_lines(&state.stats))
        .block(Block::default().borders(Borders::ALL).title("Performance"));
    frame.render_widget(paragraph, sections[0]);

    let lower = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(45), Constraint::Percentage(55)])
        .split(sections[1]);
    render_setups(frame, lower[0], state);
    heatmap::render(frame, lower[1], state);
}

fn row(left: (&'static str, Span<'static>), right: (&'static str, Span<'static>)) -> Line<'static> {
    Line::from(vec![
        Span::styled(format!(" {:<18}", left.0), Style::default().fg(Color::DarkGray)),
        left.1,
        Span::raw("    "),
        Span::styled(format!("{:<18}", right.0), Style::default().fg(Color::DarkGray)),
        right.1,
    ])
}

pub fn stat_lines(stats: &TradeStats) -> Vec<Line<'static>> {
    vec![
        row(
            ("Gross profit", pnl_span(stats.gross_profit)),
            ("Gross loss", pnl_span(-stats.gross_loss)),
        ),
        row(
            ("Average win", pnl_span(stats.avg_win)),
            ("Average loss", pnl_span(-stats.avg_loss)),
        ),
        row(
            (
                "Profit factor",
                Span::raw(format_ratio(stats.profit_factor, stats.losing_trades)),
            ),
            ("Expectancy", pnl_span(stats.expectancy)),
        ),
        row(
            ("Win rate", Span::raw(format!("{:.1}%", stats.win_rate))),
            ("Breakeven trades", Span::raw(stats.breakeven_trades.to_string())),
        ),
        row(
            ("Max win streak", Span::raw(stats.max_consecutive_wins.to_string())),
            ("Max loss streak", Span::raw(stats.max_consecutive_losses.to_string())),
        ),
        row(
            ("Max drawdown", pnl_span(-stats.max_drawdown)),
            ("Max drawdown %", Span::raw(format!("{:.2}%", stats.max_drawdown_pct))),
        ),
        row(
            ("Net P&L", pnl_span(stats.net_pnl)),
            ("Closed trades", Span::raw(stats.total_trades.to_string())),
        ),
    ]
}

fn render_setups(frame: &mut Frame, area: Rect, state: &ViewState) {
    let header = Row::new(vec!["Setup", "Trades", "Win %", "Net P&L"])
        .style(Style::default().fg(Color::White).add_modifier(Modifier::BOLD));

    let offset = state.scroll_offset.get("analytics").copied().unwrap_or(0);
    let rows: Vec<Row> = state
        .by_setup
        .iter()
        .skip(offset)
        .map(|g| {
            Row::new(vec![
                Cell::from(g.key.clone()),
                Cell::from(g.trades.to_string()),
                Cell::from(format!("{:.0}%", g.win_rate)),
                Cell::from(format_money(g.net_pnl)).style(Style::default().fg(pnl_color(g.net_pnl))),
            ])
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Min(16),
            Constraint::Length(7),
            Constraint::Length(7),
            Constraint::Length(12),
        ],
    )
    .header(header)
    .block(Block::default().borders(Borders::ALL).title("By setup"));
    frame.render_widget(table, area);
}
