// Sidebar: closed-trade results per symbol, best first.

use ratatui::layout::{Constraint, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::widgets::{Block, Borders, Cell, Row, Table};
use ratatui::Frame;

use super::{format_money, pnl_color};
use crate::ViewState;

pub fn render(frame: &mut Frame, area: Rect, state: &ViewState) {
    let header = Row::new(vec!["Symbol", "#", "Win%", "P&L"])
        .style(Style::default().fg(Color::White).add_modifier(Modifier::BOLD));

    let rows: Vec<Row> = state
        .by_symbol
        .iter()
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
            Constraint::Min(6),
            Constraint::Length(4),
            Constraint::Length(5),
            Constraint::Length(12),
        ],
    )
    .header(header)
    .block(Block::default().borders(Borders::ALL).title("By symbol"));
    frame.render_widget(table, area);
}
