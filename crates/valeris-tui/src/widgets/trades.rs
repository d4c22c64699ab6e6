// Trades table: the filtered journal, newest entry first.
//
// Columns: Date, Symbol, Side, Qty, Entry, Exit, P&L, Setup
// The selected row is highlighted; `d` deletes it.

use ratatui::layout::{Constraint, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::widgets::{Block, Borders, Cell, Row, Table, TableState};
use ratatui::Frame;

use valeris_core::models::{Side, Trade};

use super::{format_money, pnl_color};
use crate::ViewState;

pub fn render(frame: &mut Frame, area: Rect, state: &ViewState) {
    let header = Row::new(vec![
        Cell::from("Date"),
        Cell::from("Symbol"),
        Cell::from("Side"),
        Cell::from("Qty"),
        Cell::from("Entry"),
        Cell::from("Exit"),
        Cell::from("P&L"),
        Cell::from("Setup"),
    ])
    .style(Style::default().fg(Color::White).add_modifier(Modifier::BOLD));

    let rows: Vec<Row> = state.trades.iter().map(trade_row).collect();

    let widths = [
        Constraint::Length(12),
        Constraint::Length(8),
        Constraint::Length(6),
        Constraint::Length(7),
        Constraint::Length(10),
        Constraint::Length(10),
        Constraint::Length(12),
        Constraint::Min(8),
    ];

    let title = format!("Trades ({})", state.trades.len());
    let table = Table::new(rows, widths)
        .header(header)
        .block(Block::default().borders(Borders::ALL).title(title))
        .row_highlight_style(Style::default().bg(Color::DarkGray))
        .highlight_symbol("> ");

    let selected = (!state.trades.is_empty()).then_some(state.selected_trade);
    let mut table_state = TableState::default().with_selected(selected);
    frame.render_stateful_widget(table, area, &mut table_state);
}

fn trade_row(trade: &Trade) -> Row<'static> {
    let side_color = match trade.side {
        Side::Long => Color::Cyan,
        Side::Short => Color::Magenta,
    };
    let exit = trade
        .exit_price
        .map(format_price)
        .unwrap_or_else(|| "open".to_string());
    let pnl = match trade.pnl() {
        Some(p) => Cell::from(format_money(p)).style(Style::default().fg(pnl_color(p))),
        None => Cell::from("--").style(Style::default().fg(Color::DarkGray)),
    };

    Row::new(vec![
        Cell::from(trade.entry_time.format("%m-%d %H:%M").to_string()),
        Cell::from(trade.symbol.clone()),
        Cell::from(trade.side.to_string()).style(Style::default().fg(side_color)),
        Cell::from(format_quantity(trade.quantity)),
        Cell::from(format_price(trade.entry_price)),
        Cell::from(exit),
        pnl,
        Cell::from(trade.setup.clone().unwrap_or_default()),
    ])
}

/// Whole quantities without decimals, fractional ones as given.
pub fn format_quantity(quantity: f64) -> String {
    if quantity.fract() == 0.0 {
        format!("{quantity:.0}")
    } else {
        quantity.to_string()
    }
}

pub fn format_price(price: f64) -> String {
    format!("{price:.2}")
}
