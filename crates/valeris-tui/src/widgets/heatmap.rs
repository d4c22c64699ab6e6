// Heatmap panel on the analytics tab: closed-trade pnl by weekday and entry
// hour (UTC).
//
// Only hours with at least one trade get a column; columns past the panel
// edge are clipped. Each cell shows the
// trade count, coloured by pnl relative to the strongest cell.

use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph};
use ratatui::Frame;

use valeris_journal::stats::{HeatCell, Heatmap};

use crate::ViewState;

const WEEKDAYS: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];
const CELL_WIDTH: usize = 4;

pub fn render(frame: &mut Frame, area: Rect, state: &ViewState) {
    let hours = state.heatmap.active_hours();
    let block = Block::default()
        .borders(Borders::ALL)
        .title("Heatmap -- weekday x entry hour (UTC)");

    if hours.is_empty() {
        let paragraph = Paragraph::new(Span::styled(
            "No closed trades in this range.",
            Style::default().fg(Color::DarkGray),
        ))
        .block(block);
        frame.render_widget(paragraph, area);
        return;
    }

    let lines = grid_lines(&state.heatmap, &hours);

    let paragraph = Paragraph::new(lines).block(block);
    frame.render_widget(paragraph, area);
}

pub fn grid_lines(map: &Heatmap, hours: &[usize]) -> Vec<Line<'static>> {
    let max = map.max_abs_pnl();
    let mut lines = Vec::with_capacity(WEEKDAYS.len() + 2);

    let mut header = vec![Span::raw("     ")];
    header.extend(hours.iter().map(|h| {
        Span::styled(
            format!("{h:>width$}", width = CELL_WIDTH),
            Style::default().add_modifier(Modifier::BOLD),
        )
    }));
    lines.push(Line::from(header));

    for (day, name) in WEEKDAYS.iter().enumerate() {
        let mut spans = vec![Span::styled(
            format!(" {name} "),
            Style::default().fg(Color::DarkGray),
        )];
        for &hour in hours {
            let cell = map.cell(day, hour);
            let text = if cell.trades == 0 {
                format!("{:>width$}", ".", width = CELL_WIDTH)
            } else {
                format!("{:>width$}", cell.trades, width = CELL_WIDTH)
            };
            spans.push(Span::styled(text, Style::default().fg(heat_color(cell, max))));
        }
        lines.push(Line::from(spans));
    }

    lines.push(Line::from(""));
    lines.push(Line::from(vec![
        Span::styled(" legend: ", Style::default().fg(Color::DarkGray)),
        Span::styled("strong win ", Style::default().fg(Color::Green)),
        Span::styled("win ", Style::default().fg(Color::LightGreen)),
        Span::styled("flat ", Style::default().fg(Color::Gray)),
        Span::styled("loss ", Style::default().fg(Color::LightRed)),
        Span::styled("strong loss", Style::default().fg(Color::Red)),
    ]));
    lines
}

/// Cells above half of `max_abs` get the strong colour.
pub fn heat_color(cell: HeatCell, max_abs: f64) -> Color {
    if cell.trades == 0 {
        return Color::DarkGray;
    }
    let strong = max_abs > 0.0 && cell.pnl.abs() / max_abs > 0.5;
    match (cell.pnl > 0.0, cell.pnl < 0.0, strong) {
        (true, _, true) => Color::Green,
        (true, _, false) => Color::LightGreen,
        (_, true, true) => Color::Red,
        (_, true, false) => Color::LightRed,
        _ => Color::Gray,
    }
}
