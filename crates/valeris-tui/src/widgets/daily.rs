// Sidebar: realized pnl per day, most recent first.

use ratatui::layout::Rect;
use ratatui::style::{Color, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph};
use ratatui::Frame;

use valeris_journal::stats::DailyPnl;

use super::pnl_span;
use crate::ViewState;

pub fn render(frame: &mut Frame, area: Rect, state: &ViewState) {
    let visible = area.height.saturating_sub(2) as usize;
    let lines: Vec<Line> = if state.daily.is_empty() {
        vec![Line::from(Span::styled(
            "No closed trades",
            Style::default().fg(Color::DarkGray),
        ))]
    } else {
        state.daily.iter().rev().take(visible).map(day_line).collect()
    };

    let paragraph =
        Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Daily P&L"));
    frame.render_widget(paragraph, area);
}

fn day_line(day: &DailyPnl) -> Line<'static> {
    Line::from(vec![
        Span::styled(
            day.date.format("%a %m-%d ").to_string(),
            Style::default().fg(Color::DarkGray),
        ),
        pnl_span(day.pnl),
        Span::styled(
            format!("  {}/{}", day.wins, day.trades),
            Style::default().fg(Color::DarkGray),
        ),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;

    #[test]
    fn newest_day_first() {
        let state = fixtures::loaded_state();
        let text = fixtures::render_text(40, 6, |frame| render(frame, frame.area(), &state));
        let newest = text.find("03-03").unwrap();
        let oldest = text.find("03-02").unwrap();
        assert!(newest < oldest);
        assert!(text.contains("-$40.00"));
    }

    #[test]
    fn visible_rows_are_capped() {
        let state = fixtures::loaded_state();
        let text = fixtures::render_text(40, 3, |frame| render(frame, frame.area(), &state));
        assert!(text.contains("03-03"));
        assert!(!text.contains("03-02"));
    }

    #[test]
    fn render_empty() {
        let state = ViewState::default();
        let text = fixtures::render_text(40, 4, |frame| render(frame, frame.area(), &state));
        assert!(text.contains("No closed trades"));
    }
}
