// Help bar: key hints, or the line being typed in an input mode.

use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::Paragraph;
use ratatui::Frame;

use crate::input::TRADE_ENTRY_USAGE;
use crate::{InputMode, ViewState};

const HINTS: &str =
    " q:Quit | 1-5:Tabs | r:Range | n:New trade | d:Delete | a:Ask coach | e:Export | b:Sync broker | u:News";

pub fn render(frame: &mut Frame, area: Rect, state: &ViewState) {
    let line = match prompt(state.input_mode) {
        Some(prompt) => Line::from(vec![
            Span::styled(prompt, Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)),
            Span::styled(state.input_text.clone(), Style::default().fg(Color::White)),
            Span::styled("_", Style::default().fg(Color::White).add_modifier(Modifier::SLOW_BLINK)),
        ]),
        None => Line::from(Span::styled(
            HINTS,
            Style::default().fg(Color::White).add_modifier(Modifier::DIM),
        )),
    };

    let paragraph = Paragraph::new(line).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(paragraph, area);
}

pub fn prompt(mode: InputMode) -> Option<String> {
    match mode {
        InputMode::Normal => None,
        InputMode::Coach => Some(" Ask coach> ".to_string()),
        InputMode::NewTrade => Some(format!(" New trade ({TRADE_ENTRY_USAGE})> ")),
    }
}
