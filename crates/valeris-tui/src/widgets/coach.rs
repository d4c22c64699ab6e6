// AI coach widget: streams the coach's reply to the last question.
//
// Header: "AI Coach -- streaming.../complete/press a to ask"
// Body: coach_text with word wrap, auto-scrolled while streaming.

use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};
use ratatui::Frame;

use valeris_app::protocol::LlmStatus;

use crate::ViewState;

pub fn render(frame: &mut Frame, area: Rect, state: &ViewState) {
    let content = if state.coach_text.is_empty() {
        placeholder_text(state.coach_status, state.llm_enabled).to_string()
    } else {
        state.coach_text.clone()
    };

    let inner_height = area.height.saturating_sub(2) as usize;
    let line_count = content.lines().count();
    let scroll = if state.coach_status == LlmStatus::Streaming && line_count > inner_height {
        (line_count - inner_height) as u16
    } else {
        state.scroll_offset.get("coach").copied().unwrap_or(0) as u16
    };

    let paragraph = Paragraph::new(content)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(build_title(state.coach_status, state.llm_enabled))
                .border_style(border_style(state.coach_status)),
        )
        .wrap(Wrap { trim: false })
        .scroll((scroll, 0));
    frame.render_widget(paragraph, area);
}

fn build_title(status: LlmStatus, enabled: bool) -> Line<'static> {
    let (status_text, status_color) = status_indicator(status, enabled);
    Line::from(vec![
        Span::styled("AI Coach", Style::default().add_modifier(Modifier::BOLD)),
        Span::styled(" -- ", Style::default().fg(Color::DarkGray)),
        Span::styled(status_text, Style::default().fg(status_color)),
    ])
}

pub fn status_indicator(status: LlmStatus, enabled: bool) -> (&'static str, Color) {
    match status {
        LlmStatus::Idle if !enabled => ("unavailable", Color::DarkGray),
        LlmStatus::Idle => ("press a to ask", Color::DarkGray),
        LlmStatus::Streaming => ("streaming...", Color::Yellow),
        LlmStatus::Complete => ("complete", Color::Green),
        LlmStatus::Error => ("error", Color::Red),
    }
}

fn border_style(status: LlmStatus) -> Style {
    match status {
        LlmStatus::Streaming => Style::default().fg(Color::Yellow),
        LlmStatus::Error => Style::default().fg(Color::Red),
        _ => Style::default(),
    }
}

pub fn placeholder_text(status: LlmStatus, enabled: bool) -> &'static str {
    match status {
        LlmStatus::Idle if !enabled => {
            "The AI coach needs an Anthropic API key. Add it to config/credentials.toml and restart."
        }
        LlmStatus::Idle => {
            "Ask the coach about your trading. It sees your stats for the selected range, \
             your recent trades and your challenge progress."
        }
        LlmStatus::Streaming => "Thinking...",
        LlmStatus::Complete => "The coach had nothing to add.",
        LlmStatus::Error => "Sorry, I encountered an error. Please try again.",
    }
}
