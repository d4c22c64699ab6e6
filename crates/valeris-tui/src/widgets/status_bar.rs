// Status bar widget: capture bridge status, trader, date range, tab bar.

use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::Paragraph;
use ratatui::Frame;

use valeris_app::protocol::{ConnectionStatus, TabId};

use crate::ViewState;

/// Layout: [capture dot] [trader] | [range] | [tabs] | [status message]
pub fn render(frame: &mut Frame, area: Rect, state: &ViewState) {
    let mut spans = Vec::new();

    let (dot, dot_color) = connection_indicator(state.capture_status);
    spans.push(Span::styled(format!(" {} ", dot), Style::default().fg(dot_color)));

    let name = if state.display_name.is_empty() {
        "Valeris"
    } else {
        state.display_name.as_str()
    };
    spans.push(Span::styled(
        name.to_string(),
        Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
    ));
    spans.push(Span::styled(" | ", Style::default().fg(Color::Gray)));

    if !state.range_label.is_empty() {
        spans.push(Span::styled(
            state.range_label.clone(),
            Style::default().fg(Color::Cyan),
        ));
        spans.push(Span::styled(" | ", Style::default().fg(Color::Gray)));
    }

    spans.extend(tab_spans(state.active_tab));

    if let Some(message) = &state.status_message {
        spans.push(Span::styled("| ", Style::default().fg(Color::Gray)));
        spans.push(Span::styled(message.clone(), Style::default().fg(Color::Yellow)));
    }

    let paragraph = Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::Black));
    frame.render_widget(paragraph, area);
}

/// Dot character and colour for the capture bridge.
pub fn connection_indicator(status: ConnectionStatus) -> (&'static str, Color) {
    match status {
        ConnectionStatus::Connected => ("●", Color::Green),
        ConnectionStatus::Disconnected => ("●", Color::Red),
    }
}

/// "[1:Trades] [2:Analytics] ..." with the active tab highlighted.
pub fn tab_spans(active: TabId) -> Vec<Span<'static>> {
    let mut spans = Vec::new();
    for (i, tab) in TabId::ALL.iter().enumerate() {
        let style = if *tab == active {
            Style::default()
                .fg(Color::Black)
                .bg(Color::White)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::White)
        };
        spans.push(Span::styled(format!("[{}:{}]", i + 1, tab.label()), style));
        spans.push(Span::raw(" "));
    }
    spans
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_indicator_colors() {
        assert_eq!(connection_indicator(ConnectionStatus::Connected).1, Color::Green);
        assert_eq!(connection_indicator(ConnectionStatus::Disconnected).1, Color::Red);
    }

    #[test]
    fn tab_spans_labels_and_highlight() {
        let spans = tab_spans(TabId::Coach);
        let labels: Vec<&str> = spans
            .iter()
            .step_by(2)
            .map(|s| s.content.as_ref())
            .collect();
        assert_eq!(
            labels,
            vec!["[1:Trades]", "[2:Analytics]", "[3:Coach]", "[4:Evaluation]", "[5:News]"]
        );
        // 0=[1] 1=" " 2=[2] 3=" " 4=[3]
        assert!(spans[4].style.add_modifier.contains(Modifier::BOLD));
        assert!(!spans[0].style.add_modifier.contains(Modifier::BOLD));
    }

    #[test]
    fn render_shows_status_message() {
        let mut state = crate::fixtures::loaded_state();
        state.status_message = Some("Trade deleted".to_string());
        let line = crate::fixtures::render_text(160, 1, |frame| render(frame, frame.area(), &state));
        assert!(line.contains("Test Trader"));
        assert!(line.contains("All time"));
        assert!(line.contains("Trade deleted"));
    }

    #[test]
    fn render_does_not_panic_with_defaults() {
        let backend = ratatui::backend::TestBackend::new(80, 1);
        let mut terminal = ratatui::Terminal::new(backend).unwrap();
        let state = ViewState::default();
        terminal
            .draw(|frame| render(frame, frame.area(), &state))
            .unwrap();
    }
}
