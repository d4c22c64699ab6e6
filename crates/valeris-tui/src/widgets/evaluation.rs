// Evaluation tab: funded-account challenge progress gauge and rule status.

use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Gauge, Paragraph};
use ratatui::Frame;

use valeris_journal::evaluation::{EvaluationReport, EvaluationStatus};

use super::{format_balance, pnl_color};
use crate::ViewState;

pub fn render(frame: &mut Frame, area: Rect, state: &ViewState) {
    let block = Block::default().borders(Borders::ALL).title("Challenge");
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let Some(report) = &state.evaluation else {
        frame.render_widget(
            Paragraph::new(Span::styled("Loading...", Style::default().fg(Color::DarkGray))),
            inner,
        );
        return;
    };

    let sections = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Min(0)])
        .split(inner);

    let gauge = Gauge::default()
        .gauge_style(Style::default().fg(status_color(report.status)).bg(Color::Black))
        .ratio((report.progress_pct / 100.0).clamp(0.0, 1.0))
        .label(format!("{:.0}% of target", report.progress_pct));
    frame.render_widget(gauge, sections[0]);

    let offset = state.scroll_offset.get("evaluation").copied().unwrap_or(0);
    let offset = u16::try_from(offset).unwrap_or(u16::MAX);
    let rules = Paragraph::new(report_lines(report)).scroll((offset, 0));
    frame.render_widget(rules, sections[1]);
}

pub fn status_color(status: EvaluationStatus) -> Color {
    match status {
        EvaluationStatus::InProgress => Color::Yellow,
        EvaluationStatus::Passed => Color::Green,
        EvaluationStatus::Failed(_) => Color::Red,
    }
}

fn report_lines(report: &EvaluationReport) -> Vec<Line<'static>> {
    let dim = Style::default().fg(Color::DarkGray);
    vec![
        Line::from(Span::styled(
            report.status.label(),
            Style::default()
                .fg(status_color(report.status))
                .add_modifier(Modifier::BOLD),
        )),
        Line::from(vec![
            Span::styled("Balance  ", dim),
            Span::raw(format_balance(report.current_balance)),
        ]),
        Line::from(vec![
            Span::styled("Profit   ", dim),
            Span::styled(
                format!("{:+.2}%", report.profit_pct),
                Style::default().fg(pnl_color(report.profit_pct)),
            ),
        ]),
        Line::from(vec![
            Span::styled("Drawdown ", dim),
            Span::raw(format!("{:.2}%", report.drawdown_pct)),
        ]),
        Line::from(vec![
            Span::styled("Worst day ", dim),
            Span::raw(format!("{:.2}%", report.worst_daily_loss_pct)),
        ]),
        Line::from(vec![
            Span::styled("Days     ", dim),
            Span::raw(report.trading_days.to_string()),
        ]),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use valeris_journal::evaluation::FailureReason;

    #[test]
    fn colors_by_status() {
        assert_eq!(status_color(EvaluationStatus::Passed), Color::Green);
        assert_eq!(status_color(EvaluationStatus::InProgress), Color::Yellow);
        assert_eq!(
            status_color(EvaluationStatus::Failed(FailureReason::MaxDrawdown)),
            Color::Red
        );
    }

    #[test]
    fn render_report() {
        let state = fixtures::loaded_state();
        let text = fixtures::render_text(50, 10, |frame| render(frame, frame.area(), &state));
        assert!(text.contains("Challenge"));
        assert!(text.contains("In progress"));
        assert!(text.contains("$49,980.00"));
        assert!(text.contains("0% of target"));
    }

    #[test]
    fn scroll_moves_rule_lines() {
        let mut state = fixtures::loaded_state();
        state.scroll_offset.insert("evaluation".to_string(), 50);
        let text = fixtures::render_text(50, 10, |frame| render(frame, frame.area(), &state));
        assert!(text.contains("0% of target"));
        assert!(!text.contains("$49,980.00"));
    }

    #[test]
    fn render_before_snapshot() {
        let state = ViewState::default();
        let text = fixtures::render_text(40, 6, |frame| render(frame, frame.area(), &state));
        assert!(text.contains("Loading"));
    }

    #[test]
    fn render_in_tiny_area() {
        let state = fixtures::loaded_state();
        fixtures::render_text(10, 3, |frame| render(frame, frame.area(), &state));
    }
}
