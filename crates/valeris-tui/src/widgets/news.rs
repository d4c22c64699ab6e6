// Market news tab.

use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};
use ratatui::Frame;

use valeris_app::news::Article;

use crate::ViewState;

pub fn render(frame: &mut Frame, area: Rect, state: &ViewState) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title(format!("Market News ({})", state.news.len()));

    let lines: Vec<Line> = if state.news.is_empty() {
        vec![Line::from(Span::styled(
            "Press u to load market news.",
            Style::default().fg(Color::DarkGray),
        ))]
    } else {
        state.news.iter().flat_map(article_lines).collect()
    };

    let scroll = state.scroll_offset.get("news").copied().unwrap_or(0) as u16;
    let paragraph = Paragraph::new(lines)
        .block(block)
        .wrap(Wrap { trim: true })
        .scroll((scroll, 0));
    frame.render_widget(paragraph, area);
}

/// Title, byline, optional summary, then a blank separator.
pub fn article_lines(article: &Article) -> Vec<Line<'static>> {
    let mut byline = Vec::new();
    if !article.source.is_empty() {
        byline.push(Span::styled(
            article.source.clone(),
            Style::default().fg(Color::Cyan),
        ));
    }
    if let Some(published) = article.published_at {
        if !byline.is_empty() {
            byline.push(Span::styled(" - ", Style::default().fg(Color::DarkGray)));
        }
        byline.push(Span::styled(
            published.format("%Y-%m-%d %H:%M UTC").to_string(),
            Style::default().fg(Color::DarkGray),
        ));
    }

    let mut lines = vec![Line::from(Span::styled(
        article.title.clone(),
        Style::default().add_modifier(Modifier::BOLD),
    ))];
    if !byline.is_empty() {
        lines.push(Line::from(byline));
    }
    if !article.summary.is_empty() {
        lines.push(Line::from(Span::raw(article.summary.clone())));
    }
    lines.push(Line::from(""));
    lines
}
