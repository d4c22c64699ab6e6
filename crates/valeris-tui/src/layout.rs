// Screen layout: panel arrangement and sizing.
//
// +--------------------------------------------------+
// | Status Bar (1 row)                               |
// +--------------------------------------------------+
// | Summary (4 rows)                                 |
// +-------------------------+------------------------+
// | Main Panel (65%)        | Sidebar (35%)          |
// |                         | +- By symbol (55%) ---+|
// |                         | +- Daily P&L (45%) ---+|
// +-------------------------+------------------------+
// | Help Bar (1 row)                                 |
// +--------------------------------------------------+

use ratatui::layout::{Constraint, Direction, Layout, Rect};

/// Resolved screen areas for each dashboard zone.
#[derive(Debug, Clone)]
pub struct AppLayout {
    /// Capture status, trader, range, tabs.
    pub status_bar: Rect,
    /// Headline numbers for the current range.
    pub summary: Rect,
    /// Tab-switched content area.
    pub main_panel: Rect,
    pub breakdown: Rect,
    pub daily: Rect,
    /// Key hints, or the line being typed.
    pub help_bar: Rect,
}

pub fn build_layout(area: Rect) -> AppLayout {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1), // status bar
            Constraint::Length(4), // summary
            Constraint::Min(10),   // main + sidebar
            Constraint::Length(1), // help bar
        ])
        .split(area);

    let horizontal = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(65), Constraint::Percentage(35)])
        .split(vertical[2]);

    let sidebar = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
        .split(horizontal[1]);

    AppLayout {
        status_bar: vertical[0],
        summary: vertical[1],
        main_panel: horizontal[0],
        breakdown: sidebar[0],
        daily: sidebar[1],
        help_bar: vertical[3],
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
