// Keyboard input handling and command dispatch.
//
// Translates crossterm key events into UserCommand messages for the app
// loop, or into local ViewState mutations (scrolling, selection, typing).

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

use valeris_app::protocol::{TabId, TradeDraft, UserCommand};
use valeris_core::models::Side;

use crate::{InputMode, ViewState};

/// Rows moved by PageUp / PageDown.
const PAGE_SIZE: usize = 20;

pub const TRADE_ENTRY_USAGE: &str = "SYMBOL SIDE QTY ENTRY [EXIT] [#setup] [-- notes]";

/// Handle a keyboard event.
///
/// Returns `Some(UserCommand)` when the key press should be forwarded to the
/// app loop. Returns `None` when it was handled locally.
pub fn handle_key(key_event: KeyEvent, view_state: &mut ViewState) -> Option<UserCommand> {
    // Some terminals report Release and Repeat too
    if key_event.kind != KeyEventKind::Press {
        return None;
    }

    // Ctrl+C quits from any mode
    if key_event.modifiers.contains(KeyModifiers::CONTROL) && key_event.code == KeyCode::Char('c')
    {
        return Some(UserCommand::Quit);
    }

    if view_state.confirm_quit {
        return handle_confirm_quit(key_event, view_state);
    }

    if view_state.input_mode != InputMode::Normal {
        return handle_text_input(key_event, view_state);
    }

    match key_event.code {
        KeyCode::Char(c @ '1'..='9') => {
            let tab = TabId::from_digit(c)?;
            switch_tab(view_state, tab)
        }
        KeyCode::Tab => {
            let next = TabId::ALL[(view_state.active_tab.index() + 1) % TabId::ALL.len()];
            switch_tab(view_state, next)
        }

        KeyCode::Up | KeyCode::Char('k') => {
            scroll_up(view_state, 1);
            None
        }
        KeyCode::Down | KeyCode::Char('j') => {
            scroll_down(view_state, 1);
            None
        }
        KeyCode::PageUp => {
            scroll_up(view_state, PAGE_SIZE);
            None
        }
        KeyCode::PageDown => {
            scroll_down(view_state, PAGE_SIZE);
            None
        }

        KeyCode::Char('r') => Some(UserCommand::CycleRange),
        KeyCode::Char('a') => {
            if !view_state.llm_enabled {
                view_state.status_message =
                    Some("Coach unavailable: no Anthropic API key configured".to_string());
                return None;
            }
            begin_input(view_state, InputMode::Coach);
            switch_tab(view_state, TabId::Coach)
        }
        KeyCode::Char('n') => {
            begin_input(view_state, InputMode::NewTrade);
            None
        }
        KeyCode::Char('d') => {
            if view_state.active_tab != TabId::Trades {
                return None;
            }
            let id = view_state.selected_trade()?.id.clone();
            Some(UserCommand::DeleteTrade(id))
        }
        KeyCode::Char('e') => Some(UserCommand::ExportCsv),
        KeyCode::Char('b') => next_broker_sync(view_state),
        KeyCode::Char('u') => {
            view_state.status_message = Some("Fetching market news...".to_string());
            Some(UserCommand::RefreshNews)
        }

        KeyCode::Esc => {
            view_state.status_message = None;
            None
        }

        // Ask first
        KeyCode::Char('q') => {
            view_state.confirm_quit = true;
            None
        }

        _ => None,
    }
}

fn switch_tab(view_state: &mut ViewState, tab: TabId) -> Option<UserCommand> {
    view_state.active_tab = tab;
    Some(UserCommand::SwitchTab(tab))
}

fn begin_input(view_state: &mut ViewState, mode: InputMode) {
    view_state.input_mode = mode;
    view_state.input_text.clear();
}

/// Sync the connection under the cursor and move the cursor on, so repeated
/// presses walk through every linked account.
fn next_broker_sync(view_state: &mut ViewState) -> Option<UserCommand> {
    if view_state.broker_connections.is_empty() {
        view_state.status_message = Some("No broker connections linked".to_string());
        return None;
    }
    let index = view_state.broker_cursor % view_state.broker_connections.len();
    let conn = &view_state.broker_connections[index];
    let id = conn.id.clone();
    view_state.status_message = Some(format!("Syncing {} {}...", conn.broker, conn.account_id));
    view_state.broker_cursor = (index + 1) % view_state.broker_connections.len();
    Some(UserCommand::SyncBroker(id))
}

/// y/q confirm, n/Esc cancel, everything else is swallowed.
fn handle_confirm_quit(key_event: KeyEvent, view_state: &mut ViewState) -> Option<UserCommand> {
    match key_event.code {
        KeyCode::Char('y') | KeyCode::Char('Y') | KeyCode::Char('q') | KeyCode::Char('Q') => {
            Some(UserCommand::Quit)
        }
        KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
            view_state.confirm_quit = false;
            None
        }
        _ => None,
    }
}

/// Line editing for the coach question and quick trade entry.
fn handle_text_input(key_event: KeyEvent, view_state: &mut ViewState) -> Option<UserCommand> {
    match key_event.code {
        KeyCode::Esc => {
            view_state.input_mode = InputMode::Normal;
            view_state.input_text.clear();
            None
        }
        KeyCode::Enter => {
            let mode = view_state.input_mode;
            let text = std::mem::take(&mut view_state.input_text);
            view_state.input_mode = InputMode::Normal;
            submit_input(mode, text.trim(), view_state)
        }
        KeyCode::Backspace => {
            view_state.input_text.pop();
            None
        }
        KeyCode::Char(c) => {
            view_state.input_text.push(c);
            None
        }
        _ => None,
    }
}

fn submit_input(mode: InputMode, text: &str, view_state: &mut ViewState) -> Option<UserCommand> {
    if text.is_empty() {
        return None;
    }
    match mode {
        InputMode::Coach => Some(UserCommand::AskCoach(text.to_string())),
        InputMode::NewTrade => match parse_trade_draft(text) {
            Ok(draft) => Some(UserCommand::AddTrade(Box::new(draft))),
            Err(message) => {
                view_state.status_message = Some(message);
                None
            }
        },
        InputMode::Normal => None,
    }
}

/// Parse a quick entry line such as `ES long 2 5000 5010 #breakout -- held`.
pub fn parse_trade_draft(text: &str) -> Result<TradeDraft, String> {
    let (fields, notes) = match text.split_once("--") {
        Some((fields, notes)) => (fields, Some(notes.trim().to_string())),
        None => (text, None),
    };

    let mut setup = None;
    let mut positional = Vec::new();
    for token in fields.split_whitespace() {
        match token.strip_prefix('#') {
            Some(tag) if !tag.is_empty() => setup = Some(tag.to_string()),
            Some(_) => {}
            None => positional.push(token),
        }
    }

    let [symbol, side, quantity, entry, rest @ ..] = positional.as_slice() else {
        return Err(format!("usage: {TRADE_ENTRY_USAGE}"));
    };
    if rest.len() > 1 {
        return Err(format!("usage: {TRADE_ENTRY_USAGE}"));
    }

    let side = Side::from_order_action(side).ok_or_else(|| format!("unknown side: {side}"))?;
    let exit_price = rest.first().map(|s| number("exit price", s)).transpose()?;

    Ok(TradeDraft {
        symbol: symbol.to_uppercase(),
        side,
        quantity: number("quantity", quantity)?,
        entry_price: number("entry price", entry)?,
        exit_price,
        fees: 0.0,
        setup,
        notes: notes.filter(|n| !n.is_empty()),
    })
}

fn number(what: &str, token: &str) -> Result<f64, String> {
    token
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| format!("invalid {what}: {token}"))
}

// ---------------------------------------------------------------------------
// Scrolling
// ---------------------------------------------------------------------------

/// Scroll key for the widget shown in the main panel.
fn scroll_key(tab: TabId) -> &'static str {
    match tab {
        TabId::Trades => "trades",
        TabId::Analytics => "analytics",
        TabId::Coach => "coach",
        TabId::Evaluation => "evaluation",
        TabId::News => "news",
    }
}

fn scroll_up(view_state: &mut ViewState, amount: usize) {
    if view_state.active_tab == TabId::Trades {
        view_state.selected_trade = view_state.selected_trade.saturating_sub(amount);
        return;
    }
    let entry = view_state
        .scroll_offset
        .entry(scroll_key(view_state.active_tab).to_string())
        .or_insert(0);
    *entry = entry.saturating_sub(amount);
}

fn scroll_down(view_state: &mut ViewState, amount: usize) {
    if view_state.active_tab == TabId::Trades {
        let last = view_state.trades.len().saturating_sub(1);
        view_state.selected_trade = (view_state.selected_trade + amount).min(last);
        return;
    }
    let entry = view_state
        .scroll_offset
        .entry(scroll_key(view_state.active_tab).to_string())
        .or_insert(0);
    *entry += amount;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use crossterm::event::KeyEventState;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent {
            code,
            modifiers: KeyModifiers::NONE,
            kind: KeyEventKind::Press,
            state: KeyEventState::NONE,
        }
    }

    fn ctrl(c: char) -> KeyEvent {
        KeyEvent {
            code: KeyCode::Char(c),
            modifiers: KeyModifiers::CONTROL,
            kind: KeyEventKind::Press,
            state: KeyEventState::NONE,
        }
    }

    fn type_text(state: &mut ViewState, text: &str) {
        for c in text.chars() {
            assert_eq!(handle_key(key(KeyCode::Char(c)), state), None);
        }
    }

    #[test]
    fn release_events_are_ignored() {
        let mut state = ViewState::default();
        let mut event = key(KeyCode::Char('q'));
        event.kind = KeyEventKind::Release;
        assert_eq!(handle_key(event, &mut state), None);
        assert!(!state.confirm_quit);
    }

    #[test]
    fn ctrl_c_quits_from_any_mode() {
        let mut state = ViewState::default();
        assert_eq!(handle_key(ctrl('c'), &mut state), Some(UserCommand::Quit));

        state.input_mode = InputMode::Coach;
        assert_eq!(handle_key(ctrl('c'), &mut state), Some(UserCommand::Quit));
    }

    #[test]
    fn quit_requires_confirmation() {
        let mut state = ViewState::default();
        assert_eq!(handle_key(key(KeyCode::Char('q')), &mut state), None);
        assert!(state.confirm_quit);

        // Other keys are swallowed while the dialog is up
        assert_eq!(handle_key(key(KeyCode::Char('r')), &mut state), None);
        assert!(state.confirm_quit);

        assert_eq!(handle_key(key(KeyCode::Char('n')), &mut state), None);
        assert!(!state.confirm_quit);

        handle_key(key(KeyCode::Char('q')), &mut state);
        assert_eq!(
            handle_key(key(KeyCode::Char('y')), &mut state),
            Some(UserCommand::Quit)
        );
    }

    #[test]
    fn digits_switch_tabs() {
        let mut state = ViewState::default();
        assert_eq!(
            handle_key(key(KeyCode::Char('3')), &mut state),
            Some(UserCommand::SwitchTab(TabId::Coach))
        );
        assert_eq!(state.active_tab, TabId::Coach);

        assert_eq!(handle_key(key(KeyCode::Char('9')), &mut state), None);
        assert_eq!(state.active_tab, TabId::Coach);
    }

    #[test]
    fn four_selects_evaluation() {
        let mut state = ViewState::default();
        assert_eq!(
            handle_key(key(KeyCode::Char('4')), &mut state),
            Some(UserCommand::SwitchTab(TabId::Evaluation))
        );
        assert_eq!(state.active_tab, TabId::Evaluation);

        handle_key(key(KeyCode::Char('j')), &mut state);
        assert_eq!(state.scroll_offset.get("evaluation"), Some(&1));
        assert!(!state.scroll_offset.contains_key("heatmap"));
    }

    #[test]
    fn tab_key_wraps_around() {
        let mut state = ViewState::default();
        state.active_tab = TabId::News;
        assert_eq!(
            handle_key(key(KeyCode::Tab), &mut state),
            Some(UserCommand::SwitchTab(TabId::Trades))
        );
    }

    #[test]
    fn simple_commands() {
        let mut state = ViewState::default();
        assert_eq!(
            handle_key(key(KeyCode::Char('r')), &mut state),
            Some(UserCommand::CycleRange)
        );
        assert_eq!(
            handle_key(key(KeyCode::Char('e')), &mut state),
            Some(UserCommand::ExportCsv)
        );
        assert_eq!(
            handle_key(key(KeyCode::Char('u')), &mut state),
            Some(UserCommand::RefreshNews)
        );
    }

    #[test]
    fn trade_selection_is_clamped() {
        let mut state = fixtures::loaded_state();
        handle_key(key(KeyCode::Down), &mut state);
        assert_eq!(state.selected_trade, 1);
        handle_key(key(KeyCode::PageDown), &mut state);
        assert_eq!(state.selected_trade, 2);
        handle_key(key(KeyCode::Char('k')), &mut state);
        assert_eq!(state.selected_trade, 1);
        handle_key(key(KeyCode::PageUp), &mut state);
        assert_eq!(state.selected_trade, 0);
    }

    #[test]
    fn other_tabs_scroll_by_widget() {
        let mut state = ViewState::default();
        state.active_tab = TabId::News;
        handle_key(key(KeyCode::Char('j')), &mut state);
        handle_key(key(KeyCode::PageDown), &mut state);
        assert_eq!(state.scroll_offset.get("news"), Some(&21));
        handle_key(key(KeyCode::PageUp), &mut state);
        handle_key(key(KeyCode::Up), &mut state);
        handle_key(key(KeyCode::Up), &mut state);
        assert_eq!(state.scroll_offset.get("news"), Some(&0));
        assert!(!state.scroll_offset.contains_key("trades"));
    }

    #[test]
    fn delete_targets_selected_trade() {
        let mut state = fixtures::loaded_state();
        state.selected_trade = 1;
        let expected = state.trades[1].id.clone();
        assert_eq!(
            handle_key(key(KeyCode::Char('d')), &mut state),
            Some(UserCommand::DeleteTrade(expected))
        );

        state.active_tab = TabId::Analytics;
        assert_eq!(handle_key(key(KeyCode::Char('d')), &mut state), None);
    }

    #[test]
    fn delete_with_no_trades_does_nothing() {
        let mut state = ViewState::default();
        assert_eq!(handle_key(key(KeyCode::Char('d')), &mut state), None);
    }

    #[test]
    fn ask_coach_flow() {
        let mut state = fixtures::loaded_state();
        assert_eq!(
            handle_key(key(KeyCode::Char('a')), &mut state),
            Some(UserCommand::SwitchTab(TabId::Coach))
        );
        assert_eq!(state.input_mode, InputMode::Coach);

        type_text(&mut state, "why do I lose on Mondays?x");
        handle_key(key(KeyCode::Backspace), &mut state);
        assert_eq!(
            handle_key(key(KeyCode::Enter), &mut state),
            Some(UserCommand::AskCoach("why do I lose on Mondays?".to_string()))
        );
        assert_eq!(state.input_mode, InputMode::Normal);
        assert!(state.input_text.is_empty());
    }

    #[test]
    fn coach_needs_api_key() {
        let mut state = ViewState::default();
        assert_eq!(handle_key(key(KeyCode::Char('a')), &mut state), None);
        assert_eq!(state.input_mode, InputMode::Normal);
        assert!(state.status_message.as_deref().unwrap().contains("API key"));
    }

    #[test]
    fn esc_cancels_input() {
        let mut state = ViewState::default();
        handle_key(key(KeyCode::Char('n')), &mut state);
        type_text(&mut state, "ES long");
        assert_eq!(handle_key(key(KeyCode::Esc), &mut state), None);
        assert_eq!(state.input_mode, InputMode::Normal);
        assert!(state.input_text.is_empty());
    }

    #[test]
    fn empty_submission_is_dropped() {
        let mut state = ViewState::default();
        handle_key(key(KeyCode::Char('n')), &mut state);
        type_text(&mut state, "   ");
        assert_eq!(handle_key(key(KeyCode::Enter), &mut state), None);
        assert!(state.status_message.is_none());
    }

    #[test]
    fn new_trade_entry_submits_draft() {
        let mut state = ViewState::default();
        handle_key(key(KeyCode::Char('n')), &mut state);
        type_text(&mut state, "es long 2 5000 5010 #breakout -- waited for retest");

        let Some(UserCommand::AddTrade(draft)) = handle_key(key(KeyCode::Enter), &mut state)
        else {
            panic!("expected AddTrade");
        };
        assert_eq!(draft.symbol, "ES");
        assert_eq!(draft.side, Side::Long);
        assert_eq!(draft.quantity, 2.0);
        assert_eq!(draft.entry_price, 5000.0);
        assert_eq!(draft.exit_price, Some(5010.0));
        assert_eq!(draft.setup.as_deref(), Some("breakout"));
        assert_eq!(draft.notes.as_deref(), Some("waited for retest"));
    }

    #[test]
    fn bad_trade_entry_reports_error() {
        let mut state = ViewState::default();
        handle_key(key(KeyCode::Char('n')), &mut state);
        type_text(&mut state, "ES sideways 2 5000");
        assert_eq!(handle_key(key(KeyCode::Enter), &mut state), None);
        assert_eq!(state.status_message.as_deref(), Some("unknown side: sideways"));
    }

    #[test]
    fn parse_trade_draft_variants() {
        let open = parse_trade_draft("NQ sell_short 1 18000").unwrap();
        assert_eq!(open.side, Side::Short);
        assert_eq!(open.exit_price, None);
        assert_eq!(open.setup, None);
        assert_eq!(open.notes, None);

        assert!(parse_trade_draft("NQ short 1").unwrap_err().starts_with("usage:"));
        assert!(parse_trade_draft("NQ short 1 2 3 4").unwrap_err().starts_with("usage:"));
        assert_eq!(
            parse_trade_draft("NQ short one 18000").unwrap_err(),
            "invalid quantity: one"
        );
        assert_eq!(
            parse_trade_draft("NQ short 1 NaN").unwrap_err(),
            "invalid entry price: NaN"
        );
    }

    #[test]
    fn broker_sync_walks_connections() {
        let mut state = fixtures::loaded_state();
        let mut second = state.broker_connections[0].clone();
        second.id = "conn-2".to_string();
        state.broker_connections.push(second);

        assert_eq!(
            handle_key(key(KeyCode::Char('b')), &mut state),
            Some(UserCommand::SyncBroker("conn-1".to_string()))
        );
        assert_eq!(
            handle_key(key(KeyCode::Char('b')), &mut state),
            Some(UserCommand::SyncBroker("conn-2".to_string()))
        );
        assert_eq!(
            handle_key(key(KeyCode::Char('b')), &mut state),
            Some(UserCommand::SyncBroker("conn-1".to_string()))
        );
    }

    #[test]
    fn broker_sync_without_connections() {
        let mut state = ViewState::default();
        assert_eq!(handle_key(key(KeyCode::Char('b')), &mut state), None);
        assert_eq!(
            state.status_message.as_deref(),
            Some("No broker connections linked")
        );
    }
}
