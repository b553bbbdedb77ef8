use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseEvent, MouseEventKind};
use tracing::warn;

use crate::api::StreamEvent;
use crate::app::{App, InputMode, Update};
use crate::tui::AppEvent;

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

pub fn handle_event(app: &mut App, event: AppEvent) {
    match event {
        AppEvent::Key(key) => handle_key(app, key),
        AppEvent::Mouse(mouse) => handle_mouse(app, mouse),
        AppEvent::Resize => {}
        AppEvent::Tick => app.tick_animation(),
    }
}

pub fn handle_key(app: &mut App, key: KeyEvent) {
    // Global keys that work in any mode
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.quit();
        return;
    }

    match app.input_mode {
        InputMode::Normal => handle_normal_mode(app, key),
        InputMode::Editing => handle_editing_mode(app, key),
    }
}

fn handle_normal_mode(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('q') | KeyCode::Esc => app.quit(),

        // Transcript scrolling
        KeyCode::Char('j') | KeyCode::Down => app.scroll_down(),
        KeyCode::Char('k') | KeyCode::Up => app.scroll_up(),
        KeyCode::Char('g') => app.scroll_to_top(),
        KeyCode::Char('G') => app.scroll_chat_to_bottom(),

        // Back to typing
        KeyCode::Char('i') | KeyCode::Char('/') | KeyCode::Enter => {
            app.input_mode = InputMode::Editing;
            app.input_cursor = app.input.chars().count();
        }

        _ => {}
    }
}

fn handle_editing_mode(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => {
            app.input_mode = InputMode::Normal;
        }
        KeyCode::Enter => {
            submit_question(app);
        }
        KeyCode::Backspace => {
            if app.input_cursor > 0 {
                app.input_cursor -= 1;
                let byte_pos = char_to_byte_index(&app.input, app.input_cursor);
                app.input.remove(byte_pos);
            }
        }
        KeyCode::Delete => {
            let char_count = app.input.chars().count();
            if app.input_cursor < char_count {
                let byte_pos = char_to_byte_index(&app.input, app.input_cursor);
                app.input.remove(byte_pos);
            }
        }
        KeyCode::Left => {
            app.input_cursor = app.input_cursor.saturating_sub(1);
        }
        KeyCode::Right => {
            let char_count = app.input.chars().count();
            app.input_cursor = (app.input_cursor + 1).min(char_count);
        }
        KeyCode::Home => {
            app.input_cursor = 0;
        }
        KeyCode::End => {
            app.input_cursor = app.input.chars().count();
        }
        KeyCode::Char(c) => {
            let byte_pos = char_to_byte_index(&app.input, app.input_cursor);
            app.input.insert(byte_pos, c);
            app.input_cursor += 1;
        }
        _ => {}
    }
}

/// Open the answer stream for the current input and pump its events back into
/// the main loop. Refused submissions (empty input, one already in flight)
/// never reach the network.
fn submit_question(app: &mut App) {
    let Some(question) = app.begin_submission() else {
        return;
    };

    let client = app.client.clone();
    let session = app.session.clone();
    let tx = app.updates_tx.clone();

    app.stream_task = Some(tokio::spawn(async move {
        let mut stream = match client.open_stream(&session, &question).await {
            Ok(stream) => stream,
            Err(err) => {
                warn!(%session, "could not open answer stream: {err:#}");
                let _ = tx.send(Update::OpenFailed);
                return;
            }
        };

        let _ = tx.send(Update::Opened);
        loop {
            match stream.next_event().await {
                Ok(Some(StreamEvent::Fragment(text))) => {
                    let _ = tx.send(Update::Fragment(text));
                }
                Ok(Some(StreamEvent::Done)) | Ok(None) => {
                    let _ = tx.send(Update::Completed);
                    break;
                }
                Err(err) => {
                    warn!(%session, "answer stream failed: {err:#}");
                    let _ = tx.send(Update::StreamFailed);
                    break;
                }
            }
        }
    }));
}

fn handle_mouse(app: &mut App, mouse: MouseEvent) {
    match mouse.kind {
        MouseEventKind::ScrollDown => {
            app.scroll_down();
            app.scroll_down();
            app.scroll_down();
        }
        MouseEventKind::ScrollUp => {
            app.scroll_up();
            app.scroll_up();
            app.scroll_up();
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::Phase;
    use tokio::sync::mpsc;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn editing_app() -> App {
        let (tx, _rx) = mpsc::unbounded_channel();
        App::new("http://localhost:8000", tx)
    }

    #[test]
    fn test_typing_inserts_at_cursor() {
        let mut app = editing_app();
        for c in "heo".chars() {
            handle_key(&mut app, key(KeyCode::Char(c)));
        }
        handle_key(&mut app, key(KeyCode::Left));
        handle_key(&mut app, key(KeyCode::Char('l')));
        handle_key(&mut app, key(KeyCode::Char('l')));
        assert_eq!(app.input, "hello");
        assert_eq!(app.input_cursor, 4);
    }

    #[test]
    fn test_backspace_removes_multibyte_char() {
        let mut app = editing_app();
        for c in "héllo".chars() {
            handle_key(&mut app, key(KeyCode::Char(c)));
        }
        handle_key(&mut app, key(KeyCode::Home));
        handle_key(&mut app, key(KeyCode::Right));
        handle_key(&mut app, key(KeyCode::Right));
        handle_key(&mut app, key(KeyCode::Backspace));
        assert_eq!(app.input, "hllo");
        assert_eq!(app.input_cursor, 1);
    }

    #[test]
    fn test_delete_at_end_is_noop() {
        let mut app = editing_app();
        handle_key(&mut app, key(KeyCode::Char('a')));
        handle_key(&mut app, key(KeyCode::Delete));
        assert_eq!(app.input, "a");
    }

    #[test]
    fn test_enter_on_empty_input_is_noop() {
        let mut app = editing_app();
        handle_key(&mut app, key(KeyCode::Enter));
        assert!(app.conversation.is_empty());
        assert_eq!(app.phase, Phase::Idle);
    }

    #[test]
    fn test_esc_toggles_modes() {
        let mut app = editing_app();
        handle_key(&mut app, key(KeyCode::Esc));
        assert_eq!(app.input_mode, InputMode::Normal);
        handle_key(&mut app, key(KeyCode::Char('i')));
        assert_eq!(app.input_mode, InputMode::Editing);
    }

    #[tokio::test]
    async fn test_enter_submits_and_appends_both_records() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut app = App::new("http://localhost:8000", tx);
        for c in "hi".chars() {
            handle_key(&mut app, key(KeyCode::Char(c)));
        }
        handle_key(&mut app, key(KeyCode::Enter));

        assert_eq!(app.conversation.len(), 2);
        assert_eq!(app.phase, Phase::Submitting);
        assert!(app.stream_task.is_some());
    }

    #[tokio::test]
    async fn test_malformed_endpoint_reports_open_failure() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut app = App::new("not a valid url", tx);
        for c in "hi".chars() {
            handle_key(&mut app, key(KeyCode::Char(c)));
        }
        handle_key(&mut app, key(KeyCode::Enter));
        assert_eq!(app.conversation.len(), 2);

        let update = rx.recv().await.unwrap();
        assert!(matches!(update, Update::OpenFailed));
        app.apply_update(update);

        // User record kept, placeholder removed
        assert_eq!(app.conversation.len(), 1);
        assert_eq!(app.conversation.last().unwrap().content, "hi");
        assert_eq!(app.phase, Phase::Idle);
    }
}
