use ratatui::{
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Paragraph, Wrap},
    Frame,
};

use crate::app::{App, InputMode, Role};

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    // Main layout: header, transcript, input, footer
    let [header_area, chat_area, input_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(3),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);
    render_chat(app, frame, chat_area);
    render_input(app, frame, input_area);
    render_footer(app, frame, footer_area);
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let title = Line::from(vec![
        Span::styled(" streamchat ", Style::default().fg(Color::Cyan).bold()),
        Span::styled(
            format!("session {} ", app.session.short()),
            Style::default().fg(Color::Gray),
        ),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::Gray),
        ),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_chat(app: &mut App, frame: &mut Frame, area: Rect) {
    // Store transcript dimensions for scroll calculations (inner size minus borders)
    app.chat_height = area.height.saturating_sub(2);
    app.chat_width = area.width.saturating_sub(2);

    let chat_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(" Conversation ");

    let chat_text = if app.conversation.is_empty() && !app.is_loading() {
        Text::from(Span::styled(
            "Ask a question to get started...",
            Style::default().fg(Color::DarkGray),
        ))
    } else {
        let mut lines: Vec<Line> = Vec::new();
        let message_count = app.conversation.len();

        for (idx, msg) in app.conversation.messages().iter().enumerate() {
            match msg.role {
                Role::User => {
                    lines.push(Line::from(Span::styled(
                        "You:",
                        Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
                    )));
                }
                Role::Assistant => {
                    lines.push(Line::from(Span::styled(
                        "AI:",
                        Style::default()
                            .fg(Color::Yellow)
                            .add_modifier(Modifier::BOLD),
                    )));
                }
            }

            let is_streaming_placeholder =
                msg.content.is_empty() && app.is_loading() && idx + 1 == message_count;
            if is_streaming_placeholder {
                // Animated ellipsis: cycles through ".", "..", "..."
                let dots = ".".repeat((app.animation_frame as usize) + 1);
                lines.push(Line::from(Span::styled(
                    format!("Thinking{}", dots),
                    Style::default()
                        .fg(Color::DarkGray)
                        .add_modifier(Modifier::ITALIC),
                )));
            } else if msg.content.is_empty() {
                lines.push(Line::default());
            } else {
                for line in msg.content.lines() {
                    lines.push(Line::from(line));
                }
            }

            lines.push(Line::default());
        }

        Text::from(lines)
    };

    let chat = Paragraph::new(chat_text)
        .block(chat_block)
        .wrap(Wrap { trim: true })
        .scroll((app.chat_scroll, 0));

    frame.render_widget(chat, area);
}

fn render_input(app: &App, frame: &mut Frame, area: Rect) {
    let input_border_color = if app.input_mode == InputMode::Editing {
        Color::Yellow
    } else {
        Color::DarkGray
    };

    let input_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(input_border_color))
        .title(" Ask ");

    // Horizontal scrolling keeps the cursor inside the inner width
    let inner_width = area.width.saturating_sub(2) as usize;
    let cursor_pos = app.input_cursor;

    let scroll_offset = if inner_width == 0 {
        0
    } else if cursor_pos >= inner_width {
        cursor_pos - inner_width + 1
    } else {
        0
    };

    let visible_text: String = app
        .input
        .chars()
        .skip(scroll_offset)
        .take(inner_width)
        .collect();

    let input = Paragraph::new(visible_text)
        .style(Style::default().fg(Color::Cyan))
        .block(input_block);

    frame.render_widget(input, area);

    // Show cursor when editing
    if app.input_mode == InputMode::Editing {
        let cursor_x = (cursor_pos - scroll_offset) as u16;
        frame.set_cursor_position((area.x + cursor_x + 1, area.y + 1));
    }
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let (mode_text, mode_style) = match app.input_mode {
        InputMode::Normal => (" SCROLL ", Style::default().bg(Color::Blue).fg(Color::White)),
        InputMode::Editing => (
            " TYPING ",
            Style::default().bg(Color::Yellow).fg(Color::Black),
        ),
    };

    let hints = match app.input_mode {
        InputMode::Normal => " i type · j/k scroll · g/G top/bottom · q quit",
        InputMode::Editing => " Enter send · Esc scroll mode · Ctrl-C quit",
    };

    let mut spans = vec![
        Span::styled(mode_text, mode_style),
        Span::styled(hints, Style::default().fg(Color::Gray)),
    ];
    if app.is_loading() {
        spans.push(Span::styled(
            "  [streaming]",
            Style::default().fg(Color::Yellow),
        ));
    }

    let footer = Paragraph::new(Line::from(spans));
    frame.render_widget(footer, area);
}
