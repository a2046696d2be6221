//! UI rendering for the TUI.

use chrono::Local;
use ratatui::{
    layout::{Constraint, Layout, Margin, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span},
    widgets::{
        Block, BorderType, Borders, List, ListItem, Paragraph, Scrollbar, ScrollbarOrientation,
        ScrollbarState, Wrap,
    },
    Frame,
};
use skiff_core::{ChannelStatus, ChatSession, Message, PageRef, Role, Source};

use crate::app::{App, InputMode};

// ========== Color Palette ==========

/// User message header color
const ROLE_USER: Color = Color::Rgb(0, 180, 180);
/// Assistant message header color
const ROLE_ASSISTANT: Color = Color::Rgb(80, 180, 80);
/// System message header color
const ROLE_SYSTEM: Color = Color::Rgb(120, 120, 120);
/// Separator line color
const SEPARATOR_COLOR: Color = Color::Rgb(60, 60, 60);
/// Border color for the sessions sidebar
const BORDER_SESSIONS: Color = Color::Rgb(0, 150, 150);
/// Border color for the transcript
const BORDER_TRANSCRIPT: Color = Color::Rgb(80, 160, 80);
/// Border color for the input line
const BORDER_INPUT: Color = Color::Rgb(180, 100, 180);
/// Label color for source citations
const SOURCE_COLOR: Color = Color::Rgb(100, 180, 180);
/// Dim gray for secondary text
const DIM: Color = Color::Rgb(128, 128, 128);

/// Render the application UI.
pub fn render(frame: &mut Frame, app: &mut App) {
    let area = frame.area();

    // Layout: header, body, input, footer
    let chunks = Layout::vertical([
        Constraint::Length(2), // Header
        Constraint::Min(5),    // Sidebar + transcript
        Constraint::Length(3), // Input line
        Constraint::Length(1), // Footer
    ])
    .split(area);

    render_header(frame, app, chunks[0]);

    let body = Layout::horizontal([
        Constraint::Length(26), // Sessions sidebar
        Constraint::Min(30),    // Transcript
    ])
    .split(chunks[1]);

    render_sessions(frame, app, body[0]);
    render_transcript(frame, app, body[1]);
    render_input(frame, app, chunks[2]);
    render_footer(frame, app, chunks[3]);
}

/// Render the header with app name, channel status, and backend health.
fn render_header(frame: &mut Frame, app: &App, area: Rect) {
    let (status_text, status_color) = match app.channel_status() {
        ChannelStatus::Connecting => ("connecting", Color::Yellow),
        ChannelStatus::Connected => ("● live", Color::Green),
        ChannelStatus::Disconnected => ("○ offline", DIM),
        ChannelStatus::Failed => ("○ offline", DIM),
    };

    let mut spans = vec![
        Span::styled(" skiff", Style::default().fg(Color::Cyan).bold()),
        Span::raw("  "),
        Span::styled(status_text, Style::default().fg(status_color)),
    ];

    if !app.backend_healthy() {
        spans.push(Span::raw("  "));
        spans.push(Span::styled(
            "backend unreachable",
            Style::default().fg(Color::Red).bold(),
        ));
    }

    if let Some(error) = &app.registry.state().error {
        spans.push(Span::raw("  "));
        spans.push(Span::styled(
            error.clone(),
            Style::default().fg(Color::Red),
        ));
    }

    let header = Paragraph::new(Line::from(spans)).block(Block::default().borders(Borders::BOTTOM));
    frame.render_widget(header, area);
}

/// Render the sessions sidebar, most recent first.
fn render_sessions(frame: &mut Frame, app: &App, area: Rect) {
    let current = app.registry.current_session_id().map(String::from);
    let sessions = app.registry.sessions_by_recency();

    let items: Vec<ListItem> = sessions
        .iter()
        .map(|session| session_item(session, current.as_deref()))
        .collect();

    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(BORDER_SESSIONS))
        .title(" Conversations ")
        .title_style(Style::default().fg(BORDER_SESSIONS).bold());

    if items.is_empty() {
        let empty = Paragraph::new("No conversations yet.\n\nPress Ctrl+N or just\nstart typing.")
            .style(Style::default().fg(DIM))
            .block(block);
        frame.render_widget(empty, area);
        return;
    }

    frame.render_widget(List::new(items).block(block), area);
}

/// Build one sidebar row for a session.
fn session_item<'a>(session: &ChatSession, current: Option<&str>) -> ListItem<'a> {
    let is_current = current == Some(session.id.as_str());
    let marker = if is_current { "▶ " } else { "  " };
    let name_style = if is_current {
        Style::default().fg(Color::Cyan).bold()
    } else {
        Style::default().fg(Color::White)
    };

    ListItem::new(vec![
        Line::from(vec![
            Span::styled(marker, Style::default().fg(Color::Cyan)),
            Span::styled(session.name.clone(), name_style),
        ]),
        Line::from(Span::styled(
            format!(
                "    {} msgs · {}",
                session.messages.len(),
                session.updated_at.with_timezone(&Local).format("%b %d")
            ),
            Style::default().fg(DIM),
        )),
    ])
}

/// Render the transcript of the current session.
fn render_transcript(frame: &mut Frame, app: &mut App, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(BORDER_TRANSCRIPT))
        .title(" Messages ")
        .title_style(Style::default().fg(BORDER_TRANSCRIPT).bold());

    let Some(session) = app.registry.current_session() else {
        let placeholder = Paragraph::new("Type a message to start a conversation.")
            .style(Style::default().fg(DIM))
            .block(block);
        frame.render_widget(placeholder, area);
        return;
    };

    let mut lines: Vec<Line> = Vec::new();
    for (idx, msg) in session.messages.iter().enumerate() {
        if idx > 0 {
            lines.push(Line::from(Span::styled(
                "─".repeat(40),
                Style::default().fg(SEPARATOR_COLOR),
            )));
        }
        lines.extend(format_message(msg));
        lines.push(Line::raw(""));
    }

    if app.registry.state().is_loading {
        lines.push(Line::from(Span::styled(
            "… thinking",
            Style::default().fg(Color::Yellow).italic(),
        )));
    }

    // Offset counts back from the bottom so new replies stay in view.
    let viewport = area.height.saturating_sub(2) as usize;
    let max_scroll = lines.len().saturating_sub(viewport);
    if app.scroll_offset > max_scroll {
        app.scroll_offset = max_scroll;
    }
    let scroll = max_scroll - app.scroll_offset;

    let paragraph = Paragraph::new(lines.clone())
        .block(block)
        .wrap(Wrap { trim: false })
        .scroll((scroll as u16, 0));
    frame.render_widget(paragraph, area);

    let scrollbar = Scrollbar::new(ScrollbarOrientation::VerticalRight)
        .begin_symbol(Some("↑"))
        .end_symbol(Some("↓"));
    let mut scrollbar_state = ScrollbarState::new(lines.len()).position(scroll);
    frame.render_stateful_widget(
        scrollbar,
        area.inner(Margin {
            vertical: 1,
            horizontal: 0,
        }),
        &mut scrollbar_state,
    );
}

/// Format a single message into display lines.
fn format_message(msg: &Message) -> Vec<Line<'static>> {
    let (label, style) = match msg.role {
        Role::User => ("You", Style::default().fg(ROLE_USER).bold()),
        Role::Assistant => ("Assistant", Style::default().fg(ROLE_ASSISTANT).bold()),
        Role::System => ("System", Style::default().fg(ROLE_SYSTEM)),
    };

    let mut lines = Vec::new();
    lines.push(Line::from(vec![
        Span::styled(label, style),
        Span::styled(
            format!(
                "  {}",
                msg.created_at.with_timezone(&Local).format("%H:%M")
            ),
            Style::default().fg(DIM),
        ),
    ]));

    for line in msg.content.lines() {
        lines.push(Line::from(Span::raw(format!("  {}", line))));
    }

    if let Some(sources) = &msg.sources {
        if !sources.is_empty() {
            lines.push(Line::from(Span::styled(
                "  Sources:",
                Style::default().fg(SOURCE_COLOR),
            )));
            for source in sources {
                lines.push(format_source(source));
            }
        }
    }

    lines
}

/// Format one source citation line.
fn format_source(source: &Source) -> Line<'static> {
    let mut label = source.metadata.source.clone();
    if label.is_empty() {
        label = "(unknown source)".to_string();
    }
    match &source.metadata.page {
        Some(PageRef::Number(n)) => label.push_str(&format!(", p. {}", n)),
        Some(PageRef::Label(l)) => label.push_str(&format!(", {}", l)),
        None => {}
    }

    Line::from(vec![
        Span::styled("    • ", Style::default().fg(SOURCE_COLOR)),
        Span::styled(label, Style::default().fg(Color::White)),
        Span::styled(
            format!("  ({:.0}%)", source.similarity * 100.0),
            Style::default().fg(DIM),
        ),
    ])
}

/// Render the input line (compose or rename).
fn render_input(frame: &mut Frame, app: &App, area: Rect) {
    let (title, text) = match app.input_mode {
        InputMode::Compose => (" Message ", app.input.as_str()),
        InputMode::Rename => (" Rename conversation ", app.rename_buffer.as_str()),
    };

    let input = Paragraph::new(format!("{}█", text)).block(
        Block::default()
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded)
            .border_style(Style::default().fg(BORDER_INPUT))
            .title(title)
            .title_style(Style::default().fg(BORDER_INPUT).bold()),
    );
    frame.render_widget(input, area);
}

/// Render the footer with key hints.
fn render_footer(frame: &mut Frame, app: &App, area: Rect) {
    let mut spans = vec![
        Span::styled(" Enter", Style::default().fg(Color::Yellow)),
        Span::raw(" send  "),
        Span::styled("Tab", Style::default().fg(Color::Yellow)),
        Span::raw(" switch  "),
        Span::styled("^N", Style::default().fg(Color::Yellow)),
        Span::raw(" new  "),
        Span::styled("^R", Style::default().fg(Color::Yellow)),
        Span::raw(" rename  "),
        Span::styled("^L", Style::default().fg(Color::Yellow)),
        Span::raw(" clear  "),
        Span::styled("^X", Style::default().fg(Color::Yellow)),
        Span::raw(" delete  "),
        Span::styled("^W", Style::default().fg(Color::Yellow)),
        Span::raw(" web  "),
        Span::styled("^Q", Style::default().fg(Color::Yellow)),
        Span::raw(" quit  "),
    ];

    spans.push(Span::raw("│ "));
    let web_style = if app.include_web {
        Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(DIM)
    };
    spans.push(Span::styled(
        if app.include_web { "web on" } else { "web off" },
        web_style,
    ));

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}
