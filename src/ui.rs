use crate::app::{App, Mode};
use crate::session::{Sender, MAX_PENDING_FILES};
use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, BorderType, Borders, Clear, List, ListItem, Paragraph, Wrap},
    Frame,
};
use throbber_widgets_tui::Throbber;

const HELP_TEXT: &str = "Controls:\n\nGeneral:\n Ctrl+t: Toggle TTS\n Ctrl+g: Speak (voice input)\n Ctrl+f: Add files\n Ctrl+p: Pending files\n Ctrl+u: Upload files\n Ctrl+d: Uploaded files / download\n Ctrl+c: Quit\n F1: Help\n\nInsert Mode:\n Enter: Send Message\n Esc: Switch to Normal Mode\n\nNormal Mode:\n j/k: Scroll\n i: Switch to Insert Mode\n q: Quit\n\nPending Files:\n d: Remove\n u: Upload\n\nUploaded Files:\n Enter: Select\n s: Download selected\n r: Refresh";

pub fn ui(f: &mut Frame, app: &mut App) {
    let size = f.area();

    if app.show_help {
        let block = Block::default()
            .title(" Help ")
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded);
        let area = centered_rect(60, 70, size);
        f.render_widget(Clear, area);
        f.render_widget(Paragraph::new(HELP_TEXT).block(block), area);
        return;
    }

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header
            Constraint::Min(1),    // History
            Constraint::Length(1), // Files bar
            Constraint::Length(
                (3 + app.input.lines().len().saturating_sub(1) as u16).min(10),
            ),
        ])
        .split(size);

    render_header(f, app, chunks[0]);
    render_history(f, app, chunks[1]);
    render_files_bar(f, app, chunks[2]);
    render_input(f, app, chunks[3]);

    match app.mode {
        Mode::Insert | Mode::Normal => {}
        Mode::FileInput => {
            let area = centered_rect(70, 20, size);
            f.render_widget(Clear, area);
            let remaining = MAX_PENDING_FILES.saturating_sub(app.session.pending_files().len());
            app.file_input.set_block(
                Block::default()
                    .title(format!(
                        " Add Files ({} more allowed, Enter to add, Esc to cancel) ",
                        remaining
                    ))
                    .borders(Borders::ALL)
                    .border_type(BorderType::Rounded)
                    .border_style(Style::default().fg(Color::Green)),
            );
            f.render_widget(&app.file_input, area);
        }
        Mode::PendingFiles => {
            let area = centered_rect(60, 40, size);
            f.render_widget(Clear, area);

            let block = Block::default()
                .title(" Selected Files (d: Remove, u: Upload, Esc: Close) ")
                .borders(Borders::ALL)
                .border_type(BorderType::Rounded);

            let items: Vec<ListItem> = if app.session.pending_files().is_empty() {
                vec![ListItem::new(Span::styled(
                    "No files selected (Ctrl+f to add)",
                    Style::default().fg(Color::DarkGray),
                ))]
            } else {
                app.session
                    .pending_files()
                    .iter()
                    .map(|file| ListItem::new(file.name.clone()))
                    .collect()
            };

            let list = List::new(items)
                .block(block)
                .highlight_style(Style::default().add_modifier(Modifier::REVERSED))
                .highlight_symbol("> ");
            f.render_stateful_widget(list, area, &mut app.pending_list_state);
        }
        Mode::UploadedFiles => {
            let area = centered_rect(60, 50, size);
            f.render_widget(Clear, area);

            let block = Block::default()
                .title(" Uploaded Files (Enter: Select, s: Download, r: Refresh) ")
                .borders(Borders::ALL)
                .border_type(BorderType::Rounded);

            let selected = app.session.selected_file();
            let items: Vec<ListItem> = if app.session.uploaded_files().is_empty() {
                vec![ListItem::new(Span::styled(
                    "No files available",
                    Style::default().fg(Color::DarkGray),
                ))]
            } else {
                app.session
                    .uploaded_files()
                    .iter()
                    .map(|name| {
                        if Some(name.as_str()) == selected {
                            ListItem::new(Span::styled(
                                format!("{} (selected)", name),
                                Style::default()
                                    .fg(Color::Green)
                                    .add_modifier(Modifier::BOLD),
                            ))
                        } else {
                            ListItem::new(name.clone())
                        }
                    })
                    .collect()
            };

            let list = List::new(items)
                .block(block)
                .highlight_style(Style::default().add_modifier(Modifier::REVERSED))
                .highlight_symbol("> ");
            f.render_stateful_widget(list, area, &mut app.uploaded_list_state);
        }
    }

    if let Some(alert) = &app.alert {
        let area = centered_rect(50, 20, size);
        f.render_widget(Clear, area);
        let block = Block::default()
            .title(" Notice (any key to dismiss) ")
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded)
            .border_style(Style::default().fg(Color::Yellow));
        let p = Paragraph::new(alert.as_str())
            .block(block)
            .alignment(Alignment::Center)
            .wrap(Wrap { trim: true });
        f.render_widget(p, area);
    }
}

fn render_header(f: &mut Frame, app: &App, area: Rect) {
    let tts = if app.session.tts_enabled { "TTS on" } else { "TTS off" };
    let title = format!(
        " MindMate - {} - {} (F1 for Help) ",
        tts,
        app.gateway.base_url()
    );
    let header_block = Block::default()
        .borders(Borders::ALL)
        .title(title)
        .style(Style::default().fg(Color::Cyan))
        .border_type(BorderType::Rounded);
    f.render_widget(header_block, area);
}

fn render_history(f: &mut Frame, app: &mut App, history_area: Rect) {
    let width = history_area.width;
    let bubble_max_width = (width as f32 * 0.70) as u16;
    let messages = app.session.messages();

    if messages.is_empty() && !app.session.loading() {
        let p = Paragraph::new(
            "Ask a question about your documents.\n(Ctrl+f: add files, Ctrl+u: upload, F1: help)",
        )
        .alignment(Alignment::Center)
        .style(Style::default().fg(Color::DarkGray));
        f.render_widget(p, centered_rect(80, 50, history_area));
    }

    // (Height, Text, IsUser). A trailing `None` text is the thinking bubble.
    let content_width = bubble_max_width.saturating_sub(2);
    let mut bubbles: Vec<(u16, Option<Text>, bool)> = messages
        .iter()
        .map(|msg| {
            let is_user = msg.sender == Sender::User;
            let text = if is_user {
                Text::raw(msg.text.as_str())
            } else {
                tui_markdown::from_str(&msg.text)
            };
            let height = estimate_wrapped_height(&text, content_width) + 2;
            (height, Some(text), is_user)
        })
        .collect();
    if app.session.loading() {
        bubbles.push((3, None, false));
    }

    let mut total_height: u16 = bubbles.iter().map(|(h, _, _)| *h).sum();
    total_height += (bubbles.len() as u16).saturating_sub(1);

    let viewport_height = history_area.height;
    if app.auto_scroll {
        app.vertical_scroll = total_height.saturating_sub(viewport_height);
    } else {
        let max_scroll = total_height.saturating_sub(viewport_height);
        if app.vertical_scroll > max_scroll {
            app.vertical_scroll = max_scroll;
        }
    }

    let mut current_y = -(app.vertical_scroll as i32);
    for (height, text, is_user) in bubbles {
        let area_top = history_area.y as i32;
        let area_bottom = history_area.bottom() as i32;
        let item_top = area_top + current_y;
        let item_bottom = item_top + height as i32;

        let visible_top = item_top.max(area_top);
        let visible_bottom = item_bottom.min(area_bottom);

        if visible_bottom > visible_top {
            let x = if is_user {
                width.saturating_sub(bubble_max_width)
            } else {
                0
            };
            let rect = Rect::new(
                history_area.x + x,
                visible_top as u16,
                bubble_max_width,
                (visible_bottom - visible_top) as u16,
            );

            let (border_color, title) = if is_user {
                (Color::Green, " You ")
            } else {
                (Color::Cyan, " MindMate ")
            };
            let block = Block::default()
                .borders(Borders::ALL)
                .border_type(BorderType::Rounded)
                .border_style(Style::default().fg(border_color))
                .title(title);

            match text {
                Some(text) => {
                    let scroll_offset = (area_top - item_top).max(0) as u16;
                    let p = Paragraph::new(text)
                        .block(block)
                        .wrap(Wrap { trim: false })
                        .scroll((scroll_offset, 0));
                    f.render_widget(p, rect);
                }
                None => {
                    let throbber = Throbber::default().label("Thinking...").throbber_style(
                        Style::default()
                            .fg(Color::LightCyan)
                            .add_modifier(Modifier::BOLD),
                    );
                    let inner = block.inner(rect);
                    f.render_widget(block, rect);
                    f.render_stateful_widget(throbber, inner, &mut app.spinner_state);
                }
            }
        }
        current_y += height as i32 + 1;
    }
}

fn render_files_bar(f: &mut Frame, app: &App, area: Rect) {
    let session = &app.session;
    let dim = Style::default().fg(Color::DarkGray);

    let mut spans = vec![
        Span::styled(
            format!(
                " Pending {}/{}",
                session.pending_files().len(),
                MAX_PENDING_FILES
            ),
            Style::default().fg(Color::Yellow),
        ),
        Span::styled(" | ", dim),
        Span::raw(format!("Uploaded {}", session.uploaded_files().len())),
    ];

    if let Some(selected) = session.selected_file() {
        spans.push(Span::styled(" | ", dim));
        spans.push(Span::styled(
            format!("Selected: {}", selected),
            Style::default().fg(Color::Green),
        ));
    }
    if session.uploading() {
        spans.push(Span::styled(" | ", dim));
        spans.push(Span::styled(
            "Uploading...",
            Style::default().fg(Color::Magenta).add_modifier(Modifier::BOLD),
        ));
    }
    if let Some(status) = &app.status {
        spans.push(Span::styled(" | ", dim));
        spans.push(Span::styled(status.as_str(), dim));
    }

    f.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn render_input(f: &mut Frame, app: &mut App, area: Rect) {
    let (border_color, title) = if app.session.listening {
        (Color::Red, " Listening... ".to_string())
    } else {
        match app.mode {
            Mode::Normal => (Color::Blue, " Input (Normal Mode) - i to Type ".to_string()),
            _ => (
                Color::Green,
                " Input (Insert Mode) - Enter to Send, Ctrl+g to Speak ".to_string(),
            ),
        }
    };

    match app.mode {
        Mode::Insert => app.input.set_style(Style::default()),
        _ => app
            .input
            .set_style(Style::default().add_modifier(Modifier::DIM)),
    }

    app.input.set_block(
        Block::default()
            .borders(Borders::ALL)
            .title(title)
            .border_type(BorderType::Rounded)
            .border_style(Style::default().fg(border_color)),
    );
    f.render_widget(&app.input, area);
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

fn estimate_wrapped_height(text: &Text, width: u16) -> u16 {
    if width == 0 {
        return 0;
    }
    text.lines
        .iter()
        .map(|line| {
            let line_width = line.width() as u16;
            if line_width == 0 {
                1
            } else {
                line_width.div_ceil(width)
            }
        })
        .sum()
}
