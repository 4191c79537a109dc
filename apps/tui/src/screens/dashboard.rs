//! Main screen: dataset list, command list, output log.

use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, List, ListItem, Paragraph, Wrap};

use annodemo_core::pipeline::Command;

use crate::app::{App, Focus};
use crate::widgets::{help_overlay, status_bar};

pub(crate) fn draw(f: &mut Frame, app: &App) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header
            Constraint::Min(1),    // Panels
            Constraint::Length(1), // Status bar
        ])
        .split(f.area());

    draw_header(f, app, rows[0]);

    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
        .split(rows[1]);

    let left = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(3),
            Constraint::Length(Command::ALL.len() as u16 + 2),
        ])
        .split(columns[0]);

    draw_datasets(f, app, left[0]);
    draw_commands(f, app, left[1]);
    draw_log(f, app, columns[1]);

    f.render_widget(status_bar(&app.status), rows[2]);

    if app.show_help {
        help_overlay(f);
    }
}

fn draw_header(f: &mut Frame, app: &App, area: Rect) {
    let state = if app.running {
        Span::styled("● running", Style::default().fg(Color::Yellow))
    } else {
        Span::styled("○ idle", Style::default().fg(Color::Green))
    };
    let target = match app.dataset() {
        Some(dataset) => format!("  {} › {}  ", dataset.name, app.command()),
        None => "  no datasets  ".to_string(),
    };
    let header = Paragraph::new(Line::from(vec![Span::raw(target), state])).block(
        Block::default()
            .borders(Borders::ALL)
            .title(" annodemo "),
    );
    f.render_widget(header, area);
}

fn panel(title: String, focused: bool) -> Block<'static> {
    let border = if focused {
        Style::default().fg(Color::Cyan)
    } else {
        Style::default()
    };
    Block::default()
        .borders(Borders::ALL)
        .title(title)
        .border_style(border)
}

fn row_style(selected: bool) -> Style {
    if selected {
        Style::default()
            .fg(Color::Cyan)
            .add_modifier(Modifier::BOLD)
    } else {
        Style::default()
    }
}

fn draw_datasets(f: &mut Frame, app: &App, area: Rect) {
    let block = panel(
        format!(" Datasets ({}) ", app.datasets.len()),
        app.focus == Focus::Datasets,
    );

    if app.datasets.is_empty() {
        let empty = Paragraph::new("No datasets configured.\n\nAdd [[datasets]] to the config file.")
            .alignment(Alignment::Center)
            .block(block);
        f.render_widget(empty, area);
        return;
    }

    let items: Vec<ListItem> = app
        .datasets
        .iter()
        .enumerate()
        .map(|(i, dataset)| {
            let selected = i == app.selected_dataset;
            let prefix = if selected { "▸ " } else { "  " };
            ListItem::new(format!(
                "{prefix}{:<24} {:<12} {}",
                dataset.name, dataset.kind, dataset.status
            ))
            .style(row_style(selected))
        })
        .collect();

    f.render_widget(List::new(items).block(block), area);
}

fn draw_commands(f: &mut Frame, app: &App, area: Rect) {
    let items: Vec<ListItem> = Command::ALL
        .iter()
        .enumerate()
        .map(|(i, command)| {
            let selected = i == app.selected_command;
            let prefix = if selected { "▸ " } else { "  " };
            ListItem::new(format!(
                "{prefix}{:<10} {}",
                command.as_str(),
                command.description()
            ))
            .style(row_style(selected))
        })
        .collect();

    let block = panel(" Commands ".to_string(), app.focus == Focus::Commands);
    f.render_widget(List::new(items).block(block), area);
}

fn draw_log(f: &mut Frame, app: &App, area: Rect) {
    let title = match app.dataset() {
        Some(dataset) => format!(" Output - {} ", dataset.title),
        None => " Output ".to_string(),
    };

    let lines: Vec<Line> = app.log.iter().map(|l| Line::from(l.as_str())).collect();
    // Keep the newest lines in view.
    let visible = area.height.saturating_sub(2) as usize;
    let scroll = app.log.len().saturating_sub(visible) as u16;

    let log = Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title(title))
        .wrap(Wrap { trim: false })
        .scroll((scroll, 0));
    f.render_widget(log, area);
}
