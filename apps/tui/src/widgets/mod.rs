//! Reusable TUI widgets.

use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Clear, Paragraph};

/// Bottom status bar.
pub(crate) fn status_bar(msg: &str) -> Paragraph<'_> {
    Paragraph::new(format!(" {msg}")).style(Style::default().bg(Color::DarkGray).fg(Color::White))
}

/// Keybinding help, centered over the current screen.
pub(crate) fn help_overlay(f: &mut Frame) {
    let area = centered_rect(60, 60, f.area());
    let bold = Style::default().add_modifier(Modifier::BOLD);

    let help_text = vec![
        Line::from("Keybindings").style(bold),
        Line::from(""),
        Line::from("  ↑/↓  k/j     Move selection"),
        Line::from("  Tab  ←/→     Switch panel"),
        Line::from("  Enter        Run command for dataset"),
        Line::from("  c            Clear output"),
        Line::from("  ?            Toggle this help"),
        Line::from("  q / Ctrl-C   Quit"),
        Line::from(""),
        Line::from("Commands run one at a time.").style(bold),
        Line::from("Logs: <data_dir>/annodemo-tui.log"),
    ];

    let help = Paragraph::new(help_text)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(" Help - press any key to close ")
                .style(Style::default().bg(Color::DarkGray)),
        )
        .style(Style::default().fg(Color::White).bg(Color::DarkGray));

    f.render_widget(Clear, area);
    f.render_widget(help, area);
}

/// Create a centered rectangle with percentage width and height.
pub(crate) fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
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
