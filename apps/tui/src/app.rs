//! Dashboard state, key handling, and the event loop.

use std::fs::OpenOptions;
use std::io;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use color_eyre::eyre::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::prelude::*;
use tokio::runtime::{Handle, Runtime};
use tokio::sync::mpsc;
use tracing::info;

use annodemo_core::pipeline::{BackendFactory, Command, HttpBackendFactory, PipelineContext};
use annodemo_shared::{AppConfig, DatasetRegistry};

use crate::runner::{self, UiMessage};
use crate::screens;

/// Log file written under the data directory while the dashboard runs.
const LOG_FILE_NAME: &str = "annodemo-tui.log";

/// Output lines kept in the log panel.
const MAX_LOG_LINES: usize = 1000;

/// Which panel receives navigation keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Focus {
    Datasets,
    Commands,
}

/// One row of the dataset panel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DatasetRow {
    pub name: String,
    pub title: String,
    pub kind: &'static str,
    pub status: &'static str,
}

/// What the event loop should do after a key press.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Action {
    None,
    Run { dataset: String, command: Command },
    Quit,
}

/// Dashboard state.
pub(crate) struct App {
    pub datasets: Vec<DatasetRow>,
    pub selected_dataset: usize,
    pub selected_command: usize,
    pub focus: Focus,
    /// A command is in flight; further runs are refused.
    pub running: bool,
    /// Output panel lines, oldest first.
    pub log: Vec<String>,
    /// Status message shown in bottom bar.
    pub status: String,
    pub show_help: bool,
    pub should_quit: bool,
}

impl App {
    pub(crate) fn new(datasets: Vec<DatasetRow>) -> Self {
        Self {
            datasets,
            selected_dataset: 0,
            selected_command: 0,
            focus: Focus::Datasets,
            running: false,
            log: Vec::new(),
            status: "Ready - press ? for help".to_string(),
            show_help: false,
            should_quit: false,
        }
    }

    pub(crate) fn command(&self) -> Command {
        Command::ALL[self.selected_command]
    }

    pub(crate) fn dataset(&self) -> Option<&DatasetRow> {
        self.datasets.get(self.selected_dataset)
    }

    pub(crate) fn handle_key(&mut self, key: KeyEvent) -> Action {
        if key.modifiers.contains(KeyModifiers::CONTROL)
            && matches!(key.code, KeyCode::Char('c') | KeyCode::Char('q'))
        {
            return self.quit();
        }

        match key.code {
            KeyCode::Char('q') => return self.quit(),
            KeyCode::Char('?') => {
                self.show_help = !self.show_help;
                return Action::None;
            }
            _ => {}
        }

        // Any other key dismisses the help overlay.
        if self.show_help {
            self.show_help = false;
            return Action::None;
        }

        match key.code {
            KeyCode::Up | KeyCode::Char('k') => self.move_selection(-1),
            KeyCode::Down | KeyCode::Char('j') => self.move_selection(1),
            KeyCode::Tab | KeyCode::BackTab => {
                self.focus = match self.focus {
                    Focus::Datasets => Focus::Commands,
                    Focus::Commands => Focus::Datasets,
                };
            }
            KeyCode::Left => self.focus = Focus::Datasets,
            KeyCode::Right => self.focus = Focus::Commands,
            KeyCode::Char('c') => {
                self.log.clear();
                self.status = "Log cleared".to_string();
            }
            KeyCode::Enter => return self.start_run(),
            _ => {}
        }
        Action::None
    }

    /// Fold a message from the running command into the state.
    pub(crate) fn apply(&mut self, message: UiMessage) {
        match message {
            UiMessage::Progress(text) => self.status = text,
            UiMessage::Log(line) => self.push_log(line),
            UiMessage::Finished {
                dataset,
                command,
                ok,
                text,
            } => {
                self.running = false;
                for line in text.lines() {
                    self.push_log(line.to_string());
                }
                self.status = if ok {
                    format!("{dataset} {command}: done")
                } else {
                    format!("{dataset} {command}: failed")
                };
            }
        }
    }

    fn quit(&mut self) -> Action {
        self.should_quit = true;
        Action::Quit
    }

    fn move_selection(&mut self, delta: isize) {
        let (selected, len) = match self.focus {
            Focus::Datasets => (&mut self.selected_dataset, self.datasets.len()),
            Focus::Commands => (&mut self.selected_command, Command::ALL.len()),
        };
        if len == 0 {
            return;
        }
        *selected = selected.saturating_add_signed(delta).min(len - 1);
    }

    fn start_run(&mut self) -> Action {
        if self.running {
            self.status = "A command is already running".to_string();
            return Action::None;
        }
        let Some(dataset) = self.dataset().map(|d| d.name.clone()) else {
            self.status = "No datasets configured".to_string();
            return Action::None;
        };
        let command = self.command();

        self.running = true;
        self.push_log(format!("$ annodemo {dataset} {command}"));
        self.status = format!("Running {command} for {dataset}...");
        Action::Run { dataset, command }
    }

    fn push_log(&mut self, line: String) {
        self.log.push(line);
        if self.log.len() > MAX_LOG_LINES {
            let excess = self.log.len() - MAX_LOG_LINES;
            self.log.drain(..excess);
        }
    }
}

fn dataset_rows(contexts: &[PipelineContext]) -> Vec<DatasetRow> {
    contexts
        .iter()
        .map(|ctx| DatasetRow {
            name: ctx.dataset.name.clone(),
            title: ctx.dataset.title().to_string(),
            kind: ctx.dataset.source.kind(),
            status: ctx.status().label(),
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Event loop
// ---------------------------------------------------------------------------

/// Entry point: sets up logging and the terminal, runs the event loop,
/// restores the terminal.
///
/// Commands run on the current tokio runtime when there is one, else on a
/// runtime owned by this call.
pub fn run(config: AppConfig, registry: DatasetRegistry) -> Result<()> {
    init_file_logging(&config.defaults.data_dir_path())?;

    let (_owned_runtime, handle) = match Handle::try_current() {
        Ok(handle) => (None, handle),
        Err(_) => {
            let runtime = Runtime::new()?;
            let handle = runtime.handle().clone();
            (Some(runtime), handle)
        }
    };

    let backends: Arc<dyn BackendFactory> =
        Arc::new(HttpBackendFactory::new(config.backend.clone()));
    let contexts: Vec<PipelineContext> = registry
        .iter()
        .map(|dataset| PipelineContext::new(&config, dataset, backends.clone()))
        .collect();

    info!(datasets = contexts.len(), "dashboard starting");

    // Setup
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_app(&mut terminal, &handle, &contexts);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    handle: &Handle,
    contexts: &[PipelineContext],
) -> Result<()> {
    let mut app = App::new(dataset_rows(contexts));
    let (tx, mut rx) = mpsc::unbounded_channel();

    loop {
        terminal.draw(|f| screens::draw(f, &app))?;

        // Poll for events with 100ms timeout for responsive UI
        if event::poll(Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    if let Action::Run { dataset, command } = app.handle_key(key) {
                        match contexts.iter().find(|c| c.dataset.name == dataset) {
                            Some(ctx) => runner::spawn_command(handle, ctx.clone(), command, tx.clone()),
                            None => app.running = false,
                        }
                    }
                }
            }
        }

        while let Ok(message) = rx.try_recv() {
            let finished = matches!(message, UiMessage::Finished { .. });
            app.apply(message);
            if finished {
                app.datasets = dataset_rows(contexts);
            }
        }

        if app.should_quit {
            break;
        }
    }

    Ok(())
}

/// Route tracing output to `<data_dir>/annodemo-tui.log`.
fn init_file_logging(data_dir: &Path) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt};

    std::fs::create_dir_all(data_dir)?;
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(data_dir.join(LOG_FILE_NAME))?;

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("annodemo=debug"));

    // A subscriber may already be installed by the embedding binary.
    let _ = fmt()
        .with_env_filter(env_filter)
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .try_init();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows() -> Vec<DatasetRow> {
        ["citizens-united", "pride-and-prejudice", "attention-paper"]
            .into_iter()
            .map(|name| DatasetRow {
                name: name.into(),
                title: name.into(),
                kind: "html",
                status: "new",
            })
            .collect()
    }

    fn press(app: &mut App, code: KeyCode) -> Action {
        app.handle_key(KeyEvent::new(code, KeyModifiers::NONE))
    }

    #[test]
    fn navigation_is_clamped_per_panel() {
        let mut app = App::new(rows());
        press(&mut app, KeyCode::Up);
        assert_eq!(app.selected_dataset, 0);
        press(&mut app, KeyCode::Down);
        press(&mut app, KeyCode::Char('j'));
        press(&mut app, KeyCode::Char('j'));
        assert_eq!(app.selected_dataset, 2);

        press(&mut app, KeyCode::Tab);
        assert_eq!(app.focus, Focus::Commands);
        press(&mut app, KeyCode::Down);
        press(&mut app, KeyCode::Down);
        assert_eq!(app.command(), Command::Annotate);
        assert_eq!(app.selected_dataset, 2, "dataset selection untouched");

        press(&mut app, KeyCode::Left);
        assert_eq!(app.focus, Focus::Datasets);
        press(&mut app, KeyCode::Char('k'));
        assert_eq!(app.selected_dataset, 1);
    }

    #[test]
    fn enter_runs_selected_command_once() {
        let mut app = App::new(rows());
        press(&mut app, KeyCode::Right);
        press(&mut app, KeyCode::Down);

        let action = press(&mut app, KeyCode::Enter);
        assert_eq!(
            action,
            Action::Run {
                dataset: "citizens-united".into(),
                command: Command::Load,
            }
        );
        assert!(app.running);
        assert_eq!(app.log, vec!["$ annodemo citizens-united load".to_string()]);

        assert_eq!(press(&mut app, KeyCode::Enter), Action::None);
        assert_eq!(app.status, "A command is already running");
    }

    #[test]
    fn finished_message_clears_running() {
        let mut app = App::new(rows());
        press(&mut app, KeyCode::Enter);
        app.apply(UiMessage::Log("» Downloading html source".into()));
        app.apply(UiMessage::Progress("[1/2] Part 1".into()));
        assert_eq!(app.status, "[1/2] Part 1");

        app.apply(UiMessage::Finished {
            dataset: "citizens-united".into(),
            command: Command::Download,
            ok: false,
            text: "Error: boom\nsecond line".into(),
        });
        assert!(!app.running);
        assert_eq!(app.status, "citizens-united download: failed");
        assert_eq!(app.log.last().map(String::as_str), Some("second line"));
        assert_eq!(app.log.len(), 4);

        assert!(matches!(press(&mut app, KeyCode::Enter), Action::Run { .. }));
    }

    #[test]
    fn help_and_clear_and_quit() {
        let mut app = App::new(rows());
        press(&mut app, KeyCode::Enter);
        press(&mut app, KeyCode::Char('?'));
        assert!(app.show_help);
        // Dismissing the overlay does not move the selection.
        press(&mut app, KeyCode::Down);
        assert!(!app.show_help);
        assert_eq!(app.selected_dataset, 0);

        press(&mut app, KeyCode::Char('c'));
        assert!(app.log.is_empty());

        let action = app.handle_key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL));
        assert_eq!(action, Action::Quit);
        assert!(app.should_quit);
    }

    #[test]
    fn empty_registry_cannot_run() {
        let mut app = App::new(vec![]);
        press(&mut app, KeyCode::Down);
        assert_eq!(press(&mut app, KeyCode::Enter), Action::None);
        assert!(!app.running);
    }

    #[test]
    fn log_is_bounded() {
        let mut app = App::new(rows());
        for i in 0..(MAX_LOG_LINES + 5) {
            app.apply(UiMessage::Log(format!("line {i}")));
        }
        assert_eq!(app.log.len(), MAX_LOG_LINES);
        assert_eq!(app.log[0], "line 5");
    }
}
