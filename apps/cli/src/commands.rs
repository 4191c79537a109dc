//! CLI definition, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use annodemo_core::pipeline::{
    Command, CommandReport, HttpBackendFactory, PipelineContext, ProgressReporter,
};
use annodemo_shared::{AppConfig, DatasetRegistry, init_config, load_config, load_config_from};
use clap::{CommandFactory, Parser};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// annodemo — load demo datasets into the annotation backend.
#[derive(Parser)]
#[command(
    name = "annodemo",
    version,
    about = "Download, chunk, upload, annotate and validate demo datasets.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Config file (defaults to ~/.annodemo/annodemo.toml).
    #[arg(long, env = "ANNODEMO_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text")]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Launch the interactive dashboard.
    #[arg(short, long)]
    pub interactive: bool,

    /// List configured datasets and exit.
    #[arg(long)]
    pub list: bool,

    /// Write a default config file (with sample datasets) and exit.
    #[arg(long, conflicts_with_all = ["list", "show_config", "interactive"])]
    pub init_config: bool,

    /// Print the resolved config and exit.
    #[arg(long, conflicts_with_all = ["list", "interactive"])]
    pub show_config: bool,

    /// Re-download even if the source is cached.
    #[arg(long)]
    pub force: bool,

    /// Dataset name (see --list).
    pub dataset: Option<String>,

    /// Command: download, load, annotate or validate.
    pub command: Option<Command>,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "annodemo=info",
        1 => "annodemo=debug",
        _ => "annodemo=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// Run the CLI.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    if cli.init_config {
        return cmd_init_config(cli.config.as_deref());
    }

    let config = load_app_config(cli.config.as_deref())?;

    if cli.show_config {
        return cmd_show_config(&config);
    }

    let registry = DatasetRegistry::from_config(&config)?;

    if cli.list {
        return cmd_list(&config, &registry);
    }

    if cli.interactive {
        return tokio::task::block_in_place(|| annodemo_tui::run(config, registry));
    }

    match (cli.dataset.as_deref(), cli.command) {
        (Some(dataset), Some(command)) => {
            cmd_dataset(&config, &registry, dataset, command, cli.force).await
        }
        (Some(dataset), None) => Err(eyre!(
            "missing command for dataset '{dataset}': expected download, load, annotate or validate"
        )),
        (None, _) => {
            Cli::command().print_help()?;
            println!();
            Ok(())
        }
    }
}

fn load_app_config(path: Option<&Path>) -> Result<AppConfig> {
    match path {
        Some(p) if !p.exists() => Err(eyre!(
            "config file '{}' not found (create it with --init-config)",
            p.display()
        )),
        Some(p) => Ok(load_config_from(p)?),
        None => Ok(load_config()?),
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn cmd_dataset(
    config: &AppConfig,
    registry: &DatasetRegistry,
    name: &str,
    command: Command,
    force: bool,
) -> Result<()> {
    let dataset = registry.get(name)?;
    if force && command != Command::Download {
        warn!(command = %command, "--force only applies to download, ignoring");
    }

    let backends = Arc::new(HttpBackendFactory::new(config.backend.clone()));
    let ctx = PipelineContext::new(config, dataset, backends);

    info!(dataset = %dataset.name, command = %command, "running command");

    let reporter = CliProgress::new();
    let report = annodemo_core::run(command, &ctx, force, &reporter)
        .await
        .inspect_err(|_| reporter.abandon())?;

    println!();
    print_report(&report);

    if !report.succeeded() {
        if let CommandReport::Validate(validation) = &report {
            return Err(eyre!(
                "validation failed: {} of {} resources have problems",
                validation.failed().count(),
                validation.checks.len()
            ));
        }
    }

    Ok(())
}

fn print_report(report: &CommandReport) {
    for line in report.to_string().lines() {
        println!("  {line}");
    }
    println!();
}

fn cmd_list(config: &AppConfig, registry: &DatasetRegistry) -> Result<()> {
    let backends = Arc::new(HttpBackendFactory::new(config.backend.clone()));

    println!();
    println!("  Datasets ({}):", registry.len());
    println!();
    println!(
        "  {:<26} {:<13} {:<4} {:<6} {:<11} TITLE",
        "NAME", "SOURCE", "TOC", "CITES", "STATUS"
    );
    for dataset in registry.iter() {
        let status = PipelineContext::new(config, dataset, backends.clone()).status();
        println!(
            "  {:<26} {:<13} {:<4} {:<6} {:<11} {}",
            dataset.name,
            dataset.source.kind(),
            yes_no(dataset.create_toc),
            yes_no(dataset.detect_citations),
            status.label(),
            dataset.title()
        );
    }
    println!();
    println!("  Commands:");
    for command in Command::ALL {
        println!("    {:<10} {}", command.as_str(), command.description());
    }
    println!();

    Ok(())
}

fn yes_no(flag: bool) -> &'static str {
    if flag { "yes" } else { "no" }
}

fn cmd_init_config(path: Option<&Path>) -> Result<()> {
    let path = init_config(path)?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_show_config(config: &AppConfig) -> Result<()> {
    let toml_str = toml::to_string_pretty(config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
    phase: Mutex<String>,
}

impl CliProgress {
    fn new() -> Self {
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(style);
        spinner.enable_steady_tick(Duration::from_millis(80));
        Self {
            spinner,
            phase: Mutex::new(String::new()),
        }
    }

    /// Stop the spinner when a command fails before reporting `done`.
    fn abandon(&self) {
        self.spinner.finish_and_clear();
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        if let Ok(mut phase) = self.phase.lock() {
            *phase = name.to_string();
        }
        self.spinner.set_message(name.to_string());
    }

    fn item(&self, current: usize, total: usize, detail: &str) {
        let phase = self.phase.lock().map(|p| p.clone()).unwrap_or_default();
        self.spinner
            .set_message(format!("{phase} [{current}/{total}] {detail}"));
    }

    fn warn(&self, message: &str) {
        self.spinner.println(format!("  ✗ {message}"));
    }

    fn done(&self, _report: &CommandReport) {
        self.spinner.finish_and_clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn positional_dataset_and_command() {
        let cli = Cli::try_parse_from(["annodemo", "citizens-united", "load", "-vv"]).unwrap();
        assert_eq!(cli.dataset.as_deref(), Some("citizens-united"));
        assert_eq!(cli.command, Some(Command::Load));
        assert_eq!(cli.verbose, 2);
        assert!(!cli.force);
    }

    #[test]
    fn unknown_command_is_rejected() {
        assert!(Cli::try_parse_from(["annodemo", "citizens-united", "upload"]).is_err());
    }

    #[test]
    fn flags_parse() {
        let cli = Cli::try_parse_from([
            "annodemo",
            "--config",
            "/tmp/a.toml",
            "--log-format",
            "json",
            "--force",
            "pride-and-prejudice",
            "download",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/a.toml")));
        assert!(matches!(cli.log_format, LogFormat::Json));
        assert!(cli.force);
        assert_eq!(cli.command, Some(Command::Download));

        let cli = Cli::try_parse_from(["annodemo", "-i"]).unwrap();
        assert!(cli.interactive);
        assert!(Cli::try_parse_from(["annodemo", "--init-config", "--list"]).is_err());
    }

    #[tokio::test]
    async fn failed_command_is_an_error() {
        let dir = std::env::temp_dir().join(format!("annodemo-cli-test-{}", uuid::Uuid::now_v7()));
        let mut config = AppConfig::default();
        config.defaults.data_dir = dir.display().to_string();
        let registry = DatasetRegistry::from_config(&config).unwrap();
        let name = registry.names()[0].to_string();

        let err = cmd_dataset(&config, &registry, &name, Command::Load, false)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("has not been downloaded"), "{err}");
    }

    #[test]
    fn abandoned_spinner_is_finished() {
        let progress = CliProgress::new();
        progress.phase("Loading documents");
        progress.abandon();
        assert!(progress.spinner.is_finished());
    }
}
