//! Background command execution for the dashboard.

use tokio::runtime::Handle;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{error, info};

use annodemo_core::pipeline::{Command, CommandReport, PipelineContext, ProgressReporter};
use annodemo_shared::Result;

/// Messages from a running command to the UI loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum UiMessage {
    /// Transient per-item progress, shown in the status bar.
    Progress(String),
    /// A line for the output log.
    Log(String),
    /// The command ended; `text` is the report or the error.
    Finished {
        dataset: String,
        command: Command,
        ok: bool,
        text: String,
    },
}

/// Forwards pipeline progress over the UI channel.
struct ChannelProgress {
    tx: UnboundedSender<UiMessage>,
}

impl ChannelProgress {
    fn send(&self, message: UiMessage) {
        // The receiver is gone only when the dashboard is shutting down.
        let _ = self.tx.send(message);
    }
}

impl ProgressReporter for ChannelProgress {
    fn phase(&self, name: &str) {
        self.send(UiMessage::Log(format!("» {name}")));
    }

    fn item(&self, current: usize, total: usize, detail: &str) {
        self.send(UiMessage::Progress(format!("[{current}/{total}] {detail}")));
    }

    fn warn(&self, message: &str) {
        self.send(UiMessage::Log(format!("  ✗ {message}")));
    }

    fn done(&self, _report: &CommandReport) {}
}

/// Run `command` on `handle`, reporting over `tx`. Always ends with
/// [`UiMessage::Finished`], even when the command task panics.
pub(crate) fn spawn_command(
    handle: &Handle,
    ctx: PipelineContext,
    command: Command,
    tx: UnboundedSender<UiMessage>,
) {
    let dataset = ctx.dataset.name.clone();
    let progress = ChannelProgress { tx: tx.clone() };
    let work = async move { annodemo_core::run(command, &ctx, false, &progress).await };
    supervise(handle, dataset, command, tx, work);
}

/// Spawn `work` and a watcher task that awaits its `JoinHandle`, so a
/// panic or cancellation still reaches the UI as a failed run.
fn supervise<F>(
    handle: &Handle,
    dataset: String,
    command: Command,
    tx: UnboundedSender<UiMessage>,
    work: F,
) where
    F: Future<Output = Result<CommandReport>> + Send + 'static,
{
    let task = handle.spawn(work);

    handle.spawn(async move {
        let (ok, text) = match task.await {
            Ok(Ok(report)) => {
                info!(dataset = %dataset, command = %command, ok = report.succeeded(), "command finished");
                (report.succeeded(), report.to_string())
            }
            Ok(Err(e)) => {
                error!(dataset = %dataset, command = %command, error = %e, "command failed");
                (false, format!("Error: {e}"))
            }
            Err(e) => {
                error!(dataset = %dataset, command = %command, error = %e, "command task aborted");
                (false, format!("Error: command aborted: {e}"))
            }
        };

        let _ = tx.send(UiMessage::Finished {
            dataset,
            command,
            ok,
            text,
        });
    });
}
