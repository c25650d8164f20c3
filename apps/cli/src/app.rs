//! Upload commands and the interactive shell.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anna_imaging::ImageFile;
use anna_platform::{Category, HttpTransport};
use anna_upload::{BatchSummary, QueueController, QueueMode, SelectOutcome, UploadEvent};
use anyhow::{Context, bail};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use crate::config::Config;

/// Runs one `anna upload` invocation.
pub async fn upload(
    config: &Config,
    paths: Vec<PathBuf>,
    category: Category,
    both: bool,
    mass: bool,
) -> anyhow::Result<()> {
    let mut queue = build_controller(config)?;
    let printer = spawn_event_printer(queue.take_events());
    let files = read_files(&paths).await?;

    let summary = if mass {
        queue.set_mode(QueueMode::Deferred);
        queue.select_files(files, category, both).await;
        println!("{}", queue.current_status());
        queue.start_deferred_batch().await
    } else {
        match queue.select_files(files, category, both).await {
            SelectOutcome::Completed(summary) => summary,
            _ => BatchSummary::default(),
        }
    };

    drop(queue);
    let _ = printer.await;

    println!("{summary}");
    if summary.account_suspended() {
        bail!("account suspended, stop uploading from this account");
    }
    if !summary.failed.is_empty() {
        bail!("{} of {} uploads failed", summary.failed.len(), summary.total);
    }
    Ok(())
}

/// Line-oriented stand-in for the upload panel.
pub async fn shell(config: Config) -> anyhow::Result<()> {
    let queue = build_controller(&config)?;
    let mut shell = Shell::new(config, queue);
    println!("{}", HELP);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let command = match ShellCommand::parse(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                println!("{e}");
                continue;
            }
        };
        if !shell.handle(command).await? {
            break;
        }
    }

    shell.close().await;
    info!("shell closed");
    Ok(())
}

/// Interactive session state. Batches run as background tasks so the
/// prompt stays responsive while uploads are in flight.
struct Shell {
    config: Config,
    queue: Arc<QueueController>,
    printer: JoinHandle<usize>,
    running: JoinSet<()>,
}

impl Shell {
    fn new(config: Config, mut queue: QueueController) -> Self {
        let printer = spawn_event_printer(queue.take_events());
        Self {
            config,
            queue: Arc::new(queue),
            printer,
            running: JoinSet::new(),
        }
    }

    /// Handles one command. Returns `false` when the session should end.
    async fn handle(&mut self, command: ShellCommand) -> anyhow::Result<bool> {
        while self.running.try_join_next().is_some() {}

        match command {
            ShellCommand::Upload {
                category,
                both,
                paths,
            } => {
                let files = match read_files(&paths).await {
                    Ok(files) => files,
                    Err(e) => {
                        println!("{e:#}");
                        return Ok(true);
                    }
                };
                let queue = Arc::clone(&self.queue);
                self.running.spawn(async move {
                    match queue.select_files(files, category, both).await {
                        SelectOutcome::Completed(summary) => println!("{summary}"),
                        SelectOutcome::Queued { queued } => println!("{queued} queued"),
                        SelectOutcome::Ignored => {}
                    }
                });
            }
            ShellCommand::ToggleMass => match self.queue.toggle_mode() {
                QueueMode::Deferred => println!("mass upload mode on, selections will queue"),
                QueueMode::Immediate => println!("mass upload mode off"),
            },
            ShellCommand::Start => {
                let queue = Arc::clone(&self.queue);
                self.running.spawn(async move {
                    let summary = queue.start_deferred_batch().await;
                    println!("{summary}");
                });
            }
            ShellCommand::Status => {
                println!("{}", self.queue.current_status());
                if !self.running.is_empty() {
                    println!("{} selections still uploading", self.running.len());
                }
            }
            ShellCommand::ChangeId { account_id, group } => {
                if !self.running.is_empty() {
                    println!("uploads are still running, change the account once they finish");
                    return Ok(true);
                }
                if let Err(e) = self.config.set_account(account_id, group) {
                    println!("{e}");
                    return Ok(true);
                }
                self.config.save()?;
                // The target identity is fixed per controller.
                let queue = build_controller(&self.config)?;
                self.replace_controller(queue).await;
                println!("uploads will now be owned by {account_id}");
            }
            ShellCommand::Help => println!("{}", HELP),
            ShellCommand::Quit => return Ok(false),
        }
        Ok(true)
    }

    /// Swaps in a new controller. Returns how many event lines the old
    /// printer wrote before its channel closed.
    async fn replace_controller(&mut self, mut queue: QueueController) -> usize {
        let printer = spawn_event_printer(queue.take_events());
        drop(std::mem::replace(&mut self.queue, Arc::new(queue)));
        let old = std::mem::replace(&mut self.printer, printer);
        old.await.unwrap_or_default()
    }

    async fn wait_for_uploads(&mut self) {
        if !self.running.is_empty() {
            println!("waiting for {} running selections", self.running.len());
        }
        while self.running.join_next().await.is_some() {}
    }

    async fn close(mut self) {
        self.wait_for_uploads().await;
        drop(self.queue);
        let lines = self.printer.await.unwrap_or_default();
        debug!(lines, "event printer drained");
    }
}

const HELP: &str = "\
commands:
  tshirt <files...>   upload files as T-Shirts
  decal <files...>    upload files as Decals
  both <files...>     upload files as both
  mass                toggle mass upload mode (queue, then `start`)
  start               upload everything queued in mass mode
  status              show queue or batch progress
  id <number> [group] change the owning account
  help | quit";

#[derive(Debug, Clone, PartialEq, Eq)]
enum ShellCommand {
    Upload {
        category: Category,
        both: bool,
        paths: Vec<PathBuf>,
    },
    ToggleMass,
    Start,
    Status,
    ChangeId { account_id: u64, group: bool },
    Help,
    Quit,
}

impl ShellCommand {
    /// Parses one input line. Paths are whitespace-separated.
    fn parse(line: &str) -> Result<Option<Self>, String> {
        let mut words = line.split_whitespace();
        let Some(head) = words.next() else {
            return Ok(None);
        };

        match head.to_ascii_lowercase().as_str() {
            "tshirt" | "shirt" => upload_command(head, Category::TShirt, false, words),
            "decal" => upload_command(head, Category::Decal, false, words),
            "both" => upload_command(head, Category::Decal, true, words),
            "mass" => Ok(Some(ShellCommand::ToggleMass)),
            "start" => Ok(Some(ShellCommand::Start)),
            "status" => Ok(Some(ShellCommand::Status)),
            "id" => {
                let account_id = words
                    .next()
                    .and_then(|w| w.parse().ok())
                    .ok_or_else(|| "id: expected a numeric account id".to_string())?;
                let group = matches!(words.next(), Some("group"));
                Ok(Some(ShellCommand::ChangeId { account_id, group }))
            }
            "help" | "?" => Ok(Some(ShellCommand::Help)),
            "quit" | "exit" => Ok(Some(ShellCommand::Quit)),
            other => Err(format!("unknown command {other:?}, type `help`")),
        }
    }
}

fn upload_command<'a>(
    head: &str,
    category: Category,
    both: bool,
    words: impl Iterator<Item = &'a str>,
) -> Result<Option<ShellCommand>, String> {
    let paths: Vec<PathBuf> = words.map(PathBuf::from).collect();
    if paths.is_empty() {
        return Err(format!("{head}: no files given"));
    }
    Ok(Some(ShellCommand::Upload {
        category,
        both,
        paths,
    }))
}

fn build_controller(config: &Config) -> anyhow::Result<QueueController> {
    if config.account.account_id == 0 {
        bail!("no account set, run `anna config set-account <id>` first");
    }

    let cookie = config.resolved_session_cookie();
    if cookie.is_none() {
        warn!("no session cookie configured, uploads will likely be rejected");
    }

    let transport = HttpTransport::new(cookie.as_deref())
        .context("building HTTP client")?
        .with_upload_url(config.upload_url.clone());

    Ok(QueueController::new(
        Arc::new(transport),
        config.creator(),
        config.naming.clone(),
        config.retry,
        config.transform_spec(),
    ))
}

async fn read_files(paths: &[PathBuf]) -> anyhow::Result<Vec<ImageFile>> {
    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        let data = tokio::fs::read(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        files.push(ImageFile::new(file_name(path), data));
    }
    Ok(files)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Prints events until every sender is gone. Resolves to the number of
/// lines written.
fn spawn_event_printer(rx: Option<mpsc::UnboundedReceiver<UploadEvent>>) -> JoinHandle<usize> {
    tokio::spawn(async move {
        let Some(mut rx) = rx else { return 0 };
        let mut lines = 0;
        while let Some(event) = rx.recv().await {
            if let Some(line) = describe(&event) {
                println!("{line}");
                lines += 1;
            }
        }
        lines
    })
}

/// User-facing line for an event, if it warrants one.
fn describe(event: &UploadEvent) -> Option<String> {
    match event {
        UploadEvent::BatchStarted { total, .. } => Some(format!("uploading {total} assets")),
        UploadEvent::Retrying {
            name,
            category,
            attempt,
            reason,
        } => Some(format!("retry {attempt} for {name} ({category}): {reason}")),
        UploadEvent::Succeeded {
            name,
            category,
            remote_id,
        } => Some(format!("uploaded {name} as {category} {remote_id}")),
        UploadEvent::Failed {
            name,
            category,
            reason,
        } => Some(format!("failed {name} ({category}): {reason}")),
        UploadEvent::AccountSuspended { message } => {
            Some(format!("!! ACCOUNT SUSPENDED !! {message}"))
        }
        UploadEvent::Progress {
            completed, total, ..
        } => Some(format!("{completed} of {total} processed")),
        UploadEvent::QueueDiscarded { dropped } => {
            Some(format!("discarded {dropped} queued uploads"))
        }
        UploadEvent::Queued { .. } | UploadEvent::BatchFinished { .. } => None,
    }
}
