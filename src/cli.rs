use crate::engine::HttpInferenceClient;
use crate::error::ValidationError;
use crate::model::{ImageOutput, RequestState, WorkflowConfig, WorkflowEvent};
use crate::orchestrator::{run_session, Submission, UiCommand, WorkflowController};
use crate::preview::Panel;
use crate::text_summary::{self, EventLine};
use anyhow::{Context, Result};
use clap::Parser;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::AsyncBufReadExt;
use tokio::sync::mpsc;

/// Output line routing for stdout/stderr writer.
enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// Spawn a blocking writer for stdout/stderr to avoid blocking async tasks.
fn spawn_output_writer() -> (
    mpsc::UnboundedSender<OutputLine>,
    tokio::task::JoinHandle<()>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
    let handle = tokio::task::spawn_blocking(move || {
        let stdout = std::io::stdout();
        let stderr = std::io::stderr();
        let mut out = std::io::LineWriter::new(stdout.lock());
        let mut err = std::io::LineWriter::new(stderr.lock());

        while let Some(line) = rx.blocking_recv() {
            match line {
                OutputLine::Stdout(msg) => {
                    let _ = writeln!(out, "{}", msg);
                }
                OutputLine::Stderr(msg) => {
                    let _ = writeln!(err, "{}", msg);
                }
            }
        }

        let _ = out.flush();
        let _ = err.flush();
    });
    (tx, handle)
}

#[derive(Debug, Parser, Clone)]
#[command(
    name = "imagecap",
    version,
    about = "Caption images and generate images from prompts via a remote inference service"
)]
pub struct Cli {
    /// Base URL of the inference service
    #[arg(long, default_value = "http://localhost:8000")]
    pub base_url: String,

    /// Captioning endpoint (path relative to the base URL, or absolute URL)
    #[arg(long, default_value = "/predict")]
    pub caption_path: String,

    /// Image generation endpoint (path relative to the base URL, or absolute URL)
    #[arg(long, default_value = "/generate-image")]
    pub generate_path: String,

    /// Multipart field name carrying the uploaded image
    #[arg(long, default_value = "file")]
    pub upload_field: String,

    /// Give up on a request after this long (default: wait indefinitely)
    #[arg(long)]
    pub timeout: Option<humantime::Duration>,

    /// Directory generated images are saved into
    #[arg(long, conflicts_with = "inline_images")]
    pub output_dir: Option<PathBuf>,

    /// Keep generated images as data URIs instead of writing files
    #[arg(long)]
    pub inline_images: bool,

    /// JPEG image to caption, then exit
    #[arg(long)]
    pub caption: Option<PathBuf>,

    /// Prompt to generate an image from, then exit
    #[arg(long)]
    pub prompt: Option<String>,

    /// Print events as JSON lines
    #[arg(long)]
    pub json: bool,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    /// One-shot mode runs the given requests and exits; otherwise the session is interactive.
    pub fn is_one_shot(&self) -> bool {
        self.caption.is_some() || self.prompt.is_some()
    }
}

pub async fn run(args: Cli) -> Result<()> {
    let cfg = build_config(&args);
    tracing::debug!(?cfg, "configuration");

    if args.is_one_shot() {
        run_one_shot(args, cfg).await
    } else {
        run_interactive(args, cfg).await
    }
}

fn default_output_dir() -> PathBuf {
    dirs::picture_dir()
        .or_else(dirs::data_local_dir)
        .map(|d| d.join("imagecap"))
        .unwrap_or_else(|| PathBuf::from("imagecap-output"))
}

/// Build a `WorkflowConfig` from CLI arguments.
pub fn build_config(args: &Cli) -> WorkflowConfig {
    let output = if args.inline_images {
        ImageOutput::Inline
    } else {
        ImageOutput::Directory(args.output_dir.clone().unwrap_or_else(default_output_dir))
    };
    WorkflowConfig {
        base_url: args.base_url.clone(),
        caption_path: args.caption_path.clone(),
        generate_path: args.generate_path.clone(),
        upload_field: args.upload_field.clone(),
        request_timeout: args.timeout.map(Duration::from),
        output,
        user_agent: format!("imagecap/{}", env!("CARGO_PKG_VERSION")),
    }
}

/// Forward controller events to the output writer. Resolves to `true` if any request failed.
fn spawn_event_printer(
    mut event_rx: mpsc::UnboundedReceiver<WorkflowEvent>,
    out_tx: mpsc::UnboundedSender<OutputLine>,
    json: bool,
) -> tokio::task::JoinHandle<bool> {
    tokio::spawn(async move {
        let mut failed = false;
        while let Some(ev) = event_rx.recv().await {
            failed |= matches!(
                ev,
                WorkflowEvent::StateChanged {
                    state: RequestState::Failed,
                    ..
                } | WorkflowEvent::Alert { .. }
            );

            if json {
                match serde_json::to_string(&ev) {
                    Ok(line) => {
                        let _ = out_tx.send(OutputLine::Stdout(line));
                    }
                    Err(e) => tracing::warn!(error = %e, "failed to serialize event"),
                }
                continue;
            }
            match text_summary::render_event(&ev) {
                Some(EventLine::Result(line)) => {
                    let _ = out_tx.send(OutputLine::Stdout(line));
                }
                Some(EventLine::Progress(line)) => {
                    let _ = out_tx.send(OutputLine::Stderr(line));
                }
                None => {}
            }
        }
        failed
    })
}

/// Run the requests named on the command line, concurrently, and wait for both.
async fn run_one_shot(args: Cli, cfg: WorkflowConfig) -> Result<()> {
    let client = HttpInferenceClient::new(&cfg)?;
    let (out_tx, out_handle) = spawn_output_writer();
    let (event_tx, event_rx) = mpsc::unbounded_channel::<WorkflowEvent>();
    let printer = spawn_event_printer(event_rx, out_tx.clone(), args.json);

    let mut controller = WorkflowController::new(client, cfg.output.clone(), event_tx);
    let mut skipped = false;

    if let Some(path) = args.caption.as_deref() {
        controller.open_file(path, Panel::Caption).await;
        // An unreadable or rejected file was already reported as an alert.
        if controller.state().selected_file.is_some() {
            controller.submit_caption();
        }
    }

    if let Some(prompt) = args.prompt.as_deref() {
        controller.set_prompt(prompt);
        if let Submission::Invalid(ValidationError::EmptyPrompt) = controller.submit_prompt() {
            let _ = out_tx.send(OutputLine::Stderr(
                "Prompt is empty; nothing to generate.".into(),
            ));
            skipped = true;
        }
    }

    while controller.next_completion().await.is_some() {}

    // Dropping the controller closes the event channel and lets the printer finish.
    drop(controller);
    let failed = printer.await.context("event printer task failed")?;
    drop(out_tx);
    let _ = out_handle.await;

    if failed || skipped {
        anyhow::bail!("one or more requests did not succeed");
    }
    Ok(())
}

const HELP: &str = "\
Commands:
  open <path>       select a JPEG for captioning
  open-any <path>   select any image type
  caption           caption the selected file
  prompt <text>     set the generation prompt
  generate          generate an image from the prompt
  status            show the current state
  help              show this help
  quit              wait for pending requests and exit";

/// Parse one line of interactive input.
fn parse_command(line: &str) -> Result<Option<UiCommand>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (cmd, rest) = match line.split_once(char::is_whitespace) {
        Some((c, r)) => (c, r.trim()),
        None => (line, ""),
    };
    let needs_arg = |what: &str| format!("usage: {cmd} <{what}>");

    let parsed = match cmd.to_ascii_lowercase().as_str() {
        "open" | "open-any" if rest.is_empty() => return Err(needs_arg("path")),
        "open" => UiCommand::OpenFile {
            path: PathBuf::from(rest),
            panel: Panel::Caption,
        },
        "open-any" => UiCommand::OpenFile {
            path: PathBuf::from(rest),
            panel: Panel::Generation,
        },
        // The prompt is kept verbatim; emptiness is checked when generating.
        "prompt" => UiCommand::SetPrompt(rest.to_string()),
        "caption" | "go" => UiCommand::SubmitCaption,
        "generate" | "gen" => UiCommand::SubmitPrompt,
        "status" => UiCommand::Status,
        "quit" | "exit" | "q" => UiCommand::Quit,
        "help" | "?" => return Err(HELP.to_string()),
        other => return Err(format!("unknown command `{other}` (try `help`)")),
    };
    Ok(Some(parsed))
}

async fn run_interactive(args: Cli, cfg: WorkflowConfig) -> Result<()> {
    let client = HttpInferenceClient::new(&cfg)?;
    let (out_tx, out_handle) = spawn_output_writer();
    let (event_tx, event_rx) = mpsc::unbounded_channel::<WorkflowEvent>();
    let printer = spawn_event_printer(event_rx, out_tx.clone(), args.json);
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<UiCommand>();
    let (status_tx, mut status_rx) = mpsc::unbounded_channel::<Vec<String>>();

    let _ = out_tx.send(OutputLine::Stderr(format!(
        "imagecap connected to {} (type `help` for commands)",
        cfg.base_url
    )));

    let input_out = out_tx.clone();
    let input = tokio::spawn(async move {
        let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to read stdin");
                    break;
                }
            };
            match parse_command(&line) {
                Ok(Some(cmd)) => {
                    let quit = cmd == UiCommand::Quit;
                    if cmd_tx.send(cmd).is_err() || quit {
                        break;
                    }
                }
                Ok(None) => {}
                Err(msg) => {
                    let _ = input_out.send(OutputLine::Stderr(msg));
                }
            }
        }
    });

    let status_out = out_tx.clone();
    let status_printer = tokio::spawn(async move {
        while let Some(lines) = status_rx.recv().await {
            for line in lines {
                let _ = status_out.send(OutputLine::Stdout(line));
            }
        }
    });

    let mut controller = WorkflowController::new(client, cfg.output.clone(), event_tx);
    let res = run_session(&mut controller, cmd_rx, status_tx).await;

    // stdin reads cannot be interrupted; the reader is simply abandoned.
    input.abort();
    drop(controller);
    let _ = printer.await;
    let _ = status_printer.await;
    drop(out_tx);
    let _ = out_handle.await;
    res
}
