//! Text rendering for CLI output.
//!
//! Results go to stdout; progress and alerts go to stderr.

use crate::model::{RequestKind, RequestState, WorkflowEvent};
use crate::orchestrator::WorkflowState;

/// A rendered event line and the stream it belongs on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum EventLine {
    Result(String),
    Progress(String),
}

fn kind_label(kind: RequestKind) -> &'static str {
    match kind {
        RequestKind::Caption => "Caption",
        RequestKind::Generation => "Generation",
    }
}

/// Render one workflow event, or `None` for events that are not worth a line.
pub(crate) fn render_event(event: &WorkflowEvent) -> Option<EventLine> {
    match event {
        WorkflowEvent::FileSelected { name, mime, bytes } => Some(EventLine::Progress(format!(
            "Selected {name} ({mime}, {bytes} bytes)"
        ))),
        WorkflowEvent::PreviewReady {
            name, width, height, ..
        } => Some(EventLine::Progress(format!(
            "Preview ready: {name} {width}x{height}"
        ))),
        WorkflowEvent::StateChanged { kind, state } => match state {
            RequestState::Pending => Some(EventLine::Progress(format!(
                "{}: request sent…",
                kind_label(*kind)
            ))),
            // Terminal states are followed by a result or alert line.
            _ => None,
        },
        WorkflowEvent::CaptionResult { payload } => Some(EventLine::Result(payload.to_string())),
        WorkflowEvent::ImageGenerated { image } => {
            Some(EventLine::Result(format!("Generated image: {image}")))
        }
        WorkflowEvent::Alert { alert } => {
            Some(EventLine::Progress(format!("! {}", alert.to_message())))
        }
    }
}

fn state_label(state: RequestState) -> &'static str {
    match state {
        RequestState::Idle => "Idle",
        RequestState::Pending => "Pending",
        RequestState::Succeeded => "Succeeded",
        RequestState::Failed => "Failed",
    }
}

/// Snapshot of the workflow state for the `status` command.
pub(crate) fn state_lines(state: &WorkflowState) -> Vec<String> {
    let mut lines = Vec::new();

    match state.selected_file.as_ref() {
        Some(f) => match f.path.as_ref() {
            Some(path) => lines.push(format!("File: {} ({}) from {}", f.name, f.mime, path.display())),
            None => lines.push(format!("File: {} ({})", f.name, f.mime)),
        },
        None => lines.push("File: -".to_string()),
    }
    if let Some(p) = state.preview.as_ref() {
        lines.push(format!("Preview: {}x{} {}", p.width, p.height, p.mime));
    }
    if !state.prompt.trim().is_empty() {
        lines.push(format!("Prompt: {}", state.prompt));
    }
    lines.push(format!("Caption: {}", state_label(state.caption)));
    if let Some(r) = state.caption_result.as_ref() {
        lines.push(format!("Caption result: {r}"));
    }
    lines.push(format!("Generation: {}", state_label(state.generation)));
    if let Some(img) = state.generated_image.as_ref() {
        lines.push(format!("Generated image: {img}"));
    }
    lines
}
