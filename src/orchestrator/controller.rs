//! Workflow controller.
//!
//! Owns the interaction state of both flows and applies the outcomes of background
//! work (previews, caption requests, generation requests) one at a time.

use super::post_process;
use crate::engine::InferenceClient;
use crate::error::{PreviewError, RequestError, ValidationError};
use crate::model::{
    Alert, ImageOutput, ImageRef, RequestKind, RequestState, ResultPayload, WorkflowEvent,
};
use crate::preview::{render_preview, Panel, PreviewImage, SelectedFile};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::{Id, JoinError, JoinSet};

/// Interaction state. Only `WorkflowController` mutates it.
#[derive(Debug, Default)]
pub(crate) struct WorkflowState {
    pub selected_file: Option<SelectedFile>,
    pub preview: Option<PreviewImage>,
    pub prompt: String,
    pub caption: RequestState,
    pub caption_result: Option<ResultPayload>,
    pub generation: RequestState,
    pub generated_image: Option<ImageRef>,
}

/// Outcome of a submit operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Submission {
    Started,
    /// A request of the same kind is still pending.
    Busy,
    Invalid(ValidationError),
}

/// Finished background work, tagged with the selection it belongs to where relevant.
#[derive(Debug)]
enum Completion {
    Preview {
        epoch: u64,
        outcome: Result<PreviewImage, PreviewError>,
    },
    Caption {
        epoch: u64,
        outcome: Result<String, RequestError>,
    },
    Generation {
        outcome: Result<ImageRef, RequestError>,
    },
}

/// What a background task was doing, kept so a panicked task can still be resolved.
#[derive(Debug, Clone, Copy)]
enum TaskKind {
    Preview { epoch: u64 },
    Caption { epoch: u64 },
    Generation,
}

impl TaskKind {
    fn failed(self, e: JoinError) -> Completion {
        let msg = format!("{e}");
        match self {
            TaskKind::Preview { epoch } => Completion::Preview {
                epoch,
                outcome: Err(PreviewError(format!("preview task failed: {msg}"))),
            },
            TaskKind::Caption { epoch } => Completion::Caption {
                epoch,
                outcome: Err(RequestError::Internal(msg)),
            },
            TaskKind::Generation => Completion::Generation {
                outcome: Err(RequestError::Internal(msg)),
            },
        }
    }
}

/// What `next_completion` applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Applied {
    Preview { stale: bool },
    Request { kind: RequestKind, state: RequestState },
}

pub(crate) struct WorkflowController<C> {
    client: Arc<C>,
    output: ImageOutput,
    state: WorkflowState,
    /// Bumped on every accepted selection; older completions must not touch newer state.
    selection_epoch: u64,
    tasks: JoinSet<Completion>,
    task_kinds: HashMap<Id, TaskKind>,
    event_tx: UnboundedSender<WorkflowEvent>,
}

impl<C: InferenceClient> WorkflowController<C> {
    pub fn new(client: C, output: ImageOutput, event_tx: UnboundedSender<WorkflowEvent>) -> Self {
        Self {
            client: Arc::new(client),
            output,
            state: WorkflowState::default(),
            selection_epoch: 0,
            tasks: JoinSet::new(),
            task_kinds: HashMap::new(),
            event_tx,
        }
    }

    pub fn state(&self) -> &WorkflowState {
        &self.state
    }

    /// True while any preview or request task has not been applied yet.
    pub fn is_busy(&self) -> bool {
        !self.tasks.is_empty()
    }

    pub fn notify(&self, alert: Alert) {
        tracing::info!(?alert, "alert raised");
        self.emit(WorkflowEvent::Alert { alert });
    }

    /// Replace the selected file and start deriving its preview.
    pub fn select_file(&mut self, file: SelectedFile, panel: Panel) -> Result<(), ValidationError> {
        if !panel.accepts(&file.mime) {
            return Err(ValidationError::UnsupportedType(file.mime));
        }

        self.selection_epoch += 1;
        self.state.caption_result = None;
        self.state.preview = None;
        self.emit(WorkflowEvent::FileSelected {
            name: file.name.clone(),
            mime: file.mime.clone(),
            bytes: file.bytes.len(),
        });

        let epoch = self.selection_epoch;
        let to_render = file.clone();
        self.state.selected_file = Some(file);
        self.spawn(TaskKind::Preview { epoch }, async move {
            let outcome = tokio::task::spawn_blocking(move || render_preview(&to_render))
                .await
                .unwrap_or_else(|e| Err(PreviewError(format!("preview task failed: {e}"))));
            Completion::Preview { epoch, outcome }
        });
        Ok(())
    }

    /// Read `path` from disk and select it. Failures become alerts.
    pub async fn open_file(&mut self, path: &Path, panel: Panel) {
        let file = match SelectedFile::open(path).await {
            Ok(f) => f,
            Err(e) => {
                self.notify(Alert::Preview(e.to_string()));
                return;
            }
        };
        if let Err(e) = self.select_file(file, panel) {
            self.notify(Alert::Rejected(e.to_string()));
        }
    }

    pub fn set_prompt(&mut self, text: impl Into<String>) {
        self.state.prompt = text.into();
    }

    pub fn submit_caption(&mut self) -> Submission {
        if self.state.caption == RequestState::Pending {
            return Submission::Busy;
        }
        let Some(file) = self.state.selected_file.clone() else {
            self.emit_state(RequestKind::Caption, RequestState::Failed);
            self.set_caption_result(ResultPayload::Notice(ValidationError::MissingFile.to_string()));
            self.emit_state(RequestKind::Caption, RequestState::Idle);
            return Submission::Invalid(ValidationError::MissingFile);
        };

        self.state.caption_result = None;
        self.set_state(RequestKind::Caption, RequestState::Pending);
        tracing::info!(file = %file.name, "caption request started");

        let client = self.client.clone();
        let epoch = self.selection_epoch;
        self.spawn(TaskKind::Caption { epoch }, async move {
            let outcome = client.caption(file).await;
            Completion::Caption { epoch, outcome }
        });
        Submission::Started
    }

    pub fn submit_prompt(&mut self) -> Submission {
        let prompt = self.state.prompt.trim();
        if prompt.is_empty() {
            return Submission::Invalid(ValidationError::EmptyPrompt);
        }
        if self.state.generation == RequestState::Pending {
            return Submission::Busy;
        }

        let prompt = prompt.to_string();
        self.set_state(RequestKind::Generation, RequestState::Pending);
        tracing::info!(prompt_len = prompt.len(), "generation request started");

        let client = self.client.clone();
        let output = self.output.clone();
        self.spawn(TaskKind::Generation, async move {
            let outcome = match client.generate(prompt).await {
                Ok(image) => post_process::materialize(image, &output).await,
                Err(e) => Err(e),
            };
            Completion::Generation { outcome }
        });
        Submission::Started
    }

    /// Wait for the next background task to finish and apply it.
    ///
    /// Returns `None` immediately when nothing is in flight.
    pub async fn next_completion(&mut self) -> Option<Applied> {
        loop {
            let completion = match self.tasks.join_next_with_id().await? {
                Ok((id, completion)) => {
                    self.task_kinds.remove(&id);
                    completion
                }
                Err(e) => match self.task_kinds.remove(&e.id()) {
                    Some(kind) => {
                        tracing::warn!(error = %e, ?kind, "background task failed");
                        kind.failed(e)
                    }
                    None => {
                        tracing::warn!(error = %e, "untracked background task failed");
                        continue;
                    }
                },
            };
            return Some(self.apply(completion));
        }
    }

    fn apply(&mut self, completion: Completion) -> Applied {
        match completion {
            Completion::Preview { epoch, outcome } => {
                let stale = epoch != self.selection_epoch;
                if stale {
                    tracing::debug!(epoch, current = self.selection_epoch, "discarding stale preview");
                    return Applied::Preview { stale };
                }
                match outcome {
                    Ok(preview) => {
                        let name = self
                            .state
                            .selected_file
                            .as_ref()
                            .map(|f| f.name.clone())
                            .unwrap_or_default();
                        self.emit(WorkflowEvent::PreviewReady {
                            name,
                            width: preview.width,
                            height: preview.height,
                            uri_len: preview.data_uri.len(),
                        });
                        self.state.preview = Some(preview);
                    }
                    Err(e) => self.notify(Alert::Preview(e.to_string())),
                }
                Applied::Preview { stale }
            }
            Completion::Caption { epoch, outcome } => {
                let (terminal, payload) = match outcome {
                    Ok(caption) => (RequestState::Succeeded, ResultPayload::Caption(caption)),
                    Err(e) => {
                        tracing::info!(error = %e, "caption request failed");
                        (RequestState::Failed, ResultPayload::Error(e.to_string()))
                    }
                };
                self.emit_state(RequestKind::Caption, terminal);
                if epoch == self.selection_epoch {
                    self.set_caption_result(payload);
                    // The spent selection is single-use.
                    self.state.selected_file = None;
                    self.state.preview = None;
                } else {
                    // A newer selection owns the result slot; only report the outcome.
                    tracing::debug!(epoch, current = self.selection_epoch, "caption for a replaced selection");
                    self.emit(WorkflowEvent::CaptionResult { payload });
                }
                self.set_state(RequestKind::Caption, RequestState::Idle);
                Applied::Request {
                    kind: RequestKind::Caption,
                    state: terminal,
                }
            }
            Completion::Generation { outcome } => {
                let terminal = match outcome {
                    Ok(image) => {
                        self.emit_state(RequestKind::Generation, RequestState::Succeeded);
                        self.emit(WorkflowEvent::ImageGenerated {
                            image: image.clone(),
                        });
                        self.state.generated_image = Some(image);
                        RequestState::Succeeded
                    }
                    Err(e) => {
                        self.emit_state(RequestKind::Generation, RequestState::Failed);
                        self.notify(Alert::Generation(e.to_string()));
                        RequestState::Failed
                    }
                };
                self.set_state(RequestKind::Generation, RequestState::Idle);
                Applied::Request {
                    kind: RequestKind::Generation,
                    state: terminal,
                }
            }
        }
    }

    fn spawn<F>(&mut self, kind: TaskKind, task: F)
    where
        F: std::future::Future<Output = Completion> + Send + 'static,
    {
        let handle = self.tasks.spawn(task);
        self.task_kinds.insert(handle.id(), kind);
    }

    fn set_caption_result(&mut self, payload: ResultPayload) {
        self.emit(WorkflowEvent::CaptionResult {
            payload: payload.clone(),
        });
        self.state.caption_result = Some(payload);
    }

    fn set_state(&mut self, kind: RequestKind, state: RequestState) {
        match kind {
            RequestKind::Caption => self.state.caption = state,
            RequestKind::Generation => self.state.generation = state,
        }
        self.emit_state(kind, state);
    }

    fn emit_state(&self, kind: RequestKind, state: RequestState) {
        self.emit(WorkflowEvent::StateChanged { kind, state });
    }

    fn emit(&self, event: WorkflowEvent) {
        let _ = self.event_tx.send(event);
    }
}
