//! Interactive session loop.
//!
//! Multiplexes user commands with request completions so the user can keep typing
//! while a caption or generation request is pending.

use super::controller::{Submission, WorkflowController};
use crate::engine::InferenceClient;
use crate::error::ValidationError;
use crate::model::Alert;
use crate::preview::Panel;
use crate::text_summary;
use anyhow::Result;
use std::path::PathBuf;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

/// Commands emitted by input layers to drive the workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum UiCommand {
    OpenFile { path: PathBuf, panel: Panel },
    SetPrompt(String),
    SubmitCaption,
    SubmitPrompt,
    Status,
    Quit,
}

/// Drive `controller` from `cmd_rx` until quit, then wait for in-flight work.
///
/// Status snapshots are sent to `status_tx` as pre-formatted lines.
pub(crate) async fn run_session<C: InferenceClient>(
    controller: &mut WorkflowController<C>,
    mut cmd_rx: UnboundedReceiver<UiCommand>,
    status_tx: UnboundedSender<Vec<String>>,
) -> Result<()> {
    let mut quit_pending = false;

    loop {
        if quit_pending && !controller.is_busy() {
            break;
        }
        tokio::select! {
            cmd = cmd_rx.recv(), if !quit_pending => {
                match cmd {
                    Some(UiCommand::OpenFile { path, panel }) => {
                        controller.open_file(&path, panel).await;
                    }
                    Some(UiCommand::SetPrompt(text)) => controller.set_prompt(text),
                    Some(UiCommand::SubmitCaption) => {
                        if controller.submit_caption() == Submission::Busy {
                            controller.notify(Alert::Rejected(
                                "A caption request is already in progress.".into(),
                            ));
                        }
                    }
                    Some(UiCommand::SubmitPrompt) => match controller.submit_prompt() {
                        Submission::Busy => controller.notify(Alert::Rejected(
                            "An image is already being generated.".into(),
                        )),
                        Submission::Invalid(ValidationError::EmptyPrompt) => {
                            tracing::debug!("ignoring empty prompt");
                        }
                        _ => {}
                    },
                    Some(UiCommand::Status) => {
                        let _ = status_tx.send(text_summary::state_lines(controller.state()));
                    }
                    // Quit waits for pending requests so their outcomes are still shown.
                    Some(UiCommand::Quit) | None => {
                        quit_pending = true;
                        if controller.is_busy() {
                            tracing::info!("waiting for in-flight requests before exit");
                        }
                    }
                }
            }
            applied = controller.next_completion(), if controller.is_busy() => {
                tracing::debug!(?applied, "completion applied");
            }
            else => break,
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::GeneratedImage;
    use crate::error::RequestError;
    use crate::model::{ImageOutput, RequestState, ResultPayload, WorkflowEvent};
    use crate::preview::SelectedFile;
    use tokio::sync::mpsc;

    struct EchoClient;

    impl InferenceClient for EchoClient {
        async fn caption(&self, file: SelectedFile) -> Result<String, RequestError> {
            tokio::time::sleep(std::time::Duration::from_millis(200)).await;
            Ok(format!("caption of {}", file.name))
        }

        async fn generate(&self, prompt: String) -> Result<GeneratedImage, RequestError> {
            Ok(GeneratedImage::Url(format!("https://img.example/{prompt}.png")))
        }
    }

    #[tokio::test]
    async fn quit_waits_for_pending_caption() {
        let path = std::env::temp_dir().join(format!("imagecap-session-{}.jpg", std::process::id()));
        tokio::fs::write(&path, crate::preview::jpeg_fixture(3, 3))
            .await
            .unwrap();

        let (event_tx, mut event_rx) = mpsc::unbounded_channel::<WorkflowEvent>();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (status_tx, mut status_rx) = mpsc::unbounded_channel();
        let mut controller = WorkflowController::new(EchoClient, ImageOutput::Inline, event_tx);

        cmd_tx
            .send(UiCommand::OpenFile {
                path: path.clone(),
                panel: Panel::Caption,
            })
            .unwrap();
        cmd_tx.send(UiCommand::SubmitCaption).unwrap();
        cmd_tx.send(UiCommand::SetPrompt("kite".into())).unwrap();
        cmd_tx.send(UiCommand::SubmitPrompt).unwrap();
        cmd_tx.send(UiCommand::Status).unwrap();
        cmd_tx.send(UiCommand::Quit).unwrap();

        run_session(&mut controller, cmd_rx, status_tx).await.unwrap();
        let _ = tokio::fs::remove_file(&path).await;

        let state = controller.state();
        assert_eq!(state.caption, RequestState::Idle);
        assert_eq!(state.generation, RequestState::Idle);
        let expected = format!(
            "caption of {}",
            path.file_name().unwrap().to_string_lossy()
        );
        assert_eq!(state.caption_result, Some(ResultPayload::Caption(expected)));
        assert!(state.generated_image.is_some());

        let status = status_rx.recv().await.unwrap();
        assert!(status.iter().any(|l| l.contains("Pending")));

        let mut saw_caption = false;
        while let Ok(ev) = event_rx.try_recv() {
            saw_caption |= matches!(ev, WorkflowEvent::CaptionResult { .. });
        }
        assert!(saw_caption);
    }

    #[tokio::test]
    async fn closed_command_channel_ends_session() {
        let (event_tx, _event_rx) = mpsc::unbounded_channel();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<UiCommand>();
        let (status_tx, _status_rx) = mpsc::unbounded_channel();
        let mut controller = WorkflowController::new(EchoClient, ImageOutput::Inline, event_tx);
        drop(cmd_tx);

        run_session(&mut controller, cmd_rx, status_tx).await.unwrap();
        assert!(!controller.is_busy());
    }
}
