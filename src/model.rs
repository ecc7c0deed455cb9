use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Message shown when a caption is requested without a selected file.
pub const MISSING_FILE_MESSAGE: &str = "Please select a JPG file first.";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    pub base_url: String,
    pub caption_path: String,
    pub generate_path: String,
    /// Multipart field carrying the image binary.
    pub upload_field: String,
    #[serde(default, with = "humantime_serde")]
    pub request_timeout: Option<Duration>,
    pub output: ImageOutput,
    pub user_agent: String,
}

impl WorkflowConfig {
    pub fn caption_url(&self) -> String {
        join_url(&self.base_url, &self.caption_path)
    }

    pub fn generate_url(&self) -> String {
        join_url(&self.base_url, &self.generate_path)
    }
}

fn join_url(base: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Where generated image bytes end up once the remote service returns them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageOutput {
    Directory(PathBuf),
    Inline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestKind {
    Caption,
    Generation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RequestState {
    #[default]
    Idle,
    Pending,
    Succeeded,
    Failed,
}

/// Inline outcome of the captioning flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResultPayload {
    Caption(String),
    Error(String),
    /// Local validation text, displayed as-is.
    Notice(String),
}

impl fmt::Display for ResultPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResultPayload::Caption(text) | ResultPayload::Notice(text) => f.write_str(text),
            ResultPayload::Error(msg) => write!(f, "Error: {msg}"),
        }
    }
}

/// A displayable reference to a generated image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageRef {
    Url(String),
    File(PathBuf),
    DataUri(String),
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageRef::Url(url) => f.write_str(url),
            ImageRef::File(path) => write!(f, "{}", path.display()),
            // Data URIs are long; show only the header.
            ImageRef::DataUri(uri) => {
                let header = uri.split_once(',').map(|(h, _)| h).unwrap_or(uri);
                write!(f, "{header},… ({} bytes)", uri.len())
            }
        }
    }
}

/// Events emitted by the controller and consumed by presentation layers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WorkflowEvent {
    FileSelected {
        name: String,
        mime: String,
        bytes: usize,
    },
    PreviewReady {
        name: String,
        width: u32,
        height: u32,
        uri_len: usize,
    },
    StateChanged {
        kind: RequestKind,
        state: RequestState,
    },
    CaptionResult {
        payload: ResultPayload,
    },
    ImageGenerated {
        image: ImageRef,
    },
    Alert {
        alert: Alert,
    },
}

/// Alert-level notifications, kept out of inline result state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Alert {
    Preview(String),
    Generation(String),
    Rejected(String),
}

impl Alert {
    /// Render a human-readable message for UI/CLI layers.
    pub fn to_message(&self) -> String {
        match self {
            Alert::Preview(msg) => format!("Could not preview file: {msg}"),
            Alert::Generation(msg) => format!("Image generation failed: {msg}"),
            Alert::Rejected(msg) => msg.clone(),
        }
    }
}
