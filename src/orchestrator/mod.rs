//! Application-level orchestration.
//!
//! This module owns the workflow state machine, the session loop that feeds it user
//! commands, and post-processing of generated images. CLI layers call into this module
//! and only observe state through emitted events and read-only snapshots.

mod controller;
mod post_process;
mod session;

pub(crate) use controller::{Submission, WorkflowController, WorkflowState};
pub(crate) use session::{run_session, UiCommand};
