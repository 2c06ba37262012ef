//! Resumable whole-document encrypt and decrypt passes

mod engine;
mod flags;

pub use engine::{Operation, PauseHandler, Progress, StepResult, WorkBudget};
pub use flags::SaveFlags;
