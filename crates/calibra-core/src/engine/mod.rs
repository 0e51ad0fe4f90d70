pub mod runner;

pub use runner::{CancelHandle, RunOrchestrator};
