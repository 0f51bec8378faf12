pub mod orchestrator;

pub use orchestrator::{IndexBuildOrchestrator, IndexingState};
