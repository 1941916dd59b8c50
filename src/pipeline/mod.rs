pub mod orchestrator;
pub mod progress;
pub mod state;

pub use orchestrator::{effective_workers, ScanOrchestrator, ScanSettings};
pub use state::{KindCounts, OutcomeCounts, RunSummary, Tally};
