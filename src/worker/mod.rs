pub mod stage;
pub mod report;
pub mod runner;

pub use stage::Stage;
pub use report::{PayloadOutcome, PayloadReport, Verdict};
pub use runner::{ScanContext, SessionWorker, WorkerSettings};
