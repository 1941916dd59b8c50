pub mod types;
pub mod classification;
pub mod retry;

pub use types::ProbeError;
pub use classification::{ErrorClassification, Recovery};
pub use retry::RetryPolicy;
