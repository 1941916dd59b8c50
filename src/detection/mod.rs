pub mod verdict;
pub mod engine;
pub mod probes;

pub use verdict::{DetectionKind, DetectionResult, Evidence};
pub use engine::{classify, DetectionInput, ProbeResults};
pub use probes::inspect;
