pub mod blocks;
pub mod findings;

pub use blocks::{canonicalize, canonicalize_file, sort_hit_log, sort_hit_log_file, BlockStyle};
pub use findings::FindingStore;
