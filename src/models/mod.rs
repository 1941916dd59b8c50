pub mod finding;
pub mod hit;

pub use finding::*;
pub use hit::*;
