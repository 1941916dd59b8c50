pub mod commands;
pub mod listen;
pub mod scan;
pub mod sort;

pub use commands::{Cli, Commands};
