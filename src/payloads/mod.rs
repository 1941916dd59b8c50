pub mod corpus;
pub mod attacker;

pub use corpus::{Corpus, PayloadRecord};
pub use attacker::AttackerServer;
