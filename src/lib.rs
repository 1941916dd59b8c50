pub mod browser;
pub mod callback;
pub mod cli;
pub mod config;
pub mod detection;
pub mod errors;
pub mod models;
pub mod payloads;
pub mod pipeline;
pub mod store;
pub mod template;
pub mod worker;
