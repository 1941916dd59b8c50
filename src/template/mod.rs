pub mod request;

pub use request::{PreparedRequest, RequestTemplate, MARKER};
