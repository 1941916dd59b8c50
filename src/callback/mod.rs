pub mod hits;
pub mod server;

pub use hits::{Admission, HitLedger};
pub use server::{build_redirect_router, build_router, serve, tracking_id, ListenerSettings, ListenerState};
