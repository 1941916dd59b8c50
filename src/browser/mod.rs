pub mod session;
pub mod submit;
pub mod actions;
pub mod webdriver;

pub use session::{BrowserSession, ElementHandle, SessionFactory};
pub use actions::{run_interactions, InteractionLimits};
pub use webdriver::{WebDriverFactory, WebDriverSession};
