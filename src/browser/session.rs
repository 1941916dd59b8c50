use std::time::Duration;
use async_trait::async_trait;
use crate::errors::ProbeError;
use crate::template::PreparedRequest;
use super::submit::build_submit_document;

/// Opaque reference to an element in the current document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementHandle(pub String);

/// One live browser the core can drive.
///
/// A session is owned by exactly one worker at a time and is never shared
/// between two payload evaluations, so every method takes `&mut self`.
#[async_trait]
pub trait BrowserSession: Send {
    /// Load `url`. Fails with `NavigationTimeout` after `timeout`; the session
    /// stays usable afterwards.
    async fn navigate(&mut self, url: &str, timeout: Duration) -> Result<(), ProbeError>;

    /// Replace the current document with `html`.
    async fn load_html(&mut self, html: &str) -> Result<(), ProbeError>;

    /// Perform a non-GET request through a synthetic document that renders
    /// the response in place.
    async fn submit(&mut self, request: &PreparedRequest) -> Result<(), ProbeError> {
        let html = build_submit_document(request);
        self.load_html(&html).await
    }

    async fn add_cookie(&mut self, name: &str, value: &str, domain: &str) -> Result<(), ProbeError>;

    /// Serialized current document. Retries once after dismissing a prompt
    /// that blocks access.
    async fn current_document(&mut self) -> Result<String, ProbeError>;

    /// Current page URL, with the same prompt handling as `current_document`.
    async fn current_url(&mut self) -> Result<String, ProbeError>;

    /// Run a boolean probe in the page. Any failure reads as `false`.
    async fn run_inspection_script(&mut self, script: &str) -> bool;

    /// Accept one pending prompt if there is one, returning its text.
    async fn dismiss_prompt(&mut self) -> Option<String>;

    async fn find_elements(&mut self, xpath: &str) -> Result<Vec<ElementHandle>, ProbeError>;

    async fn hover(&mut self, element: &ElementHandle) -> Result<(), ProbeError>;

    async fn click(&mut self, element: &ElementHandle) -> Result<(), ProbeError>;

    async fn is_alive(&mut self) -> bool;

    /// Release the backend. Safe to call more than once.
    async fn close(&mut self);
}

/// Creates browser sessions. Workers call it at startup and again after a
/// backend crash.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn create(&self, headless: bool) -> Result<Box<dyn BrowserSession>, ProbeError>;

    /// Backend name for logging.
    fn backend_name(&self) -> &str;
}
