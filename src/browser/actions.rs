use std::time::Duration;
use tracing::debug;
use super::session::{BrowserSession, ElementHandle};

/// Elements that commonly carry event-handler payloads.
pub const CLICKABLE_XPATH: &str =
    "//a | //button | //input[@type='submit'] | //div[@onclick] | //span[@onclick]";

/// Everything in the body, hover candidates.
pub const HOVERABLE_XPATH: &str = "//body//*";

#[derive(Debug, Clone, Copy)]
pub struct InteractionLimits {
    pub hover: usize,
    pub click: usize,
    /// Pause after each action so handlers get to run.
    pub pause: Duration,
}

impl Default for InteractionLimits {
    fn default() -> Self {
        Self {
            hover: 5,
            click: 3,
            pause: Duration::from_millis(100),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Interaction {
    Hover(ElementHandle),
    Click(ElementHandle),
}

/// Hovers first, then clicks, both capped.
pub fn plan_interactions(
    hoverable: Vec<ElementHandle>,
    clickable: Vec<ElementHandle>,
    limits: &InteractionLimits,
) -> Vec<Interaction> {
    hoverable
        .into_iter()
        .take(limits.hover)
        .map(Interaction::Hover)
        .chain(clickable.into_iter().take(limits.click).map(Interaction::Click))
        .collect()
}

/// Nudge event-handler payloads into firing. Failures on individual elements
/// are ignored. Returns the text of any prompts dismissed along the way.
pub async fn run_interactions(
    session: &mut dyn BrowserSession,
    limits: &InteractionLimits,
) -> Vec<String> {
    let hoverable = session.find_elements(HOVERABLE_XPATH).await.unwrap_or_default();
    let clickable = session.find_elements(CLICKABLE_XPATH).await.unwrap_or_default();
    let plan = plan_interactions(hoverable, clickable, limits);

    let mut prompts = Vec::new();
    for step in &plan {
        let result = match step {
            Interaction::Hover(el) => session.hover(el).await,
            Interaction::Click(el) => session.click(el).await,
        };
        if let Err(e) = result {
            debug!(error = %e, "Interaction failed");
        }
        tokio::time::sleep(limits.pause).await;
        if let Some(text) = session.dismiss_prompt().await {
            prompts.push(text);
        }
    }
    prompts
}
