//! Script rendering.
//!
//! Rendering is an external collaborator treated as a pure function: given a
//! campaign and a contact, produce the bounded opening line/script text. The
//! shipped [`TemplateRenderer`] substitutes a fixed set of placeholders; it
//! is deliberately not a general template engine.

use crate::types::{Campaign, Contact};

/// Renders the script spoken (or used as the agent opening line) for a call.
pub trait ScriptRenderer: Send + Sync {
    fn render(&self, campaign: &Campaign, contact: &Contact) -> String;
}

/// Default renderer: fixed placeholder substitution with a length bound.
#[derive(Debug, Clone)]
pub struct TemplateRenderer {
    max_len: usize,
}

/// Default output bound, in characters.
const DEFAULT_MAX_LEN: usize = 1500;

impl TemplateRenderer {
    pub fn new(max_len: usize) -> Self {
        Self { max_len }
    }
}

impl Default for TemplateRenderer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LEN)
    }
}

impl ScriptRenderer for TemplateRenderer {
    fn render(&self, campaign: &Campaign, contact: &Contact) -> String {
        let rendered = campaign
            .script
            .replace("{{name}}", &contact.name)
            .replace("{{first_name}}", contact.first_name())
            .replace("{{campaign}}", &campaign.name);

        rendered.chars().take(self.max_len).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::OwnerId;

    fn fixtures() -> (Campaign, Contact) {
        let owner = OwnerId::new("owner-1");
        let campaign = Campaign::new(
            owner.clone(),
            "Spring promo",
            "Hi {{first_name}}, this is about {{campaign}}.",
        );
        let contact = Contact::new(owner, "Ada Lovelace");
        (campaign, contact)
    }

    #[test]
    fn test_render_substitutes_placeholders() {
        let (campaign, contact) = fixtures();
        let renderer = TemplateRenderer::default();
        assert_eq!(
            renderer.render(&campaign, &contact),
            "Hi Ada, this is about Spring promo."
        );
    }

    #[test]
    fn test_render_bounds_output() {
        let (mut campaign, contact) = fixtures();
        campaign.script = "y".repeat(5000);
        let renderer = TemplateRenderer::default();
        assert_eq!(renderer.render(&campaign, &contact).len(), 1500);
    }

    #[test]
    fn test_render_leaves_unknown_placeholders() {
        let (mut campaign, contact) = fixtures();
        campaign.script = "Hello {{unknown}}".to_string();
        let renderer = TemplateRenderer::default();
        assert_eq!(renderer.render(&campaign, &contact), "Hello {{unknown}}");
    }
}
