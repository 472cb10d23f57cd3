//! Stage output types and the aggregate site blueprint.
//!
//! Field names serialize in camelCase so the JSON matches what front-ends
//! already render (`heroImageUrl`, `stripePriceId`, ...).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

/// Palette roles every visual output must define.
pub const REQUIRED_PALETTE_ROLES: [&str; 3] = ["primary", "secondary", "accent"];

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper identifying one pipeline run (time-sortable).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Architect
// ---------------------------------------------------------------------------

/// A page section planned by the architect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionPlan {
    pub id: String,
    pub title: String,
    pub description: String,
}

/// Sitemap and section plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchitectOutput {
    pub sitemap: Vec<String>,
    pub sections: Vec<SectionPlan>,
}

// ---------------------------------------------------------------------------
// Copywriter
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeroCopy {
    pub headline: String,
    pub subheading: String,
    pub cta: String,
}

/// Body copy for one planned section; `id` matches a [`SectionPlan::id`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionCopy {
    pub id: String,
    pub title: String,
    pub body: String,
}

/// SEO metadata for the landing page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMeta {
    pub title: String,
    pub description: String,
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CopywriterOutput {
    pub hero: HeroCopy,
    pub sections: Vec<SectionCopy>,
    pub meta: PageMeta,
    /// schema.org structured data for the page head.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json_ld: Option<serde_json::Value>,
}

// ---------------------------------------------------------------------------
// Visual
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisualOutput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hero_image_url: Option<Url>,
    /// Prompt an image model can render the hero from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hero_prompt: Option<String>,
    /// Color role (e.g. `primary`) to CSS color value.
    pub palette: BTreeMap<String, String>,
    pub design_notes: String,
}

impl VisualOutput {
    /// Required palette roles this output does not define.
    pub fn missing_palette_roles(&self) -> Vec<&'static str> {
        REQUIRED_PALETTE_ROLES
            .into_iter()
            .filter(|role| !self.palette.contains_key(*role))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Integration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub url: Url,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormField {
    pub label: String,
    pub required: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactForm {
    pub fields: Vec<FormField>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationOutput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stripe_product_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stripe_price_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub booking: Option<Booking>,
    pub contact_form: ContactForm,
}

// ---------------------------------------------------------------------------
// AggregateResult
// ---------------------------------------------------------------------------

/// The complete site blueprint. Only ever built when all four stages succeeded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateResult {
    pub architect: ArchitectOutput,
    pub copywriter: CopywriterOutput,
    pub visual: VisualOutput,
    pub integration: IntegrationOutput,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_id_is_uuid_v7() {
        let id = RunId::new();
        assert_eq!(id.0.get_version_num(), 7);
        assert_eq!(id.to_string().len(), 36);
    }

    #[test]
    fn visual_output_reports_missing_roles() {
        let visual = VisualOutput {
            hero_image_url: None,
            hero_prompt: None,
            palette: BTreeMap::from([("primary".to_string(), "#0ea5e9".to_string())]),
            design_notes: String::new(),
        };
        assert_eq!(visual.missing_palette_roles(), ["secondary", "accent"]);
    }

    #[test]
    fn integration_output_omits_absent_ids() {
        let output = IntegrationOutput {
            stripe_product_id: None,
            stripe_price_id: None,
            booking: None,
            contact_form: ContactForm {
                fields: vec![FormField {
                    label: "Email".into(),
                    required: true,
                }],
            },
        };
        let json = serde_json::to_string(&output).expect("serialize");
        assert!(!json.contains("stripeProductId"));
        assert!(!json.contains("booking"));
        assert!(json.contains(r#""contactForm""#));
    }

    #[test]
    fn visual_output_parses_camel_case() {
        let json = r##"{
            "heroImageUrl": "https://cdn.example.com/hero.png",
            "palette": {"primary": "#111", "secondary": "#222", "accent": "#333"},
            "designNotes": "Glassmorphism over a dark grid"
        }"##;
        let visual: VisualOutput = serde_json::from_str(json).expect("deserialize");
        assert_eq!(
            visual.hero_image_url.as_ref().map(Url::as_str),
            Some("https://cdn.example.com/hero.png")
        );
        assert!(visual.missing_palette_roles().is_empty());
    }
}
