//! Deterministic, offline generator.
//!
//! Produces a complete blueprint purely from the brief using fixed copy
//! templates, theme palettes, and integration rules. It never calls an
//! external service, so it is the default backend and the reference
//! implementation of every stage contract.

use std::collections::{BTreeMap, HashSet};
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use serde_json::json;
use tracing::debug;
use url::Url;

use siteforge_shared::{
    ArchitectOutput, Booking, BriefPayload, ContactForm, CopywriterOutput, FormField, HeroCopy,
    IntegrationOutput, PageMeta, SectionCopy, SectionPlan, Tone, VisualOutput,
};

use crate::stage::{Generator, StageFailure};

/// Default booking host used when none is configured.
pub const DEFAULT_BOOKING_BASE_URL: &str = "https://cal.com";

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// Lowercase, hyphen-separated identifier (`"Lead capture!"` → `"lead-capture"`).
pub fn slugify(text: &str) -> String {
    static NON_ALNUM: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"[^a-z0-9]+").expect("valid regex"));
    NON_ALNUM
        .replace_all(&text.to_lowercase(), "-")
        .trim_matches('-')
        .to_string()
}

/// Contact form fields for a brief. Name and email are always required.
pub fn contact_form_fields(brief: &BriefPayload) -> Vec<FormField> {
    let field = |label: &str, required: bool| FormField {
        label: label.to_string(),
        required,
    };

    let mut fields = vec![field("Name", true), field("Email", true)];
    if !brief.integrations().contact_form {
        return fields;
    }

    fields.push(field("Company", false));
    if !brief.target_audience().is_empty() {
        fields.push(field("Role", false));
    }
    if brief.integrations().calendar {
        fields.push(field("Preferred meeting time", false));
    }
    fields.push(field("Message", true));
    fields
}

/// `<base>/<project-slug>`, the booking page for a project.
pub fn booking_url(base: &Url, brief: &BriefPayload) -> Result<Url, StageFailure> {
    let slug = slugify(brief.project_name());
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|()| {
            StageFailure::rejected(format!("booking base URL '{base}' cannot hold a path"))
        })?
        .pop_if_empty()
        .push(&slug);
    Ok(url)
}

// ---------------------------------------------------------------------------
// TemplateGenerator
// ---------------------------------------------------------------------------

/// Offline generator driven by fixed templates.
#[derive(Debug, Clone)]
pub struct TemplateGenerator {
    booking_base_url: Url,
}

impl TemplateGenerator {
    pub fn new(booking_base_url: Url) -> Self {
        Self { booking_base_url }
    }
}

impl Default for TemplateGenerator {
    fn default() -> Self {
        Self {
            booking_base_url: Url::parse(DEFAULT_BOOKING_BASE_URL).expect("valid default URL"),
        }
    }
}

#[async_trait]
impl Generator for TemplateGenerator {
    fn name(&self) -> &str {
        "template"
    }

    async fn architect(&self, brief: &BriefPayload) -> Result<ArchitectOutput, StageFailure> {
        Ok(plan_site(brief))
    }

    async fn copywriter(
        &self,
        brief: &BriefPayload,
        architect: &ArchitectOutput,
    ) -> Result<CopywriterOutput, StageFailure> {
        Ok(write_copy(brief, architect))
    }

    async fn visual(
        &self,
        brief: &BriefPayload,
        copywriter: &CopywriterOutput,
    ) -> Result<VisualOutput, StageFailure> {
        Ok(design_visuals(brief, copywriter))
    }

    async fn integration(
        &self,
        brief: &BriefPayload,
        _copywriter: &CopywriterOutput,
        _visual: &VisualOutput,
    ) -> Result<IntegrationOutput, StageFailure> {
        let integrations = brief.integrations();
        if integrations.stripe {
            debug!("template generator has no payment provider; stripe ids omitted");
        }

        let booking = if integrations.calendar {
            Some(Booking {
                url: booking_url(&self.booking_base_url, brief)?,
            })
        } else {
            None
        };

        Ok(IntegrationOutput {
            stripe_product_id: None,
            stripe_price_id: None,
            booking,
            contact_form: ContactForm {
                fields: contact_form_fields(brief),
            },
        })
    }
}

// ---------------------------------------------------------------------------
// Architect
// ---------------------------------------------------------------------------

fn plan_site(brief: &BriefPayload) -> ArchitectOutput {
    let integrations = brief.integrations();
    let name = brief.project_name();

    let mut sitemap = vec!["Home".to_string()];
    if !brief.needs().is_empty() {
        sitemap.push("Features".into());
    }
    if integrations.stripe {
        sitemap.push("Pricing".into());
    }
    if integrations.calendar {
        sitemap.push("Book a Call".into());
    }
    sitemap.push("About".into());
    if integrations.contact_form {
        sitemap.push("Contact".into());
    }

    let mut ids = HashSet::new();
    let mut sections = Vec::new();
    let mut push = |id: String, title: String, description: String| {
        let id = unique_id(&mut ids, id);
        sections.push(SectionPlan {
            id,
            title,
            description,
        });
    };

    push(
        "hero".into(),
        name.to_string(),
        format!(
            "Above-the-fold pitch that drives visitors to {}.",
            lower_first(brief.primary_goal())
        ),
    );
    push(
        "value-proposition".into(),
        format!("Why {name}"),
        format!(
            "The core promise of {name} for {}.",
            or_default(brief.target_audience(), "its audience")
        ),
    );
    for need in brief.needs() {
        push(
            format!("feature-{}", slugify(need)),
            need.clone(),
            format!("How {name} delivers {}.", lower_first(need)),
        );
    }
    push(
        "social-proof".into(),
        "Trusted by teams like yours".into(),
        format!(
            "Testimonials and logos from the {} space.",
            or_default(brief.industry(), "customer")
        ),
    );
    if integrations.stripe {
        push(
            "pricing".into(),
            "Pricing".into(),
            "Plans with checkout handled by Stripe.".into(),
        );
    }
    if integrations.calendar {
        push(
            "booking".into(),
            "Book a call".into(),
            "Embedded scheduler for booking time with the team.".into(),
        );
    }
    if integrations.contact_form {
        push(
            "contact".into(),
            "Get in touch".into(),
            "Contact form capturing qualified leads.".into(),
        );
    }
    push(
        "cta".into(),
        brief.primary_goal().to_string(),
        "Closing call to action repeating the primary goal.".into(),
    );

    ArchitectOutput { sitemap, sections }
}

fn unique_id(seen: &mut HashSet<String>, base: String) -> String {
    let base = if base.is_empty() || base.ends_with('-') {
        format!("{}section", base)
    } else {
        base
    };
    if seen.insert(base.clone()) {
        return base;
    }
    let mut n = 2;
    loop {
        let candidate = format!("{base}-{n}");
        if seen.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

// ---------------------------------------------------------------------------
// Copywriter
// ---------------------------------------------------------------------------

fn write_copy(brief: &BriefPayload, architect: &ArchitectOutput) -> CopywriterOutput {
    let name = brief.project_name();
    let audience = or_default(brief.target_audience(), "teams like yours");
    let goal = lower_first(brief.primary_goal());

    let headline = match brief.tone() {
        Tone::Professional => format!(
            "{name}: the {} platform built for {audience}",
            or_default(brief.industry(), "modern")
        ),
        Tone::Conversational => format!("Meet {name}, made for {audience}"),
        Tone::Playful => format!("{name} makes {goal} the fun part"),
        Tone::Technical => format!("{name}: engineered for {goal}"),
    };

    let subheading = if brief.keywords().is_empty() {
        format!("{} Built to help {audience} {goal}.", sentence(brief.brand_voice()))
    } else {
        format!(
            "{} Focused on {}.",
            sentence(brief.brand_voice()),
            brief.keywords().join(", ")
        )
    };

    let cta = if brief.integrations().calendar {
        "Book a call"
    } else if brief.integrations().stripe {
        "Get started"
    } else {
        "Get in touch"
    }
    .to_string();

    let sections = architect
        .sections
        .iter()
        .map(|plan| SectionCopy {
            id: plan.id.clone(),
            title: plan.title.clone(),
            body: format!("{} {}", plan.description, tone_closer(brief.tone(), name)),
        })
        .collect();

    let mut keywords: Vec<String> = brief.keywords().to_vec();
    if !brief.industry().is_empty() && !keywords.iter().any(|k| k == brief.industry()) {
        keywords.push(brief.industry().to_string());
    }

    let description = format!("{name} helps {audience} {goal}.");
    let json_ld = json!({
        "@context": "https://schema.org",
        "@type": "Organization",
        "name": name,
        "description": description,
        "keywords": keywords.join(", "),
    });

    CopywriterOutput {
        hero: HeroCopy {
            headline,
            subheading,
            cta,
        },
        sections,
        meta: PageMeta {
            title: if brief.industry().is_empty() {
                name.to_string()
            } else {
                format!("{name} | {}", brief.industry())
            },
            description,
            keywords,
        },
        json_ld: Some(json_ld),
    }
}

fn tone_closer(tone: Tone, name: &str) -> String {
    match tone {
        Tone::Professional => format!("{name} keeps it measurable and reliable."),
        Tone::Conversational => "No jargon, just what you need.".to_string(),
        Tone::Playful => "Seriously good, never boring.".to_string(),
        Tone::Technical => "Documented, observable, and built to scale.".to_string(),
    }
}

// ---------------------------------------------------------------------------
// Visual
// ---------------------------------------------------------------------------

/// (primary, secondary, accent, background, foreground)
type Palette = [&'static str; 5];

fn theme_palette(theme: &str) -> Palette {
    match theme.to_lowercase().as_str() {
        "futuristic" => ["#22d3ee", "#6366f1", "#f472b6", "#020617", "#e2e8f0"],
        "minimal" | "minimalist" => ["#111827", "#6b7280", "#2563eb", "#ffffff", "#111827"],
        "warm" | "organic" => ["#c2410c", "#a16207", "#15803d", "#fffbeb", "#292524"],
        "bold" | "vibrant" => ["#e11d48", "#7c3aed", "#facc15", "#0f172a", "#f8fafc"],
        "corporate" | "classic" => ["#1d4ed8", "#0f766e", "#f59e0b", "#f8fafc", "#0f172a"],
        _ => ["#0ea5e9", "#14b8a6", "#f97316", "#0b1120", "#f1f5f9"],
    }
}

fn design_visuals(brief: &BriefPayload, copywriter: &CopywriterOutput) -> VisualOutput {
    let [primary, secondary, accent, background, foreground] = theme_palette(brief.theme());
    let palette = BTreeMap::from([
        ("primary".to_string(), primary.to_string()),
        ("secondary".to_string(), secondary.to_string()),
        ("accent".to_string(), accent.to_string()),
        ("background".to_string(), background.to_string()),
        ("foreground".to_string(), foreground.to_string()),
    ]);

    let typography = match brief.tone() {
        Tone::Professional => "a crisp geometric sans",
        Tone::Conversational => "a rounded humanist sans",
        Tone::Playful => "a chunky display face with a friendly body font",
        Tone::Technical => "a grotesk paired with a monospace for data",
    };

    let design_notes = format!(
        "{} theme: {primary} leads on {background}, {accent} reserved for calls to action. \
         Set headlines in {typography}. Keep the hero headline \"{}\" dominant.",
        or_default(brief.theme(), "Default"),
        copywriter.hero.headline
    );

    let hero_prompt = format!(
        "{} hero image for {}, a {} brand. Mood: {}. Palette {primary}, {secondary}, {accent}.",
        or_default(brief.theme(), "Clean"),
        brief.project_name(),
        or_default(brief.industry(), "modern"),
        or_default(brief.brand_voice(), "confident")
    );

    VisualOutput {
        hero_image_url: None,
        hero_prompt: Some(hero_prompt),
        palette,
        design_notes,
    }
}

// ---------------------------------------------------------------------------
// Text helpers
// ---------------------------------------------------------------------------

fn or_default<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.is_empty() { fallback } else { value }
}

fn lower_first(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn sentence(text: &str) -> String {
    let trimmed = text.trim().trim_end_matches('.');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{trimmed}.")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::{StageInput, StageOutput, check_contract};
    use siteforge_shared::{Integrations, RawBrief};

    fn brief_with(integrations: Integrations, needs: &[&str]) -> BriefPayload {
        RawBrief {
            integrations,
            needs: needs.iter().map(|n| n.to_string()).collect(),
            ..RawBrief::sample()
        }
        .validate()
        .unwrap()
    }

    #[test]
    fn slugify_collapses_punctuation() {
        assert_eq!(slugify("Lead capture!"), "lead-capture");
        assert_eq!(slugify("  AI / ML  "), "ai-ml");
        assert_eq!(slugify("Lumen Analytics"), "lumen-analytics");
    }

    #[test]
    fn architect_sections_follow_needs_and_integrations() {
        let brief = brief_with(
            Integrations {
                stripe: true,
                calendar: false,
                contact_form: true,
            },
            &["Dynamic dashboard", "Lead capture"],
        );
        let plan = plan_site(&brief);
        let ids: Vec<_> = plan.sections.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(
            ids,
            [
                "hero",
                "value-proposition",
                "feature-dynamic-dashboard",
                "feature-lead-capture",
                "social-proof",
                "pricing",
                "contact",
                "cta"
            ]
        );
        assert!(plan.sitemap.contains(&"Pricing".to_string()));
        assert!(!plan.sitemap.contains(&"Book a Call".to_string()));
        assert_eq!(plan.sections[0].title, "Lumen Analytics");
        assert!(plan.sections[0].description.contains("convert demo requests"));
    }

    #[test]
    fn colliding_need_slugs_get_unique_ids() {
        let brief = brief_with(Integrations::default(), &["Blog", "blog!", "???"]);
        let plan = plan_site(&brief);
        let ids: Vec<_> = plan.sections.iter().map(|s| s.id.as_str()).collect();
        assert!(ids.contains(&"feature-blog"));
        assert!(ids.contains(&"feature-blog-2"));
        assert!(ids.contains(&"feature-section"));
    }

    #[tokio::test]
    async fn every_stage_satisfies_its_contract() {
        let generator = TemplateGenerator::default();
        let brief = brief_with(Integrations::default(), &["Newsletter"]);

        let architect = generator.architect(&brief).await.unwrap();
        let input = StageInput::Architect { brief: &brief };
        check_contract(&input, &StageOutput::Architect(architect.clone())).unwrap();

        let copy = generator.copywriter(&brief, &architect).await.unwrap();
        let input = StageInput::Copywriter {
            brief: &brief,
            architect: &architect,
        };
        check_contract(&input, &StageOutput::Copywriter(copy.clone())).unwrap();

        let visual = generator.visual(&brief, &copy).await.unwrap();
        assert!(visual.missing_palette_roles().is_empty());
        assert!(visual.hero_image_url.is_none());

        let integration = generator.integration(&brief, &copy, &visual).await.unwrap();
        let input = StageInput::Integration {
            brief: &brief,
            copywriter: &copy,
            visual: &visual,
        };
        check_contract(&input, &StageOutput::Integration(integration)).unwrap();
    }

    #[tokio::test]
    async fn integration_gates_on_flags() {
        let generator =
            TemplateGenerator::new(Url::parse("https://book.example.com/team/").unwrap());
        let brief = brief_with(
            Integrations {
                stripe: false,
                calendar: true,
                contact_form: false,
            },
            &[],
        );
        let architect = plan_site(&brief);
        let copy = write_copy(&brief, &architect);
        let visual = design_visuals(&brief, &copy);
        let out = generator.integration(&brief, &copy, &visual).await.unwrap();

        assert!(out.stripe_product_id.is_none());
        assert!(out.stripe_price_id.is_none());
        assert_eq!(
            out.booking.unwrap().url.as_str(),
            "https://book.example.com/team/lumen-analytics"
        );
        let labels: Vec<_> = out.contact_form.fields.iter().map(|f| f.label.as_str()).collect();
        assert_eq!(labels, ["Name", "Email"]);
        assert!(out.contact_form.fields.iter().all(|f| f.required));
    }

    #[test]
    fn full_contact_form_requires_name_email_message() {
        let brief = brief_with(
            Integrations {
                stripe: false,
                calendar: true,
                contact_form: true,
            },
            &[],
        );
        let fields = contact_form_fields(&brief);
        let required: Vec<_> = fields
            .iter()
            .filter(|f| f.required)
            .map(|f| f.label.as_str())
            .collect();
        assert_eq!(required, ["Name", "Email", "Message"]);
        assert!(fields.iter().any(|f| f.label == "Preferred meeting time"));
    }

    #[test]
    fn copy_meta_includes_industry_keyword_once() {
        let brief = RawBrief {
            keywords: vec!["SaaS".into(), "AI".into()],
            ..RawBrief::sample()
        }
        .validate()
        .unwrap();
        let copy = write_copy(&brief, &plan_site(&brief));
        assert_eq!(copy.meta.keywords, ["SaaS", "AI"]);
        assert_eq!(copy.meta.title, "Lumen Analytics | SaaS");
        assert_eq!(copy.hero.cta, "Book a call");
        assert!(copy.json_ld.is_some());
    }

    #[test]
    fn unknown_theme_uses_default_palette() {
        let brief = RawBrief {
            theme: "Steampunk".into(),
            ..RawBrief::sample()
        }
        .validate()
        .unwrap();
        let copy = write_copy(&brief, &plan_site(&brief));
        let visual = design_visuals(&brief, &copy);
        assert_eq!(visual.palette["primary"], "#0ea5e9");
        assert!(visual.design_notes.contains("Steampunk"));
    }
}
