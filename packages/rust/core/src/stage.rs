//! Stage identities, stage I/O, and the pluggable [`Generator`] seam.
//!
//! The four stages form a closed set. Each has its own input composition and
//! output type; the orchestrator selects the composition by matching on
//! [`StageKind`], and [`invoke`] dispatches to the matching generator method.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use siteforge_shared::{
    ArchitectOutput, BriefPayload, CopywriterOutput, IntegrationOutput, SiteForgeError,
    VisualOutput,
};

// ---------------------------------------------------------------------------
// StageKind
// ---------------------------------------------------------------------------

/// One of the four ordered generation stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Architect,
    Copywriter,
    Visual,
    Integration,
}

impl StageKind {
    /// Fixed execution order.
    pub const ORDER: [StageKind; 4] = [
        StageKind::Architect,
        StageKind::Copywriter,
        StageKind::Visual,
        StageKind::Integration,
    ];

    /// Stable id used in ledgers, config keys, and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Architect => "architect",
            Self::Copywriter => "copywriter",
            Self::Visual => "visual",
            Self::Integration => "integration",
        }
    }

    /// Display title for progress views.
    pub fn title(&self) -> &'static str {
        match self {
            Self::Architect => "Architect Agent",
            Self::Copywriter => "Copywriter Agent",
            Self::Visual => "Visual Agent",
            Self::Integration => "Integration Agent",
        }
    }

    /// One-line summary of what the stage produces.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Architect => "Sitemap and section definition",
            Self::Copywriter => "SEO copy, meta, and JSON-LD",
            Self::Visual => "Palette, hero prompt, and imagery",
            Self::Integration => "Stripe, booking, and contact flows",
        }
    }

    /// Position in [`StageKind::ORDER`].
    pub fn index(&self) -> usize {
        match self {
            Self::Architect => 0,
            Self::Copywriter => 1,
            Self::Visual => 2,
            Self::Integration => 3,
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StageKind {
    type Err = SiteForgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ORDER
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| SiteForgeError::config(format!("unknown stage '{s}'")))
    }
}

// ---------------------------------------------------------------------------
// Failures
// ---------------------------------------------------------------------------

/// How a single failed attempt should be treated by the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    /// Transient external-service error; worth another attempt.
    Transient,
    /// The attempt ran out of time; worth another attempt.
    Timeout,
    /// Permanent rejection or invalid input; retrying cannot help.
    Rejected,
}

/// A classified failure reported by one stage attempt.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct StageFailure {
    pub class: FailureClass,
    pub message: String,
}

impl StageFailure {
    pub fn transient(msg: impl Into<String>) -> Self {
        Self {
            class: FailureClass::Transient,
            message: msg.into(),
        }
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self {
            class: FailureClass::Timeout,
            message: msg.into(),
        }
    }

    pub fn rejected(msg: impl Into<String>) -> Self {
        Self {
            class: FailureClass::Rejected,
            message: msg.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        !matches!(self.class, FailureClass::Rejected)
    }
}

// ---------------------------------------------------------------------------
// Stage I/O
// ---------------------------------------------------------------------------

/// The composed input for one stage: the brief plus whichever prior outputs it consumes.
#[derive(Debug, Clone, Copy)]
pub enum StageInput<'a> {
    Architect {
        brief: &'a BriefPayload,
    },
    Copywriter {
        brief: &'a BriefPayload,
        architect: &'a ArchitectOutput,
    },
    Visual {
        brief: &'a BriefPayload,
        copywriter: &'a CopywriterOutput,
    },
    Integration {
        brief: &'a BriefPayload,
        copywriter: &'a CopywriterOutput,
        visual: &'a VisualOutput,
    },
}

impl StageInput<'_> {
    pub fn kind(&self) -> StageKind {
        match self {
            Self::Architect { .. } => StageKind::Architect,
            Self::Copywriter { .. } => StageKind::Copywriter,
            Self::Visual { .. } => StageKind::Visual,
            Self::Integration { .. } => StageKind::Integration,
        }
    }
}

/// The structured output of one stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StageOutput {
    Architect(ArchitectOutput),
    Copywriter(CopywriterOutput),
    Visual(VisualOutput),
    Integration(IntegrationOutput),
}

impl StageOutput {
    pub fn kind(&self) -> StageKind {
        match self {
            Self::Architect(_) => StageKind::Architect,
            Self::Copywriter(_) => StageKind::Copywriter,
            Self::Visual(_) => StageKind::Visual,
            Self::Integration(_) => StageKind::Integration,
        }
    }
}

// ---------------------------------------------------------------------------
// Generator
// ---------------------------------------------------------------------------

/// A generation backend: one method per stage, each a function of its declared input.
///
/// Implementations report failures as [`StageFailure`]s; retrying, timeouts, and
/// cancellation are applied around them by the executor.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Human-readable backend name for tracing.
    fn name(&self) -> &str;

    async fn architect(&self, brief: &BriefPayload) -> Result<ArchitectOutput, StageFailure>;

    async fn copywriter(
        &self,
        brief: &BriefPayload,
        architect: &ArchitectOutput,
    ) -> Result<CopywriterOutput, StageFailure>;

    async fn visual(
        &self,
        brief: &BriefPayload,
        copywriter: &CopywriterOutput,
    ) -> Result<VisualOutput, StageFailure>;

    async fn integration(
        &self,
        brief: &BriefPayload,
        copywriter: &CopywriterOutput,
        visual: &VisualOutput,
    ) -> Result<IntegrationOutput, StageFailure>;
}

/// Dispatch one stage input to the matching generator method.
pub async fn invoke(
    generator: &dyn Generator,
    input: &StageInput<'_>,
) -> Result<StageOutput, StageFailure> {
    match *input {
        StageInput::Architect { brief } => {
            generator.architect(brief).await.map(StageOutput::Architect)
        }
        StageInput::Copywriter { brief, architect } => generator
            .copywriter(brief, architect)
            .await
            .map(StageOutput::Copywriter),
        StageInput::Visual { brief, copywriter } => generator
            .visual(brief, copywriter)
            .await
            .map(StageOutput::Visual),
        StageInput::Integration {
            brief,
            copywriter,
            visual,
        } => generator
            .integration(brief, copywriter, visual)
            .await
            .map(StageOutput::Integration),
    }
}

// ---------------------------------------------------------------------------
// Output contracts
// ---------------------------------------------------------------------------

/// Check a stage output against the contract implied by its input.
///
/// Shape problems are reported as transient (a fresh attempt may produce a
/// well-formed answer); integration gating violations are rejections.
pub fn check_contract(input: &StageInput<'_>, output: &StageOutput) -> Result<(), StageFailure> {
    match (input, output) {
        (StageInput::Architect { .. }, StageOutput::Architect(out)) => check_architect(out),
        (StageInput::Copywriter { architect, .. }, StageOutput::Copywriter(out)) => {
            check_copywriter(architect, out)
        }
        (StageInput::Visual { .. }, StageOutput::Visual(out)) => check_visual(out),
        (StageInput::Integration { brief, .. }, StageOutput::Integration(out)) => {
            check_integration(brief, out)
        }
        (input, output) => Err(StageFailure::rejected(format!(
            "{} stage produced a {} output",
            input.kind(),
            output.kind()
        ))),
    }
}

fn check_architect(out: &ArchitectOutput) -> Result<(), StageFailure> {
    if out.sections.is_empty() {
        return Err(StageFailure::transient("architect produced no sections"));
    }
    let mut seen = HashSet::new();
    for section in &out.sections {
        if section.id.trim().is_empty() {
            return Err(StageFailure::transient("architect produced a section without an id"));
        }
        if !seen.insert(section.id.as_str()) {
            return Err(StageFailure::transient(format!(
                "architect produced duplicate section id '{}'",
                section.id
            )));
        }
    }
    Ok(())
}

fn check_copywriter(
    architect: &ArchitectOutput,
    out: &CopywriterOutput,
) -> Result<(), StageFailure> {
    if out.sections.len() != architect.sections.len() {
        return Err(StageFailure::transient(format!(
            "copywriter wrote {} sections for {} planned",
            out.sections.len(),
            architect.sections.len()
        )));
    }
    for (i, (plan, copy)) in architect.sections.iter().zip(&out.sections).enumerate() {
        if plan.id != copy.id {
            return Err(StageFailure::transient(format!(
                "copywriter section {i} has id '{}', expected '{}'",
                copy.id, plan.id
            )));
        }
    }
    Ok(())
}

fn check_visual(out: &VisualOutput) -> Result<(), StageFailure> {
    let missing = out.missing_palette_roles();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(StageFailure::transient(format!(
            "palette is missing roles: {}",
            missing.join(", ")
        )))
    }
}

/// Contact form fields that must be present and marked required.
const REQUIRED_FORM_FIELDS: [&str; 2] = ["Name", "Email"];

fn check_integration(brief: &BriefPayload, out: &IntegrationOutput) -> Result<(), StageFailure> {
    let integrations = brief.integrations();
    if !integrations.stripe && (out.stripe_product_id.is_some() || out.stripe_price_id.is_some())
    {
        return Err(StageFailure::rejected(
            "stripe identifiers returned although stripe was not requested",
        ));
    }
    if !integrations.calendar && out.booking.is_some() {
        return Err(StageFailure::rejected(
            "booking returned although calendar was not requested",
        ));
    }
    if out.contact_form.fields.is_empty() {
        return Err(StageFailure::transient("contact form has no fields"));
    }
    for label in REQUIRED_FORM_FIELDS {
        let present = out
            .contact_form
            .fields
            .iter()
            .any(|f| f.required && f.label.trim().eq_ignore_ascii_case(label));
        if !present {
            return Err(StageFailure::transient(format!(
                "contact form lacks a required {label} field"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use siteforge_shared::{
        ContactForm, FormField, HeroCopy, Integrations, PageMeta, RawBrief, SectionCopy,
        SectionPlan,
    };

    fn brief(integrations: Integrations) -> BriefPayload {
        RawBrief {
            integrations,
            ..RawBrief::sample()
        }
        .validate()
        .unwrap()
    }

    fn architect(ids: &[&str]) -> ArchitectOutput {
        ArchitectOutput {
            sitemap: vec!["Home".into()],
            sections: ids
                .iter()
                .map(|id| SectionPlan {
                    id: (*id).into(),
                    title: id.to_uppercase(),
                    description: String::new(),
                })
                .collect(),
        }
    }

    fn copy(ids: &[&str]) -> CopywriterOutput {
        CopywriterOutput {
            hero: HeroCopy {
                headline: "h".into(),
                subheading: "s".into(),
                cta: "c".into(),
            },
            sections: ids
                .iter()
                .map(|id| SectionCopy {
                    id: (*id).into(),
                    title: String::new(),
                    body: String::new(),
                })
                .collect(),
            meta: PageMeta {
                title: "t".into(),
                description: "d".into(),
                keywords: vec![],
            },
            json_ld: None,
        }
    }

    #[test]
    fn stage_kind_parses_and_orders() {
        assert_eq!("visual".parse::<StageKind>().unwrap(), StageKind::Visual);
        assert!("designer".parse::<StageKind>().is_err());
        for (i, kind) in StageKind::ORDER.iter().enumerate() {
            assert_eq!(kind.index(), i);
        }
    }

    #[test]
    fn copywriter_sections_must_pair_with_plan() {
        let b = brief(Integrations::default());
        let plan = architect(&["hero", "features"]);
        let input = StageInput::Copywriter {
            brief: &b,
            architect: &plan,
        };

        let ok = StageOutput::Copywriter(copy(&["hero", "features"]));
        assert!(check_contract(&input, &ok).is_ok());

        let swapped = StageOutput::Copywriter(copy(&["features", "hero"]));
        let err = check_contract(&input, &swapped).unwrap_err();
        assert_eq!(err.class, FailureClass::Transient);

        let short = StageOutput::Copywriter(copy(&["hero"]));
        assert!(check_contract(&input, &short).is_err());
    }

    #[test]
    fn duplicate_architect_ids_fail() {
        let b = brief(Integrations::default());
        let input = StageInput::Architect { brief: &b };
        let out = StageOutput::Architect(architect(&["hero", "hero"]));
        assert!(check_contract(&input, &out).is_err());
    }

    #[test]
    fn unrequested_stripe_ids_are_rejected() {
        let b = brief(Integrations {
            stripe: false,
            calendar: false,
            contact_form: true,
        });
        let c = copy(&["hero"]);
        let v = VisualOutput {
            hero_image_url: None,
            hero_prompt: None,
            palette: Default::default(),
            design_notes: String::new(),
        };
        let input = StageInput::Integration {
            brief: &b,
            copywriter: &c,
            visual: &v,
        };
        let out = StageOutput::Integration(IntegrationOutput {
            stripe_product_id: Some("prod_123".into()),
            stripe_price_id: None,
            booking: None,
            contact_form: form(&[("Name", true), ("Email", true)]),
        });
        let err = check_contract(&input, &out).unwrap_err();
        assert_eq!(err.class, FailureClass::Rejected);
        assert!(!err.is_retryable());
    }

    fn form(fields: &[(&str, bool)]) -> ContactForm {
        ContactForm {
            fields: fields
                .iter()
                .map(|(label, required)| FormField {
                    label: (*label).into(),
                    required: *required,
                })
                .collect(),
        }
    }

    #[test]
    fn contact_form_needs_required_name_and_email() {
        let b = brief(Integrations::default());
        let c = copy(&["hero"]);
        let v = VisualOutput {
            hero_image_url: None,
            hero_prompt: None,
            palette: Default::default(),
            design_notes: String::new(),
        };
        let input = StageInput::Integration {
            brief: &b,
            copywriter: &c,
            visual: &v,
        };
        let with_form = |contact_form| {
            StageOutput::Integration(IntegrationOutput {
                stripe_product_id: None,
                stripe_price_id: None,
                booking: None,
                contact_form,
            })
        };

        let ok = with_form(form(&[("Name", true), ("email", true), ("Message", false)]));
        assert!(check_contract(&input, &ok).is_ok());

        let no_email = with_form(form(&[("Name", true), ("Message", true)]));
        let err = check_contract(&input, &no_email).unwrap_err();
        assert_eq!(err.class, FailureClass::Transient);
        assert!(err.message.contains("Email"));

        let optional_email = with_form(form(&[("Name", true), ("Email", false)]));
        assert!(check_contract(&input, &optional_email).is_err());
    }

    #[test]
    fn mismatched_output_kind_is_rejected() {
        let b = brief(Integrations::default());
        let input = StageInput::Architect { brief: &b };
        let out = StageOutput::Copywriter(copy(&["hero"]));
        let err = check_contract(&input, &out).unwrap_err();
        assert!(err.message.contains("architect stage produced a copywriter output"));
    }
}
