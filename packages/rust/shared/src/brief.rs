//! The business brief: raw wire shape, validation, and the normalized payload.
//!
//! A [`BriefPayload`] can only be produced by validating a [`RawBrief`], so every
//! payload handed to the pipeline already satisfies the brief invariants
//! (trimmed project name of at least two characters, known tone, de-duplicated
//! keyword and need lists).

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Result, SiteForgeError};

/// Minimum length of a project name, in characters, after trimming.
pub const MIN_PROJECT_NAME_LEN: usize = 2;

// ---------------------------------------------------------------------------
// Tone
// ---------------------------------------------------------------------------

/// Voice the copy is written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tone {
    Professional,
    Conversational,
    Playful,
    Technical,
}

impl Tone {
    /// All accepted tones, in display order.
    pub const ALL: [Tone; 4] = [
        Tone::Professional,
        Tone::Conversational,
        Tone::Playful,
        Tone::Technical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Professional => "Professional",
            Self::Conversational => "Conversational",
            Self::Playful => "Playful",
            Self::Technical => "Technical",
        }
    }
}

impl fmt::Display for Tone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tone {
    type Err = SiteForgeError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|tone| tone.as_str() == s.trim())
            .ok_or_else(|| {
                SiteForgeError::invalid_brief(format!(
                    "tone '{s}' is not one of Professional, Conversational, Playful, Technical"
                ))
            })
    }
}

// ---------------------------------------------------------------------------
// Integrations
// ---------------------------------------------------------------------------

/// Which integrations the generated site should wire up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Integrations {
    #[serde(default)]
    pub stripe: bool,
    #[serde(default)]
    pub calendar: bool,
    #[serde(default = "default_true")]
    pub contact_form: bool,
}

impl Default for Integrations {
    fn default() -> Self {
        Self {
            stripe: false,
            calendar: false,
            contact_form: true,
        }
    }
}

fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// RawBrief
// ---------------------------------------------------------------------------

/// A brief exactly as submitted by a caller (JSON or TOML), before validation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawBrief {
    pub project_name: String,
    pub industry: String,
    pub theme: String,
    pub tone: String,
    pub target_audience: String,
    pub primary_goal: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    pub brand_voice: String,
    #[serde(default)]
    pub needs: Vec<String>,
    #[serde(default)]
    pub integrations: Integrations,
}

impl RawBrief {
    /// The brief pre-filled in the original forge form; handy for demos.
    pub fn sample() -> Self {
        Self {
            project_name: "Lumen Analytics".into(),
            industry: "SaaS".into(),
            theme: "Futuristic".into(),
            tone: "Professional".into(),
            target_audience: "Growth-stage revenue teams".into(),
            primary_goal: "Convert demo requests".into(),
            keywords: vec!["AI analytics".into(), "predictive insights".into()],
            brand_voice: "Bold, data-driven, visionary storytelling".into(),
            needs: vec!["Dynamic dashboard".into(), "Lead capture".into()],
            integrations: Integrations {
                stripe: true,
                calendar: true,
                contact_form: true,
            },
        }
    }

    /// Validate and normalize into a [`BriefPayload`].
    pub fn validate(self) -> Result<BriefPayload> {
        BriefPayload::try_from(self)
    }
}

// ---------------------------------------------------------------------------
// BriefPayload
// ---------------------------------------------------------------------------

/// A validated, normalized brief. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawBrief")]
pub struct BriefPayload {
    project_name: String,
    industry: String,
    theme: String,
    tone: Tone,
    target_audience: String,
    primary_goal: String,
    keywords: Vec<String>,
    brand_voice: String,
    needs: Vec<String>,
    integrations: Integrations,
}

impl TryFrom<RawBrief> for BriefPayload {
    type Error = SiteForgeError;

    fn try_from(raw: RawBrief) -> Result<Self> {
        let project_name = raw.project_name.trim().to_string();
        if project_name.chars().count() < MIN_PROJECT_NAME_LEN {
            return Err(SiteForgeError::invalid_brief(format!(
                "projectName must be at least {MIN_PROJECT_NAME_LEN} characters"
            )));
        }

        let tone: Tone = raw.tone.parse()?;

        Ok(Self {
            project_name,
            industry: raw.industry.trim().to_string(),
            theme: raw.theme.trim().to_string(),
            tone,
            target_audience: raw.target_audience.trim().to_string(),
            primary_goal: raw.primary_goal.trim().to_string(),
            keywords: dedupe(raw.keywords),
            brand_voice: raw.brand_voice.trim().to_string(),
            needs: dedupe(raw.needs),
            integrations: raw.integrations,
        })
    }
}

impl BriefPayload {
    pub fn project_name(&self) -> &str {
        &self.project_name
    }

    pub fn industry(&self) -> &str {
        &self.industry
    }

    pub fn theme(&self) -> &str {
        &self.theme
    }

    pub fn tone(&self) -> Tone {
        self.tone
    }

    pub fn target_audience(&self) -> &str {
        &self.target_audience
    }

    pub fn primary_goal(&self) -> &str {
        &self.primary_goal
    }

    /// Unique keywords in order of first appearance.
    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    pub fn brand_voice(&self) -> &str {
        &self.brand_voice
    }

    /// Unique needs in order of first appearance.
    pub fn needs(&self) -> &[String] {
        &self.needs
    }

    pub fn integrations(&self) -> Integrations {
        self.integrations
    }

    /// Lowercase hex SHA-256 of the normalized brief. Briefs that normalize to
    /// the same payload share a digest.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(serde_json::to_vec(self).unwrap_or_default());
        format!("{:x}", hasher.finalize())
    }
}

/// Trim entries, drop blanks, and keep only the first occurrence of each.
fn dedupe(items: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .filter(|item| seen.insert(item.clone()))
        .collect()
}
