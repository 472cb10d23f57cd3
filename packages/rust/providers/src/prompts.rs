//! Prompt builders for the model-backed stages.
//!
//! Every prompt embeds the exact stage input as JSON and pins the answer to a
//! single JSON object whose shape matches the stage output type.

use serde::Serialize;
use serde_json::json;

use siteforge_shared::{ArchitectOutput, BriefPayload, CopywriterOutput, REQUIRED_PALETTE_ROLES};

/// A system + user message pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

const JSON_ONLY: &str = "Respond with a single JSON object and nothing else. No Markdown fences.";

pub fn architect(brief: &BriefPayload) -> Prompt {
    Prompt {
        system: format!(
            "You are the information architect of a marketing-site studio. \
             Plan the sitemap and the landing page sections for the brief. {JSON_ONLY}"
        ),
        user: format!(
            "Brief:\n{}\n\n\
             Answer shape: {{\"sitemap\": [string], \"sections\": [{{\"id\": string, \"title\": string, \"description\": string}}]}}\n\
             Rules: section ids are unique lowercase slugs; include one section per need; \
             include a pricing section only if integrations.stripe is true and a booking \
             section only if integrations.calendar is true.",
            to_json(brief)
        ),
    }
}

pub fn copywriter(brief: &BriefPayload, architect: &ArchitectOutput) -> Prompt {
    let ids: Vec<&str> = architect.sections.iter().map(|s| s.id.as_str()).collect();
    Prompt {
        system: format!(
            "You are a senior conversion copywriter. Write in a {} tone using the brand voice \
             from the brief, and optimise for search. {JSON_ONLY}",
            brief.tone().as_str().to_lowercase()
        ),
        user: format!(
            "Brief:\n{}\n\nSection plan:\n{}\n\n\
             Answer shape: {{\"hero\": {{\"headline\": string, \"subheading\": string, \"cta\": string}}, \
             \"sections\": [{{\"id\": string, \"title\": string, \"body\": string}}], \
             \"meta\": {{\"title\": string, \"description\": string, \"keywords\": [string]}}, \
             \"jsonLd\": object}}\n\
             Rules: write exactly one section per planned section, in this order of ids: {}. \
             jsonLd is schema.org Organization markup.",
            to_json(brief),
            to_json(architect),
            serde_json::to_string(&ids).unwrap_or_default()
        ),
    }
}

pub fn visual(brief: &BriefPayload, copywriter: &CopywriterOutput) -> Prompt {
    let input = json!({
        "projectName": brief.project_name(),
        "industry": brief.industry(),
        "theme": brief.theme(),
        "brandVoice": brief.brand_voice(),
        "hero": copywriter.hero,
    });
    Prompt {
        system: format!(
            "You are an art director. Choose a color palette and describe the hero visual. {JSON_ONLY}"
        ),
        user: format!(
            "Input:\n{}\n\n\
             Answer shape: {{\"palette\": {{role: css color}}, \"heroPrompt\": string, \"designNotes\": string}}\n\
             Rules: palette must define at least the roles {}; heroPrompt is a prompt for an \
             image model.",
            to_json(&input),
            REQUIRED_PALETTE_ROLES.join(", ")
        ),
    }
}

fn to_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use siteforge_core::TemplateGenerator;
    use siteforge_core::Generator;
    use siteforge_shared::RawBrief;

    #[test]
    fn architect_prompt_embeds_brief() {
        let brief = RawBrief::sample().validate().unwrap();
        let prompt = architect(&brief);
        assert!(prompt.user.contains("\"projectName\": \"Lumen Analytics\""));
        assert!(prompt.system.contains("single JSON object"));
    }

    #[tokio::test]
    async fn copywriter_prompt_lists_section_ids_in_order() {
        let brief = RawBrief::sample().validate().unwrap();
        let plan = TemplateGenerator::default().architect(&brief).await.unwrap();
        let prompt = copywriter(&brief, &plan);
        assert!(prompt.user.contains(r#"["hero","value-proposition","#));
        assert!(prompt.system.contains("professional tone"));
    }
}
