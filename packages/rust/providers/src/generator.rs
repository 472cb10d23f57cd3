//! [`Generator`] backed by a chat model, Stripe, and a booking host.

use async_trait::async_trait;
use tracing::{debug, instrument, warn};
use url::Url;

use siteforge_core::{Generator, StageFailure, booking_url, contact_form_fields};
use siteforge_shared::{
    AppConfig, ArchitectOutput, Booking, BriefPayload, ContactForm, CopywriterOutput,
    IntegrationOutput, Result, SiteForgeError, VisualOutput,
};

use crate::openrouter::ChatClient;
use crate::prompts;
use crate::stripe::StripeClient;

pub struct OpenRouterGenerator {
    chat: ChatClient,
    stripe: Option<StripeClient>,
    booking_base_url: Url,
}

impl OpenRouterGenerator {
    pub fn new(chat: ChatClient, stripe: Option<StripeClient>, booking_base_url: Url) -> Self {
        Self {
            chat,
            stripe,
            booking_base_url,
        }
    }

    /// Build from the app config. The OpenRouter key is required; the Stripe
    /// key is optional and only needed for briefs that request payments.
    pub fn from_config(config: &AppConfig, model: Option<&str>) -> Result<Self> {
        let chat = ChatClient::from_config(&config.openrouter, model)?;

        let stripe = match StripeClient::from_config(&config.stripe) {
            Ok(client) => Some(client),
            Err(SiteForgeError::Config { message }) => {
                debug!(%message, "stripe disabled");
                None
            }
            Err(e) => return Err(e),
        };

        let booking_base_url = Url::parse(&config.calendar.booking_base_url).map_err(|e| {
            SiteForgeError::config(format!(
                "calendar.booking_base_url '{}' is not a valid URL: {e}",
                config.calendar.booking_base_url
            ))
        })?;

        Ok(Self::new(chat, stripe, booking_base_url))
    }
}

#[async_trait]
impl Generator for OpenRouterGenerator {
    fn name(&self) -> &str {
        "openrouter"
    }

    #[instrument(skip_all, fields(model = %self.chat.model()))]
    async fn architect(
        &self,
        brief: &BriefPayload,
    ) -> std::result::Result<ArchitectOutput, StageFailure> {
        let prompt = prompts::architect(brief);
        self.chat.complete_json(&prompt.system, &prompt.user).await
    }

    #[instrument(skip_all, fields(model = %self.chat.model()))]
    async fn copywriter(
        &self,
        brief: &BriefPayload,
        architect: &ArchitectOutput,
    ) -> std::result::Result<CopywriterOutput, StageFailure> {
        let prompt = prompts::copywriter(brief, architect);
        self.chat.complete_json(&prompt.system, &prompt.user).await
    }

    #[instrument(skip_all, fields(model = %self.chat.model()))]
    async fn visual(
        &self,
        brief: &BriefPayload,
        copywriter: &CopywriterOutput,
    ) -> std::result::Result<VisualOutput, StageFailure> {
        let prompt = prompts::visual(brief, copywriter);
        self.chat.complete_json(&prompt.system, &prompt.user).await
    }

    #[instrument(skip_all)]
    async fn integration(
        &self,
        brief: &BriefPayload,
        _copywriter: &CopywriterOutput,
        _visual: &VisualOutput,
    ) -> std::result::Result<IntegrationOutput, StageFailure> {
        let integrations = brief.integrations();

        let (stripe_product_id, stripe_price_id) = if integrations.stripe {
            let Some(stripe) = &self.stripe else {
                warn!("stripe requested but no stripe key is configured");
                return Err(StageFailure::rejected(
                    "stripe integration requested but no Stripe secret key is configured",
                ));
            };
            let offer = stripe.create_offer(brief).await?;
            (Some(offer.product_id), Some(offer.price_id))
        } else {
            (None, None)
        };

        let booking = if integrations.calendar {
            Some(Booking {
                url: booking_url(&self.booking_base_url, brief)?,
            })
        } else {
            None
        };

        Ok(IntegrationOutput {
            stripe_product_id,
            stripe_price_id,
            booking,
            contact_form: ContactForm {
                fields: contact_form_fields(brief),
            },
        })
    }
}
