//! Minimal Stripe client: one product and one price per brief.

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use siteforge_core::StageFailure;
use siteforge_shared::{BriefPayload, Result, StripeConfig, read_api_key};

use crate::http::{build_client, check_status, failure_for_error};

const PROVIDER: &str = "stripe";

/// Identifiers of the created catalog entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StripeOffer {
    pub product_id: String,
    pub price_id: String,
}

#[derive(Debug, Clone)]
pub struct StripeClient {
    http: Client,
    base_url: String,
    api_key: String,
    currency: String,
    unit_amount: u64,
}

#[derive(Debug, Deserialize)]
struct CreatedObject {
    id: String,
}

impl StripeClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        currency: impl Into<String>,
        unit_amount: u64,
    ) -> Result<Self> {
        Ok(Self {
            http: build_client(Duration::from_secs(30))?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            currency: currency.into(),
            unit_amount,
        })
    }

    /// Build from `[stripe]` config, reading the secret key from its env var.
    pub fn from_config(config: &StripeConfig) -> Result<Self> {
        let api_key = read_api_key(&config.api_key_env, "Stripe")?;
        Self::new(
            config.base_url.clone(),
            api_key,
            config.currency.clone(),
            config.unit_amount,
        )
    }

    /// Create the product and its price.
    ///
    /// Both requests carry idempotency keys derived from the brief, so
    /// retrying an attempt for the same brief never creates duplicates.
    pub async fn create_offer(
        &self,
        brief: &BriefPayload,
    ) -> std::result::Result<StripeOffer, StageFailure> {
        let key = idempotency_key(brief, &self.currency, self.unit_amount);
        let description = if brief.primary_goal().is_empty() {
            format!("{} subscription", brief.project_name())
        } else {
            format!("{}: {}", brief.project_name(), brief.primary_goal())
        };

        let product = self
            .post(
                "products",
                &format!("{key}-product"),
                &[
                    ("name", brief.project_name().to_string()),
                    ("description", description),
                    ("metadata[source]", "siteforge".to_string()),
                ],
            )
            .await?;
        debug!(product_id = %product.id, "stripe product created");

        let price = self
            .post(
                "prices",
                &format!("{key}-price"),
                &[
                    ("product", product.id.clone()),
                    ("currency", self.currency.clone()),
                    ("unit_amount", self.unit_amount.to_string()),
                    ("recurring[interval]", "month".to_string()),
                ],
            )
            .await?;

        info!(product_id = %product.id, price_id = %price.id, "stripe offer ready");
        Ok(StripeOffer {
            product_id: product.id,
            price_id: price.id,
        })
    }

    async fn post(
        &self,
        resource: &str,
        idempotency_key: &str,
        form: &[(&str, String)],
    ) -> std::result::Result<CreatedObject, StageFailure> {
        let response = self
            .http
            .post(format!("{}/{resource}", self.base_url))
            .bearer_auth(&self.api_key)
            .header("Idempotency-Key", idempotency_key)
            .form(form)
            .send()
            .await
            .map_err(|e| failure_for_error(PROVIDER, &e))?;
        let response = check_status(PROVIDER, response).await?;
        response.json().await.map_err(|e| {
            StageFailure::transient(format!(
                "{PROVIDER} {resource} response could not be decoded: {e}"
            ))
        })
    }
}

/// Stable key for one offer: same brief and price, same key. A changed price
/// gets a fresh key instead of colliding with the earlier request.
fn idempotency_key(brief: &BriefPayload, currency: &str, unit_amount: u64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(brief.digest().as_bytes());
    hasher.update(format!("|{}|{unit_amount}", currency.to_lowercase()).as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    format!("siteforge-{}", &digest[..32])
}
