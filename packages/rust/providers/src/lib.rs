//! Network-backed generation for SiteForge.
//!
//! - [`ChatClient`] talks to an OpenAI-compatible chat completions endpoint
//!   (OpenRouter by default) and decodes JSON answers.
//! - [`StripeClient`] creates the product and price for briefs that ask for payments.
//! - [`OpenRouterGenerator`] wires both into the core `Generator` trait.

mod http;
pub mod generator;
pub mod openrouter;
pub mod prompts;
pub mod stripe;

pub use generator::OpenRouterGenerator;
pub use openrouter::{ChatClient, ChatParams, extract_json};
pub use stripe::{StripeClient, StripeOffer};
