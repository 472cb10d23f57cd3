//! Shared types, error model, and configuration for SiteForge.
//!
//! This crate is the foundation depended on by all other SiteForge crates.
//! It provides:
//! - [`SiteForgeError`], the unified error type
//! - The brief ([`RawBrief`], [`BriefPayload`]) and its validation
//! - Stage output types ([`ArchitectOutput`], [`CopywriterOutput`], ...) and [`AggregateResult`]
//! - Configuration ([`AppConfig`], [`RetryConfig`], config loading)

pub mod brief;
pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use brief::{BriefPayload, Integrations, MIN_PROJECT_NAME_LEN, RawBrief, Tone};
pub use config::{
    AppConfig, CalendarConfig, DefaultsConfig, OpenRouterConfig, RetryConfig, RetryOverride,
    RetrySettings, StripeConfig, config_dir, config_file_path, init_config, load_config,
    load_config_from, read_api_key, validate_api_key,
};
pub use error::{Result, SiteForgeError};
pub use types::{
    AggregateResult, ArchitectOutput, Booking, ContactForm, CopywriterOutput, FormField,
    HeroCopy, IntegrationOutput, PageMeta, REQUIRED_PALETTE_ROLES, RunId, SectionCopy,
    SectionPlan, VisualOutput,
};
