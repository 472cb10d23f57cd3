//! Generation pipeline for SiteForge.
//!
//! A validated brief flows through four stages (architect, copywriter,
//! visual, integration) in a fixed order. Each stage is delegated to a
//! [`Generator`] and wrapped by the [`executor`] for timeouts, bounded retry,
//! and cancellation. The [`pipeline`] module sequences the stages and records
//! progress in a [`ledger`] that observers can read but never write.

pub mod executor;
pub mod ledger;
pub mod pipeline;
pub mod stage;
pub mod template;

pub use executor::{RetryPolicy, StageError, StageErrorKind, execute};
pub use ledger::{AgentTask, Ledger, LedgerObserver, SavedLedger, TaskStatus};
pub use pipeline::{
    Orchestrator, PipelineError, PipelineErrorKind, PipelinePolicy, PipelineRun, run_pipeline,
};
pub use stage::{
    FailureClass, Generator, StageFailure, StageInput, StageKind, StageOutput, check_contract,
    invoke,
};
pub use template::{TemplateGenerator, booking_url, contact_form_fields, slugify};
