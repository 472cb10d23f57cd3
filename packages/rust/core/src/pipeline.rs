//! Pipeline orchestrator: Architect → Copywriter → Visual → Integration.
//!
//! An [`Orchestrator`] hands out [`PipelineRun`]s. A run owns its ledger and
//! cancellation token, executes the stages strictly in order, and resolves to
//! either a complete [`AggregateResult`] or exactly one [`PipelineError`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use siteforge_shared::{
    AggregateResult, ArchitectOutput, BriefPayload, CopywriterOutput, IntegrationOutput,
    RetrySettings, RunId, SiteForgeError, VisualOutput,
};

use crate::executor::{RetryPolicy, StageError, StageErrorKind, execute};
use crate::ledger::{AgentTask, Ledger, LedgerObserver, SavedLedger, TaskStatus};
use crate::stage::{
    Generator, StageFailure, StageInput, StageKind, StageOutput, check_contract, invoke,
};

// ---------------------------------------------------------------------------
// PipelinePolicy
// ---------------------------------------------------------------------------

/// Retry policy for every stage, with optional per-stage overrides.
#[derive(Debug, Clone, Default)]
pub struct PipelinePolicy {
    default: RetryPolicy,
    overrides: HashMap<StageKind, RetryPolicy>,
}

impl PipelinePolicy {
    pub fn new(default: RetryPolicy) -> Self {
        Self {
            default,
            overrides: HashMap::new(),
        }
    }

    pub fn with_stage(mut self, stage: StageKind, policy: RetryPolicy) -> Self {
        self.overrides.insert(stage, policy);
        self
    }

    pub fn for_stage(&self, stage: StageKind) -> &RetryPolicy {
        self.overrides.get(&stage).unwrap_or(&self.default)
    }

    /// Build from the `[retry]` config section. Unknown stage keys are an error.
    pub fn from_settings(settings: &RetrySettings) -> Result<Self, SiteForgeError> {
        let mut policy = Self::new(RetryPolicy::try_from(&settings.base)?);
        for key in settings.overrides.keys() {
            let stage: StageKind = key.parse()?;
            let resolved = RetryPolicy::try_from(&settings.for_stage(key))?;
            policy = policy.with_stage(stage, resolved);
        }
        Ok(policy)
    }
}

// ---------------------------------------------------------------------------
// PipelineError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineErrorKind {
    /// The brief failed validation; no stage ran.
    InvalidInput,
    StageTimeout,
    StageRejected,
    /// Retryable failures exhausted the stage's policy.
    StageTransientFailure,
    Cancelled,
}

/// The single failure a caller sees when a run does not complete.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct PipelineError {
    pub kind: PipelineErrorKind,
    /// The stage that failed, or that was about to start when the run was cancelled.
    pub stage: Option<StageKind>,
    pub message: String,
}

impl PipelineError {
    pub fn invalid_input(err: SiteForgeError) -> Self {
        Self {
            kind: PipelineErrorKind::InvalidInput,
            stage: None,
            message: err.to_string(),
        }
    }

    fn cancelled_before(stage: StageKind) -> Self {
        Self {
            kind: PipelineErrorKind::Cancelled,
            stage: Some(stage),
            message: format!("run cancelled before {stage} stage"),
        }
    }

    fn missing_input(stage: StageKind, needed: StageKind) -> Self {
        Self {
            kind: PipelineErrorKind::StageRejected,
            stage: Some(stage),
            message: format!("{stage} stage needs the {needed} output, which is unavailable"),
        }
    }
}

impl From<StageError> for PipelineError {
    fn from(err: StageError) -> Self {
        let kind = match err.kind {
            StageErrorKind::Timeout => PipelineErrorKind::StageTimeout,
            StageErrorKind::Rejected => PipelineErrorKind::StageRejected,
            StageErrorKind::TransientExhausted => PipelineErrorKind::StageTransientFailure,
            StageErrorKind::Cancelled => PipelineErrorKind::Cancelled,
        };
        Self {
            kind,
            stage: Some(err.stage),
            message: err.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Creates runs that share a generator and retry policy.
#[derive(Clone)]
pub struct Orchestrator {
    generator: Arc<dyn Generator>,
    policy: PipelinePolicy,
}

impl Orchestrator {
    pub fn new(generator: Arc<dyn Generator>, policy: PipelinePolicy) -> Self {
        Self { generator, policy }
    }

    /// A fresh run with every stage pending.
    pub fn start(&self, brief: BriefPayload) -> PipelineRun {
        PipelineRun::new(
            brief,
            self.generator.clone(),
            self.policy.clone(),
            Ledger::new(),
            StageOutputs::default(),
        )
    }

    /// A run that reuses the successful prefix of `previous` and starts at the
    /// first stage that did not succeed.
    ///
    /// Nothing is reused when `previous` was saved for a different brief. A
    /// prefix entry counts only if it is `success`, carries an output of its own
    /// stage type, and that output still passes the stage contract for the
    /// input composed from `brief`. Everything from the first miss on is re-run.
    pub fn resume(&self, brief: BriefPayload, previous: &SavedLedger) -> PipelineRun {
        let mut outputs = StageOutputs::default();
        let mut tasks = Vec::with_capacity(StageKind::ORDER.len());

        if previous.matches(&brief) {
            for stage in StageKind::ORDER {
                let reusable = previous.tasks.iter().find(|t| t.id == stage).filter(|t| {
                    t.status == TaskStatus::Success
                        && t.output.as_ref().is_some_and(|o| o.kind() == stage)
                });
                let Some((task, output)) =
                    reusable.and_then(|t| t.output.clone().map(|o| (t, o)))
                else {
                    break;
                };
                let verdict = outputs
                    .input_for(stage, &brief)
                    .map_err(|err| err.message)
                    .and_then(|input| check_contract(&input, &output).map_err(|f| f.message));
                if let Err(reason) = verdict {
                    warn!(%stage, %reason, "saved output no longer fits, re-running from here");
                    break;
                }
                outputs.store(output);
                tasks.push(task.clone());
            }
        } else {
            warn!("saved ledger belongs to a different brief, nothing reused");
        }

        let reused = tasks.len();
        tasks.extend(StageKind::ORDER[reused..].iter().copied().map(AgentTask::pending));
        info!(reused, "resuming from previous ledger");

        PipelineRun::new(
            brief,
            self.generator.clone(),
            self.policy.clone(),
            Ledger::from_tasks(tasks),
            outputs,
        )
    }
}

/// Run the whole pipeline for one validated brief.
pub async fn run_pipeline(
    generator: Arc<dyn Generator>,
    policy: PipelinePolicy,
    brief: BriefPayload,
) -> Result<AggregateResult, PipelineError> {
    Orchestrator::new(generator, policy).start(brief).run().await
}

// ---------------------------------------------------------------------------
// PipelineRun
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct StageOutputs {
    architect: Option<ArchitectOutput>,
    copywriter: Option<CopywriterOutput>,
    visual: Option<VisualOutput>,
    integration: Option<IntegrationOutput>,
}

impl StageOutputs {
    fn has(&self, stage: StageKind) -> bool {
        match stage {
            StageKind::Architect => self.architect.is_some(),
            StageKind::Copywriter => self.copywriter.is_some(),
            StageKind::Visual => self.visual.is_some(),
            StageKind::Integration => self.integration.is_some(),
        }
    }

    fn store(&mut self, output: StageOutput) {
        match output {
            StageOutput::Architect(o) => self.architect = Some(o),
            StageOutput::Copywriter(o) => self.copywriter = Some(o),
            StageOutput::Visual(o) => self.visual = Some(o),
            StageOutput::Integration(o) => self.integration = Some(o),
        }
    }

    /// Compose the input for `stage` from the brief and earlier outputs.
    fn input_for<'a>(
        &'a self,
        stage: StageKind,
        brief: &'a BriefPayload,
    ) -> Result<StageInput<'a>, PipelineError> {
        let missing = |needed| PipelineError::missing_input(stage, needed);
        Ok(match stage {
            StageKind::Architect => StageInput::Architect { brief },
            StageKind::Copywriter => StageInput::Copywriter {
                brief,
                architect: self
                    .architect
                    .as_ref()
                    .ok_or_else(|| missing(StageKind::Architect))?,
            },
            StageKind::Visual => StageInput::Visual {
                brief,
                copywriter: self
                    .copywriter
                    .as_ref()
                    .ok_or_else(|| missing(StageKind::Copywriter))?,
            },
            StageKind::Integration => StageInput::Integration {
                brief,
                copywriter: self
                    .copywriter
                    .as_ref()
                    .ok_or_else(|| missing(StageKind::Copywriter))?,
                visual: self
                    .visual
                    .as_ref()
                    .ok_or_else(|| missing(StageKind::Visual))?,
            },
        })
    }

    fn into_result(self) -> Option<AggregateResult> {
        Some(AggregateResult {
            architect: self.architect?,
            copywriter: self.copywriter?,
            visual: self.visual?,
            integration: self.integration?,
        })
    }
}

/// One execution of the pipeline for one brief.
///
/// Grab an [`observer`](Self::observer) or the [`cancel_token`](Self::cancel_token)
/// before calling [`run`](Self::run); both stay usable after the run ends.
pub struct PipelineRun {
    id: RunId,
    brief: BriefPayload,
    generator: Arc<dyn Generator>,
    policy: PipelinePolicy,
    ledger: Ledger,
    cancel: CancellationToken,
    outputs: StageOutputs,
}

impl PipelineRun {
    fn new(
        brief: BriefPayload,
        generator: Arc<dyn Generator>,
        policy: PipelinePolicy,
        ledger: Ledger,
        outputs: StageOutputs,
    ) -> Self {
        Self {
            id: RunId::new(),
            brief,
            generator,
            policy,
            ledger,
            cancel: CancellationToken::new(),
            outputs,
        }
    }

    pub fn id(&self) -> RunId {
        self.id
    }

    pub fn observer(&self) -> LedgerObserver {
        self.ledger.observer()
    }

    /// Token that cancels this run. Cancelling a finished run has no effect.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Execute the remaining stages in order.
    #[instrument(
        skip_all,
        fields(
            run_id = %self.id,
            project = %self.brief.project_name(),
            generator = %self.generator.name(),
        )
    )]
    pub async fn run(mut self) -> Result<AggregateResult, PipelineError> {
        let start = Instant::now();
        info!("starting pipeline run");

        for stage in StageKind::ORDER {
            if self.outputs.has(stage) {
                continue;
            }
            if self.cancel.is_cancelled() {
                warn!(%stage, "run cancelled before stage start");
                return Err(PipelineError::cancelled_before(stage));
            }

            self.ledger.mark_running(stage);
            info!(%stage, "stage started");

            let input = match self.outputs.input_for(stage, &self.brief) {
                Ok(input) => input,
                Err(err) => {
                    self.ledger.mark_error(stage, &err.message, 0);
                    return Err(err);
                }
            };
            let generator = self.generator.as_ref();
            let result = execute(
                stage,
                self.policy.for_stage(stage),
                &self.cancel,
                move |_attempt| async move {
                    let output = invoke(generator, &input).await?;
                    check_contract(&input, &output)?;
                    Ok::<_, StageFailure>(output)
                },
            )
            .await;

            match result {
                Ok((output, attempts)) => {
                    info!(%stage, attempts, "stage succeeded");
                    self.ledger.mark_success(stage, output.clone(), attempts);
                    self.outputs.store(output);
                }
                Err(err) => {
                    warn!(
                        %stage,
                        attempts = err.attempts,
                        kind = ?err.kind,
                        error = %err.message,
                        "stage failed"
                    );
                    self.ledger.mark_error(stage, &err.message, err.attempts);
                    return Err(err.into());
                }
            }
        }

        let elapsed_ms = start.elapsed().as_millis() as u64;
        info!(elapsed_ms, "pipeline run complete");

        self.outputs.into_result().ok_or_else(|| PipelineError {
            kind: PipelineErrorKind::StageRejected,
            stage: None,
            message: "run finished without all stage outputs".into(),
        })
    }
}
