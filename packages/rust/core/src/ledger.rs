//! Progress ledger: one [`AgentTask`] per stage, published to observers.
//!
//! The orchestrator owns the [`Ledger`] (the sending half of a `watch`
//! channel) and is the only writer. Observers hold a [`LedgerObserver`] and
//! only ever see cloned snapshots, so nothing outside the run can mutate it.
//! A snapshot stays readable after the run has finished.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use siteforge_shared::BriefPayload;

use crate::stage::{StageKind, StageOutput};

/// Lifecycle of a single stage within one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Success,
    Error,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Error)
    }
}

/// Ledger record for one stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentTask {
    pub id: StageKind,
    pub title: String,
    pub description: String,
    pub status: TaskStatus,
    pub output: Option<StageOutput>,
    pub error: Option<String>,
    /// Executor attempts used so far (0 until the stage finishes).
    #[serde(default)]
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl AgentTask {
    /// A fresh, pending record for `stage`.
    pub fn pending(stage: StageKind) -> Self {
        Self {
            id: stage,
            title: stage.title().to_string(),
            description: stage.description().to_string(),
            status: TaskStatus::Pending,
            output: None,
            error: None,
            attempts: 0,
            started_at: None,
            finished_at: None,
        }
    }
}

/// A finished ledger bound to the brief it was produced for.
///
/// This is what gets written to disk and handed back to
/// [`Orchestrator::resume`](crate::Orchestrator::resume).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedLedger {
    /// [`BriefPayload::digest`] of the run's brief.
    pub brief_digest: String,
    pub tasks: Vec<AgentTask>,
}

impl SavedLedger {
    pub fn new(brief: &BriefPayload, tasks: Vec<AgentTask>) -> Self {
        Self {
            brief_digest: brief.digest(),
            tasks,
        }
    }

    /// Whether this ledger was produced for `brief`.
    pub fn matches(&self, brief: &BriefPayload) -> bool {
        self.brief_digest == brief.digest()
    }
}

// ---------------------------------------------------------------------------
// Ledger (writer)
// ---------------------------------------------------------------------------

/// The writable ledger of one run.
#[derive(Debug)]
pub struct Ledger {
    tx: watch::Sender<Vec<AgentTask>>,
}

impl Ledger {
    /// All four stages, pending, in execution order.
    pub fn new() -> Self {
        Self::from_tasks(StageKind::ORDER.into_iter().map(AgentTask::pending).collect())
    }

    /// Start from existing records, e.g. the successful prefix of an earlier run.
    pub(crate) fn from_tasks(tasks: Vec<AgentTask>) -> Self {
        let (tx, _rx) = watch::channel(tasks);
        Self { tx }
    }

    /// A read-only handle that sees every later update.
    pub fn observer(&self) -> LedgerObserver {
        LedgerObserver {
            rx: self.tx.subscribe(),
        }
    }

    /// Copy of the current records.
    pub fn snapshot(&self) -> Vec<AgentTask> {
        self.tx.borrow().clone()
    }

    pub(crate) fn mark_running(&self, stage: StageKind) {
        self.update(stage, |task| {
            task.status = TaskStatus::Running;
            task.error = None;
            task.started_at = Some(Utc::now());
        });
    }

    pub(crate) fn mark_success(&self, stage: StageKind, output: StageOutput, attempts: u32) {
        self.update(stage, |task| {
            task.status = TaskStatus::Success;
            task.output = Some(output);
            task.attempts = attempts;
            task.finished_at = Some(Utc::now());
        });
    }

    /// Record a terminal failure. The stored message is never empty.
    pub(crate) fn mark_error(&self, stage: StageKind, message: &str, attempts: u32) {
        let message = if message.trim().is_empty() {
            format!("{stage} stage failed without an error message")
        } else {
            message.to_string()
        };
        self.update(stage, |task| {
            task.status = TaskStatus::Error;
            task.error = Some(message);
            task.attempts = attempts;
            task.finished_at = Some(Utc::now());
        });
    }

    fn update(&self, stage: StageKind, f: impl FnOnce(&mut AgentTask)) {
        self.tx.send_modify(|tasks| {
            if let Some(task) = tasks.iter_mut().find(|t| t.id == stage) {
                f(task);
            }
        });
    }
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// LedgerObserver (reader)
// ---------------------------------------------------------------------------

/// Read-only view of a run's ledger. Cheap to clone.
#[derive(Debug, Clone)]
pub struct LedgerObserver {
    rx: watch::Receiver<Vec<AgentTask>>,
}

impl LedgerObserver {
    /// Copy of the latest records.
    pub fn snapshot(&self) -> Vec<AgentTask> {
        self.rx.borrow().clone()
    }

    /// Wait for the next update. Returns `false` once the run has finished and
    /// no further updates can arrive.
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }

    /// The stage currently running, if any.
    pub fn active(&self) -> Option<StageKind> {
        self.rx
            .borrow()
            .iter()
            .find(|t| t.status == TaskStatus::Running)
            .map(|t| t.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use siteforge_shared::{ArchitectOutput, RawBrief};

    fn architect_output() -> StageOutput {
        StageOutput::Architect(ArchitectOutput {
            sitemap: vec!["Home".into()],
            sections: vec![],
        })
    }

    #[test]
    fn new_ledger_is_all_pending_in_order() {
        let ledger = Ledger::new();
        let tasks = ledger.snapshot();
        let ids: Vec<_> = tasks.iter().map(|t| t.id).collect();
        assert_eq!(ids, StageKind::ORDER);
        assert!(tasks.iter().all(|t| t.status == TaskStatus::Pending));
        assert_eq!(tasks[0].title, "Architect Agent");
    }

    #[test]
    fn transitions_are_visible_to_observers() {
        let ledger = Ledger::new();
        let observer = ledger.observer();

        ledger.mark_running(StageKind::Architect);
        assert_eq!(observer.active(), Some(StageKind::Architect));

        ledger.mark_success(StageKind::Architect, architect_output(), 2);
        let tasks = observer.snapshot();
        assert_eq!(tasks[0].status, TaskStatus::Success);
        assert_eq!(tasks[0].attempts, 2);
        assert!(tasks[0].output.is_some());
        assert!(tasks[0].finished_at.is_some());
        assert_eq!(observer.active(), None);
    }

    #[test]
    fn snapshots_are_copies() {
        let ledger = Ledger::new();
        let mut snapshot = ledger.snapshot();
        snapshot[0].status = TaskStatus::Error;
        assert_eq!(ledger.snapshot()[0].status, TaskStatus::Pending);
    }

    #[test]
    fn empty_error_messages_are_replaced() {
        let ledger = Ledger::new();
        ledger.mark_running(StageKind::Visual);
        ledger.mark_error(StageKind::Visual, "  ", 3);
        let tasks = ledger.snapshot();
        let task = &tasks[2];
        assert_eq!(task.status, TaskStatus::Error);
        assert!(task.status.is_terminal());
        assert!(!task.error.as_deref().unwrap_or_default().trim().is_empty());
    }

    #[tokio::test]
    async fn observer_outlives_the_ledger() {
        let ledger = Ledger::new();
        let mut observer = ledger.observer();
        ledger.mark_running(StageKind::Architect);
        assert!(observer.changed().await);

        ledger.mark_error(StageKind::Architect, "provider down", 1);
        drop(ledger);

        let tasks = observer.snapshot();
        assert_eq!(tasks[0].error.as_deref(), Some("provider down"));
        // The error update is still unseen; after that the channel is closed.
        assert!(observer.changed().await);
        assert!(!observer.changed().await);
    }

    #[test]
    fn saved_ledger_is_bound_to_its_brief() {
        let brief = RawBrief::sample().validate().unwrap();
        let other = RawBrief {
            project_name: "Beta Co".into(),
            ..RawBrief::sample()
        }
        .validate()
        .unwrap();

        let saved = SavedLedger::new(&brief, Ledger::new().snapshot());
        assert!(saved.matches(&brief));
        assert!(!saved.matches(&other));

        let json = serde_json::to_string(&saved).unwrap();
        assert!(json.contains(r#""briefDigest""#));
        let back: SavedLedger = serde_json::from_str(&json).unwrap();
        assert_eq!(back, saved);
    }

    #[test]
    fn task_serializes_in_camel_case() {
        let task = AgentTask::pending(StageKind::Copywriter);
        let json = serde_json::to_string(&task).unwrap();
        assert!(json.contains(r#""id":"copywriter""#));
        assert!(json.contains(r#""status":"pending""#));
        assert!(!json.contains("startedAt"));
    }
}
