//! Promotion workflow: stage a candidate revision, compare it against the
//! live prompt, then promote or discard it.
//!
//! ```text
//! Init -> Staged -> Executed -> AwaitingDecision -> Promoted  -> CleanedUp
//!            \__________________/                 \ Discarded -> Retained
//! ```

mod operator;

pub use operator::{ForcedOperator, InteractiveOperator, Operator};

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Project;
use crate::diff::{diff, DiffResult};
use crate::entity::{CandidateOrigin, FieldOverrides, PromptPatch, PromptVersion};
use crate::error::{PromptError, Result, Step};
use crate::exec::{DualExecutor, PairedResults};
use crate::report;
use crate::storage::PromptStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    Init,
    Staged,
    Executed,
    AwaitingDecision,
    Promoted,
    Discarded,
    CleanedUp,
    Retained,
}

impl WorkflowState {
    fn can_advance_to(self, next: WorkflowState) -> bool {
        use WorkflowState::*;
        matches!(
            (self, next),
            (Init, Staged)
                | (Staged, Executed)
                | (Staged, AwaitingDecision)
                | (Executed, AwaitingDecision)
                | (AwaitingDecision, Promoted)
                | (AwaitingDecision, Discarded)
                | (Promoted | Discarded, CleanedUp | Retained)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, WorkflowState::CleanedUp | WorkflowState::Retained)
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkflowState::Init => "init",
            WorkflowState::Staged => "staged",
            WorkflowState::Executed => "executed",
            WorkflowState::AwaitingDecision => "awaiting_decision",
            WorkflowState::Promoted => "promoted",
            WorkflowState::Discarded => "discarded",
            WorkflowState::CleanedUp => "cleaned_up",
            WorkflowState::Retained => "retained",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Promote,
    Discard,
}

/// One revision comparison in flight.
#[derive(Debug, Clone)]
pub struct Workflow {
    pub id: Uuid,
    state: WorkflowState,
    /// The live prompt; replaced by the store's copy after promotion
    pub original: PromptVersion,
    pub candidate: PromptVersion,
    pub diffs: Vec<DiffResult>,
    pub results: Option<PairedResults>,
}

impl Workflow {
    pub fn state(&self) -> WorkflowState {
        self.state
    }

    fn check(&self, next: WorkflowState) -> Result<()> {
        if self.state.can_advance_to(next) {
            Ok(())
        } else {
            Err(PromptError::InvalidTransition {
                from: self.state.to_string(),
                to: next.to_string(),
            })
        }
    }

    fn advance(&mut self, next: WorkflowState) -> Result<()> {
        self.check(next)?;
        info!(workflow = %self.id, from = %self.state, to = %next, "workflow transition");
        self.state = next;
        Ok(())
    }

    pub fn report(&self) -> String {
        report::render(&self.diffs, self.results.as_ref())
    }

    /// Exactly one side of the comparison failed.
    pub fn is_partial(&self) -> bool {
        self.results.as_ref().is_some_and(PairedResults::one_failed)
    }

    fn into_outcome(self, decision: Decision) -> WorkflowOutcome {
        WorkflowOutcome {
            workflow_id: self.id,
            partial: self.is_partial(),
            report: self.report(),
            original: self.original.slug,
            candidate: self.candidate.slug,
            decision,
            state: self.state,
            diffs: self.diffs,
            results: self.results,
        }
    }
}

/// How a completed workflow ended.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowOutcome {
    pub workflow_id: Uuid,
    pub original: String,
    pub candidate: String,
    pub decision: Decision,
    pub state: WorkflowState,
    pub partial: bool,
    #[serde(skip)]
    pub report: String,
    pub diffs: Vec<DiffResult>,
    pub results: Option<PairedResults>,
}

impl WorkflowOutcome {
    pub fn promoted(&self) -> bool {
        self.decision == Decision::Promote
    }

    /// 6 when one side of the comparison failed, otherwise 0.
    pub fn exit_code(&self) -> i32 {
        if self.partial {
            6
        } else {
            0
        }
    }
}

/// Arguments of a full A/B run.
#[derive(Debug, Clone, Default)]
pub struct AbRequest {
    pub slug: String,
    pub overrides: FieldOverrides,
    /// Input for both invocations; `None` compares diffs only
    pub input: Option<Value>,
    /// Keep the candidate after the decision
    pub retain: bool,
}

/// Diffs of the revisable fields; `model` only when it differs.
pub fn field_diffs(original: &PromptVersion, candidate: &PromptVersion) -> Vec<DiffResult> {
    let mut diffs = vec![
        diff("system_message", &original.system_message, &candidate.system_message),
        diff("user_template", &original.user_template, &candidate.user_template),
    ];
    if original.model != candidate.model {
        diffs.push(diff("model", &original.model, &candidate.model));
    }
    diffs
}

/// Drives workflows against a store, an executor and an operator.
pub struct Coordinator {
    store: Arc<dyn PromptStore>,
    executor: DualExecutor,
    operator: Arc<dyn Operator>,
    project: Project,
}

impl Coordinator {
    pub fn new(
        store: Arc<dyn PromptStore>,
        executor: DualExecutor,
        operator: Arc<dyn Operator>,
        project: Project,
    ) -> Self {
        Self {
            store,
            executor,
            operator,
            project,
        }
    }

    pub fn project(&self) -> &Project {
        &self.project
    }

    /// Create (or restage) `{slug}-v2` with the overrides merged onto the
    /// live prompt.
    pub async fn stage(&self, slug: &str, overrides: &FieldOverrides) -> Result<Workflow> {
        if overrides.is_empty() {
            return Err(PromptError::Validation(
                "Nothing to compare: override the system message, user template or model".to_string(),
            )
            .at(Step::Stage));
        }

        let original = self
            .store
            .get(&self.project, slug)
            .await
            .map_err(|e| e.at(Step::Stage))?;
        let id = Uuid::new_v4();
        let candidate_slug = original.candidate_slug();
        let patch = overrides.merge_onto(&original);

        let existing = self
            .store
            .find(&self.project, &candidate_slug)
            .await
            .map_err(|e| e.at(Step::Stage))?;
        let candidate = match existing {
            Some(existing) if existing.is_candidate_of(&original.slug) => {
                debug!(slug = %candidate_slug, "restaging existing candidate");
                self.store.update(&self.project, &candidate_slug, &patch).await
            }
            Some(_) => Err(PromptError::SlugCollision { slug: candidate_slug }),
            None => {
                let mut candidate = original.clone();
                candidate.id = Uuid::new_v4();
                candidate.slug = candidate_slug;
                candidate.name = format!("{} (candidate)", original.name);
                candidate.apply(&patch);
                candidate.created_at = candidate.updated_at;
                candidate.origin = Some(CandidateOrigin {
                    source_slug: original.slug.clone(),
                    workflow_id: id,
                    staged_at: Utc::now(),
                });
                self.store.create(&self.project, &candidate).await
            }
        }
        .map_err(|e| e.at(Step::Stage))?;

        let mut workflow = Workflow {
            id,
            state: WorkflowState::Init,
            diffs: field_diffs(&original, &candidate),
            original,
            candidate,
            results: None,
        };
        workflow.advance(WorkflowState::Staged)?;
        Ok(workflow)
    }

    /// Run original and candidate on `input`. Fails only when both sides
    /// failed; the report is shown first and the candidate stays.
    pub async fn execute(&self, workflow: &mut Workflow, input: &Value) -> Result<()> {
        workflow
            .check(WorkflowState::Executed)
            .map_err(|e| e.at(Step::Execute))?;

        let results = self
            .executor
            .run_pair(&self.project, &workflow.original, &workflow.candidate, input)
            .await;
        let both_failed = results.both_failed();
        if results.one_failed() {
            warn!(workflow = %workflow.id, "one side of the comparison failed");
        }
        workflow.results = Some(results);
        workflow.advance(WorkflowState::Executed)?;

        if both_failed {
            self.operator.show(&workflow.report());
            return Err(PromptError::ExecutionFailure {
                original: workflow.original.slug.clone(),
                candidate: workflow.candidate.slug.clone(),
            }
            .at(Step::Execute));
        }
        Ok(())
    }

    /// Show the report and ask the operator whether to promote.
    pub async fn decide(&self, workflow: &mut Workflow) -> Result<Decision> {
        if workflow.state != WorkflowState::AwaitingDecision {
            workflow
                .advance(WorkflowState::AwaitingDecision)
                .map_err(|e| e.at(Step::Decide))?;
        }

        self.operator.show(&workflow.report());
        let question = format!(
            "Promote '{}' onto '{}'?",
            workflow.candidate.slug, workflow.original.slug
        );
        let confirmed = self
            .operator
            .confirm(&question)
            .await
            .map_err(|e| e.at(Step::Decide))?;

        let decision = if confirmed {
            Decision::Promote
        } else {
            Decision::Discard
        };
        info!(workflow = %workflow.id, ?decision, "decision made");
        Ok(decision)
    }

    /// Copy the candidate's fields onto the original in one update. A
    /// rejected update leaves the workflow awaiting a decision.
    pub async fn promote(&self, workflow: &mut Workflow) -> Result<()> {
        workflow
            .check(WorkflowState::Promoted)
            .map_err(|e| e.at(Step::Promote))?;

        let patch = PromptPatch::promotion_of(&workflow.candidate);
        match self
            .store
            .update(&self.project, &workflow.original.slug, &patch)
            .await
        {
            Ok(updated) => {
                workflow.original = updated;
                workflow.advance(WorkflowState::Promoted)
            }
            Err(e) => {
                warn!(workflow = %workflow.id, slug = %workflow.original.slug, error = %e, "promotion rejected");
                Err(PromptError::PromotionFailure {
                    slug: workflow.original.slug.clone(),
                    source: Box::new(e),
                }
                .at(Step::Promote))
            }
        }
    }

    pub fn discard(&self, workflow: &mut Workflow) -> Result<()> {
        workflow
            .advance(WorkflowState::Discarded)
            .map_err(|e| e.at(Step::Promote))
    }

    /// Delete the candidate unless `retain`.
    pub async fn finish(&self, workflow: &mut Workflow, retain: bool) -> Result<WorkflowState> {
        let next = if retain {
            WorkflowState::Retained
        } else {
            WorkflowState::CleanedUp
        };
        workflow.check(next).map_err(|e| e.at(Step::Cleanup))?;

        if !retain {
            self.store
                .delete(&self.project, &workflow.candidate.slug)
                .await
                .map_err(|e| e.at(Step::Cleanup))?;
        }
        workflow.advance(next)?;
        Ok(next)
    }

    /// Stage, run, decide and clean up in one go.
    pub async fn run_ab(&self, request: AbRequest) -> Result<WorkflowOutcome> {
        let mut workflow = self.stage(&request.slug, &request.overrides).await?;
        match &request.input {
            Some(input) => self.execute(&mut workflow, input).await?,
            None => debug!(workflow = %workflow.id, "no input, comparing diffs only"),
        }
        self.conclude(workflow, request.retain, false).await
    }

    /// Promote one existing prompt onto another. The source is only deleted
    /// after a promotion, never when the operator declines.
    pub async fn promote_existing(&self, from: &str, to: &str, retain: bool) -> Result<WorkflowOutcome> {
        if from == to {
            return Err(PromptError::SlugCollision { slug: to.to_string() }.at(Step::Stage));
        }
        let original = self
            .store
            .get(&self.project, to)
            .await
            .map_err(|e| e.at(Step::Stage))?;
        let candidate = self
            .store
            .get(&self.project, from)
            .await
            .map_err(|e| e.at(Step::Stage))?;

        let workflow = Workflow {
            id: Uuid::new_v4(),
            state: WorkflowState::AwaitingDecision,
            diffs: field_diffs(&original, &candidate),
            original,
            candidate,
            results: None,
        };
        info!(workflow = %workflow.id, from, to, "promoting existing prompt");
        self.conclude(workflow, retain, true).await
    }

    /// Decide, then promote or discard and finish. `keep_on_discard` leaves
    /// the candidate alone when the operator declines.
    async fn conclude(&self, mut workflow: Workflow, retain: bool, keep_on_discard: bool) -> Result<WorkflowOutcome> {
        let decision = self.decide(&mut workflow).await?;
        let retain = match decision {
            Decision::Promote => {
                self.promote(&mut workflow).await?;
                retain
            }
            Decision::Discard => {
                self.discard(&mut workflow)?;
                retain || keep_on_discard
            }
        };
        self.finish(&mut workflow, retain).await?;
        Ok(workflow.into_outcome(decision))
    }

    /// Delete staged candidates, optionally only those of `source`. Returns
    /// the removed slugs.
    pub async fn sweep(&self, source: Option<&str>) -> Result<Vec<String>> {
        let summaries = self
            .store
            .list(&self.project)
            .await
            .map_err(|e| e.at(Step::Sweep))?;

        let mut removed = Vec::new();
        for summary in summaries {
            let Some(candidate_of) = summary.candidate_of.as_deref() else {
                continue;
            };
            if source.is_some_and(|s| s != candidate_of) {
                continue;
            }
            self.store
                .delete(&self.project, &summary.slug)
                .await
                .map_err(|e| e.at(Step::Sweep))?;
            info!(slug = %summary.slug, candidate_of, "swept candidate");
            removed.push(summary.slug);
        }
        Ok(removed)
    }
}
