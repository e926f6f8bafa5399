use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineStep {
    pub id: String,
    #[serde(rename = "type")]
    pub step_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub needs: Vec<String>,
}

impl PipelineStep {
    pub fn new(id: &str, label: &str, needs: Option<&str>) -> Self {
        Self {
            id: id.to_string(),
            step_type: id.to_string(),
            label: Some(label.to_string()),
            needs: needs.map(|n| vec![n.to_string()]).unwrap_or_default(),
        }
    }
}

pub trait PipelineStepExecutor {
    fn execute_step(&self, step: &PipelineStep) -> Result<serde_json::Value>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRunPlan {
    pub steps: Vec<PipelineStep>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineStepResult {
    pub id: String,
    #[serde(rename = "type")]
    pub step_type: String,
    pub status: PipelineRunStatus,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hints: Vec<crate::error::Hint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_details: Option<serde_json::Value>,
}

impl PipelineStepResult {
    fn skipped(step: &PipelineStep, reason: String) -> Self {
        Self {
            id: step.id.clone(),
            step_type: step.step_type.clone(),
            status: PipelineRunStatus::Skipped,
            warnings: vec![reason],
            hints: Vec::new(),
            data: None,
            error: None,
            error_code: None,
            error_details: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRunResult {
    pub steps: Vec<PipelineStepResult>,
    pub status: PipelineRunStatus,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    pub summary: PipelineRunSummary,
}

impl PipelineRunResult {
    pub fn succeeded(&self) -> bool {
        self.status == PipelineRunStatus::Success
    }

    /// First failed step, if any.
    pub fn failed_step(&self) -> Option<&PipelineStepResult> {
        self.steps
            .iter()
            .find(|step| step.status == PipelineRunStatus::Failed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRunSummary {
    pub total_steps: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub next_actions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PipelineRunStatus {
    Success,
    Failed,
    Skipped,
}

pub fn plan_run(steps: &[PipelineStep], field: &str) -> Result<PipelineRunPlan> {
    let (ordered, warnings) = order_steps(steps, field)?;
    Ok(PipelineRunPlan {
        steps: ordered,
        warnings,
    })
}

/// Stable topological order: among steps whose needs are met, declaration order wins.
fn order_steps(steps: &[PipelineStep], field: &str) -> Result<(Vec<PipelineStep>, Vec<String>)> {
    let mut id_index = HashMap::new();
    for (idx, step) in steps.iter().enumerate() {
        if id_index.contains_key(&step.id) {
            return Err(Error::validation_invalid_argument(
                field,
                format!("Duplicate step id '{}'", step.id),
                None,
                None,
            ));
        }
        id_index.insert(step.id.clone(), idx);
    }

    if steps.len() <= 1 {
        if let Some(step) = steps.first() {
            if let Some(need) = step.needs.first() {
                return Err(unknown_dependency(field, step, need));
            }
        }
        return Ok((steps.to_vec(), Vec::new()));
    }

    let mut indegree = vec![0usize; steps.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); steps.len()];

    for (idx, step) in steps.iter().enumerate() {
        for need in &step.needs {
            let Some(&parent_idx) = id_index.get(need) else {
                return Err(unknown_dependency(field, step, need));
            };
            indegree[idx] += 1;
            dependents[parent_idx].push(idx);
        }
    }

    let mut queue: VecDeque<usize> = indegree
        .iter()
        .enumerate()
        .filter(|(_, count)| **count == 0)
        .map(|(idx, _)| idx)
        .collect();

    let mut ordered = Vec::with_capacity(steps.len());
    while let Some(idx) = queue.pop_front() {
        ordered.push(steps[idx].clone());
        for &child in &dependents[idx] {
            indegree[child] -= 1;
            if indegree[child] == 0 {
                queue.push_back(child);
            }
        }
    }

    if ordered.len() != steps.len() {
        let pending: Vec<String> = steps
            .iter()
            .enumerate()
            .filter(|(idx, _)| indegree[*idx] > 0)
            .map(|(_, step)| step.id.clone())
            .collect();
        return Err(Error::validation_invalid_argument(
            field,
            "Steps contain a cycle".to_string(),
            None,
            Some(pending),
        ));
    }

    let mut warnings = Vec::new();
    let reordered = ordered
        .iter()
        .zip(steps.iter())
        .any(|(planned, declared)| planned.id != declared.id);
    if reordered {
        warnings.push("Steps reordered based on dependencies".to_string());
    }

    Ok((ordered, warnings))
}

fn unknown_dependency(field: &str, step: &PipelineStep, need: &str) -> Error {
    Error::validation_invalid_argument(
        field,
        format!("Step '{}' depends on unknown step '{}'", step.id, need),
        None,
        None,
    )
}

/// Execute `steps` one at a time in planned order.
///
/// The first failure stops the run: every step after it is reported as
/// skipped. Completed steps are not rolled back.
pub fn run(
    steps: &[PipelineStep],
    executor: &dyn PipelineStepExecutor,
    field: &str,
) -> Result<PipelineRunResult> {
    let plan = plan_run(steps, field)?;
    let mut results: Vec<PipelineStepResult> = Vec::with_capacity(plan.steps.len());
    let mut failed: Option<String> = None;

    for step in &plan.steps {
        if let Some(failed_id) = &failed {
            results.push(PipelineStepResult::skipped(
                step,
                format!("Skipped because '{}' failed", failed_id),
            ));
            continue;
        }

        log_status!("pipeline", "Running step '{}'", step.id);
        let result = execute_single_step(step, executor);
        if result.status == PipelineRunStatus::Failed {
            log_status!(
                "pipeline",
                "Step '{}' failed: {}",
                step.id,
                result.error.as_deref().unwrap_or("unknown error")
            );
            failed = Some(step.id.clone());
        }
        results.push(result);
    }

    let status = if failed.is_some() {
        PipelineRunStatus::Failed
    } else {
        PipelineRunStatus::Success
    };
    let summary = build_summary(&results, &status);

    Ok(PipelineRunResult {
        steps: results,
        status,
        warnings: plan.warnings,
        summary,
    })
}

fn build_summary(results: &[PipelineStepResult], status: &PipelineRunStatus) -> PipelineRunSummary {
    let count = |wanted: PipelineRunStatus| results.iter().filter(|r| r.status == wanted).count();

    let next_actions = match status {
        PipelineRunStatus::Failed => vec![
            "Fix the issue and re-run the build (the database is recreated from scratch)"
                .to_string(),
        ],
        _ => Vec::new(),
    };

    PipelineRunSummary {
        total_steps: results.len(),
        succeeded: count(PipelineRunStatus::Success),
        failed: count(PipelineRunStatus::Failed),
        skipped: count(PipelineRunStatus::Skipped),
        next_actions,
    }
}

fn execute_single_step(
    step: &PipelineStep,
    executor: &dyn PipelineStepExecutor,
) -> PipelineStepResult {
    match executor.execute_step(step) {
        Ok(data) => PipelineStepResult {
            id: step.id.clone(),
            step_type: step.step_type.clone(),
            status: PipelineRunStatus::Success,
            warnings: Vec::new(),
            hints: Vec::new(),
            data: Some(data),
            error: None,
            error_code: None,
            error_details: None,
        },
        Err(err) => {
            let wrapped = Error::pipeline_step_failed(&step.id, &err);
            PipelineStepResult {
                id: step.id.clone(),
                step_type: step.step_type.clone(),
                status: PipelineRunStatus::Failed,
                warnings: Vec::new(),
                hints: err.hints,
                data: None,
                error: Some(wrapped.message),
                error_code: Some(err.code.as_str().to_string()),
                error_details: Some(wrapped.details),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    struct ScriptedExecutor {
        fail_on: Option<&'static str>,
        calls: RefCell<Vec<String>>,
    }

    impl ScriptedExecutor {
        fn new(fail_on: Option<&'static str>) -> Self {
            Self {
                fail_on,
                calls: RefCell::new(Vec::new()),
            }
        }
    }

    impl PipelineStepExecutor for ScriptedExecutor {
        fn execute_step(&self, step: &PipelineStep) -> Result<serde_json::Value> {
            self.calls.borrow_mut().push(step.id.clone());
            if self.fail_on == Some(step.id.as_str()) {
                return Err(Error::verify_failed("out.db", "file is empty"));
            }
            Ok(serde_json::json!({ "step": step.id }))
        }
    }

    fn chain(ids: &[&str]) -> Vec<PipelineStep> {
        ids.iter()
            .enumerate()
            .map(|(idx, id)| PipelineStep::new(id, id, idx.checked_sub(1).map(|p| ids[p])))
            .collect()
    }

    #[test]
    fn runs_every_step_in_order() {
        let executor = ScriptedExecutor::new(None);
        let result = run(&chain(&["a", "b", "c"]), &executor, "steps").unwrap();

        assert!(result.succeeded());
        assert_eq!(*executor.calls.borrow(), vec!["a", "b", "c"]);
        assert_eq!(result.summary.succeeded, 3);
        assert_eq!(result.steps[1].data.as_ref().unwrap()["step"], "b");
    }

    #[test]
    fn first_failure_skips_the_rest() {
        let executor = ScriptedExecutor::new(Some("b"));
        let result = run(&chain(&["a", "b", "c", "d"]), &executor, "steps").unwrap();

        assert_eq!(result.status, PipelineRunStatus::Failed);
        assert_eq!(*executor.calls.borrow(), vec!["a", "b"]);

        let statuses: Vec<_> = result.steps.iter().map(|s| s.status.clone()).collect();
        assert_eq!(
            statuses,
            vec![
                PipelineRunStatus::Success,
                PipelineRunStatus::Failed,
                PipelineRunStatus::Skipped,
                PipelineRunStatus::Skipped,
            ]
        );

        let failed = result.failed_step().unwrap();
        assert_eq!(failed.error_code.as_deref(), Some("verify.failed"));
        assert!(failed.error.as_deref().unwrap().contains("Step 'b' failed"));
        assert_eq!(result.summary.skipped, 2);
        assert_eq!(result.summary.next_actions.len(), 1);
    }

    #[test]
    fn independent_steps_are_skipped_after_failure() {
        let steps = vec![
            PipelineStep::new("a", "a", None),
            PipelineStep::new("b", "b", None),
        ];
        let executor = ScriptedExecutor::new(Some("a"));
        let result = run(&steps, &executor, "steps").unwrap();

        assert_eq!(result.steps[1].status, PipelineRunStatus::Skipped);
        assert_eq!(*executor.calls.borrow(), vec!["a"]);
    }

    #[test]
    fn plan_orders_by_needs() {
        let steps = vec![
            PipelineStep::new("upload", "upload", Some("verify")),
            PipelineStep::new("verify", "verify", None),
        ];
        let plan = plan_run(&steps, "steps").unwrap();

        let ids: Vec<_> = plan.steps.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["verify", "upload"]);
        assert_eq!(plan.warnings.len(), 1);
    }

    #[test]
    fn plan_rejects_duplicates_unknown_needs_and_cycles() {
        let duplicate = vec![
            PipelineStep::new("a", "a", None),
            PipelineStep::new("a", "a", None),
        ];
        let err = plan_run(&duplicate, "steps").unwrap_err();
        assert_eq!(err.details["problem"], "Duplicate step id 'a'");

        let unknown = vec![PipelineStep::new("a", "a", Some("ghost"))];
        let err = plan_run(&unknown, "steps").unwrap_err();
        assert_eq!(
            err.details["problem"],
            "Step 'a' depends on unknown step 'ghost'"
        );

        let cycle = vec![
            PipelineStep::new("a", "a", Some("b")),
            PipelineStep::new("b", "b", Some("a")),
        ];
        let err = plan_run(&cycle, "steps").unwrap_err();
        assert_eq!(err.code.as_str(), "validation.invalid_argument");
    }
}
