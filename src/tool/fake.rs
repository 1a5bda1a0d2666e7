//! Scripted provisioner for lifecycle tests.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::ToolError;

use super::options::ToolOptions;
use super::plan::PlanResult;
use super::provisioner::Provisioner;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Validate,
    Plan,
    PlanAndShow,
    ApplyAll,
    Apply,
    Destroy,
    Output(String),
    OutputList(String),
}

/// Replays queued plans and canned outputs, recording every call with the
/// options it received.
#[derive(Default)]
pub struct ScriptedProvisioner {
    calls: Mutex<Vec<(Call, ToolOptions)>>,
    plans: Mutex<VecDeque<Result<PlanResult, ToolError>>>,
    outputs: HashMap<String, String>,
    lists: HashMap<String, Vec<String>>,
    apply_all_error: Option<ToolError>,
    plan_error: Option<ToolError>,
    destroy_error: Option<ToolError>,
    panic_on_apply_all: bool,
    watched: Option<PathBuf>,
    watched_seen: Mutex<Vec<bool>>,
}

pub fn failure(stderr: &str) -> ToolError {
    ToolError::CommandFailed {
        command: String::from("terraform"),
        exit_code: Some(1),
        stderr: stderr.to_string(),
    }
}

impl ScriptedProvisioner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_output(mut self, name: &str, value: &str) -> Self {
        self.outputs.insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_output_list(mut self, name: &str, values: &[&str]) -> Self {
        self.lists
            .insert(name.to_string(), values.iter().map(ToString::to_string).collect());
        self
    }

    pub fn with_plan(self, plan: PlanResult) -> Self {
        self.plans.lock().unwrap().push_back(Ok(plan));
        self
    }

    pub fn with_plan_error(self, error: ToolError) -> Self {
        self.plans.lock().unwrap().push_back(Err(error));
        self
    }

    pub fn with_apply_all_error(mut self, error: ToolError) -> Self {
        self.apply_all_error = Some(error);
        self
    }

    pub fn with_dry_plan_error(mut self, error: ToolError) -> Self {
        self.plan_error = Some(error);
        self
    }

    pub fn with_destroy_error(mut self, error: ToolError) -> Self {
        self.destroy_error = Some(error);
        self
    }

    pub fn panicking_on_apply(mut self) -> Self {
        self.panic_on_apply_all = true;
        self
    }

    /// Records whether `path` exists each time a plan is shown.
    pub fn watching(mut self, path: PathBuf) -> Self {
        self.watched = Some(path);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().iter().map(|(c, _)| c.clone()).collect()
    }

    pub fn options_for(&self, call: &Call) -> Vec<ToolOptions> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, _)| c == call)
            .map(|(_, o)| o.clone())
            .collect()
    }

    pub fn count(&self, call: &Call) -> usize {
        self.calls().iter().filter(|c| *c == call).count()
    }

    pub fn watched_seen(&self) -> Vec<bool> {
        self.watched_seen.lock().unwrap().clone()
    }

    fn record(&self, call: Call, options: &ToolOptions) {
        self.calls.lock().unwrap().push((call, options.clone()));
    }
}

#[async_trait]
impl Provisioner for ScriptedProvisioner {
    async fn validate(&self, options: &ToolOptions) -> Result<(), ToolError> {
        self.record(Call::Validate, options);
        Ok(())
    }

    async fn plan(&self, options: &ToolOptions) -> Result<(), ToolError> {
        self.record(Call::Plan, options);
        self.plan_error.clone().map_or(Ok(()), Err)
    }

    async fn plan_and_show(&self, options: &ToolOptions) -> Result<PlanResult, ToolError> {
        self.record(Call::PlanAndShow, options);
        if let Some(path) = &self.watched {
            self.watched_seen.lock().unwrap().push(path.exists());
        }
        self.plans
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(PlanResult::default()))
    }

    async fn apply_all(&self, options: &ToolOptions) -> Result<(), ToolError> {
        self.record(Call::ApplyAll, options);
        assert!(!self.panic_on_apply_all, "provider crashed");
        self.apply_all_error.clone().map_or(Ok(()), Err)
    }

    async fn apply(&self, options: &ToolOptions) -> Result<(), ToolError> {
        self.record(Call::Apply, options);
        Ok(())
    }

    async fn destroy_all(&self, options: &ToolOptions) -> Result<(), ToolError> {
        self.record(Call::Destroy, options);
        self.destroy_error.clone().map_or(Ok(()), Err)
    }

    async fn read_output(&self, options: &ToolOptions, name: &str) -> Result<String, ToolError> {
        self.record(Call::Output(name.to_string()), options);
        self.outputs
            .get(name)
            .cloned()
            .ok_or_else(|| ToolError::OutputNotFound {
                name: name.to_string(),
            })
    }

    async fn read_output_list(
        &self,
        options: &ToolOptions,
        name: &str,
    ) -> Result<Vec<String>, ToolError> {
        self.record(Call::OutputList(name.to_string()), options);
        self.lists
            .get(name)
            .cloned()
            .ok_or_else(|| ToolError::OutputNotFound {
                name: name.to_string(),
            })
    }
}
