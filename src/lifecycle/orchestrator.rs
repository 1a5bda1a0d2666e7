//! Lifecycle orchestrator.
//!
//! Drives one module through deploy, output assertions, the no-change
//! check and change scenarios, then tears it down. Teardown runs exactly
//! once when requested, whatever happened before it, including a panic.

use std::panic::{AssertUnwindSafe, resume_unwind};
use std::path::Path;

use futures::FutureExt;
use tracing::{error, info, warn};

use crate::assertion::{AssertExpression, AssertionEngine};
use crate::error::Result;
use crate::golden::GoldenPlan;
use crate::report::{Finding, FindingKind, RunReport, TeardownStatus};
use crate::tool::{DEFAULT_PLAN_FILE, Provisioner, ToolOptions};
use crate::verify::verify_plan;

use super::scenario::{AdditionalChangesAfterDeployment, LifecycleSpec};
use super::staging::StagedFile;

/// Runs lifecycles against one provisioner.
pub struct Lifecycle<'a, P: Provisioner + ?Sized> {
    provisioner: &'a P,
    engine: AssertionEngine,
}

impl<'a, P: Provisioner + ?Sized> Lifecycle<'a, P> {
    /// Creates an orchestrator over `provisioner`.
    #[must_use]
    pub const fn new(provisioner: &'a P) -> Self {
        Self {
            provisioner,
            engine: AssertionEngine::new(),
        }
    }

    /// Deploys, checks outputs and destroys.
    pub async fn deploy_check_outputs(
        &self,
        options: ToolOptions,
        assertions: Vec<AssertExpression>,
    ) -> RunReport {
        self.run(options, &LifecycleSpec::check_outputs(assertions)).await
    }

    /// Deploys, checks outputs, checks that nothing is left to change and
    /// destroys.
    pub async fn deploy_check_outputs_verify_changes(
        &self,
        options: ToolOptions,
        assertions: Vec<AssertExpression>,
    ) -> RunReport {
        self.run(options, &LifecycleSpec::check_outputs_verify_changes(assertions))
            .await
    }

    /// As [`Self::deploy_check_outputs_verify_changes`], then plans, verifies
    /// and applies each change scenario before destroying.
    pub async fn deploy_check_outputs_verify_changes_deploy_changes(
        &self,
        options: ToolOptions,
        assertions: Vec<AssertExpression>,
        additional_changes: Vec<AdditionalChangesAfterDeployment>,
    ) -> RunReport {
        let spec =
            LifecycleSpec::check_outputs_verify_changes_deploy_changes(assertions, additional_changes);
        self.run(options, &spec).await
    }

    /// Deploys only. The infrastructure is left in place.
    pub async fn deploy_no_check_outputs_no_destroy(&self, options: ToolOptions) -> RunReport {
        self.run(options, &LifecycleSpec::deploy_only()).await
    }

    /// Runs the lifecycle described by `spec`.
    ///
    /// # Panics
    ///
    /// A panic raised while running the phases (for instance by a provisioner)
    /// is resumed after teardown has run.
    pub async fn run(&self, options: ToolOptions, spec: &LifecycleSpec) -> RunReport {
        let mut report = RunReport::start("deploy", &options);
        info!("Starting lifecycle in {}", options.working_dir.display());

        let outcome = AssertUnwindSafe(self.run_phases(&mut report, spec))
            .catch_unwind()
            .await;

        if spec.destroy_at_end {
            report.teardown = self.teardown(&report.options).await;
        }

        if let Err(panic) = outcome {
            error!("Lifecycle panicked; infrastructure teardown has been attempted");
            resume_unwind(panic);
        }

        let report = report.finish();
        info!(
            "Lifecycle finished with {} finding(s)",
            report.failure_count()
        );
        report
    }

    async fn run_phases(&self, report: &mut RunReport, spec: &LifecycleSpec) {
        info!("Deploying {}", report.options.working_dir.display());
        if let Err(e) = self.provisioner.apply_all(&report.options).await {
            error!("Deployment failed: {e}");
            report.findings.push(Finding::tool("apply", &e));
            return;
        }

        if !spec.assertions.is_empty() {
            info!("Checking {} output assertion(s)", spec.assertions.len());
            let findings = self
                .engine
                .assert_outputs(self.provisioner, &report.options, &spec.assertions)
                .await;
            report.findings.extend(findings);
        }

        if spec.check_no_changes {
            info!("Checking that no changes are planned after deployment");
            report.options.plan_file = Some(DEFAULT_PLAN_FILE.into());
            match self.provisioner.plan_and_show(&report.options).await {
                Ok(plan) => report.findings.extend(verify_plan(&plan, None)),
                Err(e) => {
                    report.findings.push(Finding::tool("plan", &e));
                    return;
                }
            }
        }

        for (index, scenario) in spec.additional_changes.iter().enumerate() {
            if !self.run_scenario(report, scenario, index + 1).await {
                return;
            }
        }
    }

    /// Plans, verifies and applies one scenario. Returns false when a tool
    /// error stops the run.
    async fn run_scenario(
        &self,
        report: &mut RunReport,
        scenario: &AdditionalChangesAfterDeployment,
        number: usize,
    ) -> bool {
        info!("Running change scenario {number}");
        let options = &mut report.options;

        if !scenario.use_var_files.is_empty() {
            options.var_files.clone_from(&scenario.use_var_files);
        }
        options.merge_vars(&scenario.additional_vars_values);

        let staged = scenario
            .file_name_with_tf_code
            .as_deref()
            .and_then(|file| StagedFile::stage(&options.resolve(file)));

        options.plan_file = Some(DEFAULT_PLAN_FILE.into());
        let planned = self.provisioner.plan_and_show(options).await;
        drop(staged);

        let phase = format!("scenario {number} plan");
        match planned {
            Ok(plan) => {
                let expected = scenario.expected_changes();
                report.findings.extend(verify_plan(&plan, Some(&expected)));
            }
            Err(e) => {
                report.findings.push(Finding::tool(&phase, &e));
                return false;
            }
        }

        if !report.findings.is_empty() {
            warn!(
                "Skipping apply of scenario {number}: {} finding(s) recorded so far",
                report.findings.len()
            );
            return true;
        }

        info!("Applying change scenario {number}");
        if let Err(e) = self.provisioner.apply(&report.options).await {
            report
                .findings
                .push(Finding::tool(&format!("scenario {number} apply"), &e));
            return false;
        }
        true
    }

    async fn teardown(&self, options: &ToolOptions) -> TeardownStatus {
        info!("Destroying {}", options.working_dir.display());
        match self.provisioner.destroy_all(options).await {
            Ok(()) => TeardownStatus::Completed,
            Err(e) => {
                warn!("Teardown failed, infrastructure may still exist: {e}");
                TeardownStatus::Failed {
                    error: e.to_string(),
                }
            }
        }
    }

    /// Plans without deploying and checks the plan's errors.
    ///
    /// With assertions, the plan is expected to fail and its error is checked
    /// against them; a successful plan fails with `no_errors_message`.
    /// Without assertions, the plan is expected to succeed.
    pub async fn plan_check_errors(
        &self,
        options: ToolOptions,
        assertions: &[AssertExpression],
        no_errors_message: &str,
    ) -> RunReport {
        let mut report = RunReport::start("plan", &options);
        info!("Planning {}", options.working_dir.display());

        match self.provisioner.plan(&options).await {
            Err(e) if !assertions.is_empty() => {
                info!("Plan failed as expected, checking {} error assertion(s)", assertions.len());
                report.findings.extend(self.engine.assert_errors(&e, assertions));
            }
            Err(e) => {
                error!("Plan failed: {e}");
                report.findings.push(Finding::new(
                    FindingKind::Tool,
                    "plan",
                    format!("{no_errors_message}: {}", e.tool_message().trim()),
                ));
            }
            Ok(()) if !assertions.is_empty() => {
                report
                    .findings
                    .push(Finding::new(FindingKind::Tool, "plan", no_errors_message));
            }
            Ok(()) => {}
        }

        report.finish()
    }

    /// Initializes and validates the module.
    pub async fn validate_code(&self, options: ToolOptions) -> RunReport {
        let mut report = RunReport::start("validate", &options);
        info!("Validating {}", options.working_dir.display());
        if let Err(e) = self.provisioner.validate(&options).await {
            report.findings.push(Finding::tool("validate", &e));
        }
        report.finish()
    }

    /// Plans the module and writes the plan's addresses to `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the plan fails or the file cannot be written.
    pub async fn golden_capture(&self, options: ToolOptions, path: &Path) -> Result<GoldenPlan> {
        let options = ToolOptions {
            plan_file: Some(options.plan_file.clone().unwrap_or_else(|| DEFAULT_PLAN_FILE.into())),
            ..options
        };
        let plan = self.provisioner.plan_and_show(&options).await?;
        let golden = GoldenPlan::capture(&plan);
        golden.save(path)?;
        Ok(golden)
    }

    /// Plans the module and checks it against the golden file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the golden file cannot be loaded. Plan failures
    /// are reported as findings.
    pub async fn golden_check(&self, options: ToolOptions, path: &Path) -> Result<RunReport> {
        let golden = GoldenPlan::load(path)?;
        let mut report = RunReport::start("golden", &options);
        report
            .options
            .plan_file
            .get_or_insert_with(|| DEFAULT_PLAN_FILE.into());

        match self.provisioner.plan_and_show(&report.options).await {
            Ok(plan) => report.findings.extend(golden.check(&plan)),
            Err(e) => report.findings.push(Finding::tool("plan", &e)),
        }
        Ok(report.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::fake::{Call, ScriptedProvisioner, failure};
    use crate::tool::{Action, PlanResult};
    use crate::verify::ChangedResource;
    use serde_json::json;
    use std::fs;
    use std::path::PathBuf;

    const SUBNET: &str = "module.vnet.azurerm_subnet.this[\"management\"]";

    fn options() -> ToolOptions {
        ToolOptions::default_for("modules/vnet").with_var("x", 1)
    }

    fn destroy_count(fake: &ScriptedProvisioner) -> usize {
        fake.count(&Call::Destroy)
    }

    #[tokio::test]
    async fn test_successful_deploy() {
        let fake = ScriptedProvisioner::new().with_output("public_ip", "1.2.3.4");
        let report = Lifecycle::new(&fake)
            .deploy_check_outputs_verify_changes(
                options(),
                vec![AssertExpression::starts_with("public_ip", "1.2")],
            )
            .await;

        report.assert_passed();
        assert_eq!(report.teardown, TeardownStatus::Completed);
        assert_eq!(
            fake.calls(),
            vec![
                Call::ApplyAll,
                Call::Output(String::from("public_ip")),
                Call::PlanAndShow,
                Call::Destroy,
            ]
        );
    }

    #[tokio::test]
    async fn test_teardown_once_on_apply_failure() {
        let fake = ScriptedProvisioner::new().with_apply_all_error(failure("Error: quota exceeded"));
        let report = Lifecycle::new(&fake)
            .deploy_check_outputs(options(), vec![AssertExpression::not_empty("public_ip")])
            .await;

        assert!(!report.is_success());
        assert_eq!(report.findings.len(), 1);
        assert_eq!(report.findings[0].kind, FindingKind::Tool);
        assert_eq!(fake.count(&Call::Output(String::from("public_ip"))), 0);
        assert_eq!(destroy_count(&fake), 1);
    }

    #[tokio::test]
    async fn test_teardown_once_on_assertion_failure() {
        let fake = ScriptedProvisioner::new().with_output("public_ip", "1.2.3.4");
        let report = Lifecycle::new(&fake)
            .deploy_check_outputs(options(), vec![AssertExpression::equal("public_ip", "9.9.9.9")])
            .await;

        assert_eq!(report.failure_count(), 1);
        assert_eq!(destroy_count(&fake), 1);
    }

    #[tokio::test]
    async fn test_teardown_once_on_verification_failure() {
        let fake = ScriptedProvisioner::new()
            .with_plan(PlanResult::default().with_change(SUBNET, &[Action::Update]));
        let report = Lifecycle::new(&fake)
            .deploy_check_outputs_verify_changes(options(), Vec::new())
            .await;

        assert_eq!(report.findings_of(FindingKind::UnexpectedChange).count(), 1);
        assert_eq!(destroy_count(&fake), 1);
        assert_eq!(
            fake.options_for(&Call::PlanAndShow)[0].plan_file,
            Some(PathBuf::from("test.plan"))
        );
    }

    #[tokio::test]
    async fn test_teardown_once_on_panic() {
        let fake = ScriptedProvisioner::new().panicking_on_apply();
        let lifecycle = Lifecycle::new(&fake);

        let outcome = AssertUnwindSafe(lifecycle.deploy_check_outputs(options(), Vec::new()))
            .catch_unwind()
            .await;

        assert!(outcome.is_err());
        assert_eq!(destroy_count(&fake), 1);
    }

    #[tokio::test]
    async fn test_no_destroy_when_not_requested() {
        let fake = ScriptedProvisioner::new();
        let report = Lifecycle::new(&fake)
            .deploy_no_check_outputs_no_destroy(options())
            .await;

        report.assert_passed();
        assert_eq!(report.teardown, TeardownStatus::NotRequested);
        assert_eq!(fake.calls(), vec![Call::ApplyAll]);
    }

    #[tokio::test]
    async fn test_teardown_failure_is_reported_not_a_finding() {
        let fake = ScriptedProvisioner::new().with_destroy_error(failure("Error: locked"));
        let report = Lifecycle::new(&fake)
            .deploy_check_outputs(options(), Vec::new())
            .await;

        assert!(report.findings.is_empty());
        assert!(matches!(report.teardown, TeardownStatus::Failed { .. }));
        assert!(!report.is_success());
    }

    #[tokio::test]
    async fn test_idempotent_second_plan() {
        let fake = ScriptedProvisioner::new().with_plan(
            PlanResult::default()
                .with_change("azurerm_resource_group.this", &[Action::NoOp])
                .with_change(SUBNET, &[Action::NoOp]),
        );
        let report = Lifecycle::new(&fake)
            .deploy_check_outputs_verify_changes(options(), Vec::new())
            .await;

        report.assert_passed();
    }

    #[tokio::test]
    async fn test_scenario_merges_vars_and_applies_saved_plan() {
        let fake = ScriptedProvisioner::new()
            .with_plan(PlanResult::default())
            .with_plan(PlanResult::default().with_change(SUBNET, &[Action::Update]));

        let scenario = AdditionalChangesAfterDeployment::new()
            .with_var("x", 2)
            .with_var_file("changed.tfvars")
            .expect(ChangedResource::new(SUBNET, Action::Update));

        let report = Lifecycle::new(&fake)
            .deploy_check_outputs_verify_changes_deploy_changes(
                options().with_var("y", "keep").with_var_file("base.tfvars"),
                Vec::new(),
                vec![scenario],
            )
            .await;

        report.assert_passed();
        let planned = &fake.options_for(&Call::PlanAndShow)[1];
        assert_eq!(planned.vars.get("x"), Some(&json!(2)));
        assert_eq!(planned.vars.get("y"), Some(&json!("keep")));
        assert_eq!(planned.var_files, vec![PathBuf::from("changed.tfvars")]);
        assert_eq!(fake.count(&Call::Apply), 1);

        let destroyed = &fake.options_for(&Call::Destroy)[0];
        assert_eq!(destroyed.vars.get("x"), Some(&json!(2)));
    }

    #[tokio::test]
    async fn test_scenario_apply_skipped_after_failure() {
        let fake = ScriptedProvisioner::new()
            .with_output("public_ip", "1.2.3.4")
            .with_plan(PlanResult::default().with_change(SUBNET, &[Action::Update]))
            .with_plan(PlanResult::default().with_change(SUBNET, &[Action::Update]));

        let scenario =
            AdditionalChangesAfterDeployment::new().expect(ChangedResource::new(SUBNET, Action::Update));

        let report = Lifecycle::new(&fake)
            .deploy_check_outputs_verify_changes_deploy_changes(
                options(),
                vec![AssertExpression::not_empty("public_ip")],
                vec![scenario],
            )
            .await;

        // The no-change check failed, so the scenario is planned but not applied
        assert_eq!(report.failure_count(), 1);
        assert_eq!(fake.count(&Call::PlanAndShow), 2);
        assert_eq!(fake.count(&Call::Apply), 0);
        assert_eq!(destroy_count(&fake), 1);
    }

    #[tokio::test]
    async fn test_scenario_stages_and_restores_code_file() {
        let dir = tempfile::tempdir().unwrap();
        let extra = dir.path().join("extra_subnet");
        fs::write(&extra, "resource \"null_resource\" \"x\" {}").unwrap();

        let fake = ScriptedProvisioner::new()
            .with_plan(PlanResult::default().with_change(SUBNET, &[Action::Create]))
            .watching(dir.path().join("extra_subnet.tf"));

        let scenario = AdditionalChangesAfterDeployment::new()
            .with_tf_code("extra_subnet")
            .expect(ChangedResource::new(SUBNET, Action::Create));

        let report = Lifecycle::new(&fake)
            .run(
                ToolOptions::default_for(dir.path()),
                &LifecycleSpec {
                    additional_changes: vec![scenario],
                    ..LifecycleSpec::default()
                },
            )
            .await;

        report.assert_passed();
        assert_eq!(fake.watched_seen(), vec![true]);
        assert!(extra.exists());
        assert!(!dir.path().join("extra_subnet.tf").exists());
    }

    #[tokio::test]
    async fn test_scenario_plan_error_stops_run() {
        let fake = ScriptedProvisioner::new().with_plan_error(failure("Error: provider crashed"));
        let scenarios = vec![
            AdditionalChangesAfterDeployment::new(),
            AdditionalChangesAfterDeployment::new(),
        ];

        let report = Lifecycle::new(&fake)
            .run(
                options(),
                &LifecycleSpec {
                    additional_changes: scenarios,
                    ..LifecycleSpec::default()
                },
            )
            .await;

        assert_eq!(report.failure_count(), 1);
        assert_eq!(report.findings[0].subject, "scenario 1 plan");
        assert_eq!(fake.count(&Call::PlanAndShow), 1);
        assert_eq!(destroy_count(&fake), 1);
    }

    #[tokio::test]
    async fn test_plan_check_errors() {
        let expected_error = vec![AssertExpression::error_contains("Invalid value for variable")];

        let fake = ScriptedProvisioner::new()
            .with_dry_plan_error(failure("Error: Invalid value for variable"));
        let lifecycle = Lifecycle::new(&fake);
        lifecycle
            .plan_check_errors(options(), &expected_error, "plan should fail")
            .await
            .assert_passed();

        let report = lifecycle
            .plan_check_errors(options(), &[], "plan should succeed")
            .await;
        assert_eq!(report.failure_count(), 1);
        assert!(report.findings[0].message.starts_with("plan should succeed"));

        let fake = ScriptedProvisioner::new();
        let lifecycle = Lifecycle::new(&fake);
        let report = lifecycle
            .plan_check_errors(options(), &expected_error, "plan should fail")
            .await;
        assert_eq!(report.findings[0].message, "plan should fail");
        lifecycle
            .plan_check_errors(options(), &[], "unused")
            .await
            .assert_passed();
        assert_eq!(fake.count(&Call::Destroy), 0);
    }

    #[tokio::test]
    async fn test_golden_capture_then_check() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plan.golden.json");
        let plan = PlanResult::default().with_change(SUBNET, &[Action::Create]);

        let fake = ScriptedProvisioner::new()
            .with_plan(plan.clone())
            .with_plan(PlanResult::default());
        let lifecycle = Lifecycle::new(&fake);

        let golden = lifecycle.golden_capture(options(), &path).await.unwrap();
        assert_eq!(golden.changed_values, vec![SUBNET]);

        let report = lifecycle.golden_check(options(), &path).await.unwrap();
        assert_eq!(report.findings_of(FindingKind::Golden).count(), 2);
    }
}
