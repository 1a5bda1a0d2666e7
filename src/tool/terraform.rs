//! Terraform command-line adapter.
//!
//! This module drives the `terraform` binary (or a compatible one, such as
//! `tofu`) as a subprocess, one command at a time.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, error, info, warn};

use crate::error::ToolError;

use super::options::{DEFAULT_PLAN_FILE, ToolOptions};
use super::plan::PlanResult;
use super::provisioner::Provisioner;

/// Captured output of one tool command.
#[derive(Debug, Clone)]
struct CommandOutput {
    stdout: String,
    stderr: String,
}

/// Provisioner backed by the Terraform CLI.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerraformCli;

impl TerraformCli {
    /// Creates a new Terraform adapter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Runs a command, retrying transient failures per the options' policy.
    async fn run(&self, options: &ToolOptions, args: &[String]) -> Result<CommandOutput, ToolError> {
        let patterns = options.retry.compiled_patterns();
        let max_retries = options.retry.max_retries;
        let mut last_error = None;

        for attempt in 0..=max_retries {
            if attempt > 0 {
                debug!("Retry attempt {attempt} of {max_retries}");
                tokio::time::sleep(options.retry.time_between_retries).await;
            }

            match self.run_once(options, args).await {
                Ok(output) => return Ok(output),
                Err(e) => {
                    if e.is_retryable(&patterns) {
                        warn!("Transient error from {}: {e}", args.join(" "));
                        last_error = Some(e);
                        continue;
                    }
                    return Err(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| ToolError::InvalidOutput {
            command: command_line(options, args),
            message: String::from("Max retries exceeded"),
        }))
    }

    /// Runs a command once.
    async fn run_once(
        &self,
        options: &ToolOptions,
        args: &[String],
    ) -> Result<CommandOutput, ToolError> {
        let command = command_line(options, args);
        debug!("Running `{command}` in {}", options.working_dir.display());

        let mut cmd = Command::new(&options.binary);
        cmd.args(args)
            .current_dir(&options.working_dir)
            .envs(&options.env)
            .env("TF_IN_AUTOMATION", "1")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd.spawn().map_err(|e| ToolError::Spawn {
            binary: options.binary.clone(),
            message: e.to_string(),
        })?;

        let output = match options.timeout {
            Some(timeout) => wait_with_timeout(child, timeout, &command).await?,
            None => child.wait_with_output().await.map_err(|e| ToolError::Spawn {
                binary: options.binary.clone(),
                message: e.to_string(),
            })?,
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if output.status.success() {
            Ok(CommandOutput { stdout, stderr })
        } else {
            error!("`{command}` exited with {:?}", output.status.code());
            Err(ToolError::CommandFailed {
                command,
                exit_code: output.status.code(),
                stderr: if stderr.trim().is_empty() { stdout } else { stderr },
            })
        }
    }

    async fn init(&self, options: &ToolOptions) -> Result<(), ToolError> {
        info!("Initializing {}", options.working_dir.display());
        let args = vec![
            String::from("init"),
            format!("-upgrade={}", options.upgrade),
            String::from("-input=false"),
            String::from("-no-color"),
        ];
        self.run(options, &args).await.map(|_| ())
    }

    /// Runs `plan`, writing the plan file when one is configured.
    async fn run_plan(&self, options: &ToolOptions) -> Result<(), ToolError> {
        let mut args = vec![
            String::from("plan"),
            String::from("-input=false"),
            format!("-lock={}", options.lock),
            String::from("-no-color"),
        ];
        args.extend(options.variable_args());
        if let Some(plan_file) = &options.plan_file {
            args.push(format!("-out={}", plan_file.display()));
        }
        self.run(options, &args).await.map(|_| ())
    }

    async fn read_output_json(
        &self,
        options: &ToolOptions,
        name: &str,
    ) -> Result<serde_json::Value, ToolError> {
        let args = vec![
            String::from("output"),
            String::from("-no-color"),
            String::from("-json"),
            name.to_string(),
        ];

        let output = match self.run(options, &args).await {
            Ok(output) => output,
            Err(ToolError::CommandFailed { stderr, .. }) if is_output_missing(&stderr, name) => {
                return Err(ToolError::OutputNotFound {
                    name: name.to_string(),
                });
            }
            Err(e) => return Err(e),
        };

        serde_json::from_str(output.stdout.trim()).map_err(|e| ToolError::InvalidOutput {
            command: command_line(options, &args),
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl Provisioner for TerraformCli {
    async fn validate(&self, options: &ToolOptions) -> Result<(), ToolError> {
        self.init(options).await?;
        info!("Validating {}", options.working_dir.display());
        let args = vec![String::from("validate"), String::from("-no-color")];
        self.run(options, &args).await.map(|_| ())
    }

    async fn plan(&self, options: &ToolOptions) -> Result<(), ToolError> {
        self.init(options).await?;
        info!("Planning {}", options.working_dir.display());
        self.run_plan(options).await
    }

    async fn plan_and_show(&self, options: &ToolOptions) -> Result<PlanResult, ToolError> {
        let mut options = options.clone();
        let plan_file = options
            .plan_file
            .get_or_insert_with(|| DEFAULT_PLAN_FILE.into())
            .clone();

        self.init(&options).await?;
        info!("Planning {} into {}", options.working_dir.display(), plan_file.display());
        self.run_plan(&options).await?;

        let args = vec![
            String::from("show"),
            String::from("-json"),
            plan_file.display().to_string(),
        ];
        let output = self.run(&options, &args).await?;

        PlanResult::from_json(output.stdout.trim()).map_err(|e| ToolError::InvalidOutput {
            command: command_line(&options, &args),
            message: e.to_string(),
        })
    }

    async fn apply_all(&self, options: &ToolOptions) -> Result<(), ToolError> {
        self.init(options).await?;
        let options = ToolOptions {
            plan_file: None,
            ..options.clone()
        };
        self.apply(&options).await
    }

    async fn apply(&self, options: &ToolOptions) -> Result<(), ToolError> {
        info!("Applying {}", options.working_dir.display());
        let mut args = vec![
            String::from("apply"),
            String::from("-input=false"),
            String::from("-auto-approve"),
            format!("-lock={}", options.lock),
            String::from("-no-color"),
        ];
        // A saved plan already carries its variables
        match &options.plan_file {
            Some(plan_file) => args.push(plan_file.display().to_string()),
            None => args.extend(options.variable_args()),
        }
        let output = self.run(options, &args).await?;
        if !output.stderr.trim().is_empty() {
            debug!("apply stderr: {}", output.stderr.trim());
        }
        Ok(())
    }

    async fn destroy_all(&self, options: &ToolOptions) -> Result<(), ToolError> {
        info!("Destroying {}", options.working_dir.display());
        let mut args = vec![
            String::from("destroy"),
            String::from("-auto-approve"),
            String::from("-input=false"),
            format!("-lock={}", options.lock),
            String::from("-no-color"),
        ];
        args.extend(options.variable_args());
        self.run(options, &args).await.map(|_| ())
    }

    async fn read_output(&self, options: &ToolOptions, name: &str) -> Result<String, ToolError> {
        let value = self.read_output_json(options, name).await?;
        Ok(value_to_text(&value))
    }

    async fn read_output_list(
        &self,
        options: &ToolOptions,
        name: &str,
    ) -> Result<Vec<String>, ToolError> {
        match self.read_output_json(options, name).await? {
            serde_json::Value::Array(items) => Ok(items.iter().map(value_to_text).collect()),
            other => Err(ToolError::InvalidOutput {
                command: format!("{} output -json {name}", options.binary),
                message: format!("expected a list, got {other}"),
            }),
        }
    }
}

/// Waits for a child, killing it once the timeout elapses.
async fn wait_with_timeout(
    child: tokio::process::Child,
    timeout: Duration,
    command: &str,
) -> Result<std::process::Output, ToolError> {
    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(e)) => Err(ToolError::Spawn {
            binary: command.to_string(),
            message: e.to_string(),
        }),
        // Dropping the future drops the child, and kill_on_drop reaps it
        Err(_) => Err(ToolError::Timeout {
            command: command.to_string(),
            timeout,
        }),
    }
}

fn command_line(options: &ToolOptions, args: &[String]) -> String {
    format!("{} {}", options.binary, args.join(" "))
}

/// Strings are returned raw, everything else as compact JSON.
fn value_to_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn is_output_missing(stderr: &str, name: &str) -> bool {
    stderr.contains(&format!("Output \"{name}\" not found"))
        || stderr.contains("The output variable requested could not be found")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::options::RetryPolicy;
    #[cfg(unix)]
    use crate::tool::plan::Action;
    use serde_json::json;

    #[test]
    fn test_value_to_text() {
        assert_eq!(value_to_text(&json!("1.2.3.4")), "1.2.3.4");
        assert_eq!(value_to_text(&json!(3)), "3");
        assert_eq!(value_to_text(&json!({"a": 1})), "{\"a\":1}");
    }

    #[test]
    fn test_output_missing_detection() {
        let stderr = "\n│ Error: Output \"public_ip\" not found\n│\n";
        assert!(is_output_missing(stderr, "public_ip"));
        assert!(!is_output_missing(stderr, "private_ip"));
    }

    #[test]
    fn test_missing_binary_is_spawn_error() {
        let options = ToolOptions {
            binary: String::from("terraform-binary-that-does-not-exist"),
            ..ToolOptions::default_for(std::env::temp_dir())
        }
        .with_retry(RetryPolicy::none());

        let err = tokio_test::block_on(TerraformCli::new().validate(&options)).unwrap_err();
        assert!(matches!(err, ToolError::Spawn { .. }));
    }

    #[test]
    fn test_command_line() {
        let options = ToolOptions::default_for(".");
        let args = vec![String::from("output"), String::from("-json")];
        assert_eq!(command_line(&options, &args), "terraform output -json");
    }

    /// Stand-in tool binary: logs its arguments, fails `STUB_FAILS` times
    /// with `STUB_STDERR`, then answers `show` and `output`.
    #[cfg(unix)]
    const STUB: &str = r##"#!/bin/sh
echo "$*" >> "$STUB_LOG"
count=$(cat "$STUB_COUNT" 2>/dev/null || echo 0)
if [ "$count" -lt "$STUB_FAILS" ]; then
    echo $((count + 1)) > "$STUB_COUNT"
    echo "$STUB_STDERR" >&2
    exit 1
fi
case "$1" in
    show)
        echo '{"resource_changes":[{"address":"azurerm_subnet.this","change":{"actions":["update"]}}]}'
        ;;
    output)
        if [ "$4" = "public_ip" ]; then
            echo '"1.2.3.4"'
        else
            echo "Error: Output \"$4\" not found" >&2
            exit 1
        fi
        ;;
esac
"##;

    #[cfg(unix)]
    struct StubTool {
        dir: tempfile::TempDir,
    }

    #[cfg(unix)]
    impl StubTool {
        fn new() -> Self {
            use std::os::unix::fs::PermissionsExt;

            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("terraform");
            std::fs::write(&path, STUB).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            Self { dir }
        }

        fn options(&self, fails: u32, stderr: &str) -> ToolOptions {
            let path = |name: &str| self.dir.path().join(name).display().to_string();

            let mut options = ToolOptions::default_for(self.dir.path())
                .with_var_file("a.tfvars")
                .with_var("x", 1)
                .with_retry(RetryPolicy {
                    max_retries: 2,
                    time_between_retries: Duration::ZERO,
                    ..RetryPolicy::default()
                });
            options.binary = path("terraform");
            options.env.insert(String::from("STUB_LOG"), path("argv.log"));
            options.env.insert(String::from("STUB_COUNT"), path("count"));
            options.env.insert(String::from("STUB_FAILS"), fails.to_string());
            options.env.insert(String::from("STUB_STDERR"), stderr.to_string());
            options
        }

        fn invocations(&self) -> Vec<String> {
            std::fs::read_to_string(self.dir.path().join("argv.log"))
                .unwrap_or_default()
                .lines()
                .map(String::from)
                .collect()
        }
    }

    #[cfg(unix)]
    const INIT: &str = "init -upgrade=true -input=false -no-color";
    #[cfg(unix)]
    const RESET: &str = "Error: read: connection reset by peer";

    #[cfg(unix)]
    #[tokio::test]
    async fn test_transient_error_is_retried() {
        let stub = StubTool::new();

        TerraformCli::new()
            .validate(&stub.options(2, RESET))
            .await
            .unwrap();

        assert_eq!(
            stub.invocations(),
            vec![INIT, INIT, INIT, "validate -no-color"]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_retries_are_bounded() {
        let stub = StubTool::new();

        let err = TerraformCli::new()
            .validate(&stub.options(10, RESET))
            .await
            .unwrap_err();

        assert!(matches!(&err, ToolError::CommandFailed { stderr, .. } if stderr.contains("connection reset")));
        assert_eq!(stub.invocations().len(), 3);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_non_transient_error_is_not_retried() {
        let stub = StubTool::new();

        let err = TerraformCli::new()
            .validate(&stub.options(10, "Error: Invalid value for variable"))
            .await
            .unwrap_err();

        assert!(err.tool_message().contains("Invalid value for variable"));
        assert_eq!(stub.invocations(), vec![INIT]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_plan_and_show_writes_and_reads_plan_file() {
        let stub = StubTool::new();

        let plan = TerraformCli::new()
            .plan_and_show(&stub.options(0, ""))
            .await
            .unwrap();

        assert_eq!(
            plan.resource_changes["azurerm_subnet.this"].actions,
            vec![Action::Update]
        );
        assert_eq!(
            stub.invocations(),
            vec![
                INIT,
                "plan -input=false -lock=true -no-color -var-file=a.tfvars -var=x=1 -out=test.plan",
                "show -json test.plan",
            ]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_apply_destroy_command_lines() {
        let stub = StubTool::new();
        let tool = TerraformCli::new();
        let options = stub.options(0, "").with_plan_file("test.plan");

        tool.apply(&options).await.unwrap();
        tool.apply_all(&options).await.unwrap();
        tool.destroy_all(&options).await.unwrap();

        assert_eq!(
            stub.invocations(),
            vec![
                "apply -input=false -auto-approve -lock=true -no-color test.plan",
                INIT,
                "apply -input=false -auto-approve -lock=true -no-color -var-file=a.tfvars -var=x=1",
                "destroy -auto-approve -input=false -lock=true -no-color -var-file=a.tfvars -var=x=1",
            ]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_read_output() {
        let stub = StubTool::new();
        let tool = TerraformCli::new();
        let options = stub.options(0, "");

        assert_eq!(tool.read_output(&options, "public_ip").await.unwrap(), "1.2.3.4");
        assert!(matches!(
            tool.read_output(&options, "private_ip").await,
            Err(ToolError::OutputNotFound { name }) if name == "private_ip"
        ));
    }
}
