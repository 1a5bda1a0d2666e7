//! Terra skeleton CLI entrypoint.
//!
//! This is the main entrypoint for the terra-skeleton command-line tool.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use terra_skeleton::cli::{Cli, Commands, GoldenCommands, OutputFormat, OutputFormatter};
use terra_skeleton::config::{ConfigParser, ConfigValidator, SuiteConfig, find_config_file};
use terra_skeleton::error::{ConfigError, Result, SkeletonError};
use terra_skeleton::lifecycle::{Lifecycle, ensure_from_sample};
use terra_skeleton::names::generate_azure_random_names;
use terra_skeleton::report::RunReport;
use terra_skeleton::tool::TerraformCli;

use clap::Parser;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.verbose, matches!(cli.output, OutputFormat::Json));

    // Run async runtime
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initializes the logging system. Logs go to stderr so that reports on
/// stdout stay machine-readable.
fn init_logging(verbose: bool, json: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Main async entry point.
async fn run(cli: Cli) -> Result<()> {
    let formatter = OutputFormatter::new(cli.output);

    match cli.command {
        Commands::Validate {
            warnings,
            suite_only,
        } => cmd_validate(cli.config.as_ref(), warnings, suite_only, &formatter).await,
        Commands::Plan => cmd_plan(cli.config.as_ref(), &formatter).await,
        Commands::Apply { keep } => cmd_apply(cli.config.as_ref(), keep, &formatter).await,
        Commands::Test => cmd_test(cli.config.as_ref(), &formatter).await,
        Commands::Golden { command } => cmd_golden(cli.config.as_ref(), command, &formatter).await,
        Commands::Names => {
            emit(&formatter.format_names(&generate_azure_random_names()));
            Ok(())
        }
    }
}

/// Validate the suite and the module code.
async fn cmd_validate(
    config_path: Option<&PathBuf>,
    show_warnings: bool,
    suite_only: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let (config, base_dir) = load_suite(config_path)?;

    let result = ConfigValidator::new().check(&config);
    emit(&formatter.format_validation(&result, &config, show_warnings));
    ConfigValidator::new().validate(&config)?;

    if suite_only {
        return Ok(());
    }

    bootstrap(&config, &base_dir);
    let tool = TerraformCli::new();
    let report = Lifecycle::new(&tool)
        .validate_code(config.tool_options(&base_dir))
        .await;
    finish(&report, formatter)
}

/// Plan-only run: the plan must fail with the expected errors, or succeed
/// when none are expected.
async fn cmd_plan(config_path: Option<&PathBuf>, formatter: &OutputFormatter) -> Result<()> {
    let (config, base_dir) = load_valid_suite(config_path)?;
    bootstrap(&config, &base_dir);

    let tool = TerraformCli::new();
    let report = Lifecycle::new(&tool)
        .plan_check_errors(
            config.tool_options(&base_dir),
            &config.error_assertions(),
            &config.no_errors_message,
        )
        .await;
    finish(&report, formatter)
}

/// Full lifecycle run.
async fn cmd_apply(
    config_path: Option<&PathBuf>,
    keep: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let (config, base_dir) = load_valid_suite(config_path)?;
    bootstrap(&config, &base_dir);

    let mut spec = config.lifecycle_spec()?;
    if keep {
        info!("Infrastructure will be kept after the run");
        spec.destroy_at_end = false;
    }

    let tool = TerraformCli::new();
    let report = Lifecycle::new(&tool)
        .run(config.tool_options(&base_dir), &spec)
        .await;
    finish(&report, formatter)
}

/// Plan-only by default; a full lifecycle when `DO_APPLY` is set.
async fn cmd_test(config_path: Option<&PathBuf>, formatter: &OutputFormatter) -> Result<()> {
    if ConfigParser::do_apply() {
        info!("DO_APPLY is set, running the full lifecycle");
        cmd_apply(config_path, false, formatter).await
    } else {
        debug!("DO_APPLY is not set, running a plan-only test");
        cmd_plan(config_path, formatter).await
    }
}

/// Golden file capture and check.
async fn cmd_golden(
    config_path: Option<&PathBuf>,
    command: GoldenCommands,
    formatter: &OutputFormatter,
) -> Result<()> {
    let (config, base_dir) = load_valid_suite(config_path)?;
    bootstrap(&config, &base_dir);

    let options = config.tool_options(&base_dir);
    let tool = TerraformCli::new();
    let lifecycle = Lifecycle::new(&tool);

    match command {
        GoldenCommands::Capture { file } => {
            let path = golden_path(&config, file, &options.working_dir)?;
            let golden = lifecycle.golden_capture(options, &path).await?;
            emit(&formatter.format_golden(&golden, &path));
            Ok(())
        }
        GoldenCommands::Check { file } => {
            let path = golden_path(&config, file, &options.working_dir)?;
            let report = lifecycle.golden_check(options, &path).await?;
            finish(&report, formatter)
        }
    }
}

/// Resolves the golden file from the flag or the suite.
fn golden_path(config: &SuiteConfig, flag: Option<PathBuf>, module_dir: &Path) -> Result<PathBuf> {
    let path = flag.or_else(|| config.golden.clone()).ok_or_else(|| {
        SkeletonError::Config(ConfigError::validation(
            "No golden file given; pass --file or set `golden` in the suite",
            "golden",
        ))
    })?;

    Ok(if path.is_absolute() {
        path
    } else {
        module_dir.join(path)
    })
}

/// Creates missing files from their samples. Failures are logged only.
fn bootstrap(config: &SuiteConfig, base_dir: &Path) {
    let module_dir = config.module_dir(base_dir);
    for file in &config.bootstrap {
        let sample = module_dir.join(&file.sample);
        let active = module_dir.join(&file.active);
        if let Err(e) = ensure_from_sample(&sample, &active) {
            warn!(
                "Could not create {} from {}: {e}",
                active.display(),
                sample.display()
            );
        }
    }
}

/// Prints the report and turns a failed run into an error.
fn finish(report: &RunReport, formatter: &OutputFormatter) -> Result<()> {
    emit(&formatter.format_report(report));

    if report.is_success() {
        Ok(())
    } else {
        Err(SkeletonError::internal(format!(
            "run '{}' failed with {} finding(s)",
            report.run,
            report.failure_count()
        )))
    }
}

/// Writes command output to stdout.
fn emit(output: &str) {
    let mut stdout = std::io::stdout().lock();
    let _ = writeln!(stdout, "{output}");
}

/// Resolves the suite file path from the flag or by searching upwards.
fn resolve_config_path(config_path: Option<&PathBuf>) -> Result<PathBuf> {
    config_path.map_or_else(|| find_config_file("."), |p| Ok(p.clone()))
}

/// Loads `.env` and the suite, returning it with its directory.
fn load_suite(config_path: Option<&PathBuf>) -> Result<(SuiteConfig, PathBuf)> {
    let config_file = resolve_config_path(config_path)?;
    let base_dir = config_file
        .parent()
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);

    let parser = ConfigParser::new().with_base_path(&base_dir);
    parser.load_dotenv()?;
    let config = parser.load_with_env(&config_file)?;

    Ok((config, base_dir))
}

/// Loads the suite and rejects it when invalid.
fn load_valid_suite(config_path: Option<&PathBuf>) -> Result<(SuiteConfig, PathBuf)> {
    let (config, base_dir) = load_suite(config_path)?;
    let result = ConfigValidator::new().validate(&config)?;
    for warning in &result.warnings {
        warn!("{warning}");
    }
    Ok((config, base_dir))
}
