//! Top-level CLI definition and dispatch.

use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;

use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::{Shell as CompletionShell, generate};
use colored::{Colorize, control};
use serde_json::{Value, json};
use thiserror::Error;

use lmkeeper::core::config::Config;
use lmkeeper::core::errors::LmkError;
use lmkeeper::platform::pal::{HostOs, detect_host_os};
use lmkeeper::service::setup::ServiceSetup;
use lmkeeper::status::classifier::OperationalState;
use lmkeeper::supervisor::engine::{ActionOutcome, ActionReport, StatusReport, Supervisor};

/// lmkeeper — keeps a FlexLM-style license server running and understood.
#[derive(Debug, Parser)]
#[command(
    name = "lmkeeper",
    author,
    version,
    about = "lmkeeper - FlexLM license server supervisor",
    long_about = None,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Override config file path.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Force JSON output mode.
    #[arg(long, global = true)]
    json: bool,
    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,
    /// Increase verbosity.
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,
    /// Quiet mode (errors only).
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Start the license server.
    Start,
    /// Stop the license server.
    Stop,
    /// Check the server and report state, diagnosis, and seat usage.
    Status,
    /// Show the resolved debug log and its tail.
    Log(LogArgs),
    /// Manage the OS service registration for lmgrd.
    Service(ServiceArgs),
    /// View and validate configuration state.
    Config(ConfigArgs),
    /// Show version and optional build metadata.
    Version(VersionArgs),
    /// Generate shell completions.
    Completions(CompletionsArgs),
}

#[derive(Debug, Clone, Args)]
struct LogArgs {
    /// Number of trailing lines to show.
    #[arg(long, default_value_t = 20, value_name = "N")]
    lines: usize,
    /// Print only the resolved log path.
    #[arg(long)]
    path_only: bool,
}

#[derive(Debug, Clone, Args)]
struct ServiceArgs {
    /// Service operation to run.
    #[command(subcommand)]
    command: ServiceCommand,
}

#[derive(Debug, Clone, Subcommand)]
enum ServiceCommand {
    /// Register lmgrd with the OS service manager.
    Register(RegisterArgs),
    /// Remove the lmgrd service registration.
    Unregister,
    /// Print the registration text that would be installed.
    Show,
}

#[derive(Debug, Clone, Args)]
struct RegisterArgs {
    /// Start the service at boot.
    #[arg(long)]
    on_boot: bool,
}

#[derive(Debug, Clone, Args)]
struct ConfigArgs {
    /// Config operation to run.
    #[command(subcommand)]
    command: Option<ConfigCommand>,
}

#[derive(Debug, Clone, Subcommand)]
enum ConfigCommand {
    /// Print resolved config file path.
    Path,
    /// Print effective merged configuration.
    Show,
    /// Validate configuration and exit.
    Validate,
}

#[derive(Debug, Clone, Args)]
struct VersionArgs {
    /// Show extended build metadata.
    #[arg(long)]
    verbose: bool,
}

#[derive(Debug, Clone, Args)]
struct CompletionsArgs {
    /// Target shell.
    #[arg(value_enum)]
    shell: CompletionShell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputMode {
    Human,
    Json,
}

/// CLI error type with explicit exit-code mapping.
#[derive(Debug, Error)]
pub enum CliError {
    /// Invalid user input at runtime.
    #[error("{0}")]
    User(String),
    /// Environment/runtime failure.
    #[error("{0}")]
    Runtime(String),
    /// Internal bug or invariant violation.
    #[error("{0}")]
    Internal(String),
    /// Operation partially succeeded.
    #[error("{0}")]
    Partial(String),
    /// JSON serialization failed.
    #[error("failed to serialize output: {0}")]
    Json(#[from] serde_json::Error),
    /// Output write failed.
    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),
}

impl CliError {
    /// Process exit code contract for the CLI.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::User(_) => 1,
            Self::Runtime(_) | Self::Io(_) => 2,
            Self::Internal(_) | Self::Json(_) => 3,
            Self::Partial(_) => 4,
        }
    }
}

/// Map domain errors onto the CLI exit-code contract. Configuration and
/// endpoint mistakes are user errors; everything the environment did wrong
/// is a runtime error.
fn domain(error: LmkError) -> CliError {
    match error {
        LmkError::InvalidConfig { .. }
        | LmkError::MissingConfig { .. }
        | LmkError::ConfigParse { .. }
        | LmkError::MissingFile { .. }
        | LmkError::PermissionDenied { .. } => CliError::User(error.to_string()),
        LmkError::Serialization { .. } => CliError::Internal(error.to_string()),
        _ => CliError::Runtime(error.to_string()),
    }
}

/// Dispatch CLI commands.
pub fn run(cli: &Cli) -> Result<(), CliError> {
    if cli.no_color {
        control::set_override(false);
    }

    match &cli.command {
        Command::Start => run_start(cli),
        Command::Stop => run_stop(cli),
        Command::Status => run_status(cli),
        Command::Log(args) => run_log(cli, args),
        Command::Service(args) => run_service(cli, args),
        Command::Config(args) => run_config(cli, args),
        Command::Version(args) => emit_version(cli, args),
        Command::Completions(args) => {
            let mut command = Cli::command();
            let binary_name = command.get_name().to_string();
            generate(args.shell, &mut command, binary_name, &mut io::stdout());
            Ok(())
        }
    }
}

fn load_config(cli: &Cli) -> Result<Config, CliError> {
    Config::load(cli.config.as_deref()).map_err(domain)
}

fn supervisor(cli: &Cli) -> Result<Supervisor, CliError> {
    Supervisor::new(load_config(cli)?).map_err(domain)
}

fn run_start(cli: &Cli) -> Result<(), CliError> {
    let report = supervisor(cli)?.start().map_err(domain)?;
    emit_action(cli, &report)?;
    if let ActionOutcome::LaunchFailed { output, .. } = &report.outcome {
        return Err(CliError::Runtime(format!(
            "lmgrd exited during startup: {}",
            output.trim()
        )));
    }
    Ok(())
}

fn run_stop(cli: &Cli) -> Result<(), CliError> {
    let report = supervisor(cli)?.stop().map_err(domain)?;
    emit_action(cli, &report)
}

fn emit_action(cli: &Cli, report: &ActionReport) -> Result<(), CliError> {
    match output_mode(cli) {
        OutputMode::Human => {
            if cli.quiet {
                return Ok(());
            }
            match &report.outcome {
                ActionOutcome::Completed => {
                    let via = report
                        .via_service
                        .as_ref()
                        .map_or_else(String::new, |name| format!(" via service \"{name}\""));
                    println!("{} request issued{via}.", report.action);
                    if report.action == "stop" {
                        println!("The server port may take a while to free; actions stay disabled during the cooldown.");
                    }
                }
                ActionOutcome::CoolingDown { remaining_secs } => {
                    println!(
                        "A recent stop is still cooling down; try again in {remaining_secs} s."
                    );
                }
                ActionOutcome::LaunchFailed { exit_code, output } => {
                    println!(
                        "{} lmgrd exited with code {exit_code} instead of staying up:",
                        "launch failed:".red()
                    );
                    println!("{}", output.trim());
                }
            }
        }
        OutputMode::Json => {
            let payload = serde_json::to_value(report)?;
            write_json_line(&payload)?;
        }
    }
    Ok(())
}

fn run_status(cli: &Cli) -> Result<(), CliError> {
    let report = supervisor(cli)?.status().map_err(domain)?;
    match output_mode(cli) {
        OutputMode::Human => print_status_human(cli, &report),
        OutputMode::Json => {
            let payload = serde_json::to_value(&report)?;
            write_json_line(&payload)?;
        }
    }
    Ok(())
}

fn print_status_human(cli: &Cli, report: &StatusReport) {
    let state = match report.state {
        OperationalState::Up => "UP".green().bold(),
        OperationalState::Down => "DOWN".red().bold(),
        OperationalState::PartiallyUp => "PARTIALLY UP".yellow().bold(),
        OperationalState::Unknown => "UNKNOWN".bold(),
    };
    println!("Server: {state}");

    if cli.quiet {
        return;
    }

    if report.alarming {
        println!("{} {}", "!".red().bold(), report.summary);
    } else {
        println!("{}", report.summary);
    }
    if report.log_busy {
        println!(
            "{} The log file is open in another program, so this diagnosis ran without it. \
             Close the other program and check the status again.",
            "!".yellow().bold()
        );
    }
    if report.forced_stop_retried {
        println!("The refused stop was retried once with -force.");
    }

    if let Some(usage) = &report.usage {
        for line in usage.render_lines() {
            println!("  {line}");
        }
    }

    if cli.verbose {
        println!("Log: {}", report.log_path.display());
        if let Some(service) = &report.service {
            println!("Service: {} ({})", service.name, service.display_name);
        }
        println!(
            "Actions: start {}, stop {}, status {}",
            gate(report.permissions.can_start),
            gate(report.permissions.can_stop),
            gate(report.permissions.can_check_status)
        );
    }
}

fn gate(enabled: bool) -> &'static str {
    if enabled { "available" } else { "unavailable" }
}

fn run_log(cli: &Cli, args: &LogArgs) -> Result<(), CliError> {
    let report = supervisor(cli)?.log_report(args.lines).map_err(domain)?;
    match output_mode(cli) {
        OutputMode::Human => {
            if args.path_only {
                println!("{}", report.path.display());
                return Ok(());
            }
            if !cli.quiet {
                println!("Log: {}", report.path.display());
            }
            if !report.exists {
                println!("(the log file does not exist yet)");
                return Ok(());
            }
            for line in &report.lines {
                println!("{line}");
            }
        }
        OutputMode::Json => {
            let payload = if args.path_only {
                json!({ "path": report.path })
            } else {
                serde_json::to_value(&report)?
            };
            write_json_line(&payload)?;
        }
    }
    Ok(())
}

fn service_setup(config: &Config, start_on_boot: bool) -> ServiceSetup {
    ServiceSetup {
        service_name: config.service.name.clone(),
        lmgrd_path: config.endpoints.lmgrd_path.clone(),
        license_path: config.endpoints.license_path.clone(),
        log_path: config.paths.server_log.clone(),
        start_on_boot,
    }
}

fn run_service(cli: &Cli, args: &ServiceArgs) -> Result<(), CliError> {
    let config = load_config(cli)?;
    let os = detect_host_os().map_err(domain)?;

    match &args.command {
        ServiceCommand::Register(register) => {
            config.validate_endpoints().map_err(domain)?;
            let setup = service_setup(&config, register.on_boot);
            if setup.exists(os) {
                return Err(CliError::User(format!(
                    "a service named \"{}\" is already registered; unregister it first",
                    setup.service_name
                )));
            }
            let result = setup.install(os).map_err(domain)?;
            match output_mode(cli) {
                OutputMode::Human => {
                    println!(
                        "Registered {} service \"{}\".",
                        result.service_type, result.service_name
                    );
                    if let Some(path) = &result.unit_path {
                        println!("  Registration: {}", path.display());
                    }
                }
                OutputMode::Json => {
                    let payload = serde_json::to_value(&result)?;
                    write_json_line(&payload)?;
                }
            }
            Ok(())
        }
        ServiceCommand::Unregister => {
            let setup = service_setup(&config, false);
            if !setup.exists(os) {
                return Err(CliError::User(format!(
                    "no service named \"{}\" is registered",
                    setup.service_name
                )));
            }
            let result = setup.uninstall(os).map_err(domain)?;
            match output_mode(cli) {
                OutputMode::Human => {
                    println!(
                        "Unregistered {} service \"{}\".",
                        result.service_type, result.service_name
                    );
                }
                OutputMode::Json => {
                    let payload = serde_json::to_value(&result)?;
                    write_json_line(&payload)?;
                }
            }
            Ok(())
        }
        ServiceCommand::Show => {
            let setup = service_setup(&config, true);
            let text = match os {
                HostOs::Linux => setup.generate_systemd_unit(),
                HostOs::MacOs => setup.generate_launchd_plist(),
                HostOs::Windows => format!("sc {}", setup.sc_create_args().join(" ")),
            };
            match output_mode(cli) {
                OutputMode::Human => print!("{text}"),
                OutputMode::Json => {
                    let payload = json!({
                        "service_name": setup.service_name,
                        "registration": text,
                    });
                    write_json_line(&payload)?;
                }
            }
            Ok(())
        }
    }
}

fn run_config(cli: &Cli, args: &ConfigArgs) -> Result<(), CliError> {
    match args.command.as_ref().unwrap_or(&ConfigCommand::Show) {
        ConfigCommand::Path => {
            let path = cli
                .config
                .clone()
                .unwrap_or_else(Config::default_path);
            match output_mode(cli) {
                OutputMode::Human => println!("{}", path.display()),
                OutputMode::Json => write_json_line(&json!({ "path": path }))?,
            }
            Ok(())
        }
        ConfigCommand::Show => {
            let config = load_config(cli)?;
            match output_mode(cli) {
                OutputMode::Human => {
                    let rendered = toml::to_string_pretty(&config)
                        .map_err(|e| CliError::Internal(e.to_string()))?;
                    print!("{rendered}");
                }
                OutputMode::Json => {
                    let payload = serde_json::to_value(&config)?;
                    write_json_line(&payload)?;
                }
            }
            Ok(())
        }
        ConfigCommand::Validate => {
            let config = load_config(cli)?;
            let endpoints = config.validate_endpoints();
            match output_mode(cli) {
                OutputMode::Human => {
                    println!("configuration: {}", "ok".green());
                    match &endpoints {
                        Ok(()) => println!("endpoints: {}", "ok".green()),
                        Err(error) => println!("endpoints: {}", error.to_string().red()),
                    }
                }
                OutputMode::Json => {
                    let payload = json!({
                        "config_valid": true,
                        "endpoints_valid": endpoints.is_ok(),
                        "endpoints_error": endpoints.as_ref().err().map(ToString::to_string),
                    });
                    write_json_line(&payload)?;
                }
            }
            // Config itself parsed and validated; missing endpoint files make
            // the validation a partial success.
            endpoints.map_err(|error| CliError::Partial(error.to_string()))
        }
    }
}

fn emit_version(cli: &Cli, args: &VersionArgs) -> Result<(), CliError> {
    let version = env!("CARGO_PKG_VERSION");
    let package = env!("CARGO_PKG_NAME");
    let target = option_env!("TARGET").unwrap_or("unknown");
    let profile = option_env!("PROFILE").unwrap_or("unknown");

    match output_mode(cli) {
        OutputMode::Human => {
            println!("lmkeeper {version}");
            if args.verbose {
                println!("package: {package}");
                println!("target: {target}");
                println!("profile: {profile}");
            }
        }
        OutputMode::Json => {
            let payload = json!({
                "binary": "lmkeeper",
                "version": version,
                "package": package,
                "build": {
                    "target": target,
                    "profile": profile,
                }
            });
            write_json_line(&payload)?;
        }
    }
    Ok(())
}

fn write_json_line(payload: &Value) -> Result<(), CliError> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer(&mut stdout, payload)?;
    writeln!(stdout)?;
    Ok(())
}

fn output_mode(cli: &Cli) -> OutputMode {
    let env_mode = std::env::var("LMK_OUTPUT_FORMAT").ok();
    resolve_output_mode(cli.json, env_mode.as_deref(), io::stdout().is_terminal())
}

fn resolve_output_mode(json_flag: bool, env_mode: Option<&str>, stdout_is_tty: bool) -> OutputMode {
    if json_flag {
        return OutputMode::Json;
    }

    let fallback = if stdout_is_tty {
        OutputMode::Human
    } else {
        OutputMode::Json
    };

    match env_mode
        .map(str::trim)
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("json") => OutputMode::Json,
        Some("human") => OutputMode::Human,
        Some("auto") | None => fallback,
        Some(_) => fallback,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_global_flags_before_and_after_subcommand() {
        let before = Cli::try_parse_from([
            "lmkeeper",
            "--config",
            "/tmp/lmkeeper.toml",
            "--json",
            "--no-color",
            "-v",
            "status",
        ]);
        assert!(before.is_ok());

        let after = Cli::try_parse_from(["lmkeeper", "status", "--json", "--no-color", "-v"]);
        assert!(after.is_ok());
    }

    #[test]
    fn parses_all_subcommands() {
        let cases = [
            vec!["lmkeeper", "start"],
            vec!["lmkeeper", "stop"],
            vec!["lmkeeper", "status"],
            vec!["lmkeeper", "log", "--lines", "50"],
            vec!["lmkeeper", "log", "--path-only"],
            vec!["lmkeeper", "service", "register", "--on-boot"],
            vec!["lmkeeper", "service", "unregister"],
            vec!["lmkeeper", "service", "show"],
            vec!["lmkeeper", "config", "path"],
            vec!["lmkeeper", "config", "show"],
            vec!["lmkeeper", "config", "validate"],
            vec!["lmkeeper", "version", "--verbose"],
        ];

        for case in cases {
            let parsed = Cli::try_parse_from(case.clone());
            assert!(parsed.is_ok(), "failed to parse case: {case:?}");
        }
    }

    #[test]
    fn verbose_and_quiet_conflict() {
        assert!(Cli::try_parse_from(["lmkeeper", "status", "-v", "-q"]).is_err());
    }

    #[test]
    fn completions_support_bash_zsh_and_fish() {
        for shell in ["bash", "zsh", "fish"] {
            let parsed = Cli::try_parse_from(["lmkeeper", "completions", shell]);
            assert!(parsed.is_ok(), "failed shell parse for {shell}");
        }
    }

    #[test]
    fn output_mode_resolution_honors_precedence() {
        assert_eq!(
            resolve_output_mode(true, Some("human"), true),
            OutputMode::Json
        );
        assert_eq!(
            resolve_output_mode(false, Some("json"), true),
            OutputMode::Json
        );
        assert_eq!(
            resolve_output_mode(false, Some("human"), false),
            OutputMode::Human
        );
        assert_eq!(
            resolve_output_mode(false, Some("auto"), true),
            OutputMode::Human
        );
        assert_eq!(resolve_output_mode(false, None, false), OutputMode::Json);
    }

    #[test]
    fn exit_codes_follow_the_contract() {
        assert_eq!(CliError::User(String::new()).exit_code(), 1);
        assert_eq!(CliError::Runtime(String::new()).exit_code(), 2);
        assert_eq!(CliError::Internal(String::new()).exit_code(), 3);
        assert_eq!(CliError::Partial(String::new()).exit_code(), 4);
    }

    #[test]
    fn domain_errors_map_onto_exit_classes() {
        let user = domain(LmkError::MissingFile {
            role: "lmgrd binary",
            path: PathBuf::new(),
        });
        assert_eq!(user.exit_code(), 1);

        let user = domain(LmkError::PermissionDenied { action: "x" });
        assert_eq!(user.exit_code(), 1);

        let runtime = domain(LmkError::Runtime {
            details: String::new(),
        });
        assert_eq!(runtime.exit_code(), 2);

        let internal = domain(LmkError::Serialization {
            context: "t",
            details: String::new(),
        });
        assert_eq!(internal.exit_code(), 3);
    }
}
