use anyhow::Context;
use clap::{value_parser, Arg, ArgAction, Command};
use gxp_core::WorkflowConfig;
use gxp_workflow::test_harness::run_consultation_scenario;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

fn cli() -> Command {
    Command::new("gxp-workflow")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Consultation-gated GxP test-suite workflow")
        .arg(
            Arg::new("json-logs")
                .long("json-logs")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON lines"),
        )
        .subcommand_required(true)
        .subcommand(
            Command::new("simulate")
                .about("Run the low-confidence consultation scenario end to end")
                .arg(
                    Arg::new("config")
                        .long("config")
                        .value_parser(value_parser!(PathBuf))
                        .help("Workflow configuration file (TOML)"),
                ),
        )
        .subcommand(
            Command::new("validate-log")
                .about("Verify the hash chain of a JSON-lines audit log")
                .arg(
                    Arg::new("path")
                        .long("path")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Path to the audit log"),
                ),
        )
        .subcommand(
            Command::new("config")
                .about("Print the effective configuration")
                .arg(
                    Arg::new("path")
                        .long("path")
                        .value_parser(value_parser!(PathBuf))
                        .help("Configuration file to load (defaults apply otherwise)"),
                ),
        )
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<WorkflowConfig> {
    match path {
        Some(path) => WorkflowConfig::load(path)
            .with_context(|| format!("loading configuration from {}", path.display())),
        None => Ok(WorkflowConfig::new()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = cli().get_matches();
    init_tracing(matches.get_flag("json-logs"));

    match matches.subcommand() {
        Some(("simulate", args)) => {
            let config = load_config(args.get_one::<PathBuf>("config"))?;
            let report = run_consultation_scenario(config)
                .await
                .context("scenario aborted")?;
            println!("{}", report.generate_text());
            std::process::exit(if report.passed() { 0 } else { 1 });
        }
        Some(("validate-log", args)) => {
            let path = args
                .get_one::<PathBuf>("path")
                .context("--path is required")?;
            match gxp_audit::verify_file(path) {
                Ok(report) => {
                    println!("Audit log: {}", path.display());
                    println!("  Records checked: {}", report.records_checked);
                    println!("  Head: {}", report.head_hash.as_deref().unwrap_or("(empty)"));
                    println!("  Status: VALID");
                }
                Err(e) => {
                    println!("Audit log: {}", path.display());
                    println!("  Status: INVALID ({e})");
                    std::process::exit(1);
                }
            }
        }
        Some(("config", args)) => {
            let config = load_config(args.get_one::<PathBuf>("path"))?;
            print!("{}", toml::to_string_pretty(&config)?);
        }
        _ => unreachable!("subcommand_required"),
    }
    Ok(())
}
