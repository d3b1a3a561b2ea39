use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use iodriver_core::{
    builtin_factories, find_factory, DriverConfigFile, Driver, Endpoint, EndpointFactory,
    RunSummary, Workload,
};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::runtime::Runtime;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "iodriver", version, about = "Drives QoS workloads against a storage platform")]
struct Cli {
    #[arg(long, default_value = "info")]
    log: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a workload and validate the observed QoS
    Run {
        /// Path to the driver YAML
        #[arg(long)]
        config: PathBuf,
        /// Override the workload named in the config
        #[arg(long)]
        workload: Option<String>,
        /// Override the endpoint kind (e.g., sim, om-rest)
        #[arg(long)]
        endpoint: Option<String>,
        /// Override the endpoint URI
        #[arg(long)]
        uri: Option<String>,
        /// Extra endpoint key=value options (repeatable)
        #[arg(long, num_args=0.., value_parser = parse_key_val::<String, String>)]
        option: Vec<(String, String)>,
        /// Log every executed operation
        #[arg(long)]
        log_operations: bool,
        /// Directory the run summary is written to
        #[arg(long, default_value = "results")]
        output: PathBuf,
    },
    /// List built-in workloads
    ListWorkloads,
    /// List available endpoints
    ListEndpoints,
}

fn parse_key_val<K, V>(s: &str) -> std::result::Result<(K, V), String>
where
    K: std::str::FromStr,
    V: std::str::FromStr,
{
    let pos = s.find('=');
    match pos {
        Some(pos) => {
            let key = s[..pos].parse().map_err(|_| format!("invalid key: {}", &s[..pos]))?;
            let value = s[pos+1..].parse().map_err(|_| format!("invalid value: {}", &s[pos+1..]))?;
            Ok((key, value))
        }
        None => Err(format!("invalid KEY=VALUE: no `=` in `{}`", s)),
    }
}

fn endpoint_factories() -> Vec<Box<dyn EndpointFactory>> {
    vec![
        Box::new(sim_adapter::SimFactory),
        Box::new(om_rest_adapter::OmRestFactory),
    ]
}

fn report(summary: &RunSummary) {
    println!(
        "{} on {}: {} operations in {:.2?}, {} group(s) failed",
        summary.workload,
        summary.endpoint,
        summary.operations_executed,
        summary.duration,
        summary.groups_failed(),
    );
    for v in &summary.validation.volumes {
        let measured = v
            .measured_iops
            .map_or_else(|| "-".to_string(), |iops| format!("{iops:.1}"));
        println!(
            "  {:<40} measured {:>10} bound {:>8.1} {}",
            v.volume,
            measured,
            v.bound_iops,
            if v.passed { "ok" } else { "FAIL" }
        );
    }
    println!(
        "validation ({}): {}",
        summary.validation.validator,
        if summary.validation.passed { "passed" } else { "failed" }
    );
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cli.log))
        .init();

    match cli.command {
        Commands::ListEndpoints => {
            for f in endpoint_factories() {
                println!("{}", f.name());
            }
            Ok(())
        }
        Commands::ListWorkloads => {
            for f in builtin_factories() {
                println!("{:<16} {}", f.name(), f.describe());
            }
            Ok(())
        }
        Commands::Run { config, workload, endpoint, uri, option, log_operations, output } => {
            let mut cfg = DriverConfigFile::load(&config)?;
            if let Some(name) = workload {
                cfg.workload.name = name;
            }
            if let Some(kind) = endpoint {
                cfg.endpoint.kind = kind;
            }
            if let Some(uri) = uri {
                cfg.endpoint.uri = uri;
            }
            cfg.endpoint.options.extend(option);
            cfg.workload.log_operations |= log_operations;

            let kind = cfg.endpoint.kind.to_lowercase();
            let factory = endpoint_factories()
                .into_iter()
                .find(|f| f.name() == kind)
                .ok_or_else(|| anyhow::anyhow!("unknown endpoint: {}", kind))?;
            let endpoint: Arc<dyn Endpoint> = factory
                .create(&cfg.endpoint.connection_params())
                .with_context(|| format!("failed to create endpoint {kind}"))?
                .into();
            let workload: Arc<dyn Workload> = find_factory(&cfg.workload.name)?
                .create(&cfg.workload)?
                .into();
            let validator = cfg
                .validator
                .kind
                .unwrap_or_else(|| workload.suggested_validator())
                .build(cfg.validator.tolerance);
            let driver = Driver::new(endpoint, workload, cfg.listener.build(), validator)?;
            info!(?driver, "starting run");

            let rt = Runtime::new()?;
            let summary = rt.block_on(driver.run())?;

            let run_dir = output.join(format!("{}-{}", kind, cfg.workload.name));
            fs::create_dir_all(&run_dir)?;
            let summary_path = run_dir.join("summary.json");
            fs::write(&summary_path, serde_json::to_string_pretty(&summary)?)?;

            report(&summary);
            println!("Summary written to {}", summary_path.display());
            std::process::exit(summary.result_code());
        }
    }
}
