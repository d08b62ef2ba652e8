mod cli;

use streamproxy::server::auth;
use streamproxy::{config, server};
use streamproxy_common::{PidMap, StreamSource};
use streamproxy_ts::TsFile;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "streamproxy=trace,streamproxy_ts=trace,streamproxy_common=debug".to_string()
        } else {
            "streamproxy=info,streamproxy_ts=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .init();

    match cli.command {
        Commands::Serve { host, port } => {
            let rt = tokio::runtime::Runtime::new()?;
            let result = rt.block_on(start_server(host, port, cli.config.as_deref()));
            // Transfers run on blocking threads that only end when their
            // client does; don't hold the process open for them.
            rt.shutdown_timeout(Duration::from_secs(1));
            result
        }
        Commands::Probe { file, json } => probe_file(&file, json),
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::HashPassword { password } => hash_password(&password),
        Commands::Version => {
            println!("streamproxy {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

async fn start_server(
    host: Option<String>,
    port: Option<u16>,
    config_path: Option<&Path>,
) -> Result<()> {
    let mut config = config::load_config_or_default(config_path)?;

    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    config::validate_config(&config)?;

    tracing::info!("Starting Streamproxy");
    tracing::info!(
        "Encoder devices: {}",
        config
            .encoder
            .device_paths
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(", ")
    );

    server::start_server(config).await
}

#[derive(Serialize)]
struct ProbeReport {
    file: PathBuf,
    length: u64,
    pids: PidMap,
    pcr_pid: u16,
    first_pcr_ms: Option<u64>,
    last_pcr_ms: Option<u64>,
    time_seekable: bool,
}

fn probe_file(file: &Path, json: bool) -> Result<()> {
    if !file.exists() {
        anyhow::bail!("File does not exist: {:?}", file);
    }

    let ts = TsFile::open(file, true).with_context(|| format!("Failed to probe {:?}", file))?;
    let time_seekable = ts.is_time_seekable();
    let report = ProbeReport {
        file: ts.path().to_path_buf(),
        length: ts.stream_length(),
        pids: ts.pids(),
        pcr_pid: ts.pcr_pid(),
        first_pcr_ms: time_seekable.then(|| ts.first_pcr_ms()),
        last_pcr_ms: ts.last_pcr_ms(),
        time_seekable,
    };

    if json {
        let json_str = serde_json::to_string_pretty(&report)?;
        println!("{}", json_str);
    } else {
        println!("File: {}", report.file.display());
        println!("Size: {} bytes", report.length);
        println!("PIDs: {}", report.pids);
        println!("PCR PID: {:#06x}", report.pcr_pid);
        match (report.first_pcr_ms, report.last_pcr_ms) {
            (Some(first), Some(last)) => {
                let secs = (last - first) / 1000;
                let mins = secs / 60;
                let hours = mins / 60;
                println!("Duration: {:02}:{:02}:{:02}", hours, mins % 60, secs % 60);
            }
            _ => println!("Duration: unknown (not time-seekable)"),
        }
    }

    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            println!("✓ Configuration is valid");
            println!("  Server: {}:{}", config.server.host, config.server.port);
            println!("  Identity: {}", config.server.identity);
            println!("  Default action: {:?}", config.server.default_action);
            if config.server.auth.enabled {
                println!("  Auth: enabled ({} users)", config.server.auth.users.len());
            } else {
                println!("  Auth: disabled");
            }
            println!("  Encoder devices: {}", config.encoder.device_paths.len());
            println!(
                "  Queue: {} bytes, transfer unit {} bytes",
                config.transfer.queue_capacity, config.transfer.transfer_unit
            );
        }
        None => {
            println!("No config file specified, using defaults");
            let config = config::Config::default();
            println!("Default config:");
            println!("  Server: {}:{}", config.server.host, config.server.port);
        }
    }

    Ok(())
}

fn hash_password(password: &str) -> Result<()> {
    let hash = auth::hash_password(password)?;
    println!("{}", hash);
    Ok(())
}
