// src/main.rs

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::info;

mod config;
mod core;
mod logging;

use crate::core::models::{Batch, ProbeConfig, ProbeKind, ProbeSelection, SiteReport};
use crate::core::{probe, report};

#[derive(Parser)]
#[command(
    name = "siteprobe",
    version,
    about = "External health probes for websites: HTTP, TLS, DNS and security headers."
)]
struct Cli {
    /// Path to the configuration file.
    #[arg(
        short,
        long,
        global = true,
        env = "SITEPROBE_CONFIG",
        default_value = config::DEFAULT_CONFIG_FILE
    )]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a starter configuration file.
    Init,
    /// Validate the configuration and list any problems.
    Validate,
    /// Probe every configured site and write the requested reports.
    Check {
        /// Probes to run (http, ssl, headers, dns); defaults to the
        /// configured set.
        #[arg(short, long, value_delimiter = ',')]
        probes: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    color_eyre::install()?;
    logging::initialize_logging()?;

    let cli = Cli::parse();
    match cli.command {
        Command::Init => cmd_init(&cli.config),
        Command::Validate => cmd_validate(&cli.config),
        Command::Check { probes } => cmd_check(&cli.config, &probes).await,
    }
}

fn cmd_init(path: &Path) -> Result<ExitCode> {
    if path.exists() {
        println!("Refusing to overwrite existing {}", path.display());
        return Ok(ExitCode::FAILURE);
    }
    config::write_default_config(path)?;
    println!("Created {}", path.display());
    Ok(ExitCode::SUCCESS)
}

fn cmd_validate(path: &Path) -> Result<ExitCode> {
    let config = config::load_config(path)?;
    let problems = config::validate(&config);
    if !problems.is_empty() {
        println!("Config has issues:");
        for problem in &problems {
            println!(" - {problem}");
        }
        return Ok(ExitCode::FAILURE);
    }
    println!("Config looks good.");
    Ok(ExitCode::SUCCESS)
}

async fn cmd_check(path: &Path, probe_args: &[String]) -> Result<ExitCode> {
    let config = config::load_config(path)?;
    let problems = config::validate(&config);
    if !problems.is_empty() {
        println!("Config has issues:");
        for problem in &problems {
            println!(" - {problem}");
        }
        return Ok(ExitCode::FAILURE);
    }

    let selection = if probe_args.is_empty() {
        ProbeSelection::from_kinds(&config.probes)
    } else {
        ProbeSelection::from_kinds(&parse_probe_kinds(probe_args)?)
    };

    let mut probe_config = ProbeConfig::default();
    if let Some(user_agent) = &config.user_agent {
        probe_config.user_agent = user_agent.clone();
    }

    info!(
        sites = config.sites.len(),
        probes = ?selection.kinds(),
        "Running check."
    );
    let batch = probe::run_batch(
        &probe_config,
        &selection,
        &config.sites,
        config.concurrency,
    )
    .await;

    for site_report in &batch {
        println!("{}", summary_line(site_report));
    }

    if let Some(json_path) = &config.output.json {
        report::write_json(&batch, json_path)?;
        println!("Wrote {}", json_path.display());
    }
    if let Some(csv_path) = &config.output.csv {
        report::write_csv(&batch, csv_path)?;
        println!("Wrote {}", csv_path.display());
    }

    Ok(if batch_has_failures(&batch) {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

fn parse_probe_kinds(args: &[String]) -> Result<Vec<ProbeKind>> {
    args.iter()
        .map(|arg| {
            arg.parse::<ProbeKind>().map_err(|_| {
                eyre!("Unknown probe kind '{arg}' (expected http, ssl, headers or dns)")
            })
        })
        .collect()
}

/// One stdout line per site, showing only the probes that ran.
fn summary_line(site_report: &SiteReport) -> String {
    let mut parts = vec![format!("{} ({})", site_report.name, site_report.url)];

    if let Some(http) = &site_report.http {
        parts.push(match (http.ok, http.status_code, http.latency_ms) {
            (true, Some(status), Some(ms)) => format!("http=ok({status}, {ms}ms)"),
            _ => format!("http=fail({})", http.error.clone().unwrap_or_default()),
        });
    }
    if let Some(ssl) = &site_report.ssl {
        parts.push(if ssl.ok {
            format!("ssl=ok({}d)", ssl.days_to_expiry.unwrap_or(0))
        } else {
            format!("ssl=fail({})", ssl.error.clone().unwrap_or_default())
        });
    }
    if let Some(headers) = &site_report.headers {
        parts.push(format!(
            "headers={} ({} issues)",
            headers.grade,
            headers.issues.len()
        ));
    }
    if let Some(dns) = &site_report.dns {
        parts.push(if dns.ok {
            let total: usize = dns.records.values().map(Vec::len).sum();
            format!("dns=ok({total} records)")
        } else {
            format!("dns=fail({})", dns.error.clone().unwrap_or_default())
        });
    }

    parts.join("  ")
}

fn batch_has_failures(batch: &Batch) -> bool {
    batch.iter().any(|site_report| {
        site_report.http.as_ref().is_some_and(|p| !p.ok)
            || site_report.ssl.as_ref().is_some_and(|p| !p.ok)
            || site_report.headers.as_ref().is_some_and(|p| !p.ok)
            || site_report.dns.as_ref().is_some_and(|p| !p.ok)
    })
}
