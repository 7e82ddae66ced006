// src/config.rs

use color_eyre::eyre::{Result, WrapErr};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;
use url::Url;

use crate::core::models::{ProbeKind, Site};

pub const DEFAULT_CONFIG_FILE: &str = "siteprobe.yml";

const STARTER_CONFIG: &str = "\
# siteprobe-rs configuration
sites:
  - name: Example
    url: https://example.com
    expect_keyword: null   # optional string; set to null to disable

# Subset of probes to run for every site.
probes: [http, ssl, headers, dns]

# Maximum number of sites probed in parallel.
concurrency: 8

output:
  json: reports/report.json
  csv: reports/report.csv
";

fn default_probes() -> Vec<ProbeKind> {
    ProbeKind::ALL.to_vec()
}

fn default_concurrency() -> usize {
    8
}

/// Where the `check` command writes its artifacts. Either format can be
/// omitted to skip it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub csv: Option<PathBuf>,
}

/// The YAML configuration consumed by the CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub sites: Vec<Site>,
    #[serde(default = "default_probes")]
    pub probes: Vec<ProbeKind>,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub output: OutputConfig,
}

pub fn load_config(path: &Path) -> Result<AppConfig> {
    debug!(path = %path.display(), "Loading configuration.");
    let text = fs::read_to_string(path)
        .wrap_err_with(|| format!("Failed to read {}", path.display()))?;
    let config: AppConfig = serde_yaml::from_str(&text)
        .wrap_err_with(|| format!("Failed to parse {}", path.display()))?;
    Ok(config)
}

pub fn write_default_config(path: &Path) -> Result<()> {
    fs::write(path, STARTER_CONFIG)
        .wrap_err_with(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

/// Sanity-checks a parsed configuration and returns every problem found,
/// phrased for the operator. An empty list means the config is usable.
pub fn validate(config: &AppConfig) -> Vec<String> {
    let mut problems = Vec::new();

    if config.sites.is_empty() {
        problems.push("`sites` must be a non-empty list.".to_string());
        return problems;
    }

    let mut seen_names = BTreeSet::new();
    for (i, site) in config.sites.iter().enumerate() {
        let n = i + 1;
        if site.name.trim().is_empty() {
            problems.push(format!("site #{n} is missing `name`."));
        } else if !seen_names.insert(site.name.as_str()) {
            // Names key the report rows; duplicates make them ambiguous.
            problems.push(format!(
                "site #{n} reuses the name '{}'.",
                site.name
            ));
        }
        if site.url.trim().is_empty() {
            problems.push(format!("site #{n} is missing `url`."));
        } else if Url::parse(&site.url).is_err() {
            problems.push(format!(
                "site #{n} has an invalid `url`: '{}'. Use a full URL like https://example.com.",
                site.url
            ));
        }
    }

    if config.concurrency == 0 {
        problems.push("`concurrency` must be at least 1.".to_string());
    }

    problems
}
