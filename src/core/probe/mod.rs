// src/core/probe/mod.rs

// Public interface of the `probe` module: one sub-module per probe kind plus
// the per-site and per-batch orchestration.
pub mod dns_probe;
pub mod headers_probe;
pub mod http_probe;
pub mod ssl_probe;

use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::core::models::{
    Batch, DnsResult, Grade, HeadersResult, HttpResult, ProbeConfig, ProbeKind,
    ProbeSelection, Site, SiteReport, SslResult,
};

pub const DEFAULT_TLS_PORT: u16 = 443;

/// Derives the host for the TLS and DNS probes from a site URL: the scheme is
/// stripped and everything from the first `/` on is dropped.
pub fn host_from_url(url: &str) -> String {
    let stripped = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .unwrap_or(url);
    match stripped.split_once('/') {
        Some((host, _)) => host.to_string(),
        None => stripped.to_string(),
    }
}

/// Runs the selected probes for one site concurrently and collects the
/// results into a `SiteReport`.
///
/// Each probe runs on its own task: the probes share no state and carry no
/// data dependency, and a fault inside one probe degrades only that probe's
/// cell while the siblings finish undisturbed. An unselected probe is left
/// absent from the report.
pub async fn run_site_probes(
    config: &ProbeConfig,
    selection: &ProbeSelection,
    site: &Site,
) -> SiteReport {
    info!(site = %site.name, url = %site.url, "Probing site.");
    let host = host_from_url(&site.url);

    let http_task = selection.is_selected(ProbeKind::Http).then(|| {
        let config = config.clone();
        let name = site.name.clone();
        let url = site.url.clone();
        let keyword = site.expect_keyword.clone();
        tokio::spawn(async move {
            http_probe::run_http_probe(&config, &name, &url, keyword.as_deref()).await
        })
    });
    let ssl_task = selection.is_selected(ProbeKind::Ssl).then(|| {
        let config = config.clone();
        let name = site.name.clone();
        let host = host.clone();
        tokio::spawn(async move {
            ssl_probe::run_ssl_probe(&config, &name, &host, DEFAULT_TLS_PORT).await
        })
    });
    let headers_task = selection.is_selected(ProbeKind::Headers).then(|| {
        let config = config.clone();
        let name = site.name.clone();
        let url = site.url.clone();
        tokio::spawn(
            async move { headers_probe::run_headers_probe(&config, &name, &url).await },
        )
    });
    let dns_task = selection.is_selected(ProbeKind::Dns).then(|| {
        let name = site.name.clone();
        let host = host.clone();
        tokio::spawn(async move { dns_probe::run_dns_probe(&name, &host).await })
    });

    let (http, ssl, headers, dns) = tokio::join!(
        probe_cell(http_task, |e| failed_http_result(&site.name, &site.url, &e)),
        probe_cell(ssl_task, |e| failed_ssl_result(&site.name, &host, &e)),
        probe_cell(headers_task, |e| failed_headers_result(&site.name, &site.url, &e)),
        probe_cell(dns_task, |e| failed_dns_result(&site.name, &host, &e)),
    );

    SiteReport {
        name: site.name.clone(),
        url: site.url.clone(),
        http,
        ssl,
        headers,
        dns,
    }
}

/// Awaits one probe task. `None` means the probe was not selected; a panic
/// inside the task is converted to that probe's failure result.
async fn probe_cell<T>(
    task: Option<JoinHandle<T>>,
    on_fault: impl FnOnce(String) -> T,
) -> Option<T> {
    let handle = task?;
    Some(match handle.await {
        Ok(result) => result,
        Err(e) => {
            error!(error = %e, "Probe task panicked.");
            on_fault(format!("Probe panicked: {e}"))
        }
    })
}

/// Runs the batch: every site is probed on its own task, with at most
/// `concurrency` sites in flight, and reports come back in input order.
///
/// A panicking site task does not abort the others; its row is filled with a
/// failed result for every selected probe.
pub async fn run_batch(
    config: &ProbeConfig,
    selection: &ProbeSelection,
    sites: &[Site],
    concurrency: usize,
) -> Batch {
    info!(sites = sites.len(), concurrency, "Starting batch run.");

    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let handles: Vec<_> = sites
        .iter()
        .cloned()
        .map(|site| {
            let config = config.clone();
            let selection = selection.clone();
            let semaphore = semaphore.clone();
            tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                run_site_probes(&config, &selection, &site).await
            })
        })
        .collect();

    let mut batch = Vec::with_capacity(sites.len());
    for (site, handle) in sites.iter().zip(handles) {
        match handle.await {
            Ok(report) => batch.push(report),
            Err(e) => {
                error!(site = %site.name, error = %e, "Site probe task panicked.");
                batch.push(failed_site_report(
                    selection,
                    site,
                    &format!("Task panicked: {e}"),
                ));
            }
        }
    }
    info!(sites = batch.len(), "Batch run finished.");
    batch
}

fn failed_http_result(name: &str, url: &str, error: &str) -> HttpResult {
    HttpResult {
        name: name.to_string(),
        url: url.to_string(),
        ok: false,
        status_code: None,
        latency_ms: None,
        error: Some(error.to_string()),
    }
}

fn failed_ssl_result(name: &str, host: &str, error: &str) -> SslResult {
    SslResult {
        name: name.to_string(),
        host: host.to_string(),
        port: DEFAULT_TLS_PORT,
        ok: false,
        days_to_expiry: None,
        not_after: None,
        issuer: None,
        error: Some(error.to_string()),
    }
}

fn failed_headers_result(name: &str, url: &str, error: &str) -> HeadersResult {
    HeadersResult {
        name: name.to_string(),
        url: url.to_string(),
        ok: false,
        grade: Grade::F,
        issues: vec!["exception".to_string()],
        sample: BTreeMap::new(),
        error: Some(error.to_string()),
    }
}

fn failed_dns_result(name: &str, host: &str, error: &str) -> DnsResult {
    DnsResult {
        name: name.to_string(),
        host: host.to_string(),
        ok: false,
        records: BTreeMap::new(),
        hash: None,
        error: Some(error.to_string()),
    }
}

/// Fallback report for a site whose probe task died: every selected probe is
/// marked failed with the fault as its error.
fn failed_site_report(selection: &ProbeSelection, site: &Site, error: &str) -> SiteReport {
    let host = host_from_url(&site.url);
    SiteReport {
        name: site.name.clone(),
        url: site.url.clone(),
        http: selection
            .is_selected(ProbeKind::Http)
            .then(|| failed_http_result(&site.name, &site.url, error)),
        ssl: selection
            .is_selected(ProbeKind::Ssl)
            .then(|| failed_ssl_result(&site.name, &host, error)),
        headers: selection
            .is_selected(ProbeKind::Headers)
            .then(|| failed_headers_result(&site.name, &site.url, error)),
        dns: selection
            .is_selected(ProbeKind::Dns)
            .then(|| failed_dns_result(&site.name, &host, error)),
    }
}
