// src/core/report.rs

use chrono::{DateTime, SecondsFormat, Utc};
use color_eyre::eyre::Result;
use std::fmt::Display;
use std::fs;
use std::path::Path;
use tracing::info;

use crate::core::models::{Batch, DnsRecordKind, SiteReport};

/// Fixed CSV schema: one row per site, heterogeneous probe payloads flattened
/// into typed columns. Missing probes render as empty cells.
pub const CSV_COLUMNS: &[&str] = &[
    "timestamp_iso",
    "name",
    "url",
    "http_ok",
    "http_status",
    "http_latency_ms",
    "http_error",
    "ssl_ok",
    "ssl_days_to_expiry",
    "ssl_not_after",
    "ssl_issuer",
    "ssl_error",
    "headers_ok",
    "headers_grade",
    "headers_issues_count",
    "headers_error",
    "dns_ok",
    "dns_a_count",
    "dns_aaaa_count",
    "dns_cname_count",
    "dns_mx_count",
    "dns_hash",
    "dns_error",
];

/// Writes the batch as a pretty-printed JSON array, one object per site with
/// probe payloads nested under their keys.
pub fn write_json(batch: &Batch, path: &Path) -> Result<()> {
    ensure_parent(path)?;
    let json = serde_json::to_string_pretty(batch)?;
    fs::write(path, json)?;
    info!(path = %path.display(), sites = batch.len(), "Wrote JSON report.");
    Ok(())
}

/// Writes the batch as CSV, stamping every row with the same UTC timestamp.
pub fn write_csv(batch: &Batch, path: &Path) -> Result<()> {
    ensure_parent(path)?;
    fs::write(path, render_csv(batch, Utc::now()))?;
    info!(path = %path.display(), sites = batch.len(), "Wrote CSV report.");
    Ok(())
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

/// Renders the whole CSV document. `now` is truncated to second precision
/// and applied identically to all rows of the export.
pub fn render_csv(batch: &Batch, now: DateTime<Utc>) -> String {
    let timestamp = now.to_rfc3339_opts(SecondsFormat::Secs, true);
    let mut out = String::new();
    out.push_str(&CSV_COLUMNS.join(","));
    out.push('\n');
    for report in batch {
        out.push_str(&render_row(report, &timestamp));
        out.push('\n');
    }
    out
}

fn render_row(report: &SiteReport, timestamp: &str) -> String {
    let mut fields: Vec<String> = vec![
        timestamp.to_string(),
        report.name.clone(),
        report.url.clone(),
    ];

    match &report.http {
        Some(http) => {
            fields.push(http.ok.to_string());
            fields.push(opt_field(http.status_code.as_ref()));
            fields.push(opt_field(http.latency_ms.as_ref()));
            fields.push(opt_field(http.error.as_ref()));
        }
        None => fields.extend(empty_fields(4)),
    }

    match &report.ssl {
        Some(ssl) => {
            fields.push(ssl.ok.to_string());
            fields.push(opt_field(ssl.days_to_expiry.as_ref()));
            fields.push(opt_field(ssl.not_after.as_ref()));
            fields.push(opt_field(ssl.issuer.as_ref()));
            fields.push(opt_field(ssl.error.as_ref()));
        }
        None => fields.extend(empty_fields(5)),
    }

    match &report.headers {
        Some(headers) => {
            fields.push(headers.ok.to_string());
            fields.push(headers.grade.to_string());
            fields.push(headers.issues.len().to_string());
            fields.push(opt_field(headers.error.as_ref()));
        }
        None => fields.extend(empty_fields(4)),
    }

    match &report.dns {
        Some(dns) => {
            fields.push(dns.ok.to_string());
            for kind in DnsRecordKind::ALL {
                let count = dns.records.get(&kind).map_or(0, Vec::len);
                fields.push(count.to_string());
            }
            fields.push(opt_field(dns.hash.as_ref()));
            fields.push(opt_field(dns.error.as_ref()));
        }
        None => fields.extend(empty_fields(7)),
    }

    fields
        .iter()
        .map(|field| csv_escape(field))
        .collect::<Vec<_>>()
        .join(",")
}

fn opt_field<T: Display>(value: Option<&T>) -> String {
    value.map(T::to_string).unwrap_or_default()
}

fn empty_fields(n: usize) -> Vec<String> {
    vec![String::new(); n]
}

/// RFC4180 quoting: fields containing a comma, quote, or line break are
/// wrapped in double quotes with inner quotes doubled.
fn csv_escape(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
