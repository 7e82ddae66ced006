// src/core/probe/ssl_probe.rs

use chrono::{DateTime, Utc};
use native_tls::TlsConnector;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;
use tokio::task::spawn_blocking;
use tracing::{debug, error, info, warn};
use x509_parser::prelude::*;

use crate::core::models::{ProbeConfig, SslResult};

/// Certificate fields extracted during the blocking handshake.
struct CertificateFields {
    not_after: DateTime<Utc>,
    issuer: Option<String>,
}

/// Checks the TLS certificate presented by `host:port`.
///
/// The handshake uses standard validation (trust chain and hostname against
/// `host`). `ok` means the certificate expires at or after now; an expired
/// certificate reports `days_to_expiry=0` with `error="certificate expired"`.
/// Any connection, handshake, or parsing failure leaves the optional fields
/// absent and carries the cause in `error`.
pub async fn run_ssl_probe(
    config: &ProbeConfig,
    name: &str,
    host: &str,
    port: u16,
) -> SslResult {
    info!(name, host, port, "Starting SSL/TLS probe.");

    let host_owned = host.to_string();
    let timeout = config.connect_timeout;

    debug!(host, "Spawning blocking task for TLS handshake.");
    let scan = spawn_blocking(move || fetch_peer_certificate(&host_owned, port, timeout))
        .await
        .unwrap_or_else(|e| {
            error!(panic = %e, "Blocking TLS probe task panicked!");
            Err(format!("Task panicked: {e}"))
        });

    match scan {
        Ok(cert) => {
            let (ok, days, error) = evaluate_expiry(cert.not_after, Utc::now());
            info!(name, host, ok, days_to_expiry = days, "SSL/TLS probe finished.");
            SslResult {
                name: name.to_string(),
                host: host.to_string(),
                port,
                ok,
                days_to_expiry: Some(days),
                not_after: Some(cert.not_after.to_rfc3339()),
                issuer: cert.issuer,
                error: error.map(str::to_string),
            }
        }
        Err(e) => {
            warn!(name, host, error = %e, "SSL/TLS probe failed.");
            SslResult {
                name: name.to_string(),
                host: host.to_string(),
                port,
                ok: false,
                days_to_expiry: None,
                not_after: None,
                issuer: None,
                error: Some(e),
            }
        }
    }
}

/// Classifies a certificate expiry date against `now`.
///
/// Days remaining are floored to whole days and never shown negative: an
/// expired certificate is always `(false, 0, Some("certificate expired"))`.
fn evaluate_expiry(
    not_after: DateTime<Utc>,
    now: DateTime<Utc>,
) -> (bool, i64, Option<&'static str>) {
    if not_after >= now {
        (true, (not_after - now).num_days(), None)
    } else {
        (false, 0, Some("certificate expired"))
    }
}

/// Opens the connection, performs the validated handshake, and pulls the
/// fields this probe cares about out of the peer certificate.
fn fetch_peer_certificate(
    host: &str,
    port: u16,
    timeout: Duration,
) -> Result<CertificateFields, String> {
    debug!(host, port, "Resolving address for TLS connection.");
    let addr = (host, port)
        .to_socket_addrs()
        .map_err(|e| format!("Address resolution error: {e}"))?
        .next()
        .ok_or_else(|| format!("No address found for {host}"))?;

    debug!(%addr, "Connecting TCP stream.");
    let stream = TcpStream::connect_timeout(&addr, timeout)
        .map_err(|e| format!("TCP Connection Error: {e}"))?;
    stream
        .set_read_timeout(Some(timeout))
        .and_then(|_| stream.set_write_timeout(Some(timeout)))
        .map_err(|e| format!("Socket Error: {e}"))?;

    let connector =
        TlsConnector::new().map_err(|e| format!("TlsConnector Error: {e}"))?;

    debug!(host, "Performing TLS handshake.");
    let tls_stream = connector
        .connect(host, stream)
        .map_err(|e| format!("TLS Handshake Error: {e}"))?;

    let cert = match tls_stream.peer_certificate() {
        Ok(Some(c)) => c,
        Ok(None) => return Err("No peer certificate presented".to_string()),
        Err(e) => return Err(format!("Could not get peer certificate: {e}")),
    };

    let cert_der = cert
        .to_der()
        .map_err(|e| format!("Could not convert certificate to DER: {e}"))?;
    let (_, x509) = parse_x509_certificate(&cert_der)
        .map_err(|e| format!("X.509 Parse Error: {e}"))?;

    let not_after = DateTime::from_timestamp(x509.validity().not_after.timestamp(), 0)
        .ok_or_else(|| "Certificate notAfter out of range".to_string())?;
    let issuer = format_issuer(issuer_parts(x509.issuer()));

    debug!(host, issuer = ?issuer, %not_after, "Parsed peer certificate.");
    Ok(CertificateFields { not_after, issuer })
}

/// Pulls commonName, organizationName and countryName out of the issuer DN,
/// in that order, skipping attributes that are absent or not valid UTF-8.
fn issuer_parts(issuer: &X509Name<'_>) -> Vec<String> {
    let mut parts = Vec::new();
    for attr in issuer
        .iter_common_name()
        .chain(issuer.iter_organization())
        .chain(issuer.iter_country())
    {
        if let Ok(s) = attr.as_str() {
            parts.push(s.to_string());
        }
    }
    parts
}

fn format_issuer(parts: Vec<String>) -> Option<String> {
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    #[test]
    fn future_expiry_is_ok() {
        let now = Utc::now();
        let (ok, days, error) = evaluate_expiry(now + ChronoDuration::days(10), now);
        assert!(ok);
        assert!((9..=10).contains(&days));
        assert!(error.is_none());
    }

    #[test]
    fn expiry_later_today_is_still_ok() {
        let now = Utc::now();
        let (ok, days, error) = evaluate_expiry(now + ChronoDuration::hours(2), now);
        assert!(ok);
        assert_eq!(days, 0);
        assert!(error.is_none());
    }

    #[test]
    fn expired_certificate_clamps_days_to_zero() {
        let now = Utc::now();
        let (ok, days, error) = evaluate_expiry(now - ChronoDuration::hours(3), now);
        assert!(!ok);
        assert_eq!(days, 0);
        assert_eq!(error, Some("certificate expired"));

        let (ok, days, _) = evaluate_expiry(now - ChronoDuration::days(400), now);
        assert!(!ok);
        assert_eq!(days, 0);
    }

    #[test]
    fn issuer_join_order_and_absence() {
        assert_eq!(
            format_issuer(vec!["R11".into(), "Let's Encrypt".into(), "US".into()]),
            Some("R11, Let's Encrypt, US".to_string())
        );
        assert_eq!(format_issuer(Vec::new()), None);
    }

    #[tokio::test]
    async fn handshake_failure_yields_error_result() {
        // A listener that closes every connection immediately can never
        // complete a TLS handshake.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                drop(stream);
            }
        });

        let result = run_ssl_probe(
            &ProbeConfig::default(),
            "local",
            &addr.ip().to_string(),
            addr.port(),
        )
        .await;
        assert!(!result.ok);
        assert!(result.days_to_expiry.is_none());
        assert!(result.not_after.is_none());
        assert!(result.issuer.is_none());
        assert!(result.error.is_some());
    }
}
