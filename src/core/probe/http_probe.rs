// src/core/probe/http_probe.rs

use std::time::Instant;
use tracing::{debug, info, warn};

use crate::core::models::{HttpResult, ProbeConfig};

/// Checks HTTP reachability of a site with a single GET request.
///
/// Redirects are followed; the connect and total timeouts come from `config`.
/// `ok` requires a status in [200, 400) and, when `expect_keyword` is set and
/// non-empty, the keyword to appear as a literal substring of the body.
/// Latency is measured wall-clock from request start and is populated on
/// failures too. One attempt, no retries.
pub async fn run_http_probe(
    config: &ProbeConfig,
    name: &str,
    url: &str,
    expect_keyword: Option<&str>,
) -> HttpResult {
    info!(name, url, "Starting HTTP probe.");

    let start = Instant::now();

    let client = match reqwest::Client::builder()
        .user_agent(config.user_agent.as_str())
        .connect_timeout(config.connect_timeout)
        .timeout(config.total_timeout)
        .build()
    {
        Ok(c) => c,
        Err(e) => {
            return failure(name, url, start, format!("Failed to build HTTP client: {e}"));
        }
    };

    let response = match client.get(url).send().await {
        Ok(r) => r,
        Err(e) => {
            warn!(name, url, error = %e, "HTTP request failed.");
            return failure(name, url, start, e.to_string());
        }
    };

    let status = response.status().as_u16();
    let latency_ms = start.elapsed().as_millis() as u64;
    let ok = (200..400).contains(&status);
    debug!(name, status, latency_ms, "Received HTTP response.");

    // The keyword check only applies to otherwise healthy responses; a bad
    // status is already a failure and the body is not inspected.
    if ok {
        if let Some(keyword) = expect_keyword.filter(|k| !k.is_empty()) {
            let body = match response.text().await {
                Ok(b) => b,
                Err(e) => {
                    warn!(name, url, error = %e, "Failed to read response body.");
                    return failure(name, url, start, e.to_string());
                }
            };
            if !body.contains(keyword) {
                info!(name, keyword, "Expected keyword not found in body.");
                return HttpResult {
                    name: name.to_string(),
                    url: url.to_string(),
                    ok: false,
                    status_code: Some(status),
                    latency_ms: Some(latency_ms),
                    error: Some(format!("Keyword '{keyword}' not found")),
                };
            }
        }
    }

    info!(name, ok, status, latency_ms, "HTTP probe finished.");
    HttpResult {
        name: name.to_string(),
        url: url.to_string(),
        ok,
        status_code: Some(status),
        latency_ms: Some(latency_ms),
        error: if ok {
            None
        } else {
            Some("Non-OK status".to_string())
        },
    }
}

fn failure(name: &str, url: &str, start: Instant, error: String) -> HttpResult {
    HttpResult {
        name: name.to_string(),
        url: url.to_string(),
        ok: false,
        status_code: None,
        latency_ms: Some(start.elapsed().as_millis() as u64),
        error: Some(error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serves exactly one canned HTTP/1.1 response on a local port and
    /// returns the base URL to request.
    async fn serve_once(status_line: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            if let Ok((mut stream, _)) = listener.accept().await {
                let mut buf = [0u8; 4096];
                let _ = stream.read(&mut buf).await;
                let response = format!(
                    "{}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status_line,
                    body.len(),
                    body
                );
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            }
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn ok_on_200() {
        let url = serve_once("HTTP/1.1 200 OK", "hello world").await;
        let result = run_http_probe(&ProbeConfig::default(), "local", &url, None).await;
        assert!(result.ok);
        assert_eq!(result.status_code, Some(200));
        assert!(result.latency_ms.is_some());
        assert!(result.error.is_none());
    }

    #[tokio::test]
    async fn ok_on_200_with_matching_keyword() {
        let url = serve_once("HTTP/1.1 200 OK", "welcome to the jungle").await;
        let result =
            run_http_probe(&ProbeConfig::default(), "local", &url, Some("jungle")).await;
        assert!(result.ok);
        assert_eq!(result.status_code, Some(200));
    }

    #[tokio::test]
    async fn missing_keyword_fails_but_keeps_status() {
        let url = serve_once("HTTP/1.1 200 OK", "nothing to see here").await;
        let result =
            run_http_probe(&ProbeConfig::default(), "local", &url, Some("jungle")).await;
        assert!(!result.ok);
        assert_eq!(result.status_code, Some(200));
        assert!(result.error.as_deref().unwrap().contains("jungle"));
    }

    #[tokio::test]
    async fn empty_keyword_is_ignored() {
        let url = serve_once("HTTP/1.1 200 OK", "body").await;
        let result = run_http_probe(&ProbeConfig::default(), "local", &url, Some("")).await;
        assert!(result.ok);
    }

    #[tokio::test]
    async fn not_ok_on_404_regardless_of_keyword() {
        let url = serve_once("HTTP/1.1 404 Not Found", "jungle").await;
        let result =
            run_http_probe(&ProbeConfig::default(), "local", &url, Some("jungle")).await;
        assert!(!result.ok);
        assert_eq!(result.status_code, Some(404));
        assert_eq!(result.error.as_deref(), Some("Non-OK status"));
    }

    #[tokio::test]
    async fn connection_refused_reports_error_and_latency() {
        // Bind then drop the listener so the port is known to be closed.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let url = format!("http://{addr}");
        let result = run_http_probe(&ProbeConfig::default(), "local", &url, None).await;
        assert!(!result.ok);
        assert_eq!(result.status_code, None);
        assert!(result.latency_ms.is_some());
        assert!(result.error.is_some());
    }
}
