// src/core/probe/headers_probe.rs

use reqwest::header::HeaderMap;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use crate::core::models::{Grade, HeadersResult, ProbeConfig};

/// Minimum acceptable HSTS max-age, roughly 180 days.
const HSTS_MIN_MAX_AGE: i64 = 15_552_000;

/// The six headers the probe audits and samples.
const HSTS: &str = "strict-transport-security";
const CSP: &str = "content-security-policy";
const XCTO: &str = "x-content-type-options";
const XFO: &str = "x-frame-options";
const REFERRER_POLICY: &str = "referrer-policy";
const PERMISSIONS_POLICY: &str = "permissions-policy";
const FEATURE_POLICY: &str = "feature-policy";

/// Referrer-Policy values considered strict enough to pass.
const ALLOWED_REFERRER_POLICIES: &[&str] = &[
    "no-referrer",
    "no-referrer-when-downgrade",
    "strict-origin",
    "strict-origin-when-cross-origin",
    "same-origin",
    "origin",
    "origin-when-cross-origin",
];

/// Grades the security-header posture of `url`.
///
/// A HEAD request is preferred to avoid pulling bodies; if the server rejects
/// the method (405/501), or the HEAD attempt fails outright (treated as
/// fallback-eligible), the probe retries with GET. Header lookups
/// are case-insensitive via `HeaderMap`; values are kept verbatim. Six rules
/// each contribute at most one issue, and the issue count alone determines
/// the grade. `ok` means grade A or B.
pub async fn run_headers_probe(config: &ProbeConfig, name: &str, url: &str) -> HeadersResult {
    info!(name, url, "Starting headers probe.");

    let client = match reqwest::Client::builder()
        .user_agent(config.user_agent.as_str())
        .connect_timeout(config.connect_timeout)
        .timeout(config.total_timeout)
        .build()
    {
        Ok(c) => c,
        Err(e) => {
            return exception_result(name, url, format!("Failed to build HTTP client: {e}"));
        }
    };

    let headers = match fetch_headers(&client, url).await {
        Ok(h) => h,
        Err(e) => {
            warn!(name, url, error = %e, "Headers fetch failed.");
            return exception_result(name, url, e);
        }
    };

    let (grade, issues) = score_headers(&headers);
    let ok = matches!(grade, Grade::A | Grade::B);
    info!(name, %grade, issue_count = issues.len(), "Headers probe finished.");

    HeadersResult {
        name: name.to_string(),
        url: url.to_string(),
        ok,
        grade,
        issues,
        sample: sample_headers(&headers),
        error: None,
    }
}

/// Fetches response headers, preferring HEAD and falling back to GET when the
/// method is rejected or the HEAD attempt fails.
async fn fetch_headers(client: &reqwest::Client, url: &str) -> Result<HeaderMap, String> {
    match client.head(url).send().await {
        Ok(response) if !matches!(response.status().as_u16(), 405 | 501) => {
            debug!(url, status = %response.status(), "HEAD request served.");
            Ok(response.headers().clone())
        }
        Ok(response) => {
            debug!(url, status = %response.status(), "HEAD rejected, retrying with GET.");
            request_get(client, url).await
        }
        Err(e) => {
            debug!(url, error = %e, "HEAD failed, retrying with GET.");
            request_get(client, url).await
        }
    }
}

async fn request_get(client: &reqwest::Client, url: &str) -> Result<HeaderMap, String> {
    client
        .get(url)
        .send()
        .await
        .map(|response| response.headers().clone())
        .map_err(|e| e.to_string())
}

/// Evaluates the six header rules and derives the grade from the issue count.
fn score_headers(headers: &HeaderMap) -> (Grade, Vec<String>) {
    let mut issues = Vec::new();

    match present_value(headers, HSTS) {
        None => issues.push("Missing Strict-Transport-Security".to_string()),
        Some(hsts) => match check_hsts(&hsts) {
            HstsCheck::Ok => {}
            HstsCheck::TooLow => issues.push("HSTS max-age < 15552000".to_string()),
            HstsCheck::NotParseable => issues.push("HSTS not parseable".to_string()),
        },
    }

    // Presence is enough for CSP; the policy itself is not validated.
    if present_value(headers, CSP).is_none() {
        issues.push("Missing Content-Security-Policy".to_string());
    }

    let xcto = header_value(headers, XCTO).unwrap_or_default();
    if !xcto.eq_ignore_ascii_case("nosniff") {
        issues.push("X-Content-Type-Options not 'nosniff'".to_string());
    }

    let xfo = header_value(headers, XFO).unwrap_or_default().to_lowercase();
    if xfo != "deny" && xfo != "sameorigin" {
        issues.push("X-Frame-Options not DENY/SAMEORIGIN".to_string());
    }

    let rp = header_value(headers, REFERRER_POLICY)
        .unwrap_or_default()
        .to_lowercase();
    if !ALLOWED_REFERRER_POLICIES.contains(&rp.as_str()) {
        issues.push("Referrer-Policy missing or lax".to_string());
    }

    if present_value(headers, PERMISSIONS_POLICY)
        .or_else(|| present_value(headers, FEATURE_POLICY))
        .is_none()
    {
        issues.push("Missing Permissions-Policy".to_string());
    }

    let grade = Grade::from_issue_count(issues.len());
    (grade, issues)
}

enum HstsCheck {
    Ok,
    TooLow,
    NotParseable,
}

/// Parses the `max-age` directive out of an HSTS value. A directive that is
/// present but not an integer makes the whole value unparsable; a value with
/// no sufficient max-age is too low.
fn check_hsts(value: &str) -> HstsCheck {
    for part in value.split(';') {
        let part = part.trim().to_ascii_lowercase();
        if let Some(raw) = part.strip_prefix("max-age=") {
            match raw.trim().parse::<i64>() {
                Ok(n) if n >= HSTS_MIN_MAX_AGE => return HstsCheck::Ok,
                Ok(_) => {}
                Err(_) => return HstsCheck::NotParseable,
            }
        }
    }
    HstsCheck::TooLow
}

/// Raw values of the six audited headers, empty string when absent. The
/// permissions-policy sample falls back to the legacy feature-policy value.
fn sample_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut sample = BTreeMap::new();
    for header in [HSTS, CSP, XCTO, XFO, REFERRER_POLICY] {
        sample.insert(
            header.to_string(),
            header_value(headers, header).unwrap_or_default(),
        );
    }
    sample.insert(
        PERMISSIONS_POLICY.to_string(),
        header_value(headers, PERMISSIONS_POLICY)
            .or_else(|| header_value(headers, FEATURE_POLICY))
            .unwrap_or_default(),
    );
    sample
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .map(|value| String::from_utf8_lossy(value.as_bytes()).to_string())
}

/// Like `header_value` but treats an empty value as absent, for rules that
/// only check presence.
fn present_value(headers: &HeaderMap, name: &str) -> Option<String> {
    header_value(headers, name).filter(|value| !value.is_empty())
}

fn exception_result(name: &str, url: &str, error: String) -> HeadersResult {
    HeadersResult {
        name: name.to_string(),
        url: url.to_string(),
        ok: false,
        grade: Grade::F,
        issues: vec!["exception".to_string()],
        sample: BTreeMap::new(),
        error: Some(error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderName, HeaderValue};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn header_map(entries: &[(&str, &str)]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (name, value) in entries {
            headers.append(
                name.parse::<HeaderName>().unwrap(),
                HeaderValue::from_str(value).unwrap(),
            );
        }
        headers
    }

    fn strict_headers() -> Vec<(&'static str, &'static str)> {
        vec![
            ("strict-transport-security", "max-age=31536000; includeSubDomains"),
            ("content-security-policy", "default-src 'self'"),
            ("x-content-type-options", "nosniff"),
            ("x-frame-options", "DENY"),
            ("referrer-policy", "strict-origin-when-cross-origin"),
            ("permissions-policy", "camera=()"),
        ]
    }

    #[test]
    fn hsts_max_age_boundaries() {
        assert!(matches!(check_hsts("max-age=15552000"), HstsCheck::Ok));
        assert!(matches!(check_hsts("max-age=15551999"), HstsCheck::TooLow));
        assert!(matches!(check_hsts("max-age=abc"), HstsCheck::NotParseable));
        assert!(matches!(check_hsts("max-age= 31536000"), HstsCheck::Ok));
        assert!(matches!(
            check_hsts("includeSubDomains; max-age=31536000"),
            HstsCheck::Ok
        ));
        assert!(matches!(check_hsts("includeSubDomains"), HstsCheck::TooLow));
    }

    #[test]
    fn strict_header_set_grades_a_with_no_issues() {
        let (grade, issues) = score_headers(&header_map(&strict_headers()));
        assert_eq!(grade, Grade::A);
        assert!(issues.is_empty());
    }

    #[test]
    fn no_headers_grades_f_with_all_six_issues() {
        let (grade, issues) = score_headers(&HeaderMap::new());
        assert_eq!(grade, Grade::F);
        assert_eq!(issues.len(), 6);
    }

    #[test]
    fn issue_count_drives_the_grade() {
        // Drop audited headers one by one and check the grade at each count.
        let full = strict_headers();
        let expected = [
            Grade::A, // 0 issues
            Grade::A, // 1
            Grade::B, // 2
            Grade::B, // 3
            Grade::C, // 4
            Grade::C, // 5
            Grade::F, // 6
        ];
        for missing in 0..=full.len() {
            let kept: Vec<_> = full[missing..].to_vec();
            let (grade, issues) = score_headers(&header_map(&kept));
            assert_eq!(issues.len(), missing);
            assert_eq!(grade, expected[missing]);
        }
    }

    #[test]
    fn value_rules_are_case_insensitive() {
        let mut entries = strict_headers();
        entries[2] = ("x-content-type-options", "NoSniff");
        entries[3] = ("x-frame-options", "SameOrigin");
        entries[4] = ("referrer-policy", "Same-Origin");
        let (_, issues) = score_headers(&header_map(&entries));
        assert!(issues.is_empty());
    }

    #[test]
    fn lax_referrer_policy_is_an_issue() {
        let mut entries = strict_headers();
        entries[4] = ("referrer-policy", "unsafe-url");
        let (_, issues) = score_headers(&header_map(&entries));
        assert_eq!(issues, vec!["Referrer-Policy missing or lax".to_string()]);
    }

    #[test]
    fn legacy_feature_policy_counts_and_is_sampled() {
        let mut entries = strict_headers();
        entries[5] = ("feature-policy", "camera 'none'");
        let headers = header_map(&entries);
        let (_, issues) = score_headers(&headers);
        assert!(issues.is_empty());
        let sample = sample_headers(&headers);
        assert_eq!(sample["permissions-policy"], "camera 'none'");
    }

    #[test]
    fn sample_always_has_six_entries() {
        let sample = sample_headers(&HeaderMap::new());
        assert_eq!(sample.len(), 6);
        assert!(sample.values().all(|v| v.is_empty()));
    }

    fn response(status: &str, headers: &[(&str, &str)]) -> String {
        let mut out = format!("HTTP/1.1 {status}\r\n");
        for (name, value) in headers {
            out.push_str(&format!("{name}: {value}\r\n"));
        }
        out.push_str("Content-Length: 0\r\nConnection: close\r\n\r\n");
        out
    }

    /// Serves `head_response` to HEAD requests and `get_response` to anything
    /// else, one connection at a time, until the test ends.
    async fn spawn_server(head_response: String, get_response: String) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                let head = head_response.clone();
                let get = get_response.clone();
                tokio::spawn(async move {
                    let mut buf = [0u8; 4096];
                    let n = stream.read(&mut buf).await.unwrap_or(0);
                    let request = String::from_utf8_lossy(&buf[..n]).to_string();
                    let reply = if request.starts_with("HEAD") { head } else { get };
                    let _ = stream.write_all(reply.as_bytes()).await;
                    let _ = stream.shutdown().await;
                });
            }
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn head_response_is_scored() {
        let url = spawn_server(
            response("200 OK", &strict_headers()),
            response("200 OK", &[]),
        )
        .await;
        let result = run_headers_probe(&ProbeConfig::default(), "local", &url).await;
        assert!(result.ok);
        assert_eq!(result.grade, Grade::A);
        assert_eq!(result.sample["x-frame-options"], "DENY");
    }

    #[tokio::test]
    async fn method_not_allowed_falls_back_to_get() {
        let url = spawn_server(
            response("405 Method Not Allowed", &[]),
            response("200 OK", &strict_headers()),
        )
        .await;
        let result = run_headers_probe(&ProbeConfig::default(), "local", &url).await;
        assert!(result.ok);
        assert_eq!(result.grade, Grade::A);
    }

    #[tokio::test]
    async fn network_failure_is_an_exception_result() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let url = format!("http://{addr}");
        let result = run_headers_probe(&ProbeConfig::default(), "local", &url).await;
        assert!(!result.ok);
        assert_eq!(result.grade, Grade::F);
        assert_eq!(result.issues, vec!["exception".to_string()]);
        assert!(result.sample.is_empty());
        assert!(result.error.is_some());
    }
}
