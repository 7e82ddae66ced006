// src/core/probe/dns_probe.rs

use hickory_resolver::TokioAsyncResolver;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::proto::rr::RecordType;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::core::models::{DnsRecordKind, DnsResult};

/// Resolves A, AAAA, CNAME and MX records for `host` and fingerprints the
/// answer set.
///
/// Lookups run concurrently and fail independently: a type that cannot be
/// resolved (NXDOMAIN, no answer, timeout) degrades to an empty list instead
/// of failing the probe. `ok` means at least one type returned an entry.
pub async fn run_dns_probe(name: &str, host: &str) -> DnsResult {
    info!(name, host, "Starting DNS probe.");

    let resolver =
        TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default());

    let (a, aaaa, cname, mx) = tokio::join!(
        lookup_records(&resolver, host, DnsRecordKind::A),
        lookup_records(&resolver, host, DnsRecordKind::AAAA),
        lookup_records(&resolver, host, DnsRecordKind::CNAME),
        lookup_records(&resolver, host, DnsRecordKind::MX),
    );

    let mut records = BTreeMap::new();
    records.insert(DnsRecordKind::A, a);
    records.insert(DnsRecordKind::AAAA, aaaa);
    records.insert(DnsRecordKind::CNAME, cname);
    records.insert(DnsRecordKind::MX, mx);

    let result = assemble_result(name, host, records);
    info!(name, host, ok = result.ok, "DNS probe finished.");
    result
}

/// Builds the final result from the collected record map: the content hash,
/// the ok flag, and the no-records error when everything came back empty.
fn assemble_result(
    name: &str,
    host: &str,
    records: BTreeMap<DnsRecordKind, Vec<String>>,
) -> DnsResult {
    let hash = content_hash(&records);
    let ok = records.values().any(|v| !v.is_empty());
    DnsResult {
        name: name.to_string(),
        host: host.to_string(),
        ok,
        records,
        hash: Some(hash),
        error: if ok {
            None
        } else {
            Some("No records resolved".to_string())
        },
    }
}

/// Looks up one record type, returning its entries sorted lexicographically.
/// Any lookup failure is isolated to this type and yields an empty list.
async fn lookup_records(
    resolver: &TokioAsyncResolver,
    host: &str,
    kind: DnsRecordKind,
) -> Vec<String> {
    debug!(host, %kind, "Looking up records.");
    let looked_up = match kind {
        DnsRecordKind::A => resolver
            .ipv4_lookup(host)
            .await
            .map(|lookup| lookup.iter().map(|r| r.to_string()).collect::<Vec<_>>()),
        DnsRecordKind::AAAA => resolver
            .ipv6_lookup(host)
            .await
            .map(|lookup| lookup.iter().map(|r| r.to_string()).collect::<Vec<_>>()),
        DnsRecordKind::CNAME => resolver
            .lookup(host, RecordType::CNAME)
            .await
            .map(|lookup| lookup.iter().map(|r| r.to_string()).collect::<Vec<_>>()),
        DnsRecordKind::MX => resolver
            .mx_lookup(host)
            .await
            .map(|lookup| lookup.iter().map(|r| r.to_string()).collect::<Vec<_>>()),
    };

    match looked_up {
        Ok(values) => {
            let mut values: Vec<String> =
                values.into_iter().map(|v| v.trim().to_string()).collect();
            values.sort();
            debug!(host, %kind, count = values.len(), "Lookup succeeded.");
            values
        }
        Err(e) => {
            debug!(host, %kind, error = %e, "Lookup failed, treating as empty.");
            Vec::new()
        }
    }
}

/// Renders the record map as `"A:v1,v2|AAAA:|CNAME:|MX:v"` with types in
/// fixed order and values pre-sorted, so identical record sets always produce
/// identical strings.
fn canonical_record_string(records: &BTreeMap<DnsRecordKind, Vec<String>>) -> String {
    records
        .iter()
        .map(|(kind, values)| format!("{kind}:{}", values.join(",")))
        .collect::<Vec<_>>()
        .join("|")
}

/// SHA-256 of the canonical record string, lowercase hex.
fn content_hash(records: &BTreeMap<DnsRecordKind, Vec<String>>) -> String {
    let digest = Sha256::digest(canonical_record_string(records).as_bytes());
    format!("{digest:x}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record_map(
        a: &[&str],
        aaaa: &[&str],
        cname: &[&str],
        mx: &[&str],
    ) -> BTreeMap<DnsRecordKind, Vec<String>> {
        let mut records = BTreeMap::new();
        for (kind, values) in [
            (DnsRecordKind::A, a),
            (DnsRecordKind::AAAA, aaaa),
            (DnsRecordKind::CNAME, cname),
            (DnsRecordKind::MX, mx),
        ] {
            let mut values: Vec<String> = values.iter().map(|s| s.to_string()).collect();
            values.sort();
            records.insert(kind, values);
        }
        records
    }

    #[test]
    fn canonical_string_fixed_order_and_empty_types() {
        let records = record_map(&["1.1.1.1", "2.2.2.2"], &[], &[], &["10 mail.example.com."]);
        assert_eq!(
            canonical_record_string(&records),
            "A:1.1.1.1,2.2.2.2|AAAA:|CNAME:|MX:10 mail.example.com."
        );
    }

    #[test]
    fn content_hash_known_digests() {
        let empty = record_map(&[], &[], &[], &[]);
        assert_eq!(
            content_hash(&empty),
            "503a7837663de203d4369f556895a3c76297519d2dea48e6b48dee3166e85820"
        );

        let records = record_map(&["1.1.1.1", "2.2.2.2"], &[], &[], &["10 mail.example.com."]);
        assert_eq!(
            content_hash(&records),
            "038ae7208111681bb5d265d838ae7787ada99b7ef3ba831b083693d47dec9ddd"
        );
    }

    #[test]
    fn content_hash_invariant_under_resolver_order() {
        let forward = record_map(&["1.1.1.1", "2.2.2.2", "9.9.9.9"], &[], &[], &[]);
        let shuffled = record_map(&["9.9.9.9", "1.1.1.1", "2.2.2.2"], &[], &[], &[]);
        assert_eq!(content_hash(&forward), content_hash(&shuffled));
    }

    #[test]
    fn no_records_resolved_is_a_failure() {
        let result = assemble_result("example", "example.invalid", record_map(&[], &[], &[], &[]));
        assert!(!result.ok);
        assert_eq!(result.error.as_deref(), Some("No records resolved"));
        assert!(result.hash.is_some());
    }

    #[test]
    fn any_record_type_makes_the_probe_ok() {
        let result = assemble_result(
            "example",
            "example.com",
            record_map(&[], &[], &["edge.example.net."], &[]),
        );
        assert!(result.ok);
        assert!(result.error.is_none());
        assert_eq!(result.records[&DnsRecordKind::A], Vec::<String>::new());
    }
}
