//! deSEC.io TXT provider. deSEC models DNS data as RRsets, so publishing a
//! challenge value means merging it into the TXT RRset at the record name
//! (relative to the zone apex) and retracting means re-submitting the set
//! without the one value — the set itself is never deleted outright.
//!
//! When the challenge name has a CNAME, the record is managed at the CNAME
//! target inside the target's zone.

use anyhow::{anyhow, Context, Result};
use log::{debug, info, warn};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::config::ProviderProperties;
use crate::dns::{cname_target, zone_apex, DnsLookup, SystemDns};
use crate::http::{status_error, HttpClient};

use super::DnsTxtProvider;

const RECORD_TTL: u32 = 3600;

pub struct DesecProvider {
    api_url: String,
    auth_header: String,
    dns: Box<dyn DnsLookup>,
    pending_delete: Option<PendingDelete>,
}

struct PendingDelete {
    url: String,
    record: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct RecordSet {
    subname: String,
    #[serde(rename = "type")]
    record_type: String,
    ttl: u32,
    records: Vec<String>,
}

impl DesecProvider {
    pub fn new(properties: &ProviderProperties) -> Result<Self> {
        let api_url = properties
            .get("api_url")
            .unwrap_or("https://desec.io/api/v1/domains")
            .trim_end_matches('/')
            .to_string();
        let api_token = properties.require("api_token")?;
        Ok(Self::with_lookup(
            api_url,
            format!("Token {api_token}"),
            Box::new(SystemDns::new()?),
        ))
    }

    fn with_lookup(api_url: String, auth_header: String, dns: Box<dyn DnsLookup>) -> Self {
        Self {
            api_url,
            auth_header,
            dns,
            pending_delete: None,
        }
    }
}

impl DnsTxtProvider for DesecProvider {
    fn add_txt_record(&mut self, fqdn: &str, value: &str) -> Result<bool> {
        let target = cname_target(self.dns.as_ref(), fqdn);
        let apex = zone_apex(self.dns.as_ref(), &target)
            .ok_or_else(|| anyhow!("no zone apex found for {target}"))?;
        let subname = subname_of(&target, &apex);
        debug!("[desec] zone {apex}, subname '{subname}'");

        let quoted = quote(value);
        // '@' addresses the RRset at the zone apex itself
        let rrset_url = format!(
            "{}/{}/rrsets/{}/TXT/",
            self.api_url,
            apex,
            if subname.is_empty() { "@" } else { &subname }
        );

        let client = HttpClient::shared();
        let existing = client
            .get(&rrset_url)
            .header(AUTHORIZATION, &self.auth_header)
            .send()
            .context("failed to fetch deSEC RRset")?;

        let response = if existing.status().is_success() {
            let mut record_set: RecordSet =
                existing.json().context("failed to parse deSEC RRset")?;
            record_set.records.push(quoted.clone());
            info!(
                "[desec] updating RRset at {rrset_url} with TXT records {:?}",
                record_set.records
            );
            client
                .put(&rrset_url)
                .header(AUTHORIZATION, &self.auth_header)
                .header(CONTENT_TYPE, "application/json")
                .json(&record_set)
                .send()
                .context("failed to update deSEC RRset")?
        } else if existing.status() == StatusCode::NOT_FOUND {
            info!("[desec] no previous RRset; creating one for '{subname}' in zone {apex}");
            let record_set = RecordSet {
                subname: subname.clone(),
                record_type: "TXT".to_string(),
                ttl: RECORD_TTL,
                records: vec![quoted.clone()],
            };
            client
                .post(&format!("{}/{}/rrsets/", self.api_url, apex))
                .header(AUTHORIZATION, &self.auth_header)
                .header(CONTENT_TYPE, "application/json")
                .json(&record_set)
                .send()
                .context("failed to create deSEC RRset")?
        } else {
            let status = existing.status();
            let body = existing.text().unwrap_or_default();
            warn!(
                "[desec] fetching RRset failed: {}",
                status_error("deSEC", status, Some(body))
            );
            return Ok(false);
        };

        if response.status().is_success() {
            self.pending_delete = Some(PendingDelete {
                url: rrset_url,
                record: quoted,
            });
            Ok(true)
        } else {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            warn!(
                "[desec] publishing TXT record failed: {}",
                status_error("deSEC", status, Some(body))
            );
            Ok(false)
        }
    }

    fn delete_txt_record(&mut self) -> Result<bool> {
        let Some(pending) = self.pending_delete.take() else {
            info!("[desec] no record published; nothing to delete");
            return Ok(false);
        };

        let client = HttpClient::shared();
        let existing = client
            .get(&pending.url)
            .header(AUTHORIZATION, &self.auth_header)
            .send()
            .context("failed to fetch deSEC RRset")?;
        if !existing.status().is_success() {
            warn!(
                "[desec] could not fetch RRset for deletion: {}",
                existing.status()
            );
            return Ok(false);
        }

        let mut record_set: RecordSet = existing.json().context("failed to parse deSEC RRset")?;
        remove_record(&mut record_set.records, &pending.record);
        info!("[desec] deleting TXT record [{}]", pending.record);

        // an empty record list makes deSEC drop the RRset
        let response = client
            .put(&pending.url)
            .header(AUTHORIZATION, &self.auth_header)
            .header(CONTENT_TYPE, "application/json")
            .json(&record_set)
            .send()
            .context("failed to update deSEC RRset")?;
        Ok(response.status().is_success())
    }
}

/// The record name relative to the zone apex: empty for the apex itself.
fn subname_of(domain: &str, apex: &str) -> String {
    match domain.strip_suffix(apex) {
        Some(prefix) => prefix.trim_end_matches('.').to_string(),
        None => domain.to_string(),
    }
}

fn quote(value: &str) -> String {
    format!("\"{value}\"")
}

/// Remove one occurrence of `value`, leaving any other records untouched.
fn remove_record(records: &mut Vec<String>, value: &str) {
    if let Some(index) = records.iter().position(|record| record == value) {
        records.remove(index);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::testing::FakeDns;

    fn provider(dns: FakeDns) -> DesecProvider {
        DesecProvider::with_lookup(
            "https://desec.example/api/v1/domains".to_string(),
            "Token test".to_string(),
            Box::new(dns),
        )
    }

    #[test]
    fn subname_is_relative_to_the_apex() {
        assert_eq!(
            subname_of("_acme-challenge.sub.example.com", "example.com"),
            "_acme-challenge.sub"
        );
        assert_eq!(subname_of("_acme-challenge.example.com", "example.com"), "_acme-challenge");
        assert_eq!(subname_of("example.com", "example.com"), "");
    }

    #[test]
    fn quoting_and_removal_round_trip() {
        let mut records = vec![
            "\"pre-existing\"".to_string(),
            quote("challenge-value"),
            "\"other\"".to_string(),
        ];
        remove_record(&mut records, &quote("challenge-value"));
        assert_eq!(records, vec!["\"pre-existing\"", "\"other\""]);

        // removing again leaves the set untouched
        remove_record(&mut records, &quote("challenge-value"));
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn remove_record_drops_a_single_occurrence() {
        let mut records = vec![quote("v"), quote("v")];
        remove_record(&mut records, &quote("v"));
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn missing_zone_apex_is_fatal() {
        let mut provider = provider(FakeDns::default());
        let err = provider
            .add_txt_record("_acme-challenge.example.com", "value")
            .unwrap_err();
        assert!(err.to_string().contains("no zone apex"));
    }

    #[test]
    fn delete_without_publish_is_a_no_op() {
        let mut provider = provider(FakeDns::default());
        assert!(!provider.delete_txt_record().unwrap());
    }

    #[test]
    fn record_set_serializes_desec_fields() {
        let record_set = RecordSet {
            subname: "_acme-challenge".to_string(),
            record_type: "TXT".to_string(),
            ttl: RECORD_TTL,
            records: vec![quote("value")],
        };
        let json = serde_json::to_string(&record_set).unwrap();
        assert!(json.contains("\"subname\":\"_acme-challenge\""));
        assert!(json.contains("\"type\":\"TXT\""));
        assert!(json.contains("\"ttl\":3600"));
        assert!(json.contains("\\\"value\\\""));
    }
}
