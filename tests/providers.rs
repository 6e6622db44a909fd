//! Live DNS provider round-trip tests. They talk to the real provider APIs
//! and only run with `--features integration-tests` and the provider
//! credentials exported in the environment:
//!
//! ```sh
//! DESEC_API_TOKEN=... DESEC_TEST_DOMAIN=example.dedyn.io \
//!     cargo test --features integration-tests --test providers
//! ```

#![cfg(feature = "integration-tests")]

use anyhow::{anyhow, Context, Result};
use reqwest::header::AUTHORIZATION;

use certfetch::config::ProviderProperties;
use certfetch::providers::{DesecProvider, DnsTxtProvider};

struct DesecConfig {
    api_url: String,
    api_token: String,
    /// A domain inside a deSEC-managed zone the token may write to.
    test_domain: String,
}

fn load_desec_config() -> Option<DesecConfig> {
    let api_token = std::env::var("DESEC_API_TOKEN").ok()?;
    let test_domain = std::env::var("DESEC_TEST_DOMAIN").ok()?;
    let api_url = std::env::var("DESEC_API_URL")
        .unwrap_or_else(|_| "https://desec.io/api/v1/domains".to_string());
    Some(DesecConfig {
        api_url,
        api_token,
        test_domain,
    })
}

fn list_rrset_records(config: &DesecConfig, zone: &str, subname: &str) -> Result<Vec<String>> {
    #[derive(serde::Deserialize)]
    struct RecordSet {
        records: Vec<String>,
    }

    let url = format!(
        "{}/{}/rrsets/{}/TXT/",
        config.api_url,
        zone,
        if subname.is_empty() { "@" } else { subname }
    );
    let response = reqwest::blocking::Client::new()
        .get(&url)
        .header(AUTHORIZATION, format!("Token {}", config.api_token))
        .send()
        .context("failed to list deSEC RRset")?;
    if response.status() == reqwest::StatusCode::NOT_FOUND {
        return Ok(Vec::new());
    }
    if !response.status().is_success() {
        return Err(anyhow!("listing RRset failed: {}", response.status()));
    }
    let record_set: RecordSet = response.json().context("failed to parse deSEC RRset")?;
    Ok(record_set.records)
}

fn zone_of(domain: &str) -> String {
    let labels: Vec<&str> = domain.split('.').collect();
    labels[labels.len().saturating_sub(2)..].join(".")
}

fn subname_of(domain: &str, zone: &str) -> String {
    domain
        .strip_suffix(zone)
        .map(|prefix| prefix.trim_end_matches('.').to_string())
        .unwrap_or_default()
}

/// Publishing and retracting a value must leave the RRset exactly as it was
/// before, with no duplicate or orphaned records.
#[test]
fn desec_add_delete_round_trip_restores_the_record_set() -> Result<()> {
    let Some(config) = load_desec_config() else {
        eprintln!("skipping: DESEC_API_TOKEN / DESEC_TEST_DOMAIN not set");
        return Ok(());
    };

    let fqdn = format!("_acme-challenge.{}", config.test_domain);
    let zone = zone_of(&config.test_domain);
    let subname = subname_of(&fqdn, &zone);

    let before = list_rrset_records(&config, &zone, &subname)?;

    let properties = ProviderProperties::from_pairs([
        ("api_url", config.api_url.as_str()),
        ("api_token", config.api_token.as_str()),
    ]);
    let mut provider = DesecProvider::new(&properties)?;

    let published = provider.add_txt_record(&fqdn, "certfetch-integration-test")?;
    assert!(published, "expected the TXT record to be published");

    let during = list_rrset_records(&config, &zone, &subname)?;
    assert!(
        during.contains(&"\"certfetch-integration-test\"".to_string()),
        "published value not present in RRset: {during:?}"
    );

    let removed = provider.delete_txt_record()?;
    assert!(removed, "expected the TXT record to be removed");

    let after = list_rrset_records(&config, &zone, &subname)?;
    assert_eq!(before, after, "RRset changed by the add/delete round trip");
    Ok(())
}

/// A second publish of the same value must not leave the provider without
/// its deletion state.
#[test]
fn desec_delete_reports_false_when_nothing_was_published() -> Result<()> {
    let Some(config) = load_desec_config() else {
        eprintln!("skipping: DESEC_API_TOKEN / DESEC_TEST_DOMAIN not set");
        return Ok(());
    };

    let properties = ProviderProperties::from_pairs([
        ("api_url", config.api_url.as_str()),
        ("api_token", config.api_token.as_str()),
    ]);
    let mut provider = DesecProvider::new(&properties)?;
    assert!(!provider.delete_txt_record()?);
    Ok(())
}
