//! Zone.ee TXT provider. Unlike deSEC's RRset model, Zone.ee exposes
//! individual records: publishing POSTs one TXT record and captures the
//! server-issued record id, retracting issues a DELETE against that id.
//!
//! When the challenge name has a CNAME, the record is managed at the CNAME
//! target inside the target's zone.

use anyhow::{anyhow, Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use log::{info, warn};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};

use crate::config::ProviderProperties;
use crate::dns::{cname_target, zone_apex, DnsLookup, SystemDns};
use crate::http::{status_error, HttpClient};

use super::DnsTxtProvider;

pub struct ZoneEeProvider {
    api_url: String,
    auth_header: String,
    dns: Box<dyn DnsLookup>,
    delete_url: Option<String>,
}

#[derive(Debug, Serialize)]
struct NewTxtRecord<'a> {
    name: &'a str,
    destination: &'a str,
}

#[derive(Debug, Deserialize)]
struct TxtRecord {
    id: String,
}

impl ZoneEeProvider {
    pub fn new(properties: &ProviderProperties) -> Result<Self> {
        let api_url = properties
            .get("api_url")
            .unwrap_or("https://api.zone.eu/v2/dns")
            .trim_end_matches('/')
            .to_string();
        let user_id = properties.require("user_id")?;
        let api_key = properties.require("api_key")?;
        let credentials = STANDARD.encode(format!("{user_id}:{api_key}"));
        Ok(Self::with_lookup(
            api_url,
            format!("Basic {credentials}"),
            Box::new(SystemDns::new()?),
        ))
    }

    fn with_lookup(api_url: String, auth_header: String, dns: Box<dyn DnsLookup>) -> Self {
        Self {
            api_url,
            auth_header,
            dns,
            delete_url: None,
        }
    }
}

impl DnsTxtProvider for ZoneEeProvider {
    fn add_txt_record(&mut self, fqdn: &str, value: &str) -> Result<bool> {
        let target = cname_target(self.dns.as_ref(), fqdn);
        let apex = zone_apex(self.dns.as_ref(), &target)
            .ok_or_else(|| anyhow!("no zone apex found for {target}"))?;

        let post_url = format!("{}/{}/txt", self.api_url, apex);
        let record = NewTxtRecord {
            name: &target,
            destination: value,
        };
        info!("[zoneee] adding TXT record for {target} in zone {apex}");

        let response = HttpClient::shared()
            .post(&post_url)
            .header(AUTHORIZATION, &self.auth_header)
            .header(CONTENT_TYPE, "application/json")
            .json(&record)
            .send()
            .context("failed to create Zone.ee DNS record")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            warn!(
                "[zoneee] creating TXT record failed: {}",
                status_error("Zone.ee", status, Some(body))
            );
            return Ok(false);
        }

        let created: Vec<TxtRecord> = response
            .json()
            .context("failed to parse Zone.ee record response")?;
        let record_id = created
            .first()
            .map(|record| record.id.clone())
            .ok_or_else(|| anyhow!("Zone.ee API did not return a record id"))?;
        self.delete_url = Some(format!("{post_url}/{record_id}"));
        Ok(true)
    }

    fn delete_txt_record(&mut self) -> Result<bool> {
        let Some(url) = self.delete_url.take() else {
            warn!("[zoneee] no record published; nothing to delete");
            return Ok(false);
        };
        info!("[zoneee] deleting TXT record: {url}");

        let response = HttpClient::shared()
            .delete(&url)
            .header(AUTHORIZATION, &self.auth_header)
            .send()
            .context("failed to delete Zone.ee DNS record")?;
        Ok(response.status().is_success())
    }
}
