//! DNS resolution engine: domain-hierarchy walk, zone-apex discovery,
//! CNAME following and record lookups against the system resolver or an
//! explicit authoritative name server.
//!
//! Lookups never fail hard — any resolution problem yields an empty result,
//! which callers treat as "record not present".

use std::net::SocketAddr;

use anyhow::{Context, Result};
use hickory_resolver::config::{NameServerConfig, Protocol, ResolverConfig, ResolverOpts};
use hickory_resolver::proto::rr::{RData, RecordType};
use hickory_resolver::Resolver;
use log::{debug, info, warn};

pub mod propagation;

/// Record lookups the engine, the propagation checker and the REST
/// providers are built on. The seam exists so they all run against a fake
/// in tests.
pub trait DnsLookup {
    fn cname(&self, domain: &str) -> Vec<String>;
    fn name_servers(&self, domain: &str) -> Vec<String>;
    fn soa(&self, domain: &str) -> Vec<String>;
    fn txt(&self, domain: &str) -> Vec<String>;
    /// TXT lookup against one specific name server instead of the system
    /// resolver.
    fn txt_at(&self, name_server: &str, domain: &str) -> Vec<String>;
}

/// [`DnsLookup`] backed by the host's resolver configuration.
pub struct SystemDns {
    resolver: Resolver,
}

impl SystemDns {
    pub fn new() -> Result<Self> {
        let resolver = match Resolver::from_system_conf() {
            Ok(resolver) => resolver,
            Err(err) => {
                warn!("[dns] system resolver configuration unavailable ({err}); using defaults");
                Resolver::new(ResolverConfig::default(), ResolverOpts::default())
                    .context("building fallback resolver")?
            }
        };
        Ok(Self { resolver })
    }

    /// A single-use resolver pointed at one name server, with caching off so
    /// repeated propagation probes always hit the wire.
    fn resolver_for(&self, name_server: &str) -> Option<Resolver> {
        let ip = match self.resolver.lookup_ip(name_server) {
            Ok(found) => found.iter().next()?,
            Err(err) => {
                debug!("[dns] could not resolve name server {name_server}: {err}");
                return None;
            }
        };
        let mut config = ResolverConfig::new();
        config.add_name_server(NameServerConfig::new(
            SocketAddr::new(ip, 53),
            Protocol::Udp,
        ));
        let mut opts = ResolverOpts::default();
        opts.cache_size = 0;
        opts.use_hosts_file = false;
        match Resolver::new(config, opts) {
            Ok(resolver) => Some(resolver),
            Err(err) => {
                debug!("[dns] could not build resolver for {name_server}: {err}");
                None
            }
        }
    }
}

impl DnsLookup for SystemDns {
    fn cname(&self, domain: &str) -> Vec<String> {
        records(&self.resolver, domain, RecordType::CNAME)
    }

    fn name_servers(&self, domain: &str) -> Vec<String> {
        records(&self.resolver, domain, RecordType::NS)
    }

    fn soa(&self, domain: &str) -> Vec<String> {
        records(&self.resolver, domain, RecordType::SOA)
    }

    fn txt(&self, domain: &str) -> Vec<String> {
        records(&self.resolver, domain, RecordType::TXT)
    }

    fn txt_at(&self, name_server: &str, domain: &str) -> Vec<String> {
        match self.resolver_for(name_server) {
            Some(resolver) => records(&resolver, domain, RecordType::TXT),
            None => Vec::new(),
        }
    }
}

fn records(resolver: &Resolver, domain: &str, record_type: RecordType) -> Vec<String> {
    match resolver.lookup(domain, record_type) {
        Ok(lookup) => lookup.iter().filter_map(render).collect(),
        Err(err) => {
            debug!("[dns] {record_type} lookup for {domain} failed: {err}");
            Vec::new()
        }
    }
}

fn render(rdata: &RData) -> Option<String> {
    match rdata {
        RData::CNAME(name) => Some(strip_final_dot(&name.0.to_utf8())),
        RData::NS(name) => Some(strip_final_dot(&name.0.to_utf8())),
        RData::SOA(soa) => Some(strip_final_dot(&soa.mname().to_utf8())),
        RData::TXT(txt) => {
            let joined: String = txt
                .txt_data()
                .iter()
                .map(|part| String::from_utf8_lossy(part))
                .collect();
            Some(strip_quotes(&joined))
        }
        _ => None,
    }
}

/// The domain followed by each ancestor formed by stripping the leftmost
/// label, stopping once two labels remain. The bare top-level domain is
/// never included; the input is always the first entry.
pub fn domain_hierarchy(domain: &str) -> Vec<String> {
    let mut hierarchy = Vec::new();
    if domain.is_empty() {
        warn!("[dns] domain must not be empty");
        return hierarchy;
    }
    if domain.starts_with('.') || domain.ends_with('.') {
        warn!("[dns] domain must not start or end with '.'");
        return hierarchy;
    }
    hierarchy.push(domain.to_string());

    let mut current = domain;
    while current.matches('.').count() > 1 {
        match current.split_once('.') {
            Some((_, rest)) => {
                hierarchy.push(rest.to_string());
                current = rest;
            }
            None => break,
        }
    }
    hierarchy
}

/// Walk the hierarchy outward-in and return the first level carrying both a
/// SOA record and at least one NS record.
pub fn zone_apex(dns: &dyn DnsLookup, domain: &str) -> Option<String> {
    let hierarchy = domain_hierarchy(domain);
    debug!("[dns] searching SOA and NS in hierarchy: {hierarchy:?}");
    for candidate in hierarchy {
        if dns.soa(&candidate).is_empty() {
            continue;
        }
        if dns.name_servers(&candidate).is_empty() {
            continue;
        }
        info!("[dns] found zone apex at {candidate}");
        return Some(candidate);
    }
    None
}

/// The zone apex of the domain's CNAME target when a CNAME exists, the
/// domain's own apex otherwise.
pub fn cname_zone_apex(dns: &dyn DnsLookup, domain: &str) -> Option<String> {
    let target = cname_target(dns, domain);
    zone_apex(dns, &target)
}

/// Follow a CNAME one step: the record's target when present, the domain
/// itself otherwise.
pub fn cname_target(dns: &dyn DnsLookup, domain: &str) -> String {
    match dns.cname(domain).into_iter().next() {
        Some(target) => {
            info!("[dns] CNAME found for {domain}: {target}");
            target
        }
        None => domain.to_string(),
    }
}

pub(crate) fn strip_quotes(value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.len() >= 2 && trimmed.starts_with('"') && trimmed.ends_with('"') {
        trimmed[1..trimmed.len() - 1].to_string()
    } else {
        trimmed.to_string()
    }
}

pub(crate) fn strip_final_dot(name: &str) -> String {
    if name.len() > 1 && name.ends_with('.') {
        name[..name.len() - 1].to_string()
    } else {
        name.to_string()
    }
}


#[cfg(test)]
mod tests {
    use super::testing::FakeDns;
    use super::*;

    #[test]
    fn hierarchy_of_challenge_name() {
        assert_eq!(
            domain_hierarchy("_acme-challenge.sub.example.com"),
            vec![
                "_acme-challenge.sub.example.com",
                "sub.example.com",
                "example.com"
            ]
        );
    }

    #[test]
    fn hierarchy_starts_with_the_input_and_excludes_the_tld() {
        let hierarchy = domain_hierarchy("a.b.c.example.org");
        assert_eq!(hierarchy.first().map(String::as_str), Some("a.b.c.example.org"));
        assert_eq!(hierarchy.last().map(String::as_str), Some("example.org"));
        assert!(!hierarchy.iter().any(|level| level == "org"));
    }

    #[test]
    fn hierarchy_of_two_label_domain_is_just_the_domain() {
        assert_eq!(domain_hierarchy("example.com"), vec!["example.com"]);
    }

    #[test]
    fn hierarchy_rejects_empty_and_dotted_input() {
        assert!(domain_hierarchy("").is_empty());
        assert!(domain_hierarchy("example.com.").is_empty());
        assert!(domain_hierarchy(".example.com").is_empty());
    }

    #[test]
    fn zone_apex_needs_both_soa_and_ns() {
        let dns = FakeDns::default().zone("example.com", &["ns1.example.com"]);
        assert_eq!(
            zone_apex(&dns, "_acme-challenge.sub.example.com"),
            Some("example.com".to_string())
        );

        let mut soa_only = FakeDns::default();
        soa_only.soas.insert("example.com".to_string());
        assert_eq!(zone_apex(&soa_only, "sub.example.com"), None);
    }

    #[test]
    fn zone_apex_prefers_the_most_specific_level() {
        let dns = FakeDns::default()
            .zone("sub.example.com", &["ns1.sub.example.com"])
            .zone("example.com", &["ns1.example.com"]);
        assert_eq!(
            zone_apex(&dns, "_acme-challenge.sub.example.com"),
            Some("sub.example.com".to_string())
        );
    }

    #[test]
    fn cname_zone_apex_follows_the_target() {
        let dns = FakeDns::default()
            .cname("_acme-challenge.example.com", "challenge.other.net")
            .zone("other.net", &["ns1.other.net"])
            .zone("example.com", &["ns1.example.com"]);
        assert_eq!(
            cname_zone_apex(&dns, "_acme-challenge.example.com"),
            Some("other.net".to_string())
        );
    }

    #[test]
    fn cname_target_defaults_to_the_domain() {
        let dns = FakeDns::default();
        assert_eq!(cname_target(&dns, "example.com"), "example.com");
    }

    #[test]
    fn strips_quotes_and_final_dots() {
        assert_eq!(strip_quotes("\"value\""), "value");
        assert_eq!(strip_quotes("value"), "value");
        assert_eq!(strip_quotes("\""), "\"");
        assert_eq!(strip_final_dot("ns1.example.com."), "ns1.example.com");
        assert_eq!(strip_final_dot("ns1.example.com"), "ns1.example.com");
        assert_eq!(strip_final_dot("."), ".");
    }
}
