//! Propagation consistency check: before the server is told a challenge is
//! ready, every authoritative name server of the zone must agree on the
//! published TXT value.

use std::thread;
use std::time::Duration;

use log::{debug, info, warn};
use rand::seq::SliceRandom;

use super::{cname_target, zone_apex, DnsLookup};

const MAX_ROUNDS: u32 = 180;
const ROUND_DELAY: Duration = Duration::from_secs(60);

/// Polls all authoritative name servers of a domain's zone until they all
/// return the expected TXT value or the round budget runs out. The outcome
/// is advisory: the caller notifies the server either way, since the
/// server's own validation is the authoritative gate.
pub struct PropagationCheck<'a> {
    dns: &'a dyn DnsLookup,
    max_rounds: u32,
    round_delay: Duration,
}

impl<'a> PropagationCheck<'a> {
    /// The default schedule: up to 180 rounds, one per minute — three hours
    /// of waiting at most.
    pub fn new(dns: &'a dyn DnsLookup) -> Self {
        Self::with_schedule(dns, MAX_ROUNDS, ROUND_DELAY)
    }

    pub fn with_schedule(dns: &'a dyn DnsLookup, max_rounds: u32, round_delay: Duration) -> Self {
        Self {
            dns,
            max_rounds,
            round_delay,
        }
    }

    /// True once a full round of name servers agreed on `expected_txt`,
    /// false on timeout or when the zone has no name servers. Never fails.
    pub fn wait_until_in_sync(&self, domain: &str, expected_txt: &str) -> bool {
        let target = cname_target(self.dns, domain);
        let Some(apex) = zone_apex(self.dns, &target) else {
            warn!("[dns] no zone apex found for {target}; skipping propagation check");
            return false;
        };
        let mut name_servers = self.dns.name_servers(&apex);
        if name_servers.is_empty() {
            warn!("[dns] no authoritative name servers found for {apex}");
            return false;
        }

        let mut rng = rand::thread_rng();
        for round in 0..self.max_rounds {
            // shuffling defeats ordering bias and per-server caching effects
            name_servers.shuffle(&mut rng);
            thread::sleep(self.round_delay);
            info!("[dns] propagation round {} of {}", round + 1, self.max_rounds);
            if self.name_servers_in_sync(&name_servers, &target, expected_txt) {
                return true;
            }
        }
        false
    }

    /// One round: every name server must return exactly one TXT record with
    /// the expected value. Extra records are a mismatch even when the
    /// expected one is among them. Stops on the first mismatch.
    fn name_servers_in_sync(
        &self,
        name_servers: &[String],
        domain: &str,
        expected: &str,
    ) -> bool {
        for name_server in name_servers {
            let records = self.dns.txt_at(name_server, domain);
            debug!("[dns] {name_server} returned TXT {records:?} for {domain}");
            if records.len() != 1 || records[0] != expected {
                info!("[dns] all name servers return the expected TXT value: no");
                return false;
            }
        }
        info!("[dns] all name servers return the expected TXT value: yes");
        true
    }
}
