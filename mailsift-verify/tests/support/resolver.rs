//! In-memory MX source that counts every lookup.
#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use mailsift_verify::{DnsError, LookupBudget, MailExchangerLookup, MailServer};

#[derive(Default)]
pub struct StaticResolver {
    records: HashMap<String, Vec<MailServer>>,
    panic_on: Option<String>,
    delay: Option<Duration>,
    lookups: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl StaticResolver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers `domain` with the given `(endpoint, preference)` pairs, where
    /// each endpoint is `host:port`.
    #[must_use]
    pub fn with_exchangers<S: AsRef<str>>(mut self, domain: &str, exchangers: &[(S, u16)]) -> Self {
        let servers = exchangers
            .iter()
            .map(|(endpoint, priority)| {
                let endpoint = endpoint.as_ref();
                let (host, port) = endpoint.rsplit_once(':').unwrap_or((endpoint, "25"));
                MailServer::new(host.to_string(), *priority, port.parse().unwrap_or(25))
            })
            .collect();
        self.records.insert(domain.to_string(), servers);
        self
    }

    /// Panics when asked about `domain`.
    #[must_use]
    pub fn panicking_on(mut self, domain: &str) -> Self {
        self.panic_on = Some(domain.to_string());
        self
    }

    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    #[must_use]
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    /// Highest number of lookups that were ever running at once.
    #[must_use]
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn into_shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}

#[async_trait]
impl MailExchangerLookup for StaticResolver {
    async fn resolve(
        &self,
        domain: &str,
        _budget: LookupBudget,
    ) -> Result<Arc<Vec<MailServer>>, DnsError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);

        assert!(
            self.panic_on.as_deref() != Some(domain),
            "resolver exploded on {domain}"
        );

        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(running, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let mut servers = self
            .records
            .get(domain)
            .cloned()
            .ok_or_else(|| DnsError::NoMailServers(domain.to_string()))?;
        servers.sort_by_key(|server| server.priority);
        Ok(Arc::new(servers))
    }
}
