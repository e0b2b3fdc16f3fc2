//! MX resolution for the verification pipeline.
//!
//! Lookups are fail-closed: an NXDOMAIN, an empty answer, a resolver error
//! and a timeout all mean "no mail exchanger". There is deliberately no A/AAAA
//! fallback, since a domain that publishes no MX is treated as undeliverable.
//!
//! # Caching Strategy
//!
//! - **DNS TTL by default**: successful answers are cached for the record TTL
//! - **Bounded TTLs**: min (60s) and max (3600s) bounds prevent extremes
//! - **Failures are never cached**, so a transient resolver outage does not
//!   poison later batches
//! - **Lock-free**: `DashMap` provides concurrent access from every pipeline task

use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use dashmap::DashMap;
use hickory_resolver::{
    TokioResolver,
    config::{ResolverConfig, ResolverOpts},
    name_server::TokioConnectionProvider,
    system_conf::read_system_conf,
};
use serde::{Deserialize, Serialize};
use mailsift_common::internal;
use thiserror::Error;

/// Default SMTP port for exchangers found through DNS.
const SMTP_PORT: u16 = 25;

#[derive(Debug, Error)]
pub enum DnsError {
    /// The domain exists but publishes no usable MX record.
    #[error("No mail servers found for domain: {0}")]
    NoMailServers(String),

    #[error("DNS lookup failed: {0}")]
    LookupFailed(#[from] hickory_resolver::ResolveError),

    #[error("Domain does not exist: {0}")]
    DomainNotFound(String),

    /// The overall lookup lifetime elapsed.
    #[error("DNS query timed out for domain: {0}")]
    Timeout(String),
}

/// Time allowed for one MX lookup.
///
/// `timeout` bounds each individual query to a name server; `lifetime`
/// bounds the whole lookup, including any name server failover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupBudget {
    pub timeout_ms: u64,
    pub lifetime_ms: u64,
}

impl LookupBudget {
    /// The MX stage of the pipeline.
    pub const MX_CHECK: Self = Self::new(2_000, 3_000);
    /// Resolution inside a fast probe.
    pub const FAST_PROBE: Self = Self::new(1_000, 2_000);
    /// Resolution inside a standard probe.
    pub const STANDARD_PROBE: Self = Self::new(5_000, 10_000);

    #[must_use]
    pub const fn new(timeout_ms: u64, lifetime_ms: u64) -> Self {
        Self {
            timeout_ms,
            lifetime_ms,
        }
    }

    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    #[must_use]
    pub const fn lifetime(&self) -> Duration {
        Duration::from_millis(self.lifetime_ms)
    }
}

/// Budgets for each place the pipeline resolves MX records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupBudgets {
    #[serde(default = "defaults::mx_check")]
    pub mx_check: LookupBudget,
    #[serde(default = "defaults::fast_probe")]
    pub fast_probe: LookupBudget,
    #[serde(default = "defaults::standard_probe")]
    pub standard_probe: LookupBudget,
}

impl Default for LookupBudgets {
    fn default() -> Self {
        Self {
            mx_check: LookupBudget::MX_CHECK,
            fast_probe: LookupBudget::FAST_PROBE,
            standard_probe: LookupBudget::STANDARD_PROBE,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DnsConfig {
    #[serde(default)]
    pub budgets: LookupBudgets,

    /// Cache TTL override in seconds. When unset, the record TTL is used.
    #[serde(default)]
    pub cache_ttl_secs: Option<u64>,

    #[serde(default = "defaults::min_cache_ttl_secs")]
    pub min_cache_ttl_secs: u64,

    #[serde(default = "defaults::max_cache_ttl_secs")]
    pub max_cache_ttl_secs: u64,

    /// Fixed exchangers (`host[:port]`) per domain, bypassing DNS entirely.
    #[serde(default)]
    pub mx_overrides: HashMap<String, String>,
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            budgets: LookupBudgets::default(),
            cache_ttl_secs: None,
            min_cache_ttl_secs: defaults::min_cache_ttl_secs(),
            max_cache_ttl_secs: defaults::max_cache_ttl_secs(),
            mx_overrides: HashMap::new(),
        }
    }
}

mod defaults {
    use super::LookupBudget;

    pub const fn mx_check() -> LookupBudget {
        LookupBudget::MX_CHECK
    }
    pub const fn fast_probe() -> LookupBudget {
        LookupBudget::FAST_PROBE
    }
    pub const fn standard_probe() -> LookupBudget {
        LookupBudget::STANDARD_PROBE
    }
    pub const fn min_cache_ttl_secs() -> u64 {
        60 // 1 minute
    }
    pub const fn max_cache_ttl_secs() -> u64 {
        3600 // 1 hour
    }
}

/// A mail exchanger and its MX preference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailServer {
    pub host: String,
    /// MX preference (lower value = tried first).
    pub priority: u16,
    pub port: u16,
}

impl MailServer {
    #[must_use]
    pub const fn new(host: String, priority: u16, port: u16) -> Self {
        Self {
            host,
            priority,
            port,
        }
    }

    /// Parses an override of the form `host` or `host:port`.
    #[must_use]
    pub fn from_override(value: &str) -> Option<Self> {
        let (host, port) = match value.rsplit_once(':') {
            Some((host, port)) => (host, port.parse().ok()?),
            None => (value, SMTP_PORT),
        };

        (!host.is_empty()).then(|| Self::new(host.to_string(), 0, port))
    }

    /// Returns the full address as `host:port`.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Source of MX records for the pipeline.
///
/// Implementations return exchangers sorted by ascending preference and never
/// return an empty list as success.
#[async_trait]
pub trait MailExchangerLookup: Send + Sync {
    /// # Errors
    ///
    /// Returns `DnsError` when no exchanger can be determined within `budget`.
    async fn resolve(
        &self,
        domain: &str,
        budget: LookupBudget,
    ) -> Result<Arc<Vec<MailServer>>, DnsError>;
}

/// Returns `true` when `domain` has at least one mail exchanger.
///
/// Every failure is folded into `false`.
pub async fn has_mx(
    resolver: &dyn MailExchangerLookup,
    domain: &str,
    budget: LookupBudget,
) -> bool {
    match resolver.resolve(domain, budget).await {
        Ok(servers) => !servers.is_empty(),
        Err(err) => {
            internal!(level = DEBUG, %domain, error = %err, "MX check failed");
            false
        }
    }
}

#[derive(Debug, Clone)]
struct CachedResult {
    servers: Arc<Vec<MailServer>>,
    expires_at: Instant,
}

/// System-configured DNS resolver with a shared answer cache.
///
/// One underlying resolver is kept per query timeout, since hickory fixes the
/// timeout when a resolver is built.
#[derive(Debug)]
pub struct DnsResolver {
    resolver_config: ResolverConfig,
    base_opts: ResolverOpts,
    resolvers: DashMap<Duration, Arc<TokioResolver>>,
    cache: DashMap<String, CachedResult>,
    overrides: HashMap<String, MailServer>,
    config: DnsConfig,
}

impl DnsResolver {
    /// Creates a resolver from the system configuration (`/etc/resolv.conf`),
    /// falling back to Cloudflare when it cannot be read.
    #[must_use]
    pub fn new(config: DnsConfig) -> Self {
        let (resolver_config, base_opts) = read_system_conf().unwrap_or_else(|err| {
            internal!(
                level = WARN,
                "Unable to read system DNS configuration, using defaults: {err}"
            );
            (ResolverConfig::cloudflare(), ResolverOpts::default())
        });
        Self::with_resolver_config(resolver_config, base_opts, config)
    }

    /// Creates a resolver with explicit name servers.
    #[must_use]
    pub fn with_resolver_config(
        resolver_config: ResolverConfig,
        base_opts: ResolverOpts,
        config: DnsConfig,
    ) -> Self {
        let overrides = config
            .mx_overrides
            .iter()
            .filter_map(|(domain, target)| {
                let server = MailServer::from_override(target);
                if server.is_none() {
                    internal!(level = WARN, %domain, %target, "Ignoring malformed MX override");
                }
                server.map(|server| (normalize(domain), server))
            })
            .collect();

        Self {
            resolver_config,
            base_opts,
            resolvers: DashMap::new(),
            cache: DashMap::new(),
            overrides,
            config,
        }
    }

    /// The budgets this resolver was configured with.
    #[must_use]
    pub const fn budgets(&self) -> LookupBudgets {
        self.config.budgets
    }

    fn resolver_for(&self, timeout: Duration) -> Arc<TokioResolver> {
        let entry = self.resolvers.entry(timeout).or_insert_with(|| {
            let mut opts = self.base_opts.clone();
            opts.timeout = timeout;
            opts.attempts = 1;

            Arc::new(
                TokioResolver::builder_with_config(
                    self.resolver_config.clone(),
                    TokioConnectionProvider::default(),
                )
                .with_options(opts)
                .build(),
            )
        });

        Arc::clone(entry.value())
    }

    /// The record TTL within the configured bounds. An inverted range
    /// collapses onto the minimum.
    fn cache_ttl(&self, dns_ttl: u32) -> Duration {
        let min = self.config.min_cache_ttl_secs;
        let max = self.config.max_cache_ttl_secs.max(min);
        let secs = self
            .config
            .cache_ttl_secs
            .unwrap_or_else(|| u64::from(dns_ttl).clamp(min, max));
        Duration::from_secs(secs)
    }

    async fn lookup_uncached(
        &self,
        domain: &str,
        budget: LookupBudget,
    ) -> Result<(Vec<MailServer>, u32), DnsError> {
        let resolver = self.resolver_for(budget.timeout());
        // Fully qualified, so search domains are never appended.
        let fqdn = format!("{domain}.");

        let answer = tokio::time::timeout(budget.lifetime(), resolver.mx_lookup(fqdn))
            .await
            .map_err(|_| DnsError::Timeout(domain.to_string()))?;

        let mx_lookup = match answer {
            Ok(mx_lookup) => mx_lookup,
            Err(err) if err.is_nx_domain() => {
                return Err(DnsError::DomainNotFound(domain.to_string()));
            }
            Err(err) if err.is_no_records_found() => {
                return Err(DnsError::NoMailServers(domain.to_string()));
            }
            Err(err) => {
                internal!(level = WARN, "MX lookup failed for {domain}: {err}");
                return Err(DnsError::LookupFailed(err));
            }
        };

        let min_ttl = mx_lookup
            .as_lookup()
            .records()
            .iter()
            .map(hickory_resolver::proto::rr::Record::ttl)
            .min()
            .unwrap_or(300);

        let mut servers: Vec<MailServer> = mx_lookup
            .iter()
            .filter_map(|mx| {
                let host = mx.exchange().to_utf8();
                let host = host.trim_end_matches('.');
                // RFC 7505 null MX ("0 .") declares the domain accepts no mail.
                (!host.is_empty())
                    .then(|| MailServer::new(host.to_string(), mx.preference(), SMTP_PORT))
            })
            .collect();

        if servers.is_empty() {
            return Err(DnsError::NoMailServers(domain.to_string()));
        }

        servers.sort_by_key(|s| s.priority);
        internal!(
            level = DEBUG,
            "Resolved {} MX record(s) for {domain} with TTL {min_ttl}s",
            servers.len()
        );
        Ok((servers, min_ttl))
    }
}

#[async_trait]
impl MailExchangerLookup for DnsResolver {
    async fn resolve(
        &self,
        domain: &str,
        budget: LookupBudget,
    ) -> Result<Arc<Vec<MailServer>>, DnsError> {
        let domain = normalize(domain);

        if let Some(server) = self.overrides.get(&domain) {
            internal!(level = DEBUG, %domain, server = %server.address(), "Using MX override");
            return Ok(Arc::new(vec![server.clone()]));
        }

        if let Some(cached) = self.cache.get(&domain) {
            if cached.expires_at > Instant::now() {
                return Ok(Arc::clone(&cached.servers));
            }
            internal!(level = DEBUG, "Cache entry expired for {domain}");
        }

        let (servers, dns_ttl) = self.lookup_uncached(&domain, budget).await?;
        let servers = Arc::new(servers);

        self.cache.insert(
            domain,
            CachedResult {
                servers: Arc::clone(&servers),
                expires_at: Instant::now() + self.cache_ttl(dns_ttl),
            },
        );

        Ok(servers)
    }
}

fn normalize(domain: &str) -> String {
    domain.trim_end_matches('.').to_ascii_lowercase()
}
