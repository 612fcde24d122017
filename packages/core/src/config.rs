use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::aggregator::polling::PollingPolicy;
use crate::cli::Cli;
use crate::services::{flights_sky, google_flights};

/// Longest accepted cache TTL (ten years).
pub const MAX_CACHE_TTL_SECONDS: u64 = 10 * 365 * 24 * 60 * 60;

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub cache_backend: CacheBackend,
    pub cache_url: String,
    pub database_url: String,
    pub cache_ttl_seconds: u64,
    pub cache_capacity: usize,
    pub cache_timeout_seconds: u64,
    pub provider_timeout_seconds: u64,
    pub poll_max_retries: u32,
    pub poll_backoff_ms: u64,
    pub max_results: Option<usize>,
    pub rapidapi_key: Option<String>,
    pub google_flights: RapidApiEndpoint,
    pub flights_sky: RapidApiEndpoint,
    pub upstream_services: Vec<UpstreamService>,
    pub cached_upstream_services: Vec<UpstreamService>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheBackend {
    Memory,
    Sqlite,
    Http,
}

impl FromStr for CacheBackend {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(CacheBackend::Memory),
            "sqlite" => Ok(CacheBackend::Sqlite),
            "http" => Ok(CacheBackend::Http),
            other => Err(format!(
                "Invalid CACHE_BACKEND: {} (expected memory, sqlite or http)",
                other
            )),
        }
    }
}

/// Host header and base URL for one RapidAPI-hosted provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RapidApiEndpoint {
    pub host: String,
    pub url: String,
}

/// A peer service speaking the `/flights` contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamService {
    pub name: String,
    pub url: String,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key/value source. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let cache_backend = match get("CACHE_BACKEND") {
            Some(raw) => raw.parse()?,
            None => CacheBackend::Memory,
        };

        Ok(Self {
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:3001".to_string()),
            cache_backend,
            cache_url: get("CACHE_URL").unwrap_or_else(|| "http://flight-cache:4004".to_string()),
            database_url: get("DATABASE_URL")
                .unwrap_or_else(|| "sqlite://flight_cache.db".to_string()),
            cache_ttl_seconds: check_ttl(parse_or(
                get("CACHE_TTL_SECONDS"),
                "CACHE_TTL_SECONDS",
                900,
            )?)?,
            cache_capacity: parse_or(get("CACHE_CAPACITY"), "CACHE_CAPACITY", 10_000)?,
            cache_timeout_seconds: parse_or(
                get("CACHE_TIMEOUT_SECONDS"),
                "CACHE_TIMEOUT_SECONDS",
                5,
            )?,
            provider_timeout_seconds: parse_or(
                get("PROVIDER_TIMEOUT_SECONDS"),
                "PROVIDER_TIMEOUT_SECONDS",
                30,
            )?,
            poll_max_retries: parse_or(get("POLL_MAX_RETRIES"), "POLL_MAX_RETRIES", 3)?,
            poll_backoff_ms: parse_or(get("POLL_BACKOFF_MS"), "POLL_BACKOFF_MS", 1000)?,
            max_results: get("MAX_RESULTS")
                .map(|raw| parse_value(&raw, "MAX_RESULTS"))
                .transpose()?,
            rapidapi_key: get("RAPIDAPI_KEY"),
            google_flights: endpoint(
                get("GOOGLE_FLIGHTS_HOST"),
                get("GOOGLE_FLIGHTS_URL"),
                google_flights::DEFAULT_HOST,
            ),
            flights_sky: endpoint(
                get("FLIGHTS_SKY_HOST"),
                get("FLIGHTS_SKY_URL"),
                flights_sky::DEFAULT_HOST,
            ),
            upstream_services: parse_services(get("UPSTREAM_SERVICES"), "UPSTREAM_SERVICES")?,
            cached_upstream_services: parse_services(
                get("CACHED_UPSTREAM_SERVICES"),
                "CACHED_UPSTREAM_SERVICES",
            )?,
        })
    }

    /// Let command-line flags override the environment.
    pub fn apply_cli(&mut self, cli: &Cli) -> Result<(), String> {
        if let Some(bind) = &cli.bind {
            self.bind_addr = bind.clone();
        }
        if let Some(backend) = &cli.cache_backend {
            self.cache_backend = backend.parse()?;
        }
        if let Some(url) = &cli.cache_url {
            self.cache_url = url.clone();
        }
        if let Some(ttl) = cli.cache_ttl {
            self.cache_ttl_seconds = check_ttl(ttl)?;
        }
        if let Some(max) = cli.max_results {
            self.max_results = Some(max);
        }
        Ok(())
    }

    /// `None` when entries never expire.
    pub fn cache_ttl(&self) -> Option<Duration> {
        (self.cache_ttl_seconds > 0).then(|| Duration::from_secs(self.cache_ttl_seconds))
    }

    pub fn cache_timeout(&self) -> Duration {
        Duration::from_secs(self.cache_timeout_seconds)
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_seconds)
    }

    pub fn polling_policy(&self) -> PollingPolicy {
        PollingPolicy {
            max_retries: self.poll_max_retries,
            backoff: Duration::from_millis(self.poll_backoff_ms),
            time_budget: None,
        }
        .fitted_to(self.provider_timeout())
    }
}

fn check_ttl(seconds: u64) -> Result<u64, String> {
    if seconds > MAX_CACHE_TTL_SECONDS {
        return Err(format!(
            "CACHE_TTL_SECONDS must be at most {MAX_CACHE_TTL_SECONDS}, got {seconds}"
        ));
    }
    Ok(seconds)
}

fn parse_value<T: FromStr>(raw: &str, key: &str) -> Result<T, String> {
    raw.trim()
        .parse::<T>()
        .map_err(|_| format!("{} must be a valid number", key))
}

fn parse_or<T: FromStr>(raw: Option<String>, key: &str, default: T) -> Result<T, String> {
    match raw {
        Some(raw) => parse_value(&raw, key),
        None => Ok(default),
    }
}

fn endpoint(host: Option<String>, url: Option<String>, default_host: &str) -> RapidApiEndpoint {
    let host = host.unwrap_or_else(|| default_host.to_string());
    let url = url.unwrap_or_else(|| format!("https://{}", host));
    RapidApiEndpoint { host, url }
}

/// Parse `name=url,name=url`.
fn parse_services(raw: Option<String>, key: &str) -> Result<Vec<UpstreamService>, String> {
    let Some(raw) = raw else {
        return Ok(Vec::new());
    };

    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (name, url) = entry
                .split_once('=')
                .ok_or_else(|| format!("{} entry '{}' must look like name=url", key, entry))?;
            let (name, url) = (name.trim(), url.trim());
            if name.is_empty() || url.is_empty() {
                return Err(format!("{} entry '{}' must look like name=url", key, entry));
            }
            Ok(UpstreamService {
                name: name.to_string(),
                url: url.to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config, String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = config_from(&[]).unwrap();

        assert_eq!(config.bind_addr, "0.0.0.0:3001");
        assert_eq!(config.cache_backend, CacheBackend::Memory);
        assert_eq!(config.cache_ttl(), Some(Duration::from_secs(900)));
        assert_eq!(config.cache_timeout(), Duration::from_secs(5));
        assert_eq!(config.provider_timeout(), Duration::from_secs(30));
        assert_eq!(config.polling_policy().max_retries, 3);
        assert_eq!(config.polling_policy().backoff, Duration::from_secs(1));
        assert_eq!(config.polling_policy().time_budget, Some(Duration::from_secs(27)));
        assert_eq!(config.max_results, None);
        assert!(config.rapidapi_key.is_none());
        assert_eq!(config.google_flights.url, "https://google-flights4.p.rapidapi.com");
        assert!(config.upstream_services.is_empty());
    }

    #[test]
    fn zero_ttl_disables_expiry() {
        let config = config_from(&[("CACHE_TTL_SECONDS", "0")]).unwrap();
        assert_eq!(config.cache_ttl(), None);
    }

    #[test]
    fn invalid_number_is_an_error() {
        let err = config_from(&[("POLL_MAX_RETRIES", "three")]).unwrap_err();
        assert!(err.contains("POLL_MAX_RETRIES"));
    }

    #[test]
    fn unknown_backend_is_an_error() {
        let err = config_from(&[("CACHE_BACKEND", "redis")]).unwrap_err();
        assert!(err.contains("redis"));
    }

    #[test]
    fn blank_values_fall_back_to_defaults() {
        let config = config_from(&[("CACHE_BACKEND", "  "), ("RAPIDAPI_KEY", "")]).unwrap();
        assert_eq!(config.cache_backend, CacheBackend::Memory);
        assert!(config.rapidapi_key.is_none());
    }

    #[test]
    fn upstream_services_parse_as_name_url_pairs() {
        let config = config_from(&[
            ("UPSTREAM_SERVICES", "flight-search=http://flight-search:4003, other=http://x:1"),
            ("CACHED_UPSTREAM_SERVICES", "flight-cache=http://flight-cache:4004"),
        ])
        .unwrap();

        assert_eq!(config.upstream_services.len(), 2);
        assert_eq!(config.upstream_services[0].name, "flight-search");
        assert_eq!(config.upstream_services[1].url, "http://x:1");
        assert_eq!(config.cached_upstream_services[0].name, "flight-cache");
    }

    #[test]
    fn malformed_upstream_entry_is_an_error() {
        assert!(config_from(&[("UPSTREAM_SERVICES", "just-a-url")]).is_err());
        assert!(config_from(&[("UPSTREAM_SERVICES", "=http://x")]).is_err());
    }

    #[test]
    fn custom_host_drives_default_url() {
        let config = config_from(&[("FLIGHTS_SKY_HOST", "sky.example")]).unwrap();
        assert_eq!(config.flights_sky.url, "https://sky.example");

        let config = config_from(&[("FLIGHTS_SKY_URL", "http://localhost:9000")]).unwrap();
        assert_eq!(config.flights_sky.host, flights_sky::DEFAULT_HOST);
        assert_eq!(config.flights_sky.url, "http://localhost:9000");
    }

    #[test]
    fn cli_flags_override_environment() {
        let mut config = config_from(&[("CACHE_BACKEND", "sqlite")]).unwrap();
        let cli = Cli {
            bind: Some("127.0.0.1:8080".into()),
            cache_backend: Some("http".into()),
            cache_url: None,
            cache_ttl: Some(60),
            max_results: Some(20),
        };

        config.apply_cli(&cli).unwrap();

        assert_eq!(config.bind_addr, "127.0.0.1:8080");
        assert_eq!(config.cache_backend, CacheBackend::Http);
        assert_eq!(config.cache_ttl(), Some(Duration::from_secs(60)));
        assert_eq!(config.max_results, Some(20));
    }

    #[test]
    fn out_of_range_ttl_is_a_config_error() {
        let err = config_from(&[("CACHE_TTL_SECONDS", "1000000000000000")]).unwrap_err();
        assert!(err.contains("CACHE_TTL_SECONDS"));

        let mut config = config_from(&[]).unwrap();
        let cli = Cli {
            bind: None,
            cache_backend: None,
            cache_url: None,
            cache_ttl: Some(MAX_CACHE_TTL_SECONDS + 1),
            max_results: None,
        };
        assert!(config.apply_cli(&cli).is_err());
    }

    #[test]
    fn longest_ttl_is_representable_for_expiry_math() {
        let max = MAX_CACHE_TTL_SECONDS.to_string();
        let config = config_from(&[("CACHE_TTL_SECONDS", max.as_str())]).unwrap();
        let ttl = chrono::Duration::from_std(config.cache_ttl().unwrap()).unwrap();
        assert!(chrono::Utc::now().checked_sub_signed(ttl).is_some());
    }
}
