use clap::Parser;

/// Flight aggregator CLI arguments. Each flag overrides its environment variable.
#[derive(Debug, Parser)]
#[command(
    name = "flight-aggregator",
    version,
    about = "Concurrent flight search across providers behind a quote cache"
)]
pub struct Cli {
    /// Address to listen on (BIND_ADDR)
    #[arg(long)]
    pub bind: Option<String>,

    /// Cache backend: memory, sqlite or http (CACHE_BACKEND)
    #[arg(long)]
    pub cache_backend: Option<String>,

    /// Base URL of the external cache store (CACHE_URL)
    #[arg(long)]
    pub cache_url: Option<String>,

    /// Cache entry lifetime in seconds, 0 to never expire (CACHE_TTL_SECONDS)
    #[arg(long)]
    pub cache_ttl: Option<u64>,

    /// Keep only the cheapest N quotes (MAX_RESULTS)
    #[arg(long)]
    pub max_results: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_long_flags() {
        let cli = Cli::try_parse_from([
            "flight-aggregator",
            "--bind",
            "127.0.0.1:9000",
            "--cache-backend",
            "sqlite",
            "--cache-ttl",
            "0",
        ])
        .unwrap();

        assert_eq!(cli.bind.as_deref(), Some("127.0.0.1:9000"));
        assert_eq!(cli.cache_backend.as_deref(), Some("sqlite"));
        assert_eq!(cli.cache_ttl, Some(0));
        assert!(cli.cache_url.is_none());
    }

    #[test]
    fn rejects_non_numeric_ttl() {
        assert!(Cli::try_parse_from(["flight-aggregator", "--cache-ttl", "soon"]).is_err());
    }
}
