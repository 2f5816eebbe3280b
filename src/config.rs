use clap::Parser;

/// Football fixtures ingestion service
#[derive(Parser, Debug, Clone)]
#[command(name = "matchfeed", version, about)]
pub struct Config {
    /// HTTP listen address
    #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:3000")]
    pub listen_addr: String,

    /// SQLite database path
    #[arg(long, env = "DATABASE_PATH", default_value = "matchfeed.db")]
    pub database_path: String,

    /// API-Football base URL
    #[arg(
        long,
        env = "API_FOOTBALL_URL",
        default_value = "https://v3.football.api-sports.io"
    )]
    pub api_football_url: String,

    /// API-Football key; the adapter is skipped entirely when unset
    #[arg(long, env = "API_FOOTBALL_KEY")]
    pub api_football_key: Option<String>,

    /// API-Football host header value
    #[arg(
        long,
        env = "API_FOOTBALL_HOST",
        default_value = "v3.football.api-sports.io"
    )]
    pub api_football_host: String,

    /// API-Football requests allowed per hour
    #[arg(long, env = "API_FOOTBALL_HOURLY_LIMIT", default_value = "100")]
    pub api_football_hourly_limit: u32,

    /// TheSportsDB base URL (without the key segment)
    #[arg(
        long,
        env = "SPORTSDB_URL",
        default_value = "https://www.thesportsdb.com/api/v1/json"
    )]
    pub sportsdb_url: String,

    /// TheSportsDB API key ("3" is the free shared key)
    #[arg(long, env = "SPORTSDB_KEY", default_value = "3")]
    pub sportsdb_key: String,

    /// TheSportsDB requests allowed per minute
    #[arg(long, env = "SPORTSDB_MINUTE_LIMIT", default_value = "30")]
    pub sportsdb_minute_limit: u32,

    /// Live-scores page for the scraping fallback
    #[arg(
        long,
        env = "SCRAPE_URL",
        default_value = "https://www.flashscore.com/football/"
    )]
    pub scrape_url: String,

    /// Enable the scraping fallback adapter
    #[arg(long, env = "SCRAPE_ENABLED", default_value = "true")]
    pub scrape_enabled: bool,

    /// Page fetches allowed per minute for the scraper
    #[arg(long, env = "SCRAPE_MINUTE_LIMIT", default_value = "10")]
    pub scrape_minute_limit: u32,

    /// Ingestion cycle interval in minutes
    #[arg(long, env = "POLL_INTERVAL_MINS", default_value = "15")]
    pub poll_interval_mins: u64,

    /// Days a snapshot survives before the retention sweep removes it
    #[arg(long, env = "RETENTION_DAYS", default_value = "7")]
    pub retention_days: u32,

    /// Upstream request timeout in seconds
    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value = "15")]
    pub request_timeout_secs: u64,

    /// Disable the in-memory cache (every read hits SQLite)
    #[arg(long, env = "CACHE_DISABLED", default_value = "false")]
    pub cache_disabled: bool,

    /// Cache TTL for live fixtures, seconds
    #[arg(long, env = "TTL_LIVE_SECS", default_value = "120")]
    pub ttl_live_secs: u64,

    /// Cache TTL for today's fixtures, seconds
    #[arg(long, env = "TTL_TODAY_SECS", default_value = "300")]
    pub ttl_today_secs: u64,

    /// Cache TTL for league reference data, seconds
    #[arg(long, env = "TTL_LEAGUES_SECS", default_value = "3600")]
    pub ttl_leagues_secs: u64,

    /// Cache TTL for standings, seconds
    #[arg(long, env = "TTL_STANDINGS_SECS", default_value = "1800")]
    pub ttl_standings_secs: u64,

    /// Cache TTL for a single fixture looked up by id, seconds
    #[arg(long, env = "TTL_FIXTURE_SECS", default_value = "180")]
    pub ttl_fixture_secs: u64,
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.poll_interval_mins == 0 {
            anyhow::bail!("poll_interval_mins must be at least 1");
        }
        if self.retention_days == 0 {
            anyhow::bail!("retention_days must be at least 1");
        }
        if self.request_timeout_secs == 0 {
            anyhow::bail!("request_timeout_secs must be at least 1");
        }
        if self.api_football_key.is_none() && !self.scrape_enabled {
            // TheSportsDB alone still works, but warn-level config mistakes
            // like disabling everything should fail fast.
            if self.sportsdb_minute_limit == 0 {
                anyhow::bail!("no usable data source configured");
            }
        }
        Ok(())
    }
}
