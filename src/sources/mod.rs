pub mod api_football;
pub mod scrape;
pub mod sportsdb;

pub use api_football::ApiFootballAdapter;
pub use scrape::ScrapeAdapter;
pub use sportsdb::SportsDbAdapter;

use anyhow::Result;
use async_trait::async_trait;

use crate::store::models::{Fixture, League, Standings};

/// Leagues worth carrying as reference data (API-Football id space).
pub const TOP_LEAGUE_IDS: [u32; 10] = [39, 140, 135, 78, 61, 2, 3, 848, 128, 71];

/// Subset whose tables the scheduler refreshes each cycle.
pub const STANDINGS_LEAGUE_IDS: [u32; 5] = [39, 140, 135, 78, 61];

/// Capability trait every upstream source implements. The orchestrator
/// drives any configured subset of adapters in priority order; adapters
/// absorb their own upstream failures and quota exhaustion (empty result,
/// never a panic or an unbounded wait).
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Human-readable name for logging and provenance.
    fn name(&self) -> &str;

    /// All currently in-progress matches.
    async fn fetch_live(&self) -> Result<Vec<Fixture>>;

    /// All of today's matches (any status).
    async fn fetch_today(&self) -> Result<Vec<Fixture>>;

    /// Slow-changing league reference data.
    async fn fetch_leagues(&self) -> Result<Vec<League>>;

    /// League table for one (league, season); `None` when the source has no
    /// table for that pair.
    async fn fetch_standings(&self, league: u32, season: i32) -> Result<Option<Standings>>;

    /// Requests left in the adapter's current rate window, for the stats
    /// endpoint.
    fn quota_remaining(&self) -> u32;
}
