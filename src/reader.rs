//! Read-side façade: cache, then durable store, then a well-typed empty.
//!
//! Readers never reach upstream sources. A cache hit is served as-is; a miss
//! falls through to the latest SQLite snapshot and repopulates the cache with
//! the dataset's TTL; a cold store yields an empty payload, never an error.

use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use crate::cache::Cache;
use crate::store::models::{
    standings_key, Fixture, League, Standings, KEY_LIVE_FIXTURES, KEY_TODAY_FIXTURES,
    KEY_TOP_LEAGUES,
};
use crate::store::Database;

/// Where a response payload actually came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServedFrom {
    Cache,
    Store,
    Empty,
}

/// A dataset plus its provenance.
#[derive(Debug, Clone)]
pub struct ReadResult<T> {
    pub data: T,
    pub source: ServedFrom,
    pub captured_at: Option<DateTime<Utc>>,
}

impl<T> ReadResult<T> {
    fn empty(data: T) -> Self {
        ReadResult {
            data,
            source: ServedFrom::Empty,
            captured_at: None,
        }
    }
}

/// Per-dataset cache lifetimes.
#[derive(Debug, Clone, Copy)]
pub struct ReadTtls {
    pub live: Duration,
    pub today: Duration,
    pub leagues: Duration,
    pub standings: Duration,
    pub fixture: Duration,
}

impl Default for ReadTtls {
    fn default() -> Self {
        ReadTtls {
            live: Duration::from_secs(120),
            today: Duration::from_secs(300),
            leagues: Duration::from_secs(3600),
            standings: Duration::from_secs(1800),
            fixture: Duration::from_secs(180),
        }
    }
}

/// Dataset age and size as reported by `GET /fixtures/freshness`.
#[derive(Debug, Clone, Serialize)]
pub struct Freshness {
    pub captured_at: Option<DateTime<Utc>>,
    pub age_seconds: Option<i64>,
    /// Items in the stored snapshot; `None` when the dataset is absent.
    pub count: Option<usize>,
}

#[derive(Clone)]
pub struct ReadService {
    store: Database,
    cache: Cache,
    ttls: ReadTtls,
}

impl ReadService {
    pub fn new(store: Database, cache: Cache, ttls: ReadTtls) -> Self {
        ReadService { store, cache, ttls }
    }

    pub async fn get_live_fixtures(&self) -> Result<ReadResult<Vec<Fixture>>> {
        self.read_list(KEY_LIVE_FIXTURES, self.ttls.live).await
    }

    pub async fn get_today_fixtures(&self) -> Result<ReadResult<Vec<Fixture>>> {
        self.read_list(KEY_TODAY_FIXTURES, self.ttls.today).await
    }

    pub async fn get_top_leagues(&self) -> Result<ReadResult<Vec<League>>> {
        self.read_list(KEY_TOP_LEAGUES, self.ttls.leagues).await
    }

    /// Table for one league. `season` defaults to the current year.
    pub async fn get_standings(
        &self,
        league: u32,
        season: Option<i32>,
    ) -> Result<ReadResult<Option<Standings>>> {
        let season = season.unwrap_or_else(|| Utc::now().year());
        let key = standings_key(league, season);
        match self.read_dataset(&key, self.ttls.standings).await? {
            Some((value, source, captured_at)) => {
                let standings: Standings = serde_json::from_value(value)
                    .with_context(|| format!("corrupt snapshot payload for '{}'", key))?;
                Ok(ReadResult {
                    data: Some(standings),
                    source,
                    captured_at: Some(captured_at),
                })
            }
            None => Ok(ReadResult::empty(None)),
        }
    }

    /// Look a fixture up by id across the live set first, then today's set.
    /// Hits are cached individually under `fixture_{id}`.
    pub async fn get_fixture_by_id(&self, id: &str) -> Result<ReadResult<Option<Fixture>>> {
        let cache_key = format!("fixture_{}", id);
        if let Some(value) = self.cache.get(&cache_key).await {
            let fixture: Fixture = serde_json::from_value(value)
                .with_context(|| format!("corrupt cache entry for '{}'", cache_key))?;
            return Ok(ReadResult {
                captured_at: Some(fixture.captured_at),
                data: Some(fixture),
                source: ServedFrom::Cache,
            });
        }

        for (key, ttl) in [
            (KEY_LIVE_FIXTURES, self.ttls.live),
            (KEY_TODAY_FIXTURES, self.ttls.today),
        ] {
            let result: ReadResult<Vec<Fixture>> = self.read_list(key, ttl).await?;
            if let Some(fixture) = result.data.into_iter().find(|f| f.id == id) {
                self.cache
                    .set(
                        &cache_key,
                        serde_json::to_value(&fixture)?,
                        self.ttls.fixture,
                    )
                    .await;
                return Ok(ReadResult {
                    data: Some(fixture),
                    source: result.source,
                    captured_at: result.captured_at,
                });
            }
        }
        Ok(ReadResult::empty(None))
    }

    /// Total snapshots currently held in the durable store.
    pub fn snapshot_count(&self) -> Result<i64> {
        self.store.count()
    }

    /// Snapshot ages for the core datasets.
    pub fn get_data_freshness(&self) -> Result<Vec<(String, Freshness)>> {
        let now = Utc::now();
        [KEY_LIVE_FIXTURES, KEY_TODAY_FIXTURES, KEY_TOP_LEAGUES]
            .iter()
            .map(|key| {
                let snapshot = self.store.get(key)?;
                let captured_at = snapshot.as_ref().map(|s| s.captured_at);
                let count = snapshot
                    .as_ref()
                    .and_then(|s| s.payload.as_array().map(|items| items.len()));
                Ok((
                    key.to_string(),
                    Freshness {
                        captured_at,
                        age_seconds: captured_at.map(|ts| (now - ts).num_seconds()),
                        count,
                    },
                ))
            })
            .collect()
    }

    async fn read_list<T>(&self, key: &str, ttl: Duration) -> Result<ReadResult<Vec<T>>>
    where
        T: DeserializeOwned,
    {
        match self.read_dataset(key, ttl).await? {
            Some((value, source, captured_at)) => {
                let data: Vec<T> = serde_json::from_value(value)
                    .with_context(|| format!("corrupt snapshot payload for '{}'", key))?;
                Ok(ReadResult {
                    data,
                    source,
                    captured_at: Some(captured_at),
                })
            }
            None => Ok(ReadResult::empty(vec![])),
        }
    }

    /// The cache→store fallback chain shared by every read. Cache entries
    /// carry the snapshot's capture time alongside the payload.
    async fn read_dataset(
        &self,
        key: &str,
        ttl: Duration,
    ) -> Result<Option<(serde_json::Value, ServedFrom, DateTime<Utc>)>> {
        if let Some(entry) = self.cache.get(key).await {
            if let (Some(payload), Some(ts)) = (
                entry.get("payload").cloned(),
                entry
                    .get("captured_at")
                    .and_then(|v| serde_json::from_value(v.clone()).ok()),
            ) {
                debug!("serving '{}' from cache", key);
                return Ok(Some((payload, ServedFrom::Cache, ts)));
            }
        }

        match self.store.get(key)? {
            Some(snapshot) => {
                self.cache
                    .set(
                        key,
                        json!({
                            "payload": snapshot.payload,
                            "captured_at": snapshot.captured_at,
                        }),
                        ttl,
                    )
                    .await;
                debug!("serving '{}' from store", key);
                Ok(Some((
                    snapshot.payload,
                    ServedFrom::Store,
                    snapshot.captured_at,
                )))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::models::{FixtureStatus, LeagueInfo, Score, StandingRow, Team};

    fn fixture(id: &str) -> Fixture {
        Fixture {
            id: id.into(),
            status: FixtureStatus::FirstHalf,
            elapsed_minutes: Some(30),
            kickoff: None,
            timezone: None,
            league: LeagueInfo {
                name: "Premier League".into(),
                ..Default::default()
            },
            home: Team {
                id: None,
                name: "Home".into(),
                badge: None,
                winner: None,
            },
            away: Team {
                id: None,
                name: "Away".into(),
                badge: None,
                winner: None,
            },
            score: Score::default(),
            source: "test".into(),
            captured_at: Utc::now(),
        }
    }

    fn service() -> (ReadService, Database) {
        let store = Database::open(":memory:").unwrap();
        let reader = ReadService::new(store.clone(), Cache::new(), ReadTtls::default());
        (reader, store)
    }

    #[tokio::test]
    async fn test_store_then_cache_chain() {
        let (reader, store) = service();
        store
            .upsert(KEY_LIVE_FIXTURES, &vec![fixture("f1")])
            .unwrap();

        let first = reader.get_live_fixtures().await.unwrap();
        assert_eq!(first.source, ServedFrom::Store);
        assert_eq!(first.data.len(), 1);

        // Second read is served from the repopulated cache.
        let second = reader.get_live_fixtures().await.unwrap();
        assert_eq!(second.source, ServedFrom::Cache);
        assert_eq!(second.data[0].id, "f1");
        assert_eq!(first.captured_at, second.captured_at);
    }

    #[tokio::test]
    async fn test_cold_state_is_empty_not_error() {
        let (reader, _store) = service();
        let live = reader.get_live_fixtures().await.unwrap();
        assert_eq!(live.source, ServedFrom::Empty);
        assert!(live.data.is_empty());
        assert!(live.captured_at.is_none());
    }

    #[tokio::test]
    async fn test_disabled_cache_reads_store_every_time() {
        let store = Database::open(":memory:").unwrap();
        let reader = ReadService::new(store.clone(), Cache::disabled(), ReadTtls::default());
        store
            .upsert(KEY_LIVE_FIXTURES, &vec![fixture("f1")])
            .unwrap();

        for _ in 0..2 {
            let result = reader.get_live_fixtures().await.unwrap();
            assert_eq!(result.source, ServedFrom::Store);
        }
    }

    #[tokio::test]
    async fn test_fixture_by_id_scans_live_then_today() {
        let (reader, store) = service();
        store
            .upsert(KEY_LIVE_FIXTURES, &vec![fixture("live1")])
            .unwrap();
        store
            .upsert(KEY_TODAY_FIXTURES, &vec![fixture("today1")])
            .unwrap();

        let hit = reader.get_fixture_by_id("today1").await.unwrap();
        assert!(hit.data.is_some());

        // Individual fixture is now cached under its own key.
        let again = reader.get_fixture_by_id("today1").await.unwrap();
        assert_eq!(again.source, ServedFrom::Cache);

        let miss = reader.get_fixture_by_id("nope").await.unwrap();
        assert!(miss.data.is_none());
        assert_eq!(miss.source, ServedFrom::Empty);
    }

    #[tokio::test]
    async fn test_standings_default_season() {
        let (reader, store) = service();
        let season = Utc::now().year();
        store
            .upsert(
                &standings_key(39, season),
                &Standings {
                    league_id: 39,
                    season,
                    rows: vec![StandingRow {
                        rank: 1,
                        team_id: None,
                        team: "Arsenal".into(),
                        played: 5,
                        points: 13,
                        goal_diff: 8,
                    }],
                },
            )
            .unwrap();

        let result = reader.get_standings(39, None).await.unwrap();
        let standings = result.data.unwrap();
        assert_eq!(standings.season, season);
        assert_eq!(standings.rows[0].team, "Arsenal");

        let missing = reader.get_standings(61, None).await.unwrap();
        assert!(missing.data.is_none());
        assert_eq!(missing.source, ServedFrom::Empty);
    }

    #[tokio::test]
    async fn test_freshness_reports_ages_and_counts() {
        let (reader, store) = service();
        store
            .upsert(KEY_LIVE_FIXTURES, &vec![fixture("f1"), fixture("f2")])
            .unwrap();

        let freshness = reader.get_data_freshness().unwrap();
        let live = freshness
            .iter()
            .find(|(k, _)| k == KEY_LIVE_FIXTURES)
            .unwrap();
        assert!(live.1.captured_at.is_some());
        assert!(live.1.age_seconds.unwrap() < 5);
        assert_eq!(live.1.count, Some(2));

        let leagues = freshness
            .iter()
            .find(|(k, _)| k == KEY_TOP_LEAGUES)
            .unwrap();
        assert!(leagues.1.captured_at.is_none());
        assert!(leagues.1.count.is_none());
    }
}
