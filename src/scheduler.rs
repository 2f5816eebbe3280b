//! Recurring ingestion orchestrator.
//!
//! A single timer drives one cycle at a time (single-flight): live fixtures
//! first, then today's fixtures, then reference data gated by age. Adapters
//! are tried in priority order and the first non-empty result wins; a step
//! where every adapter fails is recorded in `last_error` and skipped for the
//! cycle without touching the previous snapshot or the remaining steps.
//! The scheduler is the only component that writes to the durable store.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Datelike, Duration as ChronoDuration, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::sources::{SourceAdapter, STANDINGS_LEAGUE_IDS};
use crate::store::models::{
    standings_key, Fixture, League, Standings, KEY_LIVE_FIXTURES, KEY_TODAY_FIXTURES,
    KEY_TOP_LEAGUES,
};
use crate::store::Database;

/// Reference data is expensive and slow-changing: refresh at most daily.
fn leagues_refresh_after() -> ChronoDuration {
    ChronoDuration::hours(24)
}

/// Ingestion health snapshot, surfaced by `GET /fixtures/stats`.
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStats {
    pub total_updates: u64,
    pub last_update: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub fixtures_updated: usize,
    pub is_running: bool,
}

#[derive(Debug, Default)]
struct StatsInner {
    total_updates: u64,
    last_update: Option<DateTime<Utc>>,
    last_error: Option<String>,
    fixtures_updated: usize,
}

/// Result of one requested cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleOutcome {
    /// Cycle ran to completion (individual steps may still have failed).
    Completed,
    /// A cycle was already in flight; this request was a no-op.
    Skipped,
}

struct RunningFlagGuard<'a>(&'a AtomicBool);

impl Drop for RunningFlagGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct Scheduler {
    store: Database,
    adapters: Vec<Arc<dyn SourceAdapter>>,
    poll_interval: Duration,
    retention_days: i64,
    is_running: AtomicBool,
    stats: Mutex<StatsInner>,
}

impl Scheduler {
    pub fn new(
        store: Database,
        adapters: Vec<Arc<dyn SourceAdapter>>,
        poll_interval: Duration,
        retention_days: u32,
    ) -> Self {
        Scheduler {
            store,
            adapters,
            poll_interval,
            retention_days: retention_days as i64,
            is_running: AtomicBool::new(false),
            stats: Mutex::new(StatsInner::default()),
        }
    }

    /// Spawn the recurring poll loop and the daily deep-refresh loop.
    /// Overlapping ticks are skipped, never queued.
    pub fn start(self: &Arc<Self>) {
        let names: Vec<&str> = self.adapters.iter().map(|a| a.name()).collect();
        info!(
            "Scheduler started ({} adapters: {:?}, interval={:?}, retention={}d)",
            self.adapters.len(),
            names,
            self.poll_interval,
            self.retention_days
        );

        let poller = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(poller.poll_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                poller.run_cycle().await;
            }
        });

        let deep = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(24 * 3600));
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The poll loop already covers startup; skip the immediate tick.
            interval.tick().await;
            loop {
                interval.tick().await;
                if let Err(e) = deep.deep_refresh().await {
                    error!("Deep refresh failed: {:#}", e);
                }
            }
        });
    }

    /// Run one ingestion cycle unless one is already in flight.
    pub async fn run_cycle(&self) -> CycleOutcome {
        if self
            .is_running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            info!("Previous cycle still in progress, skipping this tick");
            return CycleOutcome::Skipped;
        }
        // Cleared on drop so a panicking step cannot wedge the flag and
        // silently disable every future cycle.
        let _running = RunningFlagGuard(&self.is_running);

        let started = std::time::Instant::now();
        self.run_cycle_inner().await;

        info!("Cycle finished in {:.2}s", started.elapsed().as_secs_f64());
        CycleOutcome::Completed
    }

    async fn run_cycle_inner(&self) {
        let mut fixtures_updated = 0usize;
        let mut cycle_error: Option<String> = None;

        // 1. Live fixtures — highest priority, freshest data.
        match self.fetch_live_with_fallback().await {
            Ok(live) => {
                info!("Live fixtures: {}", live.len());
                fixtures_updated += live.len();
                if let Err(e) = self.store.upsert(KEY_LIVE_FIXTURES, &live) {
                    error!("Failed to store live fixtures: {:#}", e);
                    cycle_error = Some(format!("store live_fixtures: {e:#}"));
                }
            }
            Err(e) => {
                warn!("All adapters failed for live fixtures: {:#}", e);
                cycle_error = Some(format!("live_fixtures: {e:#}"));
            }
        }

        // 2. Today's fixtures.
        match self.fetch_today_with_fallback().await {
            Ok(today) => {
                info!("Today's fixtures: {}", today.len());
                fixtures_updated += today.len();
                if let Err(e) = self.store.upsert(KEY_TODAY_FIXTURES, &today) {
                    error!("Failed to store today fixtures: {:#}", e);
                    cycle_error = Some(format!("store today_fixtures: {e:#}"));
                }
            }
            Err(e) => {
                warn!("All adapters failed for today's fixtures: {:#}", e);
                cycle_error = Some(format!("today_fixtures: {e:#}"));
            }
        }

        // 3. League reference data, at most once per day.
        if self.should_refresh_leagues() {
            match self.fetch_leagues_with_fallback().await {
                Ok(leagues) if !leagues.is_empty() => {
                    info!("Top leagues refreshed: {}", leagues.len());
                    if let Err(e) = self.store.upsert(KEY_TOP_LEAGUES, &leagues) {
                        error!("Failed to store leagues: {:#}", e);
                        cycle_error = Some(format!("store top_leagues: {e:#}"));
                    }
                }
                Ok(_) => info!("No league data from any adapter, keeping previous snapshot"),
                Err(e) => {
                    warn!("All adapters failed for leagues: {:#}", e);
                    cycle_error = Some(format!("top_leagues: {e:#}"));
                }
            }
        }

        // 4. Standings for the fixed top-league set.
        let season = Utc::now().year();
        for league in STANDINGS_LEAGUE_IDS {
            match self.fetch_standings_with_fallback(league, season).await {
                Ok(Some(standings)) => {
                    if let Err(e) = self.store.upsert(&standings_key(league, season), &standings) {
                        error!("Failed to store standings for league {}: {:#}", league, e);
                        cycle_error = Some(format!("store standings_{league}: {e:#}"));
                    }
                }
                // No table is an expected answer, not a failure; no write.
                Ok(None) => {}
                Err(e) => {
                    warn!("Standings fetch failed for league {}: {:#}", league, e);
                    cycle_error = Some(format!("standings_{league}: {e:#}"));
                }
            }
        }

        let mut stats = self.stats.lock().unwrap();
        stats.total_updates += 1;
        stats.last_update = Some(Utc::now());
        stats.fixtures_updated = fixtures_updated;
        if let Some(e) = cycle_error {
            stats.last_error = Some(e);
        }
    }

    /// Full cycle plus retention sweep of stale snapshots.
    pub async fn deep_refresh(&self) -> Result<usize> {
        info!("Deep refresh starting");
        self.run_cycle().await;
        let cutoff = Utc::now() - ChronoDuration::days(self.retention_days);
        let purged = self.store.purge_older_than(cutoff)?;
        info!("Retention sweep purged {} stale snapshot(s)", purged);
        Ok(purged)
    }

    fn should_refresh_leagues(&self) -> bool {
        match self.store.captured_at(KEY_TOP_LEAGUES) {
            Ok(Some(ts)) => Utc::now() - ts >= leagues_refresh_after(),
            Ok(None) => true,
            Err(e) => {
                warn!("Could not read leagues freshness: {:#}", e);
                true
            }
        }
    }

    // ── Multi-source fallback ────────────────────────────────────────────
    //
    // Adapters are tried in configured priority order; the first non-empty
    // result wins. An adapter error falls through to the next adapter. Only
    // when every adapter errored does the step itself fail; "everything
    // returned empty" is valid data (e.g. no match is live right now).

    async fn fetch_live_with_fallback(&self) -> Result<Vec<Fixture>> {
        let mut any_ok = false;
        for adapter in &self.adapters {
            match adapter.fetch_live().await {
                Ok(fixtures) if !fixtures.is_empty() => return Ok(fixtures),
                Ok(_) => any_ok = true,
                Err(e) => warn!("{}: live fetch failed: {:#}", adapter.name(), e),
            }
        }
        if any_ok {
            Ok(vec![])
        } else {
            Err(anyhow!("every adapter failed"))
        }
    }

    async fn fetch_today_with_fallback(&self) -> Result<Vec<Fixture>> {
        let mut any_ok = false;
        for adapter in &self.adapters {
            match adapter.fetch_today().await {
                Ok(fixtures) if !fixtures.is_empty() => return Ok(fixtures),
                Ok(_) => any_ok = true,
                Err(e) => warn!("{}: today fetch failed: {:#}", adapter.name(), e),
            }
        }
        if any_ok {
            Ok(vec![])
        } else {
            Err(anyhow!("every adapter failed"))
        }
    }

    async fn fetch_leagues_with_fallback(&self) -> Result<Vec<League>> {
        let mut any_ok = false;
        for adapter in &self.adapters {
            match adapter.fetch_leagues().await {
                Ok(leagues) if !leagues.is_empty() => return Ok(leagues),
                Ok(_) => any_ok = true,
                Err(e) => warn!("{}: leagues fetch failed: {:#}", adapter.name(), e),
            }
        }
        if any_ok {
            Ok(vec![])
        } else {
            Err(anyhow!("every adapter failed"))
        }
    }

    async fn fetch_standings_with_fallback(
        &self,
        league: u32,
        season: i32,
    ) -> Result<Option<Standings>> {
        let mut any_ok = false;
        for adapter in &self.adapters {
            match adapter.fetch_standings(league, season).await {
                Ok(Some(standings)) => return Ok(Some(standings)),
                Ok(None) => any_ok = true,
                Err(e) => warn!("{}: standings fetch failed: {:#}", adapter.name(), e),
            }
        }
        if any_ok {
            Ok(None)
        } else {
            Err(anyhow!("every adapter failed"))
        }
    }

    pub fn stats(&self) -> SchedulerStats {
        let inner = self.stats.lock().unwrap();
        SchedulerStats {
            total_updates: inner.total_updates,
            last_update: inner.last_update,
            last_error: inner.last_error.clone(),
            fixtures_updated: inner.fixtures_updated,
            is_running: self.is_running.load(Ordering::SeqCst),
        }
    }

    /// Per-adapter quota headroom for the stats endpoint.
    pub fn adapter_quotas(&self) -> Vec<(String, u32)> {
        self.adapters
            .iter()
            .map(|a| (a.name().to_string(), a.quota_remaining()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::models::{
        FixtureStatus, LeagueInfo, Score, StandingRow, Team,
    };
    use async_trait::async_trait;
    use std::sync::atomic::AtomicU32;

    fn fixture(id: &str, status: FixtureStatus) -> Fixture {
        Fixture {
            id: id.into(),
            status,
            elapsed_minutes: None,
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
            source: "fake".into(),
            captured_at: Utc::now(),
        }
    }

    /// Configurable fake adapter: fixed responses, optional failure, optional
    /// per-call delay for overlap tests.
    struct FakeAdapter {
        live: Vec<Fixture>,
        today: Vec<Fixture>,
        standings: Option<Standings>,
        fail: bool,
        panic_on_live: bool,
        delay: Duration,
        live_calls: AtomicU32,
        league_calls: AtomicU32,
    }

    impl FakeAdapter {
        fn new(live: Vec<Fixture>, today: Vec<Fixture>) -> Self {
            FakeAdapter {
                live,
                today,
                standings: None,
                fail: false,
                panic_on_live: false,
                delay: Duration::ZERO,
                live_calls: AtomicU32::new(0),
                league_calls: AtomicU32::new(0),
            }
        }

        fn failing() -> Self {
            let mut a = FakeAdapter::new(vec![], vec![]);
            a.fail = true;
            a
        }
    }

    #[async_trait]
    impl SourceAdapter for FakeAdapter {
        fn name(&self) -> &str {
            "fake"
        }

        async fn fetch_live(&self) -> Result<Vec<Fixture>> {
            self.live_calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if self.panic_on_live {
                panic!("fake adapter panicked");
            }
            if self.fail {
                anyhow::bail!("fake adapter down");
            }
            Ok(self.live.clone())
        }

        async fn fetch_today(&self) -> Result<Vec<Fixture>> {
            if self.fail {
                anyhow::bail!("fake adapter down");
            }
            Ok(self.today.clone())
        }

        async fn fetch_leagues(&self) -> Result<Vec<League>> {
            self.league_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("fake adapter down");
            }
            Ok(vec![League {
                id: 39,
                name: "Premier League".into(),
                country: Some("England".into()),
                badge: None,
                season: Some(2024),
            }])
        }

        async fn fetch_standings(&self, league: u32, season: i32) -> Result<Option<Standings>> {
            if self.fail {
                anyhow::bail!("fake adapter down");
            }
            Ok(self.standings.clone().map(|mut s| {
                s.league_id = league;
                s.season = season;
                s
            }))
        }

        fn quota_remaining(&self) -> u32 {
            99
        }
    }

    fn scheduler_with(adapters: Vec<Arc<dyn SourceAdapter>>) -> (Arc<Scheduler>, Database) {
        let store = Database::open(":memory:").unwrap();
        let scheduler = Arc::new(Scheduler::new(
            store.clone(),
            adapters,
            Duration::from_secs(900),
            7,
        ));
        (scheduler, store)
    }

    #[tokio::test]
    async fn test_cycle_stores_live_and_today_independently() {
        // 3 live, 10 today, 2 overlapping ids — datasets are independently keyed.
        let live: Vec<Fixture> = (0..3)
            .map(|i| fixture(&format!("l{}", i), FixtureStatus::FirstHalf))
            .collect();
        let mut today: Vec<Fixture> = (0..8)
            .map(|i| fixture(&format!("t{}", i), FixtureStatus::NotStarted))
            .collect();
        today.push(fixture("l0", FixtureStatus::FirstHalf));
        today.push(fixture("l1", FixtureStatus::FirstHalf));

        let (scheduler, store) =
            scheduler_with(vec![Arc::new(FakeAdapter::new(live, today))]);
        assert_eq!(scheduler.run_cycle().await, CycleOutcome::Completed);

        let live_snap = store.get(KEY_LIVE_FIXTURES).unwrap().unwrap();
        let today_snap = store.get(KEY_TODAY_FIXTURES).unwrap().unwrap();
        assert_eq!(live_snap.payload.as_array().unwrap().len(), 3);
        assert_eq!(today_snap.payload.as_array().unwrap().len(), 10);

        let stats = scheduler.stats();
        assert_eq!(stats.total_updates, 1);
        assert_eq!(stats.fixtures_updated, 13);
        assert!(stats.last_error.is_none());
    }

    #[tokio::test]
    async fn test_single_flight_skips_overlapping_run() {
        let mut slow = FakeAdapter::new(vec![fixture("1", FixtureStatus::FirstHalf)], vec![]);
        slow.delay = Duration::from_millis(200);
        let (scheduler, _store) = scheduler_with(vec![Arc::new(slow)]);

        let first = {
            let s = Arc::clone(&scheduler);
            tokio::spawn(async move { s.run_cycle().await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        let second = scheduler.run_cycle().await;

        assert_eq!(second, CycleOutcome::Skipped);
        assert_eq!(first.await.unwrap(), CycleOutcome::Completed);
        assert_eq!(scheduler.stats().total_updates, 1);
    }

    #[tokio::test]
    async fn test_panicking_cycle_releases_single_flight_flag() {
        let mut bad = FakeAdapter::new(vec![fixture("1", FixtureStatus::FirstHalf)], vec![]);
        bad.panic_on_live = true;
        let bad = Arc::new(bad);
        let (scheduler, _store) = scheduler_with(vec![bad.clone()]);

        let crashed = {
            let s = Arc::clone(&scheduler);
            tokio::spawn(async move { s.run_cycle().await }).await
        };
        assert!(crashed.is_err());

        // The flag was released during unwinding; the next trigger is not
        // skipped and reaches the adapter again.
        assert!(!scheduler.stats().is_running);
        let again = {
            let s = Arc::clone(&scheduler);
            tokio::spawn(async move { s.run_cycle().await }).await
        };
        assert!(again.is_err());
        assert_eq!(bad.live_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_fallback_to_second_adapter() {
        let good = FakeAdapter::new(vec![fixture("1", FixtureStatus::FirstHalf)], vec![]);
        let (scheduler, store) =
            scheduler_with(vec![Arc::new(FakeAdapter::failing()), Arc::new(good)]);
        scheduler.run_cycle().await;

        let live = store.get(KEY_LIVE_FIXTURES).unwrap().unwrap();
        assert_eq!(live.payload.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_all_adapters_failing_keeps_previous_snapshot() {
        let (scheduler, store) = scheduler_with(vec![Arc::new(FakeAdapter::failing())]);
        store.upsert(KEY_LIVE_FIXTURES, &vec![fixture("old", FixtureStatus::Finished)]).unwrap();

        scheduler.run_cycle().await;

        // Previous snapshot remains authoritative; error recorded, process alive.
        let live = store.get(KEY_LIVE_FIXTURES).unwrap().unwrap();
        assert_eq!(live.payload.as_array().unwrap().len(), 1);
        assert!(scheduler.stats().last_error.is_some());
    }

    #[tokio::test]
    async fn test_standings_none_means_no_write() {
        let (scheduler, store) =
            scheduler_with(vec![Arc::new(FakeAdapter::new(vec![], vec![]))]);
        scheduler.run_cycle().await;

        let season = Utc::now().year();
        assert!(store.get(&standings_key(39, season)).unwrap().is_none());
        assert!(scheduler.stats().last_error.is_none());
    }

    #[tokio::test]
    async fn test_standings_written_when_present() {
        let mut adapter = FakeAdapter::new(vec![], vec![]);
        adapter.standings = Some(Standings {
            league_id: 0,
            season: 0,
            rows: vec![StandingRow {
                rank: 1,
                team_id: None,
                team: "Arsenal".into(),
                played: 3,
                points: 9,
                goal_diff: 7,
            }],
        });
        let (scheduler, store) = scheduler_with(vec![Arc::new(adapter)]);
        scheduler.run_cycle().await;

        let season = Utc::now().year();
        let snap = store.get(&standings_key(39, season)).unwrap().unwrap();
        let stored: Standings = serde_json::from_value(snap.payload).unwrap();
        assert_eq!(stored.league_id, 39);
        assert_eq!(stored.rows.len(), 1);
    }

    #[tokio::test]
    async fn test_leagues_refresh_gated_by_age() {
        let adapter = Arc::new(FakeAdapter::new(vec![], vec![]));
        let (scheduler, store) = scheduler_with(vec![adapter.clone()]);

        scheduler.run_cycle().await;
        assert_eq!(adapter.league_calls.load(Ordering::SeqCst), 1);
        assert!(store.get(KEY_TOP_LEAGUES).unwrap().is_some());

        // Fresh snapshot exists: the second cycle must not refetch leagues.
        scheduler.run_cycle().await;
        assert_eq!(adapter.league_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_deep_refresh_purges_stale_snapshots() {
        let (scheduler, store) =
            scheduler_with(vec![Arc::new(FakeAdapter::new(vec![], vec![]))]);
        store.upsert("stale_key", &"x").unwrap();
        // deep_refresh with retention 7d: the just-written key survives.
        let purged = scheduler.deep_refresh().await.unwrap();
        assert_eq!(purged, 0);
        assert!(store.get("stale_key").unwrap().is_some());
    }
}
