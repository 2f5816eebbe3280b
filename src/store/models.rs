use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Canonical match status. Every upstream vocabulary is mapped onto this enum
/// at the adapter boundary; unknown source statuses default to `NotStarted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FixtureStatus {
    NotStarted,
    FirstHalf,
    HalfTime,
    SecondHalf,
    ExtraTime,
    Penalties,
    Finished,
    FinishedAfterExtraTime,
    FinishedAfterPenalties,
    Suspended,
    Interrupted,
    Postponed,
    Cancelled,
    Abandoned,
}

impl FixtureStatus {
    /// True for every finished variant (regular, after extra time, after penalties).
    pub fn is_finished(self) -> bool {
        matches!(
            self,
            FixtureStatus::Finished
                | FixtureStatus::FinishedAfterExtraTime
                | FixtureStatus::FinishedAfterPenalties
        )
    }

    /// True while the ball is rolling. `elapsed_minutes` is only meaningful here.
    pub fn is_in_progress(self) -> bool {
        matches!(
            self,
            FixtureStatus::FirstHalf
                | FixtureStatus::HalfTime
                | FixtureStatus::SecondHalf
                | FixtureStatus::ExtraTime
                | FixtureStatus::Penalties
        )
    }
}

/// One side of a (home, away) score. `None` means "not yet played / unknown",
/// which is deliberately distinct from 0.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScorePair {
    pub home: Option<i32>,
    pub away: Option<i32>,
}

impl ScorePair {
    pub fn new(home: Option<i32>, away: Option<i32>) -> Self {
        ScorePair { home, away }
    }

    pub fn is_known(&self) -> bool {
        self.home.is_some() && self.away.is_some()
    }
}

/// Nested sub-scores of one fixture.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Score {
    pub halftime: ScorePair,
    pub fulltime: ScorePair,
    pub extratime: ScorePair,
    pub penalty: ScorePair,
}

/// One competing team. `winner` is tri-state: `None` until the match is over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub id: Option<String>,
    pub name: String,
    pub badge: Option<String>,
    pub winner: Option<bool>,
}

/// League context attached to a fixture. Scraped fixtures often lack an id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeagueInfo {
    pub id: Option<u32>,
    pub name: String,
    pub country: Option<String>,
    pub season: Option<i32>,
    pub round: Option<String>,
}

/// A single match snapshot in the canonical shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fixture {
    /// Source-native id when the upstream provides one, otherwise a
    /// deterministic hash of a natural key (see `normalize::synthetic_id`).
    pub id: String,
    pub status: FixtureStatus,
    /// Minutes played; only populated while `status.is_in_progress()`.
    pub elapsed_minutes: Option<i32>,
    pub kickoff: Option<DateTime<Utc>>,
    /// Timezone note as reported by the source, e.g. "UTC".
    pub timezone: Option<String>,
    pub league: LeagueInfo,
    pub home: Team,
    pub away: Team,
    pub score: Score,
    /// Which adapter produced this snapshot.
    pub source: String,
    pub captured_at: DateTime<Utc>,
}

/// Slow-changing league reference data, refreshed at most once per day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct League {
    pub id: u32,
    pub name: String,
    pub country: Option<String>,
    pub badge: Option<String>,
    pub season: Option<i32>,
}

/// One row of a league table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandingRow {
    pub rank: i32,
    pub team_id: Option<String>,
    pub team: String,
    pub played: i32,
    pub points: i32,
    pub goal_diff: i32,
}

/// Per (league, season) table, refreshed hourly or slower.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Standings {
    pub league_id: u32,
    pub season: i32,
    pub rows: Vec<StandingRow>,
}

// ── Dataset keys ─────────────────────────────────────────────────────────────

pub const KEY_LIVE_FIXTURES: &str = "live_fixtures";
pub const KEY_TODAY_FIXTURES: &str = "today_fixtures";
pub const KEY_TOP_LEAGUES: &str = "top_leagues";

/// Dataset key for one league table, e.g. `standings_39_2024`.
pub fn standings_key(league: u32, season: i32) -> String {
    format!("standings_{}_{}", league, season)
}
