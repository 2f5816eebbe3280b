//! Adapter for TheSportsDB v1 free API.
//! Docs: <https://www.thesportsdb.com/api.php>
//!
//! Free tier is limited to 30 requests per minute; the per-minute governor
//! keeps us under that without ever blocking a caller. League ids are mapped
//! from the canonical (API-Football) numbering so the rest of the pipeline
//! speaks one id space.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};

use crate::governor::RateGovernor;
use crate::normalize::{int_field, sanitize, str_field, synthetic_id};
use crate::retry::RetryPolicy;
use crate::store::models::{
    Fixture, FixtureStatus, League, LeagueInfo, Score, ScorePair, StandingRow, Standings, Team,
};

use super::SourceAdapter;

pub const ADAPTER_NAME: &str = "thesportsdb";

/// TheSportsDB league ids for the canonical top-league set.
const LEAGUE_ID_MAP: [(u32, u32); 7] = [
    (39, 4328),  // Premier League
    (140, 4335), // La Liga
    (135, 4332), // Serie A
    (78, 4331),  // Bundesliga
    (61, 4334),  // Ligue 1
    (2, 4480),   // Champions League
    (3, 4481),   // Europa League
];

fn to_sportsdb_league(canonical: u32) -> Option<u32> {
    LEAGUE_ID_MAP
        .iter()
        .find(|(c, _)| *c == canonical)
        .map(|(_, s)| *s)
}

fn to_canonical_league(sportsdb: u32) -> Option<u32> {
    LEAGUE_ID_MAP
        .iter()
        .find(|(_, s)| *s == sportsdb)
        .map(|(c, _)| *c)
}

pub struct SportsDbAdapter {
    http: Client,
    base_url: String,
    api_key: String,
    governor: RateGovernor,
    retry: RetryPolicy,
}

impl SportsDbAdapter {
    pub fn new(
        base_url: &str,
        api_key: Option<&str>,
        minute_limit: u32,
        retry: RetryPolicy,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(SportsDbAdapter {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            // "3" is TheSportsDB's public free-tier key
            api_key: api_key.unwrap_or("3").to_string(),
            governor: RateGovernor::new(minute_limit, Duration::from_secs(60)),
            retry,
        })
    }

    async fn request(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> Result<Option<serde_json::Value>> {
        if !self.governor.try_acquire() {
            warn!(
                "{}: per-minute budget exhausted, skipping {} (resets in {:?})",
                ADAPTER_NAME,
                endpoint,
                self.governor.resets_in()
            );
            return Ok(None);
        }

        let url = format!("{}/{}{}", self.base_url, self.api_key, endpoint);
        debug!("{}: GET {} {:?}", ADAPTER_NAME, url, params);

        let raw = self
            .retry
            .run(endpoint, || {
                let req = self.http.get(&url).query(params);
                async move {
                    let resp = req.send().await.context("request failed")?;
                    if !resp.status().is_success() {
                        anyhow::bail!("upstream status {}", resp.status());
                    }
                    resp.json().await.context("malformed JSON body")
                }
            })
            .await?;
        Ok(Some(raw))
    }
}

#[async_trait]
impl SourceAdapter for SportsDbAdapter {
    fn name(&self) -> &str {
        ADAPTER_NAME
    }

    async fn fetch_live(&self) -> Result<Vec<Fixture>> {
        let raw = match self.request("/livescore.php", &[("s", "Soccer".into())]).await? {
            Some(raw) => raw,
            None => return Ok(vec![]),
        };
        let fixtures: Vec<Fixture> = parse_events(&raw)
            .into_iter()
            .filter(|f| f.status.is_in_progress())
            .collect();
        Ok(fixtures)
    }

    async fn fetch_today(&self) -> Result<Vec<Fixture>> {
        let today = Utc::now().format("%Y-%m-%d").to_string();
        let params = [("d", today), ("s", "Soccer".into())];
        let raw = match self.request("/eventsday.php", &params).await? {
            Some(raw) => raw,
            None => return Ok(vec![]),
        };
        Ok(parse_events(&raw))
    }

    async fn fetch_leagues(&self) -> Result<Vec<League>> {
        let raw = match self.request("/all_leagues.php", &[]).await? {
            Some(raw) => raw,
            None => return Ok(vec![]),
        };
        let leagues = raw["leagues"]
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(parse_league)
                    .collect::<Vec<League>>()
            })
            .unwrap_or_default();
        Ok(leagues)
    }

    async fn fetch_standings(&self, league: u32, season: i32) -> Result<Option<Standings>> {
        let Some(sdb_league) = to_sportsdb_league(league) else {
            debug!("{}: no mapping for league {}", ADAPTER_NAME, league);
            return Ok(None);
        };
        // TheSportsDB seasons are spelled "2024-2025".
        let params = [
            ("l", sdb_league.to_string()),
            ("s", format!("{}-{}", season, season + 1)),
        ];
        let raw = match self.request("/lookuptable.php", &params).await? {
            Some(raw) => raw,
            None => return Ok(None),
        };
        Ok(parse_standings(&raw, league, season))
    }

    fn quota_remaining(&self) -> u32 {
        self.governor.remaining()
    }
}

/// Map TheSportsDB status strings (a mix of short codes and prose) onto the
/// canonical enum. Unknown statuses default to not-started.
fn map_status(s: &str) -> FixtureStatus {
    match s.to_lowercase().as_str() {
        "1h" | "1st half" => FixtureStatus::FirstHalf,
        "ht" | "halftime" | "half time" => FixtureStatus::HalfTime,
        "2h" | "2nd half" | "inplay" | "in play" | "live" => FixtureStatus::SecondHalf,
        "et" | "extra time" => FixtureStatus::ExtraTime,
        "p" | "pen" | "penalties" => FixtureStatus::Penalties,
        "ft" | "finished" | "match finished" => FixtureStatus::Finished,
        "aet" => FixtureStatus::FinishedAfterExtraTime,
        "susp" | "suspended" => FixtureStatus::Suspended,
        "int" | "interrupted" => FixtureStatus::Interrupted,
        "pst" | "postponed" => FixtureStatus::Postponed,
        "canc" | "cancelled" | "canceled" => FixtureStatus::Cancelled,
        "abd" | "abandoned" => FixtureStatus::Abandoned,
        _ => FixtureStatus::NotStarted,
    }
}

fn parse_kickoff(event: &serde_json::Value) -> Option<DateTime<Utc>> {
    let date = str_field(&event["dateEvent"])?;
    let date = NaiveDate::parse_from_str(&date, "%Y-%m-%d").ok()?;
    let time = str_field(&event["strTime"])
        .and_then(|t| NaiveTime::parse_from_str(&t, "%H:%M:%S").ok())
        .unwrap_or_else(|| NaiveTime::from_hms_opt(0, 0, 0).unwrap());
    Some(DateTime::from_naive_utc_and_offset(date.and_time(time), Utc))
}

fn parse_event(event: &serde_json::Value) -> Option<Fixture> {
    let home_name = str_field(&event["strHomeTeam"])?;
    let away_name = str_field(&event["strAwayTeam"])?;

    let id = str_field(&event["idEvent"]).unwrap_or_else(|| {
        synthetic_id(&format!("{}|{}|{}", ADAPTER_NAME, home_name, away_name))
    });

    let status = str_field(&event["strStatus"])
        .map(|s| map_status(&s))
        .unwrap_or(FixtureStatus::NotStarted);

    // strProgress is the minute counter, e.g. "63" or "45+2".
    let elapsed = str_field(&event["strProgress"])
        .and_then(|p| p.split(['+', '\''])
            .next()
            .and_then(|m| m.trim().parse().ok()));

    let current = ScorePair::new(
        int_field(&event["intHomeScore"]),
        int_field(&event["intAwayScore"]),
    );
    // The free tier only reports a running total: treat it as the fulltime
    // score once finished, and leave halftime unknown.
    let score = Score {
        fulltime: current,
        ..Default::default()
    };

    sanitize(Fixture {
        id,
        status,
        elapsed_minutes: elapsed,
        kickoff: parse_kickoff(event),
        timezone: Some("UTC".into()),
        league: LeagueInfo {
            id: int_field(&event["idLeague"])
                .and_then(|id| to_canonical_league(id as u32)),
            name: str_field(&event["strLeague"]).unwrap_or_else(|| "unknown".into()),
            country: str_field(&event["strCountry"]),
            season: str_field(&event["strSeason"])
                .and_then(|s| s.split('-').next().and_then(|y| y.parse().ok())),
            round: int_field(&event["intRound"]).map(|r| format!("Round {}", r)),
        },
        home: Team {
            id: str_field(&event["idHomeTeam"]),
            name: home_name,
            badge: str_field(&event["strHomeTeamBadge"]),
            winner: None,
        },
        away: Team {
            id: str_field(&event["idAwayTeam"]),
            name: away_name,
            badge: str_field(&event["strAwayTeamBadge"]),
            winner: None,
        },
        score,
        source: ADAPTER_NAME.to_string(),
        captured_at: Utc::now(),
    })
}

fn parse_events(raw: &serde_json::Value) -> Vec<Fixture> {
    raw["events"]
        .as_array()
        .map(|events| events.iter().filter_map(parse_event).collect())
        .unwrap_or_default()
}

fn parse_league(v: &serde_json::Value) -> Option<League> {
    let sdb_id = str_field(&v["idLeague"])?.parse::<u32>().ok()?;
    let id = to_canonical_league(sdb_id)?;
    Some(League {
        id,
        name: str_field(&v["strLeague"])?,
        country: str_field(&v["strCountry"]),
        badge: str_field(&v["strBadge"]),
        season: None,
    })
}

fn parse_standings(raw: &serde_json::Value, league: u32, season: i32) -> Option<Standings> {
    let table = raw["table"].as_array()?;
    let rows: Vec<StandingRow> = table
        .iter()
        .filter_map(|row| {
            Some(StandingRow {
                rank: int_field(&row["intRank"])?,
                team_id: str_field(&row["idTeam"]),
                team: str_field(&row["strTeam"])?,
                played: int_field(&row["intPlayed"]).unwrap_or(0),
                points: int_field(&row["intPoints"]).unwrap_or(0),
                goal_diff: int_field(&row["intGoalDifference"]).unwrap_or(0),
            })
        })
        .collect();
    if rows.is_empty() {
        return None;
    }
    Some(Standings {
        league_id: league,
        season,
        rows,
    })
}
