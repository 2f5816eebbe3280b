//! Adapter for the API-Sports football API (v3, RapidAPI-style headers).
//!
//! The paid, rate-limited primary source. Every call goes through the hourly
//! rate governor first; an exhausted budget yields an empty result so the
//! orchestrator can fall through to the next adapter.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};

use crate::governor::RateGovernor;
use crate::normalize::{int_field, sanitize, str_field, synthetic_id};
use crate::retry::RetryPolicy;
use crate::store::models::{
    Fixture, FixtureStatus, League, LeagueInfo, Score, ScorePair, StandingRow, Standings, Team,
};

use super::{SourceAdapter, TOP_LEAGUE_IDS};

pub const ADAPTER_NAME: &str = "api-football";

pub struct ApiFootballAdapter {
    http: Client,
    base_url: String,
    api_key: String,
    host: String,
    governor: RateGovernor,
    retry: RetryPolicy,
}

impl ApiFootballAdapter {
    pub fn new(
        base_url: &str,
        api_key: &str,
        host: &str,
        hourly_limit: u32,
        retry: RetryPolicy,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(ApiFootballAdapter {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            host: host.to_string(),
            governor: RateGovernor::new(hourly_limit, Duration::from_secs(3600)),
            retry,
        })
    }

    /// Issue one governed request and return the `response` array.
    /// Quota exhaustion is not an error: logs and returns `None`.
    async fn request(&self, endpoint: &str, params: &[(&str, String)]) -> Result<Option<Vec<serde_json::Value>>> {
        if !self.governor.try_acquire() {
            warn!(
                "{}: hourly budget exhausted, skipping {} (resets in {:?})",
                ADAPTER_NAME,
                endpoint,
                self.governor.resets_in()
            );
            return Ok(None);
        }

        let url = format!("{}{}", self.base_url, endpoint);
        debug!("{}: GET {} {:?}", ADAPTER_NAME, url, params);

        let raw: serde_json::Value = self
            .retry
            .run(endpoint, || {
                let req = self
                    .http
                    .get(&url)
                    .header("x-rapidapi-key", &self.api_key)
                    .header("x-rapidapi-host", &self.host)
                    .query(params);
                async move {
                    let resp = req.send().await.context("request failed")?;
                    if !resp.status().is_success() {
                        anyhow::bail!("upstream status {}", resp.status());
                    }
                    resp.json().await.context("malformed JSON body")
                }
            })
            .await?;

        let items = raw["response"].as_array().cloned().unwrap_or_default();
        Ok(Some(items))
    }
}

#[async_trait]
impl SourceAdapter for ApiFootballAdapter {
    fn name(&self) -> &str {
        ADAPTER_NAME
    }

    async fn fetch_live(&self) -> Result<Vec<Fixture>> {
        let items = match self.request("/fixtures", &[("live", "all".into())]).await? {
            Some(items) => items,
            None => return Ok(vec![]),
        };
        Ok(items.iter().filter_map(parse_fixture).collect())
    }

    async fn fetch_today(&self) -> Result<Vec<Fixture>> {
        let today = Utc::now().format("%Y-%m-%d").to_string();
        let items = match self.request("/fixtures", &[("date", today)]).await? {
            Some(items) => items,
            None => return Ok(vec![]),
        };
        Ok(items.iter().filter_map(parse_fixture).collect())
    }

    async fn fetch_leagues(&self) -> Result<Vec<League>> {
        let season = Utc::now().format("%Y").to_string();
        let params = [("current", "true".into()), ("season", season)];
        let items = match self.request("/leagues", &params).await? {
            Some(items) => items,
            None => return Ok(vec![]),
        };
        Ok(items
            .iter()
            .filter_map(parse_league)
            .filter(|l| TOP_LEAGUE_IDS.contains(&l.id))
            .collect())
    }

    async fn fetch_standings(&self, league: u32, season: i32) -> Result<Option<Standings>> {
        let params = [("league", league.to_string()), ("season", season.to_string())];
        let items = match self.request("/standings", &params).await? {
            Some(items) => items,
            None => return Ok(None),
        };
        Ok(items.first().and_then(|v| parse_standings(v, league, season)))
    }

    fn quota_remaining(&self) -> u32 {
        self.governor.remaining()
    }
}

/// Map API-Sports short status codes onto the canonical enum.
/// Unknown codes default to not-started.
fn map_status(short: &str) -> FixtureStatus {
    match short {
        "1H" | "LIVE" => FixtureStatus::FirstHalf,
        "HT" => FixtureStatus::HalfTime,
        "2H" => FixtureStatus::SecondHalf,
        "ET" | "BT" => FixtureStatus::ExtraTime,
        "P" => FixtureStatus::Penalties,
        "FT" => FixtureStatus::Finished,
        "AET" => FixtureStatus::FinishedAfterExtraTime,
        "PEN" => FixtureStatus::FinishedAfterPenalties,
        "SUSP" => FixtureStatus::Suspended,
        "INT" => FixtureStatus::Interrupted,
        "PST" => FixtureStatus::Postponed,
        "CANC" => FixtureStatus::Cancelled,
        "ABD" | "AWD" | "WO" => FixtureStatus::Abandoned,
        _ => FixtureStatus::NotStarted,
    }
}

fn parse_score_pair(v: &serde_json::Value) -> ScorePair {
    ScorePair::new(int_field(&v["home"]), int_field(&v["away"]))
}

fn parse_team(v: &serde_json::Value) -> Option<Team> {
    Some(Team {
        id: int_field(&v["id"]).map(|id| id.to_string()),
        name: str_field(&v["name"])?,
        badge: str_field(&v["logo"]),
        winner: None, // computed in sanitize from status + score
    })
}

fn parse_fixture(v: &serde_json::Value) -> Option<Fixture> {
    let meta = &v["fixture"];
    let home = parse_team(&v["teams"]["home"])?;
    let away = parse_team(&v["teams"]["away"])?;

    let id = int_field(&meta["id"])
        .map(|id| id.to_string())
        .unwrap_or_else(|| synthetic_id(&format!("{}|{}|{}", ADAPTER_NAME, home.name, away.name)));

    let status = str_field(&meta["status"]["short"])
        .map(|s| map_status(&s))
        .unwrap_or(FixtureStatus::NotStarted);

    let kickoff = str_field(&meta["date"])
        .and_then(|d| DateTime::parse_from_rfc3339(&d).ok())
        .map(|d| d.with_timezone(&Utc));

    let score = Score {
        halftime: parse_score_pair(&v["score"]["halftime"]),
        fulltime: parse_score_pair(&v["score"]["fulltime"]),
        extratime: parse_score_pair(&v["score"]["extratime"]),
        penalty: parse_score_pair(&v["score"]["penalty"]),
    };

    sanitize(Fixture {
        id,
        status,
        elapsed_minutes: int_field(&meta["status"]["elapsed"]),
        kickoff,
        timezone: str_field(&meta["timezone"]),
        league: LeagueInfo {
            id: int_field(&v["league"]["id"]).map(|id| id as u32),
            name: str_field(&v["league"]["name"]).unwrap_or_else(|| "unknown".into()),
            country: str_field(&v["league"]["country"]),
            season: int_field(&v["league"]["season"]),
            round: str_field(&v["league"]["round"]),
        },
        home,
        away,
        score,
        source: ADAPTER_NAME.to_string(),
        captured_at: Utc::now(),
    })
}

fn parse_league(v: &serde_json::Value) -> Option<League> {
    let id = int_field(&v["league"]["id"])? as u32;
    Some(League {
        id,
        name: str_field(&v["league"]["name"])?,
        country: str_field(&v["country"]["name"]),
        badge: str_field(&v["league"]["logo"]),
        season: v["seasons"]
            .as_array()
            .and_then(|seasons| {
                seasons
                    .iter()
                    .find(|s| s["current"].as_bool().unwrap_or(false))
            })
            .and_then(|s| int_field(&s["year"])),
    })
}

fn parse_standings(v: &serde_json::Value, league: u32, season: i32) -> Option<Standings> {
    let table = v["league"]["standings"][0].as_array()?;
    let rows: Vec<StandingRow> = table
        .iter()
        .filter_map(|row| {
            Some(StandingRow {
                rank: int_field(&row["rank"])?,
                team_id: int_field(&row["team"]["id"]).map(|id| id.to_string()),
                team: str_field(&row["team"]["name"])?,
                played: int_field(&row["all"]["played"]).unwrap_or(0),
                points: int_field(&row["points"]).unwrap_or(0),
                goal_diff: int_field(&row["goalsDiff"]).unwrap_or(0),
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

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw_fixture(short: &str, ft_home: serde_json::Value, ft_away: serde_json::Value) -> serde_json::Value {
        json!({
            "fixture": {
                "id": 1035001,
                "timezone": "UTC",
                "date": "2024-08-23T19:00:00+00:00",
                "status": { "long": "x", "short": short, "elapsed": 57 }
            },
            "league": {
                "id": 39, "name": "Premier League", "country": "England",
                "season": 2024, "round": "Regular Season - 2"
            },
            "teams": {
                "home": { "id": 42, "name": "Arsenal", "logo": "a.png" },
                "away": { "id": 49, "name": "Chelsea", "logo": "c.png" }
            },
            "score": {
                "halftime": { "home": 1, "away": 0 },
                "fulltime": { "home": ft_home, "away": ft_away },
                "extratime": { "home": null, "away": null },
                "penalty": { "home": null, "away": null }
            }
        })
    }

    #[test]
    fn test_parse_in_progress_fixture() {
        let f = parse_fixture(&raw_fixture("2H", json!(null), json!(null))).unwrap();
        assert_eq!(f.id, "1035001");
        assert_eq!(f.status, FixtureStatus::SecondHalf);
        assert_eq!(f.elapsed_minutes, Some(57));
        assert!(f.score.fulltime.home.is_none());
        assert!(f.home.winner.is_none());
        assert_eq!(f.league.id, Some(39));
        assert_eq!(f.source, ADAPTER_NAME);
    }

    #[test]
    fn test_parse_finished_fixture_infers_winner() {
        let f = parse_fixture(&raw_fixture("FT", json!(2), json!(1))).unwrap();
        assert_eq!(f.status, FixtureStatus::Finished);
        assert!(f.elapsed_minutes.is_none());
        assert_eq!(f.home.winner, Some(true));
        assert_eq!(f.away.winner, Some(false));
    }

    #[test]
    fn test_string_typed_scores_tolerated() {
        let f = parse_fixture(&raw_fixture("FT", json!("3"), json!("0"))).unwrap();
        assert_eq!(f.score.fulltime, ScorePair::new(Some(3), Some(0)));
    }

    #[test]
    fn test_missing_team_name_drops_fixture() {
        let mut raw = raw_fixture("NS", json!(null), json!(null));
        raw["teams"]["home"]["name"] = json!(null);
        assert!(parse_fixture(&raw).is_none());
    }

    #[test]
    fn test_finished_without_fulltime_score_dropped() {
        assert!(parse_fixture(&raw_fixture("FT", json!(null), json!(null))).is_none());
        assert!(parse_fixture(&raw_fixture("AET", json!(2), json!(null))).is_none());
    }

    #[test]
    fn test_unknown_status_defaults_not_started() {
        assert_eq!(map_status("???"), FixtureStatus::NotStarted);
        assert_eq!(map_status("TBD"), FixtureStatus::NotStarted);
    }

    #[test]
    fn test_parse_standings_rows() {
        let raw = json!({
            "league": {
                "id": 39, "season": 2024,
                "standings": [[
                    { "rank": 1, "team": { "id": 50, "name": "Manchester City" },
                      "points": 9, "goalsDiff": 8, "all": { "played": 3 } },
                    { "rank": "2", "team": { "id": 42, "name": "Arsenal" },
                      "points": "7", "goalsDiff": 5, "all": { "played": "3" } }
                ]]
            }
        });
        let standings = parse_standings(&raw, 39, 2024).unwrap();
        assert_eq!(standings.league_id, 39);
        assert_eq!(standings.rows.len(), 2);
        assert_eq!(standings.rows[1].points, 7);
        assert_eq!(standings.rows[1].played, 3);
    }

    #[test]
    fn test_empty_standings_is_none() {
        let raw = json!({ "league": { "standings": [[]] } });
        assert!(parse_standings(&raw, 39, 2024).is_none());
    }
}
