//! Last-resort HTML scraping adapter.
//!
//! Fetches a live-score page through one long-lived HTTP session and infers
//! fixtures from row text by proximity heuristics: a scoreline token, a
//! minute/status token, and the two nearest name-like tokens as the teams.
//! Explicitly best-effort — selectors and league/team attribution are
//! approximate and source-site-specific. Fixtures get synthetic ids hashed
//! from the source URL and team pair.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{NaiveTime, Utc};
use reqwest::Client;
use scraper::{Html, Selector};
use std::time::Duration;
use tracing::{debug, warn};

use crate::governor::RateGovernor;
use crate::normalize::{sanitize, synthetic_id};
use crate::retry::RetryPolicy;
use crate::store::models::{
    Fixture, FixtureStatus, League, LeagueInfo, Score, ScorePair, Standings, Team,
};

use super::SourceAdapter;

pub const ADAPTER_NAME: &str = "scraper";

const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36";

/// Long-lived scraping session: one client launched at construction and
/// reused across runs (connection pool and cookies survive between cycles).
pub struct ScrapeSession {
    http: Client,
}

impl ScrapeSession {
    pub fn new(timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .context("Failed to build scraping session")?;
        Ok(ScrapeSession { http })
    }

    async fn get(&self, url: &str) -> Result<String> {
        let resp = self.http.get(url).send().await.context("request failed")?;
        if !resp.status().is_success() {
            anyhow::bail!("upstream status {}", resp.status());
        }
        resp.text().await.context("failed to read body")
    }
}

pub struct ScrapeAdapter {
    session: ScrapeSession,
    source_url: String,
    governor: RateGovernor,
    retry: RetryPolicy,
}

impl ScrapeAdapter {
    pub fn new(source_url: &str, minute_limit: u32, retry: RetryPolicy) -> Result<Self> {
        Ok(ScrapeAdapter {
            session: ScrapeSession::new(Duration::from_secs(20))?,
            source_url: source_url.to_string(),
            governor: RateGovernor::new(minute_limit, Duration::from_secs(60)),
            retry,
        })
    }

    async fn fetch_page(&self) -> Result<Option<Vec<Fixture>>> {
        if !self.governor.try_acquire() {
            warn!("{}: scrape budget exhausted, skipping", ADAPTER_NAME);
            return Ok(None);
        }
        let html = self
            .retry
            .run("scrape", || self.session.get(&self.source_url))
            .await?;
        let fixtures = parse_page(&html, &self.source_url);
        debug!("{}: extracted {} fixtures", ADAPTER_NAME, fixtures.len());
        Ok(Some(fixtures))
    }
}

#[async_trait]
impl SourceAdapter for ScrapeAdapter {
    fn name(&self) -> &str {
        ADAPTER_NAME
    }

    async fn fetch_live(&self) -> Result<Vec<Fixture>> {
        let fixtures = self.fetch_page().await?.unwrap_or_default();
        Ok(fixtures
            .into_iter()
            .filter(|f| f.status.is_in_progress())
            .collect())
    }

    async fn fetch_today(&self) -> Result<Vec<Fixture>> {
        Ok(self.fetch_page().await?.unwrap_or_default())
    }

    /// Scraped pages carry no usable league reference data.
    async fn fetch_leagues(&self) -> Result<Vec<League>> {
        Ok(vec![])
    }

    async fn fetch_standings(&self, _league: u32, _season: i32) -> Result<Option<Standings>> {
        Ok(None)
    }

    fn quota_remaining(&self) -> u32 {
        self.governor.remaining()
    }
}

// ── Heuristic extraction ─────────────────────────────────────────────────────

/// Row containers seen across live-score sites. These need adjustment per
/// source site; rows that don't yield a team pair are skipped silently.
const ROW_SELECTOR: &str =
    ".event__match, .match-row, li[class*=match], div[class*=event__], tr[class*=match]";

/// Page-level league label: nearest section heading, best-effort only.
const LEAGUE_SELECTOR: &str = ".event__title, .league-header, h1, h2";

fn parse_page(html: &str, source_url: &str) -> Vec<Fixture> {
    let doc = Html::parse_document(html);

    let league_hint = Selector::parse(LEAGUE_SELECTOR)
        .ok()
        .and_then(|sel| {
            doc.select(&sel)
                .map(|el| el.text().collect::<String>().trim().to_string())
                .find(|t| t.chars().any(|c| c.is_alphabetic()))
        })
        .unwrap_or_else(|| "unknown".to_string());

    let Ok(row_sel) = Selector::parse(ROW_SELECTOR) else {
        return vec![];
    };

    doc.select(&row_sel)
        .filter_map(|row| {
            let segments: Vec<String> = row
                .text()
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect();
            extract_fixture(&segments, &league_hint, source_url)
        })
        .collect()
}

/// What a minute/status token told us about the row.
#[derive(Debug, PartialEq)]
enum StatusHint {
    Minute(i32),
    HalfTime,
    Finished,
    KickoffTime(NaiveTime),
}

fn status_hint(token: &str) -> Option<StatusHint> {
    let t = token.trim();
    match t.to_uppercase().as_str() {
        "HT" => return Some(StatusHint::HalfTime),
        "FT" | "AET" | "PEN" | "FIN" | "FINISHED" => return Some(StatusHint::Finished),
        _ => {}
    }
    // Minute counters: "63'", "45+2'"
    if let Some(stripped) = t.strip_suffix('\'') {
        let minute = stripped.split('+').next()?.trim().parse().ok()?;
        return Some(StatusHint::Minute(minute));
    }
    // Kickoff time: "19:00". Two-digit minutes required so a "2:1" scoreline
    // is not mistaken for a time.
    let parts: Vec<&str> = t.split(':').collect();
    if parts.len() == 2 && parts[1].len() == 2 {
        if let (Ok(h), Ok(m)) = (parts[0].parse(), parts[1].parse()) {
            if let Some(time) = NaiveTime::from_hms_opt(h, m, 0) {
                return Some(StatusHint::KickoffTime(time));
            }
        }
    }
    None
}

/// Scorelines: "2 - 1", "2-1", "2 : 1".
fn parse_scoreline(token: &str) -> Option<(i32, i32)> {
    let normalized = token.replace(':', "-").replace('–', "-");
    let mut parts = normalized.split('-').map(str::trim);
    let home = parts.next()?.parse().ok()?;
    let away = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some((home, away))
}

/// Team names: mostly alphabetic, no digits, at least two letters.
fn is_name_like(token: &str) -> bool {
    let alpha = token.chars().filter(|c| c.is_alphabetic()).count();
    alpha >= 2
        && !token.chars().any(|c| c.is_ascii_digit())
        && status_hint(token).is_none()
}

fn extract_fixture(segments: &[String], league_hint: &str, source_url: &str) -> Option<Fixture> {
    let mut names: Vec<&str> = Vec::new();
    let mut scoreline: Option<(i32, i32)> = None;
    let mut hint: Option<StatusHint> = None;

    for seg in segments {
        // Status tokens first: "19:00" is a kickoff time, not a 19-0 scoreline.
        if hint.is_none() {
            if let Some(h) = status_hint(seg) {
                hint = Some(h);
                continue;
            }
        }
        if scoreline.is_none() {
            if let Some(s) = parse_scoreline(seg) {
                scoreline = Some(s);
                continue;
            }
        }
        if names.len() < 2 && is_name_like(seg) {
            names.push(seg);
        }
    }

    if names.len() < 2 {
        return None;
    }
    let (home_name, away_name) = (names[0], names[1]);

    let (status, elapsed, kickoff) = match (&hint, scoreline) {
        (Some(StatusHint::Finished), _) => (FixtureStatus::Finished, None, None),
        (Some(StatusHint::HalfTime), _) => (FixtureStatus::HalfTime, None, None),
        (Some(StatusHint::Minute(m)), _) => {
            let status = if *m <= 45 {
                FixtureStatus::FirstHalf
            } else if *m <= 90 {
                FixtureStatus::SecondHalf
            } else {
                FixtureStatus::ExtraTime
            };
            (status, Some(*m), None)
        }
        (Some(StatusHint::KickoffTime(t)), None) => {
            let kickoff = Utc::now()
                .date_naive()
                .and_time(*t)
                .and_utc();
            (FixtureStatus::NotStarted, None, Some(kickoff))
        }
        // A scoreline with no status token: assume in progress, minute unknown.
        (_, Some(_)) => (FixtureStatus::SecondHalf, None, None),
        _ => (FixtureStatus::NotStarted, None, None),
    };

    let score = match scoreline {
        Some((h, a)) => Score {
            fulltime: ScorePair::new(Some(h), Some(a)),
            ..Default::default()
        },
        None => Score::default(),
    };

    sanitize(Fixture {
        id: synthetic_id(&format!("{}|{}|{}", source_url, home_name, away_name)),
        status,
        elapsed_minutes: elapsed,
        kickoff,
        timezone: Some("source-local".into()),
        league: LeagueInfo {
            id: None,
            name: league_hint.to_string(),
            country: None,
            season: None,
            round: None,
        },
        home: Team {
            id: None,
            name: home_name.to_string(),
            badge: None,
            winner: None,
        },
        away: Team {
            id: None,
            name: away_name.to_string(),
            badge: None,
            winner: None,
        },
        score,
        source: ADAPTER_NAME.to_string(),
        captured_at: Utc::now(),
    })
}
