//! Shared normalization helpers used by every source adapter.
//!
//! Raw upstream shapes never leave their adapter module; each adapter maps
//! its payload into the canonical `Fixture`/`League`/`Standings` types using
//! these helpers for the source quirks they all share: string-typed numerics,
//! missing fields, unstable identifiers, and winner inference.

use serde_json::Value;

use crate::store::models::{Fixture, FixtureStatus, ScorePair};

/// Read an integer that may arrive as a JSON number or a numeric string.
/// Anything else (missing, null, garbage) is `None` — never a default 0,
/// so "not yet played" stays distinct from "0-0".
pub fn int_field(v: &Value) -> Option<i32> {
    match v {
        Value::Number(n) => n.as_i64().map(|n| n as i32),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Read a non-empty string field.
pub fn str_field(v: &Value) -> Option<String> {
    v.as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Deterministic id for sources without stable identifiers: FNV-1a over a
/// natural key (source URL, team pair). Non-cryptographic; collisions across
/// distinct matches are tolerated.
pub fn synthetic_id(natural_key: &str) -> String {
    const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;
    let mut hash = FNV_OFFSET;
    for byte in natural_key.bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    format!("syn-{:016x}", hash)
}

/// Winner tri-state for (home, away): only computed once the match is
/// finished with both fulltime scores known, otherwise (None, None).
pub fn infer_winners(
    status: FixtureStatus,
    fulltime: ScorePair,
) -> (Option<bool>, Option<bool>) {
    if !status.is_finished() {
        return (None, None);
    }
    match (fulltime.home, fulltime.away) {
        (Some(h), Some(a)) if h != a => (Some(h > a), Some(a > h)),
        (Some(_), Some(_)) => (Some(false), Some(false)),
        _ => (None, None),
    }
}

/// Enforce the canonical invariants on a freshly mapped fixture:
/// `elapsed_minutes` only while in progress, winners only when finished,
/// and a finished fixture must carry a known fulltime score. A finished
/// status with no score is useless upstream garbage; the fixture is dropped
/// the same way a missing team name drops it at parse time.
pub fn sanitize(mut fixture: Fixture) -> Option<Fixture> {
    if fixture.status.is_finished() && !fixture.score.fulltime.is_known() {
        return None;
    }
    if !fixture.status.is_in_progress() {
        fixture.elapsed_minutes = None;
    }
    let (home_winner, away_winner) = infer_winners(fixture.status, fixture.score.fulltime);
    fixture.home.winner = home_winner;
    fixture.away.winner = away_winner;
    Some(fixture)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::models::{LeagueInfo, Score, Team};
    use chrono::Utc;
    use serde_json::json;

    fn fixture(status: FixtureStatus, fulltime: ScorePair) -> Fixture {
        Fixture {
            id: "1".into(),
            status,
            elapsed_minutes: Some(90),
            kickoff: None,
            timezone: None,
            league: LeagueInfo {
                name: "Premier League".into(),
                ..Default::default()
            },
            home: Team {
                id: None,
                name: "Arsenal".into(),
                badge: None,
                winner: Some(true), // deliberately wrong, sanitize must fix
            },
            away: Team {
                id: None,
                name: "Chelsea".into(),
                badge: None,
                winner: None,
            },
            score: Score {
                fulltime,
                ..Default::default()
            },
            source: "test".into(),
            captured_at: Utc::now(),
        }
    }

    #[test]
    fn test_int_field_accepts_string_and_number() {
        assert_eq!(int_field(&json!(3)), Some(3));
        assert_eq!(int_field(&json!("3")), Some(3));
        assert_eq!(int_field(&json!(" 12 ")), Some(12));
        assert_eq!(int_field(&json!(null)), None);
        assert_eq!(int_field(&json!("n/a")), None);
    }

    #[test]
    fn test_synthetic_id_deterministic() {
        let a = synthetic_id("https://example.com|Arsenal|Chelsea");
        let b = synthetic_id("https://example.com|Arsenal|Chelsea");
        let c = synthetic_id("https://example.com|Chelsea|Arsenal");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("syn-"));
    }

    #[test]
    fn test_winner_only_when_finished() {
        let ft = ScorePair::new(Some(2), Some(1));
        assert_eq!(infer_winners(FixtureStatus::SecondHalf, ft), (None, None));
        assert_eq!(
            infer_winners(FixtureStatus::Finished, ft),
            (Some(true), Some(false))
        );
    }

    #[test]
    fn test_winner_unknown_without_fulltime_score() {
        let unknown = ScorePair::default();
        assert_eq!(infer_winners(FixtureStatus::Finished, unknown), (None, None));
    }

    #[test]
    fn test_draw_is_false_false() {
        let ft = ScorePair::new(Some(1), Some(1));
        assert_eq!(
            infer_winners(FixtureStatus::FinishedAfterPenalties, ft),
            (Some(false), Some(false))
        );
    }

    #[test]
    fn test_sanitize_clears_elapsed_when_not_in_progress() {
        let f = sanitize(fixture(FixtureStatus::Finished, ScorePair::new(Some(0), Some(3))))
            .unwrap();
        assert!(f.elapsed_minutes.is_none());
        assert_eq!(f.home.winner, Some(false));
        assert_eq!(f.away.winner, Some(true));
    }

    #[test]
    fn test_sanitize_keeps_elapsed_in_progress_and_clears_winner() {
        let f = sanitize(fixture(FixtureStatus::FirstHalf, ScorePair::default())).unwrap();
        assert_eq!(f.elapsed_minutes, Some(90));
        assert!(f.home.winner.is_none());
        assert!(f.away.winner.is_none());
    }

    #[test]
    fn test_sanitize_drops_finished_without_fulltime_score() {
        for status in [
            FixtureStatus::Finished,
            FixtureStatus::FinishedAfterExtraTime,
            FixtureStatus::FinishedAfterPenalties,
        ] {
            assert!(sanitize(fixture(status, ScorePair::default())).is_none());
            assert!(sanitize(fixture(status, ScorePair::new(Some(1), None))).is_none());
        }
        // Half-known score on a live match is untouched.
        assert!(sanitize(fixture(FixtureStatus::SecondHalf, ScorePair::new(Some(1), None)))
            .is_some());
    }
}
