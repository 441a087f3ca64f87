// Matching engine - ranks published itineraries against a transport request
// Cities match loosely (case-insensitive substring), so "Paris" finds "Paris CDG".
use rusqlite::{params, Connection};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::db::models::{Itinerary, ItineraryStatus, TransportRequest};
use crate::visibility;

const CITY_POINTS: u8 = 25;
const NO_DEADLINE_POINTS: u8 = 15;
const FULL_CAPACITY_POINTS: u8 = 20;
const PARTIAL_CAPACITY_POINTS: u8 = 10;

/// `haystack` contains `needle`, ignoring case.
pub fn city_matches(haystack: &str, needle: &str) -> bool {
    haystack
        .to_lowercase()
        .contains(&needle.trim().to_lowercase())
}

fn date_points(itinerary: &Itinerary, request: &TransportRequest) -> u8 {
    let Some(deadline) = request.deadline else {
        return NO_DEADLINE_POINTS;
    };
    match (itinerary.departure_date - deadline).num_days().abs() {
        0..=7 => 30,
        8..=14 => 20,
        15..=30 => 10,
        _ => 0,
    }
}

fn capacity_points(available: Decimal, estimated: Decimal) -> u8 {
    if available >= estimated {
        FULL_CAPACITY_POINTS
    } else if available >= estimated * Decimal::new(7, 1) {
        PARTIAL_CAPACITY_POINTS
    } else {
        0
    }
}

/// Compatibility in `0..=100`.
pub fn score(itinerary: &Itinerary, request: &TransportRequest) -> u8 {
    let mut total = 0;
    if city_matches(&itinerary.departure_city, &request.departure_city) {
        total += CITY_POINTS;
    }
    if city_matches(&itinerary.arrival_city, &request.arrival_city) {
        total += CITY_POINTS;
    }
    total += date_points(itinerary, request);
    total += capacity_points(itinerary.available_weight, request.estimated_weight);
    total
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredItinerary {
    pub itinerary: Itinerary,
    pub score: u8,
}

/// Keep loose city matches, score them and return the best `limit`.
///
/// The sort is stable, so equal scores keep candidate order.
pub fn rank(
    candidates: Vec<Itinerary>,
    request: &TransportRequest,
    limit: usize,
) -> Vec<ScoredItinerary> {
    let mut scored: Vec<ScoredItinerary> = candidates
        .into_iter()
        .filter(|i| {
            city_matches(&i.departure_city, &request.departure_city)
                && city_matches(&i.arrival_city, &request.arrival_city)
        })
        .map(|itinerary| {
            let score = score(&itinerary, request);
            ScoredItinerary { itinerary, score }
        })
        .collect();

    scored.sort_by(|a, b| b.score.cmp(&a.score));
    scored.truncate(limit);
    scored
}

/// Active itineraries from search-visible owners other than the request's,
/// soonest departure first.
pub fn candidates_for(
    conn: &Connection,
    request: &TransportRequest,
) -> rusqlite::Result<Vec<Itinerary>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM itineraries
         WHERE status = ?1 AND owner_id != ?2
         ORDER BY departure_date ASC, created_at ASC",
        Itinerary::COLUMNS
    ))?;
    let rows = stmt
        .query_map(
            params![ItineraryStatus::Active.as_str(), request.owner_id],
            Itinerary::from_row,
        )?
        .collect::<Result<Vec<_>, _>>()?;

    let mut visible = Vec::with_capacity(rows.len());
    for itinerary in rows {
        let settings = visibility::load_or_default(conn, &itinerary.owner_id)?;
        if visibility::is_search_visible(&settings) {
            visible.push(itinerary);
        }
    }
    Ok(visible)
}

pub fn find_best_matches(
    conn: &Connection,
    request: &TransportRequest,
    limit: usize,
) -> rusqlite::Result<Vec<ScoredItinerary>> {
    let candidates = candidates_for(conn, request)?;
    let matches = rank(candidates, request, limit);
    tracing::debug!(
        "Request {} matched {} itinerar(ies)",
        request.id,
        matches.len()
    );
    Ok(matches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::{insert_user, test_pool};
    use crate::db::{fmt_date, fmt_timestamp};
    use crate::proposals::domain::fixtures;
    use crate::visibility::VisibilitySettings;
    use chrono::{Duration, NaiveDate, Utc};
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn perfect_match_scores_100() {
        let mut itinerary = fixtures::itinerary("traveler", dec!(10));
        itinerary.departure_city = "Paris CDG".into();
        itinerary.departure_date = date(2024, 6, 10);
        let mut request = fixtures::request("client", dec!(8));
        request.departure_city = "paris".into();
        request.arrival_city = "Dakar".into();
        request.deadline = Some(date(2024, 6, 12));

        assert_eq!(score(&itinerary, &request), 100);
    }

    #[test]
    fn date_bands() {
        let itinerary = fixtures::itinerary("traveler", dec!(10));
        let mut request = fixtures::request("client", dec!(4));
        let base = itinerary.departure_date;

        let at = |days: i64, request: &mut TransportRequest| {
            request.deadline = Some(base + Duration::days(days));
            date_points(&itinerary, request)
        };
        assert_eq!(at(7, &mut request), 30);
        assert_eq!(at(-8, &mut request), 20);
        assert_eq!(at(14, &mut request), 20);
        assert_eq!(at(30, &mut request), 10);
        assert_eq!(at(31, &mut request), 0);

        request.deadline = None;
        assert_eq!(date_points(&itinerary, &request), 15);
    }

    #[test]
    fn capacity_bands() {
        assert_eq!(capacity_points(dec!(10), dec!(10)), 20);
        assert_eq!(capacity_points(dec!(7), dec!(10)), 10);
        assert_eq!(capacity_points(dec!(6.9), dec!(10)), 0);
    }

    #[test]
    fn city_mismatch_loses_points_and_candidacy() {
        let mut itinerary = fixtures::itinerary("traveler", dec!(10));
        itinerary.arrival_city = "Abidjan".into();
        let request = fixtures::request("client", dec!(4));

        assert_eq!(score(&itinerary, &request), 25 + 30 + 20);
        assert!(rank(vec![itinerary], &request, 5).is_empty());
    }

    #[test]
    fn rank_sorts_descending_and_keeps_order_on_ties() {
        let request = fixtures::request("client", dec!(4));

        let mut soon = fixtures::itinerary("a", dec!(10));
        soon.id = "soon".into();
        let mut later = fixtures::itinerary("b", dec!(10));
        later.id = "later".into();
        let mut small = fixtures::itinerary("c", dec!(1));
        small.id = "small".into();

        let ranked = rank(vec![small, soon, later], &request, 2);
        let ids: Vec<&str> = ranked.iter().map(|s| s.itinerary.id.as_str()).collect();
        assert_eq!(ids, vec!["soon", "later"]);
        assert!(ranked[0].score > 0);
    }

    fn insert_itinerary(conn: &Connection, owner: &str, departure: NaiveDate) -> String {
        let id = uuid::Uuid::now_v7().to_string();
        let now = fmt_timestamp(Utc::now());
        conn.execute(
            "INSERT INTO itineraries (id, owner_id, departure_city, arrival_city, departure_date,
                                      arrival_date, available_weight, currency, status,
                                      created_at, updated_at)
             VALUES (?1, ?2, 'Paris', 'Dakar', ?3, ?3, '10', 'EUR', 'active', ?4, ?4)",
            params![id, owner, fmt_date(departure), now],
        )
        .unwrap();
        id
    }

    #[test]
    fn find_best_matches_skips_hidden_owned_and_inactive() {
        let (pool, _tmp) = test_pool();
        let client = insert_user(&pool, "client", false);
        let visible = insert_user(&pool, "visible", false);
        let hidden = insert_user(&pool, "hidden", false);
        let conn = pool.get().unwrap();

        let later = insert_itinerary(&conn, &visible, date(2024, 6, 11));
        let sooner = insert_itinerary(&conn, &visible, date(2024, 6, 9));
        insert_itinerary(&conn, &hidden, date(2024, 6, 10));
        insert_itinerary(&conn, &client, date(2024, 6, 10));
        let cancelled = insert_itinerary(&conn, &visible, date(2024, 6, 10));
        conn.execute(
            "UPDATE itineraries SET status = 'cancelled' WHERE id = ?1",
            params![cancelled],
        )
        .unwrap();

        visibility::save(
            &conn,
            &hidden,
            &VisibilitySettings {
                show_in_search: false,
                ..Default::default()
            },
        )
        .unwrap();

        let mut request = fixtures::request(&client, dec!(4));
        request.deadline = Some(date(2024, 6, 10));

        let matches = find_best_matches(&conn, &request, 5).unwrap();
        let ids: Vec<&str> = matches.iter().map(|m| m.itinerary.id.as_str()).collect();
        assert_eq!(ids, vec![sooner.as_str(), later.as_str()]);
        assert!(matches.iter().all(|m| m.score == 100));
    }
}
