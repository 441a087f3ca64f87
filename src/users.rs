// Accounts, profile projection and the address change cooldown
use chrono::{DateTime, Months, NaiveDate, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::auth::session;
use crate::currency::CurrencyCode;
use crate::db::{fmt_timestamp, with_immediate_transaction};
use crate::db::models::User;
use crate::visibility::{self, Viewer, VisibilitySettings};

const ADDRESS_COOLDOWN_MONTHS: u32 = 6;
const MAX_USERNAME_LEN: usize = 32;

#[derive(Debug, Error)]
pub enum UserError {
    #[error("User not found")]
    NotFound,

    #[error("{0}")]
    Invalid(String),

    #[error("Username is already taken")]
    UsernameTaken,

    #[error("Address can only be changed once every six months (next change allowed on {0})")]
    AddressCooldown(NaiveDate),

    #[error("SQL error: {0}")]
    Sql(#[from] rusqlite::Error),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    pub username: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub preferred_currency: Option<String>,
}

/// Create the account and its first session. Returns the user and session token.
pub fn sign_up(
    conn: &Connection,
    input: NewUser,
    session_hours: u64,
) -> Result<(User, String), UserError> {
    let username = input.username.trim().to_string();
    if username.is_empty() {
        return Err(UserError::Invalid("Username is required".into()));
    }
    if username.chars().count() > MAX_USERNAME_LEN {
        return Err(UserError::Invalid(format!(
            "Username must be {} characters or less",
            MAX_USERNAME_LEN
        )));
    }
    let email = input.email.trim().to_string();
    if !email.contains('@') {
        return Err(UserError::Invalid("A valid email is required".into()));
    }
    let currency = CurrencyCode::parse(input.preferred_currency.as_deref().unwrap_or("EUR"))
        .map_err(|e| UserError::Invalid(e.to_string()))?;
    let phone = input
        .phone
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty());

    let user = User {
        id: uuid::Uuid::now_v7().to_string(),
        username,
        email,
        phone,
        is_verified: false,
        preferred_currency: currency.to_string(),
        address: None,
        address_updated_at: None,
        created_at: Utc::now(),
    };

    // The name check, the insert and the first session commit together
    let token = with_immediate_transaction(conn, |conn| {
        let taken: bool = conn.query_row(
            "SELECT COUNT(*) > 0 FROM users WHERE username = ?1",
            params![user.username],
            |row| row.get(0),
        )?;
        if taken {
            return Err(UserError::UsernameTaken);
        }

        conn.execute(
            "INSERT INTO users (id, username, email, phone, is_verified, preferred_currency, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                user.id,
                user.username,
                user.email,
                user.phone,
                user.is_verified,
                user.preferred_currency,
                fmt_timestamp(user.created_at),
            ],
        )?;

        Ok(session::create_session(conn, &user.id, session_hours)?)
    })?;
    tracing::info!("New user {} ({})", user.username, user.id);

    Ok((user, token))
}

pub fn find(conn: &Connection, user_id: &str) -> Result<User, UserError> {
    User::find(conn, user_id)?.ok_or(UserError::NotFound)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileStats {
    pub itinerary_count: i64,
    pub request_count: i64,
    pub completed_deliveries: i64,
}

/// Counts shown on a profile. Deliveries are accepted proposals where the user travelled.
pub fn stats(conn: &Connection, user_id: &str) -> rusqlite::Result<ProfileStats> {
    conn.query_row(
        "SELECT
            (SELECT COUNT(*) FROM itineraries WHERE owner_id = ?1),
            (SELECT COUNT(*) FROM requests WHERE owner_id = ?1),
            (SELECT COUNT(*) FROM proposals WHERE traveler_id = ?1 AND status = 'accepted')",
        params![user_id],
        |row| {
            Ok(ProfileStats {
                itinerary_count: row.get(0)?,
                request_count: row.get(1)?,
                completed_deliveries: row.get(2)?,
            })
        },
    )
}

/// What another user may see of a profile.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicProfile {
    pub id: String,
    pub username: String,
    pub is_verified: bool,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<ProfileStats>,
    pub can_contact: bool,
}

impl PublicProfile {
    pub fn project(
        user: User,
        settings: &VisibilitySettings,
        viewer: Option<&Viewer>,
        stats: Option<ProfileStats>,
    ) -> Option<Self> {
        let owner = user.id.as_str();
        if !visibility::is_profile_visible_for(owner, settings, viewer) {
            return None;
        }

        let email = visibility::is_email_visible_for(owner, settings, viewer)
            .then(|| user.email.clone());
        let phone = if visibility::is_phone_visible_for(owner, settings, viewer) {
            user.phone.clone()
        } else {
            None
        };
        let stats = if visibility::are_stats_visible_for(owner, settings, viewer) {
            stats
        } else {
            None
        };
        let can_contact = visibility::can_receive_message_from(owner, settings, viewer);

        Some(Self {
            id: user.id,
            username: user.username,
            is_verified: user.is_verified,
            created_at: user.created_at,
            email,
            phone,
            stats,
            can_contact,
        })
    }
}

/// Profile of `user_id` as `viewer` sees it. Hidden profiles are reported as missing.
pub fn profile_for(
    conn: &Connection,
    user_id: &str,
    viewer: Option<&Viewer>,
) -> Result<PublicProfile, UserError> {
    let user = find(conn, user_id)?;
    let settings = visibility::load_or_default(conn, user_id)?;
    let stats = stats(conn, user_id)?;
    PublicProfile::project(user, &settings, viewer, Some(stats)).ok_or(UserError::NotFound)
}

/// Earliest moment the address may change again, if a cooldown applies.
pub fn next_address_change(last_change: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
    last_change?.checked_add_months(Months::new(ADDRESS_COOLDOWN_MONTHS))
}

/// Set a new address unless the last change is less than six calendar months old.
///
/// Submitting the current address again succeeds without restarting the cooldown.
pub fn change_address(
    conn: &Connection,
    user_id: &str,
    address: &str,
    now: DateTime<Utc>,
) -> Result<User, UserError> {
    let address = address.trim();
    if address.is_empty() {
        return Err(UserError::Invalid("Address is required".into()));
    }

    let mut user = find(conn, user_id)?;
    if user.address.as_deref() == Some(address) {
        return Ok(user);
    }

    if let Some(allowed_from) = next_address_change(user.address_updated_at) {
        if now < allowed_from {
            return Err(UserError::AddressCooldown(allowed_from.date_naive()));
        }
    }

    conn.execute(
        "UPDATE users SET address = ?2, address_updated_at = ?3 WHERE id = ?1",
        params![user_id, address, fmt_timestamp(now)],
    )?;

    tracing::info!("User {} changed address", user_id);
    user.address = Some(address.to_string());
    user.address_updated_at = Some(now);
    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::{insert_user, test_pool};
    use crate::visibility::ProfileVisibility;
    use chrono::TimeZone;

    fn new_user(name: &str) -> NewUser {
        NewUser {
            username: name.into(),
            email: format!("{}@example.com", name),
            phone: Some("+221 77 000 00 00".into()),
            preferred_currency: Some("xof".into()),
        }
    }

    #[test]
    fn sign_up_creates_user_and_session() {
        let (pool, _tmp) = test_pool();
        let conn = pool.get().unwrap();

        let (user, token) = sign_up(&conn, new_user("awa"), 1).unwrap();
        assert_eq!(user.preferred_currency, "XOF");
        assert!(!user.is_verified);

        let resolved = session::user_for_token(&conn, &token).unwrap().unwrap();
        assert_eq!(resolved.id, user.id);

        assert!(matches!(
            sign_up(&conn, new_user("awa"), 1),
            Err(UserError::UsernameTaken)
        ));
        assert!(matches!(
            sign_up(&conn, new_user("   "), 1),
            Err(UserError::Invalid(_))
        ));
    }

    #[test]
    fn racing_sign_ups_for_one_name_leave_a_single_account() {
        let (pool, _tmp) = test_pool();
        let gate = std::sync::Barrier::new(4);

        let outcomes: Vec<_> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    let conn = pool.get().unwrap();
                    let gate = &gate;
                    scope.spawn(move || {
                        gate.wait();
                        sign_up(&conn, new_user("moussa"), 1)
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(outcomes
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| matches!(e, UserError::UsernameTaken)));

        let conn = pool.get().unwrap();
        let (users, sessions): (i64, i64) = conn
            .query_row(
                "SELECT (SELECT COUNT(*) FROM users), (SELECT COUNT(*) FROM sessions)",
                [],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .unwrap();
        assert_eq!((users, sessions), (1, 1));
    }

    #[test]
    fn cooldown_blocks_at_five_months_and_allows_at_six() {
        let (pool, _tmp) = test_pool();
        let user_id = insert_user(&pool, "moussa", false);
        let conn = pool.get().unwrap();

        let first = Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap();
        change_address(&conn, &user_id, "12 rue de Dakar", first).unwrap();

        let five_months = Utc.with_ymd_and_hms(2024, 6, 15, 10, 0, 0).unwrap();
        let err = change_address(&conn, &user_id, "3 avenue Cheikh", five_months).unwrap_err();
        match err {
            UserError::AddressCooldown(date) => {
                assert_eq!(date, NaiveDate::from_ymd_opt(2024, 7, 15).unwrap());
            }
            other => panic!("expected cooldown, got {:?}", other),
        }

        let six_months = Utc.with_ymd_and_hms(2024, 7, 15, 10, 0, 0).unwrap();
        let user = change_address(&conn, &user_id, "3 avenue Cheikh", six_months).unwrap();
        assert_eq!(user.address.as_deref(), Some("3 avenue Cheikh"));
        assert_eq!(user.address_updated_at, Some(six_months));
    }

    #[test]
    fn same_address_is_a_no_op() {
        let (pool, _tmp) = test_pool();
        let user_id = insert_user(&pool, "fatou", false);
        let conn = pool.get().unwrap();

        let first = Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap();
        change_address(&conn, &user_id, "12 rue de Dakar", first).unwrap();

        let later = Utc.with_ymd_and_hms(2024, 2, 1, 10, 0, 0).unwrap();
        let user = change_address(&conn, &user_id, " 12 rue de Dakar ", later).unwrap();
        assert_eq!(user.address_updated_at, Some(first));
    }

    #[test]
    fn cooldown_follows_calendar_months() {
        let end_of_august = Utc.with_ymd_and_hms(2023, 8, 31, 0, 0, 0).unwrap();
        // February has no 31st; chrono clamps to the last day
        assert_eq!(
            next_address_change(Some(end_of_august)),
            Some(Utc.with_ymd_and_hms(2024, 2, 29, 0, 0, 0).unwrap())
        );
        assert_eq!(next_address_change(None), None);
    }

    #[test]
    fn profile_respects_visibility() {
        let (pool, _tmp) = test_pool();
        let conn = pool.get().unwrap();
        let (owner, _) = sign_up(&conn, new_user("khady"), 1).unwrap();
        let stranger = Viewer::new("stranger", false);

        let default_view = profile_for(&conn, &owner.id, Some(&stranger)).unwrap();
        assert!(default_view.email.is_none());
        assert!(default_view.phone.is_none());
        assert_eq!(
            default_view.stats,
            Some(ProfileStats {
                itinerary_count: 0,
                request_count: 0,
                completed_deliveries: 0
            })
        );
        assert!(default_view.can_contact);

        let me = Viewer::new(owner.id.clone(), false);
        let own_view = profile_for(&conn, &owner.id, Some(&me)).unwrap();
        assert_eq!(own_view.email.as_deref(), Some("khady@example.com"));
        assert!(own_view.phone.is_some());
        assert!(!own_view.can_contact);

        visibility::save(
            &conn,
            &owner.id,
            &VisibilitySettings {
                profile_visibility: ProfileVisibility::Private,
                ..Default::default()
            },
        )
        .unwrap();
        assert!(matches!(
            profile_for(&conn, &owner.id, Some(&stranger)),
            Err(UserError::NotFound)
        ));
        assert!(matches!(
            profile_for(&conn, &owner.id, None),
            Err(UserError::NotFound)
        ));
    }
}
