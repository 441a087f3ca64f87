// Visibility - per-user privacy settings and the predicates that gate third-party reads
// A missing settings row is the default value, so callers never deal with "no settings".
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::db::models::{status_column, UnknownStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileVisibility {
    #[default]
    Public,
    VerifiedOnly,
    Private,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactPermission {
    #[default]
    Everyone,
    VerifiedOnly,
    Nobody,
}

impl ProfileVisibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::VerifiedOnly => "verified_only",
            Self::Private => "private",
        }
    }
}

impl std::str::FromStr for ProfileVisibility {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "public" => Ok(Self::Public),
            "verified_only" => Ok(Self::VerifiedOnly),
            "private" => Ok(Self::Private),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

impl ContactPermission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Everyone => "everyone",
            Self::VerifiedOnly => "verified_only",
            Self::Nobody => "nobody",
        }
    }
}

impl std::str::FromStr for ContactPermission {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "everyone" => Ok(Self::Everyone),
            "verified_only" => Ok(Self::VerifiedOnly),
            "nobody" => Ok(Self::Nobody),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisibilitySettings {
    pub show_in_search: bool,
    pub profile_visibility: ProfileVisibility,
    pub contact_permission: ContactPermission,
    pub show_phone: bool,
    pub show_email: bool,
    pub show_stats: bool,
}

impl Default for VisibilitySettings {
    fn default() -> Self {
        Self {
            show_in_search: true,
            profile_visibility: ProfileVisibility::Public,
            contact_permission: ContactPermission::Everyone,
            show_phone: false,
            show_email: false,
            show_stats: true,
        }
    }
}

/// Whoever is looking at another user's data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Viewer {
    pub user_id: String,
    pub is_verified: bool,
}

impl Viewer {
    pub fn new(user_id: impl Into<String>, is_verified: bool) -> Self {
        Self {
            user_id: user_id.into(),
            is_verified,
        }
    }
}

fn is_self(owner_id: &str, viewer: Option<&Viewer>) -> bool {
    viewer.is_some_and(|v| v.user_id == owner_id)
}

pub fn is_search_visible(settings: &VisibilitySettings) -> bool {
    settings.show_in_search
}

pub fn is_profile_visible_for(
    owner_id: &str,
    settings: &VisibilitySettings,
    viewer: Option<&Viewer>,
) -> bool {
    if is_self(owner_id, viewer) {
        return true;
    }
    match settings.profile_visibility {
        ProfileVisibility::Public => true,
        ProfileVisibility::VerifiedOnly => viewer.is_some_and(|v| v.is_verified),
        ProfileVisibility::Private => false,
    }
}

/// Anonymous senders can never initiate contact.
pub fn can_receive_message_from(
    owner_id: &str,
    settings: &VisibilitySettings,
    sender: Option<&Viewer>,
) -> bool {
    let Some(sender) = sender else {
        return false;
    };
    if sender.user_id == owner_id {
        return false;
    }
    match settings.contact_permission {
        ContactPermission::Everyone => true,
        ContactPermission::VerifiedOnly => sender.is_verified,
        ContactPermission::Nobody => false,
    }
}

// Field-level exposure also requires the profile itself to be visible.

pub fn is_phone_visible_for(
    owner_id: &str,
    settings: &VisibilitySettings,
    viewer: Option<&Viewer>,
) -> bool {
    is_self(owner_id, viewer)
        || (settings.show_phone && is_profile_visible_for(owner_id, settings, viewer))
}

pub fn is_email_visible_for(
    owner_id: &str,
    settings: &VisibilitySettings,
    viewer: Option<&Viewer>,
) -> bool {
    is_self(owner_id, viewer)
        || (settings.show_email && is_profile_visible_for(owner_id, settings, viewer))
}

pub fn are_stats_visible_for(
    owner_id: &str,
    settings: &VisibilitySettings,
    viewer: Option<&Viewer>,
) -> bool {
    is_self(owner_id, viewer)
        || (settings.show_stats && is_profile_visible_for(owner_id, settings, viewer))
}

// -- Persistence --

pub fn load_or_default(conn: &Connection, user_id: &str) -> rusqlite::Result<VisibilitySettings> {
    let settings = conn
        .query_row(
            "SELECT show_in_search, profile_visibility, contact_permission,
                    show_phone, show_email, show_stats
             FROM user_settings WHERE user_id = ?1",
            params![user_id],
            |row| {
                Ok(VisibilitySettings {
                    show_in_search: row.get(0)?,
                    profile_visibility: status_column(row, 1)?,
                    contact_permission: status_column(row, 2)?,
                    show_phone: row.get(3)?,
                    show_email: row.get(4)?,
                    show_stats: row.get(5)?,
                })
            },
        )
        .optional()?;

    Ok(settings.unwrap_or_default())
}

pub fn save(conn: &Connection, user_id: &str, settings: &VisibilitySettings) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO user_settings
             (user_id, show_in_search, profile_visibility, contact_permission,
              show_phone, show_email, show_stats, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, datetime('now'))
         ON CONFLICT(user_id) DO UPDATE SET
             show_in_search = excluded.show_in_search,
             profile_visibility = excluded.profile_visibility,
             contact_permission = excluded.contact_permission,
             show_phone = excluded.show_phone,
             show_email = excluded.show_email,
             show_stats = excluded.show_stats,
             updated_at = excluded.updated_at",
        params![
            user_id,
            settings.show_in_search,
            settings.profile_visibility.as_str(),
            settings.contact_permission.as_str(),
            settings.show_phone,
            settings.show_email,
            settings.show_stats
        ],
    )?;
    Ok(())
}
