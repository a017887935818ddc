//! Database models

use crate::utils::parse_datetime_or_now;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sqlx::Row;
use std::fmt;
use std::str::FromStr;

/// Prefix carried by every canonical role name
pub const ROLE_PREFIX: &str = "ROLE_";

/// Error type for parsing models from strings
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    InvalidRole(String),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::InvalidRole(s) => write!(f, "Invalid role: {}", s),
        }
    }
}

impl std::error::Error for ParseError {}

/// Role granted to a user at registration time
///
/// The set is closed: anything that does not normalize to one of the
/// canonical names is rejected rather than mapped to a fallback role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Role {
    Organizer,
    Practitioner,
}

impl Role {
    pub const ALL: [Role; 2] = [Role::Organizer, Role::Practitioner];

    /// Canonical representation used in storage and in token claims
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Organizer => "ROLE_ORGANIZER",
            Role::Practitioner => "ROLE_PRACTITIONER",
        }
    }

    /// Upper-case the input and add the `ROLE_` prefix when it is missing
    pub fn normalize(input: &str) -> String {
        let upper = input.trim().to_uppercase();
        if upper.starts_with(ROLE_PREFIX) {
            upper
        } else {
            format!("{}{}", ROLE_PREFIX, upper)
        }
    }
}

impl FromStr for Role {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match Self::normalize(s).as_str() {
            "ROLE_ORGANIZER" => Ok(Role::Organizer),
            "ROLE_PRACTITIONER" => Ok(Role::Practitioner),
            _ => Err(ParseError::InvalidRole(s.to_string())),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Role {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Role {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// User model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// New user (for insertion)
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub password_hash: String,
    pub role: Role,
}

impl TryFrom<&sqlx::sqlite::SqliteRow> for User {
    type Error = sqlx::Error;

    fn try_from(row: &sqlx::sqlite::SqliteRow) -> Result<Self, Self::Error> {
        let role_str: String = row.try_get("role")?;
        let role = Role::from_str(&role_str).map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
        Ok(User {
            id: row.try_get("id")?,
            username: row.try_get("username")?,
            password_hash: row.try_get("password_hash")?,
            role,
            created_at: parse_datetime_or_now(&row.try_get::<String, _>("created_at")?),
            updated_at: parse_datetime_or_now(&row.try_get::<String, _>("updated_at")?),
        })
    }
}
