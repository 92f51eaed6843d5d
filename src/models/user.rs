//! User and credential models for storage and API.

use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Account role. Fixed at sign-up; role changes are not supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub enum Role {
    Student,
    Driver,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Driver => "driver",
            Role::Admin => "admin",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "student" => Ok(Role::Student),
            "driver" => Ok(Role::Driver),
            "admin" => Ok(Role::Admin),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Unknown role: {0}")]
pub struct UnknownRole(pub String);

/// User profile stored in the directory (document id = uid).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct User {
    /// Authenticated identity id (also used as document id)
    pub uid: String,
    /// Email address
    pub email: String,
    /// Account role
    pub role: Role,
    /// Display name
    pub name: String,
    /// Student ID or driver/staff ID
    pub college_id: String,
    /// Bus route the student rides (students only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route_number: Option<String>,
}

/// Login credential (document id = URL-encoded email).
///
/// The re-platformed service hosts its own identity records; the password
/// is stored as a salted PBKDF2-HMAC-SHA256 hash, never in clear.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    pub email: String,
    /// Uid of the User record this credential authenticates
    pub uid: String,
    /// Encoded as `pbkdf2$<iterations>$<salt b64>$<hash b64>`
    pub password_hash: String,
    /// When the account was created (RFC 3339)
    pub created_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Driver).unwrap(), "\"driver\"");
        assert_eq!(
            serde_json::from_str::<Role>("\"student\"").unwrap(),
            Role::Student
        );
    }

    #[test]
    fn role_parses_from_str() {
        assert_eq!("admin".parse::<Role>().unwrap(), Role::Admin);
        assert!("teacher".parse::<Role>().is_err());
    }

    #[test]
    fn student_route_number_is_omitted_when_absent() {
        let user = User {
            uid: "u1".to_string(),
            email: "d@example.com".to_string(),
            role: Role::Driver,
            name: "D".to_string(),
            college_id: "STAFF-1".to_string(),
            route_number: None,
        };
        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("route_number").is_none());
    }
}
