use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum PresenceStatus {
    Online,
    #[default]
    Offline,
}

impl PresenceStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Online => "Online",
            Self::Offline => "Offline",
        }
    }
}

impl fmt::Display for PresenceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PresenceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Online" => Ok(Self::Online),
            "Offline" => Ok(Self::Offline),
            other => Err(format!("unknown presence status: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub status: PresenceStatus,
    /// Live connection bound to this user; `None` while offline.
    pub connection_id: Option<Uuid>,
    pub friends: Vec<Uuid>,
    pub created_at: OffsetDateTime,
}

impl User {
    #[must_use]
    pub fn is_friend_of(&self, other: Uuid) -> bool {
        self.friends.contains(&other)
    }

    /// Adds `other` to the friend list. Returns `false` if it was already present.
    pub fn add_friend(&mut self, other: Uuid) -> bool {
        if self.is_friend_of(other) {
            return false;
        }
        self.friends.push(other);
        true
    }

    #[must_use]
    pub fn summary(&self) -> UserSummary {
        UserSummary {
            id: self.id,
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            email: self.email.clone(),
            status: self.status,
        }
    }
}

/// The display-relevant subset of a user, as embedded in conversation listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserSummary {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub status: PresenceStatus,
}

/// Registration data for a user. Registration itself lives outside the relay.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_friend_is_idempotent() {
        let friend = Uuid::new_v4();
        let mut user = User {
            id: Uuid::new_v4(),
            first_name: "Ada".into(),
            last_name: "Lovelace".into(),
            email: "ada@example.com".into(),
            status: PresenceStatus::Offline,
            connection_id: None,
            friends: Vec::new(),
            created_at: OffsetDateTime::now_utc(),
        };

        assert!(user.add_friend(friend));
        assert!(!user.add_friend(friend));
        assert_eq!(user.friends, vec![friend]);
    }

    #[test]
    fn test_presence_status_parses_stored_values() {
        assert_eq!("Online".parse::<PresenceStatus>(), Ok(PresenceStatus::Online));
        assert_eq!("Offline".parse::<PresenceStatus>(), Ok(PresenceStatus::Offline));
        assert!("away".parse::<PresenceStatus>().is_err());
    }
}
