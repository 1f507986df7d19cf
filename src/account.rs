// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! User accounts and the authentication records that lead to them.
//!
//! ```text
//!  NoAccount ──register──► PendingVerification ──verify──► Verified
//!                              │      ▲
//!                              │      └─register (replaces code, resets expiry)
//!                              └─verify after expiry──► NoAccount
//! ```

use crate::base::UserId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

/// A verified account.
///
/// Serializes the password digest so the persistence mirror can restore logins;
/// use [`UserAccount::profile`] for anything shown to users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAccount {
    pub id: UserId,
    pub email: String,
    pub username: String,
    pub password_digest: String,
    pub role: Role,
    pub is_admin: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Public view of an account, without the digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: UserId,
    pub email: String,
    pub username: String,
    pub role: Role,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
}

impl UserAccount {
    pub fn profile(&self) -> UserProfile {
        UserProfile {
            id: self.id.clone(),
            email: self.email.clone(),
            username: self.username.clone(),
            role: self.role,
            is_admin: self.is_admin,
            created_at: self.created_at,
        }
    }
}

/// A signup awaiting its one-time code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRegistration {
    pub email: String,
    pub username: String,
    pub password_digest: String,
    pub code: String,
    pub expires_at: DateTime<Utc>,
}

/// An issued bearer token with the owner's details denormalized for lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthToken {
    pub token: String,
    pub user_id: UserId,
    pub expires_at: DateTime<Utc>,
    pub role: Role,
    pub is_admin: bool,
    pub username: String,
    pub email: String,
}

impl AuthToken {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account() -> UserAccount {
        UserAccount {
            id: UserId::from_seq(1),
            email: "jane@example.com".into(),
            username: "jane".into(),
            password_digest: "abc123".into(),
            role: Role::User,
            is_admin: false,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn profile_omits_digest() {
        let json = serde_json::to_value(account().profile()).unwrap();
        assert_eq!(json["email"], "jane@example.com");
        assert_eq!(json["role"], "user");
        assert!(json.get("passwordDigest").is_none());
    }

    #[test]
    fn account_round_trips_digest_for_mirroring() {
        let json = serde_json::to_value(account()).unwrap();
        assert_eq!(json["passwordDigest"], "abc123");
        let back: UserAccount = serde_json::from_value(json).unwrap();
        assert_eq!(back, account_with_time(back.created_at));
    }

    fn account_with_time(at: DateTime<Utc>) -> UserAccount {
        UserAccount {
            created_at: at,
            ..account()
        }
    }

    #[test]
    fn token_expires_strictly_after_deadline() {
        let now = Utc::now();
        let token = AuthToken {
            token: "tok_usr-001_1".into(),
            user_id: UserId::from_seq(1),
            expires_at: now,
            role: Role::User,
            is_admin: false,
            username: "jane".into(),
            email: "jane@example.com".into(),
        };
        assert!(!token.is_expired_at(now));
        assert!(token.is_expired_at(now + chrono::TimeDelta::nanoseconds(1)));
    }
}
