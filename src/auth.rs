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

//! Registration, email verification, login and token validation.
//!
//! Pending registrations and issued tokens live in the repository's store, so
//! every check-then-write below happens inside one critical section. Emails and
//! mirror writes are queued only after the lock is released.

use crate::account::{AuthToken, PendingRegistration, UserAccount};
use crate::clock::unix_nanos;
use crate::config::AuthConfig;
use crate::mirror::{Collection, MirrorHandle};
use crate::notify::{JobKind, Notifier};
use crate::repository::Repository;
use crate::templates::Template;
use crate::CoreError;
use chrono::{DateTime, TimeDelta, Utc};
use hmac::{Hmac, Mac};
use rand::Rng;
use sha2::Sha256;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

type HmacSha256 = Hmac<Sha256>;

/// Keyed one-way password digest (HMAC-SHA256, hex encoded).
///
/// Deterministic for a given secret, so a stored digest can be compared
/// against a fresh one at login.
#[derive(Clone)]
pub struct PasswordHasher {
    mac: HmacSha256,
}

impl PasswordHasher {
    /// # Errors
    ///
    /// [`CoreError::InvalidInput`] if the secret is rejected as an HMAC key.
    pub fn new(secret: &str) -> Result<Self, CoreError> {
        let mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|_| CoreError::invalid("password secret is not a usable key"))?;
        Ok(Self { mac })
    }

    pub fn digest(&self, password: &str) -> String {
        let mut mac = self.mac.clone();
        mac.update(password.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Constant-time comparison of `password` against a stored digest.
    pub fn matches(&self, password: &str, digest: &str) -> bool {
        let Ok(expected) = hex::decode(digest) else {
            return false;
        };
        let mut mac = self.mac.clone();
        mac.update(password.as_bytes());
        mac.verify_slice(&expected).is_ok()
    }
}

impl fmt::Debug for PasswordHasher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PasswordHasher").finish_non_exhaustive()
    }
}

/// Six random digits, zero padded.
pub fn one_time_code() -> String {
    format!("{:06}", rand::thread_rng().gen_range(0..1_000_000))
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn expiry(now: DateTime<Utc>, ttl: TimeDelta) -> Result<DateTime<Utc>, CoreError> {
    now.checked_add_signed(ttl)
        .ok_or_else(|| CoreError::invalid("expiry out of range"))
}

pub struct AuthService {
    repo: Arc<Repository>,
    notifier: Notifier,
    mirror: MirrorHandle,
    hasher: PasswordHasher,
    code_ttl: TimeDelta,
    token_ttl: TimeDelta,
}

impl AuthService {
    /// # Errors
    ///
    /// [`CoreError::InvalidInput`] if the configured password secret or a
    /// lifetime is unusable.
    pub fn new(
        repo: Arc<Repository>,
        notifier: Notifier,
        mirror: MirrorHandle,
        config: &AuthConfig,
    ) -> Result<Self, CoreError> {
        Ok(Self {
            repo,
            notifier,
            mirror,
            hasher: PasswordHasher::new(&config.password_secret)?,
            code_ttl: config.code_ttl()?,
            token_ttl: config.token_ttl()?,
        })
    }

    pub fn hasher(&self) -> &PasswordHasher {
        &self.hasher
    }

    /// Starts (or restarts) a signup and emails a one-time code.
    ///
    /// A second call for the same email before verification replaces the
    /// pending code and its expiry. The email is queued best-effort: failing to
    /// queue it is logged and the call still succeeds.
    ///
    /// # Errors
    ///
    /// - [`CoreError::InvalidInput`] if any field is empty.
    /// - [`CoreError::AlreadyExists`] if a verified account has this email.
    pub fn register(&self, email: &str, username: &str, password: &str) -> Result<(), CoreError> {
        let email = normalize_email(email);
        let username = username.trim();
        if email.is_empty() || username.is_empty() || password.is_empty() {
            return Err(CoreError::invalid("email, username and password are required"));
        }

        let pending = PendingRegistration {
            email: email.clone(),
            username: username.to_string(),
            password_digest: self.hasher.digest(password),
            code: one_time_code(),
            expires_at: expiry(self.repo.clock().now(), self.code_ttl)?,
        };
        let fields = BTreeMap::from([
            ("Username", pending.username.clone()),
            ("Code", pending.code.clone()),
        ]);
        {
            let mut store = self.repo.lock();
            if store.find_user_by_email(&email).is_some() {
                return Err(CoreError::AlreadyExists);
            }
            store.pending.insert(email.clone(), pending);
        }

        tracing::info!(email, "verification code issued");
        self.notifier
            .notify_template(JobKind::Verification, &email, Template::Verification, &fields);
        Ok(())
    }

    /// Completes a signup with its one-time code.
    ///
    /// # Errors
    ///
    /// - [`CoreError::NoPendingRegistration`] if no signup awaits this email.
    /// - [`CoreError::CodeExpired`] if the code is past its expiry; the pending
    ///   signup is discarded.
    /// - [`CoreError::CodeMismatch`] if the code is wrong; the signup stays pending.
    /// - [`CoreError::AlreadyExists`] if the email was verified meanwhile.
    pub fn verify(&self, email: &str, code: &str) -> Result<UserAccount, CoreError> {
        let email = normalize_email(email);
        let code = code.trim();
        let now = self.repo.clock().now();

        let user = {
            let mut store = self.repo.lock();
            let pending = store
                .pending
                .get(&email)
                .ok_or(CoreError::NoPendingRegistration)?;
            if now > pending.expires_at {
                store.pending.remove(&email);
                return Err(CoreError::CodeExpired);
            }
            if pending.code != code {
                return Err(CoreError::CodeMismatch);
            }
            let (username, digest) = (pending.username.clone(), pending.password_digest.clone());
            let user = store.insert_user(&email, &username, &digest, now)?;
            store.pending.remove(&email);
            user
        };

        tracing::info!(user_id = %user.id, email, "account verified");
        self.mirror.upsert(Collection::Users, user.id.as_str(), &user);
        let fields = BTreeMap::from([
            ("Username", user.username.clone()),
            ("Email", user.email.clone()),
            ("Date", user.created_at.format("%B %-d, %Y").to_string()),
        ]);
        self.notifier
            .notify_template(JobKind::Welcome, &user.email, Template::Welcome, &fields);
        Ok(user)
    }

    /// Issues a bearer token.
    ///
    /// # Errors
    ///
    /// [`CoreError::InvalidCredentials`] for an empty field, an unknown email or
    /// a wrong password alike.
    pub fn login(&self, email: &str, password: &str) -> Result<AuthToken, CoreError> {
        let email = normalize_email(email);
        if email.is_empty() || password.is_empty() {
            return Err(CoreError::InvalidCredentials);
        }
        let now = self.repo.clock().now();

        let mut store = self.repo.lock();
        let user = store
            .find_user_by_email(&email)
            .filter(|user| self.hasher.matches(password, &user.password_digest))
            .cloned()
            .ok_or(CoreError::InvalidCredentials)?;

        let mut nanos = unix_nanos(now);
        let mut token = format!("tok_{}_{nanos}", user.id);
        while store.tokens.contains_key(&token) {
            nanos += 1;
            token = format!("tok_{}_{nanos}", user.id);
        }
        let issued = AuthToken {
            token: token.clone(),
            user_id: user.id,
            expires_at: expiry(now, self.token_ttl)?,
            role: user.role,
            is_admin: user.is_admin,
            username: user.username,
            email: user.email,
        };
        store.tokens.insert(token, issued.clone());
        drop(store);

        tracing::info!(user_id = %issued.user_id, "login succeeded");
        Ok(issued)
    }

    /// Resolves a token to its account. An expired token is evicted.
    ///
    /// # Errors
    ///
    /// - [`CoreError::InvalidCredentials`] if the token is unknown or its user is gone.
    /// - [`CoreError::Expired`] if the token is past its expiry.
    pub fn validate(&self, token: &str) -> Result<UserAccount, CoreError> {
        let now = self.repo.clock().now();
        let mut store = self.repo.lock();
        let issued = store
            .tokens
            .get(token)
            .ok_or(CoreError::InvalidCredentials)?;
        if issued.is_expired_at(now) {
            store.tokens.remove(token);
            return Err(CoreError::Expired);
        }
        let user_id = issued.user_id.clone();
        store
            .find_user(&user_id)
            .cloned()
            .ok_or(CoreError::InvalidCredentials)
    }

    /// Code of the pending signup for `email`, if any.
    pub fn pending_code(&self, email: &str) -> Option<String> {
        self.repo
            .lock()
            .pending
            .get(&normalize_email(email))
            .map(|pending| pending.code.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_deterministic_and_not_plaintext() {
        let hasher = PasswordHasher::new("secret").unwrap();
        let digest = hasher.digest("hunter2");
        assert_eq!(digest, hasher.digest("hunter2"));
        assert_ne!(digest, "hunter2");
        assert_eq!(digest.len(), 64);
        assert!(hasher.matches("hunter2", &digest));
        assert!(!hasher.matches("hunter3", &digest));
        assert!(!hasher.matches("hunter2", "not hex"));
    }

    #[test]
    fn digest_depends_on_secret() {
        let a = PasswordHasher::new("one").unwrap();
        let b = PasswordHasher::new("two").unwrap();
        assert_ne!(a.digest("pw"), b.digest("pw"));
    }

    #[test]
    fn one_time_code_is_six_digits() {
        for _ in 0..100 {
            let code = one_time_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }
}
