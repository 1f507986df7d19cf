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

//! Service configuration.
//!
//! Every field has a default equal to the value the service runs with in
//! production, so an empty JSON object is a complete configuration.

use crate::CoreError;
use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Capacities of the bounded queues.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub notifications: usize,
    pub donations: usize,
    pub confirmations: usize,
    pub mirror: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            notifications: 100,
            donations: 50,
            confirmations: 50,
            mirror: 256,
        }
    }
}

/// Delivery retry policy for the notification worker.
///
/// Attempt `n` that fails waits `n * backoff_step` before attempt `n + 1`; the
/// first attempt is immediate and nothing waits after the last one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    #[serde(with = "millis")]
    pub backoff_step: Duration,
}

impl RetryPolicy {
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.backoff_step * attempt
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_step: Duration::from_millis(500),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaymentConfig {
    /// Simulated gateway round trip per donation.
    #[serde(with = "millis")]
    pub settlement_latency: Duration,
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            settlement_latency: Duration::from_millis(50),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub code_ttl_secs: i64,
    pub token_ttl_secs: i64,
    /// Key mixed into every password digest.
    pub password_secret: String,
}

impl AuthConfig {
    /// # Errors
    ///
    /// [`CoreError::InvalidInput`] unless the lifetime is positive and representable.
    pub fn code_ttl(&self) -> Result<TimeDelta, CoreError> {
        lifetime("code_ttl_secs", self.code_ttl_secs)
    }

    /// # Errors
    ///
    /// [`CoreError::InvalidInput`] unless the lifetime is positive and representable.
    pub fn token_ttl(&self) -> Result<TimeDelta, CoreError> {
        lifetime("token_ttl_secs", self.token_ttl_secs)
    }
}

fn lifetime(field: &str, secs: i64) -> Result<TimeDelta, CoreError> {
    TimeDelta::try_seconds(secs)
        .filter(|ttl| *ttl > TimeDelta::zero())
        .ok_or_else(|| CoreError::invalid(format!("{field} out of range: {secs}")))
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            code_ttl_secs: 5 * 60,
            token_ttl_secs: 24 * 60 * 60,
            password_secret: "pawtnersalt".to_string(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MirrorConfig {
    /// Bound on a single upsert or delete.
    #[serde(with = "millis")]
    pub call_timeout: Duration,
    /// Bound on loading a whole collection at startup.
    #[serde(with = "millis")]
    pub load_timeout: Duration,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(5),
            load_timeout: Duration::from_secs(15),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub queues: QueueConfig,
    pub notifications: RetryPolicy,
    pub payments: PaymentConfig,
    pub auth: AuthConfig,
    pub mirror: MirrorConfig,
}

impl ServiceConfig {
    /// Parses a JSON configuration; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
