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

//! Error types for the shelter core.

use thiserror::Error;

/// Failures surfaced to direct callers of the repository, auth service and pipelines.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Referenced record does not exist
    #[error("not found")]
    NotFound,

    /// A record with the same unique key already exists
    #[error("user already exists")]
    AlreadyExists,

    /// Unknown user, wrong password, or unknown token
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Token was valid once but has passed its expiry
    #[error("token expired")]
    Expired,

    /// No signup is awaiting verification for this email
    #[error("no pending registration for this email, please sign up again")]
    NoPendingRegistration,

    /// The one-time code is past its expiry
    #[error("verification code has expired, please sign up again")]
    CodeExpired,

    /// The one-time code does not match the pending registration
    #[error("invalid verification code")]
    CodeMismatch,

    /// Structurally invalid input; the payload says which field and why
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Donation already moved out of `Pending`
    #[error("donation already settled")]
    AlreadySettled,

    /// Bounded queue is saturated
    #[error("{0} queue is full, try again later")]
    Throttled(&'static str),

    /// Pipeline no longer accepts work
    #[error("pipeline is shut down")]
    ShutDown,

    /// Email template could not be filled
    #[error(transparent)]
    Render(#[from] RenderError),
}

impl CoreError {
    /// Whether an outer caller should see this as a plain "unauthorized".
    ///
    /// `Expired` and `InvalidCredentials` are kept apart internally but must not
    /// be distinguishable from outside.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, CoreError::InvalidCredentials | CoreError::Expired)
    }

    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        CoreError::InvalidInput(reason.into())
    }
}

/// A best-effort external call (mail transport, persistence mirror) failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("transport error: {0}")]
pub struct TransportError(pub String);

impl TransportError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

/// Email body rendering failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    /// Template references a field that was not supplied
    #[error("template {template} references unknown field {field}")]
    UnknownField {
        template: &'static str,
        field: String,
    },

    /// A `{{` was never closed
    #[error("template {0} has an unterminated placeholder")]
    Unterminated(&'static str),
}
