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

//! Core identifier types for shelter records.
//!
//! Every record stored by the [`Repository`](crate::Repository) is keyed by a
//! string identifier of the form `<prefix>-<sequence>`, where the sequence is
//! zero-padded to three digits (`pet-001`, `usr-012`, `don-1000`).

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! sequenced_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Prefix shared by every identifier of this kind.
            pub const PREFIX: &'static str = $prefix;

            /// Formats the identifier for sequence number `seq`.
            pub fn from_seq(seq: u64) -> Self {
                Self(format!("{}-{:03}", $prefix, seq))
            }

            /// Returns the numeric suffix, if the identifier follows the sequenced format.
            pub fn seq(&self) -> Option<u64> {
                self.0
                    .strip_prefix($prefix)
                    .and_then(|rest| rest.strip_prefix('-'))
                    .and_then(|digits| digits.parse().ok())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

sequenced_id!(
    /// Unique identifier for a pet (`pet-001`).
    PetId,
    "pet"
);

sequenced_id!(
    /// Unique identifier for a user account (`usr-001`).
    UserId,
    "usr"
);

sequenced_id!(
    /// Unique identifier for a donation (`don-001`).
    DonationId,
    "don"
);

sequenced_id!(
    /// Unique identifier for a service booking (`book-001`).
    BookingId,
    "book"
);

sequenced_id!(
    /// Unique identifier for an adoption inquiry (`inq-001`).
    InquiryId,
    "inq"
);

sequenced_id!(
    /// Identifier of an offering in the service catalog (`svc-001`).
    ServiceId,
    "svc"
);

/// Monotonic per-collection counter.
///
/// Sequence numbers are never reused, even after the record they named is deleted.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct Sequence(u64);

impl Sequence {
    pub(crate) fn next(&mut self) -> u64 {
        self.0 += 1;
        self.0
    }

    /// Advances the counter so the next value is strictly greater than `seen`.
    pub(crate) fn observe(&mut self, seen: Option<u64>) {
        if let Some(seen) = seen {
            self.0 = self.0.max(seen);
        }
    }
}
