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

//! # Pawtner Core
//!
//! Concurrency core of an animal-shelter backend: an in-memory record store,
//! email-verified authentication and two background pipelines (notification
//! delivery and donation settlement), plus pet search.
//!
//! ## Core Components
//!
//! - [`Repository`]: sole owner of every record, behind one lock
//! - [`AuthService`]: register, verify, login and token validation
//! - [`NotificationPipeline`]: bounded email queue with retrying delivery
//! - [`PaymentPipeline`]: donation processor and confirmation listener
//! - [`QueryEngine`]: filter and text search over pet snapshots
//! - [`Backend`]: wires all of the above together and shuts it down in order
//!
//! ## Example
//!
//! ```
//! use pawtner_core::{NewPet, PetStatus, PetUpdate, Repository, SystemClock};
//! use std::sync::Arc;
//!
//! let repo = Repository::seeded(Arc::new(SystemClock));
//! let pet = repo.insert_pet(NewPet::new("Rex", "Dog", "Boxer", 4, PetStatus::Available));
//!
//! repo.update_pet(&pet.id, &PetUpdate::status(PetStatus::Adopted)).unwrap();
//! assert_eq!(repo.status_counts()[&PetStatus::Adopted], 1);
//!
//! repo.delete_pet(&pet.id).unwrap();
//! assert!(repo.delete_pet(&pet.id).is_err());
//! ```
//!
//! ## Thread Safety
//!
//! Every collection and index shares one [`parking_lot::Mutex`] inside the
//! repository. Pipelines run on their own threads and talk to request handlers
//! only through bounded [`crossbeam`] channels; nothing blocking runs while
//! the lock is held.

pub mod account;
pub mod auth;
pub mod backend;
mod base;
pub mod clock;
pub mod config;
pub mod donation;
pub mod error;
pub mod mirror;
pub mod notify;
pub mod payment;
pub mod pet;
pub mod query;
pub mod queue;
pub mod records;
pub mod repository;
mod seed;
pub mod templates;

pub use account::{AuthToken, PendingRegistration, Role, UserAccount, UserProfile};
pub use auth::{AuthService, PasswordHasher};
pub use backend::Backend;
pub use base::{BookingId, DonationId, InquiryId, PetId, ServiceId, UserId};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{AuthConfig, MirrorConfig, PaymentConfig, QueueConfig, RetryPolicy, ServiceConfig};
pub use donation::{Donation, DonationRequest, DonationStatus, PaymentConfirmation, Receipt};
pub use error::{CoreError, RenderError, TransportError};
pub use mirror::{Collection, HydrationReport, MemoryMirror, Mirror, NullMirror};
pub use notify::{LogTransport, MailTransport, MemoryTransport, NotificationJob, NotificationPipeline, Notifier};
pub use payment::PaymentPipeline;
pub use pet::{NewPet, PetRecord, PetStatus, PetUpdate};
pub use query::{PetFilter, PetQuery, QueryEngine, apply_filters};
pub use records::{
    AdoptionInquiry, BookingRequest, ContactMessage, ContactRequest, InquiryRequest, ServiceBooking,
    ServiceOffering,
};
pub use repository::{Repository, Statistics};
