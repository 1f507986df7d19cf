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

//! Lock-guarded record storage.
//!
//! The [`Repository`] is the sole owner of every shelter record and of the
//! indices derived from them. All collections sit behind one
//! [`parking_lot::Mutex`]: several operations touch more than one index at a
//! time (a status change moves the pet record and the status-count index
//! together), and a single coarse lock keeps them from ever diverging.
//!
//! # Locking rules
//!
//! - Each public method holds the lock for exactly its own critical section.
//! - Nothing that blocks on I/O (email, settlement latency, the persistence
//!   mirror) runs while the lock is held. Callers build what they write before
//!   calling in and mirror what they got back after the call returns.
//! - `snapshot_*` methods copy out of the critical section, so callers can
//!   iterate without racing concurrent writers.

use crate::account::{AuthToken, PendingRegistration, Role, UserAccount};
use crate::base::{BookingId, DonationId, InquiryId, PetId, Sequence, ServiceId, UserId};
use crate::clock::{Clock, unix_nanos};
use crate::donation::{Donation, DonationRequest, DonationStatus};
use crate::pet::{NewPet, PetRecord, PetStatus, PetUpdate};
use crate::records::{
    AdoptionInquiry, BookingRequest, ContactMessage, ContactRequest, InquiryRequest,
    ServiceBooking, ServiceOffering,
};
use crate::{CoreError, seed};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, MutexGuard};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

#[derive(Debug, Default)]
struct Sequences {
    pet: Sequence,
    user: Sequence,
    donation: Sequence,
    booking: Sequence,
    inquiry: Sequence,
}

/// Every collection and index, guarded together by the repository's lock.
#[derive(Debug, Default)]
pub(crate) struct Store {
    /// Live pets in insertion order.
    pets: Vec<PetRecord>,
    /// Position of each pet in `pets`.
    pet_positions: HashMap<PetId, usize>,
    status_counts: HashMap<PetStatus, usize>,
    /// Pet IDs per breed, in insertion order.
    pets_by_breed: HashMap<String, Vec<PetId>>,

    users: Vec<UserAccount>,
    users_by_email: HashMap<String, usize>,
    pub(crate) pending: HashMap<String, PendingRegistration>,
    pub(crate) tokens: HashMap<String, AuthToken>,

    donations: Vec<Donation>,
    donation_positions: HashMap<DonationId, usize>,

    services: Vec<ServiceOffering>,
    service_bookings: HashMap<ServiceId, usize>,
    bookings: Vec<ServiceBooking>,
    inquiries: Vec<AdoptionInquiry>,
    contacts: Vec<ContactMessage>,

    seq: Sequences,
}

impl Store {
    fn assert_invariants(&self) {
        debug_assert_eq!(
            self.status_counts.values().sum::<usize>(),
            self.pets.len(),
            "Invariant violated: status buckets do not add up to the live pet count"
        );
        debug_assert_eq!(
            self.pet_positions.len(),
            self.pets.len(),
            "Invariant violated: pet index out of sync"
        );
    }

    fn insert_pet(&mut self, pet: NewPet, created_at: DateTime<Utc>) -> &PetRecord {
        let id = PetId::from_seq(self.seq.pet.next());
        self.push_pet(pet.into_record(id, created_at))
    }

    fn push_pet(&mut self, record: PetRecord) -> &PetRecord {
        *self.status_counts.entry(record.status).or_default() += 1;
        self.pets_by_breed
            .entry(record.breed.clone())
            .or_default()
            .push(record.id.clone());
        self.pet_positions.insert(record.id.clone(), self.pets.len());
        self.pets.push(record);
        self.assert_invariants();
        &self.pets[self.pets.len() - 1]
    }

    fn pet_mut(&mut self, id: &PetId) -> Result<&mut PetRecord, CoreError> {
        let position = *self.pet_positions.get(id).ok_or(CoreError::NotFound)?;
        Ok(&mut self.pets[position])
    }

    fn unindex_breed(&mut self, breed: &str, id: &PetId) {
        if let Some(ids) = self.pets_by_breed.get_mut(breed) {
            ids.retain(|existing| existing != id);
            if ids.is_empty() {
                self.pets_by_breed.remove(breed);
            }
        }
    }

    fn update_pet(&mut self, id: &PetId, update: &PetUpdate) -> Result<PetRecord, CoreError> {
        let pet = self.pet_mut(id)?;
        let old_breed = pet.breed.clone();
        let old_status = update.apply_to(pet);
        let (new_status, new_breed) = (pet.status, pet.breed.clone());
        let updated = pet.clone();

        if let Some(old_status) = old_status.filter(|old| *old != new_status) {
            if let Some(count) = self.status_counts.get_mut(&old_status) {
                *count -= 1;
            }
            *self.status_counts.entry(new_status).or_default() += 1;
        }
        if new_breed != old_breed {
            self.unindex_breed(&old_breed, id);
            self.pets_by_breed
                .entry(new_breed)
                .or_default()
                .push(id.clone());
        }
        self.assert_invariants();
        Ok(updated)
    }

    fn delete_pet(&mut self, id: &PetId) -> Result<PetRecord, CoreError> {
        let position = self.pet_positions.remove(id).ok_or(CoreError::NotFound)?;
        let removed = self.pets.remove(position);
        for (offset, pet) in self.pets[position..].iter().enumerate() {
            self.pet_positions.insert(pet.id.clone(), position + offset);
        }
        if let Some(count) = self.status_counts.get_mut(&removed.status) {
            *count -= 1;
        }
        self.unindex_breed(&removed.breed, id);
        self.assert_invariants();
        Ok(removed)
    }

    fn replace_pets(&mut self, pets: Vec<PetRecord>) {
        self.pets.clear();
        self.pet_positions.clear();
        self.status_counts.clear();
        self.pets_by_breed.clear();
        self.seq.pet = Sequence::default();
        for pet in pets {
            if self.pet_positions.contains_key(&pet.id) {
                continue;
            }
            self.seq.pet.observe(pet.id.seq());
            self.push_pet(pet);
        }
    }

    pub(crate) fn find_user_by_email(&self, email: &str) -> Option<&UserAccount> {
        self.users_by_email.get(email).map(|&i| &self.users[i])
    }

    pub(crate) fn find_user(&self, id: &UserId) -> Option<&UserAccount> {
        self.users.iter().find(|user| &user.id == id)
    }

    /// Creates an account from an already-hashed password.
    pub(crate) fn insert_user(
        &mut self,
        email: &str,
        username: &str,
        password_digest: &str,
        now: DateTime<Utc>,
    ) -> Result<UserAccount, CoreError> {
        if self.users_by_email.contains_key(email) {
            return Err(CoreError::AlreadyExists);
        }
        let user = UserAccount {
            id: UserId::from_seq(self.seq.user.next()),
            email: email.to_string(),
            username: username.to_string(),
            password_digest: password_digest.to_string(),
            role: Role::User,
            is_admin: false,
            is_active: true,
            created_at: now,
        };
        self.users_by_email.insert(user.email.clone(), self.users.len());
        self.users.push(user.clone());
        Ok(user)
    }

    fn replace_users(&mut self, users: Vec<UserAccount>) {
        self.users.clear();
        self.users_by_email.clear();
        self.seq.user = Sequence::default();
        for user in users {
            if self.users_by_email.contains_key(&user.email) {
                continue;
            }
            self.seq.user.observe(user.id.seq());
            self.users_by_email.insert(user.email.clone(), self.users.len());
            self.users.push(user);
        }
    }

    fn insert_donation(&mut self, request: DonationRequest, now: DateTime<Utc>) -> Donation {
        let donation = Donation {
            id: DonationId::from_seq(self.seq.donation.next()),
            donor_name: request.donor_name,
            donor_email: request.donor_email,
            amount: request.amount,
            payment_method: request.payment_method,
            transaction_id: format!("txn-{}", unix_nanos(now)),
            status: DonationStatus::Pending,
            created_at: now,
            payment_via_deeplink: request.payment_via_deeplink,
        };
        self.donation_positions
            .insert(donation.id.clone(), self.donations.len());
        self.donations.push(donation.clone());
        donation
    }

    fn mark_donation_status(
        &mut self,
        id: &DonationId,
        status: DonationStatus,
        transaction_id: Option<&str>,
    ) -> Result<Donation, CoreError> {
        let position = *self.donation_positions.get(id).ok_or(CoreError::NotFound)?;
        let donation = &mut self.donations[position];
        if donation.status != DonationStatus::Pending {
            return Err(CoreError::AlreadySettled);
        }
        donation.status = status;
        if let Some(transaction_id) = transaction_id {
            donation.transaction_id = transaction_id.to_string();
        }
        Ok(donation.clone())
    }

    fn replace_donations(&mut self, donations: Vec<Donation>) {
        self.donations.clear();
        self.donation_positions.clear();
        self.seq.donation = Sequence::default();
        for donation in donations {
            if self.donation_positions.contains_key(&donation.id) {
                continue;
            }
            self.seq.donation.observe(donation.id.seq());
            self.donation_positions
                .insert(donation.id.clone(), self.donations.len());
            self.donations.push(donation);
        }
    }

    fn statistics(&self) -> Statistics {
        let mut pets_by_species: BTreeMap<String, usize> = BTreeMap::new();
        for pet in &self.pets {
            *pets_by_species.entry(pet.species.clone()).or_default() += 1;
        }
        let (average_age, vaccination_rate) = if self.pets.is_empty() {
            (None, None)
        } else {
            let total = Decimal::from(self.pets.len());
            let ages: u64 = self.pets.iter().map(|pet| u64::from(pet.age)).sum();
            let vaccinated = self.pets.iter().filter(|pet| pet.is_vaccinated).count();
            (
                Some((Decimal::from(ages) / total).round_dp(2)),
                Some((Decimal::from(vaccinated) * Decimal::ONE_HUNDRED / total).round_dp(2)),
            )
        };
        Statistics {
            pets_by_status: PetStatus::ALL
                .iter()
                .map(|status| (*status, self.status_counts.get(status).copied().unwrap_or(0)))
                .collect(),
            pets_by_species,
            average_age,
            vaccination_rate,
            bookings_by_service: self
                .services
                .iter()
                .map(|svc| {
                    let count = self.service_bookings.get(&svc.id).copied().unwrap_or(0);
                    (svc.id.clone(), count)
                })
                .collect(),
            total_pets: self.pets.len(),
            total_services: self.services.len(),
            total_bookings: self.bookings.len(),
            total_messages: self.contacts.len(),
            total_donations: self.donations.len(),
            total_inquiries: self.inquiries.len(),
            total_users: self.users.len(),
        }
    }
}

/// Aggregate counters over the current state.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Statistics {
    pub pets_by_status: BTreeMap<PetStatus, usize>,
    pub pets_by_species: BTreeMap<String, usize>,
    pub average_age: Option<Decimal>,
    /// Percentage of pets vaccinated.
    pub vaccination_rate: Option<Decimal>,
    pub bookings_by_service: BTreeMap<ServiceId, usize>,
    pub total_pets: usize,
    pub total_services: usize,
    pub total_bookings: usize,
    pub total_messages: usize,
    pub total_donations: usize,
    pub total_inquiries: usize,
    pub total_users: usize,
}

/// Thread-safe owner of all shelter records.
///
/// Share it between request handlers and pipeline workers as an `Arc<Repository>`.
pub struct Repository {
    state: Mutex<Store>,
    clock: Arc<dyn Clock>,
}

impl Repository {
    /// Creates an empty repository.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(Store::default()),
            clock,
        }
    }

    /// Creates a repository holding the sample pets and the service catalog.
    pub fn seeded(clock: Arc<dyn Clock>) -> Self {
        let repo = Self::new(clock);
        {
            let now = repo.clock.now();
            let mut store = repo.state.lock();
            for (pet, created_at) in seed::sample_pets(now) {
                store.insert_pet(pet, created_at);
            }
            store.services = seed::service_catalog();
        }
        repo
    }

    pub(crate) fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Enters the critical section. Keep the guard short-lived and never block while holding it.
    pub(crate) fn lock(&self) -> MutexGuard<'_, Store> {
        self.state.lock()
    }

    /// Stores a new pet and returns it with its assigned ID.
    ///
    /// Fields are expected to be validated by the caller ([`NewPet::validate`]).
    pub fn insert_pet(&self, pet: NewPet) -> PetRecord {
        let now = self.clock.now();
        self.state.lock().insert_pet(pet, now).clone()
    }

    /// Applies the non-empty fields of `update`.
    ///
    /// A status change moves the pet between status buckets in the same
    /// critical section as the field write.
    ///
    /// # Errors
    ///
    /// [`CoreError::NotFound`] if no pet has this ID.
    pub fn update_pet(&self, id: &PetId, update: &PetUpdate) -> Result<PetRecord, CoreError> {
        self.state.lock().update_pet(id, update)
    }

    /// Removes a pet from the collection and every index.
    ///
    /// Not idempotent: deleting an absent pet is an error.
    ///
    /// # Errors
    ///
    /// [`CoreError::NotFound`] if no pet has this ID.
    pub fn delete_pet(&self, id: &PetId) -> Result<(), CoreError> {
        self.state.lock().delete_pet(id).map(|_| ())
    }

    pub fn find_pet(&self, id: &PetId) -> Option<PetRecord> {
        let store = self.state.lock();
        store
            .pet_positions
            .get(id)
            .map(|&position| store.pets[position].clone())
    }

    /// Copy of every live pet in insertion order.
    pub fn snapshot_pets(&self) -> Vec<PetRecord> {
        self.state.lock().pets.clone()
    }

    pub fn pet_count(&self) -> usize {
        self.state.lock().pets.len()
    }

    pub fn pets_by_breed(&self, breed: &str) -> Vec<PetId> {
        self.state
            .lock()
            .pets_by_breed
            .get(breed)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of live pets in each status bucket; every status is present.
    pub fn status_counts(&self) -> BTreeMap<PetStatus, usize> {
        let store = self.state.lock();
        PetStatus::ALL
            .iter()
            .map(|status| (*status, store.status_counts.get(status).copied().unwrap_or(0)))
            .collect()
    }

    pub fn find_user_by_email(&self, email: &str) -> Option<UserAccount> {
        self.state.lock().find_user_by_email(email).cloned()
    }

    pub fn find_user(&self, id: &UserId) -> Option<UserAccount> {
        self.state.lock().find_user(id).cloned()
    }

    pub fn snapshot_users(&self) -> Vec<UserAccount> {
        self.state.lock().users.clone()
    }

    /// Records a donation as `Pending` with a provisional transaction ID.
    ///
    /// The request is expected to be validated by the caller ([`DonationRequest::validate`]).
    pub fn insert_donation(&self, request: DonationRequest) -> Donation {
        let now = self.clock.now();
        self.state.lock().insert_donation(request, now)
    }

    pub fn find_donation(&self, id: &DonationId) -> Option<Donation> {
        let store = self.state.lock();
        store
            .donation_positions
            .get(id)
            .map(|&position| store.donations[position].clone())
    }

    /// Settles a pending donation.
    ///
    /// # Errors
    ///
    /// - [`CoreError::NotFound`] if no donation has this ID.
    /// - [`CoreError::AlreadySettled`] if it already left `Pending`.
    pub fn mark_donation_status(
        &self,
        id: &DonationId,
        status: DonationStatus,
        transaction_id: Option<&str>,
    ) -> Result<Donation, CoreError> {
        self.state
            .lock()
            .mark_donation_status(id, status, transaction_id)
    }

    pub fn snapshot_donations(&self) -> Vec<Donation> {
        self.state.lock().donations.clone()
    }

    /// Records a booking and bumps the booked service's counter together.
    pub fn insert_booking(&self, request: BookingRequest) -> ServiceBooking {
        let now = self.clock.now();
        let mut store = self.state.lock();
        let id = BookingId::from_seq(store.seq.booking.next());
        let booking = request.into_booking(id, now);
        if store.services.iter().any(|svc| svc.id == booking.service_id) {
            *store
                .service_bookings
                .entry(booking.service_id.clone())
                .or_default() += 1;
        }
        store.bookings.push(booking.clone());
        booking
    }

    pub fn snapshot_bookings(&self) -> Vec<ServiceBooking> {
        self.state.lock().bookings.clone()
    }

    pub fn insert_inquiry(&self, request: InquiryRequest) -> AdoptionInquiry {
        let now = self.clock.now();
        let mut store = self.state.lock();
        let id = InquiryId::from_seq(store.seq.inquiry.next());
        let inquiry = request.into_inquiry(id, now);
        store.inquiries.push(inquiry.clone());
        inquiry
    }

    pub fn snapshot_inquiries(&self) -> Vec<AdoptionInquiry> {
        self.state.lock().inquiries.clone()
    }

    pub fn insert_contact(&self, request: ContactRequest) -> ContactMessage {
        let message = request.into_message(self.clock.now());
        self.state.lock().contacts.push(message.clone());
        message
    }

    pub fn snapshot_contacts(&self) -> Vec<ContactMessage> {
        self.state.lock().contacts.clone()
    }

    pub fn services(&self) -> Vec<ServiceOffering> {
        self.state.lock().services.clone()
    }

    pub fn statistics(&self) -> Statistics {
        self.state.lock().statistics()
    }

    /// Replaces every pet and rebuilds the indices; duplicate IDs keep the first record.
    pub fn replace_pets(&self, pets: Vec<PetRecord>) {
        self.state.lock().replace_pets(pets);
    }

    pub fn replace_users(&self, users: Vec<UserAccount>) {
        self.state.lock().replace_users(users);
    }

    pub fn replace_donations(&self, donations: Vec<Donation>) {
        self.state.lock().replace_donations(donations);
    }

    pub fn replace_inquiries(&self, inquiries: Vec<AdoptionInquiry>) {
        let mut store = self.state.lock();
        store.seq.inquiry = Sequence::default();
        for inquiry in &inquiries {
            store.seq.inquiry.observe(inquiry.id.seq());
        }
        store.inquiries = inquiries;
    }
}
