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

//! Composition root.
//!
//! [`Backend`] owns the repository and every pipeline, wires their handles
//! together and shuts them down in dependency order: the payment processor
//! first (it feeds confirmations and receipts), then the confirmation listener
//! (it feeds mirror writes), then notifications, then the mirror.

use crate::auth::AuthService;
use crate::base::PetId;
use crate::clock::Clock;
use crate::config::ServiceConfig;
use crate::donation::{DonationRequest, Receipt};
use crate::mirror::{self, Collection, HydrationReport, Mirror, MirrorHandle, MirrorPipeline};
use crate::notify::{JobKind, MailTransport, NotificationPipeline, Notifier};
use crate::payment::PaymentPipeline;
use crate::pet::{NewPet, PetRecord, PetUpdate};
use crate::query::QueryEngine;
use crate::records::{
    AdoptionInquiry, BookingRequest, ContactMessage, ContactRequest, InquiryRequest, ServiceBooking,
};
use crate::repository::Repository;
use crate::templates::Template;
use crate::CoreError;
use std::collections::BTreeMap;
use std::sync::Arc;

pub struct Backend {
    config: ServiceConfig,
    repo: Arc<Repository>,
    auth: AuthService,
    queries: QueryEngine,
    notifier: Notifier,
    mirror_handle: MirrorHandle,
    payments: PaymentPipeline,
    notifications: NotificationPipeline,
    mirror: MirrorPipeline,
    hydration: HydrationReport,
    stopped: bool,
}

impl Backend {
    /// Builds a seeded backend, hydrates it from `mirror` and starts every worker.
    ///
    /// # Errors
    ///
    /// - [`CoreError::InvalidInput`] if the password secret is unusable.
    /// - [`CoreError::ShutDown`] if a worker thread cannot be spawned.
    pub fn start(
        config: ServiceConfig,
        transport: Arc<dyn MailTransport>,
        mirror: Arc<dyn Mirror>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, CoreError> {
        let mut backend = Self::new(config, transport, mirror, clock)?;
        backend.start_workers()?;
        Ok(backend)
    }

    /// Like [`start`](Self::start) but leaves the workers stopped, so queued
    /// jobs pile up until [`start_workers`](Self::start_workers).
    ///
    /// # Errors
    ///
    /// [`CoreError::InvalidInput`] if the password secret or an auth lifetime
    /// is unusable.
    pub fn new(
        config: ServiceConfig,
        transport: Arc<dyn MailTransport>,
        mirror: Arc<dyn Mirror>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, CoreError> {
        let repo = Arc::new(Repository::seeded(clock));
        let hydration = mirror::hydrate(&repo, mirror.as_ref(), &config.mirror);

        let mirror_pipeline = MirrorPipeline::new(config.queues.mirror, mirror, config.mirror.call_timeout);
        let notifications =
            NotificationPipeline::new(config.queues.notifications, config.notifications, transport);
        let notifier = notifications.notifier();
        let mirror_handle = mirror_pipeline.handle();
        let payments = PaymentPipeline::new(
            Arc::clone(&repo),
            notifier.clone(),
            mirror_handle.clone(),
            &config.queues,
            &config.payments,
        );
        let auth = AuthService::new(
            Arc::clone(&repo),
            notifier.clone(),
            mirror_handle.clone(),
            &config.auth,
        )?;

        Ok(Self {
            queries: QueryEngine::new(Arc::clone(&repo)),
            config,
            repo,
            auth,
            notifier,
            mirror_handle,
            payments,
            notifications,
            mirror: mirror_pipeline,
            hydration,
            stopped: false,
        })
    }

    /// Starts every worker that is not running yet.
    ///
    /// # Errors
    ///
    /// [`CoreError::ShutDown`] if a worker thread cannot be spawned.
    pub fn start_workers(&mut self) -> Result<(), CoreError> {
        self.mirror.start()?;
        self.notifications.start()?;
        self.payments.start()?;
        tracing::info!(pets = self.repo.pet_count(), "backend started");
        Ok(())
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn repository(&self) -> &Arc<Repository> {
        &self.repo
    }

    pub fn auth(&self) -> &AuthService {
        &self.auth
    }

    pub fn queries(&self) -> &QueryEngine {
        &self.queries
    }

    pub fn payments(&self) -> &PaymentPipeline {
        &self.payments
    }

    pub fn notifications(&self) -> &NotificationPipeline {
        &self.notifications
    }

    pub fn mirror(&self) -> &MirrorPipeline {
        &self.mirror
    }

    pub fn hydration(&self) -> &HydrationReport {
        &self.hydration
    }

    /// Validates and stores a pet, then mirrors it.
    ///
    /// # Errors
    ///
    /// [`CoreError::InvalidInput`] listing every validation problem.
    pub fn add_pet(&self, pet: NewPet) -> Result<PetRecord, CoreError> {
        pet.validate()?;
        let pet = self.repo.insert_pet(pet);
        tracing::info!(pet_id = %pet.id, name = pet.name, species = pet.species, "pet added");
        self.mirror_handle
            .upsert(Collection::Pets, pet.id.as_str(), &pet);
        Ok(pet)
    }

    /// # Errors
    ///
    /// [`CoreError::NotFound`] if no pet has this ID.
    pub fn update_pet(&self, id: &PetId, update: &PetUpdate) -> Result<PetRecord, CoreError> {
        let pet = self.repo.update_pet(id, update)?;
        tracing::info!(pet_id = %pet.id, status = %pet.status, "pet updated");
        self.mirror_handle
            .upsert(Collection::Pets, pet.id.as_str(), &pet);
        Ok(pet)
    }

    /// # Errors
    ///
    /// [`CoreError::NotFound`] if no pet has this ID, including a second delete.
    pub fn delete_pet(&self, id: &PetId) -> Result<(), CoreError> {
        self.repo.delete_pet(id)?;
        tracing::info!(pet_id = %id, "pet deleted");
        self.mirror_handle.delete(Collection::Pets, id.as_str());
        Ok(())
    }

    /// See [`PaymentPipeline::process_donation`].
    ///
    /// # Errors
    ///
    /// [`CoreError::InvalidInput`] or [`CoreError::Throttled`].
    pub fn process_donation(&self, request: DonationRequest) -> Result<Receipt, CoreError> {
        self.payments.process_donation(request)
    }

    /// # Errors
    ///
    /// [`CoreError::InvalidInput`] if the service, owner name or email is missing.
    pub fn create_booking(&self, request: BookingRequest) -> Result<ServiceBooking, CoreError> {
        request.validate()?;
        let booking = self.repo.insert_booking(request);
        tracing::info!(booking_id = %booking.id, service_id = %booking.service_id, "service booked");
        Ok(booking)
    }

    /// Records an adoption inquiry, mirrors it and acknowledges it by email.
    ///
    /// # Errors
    ///
    /// [`CoreError::InvalidInput`] if the pet, adopter name or email is missing.
    pub fn create_inquiry(&self, request: InquiryRequest) -> Result<AdoptionInquiry, CoreError> {
        request.validate()?;
        let inquiry = self.repo.insert_inquiry(request);
        tracing::info!(inquiry_id = %inquiry.id, pet_id = %inquiry.pet_id, "adoption inquiry received");
        self.mirror_handle
            .upsert(Collection::Inquiries, inquiry.id.as_str(), &inquiry);
        let fields = BTreeMap::from([
            ("AdopterName", inquiry.adopter_name.clone()),
            ("PetID", inquiry.pet_id.to_string()),
            ("InquiryID", inquiry.id.to_string()),
        ]);
        self.notifier.notify_template(
            JobKind::InquiryReceived,
            &inquiry.email,
            Template::InquiryReceived,
            &fields,
        );
        Ok(inquiry)
    }

    /// # Errors
    ///
    /// [`CoreError::InvalidInput`] if the name, email or message is missing.
    pub fn submit_contact(&self, request: ContactRequest) -> Result<ContactMessage, CoreError> {
        request.validate()?;
        let message = self.repo.insert_contact(request);
        tracing::info!(email = message.email, purpose = message.purpose, "contact message received");
        let fields = BTreeMap::from([
            ("Name", message.name.clone()),
            ("Purpose", message.purpose.clone()),
        ]);
        self.notifier.notify_template(
            JobKind::ContactReceived,
            &message.email,
            Template::ContactReceived,
            &fields,
        );
        Ok(message)
    }

    /// Stops accepting work, drains every queue and joins every worker.
    ///
    /// Idempotent; also runs on drop.
    pub fn shutdown(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        self.payments.stop_processor();
        self.payments.stop_listener();
        self.notifications.stop();
        self.mirror.stop();
        tracing::info!("backend stopped");
    }
}

impl Drop for Backend {
    fn drop(&mut self) {
        self.shutdown();
    }
}
