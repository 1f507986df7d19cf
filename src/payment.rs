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

//! Donation settlement pipeline.
//!
//! ```text
//!  process_donation ──► [donations] ──► processor ──► [confirmations] ──► listener
//!        │                                  │                              │
//!        └─ Pending record, receipt         └─ receipt email (deeplink)    └─ Completed / Failed
//! ```
//!
//! The processor stands in for a payment gateway: it waits out the settlement
//! latency and confirms every donation. The listener is the only writer of a
//! donation's final status.

use crate::clock::unix_nanos;
use crate::config::{PaymentConfig, QueueConfig};
use crate::donation::{Donation, DonationRequest, DonationStatus, PaymentConfirmation, Receipt};
use crate::mirror::{Collection, MirrorHandle};
use crate::notify::{JobKind, Notifier};
use crate::queue::{self, JobQueue, Worker};
use crate::repository::Repository;
use crate::templates::Template;
use crate::CoreError;
use crossbeam::channel::Receiver;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

fn receipt_fields(donation: &Donation, receipt: &Receipt, transaction_id: &str) -> BTreeMap<&'static str, String> {
    BTreeMap::from([
        ("DonorName", donation.donor_name.clone()),
        ("Amount", format!("{:.2}", donation.amount)),
        ("ReceiptID", receipt.receipt_id.clone()),
        ("DonationID", donation.id.to_string()),
        ("TransactionID", transaction_id.to_string()),
        ("Date", receipt.issued_at.format("%B %-d, %Y %H:%M").to_string()),
        ("DonorEmail", donation.donor_email.clone()),
    ])
}

#[derive(Default)]
struct Counters {
    settled: AtomicU64,
    discarded: AtomicU64,
}

pub struct PaymentPipeline {
    repo: Arc<Repository>,
    notifier: Notifier,
    mirror: MirrorHandle,
    latency: Duration,
    donations: JobQueue<Donation>,
    confirmations: JobQueue<PaymentConfirmation>,
    donation_rx: Option<Receiver<Donation>>,
    confirmation_rx: Option<Receiver<PaymentConfirmation>>,
    processor: Option<Worker>,
    listener: Option<Worker>,
    counters: Arc<Counters>,
}

impl PaymentPipeline {
    /// Creates both queues. Nothing is processed until [`start`](Self::start).
    pub fn new(
        repo: Arc<Repository>,
        notifier: Notifier,
        mirror: MirrorHandle,
        queues: &QueueConfig,
        payments: &PaymentConfig,
    ) -> Self {
        let (donations, donation_rx) = queue::bounded("donation", queues.donations);
        let (confirmations, confirmation_rx) = queue::bounded("confirmation", queues.confirmations);
        Self {
            repo,
            notifier,
            mirror,
            latency: payments.settlement_latency,
            donations,
            confirmations,
            donation_rx: Some(donation_rx),
            confirmation_rx: Some(confirmation_rx),
            processor: None,
            listener: None,
            counters: Arc::new(Counters::default()),
        }
    }

    /// Spawns the processor and the confirmation listener. Calling it again is a no-op.
    ///
    /// # Errors
    ///
    /// [`CoreError::ShutDown`] if a worker thread cannot be spawned.
    pub fn start(&mut self) -> Result<(), CoreError> {
        if let Some(confirmations) = self.confirmation_rx.take() {
            let repo = Arc::clone(&self.repo);
            let mirror = self.mirror.clone();
            let counters = Arc::clone(&self.counters);
            self.listener = Some(Worker::spawn("confirmation-listener", confirmations, move |confirmation| {
                reconcile(&repo, &mirror, &counters, confirmation)
            })?);
        }
        if let Some(donations) = self.donation_rx.take() {
            let repo = Arc::clone(&self.repo);
            let notifier = self.notifier.clone();
            let confirmations = self.confirmations.clone();
            let latency = self.latency;
            self.processor = Some(Worker::spawn("payment-processor", donations, move |donation| {
                settle(&repo, &notifier, &confirmations, latency, donation)
            })?);
        }
        Ok(())
    }

    /// Records a donation and queues it for settlement.
    ///
    /// Returns as soon as the donation is recorded as `Pending`; its final
    /// status is written later by the confirmation listener.
    ///
    /// # Errors
    ///
    /// - [`CoreError::InvalidInput`] from validation; nothing is recorded.
    /// - [`CoreError::Throttled`] if the donation queue is full. The donation
    ///   is recorded as `Failed` so it does not stay pending forever.
    /// - [`CoreError::ShutDown`] if the pipeline stopped; handled like throttling.
    pub fn process_donation(&self, request: DonationRequest) -> Result<Receipt, CoreError> {
        request.validate()?;
        let donation = self.repo.insert_donation(request);
        self.mirror
            .upsert(Collection::Donations, donation.id.as_str(), &donation);
        let receipt = Receipt::for_donation(&donation, self.repo.clock().now());

        if let Err(err) = self.donations.try_submit(donation.clone()) {
            tracing::warn!(donation_id = %donation.id, "donation not queued: {err}");
            match self
                .repo
                .mark_donation_status(&donation.id, DonationStatus::Failed, None)
            {
                Ok(failed) => self
                    .mirror
                    .upsert(Collection::Donations, failed.id.as_str(), &failed),
                Err(mark_err) => {
                    tracing::warn!(donation_id = %donation.id, "could not fail donation: {mark_err}")
                }
            }
            return Err(err);
        }

        tracing::info!(donation_id = %donation.id, amount = %donation.amount, "donation recorded");
        Ok(receipt)
    }

    /// Feeds a gateway confirmation straight to the listener.
    ///
    /// # Errors
    ///
    /// [`CoreError::Throttled`] or [`CoreError::ShutDown`] from the confirmation queue.
    pub fn confirm(&self, confirmation: PaymentConfirmation) -> Result<(), CoreError> {
        self.confirmations.try_submit(confirmation)
    }

    pub fn queued_donations(&self) -> usize {
        self.donations.len()
    }

    /// Donations whose status was written by the listener.
    pub fn settled(&self) -> u64 {
        self.counters.settled.load(Ordering::SeqCst)
    }

    /// Confirmations that matched no pending donation.
    pub fn discarded(&self) -> u64 {
        self.counters.discarded.load(Ordering::SeqCst)
    }

    /// Stops taking donations and lets the processor finish the queued ones.
    pub fn stop_processor(&mut self) {
        self.donations.close();
        if let Some(worker) = self.processor.take() {
            worker.stop();
        }
    }

    /// Stops the listener after it applied every queued confirmation.
    pub fn stop_listener(&mut self) {
        self.confirmations.close();
        if let Some(worker) = self.listener.take() {
            worker.stop();
        }
    }

    pub fn stop(&mut self) {
        self.stop_processor();
        self.stop_listener();
    }
}

impl Drop for PaymentPipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

fn settle(
    repo: &Repository,
    notifier: &Notifier,
    confirmations: &JobQueue<PaymentConfirmation>,
    latency: Duration,
    donation: Donation,
) {
    thread::sleep(latency);
    let now = repo.clock().now();
    let transaction_id = format!("txn-{}-{}", unix_nanos(now), donation.id);
    let confirmation = PaymentConfirmation {
        donation_id: donation.id.clone(),
        success: true,
        transaction_id: transaction_id.clone(),
        error: None,
    };
    if let Err(err) = confirmations.submit(confirmation) {
        tracing::error!(donation_id = %donation.id, "confirmation lost: {err}");
    }

    if donation.payment_via_deeplink {
        let receipt = Receipt::for_donation(&donation, now);
        notifier.notify_template(
            JobKind::Receipt,
            &donation.donor_email,
            Template::Receipt,
            &receipt_fields(&donation, &receipt, &transaction_id),
        );
    } else {
        tracing::info!(donation_id = %donation.id, "manual payment, receipt only on request");
    }
}

fn reconcile(
    repo: &Repository,
    mirror: &MirrorHandle,
    counters: &Counters,
    confirmation: PaymentConfirmation,
) {
    let status = if confirmation.success {
        DonationStatus::Completed
    } else {
        DonationStatus::Failed
    };
    match repo.mark_donation_status(
        &confirmation.donation_id,
        status,
        Some(&confirmation.transaction_id),
    ) {
        Ok(donation) => {
            counters.settled.fetch_add(1, Ordering::SeqCst);
            tracing::info!(
                donation_id = %donation.id,
                status = ?donation.status,
                reason = confirmation.error.as_deref().unwrap_or(""),
                "donation settled"
            );
            mirror.upsert(Collection::Donations, donation.id.as_str(), &donation);
        }
        Err(CoreError::NotFound) => {
            counters.discarded.fetch_add(1, Ordering::SeqCst);
            tracing::debug!(donation_id = %confirmation.donation_id, "confirmation for unknown donation discarded");
        }
        Err(err) => {
            counters.discarded.fetch_add(1, Ordering::SeqCst);
            tracing::warn!(donation_id = %confirmation.donation_id, "confirmation ignored: {err}");
        }
    }
}
