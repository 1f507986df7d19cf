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

//! Integration tests for the background pipelines: donation settlement,
//! notification delivery with retries, mirror writes and ordered shutdown.

use chrono::Utc;
use pawtner_core::{
    Backend, Collection, ContactRequest, CoreError, DonationId, DonationRequest, DonationStatus,
    InquiryRequest, MemoryMirror, MemoryTransport, NewPet, NotificationJob, PaymentConfirmation,
    ManualClock, PetId, PetStatus, PetUpdate, Repository, RetryPolicy, ServiceConfig, SystemClock,
};
use pawtner_core::notify::JobKind;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

// === Harness ===

struct Harness {
    backend: Backend,
    mail: Arc<MemoryTransport>,
    mirror: Arc<MemoryMirror>,
}

fn fast_config() -> ServiceConfig {
    let mut config = ServiceConfig::default();
    config.notifications = RetryPolicy {
        max_attempts: 3,
        backoff_step: Duration::from_millis(1),
    };
    config.payments.settlement_latency = Duration::from_millis(1);
    config
}

fn harness_with(config: ServiceConfig, started: bool) -> Harness {
    let mail = Arc::new(MemoryTransport::new());
    let mirror = Arc::new(MemoryMirror::new());
    let clock = Arc::new(SystemClock);
    let backend = if started {
        Backend::start(config, mail.clone(), mirror.clone(), clock).unwrap()
    } else {
        Backend::new(config, mail.clone(), mirror.clone(), clock).unwrap()
    };
    Harness {
        backend,
        mail,
        mirror,
    }
}

fn harness() -> Harness {
    harness_with(fast_config(), true)
}

fn donation(amount: Decimal, deeplink: bool) -> DonationRequest {
    DonationRequest {
        donor_name: "Jane Doe".into(),
        donor_email: "jane@example.com".into(),
        amount,
        payment_method: "UPI".into(),
        payment_via_deeplink: deeplink,
    }
}

fn contact(email: &str) -> ContactRequest {
    ContactRequest {
        name: "Sam".into(),
        email: email.into(),
        purpose: "Volunteering".into(),
        message: "How can I help?".into(),
    }
}

/// Polls `condition` for up to two seconds.
fn eventually(condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

fn status_of(backend: &Backend, id: &DonationId) -> Option<DonationStatus> {
    backend
        .repository()
        .find_donation(id)
        .map(|donation| donation.status)
}

// === Donations ===

#[test]
fn donation_is_recorded_pending_then_completed() {
    let h = harness();

    let receipt = h.backend.process_donation(donation(dec!(500), false)).unwrap();
    assert_eq!(format!("{:.2}", receipt.amount), "500.00");
    assert!(receipt.receipt_id.starts_with("rcpt-"));
    assert!(receipt.message.contains("Jane Doe"));

    assert!(eventually(|| {
        status_of(&h.backend, &receipt.donation_id) == Some(DonationStatus::Completed)
    }));
    let settled = h.backend.repository().find_donation(&receipt.donation_id).unwrap();
    assert!(settled.transaction_id.starts_with("txn-"));
    assert_eq!(h.backend.payments().settled(), 1);

    assert!(eventually(|| {
        h.mirror
            .get(Collection::Donations, receipt.donation_id.as_str())
            .is_some_and(|record| record["status"] == "Completed")
    }));
}

#[test]
fn donations_at_the_same_instant_get_distinct_ids() {
    let mail = Arc::new(MemoryTransport::new());
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let backend = Backend::start(
        fast_config(),
        mail.clone(),
        Arc::new(MemoryMirror::new()),
        clock,
    )
    .unwrap();

    let first = backend.process_donation(donation(dec!(10), true)).unwrap();
    let second = backend.process_donation(donation(dec!(20), true)).unwrap();
    assert_ne!(first.receipt_id, second.receipt_id);

    assert!(eventually(|| backend.payments().settled() == 2));
    let repo = backend.repository();
    let first_txn = repo.find_donation(&first.donation_id).unwrap().transaction_id;
    let second_txn = repo.find_donation(&second.donation_id).unwrap().transaction_id;
    assert_ne!(first_txn, second_txn);
    assert!(eventually(|| mail.sent_to("jane@example.com").len() == 2));
}

#[test]
fn invalid_donation_is_not_recorded() {
    let h = harness();

    let result = h.backend.process_donation(donation(dec!(-100), false));
    assert!(matches!(result, Err(CoreError::InvalidInput(_))));
    let result = h.backend.process_donation(DonationRequest {
        payment_method: " ".into(),
        ..donation(dec!(10), false)
    });
    assert!(matches!(result, Err(CoreError::InvalidInput(_))));

    assert!(h.backend.repository().snapshot_donations().is_empty());
}

#[test]
fn deeplink_donation_gets_a_receipt_email() {
    let mut h = harness();

    let receipt = h.backend.process_donation(donation(dec!(250), true)).unwrap();
    assert!(eventually(|| h.mail.sent_to("jane@example.com").len() == 1));
    h.backend.shutdown();

    let mails = h.mail.sent_to("jane@example.com");
    assert_eq!(mails.len(), 1);
    assert!(mails[0].subject.contains("Donation Receipt"));
    assert!(mails[0].body.contains("250.00"));
    assert!(mails[0].body.contains(receipt.donation_id.as_str()));
}

#[test]
fn manual_donation_sends_no_email() {
    let mut h = harness();

    let receipt = h.backend.process_donation(donation(dec!(250), false)).unwrap();
    assert!(eventually(|| {
        status_of(&h.backend, &receipt.donation_id) == Some(DonationStatus::Completed)
    }));
    h.backend.shutdown();

    assert!(h.mail.sent_to("jane@example.com").is_empty());
}

#[test]
fn full_donation_queue_throttles_and_fails_the_donation() {
    let mut config = fast_config();
    config.queues.donations = 2;
    let mut h = harness_with(config, false);

    let first = h.backend.process_donation(donation(dec!(1), false)).unwrap();
    let second = h.backend.process_donation(donation(dec!(2), false)).unwrap();
    assert_eq!(h.backend.payments().queued_donations(), 2);

    let result = h.backend.process_donation(donation(dec!(3), false));
    assert_eq!(result.unwrap_err(), CoreError::Throttled("donation"));
    let rejected = h
        .backend
        .repository()
        .snapshot_donations()
        .into_iter()
        .find(|donation| donation.amount == dec!(3))
        .unwrap();
    assert_eq!(rejected.status, DonationStatus::Failed);

    h.backend.start_workers().unwrap();
    assert!(eventually(|| {
        [&first.donation_id, &second.donation_id]
            .iter()
            .all(|id| status_of(&h.backend, id) == Some(DonationStatus::Completed))
    }));
    assert_eq!(status_of(&h.backend, &rejected.id), Some(DonationStatus::Failed));
}

#[test]
fn failed_confirmation_marks_donation_failed() {
    let mut h = harness_with(fast_config(), false);

    let receipt = h.backend.process_donation(donation(dec!(40), false)).unwrap();
    h.backend
        .payments()
        .confirm(PaymentConfirmation {
            donation_id: receipt.donation_id.clone(),
            success: false,
            transaction_id: "txn-declined".into(),
            error: Some("card declined".into()),
        })
        .unwrap();

    // The decline is queued ahead of the processor's own confirmation, which
    // then finds the donation already settled.
    h.backend.start_workers().unwrap();
    assert!(eventually(|| h.backend.payments().discarded() == 1));

    let donation = h.backend.repository().find_donation(&receipt.donation_id).unwrap();
    assert_eq!(donation.status, DonationStatus::Failed);
    assert_eq!(donation.transaction_id, "txn-declined");
    assert_eq!(h.backend.payments().settled(), 1);
}

#[test]
fn confirmation_for_unknown_donation_is_discarded() {
    let h = harness();

    h.backend
        .payments()
        .confirm(PaymentConfirmation {
            donation_id: DonationId::from("don-999"),
            success: true,
            transaction_id: "txn-1".into(),
            error: None,
        })
        .unwrap();

    assert!(eventually(|| h.backend.payments().discarded() == 1));
    assert_eq!(h.backend.payments().settled(), 0);
    assert!(h.backend.repository().snapshot_donations().is_empty());
}

// === Notifications ===

#[test]
fn full_notification_queue_throttles_without_failing_the_request() {
    let mut config = fast_config();
    config.queues.notifications = 1;
    let h = harness_with(config, false);

    h.backend.submit_contact(contact("a@example.com")).unwrap();
    h.backend.submit_contact(contact("b@example.com")).unwrap();

    let notifier = h.backend.notifications().notifier();
    assert_eq!(notifier.queued(), 1);
    assert_eq!(h.backend.repository().snapshot_contacts().len(), 2);

    let job = NotificationJob {
        recipient: "c@example.com".into(),
        subject: "Hello".into(),
        body: "<p>hi</p>".into(),
        kind: JobKind::ContactReceived,
    };
    assert_eq!(notifier.send(job), Err(CoreError::Throttled("notification")));
}

#[test]
fn delivery_is_retried_until_it_succeeds() {
    let h = harness();
    h.mail.fail_next(2);

    h.backend.submit_contact(contact("sam@example.com")).unwrap();

    assert!(eventually(|| h.backend.notifications().delivered() == 1));
    assert_eq!(h.mail.attempts(), 3);
    assert_eq!(h.backend.notifications().dropped(), 0);
    let mails = h.mail.sent_to("sam@example.com");
    assert_eq!(mails.len(), 1);
    assert!(mails[0].body.contains("Volunteering"));
}

#[test]
fn delivery_is_dropped_after_the_last_attempt() {
    let h = harness();
    h.mail.fail_next(3);

    h.backend.submit_contact(contact("sam@example.com")).unwrap();

    assert!(eventually(|| h.backend.notifications().dropped() == 1));
    assert_eq!(h.mail.attempts(), 3);
    assert!(h.mail.sent().is_empty());
}

#[test]
fn simulated_failure_never_reaches_the_transport() {
    let h = harness();
    h.backend.notifications().set_simulate_failure(true);

    h.backend.submit_contact(contact("sam@example.com")).unwrap();

    assert!(eventually(|| h.backend.notifications().dropped() == 1));
    assert_eq!(h.mail.attempts(), 0);

    h.backend.notifications().set_simulate_failure(false);
    h.backend.submit_contact(contact("sam@example.com")).unwrap();
    assert!(eventually(|| h.backend.notifications().delivered() == 1));
}

#[test]
fn adoption_inquiry_is_acknowledged_and_mirrored() {
    let h = harness();

    let inquiry = h
        .backend
        .create_inquiry(InquiryRequest {
            pet_id: "pet-001".into(),
            adopter_name: "Alex".into(),
            email: "alex@example.com".into(),
            phone: "555-0100".into(),
            message: "Is Max good with kids?".into(),
        })
        .unwrap();

    assert!(eventually(|| h.mail.sent_to("alex@example.com").len() == 1));
    let mail = &h.mail.sent_to("alex@example.com")[0];
    assert!(mail.subject.contains("Adoption Inquiry"));
    assert!(mail.body.contains("Alex"));
    assert!(eventually(|| h.mirror.get(Collection::Inquiries, inquiry.id.as_str()).is_some()));
}

// === Mirror ===

#[test]
fn seed_pets_are_pushed_to_an_empty_mirror() {
    let h = harness();

    assert_eq!(h.backend.hydration().pets_pushed, 3);
    assert_eq!(h.backend.hydration().pets_loaded, 0);
    assert_eq!(h.mirror.len(Collection::Pets), 3);
}

#[test]
fn mirrored_pets_replace_the_seed() {
    let source = Repository::new(Arc::new(SystemClock));
    let rex = source.insert_pet(NewPet::new("Rex", "Dog", "Boxer", 4, PetStatus::Available));
    let mirror = Arc::new(MemoryMirror::new());
    mirror.preload(Collection::Pets, rex.id.as_str(), &rex).unwrap();
    mirror
        .preload(Collection::Pets, "broken", &serde_json::json!({ "name": 1 }))
        .unwrap();

    let backend = Backend::start(
        fast_config(),
        Arc::new(MemoryTransport::new()),
        mirror.clone(),
        Arc::new(SystemClock),
    )
    .unwrap();

    assert_eq!(backend.hydration().pets_loaded, 1);
    assert_eq!(backend.hydration().skipped, 1);
    let pets = backend.repository().snapshot_pets();
    assert_eq!(pets.len(), 1);
    assert_eq!(pets[0].name, "Rex");

    // New IDs continue after the highest loaded one.
    let next = backend
        .add_pet(NewPet::new("Bo", "Dog", "Pug", 2, PetStatus::Available))
        .unwrap();
    assert_eq!(next.id, PetId::from_seq(2));
}

#[test]
fn pet_writes_reach_the_mirror_in_order() {
    let h = harness();

    let pet = h
        .backend
        .add_pet(NewPet::new("Rex", "Dog", "Boxer", 4, PetStatus::Available))
        .unwrap();
    h.backend
        .update_pet(&pet.id, &PetUpdate::status(PetStatus::Adopted))
        .unwrap();
    assert!(eventually(|| {
        h.mirror
            .get(Collection::Pets, pet.id.as_str())
            .is_some_and(|record| record["status"] == "Adopted")
    }));

    h.backend.delete_pet(&pet.id).unwrap();
    assert!(eventually(|| h.mirror.get(Collection::Pets, pet.id.as_str()).is_none()));
    assert_eq!(h.backend.delete_pet(&pet.id), Err(CoreError::NotFound));
}

#[test]
fn mirror_failures_do_not_fail_writes() {
    let h = harness();
    h.mirror.set_failing(true);

    let pet = h
        .backend
        .add_pet(NewPet::new("Rex", "Dog", "Boxer", 4, PetStatus::Available))
        .unwrap();

    assert!(h.backend.repository().find_pet(&pet.id).is_some());
    assert!(eventually(|| h.backend.mirror().failed() >= 1));
}

// === Shutdown ===

#[test]
fn shutdown_drains_every_queue() {
    let mut h = harness();

    let ids: Vec<_> = (1..=10)
        .map(|i| {
            h.backend
                .process_donation(donation(Decimal::from(i), true))
                .unwrap()
                .donation_id
        })
        .collect();
    h.backend.shutdown();

    for id in &ids {
        assert_eq!(status_of(&h.backend, id), Some(DonationStatus::Completed));
    }
    assert_eq!(h.mail.sent_to("jane@example.com").len(), 10);
    assert_eq!(h.backend.payments().settled(), 10);
}

#[test]
fn stopped_backend_rejects_donations() {
    let mut h = harness();
    h.backend.shutdown();
    h.backend.shutdown();

    let result = h.backend.process_donation(donation(dec!(5), false));
    assert_eq!(result.unwrap_err(), CoreError::ShutDown);
    let recorded = h.backend.repository().snapshot_donations();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].status, DonationStatus::Failed);
}
