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

//! Deadlock detection tests using parking_lot's built-in deadlock detector.
//!
//! These tests drive the repository, the auth service and every pipeline
//! from many threads at once and fail if the lock graph ever forms a cycle.
//!
//! The crate's locks are parking_lot mutexes; the `deadlock_detection`
//! feature is enabled for tests so cycles are reported with backtraces.

use pawtner_core::{
    Backend, DonationRequest, InquiryRequest, MemoryMirror, MemoryTransport, NewPet, PetFilter,
    PetId, PetQuery, PetStatus, PetUpdate, Repository, RetryPolicy, ServiceConfig, SystemClock,
};
use parking_lot::deadlock;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::thread;
use std::time::Duration;

/// Starts a background thread that checks for deadlocks every 100ms.
/// Returns a handle to stop the detector.
fn start_deadlock_detector() -> Arc<AtomicBool> {
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = running.clone();

    thread::spawn(move || {
        while running_clone.load(Ordering::SeqCst) {
            thread::sleep(Duration::from_millis(100));
            let deadlocks = deadlock::check_deadlock();
            if !deadlocks.is_empty() {
                eprintln!("\n=== DEADLOCK DETECTED ===");
                for (i, threads) in deadlocks.iter().enumerate() {
                    eprintln!("\nDeadlock #{}", i + 1);
                    for t in threads {
                        eprintln!("Thread ID: {:?}", t.thread_id());
                        eprintln!("Backtrace:\n{:#?}", t.backtrace());
                    }
                }
                panic!("Deadlock detected! See output above for details.");
            }
        }
    });

    running
}

/// Stops the deadlock detector.
fn stop_deadlock_detector(running: Arc<AtomicBool>) {
    running.store(false, Ordering::SeqCst);
    thread::sleep(Duration::from_millis(150)); // Let detector thread exit
}

fn backend() -> (Backend, Arc<MemoryTransport>) {
    let mut config = ServiceConfig::default();
    config.notifications = RetryPolicy {
        max_attempts: 2,
        backoff_step: Duration::from_millis(1),
    };
    config.payments.settlement_latency = Duration::from_millis(1);
    config.queues.notifications = 10_000;
    config.queues.donations = 10_000;
    config.queues.mirror = 10_000;
    let mail = Arc::new(MemoryTransport::new());
    let backend = Backend::start(
        config,
        mail.clone(),
        Arc::new(MemoryMirror::new()),
        Arc::new(SystemClock),
    )
    .unwrap();
    (backend, mail)
}

fn donation(i: u32) -> DonationRequest {
    DonationRequest {
        donor_name: format!("Donor {i}"),
        donor_email: format!("donor{i}@example.com"),
        amount: Decimal::from(i + 1),
        payment_method: "UPI".into(),
        payment_via_deeplink: i % 2 == 0,
    }
}

// =============================================================================
// Repository
// =============================================================================

/// Writers and readers hammer the same few pets.
#[test]
fn no_deadlock_repository_mixed_access() {
    let detector = start_deadlock_detector();
    let repo = Arc::new(Repository::seeded(Arc::new(SystemClock)));

    let handles: Vec<_> = (0..16)
        .map(|t| {
            let repo = Arc::clone(&repo);
            thread::spawn(move || {
                for i in 0..500 {
                    match (t + i) % 5 {
                        0 => {
                            repo.insert_pet(NewPet::new("Pup", "Dog", "Pug", 1, PetStatus::Available));
                        }
                        1 => {
                            let id = PetId::from_seq((i % 10 + 1) as u64);
                            let _ = repo.update_pet(&id, &PetUpdate::status(PetStatus::ALL[i % 3]));
                        }
                        2 => {
                            let id = PetId::from_seq((i % 20 + 1) as u64);
                            let _ = repo.delete_pet(&id);
                        }
                        3 => {
                            let _ = repo.statistics();
                        }
                        _ => {
                            let _ = repo.snapshot_pets();
                            let _ = repo.status_counts();
                        }
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("thread panicked");
    }

    let counts = repo.status_counts();
    assert_eq!(counts.values().sum::<usize>(), repo.pet_count());

    stop_deadlock_detector(detector);
}

// =============================================================================
// Full backend
// =============================================================================

/// Request threads run every operation while the pipelines settle donations,
/// deliver mail and write the mirror.
#[test]
fn no_deadlock_backend_under_load() {
    let detector = start_deadlock_detector();
    let (backend, _mail) = backend();
    let backend = Arc::new(backend);
    let accepted = Arc::new(AtomicU32::new(0));

    let handles: Vec<_> = (0..12u32)
        .map(|t| {
            let backend = Arc::clone(&backend);
            let accepted = Arc::clone(&accepted);
            thread::spawn(move || {
                for i in 0..100u32 {
                    let n = t * 1_000 + i;
                    match n % 6 {
                        0 => {
                            if backend.process_donation(donation(n)).is_ok() {
                                accepted.fetch_add(1, Ordering::SeqCst);
                            }
                        }
                        1 => {
                            let email = format!("user{n}@example.com");
                            let auth = backend.auth();
                            auth.register(&email, "user", "pw").unwrap();
                            if let Some(code) = auth.pending_code(&email) {
                                auth.verify(&email, &code).unwrap();
                                let token = auth.login(&email, "pw").unwrap();
                                auth.validate(&token.token).unwrap();
                            }
                        }
                        2 => {
                            let _ = backend.add_pet(NewPet::new("Rex", "Dog", "Boxer", 4, PetStatus::Available));
                        }
                        3 => {
                            let id = PetId::from_seq(u64::from(n % 10 + 1));
                            let _ = backend.update_pet(&id, &PetUpdate::status(PetStatus::Adopted));
                        }
                        4 => {
                            let _ = backend.queries().search("o", &[PetFilter::Species("dog".into())]);
                            let _ = backend.queries().list(&PetQuery::default());
                        }
                        _ => {
                            let _ = backend.create_inquiry(InquiryRequest {
                                pet_id: PetId::from_seq(1).0,
                                adopter_name: "Alex".into(),
                                email: format!("alex{n}@example.com"),
                                phone: String::new(),
                                message: "Hello".into(),
                            });
                        }
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("thread panicked");
    }

    let mut backend = Arc::try_unwrap(backend).ok().expect("request threads still hold the backend");
    backend.shutdown();
    assert_eq!(
        backend.payments().settled(),
        u64::from(accepted.load(Ordering::SeqCst))
    );

    stop_deadlock_detector(detector);
}

/// Shutting down while producers are still submitting must not hang.
#[test]
fn no_deadlock_shutdown_during_submissions() {
    let detector = start_deadlock_detector();
    let (backend, _mail) = backend();
    let backend = Arc::new(parking_lot::Mutex::new(Some(backend)));
    let stop = Arc::new(AtomicBool::new(false));

    let producers: Vec<_> = (0..4u32)
        .map(|t| {
            let backend = Arc::clone(&backend);
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                let mut i = 0;
                while !stop.load(Ordering::SeqCst) {
                    if let Some(backend) = backend.lock().as_ref() {
                        let _ = backend.process_donation(donation(t * 10_000 + i));
                    }
                    i += 1;
                    thread::yield_now();
                }
            })
        })
        .collect();

    thread::sleep(Duration::from_millis(50));
    let taken = backend.lock().take();
    if let Some(mut backend) = taken {
        backend.shutdown();
    }
    stop.store(true, Ordering::SeqCst);
    for producer in producers {
        producer.join().expect("producer panicked");
    }

    stop_deadlock_detector(detector);
}
