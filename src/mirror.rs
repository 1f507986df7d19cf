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

//! Best-effort persistence mirror.
//!
//! The in-memory [`Repository`] is authoritative. Writes are copied to an
//! external store through the [`Mirror`] boundary by a single background
//! worker; a failed or timed-out copy is logged and never rolls back memory.
//! At startup [`hydrate`] pulls whatever the mirror holds back into memory.

use crate::config::MirrorConfig;
use crate::error::TransportError;
use crate::pet::PetRecord;
use crate::queue::{self, JobQueue, Worker};
use crate::repository::Repository;
use crate::CoreError;
use crossbeam::channel::Receiver;
use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Collection {
    Pets,
    Users,
    Donations,
    Inquiries,
}

impl Collection {
    pub fn name(&self) -> &'static str {
        match self {
            Collection::Pets => "pets",
            Collection::Users => "users",
            Collection::Donations => "donations",
            Collection::Inquiries => "adoption_inquiries",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// External store boundary. Every call is bounded by `timeout`.
pub trait Mirror: Send + Sync {
    fn upsert(
        &self,
        collection: Collection,
        key: &str,
        record: &Value,
        timeout: Duration,
    ) -> Result<(), TransportError>;

    fn delete(&self, collection: Collection, key: &str, timeout: Duration) -> Result<(), TransportError>;

    fn load_all(&self, collection: Collection, timeout: Duration) -> Result<Vec<Value>, TransportError>;
}

/// Mirror that stores nothing and loads nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullMirror;

impl Mirror for NullMirror {
    fn upsert(&self, _: Collection, _: &str, _: &Value, _: Duration) -> Result<(), TransportError> {
        Ok(())
    }

    fn delete(&self, _: Collection, _: &str, _: Duration) -> Result<(), TransportError> {
        Ok(())
    }

    fn load_all(&self, _: Collection, _: Duration) -> Result<Vec<Value>, TransportError> {
        Ok(Vec::new())
    }
}

/// In-process mirror keyed by collection and record key.
///
/// `set_failing` makes every call fail; `with_latency` makes every call take
/// that long, so a latency above the caller's timeout reports a timeout.
#[derive(Debug, Default)]
pub struct MemoryMirror {
    collections: Mutex<HashMap<Collection, BTreeMap<String, Value>>>,
    failing: AtomicBool,
    latency: Duration,
    calls: AtomicU64,
}

impl MemoryMirror {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            ..Self::default()
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Stores a record directly, bypassing latency and failure injection.
    pub fn preload<T: Serialize>(&self, collection: Collection, key: &str, record: &T) -> Result<(), TransportError> {
        let value = serde_json::to_value(record).map_err(|err| TransportError::new(err.to_string()))?;
        self.collections
            .lock()
            .entry(collection)
            .or_default()
            .insert(key.to_string(), value);
        Ok(())
    }

    pub fn get(&self, collection: Collection, key: &str) -> Option<Value> {
        self.collections
            .lock()
            .get(&collection)
            .and_then(|records| records.get(key).cloned())
    }

    pub fn len(&self, collection: Collection) -> usize {
        self.collections
            .lock()
            .get(&collection)
            .map_or(0, BTreeMap::len)
    }

    pub fn is_empty(&self, collection: Collection) -> bool {
        self.len(collection) == 0
    }

    /// Number of upsert, delete and load calls received.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    fn enter(&self, timeout: Duration) -> Result<(), TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            thread::sleep(self.latency.min(timeout));
            if self.latency > timeout {
                return Err(TransportError::new(format!("timed out after {timeout:?}")));
            }
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(TransportError::new("mirror unavailable"));
        }
        Ok(())
    }
}

impl Mirror for MemoryMirror {
    fn upsert(
        &self,
        collection: Collection,
        key: &str,
        record: &Value,
        timeout: Duration,
    ) -> Result<(), TransportError> {
        self.enter(timeout)?;
        self.collections
            .lock()
            .entry(collection)
            .or_default()
            .insert(key.to_string(), record.clone());
        Ok(())
    }

    fn delete(&self, collection: Collection, key: &str, timeout: Duration) -> Result<(), TransportError> {
        self.enter(timeout)?;
        if let Some(records) = self.collections.lock().get_mut(&collection) {
            records.remove(key);
        }
        Ok(())
    }

    fn load_all(&self, collection: Collection, timeout: Duration) -> Result<Vec<Value>, TransportError> {
        self.enter(timeout)?;
        Ok(self
            .collections
            .lock()
            .get(&collection)
            .map(|records| records.values().cloned().collect())
            .unwrap_or_default())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MirrorOp {
    Upsert {
        collection: Collection,
        key: String,
        record: Value,
    },
    Delete {
        collection: Collection,
        key: String,
    },
}

/// Fire-and-forget producer handle onto the mirror queue.
#[derive(Debug, Clone)]
pub struct MirrorHandle {
    queue: JobQueue<MirrorOp>,
}

impl MirrorHandle {
    pub fn upsert<T: Serialize>(&self, collection: Collection, key: &str, record: &T) {
        let record = match serde_json::to_value(record) {
            Ok(record) => record,
            Err(err) => {
                tracing::error!(%collection, key, "record not mirrored: {err}");
                return;
            }
        };
        self.submit(MirrorOp::Upsert {
            collection,
            key: key.to_string(),
            record,
        });
    }

    pub fn delete(&self, collection: Collection, key: &str) {
        self.submit(MirrorOp::Delete {
            collection,
            key: key.to_string(),
        });
    }

    fn submit(&self, op: MirrorOp) {
        if let Err(err) = self.queue.try_submit(op) {
            tracing::warn!("mirror write skipped: {err}");
        }
    }

    pub(crate) fn close(&self) {
        self.queue.close();
    }
}

struct Applier {
    mirror: Arc<dyn Mirror>,
    call_timeout: Duration,
    applied: AtomicU64,
    failed: AtomicU64,
}

impl Applier {
    fn apply(&self, op: MirrorOp) {
        let result = match &op {
            MirrorOp::Upsert {
                collection,
                key,
                record,
            } => self.mirror.upsert(*collection, key, record, self.call_timeout),
            MirrorOp::Delete { collection, key } => {
                self.mirror.delete(*collection, key, self.call_timeout)
            }
        };
        match result {
            Ok(()) => {
                self.applied.fetch_add(1, Ordering::SeqCst);
            }
            Err(err) => {
                self.failed.fetch_add(1, Ordering::SeqCst);
                tracing::error!(?op, "mirror write failed: {err}");
            }
        }
    }
}

/// Bounded mirror queue plus the worker that applies it.
pub struct MirrorPipeline {
    handle: MirrorHandle,
    ops: Option<Receiver<MirrorOp>>,
    worker: Option<Worker>,
    applier: Arc<Applier>,
}

impl MirrorPipeline {
    pub fn new(capacity: usize, mirror: Arc<dyn Mirror>, call_timeout: Duration) -> Self {
        let (queue, ops) = queue::bounded("mirror", capacity);
        Self {
            handle: MirrorHandle { queue },
            ops: Some(ops),
            worker: None,
            applier: Arc::new(Applier {
                mirror,
                call_timeout,
                applied: AtomicU64::new(0),
                failed: AtomicU64::new(0),
            }),
        }
    }

    /// Spawns the mirror worker. Calling it again is a no-op.
    ///
    /// # Errors
    ///
    /// [`CoreError::ShutDown`] if the worker thread cannot be spawned.
    pub fn start(&mut self) -> Result<(), CoreError> {
        let Some(ops) = self.ops.take() else {
            return Ok(());
        };
        let applier = Arc::clone(&self.applier);
        self.worker = Some(Worker::spawn("mirror-worker", ops, move |op| applier.apply(op))?);
        Ok(())
    }

    pub fn handle(&self) -> MirrorHandle {
        self.handle.clone()
    }

    pub fn applied(&self) -> u64 {
        self.applier.applied.load(Ordering::SeqCst)
    }

    pub fn failed(&self) -> u64 {
        self.applier.failed.load(Ordering::SeqCst)
    }

    pub fn stop(&mut self) {
        self.handle.close();
        if let Some(worker) = self.worker.take() {
            worker.stop();
        }
    }
}

impl Drop for MirrorPipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

/// What [`hydrate`] did with each collection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HydrationReport {
    pub pets_loaded: usize,
    /// Seed pets written to an empty mirror.
    pub pets_pushed: usize,
    pub users_loaded: usize,
    pub donations_loaded: usize,
    pub inquiries_loaded: usize,
    /// Records that did not deserialize.
    pub skipped: usize,
}

fn decode<T: DeserializeOwned>(values: Vec<Value>, collection: Collection, skipped: &mut usize) -> Vec<T> {
    values
        .into_iter()
        .filter_map(|value| match serde_json::from_value(value) {
            Ok(record) => Some(record),
            Err(err) => {
                *skipped += 1;
                tracing::warn!(%collection, "skipping unreadable record: {err}");
                None
            }
        })
        .collect()
}

fn load<T: DeserializeOwned>(
    mirror: &dyn Mirror,
    collection: Collection,
    timeout: Duration,
    skipped: &mut usize,
) -> Vec<T> {
    match mirror.load_all(collection, timeout) {
        Ok(values) => decode(values, collection, skipped),
        Err(err) => {
            tracing::error!(%collection, "load failed, keeping in-memory data: {err}");
            Vec::new()
        }
    }
}

/// Loads mirrored data into `repo`.
///
/// A non-empty pet collection replaces the in-memory pets; an empty one gets
/// the in-memory pets pushed to it. Users, donations and inquiries replace
/// memory only when the mirror has some. Load failures leave memory as is.
pub fn hydrate(repo: &Repository, mirror: &dyn Mirror, config: &MirrorConfig) -> HydrationReport {
    let mut report = HydrationReport::default();
    let mut skipped = 0;

    match mirror.load_all(Collection::Pets, config.load_timeout) {
        Ok(values) if values.is_empty() => {
            for pet in repo.snapshot_pets() {
                push_pet(mirror, &pet, config.call_timeout, &mut report);
            }
        }
        Ok(values) => {
            let pets: Vec<PetRecord> = decode(values, Collection::Pets, &mut skipped);
            if !pets.is_empty() {
                report.pets_loaded = pets.len();
                repo.replace_pets(pets);
            }
        }
        Err(err) => tracing::error!(collection = %Collection::Pets, "load failed, keeping seed data: {err}"),
    }

    let users = load(mirror, Collection::Users, config.load_timeout, &mut skipped);
    if !users.is_empty() {
        report.users_loaded = users.len();
        repo.replace_users(users);
    }
    let donations = load(mirror, Collection::Donations, config.load_timeout, &mut skipped);
    if !donations.is_empty() {
        report.donations_loaded = donations.len();
        repo.replace_donations(donations);
    }
    let inquiries = load(mirror, Collection::Inquiries, config.load_timeout, &mut skipped);
    if !inquiries.is_empty() {
        report.inquiries_loaded = inquiries.len();
        repo.replace_inquiries(inquiries);
    }

    report.skipped = skipped;
    tracing::info!(?report, "hydration finished");
    report
}

fn push_pet(mirror: &dyn Mirror, pet: &PetRecord, timeout: Duration, report: &mut HydrationReport) {
    let value = match serde_json::to_value(pet) {
        Ok(value) => value,
        Err(err) => {
            tracing::error!(pet_id = %pet.id, "seed pet not serialized: {err}");
            return;
        }
    };
    match mirror.upsert(Collection::Pets, pet.id.as_str(), &value, timeout) {
        Ok(()) => report.pets_pushed += 1,
        Err(err) => tracing::error!(pet_id = %pet.id, "seed pet not mirrored: {err}"),
    }
}
