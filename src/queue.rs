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

//! Bounded job queues and the workers that drain them.
//!
//! A [`JobQueue`] is the producer side of a bounded
//! [`crossbeam::channel`]. Each queue has exactly one consumer, a [`Worker`]
//! thread, so jobs are handled in submission order.
//!
//! # Shutdown
//!
//! [`JobQueue::close`] makes later submissions fail with
//! [`CoreError::ShutDown`]. It waits for submissions already in flight, so once
//! it returns every accepted job is in the channel. [`Worker::stop`] then
//! signals cancellation: the worker handles whatever is already queued and
//! exits, and `stop` joins it.

use crate::CoreError;
use crossbeam::channel::{self, Receiver, Sender, TryRecvError, TrySendError};
use parking_lot::RwLock;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Producer handle for a bounded queue. Cheap to clone.
#[derive(Debug)]
pub struct JobQueue<T> {
    name: &'static str,
    tx: Sender<T>,
    /// Submissions hold the read side across the send; `close` takes the write side.
    closed: Arc<RwLock<bool>>,
}

impl<T> Clone for JobQueue<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            tx: self.tx.clone(),
            closed: Arc::clone(&self.closed),
        }
    }
}

/// Creates a queue holding at most `capacity` jobs, returning its consumer end.
pub fn bounded<T>(name: &'static str, capacity: usize) -> (JobQueue<T>, Receiver<T>) {
    let (tx, rx) = channel::bounded(capacity);
    let queue = JobQueue {
        name,
        tx,
        closed: Arc::new(RwLock::new(false)),
    };
    (queue, rx)
}

impl<T> JobQueue<T> {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Enqueues without waiting.
    ///
    /// # Errors
    ///
    /// - [`CoreError::Throttled`] if the queue is at capacity.
    /// - [`CoreError::ShutDown`] if the queue was closed.
    pub fn try_submit(&self, job: T) -> Result<(), CoreError> {
        let closed = self.closed.read();
        if *closed {
            return Err(CoreError::ShutDown);
        }
        self.tx.try_send(job).map_err(|err| match err {
            TrySendError::Full(_) => CoreError::Throttled(self.name),
            TrySendError::Disconnected(_) => CoreError::ShutDown,
        })
    }

    /// Enqueues, waiting for room if the queue is full.
    ///
    /// # Errors
    ///
    /// [`CoreError::ShutDown`] if the queue was closed or its consumer is gone.
    pub fn submit(&self, job: T) -> Result<(), CoreError> {
        let closed = self.closed.read();
        if *closed {
            return Err(CoreError::ShutDown);
        }
        self.tx.send(job).map_err(|_| CoreError::ShutDown)
    }

    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }

    pub fn capacity(&self) -> Option<usize> {
        self.tx.capacity()
    }

    /// Rejects further submissions. Blocks until in-flight submissions finish,
    /// so a blocking [`JobQueue::submit`] must have a running consumer.
    pub fn close(&self) {
        *self.closed.write() = true;
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.read()
    }
}

/// A named consumer thread with a cancellation signal.
#[derive(Debug)]
pub struct Worker {
    name: &'static str,
    cancel: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    /// Spawns a thread that hands every job from `jobs` to `handler` until the
    /// queue disconnects or the worker is stopped.
    ///
    /// # Errors
    ///
    /// [`CoreError::ShutDown`] if the OS refuses to spawn the thread.
    pub fn spawn<T, F>(name: &'static str, jobs: Receiver<T>, mut handler: F) -> Result<Self, CoreError>
    where
        T: Send + 'static,
        F: FnMut(T) + Send + 'static,
    {
        let (cancel_tx, cancel_rx) = channel::bounded::<()>(0);
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                tracing::debug!(worker = name, "worker started");
                loop {
                    channel::select! {
                        recv(jobs) -> job => match job {
                            Ok(job) => handler(job),
                            Err(_) => break,
                        },
                        recv(cancel_rx) -> _ => {
                            loop {
                                match jobs.try_recv() {
                                    Ok(job) => handler(job),
                                    Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
                                }
                            }
                            break;
                        }
                    }
                }
                tracing::debug!(worker = name, "worker stopped");
            })
            .map_err(|err| {
                tracing::error!(worker = name, "failed to spawn worker: {err}");
                CoreError::ShutDown
            })?;

        Ok(Self {
            name,
            cancel: Some(cancel_tx),
            handle: Some(handle),
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Signals cancellation, lets the worker drain its queue, and waits for it.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        // Dropping the sender disconnects the cancel channel, which wakes the select.
        self.cancel.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!(worker = self.name, "worker panicked");
            }
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn try_submit_reports_full_queue() {
        let (queue, _rx) = bounded::<u32>("test", 2);
        queue.try_submit(1).unwrap();
        queue.try_submit(2).unwrap();
        assert_eq!(queue.try_submit(3), Err(CoreError::Throttled("test")));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn closed_queue_rejects_work() {
        let (queue, _rx) = bounded::<u32>("test", 2);
        queue.close();
        assert_eq!(queue.try_submit(1), Err(CoreError::ShutDown));
        assert_eq!(queue.submit(1), Err(CoreError::ShutDown));
    }

    #[test]
    fn every_accepted_job_is_handled_when_closing_under_load() {
        use std::sync::atomic::{AtomicU64, Ordering};

        for _ in 0..20 {
            let (queue, rx) = bounded::<u32>("test", 1024);
            let handled = Arc::new(AtomicU64::new(0));
            let sink = Arc::clone(&handled);
            let worker = Worker::spawn("test-worker", rx, move |_| {
                sink.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

            let producers: Vec<_> = (0..4)
                .map(|_| {
                    let queue = queue.clone();
                    thread::spawn(move || {
                        let mut accepted = 0u64;
                        for i in 0..500 {
                            match queue.try_submit(i) {
                                Ok(()) => accepted += 1,
                                Err(CoreError::ShutDown) => break,
                                Err(_) => thread::yield_now(),
                            }
                        }
                        accepted
                    })
                })
                .collect();

            thread::yield_now();
            queue.close();
            worker.stop();
            let accepted: u64 = producers.into_iter().map(|p| p.join().unwrap()).sum();
            assert_eq!(handled.load(Ordering::SeqCst), accepted);
        }
    }

    #[test]
    fn stop_drains_queued_jobs_in_order() {
        let (queue, rx) = bounded::<u32>("test", 16);
        for i in 0..10 {
            queue.try_submit(i).unwrap();
        }
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let worker = Worker::spawn("test-worker", rx, move |job| sink.lock().push(job)).unwrap();
        worker.stop();
        assert_eq!(*seen.lock(), (0..10).collect::<Vec<_>>());
    }
}
