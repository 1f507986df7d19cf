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

//! Email notification pipeline.
//!
//! Request handlers hold a [`Notifier`] and enqueue jobs without waiting. A
//! single worker owned by the [`NotificationPipeline`] delivers them in
//! submission order through a [`MailTransport`], retrying with a linear
//! backoff. A job that fails every attempt is dropped and logged; nothing is
//! reported back to the producer, which has usually already answered its own
//! caller.

use crate::config::RetryPolicy;
use crate::error::{RenderError, TransportError};
use crate::queue::{self, JobQueue, Worker};
use crate::templates::{self, Template};
use crate::CoreError;
use crossbeam::channel::Receiver;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;

/// What a notification is about. Only used for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    Verification,
    Welcome,
    Receipt,
    InquiryReceived,
    ContactReceived,
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobKind::Verification => "verification",
            JobKind::Welcome => "welcome",
            JobKind::Receipt => "receipt",
            JobKind::InquiryReceived => "inquiry",
            JobKind::ContactReceived => "contact",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationJob {
    pub recipient: String,
    pub subject: String,
    pub body: String,
    pub kind: JobKind,
}

impl NotificationJob {
    /// Builds a job whose subject and body come from `template`.
    ///
    /// # Errors
    ///
    /// [`RenderError`] if `fields` is missing a placeholder of the template.
    pub fn from_template(
        kind: JobKind,
        recipient: &str,
        template: Template,
        fields: &BTreeMap<&str, String>,
    ) -> Result<Self, RenderError> {
        Ok(Self {
            recipient: recipient.to_string(),
            subject: template.subject().to_string(),
            body: templates::render(template, fields)?,
            kind,
        })
    }
}

/// Outbound mail boundary.
pub trait MailTransport: Send + Sync {
    fn send(&self, to: &str, subject: &str, html_body: &str) -> Result<(), TransportError>;
}

/// Transport that only writes a log line per message.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogTransport;

impl MailTransport for LogTransport {
    fn send(&self, to: &str, subject: &str, html_body: &str) -> Result<(), TransportError> {
        tracing::info!(to, subject, bytes = html_body.len(), "email sent");
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Transport that keeps every message in memory.
///
/// `fail_next(n)` makes the next `n` sends fail, for exercising retries.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    sent: Mutex<Vec<SentMail>>,
    failures_left: Mutex<u32>,
    attempts: AtomicU64,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next(&self, sends: u32) {
        *self.failures_left.lock() = sends;
    }

    pub fn sent(&self) -> Vec<SentMail> {
        self.sent.lock().clone()
    }

    pub fn sent_to(&self, recipient: &str) -> Vec<SentMail> {
        self.sent
            .lock()
            .iter()
            .filter(|mail| mail.to == recipient)
            .cloned()
            .collect()
    }

    /// Number of calls to `send`, successful or not.
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl MailTransport for MemoryTransport {
    fn send(&self, to: &str, subject: &str, html_body: &str) -> Result<(), TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        {
            let mut failures_left = self.failures_left.lock();
            if *failures_left > 0 {
                *failures_left -= 1;
                return Err(TransportError::new("injected failure"));
            }
        }
        self.sent.lock().push(SentMail {
            to: to.to_string(),
            subject: subject.to_string(),
            body: html_body.to_string(),
        });
        Ok(())
    }
}

/// Producer handle onto the notification queue.
#[derive(Debug, Clone)]
pub struct Notifier {
    queue: JobQueue<NotificationJob>,
}

impl Notifier {
    /// Enqueues a job without waiting.
    ///
    /// # Errors
    ///
    /// [`CoreError::Throttled`] when the queue is full, [`CoreError::ShutDown`]
    /// once the pipeline has stopped.
    pub fn send(&self, job: NotificationJob) -> Result<(), CoreError> {
        self.queue.try_submit(job)
    }

    /// Enqueues a job, logging instead of failing when the queue refuses it.
    pub fn notify(&self, job: NotificationJob) {
        let (kind, recipient) = (job.kind, job.recipient.clone());
        if let Err(err) = self.send(job) {
            tracing::warn!(%kind, recipient, "notification not queued: {err}");
        }
    }

    /// Renders `template` and enqueues the result without waiting.
    ///
    /// # Errors
    ///
    /// [`CoreError::Render`] if `fields` does not fill the template, otherwise
    /// as [`Notifier::send`].
    pub fn send_template(
        &self,
        kind: JobKind,
        recipient: &str,
        template: Template,
        fields: &BTreeMap<&str, String>,
    ) -> Result<(), CoreError> {
        let job = NotificationJob::from_template(kind, recipient, template, fields)?;
        self.send(job)
    }

    /// Like [`Notifier::send_template`], but logs instead of failing.
    pub fn notify_template(
        &self,
        kind: JobKind,
        recipient: &str,
        template: Template,
        fields: &BTreeMap<&str, String>,
    ) {
        match self.send_template(kind, recipient, template, fields) {
            Ok(()) => {}
            Err(err @ CoreError::Render(_)) => {
                tracing::error!(%kind, recipient, "email not rendered: {err}")
            }
            Err(err) => tracing::warn!(%kind, recipient, "notification not queued: {err}"),
        }
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub(crate) fn close(&self) {
        self.queue.close();
    }
}

struct Delivery {
    transport: Arc<dyn MailTransport>,
    policy: RetryPolicy,
    simulate_failure: AtomicBool,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

impl Delivery {
    fn attempt(&self, job: &NotificationJob) -> Result<(), TransportError> {
        if job.recipient.trim().is_empty() {
            return Err(TransportError::new("recipient is empty"));
        }
        if job.subject.trim().is_empty() {
            return Err(TransportError::new("subject is empty"));
        }
        if self.simulate_failure.load(Ordering::SeqCst) {
            return Err(TransportError::new("simulated delivery failure"));
        }
        self.transport.send(&job.recipient, &job.subject, &job.body)
    }

    fn deliver(&self, job: NotificationJob) {
        let max_attempts = self.policy.max_attempts.max(1);
        for attempt in 1..=max_attempts {
            match self.attempt(&job) {
                Ok(()) => {
                    self.delivered.fetch_add(1, Ordering::SeqCst);
                    tracing::info!(kind = %job.kind, recipient = job.recipient, attempt, "notification delivered");
                    return;
                }
                Err(err) => {
                    tracing::warn!(kind = %job.kind, recipient = job.recipient, attempt, "delivery failed: {err}");
                    if attempt < max_attempts {
                        thread::sleep(self.policy.delay_after(attempt));
                    }
                }
            }
        }
        self.dropped.fetch_add(1, Ordering::SeqCst);
        tracing::error!(
            kind = %job.kind,
            recipient = job.recipient,
            attempts = max_attempts,
            "notification dropped after exhausting retries"
        );
    }
}

/// Bounded notification queue plus its single delivery worker.
pub struct NotificationPipeline {
    notifier: Notifier,
    jobs: Option<Receiver<NotificationJob>>,
    worker: Option<Worker>,
    delivery: Arc<Delivery>,
}

impl NotificationPipeline {
    /// Creates the queue. Jobs accumulate until [`start`](Self::start) is called.
    pub fn new(capacity: usize, policy: RetryPolicy, transport: Arc<dyn MailTransport>) -> Self {
        let (queue, jobs) = queue::bounded("notification", capacity);
        Self {
            notifier: Notifier { queue },
            jobs: Some(jobs),
            worker: None,
            delivery: Arc::new(Delivery {
                transport,
                policy,
                simulate_failure: AtomicBool::new(false),
                delivered: AtomicU64::new(0),
                dropped: AtomicU64::new(0),
            }),
        }
    }

    /// Spawns the delivery worker. Calling it again is a no-op.
    ///
    /// # Errors
    ///
    /// [`CoreError::ShutDown`] if the worker thread cannot be spawned.
    pub fn start(&mut self) -> Result<(), CoreError> {
        let Some(jobs) = self.jobs.take() else {
            return Ok(());
        };
        let delivery = Arc::clone(&self.delivery);
        self.worker = Some(Worker::spawn("notification-worker", jobs, move |job| {
            delivery.deliver(job)
        })?);
        Ok(())
    }

    pub fn notifier(&self) -> Notifier {
        self.notifier.clone()
    }

    /// Fault injection: while set, every delivery attempt fails.
    pub fn set_simulate_failure(&self, fail: bool) {
        self.delivery.simulate_failure.store(fail, Ordering::SeqCst);
    }

    pub fn delivered(&self) -> u64 {
        self.delivery.delivered.load(Ordering::SeqCst)
    }

    /// Jobs given up on after the last retry.
    pub fn dropped(&self) -> u64 {
        self.delivery.dropped.load(Ordering::SeqCst)
    }

    /// Rejects new jobs, delivers the ones already queued and joins the worker.
    pub fn stop(&mut self) {
        self.notifier.close();
        if let Some(worker) = self.worker.take() {
            worker.stop();
        }
    }
}

impl Drop for NotificationPipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn job(recipient: &str, subject: &str) -> NotificationJob {
        NotificationJob {
            recipient: recipient.into(),
            subject: subject.into(),
            body: "<p>hi</p>".into(),
            kind: JobKind::ContactReceived,
        }
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            backoff_step: Duration::from_millis(1),
        }
    }

    #[test]
    fn retries_until_transport_recovers() {
        let transport = Arc::new(MemoryTransport::new());
        transport.fail_next(2);
        let mut pipeline = NotificationPipeline::new(8, fast_policy(), transport.clone());
        pipeline.start().unwrap();
        pipeline.notifier().send(job("a@example.com", "Hello")).unwrap();
        pipeline.stop();

        assert_eq!(transport.attempts(), 3);
        assert_eq!(transport.sent_to("a@example.com").len(), 1);
        assert_eq!(pipeline.delivered(), 1);
        assert_eq!(pipeline.dropped(), 0);
    }

    #[test]
    fn empty_recipient_or_subject_is_dropped_without_calling_transport() {
        let transport = Arc::new(MemoryTransport::new());
        let mut pipeline = NotificationPipeline::new(8, fast_policy(), transport.clone());
        pipeline.start().unwrap();
        let notifier = pipeline.notifier();
        notifier.send(job("", "Hello")).unwrap();
        notifier.send(job("a@example.com", "")).unwrap();
        pipeline.stop();

        assert_eq!(transport.attempts(), 0);
        assert_eq!(pipeline.dropped(), 2);
    }

    #[test]
    fn simulated_failure_exhausts_attempts() {
        let transport = Arc::new(MemoryTransport::new());
        let mut pipeline = NotificationPipeline::new(8, fast_policy(), transport.clone());
        pipeline.set_simulate_failure(true);
        pipeline.start().unwrap();
        pipeline.notifier().send(job("a@example.com", "Hello")).unwrap();
        pipeline.stop();

        assert!(transport.sent().is_empty());
        assert_eq!(pipeline.dropped(), 1);
    }

    #[test]
    fn unstarted_pipeline_throttles_at_capacity() {
        let transport = Arc::new(MemoryTransport::new());
        let pipeline = NotificationPipeline::new(2, fast_policy(), transport);
        let notifier = pipeline.notifier();
        notifier.send(job("a@example.com", "1")).unwrap();
        notifier.send(job("a@example.com", "2")).unwrap();
        assert_eq!(
            notifier.send(job("a@example.com", "3")),
            Err(CoreError::Throttled("notification"))
        );
        assert_eq!(notifier.queued(), 2);
    }

    #[test]
    fn unfilled_template_is_rejected_before_queueing() {
        let pipeline = NotificationPipeline::new(2, fast_policy(), Arc::new(MemoryTransport::new()));
        let notifier = pipeline.notifier();
        let fields = BTreeMap::from([("Username", "ada".to_string())]);
        assert_eq!(
            notifier.send_template(JobKind::Verification, "a@example.com", Template::Verification, &fields),
            Err(CoreError::Render(RenderError::UnknownField {
                template: "verification",
                field: "Code".into(),
            }))
        );
        assert_eq!(notifier.queued(), 0);

        let fields = BTreeMap::from([("Username", "ada".to_string()), ("Code", "123456".to_string())]);
        notifier
            .send_template(JobKind::Verification, "a@example.com", Template::Verification, &fields)
            .unwrap();
        assert_eq!(notifier.queued(), 1);
    }

    #[test]
    fn stopped_pipeline_rejects_jobs() {
        let mut pipeline =
            NotificationPipeline::new(2, fast_policy(), Arc::new(MemoryTransport::new()));
        pipeline.start().unwrap();
        let notifier = pipeline.notifier();
        pipeline.stop();
        assert_eq!(notifier.send(job("a@example.com", "late")), Err(CoreError::ShutDown));
    }
}
