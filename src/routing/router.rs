//! Single-scan message router.
//!
//! Many logical instances share one physical mailbox. Instead of letting each
//! of them scan the folder, the router scans once per cycle and hands every
//! message to the first registered consumer whose evaluator accepts it:
//!
//! 1. `process_cycle()`: fetch, sort by received time, assign, publish
//! 2. `messages(id)`: each consumer reads its own queue, from any thread
//!
//! Queues are rebuilt off to the side and published in one swap, so a reader
//! never sees a half-built cycle.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, RwLock};

use tracing::{debug, error, info, warn};

use crate::error::RoutingError;
use crate::mail::{IncomingMessage, MailFolder};

/// Identifier handed out by [`MessageRouter::register`].
pub type ConsumerId = u32;

/// First identifier handed out; later ones count up from here.
pub const FIRST_CONSUMER_ID: ConsumerId = 100;

/// A consumer's messages for the current cycle, oldest first.
pub type MessageQueue = Arc<[Arc<IncomingMessage>]>;

/// Decides whether a consumer owns a message.
pub trait MessageEvaluator: Send + Sync {
    fn evaluate(&self, message: &IncomingMessage) -> Result<bool, RoutingError>;
}

impl<F> MessageEvaluator for F
where
    F: Fn(&IncomingMessage) -> bool + Send + Sync,
{
    fn evaluate(&self, message: &IncomingMessage) -> Result<bool, RoutingError> {
        Ok(self(message))
    }
}

struct Registration {
    id: ConsumerId,
    evaluator: Arc<dyn MessageEvaluator>,
}

/// Outcome of one routing cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub fetched: usize,
    pub assigned: usize,
    pub unmatched: usize,
}

/// Fans one mailbox scan out to many consumers, first match wins.
pub struct MessageRouter {
    folder: Arc<dyn MailFolder>,
    registrations: RwLock<Vec<Registration>>,
    next_id: AtomicU32,
    queues: RwLock<Arc<HashMap<ConsumerId, MessageQueue>>>,
}

impl MessageRouter {
    pub fn new(folder: Arc<dyn MailFolder>) -> Self {
        Self {
            folder,
            registrations: RwLock::new(Vec::new()),
            next_id: AtomicU32::new(FIRST_CONSUMER_ID),
            queues: RwLock::new(Arc::new(HashMap::new())),
        }
    }

    /// The folder this router scans.
    pub fn folder(&self) -> &Arc<dyn MailFolder> {
        &self.folder
    }

    /// Register a consumer. Earlier registrations win ties.
    pub fn register(
        &self,
        evaluator: Arc<dyn MessageEvaluator>,
    ) -> Result<ConsumerId, RoutingError> {
        let mut registrations = self
            .registrations
            .write()
            .map_err(|_| RoutingError::Poisoned)?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        registrations.push(Registration { id, evaluator });

        // Publish an empty queue so the new consumer reads as registered.
        let mut queues = self.queues.write().map_err(|_| RoutingError::Poisoned)?;
        let mut next = HashMap::clone(&queues);
        next.insert(id, Arc::from(Vec::new()));
        *queues = Arc::new(next);

        debug!(consumer_id = id, "Registered consumer");
        Ok(id)
    }

    /// Number of registered consumers.
    pub fn consumer_count(&self) -> usize {
        self.registrations.read().map(|r| r.len()).unwrap_or(0)
    }

    /// Scan the folder once and rebuild every consumer's queue.
    ///
    /// Does nothing when no consumer is registered. A failed scan leaves the
    /// previous cycle's queues in place.
    pub fn process_cycle(&self) -> Result<CycleReport, RoutingError> {
        info!("Processing inbox for message router");

        let registrations = self
            .registrations
            .read()
            .map_err(|_| RoutingError::Poisoned)?;

        if registrations.is_empty() {
            info!("No consumers registered - skipping scan");
            return Ok(CycleReport::default());
        }

        let mut messages = self.folder.messages()?;
        messages.sort_by_key(|m| m.received_at);

        let mut assigned: HashMap<ConsumerId, Vec<Arc<IncomingMessage>>> = registrations
            .iter()
            .map(|r| (r.id, Vec::new()))
            .collect();

        let mut report = CycleReport {
            fetched: messages.len(),
            ..CycleReport::default()
        };

        for message in messages {
            match first_match(&registrations, &message) {
                Some(id) => {
                    info!(
                        consumer_id = id,
                        subject = %message.subject,
                        "Adding message to consumer queue"
                    );
                    if let Some(queue) = assigned.get_mut(&id) {
                        queue.push(Arc::new(message));
                    }
                    report.assigned += 1;
                }
                None => {
                    info!(subject = %message.subject, "Message doesn't fit any consumer");
                    report.unmatched += 1;
                }
            }
        }
        drop(registrations);

        let published: HashMap<ConsumerId, MessageQueue> = assigned
            .into_iter()
            .map(|(id, queue)| (id, Arc::from(queue)))
            .collect();

        {
            let mut queues = self.queues.write().map_err(|_| RoutingError::Poisoned)?;
            // Consumers registered mid-scan keep their empty queue.
            let mut next = published;
            for id in queues.keys() {
                next.entry(*id).or_insert_with(|| Arc::from(Vec::new()));
            }
            *queues = Arc::new(next);
        }

        info!(
            fetched = report.fetched,
            assigned = report.assigned,
            unmatched = report.unmatched,
            "Finished processing inbox for message router"
        );
        Ok(report)
    }

    /// The consumer's queue for the current cycle.
    ///
    /// An unknown id is an error; a registered consumer with nothing to do
    /// gets an empty queue.
    pub fn messages(&self, id: ConsumerId) -> Result<MessageQueue, RoutingError> {
        let snapshot = {
            let queues = self.queues.read().map_err(|_| RoutingError::Poisoned)?;
            Arc::clone(&queues)
        };

        match snapshot.get(&id) {
            Some(queue) => {
                debug!(consumer_id = id, count = queue.len(), "Messages found for consumer");
                Ok(Arc::clone(queue))
            }
            None => {
                error!(
                    consumer_id = id,
                    "Can't retrieve messages: no such consumer registered"
                );
                Err(RoutingError::UnknownConsumer { id })
            }
        }
    }
}

/// Evaluate consumers in registration order; errors and panics count as
/// non-matches.
fn first_match(registrations: &[Registration], message: &IncomingMessage) -> Option<ConsumerId> {
    for registration in registrations {
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            registration.evaluator.evaluate(message)
        }));

        match outcome {
            Ok(Ok(true)) => return Some(registration.id),
            Ok(Ok(false)) => {}
            Ok(Err(e)) => warn!(
                consumer_id = registration.id,
                subject = %message.subject,
                error = %e,
                "Evaluator failed, treating as non-match"
            ),
            Err(_) => warn!(
                consumer_id = registration.id,
                subject = %message.subject,
                "Evaluator panicked, treating as non-match"
            ),
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    use crate::mail::MemoryFolder;

    fn msg(id: &str, subject: &str, minutes: i64) -> IncomingMessage {
        IncomingMessage {
            id: id.into(),
            subject: subject.into(),
            received_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
                + Duration::minutes(minutes),
            ..Default::default()
        }
    }

    fn router_with(messages: Vec<IncomingMessage>) -> MessageRouter {
        MessageRouter::new(Arc::new(MemoryFolder::with_messages(messages)))
    }

    fn ids(queue: &MessageQueue) -> Vec<String> {
        queue.iter().map(|m| m.id.clone()).collect()
    }

    fn subject_contains(needle: &'static str) -> Arc<dyn MessageEvaluator> {
        Arc::new(move |m: &IncomingMessage| m.subject.contains(needle))
    }

    #[test]
    fn ids_start_at_100_and_increase() {
        let router = router_with(vec![]);
        let a = router.register(subject_contains("a")).unwrap();
        let b = router.register(subject_contains("b")).unwrap();
        assert_eq!(a, FIRST_CONSUMER_ID);
        assert_eq!(b, FIRST_CONSUMER_ID + 1);
        assert_eq!(router.consumer_count(), 2);
    }

    #[test]
    fn no_consumers_is_a_noop() {
        let router = router_with(vec![msg("1", "x", 0)]);
        assert_eq!(router.process_cycle().unwrap(), CycleReport::default());
    }

    #[test]
    fn first_registered_match_wins() {
        let router = router_with(vec![msg("1", "alpha beta", 0), msg("2", "beta", 1)]);
        let alpha = router.register(subject_contains("alpha")).unwrap();
        let beta = router.register(subject_contains("beta")).unwrap();

        router.process_cycle().unwrap();

        assert_eq!(ids(&router.messages(alpha).unwrap()), vec!["1"]);
        assert_eq!(ids(&router.messages(beta).unwrap()), vec!["2"]);
    }

    #[test]
    fn queues_are_sorted_by_received_time() {
        let router = router_with(vec![
            msg("late", "x", 30),
            msg("early", "x", -30),
            msg("mid", "x", 0),
        ]);
        let id = router.register(subject_contains("x")).unwrap();
        router.process_cycle().unwrap();
        assert_eq!(ids(&router.messages(id).unwrap()), vec!["early", "mid", "late"]);
    }

    #[test]
    fn unmatched_messages_are_reported_and_dropped() {
        let router = router_with(vec![msg("1", "alpha", 0), msg("2", "gamma", 1)]);
        let alpha = router.register(subject_contains("alpha")).unwrap();

        let report = router.process_cycle().unwrap();
        assert_eq!(report.fetched, 2);
        assert_eq!(report.assigned, 1);
        assert_eq!(report.unmatched, 1);
        assert_eq!(ids(&router.messages(alpha).unwrap()), vec!["1"]);
    }

    #[test]
    fn unknown_consumer_is_an_error() {
        let router = router_with(vec![]);
        let err = router.messages(7).unwrap_err();
        assert!(matches!(err, RoutingError::UnknownConsumer { id: 7 }));
    }

    #[test]
    fn registered_consumer_starts_empty() {
        let router = router_with(vec![msg("1", "x", 0)]);
        let id = router.register(subject_contains("x")).unwrap();
        assert!(router.messages(id).unwrap().is_empty());
    }

    #[test]
    fn queues_are_replaced_each_cycle() {
        let folder = Arc::new(MemoryFolder::with_messages(vec![msg("1", "x", 0)]));
        let router = MessageRouter::new(folder.clone());
        let id = router.register(subject_contains("x")).unwrap();

        router.process_cycle().unwrap();
        let first = router.messages(id).unwrap();

        folder.finish(&first[0], true).unwrap();
        folder.add(msg("2", "x", 5));
        router.process_cycle().unwrap();

        // The earlier snapshot is untouched by the new cycle.
        assert_eq!(ids(&first), vec!["1"]);
        assert_eq!(ids(&router.messages(id).unwrap()), vec!["2"]);
    }

    struct Failing;

    impl MessageEvaluator for Failing {
        fn evaluate(&self, _message: &IncomingMessage) -> Result<bool, RoutingError> {
            Err(RoutingError::Evaluator {
                reason: "lookup failed".into(),
            })
        }
    }

    #[test]
    fn failing_evaluator_is_a_non_match() {
        let router = router_with(vec![msg("1", "x", 0)]);
        let failing = router.register(Arc::new(Failing)).unwrap();
        let fallback = router.register(subject_contains("x")).unwrap();

        router.process_cycle().unwrap();
        assert!(router.messages(failing).unwrap().is_empty());
        assert_eq!(ids(&router.messages(fallback).unwrap()), vec!["1"]);
    }

    #[test]
    fn panicking_evaluator_is_a_non_match() {
        let router = router_with(vec![msg("1", "x", 0), msg("2", "x", 1)]);
        let panicking = router
            .register(Arc::new(|_: &IncomingMessage| -> bool {
                panic!("evaluator bug")
            }))
            .unwrap();
        let fallback = router.register(subject_contains("x")).unwrap();

        let report = router.process_cycle().unwrap();
        assert_eq!(report.assigned, 2);
        assert!(router.messages(panicking).unwrap().is_empty());
        assert_eq!(ids(&router.messages(fallback).unwrap()), vec!["1", "2"]);
    }

    #[test]
    fn concurrent_readers_see_whole_cycles() {
        let folder = Arc::new(MemoryFolder::with_messages(
            (0..50).map(|i| msg(&i.to_string(), "x", i)).collect(),
        ));
        let router = Arc::new(MessageRouter::new(folder));
        let id = router.register(subject_contains("x")).unwrap();
        router.process_cycle().unwrap();

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let router = Arc::clone(&router);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        let queue = router.messages(id).unwrap();
                        assert_eq!(queue.len(), 50);
                    }
                })
            })
            .collect();

        for _ in 0..20 {
            router.process_cycle().unwrap();
        }
        for reader in readers {
            reader.join().unwrap();
        }
    }
}
