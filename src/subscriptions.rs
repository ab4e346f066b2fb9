//! Topic subscription lifecycle
//!
//! Tracks which feed topics are confirmed by the server, which have a
//! subscribe request in flight, and which have an unsubscribe in flight.
//! A topic lives in at most one of the three sets; transitions move it,
//! never copy it. The manager decides which topics actually need a wire
//! request, the engine owns sending the frames.

use std::collections::BTreeSet;

/// Confirmed / pending-subscribe / pending-unsubscribe topic sets
#[derive(Debug, Default)]
pub struct SubscriptionManager {
    confirmed: BTreeSet<String>,
    pending_subscribe: BTreeSet<String>,
    pending_unsubscribe: BTreeSet<String>,
}

impl SubscriptionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark topics pending-subscribe and return the ones that need a wire
    /// request. Topics already confirmed or already requested are skipped;
    /// a pending unsubscribe for a topic is cancelled by re-subscribing.
    pub fn subscribe<I, S>(&mut self, topics: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut requested = Vec::new();
        for topic in topics {
            let topic = topic.as_ref();
            if topic.is_empty()
                || self.confirmed.contains(topic)
                || self.pending_subscribe.contains(topic)
            {
                continue;
            }
            self.pending_unsubscribe.remove(topic);
            self.pending_subscribe.insert(topic.to_string());
            requested.push(topic.to_string());
        }
        requested
    }

    /// Move confirmed topics to pending-unsubscribe and return the ones
    /// that need a wire request. A topic whose subscribe is still in flight
    /// is cancelled locally instead: the server never confirmed it, so no
    /// unsubscribe frame is owed.
    pub fn unsubscribe<I, S>(&mut self, topics: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut requested = Vec::new();
        for topic in topics {
            let topic = topic.as_ref();
            if self.pending_unsubscribe.contains(topic) {
                continue;
            }
            self.pending_subscribe.remove(topic);
            if self.confirmed.remove(topic) {
                self.pending_unsubscribe.insert(topic.to_string());
                requested.push(topic.to_string());
            }
        }
        requested
    }

    /// Server acknowledged a subscribe; move acked topics from pending to
    /// confirmed. An ack for a topic no longer pending is stale and ignored.
    pub fn confirm_subscription<I, S>(&mut self, topics: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for topic in topics {
            let topic = topic.as_ref();
            if self.pending_subscribe.remove(topic) {
                self.confirmed.insert(topic.to_string());
            }
        }
    }

    /// Server acknowledged an unsubscribe; the topic is gone server-side
    pub fn confirm_unsubscription<I, S>(&mut self, topics: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for topic in topics {
            let topic = topic.as_ref();
            self.pending_unsubscribe.remove(topic);
            self.confirmed.remove(topic);
        }
    }

    /// Confirmed topics, sorted
    pub fn active(&self) -> Vec<String> {
        self.confirmed.iter().cloned().collect()
    }

    /// Topics we want subscribed: confirmed plus subscribe-in-flight, sorted
    pub fn wanted(&self) -> Vec<String> {
        self.confirmed
            .union(&self.pending_subscribe)
            .cloned()
            .collect()
    }

    pub fn is_active(&self, topic: &str) -> bool {
        self.confirmed.contains(topic)
    }

    pub fn pending_subscribe_count(&self) -> usize {
        self.pending_subscribe.len()
    }

    pub fn pending_unsubscribe_count(&self) -> usize {
        self.pending_unsubscribe.len()
    }

    /// In-flight requests died with the transport; confirmed topics are kept
    /// so a reconnect can restore them
    pub fn reset_for_reconnect(&mut self) {
        self.pending_subscribe.clear();
        self.pending_unsubscribe.clear();
    }

    pub fn clear_all(&mut self) {
        self.confirmed.clear();
        self.pending_subscribe.clear();
        self.pending_unsubscribe.clear();
    }
}
