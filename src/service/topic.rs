//! Per-case topics: presence registry and message fan-out.
//!
//! One topic per case, named `case:{id}`. Subscribers get a bounded queue;
//! a subscriber that disconnects or falls too far behind is removed at the
//! next publish instead of blocking the topic. All sends for one topic
//! happen under the hub lock, so messages are delivered in the order the
//! broker accepted them; topics are independent of each other.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use crossbeam::channel::{Receiver, Sender, TryRecvError, TrySendError};
use serde_json::json;
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::api::realtime::{ConnectionInfo, MSG_CASE, WireMessage};
use crate::core::{CaseId, UserId};

/// Durable record of one live subscription.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionRecord {
    pub user: UserId,
    pub username: String,
    /// Topic name, `case:{id}`.
    pub case_group_key: String,
    /// Unique per client connection; chosen by the transport.
    pub channel_key: String,
    pub since: OffsetDateTime,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HubLimits {
    pub max_subscribers_per_topic: usize,
    pub subscriber_queue_len: usize,
}

impl Default for HubLimits {
    fn default() -> Self {
        Self {
            max_subscribers_per_topic: 64,
            subscriber_queue_len: 256,
        }
    }
}

pub fn topic_name(case: CaseId) -> String {
    format!("case:{case}")
}

/// Receiving half of a subscription.
#[derive(Debug)]
pub struct TopicSubscription {
    case: CaseId,
    channel_key: String,
    receiver: Receiver<WireMessage>,
}

impl TopicSubscription {
    pub fn case(&self) -> CaseId {
        self.case
    }

    pub fn channel_key(&self) -> &str {
        &self.channel_key
    }

    pub fn recv(&self) -> Result<WireMessage, crossbeam::channel::RecvError> {
        self.receiver.recv()
    }

    pub fn try_recv(&self) -> Result<WireMessage, TryRecvError> {
        self.receiver.try_recv()
    }
}

#[derive(Clone)]
pub struct TopicHub {
    inner: Arc<Mutex<HubState>>,
}

struct HubState {
    limits: HubLimits,
    topics: HashMap<CaseId, TopicState>,
}

#[derive(Default)]
struct TopicState {
    next_id: u64,
    subscribers: BTreeMap<u64, SubscriberState>,
}

struct SubscriberState {
    sender: Sender<WireMessage>,
    record: ConnectionRecord,
}

impl TopicHub {
    pub fn new(limits: HubLimits) -> Self {
        Self {
            inner: Arc::new(Mutex::new(HubState {
                limits,
                topics: HashMap::new(),
            })),
        }
    }

    /// Register a subscriber and broadcast the updated `current_connections`
    /// list to the whole topic (the new subscriber included).
    ///
    /// A previous record for the same (user, case, channel) is replaced: the
    /// old queue is dropped and its transport sees a disconnect.
    pub fn subscribe(
        &self,
        case: CaseId,
        user: UserId,
        username: &str,
        channel_key: &str,
    ) -> Result<TopicSubscription, TopicError> {
        let mut state = self.lock_state()?;
        let queue_len = state.limits.subscriber_queue_len;
        let max = state.limits.max_subscribers_per_topic;
        let topic = state.topics.entry(case).or_default();

        topic
            .subscribers
            .retain(|_, s| !(s.record.user == user && s.record.channel_key == channel_key));
        if topic.subscribers.len() >= max {
            return Err(TopicError::SubscriberLimitReached {
                max_subscribers: max,
            });
        }

        let (sender, receiver) = crossbeam::channel::bounded(queue_len);
        let id = topic.next_id;
        topic.next_id = topic.next_id.saturating_add(1);
        topic.subscribers.insert(
            id,
            SubscriberState {
                sender,
                record: ConnectionRecord {
                    user,
                    username: username.to_string(),
                    case_group_key: topic_name(case),
                    channel_key: channel_key.to_string(),
                    since: OffsetDateTime::now_utc(),
                },
            },
        );

        Self::broadcast_connections(topic);
        Ok(TopicSubscription {
            case,
            channel_key: channel_key.to_string(),
            receiver,
        })
    }

    /// Remove a channel's subscription and broadcast the updated
    /// `current_connections` list. Unknown channels are a no-op.
    pub fn unsubscribe(&self, case: CaseId, channel_key: &str) -> Result<(), TopicError> {
        let mut state = self.lock_state()?;
        let Some(topic) = state.topics.get_mut(&case) else {
            return Ok(());
        };
        let before = topic.subscribers.len();
        topic
            .subscribers
            .retain(|_, s| s.record.channel_key != channel_key);
        if topic.subscribers.len() != before {
            Self::broadcast_connections(topic);
        }
        if topic.subscribers.is_empty() {
            state.topics.remove(&case);
        }
        Ok(())
    }

    /// Fan a message out to every subscriber of the topic.
    pub fn publish(&self, case: CaseId, message: &WireMessage) -> Result<(), TopicError> {
        self.publish_filtered(case, message, |_| true)
    }

    /// Fan a message out to every subscriber except the named channel
    /// (chat senders do not receive their own echo).
    pub fn publish_except(
        &self,
        case: CaseId,
        exclude_channel: &str,
        message: &WireMessage,
    ) -> Result<(), TopicError> {
        self.publish_filtered(case, message, |record| {
            record.channel_key != exclude_channel
        })
    }

    /// Deliver a message to a single channel (parse errors go only to the
    /// offender).
    pub fn send_to(
        &self,
        case: CaseId,
        channel_key: &str,
        message: &WireMessage,
    ) -> Result<(), TopicError> {
        self.publish_filtered(case, message, |record| record.channel_key == channel_key)
    }

    pub fn connections(&self, case: CaseId) -> Result<Vec<ConnectionInfo>, TopicError> {
        let state = self.lock_state()?;
        Ok(state
            .topics
            .get(&case)
            .map(connection_infos)
            .unwrap_or_default())
    }

    pub fn subscriber_count(&self, case: CaseId) -> Result<usize, TopicError> {
        let state = self.lock_state()?;
        Ok(state
            .topics
            .get(&case)
            .map_or(0, |topic| topic.subscribers.len()))
    }

    /// Drop a whole topic (the case is gone).
    pub fn drop_topic(&self, case: CaseId) -> Result<(), TopicError> {
        let mut state = self.lock_state()?;
        state.topics.remove(&case);
        Ok(())
    }

    fn publish_filtered(
        &self,
        case: CaseId,
        message: &WireMessage,
        keep: impl Fn(&ConnectionRecord) -> bool,
    ) -> Result<(), TopicError> {
        let mut state = self.lock_state()?;
        let Some(topic) = state.topics.get_mut(&case) else {
            return Ok(());
        };

        let mut dropped = Vec::new();
        for (id, subscriber) in &topic.subscribers {
            if !keep(&subscriber.record) {
                continue;
            }
            match subscriber.sender.try_send(message.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                    dropped.push(*id);
                }
            }
        }

        if !dropped.is_empty() {
            for id in dropped {
                topic.subscribers.remove(&id);
            }
            Self::broadcast_connections(topic);
        }
        Ok(())
    }

    fn broadcast_connections(topic: &mut TopicState) {
        let infos = connection_infos(topic);
        let message = WireMessage::new(MSG_CASE, json!({ "current_connections": infos }));
        let mut dead = Vec::new();
        for (id, subscriber) in &topic.subscribers {
            if subscriber.sender.try_send(message.clone()).is_err() {
                dead.push(*id);
            }
        }
        for id in dead {
            topic.subscribers.remove(&id);
        }
    }

    fn lock_state(&self) -> Result<std::sync::MutexGuard<'_, HubState>, TopicError> {
        self.inner.lock().map_err(|_| TopicError::LockPoisoned)
    }
}

fn connection_infos(topic: &TopicState) -> Vec<ConnectionInfo> {
    topic
        .subscribers
        .values()
        .map(|s| ConnectionInfo {
            user: s.record.username.clone(),
            since: s
                .record
                .since
                .format(&Rfc3339)
                .unwrap_or_else(|_| String::new()),
        })
        .collect()
}

#[derive(Debug, Error)]
pub enum TopicError {
    #[error("subscriber limit reached ({max_subscribers})")]
    SubscriberLimitReached { max_subscribers: usize },
    #[error("topic hub lock poisoned")]
    LockPoisoned,
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::*;

    fn hub() -> TopicHub {
        TopicHub::new(HubLimits {
            max_subscribers_per_topic: 4,
            subscriber_queue_len: 8,
        })
    }

    fn drain_connections(sub: &TopicSubscription) -> Vec<WireMessage> {
        let mut out = Vec::new();
        while let Ok(msg) = sub.try_recv() {
            out.push(msg);
        }
        out
    }

    #[test]
    fn join_broadcasts_current_connections() {
        let hub = hub();
        let case = CaseId::generate();
        let a = hub
            .subscribe(case, UserId::generate(), "alice", "ch-a")
            .expect("subscribe a");
        let _b = hub
            .subscribe(case, UserId::generate(), "bob", "ch-b")
            .expect("subscribe b");

        let msgs = drain_connections(&a);
        // Alice sees her own join and then Bob's.
        assert_eq!(msgs.len(), 2);
        let last = msgs.last().expect("last");
        assert_eq!(last.kind, MSG_CASE);
        let connections = &last.content.as_ref().expect("content")["current_connections"];
        let users: Vec<&str> = connections
            .as_array()
            .expect("array")
            .iter()
            .filter_map(|v| v["user"].as_str())
            .collect();
        assert_eq!(users, ["alice", "bob"]);
    }

    #[test]
    fn chat_excludes_the_sender_channel() {
        let hub = hub();
        let case = CaseId::generate();
        let a = hub
            .subscribe(case, UserId::generate(), "alice", "ch-a")
            .expect("subscribe a");
        let b = hub
            .subscribe(case, UserId::generate(), "bob", "ch-b")
            .expect("subscribe b");
        drain_connections(&a);
        drain_connections(&b);

        let msg = WireMessage::new(MSG_CASE, Value::String("hello".into()));
        hub.publish_except(case, "ch-a", &msg).expect("publish");

        assert!(a.try_recv().is_err(), "sender must not receive its echo");
        let got = b.recv().expect("bob receives");
        assert_eq!(got.content, Some(Value::String("hello".into())));
    }

    #[test]
    fn reconnect_replaces_previous_record() {
        let hub = hub();
        let case = CaseId::generate();
        let user = UserId::generate();
        let first = hub.subscribe(case, user, "alice", "ch-a").expect("first");
        let _second = hub.subscribe(case, user, "alice", "ch-a").expect("second");

        assert_eq!(hub.subscriber_count(case).expect("count"), 1);
        // The replaced queue is disconnected once pending messages drain.
        while first.try_recv().is_ok() {}
        assert!(matches!(first.try_recv(), Err(TryRecvError::Disconnected)));
    }

    #[test]
    fn leave_updates_connections() {
        let hub = hub();
        let case = CaseId::generate();
        let a = hub
            .subscribe(case, UserId::generate(), "alice", "ch-a")
            .expect("a");
        let _b = hub
            .subscribe(case, UserId::generate(), "bob", "ch-b")
            .expect("b");
        drain_connections(&a);

        hub.unsubscribe(case, "ch-b").expect("unsubscribe");
        let msgs = drain_connections(&a);
        let last = msgs.last().expect("update after leave");
        let users: Vec<&str> = last.content.as_ref().expect("content")["current_connections"]
            .as_array()
            .expect("array")
            .iter()
            .filter_map(|v| v["user"].as_str())
            .collect();
        assert_eq!(users, ["alice"]);
    }

    #[test]
    fn subscriber_limit_is_enforced() {
        let hub = TopicHub::new(HubLimits {
            max_subscribers_per_topic: 1,
            subscriber_queue_len: 8,
        });
        let case = CaseId::generate();
        let _a = hub
            .subscribe(case, UserId::generate(), "alice", "ch-a")
            .expect("a");
        let err = hub.subscribe(case, UserId::generate(), "bob", "ch-b");
        assert!(matches!(
            err,
            Err(TopicError::SubscriberLimitReached { .. })
        ));
    }

    #[test]
    fn lagging_subscriber_is_dropped_not_blocking() {
        let hub = TopicHub::new(HubLimits {
            max_subscribers_per_topic: 4,
            subscriber_queue_len: 1,
        });
        let case = CaseId::generate();
        let slow = hub
            .subscribe(case, UserId::generate(), "slow", "ch-s")
            .expect("slow");
        // Queue length 1 is consumed by the join broadcast; the next two
        // publishes overflow and evict the subscriber.
        let msg = WireMessage::new(MSG_CASE, Value::String("x".into()));
        hub.publish(case, &msg).expect("publish 1");
        hub.publish(case, &msg).expect("publish 2");
        assert_eq!(hub.subscriber_count(case).expect("count"), 0);
        // The join broadcast is still readable, then the queue closes.
        assert!(slow.recv().is_ok());
    }
}
