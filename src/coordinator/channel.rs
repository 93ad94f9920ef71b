//! Cross-tab broadcast channel (spec §4.5, §6): a named, at-least-once
//! delivery primitive shared by every tab subscribed to a database
//! name. [`InMemoryBroadcastChannel`] fans out to per-subscriber mpsc
//! queues, standing in for `BroadcastChannel`/`MessageChannel` in a
//! browser; a native multi-process deployment would back this with a
//! socket or named pipe instead.

use std::collections::HashMap;
use std::sync::mpsc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::common::clock::Deadline;
use crate::common::Result;
use crate::host::{QueryResult, Value};

#[derive(Debug, Clone)]
pub enum WriteOutcome {
    Ok(QueryResult),
    Err(String),
}

#[derive(Debug, Clone)]
pub enum Message {
    Change { db: String, epoch: u64 },
    LeaderChanged { db: String, new_holder: Option<String>, epoch: u64 },
    WriteRequest {
        db: String,
        correlation_id: u64,
        sql: String,
        params: Vec<Value>,
        deadline: Deadline,
    },
    WriteResponse {
        db: String,
        correlation_id: u64,
        result: WriteOutcome,
    },
    WriteCancel { db: String, correlation_id: u64 },
}

impl Message {
    pub fn db(&self) -> &str {
        match self {
            Message::Change { db, .. }
            | Message::LeaderChanged { db, .. }
            | Message::WriteRequest { db, .. }
            | Message::WriteResponse { db, .. }
            | Message::WriteCancel { db, .. } => db,
        }
    }
}

/// A live subscription to one database name's messages.
pub trait Subscription: Send {
    fn recv_timeout(&self, timeout: Duration) -> Option<Message>;
    fn try_recv(&self) -> Option<Message>;
}

pub trait BroadcastChannel: Send + Sync {
    fn send(&self, message: Message) -> Result<()>;
    fn subscribe(&self, db: &str) -> Box<dyn Subscription>;
}

struct MpscSubscription {
    receiver: mpsc::Receiver<Message>,
}

impl Subscription for MpscSubscription {
    fn recv_timeout(&self, timeout: Duration) -> Option<Message> {
        self.receiver.recv_timeout(timeout).ok()
    }

    fn try_recv(&self) -> Option<Message> {
        self.receiver.try_recv().ok()
    }
}

#[derive(Default)]
pub struct InMemoryBroadcastChannel {
    subscribers: Mutex<HashMap<String, Vec<mpsc::Sender<Message>>>>,
}

impl InMemoryBroadcastChannel {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BroadcastChannel for InMemoryBroadcastChannel {
    fn send(&self, message: Message) -> Result<()> {
        let subscribers = self.subscribers.lock();
        if let Some(senders) = subscribers.get(message.db()) {
            for sender in senders {
                // A dropped subscriber is not this channel's problem;
                // at-least-once delivery only binds live subscribers.
                let _ = sender.send(message.clone());
            }
        }
        Ok(())
    }

    fn subscribe(&self, db: &str) -> Box<dyn Subscription> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.lock().entry(db.to_string()).or_default().push(tx);
        Box::new(MpscSubscription { receiver: rx })
    }
}
