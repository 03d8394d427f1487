// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Connection relay: routes protocol events addressed to an opaque connection
//! id to the transport channel currently subscribed to it.
//!
//! Both directions of the mapping live behind a single mutex and every
//! operation updates them together, so the forward and reverse maps always
//! agree on which channel owns an id.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use uuid::Uuid;

use crate::state::epoch_ms;

pub type ChannelId = Uuid;

/// A named protocol event with an arbitrary payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayEvent {
    pub event: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl RelayEvent {
    pub fn new(event: impl Into<String>, payload: serde_json::Value) -> Self {
        Self { event: event.into(), payload }
    }
}

/// Frame pushed to a subscribed channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayMessage {
    pub event: String,
    pub connection_id: String,
    pub payload: serde_json::Value,
}

/// Sending half of one transport channel.
#[derive(Debug, Clone)]
pub struct RelayChannel {
    pub id: ChannelId,
    tx: mpsc::Sender<RelayMessage>,
}

#[derive(Debug, Clone)]
struct Subscription {
    channel: RelayChannel,
    subscribed_at_ms: u64,
}

#[derive(Default)]
struct RelayMaps {
    forward: HashMap<String, Subscription>,
    reverse: HashMap<ChannelId, String>,
}

impl RelayMaps {
    /// Remove `connection_id` from both maps. Returns the channel that owned it.
    fn release(&mut self, connection_id: &str) -> Option<ChannelId> {
        let sub = self.forward.remove(connection_id)?;
        if self.reverse.get(&sub.channel.id).is_some_and(|id| id == connection_id) {
            self.reverse.remove(&sub.channel.id);
        }
        Some(sub.channel.id)
    }
}

/// Outcome of [`ConnectionRelay::subscribe`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscribeOutcome {
    /// Channel that previously owned the connection id.
    pub replaced: Option<ChannelId>,
    /// Connection id this channel owned before subscribing.
    pub released: Option<String>,
}

/// Snapshot of one subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscriptionInfo {
    pub connection_id: String,
    pub channel_id: ChannelId,
    pub subscribed_at_ms: u64,
}

pub struct ConnectionRelay {
    maps: Mutex<RelayMaps>,
    capacity: usize,
}

impl ConnectionRelay {
    /// `capacity` bounds the number of undelivered messages per channel.
    pub fn new(capacity: usize) -> Self {
        Self { maps: Mutex::new(RelayMaps::default()), capacity: capacity.max(1) }
    }

    /// Create a transport channel. The receiver is drained by the transport.
    pub fn open_channel(&self) -> (RelayChannel, mpsc::Receiver<RelayMessage>) {
        let (tx, rx) = mpsc::channel(self.capacity);
        (RelayChannel { id: Uuid::new_v4(), tx }, rx)
    }

    /// Route `connection_id` to `channel`.
    ///
    /// A previous owner of the id loses it, and an id previously owned by the
    /// channel is released. Both maps change in one critical section.
    pub fn subscribe(&self, connection_id: &str, channel: &RelayChannel) -> SubscribeOutcome {
        let mut maps = self.maps.lock();
        let mut outcome = SubscribeOutcome::default();

        if let Some(previous) = maps.reverse.get(&channel.id).cloned() {
            if previous == connection_id {
                return outcome;
            }
            maps.release(&previous);
            outcome.released = Some(previous);
        }
        if let Some(old) = maps.release(connection_id) {
            outcome.replaced = Some(old);
        }

        maps.reverse.insert(channel.id, connection_id.to_owned());
        maps.forward.insert(
            connection_id.to_owned(),
            Subscription { channel: channel.clone(), subscribed_at_ms: epoch_ms() },
        );
        drop(maps);

        tracing::debug!(connection_id, channel = %channel.id, replaced = ?outcome.replaced, "relay subscribe");
        outcome
    }

    /// Drop the subscription for `connection_id`. Returns whether one existed.
    pub fn unsubscribe(&self, connection_id: &str) -> bool {
        let removed = self.maps.lock().release(connection_id).is_some();
        if removed {
            tracing::debug!(connection_id, "relay unsubscribe");
        }
        removed
    }

    /// Push an event to the channel subscribed to `connection_id`.
    ///
    /// Returns `false` when no live channel owns the id. A full channel drops
    /// the event but still counts as live.
    pub fn publish(&self, connection_id: &str, event: RelayEvent) -> bool {
        let mut maps = self.maps.lock();
        let Some(sub) = maps.forward.get(connection_id) else {
            tracing::debug!(connection_id, event = %event.event, "relay publish: no subscriber");
            return false;
        };

        let message = RelayMessage {
            event: event.event,
            connection_id: connection_id.to_owned(),
            payload: event.payload,
        };
        match sub.channel.tx.try_send(message) {
            Ok(()) => true,
            Err(TrySendError::Full(message)) => {
                tracing::debug!(connection_id, event = %message.event, "relay channel full, event dropped");
                true
            }
            Err(TrySendError::Closed(_)) => {
                maps.release(connection_id);
                tracing::debug!(connection_id, "relay publish: pruned closed channel");
                false
            }
        }
    }

    /// Clean up after a transport channel went away.
    ///
    /// Returns the connection id the channel still owned, if any. An id that
    /// was since taken over by another channel is left untouched.
    pub fn on_disconnect(&self, channel_id: ChannelId) -> Option<String> {
        let mut maps = self.maps.lock();
        let connection_id = maps.reverse.remove(&channel_id)?;
        if maps.forward.get(&connection_id).is_some_and(|s| s.channel.id == channel_id) {
            maps.forward.remove(&connection_id);
        }
        drop(maps);
        tracing::debug!(connection_id = %connection_id, channel = %channel_id, "relay channel disconnected");
        Some(connection_id)
    }

    pub fn subscription(&self, connection_id: &str) -> Option<SubscriptionInfo> {
        let maps = self.maps.lock();
        maps.forward.get(connection_id).map(|sub| SubscriptionInfo {
            connection_id: connection_id.to_owned(),
            channel_id: sub.channel.id,
            subscribed_at_ms: sub.subscribed_at_ms,
        })
    }

    /// Connection id currently owned by a channel.
    pub fn connection_of(&self, channel_id: ChannelId) -> Option<String> {
        self.maps.lock().reverse.get(&channel_id).cloned()
    }

    pub fn connection_count(&self) -> usize {
        self.maps.lock().forward.len()
    }
}

#[cfg(test)]
#[path = "relay_tests.rs"]
mod tests;
