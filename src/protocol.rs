use crate::transform::TransformState;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

pub type EntityId = u32;

/// Logical transport channel a message rides on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Channel {
    /// High-frequency transform samples. Loss and reordering are tolerated.
    Snapshot = 0,
    /// Teleports and authority transitions. Must be reliable and ordered
    /// relative to subsequent snapshots for the same entity.
    Control = 1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum Reliability {
    Unreliable = 0,
    ReliableOrdered = 1,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MessageHeader {
    /// Sender's clock at sampling time, in seconds.
    pub timestamp: f64,
    pub sequence: u64,
}

static SEQUENCE_COUNTER: AtomicU64 = AtomicU64::new(0);

impl MessageHeader {
    pub fn new(timestamp: f64) -> Self {
        Self {
            timestamp,
            sequence: SEQUENCE_COUNTER.fetch_add(1, Ordering::Relaxed) + 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub header: MessageHeader,
    pub payload: MessagePayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessagePayload {
    /// Regular transform sample for buffering and interpolation.
    Snapshot {
        entity_id: EntityId,
        state: TransformState,
    },
    /// Explicit discontinuity: apply exactly, clear interpolation history.
    Teleport {
        entity_id: EntityId,
        state: TransformState,
    },
    AuthorityGrant { entity_id: EntityId },
    AuthorityRevoke { entity_id: EntityId },
}

impl Message {
    pub fn snapshot(entity_id: EntityId, state: TransformState, timestamp: f64) -> Self {
        Self {
            header: MessageHeader::new(timestamp),
            payload: MessagePayload::Snapshot { entity_id, state },
        }
    }

    pub fn teleport(entity_id: EntityId, state: TransformState, timestamp: f64) -> Self {
        Self {
            header: MessageHeader::new(timestamp),
            payload: MessagePayload::Teleport { entity_id, state },
        }
    }

    pub fn authority_grant(entity_id: EntityId, timestamp: f64) -> Self {
        Self {
            header: MessageHeader::new(timestamp),
            payload: MessagePayload::AuthorityGrant { entity_id },
        }
    }

    pub fn authority_revoke(entity_id: EntityId, timestamp: f64) -> Self {
        Self {
            header: MessageHeader::new(timestamp),
            payload: MessagePayload::AuthorityRevoke { entity_id },
        }
    }

    /// The channel and reliability this payload requires from the transport.
    pub fn channel(&self) -> (Channel, Reliability) {
        match self.payload {
            MessagePayload::Snapshot { .. } => (Channel::Snapshot, Reliability::Unreliable),
            MessagePayload::Teleport { .. }
            | MessagePayload::AuthorityGrant { .. }
            | MessagePayload::AuthorityRevoke { .. } => {
                (Channel::Control, Reliability::ReliableOrdered)
            }
        }
    }

    pub fn entity_id(&self) -> EntityId {
        match self.payload {
            MessagePayload::Snapshot { entity_id, .. }
            | MessagePayload::Teleport { entity_id, .. }
            | MessagePayload::AuthorityGrant { entity_id }
            | MessagePayload::AuthorityRevoke { entity_id } => entity_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::TransformState;

    #[test]
    fn test_snapshot_rides_unreliable_channel() {
        let msg = Message::snapshot(1, TransformState::IDENTITY, 0.5);
        assert_eq!(msg.channel(), (Channel::Snapshot, Reliability::Unreliable));
        assert_eq!(msg.entity_id(), 1);
        assert_eq!(msg.header.timestamp, 0.5);
    }

    #[test]
    fn test_control_messages_ride_reliable_channel() {
        let teleport = Message::teleport(2, TransformState::IDENTITY, 1.0);
        let grant = Message::authority_grant(2, 1.0);
        let revoke = Message::authority_revoke(2, 1.0);

        for msg in [teleport, grant, revoke] {
            assert_eq!(msg.channel(), (Channel::Control, Reliability::ReliableOrdered));
        }
    }

    #[test]
    fn test_sequence_numbers_increase() {
        let a = Message::snapshot(1, TransformState::IDENTITY, 0.0);
        let b = Message::snapshot(1, TransformState::IDENTITY, 0.0);
        assert!(b.header.sequence > a.header.sequence);
    }

    #[test]
    fn test_message_round_trips_through_serde() {
        let msg = Message::snapshot(7, TransformState::IDENTITY, 2.5);
        let json = serde_json::to_string(&msg).unwrap();
        let back: Message = serde_json::from_str(&json).unwrap();

        assert_eq!(back.entity_id(), 7);
        assert_eq!(back.header.timestamp, 2.5);
    }
}
