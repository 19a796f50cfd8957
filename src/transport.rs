use crate::error::{Result, SyncError};
use crate::protocol::{Channel, Message};
use std::collections::VecDeque;

/// Byte-level encoding and delivery are external; the core hands over
/// messages tagged with their required channel and lets the transport decide
/// how to honor reliability. Implementations must deliver Control-channel
/// messages reliably and in order relative to later messages for the same
/// entity; Snapshot-channel messages may be lost or reordered.
pub trait Transport {
    fn send(&mut self, message: &Message) -> Result<()>;
    fn receive(&mut self) -> Result<Option<Message>>;
    fn close(&mut self) -> Result<()>;
    fn is_connected(&self) -> bool;
}

/// In-process transport for tests and local loopback.
///
/// Keeps one queue per channel. The snapshot queue can simulate lossy
/// delivery by dropping every n-th message; the control queue is always
/// lossless FIFO, mirroring the reliability contract real transports must
/// provide.
pub struct MemoryTransport {
    snapshot_out: VecDeque<Message>,
    control_out: VecDeque<Message>,
    snapshot_in: VecDeque<Message>,
    control_in: VecDeque<Message>,
    drop_every: Option<u64>,
    snapshot_send_count: u64,
    connected: bool,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self {
            snapshot_out: VecDeque::new(),
            control_out: VecDeque::new(),
            snapshot_in: VecDeque::new(),
            control_in: VecDeque::new(),
            drop_every: None,
            snapshot_send_count: 0,
            connected: true,
        }
    }

    pub fn create_pair() -> (Self, Self) {
        (Self::new(), Self::new())
    }

    /// Simulate snapshot loss: every n-th snapshot send is silently dropped.
    /// Control messages are never dropped.
    pub fn with_snapshot_loss(mut self, drop_every: u64) -> Self {
        self.drop_every = Some(drop_every);
        self
    }

    /// Move everything this side has sent into `other`'s receive queues.
    pub fn deliver_to(&mut self, other: &mut Self) {
        other.control_in.append(&mut self.control_out);
        other.snapshot_in.append(&mut self.snapshot_out);
    }

    pub fn pending_sends(&self) -> usize {
        self.snapshot_out.len() + self.control_out.len()
    }
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for MemoryTransport {
    fn send(&mut self, message: &Message) -> Result<()> {
        if !self.connected {
            return Err(SyncError::Transport("transport closed".to_string()));
        }

        match message.channel().0 {
            Channel::Snapshot => {
                self.snapshot_send_count += 1;
                if let Some(n) = self.drop_every {
                    if self.snapshot_send_count % n == 0 {
                        return Ok(());
                    }
                }
                self.snapshot_out.push_back(message.clone());
            }
            Channel::Control => self.control_out.push_back(message.clone()),
        }

        Ok(())
    }

    fn receive(&mut self) -> Result<Option<Message>> {
        if !self.connected {
            return Err(SyncError::Transport("transport closed".to_string()));
        }

        // Control drains first so a teleport is never observed after
        // snapshots that were sent later than it.
        if let Some(message) = self.control_in.pop_front() {
            return Ok(Some(message));
        }

        Ok(self.snapshot_in.pop_front())
    }

    fn close(&mut self) -> Result<()> {
        self.connected = false;
        self.snapshot_out.clear();
        self.control_out.clear();
        self.snapshot_in.clear();
        self.control_in.clear();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::TransformState;

    #[test]
    fn test_round_trip() {
        let (mut a, mut b) = MemoryTransport::create_pair();

        a.send(&Message::snapshot(1, TransformState::IDENTITY, 0.0))
            .unwrap();
        a.deliver_to(&mut b);

        let received = b.receive().unwrap().unwrap();
        assert_eq!(received.entity_id(), 1);
        assert!(b.receive().unwrap().is_none());
    }

    #[test]
    fn test_control_drains_before_snapshots() {
        let (mut a, mut b) = MemoryTransport::create_pair();

        a.send(&Message::snapshot(1, TransformState::IDENTITY, 0.0))
            .unwrap();
        a.send(&Message::teleport(1, TransformState::IDENTITY, 0.1))
            .unwrap();
        a.deliver_to(&mut b);

        let first = b.receive().unwrap().unwrap();
        assert!(matches!(
            first.payload,
            crate::protocol::MessagePayload::Teleport { .. }
        ));
    }

    #[test]
    fn test_snapshot_loss_spares_control() {
        let (mut a, mut b) = MemoryTransport::create_pair();
        a = a.with_snapshot_loss(2);

        for i in 0..4 {
            a.send(&Message::snapshot(1, TransformState::IDENTITY, i as f64))
                .unwrap();
        }
        a.send(&Message::teleport(1, TransformState::IDENTITY, 5.0))
            .unwrap();
        a.deliver_to(&mut b);

        let mut snapshots = 0;
        let mut teleports = 0;
        while let Some(message) = b.receive().unwrap() {
            match message.payload {
                crate::protocol::MessagePayload::Snapshot { .. } => snapshots += 1,
                crate::protocol::MessagePayload::Teleport { .. } => teleports += 1,
                _ => {}
            }
        }

        assert_eq!(snapshots, 2);
        assert_eq!(teleports, 1);
    }

    #[test]
    fn test_closed_transport_errors() {
        let mut transport = MemoryTransport::new();
        transport.close().unwrap();

        assert!(!transport.is_connected());
        let result = transport.send(&Message::snapshot(1, TransformState::IDENTITY, 0.0));
        assert!(matches!(result, Err(SyncError::Transport(_))));
    }
}
