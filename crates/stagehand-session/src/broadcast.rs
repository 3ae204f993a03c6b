//! Fan-out of server messages to many sessions.
//!
//! Every recipient gets its own rendering of the message (its
//! [`ClientContext`](stagehand_protocol::ClientContext) may change the
//! payload) and every enqueue is non-blocking: a full queue drops the frame
//! for that recipient only.

use std::sync::Arc;

use stagehand_protocol::{Batch, CharId, Packet, encode};

use crate::SessionHandle;

/// Sends `packet` to every recipient except `exclude`.
///
/// Returns how many recipients accepted the frame.
pub fn fan_out<'a, P>(
    recipients: impl IntoIterator<Item = &'a Arc<SessionHandle>>,
    packet: &P,
    exclude: Option<CharId>,
) -> usize
where
    P: Packet + ?Sized,
{
    recipients
        .into_iter()
        .filter(|session| Some(session.char_id()) != exclude)
        .filter(|session| session.try_send(encode(packet, session.context())))
        .count()
}

/// Sends `packets` as one terminated batch to every recipient except
/// `exclude`. An empty `packets` slice sends nothing.
///
/// Returns how many recipients accepted the batch.
pub fn fan_out_batch<'a>(
    recipients: impl IntoIterator<Item = &'a Arc<SessionHandle>>,
    packets: &[&dyn Packet],
    exclude: Option<CharId>,
) -> usize {
    if packets.is_empty() {
        return 0;
    }
    recipients
        .into_iter()
        .filter(|session| Some(session.char_id()) != exclude)
        .filter(|session| {
            let mut batch = Batch::new();
            for packet in packets {
                batch.push(*packet, session.context());
            }
            batch.finish().is_some_and(|frame| session.try_send(frame))
        })
        .count()
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use stagehand_protocol::{ClientContext, DeleteObject, ObjectId, StageDestruct};
    use tokio::sync::mpsc;

    use super::*;
    use crate::{SessionConfig, SessionId};

    fn session(id: u32, capacity: usize) -> (Arc<SessionHandle>, mpsc::Receiver<Bytes>) {
        SessionHandle::channel(
            SessionId(u64::from(id)),
            CharId(id),
            ClientContext::default(),
            &SessionConfig {
                outbound_queue_capacity: capacity,
            },
        )
    }

    #[test]
    fn test_fan_out_skips_excluded_recipient() {
        let (a, mut rx_a) = session(1, 4);
        let (b, mut rx_b) = session(2, 4);

        let delivered = fan_out([&a, &b], &StageDestruct, Some(CharId(1)));

        assert_eq!(delivered, 1);
        assert!(rx_a.try_recv().is_err());
        assert_eq!(&rx_b.try_recv().unwrap()[..], &[0x00, 0x21]);
    }

    #[test]
    fn test_fan_out_full_recipient_does_not_block_others() {
        let (slow, _rx_slow) = session(1, 1);
        let (fast, mut rx_fast) = session(2, 4);
        assert!(slow.try_send(Bytes::from_static(b"filler")));

        let delivered = fan_out([&slow, &fast], &StageDestruct, None);

        assert_eq!(delivered, 1);
        assert!(rx_fast.try_recv().is_ok());
    }

    #[test]
    fn test_fan_out_batch_terminates_with_end() {
        let (a, mut rx) = session(1, 4);
        let first = DeleteObject {
            object_id: ObjectId::from_slot(1),
        };
        let second = DeleteObject {
            object_id: ObjectId::from_slot(2),
        };

        fan_out_batch([&a], &[&first, &second], None);

        let frame = rx.try_recv().unwrap();
        assert_eq!(frame.len(), 6 + 6 + 2);
        assert_eq!(&frame[frame.len() - 2..], &[0x00, 0x10]);
    }

    #[test]
    fn test_fan_out_batch_empty_sends_nothing() {
        let (a, mut rx) = session(1, 4);

        assert_eq!(fan_out_batch([&a], &[], None), 0);
        assert!(rx.try_recv().is_err());
    }
}
