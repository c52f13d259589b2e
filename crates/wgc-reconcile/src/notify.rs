//! Tunnel change notifications.
//!
//! Notifiers must return immediately; reconciliation never waits on them.

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::record::{ChangedFields, TunnelRecord};

/// Receives tunnel lifecycle events.
pub trait TunnelNotifier: Send + Sync {
    /// A record was created for a newly discovered tunnel.
    fn on_new_tunnel(&self, record: &TunnelRecord);

    /// An existing record changed.
    fn on_tunnel_changed(&self, record: &TunnelRecord, changed: &ChangedFields);
}

/// Event delivered by [`ChannelNotifier`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TunnelEvent {
    /// A tunnel was discovered.
    New(TunnelRecord),
    /// A tunnel changed.
    Changed {
        /// Record after the change.
        record: TunnelRecord,
        /// Fields that changed.
        fields: ChangedFields,
    },
}

/// Forwards events over an unbounded channel.
///
/// Sends never block; events are dropped once the receiver is gone.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<TunnelEvent>,
}

impl ChannelNotifier {
    /// Creates a notifier and the receiving end of its channel.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TunnelEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, event: TunnelEvent) {
        if self.tx.send(event).is_err() {
            debug!("tunnel event receiver closed, dropping event");
        }
    }
}

impl TunnelNotifier for ChannelNotifier {
    fn on_new_tunnel(&self, record: &TunnelRecord) {
        self.send(TunnelEvent::New(record.clone()));
    }

    fn on_tunnel_changed(&self, record: &TunnelRecord, changed: &ChangedFields) {
        self.send(TunnelEvent::Changed {
            record: record.clone(),
            fields: changed.clone(),
        });
    }
}

/// Writes events to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl TunnelNotifier for LogNotifier {
    fn on_new_tunnel(&self, record: &TunnelRecord) {
        info!(
            tunnel_id = %record.id,
            family = %record.family,
            interface = %record.local_interface_name,
            remote_public_key = %record.remote_public_key,
            "new tunnel"
        );
    }

    fn on_tunnel_changed(&self, record: &TunnelRecord, changed: &ChangedFields) {
        debug!(tunnel_id = %record.id, fields = ?changed, "tunnel changed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::fixtures::v4_record;
    use crate::record::TunnelField;

    #[test]
    fn channel_delivers_events_in_order() {
        let (notifier, mut rx) = ChannelNotifier::new();
        let record = v4_record();
        notifier.on_new_tunnel(&record);
        let fields: ChangedFields = [TunnelField::RxBytes].into_iter().collect();
        notifier.on_tunnel_changed(&record, &fields);

        assert_eq!(rx.try_recv().ok(), Some(TunnelEvent::New(record.clone())));
        assert_eq!(
            rx.try_recv().ok(),
            Some(TunnelEvent::Changed { record, fields })
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn closed_receiver_does_not_block_or_panic() {
        let (notifier, rx) = ChannelNotifier::new();
        drop(rx);
        notifier.on_new_tunnel(&v4_record());
    }
}
