//! Event fan-out: one subscriber slot per event kind.
//!
//! Native callbacks may arrive on any engine thread. They are posted to an
//! unbounded inbox (posting never blocks the engine) and decoded and
//! delivered when the host's delivery context calls [`EventDispatcher::pump`].
//! Delivery holds a reentrant lock, so subscriber callbacks never run
//! concurrently and each kind is delivered in emission order.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::{Mutex, ReentrantMutex};

use crate::models::events::{
    AffiliationEvent, CallEvent, EventKind, GroupAttachmentEvent, NetworkEvent, PatchEvent,
    SignalEvent, SiteEvent,
};
use crate::processing::event_decoder::{decode, DecodedEvent};
use crate::traits::event_subscriber::Subscriber;
use crate::traits::native_bridge::{NativeEvent, NativeEventHandler};

/// Holds the current subscriber for one kind, if any.
pub struct Slot<E> {
    subscriber: Mutex<Option<Subscriber<E>>>,
}

impl<E> Slot<E> {
    fn new() -> Self {
        Self {
            subscriber: Mutex::new(None),
        }
    }

    fn set(&self, subscriber: Subscriber<E>) -> bool {
        self.subscriber.lock().replace(subscriber).is_some()
    }

    fn clear(&self) -> bool {
        self.subscriber.lock().take().is_some()
    }

    fn current(&self) -> Option<Subscriber<E>> {
        self.subscriber.lock().clone()
    }

    fn is_set(&self) -> bool {
        self.subscriber.lock().is_some()
    }
}

/// The per-kind subscriber slots.
pub struct Slots {
    output: Slot<String>,
    call: Slot<CallEvent>,
    site: Slot<SiteEvent>,
    signal: Slot<SignalEvent>,
    network: Slot<NetworkEvent>,
    patch: Slot<PatchEvent>,
    group_attachment: Slot<GroupAttachmentEvent>,
    affiliation: Slot<AffiliationEvent>,
}

impl Slots {
    fn new() -> Self {
        Self {
            output: Slot::new(),
            call: Slot::new(),
            site: Slot::new(),
            signal: Slot::new(),
            network: Slot::new(),
            patch: Slot::new(),
            group_attachment: Slot::new(),
            affiliation: Slot::new(),
        }
    }

    fn is_set(&self, kind: EventKind) -> bool {
        match kind {
            EventKind::Output => self.output.is_set(),
            EventKind::Call => self.call.is_set(),
            EventKind::Site => self.site.is_set(),
            EventKind::Signal => self.signal.is_set(),
            EventKind::Network => self.network.is_set(),
            EventKind::Patch => self.patch.is_set(),
            EventKind::GroupAttachment => self.group_attachment.is_set(),
            EventKind::Affiliation => self.affiliation.is_set(),
        }
    }
}

/// A record type with its own subscription channel.
pub trait BridgeEvent: Send + Sync + Sized + 'static {
    const KIND: EventKind;

    #[doc(hidden)]
    fn slot(slots: &Slots) -> &Slot<Self>;
}

macro_rules! bridge_event {
    ($ty:ty, $kind:ident, $field:ident) => {
        impl BridgeEvent for $ty {
            const KIND: EventKind = EventKind::$kind;

            fn slot(slots: &Slots) -> &Slot<Self> {
                &slots.$field
            }
        }
    };
}

bridge_event!(CallEvent, Call, call);
bridge_event!(SiteEvent, Site, site);
bridge_event!(SignalEvent, Signal, signal);
bridge_event!(NetworkEvent, Network, network);
bridge_event!(PatchEvent, Patch, patch);
bridge_event!(GroupAttachmentEvent, GroupAttachment, group_attachment);
bridge_event!(AffiliationEvent, Affiliation, affiliation);

/// Delivery counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DispatchStats {
    pub delivered: u64,
    /// Events dropped because nobody was subscribed to their kind.
    pub discarded: u64,
}

pub struct EventDispatcher {
    slots: Slots,
    inbox_tx: Sender<NativeEvent>,
    inbox_rx: Receiver<NativeEvent>,
    delivery: ReentrantMutex<()>,
    delivered: AtomicU64,
    discarded: AtomicU64,
}

impl EventDispatcher {
    pub fn new() -> Self {
        let (inbox_tx, inbox_rx) = unbounded();
        Self {
            slots: Slots::new(),
            inbox_tx,
            inbox_rx,
            delivery: ReentrantMutex::new(()),
            delivered: AtomicU64::new(0),
            discarded: AtomicU64::new(0),
        }
    }

    /// Handler to register with the engine's event source. Only posts.
    pub fn handler(&self) -> NativeEventHandler {
        let tx = self.inbox_tx.clone();
        Arc::new(move |event| {
            // The receiver lives as long as the dispatcher.
            let _ = tx.send(event);
        })
    }

    /// Queue an event for the next [`pump`](Self::pump). Never blocks.
    pub fn post(&self, event: NativeEvent) {
        let _ = self.inbox_tx.send(event);
    }

    /// Events waiting in the inbox.
    pub fn pending(&self) -> usize {
        self.inbox_rx.len()
    }

    /// Install `subscriber` for `E`, replacing any previous one.
    pub fn subscribe<E: BridgeEvent>(&self, subscriber: impl Fn(&E) + Send + Sync + 'static) {
        if E::slot(&self.slots).set(Arc::new(subscriber)) {
            log::debug!("Replaced subscriber on {}", E::KIND.channel_name());
        } else {
            log::debug!("Subscribed to {}", E::KIND.channel_name());
        }
    }

    pub fn unsubscribe<E: BridgeEvent>(&self) {
        if E::slot(&self.slots).clear() {
            log::debug!("Unsubscribed from {}", E::KIND.channel_name());
        }
    }

    /// Subscribe to raw engine output lines.
    pub fn subscribe_output(&self, subscriber: impl Fn(&str) + Send + Sync + 'static) {
        self.slots
            .output
            .set(Arc::new(move |line: &String| subscriber(line)));
    }

    pub fn unsubscribe_output(&self) {
        self.slots.output.clear();
    }

    pub fn is_subscribed(&self, kind: EventKind) -> bool {
        self.slots.is_set(kind)
    }

    /// Decode and deliver one event now. Returns whether a subscriber got it.
    pub fn dispatch(&self, event: NativeEvent) -> bool {
        let _delivery = self.delivery.lock();
        self.deliver(decode(event))
    }

    /// Deliver everything in the inbox. Returns the number of events handled.
    pub fn pump(&self) -> usize {
        let _delivery = self.delivery.lock();
        let mut handled = 0;
        while let Ok(event) = self.inbox_rx.try_recv() {
            self.deliver(decode(event));
            handled += 1;
        }
        handled
    }

    /// Wait up to `timeout` for the first event, then deliver everything
    /// queued.
    pub fn pump_timeout(&self, timeout: Duration) -> usize {
        let _delivery = self.delivery.lock();
        let first = match self.inbox_rx.recv_timeout(timeout) {
            Ok(event) => event,
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => return 0,
        };
        self.deliver(decode(first));
        1 + self.pump()
    }

    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            delivered: self.delivered.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
        }
    }

    fn deliver(&self, event: DecodedEvent) -> bool {
        let kind = event.kind();
        let delivered = match event {
            DecodedEvent::Output(line) => emit(&self.slots.output, &line),
            DecodedEvent::Call(e) => emit(&self.slots.call, &e),
            DecodedEvent::Site(e) => emit(&self.slots.site, &e),
            DecodedEvent::Signal(e) => emit(&self.slots.signal, &e),
            DecodedEvent::Network(e) => emit(&self.slots.network, &e),
            DecodedEvent::Patch(e) => emit(&self.slots.patch, &e),
            DecodedEvent::GroupAttachment(e) => emit(&self.slots.group_attachment, &e),
            DecodedEvent::Affiliation(e) => emit(&self.slots.affiliation, &e),
        };

        if delivered {
            self.delivered.fetch_add(1, Ordering::Relaxed);
        } else {
            self.discarded.fetch_add(1, Ordering::Relaxed);
            log::trace!("No subscriber on {}, event discarded", kind.channel_name());
        }
        delivered
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

/// The slot lock is released before the callback runs, so a subscriber may
/// (un)subscribe from inside its own callback.
fn emit<E>(slot: &Slot<E>, record: &E) -> bool {
    match slot.current() {
        Some(subscriber) => {
            subscriber(record);
            true
        }
        None => false,
    }
}
