//! Typed event bus for the local bindings.
//!
//! Every launched run gets a route; its stdout lines, stderr lines and
//! completion are published to topics addressed by that route and fanned
//! out to the route's single subscriber. Quick chat is not session scoped
//! and uses three global topics instead. Each quick-chat subscription
//! carries a generation number; events stamped with an older generation
//! belong to a superseded request and are dropped.
//!
//! Subscribe before the producer starts: events published to a route with
//! no subscriber are dropped.

use super::quick::QuickEvent;
use super::StreamEvent;
use crate::model::RouteId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use tokio::sync::mpsc;
use tracing::trace;

// ===== Topic =====

/// Addressable channel on the bus.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Stdout lines of a route.
    Output(RouteId),
    /// Stderr lines of a route.
    Error(RouteId),
    /// End of a route.
    Complete(RouteId),
    /// Quick-chat reply text.
    QuickChunk,
    /// Quick-chat failure.
    QuickError,
    /// Quick-chat end of reply.
    QuickDone,
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topic::Output(route) => write!(f, "chat-output:{}", route),
            Topic::Error(route) => write!(f, "chat-error:{}", route),
            Topic::Complete(route) => write!(f, "chat-complete:{}", route),
            Topic::QuickChunk => f.write_str("quick-chat-chunk"),
            Topic::QuickError => f.write_str("quick-chat-error"),
            Topic::QuickDone => f.write_str("quick-chat-done"),
        }
    }
}

// ===== BusEvent =====

/// Something published on the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusEvent {
    /// Event of a launched run.
    Chat {
        /// Route the event is addressed to.
        route: RouteId,
        /// The event itself.
        event: StreamEvent,
    },
    /// Quick-chat reply event.
    Quick {
        /// Generation of the subscription the producing request belongs to.
        generation: u64,
        /// The event itself.
        event: QuickEvent,
    },
}

impl BusEvent {
    /// Topic the event is published on.
    pub fn topic(&self) -> Topic {
        match self {
            BusEvent::Chat { route, event } => match event {
                StreamEvent::Output(_) => Topic::Output(route.clone()),
                StreamEvent::Error(_) => Topic::Error(route.clone()),
                StreamEvent::Complete { .. } | StreamEvent::Disconnected(_) => {
                    Topic::Complete(route.clone())
                }
            },
            BusEvent::Quick { event, .. } => match event {
                QuickEvent::Chunk(_) => Topic::QuickChunk,
                QuickEvent::Error(_) => Topic::QuickError,
                QuickEvent::Done { .. } => Topic::QuickDone,
            },
        }
    }
}

// ===== EventBus =====

/// Receiving end of the quick-chat topics for one request.
#[derive(Debug)]
pub struct QuickSubscription {
    /// Stamp for every event the request publishes.
    pub generation: u64,
    /// Events of this request, in publish order.
    pub events: mpsc::UnboundedReceiver<QuickEvent>,
}

#[derive(Debug, Default)]
struct QuickSlot {
    generation: u64,
    sender: Option<mpsc::UnboundedSender<QuickEvent>>,
}

/// Routes published events to their single subscriber.
#[derive(Debug, Default)]
pub struct EventBus {
    routes: Mutex<HashMap<RouteId, mpsc::UnboundedSender<StreamEvent>>>,
    quick: Mutex<QuickSlot>,
}

impl EventBus {
    /// An empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to every topic of `route`. A second subscription to the
    /// same route replaces the first.
    pub fn subscribe(&self, route: &RouteId) -> mpsc::UnboundedReceiver<StreamEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.routes.lock().insert(route.clone(), tx);
        rx
    }

    /// Subscribe to the global quick-chat topics, replacing any previous
    /// subscriber. Events published with an earlier generation are dropped
    /// from now on.
    pub fn subscribe_quick(&self) -> QuickSubscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut slot = self.quick.lock();
        slot.generation += 1;
        slot.sender = Some(tx);
        QuickSubscription {
            generation: slot.generation,
            events: rx,
        }
    }

    /// Drop the subscriber of `route`, if any.
    pub fn unsubscribe(&self, route: &RouteId) {
        self.routes.lock().remove(route);
    }

    /// Whether `route` has a live subscriber.
    pub fn is_subscribed(&self, route: &RouteId) -> bool {
        self.routes.lock().contains_key(route)
    }

    /// Deliver `event`. Returns whether a live subscriber received it.
    ///
    /// A final chat event (completion, disconnect) also retires the route.
    pub fn publish(&self, event: BusEvent) -> bool {
        let topic = event.topic();
        let delivered = match event {
            BusEvent::Chat { route, event } => {
                let mut routes = self.routes.lock();
                let is_final = event.is_final();
                let delivered = routes
                    .get(&route)
                    .map(|tx| tx.send(event).is_ok())
                    .unwrap_or(false);
                if is_final || !delivered {
                    routes.remove(&route);
                }
                delivered
            }
            BusEvent::Quick { generation, event } => {
                let mut slot = self.quick.lock();
                if generation != slot.generation {
                    trace!(
                        topic = %topic,
                        generation,
                        current = slot.generation,
                        "Dropping event of superseded quick chat request"
                    );
                    return false;
                }
                let delivered = slot
                    .sender
                    .as_ref()
                    .map(|tx| tx.send(event).is_ok())
                    .unwrap_or(false);
                if !delivered {
                    slot.sender = None;
                }
                delivered
            }
        };
        if !delivered {
            trace!(topic = %topic, "No subscriber for bus event");
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(route: &RouteId, line: &str) -> BusEvent {
        BusEvent::Chat {
            route: route.clone(),
            event: StreamEvent::Output(line.to_string()),
        }
    }

    #[test]
    fn topic_names_match_channel_convention() {
        let route = RouteId::new("abc").unwrap();
        assert_eq!(Topic::Output(route.clone()).to_string(), "chat-output:abc");
        assert_eq!(Topic::Error(route.clone()).to_string(), "chat-error:abc");
        assert_eq!(Topic::Complete(route).to_string(), "chat-complete:abc");
        assert_eq!(Topic::QuickChunk.to_string(), "quick-chat-chunk");
        assert_eq!(Topic::QuickDone.to_string(), "quick-chat-done");
    }

    #[test]
    fn events_reach_only_their_route() {
        let bus = EventBus::new();
        let a = RouteId::generate();
        let b = RouteId::generate();
        let mut rx_a = bus.subscribe(&a);
        let mut rx_b = bus.subscribe(&b);

        assert!(bus.publish(output(&a, "for a")));
        assert!(bus.publish(output(&b, "for b")));

        assert_eq!(rx_a.try_recv().unwrap(), StreamEvent::Output("for a".to_string()));
        assert!(rx_a.try_recv().is_err());
        assert_eq!(rx_b.try_recv().unwrap(), StreamEvent::Output("for b".to_string()));
    }

    #[test]
    fn completion_retires_route() {
        let bus = EventBus::new();
        let route = RouteId::generate();
        let mut rx = bus.subscribe(&route);

        bus.publish(BusEvent::Chat {
            route: route.clone(),
            event: StreamEvent::Complete { success: true },
        });

        assert!(!bus.is_subscribed(&route));
        assert_eq!(rx.try_recv().unwrap(), StreamEvent::Complete { success: true });
        assert!(!bus.publish(output(&route, "late")));
    }

    #[test]
    fn publish_without_subscriber_is_dropped() {
        let bus = EventBus::new();
        assert!(!bus.publish(output(&RouteId::generate(), "nobody")));
    }

    #[test]
    fn dropped_receiver_unsubscribes() {
        let bus = EventBus::new();
        let route = RouteId::generate();
        drop(bus.subscribe(&route));
        assert!(!bus.publish(output(&route, "x")));
        assert!(!bus.is_subscribed(&route));
    }

    fn quick(generation: u64, event: QuickEvent) -> BusEvent {
        BusEvent::Quick { generation, event }
    }

    #[test]
    fn quick_topics_are_global() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe_quick();
        let generation = sub.generation;
        assert!(bus.publish(quick(generation, QuickEvent::Chunk("he".to_string()))));
        assert!(bus.publish(quick(generation, QuickEvent::Done { success: true })));
        assert_eq!(sub.events.try_recv().unwrap(), QuickEvent::Chunk("he".to_string()));
        assert_eq!(sub.events.try_recv().unwrap(), QuickEvent::Done { success: true });
    }

    #[test]
    fn superseded_quick_request_cannot_reach_new_subscriber() {
        // GIVEN: A first request whose subscription was replaced by a second
        let bus = EventBus::new();
        let first = bus.subscribe_quick();
        let mut second = bus.subscribe_quick();
        assert_ne!(first.generation, second.generation);

        // WHEN: The first request still finishes after being cancelled
        let delivered = bus.publish(quick(first.generation, QuickEvent::Done { success: false }));

        // THEN: Its Done is dropped and the second request's events flow
        assert!(!delivered);
        assert!(bus.publish(quick(second.generation, QuickEvent::Chunk("ok".to_string()))));
        assert_eq!(second.events.try_recv().unwrap(), QuickEvent::Chunk("ok".to_string()));
        assert!(second.events.try_recv().is_err());
    }
}
