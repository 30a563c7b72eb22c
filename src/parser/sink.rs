//! Event delivery targets.

use std::collections::VecDeque;

use tracing::trace;

use crate::model::Event;

/// Non-blocking destination for parsed events.
///
/// `deliver` must never wait: backpressure, if any, belongs to whatever sits
/// behind the sink.
pub trait EventSink {
    /// Accept one event.
    fn deliver(&mut self, event: Event);
}

impl EventSink for Vec<Event> {
    fn deliver(&mut self, event: Event) {
        self.push(event);
    }
}

impl EventSink for VecDeque<Event> {
    fn deliver(&mut self, event: Event) {
        self.push_back(event);
    }
}

impl EventSink for tokio::sync::mpsc::UnboundedSender<Event> {
    fn deliver(&mut self, event: Event) {
        if self.send(event).is_err() {
            trace!("Event receiver dropped, discarding event");
        }
    }
}

impl EventSink for std::sync::mpsc::Sender<Event> {
    fn deliver(&mut self, event: Event) {
        if self.send(event).is_err() {
            trace!("Event receiver dropped, discarding event");
        }
    }
}

impl<S: EventSink + ?Sized> EventSink for &mut S {
    fn deliver(&mut self, event: Event) {
        (**self).deliver(event);
    }
}

/// Adapts a closure into a push-style sink.
pub struct FnSink<F>(pub F);

impl<F: FnMut(Event)> EventSink for FnSink<F> {
    fn deliver(&mut self, event: Event) {
        (self.0)(event);
    }
}

/// Sink that only counts what it receives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CountingSink {
    /// Events delivered so far.
    pub delivered: usize,
}

impl EventSink for CountingSink {
    fn deliver(&mut self, _event: Event) {
        self.delivered += 1;
    }
}
