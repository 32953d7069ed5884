//! Fixed-width window of active slots with a FIFO overflow queue.

use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::{account::Account, behavior::Behavior};

/// A sender and the behavior it will perform once it gets a slot.
#[derive(Debug, Clone)]
pub struct PendingRequest {
    /// Sending account.
    pub sender: Account,
    /// Sampled behavior.
    pub behavior: Behavior,
}

/// Result of offering a request to the window.
#[derive(Debug)]
pub enum Admission {
    /// A slot was taken; the caller must run the request and later call
    /// [`SlotWindow::complete`].
    Admitted(PendingRequest),
    /// The window is full; the request waits in the queue.
    Queued,
    /// The window is closed; the request was dropped.
    Closed,
}

#[derive(Debug, Default)]
struct Slots {
    active: usize,
    peak: usize,
    queue: VecDeque<PendingRequest>,
    closed: bool,
}

/// Admission control for in-flight dispatches.
///
/// Never lets more than `width` requests be active. While anything is queued,
/// new requests queue behind it so waiting requests are served first.
#[derive(Debug)]
pub struct SlotWindow {
    width: usize,
    slots: Mutex<Slots>,
}

impl SlotWindow {
    /// Creates an empty window of `width` slots.
    pub fn new(width: usize) -> Self {
        Self { width: width.max(1), slots: Mutex::new(Slots::default()) }
    }

    /// Offers a request to the window.
    pub fn admit(&self, request: PendingRequest) -> Admission {
        let mut slots = self.slots.lock();
        if slots.closed {
            return Admission::Closed;
        }
        if slots.active < self.width && slots.queue.is_empty() {
            slots.active += 1;
            slots.peak = slots.peak.max(slots.active);
            Admission::Admitted(request)
        } else {
            slots.queue.push_back(request);
            Admission::Queued
        }
    }

    /// Releases a slot after its dispatch finished.
    ///
    /// If a request is queued, the slot passes straight to the queue head and
    /// that request is returned for the caller to run. Otherwise the slot
    /// becomes idle.
    pub fn complete(&self) -> Option<PendingRequest> {
        let mut slots = self.slots.lock();
        if !slots.closed
            && let Some(next) = slots.queue.pop_front()
        {
            return Some(next);
        }
        slots.active = slots.active.saturating_sub(1);
        None
    }

    /// Closes the window and drops every queued request.
    ///
    /// Returns the number of requests dropped.
    pub fn close(&self) -> usize {
        let mut slots = self.slots.lock();
        slots.closed = true;
        let dropped = slots.queue.len();
        slots.queue.clear();
        dropped
    }

    /// Number of active slots.
    pub fn active(&self) -> usize {
        self.slots.lock().active
    }

    /// Number of queued requests.
    pub fn pending(&self) -> usize {
        self.slots.lock().queue.len()
    }

    /// Highest number of simultaneously active slots seen.
    pub fn peak(&self) -> usize {
        self.slots.lock().peak
    }

    /// Configured width.
    pub const fn width(&self) -> usize {
        self.width
    }
}
