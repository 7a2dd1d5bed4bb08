//! # Result Callbacks
//!
//! The consumer-side sink of an async query. A callback is thread-affine:
//! the delivery gate only produces work for a consumer whose thread the
//! callback accepts, and the queued deliveries then run on that same thread.
//!
//! `update_ready` is a "check again" signal raised from the worker thread;
//! it may fire many times and concurrently with `get_results`.

use std::thread::{self, ThreadId};

use tokio::sync::mpsc;

use super::captured::CapturedError;
use super::results::Results;

/// Consumer sink for one async query
pub trait ResultCallback: Send + Sync {
    /// Whether deliveries may be produced on the calling thread
    fn is_for_current_thread(&self) -> bool;

    /// Fresh results, at most once per version
    fn deliver(&self, results: Results);

    /// Terminal evaluation error, at most once
    fn error(&self, error: CapturedError);

    /// New data or an error is waiting; call `get_results` again
    fn update_ready(&self);
}

/// Event forwarded by a `ChannelCallback`
#[derive(Debug, Clone)]
pub enum CallbackEvent {
    UpdateReady,
    Delivered(Results),
    Failed(CapturedError),
}

impl CallbackEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            CallbackEvent::UpdateReady => "update_ready",
            CallbackEvent::Delivered(_) => "delivered",
            CallbackEvent::Failed(_) => "failed",
        }
    }
}

/// Event sender for a callback
pub type CallbackSender = mpsc::UnboundedSender<CallbackEvent>;

/// Event receiver for a callback
pub type CallbackReceiver = mpsc::UnboundedReceiver<CallbackEvent>;

/// Which threads a callback accepts deliveries on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadAffinity {
    /// Only the given thread
    Thread(ThreadId),
    /// Any thread
    Any,
}

impl ThreadAffinity {
    pub fn current() -> Self {
        ThreadAffinity::Thread(thread::current().id())
    }

    pub fn accepts_current(&self) -> bool {
        match self {
            ThreadAffinity::Thread(id) => *id == thread::current().id(),
            ThreadAffinity::Any => true,
        }
    }
}

/// Callback that forwards every notification over an unbounded channel
///
/// Sends never block. A dropped receiver turns every notification into a
/// no-op.
#[derive(Debug)]
pub struct ChannelCallback {
    affinity: ThreadAffinity,
    sender: CallbackSender,
}

impl ChannelCallback {
    pub fn new(affinity: ThreadAffinity) -> (Self, CallbackReceiver) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { affinity, sender }, receiver)
    }

    /// A callback affine to the calling thread
    pub fn for_current_thread() -> (Self, CallbackReceiver) {
        Self::new(ThreadAffinity::current())
    }

    pub fn affinity(&self) -> ThreadAffinity {
        self.affinity
    }

    /// Whether the receiving side is gone
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    fn send(&self, event: CallbackEvent) {
        // Closed receivers are not an error: the consumer stopped listening.
        let _ = self.sender.send(event);
    }
}

impl ResultCallback for ChannelCallback {
    fn is_for_current_thread(&self) -> bool {
        self.affinity.accepts_current()
    }

    fn deliver(&self, results: Results) {
        self.send(CallbackEvent::Delivered(results));
    }

    fn error(&self, error: CapturedError) {
        self.send(CallbackEvent::Failed(error));
    }

    fn update_ready(&self) {
        self.send(CallbackEvent::UpdateReady);
    }
}
