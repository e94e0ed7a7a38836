//! # Compiled per-event-type dispatchers.
//!
//! A dispatcher freezes the sorted subscription list of one concrete
//! event type into a flat call table. Each call records how many
//! `parent()` hops separate the concrete event from the view its handler
//! expects, and whether it opens a gated run of `ignore_cancelled`
//! handlers.
//!
//! ## Gated runs
//! ```text
//! [h1] [h2*] [h3*] [h4] [h5*]      * = ignore_cancelled
//!       ^gate            ^gate
//! ```
//! The cancelled probe runs once at the head of each run; a cancelled
//! event skips the whole run. Handlers outside a run always execute, and
//! handlers inside a run cannot observe a cancellation produced later in
//! the same run.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use tracing::error;

use crate::error::{panic_message, BuildError, DispatchError};
use crate::events::lineage::Lineage;
use crate::events::{Cancellable, Event};
use crate::subscribers::subscription::Subscription;

pub(crate) struct Dispatcher {
    event_name: &'static str,
    calls: Box<[Call]>,
}

struct Call {
    sub: Arc<Subscription>,
    /// `parent()` hops from the concrete event to the declared target.
    hops: usize,
    /// Head of a gated run of consecutive `ignore_cancelled` calls.
    gate_start: bool,
}

impl Dispatcher {
    /// Freezes an already-sorted subscription list into a call table.
    pub fn build(
        lineage: &Lineage,
        subscriptions: &[Arc<Subscription>],
    ) -> Result<Self, BuildError> {
        let mut calls = Vec::with_capacity(subscriptions.len());

        for (at, sub) in subscriptions.iter().enumerate() {
            let hops = lineage.hops_to(sub.target).ok_or(BuildError {
                event: lineage.name,
                target: sub.target_name,
            })?;

            let gate_start = sub.ignore_cancelled
                && (at == 0 || !subscriptions[at - 1].ignore_cancelled);

            calls.push(Call {
                sub: Arc::clone(sub),
                hops,
                gate_start,
            });
        }

        Ok(Self {
            event_name: lineage.name,
            calls: calls.into_boxed_slice(),
        })
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    /// Safe dispatch: every handler call and the post-dispatch hook are
    /// individually isolated; a failing handler is logged and the loop
    /// continues.
    pub fn dispatch(&self, event: &dyn Event) {
        let mut skipping = false;

        for call in &*self.calls {
            if call.sub.ignore_cancelled {
                if call.gate_start {
                    skipping = cancelled(event);
                }
                if skipping {
                    continue;
                }
            }

            let Some(view) = project(event, call.hops) else {
                continue;
            };

            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| (call.sub.handler)(view))) {
                error!(
                    "{}",
                    DispatchError::HandlerPanicked {
                        event: self.event_name,
                        handler: call.sub.handler_name,
                        message: panic_message(payload.as_ref()),
                    }
                );
            }
        }

        if let Err(payload) = catch_unwind(AssertUnwindSafe(|| event.post_dispatch())) {
            error!(
                "{}",
                DispatchError::PostDispatchPanicked {
                    event: self.event_name,
                    message: panic_message(payload.as_ref()),
                }
            );
        }
    }

    /// Unsafe dispatch: no per-handler isolation. The first panic
    /// propagates to the caller, skipping later handlers and the hook.
    pub fn unsafe_dispatch(&self, event: &dyn Event) {
        let mut skipping = false;

        for call in &*self.calls {
            if call.sub.ignore_cancelled {
                if call.gate_start {
                    skipping = cancelled(event);
                }
                if skipping {
                    continue;
                }
            }

            let Some(view) = project(event, call.hops) else {
                continue;
            };

            (call.sub.handler)(view);
        }

        event.post_dispatch();
    }
}

/// Walks `hops` parent links down from the concrete event.
fn project(event: &dyn Event, hops: usize) -> Option<&dyn Event> {
    let mut node = event;
    for _ in 0..hops {
        node = node.parent()?;
    }
    Some(node)
}

/// First cancellation capability on the parent chain; an event exposing
/// none is never cancelled.
fn cancelled(event: &dyn Event) -> bool {
    let mut node = Some(event);
    while let Some(current) = node {
        if let Some(cancellable) = current.as_cancellable() {
            return cancellable.is_cancelled();
        }
        node = current.parent();
    }
    false
}
