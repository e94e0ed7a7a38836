//! # Completion handle for async events.
//!
//! [`Completion`] is a clonable, set-once handle backed by
//! [`tokio_util::sync::CancellationToken`]. Events that implement
//! [`AsyncEvent`](super::AsyncEvent) embed one; `dispatch_async` returns
//! it to the publisher, and whichever subscriber finishes the
//! asynchronous work resolves it.

use std::future::Future;

use tokio_util::sync::CancellationToken;

/// Clonable, set-once completion handle.
///
/// ```rust
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// use postbus::Completion;
///
/// let handle = Completion::new();
/// let waiter = handle.clone();
///
/// handle.complete();
/// waiter.done().await;
/// # }
/// ```
#[derive(Clone, Debug, Default)]
pub struct Completion {
    token: CancellationToken,
}

impl Completion {
    /// Creates an unresolved handle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves the handle, waking every waiter. Idempotent.
    pub fn complete(&self) {
        self.token.cancel();
    }

    /// Whether the handle has been resolved.
    pub fn is_complete(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Waits until the handle is resolved.
    ///
    /// The returned future is independent of `self` and may outlive it.
    pub fn done(&self) -> impl Future<Output = ()> + Send + 'static {
        self.token.clone().cancelled_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolves_every_clone() {
        let handle = Completion::new();
        let waiter = handle.clone();
        assert!(!waiter.is_complete());

        handle.complete();
        waiter.done().await;
        assert!(waiter.is_complete());
    }

    #[tokio::test]
    async fn complete_is_idempotent() {
        let handle = Completion::new();
        handle.complete();
        handle.complete();
        handle.done().await;
    }

    #[tokio::test]
    async fn done_future_outlives_the_handle() {
        let handle = Completion::new();
        let done = handle.done();

        handle.complete();
        drop(handle);
        done.await;
    }
}
