//! One-shot delivery of an asynchronous result.
//!
//! Every remote operation produces exactly one [`Outcome`]. The outcome is a
//! future (the awaitable convention) and can be turned into a completion
//! callback with [`Outcome::with_callback`] without running the operation a
//! second time. Failures nobody observes are reported through `tracing`
//! instead of vanishing.

use crate::error::{ClientError, Result};
use futures::FutureExt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::warn;

/// Eventual result of a remote operation.
#[must_use = "an outcome reports failures only when awaited or given a callback"]
pub struct Outcome<T> {
    rx: oneshot::Receiver<Result<T>>,
    label: String,
    observed: bool,
    /// Failures are already observed elsewhere (by a callback).
    quiet: bool,
}

/// Settling side of an [`Outcome`].
pub struct Completer<T> {
    tx: oneshot::Sender<Result<T>>,
    label: String,
    quiet: bool,
}

/// Create a pending outcome and the completer that settles it.
///
/// `label` names the operation in diagnostics.
pub fn channel<T>(label: impl Into<String>) -> (Completer<T>, Outcome<T>) {
    pair(label.into(), false)
}

fn pair<T>(label: String, quiet: bool) -> (Completer<T>, Outcome<T>) {
    let (tx, rx) = oneshot::channel();
    (
        Completer {
            tx,
            label: label.clone(),
            quiet,
        },
        Outcome {
            rx,
            label,
            observed: false,
            quiet,
        },
    )
}

/// Run `source` on the runtime and deliver its result through an outcome.
///
/// Outside a tokio runtime `source` is dropped unpolled and the outcome
/// fails with [`ClientError::Transport`].
pub fn deliver<T, F>(label: impl Into<String>, source: F) -> Outcome<T>
where
    T: Send + 'static,
    F: Future<Output = Result<T>> + Send + 'static,
{
    let (completer, outcome) = channel(label);
    match Handle::try_current() {
        Ok(runtime) => {
            runtime.spawn(async move {
                completer.settle(source.await);
            });
        }
        Err(_) => completer.settle(Err(ClientError::no_runtime())),
    }
    outcome
}

impl<T> Completer<T> {
    /// Deliver the result. A failure whose outcome was already dropped is
    /// logged.
    pub fn settle(self, result: Result<T>) {
        if let Err(Err(error)) = self.tx.send(result) {
            if !self.quiet {
                warn!(operation = %self.label, %error, "Unobserved failure");
            }
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl<T> Outcome<T> {
    /// An outcome that is already settled.
    pub fn ready(label: impl Into<String>, result: Result<T>) -> Self {
        let (completer, outcome) = channel(label);
        completer.settle(result);
        outcome
    }

    /// A failed outcome.
    pub fn failed(label: impl Into<String>, error: ClientError) -> Self {
        Self::ready(label, Err(error))
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Hand the result to `callback` once it is available.
    ///
    /// The returned outcome resolves with the same result and may be dropped
    /// freely; failures are considered observed by the callback. Must be
    /// Outside a tokio runtime the callback runs right away: with the result
    /// if it is already settled, otherwise with [`ClientError::Transport`].
    pub fn with_callback<F>(self, callback: F) -> Outcome<T>
    where
        T: Clone + Send + 'static,
        F: FnOnce(Result<T>) + Send + 'static,
    {
        let (completer, outcome) = pair(self.label.clone(), true);
        match Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    let result = self.await;
                    callback(result.clone());
                    completer.settle(result);
                });
            }
            Err(_) => {
                let result = self
                    .now_or_never()
                    .unwrap_or_else(|| Err(ClientError::no_runtime()));
                callback(result.clone());
                completer.settle(result);
            }
        }
        outcome
    }
}

impl<T> Future for Outcome<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match Pin::new(&mut this.rx).poll(cx) {
            Poll::Ready(result) => {
                this.observed = true;
                Poll::Ready(result.unwrap_or(Err(ClientError::Abandoned)))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<T> Drop for Outcome<T> {
    fn drop(&mut self) {
        if self.observed || self.quiet {
            return;
        }
        if let Ok(Err(error)) = self.rx.try_recv() {
            warn!(operation = %self.label, %error, "Unobserved failure");
        }
    }
}

impl<T> std::fmt::Debug for Outcome<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Outcome")
            .field("label", &self.label)
            .field("observed", &self.observed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_ready_outcome_resolves_immediately() {
        let outcome = Outcome::ready("op", Ok(5));
        assert_eq!(outcome.now_or_never(), Some(Ok(5)));

        let failed: Outcome<()> = Outcome::failed("op", ClientError::TransactionClosed);
        assert_eq!(failed.now_or_never(), Some(Err(ClientError::TransactionClosed)));
    }

    #[tokio::test]
    async fn test_deliver_runs_source_once_for_both_conventions() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        let outcome = deliver("op", async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<_, ClientError>("done".to_string())
        });

        let (tx, rx) = oneshot::channel();
        let awaited = outcome
            .with_callback(move |result| {
                let _ = tx.send(result);
            })
            .await;

        assert_eq!(awaited, Ok("done".to_string()));
        assert_eq!(rx.await.unwrap(), Ok("done".to_string()));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_callback_receives_failure_and_awaitable_can_be_dropped() {
        let (completer, outcome) = channel::<u32>("op");
        let (tx, rx) = oneshot::channel();
        drop(outcome.with_callback(move |result| {
            let _ = tx.send(result);
        }));

        completer.settle(Err(ClientError::Abandoned));
        assert_eq!(rx.await.unwrap(), Err(ClientError::Abandoned));
    }

    #[tokio::test]
    async fn test_dropped_completer_abandons_outcome() {
        let (completer, outcome) = channel::<u32>("op");
        drop(completer);
        assert_eq!(outcome.await, Err(ClientError::Abandoned));
    }

    #[test]
    fn test_no_runtime_settles_instead_of_panicking() {
        let outcome = deliver("op", async { Ok::<_, ClientError>(1) });
        assert_eq!(
            outcome.now_or_never(),
            Some(Err(ClientError::no_runtime()))
        );

        let seen = Arc::new(std::sync::Mutex::new(None));
        let sink = seen.clone();
        let settled = Outcome::ready("op", Ok(7u32)).with_callback(move |result| {
            *sink.lock().unwrap() = Some(result);
        });
        assert_eq!(*seen.lock().unwrap(), Some(Ok(7)));
        assert_eq!(settled.now_or_never(), Some(Ok(7)));

        let (_completer, pending) = channel::<u32>("op");
        let failed = pending.with_callback(|result| {
            assert_eq!(result, Err(ClientError::no_runtime()));
        });
        assert_eq!(failed.now_or_never(), Some(Err(ClientError::no_runtime())));
    }

    #[tokio::test]
    async fn test_unobserved_failure_does_not_panic() {
        let (completer, outcome) = channel::<u32>("op");
        drop(outcome);
        completer.settle(Err(ClientError::TransactionDiscarded));

        drop(Outcome::<u32>::failed("op", ClientError::TransactionClosed));
    }
}
