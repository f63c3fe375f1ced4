//! Batched invocations.
//!
//! Invocations appended to a [`Transaction`] are queued locally and sent as a
//! single `invokeBatch` request on commit. The server answers with one result
//! per queued invocation, in order, and each result settles the outcome that
//! was handed out when the invocation was appended.

use crate::error::ClientError;
use crate::outcome::{channel, deliver, Completer, Outcome};
use crate::proxy::{RemoteObject, Returned};
use crate::session::SessionShared;
use parking_lot::Mutex;
use rom_types::{Invocation, ObjectId, ParamMap, ParamType, Reply, Request};
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Open,
    Committed,
    Discarded,
}

struct PendingOperation {
    target: RemoteObject,
    invocation: Invocation,
    returns: Option<ParamType>,
    completer: Completer<Returned>,
}

struct TxState {
    status: Status,
    pending: Vec<PendingOperation>,
}

struct TransactionInner {
    id: Uuid,
    session: Arc<SessionShared>,
    state: Mutex<TxState>,
}

/// An ordered batch of invocations committed as one request.
#[derive(Clone)]
pub struct Transaction {
    inner: Arc<TransactionInner>,
}

impl Transaction {
    pub(crate) fn new(session: Arc<SessionShared>) -> Self {
        let id = Uuid::new_v4();
        debug!("Began transaction {}", id);
        Self {
            inner: Arc::new(TransactionInner {
                id,
                session,
                state: Mutex::new(TxState {
                    status: Status::Open,
                    pending: Vec::new(),
                }),
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn is_open(&self) -> bool {
        self.inner.state.lock().status == Status::Open
    }

    /// Number of queued invocations.
    pub fn len(&self) -> usize {
        self.inner.state.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Queue `operation` on `target`. Same as `target.invoke(Some(self), ..)`.
    pub fn append(
        &self,
        target: &RemoteObject,
        operation: &str,
        params: ParamMap,
    ) -> Outcome<Returned> {
        target.invoke(Some(self), operation, params)
    }

    /// Queue an already validated invocation.
    pub(crate) fn enqueue(
        &self,
        target: RemoteObject,
        invocation: Invocation,
        returns: Option<ParamType>,
        label: String,
    ) -> Outcome<Returned> {
        let mut state = self.inner.state.lock();
        if state.status != Status::Open {
            return Outcome::failed(label, ClientError::TransactionClosed);
        }
        let (completer, outcome) = channel(label);
        state.pending.push(PendingOperation {
            target,
            invocation,
            returns,
            completer,
        });
        outcome
    }

    /// Send every queued invocation as one batch.
    ///
    /// The returned outcome settles once all per-operation outcomes have been
    /// settled. Invocations whose target was released after they were queued
    /// are left out of the batch and fail with
    /// [`ClientError::ObjectReleased`]. An empty transaction commits without
    /// contacting the server. Outside a tokio runtime the commit fails and the
    /// transaction stays open.
    pub fn commit(&self) -> Outcome<()> {
        let label = format!("transaction {}", self.inner.id);
        let pending = {
            let mut state = self.inner.state.lock();
            if state.status != Status::Open {
                return Outcome::failed(label, ClientError::TransactionClosed);
            }
            if !state.pending.is_empty() && Handle::try_current().is_err() {
                return Outcome::failed(label, ClientError::no_runtime());
            }
            state.status = Status::Committed;
            std::mem::take(&mut state.pending)
        };

        let (pending, released): (Vec<_>, Vec<_>) =
            pending.into_iter().partition(|op| !op.target.is_released());
        for op in released {
            debug!("Dropping {} on released {}", op.invocation.operation, op.target.id());
            let error = ClientError::ObjectReleased {
                id: op.target.id().clone(),
            };
            op.completer.settle(Err(error));
        }

        if pending.is_empty() {
            debug!("Committed empty transaction {}", self.inner.id);
            return Outcome::ready(label, Ok(()));
        }

        let request = Request::InvokeBatch {
            operations: pending.iter().map(|op| op.invocation.clone()).collect(),
        };
        let mut notified: Vec<&ObjectId> = Vec::new();
        for op in &pending {
            if !notified.contains(&op.target.id()) {
                notified.push(op.target.id());
                op.target.emit_transport(&request);
            }
        }
        info!(
            "Committing transaction {} with {} operations",
            self.inner.id,
            pending.len()
        );

        let session = self.inner.session.clone();
        deliver(label, async move {
            let result = match session.transport().send(request).await {
                Ok(Reply::Values { values }) if values.len() == pending.len() => Ok(values),
                Ok(Reply::Values { values }) => Err(ClientError::Protocol(format!(
                    "batch of {} operations answered with {} results",
                    pending.len(),
                    values.len()
                ))),
                Ok(other) => Err(ClientError::Protocol(format!(
                    "unexpected reply to invokeBatch: {:?}",
                    other
                ))),
                Err(e) => Err(ClientError::from_transport("invokeBatch", e)),
            };

            match result {
                Ok(values) => {
                    for (op, value) in pending.into_iter().zip(values) {
                        let returned = op.target.returned(value, op.returns.as_ref());
                        op.completer.settle(Ok(returned));
                    }
                    Ok(())
                }
                Err(error) => {
                    warn!("Transaction failed: {}", error);
                    for op in pending {
                        op.completer.settle(Err(error.clone()));
                    }
                    Err(error)
                }
            }
        })
    }

    /// Drop every queued invocation without sending anything. Their outcomes
    /// fail with [`ClientError::TransactionDiscarded`]. Returns how many were
    /// dropped.
    pub fn discard(&self) -> Result<usize, ClientError> {
        let pending = {
            let mut state = self.inner.state.lock();
            if state.status != Status::Open {
                return Err(ClientError::TransactionClosed);
            }
            state.status = Status::Discarded;
            std::mem::take(&mut state.pending)
        };

        let count = pending.len();
        for op in pending {
            op.completer.settle(Err(ClientError::TransactionDiscarded));
        }
        debug!("Discarded transaction {} ({} operations)", self.inner.id, count);
        Ok(count)
    }
}

impl Drop for TransactionInner {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if state.status != Status::Open || state.pending.is_empty() {
            return;
        }
        warn!(
            "Transaction {} dropped with {} uncommitted operations",
            self.id,
            state.pending.len()
        );
        state.status = Status::Discarded;
        for op in state.pending.drain(..) {
            op.completer.settle(Err(ClientError::TransactionDiscarded));
        }
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Transaction")
            .field("id", &self.inner.id)
            .field("status", &state.status)
            .field("pending", &state.pending.len())
            .finish()
    }
}
