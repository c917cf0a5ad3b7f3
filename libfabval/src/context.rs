use std::sync::Arc;

use futures::future::BoxFuture;
use libcoord::{CoordError, CoordinationClient};
use log::error;

use crate::error::FabricError;

/// Compensating action recorded while a request makes progress. Plain
/// values, not closures: the rollback sequence can be inspected and tested
/// on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UndoAction {
    /// Remove a node this request created.
    DeleteNode { path: String, recursive: bool },
    /// Put back the value a node held before this request touched it.
    /// Recreates the node when it is gone.
    WriteNode { path: String, value: Vec<u8> },
}

/// Per-request stack of compensating actions. One context spans exactly one
/// logical request and owns no persistent state; it is dropped when the
/// request ends, after [`TransactionContext::unwind`] on failure.
#[derive(Debug, Default)]
pub struct TransactionContext {
    undos: Vec<UndoAction>,
}

impl TransactionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_undo(&mut self, action: UndoAction) {
        self.undos.push(action);
    }

    /// Pending actions in registration order, for auditing.
    pub fn undos(&self) -> &[UndoAction] {
        &self.undos
    }

    /// Run every pushed action in strict reverse order. Individual failures
    /// are logged and do not stop the rollback; the triggering error is the
    /// caller's to re-raise.
    pub async fn unwind(&mut self, client: &dyn CoordinationClient) {
        while let Some(action) = self.undos.pop() {
            let res = match &action {
                UndoAction::DeleteNode { path, recursive } => {
                    client.delete_node(path, *recursive).await
                }
                UndoAction::WriteNode { path, value } => {
                    match client.update_node(path, value).await {
                        Err(CoordError::NotFound { .. }) => client.create_node(path, value).await,
                        other => other,
                    }
                }
            };
            if let Err(e) = res {
                error!("rollback step {action:?} failed: {e}");
            }
        }
    }
}

/// Run `f` with a fresh [`TransactionContext`]. On error every pushed undo
/// is executed in reverse and the original error is returned unchanged.
pub async fn with_transaction<T, F>(
    client: Arc<dyn CoordinationClient>,
    f: F,
) -> Result<T, FabricError>
where
    F: for<'a> FnOnce(&'a mut TransactionContext) -> BoxFuture<'a, Result<T, FabricError>>,
{
    let mut ctx = TransactionContext::new();
    match f(&mut ctx).await {
        Ok(v) => Ok(v),
        Err(e) => {
            ctx.unwind(client.as_ref()).await;
            Err(e)
        }
    }
}
