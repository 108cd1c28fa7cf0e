use canvascore::{ExecutionId, FlowError};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio_util::sync::CancellationToken;

type Tokens = HashMap<ExecutionId, CancellationToken>;

/// Streaming runs that can currently be cancelled, keyed by execution id
#[derive(Clone, Default)]
pub struct ActiveExecutions {
    tokens: Arc<Mutex<Tokens>>,
}

impl ActiveExecutions {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Tokens> {
        self.tokens.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `execution_id`; it stays registered until the guard drops.
    pub fn register(
        &self,
        execution_id: impl Into<ExecutionId>,
        token: CancellationToken,
    ) -> Result<Registration, FlowError> {
        let execution_id = execution_id.into();
        let mut tokens = self.lock();
        if tokens.contains_key(&execution_id) {
            return Err(FlowError::DuplicateExecution(execution_id));
        }
        tokens.insert(execution_id.clone(), token);
        tracing::debug!(execution_id = %execution_id, "Execution registered");

        Ok(Registration {
            execution_id,
            tokens: Arc::clone(&self.tokens),
        })
    }

    /// Signal cancellation. False when the id is not registered.
    pub fn cancel(&self, execution_id: &str) -> bool {
        match self.lock().get(execution_id) {
            Some(token) => {
                token.cancel();
                tracing::info!(execution_id = %execution_id, "Cancellation requested");
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, execution_id: &str) -> bool {
        self.lock().contains_key(execution_id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Removes its execution id from the registry when dropped
pub struct Registration {
    execution_id: ExecutionId,
    tokens: Arc<Mutex<Tokens>>,
}

impl Registration {
    pub fn execution_id(&self) -> &str {
        &self.execution_id
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.tokens
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.execution_id);
        tracing::debug!(execution_id = %self.execution_id, "Execution unregistered");
    }
}
