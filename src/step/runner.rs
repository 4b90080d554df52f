//! Durable step boundaries

use super::ledger::{LedgerError, StepLedger};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Failure of a step's side effect, classified for retry
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EffectError {
    /// Transient failure; re-running the workflow may succeed
    #[error("{0}")]
    Retriable(String),

    /// Retrying cannot help
    #[error("{0}")]
    Permanent(String),
}

impl EffectError {
    pub fn retriable(message: impl Into<String>) -> Self {
        Self::Retriable(message.into())
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self::Permanent(message.into())
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retriable(_))
    }
}

#[derive(Debug, Error)]
pub enum StepError {
    #[error("step {key} failed: {source}")]
    Effect {
        key: String,
        #[source]
        source: EffectError,
    },

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Runs side effects at most once per `(run_id, step_key)`
///
/// A completed step's recorded result is returned on every later call with
/// the same key, without invoking the effect again. Failed effects leave the
/// step pending so a retried run attempts them again.
#[derive(Clone)]
pub struct StepRunner {
    run_id: String,
    ledger: Arc<dyn StepLedger>,
}

impl fmt::Debug for StepRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepRunner")
            .field("run_id", &self.run_id)
            .finish_non_exhaustive()
    }
}

impl StepRunner {
    pub fn new(run_id: impl Into<String>, ledger: Arc<dyn StepLedger>) -> Self {
        Self {
            run_id: run_id.into(),
            ledger,
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Recorded result of a completed step, if there is one
    ///
    /// Lets an executor skip preparation that only the effect needs, such as
    /// reading a secret, when the step will be replayed anyway.
    pub fn completed(&self, step_key: &str) -> Result<Option<Value>, StepError> {
        let record = self.ledger.get(&self.run_id, step_key)?;
        Ok(record.and_then(|record| record.result().cloned()))
    }

    pub async fn run<F, Fut>(&self, step_key: &str, effect: F) -> Result<Value, StepError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value, EffectError>>,
    {
        if let Some(result) = self.completed(step_key)? {
            debug!(run_id = %self.run_id, step_key, "Step already completed, reusing result");
            return Ok(result);
        }

        self.ledger.mark_pending(&self.run_id, step_key)?;
        let result = effect().await.map_err(|source| StepError::Effect {
            key: step_key.to_string(),
            source,
        })?;

        let stored = self.ledger.complete(&self.run_id, step_key, result)?;
        debug!(run_id = %self.run_id, step_key, "Step completed");
        Ok(stored)
    }

    /// Like [`run`](Self::run) for any serde type
    pub async fn run_json<T, F, Fut>(&self, step_key: &str, effect: F) -> Result<T, StepError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, EffectError>>,
    {
        let value = self
            .run(step_key, || async move {
                let typed = effect().await?;
                serde_json::to_value(typed).map_err(|e| {
                    EffectError::permanent(format!("result is not serializable: {}", e))
                })
            })
            .await?;

        serde_json::from_value(value).map_err(|source| {
            StepError::Ledger(LedgerError::Corrupt {
                step_key: step_key.to_string(),
                source,
            })
        })
    }
}
