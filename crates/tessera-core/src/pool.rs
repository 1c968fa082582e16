//! A fixed pool of compilation deployments.
//!
//! Each export borrows one deployment for its whole duration. Waiting for a
//! deployment races the batch's cancellation token, so once one export has
//! failed nobody queued behind it starts another.

use std::ops::Deref;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::director::Deployment;

#[derive(Debug)]
pub struct DeploymentPool {
    permits: Arc<Semaphore>,
    idle: Mutex<Vec<Arc<dyn Deployment>>>,
    cancel: CancellationToken,
}

impl DeploymentPool {
    pub fn new(deployments: Vec<Arc<dyn Deployment>>, cancel: CancellationToken) -> Arc<Self> {
        Arc::new(Self {
            permits: Arc::new(Semaphore::new(deployments.len())),
            idle: Mutex::new(deployments),
            cancel,
        })
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for an idle deployment. `None` once the batch is cancelled.
    pub async fn acquire(self: &Arc<Self>) -> Option<PooledDeployment> {
        let permit = tokio::select! {
            biased;
            () = self.cancel.cancelled() => return None,
            permit = Arc::clone(&self.permits).acquire_owned() => permit.ok()?,
        };
        if self.cancel.is_cancelled() {
            return None;
        }
        let deployment = self
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop()?;
        Some(PooledDeployment {
            deployment: Some(deployment),
            pool: Arc::clone(self),
            _permit: permit,
        })
    }
}

/// A borrowed deployment, returned to the pool on drop.
#[derive(Debug)]
pub struct PooledDeployment {
    deployment: Option<Arc<dyn Deployment>>,
    pool: Arc<DeploymentPool>,
    // Dropped after `Drop::drop` has put the deployment back.
    _permit: OwnedSemaphorePermit,
}

impl Deref for PooledDeployment {
    type Target = dyn Deployment;

    fn deref(&self) -> &Self::Target {
        // Only `drop` takes the deployment out.
        match &self.deployment {
            Some(deployment) => deployment.as_ref(),
            None => unreachable!("pooled deployment used after release"),
        }
    }
}

impl Drop for PooledDeployment {
    fn drop(&mut self) {
        if let Some(deployment) = self.deployment.take() {
            self.pool
                .idle
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(deployment);
        }
    }
}
