//! Leader election among redundant adapter instances.
//!
//! Exactly one backend is active behind [`Election`]. The write path only
//! sees the read side through [`Elector`].

mod advisory_lock;
mod external;
mod scheduled;
pub use advisory_lock::*;
pub use external::*;
pub use scheduled::*;


use std::sync::Arc;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::Result;

///--------------------------------------
/// Trait Definition

#[cfg_attr(test, automock)]
#[async_trait]
pub trait Election: Send + Sync + 'static {
    /// Identifier of this instance within its election group
    fn id(&self) -> String;

    /// Tries to acquire, or re-confirm, leadership.
    ///
    /// `Ok(false)` means another instance leads. An `Err` means the check
    /// itself failed and leadership is unknown.
    async fn become_leader(&self) -> Result<bool>;

    /// Current leadership without contacting the backend
    async fn is_leader(&self) -> Result<bool>;

    /// Gives up leadership if held
    async fn resign(&self) -> Result<()>;
}

/// Read-only view of the active election backend
#[derive(Clone)]
pub struct Elector {
    election: Arc<dyn Election>,
}

impl Elector {
    pub fn new(election: Arc<dyn Election>) -> Self {
        Self { election }
    }

    pub async fn is_leader(&self) -> Result<bool> {
        self.election.is_leader().await
    }

    pub fn id(&self) -> String {
        self.election.id()
    }
}

impl std::fmt::Debug for Elector {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("Elector").field("id", &self.election.id()).finish()
    }
}
