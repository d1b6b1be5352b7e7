use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use async_trait::async_trait;
use tracing::info;

use super::Election;
use crate::Result;

/// Leadership decided by an out-of-process coordinator through
/// `/admin/leader`. Starts as follower.
#[derive(Debug)]
pub struct ExternalDecision {
    id: String,
    leader: AtomicBool,
}

impl ExternalDecision {
    pub fn new() -> Self {
        Self {
            id: nanoid::nanoid!(),
            leader: AtomicBool::new(false),
        }
    }

    pub fn leader(&self) -> bool {
        self.leader.load(Ordering::Acquire)
    }

    /// Applies the coordinator's decision, returning the previous one.
    pub fn set_leader(
        &self,
        leader: bool,
    ) -> bool {
        let previous = self.leader.swap(leader, Ordering::AcqRel);
        if previous != leader {
            info!(id = %self.id, leader, "leadership set by external decision");
        }
        previous
    }
}

impl Default for ExternalDecision {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Election for ExternalDecision {
    fn id(&self) -> String {
        self.id.clone()
    }

    async fn become_leader(&self) -> Result<bool> {
        Ok(self.leader())
    }

    async fn is_leader(&self) -> Result<bool> {
        Ok(self.leader())
    }

    async fn resign(&self) -> Result<()> {
        self.set_leader(false);
        Ok(())
    }
}
