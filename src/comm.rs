//! Communication group management
//!
//! Groups are a global, side-effecting resource, so their creation and
//! destruction are routed through the executor queue to stay ordered with
//! graph work. The manager is an explicit object handed to the executor
//! rather than a process-wide singleton.

use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::{info, warn};

use crate::error::{Error, Result};

/// Creates and destroys named groups of device ranks
pub trait CommManager: Send + Sync {
    /// Create `group_name` over `ranks`; `Ok(false)` when the group cannot be created
    fn create_group_sync(&self, group_name: &str, ranks: &[u32]) -> Result<bool>;

    /// Destroy `group_name`; `Ok(false)` when it does not exist
    fn destroy_group(&self, group_name: &str) -> Result<bool>;
}

/// In-process group registry for single-host runs
#[derive(Debug, Default)]
pub struct LocalCommManager {
    groups: RwLock<HashMap<String, Vec<u32>>>,
    world_size: Option<u32>,
}

impl LocalCommManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject ranks outside `0..world_size`
    pub fn with_world_size(world_size: u32) -> Self {
        Self {
            groups: RwLock::new(HashMap::new()),
            world_size: Some(world_size),
        }
    }

    pub fn has_group(&self, group_name: &str) -> bool {
        self.groups.read().contains_key(group_name)
    }

    pub fn group_ranks(&self, group_name: &str) -> Option<Vec<u32>> {
        self.groups.read().get(group_name).cloned()
    }

    pub fn group_count(&self) -> usize {
        self.groups.read().len()
    }
}

impl CommManager for LocalCommManager {
    fn create_group_sync(&self, group_name: &str, ranks: &[u32]) -> Result<bool> {
        if group_name.is_empty() {
            return Err(Error::comm_group(group_name, "group name cannot be empty"));
        }
        if ranks.is_empty() {
            warn!(group = %group_name, "Refusing to create a group without ranks");
            return Ok(false);
        }
        let mut sorted = ranks.to_vec();
        sorted.sort_unstable();
        if sorted.windows(2).any(|w| w[0] == w[1]) {
            return Err(Error::comm_group(group_name, "duplicate rank in group"));
        }
        if let Some(world_size) = self.world_size {
            if let Some(rank) = ranks.iter().find(|&&r| r >= world_size) {
                warn!(group = %group_name, rank, world_size, "Rank outside world");
                return Ok(false);
            }
        }

        let mut groups = self.groups.write();
        if groups.contains_key(group_name) {
            warn!(group = %group_name, "Group already exists");
            return Ok(false);
        }
        groups.insert(group_name.to_string(), ranks.to_vec());
        info!(group = %group_name, ranks = ?ranks, "Communication group created");
        Ok(true)
    }

    fn destroy_group(&self, group_name: &str) -> Result<bool> {
        let removed = self.groups.write().remove(group_name).is_some();
        if removed {
            info!(group = %group_name, "Communication group destroyed");
        } else {
            warn!(group = %group_name, "Cannot destroy unknown group");
        }
        Ok(removed)
    }
}
