//! Collective operations used during assembly.
//!
//! Assembly only ever needs three collectives:
//! - `sum_all`: reduce a counter across all processes,
//! - `combine`: sum partial values written into ghost slots onto the owner,
//! - `broadcast_to_ghosts`: copy owner values back into ghost slots.
//!
//! Vectors passed to `combine`/`broadcast_to_ghosts` are "ghosted": the
//! first `num_owned` entries belong to this process, the rest are ghosts
//! identified by their global id in a [`GhostLayout`].

use crate::error::{MfdError, Result};
use std::collections::HashMap;

/// Local/global numbering of one entity kind (cells or faces).
#[derive(Debug, Clone, PartialEq)]
pub struct GhostLayout {
    global_ids: Vec<usize>,
    num_owned: usize,
    owned_by_gid: HashMap<usize, usize>,
}

impl GhostLayout {
    /// Build a layout from the global ids of all used entities (owned first).
    pub fn new(global_ids: Vec<usize>, num_owned: usize) -> Result<Self> {
        if num_owned > global_ids.len() {
            return Err(MfdError::Invariant(format!(
                "layout has {} owned entities but only {} global ids",
                num_owned,
                global_ids.len()
            )));
        }

        let mut owned_by_gid = HashMap::with_capacity(num_owned);
        for (local, &gid) in global_ids[..num_owned].iter().enumerate() {
            if owned_by_gid.insert(gid, local).is_some() {
                return Err(MfdError::Invariant(format!(
                    "global id {} is owned twice",
                    gid
                )));
            }
        }

        Ok(Self {
            global_ids,
            num_owned,
            owned_by_gid,
        })
    }

    /// Layout where every entity is owned and global id equals local id.
    pub fn serial(count: usize) -> Self {
        Self {
            global_ids: (0..count).collect(),
            num_owned: count,
            owned_by_gid: (0..count).map(|i| (i, i)).collect(),
        }
    }

    pub fn num_owned(&self) -> usize {
        self.num_owned
    }

    pub fn num_used(&self) -> usize {
        self.global_ids.len()
    }

    pub fn global_id(&self, local: usize) -> usize {
        self.global_ids[local]
    }

    /// Owned local index carrying `gid`, if this process owns it.
    pub fn owned_index(&self, gid: usize) -> Option<usize> {
        self.owned_by_gid.get(&gid).copied()
    }

    /// Iterate `(local, gid)` over ghost entities.
    pub fn ghosts(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.global_ids
            .iter()
            .enumerate()
            .skip(self.num_owned)
            .map(|(local, &gid)| (local, gid))
    }

    fn check_len(&self, values: &[f64]) -> Result<()> {
        if values.len() != self.num_used() {
            return Err(MfdError::Invariant(format!(
                "ghosted vector has length {}, layout expects {}",
                values.len(),
                self.num_used()
            )));
        }
        Ok(())
    }
}

/// Transport for the assembly collectives.
pub trait Communicator: Send + Sync {
    fn rank(&self) -> usize;

    fn size(&self) -> usize;

    /// Sum a counter over all processes.
    fn sum_all(&self, local: usize) -> usize;

    /// Sum every ghost slot into its owner; ghost slots are zeroed afterwards.
    fn combine(&self, layout: &GhostLayout, ghosted: &mut [f64]) -> Result<()>;

    /// Overwrite every ghost slot with the owner's value.
    fn broadcast_to_ghosts(&self, layout: &GhostLayout, ghosted: &mut [f64]) -> Result<()>;
}

/// Single-process communicator.
///
/// Ghost entities must be owned by this same process under another local
/// index (e.g. periodic duplicates); a ghost whose owner is not local is an
/// invariant violation.
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialCommunicator;

impl SerialCommunicator {
    fn owner(layout: &GhostLayout, local: usize, gid: usize) -> Result<usize> {
        layout.owned_index(gid).ok_or_else(|| {
            MfdError::Invariant(format!(
                "ghost entity {} (global id {}) has no owner on a single process",
                local, gid
            ))
        })
    }
}

impl Communicator for SerialCommunicator {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn sum_all(&self, local: usize) -> usize {
        local
    }

    fn combine(&self, layout: &GhostLayout, ghosted: &mut [f64]) -> Result<()> {
        layout.check_len(ghosted)?;
        for (local, gid) in layout.ghosts() {
            let owner = Self::owner(layout, local, gid)?;
            ghosted[owner] += ghosted[local];
            ghosted[local] = 0.0;
        }
        Ok(())
    }

    fn broadcast_to_ghosts(&self, layout: &GhostLayout, ghosted: &mut [f64]) -> Result<()> {
        layout.check_len(ghosted)?;
        for (local, gid) in layout.ghosts() {
            let owner = Self::owner(layout, local, gid)?;
            ghosted[local] = ghosted[owner];
        }
        Ok(())
    }
}
