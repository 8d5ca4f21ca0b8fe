use serde::{Deserialize, Serialize};
use sylva_btree::BTreeConfig;
use sylva_types::NodeId;

use crate::children::ChildKey;
use crate::error::{TreeError, TreeResult};

/// Shape parameters of stored trees.
///
/// Changing either value only affects how new records are laid out; trees
/// written under other values stay readable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeConfig {
    /// A role's child list moves into a B-tree once it holds more entries
    /// than this, and back inline below half of it.
    pub inline_threshold: usize,
    /// Maximum entries per B-tree page.
    pub btree_max_entries: usize,
}

impl TreeConfig {
    pub fn validate(&self) -> TreeResult<()> {
        if self.inline_threshold < 2 {
            return Err(TreeError::InvalidConfig(format!(
                "inline_threshold must be at least 2, got {}",
                self.inline_threshold
            )));
        }
        self.children_btree()?;
        Ok(())
    }

    pub(crate) fn children_btree(&self) -> TreeResult<BTreeConfig<ChildKey>> {
        Ok(BTreeConfig::natural().with_max_entries(self.btree_max_entries)?)
    }

    pub(crate) fn index_btree(&self) -> TreeResult<BTreeConfig<NodeId>> {
        Ok(BTreeConfig::natural().with_max_entries(self.btree_max_entries)?)
    }
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            inline_threshold: 32,
            btree_max_entries: 32,
        }
    }
}
