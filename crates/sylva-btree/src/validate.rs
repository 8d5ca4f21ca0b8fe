use std::cmp::Ordering;

use serde::de::DeserializeOwned;
use serde::Serialize;
use sylva_store::{ObjectStore, RecordStoreExt};
use sylva_types::Digest;

use crate::config::BTreeConfig;
use crate::error::{BTreeError, BTreeResult};
use crate::page::Page;
use crate::tree::BTree;

/// Depth and entry count of a checked subtree.
struct Checked {
    depth: usize,
    count: u64,
}

impl<K, V> BTree<K, V>
where
    K: Clone + Serialize + DeserializeOwned,
    V: Clone + Serialize + DeserializeOwned,
{
    /// Check every structural invariant, loading every page.
    ///
    /// Keys are sorted and unique, every key lies between the separators
    /// of its parent, non-root pages hold between `min_entries` and
    /// `max_entries` entries, all leaves sit at the same depth, and each
    /// child link records the true size of its subtree.
    pub fn validate<S>(&self, store: &S, config: &BTreeConfig<K>) -> BTreeResult<()>
    where
        S: ObjectStore + ?Sized,
    {
        let Some(root) = self.root() else {
            return if self.len() == 0 {
                Ok(())
            } else {
                Err(invalid(format!("empty tree claims {} entries", self.len())))
            };
        };
        let checked = check_page::<K, V, S>(store, config, &root, None, None, true)?;
        if checked.count != self.len() {
            return Err(invalid(format!(
                "handle claims {} entries, pages hold {}",
                self.len(),
                checked.count
            )));
        }
        Ok(())
    }
}

fn invalid(reason: String) -> BTreeError {
    BTreeError::Invalid(reason)
}

fn check_page<K, V, S>(
    store: &S,
    config: &BTreeConfig<K>,
    digest: &Digest,
    lower: Option<&K>,
    upper: Option<&K>,
    is_root: bool,
) -> BTreeResult<Checked>
where
    K: Clone + Serialize + DeserializeOwned,
    V: Clone + Serialize + DeserializeOwned,
    S: ObjectStore + ?Sized,
{
    let page: Page<K, V> = store.load(digest)?;
    let n = page.entries.len();
    let at = digest.short_hex();

    let min = if is_root { 1 } else { config.min_entries() };
    if n < min || n > config.max_entries() {
        return Err(invalid(format!(
            "page {at} holds {n} entries, allowed {min}..={}",
            config.max_entries()
        )));
    }
    for pair in page.entries.windows(2) {
        if config.compare(&pair[0].0, &pair[1].0) != Ordering::Less {
            return Err(invalid(format!("page {at} keys not strictly increasing")));
        }
    }
    let (first, last) = (&page.entries[0].0, &page.entries[n - 1].0);
    if lower.is_some_and(|lo| config.compare(lo, first) != Ordering::Less) {
        return Err(invalid(format!("page {at} violates its lower separator")));
    }
    if upper.is_some_and(|hi| config.compare(last, hi) != Ordering::Less) {
        return Err(invalid(format!("page {at} violates its upper separator")));
    }

    if page.is_leaf() {
        return Ok(Checked {
            depth: 1,
            count: n as u64,
        });
    }
    if page.children.len() != n + 1 {
        return Err(invalid(format!(
            "page {at} has {n} entries but {} children",
            page.children.len()
        )));
    }

    let mut depth = None;
    let mut count = n as u64;
    for (i, child) in page.children.iter().enumerate() {
        let lo = if i == 0 { lower } else { Some(&page.entries[i - 1].0) };
        let hi = if i == n { upper } else { Some(&page.entries[i].0) };
        let checked = check_page::<K, V, S>(store, config, &child.digest, lo, hi, false)?;
        if checked.count != child.count {
            return Err(invalid(format!(
                "page {at} child {i} link says {} entries, subtree holds {}",
                child.count, checked.count
            )));
        }
        match depth {
            None => depth = Some(checked.depth),
            Some(d) if d != checked.depth => {
                return Err(invalid(format!("page {at} has leaves at uneven depth")));
            }
            Some(_) => {}
        }
        count += checked.count;
    }
    Ok(Checked {
        depth: depth.unwrap_or(0) + 1,
        count,
    })
}
