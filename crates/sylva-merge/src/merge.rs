//! Three-way merge of model trees.
//!
//! Both sides are diffed against the common base, the two change sets are
//! unioned, and the union is applied to the base in a canonical order:
//!
//! 1. node additions, parents before children, then by id
//! 2. moves, the winning side's first, each side by id
//! 3. concept, property and reference changes, by node and field
//! 4. removals, by id
//!
//! The order depends only on which side wins, never on which side is passed
//! as `left`, so under [`ConflictPolicy::LastWriterWins`] the result is the
//! same for either argument order.
//!
//! [`ConflictPolicy::LastWriterWins`]: crate::ConflictPolicy::LastWriterWins

use std::collections::{BTreeMap, BTreeSet, HashSet};

use sylva_diff::{diff_trees, Change, Placement, TreeDiff};
use sylva_tree::{Tree, TreeError};
use sylva_types::{Digest, NodeId, TemporalAnchor};
use tracing::{debug, info, warn};

use crate::conflict::{Conflict, Slot, SlotValue};
use crate::error::{MergeError, MergeResult};
use crate::policy::{MergeOptions, MergeSide};

/// One side of a merge: its tree plus the version metadata used by
/// last-writer-wins.
#[derive(Clone, Copy, Debug)]
pub struct MergeInput<'a> {
    pub tree: &'a Tree,
    pub timestamp: TemporalAnchor,
    pub version: Digest,
}

impl<'a> MergeInput<'a> {
    pub fn new(tree: &'a Tree, timestamp: TemporalAnchor, version: Digest) -> Self {
        Self {
            tree,
            timestamp,
            version,
        }
    }

    fn order_key(&self) -> (TemporalAnchor, Digest) {
        (self.timestamp, self.version)
    }
}

/// The merged tree and every conflict that was resolved to produce it.
#[derive(Clone, Debug)]
pub struct MergeOutcome {
    pub tree: Tree,
    pub conflicts: Vec<Conflict>,
}

impl MergeOutcome {
    pub fn is_clean(&self) -> bool {
        self.conflicts.is_empty()
    }
}

/// Merge `left` and `right`, both descended from `base`.
pub fn merge_trees(
    base: &Tree,
    left: MergeInput<'_>,
    right: MergeInput<'_>,
    options: &MergeOptions,
) -> MergeResult<MergeOutcome> {
    let clean = |tree: &Tree| -> MergeResult<MergeOutcome> {
        Ok(MergeOutcome {
            tree: tree.clone(),
            conflicts: Vec::new(),
        })
    };
    if left.tree.digest() == right.tree.digest() || right.tree.digest() == base.digest() {
        return clean(left.tree);
    }
    if left.tree.digest() == base.digest() {
        return clean(right.tree);
    }

    let winner_side = options.policy.winner(left.order_key(), right.order_key());
    let (winner, loser) = match winner_side {
        MergeSide::Left => (left, right),
        MergeSide::Right => (right, left),
    };
    let winner = SideChanges::collect(winner_side, diff_trees(base, winner.tree)?);
    let loser = SideChanges::collect(winner_side.other(), diff_trees(base, loser.tree)?);

    let mut conflicts = Vec::new();
    let removals = surviving_removals(base, &winner, &loser, &mut conflicts)?;

    let mut tree = base.clone();
    tree = apply_additions(tree, &winner, &loser)?;
    let (winner_moves, loser_moves) = split_moves(&winner, &loser, &mut conflicts);
    tree = apply_moves(tree, winner_moves, winner.side, &mut conflicts)?;
    tree = apply_moves(tree, loser_moves, loser.side, &mut conflicts)?;
    tree = apply_fields(tree, &winner, &loser, &mut conflicts)?;
    for id in removals {
        if tree.contains(id)? {
            tree = tree.remove_node(id)?;
        }
    }

    info!(
        base = %base.digest().short_hex(),
        merged = %tree.digest().short_hex(),
        winner = ?winner_side,
        conflicts = conflicts.len(),
        "merged trees"
    );
    if options.fail_on_conflict && !conflicts.is_empty() {
        return Err(MergeError::Conflicts(conflicts));
    }
    Ok(MergeOutcome { tree, conflicts })
}

/// One side's diff against the base, grouped by kind.
struct SideChanges {
    side: MergeSide,
    additions: BTreeMap<NodeId, (Placement, Option<String>)>,
    moves: BTreeMap<NodeId, Placement>,
    removals: BTreeSet<NodeId>,
    fields: BTreeMap<(NodeId, Slot), SlotValue>,
}

impl SideChanges {
    fn collect(side: MergeSide, diff: TreeDiff) -> Self {
        let mut changes = Self {
            side,
            additions: BTreeMap::new(),
            moves: BTreeMap::new(),
            removals: BTreeSet::new(),
            fields: BTreeMap::new(),
        };
        for change in diff.changes {
            match change {
                Change::NodeAdded {
                    id,
                    placement,
                    concept,
                } => {
                    changes.additions.insert(id, (placement, concept));
                }
                Change::NodeMoved { id, to, .. } => {
                    changes.moves.insert(id, to);
                }
                Change::NodeRemoved { id, .. } => {
                    changes.removals.insert(id);
                }
                Change::ConceptChanged { id, new, .. } => {
                    changes.fields.insert((id, Slot::Concept), SlotValue::Text(new));
                }
                Change::PropertySet { id, role, new, .. } => {
                    changes
                        .fields
                        .insert((id, Slot::Property(role)), SlotValue::Text(Some(new)));
                }
                Change::PropertyRemoved { id, role, .. } => {
                    changes
                        .fields
                        .insert((id, Slot::Property(role)), SlotValue::Text(None));
                }
                Change::ReferenceSet { id, role, new, .. } => {
                    changes
                        .fields
                        .insert((id, Slot::Reference(role)), SlotValue::Reference(Some(new)));
                }
                Change::ReferenceRemoved { id, role, .. } => {
                    changes
                        .fields
                        .insert((id, Slot::Reference(role)), SlotValue::Reference(None));
                }
            }
        }
        changes
    }

    /// Base nodes this side edited, moved, or placed something under.
    fn touched(&self) -> HashSet<NodeId> {
        let mut touched: HashSet<NodeId> = self.fields.keys().map(|(id, _)| *id).collect();
        touched.extend(self.moves.keys().copied());
        touched.extend(self.moves.values().map(|p| p.parent));
        touched.extend(self.additions.values().map(|(p, _)| p.parent));
        touched
    }
}

/// Removals that survive resurrection, in id order.
///
/// A removal is dropped when the other side touched any node of the
/// removed subtree as it was in the base.
fn surviving_removals(
    base: &Tree,
    winner: &SideChanges,
    loser: &SideChanges,
    conflicts: &mut Vec<Conflict>,
) -> MergeResult<BTreeSet<NodeId>> {
    let mut removals = BTreeSet::new();
    for (remover, other) in [(winner, loser), (loser, winner)] {
        let touched = other.touched();
        for &id in &remover.removals {
            if other.removals.contains(&id) {
                removals.insert(id);
                continue;
            }
            let edited = base.subtree(id)?.iter().any(|n| touched.contains(n));
            if edited {
                debug!(node = %id, removed_by = ?remover.side, "kept removed subtree edited on the other side");
                conflicts.push(Conflict::DeleteEdit {
                    node: id,
                    removed_by: remover.side,
                });
            } else {
                removals.insert(id);
            }
        }
    }
    Ok(removals)
}

fn apply_additions(mut tree: Tree, winner: &SideChanges, loser: &SideChanges) -> MergeResult<Tree> {
    let mut additions = loser.additions.clone();
    additions.extend(winner.additions.clone());

    let mut pending: Vec<_> = additions.into_iter().collect();
    while !pending.is_empty() {
        let before = pending.len();
        let mut waiting = Vec::new();
        for (id, (placement, concept)) in pending {
            if tree.contains(placement.parent)? {
                tree = tree.add_child_at(
                    placement.parent,
                    &placement.role,
                    placement.position,
                    id,
                    concept,
                )?;
            } else {
                waiting.push((id, (placement, concept)));
            }
        }
        if waiting.len() == before {
            for (id, (placement, _)) in &waiting {
                warn!(node = %id, parent = %placement.parent, "dropped addition under a missing parent");
            }
            break;
        }
        pending = waiting;
    }
    Ok(tree)
}

type Moves = Vec<(NodeId, Placement)>;

/// Winner's moves, and the loser's moves that do not contradict them.
fn split_moves(winner: &SideChanges, loser: &SideChanges, conflicts: &mut Vec<Conflict>) -> (Moves, Moves) {
    let winner_moves: Moves = winner.moves.iter().map(|(id, p)| (*id, p.clone())).collect();
    let mut loser_moves = Vec::new();
    for (id, to) in &loser.moves {
        match winner.moves.get(id) {
            Some(same) if same == to => {}
            Some(_) => conflicts.push(Conflict::Move {
                node: *id,
                kept: winner.side,
            }),
            None => loser_moves.push((*id, to.clone())),
        }
    }
    (winner_moves, loser_moves)
}

/// Apply moves, retrying those that only form a cycle because a later move
/// of the same batch has not happened yet.
fn apply_moves(
    mut tree: Tree,
    moves: Moves,
    side: MergeSide,
    conflicts: &mut Vec<Conflict>,
) -> MergeResult<Tree> {
    let mut pending = moves;
    while !pending.is_empty() {
        let before = pending.len();
        let mut deferred = Vec::new();
        for (id, to) in pending {
            match tree.move_to(id, to.parent, &to.role, to.position.clone()) {
                Ok(next) => tree = next,
                Err(TreeError::ContainmentCycle { .. }) => deferred.push((id, to)),
                Err(TreeError::NodeNotFound(missing)) => {
                    debug!(node = %id, missing = %missing, "skipped move of a vanished node");
                }
                Err(e) => return Err(e.into()),
            }
        }
        if deferred.len() == before {
            for (id, _) in deferred {
                warn!(node = %id, side = ?side, "dropped move that would create a cycle");
                conflicts.push(Conflict::Cycle {
                    node: id,
                    dropped_from: side,
                });
            }
            break;
        }
        pending = deferred;
    }
    Ok(tree)
}

fn apply_fields(
    mut tree: Tree,
    winner: &SideChanges,
    loser: &SideChanges,
    conflicts: &mut Vec<Conflict>,
) -> MergeResult<Tree> {
    let mut fields = loser.fields.clone();
    for (key, value) in &winner.fields {
        if let Some(theirs) = fields.insert(key.clone(), value.clone()) {
            if theirs != *value {
                conflicts.push(Conflict::Field {
                    node: key.0,
                    slot: key.1.clone(),
                    kept: winner.side,
                });
            }
        }
    }

    for ((id, slot), value) in fields {
        if !tree.contains(id)? {
            continue;
        }
        tree = match (slot, value) {
            (Slot::Concept, SlotValue::Text(concept)) => tree.set_concept(id, concept)?,
            (Slot::Property(role), SlotValue::Text(value)) => tree.set_property(id, &role, value)?,
            (Slot::Reference(role), SlotValue::Reference(target)) => {
                tree.set_reference(id, &role, target)?
            }
            (slot, _) => {
                warn!(node = %id, %slot, "ignored value of the wrong shape");
                tree
            }
        };
    }
    Ok(tree)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use sylva_store::InMemoryObjectStore;
    use sylva_tree::{ModelQuery, TreeConfig};

    use super::*;
    use crate::policy::ConflictPolicy;

    fn id(n: u64) -> NodeId {
        NodeId::from_raw(0x3_0000_0000 + n)
    }

    fn input(tree: &Tree, ms: u64) -> MergeInput<'_> {
        MergeInput::new(tree, TemporalAnchor::new(ms, 0, 1), Digest::from_hash([ms as u8; 32]))
    }

    /// root -> items: [n1 -> items: [n2], n3]
    fn base() -> Tree {
        Tree::create(Arc::new(InMemoryObjectStore::new()), TreeConfig::default(), "merge")
            .unwrap()
            .add_new_child(NodeId::ROOT, "items", 0, id(1), Some("Folder".into()))
            .unwrap()
            .add_new_child(id(1), "items", 0, id(2), None)
            .unwrap()
            .add_new_child(NodeId::ROOT, "items", 1, id(3), None)
            .unwrap()
    }

    fn lww() -> MergeOptions {
        MergeOptions::default()
    }

    fn name(tree: &Tree, n: NodeId) -> Option<String> {
        tree.get_property(n, "name").unwrap()
    }

    fn parent(tree: &Tree, n: NodeId) -> NodeId {
        tree.get_parent(n).unwrap().unwrap().0
    }

    // ---- Clean merges ----

    #[test]
    fn two_clients_both_edits_survive() {
        let base = base();
        let left = base.set_property(id(1), "name", Some("b".into())).unwrap();
        let right = base.add_new_child(id(1), "items", 1, id(10), None).unwrap();

        let outcome = merge_trees(&base, input(&left, 100), input(&right, 200), &lww()).unwrap();
        assert!(outcome.is_clean());
        assert_eq!(name(&outcome.tree, id(1)).as_deref(), Some("b"));
        assert_eq!(outcome.tree.get_children(id(1), "items").unwrap(), vec![id(2), id(10)]);
    }

    #[test]
    fn unchanged_side_short_circuits() {
        let base = base();
        let right = base.set_property(id(3), "name", Some("x".into())).unwrap();
        let outcome = merge_trees(&base, input(&base, 100), input(&right, 50), &lww()).unwrap();
        assert_eq!(outcome.tree.digest(), right.digest());
        let outcome = merge_trees(&base, input(&right, 100), input(&base, 50), &lww()).unwrap();
        assert_eq!(outcome.tree.digest(), right.digest());
    }

    #[test]
    fn concurrent_inserts_are_ordered_by_id() {
        let base = base();
        let left = base.add_new_child(NodeId::ROOT, "items", 1, id(21), None).unwrap();
        let right = base.add_new_child(NodeId::ROOT, "items", 1, id(20), None).unwrap();
        let outcome = merge_trees(&base, input(&left, 100), input(&right, 200), &lww()).unwrap();
        assert_eq!(
            outcome.tree.get_children(NodeId::ROOT, "items").unwrap(),
            vec![id(1), id(20), id(21), id(3)]
        );
    }

    #[test]
    fn added_subtrees_keep_their_fields() {
        let base = base();
        let left = base
            .add_new_child(id(3), "items", 0, id(30), Some("Folder".into()))
            .unwrap()
            .add_new_child(id(30), "items", 0, id(31), None)
            .unwrap()
            .set_property(id(31), "name", Some("deep".into()))
            .unwrap();
        let right = base.set_property(id(2), "name", Some("two".into())).unwrap();
        let outcome = merge_trees(&base, input(&left, 100), input(&right, 200), &lww()).unwrap();
        assert_eq!(parent(&outcome.tree, id(31)), id(30));
        assert_eq!(name(&outcome.tree, id(31)).as_deref(), Some("deep"));
        assert_eq!(outcome.tree.get_concept(id(30)).unwrap().as_deref(), Some("Folder"));
        assert_eq!(name(&outcome.tree, id(2)).as_deref(), Some("two"));
    }

    #[test]
    fn unedited_removal_applies() {
        let base = base();
        let left = base.remove_node(id(1)).unwrap();
        let right = base.set_property(id(3), "name", Some("x".into())).unwrap();
        let outcome = merge_trees(&base, input(&left, 100), input(&right, 200), &lww()).unwrap();
        assert!(outcome.is_clean());
        assert!(!outcome.tree.contains(id(1)).unwrap());
        assert!(!outcome.tree.contains(id(2)).unwrap());
        assert_eq!(name(&outcome.tree, id(3)).as_deref(), Some("x"));
    }

    #[test]
    fn swapped_nesting_on_one_side_applies_fully() {
        let base = base();
        let left = base
            .move_child(NodeId::ROOT, "items", 0, id(2))
            .unwrap()
            .move_child(id(2), "items", 0, id(1))
            .unwrap();
        let right = base.set_property(id(3), "name", Some("x".into())).unwrap();
        let outcome = merge_trees(&base, input(&left, 100), input(&right, 200), &lww()).unwrap();
        assert!(outcome.is_clean());
        assert_eq!(parent(&outcome.tree, id(1)), id(2));
        assert_eq!(parent(&outcome.tree, id(2)), NodeId::ROOT);
    }

    // ---- Conflicts ----

    fn conflicting() -> (Tree, Tree, Tree) {
        let base = base();
        let left = base.set_property(id(1), "name", Some("left".into())).unwrap();
        let right = base
            .set_property(id(1), "name", Some("right".into()))
            .unwrap()
            .add_new_child(id(3), "items", 0, id(10), None)
            .unwrap();
        (base, left, right)
    }

    #[test]
    fn last_writer_wins_and_is_commutative() {
        let (base, left, right) = conflicting();
        let lr = merge_trees(&base, input(&left, 100), input(&right, 200), &lww()).unwrap();
        let rl = merge_trees(&base, input(&right, 200), input(&left, 100), &lww()).unwrap();
        assert_eq!(lr.tree.digest(), rl.tree.digest());
        assert_eq!(name(&lr.tree, id(1)).as_deref(), Some("right"));
        assert_eq!(
            lr.conflicts,
            vec![Conflict::Field {
                node: id(1),
                slot: Slot::Property("name".into()),
                kept: MergeSide::Right,
            }]
        );
    }

    #[test]
    fn fixed_priority_policies() {
        let (base, left, right) = conflicting();
        let prefer_left = MergeOptions {
            policy: ConflictPolicy::PreferLeft,
            ..MergeOptions::default()
        };
        let outcome = merge_trees(&base, input(&left, 100), input(&right, 200), &prefer_left).unwrap();
        assert_eq!(name(&outcome.tree, id(1)).as_deref(), Some("left"));
        // Non-conflicting changes from the losing side still land.
        assert!(outcome.tree.contains(id(10)).unwrap());

        let prefer_right = MergeOptions {
            policy: ConflictPolicy::PreferRight,
            ..MergeOptions::default()
        };
        let outcome = merge_trees(&base, input(&right, 100), input(&left, 200), &prefer_right).unwrap();
        assert_eq!(name(&outcome.tree, id(1)).as_deref(), Some("left"));
    }

    #[test]
    fn re_merging_is_idempotent() {
        let (base, left, right) = conflicting();
        let merged = merge_trees(&base, input(&left, 100), input(&right, 200), &lww()).unwrap();
        let again = merge_trees(&base, input(&merged.tree, 300), input(&right, 200), &lww()).unwrap();
        assert!(again.is_clean());
        assert_eq!(again.tree.root_digest(), merged.tree.root_digest());
    }

    #[test]
    fn fail_on_conflict_reports_instead_of_resolving() {
        let (base, left, right) = conflicting();
        let strict = MergeOptions {
            fail_on_conflict: true,
            ..MergeOptions::default()
        };
        match merge_trees(&base, input(&left, 100), input(&right, 200), &strict) {
            Err(MergeError::Conflicts(conflicts)) => assert_eq!(conflicts.len(), 1),
            other => panic!("expected conflicts, got {other:?}"),
        }
    }

    #[test]
    fn delete_edit_resurrects_the_subtree() {
        let base = base();
        let left = base.remove_node(id(1)).unwrap();
        let right = base.set_property(id(2), "name", Some("kept".into())).unwrap();
        for (l, r) in [(100, 200), (200, 100)] {
            let outcome = merge_trees(&base, input(&left, l), input(&right, r), &lww()).unwrap();
            assert!(outcome.tree.contains(id(1)).unwrap());
            assert_eq!(name(&outcome.tree, id(2)).as_deref(), Some("kept"));
            assert_eq!(
                outcome.conflicts,
                vec![Conflict::DeleteEdit {
                    node: id(1),
                    removed_by: MergeSide::Left,
                }]
            );
        }
    }

    #[test]
    fn addition_under_a_removed_node_resurrects_it() {
        let base = base();
        let left = base.add_new_child(id(2), "items", 0, id(40), None).unwrap();
        let right = base.remove_node(id(1)).unwrap();
        let outcome = merge_trees(&base, input(&left, 100), input(&right, 200), &lww()).unwrap();
        assert_eq!(parent(&outcome.tree, id(40)), id(2));
        assert_eq!(parent(&outcome.tree, id(2)), id(1));
    }

    #[test]
    fn divergent_moves_follow_the_policy() {
        let base = base();
        let left = base.move_child(id(1), "items", 0, id(3)).unwrap();
        let right = base.move_child(id(2), "items", 0, id(3)).unwrap();
        let outcome = merge_trees(&base, input(&left, 100), input(&right, 200), &lww()).unwrap();
        assert_eq!(parent(&outcome.tree, id(3)), id(2));
        assert_eq!(
            outcome.conflicts,
            vec![Conflict::Move {
                node: id(3),
                kept: MergeSide::Right,
            }]
        );
    }

    #[test]
    fn cycle_creating_move_is_dropped() {
        let base = base();
        let left = base.move_child(id(3), "items", 0, id(1)).unwrap();
        let right = base.move_child(id(1), "items", 0, id(3)).unwrap();
        let outcome = merge_trees(&base, input(&left, 200), input(&right, 100), &lww()).unwrap();
        assert_eq!(parent(&outcome.tree, id(1)), id(3));
        assert_eq!(parent(&outcome.tree, id(3)), NodeId::ROOT);
        assert_eq!(
            outcome.conflicts,
            vec![Conflict::Cycle {
                node: id(3),
                dropped_from: MergeSide::Right,
            }]
        );
    }
}
