//! Best common ancestor computation
//!
//! The merge base of two commits is the common ancestor a three-way
//! merge should diff against. The finder works in two phases:
//!
//! 1. A bidirectional traversal walks the history of both commits at
//!    once, processing the frontier newest-first. A commit reached from
//!    both sides is a common ancestor; its own ancestors are marked
//!    stale so the search does not keep descending through them.
//! 2. The surviving candidates are filtered against the invariant that
//!    a best common ancestor is not itself an ancestor of another
//!    common ancestor. Criss-cross histories can leave several
//!    candidates standing; the newest one is returned.
//!
//! The finder is storage-agnostic: it only needs a loader from commit
//! id to slim header, so tests drive it from an in-memory map while the
//! repository wires it to the commit cache.

use crate::artifacts::objects::commit::SlimCommit;
use crate::artifacts::objects::object_id::ObjectId;
use bitflags::bitflags;
use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};
use tracing::trace;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    struct VisitState: u8 {
        const VISITED_FROM_SOURCE = 0b0001;
        const VISITED_FROM_TARGET = 0b0010;
        const VISITED_FROM_BOTH =
            Self::VISITED_FROM_SOURCE.bits() | Self::VISITED_FROM_TARGET.bits();
        /// Ancestor of an already found common ancestor; pruned.
        const STALE = 0b0100;
        /// Identified as a common ancestor.
        const RESULT = 0b1000;
    }
}

/// Finds best common ancestors between commits.
///
/// `LoaderFn` maps a commit id to its slim header. Root commits load
/// with an empty parent list; an id that does not name a commit is an
/// error, which aborts the search.
pub struct BcaFinder<LoaderFn>
where
    LoaderFn: Fn(&ObjectId) -> anyhow::Result<SlimCommit>,
{
    load_commit: LoaderFn,
}

impl<LoaderFn> BcaFinder<LoaderFn>
where
    LoaderFn: Fn(&ObjectId) -> anyhow::Result<SlimCommit>,
{
    pub fn new(load_commit: LoaderFn) -> Self {
        Self { load_commit }
    }

    /// True when `ancestor` is reachable from `descendant` by following
    /// parent links. A commit counts as its own ancestor.
    pub fn is_ancestor(
        &self,
        ancestor: &ObjectId,
        descendant: &ObjectId,
    ) -> anyhow::Result<bool> {
        if ancestor == descendant {
            return Ok(true);
        }

        let mut visited = HashSet::new();
        let mut queue = VecDeque::from([descendant.clone()]);

        while let Some(current) = queue.pop_front() {
            if !visited.insert(current.clone()) {
                continue;
            }
            if &current == ancestor {
                return Ok(true);
            }

            let slim = (self.load_commit)(&current)?;
            for parent in slim.parents {
                queue.push_back(parent);
            }
        }

        Ok(false)
    }

    /// One best common ancestor of the two commits, or `None` when their
    /// histories share no commit at all. When several best common
    /// ancestors exist, as after criss-cross merges, the newest one is
    /// returned.
    pub fn find_best_common_ancestor(
        &self,
        source_oid: &ObjectId,
        target_oid: &ObjectId,
    ) -> anyhow::Result<Option<ObjectId>> {
        let targets = HashSet::from([target_oid]);
        let common_ancestors = self
            .all_common_ancestors(source_oid, targets)?
            .into_keys()
            .collect::<HashSet<_>>();

        if common_ancestors.is_empty() {
            return Ok(None);
        }
        trace!(count = common_ancestors.len(), "common ancestors found");

        // Drop every candidate that is an ancestor of another candidate.
        let mut redundant = HashSet::<ObjectId>::new();
        for candidate in &common_ancestors {
            if redundant.contains(candidate) {
                continue;
            }

            let others = common_ancestors
                .iter()
                .filter(|other| *other != candidate && !redundant.contains(*other))
                .collect::<HashSet<_>>();
            let states = self.all_common_ancestors(candidate, others.clone())?;

            if states
                .get(candidate)
                .copied()
                .unwrap_or(VisitState::empty())
                .contains(VisitState::VISITED_FROM_TARGET)
            {
                redundant.insert(candidate.clone());
            }

            for other in others {
                if states
                    .get(other)
                    .copied()
                    .unwrap_or(VisitState::empty())
                    .contains(VisitState::VISITED_FROM_SOURCE)
                {
                    redundant.insert(other.clone());
                }
            }
        }

        // Pick the newest surviving candidate. Ties on the timestamp fall
        // back to the oid so criss-cross histories always settle on the
        // same ancestor.
        let mut best: Option<SlimCommit> = None;
        for candidate in common_ancestors {
            if redundant.contains(&candidate) {
                continue;
            }
            let slim = (self.load_commit)(&candidate)?;
            if best.as_ref().is_none_or(|current| slim > *current) {
                best = Some(slim);
            }
        }
        let best = best.map(|slim| slim.oid);
        trace!(best = ?best, "best common ancestor selected");

        Ok(best)
    }

    /// All common ancestors of `source_oid` and the `target_oids` set,
    /// with the visit state each one ended up in. Stale entries are
    /// already filtered out.
    fn all_common_ancestors(
        &self,
        source_oid: &ObjectId,
        target_oids: HashSet<&ObjectId>,
    ) -> anyhow::Result<HashMap<ObjectId, VisitState>> {
        if target_oids.contains(source_oid) {
            // The source is itself a target, so it is the answer.
            return Ok(HashMap::from([(source_oid.clone(), VisitState::RESULT)]));
        }

        let mut states = HashMap::<ObjectId, VisitState>::new();
        let mut queue = BinaryHeap::new();

        let source = (self.load_commit)(source_oid)?;
        states.insert(source.oid.clone(), VisitState::VISITED_FROM_SOURCE);
        queue.push((source.timestamp, source.oid));

        for &target_oid in &target_oids {
            states.insert(target_oid.clone(), VisitState::VISITED_FROM_TARGET);

            let target = (self.load_commit)(target_oid)?;
            queue.push((target.timestamp, target.oid));
        }

        while let Some((_, oid)) = queue.pop() {
            let current_state = states.get(&oid).copied().unwrap_or(VisitState::empty());
            if current_state.contains(VisitState::STALE) {
                continue;
            }

            let is_common_ancestor = if current_state.contains(VisitState::VISITED_FROM_BOTH) {
                states
                    .entry(oid.clone())
                    .and_modify(|state| *state |= VisitState::RESULT);
                true
            } else {
                false
            };

            let current = (self.load_commit)(&oid)?;
            for parent_oid in &current.parents {
                let parent = (self.load_commit)(parent_oid)?;
                let parent_state = states
                    .get(parent_oid)
                    .copied()
                    .unwrap_or(VisitState::empty());

                // Parents inherit the sides their child was reached from.
                let mut new_state = parent_state | current_state;
                if is_common_ancestor {
                    new_state |= VisitState::STALE;
                }

                if !parent_state.contains(current_state) {
                    states.insert(parent_oid.clone(), new_state);
                    queue.push((parent.timestamp, parent_oid.clone()));
                }
            }
        }

        Ok(states
            .into_iter()
            .filter(|(_, state)| {
                !state.contains(VisitState::STALE) && state.contains(VisitState::RESULT)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;
    use chrono::{FixedOffset, TimeZone};
    use rstest::*;
    use std::collections::HashMap;

    #[derive(Debug, Clone, Default)]
    struct InMemoryCommits {
        commits: HashMap<ObjectId, SlimCommit>,
    }

    impl InMemoryCommits {
        fn add(&mut self, oid: ObjectId, parents: Vec<ObjectId>) {
            // An hour between commits keeps the frontier ordering
            // deterministic.
            let offset = self.commits.len() as i64 * 3600;
            let timestamp = FixedOffset::east_opt(0)
                .unwrap()
                .timestamp_opt(1_700_000_000 + offset, 0)
                .unwrap();
            self.commits.insert(
                oid.clone(),
                SlimCommit {
                    oid,
                    parents,
                    timestamp,
                },
            );
        }

        fn load(&self, oid: &ObjectId) -> anyhow::Result<SlimCommit> {
            self.commits
                .get(oid)
                .cloned()
                .with_context(|| format!("commit {} not in store", oid))
        }
    }

    /// Deterministic 40-hex id derived from a label, so test graphs read
    /// by name.
    fn oid(label: &str) -> ObjectId {
        let mut hex = label
            .as_bytes()
            .iter()
            .map(|byte| format!("{:02x}", byte))
            .collect::<String>();
        while hex.len() < 40 {
            hex.push('0');
        }
        hex.truncate(40);

        ObjectId::try_parse(hex).unwrap()
    }

    #[fixture]
    fn linear_history() -> InMemoryCommits {
        // a <- b <- c <- d
        let mut store = InMemoryCommits::default();
        store.add(oid("a"), vec![]);
        store.add(oid("b"), vec![oid("a")]);
        store.add(oid("c"), vec![oid("b")]);
        store.add(oid("d"), vec![oid("c")]);
        store
    }

    #[fixture]
    fn simple_merge() -> InMemoryCommits {
        //     a
        //    / \
        //   b   c
        //    \ /
        //     d
        let mut store = InMemoryCommits::default();
        store.add(oid("a"), vec![]);
        store.add(oid("b"), vec![oid("a")]);
        store.add(oid("c"), vec![oid("a")]);
        store.add(oid("d"), vec![oid("b"), oid("c")]);
        store
    }

    #[fixture]
    fn criss_cross() -> InMemoryCommits {
        //     a
        //    / \
        //   b   c
        //   |\ /|
        //   | X |
        //   |/ \|
        //   d   e
        //   |   |
        //   f   g
        let mut store = InMemoryCommits::default();
        store.add(oid("a"), vec![]);
        store.add(oid("b"), vec![oid("a")]);
        store.add(oid("c"), vec![oid("a")]);
        store.add(oid("d"), vec![oid("b"), oid("c")]);
        store.add(oid("e"), vec![oid("c"), oid("b")]);
        store.add(oid("f"), vec![oid("d")]);
        store.add(oid("g"), vec![oid("e")]);
        store
    }

    #[rstest]
    fn linear_ancestry_resolves_to_the_older_commit(linear_history: InMemoryCommits) {
        let finder = BcaFinder::new(|oid| linear_history.load(oid));

        assert_eq!(
            finder.find_best_common_ancestor(&oid("b"), &oid("d")).unwrap(),
            Some(oid("b"))
        );
        assert_eq!(
            finder.find_best_common_ancestor(&oid("d"), &oid("b")).unwrap(),
            Some(oid("b"))
        );
        assert_eq!(
            finder.find_best_common_ancestor(&oid("c"), &oid("c")).unwrap(),
            Some(oid("c"))
        );
        assert_eq!(
            finder.find_best_common_ancestor(&oid("a"), &oid("d")).unwrap(),
            Some(oid("a"))
        );
    }

    #[rstest]
    fn branch_tips_resolve_to_the_fork_point(simple_merge: InMemoryCommits) {
        let finder = BcaFinder::new(|oid| simple_merge.load(oid));

        assert_eq!(
            finder.find_best_common_ancestor(&oid("b"), &oid("c")).unwrap(),
            Some(oid("a"))
        );
        assert_eq!(
            finder.find_best_common_ancestor(&oid("a"), &oid("d")).unwrap(),
            Some(oid("a"))
        );
    }

    #[rstest]
    fn criss_cross_yields_the_newest_tied_ancestor(criss_cross: InMemoryCommits) {
        let finder = BcaFinder::new(|oid| criss_cross.load(oid));

        // b and c are both best: each reaches f and g, and neither is an
        // ancestor of the other. c was committed after b, so it wins.
        assert_eq!(
            finder.find_best_common_ancestor(&oid("f"), &oid("g")).unwrap(),
            Some(oid("c"))
        );
    }

    #[rstest]
    fn tied_ancestor_choice_follows_timestamps_not_insertion() {
        // Same criss-cross shape with b committed after c.
        let mut store = InMemoryCommits::default();
        store.add(oid("a"), vec![]);
        store.add(oid("c"), vec![oid("a")]);
        store.add(oid("b"), vec![oid("a")]);
        store.add(oid("d"), vec![oid("b"), oid("c")]);
        store.add(oid("e"), vec![oid("c"), oid("b")]);
        store.add(oid("f"), vec![oid("d")]);
        store.add(oid("g"), vec![oid("e")]);

        let finder = BcaFinder::new(|oid| store.load(oid));

        assert_eq!(
            finder.find_best_common_ancestor(&oid("f"), &oid("g")).unwrap(),
            Some(oid("b"))
        );
    }

    #[rstest]
    fn unrelated_roots_have_no_merge_base() {
        let mut store = InMemoryCommits::default();
        store.add(oid("a"), vec![]);
        store.add(oid("b"), vec![oid("a")]);
        store.add(oid("x"), vec![]);
        store.add(oid("y"), vec![oid("x")]);

        let finder = BcaFinder::new(|oid| store.load(oid));

        assert_eq!(
            finder.find_best_common_ancestor(&oid("b"), &oid("y")).unwrap(),
            None
        );
    }

    #[rstest]
    fn ancestry_check_follows_parent_links(linear_history: InMemoryCommits) {
        let finder = BcaFinder::new(|oid| linear_history.load(oid));

        assert!(finder.is_ancestor(&oid("a"), &oid("d")).unwrap());
        assert!(finder.is_ancestor(&oid("c"), &oid("d")).unwrap());
        assert!(finder.is_ancestor(&oid("d"), &oid("d")).unwrap());
        assert!(!finder.is_ancestor(&oid("d"), &oid("a")).unwrap());
    }

    #[rstest]
    fn ancestry_check_errors_on_missing_commits(linear_history: InMemoryCommits) {
        let finder = BcaFinder::new(|oid| linear_history.load(oid));

        assert!(finder.is_ancestor(&oid("a"), &oid("z")).is_err());
    }
}
