//! History walks
//!
//! A walk starts from one or more commit ids and yields every reachable
//! commit exactly once, even when the start points share history or one
//! start is an ancestor of another.
//!
//! Two orders are supported:
//!
//! - `Topological`: a commit is always yielded before any of its
//!   parents, whatever the timestamps say. Needed by consumers that
//!   replay history, where seeing a parent first would be wrong.
//! - `ReverseChronological`: newest committer timestamp first. With
//!   skewed clocks this may yield a parent before a cousin commit; that
//!   is the documented trade for not having to close over the whole
//!   reachable set up front.

use crate::areas::database::{CommitCache, Database};
use crate::artifacts::objects::commit::{Commit, SlimCommit};
use crate::artifacts::objects::object_id::ObjectId;
use anyhow::Context;
use derive_new::new;
use std::collections::{BinaryHeap, HashMap, HashSet};

/// Order in which a walk yields commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkOrder {
    /// Every commit strictly before any of its parents. Ties between
    /// ready commits go to the newer timestamp.
    Topological,
    /// Newest committer timestamp first.
    ReverseChronological,
}

/// Builder for a history walk. Turn it into an iterator with
/// [`RevWalk::into_iter`], which resolves the start points eagerly so
/// that an unknown start id fails before the first yield.
#[derive(new)]
pub struct RevWalk<'d> {
    database: &'d Database,
    commit_cache: &'d CommitCache,
    start_oids: Vec<ObjectId>,
    order: WalkOrder,
}

impl<'d> RevWalk<'d> {
    pub fn into_iter(self) -> anyhow::Result<RevWalkIter<'d>> {
        let mut starts = Vec::new();
        let mut visited = HashSet::new();
        for oid in self.start_oids {
            if visited.insert(oid.clone()) {
                starts.push(oid);
            }
        }

        let mut queue = BinaryHeap::new();
        let mut pending_children = HashMap::new();

        match self.order {
            WalkOrder::ReverseChronological => {
                for oid in &starts {
                    queue.push(self.commit_cache.get_or_load(self.database, oid)?);
                }
            }
            WalkOrder::Topological => {
                // Close over the reachable set and count, per commit, how
                // many reachable children must be yielded before it may
                // surface. Only childless commits start in the queue.
                let mut discovered: HashSet<ObjectId> = starts.iter().cloned().collect();
                let mut stack = starts.clone();
                while let Some(oid) = stack.pop() {
                    let slim = self.commit_cache.get_or_load(self.database, &oid)?;
                    for parent in &slim.parents {
                        *pending_children.entry(parent.clone()).or_insert(0usize) += 1;
                        if discovered.insert(parent.clone()) {
                            stack.push(parent.clone());
                        }
                    }
                }

                for oid in &discovered {
                    if !pending_children.contains_key(oid) {
                        queue.push(self.commit_cache.get_or_load(self.database, oid)?);
                    }
                }
            }
        }

        Ok(RevWalkIter {
            database: self.database,
            commit_cache: self.commit_cache,
            order: self.order,
            queue,
            visited,
            pending_children,
            done: false,
        })
    }
}

/// Lazy iterator over `(id, commit)` pairs. Stops permanently after the
/// first error.
pub struct RevWalkIter<'d> {
    database: &'d Database,
    commit_cache: &'d CommitCache,
    order: WalkOrder,
    /// Frontier, ordered by committer timestamp (newest pops first).
    queue: BinaryHeap<SlimCommit>,
    /// Commits already enqueued at least once. Unused in topological
    /// order, where `pending_children` governs admission instead.
    visited: HashSet<ObjectId>,
    /// Topological order only: children still to yield per commit.
    pending_children: HashMap<ObjectId, usize>,
    done: bool,
}

impl RevWalkIter<'_> {
    fn advance(&mut self) -> anyhow::Result<Option<(ObjectId, Commit)>> {
        let Some(slim) = self.queue.pop() else {
            return Ok(None);
        };

        match self.order {
            WalkOrder::Topological => {
                for parent in &slim.parents {
                    if let Some(count) = self.pending_children.get_mut(parent) {
                        *count -= 1;
                        if *count == 0 {
                            let parent_slim =
                                self.commit_cache.get_or_load(self.database, parent)?;
                            self.queue.push(parent_slim);
                        }
                    }
                }
            }
            WalkOrder::ReverseChronological => {
                for parent in &slim.parents {
                    if self.visited.insert(parent.clone()) {
                        let parent_slim = self.commit_cache.get_or_load(self.database, parent)?;
                        self.queue.push(parent_slim);
                    }
                }
            }
        }

        let commit = self
            .database
            .parse_object_as_commit(&slim.oid)?
            .with_context(|| format!("object {} is not a commit", slim.oid))?;

        Ok(Some((slim.oid, commit)))
    }
}

impl Iterator for RevWalkIter<'_> {
    type Item = anyhow::Result<(ObjectId, Commit)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        match self.advance() {
            Ok(Some(item)) => Some(Ok(item)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(error) => {
                self.done = true;
                Some(Err(error))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::objects::commit::Author;
    use crate::artifacts::objects::object_type::ObjectType;
    use assert_fs::TempDir;
    use rstest::rstest;

    fn epoch() -> chrono::DateTime<chrono::FixedOffset> {
        chrono::DateTime::parse_from_rfc3339("2024-03-01T12:00:00+00:00").unwrap()
    }

    fn store_commit(
        database: &Database,
        tree: &ObjectId,
        parents: Vec<ObjectId>,
        seconds: i64,
        message: &str,
    ) -> ObjectId {
        let author = Author::new_with_timestamp(
            "Ada".to_string(),
            "ada@example.com".to_string(),
            epoch() + chrono::Duration::seconds(seconds),
        );
        let commit = Commit::new(parents, tree.clone(), author, message.to_string());
        database.store(&commit).unwrap()
    }

    fn messages(walk: RevWalkIter<'_>) -> Vec<String> {
        walk.map(|item| item.unwrap().1.short_message()).collect()
    }

    #[rstest]
    fn reverse_chronological_walks_newest_first() {
        let dir = TempDir::new().unwrap();
        let database = Database::new(dir.path().join("objects").into_boxed_path());
        let cache = CommitCache::new();
        let tree = database.put(ObjectType::Tree, b"").unwrap();

        let a = store_commit(&database, &tree, vec![], 0, "a");
        let b = store_commit(&database, &tree, vec![a.clone()], 10, "b");
        let c = store_commit(&database, &tree, vec![b.clone()], 20, "c");

        let walk = RevWalk::new(&database, &cache, vec![c], WalkOrder::ReverseChronological)
            .into_iter()
            .unwrap();

        assert_eq!(messages(walk), vec!["c", "b", "a"]);
    }

    #[rstest]
    fn each_commit_is_yielded_once_across_shared_history() {
        let dir = TempDir::new().unwrap();
        let database = Database::new(dir.path().join("objects").into_boxed_path());
        let cache = CommitCache::new();
        let tree = database.put(ObjectType::Tree, b"").unwrap();

        // Diamond: both branch tips reach the same root.
        let root = store_commit(&database, &tree, vec![], 0, "root");
        let left = store_commit(&database, &tree, vec![root.clone()], 10, "left");
        let right = store_commit(&database, &tree, vec![root.clone()], 20, "right");

        let walk = RevWalk::new(
            &database,
            &cache,
            vec![left.clone(), right, left],
            WalkOrder::ReverseChronological,
        )
        .into_iter()
        .unwrap();

        let seen = messages(walk);
        assert_eq!(seen, vec!["right", "left", "root"]);
    }

    #[rstest]
    fn topological_order_holds_under_clock_skew() {
        let dir = TempDir::new().unwrap();
        let database = Database::new(dir.path().join("objects").into_boxed_path());
        let cache = CommitCache::new();
        let tree = database.put(ObjectType::Tree, b"").unwrap();

        // The root carries the newest timestamp, as after a clock jump.
        // Chronological order would surface it before its children.
        let root = store_commit(&database, &tree, vec![], 100, "root");
        let slow = store_commit(&database, &tree, vec![root.clone()], 10, "slow");
        let fast = store_commit(&database, &tree, vec![root.clone()], 50, "fast");
        let merge = store_commit(
            &database,
            &tree,
            vec![slow.clone(), fast.clone()],
            30,
            "merge",
        );

        let topo = RevWalk::new(
            &database,
            &cache,
            vec![merge.clone()],
            WalkOrder::Topological,
        )
        .into_iter()
        .unwrap();
        assert_eq!(messages(topo), vec!["merge", "fast", "slow", "root"]);

        let date_order = RevWalk::new(&database, &cache, vec![merge], WalkOrder::ReverseChronological)
            .into_iter()
            .unwrap();
        // Skew puts the root ahead of one of its children here.
        assert_eq!(
            messages(date_order),
            vec!["merge", "fast", "root", "slow"]
        );
    }

    #[rstest]
    fn topological_walk_orders_ancestor_tip_after_descendant_tip() {
        let dir = TempDir::new().unwrap();
        let database = Database::new(dir.path().join("objects").into_boxed_path());
        let cache = CommitCache::new();
        let tree = database.put(ObjectType::Tree, b"").unwrap();

        let a = store_commit(&database, &tree, vec![], 0, "a");
        let b = store_commit(&database, &tree, vec![a.clone()], 10, "b");
        let c = store_commit(&database, &tree, vec![b.clone()], 20, "c");

        // One start point is an ancestor of the other.
        let walk = RevWalk::new(&database, &cache, vec![b, c], WalkOrder::Topological)
            .into_iter()
            .unwrap();

        assert_eq!(messages(walk), vec!["c", "b", "a"]);
    }

    #[rstest]
    fn unknown_start_fails_before_the_first_yield() {
        let dir = TempDir::new().unwrap();
        let database = Database::new(dir.path().join("objects").into_boxed_path());
        let cache = CommitCache::new();

        let ghost = ObjectId::try_parse("a".repeat(40)).unwrap();
        let result =
            RevWalk::new(&database, &cache, vec![ghost], WalkOrder::ReverseChronological)
                .into_iter();

        assert!(result.is_err());
    }
}
