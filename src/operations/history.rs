use crate::areas::repository::Repository;
use crate::artifacts::graph::merge_base::BcaFinder;
use crate::artifacts::graph::rev_walk::{RevWalk, RevWalkIter, WalkOrder};
use crate::artifacts::objects::object_id::ObjectId;

impl Repository {
    /// Lazy walk over every commit reachable from `starts`, each yielded
    /// exactly once in the requested order.
    pub fn walk(&self, starts: &[ObjectId], order: WalkOrder) -> anyhow::Result<RevWalkIter<'_>> {
        RevWalk::new(
            self.database(),
            self.commit_cache(),
            starts.to_vec(),
            order,
        )
        .into_iter()
    }

    /// One best common ancestor of the two commits, or `None` when their
    /// histories are unrelated. A commit is its own ancestor, so
    /// `merge_base(a, a)` is `a`.
    pub fn merge_base(
        &self,
        left: &ObjectId,
        right: &ObjectId,
    ) -> anyhow::Result<Option<ObjectId>> {
        let finder =
            BcaFinder::new(|oid: &ObjectId| self.commit_cache().get_or_load(self.database(), oid));

        finder.find_best_common_ancestor(left, right)
    }

    /// Whether `ancestor` is reachable from `descendant` through parent
    /// links. Reflexive: every commit is its own ancestor.
    pub fn is_ancestor(
        &self,
        ancestor: &ObjectId,
        descendant: &ObjectId,
    ) -> anyhow::Result<bool> {
        let finder =
            BcaFinder::new(|oid: &ObjectId| self.commit_cache().get_or_load(self.database(), oid));

        finder.is_ancestor(ancestor, descendant)
    }
}
