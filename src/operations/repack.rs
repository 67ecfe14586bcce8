use crate::areas::repository::Repository;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::pack::writer::{PackFile, PackWriter};
use tracing::info;

impl Repository {
    /// Fold every loose object into a fresh pack and delete the loose
    /// copies. Readers are never blocked: the pack becomes visible only
    /// once fully written and indexed, and loose copies go away only
    /// after that, when every object is already served from the pack.
    ///
    /// Returns `None` when there is nothing loose to pack.
    pub fn repack(&self) -> anyhow::Result<Option<PackFile>> {
        let loose = self.database().list_loose_objects()?;

        if loose.is_empty() {
            return Ok(None);
        }

        let pack = self.pack_objects(&loose)?;

        for oid in &loose {
            self.database().remove_loose_object(oid)?;
        }

        info!(
            objects = pack.record_count,
            deltas = pack.delta_count,
            pack = %pack.pack_path.display(),
            "repacked loose objects"
        );

        Ok(Some(pack))
    }

    /// Write the given objects into a new pack under the repository's
    /// pack directory, leaving any loose copies in place.
    pub fn pack_objects(&self, object_ids: &[ObjectId]) -> anyhow::Result<PackFile> {
        PackWriter::new(self.database()).write(object_ids, &self.database().pack_path())
    }
}
