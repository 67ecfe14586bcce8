use crate::areas::repository::Repository;
use crate::artifacts::index::index_entry::IndexEntry;
use std::path::PathBuf;
use tracing::warn;

impl Repository {
    /// Stage the given paths. Directories are expanded to the files
    /// below them; paths that no longer exist are skipped, as is any
    /// file the process cannot read.
    ///
    /// Each staged file's content is stored as a blob immediately, so
    /// committing later needs no further worktree reads.
    pub async fn add(&self, paths: &[PathBuf]) -> anyhow::Result<()> {
        let index = self.index();
        let mut index = index.lock().await;

        index.rehydrate()?;

        let mut expanded = Vec::new();
        for path in paths {
            let absolute = self.path().join(path);
            if !absolute.exists() {
                continue;
            }
            expanded.extend(self.workspace().list_files(Some(absolute))?);
        }

        for path in expanded {
            let blob = match self.workspace().parse_blob(&path) {
                Ok(blob) => blob,
                Err(error) => {
                    warn!(path = %path.display(), %error, "skipping unreadable file");
                    continue;
                }
            };
            let stat = self.workspace().stat_file(&path)?;

            let blob_oid = self.database().store(&blob)?;
            index.add(IndexEntry::new(path, blob_oid, stat))?;
        }

        index.write_updates()
    }
}
