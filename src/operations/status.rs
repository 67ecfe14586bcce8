use crate::areas::repository::Repository;
use crate::artifacts::status::status_info::{Status, StatusInfo};

impl Repository {
    /// Scan worktree, index and HEAD tree into a [`StatusInfo`].
    ///
    /// The scan opportunistically rewrites the index when it refreshed
    /// stat metadata, so unchanged files keep short-circuiting on
    /// timestamps in later scans.
    pub async fn status(&self) -> anyhow::Result<StatusInfo> {
        let index = self.index();
        let mut index = index.lock().await;

        index.rehydrate()?;

        let info = Status::new(self).initialize(&mut index).await?;

        if index.is_changed() {
            index.write_updates()?;
        }

        Ok(info)
    }
}
