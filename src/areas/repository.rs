use crate::areas::database::{CommitCache, Database};
use crate::areas::index::Index;
use crate::areas::refs::Refs;
use crate::areas::workspace::Workspace;
use crate::artifacts::branch::branch_name::SymRefName;
use std::cell::{Ref, RefCell};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Handle onto one repository on disk.
///
/// Owns the four storage areas (worktree, staging index, object database,
/// reference store) plus a commit header cache shared by history walks.
pub struct Repository {
    path: Box<Path>,
    git_path: Box<Path>,
    index: Arc<Mutex<Index>>,
    database: Database,
    workspace: Workspace,
    refs: Refs,
    commit_cache: CommitCache,
    current_ref: RefCell<SymRefName>,
}

impl Repository {
    pub fn new(path: &str) -> anyhow::Result<Self> {
        let path = Path::new(path);
        if !path.exists() {
            std::fs::create_dir_all(path)?;
        }
        let path = path.canonicalize()?;
        let git_path = path.join(".git");

        let index = Index::new(git_path.join("index").into_boxed_path());
        let database = Database::new(git_path.join("objects").into_boxed_path());
        let workspace = Workspace::new(path.clone().into_boxed_path());
        let refs = Refs::new(git_path.clone().into_boxed_path());
        let current_ref = refs.current_ref(None)?;

        Ok(Repository {
            path: path.into_boxed_path(),
            git_path: git_path.into_boxed_path(),
            index: Arc::new(Mutex::new(index)),
            database,
            workspace,
            refs,
            commit_cache: CommitCache::new(),
            current_ref: RefCell::new(current_ref),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of the repository directory itself (the `.git` directory).
    pub fn git_path(&self) -> &Path {
        &self.git_path
    }

    pub fn index(&self) -> Arc<Mutex<Index>> {
        self.index.clone()
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn refs(&self) -> &Refs {
        &self.refs
    }

    pub fn commit_cache(&self) -> &CommitCache {
        &self.commit_cache
    }

    pub fn current_ref(&self) -> Ref<'_, SymRefName> {
        self.current_ref.borrow()
    }

    pub fn set_current_ref(&self, new_ref: SymRefName) {
        *self.current_ref.borrow_mut() = new_ref;
    }
}
