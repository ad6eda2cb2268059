use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use sithub_protocol::{AdvertisedRef, ProtocolError, RemoteLocation};
use sithub_refs::{
    branch_ref, validate_ref_name, FileRefStore, RefError, RefStore, RefTarget, HEAD,
};
use sithub_store::{
    walk_reachable, Blob, Commit, FileObjectStore, Object, ObjectKind, ObjectStore,
    ReachableWalk, StoreError, Tree, TreeEntry,
};
use sithub_sync::{
    fetch, CloneOptions, LocalTransport, RemoteTransport, SyncError, TcpTransport, UploadSession,
};
use sithub_types::ObjectId;
use tracing::{debug, info, warn};

use crate::commit::{CommitRequest, CommitResult};
use crate::config::RepoConfig;
use crate::error::{RepoError, RepoResult};

/// Metadata directory inside a working directory.
pub const META_DIR: &str = ".sithub";

/// Present while a clone into this repository has not finished.
pub const CLONE_MARKER: &str = "CLONE_INCOMPLETE";

const CONFIG_FILE: &str = "config.toml";
const OBJECTS_DIR: &str = "objects";

/// An open repository.
///
/// ```text
/// <path>/.sithub/
///     config.toml
///     HEAD
///     objects/<2 hex>/<62 hex>
///     refs/heads/...
///     refs/tags/...
///     CLONE_INCOMPLETE      (only while a clone is running or after it failed)
/// ```
pub struct Repository {
    path: PathBuf,
    meta: PathBuf,
    config: RepoConfig,
    objects: Arc<FileObjectStore>,
    refs: Arc<FileRefStore>,
}

impl Repository {
    /// Create an empty repository at `path` with the default configuration.
    pub fn initialize(path: impl AsRef<Path>) -> RepoResult<Self> {
        Self::initialize_with_config(path, RepoConfig::default())
    }

    pub fn initialize_with_config(path: impl AsRef<Path>, config: RepoConfig) -> RepoResult<Self> {
        let repo = Self::initialize_marked(path.as_ref(), config, "init")?;
        fs::remove_file(repo.meta.join(CLONE_MARKER))?;
        info!(
            path = %repo.path.display(),
            branch = %repo.config.default_branch,
            "initialized repository"
        );
        Ok(repo)
    }

    /// Create the layout with the clone marker written first, so a
    /// directory that stops anywhere short of completion is never mistaken
    /// for a usable repository. The caller removes the marker.
    fn initialize_marked(path: &Path, config: RepoConfig, origin: &str) -> RepoResult<Self> {
        config.validate()?;
        let path = path.to_path_buf();
        let meta = path.join(META_DIR);
        fs::create_dir_all(&path)?;
        match fs::create_dir(&meta) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                let incomplete = meta.join(CLONE_MARKER).exists();
                return Err(RepoError::AlreadyExists { path, incomplete });
            }
            Err(e) => return Err(e.into()),
        }
        if let Err(e) = fs::write(meta.join(CLONE_MARKER), format!("{origin}\n")) {
            // Nothing else is in the directory yet.
            let _ = fs::remove_dir(&meta);
            return Err(e.into());
        }

        let objects = FileObjectStore::init(meta.join(OBJECTS_DIR))?;
        let refs = FileRefStore::open(meta.clone())?;
        config.save(&meta.join(CONFIG_FILE))?;
        refs.write_ref(HEAD, &RefTarget::Symbolic(branch_ref(&config.default_branch)))?;

        Ok(Self {
            path,
            meta,
            config,
            objects: Arc::new(objects),
            refs: Arc::new(refs),
        })
    }

    /// Open an existing repository. A clone that never finished is refused.
    pub fn open(path: impl AsRef<Path>) -> RepoResult<Self> {
        let path = path.as_ref().to_path_buf();
        let meta = path.join(META_DIR);
        if !meta.is_dir() {
            return Err(RepoError::NotARepository(path));
        }
        if meta.join(CLONE_MARKER).exists() {
            return Err(RepoError::Incomplete(path));
        }
        let config = RepoConfig::load(&meta.join(CONFIG_FILE))?;
        let objects = FileObjectStore::open(meta.join(OBJECTS_DIR))?;
        let refs = FileRefStore::open(meta.clone())?;
        debug!(path = %path.display(), "opened repository");
        Ok(Self {
            path,
            meta,
            config,
            objects: Arc::new(objects),
            refs: Arc::new(refs),
        })
    }

    /// Clone `source` (a path, `file://` path, or `sithub://host[:port]`)
    /// into a new repository at `dest`.
    pub async fn clone(source: &str, dest: impl AsRef<Path>) -> RepoResult<Self> {
        let options = RepoConfig::default().transfer.clone_options();
        Self::clone_with_options(source, dest, options).await
    }

    pub async fn clone_with_options(
        source: &str,
        dest: impl AsRef<Path>,
        options: CloneOptions,
    ) -> RepoResult<Self> {
        let location = RemoteLocation::parse(source).map_err(|e| match e {
            ProtocolError::InvalidLocation { location, reason } => {
                RepoError::InvalidLocation { location, reason }
            }
            other => RepoError::Sync(other.into()),
        })?;
        let transport: Box<dyn RemoteTransport> = match &location {
            RemoteLocation::Local(path) => {
                let src = Self::open(path).map_err(|e| SyncError::SourceUnreachable {
                    location: location.to_string(),
                    reason: e.to_string(),
                })?;
                Box::new(src.local_transport())
            }
            RemoteLocation::Tcp { host, port } => Box::new(TcpTransport::new(host.clone(), *port)),
        };
        Self::clone_from_transport(&*transport, dest, options).await
    }

    /// Clone over an already chosen transport.
    ///
    /// Refs are written only after the whole object stream has been received
    /// and verified. Until then, and forever if anything fails, the
    /// destination carries the clone marker and [`open`](Self::open) refuses
    /// it.
    pub async fn clone_from_transport(
        transport: &dyn RemoteTransport,
        dest: impl AsRef<Path>,
        options: CloneOptions,
    ) -> RepoResult<Self> {
        let source = transport.describe();
        let repo = Self::initialize_marked(dest.as_ref(), RepoConfig::default(), &source)?;
        let marker = repo.meta.join(CLONE_MARKER);
        info!(%source, dest = %repo.path.display(), "clone started");

        let fetched = match fetch(transport, &*repo.objects, &*repo.refs, &options).await {
            Ok(fetched) => fetched,
            Err(e) => {
                warn!(%source, error = %e, "clone aborted; destination left incomplete");
                return Err(e.into());
            }
        };
        repo.publish_refs(&fetched.refs)?;
        fs::remove_file(&marker)?;
        info!(
            %source,
            objects = fetched.objects_received,
            refs = fetched.refs.len(),
            "clone finished"
        );
        Ok(repo)
    }

    /// Write the advertised refs as one unit.
    ///
    /// The whole advertisement is checked before anything is written, and
    /// if a write still fails, every ref touched so far is put back. Direct
    /// refs go first so every symbolic ref lands on an existing name.
    fn publish_refs(&self, advertised: &[AdvertisedRef]) -> RepoResult<()> {
        self.check_advertisement(advertised)?;
        let (direct, symbolic): (Vec<_>, Vec<_>) =
            advertised.iter().partition(|adv| !adv.target.is_symbolic());

        let mut written: Vec<(&str, Option<RefTarget>)> = Vec::new();
        for adv in direct.into_iter().chain(symbolic) {
            let previous = self.refs.read_ref(&adv.name)?;
            if let Err(e) = self.refs.set(&adv.name, &adv.target, &*self.objects) {
                self.roll_back(&written);
                return Err(e.into());
            }
            written.push((adv.name.as_str(), previous));
        }
        Ok(())
    }

    /// Names valid, direct targets stored, symbolic chains acyclic once the
    /// advertisement is laid over the refs already present.
    fn check_advertisement(&self, advertised: &[AdvertisedRef]) -> RepoResult<()> {
        let mut view: HashMap<String, RefTarget> = self.refs.list()?.into_iter().collect();
        for adv in advertised {
            validate_ref_name(&adv.name)?;
            match &adv.target {
                RefTarget::Direct(id) => {
                    if !self.objects.contains(id)? {
                        return Err(RefError::DanglingReference {
                            name: adv.name.clone(),
                            target: *id,
                        }
                        .into());
                    }
                }
                RefTarget::Symbolic(next) => validate_ref_name(next)?,
            }
            view.insert(adv.name.clone(), adv.target.clone());
        }
        for adv in advertised {
            let mut seen = HashSet::new();
            let mut current = adv.name.as_str();
            while let Some(RefTarget::Symbolic(next)) = view.get(current) {
                if !seen.insert(current) {
                    return Err(RefError::CyclicReference {
                        name: adv.name.clone(),
                    }
                    .into());
                }
                current = next.as_str();
            }
        }
        Ok(())
    }

    fn roll_back(&self, written: &[(&str, Option<RefTarget>)]) {
        for (name, previous) in written.iter().rev() {
            let restored = match previous {
                Some(target) => self.refs.write_ref(name, target),
                None => self.refs.delete_ref(name).map(|_| ()),
            };
            if let Err(e) = restored {
                warn!(name, error = %e, "could not roll back ref");
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn meta_dir(&self) -> &Path {
        &self.meta
    }

    pub fn config(&self) -> &RepoConfig {
        &self.config
    }

    pub fn objects(&self) -> &Arc<FileObjectStore> {
        &self.objects
    }

    pub fn refs(&self) -> &Arc<FileRefStore> {
        &self.refs
    }

    /// A transport serving this repository in-process.
    pub fn local_transport(&self) -> LocalTransport {
        LocalTransport::new(self.objects.clone(), self.refs.clone())
            .with_label(self.path.display().to_string())
    }

    /// An upload session over this repository, for one server connection.
    pub fn upload_session(&self) -> UploadSession {
        UploadSession::new(self.objects.clone(), self.refs.clone())
            .with_io_timeout(self.config.transfer.clone_options().io_timeout)
    }

    // ---- Content ----

    pub fn write_blob(&self, data: &[u8]) -> RepoResult<ObjectId> {
        Ok(self.objects.put(&Blob::new(data).into())?)
    }

    /// Write a tree. Every entry must point at a stored object.
    pub fn write_tree(&self, entries: Vec<TreeEntry>) -> RepoResult<ObjectId> {
        for entry in &entries {
            if !self.objects.contains(&entry.object_id)? {
                return Err(RepoError::MissingObject(entry.object_id));
            }
        }
        let tree = Tree::new(entries)?;
        Ok(self.objects.put(&tree.into())?)
    }

    /// Write a commit and advance the branch `HEAD` names (or `HEAD` itself
    /// when detached) with compare-and-swap.
    pub fn commit(&self, request: CommitRequest) -> RepoResult<CommitResult> {
        self.read_tree(&request.tree)?;
        let updated_ref = match self.refs.head()? {
            Some(RefTarget::Symbolic(branch)) => branch,
            _ => HEAD.to_string(),
        };
        let current = self.refs.read_ref(&updated_ref)?;
        let parents: Vec<ObjectId> = match request.parents {
            Some(explicit) => {
                let mut seen = HashSet::new();
                explicit.into_iter().filter(|p| seen.insert(*p)).collect()
            }
            None => self.try_resolve(&updated_ref)?.into_iter().collect(),
        };
        for parent in &parents {
            self.read_commit(parent)?;
        }

        let commit = Commit {
            tree: request.tree,
            parents: parents.clone(),
            author: request.author,
            timestamp: request.timestamp,
            message: request.message,
        };
        let id = self.objects.put(&commit.into())?;
        self.refs
            .update(&updated_ref, current.as_ref(), &RefTarget::Direct(id), &*self.objects)?;
        info!(commit = %id.short_hex(), branch = %updated_ref, "committed");

        Ok(CommitResult {
            commit: id,
            updated_ref,
            parents,
        })
    }

    // ---- Refs ----

    /// The commit `HEAD` resolves to, or `None` on an unborn branch.
    pub fn head_commit(&self) -> RepoResult<Option<ObjectId>> {
        self.try_resolve(HEAD)
    }

    pub fn resolve(&self, name: &str) -> RepoResult<ObjectId> {
        Ok(self.refs.resolve(name, &*self.objects)?)
    }

    fn try_resolve(&self, name: &str) -> RepoResult<Option<ObjectId>> {
        match self.refs.resolve(name, &*self.objects) {
            Ok(id) => Ok(Some(id)),
            Err(RefError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn set_ref(&self, name: &str, id: ObjectId) -> RepoResult<()> {
        Ok(self.refs.set(name, &RefTarget::Direct(id), &*self.objects)?)
    }

    pub fn set_symbolic_ref(&self, name: &str, target: &str) -> RepoResult<()> {
        Ok(self
            .refs
            .set(name, &RefTarget::Symbolic(target.to_string()), &*self.objects)?)
    }

    pub fn list_refs(&self) -> RepoResult<Vec<(String, RefTarget)>> {
        Ok(self.refs.list()?)
    }

    /// Every object reachable from `roots`, each once.
    pub fn walk_reachable(&self, roots: &[ObjectId]) -> ReachableWalk<'_> {
        walk_reachable(&*self.objects, roots)
    }

    // ---- Typed reads ----

    pub fn read_blob(&self, id: &ObjectId) -> RepoResult<Vec<u8>> {
        let obj = self.read_object(id)?;
        let actual = obj.kind();
        obj.into_blob()
            .map(|blob| blob.data)
            .ok_or_else(|| unexpected(id, ObjectKind::Blob, actual))
    }

    pub fn read_tree(&self, id: &ObjectId) -> RepoResult<Tree> {
        let obj = self.read_object(id)?;
        let actual = obj.kind();
        obj.into_tree()
            .ok_or_else(|| unexpected(id, ObjectKind::Tree, actual))
    }

    pub fn read_commit(&self, id: &ObjectId) -> RepoResult<Commit> {
        let obj = self.read_object(id)?;
        let actual = obj.kind();
        obj.into_commit()
            .ok_or_else(|| unexpected(id, ObjectKind::Commit, actual))
    }

    fn read_object(&self, id: &ObjectId) -> RepoResult<Object> {
        match self.objects.get(id) {
            Ok(obj) => Ok(obj),
            Err(StoreError::NotFound(missing)) => Err(RepoError::MissingObject(missing)),
            Err(e) => Err(e.into()),
        }
    }
}

fn unexpected(id: &ObjectId, expected: ObjectKind, actual: ObjectKind) -> RepoError {
    RepoError::UnexpectedKind {
        id: *id,
        expected,
        actual,
    }
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("path", &self.path)
            .field("default_branch", &self.config.default_branch)
            .finish_non_exhaustive()
    }
}
