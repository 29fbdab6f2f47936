//! Session and job store
//!
//! Every client is identified by an opaque token with a bounded lifetime.
//! Jobs are registered under an identity and own a directory of results:
//!
//! ```text
//! <scratch root>/id/<identity token>/<job id>/
//! ```
//!
//! A job directory exists iff its id is in the identity's job set. All state
//! sits behind a single reader/writer lock; filesystem changes that must stay
//! consistent with the maps happen while the write lock is held. Expired
//! identities are only removed by [`SessionStore::sweep`], lookups never evict.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use thiserror::Error;
use tokio::fs;
use tokio::sync::RwLock;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::dispatch::AXES;
use crate::persist::{TABLE_EXTENSION, TABLE_MARKER};

/// Default identity lifetime
pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Default period of the background sweep
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Directory under the scratch root holding one directory per identity
pub const IDENTITY_DIR: &str = "id";

/// Opaque per-client token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IdentityToken(Uuid);

impl IdentityToken {
    /// Fresh random token
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for IdentityToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for IdentityToken {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

/// Lifetime record of a token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    pub token: IdentityToken,
    pub created_at: DateTime<Utc>,
    /// Absolute expiry, never refreshed
    pub expires_at: DateTime<Utc>,
}

impl Identity {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Outcome of [`SessionStore::resolve`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolved {
    pub identity: Identity,
    /// The presented token was absent, malformed or expired and a new
    /// identity was issued
    pub is_new: bool,
}

/// Store lifetimes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    pub ttl: Duration,
    pub sweep_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

/// Session and job errors
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("unknown or expired identity")]
    UnknownIdentity,

    #[error("invalid job id {0:?}")]
    InvalidJobId(String),

    #[error("invalid axis {0:?}")]
    InvalidAxis(String),

    #[error("unknown job {job:?}")]
    UnknownJob { job: String },

    #[error("could not find output data file for job {job:?} (axis={axis:?})")]
    NotFound { job: String, axis: String },

    #[error("found {count} output data files for job {job:?} (axis={axis:?}), want 1")]
    Ambiguous {
        job: String,
        axis: String,
        count: usize,
    },

    #[error("could not create directory {path}: {source}")]
    CreateDir { path: PathBuf, source: io::Error },

    #[error("could not remove directory {path}: {source}")]
    RemoveDir { path: PathBuf, source: io::Error },

    #[error("could not read {path}: {source}")]
    Read { path: PathBuf, source: io::Error },
}

/// A persisted table read back for download
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub path: PathBuf,
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Counters of one sweep pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Identities purged
    pub expired: usize,
    /// Job directories deleted
    pub jobs_removed: usize,
    /// Filesystem failures (logged, not fatal)
    pub errors: usize,
}

#[derive(Debug, Default)]
struct State {
    identities: HashMap<IdentityToken, Identity>,
    jobs: HashMap<IdentityToken, HashSet<String>>,
}

#[derive(Debug)]
struct Inner {
    root: PathBuf,
    ttl: TimeDelta,
    sweep_interval: Duration,
    state: RwLock<State>,
}

/// Shared handle on the identity and job state
#[derive(Debug, Clone)]
pub struct SessionStore {
    inner: Arc<Inner>,
}

/// Creates a fresh, uniquely named scratch root under `parent`
pub async fn create_scratch_root(parent: &Path) -> io::Result<PathBuf> {
    let root = parent.join(format!("fouracc-srv-{}", Uuid::new_v4()));
    fs::create_dir_all(&root).await?;
    Ok(root)
}

/// Rejects ids that are not a single plain path component
pub fn validate_job_id(job_id: &str) -> Result<(), SessionError> {
    let bad = job_id.is_empty()
        || job_id == "."
        || job_id == ".."
        || job_id.contains(['/', '\\', '\0']);
    if bad {
        return Err(SessionError::InvalidJobId(job_id.to_string()));
    }
    Ok(())
}

fn validate_axis(axis: &str) -> Result<(), SessionError> {
    if axis.is_empty() || AXES.contains(&axis) {
        Ok(())
    } else {
        Err(SessionError::InvalidAxis(axis.to_string()))
    }
}

/// Whether `file_name` is a coefficient table for `axis` (any table when
/// `axis` is empty)
fn is_table_for(file_name: &str, axis: &str) -> bool {
    let Some(stem) = file_name.strip_suffix(TABLE_EXTENSION).and_then(|s| s.strip_suffix('.')) else {
        return false;
    };
    if axis.is_empty() {
        return true;
    }
    match stem.rfind(TABLE_MARKER) {
        Some(pos) => stem[..pos].ends_with(&format!("-{}", axis)),
        None => false,
    }
}

impl SessionStore {
    /// Opens a store rooted at `root`, creating the identity directory.
    pub async fn open(root: impl Into<PathBuf>, config: SessionConfig) -> Result<Self, SessionError> {
        let root = root.into();
        let ids = root.join(IDENTITY_DIR);
        fs::create_dir_all(&ids)
            .await
            .map_err(|source| SessionError::CreateDir { path: ids, source })?;

        let ttl = TimeDelta::from_std(config.ttl).unwrap_or(TimeDelta::MAX);
        info!(root = %root.display(), ttl_secs = config.ttl.as_secs(), "session store opened");
        Ok(Self {
            inner: Arc::new(Inner {
                root,
                ttl,
                sweep_interval: config.sweep_interval.max(Duration::from_millis(1)),
                state: RwLock::new(State::default()),
            }),
        })
    }

    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    fn identity_path(&self, token: &IdentityToken) -> PathBuf {
        self.inner.root.join(IDENTITY_DIR).join(token.to_string())
    }

    fn job_path(&self, token: &IdentityToken, job_id: &str) -> PathBuf {
        self.identity_path(token).join(job_id)
    }

    /// Returns the live identity for `presented` or issues a new one.
    pub async fn resolve(&self, presented: Option<&str>) -> Resolved {
        self.resolve_at(presented, Utc::now()).await
    }

    pub async fn resolve_at(&self, presented: Option<&str>, now: DateTime<Utc>) -> Resolved {
        if let Some(token) = presented.and_then(|s| s.parse::<IdentityToken>().ok()) {
            let state = self.inner.state.read().await;
            let live = state
                .identities
                .get(&token)
                .filter(|identity| !identity.is_expired_at(now))
                .copied();
            if let Some(identity) = live {
                return Resolved {
                    identity,
                    is_new: false,
                };
            }
        }

        let mut state = self.inner.state.write().await;
        let identity = Identity {
            token: IdentityToken::generate(),
            created_at: now,
            expires_at: now.checked_add_signed(self.inner.ttl).unwrap_or(DateTime::<Utc>::MAX_UTC),
        };
        state.identities.insert(identity.token, identity);
        state.jobs.insert(identity.token, HashSet::new());
        debug!(token = %identity.token, expires_at = %identity.expires_at, "new identity");

        Resolved {
            identity,
            is_new: true,
        }
    }

    /// Identity record of `token`, expired or not, until it is swept
    pub async fn identity(&self, token: &IdentityToken) -> Option<Identity> {
        self.inner.state.read().await.identities.get(token).copied()
    }

    /// Registered job ids of `token`, sorted
    pub async fn jobs(&self, token: &IdentityToken) -> Vec<String> {
        let state = self.inner.state.read().await;
        let mut jobs: Vec<String> = state
            .jobs
            .get(token)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        jobs.sort();
        jobs
    }

    /// Registers `job_id` under `token` and creates its directory.
    ///
    /// Registering an id twice is harmless and returns the same directory.
    pub async fn register_job(&self, token: &IdentityToken, job_id: &str) -> Result<PathBuf, SessionError> {
        validate_job_id(job_id)?;

        let mut state = self.inner.state.write().await;
        if !state.identities.contains_key(token) {
            return Err(SessionError::UnknownIdentity);
        }

        let dir = self.job_path(token, job_id);
        fs::create_dir_all(&dir)
            .await
            .map_err(|source| SessionError::CreateDir {
                path: dir.clone(),
                source,
            })?;
        state.jobs.entry(*token).or_default().insert(job_id.to_string());

        info!(token = %token, job_id = %job_id, "job registered");
        Ok(dir)
    }

    /// Directory of a registered job
    pub async fn job_dir(&self, token: &IdentityToken, job_id: &str) -> Result<PathBuf, SessionError> {
        let state = self.inner.state.read().await;
        if !Self::has_job(&state, token, job_id) {
            return Err(SessionError::UnknownJob {
                job: job_id.to_string(),
            });
        }
        Ok(self.job_path(token, job_id))
    }

    fn has_job(state: &State, token: &IdentityToken, job_id: &str) -> bool {
        state.jobs.get(token).is_some_and(|set| set.contains(job_id))
    }

    /// Reads the single coefficient table of `job_id` for `axis`.
    ///
    /// The read lock is held until the file is read so a concurrent removal
    /// or sweep cannot pull the directory away mid-read.
    pub async fn read_artifact(
        &self,
        token: &IdentityToken,
        job_id: &str,
        axis: &str,
    ) -> Result<Artifact, SessionError> {
        validate_axis(axis)?;

        let state = self.inner.state.read().await;
        if !Self::has_job(&state, token, job_id) {
            return Err(SessionError::UnknownJob {
                job: job_id.to_string(),
            });
        }

        let dir = self.job_path(token, job_id);
        let read_err = |source| SessionError::Read {
            path: dir.clone(),
            source,
        };
        let mut entries = fs::read_dir(&dir).await.map_err(read_err)?;
        let mut matches = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(read_err)? {
            if let Some(name) = entry.file_name().to_str() {
                if is_table_for(name, axis) {
                    matches.push(name.to_string());
                }
            }
        }

        match matches.len() {
            0 => Err(SessionError::NotFound {
                job: job_id.to_string(),
                axis: axis.to_string(),
            }),
            1 => {
                let file_name = matches.remove(0);
                let path = dir.join(&file_name);
                let bytes = fs::read(&path).await.map_err(|source| SessionError::Read {
                    path: path.clone(),
                    source,
                })?;
                Ok(Artifact {
                    path,
                    file_name,
                    bytes,
                })
            }
            count => {
                warn!(job_id = %job_id, axis = %axis, ?matches, "invalid number of output data files");
                Err(SessionError::Ambiguous {
                    job: job_id.to_string(),
                    axis: axis.to_string(),
                    count,
                })
            }
        }
    }

    /// Deletes the directory of `job_id`, then forgets the id.
    pub async fn remove_job(&self, token: &IdentityToken, job_id: &str) -> Result<(), SessionError> {
        let mut state = self.inner.state.write().await;
        if !Self::has_job(&state, token, job_id) {
            return Err(SessionError::UnknownJob {
                job: job_id.to_string(),
            });
        }

        let dir = self.job_path(token, job_id);
        match fs::remove_dir_all(&dir).await {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(source) => return Err(SessionError::RemoveDir { path: dir, source }),
        }
        if let Some(set) = state.jobs.get_mut(token) {
            set.remove(job_id);
        }

        info!(token = %token, job_id = %job_id, "job removed");
        Ok(())
    }

    /// Purges every expired identity with its jobs.
    pub async fn sweep(&self) -> SweepReport {
        self.sweep_at(Utc::now()).await
    }

    pub async fn sweep_at(&self, now: DateTime<Utc>) -> SweepReport {
        let mut state = self.inner.state.write().await;
        let mut report = SweepReport::default();

        let expired: Vec<IdentityToken> = state
            .identities
            .values()
            .filter(|identity| identity.is_expired_at(now))
            .map(|identity| identity.token)
            .collect();

        for token in expired {
            let jobs = state.jobs.remove(&token).unwrap_or_default();
            for job_id in &jobs {
                let dir = self.job_path(&token, job_id);
                match remove_dir(&dir).await {
                    Ok(()) => report.jobs_removed += 1,
                    Err(err) => {
                        warn!(path = %dir.display(), error = %err, "could not remove job directory");
                        report.errors += 1;
                    }
                }
            }

            let dir = self.identity_path(&token);
            if let Err(err) = remove_dir(&dir).await {
                warn!(path = %dir.display(), error = %err, "could not remove identity directory");
                report.errors += 1;
            }

            state.identities.remove(&token);
            report.expired += 1;
            debug!(token = %token, jobs = jobs.len(), "identity expired");
        }

        report
    }

    /// Period of the background sweep
    pub fn sweep_interval(&self) -> Duration {
        self.inner.sweep_interval
    }

    /// Starts the background sweep: one pass right away, then every
    /// [`SessionConfig::sweep_interval`].
    pub fn spawn_sweeper(&self) -> SweeperHandle {
        let store = self.clone();
        let cancel = CancellationToken::new();
        let stop = cancel.clone();
        let period = self.inner.sweep_interval;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = ticker.tick() => {
                        let report = store.sweep().await;
                        if report.expired > 0 || report.errors > 0 {
                            info!(
                                expired = report.expired,
                                jobs_removed = report.jobs_removed,
                                errors = report.errors,
                                "session sweep"
                            );
                        }
                    }
                }
            }
            debug!("session sweeper stopped");
        });

        info!(period_secs = period.as_secs(), "session sweeper started");
        SweeperHandle { cancel, handle }
    }

    /// Deletes the whole scratch root and forgets every identity.
    pub async fn purge_root(&self) -> io::Result<()> {
        let mut state = self.inner.state.write().await;
        state.identities.clear();
        state.jobs.clear();
        remove_dir(&self.inner.root).await?;
        info!(root = %self.inner.root.display(), "scratch root removed");
        Ok(())
    }
}

async fn remove_dir(path: &Path) -> io::Result<()> {
    match fs::remove_dir_all(path).await {
        Err(err) if err.kind() != io::ErrorKind::NotFound => Err(err),
        _ => Ok(()),
    }
}

/// Stops the background sweep
#[derive(Debug)]
pub struct SweeperHandle {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl SweeperHandle {
    /// Signals the sweeper and waits for it to exit.
    pub async fn shutdown(self) -> Result<(), JoinError> {
        self.cancel.cancel();
        self.handle.await
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}
