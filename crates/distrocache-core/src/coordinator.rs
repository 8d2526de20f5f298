//! Turns manifest entries into a persisted, fully resolved snapshot.
//!
//! Each entry is resolved to an immutable version, looked up in the [`Store`]
//! and, on a miss, fetched and inspected. Work for one repository state or
//! one reference runs at most once at a time per [`CoordinationContext`];
//! concurrent requests needing it wait for the running execution.

use std::{sync::Arc, time::Duration};

use chrono::{SubsecRound, Utc};
use distrocache_config::{config::Config, distro::DistroSettings};
use distrocache_db::error::DbError;
use distrocache_fetch::{
    http_client::configure_http_client, Fetcher, GitFetcher, RefKind, ResolvedRef,
};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::{
    augment::{self, run_augmenters, Augmenter},
    discovery::{self, Discoverer},
    error::{DistroError, EntryFailure, ResolveError, Result},
    inflight::{InFlight, Shared},
    manifest::{ManifestSource, RosDistroSource},
    model::{set_name, ManifestEntry, RepoKey, RepoState, SetInfo, SetRequest, Snapshot},
    store::{SetWrite, Store, StoredRepoState},
};

const DEFAULT_FETCH_CONCURRENCY: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct RefKey {
    kind: String,
    url: String,
    reference: String,
}

/// Work currently running on behalf of a [`Coordinator`].
///
/// Holds no state across restarts; create one per process, or one per test.
#[derive(Default)]
pub struct CoordinationContext {
    repo_states: Arc<InFlight<RepoKey, StoredRepoState>>,
    refs: Arc<InFlight<RefKey, ResolvedRef>>,
}

impl CoordinationContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Repository states currently being fetched.
    pub fn fetches_in_flight(&self) -> usize {
        self.repo_states.len()
    }

    /// References currently being resolved.
    pub fn resolutions_in_flight(&self) -> usize {
        self.refs.len()
    }
}

/// Orchestrates ref resolution, fetching, discovery and persistence.
#[derive(Clone)]
pub struct Coordinator {
    store: Store,
    fetcher: Arc<dyn Fetcher>,
    discoverer: Arc<dyn Discoverer>,
    manifests: Arc<dyn ManifestSource>,
    augmenters: Arc<[Arc<dyn Augmenter>]>,
    context: Arc<CoordinationContext>,
    downloads: Arc<Semaphore>,
    refresh_interval: Option<Duration>,
    distro: Arc<DistroSettings>,
    metadata_inclusions: Arc<[String]>,
}

impl Coordinator {
    pub fn new(
        store: Store,
        fetcher: Arc<dyn Fetcher>,
        discoverer: Arc<dyn Discoverer>,
        manifests: Arc<dyn ManifestSource>,
    ) -> Self {
        Self {
            store,
            fetcher,
            discoverer,
            manifests,
            augmenters: Arc::from(Vec::new()),
            context: Arc::new(CoordinationContext::new()),
            downloads: Arc::new(Semaphore::new(DEFAULT_FETCH_CONCURRENCY)),
            refresh_interval: Some(Duration::from_secs(300)),
            distro: Arc::new(DistroSettings::default()),
            metadata_inclusions: Arc::from(Vec::new()),
        }
    }

    /// Wires up every collaborator from configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        let http = config.http.clone();
        configure_http_client(|client| {
            client.user_agent = Some(http.user_agent());
            client.timeout = Some(http.timeout());
        });

        let store = Store::open(config.get_database_path()?)?;
        let fetcher: Arc<dyn Fetcher> = Arc::new(
            GitFetcher::new(config.get_work_dir()?).with_host_api(config.http.use_host_api()),
        );
        let manifests = Arc::new(RosDistroSource::new(fetcher.clone(), config.distro.clone()));
        let discoverer = discovery::from_settings(&config.discovery)?;
        let augmenters = augment::from_names(&config.discovery.augmenters())?;

        Ok(Self::new(store, fetcher, discoverer, manifests)
            .with_augmenters(augmenters)
            .with_fetch_concurrency(config.get_fetch_concurrency())
            .with_refresh_interval(config.get_refresh_interval())
            .with_distro_settings(config.distro.clone())
            .with_metadata_inclusions(config.get_metadata_inclusions()))
    }

    pub fn with_augmenters(mut self, augmenters: Vec<Arc<dyn Augmenter>>) -> Self {
        self.augmenters = Arc::from(augmenters);
        self
    }

    /// Shares in-flight bookkeeping with other coordinators.
    pub fn with_context(mut self, context: Arc<CoordinationContext>) -> Self {
        self.context = context;
        self
    }

    /// Limits how many repositories are downloaded and inspected at once.
    pub fn with_fetch_concurrency(mut self, limit: usize) -> Self {
        self.downloads = Arc::new(Semaphore::new(limit.max(1)));
        self
    }

    /// How long a floating set is served from the store before it is
    /// resolved again. `None` never refreshes.
    pub fn with_refresh_interval(mut self, interval: Option<Duration>) -> Self {
        self.refresh_interval = interval;
        self
    }

    pub fn with_distro_settings(mut self, settings: DistroSettings) -> Self {
        self.distro = Arc::new(settings);
        self
    }

    pub fn with_metadata_inclusions(mut self, inclusions: Vec<String>) -> Self {
        self.metadata_inclusions = Arc::from(inclusions);
        self
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn context(&self) -> &Arc<CoordinationContext> {
        &self.context
    }

    /// Serves the snapshot for `set_ref` of `distribution`.
    ///
    /// Frozen sets, and floating sets refreshed within the refresh interval,
    /// come straight from the store. Anything else is loaded from the
    /// manifest source and resolved. Metadata is filtered to the configured
    /// inclusions.
    pub async fn snapshot(
        &self,
        distribution: &str,
        set_ref: &str,
    ) -> std::result::Result<Snapshot, ResolveError> {
        if !self.distro.is_allowed(distribution) {
            return Err(DistroError::UnknownDistribution(distribution.to_string()).into());
        }
        let name = set_name(set_ref);

        if let Some(existing) = self.store.get_set(distribution, name)? {
            if !existing.info.is_stale(self.refresh_interval, Utc::now()) {
                if let Some(snapshot) = self.store.load_snapshot(distribution, name)? {
                    debug!(distribution, name, "serving set from store");
                    return Ok(snapshot.with_metadata(&self.metadata_inclusions));
                }
            }
            debug!(distribution, name, "set is due for revalidation");
        }

        let manifests = self.manifests.clone();
        let (dist, reference) = (distribution.to_string(), name.to_string());
        let manifest = tokio::task::spawn_blocking(move || manifests.load(&dist, &reference))
            .await
            .map_err(DistroError::from)??;
        info!(
            distribution,
            name,
            version = %manifest.version,
            entries = manifest.entries.len(),
            "loaded manifest"
        );

        let snapshot = self
            .resolve(SetRequest {
                distribution: distribution.to_string(),
                name: name.to_string(),
                floating: manifest.floating,
                entries: manifest.entries,
            })
            .await?;
        Ok(snapshot.with_metadata(&self.metadata_inclusions))
    }

    /// Resolves every entry of `request`, persists the set and returns it.
    ///
    /// Entries are processed concurrently. Entries that succeed stay cached
    /// even when others fail; failures are reported per entry and never
    /// remembered, so a later call retries them.
    pub async fn resolve(&self, request: SetRequest) -> std::result::Result<Snapshot, ResolveError> {
        let total = request.entries.len();
        debug!(
            distribution = %request.distribution,
            name = %request.name,
            total,
            "resolving set"
        );

        let handles: Vec<_> = request
            .entries
            .iter()
            .cloned()
            .map(|entry| {
                let this = self.clone();
                tokio::spawn(async move { this.resolve_entry(&entry).await })
            })
            .collect();

        let mut members = Vec::with_capacity(total);
        let mut failures = Vec::new();
        for (entry, handle) in request.entries.iter().zip(handles) {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(err) => Err(Arc::new(DistroError::from(err))),
            };
            match outcome {
                Ok(stored) => members.push(stored),
                Err(error) => {
                    warn!(
                        repository = %entry.name,
                        reference = %entry.reference,
                        error = %error,
                        "failed to resolve repository"
                    );
                    failures.push(EntryFailure::new(entry, error));
                }
            }
        }

        if !failures.is_empty() {
            return Err(ResolveError::Entries { failures, total });
        }

        let snapshot = self.persist_set(&request, members)?;
        Ok(snapshot)
    }

    fn persist_set(&self, request: &SetRequest, members: Vec<StoredRepoState>) -> Result<Snapshot> {
        let set = SetInfo {
            distribution: request.distribution.clone(),
            name: request.name.clone(),
            last_updated: request.floating.then(|| Utc::now().trunc_subsecs(0)),
        };
        let ids: Vec<i32> = members.iter().map(|m| m.id).collect();

        let write = self.store.save_set(&set, &ids)?;
        info!(
            distribution = %set.distribution,
            name = %set.name,
            members = ids.len(),
            ?write,
            "saved set"
        );

        if write == SetWrite::Kept {
            // A frozen set is never rewritten; serve what is stored.
            if let Some(stored) = self.store.load_snapshot(&set.distribution, &set.name)? {
                return Ok(stored);
            }
        }

        let mut repo_states: Vec<RepoState> = members
            .into_iter()
            .map(|m| m.state.as_ref().clone())
            .collect();
        repo_states.sort_by(|a, b| a.key().cmp(&b.key()));
        repo_states.dedup_by(|a, b| a.key() == b.key());

        Ok(Snapshot { set, repo_states })
    }

    async fn resolve_entry(&self, entry: &ManifestEntry) -> Shared<StoredRepoState> {
        let resolved = self.resolve_version(entry).await?;
        let key = RepoKey::new(entry, resolved.version);

        if let Some(hit) = self.store.get_repo_state(&key).map_err(Arc::new)? {
            debug!(repository = %key.name, version = %key.version, "repository state cached");
            return Ok(hit);
        }

        let this = self.clone();
        let work_key = key.clone();
        self.context
            .repo_states
            .run(key, move || {
                async move { this.populate(work_key).await.map_err(Arc::new) }
            })
            .await
    }

    async fn resolve_version(&self, entry: &ManifestEntry) -> Shared<ResolvedRef> {
        if RefKind::classify(&entry.reference) == RefKind::Immutable {
            return Ok(ResolvedRef::commit(&entry.reference));
        }

        let key = RefKey {
            kind: entry.kind.clone(),
            url: entry.url.clone(),
            reference: entry.reference.clone(),
        };
        let fetcher = self.fetcher.clone();
        let work_key = key.clone();
        self.context
            .refs
            .run(key, move || {
                async move {
                    let RefKey {
                        kind,
                        url,
                        reference,
                    } = work_key;
                    let outcome = tokio::task::spawn_blocking(move || {
                        fetcher.resolve_ref(&kind, &url, &reference).map_err(|source| {
                            DistroError::RefResolution {
                                url,
                                reference,
                                source,
                            }
                        })
                    })
                    .await;
                    match outcome {
                        Ok(resolved) => resolved.map_err(Arc::new),
                        Err(err) => Err(Arc::new(DistroError::from(err))),
                    }
                }
            })
            .await
    }

    /// Fetches, inspects and stores one repository state. Runs once per key
    /// at a time.
    async fn populate(self, key: RepoKey) -> Result<StoredRepoState> {
        // Another execution may have stored it between our lookup and
        // registration.
        if let Some(hit) = self.store.get_repo_state(&key)? {
            return Ok(hit);
        }

        let permit = self
            .downloads
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| DistroError::Task(e.to_string()))?;

        let fetcher = self.fetcher.clone();
        let discoverer = self.discoverer.clone();
        let augmenters = self.augmenters.clone();
        let build_key = key.clone();
        let state = tokio::task::spawn_blocking(move || {
            build_repo_state(
                fetcher.as_ref(),
                discoverer.as_ref(),
                &augmenters,
                build_key,
            )
        })
        .await??;
        drop(permit);

        self.store.put_repo_state(&state)?;
        let stored = self
            .store
            .get_repo_state(&key)?
            .ok_or_else(|| DbError::NotFound(format!("{}@{}", key.name, key.version)))?;
        info!(
            repository = %key.name,
            version = %key.version,
            packages = stored.state.package_descriptors.len(),
            "cached repository state"
        );
        Ok(stored)
    }
}

/// Downloads, inspects and augments one repository version. The extracted
/// tree is removed when this returns, on success or failure.
fn build_repo_state(
    fetcher: &dyn Fetcher,
    discoverer: &dyn Discoverer,
    augmenters: &[Arc<dyn Augmenter>],
    key: RepoKey,
) -> Result<RepoState> {
    let tree = fetcher
        .fetch(&key.kind, &key.url, &key.version)
        .map_err(|source| {
            DistroError::Fetch {
                name: key.name.clone(),
                version: key.version.clone(),
                source,
            }
        })?;

    let mut package_descriptors = discoverer.discover(tree.path()).map_err(|source| {
        DistroError::Discovery {
            name: key.name.clone(),
            version: key.version.clone(),
            source,
        }
    })?;
    package_descriptors.sort_by(|a, b| a.name.cmp(&b.name));

    let metadata = run_augmenters(augmenters, tree.path(), &key.name);

    Ok(RepoState {
        name: key.name,
        kind: key.kind,
        url: key.url,
        version: key.version,
        metadata,
        package_descriptors,
    })
}
