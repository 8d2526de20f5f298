//! Persistent cache of repository states and the sets built from them.

use std::{
    path::Path,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use chrono::{DateTime, SecondsFormat, Utc};
use diesel::{Connection, QueryResult, SqliteConnection};
use distrocache_db::{
    connection::DbConnection,
    error::DbError,
    models::{
        repo_state::{NewRepoState, RepoStateRow},
        set::{NewSet, SetRow},
    },
    repository::{RepoStateRepository, SetRepository},
};
use serde_json::{Map, Value};
use tracing::{debug, trace};

use crate::{
    error::{DistroError, Result},
    model::{RepoKey, RepoState, SetInfo, Snapshot},
};

/// A repository state together with its row ID.
#[derive(Debug, Clone)]
pub struct StoredRepoState {
    pub id: i32,
    pub state: Arc<RepoState>,
}

/// A set together with its row ID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSet {
    pub id: i32,
    pub info: SetInfo,
}

/// What [`Store::save_set`] did with an incoming set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetWrite {
    /// No set had the name; it was inserted.
    Created,
    /// A floating set changed members and was rewritten.
    Updated,
    /// A floating set kept its members; only the timestamp moved.
    Refreshed,
    /// A frozen set already existed and was left alone.
    Kept,
}

enum Deletion {
    Missing,
    Referenced,
    Deleted,
}

/// Thread-safe handle over the cache database.
///
/// All access goes through one connection, so each call runs to completion
/// without interleaving with another.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<DbConnection>>,
}

impl Store {
    /// Opens (creating if needed) the database at `path` and migrates it.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| {
                DistroError::Io {
                    action: format!("creating database directory {}", parent.display()),
                    source,
                }
            })?;
        }
        debug!(path = %path.display(), "opening cache database");
        let conn = DbConnection::open(path).map_err(DbError::from)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = DbConnection::open_in_memory().map_err(DbError::from)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> MutexGuard<'_, DbConnection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Executes a function with the connection.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut SqliteConnection) -> QueryResult<T>,
    {
        let mut conn = self.lock();
        f(conn.conn()).map_err(|e| DistroError::Store(e.into()))
    }

    /// Executes a function within a transaction.
    pub fn transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut SqliteConnection) -> QueryResult<T>,
    {
        let mut conn = self.lock();
        conn.conn()
            .transaction(f)
            .map_err(|e| DistroError::Store(e.into()))
    }

    pub fn get_repo_state(&self, key: &RepoKey) -> Result<Option<StoredRepoState>> {
        let row = self.with_conn(|conn| {
            RepoStateRepository::find(conn, &key.name, &key.kind, &key.url, &key.version)
        })?;
        row.map(repo_state_from_row).transpose()
    }

    /// Inserts `state` unless its tuple is already cached. Either way the ID
    /// of the cached row is returned and an existing row is never modified.
    pub fn put_repo_state(&self, state: &RepoState) -> Result<i32> {
        let created_at = format_timestamp(Utc::now());
        let new_state = NewRepoState {
            name: &state.name,
            kind: &state.kind,
            url: &state.url,
            version: &state.version,
            metadata: Value::Object(state.metadata.clone()),
            package_descriptors: serde_json::to_value(&state.package_descriptors)
                .map_err(DbError::from)?,
            created_at: &created_at,
        };
        let id = self.transaction(|conn| RepoStateRepository::insert_if_absent(conn, &new_state))?;
        trace!(id, name = %state.name, version = %state.version, "stored repository state");
        Ok(id)
    }

    pub fn get_set(&self, distribution: &str, name: &str) -> Result<Option<StoredSet>> {
        let row = self.with_conn(|conn| SetRepository::find(conn, distribution, name))?;
        row.map(set_from_row).transpose()
    }

    /// Inserts a new set with its members in one transaction. Every member
    /// must already exist and the set name must be unused.
    pub fn put_set(&self, set: &SetInfo, member_ids: &[i32]) -> Result<i32> {
        let last_updated = set.last_updated.map(format_timestamp);
        self.transaction(|conn| insert_set(conn, set, last_updated.as_deref(), member_ids))
    }

    /// Records the outcome of resolving a set.
    ///
    /// A missing set is created. An existing floating set has its members
    /// replaced when they differ and its timestamp set to `set.last_updated`.
    /// An existing frozen set is never touched.
    pub fn save_set(&self, set: &SetInfo, member_ids: &[i32]) -> Result<SetWrite> {
        let mut member_ids = member_ids.to_vec();
        member_ids.sort_unstable();
        member_ids.dedup();
        let last_updated = set.last_updated.map(format_timestamp);

        self.transaction(|conn| {
            let Some(existing) = SetRepository::find(conn, &set.distribution, &set.name)? else {
                insert_set(conn, set, last_updated.as_deref(), &member_ids)?;
                return Ok(SetWrite::Created);
            };
            if existing.last_updated.is_none() {
                return Ok(SetWrite::Kept);
            }

            let changed = SetRepository::member_ids(conn, existing.id)? != member_ids;
            if changed {
                SetRepository::clear_members(conn, existing.id)?;
                SetRepository::add_members(conn, existing.id, &member_ids)?;
            }
            SetRepository::touch(conn, existing.id, last_updated.as_deref())?;
            Ok(if changed {
                SetWrite::Updated
            } else {
                SetWrite::Refreshed
            })
        })
    }

    /// Reads a set and its members, ordered by repository name.
    pub fn load_snapshot(&self, distribution: &str, name: &str) -> Result<Option<Snapshot>> {
        let loaded = self.transaction(|conn| {
            let Some(set) = SetRepository::find(conn, distribution, name)? else {
                return Ok(None);
            };
            let members = SetRepository::member_states(conn, set.id)?;
            Ok(Some((set, members)))
        })?;

        let Some((set, members)) = loaded else {
            return Ok(None);
        };
        let repo_states = members
            .into_iter()
            .map(|row| repo_state_from_row(row).map(|stored| stored.state.as_ref().clone()))
            .collect::<Result<Vec<_>>>()?;

        Ok(Some(Snapshot {
            set: set_from_row(set)?.info,
            repo_states,
        }))
    }

    /// Lists sets, optionally limited to one distribution.
    pub fn list_sets(&self, distribution: Option<&str>) -> Result<Vec<SetInfo>> {
        self.with_conn(|conn| SetRepository::list(conn, distribution))?
            .into_iter()
            .map(|row| set_from_row(row).map(|stored| stored.info))
            .collect()
    }

    /// Deletes a set and its membership rows. Returns whether it existed.
    pub fn delete_set(&self, distribution: &str, name: &str) -> Result<bool> {
        let deleted = self.with_conn(|conn| SetRepository::delete(conn, distribution, name))?;
        debug!(distribution, name, deleted, "deleted set");
        Ok(deleted > 0)
    }

    /// Deletes an unreferenced repository state. Returns whether it existed;
    /// a state still referenced by any set is an integrity error.
    pub fn delete_repo_state(&self, key: &RepoKey) -> Result<bool> {
        let deletion = self.transaction(|conn| {
            let Some(row) =
                RepoStateRepository::find(conn, &key.name, &key.kind, &key.url, &key.version)?
            else {
                return Ok(Deletion::Missing);
            };
            if RepoStateRepository::is_referenced(conn, row.id)? {
                return Ok(Deletion::Referenced);
            }
            RepoStateRepository::delete_by_id(conn, row.id).map(|_| Deletion::Deleted)
        })?;

        match deletion {
            Deletion::Missing => Ok(false),
            Deletion::Deleted => {
                debug!(name = %key.name, version = %key.version, "deleted repo state");
                Ok(true)
            }
            Deletion::Referenced => {
                Err(DistroError::Store(DbError::IntegrityError(format!(
                    "repository state {}@{} is still referenced by a set",
                    key.name, key.version
                ))))
            }
        }
    }

    pub fn repo_state_count(&self) -> Result<i64> {
        self.with_conn(RepoStateRepository::count)
    }
}

fn insert_set(
    conn: &mut SqliteConnection,
    set: &SetInfo,
    last_updated: Option<&str>,
    member_ids: &[i32],
) -> QueryResult<i32> {
    let id = SetRepository::insert(
        conn,
        &NewSet {
            distribution: &set.distribution,
            name: &set.name,
            last_updated,
        },
    )?;
    SetRepository::add_members(conn, id, member_ids)?;
    Ok(id)
}

fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn parse_timestamp(value: &str) -> std::result::Result<DateTime<Utc>, DbError> {
    DateTime::parse_from_rfc3339(value)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| DbError::IntegrityError(format!("invalid timestamp `{value}`: {e}")))
}

fn repo_state_from_row(row: RepoStateRow) -> Result<StoredRepoState> {
    let metadata = match row.metadata {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            return Err(DbError::IntegrityError(format!(
                "metadata of {}@{} is not an object: {other}",
                row.name, row.version
            ))
            .into());
        }
    };
    let package_descriptors =
        serde_json::from_value(row.package_descriptors).map_err(DbError::from)?;

    Ok(StoredRepoState {
        id: row.id,
        state: Arc::new(RepoState {
            name: row.name,
            kind: row.kind,
            url: row.url,
            version: row.version,
            metadata,
            package_descriptors,
        }),
    })
}

fn set_from_row(row: SetRow) -> Result<StoredSet> {
    let last_updated = row.last_updated.as_deref().map(parse_timestamp).transpose()?;
    Ok(StoredSet {
        id: row.id,
        info: SetInfo {
            distribution: row.distribution,
            name: row.name,
            last_updated,
        },
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::model::PackageDescriptor;

    fn state(name: &str, version: &str) -> RepoState {
        RepoState {
            name: name.to_string(),
            kind: "git".to_string(),
            url: format!("https://x/{name}"),
            version: version.to_string(),
            metadata: json!({"file_count": 2}).as_object().cloned().unwrap(),
            package_descriptors: vec![PackageDescriptor {
                name: format!("{name}_pkg"),
                kind: "ros.ament_cmake".to_string(),
                path: ".".to_string(),
                version: Some("1.0.0".to_string()),
                depends: Default::default(),
                metadata: Map::new(),
                extra: Map::new(),
            }],
        }
    }

    fn set(name: &str, floating: bool) -> SetInfo {
        SetInfo {
            distribution: "humble".to_string(),
            name: name.to_string(),
            last_updated: floating.then(Utc::now),
        }
    }

    #[test]
    fn test_repo_state_round_trip_and_idempotent_put() {
        let store = Store::open_in_memory().unwrap();
        let original = state("pkgA", "abc123");

        let id = store.put_repo_state(&original).unwrap();
        let loaded = store.get_repo_state(&original.key()).unwrap().unwrap();
        assert_eq!(loaded.id, id);
        assert_eq!(*loaded.state, original);

        let mut altered = original.clone();
        altered.metadata.insert("file_count".into(), json!(99));
        assert_eq!(store.put_repo_state(&altered).unwrap(), id);

        let reloaded = store.get_repo_state(&original.key()).unwrap().unwrap();
        assert_eq!(reloaded.state.metadata["file_count"], json!(2));
        assert_eq!(store.repo_state_count().unwrap(), 1);
    }

    #[test]
    fn test_put_set_and_load_snapshot() {
        let store = Store::open_in_memory().unwrap();
        let b = store.put_repo_state(&state("pkgB", "bbb")).unwrap();
        let a = store.put_repo_state(&state("pkgA", "aaa")).unwrap();

        store.put_set(&set("humble", false), &[b, a]).unwrap();
        let snapshot = store.load_snapshot("humble", "humble").unwrap().unwrap();
        assert!(snapshot.set.is_frozen());
        let names: Vec<_> = snapshot.repo_states.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["pkgA", "pkgB"]);

        assert!(store.load_snapshot("humble", "missing").unwrap().is_none());
    }

    #[test]
    fn test_put_set_rejects_unknown_members() {
        let store = Store::open_in_memory().unwrap();
        let err = store.put_set(&set("humble", false), &[42]).unwrap_err();
        assert!(matches!(err, DistroError::Store(DbError::IntegrityError(_))));
        // The transaction rolled back, so no half-built set is visible.
        assert!(store.get_set("humble", "humble").unwrap().is_none());
    }

    #[test]
    fn test_save_set_policies() {
        let store = Store::open_in_memory().unwrap();
        let a1 = store.put_repo_state(&state("pkgA", "a1")).unwrap();
        let a2 = store.put_repo_state(&state("pkgA", "a2")).unwrap();

        let frozen = set("humble/2024-01-01", false);
        assert_eq!(store.save_set(&frozen, &[a1]).unwrap(), SetWrite::Created);
        assert_eq!(store.save_set(&frozen, &[a2]).unwrap(), SetWrite::Kept);
        let kept = store.load_snapshot("humble", "humble/2024-01-01").unwrap().unwrap();
        assert_eq!(kept.repo_states[0].version, "a1");

        let floating = set("heads/humble", true);
        assert_eq!(store.save_set(&floating, &[a1]).unwrap(), SetWrite::Created);
        assert_eq!(store.save_set(&floating, &[a1, a1]).unwrap(), SetWrite::Refreshed);
        assert_eq!(store.save_set(&floating, &[a2]).unwrap(), SetWrite::Updated);
        let moved = store.load_snapshot("humble", "heads/humble").unwrap().unwrap();
        assert_eq!(moved.repo_states[0].version, "a2");
        assert!(!moved.set.is_frozen());
    }

    #[test]
    fn test_delete_set_keeps_shared_states() {
        let store = Store::open_in_memory().unwrap();
        let shared = state("pkgA", "aaa");
        let id = store.put_repo_state(&shared).unwrap();
        store.put_set(&set("one", false), &[id]).unwrap();
        store.put_set(&set("two", false), &[id]).unwrap();

        assert!(store.delete_set("humble", "one").unwrap());
        assert!(!store.delete_set("humble", "one").unwrap());
        assert!(store.get_repo_state(&shared.key()).unwrap().is_some());
        assert_eq!(
            store.load_snapshot("humble", "two").unwrap().unwrap().repo_states.len(),
            1
        );
    }

    #[test]
    fn test_delete_referenced_repo_state_is_rejected() {
        let store = Store::open_in_memory().unwrap();
        let pinned = state("pkgA", "aaa");
        let loose = state("pkgB", "bbb");
        let id = store.put_repo_state(&pinned).unwrap();
        store.put_repo_state(&loose).unwrap();
        store.put_set(&set("humble", false), &[id]).unwrap();

        let err = store.delete_repo_state(&pinned.key()).unwrap_err();
        assert!(matches!(err, DistroError::Store(DbError::IntegrityError(_))));
        assert!(store.get_repo_state(&pinned.key()).unwrap().is_some());

        assert!(store.delete_repo_state(&loose.key()).unwrap());
        assert!(!store.delete_repo_state(&loose.key()).unwrap());

        store.delete_set("humble", "humble").unwrap();
        assert!(store.delete_repo_state(&pinned.key()).unwrap());
    }

    #[test]
    fn test_list_sets() {
        let store = Store::open_in_memory().unwrap();
        store.put_set(&set("b", true), &[]).unwrap();
        store.put_set(&set("a", false), &[]).unwrap();
        store
            .put_set(
                &SetInfo {
                    distribution: "jazzy".to_string(),
                    name: "jazzy".to_string(),
                    last_updated: None,
                },
                &[],
            )
            .unwrap();

        let humble: Vec<_> = store
            .list_sets(Some("humble"))
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(humble, ["a", "b"]);
        assert_eq!(store.list_sets(None).unwrap().len(), 3);
    }

    #[test]
    fn test_open_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("distro.db");
        let store = Store::open(&path).unwrap();
        store.put_repo_state(&state("pkgA", "aaa")).unwrap();
        drop(store);

        let reopened = Store::open(&path).unwrap();
        assert_eq!(reopened.repo_state_count().unwrap(), 1);
    }
}
