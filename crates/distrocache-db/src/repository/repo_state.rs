//! Repository states keyed by `(name, type, url, version)`.

use diesel::{dsl::exists, prelude::*};

use crate::{
    models::repo_state::{NewRepoState, RepoStateRow},
    schema::{repo_states, set_repo_states},
};

/// Repository for repo state operations.
pub struct RepoStateRepository;

impl RepoStateRepository {
    /// Finds a repo state by its identifying tuple.
    pub fn find(
        conn: &mut SqliteConnection,
        name: &str,
        kind: &str,
        url: &str,
        version: &str,
    ) -> QueryResult<Option<RepoStateRow>> {
        repo_states::table
            .filter(repo_states::name.eq(name))
            .filter(repo_states::kind.eq(kind))
            .filter(repo_states::url.eq(url))
            .filter(repo_states::version.eq(version))
            .select(RepoStateRow::as_select())
            .first(conn)
            .optional()
    }

    /// Inserts a repo state unless its tuple already exists, returning the ID
    /// of whichever row holds the tuple afterwards. An existing row is left
    /// untouched.
    pub fn insert_if_absent(
        conn: &mut SqliteConnection,
        repo_state: &NewRepoState,
    ) -> QueryResult<i32> {
        diesel::insert_into(repo_states::table)
            .values(repo_state)
            .on_conflict_do_nothing()
            .execute(conn)?;

        repo_states::table
            .filter(repo_states::name.eq(repo_state.name))
            .filter(repo_states::kind.eq(repo_state.kind))
            .filter(repo_states::url.eq(repo_state.url))
            .filter(repo_states::version.eq(repo_state.version))
            .select(repo_states::id)
            .first(conn)
    }

    /// Checks if any set references the repo state.
    pub fn is_referenced(conn: &mut SqliteConnection, id: i32) -> QueryResult<bool> {
        diesel::select(exists(
            set_repo_states::table.filter(set_repo_states::repo_state_id.eq(id)),
        ))
        .get_result(conn)
    }

    /// Deletes a repo state by ID. Fails with a foreign key violation while
    /// any set still references it.
    pub fn delete_by_id(conn: &mut SqliteConnection, id: i32) -> QueryResult<usize> {
        diesel::delete(repo_states::table.filter(repo_states::id.eq(id))).execute(conn)
    }

    /// Counts stored repo states.
    pub fn count(conn: &mut SqliteConnection) -> QueryResult<i64> {
        repo_states::table.count().get_result(conn)
    }
}
