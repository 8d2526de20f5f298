//! Named sets and their repo state membership.

use diesel::prelude::*;

use crate::{
    models::{
        repo_state::RepoStateRow,
        set::{NewSet, NewSetRepoState, SetRow},
    },
    schema::{repo_states, set_repo_states, sets},
};

/// Repository for set operations.
pub struct SetRepository;

impl SetRepository {
    /// Finds a set by distribution and name.
    pub fn find(
        conn: &mut SqliteConnection,
        distribution: &str,
        name: &str,
    ) -> QueryResult<Option<SetRow>> {
        sets::table
            .filter(sets::distribution.eq(distribution))
            .filter(sets::name.eq(name))
            .select(SetRow::as_select())
            .first(conn)
            .optional()
    }

    /// Lists sets, optionally restricted to one distribution.
    pub fn list(
        conn: &mut SqliteConnection,
        distribution: Option<&str>,
    ) -> QueryResult<Vec<SetRow>> {
        let mut query = sets::table.select(SetRow::as_select()).into_boxed();
        if let Some(distribution) = distribution {
            query = query.filter(sets::distribution.eq(distribution));
        }
        query
            .order_by((sets::distribution.asc(), sets::name.asc()))
            .load(conn)
    }

    /// Inserts a new set row and returns its ID.
    pub fn insert(conn: &mut SqliteConnection, set: &NewSet) -> QueryResult<i32> {
        diesel::insert_into(sets::table)
            .values(set)
            .returning(sets::id)
            .get_result(conn)
    }

    /// Adds repo states to a set. Every ID must already exist.
    pub fn add_members(
        conn: &mut SqliteConnection,
        set_id: i32,
        repo_state_ids: &[i32],
    ) -> QueryResult<usize> {
        if repo_state_ids.is_empty() {
            return Ok(0);
        }
        let rows: Vec<NewSetRepoState> = repo_state_ids
            .iter()
            .map(|&repo_state_id| {
                NewSetRepoState {
                    set_id,
                    repo_state_id,
                }
            })
            .collect();
        diesel::insert_into(set_repo_states::table)
            .values(&rows)
            .execute(conn)
    }

    /// Removes every membership row of a set.
    pub fn clear_members(conn: &mut SqliteConnection, set_id: i32) -> QueryResult<usize> {
        diesel::delete(set_repo_states::table.filter(set_repo_states::set_id.eq(set_id)))
            .execute(conn)
    }

    /// Lists the IDs of a set's repo states in ascending order.
    pub fn member_ids(conn: &mut SqliteConnection, set_id: i32) -> QueryResult<Vec<i32>> {
        set_repo_states::table
            .filter(set_repo_states::set_id.eq(set_id))
            .select(set_repo_states::repo_state_id)
            .order_by(set_repo_states::repo_state_id.asc())
            .load(conn)
    }

    /// Loads a set's repo states ordered by repository name.
    pub fn member_states(
        conn: &mut SqliteConnection,
        set_id: i32,
    ) -> QueryResult<Vec<RepoStateRow>> {
        repo_states::table
            .inner_join(set_repo_states::table)
            .filter(set_repo_states::set_id.eq(set_id))
            .select(RepoStateRow::as_select())
            .order_by(repo_states::name.asc())
            .load(conn)
    }

    /// Sets the `last_updated` timestamp of a set.
    pub fn touch(
        conn: &mut SqliteConnection,
        set_id: i32,
        last_updated: Option<&str>,
    ) -> QueryResult<usize> {
        diesel::update(sets::table.filter(sets::id.eq(set_id)))
            .set(sets::last_updated.eq(last_updated))
            .execute(conn)
    }

    /// Deletes a set by distribution and name. Membership rows go with it.
    pub fn delete(conn: &mut SqliteConnection, distribution: &str, name: &str) -> QueryResult<usize> {
        diesel::delete(
            sets::table
                .filter(sets::distribution.eq(distribution))
                .filter(sets::name.eq(name)),
        )
        .execute(conn)
    }
}
