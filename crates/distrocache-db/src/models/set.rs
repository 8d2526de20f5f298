use diesel::prelude::*;

use crate::schema::{set_repo_states, sets};

#[derive(Debug, Clone, PartialEq, Eq, Queryable, Selectable)]
#[diesel(table_name = sets)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct SetRow {
    pub id: i32,
    pub distribution: String,
    pub name: String,
    pub last_updated: Option<String>,
}

#[derive(Insertable)]
#[diesel(table_name = sets)]
pub struct NewSet<'a> {
    pub distribution: &'a str,
    pub name: &'a str,
    pub last_updated: Option<&'a str>,
}

#[derive(Insertable)]
#[diesel(table_name = set_repo_states)]
pub struct NewSetRepoState {
    pub set_id: i32,
    pub repo_state_id: i32,
}
