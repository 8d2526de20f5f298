use diesel::prelude::*;
use serde_json::Value;

use crate::schema::repo_states;

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = repo_states)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct RepoStateRow {
    pub id: i32,
    pub name: String,
    pub kind: String,
    pub url: String,
    pub version: String,
    pub metadata: Value,
    pub package_descriptors: Value,
    pub created_at: String,
}

#[derive(Insertable)]
#[diesel(table_name = repo_states)]
pub struct NewRepoState<'a> {
    pub name: &'a str,
    pub kind: &'a str,
    pub url: &'a str,
    pub version: &'a str,
    pub metadata: Value,
    pub package_descriptors: Value,
    pub created_at: &'a str,
}
