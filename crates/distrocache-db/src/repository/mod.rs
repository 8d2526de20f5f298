//! Repository pattern implementations for database operations.
//!
//! - [`repo_state::RepoStateRepository`] - immutable repository states
//! - [`set::SetRepository`] - named sets and their membership

pub mod repo_state;
pub mod set;

pub use repo_state::RepoStateRepository;
pub use set::SetRepository;
