pub mod repo_state;
pub mod set;
