pub mod augment;
pub mod coordinator;
pub mod discovery;
pub mod error;
pub mod inflight;
pub mod manifest;
pub mod model;
pub mod store;

pub use coordinator::{CoordinationContext, Coordinator};
pub use error::{DistroError, EntryFailure, ResolveError};
pub use model::{ManifestEntry, PackageDescriptor, RepoKey, RepoState, SetInfo, SetRequest, Snapshot};
pub use store::Store;
