mod compiler;
mod merger;
mod snapshot_loader;

pub use compiler::{CompileReport, PhaseTiming, PolicyCompiler};
pub use merger::{merge_frontends, MergeError};
pub use snapshot_loader::{ClusterSnapshotLoader, FileSnapshotLoader, SnapshotLoader};
