mod backend_groups;
mod persist;
mod policy_generator;

pub use backend_groups::{backend_groups, BackendGroupCatalogue};
pub use persist::{persist, render, PersistError};
pub use policy_generator::PolicyGenerator;
