//! Shared foundations for veil modules.
//!
//! Provides the loosely-typed configuration store every other crate reads
//! through [`ConfigurationView`], the option registration used to seed
//! datastore defaults, and the identity a module hands to collaborators.

pub mod bytes;
pub mod datastore;
pub mod error;
pub mod module_ref;
pub mod options;

pub use datastore::{
    load_datastore_toml, parse_datastore_toml, ConfigurationView, DataStore, OptValue,
};
pub use error::{CoreError, Result};
pub use module_ref::{ModuleRef, ModuleType};
pub use options::{rand_text_alpha, OptKind, OptionSet, OptionSpec};
