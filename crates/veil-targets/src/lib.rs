//! Target, platform, and architecture model for veil modules.
//!
//! A module declares a static list of [`Target`]s. At construction the list
//! may gain a synthesized "Automatic" entry ([`TargetList::synthesize_automatic`]);
//! at run time [`TargetResolver`] picks the active entry from the datastore.

pub mod arch;
pub mod error;
pub mod parse;
pub mod platform;
pub mod resolve;
pub mod target;

pub use arch::Arch;
pub use error::{Result, TargetError};
pub use parse::{
    load_targets_toml, parse_targets_toml, require_valid, validate_targets, TargetsDocument,
    ValidationIssue,
};
pub use platform::{Platform, PlatformSet};
pub use resolve::{resolve, AutoTargetable, TargetResolver, TargetSelector, TARGET_KEY};
pub use target::{Target, TargetList, AUTOMATIC};
