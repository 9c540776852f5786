//! Evasion module base for veil.
//!
//! An [`EvasionModule`] is built from a TOML [`ModuleInfo`] definition. It
//! resolves its active target, lists the payloads it can deliver, encodes
//! the selected payload through the `veil-encode` pipeline, and hands the
//! result to an [`ArtifactStore`]. Implementations plug into the
//! setup/run/cleanup lifecycle through the [`Evasion`] trait; [`drive`]
//! turns a run into a [`RunOutcome`].

pub mod definition;
pub mod error;
pub mod module;
pub mod outcome;
pub mod runner;
pub mod store;

pub use definition::{load_module_toml, parse_module_toml, ModuleCompat, ModuleInfo};
pub use error::{ModuleError, Result};
pub use module::{AutoTarget, EvasionModule, Stance, FILENAME_KEY};
pub use outcome::{fail_with, Failure, FailureReason, RunOutcome, RunResult};
pub use runner::{drive, Evasion, FileFormatEvasion, RunContext, PAYLOAD_KEY};
pub use store::{ArtifactStore, LocalStore};
