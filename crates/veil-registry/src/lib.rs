//! Payload catalog, metadata index, and compatibility matching.
//!
//! The [`MetadataIndex`] answers platform/architecture/type queries over
//! [`PayloadDescriptor`]s; the [`PayloadRegistry`] turns a reference name into
//! a factory that builds live [`Payload`] instances. [`CompatibilityMatcher`]
//! combines both to decide which payloads a module can deliver.
//!
//! [`Catalog`] is a TOML-backed implementation of both collaborator traits.

pub mod catalog;
pub mod compat;
pub mod descriptor;
pub mod error;
pub mod index;
pub mod matcher;
pub mod payload;

pub use catalog::{load_catalog_toml, parse_catalog_toml, Catalog, CatalogEntry};
pub use compat::{AlwaysCompatible, CompatibilityPredicate, KeywordCompat};
pub use descriptor::PayloadDescriptor;
pub use error::{RegistryError, Result};
pub use index::{Filter, IndexQuery, MetadataIndex};
pub use matcher::{
    filter, normalize_arch, probe_payload, CompatibilityMatcher, CompatiblePayload,
};
pub use payload::{
    FactoryRef, GenericPayload, Payload, PayloadFactory, PayloadRef, PayloadRegistry,
    StaticPayload, StaticPayloadFactory,
};
