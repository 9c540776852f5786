//! Payload encoding for veil modules.
//!
//! Turns a selected payload instance into a final artifact through a staged
//! pipeline: select target and payload, reconfigure generic payloads,
//! assemble requirements, pre-encode hook, encode, post-encode hook.
//!
//! The encode operation itself is an external [`Encoder`]; [`NoneEncoder`]
//! is a pass-through reference implementation that only enforces the
//! byte-budget and forbidden-byte constraints.

pub mod encoder;
pub mod error;
pub mod hooks;
pub mod pipeline;
pub mod report;
pub mod requirements;

pub use encoder::{EncodedArtifact, Encoder, NoneEncoder};
pub use error::{EncodeError, PipelineError};
pub use hooks::{DefaultHooks, EncodeHooks};
pub use pipeline::{EncodingPipeline, GenerateRequest, PipelineStage};
pub use report::EncodeReport;
pub use requirements::{assemble, PayloadInfo, RequirementsAssembler, RequirementsDescriptor};
