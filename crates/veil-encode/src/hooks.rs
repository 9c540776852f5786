//! Extension points around the encode operation.

use veil_registry::PayloadRef;

use crate::encoder::EncodedArtifact;
use crate::error::PipelineError;
use crate::requirements::RequirementsDescriptor;

/// Module-specific customization of the encoding pipeline.
///
/// `encode_begin` may swap the payload instance or rewrite requirements
/// before encoding; `encode_end` may replace the finished artifact.
pub trait EncodeHooks {
    fn encode_begin(
        &mut self,
        _payload: &mut PayloadRef,
        _reqs: &mut RequirementsDescriptor,
    ) -> Result<(), PipelineError> {
        Ok(())
    }

    fn encode_end(
        &mut self,
        _payload: &PayloadRef,
        _reqs: &RequirementsDescriptor,
        encoded: EncodedArtifact,
    ) -> Result<EncodedArtifact, PipelineError> {
        Ok(encoded)
    }
}

/// No-op pre-hook, identity post-hook.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultHooks;

impl EncodeHooks for DefaultHooks {}
