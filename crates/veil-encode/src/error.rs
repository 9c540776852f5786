//! Encoding errors.

use thiserror::Error;

/// Failures owned by the encode operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    #[error("payload generation failed: {message}")]
    PayloadGeneration { message: String },

    #[error("encoded payload is {size} bytes but only {space} are available")]
    SpaceExhausted { size: usize, space: u64 },

    #[error("bad character 0x{byte:02x} at offset {offset}")]
    BadCharacter { offset: usize, byte: u8 },

    #[error("encoder '{name}' is not available")]
    EncoderUnavailable { name: String },

    #[error("no filler satisfies the constraints: {detail}")]
    FillerUnavailable { detail: String },
}

/// Errors that abort an encoding pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no payload has been selected")]
    MissingPayload,

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error("{stage} hook failed: {message}")]
    Hook { stage: String, message: String },
}
