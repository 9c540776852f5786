//! The encode operation contract and a pass-through encoder.

use std::fmt;

use sha2::{Digest, Sha256};
use veil_registry::Payload;

use crate::error::EncodeError;
use crate::requirements::RequirementsDescriptor;

/// Output of the encode operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedArtifact {
    /// Final bytes, ready for delivery.
    pub bytes: Vec<u8>,
    /// Size of the unencoded payload.
    pub raw_size: usize,
    /// Reference name of the payload that was encoded.
    pub payload: String,
    /// Encoder that produced the bytes.
    pub encoder: Option<String>,
    /// NOP generator used for the sled, if any.
    pub nop: Option<String>,
    pub nop_sled_len: usize,
}

impl EncodedArtifact {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// SHA-256 of the final bytes, hex-encoded.
    pub fn digest(&self) -> String {
        hex::encode(Sha256::digest(&self.bytes))
    }
}

/// Converts a payload instance into a constrained artifact.
///
/// Object-safe so encoders can be injected as `&dyn Encoder`.
pub trait Encoder: fmt::Debug + Send + Sync {
    /// Reference name of this encoder.
    fn name(&self) -> &str;

    fn encode(
        &self,
        payload: &dyn Payload,
        reqs: &RequirementsDescriptor,
    ) -> Result<EncodedArtifact, EncodeError>;
}

/// Leaves the payload bytes unchanged apart from the declared prefixes,
/// suffixes, and an optional x86 NOP sled, then checks the byte budget and
/// forbidden-byte set.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoneEncoder;

impl NoneEncoder {
    pub const NAME: &'static str = "generic/none";
    pub const NOP_NAME: &'static str = "x86/single_byte";
    const NOP: u8 = 0x90;
}

impl Encoder for NoneEncoder {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn encode(
        &self,
        payload: &dyn Payload,
        reqs: &RequirementsDescriptor,
    ) -> Result<EncodedArtifact, EncodeError> {
        if let Some(requested) = reqs.encoder.as_deref() {
            if requested != Self::NAME && reqs.encoder_dont_fall_through {
                return Err(EncodeError::EncoderUnavailable {
                    name: requested.to_string(),
                });
            }
        }

        let raw = payload
            .generate()
            .map_err(|message| EncodeError::PayloadGeneration { message })?;
        let raw_size = raw.len();

        let sled_len = if reqs.disable_nops {
            0
        } else {
            usize::try_from(reqs.min_nops.unwrap_or(0)).unwrap_or(usize::MAX)
        };
        if sled_len > 0 && reqs.is_bad_char(Self::NOP) {
            return Err(EncodeError::FillerUnavailable {
                detail: format!("0x{:02x} is a bad character", Self::NOP),
            });
        }

        let section = |b: &Option<Vec<u8>>| b.as_ref().map_or(0, Vec::len);
        let total = [
            section(&reqs.prepend_encoder),
            sled_len,
            section(&reqs.prepend),
            raw_size,
            section(&reqs.append),
            section(&reqs.append_encoder),
        ]
        .into_iter()
        .try_fold(0usize, usize::checked_add);

        // Sized before anything is allocated.
        let exhausted = |size: usize| match reqs.space {
            Some(space) => u64::try_from(size).map_or(true, |s| s > space),
            None => false,
        };
        let total = match total {
            Some(total) if !exhausted(total) => total,
            other => {
                return Err(EncodeError::SpaceExhausted {
                    size: other.unwrap_or(usize::MAX),
                    space: reqs.space.unwrap_or(u64::MAX),
                })
            }
        };

        let mut bytes = Vec::new();
        bytes
            .try_reserve_exact(total)
            .map_err(|e| EncodeError::FillerUnavailable {
                detail: format!("cannot allocate {total} bytes: {e}"),
            })?;
        bytes.extend(reqs.prepend_encoder.iter().flatten());
        bytes.extend(std::iter::repeat(Self::NOP).take(sled_len));
        bytes.extend(reqs.prepend.iter().flatten());
        bytes.extend(raw);
        bytes.extend(reqs.append.iter().flatten());
        bytes.extend(reqs.append_encoder.iter().flatten());

        if let Some((offset, &byte)) = bytes.iter().enumerate().find(|(_, b)| reqs.is_bad_char(**b)) {
            return Err(EncodeError::BadCharacter { offset, byte });
        }

        Ok(EncodedArtifact {
            bytes,
            raw_size,
            payload: payload.name().to_string(),
            encoder: Some(Self::NAME.to_string()),
            nop: (sled_len > 0).then(|| Self::NOP_NAME.to_string()),
            nop_sled_len: sled_len,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::requirements::{assemble, PayloadInfo};
    use veil_core::{DataStore, ModuleRef, ModuleType};
    use veil_registry::StaticPayload;
    use veil_targets::{Arch, PlatformSet};

    fn payload(bytes: &[u8]) -> StaticPayload {
        StaticPayload::new("windows/exec", PlatformSet::all(), vec![Arch::X86], bytes.to_vec())
    }

    fn reqs(info: PayloadInfo) -> RequirementsDescriptor {
        assemble(
            &info,
            &[],
            &DataStore::new(),
            &ModuleRef::new(ModuleType::Evasion, "windows/test"),
        )
    }

    #[test]
    fn passes_bytes_through() {
        let art = NoneEncoder
            .encode(&payload(&[0x41, 0x42]), &reqs(PayloadInfo::default()))
            .unwrap();
        assert_eq!(art.bytes, vec![0x41, 0x42]);
        assert_eq!(art.raw_size, 2);
        assert_eq!(art.payload, "windows/exec");
        assert_eq!(art.encoder.as_deref(), Some(NoneEncoder::NAME));
        assert!(art.nop.is_none());
    }

    #[test]
    fn wraps_prefixes_and_sled() {
        let info = PayloadInfo {
            prepend: Some(vec![0x01]),
            append: Some(vec![0x02]),
            prepend_encoder: Some(vec![0xaa]),
            append_encoder: Some(vec![0xbb]),
            min_nops: Some(2),
            ..PayloadInfo::default()
        };
        let art = NoneEncoder.encode(&payload(&[0x41]), &reqs(info)).unwrap();
        assert_eq!(art.bytes, vec![0xaa, 0x90, 0x90, 0x01, 0x41, 0x02, 0xbb]);
        assert_eq!(art.nop_sled_len, 2);
        assert_eq!(art.nop.as_deref(), Some(NoneEncoder::NOP_NAME));
    }

    #[test]
    fn disable_nops_skips_sled() {
        let info = PayloadInfo {
            min_nops: Some(8),
            disable_nops: true,
            ..PayloadInfo::default()
        };
        let art = NoneEncoder.encode(&payload(&[0x41]), &reqs(info)).unwrap();
        assert_eq!(art.bytes, vec![0x41]);
    }

    #[test]
    fn space_exhausted() {
        let info = PayloadInfo {
            space: Some(2),
            ..PayloadInfo::default()
        };
        let err = NoneEncoder
            .encode(&payload(&[1, 2, 3]), &reqs(info))
            .unwrap_err();
        assert_eq!(err, EncodeError::SpaceExhausted { size: 3, space: 2 });
    }

    #[test]
    fn oversized_sled_is_rejected_before_allocation() {
        let info = PayloadInfo {
            space: Some(64),
            min_nops: Some(i64::MAX as u64),
            ..PayloadInfo::default()
        };
        let err = NoneEncoder.encode(&payload(&[0x41]), &reqs(info)).unwrap_err();
        assert!(matches!(err, EncodeError::SpaceExhausted { space: 64, .. }), "{err:?}");

        let info = PayloadInfo {
            space: Some(64),
            min_nops: Some(u64::MAX),
            prepend_encoder: Some(vec![0xaa]),
            ..PayloadInfo::default()
        };
        let err = NoneEncoder.encode(&payload(&[0x41]), &reqs(info)).unwrap_err();
        assert_eq!(err, EncodeError::SpaceExhausted { size: usize::MAX, space: 64 });
    }

    #[test]
    fn sled_fills_space_exactly() {
        let info = PayloadInfo {
            space: Some(4),
            min_nops: Some(3),
            ..PayloadInfo::default()
        };
        let art = NoneEncoder.encode(&payload(&[0x41]), &reqs(info)).unwrap();
        assert_eq!(art.bytes, vec![0x90, 0x90, 0x90, 0x41]);
    }

    #[test]
    fn bad_character_reported_with_offset() {
        let info = PayloadInfo {
            bad_chars: Some(vec![0x00]),
            ..PayloadInfo::default()
        };
        let err = NoneEncoder
            .encode(&payload(&[0x41, 0x00]), &reqs(info))
            .unwrap_err();
        assert_eq!(err, EncodeError::BadCharacter { offset: 1, byte: 0x00 });
    }

    #[test]
    fn nop_forbidden_by_bad_chars() {
        let info = PayloadInfo {
            bad_chars: Some(vec![0x90]),
            min_nops: Some(1),
            ..PayloadInfo::default()
        };
        let err = NoneEncoder.encode(&payload(&[0x41]), &reqs(info)).unwrap_err();
        assert!(matches!(err, EncodeError::FillerUnavailable { .. }));
    }

    #[test]
    fn requested_encoder_without_fall_through() {
        let mut r = reqs(PayloadInfo {
            encoder: Some("x86/shikata_ga_nai".into()),
            ..PayloadInfo::default()
        });
        // Falls through to pass-through by default.
        assert!(NoneEncoder.encode(&payload(&[0x41]), &r).is_ok());
        r.encoder_dont_fall_through = true;
        let err = NoneEncoder.encode(&payload(&[0x41]), &r).unwrap_err();
        assert!(matches!(err, EncodeError::EncoderUnavailable { name } if name == "x86/shikata_ga_nai"));
    }

    #[test]
    fn payload_generation_failure() {
        let err = NoneEncoder
            .encode(&payload(&[]), &reqs(PayloadInfo::default()))
            .unwrap_err();
        assert!(matches!(err, EncodeError::PayloadGeneration { .. }));
    }

    #[test]
    fn digest_is_sha256_hex() {
        let art = EncodedArtifact {
            bytes: b"abc".to_vec(),
            raw_size: 3,
            payload: "p".into(),
            encoder: None,
            nop: None,
            nop_sled_len: 0,
        };
        assert_eq!(
            art.digest(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
