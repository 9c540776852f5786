//! Payload requirements: the module's declared constraints merged with the
//! per-run datastore into the descriptor handed to the encoder.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use veil_core::bytes::opt_hex_bytes;
use veil_core::{ConfigurationView, ModuleRef, OptValue};

/// Datastore key overriding the encoder selection.
pub const ENCODER_KEY: &str = "ENCODER";
/// Datastore key overriding the NOP generator selection.
pub const NOP_KEY: &str = "NOP";
/// Datastore flag: do not try other encoders when the requested one fails.
pub const ENCODER_DONT_FALL_THROUGH_KEY: &str = "EncoderDontFallThrough";
/// Datastore flag enabling contextual encoding.
pub const ENABLE_CONTEXT_ENCODING_KEY: &str = "EnableContextEncoding";
/// Datastore key naming the context information file.
pub const CONTEXT_INFORMATION_FILE_KEY: &str = "ContextInformationFile";

/// Payload constraints declared by a module (the `[payload]` table of its
/// definition).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PayloadInfo {
    /// Byte budget for the final artifact.
    #[serde(default)]
    pub space: Option<u64>,
    #[serde(default, with = "opt_hex_bytes")]
    pub bad_chars: Option<Vec<u8>>,
    /// Bytes placed before the raw payload, ahead of encoding.
    #[serde(default, with = "opt_hex_bytes")]
    pub prepend: Option<Vec<u8>>,
    /// Bytes placed before the encoded payload.
    #[serde(default, with = "opt_hex_bytes")]
    pub prepend_encoder: Option<Vec<u8>>,
    #[serde(default, with = "opt_hex_bytes")]
    pub append: Option<Vec<u8>>,
    #[serde(default, with = "opt_hex_bytes")]
    pub append_encoder: Option<Vec<u8>>,
    #[serde(default)]
    pub disable_nops: bool,
    #[serde(default)]
    pub max_nops: Option<u64>,
    #[serde(default)]
    pub min_nops: Option<u64>,
    #[serde(default)]
    pub encoder: Option<String>,
    #[serde(default)]
    pub nop: Option<String>,
    #[serde(default)]
    pub encoder_type: Option<String>,
    #[serde(default)]
    pub encoder_options: BTreeMap<String, OptValue>,
    #[serde(default)]
    pub extended_options: BTreeMap<String, OptValue>,
    #[serde(default)]
    pub force_encode: bool,
    /// Payload-level compatibility keywords, merged into the module's.
    #[serde(default)]
    pub compat: BTreeMap<String, String>,
    /// Seconds a payload may stay active.
    #[serde(default)]
    pub active_timeout: Option<u64>,
}

/// Everything the encode operation needs for one invocation.
///
/// Built fresh per call; never validated here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequirementsDescriptor {
    pub space: Option<u64>,
    /// Registers the NOP generator must preserve.
    pub save_registers: Vec<String>,
    pub prepend: Option<Vec<u8>>,
    pub prepend_encoder: Option<Vec<u8>>,
    pub bad_chars: Option<Vec<u8>>,
    pub append: Option<Vec<u8>>,
    pub append_encoder: Option<Vec<u8>>,
    pub disable_nops: bool,
    pub max_nops: Option<u64>,
    pub min_nops: Option<u64>,
    pub encoder: Option<String>,
    pub nop: Option<String>,
    pub encoder_type: Option<String>,
    pub encoder_options: BTreeMap<String, OptValue>,
    pub extended_options: BTreeMap<String, OptValue>,
    pub force_encode: bool,
    pub encoder_dont_fall_through: bool,
    /// The module requesting the encode.
    pub module: ModuleRef,
}

impl RequirementsDescriptor {
    /// Whether contextual-encoding options were injected.
    pub fn context_encoding(&self) -> bool {
        self.encoder_options
            .get(ENABLE_CONTEXT_ENCODING_KEY)
            .and_then(OptValue::as_bool)
            .unwrap_or(false)
    }

    /// Whether `byte` is forbidden.
    pub fn is_bad_char(&self, byte: u8) -> bool {
        self.bad_chars.as_ref().is_some_and(|b| b.contains(&byte))
    }
}

/// A non-empty string setting from the datastore.
fn selection(config: &dyn ConfigurationView, key: &str) -> Option<String> {
    config
        .get_string(key)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Merges module-level payload info with the datastore.
#[derive(Debug, Clone, Copy)]
pub struct RequirementsAssembler<'a> {
    payload_info: &'a PayloadInfo,
    save_registers: &'a [String],
    module: &'a ModuleRef,
}

impl<'a> RequirementsAssembler<'a> {
    pub fn new(payload_info: &'a PayloadInfo, save_registers: &'a [String], module: &'a ModuleRef) -> Self {
        Self {
            payload_info,
            save_registers,
            module,
        }
    }

    pub fn assemble(&self, datastore: &dyn ConfigurationView) -> RequirementsDescriptor {
        let info = self.payload_info;
        let mut encoder_options = info.encoder_options.clone();

        if datastore.flag(ENABLE_CONTEXT_ENCODING_KEY) {
            encoder_options.insert(ENABLE_CONTEXT_ENCODING_KEY.to_string(), OptValue::Bool(true));
            if let Some(file) = selection(datastore, CONTEXT_INFORMATION_FILE_KEY) {
                encoder_options.insert(CONTEXT_INFORMATION_FILE_KEY.to_string(), OptValue::Str(file));
            }
        }

        RequirementsDescriptor {
            space: info.space,
            save_registers: self.save_registers.to_vec(),
            prepend: info.prepend.clone(),
            prepend_encoder: info.prepend_encoder.clone(),
            bad_chars: info.bad_chars.clone(),
            append: info.append.clone(),
            append_encoder: info.append_encoder.clone(),
            disable_nops: info.disable_nops,
            max_nops: info.max_nops,
            min_nops: info.min_nops,
            encoder: selection(datastore, ENCODER_KEY).or_else(|| info.encoder.clone()),
            nop: selection(datastore, NOP_KEY).or_else(|| info.nop.clone()),
            encoder_type: info.encoder_type.clone(),
            encoder_options,
            extended_options: info.extended_options.clone(),
            force_encode: info.force_encode,
            encoder_dont_fall_through: datastore.flag(ENCODER_DONT_FALL_THROUGH_KEY),
            module: self.module.clone(),
        }
    }
}

/// Assemble requirements in one call.
pub fn assemble(
    payload_info: &PayloadInfo,
    save_registers: &[String],
    datastore: &dyn ConfigurationView,
    module: &ModuleRef,
) -> RequirementsDescriptor {
    RequirementsAssembler::new(payload_info, save_registers, module).assemble(datastore)
}

#[cfg(test)]
mod tests {
    use super::*;
    use veil_core::{DataStore, ModuleType};

    fn info() -> PayloadInfo {
        toml::from_str(
            r#"
space = 512
bad-chars = "000a0d"
prepend = "90"
append-encoder = "cc"
min-nops = 4
encoder = "x86/shikata_ga_nai"
nop = "x86/single_byte"
force-encode = true

[encoder-options]
BufferRegister = "EAX"

[extended-options]
Iterations = 3
"#,
        )
        .unwrap()
    }

    fn module() -> ModuleRef {
        ModuleRef::new(ModuleType::Evasion, "windows/applocker_bypass")
    }

    #[test]
    fn copies_payload_info() {
        let info = info();
        let saves = vec!["ESP".to_string()];
        let reqs = assemble(&info, &saves, &DataStore::new(), &module());
        assert_eq!(reqs.space, Some(512));
        assert_eq!(reqs.bad_chars.as_deref(), Some(&[0x00, 0x0a, 0x0d][..]));
        assert_eq!(reqs.prepend.as_deref(), Some(&[0x90][..]));
        assert_eq!(reqs.append_encoder.as_deref(), Some(&[0xcc][..]));
        assert_eq!(reqs.min_nops, Some(4));
        assert_eq!(reqs.encoder.as_deref(), Some("x86/shikata_ga_nai"));
        assert_eq!(reqs.save_registers, saves);
        assert!(reqs.force_encode);
        assert!(!reqs.encoder_dont_fall_through);
        assert_eq!(reqs.extended_options.get("Iterations"), Some(&OptValue::Int(3)));
        assert_eq!(reqs.module, module());
        assert!(reqs.is_bad_char(0x0a));
        assert!(!reqs.is_bad_char(0x41));
    }

    #[test]
    fn datastore_overrides_encoder_and_nop() {
        let mut ds = DataStore::new();
        ds.set("encoder", "generic/none");
        ds.set("NOP", "x86/opty2");
        ds.set("EncoderDontFallThrough", true);
        let reqs = assemble(&info(), &[], &ds, &module());
        assert_eq!(reqs.encoder.as_deref(), Some("generic/none"));
        assert_eq!(reqs.nop.as_deref(), Some("x86/opty2"));
        assert!(reqs.encoder_dont_fall_through);
    }

    #[test]
    fn blank_override_is_ignored() {
        let mut ds = DataStore::new();
        ds.set("ENCODER", "  ");
        let reqs = assemble(&info(), &[], &ds, &module());
        assert_eq!(reqs.encoder.as_deref(), Some("x86/shikata_ga_nai"));
    }

    #[test]
    fn context_encoding_absent_unless_enabled() {
        let reqs = assemble(&info(), &[], &DataStore::new(), &module());
        assert!(!reqs.context_encoding());
        assert!(!reqs.encoder_options.contains_key(ENABLE_CONTEXT_ENCODING_KEY));
        assert!(!reqs.encoder_options.contains_key(CONTEXT_INFORMATION_FILE_KEY));
    }

    #[test]
    fn context_encoding_injected_into_encoder_options() {
        let mut ds = DataStore::new();
        ds.set("EnableContextEncoding", "true");
        ds.set("ContextInformationFile", "/tmp/ctx.bin");
        let reqs = assemble(&info(), &[], &ds, &module());
        assert!(reqs.context_encoding());
        assert_eq!(
            reqs.encoder_options.get(CONTEXT_INFORMATION_FILE_KEY),
            Some(&OptValue::Str("/tmp/ctx.bin".into()))
        );
        // Declared options are kept alongside.
        assert!(reqs.encoder_options.contains_key("BufferRegister"));
    }

    #[test]
    fn context_encoding_without_file() {
        let mut ds = DataStore::new();
        ds.set("EnableContextEncoding", true);
        let reqs = assemble(&PayloadInfo::default(), &[], &ds, &module());
        assert!(reqs.context_encoding());
        assert_eq!(reqs.encoder_options.len(), 1);
    }

    #[test]
    fn assembling_twice_is_identical() {
        let info = info();
        let saves = vec!["ESP".to_string(), "EBP".to_string()];
        let mut ds = DataStore::new();
        ds.set("ENCODER", "generic/none");
        ds.set("EnableContextEncoding", true);
        let m = module();
        let assembler = RequirementsAssembler::new(&info, &saves, &m);
        assert_eq!(assembler.assemble(&ds), assembler.assemble(&ds));
        assert_eq!(
            assemble(&info, &saves, &ds, &module()),
            assemble(&info, &saves, &ds, &module())
        );
    }

    #[test]
    fn payload_info_defaults() {
        let info: PayloadInfo = toml::from_str("").unwrap();
        assert_eq!(info, PayloadInfo::default());
        assert!(info.compat.is_empty());
        assert!(info.active_timeout.is_none());
    }
}
