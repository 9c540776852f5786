//! Module run lifecycle.
//!
//! [`drive`] runs `setup`, then `run`, then always `cleanup`, and folds
//! whatever happened into a [`RunOutcome`].

use std::collections::BTreeMap;

use tracing::{debug, info, warn};
use veil_core::ConfigurationView;
use veil_encode::{DefaultHooks, EncodeHooks, Encoder};
use veil_registry::PayloadRegistry;

use crate::module::EvasionModule;
use crate::outcome::{fail_with, Failure, FailureReason, RunOutcome, RunResult};
use crate::store::ArtifactStore;

/// Datastore key naming the payload to deliver.
pub const PAYLOAD_KEY: &str = "PAYLOAD";

/// Collaborators available to a running module.
pub struct RunContext<'a> {
    pub registry: &'a dyn PayloadRegistry,
    pub encoder: &'a dyn Encoder,
    pub store: &'a mut dyn ArtifactStore,
}

/// An evasion module implementation.
pub trait Evasion {
    fn module(&self) -> &EvasionModule;

    fn module_mut(&mut self) -> &mut EvasionModule;

    /// Runs before `run`; checks the datastore against registered options.
    fn setup(&mut self, _ctx: &mut RunContext<'_>) -> Result<(), Failure> {
        self.module().validate_options()?;
        Ok(())
    }

    fn run(&mut self, ctx: &mut RunContext<'_>) -> RunResult;

    /// Runs after `run`, whatever its result.
    fn cleanup(&mut self) {}

    /// Extra commands the module offers, by name, with help text.
    fn evasion_commands(&self) -> BTreeMap<String, String> {
        BTreeMap::new()
    }
}

/// Run a module to completion.
pub fn drive(evasion: &mut dyn Evasion, ctx: &mut RunContext<'_>) -> RunOutcome {
    let module = evasion.module().module_ref().clone();
    info!(%module, "running module");

    let result = evasion.setup(ctx).and_then(|()| evasion.run(ctx));
    evasion.cleanup();

    let outcome = result.unwrap_or_else(RunOutcome::Failed);
    match &outcome {
        RunOutcome::Ok(artifact) => debug!(%module, bytes = artifact.len(), "module produced artifact"),
        RunOutcome::Completed => debug!(%module, "module completed early"),
        RunOutcome::Failed(failure) => warn!(%module, %failure, "module failed"),
    }
    outcome
}

/// Encodes the selected payload and writes it to `FILENAME`.
///
/// The payload comes from the `PAYLOAD` datastore key when set, otherwise
/// from the module's current payload instance.
pub struct FileFormatEvasion<H: EncodeHooks = DefaultHooks> {
    module: EvasionModule,
    hooks: H,
}

impl FileFormatEvasion<DefaultHooks> {
    pub fn new(module: EvasionModule) -> Self {
        Self {
            module,
            hooks: DefaultHooks,
        }
    }
}

impl<H: EncodeHooks> FileFormatEvasion<H> {
    pub fn with_hooks(module: EvasionModule, hooks: H) -> Self {
        Self { module, hooks }
    }

    pub fn into_module(self) -> EvasionModule {
        self.module
    }
}

impl<H: EncodeHooks> Evasion for FileFormatEvasion<H> {
    fn module(&self) -> &EvasionModule {
        &self.module
    }

    fn module_mut(&mut self) -> &mut EvasionModule {
        &mut self.module
    }

    fn run(&mut self, ctx: &mut RunContext<'_>) -> RunResult {
        let module = &mut self.module;

        if let Some(name) = module.datastore().get_string(PAYLOAD_KEY) {
            if !module.select_payload(ctx.registry, &name)? {
                return fail_with(
                    FailureReason::BadConfig,
                    format!("payload '{name}' is not compatible with {}", module.module_ref()),
                );
            }
        }
        if module.target().is_none() && !module.targets().is_empty() {
            return fail_with(FailureReason::NoTarget, "no target selected");
        }

        let artifact = module
            .generate_payload(ctx.encoder, &mut self.hooks, None)?
            .clone();
        module.file_create(&artifact.bytes, ctx.store)?;
        Ok(RunOutcome::Ok(artifact))
    }
}
