//! Registration and one-shot application of patch descriptors.

use std::panic::{self, AssertUnwindSafe};

use tracing::{error, info};

use crate::{
    assembly::{body::MethodBody, stack},
    config::PatchConfig,
    events::invoker::panic_message,
    patch::{
        descriptor::PatchDescriptor,
        report::{PatchEvent, PatchReport},
    },
    runtime::MethodTable,
    Error, Result,
};

/// Ordered collection of patch descriptors, applied together before the host serves.
///
/// Each descriptor is applied in isolation: its transpiler rewrites a copy of the
/// target body, and the copy replaces the original only if it transpiles, validates and
/// (when enabled) passes stack verification. A failing descriptor is logged and
/// recorded; the ones after it still run.
///
/// # Example
///
/// ```rust
/// use ilweave::{
///     assembly::{splicer, Instruction, MethodBody, MethodId, MethodRef, TypeSig},
///     patch::{PatchCatalog, PatchDescriptor},
///     runtime::MethodTable,
/// };
///
/// let mut body = MethodBody::new(MethodRef::static_method("Round", "Start", vec![], TypeSig::Void));
/// body.push(Instruction::ret());
/// let mut methods = MethodTable::new();
/// methods.insert_body(body);
///
/// let mut catalog = PatchCatalog::new();
/// catalog.register(PatchDescriptor::new(
///     "pad",
///     MethodId::new("Round", "Start", vec![]),
///     |body: &mut MethodBody| splicer::insert(body, 0, vec![Instruction::nop()]),
/// ));
/// catalog.register(PatchDescriptor::new(
///     "missing",
///     MethodId::new("Round", "Stop", vec![]),
///     |_: &mut MethodBody| -> ilweave::Result<()> { Ok(()) },
/// ));
///
/// let report = catalog.apply_all(&mut methods)?;
/// assert_eq!(report.summary(), "1 applied, 1 failed");
/// assert!(catalog.apply_all(&mut methods).is_err());
/// # Ok::<(), ilweave::Error>(())
/// ```
#[derive(Debug, Default)]
pub struct PatchCatalog {
    descriptors: Vec<PatchDescriptor>,
    config: PatchConfig,
    applied: bool,
}

impl PatchCatalog {
    /// Creates an empty catalog with the default [`PatchConfig`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty catalog with `config`.
    #[must_use]
    pub fn with_config(config: PatchConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Adds a descriptor. Descriptors are applied in registration order.
    pub fn register(&mut self, descriptor: PatchDescriptor) -> &mut Self {
        self.descriptors.push(descriptor);
        self
    }

    /// Registered descriptors.
    #[must_use]
    pub fn descriptors(&self) -> &[PatchDescriptor] {
        &self.descriptors
    }

    /// Returns true once [`PatchCatalog::apply_all`] has run.
    #[must_use]
    pub fn is_applied(&self) -> bool {
        self.applied
    }

    /// Applies every descriptor to `methods`.
    ///
    /// # Errors
    ///
    /// [`Error::AlreadyApplied`] on a second call. Failures of individual descriptors
    /// are not errors; they are in the returned report.
    pub fn apply_all(&mut self, methods: &mut MethodTable) -> Result<PatchReport> {
        if self.applied {
            return Err(Error::AlreadyApplied);
        }
        self.applied = true;

        let report = PatchReport::new();
        for descriptor in &self.descriptors {
            let target = descriptor.target().to_string();
            match self.apply_one(descriptor, methods) {
                Ok((before, after)) => {
                    info!(
                        patch = descriptor.name(),
                        target = %target,
                        transpiler = %descriptor.transpiler().description(),
                        before,
                        after,
                        "patch applied"
                    );
                    report.record(PatchEvent::Applied {
                        patch: descriptor.name().to_string(),
                        target,
                        before,
                        after,
                    });
                }
                Err(e) => {
                    error!(
                        patch = descriptor.name(),
                        target = %target,
                        error = %e,
                        "patch failed, original body kept"
                    );
                    report.record(PatchEvent::Failed {
                        patch: descriptor.name().to_string(),
                        target,
                        error: e.to_string(),
                    });
                }
            }
        }
        Ok(report)
    }

    fn apply_one(
        &self,
        descriptor: &PatchDescriptor,
        methods: &mut MethodTable,
    ) -> Result<(usize, usize)> {
        let original = methods.body(descriptor.target())?;
        let mut work = MethodBody::clone(&original);

        self.transpile(descriptor, &mut work)?;
        work.validate()?;
        if self.config.verify_stack {
            stack::verify(&work)?;
        }

        let sizes = (original.len(), work.len());
        methods.install(work)?;
        Ok(sizes)
    }

    fn transpile(&self, descriptor: &PatchDescriptor, body: &mut MethodBody) -> Result<()> {
        if !self.config.isolate_panics {
            return descriptor.transpiler().transpile(body);
        }
        panic::catch_unwind(AssertUnwindSafe(|| descriptor.transpiler().transpile(body)))
            .unwrap_or_else(|payload| {
                Err(Error::TranspilerPanic {
                    patch: descriptor.name().to_string(),
                    message: panic_message(payload.as_ref()),
                })
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembly::{Instruction, MethodId, MethodRef, TypeSig};

    fn methods() -> MethodTable {
        let mut body = MethodBody::new(MethodRef::static_method("Round", "Start", vec![], TypeSig::Void));
        body.push(Instruction::ret());
        let mut methods = MethodTable::new();
        methods.insert_body(body);
        methods
    }

    fn start() -> MethodId {
        MethodId::new("Round", "Start", vec![])
    }

    #[test]
    fn test_invalid_rewrite_is_discarded() {
        let mut methods = methods();
        let mut catalog = PatchCatalog::new();
        catalog.register(PatchDescriptor::new("unbalanced", start(), |body: &mut MethodBody| -> Result<()> {
            body.instructions_mut().insert(0, Instruction::ldc_i4(1));
            Ok(())
        }));
        let report = catalog.apply_all(&mut methods).unwrap();

        assert!(matches!(report.find("unbalanced"), Some(PatchEvent::Failed { .. })));
        assert_eq!(methods.body(&start()).unwrap().len(), 1);
    }

    #[test]
    fn test_panicking_transpiler_is_isolated() {
        let mut methods = methods();
        let mut catalog = PatchCatalog::new();
        catalog
            .register(PatchDescriptor::new("boom", start(), |_: &mut MethodBody| -> Result<()> {
                panic!("anchor table corrupt")
            }))
            .register(PatchDescriptor::new("pad", start(), |body: &mut MethodBody| -> Result<()> {
                body.instructions_mut().insert(0, Instruction::nop());
                Ok(())
            }));
        let report = catalog.apply_all(&mut methods).unwrap();

        match report.find("boom") {
            Some(PatchEvent::Failed { error, .. }) => assert!(error.contains("anchor table corrupt")),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(report.applied().count(), 1);
        assert_eq!(methods.body(&start()).unwrap().len(), 2);
    }

    #[test]
    fn test_unverified_rewrite_installs_without_stack_check() {
        let mut methods = methods();
        let mut catalog = PatchCatalog::with_config(PatchConfig::default().with_verify_stack(false));
        catalog.register(PatchDescriptor::new("unbalanced", start(), |body: &mut MethodBody| -> Result<()> {
            body.instructions_mut().insert(0, Instruction::ldc_i4(1));
            Ok(())
        }));
        assert!(catalog.apply_all(&mut methods).unwrap().is_clean());
        assert!(catalog.is_applied());
        assert!(matches!(catalog.apply_all(&mut methods), Err(Error::AlreadyApplied)));
    }
}
