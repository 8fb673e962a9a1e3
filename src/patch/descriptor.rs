//! Patch descriptors and the transpiler trait.

use std::fmt;

use crate::{
    assembly::{body::MethodBody, types::MethodId},
    Result,
};

/// A load-time rewrite of one method body.
///
/// Transpilers must be thread-safe (`Send + Sync`) so a catalog can be built on one
/// thread and applied on another. They receive a copy of the target body; whatever they
/// leave in it is validated and installed only if they return `Ok`.
///
/// Any `Fn(&mut MethodBody) -> Result<()>` closure is a transpiler.
///
/// # Errors
///
/// A transpiler reports authoring errors ([`crate::Error::AnchorNotFound`],
/// [`crate::Error::SchemaMismatch`], ...) by returning them. The catalog then discards
/// the copy and keeps the original body.
pub trait Transpiler: Send + Sync {
    /// Rewrites `body` in place.
    ///
    /// # Errors
    ///
    /// Returns an error if the rewrite cannot be performed.
    fn transpile(&self, body: &mut MethodBody) -> Result<()>;

    /// Short description for logs and reports.
    fn description(&self) -> String {
        "custom transpiler".to_string()
    }
}

impl<F> Transpiler for F
where
    F: Fn(&mut MethodBody) -> Result<()> + Send + Sync,
{
    fn transpile(&self, body: &mut MethodBody) -> Result<()> {
        self(body)
    }
}

/// A named transpiler bound to the method it rewrites. Applied at most once.
pub struct PatchDescriptor {
    name: String,
    target: MethodId,
    transpiler: Box<dyn Transpiler>,
}

impl PatchDescriptor {
    /// Creates a descriptor.
    pub fn new(
        name: impl Into<String>,
        target: MethodId,
        transpiler: impl Transpiler + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            target,
            transpiler: Box::new(transpiler),
        }
    }

    /// Patch name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Target method identity.
    #[must_use]
    pub fn target(&self) -> &MethodId {
        &self.target
    }

    /// The transpiler.
    #[must_use]
    pub fn transpiler(&self) -> &dyn Transpiler {
        self.transpiler.as_ref()
    }
}

impl fmt::Debug for PatchDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PatchDescriptor")
            .field("name", &self.name)
            .field("target", &self.target)
            .field("transpiler", &self.transpiler.description())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembly::{Instruction, MethodRef, TypeSig};

    #[test]
    fn test_closure_transpiler() {
        let target = MethodId::new("Round", "End", vec![]);
        let descriptor = PatchDescriptor::new("nop-prologue", target.clone(), |body: &mut MethodBody| -> Result<()> {
            body.instructions_mut().insert(0, Instruction::nop());
            Ok(())
        });
        assert_eq!(descriptor.target(), &target);
        assert_eq!(descriptor.transpiler().description(), "custom transpiler");

        let mut body = MethodBody::new(MethodRef::static_method("Round", "End", vec![], TypeSig::Void));
        body.push(Instruction::ret());
        descriptor.transpiler().transpile(&mut body).unwrap();
        assert_eq!(body.len(), 2);
        assert!(format!("{descriptor:?}").contains("nop-prologue"));
    }
}
