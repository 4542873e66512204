//! Phase 3: body emission

use mug_syntax::diagnostics::CompileError;

use super::{IRGenerator, PendingBody};
use crate::backend::emitter::Emitter;
use crate::backend::local::LocalGenerator;

impl IRGenerator<'_, '_> {
    /// Lower every queued body. A failing body is reported and its siblings are still lowered.
    pub(super) fn emit_bodies(&mut self) {
        for pending in std::mem::take(&mut self.bodies) {
            if let Err(error) = self.emit_body(&pending) {
                self.diagnostics.report(error);
            }
        }
        tracing::debug!(unit = %self.source.name, "body emission done");
    }

    fn emit_body(&mut self, pending: &PendingBody) -> Result<(), CompileError> {
        let decl = &pending.decl;
        let Some(body) = &decl.body else {
            return Ok(());
        };
        let _span = tracing::debug_span!("body", function = decl.display_name()).entered();

        let emitter = Emitter::new(&mut self.session.module, pending.function);
        let mut generator = LocalGenerator::new(&self.symbols, emitter, pending.return_type.clone());

        let mut index = 0;
        if let (Some(receiver), Some(ty)) = (&decl.receiver, &pending.signature.receiver) {
            generator.declare_parameter(&receiver.node.name, ty.clone(), index, receiver.span)?;
            index += 1;
        }
        for (param, ty) in decl.params.iter().zip(&pending.signature.params) {
            generator.declare_parameter(&param.node.name, ty.clone(), index, param.span)?;
            index += 1;
        }
        generator.generate(body)
    }
}
