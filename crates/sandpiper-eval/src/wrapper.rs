//! Execution wrapper.
//!
//! The host environment may forbid suspension at the top level, so the whole
//! rewritten module is packaged as the body of one asynchronous function.
//! That function is the only thing ever awaited, exactly once.

use std::rc::Rc;

use sandpiper_parser::ast::{FunctionDef, Module, ScopeInfo};
use tracing::debug;

use crate::Result;
use crate::bridge::RuntimeBridge;
use crate::interpreter::Interpreter;
use crate::runtime::Frame;

/// Name of the synthetic entry point.
pub const ENTRY_POINT: &str = "__sandpiper_main__";

/// Outermost synthetic frame, standing in for the host's dispatch loop.
pub const DISPATCH_FRAME: &str = "<dispatch>";

/// Frame in which top-level statements report their lines.
pub const MODULE_FRAME: &str = "<module>";

/// A rewritten module, ready to run once.
#[derive(Debug, Clone)]
pub struct ExecutableUnit {
    entry: Rc<FunctionDef>,
}

/// Package a rewritten module as a zero-argument asynchronous entry point.
pub fn wrap(module: Module) -> ExecutableUnit {
    debug!(statements = module.body.len(), "wrapping module");
    ExecutableUnit {
        entry: Rc::new(FunctionDef {
            name: ENTRY_POINT.to_string(),
            params: Vec::new(),
            body: module.body,
            is_async: true,
            // The body runs against the module namespace, so it has no locals.
            scope: ScopeInfo::default(),
            line: 0,
        }),
    }
}

impl ExecutableUnit {
    pub fn entry(&self) -> &FunctionDef {
        &self.entry
    }

    /// Run the program start to finish or to the first uncaught failure.
    pub async fn invoke<B: RuntimeBridge>(self, interp: &mut Interpreter<'_, B>) -> Result<()> {
        let runtime = interp.runtime_mut();
        runtime.push_frame(Frame::module_level(DISPATCH_FRAME));
        runtime.push_frame(Frame::module_level(self.entry.name.clone()));
        runtime.push_frame(Frame::module_level(MODULE_FRAME));

        let result = interp.exec_block(&self.entry.body).await;

        let runtime = interp.runtime_mut();
        for _ in 0..3 {
            runtime.pop_frame();
        }
        result.map(|_| ())
    }
}
