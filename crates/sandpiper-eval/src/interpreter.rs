//! The Sandpiper interpreter.
//!
//! An [`Interpreter`] pairs the execution state of one session with the
//! bridge it talks to. Evaluation itself lives in [`crate::eval`]; it is
//! asynchronous so that an awaited `input(...)` call can suspend the whole
//! call tree until the host answers.

use crate::bridge::RuntimeBridge;
use crate::runtime::Runtime;

/// The main interpreter.
pub struct Interpreter<'b, B: RuntimeBridge> {
    pub(crate) runtime: Runtime,
    pub(crate) bridge: &'b B,
}

impl<'b, B: RuntimeBridge> Interpreter<'b, B> {
    /// Create an interpreter with a fresh namespace.
    pub fn new(bridge: &'b B) -> Self {
        Self::with_runtime(Runtime::seeded(), bridge)
    }

    /// Create an interpreter over an existing runtime.
    pub fn with_runtime(runtime: Runtime, bridge: &'b B) -> Self {
        Self { runtime, bridge }
    }

    /// Get a reference to the runtime.
    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    /// Get a mutable reference to the runtime.
    pub fn runtime_mut(&mut self) -> &mut Runtime {
        &mut self.runtime
    }

    pub fn bridge(&self) -> &'b B {
        self.bridge
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::InputError;
    use crate::diagnostics::ErrorRecord;
    use crate::value::Value;
    use crate::wrapper::wrap;

    struct Silent;

    impl RuntimeBridge for Silent {
        async fn request_input(&self, _prompt: Option<&str>) -> Result<String, InputError> {
            Err(InputError::Eof)
        }

        fn write_output(&self, _text: &str) {}

        fn report_error(&self, _record: &ErrorRecord) {}

        fn signal_completion(&self) {}
    }

    fn run(source: &str) -> Runtime {
        let bridge = Silent;
        let mut interp = Interpreter::new(&bridge);
        let unit = wrap(sandpiper_parser::transform(source).unwrap());
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        runtime.block_on(unit.invoke(&mut interp)).unwrap();
        interp.runtime
    }

    #[test]
    fn test_new_interpreter_is_seeded() {
        let bridge = Silent;
        let interp = Interpreter::new(&bridge);
        assert_eq!(interp.runtime().global("__name__"), Some(&Value::str("__main__")));
        assert!(interp.runtime().frames().is_empty());
    }

    #[test]
    fn test_eval_empty_program() {
        let runtime = run("");
        assert_eq!(runtime.steps(), 0);
    }

    #[test]
    fn test_eval_assignment() {
        let runtime = run("x = 40\nx += 2\n");
        assert_eq!(runtime.global("x"), Some(&Value::Int(42)));
    }

    #[test]
    fn test_eval_for_loop() {
        let runtime = run("total = 0\nfor i in [1, 2, 3]:\n    total = total + i\n");
        assert_eq!(runtime.global("total"), Some(&Value::Int(6)));
    }

    #[test]
    fn test_frames_are_unwound_after_run() {
        let runtime = run("def f():\n    return 1\nf()\n");
        assert!(runtime.frames().is_empty());
    }
}
