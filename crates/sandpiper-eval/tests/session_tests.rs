//! End-to-end session tests against an instrumented bridge.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::time::Duration;

use sandpiper_eval::{
    ChannelBridge, DEFAULT_RECURSION_LIMIT, ErrorRecord, HostEvent, InputError, Outcome,
    RuntimeBridge, SESSION_STACK_SIZE, Session, SessionConfig, SessionError, SessionState,
};

#[derive(Debug, Clone, PartialEq)]
enum Event {
    Output(String),
    Request(Option<String>),
    Error(ErrorRecord),
    Completed,
}

/// Records every bridge call. Inputs are answered from a script after a
/// simulated host delay; `hang` leaves every request pending forever.
#[derive(Default)]
struct StubBridge {
    events: RefCell<Vec<Event>>,
    inputs: RefCell<VecDeque<String>>,
    hang: bool,
}

impl StubBridge {
    fn with_inputs(inputs: &[&str]) -> Self {
        Self {
            inputs: RefCell::new(inputs.iter().map(|s| s.to_string()).collect()),
            ..Self::default()
        }
    }

    fn hanging() -> Self {
        Self {
            hang: true,
            ..Self::default()
        }
    }

    fn events(&self) -> Vec<Event> {
        self.events.borrow().clone()
    }

    fn output(&self) -> String {
        self.events
            .borrow()
            .iter()
            .filter_map(|event| match event {
                Event::Output(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    fn completions(&self) -> usize {
        self.events
            .borrow()
            .iter()
            .filter(|event| matches!(event, Event::Completed))
            .count()
    }

    fn errors(&self) -> Vec<ErrorRecord> {
        self.events
            .borrow()
            .iter()
            .filter_map(|event| match event {
                Event::Error(record) => Some(record.clone()),
                _ => None,
            })
            .collect()
    }
}

impl RuntimeBridge for StubBridge {
    async fn request_input(&self, prompt: Option<&str>) -> Result<String, InputError> {
        self.events
            .borrow_mut()
            .push(Event::Request(prompt.map(str::to_owned)));
        if self.hang {
            std::future::pending::<()>().await;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
        self.inputs.borrow_mut().pop_front().ok_or(InputError::Eof)
    }

    fn write_output(&self, text: &str) {
        self.events.borrow_mut().push(Event::Output(text.to_string()));
    }

    fn report_error(&self, record: &ErrorRecord) {
        self.events.borrow_mut().push(Event::Error(record.clone()));
    }

    fn signal_completion(&self) {
        self.events.borrow_mut().push(Event::Completed);
    }
}

async fn run(bridge: StubBridge, source: &str) -> (Outcome, Session<StubBridge>) {
    let mut session = Session::new(bridge);
    let outcome = session.run(source).await.unwrap();
    (outcome, session)
}

#[tokio::test]
async fn test_program_without_input_completes() {
    let (outcome, session) = run(StubBridge::default(), "x = 2\nprint(x * 21)").await;
    assert_eq!(outcome, Outcome::Completed);
    assert_eq!(session.state(), SessionState::Completed);
    assert_eq!(
        session.bridge().events(),
        vec![Event::Output("42\n".to_string()), Event::Completed]
    );
}

#[tokio::test]
async fn test_greeting_scenario() {
    let source = "name = input(\"Name: \")\nprint(\"Hi \" + name)";
    let (outcome, session) = run(StubBridge::with_inputs(&["Ada"]), source).await;
    assert_eq!(outcome, Outcome::Completed);
    assert_eq!(
        session.bridge().events(),
        vec![
            Event::Request(Some("Name: ".to_string())),
            Event::Output("Hi Ada\n".to_string()),
            Event::Completed,
        ]
    );
}

#[tokio::test]
async fn test_effects_follow_program_order() {
    let source = "print(\"A\")\nvalue = input()\nprint(value)";
    let (_, session) = run(StubBridge::with_inputs(&["later"]), source).await;
    assert_eq!(
        session.bridge().events(),
        vec![
            Event::Output("A\n".to_string()),
            Event::Request(None),
            Event::Output("later\n".to_string()),
            Event::Completed,
        ]
    );
}

#[tokio::test]
async fn test_syntax_error_is_rejected() {
    let (outcome, session) = run(StubBridge::default(), "print('start')\nx = (1,\n").await;
    let record = ErrorRecord {
        message: "'(' was never closed".to_string(),
        kind: "SyntaxError".to_string(),
        line: 2,
        frames: vec![],
    };
    assert_eq!(outcome, Outcome::Rejected(record.clone()));
    assert_eq!(session.state(), SessionState::Rejected);
    // Nothing ran: no output before the error.
    assert_eq!(
        session.bridge().events(),
        vec![Event::Error(record), Event::Completed]
    );
}

#[tokio::test]
async fn test_await_in_source_is_a_syntax_error() {
    let (outcome, _) = run(StubBridge::default(), "x = await input()").await;
    let record = outcome.error().unwrap();
    assert_eq!(record.kind, "SyntaxError");
    assert_eq!(record.line, 1);
}

#[tokio::test]
async fn test_runtime_error_record() {
    let source = "def f():\n  raise ValueError(\"x\")\nf()";
    let (outcome, session) = run(StubBridge::default(), source).await;
    let record = ErrorRecord {
        message: "x".to_string(),
        kind: "ValueError".to_string(),
        line: 2,
        frames: vec![
            "File \"<exec>\", line 3, in <module>".to_string(),
            "File \"<exec>\", line 2, in f".to_string(),
        ],
    };
    assert_eq!(outcome, Outcome::Faulted(record.clone()));
    assert_eq!(session.state(), SessionState::Faulted);
    assert_eq!(
        session.bridge().events(),
        vec![Event::Error(record), Event::Completed]
    );
}

#[tokio::test]
async fn test_error_after_input_keeps_order() {
    let source = "n = int(input('n? '))\nprint(10 // n)";
    let (outcome, session) = run(StubBridge::with_inputs(&["0"]), source).await;
    let record = outcome.error().unwrap();
    assert_eq!(record.kind, "ZeroDivisionError");
    assert_eq!(record.message, "integer division or modulo by zero");
    assert_eq!(record.line, 2);
    assert_eq!(
        session.bridge().events(),
        vec![
            Event::Request(Some("n? ".to_string())),
            Event::Error(record.clone()),
            Event::Completed,
        ]
    );
}

#[tokio::test]
async fn test_completion_signalled_exactly_once() {
    let sources = ["print(1)", "x = (", "1 / 0", "x = input()"];
    for source in sources {
        let (_, session) = run(StubBridge::default(), source).await;
        assert_eq!(session.bridge().completions(), 1, "source: {:?}", source);
        assert!(session.bridge().errors().len() <= 1);
        assert!(session.state().is_terminal());
    }
}

#[tokio::test]
async fn test_eof_surfaces_as_eoferror() {
    let (outcome, _) = run(StubBridge::default(), "x = input()").await;
    let record = outcome.error().unwrap();
    assert_eq!(record.kind, "EOFError");
    assert_eq!(record.message, "EOF when reading a line");
}

#[tokio::test]
async fn test_shadowed_input_is_called_directly() {
    let source = "def input(prompt):\n    return 'local ' + prompt\nprint(input('x'))";
    let (outcome, session) = run(StubBridge::default(), source).await;
    assert_eq!(outcome, Outcome::Completed);
    assert_eq!(session.bridge().output(), "local x\n");
}

#[tokio::test]
async fn test_caught_exception_completes() {
    let source = "try:\n    int('abc')\nexcept ValueError as e:\n    print('bad:', e)";
    let (outcome, session) = run(StubBridge::default(), source).await;
    assert_eq!(outcome, Outcome::Completed);
    assert_eq!(
        session.bridge().output(),
        "bad: invalid literal for int() with base 10: 'abc'\n"
    );
}

#[tokio::test]
async fn test_recursion_limit() {
    let config = SessionConfig::new().recursion_limit(20);
    let mut session = Session::with_config(StubBridge::default(), config);
    let source = "def down(n):\n    return down(n + 1)\ndown(0)";
    let outcome = session.run(source).await.unwrap();
    let record = outcome.error().unwrap();
    assert_eq!(record.kind, "RecursionError");
    assert_eq!(record.message, "maximum recursion depth exceeded");
    assert_eq!(record.frames.len(), 21);
}

/// Run a session the way a host does: on its own thread, with a deep stack.
fn run_on_session_thread(config: SessionConfig, source: String) -> (Outcome, Vec<Event>) {
    std::thread::Builder::new()
        .stack_size(SESSION_STACK_SIZE)
        .spawn(move || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            let mut session = Session::with_config(StubBridge::default(), config);
            let outcome = runtime.block_on(session.run(&source)).unwrap();
            (outcome, session.bridge().events())
        })
        .unwrap()
        .join()
        .unwrap()
}

#[test]
fn test_default_recursion_limit() {
    let source = "def down(n):\n    return down(n + 1)\ndown(0)".to_string();
    let (outcome, events) = run_on_session_thread(SessionConfig::default(), source);
    let record = outcome.error().unwrap();
    assert_eq!(record.kind, "RecursionError");
    assert_eq!(record.frames.len(), DEFAULT_RECURSION_LIMIT + 1);
    assert_eq!(events.last(), Some(&Event::Completed));
}

#[test]
fn test_deep_nesting_is_rejected() {
    let depth = 200_000;
    let source = format!("x = {}1{}\n", "(".repeat(depth), ")".repeat(depth));
    let (outcome, events) = run_on_session_thread(SessionConfig::default(), source);
    let record = ErrorRecord {
        message: "too many nested parentheses".to_string(),
        kind: "SyntaxError".to_string(),
        line: 1,
        frames: vec![],
    };
    assert_eq!(outcome, Outcome::Rejected(record.clone()));
    assert_eq!(events, vec![Event::Error(record), Event::Completed]);
}

#[test]
fn test_long_operator_chains_are_rejected() {
    let sources = [
        format!("x = 1{}\n", " + 1".repeat(300_000)),
        format!("x = {}1\n", "-".repeat(300_000)),
    ];
    for source in sources {
        let (outcome, events) = run_on_session_thread(SessionConfig::default(), source);
        assert_eq!(outcome.state(), SessionState::Rejected);
        assert_eq!(outcome.error().unwrap().message, "expression too complex");
        let completions = events.iter().filter(|e| matches!(e, Event::Completed)).count();
        assert_eq!(completions, 1);
    }
}

#[test]
fn test_deepest_allowed_nesting_runs() {
    let source = format!("print({}1)\n", "-".repeat(190));
    let (outcome, events) = run_on_session_thread(SessionConfig::default(), source);
    assert_eq!(outcome, Outcome::Completed);
    assert_eq!(
        events,
        vec![Event::Output("1\n".to_string()), Event::Completed]
    );
}

#[tokio::test]
async fn test_step_limit_cannot_be_swallowed() {
    let config = SessionConfig::new().step_limit(Some(50));
    let mut session = Session::with_config(StubBridge::default(), config);
    let source = "while True:\n    try:\n        pass\n    except Exception:\n        pass";
    let outcome = session.run(source).await.unwrap();
    let record = outcome.error().unwrap();
    assert_eq!(record.kind, "ExecutionLimitError");
    assert_eq!(record.message, "step limit of 50 statements exceeded");
}

#[tokio::test]
async fn test_cancel_while_suspended() {
    let mut session = Session::new(StubBridge::hanging());
    let token = session.cancel_token();
    let source = "print('A')\nx = input('? ')\nprint('never')";
    let cancel = async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        token.cancel();
    };
    let (outcome, ()) = tokio::join!(session.run(source), cancel);
    assert_eq!(outcome, Ok(Outcome::Cancelled));
    assert_eq!(session.state(), SessionState::Cancelled);
    assert_eq!(
        session.bridge().events(),
        vec![
            Event::Output("A\n".to_string()),
            Event::Request(Some("? ".to_string())),
            Event::Completed,
        ]
    );
}

#[tokio::test]
async fn test_cancel_runaway_loop() {
    let mut session = Session::new(StubBridge::default());
    let token = session.cancel_token();
    let cancel = async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        token.cancel();
    };
    let (outcome, ()) = tokio::join!(session.run("while True:\n    pass"), cancel);
    assert_eq!(outcome, Ok(Outcome::Cancelled));
    assert_eq!(session.bridge().completions(), 1);
    assert!(session.bridge().errors().is_empty());
}

#[tokio::test]
async fn test_dropped_session_future_still_signals_completion() {
    let mut session = Session::new(StubBridge::hanging());
    let result = tokio::time::timeout(
        Duration::from_millis(10),
        session.run("x = input()"),
    )
    .await;
    assert!(result.is_err());
    assert_eq!(
        session.bridge().events(),
        vec![Event::Request(None), Event::Completed]
    );
}

#[tokio::test]
async fn test_second_run_is_refused() {
    let (_, mut session) = run(StubBridge::default(), "pass").await;
    let err = session.run("pass").await.unwrap_err();
    assert_eq!(err, SessionError::AlreadyStarted(SessionState::Completed));
    assert_eq!(session.bridge().completions(), 1);
}

#[tokio::test]
async fn test_channel_bridge_session() {
    let (bridge, mut events) = ChannelBridge::channel();
    let mut session = Session::new(bridge);
    let host = async move {
        let mut seen = Vec::new();
        while let Some(event) = events.recv().await {
            match event {
                HostEvent::InputRequested { prompt, reply } => {
                    seen.push(format!("request {:?}", prompt));
                    reply.send("7".to_string()).unwrap();
                }
                HostEvent::Output(text) => seen.push(format!("output {:?}", text)),
                HostEvent::Error(record) => seen.push(format!("error {}", record.kind)),
                HostEvent::Completed => {
                    seen.push("completed".to_string());
                    break;
                }
            }
        }
        seen
    };
    let (outcome, seen) = tokio::join!(session.run("n = int(input('n: '))\nprint(n * 6)"), host);
    assert_eq!(outcome, Ok(Outcome::Completed));
    assert_eq!(
        seen,
        vec![
            "request Some(\"n: \")".to_string(),
            "output \"42\\n\"".to_string(),
            "completed".to_string(),
        ]
    );
}
