//! Diagnostics translator: turns parse failures and script exceptions into
//! the uniform [`ErrorRecord`] the host receives.

use serde::{Deserialize, Serialize};

use sandpiper_parser::ParseError;

use crate::error::{Raised, TraceFrame};

/// Frames pushed by the execution wrapper itself: the dispatch frame and the
/// entry point. They are never shown to the user.
pub const SYNTHETIC_FRAMES: usize = 2;

/// Kind reported for source that fails to parse.
pub const SYNTAX_ERROR: &str = "SyntaxError";

/// A failure as reported to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub message: String,
    /// Exception class name, or `SyntaxError`.
    pub kind: String,
    /// 0 when unknown.
    pub line: usize,
    /// Calling contexts, outermost first.
    pub frames: Vec<String>,
}

impl ErrorRecord {
    /// One-line JSON rendering.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Record for source that never made it past the parser.
pub fn from_parse_error(err: &ParseError) -> ErrorRecord {
    ErrorRecord {
        message: err.message().to_string(),
        kind: SYNTAX_ERROR.to_string(),
        line: err.line(),
        frames: Vec::new(),
    }
}

/// Record for an exception that escaped the script.
pub fn from_raised(raised: &Raised, filename: &str) -> ErrorRecord {
    let visible = raised.traceback.get(SYNTHETIC_FRAMES..).unwrap_or_default();
    ErrorRecord {
        message: raised.message(),
        kind: raised.class().name().to_string(),
        line: visible.last().map_or(0, |frame| frame.line),
        frames: visible.iter().map(|frame| format_frame(filename, frame)).collect(),
    }
}

pub fn format_frame(filename: &str, frame: &TraceFrame) -> String {
    format!("File \"{}\", line {}, in {}", filename, frame.line, frame.name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn frame(name: &str, line: usize) -> TraceFrame {
        TraceFrame {
            name: name.to_string(),
            line,
        }
    }

    fn raised(traceback: Vec<TraceFrame>) -> Raised {
        let Error::Exception(mut raised) = Error::value_error("x") else {
            panic!("Expected exception");
        };
        raised.traceback = traceback;
        raised
    }

    #[test]
    fn test_synthetic_frames_are_dropped() {
        let record = from_raised(
            &raised(vec![
                frame("<dispatch>", 0),
                frame("__sandpiper_main__", 0),
                frame("<module>", 3),
                frame("f", 2),
            ]),
            "<exec>",
        );
        assert_eq!(record.kind, "ValueError");
        assert_eq!(record.message, "x");
        assert_eq!(record.line, 2);
        assert_eq!(
            record.frames,
            vec![
                "File \"<exec>\", line 3, in <module>".to_string(),
                "File \"<exec>\", line 2, in f".to_string(),
            ]
        );
    }

    #[test]
    fn test_missing_frames_report_line_zero() {
        let record = from_raised(&raised(vec![frame("<dispatch>", 0)]), "<exec>");
        assert_eq!(record.line, 0);
        assert!(record.frames.is_empty());
    }

    #[test]
    fn test_parse_error_record() {
        let err = sandpiper_parser::parse("x = (1,\n").unwrap_err();
        let record = from_parse_error(&err);
        assert_eq!(record.kind, "SyntaxError");
        assert_eq!(record.message, "'(' was never closed");
        assert_eq!(record.line, 1);
        assert!(record.frames.is_empty());
    }

    #[test]
    fn test_json_shape() {
        let record = ErrorRecord {
            message: "x".to_string(),
            kind: "ValueError".to_string(),
            line: 2,
            frames: vec![],
        };
        assert_eq!(
            record.to_json().unwrap(),
            r#"{"message":"x","kind":"ValueError","line":2,"frames":[]}"#
        );
    }
}
