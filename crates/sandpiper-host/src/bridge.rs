//! Runtime bridge over the process's standard streams.

use std::io::Write;

use sandpiper_eval::{ErrorRecord, InputError, RuntimeBridge};
use tokio::io::{AsyncBufRead, BufReader, Lines, Stdin};
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

/// Answers input requests with lines from a reader, writes prompts and
/// program output to stdout and error records to stderr as JSON.
pub struct LineBridge<R> {
    lines: Mutex<Lines<R>>,
}

pub type StdioBridge = LineBridge<BufReader<Stdin>>;

impl<R: AsyncBufRead + Unpin> LineBridge<R> {
    pub fn new(lines: Lines<R>) -> Self {
        Self {
            lines: Mutex::new(lines),
        }
    }

    async fn next_line(&self) -> Result<String, InputError> {
        let mut lines = self.lines.lock().await;
        match lines.next_line().await {
            Ok(Some(line)) => Ok(line),
            Ok(None) => {
                debug!("stdin closed");
                Err(InputError::Eof)
            }
            Err(err) => {
                warn!(%err, "failed to read stdin");
                Err(InputError::Eof)
            }
        }
    }
}

impl<R: AsyncBufRead + Unpin> RuntimeBridge for LineBridge<R> {
    async fn request_input(&self, prompt: Option<&str>) -> Result<String, InputError> {
        if let Some(prompt) = prompt {
            self.write_output(prompt);
        }
        self.next_line().await
    }

    fn report_error(&self, record: &ErrorRecord) {
        match record.to_json() {
            Ok(json) => {
                let mut stderr = std::io::stderr().lock();
                let _ = writeln!(stderr, "{}", json);
            }
            Err(err) => error!(%err, "failed to serialize error record"),
        }
    }

    fn signal_completion(&self) {
        let _ = std::io::stdout().flush();
        debug!("session complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncBufReadExt;

    fn bridge(input: &'static str) -> LineBridge<&'static [u8]> {
        LineBridge::new(input.as_bytes().lines())
    }

    #[tokio::test]
    async fn test_lines_answer_requests_in_order() {
        let bridge = bridge("Ada\r\nBob\n");
        assert_eq!(bridge.request_input(None).await, Ok("Ada".to_string()));
        assert_eq!(bridge.request_input(None).await, Ok("Bob".to_string()));
        assert_eq!(bridge.request_input(None).await, Err(InputError::Eof));
    }

    #[tokio::test]
    async fn test_empty_input_is_eof() {
        let bridge = bridge("");
        assert_eq!(bridge.request_input(None).await, Err(InputError::Eof));
    }
}
