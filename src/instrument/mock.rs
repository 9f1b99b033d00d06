//! Scripted SCPI transport for testing
//!
//! Stands in for the counter socket so the SCPI driver can be tested without
//! hardware. It provides:
//! - Call logging for test verification
//! - Scripted query responses (served in order, then `#10`)
//! - Failure injection on a named command

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use super::scpi::ScpiTransport;
use crate::error::{AppResult, DaqError};
use crate::transport::frame::NO_DATA;

#[derive(Default)]
struct MockState {
    call_log: Vec<String>,
    responses: VecDeque<String>,
    fail_on: Option<String>,
}

/// Mock SCPI transport. Clones share state, so a test can keep one handle
/// while the driver owns another.
///
/// # Example
///
/// ```
/// use counter_daq::instrument::{MockScpiTransport, ScpiTransport};
///
/// # tokio_test::block_on(async {
/// let mut mock = MockScpiTransport::new().with_response("+1.0E+07\n");
/// assert_eq!(mock.query("R?").await.unwrap(), "+1.0E+07\n");
/// assert_eq!(mock.call_log(), vec!["R?"]);
/// # })
/// ```
#[derive(Clone, Default)]
pub struct MockScpiTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockScpiTransport {
    /// Create a mock with no scripted responses
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response for the next unanswered query
    pub fn with_response(self, response: impl Into<String>) -> Self {
        self.push_response(response);
        self
    }

    /// Make the given command (exact text) fail every time it is sent
    pub fn fail_on(self, command: impl Into<String>) -> Self {
        self.state().fail_on = Some(command.into());
        self
    }

    /// Queue a response after construction
    pub fn push_response(&self, response: impl Into<String>) {
        self.state().responses.push_back(response.into());
    }

    /// Get a copy of the call log for verification
    pub fn call_log(&self) -> Vec<String> {
        self.state().call_log.clone()
    }

    /// Clear the call log
    pub fn clear_call_log(&self) {
        self.state().call_log.clear();
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        // A panicking test thread must not hide the log from the others
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn log_call(&self, command: &str) -> AppResult<()> {
        let mut state = self.state();
        state.call_log.push(command.to_string());
        if state.fail_on.as_deref() == Some(command) {
            return Err(DaqError::Instrument(format!("injected failure on '{command}'")));
        }
        Ok(())
    }
}

#[async_trait]
impl ScpiTransport for MockScpiTransport {
    async fn query(&mut self, command: &str) -> AppResult<String> {
        self.log_call(command)?;
        Ok(self
            .state()
            .responses
            .pop_front()
            .unwrap_or_else(|| format!("{NO_DATA}\n")))
    }

    async fn command(&mut self, command: &str) -> AppResult<()> {
        self.log_call(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn exhausted_script_answers_no_data() {
        let mut mock = MockScpiTransport::new();
        assert_eq!(mock.query("R?").await.unwrap(), "#10\n");
    }

    #[tokio::test]
    async fn injected_failure_is_logged() {
        let mut mock = MockScpiTransport::new().fail_on("*RST");
        assert!(mock.command("*RST").await.is_err());
        assert!(mock.command("INIT").await.is_ok());
        assert_eq!(mock.call_log(), vec!["*RST", "INIT"]);
        mock.clear_call_log();
        assert!(mock.call_log().is_empty());
    }
}
