//! Capturing standard output of a spawned measurement program.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};
use tracing::{debug, info, warn};

use super::{decode_line, LineSource};
use crate::error::{Result, TelemetryError};

/// Runs a program and yields its stdout line by line.
///
/// The input string is passed as the last command-line argument. The child is
/// killed when the source is shut down or dropped.
#[derive(Debug)]
pub struct ConsoleSource {
    program: String,
    child: Child,
    stdout: BufReader<ChildStdout>,
    pending: Vec<u8>,
    exited: bool,
}

impl ConsoleSource {
    /// Spawn `program` with `args` followed by `input_string`.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::SpawnFailed`] if the process cannot start.
    pub fn spawn(program: &str, args: &[String], input_string: &str) -> Result<Self> {
        let mut child = Command::new(program)
            .args(args)
            .arg(input_string)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| TelemetryError::SpawnFailed {
                program: program.into(),
                source,
            })?;

        let stdout = child.stdout.take().ok_or_else(|| TelemetryError::SpawnFailed {
            program: program.into(),
            source: std::io::Error::other("stdout was not captured"),
        })?;

        info!(program, pid = ?child.id(), "Started measurement program");
        Ok(Self {
            program: program.to_string(),
            child,
            stdout: BufReader::new(stdout),
            pending: Vec::new(),
            exited: false,
        })
    }

    /// Operating-system process id while the child is running.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    async fn reap(&mut self) {
        match self.child.wait().await {
            Ok(status) if status.success() => {
                info!(program = %self.program, %status, "Measurement program exited");
            }
            Ok(status) => {
                warn!(program = %self.program, %status, "Measurement program exited with failure");
            }
            Err(e) => warn!(program = %self.program, error = %e, "Failed to wait for measurement program"),
        }
        self.exited = true;
    }
}

#[async_trait]
impl LineSource for ConsoleSource {
    async fn next_line(&mut self) -> Result<Option<String>> {
        if self.exited {
            return Ok(None);
        }
        let read = self
            .stdout
            .read_until(b'\n', &mut self.pending)
            .await
            .map_err(|e| TelemetryError::io(format!("Failed to read output of {}", self.program), e))?;
        if read == 0 && self.pending.is_empty() {
            self.reap().await;
            return Ok(None);
        }
        Ok(Some(decode_line(std::mem::take(&mut self.pending))))
    }

    fn describe(&self) -> String {
        format!("console {}", self.program)
    }

    async fn shutdown(&mut self) -> Result<()> {
        if self.exited {
            return Ok(());
        }
        let running = self
            .child
            .try_wait()
            .map_err(|e| TelemetryError::io(format!("Failed to poll {}", self.program), e))?
            .is_none();
        if running {
            debug!(program = %self.program, "Killing measurement program");
            self.child
                .kill()
                .await
                .map_err(|e| TelemetryError::io(format!("Failed to kill {}", self.program), e))?;
        }
        self.reap().await;
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_input_string_is_last_argument() {
        let args = vec!["-c".to_string(), "echo \"INPUT_STRING:$0\"".to_string()];
        let mut source = ConsoleSource::spawn("sh", &args, "abc").unwrap();
        assert_eq!(
            source.next_line().await.unwrap().as_deref(),
            Some("INPUT_STRING:abc")
        );
        assert!(source.next_line().await.unwrap().is_none());
        assert!(source.next_line().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_invalid_utf8_output_keeps_streaming() {
        let args = vec![
            "-c".to_string(),
            "printf 'SESSION_NUMBER:0\\n\\377\\nSPD1_QBER_VALUE_IS:2.5\\n'".to_string(),
        ];
        let mut source = ConsoleSource::spawn("sh", &args, "x").unwrap();
        assert_eq!(
            source.next_line().await.unwrap().as_deref(),
            Some("SESSION_NUMBER:0")
        );
        assert_eq!(source.next_line().await.unwrap().as_deref(), Some("\u{fffd}"));
        assert_eq!(
            source.next_line().await.unwrap().as_deref(),
            Some("SPD1_QBER_VALUE_IS:2.5")
        );
        assert!(source.next_line().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_shutdown_kills_child() {
        let args = vec!["-c".to_string(), "sleep 30".to_string()];
        let mut source = ConsoleSource::spawn("sh", &args, "x").unwrap();
        assert!(source.pid().is_some());
        source.shutdown().await.unwrap();
        assert!(source.next_line().await.unwrap().is_none());
    }

    #[test]
    fn test_spawn_failure() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let err = rt
            .block_on(async { ConsoleSource::spawn("/no/such/program", &[], "x") })
            .unwrap_err();
        assert!(matches!(err, TelemetryError::SpawnFailed { .. }));
    }
}
