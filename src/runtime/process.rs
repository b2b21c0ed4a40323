use super::{Invocation, RunningScript, RuntimeOutput, ScriptRuntime};
use crate::config::InterpreterConfig;
use crate::error::{Error, Result, ResultExt};
use std::io::{Read, Write};
use std::process::{Child, Command, Stdio};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Runs the interpreter as a child process: `<program> <args..> <mode> <invocation args..>`.
#[derive(Debug, Clone)]
pub struct ProcessRuntime {
    config: InterpreterConfig,
}

impl ProcessRuntime {
    pub fn new(config: InterpreterConfig) -> Self {
        Self { config }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.config.program);
        cmd.args(&self.config.args);
        if let Some(dir) = &self.config.working_dir {
            cmd.current_dir(dir);
        }
        cmd
    }
}

impl ScriptRuntime for ProcessRuntime {
    fn spawn(&self, invocation: &Invocation) -> Result<Box<dyn RunningScript>> {
        debug!(
            program = %self.config.program,
            mode = invocation.mode(),
            port = invocation.port(),
            "spawning interpreter"
        );
        let mut child = self
            .command()
            .args(invocation.args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::Runtime(format!("failed to start {}: {}", self.config.program, e)))?;

        let combined = Arc::new(Mutex::new(Vec::new()));
        let stdout = capture(child.stdout.take(), &combined);
        let stderr = capture(child.stderr.take(), &combined);
        Ok(Box::new(RunningProcess {
            child,
            stdout,
            stderr,
            combined,
            timeout: self.config.timeout(),
        }))
    }

    fn format(&self, code: &str) -> Result<String> {
        let mut child = self
            .command()
            .arg("dys_format")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .context("failed to start formatter")?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(code.as_bytes()).context("failed to write code to formatter")?;
        }
        let output = child.wait_with_output().context("formatter did not finish")?;
        if !output.status.success() {
            return Err(Error::Runtime(format!(
                "failed to format code: {}, {}",
                output.status,
                String::from_utf8_lossy(&output.stderr)
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Drains one pipe, appending each chunk to `combined` as it arrives.
fn capture<R: Read + Send + 'static>(
    pipe: Option<R>,
    combined: &Arc<Mutex<Vec<u8>>>,
) -> Option<JoinHandle<Vec<u8>>> {
    pipe.map(|mut pipe| {
        let combined = Arc::clone(combined);
        thread::spawn(move || {
            let mut buf = Vec::new();
            let mut chunk = [0u8; 4096];
            loop {
                match pipe.read(&mut chunk) {
                    Ok(0) => break,
                    Ok(n) => {
                        buf.extend_from_slice(&chunk[..n]);
                        combined
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .extend_from_slice(&chunk[..n]);
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        warn!(error = %e, "failed to read interpreter output");
                        break;
                    }
                }
            }
            buf
        })
    })
}

fn collect(handle: Option<JoinHandle<Vec<u8>>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}

struct RunningProcess {
    child: Child,
    stdout: Option<JoinHandle<Vec<u8>>>,
    stderr: Option<JoinHandle<Vec<u8>>>,
    combined: Arc<Mutex<Vec<u8>>>,
    timeout: Option<Duration>,
}

impl RunningScript for RunningProcess {
    fn wait(self: Box<Self>) -> Result<RuntimeOutput> {
        let RunningProcess {
            mut child,
            stdout,
            stderr,
            combined,
            timeout,
        } = *self;

        let status = match timeout {
            None => child.wait()?,
            Some(timeout) => {
                let deadline = Instant::now() + timeout;
                loop {
                    if let Some(status) = child.try_wait()? {
                        break status;
                    }
                    if Instant::now() >= deadline {
                        warn!(timeout_secs = timeout.as_secs(), "interpreter timed out, killing it");
                        let _ = child.kill();
                        let _ = child.wait();
                        collect(stdout);
                        collect(stderr);
                        return Err(Error::Runtime(format!(
                            "interpreter did not finish within {}s",
                            timeout.as_secs()
                        )));
                    }
                    thread::sleep(POLL_INTERVAL);
                }
            }
        };

        let stdout = collect(stdout);
        let stderr = collect(stderr);
        let combined = combined.lock().unwrap_or_else(PoisonError::into_inner);
        let combined = String::from_utf8_lossy(&combined).into_owned();
        let output = RuntimeOutput {
            success: status.success(),
            status: status.code(),
            stdout,
            stderr,
            combined,
        };
        if !output.stderr.is_empty() {
            debug!(stderr = %output.stderr, "interpreter stderr");
        }
        Ok(output)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn shell(script: &str) -> ProcessRuntime {
        ProcessRuntime::new(InterpreterConfig {
            program: "sh".into(),
            args: vec!["-c".into(), script.into(), "sh".into()],
            working_dir: None,
            timeout_secs: Some(5),
        })
    }

    fn exec_invocation() -> Invocation {
        Invocation::Exec {
            msg_json: "{}".into(),
            script_json: "{}".into(),
            attached_results_json: "[]".into(),
            header_json: "{}".into(),
            port: 1,
        }
    }

    #[test]
    fn test_process_passes_arguments() {
        let runtime = shell(r#"echo "mode=$1"; echo "port=$6""#);
        let output = runtime.spawn(&exec_invocation()).unwrap().wait().unwrap();
        assert!(output.success);
        assert_eq!(output.stdout, "mode=exec_script\nport=1\n");
        assert_eq!(output.result_line(), "port=1");
    }

    #[test]
    fn test_process_failure_status() {
        let runtime = shell(r#"echo '{"err":"bad"}'; echo oops >&2; exit 3"#);
        let output = runtime.spawn(&exec_invocation()).unwrap().wait().unwrap();
        assert!(!output.success);
        assert_eq!(output.status, Some(3));
        assert_eq!(output.stderr.trim(), "oops");
        assert_eq!(output.status_text(), "exit status 3");
    }

    #[test]
    fn test_process_error_on_stderr_is_result() {
        let runtime = shell(r#"echo partial; sleep 0.1; echo '{"error":"bad"}' >&2; exit 1"#);
        let output = runtime.spawn(&exec_invocation()).unwrap().wait().unwrap();
        assert!(!output.success);
        assert_eq!(output.stdout, "partial\n");
        assert_eq!(output.combined, "partial\n{\"error\":\"bad\"}\n");
        assert_eq!(output.result_line(), r#"{"error":"bad"}"#);
    }

    #[test]
    fn test_process_timeout() {
        let mut runtime = shell("exec sleep 5");
        runtime.config.timeout_secs = Some(1);
        let err = runtime.spawn(&exec_invocation()).unwrap().wait().unwrap_err();
        assert!(err.to_string().contains("did not finish"));
    }

    #[test]
    fn test_missing_program() {
        let runtime = ProcessRuntime::new(InterpreterConfig {
            program: "/nonexistent/interpreter".into(),
            ..InterpreterConfig::default()
        });
        assert!(runtime.spawn(&exec_invocation()).is_err());
    }
}
