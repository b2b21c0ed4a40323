//! The interpreter boundary.
//!
//! A [`ScriptRuntime`] launches one interpreter per invocation. The host
//! passes everything the script needs as positional arguments, serves the
//! script's calls on the bridge port while it runs, and reads the final
//! result from the interpreter's standard output.

mod process;

pub use process::ProcessRuntime;

use crate::error::Result;

/// Trailing line some interpreters print after a failing run; the real
/// result sits on the line before it.
pub const EXIT_STATUS_MARKER: &str = "exit status 1";

/// What the interpreter is asked to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    /// `exec_script <msg> <script> <attached results> <header> <port>`
    Exec {
        msg_json: String,
        script_json: String,
        attached_results_json: String,
        header_json: String,
        port: u16,
    },
    /// `run_wsgi <port> <script> <header> <http request>`
    Web {
        port: u16,
        script_json: String,
        header_json: String,
        http_request: String,
    },
}

impl Invocation {
    pub fn mode(&self) -> &'static str {
        match self {
            Invocation::Exec { .. } => "exec_script",
            Invocation::Web { .. } => "run_wsgi",
        }
    }

    pub fn port(&self) -> u16 {
        match self {
            Invocation::Exec { port, .. } | Invocation::Web { port, .. } => *port,
        }
    }

    /// Positional arguments handed to the interpreter after its base command.
    pub fn args(&self) -> Vec<String> {
        match self {
            Invocation::Exec {
                msg_json,
                script_json,
                attached_results_json,
                header_json,
                port,
            } => vec![
                self.mode().to_string(),
                msg_json.clone(),
                script_json.clone(),
                attached_results_json.clone(),
                header_json.clone(),
                port.to_string(),
            ],
            Invocation::Web {
                port,
                script_json,
                header_json,
                http_request,
            } => vec![
                self.mode().to_string(),
                port.to_string(),
                script_json.clone(),
                header_json.clone(),
                http_request.clone(),
            ],
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeOutput {
    pub success: bool,
    /// Exit code, if the process exited normally.
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    /// Both streams in the order the interpreter wrote them.
    pub combined: String,
}

impl RuntimeOutput {
    pub fn status_text(&self) -> String {
        match self.status {
            Some(code) => format!("exit status {}", code),
            None => "terminated by signal".to_string(),
        }
    }

    /// The authoritative result: the last non-empty line of the combined
    /// output, or the one before it when the last is [`EXIT_STATUS_MARKER`].
    pub fn result_line(&self) -> String {
        let mut lines = self.combined.lines().rev().filter(|l| !l.trim().is_empty());
        match lines.next() {
            Some(last) if last.trim() == EXIT_STATUS_MARKER => {
                lines.next().unwrap_or_default().to_string()
            }
            Some(last) => last.to_string(),
            None => String::new(),
        }
    }
}

/// Whether a result line carries structured (JSON) error data.
pub fn is_structured(line: &str) -> bool {
    let line = line.trim_start();
    line.starts_with('{') || line.starts_with('[')
}

pub trait ScriptRuntime: Send + Sync {
    /// Starts the interpreter; it must not wait for it to exit.
    fn spawn(&self, invocation: &Invocation) -> Result<Box<dyn RunningScript>>;

    /// Canonical formatting of stored code. Runtimes without a formatter
    /// keep the code as written.
    fn format(&self, code: &str) -> Result<String> {
        Ok(code.to_string())
    }
}

/// A launched interpreter.
pub trait RunningScript: Send {
    /// Blocks until the interpreter exits.
    fn wait(self: Box<Self>) -> Result<RuntimeOutput>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(stdout: &str) -> RuntimeOutput {
        RuntimeOutput {
            success: true,
            status: Some(0),
            stdout: stdout.to_string(),
            stderr: String::new(),
            combined: stdout.to_string(),
        }
    }

    #[test]
    fn test_result_line() {
        assert_eq!(output("debug\n42\n").result_line(), "42");
        assert_eq!(output("debug\n42").result_line(), "42");
        assert_eq!(output("{\"error\":1}\nexit status 1\n").result_line(), "{\"error\":1}");
        assert_eq!(output("").result_line(), "");
        assert_eq!(output("exit status 1").result_line(), "");
    }

    #[test]
    fn test_result_line_reads_stderr() {
        let output = RuntimeOutput {
            success: false,
            status: Some(1),
            stdout: "partial\n".into(),
            stderr: "{\"error\":\"bad\"}\n".into(),
            combined: "partial\n{\"error\":\"bad\"}\n".into(),
        };
        assert_eq!(output.result_line(), "{\"error\":\"bad\"}");
        assert!(is_structured(&output.result_line()));
    }

    #[test]
    fn test_invocation_args() {
        let exec = Invocation::Exec {
            msg_json: "m".into(),
            script_json: "s".into(),
            attached_results_json: "[]".into(),
            header_json: "h".into(),
            port: 4242,
        };
        assert_eq!(exec.args(), vec!["exec_script", "m", "s", "[]", "h", "4242"]);

        let web = Invocation::Web {
            port: 7,
            script_json: "s".into(),
            header_json: "h".into(),
            http_request: "GET /".into(),
        };
        assert_eq!(web.args(), vec!["run_wsgi", "7", "s", "h", "GET /"]);
        assert_eq!(web.port(), 7);
    }

    #[test]
    fn test_is_structured() {
        assert!(is_structured("{\"a\":1}"));
        assert!(is_structured(" [1]"));
        assert!(!is_structured("Traceback (most recent call last):"));
    }
}
