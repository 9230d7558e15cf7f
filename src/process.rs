//! External command execution.
//!
//! Every system tool the station drives (`ip`, `iw`, `wpa_supplicant`,
//! `wpa_cli`, `udhcpc`, `killall`) is invoked through [`CommandRunner`] with a
//! fixed argument list. Nothing is assembled into shell strings, and the
//! Wi-Fi logic can be exercised against a scripted runner in tests.

use log::debug;
use std::fmt;
use std::io;
use std::process::{Command, Stdio};

/// A program invocation with a fixed argument list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Program name, resolved through `PATH`.
    pub program: String,
    /// Arguments passed verbatim.
    pub args: Vec<String>,
    /// Capture stdout/stderr. When false the streams go to `/dev/null`,
    /// which is required for tools that daemonize and keep inherited pipes.
    pub capture: bool,
}

impl CommandSpec {
    /// Create a spec for `program` with no arguments.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            capture: true,
        }
    }

    /// Append one argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Discard the command's output instead of capturing it.
    pub fn discard_output(mut self) -> Self {
        self.capture = false;
        self
    }

    /// The invocation as a single line (`program arg1 arg2`).
    pub fn command_line(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.command_line())
    }
}

/// Result of running a command to completion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code; `None` when the process was terminated by a signal.
    pub status: Option<i32>,
    /// Captured stdout (lossy UTF-8). Empty when output was discarded.
    pub stdout: String,
    /// Captured stderr (lossy UTF-8). Empty when output was discarded.
    pub stderr: String,
}

impl CommandOutput {
    /// Successful exit with the given stdout.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            status: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Failed exit with the given code.
    pub fn failed(code: i32) -> Self {
        Self {
            status: Some(code),
            ..Self::default()
        }
    }

    /// True if the process exited with status 0.
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }
}

/// Executes external commands.
///
/// Implementations block until the command exits. Async callers must run
/// them on a blocking thread (`tokio::task::spawn_blocking`).
pub trait CommandRunner: Send + Sync {
    /// Run `cmd` to completion.
    ///
    /// Returns `Err` only when the process could not be started; a non-zero
    /// exit is reported through [`CommandOutput::status`].
    fn run(&self, cmd: &CommandSpec) -> io::Result<CommandOutput>;
}

/// Runs commands on the host with `std::process::Command`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, cmd: &CommandSpec) -> io::Result<CommandOutput> {
        debug!("exec: {}", cmd);

        let mut command = Command::new(&cmd.program);
        command.args(&cmd.args).stdin(Stdio::null());

        if !cmd.capture {
            let status = command
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()?;
            return Ok(CommandOutput {
                status: status.code(),
                ..CommandOutput::default()
            });
        }

        let output = command.output()?;
        Ok(CommandOutput {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}


#[cfg(test)]
mod tests {
    use super::testing::ScriptedRunner;
    use super::*;

    #[test]
    fn test_command_line() {
        let cmd = CommandSpec::new("ip").args(["link", "set", "wlan0", "up"]);
        assert_eq!(cmd.command_line(), "ip link set wlan0 up");
        assert!(cmd.capture);
        assert!(!cmd.discard_output().capture);
    }

    #[test]
    fn test_output_success() {
        assert!(CommandOutput::ok("x").success());
        assert!(!CommandOutput::failed(1).success());
        assert!(!CommandOutput::default().success());
    }

    #[test]
    fn test_system_runner_captures_stdout() {
        let out = SystemRunner
            .run(&CommandSpec::new("echo").arg("hello"))
            .expect("echo should run");
        assert!(out.success());
        assert_eq!(out.stdout.trim(), "hello");
    }

    #[test]
    fn test_system_runner_missing_program() {
        let result = SystemRunner.run(&CommandSpec::new("definitely-not-a-real-tool-xyz"));
        assert!(result.is_err());
    }

    #[test]
    fn test_scripted_runner_sequences() {
        let runner = ScriptedRunner::new().on_seq(
            "wpa_supplicant",
            vec![CommandOutput::failed(1), CommandOutput::ok("")],
        );
        let cmd = CommandSpec::new("wpa_supplicant").arg("-B");
        assert!(!runner.run(&cmd).unwrap().success());
        assert!(runner.run(&cmd).unwrap().success());
        assert!(runner.run(&cmd).unwrap().success());
        assert_eq!(runner.count("wpa_supplicant"), 3);
        assert!(runner.run(&CommandSpec::new("other")).unwrap().success());
    }

    #[test]
    fn test_scripted_runner_later_rules_win() {
        let runner = ScriptedRunner::new()
            .on("ip link show", CommandOutput::ok("state UP"))
            .on("ip link show", CommandOutput::failed(1));
        let out = runner.run(&CommandSpec::new("ip").args(["link", "show", "wlan0"])).unwrap();
        assert_eq!(out.status, Some(1));
    }
}
