//! Invocation of external programs.
//!
//! Every external program the pipeline uses is run through a [`ToolCommand`], which owns the
//! arguments, where the child's streams go, and which exit code counts as success.  Commands are
//! never run through a shell, so arguments are passed to the program verbatim.
use anyhow::{bail, Context, Result};
use itertools::Itertools;
use log::debug;
use std::{
    ffi::{OsStr, OsString},
    fmt::Display,
    fs::File,
    path::PathBuf,
    process::{Command, ExitStatus, Stdio},
};

/// The number of trailing lines of captured standard error to include in a failure message.
pub const STDERR_TAIL_LINES: usize = 20;

/// An external executable, optionally with leading arguments that precede every invocation
/// (e.g. `python3 cleanAlignments.py`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tool {
    program: PathBuf,
    leading_args: Vec<OsString>,
}

impl Tool {
    pub fn new<P: Into<PathBuf>>(program: P) -> Self {
        Self {
            program: program.into(),
            leading_args: Vec::new(),
        }
    }

    /// Adds arguments that are passed before any command-specific argument.
    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.leading_args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }
}

impl Display for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts = std::iter::once(self.program.as_os_str())
            .chain(self.leading_args.iter().map(OsString::as_os_str))
            .map(quote)
            .join(" ");
        write!(f, "{parts}")
    }
}

/// Where a child process' output stream is sent.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Redirect {
    /// Collected in memory and returned in the [`ToolOutput`].
    #[default]
    Capture,
    /// Written to the given file, which is created or truncated.
    File(PathBuf),
}

impl Redirect {
    fn to_stdio(&self) -> Result<Stdio> {
        let stdio = match self {
            Redirect::Capture => Stdio::piped(),
            Redirect::File(path) => Stdio::from(
                File::create(path)
                    .with_context(|| format!("Error creating output: {}", path.display()))?,
            ),
        };
        Ok(stdio)
    }
}

/// The result of a successful [`ToolCommand::run`].
#[derive(Debug)]
pub struct ToolOutput {
    pub status: ExitStatus,
    /// Empty unless standard output was [`Redirect::Capture`]d.
    pub stdout: Vec<u8>,
    /// Empty unless standard error was [`Redirect::Capture`]d.
    pub stderr: Vec<u8>,
}

/// A single invocation of an external tool.
#[derive(Clone, Debug)]
pub struct ToolCommand {
    tool: Tool,
    args: Vec<OsString>,
    stdout: Redirect,
    stderr: Redirect,
    expected_status: i32,
}

impl ToolCommand {
    pub fn new(tool: &Tool) -> Self {
        Self {
            tool: tool.clone(),
            args: Vec::new(),
            stdout: Redirect::default(),
            stderr: Redirect::default(),
            expected_status: 0,
        }
    }

    #[must_use]
    pub fn arg<S: AsRef<OsStr>>(mut self, arg: S) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    #[must_use]
    pub fn stdout(mut self, redirect: Redirect) -> Self {
        self.stdout = redirect;
        self
    }

    #[must_use]
    pub fn stderr(mut self, redirect: Redirect) -> Self {
        self.stderr = redirect;
        self
    }

    /// Sets the exit code that indicates success (zero by default).
    #[must_use]
    pub fn expect_status(mut self, code: i32) -> Self {
        self.expected_status = code;
        self
    }

    /// Renders the command the way it would be typed in a shell, including file redirects.
    pub fn command_line(&self) -> String {
        let mut line = std::iter::once(self.tool.to_string())
            .chain(self.args.iter().map(|a| quote(a)))
            .join(" ");
        if let Redirect::File(path) = &self.stdout {
            line.push_str(" > ");
            line.push_str(&quote(path.as_os_str()));
        }
        if let Redirect::File(path) = &self.stderr {
            line.push_str(" 2> ");
            line.push_str(&quote(path.as_os_str()));
        }
        line
    }

    /// Runs the command to completion.  Fails if the program cannot be started or if it exits
    /// with anything other than the expected status.
    pub fn run(&self) -> Result<ToolOutput> {
        let command_line = self.command_line();
        debug!("Executing: {command_line}");

        let output = Command::new(&self.tool.program)
            .args(&self.tool.leading_args)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(self.stdout.to_stdio()?)
            .stderr(self.stderr.to_stdio()?)
            .output()
            .with_context(|| {
                format!(
                    "Failed to execute '{}'; is it installed and on the PATH?",
                    self.tool.program.display()
                )
            })?;

        match output.status.code() {
            Some(code) if code == self.expected_status => Ok(ToolOutput {
                status: output.status,
                stdout: output.stdout,
                stderr: output.stderr,
            }),
            code => {
                let status = code.map_or_else(
                    || "was terminated by a signal".to_string(),
                    |code| format!("exited with status {code}"),
                );
                let tail = stderr_tail(&output.stderr, STDERR_TAIL_LINES);
                if tail.is_empty() {
                    bail!(
                        "Command {status} (expected {}): {command_line}",
                        self.expected_status
                    );
                }
                bail!(
                    "Command {status} (expected {}): {command_line}\n{tail}",
                    self.expected_status
                )
            }
        }
    }
}

/// The last `n` non-empty lines of captured output.
fn stderr_tail(stderr: &[u8], n: usize) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines = text.lines().filter(|l| !l.trim().is_empty()).collect_vec();
    lines[lines.len().saturating_sub(n)..].join("\n")
}

/// Single-quotes an argument if it would otherwise be split or interpreted by a POSIX shell.
fn quote(arg: &OsStr) -> String {
    let arg = arg.to_string_lossy();
    let is_plain = !arg.is_empty()
        && arg.chars().all(|c| c.is_ascii_alphanumeric() || "-_./=:,+@%".contains(c));
    if is_plain {
        arg.into_owned()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

#[cfg(test)]
pub mod tests {
    use super::{quote, stderr_tail, Redirect, Tool, ToolCommand};
    use rstest::rstest;
    use std::{ffi::OsStr, fs};
    use tempfile::tempdir;

    fn sh(script: &str) -> ToolCommand {
        ToolCommand::new(&Tool::new("sh")).arg("-c").arg(script)
    }

    #[rstest]
    #[case("samtools", "samtools")]
    #[case("/opt/bin/gmap", "/opt/bin/gmap")]
    #[case("-K", "-K")]
    #[case("has space", "'has space'")]
    #[case("it's", r"'it'\''s'")]
    #[case("a>b", "'a>b'")]
    #[case("", "''")]
    fn test_quote(#[case] arg: &str, #[case] expected: &str) {
        assert_eq!(quote(OsStr::new(arg)), expected);
    }

    #[test]
    fn test_command_line_with_redirects() {
        let tool = Tool::new("python3").with_args(["cleanAlignments.py"]);
        let cmd = ToolCommand::new(&tool)
            .args(["-e", "0.100000"])
            .arg("my reads.fa")
            .stdout(Redirect::File("out.sam".into()))
            .stderr(Redirect::File("out.log".into()));
        assert_eq!(
            cmd.command_line(),
            "python3 cleanAlignments.py -e 0.100000 'my reads.fa' > out.sam 2> out.log"
        );
    }

    #[test]
    fn test_run_captures_output() {
        let output = sh("echo hello; echo oops >&2").run().unwrap();
        assert!(output.status.success());
        assert_eq!(String::from_utf8_lossy(&output.stdout), "hello\n");
        assert_eq!(String::from_utf8_lossy(&output.stderr), "oops\n");
    }

    #[test]
    fn test_run_redirects_to_files() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("out.txt");
        let err = dir.path().join("err.txt");
        let output = sh("echo to-out; echo to-err >&2")
            .stdout(Redirect::File(out.clone()))
            .stderr(Redirect::File(err.clone()))
            .run()
            .unwrap();
        assert!(output.stdout.is_empty());
        assert!(output.stderr.is_empty());
        assert_eq!(fs::read_to_string(out).unwrap(), "to-out\n");
        assert_eq!(fs::read_to_string(err).unwrap(), "to-err\n");
    }

    #[test]
    fn test_run_fails_on_unexpected_status() {
        let err = sh("echo first >&2; echo 'bad index' >&2; exit 3").run().unwrap_err();
        let msg = format!("{err:#}");
        assert!(msg.contains("exited with status 3 (expected 0)"), "{msg}");
        assert!(msg.contains("bad index"), "{msg}");
    }

    #[test]
    fn test_run_with_non_zero_expected_status() {
        assert!(sh("exit 2").expect_status(2).run().is_ok());
        assert!(sh("exit 0").expect_status(2).run().is_err());
    }

    #[test]
    fn test_run_missing_program() {
        let tool = Tool::new("/definitely/not/a/real/program");
        let err = ToolCommand::new(&tool).run().unwrap_err();
        assert!(format!("{err:#}").contains("is it installed and on the PATH?"));
    }

    #[test]
    fn test_stderr_tail() {
        let stderr = b"one\n\ntwo\nthree\n";
        assert_eq!(stderr_tail(stderr, 2), "two\nthree");
        assert_eq!(stderr_tail(stderr, 10), "one\ntwo\nthree");
        assert_eq!(stderr_tail(b"", 10), "");
    }
}
