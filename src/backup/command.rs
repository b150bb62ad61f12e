//! Execution of external tools.
//!
//! Every external program (snapshot tool, path translator, `rsync`, `net use`)
//! goes through [`CommandRunner`] so callers can be driven by a scripted fake.

use crate::backup::function_path;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::AddFunctionName;
use function_name::named;
use itertools::Itertools;
use std::collections::VecDeque;
use std::ffi::OsString;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread::JoinHandle;

/// Exit code and output of a finished process.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// `None` when the process was terminated by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn is_success(&self) -> bool {
        matches!(self.code, Some(0))
    }
}

pub trait CommandRunner {
    /// Runs `program` to completion and captures both output streams in full.
    fn run(&self, program: &Path, args: &[OsString]) -> Result<CommandOutput>;

    /// Runs a long-lived `program`, draining stdout and stderr while it runs.
    ///
    /// Only the last `history` stdout lines are returned. Stderr lines are
    /// logged as warnings and not returned.
    fn run_streaming(
        &self,
        program: &Path,
        args: &[OsString],
        history: usize,
    ) -> Result<CommandOutput>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ProcessCommandRunner;

impl CommandRunner for ProcessCommandRunner {
    #[named]
    fn run(&self, program: &Path, args: &[OsString]) -> Result<CommandOutput> {
        tracing::debug!("Running {}", command_line(program, args));
        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|e| Error::spawn(program, e.to_string()))
            .add_fn_name(function_path!())?;

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    #[named]
    fn run_streaming(
        &self,
        program: &Path,
        args: &[OsString],
        history: usize,
    ) -> Result<CommandOutput> {
        tracing::info!("Running {}", command_line(program, args));
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::spawn(program, e.to_string()))
            .add_fn_name(function_path!())?;

        let stdout_reader = child.stdout.take().map(|out| {
            spawn_reader(out, move |lines: &mut VecDeque<String>, line: String| {
                tracing::debug!("{line}");
                push_bounded(lines, line, history);
            })
        });
        let stderr_reader = child.stderr.take().map(|err| {
            spawn_reader(err, |_: &mut VecDeque<String>, line: String| {
                tracing::warn!("{line}");
            })
        });

        let status = child.wait();
        let stdout_lines = join_reader(stdout_reader);
        let stderr_lines = join_reader(stderr_reader);

        let status = status.map_err(Error::from).add_fn_name(function_path!())?;
        Ok(CommandOutput {
            code: status.code(),
            stdout: stdout_lines?.into_iter().join("\n"),
            stderr: stderr_lines?.into_iter().join("\n"),
        })
    }
}

fn spawn_reader<R, F>(stream: R, mut on_line: F) -> JoinHandle<std::io::Result<VecDeque<String>>>
where
    R: Read + Send + 'static,
    F: FnMut(&mut VecDeque<String>, String) + Send + 'static,
{
    std::thread::spawn(move || {
        let mut lines = VecDeque::new();
        for line in BufReader::new(stream).split(b'\n') {
            on_line(&mut lines, String::from_utf8_lossy(&line?).trim_end().to_owned());
        }
        Ok(lines)
    })
}

fn join_reader(
    reader: Option<JoinHandle<std::io::Result<VecDeque<String>>>>,
) -> Result<VecDeque<String>> {
    match reader {
        None => Ok(VecDeque::new()),
        Some(handle) => handle
            .join()
            .map_err(|_| Error::from(std::io::Error::other("output reader thread panicked")))?
            .map_err(Error::from),
    }
}

/// Appends `line`, evicting the oldest lines so at most `capacity` remain.
pub fn push_bounded(lines: &mut VecDeque<String>, line: String, capacity: usize) {
    if capacity == 0 {
        return;
    }
    while lines.len() >= capacity {
        lines.pop_front();
    }
    lines.push_back(line);
}

pub fn command_line(program: &Path, args: &[OsString]) -> String {
    std::iter::once(program.to_string_lossy())
        .chain(args.iter().map(|a| a.to_string_lossy()))
        .join(" ")
}
