//! Fakes shared by the unit tests.

use crate::backup::command::{CommandOutput, CommandRunner};
use crate::backup::host::HostFilesystem;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::translate::PathTranslator;
use itertools::Itertools;
use std::cell::RefCell;
use std::collections::{HashSet, VecDeque};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Command runner that answers with queued outputs in FIFO order and records
/// every invocation.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    responses: RefCell<VecDeque<CommandOutput>>,
    invocations: RefCell<Vec<CommandInvocation>>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandInvocation {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub streaming: bool,
}

impl CommandInvocation {
    pub fn command_string(&self) -> String {
        std::iter::once(self.program.to_string_lossy().into_owned())
            .chain(self.args.iter().map(|a| a.to_string_lossy().into_owned()))
            .join(" ")
    }

    pub fn arg(&self, idx: usize) -> String {
        self.args[idx].to_string_lossy().into_owned()
    }
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn invocations(&self) -> Vec<CommandInvocation> {
        self.invocations.borrow().clone()
    }

    /// Invocations whose first argument starts with `prefix`.
    pub fn count_with_first_arg(&self, prefix: &str) -> usize {
        self.invocations
            .borrow()
            .iter()
            .filter(|i| i.args.first().is_some_and(|a| a.to_string_lossy().starts_with(prefix)))
            .count()
    }

    pub fn push_output(&self, code: Option<i32>, stdout: impl Into<String>, stderr: impl Into<String>) {
        self.responses.borrow_mut().push_back(CommandOutput {
            code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        });
    }

    pub fn push_success(&self) {
        self.push_output(Some(0), "", "");
    }

    pub fn push_stdout(&self, stdout: impl Into<String>) {
        self.push_output(Some(0), stdout, "");
    }

    pub fn push_failure(&self, code: i32) {
        self.push_output(Some(code), "", "simulated failure");
    }

    fn respond(&self, program: &Path, args: &[OsString], streaming: bool) -> Result<CommandOutput> {
        self.invocations.borrow_mut().push(CommandInvocation {
            program: program.to_path_buf(),
            args: args.to_vec(),
            streaming,
        });
        self.responses
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| Error::spawn(program, "no scripted response available"))
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, program: &Path, args: &[OsString]) -> Result<CommandOutput> {
        self.respond(program, args, false)
    }

    fn run_streaming(
        &self,
        program: &Path,
        args: &[OsString],
        _history: usize,
    ) -> Result<CommandOutput> {
        self.respond(program, args, true)
    }
}

/// vshadow style output announcing a created snapshot.
pub fn vshadow_create_output(guid: &str) -> String {
    format!(
        "VSHADOW.EXE 3.0 - Volume Shadow Copy sample client.\n\
         \n\
         * Creating shadow set {{6a2c27a3-49c0-4e1b-9d61-1f4c4b6d3e21}} ...\n\
         * SNAPSHOT ID = {guid} ...\n\
         - Shadow copy Set: {{6a2c27a3-49c0-4e1b-9d61-1f4c4b6d3e21}}\n\
         Snapshot creation done.\n"
    )
}

/// Host with an explicit set of directories and volumes.
#[derive(Debug, Default)]
pub struct FakeHost {
    dirs: HashSet<String>,
    mount_points: HashSet<String>,
}

impl FakeHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dir(mut self, path: &str) -> Self {
        self.dirs.insert(path.to_owned());
        self
    }

    pub fn with_mount_point(mut self, volume: &str) -> Self {
        self.mount_points.insert(volume.to_owned());
        self
    }
}

impl HostFilesystem for FakeHost {
    fn is_dir(&self, path: &str) -> bool {
        self.dirs.contains(path)
    }

    fn is_mount_point(&self, volume: &str) -> bool {
        self.mount_points.contains(volume)
    }
}

/// Returns paths unchanged.
#[derive(Debug, Default)]
pub struct IdentityTranslator;

impl PathTranslator for IdentityTranslator {
    fn translate(&self, native: &str) -> Result<String> {
        Ok(native.to_owned())
    }
}
