use crate::backup::command::CommandRunner;
use crate::backup::function_path;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::AddFunctionName;
use function_name::named;
use std::path::{Path, PathBuf};

/// Converts native paths into the syntax understood by the sync tool.
pub trait PathTranslator {
    fn translate(&self, native: &str) -> Result<String>;
}

/// Translates Windows paths to cygwin paths with `cygpath`.
#[derive(Debug)]
pub struct CygpathTranslator<'a, R: CommandRunner> {
    cygpath_bin: PathBuf,
    runner: &'a R,
}

impl<'a, R: CommandRunner> CygpathTranslator<'a, R> {
    pub fn new<P: Into<PathBuf>>(cygpath_bin: P, runner: &'a R) -> Self {
        Self {
            cygpath_bin: cygpath_bin.into(),
            runner,
        }
    }

    pub fn cygpath_bin(&self) -> &Path {
        &self.cygpath_bin
    }
}

impl<R: CommandRunner> PathTranslator for CygpathTranslator<'_, R> {
    #[named]
    fn translate(&self, native: &str) -> Result<String> {
        let output = self
            .runner
            .run(&self.cygpath_bin, &[native.into()])
            .add_fn_name(function_path!())?;
        if !output.is_success() {
            return Err(Error::path_translation(
                native,
                format!("cygpath exited with {:?}: {}", output.code, output.stderr.trim()),
            )
            .add_fn_name(function_path!()));
        }

        let translated = output.stdout.trim();
        if translated.is_empty() {
            return Err(Error::path_translation(native, "cygpath returned no path")
                .add_fn_name(function_path!()));
        }
        tracing::trace!("Translated {native:?} to {translated:?}");
        Ok(translated.to_owned())
    }
}
