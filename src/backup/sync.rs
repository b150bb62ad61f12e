//! Runs `rsync` for every source of a job, one snapshot per volume.

use crate::backup::app_config::AppConfig;
use crate::backup::command::CommandRunner;
use crate::backup::function_path;
use crate::backup::job::{JobSpec, SourceEntry};
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::{AddFunctionName, AddMsg};
use crate::backup::snapshot::SnapshotManager;
use crate::backup::stats::RunStatistics;
use crate::backup::translate::PathTranslator;
use crate::backup::volume::volume_letter;
use function_name::named;
use std::ffi::OsString;
use std::path::{Path, PathBuf, MAIN_SEPARATOR};

/// Options passed to every `rsync` invocation.
static BASE_OPTIONS: [&str; 4] = ["-a", "-z", "--chmod=ug=rwx,o=rx", "--stats"];

fn exclude_option(pattern: &str) -> OsString {
    format!("--exclude={pattern}").into()
}

pub struct SyncEngine<'a, R: CommandRunner, T: PathTranslator> {
    rsync_bin: PathBuf,
    output_history_lines: usize,
    snapshots: SnapshotManager<'a, R>,
    runner: &'a R,
    translator: &'a T,
}

impl<'a, R: CommandRunner, T: PathTranslator> SyncEngine<'a, R, T> {
    pub fn new(config: &AppConfig, runner: &'a R, translator: &'a T) -> Self {
        Self {
            rsync_bin: config.rsync_bin(),
            output_history_lines: *config.output_history_lines(),
            snapshots: SnapshotManager::new(config.vshadow_bin(), runner),
            runner,
            translator,
        }
    }

    /// Syncs every source of `job` and returns the summed statistics.
    ///
    /// The first failing `rsync` run stops the job. The snapshot it ran on is
    /// still released before this returns.
    #[named]
    pub fn run(&self, job: &JobSpec) -> Result<RunStatistics> {
        let mut stats = RunStatistics::new();
        if job.sources_by_volume().is_empty() {
            tracing::info!("Job {:?} has no sources to sync", job.name());
            return Ok(stats);
        }

        let options = self.job_options(job);
        let target = self
            .translator
            .translate(job.target())
            .add_msg(format!("Translating target of job {:?} failed", job.name()))
            .add_fn_name(function_path!())?;

        for (volume, entries) in job.sources_by_volume() {
            self.snapshots
                .with_snapshot(volume, |mount_root| {
                    self.sync_volume(job, volume, entries, mount_root, &options, &target, &mut stats)
                })
                .add_fn_name(function_path!())?;
        }

        tracing::info!("Job {:?} finished, {stats}", job.name());
        Ok(stats)
    }

    fn job_options(&self, job: &JobSpec) -> Vec<OsString> {
        BASE_OPTIONS
            .iter()
            .map(OsString::from)
            .chain(job.strategy().extra_options())
            .chain(job.global_excludes().iter().map(|p| exclude_option(p)))
            .collect()
    }

    #[allow(clippy::too_many_arguments)]
    #[named]
    fn sync_volume(
        &self,
        job: &JobSpec,
        volume: &str,
        entries: &[SourceEntry],
        mount_root: &Path,
        options: &[OsString],
        target: &str,
        stats: &mut RunStatistics,
    ) -> Result<()> {
        let letter = volume_letter(volume).ok_or_else(|| {
            Error::invalid_field("sources", format!("volume {volume} has no drive letter"))
                .add_fn_name(function_path!())
        })?;
        let native_root = mount_root.to_string_lossy();
        let root = self
            .translator
            .translate(&native_root)
            .add_fn_name(function_path!())?;
        let strategy = job.strategy();

        for entry in entries {
            let native_source = format!(
                "{native_root}{MAIN_SEPARATOR}{letter}{}",
                entry.relative_path()
            );
            let source = self
                .translator
                .translate(&native_source)
                .and_then(|translated| strategy.prepare_source(&root, &translated))
                .add_fn_name(function_path!())?;

            let mut args = options.to_vec();
            args.extend(entry.excludes().iter().map(|p| exclude_option(p)));
            args.push(source.into());
            args.push(strategy.prepare_target(target).into());

            tracing::info!(
                "Syncing {volume}{} to {:?}",
                entry.relative_path(),
                job.target()
            );
            let output = self
                .runner
                .run_streaming(&self.rsync_bin, &args, self.output_history_lines)
                .add_fn_name(function_path!())?;
            if !output.is_success() {
                return Err(Error::sync_tool_exit(
                    output.code,
                    format!("{volume}{}", entry.relative_path()),
                )
                .add_fn_name(function_path!()));
            }
            stats.accumulate_report(&output.stdout);
        }
        Ok(())
    }
}
