//! Volume shadow copies through `vshadow`.
//!
//! A snapshot is only reachable through [`SnapshotManager::with_snapshot`],
//! which deletes it again on every exit path. Cleanup failures are never
//! swallowed: a snapshot left behind keeps consuming shadow storage on the host.

use crate::backup::command::CommandRunner;
use crate::backup::function_path;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::{convert_error_vec, Result};
use crate::backup::result_error::{AddFunctionName, AddMsg};
use crate::backup::volume::volume_letter;
use derive_more::Display;
use function_name::named;
use itertools::Itertools;
use regex::Regex;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

static SNAPSHOT_ID: OnceLock<Regex> = OnceLock::new();

fn snapshot_id_pattern() -> &'static Regex {
    SNAPSHOT_ID.get_or_init(|| {
        Regex::new(
            r"SNAPSHOT ID = (\{[0-9A-Fa-f]{8}-[0-9A-Fa-f]{4}-[0-9A-Fa-f]{4}-[0-9A-Fa-f]{4}-[0-9A-Fa-f]{12}\})",
        )
        .expect("snapshot id pattern is valid")
    })
}

/// Identifier assigned to a snapshot by the shadow copy service, braces included.
#[derive(Clone, Debug, Display, PartialEq, Eq)]
pub struct SnapshotId(String);

impl SnapshotId {
    pub fn parse(create_output: &str) -> Option<Self> {
        snapshot_id_pattern()
            .captures(create_output)
            .map(|c| Self(c[1].to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A created and mounted snapshot. Never leaves this module.
#[derive(Debug)]
struct SnapshotHandle {
    id: SnapshotId,
    mount_root: PathBuf,
    mount_dir: PathBuf,
}

/// Releases the held snapshot when dropped, so an unwinding body does not
/// leave it behind. [`SnapshotGuard::release`] disarms it and reports errors.
struct SnapshotGuard<'m, 'a, R: CommandRunner> {
    manager: &'m SnapshotManager<'a, R>,
    handle: Option<SnapshotHandle>,
}

impl<R: CommandRunner> SnapshotGuard<'_, '_, R> {
    fn release(mut self) -> Result<()> {
        match self.handle.take() {
            Some(handle) => self.manager.release(handle),
            None => Ok(()),
        }
    }
}

impl<R: CommandRunner> Drop for SnapshotGuard<'_, '_, R> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            let id = handle.id.clone();
            if let Err(e) = self.manager.release(handle) {
                tracing::error!("Releasing snapshot {id} after an aborted run failed: {e}");
            }
        }
    }
}

#[derive(Debug)]
pub struct SnapshotManager<'a, R: CommandRunner> {
    vshadow_bin: PathBuf,
    runner: &'a R,
}

impl<'a, R: CommandRunner> SnapshotManager<'a, R> {
    pub fn new<P: Into<PathBuf>>(vshadow_bin: P, runner: &'a R) -> Self {
        Self {
            vshadow_bin: vshadow_bin.into(),
            runner,
        }
    }

    /// Snapshots `volume`, exposes it and runs `body` with the mount root.
    ///
    /// The volume's contents appear under `<mount root>/<drive letter>`. The
    /// snapshot is deleted and the mount directories removed once `body`
    /// returns, whatever it returns, and also when it panics. A cleanup failure
    /// is reported even when `body` succeeded; when both fail, the cleanup
    /// error comes first.
    #[named]
    pub fn with_snapshot<T, F>(&self, volume: &str, body: F) -> Result<T>
    where
        F: FnOnce(&Path) -> Result<T>,
    {
        let handle = self.acquire(volume).add_fn_name(function_path!())?;
        tracing::info!(
            "Snapshot {} of {volume} mounted at {:?}",
            handle.id,
            handle.mount_dir
        );

        let mount_root = handle.mount_root.clone();
        let guard = SnapshotGuard {
            manager: self,
            handle: Some(handle),
        };
        let body_res = body(&mount_root);
        let release_res = guard.release().add_fn_name(function_path!());

        match (body_res, release_res) {
            (Ok(value), Ok(())) => Ok(value),
            (Err(body_err), Ok(())) => Err(body_err),
            (Ok(_), Err(release_err)) => Err(release_err),
            (Err(body_err), Err(release_err)) => {
                tracing::error!("Snapshot cleanup failed: {release_err}");
                tracing::error!("Work on snapshot of {volume} failed before cleanup: {body_err}");
                Err(release_err.chain(body_err))
            }
        }
    }

    fn acquire(&self, volume: &str) -> Result<SnapshotHandle> {
        let id = self.create(volume)?;
        match self.mount(&id, volume) {
            Ok(handle) => Ok(handle),
            Err(mount_err) => {
                if let Err(delete_err) = self.delete(&id) {
                    tracing::error!(
                        "Deleting snapshot {id} after failed mount also failed: {delete_err}"
                    );
                }
                Err(mount_err)
            }
        }
    }

    #[named]
    fn create(&self, volume: &str) -> Result<SnapshotId> {
        tracing::info!("Creating snapshot of {volume}");
        let output = self
            .runner
            .run(&self.vshadow_bin, &["-p".into(), "-nw".into(), volume.into()])
            .add_fn_name(function_path!())?;
        if !output.is_success() {
            return Err(Error::snapshot_creation(
                volume,
                format!("exit code {:?}: {}", output.code, output.stderr.trim()),
            )
            .add_fn_name(function_path!()));
        }

        SnapshotId::parse(&output.stdout).ok_or_else(|| {
            Error::snapshot_creation(volume, "no snapshot id in vshadow output")
                .add_fn_name(function_path!())
        })
    }

    #[named]
    fn mount(&self, id: &SnapshotId, volume: &str) -> Result<SnapshotHandle> {
        let letter = volume_letter(volume).ok_or_else(|| {
            Error::snapshot_mount(id.as_str(), PathBuf::new(), None, format!("{volume} has no drive letter"))
                .add_fn_name(function_path!())
        })?;

        // Kept on drop: a recursive delete must never run over a live mount.
        let mount_root = tempfile::Builder::new()
            .prefix("josync-")
            .disable_cleanup(true)
            .tempdir()
            .map_err(Error::from)
            .add_msg("Creating snapshot mount directory failed")
            .add_fn_name(function_path!())?
            .path()
            .to_path_buf();
        let mount_dir = mount_root.join(letter.to_string());

        let exposed = std::fs::create_dir(&mount_dir)
            .map_err(Error::from)
            .and_then(|_| {
                let mut arg = OsString::from(format!("-el={id},"));
                arg.push(&mount_dir);
                self.runner.run(&self.vshadow_bin, &[arg])
            })
            .and_then(|output| {
                if output.is_success() {
                    Ok(())
                } else {
                    Err(Error::snapshot_mount(
                        id.as_str(),
                        mount_dir.as_path(),
                        output.code,
                        output.stderr.trim(),
                    ))
                }
            });

        match exposed {
            Ok(()) => Ok(SnapshotHandle {
                id: id.clone(),
                mount_root,
                mount_dir,
            }),
            Err(e) => {
                let _ = std::fs::remove_dir(&mount_dir);
                let _ = std::fs::remove_dir(&mount_root);
                Err(e.add_fn_name(function_path!()))
            }
        }
    }

    #[named]
    fn delete(&self, id: &SnapshotId) -> Result<()> {
        let output = self
            .runner
            .run(&self.vshadow_bin, &[format!("-ds={id}").into()])
            .add_fn_name(function_path!())?;
        if output.is_success() {
            tracing::info!("Deleted snapshot {id}");
            Ok(())
        } else {
            Err(
                Error::snapshot_deletion(id.as_str(), output.code, output.stderr.trim())
                    .add_fn_name(function_path!()),
            )
        }
    }

    /// Deletes the snapshot, then removes both mount directories. The
    /// removals are attempted even when the deletion failed; the deletion
    /// error is the one returned in that case.
    #[named]
    fn release(&self, handle: SnapshotHandle) -> Result<()> {
        let delete_res = self.delete(&handle.id);

        // remove_dir never recurses, a still exposed snapshot stays untouched
        let removal_res = convert_error_vec(
            [&handle.mount_dir, &handle.mount_root]
                .into_iter()
                .filter_map(|dir| {
                    std::fs::remove_dir(dir)
                        .map_err(Error::from)
                        .add_msg(format!("Removing mount directory {dir:?} failed"))
                        .err()
                })
                .collect_vec(),
        )
        .add_fn_name(function_path!());

        match (delete_res, removal_res) {
            (Ok(()), removal_res) => removal_res,
            (Err(delete_err), Ok(())) => Err(delete_err),
            (Err(delete_err), Err(removal_err)) => {
                tracing::error!(
                    "Snapshot {} may still be exposed under {:?}: {removal_err}",
                    handle.id,
                    handle.mount_root
                );
                Err(delete_err)
            }
        }
    }
}
