use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::str::FromStr;

/// How a job lays the copied sources out under its target.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStrategy {
    /// Exact replica under `<target>/<drive letter>/<path>`, deleting whatever
    /// is gone from the source or excluded.
    Mirror,
    /// Copies the contents of every source straight into the target and never
    /// deletes.
    Additive,
}

impl FromStr for SyncStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "mirror" => Ok(SyncStrategy::Mirror),
            "additive" => Ok(SyncStrategy::Additive),
            other => Err(Error::invalid_field(
                "type",
                format!("unknown job type {other:?}, expected \"mirror\" or \"additive\""),
            )),
        }
    }
}

impl SyncStrategy {
    pub fn extra_options(&self) -> Vec<OsString> {
        match self {
            SyncStrategy::Mirror => ["--delete", "--delete-excluded", "--relative"]
                .map(OsString::from)
                .to_vec(),
            SyncStrategy::Additive => vec![],
        }
    }

    /// Shapes the translated source path.
    ///
    /// `mount_root` and `source` are both already translated, and `source`
    /// lies below `mount_root`. Mirror inserts rsync's `/./` start point right
    /// after the mount root so the drive letter directory is recreated under the
    /// target. Additive appends a separator so only the contents are copied.
    pub fn prepare_source(&self, mount_root: &str, source: &str) -> Result<String> {
        match self {
            SyncStrategy::Mirror => {
                let root = mount_root.trim_end_matches('/');
                let below_root = source
                    .strip_prefix(root)
                    .filter(|rest| rest.starts_with(['/', '\\']))
                    .ok_or_else(|| {
                        Error::path_translation(
                            source,
                            format!("not below snapshot mount root {mount_root:?}"),
                        )
                    })?;
                Ok(format!("{root}/.{below_root}"))
            }
            SyncStrategy::Additive => {
                if source.ends_with('/') {
                    Ok(source.to_owned())
                } else {
                    Ok(format!("{source}/"))
                }
            }
        }
    }

    pub fn prepare_target(&self, target: &str) -> String {
        target.to_owned()
    }
}
