//! Mapped network drives of the current session.
//!
//! Populated once at startup and read-only afterwards. A snapshot cannot be
//! taken of a remote volume, and the sync tool cannot see drive mappings, so
//! targets on a mapped drive are rewritten to their share path.

use crate::backup::command::CommandRunner;
use crate::backup::function_path;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::{AddFunctionName, AddMsg};
use crate::backup::volume::{is_unc_volume, split_volume};
use function_name::named;
use regex::Regex;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::OnceLock;

static NET_USE_LINE: OnceLock<Regex> = OnceLock::new();

fn net_use_line() -> &'static Regex {
    NET_USE_LINE.get_or_init(|| {
        Regex::new(r"(?m)^\S*[ \t]+([A-Za-z]:)[ \t]+(\\\\\S+)").expect("net use pattern is valid")
    })
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NetworkDriveRegistry {
    drives: BTreeMap<String, String>,
}

impl NetworkDriveRegistry {
    pub fn new<I, K, V>(drives: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        Self {
            drives: drives
                .into_iter()
                .map(|(k, v)| (k.as_ref().to_ascii_uppercase(), v.into()))
                .collect(),
        }
    }

    /// Queries the mapped drives with `net use`. Outside Windows there are none.
    #[named]
    pub fn enumerate<R: CommandRunner>(runner: &R) -> Result<Self> {
        if !cfg!(windows) {
            return Ok(Self::default());
        }

        let output = runner
            .run(Path::new("net"), &["use".into()])
            .add_msg("Enumerating network drives failed")
            .add_fn_name(function_path!())?;
        if !output.is_success() {
            tracing::warn!(
                "net use exited with {:?}, assuming no network drives: {}",
                output.code,
                output.stderr.trim()
            );
            return Ok(Self::default());
        }
        let registry = Self::from_net_use_output(&output.stdout);
        registry
            .drives
            .iter()
            .for_each(|(drive, share)| tracing::info!("Network drive {drive} -> {share}"));
        Ok(registry)
    }

    pub fn from_net_use_output(output: &str) -> Self {
        Self::new(
            net_use_line()
                .captures_iter(output)
                .map(|c| (c[1].to_owned(), c[2].to_owned())),
        )
    }

    pub fn share_for(&self, volume: &str) -> Option<&str> {
        self.drives
            .get(&volume.to_ascii_uppercase())
            .map(String::as_str)
    }

    /// True for mapped drives and for UNC share volumes.
    pub fn is_network_volume(&self, volume: &str) -> bool {
        is_unc_volume(volume) || self.share_for(volume).is_some()
    }

    /// Rewrites a path on a mapped drive to the equivalent share path.
    pub fn resolve(&self, path: &str) -> String {
        match split_volume(path) {
            Some((volume, rest)) => match self.share_for(&volume) {
                Some(share) => {
                    let resolved = format!("{share}{rest}");
                    tracing::debug!("Resolved {path:?} to {resolved:?}");
                    resolved
                }
                None => path.to_owned(),
            },
            None => path.to_owned(),
        }
    }

    pub fn len(&self) -> usize {
        self.drives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drives.is_empty()
    }
}
