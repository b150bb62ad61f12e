//! Backup job definitions.
//!
//! A [`JobConfig`] is the job file as written by the user. [`JobSpec::build`]
//! validates it against the host and groups the sources by volume, which is the
//! unit the sync engine snapshots.

use crate::backup::drives::NetworkDriveRegistry;
use crate::backup::function_path;
use crate::backup::host::HostFilesystem;
use crate::backup::notifications::throttle::NotificationPolicy;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::{convert_error_vec, Result};
use crate::backup::result_error::AddFunctionName;
use crate::backup::strategy::SyncStrategy;
use crate::backup::volume::{split_volume, strip_trailing_separators};
use bon::Builder;
use function_name::named;
use getset::Getters;
use globset::Glob;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use std::collections::BTreeMap;
use std::path::Path;
use validator::Validate;

static DEFAULT_JOB_NAME: &str = "job";

/// A job file. Every field is optional here so that missing ones can be
/// reported by name when the job is built.
#[skip_serializing_none]
#[derive(Clone, Debug, Default, Serialize, Deserialize, Builder, Getters)]
#[serde(deny_unknown_fields)]
#[getset(get = "pub")]
pub struct JobConfig {
    #[builder(into)]
    name: Option<String>,
    #[builder(into)]
    target: Option<String>,
    sources: Option<Vec<SourceConfig>>,
    #[serde(default)]
    #[builder(default)]
    global_excludes: Vec<String>,
    #[serde(rename = "type")]
    #[builder(into)]
    job_type: Option<String>,
    failure_notification: Option<NotificationPolicy>,
}

/// A source as written in a job file, either a bare path or a path with its
/// own excludes.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum SourceConfig {
    Path(String),
    WithExcludes {
        path: String,
        #[serde(default)]
        excludes: Vec<String>,
    },
}

impl SourceConfig {
    pub fn path(&self) -> &str {
        match self {
            SourceConfig::Path(path) | SourceConfig::WithExcludes { path, .. } => path,
        }
    }

    pub fn excludes(&self) -> &[String] {
        match self {
            SourceConfig::Path(_) => &[],
            SourceConfig::WithExcludes { excludes, .. } => excludes,
        }
    }
}

impl JobConfig {
    /// Reads a JSON job file. The job is named after the file stem unless the
    /// file sets `name`.
    #[named]
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::config_parse(path, e.to_string()))
            .add_fn_name(function_path!())?;
        let mut config: JobConfig = serde_json::from_str(&text)
            .map_err(|e| Error::config_parse(path, e.to_string()))
            .add_fn_name(function_path!())?;
        if config.name.is_none() {
            config.name = path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned());
        }
        Ok(config)
    }

    pub fn job_name(&self) -> &str {
        self.name.as_deref().unwrap_or(DEFAULT_JOB_NAME)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Getters)]
#[getset(get = "pub")]
pub struct SourceEntry {
    /// Path below the volume root, starting with a separator.
    relative_path: String,
    excludes: Vec<String>,
}

impl SourceEntry {
    pub fn new<S: Into<String>>(relative_path: S, excludes: Vec<String>) -> Self {
        Self {
            relative_path: relative_path.into(),
            excludes,
        }
    }
}

/// A validated job, immutable once built.
#[derive(Clone, Debug, Getters)]
#[getset(get = "pub")]
pub struct JobSpec {
    name: String,
    /// Target with mapped network drives rewritten to their share path.
    target: String,
    strategy: SyncStrategy,
    global_excludes: Vec<String>,
    /// Sources keyed by volume, each group in job file order.
    sources_by_volume: BTreeMap<String, Vec<SourceEntry>>,
    notification: Option<NotificationPolicy>,
}

impl JobSpec {
    /// Validates `config` and groups its sources by volume.
    ///
    /// Sources on network volumes and sources that do not exist are skipped
    /// with a warning. A job left without sources is still valid.
    #[named]
    pub fn build<H: HostFilesystem>(
        config: &JobConfig,
        drives: &NetworkDriveRegistry,
        host: &H,
    ) -> Result<Self> {
        let name = config.job_name().to_owned();
        let raw_target = config
            .target
            .as_deref()
            .ok_or_else(|| Error::missing_field("target"))
            .add_fn_name(function_path!())?;
        let raw_sources = config
            .sources
            .as_ref()
            .ok_or_else(|| Error::missing_field("sources"))
            .add_fn_name(function_path!())?;
        let strategy: SyncStrategy = config
            .job_type
            .as_deref()
            .ok_or_else(|| Error::missing_field("type"))
            .add_fn_name(function_path!())?
            .parse::<SyncStrategy>()
            .add_fn_name(function_path!())?;

        let exclude_errors = std::iter::once(validate_excludes(
            "global_excludes",
            &config.global_excludes,
        ))
        .chain(raw_sources.iter().enumerate().map(|(idx, source)| {
            validate_excludes(&format!("sources[{idx}].excludes"), source.excludes())
        }))
        .filter_map(Result::err)
        .collect_vec();
        convert_error_vec(exclude_errors).add_fn_name(function_path!())?;
        if let Some(policy) = &config.failure_notification {
            policy
                .validate()
                .map_err(|e| Error::invalid_field("failure_notification", e.to_string()))
                .add_fn_name(function_path!())?;
        }

        let target = drives.resolve(strip_trailing_separators(raw_target));
        if !host.is_dir(&target) {
            return Err(Error::target_not_found(target).add_fn_name(function_path!()));
        }

        let sources_by_volume = group_sources(raw_sources, drives, host);
        for volume in sources_by_volume.keys() {
            if !host.is_mount_point(volume) {
                return Err(Error::from(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("volume {volume} is not a local mount point"),
                ))
                .add_fn_name(function_path!()));
            }
        }

        if sources_by_volume.is_empty() {
            tracing::warn!("Job {name:?} has no usable sources, nothing will be copied");
        }

        Ok(Self {
            name,
            target,
            strategy,
            global_excludes: config.global_excludes.clone(),
            sources_by_volume,
            notification: config.failure_notification.clone(),
        })
    }

    pub fn source_count(&self) -> usize {
        self.sources_by_volume.values().map(Vec::len).sum()
    }
}

fn group_sources<H: HostFilesystem>(
    sources: &[SourceConfig],
    drives: &NetworkDriveRegistry,
    host: &H,
) -> BTreeMap<String, Vec<SourceEntry>> {
    let mut grouped: BTreeMap<String, Vec<SourceEntry>> = BTreeMap::new();
    for source in sources {
        let path = strip_trailing_separators(source.path());
        if path.len() != source.path().len() {
            tracing::debug!("Removed trailing separator from source {:?}", source.path());
        }

        let Some((volume, relative_path)) = split_volume(path) else {
            tracing::warn!("Skipping source {path:?}, it is not an absolute volume path");
            continue;
        };
        if drives.is_network_volume(&volume) {
            tracing::warn!("Skipping source {path:?}, {volume} is a network drive and cannot be snapshotted");
            continue;
        }
        if !host.is_dir(path) {
            tracing::warn!("Skipping source {path:?}, it is not a directory");
            continue;
        }

        grouped
            .entry(volume)
            .or_default()
            .push(SourceEntry::new(relative_path, source.excludes().to_vec()));
    }
    grouped
}

fn validate_excludes(field: &str, patterns: &[String]) -> Result<()> {
    patterns.iter().try_for_each(|pattern| {
        Glob::new(pattern)
            .map(|_| ())
            .map_err(|e| Error::invalid_field(field, format!("{pattern:?}: {e}")))
    })
}
