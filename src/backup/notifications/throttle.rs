//! Gate limiting how often a failing job sends its alert.
//!
//! The baseline is the modification time of a per-job marker file touched
//! after every successful run.

use crate::backup::function_path;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::{AddFunctionName, AddMsg};
use bon::Builder;
use chrono::{DateTime, Utc};
use function_name::named;
use getset::Getters;
use lettre::message::Mailbox;
use sanitize_filename::sanitize;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use std::fs::File;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use validator::Validate;

static MARKER_EXT: &str = "last-success";

/// Per-job failure notification settings.
#[skip_serializing_none]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Validate, Builder, Getters)]
#[serde(deny_unknown_fields)]
#[getset(get = "pub")]
pub struct NotificationPolicy {
    #[serde(rename = "e-mail")]
    #[builder(into)]
    email: Mailbox,
    /// Alert on every failure regardless of the last success.
    #[serde(default)]
    #[builder(default)]
    always: bool,
    /// Alert only once the last success is older than this many hours.
    #[validate(range(min = 0.0))]
    hours_since_success: Option<f64>,
}

/// Whether a failure at `now` should raise an alert under `policy`.
///
/// Without a recorded success there is nothing to throttle against and no
/// alert is sent, unless `always` is set.
pub fn should_notify(
    policy: &NotificationPolicy,
    last_success: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> bool {
    if policy.always {
        return true;
    }

    let Some(last_success) = last_success else {
        tracing::info!("No previous success recorded, not sending failure notification");
        return false;
    };

    let Some(threshold) = policy.hours_since_success else {
        return true;
    };

    let elapsed_hours = (now - last_success).num_milliseconds() as f64 / 3_600_000.0;
    if elapsed_hours > threshold {
        true
    } else {
        tracing::info!(
            "Last success was {elapsed_hours:.2} hours ago, within {threshold} hours, \
             not sending failure notification"
        );
        false
    }
}

/// Records a successful run of a job. Only jobs with a failure policy keep a
/// marker, since nothing else ever reads it.
pub fn record_job_success(
    policy: Option<&NotificationPolicy>,
    marker: &SuccessMarker,
    now: DateTime<Utc>,
) -> Result<()> {
    match policy {
        Some(_) => marker.record_success(now),
        None => Ok(()),
    }
}

/// Recipient of the alert for a job failing at `now`, if one is due.
///
/// An unreadable marker is logged and treated as no recorded success.
pub fn failure_recipient<'p>(
    policy: Option<&'p NotificationPolicy>,
    marker: &SuccessMarker,
    now: DateTime<Utc>,
) -> Option<&'p Mailbox> {
    let policy = policy?;
    let last_success = marker.last_success().unwrap_or_else(|e| {
        tracing::warn!("{e}");
        None
    });
    should_notify(policy, last_success, now).then_some(&policy.email)
}

/// Zero-length file whose modification time records a job's last success.
#[derive(Clone, Debug, PartialEq, Eq, Getters)]
#[getset(get = "pub")]
pub struct SuccessMarker {
    path: PathBuf,
}

impl SuccessMarker {
    pub fn for_job<P: AsRef<Path>>(marker_dir: P, job_name: &str) -> Self {
        Self {
            path: marker_dir
                .as_ref()
                .join(format!("{}.{MARKER_EXT}", sanitize(job_name))),
        }
    }

    #[named]
    pub fn last_success(&self) -> Result<Option<DateTime<Utc>>> {
        match std::fs::metadata(&self.path).and_then(|md| md.modified()) {
            Ok(modified) => Ok(Some(DateTime::<Utc>::from(modified))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::from(e)
                .add_msg(format!("Failed to read success marker {:?}", self.path))
                .add_fn_name(function_path!())),
        }
    }

    #[named]
    pub fn record_success(&self, now: DateTime<Utc>) -> Result<()> {
        File::create(&self.path)
            .and_then(|file| file.set_modified(SystemTime::from(now)))
            .map_err(Error::from)
            .add_msg(format!("Failed to write success marker {:?}", self.path))
            .add_fn_name(function_path!())?;
        tracing::debug!("Recorded success at {now} in {:?}", self.path);
        Ok(())
    }
}
