//! # josync
//!
//! A backup runner that mirrors or merges local directory trees into a target
//! directory with `rsync`, reading every source from a volume shadow copy so
//! files held open by other programs are still copied consistently.
//!
//! ## Features
//!
//! - **Snapshots**: each source volume is snapshotted, mounted read-only and
//!   torn down again, even when the copy fails
//! - **Sync strategies**: deletion-aware mirror or additive merge
//! - **Network drives**: mapped drive targets are rewritten to their share path,
//!   mapped drive sources are skipped
//! - **Statistics**: transfer totals summed across every rsync invocation of a job
//! - **Failure e-mails**: throttled by the age of the last successful run
//!
//! ## Quick Start
//!
//! ```no_run
//! use josync::backup::app_config::AppConfig;
//! use josync::backup::command::ProcessCommandRunner;
//! use josync::backup::drives::NetworkDriveRegistry;
//! use josync::backup::host::LocalFilesystem;
//! use josync::backup::job::{JobConfig, JobSpec};
//! use josync::backup::sync::SyncEngine;
//! use josync::backup::translate::CygpathTranslator;
//!
//! let config = AppConfig::load("default.josync-config", Some("user.josync-config"))?;
//! let runner = ProcessCommandRunner;
//! let drives = NetworkDriveRegistry::enumerate(&runner)?;
//!
//! let job_config = JobConfig::from_file("documents.josync-job")?;
//! let job = JobSpec::build(&job_config, &drives, &LocalFilesystem)?;
//!
//! let translator = CygpathTranslator::new(config.cygpath_bin(), &runner);
//! let stats = SyncEngine::new(&config, &runner, &translator).run(&job)?;
//! println!("{stats}");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod backup;
