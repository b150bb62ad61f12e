use chrono::Utc;
use clap::{Parser, Subcommand};
use josync::backup::app_config::AppConfig;
use josync::backup::command::ProcessCommandRunner;
use josync::backup::drives::NetworkDriveRegistry;
use josync::backup::host::LocalFilesystem;
use josync::backup::job::{JobConfig, JobSpec};
use josync::backup::notifications::throttle::{
    failure_recipient, record_job_success, SuccessMarker,
};
use josync::backup::notifications::Notification;
use josync::backup::result_error::error::Error;
use josync::backup::sync::SyncEngine;
use josync::backup::translate::{CygpathTranslator, PathTranslator};
use lettre::message::Mailbox;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Snapshot based rsync backups of local directories
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Location of the default config file
    #[arg(short, long)]
    config: PathBuf,
    /// Location of a user config file overriding the default one
    #[arg(short, long)]
    user_config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run backup jobs one after another
    Run {
        /// Job files (JSON)
        #[arg(required = true)]
        jobs: Vec<PathBuf>,
    },
    /// Send a test e-mail with the configured notification settings
    TestEmail { address: Mailbox },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let args = Args::parse();

    let config = match AppConfig::load(&args.config, args.user_config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("{}: {e}", e.category().describe());
            return ExitCode::FAILURE;
        }
    };

    match args.command {
        Commands::Run { jobs } => run_jobs(&config, &jobs),
        Commands::TestEmail { address } => test_email(&config, &address),
    }
}

fn run_jobs(config: &AppConfig, job_files: &[PathBuf]) -> ExitCode {
    let runner = ProcessCommandRunner;
    let drives = match NetworkDriveRegistry::enumerate(&runner) {
        Ok(drives) => drives,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };
    let translator = CygpathTranslator::new(config.cygpath_bin(), &runner);
    let engine = SyncEngine::new(config, &runner, &translator);

    let failed = job_files
        .iter()
        .filter(|job_file| !run_job(config, &engine, &drives, job_file))
        .count();
    if failed == 0 {
        ExitCode::SUCCESS
    } else {
        error!("{failed} of {} jobs failed", job_files.len());
        ExitCode::FAILURE
    }
}

fn run_job<T: PathTranslator>(
    config: &AppConfig,
    engine: &SyncEngine<ProcessCommandRunner, T>,
    drives: &NetworkDriveRegistry,
    job_file: &Path,
) -> bool {
    let job_config = match JobConfig::from_file(job_file) {
        Ok(job_config) => job_config,
        Err(e) => {
            error!("Job file {job_file:?} failed. {}:\n{e}", e.category().describe());
            return false;
        }
    };
    let name = job_config.job_name().to_owned();
    let marker = SuccessMarker::for_job(config.marker_dir(), &name);
    info!("Starting job {name:?} from {job_file:?}");

    match JobSpec::build(&job_config, drives, &LocalFilesystem).and_then(|job| engine.run(&job)) {
        Ok(stats) => {
            info!("Job {name:?} succeeded, {stats}");
            let policy = job_config.failure_notification().as_ref();
            if let Err(e) = record_job_success(policy, &marker, Utc::now()) {
                warn!("{e}");
            }
            true
        }
        Err(e) => {
            error!("Job {name:?} failed. {}:\n{e}", e.category().describe());
            let policy = job_config.failure_notification().as_ref();
            if let Some(recipient) = failure_recipient(policy, &marker, Utc::now()) {
                notify_failure(config, recipient, &name, &e);
            }
            false
        }
    }
}

fn notify_failure(config: &AppConfig, recipient: &Mailbox, name: &str, failure: &Error) {
    let Some(notification) = config.notification() else {
        warn!("Job {name:?} asks for failure e-mails but no notification is configured");
        return;
    };
    let topic = format!("Backup job {name:?} failed");
    let body = format!("{}.\n\n{failure}", failure.category().describe());
    match notification.send(recipient, topic, body) {
        Ok(()) => info!("Sent failure notification for job {name:?} to {recipient}"),
        Err(e) => error!("Sending failure notification for job {name:?} failed: {e}"),
    }
}

fn test_email(config: &AppConfig, address: &Mailbox) -> ExitCode {
    let Some(notification) = config.notification() else {
        error!("No notification is configured");
        return ExitCode::FAILURE;
    };
    match notification.send(
        address,
        "josync test e-mail",
        "Failure notifications from josync will be delivered like this one.",
    ) {
        Ok(()) => {
            info!("Test e-mail sent to {address}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
