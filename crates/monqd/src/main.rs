//! monqd - the status query daemon.
//!
//! Serves the line-oriented query protocol over a UNIX socket: tabular
//! live state, the monitoring history, and external-command submission.

mod commands;
mod config;
mod core;
mod input;
mod server;

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::Parser;
use tracing::{Level, error, info};
use tracing_subscriber::EnvFilter;

use monq_core::core::MonitoringCore;
use monq_core::counters::Counters;
use monq_core::store::Store;
use monq_core::trial;
use monq_core::triggers::{Trigger, Triggers};

use crate::config::Config;
use crate::core::EmbeddedCore;
use crate::server::Server;

/// Status query daemon.
#[derive(Parser)]
#[command(name = "monqd", about = "Status query daemon", version)]
struct Args {
    /// Module options as `key=value` pairs; a bare value sets the query
    /// socket path.
    #[arg(value_name = "OPTION")]
    options: Vec<String>,

    /// Increase logging verbosity (-v for debug, -vv for trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long)]
    quiet: bool,
}

fn log_level(args: &Args, config: &Config) -> Level {
    if args.quiet {
        Level::ERROR
    } else if args.verbose >= 2 {
        Level::TRACE
    } else if args.verbose == 1 || config.debug_level >= 2 {
        Level::DEBUG
    } else {
        Level::INFO
    }
}

fn epoch_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn main() {
    let args = Args::parse();
    let config = Config::parse_arguments(&args.options.join(" "));

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level(&args, &config).to_string()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        socket = %config.paths.query_socket.display(),
        "starting"
    );

    // a corrupt licensing state is fatal, an over-limit expired trial too
    let trial_manager = match startup_license_check(&config) {
        Ok(trial_manager) => trial_manager,
        Err(e) => {
            error!(error = %e, "license validation failed");
            std::process::exit(1);
        }
    };

    let core = Arc::new(EmbeddedCore::new(&config));
    let store = Arc::new(match trial_manager {
        Some(tm) => Store::new().with_trial_manager(tm),
        None => Store::new(),
    });
    let counters = Arc::new(Counters::new());
    let triggers = Arc::new(Triggers::new());
    let should_terminate = Arc::new(AtomicBool::new(false));

    {
        let should_terminate = Arc::clone(&should_terminate);
        let triggers = Arc::clone(&triggers);
        if let Err(e) = ctrlc::set_handler(move || {
            info!("received termination signal");
            should_terminate.store(true, Ordering::SeqCst);
            // wake all blocked waiters so they can observe the flag
            triggers.notify(Trigger::All);
        }) {
            error!(error = %e, "cannot install signal handler");
        }
    }

    spawn_rotation_watcher(
        Arc::clone(&core),
        Arc::clone(&triggers),
        Arc::clone(&should_terminate),
    );

    let server = Server {
        config,
        core,
        store,
        counters,
        triggers,
        should_terminate,
    };
    if let Err(e) = server.run() {
        error!(error = %e, "server failed");
        std::process::exit(1);
    }
    info!("shutdown complete");
}

/// Without an embedding core nothing signals history rotations, so watch
/// the file itself: an inode change means it was rotated away.
fn spawn_rotation_watcher(
    core: Arc<EmbeddedCore>,
    triggers: Arc<Triggers>,
    should_terminate: Arc<AtomicBool>,
) {
    use std::os::unix::fs::MetadataExt;
    let path = core.paths().history_file.clone();
    if path.as_os_str().is_empty() {
        return;
    }
    std::thread::spawn(move || {
        let inode_of = |path: &std::path::Path| std::fs::metadata(path).map(|m| m.ino()).ok();
        let mut last_inode = inode_of(&path);
        while !should_terminate.load(Ordering::Relaxed) {
            std::thread::sleep(std::time::Duration::from_secs(10));
            let inode = inode_of(&path);
            if inode != last_inode {
                info!(path = %path.display(), "history file was rotated");
                last_inode = inode;
                core.note_logfile_rotation();
                triggers.notify(Trigger::Log);
            }
        }
    });
}

/// Read the licensing state. Only configured paths are consulted, so a
/// bare development setup runs without any license files.
fn startup_license_check(config: &Config) -> Result<Option<trial::TrialManager>, trial::LicenseError> {
    let state_file = &config.paths.state_file_created_file;
    if state_file.as_os_str().is_empty() {
        return Ok(None);
    }
    let created = trial::state_file_created(state_file, epoch_now())?;
    let licensed = trial::is_licensed(&config.paths.licensed_state_file);
    let manager = trial::TrialManager::new(created, licensed);
    info!(state = manager.state(epoch_now()), "license state");
    Ok(Some(manager))
}
