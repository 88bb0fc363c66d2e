use std::fs;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::thread;

use anyhow::Context;
use clap::Parser;
use signal_hook::consts::{SIGINT, SIGTERM};

use treewatch::config::Settings;
use treewatch::watcher::{FsEvent, InotifyService, TreeWalker, WatchManager, WatchSyncer};
use treewatch::{log_event, logging};

#[derive(Parser)]
#[command(name = "treewatch")]
#[command(version)]
#[command(about = "Watch directory trees for structural changes through one notification channel")]
struct Cli {
    /// Directories to watch recursively
    #[arg(required = true, value_name = "DIR")]
    roots: Vec<PathBuf>,

    /// TOML configuration file (default: ./treewatch.toml when present)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override the configured maximum descent depth
    #[arg(long, value_name = "N")]
    max_depth: Option<usize>,
}

fn main() {
    let cli = Cli::parse();

    let mut settings = match Settings::load(cli.config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Error: failed to load configuration: {e}");
            process::exit(1);
        }
    };
    if let Some(depth) = cli.max_depth {
        settings.watcher.max_depth = depth;
    }

    logging::init_with_config(&settings.logging);

    if let Err(e) = run(&cli.roots, &settings) {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn run(roots: &[PathBuf], settings: &Settings) -> anyhow::Result<()> {
    let service = InotifyService::new()?;
    let mut manager = WatchManager::new(service);
    let walker = TreeWalker::new(settings.watcher.max_depth);

    // An unwatched requested root would silently drop a whole region of
    // intended coverage, so any root failure is fatal.
    let mut canonical_roots = Vec::with_capacity(roots.len());
    for root in roots {
        let canonical = fs::canonicalize(root)
            .with_context(|| format!("cannot resolve \"{}\"", root.display()))?;
        walker
            .walk(&mut manager, &canonical)
            .with_context(|| format!("could not monitor \"{}\"", root.display()))?;
        canonical_roots.push(canonical);
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    for signal in [SIGINT, SIGTERM] {
        // First signal requests a clean drain; a second one forces exit.
        signal_hook::flag::register_conditional_shutdown(signal, 1, Arc::clone(&shutdown))
            .context("cannot install signal handler")?;
        signal_hook::flag::register(signal, Arc::clone(&shutdown))
            .context("cannot install signal handler")?;
    }

    let (tx, rx) = crossbeam_channel::bounded(settings.watcher.event_channel_capacity);
    let printer = thread::spawn(move || {
        for event in rx {
            match event {
                FsEvent::Created(path) => log_event!("watch", "created", "{}", path.display()),
                FsEvent::Modified(path) => log_event!("watch", "modified", "{}", path.display()),
                FsEvent::Removed(path) => log_event!("watch", "removed", "{}", path.display()),
                FsEvent::Renamed { from, to } => {
                    log_event!("watch", "renamed", "{} -> {}", from.display(), to.display())
                }
                FsEvent::ResyncRequired => {
                    tracing::warn!("events were dropped; watch coverage was rebuilt from disk")
                }
            }
        }
    });

    let mut syncer = WatchSyncer::new(manager, walker, canonical_roots, tx);
    let result = syncer.run(&shutdown);
    syncer.shutdown();

    // The event sender is gone once the syncer is; the printer drains
    // whatever is still queued and exits.
    let _ = printer.join();

    result?;
    Ok(())
}
