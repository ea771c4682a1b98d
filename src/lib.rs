// src/lib.rs

pub mod bridge;
pub mod cli;
pub mod config;
pub mod constraints;
pub mod errors;
pub mod exec;
pub mod host;
pub mod logging;
pub mod manager;
pub mod presentation;
pub mod registry;
pub mod scheduler;
pub mod status;
pub mod types;

mod sync;

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::ConfigFile;
use crate::config::loader::load_and_validate;
use crate::exec::{DEFAULT_CHANNEL_CAPACITY, channel_executor};
use crate::host::ProcessHost;
use crate::manager::WorkManager;
use crate::presentation::NotificationAdapter;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - scheduler / dispatch bridge / work manager
/// - the executor process host (if `[executor]` is configured)
/// - worker registration and `--enqueue` items
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let cfg = load_and_validate(&args.config)?;

    if args.dry_run {
        print_dry_run(&cfg);
        return Ok(());
    }

    let capacity = cfg
        .executor
        .as_ref()
        .map(|executor| executor.channel_capacity)
        .unwrap_or(DEFAULT_CHANNEL_CAPACITY);
    let (executor, mut host) = channel_executor(capacity);

    let (manager, _scheduler) = WorkManager::local(
        Arc::new(executor.clone()),
        NotificationAdapter::default(),
        cfg.bridge_options(),
        cfg.scheduler,
        cfg.bridge.min_periodic_interval,
    );
    let manager = Arc::new(manager);

    // Ctrl-C → graceful shutdown.
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            eprintln!("failed to listen for Ctrl+C: {e}");
            return;
        }
        let _ = shutdown_tx.send(());
    });

    // Attach the executor before anything is scheduled so the first
    // dispatches are not bounced back as retries.
    let host_task = match cfg.executor.clone() {
        Some(section) => {
            let process = ProcessHost::new(section.cmd, Arc::clone(&manager));
            let task = tokio::spawn(async move { process.run(&mut host, shutdown_rx).await });
            if !executor.wait_attached().await {
                warn!("executor host stopped before attaching");
            }
            task
        }
        None => {
            warn!("no [executor] configured; work will stay queued until one attaches");
            tokio::spawn(async move {
                // Keep the host half alive so dispatch sends do not fail.
                let _host = host;
                let _ = shutdown_rx.await;
                info!("shutdown requested");
                Ok::<(), anyhow::Error>(())
            })
        }
    };

    for definition in cfg.worker.values() {
        if let Some(id) = manager.register_definition(definition.clone()).await? {
            info!(worker = %definition.name, attempt.id = %id, "periodic worker scheduled");
        }
    }

    for item in &args.enqueue {
        let id = manager.enqueue(&item.worker, item.payload.clone()).await?;
        println!("{} {id}", item.worker);
    }

    host_task.await??;

    debug!(in_flight = manager.bridge().in_flight(), "workbridge stopped");
    Ok(())
}

/// Simple dry-run output: print the bridge settings and the workers.
fn print_dry_run(cfg: &ConfigFile) {
    println!("workbridge dry-run");
    println!("  bridge.default_timeout = {:?}", cfg.bridge.default_timeout);
    println!(
        "  bridge.min_periodic_interval = {:?}",
        cfg.bridge.min_periodic_interval
    );
    println!(
        "  scheduler.backoff = {:?} (initial {:?}, max {:?})",
        cfg.scheduler.backoff.kind, cfg.scheduler.backoff.initial, cfg.scheduler.backoff.max
    );
    match &cfg.executor {
        Some(executor) => println!("  executor.cmd = {}", executor.cmd),
        None => println!("  executor = <none>"),
    }
    println!();

    println!("workers ({}):", cfg.worker.len());
    for (name, worker) in cfg.worker.iter() {
        println!("  - {name}");
        println!("      type: {}", worker.mode);
        if let Some(interval) = worker.repeat_interval {
            println!("      repeat_interval: {interval:?}");
        }
        if let Some(timeout) = worker.timeout {
            println!("      timeout: {timeout:?}");
        }
        println!("      foreground_behaviour: {:?}", worker.foreground_behaviour);
        let constraints = worker.constraints();
        if !constraints.is_unconstrained() {
            println!("      constraints: {constraints:?}");
        }
        if let Some(ref notification) = worker.notification {
            println!("      notification: {}", notification.title);
        }
    }

    debug!("dry-run complete (nothing started)");
}
