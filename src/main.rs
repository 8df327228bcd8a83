//! softcache soak run
//!
//! Builds a cache manager from the environment, hammers a loading cache and
//! a plain cache from several threads, prints the known-cache snapshot as
//! JSON and shuts everything down.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::bail;
use serde::Serialize;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use softcache::{spawn_housekeeping_task, CacheManager, CacheSpec, Config, StringKeyStore};

const WORKERS: usize = 8;
const REQUESTS_PER_WORKER: usize = 20_000;
const KEY_SPACE: u64 = 2_000;

/// Totals of one soak run.
#[derive(Debug, Default, Serialize)]
struct SoakReport {
    requests: usize,
    loads: usize,
    failures: usize,
    missing: usize,
    reclaimed: usize,
    removed_by_prefix: usize,
    elapsed_ms: u128,
}

/// Main entry point for the soak run.
///
/// # Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Create the cache manager and start housekeeping
/// 4. Run the workload on the blocking pool until it completes or Ctrl+C
/// 5. Print the known-cache snapshot and shut down
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" for this crate, can be overridden with RUST_LOG
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "softcache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting softcache soak run");

    let config = Config::from_env()?;
    info!(
        "Configuration loaded: backend={}, traversal_limit={}, housekeeping_interval={}s",
        config.backend, config.traversal_limit, config.housekeeping_interval
    );

    let manager = Arc::new(CacheManager::new(config.clone())?);
    let housekeeping = spawn_housekeeping_task(Arc::clone(&manager), config.housekeeping_interval);

    let stop = Arc::new(AtomicBool::new(false));
    let workload = tokio::task::spawn_blocking({
        let manager = Arc::clone(&manager);
        let stop = Arc::clone(&stop);
        move || run_workload(&manager, &stop)
    });
    tokio::pin!(workload);

    let report = tokio::select! {
        result = &mut workload => result??,
        _ = shutdown_signal() => {
            stop.store(true, Ordering::Release);
            workload.await??
        }
    };

    info!("Workload finished: {}", serde_json::to_string(&report)?);
    println!("{}", serde_json::to_string_pretty(&manager.known_caches())?);

    let leaked = manager.audit_temporary_caches(Duration::ZERO);
    if !leaked.is_empty() {
        warn!("{} temporary caches left open", leaked.len());
    }

    housekeeping.abort();
    manager.shutdown();

    info!("Soak run complete");
    Ok(())
}

fn run_workload(manager: &CacheManager, stop: &AtomicBool) -> anyhow::Result<SoakReport> {
    let started = Instant::now();
    let loads = Arc::new(AtomicUsize::new(0));

    let loading = {
        let loads = Arc::clone(&loads);
        manager
            .get_blocking_cache::<u64, String, usize>(
                &CacheSpec::new("soak-loading")
                    .limit(KEY_SPACE as usize / 2)
                    .ttl(Duration::from_secs(30)),
            )?
            .with_loader(move |key: &u64, attempt: usize| {
                loads.fetch_add(1, Ordering::Relaxed);
                if key % 97 == 0 {
                    return Ok(None);
                }
                if key % 101 == 0 && attempt % 2 == 0 {
                    bail!("simulated backend failure for {}", key);
                }
                Ok(Some(format!("value-{}", key)))
            })
    };
    let counters = manager.get_cache::<String, u64>(&CacheSpec::new("soak-counters").limit(500))?;

    let scratch = manager.get_cache::<u64, u64>(&CacheSpec::new("soak-scratch").temporary())?;
    for i in 0..100 {
        scratch.put(i, i * i);
    }
    scratch.close();

    let requests = AtomicUsize::new(0);
    let failures = AtomicUsize::new(0);
    let missing = AtomicUsize::new(0);
    let reclaimed = AtomicUsize::new(0);
    let removed_by_prefix = AtomicUsize::new(0);

    thread::scope(|scope| {
        for worker in 0..WORKERS {
            let (loading, counters) = (&loading, &counters);
            let (requests, failures, missing) = (&requests, &failures, &missing);
            let (reclaimed, removed_by_prefix) = (&reclaimed, &removed_by_prefix);
            scope.spawn(move || {
                for i in 0..REQUESTS_PER_WORKER {
                    if stop.load(Ordering::Acquire) {
                        break;
                    }
                    let key = (worker as u64 * 7_919 + i as u64 * 104_729) % KEY_SPACE;

                    match loading.get_or_load(&key, i) {
                        Ok(Some(_)) => {}
                        Ok(None) => {
                            missing.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(_) => {
                            failures.fetch_add(1, Ordering::Relaxed);
                        }
                    }

                    let counter = format!("worker-{}:{}", worker, key % 50);
                    let count = counters.get(&counter).unwrap_or(0);
                    counters.put(counter, count + 1);

                    if i % 1_000 == 999 {
                        let prefix = format!("worker-{}:", worker);
                        removed_by_prefix
                            .fetch_add(counters.remove_using_prefix(&prefix), Ordering::Relaxed);
                    }
                    if worker == 0 && i % 5_000 == 4_999 {
                        reclaimed
                            .fetch_add(manager.memory_pressure().reclaim(100), Ordering::Relaxed);
                    }
                    requests.fetch_add(1, Ordering::Relaxed);
                }
            });
        }
    });

    Ok(SoakReport {
        requests: requests.into_inner(),
        loads: loads.load(Ordering::Relaxed),
        failures: failures.into_inner(),
        missing: missing.into_inner(),
        reclaimed: reclaimed.into_inner(),
        removed_by_prefix: removed_by_prefix.into_inner(),
        elapsed_ms: started.elapsed().as_millis(),
    })
}

/// Waits for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                warn!("Failed to install SIGTERM handler: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, stopping workload...");
        }
        _ = terminate => {
            info!("Received SIGTERM, stopping workload...");
        }
    }
}
