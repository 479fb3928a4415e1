//! pointflow agent - Main Entry Point
//!
//! Reads one JSON input per line from stdin (`{"script": "...", "point": {...}}`),
//! runs the configured scripts and forwards the results to the offload
//! receiver, or prints them as JSON lines when offloading is disabled.
//!
//! Usage: `pointflow [CONFIG]`

use anyhow::Context;
use crossbeam_channel::{bounded, RecvTimeoutError};
use pointflow::{
    agent::{group_by_category, Agent},
    config::{EngineConfig, LogSettings},
    offload::{HttpReceiver, OffloadWorker, Receiver},
    pipeline::Manager,
    point::Point,
};
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn init_logging(log: &LogSettings) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log.level));
    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr));

    match &log.dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, &log.file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            registry
                .with(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(writer))
                .init();
            Some(guard)
        }
        None => {
            registry.init();
            None
        }
    }
}

fn main() -> anyhow::Result<()> {
    let config_path = std::env::args_os().nth(1).map(PathBuf::from);
    let config = EngineConfig::load_or_default(config_path.as_deref())
        .context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    // Initialize logging
    let _log_guard = init_logging(&config.log);
    tracing::info!("Starting pointflow agent");

    // Load scripts
    let manager = Manager::new(config.pipeline.compile_options());
    for dir in &config.pipeline.script_dirs {
        let errors = manager
            .load_scripts_dir(dir.namespace, &dir.path)
            .with_context(|| format!("Failed to load scripts from {:?}", dir.path))?;
        for (category, errs) in errors {
            for (name, err) in errs {
                tracing::warn!(category = %category, script = %name, "{}", err);
            }
        }
    }
    for (category, name) in config.pipeline.default_scripts() {
        manager.set_default_script(category, Some(name))?;
    }
    let agent = Agent::new(manager, config.pipeline.run_options());

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start tokio runtime")?;

    // Raised on Ctrl-C; aborts running script loops and the input loop
    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = shutdown.clone();
        runtime.spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Interrupt received, shutting down");
                shutdown.store(true, Ordering::Relaxed);
            }
        });
    }

    let worker = match &config.offload {
        Some(offload) => {
            let receiver: Arc<dyn Receiver> = Arc::new(
                HttpReceiver::new(offload.addresses.clone(), offload.request_timeout())
                    .context("Failed to create offload receiver")?,
            );
            let _guard = runtime.enter();
            Some(OffloadWorker::spawn(
                &offload.effective_categories(),
                receiver,
                offload.worker_options(),
            ))
        }
        None => None,
    };

    // Input thread
    let (line_tx, line_rx) = bounded::<String>(1024);
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(line) if line.trim().is_empty() => continue,
                Ok(line) => {
                    if line_tx.send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::error!("Failed to read stdin: {}", e);
                    break;
                }
            }
        }
    });

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    while !shutdown.load(Ordering::Relaxed) {
        let line = match line_rx.recv_timeout(Duration::from_millis(200)) {
            Ok(line) => line,
            Err(RecvTimeoutError::Timeout) => {
                // Interval-driven aggregation flushes
                emit(&runtime, worker.as_ref(), &mut out, agent.take_released())?;
                continue;
            }
            Err(RecvTimeoutError::Disconnected) => break,
        };

        let points = match agent.process_line(&line, Some(shutdown.as_ref())) {
            Ok(points) => points,
            Err(e) => {
                tracing::warn!("Skipping input line: {}", e);
                continue;
            }
        };
        emit(&runtime, worker.as_ref(), &mut out, points)?;
    }

    emit(&runtime, worker.as_ref(), &mut out, agent.take_released())?;
    if let Some(worker) = worker {
        runtime.block_on(worker.shutdown());
    }
    tracing::info!("pointflow agent stopped");
    Ok(())
}

fn emit(
    runtime: &tokio::runtime::Runtime,
    worker: Option<&OffloadWorker>,
    out: &mut impl Write,
    points: Vec<Point>,
) -> anyhow::Result<()> {
    for (category, batch) in group_by_category(points) {
        match worker {
            Some(worker) => {
                if let Err(e) = runtime.block_on(worker.send(category, batch)) {
                    tracing::warn!(category = %category, "Point not offloaded: {}", e);
                }
            }
            None => {
                for p in batch {
                    serde_json::to_writer(&mut *out, &p)?;
                    writeln!(out)?;
                }
            }
        }
    }
    Ok(())
}
