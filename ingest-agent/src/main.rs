// src/main.rs

//! Ingestion agent entry-point.
//!
//! 1. Parse configuration & set up structured logging
//! 2. Open SQLite (WAL) and trim the table to capacity
//! 3. Start the tokio runtime, metrics exporter and WAL maintenance
//! 4. Subscribe to the bus and feed the ingestion worker
//! 5. Serve the query API until Ctrl-C, then stop cleanly

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::{net::TcpListener, runtime::Runtime};
use tokio_util::sync::CancellationToken;

use agent::{
    api::{self, ApiState, QueryService},
    comms::{IngestionWorker, Listener, MqttListener},
    config::{self, Config},
    db::{connection::db_path, maintenance::spawn_wal_maintenance, RetentionPolicy, Store},
    greengrid_log,
    logging::setup_logging,
};

// ───── helpers ──────────────────────────────────────────────────────────────

/// Print an error with context and terminate the process.
macro_rules! fatal {
    ($ctx:expr, $($arg:tt)+) => {{
        eprintln!(
            "[{}][ERROR][{}] {}",
            chrono::Local::now().to_rfc3339(),
            $ctx,
            format!($($arg)+)
        );
        std::process::exit(1);
    }};
}

/// Directory that contains the running executable.
fn exe_dir() -> Result<PathBuf> {
    let exe = std::env::current_exe().context("cannot determine executable path")?;
    exe.parent()
        .map(Path::to_path_buf)
        .context("executable has no parent directory")
}

/// `config.toml` next to the executable unless a path is given as the first
/// argument. Only an explicitly named file has to exist.
fn load_config(exe_dir: &Path) -> Result<(Config, Option<PathBuf>)> {
    let (path, explicit) = match std::env::args_os().nth(1) {
        Some(arg) => (PathBuf::from(arg), true),
        None => (exe_dir.join("config.toml"), false),
    };
    if !explicit && !path.exists() {
        return Ok((Config::default(), None));
    }
    let cfg = config::load(&path).with_context(|| format!("loading {}", path.display()))?;
    Ok((cfg, Some(path)))
}

// ───── agent ────────────────────────────────────────────────────────────────

fn run() -> Result<()> {
    // 1 ─ Context
    let exe_dir = exe_dir()?;
    let (cfg, cfg_path) = load_config(&exe_dir)?;

    // 2 ─ Logging
    setup_logging(&exe_dir, &cfg.logging).context("logging setup failed")?;
    match &cfg_path {
        Some(p) => log::info!("Agent bootstrap initiated (config {})", p.display()),
        None => log::warn!("No config.toml next to the executable, running on defaults"),
    }

    // 3 ─ Database
    let policy = RetentionPolicy::from_config(&cfg.retention);
    let path = db_path(&exe_dir, &cfg.database);
    let store = Arc::new(
        Store::open(&path, &cfg.database).with_context(|| format!("opening {}", path.display()))?,
    );
    let evicted = policy.enforce(&store).context("initial retention pass")?;
    greengrid_log!(
        log::Level::Info,
        "db",
        "Retention ready: capacity={} check_every={} evicted_at_start={}",
        policy.capacity(),
        policy.check_every(),
        evicted
    );

    // 4 ─ Runtime, metrics, maintenance
    let rt = Runtime::new().context("tokio runtime creation failed")?;
    let rt_store = Arc::clone(&store);
    rt.block_on(async move {
        let store = rt_store;
        if let Some(addr) = cfg.metrics.listen {
            PrometheusBuilder::new()
                .with_http_listener(addr)
                .install()
                .context("installing Prometheus exporter")?;
            log::info!("Metrics exporter listening on http://{}", addr);
        }

        let shutdown = CancellationToken::new();
        let maintenance = cfg
            .database
            .checkpoint_interval
            .map(|period| spawn_wal_maintenance(Arc::clone(&store), period, shutdown.clone()));

        // 5 ─ Bus + ingestion worker
        let listener = Arc::new(MqttListener::new(cfg.bus.clone()));
        let (rx, listener_task) = listener.spawn(shutdown.clone());
        let worker = IngestionWorker::new(Arc::clone(&store), policy);
        let link = worker.link_state();
        let worker_task = tokio::spawn(worker.run(rx, shutdown.clone()));

        // 6 ─ Query API
        let tcp = TcpListener::bind(cfg.api.listen)
            .await
            .with_context(|| format!("binding query API on {}", cfg.api.listen))?;
        let state = ApiState::new(QueryService::new(Arc::clone(&store), policy), cfg.api.default_limit, link);
        let server = tokio::spawn(api::serve(tcp, state, shutdown.clone()));

        // 7 ─ Wait for shutdown
        tokio::signal::ctrl_c().await.context("waiting for Ctrl-C")?;
        log::warn!("Shutdown initiated");
        shutdown.cancel();

        if let Err(e) = worker_task.await {
            log::error!("ingestion worker panicked: {}", e);
        }
        if let Err(e) = listener_task.await {
            log::error!("bus listener panicked: {}", e);
        }
        match server.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => log::error!("query API failed: {}", e),
            Err(e) => log::error!("query API panicked: {}", e),
        }
        if let Some(handle) = maintenance {
            let _ = handle.await;
        }
        anyhow::Ok(())
    })?;

    if let Err(e) = store.checkpoint() {
        log::warn!("final WAL checkpoint failed: {}", e);
    }
    log::info!("Agent stopped cleanly");
    Ok(())
}

fn main() {
    if let Err(e) = run() {
        fatal!("bootstrap", "{:#}", e);
    }
}
