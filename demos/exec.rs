//! Supervises `sh -c 'echo ...; sleep'` with secrets pushed by an in-process engine.
//!
//! ```text
//! cargo run --example exec                 # default child
//! cargo run --example exec -- ./server -v  # custom child
//! EXECVISOR_LOG=debug cargo run --example exec
//! ```
//!
//! Every few seconds the fake secret store rotates the password; every third
//! rotation also delivers a new token. Ctrl-C stops supervision.
//!
//! Supervisor output goes to stderr at `EXECVISOR_LOG` (default `info`);
//! `RUST_LOG` only filters the demo's own lines.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use execvisor::{
    AgentConfig, ExecConfig, LogLevel, MemoryEngineFactory, Supervisor, SupervisorConfig,
    SupervisorError, TemplateSpec, VaultConfig, wait_for_shutdown_signal,
};

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    init_logging();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = if args.is_empty() {
        vec!["echo \"user=$DB_USER password=$DB_PASSWORD\"; exec sleep 3600".to_string()]
    } else {
        args
    };

    let agent = AgentConfig {
        vault: VaultConfig {
            address: Some("http://127.0.0.1:8200".into()),
            token: Some("s.initial".into()),
        },
        env_templates: vec![
            TemplateSpec::inline("DB_USER", "{{ with secret \"db/creds\" }}{{ .Data.username }}{{ end }}"),
            TemplateSpec::inline("DB_PASSWORD", "{{ with secret \"db/creds\" }}{{ .Data.password }}{{ end }}"),
        ],
        exec: Some(ExecConfig::new(command)),
        ..AgentConfig::default()
    };
    let mut cfg = SupervisorConfig::new(agent);
    cfg.log_level = match std::env::var("EXECVISOR_LOG") {
        Ok(raw) => raw.parse::<LogLevel>()?,
        Err(_) => LogLevel::Info,
    };

    let factory = MemoryEngineFactory::new();
    let mut sup = Supervisor::builder(cfg, Arc::new(factory.clone())).build();

    let cancel = CancellationToken::new();
    let (tokens_tx, tokens_rx) = mpsc::channel(4);

    // fake secret store
    let store = cancel.clone();
    tokio::spawn(async move {
        let mut round = 0u32;
        loop {
            if !factory.render("DB_USER", "app") {
                // engine not built yet
                tokio::time::sleep(Duration::from_millis(100)).await;
                continue;
            }
            factory.render("DB_PASSWORD", format!("pw-{round}"));
            if round % 3 == 2 && tokens_tx.send(format!("s.token-{round}")).await.is_err() {
                return;
            }
            round += 1;

            tokio::select! {
                _ = store.cancelled() => return,
                _ = tokio::time::sleep(Duration::from_secs(5)) => {}
            }
        }
    });

    let stop = cancel.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            tracing::error!(error = %e, "failed to install signal handlers");
        }
        stop.cancel();
    });

    match sup.run(cancel, tokens_rx).await {
        Ok(()) => Ok(()),
        Err(SupervisorError::ProcessExited { code }) => std::process::exit(code),
        Err(e) => Err(e.into()),
    }
}
