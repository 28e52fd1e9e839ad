use std::sync::Arc;

use anyhow::Context;
use tokio::sync::watch;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use inbox_hitl::approval::{ApprovalRegistry, DecisionHub};
use inbox_hitl::audit::{AuditStore, LibSqlAuditStore};
use inbox_hitl::config::{
    CoordinatorConfig, MailboxConfig, PollerConfig, ServerConfig, SmtpConfig,
};
use inbox_hitl::mailbox::{ImapSource, MailSource, MailboxPoller};
use inbox_hitl::pipeline::{PipelineInvoker, RulesPipeline};
use inbox_hitl::server::{AppState, routes};
use inbox_hitl::workflow::{WorkflowCoordinator, spawn_dispatcher};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        anyhow::bail!("Failed to install rustls crypto provider");
    }

    let server_config = ServerConfig::from_env();
    let _log_guard = init_tracing(server_config.log_dir.as_deref());

    let coordinator_config = CoordinatorConfig::from_env()?;
    let smtp_config = SmtpConfig::from_env();
    let mailbox_config = MailboxConfig::from_env()?;

    eprintln!("📬 Inbox HITL v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   WS:  ws://0.0.0.0:{}/ws", server_config.port);
    eprintln!("   API: http://0.0.0.0:{}/pending-approvals", server_config.port);
    eprintln!("   Database: {}", server_config.db_path);
    eprintln!(
        "   Approval timeout: {}s",
        coordinator_config.approval_timeout.as_secs()
    );
    eprintln!(
        "   SMTP: {}",
        smtp_config.as_ref().map_or("dry run", |c| c.host.as_str())
    );

    // ── Audit store ─────────────────────────────────────────────────────
    let audit: Arc<dyn AuditStore> = Arc::new(
        LibSqlAuditStore::new_local(std::path::Path::new(&server_config.db_path))
            .await
            .with_context(|| format!("Failed to open database at {}", server_config.db_path))?,
    );

    // ── Coordinator ─────────────────────────────────────────────────────
    let pipeline = Arc::new(
        RulesPipeline::new(smtp_config, coordinator_config.preview_chars)
            .context("Failed to compile triage rules")?,
    );
    let invoker = PipelineInvoker::new(pipeline, coordinator_config.max_blocking_stages);
    let hub = Arc::new(DecisionHub::new(Arc::new(ApprovalRegistry::new())));
    let default_recipient = coordinator_config.default_recipient.clone();
    let coordinator = Arc::new(WorkflowCoordinator::new(
        hub,
        invoker,
        audit,
        coordinator_config,
    ));
    let (submitter, _dispatcher) = spawn_dispatcher(Arc::clone(&coordinator));

    // ── Mailbox poller ──────────────────────────────────────────────────
    let (stop_tx, stop_rx) = watch::channel(false);
    let mailbox_enabled = mailbox_config.is_some();
    let poller_handle = mailbox_config.map(|config| {
        eprintln!("   Mailbox: {} ({})", config.imap_host, config.folder);
        let source: Arc<dyn MailSource> = Arc::new(ImapSource::new(config));
        let mut poller = MailboxPoller::new(source, PollerConfig::from_env());
        let submitter = submitter.clone();
        tokio::spawn(async move {
            poller
                .run(
                    move |item| submitter.submit(item.or_recipient(&default_recipient)),
                    stop_rx,
                )
                .await;
        })
    });
    if !mailbox_enabled {
        eprintln!("   Mailbox: disabled (set MAILBOX_IMAP_HOST to enable)");
    }
    eprintln!();

    // ── HTTP / WS server ────────────────────────────────────────────────
    let app = routes(AppState {
        coordinator: Arc::clone(&coordinator),
        submitter,
        mailbox_enabled,
    });
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", server_config.port))
        .await
        .with_context(|| format!("Failed to bind port {}", server_config.port))?;
    tracing::info!(port = server_config.port, "Server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
            }
            tracing::info!("Shutdown requested");
        })
        .await
        .context("Server error")?;

    let _ = stop_tx.send(true);
    if let Some(handle) = poller_handle {
        if let Err(e) = handle.await {
            tracing::warn!(error = %e, "Poller task ended abnormally");
        }
    }

    let abandoned = coordinator.in_flight();
    if abandoned > 0 {
        tracing::warn!(workflows = abandoned, "Exiting with workflows still in flight");
    }
    tracing::info!("Shutdown complete");
    Ok(())
}

/// Stderr logging, plus a daily rolling file when `log_dir` is set.
fn init_tracing(log_dir: Option<&str>) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr = fmt::layer().with_target(false).with_writer(std::io::stderr);

    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "inbox-hitl.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr)
                .with(fmt::layer().with_target(false).with_ansi(false).with_writer(writer))
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry().with(filter).with(stderr).init();
            None
        }
    }
}
