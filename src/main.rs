use std::sync::Arc;

use chat_relay::actions::{ActionStore, spawn_sweep_task};
use chat_relay::agent::create_agent_from_env;
use chat_relay::channels::{MessageChannel, WhatsAppChannel};
use chat_relay::config::RelayConfig;
use chat_relay::executor::{EmailConfig, RelayExecutor};
use chat_relay::router::{MessageRouter, RouterDeps};
use chat_relay::server::relay_routes;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = RelayConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        eprintln!("  export OPERATOR_PHONE=5215664087506");
        std::process::exit(1);
    });

    let port: u16 = std::env::var("RELAY_PORT")
        .unwrap_or_else(|_| "8000".to_string())
        .parse()
        .unwrap_or(8000);

    eprintln!("🤖 Chat Relay v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Operator: {}", config.operator_chat);
    eprintln!("   Webhook: http://0.0.0.0:{port}/webhook");

    // ── Channel ─────────────────────────────────────────────────────
    let channel = WhatsAppChannel::from_env(config.clone()).unwrap_or_else(|| {
        eprintln!("Error: ULTRAMSG_INSTANCE_ID not set");
        std::process::exit(1);
    });
    if let Err(e) = channel.health_check().await {
        eprintln!("   Warning: channel health check failed: {e}");
    }

    // ── Collaborators ───────────────────────────────────────────────
    let agent = create_agent_from_env();
    eprintln!(
        "   AI: {}",
        if agent.is_configured() { "enabled" } else { "pattern fallback" }
    );

    let executor = RelayExecutor::from_env();
    eprintln!(
        "   Email executor: {}   Calendar executor: {}",
        if executor.email_configured() { "enabled" } else { "disabled" },
        if executor.calendar_configured() { "enabled" } else { "disabled" },
    );
    let mail_config = EmailConfig::from_env();

    // ── Core ────────────────────────────────────────────────────────
    let store = ActionStore::new();
    let _sweep_handle = spawn_sweep_task(Arc::clone(&store), std::time::Duration::from_secs(120));

    let router = MessageRouter::new(
        config,
        RouterDeps {
            channel: Arc::new(channel),
            agent,
            executor: Arc::new(executor),
            store,
            mail_config,
        },
    );

    // ── Serve ───────────────────────────────────────────────────────
    let app = relay_routes(router);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;
    tracing::info!(port, "Chat Relay listening");
    axum::serve(listener, app).await?;

    Ok(())
}
