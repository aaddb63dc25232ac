use anyhow::Context;
use splitpay::audit::{AuditRecorder, ChannelAuditRecorder};
use splitpay::gateway::{GatewayHttp, GatewayRegistry, InicisAdapter, TossAdapter};
use splitpay::strategy::{CardStrategy, PointsStrategy, StrategyRegistry};
use splitpay::{api, config::Config, db::init_db, Orchestrator, Repository};
use std::net::SocketAddr;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .init();

    // Load configuration
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = run(config).await {
        eprintln!("{:#}", e);
        std::process::exit(1);
    }
}

async fn run(config: Config) -> anyhow::Result<()> {
    let pool = init_db(&config.database_path)
        .await
        .context("Failed to initialize database")?;
    let repo = Arc::new(Repository::new(pool));

    let (recorder, audit_worker) = ChannelAuditRecorder::spawn(repo.clone());
    let audit: Arc<dyn AuditRecorder> = Arc::new(recorder);
    let http = GatewayHttp::new(config.gateway_timeout, audit)
        .context("Failed to build gateway HTTP client")?;

    let gateways = GatewayRegistry::new(config.default_provider.clone())
        .with_adapter(Arc::new(TossAdapter::new(http.clone(), config.toss.clone())))
        .with_adapter(Arc::new(InicisAdapter::new(http, config.inicis.clone())));

    let strategies = StrategyRegistry::new()
        .with_strategy(Arc::new(PointsStrategy::new(repo.clone())))
        .with_strategy(Arc::new(CardStrategy::new(gateways)));
    let orchestrator = Arc::new(Orchestrator::new(strategies, repo.clone()));

    let app = api::create_router(api::AppState::new(repo, orchestrator));

    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    tracing::info!(
        default_provider = %config.default_provider,
        "Server listening on {}",
        addr
    );

    axum::serve(listener, app).await.context("Server error")?;

    // Every recorder clone lives in the router, so the worker drains once it is dropped.
    if let Err(e) = audit_worker.await {
        tracing::warn!(error = %e, "Audit worker ended abnormally");
    }
    Ok(())
}
