//! The outreach pipeline binary: wires the pipeline, scheduler, and
//! notifier crates together behind two connection pools (foreground for
//! the HTTP/WS surface, background for batch work) and runs them
//! concurrently, the same shape as splitting request-serving and worker
//! pools at the top of `main`.

use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::EnvFilter;

use outreach_adapters::{ListenNotesAdapter, MockAdapter, PodscanAdapter, SourceAdapter};
use outreach_ai::{LlmClient, OpenAiClient};
use outreach_common::Config;
use outreach_events::EventBus;
use outreach_notify::{notifications_ws, ConnectionRegistry, NotifyHub};
use outreach_pipeline::{
    DiscoveryFetcher, EnrichmentOrchestrator, HttpTranscriber, MatchCreator, MockTranscriber,
    Transcriber, VettingAgent,
};
use outreach_scheduler::catalog::{default_catalog, TaskSpec};
use outreach_scheduler::{AutoDiscoveryController, HealthChecker, Scheduler};
use outreach_store::Store;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .json()
        .init();

    tracing::info!("starting outreach-app");

    let config = Config::from_env();
    config.log_redacted();

    let foreground_store = Store::connect_foreground(&config).await?;
    let background_store = Store::connect_background(&config).await?;
    tracing::info!(
        background_pool_size = config.background_pool_size,
        "connected foreground (max 20) and background pools"
    );

    let adapters: Vec<Arc<dyn SourceAdapter>> = vec![
        if config.listen_notes_api_key.is_empty() {
            Arc::new(MockAdapter::new("listen_notes"))
        } else {
            Arc::new(ListenNotesAdapter::new(config.listen_notes_api_key.clone()))
        },
        if config.podscan_api_key.is_empty() {
            Arc::new(MockAdapter::new("podscan"))
        } else {
            Arc::new(PodscanAdapter::new(config.podscan_api_key.clone()))
        },
    ];

    let llm: Arc<dyn LlmClient> = Arc::new(OpenAiClient::new(
        config.llm_api_key.clone(),
        config.llm_model.clone(),
    ));

    let transcriber: Arc<dyn Transcriber> = if config.transcription_api_key.is_empty() {
        Arc::new(MockTranscriber::new(""))
    } else {
        Arc::new(HttpTranscriber::new(config.transcription_api_key.clone()))
    };

    let events = EventBus::new();

    let fetcher = Arc::new(
        DiscoveryFetcher::new(
            background_store.clone(),
            adapters.clone(),
            llm.clone(),
            events.clone(),
        )
        .with_inter_request_delay(std::time::Duration::from_millis(
            config.adapter_inter_request_delay_ms,
        ))
        .with_page_size(config.adapter_page_size),
    );
    let enrichment = Arc::new(EnrichmentOrchestrator::new(
        background_store.clone(),
        adapters.clone(),
        transcriber.clone(),
        llm.clone(),
        events.clone(),
    ));
    let vetting = Arc::new(VettingAgent::new(background_store.clone(), llm.clone(), events.clone()));
    let match_creator = Arc::new(MatchCreator::new(background_store.clone(), llm.clone(), events.clone()));
    let vetting_threshold = config.vetting_threshold;
    let controller = Arc::new(AutoDiscoveryController::new(
        background_store.clone(),
        fetcher.clone(),
        match_creator.clone(),
        events.clone(),
        vetting_threshold,
    ));
    let health_checker = Arc::new(HealthChecker::new(background_store.clone()));

    controller.recover().await?;
    tracing::info!("startup crash-recovery sweep complete");

    let registry = ConnectionRegistry::new();
    let notify_hub = NotifyHub::new(registry.clone());
    notify_hub.spawn(events.clone());

    let scheduler = build_scheduler(
        enrichment,
        vetting,
        match_creator,
        controller,
        health_checker,
        background_store.clone(),
        vetting_threshold,
    );

    let app_state = AppState {
        store: foreground_store,
        registry,
    };
    let cors = if config.websocket_origin == "*" {
        CorsLayer::new().allow_origin(Any)
    } else {
        let origin = config
            .websocket_origin
            .parse()
            .unwrap_or_else(|e| panic!("WEBSOCKET_ORIGIN is not a valid origin: {e}"));
        CorsLayer::new().allow_origin(origin)
    };

    let app = Router::new()
        .route("/health", get(health))
        .route("/ws/notifications", get(notifications_ws))
        .layer(cors)
        .with_state(app_state);

    let listen_addr = "0.0.0.0:8080";
    let listener = tokio::net::TcpListener::bind(listen_addr).await?;
    tracing::info!(addr = listen_addr, "HTTP/WS server listening");

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "HTTP server exited with an error");
        }
    });

    let scheduler_handle = tokio::spawn(async move {
        scheduler.run().await;
    });

    tokio::select! {
        _ = server_handle => {},
        _ = scheduler_handle => {},
    }

    Ok(())
}

/// Combined axum state: the two route handlers live in different crates
/// (`outreach-store`'s health check, `outreach-notify`'s WebSocket upgrade)
/// and each extracts its own `State<T>`, so this substates both via
/// `FromRef` rather than forcing a single shared type on them.
#[derive(Clone)]
struct AppState {
    store: Store,
    registry: ConnectionRegistry,
}

impl axum::extract::FromRef<AppState> for Store {
    fn from_ref(state: &AppState) -> Self {
        state.store.clone()
    }
}

impl axum::extract::FromRef<AppState> for ConnectionRegistry {
    fn from_ref(state: &AppState) -> Self {
        state.registry.clone()
    }
}

async fn health(State(store): State<Store>) -> impl IntoResponse {
    match store.ping().await {
        Ok(()) => (axum::http::StatusCode::OK, "ok"),
        Err(_) => (axum::http::StatusCode::SERVICE_UNAVAILABLE, "database unreachable"),
    }
}

/// Pulls `name`'s entry out of the catalog so its cadence/timeout/concurrency
/// live in exactly one place (`catalog::default_catalog`) instead of being
/// duplicated here alongside the closure that actually runs the task.
fn take_spec(catalog: &mut Vec<TaskSpec>, name: &str) -> TaskSpec {
    let idx = catalog
        .iter()
        .position(|s| s.name == name)
        .unwrap_or_else(|| panic!("task catalog has no entry named {name}"));
    catalog.remove(idx)
}

#[allow(clippy::too_many_arguments)]
fn build_scheduler(
    enrichment: Arc<EnrichmentOrchestrator>,
    vetting: Arc<VettingAgent>,
    match_creator: Arc<MatchCreator>,
    controller: Arc<AutoDiscoveryController>,
    health_checker: Arc<HealthChecker>,
    store: Store,
    vetting_threshold: i32,
) -> Scheduler {
    let mut catalog = default_catalog();

    let e1 = enrichment.clone();
    let builder = Scheduler::builder().register(
        take_spec(&mut catalog, "profile_enrichment"),
        move || {
            let e = e1.clone();
            async move { e.run_profile_enrichment(20).await.map(|_| ()) }
        },
    );

    let e2 = enrichment.clone();
    let builder = builder.register(take_spec(&mut catalog, "ai_description"), move || {
        let e = e2.clone();
        async move { e.run_ai_description_batch(20).await.map(|_| ()) }
    });

    let v1 = vetting.clone();
    let builder = builder.register(take_spec(&mut catalog, "vetting"), move || {
        let v = v1.clone();
        async move { v.run(20).await.map(|_| ()) }
    });

    let m1 = match_creator.clone();
    let builder = builder.register(take_spec(&mut catalog, "match_creation"), move || {
        let m = m1.clone();
        async move { m.run(vetting_threshold, 20).await.map(|_| ()) }
    });

    let c1 = controller.clone();
    let builder = builder.register(take_spec(&mut catalog, "auto_discovery_sweep"), move || {
        let c = c1.clone();
        async move { c.sweep(10).await.map(|_| ()) }
    });

    let h1 = health_checker.clone();
    let builder = builder.register(take_spec(&mut catalog, "health_check"), move || {
        let h = h1.clone();
        async move { h.run().await.map(|_| ()) }
    });

    let store_for_reset = store;
    let builder = builder.register(
        take_spec(&mut catalog, "weekly_counters_reset"),
        move || {
            let store = store_for_reset.clone();
            async move {
                store.client_profiles.reset_all_weekly_counters().await?;
                store.campaigns.reset_weekly_auto_discovery_matches().await?;
                Ok(())
            }
        },
    );

    builder.build()
}
