//! SENTINEL Advisor Server Entry Point
//!
//! Wires configuration, persistence, the model backend, and the persona
//! registry into the advisor pipeline, then serves the HTTP API.

use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use sentinel_advisor::{
    Advisor, AgentRegistry, CatalogFileSource, EscalationPolicy, PersonaSource,
    SemanticIntentIndex, StoreBackedSource,
};
use sentinel_config::{load_settings, Settings};
use sentinel_intent::IntentClassifier;
use sentinel_llm::{
    AnthropicBackend, AnthropicConfig, ChatModel, EmbeddingProvider, OpenAiEmbedder,
    OpenAiEmbedderConfig,
};
use sentinel_persistence::PersistenceLayer;
use sentinel_server::{create_router, init_metrics, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration from files and environment
    // Priority: env vars > config/{env}.yaml > config/default.yaml > defaults
    let env = std::env::var("SENTINEL_ENV").ok();
    let config = match load_settings(env.as_deref()) {
        Ok(settings) => {
            // Tracing not yet initialized, use eprintln for early logging
            eprintln!(
                "Loaded configuration from files (env: {})",
                env.as_deref().unwrap_or("default")
            );
            settings
        },
        Err(e) => {
            eprintln!("Warning: Failed to load config: {}. Using defaults.", e);
            Settings::default()
        },
    };

    init_tracing(&config);

    tracing::info!("Starting SENTINEL Advisor Server v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        environment = ?config.environment,
        config_path = env.as_deref().unwrap_or("default"),
        "Configuration loaded"
    );

    let _metrics_handle = init_metrics();
    tracing::info!("Initialized Prometheus metrics at /metrics");

    // Persistence: ScyllaDB when enabled and reachable, in-memory otherwise
    let (stores, store_mode) = if config.persistence.enabled {
        tracing::info!("Initializing ScyllaDB persistence layer...");
        match init_persistence(&config).await {
            Ok(stores) => {
                tracing::info!(
                    hosts = ?config.persistence.scylla_hosts,
                    keyspace = %config.persistence.keyspace,
                    "ScyllaDB persistence initialized"
                );
                (stores, "scylla")
            },
            Err(e) => {
                tracing::error!(
                    "Failed to initialize ScyllaDB: {}. Falling back to in-memory.",
                    e
                );
                (sentinel_persistence::init_in_memory(), "memory")
            },
        }
    } else {
        tracing::info!("Persistence disabled, using in-memory stores");
        (sentinel_persistence::init_in_memory(), "memory")
    };

    // Model backend; a missing key is a startup error, a failing call at
    // request time degrades to the persona fallback message instead
    let api_key = config
        .llm
        .api_key
        .clone()
        .or_else(|| std::env::var("ANTHROPIC_API_KEY").ok())
        .unwrap_or_default();
    let llm_config = AnthropicConfig::new(api_key)
        .with_model(config.llm.model.clone())
        .with_endpoint(config.llm.endpoint.clone())
        .with_timeout(Duration::from_secs(config.llm.timeout_seconds));
    let model: Arc<dyn ChatModel> = Arc::new(
        AnthropicBackend::new(llm_config)
            .context("Anthropic backend init failed (set ANTHROPIC_API_KEY or llm.api_key)")?,
    );
    tracing::info!(model = %config.llm.model, "Anthropic backend configured");

    // Persona catalog: YAML file, optionally overlaid with store rows
    let file_source: Arc<dyn PersonaSource> =
        Arc::new(CatalogFileSource::new(config.advisor.personas_path.clone()));
    let source: Arc<dyn PersonaSource> = if config.persistence.store_backed_personas {
        tracing::info!("Persona catalog overlaid with agent_definitions rows");
        Arc::new(StoreBackedSource::new(file_source, stores.personas.clone()))
    } else {
        file_source
    };
    let registry = Arc::new(
        AgentRegistry::new(source, Duration::from_secs(config.advisor.persona_ttl_seconds))
            .await
            .context("Persona registry init failed")?,
    );

    let mut advisor = Advisor::new(
        registry,
        model,
        stores.clone(),
        EscalationPolicy::from_config(&config.escalation.rules),
        config.advisor.clone(),
    );

    // Semantic intent fallback rides on the embeddings provider when enabled
    if config.embeddings.enabled {
        let embedder_config = OpenAiEmbedderConfig {
            api_key: config
                .embeddings
                .api_key
                .clone()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok())
                .unwrap_or_default(),
            model: config.embeddings.model.clone(),
            endpoint: config.embeddings.endpoint.clone(),
            timeout: Duration::from_secs(config.embeddings.timeout_seconds),
        };
        match OpenAiEmbedder::new(embedder_config) {
            Ok(embedder) => {
                let embedder: Arc<dyn EmbeddingProvider> = Arc::new(embedder);
                let index = SemanticIntentIndex::new(
                    embedder.clone(),
                    stores.conversations.clone(),
                    config.embeddings.similarity_threshold,
                    config.embeddings.scan_limit,
                );
                let classifier = IntentClassifier::new()
                    .with_semantic_index(Arc::new(index), config.embeddings.neighbors);
                advisor = advisor.with_classifier(classifier).with_embedder(embedder);
                tracing::info!(
                    model = %config.embeddings.model,
                    neighbors = config.embeddings.neighbors,
                    "Semantic intent fallback enabled"
                );
            },
            Err(e) => {
                tracing::warn!(
                    "Failed to initialize embeddings: {}. Semantic fallback disabled.",
                    e
                );
            },
        }
    }

    let state = AppState::with_env(config.clone(), Arc::new(advisor), env)
        .with_store_mode(store_mode);

    // Sweep idle rate-limit buckets so the map tracks only active clients
    let rate_limiter = state.rate_limiter.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(300));
        loop {
            interval.tick().await;
            rate_limiter.prune();
        }
    });

    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server host/port")?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        }
    }
}

/// Initialize tracing (with optional OpenTelemetry when feature enabled)
#[cfg(feature = "telemetry")]
fn init_tracing(config: &Settings) {
    use opentelemetry::trace::TracerProvider as _;
    use opentelemetry_otlp::WithExportConfig;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = &config.observability.log_level;
        format!("sentinel={},tower_http=debug", level).into()
    });

    let subscriber = tracing_subscriber::registry().with(env_filter);
    let fmt_layer = if config.observability.log_json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };

    if let Some(otlp_endpoint) = &config.observability.otlp_endpoint {
        if config.observability.tracing_enabled {
            let exporter = opentelemetry_otlp::SpanExporter::builder()
                .with_tonic()
                .with_endpoint(otlp_endpoint)
                .build();
            match exporter {
                Ok(exporter) => {
                    let provider = opentelemetry_sdk::trace::TracerProvider::builder()
                        .with_batch_exporter(exporter, opentelemetry_sdk::runtime::Tokio)
                        .with_resource(opentelemetry_sdk::Resource::new(vec![
                            opentelemetry::KeyValue::new("service.name", "sentinel-advisor"),
                            opentelemetry::KeyValue::new(
                                "service.version",
                                env!("CARGO_PKG_VERSION"),
                            ),
                        ]))
                        .build();
                    let tracer = provider.tracer("sentinel-advisor");
                    let otel_layer = tracing_opentelemetry::layer().with_tracer(tracer);
                    subscriber.with(fmt_layer).with(otel_layer).init();
                    tracing::info!(endpoint = %otlp_endpoint, "OpenTelemetry tracing enabled");
                    return;
                },
                Err(e) => eprintln!("Failed to initialize OpenTelemetry: {}. Falling back.", e),
            }
        }
    }
    subscriber.with(fmt_layer).init();
}

/// Initialize tracing (console only - telemetry feature disabled)
#[cfg(not(feature = "telemetry"))]
fn init_tracing(config: &Settings) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = &config.observability.log_level;
        format!("sentinel={},tower_http=debug", level).into()
    });

    let subscriber = tracing_subscriber::registry().with(env_filter);
    let fmt_layer = if config.observability.log_json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };
    subscriber.with(fmt_layer).init();
}

/// Initialize the ScyllaDB persistence layer from settings
async fn init_persistence(
    config: &Settings,
) -> Result<PersistenceLayer, sentinel_persistence::PersistenceError> {
    let scylla_config = sentinel_persistence::ScyllaConfig {
        hosts: config.persistence.scylla_hosts.clone(),
        keyspace: config.persistence.keyspace.clone(),
        replication_factor: config.persistence.replication_factor,
    };
    sentinel_persistence::init(scylla_config).await
}
