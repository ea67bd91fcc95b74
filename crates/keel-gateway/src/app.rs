//! Gateway state and router assembly.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use keel_agent::Services;
use keel_channels::ChannelRegistry;
use keel_core::config::KeelConfig;
use keel_runtime::{EventBus, Executor, SessionSupervisor};
use keel_slack::{SlackHandler, SlackTransform};
use keel_telegram::{TelegramHandler, TelegramTransform};
use tower_http::trace::TraceLayer;

use crate::http;

pub struct AppState {
    pub config: Arc<KeelConfig>,
    pub services: Arc<Services>,
    pub registry: Arc<ChannelRegistry>,
    pub bus: EventBus,
    pub supervisor: Arc<SessionSupervisor>,
    pub executor: Executor,
}

impl AppState {
    /// Build the full runtime from config: services, channel registry with
    /// every configured adapter, bus, supervisor, and executor.
    pub fn new(config: KeelConfig) -> keel_core::Result<Self> {
        let services = Arc::new(Services::new(config.clone())?);

        let mut registry = ChannelRegistry::new();
        if let Some(telegram) = &config.channels.telegram {
            registry.register(
                Arc::new(TelegramHandler::new(telegram)),
                Arc::new(TelegramTransform),
            );
        }
        if let Some(slack) = &config.channels.slack {
            registry.register(Arc::new(SlackHandler::new(slack)), Arc::new(SlackTransform));
        }

        Ok(Self::with_parts(config, services, Arc::new(registry)))
    }

    /// Assemble state around pre-built services and registry. Tests inject
    /// scripted providers and fake channels here.
    pub fn with_parts(
        config: KeelConfig,
        services: Arc<Services>,
        registry: Arc<ChannelRegistry>,
    ) -> Self {
        let executor = Executor::new(services.workspace());
        Self {
            config: Arc::new(config),
            services,
            registry,
            bus: EventBus::new(),
            supervisor: Arc::new(SessionSupervisor::new()),
            executor,
        }
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(http::health::health_handler))
        .route("/webhooks/{channel}", post(http::webhooks::webhook_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
