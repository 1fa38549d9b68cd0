use std::sync::Arc;

use tower_http::cors::CorsLayer;

use noteshub_onboarding::auth::{AuthProvider, GoTrueAuth, IdentityDirectory, InMemoryAuth};
use noteshub_onboarding::config::{OnboardingConfig, ServerConfig};
use noteshub_onboarding::error::Result;
use noteshub_onboarding::onboarding::{
    ControllerFactory, OnboardingController, OnboardingRouteState, onboarding_routes,
};
use noteshub_onboarding::store::{LibSqlBackend, ProfileStore};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let server_config = ServerConfig::from_env()?;
    let onboarding_config = Arc::new(OnboardingConfig::from_env()?);

    eprintln!("📚 NotesHub onboarding v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   API: http://0.0.0.0:{}/api/onboarding", server_config.port);

    // ── Database ─────────────────────────────────────────────────────────
    let profiles: Arc<dyn ProfileStore> =
        Arc::new(LibSqlBackend::new_local(&server_config.db_path).await?);
    eprintln!("   Database: {}", server_config.db_path.display());

    // ── Auth ─────────────────────────────────────────────────────────────
    let make_auth: Arc<dyn Fn() -> Arc<dyn AuthProvider> + Send + Sync> =
        match server_config.auth.clone() {
            Some(auth_config) => {
                eprintln!("   Auth: {}", auth_config.url);
                let client = reqwest::Client::new();
                Arc::new(move || -> Arc<dyn AuthProvider> {
                    Arc::new(GoTrueAuth::new(client.clone(), &auth_config))
                })
            }
            None => {
                eprintln!("   Auth: in-memory (codes are logged, not sent)");
                let directory = Arc::new(IdentityDirectory::default());
                Arc::new(move || -> Arc<dyn AuthProvider> {
                    Arc::new(InMemoryAuth::new(Arc::clone(&directory)))
                })
            }
        };

    if onboarding_config.demo.enabled {
        eprintln!(
            "   Demo: {} / code {}",
            onboarding_config.demo.phone, onboarding_config.demo.code
        );
    } else {
        eprintln!("   Demo: disabled");
    }

    let factory: ControllerFactory = {
        let profiles = Arc::clone(&profiles);
        Arc::new(move || {
            OnboardingController::new(
                Arc::clone(&onboarding_config),
                make_auth(),
                Arc::clone(&profiles),
            )
        })
    };

    let state = OnboardingRouteState::new(factory, profiles);
    state.spawn_idle_sweeper(server_config.session_ttl);
    eprintln!(
        "   Idle sessions dropped after {}s",
        server_config.session_ttl.as_secs()
    );

    let app = onboarding_routes(state).layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", server_config.port)).await?;
    tracing::info!(port = server_config.port, "Onboarding server started");
    axum::serve(listener, app).await?;

    Ok(())
}
