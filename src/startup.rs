use crate::{
    app_state::AppState,
    configuration::{DatabaseSettings, Settings},
    request_id::RequestUuid,
    routes::{health_check, subscriber_count, subscriptions, test_email},
    telemetry::request_span,
};
use axum::Router;
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::CorsLayer,
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

pub struct Application {
    local_addr: SocketAddr,
    listener: TcpListener,
    app: Router,
}

impl Application {
    pub async fn build(config: Settings) -> Result<Self, anyhow::Error> {
        let db_pool = get_pg_connection_pool(&config.database);
        let email_client = config.email_client.client();

        let address = format!("{}:{}", config.application.host, config.application.port);
        let listener = TcpListener::bind(address).await?;
        let local_addr = listener.local_addr()?;

        let app = router(AppState {
            db_pool,
            email_client,
        });

        Ok(Self {
            local_addr,
            listener,
            app,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub async fn run_until_stopped(self) -> Result<(), std::io::Error> {
        tracing::info!("Listening on {}", self.local_addr);
        axum::serve(self.listener, self.app).await
    }
}

fn router(app_state: AppState) -> Router {
    Router::new()
        .merge(health_check::router())
        .merge(subscriptions::router())
        .merge(subscriber_count::router())
        .merge(test_email::router())
        .with_state(app_state)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(RequestUuid))
                .layer(TraceLayer::new_for_http().make_span_with(request_span))
                .layer(PropagateRequestIdLayer::x_request_id())
                // The signup form is served from a static host; every
                // endpoint accepts cross-origin requests.
                .layer(CorsLayer::permissive()),
        )
}

pub fn get_pg_connection_pool(config: &DatabaseSettings) -> PgPool {
    PgPoolOptions::new()
        .acquire_timeout(std::time::Duration::from_secs(2))
        .connect_lazy_with(config.with_db())
}
