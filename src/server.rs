use crate::{
    config::{ServerSettings, Settings},
    inference_service::InferenceService,
    model_service::ModelService,
    ort_service::OrtModelService,
    routes::api_routes,
};
use anyhow::Context;
use axum::{extract::DefaultBodyLimit, Router};
use tokio::{net::TcpListener, signal};

pub fn create_router<M: ModelService>(
    inference_service: InferenceService<M>,
    max_upload_bytes: usize,
) -> Router {
    Router::new()
        .merge(api_routes::<M>())
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(inference_service)
}

pub struct HttpServer {
    router: Router,
    listener: TcpListener,
}

impl HttpServer {
    pub async fn new(
        model_service: impl ModelService,
        config: &ServerSettings,
    ) -> anyhow::Result<Self> {
        let inference_service = InferenceService::new(model_service);
        let router = create_router(inference_service, config.max_upload_bytes);

        let addr = config.get_address();
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("failed to bind {}", addr))?;

        Ok(Self { router, listener })
    }

    pub async fn run(self) -> anyhow::Result<()> {
        tracing::info!("Inference service listening on {}", self.listener.local_addr()?);

        let shutdown = async {
            shutdown_signal().await;
            tracing::info!("Shutdown signal received, starting graceful shutdown")
        };

        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await?;

        Ok(())
    }
}

/// Loads the model, then binds and serves. A model that fails to load aborts
/// startup before any socket is opened.
pub async fn start_server(config: Settings) -> anyhow::Result<()> {
    let model_path = config.model.get_model_path();
    let ort_model_service = OrtModelService::new(&config.model)
        .with_context(|| format!("failed to load YOLO model from {}", model_path.display()))?;

    let http_server = HttpServer::new(ort_model_service, &config.server).await?;
    http_server.run().await?;

    tracing::info!("Inference service stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
