use yolo_classify::{
    config::{get_configuration, Environment},
    logging::setup_logging,
    start_server,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let environment = Environment::from_env().map_err(anyhow::Error::msg)?;
    let config = get_configuration(environment)?;
    setup_logging(config.log_level, environment);

    if let Err(e) = start_server(config).await {
        tracing::error!("Inference service failed: {:#}", e);
        return Err(e);
    }

    Ok(())
}
