mod error;

use std::net::SocketAddr;
use std::sync::Arc;

use llm::telemetry::{LogSink, NoopSink, TelemetrySink};
use tokio::net::TcpListener;

pub use error::Error;

pub(crate) type Result<T> = std::result::Result<T, Error>;

pub struct ServeConfig {
    pub listen_address: SocketAddr,
    pub config: config::Config,
}

/// Bind the listener and run the gateway until the process exits.
pub async fn serve(ServeConfig { listen_address, config }: ServeConfig) -> crate::Result<()> {
    let telemetry: Arc<dyn TelemetrySink> = if config.log_requests {
        Arc::new(LogSink)
    } else {
        Arc::new(NoopSink)
    };

    let app = llm::router(config, telemetry);

    let listener = TcpListener::bind(listen_address).await.map_err(Error::Bind)?;

    log::info!("Messages endpoint available at: http://{listen_address}/v1/messages");

    axum::serve(listener, app).await.map_err(Error::Server)?;

    Ok(())
}
