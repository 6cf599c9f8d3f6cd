use args::Args;
use clap::Parser;

mod args;
mod logger;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    logger::init(&args);

    let config = config::Config::from_env()?;

    log::info!("Starting crosswire on {}", args.listen_address);

    server::serve(server::ServeConfig {
        listen_address: args.listen_address,
        config,
    })
    .await?;

    Ok(())
}
