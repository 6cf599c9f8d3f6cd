use std::net::SocketAddr;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "crosswire", version, about = "Anthropic Messages to OpenAI Responses translation gateway")]
pub struct Args {
    /// Address to listen on.
    #[arg(short, long, env = "CROSSWIRE_LISTEN", default_value = "127.0.0.1:8000")]
    pub listen_address: SocketAddr,

    /// Log filter, e.g. "info" or "llm=debug,server=debug".
    #[arg(long, env = "CROSSWIRE_LOG", default_value = "info")]
    pub log_filter: String,
}
