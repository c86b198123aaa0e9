use clap::Parser;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tracing::{error, info, info_span, warn, Instrument};

mod classifier;
mod config;
mod error;
mod logging;
mod message;
mod request;
mod resolver;
mod response;
mod session;
mod utils;

use config::ProxyConfig;
use error::Result;
use session::Session;
use utils::TcpUpstream;

/// A forwarding HTTP proxy. Browse to http://<listen>/<host>/<path>.
#[derive(Parser, Debug)]
#[command(name = "web-proxy")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Port to listen on
    #[arg(env = "PROXY_PORT", default_value_t = 7713)]
    port: u16,

    /// Address to bind
    #[arg(long, env = "PROXY_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Redirect hops followed per request before answering 502
    #[arg(long, default_value_t = config::DEFAULT_MAX_REDIRECTS)]
    max_redirects: usize,

    /// Upper bound on bytes read for one client request
    #[arg(long, default_value_t = 8192)]
    max_request_bytes: usize,

    /// Increase verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (only errors)
    #[arg(short, long)]
    quiet: bool,
}

impl Args {
    fn to_config(&self) -> ProxyConfig {
        ProxyConfig {
            listen: format!("{}:{}", self.host, self.port),
            max_redirects: self.max_redirects,
            max_request_bytes: self.max_request_bytes,
        }
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    if let Err(e) = logging::init_logging(logging::level_for(args.verbose, args.quiet)) {
        eprintln!("{}", e);
        std::process::exit(1);
    }

    let config = args.to_config();
    if let Err(e) = config.validate() {
        error!(error = %e, "refusing to start");
        std::process::exit(1);
    }

    if let Err(e) = main_loop(config).await {
        error!(error = %e, "proxy server error");
        std::process::exit(1);
    }
}

async fn main_loop(config: ProxyConfig) -> Result<()> {
    let listener = TcpListener::bind(config.listen.as_str()).await?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        listen = %config.listen,
        max_redirects = config.max_redirects,
        "process listening"
    );

    let config = Arc::new(config);
    loop {
        let (socket, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!(error = %e, "failed to accept connection");
                continue;
            }
        };
        let config = config.clone();
        tokio::spawn(process(socket, config).instrument(info_span!("session", %peer)));
    }
}

async fn process(mut socket: TcpStream, config: Arc<ProxyConfig>) {
    info!("connection established");
    let mut session = Session::new(TcpUpstream, &config);
    match session.handle(&mut socket).await {
        Ok(()) => info!(
            last_host = session.last_target_host().unwrap_or("-"),
            "client closed connection"
        ),
        Err(e) => warn!(error = %e, "session ended"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_args() {
        let args = Args::try_parse_from(["web-proxy"]).unwrap();
        assert_eq!(args.to_config(), ProxyConfig::default());
    }

    #[test]
    fn test_args_override_config() {
        let args = Args::try_parse_from([
            "web-proxy",
            "8888",
            "--host",
            "0.0.0.0",
            "--max-redirects",
            "3",
            "-vv",
        ])
        .unwrap();
        let config = args.to_config();
        assert_eq!(config.listen, "0.0.0.0:8888");
        assert_eq!(config.max_redirects, 3);
        assert_eq!(args.verbose, 2);
    }
}
