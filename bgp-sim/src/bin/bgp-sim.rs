//! Binary entry point: parses `--as-number`/`--config`/`--base-port`,
//! resolves a simulation config, and spawns one [`Router`] actor plus its
//! listener task per AS, blocking until every task exits.

use bgp_sim::{Args, Router};
use clap::Parser;
use tracing_subscriber::EnvFilter;

fn install_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    install_tracing();

    let args = Args::parse();
    let config = args.resolve()?;

    tracing::info!(routers = config.routers.len(), "starting simulation");

    let mut handles = Vec::new();
    for topology in &config.routers {
        let router = Router::new(topology);
        let as_number = router.as_number;
        let (bgp_listen_port, _, _, _) = topology.ports();
        let sender = router.sender();

        handles.push(tokio::spawn(Router::listen(
            as_number,
            bgp_listen_port,
            sender,
        )));
        handles.push(tokio::spawn(router.event_loop()));
    }

    for handle in handles {
        handle.await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_default_to_ring_of_three() {
        let args = Args::parse_from(["bgp-sim"]);
        let config = args.resolve().unwrap();
        assert_eq!(config.routers.len(), 3);
    }
}
