/*
    A broadcast node. Clients submit integers to any node; every node gossips
    what it knows to its neighbors until each neighbor has confirmed it, and a
    periodic anti-entropy tick resends anything whose confirmation was lost.
    Given a connected topology and a lossy but not hopeless network, every
    message eventually reaches every node.
*/

use gossip_broadcast::{
    common::{config::Config, error::Result, logging},
    network::stdio,
};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env();
    logging::init(&config);
    info!(?config, "starting broadcast node");

    stdio::run(config).await
}
