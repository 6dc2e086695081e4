/*!
# Overlay Node

Runs one overlay node until Ctrl-C or SIGTERM.

## Help

```bash
overlay_rust --help
```

## Example Usage

```bash
overlay_rust --config config
```

## Dev

To run from source:

```bash
cargo run -- --config config
```
*/

use clap::{App, Arg};
use overlay_rust::config::NodeConfig;
use overlay_rust::networking::signals::signal_for_shutdown;
use overlay_rust::Node;
use tracing::info;

#[tokio::main]
pub async fn main() -> overlay_rust::Result<()> {
    tracing_subscriber::fmt::init();

    let matches = App::new("Overlay Node")
        .about("Runs a node of the overlay network")
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .takes_value(true)
                .help("config file name"),
        )
        .get_matches();

    let config_name = match matches.value_of("config") {
        Some(name) => name,
        None => "config",
    };
    let config = NodeConfig::load(config_name)?;

    let node = Node::start(config).await?;
    info!("identity {}", node.identifier());
    info!("public key {}", hex::encode(node.public_key().serialize()));

    signal_for_shutdown().await;
    info!("shutting down");
    node.shutdown().await;
    Ok(())
}
