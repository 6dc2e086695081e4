/*!
# Overlay Command Line Interface

## Usage

```bash
overlaycli help [subcommand]
```

## Available subcommands

**keys**

generates a keypair and prints it with its identifier

**ping**

pings a node once and reports whether it answered

## Example

```bash
overlaycli ping --host 127.0.0.1 --port 5353
```

## Dev

```bash
cargo run --bin overlaycli -- keys
```
*/
use clap::{App, Arg};
use overlay_rust::config::NodeConfig;
use overlay_rust::keypair::Keypair;
use overlay_rust::networking::contact::Contact;
use overlay_rust::{Identifier, Node};
use std::net::IpAddr;
use std::time::Duration;

#[tokio::main]
pub async fn main() -> overlay_rust::Result<()> {
    let command_matches = App::new("Overlay Command Line Interface")
        .about("Keys and liveness checks for overlay nodes")
        .subcommand(App::new("keys").about("generates and prints a keypair"))
        .subcommand(
            App::new("ping")
                .about("pings a node")
                .arg(
                    Arg::with_name("host")
                        .long("host")
                        .takes_value(true)
                        .required(true)
                        .help("address of the node"),
                )
                .arg(
                    Arg::with_name("port")
                        .short("p")
                        .long("port")
                        .takes_value(true)
                        .required(true)
                        .help("udp port of the node"),
                )
                .arg(
                    Arg::with_name("tag")
                        .short("t")
                        .long("tag")
                        .takes_value(true)
                        .help("network tag, defaults to overlay"),
                )
                .arg(
                    Arg::with_name("timeout")
                        .long("timeout")
                        .takes_value(true)
                        .help("milliseconds to wait for the answer"),
                ),
        )
        .get_matches();

    if command_matches.subcommand_matches("keys").is_some() {
        let keypair = Keypair::new();
        println!("secret key : {}", hex::encode(&keypair.secret_key()[..]));
        println!("public key : {}", hex::encode(keypair.public_key().serialize()));
        println!("identifier : {}", keypair.identifier());
    }

    if let Some(matches) = command_matches.subcommand_matches("ping") {
        let host: IpAddr = matches.value_of("host").unwrap_or_default().parse()?;
        let port: u16 = matches.value_of("port").unwrap_or_default().parse()?;
        let mut config = NodeConfig {
            port: 0,
            ..NodeConfig::default()
        };
        if let Some(tag) = matches.value_of("tag") {
            config.network_tag = tag.to_string();
        }
        if let Some(timeout) = matches.value_of("timeout") {
            config.lookup_timeout = Duration::from_millis(timeout.parse()?);
        }

        let node = Node::start(config).await?;
        // the remote identifier is unknown until it answers
        let target = Contact::new(
            Identifier::random(),
            &node.config().network_tag,
            host,
            port,
        );
        if node.ping(&target).await {
            println!("{}:{} answered", host, port);
        } else {
            println!("{}:{} did not answer", host, port);
        }
        node.shutdown().await;
    }
    Ok(())
}
