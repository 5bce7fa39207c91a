//! Standalone daemon binary: runs exactly one of a switch, a WAN router, or
//! a VNIC as a long-lived TCP service, for exercising the library crates
//! without an embedding application.

mod cli;
mod frame_loop;
mod registry;
mod switch_daemon;
mod vnic_daemon;
mod wan_daemon;

use clap::Parser;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use cli::{Cli, Command};

fn init_logging() {
    let filter_layer = EnvFilter::builder()
        .with_default_directive(tracing::level_filters::LevelFilter::INFO.into())
        .from_env_lossy();
    tracing_subscriber::registry().with(filter_layer).with(fmt::layer()).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    let cli = Cli::parse();
    let registry = registry::build_registry();

    match cli.command {
        Command::Switch { listen } => switch_daemon::run_switch(listen, registry).await,
        Command::Wan {
            prefixes,
            neighbors,
            routing_loss_rate,
        } => {
            let prefixes = prefixes
                .iter()
                .map(|raw| wan_daemon::parse_prefix_spec(raw))
                .collect::<anyhow::Result<Vec<_>>>()?;
            let neighbors = neighbors
                .iter()
                .map(|raw| wan_daemon::parse_neighbor_edge(raw))
                .collect::<anyhow::Result<Vec<_>>>()?;
            wan_daemon::run_wan(prefixes, neighbors, routing_loss_rate, registry).await
        }
        Command::Vnic {
            address,
            link,
            control_listen,
        } => vnic_daemon::run_vnic(address, link, control_listen, registry).await,
    }
}
