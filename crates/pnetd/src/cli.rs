use std::net::SocketAddr;

use clap::{Parser, Subcommand};
use pnet_common::Addr;

#[derive(Parser)]
#[command(name = "pnetd", about = "Playground overlay network daemon")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run a LAN switch: accepts link sessions from VNICs and other
    /// switches, forwarding `WirePacket`s by registered address.
    Switch {
        #[arg(long, default_value = "127.0.0.1:9100")]
        listen: SocketAddr,
    },
    /// Run a WAN router over one or more LAN switches, each with its own
    /// listen address, wired together by direct-connection edges.
    Wan {
        /// One LAN prefix and its listen address, as `PREFIX=HOST:PORT`.
        /// Repeatable; at least one is required.
        #[arg(long = "prefix", required = true)]
        prefixes: Vec<String>,
        /// An undirected direct-connection edge, as `PREFIX:PREFIX`.
        /// Repeatable.
        #[arg(long = "neighbor")]
        neighbors: Vec<String>,
        /// Per-packet random-drop probability applied uniformly to every
        /// direct link (0.0 disables loss).
        #[arg(long, default_value_t = 0.0)]
        routing_loss_rate: f64,
    },
    /// Run a VNIC for one host address: dials out to a switch/WAN link and
    /// accepts one local application control session.
    Vnic {
        /// This VNIC's overlay address, e.g. `1.2.3.4`.
        #[arg(long)]
        address: Addr,
        /// The switch or WAN prefix listener to dial as this VNIC's link.
        #[arg(long)]
        link: SocketAddr,
        #[arg(long, default_value = "127.0.0.1:9200")]
        control_listen: SocketAddr,
    },
}
