use std::sync::Arc;

use pnet_wire::Registry;

/// Every packet type any subcommand needs to decode: core overlay packets,
/// the VNIC application-control plane, and SPMP.
pub fn build_registry() -> Arc<Registry> {
    let mut registry = Registry::new();
    pnet_packets::register_all(&mut registry).expect("built-in packet catalog has no internal collisions");
    Arc::new(registry)
}
