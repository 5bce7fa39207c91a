//! Wires a [`Dispatcher`] into a `Vnic`'s `on_extension` hook: decodes
//! `SpmpFrame`s arriving on the VNIC's link session and replies on the same
//! link.

use std::sync::Arc;

use pnet_packets::SpmpFrame;
use pnet_vnic::{ExtensionHandler, Vnic};
use pnet_wire::Packet;

use crate::dispatcher::Dispatcher;

pub struct VnicSpmpHandler {
    vnic: Arc<Vnic>,
    dispatcher: Dispatcher,
}

impl VnicSpmpHandler {
    pub fn new(vnic: Arc<Vnic>, dispatcher: Dispatcher) -> Self {
        VnicSpmpHandler { vnic, dispatcher }
    }
}

impl ExtensionHandler for VnicSpmpHandler {
    fn handle(&self, packet: &dyn Packet, _raw: &[u8]) {
        let Some(frame) = packet.as_any().downcast_ref::<SpmpFrame>() else {
            return;
        };
        let response = self.dispatcher.dispatch(&frame.inner);
        self.vnic.send_on_link(&SpmpFrame { inner: response });
    }
}
