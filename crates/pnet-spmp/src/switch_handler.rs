//! Wires a [`Dispatcher`] into a `Switch`'s `on_extension` hook: decodes
//! `SpmpFrame`s arriving on any session, dispatches, and forwards the
//! response back down the same session.

use std::collections::HashSet;
use std::sync::Arc;

use pnet_packets::SpmpFrame;
use pnet_switch::{ExtensionHandler, SessionId, Switch};
use pnet_wire::Packet;

use crate::dispatcher::Dispatcher;

pub struct SwitchSpmpHandler {
    switch: Arc<Switch>,
    dispatcher: Dispatcher,
}

impl SwitchSpmpHandler {
    pub fn new(switch: Arc<Switch>, dispatcher: Dispatcher) -> Self {
        SwitchSpmpHandler { switch, dispatcher }
    }
}

impl ExtensionHandler for SwitchSpmpHandler {
    fn handle(&self, from: SessionId, packet: &dyn Packet, _raw: &[u8]) {
        let Some(frame) = packet.as_any().downcast_ref::<SpmpFrame>() else {
            return;
        };
        let response = self.dispatcher.dispatch(&frame.inner);
        let Ok(bytes) = pnet_wire::encode_frame(&SpmpFrame { inner: response }) else {
            return;
        };
        let mut targets = HashSet::new();
        targets.insert(from);
        self.switch.forward_raw(&targets, &bytes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pnet_packets::SpmpPacket;
    use pnet_wire::{decode_frame, encode_frame, Registry, Version};
    use tokio::sync::mpsc;

    #[test]
    fn handle_dispatches_and_replies_on_the_same_session() {
        let switch = Arc::new(Switch::new());
        let (tx, mut rx) = mpsc::unbounded_channel();
        switch.attach_session(7, tx);

        let mut dispatcher = Dispatcher::new();
        dispatcher.register("status", |_args| Ok("up".into()));
        let handler = SwitchSpmpHandler::new(switch, dispatcher);

        let request = SpmpFrame { inner: SpmpPacket::request(1, "status", vec![]) };
        let raw = encode_frame(&request).unwrap();
        handler.handle(7, &request, &raw);

        let reply_bytes = rx.try_recv().unwrap();
        let mut reg = Registry::new();
        reg.register_packet::<SpmpFrame, _>("SpmpFrame", Version::new(1, 0), SpmpFrame::decode_body)
            .unwrap();
        let (_, decoded) = decode_frame(&reply_bytes, &reg).unwrap();
        let reply = decoded.as_any().downcast_ref::<SpmpFrame>().unwrap();
        assert_eq!(reply.inner.request_id, 1);
        assert_eq!(reply.inner.result, "up");
    }
}
