//! The core packet catalog: concrete `pnet_wire::Packet` implementations
//! for every packet type exchanged on the overlay, plus
//! [`register_core`]/[`register_vnic`]/[`register_spmp`] to populate a
//! fresh [`pnet_wire::Registry`] at startup.

mod spmp;
mod switching;
mod vsocket;

pub use spmp::{SpmpFrame, SpmpPacket};
pub use switching::{AnnounceLink, FragData, WirePacket};
pub use vsocket::{
    ConnectData, ListenData, VnicConnectionSpawned, VnicPromiscuousLevel, VnicSocketClose,
    VnicSocketOpen, VnicSocketOpenResponse, VnicStartDump, VnicStopDump, ERROR_CODE_BUSY,
};

use pnet_wire::{DuplicateRegistration, Registry, Version};

/// Register `AnnounceLink` and `WirePacket`: every switch/WAN hop needs
/// both.
pub fn register_core(registry: &mut Registry) -> Result<(), DuplicateRegistration> {
    registry.register_packet::<AnnounceLink, _>("AnnounceLink", Version::new(1, 0), AnnounceLink::decode_body)?;
    registry.register_packet::<WirePacket, _>("WirePacket", Version::new(1, 0), WirePacket::decode_body)?;
    Ok(())
}

/// Register the `VNIC*` application-control packets, on top of whatever
/// `register_core` already added.
pub fn register_vnic(registry: &mut Registry) -> Result<(), DuplicateRegistration> {
    registry.register_packet::<VnicSocketOpen, _>(
        "VNICSocketOpen",
        Version::new(1, 0),
        VnicSocketOpen::decode_body,
    )?;
    registry.register_packet::<VnicSocketOpenResponse, _>(
        "VNICSocketOpenResponse",
        Version::new(1, 0),
        VnicSocketOpenResponse::decode_body,
    )?;
    registry.register_packet::<VnicConnectionSpawned, _>(
        "VNICConnectionSpawned",
        Version::new(1, 0),
        VnicConnectionSpawned::decode_body,
    )?;
    registry.register_packet::<VnicSocketClose, _>(
        "VNICSocketClose",
        Version::new(1, 0),
        VnicSocketClose::decode_body,
    )?;
    registry.register_packet::<VnicStartDump, _>(
        "VNICStartDump",
        Version::new(1, 0),
        VnicStartDump::decode_body,
    )?;
    registry.register_packet::<VnicStopDump, _>(
        "VNICStopDump",
        Version::new(1, 0),
        VnicStopDump::decode_body,
    )?;
    registry.register_packet::<VnicPromiscuousLevel, _>(
        "VNICPromiscuousLevel",
        Version::new(1, 0),
        VnicPromiscuousLevel::decode_body,
    )?;
    Ok(())
}

/// Register the SPMP envelope packet.
pub fn register_spmp(registry: &mut Registry) -> Result<(), DuplicateRegistration> {
    registry.register_packet::<SpmpFrame, _>("SpmpFrame", Version::new(1, 0), SpmpFrame::decode_body)?;
    Ok(())
}

/// All packet types this workspace knows about, in one registry.
pub fn register_all(registry: &mut Registry) -> Result<(), DuplicateRegistration> {
    register_core(registry)?;
    register_vnic(registry)?;
    register_spmp(registry)?;
    Ok(())
}
