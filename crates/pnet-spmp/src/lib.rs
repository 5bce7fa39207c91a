//! SPMP control channel: a verb-dispatch RPC carried over `SpmpFrame`,
//! wired into a `Switch` or `Vnic` through its `on_extension` hook.
//!
//! No CLI or shell front-end is provided here; callers build one (or send
//! `SpmpFrame`s directly) against the verb table.

mod dispatcher;
mod switch_handler;
mod vnic_handler;

pub use dispatcher::{AccessPolicy, AllowList, Dispatcher, Verb};
pub use switch_handler::SwitchSpmpHandler;
pub use vnic_handler::VnicSpmpHandler;
