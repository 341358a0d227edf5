// ── Shared state ──

mod cache;

pub use cache::{DeviceEntry, PortGate, StateCache, SwitchRef};
