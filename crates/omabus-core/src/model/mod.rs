// ── Domain model ──

pub mod device;
pub mod port;

pub use device::{Device, DeviceType, normalize_name};
pub use port::{PoeState, Port};
