//! Device/port synchronization engine between an Omada controller and a
//! publish/subscribe bus.
//!
//! - **[`SessionManager`]**: owns the OpenAPI tokens, resolves the site
//!   id, and renews the access token from a background task. Every remote
//!   call goes through it.
//!
//! - **[`StateCache`]**: the in-memory device → port tree; the single
//!   source of truth for everything published.
//!
//! - **[`InventoryPoller`]**: two schedules (device list, switch ports)
//!   that refresh the cache and emit [`Publication`]s.
//!
//! - **[`CommandExecutor`]**: applies PoE on/off commands as a guarded
//!   sequence of controller mutations, then reconciles.
//!
//! The bus itself stays outside: consumers implement [`Publisher`].

pub mod config;
pub mod convert;
pub mod error;
pub mod executor;
pub mod model;
pub mod poller;
pub mod publish;
pub mod session;
pub mod store;
pub mod topics;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::{ControllerConfig, RenewalPolicy, SyncConfig, TlsVerification};
pub use error::CoreError;
pub use executor::{CommandExecutor, CommandOutcome, CommandStep};
pub use model::{Device, DeviceType, PoeState, Port, normalize_name};
pub use poller::InventoryPoller;
pub use publish::{ChannelPublisher, DiscardPublisher, Publication, PublishError, Publisher};
pub use session::{SessionManager, SessionState};
pub use store::{DeviceEntry, StateCache};
pub use topics::{PortCommand, TopicError, Topics};
