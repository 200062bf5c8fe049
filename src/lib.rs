//! # wiz_lan
//!
//! Continuous discovery and state synchronization for Wiz smart lights on the
//! local network.
//!
//! Instead of polling bulbs at known addresses, this crate announces itself
//! on the LAN and lets devices come to it. Every device that answers is walked
//! through a short handshake (registration, system configuration, current
//! state) and from then on pushes its state to this process whenever it
//! changes.
//!
//! ## Quick Start
//!
//! ```no_run
//! use futures::StreamExt;
//! use wiz_lan::{HueSaturation, LanComm, LanEvent, LanOptions, Payload, StartOptions};
//!
//! async fn follow() -> Result<(), Box<dyn std::error::Error>> {
//!     let lan = LanComm::new(LanOptions::default())?;
//!     let mut events = lan.subscribe();
//!     lan.start(StartOptions::default()).await;
//!
//!     while let Some(event) = events.next().await {
//!         match event {
//!             LanEvent::Discover { hardware_id, device } => {
//!                 println!("found {} at {}", hardware_id, device.address());
//!                 if let Some(blue) = HueSaturation::create(170, 254) {
//!                     lan.set_state(&hardware_id, &Payload::from(&blue));
//!                 }
//!             }
//!             LanEvent::StateChange { hardware_id, changes, .. } => {
//!                 println!("{} changed: {:?}", hardware_id, changes);
//!             }
//!             LanEvent::End => break,
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Communication
//!
//! Devices listen on UDP port 38899 and push state reports to port 38900.
//! Everything this crate sends leaves from port 38899, so both ports must be
//! free on the host. A taken port is retried every 15 seconds.
//!
//! ## Runtime Selection
//!
//! This library is runtime-agnostic. Select your preferred runtime using feature flags:
//!
//! ### Using tokio (default)
//!
//! ```toml
//! [dependencies]
//! wiz-lan = "0.1"
//! tokio = { version = "1", features = ["rt-multi-thread", "macros"] }
//! ```
//!
//! ### Using async-std
//!
//! ```toml
//! [dependencies]
//! wiz-lan = { version = "0.1", default-features = false, features = ["runtime-async-std"] }
//! async-std = { version = "1.12", features = ["attributes"] }
//! ```
//!
//! ### Using smol
//!
//! ```toml
//! [dependencies]
//! wiz-lan = { version = "0.1", default-features = false, features = ["runtime-smol"] }
//! smol = "2"
//! ```
//!
//! ## Feature Flags
//!
//! - `runtime-tokio` (default): Use the tokio async runtime
//! - `runtime-async-std`: Use the async-std runtime
//! - `runtime-smol`: Use the smol runtime

mod config;
mod device;
mod engine;
mod errors;
mod events;
mod heartbeat;
mod lan;
mod network;
mod options;
mod payload;
pub mod runtime;
mod status;
pub mod translate;
mod transport;
mod types;

// Re-export public API
pub use config::{DeviceProfile, Feature, SystemConfig};
pub use device::{DiscoveredDevice, HandshakeState};
pub use errors::Error;
pub use events::LanEvent;
pub use lan::{LanComm, LanDiagnostics};
pub use network::{
    NetworkIdentity, NetworkInterface, choose_identity, list_interfaces, select_identity,
};
pub use options::{DEVICE_PORT, LISTEN_PORT, LanOptions, StartOptions};
pub use payload::{Payload, normalize_mac};
pub use status::DeviceState;
pub use types::{ColorRGBW, HueSaturation, hue_saturation_to_rgbw, rgbw_to_hue_saturation};
