//! Host-side driver for Alluris USB force gauges (FMI-S/B/W) and test stands
//! (FMT, CTT, TTT).
//!
//! The crate never discovers or opens devices. Hand it an already-claimed
//! interface wrapped in [`UsbTransport`] (or any other [`Transport`]) and
//! drive the instrument through [`Device`]:
//!
//! ```no_run
//! use alluris::{Device, UsbTransport, TransferKind};
//!
//! # fn run(interface: nusb::Interface) -> Result<(), alluris::Error> {
//! let transport = UsbTransport::new(&interface, TransferKind::Interrupt)?;
//! let mut gauge = Device::new(transport);
//!
//! gauge.tare()?;
//! println!("F = {} digits", gauge.value()?);
//! println!("{}", gauge.read_state(None)?);
//! # Ok(())
//! # }
//! ```
//!
//! Layering, bottom-up: [`frame`] (wire codec), [`session`] (timeout-bounded
//! transfers on two endpoints), [`engine`] (one request/response exchange and
//! error classification), [`status`], [`cyclic`] (streaming measurement) and
//! [`device`] (the instrument operations).

pub mod config;
pub mod constants;
pub mod cyclic;
pub mod device;
pub mod engine;
pub mod error;
pub mod frame;
pub mod opcode;
pub mod session;
pub mod settings;
pub mod status;
pub mod usb;

pub use config::{DebugLevel, DeviceConfig, SessionConfig};
pub use cyclic::{CyclicConfig, CyclicMeasurement, CyclicState, SampleBuffer};
pub use device::Device;
pub use engine::Engine;
pub use error::{Error, ErrorKind, Malformation, TransportError};
pub use frame::{Command, DecodedReply, ReplyStatus};
pub use opcode::{Opcode, Width};
pub use session::{Session, Transport};
pub use settings::{FirmwareVersion, KeyMask, MemoryMode, MemoryStatistics, Mode, ReplyValue, Unit, Variant};
pub use status::DeviceStatus;
pub use usb::{TransferKind, UsbTransport};
