//! Enovates ENO one Modbus client
//!
//! Typed access to the Modbus register map of the Enovates ENO one
//! charge-point controller (Modbus API 1.2).
//!
//! # Architecture
//!
//! - **Register Map**: Static table of every field (address, width, encoding, access)
//! - **Codec**: Register words to Rust values and back
//! - **Client**: Connection handling and one typed accessor per record group
//! - **Version Gate**: Exact API version match before trusting the layout
//! - **Transport**: Modbus TCP via `tokio-modbus`, behind a trait for testing
//!
//! # Example
//!
//! ```no_run
//! use enovates_modbus::{ClientConfig, EnoOneClient};
//!
//! # async fn run() -> enovates_modbus::Result<()> {
//! let client = EnoOneClient::connect(ClientConfig::new("192.168.1.50", 502)).await?;
//! if client.check_version().await? {
//!     let measurements = client.get_measurements().await?;
//!     println!("L1: {} mA", measurements.current_l1);
//!     client.set_ems_limit(6000).await?;
//! }
//! client.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod bytes;
pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod register_map;
pub mod transport;
pub mod types;
pub mod version;

pub use client::{EnoOneClient, Link, TransportHandle};
pub use codec::{FieldValue, FromRegisters, RegisterBlock};
pub use config::ClientConfig;
pub use error::{Error, Result};
pub use register_map::{Access, FieldKind, RecordGroup, RegisterField, RegisterMap, Span, ENO_ONE};
pub use transport::{Connector, ModbusTransport, TcpConnector, TcpTransport};
pub use types::{
    ApiVersion, ChargerSnapshot, ChargerState, Diagnostics, LedColor, LockState, Measurements,
    Mode3Details, Mode3State, RegisterEnum, TransactionToken,
};
pub use version::{VersionState, SUPPORTED_API_VERSION};
