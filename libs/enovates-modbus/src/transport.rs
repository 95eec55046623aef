//! Transport seam
//!
//! The client only needs two Modbus operations: read and write a contiguous
//! range of holding registers. [`ModbusTransport`] captures that, and
//! [`Connector`] creates a fresh transport whenever the client needs a link.
//! The production implementation runs Modbus TCP through `tokio-modbus`.

use async_trait::async_trait;
use std::net::SocketAddr;
use std::time::Duration;
use tokio_modbus::client::{Client, Context, Reader, Writer};
use tokio_modbus::slave::{Slave, SlaveContext};
use tracing::{debug, trace};

use crate::config::ClientConfig;
use crate::error::{Error, Result};

/// Holding-register access to one Modbus device
#[async_trait]
pub trait ModbusTransport: Send {
    /// FC03: read `count` registers starting at `address`
    async fn read_holding_registers(
        &mut self,
        unit_id: u8,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>>;

    /// FC16: write `values` starting at `address`
    async fn write_holding_registers(
        &mut self,
        unit_id: u8,
        address: u16,
        values: &[u16],
    ) -> Result<()>;

    /// Release the underlying connection
    async fn close(&mut self) -> Result<()>;
}

/// Factory for transports
#[async_trait]
pub trait Connector: Send + Sync {
    type Transport: ModbusTransport;

    /// Open a new link to the device
    async fn connect(&self) -> Result<Self::Transport>;
}

/// Opens Modbus TCP links described by a [`ClientConfig`]
#[derive(Debug, Clone)]
pub struct TcpConnector {
    config: ClientConfig,
}

impl TcpConnector {
    pub fn new(config: ClientConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Connector for TcpConnector {
    type Transport = TcpTransport;

    async fn connect(&self) -> Result<TcpTransport> {
        let peer = self.config.socket_addr().await?;
        let timeout = self.config.timeout();
        let slave = Slave(self.config.unit_id);

        debug!("Connecting to {} (unit {})", peer, self.config.unit_id);
        let ctx = tokio::time::timeout(timeout, tokio_modbus::client::tcp::connect_slave(peer, slave))
            .await
            .map_err(|_| Error::timeout(format!("connect to {} after {:?}", peer, timeout)))??;

        Ok(TcpTransport { ctx, peer, timeout })
    }
}

/// Modbus TCP link backed by a `tokio-modbus` client context
pub struct TcpTransport {
    ctx: Context,
    peer: SocketAddr,
    timeout: Duration,
}

impl std::fmt::Debug for TcpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpTransport")
            .field("peer", &self.peer)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[async_trait]
impl ModbusTransport for TcpTransport {
    async fn read_holding_registers(
        &mut self,
        unit_id: u8,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>> {
        trace!("FC03 unit={} address={} count={}", unit_id, address, count);
        self.ctx.set_slave(Slave(unit_id));
        let response = tokio::time::timeout(self.timeout, self.ctx.read_holding_registers(address, count))
            .await
            .map_err(|_| {
                Error::timeout(format!("read {} registers at {} from {}", count, address, self.peer))
            })?;
        Ok(response??)
    }

    async fn write_holding_registers(
        &mut self,
        unit_id: u8,
        address: u16,
        values: &[u16],
    ) -> Result<()> {
        trace!("FC16 unit={} address={} count={}", unit_id, address, values.len());
        self.ctx.set_slave(Slave(unit_id));
        let response = tokio::time::timeout(
            self.timeout,
            self.ctx.write_multiple_registers(address, values),
        )
        .await
        .map_err(|_| {
            Error::timeout(format!("write {} registers at {} to {}", values.len(), address, self.peer))
        })?;
        Ok(response??)
    }

    async fn close(&mut self) -> Result<()> {
        debug!("Closing connection to {}", self.peer);
        self.ctx.disconnect().await?;
        Ok(())
    }
}
