//! ENO one device client
//!
//! [`EnoOneClient`] turns register reads into typed records. It owns exactly
//! one transport handle, opened lazily on first use and kept until
//! [`EnoOneClient::close`] (or drop). Every logical operation holds the
//! handle's lock for its whole request/response exchange, so concurrent
//! callers on the same client never interleave on the wire.
//!
//! Callers are expected to run [`EnoOneClient::check_version`] first; the
//! register layout is only valid for
//! [`SUPPORTED_API_VERSION`](crate::version::SUPPORTED_API_VERSION). Once the
//! check has failed on a connection every record accessor refuses with
//! [`Error::Incompatible`] unless a version override is set. With
//! `enforce_version_check` enabled the accessors also refuse while the
//! connection is still unchecked.

use futures::future::BoxFuture;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use crate::codec::{self, FromRegisters, RegisterBlock};
use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::register_map::{fields, RecordGroup, RegisterField, RegisterMap, Span, ENO_ONE};
use crate::transport::{Connector, ModbusTransport, TcpConnector};
use crate::types::{
    ApiVersion, ChargerSnapshot, ChargerState, Diagnostics, Measurements, Mode3Details,
    TransactionToken,
};
use crate::version::VersionState;

/// Shared handle to the client's transport
pub type TransportHandle<T> = Arc<Mutex<Link<T>>>;

/// One open connection plus the state tied to it
#[derive(Debug)]
pub struct Link<T> {
    transport: T,
    version: VersionState,
    /// Set while an exchange is on the wire; still set afterwards if the
    /// exchange was cancelled or failed in a way that may desync the stream
    dirty: bool,
}

impl<T> Link<T> {
    fn new(transport: T) -> Self {
        Self {
            transport,
            version: VersionState::Unchecked,
            dirty: false,
        }
    }

    pub fn version_state(&self) -> VersionState {
        self.version
    }
}

impl<T: ModbusTransport> Link<T> {
    async fn read(&mut self, unit_id: u8, span: Span) -> Result<RegisterBlock> {
        self.dirty = true;
        let result = self
            .transport
            .read_holding_registers(unit_id, span.address, span.count)
            .await;
        self.settle(&result);
        RegisterBlock::new(span, result?)
    }

    async fn write(&mut self, unit_id: u8, address: u16, values: &[u16]) -> Result<()> {
        self.dirty = true;
        let result = self
            .transport
            .write_holding_registers(unit_id, address, values)
            .await;
        self.settle(&result);
        result
    }

    fn settle<V>(&mut self, result: &Result<V>) {
        self.dirty = matches!(result, Err(e) if e.poisons_link());
    }
}

/// Typed client for the ENO one charge-point controller
pub struct EnoOneClient<C: Connector = TcpConnector> {
    connector: C,
    unit_id: u8,
    enforce_version_check: bool,
    version_override: bool,
    map: &'static RegisterMap,
    handle: Mutex<Option<TransportHandle<C::Transport>>>,
}

impl<C: Connector> std::fmt::Debug for EnoOneClient<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnoOneClient")
            .field("unit_id", &self.unit_id)
            .field("enforce_version_check", &self.enforce_version_check)
            .field("version_override", &self.version_override)
            .finish()
    }
}

impl EnoOneClient<TcpConnector> {
    /// Build a Modbus TCP client without connecting yet
    pub fn from_config(config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let unit_id = config.unit_id;
        let enforce = config.enforce_version_check;
        Ok(Self::new(TcpConnector::new(config), unit_id)?.with_version_enforcement(enforce))
    }

    /// Build a Modbus TCP client and open the connection
    pub async fn connect(config: ClientConfig) -> Result<Self> {
        let client = Self::from_config(config)?;
        client.transport().await?;
        Ok(client)
    }
}

impl<C: Connector> EnoOneClient<C> {
    /// Create a client over any connector.
    ///
    /// Fails if the register table is inconsistent.
    pub fn new(connector: C, unit_id: u8) -> Result<Self> {
        ENO_ONE.validate()?;
        Ok(Self {
            connector,
            unit_id,
            enforce_version_check: false,
            version_override: false,
            map: &ENO_ONE,
            handle: Mutex::new(None),
        })
    }

    /// Refuse record accessors until `check_version` has passed
    pub fn with_version_enforcement(mut self, enforce: bool) -> Self {
        self.enforce_version_check = enforce;
        self
    }

    /// Let record accessors run even after the device reported an
    /// unsupported API version. Values are decoded with the 1.2 layout.
    pub fn with_version_override(mut self, allow: bool) -> Self {
        self.version_override = allow;
        self
    }

    pub fn unit_id(&self) -> u8 {
        self.unit_id
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    pub fn register_map(&self) -> &'static RegisterMap {
        self.map
    }

    /// The transport handle, connecting on first use.
    ///
    /// Repeated calls return the same handle until the client is closed.
    pub async fn transport(&self) -> Result<TransportHandle<C::Transport>> {
        let mut slot = self.handle.lock().await;
        if let Some(handle) = slot.as_ref() {
            return Ok(Arc::clone(handle));
        }

        let transport = self.connector.connect().await?;
        debug!("Opened transport for unit {}", self.unit_id);
        let handle = Arc::new(Mutex::new(Link::new(transport)));
        *slot = Some(Arc::clone(&handle));
        Ok(handle)
    }

    pub async fn is_connected(&self) -> bool {
        self.handle.lock().await.is_some()
    }

    /// Version gate state of the current connection
    pub async fn version_state(&self) -> VersionState {
        let handle = self.handle.lock().await.clone();
        match handle {
            Some(handle) => handle.lock().await.version,
            None => VersionState::Unchecked,
        }
    }

    /// Release the transport. The next accessor call reconnects.
    pub async fn close(&self) -> Result<()> {
        let Some(handle) = self.handle.lock().await.take() else {
            return Ok(());
        };

        let mut link = handle.lock().await;
        link.version = VersionState::Unchecked;
        if link.dirty {
            // Stream state unknown; dropping the transport tears it down
            return Ok(());
        }
        link.transport.close().await
    }

    /// Run `f` against the client, then close it on every exit path.
    ///
    /// An error from `f` takes precedence over an error from closing.
    pub async fn session<F, R>(self, f: F) -> Result<R>
    where
        F: for<'a> FnOnce(&'a Self) -> BoxFuture<'a, Result<R>>,
    {
        let outcome = f(&self).await;
        let closed = self.close().await;
        let value = outcome?;
        closed?;
        Ok(value)
    }

    /// Lock the link for one logical operation, replacing it first if the
    /// previous exchange never completed
    async fn lock_link(&self) -> Result<OwnedMutexGuard<Link<C::Transport>>> {
        let handle = self.transport().await?;
        let mut link = handle.lock_owned().await;
        if link.dirty {
            warn!(
                "Unit {}: previous exchange did not complete, reconnecting",
                self.unit_id
            );
            link.transport = self.connector.connect().await?;
            link.version = VersionState::Unchecked;
            link.dirty = false;
        }
        Ok(link)
    }

    /// A failed check always blocks; an unchecked link only blocks when
    /// enforcement is on
    fn gate(&self, link: &Link<C::Transport>) -> Result<()> {
        match link.version {
            VersionState::Compatible(_) => Ok(()),
            VersionState::Incompatible(_) if self.version_override => Ok(()),
            VersionState::Incompatible(_) => link.version.require_compatible(),
            VersionState::Unchecked if self.enforce_version_check => {
                link.version.require_compatible()
            },
            VersionState::Unchecked => Ok(()),
        }
    }

    async fn read_record<R: FromRegisters>(&self, link: &mut Link<C::Transport>) -> Result<R> {
        let span = self.map.span(R::GROUP)?;
        let block = link.read(self.unit_id, span).await?;
        R::from_registers(&block)
    }

    async fn read_u16(
        &self,
        link: &mut Link<C::Transport>,
        group: RecordGroup,
        field: &RegisterField,
    ) -> Result<u16> {
        let span = self.map.span(group)?;
        let block = link.read(self.unit_id, span).await?;
        block.u16(field)
    }

    async fn gated_record<R: FromRegisters>(&self) -> Result<R> {
        let mut link = self.lock_link().await?;
        self.gate(&link)?;
        self.read_record(&mut link).await
    }

    // ========================================================================
    // Compatibility gate
    // ========================================================================

    /// Read the API version and record whether this client supports it.
    ///
    /// Returns `true` only for an exact match with the supported version.
    /// The first verdict sticks for the lifetime of the connection and a
    /// later call that reads a different version returns `Ok(false)`.
    /// After a `false` verdict every record accessor fails with
    /// [`Error::Incompatible`] unless the client was built
    /// [`with_version_override`](Self::with_version_override).
    pub async fn check_version(&self) -> Result<bool> {
        let mut link = self.lock_link().await?;
        let version: ApiVersion = self.read_record(&mut link).await?;
        let verdict = VersionState::evaluate(version);

        let recorded = link.version;
        match recorded {
            VersionState::Unchecked => {
                link.version = verdict;
                if verdict.is_compatible() {
                    info!("Unit {}: API version {} supported", self.unit_id, version);
                } else {
                    warn!("Unit {}: API version {} not supported", self.unit_id, version);
                }
            },
            _ if recorded != verdict => {
                warn!(
                    "Unit {}: API version changed on the same connection: was {}, now {}",
                    self.unit_id, recorded, verdict
                );
                return Ok(false);
            },
            _ => {},
        }

        Ok(verdict.is_compatible())
    }

    /// Like [`check_version`](Self::check_version), but an unsupported
    /// version is an error
    pub async fn ensure_version(&self) -> Result<ApiVersion> {
        self.check_version().await?;
        let state = self.version_state().await;
        state.require_compatible()?;
        match state {
            VersionState::Compatible(version) => Ok(version),
            _ => Err(Error::incompatible(state.to_string())),
        }
    }

    // ========================================================================
    // Record accessors
    // ========================================================================

    /// Firmware Modbus API version; never cached
    pub async fn get_api_version(&self) -> Result<ApiVersion> {
        let mut link = self.lock_link().await?;
        self.read_record(&mut link).await
    }

    pub async fn get_state(&self) -> Result<ChargerState> {
        self.gated_record().await
    }

    pub async fn get_measurements(&self) -> Result<Measurements> {
        self.gated_record().await
    }

    pub async fn get_mode3_details(&self) -> Result<Mode3Details> {
        self.gated_record().await
    }

    pub async fn get_transaction_token(&self) -> Result<TransactionToken> {
        self.gated_record().await
    }

    pub async fn get_diagnostics(&self) -> Result<Diagnostics> {
        self.gated_record().await
    }

    /// EMS current limit in mA
    pub async fn get_ems_limit(&self) -> Result<u16> {
        let mut link = self.lock_link().await?;
        self.gate(&link)?;
        self.read_u16(&mut link, RecordGroup::EmsLimit, &fields::EMS_LIMIT)
            .await
    }

    /// Current offered to the vehicle in mA
    pub async fn get_current_offered(&self) -> Result<u16> {
        let mut link = self.lock_link().await?;
        self.gate(&link)?;
        self.read_u16(&mut link, RecordGroup::CurrentOffered, &fields::CURRENT_OFFERED)
            .await
    }

    /// Set the EMS current limit in mA.
    ///
    /// Issues a single write and does not read the value back; the device
    /// may need time before `get_ems_limit` reflects it.
    pub async fn set_ems_limit(&self, milliamps: u32) -> Result<()> {
        let words = codec::encode_u16_checked(&fields::EMS_LIMIT, milliamps)?;
        self.write_field(&fields::EMS_LIMIT, words).await
    }

    async fn write_field(&self, field: &RegisterField, words: Vec<u16>) -> Result<()> {
        if !field.is_writable() {
            return Err(Error::validation(format!("{} is read-only", field.name)));
        }
        let mut link = self.lock_link().await?;
        self.gate(&link)?;
        debug!("Unit {}: writing {} = {:?}", self.unit_id, field.name, words);
        link.write(self.unit_id, field.address, &words).await
    }

    /// Read every record while holding the link, for a consistent report
    pub async fn snapshot(&self) -> Result<ChargerSnapshot> {
        let mut link = self.lock_link().await?;
        self.gate(&link)?;

        Ok(ChargerSnapshot {
            api_version: self.read_record(&mut link).await?,
            state: self.read_record(&mut link).await?,
            measurements: self.read_record(&mut link).await?,
            mode3: self.read_record(&mut link).await?,
            ems_limit: self
                .read_u16(&mut link, RecordGroup::EmsLimit, &fields::EMS_LIMIT)
                .await?,
            transaction_token: self.read_record(&mut link).await?,
            current_offered: self
                .read_u16(&mut link, RecordGroup::CurrentOffered, &fields::CURRENT_OFFERED)
                .await?,
            diagnostics: self.read_record(&mut link).await?,
        })
    }
}
