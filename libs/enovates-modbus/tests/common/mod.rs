//! ENO one Modbus TCP simulator for integration testing
//!
//! An in-memory holding-register server speaking FC03, FC06 and FC16.
//! Registers that were never defined answer with exception 0x02 (illegal
//! data address), and only registers marked writable accept writes.

#![allow(dead_code)]
#![allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable

use enovates_modbus::bytes::{i32_to_regs, padded_string_to_regs, u32_to_regs};
use enovates_modbus::ClientConfig;
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::RwLock;
use tracing::debug;

const ILLEGAL_FUNCTION: u8 = 0x01;
const ILLEGAL_DATA_ADDRESS: u8 = 0x02;
const ILLEGAL_DATA_VALUE: u8 = 0x03;

#[derive(Default)]
struct DeviceState {
    holding_registers: RwLock<HashMap<u16, u16>>,
    writable: HashSet<u16>,
    connections: AtomicUsize,
    requests: AtomicUsize,
    /// Swallow requests without answering
    silent: AtomicBool,
}

/// Simulated charger; dropping it does not stop the server task
#[derive(Clone)]
pub struct DeviceSimulator {
    state: Arc<DeviceState>,
    addr: SocketAddr,
}

impl DeviceSimulator {
    /// ENO one reporting API 1.2
    pub async fn eno_one_v1_2() -> Self {
        Self::start(eno_one_registers(1, 2), [400]).await
    }

    /// ENO one reporting an API version the client does not support
    pub async fn eno_one_with_version(major: u16, minor: u16) -> Self {
        Self::start(eno_one_registers(major, minor), [400]).await
    }

    /// Bind to an ephemeral localhost port and serve `registers`
    pub async fn start(
        registers: HashMap<u16, u16>,
        writable: impl IntoIterator<Item = u16>,
    ) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(DeviceState {
            holding_registers: RwLock::new(registers),
            writable: writable.into_iter().collect(),
            ..Default::default()
        });

        let accept_state = Arc::clone(&state);
        tokio::spawn(async move {
            while let Ok((stream, peer)) = listener.accept().await {
                debug!("Simulator: connection from {}", peer);
                accept_state.connections.fetch_add(1, Ordering::SeqCst);
                let state = Arc::clone(&accept_state);
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(&state, stream).await {
                        debug!("Simulator: connection closed: {}", e);
                    }
                });
            }
        });

        Self { state, addr }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn client_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new(self.addr.ip().to_string(), self.addr.port());
        config.timeout_ms = 2000;
        config
    }

    pub fn connections(&self) -> usize {
        self.state.connections.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> usize {
        self.state.requests.load(Ordering::SeqCst)
    }

    /// Stop (or resume) answering requests; open connections stay up
    pub fn set_silent(&self, silent: bool) {
        self.state.silent.store(silent, Ordering::SeqCst);
    }

    pub async fn register(&self, address: u16) -> Option<u16> {
        self.state
            .holding_registers
            .read()
            .await
            .get(&address)
            .copied()
    }

    pub async fn set_register(&self, address: u16, value: u16) {
        self.state
            .holding_registers
            .write()
            .await
            .insert(address, value);
    }
}

async fn handle_connection(state: &DeviceState, mut stream: TcpStream) -> std::io::Result<()> {
    loop {
        // MBAP header: transaction, protocol, length, unit
        let mut header = [0u8; 7];
        stream.read_exact(&mut header).await?;
        let transaction_id = u16::from_be_bytes([header[0], header[1]]);
        let length = u16::from_be_bytes([header[4], header[5]]);
        let unit_id = header[6];

        let mut pdu = vec![0u8; usize::from(length.saturating_sub(1))];
        stream.read_exact(&mut pdu).await?;
        state.requests.fetch_add(1, Ordering::SeqCst);
        if state.silent.load(Ordering::SeqCst) {
            debug!("Simulator: dropping request {} unanswered", transaction_id);
            continue;
        }

        let response_pdu = match process_pdu(state, &pdu).await {
            Ok(pdu) => pdu,
            Err(code) => vec![pdu.first().copied().unwrap_or(0) | 0x80, code],
        };

        let mut frame = Vec::with_capacity(7 + response_pdu.len());
        frame.extend_from_slice(&transaction_id.to_be_bytes());
        frame.extend_from_slice(&[0x00, 0x00]);
        frame.extend_from_slice(&(response_pdu.len() as u16 + 1).to_be_bytes());
        frame.push(unit_id);
        frame.extend_from_slice(&response_pdu);
        stream.write_all(&frame).await?;
    }
}

fn word(pdu: &[u8], offset: usize) -> Result<u16, u8> {
    pdu.get(offset..offset + 2)
        .map(|b| u16::from_be_bytes([b[0], b[1]]))
        .ok_or(ILLEGAL_DATA_VALUE)
}

async fn process_pdu(state: &DeviceState, pdu: &[u8]) -> Result<Vec<u8>, u8> {
    let function_code = *pdu.first().ok_or(ILLEGAL_FUNCTION)?;
    match function_code {
        0x03 => {
            let start = word(pdu, 1)?;
            let count = word(pdu, 3)?;
            if count == 0 || count > 125 {
                return Err(ILLEGAL_DATA_VALUE);
            }
            let registers = state.holding_registers.read().await;
            let mut response = vec![0x03, (count * 2) as u8];
            for offset in 0..count {
                let address = start.checked_add(offset).ok_or(ILLEGAL_DATA_ADDRESS)?;
                let value = registers.get(&address).ok_or(ILLEGAL_DATA_ADDRESS)?;
                response.extend_from_slice(&value.to_be_bytes());
            }
            Ok(response)
        },
        0x06 => {
            let address = word(pdu, 1)?;
            let value = word(pdu, 3)?;
            if !state.writable.contains(&address) {
                return Err(ILLEGAL_DATA_ADDRESS);
            }
            state.holding_registers.write().await.insert(address, value);
            Ok(pdu[..5].to_vec())
        },
        0x10 => {
            let start = word(pdu, 1)?;
            let count = word(pdu, 3)?;
            let byte_count = usize::from(*pdu.get(5).ok_or(ILLEGAL_DATA_VALUE)?);
            if count == 0 || byte_count != usize::from(count) * 2 {
                return Err(ILLEGAL_DATA_VALUE);
            }
            let addresses: Vec<u16> = (0..count)
                .map(|offset| start.checked_add(offset).ok_or(ILLEGAL_DATA_ADDRESS))
                .collect::<Result<_, _>>()?;
            if !addresses.iter().all(|a| state.writable.contains(a)) {
                return Err(ILLEGAL_DATA_ADDRESS);
            }
            let mut registers = state.holding_registers.write().await;
            for (i, address) in addresses.into_iter().enumerate() {
                registers.insert(address, word(pdu, 6 + i * 2)?);
            }
            Ok(pdu[..5].to_vec())
        },
        _ => Err(ILLEGAL_FUNCTION),
    }
}

fn put(registers: &mut HashMap<u16, u16>, address: u16, words: &[u16]) {
    for (i, value) in words.iter().enumerate() {
        registers.insert(address + i as u16, *value);
    }
}

fn put_string(registers: &mut HashMap<u16, u16>, address: u16, text: &str, size: u16) {
    put(registers, address, &padded_string_to_regs(text, size).unwrap());
}

/// Register contents of a charger mid-session
pub fn eno_one_registers(major: u16, minor: u16) -> HashMap<u16, u16> {
    let mut r = HashMap::new();
    put(&mut r, 0, &[major, minor]);

    // phases, max A, ocpp, load shedding, lock (none), contactor, led (pink)
    put(&mut r, 50, &[3, 16, 0, 1, 2, 0, 6]);

    put(
        &mut r,
        200,
        &[4234, 4645, 4589, 235, 222, 250, 11000, 3000, 3400, 4600],
    );
    put(&mut r, 210, &u32_to_regs(0xFFFF_E4A8));
    put(&mut r, 212, &i32_to_regs(8000));
    put(&mut r, 214, &i32_to_regs(0));
    put(&mut r, 216, &u32_to_regs(0x300F_CAFE));

    put(&mut r, 300, &[8]);
    put_string(&mut r, 301, "Q5", 2);
    put(&mut r, 303, &[8000, 750, 16, 12, 0]);

    put(&mut r, 400, &[7000]);
    put_string(&mut r, 401, "AtEsTtOkEn 007", 16);
    put(&mut r, 417, &[9001]);

    put_string(&mut r, 5000, "Enovates TEST", 16);
    put_string(&mut r, 5016, "Pytest Mock Vendor", 16);
    put_string(&mut r, 5032, &"7".repeat(32), 16);
    put_string(&mut r, 5048, "ENO one 479", 16);
    put_string(&mut r, 5064, "2.15.1.0@3.3.0.1.3", 16);
    r
}
