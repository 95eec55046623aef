//! ENO one holding-register layout (API 1.2)
//!
//! Every field the client touches is declared here as a [`RegisterField`]
//! constant tagged with its [`RecordGroup`]. Records are read as one
//! contiguous [`Span`] derived from the table entries of their group;
//! [`RegisterMap::validate`] asserts the table is consistent before a client
//! is allowed to use it.

use std::collections::HashSet;
use std::fmt;

use crate::error::{Error, Result};

/// Maximum number of registers for FC03 (Read Holding Registers)
///
/// Response PDU: function code (1) + byte count (1) + N × 2 ≤ 253, so N ≤ 125.
pub const MODBUS_MAX_READ_REGISTERS: u16 = 125;

/// Maximum number of registers for FC16 (Write Multiple Registers)
///
/// Request PDU: 1 + 2 + 2 + 1 + N × 2 ≤ 253, so N ≤ 123.
pub const MODBUS_MAX_WRITE_REGISTERS: u16 = 123;

/// Encoding of a field inside its register span
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    /// One register, plain unsigned value
    Uint16,
    /// Two registers, first register holds the high 16 bits
    Int32Be { signed: bool },
    /// `registers` words holding `2 * registers` NUL-padded Latin-1 bytes
    PaddedString { registers: u16 },
    /// One register holding 0 (false) or 1 (true)
    BitField,
    /// One register holding a closed enumeration
    EnumU16,
}

impl FieldKind {
    /// Exact register length for the kind
    pub const fn registers(&self) -> u16 {
        match self {
            FieldKind::Uint16 | FieldKind::BitField | FieldKind::EnumU16 => 1,
            FieldKind::Int32Be { .. } => 2,
            FieldKind::PaddedString { registers } => *registers,
        }
    }
}

/// Whether the client may write a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Access {
    ReadOnly,
    ReadWrite,
}

/// Record a field belongs to; each group is read with one request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordGroup {
    ApiVersion,
    State,
    Measurements,
    Mode3,
    EmsLimit,
    TransactionToken,
    CurrentOffered,
    Diagnostics,
}

impl RecordGroup {
    pub const ALL: [RecordGroup; 8] = [
        RecordGroup::ApiVersion,
        RecordGroup::State,
        RecordGroup::Measurements,
        RecordGroup::Mode3,
        RecordGroup::EmsLimit,
        RecordGroup::TransactionToken,
        RecordGroup::CurrentOffered,
        RecordGroup::Diagnostics,
    ];
}

/// One named field of the register map
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegisterField {
    pub group: RecordGroup,
    pub name: &'static str,
    pub address: u16,
    pub kind: FieldKind,
    pub access: Access,
}

impl RegisterField {
    const fn new(group: RecordGroup, name: &'static str, address: u16, kind: FieldKind) -> Self {
        Self {
            group,
            name,
            address,
            kind,
            access: Access::ReadOnly,
        }
    }

    const fn writable(self) -> Self {
        Self {
            access: Access::ReadWrite,
            ..self
        }
    }

    /// Number of registers the field occupies
    pub const fn len(&self) -> u16 {
        self.kind.registers()
    }

    /// One past the last register of the field
    pub const fn end(&self) -> u32 {
        self.address as u32 + self.len() as u32
    }

    pub fn span(&self) -> Span {
        Span {
            address: self.address,
            count: self.len(),
        }
    }

    pub fn is_writable(&self) -> bool {
        self.access == Access::ReadWrite
    }
}

/// Contiguous register range `[address, address + count)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Span {
    pub address: u16,
    pub count: u16,
}

impl Span {
    /// Whether `field` lies entirely inside this span
    pub fn contains(&self, field: &RegisterField) -> bool {
        field.address >= self.address
            && field.end() <= u32::from(self.address) + u32::from(self.count)
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.address, u32::from(self.address) + u32::from(self.count))
    }
}

/// Field declarations
pub mod fields {
    use super::{FieldKind, RecordGroup, RegisterField};

    const U16: FieldKind = FieldKind::Uint16;
    const BIT: FieldKind = FieldKind::BitField;
    const ENUM: FieldKind = FieldKind::EnumU16;
    const I32: FieldKind = FieldKind::Int32Be { signed: true };
    const U32: FieldKind = FieldKind::Int32Be { signed: false };
    const STRING_16: FieldKind = FieldKind::PaddedString { registers: 16 };

    const fn version(name: &'static str, address: u16) -> RegisterField {
        RegisterField::new(RecordGroup::ApiVersion, name, address, U16)
    }

    const fn state(name: &'static str, address: u16, kind: FieldKind) -> RegisterField {
        RegisterField::new(RecordGroup::State, name, address, kind)
    }

    const fn measurement(name: &'static str, address: u16, kind: FieldKind) -> RegisterField {
        RegisterField::new(RecordGroup::Measurements, name, address, kind)
    }

    const fn mode3(name: &'static str, address: u16, kind: FieldKind) -> RegisterField {
        RegisterField::new(RecordGroup::Mode3, name, address, kind)
    }

    const fn diagnostic(name: &'static str, address: u16) -> RegisterField {
        RegisterField::new(RecordGroup::Diagnostics, name, address, STRING_16)
    }

    pub const API_VERSION_MAJOR: RegisterField = version("api_version_major", 0);
    pub const API_VERSION_MINOR: RegisterField = version("api_version_minor", 1);

    pub const NUMBER_OF_PHASES: RegisterField = state("number_of_phases", 50, U16);
    pub const MAX_AMP_PER_PHASE: RegisterField = state("max_amp_per_phase", 51, U16);
    pub const OCPP_STATE: RegisterField = state("ocpp_state", 52, BIT);
    pub const LOAD_SHEDDING_STATE: RegisterField = state("load_shedding_state", 53, BIT);
    pub const LOCK_STATE: RegisterField = state("lock_state", 54, ENUM);
    pub const CONTACTOR_STATE: RegisterField = state("contactor_state", 55, BIT);
    pub const LED_COLOR: RegisterField = state("led_color", 56, ENUM);

    pub const CURRENT_L1: RegisterField = measurement("current_l1", 200, U16);
    pub const CURRENT_L2: RegisterField = measurement("current_l2", 201, U16);
    pub const CURRENT_L3: RegisterField = measurement("current_l3", 202, U16);
    pub const VOLTAGE_L1: RegisterField = measurement("voltage_l1", 203, U16);
    pub const VOLTAGE_L2: RegisterField = measurement("voltage_l2", 204, U16);
    pub const VOLTAGE_L3: RegisterField = measurement("voltage_l3", 205, U16);
    pub const CHARGER_ACTIVE_POWER_TOTAL: RegisterField =
        measurement("charger_active_power_total", 206, U16);
    pub const CHARGER_ACTIVE_POWER_L1: RegisterField =
        measurement("charger_active_power_l1", 207, U16);
    pub const CHARGER_ACTIVE_POWER_L2: RegisterField =
        measurement("charger_active_power_l2", 208, U16);
    pub const CHARGER_ACTIVE_POWER_L3: RegisterField =
        measurement("charger_active_power_l3", 209, U16);
    pub const INSTALLATION_CURRENT_L1: RegisterField =
        measurement("installation_current_l1", 210, I32);
    pub const INSTALLATION_CURRENT_L2: RegisterField =
        measurement("installation_current_l2", 212, I32);
    pub const INSTALLATION_CURRENT_L3: RegisterField =
        measurement("installation_current_l3", 214, I32);
    pub const ACTIVE_ENERGY_IMPORT_TOTAL: RegisterField =
        measurement("active_energy_import_total", 216, U32);

    pub const MODE3_STATE: RegisterField = mode3("mode3_state", 300, ENUM);
    pub const MODE3_STATE_STR: RegisterField =
        mode3("mode3_state_str", 301, FieldKind::PaddedString { registers: 2 });
    pub const PWM_AMP: RegisterField = mode3("pwm_amp", 303, U16);
    pub const PWM: RegisterField = mode3("pwm", 304, U16);
    pub const PP: RegisterField = mode3("pp", 305, U16);
    pub const CP_POS: RegisterField = mode3("cp_pos", 306, U16);
    pub const CP_NEG: RegisterField = mode3("cp_neg", 307, U16);

    pub const EMS_LIMIT: RegisterField =
        RegisterField::new(RecordGroup::EmsLimit, "ems_limit", 400, U16).writable();
    pub const TRANSACTION_TOKEN: RegisterField = RegisterField::new(
        RecordGroup::TransactionToken,
        "transaction_token",
        401,
        STRING_16,
    );
    pub const CURRENT_OFFERED: RegisterField =
        RegisterField::new(RecordGroup::CurrentOffered, "current_offered", 417, U16);

    pub const MANUFACTURER: RegisterField = diagnostic("manufacturer", 5000);
    pub const VENDOR_ID: RegisterField = diagnostic("vendor_id", 5016);
    pub const SERIAL_NR: RegisterField = diagnostic("serial_nr", 5032);
    pub const MODEL_ID: RegisterField = diagnostic("model_id", 5048);
    pub const FIRMWARE_VERSION: RegisterField = diagnostic("firmware_version", 5064);
}

/// Static register table
#[derive(Debug, Clone, Copy)]
pub struct RegisterMap {
    fields: &'static [RegisterField],
}

/// The ENO one API 1.2 register table, sorted by address
pub static ENO_ONE: RegisterMap = RegisterMap {
    fields: &[
        fields::API_VERSION_MAJOR,
        fields::API_VERSION_MINOR,
        fields::NUMBER_OF_PHASES,
        fields::MAX_AMP_PER_PHASE,
        fields::OCPP_STATE,
        fields::LOAD_SHEDDING_STATE,
        fields::LOCK_STATE,
        fields::CONTACTOR_STATE,
        fields::LED_COLOR,
        fields::CURRENT_L1,
        fields::CURRENT_L2,
        fields::CURRENT_L3,
        fields::VOLTAGE_L1,
        fields::VOLTAGE_L2,
        fields::VOLTAGE_L3,
        fields::CHARGER_ACTIVE_POWER_TOTAL,
        fields::CHARGER_ACTIVE_POWER_L1,
        fields::CHARGER_ACTIVE_POWER_L2,
        fields::CHARGER_ACTIVE_POWER_L3,
        fields::INSTALLATION_CURRENT_L1,
        fields::INSTALLATION_CURRENT_L2,
        fields::INSTALLATION_CURRENT_L3,
        fields::ACTIVE_ENERGY_IMPORT_TOTAL,
        fields::MODE3_STATE,
        fields::MODE3_STATE_STR,
        fields::PWM_AMP,
        fields::PWM,
        fields::PP,
        fields::CP_POS,
        fields::CP_NEG,
        fields::EMS_LIMIT,
        fields::TRANSACTION_TOKEN,
        fields::CURRENT_OFFERED,
        fields::MANUFACTURER,
        fields::VENDOR_ID,
        fields::SERIAL_NR,
        fields::MODEL_ID,
        fields::FIRMWARE_VERSION,
    ],
};

impl RegisterMap {
    /// Build a map over an arbitrary table (validated separately)
    pub const fn new(fields: &'static [RegisterField]) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &'static [RegisterField] {
        self.fields
    }

    /// Look up a field by semantic name
    pub fn get(&self, name: &str) -> Option<&'static RegisterField> {
        self.fields.iter().find(|field| field.name == name)
    }

    /// Fields of `group`, in table order
    pub fn group_fields(
        &self,
        group: RecordGroup,
    ) -> impl Iterator<Item = &'static RegisterField> + 'static {
        let fields: &'static [RegisterField] = self.fields;
        fields.iter().filter(move |field| field.group == group)
    }

    /// Minimal contiguous span covering every field of `group`
    pub fn span(&self, group: RecordGroup) -> Result<Span> {
        let start = self
            .group_fields(group)
            .map(|field| field.address)
            .min()
            .ok_or_else(|| Error::config(format!("Record group {:?} has no fields", group)))?;
        let end = self.group_fields(group).map(RegisterField::end).max().unwrap_or(0);
        let count = u16::try_from(end - u32::from(start)).map_err(|_| {
            Error::config(format!("Record group {:?} span exceeds 65535 registers", group))
        })?;
        Ok(Span {
            address: start,
            count,
        })
    }

    /// Check table consistency.
    ///
    /// Verifies unique non-empty names, exact kind lengths, no overlapping
    /// entries, that every record group has at least one field and that every
    /// group span fits in one read request.
    pub fn validate(&self) -> Result<()> {
        let mut names = HashSet::new();
        for field in self.fields {
            if field.name.is_empty() {
                return Err(Error::config(format!(
                    "Register at address {} has no name",
                    field.address
                )));
            }
            if !names.insert(field.name) {
                return Err(Error::config(format!("Duplicate register name: {}", field.name)));
            }
            if field.len() == 0 {
                return Err(Error::config(format!(
                    "Register {} has zero length",
                    field.name
                )));
            }
            if field.end() > u32::from(u16::MAX) + 1 {
                return Err(Error::config(format!(
                    "Register {} runs past the end of the address space",
                    field.name
                )));
            }
            if field.is_writable() && field.len() > MODBUS_MAX_WRITE_REGISTERS {
                return Err(Error::config(format!(
                    "Writable register {} exceeds the write limit",
                    field.name
                )));
            }
        }

        let mut sorted: Vec<&RegisterField> = self.fields.iter().collect();
        sorted.sort_by_key(|field| field.address);
        for pair in sorted.windows(2) {
            if pair[0].end() > u32::from(pair[1].address) {
                return Err(Error::config(format!(
                    "Registers {} and {} overlap",
                    pair[0].name, pair[1].name
                )));
            }
        }

        for group in RecordGroup::ALL {
            let span = self.span(group)?;
            if span.count > MODBUS_MAX_READ_REGISTERS {
                return Err(Error::config(format!(
                    "Record group {:?} spans {} registers, read limit is {}",
                    group, span.count, MODBUS_MAX_READ_REGISTERS
                )));
            }
        }

        Ok(())
    }
}
