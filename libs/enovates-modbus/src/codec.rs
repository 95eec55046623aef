//! Register codec
//!
//! Pure conversions between raw register words and typed values. Nothing in
//! here performs I/O; every failure is a deterministic function of the input.

use crate::bytes::{
    i32_to_regs, padded_string_to_regs, regs_to_i32, regs_to_padded_string, regs_to_u32,
    u32_to_regs,
};
use crate::error::{Error, Result};
use crate::register_map::{fields, FieldKind, RecordGroup, RegisterField, Span};
use crate::types::{
    ApiVersion, ChargerState, Diagnostics, Measurements, Mode3Details, RegisterEnum,
    TransactionToken,
};

/// Decoded value of a single field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    U16(u16),
    I32(i32),
    U32(u32),
    Text(String),
    Bit(bool),
    /// Raw value of a closed enumeration
    Enum(u16),
}

/// Decode the words of exactly one field
pub fn decode(field: &RegisterField, words: &[u16]) -> Result<FieldValue> {
    if words.len() != usize::from(field.len()) {
        return Err(Error::decode(
            field.name,
            format!("expected {} registers, got {}", field.len(), words.len()),
        ));
    }

    let value = match field.kind {
        FieldKind::Uint16 => FieldValue::U16(words[0]),
        FieldKind::Int32Be { signed: true } => FieldValue::I32(regs_to_i32([words[0], words[1]])),
        FieldKind::Int32Be { signed: false } => FieldValue::U32(regs_to_u32([words[0], words[1]])),
        FieldKind::PaddedString { .. } => FieldValue::Text(regs_to_padded_string(words)),
        FieldKind::BitField => match words[0] {
            0 => FieldValue::Bit(false),
            1 => FieldValue::Bit(true),
            raw => {
                return Err(Error::decode(
                    field.name,
                    format!("unexpected raw value {} for a boolean flag", raw),
                ))
            },
        },
        FieldKind::EnumU16 => FieldValue::Enum(words[0]),
    };

    Ok(value)
}

/// Encode a value into the exact register words of one field
pub fn encode(field: &RegisterField, value: &FieldValue) -> Result<Vec<u16>> {
    let words = match (field.kind, value) {
        (FieldKind::Uint16, FieldValue::U16(v)) => vec![*v],
        (FieldKind::Int32Be { signed: true }, FieldValue::I32(v)) => i32_to_regs(*v).to_vec(),
        (FieldKind::Int32Be { signed: false }, FieldValue::U32(v)) => u32_to_regs(*v).to_vec(),
        (FieldKind::PaddedString { registers }, FieldValue::Text(text)) => {
            padded_string_to_regs(text, registers).ok_or_else(|| {
                Error::validation(format!(
                    "'{}' does not fit {} ({} Latin-1 bytes max)",
                    text,
                    field.name,
                    usize::from(registers) * 2
                ))
            })?
        },
        (FieldKind::BitField, FieldValue::Bit(v)) => vec![u16::from(*v)],
        (FieldKind::EnumU16, FieldValue::Enum(v)) => vec![*v],
        (kind, value) => {
            return Err(Error::validation(format!(
                "{:?} cannot be stored in {} ({:?})",
                value, field.name, kind
            )))
        },
    };
    Ok(words)
}

/// Validate a wide integer against a single-register unsigned field
pub fn encode_u16_checked(field: &RegisterField, value: u32) -> Result<Vec<u16>> {
    let narrow = u16::try_from(value).map_err(|_| {
        Error::validation(format!(
            "{} out of range for {} (0..={})",
            value,
            field.name,
            u16::MAX
        ))
    })?;
    encode(field, &FieldValue::U16(narrow))
}

/// Registers returned by one read, addressed from `start`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterBlock {
    start: u16,
    words: Vec<u16>,
}

impl RegisterBlock {
    /// Wrap a read response, rejecting short or over-long blocks
    pub fn new(span: Span, words: Vec<u16>) -> Result<Self> {
        if words.len() != usize::from(span.count) {
            return Err(Error::short_read(span.address, span.count, words.len()));
        }
        Ok(Self {
            start: span.address,
            words,
        })
    }

    pub fn span(&self) -> Span {
        Span {
            address: self.start,
            count: self.words.len() as u16,
        }
    }

    /// Words belonging to `field`
    pub fn slice(&self, field: &RegisterField) -> Result<&[u16]> {
        if !self.span().contains(field) {
            return Err(Error::config(format!(
                "Field {} is outside register block {}",
                field.name,
                self.span()
            )));
        }
        let offset = usize::from(field.address - self.start);
        Ok(&self.words[offset..offset + usize::from(field.len())])
    }

    pub fn decode(&self, field: &RegisterField) -> Result<FieldValue> {
        decode(field, self.slice(field)?)
    }

    pub fn u16(&self, field: &RegisterField) -> Result<u16> {
        match self.decode(field)? {
            FieldValue::U16(v) => Ok(v),
            other => Err(kind_mismatch(field, "u16", &other)),
        }
    }

    pub fn i32(&self, field: &RegisterField) -> Result<i32> {
        match self.decode(field)? {
            FieldValue::I32(v) => Ok(v),
            other => Err(kind_mismatch(field, "i32", &other)),
        }
    }

    pub fn u32(&self, field: &RegisterField) -> Result<u32> {
        match self.decode(field)? {
            FieldValue::U32(v) => Ok(v),
            other => Err(kind_mismatch(field, "u32", &other)),
        }
    }

    pub fn text(&self, field: &RegisterField) -> Result<String> {
        match self.decode(field)? {
            FieldValue::Text(v) => Ok(v),
            other => Err(kind_mismatch(field, "string", &other)),
        }
    }

    pub fn bit(&self, field: &RegisterField) -> Result<bool> {
        match self.decode(field)? {
            FieldValue::Bit(v) => Ok(v),
            other => Err(kind_mismatch(field, "bool", &other)),
        }
    }

    /// Decode a closed enumeration; unknown raw values are an error
    pub fn enumeration<E: RegisterEnum>(&self, field: &RegisterField) -> Result<E> {
        match self.decode(field)? {
            FieldValue::Enum(raw) => E::from_raw(raw).ok_or_else(|| {
                Error::decode(field.name, format!("unexpected raw value {}", raw))
            }),
            other => Err(kind_mismatch(field, "enum", &other)),
        }
    }
}

fn kind_mismatch(field: &RegisterField, wanted: &str, got: &FieldValue) -> Error {
    Error::config(format!(
        "Field {} is declared as {:?}, decoder asked for {} (got {:?})",
        field.name, field.kind, wanted, got
    ))
}

/// Record decoded from the register block of one [`RecordGroup`]
pub trait FromRegisters: Sized {
    const GROUP: RecordGroup;

    fn from_registers(block: &RegisterBlock) -> Result<Self>;
}

impl FromRegisters for ApiVersion {
    const GROUP: RecordGroup = RecordGroup::ApiVersion;

    fn from_registers(block: &RegisterBlock) -> Result<Self> {
        Ok(ApiVersion {
            major: block.u16(&fields::API_VERSION_MAJOR)?,
            minor: block.u16(&fields::API_VERSION_MINOR)?,
        })
    }
}

impl FromRegisters for ChargerState {
    const GROUP: RecordGroup = RecordGroup::State;

    fn from_registers(block: &RegisterBlock) -> Result<Self> {
        Ok(ChargerState {
            number_of_phases: block.u16(&fields::NUMBER_OF_PHASES)?,
            max_amp_per_phase: block.u16(&fields::MAX_AMP_PER_PHASE)?,
            ocpp_state: block.bit(&fields::OCPP_STATE)?,
            load_shedding_state: block.bit(&fields::LOAD_SHEDDING_STATE)?,
            lock_state: block.enumeration(&fields::LOCK_STATE)?,
            contactor_state: block.bit(&fields::CONTACTOR_STATE)?,
            led_color: block.enumeration(&fields::LED_COLOR)?,
        })
    }
}

impl FromRegisters for Measurements {
    const GROUP: RecordGroup = RecordGroup::Measurements;

    fn from_registers(block: &RegisterBlock) -> Result<Self> {
        Ok(Measurements {
            current_l1: block.u16(&fields::CURRENT_L1)?,
            current_l2: block.u16(&fields::CURRENT_L2)?,
            current_l3: block.u16(&fields::CURRENT_L3)?,
            voltage_l1: block.u16(&fields::VOLTAGE_L1)?,
            voltage_l2: block.u16(&fields::VOLTAGE_L2)?,
            voltage_l3: block.u16(&fields::VOLTAGE_L3)?,
            charger_active_power_total: block.u16(&fields::CHARGER_ACTIVE_POWER_TOTAL)?,
            charger_active_power_l1: block.u16(&fields::CHARGER_ACTIVE_POWER_L1)?,
            charger_active_power_l2: block.u16(&fields::CHARGER_ACTIVE_POWER_L2)?,
            charger_active_power_l3: block.u16(&fields::CHARGER_ACTIVE_POWER_L3)?,
            installation_current_l1: block.i32(&fields::INSTALLATION_CURRENT_L1)?,
            installation_current_l2: block.i32(&fields::INSTALLATION_CURRENT_L2)?,
            installation_current_l3: block.i32(&fields::INSTALLATION_CURRENT_L3)?,
            active_energy_import_total: block.u32(&fields::ACTIVE_ENERGY_IMPORT_TOTAL)?,
        })
    }
}

impl FromRegisters for Mode3Details {
    const GROUP: RecordGroup = RecordGroup::Mode3;

    fn from_registers(block: &RegisterBlock) -> Result<Self> {
        Ok(Mode3Details {
            state_num: block.enumeration(&fields::MODE3_STATE)?,
            state_str: block.text(&fields::MODE3_STATE_STR)?,
            pwm_amp: block.u16(&fields::PWM_AMP)?,
            pwm: block.u16(&fields::PWM)?,
            pp: block.u16(&fields::PP)?,
            cp_pos: block.u16(&fields::CP_POS)?,
            cp_neg: block.u16(&fields::CP_NEG)?,
        })
    }
}

impl FromRegisters for TransactionToken {
    const GROUP: RecordGroup = RecordGroup::TransactionToken;

    fn from_registers(block: &RegisterBlock) -> Result<Self> {
        Ok(TransactionToken {
            transaction_token: block.text(&fields::TRANSACTION_TOKEN)?,
        })
    }
}

impl FromRegisters for Diagnostics {
    const GROUP: RecordGroup = RecordGroup::Diagnostics;

    fn from_registers(block: &RegisterBlock) -> Result<Self> {
        Ok(Diagnostics {
            manufacturer: block.text(&fields::MANUFACTURER)?,
            vendor_id: block.text(&fields::VENDOR_ID)?,
            serial_nr: block.text(&fields::SERIAL_NR)?,
            model_id: block.text(&fields::MODEL_ID)?,
            firmware_version: block.text(&fields::FIRMWARE_VERSION)?,
        })
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::register_map::ENO_ONE;
    use crate::types::{LedColor, LockState, Mode3State};
    use proptest::prelude::*;
    use proptest::test_runner::TestCaseError;

    fn block(group: RecordGroup, words: Vec<u16>) -> RegisterBlock {
        RegisterBlock::new(ENO_ONE.span(group).unwrap(), words).unwrap()
    }

    #[test]
    fn test_int32_decoding() {
        let signed = fields::INSTALLATION_CURRENT_L1;
        let unsigned = fields::ACTIVE_ENERGY_IMPORT_TOTAL;
        assert_eq!(decode(&signed, &[0xFFFF, 0xE4A8]).unwrap(), FieldValue::I32(-7000));
        assert_eq!(
            decode(&unsigned, &[0x300F, 0xCAFE]).unwrap(),
            FieldValue::U32(806_341_374)
        );
        assert_eq!(encode(&signed, &FieldValue::I32(-1)).unwrap(), vec![0xFFFF, 0xFFFF]);
        assert_eq!(
            encode(&signed, &FieldValue::I32(i32::MAX)).unwrap(),
            vec![0x7FFF, 0xFFFF]
        );
    }

    #[test]
    fn test_roundtrip_per_kind() {
        let cases = [
            (fields::EMS_LIMIT, FieldValue::U16(4000)),
            (fields::INSTALLATION_CURRENT_L2, FieldValue::I32(-1)),
            (fields::INSTALLATION_CURRENT_L3, FieldValue::I32(2_147_483_647)),
            (fields::ACTIVE_ENERGY_IMPORT_TOTAL, FieldValue::U32(u32::MAX)),
            (fields::MODE3_STATE_STR, FieldValue::Text("Q5".to_string())),
            (fields::TRANSACTION_TOKEN, FieldValue::Text("AtEsTtOkEn 007".to_string())),
            (fields::OCPP_STATE, FieldValue::Bit(true)),
            (fields::LED_COLOR, FieldValue::Enum(6)),
        ];
        for (field, value) in cases {
            let words = encode(&field, &value).unwrap();
            assert_eq!(words.len(), usize::from(field.len()), "{}", field.name);
            assert_eq!(decode(&field, &words).unwrap(), value, "{}", field.name);
        }
    }

    #[test]
    fn test_string_keeps_trailing_spaces() {
        let field = fields::MODE3_STATE_STR;
        let words = encode(&field, &FieldValue::Text("Q ".to_string())).unwrap();
        assert_eq!(decode(&field, &words).unwrap(), FieldValue::Text("Q ".to_string()));
    }

    #[test]
    fn test_encode_rejects_oversized_string() {
        let err = encode(&fields::MODE3_STATE_STR, &FieldValue::Text("Q5X9Z".to_string()))
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_encode_rejects_kind_mismatch() {
        let err = encode(&fields::EMS_LIMIT, &FieldValue::I32(5)).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_encode_u16_checked() {
        assert_eq!(encode_u16_checked(&fields::EMS_LIMIT, 65_535).unwrap(), vec![0xFFFF]);
        let err = encode_u16_checked(&fields::EMS_LIMIT, 65_536).unwrap_err();
        assert!(matches!(err, Error::Validation(msg) if msg.contains("ems_limit")));
    }

    #[test]
    fn test_decode_rejects_bad_bool() {
        let err = decode(&fields::CONTACTOR_STATE, &[2]).unwrap_err();
        assert_eq!(
            err,
            Error::decode("contactor_state", "unexpected raw value 2 for a boolean flag")
        );
    }

    #[test]
    fn test_decode_rejects_wrong_length() {
        let err = decode(&fields::INSTALLATION_CURRENT_L1, &[0xFFFF]).unwrap_err();
        assert!(matches!(err, Error::Decode { field: "installation_current_l1", .. }));
    }

    #[test]
    fn test_block_rejects_short_read() {
        let span = ENO_ONE.span(RecordGroup::State).unwrap();
        let err = RegisterBlock::new(span, vec![0; 6]).unwrap_err();
        assert!(err.is_transport());
    }

    #[test]
    fn test_decode_charger_state() {
        let state = ChargerState::from_registers(&block(
            RecordGroup::State,
            vec![3, 16, 0, 1, 2, 0, 6],
        ))
        .unwrap();
        assert_eq!(state.number_of_phases, 3);
        assert_eq!(state.max_amp_per_phase, 16);
        assert!(!state.ocpp_state);
        assert!(state.load_shedding_state);
        assert_eq!(state.lock_state, LockState::NoLockPresent);
        assert!(!state.contactor_state);
        assert_eq!(state.led_color, LedColor::Pink);
    }

    #[test]
    fn test_decode_charger_state_unknown_led_color() {
        let err = ChargerState::from_registers(&block(
            RecordGroup::State,
            vec![3, 16, 0, 1, 2, 0, 42],
        ))
        .unwrap_err();
        assert_eq!(err, Error::decode("led_color", "unexpected raw value 42"));
    }

    #[test]
    fn test_decode_measurements() {
        let words = vec![
            4234, 4645, 4589, 235, 222, 250, 11000, 3000, 3400, 4600, // u16 block
            0xFFFF, 0xE4A8, 0x0000, 8000, 0x0000, 0x0000, 0x300F, 0xCAFE,
        ];
        let m = Measurements::from_registers(&block(RecordGroup::Measurements, words)).unwrap();
        assert_eq!(m.current_l1, 4234);
        assert_eq!(m.voltage_l3, 250);
        assert_eq!(m.charger_active_power_total, 11000);
        assert_eq!(m.installation_current_l1, -7000);
        assert_eq!(m.installation_current_l2, 8000);
        assert_eq!(m.installation_current_l3, 0);
        assert_eq!(m.active_energy_import_total, 806_341_374);
    }

    #[test]
    fn test_decode_mode3() {
        let words = vec![8, 0x5135, 0x0000, 8000, 750, 16, 12, 0];
        let mode3 = Mode3Details::from_registers(&block(RecordGroup::Mode3, words)).unwrap();
        assert_eq!(mode3.state_num, Mode3State::E);
        assert_eq!(mode3.state_str, "Q5");
        assert_eq!(mode3.pwm_amp, 8000);
        assert_eq!(mode3.pwm, 750);
        assert_eq!(mode3.pp, 16);
        assert_eq!(mode3.cp_pos, 12);
        assert_eq!(mode3.cp_neg, 0);
    }

    #[test]
    fn test_decode_diagnostics() {
        let mut words = Vec::new();
        for text in ["Enovates TEST", "Pytest Mock Vendor", "", "ENO one 479", "2.15.1.0@3.3.0.1.3"] {
            words.extend(padded_string_to_regs(text, 16).unwrap());
        }
        let diag = Diagnostics::from_registers(&block(RecordGroup::Diagnostics, words)).unwrap();
        assert_eq!(diag.manufacturer, "Enovates TEST");
        assert_eq!(diag.vendor_id, "Pytest Mock Vendor");
        assert_eq!(diag.serial_nr, "");
        assert_eq!(diag.firmware_version, "2.15.1.0@3.3.0.1.3");
    }

    #[test]
    fn test_slice_outside_block() {
        let b = block(RecordGroup::ApiVersion, vec![1, 2]);
        let err = b.slice(&fields::NUMBER_OF_PHASES).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    fn latin1_text(max_bytes: usize) -> impl Strategy<Value = String> {
        // NUL is the padding byte, so values never end in one
        proptest::collection::vec(1u8..=255, 0..=max_bytes)
            .prop_map(|bytes| bytes.into_iter().map(char::from).collect::<String>())
    }

    fn assert_roundtrip(
        field: &RegisterField,
        value: FieldValue,
    ) -> std::result::Result<(), TestCaseError> {
        let words = encode(field, &value).map_err(|e| TestCaseError::fail(e.to_string()))?;
        prop_assert_eq!(words.len(), usize::from(field.len()));
        let decoded = decode(field, &words).map_err(|e| TestCaseError::fail(e.to_string()))?;
        prop_assert_eq!(decoded, value);
        Ok(())
    }

    proptest! {
        // Most generated strings fit and are filtered by prop_assume!, so allow more rejects
        #![proptest_config(ProptestConfig { max_global_rejects: 65_536, ..ProptestConfig::default() })]

        #[test]
        fn prop_oversized_string_rejected(text in latin1_text(40)) {
            prop_assume!(text.chars().count() > 32);
            let err = encode(&fields::TRANSACTION_TOKEN, &FieldValue::Text(text));
            prop_assert!(matches!(err, Err(Error::Validation(_))));
        }
    }

    proptest! {
        #[test]
        fn prop_uint16_roundtrip(v in any::<u16>()) {
            assert_roundtrip(&fields::EMS_LIMIT, FieldValue::U16(v))?;
        }

        #[test]
        fn prop_int32_signed_roundtrip(v in any::<i32>()) {
            assert_roundtrip(&fields::INSTALLATION_CURRENT_L1, FieldValue::I32(v))?;
        }

        #[test]
        fn prop_int32_unsigned_roundtrip(v in any::<u32>()) {
            assert_roundtrip(&fields::ACTIVE_ENERGY_IMPORT_TOTAL, FieldValue::U32(v))?;
        }

        #[test]
        fn prop_bitfield_roundtrip(v in any::<bool>()) {
            assert_roundtrip(&fields::OCPP_STATE, FieldValue::Bit(v))?;
        }

        #[test]
        fn prop_enum_raw_roundtrip(raw in any::<u16>()) {
            assert_roundtrip(&fields::LED_COLOR, FieldValue::Enum(raw))?;
        }

        #[test]
        fn prop_short_string_roundtrip(text in latin1_text(4)) {
            assert_roundtrip(&fields::MODE3_STATE_STR, FieldValue::Text(text))?;
        }

        #[test]
        fn prop_long_string_roundtrip(text in latin1_text(32)) {
            assert_roundtrip(&fields::TRANSACTION_TOKEN, FieldValue::Text(text))?;
        }

        #[test]
        fn prop_closed_enums_roundtrip(raw in 0u16..=9) {
            let state = Mode3State::from_raw(raw)
                .ok_or_else(|| TestCaseError::fail("gap in Mode3State"))?;
            prop_assert_eq!(state.to_raw(), raw);
            if let Some(color) = LedColor::from_raw(raw) {
                prop_assert_eq!(color.to_raw(), raw);
            }
            if let Some(lock) = LockState::from_raw(raw) {
                prop_assert_eq!(lock.to_raw(), raw);
            }
        }
    }
}
