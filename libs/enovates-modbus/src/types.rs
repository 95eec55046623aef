//! Domain records returned by the client
//!
//! All records are detached value objects decoded from one register block;
//! none of them keeps a reference to the transport.

use serde::Serialize;
use std::fmt;

/// Closed enumeration stored in a single holding register
pub trait RegisterEnum: Sized + Copy {
    /// Raw value for this variant
    fn to_raw(self) -> u16;

    /// Variant for a raw value, `None` if the device sent something unknown
    fn from_raw(raw: u16) -> Option<Self>;
}

macro_rules! register_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $($(#[$vmeta:meta])* $variant:ident = $raw:literal => $label:literal,)+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
        pub enum $name {
            $($(#[$vmeta])* #[serde(rename = $label)] $variant,)+
        }

        impl RegisterEnum for $name {
            fn to_raw(self) -> u16 {
                match self {
                    $($name::$variant => $raw,)+
                }
            }

            fn from_raw(raw: u16) -> Option<Self> {
                match raw {
                    $($raw => Some($name::$variant),)+
                    _ => None,
                }
            }
        }

        impl TryFrom<u16> for $name {
            type Error = u16;

            fn try_from(raw: u16) -> std::result::Result<Self, Self::Error> {
                Self::from_raw(raw).ok_or(raw)
            }
        }

        impl From<$name> for u16 {
            fn from(value: $name) -> u16 {
                value.to_raw()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                match self {
                    $($name::$variant => f.write_str($label),)+
                }
            }
        }
    };
}

register_enum! {
    /// Cable lock state
    pub enum LockState {
        Unlocked = 0 => "UNLOCKED",
        Locked = 1 => "LOCKED",
        NoLockPresent = 2 => "NO_LOCK_PRESENT",
    }
}

register_enum! {
    /// Status LED color
    pub enum LedColor {
        Off = 0 => "OFF",
        Red = 1 => "RED",
        Green = 2 => "GREEN",
        Blue = 3 => "BLUE",
        Yellow = 4 => "YELLOW",
        Cyan = 5 => "CYAN",
        Pink = 6 => "PINK",
        White = 7 => "WHITE",
    }
}

register_enum! {
    /// IEC 61851 control-pilot state
    pub enum Mode3State {
        /// No vehicle, pilot off
        A1 = 0 => "A1",
        /// No vehicle, pilot oscillating
        A2 = 1 => "A2",
        B1 = 2 => "B1",
        B2 = 3 => "B2",
        C1 = 4 => "C1",
        C2 = 5 => "C2",
        D1 = 6 => "D1",
        D2 = 7 => "D2",
        /// Pilot shorted or no power
        E = 8 => "E",
        /// Charger fault
        F = 9 => "F",
    }
}

/// Modbus API version implemented by the device firmware
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ApiVersion {
    pub major: u16,
    pub minor: u16,
}

impl ApiVersion {
    pub const fn new(major: u16, minor: u16) -> Self {
        Self { major, minor }
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Charger state block
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChargerState {
    pub number_of_phases: u16,
    /// Amperes
    pub max_amp_per_phase: u16,
    /// Connected to the OCPP backend
    pub ocpp_state: bool,
    pub load_shedding_state: bool,
    pub lock_state: LockState,
    /// Contactor closed
    pub contactor_state: bool,
    pub led_color: LedColor,
}

/// Electrical measurements
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Measurements {
    /// Charger phase currents, 0.1 A
    pub current_l1: u16,
    pub current_l2: u16,
    pub current_l3: u16,
    /// Phase voltages, V
    pub voltage_l1: u16,
    pub voltage_l2: u16,
    pub voltage_l3: u16,
    /// Active power, W
    pub charger_active_power_total: u16,
    pub charger_active_power_l1: u16,
    pub charger_active_power_l2: u16,
    pub charger_active_power_l3: u16,
    /// Installation (grid connection) currents, mA; negative when exporting
    pub installation_current_l1: i32,
    pub installation_current_l2: i32,
    pub installation_current_l3: i32,
    /// Wh
    pub active_energy_import_total: u32,
}

/// Mode 3 charging detail
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Mode3Details {
    pub state_num: Mode3State,
    /// Vendor state code, e.g. "Q5"
    pub state_str: String,
    /// Current advertised through the PWM duty cycle, mA
    pub pwm_amp: u16,
    /// Duty cycle, per mille
    pub pwm: u16,
    /// Proximity-pilot cable capacity, A
    pub pp: u16,
    /// Control-pilot positive level, V
    pub cp_pos: u16,
    /// Control-pilot negative level, V
    pub cp_neg: u16,
}

/// Token of the running transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionToken {
    pub transaction_token: String,
}

/// Identification strings
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostics {
    pub manufacturer: String,
    pub vendor_id: String,
    pub serial_nr: String,
    pub model_id: String,
    pub firmware_version: String,
}

/// Every record read in one session, for reporting
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChargerSnapshot {
    pub api_version: ApiVersion,
    pub state: ChargerState,
    pub measurements: Measurements,
    pub mode3: Mode3Details,
    /// mA
    pub ems_limit: u16,
    pub transaction_token: TransactionToken,
    /// mA
    pub current_offered: u16,
    pub diagnostics: Diagnostics,
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_enum_raw_mapping() {
        assert_eq!(LockState::from_raw(2), Some(LockState::NoLockPresent));
        assert_eq!(LedColor::from_raw(6), Some(LedColor::Pink));
        assert_eq!(Mode3State::from_raw(8), Some(Mode3State::E));
        assert_eq!(u16::from(Mode3State::F), 9);
    }

    #[test]
    fn test_unknown_raw_value_is_rejected() {
        assert_eq!(LockState::try_from(3u16), Err(3));
        assert_eq!(LedColor::try_from(0xFFFFu16), Err(0xFFFF));
        assert!(Mode3State::from_raw(10).is_none());
    }

    #[test]
    fn test_enum_display_and_serialize() {
        assert_eq!(LockState::NoLockPresent.to_string(), "NO_LOCK_PRESENT");
        assert_eq!(LedColor::Pink.to_string(), "PINK");
        assert_eq!(serde_json::to_string(&Mode3State::E).unwrap(), "\"E\"");
    }

    #[test]
    fn test_api_version_display() {
        assert_eq!(ApiVersion::new(1, 2).to_string(), "1.2");
    }
}
