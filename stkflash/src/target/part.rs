//! AVR parts known by their signature.
//!
//! Only one page geometry is compiled in ([`TARGET_PAGE_SIZE`], the
//! ATmega328P class). The table is used to name a device and to let callers
//! pin the signature a session must see.

use std::fmt;

/// Flash page size of the supported target profile, in bytes.
pub const TARGET_PAGE_SIZE: usize = 128;

/// AVR parts commonly found behind an STK500 bootloader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Part {
    /// ATmega328P (Uno, Nano, Pro Mini).
    #[default]
    Atmega328p,
    /// ATmega328 (non-picoPower).
    Atmega328,
    /// ATmega168.
    Atmega168,
    /// ATmega168P.
    Atmega168p,
    /// ATmega8.
    Atmega8,
    /// ATmega32U4 (Leonardo, Micro).
    Atmega32u4,
    /// ATmega1280 (Mega).
    Atmega1280,
    /// ATmega2560 (Mega 2560).
    Atmega2560,
}

impl Part {
    /// Every part in the table.
    pub const ALL: [Self; 8] = [
        Self::Atmega328p,
        Self::Atmega328,
        Self::Atmega168,
        Self::Atmega168p,
        Self::Atmega8,
        Self::Atmega32u4,
        Self::Atmega1280,
        Self::Atmega2560,
    ];

    /// Device signature bytes as returned by `READ_SIGN`.
    #[must_use]
    pub fn signature(&self) -> [u8; 3] {
        match self {
            Self::Atmega328p => [0x1E, 0x95, 0x0F],
            Self::Atmega328 => [0x1E, 0x95, 0x14],
            Self::Atmega168 => [0x1E, 0x94, 0x06],
            Self::Atmega168p => [0x1E, 0x94, 0x0B],
            Self::Atmega8 => [0x1E, 0x93, 0x07],
            Self::Atmega32u4 => [0x1E, 0x95, 0x87],
            Self::Atmega1280 => [0x1E, 0x97, 0x03],
            Self::Atmega2560 => [0x1E, 0x98, 0x01],
        }
    }

    /// Flash size in bytes.
    #[must_use]
    pub fn flash_size(&self) -> usize {
        match self {
            Self::Atmega8 => 8 * 1024,
            Self::Atmega168 | Self::Atmega168p => 16 * 1024,
            Self::Atmega328p | Self::Atmega328 | Self::Atmega32u4 => 32 * 1024,
            Self::Atmega1280 => 128 * 1024,
            Self::Atmega2560 => 256 * 1024,
        }
    }

    /// Look a part up by signature.
    pub fn from_signature(signature: [u8; 3]) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.signature() == signature)
    }

    /// Get the part from a string name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "atmega328p" | "m328p" => Some(Self::Atmega328p),
            "atmega328" | "m328" => Some(Self::Atmega328),
            "atmega168" | "m168" => Some(Self::Atmega168),
            "atmega168p" | "m168p" => Some(Self::Atmega168p),
            "atmega8" | "m8" => Some(Self::Atmega8),
            "atmega32u4" | "m32u4" => Some(Self::Atmega32u4),
            "atmega1280" | "m1280" => Some(Self::Atmega1280),
            "atmega2560" | "m2560" => Some(Self::Atmega2560),
            _ => None,
        }
    }
}

impl fmt::Display for Part {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Atmega328p => write!(f, "ATmega328P"),
            Self::Atmega328 => write!(f, "ATmega328"),
            Self::Atmega168 => write!(f, "ATmega168"),
            Self::Atmega168p => write!(f, "ATmega168P"),
            Self::Atmega8 => write!(f, "ATmega8"),
            Self::Atmega32u4 => write!(f, "ATmega32U4"),
            Self::Atmega1280 => write!(f, "ATmega1280"),
            Self::Atmega2560 => write!(f, "ATmega2560"),
        }
    }
}
