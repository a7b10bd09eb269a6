//! Device identification over STK500.

use crate::error::Result;
use crate::port::Transport;
use crate::protocol::exchange::{FrameExchange, MAX_TRIES};
use crate::target::part::Part;
use log::debug;
use std::fmt;

/// Parameter and signature bytes reported by a bootloader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceInfo {
    /// `GET_PARAMETER` answers for parameters `0x80 + i`.
    pub parameters: [u8; MAX_TRIES],
    /// `READ_SIGN` answer.
    pub signature: [u8; 3],
}

impl DeviceInfo {
    /// Query all parameters, then the signature.
    ///
    /// The exchange must already be in sync. Any failed query aborts the read.
    pub fn read<T: Transport>(exchange: &mut FrameExchange<T>) -> Result<Self> {
        let mut parameters = [0u8; MAX_TRIES];
        for (index, slot) in (0u8..).zip(parameters.iter_mut()) {
            *slot = exchange.get_parameter(index)?;
        }
        let signature = exchange.read_signature()?;

        let info = Self {
            parameters,
            signature,
        };
        debug!("Device info: {info}");
        Ok(info)
    }

    /// Hardware version (parameter 0x80).
    pub fn hardware_version(&self) -> u8 {
        self.parameters[0]
    }

    /// Bootloader firmware version as (major, minor), parameters 0x81/0x82.
    pub fn firmware_version(&self) -> (u8, u8) {
        (self.parameters[1], self.parameters[2])
    }

    /// Part matching the signature, if known.
    pub fn part(&self) -> Option<Part> {
        Part::from_signature(self.signature)
    }

    /// Display name of the part, or `"unknown"`.
    pub fn part_name(&self) -> String {
        self.part().map_or_else(|| "unknown".to_string(), |p| p.to_string())
    }

    /// Signature as space-separated hex.
    pub fn signature_hex(&self) -> String {
        let [a, b, c] = self.signature;
        format!("{a:02X} {b:02X} {c:02X}")
    }
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (major, minor) = self.firmware_version();
        write!(
            f,
            "{} (signature {}, hw {}, fw {major}.{minor})",
            self.part_name(),
            self.signature_hex(),
            self.hardware_version()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::port::mock::MockTarget;
    use crate::protocol::exchange::ExchangeTiming;
    use crate::protocol::stk500::Command;

    #[test]
    fn test_read_device_info() {
        let mut ex = FrameExchange::new(MockTarget::new(), ExchangeTiming::immediate());
        let info = DeviceInfo::read(&mut ex).unwrap();

        assert_eq!(ex.port().count(Command::GetParameter), MAX_TRIES);
        assert_eq!(ex.port().count(Command::ReadSign), 1);
        assert_eq!(info.hardware_version(), 0x02);
        assert_eq!(info.firmware_version(), (0x04, 0x04));
        assert_eq!(info.part(), Some(Part::Atmega328p));
        assert_eq!(info.to_string(), "ATmega328P (signature 1E 95 0F, hw 2, fw 4.4)");
    }

    #[test]
    fn test_unknown_signature() {
        let target = MockTarget::new().with_signature([0x1E, 0x00, 0x00]);
        let mut ex = FrameExchange::new(target, ExchangeTiming::immediate());
        let info = DeviceInfo::read(&mut ex).unwrap();
        assert_eq!(info.part(), None);
        assert_eq!(info.part_name(), "unknown");
    }

    #[test]
    fn test_silent_target_aborts_on_first_parameter() {
        let mut ex = FrameExchange::new(MockTarget::new().silent(), ExchangeTiming::immediate());
        assert!(matches!(DeviceInfo::read(&mut ex), Err(Error::NoResponse)));
        assert_eq!(ex.port().count(Command::GetParameter), 1);
        assert_eq!(ex.port().count(Command::ReadSign), 0);
    }
}
