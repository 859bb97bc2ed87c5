//! Result codes
//!
//! Raw 32-bit result codes as produced by the transport and the remote
//! services. Layout: bits 0-8 module, bits 9-21 description. Zero is success.

use core::fmt;

/// Module number used for errors raised by this library
pub const MODULE_CLIENT: u32 = 345;

/// Raw result code
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResultCode(u32);

impl ResultCode {
    /// Success
    pub const SUCCESS: Self = Self(0);

    /// Session was used before it was opened
    pub const NOT_INITIALIZED: Self = Self::new(MODULE_CLIENT, 8);

    /// Response could not be decoded
    pub const BAD_INPUT: Self = Self::new(MODULE_CLIENT, 11);

    /// Operation does not exist on the running system version
    pub const INCOMPATIBLE_SYSTEM_VERSION: Self = Self::new(MODULE_CLIENT, 37);

    /// Build a result code from module and description
    pub const fn new(module: u32, description: u32) -> Self {
        Self((module & 0x1FF) | ((description & 0x1FFF) << 9))
    }

    /// Wrap a raw value
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Raw value
    pub const fn raw(self) -> u32 {
        self.0
    }

    pub const fn module(self) -> u32 {
        self.0 & 0x1FF
    }

    pub const fn description(self) -> u32 {
        (self.0 >> 9) & 0x1FFF
    }

    pub const fn is_success(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for ResultCode {
    /// Formats as `2MMM-DDDD`, the conventional error code notation
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:04} ({:#x})", 2000 + self.module(), self.description(), self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_code_fields() {
        let code = ResultCode::new(9, 2);
        assert_eq!(code.raw(), 0x409);
        assert_eq!(code.module(), 9);
        assert_eq!(code.description(), 2);
        assert!(!code.is_success());
        assert!(ResultCode::SUCCESS.is_success());
    }

    #[test]
    fn test_incompatible_version_code() {
        let code = ResultCode::INCOMPATIBLE_SYSTEM_VERSION;
        assert_eq!(code.module(), 345);
        assert_eq!(code.description(), 37);
        assert_eq!(code.to_string(), "2345-0037 (0x4b59)");
    }
}
