//! Version Dispatcher
//!
//! Picks the wire format of each loader command for the running system.
//!
//! The loader's commands changed layout over time. Every selector here is a
//! pure function of the [`HostVersion`], so the choice can be tested without
//! a transport. The enhanced-environment flag unlocks the newest process
//! creation and program info formats regardless of the numeric version;
//! argument and verification commands follow the numeric version only.
//!
//! | Command | Rule |
//! |---|---|
//! | SetProgramArguments | modern from 11.0.0 |
//! | SetEnabledProgramVerification | exists from 10.0.0 |
//! | CreateProcess | attributes from 20.0.0 or enhanced |
//! | GetProgramInfo | exists from 19.0.0 or enhanced, attributes from 20.0.0 or enhanced |
//! | GetProgramInfoV1 | exists before 19.0.0 without enhanced |

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{LdrError, Result};

/// Numeric system version (`major.minor.micro`)
///
/// Ordering is lexicographic over the three components. Deserializes from
/// either a `{ major, minor, micro }` table or a `"major.minor.micro"` string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "VersionRepr")]
pub struct SystemVersion {
    pub major: u8,
    pub minor: u8,
    pub micro: u8,
}

impl SystemVersion {
    pub const V10_0_0: Self = Self::new(10, 0, 0);
    pub const V11_0_0: Self = Self::new(11, 0, 0);
    pub const V19_0_0: Self = Self::new(19, 0, 0);
    pub const V20_0_0: Self = Self::new(20, 0, 0);

    pub const fn new(major: u8, minor: u8, micro: u8) -> Self {
        Self { major, minor, micro }
    }

    /// Packed form: `major << 16 | minor << 8 | micro`
    pub const fn packed(self) -> u32 {
        ((self.major as u32) << 16) | ((self.minor as u32) << 8) | self.micro as u32
    }

    pub const fn from_packed(raw: u32) -> Self {
        Self::new((raw >> 16) as u8, (raw >> 8) as u8, raw as u8)
    }
}

impl From<u32> for SystemVersion {
    fn from(raw: u32) -> Self {
        Self::from_packed(raw)
    }
}

impl fmt::Display for SystemVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.micro)
    }
}

/// Error parsing a `major.minor.micro` string
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid system version: {0:?}")]
pub struct ParseVersionError(String);

impl FromStr for SystemVersion {
    type Err = ParseVersionError;

    fn from_str(s: &str) -> core::result::Result<Self, Self::Err> {
        let mut parts = s.trim().split('.');
        let mut next = || -> core::result::Result<u8, ParseVersionError> {
            parts
                .next()
                .ok_or_else(|| ParseVersionError(s.to_string()))?
                .parse()
                .map_err(|_| ParseVersionError(s.to_string()))
        };

        let version = Self::new(next()?, next()?, next()?);
        if parts.next().is_some() {
            return Err(ParseVersionError(s.to_string()));
        }
        Ok(version)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum VersionRepr {
    Text(String),
    Parts { major: u8, minor: u8, micro: u8 },
}

impl TryFrom<VersionRepr> for SystemVersion {
    type Error = ParseVersionError;

    fn try_from(repr: VersionRepr) -> core::result::Result<Self, Self::Error> {
        match repr {
            VersionRepr::Text(text) => text.parse(),
            VersionRepr::Parts { major, minor, micro } => Ok(Self::new(major, minor, micro)),
        }
    }
}

/// What the running system reports about itself
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostVersion {
    /// Numeric system version
    pub version: SystemVersion,

    /// Host provides the newest protocol regardless of `version`
    #[serde(default)]
    pub enhanced_environment: bool,
}

impl HostVersion {
    pub const fn new(version: SystemVersion, enhanced_environment: bool) -> Self {
        Self {
            version,
            enhanced_environment,
        }
    }

    #[inline]
    pub fn at_least(&self, version: SystemVersion) -> bool {
        self.version >= version
    }

    #[inline]
    pub fn before(&self, version: SystemVersion) -> bool {
        self.version < version
    }

    fn incompatible(self, operation: &'static str) -> LdrError {
        LdrError::IncompatibleSystemVersion {
            operation,
            host: self,
        }
    }
}

impl fmt::Display for HostVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.enhanced_environment {
            write!(f, "{} (enhanced)", self.version)
        } else {
            write!(f, "{}", self.version)
        }
    }
}

/// SetProgramArguments layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgumentsFormat {
    /// `{u32 size, u32 pad, u64 program_id}`
    Legacy,
    /// `u64 program_id`, size taken from the buffer
    Modern,
}

/// CreateProcess layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateProcessFormat {
    /// `{u32 flags, u32 pad, u64 pin_id}`
    Legacy,
    /// `{attrs, u16 pad, u32 flags, u64 pin_id}`
    WithAttributes,
}

/// GetProgramInfo input layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramInfoRequestFormat {
    /// Bare program location
    LocationOnly,
    /// `{attrs, u16 pad, u32 pad, location}`
    WithAttributes,
}

/// Which program info command exists on the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramInfoVariant {
    /// GetProgramInfoV1, 0x400-byte output
    V1,
    /// GetProgramInfo, 0x410-byte output
    Current,
}

fn newest_or_at_least(host: &HostVersion, version: SystemVersion) -> bool {
    host.enhanced_environment || host.at_least(version)
}

pub fn arguments_format(host: &HostVersion) -> ArgumentsFormat {
    if host.at_least(SystemVersion::V11_0_0) {
        ArgumentsFormat::Modern
    } else {
        ArgumentsFormat::Legacy
    }
}

pub fn create_process_format(host: &HostVersion) -> CreateProcessFormat {
    if newest_or_at_least(host, SystemVersion::V20_0_0) {
        CreateProcessFormat::WithAttributes
    } else {
        CreateProcessFormat::Legacy
    }
}

pub fn program_info_request_format(host: &HostVersion) -> ProgramInfoRequestFormat {
    if newest_or_at_least(host, SystemVersion::V20_0_0) {
        ProgramInfoRequestFormat::WithAttributes
    } else {
        ProgramInfoRequestFormat::LocationOnly
    }
}

pub fn program_info_variant(host: &HostVersion) -> ProgramInfoVariant {
    if newest_or_at_least(host, SystemVersion::V19_0_0) {
        ProgramInfoVariant::Current
    } else {
        ProgramInfoVariant::V1
    }
}

/// Gate for GetProgramInfo
///
/// # Errors
/// `IncompatibleSystemVersion` before 19.0.0 unless the host is enhanced
pub fn check_program_info(host: &HostVersion) -> Result<()> {
    match program_info_variant(host) {
        ProgramInfoVariant::Current => Ok(()),
        ProgramInfoVariant::V1 => Err(host.incompatible("GetProgramInfo")),
    }
}

/// Gate for GetProgramInfoV1
///
/// # Errors
/// `IncompatibleSystemVersion` from 19.0.0 on, or on an enhanced host
pub fn check_program_info_v1(host: &HostVersion) -> Result<()> {
    match program_info_variant(host) {
        ProgramInfoVariant::V1 => Ok(()),
        ProgramInfoVariant::Current => Err(host.incompatible("GetProgramInfoV1")),
    }
}

/// Gate for SetEnabledProgramVerification
///
/// # Errors
/// `IncompatibleSystemVersion` before 10.0.0
pub fn check_program_verification(host: &HostVersion) -> Result<()> {
    if host.before(SystemVersion::V10_0_0) {
        return Err(host.incompatible("SetEnabledProgramVerification"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host(major: u8, minor: u8, micro: u8) -> HostVersion {
        HostVersion::new(SystemVersion::new(major, minor, micro), false)
    }

    fn enhanced(major: u8, minor: u8, micro: u8) -> HostVersion {
        HostVersion::new(SystemVersion::new(major, minor, micro), true)
    }

    #[test]
    fn test_version_ordering() {
        assert!(SystemVersion::new(10, 2, 0) < SystemVersion::new(11, 0, 0));
        assert!(SystemVersion::new(18, 5, 0) < SystemVersion::V19_0_0);
        assert!(SystemVersion::new(19, 0, 1) > SystemVersion::V19_0_0);
        assert!(SystemVersion::new(9, 255, 255) < SystemVersion::V10_0_0);
    }

    #[test]
    fn test_version_packing() {
        let v = SystemVersion::new(12, 1, 0);
        assert_eq!(v.packed(), 0x0C_01_00);
        assert_eq!(SystemVersion::from(0x0C_01_00), v);
    }

    #[test]
    fn test_version_parsing() {
        assert_eq!("18.5.0".parse::<SystemVersion>(), Ok(SystemVersion::new(18, 5, 0)));
        assert_eq!(" 9.0.1 ".parse::<SystemVersion>(), Ok(SystemVersion::new(9, 0, 1)));
        assert!("18.5".parse::<SystemVersion>().is_err());
        assert!("18.5.0.1".parse::<SystemVersion>().is_err());
        assert!("18.x.0".parse::<SystemVersion>().is_err());
        assert!("256.0.0".parse::<SystemVersion>().is_err());
    }

    #[test]
    fn test_arguments_format() {
        assert_eq!(arguments_format(&host(9, 0, 0)), ArgumentsFormat::Legacy);
        assert_eq!(arguments_format(&host(10, 2, 0)), ArgumentsFormat::Legacy);
        assert_eq!(arguments_format(&host(11, 0, 0)), ArgumentsFormat::Modern);
        assert_eq!(arguments_format(&host(12, 0, 0)), ArgumentsFormat::Modern);
    }

    #[test]
    fn test_enhanced_flag_ignored_by_numeric_gates() {
        assert_eq!(arguments_format(&enhanced(9, 0, 0)), ArgumentsFormat::Legacy);
        assert_eq!(arguments_format(&enhanced(10, 2, 0)), ArgumentsFormat::Legacy);
        assert_eq!(arguments_format(&enhanced(11, 0, 0)), ArgumentsFormat::Modern);

        assert!(check_program_verification(&enhanced(9, 0, 0)).unwrap_err().is_incompatible_version());
        assert!(check_program_verification(&enhanced(10, 0, 0)).is_ok());
    }

    #[test]
    fn test_create_process_format() {
        assert_eq!(create_process_format(&host(19, 0, 0)), CreateProcessFormat::Legacy);
        assert_eq!(create_process_format(&host(20, 0, 0)), CreateProcessFormat::WithAttributes);
        assert_eq!(create_process_format(&enhanced(1, 0, 0)), CreateProcessFormat::WithAttributes);
    }

    #[test]
    fn test_program_info_request_format() {
        assert_eq!(program_info_request_format(&host(19, 1, 0)), ProgramInfoRequestFormat::LocationOnly);
        assert_eq!(program_info_request_format(&host(20, 0, 0)), ProgramInfoRequestFormat::WithAttributes);
        assert_eq!(program_info_request_format(&enhanced(5, 0, 0)), ProgramInfoRequestFormat::WithAttributes);
    }

    #[test]
    fn test_program_info_gates_are_exclusive() {
        for major in 0..=25u8 {
            for minor in [0u8, 1, 5] {
                for flag in [false, true] {
                    let h = HostVersion::new(SystemVersion::new(major, minor, 0), flag);
                    let current = check_program_info(&h).is_ok();
                    let v1 = check_program_info_v1(&h).is_ok();
                    assert!(current != v1, "exactly one program info variant for {h}");
                }
            }
        }
    }

    #[test]
    fn test_program_info_gate_thresholds() {
        assert!(check_program_info(&host(18, 5, 0)).unwrap_err().is_incompatible_version());
        assert!(check_program_info(&host(19, 0, 0)).is_ok());
        assert!(check_program_info(&enhanced(1, 0, 0)).is_ok());

        assert!(check_program_info_v1(&host(18, 5, 0)).is_ok());
        assert!(check_program_info_v1(&host(19, 0, 0)).is_err());
        assert!(check_program_info_v1(&enhanced(1, 0, 0)).is_err());
    }

    #[test]
    fn test_program_verification_gate() {
        assert!(check_program_verification(&host(9, 2, 0)).is_err());
        assert!(check_program_verification(&host(10, 0, 0)).is_ok());
        assert!(check_program_verification(&host(17, 0, 0)).is_ok());
    }

    #[test]
    fn test_host_version_display() {
        assert_eq!(host(12, 0, 1).to_string(), "12.0.1");
        assert_eq!(enhanced(1, 0, 0).to_string(), "1.0.0 (enhanced)");
    }
}
