//! Wire format
//!
//! Byte-exact request and response layouts for the loader commands.
//!
//! The remote side parses every payload by fixed offsets, so each layout is
//! declared as a `#[repr(C)]` struct with all padding spelled out as fields
//! and its size asserted at compile time. Payloads are encoded with bincode's
//! fixed-int little-endian encoding, which writes fields back to back: with
//! no implicit padding in the structs the encoded bytes equal the in-memory
//! layout the server expects.

use serde::{Deserialize, Serialize};
use static_assertions::{assert_eq_size, const_assert_eq};

use crate::types::{
    ModuleInfo, PinId, ProgramAttributes, ProgramId, ProgramInfo, ProgramInfoFlags, ProgramInfoV1,
    ProgramLocation, AC_BUFFER_SIZE,
};
use crate::version::{ArgumentsFormat, CreateProcessFormat, ProgramInfoRequestFormat};
use crate::{LdrError, Result};

/// Command identifiers
pub mod commands {
    // ldr:shel and ldr:dmnt
    pub const SET_PROGRAM_ARGUMENTS: u32 = 0;
    pub const FLUSH_ARGUMENTS: u32 = 1;

    // ldr:dmnt
    pub const GET_PROCESS_MODULE_INFO: u32 = 2;

    // ldr:pm
    pub const CREATE_PROCESS: u32 = 0;
    pub const GET_PROGRAM_INFO: u32 = 1;
    pub const PIN_PROGRAM: u32 = 2;
    pub const UNPIN_PROGRAM: u32 = 3;
    pub const SET_ENABLED_PROGRAM_VERIFICATION: u32 = 4;
}

pub const PROGRAM_LOCATION_SIZE: usize = 0x10;
pub const MODULE_INFO_SIZE: usize = 0x30;
pub const PROGRAM_INFO_REQUEST_SIZE: usize = 0x18;
pub const PROGRAM_INFO_HEADER_SIZE: usize = 0x20;
pub const PROGRAM_INFO_UNUSED_SIZE: usize = 0x10;
pub const PROGRAM_INFO_V1_SIZE: usize = PROGRAM_INFO_HEADER_SIZE + AC_BUFFER_SIZE;
pub const PROGRAM_INFO_SIZE: usize =
    PROGRAM_INFO_HEADER_SIZE + PROGRAM_INFO_UNUSED_SIZE + AC_BUFFER_SIZE;

const_assert_eq!(PROGRAM_INFO_V1_SIZE, 0x400);
const_assert_eq!(PROGRAM_INFO_SIZE, 0x410);

#[repr(C)]
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct WireProgramLocation {
    program_id: u64,
    storage_id: u8,
    pad: [u8; 7],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct WireProgramAttributes {
    platform: u8,
    content_attributes: u8,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct LegacyArgumentsIn {
    args_size: u32,
    pad: u32,
    program_id: u64,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct LegacyCreateProcessIn {
    flags: u32,
    pad: u32,
    pin_id: u64,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct CreateProcessIn {
    attrs: WireProgramAttributes,
    pad: u16,
    flags: u32,
    pin_id: u64,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct ProgramInfoIn {
    attrs: WireProgramAttributes,
    pad1: u16,
    pad2: u32,
    loc: WireProgramLocation,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct ProgramInfoHeader {
    main_thread_priority: u8,
    default_cpu_id: u8,
    flags: u16,
    main_thread_stack_size: u32,
    program_id: u64,
    acid_sac_size: u32,
    aci_sac_size: u32,
    acid_fac_size: u32,
    aci_fah_size: u32,
}

assert_eq_size!(WireProgramLocation, [u8; PROGRAM_LOCATION_SIZE]);
assert_eq_size!(WireProgramAttributes, [u8; 2]);
assert_eq_size!(LegacyArgumentsIn, [u8; 0x10]);
assert_eq_size!(LegacyCreateProcessIn, [u8; 0x10]);
assert_eq_size!(CreateProcessIn, [u8; 0x10]);
assert_eq_size!(ProgramInfoIn, [u8; PROGRAM_INFO_REQUEST_SIZE]);
assert_eq_size!(ProgramInfoHeader, [u8; PROGRAM_INFO_HEADER_SIZE]);
assert_eq_size!(ModuleInfo, [u8; MODULE_INFO_SIZE]);

impl From<&ProgramLocation> for WireProgramLocation {
    fn from(loc: &ProgramLocation) -> Self {
        Self {
            program_id: loc.program_id.0,
            storage_id: loc.storage_id.into(),
            pad: [0; 7],
        }
    }
}

impl From<&ProgramAttributes> for WireProgramAttributes {
    fn from(attrs: &ProgramAttributes) -> Self {
        Self {
            platform: attrs.platform,
            content_attributes: attrs.content_attributes,
        }
    }
}

/// SetProgramArguments input payload
///
/// # Errors
/// `InvalidArgument` if the legacy format cannot express `args_len`
pub fn encode_set_program_arguments(
    format: ArgumentsFormat,
    program_id: ProgramId,
    args_len: usize,
) -> Result<Vec<u8>> {
    match format {
        ArgumentsFormat::Legacy => {
            let args_size = u32::try_from(args_len)
                .map_err(|_| LdrError::InvalidArgument("argument buffer exceeds u32"))?;
            Ok(bincode::serialize(&LegacyArgumentsIn {
                args_size,
                pad: 0,
                program_id: program_id.0,
            })?)
        }
        ArgumentsFormat::Modern => Ok(bincode::serialize(&program_id)?),
    }
}

/// CreateProcess input payload
pub fn encode_create_process(
    format: CreateProcessFormat,
    pin_id: PinId,
    flags: u32,
    attrs: &ProgramAttributes,
) -> Result<Vec<u8>> {
    let data = match format {
        CreateProcessFormat::Legacy => bincode::serialize(&LegacyCreateProcessIn {
            flags,
            pad: 0,
            pin_id: pin_id.0,
        })?,
        CreateProcessFormat::WithAttributes => bincode::serialize(&CreateProcessIn {
            attrs: attrs.into(),
            pad: 0,
            flags,
            pin_id: pin_id.0,
        })?,
    };
    Ok(data)
}

/// GetProgramInfo input payload
pub fn encode_program_info_request(
    format: ProgramInfoRequestFormat,
    loc: &ProgramLocation,
    attrs: &ProgramAttributes,
) -> Result<Vec<u8>> {
    match format {
        ProgramInfoRequestFormat::LocationOnly => encode_location(loc),
        ProgramInfoRequestFormat::WithAttributes => Ok(bincode::serialize(&ProgramInfoIn {
            attrs: attrs.into(),
            pad1: 0,
            pad2: 0,
            loc: loc.into(),
        })?),
    }
}

/// Bare program location payload (PinProgram, GetProgramInfoV1)
pub fn encode_location(loc: &ProgramLocation) -> Result<Vec<u8>> {
    Ok(bincode::serialize(&WireProgramLocation::from(loc))?)
}

pub fn encode_u64(value: u64) -> Result<Vec<u8>> {
    Ok(bincode::serialize(&value)?)
}

/// Single-byte boolean, always 0 or 1
pub fn encode_bool(value: bool) -> Result<Vec<u8>> {
    Ok(bincode::serialize(&u8::from(value))?)
}

pub fn decode_u64(data: &[u8]) -> Result<u64> {
    if data.len() < 8 {
        return Err(LdrError::MalformedResponse("expected u64 output"));
    }
    Ok(bincode::deserialize(&data[..8])?)
}

pub fn decode_s32(data: &[u8]) -> Result<i32> {
    if data.len() < 4 {
        return Err(LdrError::MalformedResponse("expected s32 output"));
    }
    Ok(bincode::deserialize(&data[..4])?)
}

/// Decode the first `count` records of a module info output buffer
pub fn decode_module_infos(buffer: &[u8], count: usize) -> Result<Vec<ModuleInfo>> {
    buffer
        .chunks_exact(MODULE_INFO_SIZE)
        .take(count)
        .map(|chunk| bincode::deserialize::<ModuleInfo>(chunk).map_err(LdrError::from))
        .collect()
}

fn decode_program_info_parts(header: &[u8], ac: &[u8]) -> Result<ProgramInfo> {
    let header: ProgramInfoHeader = bincode::deserialize(header)?;
    let mut ac_buffer = Box::new([0u8; AC_BUFFER_SIZE]);
    ac_buffer.copy_from_slice(ac);

    Ok(ProgramInfo {
        main_thread_priority: header.main_thread_priority,
        default_cpu_id: header.default_cpu_id,
        flags: ProgramInfoFlags::from_bits_retain(header.flags),
        main_thread_stack_size: header.main_thread_stack_size,
        program_id: ProgramId(header.program_id),
        acid_sac_size: header.acid_sac_size,
        aci_sac_size: header.aci_sac_size,
        acid_fac_size: header.acid_fac_size,
        aci_fah_size: header.aci_fah_size,
        ac_buffer,
    })
}

/// Decode a 0x410-byte program info record
pub fn decode_program_info(buffer: &[u8]) -> Result<ProgramInfo> {
    if buffer.len() != PROGRAM_INFO_SIZE {
        return Err(LdrError::MalformedResponse("program info size mismatch"));
    }
    let (header, rest) = buffer.split_at(PROGRAM_INFO_HEADER_SIZE);
    decode_program_info_parts(header, &rest[PROGRAM_INFO_UNUSED_SIZE..])
}

/// Decode a 0x400-byte program info record
pub fn decode_program_info_v1(buffer: &[u8]) -> Result<ProgramInfoV1> {
    if buffer.len() != PROGRAM_INFO_V1_SIZE {
        return Err(LdrError::MalformedResponse("program info size mismatch"));
    }
    let (header, ac) = buffer.split_at(PROGRAM_INFO_HEADER_SIZE);
    decode_program_info_parts(header, ac).map(ProgramInfoV1)
}

/// Encode a program info record as the server would write it
#[cfg(any(test, feature = "mock"))]
pub fn encode_program_info(info: &ProgramInfo, include_unused: bool) -> Result<Vec<u8>> {
    let mut out = bincode::serialize(&ProgramInfoHeader {
        main_thread_priority: info.main_thread_priority,
        default_cpu_id: info.default_cpu_id,
        flags: info.flags.bits(),
        main_thread_stack_size: info.main_thread_stack_size,
        program_id: info.program_id.0,
        acid_sac_size: info.acid_sac_size,
        aci_sac_size: info.aci_sac_size,
        acid_fac_size: info.acid_fac_size,
        aci_fah_size: info.aci_fah_size,
    })?;
    if include_unused {
        out.extend_from_slice(&[0u8; PROGRAM_INFO_UNUSED_SIZE]);
    }
    out.extend_from_slice(&info.ac_buffer[..]);
    Ok(out)
}

/// Encode module info records as the server would write them
#[cfg(any(test, feature = "mock"))]
pub fn encode_module_infos(infos: &[ModuleInfo]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(infos.len() * MODULE_INFO_SIZE);
    for info in infos {
        out.extend(bincode::serialize(info)?);
    }
    Ok(out)
}
