//! Loader data types
//!
//! Identifiers, locations and the records returned by the loader. Sizes of
//! the wire-visible records are fixed by the remote side and asserted at
//! compile time in [`crate::wire`].

use core::fmt;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// Program (title) identifier
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProgramId(pub u64);

impl fmt::Display for ProgramId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Server-side pin token returned by PinProgram
///
/// Valid until passed to UnpinProgram or the pm session ends.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PinId(pub u64);

/// Where a program is stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageId {
    None,
    Host,
    GameCard,
    BuiltInSystem,
    BuiltInUser,
    SdCard,
    Any,
    /// Value not known to this library, carried verbatim
    Other(u8),
}

impl From<u8> for StorageId {
    fn from(raw: u8) -> Self {
        match raw {
            0 => StorageId::None,
            1 => StorageId::Host,
            2 => StorageId::GameCard,
            3 => StorageId::BuiltInSystem,
            4 => StorageId::BuiltInUser,
            5 => StorageId::SdCard,
            6 => StorageId::Any,
            other => StorageId::Other(other),
        }
    }
}

impl From<StorageId> for u8 {
    fn from(id: StorageId) -> Self {
        match id {
            StorageId::None => 0,
            StorageId::Host => 1,
            StorageId::GameCard => 2,
            StorageId::BuiltInSystem => 3,
            StorageId::BuiltInUser => 4,
            StorageId::SdCard => 5,
            StorageId::Any => 6,
            StorageId::Other(raw) => raw,
        }
    }
}

/// Program identifier plus the storage it lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramLocation {
    pub program_id: ProgramId,
    pub storage_id: StorageId,
}

impl ProgramLocation {
    pub fn new(program_id: ProgramId, storage_id: StorageId) -> Self {
        Self {
            program_id,
            storage_id,
        }
    }
}

/// Process-creation attributes sent by the attribute-carrying formats
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ProgramAttributes {
    /// Content meta platform
    pub platform: u8,
    /// Content attributes of the program's storage
    pub content_attributes: u8,
}

bitflags! {
    /// CreateProcess flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CreateProcessFlags: u32 {
        /// Create the process suspended for a debugger
        const ENABLE_DEBUG = 1 << 0;
        /// Load without address space randomization
        const DISABLE_ASLR = 1 << 1;
    }
}

bitflags! {
    /// `flags` field of a program info record
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ProgramInfoFlags: u16 {
        const APPLICATION = 1 << 0;
        const APPLET = 1 << 1;
        const APPLICATION_TYPE_MASK = 0b11;
        const ALLOW_DEBUG = 1 << 2;
    }
}

/// Application type encoded in bits 0-1 of [`ProgramInfoFlags`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplicationType {
    SystemModule,
    Application,
    Applet,
    Unknown,
}

impl ProgramInfoFlags {
    pub fn application_type(self) -> ApplicationType {
        match (self & Self::APPLICATION_TYPE_MASK).bits() {
            0 => ApplicationType::SystemModule,
            1 => ApplicationType::Application,
            2 => ApplicationType::Applet,
            _ => ApplicationType::Unknown,
        }
    }
}

/// Module loaded into a process, as reported by the debug monitor query
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleInfo {
    pub build_id: [u8; 0x20],
    pub base_address: u64,
    pub size: u64,
}

/// Size of the access-control blob area in program info records
pub const AC_BUFFER_SIZE: usize = 0x3E0;

/// Program info record (GetProgramInfo, 19.0.0+)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramInfo {
    pub main_thread_priority: u8,
    pub default_cpu_id: u8,
    pub flags: ProgramInfoFlags,
    pub main_thread_stack_size: u32,
    pub program_id: ProgramId,
    pub acid_sac_size: u32,
    pub aci_sac_size: u32,
    pub acid_fac_size: u32,
    pub aci_fah_size: u32,
    pub ac_buffer: Box<[u8; AC_BUFFER_SIZE]>,
}

/// Program info record (GetProgramInfoV1, before 19.0.0)
///
/// Same fields as [`ProgramInfo`]; only the wire layout differs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramInfoV1(pub ProgramInfo);

impl ProgramInfo {
    /// Section `index` of the packed access-control blobs
    fn ac_section(&self, index: usize) -> Option<&[u8]> {
        let sizes = [
            self.acid_sac_size,
            self.aci_sac_size,
            self.acid_fac_size,
            self.aci_fah_size,
        ];
        let start = sizes[..index]
            .iter()
            .try_fold(0usize, |acc, &size| acc.checked_add(size as usize))?;
        let end = start.checked_add(sizes[index] as usize)?;
        self.ac_buffer.get(start..end)
    }

    /// Service access control from the ACID
    pub fn acid_sac(&self) -> Option<&[u8]> {
        self.ac_section(0)
    }

    /// Service access control from the ACI
    pub fn aci_sac(&self) -> Option<&[u8]> {
        self.ac_section(1)
    }

    /// Filesystem access control from the ACID
    pub fn acid_fac(&self) -> Option<&[u8]> {
        self.ac_section(2)
    }

    /// Filesystem access header from the ACI
    pub fn aci_fah(&self) -> Option<&[u8]> {
        self.ac_section(3)
    }
}

impl core::ops::Deref for ProgramInfoV1 {
    type Target = ProgramInfo;

    fn deref(&self) -> &ProgramInfo {
        &self.0
    }
}
