//! `ldr:pm` client
//!
//! Process manager facet: process creation from pinned programs, program
//! info queries, pinning and program verification.
//!
//! # Version gating
//! - CreateProcess: attribute-carrying layout from 20.0.0 or on enhanced hosts
//! - GetProgramInfo: from 19.0.0 or on enhanced hosts only
//! - GetProgramInfoV1: before 19.0.0 on non-enhanced hosts only
//! - SetEnabledProgramVerification: from 10.0.0 only
//!
//! Gated calls fail with `IncompatibleSystemVersion` before anything is sent.

use std::sync::Arc;

use crate::session::{Pm, SessionHolder};
use crate::transport::{
    BufferAttr, OutHandleAttr, ProcessHandle, Request, ResourceLimitHandle, Transport,
};
use crate::types::{
    CreateProcessFlags, PinId, ProgramAttributes, ProgramInfo, ProgramInfoV1, ProgramLocation,
};
use crate::version::{self, HostVersion, ProgramInfoVariant};
use crate::wire::{self, PROGRAM_INFO_SIZE, PROGRAM_INFO_V1_SIZE};
use crate::{LdrError, Result};

/// Program info in whichever layout the host supports
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgramInfoKind {
    V1(ProgramInfoV1),
    Current(ProgramInfo),
}

impl ProgramInfoKind {
    /// Common fields, independent of layout
    pub fn info(&self) -> &ProgramInfo {
        match self {
            ProgramInfoKind::V1(info) => &info.0,
            ProgramInfoKind::Current(info) => info,
        }
    }
}

/// Process manager client
///
/// Holds one reference on the `ldr:pm` session for as long as it lives.
/// Every call is checked against the host version first.
pub struct PmClient<T: Transport> {
    holder: Arc<SessionHolder<Pm, T>>,
    host: HostVersion,
}

impl<T: Transport> PmClient<T> {
    /// Open (or reuse) the `ldr:pm` session
    ///
    /// # Errors
    /// `Lookup` if the service cannot be resolved
    pub fn new(holder: Arc<SessionHolder<Pm, T>>, host: HostVersion) -> Result<Self> {
        holder.acquire()?;
        Ok(Self { holder, host })
    }

    /// Create a process from a pinned program
    ///
    /// `reslimit` is copied to the server. `attrs` is only sent by the
    /// attribute-carrying layout and ignored otherwise.
    ///
    /// # Returns
    /// The new process handle; ownership moves to the caller
    ///
    /// # Errors
    /// `Transport` with the server's result code (invalid pin, resource
    /// exhaustion), or `MalformedResponse` if no handle came back
    pub fn create_process(
        &self,
        pin_id: PinId,
        flags: CreateProcessFlags,
        reslimit: ResourceLimitHandle,
        attrs: &ProgramAttributes,
    ) -> Result<ProcessHandle> {
        let format = version::create_process_format(&self.host);
        log::trace!("ldr:pm: CreateProcess pin {:#x} as {:?}", pin_id.0, format);

        let request = Request::new(wire::commands::CREATE_PROCESS)
            .with_data(wire::encode_create_process(format, pin_id, flags.bits(), attrs)?)
            .with_in_handle(reslimit.0)
            .with_out_handle(OutHandleAttr::HipcMove);
        let response = self.holder.dispatch(request)?;

        match response.out_handles.as_slice() {
            [handle] => Ok(ProcessHandle::from_raw(*handle)),
            _ => Err(LdrError::MalformedResponse("expected one process handle")),
        }
    }

    /// Program info for `loc` (19.0.0+ or enhanced hosts)
    ///
    /// # Errors
    /// `IncompatibleSystemVersion` on older hosts, without a request being sent
    pub fn get_program_info(
        &self,
        loc: &ProgramLocation,
        attrs: &ProgramAttributes,
    ) -> Result<ProgramInfo> {
        version::check_program_info(&self.host)?;

        let format = version::program_info_request_format(&self.host);
        log::trace!("ldr:pm: GetProgramInfo {} as {:?}", loc.program_id, format);

        let mut buffer = vec![0u8; PROGRAM_INFO_SIZE];
        let request = Request::new(wire::commands::GET_PROGRAM_INFO)
            .with_data(wire::encode_program_info_request(format, loc, attrs)?)
            .with_out_buffer(BufferAttr::HIPC_POINTER | BufferAttr::FIXED_SIZE, &mut buffer);
        self.holder.dispatch(request)?;

        wire::decode_program_info(&buffer)
    }

    /// Program info for `loc` in the pre-19.0.0 layout
    ///
    /// # Errors
    /// `IncompatibleSystemVersion` from 19.0.0 on or on enhanced hosts
    pub fn get_program_info_v1(&self, loc: &ProgramLocation) -> Result<ProgramInfoV1> {
        version::check_program_info_v1(&self.host)?;

        let mut buffer = vec![0u8; PROGRAM_INFO_V1_SIZE];
        let request = Request::new(wire::commands::GET_PROGRAM_INFO)
            .with_data(wire::encode_location(loc)?)
            .with_out_buffer(BufferAttr::HIPC_POINTER | BufferAttr::FIXED_SIZE, &mut buffer);
        self.holder.dispatch(request)?;

        wire::decode_program_info_v1(&buffer)
    }

    /// Program info for `loc` using the variant the host supports
    pub fn resolve_program_info(
        &self,
        loc: &ProgramLocation,
        attrs: &ProgramAttributes,
    ) -> Result<ProgramInfoKind> {
        match version::program_info_variant(&self.host) {
            ProgramInfoVariant::Current => self.get_program_info(loc, attrs).map(ProgramInfoKind::Current),
            ProgramInfoVariant::V1 => self.get_program_info_v1(loc).map(ProgramInfoKind::V1),
        }
    }

    /// Reserve `loc` for process creation
    ///
    /// The returned pin stays valid until [`PmClient::unpin_program`] or the
    /// end of the session.
    pub fn pin_program(&self, loc: &ProgramLocation) -> Result<PinId> {
        let request = Request::new(wire::commands::PIN_PROGRAM).with_data(wire::encode_location(loc)?);
        let response = self.holder.dispatch(request)?;
        Ok(PinId(wire::decode_u64(&response.data)?))
    }

    pub fn unpin_program(&self, pin_id: PinId) -> Result<()> {
        let request = Request::new(wire::commands::UNPIN_PROGRAM).with_data(wire::encode_u64(pin_id.0)?);
        self.holder.dispatch(request)?;
        Ok(())
    }

    /// Toggle signature verification of loaded programs (10.0.0+)
    ///
    /// # Errors
    /// `IncompatibleSystemVersion` before 10.0.0, without a request being sent
    pub fn set_enabled_program_verification(&self, enabled: bool) -> Result<()> {
        version::check_program_verification(&self.host)?;

        let request = Request::new(wire::commands::SET_ENABLED_PROGRAM_VERIFICATION)
            .with_data(wire::encode_bool(enabled)?);
        self.holder.dispatch(request)?;
        Ok(())
    }

    /// Underlying session holder
    pub fn session(&self) -> &SessionHolder<Pm, T> {
        &self.holder
    }
}

impl<T: Transport> Drop for PmClient<T> {
    fn drop(&mut self) {
        self.holder.release();
    }
}
