//! `ldr:dmnt` client
//!
//! Debug monitor facet: program arguments plus module info of a running
//! process.

use std::sync::Arc;

use crate::arguments;
use crate::session::{Dmnt, SessionHolder};
use crate::transport::{BufferAttr, Request, Transport};
use crate::types::{ModuleInfo, ProgramId};
use crate::version::HostVersion;
use crate::wire::{self, MODULE_INFO_SIZE};
use crate::{LdrError, Result};

/// Holds one reference on the `ldr:dmnt` session for as long as it lives.
pub struct DmntClient<T: Transport> {
    holder: Arc<SessionHolder<Dmnt, T>>,
    host: HostVersion,
}

impl<T: Transport> DmntClient<T> {
    /// Open (or reuse) the `ldr:dmnt` session
    ///
    /// # Errors
    /// `Lookup` if the service cannot be resolved
    pub fn new(holder: Arc<SessionHolder<Dmnt, T>>, host: HostVersion) -> Result<Self> {
        holder.acquire()?;
        Ok(Self { holder, host })
    }

    pub fn set_program_arguments(&self, program_id: ProgramId, args: &[u8]) -> Result<()> {
        arguments::set_program_arguments(&self.holder, &self.host, program_id, args)
    }

    pub fn flush_arguments(&self) -> Result<()> {
        arguments::flush_arguments(&self.holder)
    }

    /// Send the query with room for `capacity` records
    ///
    /// Returns the raw output buffer and the reported count, clamped to
    /// `[0, capacity]`.
    fn query_module_info(&self, pid: u64, capacity: usize) -> Result<(Vec<u8>, usize)> {
        let size = capacity
            .checked_mul(MODULE_INFO_SIZE)
            .ok_or(LdrError::InvalidArgument("module info capacity overflows"))?;
        let mut buffer = Vec::new();
        buffer
            .try_reserve_exact(size)
            .map_err(|_| LdrError::InvalidArgument("module info capacity too large"))?;
        buffer.resize(size, 0);

        let request = Request::new(wire::commands::GET_PROCESS_MODULE_INFO)
            .with_data(wire::encode_u64(pid)?)
            .with_out_buffer(BufferAttr::HIPC_POINTER, &mut buffer);
        let response = self.holder.dispatch(request)?;

        let reported = wire::decode_s32(&response.data)?;
        let count = usize::try_from(reported).unwrap_or(0).min(capacity);
        Ok((buffer, count))
    }

    /// Fill `out` with the modules loaded in process `pid`
    ///
    /// The capacity declared to the server is `out.len()`. Returns how many
    /// leading entries were written; the count is clamped to `out.len()` so a
    /// misbehaving server can never report more than was asked for. Entries
    /// past the count are left untouched.
    ///
    /// # Errors
    /// `Transport` with the server's result code, or `MalformedResponse` if
    /// the reply carries no count
    pub fn get_process_module_info_into(&self, pid: u64, out: &mut [ModuleInfo]) -> Result<usize> {
        let (buffer, count) = self.query_module_info(pid, out.len())?;
        let modules = wire::decode_module_infos(&buffer, count)?;
        out[..modules.len()].copy_from_slice(&modules);
        Ok(modules.len())
    }

    /// Modules loaded in process `pid`, at most `max_count` of them
    ///
    /// # Errors
    /// `InvalidArgument` without a request being sent if a buffer for
    /// `max_count` records cannot be allocated, otherwise as
    /// [`DmntClient::get_process_module_info_into`]
    pub fn get_process_module_info(&self, pid: u64, max_count: usize) -> Result<Vec<ModuleInfo>> {
        let (buffer, count) = self.query_module_info(pid, max_count)?;
        wire::decode_module_infos(&buffer, count)
    }

    /// Underlying session holder
    pub fn session(&self) -> &SessionHolder<Dmnt, T> {
        &self.holder
    }
}

impl<T: Transport> Drop for DmntClient<T> {
    fn drop(&mut self) {
        self.holder.release();
    }
}
