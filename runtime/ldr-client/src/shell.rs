//! `ldr:shel` client

use std::sync::Arc;

use crate::arguments;
use crate::session::{SessionHolder, Shell};
use crate::transport::Transport;
use crate::types::ProgramId;
use crate::version::HostVersion;
use crate::Result;

/// Shell facet: program arguments for titles launched by the shell
///
/// Holds one reference on the `ldr:shel` session for as long as it lives.
pub struct ShellClient<T: Transport> {
    holder: Arc<SessionHolder<Shell, T>>,
    host: HostVersion,
}

impl<T: Transport> ShellClient<T> {
    /// Open (or reuse) the `ldr:shel` session
    ///
    /// # Errors
    /// `Lookup` if the service cannot be resolved
    pub fn new(holder: Arc<SessionHolder<Shell, T>>, host: HostVersion) -> Result<Self> {
        holder.acquire()?;
        Ok(Self { holder, host })
    }

    pub fn set_program_arguments(&self, program_id: ProgramId, args: &[u8]) -> Result<()> {
        arguments::set_program_arguments(&self.holder, &self.host, program_id, args)
    }

    pub fn flush_arguments(&self) -> Result<()> {
        arguments::flush_arguments(&self.holder)
    }

    /// Underlying session holder
    pub fn session(&self) -> &SessionHolder<Shell, T> {
        &self.holder
    }
}

impl<T: Transport> Drop for ShellClient<T> {
    fn drop(&mut self) {
        self.holder.release();
    }
}
