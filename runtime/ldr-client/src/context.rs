//! Loader context
//!
//! Owns the transport, the host version and one session holder per loader
//! service. Clients created from the same context share sessions: the first
//! client of a service opens it, the last one to drop closes it.

use std::sync::Arc;

use crate::dmnt::DmntClient;
use crate::pm::PmClient;
use crate::session::{Dmnt, Pm, SessionHolder, Shell};
use crate::shell::ShellClient;
use crate::transport::Transport;
use crate::version::HostVersion;
use crate::Result;

/// Entry point for the loader services on one host
pub struct LoaderContext<T: Transport> {
    host: HostVersion,
    shell: Arc<SessionHolder<Shell, T>>,
    dmnt: Arc<SessionHolder<Dmnt, T>>,
    pm: Arc<SessionHolder<Pm, T>>,
}

impl<T: Transport> LoaderContext<T> {
    /// Create a context; no session is opened until a client asks for one
    pub fn new(transport: Arc<T>, host: HostVersion) -> Self {
        log::debug!("loader context for host {}", host);
        Self {
            host,
            shell: Arc::new(SessionHolder::new(transport.clone())),
            dmnt: Arc::new(SessionHolder::new(transport.clone())),
            pm: Arc::new(SessionHolder::new(transport)),
        }
    }

    pub fn host(&self) -> &HostVersion {
        &self.host
    }

    /// Client for `ldr:shel`
    ///
    /// # Errors
    /// `Lookup` if the service cannot be resolved
    pub fn shell(&self) -> Result<ShellClient<T>> {
        ShellClient::new(self.shell.clone(), self.host)
    }

    /// Client for `ldr:dmnt`
    ///
    /// # Errors
    /// `Lookup` if the service cannot be resolved
    pub fn dmnt(&self) -> Result<DmntClient<T>> {
        DmntClient::new(self.dmnt.clone(), self.host)
    }

    /// Client for `ldr:pm`
    ///
    /// # Errors
    /// `Lookup` if the service cannot be resolved
    pub fn pm(&self) -> Result<PmClient<T>> {
        PmClient::new(self.pm.clone(), self.host)
    }
}
