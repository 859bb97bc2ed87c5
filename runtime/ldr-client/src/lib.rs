//! Loader IPC Client - Bindings for the process-loader services
//!
//! # Purpose
//! Marshals calls to the three loader services into their fixed binary
//! request format and submits them over a session obtained from the
//! service manager:
//! - `ldr:shel`: program arguments for titles launched by the shell
//! - `ldr:dmnt`: program arguments and module info for the debug monitor
//! - `ldr:pm`: process creation, program info and pinning for the process manager
//!
//! # Integration Points
//! - Depends on: a [`Transport`] implementation (session lookup + synchronous call)
//! - Provides to: process manager, debug monitor, shell
//! - IPC endpoints: `ldr:shel`, `ldr:dmnt`, `ldr:pm`
//! - Capabilities required: resource limit handle for process creation
//!
//! # Architecture
//! ```text
//! PmClient::create_process()
//!   └─> version::create_process_format()   [pick wire layout for the host]
//!        └─> wire::encode_create_process()  [byte-exact request payload]
//!             └─> SessionHolder::dispatch()  [Transport::dispatch on the pm session]
//! ```
//!
//! Each service has one [`SessionHolder`], opened lazily by the first client
//! and closed when the last client is dropped. Nothing here retries, caches
//! or logs errors: every failure is returned to the caller as an [`LdrError`].
//!
//! # Testing Strategy
//! - Unit tests: version gates, wire layouts, session reference counting
//! - Integration tests: full calls against [`mock::MockTransport`]
//! - Benchmarks: request encoding

mod arguments;
mod context;
mod dmnt;
mod pm;
mod result;
mod session;
mod shell;
mod transport;
mod types;

pub mod version;
pub mod wire;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use context::LoaderContext;
pub use dmnt::DmntClient;
pub use pm::{PmClient, ProgramInfoKind};
pub use result::ResultCode;
pub use session::{Dmnt, Pm, ServiceKind, SessionHolder, Shell};
pub use shell::ShellClient;
pub use transport::{
    Buffer, BufferAttr, OutHandleAttr, ProcessHandle, RawHandle, Request, ResourceLimitHandle,
    Response, SessionHandle, Transport,
};
pub use types::{
    ApplicationType, CreateProcessFlags, ModuleInfo, PinId, ProgramAttributes, ProgramId,
    ProgramInfo, ProgramInfoFlags, ProgramInfoV1, ProgramLocation, StorageId, AC_BUFFER_SIZE,
};
pub use version::{HostVersion, SystemVersion};

use thiserror::Error;

/// Error types for loader operations
#[derive(Debug, Error)]
pub enum LdrError {
    #[error("Service lookup for {service} failed: {code}")]
    Lookup {
        service: &'static str,
        code: ResultCode,
    },

    #[error("{operation} is not supported on {host}")]
    IncompatibleSystemVersion {
        operation: &'static str,
        host: HostVersion,
    },

    #[error("Transport error: {0}")]
    Transport(ResultCode),

    #[error("No open session for {service}")]
    NotInitialized { service: &'static str },

    #[error("Invalid argument: {0}")]
    InvalidArgument(&'static str),

    #[error("Malformed response: {0}")]
    MalformedResponse(&'static str),

    #[error("Codec error: {0}")]
    Codec(#[from] bincode::Error),
}

impl LdrError {
    /// Raw result code for this error
    ///
    /// Transport and lookup failures return the code the remote side produced;
    /// locally raised errors map onto the library result codes.
    pub fn result_code(&self) -> ResultCode {
        match self {
            LdrError::Lookup { code, .. } => *code,
            LdrError::Transport(code) => *code,
            LdrError::IncompatibleSystemVersion { .. } => ResultCode::INCOMPATIBLE_SYSTEM_VERSION,
            LdrError::NotInitialized { .. } => ResultCode::NOT_INITIALIZED,
            LdrError::InvalidArgument(_)
            | LdrError::MalformedResponse(_)
            | LdrError::Codec(_) => ResultCode::BAD_INPUT,
        }
    }

    /// Check whether a version gate rejected the call
    pub fn is_incompatible_version(&self) -> bool {
        matches!(self, LdrError::IncompatibleSystemVersion { .. })
    }
}

pub type Result<T> = core::result::Result<T, LdrError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_code_passthrough() {
        let code = ResultCode::from_raw(0x1234);
        assert_eq!(LdrError::Transport(code).result_code(), code);
        assert_eq!(
            LdrError::Lookup { service: "ldr:pm", code }.result_code(),
            code
        );
    }

    #[test]
    fn test_incompatible_version_code() {
        let err = LdrError::IncompatibleSystemVersion {
            operation: "GetProgramInfo",
            host: HostVersion::new(SystemVersion::new(18, 5, 0), false),
        };
        assert!(err.is_incompatible_version());
        assert_eq!(err.result_code(), ResultCode::INCOMPATIBLE_SYSTEM_VERSION);
        assert_eq!(err.to_string(), "GetProgramInfo is not supported on 18.5.0");
    }
}
