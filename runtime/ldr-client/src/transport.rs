//! Transport seam
//!
//! The loader client does not talk to the kernel itself. Sessions are opened
//! and requests are delivered by a [`Transport`], which owns the actual
//! synchronous call (send, block, receive) and the service-name lookup.
//!
//! A [`Request`] is the client's view of one message: command id, encoded
//! input payload, attached buffers and the handles to transfer.

use bitflags::bitflags;

use crate::result::ResultCode;

/// Open session to a named service
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionHandle(pub u32);

/// Raw kernel handle value
pub type RawHandle = u32;

/// Resource limit handle passed to CreateProcess
///
/// Copied into the request; the caller keeps ownership.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceLimitHandle(pub RawHandle);

/// Handle to a newly created process
///
/// Moved out of the response: the caller is the only owner and is
/// responsible for closing it.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct ProcessHandle(RawHandle);

impl ProcessHandle {
    pub(crate) fn from_raw(raw: RawHandle) -> Self {
        Self(raw)
    }

    pub fn as_raw(&self) -> RawHandle {
        self.0
    }

    /// Give up ownership of the raw handle
    pub fn into_raw(self) -> RawHandle {
        self.0
    }
}

bitflags! {
    /// Attributes of an attached buffer
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferAttr: u32 {
        const IN = 1 << 0;
        const OUT = 1 << 1;
        const HIPC_POINTER = 1 << 3;
        /// Server must reject buffers that are not exactly the declared size
        const FIXED_SIZE = 1 << 4;
    }
}

/// How an output handle is transferred
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutHandleAttr {
    /// Ownership moves to the client
    HipcMove,
}

/// Memory region attached to a request
#[derive(Debug)]
pub enum Buffer<'a> {
    /// Read by the server
    In { attr: BufferAttr, data: &'a [u8] },
    /// Written by the server
    Out { attr: BufferAttr, data: &'a mut [u8] },
}

impl Buffer<'_> {
    pub fn attr(&self) -> BufferAttr {
        match self {
            Buffer::In { attr, .. } | Buffer::Out { attr, .. } => *attr,
        }
    }

    /// Size in bytes
    pub fn size(&self) -> usize {
        match self {
            Buffer::In { data, .. } => data.len(),
            Buffer::Out { data, .. } => data.len(),
        }
    }
}

/// One synchronous request
#[derive(Debug)]
pub struct Request<'a> {
    /// Command identifier within the service
    pub command_id: u32,
    /// Encoded input payload
    pub data: Vec<u8>,
    /// Attached buffers
    pub buffers: Vec<Buffer<'a>>,
    /// Handles copied to the server
    pub in_handles: Vec<RawHandle>,
    /// Expected output handles
    pub out_handles: Vec<OutHandleAttr>,
}

impl<'a> Request<'a> {
    pub fn new(command_id: u32) -> Self {
        Self {
            command_id,
            data: Vec::new(),
            buffers: Vec::new(),
            in_handles: Vec::new(),
            out_handles: Vec::new(),
        }
    }

    pub fn with_data(mut self, data: Vec<u8>) -> Self {
        self.data = data;
        self
    }

    pub fn with_in_buffer(mut self, attr: BufferAttr, data: &'a [u8]) -> Self {
        self.buffers.push(Buffer::In {
            attr: attr | BufferAttr::IN,
            data,
        });
        self
    }

    pub fn with_out_buffer(mut self, attr: BufferAttr, data: &'a mut [u8]) -> Self {
        self.buffers.push(Buffer::Out {
            attr: attr | BufferAttr::OUT,
            data,
        });
        self
    }

    pub fn with_in_handle(mut self, handle: RawHandle) -> Self {
        self.in_handles.push(handle);
        self
    }

    pub fn with_out_handle(mut self, attr: OutHandleAttr) -> Self {
        self.out_handles.push(attr);
        self
    }
}

/// Reply to a request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Response {
    /// Raw output payload
    pub data: Vec<u8>,
    /// Output handles, in request order
    pub out_handles: Vec<RawHandle>,
}

/// Synchronous request/response transport
///
/// Implementations block the calling thread until the server replies.
/// Concurrent calls on one session are serialized (or not) by the transport.
pub trait Transport: Send + Sync {
    /// Resolve a service name to a new session
    ///
    /// # Errors
    /// The lookup's result code if the service does not exist or the
    /// registry call fails
    fn get_service(&self, name: &str) -> core::result::Result<SessionHandle, ResultCode>;

    /// Close a session opened by [`Transport::get_service`]
    fn close_session(&self, session: SessionHandle);

    /// Send one request and wait for the reply
    ///
    /// # Errors
    /// Any transport or server result code, unchanged
    fn dispatch(
        &self,
        session: SessionHandle,
        request: Request<'_>,
    ) -> core::result::Result<Response, ResultCode>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builder() {
        let args = [1u8, 2, 3];
        let mut out = [0u8; 8];
        let req = Request::new(4)
            .with_data(vec![1])
            .with_in_buffer(BufferAttr::HIPC_POINTER, &args)
            .with_out_buffer(BufferAttr::HIPC_POINTER | BufferAttr::FIXED_SIZE, &mut out)
            .with_in_handle(0x55)
            .with_out_handle(OutHandleAttr::HipcMove);

        assert_eq!(req.command_id, 4);
        assert_eq!(req.buffers.len(), 2);
        assert_eq!(req.buffers[0].attr(), BufferAttr::IN | BufferAttr::HIPC_POINTER);
        assert_eq!(
            req.buffers[1].attr(),
            BufferAttr::OUT | BufferAttr::HIPC_POINTER | BufferAttr::FIXED_SIZE
        );
        assert_eq!(req.buffers[1].size(), 8);
        assert_eq!(req.in_handles, vec![0x55]);
        assert_eq!(req.out_handles, vec![OutHandleAttr::HipcMove]);
    }

    #[test]
    fn test_process_handle_ownership() {
        let handle = ProcessHandle::from_raw(0x1234);
        assert_eq!(handle.as_raw(), 0x1234);
        assert_eq!(handle.into_raw(), 0x1234);
    }
}
