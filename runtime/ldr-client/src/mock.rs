//! Mock transport for development and testing
//!
//! Records every lookup, close and request, and answers requests from a
//! queue of scripted replies. Requests with no scripted reply succeed with
//! an empty response.
//!
//! ```ignore
//! let transport = Arc::new(MockTransport::new());
//! transport.push_reply(MockReply::ok().with_data(7u64.to_le_bytes().to_vec()));
//!
//! let ctx = LoaderContext::new(transport.clone(), host);
//! let pin = ctx.pm()?.pin_program(&loc)?;
//! assert_eq!(transport.calls()[0].command_id, 2);
//! ```

use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;

use crate::result::ResultCode;
use crate::transport::{
    Buffer, BufferAttr, OutHandleAttr, RawHandle, Request, Response, SessionHandle, Transport,
};

/// First session handle handed out by the mock
pub const FIRST_SESSION: u32 = 0x100;

/// Buffer as seen by the mock server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedBuffer {
    pub attr: BufferAttr,
    pub len: usize,
    /// Contents of input buffers; empty for output buffers
    pub contents: Vec<u8>,
}

/// Request as seen by the mock server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub session: SessionHandle,
    pub command_id: u32,
    pub data: Vec<u8>,
    pub buffers: Vec<RecordedBuffer>,
    pub in_handles: Vec<RawHandle>,
    pub out_handles: Vec<OutHandleAttr>,
}

/// Scripted server reply
#[derive(Debug, Clone, Default)]
pub struct MockReply {
    result: Option<ResultCode>,
    data: Vec<u8>,
    out_buffer: Vec<u8>,
    out_handles: Vec<RawHandle>,
}

impl MockReply {
    pub fn ok() -> Self {
        Self::default()
    }

    /// Fail the request with `code`
    pub fn error(code: ResultCode) -> Self {
        Self {
            result: Some(code),
            ..Self::default()
        }
    }

    /// Raw output payload
    pub fn with_data(mut self, data: Vec<u8>) -> Self {
        self.data = data;
        self
    }

    /// Bytes written into the first output buffer, truncated to its size
    pub fn with_out_buffer(mut self, bytes: Vec<u8>) -> Self {
        self.out_buffer = bytes;
        self
    }

    pub fn with_out_handle(mut self, handle: RawHandle) -> Self {
        self.out_handles.push(handle);
        self
    }
}

#[derive(Debug, Default)]
struct MockState {
    next_session: u32,
    lookups: Vec<String>,
    closed: Vec<SessionHandle>,
    calls: Vec<RecordedCall>,
    replies: VecDeque<MockReply>,
    missing: HashMap<String, ResultCode>,
}

/// Recording transport
#[derive(Debug)]
pub struct MockTransport {
    state: Mutex<MockState>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                next_session: FIRST_SESSION,
                ..MockState::default()
            }),
        }
    }

    /// Make lookups of `name` fail with `code`
    pub fn without_service(self, name: &str, code: ResultCode) -> Self {
        self.state.lock().missing.insert(name.to_string(), code);
        self
    }

    /// Queue the reply for the next request
    pub fn push_reply(&self, reply: MockReply) {
        self.state.lock().replies.push_back(reply);
    }

    /// Requests received so far, oldest first
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state.lock().calls.clone()
    }

    /// Service names looked up so far
    pub fn lookups(&self) -> Vec<String> {
        self.state.lock().lookups.clone()
    }

    /// Sessions closed so far
    pub fn closed_sessions(&self) -> Vec<SessionHandle> {
        self.state.lock().closed.clone()
    }
}

impl Transport for MockTransport {
    fn get_service(&self, name: &str) -> Result<SessionHandle, ResultCode> {
        let mut state = self.state.lock();
        state.lookups.push(name.to_string());

        if let Some(code) = state.missing.get(name) {
            return Err(*code);
        }

        let handle = SessionHandle(state.next_session);
        state.next_session += 1;
        Ok(handle)
    }

    fn close_session(&self, session: SessionHandle) {
        self.state.lock().closed.push(session);
    }

    fn dispatch(&self, session: SessionHandle, request: Request<'_>) -> Result<Response, ResultCode> {
        let Request {
            command_id,
            data,
            mut buffers,
            in_handles,
            out_handles,
        } = request;

        let mut state = self.state.lock();
        state.calls.push(RecordedCall {
            session,
            command_id,
            data,
            buffers: buffers
                .iter()
                .map(|buffer| RecordedBuffer {
                    attr: buffer.attr(),
                    len: buffer.size(),
                    contents: match buffer {
                        Buffer::In { data, .. } => data.to_vec(),
                        Buffer::Out { .. } => Vec::new(),
                    },
                })
                .collect(),
            in_handles,
            out_handles,
        });

        let reply = state.replies.pop_front().unwrap_or_default();
        if let Some(code) = reply.result {
            return Err(code);
        }

        let out = buffers.iter_mut().find_map(|buffer| match buffer {
            Buffer::Out { data, .. } => Some(&mut **data),
            Buffer::In { .. } => None,
        });
        if let Some(out) = out {
            let n = out.len().min(reply.out_buffer.len());
            out[..n].copy_from_slice(&reply.out_buffer[..n]);
        }

        Ok(Response {
            data: reply.data,
            out_handles: reply.out_handles,
        })
    }
}
