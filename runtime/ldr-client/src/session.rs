//! Session holders
//!
//! One [`SessionHolder`] per loader service. The session is opened on the
//! first [`SessionHolder::acquire`] and closed when the matching number of
//! [`SessionHolder::release`] calls brings the reference count back to zero.
//!
//! References are only taken and dropped by the clients that own them, so a
//! client's session stays open for as long as the client lives.
//!
//! Acquisition runs under the holder's lock, so concurrent first users wait
//! for a single lookup instead of racing to open several sessions. Once open,
//! the handle is only read; requests are sent without holding the lock.

use core::marker::PhantomData;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::transport::{Request, Response, SessionHandle, Transport};
use crate::{LdrError, Result};

/// A named loader service
pub trait ServiceKind: Send + Sync + 'static {
    /// Name registered with the service manager
    const NAME: &'static str;
}

/// `ldr:shel`
#[derive(Debug)]
pub struct Shell;

/// `ldr:dmnt`
#[derive(Debug)]
pub struct Dmnt;

/// `ldr:pm`
#[derive(Debug)]
pub struct Pm;

impl ServiceKind for Shell {
    const NAME: &'static str = "ldr:shel";
}

impl ServiceKind for Dmnt {
    const NAME: &'static str = "ldr:dmnt";
}

impl ServiceKind for Pm {
    const NAME: &'static str = "ldr:pm";
}

#[derive(Debug, Default)]
struct SessionState {
    handle: Option<SessionHandle>,
    refs: usize,
}

/// Reference-counted session to the service `K`
pub struct SessionHolder<K: ServiceKind, T: Transport> {
    transport: Arc<T>,
    state: Mutex<SessionState>,
    _kind: PhantomData<fn() -> K>,
}

impl<K: ServiceKind, T: Transport> SessionHolder<K, T> {
    pub fn new(transport: Arc<T>) -> Self {
        Self {
            transport,
            state: Mutex::new(SessionState::default()),
            _kind: PhantomData,
        }
    }

    /// Service name this holder connects to
    pub fn name(&self) -> &'static str {
        K::NAME
    }

    /// Take a reference, opening the session if this is the first one
    ///
    /// # Errors
    /// `Lookup` with the transport's result code if the service cannot be
    /// resolved. The reference count is left unchanged.
    pub(crate) fn acquire(&self) -> Result<()> {
        let mut state = self.state.lock();

        if state.refs == 0 {
            let handle = self
                .transport
                .get_service(K::NAME)
                .map_err(|code| LdrError::Lookup {
                    service: K::NAME,
                    code,
                })?;
            log::debug!("{}: session {:#x} opened", K::NAME, handle.0);
            state.handle = Some(handle);
        }

        state.refs += 1;
        Ok(())
    }

    /// Drop a reference, closing the session when it was the last one
    ///
    /// Releasing a holder with no references is a no-op.
    pub(crate) fn release(&self) {
        let mut state = self.state.lock();

        if state.refs == 0 {
            return;
        }

        state.refs -= 1;
        if state.refs == 0 {
            if let Some(handle) = state.handle.take() {
                self.transport.close_session(handle);
                log::debug!("{}: session {:#x} closed", K::NAME, handle.0);
            }
        }
    }

    /// Current session handle
    ///
    /// # Errors
    /// `NotInitialized` if no reference is held
    pub fn session(&self) -> Result<SessionHandle> {
        self.state
            .lock()
            .handle
            .ok_or(LdrError::NotInitialized { service: K::NAME })
    }

    /// Number of outstanding references
    pub fn ref_count(&self) -> usize {
        self.state.lock().refs
    }

    pub fn is_open(&self) -> bool {
        self.state.lock().handle.is_some()
    }

    /// Send a request over the open session
    ///
    /// # Errors
    /// `NotInitialized` without a session, `Transport` with the remote
    /// result code otherwise
    pub(crate) fn dispatch(&self, request: Request<'_>) -> Result<Response> {
        let session = self.session()?;
        log::trace!(
            "{}: command {} ({} bytes, {} buffers, {} handles)",
            K::NAME,
            request.command_id,
            request.data.len(),
            request.buffers.len(),
            request.in_handles.len(),
        );
        self.transport
            .dispatch(session, request)
            .map_err(LdrError::Transport)
    }
}

impl<K: ServiceKind, T: Transport> Drop for SessionHolder<K, T> {
    fn drop(&mut self) {
        if let Some(handle) = self.state.get_mut().handle.take() {
            self.transport.close_session(handle);
        }
    }
}

impl<K: ServiceKind, T: Transport> core::fmt::Debug for SessionHolder<K, T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("SessionHolder")
            .field("service", &K::NAME)
            .field("handle", &state.handle)
            .field("refs", &state.refs)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockTransport;
    use crate::result::ResultCode;

    #[test]
    fn test_lazy_acquire_and_release() {
        let transport = Arc::new(MockTransport::new());
        let holder = SessionHolder::<Pm, _>::new(transport.clone());

        assert!(!holder.is_open());
        assert!(matches!(
            holder.session(),
            Err(LdrError::NotInitialized { service: "ldr:pm" })
        ));

        holder.acquire().unwrap();
        holder.acquire().unwrap();
        assert_eq!(holder.ref_count(), 2);
        assert_eq!(transport.lookups(), vec!["ldr:pm".to_string()]);

        holder.release();
        assert!(holder.is_open());
        holder.release();
        assert!(!holder.is_open());
        assert_eq!(transport.closed_sessions().len(), 1);

        // Extra release must not underflow or close twice
        holder.release();
        assert_eq!(holder.ref_count(), 0);
        assert_eq!(transport.closed_sessions().len(), 1);
    }

    #[test]
    fn test_reacquire_opens_new_session() {
        let transport = Arc::new(MockTransport::new());
        let holder = SessionHolder::<Shell, _>::new(transport.clone());

        holder.acquire().unwrap();
        let first = holder.session().unwrap();
        holder.release();

        holder.acquire().unwrap();
        let second = holder.session().unwrap();
        assert_ne!(first, second);
        assert_eq!(transport.lookups().len(), 2);
    }

    #[test]
    fn test_lookup_failure_is_surfaced() {
        let code = ResultCode::new(21, 6);
        let transport = Arc::new(MockTransport::new().without_service(Dmnt::NAME, code));
        let holder = SessionHolder::<Dmnt, _>::new(transport.clone());

        match holder.acquire() {
            Err(LdrError::Lookup { service, code: got }) => {
                assert_eq!(service, "ldr:dmnt");
                assert_eq!(got, code);
            }
            other => panic!("expected lookup failure, got {other:?}"),
        }
        assert_eq!(holder.ref_count(), 0);
        assert!(!holder.is_open());
    }

    #[test]
    fn test_concurrent_first_use_single_lookup() {
        let transport = Arc::new(MockTransport::new());
        let holder = SessionHolder::<Pm, _>::new(transport.clone());

        crossbeam::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|_| holder.acquire().unwrap());
            }
        })
        .unwrap();

        assert_eq!(holder.ref_count(), 8);
        assert_eq!(transport.lookups().len(), 1);
    }

    #[test]
    fn test_drop_closes_leaked_session() {
        let transport = Arc::new(MockTransport::new());
        {
            let holder = SessionHolder::<Pm, _>::new(transport.clone());
            holder.acquire().unwrap();
        }
        assert_eq!(transport.closed_sessions().len(), 1);
    }
}
