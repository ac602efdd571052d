//! The completion protocol: one exchange per request, dispatched at most once.
//!
//! ```text
//! Unsent ──claim──▶ InFlight ──transport done / failed / canceled──▶ Completed
//! ```
//!
//! The first caller to claim the exchange spawns the run on the tokio pool
//! and stores its [`ResponseFuture`]; every later caller gets a clone of the
//! same shared future. `Completed` is terminal.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use http::{Method, Uri};
use micro_rest_http::protocol::{HttpError, HttpHeaders, MessageBase};
use micro_rest_http::stream::OutStream;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, debug_span, trace};

use crate::transport::{RequestBody, ResponseSink, Transport, TransportRequest};
use crate::{ClientConfig, HttpResponse};

/// The memoized outcome of an exchange. Clones resolve to the same response.
pub type ResponseFuture = Shared<BoxFuture<'static, Result<Arc<HttpResponse>, HttpError>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExchangeState {
    Unsent = 0,
    InFlight = 1,
    Completed = 2,
}

impl ExchangeState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Unsent,
            1 => Self::InFlight,
            _ => Self::Completed,
        }
    }
}

/// Everything the run needs, captured from the request when it is claimed.
pub(crate) struct Dispatch {
    pub(crate) uri: Uri,
    pub(crate) method: Method,
    pub(crate) headers: HttpHeaders,
    pub(crate) config: ClientConfig,
    pub(crate) cancel: CancellationToken,
    pub(crate) body: Option<RequestBody>,
    pub(crate) response_stream: Option<OutStream>,
    pub(crate) transport: Arc<dyn Transport>,
}

/// Completion state shared by a request and the task running it.
#[derive(Debug)]
pub struct Exchange {
    state: AtomicU8,
    future: OnceLock<ResponseFuture>,
    response: OnceLock<Weak<HttpResponse>>,
}

impl Default for Exchange {
    fn default() -> Self {
        Self::new()
    }
}

impl Exchange {
    pub fn new() -> Self {
        Self { state: AtomicU8::new(ExchangeState::Unsent as u8), future: OnceLock::new(), response: OnceLock::new() }
    }

    pub fn state(&self) -> ExchangeState {
        ExchangeState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// The memoized future, once the exchange has been claimed.
    pub fn response_future(&self) -> Option<ResponseFuture> {
        self.future.get().cloned()
    }

    /// The response, if the exchange produced one and it is still alive.
    ///
    /// This is an observer: it never keeps the response alive by itself.
    pub fn response(&self) -> Option<Arc<HttpResponse>> {
        self.response.get().and_then(Weak::upgrade)
    }

    /// Claims the exchange and spawns the run, or returns the future of the
    /// run that already claimed it.
    ///
    /// `dispatch` is not called once a future is stored. Callers racing for
    /// the claim may each build one; only the claimant's is run.
    pub(crate) fn start(
        self: &Arc<Self>,
        dispatch: impl FnOnce() -> Result<Dispatch, HttpError>,
    ) -> Result<ResponseFuture, HttpError> {
        if let Some(future) = self.future.get() {
            return Ok(future.clone());
        }

        let handle = Handle::try_current()
            .map_err(|e| HttpError::invalid_argument(format!("a tokio runtime is required to send a request: {e}")))?;
        let dispatch = dispatch()?;

        let claimed = self.state.compare_exchange(
            ExchangeState::Unsent as u8,
            ExchangeState::InFlight as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        if claimed.is_err() {
            // another caller won the claim, its future is about to be stored
            trace!("exchange already claimed");
            return Ok(self.future.wait().clone());
        }

        let span = debug_span!("exchange", method = %dispatch.method, uri = %dispatch.uri);
        debug!(parent: &span, "exchange claimed");
        let task = handle.spawn(Arc::clone(self).run(dispatch).instrument(span));
        let future = async move { task.await.map_err(HttpError::transport)? }.boxed().shared();

        Ok(self.future.get_or_init(|| future).clone())
    }

    async fn run(self: Arc<Self>, dispatch: Dispatch) -> Result<Arc<HttpResponse>, HttpError> {
        let Dispatch { uri, method, headers, config, cancel, body, response_stream, transport } = dispatch;

        let mut message = MessageBase::new();
        if let Some(stream) = response_stream {
            message.set_outstream(stream, false);
        }
        let out = message.prepare_to_receive_data();
        let sink = ResponseSink::new(out, message.instream().cloned(), message.content_ready().clone());

        let request = TransportRequest {
            uri,
            method,
            headers,
            config,
            cancel: cancel.clone(),
            body,
            response_body: sink,
        };

        debug!("dispatching to transport");
        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => Err(HttpError::TaskCanceled),
            outcome = transport.execute(request) => outcome,
        };
        self.state.store(ExchangeState::Completed as u8, Ordering::Release);

        let head = match outcome {
            Ok(head) => head,
            Err(e) => {
                debug!(cause = %e, "exchange failed");
                return Err(e);
            }
        };
        debug!(status = %head.status, "exchange completed");

        *message.headers_mut() = head.headers;
        let response = Arc::new(HttpResponse::from_parts(head.status, head.reason, message));
        let _ = self.response.set(Arc::downgrade(&response));
        Ok(response)
    }
}
