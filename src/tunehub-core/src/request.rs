use crate::message::Message;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

type ResponseFn = dyn Fn(&Message) + Send + Sync;
type FinishFn = dyn FnOnce() + Send;

/// Lifecycle of a [`Request`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Pending,
    Completed,
    Canceled,
}

/// One in-flight request addressed to a component.
///
/// Clones refer to the same request. A request reaches a terminal state at
/// most once: either the handler completes it or the requester cancels it.
/// Dropping the last clone of a pending request cancels it.
#[derive(Clone)]
pub struct Request {
    inner: Arc<Inner>,
}

struct Inner {
    message: Message,
    state: Mutex<RequestState>,
    on_response: Box<ResponseFn>,
    on_finish: Mutex<Option<Box<FinishFn>>>,
}

impl Request {
    /// Create a request whose responses are forwarded to `on_response`.
    pub fn new<R>(message: Message, on_response: R) -> Self
    where
        R: Fn(&Message) + Send + Sync + 'static,
    {
        Self::build(message, Box::new(on_response), None)
    }

    /// Like [`Request::new`], with a hook that runs once when the request
    /// reaches a terminal state.
    pub fn with_finish<R, F>(message: Message, on_response: R, on_finish: F) -> Self
    where
        R: Fn(&Message) + Send + Sync + 'static,
        F: FnOnce() + Send + 'static,
    {
        Self::build(message, Box::new(on_response), Some(Box::new(on_finish)))
    }

    fn build(message: Message, on_response: Box<ResponseFn>, on_finish: Option<Box<FinishFn>>) -> Self {
        Self {
            inner: Arc::new(Inner {
                message,
                state: Mutex::new(RequestState::Pending),
                on_response,
                on_finish: Mutex::new(on_finish),
            }),
        }
    }

    /// The request payload.
    pub fn message(&self) -> &Message {
        &self.inner.message
    }

    /// Deliver the response and close the request.
    ///
    /// Returns `false` without delivering anything if the request was already
    /// completed or canceled.
    pub fn complete(&self, response: Message) -> bool {
        if !self.inner.transition(RequestState::Completed) {
            tracing::warn!("request already completed");
            return false;
        }
        (self.inner.on_response)(&response);
        self.inner.finish();
        true
    }

    /// Close the request without a response.
    pub fn cancel(&self) -> bool {
        if !self.inner.transition(RequestState::Canceled) {
            return false;
        }
        self.inner.finish();
        true
    }

    pub fn state(&self) -> RequestState {
        *self.inner.state.lock()
    }

    /// True once the request is completed or canceled.
    pub fn is_completed(&self) -> bool {
        self.state() != RequestState::Pending
    }

    pub fn is_canceled(&self) -> bool {
        self.state() == RequestState::Canceled
    }
}

impl Inner {
    fn transition(&self, to: RequestState) -> bool {
        let mut state = self.state.lock();
        if *state != RequestState::Pending {
            return false;
        }
        *state = to;
        true
    }

    fn finish(&self) {
        let hook = self.on_finish.lock().take();
        if let Some(hook) = hook {
            hook();
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if *state == RequestState::Pending {
            *state = RequestState::Canceled;
            if let Some(hook) = self.on_finish.get_mut().take() {
                hook();
            }
        }
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("message", &self.inner.message)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting() -> (Request, Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let responses = Arc::new(AtomicUsize::new(0));
        let finishes = Arc::new(AtomicUsize::new(0));
        let r = responses.clone();
        let f = finishes.clone();
        let request = Request::with_finish(
            Message::from("ping"),
            move |_| {
                r.fetch_add(1, Ordering::SeqCst);
            },
            move || {
                f.fetch_add(1, Ordering::SeqCst);
            },
        );
        (request, responses, finishes)
    }

    #[test]
    fn complete_delivers_once() {
        let (request, responses, finishes) = counting();
        assert!(request.complete(Message::from("pong")));
        assert!(!request.complete(Message::from("again")));
        assert_eq!(responses.load(Ordering::SeqCst), 1);
        assert_eq!(finishes.load(Ordering::SeqCst), 1);
        assert_eq!(request.state(), RequestState::Completed);
    }

    #[test]
    fn cancel_then_complete_is_rejected() {
        let (request, responses, finishes) = counting();
        assert!(request.cancel());
        assert!(request.is_completed());
        assert!(request.is_canceled());
        assert!(!request.complete(Message::from("late")));
        assert!(!request.cancel());
        assert_eq!(responses.load(Ordering::SeqCst), 0);
        assert_eq!(finishes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn complete_then_cancel_is_rejected() {
        let (request, _, finishes) = counting();
        assert!(request.complete(Message::from("pong")));
        assert!(!request.cancel());
        assert!(!request.is_canceled());
        assert_eq!(finishes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dropping_pending_request_finishes_it() {
        let (request, responses, finishes) = counting();
        let clone = request.clone();
        drop(request);
        assert_eq!(finishes.load(Ordering::SeqCst), 0);
        drop(clone);
        assert_eq!(responses.load(Ordering::SeqCst), 0);
        assert_eq!(finishes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn message_is_retained() {
        let request = Request::new(Message::from("ping"), |_| {});
        assert_eq!(request.message().cdata(), b"ping");
        assert_eq!(request.state(), RequestState::Pending);
    }
}
