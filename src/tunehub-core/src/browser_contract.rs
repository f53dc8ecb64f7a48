use crate::browser::{Browser, BrowserEvent, BrowserRegistry};
use crate::events::Listener;
use crate::message::Message;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Expectations supplied by a browser implementation to run the shared contract suite.
#[derive(Debug, Clone)]
pub struct BrowserContractExpectations {
    /// Id the browser is registered under for the run.
    pub browser_id: String,
    /// A request the browser must answer with a response.
    pub request: Message,
    /// Text the response must contain, if any.
    pub response_contains: Option<String>,
    /// How long to wait for asynchronous handlers to finish.
    pub timeout: Duration,
}

impl BrowserContractExpectations {
    pub fn new(browser_id: impl Into<String>, request: Message) -> Self {
        Self {
            browser_id: browser_id.into(),
            request,
            response_contains: None,
            timeout: Duration::from_secs(2),
        }
    }
}

/// Errors surfaced by the browser contract test harness.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BrowserContractError {
    #[error("browser reported an empty name")]
    EmptyName,
    #[error("registry did not announce the browser as added")]
    MissingAddedEvent,
    #[error("request was not finished within {0:?}")]
    Timeout(Duration),
    #[error("request finished without a response")]
    NoResponse,
    #[error("response arrived after the end of the request")]
    ResponseAfterEnd,
    #[error("end of request delivered {0} times")]
    RepeatedEnd(usize),
    #[error("response did not contain {expected:?}: {actual:?}")]
    UnexpectedResponse { expected: String, actual: String },
    #[error("canceled request delivered a response")]
    ResponseAfterCancel,
    #[error("registry error while running contract: {0}")]
    Registry(String),
}

/// Run the shared browser contract suite against a browser implementation.
///
/// Browsers should call this from their crate-level tests with a request they
/// know how to answer from their test fixtures.
pub fn run_browser_contract(
    browser: Arc<dyn Browser>,
    expectations: &BrowserContractExpectations,
) -> Result<(), BrowserContractError> {
    if browser.info().name.trim().is_empty() {
        return Err(BrowserContractError::EmptyName);
    }

    let registry = BrowserRegistry::new();
    let announced = Recording::default();
    registry
        .add_event_listener(None, announced.listener())
        .map_err(|e| BrowserContractError::Registry(e.to_string()))?;
    registry
        .add(&expectations.browser_id, browser)
        .map_err(|e| BrowserContractError::Registry(e.to_string()))?;
    verify_announced(&announced, &expectations.browser_id)?;
    verify_response(&registry, expectations)?;
    verify_cancel(&registry, expectations)?;
    Ok(())
}

fn verify_announced(recording: &Recording, id: &str) -> Result<(), BrowserContractError> {
    let found = recording.frames().iter().flatten().any(|frame| {
        matches!(
            serde_json::from_str::<BrowserEvent>(frame),
            Ok(BrowserEvent::Added { id: ref added, .. }) if added == id
        )
    });
    if found {
        Ok(())
    } else {
        Err(BrowserContractError::MissingAddedEvent)
    }
}

fn verify_response(
    registry: &BrowserRegistry,
    expectations: &BrowserContractExpectations,
) -> Result<(), BrowserContractError> {
    let recording = Recording::default();
    registry
        .handle_request(
            &expectations.browser_id,
            expectations.request.clone(),
            recording.listener(),
        )
        .map_err(|e| BrowserContractError::Registry(e.to_string()))?;
    let frames = recording.wait_for_end(expectations.timeout)?;

    let ends = frames.iter().filter(|f| f.is_none()).count();
    if ends != 1 {
        return Err(BrowserContractError::RepeatedEnd(ends));
    }
    if frames.last().is_some_and(Option::is_some) {
        return Err(BrowserContractError::ResponseAfterEnd);
    }
    let response = frames
        .iter()
        .flatten()
        .next()
        .ok_or(BrowserContractError::NoResponse)?;
    if let Some(expected) = &expectations.response_contains {
        if !response.contains(expected.as_str()) {
            return Err(BrowserContractError::UnexpectedResponse {
                expected: expected.clone(),
                actual: response.clone(),
            });
        }
    }
    Ok(())
}

fn verify_cancel(
    registry: &BrowserRegistry,
    expectations: &BrowserContractExpectations,
) -> Result<(), BrowserContractError> {
    let recording = Recording::default();
    let request = registry
        .handle_request(
            &expectations.browser_id,
            expectations.request.clone(),
            recording.listener(),
        )
        .map_err(|e| BrowserContractError::Registry(e.to_string()))?;
    if !request.cancel() {
        // Answered synchronously; nothing left to cancel.
        return Ok(());
    }
    let frames = recording.wait_for_end(expectations.timeout)?;
    if frames.iter().any(Option::is_some) {
        return Err(BrowserContractError::ResponseAfterCancel);
    }
    if frames.len() != 1 {
        return Err(BrowserContractError::RepeatedEnd(frames.len()));
    }
    Ok(())
}

#[derive(Clone, Default)]
struct Recording {
    frames: Arc<Mutex<Vec<Option<String>>>>,
}

impl Recording {
    fn listener(&self) -> Listener {
        let frames = self.frames.clone();
        Listener::new(move |msg| {
            frames.lock().push(msg.map(Message::to_text));
            true
        })
    }

    fn frames(&self) -> Vec<Option<String>> {
        self.frames.lock().clone()
    }

    fn wait_for_end(&self, timeout: Duration) -> Result<Vec<Option<String>>, BrowserContractError> {
        let deadline = Instant::now() + timeout;
        loop {
            let frames = self.frames();
            if frames.iter().any(Option::is_none) {
                // Give late frames a moment to show up so double ends are caught.
                std::thread::sleep(Duration::from_millis(10));
                return Ok(self.frames());
            }
            if Instant::now() >= deadline {
                return Err(BrowserContractError::Timeout(timeout));
            }
            std::thread::sleep(Duration::from_millis(5));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::BrowserInfo;
    use crate::request::Request;

    struct Greeter {
        threaded: bool,
    }

    impl Browser for Greeter {
        fn info(&self) -> BrowserInfo {
            BrowserInfo {
                name: "Greeter".into(),
                description: "Says hello".into(),
                ..BrowserInfo::default()
            }
        }

        fn handle_request(&self, request: Request) -> bool {
            let reply = Message::from(format!("hello {}", request.message().to_text()));
            if self.threaded {
                std::thread::spawn(move || {
                    std::thread::sleep(Duration::from_millis(20));
                    request.complete(reply);
                });
            } else {
                request.complete(reply);
            }
            true
        }
    }

    struct Silent;

    impl Browser for Silent {
        fn info(&self) -> BrowserInfo {
            BrowserInfo {
                name: "Silent".into(),
                ..BrowserInfo::default()
            }
        }

        fn handle_request(&self, _request: Request) -> bool {
            true
        }
    }

    fn expectations() -> BrowserContractExpectations {
        let mut exp = BrowserContractExpectations::new("greeter", Message::from("world"));
        exp.response_contains = Some("hello world".into());
        exp
    }

    #[test]
    fn synchronous_browser_passes() {
        let result = run_browser_contract(Arc::new(Greeter { threaded: false }), &expectations());
        assert_eq!(result, Ok(()));
    }

    #[test]
    fn threaded_browser_passes() {
        let result = run_browser_contract(Arc::new(Greeter { threaded: true }), &expectations());
        assert_eq!(result, Ok(()));
    }

    #[test]
    fn browser_that_drops_requests_fails() {
        let result = run_browser_contract(Arc::new(Silent), &expectations());
        assert_eq!(result, Err(BrowserContractError::NoResponse));
    }

    #[test]
    fn empty_name_rejected() {
        struct Nameless;
        impl Browser for Nameless {
            fn info(&self) -> BrowserInfo {
                BrowserInfo::default()
            }
            fn handle_request(&self, _request: Request) -> bool {
                false
            }
        }
        let result = run_browser_contract(Arc::new(Nameless), &expectations());
        assert_eq!(result, Err(BrowserContractError::EmptyName));
    }
}
