use std::fmt;
use thiserror::Error;

/// Which registry an id belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentKind {
    Browser,
    Player,
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComponentKind::Browser => f.write_str("browser"),
            ComponentKind::Player => f.write_str("player"),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("invalid id {id:?}: ids are non-empty and use only [a-z0-9._-]")]
    InvalidId { id: String },
    #[error("{kind} {id} is already registered")]
    AlreadyRegistered { kind: ComponentKind, id: String },
    #[error("{kind} {id} is not registered")]
    NotRegistered { kind: ComponentKind, id: String },
    #[error("listener is already registered")]
    ListenerAlreadyRegistered,
    #[error("invalid argument: {reason}")]
    InvalidArgument { reason: String },
    #[error("handler for {id} rejected the request")]
    HandlerFailed { id: String },
    #[error("request was canceled")]
    Canceled,
}

pub type CoreResult<T> = Result<T, CoreError>;

/// Component ids are non-empty and use only lowercase ASCII letters, digits,
/// `.`, `-` and `_`.
pub fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .bytes()
            .all(|b| matches!(b, b'a'..=b'z' | b'0'..=b'9' | b'.' | b'-' | b'_'))
}

pub(crate) fn validate_id(id: &str) -> CoreResult<()> {
    if is_valid_id(id) {
        Ok(())
    } else {
        Err(CoreError::InvalidId { id: id.to_string() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_reverse_dns_ids() {
        assert!(is_valid_id("com.tunehub.files.browser"));
        assert!(is_valid_id("a-b_c.9"));
    }

    #[test]
    fn rejects_bad_ids() {
        assert!(!is_valid_id(""));
        assert!(!is_valid_id("Upper"));
        assert!(!is_valid_id("has space"));
        assert!(!is_valid_id("slash/id"));
    }
}
