//! Core building blocks shared by every Tunehub crate: byte messages,
//! listeners and event sets, requests, the browser registry, media metadata,
//! and the ambient configuration, logging and directory layout.

pub mod browser;
pub mod browser_contract;
pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod media;
pub mod message;
pub mod paths;
pub mod request;

pub use browser::{Browser, BrowserEvent, BrowserHandle, BrowserInfo, BrowserRegistry};
pub use config::{
    Config, ConfigError, LogLevel, LoggingConfig, PlaybackConfig, ValidationError,
};
pub use error::{is_valid_id, ComponentKind, CoreError, CoreResult};
pub use events::{EventSet, Listener};
pub use logging::{init_logging, LoggingError, LoggingGuard};
pub use media::{Media, Tags};
pub use message::{Message, MessageBuilder};
pub use paths::{AppDirs, DirsError};
pub use request::{Request, RequestState};

pub const APP_NAME: &str = "tunehub";
pub const APP_AUTHOR: &str = "Tunehub";
pub const APP_QUALIFIER: &str = "io";
