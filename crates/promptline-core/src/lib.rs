//! Core session and process management for promptline.

mod buffer;
mod decoder;
mod error;
mod matcher;
mod process;
mod reader;
mod registry;
mod session;
mod transcript;

pub use buffer::OutputBuffer;
pub use decoder::Utf8Decoder;
pub use error::PromptlineError;
pub use matcher::{find_earliest, PromptMatch};
pub use process::{LaunchSpec, ProcessHandle};
pub use registry::{RegistryConfig, SessionRegistry, StartOptions};
pub use session::{SendOptions, Session, DEFAULT_WRITE_TIMEOUT};
pub use transcript::{auto_log_path, TranscriptSink};

/// Result type for promptline operations.
pub type Result<T> = std::result::Result<T, PromptlineError>;
