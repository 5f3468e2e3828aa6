//! Error handling - Hierarchical, typed per-event errors

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// fixflow error hierarchy.
///
/// Per-event variants (`UnknownOrder`, `DuplicateIdentifier`, `FieldParse`)
/// are contained inside the engine: logged and dropped, never propagated
/// across the event-processing boundary. Only `Config` is fatal.
#[derive(Debug, Error)]
pub enum Error {
    /// Cancel or execution references an identifier the registry never saw,
    /// or one already in a terminal state
    #[error("unknown order: {0}")]
    UnknownOrder(String),

    /// Caller-supplied client order identifier collides with a live one
    #[error("duplicate identifier: {0}")]
    DuplicateIdentifier(String),

    /// A required field of a recognized inbound message is absent or unparsable
    #[error("field parse error: tag {tag}: {value:?}")]
    FieldParse { tag: u32, value: String },

    /// Submission attempted before the session confirmed logon
    #[error("session not ready: {0}")]
    NotReady(String),

    /// Session collaborator refused an outbound message
    #[error("session: {0}")]
    Session(String),

    /// Configuration errors (startup-only, fatal)
    #[error("config: {0}")]
    Config(String),
}

impl Error {
    /// An absent tag is reported the same way as an unparsable one: the
    /// event carries no usable value for it.
    pub fn missing_field(tag: u32) -> Self {
        Self::FieldParse {
            tag,
            value: String::from("<missing>"),
        }
    }
}
