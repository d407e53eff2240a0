use crate::identity::Kind;

/// Error type for the crate
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum Error {
    /// Policy file has the wrong mode bits or owner
    #[error("{0}")]
    ConfigIntegrity(String),
    /// Malformed policy line, carries the raw line
    #[error("config error - {reason} [{line}]")]
    ConfigParse { reason: String, line: String },
    #[error("{kind} '{name}' doesn't exist")]
    IdentityNotFound { kind: Kind, name: String },
    #[error("'{caller}' can't execute '{command}' as '{user}:{group}': Operation not permitted")]
    AuthorizationDenied {
        caller: String,
        command: String,
        user: String,
        group: String,
    },
    /// The running binary is not setuid root:root
    #[error("{0}")]
    SelfTrust(String),
    #[error("{command} : {reason}")]
    Exec { command: String, reason: String },
    #[error("{0}: command not found")]
    CommandNotFound(String),
    #[error("command path is not absolute: {0}")]
    RelativePath(String),
    #[error("invalid command pattern: {0}")]
    Pattern(String),
    #[error("invalid numeric id: {0}")]
    InvalidId(String),
    #[error("exceeded max config len: {0}")]
    MaxConfigLen(u64),
    #[error("{0}")]
    Io(String),
    #[error("nix: {0}")]
    Nix(#[from] nix::Error),
    #[error("nul byte in argument: {0}")]
    Nul(#[from] std::ffi::NulError),
}

impl Error {
    /// Wrap a line-level failure with the offending configuration line
    pub fn parse<R: Into<String>, L: Into<String>>(reason: R, line: L) -> Self {
        Self::ConfigParse {
            reason: reason.into(),
            line: line.into(),
        }
    }
}

impl From<regex::Error> for Error {
    fn from(e: regex::Error) -> Self {
        Self::Pattern(format!("{}", e))
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Io(format!("{}", e))
    }
}
