use thiserror::Error;

/// Error type for formula parsing and evaluation.
///
/// Positions are byte offsets into the formula text.
#[derive(Error, Debug, Clone, PartialEq, uniffi::Error)]
#[uniffi(flat_error)]
pub enum FormulaError {
    #[error("empty formula")]
    EmptyFormula,

    #[error("unexpected character '{found}' at position {position}")]
    UnexpectedCharacter { position: usize, found: char },

    #[error("unexpected token '{found}' at position {position}")]
    UnexpectedToken { position: usize, found: char },

    #[error("unexpected end of formula")]
    UnexpectedEnd,

    #[error("malformed number '{literal}' at position {position}")]
    MalformedNumber { position: usize, literal: String },

    #[error("unterminated parenthesis opened at position {position}")]
    UnterminatedParenthesis { position: usize },

    #[error("formula nested too deeply at position {position}")]
    TooDeeplyNested { position: usize },

    #[error("unexpected '{found}' after expression at position {position}")]
    TrailingInput { position: usize, found: char },

    #[error("variable '{0}' is not declared")]
    UndeclaredVariable(String),

    #[error("variable '{0}' has not been measured")]
    UnmeasuredVariable(String),

    #[error("division by zero")]
    DivisionByZero,

    #[error("result is not a finite number")]
    NonFinite,
}

impl FormulaError {
    /// Name of the offending variable, if this is a missing-variable error.
    pub fn variable(&self) -> Option<&str> {
        match self {
            FormulaError::UndeclaredVariable(name) | FormulaError::UnmeasuredVariable(name) => {
                Some(name)
            }
            _ => None,
        }
    }
}

/// Errors raised while declaring or surveying a typology.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TypologyError {
    #[error("typology already has the maximum of {limit} variables")]
    TooManyVariables { limit: usize },

    #[error("typology already has the maximum of {limit} elements")]
    TooManyElements { limit: usize },

    #[error("variable name '{0}' must be one or more uppercase letters")]
    InvalidVariableName(String),

    #[error("variable '{0}' is declared twice")]
    DuplicateVariable(String),

    #[error("variable '{0}' is not part of this typology")]
    UnknownVariable(String),

    #[error("no element at index {0}")]
    UnknownElement(usize),

    #[error("element '{element}': {source}")]
    Formula {
        element: String,
        #[source]
        source: FormulaError,
    },
}

/// Errors from the probe catalog.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProbeError {
    #[error("probe catalog is full ({limit} entries)")]
    CatalogFull { limit: usize },

    #[error("probe id must not be empty")]
    EmptyId,
}

/// Errors reported by the radio transport when notifying a peer.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("connection {0} is closed")]
    Disconnected(u16),

    #[error("payload of {size} bytes exceeds the link MTU of {mtu}")]
    PayloadTooLarge { size: usize, mtu: usize },
}

/// Errors from the persisted settings backend.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("settings backend unavailable")]
    Unavailable,

    #[error("write of '{key}' failed: {reason}")]
    WriteFailed { key: String, reason: String },
}

/// Errors loading the instrument configuration file.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Errors produced while serializing an outbound message.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("field '{field}' is not a finite number")]
    NonFinite { field: &'static str },

    #[error("serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors from routing configuration and measurement delivery.
#[derive(Error, Debug, uniffi::Error)]
#[uniffi(flat_error)]
pub enum RoutingError {
    #[error("invalid measure mode index {0}")]
    InvalidMode(u8),

    #[error("invalid device id {0}")]
    InvalidDevice(u8),

    #[error("no connected peers for broadcast")]
    NoPeers,

    #[error("target device {0} is not connected")]
    TargetNotFound(u8),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("storage error: {0}")]
    Store(#[from] StoreError),
}

/// Failure while sending a typology survey.
#[derive(Error, Debug)]
pub enum SurveyError {
    #[error(transparent)]
    Routing(#[from] RoutingError),

    #[error(transparent)]
    Typology(#[from] TypologyError),
}
