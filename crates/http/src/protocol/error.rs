use std::error::Error;
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("request error: {source}")]
    RequestError {
        #[from]
        source: ParseError,
    },

    #[error("response error: {source}")]
    ResponseError {
        #[from]
        source: SendError,
    },

    #[error("buffer error: {source}")]
    BufferError {
        #[from]
        source: BufferError,
    },

    #[error("handler error: {source}")]
    HandlerError {
        #[from]
        source: HandlerError,
    },

    #[error("exchange error: {source}")]
    ExchangeError {
        #[from]
        source: ExchangeError,
    },
}

impl HttpError {
    /// Whether the error came from the transport rather than from the peer's bytes.
    pub fn is_transport(&self) -> bool {
        match self {
            Self::RequestError { source } => matches!(source, ParseError::Io { .. } | ParseError::UnexpectedEof),
            Self::ResponseError { source } => matches!(source, SendError::Io { .. }),
            Self::ExchangeError { source } => matches!(
                source,
                ExchangeError::Parse { source: ParseError::Io { .. } | ParseError::UnexpectedEof }
                    | ExchangeError::Send { source: SendError::Io { .. } }
            ),
            Self::BufferError { .. } | Self::HandlerError { .. } => false,
        }
    }
}

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("header size too large, current: {current_size} exceed the limit {max_size}")]
    TooLargeHeader { current_size: usize, max_size: usize },

    #[error("header number exceed the limit {max_num}")]
    TooManyHeaders { max_num: usize },

    #[error("parameter number exceed the limit {max_num}")]
    TooManyParameters { max_num: usize },

    #[error("invalid header: {reason}")]
    InvalidHeader { reason: String },

    #[error("invalid http version: {version}")]
    InvalidVersion { version: String },

    #[error("invalid http method: {method}")]
    InvalidMethod { method: String },

    #[error("invalid http uri: {reason}")]
    InvalidUri { reason: String },

    #[error("invalid url encoding: {reason}")]
    InvalidEncoding { reason: String },

    #[error("invalid content-length header: {reason}")]
    InvalidContentLength { reason: String },

    #[error("invalid body: {reason}")]
    InvalidBody { reason: String },

    #[error("connection closed before the request was complete")]
    UnexpectedEof,

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl ParseError {
    pub fn too_large_header(current_size: usize, max_size: usize) -> Self {
        Self::TooLargeHeader { current_size, max_size }
    }

    pub fn too_many_headers(max_num: usize) -> Self {
        Self::TooManyHeaders { max_num }
    }

    pub fn too_many_parameters(max_num: usize) -> Self {
        Self::TooManyParameters { max_num }
    }

    pub fn invalid_header<S: ToString>(str: S) -> Self {
        Self::InvalidHeader { reason: str.to_string() }
    }

    pub fn invalid_version<S: ToString>(str: S) -> Self {
        Self::InvalidVersion { version: str.to_string() }
    }

    pub fn invalid_method<S: ToString>(str: S) -> Self {
        Self::InvalidMethod { method: str.to_string() }
    }

    pub fn invalid_uri<S: ToString>(str: S) -> Self {
        Self::InvalidUri { reason: str.to_string() }
    }

    pub fn invalid_encoding<S: ToString>(str: S) -> Self {
        Self::InvalidEncoding { reason: str.to_string() }
    }

    pub fn invalid_body<S: ToString>(str: S) -> Self {
        Self::InvalidBody { reason: str.to_string() }
    }

    pub fn invalid_content_length<S: ToString>(str: S) -> Self {
        Self::InvalidContentLength { reason: str.to_string() }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }
}

#[derive(Error, Debug)]
pub enum SendError {
    #[error("invalid body: {reason}")]
    InvalidBody { reason: String },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl SendError {
    pub fn invalid_body<S: ToString>(str: S) -> Self {
        Self::InvalidBody { reason: str.to_string() }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }
}

/// Errors raised by [`BufferPool`](crate::buffer::BufferPool) and its handles.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferError {
    #[error("buffer pool closed")]
    PoolClosed,

    #[error("buffer handle already closed")]
    AlreadyClosed,

    #[error("buffer storage is shared by {handles} handles")]
    Shared { handles: usize },
}

#[derive(Error, Debug)]
pub enum HandlerError {
    #[error("handler failed: {source}")]
    Failed { source: Box<dyn Error + Send + Sync> },

    #[error("handler panicked: {message}")]
    Panicked { message: String },

    #[error("handler task was cancelled")]
    Cancelled,
}

impl HandlerError {
    pub fn failed<E: Into<Box<dyn Error + Send + Sync>>>(e: E) -> Self {
        Self::Failed { source: e.into() }
    }

    /// Builds an error from the payload of a caught panic.
    pub fn panicked(payload: &(dyn std::any::Any + Send)) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_owned()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_owned()
        };
        Self::Panicked { message }
    }
}

impl From<tokio::task::JoinError> for HandlerError {
    fn from(e: tokio::task::JoinError) -> Self {
        match e.try_into_panic() {
            Ok(payload) => Self::panicked(payload.as_ref()),
            Err(_) => Self::Cancelled,
        }
    }
}

/// Which half of the exchange a channel belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    Request,
    Response,
}

#[derive(Error, Debug)]
pub enum ExchangeError {
    #[error("{kind:?} channel is unavailable")]
    ChannelUnavailable { kind: ChannelKind },

    #[error("response already started")]
    ResponseStarted,

    #[error("response already terminated")]
    ResponseTerminated,

    #[error("invalid status code: {code}")]
    InvalidStatus { code: u16 },

    #[error("conduit serves exchange {current}, not exchange {requested}")]
    StaleExchange { current: u64, requested: u64 },

    #[error("request error: {source}")]
    Parse {
        #[from]
        source: ParseError,
    },

    #[error("response error: {source}")]
    Send {
        #[from]
        source: SendError,
    },

    #[error("buffer error: {source}")]
    Buffer {
        #[from]
        source: BufferError,
    },
}

impl ExchangeError {
    pub fn unavailable(kind: ChannelKind) -> Self {
        Self::ChannelUnavailable { kind }
    }
}
