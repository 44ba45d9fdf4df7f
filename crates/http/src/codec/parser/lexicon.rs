//! The fixed token tables and the three token kinds built on them.

use std::sync::LazyLock;

use http::header::{self, HeaderName};
use http::{HeaderValue, Method, Version};

use crate::codec::parser::token::{Lexicon, Token, TokenKind};
use crate::codec::parser::{HttpRequestParser, ParseStage, ParseState};
use crate::exchange::RequestHead;
use crate::protocol::ParseError;

static METHODS: LazyLock<Lexicon<Method>> = LazyLock::new(|| {
    Lexicon::new(vec![
        ("GET", Method::GET),
        ("POST", Method::POST),
        ("HEAD", Method::HEAD),
        ("PUT", Method::PUT),
        ("DELETE", Method::DELETE),
        ("TRACE", Method::TRACE),
        ("CONNECT", Method::CONNECT),
        ("OPTIONS", Method::OPTIONS),
        ("PATCH", Method::PATCH),
    ])
});

static VERSIONS: LazyLock<Lexicon<Version>> = LazyLock::new(|| {
    Lexicon::new(vec![("HTTP/1.1", Version::HTTP_11), ("HTTP/1.0", Version::HTTP_10), ("HTTP/0.9", Version::HTTP_09)])
});

static HEADERS: LazyLock<Lexicon<HeaderName>> = LazyLock::new(|| {
    Lexicon::new(vec![
        ("host", header::HOST),
        ("accept", header::ACCEPT),
        ("accept-charset", header::ACCEPT_CHARSET),
        ("accept-encoding", header::ACCEPT_ENCODING),
        ("accept-language", header::ACCEPT_LANGUAGE),
        ("accept-ranges", header::ACCEPT_RANGES),
        ("authorization", header::AUTHORIZATION),
        ("cache-control", header::CACHE_CONTROL),
        ("cookie", header::COOKIE),
        ("connection", header::CONNECTION),
        ("content-length", header::CONTENT_LENGTH),
        ("content-type", header::CONTENT_TYPE),
        ("expect", header::EXPECT),
        ("from", header::FROM),
        ("if-match", header::IF_MATCH),
        ("if-modified-since", header::IF_MODIFIED_SINCE),
        ("if-none-match", header::IF_NONE_MATCH),
        ("if-range", header::IF_RANGE),
        ("if-unmodified-since", header::IF_UNMODIFIED_SINCE),
        ("max-forwards", header::MAX_FORWARDS),
        ("origin", header::ORIGIN),
        ("pragma", header::PRAGMA),
        ("proxy-authorization", header::PROXY_AUTHORIZATION),
        ("range", header::RANGE),
        ("referer", header::REFERER),
        ("refresh", HeaderName::from_static("refresh")),
        ("sec-websocket-key", header::SEC_WEBSOCKET_KEY),
        ("sec-websocket-version", header::SEC_WEBSOCKET_VERSION),
        ("server", header::SERVER),
        ("ssl_client_cert", HeaderName::from_static("ssl_client_cert")),
        ("ssl_cipher", HeaderName::from_static("ssl_cipher")),
        ("ssl_session_id", HeaderName::from_static("ssl_session_id")),
        ("ssl_cipher_usekeysize", HeaderName::from_static("ssl_cipher_usekeysize")),
        ("strict-transport-security", header::STRICT_TRANSPORT_SECURITY),
        ("trailer", header::TRAILER),
        ("transfer-encoding", header::TRANSFER_ENCODING),
        ("upgrade", header::UPGRADE),
        ("user-agent", header::USER_AGENT),
        ("via", header::VIA),
        ("warning", header::WARNING),
    ])
});

/// Forces the lexicons to be built.
pub(crate) fn init() {
    LazyLock::force(&METHODS);
    LazyLock::force(&VERSIONS);
    LazyLock::force(&HEADERS);
}

pub(crate) struct MethodToken;

impl TokenKind for MethodToken {
    type Value = Method;

    fn lexicon() -> &'static Lexicon<Method> {
        &METHODS
    }

    fn is_terminator(byte: u8) -> bool {
        byte == b' ' || byte == b'\t'
    }

    // empty lines before the request line are ignored
    fn is_skippable(byte: u8) -> bool {
        byte == b'\r' || byte == b'\n'
    }

    fn validate(byte: u8) -> Result<(), ParseError> {
        match byte {
            b'\r' | b'\n' => Err(ParseError::invalid_method("line break in method")),
            _ => Ok(()),
        }
    }

    fn handle(
        _parser: &HttpRequestParser,
        token: Token<'_, Method>,
        _terminator: u8,
        state: &mut ParseState,
        head: &mut RequestHead,
    ) -> Result<(), ParseError> {
        head.method = match token {
            Token::Known(method) => method.clone(),
            Token::Unknown(bytes) => {
                Method::from_bytes(bytes).map_err(|_| ParseError::invalid_method(String::from_utf8_lossy(bytes)))?
            }
        };
        state.enter(ParseStage::Path);
        Ok(())
    }
}

pub(crate) struct VersionToken;

impl TokenKind for VersionToken {
    type Value = Version;

    fn lexicon() -> &'static Lexicon<Version> {
        &VERSIONS
    }

    fn is_terminator(byte: u8) -> bool {
        byte == b'\r' || byte == b'\n'
    }

    fn handle(
        _parser: &HttpRequestParser,
        token: Token<'_, Version>,
        terminator: u8,
        state: &mut ParseState,
        head: &mut RequestHead,
    ) -> Result<(), ParseError> {
        head.version = match token {
            Token::Known(version) => *version,
            Token::Unknown(bytes) => return Err(ParseError::invalid_version(String::from_utf8_lossy(bytes))),
        };
        state.enter(ParseStage::AfterVersion);
        if terminator == b'\n' {
            state.sub_state = super::AFTER_LINE;
        }
        Ok(())
    }
}

pub(crate) struct HeaderNameToken;

impl TokenKind for HeaderNameToken {
    type Value = HeaderName;

    const FOLD_CASE: bool = true;

    fn lexicon() -> &'static Lexicon<HeaderName> {
        &HEADERS
    }

    fn is_terminator(byte: u8) -> bool {
        byte == b':'
    }

    fn validate(byte: u8) -> Result<(), ParseError> {
        match byte {
            b' ' | b'\t' | b'\r' | b'\n' => Err(ParseError::invalid_header("whitespace in header name")),
            _ => Ok(()),
        }
    }

    fn handle(
        _parser: &HttpRequestParser,
        token: Token<'_, HeaderName>,
        _terminator: u8,
        state: &mut ParseState,
        _head: &mut RequestHead,
    ) -> Result<(), ParseError> {
        let name = match token {
            Token::Known(name) => name.clone(),
            Token::Unknown(bytes) => HeaderName::from_bytes(bytes)
                .map_err(|_| ParseError::invalid_header(format!("invalid header name {:?}", String::from_utf8_lossy(bytes))))?,
        };
        state.enter(ParseStage::HeaderValue);
        state.next_header = Some(name);
        Ok(())
    }
}

/// Builds the value of a finished header line.
pub(crate) fn header_value(bytes: &[u8]) -> Result<HeaderValue, ParseError> {
    HeaderValue::from_bytes(bytes).map_err(|_| ParseError::invalid_header("invalid header value"))
}
