//! Resumable HTTP/1.x request line and header parser.
//!
//! [`HttpRequestParser::handle`] consumes bytes from any [`Buf`] and writes the
//! recognised fields into a [`RequestHead`]. When the input runs out mid-token
//! every bit of progress is kept in the caller's [`ParseState`], so the same
//! request split at any byte boundary and fed over many calls yields exactly
//! the fields a single call would.
//!
//! # Stages
//!
//! `Method -> Path -> [QueryParameters] -> [PathParameters] -> Version ->
//! AfterVersion -> (HeaderName -> HeaderValue)* -> Complete`
//!
//! Methods, versions and well-known header names go through one prefix
//! automaton (see `token`) so the common tokens are recognised without
//! allocating. Request target pieces are percent-decoded lazily.
//!
//! # Limits
//!
//! The header count, the total number of bytes of the request line plus
//! headers and the number of query and path parameters are checked while
//! parsing, across however many calls the request needs.

mod lexicon;
mod token;
mod url;

use bytes::Buf;
use http::HeaderName;
use tracing::trace;

use crate::ensure;
use crate::exchange::RequestHead;
use crate::protocol::{HttpOptions, ParseError, UrlCharset};
use lexicon::{HeaderNameToken, MethodToken, VersionToken};
use url::Decoding;

// request target sub-states, tracking an absolute-form target `scheme://host/path`
const START: u8 = 0;
const FIRST_COLON: u8 = 1;
const FIRST_SLASH: u8 = 2;
const SECOND_SLASH: u8 = 3;
const HOST_DONE: u8 = 4;

// after-version sub-states
const AWAIT_LINE_END: u8 = 0;
pub(crate) const AFTER_LINE: u8 = 1;
const AWAIT_FINAL_LF: u8 = 2;

// header value sub-states
const LEADING: u8 = 0;
const NORMAL: u8 = 1;
const BEGIN_LINE_END: u8 = 2;
const LINE_END: u8 = 3;
const AWAIT_DATA_END: u8 = 4;

/// Where the parser currently is within the request head.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParseStage {
    #[default]
    Method,
    Path,
    QueryParameters,
    PathParameters,
    Version,
    AfterVersion,
    HeaderName,
    HeaderValue,
    Complete,
}

/// Suspended progress of one request head.
///
/// Reset it with [`ParseState::reset`] before parsing the next request; the
/// accumulator keeps its capacity.
#[derive(Debug)]
pub struct ParseState {
    stage: ParseStage,
    sub_state: u8,
    token_node: Option<usize>,
    acc: Vec<u8>,
    leftover: Option<u8>,
    pos: usize,
    decode_required: bool,
    next_param: Option<String>,
    next_header: Option<HeaderName>,
    header_count: usize,
    param_count: usize,
    read: usize,
    byte_limit: usize,
    limit_hit: bool,
}

impl Default for ParseState {
    fn default() -> Self {
        Self::new()
    }
}

impl ParseState {
    pub fn new() -> Self {
        Self {
            stage: ParseStage::Method,
            sub_state: 0,
            token_node: Some(token::ROOT),
            acc: Vec::new(),
            leftover: None,
            pos: 0,
            decode_required: false,
            next_param: None,
            next_header: None,
            header_count: 0,
            param_count: 0,
            read: 0,
            byte_limit: usize::MAX,
            limit_hit: false,
        }
    }

    pub fn reset(&mut self) {
        let mut acc = std::mem::take(&mut self.acc);
        acc.clear();
        *self = Self { acc, ..Self::new() };
    }

    pub fn stage(&self) -> ParseStage {
        self.stage
    }

    pub fn is_complete(&self) -> bool {
        self.stage == ParseStage::Complete
    }

    /// Whether nothing but optional leading line breaks has been consumed yet.
    pub fn is_fresh(&self) -> bool {
        self.stage == ParseStage::Method && self.token_node == Some(token::ROOT)
    }

    /// Bytes of the request head consumed so far.
    pub fn bytes_read(&self) -> usize {
        self.read
    }

    pub fn header_count(&self) -> usize {
        self.header_count
    }

    /// Takes the pushed back byte first, then the next byte of `buf`.
    fn next_byte<B: Buf>(&mut self, buf: &mut B) -> Option<u8> {
        if let Some(byte) = self.leftover.take() {
            return Some(byte);
        }
        if !buf.has_remaining() {
            return None;
        }
        if self.read >= self.byte_limit {
            self.limit_hit = true;
            return None;
        }
        self.read += 1;
        Some(buf.get_u8())
    }

    /// Moves to `stage`, clearing the per-token scratch state.
    fn enter(&mut self, stage: ParseStage) {
        self.stage = stage;
        self.sub_state = 0;
        self.token_node = Some(token::ROOT);
        self.acc.clear();
        self.pos = 0;
        self.decode_required = false;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParamTarget {
    Query,
    Path,
}

/// Incremental request head parser configured from [`HttpOptions`].
#[derive(Debug, Clone)]
pub struct HttpRequestParser {
    max_headers: usize,
    max_header_size: usize,
    max_parameters: usize,
    decode_url: bool,
    charset: UrlCharset,
    allow_encoded_slash: bool,
}

impl Default for HttpRequestParser {
    fn default() -> Self {
        Self::new(&HttpOptions::default())
    }
}

impl HttpRequestParser {
    pub fn new(options: &HttpOptions) -> Self {
        lexicon::init();
        Self {
            max_headers: options.max_headers(),
            max_header_size: options.max_header_size(),
            max_parameters: options.max_parameters(),
            decode_url: options.decode_url(),
            charset: options.url_charset(),
            allow_encoded_slash: options.allow_encoded_slash(),
        }
    }

    /// Parses as much of the request head as `buf` holds.
    ///
    /// Stops right after the blank line ending the headers, leaving any body
    /// or pipelined bytes in `buf`. Returns `Ok(())` both when the head is
    /// complete and when more input is needed; check
    /// [`ParseState::is_complete`].
    pub fn handle<B: Buf>(&self, buf: &mut B, state: &mut ParseState, head: &mut RequestHead) -> Result<(), ParseError> {
        state.byte_limit = self.max_header_size;
        self.parse(buf, state, head)?;
        ensure!(!state.limit_hit, ParseError::too_large_header(state.read + 1, self.max_header_size));
        if state.is_complete() {
            trace!(method = %head.method(), uri = head.request_uri(), headers = state.header_count, "parsed request head");
        }
        Ok(())
    }

    fn parse<B: Buf>(&self, buf: &mut B, state: &mut ParseState, head: &mut RequestHead) -> Result<(), ParseError> {
        loop {
            let finished = match state.stage {
                ParseStage::Method => token::parse_token::<MethodToken, B>(self, buf, state, head)?,
                ParseStage::Path => self.handle_path(buf, state, head)?,
                ParseStage::QueryParameters => self.handle_parameters(buf, state, head, ParamTarget::Query)?,
                ParseStage::PathParameters => self.handle_parameters(buf, state, head, ParamTarget::Path)?,
                ParseStage::Version => token::parse_token::<VersionToken, B>(self, buf, state, head)?,
                ParseStage::AfterVersion => Self::handle_after_version(buf, state)?,
                ParseStage::HeaderName => token::parse_token::<HeaderNameToken, B>(self, buf, state, head)?,
                ParseStage::HeaderValue => self.handle_header_value(buf, state, head)?,
                ParseStage::Complete => return Ok(()),
            };
            if !finished {
                return Ok(());
            }
        }
    }

    fn path_decoding(&self) -> Decoding {
        Decoding { charset: self.charset, allow_encoded_slash: self.allow_encoded_slash, plus_as_space: false }
    }

    fn param_decoding(&self) -> Decoding {
        Decoding { charset: self.charset, allow_encoded_slash: true, plus_as_space: true }
    }

    fn handle_path<B: Buf>(&self, buf: &mut B, state: &mut ParseState, head: &mut RequestHead) -> Result<bool, ParseError> {
        while let Some(byte) = state.next_byte(buf) {
            let target_done = matches!(state.sub_state, START | SECOND_SLASH | HOST_DONE);
            match byte {
                b' ' | b'\t' => {
                    // whitespace before the target
                    if state.acc.is_empty() {
                        continue;
                    }
                    self.finish_path(state, head)?;
                    state.enter(ParseStage::Version);
                    return Ok(true);
                }
                b'\r' | b'\n' => return Err(ParseError::invalid_uri("line break in request target")),
                b'?' if target_done => {
                    self.finish_path(state, head)?;
                    state.enter(ParseStage::QueryParameters);
                    return Ok(true);
                }
                b';' if target_done => {
                    self.finish_path(state, head)?;
                    state.enter(ParseStage::PathParameters);
                    return Ok(true);
                }
                _ => {
                    let absolute_candidate = state.acc.first().is_some_and(|&b| b != b'/');
                    if self.decode_url && (byte == b'+' || byte == b'%') {
                        state.decode_required = true;
                    } else if byte == b':' && state.sub_state == START && absolute_candidate {
                        state.sub_state = FIRST_COLON;
                    } else if byte == b'/' && state.sub_state == FIRST_COLON {
                        state.sub_state = FIRST_SLASH;
                    } else if byte == b'/' && state.sub_state == FIRST_SLASH {
                        state.sub_state = SECOND_SLASH;
                    } else if byte == b'/' && state.sub_state == SECOND_SLASH {
                        state.sub_state = HOST_DONE;
                        state.pos = state.acc.len();
                    } else if matches!(state.sub_state, FIRST_COLON | FIRST_SLASH) {
                        state.sub_state = START;
                    }
                    state.acc.push(byte);
                }
            }
        }
        Ok(false)
    }

    fn finish_path(&self, state: &mut ParseState, head: &mut RequestHead) -> Result<(), ParseError> {
        let (canonical, absolute): (&[u8], bool) = match state.sub_state {
            HOST_DONE => (&state.acc[state.pos..], true),
            SECOND_SLASH => (&b"/"[..], true),
            _ => (&state.acc[..], false),
        };

        let path = url::decode(canonical, state.decode_required, self.path_decoding())?;
        head.relative_path.clone_from(&path);
        head.request_path = path;
        head.request_uri = url::to_string(&state.acc, self.charset)?;
        head.host_in_uri = absolute;
        head.query_string.clear();
        Ok(())
    }

    fn handle_parameters<B: Buf>(
        &self,
        buf: &mut B,
        state: &mut ParseState,
        head: &mut RequestHead,
        target: ParamTarget,
    ) -> Result<bool, ParseError> {
        while let Some(byte) = state.next_byte(buf) {
            match byte {
                b' ' | b'\t' => {
                    self.finish_parameters(state, head, target)?;
                    state.enter(ParseStage::Version);
                    return Ok(true);
                }
                b'?' if target == ParamTarget::Path => {
                    self.finish_parameters(state, head, target)?;
                    state.enter(ParseStage::QueryParameters);
                    return Ok(true);
                }
                b'\r' | b'\n' => return Err(ParseError::invalid_uri("line break in request target")),
                _ => {
                    if self.decode_url && (byte == b'+' || byte == b'%') {
                        state.decode_required = true;
                    } else if byte == b'=' && state.next_param.is_none() {
                        let name = url::decode(&state.acc[state.pos..], state.decode_required, self.param_decoding())?;
                        state.next_param = Some(name);
                        state.decode_required = false;
                        state.pos = state.acc.len() + 1;
                    } else if byte == b'&' {
                        self.add_parameter(state, head, target)?;
                        state.pos = state.acc.len() + 1;
                    }
                    state.acc.push(byte);
                }
            }
        }
        Ok(false)
    }

    fn finish_parameters(&self, state: &mut ParseState, head: &mut RequestHead, target: ParamTarget) -> Result<(), ParseError> {
        self.add_parameter(state, head, target)?;
        let raw = url::to_string(&state.acc, self.charset)?;
        match target {
            ParamTarget::Query => head.query_string = raw,
            ParamTarget::Path => {
                head.request_uri.push(';');
                head.request_uri.push_str(&raw);
            }
        }
        Ok(())
    }

    /// Adds the parameter accumulated since `state.pos`; empty segments are skipped.
    fn add_parameter(&self, state: &mut ParseState, head: &mut RequestHead, target: ParamTarget) -> Result<(), ParseError> {
        let raw = &state.acc[state.pos.min(state.acc.len())..];
        let (name, value) = match state.next_param.take() {
            Some(name) => (name, url::decode(raw, state.decode_required, self.param_decoding())?),
            None if raw.is_empty() => return Ok(()),
            None => (url::decode(raw, state.decode_required, self.param_decoding())?, String::new()),
        };
        state.decode_required = false;

        state.param_count += 1;
        ensure!(state.param_count <= self.max_parameters, ParseError::too_many_parameters(self.max_parameters));

        let params = match target {
            ParamTarget::Query => &mut head.query_params,
            ParamTarget::Path => &mut head.path_params,
        };
        params.entry(name).or_default().push(value);
        Ok(())
    }

    fn handle_after_version<B: Buf>(buf: &mut B, state: &mut ParseState) -> Result<bool, ParseError> {
        while let Some(byte) = state.next_byte(buf) {
            match (state.sub_state, byte) {
                (AWAIT_LINE_END, b'\n') => state.sub_state = AFTER_LINE,
                (AWAIT_LINE_END, b'\r' | b' ' | b'\t') => {}
                (AWAIT_LINE_END, _) => return Err(ParseError::invalid_version("unexpected byte after version")),
                (AFTER_LINE, b'\r') => state.sub_state = AWAIT_FINAL_LF,
                (AFTER_LINE | AWAIT_FINAL_LF, b'\n') => {
                    state.enter(ParseStage::Complete);
                    return Ok(true);
                }
                (AFTER_LINE, _) => {
                    state.leftover = Some(byte);
                    state.enter(ParseStage::HeaderName);
                    return Ok(true);
                }
                _ => return Err(ParseError::invalid_header("expected LF after blank line")),
            }
        }
        Ok(false)
    }

    fn handle_header_value<B: Buf>(&self, buf: &mut B, state: &mut ParseState, head: &mut RequestHead) -> Result<bool, ParseError> {
        while let Some(byte) = state.next_byte(buf) {
            match state.sub_state {
                LEADING => match byte {
                    b' ' | b'\t' => {}
                    b'\r' => state.sub_state = BEGIN_LINE_END,
                    b'\n' => state.sub_state = LINE_END,
                    _ => {
                        // first byte of a folded continuation line
                        if !state.acc.is_empty() {
                            state.acc.push(b' ');
                        }
                        state.acc.push(byte);
                        state.sub_state = NORMAL;
                    }
                },
                NORMAL => match byte {
                    b'\r' => state.sub_state = BEGIN_LINE_END,
                    b'\n' => state.sub_state = LINE_END,
                    _ => state.acc.push(byte),
                },
                BEGIN_LINE_END => {
                    ensure!(byte == b'\n', ParseError::invalid_header("bare CR in header value"));
                    state.sub_state = LINE_END;
                }
                LINE_END => match byte {
                    b' ' | b'\t' => {
                        trim_trailing_whitespace(&mut state.acc);
                        state.sub_state = LEADING;
                    }
                    _ => {
                        self.add_header(state, head)?;
                        match byte {
                            b'\r' => state.sub_state = AWAIT_DATA_END,
                            b'\n' => {
                                state.enter(ParseStage::Complete);
                                return Ok(true);
                            }
                            _ => {
                                state.leftover = Some(byte);
                                state.enter(ParseStage::HeaderName);
                                return Ok(true);
                            }
                        }
                    }
                },
                _ => {
                    ensure!(byte == b'\n', ParseError::invalid_header("expected LF after blank line"));
                    state.enter(ParseStage::Complete);
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    fn add_header(&self, state: &mut ParseState, head: &mut RequestHead) -> Result<(), ParseError> {
        let name = state.next_header.take().ok_or_else(|| ParseError::invalid_header("header value without a name"))?;
        trim_trailing_whitespace(&mut state.acc);
        let value = lexicon::header_value(&state.acc)?;
        state.acc.clear();

        state.header_count += 1;
        ensure!(state.header_count <= self.max_headers, ParseError::too_many_headers(self.max_headers));

        head.headers.append(name, value);
        Ok(())
    }
}

fn trim_trailing_whitespace(acc: &mut Vec<u8>) {
    while matches!(acc.last(), Some(b' ' | b'\t')) {
        acc.pop();
    }
}
