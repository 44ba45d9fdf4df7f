//! Connection-level configuration read by the parser and the conduits.
//!
//! All limits are enforced per request. The values are read-only once a
//! connection has been built; share one [`HttpOptions`] across connections
//! through an `Arc`.

/// Default maximum number of request headers.
pub const DEFAULT_MAX_HEADERS: usize = 200;

/// Default maximum size of the request line plus headers, in bytes.
pub const DEFAULT_MAX_HEADER_SIZE: usize = 50 * 1024;

/// Default maximum number of query and path parameters.
pub const DEFAULT_MAX_PARAMETERS: usize = 1000;

/// Default flush threshold of the pipelining write aggregator.
pub const DEFAULT_PIPELINING_BUFFER_SIZE: usize = 16 * 1024;

/// Charset used when percent-decoding the request target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UrlCharset {
    #[default]
    Utf8,
    /// Every decoded byte maps to the code point of the same value.
    Latin1,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpOptions {
    max_headers: usize,
    max_header_size: usize,
    max_parameters: usize,
    decode_url: bool,
    url_charset: UrlCharset,
    allow_encoded_slash: bool,
    buffer_pipelined_data: bool,
    pipelining_buffer_size: usize,
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self {
            max_headers: DEFAULT_MAX_HEADERS,
            max_header_size: DEFAULT_MAX_HEADER_SIZE,
            max_parameters: DEFAULT_MAX_PARAMETERS,
            decode_url: true,
            url_charset: UrlCharset::Utf8,
            allow_encoded_slash: false,
            buffer_pipelined_data: false,
            pipelining_buffer_size: DEFAULT_PIPELINING_BUFFER_SIZE,
        }
    }
}

impl HttpOptions {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_max_headers(mut self, max_headers: usize) -> Self {
        self.max_headers = max_headers;
        self
    }

    #[must_use]
    pub fn with_max_header_size(mut self, max_header_size: usize) -> Self {
        self.max_header_size = max_header_size;
        self
    }

    #[must_use]
    pub fn with_max_parameters(mut self, max_parameters: usize) -> Self {
        self.max_parameters = max_parameters;
        self
    }

    #[must_use]
    pub fn with_decode_url(mut self, decode_url: bool) -> Self {
        self.decode_url = decode_url;
        self
    }

    #[must_use]
    pub fn with_url_charset(mut self, url_charset: UrlCharset) -> Self {
        self.url_charset = url_charset;
        self
    }

    #[must_use]
    pub fn with_allow_encoded_slash(mut self, allow_encoded_slash: bool) -> Self {
        self.allow_encoded_slash = allow_encoded_slash;
        self
    }

    /// Enables the pipelining write aggregator.
    #[must_use]
    pub fn with_buffer_pipelined_data(mut self, buffer_pipelined_data: bool) -> Self {
        self.buffer_pipelined_data = buffer_pipelined_data;
        self
    }

    #[must_use]
    pub fn with_pipelining_buffer_size(mut self, pipelining_buffer_size: usize) -> Self {
        self.pipelining_buffer_size = pipelining_buffer_size;
        self
    }

    pub fn max_headers(&self) -> usize {
        self.max_headers
    }

    pub fn max_header_size(&self) -> usize {
        self.max_header_size
    }

    pub fn max_parameters(&self) -> usize {
        self.max_parameters
    }

    pub fn decode_url(&self) -> bool {
        self.decode_url
    }

    pub fn url_charset(&self) -> UrlCharset {
        self.url_charset
    }

    pub fn allow_encoded_slash(&self) -> bool {
        self.allow_encoded_slash
    }

    pub fn buffer_pipelined_data(&self) -> bool {
        self.buffer_pipelined_data
    }

    pub fn pipelining_buffer_size(&self) -> usize {
        self.pipelining_buffer_size
    }
}
