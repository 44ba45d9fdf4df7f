use std::collections::BTreeMap;

use http::{HeaderMap, Method, Version};

/// Ordered multimap of decoded query or path parameters.
pub type Parameters = BTreeMap<String, Vec<String>>;

/// The parsed request line and headers of one exchange.
///
/// Filled in by [`HttpRequestParser`](crate::codec::HttpRequestParser).
#[derive(Debug, Clone)]
pub struct RequestHead {
    pub(crate) method: Method,
    pub(crate) version: Version,
    pub(crate) request_uri: String,
    pub(crate) request_path: String,
    pub(crate) relative_path: String,
    pub(crate) query_string: String,
    pub(crate) query_params: Parameters,
    pub(crate) path_params: Parameters,
    pub(crate) headers: HeaderMap,
    pub(crate) host_in_uri: bool,
}

impl Default for RequestHead {
    fn default() -> Self {
        Self {
            method: Method::GET,
            version: Version::HTTP_11,
            request_uri: String::new(),
            request_path: String::new(),
            relative_path: String::new(),
            query_string: String::new(),
            query_params: Parameters::new(),
            path_params: Parameters::new(),
            headers: HeaderMap::new(),
            host_in_uri: false,
        }
    }
}

impl RequestHead {
    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn version(&self) -> Version {
        self.version
    }

    /// The request target as sent, without the query string and not decoded.
    pub fn request_uri(&self) -> &str {
        &self.request_uri
    }

    /// The decoded path, without the scheme and host of an absolute-form target.
    pub fn request_path(&self) -> &str {
        &self.request_path
    }

    /// The part of the path not yet consumed by routing. Starts equal to the request path.
    pub fn relative_path(&self) -> &str {
        &self.relative_path
    }

    pub fn set_relative_path(&mut self, relative_path: impl Into<String>) {
        self.relative_path = relative_path.into();
    }

    /// The query string as sent, not decoded.
    pub fn query_string(&self) -> &str {
        &self.query_string
    }

    pub fn query_parameters(&self) -> &Parameters {
        &self.query_params
    }

    /// The first value of query parameter `name`.
    pub fn query_parameter(&self, name: &str) -> Option<&str> {
        self.query_params.get(name)?.first().map(String::as_str)
    }

    pub fn add_query_parameter(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.query_params.entry(name.into()).or_default().push(value.into());
    }

    pub fn path_parameters(&self) -> &Parameters {
        &self.path_params
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Whether the request target was in absolute form (`http://host/path`).
    pub fn is_host_included_in_uri(&self) -> bool {
        self.host_in_uri
    }
}
