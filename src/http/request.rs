use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use url::{Host, Url};

use crate::error::RequestError;
use crate::http::headers::HeaderMap;

/// HTTP request methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// GET - Retrieve a resource
    GET,
    /// POST - Create or submit data
    POST,
    /// PUT - Replace a resource
    PUT,
    /// DELETE - Delete a resource
    DELETE,
    /// HEAD - Like GET but without the response body
    HEAD,
    /// OPTIONS - Describe communication options
    OPTIONS,
    /// PATCH - Partial modification of a resource
    PATCH,
    TRACE,
    CONNECT,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::GET => "GET",
            Method::POST => "POST",
            Method::PUT => "PUT",
            Method::DELETE => "DELETE",
            Method::HEAD => "HEAD",
            Method::OPTIONS => "OPTIONS",
            Method::PATCH => "PATCH",
            Method::TRACE => "TRACE",
            Method::CONNECT => "CONNECT",
        }
    }

    /// Methods whose requests normally carry an entity, so an empty body is
    /// announced with `Content-Length: 0`.
    pub fn expects_body(&self) -> bool {
        matches!(self, Method::POST | Method::PUT | Method::PATCH)
    }
}

impl FromStr for Method {
    type Err = RequestError;

    /// Parses an HTTP method (case-sensitive, as on the wire).
    ///
    /// ```
    /// # use courier::http::request::Method;
    /// assert_eq!("GET".parse::<Method>().ok(), Some(Method::GET));
    /// assert!("get".parse::<Method>().is_err());
    /// ```
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "GET" => Ok(Method::GET),
            "POST" => Ok(Method::POST),
            "PUT" => Ok(Method::PUT),
            "DELETE" => Ok(Method::DELETE),
            "HEAD" => Ok(Method::HEAD),
            "OPTIONS" => Ok(Method::OPTIONS),
            "PATCH" => Ok(Method::PATCH),
            "TRACE" => Ok(Method::TRACE),
            "CONNECT" => Ok(Method::CONNECT),
            other => Err(RequestError::UnknownMethod(other.to_string())),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Network location a request is sent to, derived from its URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Host to connect to; IPv6 literals carry no brackets.
    pub host: String,
    pub port: u16,
    /// Whether the transport must wrap the stream in TLS (`https`).
    pub tls: bool,
    /// Value for the `Host` header: host plus port when it is not the
    /// scheme default.
    pub authority: String,
}

impl Endpoint {
    /// Validates `url` and resolves the host and port to connect to.
    ///
    /// Only `http` and `https` are accepted and the host must be non-empty.
    pub fn from_url(url: &Url) -> Result<Self, RequestError> {
        let tls = match url.scheme() {
            "http" => false,
            "https" => true,
            other => return Err(RequestError::UnsupportedScheme(other.to_string())),
        };

        let host = match url.host() {
            Some(Host::Domain(d)) if !d.is_empty() => d.to_string(),
            Some(Host::Ipv4(addr)) => addr.to_string(),
            Some(Host::Ipv6(addr)) => addr.to_string(),
            _ => return Err(RequestError::MissingHost),
        };

        let port = url
            .port_or_known_default()
            .ok_or(RequestError::MissingHost)?;

        // host_str keeps IPv6 brackets, which is what Host wants
        let host_str = url.host_str().ok_or(RequestError::MissingHost)?;
        let authority = match url.port() {
            Some(p) => format!("{}:{}", host_str, p),
            None => host_str.to_string(),
        };

        Ok(Self {
            host,
            port,
            tls,
            authority,
        })
    }

    /// Parses and validates a URL string in one step.
    pub fn parse(url: &str) -> Result<(Url, Self), RequestError> {
        let url = Url::parse(url)?;
        let endpoint = Self::from_url(&url)?;
        Ok((url, endpoint))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Request entity.
#[derive(Default)]
pub enum Body {
    #[default]
    Empty,
    /// Fully buffered body, framed with `Content-Length`.
    Full(Bytes),
    /// Body produced piecewise, framed with chunked transfer coding.
    Stream(Box<dyn Iterator<Item = Bytes> + Send>),
}

impl Body {
    pub fn is_empty(&self) -> bool {
        match self {
            Body::Empty => true,
            Body::Full(b) => b.is_empty(),
            Body::Stream(_) => false,
        }
    }

    pub fn is_stream(&self) -> bool {
        matches!(self, Body::Stream(_))
    }

    pub fn stream<I>(chunks: I) -> Self
    where
        I: IntoIterator<Item = Bytes>,
        I::IntoIter: Send + 'static,
    {
        Body::Stream(Box::new(chunks.into_iter()))
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Body::Empty => f.write_str("Empty"),
            Body::Full(b) => f.debug_tuple("Full").field(&b.len()).finish(),
            Body::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

impl From<Bytes> for Body {
    fn from(b: Bytes) -> Self {
        Body::Full(b)
    }
}

impl From<Vec<u8>> for Body {
    fn from(b: Vec<u8>) -> Self {
        Body::Full(Bytes::from(b))
    }
}

impl From<&'static str> for Body {
    fn from(s: &'static str) -> Self {
        Body::Full(Bytes::from_static(s.as_bytes()))
    }
}

impl From<String> for Body {
    fn from(s: String) -> Self {
        Body::Full(Bytes::from(s))
    }
}

/// An outgoing HTTP request.
///
/// The session creates one per exchange and hands it to the caller to fill
/// in headers and body before it is written.
#[derive(Debug)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Body,
}

impl Request {
    /// Creates a request after validating the URL.
    pub fn new(method: Method, url: &str) -> Result<Self, RequestError> {
        let (url, _) = Endpoint::parse(url)?;
        Ok(Self::from_url(method, url))
    }

    pub(crate) fn from_url(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: Body::Empty,
        }
    }

    /// Retrieves a header value by name, ignoring case.
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key)
    }

    pub fn set_header(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.headers.insert(key, value);
    }

    pub fn set_body(&mut self, body: impl Into<Body>) {
        self.body = body.into();
    }

    /// Origin-form request target: path plus optional query, `/` when empty.
    pub fn target(&self) -> String {
        let path = match self.url.path() {
            "" => "/",
            p => p,
        };
        match self.url.query() {
            Some(q) => format!("{}?{}", path, q),
            None => path.to_string(),
        }
    }

    /// Whether the request allows the connection to stay open afterwards.
    pub fn keep_alive(&self) -> bool {
        !self.headers.has_token("Connection", "close")
    }
}

/// Builder for constructing Request objects.
pub struct RequestBuilder {
    method: Method,
    url: String,
    headers: HeaderMap,
    body: Body,
}

impl RequestBuilder {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            body: Body::Empty,
        }
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key, value);
        self
    }

    pub fn body(mut self, body: impl Into<Body>) -> Self {
        self.body = body.into();
        self
    }

    pub fn build(self) -> Result<Request, RequestError> {
        let mut request = Request::new(self.method, &self.url)?;
        request.headers = self.headers;
        request.body = self.body;
        Ok(request)
    }
}
