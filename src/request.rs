//! Request types flowing through the signing pipeline.
use {
    crate::{body::IntoRequestBytes, constants::*, SignatureError, SigningScope},
    bytes::Bytes,
    chrono::{DateTime, Utc},
    http::{
        header::{HeaderMap, HeaderName, HeaderValue},
        method::Method,
        request::{Parts, Request},
        uri::Uri,
    },
    std::str::FromStr,
};

/// An HTTP request that has not been signed yet.
///
/// The body is held in memory so the bytes that are hashed are exactly the bytes that are sent.
#[derive(Clone, Debug)]
pub struct SignableRequest {
    pub(crate) method: Method,
    pub(crate) uri: Uri,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Bytes,
}

impl SignableRequest {
    /// Create a request from string parts.
    ///
    /// Header names may repeat; every value is kept in the order given.
    ///
    /// # Errors
    /// * [`SignatureError::InvalidRequestMethod`] if the method is not a valid HTTP token.
    /// * [`SignatureError::InvalidURIPath`] if the URL cannot be parsed.
    /// * [`SignatureError::MalformedHeader`] if a header name or value is not legal HTTP.
    /// * [`SignatureError::UnreadableBody`] if the body cannot be read.
    pub fn new<'a, H, B>(method: &str, url: &str, headers: H, body: B) -> Result<Self, SignatureError>
    where
        H: IntoIterator<Item = (&'a str, &'a str)>,
        B: IntoRequestBytes,
    {
        let method = Method::from_str(method)
            .map_err(|_| SignatureError::InvalidRequestMethod(format!("Invalid request method: {}", method)))?;
        let uri = Uri::from_str(url).map_err(|e| SignatureError::InvalidURIPath(format!("Invalid URL '{}': {}", url, e)))?;

        let mut header_map = HeaderMap::new();
        for (name, value) in headers {
            let name = HeaderName::from_str(name)
                .map_err(|_| SignatureError::MalformedHeader(format!("Invalid header name: {}", name)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|_| SignatureError::MalformedHeader(format!("Invalid value for header {}", name)))?;
            header_map.append(name, value);
        }

        let body = read_body(body)?;

        Ok(Self {
            method,
            uri,
            headers: header_map,
            body,
        })
    }

    /// Create a request from an [`http::Request`], reading its body into memory.
    pub fn from_http_request<B: IntoRequestBytes>(request: Request<B>) -> Result<Self, SignatureError> {
        let (parts, body) = request.into_parts();
        Ok(Self::from_parts(parts, read_body(body)?))
    }

    /// Create a request from HTTP [`Parts`] and a body that has already been read.
    pub fn from_parts(parts: Parts, body: Bytes) -> Self {
        Self {
            method: parts.method,
            uri: parts.uri,
            headers: parts.headers,
            body,
        }
    }

    /// Retrieve the request method.
    #[inline]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Retrieve the request URI.
    #[inline]
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Retrieve the request headers.
    #[inline]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Retrieve a mutable reference to the request headers.
    #[inline]
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Retrieve the request body.
    #[inline]
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Convert this into an [`http::Request`].
    pub fn into_http_request(self) -> Request<Bytes> {
        build_http_request(self.method, self.uri, self.headers, self.body)
    }
}

impl<B: IntoRequestBytes> TryFrom<Request<B>> for SignableRequest {
    type Error = SignatureError;

    fn try_from(request: Request<B>) -> Result<Self, SignatureError> {
        Self::from_http_request(request)
    }
}

/// A request carrying a SigV4 `Authorization` header.
#[derive(Clone, Debug)]
pub struct SignedRequest {
    pub(crate) method: Method,
    pub(crate) uri: Uri,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Bytes,
    pub(crate) signature: String,
    pub(crate) signed_headers: Vec<String>,
    pub(crate) timestamp: DateTime<Utc>,
    pub(crate) scope: SigningScope,
}

impl SignedRequest {
    /// Retrieve the request method.
    #[inline]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Retrieve the request URI.
    #[inline]
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Retrieve the request headers, including `Authorization`.
    #[inline]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Retrieve the request body.
    #[inline]
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Retrieve the hex-encoded signature.
    #[inline]
    pub fn signature(&self) -> &str {
        &self.signature
    }

    /// Retrieve the sorted, lower-cased names of the signed headers.
    #[inline]
    pub fn signed_headers(&self) -> &[String] {
        &self.signed_headers
    }

    /// Retrieve the signing timestamp.
    #[inline]
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Retrieve the credential scope the request was signed for.
    #[inline]
    pub fn scope(&self) -> &SigningScope {
        &self.scope
    }

    /// Retrieve the value of the `Authorization` header.
    pub fn authorization(&self) -> Option<&str> {
        self.headers.get(HDR_AUTHORIZATION).and_then(|v| v.to_str().ok())
    }

    /// Convert this into an [`http::Request`] ready to be sent.
    pub fn into_http_request(self) -> Request<Bytes> {
        build_http_request(self.method, self.uri, self.headers, self.body)
    }
}

impl From<SignedRequest> for SignableRequest {
    fn from(signed: SignedRequest) -> Self {
        Self {
            method: signed.method,
            uri: signed.uri,
            headers: signed.headers,
            body: signed.body,
        }
    }
}

/// Returns `host[:port]` from the URI authority, without any userinfo.
pub(crate) fn host_from_uri(uri: &Uri) -> Option<&str> {
    let authority = uri.authority()?.as_str();
    let host = authority.rsplit('@').next().unwrap_or(authority);
    if host.is_empty() {
        None
    } else {
        Some(host)
    }
}

fn read_body<B: IntoRequestBytes>(body: B) -> Result<Bytes, SignatureError> {
    body.into_request_bytes().map_err(|e| SignatureError::UnreadableBody(format!("Unable to read request body: {}", e)))
}

fn build_http_request(method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> Request<Bytes> {
    let mut request = Request::new(body);
    *request.method_mut() = method;
    *request.uri_mut() = uri;
    *request.headers_mut() = headers;
    request
}
