//! Two-pass ("double") signing.
//!
//! HTTP clients commonly add default headers such as `Content-Length` while preparing a request
//! for the wire. A signature made before that step does not cover those headers. Reconciling
//! re-signs the prepared request once, with the same timestamp, so the signature covers every
//! header that is actually transmitted.
use {
    crate::{constants::*, request::host_from_uri, Credentials, SignableRequest, SignatureError, SignedRequest, Signer},
    bytes::Bytes,
    derive_builder::Builder,
    http::{
        header::{HeaderName, HeaderValue},
        method::Method,
        request::Request,
    },
    log::debug,
};

/// How many signing passes a [`Signer`] performs.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum SigningMode {
    /// Sign once, before transport preparation. Only valid when the transport adds no headers.
    SinglePass,

    /// Sign, let the transport prepare the request, then sign again.
    #[default]
    DoublePass,
}

/// The transport's request preparation step.
pub trait PrepareRequest {
    /// Add whatever default headers the transport would add before sending.
    fn prepare(&self, request: &mut Request<Bytes>);
}

impl<F> PrepareRequest for F
where
    F: Fn(&mut Request<Bytes>),
{
    fn prepare(&self, request: &mut Request<Bytes>) {
        self(request)
    }
}

/// A transport that sends requests exactly as given.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoPreparation;

impl PrepareRequest for NoPreparation {
    fn prepare(&self, _request: &mut Request<Bytes>) {}
}

/// The default headers a typical HTTP client adds. Headers already present are left alone.
#[derive(Builder, Clone, Debug, Eq, PartialEq)]
pub struct DefaultHeaders {
    /// Add `Content-Length`: the body length, or `0` for an empty body on a method other than
    /// `GET` or `HEAD`.
    #[builder(default = "true")]
    content_length: bool,

    /// Add `Host` from the URI authority.
    #[builder(default = "true")]
    host: bool,

    /// Default `Content-Type`.
    #[builder(setter(into, strip_option), default)]
    content_type: Option<String>,

    /// Default `User-Agent`.
    #[builder(setter(into, strip_option), default)]
    user_agent: Option<String>,
}

impl DefaultHeaders {
    /// Create a [DefaultHeadersBuilder] to construct a [DefaultHeaders].
    #[inline]
    pub fn builder() -> DefaultHeadersBuilder {
        DefaultHeadersBuilder::default()
    }
}

impl Default for DefaultHeaders {
    fn default() -> Self {
        Self {
            content_length: true,
            host: true,
            content_type: None,
            user_agent: None,
        }
    }
}

impl PrepareRequest for DefaultHeaders {
    fn prepare(&self, request: &mut Request<Bytes>) {
        let content_length = match request.body().len() {
            0 if *request.method() == Method::GET || *request.method() == Method::HEAD => None,
            len => Some(HeaderValue::from(len)),
        };
        let host = host_from_uri(request.uri()).and_then(|h| HeaderValue::from_str(h).ok());

        let mut defaults: Vec<(&'static str, Option<HeaderValue>)> = Vec::with_capacity(4);
        if self.content_length {
            defaults.push((HDR_CONTENT_LENGTH, content_length));
        }
        if self.host {
            defaults.push((HDR_HOST, host));
        }
        if let Some(content_type) = &self.content_type {
            defaults.push((HDR_CONTENT_TYPE, HeaderValue::from_str(content_type).ok()));
        }
        if let Some(user_agent) = &self.user_agent {
            defaults.push((HDR_USER_AGENT, HeaderValue::from_str(user_agent).ok()));
        }

        let headers = request.headers_mut();
        for (name, value) in defaults {
            let name = HeaderName::from_static(name);
            if let (false, Some(value)) = (headers.contains_key(&name), value) {
                debug!("Adding default header {}", name);
                headers.insert(name, value);
            }
        }
    }
}

/// A request signed once, waiting for the transport to prepare it.
#[derive(Clone, Debug)]
pub struct SignedOnce<'a> {
    signer: &'a Signer,
    credentials: &'a Credentials,
    signed: SignedRequest,
}

impl<'a> SignedOnce<'a> {
    pub(crate) fn new(signer: &'a Signer, credentials: &'a Credentials, signed: SignedRequest) -> Self {
        Self {
            signer,
            credentials,
            signed,
        }
    }

    /// Retrieve the first-pass signed request.
    #[inline]
    pub fn signed(&self) -> &SignedRequest {
        &self.signed
    }

    /// Take the first-pass signed request.
    #[inline]
    pub fn into_signed(self) -> SignedRequest {
        self.signed
    }

    /// Re-sign a prepared request with the first pass's timestamp.
    ///
    /// The first pass's `Authorization` header is discarded. Reconciling the same prepared request
    /// twice yields the same signature.
    ///
    /// # Errors
    /// * [`SignatureError::ReconciliationMismatch`] if the method, URI, or body changed during
    ///   preparation.
    /// * Any canonicalization error from the second pass.
    pub fn reconcile(&self, prepared: Request<Bytes>) -> Result<Reconciled, SignatureError> {
        let mut request = self.checked(prepared)?;
        request.headers_mut().remove(HDR_AUTHORIZATION);

        let signed = self.signer.sign_at(request, self.credentials, self.signed.timestamp)?;
        if signed.signature != self.signed.signature {
            debug!("Reconciled signature differs from first pass; SignedHeaders={}", signed.signed_headers.join(";"));
        }

        Ok(Reconciled {
            request: signed,
            first_signature: self.signed.signature.clone(),
        })
    }

    /// Adopt the prepared headers but keep the first pass's signature.
    pub(crate) fn keep_first_pass(self, prepared: Request<Bytes>) -> Result<SignedRequest, SignatureError> {
        let mut request = self.checked(prepared)?;
        if let Some(authorization) = self.signed.headers.get(HDR_AUTHORIZATION) {
            request.headers_mut().insert(HeaderName::from_static(HDR_AUTHORIZATION), authorization.clone());
        }

        Ok(SignedRequest {
            headers: request.headers,
            ..self.signed
        })
    }

    fn checked(&self, prepared: Request<Bytes>) -> Result<SignableRequest, SignatureError> {
        let (parts, body) = prepared.into_parts();

        if parts.method != self.signed.method {
            return Err(SignatureError::ReconciliationMismatch(format!(
                "Request method changed between signing passes: {} != {}",
                self.signed.method, parts.method
            )));
        }

        if parts.uri != self.signed.uri {
            return Err(SignatureError::ReconciliationMismatch(
                "Request URI changed between signing passes".to_string(),
            ));
        }

        if body != self.signed.body {
            return Err(SignatureError::ReconciliationMismatch(format!(
                "Request body changed between signing passes ({} bytes != {} bytes)",
                self.signed.body.len(),
                body.len()
            )));
        }

        Ok(SignableRequest::from_parts(parts, body))
    }
}

/// The result of reconciling a [`SignedOnce`] request.
#[derive(Clone, Debug)]
pub struct Reconciled {
    request: SignedRequest,
    first_signature: String,
}

impl Reconciled {
    /// Retrieve the final signed request.
    #[inline]
    pub fn request(&self) -> &SignedRequest {
        &self.request
    }

    /// Take the final signed request.
    #[inline]
    pub fn into_request(self) -> SignedRequest {
        self.request
    }

    /// Retrieve the final signature.
    #[inline]
    pub fn signature(&self) -> &str {
        &self.request.signature
    }

    /// Retrieve the signature produced by the first pass.
    #[inline]
    pub fn first_signature(&self) -> &str {
        &self.first_signature
    }
}

#[cfg(test)]
mod tests {
    use {
        super::{DefaultHeaders, NoPreparation, PrepareRequest, SigningMode},
        crate::{Credentials, SignableRequest, SignatureError, Signer, SigningSettings},
        bytes::Bytes,
        chrono::NaiveDate,
        http::{method::Method, request::Request},
        scratchstack_errors::ServiceError,
    };

    fn signer(mode: SigningMode) -> Signer {
        Signer::builder()
            .region("test")
            .service("simulator")
            .settings(SigningSettings::builder().mode(mode).build().unwrap())
            .time(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap().and_utc())
            .build()
            .unwrap()
    }

    fn demo_request() -> SignableRequest {
        SignableRequest::new("POST", "http://localhost:8765/validate", [], r#"{"data":"hello world"}"#).unwrap()
    }

    fn demo_credentials() -> Credentials {
        Credentials::new("demo-python:primary", "testkey", None)
    }

    #[test_log::test]
    fn test_default_headers() {
        let mut request = Request::builder()
            .method(Method::POST)
            .uri("http://localhost:8765/validate")
            .body(Bytes::from_static(b"{}"))
            .unwrap();
        DefaultHeaders::builder().user_agent("demo/1.0").content_type("application/json").build().unwrap().prepare(&mut request);
        assert_eq!(request.headers()["content-length"], "2");
        assert_eq!(request.headers()["host"], "localhost:8765");
        assert_eq!(request.headers()["user-agent"], "demo/1.0");
        assert_eq!(request.headers()["content-type"], "application/json");

        let mut request = Request::builder().method(Method::GET).uri("http://localhost/").body(Bytes::new()).unwrap();
        DefaultHeaders::default().prepare(&mut request);
        assert!(request.headers().get("content-length").is_none());
        assert_eq!(request.headers()["host"], "localhost");

        let mut request = Request::builder()
            .method(Method::DELETE)
            .uri("http://localhost/")
            .header("host", "example.com")
            .body(Bytes::new())
            .unwrap();
        DefaultHeaders::default().prepare(&mut request);
        assert_eq!(request.headers()["content-length"], "0");
        assert_eq!(request.headers()["host"], "example.com");
    }

    #[test_log::test]
    fn test_double_pass_known_vector() {
        let signer = signer(SigningMode::DoublePass);
        let creds = demo_credentials();
        let once = signer.sign(&demo_request(), &creds).unwrap();
        assert_eq!(once.signed().signature(), "5a0dabe0538c9f781ce94a0120f577e869c37834499b055de76337ce02b2ec8f");

        let prepare = || {
            let mut prepared = once.signed().clone().into_http_request();
            DefaultHeaders::default().prepare(&mut prepared);
            prepared
        };
        let reconciled = once.reconcile(prepare()).unwrap();

        assert_eq!(reconciled.first_signature(), "5a0dabe0538c9f781ce94a0120f577e869c37834499b055de76337ce02b2ec8f");
        assert_eq!(reconciled.signature(), "6964b6e447714bd3098c9db67599318763d5d0fc6dee6c1698dbaf5d1620f1d7");
        assert_eq!(reconciled.request().signed_headers(), &["content-length", "host", "x-amz-date"]);
        assert_eq!(reconciled.request().headers().get_all("authorization").iter().count(), 1);

        // Reconciling is idempotent.
        let again = once.reconcile(prepare()).unwrap();
        assert_eq!(again.request().authorization(), reconciled.request().authorization());

        let via_signer = signer.sign_request(&demo_request(), &creds, &DefaultHeaders::default()).unwrap();
        assert_eq!(via_signer.signature(), reconciled.signature());
    }

    #[test_log::test]
    fn test_single_pass_keeps_first_signature() {
        let signer = signer(SigningMode::SinglePass);
        let signed = signer.sign_request(&demo_request(), &demo_credentials(), &DefaultHeaders::default()).unwrap();
        assert_eq!(signed.signature(), "5a0dabe0538c9f781ce94a0120f577e869c37834499b055de76337ce02b2ec8f");
        assert_eq!(signed.headers()["content-length"], "22");
        assert_eq!(signed.signed_headers(), &["host", "x-amz-date"]);

        let unprepared = signer.sign_request(&demo_request(), &demo_credentials(), &NoPreparation).unwrap();
        assert_eq!(unprepared.signature(), signed.signature());
    }

    #[test_log::test]
    fn test_closure_preparer() {
        let signer = signer(SigningMode::DoublePass);
        let add_length = |request: &mut Request<Bytes>| {
            request.headers_mut().insert("content-length", "22".parse().unwrap());
        };
        let signed = signer.sign_request(&demo_request(), &demo_credentials(), &add_length).unwrap();
        assert_eq!(signed.signature(), "6964b6e447714bd3098c9db67599318763d5d0fc6dee6c1698dbaf5d1620f1d7");
    }

    #[test_log::test]
    fn test_reconciliation_mismatch() {
        let signer = signer(SigningMode::DoublePass);
        let creds = demo_credentials();
        let once = signer.sign(&demo_request(), &creds).unwrap();

        let mut prepared = once.signed().clone().into_http_request();
        *prepared.body_mut() = Bytes::from_static(br#"{"data": "hello world"}"#);
        let e = once.reconcile(prepared).unwrap_err();
        assert!(matches!(e, SignatureError::ReconciliationMismatch(_)));
        assert_eq!(e.to_string(), "Request body changed between signing passes (22 bytes != 23 bytes)");
        assert_eq!(e.error_code(), "ReconciliationMismatch");

        let mut prepared = once.signed().clone().into_http_request();
        *prepared.method_mut() = Method::PUT;
        let e = once.reconcile(prepared).unwrap_err();
        assert_eq!(e.to_string(), "Request method changed between signing passes: POST != PUT");

        let mut prepared = once.signed().clone().into_http_request();
        *prepared.uri_mut() = "http://localhost:8765/other".parse().unwrap();
        let e = once.reconcile(prepared).unwrap_err();
        assert_eq!(e.to_string(), "Request URI changed between signing passes");

        let rewrite_body = |request: &mut Request<Bytes>| *request.body_mut() = Bytes::new();
        let e = signer.sign_request(&demo_request(), &creds, &rewrite_body).unwrap_err();
        assert!(matches!(e, SignatureError::ReconciliationMismatch(_)));
    }
}
