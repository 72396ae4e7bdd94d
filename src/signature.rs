//! Server-side signature verification.
use {
    crate::{
        auth::{SigV4Authenticator, SigV4AuthenticatorResponse},
        body::IntoRequestBytes,
        canonical::{CanonicalOptions, CanonicalRequest, VecSignedHeaderRequirements},
        constants::*,
        derive_signing_key, Credentials, GetSigningKeyRequest, GetSigningKeyResponse, SignableRequest, SignatureError,
        SignedHeaderRequirements, SigningScope,
    },
    bytes::Bytes,
    chrono::{DateTime, Duration, Utc},
    derive_builder::Builder,
    http::{
        header::{HeaderMap, HeaderName},
        request::{Parts, Request},
        StatusCode,
    },
    log::{debug, trace},
    scratchstack_errors::ServiceError,
    std::future::Future,
    subtle::ConstantTimeEq,
    tower::{BoxError, Service},
};

/// Default allowed timestamp mismatch in minutes.
pub const ALLOWED_MISMATCH_MINUTES: i64 = 15;

/// The result of verifying a request.
#[derive(Debug)]
pub enum VerificationOutcome {
    /// The signature is valid.
    Validated(SigV4AuthenticatorResponse),

    /// The request is well-formed but the signature is not acceptable.
    Rejected(SignatureError),

    /// The request could not be verified at all.
    Malformed(SignatureError),
}

impl VerificationOutcome {
    /// Indicates whether the request was validated.
    #[inline]
    pub fn is_validated(&self) -> bool {
        matches!(self, Self::Validated(_))
    }

    /// Retrieve the authenticator response for a validated request.
    pub fn response(&self) -> Option<&SigV4AuthenticatorResponse> {
        match self {
            Self::Validated(response) => Some(response),
            _ => None,
        }
    }

    /// Retrieve the error for a rejected or malformed request.
    pub fn error(&self) -> Option<&SignatureError> {
        match self {
            Self::Validated(_) => None,
            Self::Rejected(e) | Self::Malformed(e) => Some(e),
        }
    }

    /// The HTTP status a transport should answer with.
    pub fn http_status(&self) -> StatusCode {
        match self {
            Self::Validated(_) => StatusCode::OK,
            Self::Rejected(_) => StatusCode::FORBIDDEN,
            Self::Malformed(e) => e.http_status(),
        }
    }
}

impl From<Result<SigV4AuthenticatorResponse, SignatureError>> for VerificationOutcome {
    fn from(result: Result<SigV4AuthenticatorResponse, SignatureError>) -> Self {
        match result {
            Ok(response) => Self::Validated(response),
            Err(e) if e.http_status() == StatusCode::FORBIDDEN => Self::Rejected(e),
            Err(e) => Self::Malformed(e),
        }
    }
}

/// Verifies SigV4 signatures for one region and service.
#[derive(Builder, Clone, Debug)]
pub struct Verifier {
    /// The region requests must be scoped to.
    #[builder(setter(into))]
    region: String,

    /// The service requests must be scoped to.
    #[builder(setter(into))]
    service: String,

    /// Reject requests whose timestamp is further than this from the server time.
    #[builder(setter(strip_option), default)]
    allowed_mismatch: Option<Duration>,

    /// Headers that must be signed in addition to `host`.
    #[builder(default)]
    required_headers: VecSignedHeaderRequirements,

    /// Retry with `host` replaced by `X-Forwarded-Host` when the signature does not match.
    #[builder(default)]
    use_forwarded_host: bool,

    /// Canonicalization options.
    #[builder(default)]
    options: CanonicalOptions,
}

impl Verifier {
    /// Create a verifier with default settings.
    pub fn new(region: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            service: service.into(),
            allowed_mismatch: None,
            required_headers: VecSignedHeaderRequirements::default(),
            use_forwarded_host: false,
            options: CanonicalOptions::default(),
        }
    }

    /// Create a [VerifierBuilder] to construct a [Verifier].
    #[inline]
    pub fn builder() -> VerifierBuilder {
        VerifierBuilder::default()
    }

    /// Retrieve the region requests must be scoped to.
    #[inline]
    pub fn region(&self) -> &str {
        &self.region
    }

    /// Retrieve the service requests must be scoped to.
    #[inline]
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Verify a request signed with known credentials.
    ///
    /// The access key and session token in the request must match `credentials`.
    pub fn verify_request(
        &self,
        request: &SignableRequest,
        credentials: &Credentials,
        server_timestamp: DateTime<Utc>,
    ) -> VerificationOutcome {
        let outcome: VerificationOutcome = self.check_with_credentials(request, credentials, server_timestamp).into();
        debug!("Verification outcome: {}", outcome.http_status());
        outcome
    }

    /// Verify a request, resolving the signing key through `get_signing_key`.
    pub async fn validate_request<G, F>(
        &self,
        request: &SignableRequest,
        get_signing_key: &mut G,
        server_timestamp: DateTime<Utc>,
    ) -> VerificationOutcome
    where
        G: Service<GetSigningKeyRequest, Response = GetSigningKeyResponse, Error = BoxError, Future = F> + Send,
        F: Future<Output = Result<GetSigningKeyResponse, BoxError>> + Send,
    {
        let outcome: VerificationOutcome =
            self.check_with_key_provider(request, get_signing_key, server_timestamp).await.into();
        debug!("Verification outcome: {}", outcome.http_status());
        outcome
    }

    fn check_with_credentials(
        &self,
        request: &SignableRequest,
        credentials: &Credentials,
        server_timestamp: DateTime<Utc>,
    ) -> Result<SigV4AuthenticatorResponse, SignatureError> {
        let (auth, forwarded) = self.authenticators(request)?;
        auth.prevalidate(&self.region, &self.service, server_timestamp, self.allowed_mismatch)?;

        if auth.access_key() != credentials.access_key_id() {
            debug!("Access key {} does not match the expected credentials", auth.access_key());
            return Err(SignatureError::InvalidClientTokenId(MSG_UNKNOWN_ACCESS_KEY.to_string()));
        }

        let token_matches = match (auth.session_token(), credentials.session_token()) {
            (None, None) => true,
            (Some(got), Some(expected)) => got.as_bytes().ct_eq(expected.as_bytes()).into(),
            _ => false,
        };
        if !token_matches {
            return Err(SignatureError::InvalidClientTokenId(MSG_INVALID_SECURITY_TOKEN.to_string()));
        }

        let (_, scope) = SigningScope::from_credential(auth.credential())?;
        let key = GetSigningKeyResponse {
            signing_key: derive_signing_key(credentials.secret_key(), &scope),
            issuer: None,
            max_age: None,
        };

        finish(&auth, forwarded.as_ref(), server_timestamp, key)
    }

    async fn check_with_key_provider<G, F>(
        &self,
        request: &SignableRequest,
        get_signing_key: &mut G,
        server_timestamp: DateTime<Utc>,
    ) -> Result<SigV4AuthenticatorResponse, SignatureError>
    where
        G: Service<GetSigningKeyRequest, Response = GetSigningKeyResponse, Error = BoxError, Future = F> + Send,
        F: Future<Output = Result<GetSigningKeyResponse, BoxError>> + Send,
    {
        let (auth, forwarded) = self.authenticators(request)?;
        auth.prevalidate(&self.region, &self.service, server_timestamp, self.allowed_mismatch)?;
        let key = auth.get_signing_key(&self.region, &self.service, get_signing_key).await?;
        finish(&auth, forwarded.as_ref(), server_timestamp, key)
    }

    /// Build the authenticator for the request as received and, if enabled, for the request as
    /// addressed through `X-Forwarded-Host`.
    fn authenticators(
        &self,
        request: &SignableRequest,
    ) -> Result<(SigV4Authenticator, Option<SigV4Authenticator>), SignatureError> {
        let options = options_for(self.options, request.headers());
        let auth = authenticator(request, request.headers(), options, &self.required_headers)?;
        trace!("Created authenticator: {:?}", auth);

        let forwarded = match self.use_forwarded_host {
            true => forwarded_host_headers(request.headers())
                .and_then(|headers| authenticator(request, &headers, options, &self.required_headers).ok()),
            false => None,
        };

        Ok((auth, forwarded))
    }
}

/// Verify that `request` was signed by `credentials` for `service` in `region`.
///
/// Any error, whether a malformed request or a mismatched signature, yields `false`. Use
/// [`Verifier::verify_request`] to learn why.
pub fn verify(request: &SignableRequest, credentials: &Credentials, service: &str, region: &str) -> bool {
    Verifier::new(region, service).verify_request(request, credentials, Utc::now()).is_validated()
}

/// Validate an AWS SigV4 request.
///
/// This takes in an HTTP [`Request`] along with other service-specific parameters. If the
/// validation is successful (i.e. the request is properly signed with a known access key), this
/// returns:
/// * The request headers (as HTTP [`Parts`]).
/// * The request body (as a [`Bytes`] object, which is empty if no body was provided).
/// * The [response from the authenticator][SigV4AuthenticatorResponse], which identifies the
///   access key and issuer that signed the request.
///
/// # Parameters
/// * `request` - The HTTP [`Request`] to validate.
/// * `region` - The AWS region in which the request is being made.
/// * `service` - The AWS service to which the request is being made.
/// * `get_signing_key` - A service that can provide the signing key for the request, such as an
///   [`IssuerKeyStore`][crate::IssuerKeyStore].
/// * `server_timestamp` - The timestamp of the server when the request was received. Usually this
///   is the current time, `Utc::now()`. Requests more than 15 minutes away are rejected.
/// * `required_headers` - The headers that are required to be signed in the request in addition to
///   the default SigV4 headers. If none, use
///   [`NO_ADDITIONAL_SIGNED_HEADERS`][crate::NO_ADDITIONAL_SIGNED_HEADERS].
/// * `options` - [`CanonicalOptions`] that affect canonicalization. For most services, use
///   `CanonicalOptions::default()`.
///
/// # Example
/// ```rust
/// use chrono::Utc;
/// use sigv4_loopback::{
///     sigv4_validate_request, CanonicalOptions, Credentials, Issuer, IssuerKey, IssuerKeyStore, SignableRequest,
///     Signer, NO_ADDITIONAL_SIGNED_HEADERS,
/// };
///
/// # tokio_test::block_on(async {
/// let mut store = IssuerKeyStore::new([
///     Issuer::builder().name("demo-rust").key(IssuerKey::new("primary", "testkey")).build().unwrap(),
/// ]);
///
/// let credentials = Credentials::new("demo-rust:primary", "testkey", None);
/// let signer = Signer::builder().region("test").service("simulator").build().unwrap();
/// let request = SignableRequest::new("GET", "http://localhost:8765/validate", [], ()).unwrap();
/// let signed = signer.sign(&request, &credentials).unwrap().into_signed();
///
/// let (_parts, _body, response) = sigv4_validate_request(
///     signed.into_http_request(),
///     "test",
///     "simulator",
///     &mut store,
///     Utc::now(),
///     &NO_ADDITIONAL_SIGNED_HEADERS,
///     CanonicalOptions::default(),
/// )
/// .await
/// .unwrap();
/// assert_eq!(response.issuer(), Some("demo-rust"));
/// # });
/// ```
///
/// # Errors
/// This function returns a [`SignatureError`][crate::SignatureError] if the HTTP request is
/// malformed or the request was not properly signed. The validation follows the
/// [AWS Auth Error Ordering](https://github.com/dacut/scratchstack-aws-signature/blob/main/docs/AWS%20Auth%20Error%20Ordering.pdf)
/// document.
pub async fn sigv4_validate_request<B, G, F, S>(
    request: Request<B>,
    region: &str,
    service: &str,
    get_signing_key: &mut G,
    server_timestamp: DateTime<Utc>,
    required_headers: &S,
    options: CanonicalOptions,
) -> Result<(Parts, Bytes, SigV4AuthenticatorResponse), BoxError>
where
    B: IntoRequestBytes,
    G: Service<GetSigningKeyRequest, Response = GetSigningKeyResponse, Error = BoxError, Future = F> + Send,
    F: Future<Output = Result<GetSigningKeyResponse, BoxError>> + Send,
    S: SignedHeaderRequirements + ?Sized,
{
    let request = SignableRequest::from_http_request(request)?;
    let options = options_for(options, request.headers());
    let auth = authenticator(&request, request.headers(), options, required_headers)?;
    trace!("Created authenticator: {:?}", auth);
    let sigv4_response = auth
        .validate_signature(
            region,
            service,
            server_timestamp,
            Some(Duration::minutes(ALLOWED_MISMATCH_MINUTES)),
            get_signing_key,
        )
        .await?;

    let (parts, body) = request.into_http_request().into_parts();
    Ok((parts, body, sigv4_response))
}

/// Honor an `x-amz-content-sha256: UNSIGNED-PAYLOAD` header.
fn options_for(options: CanonicalOptions, headers: &HeaderMap) -> CanonicalOptions {
    let unsigned = headers.get(HDR_X_AMZ_CONTENT_SHA256).is_some_and(|v| v.as_bytes() == UNSIGNED_PAYLOAD.as_bytes());
    CanonicalOptions {
        unsigned_payload: options.unsigned_payload || unsigned,
        ..options
    }
}

fn authenticator<S>(
    request: &SignableRequest,
    headers: &HeaderMap,
    options: CanonicalOptions,
    required_headers: &S,
) -> Result<SigV4Authenticator, SignatureError>
where
    S: SignedHeaderRequirements + ?Sized,
{
    let canonical_request =
        CanonicalRequest::from_parts(request.method(), request.uri(), headers, request.body(), options)?;
    trace!("Created canonical request: {:?}", canonical_request);
    canonical_request.get_authenticator(required_headers)
}

/// The request headers with `host` replaced by `x-forwarded-host`, if that differs.
fn forwarded_host_headers(headers: &HeaderMap) -> Option<HeaderMap> {
    let forwarded = headers.get(HDR_X_FORWARDED_HOST)?;
    if headers.get(HDR_HOST) == Some(forwarded) {
        return None;
    }

    let mut result = headers.clone();
    result.insert(HeaderName::from_static(HDR_HOST), forwarded.clone());
    Some(result)
}

/// Compare the signature, retrying with the forwarded-host authenticator on a mismatch.
fn finish(
    auth: &SigV4Authenticator,
    forwarded: Option<&SigV4Authenticator>,
    server_timestamp: DateTime<Utc>,
    key: GetSigningKeyResponse,
) -> Result<SigV4AuthenticatorResponse, SignatureError> {
    match (auth.validate_with_key(server_timestamp, key.clone()), forwarded) {
        (Err(SignatureError::SignatureDoesNotMatch(_)), Some(forwarded)) => {
            debug!("Signature mismatch; retrying with X-Forwarded-Host");
            forwarded.validate_with_key(server_timestamp, key)
        }
        (result, _) => result,
    }
}
