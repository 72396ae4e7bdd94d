//! Client-side SigV4 signing.
//!
//! A [`Signer`] is an immutable configuration value: region, service, and [`SigningSettings`].
//! Signing a request is a pure function of the request, the credentials, and the signing
//! timestamp.
use {
    crate::{
        canonical::{CanonicalOptions, CanonicalRequest},
        constants::*,
        crypto::{hmac_sha256, sha256_hex},
        derive_signing_key,
        reconcile::{PrepareRequest, SignedOnce, SigningMode},
        request::host_from_uri,
        Credentials, KSigningKey, SignableRequest, SignatureError, SignedRequest, SigningScope,
    },
    chrono::{DateTime, Utc},
    derive_builder::Builder,
    http::header::{HeaderMap, HeaderName, HeaderValue},
    log::{debug, trace},
};

/// Settings shared by every request a [`Signer`] signs.
#[derive(Builder, Clone, Debug, Default, Eq, PartialEq)]
pub struct SigningSettings {
    /// Whether to re-sign after the transport has prepared the request.
    #[builder(default)]
    mode: SigningMode,

    /// Canonicalization options.
    #[builder(default)]
    options: CanonicalOptions,

    /// Add an `x-amz-content-sha256` header carrying the payload hash.
    #[builder(default)]
    payload_checksum: bool,

    /// Restrict signing to these headers. `host` and `x-amz-*` headers are always signed.
    #[builder(setter(strip_option), default)]
    headers_to_sign: Option<Vec<String>>,
}

impl SigningSettings {
    /// Create a [SigningSettingsBuilder] to construct a [SigningSettings].
    #[inline]
    pub fn builder() -> SigningSettingsBuilder {
        SigningSettingsBuilder::default()
    }

    /// Retrieve the signing mode.
    #[inline]
    pub fn mode(&self) -> SigningMode {
        self.mode
    }

    /// Retrieve the canonicalization options.
    #[inline]
    pub fn options(&self) -> CanonicalOptions {
        self.options
    }

    /// Indicates whether an `x-amz-content-sha256` header is added.
    #[inline]
    pub fn payload_checksum(&self) -> bool {
        self.payload_checksum
    }

    /// Retrieve the header allow-list, if any.
    #[inline]
    pub fn headers_to_sign(&self) -> Option<&[String]> {
        self.headers_to_sign.as_deref()
    }
}

/// Signs requests for one region and service.
///
/// ```
/// use sigv4_loopback::{Credentials, SignableRequest, Signer};
///
/// let signer = Signer::builder().region("test").service("simulator").build().unwrap();
/// let request = SignableRequest::new(
///     "POST",
///     "http://localhost:8765/validate",
///     [("content-type", "application/json")],
///     r#"{"data":"hello world"}"#,
/// )
/// .unwrap();
/// let credentials = Credentials::new("demo-python:primary", "testkey", None);
/// let signed = signer.sign(&request, &credentials).unwrap().into_signed();
/// assert!(signed.authorization().unwrap().starts_with("AWS4-HMAC-SHA256 Credential=demo-python:primary/"));
/// ```
#[derive(Builder, Clone, Debug)]
pub struct Signer {
    /// The region requests are scoped to.
    #[builder(setter(into))]
    region: String,

    /// The service requests are scoped to.
    #[builder(setter(into))]
    service: String,

    /// Signing settings.
    #[builder(default)]
    settings: SigningSettings,

    /// Fixed signing time. When unset, the current time is used.
    #[builder(setter(strip_option), default)]
    time: Option<DateTime<Utc>>,
}

impl Signer {
    /// Create a [SignerBuilder] to construct a [Signer].
    #[inline]
    pub fn builder() -> SignerBuilder {
        SignerBuilder::default()
    }

    /// Retrieve the region requests are scoped to.
    #[inline]
    pub fn region(&self) -> &str {
        &self.region
    }

    /// Retrieve the service requests are scoped to.
    #[inline]
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Retrieve the signing settings.
    #[inline]
    pub fn settings(&self) -> &SigningSettings {
        &self.settings
    }

    /// The signing timestamp for a new request, truncated to whole seconds.
    fn signing_time(&self) -> DateTime<Utc> {
        let now = self.time.unwrap_or_else(Utc::now);
        DateTime::from_timestamp(now.timestamp(), 0).unwrap_or(now)
    }

    /// Sign a request once.
    ///
    /// The returned [`SignedOnce`] can be [reconciled][SignedOnce::reconcile] after the transport
    /// has prepared the request.
    pub fn sign<'a>(
        &'a self,
        request: &SignableRequest,
        credentials: &'a Credentials,
    ) -> Result<SignedOnce<'a>, SignatureError> {
        let signed = self.sign_at(request.clone(), credentials, self.signing_time())?;
        Ok(SignedOnce::new(self, credentials, signed))
    }

    /// Sign a request, hand it to `preparer`, and reconcile the result according to the configured
    /// [`SigningMode`].
    pub fn sign_request<P>(
        &self,
        request: &SignableRequest,
        credentials: &Credentials,
        preparer: &P,
    ) -> Result<SignedRequest, SignatureError>
    where
        P: PrepareRequest + ?Sized,
    {
        let once = self.sign(request, credentials)?;
        let mut prepared = once.signed().clone().into_http_request();
        preparer.prepare(&mut prepared);

        match self.settings.mode {
            SigningMode::DoublePass => Ok(once.reconcile(prepared)?.into_request()),
            SigningMode::SinglePass => once.keep_first_pass(prepared),
        }
    }

    /// Run one full signing pass at a fixed timestamp.
    pub(crate) fn sign_at(
        &self,
        mut request: SignableRequest,
        credentials: &Credentials,
        timestamp: DateTime<Utc>,
    ) -> Result<SignedRequest, SignatureError> {
        let payload_hash = self.add_signing_headers(&mut request, credentials, timestamp)?;

        let mut options = self.settings.options;
        options.unsigned_payload = payload_hash == UNSIGNED_PAYLOAD;

        let canonical_request =
            CanonicalRequest::from_parts(request.method(), request.uri(), request.headers(), request.body(), options)?;
        let signed_headers = canonical_request.signable_header_names(self.settings.headers_to_sign());
        let canonical_request = canonical_request.with_signed_headers(&signed_headers);

        let scope = SigningScope::for_timestamp(timestamp, self.region.as_str(), self.service.as_str());
        let string_to_sign = string_to_sign(&canonical_request, &scope, timestamp);
        let key = derive_signing_key(credentials.secret_key(), &scope);
        let signature = sign(&key, &string_to_sign);

        assemble(request, credentials, scope, signed_headers, signature, timestamp)
    }

    /// Add the headers a signed request must carry. Returns the payload hash.
    fn add_signing_headers(
        &self,
        request: &mut SignableRequest,
        credentials: &Credentials,
        timestamp: DateTime<Utc>,
    ) -> Result<String, SignatureError> {
        let payload_hash = if self.settings.options.unsigned_payload {
            UNSIGNED_PAYLOAD.to_string()
        } else {
            sha256_hex(request.body())
        };

        let host = match request.headers().contains_key(HDR_HOST) {
            true => None,
            false => match host_from_uri(request.uri()) {
                Some(host) => Some(header_value(HDR_HOST, host)?),
                None => return Err(SignatureError::MalformedHeader(MSG_MISSING_HOST.to_string())),
            },
        };

        let headers = request.headers_mut();
        headers.remove(HDR_AUTHORIZATION);
        insert(headers, HDR_X_AMZ_DATE, header_value(HDR_X_AMZ_DATE, &timestamp.format(ISO8601_COMPACT_FORMAT).to_string())?);

        if let Some(host) = host {
            insert(headers, HDR_HOST, host);
        }

        match credentials.session_token() {
            Some(token) => {
                let mut value = header_value(HDR_X_AMZ_SECURITY_TOKEN, token)?;
                value.set_sensitive(true);
                insert(headers, HDR_X_AMZ_SECURITY_TOKEN, value);
            }
            None => {
                headers.remove(HDR_X_AMZ_SECURITY_TOKEN);
            }
        }

        if self.settings.payload_checksum || self.settings.options.unsigned_payload {
            insert(headers, HDR_X_AMZ_CONTENT_SHA256, header_value(HDR_X_AMZ_CONTENT_SHA256, &payload_hash)?);
        }

        Ok(payload_hash)
    }
}

/// Build the string to sign for a canonical request.
///
/// This is `AWS4-HMAC-SHA256`, the timestamp, the credential scope, and the hex SHA-256 of the
/// canonical request, separated by newlines.
pub fn string_to_sign(canonical_request: &CanonicalRequest, scope: &SigningScope, timestamp: DateTime<Utc>) -> String {
    let result = format!(
        "{}\n{}\n{}\n{}",
        AWS4_HMAC_SHA256,
        timestamp.format(ISO8601_COMPACT_FORMAT),
        scope,
        hex::encode(canonical_request.canonical_request_sha256())
    );
    trace!("String to sign:\n{}", result);
    result
}

/// Sign a string to sign, returning 64 lower-case hex characters.
pub fn sign(key: &KSigningKey, string_to_sign: &str) -> String {
    hex::encode(hmac_sha256(key.as_ref(), string_to_sign.as_bytes()))
}

/// Attach the `Authorization` header to a request that already carries its signing headers.
///
/// # Errors
/// [`SignatureError::MalformedHeader`] if the access key contains characters that cannot appear in
/// an HTTP header.
pub fn assemble(
    request: SignableRequest,
    credentials: &Credentials,
    scope: SigningScope,
    signed_headers: Vec<String>,
    signature: String,
    timestamp: DateTime<Utc>,
) -> Result<SignedRequest, SignatureError> {
    let authorization = format!(
        "{} Credential={}/{}, SignedHeaders={}, Signature={}",
        AWS4_HMAC_SHA256,
        credentials.access_key_id(),
        scope,
        signed_headers.join(";"),
        signature
    );
    let mut authorization = header_value(HDR_AUTHORIZATION, &authorization)?;
    authorization.set_sensitive(true);

    let SignableRequest {
        method,
        uri,
        mut headers,
        body,
    } = request;
    insert(&mut headers, HDR_AUTHORIZATION, authorization);
    debug!("Signed {} {} with SignedHeaders={}", method, uri.path(), signed_headers.join(";"));

    Ok(SignedRequest {
        method,
        uri,
        headers,
        body,
        signature,
        signed_headers,
        timestamp,
        scope,
    })
}

fn header_value(name: &str, value: &str) -> Result<HeaderValue, SignatureError> {
    HeaderValue::from_str(value).map_err(|_| SignatureError::MalformedHeader(format!("Invalid value for header {}", name)))
}

fn insert(headers: &mut HeaderMap, name: &'static str, value: HeaderValue) {
    headers.insert(HeaderName::from_static(name), value);
}
