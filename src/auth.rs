//! AWS API request signatures verification routines.
//!
//! This implements the AWS [SigV4](http://docs.aws.amazon.com/general/latest/gr/signature-version-4.html)
//! server-side validation algorithm once a canonical request has been generated.
//!
//! **Stability of this module is not guaranteed except for items exposed at the crate root**.
//! The functions and types are subject to change in minor/patch versions. This is exposed for
//! testing purposes only.

use {
    crate::{
        constants::*,
        crypto::{hmac_sha256, SHA256_OUTPUT_LEN},
        GetSigningKeyRequest, GetSigningKeyResponse, KSigningKey, SignatureError,
    },
    chrono::{DateTime, Duration, Utc},
    derive_builder::Builder,
    log::{debug, trace},
    qualifier_attr::qualifiers,
    std::{
        fmt::{Debug, Formatter, Result as FmtResult},
        future::Future,
    },
    subtle::ConstantTimeEq,
    tower::{BoxError, Service, ServiceExt},
};

/// Low-level structure for performing AWS SigV4 authentication after a canonical request has been generated.
#[derive(Builder, Clone, Default)]
#[cfg_attr(any(doc, feature = "unstable"), qualifiers(pub))]
#[cfg_attr(not(any(doc, feature = "unstable")), qualifiers(pub(crate)))]
#[builder(derive(Debug))]
pub struct SigV4Authenticator {
    /// The SHA-256 hash of the canonical request.
    canonical_request_sha256: [u8; SHA256_OUTPUT_LEN],

    /// The credential passed into the request, in the form of `keyid/date/region/service/aws4_request`.
    /// The date must reflect that of the request timestamp in `YYYYMMDD` format, not the server's
    /// date. Timestamp validation is performed separately.
    credential: String,

    /// The optional session token.
    #[builder(setter(into, strip_option), default)]
    session_token: Option<String>,

    /// The signature passed into the request.
    signature: String,

    /// The sorted headers the caller listed in `SignedHeaders`.
    #[builder(default)]
    signed_headers: Vec<String>,

    /// The timestamp of the request, from either the `X-Amz-Date` or the `Date` header.
    request_timestamp: DateTime<Utc>,
}

impl SigV4Authenticator {
    /// Create a builder for `SigV4Authenticator`.
    #[cfg_attr(any(doc, feature = "unstable"), qualifiers(pub))]
    #[cfg_attr(not(any(doc, feature = "unstable")), qualifiers(pub(crate)))]
    #[inline(always)]
    fn builder() -> SigV4AuthenticatorBuilder {
        SigV4AuthenticatorBuilder::default()
    }

    /// Retrieve the SHA-256 hash of the canonical request.
    #[cfg_attr(any(doc, feature = "unstable"), qualifiers(pub))]
    #[cfg_attr(not(any(doc, feature = "unstable")), qualifiers(pub(crate)))]
    #[inline(always)]
    fn canonical_request_sha256(&self) -> [u8; SHA256_OUTPUT_LEN] {
        self.canonical_request_sha256
    }

    /// Retrieve the credential passed into the request, in the form of `keyid/date/region/service/aws4_request`.
    #[cfg_attr(any(doc, feature = "unstable"), qualifiers(pub))]
    #[cfg_attr(not(any(doc, feature = "unstable")), qualifiers(pub(crate)))]
    #[inline(always)]
    fn credential(&self) -> &str {
        &self.credential
    }

    /// Retrieve the access key portion of the credential.
    #[cfg_attr(any(doc, feature = "unstable"), qualifiers(pub))]
    #[cfg_attr(not(any(doc, feature = "unstable")), qualifiers(pub(crate)))]
    fn access_key(&self) -> &str {
        self.credential.split('/').next().unwrap_or_default()
    }

    /// Retrieve the optional session token.
    #[cfg_attr(any(doc, feature = "unstable"), qualifiers(pub))]
    #[cfg_attr(not(any(doc, feature = "unstable")), qualifiers(pub(crate)))]
    #[inline(always)]
    fn session_token(&self) -> Option<&str> {
        self.session_token.as_deref()
    }

    /// Retrieve the signature passed into the request.
    #[cfg_attr(any(doc, feature = "unstable"), qualifiers(pub))]
    #[cfg_attr(not(any(doc, feature = "unstable")), qualifiers(pub(crate)))]
    #[inline(always)]
    fn signature(&self) -> &str {
        &self.signature
    }

    /// Retrieve the sorted headers listed in `SignedHeaders`.
    #[cfg_attr(any(doc, feature = "unstable"), qualifiers(pub))]
    #[cfg_attr(not(any(doc, feature = "unstable")), qualifiers(pub(crate)))]
    #[inline(always)]
    fn signed_headers(&self) -> &[String] {
        &self.signed_headers
    }

    /// Retrieve the timestamp of the request.
    #[cfg_attr(any(doc, feature = "unstable"), qualifiers(pub))]
    #[cfg_attr(not(any(doc, feature = "unstable")), qualifiers(pub(crate)))]
    #[inline(always)]
    fn request_timestamp(&self) -> DateTime<Utc> {
        self.request_timestamp
    }

    /// Verify the request parameters make sense for the region, service, and specified timestamp.
    /// This must be called successfully before calling [validate_signature][Self::validate_signature].
    ///
    /// The request timestamp is only checked against the server timestamp when `allowed_mismatch`
    /// is set.
    #[cfg_attr(any(doc, feature = "unstable"), qualifiers(pub))]
    #[cfg_attr(not(any(doc, feature = "unstable")), qualifiers(pub(crate)))]
    fn prevalidate(
        &self,
        region: &str,
        service: &str,
        server_timestamp: DateTime<Utc>,
        allowed_mismatch: Option<Duration>,
    ) -> Result<(), SignatureError> {
        let req_ts = self.request_timestamp();

        if let Some(allowed_mismatch) = allowed_mismatch {
            // Rule 10: Make sure date isn't expired...
            self.check_not_expired(server_timestamp, allowed_mismatch)?;

            // Rule 11: ... or too far into the future.
            let max_ts = server_timestamp.checked_add_signed(allowed_mismatch).unwrap_or(server_timestamp);
            if req_ts > max_ts {
                trace!("prevalidate: request timestamp {} is after maximum timestamp {}", req_ts, max_ts);
                return Err(SignatureError::SignatureDoesNotMatch(Some(format!(
                    "Signature not yet current: {} is still later than {} ({} + {}.)",
                    req_ts.format(ISO8601_COMPACT_FORMAT),
                    max_ts.format(ISO8601_COMPACT_FORMAT),
                    server_timestamp.format(ISO8601_COMPACT_FORMAT),
                    duration_to_string(allowed_mismatch)
                ))));
            }
        }

        // Rule 12: Credential scope must have exactly five elements.
        let credential_parts = self.credential().split('/').collect::<Vec<&str>>();
        let [_, cscope_date, cscope_region, cscope_service, cscope_term] = credential_parts.as_slice() else {
            trace!("prevalidate: credential has {} parts, expected 5", credential_parts.len());
            return Err(SignatureError::IncompleteSignature(format!(
                "{} got '{}'",
                MSG_CREDENTIAL_MUST_HAVE_FIVE_PARTS,
                self.credential()
            )));
        };

        // Rule 13: Credential scope must be correct for the region/service/date.
        let mut cscope_errors = Vec::new();
        if *cscope_region != region {
            trace!("prevalidate: credential region '{}' does not match expected region '{}'", cscope_region, region);
            cscope_errors.push(format!("Credential should be scoped to a valid region, not '{}'.", cscope_region));
        }

        if *cscope_service != service {
            trace!("prevalidate: credential service '{}' does not match expected service '{}'", cscope_service, service);
            cscope_errors.push(format!("Credential should be scoped to correct service: '{}'.", service));
        }

        if *cscope_term != AWS4_REQUEST {
            cscope_errors.push(format!(
                "Credential should be scoped with a valid terminator: 'aws4_request', not '{}'.",
                cscope_term
            ));
        }

        let expected_cscope_date = req_ts.format(ISO8601_DATE_FORMAT).to_string();
        if *cscope_date != expected_cscope_date {
            cscope_errors.push(format!("Date in Credential scope does not match YYYYMMDD from ISO-8601 version of date from HTTP: '{}' != '{}', from '{}'.", cscope_date, expected_cscope_date, req_ts.format(ISO8601_COMPACT_FORMAT)));
        }

        if !cscope_errors.is_empty() {
            return Err(SignatureError::SignatureDoesNotMatch(Some(cscope_errors.join(" "))));
        }

        Ok(())
    }

    /// Reject the request if its timestamp is more than `max_age` before the server timestamp.
    #[cfg_attr(any(doc, feature = "unstable"), qualifiers(pub))]
    #[cfg_attr(not(any(doc, feature = "unstable")), qualifiers(pub(crate)))]
    fn check_not_expired(&self, server_timestamp: DateTime<Utc>, max_age: Duration) -> Result<(), SignatureError> {
        let req_ts = self.request_timestamp();
        let min_ts = server_timestamp.checked_sub_signed(max_age).unwrap_or(server_timestamp);

        if req_ts < min_ts {
            trace!("request timestamp {} is before minimum timestamp {}", req_ts, min_ts);
            return Err(SignatureError::SignatureDoesNotMatch(Some(format!(
                "Signature expired: {} is now earlier than {} ({} - {}.)",
                req_ts.format(ISO8601_COMPACT_FORMAT),
                min_ts.format(ISO8601_COMPACT_FORMAT),
                server_timestamp.format(ISO8601_COMPACT_FORMAT),
                duration_to_string(max_age)
            ))));
        }

        Ok(())
    }

    /// Return the signing key (`kSigning` from the [AWS documentation](https://docs.aws.amazon.com/general/latest/gr/sigv4-calculate-signature.html))
    /// for the request.
    #[cfg_attr(any(doc, feature = "unstable"), qualifiers(pub))]
    #[cfg_attr(not(any(doc, feature = "unstable")), qualifiers(pub(crate)))]
    async fn get_signing_key<S, F>(
        &self,
        region: &str,
        service: &str,
        get_signing_key: &mut S,
    ) -> Result<GetSigningKeyResponse, SignatureError>
    where
        S: Service<GetSigningKeyRequest, Response = GetSigningKeyResponse, Error = BoxError, Future = F> + Send,
        F: Future<Output = Result<GetSigningKeyResponse, BoxError>> + Send,
    {
        let req = GetSigningKeyRequest::builder()
            .access_key(self.access_key())
            .session_token(self.session_token().map(|x| x.to_string()))
            .request_date(self.request_timestamp().date_naive())
            .region(region)
            .service(service)
            .build()
            .map_err(|e| SignatureError::InternalServiceError(Box::new(e)))?;

        match get_signing_key.oneshot(req).await {
            Ok(key) => {
                trace!("get_signing_key: got signing key");
                Ok(key)
            }
            Err(e) => {
                debug!("get_signing_key: error getting signing key: {}", e);
                Err(e.into())
            }
        }
    }

    /// Return the string to sign for the request.
    #[cfg_attr(any(doc, feature = "unstable"), qualifiers(pub))]
    #[cfg_attr(not(any(doc, feature = "unstable")), qualifiers(pub(crate)))]
    fn get_string_to_sign(&self) -> Vec<u8> {
        let mut result = Vec::with_capacity(
            AWS4_HMAC_SHA256.len() + 1 + ISO8601_UTC_LENGTH + 1 + self.credential().len() + 1 + SHA256_HEX_LENGTH,
        );
        let hashed_canonical_request = hex::encode(self.canonical_request_sha256());

        // Remove the access key from the credential to get the credential scope. prevalidate() guarantees the
        // credential has five parts.
        let cscope = self.credential().split_once('/').map(|x| x.1).unwrap_or_default();

        result.extend(AWS4_HMAC_SHA256.as_bytes());
        result.push(b'\n');
        result.extend(self.request_timestamp().format(ISO8601_COMPACT_FORMAT).to_string().as_bytes());
        result.push(b'\n');
        result.extend(cscope.as_bytes());
        result.push(b'\n');
        result.extend(hashed_canonical_request.as_bytes());
        result
    }

    /// Compare the request signature against the one computed with `signing_key` in constant time.
    #[cfg_attr(any(doc, feature = "unstable"), qualifiers(pub))]
    #[cfg_attr(not(any(doc, feature = "unstable")), qualifiers(pub(crate)))]
    fn signature_matches(&self, signing_key: &KSigningKey) -> bool {
        let string_to_sign = self.get_string_to_sign();
        trace!("String to sign:\n{}", String::from_utf8_lossy(string_to_sign.as_ref()));
        let expected_signature = hex::encode(hmac_sha256(signing_key.as_ref(), string_to_sign.as_ref()));
        let is_equal: bool = self.signature().as_bytes().ct_eq(expected_signature.as_bytes()).into();
        if !is_equal {
            debug!("Signature mismatch for access key {}", self.access_key());
        }
        is_equal
    }

    /// Check the signature against a signing key that has already been resolved, honoring any
    /// maximum signature age attached to the key.
    #[cfg_attr(any(doc, feature = "unstable"), qualifiers(pub))]
    #[cfg_attr(not(any(doc, feature = "unstable")), qualifiers(pub(crate)))]
    fn validate_with_key(
        &self,
        server_timestamp: DateTime<Utc>,
        key: GetSigningKeyResponse,
    ) -> Result<SigV4AuthenticatorResponse, SignatureError> {
        if let Some(max_age) = key.max_age() {
            self.check_not_expired(server_timestamp, max_age)?;
        }

        if self.signature_matches(key.signing_key()) {
            Ok(self.response(key))
        } else {
            Err(SignatureError::SignatureDoesNotMatch(Some(MSG_REQUEST_SIGNATURE_MISMATCH.to_string())))
        }
    }

    /// Validate the request signature.
    #[cfg_attr(any(doc, feature = "unstable"), qualifiers(pub))]
    #[cfg_attr(not(any(doc, feature = "unstable")), qualifiers(pub(crate)))]
    async fn validate_signature<S, F>(
        &self,
        region: &str,
        service: &str,
        server_timestamp: DateTime<Utc>,
        allowed_mismatch: Option<Duration>,
        get_signing_key: &mut S,
    ) -> Result<SigV4AuthenticatorResponse, SignatureError>
    where
        S: Service<GetSigningKeyRequest, Response = GetSigningKeyResponse, Error = BoxError, Future = F> + Send,
        F: Future<Output = Result<GetSigningKeyResponse, BoxError>> + Send,
    {
        self.prevalidate(region, service, server_timestamp, allowed_mismatch)?;
        let key = self.get_signing_key(region, service, get_signing_key).await?;
        self.validate_with_key(server_timestamp, key)
    }

    /// Build the response for a validated request.
    #[cfg_attr(any(doc, feature = "unstable"), qualifiers(pub))]
    #[cfg_attr(not(any(doc, feature = "unstable")), qualifiers(pub(crate)))]
    fn response(&self, key: GetSigningKeyResponse) -> SigV4AuthenticatorResponse {
        SigV4AuthenticatorResponse {
            access_key: self.access_key().to_string(),
            issuer: key.issuer,
            signed_headers: self.signed_headers.clone(),
            request_timestamp: self.request_timestamp,
        }
    }
}

impl Debug for SigV4Authenticator {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("SigV4Authenticator")
            .field("canonical_request_sha256", &hex::encode(self.canonical_request_sha256()))
            .field("credential", &self.credential())
            .field("session_token", &self.session_token().map(|_| "<redacted>"))
            .field("signature", &self.signature())
            .field("signed_headers", &self.signed_headers())
            .field("request_timestamp", &self.request_timestamp())
            .finish()
    }
}

impl SigV4AuthenticatorBuilder {
    /// Retrieve the credential passed into the request.
    pub fn get_credential(&self) -> Option<&str> {
        self.credential.as_deref()
    }

    /// Retrieve the signature passed into the request.
    pub fn get_signature(&self) -> Option<&str> {
        self.signature.as_deref()
    }

    /// Retrieve the session token passed into the request.
    pub fn get_session_token(&self) -> Option<&str> {
        self.session_token.as_ref()?.as_deref()
    }
}

/// Upon successful authentication of a signature, this is returned to convey who signed the
/// request and what the signature covered.
///
/// SigV4AuthenticatorResponse structs are immutable. Use [SigV4AuthenticatorResponseBuilder] to construct a new
/// response.
#[derive(Builder, Clone, Debug, Eq, PartialEq)]
pub struct SigV4AuthenticatorResponse {
    /// The access key that signed the request.
    #[builder(setter(into))]
    access_key: String,

    /// The issuer owning the access key, if the key provider reports one.
    #[builder(setter(into, strip_option), default)]
    issuer: Option<String>,

    /// The sorted, lower-cased names of the headers covered by the signature.
    #[builder(default)]
    signed_headers: Vec<String>,

    /// The timestamp the request was signed at.
    request_timestamp: DateTime<Utc>,
}

impl SigV4AuthenticatorResponse {
    /// Create a [SigV4AuthenticatorResponseBuilder] to construct a [SigV4AuthenticatorResponse].
    #[inline]
    pub fn builder() -> SigV4AuthenticatorResponseBuilder {
        SigV4AuthenticatorResponseBuilder::default()
    }

    /// Retrieve the access key that signed the request.
    #[inline]
    pub fn access_key(&self) -> &str {
        &self.access_key
    }

    /// Retrieve the issuer owning the access key.
    #[inline]
    pub fn issuer(&self) -> Option<&str> {
        self.issuer.as_deref()
    }

    /// Retrieve the names of the headers covered by the signature.
    #[inline]
    pub fn signed_headers(&self) -> &[String] {
        &self.signed_headers
    }

    /// Retrieve the timestamp the request was signed at.
    #[inline]
    pub fn request_timestamp(&self) -> DateTime<Utc> {
        self.request_timestamp
    }
}

fn duration_to_string(duration: Duration) -> String {
    let secs = duration.num_seconds();
    if secs % 60 == 0 {
        format!("{} min", duration.num_minutes())
    } else {
        format!("{} sec", secs)
    }
}
