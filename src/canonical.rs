//! Canonicalization functionality for signature generation and validation.
//!
//! This includes various URL and header canonicalization functions, as well as the ability to
//! create an AWS SigV4 canonical request.
//!
//! **Stability of this module is not guaranteed except for items exposed at the crate root**.
//! The functions and types are subject to change in minor/patch versions. This is exposed for
//! testing purposes only.

use {
    crate::{
        auth::{SigV4Authenticator, SigV4AuthenticatorBuilder},
        chronoutil::ParseISO8601,
        constants::*,
        crypto::{sha256, sha256_hex, SHA256_OUTPUT_LEN},
        SignatureError,
    },
    chrono::{DateTime, Utc},
    http::{
        header::{HeaderMap, HeaderValue},
        method::Method,
        uri::Uri,
    },
    lazy_static::lazy_static,
    log::{debug, trace},
    qualifier_attr::qualifiers,
    regex::Regex,
    std::{
        borrow::Cow,
        collections::HashMap,
        fmt::{Debug, Formatter, Result as FmtResult},
    },
};

lazy_static! {
    /// Multiple slash pattern for condensing URIs
    static ref MULTISLASH: Regex = Regex::new("//+").unwrap();
}

/// Options controlling how a request is canonicalized.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CanonicalOptions {
    /// Remove redundant slashes and `.`/`..` segments from the URI path.
    pub normalize_uri_path: bool,

    /// Use `UNSIGNED-PAYLOAD` in place of the body hash.
    pub unsigned_payload: bool,
}

impl CanonicalOptions {
    /// S3-style canonicalization: the URI path is encoded but otherwise left as-is.
    pub const S3: Self = Self {
        normalize_uri_path: false,
        unsigned_payload: false,
    };
}

impl Default for CanonicalOptions {
    fn default() -> Self {
        Self {
            normalize_uri_path: true,
            unsigned_payload: false,
        }
    }
}

/// Authentication parameters extracted from the `Authorization` header.
#[cfg_attr(any(doc, feature = "unstable"), qualifiers(pub))]
#[cfg_attr(not(any(doc, feature = "unstable")), qualifiers(pub(crate)))]
#[derive(Debug)]
struct AuthParams {
    /// Builder for creating an authenticator.
    pub builder: SigV4AuthenticatorBuilder,

    /// The headers the caller claims to have signed, sorted.
    pub signed_headers: Vec<String>,

    /// The timestamp string for the request in YYYYMMDD'T'HHMMSS'Z' format.
    pub timestamp_str: String,
}

/// A canonicalized request for AWS SigV4.
///
/// A canonical request is built fresh for every signing or verification attempt. The set of
/// headers folded into it is fixed with [`with_signed_headers`][Self::with_signed_headers]; by
/// default every header except `authorization` is included.
#[derive(Clone)]
pub struct CanonicalRequest {
    /// The upper-cased HTTP method.
    request_method: String,

    /// The canonicalized path from the HTTP request. This is guaranteed to be ASCII.
    canonical_path: String,

    /// Query parameters from the HTTP request, percent-encoded. Values are ordered as they appear
    /// in the URL.
    query_parameters: HashMap<String, Vec<String>>,

    /// Headers from the HTTP request, keyed by lower-cased name. Values are ordered as they appear
    /// in the HTTP request.
    ///
    /// The encoding of header values is Latin 1 (ISO 8859-1), apart from a few oddities like Content-Disposition.
    headers: HashMap<String, Vec<Vec<u8>>>,

    /// The sorted names of the headers included in the canonical request.
    signed_headers: Vec<String>,

    /// The hex SHA-256 hash of the body, or `UNSIGNED-PAYLOAD`.
    body_sha256: String,
}

impl CanonicalRequest {
    /// Canonicalize the components of a request.
    ///
    /// # Errors
    /// * [`SignatureError::InvalidURIPath`] if the path is not absolute, navigates above the root,
    ///   or contains an invalid `%` escape.
    /// * [`SignatureError::MalformedQueryString`] if the query string contains an invalid `%` escape.
    pub fn from_parts(
        method: &Method,
        uri: &Uri,
        headers: &HeaderMap,
        body: &[u8],
        options: CanonicalOptions,
    ) -> Result<Self, SignatureError> {
        let canonical_path = canonicalize_uri_path(uri.path(), options.normalize_uri_path)?;
        let query_parameters = query_string_to_normalized_map(uri.query().unwrap_or(""))?;
        let headers = normalize_headers(headers);

        let mut signed_headers: Vec<String> = headers.keys().filter(|h| *h != HDR_AUTHORIZATION).cloned().collect();
        signed_headers.sort_unstable();

        let body_sha256 = if options.unsigned_payload {
            UNSIGNED_PAYLOAD.to_string()
        } else {
            sha256_hex(body)
        };

        Ok(Self {
            request_method: method.as_str().to_ascii_uppercase(),
            canonical_path,
            query_parameters,
            headers,
            signed_headers,
            body_sha256,
        })
    }

    /// Replace the set of headers folded into the canonical request. Names are lower-cased,
    /// sorted, and de-duplicated.
    pub fn with_signed_headers<I, S>(mut self, signed_headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut signed_headers: Vec<String> = signed_headers.into_iter().map(|h| h.as_ref().to_ascii_lowercase()).collect();
        signed_headers.sort_unstable();
        signed_headers.dedup();
        self.signed_headers = signed_headers;
        self
    }

    /// Retrieve the HTTP request method.
    #[inline(always)]
    pub fn request_method(&self) -> &str {
        &self.request_method
    }

    /// Retrieve the canonicalized URI path from the request.
    #[inline(always)]
    pub fn canonical_path(&self) -> &str {
        &self.canonical_path
    }

    /// Retrieve the query parameters from the request. Values are normalized to be percent-encoded.
    #[cfg_attr(any(doc, feature = "unstable"), qualifiers(pub))]
    #[cfg_attr(not(any(doc, feature = "unstable")), qualifiers(pub(crate)))]
    #[inline(always)]
    fn query_parameters(&self) -> &HashMap<String, Vec<String>> {
        &self.query_parameters
    }

    /// Retrieve the normalized headers from the request.
    #[cfg_attr(any(doc, feature = "unstable"), qualifiers(pub))]
    #[cfg_attr(not(any(doc, feature = "unstable")), qualifiers(pub(crate)))]
    #[inline(always)]
    fn headers(&self) -> &HashMap<String, Vec<Vec<u8>>> {
        &self.headers
    }

    /// Retrieve the sorted names of the headers included in the canonical request.
    #[inline(always)]
    pub fn signed_headers(&self) -> &[String] {
        &self.signed_headers
    }

    /// Retrieve the payload hash: the hex SHA-256 of the body or `UNSIGNED-PAYLOAD`.
    #[inline(always)]
    pub fn body_sha256(&self) -> &str {
        &self.body_sha256
    }

    /// Get the canonical query string from the request.
    pub fn canonical_query_string(&self) -> String {
        canonicalize_query_to_string(&self.query_parameters)
    }

    /// The names of the headers a signer should sign.
    ///
    /// Headers routinely rewritten in transit (`authorization`, `expect`, `user-agent`,
    /// `x-amzn-trace-id`) are never included. If `headers_to_sign` is given, only those headers
    /// plus `host` and `x-amz-*` are included.
    #[cfg_attr(any(doc, feature = "unstable"), qualifiers(pub))]
    #[cfg_attr(not(any(doc, feature = "unstable")), qualifiers(pub(crate)))]
    fn signable_header_names(&self, headers_to_sign: Option<&[String]>) -> Vec<String> {
        let mut result: Vec<String> = self
            .headers
            .keys()
            .filter(|name| !UNSIGNABLE_HEADERS.contains(&name.as_str()))
            .filter(|name| match headers_to_sign {
                None => true,
                Some(allowed) => {
                    name.as_str() == HDR_HOST
                        || name.starts_with("x-amz-")
                        || allowed.iter().any(|a| a.eq_ignore_ascii_case(name))
                }
            })
            .cloned()
            .collect();
        result.sort_unstable();
        result
    }

    /// Get the [canonical request to hash](https://docs.aws.amazon.com/general/latest/gr/sigv4-create-canonical-request.html)
    /// for the request.
    pub fn canonical_request(&self) -> Vec<u8> {
        self.canonical_request_for(&self.signed_headers)
    }

    /// Get the SHA-256 hash of the [canonical request](https://docs.aws.amazon.com/general/latest/gr/sigv4-create-canonical-request.html).
    pub fn canonical_request_sha256(&self) -> [u8; SHA256_OUTPUT_LEN] {
        sha256(&self.canonical_request())
    }

    fn canonical_request_for(&self, signed_headers: &[String]) -> Vec<u8> {
        let mut result = Vec::with_capacity(1024);
        result.extend(self.request_method.as_bytes());
        result.push(b'\n');
        result.extend(self.canonical_path.as_bytes());
        result.push(b'\n');
        result.extend(self.canonical_query_string().as_bytes());
        result.push(b'\n');

        for header in signed_headers {
            if let Some(values) = self.headers.get(header) {
                result.extend(header.as_bytes());
                result.push(b':');
                result.extend(values.join(&b','));
                result.push(b'\n');
            }
        }

        result.push(b'\n');
        result.extend(signed_headers.join(";").as_bytes());
        result.push(b'\n');
        result.extend(self.body_sha256.as_bytes());

        trace!("Canonical request:\n{}", String::from_utf8_lossy(&result));

        result
    }

    /// Create a [SigV4Authenticator] for the request. This performs steps 5-9 from the AWS Auth
    /// Error Ordering workflow.
    #[cfg_attr(any(doc, feature = "unstable"), qualifiers(pub))]
    #[cfg_attr(not(any(doc, feature = "unstable")), qualifiers(pub(crate)))]
    fn get_authenticator<S>(&self, signed_header_requirements: &S) -> Result<SigV4Authenticator, SignatureError>
    where
        S: SignedHeaderRequirements + ?Sized,
    {
        let auth_params = self.get_auth_parameters(signed_header_requirements)?;
        self.get_authenticator_from_auth_parameters(auth_params)
    }

    /// Create an authenticator based on the provided [`AuthParams`].
    #[cfg_attr(any(doc, feature = "unstable"), qualifiers(pub))]
    #[cfg_attr(not(any(doc, feature = "unstable")), qualifiers(pub(crate)))]
    fn get_authenticator_from_auth_parameters(
        &self,
        auth_params: AuthParams,
    ) -> Result<SigV4Authenticator, SignatureError> {
        // Rule 9: The date must be in ISO 8601 format.
        let timestamp = DateTime::<Utc>::parse_from_iso8601(&auth_params.timestamp_str).map_err(|_| {
            SignatureError::IncompleteSignature(format!(
                "Date must be in ISO-8601 'basic format'. Got '{}'. See http://en.wikipedia.org/wiki/ISO_8601",
                auth_params.timestamp_str
            ))
        })?;

        let mut builder = auth_params.builder;
        builder.request_timestamp(timestamp);
        builder.canonical_request_sha256(sha256(&self.canonical_request_for(&auth_params.signed_headers)));
        builder.signed_headers(auth_params.signed_headers);

        builder.build().map_err(|e| SignatureError::InternalServiceError(Box::new(e)))
    }

    /// Create an [AuthParams] structure from the `Authorization` header and check the signed
    /// header list. This performs steps 5, 6a-6e, and 8 from the AWS Auth Error Ordering workflow.
    #[cfg_attr(any(doc, feature = "unstable"), qualifiers(pub))]
    #[cfg_attr(not(any(doc, feature = "unstable")), qualifiers(pub(crate)))]
    fn get_auth_parameters<S>(&self, signed_header_requirements: &S) -> Result<AuthParams, SignatureError>
    where
        S: SignedHeaderRequirements + ?Sized,
    {
        // Rule 5: The Authorization header must be present. Use the first one (per rule 6a).
        let Some(auth_header) = self.headers.get(HDR_AUTHORIZATION).and_then(|values| values.first()) else {
            debug!("Request has no Authorization header");
            return Err(SignatureError::MissingAuthenticationToken(MSG_REQUEST_MISSING_AUTH_TOKEN.to_string()));
        };

        let params = self.get_auth_parameters_from_auth_header(auth_header)?;

        // Rule 8: SignedHeaders must include "Host" or ":authority".
        if !params.signed_headers.iter().any(|h| h == HDR_HOST || h == ":authority") {
            return Err(SignatureError::SignatureDoesNotMatch(Some(MSG_HOST_AUTHORITY_MUST_BE_SIGNED.to_string())));
        }

        let must_be_signed = |header: &str| {
            SignatureError::SignatureDoesNotMatch(Some(format!(
                "'{}' must be a 'SignedHeader' in the AWS Authorization.",
                header
            )))
        };

        for header in signed_header_requirements.always_present() {
            if !params.signed_headers.contains(&header.to_lowercase()) {
                return Err(must_be_signed(header));
            }
        }

        for header in signed_header_requirements.if_in_request() {
            let header_lower = header.to_lowercase();
            if self.headers.contains_key(&header_lower) && !params.signed_headers.contains(&header_lower) {
                return Err(must_be_signed(header));
            }
        }

        for prefix in signed_header_requirements.prefixes() {
            let prefix_lower = prefix.to_lowercase();
            for http_header in self.headers.keys() {
                if http_header.starts_with(&prefix_lower) && !params.signed_headers.contains(http_header) {
                    return Err(must_be_signed(http_header));
                }
            }
        }

        // A header that was signed but is no longer present cannot match.
        for header in &params.signed_headers {
            if header != ":authority" && !self.headers.contains_key(header) {
                debug!("Signed header '{}' is not present in the request", header);
                return Err(SignatureError::SignatureDoesNotMatch(Some(format!(
                    "'{}' is listed in SignedHeaders but is not present in the request.",
                    header
                ))));
            }
        }

        Ok(params)
    }

    /// Create an [`AuthParams`] structure from the `Authorization` header. This performs steps 6a-6e of the AWS Auth
    /// Error Ordering workflow.
    #[cfg_attr(any(doc, feature = "unstable"), qualifiers(pub))]
    #[cfg_attr(not(any(doc, feature = "unstable")), qualifiers(pub(crate)))]
    fn get_auth_parameters_from_auth_header(&self, auth_header: &[u8]) -> Result<AuthParams, SignatureError> {
        let auth_header = auth_header.trim_ascii();

        // Rule 6a: Make sure the Authorization header starts with "AWS4-HMAC-SHA256".
        let (algorithm, parameters) = match auth_header.iter().position(|c| *c == b' ') {
            Some(pos) => (&auth_header[..pos], &auth_header[pos + 1..]),
            None => (auth_header, &b""[..]),
        };

        if algorithm != AWS4_HMAC_SHA256_BYTES {
            return Err(SignatureError::IncompleteSignature(format!(
                "{}'{}'.",
                MSG_UNSUPPORTED_ALGORITHM,
                latin1_to_string(algorithm)
            )));
        }

        // Split the parameters by commas; trim each one; then split into key=value pairs.
        let mut parameter_map = HashMap::new();
        for parameter in parameters.split(|c| *c == b',').map(<[u8]>::trim_ascii) {
            if parameter.is_empty() {
                continue;
            }

            // Rule 6b: All parameters must be in key=value format.
            let Some(eq) = parameter.iter().position(|c| *c == b'=') else {
                return Err(SignatureError::IncompleteSignature(format!(
                    "'{}' not a valid key=value pair (missing equal-sign) in Authorization header: '{}'",
                    latin1_to_string(parameter),
                    latin1_to_string(auth_header)
                )));
            };

            // Rule 6c: Use the last value for each key; overwriting is ok.
            parameter_map.insert(&parameter[..eq], &parameter[eq + 1..]);
        }

        // Rule 6d: ensure all authorization header parameters/headers are present.
        let mut missing_messages = Vec::new();
        let mut builder = SigV4Authenticator::builder();

        match parameter_map.get(CREDENTIAL) {
            Some(credential) => {
                builder.credential(latin1_to_string(credential));
            }
            None => missing_messages.push(MSG_AUTH_HEADER_REQ_CREDENTIAL),
        }

        match parameter_map.get(SIGNATURE) {
            Some(signature) => {
                builder.signature(latin1_to_string(signature));
            }
            None => missing_messages.push(MSG_AUTH_HEADER_REQ_SIGNATURE),
        }

        let mut signed_headers: Vec<String> = match parameter_map.get(SIGNED_HEADERS) {
            Some(signed_headers) => signed_headers
                .split(|c| *c == b';')
                .filter(|h| !h.is_empty())
                .map(|h| latin1_to_string(h).to_ascii_lowercase())
                .collect(),
            None => {
                missing_messages.push(MSG_AUTH_HEADER_REQ_SIGNED_HEADERS);
                Vec::new()
            }
        };
        signed_headers.sort();

        // Rule 6e: Use the first X-Amz-Date header, falling back to the first Date header.
        let timestamp_str = self
            .headers
            .get(HDR_X_AMZ_DATE)
            .or_else(|| self.headers.get(HDR_DATE))
            .and_then(|values| values.first())
            .map(|date| latin1_to_string(date));

        if timestamp_str.is_none() {
            missing_messages.push(MSG_AUTH_HEADER_REQ_DATE);
        }

        let Some(timestamp_str) = timestamp_str.filter(|_| missing_messages.is_empty()) else {
            return Err(SignatureError::IncompleteSignature(format!(
                "{} Authorization={}",
                missing_messages.join(" "),
                latin1_to_string(algorithm)
            )));
        };

        if let Some(token) = self.headers.get(HDR_X_AMZ_SECURITY_TOKEN).and_then(|values| values.first()) {
            builder.session_token(latin1_to_string(token));
        }

        Ok(AuthParams {
            builder,
            signed_headers,
            timestamp_str,
        })
    }
}

impl Debug for CanonicalRequest {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("CanonicalRequest")
            .field("request_method", &self.request_method)
            .field("canonical_path", &self.canonical_path)
            .field("query_parameters", &self.query_parameters)
            .field("headers", &debug_headers(&self.headers))
            .field("signed_headers", &self.signed_headers)
            .field("body_sha256", &self.body_sha256)
            .finish()
    }
}

/// Trait for informing validation routines indicating which headers must be signed in addition to
/// the standard AWS SigV4 headers.
pub trait SignedHeaderRequirements {
    /// Return the headers that must always be present in SignedHeaders.
    fn always_present(&self) -> &[Cow<'_, str>];

    /// Return the headers that must be present in SignedHeaders if they are present in the request.
    fn if_in_request(&self) -> &[Cow<'_, str>];

    /// Return the prefixes that must be present in SignedHeaders if any headers with that prefix.
    fn prefixes(&self) -> &[Cow<'_, str>];
}

/// Static implementation of [SignedHeaderRequirements] that uses slices of string slices.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SliceSignedHeaderRequirements<'a> {
    always_present: &'a [Cow<'a, str>],
    if_in_request: &'a [Cow<'a, str>],
    prefixes: &'a [Cow<'a, str>],
}

impl<'a> SignedHeaderRequirements for SliceSignedHeaderRequirements<'a> {
    #[inline(always)]
    fn always_present(&self) -> &[Cow<'_, str>] {
        self.always_present
    }

    #[inline(always)]
    fn if_in_request(&self) -> &[Cow<'_, str>] {
        self.if_in_request
    }

    #[inline(always)]
    fn prefixes(&self) -> &[Cow<'_, str>] {
        self.prefixes
    }
}

impl<'a> SliceSignedHeaderRequirements<'a> {
    /// Create a new `SliceSignedHeaderRequirements` structure from the provided data.
    pub const fn new(
        always_present: &'a [Cow<'a, str>],
        if_in_request: &'a [Cow<'a, str>],
        prefixes: &'a [Cow<'a, str>],
    ) -> Self {
        SliceSignedHeaderRequirements {
            always_present,
            if_in_request,
            prefixes,
        }
    }
}

/// SignedHeaderRequirements from constant slices.
pub type ConstSignedHeaderRequirements = SliceSignedHeaderRequirements<'static>;

/// Constant [`SignedHeaderRequirements`] value to use when no additional signed headers are
/// required.
pub const NO_ADDITIONAL_SIGNED_HEADERS: ConstSignedHeaderRequirements =
    ConstSignedHeaderRequirements::new(&[], &[], &[]);

/// `SignedHeaderRequirements` that can be dynamically changed. Names are stored lower-cased.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VecSignedHeaderRequirements {
    always_present: Vec<Cow<'static, str>>,
    if_in_request: Vec<Cow<'static, str>>,
    prefixes: Vec<Cow<'static, str>>,
}

impl SignedHeaderRequirements for VecSignedHeaderRequirements {
    #[inline(always)]
    fn always_present(&self) -> &[Cow<'_, str>] {
        &self.always_present
    }

    #[inline(always)]
    fn if_in_request(&self) -> &[Cow<'_, str>] {
        &self.if_in_request
    }

    #[inline(always)]
    fn prefixes(&self) -> &[Cow<'_, str>] {
        &self.prefixes
    }
}

fn add_unique(list: &mut Vec<Cow<'static, str>>, header: &str) {
    let header = header.to_ascii_lowercase();
    if !list.iter().any(|h| *h == header) {
        list.push(Cow::Owned(header));
    }
}

fn remove_matching(list: &mut Vec<Cow<'static, str>>, header: &str) {
    list.retain(|h| !h.eq_ignore_ascii_case(header));
}

impl VecSignedHeaderRequirements {
    /// Create a new `VecSignedHeaderRequirements` structure from the provided data.
    pub fn new<A, B, C>(always_present: A, if_in_request: B, prefixes: C) -> Self
    where
        A: IntoIterator,
        A::Item: AsRef<str>,
        B: IntoIterator,
        B::Item: AsRef<str>,
        C: IntoIterator,
        C::Item: AsRef<str>,
    {
        let mut result = Self::default();
        always_present.into_iter().for_each(|h| result.add_always_present(h.as_ref()));
        if_in_request.into_iter().for_each(|h| result.add_if_in_request(h.as_ref()));
        prefixes.into_iter().for_each(|p| result.add_prefix(p.as_ref()));
        result
    }

    /// Add a header that must always be present in `SignedHeaders`.
    pub fn add_always_present(&mut self, header: &str) {
        add_unique(&mut self.always_present, header)
    }

    /// Add a header that must be present in `SignedHeaders` if it is present in the request.
    pub fn add_if_in_request(&mut self, header: &str) {
        add_unique(&mut self.if_in_request, header)
    }

    /// Add a prefix that must be present in `SignedHeaders` if any headers with that prefix are
    /// present in the request.
    pub fn add_prefix(&mut self, prefix: &str) {
        add_unique(&mut self.prefixes, prefix)
    }

    /// Remove a header that must always be present in `SignedHeaders`.
    pub fn remove_always_present(&mut self, header: &str) {
        remove_matching(&mut self.always_present, header)
    }

    /// Remove a header that must be present in `SignedHeaders` if it is present in the request.
    pub fn remove_if_in_request(&mut self, header: &str) {
        remove_matching(&mut self.if_in_request, header)
    }

    /// Remove a prefix requirement.
    pub fn remove_prefix(&mut self, prefix: &str) {
        remove_matching(&mut self.prefixes, prefix)
    }
}

/// Indicates whether we are normalizing a URI path element or a query string element. This is used to create the
/// correct error message.
#[cfg_attr(any(doc, feature = "unstable"), qualifiers(pub))]
#[cfg_attr(not(any(doc, feature = "unstable")), qualifiers(pub(crate)))]
#[derive(Clone, Copy, Debug)]
enum UriElement {
    /// URI element represents a path
    Path,

    /// URI element represents a query string
    Query,
}

impl UriElement {
    fn error(self, message: String) -> SignatureError {
        match self {
            // AWS Auth Error Ordering Rule 1.
            Self::Path => SignatureError::InvalidURIPath(message),
            // AWS Auth Error Ordering Rule 4.
            Self::Query => SignatureError::MalformedQueryString(message),
        }
    }
}

/// Convert a [`HashMap`] of normalized query parameters to a string for the canonical request.
/// Parameters are sorted by key, then by value.
#[cfg_attr(any(doc, feature = "unstable"), qualifiers(pub))]
#[cfg_attr(not(any(doc, feature = "unstable")), qualifiers(pub(crate)))]
fn canonicalize_query_to_string(query_parameters: &HashMap<String, Vec<String>>) -> String {
    let mut pairs: Vec<(&str, &str)> = query_parameters
        .iter()
        .flat_map(|(key, values)| values.iter().map(move |value| (key.as_str(), value.as_str())))
        .collect();
    pairs.sort_unstable();

    pairs.iter().map(|(key, value)| format!("{}={}", key, value)).collect::<Vec<_>>().join("&")
}

/// Normalizes the specified URI path. Each segment is percent-encoded; when `normalize` is set,
/// redundant slashes and relative path components are removed as well.
#[cfg_attr(any(doc, feature = "unstable"), qualifiers(pub))]
#[cfg_attr(not(any(doc, feature = "unstable")), qualifiers(pub(crate)))]
fn canonicalize_uri_path(uri_path: &str, normalize: bool) -> Result<String, SignatureError> {
    // Special case: empty path is converted to '/'; also short-circuit the usual '/' path here.
    if uri_path.is_empty() || uri_path == "/" {
        return Ok("/".to_string());
    }

    // All other paths must be abolute.
    if !uri_path.starts_with('/') {
        return Err(SignatureError::InvalidURIPath(format!("Path is not absolute: {}", uri_path)));
    }

    let uri_path = if normalize {
        // Replace double slashes; this makes it easier to handle slashes at the end.
        MULTISLASH.replace_all(uri_path, "/")
    } else {
        Cow::Borrowed(uri_path)
    };

    // Skip the empty element before the leading "/".
    let mut components: Vec<String> = vec![String::new()];
    for segment in uri_path.split('/').skip(1) {
        let component = normalize_uri_path_component(segment)?;

        if normalize && component == "." {
            continue;
        }

        if normalize && component == ".." {
            if components.len() <= 1 {
                return Err(SignatureError::InvalidURIPath(format!(
                    "Relative path entry '..' navigates above root: {}",
                    uri_path
                )));
            }

            components.pop();
            continue;
        }

        components.push(component);
    }

    match components.len() {
        1 => Ok("/".to_string()),
        _ => Ok(components.join("/")),
    }
}

/// Formats HTTP headers in a HashMap suitable for debugging.
#[cfg_attr(any(doc, feature = "unstable"), qualifiers(pub))]
#[cfg_attr(not(any(doc, feature = "unstable")), qualifiers(pub(crate)))]
fn debug_headers(headers: &HashMap<String, Vec<Vec<u8>>>) -> String {
    let mut names: Vec<&String> = headers.keys().collect();
    names.sort_unstable();

    let mut lines = Vec::new();
    for name in names {
        for value in &headers[name] {
            if name == HDR_AUTHORIZATION || name == HDR_X_AMZ_SECURITY_TOKEN {
                lines.push(format!("{}: <redacted>", name));
            } else {
                match std::str::from_utf8(value) {
                    Ok(s) => lines.push(format!("{}: {}", name, s)),
                    Err(_) => lines.push(format!("{}: {:?}", name, value)),
                }
            }
        }
    }

    lines.join("\n")
}

/// Indicates whether the specified byte is RFC3986 unreserved -- i.e., can be represented without being
/// percent-encoded, e.g. '?' -> '%3F'.
#[cfg_attr(any(doc, feature = "unstable"), qualifiers(pub))]
#[cfg_attr(not(any(doc, feature = "unstable")), qualifiers(pub(crate)))]
#[inline(always)]
fn is_rfc3986_unreserved(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'-' || c == b'.' || c == b'_' || c == b'~'
}

/// Convert a Latin-1 slice of bytes to a UTF-8 string.
#[cfg_attr(any(doc, feature = "unstable"), qualifiers(pub))]
#[cfg_attr(not(any(doc, feature = "unstable")), qualifiers(pub(crate)))]
fn latin1_to_string(bytes: &[u8]) -> String {
    bytes.iter().map(|b| *b as char).collect()
}

/// Returns a map of lower-cased header names to their normalized values, in request order.
#[cfg_attr(any(doc, feature = "unstable"), qualifiers(pub))]
#[cfg_attr(not(any(doc, feature = "unstable")), qualifiers(pub(crate)))]
fn normalize_headers(headers: &HeaderMap<HeaderValue>) -> HashMap<String, Vec<Vec<u8>>> {
    let mut result = HashMap::<String, Vec<Vec<u8>>>::new();
    for (key, value) in headers.iter() {
        let key = key.as_str().to_lowercase();
        let value = normalize_header_value(value.as_bytes());
        result.entry(key).or_default().push(value);
    }

    result
}

/// Normalizes a header value by trimming whitespace and collapsing runs of spaces and tabs to a
/// single space.
#[cfg_attr(any(doc, feature = "unstable"), qualifiers(pub))]
#[cfg_attr(not(any(doc, feature = "unstable")), qualifiers(pub(crate)))]
fn normalize_header_value(value: &[u8]) -> Vec<u8> {
    let mut result = Vec::with_capacity(value.len());

    // Treat the start as whitespace so leading blanks are dropped.
    let mut last_was_space = true;

    for c in value {
        if *c == b' ' || *c == b'\t' {
            if !last_was_space {
                result.push(b' ');
                last_was_space = true;
            }
        } else {
            result.push(*c);
            last_was_space = false;
        }
    }

    if result.last() == Some(&b' ') {
        result.pop();
    }

    result
}

/// Normalize a single element (key or value from key=value) of a query string.
#[cfg_attr(any(doc, feature = "unstable"), qualifiers(pub))]
#[cfg_attr(not(any(doc, feature = "unstable")), qualifiers(pub(crate)))]
fn normalize_query_string_element(element: &str) -> Result<String, SignatureError> {
    normalize_uri_element(element, UriElement::Query)
}

/// Normalizes a path element of a URI.
#[cfg_attr(any(doc, feature = "unstable"), qualifiers(pub))]
#[cfg_attr(not(any(doc, feature = "unstable")), qualifiers(pub(crate)))]
fn normalize_uri_path_component(path: &str) -> Result<String, SignatureError> {
    normalize_uri_element(path, UriElement::Path)
}

/// Normalize the URI or query string according to RFC 3986.  This performs the following operations:
/// * Alpha, digit, and the symbols `-`, `.`, `_`, and `~` (unreserved characters) are left alone.
/// * Characters outside this range are percent-encoded.
/// * Percent-encoded values are upper-cased (`%2a` becomes `%2A`)
/// * Percent-encoded values in the unreserved space (`%41`-`%5A`, `%61`-`%7A`, `%30`-`%39`, `%2D`, `%2E`, `%5F`,
///   `%7E`) are converted to normal characters.
/// * In a query string a literal `+` is a space and becomes `%20`. In a path it becomes `%2B`.
///
/// If a percent encoding is incomplete, an error is returned.
#[cfg_attr(any(doc, feature = "unstable"), qualifiers(pub))]
#[cfg_attr(not(any(doc, feature = "unstable")), qualifiers(pub(crate)))]
fn normalize_uri_element(uri_el: &str, uri_el_type: UriElement) -> Result<String, SignatureError> {
    let bytes = uri_el.as_bytes();
    let mut result = String::with_capacity(bytes.len());
    let mut i = 0;

    let push_escaped = |result: &mut String, c: u8| {
        result.push('%');
        result.extend(u8_to_upper_hex(c).iter().map(|h| *h as char));
    };

    while i < bytes.len() {
        let c = bytes[i];

        if is_rfc3986_unreserved(c) {
            result.push(c as char);
            i += 1;
        } else if c == b'%' {
            if i + 3 > bytes.len() {
                // % encoding would go beyond end of string.
                return Err(uri_el_type.error(MSG_INCOMPLETE_TRAILING_ESCAPE.to_string()));
            }

            let hex_digits = &bytes[i + 1..i + 3];
            let mut decoded = [0u8; 1];
            if hex::decode_to_slice(hex_digits, &mut decoded).is_err() {
                return Err(uri_el_type.error(format!(
                    "{}{}{}",
                    MSG_ILLEGAL_HEX_CHAR, hex_digits[0] as char, hex_digits[1] as char
                )));
            }

            if is_rfc3986_unreserved(decoded[0]) {
                result.push(decoded[0] as char);
            } else {
                // Rewrite the hex-escape so it's always upper-cased.
                push_escaped(&mut result, decoded[0]);
            }
            i += 3;
        } else if c == b'+' {
            match uri_el_type {
                UriElement::Path => push_escaped(&mut result, c),
                // Plus-encoded space.
                UriElement::Query => result.push_str("%20"),
            }
            i += 1;
        } else {
            // Character should have been encoded.
            push_escaped(&mut result, c);
            i += 1;
        }
    }

    Ok(result)
}

/// Normalize the query parameters by normalizing the keys and values of each parameter and return a `HashMap` mapping
/// each key to a *vector* of values (since it is valid for a query parameters to appear multiple times).
///
/// The order of the values matches the order that they appeared in the query string.
#[cfg_attr(any(doc, feature = "unstable"), qualifiers(pub))]
#[cfg_attr(not(any(doc, feature = "unstable")), qualifiers(pub(crate)))]
fn query_string_to_normalized_map(query_string: &str) -> Result<HashMap<String, Vec<String>>, SignatureError> {
    let mut result = HashMap::<String, Vec<String>>::new();

    for component in query_string.split('&').filter(|c| !c.is_empty()) {
        let (key, value) = component.split_once('=').unwrap_or((component, ""));
        let norm_key = normalize_query_string_element(key)?;
        let norm_value = normalize_query_string_element(value)?;
        result.entry(norm_key).or_default().push(norm_value);
    }

    Ok(result)
}

/// Convert a byte to uppercase hex representation.
#[cfg_attr(any(doc, feature = "unstable"), qualifiers(pub))]
#[cfg_attr(not(any(doc, feature = "unstable")), qualifiers(pub(crate)))]
#[inline(always)]
const fn u8_to_upper_hex(b: u8) -> [u8; 2] {
    [HEX_DIGITS_UPPER[((b >> 4) & 0xf) as usize], HEX_DIGITS_UPPER[(b & 0xf) as usize]]
}
