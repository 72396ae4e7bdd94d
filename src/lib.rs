//! The `sigv4_loopback` crate signs HTTP requests with AWS Signature Version 4 and verifies them
//! again, for services that run their own ecosystem of AWS-like credentials.
//!
//! Signing and verification share one canonicalization pipeline, so anything this crate signs
//! verifies with the same secret.
//!
//! # Double signing
//! HTTP clients commonly add headers such as `Content-Length` while preparing a request for the
//! wire. A [`Signer`] in the default [`SigningMode::DoublePass`] signs the request, lets the
//! transport prepare it through a [`PrepareRequest`] implementation, and signs it once more with
//! the same timestamp. The final signature covers every header that is actually transmitted.
//!
//! # Verification
//! A [`Verifier`] checks an incoming request against known [`Credentials`], or against a
//! [`tower::Service`] that resolves signing keys such as the [`IssuerKeyStore`]. The result is a
//! [`VerificationOutcome`]: validated, rejected (HTTP 403), or malformed (HTTP 400).
//!
//! ## Example
//! ```rust
//! use chrono::NaiveDate;
//! use sigv4_loopback::{
//!     Credentials, DefaultHeaders, SignableRequest, Signer, SigningMode, SigningSettings, Verifier,
//! };
//!
//! let timestamp = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap().and_utc();
//! let credentials = Credentials::new("demo-python:primary", "testkey", None);
//! let request = SignableRequest::new(
//!     "POST",
//!     "http://localhost:8765/validate",
//!     [],
//!     r#"{"data":"hello world"}"#,
//! )
//! .unwrap();
//!
//! let signer = Signer::builder().region("test").service("simulator").time(timestamp).build().unwrap();
//! let signed = signer.sign_request(&request, &credentials, &DefaultHeaders::default()).unwrap();
//! assert_eq!(signed.signed_headers(), &["content-length", "host", "x-amz-date"]);
//! assert_eq!(signed.signature(), "6964b6e447714bd3098c9db67599318763d5d0fc6dee6c1698dbaf5d1620f1d7");
//!
//! let received = SignableRequest::from_http_request(signed.into_http_request()).unwrap();
//! let verifier = Verifier::new("test", "simulator");
//! assert!(verifier.verify_request(&received, &credentials, timestamp).is_validated());
//!
//! // Signing once, before the transport adds Content-Length, produces the classic signature.
//! let settings = SigningSettings::builder().mode(SigningMode::SinglePass).build().unwrap();
//! let signer =
//!     Signer::builder().region("test").service("simulator").settings(settings).time(timestamp).build().unwrap();
//! let signed = signer.sign(&request, &credentials).unwrap().into_signed();
//! assert_eq!(signed.signature(), "5a0dabe0538c9f781ce94a0120f577e869c37834499b055de76337ce02b2ec8f");
//! ```
#![warn(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![warn(rustdoc::missing_crate_level_docs)]

mod auth;
mod body;
mod canonical;
mod chronoutil;
mod constants;
mod credentials;
mod crypto;
mod error;
mod reconcile;
mod relay;
mod request;
mod signature;
mod signer;
mod signing_key;

pub use crate::{
    auth::{SigV4AuthenticatorResponse, SigV4AuthenticatorResponseBuilder},
    body::{IntoRequestBytes, ReaderBody},
    canonical::{
        CanonicalOptions, CanonicalRequest, ConstSignedHeaderRequirements, SignedHeaderRequirements,
        SliceSignedHeaderRequirements, VecSignedHeaderRequirements, NO_ADDITIONAL_SIGNED_HEADERS,
    },
    credentials::{Credentials, CredentialsBuilder, Issuer, IssuerBuilder, IssuerKey, IssuerKeyStore},
    error::{ErrorKind, SignatureError},
    reconcile::{
        DefaultHeaders, DefaultHeadersBuilder, NoPreparation, PrepareRequest, Reconciled, SignedOnce, SigningMode,
    },
    relay::{Relay, RelayBuilder, RelayOutcome},
    request::{SignableRequest, SignedRequest},
    signature::{
        sigv4_validate_request, verify, VerificationOutcome, Verifier, VerifierBuilder, ALLOWED_MISMATCH_MINUTES,
    },
    signer::{assemble, sign, string_to_sign, Signer, SignerBuilder, SigningSettings, SigningSettingsBuilder},
    signing_key::{
        derive_signing_key, service_for_signing_key_fn, GetSigningKeyRequest, GetSigningKeyRequestBuilder,
        GetSigningKeyResponse, GetSigningKeyResponseBuilder, KDateKey, KRegionKey, KSecretKey, KServiceKey,
        KSigningKey, SigningScope,
    },
};

#[cfg(any(doc, feature = "unstable"))]
pub use crate::{
    auth::SigV4Authenticator,
    canonical::{
        canonicalize_query_to_string, canonicalize_uri_path, is_rfc3986_unreserved, normalize_header_value,
        normalize_query_string_element, normalize_uri_path_component, query_string_to_normalized_map,
    },
};
