//! Validate an incoming request and re-sign it for forwarding.
use {
    crate::{
        auth::SigV4AuthenticatorResponse, constants::*, Credentials, GetSigningKeyRequest, GetSigningKeyResponse,
        SignableRequest, SignatureError, SignedRequest, Signer, VerificationOutcome, Verifier,
    },
    chrono::{DateTime, Utc},
    derive_builder::Builder,
    http::header::{HeaderMap, HeaderName},
    log::debug,
    std::future::Future,
    tower::{BoxError, Service},
};

/// Headers the relay always replaces when it re-signs.
const RESIGNED_HEADERS: [&str; 4] = [HDR_AUTHORIZATION, HDR_X_AMZ_CONTENT_SHA256, HDR_X_AMZ_DATE, HDR_X_AMZ_SECURITY_TOKEN];

/// What the relay did with a request.
#[derive(Debug)]
pub enum RelayOutcome {
    /// The request was validated and re-signed with the relay's credentials.
    Forward {
        /// The caller's validated identity.
        validation: SigV4AuthenticatorResponse,

        /// The re-signed request.
        request: SignedRequest,
    },

    /// The request was not validated and has not been re-signed.
    Refused(VerificationOutcome),
}

/// Validates requests with a [`Verifier`] and re-signs the good ones with its own [`Signer`] and
/// [`Credentials`].
///
/// The forwarded request carries only the headers the caller signed, the configured
/// `headers_to_sign` taken from the incoming request, and the configured `add_headers`.
#[derive(Builder, Clone, Debug)]
pub struct Relay {
    /// Checks incoming requests.
    verifier: Verifier,

    /// Signs forwarded requests.
    signer: Signer,

    /// The relay's own credentials.
    credentials: Credentials,

    /// Incoming headers to forward even if the caller did not sign them.
    #[builder(default)]
    headers_to_sign: Vec<String>,

    /// Headers added to every forwarded request.
    #[builder(default)]
    add_headers: HeaderMap,
}

impl Relay {
    /// Create a [RelayBuilder] to construct a [Relay].
    #[inline]
    pub fn builder() -> RelayBuilder {
        RelayBuilder::default()
    }

    /// Validate a request signed with `caller` and re-sign it.
    ///
    /// # Errors
    /// Only re-signing can fail; a request that does not validate yields
    /// [`RelayOutcome::Refused`].
    pub fn relay(
        &self,
        request: &SignableRequest,
        caller: &Credentials,
        server_timestamp: DateTime<Utc>,
    ) -> Result<RelayOutcome, SignatureError> {
        let outcome = self.verifier.verify_request(request, caller, server_timestamp);
        self.forward_validated(request, outcome)
    }

    /// Validate a request, resolving the caller's signing key through `get_signing_key`, and
    /// re-sign it.
    pub async fn relay_with<G, F>(
        &self,
        request: &SignableRequest,
        get_signing_key: &mut G,
        server_timestamp: DateTime<Utc>,
    ) -> Result<RelayOutcome, SignatureError>
    where
        G: Service<GetSigningKeyRequest, Response = GetSigningKeyResponse, Error = BoxError, Future = F> + Send,
        F: Future<Output = Result<GetSigningKeyResponse, BoxError>> + Send,
    {
        let outcome = self.verifier.validate_request(request, get_signing_key, server_timestamp).await;
        self.forward_validated(request, outcome)
    }

    fn forward_validated(
        &self,
        request: &SignableRequest,
        outcome: VerificationOutcome,
    ) -> Result<RelayOutcome, SignatureError> {
        let VerificationOutcome::Validated(validation) = outcome else {
            debug!("Refusing to relay request: {}", outcome.http_status());
            return Ok(RelayOutcome::Refused(outcome));
        };

        let outgoing = self.outgoing(request, &validation);
        let signed = self.signer.sign(&outgoing, &self.credentials)?.into_signed();
        debug!("Relaying request from {} as {}", validation.access_key(), self.credentials.access_key_id());

        Ok(RelayOutcome::Forward {
            validation,
            request: signed,
        })
    }

    fn outgoing(&self, request: &SignableRequest, validation: &SigV4AuthenticatorResponse) -> SignableRequest {
        let keep = |name: &HeaderName| {
            let name = name.as_str();
            !RESIGNED_HEADERS.contains(&name)
                && (validation.signed_headers().iter().any(|h| h == name)
                    || self.headers_to_sign.iter().any(|h| h.eq_ignore_ascii_case(name)))
        };

        let mut headers = HeaderMap::new();
        for (name, value) in request.headers().iter().filter(|(name, _)| keep(name)) {
            headers.append(name.clone(), value.clone());
        }

        for name in self.add_headers.keys() {
            headers.remove(name);
        }
        for (name, value) in &self.add_headers {
            headers.append(name.clone(), value.clone());
        }

        SignableRequest {
            method: request.method.clone(),
            uri: request.uri.clone(),
            headers,
            body: request.body.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use {
        super::{Relay, RelayOutcome},
        crate::{
            Credentials, Issuer, IssuerKey, IssuerKeyStore, SignableRequest, SignatureError, Signer, SigningSettings,
            VerificationOutcome, Verifier,
        },
        bytes::Bytes,
        chrono::{DateTime, NaiveDate, Utc},
        http::header::{HeaderMap, HeaderName, HeaderValue},
    };

    fn timestamp() -> DateTime<Utc> {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap().and_utc()
    }

    fn caller() -> Credentials {
        Credentials::new("demo-python:primary", "testkey", None)
    }

    fn relay() -> Relay {
        let mut add_headers = HeaderMap::new();
        add_headers.insert(HeaderName::from_static("x-service-header-to-sign"), HeaderValue::from_static("Service"));

        Relay::builder()
            .verifier(Verifier::new("test", "simulator"))
            .signer(Signer::builder().region("test").service("simulator").time(timestamp()).build().unwrap())
            .credentials(Credentials::new("relay:primary", "relaykey", None))
            .headers_to_sign(vec!["X-Trace".to_string()])
            .add_headers(add_headers)
            .build()
            .unwrap()
    }

    /// A request signed by the caller over `content-type` only, carrying two unsigned headers.
    fn signed_by_caller() -> SignableRequest {
        let request = SignableRequest::new(
            "POST",
            "http://localhost:8765/validateAndSign",
            [("content-type", "application/json"), ("user-agent", "demo/1.0"), ("x-trace", "abc")],
            r#"{"data":"hello world"}"#,
        )
        .unwrap();
        let settings = SigningSettings::builder().headers_to_sign(vec!["content-type".to_string()]).build().unwrap();
        let signer =
            Signer::builder().region("test").service("simulator").settings(settings).time(timestamp()).build().unwrap();
        let creds = caller();
        let signed = signer.sign(&request, &creds).unwrap().into_signed();
        assert_eq!(signed.signed_headers(), &["content-type", "host", "x-amz-date"]);
        SignableRequest::from_http_request(signed.into_http_request()).unwrap()
    }

    fn expect_forward(outcome: RelayOutcome) -> (crate::SigV4AuthenticatorResponse, crate::SignedRequest) {
        match outcome {
            RelayOutcome::Forward {
                validation,
                request,
            } => (validation, request),
            RelayOutcome::Refused(outcome) => panic!("Expected Forward; got Refused({:?})", outcome),
        }
    }

    #[test_log::test]
    fn test_relay_resigns() {
        let (validation, forwarded) = expect_forward(relay().relay(&signed_by_caller(), &caller(), timestamp()).unwrap());
        assert_eq!(validation.access_key(), "demo-python:primary");

        assert_eq!(
            forwarded.signed_headers(),
            &["content-type", "host", "x-amz-date", "x-service-header-to-sign", "x-trace"]
        );
        assert!(forwarded
            .authorization()
            .unwrap()
            .starts_with("AWS4-HMAC-SHA256 Credential=relay:primary/20240101/test/simulator/aws4_request, "));
        assert!(forwarded.headers().get("user-agent").is_none());
        assert_eq!(forwarded.headers().get("x-service-header-to-sign").unwrap(), "Service");
        assert_eq!(forwarded.body(), &Bytes::from_static(br#"{"data":"hello world"}"#));

        let received = SignableRequest::from_http_request(forwarded.into_http_request()).unwrap();
        let verifier = Verifier::new("test", "simulator");
        let relay_creds = Credentials::new("relay:primary", "relaykey", None);
        assert!(verifier.verify_request(&received, &relay_creds, timestamp()).is_validated());
        assert!(!verifier.verify_request(&received, &caller(), timestamp()).is_validated());
    }

    #[test_log::test]
    fn test_relay_refuses() {
        let mut request = signed_by_caller();
        request.body = Bytes::from_static(br#"{"data":"tampered"}"#);

        match relay().relay(&request, &caller(), timestamp()).unwrap() {
            RelayOutcome::Refused(VerificationOutcome::Rejected(SignatureError::SignatureDoesNotMatch(_))) => (),
            other => panic!("Expected Refused(Rejected); got {:?}", other),
        }

        let unsigned = SignableRequest::new("GET", "http://localhost:8765/", [("host", "localhost:8765")], ()).unwrap();
        match relay().relay(&unsigned, &caller(), timestamp()).unwrap() {
            RelayOutcome::Refused(outcome @ VerificationOutcome::Malformed(_)) => {
                assert_eq!(outcome.http_status(), 400)
            }
            other => panic!("Expected Refused(Malformed); got {:?}", other),
        }
    }

    #[test_log::test(tokio::test)]
    async fn test_relay_with_issuer_store() {
        let mut store = IssuerKeyStore::new([
            Issuer::builder().name("demo-python").key(IssuerKey::new("primary", "testkey")).build().unwrap()
        ]);
        let outcome = relay().relay_with(&signed_by_caller(), &mut store, timestamp()).await.unwrap();
        let (validation, _) = expect_forward(outcome);
        assert_eq!(validation.issuer(), Some("demo-python"));

        let mut empty = IssuerKeyStore::default();
        match relay().relay_with(&signed_by_caller(), &mut empty, timestamp()).await.unwrap() {
            RelayOutcome::Refused(VerificationOutcome::Rejected(SignatureError::InvalidClientTokenId(_))) => (),
            other => panic!("Expected Refused(Rejected); got {:?}", other),
        }
    }
}
