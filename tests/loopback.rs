use {
    bytes::Bytes,
    chrono::{DateTime, Duration, NaiveDate, Utc},
    http::request::Request,
    sigv4_loopback::{
        verify, Credentials, DefaultHeaders, Issuer, IssuerKey, IssuerKeyStore, Relay, SignableRequest, SignatureError,
        SignedRequest, Signer, SigningMode, SigningSettings, VecSignedHeaderRequirements, VerificationOutcome, Verifier,
    },
};

const REGION: &str = "test";
const SERVICE: &str = "simulator";

fn timestamp() -> DateTime<Utc> {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap().and_utc()
}

fn signer(mode: SigningMode) -> Signer {
    let settings = SigningSettings::builder().mode(mode).build().unwrap();
    Signer::builder().region(REGION).service(SERVICE).settings(settings).time(timestamp()).build().unwrap()
}

fn credentials() -> Credentials {
    Credentials::new("demo-python:primary", "testkey", None)
}

fn demo_request() -> SignableRequest {
    SignableRequest::new("POST", "http://localhost:8765/validate", [], r#"{"data":"hello world"}"#).unwrap()
}

fn rich_request() -> SignableRequest {
    SignableRequest::new(
        "PUT",
        "http://localhost:8765/buckets/a%20b/./objects?versionId=3&acl&prefix=x%2Fy",
        [
            ("content-type", "application/json"),
            ("x-custom", "  spaced    value "),
            ("x-multi", "one"),
            ("x-multi", "two"),
            ("user-agent", "loopback-tests/1.0"),
        ],
        r#"{"data":"hello world"}"#,
    )
    .unwrap()
}

/// The request as the receiving end sees it.
fn received(signed: SignedRequest) -> SignableRequest {
    SignableRequest::from_http_request(signed.into_http_request()).unwrap()
}

#[test_log::test]
fn signing_is_deterministic() {
    let signer = signer(SigningMode::DoublePass);
    let first = signer.sign_request(&rich_request(), &credentials(), &DefaultHeaders::default()).unwrap();
    let second = signer.sign_request(&rich_request(), &credentials(), &DefaultHeaders::default()).unwrap();
    assert_eq!(first.authorization(), second.authorization());
    assert_eq!(first.headers(), second.headers());
}

#[test_log::test]
fn signed_requests_verify() {
    let token = Credentials::new("demo-python:primary", "testkey", Some("session-token".to_string()));

    for mode in [SigningMode::SinglePass, SigningMode::DoublePass] {
        for creds in [credentials(), token.clone()] {
            for request in [demo_request(), rich_request()] {
                let signed = signer(mode).sign_request(&request, &creds, &DefaultHeaders::default()).unwrap();
                let request = received(signed);
                let outcome = Verifier::new(REGION, SERVICE).verify_request(&request, &creds, timestamp());
                assert!(outcome.is_validated(), "{:?}: {:?}", mode, outcome);
                assert!(verify(&request, &creds, SERVICE, REGION));
            }
        }
    }
}

#[test_log::test]
fn tampering_is_detected() {
    let signed = signer(SigningMode::DoublePass)
        .sign_request(&rich_request(), &credentials(), &DefaultHeaders::default())
        .unwrap();

    let (parts, body) = signed.clone().into_http_request().into_parts();
    let mut flipped = body.to_vec();
    flipped[3] ^= 0x01;
    let tampered = SignableRequest::from_http_request(Request::from_parts(parts, Bytes::from(flipped))).unwrap();
    assert!(!verify(&tampered, &credentials(), SERVICE, REGION));

    let mut tampered = received(signed.clone());
    tampered.headers_mut().insert("x-custom", "another value".parse().unwrap());
    assert!(!verify(&tampered, &credentials(), SERVICE, REGION));

    // Headers outside SignedHeaders may change freely.
    let mut untouched = received(signed);
    untouched.headers_mut().insert("user-agent", "proxy/2.0".parse().unwrap());
    untouched.headers_mut().insert("x-amzn-trace-id", "Root=1-5759e988-bd862e3fe1be46a994272793".parse().unwrap());
    assert!(verify(&untouched, &credentials(), SERVICE, REGION));
}

#[test_log::test]
fn signed_headers_match_request_headers() {
    let signed = signer(SigningMode::SinglePass).sign(&rich_request(), &credentials()).unwrap().into_signed();
    assert_eq!(signed.signed_headers(), &["content-type", "host", "x-amz-date", "x-custom", "x-multi"]);
    assert!(signed.authorization().unwrap().contains(", SignedHeaders=content-type;host;x-amz-date;x-custom;x-multi, "));

    let mut stripped = received(signed);
    stripped.headers_mut().remove("x-custom");
    let outcome = Verifier::new(REGION, SERVICE).verify_request(&stripped, &credentials(), timestamp());
    match outcome {
        VerificationOutcome::Rejected(SignatureError::SignatureDoesNotMatch(_)) => (),
        other => panic!("Expected Rejected(SignatureDoesNotMatch); got {:?}", other),
    }
}

#[test_log::test]
fn double_signing_covers_transport_headers() {
    let required = VecSignedHeaderRequirements::new(Vec::<String>::new(), ["content-length"], Vec::<String>::new());
    let verifier =
        Verifier::builder().region(REGION).service(SERVICE).required_headers(required).build().unwrap();

    let single = signer(SigningMode::SinglePass)
        .sign_request(&demo_request(), &credentials(), &DefaultHeaders::default())
        .unwrap();
    assert_eq!(single.signature(), "5a0dabe0538c9f781ce94a0120f577e869c37834499b055de76337ce02b2ec8f");
    assert_eq!(single.headers()["content-length"], "22");
    let outcome = verifier.verify_request(&received(single), &credentials(), timestamp());
    assert_eq!(outcome.http_status(), 403);

    let double = signer(SigningMode::DoublePass)
        .sign_request(&demo_request(), &credentials(), &DefaultHeaders::default())
        .unwrap();
    assert_eq!(double.signature(), "6964b6e447714bd3098c9db67599318763d5d0fc6dee6c1698dbaf5d1620f1d7");
    assert_eq!(double.signed_headers(), &["content-length", "host", "x-amz-date"]);
    let outcome = verifier.verify_request(&received(double), &credentials(), timestamp());
    assert!(outcome.is_validated(), "{:?}", outcome);
}

#[test_log::test]
fn header_and_query_order_do_not_matter() {
    let signer = signer(SigningMode::SinglePass);
    let sign = |url: &str, headers: Vec<(&'static str, &'static str)>| {
        let request = SignableRequest::new("GET", url, headers, ()).unwrap();
        signer.sign(&request, &credentials()).unwrap().into_signed().signature().to_string()
    };

    let a = sign("http://localhost:8765/list?b=2&a=1&a=0", vec![("x-b", "1"), ("x-a", "2")]);
    let b = sign("http://localhost:8765/list?a=0&b=2&a=1", vec![("x-a", "2"), ("x-b", "1")]);
    let c = sign("http://localhost:8765/list?a=1&a=0&b=2", vec![("X-B", "1"), ("X-A", "2")]);
    assert_eq!(a, b);
    assert_eq!(a, c);

    let d = sign("http://localhost:8765/list?a=0&b=2&a=1", vec![("x-a", "1"), ("x-b", "2")]);
    assert_ne!(a, d);
}

#[test_log::test]
fn plus_in_path_is_a_distinct_resource() {
    let signer = signer(SigningMode::DoublePass);
    let plus = signer
        .sign_request(
            &SignableRequest::new("GET", "http://localhost:8765/files/a+b?q=a+b", [], ()).unwrap(),
            &credentials(),
            &DefaultHeaders::default(),
        )
        .unwrap();
    assert!(verify(&received(plus.clone()), &credentials(), SERVICE, REGION));

    // The same signature presented for the space-encoded path must not validate.
    let (mut parts, body) = plus.into_http_request().into_parts();
    parts.uri = "http://localhost:8765/files/a%20b?q=a+b".parse().unwrap();
    let spaced = SignableRequest::from_http_request(Request::from_parts(parts, body)).unwrap();
    assert!(!verify(&spaced, &credentials(), SERVICE, REGION));
}

#[test_log::test]
fn shared_types_are_send_and_sync() {
    fn assert_send_sync<T: Send + Sync>() {}

    assert_send_sync::<Signer>();
    assert_send_sync::<Verifier>();
    assert_send_sync::<IssuerKeyStore>();
    assert_send_sync::<Credentials>();
    assert_send_sync::<Relay>();
    assert_send_sync::<SignatureError>();
}

#[test_log::test]
fn aws_get_vanilla() {
    let ts = NaiveDate::from_ymd_opt(2015, 8, 30).unwrap().and_hms_opt(12, 36, 0).unwrap().and_utc();
    let creds = Credentials::new("AKIDEXAMPLE", "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY", None);
    let signer = Signer::builder().region("us-east-1").service("service").time(ts).build().unwrap();
    let request = SignableRequest::new("GET", "https://example.amazonaws.com/", [], ()).unwrap();

    let signed = signer.sign(&request, &creds).unwrap().into_signed();
    assert_eq!(
        signed.authorization(),
        Some("AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20150830/us-east-1/service/aws4_request, SignedHeaders=host;x-amz-date, Signature=5fa00fa31553b73ebf1942676e86291e8372ff2a2260956d9b8aae1d763fbf31")
    );

    let verifier = Verifier::new("us-east-1", "service");
    assert!(verifier.verify_request(&received(signed), &creds, ts).is_validated());
}

#[test_log::test(tokio::test)]
async fn issuer_store() {
    let mut store = IssuerKeyStore::new([
        Issuer::builder().name("demo-python").key(IssuerKey::new("primary", "testkey")).build().unwrap(),
        Issuer::builder()
            .name("demo-java")
            .key(IssuerKey::new("primary", "testkey"))
            .timeout(Duration::minutes(5))
            .build()
            .unwrap(),
        Issuer::builder().name("demo-js").enabled(false).key(IssuerKey::new("primary", "testkey")).build().unwrap(),
    ]);
    let verifier = Verifier::new(REGION, SERVICE);
    let signer = signer(SigningMode::DoublePass);

    let sign_as = |access_key: &str| {
        let creds = Credentials::new(access_key, "testkey", None);
        received(signer.sign_request(&demo_request(), &creds, &DefaultHeaders::default()).unwrap())
    };

    let outcome = verifier.validate_request(&sign_as("demo-python:primary"), &mut store, timestamp()).await;
    assert_eq!(outcome.response().unwrap().issuer(), Some("demo-python"));

    for access_key in ["demo-js:primary", "demo-python:secondary", "nobody:primary"] {
        let outcome = verifier.validate_request(&sign_as(access_key), &mut store, timestamp()).await;
        match outcome {
            VerificationOutcome::Rejected(SignatureError::InvalidClientTokenId(_)) => (),
            other => panic!("{}: expected Rejected(InvalidClientTokenId); got {:?}", access_key, other),
        }
    }

    let fresh = timestamp() + Duration::minutes(4);
    let stale = timestamp() + Duration::minutes(6);
    assert!(verifier.validate_request(&sign_as("demo-java:primary"), &mut store, fresh).await.is_validated());
    let outcome = verifier.validate_request(&sign_as("demo-java:primary"), &mut store, stale).await;
    let message = outcome.error().unwrap().to_string();
    assert!(message.starts_with("Signature expired: 20240101T000000Z is now earlier than 20240101T000100Z"), "{}", message);

    // Issuers without a timeout accept old signatures when no freshness window is configured.
    assert!(verifier.validate_request(&sign_as("demo-python:primary"), &mut store, stale).await.is_validated());
}
