//! Signing credentials and the issuer-keyed signing key store.
use {
    crate::{
        constants::*, GetSigningKeyRequest, GetSigningKeyResponse, KSecretKey, SignatureError,
    },
    chrono::Duration,
    derive_builder::Builder,
    log::debug,
    std::{
        collections::HashMap,
        fmt::{Debug, Formatter, Result as FmtResult},
        future::{ready, Ready},
        task::{Context, Poll},
    },
    tower::{BoxError, Service},
};

/// AWS credentials used to sign a request.
///
/// Credentials are immutable. The secret key and session token are never printed by the
/// [`Debug`] implementation.
#[derive(Builder, Clone, Eq, PartialEq)]
pub struct Credentials {
    /// The access key id.
    #[builder(setter(into))]
    access_key_id: String,

    /// The secret access key.
    #[builder(setter(into))]
    secret_key: String,

    /// The session token for temporary credentials.
    #[builder(setter(into, strip_option), default)]
    session_token: Option<String>,
}

impl Credentials {
    /// Create a new set of credentials.
    pub fn new(access_key_id: impl Into<String>, secret_key: impl Into<String>, session_token: Option<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_key: secret_key.into(),
            session_token,
        }
    }

    /// Create a [CredentialsBuilder] to construct a [Credentials].
    #[inline]
    pub fn builder() -> CredentialsBuilder {
        CredentialsBuilder::default()
    }

    /// Retrieve the access key id.
    #[inline]
    pub fn access_key_id(&self) -> &str {
        &self.access_key_id
    }

    /// Retrieve the secret access key.
    #[inline]
    pub fn secret_key(&self) -> &str {
        &self.secret_key
    }

    /// Retrieve the session token, if any.
    #[inline]
    pub fn session_token(&self) -> Option<&str> {
        self.session_token.as_deref()
    }
}

impl Debug for Credentials {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_key", &"<redacted>")
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// One key belonging to an [Issuer].
#[derive(Clone, Eq, PartialEq)]
pub struct IssuerKey {
    kid: String,
    secret: String,
}

impl IssuerKey {
    /// Create a new key with the given key id and secret.
    pub fn new(kid: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            kid: kid.into(),
            secret: secret.into(),
        }
    }

    /// Retrieve the key id.
    #[inline]
    pub fn kid(&self) -> &str {
        &self.kid
    }
}

impl Debug for IssuerKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("IssuerKey").field("kid", &self.kid).finish_non_exhaustive()
    }
}

/// A named client allowed to call the verifying endpoint.
///
/// The access key for each of an issuer's keys is `issuer:kid`.
#[derive(Builder, Clone, Debug)]
pub struct Issuer {
    /// The issuer name.
    #[builder(setter(into))]
    name: String,

    /// Disabled issuers contribute no keys.
    #[builder(default = "true")]
    enabled: bool,

    /// Maximum age of a signature made by this issuer.
    #[builder(setter(strip_option), default)]
    timeout: Option<Duration>,

    /// The issuer's keys.
    #[builder(setter(each(name = "key")), default)]
    keys: Vec<IssuerKey>,
}

impl Issuer {
    /// Create an [IssuerBuilder] to construct an [Issuer].
    #[inline]
    pub fn builder() -> IssuerBuilder {
        IssuerBuilder::default()
    }

    /// Retrieve the issuer name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Indicates whether the issuer is enabled.
    #[inline]
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Retrieve the maximum signature age for this issuer.
    #[inline]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Retrieve the issuer's keys.
    #[inline]
    pub fn keys(&self) -> &[IssuerKey] {
        &self.keys
    }

    /// Credentials for signing as this issuer with the key `kid`.
    pub fn credentials(&self, kid: &str) -> Option<Credentials> {
        self.keys
            .iter()
            .find(|k| k.kid == kid)
            .map(|k| Credentials::new(format!("{}:{}", self.name, k.kid), k.secret.clone(), None))
    }
}

#[derive(Clone)]
struct IssuerEntry {
    issuer: String,
    secret: String,
    timeout: Option<Duration>,
}

/// Resolves `issuer:kid` access keys into signing keys.
///
/// This implements [`Service<GetSigningKeyRequest>`] so it can be handed directly to
/// [`sigv4_validate_request`][crate::sigv4_validate_request].
#[derive(Clone, Default)]
pub struct IssuerKeyStore {
    keys: HashMap<String, IssuerEntry>,
}

impl IssuerKeyStore {
    /// Build a key store from a set of issuers. Keys of disabled issuers are skipped.
    pub fn new<I>(issuers: I) -> Self
    where
        I: IntoIterator<Item = Issuer>,
    {
        let mut keys = HashMap::new();

        for issuer in issuers {
            if !issuer.enabled {
                debug!("Skipping disabled issuer {}", issuer.name);
                continue;
            }

            for key in issuer.keys {
                keys.insert(
                    format!("{}:{}", issuer.name, key.kid),
                    IssuerEntry {
                        issuer: issuer.name.clone(),
                        secret: key.secret,
                        timeout: issuer.timeout,
                    },
                );
            }
        }

        Self {
            keys,
        }
    }

    /// Returns the number of access keys known to the store.
    #[inline]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Indicates whether the store has no access keys.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Retrieve the credentials for an `issuer:kid` access key.
    pub fn credentials(&self, access_key: &str) -> Option<Credentials> {
        self.keys.get(access_key).map(|entry| Credentials::new(access_key, entry.secret.clone(), None))
    }

    /// Derive the signing key for a request.
    pub fn get_signing_key(&self, req: &GetSigningKeyRequest) -> Result<GetSigningKeyResponse, SignatureError> {
        let Some(entry) = self.keys.get(req.access_key()) else {
            debug!("Access key {} not found in issuer key store", req.access_key());
            return Err(SignatureError::InvalidClientTokenId(MSG_UNKNOWN_ACCESS_KEY.to_string()));
        };

        let signing_key = KSecretKey::from(entry.secret.as_str()).to_ksigning(
            req.request_date(),
            req.region(),
            req.service(),
        );

        Ok(GetSigningKeyResponse {
            signing_key,
            issuer: Some(entry.issuer.clone()),
            max_age: entry.timeout,
        })
    }
}

impl Debug for IssuerKeyStore {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let mut access_keys: Vec<&String> = self.keys.keys().collect();
        access_keys.sort();
        f.debug_struct("IssuerKeyStore").field("access_keys", &access_keys).finish()
    }
}

impl Service<GetSigningKeyRequest> for IssuerKeyStore {
    type Response = GetSigningKeyResponse;
    type Error = BoxError;
    type Future = Ready<Result<GetSigningKeyResponse, BoxError>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), BoxError>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: GetSigningKeyRequest) -> Self::Future {
        ready(self.get_signing_key(&req).map_err(|e| Box::new(e) as BoxError))
    }
}

#[cfg(test)]
mod tests {
    use {
        super::{Credentials, Issuer, IssuerKey, IssuerKeyStore},
        crate::{derive_signing_key, GetSigningKeyRequest, SignatureError, SigningScope},
        chrono::{Duration, NaiveDate},
        tower::ServiceExt,
    };

    fn issuers() -> Vec<Issuer> {
        vec![
            Issuer::builder()
                .name("demo-python")
                .key(IssuerKey::new("primary", "testkey"))
                .key(IssuerKey::new("secondary", "otherkey"))
                .timeout(Duration::minutes(5))
                .build()
                .unwrap(),
            Issuer::builder().name("retired").enabled(false).key(IssuerKey::new("primary", "oldkey")).build().unwrap(),
        ]
    }

    fn gsk_request(access_key: &str) -> GetSigningKeyRequest {
        GetSigningKeyRequest::builder()
            .access_key(access_key)
            .request_date(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap())
            .region("test")
            .service("simulator")
            .build()
            .unwrap()
    }

    #[test_log::test]
    fn test_credentials_debug_redacts() {
        let creds = Credentials::builder()
            .access_key_id("AKIDEXAMPLE")
            .secret_key("wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY")
            .session_token("session-token")
            .build()
            .unwrap();
        let debugged = format!("{:?}", creds);
        assert!(debugged.contains("AKIDEXAMPLE"));
        assert!(!debugged.contains("wJalrXUtnFEMI"));
        assert!(!debugged.contains("session-token"));
        assert_eq!(creds.session_token(), Some("session-token"));
        assert_eq!(creds, Credentials::new("AKIDEXAMPLE", "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY", Some("session-token".into())));
    }

    #[test_log::test]
    fn test_store_skips_disabled_issuers() {
        let store = IssuerKeyStore::new(issuers());
        assert_eq!(store.len(), 2);
        assert!(!store.is_empty());
        assert!(store.credentials("demo-python:primary").is_some());
        assert!(store.credentials("retired:primary").is_none());
        assert_eq!(format!("{:?}", store), r#"IssuerKeyStore { access_keys: ["demo-python:primary", "demo-python:secondary"] }"#);

        let e = store.get_signing_key(&gsk_request("retired:primary")).unwrap_err();
        assert!(matches!(e, SignatureError::InvalidClientTokenId(_)));
        let e = store.get_signing_key(&gsk_request("demo-python:tertiary")).unwrap_err();
        assert_eq!(e.to_string(), "The access key provided does not exist in our records.");
    }

    #[test_log::test]
    fn test_issuer_credentials() {
        let issuer = &issuers()[0];
        let creds = issuer.credentials("primary").unwrap();
        assert_eq!(creds.access_key_id(), "demo-python:primary");
        assert_eq!(creds.secret_key(), "testkey");
        assert!(issuer.credentials("missing").is_none());
        assert!(!format!("{:?}", issuer).contains("testkey"));
    }

    #[test_log::test(tokio::test)]
    async fn test_store_as_service() {
        let store = IssuerKeyStore::new(issuers());
        let response = store.clone().oneshot(gsk_request("demo-python:primary")).await.unwrap();
        let scope = SigningScope::new(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(), "test", "simulator");
        assert_eq!(response.signing_key(), &derive_signing_key("testkey", &scope));
        assert_eq!(response.issuer(), Some("demo-python"));
        assert_eq!(response.max_age(), Some(Duration::minutes(5)));

        let e = store.oneshot(gsk_request("nobody:primary")).await.unwrap_err();
        let e = e.downcast::<SignatureError>().unwrap();
        assert!(matches!(*e, SignatureError::InvalidClientTokenId(_)));
    }
}
