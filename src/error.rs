use {
    crate::constants::*,
    http::status::StatusCode,
    scratchstack_errors::ServiceError,
    std::{
        error::Error,
        fmt::{Display, Formatter, Result as FmtResult},
        io::Error as IOError,
    },
};

/// The stage of the signing pipeline that produced a [SignatureError].
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ErrorKind {
    /// The request could not be turned into a canonical request.
    Canonicalization,

    /// The request changed between the two signing passes.
    Reconciliation,

    /// The request is signed, but the signature could not be verified.
    Verification,

    /// An I/O or key provider failure unrelated to the request contents.
    Internal,
}

/// Error returned when an attempt at signing a request or validating an AWS SigV4 signature fails.
#[derive(Debug)]
#[non_exhaustive]
pub enum SignatureError {
    /// Validation failed due to an underlying I/O error.
    IO(IOError),

    /// Validation failed due to an internal service error.
    InternalServiceError(Box<dyn Error + Send + Sync>),

    /// The AWS access key provided does not exist in our records.
    InvalidClientTokenId(/* message */ String),

    /// Invalid request method.
    InvalidRequestMethod(/* message */ String),

    /// The request signature does not conform to AWS standards. Sample messages:
    /// `Authorization header requires 'Credential' parameter. Authorization=...`
    /// `Authorization header requires existence of either a 'X-Amz-Date' or a 'Date' header.`
    /// `Date must be in ISO-8601 'basic format'. Got '...'. See http://en.wikipedia.org/wiki/ISO_8601`
    /// `Unsupported AWS 'algorithm': 'AWS4-HMAC-SHA512'`
    IncompleteSignature(/* message */ String),

    /// The URI path includes invalid components. This can be a malformed hex encoding (e.g. `%0J`), a non-absolute
    /// URI path (`foo/bar`), or a URI path that attempts to navigate above the root (`/x/../../../y`).
    InvalidURIPath(/* message */ String),

    /// A header was malformed -- the name or value is not a legal HTTP header; the header was empty and this is not
    /// allowed (e.g. an `authorization` header); or the header could not be parsed (e.g., the `x-amz-date` header
    /// is not a valid date).
    MalformedHeader(/* message */ String),

    /// A query parameter was malformed -- the value could not be decoded as UTF-8 or contains an invalid escape.
    ///
    /// `Incomplete trailing escape % sequence`
    MalformedQueryString(/* message */ String),

    /// The request must contain a valid (registered) AWS access key ID. Sample messages:
    /// `Request is missing Authentication Token`
    MissingAuthenticationToken(/* message */ String),

    /// The method, URI, or body of a request changed between the first and second signing passes.
    ReconciliationMismatch(/* message */ String),

    /// Signature did not match the calculated signature value.
    /// Example messages:
    /// `The request signature we calculated does not match the signature you provided. Check your AWS Secret Access Key and signing method. Consult the service documentation for details.`
    /// `Signature expired: 20210502T144040Z is now earlier than 20210502T173143Z (20210502T174643Z - 15 min.)`
    /// `Signature not yet current: 20210502T183640Z is still later than 20210502T175140Z (20210502T173640Z + 15 min.)`
    SignatureDoesNotMatch(Option</* message */ String>),

    /// The request body could not be read (or re-read) for hashing.
    UnreadableBody(/* message */ String),
}

impl SignatureError {
    /// Returns the pipeline stage this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidRequestMethod(_)
            | Self::InvalidURIPath(_)
            | Self::MalformedHeader(_)
            | Self::MalformedQueryString(_)
            | Self::UnreadableBody(_) => ErrorKind::Canonicalization,
            Self::ReconciliationMismatch(_) => ErrorKind::Reconciliation,
            Self::IncompleteSignature(_)
            | Self::InvalidClientTokenId(_)
            | Self::MissingAuthenticationToken(_)
            | Self::SignatureDoesNotMatch(_) => ErrorKind::Verification,
            Self::IO(_) | Self::InternalServiceError(_) => ErrorKind::Internal,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            Self::IO(_) | Self::InternalServiceError(_) => ERR_CODE_INTERNAL_FAILURE,
            Self::InvalidClientTokenId(_) => ERR_CODE_INVALID_CLIENT_TOKEN_ID,
            Self::InvalidRequestMethod(_) => ERR_CODE_INVALID_REQUEST_METHOD,
            Self::IncompleteSignature(_) => ERR_CODE_INCOMPLETE_SIGNATURE,
            Self::InvalidURIPath(_) => ERR_CODE_INVALID_URI_PATH,
            Self::MalformedHeader(_) => ERR_CODE_MALFORMED_HEADER,
            Self::MalformedQueryString(_) => ERR_CODE_MALFORMED_QUERY_STRING,
            Self::MissingAuthenticationToken(_) => ERR_CODE_MISSING_AUTHENTICATION_TOKEN,
            Self::ReconciliationMismatch(_) => ERR_CODE_RECONCILIATION_MISMATCH,
            Self::SignatureDoesNotMatch(_) => ERR_CODE_SIGNATURE_DOES_NOT_MATCH,
            Self::UnreadableBody(_) => ERR_CODE_UNREADABLE_BODY,
        }
    }

    fn http_status(&self) -> StatusCode {
        match self {
            Self::IncompleteSignature(_)
            | Self::InvalidRequestMethod(_)
            | Self::InvalidURIPath(_)
            | Self::MalformedHeader(_)
            | Self::MalformedQueryString(_)
            | Self::MissingAuthenticationToken(_)
            | Self::UnreadableBody(_) => StatusCode::BAD_REQUEST,
            Self::IO(_) | Self::InternalServiceError(_) | Self::ReconciliationMismatch(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::InvalidClientTokenId(_) | Self::SignatureDoesNotMatch(_) => StatusCode::FORBIDDEN,
        }
    }
}

impl ServiceError for SignatureError {
    fn error_code(&self) -> &'static str {
        SignatureError::error_code(self)
    }

    fn http_status(&self) -> StatusCode {
        SignatureError::http_status(self)
    }
}

impl Display for SignatureError {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        match self {
            Self::IO(ref e) => Display::fmt(e, f),
            Self::InternalServiceError(ref e) => Display::fmt(e, f),
            Self::InvalidClientTokenId(msg) => f.write_str(msg),
            Self::InvalidRequestMethod(msg) => f.write_str(msg),
            Self::IncompleteSignature(msg) => f.write_str(msg),
            Self::InvalidURIPath(msg) => f.write_str(msg),
            Self::MalformedHeader(msg) => f.write_str(msg),
            Self::MalformedQueryString(msg) => f.write_str(msg),
            Self::MissingAuthenticationToken(msg) => f.write_str(msg),
            Self::ReconciliationMismatch(msg) => f.write_str(msg),
            Self::SignatureDoesNotMatch(msg) => {
                if let Some(msg) = msg {
                    f.write_str(msg)
                } else {
                    Ok(())
                }
            }
            Self::UnreadableBody(msg) => f.write_str(msg),
        }
    }
}

impl Error for SignatureError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::IO(ref e) => Some(e),
            _ => None,
        }
    }
}

impl From<IOError> for SignatureError {
    fn from(e: IOError) -> SignatureError {
        SignatureError::IO(e)
    }
}

impl From<Box<dyn Error + Send + Sync>> for SignatureError {
    fn from(e: Box<dyn Error + Send + Sync>) -> SignatureError {
        match e.downcast::<SignatureError>() {
            Ok(sig_err) => *sig_err,
            Err(e) => SignatureError::InternalServiceError(e),
        }
    }
}
