//! HTTP request body handling utilities.
//!
//! The signer hashes the body and the transport sends the same bytes afterwards, so every body is
//! read into memory exactly once and replayed from there.
use {
    bytes::Bytes,
    std::{io::Read, sync::Mutex},
    tower::BoxError,
};

/// A trait for converting various body types into a [`Bytes`] object.
///
/// This requires reading the entire body into memory.
pub trait IntoRequestBytes {
    /// Convert this object into a [`Bytes`] object.
    fn into_request_bytes(self) -> Result<Bytes, BoxError>;
}

/// Convert the unit type `()` into an empty [`Bytes`] object.
impl IntoRequestBytes for () {
    /// Convert the unit type `()` into an empty [`Bytes`] object.
    ///
    /// This is infalliable.
    fn into_request_bytes(self) -> Result<Bytes, BoxError> {
        Ok(Bytes::new())
    }
}

/// Convert a `Vec<u8>` into a [`Bytes`] object.
impl IntoRequestBytes for Vec<u8> {
    /// Convert a `Vec<u8>` into a [`Bytes`] object.
    ///
    /// This is infalliable.
    fn into_request_bytes(self) -> Result<Bytes, BoxError> {
        Ok(Bytes::from(self))
    }
}

/// Identity transformation: return the [`Bytes`] object as-is.
impl IntoRequestBytes for Bytes {
    /// Identity transformation: return the [`Bytes`] object as-is.
    ///
    /// This is infalliable.
    fn into_request_bytes(self) -> Result<Bytes, BoxError> {
        Ok(self)
    }
}

impl IntoRequestBytes for String {
    fn into_request_bytes(self) -> Result<Bytes, BoxError> {
        Ok(Bytes::from(self))
    }
}

impl IntoRequestBytes for &'static str {
    fn into_request_bytes(self) -> Result<Bytes, BoxError> {
        Ok(Bytes::from_static(self.as_bytes()))
    }
}

impl IntoRequestBytes for &'static [u8] {
    fn into_request_bytes(self) -> Result<Bytes, BoxError> {
        Ok(Bytes::from_static(self))
    }
}

/// A streaming body backed by a [`Read`] implementation.
///
/// The reader is drained the first time the body is converted. Converting the same body twice
/// through a reference fails, since the stream cannot be rewound.
#[derive(Debug)]
pub struct ReaderBody<R> {
    reader: Mutex<Option<R>>,
}

impl<R: Read> ReaderBody<R> {
    /// Wrap a reader.
    pub fn new(reader: R) -> Self {
        Self {
            reader: Mutex::new(Some(reader)),
        }
    }

    /// Drain the reader, leaving the body consumed.
    pub fn read_all(&self) -> Result<Bytes, BoxError> {
        let mut guard = self.reader.lock().map_err(|_| "body reader lock poisoned")?;
        let mut reader = guard.take().ok_or("body stream has already been consumed")?;
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf)?;
        Ok(Bytes::from(buf))
    }
}

impl<R: Read> IntoRequestBytes for ReaderBody<R> {
    fn into_request_bytes(self) -> Result<Bytes, BoxError> {
        self.read_all()
    }
}

impl<R: Read> IntoRequestBytes for &ReaderBody<R> {
    fn into_request_bytes(self) -> Result<Bytes, BoxError> {
        self.read_all()
    }
}
