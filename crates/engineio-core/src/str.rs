use bytes::Bytes;

/// A cheaply cloneable utf8 string backed by [`Bytes`].
///
/// Received text frames and polling payloads are sliced into packets
/// without copying.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Default)]
pub struct Str(Bytes);

impl Str {
    /// Build a [`Str`] from raw bytes, checking that they are valid utf8.
    pub fn from_utf8(bytes: Bytes) -> Result<Self, std::str::Utf8Error> {
        std::str::from_utf8(&bytes)?;
        Ok(Str(bytes))
    }

    /// Efficiently slice string by calling [`Bytes::slice`] on the inner bytes.
    ///
    /// The range must fall on char boundaries.
    pub fn slice(&self, range: impl std::ops::RangeBounds<usize>) -> Self {
        let slice = self.0.slice(range);
        debug_assert!(std::str::from_utf8(&slice).is_ok());
        Str(slice)
    }

    /// Return a &str representation of the string
    pub fn as_str(&self) -> &str {
        // SAFETY: Str is only built from valid utf8 and sliced on char boundaries
        unsafe { std::str::from_utf8_unchecked(&self.0) }
    }

    /// Return a &[u8] representation of the string
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl std::ops::Deref for Str {
    type Target = str;
    fn deref(&self) -> &Self::Target {
        self.as_str()
    }
}
impl std::fmt::Display for Str {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
impl From<&'static str> for Str {
    fn from(s: &'static str) -> Self {
        Str(Bytes::from_static(s.as_bytes()))
    }
}
impl From<String> for Str {
    fn from(s: String) -> Self {
        Str(Bytes::from(s.into_bytes()))
    }
}
impl From<&String> for Str {
    fn from(s: &String) -> Self {
        Str(Bytes::copy_from_slice(s.as_bytes()))
    }
}

impl From<Str> for Bytes {
    fn from(s: Str) -> Self {
        s.0
    }
}
impl From<Str> for String {
    fn from(s: Str) -> Self {
        s.as_str().to_owned()
    }
}

// Hashes like `str` so that maps keyed by `Str` can be queried with `&str`.
impl std::hash::Hash for Str {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.as_str().hash(state)
    }
}

impl std::borrow::Borrow<str> for Str {
    fn borrow(&self) -> &str {
        self.as_str()
    }
}

impl std::cmp::PartialEq<&str> for Str {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}
impl std::cmp::PartialEq<str> for Str {
    fn eq(&self, other: &str) -> bool {
        self.as_str() == other
    }
}
impl std::cmp::PartialEq<Str> for &str {
    fn eq(&self, other: &Str) -> bool {
        *self == other.as_str()
    }
}
