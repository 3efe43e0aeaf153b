use crate::error::{Error, ErrorKind};
use exn::ResultExt;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

/// Identifier of one manga.
///
/// Used verbatim as a directory name in both the strip library and the page
/// cache, so it must be exactly one safe path component: not empty, no
/// separators, no NUL, and no leading `.` (which also keeps it clear of the
/// cache's own `.staging` and `.trash` directories).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MangaId(String);
impl MangaId {
    pub fn new(id: impl Into<String>) -> Result<Self, Error> {
        let id = id.into();
        folio_storage::validate_component(&id).or_raise(|| ErrorKind::InvalidId(id.clone()))?;
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}
impl FromStr for MangaId {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}
impl TryFrom<String> for MangaId {
    type Error = Error;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}
impl AsRef<str> for MangaId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
impl Display for MangaId {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(&self.0)
    }
}
