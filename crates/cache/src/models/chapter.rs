use crate::error::{Error, ErrorKind};
use crate::models::MangaId;
use std::cmp::Ordering;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::path::PathBuf;
use std::str::FromStr;

/// A chapter number of the form `whole[.part]`, such as `12` or `12.5`.
///
/// Parsing normalizes the text (`012.50` becomes `12.5`, `3.0` becomes `3`)
/// so that equal numbers always have the same [`Display`] form and map to the
/// same cache directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChapterNumber {
    whole: u32,
    /// Fractional digits without trailing zeros; empty for whole chapters.
    part: String,
}
impl ChapterNumber {
    pub fn new(whole: u32) -> Self {
        Self { whole, part: String::new() }
    }

    pub fn whole(&self) -> u32 {
        self.whole
    }

    pub fn is_whole(&self) -> bool {
        self.part.is_empty()
    }
}
impl FromStr for ChapterNumber {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || Error::from(ErrorKind::InvalidId(s.to_string()));
        let (whole, part) = match s.split_once('.') {
            Some((whole, part)) => (whole, part),
            None => (s, ""),
        };
        if whole.is_empty() || !whole.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        if s.contains('.') && (part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit())) {
            return Err(invalid());
        }
        let whole = whole.parse::<u32>().map_err(|_| invalid())?;
        Ok(Self { whole, part: part.trim_end_matches('0').to_string() })
    }
}
impl From<u32> for ChapterNumber {
    fn from(whole: u32) -> Self {
        Self::new(whole)
    }
}
impl Ord for ChapterNumber {
    fn cmp(&self, other: &Self) -> Ordering {
        // With trailing zeros stripped, comparing the fractional digits as
        // strings is the same as comparing them numerically.
        self.whole.cmp(&other.whole).then_with(|| self.part.cmp(&other.part))
    }
}
impl PartialOrd for ChapterNumber {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Display for ChapterNumber {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self.part.is_empty() {
            true => write!(f, "{}", self.whole),
            false => write!(f, "{}.{}", self.whole, self.part),
        }
    }
}

/// Identity of one chapter: which manga, which chapter.
///
/// Ordered by manga, then by chapter number.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChapterRef {
    pub manga: MangaId,
    pub chapter: ChapterNumber,
}
impl ChapterRef {
    pub fn new(manga: MangaId, chapter: impl Into<ChapterNumber>) -> Self {
        Self { manga, chapter: chapter.into() }
    }

    /// `<manga>/<chapter>`, relative to any storage root.
    pub fn relative_path(&self) -> PathBuf {
        PathBuf::from(self.manga.as_str()).join(self.chapter.to_string())
    }
}
impl Display for ChapterRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}/{}", self.manga, self.chapter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn num(s: &str) -> ChapterNumber {
        s.parse().unwrap()
    }

    #[rstest]
    #[case("12", "12")]
    #[case("12.5", "12.5")]
    #[case("012", "12")]
    #[case("12.50", "12.5")]
    #[case("3.0", "3")]
    #[case("0", "0")]
    fn normalizes(#[case] input: &str, #[case] display: &str) {
        let parsed = num(input);
        assert_eq!(parsed.to_string(), display);
        assert_eq!(num(&parsed.to_string()), parsed);
    }

    #[rstest]
    #[case("")]
    #[case(".5")]
    #[case("12.")]
    #[case("-1")]
    #[case("1e3")]
    #[case("12.5.1")]
    #[case("99999999999")]
    fn rejects(#[case] input: &str) {
        assert!(input.parse::<ChapterNumber>().is_err());
    }

    #[test]
    fn numeric_ordering() {
        let mut chapters = vec![num("10"), num("2"), num("2.5"), num("2.10"), num("1"), num("2.05")];
        chapters.sort();
        let sorted: Vec<_> = chapters.iter().map(ToString::to_string).collect();
        assert_eq!(sorted, ["1", "2", "2.05", "2.1", "2.5", "10"]);
    }

    #[test]
    fn refs_order_by_manga_then_chapter() {
        let a = MangaId::new("a").unwrap();
        let b = MangaId::new("b").unwrap();
        let mut refs = vec![ChapterRef::new(b.clone(), 1), ChapterRef::new(a.clone(), 10), ChapterRef::new(a, 9)];
        refs.sort();
        let shown: Vec<_> = refs.iter().map(ToString::to_string).collect();
        assert_eq!(shown, ["a/9", "a/10", "b/1"]);
        assert_eq!(ChapterRef::new(b, num("4.5")).relative_path(), PathBuf::from("b/4.5"));
    }
}
