mod chapter;
mod manga;

pub use self::chapter::{ChapterNumber, ChapterRef};
pub use self::manga::MangaId;
