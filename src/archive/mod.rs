//! Archive access: C1 (magic offset, in `crate::magic_offset`), C3
//! (uniform reader) and C4 (row extractor).

pub mod digest;
pub mod extractor;
pub mod reader;

pub use extractor::Row;
pub use reader::ArchiveReader;

use std::path::{Path, PathBuf};

/// The two archive shapes described in spec §3.
pub enum ArchiveShape {
    /// A `*.com.7z` container holding `Posts.xml` and `Tags.xml` directly.
    Small { archive: PathBuf },
    /// A `*-Posts.7z`/`*-Tags.7z` pair, each a raw bzip2 stream in a 7z
    /// "copy" member.
    Large { posts: PathBuf, tags: PathBuf },
}

impl ArchiveShape {
    /// Classifies `path` by name, resolving the companion file for the
    /// large shape (spec §3: "replacing that suffix with `-Tags`").
    pub fn detect(path: &Path) -> Self {
        let name = path.to_string_lossy();
        if let Some(stem) = name.strip_suffix("-Posts.7z") {
            let tags = PathBuf::from(format!("{stem}-Tags.7z"));
            ArchiveShape::Large {
                posts: path.to_path_buf(),
                tags,
            }
        } else {
            ArchiveShape::Small {
                archive: path.to_path_buf(),
            }
        }
    }
}
