use crate::{BytePos, RelativeBytePos, Span};
use std::{
    fmt, io,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

/// The name of a source file.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FileName {
    /// Files from the file system.
    Real(PathBuf),
    /// Command line.
    Stdin,
    /// Custom sources, e.g. tests. Displayed between angle brackets.
    Custom(String),
}

impl From<PathBuf> for FileName {
    fn from(p: PathBuf) -> Self {
        Self::Real(p)
    }
}

impl FileName {
    /// Creates a new `FileName` from a string.
    pub fn custom(s: impl Into<String>) -> Self {
        Self::Custom(s.into())
    }
}

impl fmt::Display for FileName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Real(path) => path.display().fmt(f),
            Self::Stdin => f.write_str("<stdin>"),
            Self::Custom(s) => write!(f, "<{s}>"),
        }
    }
}

/// A single source in the [`SourceMap`].
#[derive(Clone, Debug)]
pub struct SourceFile {
    /// The name of the file that the source came from.
    pub name: FileName,
    /// The complete source code, with newlines normalized to `\n`.
    pub src: Arc<String>,
    /// The start position of this source in the `SourceMap`.
    pub start_pos: BytePos,
    /// The byte length of this source.
    pub source_len: RelativeBytePos,
    /// Locations of line beginnings in the source code.
    pub lines: Vec<RelativeBytePos>,
}

impl SourceFile {
    fn new(name: FileName, mut src: String) -> Result<Self, OffsetOverflowError> {
        normalize_newlines(&mut src);
        let source_len = u32::try_from(src.len()).map_err(|_| OffsetOverflowError(()))?;
        let lines = analyze_lines(&src);
        Ok(Self {
            name,
            src: Arc::new(src),
            start_pos: BytePos(0),
            source_len: RelativeBytePos(source_len),
            lines,
        })
    }

    #[inline]
    pub fn relative_position(&self, pos: BytePos) -> RelativeBytePos {
        RelativeBytePos(pos.to_u32() - self.start_pos.to_u32())
    }

    #[inline]
    pub fn end_position(&self) -> BytePos {
        BytePos(self.start_pos.to_u32() + self.source_len.to_u32())
    }

    /// Finds the 0-based index of the line containing the given position.
    pub fn lookup_line(&self, pos: RelativeBytePos) -> Option<usize> {
        self.lines.partition_point(|x| x <= &pos).checked_sub(1)
    }
}

/// Sum of all file lengths is over [`u32::MAX`].
#[derive(Debug)]
pub struct OffsetOverflowError(());

impl fmt::Display for OffsetOverflowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("files larger than 4GiB are not supported")
    }
}

impl std::error::Error for OffsetOverflowError {}

impl From<OffsetOverflowError> for io::Error {
    fn from(e: OffsetOverflowError) -> Self {
        Self::new(io::ErrorKind::InvalidData, e)
    }
}

/// Maps byte positions to source files and lines.
#[derive(Default)]
pub struct SourceMap {
    files: Mutex<Vec<Arc<SourceFile>>>,
}

impl SourceMap {
    /// Creates a new empty source map.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Returns `true` if the source map contains no files.
    pub fn is_empty(&self) -> bool {
        self.files.lock().unwrap().is_empty()
    }

    /// Loads a file from disk and adds it to the source map.
    pub fn load_file(&self, path: &Path) -> io::Result<Arc<SourceFile>> {
        let src = std::fs::read_to_string(path)?;
        self.new_source_file(FileName::Real(path.to_path_buf()), src).map_err(Into::into)
    }

    /// Adds a source to the source map, allocating its position range.
    pub fn new_source_file(
        &self,
        name: FileName,
        src: String,
    ) -> Result<Arc<SourceFile>, OffsetOverflowError> {
        let mut file = SourceFile::new(name, src)?;
        let mut files = self.files.lock().unwrap();
        let start_pos = match files.last() {
            Some(last) => last
                .end_position()
                .to_u32()
                .checked_add(1)
                .ok_or(OffsetOverflowError(()))?,
            None => 0,
        };
        file.start_pos = BytePos(start_pos);
        tracing::debug!(name = %file.name, len = file.source_len.to_u32(), "adding source file");
        let file = Arc::new(file);
        files.push(file.clone());
        Ok(file)
    }

    /// Returns the file that contains the given position.
    pub fn lookup_source_file(&self, pos: BytePos) -> Arc<SourceFile> {
        let files = self.files.lock().unwrap();
        let idx = files.partition_point(|f| f.start_pos <= pos).saturating_sub(1);
        files[idx].clone()
    }

    /// Returns the 1-based line number of the given position.
    pub fn lookup_line_number(&self, pos: BytePos) -> usize {
        let file = self.lookup_source_file(pos);
        file.lookup_line(file.relative_position(pos)).map_or(1, |l| l + 1)
    }

    /// Returns the 1-based line number of the start of the given span.
    pub fn span_to_line(&self, span: Span) -> usize {
        self.lookup_line_number(span.lo())
    }

    /// Returns the source snippet corresponding to the given span.
    pub fn span_to_snippet(&self, span: Span) -> Option<String> {
        let file = self.lookup_source_file(span.lo());
        let lo = file.relative_position(span.lo()).to_usize();
        let hi = file.relative_position(span.hi()).to_usize();
        file.src.get(lo..hi).map(ToString::to_string)
    }
}

/// Replaces `\r\n` with `\n` in-place so that positions and the line table
/// agree with what the lexer sees. Lone `\r` is left alone; the lexer treats
/// it as whitespace.
fn normalize_newlines(src: &mut String) {
    if !src.contains('\r') {
        return;
    }
    *src = src.replace("\r\n", "\n");
}

fn analyze_lines(src: &str) -> Vec<RelativeBytePos> {
    let mut lines = vec![RelativeBytePos(0)];
    lines.extend(
        src.bytes()
            .enumerate()
            .filter(|&(_, b)| b == b'\n')
            .map(|(i, _)| RelativeBytePos(i as u32 + 1)),
    );
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_lookup() {
        let sm = SourceMap::empty();
        let file = sm.new_source_file(FileName::custom("test"), "ab\ncd\n\nef".into()).unwrap();
        assert_eq!(file.lines, vec![
            RelativeBytePos(0),
            RelativeBytePos(3),
            RelativeBytePos(6),
            RelativeBytePos(7)
        ]);
        assert_eq!(sm.lookup_line_number(BytePos(0)), 1);
        assert_eq!(sm.lookup_line_number(BytePos(2)), 1);
        assert_eq!(sm.lookup_line_number(BytePos(3)), 2);
        assert_eq!(sm.lookup_line_number(BytePos(6)), 3);
        assert_eq!(sm.lookup_line_number(BytePos(8)), 4);
    }

    #[test]
    fn crlf_normalization() {
        let sm = SourceMap::empty();
        let file = sm.new_source_file(FileName::custom("test"), "a\r\nb\r\n".into()).unwrap();
        assert_eq!(&*file.src, "a\nb\n");
        assert_eq!(sm.lookup_line_number(BytePos(2)), 2);
    }

    #[test]
    fn multiple_files() {
        let sm = SourceMap::empty();
        let a = sm.new_source_file(FileName::custom("a"), "one\n".into()).unwrap();
        let b = sm.new_source_file(FileName::custom("b"), "two\n".into()).unwrap();
        assert_eq!(a.start_pos, BytePos(0));
        assert_eq!(b.start_pos, BytePos(5));
        assert_eq!(sm.lookup_line_number(b.start_pos), 1);
    }
}
