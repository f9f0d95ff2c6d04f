use crate::errors::{CodeDbError, CodeDbResult};

const SEPARATOR: char = '\0';

/// One file stored inside a chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkFile<'a> {
    /// Path relative to the database root, always `/`-separated
    pub path: &'a str,
    pub content: &'a str,
}

/// A decompressed chunk: `path\0content\0` records back to back
#[derive(Debug, Clone, Copy)]
pub struct DbChunk<'a> {
    text: &'a str,
}

impl<'a> DbChunk<'a> {
    pub fn from_bytes(raw: &'a [u8]) -> CodeDbResult<Self> {
        let text = std::str::from_utf8(raw)
            .map_err(|e| CodeDbError::corrupt_chunk(format!("invalid UTF-8: {}", e)))?;
        Ok(Self { text })
    }

    pub fn files(&self) -> ChunkFiles<'a> {
        ChunkFiles { rest: self.text }
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Iterator over the files of a [`DbChunk`]
#[derive(Debug, Clone)]
pub struct ChunkFiles<'a> {
    rest: &'a str,
}

impl<'a> ChunkFiles<'a> {
    fn take_field(&mut self, what: &str) -> CodeDbResult<&'a str> {
        match self.rest.split_once(SEPARATOR) {
            Some((field, rest)) => {
                self.rest = rest;
                Ok(field)
            }
            None => {
                self.rest = "";
                Err(CodeDbError::corrupt_chunk(format!("unterminated {}", what)))
            }
        }
    }
}

impl<'a> Iterator for ChunkFiles<'a> {
    type Item = CodeDbResult<ChunkFile<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.rest.is_empty() {
            return None;
        }
        let file = self.take_field("file path").and_then(|path| {
            let content = self.take_field("file content")?;
            Ok(ChunkFile { path, content })
        });
        Some(file)
    }
}

/// Appends one file record to a raw chunk under construction
pub fn encode_file(out: &mut Vec<u8>, path: &str, content: &str) {
    out.extend_from_slice(path.as_bytes());
    out.push(0);
    out.extend_from_slice(content.as_bytes());
    out.push(0);
}

/// Bytes a file record occupies in a raw chunk
pub fn encoded_len(path: &str, content: &str) -> usize {
    path.len() + content.len() + 2
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_files_in_order() {
        let mut raw = Vec::new();
        encode_file(&mut raw, "src/lib.rs", "pub mod a;\n");
        encode_file(&mut raw, "empty.txt", "");
        encode_file(&mut raw, "README", "hello");
        assert_eq!(
            raw.len(),
            encoded_len("src/lib.rs", "pub mod a;\n") + encoded_len("empty.txt", "")
                + encoded_len("README", "hello")
        );

        let chunk = DbChunk::from_bytes(&raw).unwrap();
        let files: Vec<_> = chunk.files().collect::<CodeDbResult<_>>().unwrap();
        assert_eq!(
            files,
            vec![
                ChunkFile { path: "src/lib.rs", content: "pub mod a;\n" },
                ChunkFile { path: "empty.txt", content: "" },
                ChunkFile { path: "README", content: "hello" },
            ]
        );
    }

    #[test]
    fn test_unterminated_record() {
        let chunk = DbChunk::from_bytes(b"a.txt\0no terminator").unwrap();
        let mut files = chunk.files();
        assert!(matches!(files.next(), Some(Err(CodeDbError::CorruptChunk(_)))));
        assert!(files.next().is_none());

        let chunk = DbChunk::from_bytes(b"dangling path").unwrap();
        assert!(chunk.files().next().unwrap().is_err());
    }

    #[test]
    fn test_invalid_utf8() {
        assert!(matches!(
            DbChunk::from_bytes(&[b'a', 0, 0xff, 0]),
            Err(CodeDbError::CorruptChunk(_))
        ));
    }
}
