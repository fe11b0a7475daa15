//! Byte offset to line/character conversion.

/// Line start table for one source text.
#[derive(Debug, Clone)]
pub struct LineIndex<'src> {
    source: &'src str,
    line_starts: Vec<usize>,
}

impl<'src> LineIndex<'src> {
    pub fn new(source: &'src str) -> Self {
        let mut line_starts = vec![0];
        let bytes = source.as_bytes();
        let mut index = 0;
        while index < bytes.len() {
            match bytes[index] {
                b'\n' => line_starts.push(index + 1),
                b'\r' if bytes.get(index + 1) != Some(&b'\n') => line_starts.push(index + 1),
                _ => {}
            }
            index += 1;
        }
        Self {
            source,
            line_starts,
        }
    }

    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// 0-indexed `(line, character)` of a byte offset. Characters are
    /// counted as Unicode scalar values; offsets past the end clamp.
    pub fn position(&self, offset: usize) -> (u32, u32) {
        let offset = offset.min(self.source.len());
        let line = match self.line_starts.binary_search(&offset) {
            Ok(line) => line,
            Err(next) => next - 1,
        };
        let start = self.line_starts[line];
        let character = self
            .source
            .get(start..offset)
            .map_or(offset - start, |prefix| prefix.chars().count());
        (to_u32(line), to_u32(character))
    }

    /// 1-indexed `(line, column)` of a byte offset.
    pub fn one_based(&self, offset: usize) -> (u32, u32) {
        let (line, character) = self.position(offset);
        (line + 1, character + 1)
    }

    /// Byte offset of the start of a 0-indexed line.
    pub fn line_start(&self, line: usize) -> Option<usize> {
        self.line_starts.get(line).copied()
    }
}

fn to_u32(value: usize) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positions_across_lines() {
        let index = LineIndex::new("ab\ncd\r\nef");
        assert_eq!(index.position(0), (0, 0));
        assert_eq!(index.position(4), (1, 1));
        assert_eq!(index.position(7), (2, 0));
        assert_eq!(index.one_based(8), (3, 2));
        assert_eq!(index.line_count(), 3);
    }

    #[test]
    fn counts_characters_not_bytes() {
        let index = LineIndex::new("é = 1");
        assert_eq!(index.position(3), (0, 2));
    }

    #[test]
    fn clamps_past_end() {
        let index = LineIndex::new("x");
        assert_eq!(index.position(10), (0, 1));
    }
}
