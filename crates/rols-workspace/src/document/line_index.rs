use tower_lsp_server::lsp_types::Position;

/// Pre-computed line boundaries for position/offset conversion.
///
/// Offsets are counted in characters (Unicode scalar values), never bytes. `\n` is the
/// line terminator; a preceding `\r` belongs to the terminator, not to the line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LineIndex {
    line_starts: Vec<usize>,
    line_ends: Vec<usize>,
    byte_starts: Vec<usize>,
    length: usize,
}

impl LineIndex {
    #[must_use]
    pub fn new(text: &str) -> Self {
        let mut line_starts = vec![0];
        let mut line_ends = Vec::new();
        let mut byte_starts = vec![0];
        let mut chars = 0;
        let mut after_cr = false;

        for (byte, c) in text.char_indices() {
            if c == '\n' {
                line_ends.push(if after_cr { chars - 1 } else { chars });
                line_starts.push(chars + 1);
                byte_starts.push(byte + 1);
            }
            after_cr = c == '\r';
            chars += 1;
        }
        line_ends.push(chars);

        Self {
            line_starts,
            line_ends,
            byte_starts,
            length: chars,
        }
    }

    #[must_use]
    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// Total length in characters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.length
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Character offset for a line/character position.
    ///
    /// A character past the end of the line clamps to the line end; a line past the
    /// end of the text has no offset.
    #[must_use]
    pub fn offset_at(&self, position: Position) -> Option<usize> {
        let line = position.line as usize;
        let start = *self.line_starts.get(line)?;
        let end = self.line_ends[line];
        Some(start + (position.character as usize).min(end - start))
    }

    /// Line/character position for a character offset, clamped to the text length.
    #[must_use]
    pub fn position_at(&self, offset: usize) -> Position {
        let offset = offset.min(self.length);
        let line = match self.line_starts.binary_search(&offset) {
            Ok(line) => line,
            Err(line) => line - 1,
        };
        let character = offset - self.line_starts[line];

        Position::new(to_u32(line), to_u32(character))
    }

    /// Byte index into `text` for a character offset.
    #[must_use]
    pub fn byte_offset(&self, text: &str, offset: usize) -> usize {
        let offset = offset.min(self.length);
        let line = match self.line_starts.binary_search(&offset) {
            Ok(line) => line,
            Err(line) => line - 1,
        };
        let line_byte = self.byte_starts[line];

        text[line_byte..]
            .char_indices()
            .nth(offset - self.line_starts[line])
            .map_or(text.len(), |(byte, _)| line_byte + byte)
    }

    /// Content of a line without its terminator.
    #[must_use]
    pub fn line<'a>(&self, text: &'a str, line: usize) -> Option<&'a str> {
        let start = self.byte_offset(text, *self.line_starts.get(line)?);
        let end = self.byte_offset(text, self.line_ends[line]);
        text.get(start..end)
    }
}

fn to_u32(value: usize) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}
