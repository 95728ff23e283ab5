use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("line {line}: failed to match magic word '{expected}', got '{found}'")]
    MagicMismatch {
        line: usize,
        expected: String,
        found: String,
    },
    #[error("line {line}: expected {expected}, got '{found}'")]
    UnexpectedToken {
        line: usize,
        expected: String,
        found: String,
    },
    #[error("line {line}: unexpected end of input while looking for {expected}")]
    UnexpectedEof { line: usize, expected: String },
    #[error(
        "expected translator output version {expected}, got {found}; \
         was this file produced by a different translator release?"
    )]
    VersionMismatch { expected: u32, found: u32 },
    #[error("line {line}: {message}")]
    Invalid { line: usize, message: String },
}

/// A cursor over the whitespace-separated tokens of a translator output
/// file. Tracks line numbers so diagnostics can point at the offending
/// token, and supports reading the rest of a line verbatim (fact and
/// operator names contain spaces).
#[derive(Debug)]
pub struct TokenStream<'a> {
    lines: Vec<&'a str>,
    /// Index of the line the cursor is on.
    line_no: usize,
    /// Byte offset into the current line.
    column: usize,
}

impl<'a> TokenStream<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            lines: text.lines().collect(),
            line_no: 0,
            column: 0,
        }
    }

    /// One-based line number of the cursor, for diagnostics.
    pub fn line(&self) -> usize {
        self.line_no + 1
    }

    fn skip_whitespace(&mut self) {
        while self.line_no < self.lines.len() {
            let rest = &self.lines[self.line_no][self.column..];
            let trimmed = rest.trim_start();
            if trimmed.is_empty() {
                self.line_no += 1;
                self.column = 0;
            } else {
                self.column += rest.len() - trimmed.len();
                return;
            }
        }
    }

    /// The next whitespace-separated token.
    pub fn token(&mut self, expected: &str) -> Result<&'a str, ParseError> {
        self.skip_whitespace();
        if self.line_no >= self.lines.len() {
            return Err(ParseError::UnexpectedEof {
                line: self.line(),
                expected: expected.to_string(),
            });
        }
        let rest = &self.lines[self.line_no][self.column..];
        let end = rest
            .find(char::is_whitespace)
            .unwrap_or(rest.len());
        self.column += end;
        Ok(&rest[..end])
    }

    /// The remainder of the current line, trimmed. Consumes the line.
    pub fn rest_of_line(&mut self, expected: &str) -> Result<&'a str, ParseError> {
        self.skip_whitespace();
        if self.line_no >= self.lines.len() {
            return Err(ParseError::UnexpectedEof {
                line: self.line(),
                expected: expected.to_string(),
            });
        }
        let rest = self.lines[self.line_no][self.column..].trim();
        self.line_no += 1;
        self.column = 0;
        Ok(rest)
    }

    pub fn usize(&mut self, expected: &str) -> Result<usize, ParseError> {
        let line = self.line();
        let token = self.token(expected)?;
        token.parse().map_err(|_| ParseError::UnexpectedToken {
            line,
            expected: expected.to_string(),
            found: token.to_string(),
        })
    }

    pub fn i64(&mut self, expected: &str) -> Result<i64, ParseError> {
        let line = self.line();
        let token = self.token(expected)?;
        token.parse().map_err(|_| ParseError::UnexpectedToken {
            line,
            expected: expected.to_string(),
            found: token.to_string(),
        })
    }

    /// Checks that the next token is exactly `magic`.
    pub fn check_magic(&mut self, magic: &str) -> Result<(), ParseError> {
        let line = self.line();
        let token = self.token(magic)?;
        if token == magic {
            Ok(())
        } else {
            Err(ParseError::MagicMismatch {
                line,
                expected: magic.to_string(),
                found: token.to_string(),
            })
        }
    }

    /// Whether the next token equals `magic`, without consuming it.
    pub fn peek_magic(&mut self, magic: &str) -> bool {
        let saved = (self.line_no, self.column);
        let result = matches!(self.token(magic), Ok(token) if token == magic);
        (self.line_no, self.column) = saved;
        result
    }

    pub fn invalid(&self, message: impl Into<String>) -> ParseError {
        ParseError::Invalid {
            line: self.line(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_and_lines() {
        let mut stream = TokenStream::new("begin_version\n3\nend_version\n");
        assert!(stream.check_magic("begin_version").is_ok());
        assert_eq!(stream.usize("version").unwrap(), 3);
        assert!(stream.check_magic("end_version").is_ok());
    }

    #[test]
    fn magic_mismatch_reports_token_and_line() {
        let mut stream = TokenStream::new("begin_version\nbogus\n");
        stream.check_magic("begin_version").unwrap();
        let err = stream.check_magic("end_version").unwrap_err();
        assert_eq!(
            err,
            ParseError::MagicMismatch {
                line: 2,
                expected: "end_version".to_string(),
                found: "bogus".to_string(),
            }
        );
    }

    #[test]
    fn rest_of_line_keeps_spaces() {
        let mut stream = TokenStream::new("1\nAtom at(truck, depot)\n2\n");
        assert_eq!(stream.usize("count").unwrap(), 1);
        assert_eq!(
            stream.rest_of_line("fact name").unwrap(),
            "Atom at(truck, depot)"
        );
        assert_eq!(stream.usize("count").unwrap(), 2);
    }

    #[test]
    fn peek_does_not_consume() {
        let mut stream = TokenStream::new("begin_rule\n");
        assert!(stream.peek_magic("begin_rule"));
        assert!(stream.check_magic("begin_rule").is_ok());
    }
}
