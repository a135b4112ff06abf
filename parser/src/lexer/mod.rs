pub mod tokens;

pub use tokens::*;

/// Indentation-sensitive tokenizer for the config YAML subset.
///
/// Tokens borrow from the source string, so the `Parser` built on top of
/// this never allocates while walking a document. An `Indent(n)` token is
/// produced once per non-blank, non-comment line carrying the column of
/// its first real character; everything else on the line follows as
/// ordinary tokens until the next `NewLine`.
#[derive(Debug)]
pub struct Tokenizer<'a> {
    source: &'a str,
    pos: usize,
    line: usize,
    at_line_start: bool,
}

impl<'a> Tokenizer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            pos: 0,
            line: 1,
            at_line_start: true,
        }
    }

    fn rest(&self) -> &'a str {
        &self.source[self.pos..]
    }

    fn peek_char(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek_char()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn skip_to_eol(&mut self) {
        while let Some(ch) = self.peek_char() {
            if ch == '\n' {
                break;
            }
            self.pos += ch.len_utf8();
        }
    }

    pub fn next_token(&mut self) -> Result<Token<'a>, LexerError> {
        if self.at_line_start {
            return self.consume_indent();
        }

        self.skip_inline_whitespace();

        let Some(ch) = self.peek_char() else {
            return Ok(Token::Eof);
        };

        match ch {
            '\n' => {
                self.bump();
                self.line += 1;
                self.at_line_start = true;
                Ok(Token::NewLine)
            }
            '#' => {
                self.skip_to_eol();
                self.next_token()
            }
            '-' if self.dash_is_marker() => {
                self.bump();
                Ok(Token::Dash)
            }
            ',' => {
                self.bump();
                Ok(Token::Comma)
            }
            '[' => {
                self.bump();
                Ok(Token::OpenBracket)
            }
            ']' => {
                self.bump();
                Ok(Token::CloseBracket)
            }
            '{' => {
                self.bump();
                Ok(Token::OpenBrace)
            }
            '}' => {
                self.bump();
                Ok(Token::CloseBrace)
            }
            ':' if self.colon_is_separator() => {
                self.bump();
                Ok(Token::Colon)
            }
            '"' | '\'' => self.read_quoted(ch),
            _ => Ok(self.read_bare()),
        }
    }

    /// A line made of only whitespace, or starting with `#`, carries no
    /// `Indent` token: it is skipped entirely and the line after it is
    /// consulted instead.
    fn consume_indent(&mut self) -> Result<Token<'a>, LexerError> {
        loop {
            let mut col = 0usize;
            while let Some(ch) = self.peek_char() {
                if ch == ' ' {
                    col += 1;
                    self.bump();
                } else if ch == '\t' {
                    col += 4;
                    self.bump();
                } else {
                    break;
                }
            }

            match self.peek_char() {
                None => {
                    self.at_line_start = false;
                    return Ok(Token::Eof);
                }
                Some('\n') => {
                    self.bump();
                    self.line += 1;
                    continue;
                }
                Some('#') => {
                    self.skip_to_eol();
                    continue;
                }
                Some(_) => {
                    self.at_line_start = false;
                    return Ok(Token::Indent(col));
                }
            }
        }
    }

    fn skip_inline_whitespace(&mut self) {
        while let Some(ch) = self.peek_char() {
            if ch == ' ' || ch == '\t' {
                self.bump();
            } else {
                break;
            }
        }
    }

    fn dash_is_marker(&self) -> bool {
        matches!(
            self.rest()[1..].chars().next(),
            None | Some(' ') | Some('\t') | Some('\n')
        )
    }

    fn colon_is_separator(&self) -> bool {
        matches!(
            self.rest()[1..].chars().next(),
            None | Some(' ') | Some('\t') | Some('\n') | Some(',')
        )
    }

    fn read_quoted(&mut self, quote: char) -> Result<Token<'a>, LexerError> {
        let opening_line = self.line;
        self.bump();
        let start = self.pos;
        loop {
            match self.peek_char() {
                None => return Err(LexerError::UnterminatedString { line: opening_line }),
                Some(ch) if ch == quote => {
                    let value = &self.source[start..self.pos];
                    self.bump();
                    return Ok(Token::Scalar(value));
                }
                Some('\n') => return Err(LexerError::UnterminatedString { line: opening_line }),
                Some(ch) => {
                    self.pos += ch.len_utf8();
                }
            }
        }
    }

    fn read_bare(&mut self) -> Token<'a> {
        let start = self.pos;
        while let Some(ch) = self.peek_char() {
            if ch.is_whitespace()
                || ch == ','
                || ch == '['
                || ch == ']'
                || ch == '{'
                || ch == '}'
                || ch == '#'
                || (ch == ':' && self.colon_is_separator())
                || (ch == '-' && self.pos > start && self.dash_is_marker())
            {
                break;
            }
            self.pos += ch.len_utf8();
        }

        if self.pos == start {
            // lone punctuation the scan above refused to eat (e.g. a bare
            // colon not followed by whitespace)
            self.bump();
        }

        let text = &self.source[start..self.pos];
        Token::Identifier(text)
    }
}
