//! Indentation-aware lexer for the pool source dialect.
//!
//! Produces a flat token stream with explicit `Newline`, `Indent`, and
//! `Dedent` tokens. Blank and comment-only lines vanish entirely; newlines
//! inside brackets and after a backslash join logical lines. The lexer is
//! total: any input either tokenizes or returns `SourceSyntax`, never a
//! panic (enforced by the fuzz target).

use bb_error::{PoolError, Result};

use crate::token::{Keyword, Op, Token, TokenKind};

/// Tokenize a complete source unit.
pub fn tokenize(source: &str) -> Result<Vec<Token>> {
    Lexer::new(source).run()
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    /// Indentation column stack; always starts with 0.
    indents: Vec<usize>,
    /// Open bracket depth; newlines are whitespace while positive.
    depth: usize,
    tokens: Vec<Token>,
}

impl Lexer {
    fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            indents: vec![0],
            depth: 0,
            tokens: Vec::new(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
        }
        Some(c)
    }

    fn push(&mut self, kind: TokenKind) {
        self.tokens.push(Token {
            kind,
            line: self.line,
        });
    }

    fn err(&self, detail: impl Into<String>) -> PoolError {
        PoolError::syntax(self.line, detail.into())
    }

    fn run(mut self) -> Result<Vec<Token>> {
        'lines: loop {
            // At the start of a physical line with no open brackets.
            let indent = self.measure_indent();
            match self.peek() {
                None => break,
                Some('\n') => {
                    self.bump();
                    continue;
                }
                Some('\r') => {
                    self.bump();
                    continue;
                }
                Some('#') => {
                    self.skip_comment();
                    self.bump();
                    continue;
                }
                Some('\\') if self.peek_at(1) == Some('\n') => {
                    // A continuation on an otherwise blank line.
                    self.bump();
                    self.bump();
                    continue;
                }
                _ => {}
            }
            self.apply_indent(indent)?;

            // Token loop for one logical line.
            loop {
                self.skip_inline_space()?;
                match self.peek() {
                    None => {
                        self.push(TokenKind::Newline);
                        break 'lines;
                    }
                    Some('\n') => {
                        self.bump();
                        if self.depth == 0 {
                            self.push(TokenKind::Newline);
                            continue 'lines;
                        }
                        // Inside brackets the newline is whitespace.
                    }
                    Some(c) => self.lex_token(c)?,
                }
            }
        }

        while self.indents.len() > 1 {
            self.indents.pop();
            self.push(TokenKind::Dedent);
        }
        self.push(TokenKind::Eof);
        Ok(self.tokens)
    }

    /// Consume leading spaces/tabs and return the indentation column.
    /// Tabs advance to the next multiple of eight.
    fn measure_indent(&mut self) -> usize {
        let mut col = 0;
        while let Some(c) = self.peek() {
            match c {
                ' ' => col += 1,
                '\t' => col = (col / 8 + 1) * 8,
                '\x0c' => col = 0,
                _ => break,
            }
            self.bump();
        }
        col
    }

    fn apply_indent(&mut self, indent: usize) -> Result<()> {
        let current = *self.indents.last().unwrap_or(&0);
        if indent > current {
            self.indents.push(indent);
            self.push(TokenKind::Indent);
        } else if indent < current {
            while self
                .indents
                .last()
                .is_some_and(|&level| level > indent)
            {
                self.indents.pop();
                self.push(TokenKind::Dedent);
            }
            if self.indents.last() != Some(&indent) {
                return Err(self.err("unindent does not match any outer indentation level"));
            }
        }
        Ok(())
    }

    fn skip_comment(&mut self) {
        while let Some(c) = self.peek() {
            if c == '\n' {
                break;
            }
            self.bump();
        }
    }

    /// Skip spaces, comments, and explicit line joins within a logical line.
    fn skip_inline_space(&mut self) -> Result<()> {
        loop {
            match self.peek() {
                Some(' ' | '\t' | '\x0c' | '\r') => {
                    self.bump();
                }
                Some('#') => self.skip_comment(),
                Some('\\') => {
                    if self.peek_at(1) == Some('\n') {
                        self.bump();
                        self.bump();
                    } else {
                        return Err(self.err("unexpected character after line continuation"));
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn lex_token(&mut self, c: char) -> Result<()> {
        if is_ident_start(c) {
            return self.lex_name_or_string();
        }
        if c.is_ascii_digit() || (c == '.' && self.peek_at(1).is_some_and(|d| d.is_ascii_digit()))
        {
            return self.lex_number();
        }
        if c == '"' || c == '\'' {
            let value = self.lex_string_literal(false)?;
            self.push(TokenKind::Str(value));
            return Ok(());
        }
        self.lex_operator(c)
    }

    fn lex_name_or_string(&mut self) -> Result<()> {
        let start = self.pos;
        while self.peek().is_some_and(is_ident_continue) {
            self.bump();
        }
        let name: String = self.chars[start..self.pos].iter().collect();

        // A short prefix immediately followed by a quote starts a string.
        if matches!(self.peek(), Some('"' | '\'')) && name.len() <= 2 {
            let lower = name.to_ascii_lowercase();
            let (raw, bytes, fstring) = match lower.as_str() {
                "r" => (true, false, false),
                "b" => (false, true, false),
                "u" => (false, false, false),
                "rb" | "br" => (true, true, false),
                "f" | "rf" | "fr" => (false, false, true),
                _ => {
                    return Err(self.err(format!("invalid string prefix '{name}'")));
                }
            };
            if fstring {
                return Err(self.err("f-strings are not supported"));
            }
            if bytes {
                let value = self.lex_bytes_literal(raw)?;
                self.push(TokenKind::Bytes(value));
            } else {
                let value = self.lex_string_literal(raw)?;
                self.push(TokenKind::Str(value));
            }
            return Ok(());
        }

        match Keyword::from_name(&name) {
            Some(kw) => self.push(TokenKind::Keyword(kw)),
            None => self.push(TokenKind::Name(name)),
        }
        Ok(())
    }

    /// Lex a string literal starting at the opening quote. Adjacent-literal
    /// concatenation is handled by the parser, not here.
    fn lex_string_literal(&mut self, raw: bool) -> Result<String> {
        let mut value = String::new();
        self.lex_quoted(raw, |c, out: &mut String| out.push(c), |byte, out| {
            out.push(byte as char);
        }, |scalar, out, line| {
            match char::from_u32(scalar) {
                Some(c) => {
                    out.push(c);
                    Ok(())
                }
                None => Err(PoolError::syntax(line, "invalid unicode escape")),
            }
        }, &mut value)?;
        Ok(value)
    }

    fn lex_bytes_literal(&mut self, raw: bool) -> Result<Vec<u8>> {
        let mut value = Vec::new();
        self.lex_quoted(raw, |c, out: &mut Vec<u8>| {
            // The scanner has verified c is ASCII before calling.
            out.push(c as u8);
        }, |byte, out| {
            out.push(byte);
        }, |_, _, line| {
            Err(PoolError::syntax(line, "unicode escapes are invalid in bytes literals"))
        }, &mut value)?;
        Ok(value)
    }

    /// Shared quoted-literal scanner. `push_char` receives literal source
    /// characters, `push_byte` decoded \x/octal escapes, `push_unicode`
    /// decoded \u/\U escapes.
    fn lex_quoted<T>(
        &mut self,
        raw: bool,
        push_char: impl Fn(char, &mut T),
        push_byte: impl Fn(u8, &mut T),
        push_unicode: impl Fn(u32, &mut T, usize) -> Result<()>,
        out: &mut T,
    ) -> Result<()>
    where
        T: LiteralSink,
    {
        let bytes_mode = T::BYTES;
        let Some(quote) = self.bump() else {
            return Err(self.err("unterminated string literal"));
        };
        let triple = self.peek() == Some(quote) && self.peek_at(1) == Some(quote);
        if triple {
            self.bump();
            self.bump();
        }

        loop {
            let Some(c) = self.peek() else {
                return Err(self.err("unterminated string literal"));
            };
            if c == quote {
                if !triple {
                    self.bump();
                    return Ok(());
                }
                if self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote) {
                    self.bump();
                    self.bump();
                    self.bump();
                    return Ok(());
                }
                self.bump();
                push_char(c, out);
                continue;
            }
            if c == '\n' && !triple {
                return Err(self.err("unterminated string literal"));
            }
            if c == '\\' {
                self.bump();
                let Some(esc) = self.bump() else {
                    return Err(self.err("unterminated string literal"));
                };
                if raw {
                    push_char('\\', out);
                    if bytes_mode && !esc.is_ascii() {
                        return Err(self.err("non-ASCII character in bytes literal"));
                    }
                    push_char(esc, out);
                    continue;
                }
                match esc {
                    '\n' => {}
                    '\\' => push_char('\\', out),
                    '\'' => push_char('\'', out),
                    '"' => push_char('"', out),
                    'a' => push_byte(0x07, out),
                    'b' => push_byte(0x08, out),
                    'f' => push_byte(0x0c, out),
                    'n' => push_byte(b'\n', out),
                    'r' => push_byte(b'\r', out),
                    't' => push_byte(b'\t', out),
                    'v' => push_byte(0x0b, out),
                    'x' => {
                        let value = self.read_hex_digits(2)?;
                        push_byte(value as u8, out);
                    }
                    '0'..='7' => {
                        let mut value = esc as u32 - '0' as u32;
                        for _ in 0..2 {
                            match self.peek() {
                                Some(d @ '0'..='7') => {
                                    value = value * 8 + (d as u32 - '0' as u32);
                                    self.bump();
                                }
                                _ => break,
                            }
                        }
                        if value > 0xff {
                            return Err(self.err("octal escape out of range"));
                        }
                        push_byte(value as u8, out);
                    }
                    'u' => {
                        let value = self.read_hex_digits(4)?;
                        push_unicode(value, out, self.line)?;
                    }
                    'U' => {
                        let value = self.read_hex_digits(8)?;
                        push_unicode(value, out, self.line)?;
                    }
                    other => {
                        // Unknown escapes keep the backslash, as the source
                        // dialect does.
                        push_char('\\', out);
                        if bytes_mode && !other.is_ascii() {
                            return Err(self.err("non-ASCII character in bytes literal"));
                        }
                        push_char(other, out);
                    }
                }
                continue;
            }
            if bytes_mode && !c.is_ascii() {
                return Err(self.err("non-ASCII character in bytes literal"));
            }
            self.bump();
            push_char(c, out);
        }
    }

    fn read_hex_digits(&mut self, count: usize) -> Result<u32> {
        let mut value = 0u32;
        for _ in 0..count {
            let Some(d) = self.peek().and_then(|c| c.to_digit(16)) else {
                return Err(self.err("invalid hex escape"));
            };
            value = value * 16 + d;
            self.bump();
        }
        Ok(value)
    }

    fn lex_number(&mut self) -> Result<()> {
        let start = self.pos;
        let mut saw_digit = false;

        if self.peek() == Some('0')
            && matches!(self.peek_at(1), Some('x' | 'X' | 'o' | 'O' | 'b' | 'B'))
        {
            let base = self.peek_at(1).unwrap_or('x');
            self.bump();
            self.bump();
            let valid = |c: char| match base {
                'x' | 'X' => c.is_ascii_hexdigit(),
                'o' | 'O' => ('0'..='7').contains(&c),
                _ => c == '0' || c == '1',
            };
            while let Some(c) = self.peek() {
                if valid(c) {
                    saw_digit = true;
                    self.bump();
                } else if c == '_' {
                    self.bump();
                } else {
                    break;
                }
            }
        } else {
            while matches!(self.peek(), Some(c) if c.is_ascii_digit() || c == '_') {
                saw_digit |= self.peek().is_some_and(|c| c.is_ascii_digit());
                self.bump();
            }
            if self.peek() == Some('.') {
                self.bump();
                while matches!(self.peek(), Some(c) if c.is_ascii_digit() || c == '_') {
                    saw_digit |= self.peek().is_some_and(|c| c.is_ascii_digit());
                    self.bump();
                }
            }
            if matches!(self.peek(), Some('e' | 'E')) {
                let mut ahead = 1;
                if matches!(self.peek_at(1), Some('+' | '-')) {
                    ahead = 2;
                }
                if self.peek_at(ahead).is_some_and(|c| c.is_ascii_digit()) {
                    for _ in 0..ahead {
                        self.bump();
                    }
                    while matches!(self.peek(), Some(c) if c.is_ascii_digit() || c == '_') {
                        self.bump();
                    }
                }
            }
        }

        if matches!(self.peek(), Some('j' | 'J')) {
            self.bump();
        }
        if !saw_digit {
            return Err(self.err("invalid numeric literal"));
        }
        // Numbers must not run straight into a name.
        if self.peek().is_some_and(is_ident_start) {
            return Err(self.err("invalid numeric literal"));
        }

        let text: String = self.chars[start..self.pos].iter().collect();
        self.push(TokenKind::Number(text));
        Ok(())
    }

    fn lex_operator(&mut self, c: char) -> Result<()> {
        use Op::*;

        let two: Option<char> = self.peek_at(1);
        let three: Option<char> = self.peek_at(2);
        let (op, len) = match (c, two, three) {
            ('*', Some('*'), Some('=')) => (DoubleStarEq, 3),
            ('/', Some('/'), Some('=')) => (DoubleSlashEq, 3),
            ('<', Some('<'), Some('=')) => (LShiftEq, 3),
            ('>', Some('>'), Some('=')) => (RShiftEq, 3),
            ('.', Some('.'), Some('.')) => (Ellipsis, 3),
            ('*', Some('*'), _) => (DoubleStar, 2),
            ('*', Some('='), _) => (StarEq, 2),
            ('/', Some('/'), _) => (DoubleSlash, 2),
            ('/', Some('='), _) => (SlashEq, 2),
            ('<', Some('<'), _) => (LShift, 2),
            ('>', Some('>'), _) => (RShift, 2),
            ('<', Some('='), _) => (Le, 2),
            ('>', Some('='), _) => (Ge, 2),
            ('=', Some('='), _) => (EqEq, 2),
            ('!', Some('='), _) => (NotEq, 2),
            ('+', Some('='), _) => (PlusEq, 2),
            ('-', Some('='), _) => (MinusEq, 2),
            ('-', Some('>'), _) => (Arrow, 2),
            ('%', Some('='), _) => (PercentEq, 2),
            ('@', Some('='), _) => (AtEq, 2),
            ('&', Some('='), _) => (AmpEq, 2),
            ('|', Some('='), _) => (PipeEq, 2),
            ('^', Some('='), _) => (CaretEq, 2),
            (':', Some('='), _) => (ColonEq, 2),
            ('(', _, _) => (LParen, 1),
            (')', _, _) => (RParen, 1),
            ('[', _, _) => (LBracket, 1),
            (']', _, _) => (RBracket, 1),
            ('{', _, _) => (LBrace, 1),
            ('}', _, _) => (RBrace, 1),
            (',', _, _) => (Comma, 1),
            (':', _, _) => (Colon, 1),
            (';', _, _) => (Semi, 1),
            ('.', _, _) => (Dot, 1),
            ('@', _, _) => (At, 1),
            ('=', _, _) => (Assign, 1),
            ('+', _, _) => (Plus, 1),
            ('-', _, _) => (Minus, 1),
            ('*', _, _) => (Star, 1),
            ('/', _, _) => (Slash, 1),
            ('%', _, _) => (Percent, 1),
            ('&', _, _) => (Amp, 1),
            ('|', _, _) => (Pipe, 1),
            ('^', _, _) => (Caret, 1),
            ('~', _, _) => (Tilde, 1),
            ('<', _, _) => (Lt, 1),
            ('>', _, _) => (Gt, 1),
            _ => {
                return Err(self.err(format!("unexpected character '{c}'")));
            }
        };

        match op {
            LParen | LBracket | LBrace => self.depth += 1,
            RParen | RBracket | RBrace => self.depth = self.depth.saturating_sub(1),
            _ => {}
        }
        for _ in 0..len {
            self.bump();
        }
        self.push(TokenKind::Op(op));
        Ok(())
    }
}

/// Marker for the shared quoted-literal scanner: whether the sink is a
/// bytes buffer.
trait LiteralSink {
    const BYTES: bool;
}

impl LiteralSink for String {
    const BYTES: bool = false;
}

impl LiteralSink for Vec<u8> {
    const BYTES: bool = true;
}

fn is_ident_start(c: char) -> bool {
    c == '_' || c.is_alphabetic()
}

fn is_ident_continue(c: char) -> bool {
    c == '_' || c.is_alphanumeric()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::{Keyword, Op, TokenKind};

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source)
            .expect("tokenize")
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn simple_def() {
        let toks = kinds("def f(x):\n    return x\n");
        assert_eq!(
            toks,
            vec![
                TokenKind::Keyword(Keyword::Def),
                TokenKind::Name("f".to_owned()),
                TokenKind::Op(Op::LParen),
                TokenKind::Name("x".to_owned()),
                TokenKind::Op(Op::RParen),
                TokenKind::Op(Op::Colon),
                TokenKind::Newline,
                TokenKind::Indent,
                TokenKind::Keyword(Keyword::Return),
                TokenKind::Name("x".to_owned()),
                TokenKind::Newline,
                TokenKind::Dedent,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn blank_and_comment_lines_vanish() {
        let toks = kinds("x = 1\n\n# comment\n   \ny = 2\n");
        let newlines = toks
            .iter()
            .filter(|k| matches!(k, TokenKind::Newline))
            .count();
        assert_eq!(newlines, 2);
    }

    #[test]
    fn brackets_join_lines() {
        let toks = kinds("f(1,\n  2)\n");
        let newlines = toks
            .iter()
            .filter(|k| matches!(k, TokenKind::Newline))
            .count();
        assert_eq!(newlines, 1);
        assert!(!toks.iter().any(|k| matches!(k, TokenKind::Indent)));
    }

    #[test]
    fn backslash_joins_lines() {
        let toks = kinds("x = 1 + \\\n    2\n");
        let newlines = toks
            .iter()
            .filter(|k| matches!(k, TokenKind::Newline))
            .count();
        assert_eq!(newlines, 1);
    }

    #[test]
    fn string_escapes_decode() {
        let toks = kinds(r#"'a\nb\t\x41\u00e9'"#);
        assert_eq!(toks[0], TokenKind::Str("a\nb\tA\u{e9}".to_owned()));
    }

    #[test]
    fn raw_string_keeps_backslashes() {
        let toks = kinds(r"r'\n'");
        assert_eq!(toks[0], TokenKind::Str("\\n".to_owned()));
    }

    #[test]
    fn triple_quoted_string_spans_lines() {
        let toks = kinds("'''line1\nline2'''\n");
        assert_eq!(toks[0], TokenKind::Str("line1\nline2".to_owned()));
    }

    #[test]
    fn unknown_escape_is_kept() {
        let toks = kinds(r"'\q'");
        assert_eq!(toks[0], TokenKind::Str("\\q".to_owned()));
    }

    #[test]
    fn bytes_literal() {
        let toks = kinds(r"b'\x00ab'");
        assert_eq!(toks[0], TokenKind::Bytes(vec![0, b'a', b'b']));
    }

    #[test]
    fn numbers_keep_spelling() {
        let toks = kinds("0x1F 1_000 3.14 1e-3 2j\n");
        let nums: Vec<&str> = toks
            .iter()
            .filter_map(|k| match k {
                TokenKind::Number(n) => Some(n.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(nums, vec!["0x1F", "1_000", "3.14", "1e-3", "2j"]);
    }

    #[test]
    fn fstring_rejected() {
        let err = tokenize("f'{x}'").unwrap_err();
        assert!(err.to_string().contains("f-strings"));
    }

    #[test]
    fn unterminated_string_rejected() {
        assert!(tokenize("'abc").is_err());
        assert!(tokenize("'abc\n'").is_err());
    }

    #[test]
    fn bad_dedent_rejected() {
        let err = tokenize("if x:\n        a\n    b\n").unwrap_err();
        assert!(err.to_string().contains("unindent"));
    }

    #[test]
    fn soft_keywords_lex_as_names() {
        let toks = kinds("match case\n");
        assert_eq!(toks[0], TokenKind::Name("match".to_owned()));
        assert_eq!(toks[1], TokenKind::Name("case".to_owned()));
    }

    #[test]
    fn walrus_and_arrow() {
        let toks = kinds("(x := 1) -> ...\n");
        assert!(toks.contains(&TokenKind::Op(Op::ColonEq)));
        assert!(toks.contains(&TokenKind::Op(Op::Arrow)));
        assert!(toks.contains(&TokenKind::Op(Op::Ellipsis)));
    }
}
