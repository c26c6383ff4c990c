//! Tokenizer for the Sorrel BASIC dialect.
//!
//! Produces a restartable stream of [`Token`]s annotated with a source
//! [`Locus`]. Keywords are case-insensitive and become their own token ids;
//! identifiers keep an optional trailing sigil (`% & ! # $`) that encodes
//! their scalar type. Physical newlines and `:` are significant statement
//! separators. `REM` and `'` comments are stripped to end of line.

use sorrel_common::{CompileError, Locus};

/// Terminal id for identifiers.
pub const IDENT: &str = "identifier";
/// Terminal id for numeric literals.
pub const NUMBER: &str = "number";
/// Terminal id for string literals.
pub const STRING_LIT: &str = "string";
/// Terminal id for physical newlines.
pub const NEWLINE: &str = "newline";
/// The distinguished end-of-input token id; its text is empty.
pub const EOF: &str = "(eof)";

pub const KEYWORDS: &[&str] = &[
    "AND", "APPEND", "AS", "CALL", "CLOSE", "DATA", "DECLARE", "DIM", "DO",
    "DOUBLE", "ELSE", "ELSEIF", "END", "FOR", "FUNCTION", "GOSUB", "GOTO",
    "IF", "INPUT", "INTEGER", "LET", "LONG", "LOOP", "MOD", "NEXT", "NOT",
    "OPEN", "OR", "OUTPUT", "PRINT", "READ", "RESTORE", "RETURN", "SHARED",
    "SINGLE", "STEP", "STRING", "SUB", "THEN", "TO", "TYPE", "UNTIL",
    "USING", "WEND", "WHILE", "WRITE",
];

const OPERATORS: &[&str] = &[
    "<=", ">=", "<>", "+", "-", "*", "/", "^", "(", ")", ",", ";", ":",
    "=", "<", ">", ".", "#",
];

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub id: &'static str,
    pub text: String,
    pub locus: Locus,
}

impl Token {
    pub fn eof(locus: Locus) -> Self {
        Self { id: EOF, text: String::new(), locus }
    }

    pub fn is_eof(&self) -> bool {
        self.id == EOF
    }
}

pub struct Tokenizer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: u32,
    col: u32,
}

impl<'a> Tokenizer<'a> {
    pub fn new(src: &'a str) -> Self {
        Self { chars: src.chars().peekable(), line: 1, col: 1 }
    }

    /// Restart tokenizing from a given (line, column) position. Skips
    /// `line - 1` physical lines, then `col - 1` characters.
    pub fn from_position(src: &'a str, line: u32, col: u32) -> Self {
        let mut t = Self::new(src);
        while t.line < line {
            match t.bump() {
                Some(_) => {}
                None => break,
            }
        }
        while t.line == line && t.col < col && t.chars.peek().is_some() {
            t.bump();
        }
        t
    }

    /// Collect every remaining token, ending with the EOF token.
    pub fn tokenize(mut self) -> Result<Vec<Token>, CompileError> {
        let mut out = Vec::new();
        loop {
            let t = self.next_token()?;
            let eof = t.is_eof();
            out.push(t);
            if eof {
                break;
            }
        }
        Ok(out)
    }

    pub fn next_token(&mut self) -> Result<Token, CompileError> {
        loop {
            self.skip_blank();
            let locus = self.locus();
            let ch = match self.chars.peek() {
                Some(c) => *c,
                None => return Ok(Token::eof(locus)),
            };
            if ch == '\n' {
                self.bump();
                return Ok(self.make(NEWLINE, "\n", locus));
            }
            if ch == '\'' {
                self.skip_to_eol();
                continue;
            }
            if ch == '"' {
                return self.string(locus);
            }
            if ch.is_ascii_digit() || (ch == '.' && self.peek_second_is_digit()) {
                return Ok(self.number(locus));
            }
            if ch.is_ascii_alphabetic() {
                match self.word(locus) {
                    Some(tok) => return Ok(tok),
                    None => continue, // REM comment swallowed
                }
            }
            if let Some(tok) = self.operator(locus) {
                return Ok(tok);
            }
            return Err(CompileError::new("Bad character", locus));
        }
    }

    fn locus(&self) -> Locus {
        Locus::new(self.line, self.col)
    }

    fn make(&self, id: &'static str, text: impl Into<String>, locus: Locus) -> Token {
        Token { id, text: text.into(), locus }
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(c)
    }

    fn skip_blank(&mut self) {
        while let Some(c) = self.chars.peek() {
            if *c == ' ' || *c == '\t' || *c == '\r' {
                self.bump();
            } else {
                break;
            }
        }
    }

    fn skip_to_eol(&mut self) {
        while let Some(c) = self.chars.peek() {
            if *c == '\n' {
                break;
            }
            self.bump();
        }
    }

    fn peek_second_is_digit(&self) -> bool {
        let mut it = self.chars.clone();
        it.next();
        it.next().map_or(false, |c| c.is_ascii_digit())
    }

    fn string(&mut self, locus: Locus) -> Result<Token, CompileError> {
        self.bump(); // opening quote
        let mut s = String::new();
        loop {
            match self.chars.peek() {
                Some('"') => {
                    self.bump();
                    return Ok(self.make(STRING_LIT, s, locus));
                }
                Some('\n') | None => {
                    return Err(CompileError::new("Unterminated string", locus));
                }
                Some(_) => {
                    s.push(self.bump().unwrap());
                }
            }
        }
    }

    fn number(&mut self, locus: Locus) -> Token {
        let mut s = String::new();
        let mut seen_dot = false;
        let mut seen_exp = false;
        while let Some(c) = self.chars.peek() {
            let c = *c;
            if c.is_ascii_digit() {
                s.push(c);
                self.bump();
            } else if c == '.' && !seen_dot && !seen_exp {
                seen_dot = true;
                s.push(c);
                self.bump();
            } else if (c == 'e' || c == 'E') && !seen_exp && self.exp_follows() {
                seen_exp = true;
                s.push('E');
                self.bump();
                if let Some(sign) = self.chars.peek() {
                    if *sign == '+' || *sign == '-' {
                        s.push(*sign);
                        self.bump();
                    }
                }
            } else {
                break;
            }
        }
        // A trailing type sigil on a literal is consumed and dropped; the
        // literal's shape already decides integer vs floating.
        if let Some(c) = self.chars.peek() {
            if matches!(*c, '%' | '&' | '!' | '#') {
                self.bump();
            }
        }
        self.make(NUMBER, s, locus)
    }

    fn exp_follows(&self) -> bool {
        let mut it = self.chars.clone();
        it.next(); // the E itself
        match it.next() {
            Some(c) if c.is_ascii_digit() => true,
            Some('+') | Some('-') => it.next().map_or(false, |c| c.is_ascii_digit()),
            _ => false,
        }
    }

    /// Scan a keyword or identifier. Returns `None` when the word opened a
    /// `REM` comment (the rest of the line is swallowed).
    fn word(&mut self, locus: Locus) -> Option<Token> {
        let mut s = String::new();
        while let Some(c) = self.chars.peek() {
            let c = *c;
            if c.is_ascii_alphanumeric() || c == '_' {
                s.push(c.to_ascii_uppercase());
                self.bump();
            } else if matches!(c, '%' | '&' | '!' | '#' | '$') {
                s.push(c);
                self.bump();
                return Some(self.make(IDENT, s, locus));
            } else {
                break;
            }
        }
        if s == "REM" {
            self.skip_to_eol();
            return None;
        }
        if let Some(kw) = KEYWORDS.iter().find(|k| **k == s) {
            return Some(self.make(kw, s, locus));
        }
        Some(self.make(IDENT, s, locus))
    }

    fn operator(&mut self, locus: Locus) -> Option<Token> {
        for op in OPERATORS {
            if self.starts_with(op) {
                for _ in 0..op.len() {
                    self.bump();
                }
                return Some(self.make(op, *op, locus));
            }
        }
        None
    }

    fn starts_with(&self, op: &str) -> bool {
        let mut it = self.chars.clone();
        op.chars().all(|c| it.next() == Some(c))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(src: &str) -> Vec<&'static str> {
        Tokenizer::new(src).tokenize().unwrap().iter().map(|t| t.id).collect()
    }

    #[test]
    fn keywords_and_identifiers() {
        let toks = Tokenizer::new("PRINT hello$").tokenize().unwrap();
        assert_eq!(toks[0].id, "PRINT");
        assert_eq!(toks[1].id, IDENT);
        assert_eq!(toks[1].text, "HELLO$");
        assert!(toks[2].is_eof());
        assert_eq!(toks[2].text, "");
    }

    #[test]
    fn case_insensitive_keywords() {
        assert_eq!(ids("print While wEnD"), vec!["PRINT", "WHILE", "WEND", EOF]);
    }

    #[test]
    fn sigils_terminate_identifiers() {
        let toks = Tokenizer::new("a%b").tokenize().unwrap();
        assert_eq!(toks[0].text, "A%");
        assert_eq!(toks[1].text, "B");
    }

    #[test]
    fn multi_char_operators() {
        assert_eq!(ids("a <= b <> c >= d"), vec![IDENT, "<=", IDENT, "<>", IDENT, ">=", IDENT, EOF]);
    }

    #[test]
    fn numbers() {
        let toks = Tokenizer::new("42 3.14 1E6 2.5E-3 7#").tokenize().unwrap();
        let texts: Vec<&str> = toks.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["42", "3.14", "1E6", "2.5E-3", "7", ""]);
    }

    #[test]
    fn comments_are_stripped() {
        assert_eq!(ids("PRINT 1 ' trailing\nREM whole line\nPRINT 2"),
            vec!["PRINT", NUMBER, NEWLINE, NEWLINE, "PRINT", NUMBER, EOF]);
    }

    #[test]
    fn newline_and_colon_are_tokens() {
        assert_eq!(ids("A = 1: B = 2\nC = 3"),
            vec![IDENT, "=", NUMBER, ":", IDENT, "=", NUMBER, NEWLINE, IDENT, "=", NUMBER, EOF]);
    }

    #[test]
    fn locus_tracks_lines_and_columns() {
        let toks = Tokenizer::new("A = 1\n  B = 2").tokenize().unwrap();
        assert_eq!(toks[0].locus, Locus::new(1, 1));
        assert_eq!(toks[4].locus, Locus::new(2, 3)); // B
    }

    #[test]
    fn bad_character_reports_locus() {
        let err = Tokenizer::new("PRINT @").tokenize().unwrap_err();
        assert_eq!(err.to_string(), "Bad character at 1:7");
    }

    #[test]
    fn unterminated_string() {
        let err = Tokenizer::new("A$ = \"oops").tokenize().unwrap_err();
        assert_eq!(err.message, "Unterminated string");
    }

    #[test]
    fn restart_from_position() {
        let src = "A = 1\nB = 2\nC = 3";
        let toks = Tokenizer::from_position(src, 2, 1).tokenize().unwrap();
        assert_eq!(toks[0].text, "B");
        assert_eq!(toks[0].locus, Locus::new(2, 1));
    }
}
