//! Filter compiler
//!
//! Compiles the engine's jq-style filter language into an expression tree
//! the executor walks. Supported syntax, loosest binding first:
//!
//! ```text
//! pipe    := comma ('|' pipe)?
//! comma   := postfix (',' postfix)*
//! postfix := term suffix*
//! term    := '.' | '.name' | '."name"' | number | string | ident
//!          | '[' pipe? ']' | '{' entries? '}' | '(' pipe ')'
//! suffix  := '.name' | '."name"' | '[' ']' | '[' number ']' | '[' string ']' | '?'
//! ```

use std::fmt;
use std::rc::Rc;

/// Compilation failure reported by the engine
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub message: String,
    /// Byte offset into the program text
    pub offset: usize,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at offset {}", self.message, self.offset)
    }
}

// ============================================================================
// Expression Tree
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum IndexKey {
    Name(String),
    Position(i64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Empty,
    Length,
    Keys,
    Type,
    Not,
    ToJson,
    ToString,
    Error,
}

impl Builtin {
    fn lookup(name: &str) -> Option<Builtin> {
        Some(match name {
            "empty" => Builtin::Empty,
            "length" => Builtin::Length,
            "keys" => Builtin::Keys,
            "type" => Builtin::Type,
            "not" => Builtin::Not,
            "tojson" => Builtin::ToJson,
            "tostring" => Builtin::ToString,
            "error" => Builtin::Error,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ObjectKey {
    Name(String),
    Computed(Rc<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Identity,
    Literal(Literal),
    /// Index the input by name or position
    Index(IndexKey),
    /// Produce every element of the input
    Iterate,
    Pipe(Rc<Expr>, Rc<Expr>),
    Comma(Rc<Expr>, Rc<Expr>),
    /// `[f]`, or `[]` when empty
    Array(Option<Rc<Expr>>),
    Object(Vec<(ObjectKey, Rc<Expr>)>),
    /// `f?`: outputs of `f` up to its first error
    Try(Rc<Expr>),
    Builtin(Builtin),
}

/// A compiled filter
#[derive(Debug, Clone)]
pub struct Program {
    source: String,
    root: Rc<Expr>,
}

impl Program {
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn root(&self) -> &Rc<Expr> {
        &self.root
    }
}

/// Deepest nesting of brackets, braces and parentheses a program may use
pub const MAX_DEPTH: usize = 256;

/// Compile filter text. An empty program is the identity.
pub fn compile(source: &str) -> Result<Program, Diagnostic> {
    let tokens = lex(source)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    if *parser.peek() == Token::Eof {
        return Ok(Program {
            source: source.to_string(),
            root: Rc::new(Expr::Identity),
        });
    }
    let root = parser.parse_pipe()?;
    match parser.peek() {
        Token::Eof => Ok(Program {
            source: source.to_string(),
            root,
        }),
        other => Err(parser.error(format!("syntax error, unexpected {}", other))),
    }
}

// ============================================================================
// Lexer
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Dot,
    Field(String),
    Ident(String),
    Str(String),
    Num(f64),
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    LParen,
    RParen,
    Pipe,
    Comma,
    Colon,
    Question,
    Eof,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Dot => write!(f, "'.'"),
            Token::Field(name) => write!(f, "'.{}'", name),
            Token::Ident(name) => write!(f, "'{}'", name),
            Token::Str(s) => write!(f, "string {:?}", s),
            Token::Num(x) => write!(f, "number {}", x),
            Token::LBracket => write!(f, "'['"),
            Token::RBracket => write!(f, "']'"),
            Token::LBrace => write!(f, "'{{'"),
            Token::RBrace => write!(f, "'}}'"),
            Token::LParen => write!(f, "'('"),
            Token::RParen => write!(f, "')'"),
            Token::Pipe => write!(f, "'|'"),
            Token::Comma => write!(f, "','"),
            Token::Colon => write!(f, "':'"),
            Token::Question => write!(f, "'?'"),
            Token::Eof => write!(f, "end of input"),
        }
    }
}

fn is_ident_start(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'_'
}

fn is_ident_char(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_'
}

fn lex(source: &str) -> Result<Vec<(Token, usize)>, Diagnostic> {
    let bytes = source.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i];
        let start = i;

        if c.is_ascii_whitespace() {
            i += 1;
            continue;
        }

        // Comments run to end of line
        if c == b'#' {
            while i < bytes.len() && bytes[i] != b'\n' {
                i += 1;
            }
            continue;
        }

        let token = match c {
            b'.' if i + 1 < bytes.len() && is_ident_start(bytes[i + 1]) => {
                i += 1;
                let name_start = i;
                while i < bytes.len() && is_ident_char(bytes[i]) {
                    i += 1;
                }
                Token::Field(source[name_start..i].to_string())
            }
            b'.' => {
                i += 1;
                Token::Dot
            }
            b'"' => {
                i += 1;
                while i < bytes.len() && bytes[i] != b'"' {
                    if bytes[i] == b'\\' {
                        i += 1;
                    }
                    i += 1;
                }
                if i >= bytes.len() {
                    return Err(Diagnostic {
                        message: "unterminated string literal".to_string(),
                        offset: start,
                    });
                }
                i += 1;
                let text: String = serde_json::from_str(&source[start..i]).map_err(|e| Diagnostic {
                    message: format!("invalid string literal: {}", e),
                    offset: start,
                })?;
                Token::Str(text)
            }
            b'0'..=b'9' | b'-' => {
                i += 1;
                while i < bytes.len()
                    && (bytes[i].is_ascii_digit()
                        || bytes[i] == b'.'
                        || bytes[i] == b'e'
                        || bytes[i] == b'E'
                        || ((bytes[i] == b'+' || bytes[i] == b'-')
                            && matches!(bytes[i - 1], b'e' | b'E')))
                {
                    i += 1;
                }
                let x: f64 = source[start..i].parse().map_err(|_| Diagnostic {
                    message: format!("invalid numeric literal '{}'", &source[start..i]),
                    offset: start,
                })?;
                Token::Num(x)
            }
            c if is_ident_start(c) => {
                while i < bytes.len() && is_ident_char(bytes[i]) {
                    i += 1;
                }
                Token::Ident(source[start..i].to_string())
            }
            _ => {
                i += 1;
                match c {
                    b'[' => Token::LBracket,
                    b']' => Token::RBracket,
                    b'{' => Token::LBrace,
                    b'}' => Token::RBrace,
                    b'(' => Token::LParen,
                    b')' => Token::RParen,
                    b'|' => Token::Pipe,
                    b',' => Token::Comma,
                    b':' => Token::Colon,
                    b'?' => Token::Question,
                    _ => {
                        let ch = source[start..].chars().next().unwrap_or('?');
                        return Err(Diagnostic {
                            message: format!("unexpected character '{}'", ch),
                            offset: start,
                        });
                    }
                }
            }
        };
        tokens.push((token, start));
    }

    tokens.push((Token::Eof, source.len()));
    Ok(tokens)
}

// ============================================================================
// Parser
// ============================================================================

struct Parser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        self.tokens
            .get(self.pos)
            .map(|(token, _)| token)
            .unwrap_or(&Token::Eof)
    }

    fn offset(&self) -> usize {
        self.tokens.get(self.pos).map(|(_, offset)| *offset).unwrap_or(0)
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn error(&self, message: String) -> Diagnostic {
        Diagnostic {
            message,
            offset: self.offset(),
        }
    }

    fn expect(&mut self, expected: Token) -> Result<(), Diagnostic> {
        if *self.peek() == expected {
            self.advance();
            Ok(())
        } else {
            Err(self.error(format!(
                "syntax error, expected {} but found {}",
                expected,
                self.peek()
            )))
        }
    }

    /// Pipe is right-associative: `a | b | c` is `a | (b | c)`
    fn parse_pipe(&mut self) -> Result<Rc<Expr>, Diagnostic> {
        let mut stages = vec![self.parse_comma()?];
        while *self.peek() == Token::Pipe {
            self.advance();
            stages.push(self.parse_comma()?);
        }
        let mut expr = stages.pop().unwrap_or_else(|| Rc::new(Expr::Identity));
        while let Some(left) = stages.pop() {
            expr = Rc::new(Expr::Pipe(left, expr));
        }
        Ok(expr)
    }

    fn parse_comma(&mut self) -> Result<Rc<Expr>, Diagnostic> {
        let mut left = self.parse_postfix()?;
        while *self.peek() == Token::Comma {
            self.advance();
            let right = self.parse_postfix()?;
            left = Rc::new(Expr::Comma(left, right));
        }
        Ok(left)
    }

    fn parse_postfix(&mut self) -> Result<Rc<Expr>, Diagnostic> {
        let mut term = self.parse_term()?;
        loop {
            let step = match self.peek().clone() {
                Token::Field(name) => {
                    self.advance();
                    Expr::Index(IndexKey::Name(name))
                }
                Token::Dot => {
                    self.advance();
                    match self.advance() {
                        Token::Str(name) => Expr::Index(IndexKey::Name(name)),
                        Token::LBracket => self.parse_bracket()?,
                        other => {
                            return Err(self.error(format!("syntax error, unexpected {}", other)))
                        }
                    }
                }
                Token::LBracket => {
                    self.advance();
                    self.parse_bracket()?
                }
                Token::Question => {
                    self.advance();
                    // f?? is f?
                    if !matches!(term.as_ref(), Expr::Try(_)) {
                        term = Rc::new(Expr::Try(term));
                    }
                    continue;
                }
                _ => break,
            };
            term = chain(term, step);
        }
        Ok(term)
    }

    /// Body of a bracket suffix; the opening '[' is already consumed
    fn parse_bracket(&mut self) -> Result<Expr, Diagnostic> {
        let step = match self.advance() {
            Token::RBracket => return Ok(Expr::Iterate),
            Token::Num(x) if x.fract() == 0.0 => Expr::Index(IndexKey::Position(x as i64)),
            Token::Str(name) => Expr::Index(IndexKey::Name(name)),
            other => {
                return Err(self.error(format!("unsupported index expression {}", other)));
            }
        };
        self.expect(Token::RBracket)?;
        Ok(step)
    }

    fn parse_term(&mut self) -> Result<Rc<Expr>, Diagnostic> {
        if self.depth >= MAX_DEPTH {
            return Err(self.error("syntax error, program too deeply nested".to_string()));
        }
        self.depth += 1;
        let term = self.parse_atom();
        self.depth -= 1;
        term
    }

    fn parse_atom(&mut self) -> Result<Rc<Expr>, Diagnostic> {
        let offset = self.offset();
        let expr = match self.advance() {
            Token::Dot => {
                if let Token::Str(name) = self.peek().clone() {
                    self.advance();
                    Expr::Index(IndexKey::Name(name))
                } else {
                    Expr::Identity
                }
            }
            Token::Field(name) => Expr::Index(IndexKey::Name(name)),
            Token::Num(x) => Expr::Literal(Literal::Number(x)),
            Token::Str(s) => Expr::Literal(Literal::String(s)),
            Token::Ident(name) => match name.as_str() {
                "null" => Expr::Literal(Literal::Null),
                "true" => Expr::Literal(Literal::Bool(true)),
                "false" => Expr::Literal(Literal::Bool(false)),
                other => match Builtin::lookup(other) {
                    Some(builtin) => Expr::Builtin(builtin),
                    None => {
                        return Err(Diagnostic {
                            message: format!("{}/0 is not defined", other),
                            offset,
                        })
                    }
                },
            },
            Token::LBracket => {
                if *self.peek() == Token::RBracket {
                    self.advance();
                    Expr::Array(None)
                } else {
                    let body = self.parse_pipe()?;
                    self.expect(Token::RBracket)?;
                    Expr::Array(Some(body))
                }
            }
            Token::LBrace => self.parse_object()?,
            Token::LParen => {
                let body = self.parse_pipe()?;
                self.expect(Token::RParen)?;
                return Ok(body);
            }
            other => {
                return Err(Diagnostic {
                    message: format!("syntax error, unexpected {}", other),
                    offset,
                })
            }
        };
        Ok(Rc::new(expr))
    }

    /// Object construction; the opening '{' is already consumed
    fn parse_object(&mut self) -> Result<Expr, Diagnostic> {
        let mut entries = Vec::new();
        if *self.peek() == Token::RBrace {
            self.advance();
            return Ok(Expr::Object(entries));
        }

        loop {
            let key = match self.advance() {
                Token::Ident(name) | Token::Str(name) => ObjectKey::Name(name),
                Token::LParen => {
                    let key = self.parse_pipe()?;
                    self.expect(Token::RParen)?;
                    ObjectKey::Computed(key)
                }
                other => {
                    return Err(self.error(format!("syntax error, unexpected {} in object", other)))
                }
            };

            let value = if *self.peek() == Token::Colon {
                self.advance();
                self.parse_postfix()?
            } else {
                match &key {
                    ObjectKey::Name(name) => Rc::new(Expr::Index(IndexKey::Name(name.clone()))),
                    ObjectKey::Computed(_) => {
                        return Err(self.error("computed object key requires a value".to_string()))
                    }
                }
            };
            entries.push((key, value));

            match self.advance() {
                Token::Comma => continue,
                Token::RBrace => break,
                other => {
                    return Err(self.error(format!("syntax error, unexpected {} in object", other)))
                }
            }
        }
        Ok(Expr::Object(entries))
    }
}

/// Apply `step` to the output of `term`
fn chain(term: Rc<Expr>, step: Expr) -> Rc<Expr> {
    if *term == Expr::Identity {
        Rc::new(step)
    } else {
        Rc::new(Expr::Pipe(term, Rc::new(step)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root(source: &str) -> Expr {
        compile(source).unwrap().root().as_ref().clone()
    }

    #[test]
    fn test_identity_and_fields() {
        assert_eq!(root("."), Expr::Identity);
        assert_eq!(root(".a"), Expr::Index(IndexKey::Name("a".into())));
        assert_eq!(root(".\"a b\""), Expr::Index(IndexKey::Name("a b".into())));
        assert_eq!(
            root(".a.b"),
            Expr::Pipe(
                Rc::new(Expr::Index(IndexKey::Name("a".into()))),
                Rc::new(Expr::Index(IndexKey::Name("b".into())))
            )
        );
    }

    #[test]
    fn test_brackets() {
        assert_eq!(root(".[]"), Expr::Iterate);
        assert_eq!(root(".[-1]"), Expr::Index(IndexKey::Position(-1)));
        assert_eq!(root(".[\"k\"]"), Expr::Index(IndexKey::Name("k".into())));
    }

    #[test]
    fn test_pipe_binds_looser_than_comma() {
        match root(".a, .b | length") {
            Expr::Pipe(left, right) => {
                assert!(matches!(left.as_ref(), Expr::Comma(_, _)));
                assert_eq!(right.as_ref(), &Expr::Builtin(Builtin::Length));
            }
            other => panic!("expected pipe, got {:?}", other),
        }
    }

    #[test]
    fn test_object_shorthand() {
        match root("{a, \"b\": 1, (.k): .v}") {
            Expr::Object(entries) => {
                assert_eq!(entries.len(), 3);
                assert_eq!(entries[0].0, ObjectKey::Name("a".into()));
                assert!(matches!(entries[2].0, ObjectKey::Computed(_)));
            }
            other => panic!("expected object, got {:?}", other),
        }
    }

    #[test]
    fn test_optional_suffix() {
        assert!(matches!(root(".a?"), Expr::Try(_)));
        match root(".a???") {
            Expr::Try(body) => assert!(!matches!(body.as_ref(), Expr::Try(_))),
            other => panic!("expected try, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_program_is_identity() {
        assert_eq!(root(""), Expr::Identity);
        assert_eq!(root("  # only a comment"), Expr::Identity);
    }

    #[test]
    fn test_nesting_limit() {
        let at_limit = format!("{}.{}", "[".repeat(MAX_DEPTH - 1), "]".repeat(MAX_DEPTH - 1));
        assert!(compile(&at_limit).is_ok());

        let too_deep = format!("{}.{}", "[".repeat(600), "]".repeat(600));
        let err = compile(&too_deep).unwrap_err();
        assert!(err.message.contains("too deeply nested"));

        let parens = format!("{}.{}", "(".repeat(10_000), ")".repeat(10_000));
        assert!(compile(&parens).is_err());
    }

    #[test]
    fn test_long_pipe_chain() {
        let chain = vec!["."; 1_000].join(" | ");
        assert!(compile(&chain).is_ok());
    }

    #[test]
    fn test_compile_errors() {
        assert!(compile(".[").is_err());
        assert!(compile("nosuchfn").is_err());
        assert!(compile("\"open").is_err());
        assert!(compile(". )").is_err());
        assert!(compile("{(.a)}").is_err());
        assert!(compile("@").is_err());
    }
}
