//! Built-in executor for literal-assignment module scripts.
//!
//! A script is a sequence of `name = expression` statements. Expressions are
//! literals (numbers, strings, `True`/`False`/`None`, lists, string-keyed
//! dicts) or names bound by an earlier statement. Brackets may span lines;
//! `#` starts a comment.
//!
//! ```text
//! BASE_URL = "http://localhost:8000"
//! TIMEOUT = 30
//! ROUTES = {
//!     "states": ["getByCode", "list"],
//! }
//! DEFAULT_BASE = BASE_URL
//! ```

use std::collections::BTreeMap;

use tracing::trace;

use crate::executor::{ExecutionError, ModuleExecutor};
use crate::value::{Namespace, Value};

/// Executor for literal-assignment scripts.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScriptExecutor;

impl ScriptExecutor {
    pub fn new() -> Self {
        Self
    }
}

impl ModuleExecutor for ScriptExecutor {
    fn execute(
        &self,
        source: &[u8],
        origin: &str,
        namespace: &mut Namespace,
    ) -> Result<(), ExecutionError> {
        let text = std::str::from_utf8(source).map_err(|e| ExecutionError::Encoding {
            origin: origin.to_string(),
            message: e.to_string(),
        })?;
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);

        let mut pending = String::new();
        let mut start_line = 0;
        let mut depth: i64 = 0;

        for (index, line) in text.lines().enumerate() {
            if pending.is_empty() {
                if is_blank(line) {
                    continue;
                }
                start_line = index + 1;
            } else {
                pending.push('\n');
            }
            pending.push_str(line);
            depth += bracket_delta(line);

            if depth <= 0 {
                run_statement(&pending, start_line, origin, namespace)?;
                pending.clear();
                depth = 0;
            }
        }

        if !pending.is_empty() {
            run_statement(&pending, start_line, origin, namespace)?;
        }

        Ok(())
    }
}

fn is_blank(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.is_empty() || trimmed.starts_with('#')
}

/// Net bracket depth change of a line, ignoring strings and comments.
fn bracket_delta(line: &str) -> i64 {
    let mut delta = 0;
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for c in line.chars() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '#' => break,
            '"' | '\'' => quote = Some(c),
            '[' | '{' => delta += 1,
            ']' | '}' => delta -= 1,
            _ => {}
        }
    }

    delta
}

fn run_statement(
    text: &str,
    start_line: usize,
    origin: &str,
    namespace: &mut Namespace,
) -> Result<(), ExecutionError> {
    let tokens = tokenize(text, start_line).map_err(|(line, message)| ExecutionError::Syntax {
        origin: origin.to_string(),
        line,
        message,
    })?;

    let mut parser = Parser {
        tokens: &tokens,
        pos: 0,
        end_line: start_line + text.matches('\n').count(),
        depth: 0,
        origin,
        namespace: &*namespace,
    };
    let (name, value) = parser.statement()?;

    trace!("{}:{}: {} = {}", origin, start_line, name, value);
    namespace.insert(name, value);
    Ok(())
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Int(i64),
    Float(f64),
    Str(String),
    Punct(char),
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Self::Ident(name) => format!("'{name}'"),
            Self::Int(i) => format!("'{i}'"),
            Self::Float(f) => format!("'{f}'"),
            Self::Str(_) => "string literal".to_string(),
            Self::Punct(c) => format!("'{c}'"),
        }
    }
}

type Spanned = (Token, usize);

fn tokenize(text: &str, start_line: usize) -> Result<Vec<Spanned>, (usize, String)> {
    let mut tokens = Vec::new();
    let mut line = start_line;
    let mut chars = text.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            '\n' => {
                line += 1;
                chars.next();
            }
            c if c.is_whitespace() => {
                chars.next();
            }
            '#' => {
                while chars.peek().is_some_and(|&c| c != '\n') {
                    chars.next();
                }
            }
            '"' | '\'' => {
                chars.next();
                let mut value = String::new();
                loop {
                    match chars.next() {
                        None | Some('\n') => {
                            return Err((line, "unterminated string literal".to_string()));
                        }
                        Some('\\') => match chars.next() {
                            Some('n') => value.push('\n'),
                            Some('t') => value.push('\t'),
                            Some('r') => value.push('\r'),
                            Some('0') => value.push('\0'),
                            Some('\\') => value.push('\\'),
                            Some('\'') => value.push('\''),
                            Some('"') => value.push('"'),
                            Some(other) => {
                                return Err((line, format!("unknown escape sequence '\\{other}'")));
                            }
                            None => {
                                return Err((line, "unterminated string literal".to_string()));
                            }
                        },
                        Some(ch) if ch == c => break,
                        Some(ch) => value.push(ch),
                    }
                }
                tokens.push((Token::Str(value), line));
            }
            c if c.is_ascii_digit() => {
                let mut literal = String::new();
                let mut is_float = false;
                while let Some(&ch) = chars.peek() {
                    if ch.is_ascii_digit() || ch == '_' {
                        literal.push(ch);
                    } else if ch == '.' || ch == 'e' || ch == 'E' {
                        is_float = true;
                        literal.push(ch);
                    } else if (ch == '+' || ch == '-')
                        && literal.ends_with(['e', 'E'])
                    {
                        literal.push(ch);
                    } else {
                        break;
                    }
                    chars.next();
                }
                let cleaned = literal.replace('_', "");
                let token = if is_float {
                    cleaned
                        .parse::<f64>()
                        .map(Token::Float)
                        .map_err(|_| (line, format!("invalid number literal '{literal}'")))?
                } else {
                    cleaned
                        .parse::<i64>()
                        .map(Token::Int)
                        .map_err(|_| (line, format!("integer literal '{literal}' out of range")))?
                };
                tokens.push((token, line));
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut ident = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch.is_alphanumeric() || ch == '_' {
                        ident.push(ch);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push((Token::Ident(ident), line));
            }
            '=' | '[' | ']' | '{' | '}' | ',' | ':' | '-' => {
                chars.next();
                tokens.push((Token::Punct(c), line));
            }
            other => return Err((line, format!("unexpected character '{other}'"))),
        }
    }

    Ok(tokens)
}

/// Maximum depth of nested list and dict literals.
pub const MAX_NESTING: usize = 256;

const KEYWORDS: [&str; 6] = ["True", "False", "None", "true", "false", "null"];

struct Parser<'a> {
    tokens: &'a [Spanned],
    pos: usize,
    end_line: usize,
    depth: usize,
    origin: &'a str,
    namespace: &'a Namespace,
}

impl Parser<'_> {
    fn statement(&mut self) -> Result<(String, Value), ExecutionError> {
        let name = match self.next() {
            Some((Token::Ident(name), line)) => {
                if KEYWORDS.contains(&name.as_str()) {
                    return Err(self.syntax(line, format!("cannot assign to {name}")));
                }
                name
            }
            Some((token, line)) => {
                return Err(self.syntax(
                    line,
                    format!("expected a name, found {}", token.describe()),
                ));
            }
            None => return Err(self.syntax(self.end_line, "expected a statement")),
        };

        self.expect('=')?;
        let value = self.expression()?;

        if let Some((token, line)) = self.next() {
            return Err(self.syntax(
                line,
                format!("unexpected {} after expression", token.describe()),
            ));
        }

        Ok((name, value))
    }

    fn expression(&mut self) -> Result<Value, ExecutionError> {
        let Some((token, line)) = self.next() else {
            return Err(self.syntax(self.end_line, "unexpected end of input"));
        };

        match token {
            Token::Int(i) => Ok(Value::Int(i)),
            Token::Float(f) => Ok(Value::Float(f)),
            Token::Str(s) => Ok(Value::Str(s)),
            Token::Punct('-') => match self.next() {
                Some((Token::Int(i), _)) => Ok(Value::Int(-i)),
                Some((Token::Float(f), _)) => Ok(Value::Float(-f)),
                _ => Err(self.syntax(line, "'-' must be followed by a number")),
            },
            Token::Punct('[') => self.nested(line, Self::list),
            Token::Punct('{') => self.nested(line, Self::dict),
            Token::Ident(name) => match name.as_str() {
                "True" | "true" => Ok(Value::Bool(true)),
                "False" | "false" => Ok(Value::Bool(false)),
                "None" | "null" => Ok(Value::None),
                _ => self.namespace.get(&name).cloned().ok_or_else(|| {
                    ExecutionError::Name {
                        origin: self.origin.to_string(),
                        line,
                        name,
                    }
                }),
            },
            other => Err(self.syntax(line, format!("unexpected {}", other.describe()))),
        }
    }

    fn nested(
        &mut self,
        line: usize,
        parse: fn(&mut Self) -> Result<Value, ExecutionError>,
    ) -> Result<Value, ExecutionError> {
        if self.depth >= MAX_NESTING {
            return Err(self.syntax(
                line,
                format!("nesting too deep (limit is {MAX_NESTING})"),
            ));
        }
        self.depth += 1;
        let value = parse(self);
        self.depth -= 1;
        value
    }

    fn list(&mut self) -> Result<Value, ExecutionError> {
        let mut items = Vec::new();
        loop {
            if self.eat(']') {
                return Ok(Value::List(items));
            }
            items.push(self.expression()?);
            if !self.eat(',') {
                self.expect(']')?;
                return Ok(Value::List(items));
            }
        }
    }

    fn dict(&mut self) -> Result<Value, ExecutionError> {
        let mut entries = BTreeMap::new();
        loop {
            if self.eat('}') {
                return Ok(Value::Dict(entries));
            }
            let key = match self.next() {
                Some((Token::Str(key), _)) => key,
                Some((token, line)) => {
                    return Err(self.syntax(
                        line,
                        format!("dict keys must be strings, found {}", token.describe()),
                    ));
                }
                None => return Err(self.syntax(self.end_line, "unexpected end of input")),
            };
            self.expect(':')?;
            let value = self.expression()?;
            entries.insert(key, value);
            if !self.eat(',') {
                self.expect('}')?;
                return Ok(Value::Dict(entries));
            }
        }
    }

    fn next(&mut self) -> Option<Spanned> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, punct: char) -> bool {
        if matches!(self.tokens.get(self.pos), Some((Token::Punct(c), _)) if *c == punct) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, punct: char) -> Result<(), ExecutionError> {
        match self.next() {
            Some((Token::Punct(c), _)) if c == punct => Ok(()),
            Some((token, line)) => Err(self.syntax(
                line,
                format!("expected '{punct}', found {}", token.describe()),
            )),
            None => Err(self.syntax(self.end_line, format!("expected '{punct}'"))),
        }
    }

    fn syntax(&self, line: usize, message: impl Into<String>) -> ExecutionError {
        ExecutionError::Syntax {
            origin: self.origin.to_string(),
            line,
            message: message.into(),
        }
    }
}
