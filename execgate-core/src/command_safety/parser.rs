//! Quote-aware lexer for the shell subset accepted by the gate.
//!
//! The parser understands simple commands joined by `|`, `&&`, `||`, `;` and
//! `&`, single and double quotes, backslash escapes, `NAME=value` prefixes and
//! the redirections `>`, `>>`, `<` and `>&` with an optional fd. Anything it
//! cannot reason about (heredocs, process substitution, subshell groups) is
//! rejected rather than guessed at.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Reasons a command string cannot be turned into a [`CommandRequest`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("command is empty")]
    Empty,

    #[error("unbalanced {quote} quote")]
    UnbalancedQuote { quote: char },

    #[error("trailing backslash escape")]
    TrailingEscape,

    #[error("unbalanced `{open}` command substitution")]
    UnbalancedSubstitution { open: &'static str },

    #[error("unsupported shell syntax: {0}")]
    Unsupported(&'static str),

    #[error("redirection `{op}` is missing a target")]
    DanglingRedirection { op: &'static str },

    #[error("missing command next to `{operator}`")]
    MissingCommand { operator: Operator },
}

/// Control operator between two simple commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Pipe,
    And,
    Or,
    Sequence,
    Background,
}

impl Operator {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pipe => "|",
            Self::And => "&&",
            Self::Or => "||",
            Self::Sequence => ";",
            Self::Background => "&",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RedirectionKind {
    /// `>`
    Write,
    /// `>>`
    Append,
    /// `<`
    Read,
    /// `>&`
    Duplicate,
}

impl RedirectionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Write => ">",
            Self::Append => ">>",
            Self::Read => "<",
            Self::Duplicate => ">&",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Redirection {
    /// Index of the segment the redirection belongs to.
    pub segment: usize,
    pub fd: Option<u32>,
    pub kind: RedirectionKind,
    pub target: String,
}

impl Redirection {
    /// `<fd><op><target>`, the form dangerous patterns are matched against.
    pub fn render(&self) -> String {
        match self.fd {
            Some(fd) => format!("{fd}{}{}", self.kind.as_str(), self.target),
            None => format!("{}{}", self.kind.as_str(), self.target),
        }
    }
}

/// One simple command: leading environment assignments plus argv.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSegment {
    pub env: Vec<(String, String)>,
    pub argv: Vec<String>,
}

impl CommandSegment {
    pub fn program(&self) -> &str {
        self.argv.first().map(String::as_str).unwrap_or_default()
    }
}

/// A parsed, immutable command request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandRequest {
    pub raw: String,
    pub segments: Vec<CommandSegment>,
    pub operators: Vec<Operator>,
    pub redirections: Vec<Redirection>,
    pub cwd: PathBuf,
    pub justification: Option<String>,
    expands: bool,
}

impl CommandRequest {
    /// argv of the first simple command.
    pub fn argv(&self) -> &[String] {
        self.segments
            .first()
            .map(|segment| segment.argv.as_slice())
            .unwrap_or_default()
    }

    /// True when the command cannot be executed as a plain argv and must be
    /// handed to `/bin/sh -c`.
    pub fn requires_shell(&self) -> bool {
        self.expands
            || !self.operators.is_empty()
            || !self.redirections.is_empty()
            || self.segments.iter().any(|segment| !segment.env.is_empty())
    }

    /// Every word, operator and rendered redirection, in source order per kind.
    pub fn scan_tokens(&self) -> Vec<String> {
        let mut tokens = Vec::new();
        for segment in &self.segments {
            tokens.extend(
                segment
                    .env
                    .iter()
                    .map(|(name, value)| format!("{name}={value}")),
            );
            tokens.extend(segment.argv.iter().cloned());
        }
        tokens.extend(self.operators.iter().map(|op| op.as_str().to_owned()));
        tokens.extend(self.redirections.iter().map(Redirection::render));
        tokens
    }
}

/// Parse `raw` into a [`CommandRequest`] rooted at `cwd`.
pub fn parse_command(
    raw: &str,
    cwd: impl AsRef<Path>,
    justification: Option<String>,
) -> Result<CommandRequest, ParseError> {
    let tokens = Lexer::new(raw).run()?;
    let mut request = assemble(tokens)?;
    request.raw = raw.trim().to_owned();
    request.cwd = cwd.as_ref().to_path_buf();
    request.justification = justification;
    Ok(request)
}

#[derive(Debug, PartialEq, Eq)]
enum Token {
    Word { text: String, expands: bool },
    Op(Operator),
    Redirect { fd: Option<u32>, kind: RedirectionKind },
    Newline,
}

struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    tokens: Vec<Token>,
    word: String,
    // true once the current word has any content, including empty quotes
    in_word: bool,
    quoted: bool,
    expands: bool,
}

impl<'a> Lexer<'a> {
    fn new(raw: &'a str) -> Self {
        Self {
            chars: raw.chars().peekable(),
            tokens: Vec::new(),
            word: String::new(),
            in_word: false,
            quoted: false,
            expands: false,
        }
    }

    fn run(mut self) -> Result<Vec<Token>, ParseError> {
        while let Some(ch) = self.chars.next() {
            match ch {
                ' ' | '\t' | '\r' => self.finish_word(),
                '\n' => {
                    self.finish_word();
                    self.tokens.push(Token::Newline);
                }
                '#' if !self.in_word => {
                    while self.chars.peek().is_some_and(|c| *c != '\n') {
                        self.chars.next();
                    }
                }
                '\'' => {
                    self.in_word = true;
                    self.quoted = true;
                    loop {
                        match self.chars.next() {
                            Some('\'') => break,
                            Some(c) => self.word.push(c),
                            None => return Err(ParseError::UnbalancedQuote { quote: '\'' }),
                        }
                    }
                }
                '"' => self.double_quoted()?,
                '\\' => match self.chars.next() {
                    Some('\n') => {}
                    Some(c) => {
                        self.in_word = true;
                        self.quoted = true;
                        self.word.push(c);
                    }
                    None => return Err(ParseError::TrailingEscape),
                },
                '`' => {
                    self.in_word = true;
                    self.expands = true;
                    self.backtick()?;
                }
                '$' if self.chars.peek() == Some(&'(') => {
                    self.in_word = true;
                    self.expands = true;
                    self.command_substitution()?;
                }
                '$' | '*' | '?' | '[' => {
                    self.in_word = true;
                    self.expands = true;
                    self.word.push(ch);
                }
                '~' if !self.in_word => {
                    self.in_word = true;
                    self.expands = true;
                    self.word.push(ch);
                }
                '(' | ')' => return Err(ParseError::Unsupported("subshell grouping")),
                '|' => {
                    self.finish_word();
                    if self.chars.next_if_eq(&'|').is_some() {
                        self.push_op(Operator::Or);
                    } else {
                        self.push_op(Operator::Pipe);
                    }
                }
                '&' => {
                    self.finish_word();
                    if self.chars.next_if_eq(&'&').is_some() {
                        self.push_op(Operator::And);
                    } else if self.chars.peek() == Some(&'>') {
                        return Err(ParseError::Unsupported("`&>` redirection"));
                    } else {
                        self.push_op(Operator::Background);
                    }
                }
                ';' => {
                    self.finish_word();
                    if self.chars.peek() == Some(&';') {
                        return Err(ParseError::Unsupported("`;;` case terminator"));
                    }
                    self.push_op(Operator::Sequence);
                }
                '>' => {
                    let fd = self.take_fd();
                    let kind = if self.chars.next_if_eq(&'>').is_some() {
                        RedirectionKind::Append
                    } else if self.chars.next_if_eq(&'&').is_some() {
                        RedirectionKind::Duplicate
                    } else if self.chars.peek() == Some(&'(') {
                        return Err(ParseError::Unsupported("process substitution"));
                    } else {
                        // `>|` clobbers like `>`
                        let _ = self.chars.next_if_eq(&'|');
                        RedirectionKind::Write
                    };
                    self.tokens.push(Token::Redirect { fd, kind });
                }
                '<' => {
                    let fd = self.take_fd();
                    match self.chars.peek() {
                        Some('<') => return Err(ParseError::Unsupported("heredoc")),
                        Some('(') => return Err(ParseError::Unsupported("process substitution")),
                        Some('&') => return Err(ParseError::Unsupported("`<&` redirection")),
                        _ => {}
                    }
                    self.tokens.push(Token::Redirect {
                        fd,
                        kind: RedirectionKind::Read,
                    });
                }
                _ => {
                    self.in_word = true;
                    self.word.push(ch);
                }
            }
        }
        self.finish_word();
        Ok(self.tokens)
    }

    fn double_quoted(&mut self) -> Result<(), ParseError> {
        self.in_word = true;
        self.quoted = true;
        loop {
            match self.chars.next() {
                Some('"') => return Ok(()),
                Some('\\') => match self.chars.next() {
                    Some(c @ ('$' | '`' | '"' | '\\')) => self.word.push(c),
                    Some('\n') => {}
                    Some(c) => {
                        self.word.push('\\');
                        self.word.push(c);
                    }
                    None => return Err(ParseError::UnbalancedQuote { quote: '"' }),
                },
                Some('`') => {
                    self.expands = true;
                    self.backtick()?;
                }
                Some('$') if self.chars.peek() == Some(&'(') => {
                    self.expands = true;
                    self.command_substitution()?;
                }
                Some('$') => {
                    self.expands = true;
                    self.word.push('$');
                }
                Some(c) => self.word.push(c),
                None => return Err(ParseError::UnbalancedQuote { quote: '"' }),
            }
        }
    }

    /// Copies a `` `...` `` substitution verbatim into the current word.
    fn backtick(&mut self) -> Result<(), ParseError> {
        self.word.push('`');
        loop {
            match self.chars.next() {
                Some('`') => {
                    self.word.push('`');
                    return Ok(());
                }
                Some('\\') => {
                    self.word.push('\\');
                    if let Some(c) = self.chars.next() {
                        self.word.push(c);
                    }
                }
                Some(c) => self.word.push(c),
                None => return Err(ParseError::UnbalancedSubstitution { open: "`" }),
            }
        }
    }

    /// Copies a `$( ... )` substitution verbatim, tracking nested parens.
    fn command_substitution(&mut self) -> Result<(), ParseError> {
        // consume the `(` following `$`
        self.chars.next();
        self.word.push_str("$(");
        let mut depth = 1usize;
        let mut quote: Option<char> = None;
        while let Some(c) = self.chars.next() {
            self.word.push(c);
            match (quote, c) {
                (Some(q), c) if c == q => quote = None,
                (Some(_), _) => {}
                (None, '\'' | '"') => quote = Some(c),
                (None, '(') => depth += 1,
                (None, ')') => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(());
                    }
                }
                (None, _) => {}
            }
        }
        Err(ParseError::UnbalancedSubstitution { open: "$(" })
    }

    /// Digits immediately before a redirection operator are its fd.
    fn take_fd(&mut self) -> Option<u32> {
        let fd = if self.in_word
            && !self.quoted
            && !self.expands_in_word()
            && !self.word.is_empty()
            && self.word.bytes().all(|b| b.is_ascii_digit())
        {
            let fd = self.word.parse().ok();
            self.word.clear();
            self.in_word = false;
            fd
        } else {
            None
        };
        self.finish_word();
        fd
    }

    fn expands_in_word(&self) -> bool {
        self.word.contains(['$', '*', '?', '[', '`', '~'])
    }

    fn push_op(&mut self, op: Operator) {
        self.tokens.push(Token::Op(op));
    }

    fn finish_word(&mut self) {
        if self.in_word {
            self.tokens.push(Token::Word {
                text: std::mem::take(&mut self.word),
                expands: self.expands,
            });
        }
        self.in_word = false;
        self.quoted = false;
        self.expands = false;
    }
}

fn is_assignment(word: &str) -> bool {
    let Some((name, _)) = word.split_once('=') else {
        return false;
    };
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[derive(Default)]
struct Assembler {
    segments: Vec<CommandSegment>,
    operators: Vec<Operator>,
    redirections: Vec<Redirection>,
    current: CommandSegment,
    // operator waiting for the segment on its right-hand side
    pending: Option<Operator>,
    expands: bool,
}

impl Assembler {
    fn current_is_blank(&self) -> bool {
        self.current.argv.is_empty()
            && self.current.env.is_empty()
            && self
                .redirections
                .last()
                .is_none_or(|r| r.segment < self.segments.len())
    }

    fn push_word(&mut self, text: String) {
        if self.current.argv.is_empty() && is_assignment(&text) {
            if let Some((name, value)) = text.split_once('=') {
                self.current.env.push((name.to_owned(), value.to_owned()));
            }
        } else {
            self.current.argv.push(text);
        }
    }

    fn close_segment(&mut self, op: Operator) -> Result<(), ParseError> {
        if self.current.argv.is_empty() {
            return Err(ParseError::MissingCommand {
                operator: self.pending.unwrap_or(op),
            });
        }
        self.segments.push(std::mem::take(&mut self.current));
        if let Some(prev) = self.pending.replace(op) {
            self.operators.push(prev);
        }
        Ok(())
    }

    fn finish(mut self) -> Result<CommandRequest, ParseError> {
        if self.current.argv.is_empty() {
            if !self.current.env.is_empty() {
                return Err(ParseError::Unsupported("assignment without a command"));
            }
            if !self.current_is_blank() {
                return Err(ParseError::Unsupported("redirection without a command"));
            }
            match self.pending {
                // a trailing `;` is harmless
                Some(Operator::Sequence) | None => {}
                Some(op) => return Err(ParseError::MissingCommand { operator: op }),
            }
        } else {
            self.segments.push(std::mem::take(&mut self.current));
            if let Some(prev) = self.pending.take() {
                self.operators.push(prev);
            }
        }

        if self.segments.is_empty() {
            return Err(ParseError::Empty);
        }

        Ok(CommandRequest {
            raw: String::new(),
            segments: self.segments,
            operators: self.operators,
            redirections: self.redirections,
            cwd: PathBuf::new(),
            justification: None,
            expands: self.expands,
        })
    }
}

fn assemble(tokens: Vec<Token>) -> Result<CommandRequest, ParseError> {
    let mut asm = Assembler::default();
    let mut tokens = tokens.into_iter().peekable();

    while let Some(token) = tokens.next() {
        match token {
            Token::Word { text, expands } => {
                asm.expands |= expands;
                asm.push_word(text);
            }
            Token::Redirect { fd, kind } => {
                let Some(Token::Word { text, expands }) =
                    tokens.next_if(|t| matches!(t, Token::Word { .. }))
                else {
                    return Err(ParseError::DanglingRedirection { op: kind.as_str() });
                };
                asm.expands |= expands;
                asm.redirections.push(Redirection {
                    segment: asm.segments.len(),
                    fd,
                    kind,
                    target: text,
                });
            }
            // blank lines, and line breaks after `&&`, `|` etc.
            Token::Newline if asm.current_is_blank() => {}
            Token::Newline => asm.close_segment(Operator::Sequence)?,
            Token::Op(op) => asm.close_segment(op)?,
        }
    }

    asm.finish()
}
