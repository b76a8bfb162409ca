use std::iter::Peekable;
use std::str::Chars;

use serde::Serialize;
use thiserror::Error;

/// What ended a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Terminator {
    /// Line ended in `{`: the statement opens a block.
    Open,
    /// A `}` closing the innermost block.
    Close,
    /// Statement ended in `;`.
    Statement,
    /// Statement ended at a line break with no terminator.
    Newline,
}

/// One statement of configuration text: first word is the keyword.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Token {
    /// 1-based line the statement starts on.
    pub line: usize,
    pub keyword: String,
    pub args: Vec<String>,
    pub terminator: Terminator,
    /// Statement was prefixed with `inactive:`.
    pub inactive: bool,
}

impl Token {
    pub fn arg(&self, idx: usize) -> Option<&str> {
        self.args.get(idx).map(String::as_str)
    }
}

/// Errors raised while splitting text into tokens.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenizeError {
    #[error("line {line}: unterminated quoted string")]
    UnterminatedQuote { line: usize },
    #[error("line {line}: unterminated comment")]
    UnterminatedComment { line: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LexState {
    Between,
    Quoted,
    LineComment,
    BlockComment,
}

/// Split brace-delimited configuration text into statement tokens.
///
/// `[` and `]` only delimit words; list contents become plain arguments.
/// Line breaks inside a `[ ... ]` list do not end the statement.
pub fn tokenize(text: &str) -> Result<Vec<Token>, TokenizeError> {
    let mut lexer = Lexer::new();
    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        lexer.step(ch, &mut chars);
    }
    lexer.finish()
}

struct Lexer {
    tokens: Vec<Token>,
    words: Vec<String>,
    word: String,
    state: LexState,
    line: usize,
    start_line: usize,
    state_line: usize,
    brackets: usize,
}

impl Lexer {
    fn new() -> Self {
        Self {
            tokens: Vec::new(),
            words: Vec::new(),
            word: String::new(),
            state: LexState::Between,
            line: 1,
            start_line: 1,
            state_line: 1,
            brackets: 0,
        }
    }

    fn step(&mut self, ch: char, rest: &mut Peekable<Chars<'_>>) {
        match self.state {
            LexState::LineComment => {
                if ch == '\n' {
                    self.state = LexState::Between;
                    self.newline();
                }
            }
            LexState::BlockComment => {
                if ch == '*' && rest.peek() == Some(&'/') {
                    rest.next();
                    self.state = LexState::Between;
                } else if ch == '\n' {
                    self.line += 1;
                }
            }
            LexState::Quoted => match ch {
                '\\' => {
                    if let Some(escaped) = rest.next() {
                        if escaped == '\n' {
                            self.line += 1;
                        }
                        self.word.push(escaped);
                    }
                }
                '"' => {
                    self.words.push(std::mem::take(&mut self.word));
                    self.state = LexState::Between;
                }
                '\n' => {
                    self.line += 1;
                    self.word.push(ch);
                }
                _ => self.word.push(ch),
            },
            LexState::Between => self.between(ch, rest),
        }
    }

    fn between(&mut self, ch: char, rest: &mut Peekable<Chars<'_>>) {
        match ch {
            '\n' => {
                self.flush_word();
                self.newline();
            }
            c if c.is_whitespace() => self.flush_word(),
            '"' => {
                self.flush_word();
                self.mark_start();
                self.state_line = self.line;
                self.state = LexState::Quoted;
            }
            '#' if self.word.is_empty() => {
                self.state = LexState::LineComment;
            }
            '/' if self.word.is_empty() && rest.peek() == Some(&'*') => {
                rest.next();
                self.state_line = self.line;
                self.state = LexState::BlockComment;
            }
            '[' => {
                self.flush_word();
                self.mark_start();
                self.brackets += 1;
            }
            ']' => {
                self.flush_word();
                self.brackets = self.brackets.saturating_sub(1);
            }
            ';' => {
                self.flush_word();
                self.emit(Terminator::Statement);
            }
            '{' => {
                self.flush_word();
                self.emit(Terminator::Open);
            }
            '}' => {
                self.flush_word();
                self.emit(Terminator::Newline);
                self.tokens.push(Token {
                    line: self.line,
                    keyword: String::new(),
                    args: Vec::new(),
                    terminator: Terminator::Close,
                    inactive: false,
                });
            }
            _ => {
                self.mark_start();
                self.word.push(ch);
            }
        }
    }

    fn mark_start(&mut self) {
        if self.words.is_empty() && self.word.is_empty() {
            self.start_line = self.line;
        }
    }

    fn flush_word(&mut self) {
        if !self.word.is_empty() {
            self.words.push(std::mem::take(&mut self.word));
        }
    }

    fn newline(&mut self) {
        if self.brackets == 0 {
            self.emit(Terminator::Newline);
        }
        self.line += 1;
    }

    fn emit(&mut self, terminator: Terminator) {
        self.brackets = 0;
        if self.words.is_empty() && terminator != Terminator::Open {
            return;
        }
        let mut words = std::mem::take(&mut self.words).into_iter();
        let mut keyword = words.next().unwrap_or_default();
        let mut inactive = false;
        if keyword == "inactive:" {
            inactive = true;
            keyword = words.next().unwrap_or_default();
        }
        self.tokens.push(Token {
            line: self.start_line,
            keyword,
            args: words.collect(),
            terminator,
            inactive,
        });
    }

    fn finish(mut self) -> Result<Vec<Token>, TokenizeError> {
        match self.state {
            LexState::Quoted => {
                return Err(TokenizeError::UnterminatedQuote {
                    line: self.state_line,
                })
            }
            LexState::BlockComment => {
                return Err(TokenizeError::UnterminatedComment {
                    line: self.state_line,
                })
            }
            LexState::Between | LexState::LineComment => {}
        }
        self.flush_word();
        self.emit(Terminator::Newline);
        Ok(self.tokens)
    }
}
