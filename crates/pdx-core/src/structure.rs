//! Grammar recognizer for the bracketed script language
//!
//! Syntax only: brackets are matched, strings and comments are recognized,
//! nothing is interpreted. The statement tree produced here is mapped into
//! [`crate::script::ScriptNode`] by the script parser.

use logos::Logos;
use std::fmt;
use thiserror::Error;

/// Nesting limit, guards the recursive descent against hostile input
const MAX_DEPTH: usize = 128;

/// A syntax error with a 1-based location
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} (line {line}, column {column})")]
pub struct StructureError {
    pub line: usize,
    pub column: usize,
    pub message: String,
}

impl StructureError {
    fn new(position: Position, message: impl Into<String>) -> Self {
        Self {
            line: position.line,
            column: position.column,
            message: message.into(),
        }
    }
}

/// Location of a token in the source text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

/// Comparison or assignment operator between a key and its value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Equals,
    DoubleEquals,
    NotEquals,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
    QuestionEquals,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Equals => "=",
            Operator::DoubleEquals => "==",
            Operator::NotEquals => "!=",
            Operator::Less => "<",
            Operator::LessOrEqual => "<=",
            Operator::Greater => ">",
            Operator::GreaterOrEqual => ">=",
            Operator::QuestionEquals => "?=",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Right-hand side of a statement, or a bare list entry
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Unquoted word: identifiers, numbers, variable references
    Bare(String),
    /// Quoted string, kept exactly as written between the quotes
    Quoted(String),
    /// `{ ... }` clause
    Block(Vec<Statement>),
}

impl Value {
    /// Raw text of the value; quoted strings lose their quotes
    pub fn to_raw_string(&self) -> String {
        match self {
            Value::Bare(s) | Value::Quoted(s) => s.clone(),
            Value::Block(statements) => {
                let mut out = String::new();
                write_block(&mut out, statements, 0);
                out
            }
        }
    }
}

/// One statement of a clause
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// `key op value`
    KeyValue {
        key: String,
        operator: Operator,
        value: Value,
        position: Position,
    },
    /// Value with no key, as found in lists
    Value { value: Value, position: Position },
}

impl Statement {
    pub fn position(&self) -> Position {
        match self {
            Statement::KeyValue { position, .. } | Statement::Value { position, .. } => *position,
        }
    }

    /// Canonical source text: one statement per line, tab indentation
    pub fn pretty_print(&self) -> String {
        let mut out = String::new();
        write_statement(&mut out, self, 0);
        out
    }
}

fn write_indent(out: &mut String, indent: usize) {
    for _ in 0..indent {
        out.push('\t');
    }
}

fn write_value(out: &mut String, value: &Value, indent: usize) {
    match value {
        Value::Bare(s) => out.push_str(s),
        Value::Quoted(s) => {
            out.push('"');
            out.push_str(s);
            out.push('"');
        }
        Value::Block(statements) => write_block(out, statements, indent),
    }
}

fn write_block(out: &mut String, statements: &[Statement], indent: usize) {
    if statements.is_empty() {
        out.push_str("{ }");
        return;
    }
    out.push_str("{\n");
    for statement in statements {
        write_statement(out, statement, indent + 1);
        out.push('\n');
    }
    write_indent(out, indent);
    out.push('}');
}

fn write_statement(out: &mut String, statement: &Statement, indent: usize) {
    write_indent(out, indent);
    match statement {
        Statement::KeyValue {
            key,
            operator,
            value,
            ..
        } => {
            out.push_str(key);
            out.push(' ');
            out.push_str(operator.as_str());
            out.push(' ');
            write_value(out, value, indent);
        }
        Statement::Value { value, .. } => write_value(out, value, indent),
    }
}

/// Raw lexemes; whitespace and `#` comments are skipped
#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
#[logos(skip r"([\s\x{FEFF}]+|#[^\n]*)")]
enum Lexeme {
    #[token("{")]
    Open,
    #[token("}")]
    Close,
    #[token("=")]
    Equals,
    #[token("==")]
    DoubleEquals,
    #[token("!=")]
    NotEquals,
    #[token("<")]
    Less,
    #[token("<=")]
    LessOrEqual,
    #[token(">")]
    Greater,
    #[token(">=")]
    GreaterOrEqual,
    #[token("?=")]
    QuestionEquals,
    #[regex(r#""([^"\\]|\\(.|\n))*""#)]
    Quoted,
    #[regex(r##"[^\s\x{FEFF}=\{\}<>"#]+"##)]
    Word,
}

impl Lexeme {
    fn operator(self) -> Option<Operator> {
        match self {
            Lexeme::Equals => Some(Operator::Equals),
            Lexeme::DoubleEquals => Some(Operator::DoubleEquals),
            Lexeme::NotEquals => Some(Operator::NotEquals),
            Lexeme::Less => Some(Operator::Less),
            Lexeme::LessOrEqual => Some(Operator::LessOrEqual),
            Lexeme::Greater => Some(Operator::Greater),
            Lexeme::GreaterOrEqual => Some(Operator::GreaterOrEqual),
            Lexeme::QuestionEquals => Some(Operator::QuestionEquals),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    Word(String),
    Quoted(String),
    Operator(Operator),
    Open,
    Close,
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokenKind,
    position: Position,
}

/// Maps byte offsets to 1-based line and character column
struct LineIndex<'a> {
    text: &'a str,
    starts: Vec<usize>,
}

impl<'a> LineIndex<'a> {
    fn new(text: &'a str) -> Self {
        let starts = std::iter::once(0)
            .chain(text.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        Self { text, starts }
    }

    fn position(&self, offset: usize) -> Position {
        let line = self.starts.partition_point(|&start| start <= offset).max(1);
        let start = self.starts[line - 1];
        Position {
            line,
            column: self.text[start..offset].chars().count() + 1,
        }
    }
}

fn tokenize(text: &str) -> Result<Vec<Token>, StructureError> {
    let lines = LineIndex::new(text);
    let mut lexer = Lexeme::lexer(text);
    let mut tokens: Vec<Token> = Vec::new();
    // byte offset right after the last word, for `word!=` and `word?=`
    let mut word_end = None;

    while let Some(lexeme) = lexer.next() {
        let span = lexer.span();
        let position = lines.position(span.start);
        let Ok(lexeme) = lexeme else {
            let message = if lexer.slice().starts_with('"') {
                "unterminated string"
            } else {
                "unexpected character"
            };
            return Err(StructureError::new(position, message));
        };

        if lexeme == Lexeme::Equals && word_end == Some(span.start) {
            if let Some(token) = split_trailing_operator(&mut tokens) {
                tokens.push(token);
                word_end = None;
                continue;
            }
        }

        let slice = lexer.slice();
        let kind = match lexeme {
            Lexeme::Open => TokenKind::Open,
            Lexeme::Close => TokenKind::Close,
            Lexeme::Quoted => TokenKind::Quoted(slice[1..slice.len() - 1].to_string()),
            Lexeme::Word => TokenKind::Word(slice.to_string()),
            other => match other.operator() {
                Some(operator) => TokenKind::Operator(operator),
                None => continue,
            },
        };
        word_end = matches!(kind, TokenKind::Word(_)).then_some(span.end);
        tokens.push(Token { kind, position });
    }
    Ok(tokens)
}

/// `war!` followed by `=` is the word `war` and the operator `!=`
fn split_trailing_operator(tokens: &mut Vec<Token>) -> Option<Token> {
    let last = tokens.last_mut()?;
    let TokenKind::Word(word) = &mut last.kind else {
        return None;
    };
    let operator = if word.ends_with('!') {
        Operator::NotEquals
    } else if word.ends_with('?') {
        Operator::QuestionEquals
    } else {
        return None;
    };
    word.pop();
    let position = Position {
        line: last.position.line,
        column: last.position.column + word.chars().count(),
    };
    if word.is_empty() {
        tokens.pop();
    }
    Some(Token {
        kind: TokenKind::Operator(operator),
        position,
    })
}

struct Parser {
    tokens: Vec<Token>,
    index: usize,
    end: Position,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.index)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.index).cloned();
        if token.is_some() {
            self.index += 1;
        }
        token
    }

    fn statements(&mut self, open: Option<Position>, depth: usize) -> Result<Vec<Statement>, StructureError> {
        if depth > MAX_DEPTH {
            let position = open.unwrap_or(self.end);
            return Err(StructureError::new(position, "nesting too deep"));
        }
        let mut statements = Vec::new();
        loop {
            let Some(token) = self.next() else {
                return match open {
                    Some(position) => Err(StructureError::new(position, "unclosed '{'")),
                    None => Ok(statements),
                };
            };
            match token.kind {
                TokenKind::Close => {
                    return match open {
                        Some(_) => Ok(statements),
                        None => Err(StructureError::new(token.position, "unexpected '}'")),
                    };
                }
                TokenKind::Open => {
                    let block = self.statements(Some(token.position), depth + 1)?;
                    statements.push(Statement::Value {
                        value: Value::Block(block),
                        position: token.position,
                    });
                }
                TokenKind::Operator(operator) => {
                    return Err(StructureError::new(
                        token.position,
                        format!("operator '{}' without a key", operator),
                    ));
                }
                TokenKind::Word(text) => {
                    statements.push(self.keyed_or_bare(text, false, token.position, depth)?);
                }
                TokenKind::Quoted(text) => {
                    statements.push(self.keyed_or_bare(text, true, token.position, depth)?);
                }
            }
        }
    }

    fn keyed_or_bare(
        &mut self,
        text: String,
        quoted: bool,
        position: Position,
        depth: usize,
    ) -> Result<Statement, StructureError> {
        let operator = match self.peek().map(|t| &t.kind) {
            Some(TokenKind::Operator(operator)) => Some(*operator),
            _ => None,
        };
        let Some(operator) = operator else {
            let value = if quoted { Value::Quoted(text) } else { Value::Bare(text) };
            return Ok(Statement::Value { value, position });
        };
        let op_position = self.next().map(|t| t.position).unwrap_or(self.end);
        let value = self.value(op_position, operator, depth)?;
        let key = if quoted { format!("\"{}\"", text) } else { text };
        Ok(Statement::KeyValue {
            key,
            operator,
            value,
            position,
        })
    }

    fn value(&mut self, op_position: Position, operator: Operator, depth: usize) -> Result<Value, StructureError> {
        let missing = || StructureError::new(op_position, format!("missing value after '{}'", operator));
        let token = self.next().ok_or_else(missing)?;
        match token.kind {
            TokenKind::Word(text) => Ok(Value::Bare(text)),
            TokenKind::Quoted(text) => Ok(Value::Quoted(text)),
            TokenKind::Open => Ok(Value::Block(self.statements(Some(token.position), depth + 1)?)),
            TokenKind::Close | TokenKind::Operator(_) => Err(missing()),
        }
    }
}

/// Recognize the statements of a whole file
///
/// `file_name` is only used for diagnostics.
pub fn parse_structure(file_name: &str, text: &str) -> Result<Vec<Statement>, StructureError> {
    let tokens = tokenize(text)?;
    let end = tokens.last().map(|t| t.position).unwrap_or_default();
    let mut parser = Parser {
        tokens,
        index: 0,
        end,
    };
    let statements = parser.statements(None, 0);
    if let Err(e) = &statements {
        tracing::debug!(file = file_name, line = e.line, column = e.column, "syntax error: {}", e.message);
    }
    statements
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Vec<Statement> {
        parse_structure("test.txt", text).unwrap()
    }

    #[test]
    fn test_parse_key_values() {
        let statements = parse("a = b\nc = \"d e\"");
        assert_eq!(statements.len(), 2);
        match &statements[1] {
            Statement::KeyValue { key, value, .. } => {
                assert_eq!(key, "c");
                assert_eq!(value, &Value::Quoted("d e".to_string()));
            }
            other => panic!("unexpected statement {:?}", other),
        }
    }

    #[test]
    fn test_parse_nested_blocks_and_lists() {
        let statements = parse("obj = { list = { 1 2 3 } inner = { x = y } }");
        let Statement::KeyValue {
            value: Value::Block(children),
            ..
        } = &statements[0]
        else {
            panic!("expected block");
        };
        assert_eq!(children.len(), 2);
        let Statement::KeyValue {
            value: Value::Block(list),
            ..
        } = &children[0]
        else {
            panic!("expected list");
        };
        assert_eq!(list.len(), 3);
        assert!(matches!(&list[0], Statement::Value { value: Value::Bare(v), .. } if v == "1"));
    }

    #[test]
    fn test_parse_operators() {
        let statements = parse("a >= 5\nb < 3\nc != d\ne ?= f\ng == h");
        let operators: Vec<Operator> = statements
            .iter()
            .map(|s| match s {
                Statement::KeyValue { operator, .. } => *operator,
                _ => panic!("expected key value"),
            })
            .collect();
        assert_eq!(
            operators,
            vec![
                Operator::GreaterOrEqual,
                Operator::Less,
                Operator::NotEquals,
                Operator::QuestionEquals,
                Operator::DoubleEquals,
            ]
        );
    }

    #[test]
    fn test_compact_operators_split_from_words() {
        let statements = parse("war!=yes\nflag?=no");
        match &statements[0] {
            Statement::KeyValue { key, operator, value, position } => {
                assert_eq!(key, "war");
                assert_eq!(*operator, Operator::NotEquals);
                assert_eq!(value, &Value::Bare("yes".to_string()));
                assert_eq!(position.column, 1);
            }
            other => panic!("unexpected statement {:?}", other),
        }
        assert!(matches!(
            &statements[1],
            Statement::KeyValue { operator: Operator::QuestionEquals, .. }
        ));
    }

    #[test]
    fn test_positions_count_characters() {
        let statements = parse("\u{feff}a = b\n  \"ä\" = c\n\tlast");
        let positions: Vec<(usize, usize)> = statements
            .iter()
            .map(|s| (s.position().line, s.position().column))
            .collect();
        assert_eq!(positions, vec![(1, 2), (2, 3), (3, 2)]);

        let err = parse_structure("test.txt", "é = { x = 1\n").unwrap_err();
        assert_eq!((err.line, err.column), (1, 5));
    }

    #[test]
    fn test_escaped_quotes_stay_in_string() {
        let statements = parse(r#"a = "say \"hi\"" b = c"#);
        assert_eq!(statements.len(), 2);
        assert!(matches!(
            &statements[0],
            Statement::KeyValue { value: Value::Quoted(v), .. } if v == r#"say \"hi\""#
        ));
    }

    #[test]
    fn test_comments_are_skipped() {
        let statements = parse("# header\na = b # trailing\n# c = d");
        assert_eq!(statements.len(), 1);
        let statements = parse("a = \"quoted # not a comment\"");
        assert!(matches!(
            &statements[0],
            Statement::KeyValue { value: Value::Quoted(v), .. } if v == "quoted # not a comment"
        ));
    }

    #[test]
    fn test_unclosed_block_reports_opening_brace() {
        let err = parse_structure("test.txt", "a = {\n  b = c\n").unwrap_err();
        assert_eq!(err.line, 1);
        assert_eq!(err.column, 5);
        assert!(err.message.contains("unclosed"));
    }

    #[test]
    fn test_unexpected_closing_brace() {
        let err = parse_structure("test.txt", "a = b\n}").unwrap_err();
        assert_eq!(err.line, 2);
        assert_eq!(err.column, 1);
    }

    #[test]
    fn test_missing_value_and_unterminated_string() {
        let err = parse_structure("test.txt", "a =").unwrap_err();
        assert!(err.message.contains("missing value"));
        let err = parse_structure("test.txt", "a = \"open").unwrap_err();
        assert_eq!(err.message, "unterminated string");
    }

    #[test]
    fn test_pretty_print() {
        let statements = parse("obj = { a = \"b\" empty = { } list = { 1 2 } }");
        assert_eq!(
            statements[0].pretty_print(),
            "obj = {\n\ta = \"b\"\n\tempty = { }\n\tlist = {\n\t\t1\n\t\t2\n\t}\n}"
        );
    }
}
