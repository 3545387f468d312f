//! DDL parser
//!
//! Recovers record descriptors from a script of `CREATE TABLE` and
//! `CREATE VIEW` statements. This is not a general SQL parser: it reads the
//! subset of DDL needed to rebuild columns, keys and references, tolerates
//! the clauses it does not understand, and reports every column it had to
//! degrade instead of failing on it.

use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::schema::mapping::from_sql_type;
use crate::schema::types::{
    find_descriptor, resolve_pending_references, Dialect, FieldDescriptor, ForeignKeyRef,
    PendingReference, RecordDescriptor, RecoveredSchema, SemanticType, SkippedStatement,
    TypeFallback,
};

/// Kind of a lexical token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Word,
    /// Delimited identifier; `text` holds the unescaped name
    Quoted,
    /// String literal; `text` holds the unescaped value
    Literal,
    Number,
    LParen,
    RParen,
    Comma,
    Semicolon,
    Dot,
    Symbol,
}

/// A token with its byte span in the source text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub start: usize,
    pub end: usize,
}

impl Token {
    fn is_keyword(&self, keyword: &str) -> bool {
        self.kind == TokenKind::Word && self.text.eq_ignore_ascii_case(keyword)
    }

    fn is_any_keyword(&self, keywords: &[&str]) -> bool {
        keywords.iter().any(|k| self.is_keyword(k))
    }

    fn is_identifier(&self) -> bool {
        matches!(self.kind, TokenKind::Word | TokenKind::Quoted)
    }

    fn is_symbol(&self, symbol: &str) -> bool {
        self.kind == TokenKind::Symbol && self.text == symbol
    }
}

/// Split DDL text into tokens, skipping whitespace and comments
pub fn tokenize(source: &str) -> Result<Vec<Token>> {
    let chars: Vec<(usize, char)> = source.char_indices().collect();
    let offset = |i: usize| chars.get(i).map_or(source.len(), |(o, _)| *o);
    let char_at = |i: usize| chars.get(i).map(|(_, c)| *c);
    let snippet = |start: usize| {
        source[start..]
            .lines()
            .next()
            .unwrap_or_default()
            .to_string()
    };

    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let (start, c) = chars[i];
        let next = char_at(i + 1);

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        // Line comment
        if c == '-' && next == Some('-') {
            while i < chars.len() && chars[i].1 != '\n' {
                i += 1;
            }
            continue;
        }

        // Block comment
        if c == '/' && next == Some('*') {
            i += 2;
            while i < chars.len() && !(chars[i].1 == '*' && char_at(i + 1) == Some('/')) {
                i += 1;
            }
            i = (i + 2).min(chars.len());
            continue;
        }

        let (kind, text, end) = match c {
            '(' => (TokenKind::LParen, c.to_string(), i + 1),
            ')' => (TokenKind::RParen, c.to_string(), i + 1),
            ',' => (TokenKind::Comma, c.to_string(), i + 1),
            ';' => (TokenKind::Semicolon, c.to_string(), i + 1),
            '.' if !next.map_or(false, |n| n.is_ascii_digit()) => (TokenKind::Dot, c.to_string(), i + 1),
            '[' if next == Some(']') => (TokenKind::Symbol, "[]".to_string(), i + 2),
            '"' | '`' | '[' => {
                let close = if c == '[' { ']' } else { c };
                let (value, end) = read_delimited(&chars, i, close)
                    .ok_or_else(|| Error::malformed("unterminated quoted identifier", snippet(start)))?;
                (TokenKind::Quoted, value, end)
            }
            '\'' => {
                let (value, end) = read_delimited(&chars, i, '\'')
                    .ok_or_else(|| Error::malformed("unterminated string literal", snippet(start)))?;
                (TokenKind::Literal, value, end)
            }
            '$' if next.map_or(false, |n| n == '$' || n.is_alphabetic()) => {
                // Dollar-quoted body, e.g. $$ ... $$ or $fn$ ... $fn$
                let mut j = i + 1;
                while j < chars.len() && chars[j].1 != '$' && (chars[j].1.is_alphanumeric() || chars[j].1 == '_') {
                    j += 1;
                }
                if char_at(j) != Some('$') {
                    (TokenKind::Symbol, c.to_string(), i + 1)
                } else {
                    let tag: String = chars[i..=j].iter().map(|(_, c)| *c).collect();
                    let body_start = offset(j + 1);
                    let body_end = source[body_start..]
                        .find(&tag)
                        .map(|p| body_start + p)
                        .ok_or_else(|| Error::malformed("unterminated dollar-quoted string", snippet(start)))?;
                    let end_offset = body_end + tag.len();
                    let end = chars.iter().position(|(o, _)| *o >= end_offset).unwrap_or(chars.len());
                    (TokenKind::Literal, source[body_start..body_end].to_string(), end)
                }
            }
            c if c.is_ascii_digit() || c == '.' => {
                let mut j = i;
                while j < chars.len() && (chars[j].1.is_ascii_digit() || chars[j].1 == '.') {
                    j += 1;
                }
                (TokenKind::Number, source[start..offset(j)].to_string(), j)
            }
            c if c.is_alphabetic() || c == '_' || c == '@' || c == '#' => {
                let mut j = i;
                while j < chars.len()
                    && (chars[j].1.is_alphanumeric() || matches!(chars[j].1, '_' | '$' | '@' | '#'))
                {
                    j += 1;
                }
                (TokenKind::Word, source[start..offset(j)].to_string(), j)
            }
            ':' if next == Some(':') => (TokenKind::Symbol, "::".to_string(), i + 2),
            _ => (TokenKind::Symbol, c.to_string(), i + 1),
        };

        tokens.push(Token {
            kind,
            text,
            start,
            end: offset(end),
        });
        i = end;
    }

    Ok(tokens)
}

/// Read a delimited run starting at `open`, where a doubled closing character
/// stands for itself. Returns the value and the index after the closing delimiter.
fn read_delimited(chars: &[(usize, char)], open: usize, close: char) -> Option<(String, usize)> {
    let mut value = String::new();
    let mut i = open + 1;

    while i < chars.len() {
        let c = chars[i].1;
        if c == close {
            if chars.get(i + 1).map(|(_, c)| *c) == Some(close) {
                value.push(close);
                i += 2;
                continue;
            }
            return Some((value, i + 1));
        }
        value.push(c);
        i += 1;
    }

    None
}

/// Split a token stream into statements
///
/// Statements end at depth-0 semicolons and before every depth-0 `CREATE`.
/// Inside a trigger or routine body, semicolons and `CREATE` only count once
/// every `BEGIN`/`CASE` has met its `END`. A `GO` alone on its line separates
/// batches and is dropped.
fn split_statements<'t>(source: &str, tokens: &'t [Token]) -> Vec<&'t [Token]> {
    let mut statements = Vec::new();
    let mut depth = 0usize;
    let mut block = 0usize;
    let mut start = 0;

    for (i, token) in tokens.iter().enumerate() {
        if depth == 0 && token.kind == TokenKind::Word && block_keyword(tokens, i) && is_routine(&tokens[start..i]) {
            if token.is_keyword("END") {
                block = block.saturating_sub(1);
            } else {
                block += 1;
            }
            continue;
        }

        match token.kind {
            TokenKind::LParen => depth += 1,
            TokenKind::RParen => depth = depth.saturating_sub(1),
            TokenKind::Semicolon if depth == 0 && block == 0 => {
                if i > start {
                    statements.push(&tokens[start..i]);
                }
                start = i + 1;
            }
            TokenKind::Word if depth == 0 && block == 0 && token.is_keyword("CREATE") => {
                if i > start {
                    statements.push(&tokens[start..i]);
                }
                start = i;
            }
            TokenKind::Word if depth == 0 && token.is_keyword("GO") && alone_on_line(source, tokens, i) => {
                if i > start {
                    statements.push(&tokens[start..i]);
                }
                start = i + 1;
                block = 0;
            }
            _ => {}
        }
    }

    if start < tokens.len() {
        statements.push(&tokens[start..]);
    }

    statements
}

/// `BEGIN` or `CASE` opening a block, or an `END` closing one
///
/// `BEGIN TRAN[SACTION]` and `END IF`/`END LOOP`-style closers are not blocks.
fn block_keyword(tokens: &[Token], i: usize) -> bool {
    let token = &tokens[i];
    let next = tokens.get(i + 1);
    if token.is_keyword("BEGIN") {
        !next.map_or(false, |t| t.is_any_keyword(&["TRAN", "TRANSACTION"]))
    } else if token.is_keyword("END") {
        !next.map_or(false, |t| t.is_any_keyword(&["IF", "LOOP", "WHILE", "REPEAT"]))
    } else {
        token.is_keyword("CASE")
    }
}

/// True when the statement so far is a `CREATE` of a trigger, procedure or function
fn is_routine(head: &[Token]) -> bool {
    if !head.first().map_or(false, |t| t.is_keyword("CREATE")) {
        return false;
    }

    for token in head.iter().skip(1).take(12) {
        if token.is_any_keyword(&["TRIGGER", "PROCEDURE", "PROC", "FUNCTION"]) {
            return true;
        }
        if token.kind == TokenKind::LParen || token.is_any_keyword(&["TABLE", "VIEW", "INDEX", "AS"]) {
            return false;
        }
    }
    false
}

fn alone_on_line(source: &str, tokens: &[Token], i: usize) -> bool {
    let before = match i {
        0 => true,
        _ => source[tokens[i - 1].end..tokens[i].start].contains('\n'),
    };
    let after = match tokens.get(i + 1) {
        None => true,
        Some(next) => source[tokens[i].end..next.start].contains('\n'),
    };
    before && after
}

/// Forward-only reader over a token slice
struct Cursor<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(tokens: &'a [Token]) -> Self {
        Self { tokens, pos: 0 }
    }

    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos)
    }

    fn peek_nth(&self, n: usize) -> Option<&'a Token> {
        self.tokens.get(self.pos + n)
    }

    fn next(&mut self) -> Option<&'a Token> {
        let token = self.tokens.get(self.pos);
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn rest(&self) -> &'a [Token] {
        &self.tokens[self.pos.min(self.tokens.len())..]
    }

    fn peek_is(&self, kind: TokenKind) -> bool {
        self.peek().map_or(false, |t| t.kind == kind)
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        self.peek().map_or(false, |t| t.is_keyword(keyword))
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.peek_is(kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.peek_keyword(keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Consume a keyword sequence, all or nothing
    fn eat_keywords(&mut self, keywords: &[&str]) -> bool {
        let matched = keywords
            .iter()
            .enumerate()
            .all(|(i, k)| self.peek_nth(i).map_or(false, |t| t.is_keyword(k)));
        if matched {
            self.pos += keywords.len();
        }
        matched
    }

    fn eat_any_keyword(&mut self, keywords: &[&str]) -> bool {
        if self.peek().map_or(false, |t| t.is_any_keyword(keywords)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Skip one token, or a whole parenthesised group when positioned on `(`
    fn skip_balanced(&mut self) {
        let mut depth = 0usize;
        while let Some(token) = self.next() {
            match token.kind {
                TokenKind::LParen => depth += 1,
                TokenKind::RParen => depth = depth.saturating_sub(1),
                _ => {}
            }
            if depth == 0 {
                return;
            }
        }
    }

    /// Skip a single-term expression such as a DEFAULT value
    fn skip_term(&mut self) {
        while self.peek().map_or(false, |t| t.is_symbol("-") || t.is_symbol("+")) {
            self.pos += 1;
        }
        match self.peek() {
            Some(t) if t.kind == TokenKind::Word => {
                self.pos += 1;
                if self.peek_is(TokenKind::LParen) {
                    self.skip_balanced();
                }
            }
            Some(_) => self.skip_balanced(),
            None => return,
        }
        // PostgreSQL casts: 'x'::character varying
        while self.peek().map_or(false, |t| t.is_symbol("::")) {
            self.pos += 1;
            while self.peek().map_or(false, |t| t.kind == TokenKind::Word && !is_column_keyword(t)) {
                self.pos += 1;
            }
            if self.peek_is(TokenKind::LParen) {
                self.skip_balanced();
            }
        }
    }

    /// Read a possibly qualified name and return its last part
    fn object_name(&mut self) -> Option<String> {
        let first = self.peek().filter(|t| t.is_identifier())?;
        self.pos += 1;
        let mut name = first.text.clone();

        while self.peek_is(TokenKind::Dot) && self.peek_nth(1).map_or(false, |t| t.is_identifier()) {
            if let Some(part) = self.peek_nth(1) {
                name = part.text.clone();
            }
            self.pos += 2;
        }

        Some(name)
    }
}

/// Split the items of a parenthesised list using a depth counter. The cursor
/// must sit just after the opening parenthesis and is left after the closing one.
fn split_items<'a>(cursor: &mut Cursor<'a>, statement: &str) -> Result<Vec<&'a [Token]>> {
    let tokens = cursor.rest();
    let mut items = Vec::new();
    let mut depth = 1usize;
    let mut start = 0;

    for (i, token) in tokens.iter().enumerate() {
        match token.kind {
            TokenKind::LParen => depth += 1,
            TokenKind::RParen => {
                depth -= 1;
                if depth == 0 {
                    items.push(&tokens[start..i]);
                    cursor.pos += i + 1;
                    return Ok(items);
                }
            }
            TokenKind::Comma if depth == 1 => {
                items.push(&tokens[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }

    Err(Error::malformed("missing closing parenthesis", statement))
}

/// Read `(a, b, ...)` and return the leading identifier of each entry
fn column_list(cursor: &mut Cursor<'_>, statement: &str) -> Result<Vec<String>> {
    if !cursor.eat(TokenKind::LParen) {
        return Err(Error::malformed("expected a parenthesised column list", statement));
    }

    split_items(cursor, statement)?
        .into_iter()
        .map(|item| match item.first() {
            Some(token) if token.is_identifier() => Ok(token.text.clone()),
            _ => Err(Error::malformed("empty entry in column list", statement)),
        })
        .collect()
}

/// Keywords that end a column's type name
fn is_column_keyword(token: &Token) -> bool {
    const KEYWORDS: &[&str] = &[
        "NOT", "NULL", "PRIMARY", "UNIQUE", "REFERENCES", "DEFAULT", "CHECK", "CONSTRAINT",
        "COLLATE", "GENERATED", "IDENTITY", "AUTO_INCREMENT", "AUTOINCREMENT", "FOREIGN", "KEY",
        "ON", "COMMENT", "AS", "CHARACTER", "CHARSET",
    ];
    token.is_any_keyword(KEYWORDS)
}

/// Words that may continue a multi-word type name
fn continues_type(cursor: &Cursor<'_>) -> bool {
    let Some(token) = cursor.peek() else {
        return false;
    };

    if token.is_any_keyword(&["WITH", "WITHOUT"]) {
        return cursor
            .peek_nth(1)
            .map_or(false, |t| t.is_any_keyword(&["TIME", "LOCAL"]));
    }

    token.is_any_keyword(&[
        "PRECISION", "VARYING", "TIME", "ZONE", "LOCAL", "UNSIGNED", "SIGNED", "ZEROFILL",
    ])
}

/// True when the tokens start a table constraint (optionally named)
fn starts_table_constraint(tokens: &[Token]) -> bool {
    let mut cursor = Cursor::new(tokens);
    if cursor.eat_keyword("CONSTRAINT") {
        cursor.next();
    }

    let Some(token) = cursor.peek() else {
        return false;
    };

    if token.is_keyword("PRIMARY") || token.is_keyword("UNIQUE") {
        // A column-level PRIMARY KEY or UNIQUE has no column list of its own
        cursor.eat_keywords(&["PRIMARY", "KEY"]);
        cursor.eat_keyword("UNIQUE");
        cursor.eat_any_keyword(&["KEY", "INDEX"]);
        cursor.eat_any_keyword(&["CLUSTERED", "NONCLUSTERED"]);
        if cursor.peek().map_or(false, |t| t.is_identifier()) && cursor.peek_nth(1).map_or(false, |t| t.kind == TokenKind::LParen) {
            cursor.next();
        }
        return cursor.peek_is(TokenKind::LParen);
    }

    if cursor.peek_nth(1).map_or(false, |t| t.is_keyword("KEY")) && token.is_keyword("FOREIGN") {
        return true;
    }

    token.is_keyword("CHECK") && tokens.first().map_or(false, |t| t.is_keyword("CONSTRAINT"))
}

/// A CREATE VIEW waiting for all tables to be known
struct PendingView {
    name: String,
    columns: Vec<String>,
    select: Vec<Token>,
}

/// One entry of a view's FROM clause
struct Source {
    table: Option<String>,
    alias: Option<String>,
    optional: bool,
}

impl Source {
    fn answers_to(&self, qualifier: &str) -> bool {
        self.alias
            .as_deref()
            .map_or(false, |a| a.eq_ignore_ascii_case(qualifier))
            || self
                .table
                .as_deref()
                .map_or(false, |t| t.eq_ignore_ascii_case(qualifier))
    }
}

#[derive(Clone, Copy, PartialEq)]
enum JoinSide {
    Inner,
    Left,
    Right,
    Full,
}

/// Parser for DDL scripts in one dialect
pub struct DdlParser {
    dialect: Dialect,
}

impl DdlParser {
    /// Create a new parser
    pub fn new(dialect: Dialect) -> Self {
        Self { dialect }
    }

    /// Parse a whole script
    ///
    /// Tables come first in script order, followed by views in script order.
    pub fn parse(&self, text: &str) -> Result<RecoveredSchema> {
        let tokens = tokenize(text)?;
        let mut context = ParseContext {
            source: text,
            dialect: self.dialect,
            tables: Vec::new(),
            views: Vec::new(),
            pending: Vec::new(),
            report: RecoveredSchema::default(),
        };

        for statement in split_statements(text, &tokens) {
            context.statement(statement)?;
        }

        context.finish()
    }
}

/// Parse a DDL script
pub fn parse_ddl(text: &str, dialect: Dialect) -> Result<RecoveredSchema> {
    DdlParser::new(dialect).parse(text)
}

struct ParseContext<'s> {
    source: &'s str,
    dialect: Dialect,
    tables: Vec<RecordDescriptor>,
    views: Vec<PendingView>,
    pending: Vec<PendingReference>,
    report: RecoveredSchema,
}

impl<'s> ParseContext<'s> {
    fn text(&self, tokens: &[Token]) -> &'s str {
        match (tokens.first(), tokens.last()) {
            (Some(first), Some(last)) => &self.source[first.start..last.end],
            _ => "",
        }
    }

    fn statement(&mut self, tokens: &[Token]) -> Result<()> {
        let sql = self.text(tokens);
        let mut cursor = Cursor::new(tokens);

        if !cursor.eat_keyword("CREATE") {
            return Err(Error::malformed("expected CREATE TABLE or CREATE VIEW", sql));
        }
        if cursor.eat_keyword("OR") && !cursor.eat_any_keyword(&["REPLACE", "ALTER"]) {
            return Err(Error::malformed("expected REPLACE or ALTER after CREATE OR", sql));
        }
        while cursor.eat_any_keyword(&["TEMP", "TEMPORARY", "UNLOGGED", "GLOBAL", "LOCAL"]) {}

        if cursor.eat_keyword("TABLE") {
            self.table(cursor, sql)
        } else if cursor.eat_keyword("VIEW") || cursor.eat_keywords(&["MATERIALIZED", "VIEW"]) {
            self.view(cursor, sql)
        } else {
            let mut kind = Vec::new();
            while let Some(token) = cursor.peek() {
                if token.kind != TokenKind::Word {
                    break;
                }
                kind.push(token.text.to_uppercase());
                cursor.next();
                if !token.is_any_keyword(&["UNIQUE", "CLUSTERED", "NONCLUSTERED", "FULLTEXT", "SPATIAL", "VIRTUAL", "RECURSIVE", "MATERIALIZED"]) {
                    break;
                }
            }
            if kind.is_empty() {
                return Err(Error::malformed("incomplete CREATE statement", sql));
            }

            let kind = kind.join(" ");
            info!(kind = %kind, "Skipping statement that does not define a table or view");
            self.report.skipped.push(SkippedStatement {
                kind,
                statement: sql.to_string(),
            });
            Ok(())
        }
    }

    fn table(&mut self, mut cursor: Cursor<'_>, sql: &str) -> Result<()> {
        cursor.eat_keywords(&["IF", "NOT", "EXISTS"]);
        let name = cursor
            .object_name()
            .ok_or_else(|| Error::malformed("expected a table name", sql))?;

        if !cursor.eat(TokenKind::LParen) {
            return Err(Error::malformed("missing column list", sql));
        }
        let items = split_items(&mut cursor, sql)?;

        let mut descriptor = RecordDescriptor::new(&name);
        let mut constraints: Vec<&[Token]> = Vec::new();

        for item in items {
            // A trailing comma leaves an empty item behind
            if item.is_empty() {
                continue;
            }
            if starts_table_constraint(item) || is_ignored_table_item(item, self.dialect) {
                constraints.push(item);
                continue;
            }

            let embedded = self.column(&mut descriptor, item, sql)?;
            if let Some(constraint) = embedded {
                constraints.push(constraint);
            }
        }

        if descriptor.fields.is_empty() {
            return Err(Error::malformed("table defines no columns", sql));
        }

        for constraint in constraints {
            self.table_constraint(&mut descriptor, constraint, sql)?;
        }

        descriptor.normalize_keys();

        if find_descriptor(&self.tables, &name).is_some() {
            return Err(Error::malformed(format!("table '{}' is defined twice", name), sql));
        }

        debug!(table = %name, columns = descriptor.fields.len(), "Parsed CREATE TABLE");
        self.tables.push(descriptor);
        Ok(())
    }

    /// Parse one column definition. Returns a table constraint written after
    /// the column without a separating comma, if there is one.
    fn column<'t>(
        &mut self,
        descriptor: &mut RecordDescriptor,
        item: &'t [Token],
        sql: &str,
    ) -> Result<Option<&'t [Token]>> {
        let mut cursor = Cursor::new(item);
        let name = match cursor.next() {
            Some(token) if token.is_identifier() => token.text.clone(),
            _ => return Err(Error::malformed("expected a column name", sql)),
        };

        if descriptor.field(&name).is_some() {
            return Err(Error::malformed(
                format!("column '{}' is defined twice in '{}'", name, descriptor.name),
                sql,
            ));
        }

        // Type name: first word, then arguments and continuation words
        let type_start = cursor.pos;
        if cursor.peek().map_or(false, |t| t.is_identifier() && !is_column_keyword(t)) {
            cursor.next();
            loop {
                if cursor.peek_is(TokenKind::LParen) {
                    cursor.skip_balanced();
                } else if cursor.peek().map_or(false, |t| t.is_symbol("[]")) || continues_type(&cursor) {
                    cursor.next();
                } else {
                    break;
                }
            }
        }
        let raw_type = self.text(&item[type_start..cursor.pos]);

        let mut not_null = false;
        let mut primary_key = false;
        let mut unique = false;
        let mut reference: Option<(String, Vec<String>)> = None;
        let mut embedded = None;

        while let Some(token) = cursor.peek() {
            if starts_table_constraint(cursor.rest()) {
                embedded = Some(cursor.rest());
                break;
            }

            if cursor.eat_keywords(&["NOT", "NULL"]) {
                not_null = true;
            } else if cursor.eat_keyword("NULL") {
                not_null = false;
            } else if cursor.eat_keywords(&["PRIMARY", "KEY"]) {
                primary_key = true;
            } else if cursor.eat_keyword("UNIQUE") {
                unique = true;
                cursor.eat_keyword("KEY");
            } else if cursor.eat_keyword("REFERENCES") {
                let target = cursor
                    .object_name()
                    .ok_or_else(|| Error::malformed("expected a referenced table", sql))?;
                let columns = if cursor.peek_is(TokenKind::LParen) {
                    column_list(&mut cursor, sql)?
                } else {
                    Vec::new()
                };
                reference = Some((target, columns));
            } else if cursor.eat_keyword("DEFAULT") {
                cursor.skip_term();
            } else if cursor.eat_keyword("CONSTRAINT") {
                cursor.next();
            } else if token.is_keyword("CHECK") {
                cursor.next();
                cursor.skip_balanced();
            } else {
                // COLLATE, IDENTITY(1, 1), AUTO_INCREMENT, ON UPDATE ... carry nothing we keep
                cursor.skip_balanced();
            }
        }

        let semantic_type = self.semantic_type(&descriptor.name, &name, raw_type);

        let mut field = FieldDescriptor::new(&name, semantic_type).nullable(!not_null);
        if primary_key {
            field = field.primary_key();
        }
        if unique {
            field = field.unique();
        }
        descriptor.fields.push(field);

        if let Some((target, target_columns)) = reference {
            self.reference(descriptor, vec![name], target, target_columns, sql)?;
        }

        Ok(embedded)
    }

    fn semantic_type(&mut self, table: &str, column: &str, raw_type: &str) -> SemanticType {
        match from_sql_type(raw_type, self.dialect) {
            Ok(semantic_type) => semantic_type,
            Err(_) => {
                warn!(table, column, raw_type, "Unknown column type, falling back to text");
                self.report.fallbacks.push(TypeFallback {
                    table: table.to_string(),
                    column: column.to_string(),
                    raw_type: raw_type.to_string(),
                });
                SemanticType::Text
            }
        }
    }

    fn table_constraint(
        &mut self,
        descriptor: &mut RecordDescriptor,
        tokens: &[Token],
        sql: &str,
    ) -> Result<()> {
        let mut cursor = Cursor::new(tokens);
        if cursor.eat_keyword("CONSTRAINT") {
            cursor.next();
        }

        if cursor.eat_keywords(&["PRIMARY", "KEY"]) {
            cursor.eat_any_keyword(&["CLUSTERED", "NONCLUSTERED"]);
            for column in column_list(&mut cursor, sql)? {
                let field = field_mut(descriptor, &column, sql)?;
                field.is_primary_key = true;
                field.nullable = false;
            }
        } else if cursor.eat_keyword("UNIQUE") {
            cursor.eat_any_keyword(&["KEY", "INDEX"]);
            cursor.eat_any_keyword(&["CLUSTERED", "NONCLUSTERED"]);
            if !cursor.peek_is(TokenKind::LParen) {
                cursor.next();
            }
            let columns = column_list(&mut cursor, sql)?;
            for column in &columns {
                field_mut(descriptor, column, sql)?;
            }
            match columns.as_slice() {
                [column] => field_mut(descriptor, column, sql)?.unique = true,
                _ => self.report.warnings.push(format!(
                    "Composite UNIQUE ({}) on '{}' is not kept",
                    columns.join(", "),
                    descriptor.name
                )),
            }
        } else if cursor.eat_keywords(&["FOREIGN", "KEY"]) {
            if !cursor.peek_is(TokenKind::LParen) {
                cursor.next();
            }
            let columns = column_list(&mut cursor, sql)?;
            if !cursor.eat_keyword("REFERENCES") {
                return Err(Error::malformed("FOREIGN KEY without REFERENCES", sql));
            }
            let target = cursor
                .object_name()
                .ok_or_else(|| Error::malformed("expected a referenced table", sql))?;
            let target_columns = if cursor.peek_is(TokenKind::LParen) {
                column_list(&mut cursor, sql)?
            } else {
                Vec::new()
            };
            self.reference(descriptor, columns, target, target_columns, sql)?;
        }
        // CHECK, KEY, INDEX and EXCLUDE carry nothing a descriptor keeps

        Ok(())
    }

    fn reference(
        &mut self,
        descriptor: &mut RecordDescriptor,
        columns: Vec<String>,
        target: String,
        target_columns: Vec<String>,
        sql: &str,
    ) -> Result<()> {
        for column in &columns {
            field_mut(descriptor, column, sql)?;
        }

        if target_columns.is_empty() {
            self.pending.push(PendingReference {
                table: descriptor.name.clone(),
                columns,
                target,
            });
            return Ok(());
        }

        if target_columns.len() != columns.len() {
            return Err(Error::malformed(
                "foreign key and referenced column counts differ",
                sql,
            ));
        }

        for (column, target_column) in columns.iter().zip(&target_columns) {
            field_mut(descriptor, column, sql)?.references =
                Some(ForeignKeyRef::new(&target, target_column));
        }
        Ok(())
    }

    fn view(&mut self, mut cursor: Cursor<'_>, sql: &str) -> Result<()> {
        cursor.eat_keywords(&["IF", "NOT", "EXISTS"]);
        let name = cursor
            .object_name()
            .ok_or_else(|| Error::malformed("expected a view name", sql))?;

        let columns = if cursor.peek_is(TokenKind::LParen) {
            column_list(&mut cursor, sql)?
        } else {
            Vec::new()
        };

        // WITH SCHEMABINDING and similar options sit before AS
        while cursor.peek().map_or(false, |t| !t.is_keyword("AS")) {
            cursor.next();
        }
        if !cursor.eat_keyword("AS") {
            return Err(Error::malformed("expected AS SELECT in view", sql));
        }
        while cursor.eat(TokenKind::LParen) {}
        if !cursor.peek_keyword("SELECT") {
            warn!(view = %name, "View body is not a plain SELECT, skipping");
            self.report.skipped.push(SkippedStatement {
                kind: "VIEW".to_string(),
                statement: sql.to_string(),
            });
            return Ok(());
        }

        debug!(view = %name, "Parsed CREATE VIEW");
        self.views.push(PendingView {
            name,
            columns,
            select: cursor.rest().to_vec(),
        });
        Ok(())
    }

    fn finish(mut self) -> Result<RecoveredSchema> {
        let pending = std::mem::take(&mut self.pending);
        resolve_pending_references(&mut self.tables, pending, &mut self.report.warnings);

        for table in &self.tables {
            for field in &table.fields {
                if let Some(reference) = &field.references {
                    if find_descriptor(&self.tables, &reference.table).is_none() {
                        self.report.warnings.push(format!(
                            "Column {}.{} references '{}', which is not part of this schema",
                            table.name, field.name, reference.table
                        ));
                    }
                }
            }
        }

        let mut views: Vec<RecordDescriptor> = Vec::new();
        for pending in std::mem::take(&mut self.views) {
            if find_descriptor(&self.tables, &pending.name).is_some() || find_descriptor(&views, &pending.name).is_some() {
                return Err(Error::malformed(
                    format!("view '{}' is defined twice", pending.name),
                    pending.name.clone(),
                ));
            }
            let view = self.resolve_view(&pending, &views);
            views.push(view);
        }

        for warning in &self.report.warnings {
            warn!("{}", warning);
        }

        let mut report = self.report;
        report.descriptors = self.tables;
        report.descriptors.extend(views);
        Ok(report)
    }

    fn lookup<'d>(&'d self, name: &str, views: &'d [RecordDescriptor]) -> Option<&'d RecordDescriptor> {
        find_descriptor(&self.tables, name).or_else(|| find_descriptor(views, name))
    }

    /// Resolve a simple pass-through SELECT against the tables parsed so far
    fn resolve_view(&mut self, view: &PendingView, views: &[RecordDescriptor]) -> RecordDescriptor {
        let tokens = view.select.as_slice();
        let mut cursor = Cursor::new(tokens);
        cursor.eat_keyword("SELECT");
        cursor.eat_any_keyword(&["DISTINCT", "ALL"]);
        if cursor.eat_keyword("TOP") {
            cursor.skip_term();
            cursor.eat_keyword("PERCENT");
        }

        // Select items run up to the depth-0 FROM
        let body = cursor.rest();
        let mut items = Vec::new();
        let mut depth = 0usize;
        let mut start = 0;
        let mut from = None;
        for (i, token) in body.iter().enumerate() {
            match token.kind {
                TokenKind::LParen => depth += 1,
                TokenKind::RParen => depth = depth.saturating_sub(1),
                TokenKind::Comma if depth == 0 => {
                    items.push(&body[start..i]);
                    start = i + 1;
                }
                TokenKind::Word if depth == 0 && token.is_keyword("FROM") => {
                    from = Some(i);
                    break;
                }
                _ => {}
            }
        }
        items.push(&body[start..from.unwrap_or(body.len())]);

        let sources = from.map_or_else(Vec::new, |i| parse_from(&body[i + 1..]));

        let mut descriptor = RecordDescriptor::view(&view.name);
        for item in items.into_iter().filter(|item| !item.is_empty()) {
            for field in self.select_item(&view.name, item, &sources, views) {
                if descriptor.field(&field.name).is_some() {
                    self.report.warnings.push(format!(
                        "View '{}' selects '{}' more than once; keeping the first",
                        view.name, field.name
                    ));
                    continue;
                }
                descriptor.fields.push(field);
            }
        }

        if !view.columns.is_empty() {
            if view.columns.len() != descriptor.fields.len() {
                self.report.warnings.push(format!(
                    "View '{}' names {} columns but selects {}",
                    view.name,
                    view.columns.len(),
                    descriptor.fields.len()
                ));
            }
            for (field, name) in descriptor.fields.iter_mut().zip(&view.columns) {
                field.name = name.clone();
            }
        }

        descriptor
    }

    fn select_item(
        &mut self,
        view: &str,
        item: &[Token],
        sources: &[Source],
        views: &[RecordDescriptor],
    ) -> Vec<FieldDescriptor> {
        let (expression, alias) = split_alias(item);
        let raw = self.text(expression);

        match expression {
            // *
            [star] if star.is_symbol("*") => {
                let mut fields = Vec::new();
                for source in sources {
                    match source.table.as_deref().and_then(|t| self.lookup(t, views)) {
                        Some(table) => fields.extend(passthrough_fields(table, source.optional)),
                        None => self.report.warnings.push(format!(
                            "View '{}' selects * from a source that cannot be resolved",
                            view
                        )),
                    }
                }
                return fields;
            }
            // q.*
            [qualifier, dot, star]
                if qualifier.is_identifier() && dot.kind == TokenKind::Dot && star.is_symbol("*") =>
            {
                let source = sources.iter().find(|s| s.answers_to(&qualifier.text));
                match source.and_then(|s| s.table.as_deref().and_then(|t| self.lookup(t, views)).map(|t| (t, s.optional))) {
                    Some((table, optional)) => return passthrough_fields(table, optional),
                    None => {
                        self.report.warnings.push(format!(
                            "View '{}' selects {}.* which cannot be resolved",
                            view, qualifier.text
                        ));
                        return Vec::new();
                    }
                }
            }
            _ => {}
        }

        if let Some((qualifier, column)) = column_reference(expression) {
            let name = alias.clone().unwrap_or_else(|| column.clone());
            if let Some((semantic_type, nullable)) = self.resolve_column(qualifier.as_deref(), &column, sources, views) {
                return vec![FieldDescriptor::new(&name, semantic_type).nullable(nullable)];
            }
            return vec![self.view_fallback(view, &name, raw)];
        }

        // COALESCE(a, b, ...) keeps the type of its first resolvable column
        if let [function, open, .., close] = expression {
            if function.is_keyword("COALESCE") && open.kind == TokenKind::LParen && close.kind == TokenKind::RParen {
                let mut inner = Cursor::new(&expression[1..]);
                inner.next();
                let arguments = split_items(&mut inner, raw).unwrap_or_default();

                let mut semantic_type = None;
                let mut first_column = None;
                let mut nullable = true;
                for argument in arguments {
                    if let Some((qualifier, column)) = column_reference(argument) {
                        if let Some((t, n)) = self.resolve_column(qualifier.as_deref(), &column, sources, views) {
                            semantic_type.get_or_insert(t);
                            nullable &= n;
                        }
                        first_column.get_or_insert(column);
                    } else if let [value] = argument {
                        if matches!(value.kind, TokenKind::Literal | TokenKind::Number) {
                            nullable = false;
                        }
                    }
                }

                let name = alias.clone().or(first_column);
                if let (Some(semantic_type), Some(name)) = (semantic_type, name.clone()) {
                    return vec![FieldDescriptor::new(&name, semantic_type).nullable(nullable)];
                }
                let name = name.unwrap_or_else(|| raw.to_string());
                return vec![self.view_fallback(view, &name, raw)];
            }
        }

        let name = alias.unwrap_or_else(|| raw.to_string());
        vec![self.view_fallback(view, &name, raw)]
    }

    fn resolve_column(
        &self,
        qualifier: Option<&str>,
        column: &str,
        sources: &[Source],
        views: &[RecordDescriptor],
    ) -> Option<(SemanticType, bool)> {
        sources
            .iter()
            .filter(|s| qualifier.map_or(true, |q| s.answers_to(q)))
            .find_map(|source| {
                let table = self.lookup(source.table.as_deref()?, views)?;
                let field = table.field(column)?;
                Some((field.semantic_type, field.nullable || source.optional))
            })
    }

    fn view_fallback(&mut self, view: &str, name: &str, raw: &str) -> FieldDescriptor {
        warn!(view, column = name, expression = raw, "Cannot resolve view column, falling back to text");
        self.report.fallbacks.push(TypeFallback {
            table: view.to_string(),
            column: name.to_string(),
            raw_type: raw.to_string(),
        });
        FieldDescriptor::new(name, SemanticType::Text).nullable(true)
    }
}

fn field_mut<'d>(
    descriptor: &'d mut RecordDescriptor,
    column: &str,
    sql: &str,
) -> Result<&'d mut FieldDescriptor> {
    let table = descriptor.name.clone();
    descriptor
        .fields
        .iter_mut()
        .find(|f| f.name.eq_ignore_ascii_case(column))
        .ok_or_else(|| {
            Error::malformed(
                format!("constraint on '{}' names unknown column '{}'", table, column),
                sql,
            )
        })
}

/// Table items that define no column and carry nothing a descriptor keeps:
/// `CHECK (...)`, MySQL `KEY name (cols)` and PostgreSQL `EXCLUDE`
fn is_ignored_table_item(item: &[Token], dialect: Dialect) -> bool {
    let Some(first) = item.first() else {
        return false;
    };

    if first.is_any_keyword(&["EXCLUDE", "FULLTEXT", "SPATIAL"]) {
        return true;
    }
    if first.is_keyword("CHECK") {
        return item.get(1).map_or(false, |t| t.kind == TokenKind::LParen);
    }
    if !first.is_any_keyword(&["KEY", "INDEX"]) {
        return false;
    }

    match item.get(1) {
        Some(next) if next.kind == TokenKind::LParen => true,
        Some(next) if next.is_identifier() => {
            item.get(2).map_or(false, |t| t.kind == TokenKind::LParen)
                && from_sql_type(&next.text, dialect).is_err()
        }
        _ => false,
    }
}

/// Split a trailing `[AS] alias` off a select item
fn split_alias(item: &[Token]) -> (&[Token], Option<String>) {
    let n = item.len();
    if n >= 3 && item[n - 2].is_keyword("AS") && item[n - 1].is_identifier() {
        return (&item[..n - 2], Some(item[n - 1].text.clone()));
    }
    if n >= 2 {
        let last = &item[n - 1];
        let previous = &item[n - 2];
        let implicit = last.is_identifier()
            && !last.is_keyword("END")
            && matches!(previous.kind, TokenKind::Word | TokenKind::Quoted | TokenKind::RParen | TokenKind::Literal | TokenKind::Number);
        if implicit {
            return (&item[..n - 1], Some(last.text.clone()));
        }
    }
    (item, None)
}

/// `col`, `q.col` or `schema.q.col`
fn column_reference(expression: &[Token]) -> Option<(Option<String>, String)> {
    let identifiers_at = |indices: &[usize]| indices.iter().all(|&i| expression[i].is_identifier());
    let dots_at = |indices: &[usize]| indices.iter().all(|&i| expression[i].kind == TokenKind::Dot);

    match expression.len() {
        1 if identifiers_at(&[0]) && !expression[0].is_keyword("NULL") => {
            Some((None, expression[0].text.clone()))
        }
        3 if identifiers_at(&[0, 2]) && dots_at(&[1]) => {
            Some((Some(expression[0].text.clone()), expression[2].text.clone()))
        }
        5 if identifiers_at(&[0, 2, 4]) && dots_at(&[1, 3]) => {
            Some((Some(expression[2].text.clone()), expression[4].text.clone()))
        }
        _ => None,
    }
}

fn passthrough_fields(table: &RecordDescriptor, optional: bool) -> Vec<FieldDescriptor> {
    table
        .fields
        .iter()
        .map(|f| FieldDescriptor::new(&f.name, f.semantic_type).nullable(f.nullable || optional))
        .collect()
}

/// Parse the FROM clause of a view into its sources, tracking which sides of
/// outer joins may produce NULL rows
fn parse_from(tokens: &[Token]) -> Vec<Source> {
    const CLAUSE_END: &[&str] = &[
        "WHERE", "GROUP", "ORDER", "HAVING", "LIMIT", "UNION", "EXCEPT", "INTERSECT", "WINDOW",
        "OFFSET", "FETCH", "FOR",
    ];
    const NOT_ALIAS: &[&str] = &[
        "ON", "USING", "JOIN", "INNER", "LEFT", "RIGHT", "FULL", "CROSS", "NATURAL", "OUTER",
        "WHERE", "GROUP", "ORDER", "HAVING", "LIMIT", "UNION", "EXCEPT", "INTERSECT", "WINDOW",
        "OFFSET", "FETCH", "FOR", "WITH",
    ];

    let mut sources: Vec<Source> = Vec::new();
    let mut cursor = Cursor::new(tokens);
    let mut side = JoinSide::Inner;

    loop {
        // Table reference or derived table
        let table = if cursor.peek_is(TokenKind::LParen) {
            cursor.skip_balanced();
            None
        } else {
            match cursor.object_name() {
                Some(name) => Some(name),
                None => return sources,
            }
        };

        let alias = if cursor.eat_keyword("AS") {
            cursor.next().filter(|t| t.is_identifier()).map(|t| t.text.clone())
        } else if cursor.peek().map_or(false, |t| t.is_identifier() && !t.is_any_keyword(NOT_ALIAS)) {
            cursor.next().map(|t| t.text.clone())
        } else {
            None
        };

        let optional = match side {
            JoinSide::Inner => false,
            JoinSide::Left => true,
            JoinSide::Right => {
                sources.iter_mut().for_each(|s| s.optional = true);
                false
            }
            JoinSide::Full => {
                sources.iter_mut().for_each(|s| s.optional = true);
                true
            }
        };
        sources.push(Source { table, alias, optional });

        // Skip the join condition up to the next source
        loop {
            let Some(token) = cursor.peek() else {
                return sources;
            };

            if token.kind == TokenKind::Comma {
                cursor.next();
                side = JoinSide::Inner;
                break;
            }
            if token.is_any_keyword(CLAUSE_END) {
                return sources;
            }
            if token.is_any_keyword(&["NATURAL", "INNER", "CROSS", "LEFT", "RIGHT", "FULL", "JOIN"]) {
                cursor.eat_keyword("NATURAL");
                side = if cursor.eat_keyword("LEFT") {
                    JoinSide::Left
                } else if cursor.eat_keyword("RIGHT") {
                    JoinSide::Right
                } else if cursor.eat_keyword("FULL") {
                    JoinSide::Full
                } else {
                    cursor.eat_any_keyword(&["INNER", "CROSS"]);
                    JoinSide::Inner
                };
                cursor.eat_keyword("OUTER");
                if !cursor.eat_keyword("JOIN") {
                    return sources;
                }
                break;
            }
            cursor.skip_balanced();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const PORTFOLIO: &str = "CREATE TABLE Portfolio (
        sedol NCHAR(7) PRIMARY KEY,
        cluster NVARCHAR(50),
        n_invested BIGINT
        CONSTRAINT FK_Sedol FOREIGN KEY (sedol) REFERENCES benchmark(sedol)
    )

    CREATE TABLE Benchmark (
        sedol NCHAR(7) PRIMARY KEY,
        name NVARCHAR(50),
        n_available BIGINT,
        is_reit BIT,
    )

    CREATE VIEW master AS
    SELECT p.sedol, b.name, p.n_invested, b.n_available
    FROM Portfolio p
    JOIN Benchmark b ON p.sedol = b.sedol
    ";

    #[test]
    fn test_tables_and_views_without_semicolons() {
        let schema = parse_ddl(PORTFOLIO, Dialect::MsSql).unwrap();
        assert!(schema.is_clean(), "{:?}", schema);

        let names: Vec<&str> = schema.descriptors.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["Portfolio", "Benchmark", "master"]);

        let portfolio = &schema.descriptors[0];
        assert_eq!(
            portfolio.fields,
            vec![
                FieldDescriptor::new("sedol", SemanticType::Text)
                    .primary_key()
                    .references("benchmark", "sedol"),
                FieldDescriptor::new("cluster", SemanticType::Text).nullable(true),
                FieldDescriptor::new("n_invested", SemanticType::Integer).nullable(true),
            ]
        );

        let benchmark = &schema.descriptors[1];
        assert_eq!(benchmark.fields[3], FieldDescriptor::new("is_reit", SemanticType::Boolean).nullable(true));

        let master = &schema.descriptors[2];
        assert!(master.view);
        assert_eq!(
            master.fields,
            vec![
                FieldDescriptor::new("sedol", SemanticType::Text),
                FieldDescriptor::new("name", SemanticType::Text).nullable(true),
                FieldDescriptor::new("n_invested", SemanticType::Integer).nullable(true),
                FieldDescriptor::new("n_available", SemanticType::Integer).nullable(true),
            ]
        );
    }

    #[test]
    fn test_outer_joins_make_columns_nullable() {
        let ddl = "
            CREATE TABLE users (id INTEGER PRIMARY KEY, email TEXT NOT NULL);
            CREATE TABLE profiles (user_id INTEGER NOT NULL REFERENCES users, bio TEXT NOT NULL);
            CREATE VIEW user_bios AS
                SELECT u.email AS address, pr.bio, COALESCE(pr.bio, 'none') AS bio_or_default
                FROM users AS u LEFT OUTER JOIN profiles pr ON pr.user_id = u.id
                WHERE u.id > 0;
        ";
        let schema = parse_ddl(ddl, Dialect::Sqlite).unwrap();

        let profiles = schema.descriptor("profiles").unwrap();
        assert_eq!(profiles.fields[0].references, Some(ForeignKeyRef::new("users", "id")));

        let view = schema.descriptor("user_bios").unwrap();
        assert_eq!(
            view.fields,
            vec![
                FieldDescriptor::new("address", SemanticType::Text),
                FieldDescriptor::new("bio", SemanticType::Text).nullable(true),
                FieldDescriptor::new("bio_or_default", SemanticType::Text),
            ]
        );
    }

    #[test]
    fn test_unknown_types_fall_back_to_text() {
        let ddl = "CREATE TABLE places (id INTEGER PRIMARY KEY, shape GEOMETRY NOT NULL)";
        let schema = parse_ddl(ddl, Dialect::Sqlite).unwrap();

        assert_eq!(schema.descriptors[0].fields[1], FieldDescriptor::new("shape", SemanticType::Text));
        assert_eq!(
            schema.fallbacks,
            vec![TypeFallback {
                table: "places".to_string(),
                column: "shape".to_string(),
                raw_type: "GEOMETRY".to_string(),
            }]
        );
    }

    #[test]
    fn test_missing_closing_parenthesis() {
        let ddl = "CREATE TABLE broken (id INTEGER PRIMARY KEY, name TEXT";
        match parse_ddl(ddl, Dialect::Sqlite) {
            Err(Error::MalformedDdl { reason, statement }) => {
                assert_eq!(reason, "missing closing parenthesis");
                assert!(statement.starts_with("CREATE TABLE broken"));
            }
            other => panic!("expected malformed DDL, got {:?}", other),
        }
    }

    #[test]
    fn test_batch_failures() {
        assert!(matches!(
            parse_ddl("INSERT INTO t VALUES (1);", Dialect::Sqlite),
            Err(Error::MalformedDdl { .. })
        ));
        assert!(matches!(
            parse_ddl("CREATE TABLE t (id INTEGER, PRIMARY KEY (missing));", Dialect::Sqlite),
            Err(Error::MalformedDdl { .. })
        ));
        assert!(matches!(
            parse_ddl("CREATE TABLE t (id INTEGER, id TEXT);", Dialect::Sqlite),
            Err(Error::MalformedDdl { .. })
        ));
        assert!(matches!(
            parse_ddl("CREATE TABLE \"t (id INTEGER);", Dialect::Postgres),
            Err(Error::MalformedDdl { .. })
        ));
    }

    #[test]
    fn test_quoting_comments_and_batches() {
        let ddl = "
            -- accounts
            CREATE TABLE IF NOT EXISTS [dbo].[Account Holder] (
                [Id] BIGINT NOT NULL, /* surrogate */
                [Full Name] NVARCHAR(255) NULL DEFAULT N'unknown',
                Opened DATETIME2 DEFAULT (getdate()),
                CONSTRAINT PK_Holder PRIMARY KEY CLUSTERED ([Id] ASC)
            )
            GO
            CREATE INDEX ix_holder_name ON [Account Holder] ([Full Name])
            GO
        ";
        let schema = parse_ddl(ddl, Dialect::MsSql).unwrap();

        let holder = &schema.descriptors[0];
        assert_eq!(holder.name, "Account Holder");
        assert_eq!(
            holder.fields,
            vec![
                FieldDescriptor::new("Id", SemanticType::Integer).primary_key(),
                FieldDescriptor::new("Full Name", SemanticType::Text).nullable(true),
                FieldDescriptor::new("Opened", SemanticType::DateTime).nullable(true),
            ]
        );
        assert_eq!(schema.skipped.len(), 1);
        assert_eq!(schema.skipped[0].kind, "INDEX");
    }

    #[test]
    fn test_trigger_bodies_stay_in_one_statement() {
        let ddl = "
            CREATE TABLE t (id INTEGER PRIMARY KEY, x INTEGER);
            CREATE TRIGGER trg AFTER INSERT ON t
            BEGIN
                UPDATE t SET x = CASE WHEN new.x IS NULL THEN 0 ELSE new.x END WHERE id = new.id;
                UPDATE t SET x = x + 1;
            END;
            CREATE TABLE u (id INTEGER PRIMARY KEY);
        ";
        let schema = parse_ddl(ddl, Dialect::Sqlite).unwrap();

        let names: Vec<&str> = schema.descriptors.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["t", "u"]);
        assert_eq!(schema.skipped.len(), 1);
        assert_eq!(schema.skipped[0].kind, "TRIGGER");
        assert!(schema.skipped[0].statement.trim_end().ends_with("END"));
    }

    #[test]
    fn test_tsql_trigger_body_within_a_batch() {
        let ddl = "
            CREATE TABLE audit (id BIGINT NOT NULL PRIMARY KEY)
            GO
            CREATE TRIGGER trg_audit ON audit AFTER INSERT AS
            BEGIN
                SET NOCOUNT ON;
                BEGIN TRANSACTION;
                IF EXISTS (SELECT 1 FROM inserted) BEGIN UPDATE audit SET id = id; END;
                COMMIT;
            END
            GO
            CREATE TABLE later (id BIGINT NOT NULL PRIMARY KEY)
        ";
        let schema = parse_ddl(ddl, Dialect::MsSql).unwrap();

        let names: Vec<&str> = schema.descriptors.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["audit", "later"]);
        assert_eq!(schema.skipped.len(), 1);
        assert_eq!(schema.skipped[0].kind, "TRIGGER");
    }

    #[test]
    fn test_mysql_table_items() {
        let ddl = "CREATE TABLE `orders` (
            `id` bigint unsigned NOT NULL AUTO_INCREMENT,
            `paid` tinyint(1) NOT NULL DEFAULT '0',
            `total` decimal(10,2) DEFAULT NULL,
            PRIMARY KEY (`id`),
            UNIQUE KEY `uq_total` (`total`),
            KEY `ix_paid` (`paid`)
        ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4;";
        let schema = parse_ddl(ddl, Dialect::MySql).unwrap();

        assert_eq!(
            schema.descriptors[0].fields,
            vec![
                FieldDescriptor::new("id", SemanticType::Integer).primary_key(),
                FieldDescriptor::new("paid", SemanticType::Boolean),
                FieldDescriptor::new("total", SemanticType::Float).nullable(true).unique(),
            ]
        );
    }

    #[test]
    fn test_pending_reference_resolves_to_primary_key() {
        let ddl = "
            CREATE TABLE line (order_id BIGINT NOT NULL, FOREIGN KEY (order_id) REFERENCES public.orders);
            CREATE TABLE orders (number BIGINT PRIMARY KEY);
        ";
        let schema = parse_ddl(ddl, Dialect::Postgres).unwrap();
        assert_eq!(
            schema.descriptors[0].fields[0].references,
            Some(ForeignKeyRef::new("orders", "number"))
        );
    }

    #[test]
    fn test_tokenizer_spans() {
        let tokens = tokenize("a.\"B\"\"c\" 'x' -- note\n1.5").unwrap();
        let kinds: Vec<TokenKind> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![TokenKind::Word, TokenKind::Dot, TokenKind::Quoted, TokenKind::Literal, TokenKind::Number]
        );
        assert_eq!(tokens[2].text, "B\"c");
        assert_eq!(tokens[4].text, "1.5");
    }
}
