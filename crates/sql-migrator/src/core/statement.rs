//! SQL statement composition and sanitization.
//!
//! Generated DDL is assembled with [`StatementBuilder`], which keeps identifier
//! slots and value slots apart at the type level: identifiers are validated and
//! quoted in the dialect's style, values are always quoted as literals, and only
//! fragments pushed with [`StatementBuilder::raw`] reach the output verbatim.
//!
//! The module also owns the two free-standing sanitizers applied to user input
//! that ends up in DDL (data types and default values) and the splitters used
//! when migration text is read back from a unit store.

use crate::core::identifier::{qualify, quote_identifier, quote_literal, LiteralStyle, QuoteStyle};
use crate::error::{MigrateError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

/// Marker written in front of every statement of a migration unit.
pub const STATEMENT_SEPARATOR: &str = "/* xc */";

/// A single rendered SQL statement, without a trailing terminator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Statement(String);

impl Statement {
    /// Wrap trusted SQL text.
    pub fn raw(sql: impl Into<String>) -> Self {
        let sql = sql.into();
        Statement(sql.trim().trim_end_matches(';').trim_end().to_string())
    }

    pub fn sql(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Quoting rules of one dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quoting {
    pub ident: QuoteStyle,
    pub literal: LiteralStyle,
}

impl Quoting {
    pub const fn new(ident: QuoteStyle, literal: LiteralStyle) -> Self {
        Self { ident, literal }
    }

    pub fn ident(&self, name: &str) -> Result<String> {
        quote_identifier(self.ident, name)
    }

    pub fn value(&self, value: &str) -> String {
        quote_literal(self.literal, value)
    }

    pub fn builder(&self) -> StatementBuilder {
        StatementBuilder::new(*self)
    }
}

/// Typed statement builder.
///
/// The first quoting failure is remembered and reported by [`build`](Self::build),
/// so call chains stay linear.
#[derive(Debug)]
pub struct StatementBuilder {
    quoting: Quoting,
    sql: String,
    error: Option<MigrateError>,
}

impl StatementBuilder {
    pub fn new(quoting: Quoting) -> Self {
        Self {
            quoting,
            sql: String::new(),
            error: None,
        }
    }

    fn fail(&mut self, err: MigrateError) {
        if self.error.is_none() {
            self.error = Some(err);
        }
    }

    /// Append trusted text.
    pub fn raw(mut self, fragment: &str) -> Self {
        self.sql.push_str(fragment);
        self
    }

    /// Append a quoted identifier.
    pub fn ident(mut self, name: &str) -> Self {
        match self.quoting.ident(name) {
            Ok(quoted) => self.sql.push_str(&quoted),
            Err(e) => self.fail(e),
        }
        self
    }

    /// Append comma-joined quoted identifiers, e.g. for `PRIMARY KEY(a, b)`.
    pub fn idents<S: AsRef<str>>(mut self, names: &[S]) -> Self {
        let mut parts = Vec::with_capacity(names.len());
        for name in names {
            match self.quoting.ident(name.as_ref()) {
                Ok(quoted) => parts.push(quoted),
                Err(e) => {
                    self.fail(e);
                    return self;
                }
            }
        }
        self.sql.push_str(&parts.join(", "));
        self
    }

    /// Append a schema-qualified identifier.
    pub fn qualified(mut self, schema: Option<&str>, name: &str) -> Self {
        match qualify(self.quoting.ident, schema, name) {
            Ok(quoted) => self.sql.push_str(&quoted),
            Err(e) => self.fail(e),
        }
        self
    }

    /// Append a quoted string literal.
    pub fn value(mut self, value: &str) -> Self {
        let quoted = self.quoting.value(value);
        self.sql.push_str(&quoted);
        self
    }

    /// Append a data type after checking it with [`sanitize_data_type`].
    pub fn data_type(mut self, raw: &str) -> Self {
        match sanitize_data_type(raw) {
            Ok(dt) => self.sql.push_str(dt),
            Err(e) => self.fail(e),
        }
        self
    }

    /// Apply `f` only when `cond` holds.
    pub fn when(self, cond: bool, f: impl FnOnce(Self) -> Self) -> Self {
        if cond {
            f(self)
        } else {
            self
        }
    }

    pub fn build(self) -> Result<Statement> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(Statement::raw(self.sql)),
        }
    }
}

pub(crate) type PatternCell = OnceLock<std::result::Result<Regex, regex::Error>>;

pub(crate) fn pattern(cell: &'static PatternCell, src: &str) -> Result<&'static Regex> {
    cell.get_or_init(|| Regex::new(src))
        .as_ref()
        .map_err(|e| MigrateError::Config(format!("Invalid pattern {}: {}", src, e)))
}

fn data_type_pattern() -> Result<&'static Regex> {
    static CELL: PatternCell = OnceLock::new();
    pattern(&CELL, r"^[A-Za-z0-9_ -]+(?:\([0-9]+(?:\s?,\s?[0-9]+)?\))?$")
}

/// Check a raw data type before it is composed into DDL.
///
/// Accepts ASCII letters, digits, underscores, spaces and dashes, optionally
/// followed by `(n)` or `(n,m)`. Anything else is rejected with `InvalidDataType`.
pub fn sanitize_data_type(raw: &str) -> Result<&str> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || !data_type_pattern()?.is_match(trimmed) {
        return Err(MigrateError::InvalidDataType(raw.to_string()));
    }
    Ok(trimmed)
}

fn timestamp_default_pattern() -> Result<&'static Regex> {
    static CELL: PatternCell = OnceLock::new();
    pattern(
        &CELL,
        r"(?i)^current_timestamp(?:\(\))?(?:\s+on\s+update\s+current_timestamp(?:\(\))?)?$",
    )
}

fn numeric_pattern() -> Result<&'static Regex> {
    static CELL: PatternCell = OnceLock::new();
    pattern(&CELL, r"^-?\d+(?:\.\d+)?$")
}

fn call_pattern() -> Result<&'static Regex> {
    static CELL: PatternCell = OnceLock::new();
    pattern(&CELL, r"^[A-Za-z0-9_]+\(\)$")
}

/// Canonicalize a default value for a `DEFAULT` clause.
///
/// Expressions (`NULL`, booleans, numbers, zero-argument calls, `CURRENT_TIMESTAMP`
/// with optional `ON UPDATE CURRENT_TIMESTAMP`) pass through verbatim. A string
/// already wrapped in matching quotes is unwrapped and re-quoted; anything else is
/// quoted as a literal.
pub fn sanitize_default_value(value: Option<&str>, literal: LiteralStyle) -> Result<Option<String>> {
    let Some(value) = value else {
        return Ok(None);
    };
    if value.contains('\0') {
        return Err(MigrateError::InvalidDefaultValue(format!("{:?}", value)));
    }
    let trimmed = value.trim();

    if trimmed.eq_ignore_ascii_case("null")
        || trimmed.eq_ignore_ascii_case("true")
        || trimmed.eq_ignore_ascii_case("false")
        || numeric_pattern()?.is_match(trimmed)
        || call_pattern()?.is_match(trimmed)
        || timestamp_default_pattern()?.is_match(trimmed)
    {
        return Ok(Some(trimmed.to_string()));
    }

    if let Some(inner) = unwrap_quoted(trimmed) {
        return Ok(Some(quote_literal(literal, &inner)));
    }

    Ok(Some(quote_literal(literal, value)))
}

fn unwrap_quoted(value: &str) -> Option<String> {
    let first = value.chars().next()?;
    if value.len() < 2 || !(first == '\'' || first == '"') || !value.ends_with(first) {
        return None;
    }
    let inner = &value[1..value.len() - 1];
    Some(inner.replace("\\'", "'").replace("\\\"", "\""))
}

/// Words that follow `BEGIN` when it starts a transaction rather than a block.
const TRANSACTION_WORDS: &[&str] = &["TRANSACTION", "TRAN", "WORK", "DEFERRED", "IMMEDIATE", "EXCLUSIVE"];

/// Words that follow `END` when it closes a construct that opened no block.
const UNCOUNTED_ENDS: &[&str] = &["IF", "LOOP", "WHILE", "REPEAT"];

enum Pending {
    Begin,
    End,
}

/// `BEGIN ... END` / `CASE ... END` nesting seen so far.
#[derive(Default)]
struct Blocks {
    depth: usize,
    pending: Option<Pending>,
}

impl Blocks {
    fn word(&mut self, word: &str) {
        let upper = word.to_ascii_uppercase();
        match self.pending.take() {
            Some(Pending::Begin) if !TRANSACTION_WORDS.contains(&upper.as_str()) => self.depth += 1,
            Some(Pending::End) if UNCOUNTED_ENDS.contains(&upper.as_str()) => return,
            Some(Pending::End) => {
                self.close();
                if upper == "CASE" {
                    return;
                }
            }
            _ => {}
        }
        match upper.as_str() {
            "BEGIN" => self.pending = Some(Pending::Begin),
            "CASE" => self.depth += 1,
            "END" => self.pending = Some(Pending::End),
            _ => {}
        }
    }

    /// Any other token; `terminator` is true for `;`.
    fn symbol(&mut self, terminator: bool) {
        match self.pending.take() {
            Some(Pending::Begin) if !terminator => self.depth += 1,
            Some(Pending::End) => self.close(),
            _ => {}
        }
    }

    fn close(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }
}

/// End (exclusive) of a quoted span opened at `start` and closed by `close`.
/// A doubled closer is an escape; so is a backslash inside string literals.
fn quoted_end(chars: &[char], start: usize, close: char) -> usize {
    let backslash = close == '\'' || close == '"';
    let mut j = start + 1;
    while j < chars.len() {
        let c = chars[j];
        if backslash && c == '\\' {
            j += 2;
            continue;
        }
        if c == close {
            if chars.get(j + 1) == Some(&close) {
                j += 2;
                continue;
            }
            return j + 1;
        }
        j += 1;
    }
    chars.len()
}

fn comment_end(chars: &[char], start: usize) -> usize {
    if chars[start] == '-' {
        return chars[start..]
            .iter()
            .position(|&c| c == '\n')
            .map_or(chars.len(), |n| start + n);
    }
    let mut j = start + 2;
    while j + 1 < chars.len() {
        if chars[j] == '*' && chars[j + 1] == '/' {
            return j + 2;
        }
        j += 1;
    }
    chars.len()
}

/// Split SQL text on statement-terminating `;`.
///
/// Quoted strings and identifiers (`'`, `"`, backtick, `[...]`) and comments
/// are opaque. A `;` inside a `BEGIN ... END` or `CASE ... END` block does not
/// terminate a statement; `BEGIN TRANSACTION` and `END IF` do not count as
/// block edges. Blank pieces are dropped.
pub fn split_statements(sql: &str) -> Vec<String> {
    let chars: Vec<char> = sql.chars().collect();
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut blocks = Blocks::default();
    let mut i = 0;

    while i < chars.len() {
        let ch = chars[i];
        let next = chars.get(i + 1).copied();

        let end = match ch {
            '\'' | '"' | '`' => {
                blocks.symbol(false);
                quoted_end(&chars, i, ch)
            }
            '[' => {
                blocks.symbol(false);
                quoted_end(&chars, i, ']')
            }
            '-' if next == Some('-') => comment_end(&chars, i),
            '/' if next == Some('*') => comment_end(&chars, i),
            c if c.is_alphanumeric() || c == '_' => {
                let len = chars[i..]
                    .iter()
                    .position(|c| !(c.is_alphanumeric() || *c == '_'))
                    .unwrap_or(chars.len() - i);
                let word: String = chars[i..i + len].iter().collect();
                blocks.word(&word);
                i + len
            }
            ';' => {
                blocks.symbol(true);
                if blocks.depth == 0 {
                    if !current.trim().is_empty() {
                        statements.push(current.trim().to_string());
                    }
                    current.clear();
                } else {
                    current.push(ch);
                }
                i += 1;
                continue;
            }
            c if c.is_whitespace() => i + 1,
            _ => {
                blocks.symbol(false);
                i + 1
            }
        };
        current.extend(&chars[i..end]);
        i = end;
    }

    if !current.trim().is_empty() {
        statements.push(current.trim().to_string());
    }
    statements
}

fn separator_pattern() -> Result<&'static Regex> {
    static CELL: PatternCell = OnceLock::new();
    pattern(&CELL, r"/\*\s*xc[\s\S]*?\s*\*/")
}

/// Render statements as migration unit text.
pub fn join_unit_sql(statements: &[Statement]) -> String {
    statements
        .iter()
        .filter(|s| !s.is_empty())
        .map(|s| format!("{}\n{};\n", STATEMENT_SEPARATOR, s.sql()))
        .collect()
}

/// Split migration unit text back into statements on the separator marker.
///
/// Text without any marker (written by hand) is split on `;` instead.
pub fn split_unit_sql(text: &str) -> Result<Vec<Statement>> {
    let separator = separator_pattern()?;
    if !separator.is_match(text) {
        return Ok(split_statements(text)
            .into_iter()
            .map(Statement::raw)
            .filter(|s| !s.is_empty())
            .collect());
    }
    Ok(separator
        .split(text)
        .map(Statement::raw)
        .filter(|s| !s.is_empty())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mysql() -> Quoting {
        Quoting::new(QuoteStyle::Backtick, LiteralStyle::Backslash)
    }

    fn mssql() -> Quoting {
        Quoting::new(QuoteStyle::Bracket, LiteralStyle::Standard)
    }

    // =========================================================================
    // StatementBuilder tests
    // =========================================================================

    #[test]
    fn test_builder_identifier_and_value_slots() {
        let stmt = mssql()
            .builder()
            .raw("UPDATE ")
            .qualified(Some("dbo"), "users")
            .raw(" SET ")
            .ident("name")
            .raw(" = ")
            .value("O'Brien")
            .build()
            .unwrap();
        assert_eq!(stmt.sql(), "UPDATE [dbo].[users] SET [name] = 'O''Brien'");
    }

    #[test]
    fn test_builder_ident_list() {
        let stmt = mysql()
            .builder()
            .raw("ALTER TABLE ")
            .ident("t")
            .raw(" ADD PRIMARY KEY(")
            .idents(&["a", "b"])
            .raw(")")
            .build()
            .unwrap();
        assert_eq!(stmt.sql(), "ALTER TABLE `t` ADD PRIMARY KEY(`a`, `b`)");
    }

    #[test]
    fn test_builder_reports_first_error() {
        let err = mysql()
            .builder()
            .raw("CREATE TABLE ")
            .ident("")
            .raw(" (x ")
            .data_type("int); DROP TABLE x;--")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("empty"));
    }

    #[test]
    fn test_builder_when() {
        let stmt = mysql()
            .builder()
            .raw("x")
            .when(false, |b| b.raw(" NOT NULL"))
            .when(true, |b| b.raw(" NULL"))
            .build()
            .unwrap();
        assert_eq!(stmt.sql(), "x NULL");
    }

    #[test]
    fn test_statement_raw_strips_terminator() {
        assert_eq!(Statement::raw("  DROP TABLE t ;  ").sql(), "DROP TABLE t");
        assert!(Statement::raw(";").is_empty());
    }

    // =========================================================================
    // sanitize_data_type tests
    // =========================================================================

    #[test]
    fn test_sanitize_data_type_accepts_common_types() {
        for dt in ["int", "varchar(255)", "decimal(10,2)", "decimal(10, 2)", "double precision", "timestamp with time zone", "NUMBER(38,0)"] {
            assert_eq!(sanitize_data_type(dt).unwrap(), dt);
        }
    }

    #[test]
    fn test_sanitize_data_type_rejects_injection() {
        let err = sanitize_data_type("int); DROP TABLE x;--").unwrap_err();
        assert!(matches!(err, MigrateError::InvalidDataType(_)));
        assert!(sanitize_data_type("").is_err());
        assert!(sanitize_data_type("varchar(abc)").is_err());
        assert!(sanitize_data_type("int`").is_err());
    }

    #[test]
    fn test_sanitize_data_type_is_ascii_only() {
        assert!(sanitize_data_type("v\u{0430}rchar(10)").is_err());
        assert!(sanitize_data_type("int\u{00a0}eger").is_err());
        assert!(sanitize_data_type("numeric(\u{0661}\u{0662})").is_err());
    }

    // =========================================================================
    // sanitize_default_value tests
    // =========================================================================

    fn default_of(v: &str) -> String {
        sanitize_default_value(Some(v), LiteralStyle::Standard)
            .unwrap()
            .unwrap()
    }

    #[test]
    fn test_default_none_for_null() {
        assert_eq!(sanitize_default_value(None, LiteralStyle::Standard).unwrap(), None);
    }

    #[test]
    fn test_default_passthrough_expressions() {
        assert_eq!(default_of("NULL"), "NULL");
        assert_eq!(default_of("true"), "true");
        assert_eq!(default_of("FaLsE"), "FaLsE");
        assert_eq!(default_of("42"), "42");
        assert_eq!(default_of("3.14"), "3.14");
        assert_eq!(default_of("-1"), "-1");
        assert_eq!(default_of("uuid()"), "uuid()");
        assert_eq!(default_of("CURRENT_TIMESTAMP"), "CURRENT_TIMESTAMP");
        assert_eq!(
            default_of("current_timestamp() on update current_timestamp()"),
            "current_timestamp() on update current_timestamp()"
        );
    }

    #[test]
    fn test_default_rewraps_quoted_strings() {
        assert_eq!(default_of("'hello'"), "'hello'");
        assert_eq!(default_of("\"it\\'s\""), "'it''s'");
    }

    #[test]
    fn test_default_quotes_everything_else() {
        assert_eq!(default_of("hello world"), "'hello world'");
        assert_eq!(default_of("now() + 1"), "'now() + 1'");
    }

    #[test]
    fn test_default_injection_is_quoted() {
        let out = default_of("'; DROP TABLE x; --'");
        assert_eq!(out, "'; DROP TABLE x; --'");
        let out = default_of("x'; DROP TABLE x; --");
        assert_eq!(out, "'x''; DROP TABLE x; --'");
        assert!(out.starts_with('\'') && out.ends_with('\''));
    }

    #[test]
    fn test_default_rejects_null_byte() {
        let err = sanitize_default_value(Some("a\0b"), LiteralStyle::Standard).unwrap_err();
        assert!(matches!(err, MigrateError::InvalidDefaultValue(_)));
    }

    // =========================================================================
    // Splitting tests
    // =========================================================================

    #[test]
    fn test_split_statements_respects_quotes() {
        let parts = split_statements("INSERT INTO t VALUES ('a;b'); UPDATE t SET x = \"c;d\";;");
        assert_eq!(
            parts,
            vec!["INSERT INTO t VALUES ('a;b')", "UPDATE t SET x = \"c;d\""]
        );
    }

    #[test]
    fn test_split_statements_escaped_quote() {
        let parts = split_statements("SELECT 'it\\'s;fine'; SELECT 'a''b;c'");
        assert_eq!(parts, vec!["SELECT 'it\\'s;fine'", "SELECT 'a''b;c'"]);
    }

    #[test]
    fn test_split_statements_keeps_trigger_body() {
        let sql = "CREATE TRIGGER tr AFTER UPDATE ON t FOR EACH ROW BEGIN UPDATE t SET a = 1; END; SELECT 1";
        let parts = split_statements(sql);
        assert_eq!(parts.len(), 2);
        assert!(parts[0].ends_with("END"));
        assert_eq!(parts[1], "SELECT 1");
    }

    #[test]
    fn test_split_statements_opaque_identifiers_and_comments() {
        let sql = "SELECT `a;b` FROM [x;y]; -- note; here\nSELECT 1 /* a; b */; SELECT ']]'";
        let parts = split_statements(sql);
        assert_eq!(
            parts,
            vec![
                "SELECT `a;b` FROM [x;y]",
                "-- note; here\nSELECT 1 /* a; b */",
                "SELECT ']]'",
            ]
        );
    }

    #[test]
    fn test_split_statements_transaction_begin_is_not_a_block() {
        let parts = split_statements("BEGIN; INSERT INTO t VALUES (1); COMMIT; BEGIN TRANSACTION; SELECT 1; END;");
        assert_eq!(
            parts,
            vec!["BEGIN", "INSERT INTO t VALUES (1)", "COMMIT", "BEGIN TRANSACTION", "SELECT 1", "END"]
        );
    }

    #[test]
    fn test_split_statements_end_if_stays_inside_block() {
        let sql = "CREATE PROCEDURE p AS BEGIN IF x THEN y := 1; END IF; \
                   z := CASE WHEN a THEN 1 ELSE 2 END; END p; SELECT begin_date FROM t";
        let parts = split_statements(sql);
        assert_eq!(parts.len(), 2);
        assert!(parts[0].ends_with("END p"));
        assert_eq!(parts[1], "SELECT begin_date FROM t");
    }

    #[test]
    fn test_split_unit_sql_without_markers() {
        let text = "CREATE TABLE t (id int);\n-- seed\nINSERT INTO t VALUES (1);\n";
        let parts = split_unit_sql(text).unwrap();
        assert_eq!(
            parts,
            vec![
                Statement::raw("CREATE TABLE t (id int)"),
                Statement::raw("-- seed\nINSERT INTO t VALUES (1)"),
            ]
        );
    }

    #[test]
    fn test_unit_sql_join_and_split() {
        let text = join_unit_sql(&[
            Statement::raw("CREATE TABLE t (id int)"),
            Statement::raw(";"),
            Statement::raw("CREATE INDEX i ON t (id)"),
        ]);
        assert_eq!(text.matches(STATEMENT_SEPARATOR).count(), 2);
        let parts = split_unit_sql(&text).unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[1].sql(), "CREATE INDEX i ON t (id)");
    }

    #[test]
    fn test_split_unit_sql_tolerates_separator_variants() {
        let parts = split_unit_sql("/*xc*/ DROP TABLE a;\n/*   xc  note */\nDROP TABLE b;\n;").unwrap();
        assert_eq!(parts, vec![Statement::raw("DROP TABLE a"), Statement::raw("DROP TABLE b")]);
    }
}
