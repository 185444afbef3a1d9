//! Column definition rendering.

use crate::core::schema::{Column, TypeClass};
use crate::core::statement::{sanitize_data_type, sanitize_default_value};
use crate::core::traits::{AlterColumnStyle, AutoIncrementStyle, AutoUpdateStyle, Dialect};
use crate::error::{MigrateError, Result};

/// Name of the default constraint a generated column gets (SQL Server).
pub fn default_constraint_name(table: &str, column: &str) -> String {
    format!("DF_{}_{}", table, column)
}

/// Name of the trigger that maintains an auto-update column.
pub fn auto_update_trigger_name(table: &str, column: &str) -> String {
    format!("xc_trigger_{}_{}", table, column)
}

fn norm(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Key columns are always NOT NULL.
pub(crate) fn effective_required(col: &Column) -> bool {
    col.required || col.primary_key
}

/// Split an enum/set member list such as `'a','b,c'` into raw members.
pub(crate) fn enum_members(list: &str) -> Vec<String> {
    let mut members = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut chars = list.chars().peekable();

    while let Some(ch) = chars.next() {
        match quote {
            Some(q) if ch == q => {
                if chars.peek() == Some(&q) {
                    current.push(q);
                    chars.next();
                } else {
                    quote = None;
                }
            }
            Some(_) if ch == '\\' => {
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            Some(_) => current.push(ch),
            None if ch == '\'' || ch == '"' => quote = Some(ch),
            None if ch == ',' => {
                members.push(current.trim().to_string());
                current.clear();
            }
            None => current.push(ch),
        }
    }
    if !current.trim().is_empty() || !members.is_empty() {
        members.push(current.trim().to_string());
    }
    members
}

fn precision_clause(d: &dyn Dialect, col: &Column, data_type: &str) -> Result<Option<String>> {
    let Some(precision) = norm(&col.precision) else {
        return Ok(None);
    };
    let lower = data_type.to_ascii_lowercase();

    if col.type_class == TypeClass::Enum || lower == "enum" || lower == "set" {
        let quoting = d.quoting();
        let members: Vec<String> = enum_members(precision)
            .iter()
            .map(|m| quoting.value(m))
            .collect();
        return Ok(Some(format!("({})", members.join(","))));
    }

    if data_type.contains('(') || d.syntax().suppresses_length(data_type) {
        return Ok(None);
    }

    if precision.eq_ignore_ascii_case("max") || precision == "-1" {
        return Ok(Some("(max)".to_string()));
    }

    let digits = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit());
    if !digits(precision) {
        return Err(MigrateError::InvalidDataType(format!(
            "{}({})",
            data_type, precision
        )));
    }
    match norm(&col.scale) {
        Some(scale) if digits(scale) => Ok(Some(format!("({},{})", precision, scale))),
        Some(scale) => Err(MigrateError::InvalidDataType(format!(
            "{}({},{})",
            data_type, precision, scale
        ))),
        None => Ok(Some(format!("({})", precision))),
    }
}

/// Native type with precision, scale and signedness.
pub(crate) fn render_type(d: &dyn Dialect, col: &Column) -> Result<String> {
    let syntax = d.syntax();
    if col.auto_increment && syntax.auto_increment == AutoIncrementStyle::IntegerRowid {
        return Ok("integer".to_string());
    }

    let data_type = sanitize_data_type(&col.data_type)?;
    let mut out = data_type.to_string();
    if let Some(clause) = precision_clause(d, col, data_type)? {
        out.push_str(&clause);
    }
    if syntax.unsigned && col.unsigned && !data_type.to_ascii_lowercase().contains("unsigned") {
        out.push_str(" unsigned");
    }
    Ok(out)
}

/// Sanitized default expression, `None` for identity columns.
pub(crate) fn default_value(d: &dyn Dialect, col: &Column) -> Result<Option<String>> {
    if col.auto_increment {
        return Ok(None);
    }
    sanitize_default_value(norm(&col.default), d.quoting().literal)
}

/// Full column definition as used inside `CREATE TABLE` or `ADD`.
///
/// `adding` marks an `ADD COLUMN` on an existing table, where engines that
/// copy columns need a filler default for NOT NULL columns.
pub(crate) fn column_definition(
    d: &dyn Dialect,
    table: &str,
    col: &Column,
    adding: bool,
) -> Result<String> {
    let syntax = d.syntax();
    let quoting = d.quoting();
    let required = effective_required(col);

    let mut default = default_value(d, col)?;
    if default.is_none()
        && adding
        && required
        && !col.auto_increment
        && syntax.alter_column == AlterColumnStyle::Copy
    {
        default = Some("''".to_string());
    }

    let null = if required {
        Some("NOT NULL")
    } else if syntax.explicit_null {
        Some("NULL")
    } else {
        None
    };
    let identity = match (col.auto_increment, syntax.auto_increment) {
        (true, AutoIncrementStyle::Keyword(keyword)) => Some(keyword.to_string()),
        _ => None,
    };
    let default_sql = match default {
        Some(value) if syntax.default_constraints => Some(format!(
            "CONSTRAINT {} DEFAULT {}",
            quoting.ident(&default_constraint_name(table, &col.name))?,
            value
        )),
        Some(value) => Some(format!("DEFAULT {}", value)),
        None => None,
    };
    let on_update = (col.auto_update
        && syntax.auto_update == AutoUpdateStyle::OnUpdateClause
        && !default_sql
            .as_deref()
            .is_some_and(|d| d.to_ascii_lowercase().contains("on update")))
    .then(|| "ON UPDATE CURRENT_TIMESTAMP".to_string());
    let comment = match norm(&col.comment) {
        Some(comment) if syntax.inline_comments => Some(format!("COMMENT {}", quoting.value(comment))),
        _ => None,
    };

    let mut parts = vec![quoting.ident(&col.name)?, render_type(d, col)?];
    if syntax.null_after_default {
        parts.extend(identity);
        parts.extend(default_sql);
        parts.extend(null.map(str::to_string));
    } else {
        parts.extend(null.map(str::to_string));
        parts.extend(identity);
        parts.extend(default_sql);
    }
    parts.extend(on_update);
    parts.extend(comment);
    Ok(parts.join(" "))
}

/// Which aspects of a column differ between two versions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct ColumnDelta {
    pub renamed: bool,
    pub retyped: bool,
    pub nullability: bool,
    pub default: bool,
    pub auto_increment: bool,
    pub auto_update: bool,
    pub comment: bool,
}

impl ColumnDelta {
    pub fn between(old: &Column, new: &Column) -> Self {
        Self {
            renamed: old.name != new.name,
            retyped: !old.data_type.trim().eq_ignore_ascii_case(new.data_type.trim())
                || norm(&old.precision) != norm(&new.precision)
                || norm(&old.scale) != norm(&new.scale)
                || old.unsigned != new.unsigned,
            nullability: effective_required(old) != effective_required(new),
            default: norm(&old.default) != norm(&new.default),
            auto_increment: old.auto_increment != new.auto_increment,
            auto_update: old.auto_update != new.auto_update,
            comment: norm(&old.comment) != norm(&new.comment),
        }
    }

    /// Anything beyond the key flag changed.
    pub fn any(&self) -> bool {
        self.renamed
            || self.retyped
            || self.nullability
            || self.default
            || self.auto_increment
            || self.auto_update
            || self.comment
    }
}
