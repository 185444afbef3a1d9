//! Canonical schema model.
//!
//! Every driver normalizes its native catalog rows into these types, so callers
//! can compare and diff schemas without knowing which engine they came from.
//! The types are plain values: they hold no reference to a connection.
//!
//! Field aliases accept the short-hand keys used by schema-editing front-ends
//! (`cn`, `dt`, `rqd`, ...), so a change request can be deserialized directly.

use crate::error::{MigrateError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Dialect-neutral classification of a native data type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TypeClass {
    String,
    Integer,
    Float,
    Date,
    Boolean,
    Enum,
    Year,
    Bit,
    Text,
    Blob,
    Geometry,
    Json,
    #[default]
    Other,
}

impl TypeClass {
    /// Classify a native type name such as `varchar(255)` or `NUMBER`.
    pub fn from_native(data_type: &str) -> Self {
        let lower = data_type.trim().to_lowercase();
        let base = lower
            .split('(')
            .next()
            .unwrap_or_default()
            .trim()
            .trim_end_matches(" unsigned");

        match base {
            "geometry" | "geography" | "point" | "linestring" | "polygon" | "multipoint"
            | "multilinestring" | "multipolygon" | "geometrycollection" => TypeClass::Geometry,
            "bool" | "boolean" => TypeClass::Boolean,
            "bit" => TypeClass::Bit,
            "year" => TypeClass::Year,
            "enum" | "set" => TypeClass::Enum,
            "json" | "jsonb" | "variant" | "object" | "array" => TypeClass::Json,
            "text" | "tinytext" | "mediumtext" | "longtext" | "ntext" | "clob" | "nclob"
            | "long" => TypeClass::Text,
            "blob" | "tinyblob" | "mediumblob" | "longblob" | "binary" | "varbinary" | "bytea"
            | "image" | "raw" | "long raw" | "bfile" => TypeClass::Blob,
            "float" | "double" | "double precision" | "real" | "decimal" | "numeric" | "number"
            | "money" | "smallmoney" | "binary_float" | "binary_double" | "float4" | "float8" => {
                TypeClass::Float
            }
            "int" | "integer" | "tinyint" | "smallint" | "mediumint" | "bigint" | "serial"
            | "bigserial" | "int2" | "int4" | "int8" | "byteint" => TypeClass::Integer,
            "date" | "datetime" | "datetime2" | "smalldatetime" | "datetimeoffset" | "time"
            | "timestamp" | "timestamp_ltz" | "timestamp_ntz" | "timestamp_tz"
            | "timestamp with time zone" | "timestamp without time zone"
            | "timestamp with local time zone" => TypeClass::Date,
            "char" | "varchar" | "nchar" | "nvarchar" | "varchar2" | "nvarchar2" | "character"
            | "character varying" | "string" | "uniqueidentifier" | "uuid" | "sysname" => {
                TypeClass::String
            }
            other if other.starts_with("timestamp") || other.starts_with("interval") => {
                TypeClass::Date
            }
            _ => TypeClass::Other,
        }
    }
}

/// Column metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Column {
    /// Owning table name.
    #[serde(alias = "tn")]
    pub table_name: String,

    /// Column name.
    #[serde(alias = "cn")]
    pub name: String,

    /// Name before a pending rename; used to pair columns during a diff.
    #[serde(alias = "cno")]
    pub original_name: Option<String>,

    /// Native data type without precision, e.g. `varchar`.
    #[serde(alias = "dt")]
    pub data_type: String,

    /// Canonical classification of `data_type`.
    pub type_class: TypeClass,

    /// Precision or character length; for enum/set the quoted member list.
    #[serde(alias = "dtxp")]
    pub precision: Option<String>,

    /// Numeric scale.
    #[serde(alias = "dtxs")]
    pub scale: Option<String>,

    /// Character length as reported by the catalog.
    #[serde(alias = "clen")]
    pub char_length: Option<i64>,

    /// 1-based ordinal position.
    #[serde(alias = "cop")]
    pub ordinal: i64,

    /// NOT NULL.
    #[serde(alias = "rqd")]
    pub required: bool,

    #[serde(alias = "pk")]
    pub primary_key: bool,

    #[serde(alias = "ai")]
    pub auto_increment: bool,

    pub unique: bool,

    #[serde(alias = "un")]
    pub unsigned: bool,

    /// Raw default text as the dialect reports it.
    #[serde(alias = "cdf")]
    pub default: Option<String>,

    #[serde(alias = "cc")]
    pub comment: Option<String>,

    #[serde(alias = "csn")]
    pub collation: Option<String>,

    /// Set to the current timestamp on every row update.
    #[serde(alias = "au")]
    pub auto_update: bool,

    /// Name of the default constraint (SQL Server).
    pub default_constraint: Option<String>,
}

impl Column {
    /// Create a nullable column of the given type.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        let data_type = data_type.into();
        Self {
            name: name.into(),
            type_class: TypeClass::from_native(&data_type),
            data_type,
            ..Default::default()
        }
    }

    pub fn with_precision(mut self, precision: impl Into<String>) -> Self {
        self.precision = Some(precision.into());
        self
    }

    pub fn with_scale(mut self, scale: impl Into<String>) -> Self {
        self.scale = Some(scale.into());
        self
    }

    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.required = true;
        self
    }

    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    pub fn auto_update(mut self) -> Self {
        self.auto_update = true;
        self
    }

    /// Rename while remembering the previous name.
    pub fn renamed(mut self, new_name: impl Into<String>) -> Self {
        if self.original_name.is_none() {
            self.original_name = Some(self.name.clone());
        }
        self.name = new_name.into();
        self
    }

    /// Name this column had before the pending change.
    pub fn identity(&self) -> &str {
        self.original_name.as_deref().unwrap_or(&self.name)
    }

    /// True when the column is structurally identical to `other`, ignoring
    /// bookkeeping fields (ordinal, original name, table name, constraint name).
    pub fn same_definition(&self, other: &Column) -> bool {
        self.name == other.name
            && self.data_type.eq_ignore_ascii_case(&other.data_type)
            && norm(&self.precision) == norm(&other.precision)
            && norm(&self.scale) == norm(&other.scale)
            && self.required == other.required
            && self.primary_key == other.primary_key
            && self.auto_increment == other.auto_increment
            && self.unique == other.unique
            && self.unsigned == other.unsigned
            && norm(&self.default) == norm(&other.default)
            && self.auto_update == other.auto_update
    }
}

fn norm(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Table metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Table {
    /// Schema name (MSSQL, Snowflake, Oracle user); `None` for MySQL/SQLite.
    pub schema: Option<String>,

    /// Table name.
    pub name: String,

    /// Column definitions in ordinal order.
    pub columns: Vec<Column>,

    /// Primary key column names in key order.
    pub primary_key: Vec<String>,
}

impl Table {
    pub fn new(name: impl Into<String>, columns: Vec<Column>) -> Self {
        let name = name.into();
        let columns: Vec<Column> = columns
            .into_iter()
            .enumerate()
            .map(|(i, mut c)| {
                c.table_name = name.clone();
                if c.ordinal == 0 {
                    c.ordinal = i as i64 + 1;
                }
                c
            })
            .collect();
        let primary_key = columns
            .iter()
            .filter(|c| c.primary_key)
            .map(|c| c.name.clone())
            .collect();
        Self {
            schema: None,
            name,
            columns,
            primary_key,
        }
    }

    pub fn in_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// Get the display name, qualified when a schema is present.
    pub fn full_name(&self) -> String {
        match &self.schema {
            Some(schema) => format!("{}.{}", schema, self.name),
            None => self.name.clone(),
        }
    }

    pub fn has_pk(&self) -> bool {
        !self.primary_key.is_empty()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// The first primary key column, used by auto-update triggers.
    pub fn first_pk(&self) -> Option<&Column> {
        self.columns.iter().find(|c| c.primary_key)
    }
}

/// One column of an index with its position in the key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexColumn {
    pub name: String,
    pub seq: i64,
}

/// Index metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Index {
    /// Index name.
    #[serde(alias = "key_name")]
    pub name: String,

    /// Owning table.
    #[serde(alias = "tn")]
    pub table: String,

    /// Key columns ordered by `seq`.
    pub columns: Vec<IndexColumn>,

    /// Index allows duplicates.
    pub non_unique: bool,

    /// Uniqueness as introspected, kept when a diff flips `non_unique`.
    pub non_unique_original: bool,

    /// Index backs the primary key.
    pub primary: bool,
}

impl Index {
    pub fn new(name: impl Into<String>, table: impl Into<String>, columns: &[&str], unique: bool) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            columns: columns
                .iter()
                .enumerate()
                .map(|(i, c)| IndexColumn {
                    name: c.to_string(),
                    seq: i as i64 + 1,
                })
                .collect(),
            non_unique: !unique,
            non_unique_original: !unique,
            primary: false,
        }
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Fold flattened catalog rows (one per indexed column) into indexes.
    ///
    /// Rows are `(index name, table, column, seq, non_unique, primary)`; the
    /// output keeps first-seen index order and sorts columns by `seq`.
    pub fn group(rows: Vec<(String, String, String, i64, bool, bool)>) -> Vec<Index> {
        let mut out: Vec<Index> = Vec::new();
        for (name, table, column, seq, non_unique, primary) in rows {
            let found = out.iter().position(|i| i.name == name && i.table == table);
            let entry = match found {
                Some(pos) => &mut out[pos],
                None => {
                    out.push(Index {
                        name: name.clone(),
                        table: table.clone(),
                        columns: Vec::new(),
                        non_unique,
                        non_unique_original: non_unique,
                        primary,
                    });
                    let last = out.len() - 1;
                    &mut out[last]
                }
            };
            entry.columns.push(IndexColumn { name: column, seq });
        }
        for index in &mut out {
            index.columns.sort_by_key(|c| c.seq);
        }
        out
    }
}

/// Foreign key action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ReferentialAction {
    #[default]
    #[serde(rename = "NO ACTION", alias = "NO_ACTION")]
    NoAction,
    #[serde(rename = "CASCADE")]
    Cascade,
    #[serde(rename = "RESTRICT")]
    Restrict,
    #[serde(rename = "SET NULL", alias = "SET_NULL")]
    SetNull,
    #[serde(rename = "SET DEFAULT", alias = "SET_DEFAULT")]
    SetDefault,
}

impl ReferentialAction {
    /// Parse a catalog rule name; blank means NO ACTION.
    pub fn parse(rule: &str) -> Result<Self> {
        let normalized = rule.trim().to_uppercase().replace('_', " ");
        match normalized.as_str() {
            "" | "NO ACTION" => Ok(Self::NoAction),
            "CASCADE" => Ok(Self::Cascade),
            "RESTRICT" => Ok(Self::Restrict),
            "SET NULL" => Ok(Self::SetNull),
            "SET DEFAULT" => Ok(Self::SetDefault),
            _ => Err(MigrateError::Introspection(format!(
                "Unknown referential action: {}",
                rule
            ))),
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::NoAction => "NO ACTION",
            Self::Cascade => "CASCADE",
            Self::Restrict => "RESTRICT",
            Self::SetNull => "SET NULL",
            Self::SetDefault => "SET DEFAULT",
        }
    }
}

impl fmt::Display for ReferentialAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// Foreign key metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Relation {
    /// Constraint name.
    #[serde(alias = "cstn")]
    pub name: Option<String>,

    /// Child table.
    #[serde(alias = "tn")]
    pub table: String,

    /// Child column.
    #[serde(alias = "cn")]
    pub column: String,

    /// Referenced table.
    #[serde(alias = "rtn")]
    pub parent_table: String,

    /// Referenced column.
    #[serde(alias = "rcn")]
    pub parent_column: String,

    #[serde(alias = "ur")]
    pub on_update: ReferentialAction,

    #[serde(alias = "dr")]
    pub on_delete: ReferentialAction,
}

impl Relation {
    pub fn new(
        table: impl Into<String>,
        column: impl Into<String>,
        parent_table: impl Into<String>,
        parent_column: impl Into<String>,
    ) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
            parent_table: parent_table.into(),
            parent_column: parent_column.into(),
            ..Default::default()
        }
    }

    /// Constraint name, generated as `fk_<table>_<column>` when absent.
    pub fn constraint_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("fk_{}_{}", self.table, self.column))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Sequence {
    pub name: String,
    pub schema: Option<String>,
    pub start: Option<i64>,
    pub increment: Option<i64>,
}

impl Sequence {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum TriggerTiming {
    Before,
    #[default]
    After,
    #[serde(rename = "INSTEAD OF")]
    InsteadOf,
}

impl TriggerTiming {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Before => "BEFORE",
            Self::After => "AFTER",
            Self::InsteadOf => "INSTEAD OF",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum TriggerEvent {
    Insert,
    #[default]
    Update,
    Delete,
}

impl TriggerEvent {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        }
    }
}

/// Trigger metadata. `statement` is the body executed per row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Trigger {
    pub name: String,
    pub schema: Option<String>,
    #[serde(alias = "tn")]
    pub table: String,
    pub timing: TriggerTiming,
    pub event: TriggerEvent,
    pub statement: String,
}

/// View metadata. `definition` is the SELECT text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct View {
    pub name: String,
    pub schema: Option<String>,
    pub definition: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutineKind {
    Function,
    Procedure,
}

impl RoutineKind {
    pub fn keyword(&self) -> &'static str {
        match self {
            Self::Function => "FUNCTION",
            Self::Procedure => "PROCEDURE",
        }
    }
}

/// Function or procedure. `definition` is the complete CREATE statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Routine {
    pub name: String,
    pub schema: Option<String>,
    pub kind: RoutineKind,
    pub definition: String,
}

/// Server version, split the way callers gate dialect features on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct VersionInfo {
    /// Full version string as reported by the server.
    pub version: String,
    pub primary: u32,
    pub major: u32,
    pub minor: u32,
    /// `<primary><major>` shorthand, e.g. `80` for MySQL 8.0.
    pub key: String,
}

impl VersionInfo {
    /// Parse the leading `a.b.c` triple out of a version banner.
    pub fn parse(version: &str) -> Self {
        let numeric: String = version
            .chars()
            .skip_while(|c| !c.is_ascii_digit())
            .take_while(|c| c.is_ascii_digit() || *c == '.')
            .collect();
        let mut parts = numeric.split('.').map(|p| p.parse::<u32>().unwrap_or(0));
        let primary = parts.next().unwrap_or(0);
        let major = parts.next().unwrap_or(0);
        let minor = parts.next().unwrap_or(0);
        Self {
            version: version.to_string(),
            primary,
            major,
            minor,
            key: format!("{}{}", primary, major),
        }
    }
}

/// Everything `introspect` returns for a single table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TableSchema {
    pub table: String,
    pub columns: Vec<Column>,
    pub indexes: Vec<Index>,
    pub relations: Vec<Relation>,
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // TypeClass tests
    // =========================================================================

    #[test]
    fn test_type_class_common_types() {
        assert_eq!(TypeClass::from_native("varchar(255)"), TypeClass::String);
        assert_eq!(TypeClass::from_native("NVARCHAR2"), TypeClass::String);
        assert_eq!(TypeClass::from_native("int unsigned"), TypeClass::Integer);
        assert_eq!(TypeClass::from_native("BIGINT"), TypeClass::Integer);
        assert_eq!(TypeClass::from_native("decimal(10,2)"), TypeClass::Float);
        assert_eq!(TypeClass::from_native("NUMBER"), TypeClass::Float);
        assert_eq!(TypeClass::from_native("datetime2"), TypeClass::Date);
        assert_eq!(TypeClass::from_native("TIMESTAMP(6) WITH TIME ZONE"), TypeClass::Date);
        assert_eq!(TypeClass::from_native("longtext"), TypeClass::Text);
        assert_eq!(TypeClass::from_native("varbinary"), TypeClass::Blob);
        assert_eq!(TypeClass::from_native("enum"), TypeClass::Enum);
        assert_eq!(TypeClass::from_native("year"), TypeClass::Year);
        assert_eq!(TypeClass::from_native("bit"), TypeClass::Bit);
        assert_eq!(TypeClass::from_native("boolean"), TypeClass::Boolean);
        assert_eq!(TypeClass::from_native("jsonb"), TypeClass::Json);
        assert_eq!(TypeClass::from_native("VARIANT"), TypeClass::Json);
        assert_eq!(TypeClass::from_native("point"), TypeClass::Geometry);
        assert_eq!(TypeClass::from_native("hierarchyid"), TypeClass::Other);
    }

    // =========================================================================
    // Column tests
    // =========================================================================

    #[test]
    fn test_column_deserializes_shorthand_keys() {
        let json = r#"{"cn":"name","dt":"varchar","dtxp":"50","rqd":true,"pk":false,"cdf":"x"}"#;
        let col: Column = serde_json::from_str(json).unwrap();
        assert_eq!(col.name, "name");
        assert_eq!(col.data_type, "varchar");
        assert_eq!(col.precision.as_deref(), Some("50"));
        assert!(col.required);
        assert_eq!(col.default.as_deref(), Some("x"));
    }

    #[test]
    fn test_column_rename_keeps_identity() {
        let col = Column::new("old", "int").renamed("new").renamed("newer");
        assert_eq!(col.name, "newer");
        assert_eq!(col.identity(), "old");
    }

    #[test]
    fn test_same_definition_ignores_bookkeeping() {
        let mut a = Column::new("id", "INT").primary_key();
        let mut b = Column::new("id", "int").primary_key();
        a.ordinal = 1;
        b.ordinal = 3;
        b.default = Some("  ".into());
        assert!(a.same_definition(&b));
        b.required = false;
        assert!(!a.same_definition(&b));
    }

    // =========================================================================
    // Table / Index / Relation tests
    // =========================================================================

    #[test]
    fn test_table_new_sets_pk_and_ordinals() {
        let table = Table::new(
            "t",
            vec![
                Column::new("a", "int").primary_key(),
                Column::new("b", "int"),
                Column::new("c", "int").primary_key(),
            ],
        );
        assert_eq!(table.primary_key, vec!["a", "c"]);
        assert_eq!(table.columns[2].ordinal, 3);
        assert_eq!(table.columns[1].table_name, "t");
        assert_eq!(table.full_name(), "t");
        assert_eq!(table.in_schema("dbo").full_name(), "dbo.t");
    }

    #[test]
    fn test_index_group_orders_columns() {
        let rows = vec![
            ("ix_ab".to_string(), "t".to_string(), "b".to_string(), 2, true, false),
            ("ux_c".to_string(), "t".to_string(), "c".to_string(), 1, false, false),
            ("ix_ab".to_string(), "t".to_string(), "a".to_string(), 1, true, false),
        ];
        let indexes = Index::group(rows);
        assert_eq!(indexes.len(), 2);
        assert_eq!(indexes[0].column_names(), vec!["a", "b"]);
        assert!(indexes[0].non_unique);
        assert!(!indexes[1].non_unique);
        assert_eq!(indexes[1].non_unique_original, indexes[1].non_unique);
    }

    #[test]
    fn test_referential_action_parse() {
        assert_eq!(ReferentialAction::parse("cascade").unwrap(), ReferentialAction::Cascade);
        assert_eq!(ReferentialAction::parse("SET_NULL").unwrap(), ReferentialAction::SetNull);
        assert_eq!(ReferentialAction::parse("").unwrap(), ReferentialAction::NoAction);
        assert!(ReferentialAction::parse("EXPLODE").is_err());
    }

    #[test]
    fn test_relation_constraint_name_default() {
        let rel = Relation::new("orders", "user_id", "users", "id");
        assert_eq!(rel.constraint_name(), "fk_orders_user_id");
    }

    #[test]
    fn test_version_parse() {
        let v = VersionInfo::parse("8.0.34-log");
        assert_eq!((v.primary, v.major, v.minor), (8, 0, 34));
        assert_eq!(v.key, "80");
        let v = VersionInfo::parse("Oracle Database 19.3.0.0.0");
        assert_eq!(v.primary, 19);
        let v = VersionInfo::parse("unknown");
        assert_eq!(v.key, "00");
    }
}
