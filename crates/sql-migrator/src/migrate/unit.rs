//! Migration units: one forward/reverse SQL pair per structural change.

use serde::{Deserialize, Serialize};

use crate::config::sha256_hex;
use crate::core::statement::{join_unit_sql, split_unit_sql, Statement};
use crate::error::{MigrateError, Result};

use super::title;

/// Lifecycle of a unit: `created -> written -> applied <-> reverted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitState {
    Created,
    Written,
    Applied,
    Reverted,
}

impl UnitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitState::Created => "created",
            UnitState::Written => "written",
            UnitState::Applied => "applied",
            UnitState::Reverted => "reverted",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "created" => Ok(UnitState::Created),
            "written" => Ok(UnitState::Written),
            "applied" => Ok(UnitState::Applied),
            "reverted" => Ok(UnitState::Reverted),
            other => Err(MigrateError::Config(format!("Invalid unit status: {}", other))),
        }
    }
}

impl std::fmt::Display for UnitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One migration unit of an alias.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationUnit {
    pub alias: String,
    /// `<stem>.up.sql`
    pub title: String,
    /// `<stem>.down.sql`
    pub title_down: String,
    /// Forward text in unit format.
    pub up: String,
    /// Reverse text in unit format.
    pub down: String,
    pub state: UnitState,
    pub batch: Option<i64>,
    pub checksum: Option<String>,
}

impl MigrationUnit {
    /// Empty unit for a freshly generated title stem.
    pub fn new(alias: impl Into<String>, stem: &str) -> Self {
        Self {
            alias: alias.into(),
            title: title::up_title(stem),
            title_down: title::down_title(stem),
            up: String::new(),
            down: String::new(),
            state: UnitState::Created,
            batch: None,
            checksum: None,
        }
    }

    pub fn stem(&self) -> &str {
        title::stem_of(&self.title)
    }

    /// Replace both texts from statement lists and mark the unit written.
    pub fn write(&mut self, up: &[Statement], down: &[Statement]) {
        self.set_text(join_unit_sql(up), join_unit_sql(down));
        self.state = UnitState::Written;
    }

    /// Replace both texts verbatim and refresh the checksum.
    pub fn set_text(&mut self, up: String, down: String) {
        self.checksum = Some(sha256_hex(format!("{}{}", up, down).as_bytes()));
        self.up = up;
        self.down = down;
    }

    pub fn up_statements(&self) -> Result<Vec<Statement>> {
        split_unit_sql(&self.up)
    }

    pub fn down_statements(&self) -> Result<Vec<Statement>> {
        split_unit_sql(&self.down)
    }

    pub fn is_empty(&self) -> bool {
        self.up.trim().is_empty() && self.down.trim().is_empty()
    }
}
