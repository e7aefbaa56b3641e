//! DDL for the counter table.

/// One column of the counter table.
pub struct Column {
    pub name: &'static str,
    pub definition: &'static str,
    pub primary_key: bool,
}

/// Expected shape of the counter table, in table order.
pub const COUNTER_COLUMNS: &[Column] = &[
    Column { name: "id", definition: "INTEGER NOT NULL AUTO_INCREMENT", primary_key: true },
    Column { name: "count", definition: "INTEGER NOT NULL DEFAULT 1", primary_key: false },
    Column { name: "createdAt", definition: "DATETIME NOT NULL", primary_key: false },
    Column { name: "updatedAt", definition: "DATETIME NOT NULL", primary_key: false },
];

pub fn create_table_sql(table: &str) -> String {
    let mut defs: Vec<String> = COUNTER_COLUMNS
        .iter()
        .map(|c| format!("`{}` {}", c.name, c.definition))
        .collect();
    let keys: Vec<String> = COUNTER_COLUMNS
        .iter()
        .filter(|c| c.primary_key)
        .map(|c| format!("`{}`", c.name))
        .collect();
    if !keys.is_empty() {
        defs.push(format!("PRIMARY KEY ({})", keys.join(", ")));
    }
    format!("CREATE TABLE IF NOT EXISTS `{table}` ({}) ENGINE=InnoDB", defs.join(", "))
}

pub fn add_column_sql(table: &str, column: &Column) -> String {
    let key = if column.primary_key { " PRIMARY KEY" } else { "" };
    format!("ALTER TABLE `{table}` ADD COLUMN `{}` {}{key}", column.name, column.definition)
}

pub fn modify_column_sql(table: &str, column: &Column) -> String {
    format!("ALTER TABLE `{table}` MODIFY COLUMN `{}` {}", column.name, column.definition)
}

/// Columns of `COUNTER_COLUMNS` absent from `existing`. MySQL column names
/// compare case-insensitively.
pub fn missing_columns(existing: &[String]) -> Vec<&'static Column> {
    COUNTER_COLUMNS
        .iter()
        .filter(|c| !existing.iter().any(|e| e.eq_ignore_ascii_case(c.name)))
        .collect()
}
