//! SQL text for the destination tables. Every identifier is quoted and every
//! data column is TEXT.

pub const LOADS_TABLE: &str = "_loads";

/// Quote an SQL identifier
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Schema-qualified, quoted table name
pub fn qualified(schema: &str, table: &str) -> String {
    format!("{}.{}", quote_ident(schema), quote_ident(table))
}

/// Name of the table a dataset is loaded into before being swapped in
pub fn staging_name(table: &str) -> String {
    format!("_staging_{}", table)
}

pub fn generate_create_table(schema: &str, table: &str, columns: &[String]) -> String {
    let columns: Vec<String> = columns
        .iter()
        .map(|c| format!("    {} TEXT", quote_ident(c)))
        .collect();

    format!(
        "CREATE TABLE {} (\n{}\n)",
        qualified(schema, table),
        columns.join(",\n")
    )
}

pub fn generate_insert(schema: &str, table: &str, columns: &[String]) -> String {
    let names: Vec<String> = columns.iter().map(|c| quote_ident(c)).collect();
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{}", i)).collect();

    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        qualified(schema, table),
        names.join(", "),
        placeholders.join(", ")
    )
}

pub fn generate_loads_table(schema: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} (
    load_id TEXT NOT NULL,
    pipeline_name TEXT NOT NULL,
    table_name TEXT NOT NULL,
    source_file TEXT NOT NULL,
    row_count INTEGER NOT NULL,
    loaded_at TEXT NOT NULL
)",
        qualified(schema, LOADS_TABLE)
    )
}
