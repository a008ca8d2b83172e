//! Statement templates. Placeholders are positional `?`.

pub(crate) fn select_by(table: &str, column: &str) -> String {
    format!("SELECT * FROM {table} WHERE {column} = ?")
}

pub(crate) fn select_all(table: &str) -> String {
    format!("SELECT * FROM {table}")
}

pub(crate) fn insert(table: &str, columns: &[&str]) -> String {
    if columns.is_empty() {
        return format!("INSERT INTO {table} DEFAULT VALUES");
    }
    format!(
        "INSERT INTO {table}({}) VALUES ({})",
        columns.join(", "),
        vec!["?"; columns.len()].join(",")
    )
}

pub(crate) fn update_by_id(table: &str, columns: &[&str], id_column: &str) -> String {
    let assignments: Vec<String> = columns.iter().map(|c| format!("{c} = ?")).collect();
    format!(
        "UPDATE {table} SET {} WHERE {id_column} = ?",
        assignments.join(", ")
    )
}

pub(crate) fn delete_by_id(table: &str, id_column: &str) -> String {
    format!("DELETE FROM {table} WHERE {id_column} = ?")
}
