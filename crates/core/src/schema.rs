use std::fmt;

use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<String>,
}

/// Tables of the active database in catalog order, each with its columns in
/// declared ordinal order. Built fresh for every question.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SchemaDescription {
    pub tables: Vec<TableSchema>,
}

impl SchemaDescription {
    pub fn new(tables: Vec<TableSchema>) -> Self {
        Self { tables }
    }

    pub fn push(&mut self, name: impl Into<String>, columns: Vec<String>) {
        self.tables.push(TableSchema { name: name.into(), columns });
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables.iter().find(|table| table.name == name)
    }
}

impl fmt::Display for TableSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, self.columns.join(", "))
    }
}

impl fmt::Display for SchemaDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Tables:")?;
        for table in &self.tables {
            write!(f, "\n{table}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::SchemaDescription;

    #[test]
    fn renders_one_line_per_table_in_order() {
        let mut schema = SchemaDescription::default();
        schema.push(
            "customers",
            vec!["id".into(), "name".into(), "city".into(), "join_date".into()],
        );
        schema.push("orders", vec!["id".into(), "customer_id".into(), "total".into()]);

        assert_eq!(
            schema.to_string(),
            "Tables:\ncustomers(id, name, city, join_date)\norders(id, customer_id, total)"
        );
    }

    #[test]
    fn empty_catalog_renders_header_only() {
        assert_eq!(SchemaDescription::default().to_string(), "Tables:");
    }

    #[test]
    fn table_lookup_by_name() {
        let mut schema = SchemaDescription::default();
        schema.push("orders", vec!["id".into()]);

        assert!(schema.table("orders").is_some());
        assert!(schema.table("customers").is_none());
    }
}
