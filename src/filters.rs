// ABOUTME: Table include/exclude filtering for a migration run
// ABOUTME: Narrows the enumerated source tables before migration starts

use crate::migration::schema::TableDescriptor;
use anyhow::{bail, Result};

/// Table selection rules
#[derive(Debug, Clone, Default)]
pub struct TableFilter {
    include_tables: Option<Vec<String>>,
    exclude_tables: Option<Vec<String>>,
}

impl TableFilter {
    /// Creates a filter from CLI arguments
    pub fn new(
        include_tables: Option<Vec<String>>,
        exclude_tables: Option<Vec<String>>,
    ) -> Result<Self> {
        if include_tables.is_some() && exclude_tables.is_some() {
            bail!("Cannot use both --include-tables and --exclude-tables");
        }

        for table in include_tables
            .iter()
            .chain(exclude_tables.iter())
            .flatten()
        {
            if table.trim().is_empty() {
                bail!("Table names in filters cannot be empty");
            }
        }

        Ok(Self {
            include_tables,
            exclude_tables,
        })
    }

    /// Migrate everything
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.include_tables.is_none() && self.exclude_tables.is_none()
    }

    /// Determines if a table should be migrated
    pub fn should_migrate(&self, table_name: &str) -> bool {
        if let Some(ref include) = self.include_tables {
            if !include.iter().any(|t| t == table_name) {
                return false;
            }
        }

        if let Some(ref exclude) = self.exclude_tables {
            if exclude.iter().any(|t| t == table_name) {
                return false;
            }
        }

        true
    }

    /// Keep the tables this filter selects, preserving enumeration order
    pub fn apply(&self, tables: Vec<TableDescriptor>) -> Vec<TableDescriptor> {
        tables
            .into_iter()
            .filter(|table| self.should_migrate(&table.name))
            .collect()
    }
}
