use anyhow::{ensure, Error};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A typed metadata column. Length always matches the owning table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Column {
    Float(Vec<f64>),
    Int(Vec<i64>),
    Bool(Vec<bool>),
    Str(Vec<String>),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Column::Float(v) => v.len(),
            Column::Int(v) => v.len(),
            Column::Bool(v) => v.len(),
            Column::Str(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_float(&self) -> Option<&[f64]> {
        match self {
            Column::Float(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<&[i64]> {
        match self {
            Column::Int(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<&[bool]> {
        match self {
            Column::Bool(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&[String]> {
        match self {
            Column::Str(v) => Some(v),
            _ => None,
        }
    }

    /// Render entry `i` as text, used for grouping keys and flat-file export.
    pub fn value_to_string(&self, i: usize) -> String {
        match self {
            Column::Float(v) => v[i].to_string(),
            Column::Int(v) => v[i].to_string(),
            Column::Bool(v) => v[i].to_string(),
            Column::Str(v) => v[i].clone(),
        }
    }

    fn subset(&self, keep: &[usize]) -> Column {
        match self {
            Column::Float(v) => Column::Float(keep.iter().map(|&i| v[i]).collect()),
            Column::Int(v) => Column::Int(keep.iter().map(|&i| v[i]).collect()),
            Column::Bool(v) => Column::Bool(keep.iter().map(|&i| v[i]).collect()),
            Column::Str(v) => Column::Str(keep.iter().map(|&i| v[i].clone()).collect()),
        }
    }
}

/// A metadata table: a list of identifiers plus named typed columns, all of
/// equal length. Used for both per-cell (obs) and per-gene (var) annotations.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MetaTable {
    ids: Vec<String>,
    columns: BTreeMap<String, Column>,
}

impl MetaTable {
    pub fn new(ids: Vec<String>) -> MetaTable {
        MetaTable {
            ids,
            columns: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    /// Insert or replace a column. The column length must match the table.
    pub fn insert(&mut self, name: &str, column: Column) -> Result<(), Error> {
        ensure!(
            column.len() == self.ids.len(),
            "column '{}' has {} entries but table has {} rows",
            name,
            column.len(),
            self.ids.len()
        );
        self.columns.insert(name.to_string(), column);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Column> {
        self.columns.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Column> {
        self.columns.remove(name)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    pub(crate) fn subset(&self, keep: &[usize]) -> MetaTable {
        MetaTable {
            ids: keep.iter().map(|&i| self.ids[i].clone()).collect(),
            columns: self
                .columns
                .iter()
                .map(|(name, col)| (name.clone(), col.subset(keep)))
                .collect(),
        }
    }
}
