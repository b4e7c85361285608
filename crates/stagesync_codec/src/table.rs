//! Named tables of rows: the change-set document.

use crate::cbor;
use crate::error::{CodecError, CodecResult};
use crate::value::Value;
use ciborium::value::Value as Cbor;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Name of the task-parameters table carried by document tasks.
pub const PARAMETERS_TABLE: &str = "parameters";

static NULL: Value = Value::Null;

/// One row: column name to value.
///
/// Missing columns read as [`Value::Null`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Row(BTreeMap<String, Value>);

impl Row {
    /// Creates an empty row.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style column setter.
    #[must_use]
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(column, value);
        self
    }

    /// Returns the value of `column`, or `Null` if absent.
    pub fn get(&self, column: &str) -> &Value {
        self.0.get(column).unwrap_or(&NULL)
    }

    /// Sets `column` to `value`.
    pub fn set(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(column.into(), value.into());
    }

    /// Removes `column`, returning its previous value.
    pub fn remove(&mut self, column: &str) -> Option<Value> {
        self.0.remove(column)
    }

    /// Returns true if `column` is present (even when `Null`).
    pub fn contains(&self, column: &str) -> bool {
        self.0.contains_key(column)
    }

    /// Identifier stored in `column` (positive integers only).
    pub fn id(&self, column: &str) -> Option<i64> {
        self.get(column).as_id()
    }

    /// Text stored in `column`.
    pub fn text(&self, column: &str) -> Option<&str> {
        self.get(column).as_text()
    }

    /// GUID stored in `column`.
    pub fn guid(&self, column: &str) -> Option<Uuid> {
        self.get(column).as_guid()
    }

    /// Boolean stored in `column`; absent reads as `false`.
    pub fn flag(&self, column: &str) -> bool {
        self.get(column).as_bool().unwrap_or(false)
    }

    /// Integer stored in `column`.
    pub fn integer(&self, column: &str) -> Option<i64> {
        self.get(column).as_integer()
    }

    /// Iterates over columns in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the row has no columns.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn to_cbor(&self) -> Cbor {
        Cbor::Map(
            self.0
                .iter()
                .map(|(k, v)| (Cbor::Text(k.clone()), v.to_cbor()))
                .collect(),
        )
    }

    fn from_cbor(value: &Cbor) -> CodecResult<Self> {
        let mut row = Row::new();
        for (k, v) in cbor::as_map(value, "row")? {
            let column = k
                .as_text()
                .ok_or_else(|| CodecError::invalid_structure("column names must be text"))?;
            row.set(column, Value::from_cbor(v)?);
        }
        Ok(row)
    }
}

impl FromIterator<(String, Value)> for Row {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// A named table of rows, one per object type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataTable {
    /// Table name (the object type name).
    pub name: String,
    /// Rows in payload order.
    #[serde(default)]
    pub rows: Vec<Row>,
}

impl DataTable {
    /// Creates an empty table.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rows: Vec::new(),
        }
    }

    /// Appends a row.
    pub fn push(&mut self, row: Row) {
        self.rows.push(row);
    }

    /// Rows whose `column` equals `value`.
    pub fn rows_where<'a>(
        &'a self,
        column: &'a str,
        value: &'a Value,
    ) -> impl Iterator<Item = &'a Row> + 'a {
        self.rows.iter().filter(move |r| r.get(column) == value)
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// One entry of the identifier-translation seed table.
///
/// Describes how a source identifier can be found on the target: by code
/// name within a site (and optionally a group), or by GUID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslationSeed {
    /// Object type of the referenced object.
    pub object_type: String,
    /// Identifier on the source system.
    pub source_id: i64,
    /// Code name of the referenced object.
    #[serde(default)]
    pub code_name: Option<String>,
    /// Code name of the site the object belongs to; `None` for global objects.
    #[serde(default)]
    pub site_name: Option<String>,
    /// Group identifier (already a source id of the group object).
    #[serde(default)]
    pub group_id: Option<i64>,
    /// GUID of the referenced object, when it has one.
    #[serde(default)]
    pub guid: Option<Uuid>,
}

impl TranslationSeed {
    /// Creates a seed resolvable by code name.
    pub fn by_code_name(
        object_type: impl Into<String>,
        source_id: i64,
        code_name: impl Into<String>,
    ) -> Self {
        Self {
            object_type: object_type.into(),
            source_id,
            code_name: Some(code_name.into()),
            site_name: None,
            group_id: None,
            guid: None,
        }
    }

    /// Creates a seed resolvable by GUID.
    pub fn by_guid(object_type: impl Into<String>, source_id: i64, guid: Uuid) -> Self {
        Self {
            object_type: object_type.into(),
            source_id,
            code_name: None,
            site_name: None,
            group_id: None,
            guid: Some(guid),
        }
    }

    /// Sets the site code name.
    #[must_use]
    pub fn in_site(mut self, site_name: impl Into<String>) -> Self {
        self.site_name = Some(site_name.into());
        self
    }

    /// Sets the group identifier.
    #[must_use]
    pub fn in_group(mut self, group_id: i64) -> Self {
        self.group_id = Some(group_id);
        self
    }

    fn to_cbor(&self) -> Cbor {
        let mut pairs = vec![
            ("object_type", Cbor::Text(self.object_type.clone())),
            ("source_id", cbor::integer(self.source_id)),
        ];
        if let Some(code_name) = &self.code_name {
            pairs.push(("code_name", Cbor::Text(code_name.clone())));
        }
        if let Some(site_name) = &self.site_name {
            pairs.push(("site_name", Cbor::Text(site_name.clone())));
        }
        if let Some(group_id) = self.group_id {
            pairs.push(("group_id", cbor::integer(group_id)));
        }
        if let Some(guid) = self.guid {
            pairs.push(("guid", Value::Guid(guid).to_cbor()));
        }
        cbor::map(pairs)
    }

    fn from_cbor(value: &Cbor) -> CodecResult<Self> {
        let map = cbor::as_map(value, "translation seed")?;
        let source_id = cbor::optional_integer(map, "source_id")?
            .ok_or_else(|| CodecError::invalid_structure("missing source_id"))?;
        let guid = match cbor::field(map, "guid") {
            None | Some(Cbor::Null) => None,
            Some(v) => Value::from_cbor(v)?.as_guid(),
        };

        Ok(Self {
            object_type: cbor::required_text(map, "object_type")?,
            source_id,
            code_name: cbor::optional_text(map, "code_name"),
            site_name: cbor::optional_text(map, "site_name"),
            group_id: cbor::optional_integer(map, "group_id")?,
            guid,
        })
    }
}

/// The decoded payload of a task: one table per object type plus the
/// translation seed table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet {
    /// Tables keyed by name.
    #[serde(default)]
    pub tables: BTreeMap<String, DataTable>,
    /// Identifier translation seeds.
    #[serde(default)]
    pub translations: Vec<TranslationSeed>,
}

impl ChangeSet {
    /// Creates an empty change-set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the table called `name`.
    pub fn table(&self, name: &str) -> Option<&DataTable> {
        self.tables.get(name)
    }

    /// Returns true if a table called `name` is present.
    pub fn has_table(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    /// Rows of table `name`; empty if the table is absent.
    pub fn rows(&self, name: &str) -> &[Row] {
        match self.tables.get(name) {
            Some(table) => &table.rows,
            None => &[],
        }
    }

    /// Adds an empty table called `name` unless it already exists.
    pub fn ensure_table(&mut self, name: &str) -> &mut DataTable {
        self.tables
            .entry(name.to_string())
            .or_insert_with(|| DataTable::new(name))
    }

    /// Appends `row` to table `name`, creating the table if needed.
    pub fn add_row(&mut self, name: &str, row: Row) {
        self.ensure_table(name).push(row);
    }

    /// Builder-style [`ChangeSet::add_row`].
    #[must_use]
    pub fn with_row(mut self, name: &str, row: Row) -> Self {
        self.add_row(name, row);
        self
    }

    /// Appends a translation seed.
    pub fn add_seed(&mut self, seed: TranslationSeed) {
        self.translations.push(seed);
    }

    /// Builder-style [`ChangeSet::add_seed`].
    #[must_use]
    pub fn with_seed(mut self, seed: TranslationSeed) -> Self {
        self.add_seed(seed);
        self
    }

    /// The first row of the parameters table, if present.
    pub fn parameters(&self) -> Option<&Row> {
        self.rows(PARAMETERS_TABLE).first()
    }

    /// A single task parameter; `Null` when absent.
    pub fn parameter(&self, name: &str) -> &Value {
        match self.parameters() {
            Some(row) => row.get(name),
            None => &NULL,
        }
    }

    /// Encodes to CBOR bytes.
    pub fn encode(&self) -> CodecResult<Vec<u8>> {
        let tables = self
            .tables
            .values()
            .map(|t| {
                cbor::map(vec![
                    ("name", Cbor::Text(t.name.clone())),
                    ("rows", Cbor::Array(t.rows.iter().map(Row::to_cbor).collect())),
                ])
            })
            .collect();
        let translations = self.translations.iter().map(TranslationSeed::to_cbor).collect();

        cbor::encode(&cbor::map(vec![
            ("tables", Cbor::Array(tables)),
            ("translations", Cbor::Array(translations)),
        ]))
    }

    /// Decodes from CBOR bytes.
    pub fn decode(bytes: &[u8]) -> CodecResult<Self> {
        let value = cbor::decode(bytes)?;
        let map = cbor::as_map(&value, "change-set")?;

        let mut change_set = ChangeSet::new();
        if let Some(tables) = cbor::field(map, "tables") {
            for table in cbor::as_array(tables, "tables")? {
                let table_map = cbor::as_map(table, "table")?;
                let name = cbor::required_text(table_map, "name")?;
                let mut decoded = DataTable::new(name.clone());
                if let Some(rows) = cbor::field(table_map, "rows") {
                    for row in cbor::as_array(rows, "rows")? {
                        decoded.push(Row::from_cbor(row)?);
                    }
                }
                if change_set.tables.insert(name.clone(), decoded).is_some() {
                    return Err(CodecError::invalid_structure(format!(
                        "duplicate table {name}"
                    )));
                }
            }
        }
        if let Some(seeds) = cbor::field(map, "translations") {
            for seed in cbor::as_array(seeds, "translations")? {
                change_set.add_seed(TranslationSeed::from_cbor(seed)?);
            }
        }

        Ok(change_set)
    }
}
