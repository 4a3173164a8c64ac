//! The extract-generation collaborator and the table definition handed to it.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::model::{FilterDescriptor, FilterKind, FilterValue, unbracketed};

/// Field name used when no extract filter names a field.
pub const GENERIC_FIELD: &str = "Generic Field";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractFieldType {
    String,
    Integer,
    Double,
    Boolean,
    DateTime,
}

/// Column name to column type for the generated extract table.
pub type FieldTypeMap = BTreeMap<String, ExtractFieldType>;

/// Writes a physical extract file.
///
/// Called synchronously while rendering a document that carries an extract
/// reference; an error aborts the render.
pub trait ExtractGenerator {
    fn generate(&mut self, path: &Path, fields: &FieldTypeMap) -> std::io::Result<()>;
}

impl<F> ExtractGenerator for F
where
    F: FnMut(&Path, &FieldTypeMap) -> std::io::Result<()>,
{
    fn generate(&mut self, path: &Path, fields: &FieldTypeMap) -> std::io::Result<()> {
        self(path, fields)
    }
}

/// Generator for documents that never reference an extract. Fails if called.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoExtractGenerator;

impl ExtractGenerator for NoExtractGenerator {
    fn generate(&mut self, path: &Path, _fields: &FieldTypeMap) -> std::io::Result<()> {
        Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            format!("no extract generator configured for {}", path.display()),
        ))
    }
}

/// Infers the extract table definition from the extract-scoped filters.
pub fn infer_field_types(filters: &[FilterDescriptor]) -> FieldTypeMap {
    let mut fields = FieldTypeMap::new();
    for filter in filters {
        let field_type = match &filter.kind {
            FilterKind::Categorical { values, .. } => values
                .first()
                .map(value_type)
                .unwrap_or(ExtractFieldType::String),
            FilterKind::Quantitative { is_date: true, .. } | FilterKind::RelativeDate { .. } => {
                ExtractFieldType::DateTime
            }
            FilterKind::Quantitative { min, max, .. } => min
                .as_ref()
                .or(max.as_ref())
                .map(value_type)
                .unwrap_or(ExtractFieldType::Double),
        };
        fields
            .entry(unbracketed(&filter.field).to_string())
            .or_insert(field_type);
    }

    if fields.is_empty() {
        fields.insert(GENERIC_FIELD.to_string(), ExtractFieldType::String);
    }
    fields
}

fn value_type(value: &FilterValue) -> ExtractFieldType {
    match value {
        FilterValue::Text(_) => ExtractFieldType::String,
        FilterValue::Integer(_) => ExtractFieldType::Integer,
        FilterValue::Real(_) => ExtractFieldType::Double,
        FilterValue::Boolean(_) => ExtractFieldType::Boolean,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{IncludeMode, PeriodType, RelativeAnchor};

    #[test]
    fn falls_back_to_one_generic_string_field() {
        let fields = infer_field_types(&[]);
        assert_eq!(fields.len(), 1);
        assert_eq!(fields.get(GENERIC_FIELD), Some(&ExtractFieldType::String));
    }

    #[test]
    fn infers_types_from_filter_shapes() {
        let filters = vec![
            FilterDescriptor {
                field: "[Quantity]".into(),
                kind: FilterKind::Categorical {
                    values: vec![FilterValue::Integer(1)],
                    mode: IncludeMode::Include,
                    manual_selection: false,
                },
            },
            FilterDescriptor {
                field: "Order Date".into(),
                kind: FilterKind::RelativeDate {
                    period: PeriodType::Year,
                    anchor: RelativeAnchor::Current,
                    count: 1,
                    to_date: false,
                },
            },
            FilterDescriptor {
                field: "Sales".into(),
                kind: FilterKind::Quantitative {
                    min: None,
                    max: Some(FilterValue::Real(10.0)),
                    is_date: false,
                },
            },
        ];
        let fields = infer_field_types(&filters);
        assert_eq!(fields.get("Quantity"), Some(&ExtractFieldType::Integer));
        assert_eq!(fields.get("Order Date"), Some(&ExtractFieldType::DateTime));
        assert_eq!(fields.get("Sales"), Some(&ExtractFieldType::Double));
        assert!(!fields.contains_key(GENERIC_FIELD));
    }

    #[test]
    fn closures_are_generators() {
        let mut calls = Vec::new();
        let mut generator = |path: &Path, fields: &FieldTypeMap| {
            calls.push((path.to_path_buf(), fields.len()));
            Ok::<(), std::io::Error>(())
        };
        generator
            .generate(Path::new("x.hyper"), &infer_field_types(&[]))
            .expect("generate");
        assert_eq!(calls.len(), 1);
    }
}
