//! Descriptor types appended by the builder operations on a
//! [`Datasource`](crate::Datasource).
//!
//! Descriptors are plain data. Structural nodes are only produced from them at
//! render time.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{DocumentError, unknown_variant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Full,
}

impl JoinType {
    pub fn as_str(self) -> &'static str {
        match self {
            JoinType::Inner => "inner",
            JoinType::Left => "left",
            JoinType::Right => "right",
            JoinType::Full => "full",
        }
    }
}

impl FromStr for JoinType {
    type Err = DocumentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "inner" => Ok(JoinType::Inner),
            "left" => Ok(JoinType::Left),
            "right" => Ok(JoinType::Right),
            "full" => Ok(JoinType::Full),
            other => Err(unknown_variant(
                "join_type",
                other,
                &["inner", "left", "right", "full"],
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComparisonOp {
    Eq,
    NotEq,
    Lt,
    Gt,
    LtEq,
    GtEq,
}

impl ComparisonOp {
    pub fn as_str(self) -> &'static str {
        match self {
            ComparisonOp::Eq => "=",
            ComparisonOp::NotEq => "<>",
            ComparisonOp::Lt => "<",
            ComparisonOp::Gt => ">",
            ComparisonOp::LtEq => "<=",
            ComparisonOp::GtEq => ">=",
        }
    }
}

impl FromStr for ComparisonOp {
    type Err = DocumentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "=" => Ok(ComparisonOp::Eq),
            "<>" | "!=" => Ok(ComparisonOp::NotEq),
            "<" => Ok(ComparisonOp::Lt),
            ">" => Ok(ComparisonOp::Gt),
            "<=" => Ok(ComparisonOp::LtEq),
            ">=" => Ok(ComparisonOp::GtEq),
            other => Err(unknown_variant(
                "on_clause.operator",
                other,
                &["=", "<>", "<", ">", "<=", ">="],
            )),
        }
    }
}

/// One comparison inside a join's ON clause, e.g. `[Orders].[cust_id] = [Customers].[id]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnClause {
    pub left_table: String,
    pub left_field: String,
    pub operator: ComparisonOp,
    pub right_table: String,
    pub right_field: String,
}

impl OnClause {
    pub fn new(
        left_table: impl Into<String>,
        left_field: impl Into<String>,
        operator: ComparisonOp,
        right_table: impl Into<String>,
        right_field: impl Into<String>,
    ) -> Self {
        Self {
            left_table: left_table.into(),
            left_field: left_field.into(),
            operator,
            right_table: right_table.into(),
            right_field: right_field.into(),
        }
    }

    pub fn eq(
        left_table: impl Into<String>,
        left_field: impl Into<String>,
        right_table: impl Into<String>,
        right_field: impl Into<String>,
    ) -> Self {
        Self::new(left_table, left_field, ComparisonOp::Eq, right_table, right_field)
    }

    pub fn left_operand(&self) -> String {
        qualified_field(&self.left_table, &self.left_field)
    }

    pub fn right_operand(&self) -> String {
        qualified_field(&self.right_table, &self.right_field)
    }
}

/// What a join brings in on its right-hand side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinSource {
    Table(String),
    CustomSql(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinDescriptor {
    pub join_type: JoinType,
    pub source: JoinSource,
    pub alias: String,
    pub on_clauses: Vec<OnClause>,
}

/// The value of a categorical filter member or a quantitative bound.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Text(String),
    Integer(i64),
    Real(f64),
    Boolean(bool),
}

impl FilterValue {
    pub fn is_text(&self) -> bool {
        matches!(self, FilterValue::Text(_))
    }
}

impl fmt::Display for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterValue::Text(s) => f.write_str(s),
            FilterValue::Integer(i) => write!(f, "{i}"),
            FilterValue::Real(r) => write!(f, "{r}"),
            FilterValue::Boolean(b) => write!(f, "{b}"),
        }
    }
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        FilterValue::Text(value.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(value: String) -> Self {
        FilterValue::Text(value)
    }
}

impl From<i64> for FilterValue {
    fn from(value: i64) -> Self {
        FilterValue::Integer(value)
    }
}

impl From<f64> for FilterValue {
    fn from(value: f64) -> Self {
        FilterValue::Real(value)
    }
}

impl From<bool> for FilterValue {
    fn from(value: bool) -> Self {
        FilterValue::Boolean(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncludeMode {
    Include,
    Exclude,
}

impl FromStr for IncludeMode {
    type Err = DocumentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "include" => Ok(IncludeMode::Include),
            "exclude" => Ok(IncludeMode::Exclude),
            other => Err(unknown_variant(
                "include_or_exclude",
                other,
                &["include", "exclude"],
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodType {
    Quarter,
    Year,
    Month,
    Week,
    Day,
    Hour,
    Minute,
    Second,
}

impl PeriodType {
    pub fn as_str(self) -> &'static str {
        match self {
            PeriodType::Quarter => "quarter",
            PeriodType::Year => "year",
            PeriodType::Month => "month",
            PeriodType::Week => "week",
            PeriodType::Day => "day",
            PeriodType::Hour => "hour",
            PeriodType::Minute => "minute",
            PeriodType::Second => "second",
        }
    }
}

impl FromStr for PeriodType {
    type Err = DocumentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "quarter" => Ok(PeriodType::Quarter),
            "year" => Ok(PeriodType::Year),
            "month" => Ok(PeriodType::Month),
            "week" => Ok(PeriodType::Week),
            "day" => Ok(PeriodType::Day),
            "hour" => Ok(PeriodType::Hour),
            "minute" => Ok(PeriodType::Minute),
            "second" => Ok(PeriodType::Second),
            other => Err(unknown_variant(
                "period_type",
                other,
                &[
                    "quarter", "year", "month", "week", "day", "hour", "minute", "second",
                ],
            )),
        }
    }
}

/// Direction of a relative-date window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelativeAnchor {
    Previous,
    Next,
    Current,
}

impl RelativeAnchor {
    /// `(first-period, last-period)` for a window of `count` periods.
    pub fn period_bounds(self, count: u32) -> (i64, i64) {
        let n = i64::from(count);
        match self {
            RelativeAnchor::Previous => (-n, 0),
            RelativeAnchor::Next => (1, n),
            RelativeAnchor::Current => (0, 0),
        }
    }
}

impl FromStr for RelativeAnchor {
    type Err = DocumentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "previous" => Ok(RelativeAnchor::Previous),
            "next" => Ok(RelativeAnchor::Next),
            "current" => Ok(RelativeAnchor::Current),
            other => Err(unknown_variant(
                "previous_next_current",
                other,
                &["previous", "next", "current"],
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "class", rename_all = "kebab-case")]
pub enum FilterKind {
    Categorical {
        values: Vec<FilterValue>,
        mode: IncludeMode,
        manual_selection: bool,
    },
    Quantitative {
        min: Option<FilterValue>,
        max: Option<FilterValue>,
        is_date: bool,
    },
    RelativeDate {
        period: PeriodType,
        anchor: RelativeAnchor,
        count: u32,
        to_date: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterDescriptor {
    pub field: String,
    pub kind: FilterKind,
}

impl FilterDescriptor {
    /// Whether the filter targets the synthetic `none:<field>:qk` instance.
    pub fn uses_column_instance(&self) -> bool {
        matches!(
            self.kind,
            FilterKind::Quantitative { is_date: true, .. } | FilterKind::RelativeDate { .. }
        )
    }

    /// Column reference the rendered filter points at.
    pub fn column_ref(&self) -> String {
        if self.uses_column_instance() {
            bracketed(&ColumnInstance::derived_name(&self.field))
        } else {
            bracketed(&self.field)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Dimension,
    Measure,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Dimension => "dimension",
            Role::Measure => "measure",
        }
    }
}

impl FromStr for Role {
    type Err = DocumentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dimension" => Ok(Role::Dimension),
            "measure" => Ok(Role::Measure),
            other => Err(unknown_variant("role", other, &["dimension", "measure"])),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Continuity {
    Continuous,
    Discrete,
}

impl FromStr for Continuity {
    type Err = DocumentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "continuous" => Ok(Continuity::Continuous),
            "discrete" => Ok(Continuity::Discrete),
            other => Err(unknown_variant(
                "continuity",
                other,
                &["continuous", "discrete"],
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    String,
    Integer,
    Datetime,
    Date,
    Real,
    Boolean,
}

impl DataType {
    pub fn as_str(self) -> &'static str {
        match self {
            DataType::String => "string",
            DataType::Integer => "integer",
            DataType::Datetime => "datetime",
            DataType::Date => "date",
            DataType::Real => "real",
            DataType::Boolean => "boolean",
        }
    }
}

impl FromStr for DataType {
    type Err = DocumentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "string" => Ok(DataType::String),
            "integer" => Ok(DataType::Integer),
            "datetime" => Ok(DataType::Datetime),
            "date" => Ok(DataType::Date),
            "real" => Ok(DataType::Real),
            "boolean" => Ok(DataType::Boolean),
            other => Err(unknown_variant(
                "datatype",
                other,
                &["string", "integer", "datetime", "date", "real", "boolean"],
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayType {
    Nominal,
    Ordinal,
    Quantitative,
}

impl DisplayType {
    pub fn for_column(continuity: Continuity, datatype: DataType) -> DisplayType {
        match (continuity, datatype) {
            (Continuity::Continuous, _) => DisplayType::Quantitative,
            (Continuity::Discrete, DataType::String) => DisplayType::Nominal,
            (Continuity::Discrete, _) => DisplayType::Ordinal,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DisplayType::Nominal => "nominal",
            DisplayType::Ordinal => "ordinal",
            DisplayType::Quantitative => "quantitative",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnAlias {
    pub field: String,
    pub caption: String,
    pub role: Role,
    pub display_type: DisplayType,
    pub datatype: DataType,
    pub formula: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInstance {
    pub column: String,
    pub name: String,
}

impl ColumnInstance {
    pub fn derived(field: &str) -> Self {
        Self {
            column: field.to_string(),
            name: Self::derived_name(field),
        }
    }

    pub fn derived_name(field: &str) -> String {
        format!("none:{}:qk", unbracketed(field))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractReference {
    /// File name including the dialect's extension, e.g. `sales.hyper`.
    pub filename: String,
    pub incremental_key: Option<String>,
}

/// Wraps a field name in brackets unless it already carries them.
pub fn bracketed(name: &str) -> String {
    if name.starts_with('[') && name.ends_with(']') {
        name.to_string()
    } else {
        format!("[{name}]")
    }
}

pub fn unbracketed(name: &str) -> &str {
    name.strip_prefix('[')
        .and_then(|n| n.strip_suffix(']'))
        .unwrap_or(name)
}

/// `[Table].[field]`
pub fn qualified_field(table: &str, field: &str) -> String {
    format!("{}.{}", bracketed(table), bracketed(field))
}

/// Brackets each dotted part of a table name: `public.orders` → `[public].[orders]`.
pub fn bracketed_table(table: &str) -> String {
    if table.contains('[') {
        return table.to_string();
    }
    table
        .split('.')
        .map(bracketed)
        .collect::<Vec<_>>()
        .join(".")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_type_mapping() {
        assert_eq!(
            DisplayType::for_column(Continuity::Continuous, DataType::String),
            DisplayType::Quantitative
        );
        assert_eq!(
            DisplayType::for_column(Continuity::Discrete, DataType::String),
            DisplayType::Nominal
        );
        assert_eq!(
            DisplayType::for_column(Continuity::Discrete, DataType::Date),
            DisplayType::Ordinal
        );
    }

    #[test]
    fn relative_bounds() {
        assert_eq!(RelativeAnchor::Previous.period_bounds(3), (-3, 0));
        assert_eq!(RelativeAnchor::Next.period_bounds(3), (1, 3));
        assert_eq!(RelativeAnchor::Current.period_bounds(3), (0, 0));
    }

    #[test]
    fn enum_parsing_rejects_unknown_values_with_field_name() {
        let err = "outer".parse::<JoinType>().expect_err("unknown join type");
        assert!(matches!(err, DocumentError::Configuration { field: "join_type", .. }));
        let err = "attribute".parse::<Role>().expect_err("unknown role");
        assert!(matches!(err, DocumentError::Configuration { field: "role", .. }));
        let err = "fortnight".parse::<PeriodType>().expect_err("unknown period");
        assert!(matches!(err, DocumentError::Configuration { field: "period_type", .. }));
        assert_eq!("<>".parse::<ComparisonOp>().unwrap(), ComparisonOp::NotEq);
    }

    #[test]
    fn naming_helpers() {
        assert_eq!(bracketed("region"), "[region]");
        assert_eq!(bracketed("[region]"), "[region]");
        assert_eq!(bracketed_table("public.orders"), "[public].[orders]");
        assert_eq!(bracketed_table("[dbo].[t]"), "[dbo].[t]");
        assert_eq!(ColumnInstance::derived_name("[Order Date]"), "none:Order Date:qk");
        let clause = OnClause::eq("Orders", "cust_id", "Customers", "id");
        assert_eq!(clause.left_operand(), "[Orders].[cust_id]");
        assert_eq!(clause.right_operand(), "[Customers].[id]");
    }
}
