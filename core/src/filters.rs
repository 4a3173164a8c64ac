//! Structural forms of filter, alias, and column-instance descriptors.
//!
//! All functions here are pure: descriptor in, element out.

use crate::model::{
    ColumnAlias, ColumnInstance, FilterDescriptor, FilterKind, FilterValue, IncludeMode, bracketed,
};
use crate::xml::XmlElement;

pub const USER_NAMESPACE: &str = "http://www.tableausoftware.com/xml/user";

/// Renders one `<filter>` element.
pub fn filter_element(filter: &FilterDescriptor) -> XmlElement {
    let column = filter.column_ref();
    match &filter.kind {
        FilterKind::Categorical {
            values,
            mode,
            manual_selection,
        } => XmlElement::new("filter")
            .with_attr("class", "categorical")
            .with_attr("column", column.as_str())
            .with_child(categorical_groupfilter(
                &column,
                values,
                *mode,
                *manual_selection,
            )),
        FilterKind::Quantitative { min, max, is_date } => {
            let mut el = XmlElement::new("filter")
                .with_attr("class", "quantitative")
                .with_attr("column", column.as_str())
                .with_attr("included-values", "in-range");
            if let Some(min) = min {
                el.push_child(XmlElement::new("min").with_text(bound_literal(min, *is_date)));
            }
            if let Some(max) = max {
                el.push_child(XmlElement::new("max").with_text(bound_literal(max, *is_date)));
            }
            el
        }
        FilterKind::RelativeDate {
            period,
            anchor,
            count,
            to_date,
        } => {
            let (first, last) = anchor.period_bounds(*count);
            XmlElement::new("filter")
                .with_attr("class", "relative-date")
                .with_attr("column", column.as_str())
                .with_attr("first-period", first.to_string())
                .with_attr("include-future", (!to_date).to_string())
                .with_attr("include-null", "false")
                .with_attr("last-period", last.to_string())
                .with_attr("period-type", period.as_str())
        }
    }
}

/// Whether the rendered filter uses `user:` attributes.
pub fn needs_user_namespace(filter: &FilterDescriptor) -> bool {
    matches!(filter.kind, FilterKind::Categorical { .. })
}

/// The four categorical shapes:
///
/// | values | mode    | shape                                      |
/// |--------|---------|--------------------------------------------|
/// | 1      | include | `member`                                   |
/// | 1      | exclude | `except(level-members, member)`            |
/// | N      | include | `union(member * N)`                        |
/// | N      | exclude | `except(member * N)`                       |
pub fn categorical_groupfilter(
    column: &str,
    values: &[FilterValue],
    mode: IncludeMode,
    manual_selection: bool,
) -> XmlElement {
    let enumeration = match mode {
        IncludeMode::Include => "inclusive",
        IncludeMode::Exclude => "exclusive",
    };

    let mut outer = match (values, mode) {
        ([single], IncludeMode::Include) => member_test(column, single),
        ([single], IncludeMode::Exclude) => XmlElement::new("groupfilter")
            .with_attr("function", "except")
            .with_child(
                XmlElement::new("groupfilter")
                    .with_attr("function", "level-members")
                    .with_attr("level", column),
            )
            .with_child(member_test(column, single)),
        (many, IncludeMode::Include) => {
            let mut union = XmlElement::new("groupfilter").with_attr("function", "union");
            for value in many {
                union.push_child(member_test(column, value));
            }
            union
        }
        (many, IncludeMode::Exclude) => {
            let mut except = XmlElement::new("groupfilter").with_attr("function", "except");
            for value in many {
                except.push_child(member_test(column, value));
            }
            except
        }
    };

    outer.set_attr("user:ui-domain", "database");
    outer.set_attr("user:ui-enumeration", enumeration);
    outer.set_attr("user:ui-marker", "enumerate");
    if manual_selection {
        outer.set_attr("user:ui-manual-selection", "true");
    }
    outer
}

fn member_test(column: &str, value: &FilterValue) -> XmlElement {
    XmlElement::new("groupfilter")
        .with_attr("function", "member")
        .with_attr("level", column)
        .with_attr("member", member_literal(value))
}

/// String members are quoted with embedded quotes doubled; other values are
/// written as-is.
pub fn member_literal(value: &FilterValue) -> String {
    match value {
        FilterValue::Text(text) => format!("\"{}\"", text.replace('"', "\"\"")),
        other => other.to_string(),
    }
}

fn bound_literal(value: &FilterValue, is_date: bool) -> String {
    let raw = value.to_string();
    if is_date && !(raw.starts_with('#') && raw.ends_with('#')) {
        format!("#{raw}#")
    } else {
        raw
    }
}

/// Renders a `<column>` alias, with a `<calculation>` child for calculated fields.
pub fn alias_element(alias: &ColumnAlias) -> XmlElement {
    let mut el = XmlElement::new("column")
        .with_attr("caption", alias.caption.as_str())
        .with_attr("datatype", alias.datatype.as_str())
        .with_attr("name", bracketed(&alias.field))
        .with_attr("role", alias.role.as_str())
        .with_attr("type", alias.display_type.as_str());
    if let Some(formula) = &alias.formula {
        el.push_child(
            XmlElement::new("calculation")
                .with_attr("class", "tableau")
                .with_attr("formula", formula.as_str()),
        );
    }
    el
}

pub fn column_instance_element(instance: &ColumnInstance) -> XmlElement {
    XmlElement::new("column-instance")
        .with_attr("column", bracketed(&instance.column))
        .with_attr("derivation", "None")
        .with_attr("name", bracketed(&instance.name))
        .with_attr("pivot", "key")
        .with_attr("type", "quantitative")
}
