//! Folds the main relation and an ordered list of joins into one relation tree.

use crate::error::DocumentError;
use crate::model::{JoinDescriptor, JoinSource, OnClause, bracketed, bracketed_table};
use crate::xml::XmlElement;

/// The document's single main relation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Relation {
    Table {
        table: String,
        alias: String,
    },
    CustomSql {
        sql: String,
        alias: String,
    },
    StoredProc {
        procedure: String,
        alias: String,
        parameters: Vec<(String, String)>,
    },
    /// A relation element carried over from a loaded snapshot.
    Preserved(XmlElement),
}

impl Relation {
    pub fn alias(&self) -> Option<&str> {
        match self {
            Relation::Table { alias, .. }
            | Relation::CustomSql { alias, .. }
            | Relation::StoredProc { alias, .. } => Some(alias.as_str()),
            Relation::Preserved(el) => el.attr("name"),
        }
    }

    pub fn to_element(&self, connection: Option<&str>) -> XmlElement {
        match self {
            Relation::Table { table, alias } => table_relation(table, alias, connection),
            Relation::CustomSql { sql, alias } => custom_sql_relation(sql, alias, connection),
            Relation::StoredProc {
                procedure,
                alias,
                parameters,
            } => {
                let mut el = with_connection(XmlElement::new("relation"), connection)
                    .with_attr("name", alias.as_str())
                    .with_attr("table", bracketed(procedure))
                    .with_attr("type", "stored-proc");
                if !parameters.is_empty() {
                    let mut actual = XmlElement::new("actual-parameters");
                    for (ordinal, (name, value)) in parameters.iter().enumerate() {
                        actual.push_child(
                            XmlElement::new("column")
                                .with_attr("name", name.as_str())
                                .with_attr("ordinal", (ordinal + 1).to_string())
                                .with_attr("value", value.as_str()),
                        );
                    }
                    el.push_child(actual);
                }
                el
            }
            Relation::Preserved(el) => el.clone(),
        }
    }
}

fn with_connection(el: XmlElement, connection: Option<&str>) -> XmlElement {
    match connection {
        Some(name) => el.with_attr("connection", name),
        None => el,
    }
}

fn table_relation(table: &str, alias: &str, connection: Option<&str>) -> XmlElement {
    with_connection(XmlElement::new("relation"), connection)
        .with_attr("name", alias)
        .with_attr("table", bracketed_table(table))
        .with_attr("type", "table")
}

fn custom_sql_relation(sql: &str, alias: &str, connection: Option<&str>) -> XmlElement {
    with_connection(XmlElement::new("relation"), connection)
        .with_attr("name", alias)
        .with_attr("type", "text")
        .with_text(sql)
}

fn comparison(clause: &OnClause) -> XmlElement {
    XmlElement::new("expression")
        .with_attr("op", clause.operator.as_str())
        .with_child(XmlElement::new("expression").with_attr("op", clause.left_operand()))
        .with_child(XmlElement::new("expression").with_attr("op", clause.right_operand()))
}

/// Left-to-right AND fold: `AND(AND(c1, c2), c3)`. A single clause is bare.
fn and_fold(clauses: &[OnClause], alias: &str) -> Result<XmlElement, DocumentError> {
    let (first, rest) = clauses.split_first().ok_or_else(|| {
        DocumentError::config("on_clauses", alias, "a join needs at least one on-clause")
    })?;
    Ok(rest.iter().fold(comparison(first), |acc, clause| {
        XmlElement::new("expression")
            .with_attr("op", "AND")
            .with_child(acc)
            .with_child(comparison(clause))
    }))
}

/// Builds the relation tree for `main` joined with `joins`, innermost first.
///
/// With no joins the result is a copy of the main relation. Otherwise each
/// join wraps everything built so far as its left child, so the last declared
/// join is the root and the tree depth equals the join count.
pub fn build_relation_tree(
    main: &Relation,
    joins: &[JoinDescriptor],
    connection: Option<&str>,
) -> Result<XmlElement, DocumentError> {
    let mut acc = main.to_element(connection);
    for join in joins {
        let clause = XmlElement::new("clause")
            .with_attr("type", "join")
            .with_child(and_fold(&join.on_clauses, &join.alias)?);
        let right = match &join.source {
            JoinSource::Table(table) => table_relation(table, &join.alias, connection),
            JoinSource::CustomSql(sql) => custom_sql_relation(sql, &join.alias, connection),
        };
        acc = XmlElement::new("relation")
            .with_attr("join", join.join_type.as_str())
            .with_attr("type", "join")
            .with_child(clause)
            .with_child(acc)
            .with_child(right);
    }
    Ok(acc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ComparisonOp, JoinType};

    fn join(alias: &str, clauses: Vec<OnClause>) -> JoinDescriptor {
        JoinDescriptor {
            join_type: JoinType::Inner,
            source: JoinSource::Table(alias.to_lowercase()),
            alias: alias.to_string(),
            on_clauses: clauses,
        }
    }

    fn main_table() -> Relation {
        Relation::Table {
            table: "orders".into(),
            alias: "Orders".into(),
        }
    }

    #[test]
    fn zero_joins_copy_main_relation() {
        let tree = build_relation_tree(&main_table(), &[], Some("pg.1")).expect("tree");
        assert_eq!(tree.attr("type"), Some("table"));
        assert_eq!(tree.attr("name"), Some("Orders"));
        assert_eq!(tree.attr("table"), Some("[orders]"));
        assert_eq!(tree.attr("connection"), Some("pg.1"));
    }

    #[test]
    fn three_joins_nest_last_declared_outermost() {
        let joins = vec![
            join("J1", vec![OnClause::eq("Orders", "a", "J1", "a")]),
            join("J2", vec![OnClause::eq("Orders", "b", "J2", "b")]),
            join("J3", vec![OnClause::eq("Orders", "c", "J3", "c")]),
        ];
        let tree = build_relation_tree(&main_table(), &joins, None).expect("tree");

        let mut seen = Vec::new();
        let mut node = &tree;
        while node.attr("type") == Some("join") {
            let rels: Vec<_> = node.elements_named("relation").collect();
            assert_eq!(rels.len(), 2);
            seen.push(rels[1].attr("name").unwrap_or_default().to_string());
            node = rels[0];
        }
        assert_eq!(seen, vec!["J3", "J2", "J1"]);
        assert_eq!(node.attr("name"), Some("Orders"));
        let joins_found = tree.count_descendants(&|el| el.attr("type") == Some("join"));
        assert_eq!(joins_found, 3);
    }

    #[test]
    fn on_clauses_fold_left_to_right() {
        let joins = vec![join(
            "C",
            vec![
                OnClause::eq("A", "x", "C", "x"),
                OnClause::new("A", "y", ComparisonOp::GtEq, "C", "y"),
                OnClause::eq("A", "z", "C", "z"),
            ],
        )];
        let tree = build_relation_tree(&main_table(), &joins, None).expect("tree");
        let outer_and = tree
            .child("clause")
            .and_then(|c| c.child("expression"))
            .expect("expression");
        assert_eq!(outer_and.attr("op"), Some("AND"));
        let parts: Vec<_> = outer_and.elements().collect();
        assert_eq!(parts[0].attr("op"), Some("AND"));
        assert_eq!(parts[1].attr("op"), Some("="));
        assert_eq!(
            parts[1].elements().next().and_then(|e| e.attr("op")),
            Some("[A].[z]")
        );
        let inner: Vec<_> = parts[0].elements().collect();
        assert_eq!(inner[0].elements().next().and_then(|e| e.attr("op")), Some("[A].[x]"));
        assert_eq!(inner[1].attr("op"), Some(">="));
    }

    #[test]
    fn custom_sql_join_carries_sql_text() {
        let joins = vec![JoinDescriptor {
            join_type: JoinType::Left,
            source: JoinSource::CustomSql("SELECT * FROM regions".into()),
            alias: "Regions".into(),
            on_clauses: vec![OnClause::eq("Orders", "region_id", "Regions", "id")],
        }];
        let tree = build_relation_tree(&main_table(), &joins, None).expect("tree");
        assert_eq!(tree.attr("join"), Some("left"));
        let right = tree.elements_named("relation").nth(1).expect("right");
        assert_eq!(right.attr("type"), Some("text"));
        assert_eq!(right.text(), "SELECT * FROM regions");
    }

    #[test]
    fn empty_on_clause_list_is_rejected() {
        let err = build_relation_tree(&main_table(), &[join("X", vec![])], None)
            .expect_err("no clauses");
        assert!(matches!(err, DocumentError::Configuration { field: "on_clauses", .. }));
    }
}
