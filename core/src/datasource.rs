//! The data-source document model.
//!
//! A [`Datasource`] is either created empty for a [`Dialect`] or hydrated from
//! a loaded snapshot. Builder operations only validate their input and append
//! descriptors to plain lists; the snapshot is never touched. Structural nodes
//! are produced later by [`crate::serializer`].

use std::path::Path;
use std::sync::Arc;

use crate::connection::{
    AuthMode, Connection, ConnectionHandle, ConnectionOrigin, NamedConnection,
    generate_connection_name,
};
use crate::dialect::Dialect;
use crate::error::DocumentError;
use crate::model::{
    ColumnAlias, ColumnInstance, Continuity, DataType, DisplayType, ExtractReference,
    FilterDescriptor, FilterKind, FilterValue, IncludeMode, JoinDescriptor, JoinSource, JoinType,
    OnClause, PeriodType, RelativeAnchor, Role, bracketed, unbracketed,
};
use crate::relation_tree::Relation;
use crate::xml::{XmlElement, parse_document};

/// Which filter list a filter operation appends to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterScope {
    Datasource,
    Extract,
}

/// A column as seen by [`Datasource::column`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub caption: Option<String>,
    pub datatype: Option<String>,
    pub role: Option<String>,
    pub formula: Option<String>,
}

impl ColumnInfo {
    fn from_element(el: &XmlElement) -> Self {
        Self {
            name: el.attr("name").unwrap_or_default().to_string(),
            caption: el.attr("caption").map(str::to_string),
            datatype: el.attr("datatype").map(str::to_string),
            role: el.attr("role").map(str::to_string),
            formula: el
                .child("calculation")
                .and_then(|c| c.attr("formula"))
                .map(str::to_string),
        }
    }

    fn from_alias(alias: &ColumnAlias) -> Self {
        Self {
            name: bracketed(&alias.field),
            caption: Some(alias.caption.clone()),
            datatype: Some(alias.datatype.as_str().to_string()),
            role: Some(alias.role.as_str().to_string()),
            formula: alias.formula.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Datasource {
    pub(crate) dialect: Dialect,
    pub(crate) name: String,
    pub(crate) snapshot: Option<Arc<XmlElement>>,
    pub(crate) connections: Vec<Connection>,
    pub(crate) main_relation: Option<Relation>,
    pub(crate) relation_dirty: bool,
    pub(crate) joins: Vec<JoinDescriptor>,
    pub(crate) filters: Vec<FilterDescriptor>,
    pub(crate) extract_filters: Vec<FilterDescriptor>,
    pub(crate) aliases: Vec<ColumnAlias>,
    pub(crate) column_instances: Vec<ColumnInstance>,
    pub(crate) extract: Option<ExtractReference>,
}

impl Datasource {
    /// Empty document in `dialect`.
    pub fn new(dialect: Dialect, name: impl Into<String>) -> Self {
        Self {
            dialect,
            name: name.into(),
            snapshot: None,
            connections: Vec::new(),
            main_relation: None,
            relation_dirty: false,
            joins: Vec::new(),
            filters: Vec::new(),
            extract_filters: Vec::new(),
            aliases: Vec::new(),
            column_instances: Vec::new(),
            extract: None,
        }
    }

    /// Empty document whose dialect is chosen by a version marker such as `18.1`.
    pub fn create(version: &str, name: impl Into<String>) -> Result<Self, DocumentError> {
        let dialect = Dialect::from_version(version)?;
        Ok(Self::new(dialect, name))
    }

    /// Hydrates a document from its XML text.
    pub fn load(text: &str) -> Result<Self, DocumentError> {
        let root = parse_document(text, "datasource")?;
        Self::from_element(root, None)
    }

    pub fn load_from_path(path: &Path) -> Result<Self, DocumentError> {
        let text = std::fs::read_to_string(path).map_err(|e| DocumentError::io(path, e))?;
        Self::load(&text)
    }

    /// Hydrates from an already parsed `<datasource>` element.
    ///
    /// `fallback_version` is used when the element has no `version` marker,
    /// as happens for some data sources embedded in workbooks.
    pub fn from_element(
        root: XmlElement,
        fallback_version: Option<&str>,
    ) -> Result<Self, DocumentError> {
        if root.name != "datasource" {
            return Err(DocumentError::xml(
                "datasource",
                format!("expected <datasource> root, found <{}>", root.name),
            ));
        }
        let version = root
            .attr("version")
            .or(fallback_version)
            .ok_or_else(|| {
                DocumentError::config("version", "", "the document has no version marker")
            })?;
        let dialect = Dialect::from_version(version)?;

        let name = root
            .attr("formatted-name")
            .or_else(|| root.attr("caption"))
            .or_else(|| root.attr("name"))
            .unwrap_or_default()
            .to_string();

        let connections = hydrate_connections(&root);
        let main_relation = connection_root(&root)
            .and_then(|c| c.child("relation"))
            .map(|rel| Relation::Preserved(rel.clone()));

        let mut ds = Self::new(dialect, name);
        ds.connections = connections;
        ds.main_relation = main_relation;
        ds.snapshot = Some(Arc::new(root));
        Ok(ds)
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The originally loaded content, if any. Never modified.
    pub fn snapshot(&self) -> Option<&XmlElement> {
        self.snapshot.as_deref()
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    pub fn main_relation(&self) -> Option<&Relation> {
        self.main_relation.as_ref()
    }

    pub fn joins(&self) -> &[JoinDescriptor] {
        &self.joins
    }

    pub fn filters(&self) -> &[FilterDescriptor] {
        &self.filters
    }

    pub fn extract_filters(&self) -> &[FilterDescriptor] {
        &self.extract_filters
    }

    pub fn aliases(&self) -> &[ColumnAlias] {
        &self.aliases
    }

    pub fn column_instances(&self) -> &[ColumnInstance] {
        &self.column_instances
    }

    pub fn extract(&self) -> Option<&ExtractReference> {
        self.extract.as_ref()
    }

    /// Whether the loaded snapshot already contains an `<extract>` section.
    pub fn snapshot_has_extract(&self) -> bool {
        self.snapshot
            .as_deref()
            .is_some_and(|root| root.child("extract").is_some())
    }

    /// Whether any call requires the relation, alias, or column-instance
    /// sections to be rebuilt at render time.
    pub fn has_structural_changes(&self) -> bool {
        self.relation_dirty
            || !self.aliases.is_empty()
            || !self.column_instances.is_empty()
            || self
                .connections
                .iter()
                .any(|c| c.origin == ConnectionOrigin::Built)
    }

    pub fn add_connection(
        &mut self,
        class: &str,
        server: &str,
        database: &str,
        auth: AuthMode,
        initial_sql: Option<&str>,
    ) -> Result<ConnectionHandle, DocumentError> {
        if class.trim().is_empty() {
            return Err(DocumentError::config(
                "connection_type",
                class,
                "a connection class is required",
            ));
        }

        let named = if self.dialect.is_federated() {
            let taken: Vec<&str> = self.connections.iter().filter_map(Connection::name).collect();
            Some(NamedConnection {
                name: generate_connection_name(class, &taken),
                caption: server.to_string(),
            })
        } else {
            if !self.connections.is_empty() || self.snapshot_has_direct_connection() {
                return Err(DocumentError::AlreadyExists {
                    section: "connection (legacy documents allow one)".to_string(),
                });
            }
            None
        };

        let name = named.as_ref().map(|n| n.name.clone());
        self.connections.push(Connection::build(
            class,
            server,
            database,
            auth,
            initial_sql,
            named,
        ));
        let index = self.connections.len() - 1;
        log::debug!("added {class} connection #{index} to '{}'", self.name);
        Ok(ConnectionHandle::new(index, name))
    }

    fn snapshot_has_direct_connection(&self) -> bool {
        self.snapshot
            .as_deref()
            .and_then(|root| root.child("connection"))
            .is_some()
    }

    pub fn connection_by_handle(&self, handle: &ConnectionHandle) -> Option<&Connection> {
        self.connections.get(handle.index)
    }

    pub fn connection_mut(
        &mut self,
        handle: &ConnectionHandle,
    ) -> Result<&mut Connection, DocumentError> {
        self.connections
            .get_mut(handle.index)
            .ok_or_else(|| DocumentError::NoMatch {
                kind: "connection",
                name: handle.name().unwrap_or("#").to_string(),
            })
    }

    /// Looks up a connection by named-connection token or by server caption.
    pub fn connection(&self, name: &str) -> Result<&Connection, DocumentError> {
        self.connections
            .iter()
            .find(|c| {
                c.name() == Some(name) || c.named().is_some_and(|n| n.caption == name)
            })
            .ok_or_else(|| DocumentError::NoMatch {
                kind: "connection",
                name: name.to_string(),
            })
    }

    pub fn connection_handle(&self, name: &str) -> Result<ConnectionHandle, DocumentError> {
        let index = self
            .connections
            .iter()
            .position(|c| c.name() == Some(name))
            .ok_or_else(|| DocumentError::NoMatch {
                kind: "connection",
                name: name.to_string(),
            })?;
        Ok(ConnectionHandle::new(index, Some(name.to_string())))
    }

    pub fn set_first_table(&mut self, table: &str, alias: &str) -> Result<(), DocumentError> {
        require_non_empty("table", table)?;
        self.replace_main(Relation::Table {
            table: table.to_string(),
            alias: alias_or(alias, table),
        });
        Ok(())
    }

    pub fn set_first_custom_sql(&mut self, sql: &str, alias: &str) -> Result<(), DocumentError> {
        require_non_empty("custom_sql", sql)?;
        self.replace_main(Relation::CustomSql {
            sql: sql.to_string(),
            alias: alias_or(alias, "Custom SQL Query"),
        });
        Ok(())
    }

    pub fn set_first_stored_proc(
        &mut self,
        procedure: &str,
        alias: &str,
        parameters: &[(&str, &str)],
    ) -> Result<(), DocumentError> {
        require_non_empty("stored_procedure", procedure)?;
        self.replace_main(Relation::StoredProc {
            procedure: procedure.to_string(),
            alias: alias_or(alias, procedure),
            parameters: parameters
                .iter()
                .map(|(n, v)| (n.to_string(), v.to_string()))
                .collect(),
        });
        Ok(())
    }

    fn replace_main(&mut self, relation: Relation) {
        self.main_relation = Some(relation);
        self.relation_dirty = true;
    }

    /// Appends a join. With `custom_sql` the right side is a custom SQL
    /// relation named `alias` and `table` is ignored.
    pub fn join_table(
        &mut self,
        join_type: JoinType,
        table: &str,
        alias: &str,
        on_clauses: Vec<OnClause>,
        custom_sql: Option<&str>,
    ) -> Result<(), DocumentError> {
        if on_clauses.is_empty() {
            return Err(DocumentError::config(
                "on_clauses",
                alias,
                "a join needs at least one on-clause",
            ));
        }
        let source = match custom_sql {
            Some(sql) => {
                require_non_empty("custom_sql", sql)?;
                JoinSource::CustomSql(sql.to_string())
            }
            None => {
                require_non_empty("table", table)?;
                JoinSource::Table(table.to_string())
            }
        };
        self.joins.push(JoinDescriptor {
            join_type,
            source,
            alias: alias_or(alias, table),
            on_clauses,
        });
        self.relation_dirty = true;
        Ok(())
    }

    pub fn add_dimension_filter(
        &mut self,
        field: &str,
        values: Vec<FilterValue>,
        mode: IncludeMode,
        manual_selection: bool,
    ) -> Result<(), DocumentError> {
        self.add_dimension_filter_scoped(FilterScope::Datasource, field, values, mode, manual_selection)
    }

    pub fn add_extract_dimension_filter(
        &mut self,
        field: &str,
        values: Vec<FilterValue>,
        mode: IncludeMode,
        manual_selection: bool,
    ) -> Result<(), DocumentError> {
        self.add_dimension_filter_scoped(FilterScope::Extract, field, values, mode, manual_selection)
    }

    pub fn add_dimension_filter_scoped(
        &mut self,
        scope: FilterScope,
        field: &str,
        values: Vec<FilterValue>,
        mode: IncludeMode,
        manual_selection: bool,
    ) -> Result<(), DocumentError> {
        if values.is_empty() {
            return Err(DocumentError::config(
                "values",
                field,
                "a categorical filter needs at least one value",
            ));
        }
        self.push_filter(
            scope,
            field,
            FilterKind::Categorical {
                values,
                mode,
                manual_selection,
            },
        )
    }

    pub fn add_continuous_filter(
        &mut self,
        field: &str,
        min: Option<FilterValue>,
        max: Option<FilterValue>,
        is_date: bool,
    ) -> Result<(), DocumentError> {
        self.add_continuous_filter_scoped(FilterScope::Datasource, field, min, max, is_date)
    }

    pub fn add_extract_continuous_filter(
        &mut self,
        field: &str,
        min: Option<FilterValue>,
        max: Option<FilterValue>,
        is_date: bool,
    ) -> Result<(), DocumentError> {
        self.add_continuous_filter_scoped(FilterScope::Extract, field, min, max, is_date)
    }

    pub fn add_continuous_filter_scoped(
        &mut self,
        scope: FilterScope,
        field: &str,
        min: Option<FilterValue>,
        max: Option<FilterValue>,
        is_date: bool,
    ) -> Result<(), DocumentError> {
        self.push_filter(scope, field, FilterKind::Quantitative { min, max, is_date })
    }

    pub fn add_relative_date_filter(
        &mut self,
        field: &str,
        period: PeriodType,
        anchor: RelativeAnchor,
        count: u32,
        to_date: bool,
    ) -> Result<(), DocumentError> {
        self.add_relative_date_filter_scoped(
            FilterScope::Datasource,
            field,
            period,
            anchor,
            count,
            to_date,
        )
    }

    pub fn add_extract_relative_date_filter(
        &mut self,
        field: &str,
        period: PeriodType,
        anchor: RelativeAnchor,
        count: u32,
        to_date: bool,
    ) -> Result<(), DocumentError> {
        self.add_relative_date_filter_scoped(
            FilterScope::Extract,
            field,
            period,
            anchor,
            count,
            to_date,
        )
    }

    pub fn add_relative_date_filter_scoped(
        &mut self,
        scope: FilterScope,
        field: &str,
        period: PeriodType,
        anchor: RelativeAnchor,
        count: u32,
        to_date: bool,
    ) -> Result<(), DocumentError> {
        self.push_filter(
            scope,
            field,
            FilterKind::RelativeDate {
                period,
                anchor,
                count,
                to_date,
            },
        )
    }

    fn push_filter(
        &mut self,
        scope: FilterScope,
        field: &str,
        kind: FilterKind,
    ) -> Result<(), DocumentError> {
        require_non_empty("field", field)?;
        let filter = FilterDescriptor {
            field: unbracketed(field).to_string(),
            kind,
        };
        if filter.uses_column_instance() {
            self.register_column_instance(&filter.field);
        }
        match scope {
            FilterScope::Datasource => self.filters.push(filter),
            FilterScope::Extract => self.extract_filters.push(filter),
        }
        Ok(())
    }

    fn register_column_instance(&mut self, field: &str) {
        let instance = ColumnInstance::derived(field);
        if !self.column_instances.iter().any(|c| c.name == instance.name) {
            self.column_instances.push(instance);
        }
    }

    pub fn add_column_alias(
        &mut self,
        field: &str,
        caption: &str,
        role: Role,
        continuity: Continuity,
        datatype: DataType,
        formula: Option<&str>,
    ) -> Result<(), DocumentError> {
        require_non_empty("field", field)?;
        self.aliases.push(ColumnAlias {
            field: unbracketed(field).to_string(),
            caption: caption.to_string(),
            role,
            display_type: DisplayType::for_column(continuity, datatype),
            datatype,
            formula: formula.map(str::to_string),
        });
        Ok(())
    }

    /// Declares the document's extract. The extension is chosen by dialect,
    /// replacing any extension on `filename`.
    pub fn add_extract(&mut self, filename: &str) -> Result<&mut ExtractReference, DocumentError> {
        if self.extract.is_some() || self.snapshot_has_extract() {
            return Err(DocumentError::AlreadyExists {
                section: "extract".to_string(),
            });
        }
        let stem = Path::new(filename.trim())
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default();
        require_non_empty("extract_filename", stem)?;

        let reference = ExtractReference {
            filename: format!("{stem}.{}", self.dialect.extract_extension()),
            incremental_key: None,
        };
        Ok(self.extract.insert(reference))
    }

    /// Finds a column by bracketed or bare name, or by caption.
    pub fn column(&self, name: &str) -> Result<ColumnInfo, DocumentError> {
        let wanted = bracketed(name);
        if let Some(alias) = self
            .aliases
            .iter()
            .rev()
            .find(|a| bracketed(&a.field) == wanted || a.caption == name)
        {
            return Ok(ColumnInfo::from_alias(alias));
        }
        self.snapshot
            .as_deref()
            .and_then(|root| {
                root.elements_named("column").find(|c| {
                    c.attr("name") == Some(wanted.as_str()) || c.attr("caption") == Some(name)
                })
            })
            .map(ColumnInfo::from_element)
            .ok_or_else(|| DocumentError::NoMatch {
                kind: "column",
                name: name.to_string(),
            })
    }

    /// Field references of the named drill-path hierarchy, outermost first.
    pub fn hierarchy(&self, name: &str) -> Result<Vec<String>, DocumentError> {
        self.snapshot
            .as_deref()
            .and_then(|root| root.child("drill-paths"))
            .and_then(|paths| {
                paths
                    .elements_named("drill-path")
                    .find(|p| p.attr("name") == Some(name))
            })
            .map(|path| path.elements_named("field").map(|f| f.text()).collect())
            .ok_or_else(|| DocumentError::NoMatch {
                kind: "hierarchy",
                name: name.to_string(),
            })
    }
}

fn require_non_empty(field: &'static str, value: &str) -> Result<(), DocumentError> {
    if value.trim().is_empty() {
        return Err(DocumentError::config(field, value, "must not be empty"));
    }
    Ok(())
}

fn alias_or(alias: &str, fallback: &str) -> String {
    if alias.trim().is_empty() {
        fallback.to_string()
    } else {
        alias.to_string()
    }
}

/// The element relations hang from: the federated wrapper connection, or the
/// single direct connection of a legacy document.
pub(crate) fn connection_root(root: &XmlElement) -> Option<&XmlElement> {
    root.child("connection")
}

pub(crate) fn connection_root_mut(root: &mut XmlElement) -> Option<&mut XmlElement> {
    root.child_mut("connection")
}

fn hydrate_connections(root: &XmlElement) -> Vec<Connection> {
    let Some(conn) = connection_root(root) else {
        return Vec::new();
    };
    if conn.attr("class") != Some("federated") {
        return vec![Connection::from_element(conn, None, 0)];
    }

    conn.child("named-connections")
        .into_iter()
        .flat_map(|named| named.elements_named("named-connection"))
        .filter_map(|named| {
            let inner = named.child("connection")?;
            Some((named, inner))
        })
        .enumerate()
        .map(|(ordinal, (named, inner))| {
            let identity = NamedConnection {
                name: named.attr("name").unwrap_or_default().to_string(),
                caption: named.attr("caption").unwrap_or_default().to_string(),
            };
            Connection::from_element(inner, Some(identity), ordinal)
        })
        .collect()
}
