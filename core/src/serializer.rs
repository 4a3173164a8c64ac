//! Renders a [`Datasource`] to document text.
//!
//! Rendering copies the preserved snapshot (or starts a fresh root) and
//! patches it in a fixed order:
//!
//! 1. structural sections from builder calls: connections, the relation tree,
//!    aliases, column instances;
//! 2. data-source filters;
//! 3. the extract block, with the trailing `layout` and `semantic-values`
//!    sections moved after it, followed by the call to the extract generator;
//! 4. text output.
//!
//! The snapshot itself is never modified, so rendering is repeatable.

use std::path::{Path, PathBuf};

use crate::connection::ConnectionOrigin;
use crate::datasource::{Datasource, connection_root_mut};
use crate::dialect::Dialect;
use crate::error::DocumentError;
use crate::extract::{ExtractGenerator, NoExtractGenerator, infer_field_types};
use crate::filters::{
    USER_NAMESPACE, alias_element, column_instance_element, filter_element, needs_user_namespace,
};
use crate::model::{ExtractReference, bracketed};
use crate::relation_tree::build_relation_tree;
use crate::xml::{XmlElement, XmlNode, write_document};

/// Archive directory generated extracts are referenced from.
pub const DEFAULT_EXTRACT_DIR: &str = "Data/Extracts";

/// Sections that must stay at the end of a data source, in this order.
const TRAILING_SECTIONS: &[&str] = &["extract", "layout", "semantic-values"];

/// Sections moved behind a newly written extract block.
const AFTER_EXTRACT: &[&str] = &["layout", "semantic-values"];

/// Inputs of the extract branch of rendering.
pub struct RenderContext<'a> {
    pub generator: &'a mut dyn ExtractGenerator,
    /// Local directory the generator writes into.
    pub scratch_dir: &'a Path,
    /// Archive directory the document references the extract under.
    pub extract_dir: &'a str,
}

/// An extract file written by the generator during rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedExtract {
    /// Path inside a packaged container, e.g. `Data/Extracts/sales.hyper`.
    pub archive_path: String,
    pub local_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedDocument {
    pub text: String,
    pub extract: Option<GeneratedExtract>,
}

/// Renders a document without an extract reference.
pub fn render_to_string(ds: &Datasource) -> Result<String, DocumentError> {
    if let Some(extract) = &ds.extract {
        return Err(DocumentError::config(
            "extract_generator",
            extract.filename.as_str(),
            "documents with an extract must be rendered with an extract generator",
        ));
    }
    let mut generator = NoExtractGenerator;
    let mut ctx = RenderContext {
        generator: &mut generator,
        scratch_dir: Path::new("."),
        extract_dir: DEFAULT_EXTRACT_DIR,
    };
    Ok(render(ds, &mut ctx)?.text)
}

pub fn render(
    ds: &Datasource,
    ctx: &mut RenderContext<'_>,
) -> Result<RenderedDocument, DocumentError> {
    let (root, extract) = render_element(ds, ctx)?;
    Ok(RenderedDocument {
        text: write_document(&root)?,
        extract,
    })
}

/// Renders to an element tree; used directly when splicing into a workbook.
pub fn render_element(
    ds: &Datasource,
    ctx: &mut RenderContext<'_>,
) -> Result<(XmlElement, Option<GeneratedExtract>), DocumentError> {
    let mut root = match ds.snapshot() {
        Some(snapshot) => snapshot.clone(),
        None => fresh_root(ds),
    };

    sync_loaded_connections(&mut root, ds);

    if ds.has_structural_changes() {
        attach_new_connections(&mut root, ds)?;
        if ds.relation_dirty {
            attach_relation_tree(&mut root, ds)?;
        }
        if !ds.aliases.is_empty() {
            ensure_aliases_container(&mut root);
            for alias in &ds.aliases {
                insert_after_last(&mut root, &["aliases", "column"], alias_element(alias));
            }
        }
        for instance in &ds.column_instances {
            insert_after_last(
                &mut root,
                &["aliases", "column", "column-instance"],
                column_instance_element(instance),
            );
        }
    }

    for filter in &ds.filters {
        insert_before_trailing(&mut root, filter_element(filter));
    }
    if ds.filters.iter().chain(&ds.extract_filters).any(needs_user_namespace) {
        root.set_attr("xmlns:user", USER_NAMESPACE);
    }

    let generated = match &ds.extract {
        Some(reference) => Some(attach_extract(&mut root, ds, reference, ctx)?),
        None => {
            attach_filters_to_existing_extract(&mut root, ds)?;
            None
        }
    };

    Ok((root, generated))
}

fn fresh_root(ds: &Datasource) -> XmlElement {
    let mut root = XmlElement::new("datasource")
        .with_attr("formatted-name", ds.name.as_str())
        .with_attr("inline", "true")
        .with_attr("source-platform", "win")
        .with_attr("version", ds.dialect.version())
        .with_attr("xmlns:user", USER_NAMESPACE);
    if ds.dialect.is_federated() {
        root.push_child(
            XmlElement::new("connection")
                .with_attr("class", "federated")
                .with_child(XmlElement::new("named-connections")),
        );
    }
    root
}

/// Writes loaded connections back over their snapshot elements. Unchanged
/// connections produce identical elements.
fn sync_loaded_connections(root: &mut XmlElement, ds: &Datasource) {
    let loaded = ds.connections.iter().filter_map(|c| match c.origin {
        ConnectionOrigin::Loaded(ordinal) => Some((ordinal, c)),
        ConnectionOrigin::Built => None,
    });

    let Some(conn_root) = connection_root_mut(root) else {
        return;
    };
    if conn_root.attr("class") != Some("federated") {
        for (_, conn) in loaded.filter(|(ordinal, _)| *ordinal == 0) {
            conn.apply_to(conn_root);
        }
        return;
    }

    let Some(named_connections) = conn_root.child_mut("named-connections") else {
        return;
    };
    let mut wrappers: Vec<&mut XmlElement> = named_connections
        .elements_mut()
        .filter(|el| el.name == "named-connection" && el.child("connection").is_some())
        .collect();
    for (ordinal, conn) in loaded {
        let Some(wrapper) = wrappers.get_mut(ordinal) else {
            continue;
        };
        if let Some(named) = conn.named() {
            wrapper.set_attr("caption", named.caption.as_str());
        }
        if let Some(inner) = wrapper.child_mut("connection") {
            conn.apply_to(inner);
        }
    }
}

fn attach_new_connections(root: &mut XmlElement, ds: &Datasource) -> Result<(), DocumentError> {
    let built: Vec<_> = ds
        .connections
        .iter()
        .filter(|c| c.origin == ConnectionOrigin::Built)
        .collect();
    if built.is_empty() {
        return Ok(());
    }

    if !ds.dialect.is_federated() {
        if root.child("connection").is_some() || built.len() > 1 {
            return Err(DocumentError::AlreadyExists {
                section: "connection (legacy documents allow one)".to_string(),
            });
        }
        root.insert_child(0, built[0].to_element());
        return Ok(());
    }

    if connection_root_mut(root).is_none() {
        root.insert_child(
            0,
            XmlElement::new("connection").with_attr("class", "federated"),
        );
    }
    let conn_root = connection_root_mut(root)
        .ok_or_else(|| DocumentError::xml("connection", "missing federated connection"))?;
    if conn_root.attr("class") != Some("federated") {
        return Err(DocumentError::UnsupportedVersion {
            feature: "named connections in a single-connection document",
            dialect: ds.dialect,
        });
    }
    if conn_root.child("named-connections").is_none() {
        conn_root.insert_child(0, XmlElement::new("named-connections"));
    }
    if let Some(named_connections) = conn_root.child_mut("named-connections") {
        for conn in built {
            named_connections.push_child(conn.to_wrapped_element());
        }
    }
    Ok(())
}

fn attach_relation_tree(root: &mut XmlElement, ds: &Datasource) -> Result<(), DocumentError> {
    let main = ds.main_relation.as_ref().ok_or_else(|| {
        DocumentError::config(
            "main_relation",
            "",
            "joins need a main table, custom SQL, or stored procedure first",
        )
    })?;
    let connection_name = ds.connections.first().and_then(|c| c.name());
    let tree = build_relation_tree(main, &ds.joins, connection_name)?;

    let conn_root = connection_root_mut(root).ok_or_else(|| {
        DocumentError::config("connection", "", "a relation needs a connection to attach to")
    })?;
    match conn_root.position_of("relation") {
        Some(idx) => conn_root.children[idx] = XmlNode::Element(tree),
        None => {
            let idx = conn_root
                .position_of("named-connections")
                .map_or(0, |i| i + 1);
            conn_root.insert_child(idx, tree);
        }
    }
    Ok(())
}

fn ensure_aliases_container(root: &mut XmlElement) {
    if root.child("aliases").is_some() {
        return;
    }
    let idx = last_position_of(root, &["connection"]).map_or(0, |i| i + 1);
    root.insert_child(idx, XmlElement::new("aliases").with_attr("enabled", "yes"));
}

fn last_position_of(root: &XmlElement, names: &[&str]) -> Option<usize> {
    root.children
        .iter()
        .rposition(|node| matches!(node, XmlNode::Element(el) if names.contains(&el.name.as_str())))
}

/// Inserts after the last element named in `after`, or before the trailing
/// sections when none exists.
fn insert_after_last(root: &mut XmlElement, after: &[&str], el: XmlElement) {
    match last_position_of(root, after) {
        Some(idx) => root.insert_child(idx + 1, el),
        None => insert_before_trailing(root, el),
    }
}

fn insert_before_trailing(root: &mut XmlElement, el: XmlElement) {
    match root.position_of_any(TRAILING_SECTIONS) {
        Some(idx) => root.insert_child(idx, el),
        None => root.push_child(el),
    }
}

fn attach_extract(
    root: &mut XmlElement,
    ds: &Datasource,
    reference: &ExtractReference,
    ctx: &mut RenderContext<'_>,
) -> Result<GeneratedExtract, DocumentError> {
    if !ds.dialect.supports_inline_extract() {
        return Err(DocumentError::UnsupportedVersion {
            feature: "inline extract generation",
            dialect: ds.dialect,
        });
    }

    let moved: Vec<XmlElement> = AFTER_EXTRACT
        .iter()
        .flat_map(|name| root.detach_children_named(name))
        .collect();

    let archive_path = format!(
        "{}/{}",
        ctx.extract_dir.trim_end_matches('/'),
        reference.filename
    );
    let mut block = extract_block(ds.dialect, &archive_path, reference);
    for filter in &ds.extract_filters {
        block.push_child(filter_element(filter));
    }
    root.push_child(block);
    for el in moved {
        root.push_child(el);
    }

    std::fs::create_dir_all(ctx.scratch_dir).map_err(|e| DocumentError::io(ctx.scratch_dir, e))?;
    let local_path = ctx.scratch_dir.join(&reference.filename);
    let fields = infer_field_types(&ds.extract_filters);
    log::debug!(
        "generating extract {} with {} field(s)",
        local_path.display(),
        fields.len()
    );
    ctx.generator
        .generate(&local_path, &fields)
        .map_err(|source| DocumentError::ExtractGeneration {
            filename: reference.filename.clone(),
            source,
        })?;

    Ok(GeneratedExtract {
        archive_path,
        local_path,
    })
}

fn extract_block(dialect: Dialect, archive_path: &str, reference: &ExtractReference) -> XmlElement {
    let refresh = match &reference.incremental_key {
        Some(key) => XmlElement::new("refresh")
            .with_attr("increment-key", bracketed(key))
            .with_attr("incremental-updates", "true"),
        None => XmlElement::new("refresh")
            .with_attr("increment-key", "")
            .with_attr("incremental-updates", "false"),
    };

    XmlElement::new("extract")
        .with_attr("count", "-1")
        .with_attr("enabled", "true")
        .with_attr("units", "records")
        .with_child(
            XmlElement::new("connection")
                .with_attr("class", dialect.extract_connection_class())
                .with_attr("dbname", archive_path)
                .with_attr("schema", "Extract")
                .with_attr("tablename", "Extract")
                .with_attr("username", "tableau_internal_user")
                .with_child(
                    XmlElement::new("relation")
                        .with_attr("name", "Extract")
                        .with_attr("table", "[Extract].[Extract]")
                        .with_attr("type", "table"),
                )
                .with_child(
                    XmlElement::new("calculations").with_child(
                        XmlElement::new("calculation")
                            .with_attr("column", "[Number of Records]")
                            .with_attr("formula", "1"),
                    ),
                )
                .with_child(refresh),
        )
}

fn attach_filters_to_existing_extract(
    root: &mut XmlElement,
    ds: &Datasource,
) -> Result<(), DocumentError> {
    if ds.extract_filters.is_empty() {
        return Ok(());
    }
    let extract = root.child_mut("extract").ok_or_else(|| {
        DocumentError::config(
            "extract_filters",
            ds.extract_filters[0].field.as_str(),
            "extract filters need an extract; call add_extract first",
        )
    })?;
    for filter in &ds.extract_filters {
        extract.push_child(filter_element(filter));
    }
    Ok(())
}
