//! Tabdoc: build, edit, and repackage Tableau data source documents.
//!
//! This crate provides:
//! - A document model for data sources (`.tds`) that can be created empty or
//!   loaded from existing XML, edited through builder calls, and rendered back
//! - Relation trees for table, custom SQL, and stored-procedure sources with
//!   any number of joins
//! - Categorical, quantitative, and relative-date filters, column aliases, and
//!   extract declarations
//! - Packaged containers (`.tdsx`, `.twbx`) with member replacement and
//!   filename-collision-safe saving
//!
//! # Quick Start
//!
//! ```ignore
//! use tabdoc::{AuthMode, Datasource, Dialect, JoinType, OnClause};
//!
//! let mut ds = Datasource::new(Dialect::FederatedV2, "Sales");
//! ds.add_connection("postgres", "pg.local", "sales", AuthMode::UsernamePassword, None)?;
//! ds.set_first_table("public.orders", "Orders")?;
//! ds.join_table(
//!     JoinType::Left,
//!     "public.customers",
//!     "Customers",
//!     vec![OnClause::eq("Orders", "customer_id", "Customers", "id")],
//!     None,
//! )?;
//! let xml = tabdoc::render_to_string(&ds)?;
//! tabdoc::save_document(&xml, std::path::Path::new("out"), "Sales.tds")?;
//! ```

mod config;
mod connection;
mod container;
mod datasource;
mod dialect;
mod error;
pub mod error_codes;
mod extract;
mod filters;
mod model;
#[cfg(feature = "std-fs")]
mod package;
mod relation_tree;
mod serializer;
mod workbook;
mod xml;

pub use config::{ArchiveCompression, ConfigError, PackageConfig, PackageConfigBuilder};
pub use connection::{AuthMode, Connection, ConnectionHandle, NamedConnection};
pub use container::{ContainerError, ContainerLimits, ZipContainer};
pub use datasource::{ColumnInfo, Datasource, FilterScope};
pub use dialect::Dialect;
pub use error::DocumentError;
pub use extract::{
    ExtractFieldType, ExtractGenerator, FieldTypeMap, GENERIC_FIELD, NoExtractGenerator,
    infer_field_types,
};
pub use filters::{
    USER_NAMESPACE, alias_element, categorical_groupfilter, column_instance_element,
    filter_element, member_literal,
};
pub use model::{
    ColumnAlias, ColumnInstance, ComparisonOp, Continuity, DataType, DisplayType,
    ExtractReference, FilterDescriptor, FilterKind, FilterValue, IncludeMode, JoinDescriptor,
    JoinSource, JoinType, OnClause, PeriodType, RelativeAnchor, Role,
};
#[cfg(feature = "std-fs")]
pub use package::{
    DocumentPackage, PackageError, PackageState, WorkingDocument, allocate_output_path,
    save_document,
};
pub use relation_tree::{Relation, build_relation_tree};
pub use serializer::{
    DEFAULT_EXTRACT_DIR, GeneratedExtract, RenderContext, RenderedDocument, render,
    render_element, render_to_string,
};
pub use workbook::{PARAMETERS_DATASOURCE, RenderedWorkbook, Workbook};
pub use xml::{AttrBag, XmlElement, XmlNode, parse_document, write_document, write_fragment};
