//! Workbook documents that embed data sources.
//!
//! Only the top-level `<datasources>` section is modeled. Everything before
//! and after it is carried through as opaque text.

use quick_xml::Reader;
use quick_xml::events::Event;

use crate::datasource::{ColumnInfo, Datasource};
use crate::error::DocumentError;
use crate::serializer::{GeneratedExtract, RenderContext, render_element};
use crate::xml::{XmlElement, parse_document, write_fragment};

/// Name of the pseudo data source holding workbook parameters.
pub const PARAMETERS_DATASOURCE: &str = "Parameters";

const OPEN_TAG: &str = "<datasources";
const CLOSE_TAG: &str = "</datasources>";

#[derive(Debug, Clone)]
pub struct Workbook {
    prefix: String,
    suffix: String,
    datasources: Vec<Datasource>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedWorkbook {
    pub text: String,
    pub extracts: Vec<GeneratedExtract>,
}

impl Workbook {
    pub fn load(text: &str) -> Result<Self, DocumentError> {
        let (start, end) = locate_datasources(text)?;
        let section = parse_document(&text[start..end], "datasources")?;
        let fallback = workbook_version(&text[..start])?;

        let datasources = section
            .elements_named("datasource")
            .map(|el| Datasource::from_element(el.clone(), fallback.as_deref()))
            .collect::<Result<Vec<_>, _>>()?;
        log::debug!("loaded workbook with {} data source(s)", datasources.len());

        Ok(Self {
            prefix: text[..start].to_string(),
            suffix: text[end..].to_string(),
            datasources,
        })
    }

    #[cfg(feature = "std-fs")]
    pub fn load_from_path(path: &std::path::Path) -> Result<Self, DocumentError> {
        let text = std::fs::read_to_string(path).map_err(|e| DocumentError::io(path, e))?;
        Self::load(&text)
    }

    pub fn datasources(&self) -> &[Datasource] {
        &self.datasources
    }

    /// Finds an embedded data source by display name or internal `name`.
    pub fn datasource(&self, name: &str) -> Result<&Datasource, DocumentError> {
        let idx = self.position(name)?;
        Ok(&self.datasources[idx])
    }

    pub fn datasource_mut(&mut self, name: &str) -> Result<&mut Datasource, DocumentError> {
        let idx = self.position(name)?;
        Ok(&mut self.datasources[idx])
    }

    fn position(&self, name: &str) -> Result<usize, DocumentError> {
        self.datasources
            .iter()
            .position(|ds| {
                ds.name() == name
                    || ds
                        .snapshot()
                        .is_some_and(|root| root.attr("name") == Some(name))
            })
            .ok_or_else(|| DocumentError::NoMatch {
                kind: "datasource",
                name: name.to_string(),
            })
    }

    /// Looks up a workbook parameter by caption or bracketed name.
    pub fn parameter(&self, name: &str) -> Result<ColumnInfo, DocumentError> {
        let no_match = || DocumentError::NoMatch {
            kind: "parameter",
            name: name.to_string(),
        };
        let params = self.datasource(PARAMETERS_DATASOURCE).map_err(|_| no_match())?;
        params.column(name).map_err(|_| no_match())
    }

    pub fn render(&self, ctx: &mut RenderContext<'_>) -> Result<RenderedWorkbook, DocumentError> {
        let mut section = XmlElement::new("datasources");
        let mut extracts = Vec::new();
        for ds in &self.datasources {
            let (el, extract) = render_element(ds, ctx)?;
            section.push_child(el);
            extracts.extend(extract);
        }

        let mut text = self.prefix.clone();
        text.push_str(&write_fragment(&section)?);
        text.push_str(&self.suffix);
        Ok(RenderedWorkbook { text, extracts })
    }
}

/// Byte range of the first `<datasources>` element, end tag included.
fn locate_datasources(text: &str) -> Result<(usize, usize), DocumentError> {
    let missing = || DocumentError::xml("datasources", "workbook has no <datasources> section");

    let mut search = 0;
    let start = loop {
        let idx = text[search..].find(OPEN_TAG).ok_or_else(missing)? + search;
        let next = text[idx + OPEN_TAG.len()..].chars().next();
        if matches!(next, Some(c) if c == '>' || c == '/' || c.is_whitespace()) {
            break idx;
        }
        search = idx + OPEN_TAG.len();
    };

    let tag_end = text[start..]
        .find('>')
        .map(|i| start + i)
        .ok_or_else(|| DocumentError::xml("datasources", "unterminated <datasources> tag"))?;
    if text[..tag_end].ends_with('/') {
        return Ok((start, tag_end + 1));
    }

    let end = text[tag_end..]
        .find(CLOSE_TAG)
        .map(|i| tag_end + i + CLOSE_TAG.len())
        .ok_or_else(|| DocumentError::xml("datasources", "<datasources> is never closed"))?;
    Ok((start, end))
}

/// The `version` of the `<workbook>` root, read from the text before the
/// data-source section.
fn workbook_version(prefix: &str) -> Result<Option<String>, DocumentError> {
    let mut reader = Reader::from_str(prefix);
    reader.config_mut().trim_text(true);
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) if e.name().as_ref() == b"workbook" => {
                for attr in e.attributes() {
                    let attr = attr.map_err(|err| DocumentError::xml("workbook", err))?;
                    if attr.key.as_ref() == b"version" {
                        let value = attr
                            .unescape_value()
                            .map_err(|err| DocumentError::xml("workbook", err))?;
                        return Ok(Some(value.into_owned()));
                    }
                }
                return Ok(None);
            }
            Ok(Event::Eof) => return Ok(None),
            Ok(_) => {}
            Err(err) => return Err(DocumentError::xml("workbook", err)),
        }
    }
}
