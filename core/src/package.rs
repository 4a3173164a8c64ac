//! Packaged containers (`.tdsx`, `.twbx`) and collision-safe saving.
//!
//! Opening extracts the single top-level working document into a scratch
//! directory and hands it to the document model; every other member is only
//! indexed. Saving renders the document, writes a new archive under a fresh
//! filename, and copies untouched members byte-for-byte from the source.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use thiserror::Error;
use zip::ZipWriter;
use zip::write::FileOptions;

use crate::config::{ConfigError, PackageConfig};
use crate::container::{ContainerError, ZipContainer};
use crate::datasource::Datasource;
use crate::error::DocumentError;
use crate::error_codes;
use crate::extract::ExtractGenerator;
use crate::serializer::{GeneratedExtract, RenderContext, render};
use crate::workbook::Workbook;

/// Working-document member extensions, in lookup order.
const DOCUMENT_EXTENSIONS: &[&str] = &["tds", "twb"];

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PackageError {
    #[error("container error: {0}")]
    Container(#[from] ContainerError),
    #[error("document error: {0}")]
    Document(#[from] DocumentError),
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("[TABDOC_PKG_010] archive has no top-level .tds or .twb document")]
    MissingDocument,
    #[error("[TABDOC_PKG_011] archive has more than one top-level document: {names:?}")]
    AmbiguousDocument { names: Vec<String> },
    #[error("[TABDOC_PKG_012] no free filename for '{base}' within the probe limit")]
    NamesExhausted { base: String },
    #[error("[TABDOC_PKG_013] I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl PackageError {
    pub fn code(&self) -> &'static str {
        match self {
            PackageError::Container(err) => err.code(),
            PackageError::Document(err) => err.code(),
            PackageError::Config(err) => err.code(),
            PackageError::MissingDocument => error_codes::PACKAGE_MISSING_DOCUMENT,
            PackageError::AmbiguousDocument { .. } => error_codes::PACKAGE_AMBIGUOUS_DOCUMENT,
            PackageError::NamesExhausted { .. } => error_codes::PACKAGE_NAMES_EXHAUSTED,
            PackageError::Io { .. } => error_codes::PACKAGE_IO,
        }
    }

    fn io(path: &Path, source: std::io::Error) -> Self {
        PackageError::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageState {
    Opened,
    Mutated,
    Saved,
    CleanedUp,
}

/// The document a package wraps.
#[derive(Debug, Clone)]
pub enum WorkingDocument {
    Datasource(Datasource),
    Workbook(Workbook),
}

/// A scratch directory, and whether this package created it.
#[derive(Debug)]
struct ScratchDir {
    path: PathBuf,
    created: bool,
}

impl ScratchDir {
    fn acquire(path: PathBuf) -> Result<Self, PackageError> {
        let created = !path.exists();
        std::fs::create_dir_all(&path).map_err(|e| PackageError::io(&path, e))?;
        if created {
            log::debug!("created scratch directory {}", path.display());
        }
        Ok(Self { path, created })
    }

    /// Removes the directory if this package created it; otherwise only the
    /// listed files are removed.
    fn release(self, files: &[PathBuf]) {
        if self.created {
            if let Err(err) = std::fs::remove_dir_all(&self.path) {
                log::warn!("failed to remove scratch directory {}: {err}", self.path.display());
            }
            return;
        }
        for file in files {
            if file.exists()
                && let Err(err) = std::fs::remove_file(file)
            {
                log::warn!("failed to remove scratch file {}: {err}", file.display());
            }
        }
    }
}

pub struct DocumentPackage {
    source_path: PathBuf,
    working_dir: PathBuf,
    config: PackageConfig,
    container: ZipContainer,
    document_member: String,
    document: WorkingDocument,
    other_members: Vec<String>,
    replacements: BTreeMap<String, PathBuf>,
    scratch: Option<ScratchDir>,
    state: PackageState,
}

impl DocumentPackage {
    /// Opens `path`, saving later into `working_dir`.
    pub fn open(path: &Path, working_dir: &Path) -> Result<Self, PackageError> {
        Self::open_with_config(path, working_dir, PackageConfig::default())
    }

    pub fn open_with_config(
        path: &Path,
        working_dir: &Path,
        config: PackageConfig,
    ) -> Result<Self, PackageError> {
        config.validate()?;
        let mut container = ZipContainer::open_from_path_with_limits(path, config.limits)?;

        let mut candidates: Vec<String> = DOCUMENT_EXTENSIONS
            .iter()
            .flat_map(|ext| container.top_level_members_with_extension(ext))
            .collect();
        let document_member = match candidates.len() {
            0 => return Err(PackageError::MissingDocument),
            1 => candidates.remove(0),
            _ => return Err(PackageError::AmbiguousDocument { names: candidates }),
        };
        let other_members: Vec<String> = container
            .member_names()
            .iter()
            .filter(|name| **name != document_member)
            .cloned()
            .collect();

        let scratch = ScratchDir::acquire(
            working_dir.join(format!("{}{}", config.scratch_prefix, file_stem(path))),
        )?;
        let extracted = scratch.path.join(&document_member);
        let document = match load_working_document(&mut container, &document_member, &extracted) {
            Ok(document) => document,
            Err(err) => {
                scratch.release(&[extracted]);
                return Err(err);
            }
        };
        log::info!(
            "opened {} (document {document_member}, {} other member(s))",
            path.display(),
            other_members.len()
        );

        Ok(Self {
            source_path: path.to_path_buf(),
            working_dir: working_dir.to_path_buf(),
            config,
            container,
            document_member,
            document,
            other_members,
            replacements: BTreeMap::new(),
            scratch: Some(scratch),
            state: PackageState::Opened,
        })
    }

    pub fn state(&self) -> PackageState {
        self.state
    }

    pub fn document_member(&self) -> &str {
        &self.document_member
    }

    /// Archive paths of every member other than the working document.
    pub fn other_members(&self) -> &[String] {
        &self.other_members
    }

    pub fn document(&self) -> &WorkingDocument {
        &self.document
    }

    pub fn document_mut(&mut self) -> &mut WorkingDocument {
        self.state = PackageState::Mutated;
        &mut self.document
    }

    pub fn datasource_mut(&mut self) -> Option<&mut Datasource> {
        match self.document_mut() {
            WorkingDocument::Datasource(ds) => Some(ds),
            WorkingDocument::Workbook(_) => None,
        }
    }

    pub fn workbook_mut(&mut self) -> Option<&mut Workbook> {
        match self.document_mut() {
            WorkingDocument::Workbook(wb) => Some(wb),
            WorkingDocument::Datasource(_) => None,
        }
    }

    /// Replaces the bytes of `archive_path` with the contents of `local` on the
    /// next save. A later call for the same path wins. The working document is
    /// always written from the model and cannot be replaced.
    pub fn queue_replacement(
        &mut self,
        archive_path: &str,
        local: impl Into<PathBuf>,
    ) -> Result<(), PackageError> {
        if archive_path == self.document_member {
            return Err(DocumentError::config(
                "archive_path",
                archive_path,
                "the working document is rendered from the model",
            )
            .into());
        }
        let local = local.into();
        if let Some(previous) = self.replacements.insert(archive_path.to_string(), local) {
            log::debug!(
                "replacement for {archive_path} supersedes {}",
                previous.display()
            );
        }
        self.state = PackageState::Mutated;
        Ok(())
    }

    pub fn replacements(&self) -> &BTreeMap<String, PathBuf> {
        &self.replacements
    }

    /// Writes a new archive next to nothing existing, then cleans up scratch
    /// directories this package created. Returns the path written.
    ///
    /// Output names are probed as `Stem.ext`, `Stem (1).ext`, ... in the
    /// working directory. Probing and creation are not atomic across
    /// processes; creation fails rather than overwrite if another writer wins.
    pub fn save(&mut self, generator: &mut dyn ExtractGenerator) -> Result<PathBuf, PackageError> {
        let scratch = match self.scratch.take() {
            Some(scratch) => scratch,
            None => ScratchDir::acquire(self.working_dir.join(format!(
                "{}{}",
                self.config.scratch_prefix,
                file_stem(&self.source_path)
            )))?,
        };

        let result = self.write_archive(generator, &scratch.path);
        let leftovers = vec![scratch.path.join(&self.document_member)];
        scratch.release(&leftovers);
        let output = result?;

        self.state = PackageState::CleanedUp;
        log::info!("saved {}", output.display());
        Ok(output)
    }

    fn write_archive(
        &mut self,
        generator: &mut dyn ExtractGenerator,
        scratch_dir: &Path,
    ) -> Result<PathBuf, PackageError> {
        let mut ctx = RenderContext {
            generator,
            scratch_dir,
            extract_dir: &self.config.extract_dir,
        };
        let (text, extracts): (String, Vec<GeneratedExtract>) = match &self.document {
            WorkingDocument::Datasource(ds) => {
                let rendered = render(ds, &mut ctx)?;
                (rendered.text, rendered.extract.into_iter().collect())
            }
            WorkingDocument::Workbook(wb) => {
                let rendered = wb.render(&mut ctx)?;
                (rendered.text, rendered.extracts)
            }
        };

        let output = allocate_output_path(
            &self.working_dir,
            file_stem(&self.source_path),
            file_extension(&self.source_path),
            self.config.max_name_probes,
        )?;
        let file = create_new(&output)?;
        let mut writer = ZipWriter::new(file);
        let options = FileOptions::default().compression_method(self.config.compression.method());

        writer
            .start_file(self.document_member.as_str(), options)
            .map_err(|e| ContainerError::Zip(e.to_string()))?;
        writer
            .write_all(text.as_bytes())
            .map_err(|e| PackageError::io(&output, e))?;

        let generated_paths: Vec<&str> = extracts.iter().map(|e| e.archive_path.as_str()).collect();
        for name in &self.other_members {
            if generated_paths.contains(&name.as_str()) {
                log::debug!("{name} is superseded by a generated extract");
                continue;
            }
            let copied = match self.replacements.get(name) {
                Some(local) => stream_local_file(&mut writer, name, local, options),
                None => copy_original_member(&mut self.container, &mut writer, name),
            };
            if let Err(err) = copied {
                log::warn!("skipping member {name}: {err}");
            }
        }

        for (name, local) in &self.replacements {
            if self.other_members.contains(name) || generated_paths.contains(&name.as_str()) {
                continue;
            }
            if let Err(err) = stream_local_file(&mut writer, name, local, options) {
                log::warn!("skipping new member {name}: {err}");
            }
        }

        for extract in &extracts {
            stream_local_file(&mut writer, &extract.archive_path, &extract.local_path, options)
                .map_err(|e| PackageError::io(&extract.local_path, e))?;
            if let Err(err) = std::fs::remove_file(&extract.local_path) {
                log::warn!(
                    "failed to remove temporary extract {}: {err}",
                    extract.local_path.display()
                );
            }
        }

        writer
            .finish()
            .map_err(|e| ContainerError::Zip(e.to_string()))?;
        self.state = PackageState::Saved;
        Ok(output)
    }
}

/// Extracts the working document to `extracted` and loads it.
fn load_working_document(
    container: &mut ZipContainer,
    member: &str,
    extracted: &Path,
) -> Result<WorkingDocument, PackageError> {
    let bytes = container.read_file_checked(member)?;
    std::fs::write(extracted, &bytes).map_err(|e| PackageError::io(extracted, e))?;
    if member.to_ascii_lowercase().ends_with(".twb") {
        Ok(WorkingDocument::Workbook(Workbook::load_from_path(extracted)?))
    } else {
        Ok(WorkingDocument::Datasource(Datasource::load_from_path(extracted)?))
    }
}

fn copy_original_member(
    container: &mut ZipContainer,
    writer: &mut ZipWriter<File>,
    name: &str,
) -> std::io::Result<()> {
    let file = container
        .archive
        .by_name(name)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;
    writer
        .raw_copy_file(file)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))
}

fn stream_local_file(
    writer: &mut ZipWriter<File>,
    name: &str,
    local: &Path,
    options: FileOptions,
) -> std::io::Result<()> {
    let mut source = File::open(local)?;
    writer
        .start_file(name, options)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
    std::io::copy(&mut source, writer)?;
    Ok(())
}

fn create_new(path: &Path) -> Result<File, PackageError> {
    OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|e| PackageError::io(path, e))
}

fn file_stem(path: &Path) -> &str {
    path.file_stem().and_then(|s| s.to_str()).unwrap_or("document")
}

fn file_extension(path: &Path) -> &str {
    path.extension().and_then(|s| s.to_str()).unwrap_or("")
}

fn candidate_name(stem: &str, extension: &str, ordinal: u32) -> String {
    let base = if ordinal == 0 {
        stem.to_string()
    } else {
        format!("{stem} ({ordinal})")
    };
    if extension.is_empty() {
        base
    } else {
        format!("{base}.{extension}")
    }
}

/// First of `stem.ext`, `stem (1).ext`, ... that does not exist in `dir`.
pub fn allocate_output_path(
    dir: &Path,
    stem: &str,
    extension: &str,
    max_probes: u32,
) -> Result<PathBuf, PackageError> {
    (0..=max_probes)
        .map(|ordinal| dir.join(candidate_name(stem, extension, ordinal)))
        .find(|candidate| !candidate.exists())
        .ok_or_else(|| PackageError::NamesExhausted {
            base: candidate_name(stem, extension, 0),
        })
}

/// Writes an unpackaged document into `dir`, never overwriting an existing
/// file. Returns the path written.
pub fn save_document(text: &str, dir: &Path, file_name: &str) -> Result<PathBuf, PackageError> {
    let requested = Path::new(file_name);
    let output = allocate_output_path(
        dir,
        file_stem(requested),
        file_extension(requested),
        PackageConfig::default().max_name_probes,
    )?;
    let mut file = create_new(&output)?;
    file.write_all(text.as_bytes())
        .map_err(|e| PackageError::io(&output, e))?;
    log::debug!("wrote {}", output.display());
    Ok(output)
}
