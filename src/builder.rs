//! Catalog builder: scan, extract, merge, embed.
//!
//! ```text
//! previous snapshot ──► compatibility gate
//!        │
//! source dirs ──► scanner ──► registry ──► validate ──► init_from ──► embed ──► CatalogMem
//! ```
//!
//! [`index_catalog_start`] runs everything up to the merge and reports which
//! items still need an embedding; [`index_catalog`] finishes the job. Only
//! items that changed since the previous snapshot are embedded again.
//!
//! # Errors
//!
//! - Compatibility problems with the previous snapshot fail before any
//!   file is read.
//! - Extraction errors are collected until `max_errs` is reached (`<= 0`
//!   means no limit), all logged, and the first one returned.
//! - Validation errors (empty or oversized description) fail immediately.
//! - Embedding errors are budgeted the same way, in a separate list.
//!
//! Files are visited in filesystem order, so when several files fail the
//! one reported first may differ between platforms.
//!
//! Nothing is written here; the caller persists the result with
//! [`CatalogMem::dump`] once the whole build has succeeded.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, error, info};

use agent_catalog_core::catalog::CatalogMem;
use agent_catalog_core::embedding::EmbeddingModel;
use agent_catalog_core::merge::{check_compatibility, check_embedding_model, init_from};
use agent_catalog_core::models::{CatalogDescriptor, CatalogKind, MetaVersion, VersionDescriptor};
use agent_catalog_core::{CatalogError, Result};

use crate::indexer::{IndexerRegistry, PathVersionFn};
use crate::progress::{IndexProgressEvent, IndexProgressReporter};
use crate::scanner::{scan_directories, ScanOptions};

/// Everything one index run needs besides its collaborators.
#[derive(Debug, Clone)]
pub struct IndexOptions {
    pub kind: CatalogKind,
    /// The `<kind>-catalog.json` file holding the previous snapshot.
    pub catalog_path: PathBuf,
    pub source_dirs: Vec<PathBuf>,
    pub scan: ScanOptions,
    /// Error budget for extraction and, separately, embedding.
    pub max_errs: i64,
    pub max_description_words: usize,
    pub meta_version: MetaVersion,
    /// Version recorded for the catalog as a whole.
    pub catalog_version: VersionDescriptor,
    pub project: String,
    pub cancel: Option<Arc<AtomicBool>>,
}

impl IndexOptions {
    fn cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    fn budget_exhausted(&self, errors: usize) -> bool {
        self.max_errs > 0 && errors as i64 >= self.max_errs
    }
}

/// Output of [`index_catalog_start`].
#[derive(Debug)]
pub struct IndexStart {
    /// The fresh catalog, with reusable items already copied in.
    pub catalog: CatalogDescriptor,
    /// Indices into `catalog.items` that still need an embedding.
    pub uninitialized: Vec<usize>,
    /// The snapshot that was on disk before this run, if any.
    pub previous: Option<CatalogDescriptor>,
}

fn log_all(what: &str, errors: &[CatalogError]) {
    for e in errors {
        error!("{}", e);
    }
    if errors.len() > 1 {
        error!(count = errors.len(), "{} failed", what);
    }
}

/// Scan, extract, validate, and merge with the previous snapshot.
pub fn index_catalog_start(
    options: &IndexOptions,
    model_name: &str,
    get_path_version: &PathVersionFn,
    progress: &dyn IndexProgressReporter,
) -> Result<IndexStart> {
    let kind = options.kind;

    let previous = if options.catalog_path.exists() {
        let previous = CatalogMem::load(&options.catalog_path)?.into_descriptor();
        check_compatibility(&previous, &options.meta_version)?;
        check_embedding_model(&previous, model_name)?;
        Some(previous)
    } else {
        None
    };

    for dir in &options.source_dirs {
        if !dir.is_dir() {
            return Err(CatalogError::NotFound(format!(
                "source directory {}",
                dir.display()
            )));
        }
    }

    let registry = IndexerRegistry::for_kind(kind)
        .map_err(|e| CatalogError::Validation(format!("{:#}", e)))?;
    let wanted = registry
        .globset()
        .map_err(|e| CatalogError::Validation(format!("{:#}", e)))?;

    progress.report(IndexProgressEvent::Discovering {
        kind: kind.to_string(),
    });
    let files = scan_directories(&options.source_dirs, &wanted, &options.scan)
        .map_err(|e| CatalogError::Validation(format!("{:#}", e)))?;

    let mut descriptors = Vec::new();
    let mut errors: Vec<CatalogError> = Vec::new();
    for (n, path) in files.enumerate() {
        if options.cancelled() {
            return Err(CatalogError::Cancelled);
        }
        if options.budget_exhausted(errors.len()) {
            break;
        }

        progress.report(IndexProgressEvent::Indexing {
            kind: kind.to_string(),
            path: path.display().to_string(),
            n: n as u64 + 1,
        });
        let (mut file_errors, found) = registry.start_descriptors(&path, get_path_version);
        debug!(path = %path.display(), items = found.len(), errors = file_errors.len(), "indexed file");

        if let Some(fatal) = file_errors.iter().position(|e| !e.is_keep_going()) {
            return Err(file_errors.swap_remove(fatal));
        }
        for descriptor in &found {
            descriptor.validate(options.max_description_words)?;
        }
        errors.extend(file_errors);
        descriptors.extend(found);
    }

    if !errors.is_empty() {
        log_all("indexing", &errors);
        return Err(errors.remove(0));
    }

    let mut catalog = CatalogDescriptor {
        schema_version: options.meta_version.schema_version.clone(),
        library_version: options.meta_version.library_version.clone(),
        kind,
        embedding_model: model_name.to_string(),
        version: options.catalog_version.clone(),
        source_dirs: options
            .source_dirs
            .iter()
            .map(|d| d.display().to_string())
            .collect(),
        project: options.project.clone(),
        items: descriptors,
    };
    let uninitialized = init_from(&mut catalog, previous.as_ref())?;

    info!(
        kind = %kind,
        items = catalog.items.len(),
        uninitialized = uninitialized.len(),
        "catalog scan complete"
    );
    Ok(IndexStart {
        catalog,
        uninitialized,
        previous,
    })
}

/// Build the full catalog: [`index_catalog_start`] then embed what is new.
pub async fn index_catalog(
    options: &IndexOptions,
    model: Arc<dyn EmbeddingModel>,
    get_path_version: &PathVersionFn<'_>,
    progress: &dyn IndexProgressReporter,
) -> Result<CatalogMem> {
    let IndexStart {
        mut catalog,
        uninitialized,
        ..
    } = index_catalog_start(options, model.name(), get_path_version, progress)?;

    let total = uninitialized.len() as u64;
    let mut errors: Vec<CatalogError> = Vec::new();
    for (n, &i) in uninitialized.iter().enumerate() {
        if options.cancelled() {
            return Err(CatalogError::Cancelled);
        }
        if options.budget_exhausted(errors.len()) {
            break;
        }
        progress.report(IndexProgressEvent::Embedding {
            kind: options.kind.to_string(),
            n: n as u64 + 1,
            total,
        });

        let item = &mut catalog.items[i];
        match model.encode(&item.description).await {
            Ok(vector) => item.embedding = Some(vector),
            Err(e) => errors.push(CatalogError::Embedding {
                name: item.identifier(),
                message: e.to_string(),
            }),
        }
    }

    if !errors.is_empty() {
        log_all("embedding", &errors);
        return Err(errors.remove(0));
    }

    CatalogMem::new(catalog).with_model(model)
}
