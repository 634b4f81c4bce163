//! Incremental merge of a fresh scan with the previous snapshot.
//!
//! An item from the fresh scan inherits every field of its predecessor,
//! embedding included, only when all of these hold:
//!
//! 1. the previous snapshot has an item with the same `source:name`,
//! 2. the fresh item is not dirty,
//! 3. both carry the same version identifier.
//!
//! Everything else is returned as uninitialized and must be embedded again.

use std::cmp::Ordering;
use std::collections::HashMap;

use tracing::debug;

use crate::error::{CatalogError, Result};
use crate::models::{CatalogDescriptor, MetaVersion, RecordDescriptor};
use crate::version::{compare_lib_versions, compare_schema_versions};

/// Reject a previous snapshot written by a newer schema or library.
pub fn check_compatibility(previous: &CatalogDescriptor, running: &MetaVersion) -> Result<()> {
    if compare_schema_versions(&previous.schema_version, &running.schema_version)?
        == Ordering::Greater
    {
        return Err(CatalogError::Compatibility(format!(
            "The local {} catalog has schema version {}, which is newer than the supported {}.",
            previous.kind, previous.schema_version, running.schema_version
        )));
    }
    if compare_lib_versions(&previous.library_version, &running.library_version)?
        == Ordering::Greater
    {
        return Err(CatalogError::Compatibility(format!(
            "The local {} catalog was written by library version {}, which is newer than {}.",
            previous.kind, previous.library_version, running.library_version
        )));
    }
    Ok(())
}

/// Reject a previous snapshot embedded with a different model.
pub fn check_embedding_model(previous: &CatalogDescriptor, requested: &str) -> Result<()> {
    if previous.embedding_model != requested {
        return Err(CatalogError::Compatibility(format!(
            "The local {} catalog was embedded with '{}' but '{}' was requested.",
            previous.kind, previous.embedding_model, requested
        )));
    }
    Ok(())
}

fn reusable(fresh: &RecordDescriptor, previous: &RecordDescriptor) -> bool {
    !fresh.version.is_dirty()
        && fresh.version.identifier().is_some()
        && previous.version.identifier() == fresh.version.identifier()
}

/// Copy reusable items from `previous` into `next`.
///
/// Returns the indices into `next.items` that still need embedding. With
/// no previous snapshot every item is uninitialized.
pub fn init_from(
    next: &mut CatalogDescriptor,
    previous: Option<&CatalogDescriptor>,
) -> Result<Vec<usize>> {
    let Some(previous) = previous else {
        return Ok((0..next.items.len()).collect());
    };

    let running = MetaVersion {
        schema_version: next.schema_version.clone(),
        library_version: next.library_version.clone(),
    };
    check_compatibility(previous, &running)?;

    let by_key: HashMap<String, &RecordDescriptor> = previous
        .items
        .iter()
        .map(|item| (item.source_name(), item))
        .collect();

    let mut uninitialized = Vec::new();
    for (i, item) in next.items.iter_mut().enumerate() {
        match by_key.get(&item.source_name()) {
            Some(prev) if reusable(item, prev) => {
                debug!(item = %item.identifier(), "reusing previous descriptor");
                *item = (*prev).clone();
            }
            _ => uninitialized.push(i),
        }
    }
    Ok(uninitialized)
}
