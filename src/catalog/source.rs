//! AR-012: Catalog sources. Loading is the one scoped, possibly-blocking init step.
//!
//! A source produces a compiled [`ModuleCatalog`] once. The result is wrapped
//! in an `Arc` and shared read-only with every resolver that needs it.

use super::{CatalogFormat, ModuleCatalog, BUNDLED_CATALOG};
use crate::error::CatalogError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Where a module catalog comes from.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Human-readable origin for logs and error messages.
    fn describe(&self) -> String;

    async fn load(&self) -> Result<ModuleCatalog, CatalogError>;
}

/// Catalog file on disk; format chosen by extension.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl CatalogSource for FileSource {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    async fn load(&self) -> Result<ModuleCatalog, CatalogError> {
        let format = CatalogFormat::from_path(&self.path)?;
        let text = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| CatalogError::Io {
                path: self.path.clone(),
                source,
            })?;
        ModuleCatalog::parse(&text, format)
    }
}

/// The catalog compiled into the binary.
#[derive(Debug, Clone, Copy, Default)]
pub struct BundledSource;

#[async_trait]
impl CatalogSource for BundledSource {
    fn describe(&self) -> String {
        "bundled".to_string()
    }

    async fn load(&self) -> Result<ModuleCatalog, CatalogError> {
        ModuleCatalog::parse(BUNDLED_CATALOG, CatalogFormat::Yaml)
    }
}

/// Pick a file source when a path is given, the bundled catalog otherwise.
pub fn source_for(path: Option<&Path>) -> Box<dyn CatalogSource> {
    match path {
        Some(p) => Box::new(FileSource::new(p)),
        None => Box::new(BundledSource),
    }
}

/// Load a catalog and wrap it for sharing.
pub async fn load_shared(source: &dyn CatalogSource) -> Result<Arc<ModuleCatalog>, CatalogError> {
    let catalog = source.load().await?;
    tracing::info!(
        source = %source.describe(),
        modules = catalog.len(),
        fingerprint = %catalog.fingerprint(),
        "module catalog loaded"
    );
    Ok(Arc::new(catalog))
}
