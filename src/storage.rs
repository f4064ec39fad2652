//! Package storage.
//!
//! The styling cache resolves requests that name a package by id through a
//! [`PackageStore`]. Stores only hold well-formed packages.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use crate::error::{VizError, VizResult};
use crate::package::DataPackage;

fn lock_err(context: &'static str) -> VizError {
    VizError::storage(format!("poisoned lock: {context}"))
}

/// Storage contract for data packages.
///
/// Implementations must be safe to share between request threads.
pub trait PackageStore: Send + Sync {
    /// Stores a package, replacing any package with the same id.
    ///
    /// # Errors
    ///
    /// Returns `VizError::Invalid` for a package that fails validation.
    fn insert(&self, package: DataPackage) -> VizResult<Arc<DataPackage>>;

    fn get(&self, id: &str) -> VizResult<Option<Arc<DataPackage>>>;

    /// Removes a package, returning it if present.
    fn remove(&self, id: &str) -> VizResult<Option<Arc<DataPackage>>>;

    /// Stored ids in ascending order.
    fn ids(&self) -> VizResult<Vec<String>>;
}

/// Process-local store.
#[derive(Debug, Default)]
pub struct InMemoryPackageStore {
    packages: RwLock<BTreeMap<String, Arc<DataPackage>>>,
}

impl InMemoryPackageStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> VizResult<usize> {
        let packages = self.packages.read().map_err(|_| lock_err("package.len"))?;
        Ok(packages.len())
    }

    pub fn is_empty(&self) -> VizResult<bool> {
        Ok(self.len()? == 0)
    }
}

impl PackageStore for InMemoryPackageStore {
    fn insert(&self, package: DataPackage) -> VizResult<Arc<DataPackage>> {
        package.ensure_valid()?;
        let package = Arc::new(package);
        let mut packages = self.packages.write().map_err(|_| lock_err("package.insert"))?;
        if packages.insert(package.id.clone(), Arc::clone(&package)).is_some() {
            tracing::debug!(package_id = %package.id, "replaced stored package");
        }
        Ok(package)
    }

    fn get(&self, id: &str) -> VizResult<Option<Arc<DataPackage>>> {
        let packages = self.packages.read().map_err(|_| lock_err("package.get"))?;
        Ok(packages.get(id).cloned())
    }

    fn remove(&self, id: &str) -> VizResult<Option<Arc<DataPackage>>> {
        let mut packages = self.packages.write().map_err(|_| lock_err("package.remove"))?;
        Ok(packages.remove(id))
    }

    fn ids(&self) -> VizResult<Vec<String>> {
        let packages = self.packages.read().map_err(|_| lock_err("package.ids"))?;
        Ok(packages.keys().cloned().collect())
    }
}
