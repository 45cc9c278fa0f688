use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use saga_core::{SagaError, SagaResult, StoreMetadata};
use serde::Deserialize;
use tracing::{info, warn};

/// Catalog file name under the registry root.
const CATALOG_FILE: &str = "registry.json";
/// Default-pointer file name under the registry root.
const DEFAULT_FILE: &str = "default.txt";

/// Name that [`StoreRegistry::get`] resolves through the default precedence
/// rule instead of treating as a literal store name.
pub const DEFAULT_NAME: &str = "default";

/// Minimal row view used to count records in a backing file without
/// depending on the index implementation.
#[derive(Deserialize)]
struct RowId {
    #[allow(dead_code)]
    id: String,
}

/// Persistent registry mapping store names to [`StoreMetadata`].
///
/// The catalog is kept in a `BTreeMap`, so listing order and the
/// lexicographic default fallback are structural. Every mutating call
/// rewrites the whole catalog through a sibling temp file and an atomic
/// rename; a single writer is assumed — concurrent mutators are
/// last-writer-wins on the catalog file.
pub struct StoreRegistry {
    root: PathBuf,
    stores: BTreeMap<String, StoreMetadata>,
}

impl StoreRegistry {
    /// Opens (or initializes) the registry rooted at `root`.
    ///
    /// A malformed catalog file is recovered as an empty catalog with a
    /// warning rather than failing construction; prior registrations are
    /// lost but the registry stays usable.
    pub fn open(root: impl AsRef<Path>) -> SagaResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;

        let catalog = root.join(CATALOG_FILE);
        let stores = if catalog.exists() {
            let data = fs::read_to_string(&catalog)?;
            match serde_json::from_str::<BTreeMap<String, StoreMetadata>>(&data) {
                Ok(stores) => stores,
                Err(e) => {
                    warn!(
                        path = %catalog.display(),
                        error = %e,
                        "Could not load registry catalog, starting empty"
                    );
                    BTreeMap::new()
                }
            }
        } else {
            BTreeMap::new()
        };

        Ok(Self { root, stores })
    }

    /// Registers a new store under a unique name.
    ///
    /// Fails with [`SagaError::DuplicateName`] if the name is taken and
    /// [`SagaError::NotFound`] if the backing file does not exist. When
    /// `record_count` is omitted it is detected by reading the backing file
    /// ([`SagaError::CorruptData`] if unreadable). The catalog is persisted
    /// atomically before returning.
    pub fn register(
        &mut self,
        name: &str,
        path: impl AsRef<Path>,
        source_type: &str,
        description: Option<String>,
        record_count: Option<usize>,
    ) -> SagaResult<StoreMetadata> {
        let path = path.as_ref().to_path_buf();

        if self.stores.contains_key(name) {
            return Err(SagaError::DuplicateName(name.to_string()));
        }
        if !path.exists() {
            return Err(SagaError::NotFound(format!(
                "collection file not found: {}",
                path.display()
            )));
        }

        let record_count = match record_count {
            Some(count) => count,
            None => detect_record_count(&path)?,
        };

        let metadata = StoreMetadata {
            name: name.to_string(),
            path,
            created_at: Utc::now(),
            source_type: source_type.to_string(),
            record_count,
            description: description.unwrap_or_default(),
        };

        self.stores.insert(name.to_string(), metadata.clone());
        self.save_catalog()?;
        info!(store = name, records = record_count, "Registered store");

        Ok(metadata)
    }

    /// Looks up a store by name; `"default"` resolves through the default
    /// precedence rule (explicit pointer, then lexicographically first name,
    /// then [`SagaError::NoStores`]).
    pub fn get(&self, name: &str) -> SagaResult<StoreMetadata> {
        let resolved = if name == DEFAULT_NAME {
            self.get_default().ok_or(SagaError::NoStores)?
        } else {
            name.to_string()
        };

        self.stores.get(&resolved).cloned().ok_or_else(|| {
            let available = if self.stores.is_empty() {
                "none".to_string()
            } else {
                self.stores.keys().cloned().collect::<Vec<_>>().join(", ")
            };
            SagaError::NotFound(format!(
                "store '{resolved}' not in registry (available: {available})"
            ))
        })
    }

    /// Resolves the default store name.
    ///
    /// Precedence: the pointer file if it names a live entry, else the
    /// lexicographically first registered name, else `None`.
    pub fn get_default(&self) -> Option<String> {
        if let Some(pointer) = self.read_pointer() {
            if self.stores.contains_key(&pointer) {
                return Some(pointer);
            }
        }
        self.stores.keys().next().cloned()
    }

    /// Sets the default store pointer. Fails with [`SagaError::NotFound`]
    /// for unknown names; the pointer file is written atomically.
    pub fn set_default(&mut self, name: &str) -> SagaResult<()> {
        if !self.stores.contains_key(name) {
            return Err(SagaError::NotFound(format!(
                "store '{name}' not in registry"
            )));
        }
        self.write_pointer(name)
    }

    /// Renames a registered store.
    ///
    /// Fails with [`SagaError::NotFound`] if `old` is unknown and
    /// [`SagaError::DuplicateName`] if `new` is taken. If `old` was the
    /// default, the pointer follows the rename.
    pub fn rename(&mut self, old: &str, new: &str) -> SagaResult<()> {
        if !self.stores.contains_key(old) {
            return Err(SagaError::NotFound(format!("store '{old}' not in registry")));
        }
        if self.stores.contains_key(new) {
            return Err(SagaError::DuplicateName(new.to_string()));
        }

        let was_default = self.get_default().as_deref() == Some(old);

        let mut metadata = self
            .stores
            .remove(old)
            .ok_or_else(|| SagaError::NotFound(format!("store '{old}' not in registry")))?;
        metadata.name = new.to_string();
        self.stores.insert(new.to_string(), metadata);
        self.save_catalog()?;

        if was_default {
            self.write_pointer(new)?;
        }
        info!(old, new, "Renamed store");
        Ok(())
    }

    /// Removes a store from the catalog. The backing file is untouched —
    /// this is unregistration, not deletion.
    ///
    /// A pointer naming the removed store is cleared so the default falls
    /// back to the precedence rule.
    pub fn delete(&mut self, name: &str) -> SagaResult<()> {
        if self.stores.remove(name).is_none() {
            return Err(SagaError::NotFound(format!(
                "store '{name}' not in registry"
            )));
        }
        self.save_catalog()?;

        if self.read_pointer().as_deref() == Some(name) {
            let pointer = self.root.join(DEFAULT_FILE);
            if pointer.exists() {
                fs::remove_file(pointer)?;
            }
        }
        info!(store = name, "Unregistered store (backing file kept)");
        Ok(())
    }

    /// All registered stores, sorted by name. Deterministic ordering is part
    /// of the contract.
    pub fn list(&self) -> Vec<StoreMetadata> {
        self.stores.values().cloned().collect()
    }

    /// Number of registered stores.
    pub fn len(&self) -> usize {
        self.stores.len()
    }

    /// Whether the registry holds no stores.
    pub fn is_empty(&self) -> bool {
        self.stores.is_empty()
    }

    /// The registry root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn read_pointer(&self) -> Option<String> {
        let pointer = self.root.join(DEFAULT_FILE);
        let content = fs::read_to_string(pointer).ok()?;
        let name = content.trim();
        if name.is_empty() {
            None
        } else {
            Some(name.to_string())
        }
    }

    fn write_pointer(&self, name: &str) -> SagaResult<()> {
        let pointer = self.root.join(DEFAULT_FILE);
        let tmp = pointer.with_extension("tmp");
        fs::write(&tmp, name)?;
        fs::rename(&tmp, pointer)?;
        Ok(())
    }

    /// Serializes the whole catalog to a sibling temp file and renames it
    /// over the canonical file, so readers never see a torn catalog.
    fn save_catalog(&self) -> SagaResult<()> {
        let catalog = self.root.join(CATALOG_FILE);
        let data = serde_json::to_string_pretty(&self.stores)?;
        let tmp = catalog.with_extension("tmp");
        fs::write(&tmp, data)?;
        fs::rename(&tmp, catalog)?;
        Ok(())
    }
}

/// Counts records in a backing file by parsing each line's id field.
fn detect_record_count(path: &Path) -> SagaResult<usize> {
    let data = fs::read_to_string(path)?;
    let mut count = 0usize;
    for (lineno, line) in data.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        serde_json::from_str::<RowId>(line).map_err(|e| {
            SagaError::CorruptData(format!(
                "could not read collection file {} (line {}): {}",
                path.display(),
                lineno + 1,
                e
            ))
        })?;
        count += 1;
    }
    Ok(count)
}
