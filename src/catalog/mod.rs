use ahash::AHashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{DbError, DbResult};
use crate::file::TableId;
use crate::heap::{HeapFile, PageStore};
use crate::record::{ColumnDef, TableSchema};

const CATALOG_FILE: &str = "catalog.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableMetadata {
    pub id: TableId,
    pub name: String,
    /// Heap file name, relative to the database directory
    pub file: String,
    pub columns: Vec<ColumnDef>,
}

impl TableMetadata {
    pub fn schema(&self) -> TableSchema {
        TableSchema::new(self.columns.clone())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogMetadata {
    /// Page size every heap file of this database was written with
    pub page_size: usize,
    pub next_table_id: u32,
    pub tables: Vec<TableMetadata>,
}

impl CatalogMetadata {
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size,
            next_table_id: 0,
            tables: Vec::new(),
        }
    }

    pub fn load(dir: &Path) -> DbResult<Self> {
        let content = fs::read_to_string(dir.join(CATALOG_FILE))?;
        let metadata = serde_json::from_str(&content)?;
        Ok(metadata)
    }

    pub fn save(&self, dir: &Path) -> DbResult<()> {
        let content = serde_json::to_string_pretty(&self)?;
        fs::write(dir.join(CATALOG_FILE), content)?;
        Ok(())
    }

    pub fn get_table(&self, name: &str) -> DbResult<&TableMetadata> {
        self.tables
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| DbError::TableNotFound(name.to_string()))
    }
}

struct CatalogState {
    metadata: CatalogMetadata,
    stores: AHashMap<TableId, Arc<dyn PageStore>>,
}

/// Resolves table ids to their page stores and keeps the table list on disk
pub struct Catalog {
    dir: PathBuf,
    page_size: usize,
    state: RwLock<CatalogState>,
}

impl Catalog {
    /// Open the catalog in `dir`, creating an empty one if none exists, and
    /// reattach every table's heap file.
    pub fn open<P: AsRef<Path>>(dir: P, page_size: usize) -> DbResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let metadata = if dir.join(CATALOG_FILE).exists() {
            CatalogMetadata::load(&dir)?
        } else {
            let metadata = CatalogMetadata::new(page_size);
            metadata.save(&dir)?;
            metadata
        };
        if metadata.page_size != page_size {
            return Err(DbError::InvalidConfig(format!(
                "database in {} uses {}-byte pages, configured page_size is {page_size}",
                dir.display(),
                metadata.page_size
            )));
        }

        let mut stores: AHashMap<TableId, Arc<dyn PageStore>> = AHashMap::new();
        for table in &metadata.tables {
            let heap = HeapFile::open(
                table.id,
                dir.join(&table.file),
                page_size,
                Arc::new(table.schema()),
            )?;
            stores.insert(table.id, Arc::new(heap));
        }

        Ok(Self {
            dir,
            page_size,
            state: RwLock::new(CatalogState { metadata, stores }),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn create_table(&self, name: &str, columns: Vec<ColumnDef>) -> DbResult<TableId> {
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(DbError::Catalog(format!("invalid table name: {name:?}")));
        }
        if columns.is_empty() {
            return Err(DbError::Catalog(format!("table {name} has no columns")));
        }

        let mut state = self.state.write();
        if state.metadata.tables.iter().any(|t| t.name == name) {
            return Err(DbError::TableExists(name.to_string()));
        }

        let id = TableId(state.metadata.next_table_id);
        let file = format!("{name}.heap");
        let heap = HeapFile::create(
            id,
            self.dir.join(&file),
            self.page_size,
            Arc::new(TableSchema::new(columns.clone())),
        )?;

        let mut metadata = state.metadata.clone();
        metadata.next_table_id += 1;
        metadata.tables.push(TableMetadata {
            id,
            name: name.to_string(),
            file: file.clone(),
            columns,
        });
        if let Err(e) = metadata.save(&self.dir) {
            drop(heap);
            if let Err(remove) = fs::remove_file(self.dir.join(&file)) {
                warn!(%file, error = %remove, "failed to remove heap file of uncreated table");
            }
            return Err(e);
        }
        state.metadata = metadata;
        state.stores.insert(id, Arc::new(heap));

        info!(table = name, %id, "created table");
        Ok(id)
    }

    pub fn table_id(&self, name: &str) -> DbResult<TableId> {
        Ok(self.state.read().metadata.get_table(name)?.id)
    }

    pub fn table(&self, name: &str) -> DbResult<TableMetadata> {
        Ok(self.state.read().metadata.get_table(name)?.clone())
    }

    pub fn tables(&self) -> Vec<TableMetadata> {
        self.state.read().metadata.tables.clone()
    }

    /// The page store backing `table`
    pub fn store(&self, table: TableId) -> DbResult<Arc<dyn PageStore>> {
        self.state
            .read()
            .stores
            .get(&table)
            .cloned()
            .ok_or(DbError::UnknownTable(table))
    }

    pub fn schema(&self, table: TableId) -> DbResult<Arc<TableSchema>> {
        Ok(Arc::clone(self.store(table)?.schema()))
    }

    pub fn sync_all(&self) -> DbResult<()> {
        for store in self.state.read().stores.values() {
            store.sync()?;
        }
        Ok(())
    }
}
