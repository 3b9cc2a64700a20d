use std::fs;
use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tempfile::{Builder, TempDir};
use tracing::{debug, info};

use crate::aggregate::Aggregation;
use crate::domain::{CountryDocument, CountryIndexEntry};
use crate::error::ElprisError;

pub const COUNTRY_TABLE: &str = "country_data";
pub const INDEX_TABLE: &str = "available_countries";
pub const INDEX_KEY: &str = "same_id_always";

/// File-backed document store: one JSON file per key, one directory per
/// table. Each file is replaced as a whole, so readers see either the old or
/// the new document.
#[derive(Debug, Clone)]
pub struct Store {
    root: Utf8PathBuf,
}

impl Store {
    pub fn new(root: Utf8PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn ensure_root(&self) -> Result<(), ElprisError> {
        fs::create_dir_all(self.root.as_std_path())
            .map_err(|err| ElprisError::Filesystem(err.to_string()))
    }

    pub fn document_path(&self, table: &str, key: &str) -> Utf8PathBuf {
        self.root
            .join(table)
            .join(format!("{}.json", encode_key(key)))
    }

    /// Raw stored text for `key`, `None` when absent.
    pub fn get_raw(&self, table: &str, key: &str) -> Result<Option<String>, ElprisError> {
        let path = self.document_path(table, key);
        match fs::read_to_string(path.as_std_path()) {
            Ok(content) => Ok(Some(content)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(ElprisError::Filesystem(format!("read {path}: {err}"))),
        }
    }

    fn get_document<T: DeserializeOwned>(&self, table: &str, key: &str) -> Result<T, ElprisError> {
        let content = self
            .get_raw(table, key)?
            .ok_or_else(|| ElprisError::DocumentNotFound(format!("{table}/{key}")))?;
        serde_json::from_str(&content).map_err(|err| ElprisError::CorruptDocument {
            key: format!("{table}/{key}"),
            message: err.to_string(),
        })
    }

    pub fn country(&self, name: &str) -> Result<CountryDocument, ElprisError> {
        self.get_document(COUNTRY_TABLE, name)
    }

    pub fn country_index(&self) -> Result<Vec<CountryIndexEntry>, ElprisError> {
        self.get_document(INDEX_TABLE, INDEX_KEY)
    }

    /// Starts a unit of work. Nothing becomes visible until
    /// [`UnitOfWork::commit`]; dropping it discards every staged write.
    pub fn begin(&self) -> Result<UnitOfWork<'_>, ElprisError> {
        self.ensure_root()?;
        let staging = Builder::new()
            .prefix(".elpris-uow")
            .tempdir_in(self.root.as_std_path())
            .map_err(|err| ElprisError::StoreWrite(err.to_string()))?;
        Ok(UnitOfWork {
            store: self,
            staging,
            staged: Vec::new(),
            next_id: 0,
        })
    }
}

pub struct UnitOfWork<'a> {
    store: &'a Store,
    staging: TempDir,
    staged: Vec<StagedDocument>,
    next_id: usize,
}

struct StagedDocument {
    table: String,
    key: String,
    file_name: String,
}

impl UnitOfWork<'_> {
    /// Stages `value` under `table`/`key`; a later stage of the same key wins.
    pub fn upsert<T: Serialize + ?Sized>(
        &mut self,
        table: &str,
        key: &str,
        value: &T,
    ) -> Result<(), ElprisError> {
        let content =
            serde_json::to_vec(value).map_err(|err| ElprisError::Serialize(err.to_string()))?;
        let file_name = format!("{}.{}", self.next_id, encode_key(key));
        self.next_id += 1;
        fs::write(self.staging.path().join(&file_name), &content)
            .map_err(|err| ElprisError::StoreWrite(format!("stage {table}/{key}: {err}")))?;
        self.staged.retain(|doc| !(doc.table == table && doc.key == key));
        self.staged.push(StagedDocument {
            table: table.to_string(),
            key: key.to_string(),
            file_name,
        });
        Ok(())
    }

    pub fn upsert_country(&mut self, country: &CountryDocument) -> Result<(), ElprisError> {
        self.upsert(COUNTRY_TABLE, &country.name, country)
    }

    pub fn upsert_index(&mut self, index: &[CountryIndexEntry]) -> Result<(), ElprisError> {
        self.upsert(INDEX_TABLE, INDEX_KEY, index)
    }

    pub fn len(&self) -> usize {
        self.staged.len()
    }

    pub fn is_empty(&self) -> bool {
        self.staged.is_empty()
    }

    /// Publishes staged documents one atomic rename at a time. A failure
    /// stops publishing; documents already renamed stay in place.
    pub fn commit(self) -> Result<usize, ElprisError> {
        let mut published = 0;
        for doc in &self.staged {
            let target = self.store.document_path(&doc.table, &doc.key);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent.as_std_path())
                    .map_err(|err| ElprisError::StoreWrite(err.to_string()))?;
            }
            fs::rename(self.staging.path().join(&doc.file_name), target.as_std_path())
                .map_err(|err| {
                    ElprisError::StoreWrite(format!("publish {}/{}: {err}", doc.table, doc.key))
                })?;
            debug!(table = %doc.table, key = %doc.key, "document published");
            published += 1;
        }
        Ok(published)
    }

    pub fn rollback(self) {
        debug!(staged = self.staged.len(), "unit of work rolled back");
    }
}

/// Writes every country document and the index from one aggregation pass in
/// a single unit of work.
pub fn persist_aggregation(store: &Store, aggregation: &Aggregation) -> Result<usize, ElprisError> {
    let mut uow = store.begin()?;
    for country in &aggregation.countries {
        if let Err(err) = uow.upsert_country(country) {
            uow.rollback();
            return Err(err);
        }
    }
    if let Err(err) = uow.upsert_index(&aggregation.index) {
        uow.rollback();
        return Err(err);
    }
    let published = uow.commit()?;
    info!(documents = published, "store updated");
    Ok(published)
}

/// File-name safe form of a key. Characters outside `[A-Za-z0-9 _-]` are
/// written as `%XX` per UTF-8 byte, so distinct keys never collide.
pub fn encode_key(key: &str) -> String {
    let mut encoded = String::with_capacity(key.len());
    for byte in key.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b' ' | b'_' | b'-' => {
                encoded.push(byte as char)
            }
            other => encoded.push_str(&format!("%{other:02X}")),
        }
    }
    encoded
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_escaped() {
        assert_eq!(encode_key("UNITED KINGDOM"), "UNITED KINGDOM");
        assert_eq!(encode_key("a/b"), "a%2Fb");
        assert_eq!(encode_key("50%"), "50%25");
        assert_eq!(encode_key(".."), "%2E%2E");
        assert_eq!(encode_key("Å"), "%C3%85");
    }

    #[test]
    fn layout_paths() {
        let store = Store::new(Utf8PathBuf::from("/srv/elpris"));
        assert_eq!(
            store.document_path(COUNTRY_TABLE, "SWEDEN"),
            Utf8PathBuf::from("/srv/elpris/country_data/SWEDEN.json")
        );
        assert_eq!(
            store.document_path(INDEX_TABLE, INDEX_KEY),
            Utf8PathBuf::from("/srv/elpris/available_countries/same_id_always.json")
        );
    }
}
