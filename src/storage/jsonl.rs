//! JSONL (JSON Lines) storage.
//!
//! JSONL files are the source of truth for the on-disk store.
//! Each line is a valid JSON object representing one entity.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::marker::PhantomData;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::{
    distinct_users, filter_names, mean_rating, resolve_references, StorageConfig, StorageError,
    Store,
};
use crate::models::{
    upsert_into, MergePolicy, NameQuery, NameRecord, RatingRecord, SelectionEvent, UserScope,
    Visibility,
};

/// Entity types for JSONL storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityType {
    Name,
    Rating,
    Selection,
}

impl EntityType {
    /// Get the filename for this entity type.
    pub fn filename(&self) -> &'static str {
        match self {
            EntityType::Name => "names.jsonl",
            EntityType::Rating => "ratings.jsonl",
            EntityType::Selection => "selections.jsonl",
        }
    }

    /// Path of this entity's file under the data directory.
    pub fn path(&self, config: &StorageConfig) -> PathBuf {
        let dir = match self {
            EntityType::Name => config.catalog_dir(),
            EntityType::Rating | EntityType::Selection => config.activity_dir(),
        };
        dir.join(self.filename())
    }
}

/// JSONL file writer.
pub struct JsonlWriter<T> {
    path: PathBuf,
    _marker: PhantomData<T>,
}

impl<T: Serialize> JsonlWriter<T> {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            _marker: PhantomData,
        }
    }

    pub fn for_entity(config: &StorageConfig, entity: EntityType) -> Self {
        Self::new(entity.path(config))
    }

    fn ensure_dir(&self) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(())
    }

    /// Append multiple entities to the file.
    pub fn append_batch(&self, entities: &[T]) -> Result<usize, StorageError> {
        if entities.is_empty() {
            return Ok(0);
        }

        self.ensure_dir()?;

        // Serialize everything first so a bad entity never leaves a partial batch.
        let mut buf = String::new();
        for entity in entities {
            buf.push_str(&serde_json::to_string(entity)?);
            buf.push('\n');
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(buf.as_bytes())?;
        writer.flush()?;

        info!("Appended {} entities to {:?}", entities.len(), self.path);
        Ok(entities.len())
    }

    /// Replace the file's contents with `entities`.
    ///
    /// Writes to a sibling temp file and renames it over the target, so
    /// readers see either the old or the new contents.
    pub fn write_all(&self, entities: &[T]) -> Result<usize, StorageError> {
        self.ensure_dir()?;

        let tmp_path = self.path.with_extension("jsonl.tmp");
        {
            let file = File::create(&tmp_path)?;
            let mut writer = BufWriter::new(file);
            for entity in entities {
                let json = serde_json::to_string(entity)?;
                writeln!(writer, "{}", json)?;
            }
            writer.flush()?;
        }
        fs::rename(&tmp_path, &self.path)?;

        info!("Wrote {} entities to {:?}", entities.len(), self.path);
        Ok(entities.len())
    }
}

/// JSONL file reader.
pub struct JsonlReader<T> {
    path: PathBuf,
    _marker: PhantomData<T>,
}

impl<T: DeserializeOwned> JsonlReader<T> {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            _marker: PhantomData,
        }
    }

    pub fn for_entity(config: &StorageConfig, entity: EntityType) -> Self {
        Self::new(entity.path(config))
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Read all entities from the file. Unparseable lines are skipped.
    pub fn read_all(&self) -> Result<Vec<T>, StorageError> {
        self.read(false)
    }

    /// Read all entities, failing on the first line that does not parse.
    ///
    /// Read-modify-write paths use this so a rewrite never drops rows it
    /// could not read.
    pub fn read_all_strict(&self) -> Result<Vec<T>, StorageError> {
        self.read(true)
    }

    fn read(&self, strict: bool) -> Result<Vec<T>, StorageError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&self.path)?;
        let reader = BufReader::new(file);
        let mut entities = Vec::new();

        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }

            match serde_json::from_str(&line) {
                Ok(entity) => entities.push(entity),
                Err(e) if strict => {
                    error!("Unreadable line {} in {:?}: {}", idx + 1, self.path, e);
                    return Err(e.into());
                }
                Err(e) => {
                    warn!("Failed to parse line {} in {:?}: {}", idx + 1, self.path, e);
                }
            }
        }

        debug!("Read {} entities from {:?}", entities.len(), self.path);
        Ok(entities)
    }

    pub fn read_where<F>(&self, predicate: F) -> Result<Vec<T>, StorageError>
    where
        F: Fn(&T) -> bool,
    {
        let all = self.read_all()?;
        Ok(all.into_iter().filter(predicate).collect())
    }
}

fn catalog(config: &StorageConfig) -> Result<Vec<NameRecord>, StorageError> {
    JsonlReader::<NameRecord>::for_entity(config, EntityType::Name).read_all()
}

fn all_ratings(config: &StorageConfig) -> Result<Vec<RatingRecord>, StorageError> {
    JsonlReader::<RatingRecord>::for_entity(config, EntityType::Rating).read_all()
}

fn all_selections(config: &StorageConfig) -> Result<Vec<SelectionEvent>, StorageError> {
    JsonlReader::<SelectionEvent>::for_entity(config, EntityType::Selection).read_all()
}

/// File-backed store over the JSONL data lake.
///
/// File work runs on tokio's blocking pool, so concurrent reads overlap.
/// Writes are serialized behind one async mutex; rating upserts rewrite the
/// ratings file in a single atomic replace.
pub struct JsonlStore {
    config: StorageConfig,
    write_lock: Mutex<()>,
}

impl JsonlStore {
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            write_lock: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// Run file work on the blocking pool against this store's paths.
    async fn blocking<T, F>(&self, work: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(StorageConfig) -> Result<T, StorageError> + Send + 'static,
    {
        let config = self.config.clone();
        tokio::task::spawn_blocking(move || work(config)).await?
    }

    /// Replace the catalog. Used when seeding a data directory.
    pub async fn write_catalog(&self, names: &[NameRecord]) -> Result<usize, StorageError> {
        let names = names.to_vec();
        let _guard = self.write_lock.lock().await;
        self.blocking(move |config| {
            JsonlWriter::for_entity(&config, EntityType::Name).write_all(&names)
        })
        .await
    }
}

#[async_trait]
impl Store for JsonlStore {
    fn name(&self) -> &'static str {
        "jsonl"
    }

    async fn names(&self, query: &NameQuery) -> Result<Vec<NameRecord>, StorageError> {
        let query = query.clone();
        self.blocking(move |config| Ok(filter_names(&catalog(&config)?, &query)))
            .await
    }

    async fn ratings(&self, scope: &UserScope) -> Result<Vec<RatingRecord>, StorageError> {
        let scope = scope.clone();
        self.blocking(move |config| {
            JsonlReader::<RatingRecord>::for_entity(&config, EntityType::Rating)
                .read_where(|r| scope.includes(&r.user_id))
        })
        .await
    }

    async fn selections(
        &self,
        scope: &UserScope,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<SelectionEvent>, StorageError> {
        let scope = scope.clone();
        self.blocking(move |config| {
            JsonlReader::<SelectionEvent>::for_entity(&config, EntityType::Selection).read_where(
                |s| scope.includes(&s.user_id) && since.map_or(true, |t| s.selected_at >= t),
            )
        })
        .await
    }

    async fn count_names(&self, visibility: Visibility) -> Result<u64, StorageError> {
        self.blocking(move |config| {
            Ok(catalog(&config)?.iter().filter(|n| visibility.matches(n)).count() as u64)
        })
        .await
    }

    async fn count_users(&self) -> Result<u64, StorageError> {
        self.blocking(|config| Ok(distinct_users(&all_ratings(&config)?, &all_selections(&config)?)))
            .await
    }

    async fn count_ratings(&self) -> Result<u64, StorageError> {
        self.blocking(|config| Ok(all_ratings(&config)?.len() as u64))
            .await
    }

    async fn count_selections(&self) -> Result<u64, StorageError> {
        self.blocking(|config| Ok(all_selections(&config)?.len() as u64))
            .await
    }

    async fn average_rating(&self) -> Result<Option<f64>, StorageError> {
        self.blocking(|config| Ok(mean_rating(&all_ratings(&config)?)))
            .await
    }

    async fn upsert_ratings(
        &self,
        rows: Vec<RatingRecord>,
        policy: MergePolicy,
    ) -> Result<usize, StorageError> {
        if rows.is_empty() {
            return Ok(0);
        }

        let _guard = self.write_lock.lock().await;
        self.blocking(move |config| {
            let mut stored = JsonlReader::<RatingRecord>::for_entity(&config, EntityType::Rating)
                .read_all_strict()?;
            let applied = upsert_into(&mut stored, rows, policy);
            JsonlWriter::for_entity(&config, EntityType::Rating).write_all(&stored)?;

            info!(applied, total = stored.len(), %policy, "Upserted rating batch");
            Ok(applied)
        })
        .await
    }

    async fn append_selections(
        &self,
        events: Vec<SelectionEvent>,
    ) -> Result<usize, StorageError> {
        let _guard = self.write_lock.lock().await;
        self.blocking(move |config| {
            JsonlWriter::for_entity(&config, EntityType::Selection).append_batch(&events)
        })
        .await
    }

    async fn resolve_names(
        &self,
        references: &[String],
    ) -> Result<HashMap<String, NameRecord>, StorageError> {
        let references = references.to_vec();
        self.blocking(move |config| Ok(resolve_references(&catalog(&config)?, &references)))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde::{Deserialize, Serialize};
    use tempfile::TempDir;
    use tokio_test::assert_ok;

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct TestEntity {
        id: String,
        value: u32,
    }

    fn entity(id: &str, value: u32) -> TestEntity {
        TestEntity {
            id: id.to_string(),
            value,
        }
    }

    fn test_store(temp_dir: &TempDir) -> JsonlStore {
        JsonlStore::new(StorageConfig::new(temp_dir.path().to_path_buf()))
    }

    #[test]
    fn test_write_all_replaces_contents() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("replace.jsonl");
        let writer: JsonlWriter<TestEntity> = JsonlWriter::new(path.clone());
        let reader: JsonlReader<TestEntity> = JsonlReader::new(path.clone());

        writer.write_all(&[entity("1", 1)]).unwrap();
        writer.write_all(&[entity("2", 2), entity("3", 3)]).unwrap();

        let read = reader.read_all().unwrap();
        assert_eq!(read, vec![entity("2", 2), entity("3", 3)]);
        assert!(!path.with_extension("jsonl.tmp").exists());
    }

    #[test]
    fn test_append_batch_and_empty_batch() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("append.jsonl");
        let writer: JsonlWriter<TestEntity> = JsonlWriter::new(path.clone());

        assert_eq!(assert_ok!(writer.append_batch(&[])), 0);
        assert_eq!(assert_ok!(writer.append_batch(&[entity("1", 1), entity("2", 2)])), 2);
        assert_eq!(assert_ok!(writer.append_batch(&[entity("3", 3)])), 1);

        let reader: JsonlReader<TestEntity> = JsonlReader::new(path);
        assert_eq!(reader.read_all().unwrap().len(), 3);
    }

    #[test]
    fn test_read_missing_file_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let reader: JsonlReader<TestEntity> =
            JsonlReader::new(temp_dir.path().join("missing.jsonl"));
        assert!(!reader.exists());
        assert!(reader.read_all().unwrap().is_empty());
    }

    #[test]
    fn test_read_all_skips_bad_lines() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bad.jsonl");
        std::fs::write(
            &path,
            "{\"id\":\"1\",\"value\":1}\nnot-json\n\n{\"id\":\"2\",\"value\":2}\n",
        )
        .unwrap();

        let reader: JsonlReader<TestEntity> = JsonlReader::new(path);
        let read = reader.read_all().unwrap();
        assert_eq!(read, vec![entity("1", 1), entity("2", 2)]);
    }

    #[test]
    fn test_read_all_strict_fails_on_bad_line() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("strict.jsonl");
        std::fs::write(&path, "{\"id\":\"1\",\"value\":1}\n\n{\"id\":\"2\",\"value\":2.5}\n")
            .unwrap();

        let reader: JsonlReader<TestEntity> = JsonlReader::new(path);
        assert_eq!(reader.read_all().unwrap(), vec![entity("1", 1)]);
        assert!(matches!(reader.read_all_strict(), Err(StorageError::Json(_))));
    }

    #[test]
    fn test_entity_paths() {
        let config = StorageConfig::new(PathBuf::from("/data"));
        assert_eq!(
            EntityType::Name.path(&config),
            PathBuf::from("/data/catalog/names.jsonl")
        );
        assert_eq!(
            EntityType::Rating.path(&config),
            PathBuf::from("/data/activity/ratings.jsonl")
        );
        assert_eq!(
            EntityType::Selection.path(&config),
            PathBuf::from("/data/activity/selections.jsonl")
        );
    }

    #[tokio::test]
    async fn test_store_upsert_merges_existing_rows() {
        let temp_dir = TempDir::new().unwrap();
        let store = test_store(&temp_dir);

        store
            .upsert_ratings(
                vec![RatingRecord::new("alice", "n-1", 1500.0).with_results(1, 0)],
                MergePolicy::Additive,
            )
            .await
            .unwrap();
        store
            .upsert_ratings(
                vec![
                    RatingRecord::new("alice", "n-1", 1580.0).with_results(2, 1),
                    RatingRecord::new("alice", "n-2", 1420.0).with_results(0, 1),
                ],
                MergePolicy::Additive,
            )
            .await
            .unwrap();

        let ratings = store.ratings(&UserScope::All).await.unwrap();
        assert_eq!(ratings.len(), 2);
        assert_eq!(ratings[0].rating, 1580);
        assert_eq!(ratings[0].wins, 3);
        assert_eq!(ratings[0].losses, 1);
        assert_eq!(store.count_ratings().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_upsert_keeps_rows_it_cannot_read() {
        let temp_dir = TempDir::new().unwrap();
        let store = test_store(&temp_dir);
        store
            .upsert_ratings(
                vec![RatingRecord::new("alice", "n-1", 1500.0)],
                MergePolicy::Additive,
            )
            .await
            .unwrap();

        // A fractional rating does not fit the integer column
        let mut row = serde_json::to_value(RatingRecord::new("bob", "n-1", 1600.0)).unwrap();
        row["rating"] = serde_json::json!(1612.5);
        let path = EntityType::Rating.path(store.config());
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(file, "{}", row).unwrap();
        drop(file);
        let before = std::fs::read_to_string(&path).unwrap();

        let result = store
            .upsert_ratings(
                vec![RatingRecord::new("carol", "n-2", 1700.0)],
                MergePolicy::Additive,
            )
            .await;

        assert!(matches!(result, Err(StorageError::Json(_))));
        let after = std::fs::read_to_string(&path).unwrap();
        assert_eq!(after, before);
        assert!(after.contains("\"bob\""));
        assert!(!after.contains("carol"));

        // Analytics reads still skip the row
        assert_eq!(store.count_ratings().await.unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_store_reads_overlap_with_writes() {
        let temp_dir = TempDir::new().unwrap();
        let store = std::sync::Arc::new(test_store(&temp_dir));

        let writer = {
            let store = store.clone();
            tokio::spawn(async move {
                for _ in 0..10 {
                    store
                        .upsert_ratings(
                            vec![RatingRecord::new("alice", "n-1", 1500.0).with_results(1, 0)],
                            MergePolicy::Additive,
                        )
                        .await
                        .unwrap();
                }
            })
        };

        for _ in 0..10 {
            let (ratings, count, avg) = tokio::try_join!(
                store.ratings(&UserScope::All),
                store.count_ratings(),
                store.average_rating(),
            )
            .unwrap();
            assert!(ratings.len() <= 1);
            assert!(count <= 1);
            assert!(avg.map_or(true, |a| a == 1500.0));
        }
        writer.await.unwrap();

        let ratings = store.ratings(&UserScope::All).await.unwrap();
        assert_eq!(ratings[0].wins, 10);
    }

    #[tokio::test]
    async fn test_store_concurrent_upserts_do_not_lose_counts() {
        let temp_dir = TempDir::new().unwrap();
        let store = std::sync::Arc::new(test_store(&temp_dir));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .upsert_ratings(
                        vec![RatingRecord::new("alice", "n-1", 1500.0).with_results(1, 0)],
                        MergePolicy::Additive,
                    )
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let ratings = store.ratings(&UserScope::All).await.unwrap();
        assert_eq!(ratings.len(), 1);
        assert_eq!(ratings[0].wins, 8);
    }

    #[tokio::test]
    async fn test_store_selection_filters() {
        let temp_dir = TempDir::new().unwrap();
        let store = test_store(&temp_dir);
        let early = Utc.with_ymd_and_hms(2026, 1, 1, 10, 0, 0).unwrap();
        let late = Utc.with_ymd_and_hms(2026, 1, 5, 10, 0, 0).unwrap();

        store
            .append_selections(vec![
                SelectionEvent::new("n-1", "Tiger", "alice", early),
                SelectionEvent::new("n-1", "Tiger", "bob", late),
            ])
            .await
            .unwrap();

        let since = Utc.with_ymd_and_hms(2026, 1, 3, 0, 0, 0).unwrap();
        let recent = store.selections(&UserScope::All, Some(since)).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].user_id, "bob");

        let alice = store
            .selections(&UserScope::User("alice".to_string()), None)
            .await
            .unwrap();
        assert_eq!(alice.len(), 1);
        assert_eq!(store.count_users().await.unwrap(), 2);
        assert_eq!(store.count_selections().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_store_catalog_counts_and_resolution() {
        let temp_dir = TempDir::new().unwrap();
        let store = test_store(&temp_dir);
        store
            .write_catalog(&[
                NameRecord::new("Tiger", "").with_id("n-1"),
                NameRecord::new("Shadow", "").with_id("n-2").hidden(),
            ])
            .await
            .unwrap();

        assert_eq!(store.count_names(Visibility::All).await.unwrap(), 2);
        assert_eq!(store.count_names(Visibility::Hidden).await.unwrap(), 1);
        assert_eq!(store.count_names(Visibility::Visible).await.unwrap(), 1);

        let resolved = store
            .resolve_names(&["shadow".to_string(), "nope".to_string()])
            .await
            .unwrap();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved["shadow"].id.as_str(), "n-2");
    }

    #[tokio::test]
    async fn test_store_average_rating_empty() {
        let temp_dir = TempDir::new().unwrap();
        let store = test_store(&temp_dir);
        assert_eq!(store.average_rating().await.unwrap(), None);
        assert_eq!(store.count_users().await.unwrap(), 0);
    }
}
