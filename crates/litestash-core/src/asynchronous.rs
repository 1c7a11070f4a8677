//! Async wrapper over `Repository`
//!
//! Each call takes the shared lock and runs the synchronous operation on
//! tokio's blocking pool, so operation contracts match `Repository` exactly.
//! Calls from concurrent tasks are serialized by the lock.
//!
//! ```ignore
//! let repo = AsyncRepository::open("data/store.db").await?;
//! repo.create_document_table("people").await?;
//! repo.upsert("people", "1", person).await?;
//! let person: Option<Person> = repo.get("people", "1").await?;
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::Mutex;

use crate::config::Config;
use crate::error::{StoreError, StoreResult};
use crate::models::{Document, Signal, SignalRecord};
use crate::repository::Repository;

/// Cloneable async handle sharing one `Repository`
#[derive(Clone)]
pub struct AsyncRepository {
    inner: Arc<Mutex<Repository>>,
}

impl AsyncRepository {
    /// Open or create the database at `path` with default settings
    pub async fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();
        let repo = run_blocking(move || Repository::open(&path)).await?;
        Ok(Self::from_repository(repo))
    }

    /// Open or create the database described by `config`
    pub async fn open_with_config(config: Config) -> StoreResult<Self> {
        let repo = run_blocking(move || Repository::open_with_config(&config)).await?;
        Ok(Self::from_repository(repo))
    }

    /// Wrap an already open repository
    pub fn from_repository(repo: Repository) -> Self {
        Self {
            inner: Arc::new(Mutex::new(repo)),
        }
    }

    /// Run a closure against the repository on the blocking pool
    pub async fn call<R, F>(&self, f: F) -> StoreResult<R>
    where
        F: FnOnce(&mut Repository) -> StoreResult<R> + Send + 'static,
        R: Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        run_blocking(move || {
            let mut repo = inner.blocking_lock();
            f(&mut repo)
        })
        .await
    }

    /// Release the connection; later calls fail with `StoreError::Closed`
    pub async fn close(&self) -> StoreResult<()> {
        self.call(|repo| repo.close()).await
    }

    /// Create a document table; does nothing if it already exists
    pub async fn create_document_table(&self, table: &str) -> StoreResult<()> {
        let table = table.to_owned();
        self.call(move |repo| repo.create_document_table(&table)).await
    }

    /// Create a signal table; does nothing if it already exists
    pub async fn create_signal_table(&self, table: &str) -> StoreResult<()> {
        let table = table.to_owned();
        self.call(move |repo| repo.create_signal_table(&table)).await
    }

    /// Check whether a table exists
    pub async fn table_exists(&self, table: &str) -> StoreResult<bool> {
        let table = table.to_owned();
        self.call(move |repo| repo.table_exists(&table)).await
    }

    /// Number of rows in a table of either shape
    pub async fn count(&self, table: &str) -> StoreResult<u64> {
        let table = table.to_owned();
        self.call(move |repo| repo.count(&table)).await
    }

    /// See [`Repository::upsert`]
    pub async fn upsert<T>(&self, table: &str, id: &str, value: T) -> StoreResult<()>
    where
        T: Serialize + Send + 'static,
    {
        let (table, id) = (table.to_owned(), id.to_owned());
        self.call(move |repo| repo.upsert(&table, &id, &value)).await
    }

    /// See [`Repository::get`]
    pub async fn get<T>(&self, table: &str, id: &str) -> StoreResult<Option<T>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let (table, id) = (table.to_owned(), id.to_owned());
        self.call(move |repo| repo.get(&table, &id)).await
    }

    /// Get a document with its timestamps
    pub async fn get_document<T>(&self, table: &str, id: &str) -> StoreResult<Option<Document<T>>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let (table, id) = (table.to_owned(), id.to_owned());
        self.call(move |repo| repo.get_document(&table, &id)).await
    }

    /// Get every document's data in the table
    pub async fn get_all<T>(&self, table: &str) -> StoreResult<Vec<T>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let table = table.to_owned();
        self.call(move |repo| repo.get_all(&table)).await
    }

    /// Visit every document one row at a time on the blocking pool
    ///
    /// `visit` runs off the async runtime; send results out through a
    /// channel if the caller needs them as they arrive.
    pub async fn for_each<T, F>(&self, table: &str, visit: F) -> StoreResult<()>
    where
        T: DeserializeOwned + 'static,
        F: FnMut(Document<T>) -> StoreResult<()> + Send + 'static,
    {
        let table = table.to_owned();
        self.call(move |repo| repo.for_each(&table, visit)).await
    }

    /// Delete a document; returns whether a row was removed
    pub async fn delete(&self, table: &str, id: &str) -> StoreResult<bool> {
        let (table, id) = (table.to_owned(), id.to_owned());
        self.call(move |repo| repo.delete(&table, &id)).await
    }

    /// See [`Repository::upsert_signal`]
    pub async fn upsert_signal(&self, table: &str, signal: Signal) -> StoreResult<()> {
        let table = table.to_owned();
        self.call(move |repo| repo.upsert_signal(&table, &signal)).await
    }

    /// Get a signal by id
    pub async fn get_signal(&self, table: &str, id: &str) -> StoreResult<Option<SignalRecord>> {
        let (table, id) = (table.to_owned(), id.to_owned());
        self.call(move |repo| repo.get_signal(&table, &id)).await
    }

    /// Get all signals, or only those of one exact type
    pub async fn get_signals(
        &self,
        table: &str,
        signal_type: Option<&str>,
    ) -> StoreResult<Vec<SignalRecord>> {
        let table = table.to_owned();
        let signal_type = signal_type.map(str::to_owned);
        self.call(move |repo| repo.get_signals(&table, signal_type.as_deref()))
            .await
    }

    /// Visit signals one row at a time on the blocking pool
    pub async fn for_each_signal<F>(
        &self,
        table: &str,
        signal_type: Option<&str>,
        visit: F,
    ) -> StoreResult<()>
    where
        F: FnMut(SignalRecord) -> StoreResult<()> + Send + 'static,
    {
        let table = table.to_owned();
        let signal_type = signal_type.map(str::to_owned);
        self.call(move |repo| repo.for_each_signal(&table, signal_type.as_deref(), visit))
            .await
    }

    /// Delete a signal; returns whether a row was removed
    pub async fn delete_signal(&self, table: &str, id: &str) -> StoreResult<bool> {
        let (table, id) = (table.to_owned(), id.to_owned());
        self.call(move |repo| repo.delete_signal(&table, &id)).await
    }

    /// See [`Repository::execute_in_transaction`]
    ///
    /// The lock is held for the whole batch, so no other call interleaves.
    pub async fn execute_in_transaction<R, F>(&self, batch: F) -> StoreResult<R>
    where
        F: FnOnce(&Repository) -> StoreResult<R> + Send + 'static,
        R: Send + 'static,
    {
        self.call(move |repo| repo.execute_in_transaction(batch)).await
    }
}

async fn run_blocking<R, F>(f: F) -> StoreResult<R>
where
    F: FnOnce() -> StoreResult<R> + Send + 'static,
    R: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct Person {
        name: String,
        age: u32,
    }

    async fn open_repo(temp_dir: &TempDir) -> AsyncRepository {
        let repo = AsyncRepository::open(temp_dir.path().join("async.db"))
            .await
            .unwrap();
        repo.create_document_table("people").await.unwrap();
        repo.create_signal_table("signals").await.unwrap();
        repo
    }

    #[tokio::test]
    async fn test_document_crud() {
        let temp_dir = TempDir::new().unwrap();
        let repo = open_repo(&temp_dir).await;
        let alice = Person {
            name: "Alice".to_string(),
            age: 30,
        };

        repo.upsert("people", "1", alice.clone()).await.unwrap();
        assert_eq!(repo.get::<Person>("people", "1").await.unwrap(), Some(alice));
        assert_eq!(repo.get_all::<Person>("people").await.unwrap().len(), 1);

        assert!(repo.delete("people", "1").await.unwrap());
        assert!(!repo.delete("people", "1").await.unwrap());
        assert_eq!(repo.get::<Person>("people", "1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_signal_filter() {
        let temp_dir = TempDir::new().unwrap();
        let repo = open_repo(&temp_dir).await;

        repo.upsert_signal("signals", Signal::new("a", "EEG", vec![1]))
            .await
            .unwrap();
        repo.upsert_signal("signals", Signal::new("b", "EMG", vec![2]))
            .await
            .unwrap();

        let eeg = repo.get_signals("signals", Some("EEG")).await.unwrap();
        assert_eq!(eeg.len(), 1);
        assert_eq!(eeg[0].signal.id, "a");
        assert_eq!(repo.get_signals("signals", None).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_lazy_scans_stream_rows() {
        let temp_dir = TempDir::new().unwrap();
        let repo = open_repo(&temp_dir).await;
        for i in 0..5u32 {
            repo.upsert("people", &i.to_string(), i).await.unwrap();
        }
        repo.upsert_signal("signals", Signal::new("a", "EEG", vec![1]))
            .await
            .unwrap();
        repo.upsert_signal("signals", Signal::new("b", "EMG", vec![2]))
            .await
            .unwrap();

        let (tx, rx) = std::sync::mpsc::channel();
        repo.for_each("people", move |doc: Document<u32>| {
            tx.send(doc.data).map_err(|e| StoreError::aborted(e.to_string()))
        })
        .await
        .unwrap();
        let mut ages: Vec<u32> = rx.iter().collect();
        ages.sort();
        assert_eq!(ages, vec![0, 1, 2, 3, 4]);

        let (tx, rx) = std::sync::mpsc::channel();
        repo.for_each_signal("signals", Some("EMG"), move |record| {
            tx.send(record.signal.id)
                .map_err(|e| StoreError::aborted(e.to_string()))
        })
        .await
        .unwrap();
        assert_eq!(rx.iter().collect::<Vec<_>>(), vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn test_concurrent_writers_all_land() {
        let temp_dir = TempDir::new().unwrap();
        let repo = open_repo(&temp_dir).await;

        let mut handles = Vec::new();
        for i in 0..16u32 {
            let repo = repo.clone();
            handles.push(tokio::spawn(async move {
                repo.upsert("people", &i.to_string(), i).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(repo.count("people").await.unwrap(), 16);
    }

    #[tokio::test]
    async fn test_transaction_rollback() {
        let temp_dir = TempDir::new().unwrap();
        let repo = open_repo(&temp_dir).await;

        let err = repo
            .execute_in_transaction(|r| {
                r.upsert("people", "1", &1u32)?;
                Err::<(), _>(StoreError::aborted("injected"))
            })
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::Transaction { .. }));
        assert_eq!(repo.count("people").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_close() {
        let temp_dir = TempDir::new().unwrap();
        let repo = open_repo(&temp_dir).await;

        repo.close().await.unwrap();
        assert!(matches!(
            repo.get::<Person>("people", "1").await,
            Err(StoreError::Closed)
        ));
    }
}
