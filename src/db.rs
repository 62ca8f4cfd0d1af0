use anyhow::{Context, Result};
use mongodb::options::ClientOptions;
use mongodb::{
    Client, Collection, Database as MongoDatabase,
    bson::{Document, doc, oid::ObjectId},
};
use once_cell::sync::OnceCell;
use serde::{Serialize, de::DeserializeOwned};

use crate::config::CONFIG;
use crate::data_models::{SearchRequest, SearchResultItem, SearchStatus, User};

/// Global database instance
static DB: OnceCell<Database> = OnceCell::new();

/// Collection names as constants for consistency
pub mod collections {
    pub const SEARCHES: &str = "searches";
    pub const SEARCH_RESULTS: &str = "search_results";
    pub const USERS: &str = "users";
}

/// Main database wrapper providing connection management and collection access
#[derive(Debug, Clone)]
pub struct Database {
    client: Client,
    db: MongoDatabase,
}

impl Database {
    /// Create a new Database instance with custom URI and database name.
    /// Useful for testing with a different database.
    pub async fn new(uri: &str, db_name: &str) -> Result<Self> {
        let client_options = ClientOptions::parse(uri)
            .await
            .context("Failed to parse MongoDB connection string")?;

        let client =
            Client::with_options(client_options).context("Failed to create MongoDB client")?;

        // Ping the database to verify connection
        client
            .database("admin")
            .run_command(doc! { "ping": 1 })
            .await
            .context("Failed to connect to MongoDB")?;

        tracing::info!("Connected to MongoDB database: {}", db_name);

        let db = client.database(db_name);

        Ok(Self { client, db })
    }

    /// Create a Database instance using environment configuration
    pub async fn from_config() -> Result<Self> {
        Self::new(&CONFIG.mongo_uri, &CONFIG.mongo_db_name).await
    }

    /// Initialize the global database instance.
    /// Call this once at application startup.
    pub async fn init_global() -> Result<&'static Database> {
        let db = Self::from_config().await?;
        DB.set(db)
            .map_err(|_| anyhow::anyhow!("Database already initialized"))?;
        Ok(DB.get().unwrap())
    }

    /// Get the global database instance.
    /// Panics if database hasn't been initialized.
    pub fn get() -> &'static Database {
        DB.get()
            .expect("Database not initialized. Call Database::init_global() first.")
    }

    /// Get a typed collection by name
    pub fn collection<T>(&self, name: &str) -> Collection<T>
    where
        T: Send + Sync,
    {
        self.db.collection(name)
    }

    /// Get the underlying MongoDB client (for advanced operations)
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Get the underlying MongoDB database (for advanced operations)
    pub fn database(&self) -> &MongoDatabase {
        &self.db
    }

    // =========================================================================
    // Collection accessors
    // =========================================================================

    pub fn searches(&self) -> Collection<SearchRequest> {
        self.collection(collections::SEARCHES)
    }

    pub fn search_results(&self) -> Collection<SearchResultItem> {
        self.collection(collections::SEARCH_RESULTS)
    }

    pub fn users(&self) -> Collection<User> {
        self.collection(collections::USERS)
    }
}

// =============================================================================
// Generic CRUD operations
// =============================================================================

/// Generic repository for common CRUD operations, wrapped by the typed repos
/// below.
pub struct Repository<T>
where
    T: Send + Sync,
{
    collection: Collection<T>,
}

impl<T> Repository<T>
where
    T: Serialize + DeserializeOwned + Unpin + Send + Sync,
{
    pub fn new(collection: Collection<T>) -> Self {
        Self { collection }
    }

    /// Insert a single document
    pub async fn insert(&self, doc: &T) -> Result<ObjectId> {
        let result = self
            .collection
            .insert_one(doc)
            .await
            .context("Failed to insert document")?;

        result
            .inserted_id
            .as_object_id()
            .ok_or_else(|| anyhow::anyhow!("Failed to get inserted ObjectId"))
    }

    /// Find a document by ObjectId
    pub async fn find_by_id(&self, id: ObjectId) -> Result<Option<T>> {
        let filter = doc! { "_id": id };
        self.collection
            .find_one(filter)
            .await
            .context("Failed to find document by id")
    }

    /// Find a single document matching a filter
    pub async fn find_one(&self, filter: Document) -> Result<Option<T>> {
        self.collection
            .find_one(filter)
            .await
            .context("Failed to find document")
    }

    /// Find all documents matching a filter
    pub async fn find(&self, filter: Document) -> Result<Vec<T>> {
        use futures::TryStreamExt;

        let cursor = self
            .collection
            .find(filter)
            .await
            .context("Failed to execute find query")?;

        cursor
            .try_collect()
            .await
            .context("Failed to collect results")
    }

    /// Update a document by ObjectId
    pub async fn update_by_id(&self, id: ObjectId, update: Document) -> Result<bool> {
        let filter = doc! { "_id": id };
        let result = self
            .collection
            .update_one(filter, doc! { "$set": update })
            .await
            .context("Failed to update document")?;

        Ok(result.modified_count > 0)
    }

    /// Delete multiple documents matching a filter
    pub async fn delete_many(&self, filter: Document) -> Result<u64> {
        let result = self
            .collection
            .delete_many(filter)
            .await
            .context("Failed to delete documents")?;

        Ok(result.deleted_count)
    }

    /// Count documents matching a filter
    pub async fn count(&self, filter: Document) -> Result<u64> {
        self.collection
            .count_documents(filter)
            .await
            .context("Failed to count documents")
    }
}

// =============================================================================
// Search-specific operations
// =============================================================================

pub struct SearchRepo {
    repo: Repository<SearchRequest>,
}

impl SearchRepo {
    pub fn new(db: &Database) -> Self {
        Self {
            repo: Repository::new(db.searches()),
        }
    }

    pub async fn insert(&self, search: &SearchRequest) -> Result<ObjectId> {
        self.repo.insert(search).await
    }

    pub async fn find_by_id(&self, id: ObjectId) -> Result<Option<SearchRequest>> {
        self.repo.find_by_id(id).await
    }

    /// Record the candidate URLs on the search entity itself so they live and
    /// die with the request.
    pub async fn set_searched_urls(
        &self,
        id: ObjectId,
        urls: &[crate::data_models::SearchedUrl],
    ) -> Result<bool> {
        let urls = mongodb::bson::to_bson(urls).context("Failed to serialize searched urls")?;
        self.repo.update_by_id(id, doc! { "searched_urls": urls }).await
    }

    /// Terminal transition to `completed` with the final counts.
    pub async fn mark_completed(
        &self,
        id: ObjectId,
        total_results: i64,
        search_time_ms: i64,
    ) -> Result<bool> {
        self.repo
            .update_by_id(
                id,
                doc! {
                    "status": mongodb::bson::to_bson(&SearchStatus::Completed)?,
                    "total_results": total_results,
                    "search_time_ms": search_time_ms,
                },
            )
            .await
    }

    /// Terminal transition to `error`.
    pub async fn mark_error(&self, id: ObjectId) -> Result<bool> {
        self.repo
            .update_by_id(
                id,
                doc! { "status": mongodb::bson::to_bson(&SearchStatus::Error)? },
            )
            .await
    }

    /// Delete a search and, transitively, all of its result items.
    pub async fn delete_with_results(&self, db: &Database, id: ObjectId) -> Result<u64> {
        let results = Repository::new(db.search_results());
        let deleted = results.delete_many(doc! { "search_id": id }).await?;
        self.repo
            .collection
            .delete_one(doc! { "_id": id })
            .await
            .context("Failed to delete search")?;
        Ok(deleted)
    }
}

// =============================================================================
// Result-item operations
// =============================================================================

pub struct ResultItemRepo {
    repo: Repository<SearchResultItem>,
}

impl ResultItemRepo {
    pub fn new(db: &Database) -> Self {
        Self {
            repo: Repository::new(db.search_results()),
        }
    }

    /// Result items are write-once; there is deliberately no update path.
    pub async fn insert(&self, item: &SearchResultItem) -> Result<ObjectId> {
        self.repo.insert(item).await
    }

    pub async fn find_by_search(&self, search_id: ObjectId) -> Result<Vec<SearchResultItem>> {
        self.repo.find(doc! { "search_id": search_id }).await
    }

    pub async fn count_by_search(&self, search_id: ObjectId) -> Result<u64> {
        self.repo.count(doc! { "search_id": search_id }).await
    }
}

// =============================================================================
// User operations
// =============================================================================

pub struct UserRepo {
    repo: Repository<User>,
}

impl UserRepo {
    pub fn new(db: &Database) -> Self {
        Self {
            repo: Repository::new(db.users()),
        }
    }

    pub async fn insert(&self, user: &User) -> Result<ObjectId> {
        self.repo.insert(user).await
    }

    pub async fn find_by_id(&self, id: ObjectId) -> Result<Option<User>> {
        self.repo.find_by_id(id).await
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        self.repo.find_one(doc! { "email": email }).await
    }

    /// Bump the monthly usage counter for a submitted search.
    pub async fn increment_searches_used(&self, id: ObjectId) -> Result<bool> {
        let result = self
            .repo
            .collection
            .update_one(doc! { "_id": id }, doc! { "$inc": { "searches_used": 1 } })
            .await
            .context("Failed to increment search usage")?;
        Ok(result.modified_count > 0)
    }
}

// =============================================================================
// Test utilities
// =============================================================================

pub mod test_utils {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static TEST_DB_COUNTER: AtomicUsize = AtomicUsize::new(0);

    /// Create a unique test database name
    pub fn unique_test_db_name() -> String {
        let count = TEST_DB_COUNTER.fetch_add(1, Ordering::SeqCst);
        let timestamp = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_millis();
        format!("distill_test_{}_{}", timestamp, count)
    }

    /// Create a test database instance.
    /// Uses MONGO_URI from environment but creates a unique test database.
    pub async fn create_test_db() -> Result<(Database, String)> {
        dotenvy::dotenv().ok();
        let uri =
            std::env::var("MONGO_URI").unwrap_or_else(|_| "mongodb://localhost:27017".to_string());
        let db_name = unique_test_db_name();
        let db = Database::new(&uri, &db_name).await?;
        Ok((db, db_name))
    }

    /// Clean up a test database by dropping it
    pub async fn cleanup_test_db(db: &Database, db_name: &str) -> Result<()> {
        db.client()
            .database(db_name)
            .drop()
            .await
            .context("Failed to drop test database")?;
        Ok(())
    }
}
