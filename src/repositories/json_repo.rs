//! Post storage in a single pretty-printed JSON array on disk.
//!
//! Every mutation is a full read-modify-write of the file. Mutations on the
//! same path are serialized through a process-wide async mutex, and writes
//! go through a temp file that is fsynced and renamed over the target, so a
//! reader only ever sees a complete collection.
//!
//! Ids come from a high-water mark kept in a sidecar file next to the store
//! (`posts.json` -> `posts.meta.json`). An id is never handed out twice, even
//! after the post that held the highest id is deleted.

use std::{
    collections::HashMap,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::{Arc, PoisonError},
};

use async_trait::async_trait;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use tokio::{fs, io::AsyncWriteExt, sync::Mutex};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    models::posts::{sort_newest_first, NewPost, Post, PostChanges},
    Error, Result,
};

use super::posts_repo::PostsRepository;

static STORE_LOCKS: Lazy<std::sync::Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>> =
    Lazy::new(Default::default);

/// One lock per store path, shared by every handle opened on that path.
fn lock_for(path: &Path) -> Arc<Mutex<()>> {
    let mut locks = STORE_LOCKS.lock().unwrap_or_else(PoisonError::into_inner);
    locks.entry(path.to_path_buf()).or_default().clone()
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreMeta {
    last_id: i64,
}

#[derive(Clone)]
pub struct JsonFileRepo {
    path: PathBuf,
    meta_path: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl JsonFileRepo {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let path = std::path::absolute(&path).unwrap_or(path);
        let meta_path = path.with_extension("meta.json");
        let lock = lock_for(&path);

        Self {
            path,
            meta_path,
            lock,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Creates the data directory and, if the store file is missing, writes
    /// the two seed posts.
    pub async fn initialize(&self) -> Result<()> {
        let _guard = self.lock.lock().await;
        self.ensure_dir().await?;

        if fs::try_exists(&self.path).await? {
            return Ok(());
        }

        let seed = seed_posts();
        debug!("Seeding post store at {}", self.path.display());
        self.raise_high_water_mark(&seed).await?;
        self.write_posts(&seed).await?;

        Ok(())
    }

    async fn ensure_dir(&self) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).await?;
        }
        Ok(())
    }

    /// `None` when the store file does not exist yet.
    async fn read_posts(&self) -> Result<Option<Vec<Post>>> {
        match fs::read(&self.path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn write_posts(&self, posts: &[Post]) -> Result<()> {
        let json = serde_json::to_vec_pretty(posts)?;
        atomic_write(&self.path, &json).await
    }

    async fn read_meta(&self) -> Result<StoreMeta> {
        match fs::read(&self.meta_path).await {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(meta) => Ok(meta),
                Err(err) => {
                    // The collection still bounds the next id from below.
                    warn!(
                        "Ignoring unreadable id counter {}: {}",
                        self.meta_path.display(),
                        err
                    );
                    Ok(StoreMeta::default())
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(StoreMeta::default()),
            Err(err) => Err(err.into()),
        }
    }

    async fn write_meta(&self, meta: &StoreMeta) -> Result<()> {
        let json = serde_json::to_vec_pretty(meta)?;
        atomic_write(&self.meta_path, &json).await
    }

    /// Records that every id in `posts` has been issued. Never lowers the
    /// stored mark. Must be called with the store lock held.
    async fn raise_high_water_mark(&self, posts: &[Post]) -> Result<()> {
        let meta = self.read_meta().await?;
        let last_id = meta.last_id.max(max_id(posts));

        if last_id != meta.last_id {
            self.write_meta(&StoreMeta { last_id }).await?;
        }
        Ok(())
    }

    /// Must be called with the store lock held.
    async fn issue_id(&self, posts: &[Post]) -> Result<i64> {
        let meta = self.read_meta().await?;
        let last_id = meta.last_id.max(max_id(posts));
        let id = last_id
            .checked_add(1)
            .ok_or_else(|| Error::Internal("post id space exhausted".to_string()))?;

        self.write_meta(&StoreMeta { last_id: id }).await?;
        Ok(id)
    }
}

#[async_trait]
impl PostsRepository for JsonFileRepo {
    async fn get_posts(&self) -> Result<Vec<Post>> {
        self.initialize().await?;

        let mut posts = self.read_posts().await?.unwrap_or_default();
        sort_newest_first(&mut posts);

        Ok(posts)
    }

    async fn get_post(&self, post_id: i64) -> Result<Post> {
        let posts = self.read_posts().await?.ok_or(Error::NotFound)?;

        posts
            .into_iter()
            .find(|post| post.id == post_id)
            .ok_or(Error::NotFound)
    }

    async fn create_post(&self, new_post: NewPost) -> Result<Post> {
        let _guard = self.lock.lock().await;
        self.ensure_dir().await?;

        let mut posts = self.read_posts().await?.unwrap_or_default();
        let id = self.issue_id(&posts).await?;
        let post = new_post.into_post(id);

        posts.push(post.clone());
        self.write_posts(&posts).await?;

        info!("Created post {} in {}", post.id, self.path.display());
        Ok(post)
    }

    async fn update_post(&self, post_id: i64, changes: PostChanges) -> Result<Post> {
        let _guard = self.lock.lock().await;

        let mut posts = self.read_posts().await?.ok_or(Error::NotFound)?;
        let post = posts
            .iter_mut()
            .find(|post| post.id == post_id)
            .ok_or(Error::NotFound)?;

        changes.apply_to(post);
        let updated = post.clone();
        self.write_posts(&posts).await?;

        info!("Updated post {}", post_id);
        Ok(updated)
    }

    async fn delete_post(&self, post_id: i64) -> Result<()> {
        let _guard = self.lock.lock().await;

        let mut posts = self.read_posts().await?.ok_or(Error::NotFound)?;
        let index = posts
            .iter()
            .position(|post| post.id == post_id)
            .ok_or(Error::NotFound)?;

        // Stores without a sidecar only know their mark from the ids present.
        self.raise_high_water_mark(&posts).await?;
        posts.remove(index);
        self.write_posts(&posts).await?;

        info!("Deleted post {}", post_id);
        Ok(())
    }
}

fn max_id(posts: &[Post]) -> i64 {
    posts.iter().map(|post| post.id).max().unwrap_or(0)
}

/// Write to a sibling temp file, fsync it, then rename it over `path`.
async fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "store".to_string());
    let temp_path = path.with_file_name(format!(".{file_name}.{}.tmp", Uuid::now_v7()));

    let written = async {
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(data).await?;
        file.sync_all().await?;
        fs::rename(&temp_path, path).await
    }
    .await;

    if let Err(err) = written {
        let _ = fs::remove_file(&temp_path).await;
        return Err(err.into());
    }

    Ok(())
}

fn seed_posts() -> Vec<Post> {
    vec![
        Post {
            id: 1,
            title: "Welcome to My Blog".to_string(),
            description: "This is my first blog post. I'm excited to share my thoughts and experiences with you!".to_string(),
            image: "/images/welcome.jpg".to_string(),
            date: "2024-01-15".to_string(),
        },
        Post {
            id: 2,
            title: "Learning Nuxt.js".to_string(),
            description: "Nuxt.js is an amazing framework for building Vue.js applications. Here's what I've learned so far.".to_string(),
            image: "/images/nuxt.jpg".to_string(),
            date: "2024-01-20".to_string(),
        },
    ]
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::models::posts::DEFAULT_IMAGE;
    use tempfile::TempDir;

    fn store_in(temp: &TempDir) -> JsonFileRepo {
        JsonFileRepo::new(temp.path().join("data").join("posts.json"))
    }

    fn new_post(title: &str, date: Option<&str>) -> NewPost {
        NewPost {
            title: title.to_string(),
            description: format!("{title} body"),
            image: None,
            date: date.map(str::to_string),
        }
    }

    fn changes(title: &str, date: &str, image: Option<&str>) -> PostChanges {
        PostChanges {
            title: title.to_string(),
            description: format!("{title} body"),
            date: date.to_string(),
            image: image.map(str::to_string),
        }
    }

    async fn raw_store(repo: &JsonFileRepo) -> String {
        fs::read_to_string(repo.path()).await.unwrap()
    }

    #[tokio::test]
    async fn test_list_seeds_missing_store() {
        let temp = TempDir::new().unwrap();
        let repo = store_in(&temp);

        let posts = repo.get_posts().await.unwrap();

        assert!(repo.path().exists());
        assert_eq!(posts.len(), 2);
        assert_eq!(posts[0].date, "2024-01-20");
        assert_eq!(posts[0].id, 2);
        assert_eq!(posts[1].id, 1);
    }

    #[tokio::test]
    async fn test_initialize_keeps_existing_store() {
        let temp = TempDir::new().unwrap();
        let repo = store_in(&temp);

        repo.create_post(new_post("Only", Some("2024-02-01")))
            .await
            .unwrap();
        repo.initialize().await.unwrap();

        let posts = repo.get_posts().await.unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].title, "Only");
    }

    #[tokio::test]
    async fn test_get_without_store_file_is_not_found() {
        let temp = TempDir::new().unwrap();
        let repo = store_in(&temp);

        let err = repo.get_post(1).await.unwrap_err();

        assert!(matches!(err, Error::NotFound));
        assert!(!repo.path().exists());
    }

    #[tokio::test]
    async fn test_create_in_empty_store() {
        let temp = TempDir::new().unwrap();
        let repo = store_in(&temp);

        let created = repo
            .create_post(new_post("A", Some("2024-02-01")))
            .await
            .unwrap();

        assert_eq!(created.title, "A");
        assert_eq!(created.image, DEFAULT_IMAGE);
        assert_eq!(created.date, "2024-02-01");

        let posts = repo.get_posts().await.unwrap();
        assert_eq!(posts, vec![created.clone()]);
        assert_eq!(repo.get_post(created.id).await.unwrap(), created);
    }

    #[tokio::test]
    async fn test_create_issues_fresh_increasing_ids() {
        let temp = TempDir::new().unwrap();
        let repo = store_in(&temp);
        let seeded = repo.get_posts().await.unwrap();

        let first = repo.create_post(new_post("First", None)).await.unwrap();
        let second = repo.create_post(new_post("Second", None)).await.unwrap();

        assert!(seeded.iter().all(|post| post.id < first.id));
        assert!(second.id > first.id);

        let posts = repo.get_posts().await.unwrap();
        assert_eq!(posts.iter().filter(|p| p.id == first.id).count(), 1);
    }

    #[tokio::test]
    async fn test_ids_are_not_reused_after_delete() {
        let temp = TempDir::new().unwrap();
        let repo = store_in(&temp);

        let doomed = repo.create_post(new_post("Doomed", None)).await.unwrap();
        repo.delete_post(doomed.id).await.unwrap();

        let next = repo.create_post(new_post("Next", None)).await.unwrap();
        assert!(next.id > doomed.id);
    }

    #[tokio::test]
    async fn test_ids_continue_after_legacy_timestamp_ids() {
        let temp = TempDir::new().unwrap();
        let repo = store_in(&temp);
        let legacy = vec![Post {
            id: 1_721_000_000_000,
            title: "Legacy".to_string(),
            description: "Created with a timestamp id".to_string(),
            image: DEFAULT_IMAGE.to_string(),
            date: "2024-07-15".to_string(),
        }];
        fs::create_dir_all(repo.path().parent().unwrap()).await.unwrap();
        fs::write(repo.path(), serde_json::to_vec_pretty(&legacy).unwrap())
            .await
            .unwrap();

        let created = repo.create_post(new_post("New", None)).await.unwrap();
        assert_eq!(created.id, 1_721_000_000_001);
    }

    async fn write_legacy_store(repo: &JsonFileRepo, ids: &[i64]) {
        let posts: Vec<Post> = ids
            .iter()
            .map(|&id| Post {
                id,
                title: format!("Legacy {id}"),
                description: "Written before the id counter existed".to_string(),
                image: DEFAULT_IMAGE.to_string(),
                date: "2024-01-15".to_string(),
            })
            .collect();
        fs::create_dir_all(repo.path().parent().unwrap()).await.unwrap();
        fs::write(repo.path(), serde_json::to_vec_pretty(&posts).unwrap())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_deleting_highest_legacy_id_does_not_free_it() {
        let temp = TempDir::new().unwrap();
        let repo = store_in(&temp);
        write_legacy_store(&repo, &[1, 2]).await;

        repo.delete_post(2).await.unwrap();
        let created = repo.create_post(new_post("After delete", None)).await.unwrap();

        assert_eq!(created.id, 3);
    }

    #[tokio::test]
    async fn test_reseeding_keeps_issued_ids() {
        let temp = TempDir::new().unwrap();
        let repo = store_in(&temp);

        for title in ["A", "B", "C"] {
            repo.create_post(new_post(title, None)).await.unwrap();
        }
        fs::remove_file(repo.path()).await.unwrap();

        repo.initialize().await.unwrap();
        let created = repo.create_post(new_post("D", None)).await.unwrap();

        assert_eq!(created.id, 4);
    }

    #[tokio::test]
    async fn test_exhausted_id_space_is_internal_error() {
        let temp = TempDir::new().unwrap();
        let repo = store_in(&temp);
        write_legacy_store(&repo, &[i64::MAX]).await;

        let err = repo.create_post(new_post("Overflow", None)).await.unwrap_err();

        assert!(matches!(err, Error::Internal(_)));
        assert_eq!(repo.get_posts().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_update_keeps_image_when_none_supplied() {
        let temp = TempDir::new().unwrap();
        let repo = store_in(&temp);
        repo.initialize().await.unwrap();

        let updated = repo
            .update_post(1, changes("X", "2024-03-01", None))
            .await
            .unwrap();

        assert_eq!(updated.id, 1);
        assert_eq!(updated.title, "X");
        assert_eq!(updated.description, "X body");
        assert_eq!(updated.date, "2024-03-01");
        assert_eq!(updated.image, "/images/welcome.jpg");
        assert_eq!(repo.get_post(1).await.unwrap(), updated);
    }

    #[tokio::test]
    async fn test_update_replaces_image_when_supplied() {
        let temp = TempDir::new().unwrap();
        let repo = store_in(&temp);
        repo.initialize().await.unwrap();

        let updated = repo
            .update_post(2, changes("Y", "2024-03-02", Some("/uploads/new.png")))
            .await
            .unwrap();

        assert_eq!(updated.image, "/uploads/new.png");
    }

    #[tokio::test]
    async fn test_missing_id_leaves_store_untouched() {
        let temp = TempDir::new().unwrap();
        let repo = store_in(&temp);
        repo.initialize().await.unwrap();
        let before = raw_store(&repo).await;

        assert!(matches!(repo.get_post(99).await, Err(Error::NotFound)));
        assert!(matches!(
            repo.update_post(99, changes("X", "2024-03-01", None)).await,
            Err(Error::NotFound)
        ));
        assert!(matches!(repo.delete_post(99).await, Err(Error::NotFound)));

        assert_eq!(raw_store(&repo).await, before);
    }

    #[tokio::test]
    async fn test_update_and_delete_without_store_file() {
        let temp = TempDir::new().unwrap();
        let repo = store_in(&temp);

        assert!(matches!(
            repo.update_post(1, changes("X", "2024-03-01", None)).await,
            Err(Error::NotFound)
        ));
        assert!(matches!(repo.delete_post(1).await, Err(Error::NotFound)));
        assert!(!repo.path().exists());
    }

    #[tokio::test]
    async fn test_delete_twice() {
        let temp = TempDir::new().unwrap();
        let repo = store_in(&temp);
        let before = repo.get_posts().await.unwrap().len();

        repo.delete_post(1).await.unwrap();
        assert!(matches!(repo.delete_post(1).await, Err(Error::NotFound)));

        let after = repo.get_posts().await.unwrap();
        assert_eq!(after.len(), before - 1);
        assert!(after.iter().all(|post| post.id != 1));
    }

    #[tokio::test]
    async fn test_store_is_a_pretty_printed_array() {
        let temp = TempDir::new().unwrap();
        let repo = store_in(&temp);
        repo.get_posts().await.unwrap();

        let raw = raw_store(&repo).await;
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();

        assert!(value.is_array());
        assert!(raw.contains("\n  {"));
        assert!(value[0].get("image").is_some());
    }

    #[tokio::test]
    async fn test_no_temp_files_left_behind() {
        let temp = TempDir::new().unwrap();
        let repo = store_in(&temp);
        repo.get_posts().await.unwrap();
        repo.create_post(new_post("A", None)).await.unwrap();

        let mut names = Vec::new();
        let mut entries = fs::read_dir(repo.path().parent().unwrap()).await.unwrap();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();

        assert_eq!(names, vec!["posts.json", "posts.meta.json"]);
    }

    #[tokio::test]
    async fn test_concurrent_creates_on_empty_store() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("data").join("posts.json");
        let repo = JsonFileRepo::new(&path);
        let other = JsonFileRepo::new(&path);

        let (a, b) = tokio::join!(
            repo.create_post(new_post("A", None)),
            other.create_post(new_post("B", None))
        );
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_ne!(a.id, b.id);
        let posts = repo.get_posts().await.unwrap();
        assert_eq!(posts.len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_parallel_writers_lose_nothing() {
        let temp = TempDir::new().unwrap();
        let repo = store_in(&temp);

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let repo = repo.clone();
                tokio::spawn(async move {
                    repo.create_post(new_post(&format!("Post {i}"), None)).await
                })
            })
            .collect();

        let mut ids = HashSet::new();
        for handle in handles {
            let post = handle.await.unwrap().unwrap();
            assert!(ids.insert(post.id));
        }

        let posts = repo.get_posts().await.unwrap();
        assert_eq!(posts.len(), 16);
    }
}
