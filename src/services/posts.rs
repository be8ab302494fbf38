use std::sync::Arc;

use tracing::info;

use crate::{
    models::posts::{NewPost, Post, PostChanges},
    repositories::PostsRepository,
    Result,
};

#[derive(Clone)]
pub struct PostsService {
    repo: Arc<dyn PostsRepository>,
}

impl PostsService {
    pub fn new(repo: Arc<dyn PostsRepository>) -> Self {
        Self { repo }
    }

    pub async fn get_posts(&self) -> Result<Vec<Post>> {
        let posts = self.repo.get_posts().await?;

        Ok(posts)
    }

    pub async fn get_post(&self, post_id: i64) -> Result<Post> {
        self.repo.get_post(post_id).await
    }

    pub async fn create_post(&self, new_post: NewPost) -> Result<Post> {
        let post = self.repo.create_post(new_post).await?;

        info!(post_id = post.id, title = %post.title, "post created");
        Ok(post)
    }

    pub async fn update_post(&self, post_id: i64, changes: PostChanges) -> Result<Post> {
        let post = self.repo.update_post(post_id, changes).await?;

        info!(post_id, "post updated");
        Ok(post)
    }

    pub async fn delete_post(&self, post_id: i64) -> Result<()> {
        self.repo.delete_post(post_id).await?;

        info!(post_id, "post deleted");
        Ok(())
    }
}
