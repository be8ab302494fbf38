use async_trait::async_trait;

use crate::{
    models::posts::{NewPost, Post, PostChanges},
    Error, Result,
};

use super::PostgresRepo;

/// The five post operations every storage engine provides.
#[async_trait]
pub trait PostsRepository: Sync + Send {
    async fn get_posts(&self) -> Result<Vec<Post>>;
    async fn get_post(&self, post_id: i64) -> Result<Post>;
    async fn create_post(&self, new_post: NewPost) -> Result<Post>;
    async fn update_post(&self, post_id: i64, changes: PostChanges) -> Result<Post>;
    async fn delete_post(&self, post_id: i64) -> Result<()>;
}

// Expects:
//   CREATE TABLE posts (
//       id BIGSERIAL PRIMARY KEY,
//       title TEXT NOT NULL,
//       description TEXT NOT NULL,
//       image TEXT NOT NULL,
//       date DATE NOT NULL
//   );
const POST_COLUMNS: &str = "id, title, description, image, to_char(date, 'YYYY-MM-DD') AS date";

#[async_trait]
impl PostsRepository for PostgresRepo {
    async fn get_posts(&self) -> Result<Vec<Post>> {
        let posts = sqlx::query_as::<_, Post>(&format!(
            "SELECT {POST_COLUMNS} FROM posts ORDER BY posts.date DESC, posts.id ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(posts)
    }

    async fn get_post(&self, post_id: i64) -> Result<Post> {
        let post = sqlx::query_as::<_, Post>(&format!(
            "SELECT {POST_COLUMNS} FROM posts WHERE id = $1"
        ))
        .bind(post_id)
        .fetch_optional(&self.pool)
        .await?;

        post.ok_or(Error::NotFound)
    }

    async fn create_post(&self, new_post: NewPost) -> Result<Post> {
        let post = sqlx::query_as::<_, Post>(&format!(
            r#"
            INSERT INTO posts (title, description, image, date)
            VALUES ($1, $2, $3, $4::date)
            RETURNING {POST_COLUMNS}
            "#
        ))
        .bind(&new_post.title)
        .bind(&new_post.description)
        .bind(new_post.image_or_default())
        .bind(new_post.date_or_today())
        .fetch_one(&self.pool)
        .await?;

        Ok(post)
    }

    async fn update_post(&self, post_id: i64, changes: PostChanges) -> Result<Post> {
        let post = sqlx::query_as::<_, Post>(&format!(
            r#"
            UPDATE posts
            SET title = $2,
                description = $3,
                date = $4::date,
                image = COALESCE($5, image)
            WHERE id = $1
            RETURNING {POST_COLUMNS}
            "#
        ))
        .bind(post_id)
        .bind(&changes.title)
        .bind(&changes.description)
        .bind(&changes.date)
        .bind(changes.image.as_deref())
        .fetch_optional(&self.pool)
        .await?;

        post.ok_or(Error::NotFound)
    }

    async fn delete_post(&self, post_id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM posts WHERE id = $1")
            .bind(post_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound);
        }

        Ok(())
    }
}
