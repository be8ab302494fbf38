use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{Error, Result};

pub const DEFAULT_IMAGE: &str = "/images/default.jpg";
pub const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Deserialize, Serialize, sqlx::FromRow, Clone, PartialEq, Eq)]
pub struct Post {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub image: String,
    pub date: String,
}

impl Post {
    pub fn published_on(&self) -> Option<NaiveDate> {
        parse_post_date(&self.date)
    }
}

/// Newest first. Stable, so equal dates keep their stored order and
/// unparseable dates end up last.
pub fn sort_newest_first(posts: &mut [Post]) {
    posts.sort_by(|a, b| b.published_on().cmp(&a.published_on()));
}

pub fn parse_post_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, DATE_FORMAT)
        .ok()
        .or_else(|| {
            DateTime::parse_from_rfc3339(raw)
                .ok()
                .map(|dt| dt.date_naive())
        })
}

pub fn today() -> String {
    Utc::now().date_naive().format(DATE_FORMAT).to_string()
}

/// Body of `POST /posts` and `PUT /posts/{id}`, from JSON or multipart text fields.
#[derive(Debug, Default, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PostDto {
    #[serde(default)]
    #[validate(length(min = 1, message = "Title is required"))]
    pub title: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "Description is required"))]
    pub description: String,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

impl PostDto {
    /// `imageUrl` wins over `image`; blank values count as absent.
    fn image_source(&self) -> Option<String> {
        non_blank(self.image_url.as_deref()).or_else(|| non_blank(self.image.as_deref()))
    }

    /// Surrounding whitespace is not content; a blank title fails validation.
    fn trimmed(mut self) -> Self {
        self.title = self.title.trim().to_string();
        self.description = self.description.trim().to_string();
        self
    }

    pub fn into_new_post(self) -> Result<NewPost> {
        let this = self.trimmed();
        this.validate()?;

        let date = match non_blank(this.date.as_deref()) {
            Some(raw) => Some(normalize_date(&raw)?),
            None => None,
        };

        Ok(NewPost {
            image: this.image_source(),
            title: this.title,
            description: this.description,
            date,
        })
    }

    pub fn into_changes(self) -> Result<PostChanges> {
        let this = self.trimmed();
        this.validate()?;

        let date = non_blank(this.date.as_deref())
            .ok_or_else(|| Error::BadRequest("Title, description, and date are required".to_string()))?;

        Ok(PostChanges {
            date: normalize_date(&date)?,
            image: this.image_source(),
            title: this.title,
            description: this.description,
        })
    }
}

/// A validated create request. Missing `image`/`date` are filled by the store.
#[derive(Debug, Clone)]
pub struct NewPost {
    pub title: String,
    pub description: String,
    pub image: Option<String>,
    pub date: Option<String>,
}

impl NewPost {
    pub fn image_or_default(&self) -> String {
        self.image.clone().unwrap_or_else(|| DEFAULT_IMAGE.to_string())
    }

    pub fn date_or_today(&self) -> String {
        self.date.clone().unwrap_or_else(today)
    }

    pub fn into_post(self, id: i64) -> Post {
        Post {
            id,
            image: self.image_or_default(),
            date: self.date_or_today(),
            title: self.title,
            description: self.description,
        }
    }
}

/// A validated update. `image: None` keeps whatever the post already has.
#[derive(Debug, Clone)]
pub struct PostChanges {
    pub title: String,
    pub description: String,
    pub date: String,
    pub image: Option<String>,
}

impl PostChanges {
    pub fn apply_to(self, post: &mut Post) {
        post.title = self.title;
        post.description = self.description;
        post.date = self.date;
        if let Some(image) = self.image {
            post.image = image;
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn normalize_date(raw: &str) -> Result<String> {
    parse_post_date(raw)
        .map(|date| date.format(DATE_FORMAT).to_string())
        .ok_or_else(|| Error::BadRequest(format!("Invalid date `{raw}`, expected YYYY-MM-DD")))
}
