use axum::{
    extract::{FromRequestParts, Path},
    http::request::Parts,
};

use crate::Error;

/// The `{id}` segment of a post route. Anything that isn't an integer id
/// can't name a post, so it is reported as not found.
#[derive(Debug, Clone, Copy)]
pub struct PostId(pub i64);

impl<S> FromRequestParts<S> for PostId
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(id): Path<i64> = Path::from_request_parts(parts, state)
            .await
            .map_err(|_| Error::NotFound)?;

        Ok(Self(id))
    }
}
