use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct Response {
    pub status: &'static str,
    pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub success: bool,
    pub url: String,
    pub original_name: Option<String>,
    pub filename: String,
    pub size: usize,
    #[serde(rename = "type")]
    pub content_type: Option<String>,
}
