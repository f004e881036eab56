//! Typed endpoints of the professional-networking API.

use std::sync::Arc;

use async_trait::async_trait;
use prok_core::{
    mime_for, validate_login, validate_post_draft, validate_upload, ApiError, ItemId,
    ListingEnvelope, PageResult, Query, Record, UploadRules, POST_MEDIA, PROFILE_IMAGE,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crate::loader::PageSource;
use crate::request::RequestClient;
use crate::session::StoredCredential;
use crate::transport::{ApiRequest, FormPart};
use crate::Error;

/// A file picked for upload.
#[derive(Debug, Clone, PartialEq)]
pub struct Upload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl Upload {
    fn into_part(self, rules: &UploadRules) -> Result<FormPart, ApiError> {
        validate_upload(rules, &self.file_name, self.bytes.len())?;
        Ok(FormPart::File {
            name: rules.field.to_string(),
            mime: mime_for(&self.file_name).to_string(),
            file_name: self.file_name,
            bytes: self.bytes,
        })
    }
}

/// Fields of a new post.
#[derive(Debug, Clone, PartialEq)]
pub struct PostDraft {
    pub title: String,
    pub content: String,
    pub category: Option<String>,
    pub tags: Vec<String>,
    pub is_public: bool,
    pub allow_comments: bool,
    pub media: Option<Upload>,
}

impl PostDraft {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            category: None,
            tags: Vec::new(),
            is_public: true,
            allow_comments: true,
            media: None,
        }
    }

    fn into_parts(self) -> Result<Vec<FormPart>, ApiError> {
        validate_post_draft(&self.title, &self.content)?;
        let text = |name: &str, value: String| FormPart::Text {
            name: name.to_string(),
            value,
        };
        let mut parts = vec![
            text("title", self.title.trim().to_string()),
            text("content", self.content.trim().to_string()),
            text("category", self.category.unwrap_or_default()),
            text("tags", self.tags.join(",")),
            text("is_public", self.is_public.to_string()),
            text("allow_comments", self.allow_comments.to_string()),
        ];
        if let Some(media) = self.media {
            parts.push(media.into_part(&POST_MEDIA)?);
        }
        Ok(parts)
    }
}

#[derive(Deserialize)]
struct LoginResponse {
    token: String,
    #[serde(default)]
    user: Value,
}

#[derive(Deserialize)]
struct CategoriesResponse {
    #[serde(default)]
    categories: Vec<String>,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    tags: Vec<String>,
}

#[derive(Deserialize)]
struct ImageResponse {
    url: String,
}

/// Entry point for every typed call. Cheap to clone.
#[derive(Clone)]
pub struct ProkApi {
    client: Arc<RequestClient>,
}

impl ProkApi {
    pub fn new(client: Arc<RequestClient>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &RequestClient {
        &self.client
    }

    // -- auth

    /// Logs in and persists the returned credential.
    pub async fn login(&self, email: &str, password: &str) -> Result<StoredCredential, Error> {
        validate_login(email, password)?;
        let req = ApiRequest::post("/api/login")
            .with_json(json!({ "email": email.trim(), "password": password }));
        let resp: LoginResponse = self.client.send_as(&req).await?;
        let credential = StoredCredential {
            token: resp.token,
            user: resp.user,
        };
        self.client.session().login(credential.clone())?;
        info!("logged in as {}", email.trim());
        Ok(credential)
    }

    pub async fn signup(&self, username: &str, email: &str, password: &str) -> Result<Value, ApiError> {
        if username.trim().is_empty() {
            return Err(ApiError::validation("username is required"));
        }
        validate_login(email, password)?;
        let req = ApiRequest::post("/api/signup").with_json(json!({
            "username": username.trim(),
            "email": email.trim(),
            "password": password,
        }));
        self.client.send(&req).await
    }

    pub fn logout(&self) -> Result<(), Error> {
        self.client.session().logout()?;
        Ok(())
    }

    // -- posts

    pub async fn list_posts(&self, query: &Query) -> Result<PageResult<Record>, ApiError> {
        self.posts().fetch_page(query).await
    }

    pub async fn get_post(&self, id: &ItemId) -> Result<Record, ApiError> {
        self.client.send_as(&ApiRequest::get(format!("/api/posts/{id}"))).await
    }

    pub async fn create_post(&self, draft: PostDraft) -> Result<Record, ApiError> {
        let req = ApiRequest::post("/api/posts/").with_multipart(draft.into_parts()?);
        self.client.send_as(&req).await
    }

    pub async fn like_post(&self, id: &ItemId) -> Result<Value, ApiError> {
        self.client.send(&ApiRequest::post(format!("/api/posts/{id}/like"))).await
    }

    pub async fn delete_post(&self, id: &ItemId) -> Result<Value, ApiError> {
        self.client.send(&ApiRequest::delete(format!("/api/posts/{id}"))).await
    }

    pub async fn categories(&self) -> Result<Vec<String>, ApiError> {
        let resp: CategoriesResponse = self
            .client
            .send_as(&ApiRequest::get("/api/posts/categories"))
            .await?;
        Ok(resp.categories)
    }

    pub async fn popular_tags(&self) -> Result<Vec<String>, ApiError> {
        let resp: TagsResponse = self
            .client
            .send_as(&ApiRequest::get("/api/posts/popular-tags"))
            .await?;
        Ok(resp.tags)
    }

    // -- feed

    pub async fn feed(&self) -> Result<Vec<Record>, ApiError> {
        let resp: ListingEnvelope<Record> = self.client.send_as(&ApiRequest::get("/api/feed/")).await?;
        Ok(resp.items)
    }

    // -- jobs

    pub async fn list_jobs(&self, query: &Query) -> Result<PageResult<Record>, ApiError> {
        self.jobs().fetch_page(query).await
    }

    pub async fn get_job(&self, id: &ItemId) -> Result<Record, ApiError> {
        self.client.send_as(&ApiRequest::get(format!("/api/jobs/{id}"))).await
    }

    pub async fn apply_for_job(&self, id: &ItemId) -> Result<Value, ApiError> {
        self.client.send(&ApiRequest::post(format!("/api/jobs/{id}/apply"))).await
    }

    // -- profile

    pub async fn profile(&self) -> Result<Value, ApiError> {
        self.client.send(&ApiRequest::get("/api/profile/")).await
    }

    pub async fn update_profile(&self, profile: Value) -> Result<Value, ApiError> {
        if !profile.is_object() {
            return Err(ApiError::validation("profile must be a JSON object"));
        }
        self.client.send(&ApiRequest::put("/api/profile/").with_json(profile)).await
    }

    /// Uploads an avatar and returns its URL.
    pub async fn upload_profile_image(&self, image: Upload) -> Result<String, ApiError> {
        let part = image.into_part(&PROFILE_IMAGE)?;
        let req = ApiRequest::post("/api/profile/image").with_multipart(vec![part]);
        let resp: ImageResponse = self.client.send_as(&req).await?;
        Ok(resp.url)
    }

    // -- listings

    /// Paged post listing, usable as a loader source.
    pub fn posts(&self) -> Listing {
        Listing::new(Arc::clone(&self.client), "/api/posts/")
    }

    pub fn jobs(&self) -> Listing {
        Listing::new(Arc::clone(&self.client), "/api/jobs/")
    }
}

/// A paged, filterable listing endpoint.
#[derive(Clone)]
pub struct Listing {
    client: Arc<RequestClient>,
    path: &'static str,
}

impl Listing {
    pub fn new(client: Arc<RequestClient>, path: &'static str) -> Self {
        Self { client, path }
    }

    pub fn path(&self) -> &'static str {
        self.path
    }
}

#[async_trait]
impl PageSource<Record> for Listing {
    async fn fetch_page(&self, query: &Query) -> Result<PageResult<Record>, ApiError> {
        let req = ApiRequest::get(self.path).with_query(query.to_params());
        let envelope: ListingEnvelope<Record> = self.client.send_as(&req).await?;
        Ok(PageResult::from_envelope(envelope, query.clone()))
    }
}
