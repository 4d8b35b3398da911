//! Document management endpoints: listing, detail, upload, versions,
//! soft delete/restore and download.

use std::path::Path;

use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};

use crate::api::client::ApiClient;
use crate::api::error::ApiError;
use crate::api::types::{id_string, Page};

use super::{ensure_success, read_body};

/// Page size the backend uses for the inactive (archived) document list.
pub const INACTIVE_PAGE_SIZE: u64 = 10;

/// Document as listed by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub department: String,
    #[serde(default)]
    pub document_type: String,
    #[serde(default)]
    pub file_size: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub publisher_name: Option<String>,
    #[serde(default)]
    pub published_date: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub total_versions: Option<u32>,
    #[serde(default)]
    pub is_vector_processed: Option<bool>,
}

/// One page of documents with navigation info.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentPage {
    pub documents: Vec<Document>,
    pub has_next_page: bool,
    pub has_previous_page: bool,
    pub total: Option<u64>,
    pub current_page: u64,
    pub total_pages: Option<u64>,
}

/// Shorten well-known department names for display.
pub fn short_department(name: &str) -> &str {
    match name {
        "Human Resources" => "HR",
        "Information Technology" => "IT",
        other => other,
    }
}

fn normalize(mut doc: Document) -> Document {
    let short = short_department(&doc.department);
    if short != doc.department {
        doc.department = short.to_string();
    }
    doc
}

fn into_page(page: Page<Document>, current_page: u64, page_size: Option<u64>) -> DocumentPage {
    let total_pages = match (page.count, page_size) {
        (Some(count), Some(size)) if size > 0 => Some(count.div_ceil(size)),
        _ => None,
    };
    DocumentPage {
        documents: page.results.into_iter().map(normalize).collect(),
        has_next_page: page.next.is_some(),
        has_previous_page: page.previous.is_some(),
        total: page.count,
        current_page,
        total_pages,
    }
}

/// File attached to an upload, read from disk.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl UploadFile {
    pub async fn from_path(path: &Path) -> Result<Self, ApiError> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string());
        Ok(Self { file_name, bytes })
    }

    fn into_part(self) -> Part {
        Part::bytes(self.bytes).file_name(self.file_name)
    }
}

/// Fields for a brand-new document. POST /api/documents/upload/
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub file: UploadFile,
    pub title: String,
    pub code: String,
    pub version: Option<String>,
    pub unit: Option<String>,
    pub branch: Option<String>,
    pub department_id: String,
    pub type_id: String,
    /// RFC 3339 issue date.
    pub issue_date: Option<String>,
}

impl NewDocument {
    pub fn into_form(self) -> Form {
        let mut form = Form::new()
            .part("file", self.file.into_part())
            .text("title", self.title)
            .text("code", self.code);
        if let Some(version) = self.version {
            form = form.text("version", version);
        }
        if let Some(unit) = self.unit {
            form = form.text("unit", unit);
        }
        if let Some(branch) = self.branch {
            form = form.text("branch", branch);
        }
        form = form
            .text("department_id", self.department_id)
            .text("type_id", self.type_id);
        if let Some(issue_date) = self.issue_date {
            form = form.text("issueDate", issue_date);
        }
        form
    }
}

/// Changes for a new or edited document version. Unset fields are omitted.
#[derive(Debug, Clone, Default)]
pub struct DocumentRevision {
    pub file: Option<UploadFile>,
    pub title: Option<String>,
    pub code: Option<String>,
    pub version: Option<String>,
    pub unit: Option<String>,
    pub branch: Option<String>,
    pub department_id: Option<String>,
    pub type_id: Option<String>,
    /// `YYYY-MM-DD` issue date.
    pub issue_date: Option<String>,
}

impl DocumentRevision {
    pub fn into_form(self) -> Form {
        let mut form = Form::new();
        if let Some(file) = self.file {
            form = form.part("file", file.into_part());
        }
        let fields = [
            ("title", self.title),
            ("code", self.code),
            ("version", self.version),
            ("unit", self.unit),
            ("branch", self.branch),
            ("department_id", self.department_id),
            ("type_id", self.type_id),
            ("issue_date", self.issue_date),
        ];
        for (name, value) in fields {
            if let Some(value) = value.filter(|v| !v.is_empty()) {
                form = form.text(name, value);
            }
        }
        form
    }
}

/// Every active document on the first backend page. GET /api/documents/list/
pub async fn list_all(api: &ApiClient) -> Result<Vec<Document>, ApiError> {
    let resp = api.get("/api/documents/list/").await?;
    let page: Page<Document> = read_body(resp).await?;
    Ok(page.results.into_iter().map(normalize).collect())
}

/// GET /api/documents/list/?page={page}
pub async fn list_page(api: &ApiClient, page: u64) -> Result<DocumentPage, ApiError> {
    let resp = api.get(&format!("/api/documents/list/?page={}", page)).await?;
    let body: Page<Document> = read_body(resp).await?;
    Ok(into_page(body, page, None))
}

/// Archived (soft-deleted) documents, ten per page.
pub async fn list_inactive_page(api: &ApiClient, page: u64) -> Result<DocumentPage, ApiError> {
    let path = format!(
        "/api/documents/list/?is_active=false&page_size={}&page={}",
        INACTIVE_PAGE_SIZE, page
    );
    let resp = api.get(&path).await?;
    let body: Page<Document> = read_body(resp).await?;
    let mut result = into_page(body, page, Some(INACTIVE_PAGE_SIZE));
    result.total.get_or_insert(0);
    result.total_pages.get_or_insert(0);
    Ok(result)
}

/// GET /api/documents/{id}/ (raw JSON, the detail shape varies by document)
pub async fn detail(api: &ApiClient, document_id: &str) -> Result<serde_json::Value, ApiError> {
    let path = format!("/api/documents/{}/", urlencoding::encode(document_id));
    read_body(api.get(&path).await?).await
}

pub async fn upload(api: &ApiClient, document: NewDocument) -> Result<serde_json::Value, ApiError> {
    log::info!("Uploading document {:?}", document.title);
    let resp = api
        .post_multipart("/api/documents/upload/", document.into_form())
        .await?;
    read_body(resp).await
}

/// Upload a new version of an existing document.
pub async fn upload_version(
    api: &ApiClient,
    document_id: &str,
    revision: DocumentRevision,
) -> Result<serde_json::Value, ApiError> {
    let path = format!(
        "/api/documents/{}/upload-version/",
        urlencoding::encode(document_id)
    );
    read_body(api.post_multipart(&path, revision.into_form()).await?).await
}

/// Edit the metadata (and optionally the file) of the current version.
pub async fn update_version(
    api: &ApiClient,
    document_id: &str,
    revision: DocumentRevision,
) -> Result<serde_json::Value, ApiError> {
    let path = format!(
        "/api/documents/{}/update-version/",
        urlencoding::encode(document_id)
    );
    read_body(api.patch_multipart(&path, revision.into_form()).await?).await
}

/// DELETE /api/documents/{id}/delete/ (moves the document to the archive)
pub async fn soft_delete(api: &ApiClient, document_id: &str) -> Result<(), ApiError> {
    let path = format!("/api/documents/{}/delete/", urlencoding::encode(document_id));
    ensure_success(api.delete(&path).await?).await?;
    log::info!("Document {} archived", document_id);
    Ok(())
}

/// POST /api/documents/{id}/restore/
pub async fn restore(api: &ApiClient, document_id: &str) -> Result<(), ApiError> {
    let path = format!("/api/documents/{}/restore/", urlencoding::encode(document_id));
    ensure_success(api.post_empty(&path).await?).await?;
    log::info!("Document {} restored", document_id);
    Ok(())
}

/// Raw file bytes. GET /api/documents/{id}/download/
pub async fn download(api: &ApiClient, document_id: &str) -> Result<Vec<u8>, ApiError> {
    let path = format!("/api/documents/{}/download/", urlencoding::encode(document_id));
    let resp = ensure_success(api.get(&path).await?).await?;
    Ok(resp.bytes().await?.to_vec())
}

pub async fn departments(api: &ApiClient) -> Result<Vec<serde_json::Value>, ApiError> {
    read_body(api.get("/api/departments/").await?).await
}

pub async fn document_types(api: &ApiClient) -> Result<Vec<serde_json::Value>, ApiError> {
    read_body(api.get("/api/document-types/").await?).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::credentials::{now_ms, CredentialPair};
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn doc_json(id: &str, department: &str) -> serde_json::Value {
        json!({
            "id": id,
            "title": format!("Policy {}", id),
            "department": department,
            "document_type": "Policy",
            "file_size": "1.2 MB",
            "version": "1",
            "published_date": "2024-05-01"
        })
    }

    fn logged_in(server: &MockServer) -> ApiClient {
        let client = ApiClient::new(&server.uri());
        client.set_credentials(CredentialPair {
            access_token: "access".to_string(),
            refresh_token: "refresh".to_string(),
            expires_at_ms: Some(now_ms() + 3_600_000),
        });
        client
    }

    #[test]
    fn test_short_department() {
        assert_eq!(short_department("Human Resources"), "HR");
        assert_eq!(short_department("Information Technology"), "IT");
        assert_eq!(short_department("Finance"), "Finance");
    }

    #[tokio::test]
    async fn test_list_page_normalizes_and_reports_navigation() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/documents/list/"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "body": {
                    "results": [doc_json("1", "Human Resources"), doc_json("2", "Legal")],
                    "next": "http://x/?page=3",
                    "previous": null
                }
            })))
            .mount(&server)
            .await;

        let client = logged_in(&server);
        let page = list_page(&client, 2).await.unwrap();

        assert_eq!(page.documents.len(), 2);
        assert_eq!(page.documents[0].department, "HR");
        assert_eq!(page.documents[1].department, "Legal");
        assert!(page.has_next_page);
        assert!(!page.has_previous_page);
        assert_eq!(page.current_page, 2);
        assert_eq!(page.total_pages, None);
    }

    #[tokio::test]
    async fn test_inactive_page_counts_pages() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/documents/list/"))
            .and(query_param("is_active", "false"))
            .and(query_param("page_size", "10"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "body": {
                    "results": [doc_json("9", "Information Technology")],
                    "count": 21,
                    "next": null,
                    "previous": "http://x/?page=2"
                }
            })))
            .mount(&server)
            .await;

        let client = logged_in(&server);
        let page = list_inactive_page(&client, 3).await.unwrap();

        assert_eq!(page.total, Some(21));
        assert_eq!(page.total_pages, Some(3));
        assert_eq!(page.documents[0].department, "IT");
        assert!(page.has_previous_page);
    }

    #[tokio::test]
    async fn test_soft_delete_surfaces_status_errors() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/api/documents/abc/delete/"))
            .respond_with(
                ResponseTemplate::new(403)
                    .set_body_json(json!({"result_message": "Permission denied"})),
            )
            .mount(&server)
            .await;

        let client = logged_in(&server);
        match soft_delete(&client, "abc").await {
            Err(ApiError::Status { status, message }) => {
                assert_eq!(status, 403);
                assert_eq!(message, "Permission denied");
            }
            other => panic!("expected status error, got {:?}", other),
        }
        assert!(client.is_authenticated());
    }

    #[tokio::test]
    async fn test_download_returns_bytes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/documents/abc/download/"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"%PDF-1.7".to_vec()))
            .mount(&server)
            .await;

        let client = logged_in(&server);
        let bytes = download(&client, "abc").await.unwrap();
        assert_eq!(bytes, b"%PDF-1.7");
    }

    #[tokio::test]
    async fn test_upload_file_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("handbook.pdf");
        std::fs::write(&file_path, b"pdf-bytes").unwrap();

        let file = UploadFile::from_path(&file_path).await.unwrap();
        assert_eq!(file.file_name, "handbook.pdf");
        assert_eq!(file.bytes, b"pdf-bytes");

        let missing = UploadFile::from_path(&dir.path().join("missing.pdf")).await;
        assert!(matches!(missing, Err(ApiError::Io(_))));
    }
}
