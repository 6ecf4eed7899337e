//! Typed HTTP client for the preservation catalog (spec §4.C).
//!
//! A cookie-jar-bearing `reqwest::Client` carries a pair of API auth headers
//! on every request. Identifiers containing slashes are `%2F`-escaped in URL
//! paths — the catalog 404s on a raw `/` in an identifier segment.

mod dto;
mod identifier;

use std::collections::HashMap;

use archivist_error::{Error, Result};
use archivist_model::{Event, PayloadFile};
use chrono::{DateTime, Utc};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;

pub use dto::{
    dto_files_from, FileDto, FileSummary, Institution, NewPreservationObject, PreservationObjectDto,
    ProcessStatusDto,
};
use identifier::escape_identifier;

const MAX_RESPONSE_BODY_EXCERPT: usize = 1000;
/// Batch-create cap: a single create payload with 10 000+ files causes
/// catalog failure (spec §4.C).
const MAX_FILES_PER_BATCH: usize = 500;

/// Which endpoint family an event belongs to — object events and file
/// events are saved through different routes.
#[derive(Debug, Clone, Copy)]
pub enum EntityKind {
    Object,
    File,
}

pub struct Client {
    http: reqwest::Client,
    base_url: String,
    user: String,
    key: String,
    institutions: parking_lot::Mutex<Option<Vec<Institution>>>,
}

impl Client {
    pub fn new(base_url: impl Into<String>, user: impl Into<String>, key: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .cookie_store(true)
            .build()
            .map_err(|e| Error::configuration(format!("could not build HTTP client: {e}")))?;
        Ok(Client {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            user: user.into(),
            key: key.into(),
            institutions: parking_lot::Mutex::new(None),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn request<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<Option<T>> {
        let mut req = self
            .http
            .request(method.clone(), self.url(path))
            .header("Content-Type", "application/json")
            .header("X-Pharos-API-User", &self.user)
            .header("X-Pharos-API-Key", &self.key);
        if let Some(body) = body {
            req = req.json(body);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| Error::transient(format!("{method} {path}: {e}")))?;

        let status = resp.status();
        if status == StatusCode::NOT_FOUND && method == Method::GET {
            return Ok(None);
        }
        if !matches!(
            status,
            StatusCode::OK | StatusCode::CREATED | StatusCode::NO_CONTENT
        ) {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::transient(format!(
                "{method} {path} returned {status}: {}",
                truncate(&body, MAX_RESPONSE_BODY_EXCERPT)
            )));
        }
        if status == StatusCode::NO_CONTENT {
            return Ok(None);
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| Error::transient(format!("{method} {path}: error reading body: {e}")))?;
        match serde_json::from_slice::<T>(&bytes) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                let excerpt: String = String::from_utf8_lossy(&bytes)
                    .chars()
                    .filter(|c| *c != '\n' && *c != '\r')
                    .take(MAX_RESPONSE_BODY_EXCERPT)
                    .collect();
                Err(Error::transient(format!(
                    "{method} {path}: could not decode JSON response ({e}): {excerpt}"
                )))
            }
        }
    }

    pub async fn institution_list(&self) -> Result<Vec<Institution>> {
        if let Some(cached) = self.institutions.lock().clone() {
            return Ok(cached);
        }
        let list: Vec<Institution> = self
            .request::<(), Vec<Institution>>(Method::GET, "/member-institutions", None)
            .await?
            .unwrap_or_default();
        *self.institutions.lock() = Some(list.clone());
        Ok(list)
    }

    pub async fn institution_get(&self, identifier: &str) -> Result<Option<Institution>> {
        let path = format!("/member-institutions/{}", escape_identifier(identifier));
        self.request::<(), Institution>(Method::GET, &path, None).await
    }

    pub async fn object_get(
        &self,
        identifier: &str,
        include_relations: bool,
    ) -> Result<Option<PreservationObjectDto>> {
        let mut path = format!("/objects/{}", escape_identifier(identifier));
        if include_relations {
            path.push_str("?include_relations=true");
        }
        self.request::<(), PreservationObjectDto>(Method::GET, &path, None)
            .await
    }

    /// The restore engine's entry point for step 1 of spec §4.H: a
    /// cheaper read than `object_get(..., include_relations=true)` that
    /// returns just enough per-file data to plan and run a restore.
    pub async fn object_file_summary(&self, identifier: &str) -> Result<Vec<FileSummary>> {
        let path = format!("/objects/{}/files/summary", escape_identifier(identifier));
        Ok(self
            .request::<(), Vec<FileSummary>>(Method::GET, &path, None)
            .await?
            .unwrap_or_default())
    }

    /// Creates a preservation object with at most [`MAX_FILES_PER_BATCH`]
    /// files in this call; the caller must follow up with
    /// [`Client::batch_file_save`] for the remainder (spec §4.C).
    pub async fn object_create(&self, object: &NewPreservationObject) -> Result<PreservationObjectDto> {
        let (first_batch, rest) = split_at_cap(&object.files, MAX_FILES_PER_BATCH);
        let mut first = object.clone();
        first.files = first_batch.to_vec();

        let created = self
            .request::<NewPreservationObject, PreservationObjectDto>(Method::POST, "/objects", Some(&first))
            .await?
            .ok_or_else(|| Error::transient("object_create: catalog returned no body"))?;

        if !rest.is_empty() {
            self.batch_file_save(&created.identifier, rest).await?;
        }
        Ok(created)
    }

    pub async fn object_update(
        &self,
        identifier: &str,
        object: &NewPreservationObject,
    ) -> Result<PreservationObjectDto> {
        let path = format!("/objects/{}", escape_identifier(identifier));
        self.request::<NewPreservationObject, PreservationObjectDto>(Method::PUT, &path, Some(object))
            .await?
            .ok_or_else(|| Error::transient("object_update: catalog returned no body"))
    }

    pub async fn file_get(&self, identifier: &str) -> Result<Option<FileDto>> {
        let path = format!("/files/{}", escape_identifier(identifier));
        self.request::<(), FileDto>(Method::GET, &path, None).await
    }

    /// Creates the file if absent, else updates it (spec §4.C).
    pub async fn file_save(&self, file: &FileDto) -> Result<FileDto> {
        if self.file_get(&file.identifier).await?.is_some() {
            let path = format!("/files/{}", escape_identifier(&file.identifier));
            self.request::<FileDto, FileDto>(Method::PUT, &path, Some(file))
                .await?
                .ok_or_else(|| Error::transient("file_save: catalog returned no body"))
        } else {
            self.request::<FileDto, FileDto>(Method::POST, "/files", Some(file))
                .await?
                .ok_or_else(|| Error::transient("file_save: catalog returned no body"))
        }
    }

    pub async fn file_delete(&self, identifier: &str) -> Result<()> {
        let path = format!("/files/{}", escape_identifier(identifier));
        self.request::<(), ()>(Method::DELETE, &path, None).await?;
        Ok(())
    }

    /// Create-only batch save, chunked to at most [`MAX_FILES_PER_BATCH`]
    /// files per call.
    pub async fn batch_file_save(&self, object_identifier: &str, files: &[FileDto]) -> Result<()> {
        for chunk in files.chunks(MAX_FILES_PER_BATCH) {
            let path = format!(
                "/objects/{}/files/batch",
                escape_identifier(object_identifier)
            );
            self.request::<[FileDto], ()>(Method::POST, &path, Some(chunk))
                .await?;
        }
        Ok(())
    }

    pub async fn event_save(
        &self,
        kind: EntityKind,
        parent_identifier: &str,
        event: &Event,
    ) -> Result<()> {
        let path = match kind {
            EntityKind::Object => format!(
                "/objects/{}/events",
                escape_identifier(parent_identifier)
            ),
            EntityKind::File => format!("/files/{}/events", escape_identifier(parent_identifier)),
        };
        self.request::<Event, ()>(Method::POST, &path, Some(event))
            .await?;
        Ok(())
    }

    pub async fn process_status_get_by_key(
        &self,
        etag: &str,
        name: &str,
        bag_date: DateTime<Utc>,
    ) -> Result<Option<ProcessStatusDto>> {
        let path = format!(
            "/process-status?etag={}&name={}&bag_date={}",
            escape_identifier(etag),
            escape_identifier(name),
            bag_date.to_rfc3339(),
        );
        Ok(self
            .request::<(), Vec<ProcessStatusDto>>(Method::GET, &path, None)
            .await?
            .and_then(|mut v| v.pop()))
    }

    pub async fn process_status_get_by_id(&self, id: u64) -> Result<Option<ProcessStatusDto>> {
        let path = format!("/process-status/{id}");
        self.request::<(), ProcessStatusDto>(Method::GET, &path, None).await
    }

    pub async fn process_status_search(
        &self,
        filters: &HashMap<String, String>,
    ) -> Result<Vec<ProcessStatusDto>> {
        let query: String = filters
            .iter()
            .map(|(k, v)| format!("{}={}", escape_identifier(k), escape_identifier(v)))
            .collect::<Vec<_>>()
            .join("&");
        let path = format!("/process-status?{query}");
        Ok(self
            .request::<(), Vec<ProcessStatusDto>>(Method::GET, &path, None)
            .await?
            .unwrap_or_default())
    }

    /// Creates if `record.id` is absent, updates otherwise (spec §4.C).
    pub async fn process_status_upsert(
        &self,
        record: &ProcessStatusDto,
    ) -> Result<ProcessStatusDto> {
        match record.id {
            Some(id) => {
                let path = format!("/process-status/{id}");
                self.request::<ProcessStatusDto, ProcessStatusDto>(Method::PUT, &path, Some(record))
                    .await?
                    .ok_or_else(|| Error::transient("process_status_upsert: catalog returned no body"))
            }
            None => self
                .request::<ProcessStatusDto, ProcessStatusDto>(Method::POST, "/process-status", Some(record))
                .await?
                .ok_or_else(|| Error::transient("process_status_upsert: catalog returned no body")),
        }
    }

    pub async fn items_pending_restore(&self) -> Result<Vec<ProcessStatusDto>> {
        Ok(self
            .request::<(), Vec<ProcessStatusDto>>(Method::GET, "/process-status/pending-restore", None)
            .await?
            .unwrap_or_default())
    }

    pub async fn items_pending_delete(&self) -> Result<Vec<ProcessStatusDto>> {
        Ok(self
            .request::<(), Vec<ProcessStatusDto>>(Method::GET, "/process-status/pending-delete", None)
            .await?
            .unwrap_or_default())
    }

    pub async fn files_not_checked_since(&self, since: DateTime<Utc>) -> Result<Vec<PayloadFile>> {
        let path = format!("/files/not-checked-since?t={}", since.to_rfc3339());
        Ok(self
            .request::<(), Vec<PayloadFile>>(Method::GET, &path, None)
            .await?
            .unwrap_or_default())
    }

    pub async fn bulk_status_since(&self, since: DateTime<Utc>) -> Result<Vec<ProcessStatusDto>> {
        let path = format!("/process-status/bulk?since={}", since.to_rfc3339());
        Ok(self
            .request::<(), Vec<ProcessStatusDto>>(Method::GET, &path, None)
            .await?
            .unwrap_or_default())
    }

    pub async fn set_restoration_status_bulk(
        &self,
        object_identifiers: &[String],
        status: &str,
    ) -> Result<()> {
        #[derive(Serialize)]
        struct Body<'a> {
            identifiers: &'a [String],
            status: &'a str,
        }
        self.request::<Body, ()>(
            Method::POST,
            "/process-status/restoration-bulk",
            Some(&Body {
                identifiers: object_identifiers,
                status,
            }),
        )
        .await?;
        Ok(())
    }

    pub async fn bulk_delete_test_data(&self) -> Result<()> {
        self.request::<(), ()>(Method::DELETE, "/admin/test-data", None)
            .await?;
        Ok(())
    }
}

fn split_at_cap<T: Clone>(items: &[T], cap: usize) -> (&[T], &[T]) {
    if items.len() <= cap {
        (items, &[])
    } else {
        items.split_at(cap)
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max).collect();
        format!("{head}…")
    }
}


#[cfg(test)]
mod http_tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn server_and_client() -> (MockServer, Client) {
        let server = MockServer::start().await;
        let client = Client::new(server.uri(), "user", "key").unwrap();
        (server, client)
    }

    #[tokio::test]
    async fn object_get_decodes_200_body() {
        let (server, client) = server_and_client().await;
        Mock::given(method("GET"))
            .and(path("/objects/inst.edu%2Fbag.one"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "identifier": "inst.edu/bag.one",
                "institution": "inst.edu",
                "title": "t",
                "description": "d",
                "access": "institution",
                "tags": [],
            })))
            .mount(&server)
            .await;

        let object = client.object_get("inst.edu/bag.one", false).await.unwrap();
        assert_eq!(object.unwrap().identifier, "inst.edu/bag.one");
    }

    #[tokio::test]
    async fn object_get_treats_404_as_none() {
        let (server, client) = server_and_client().await;
        Mock::given(method("GET"))
            .and(path("/objects/inst.edu%2Fmissing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let object = client.object_get("inst.edu/missing", false).await.unwrap();
        assert!(object.is_none());
    }

    #[tokio::test]
    async fn non_2xx_status_becomes_transient_error_with_body_excerpt() {
        let (server, client) = server_and_client().await;
        Mock::given(method("GET"))
            .and(path("/objects/inst.edu%2Fbroken"))
            .respond_with(ResponseTemplate::new(500).set_body_string("catalog exploded"))
            .mount(&server)
            .await;

        let err = client.object_get("inst.edu/broken", false).await.unwrap_err();
        assert!(err.retry());
        assert!(err.message.contains("500"));
        assert!(err.message.contains("catalog exploded"));
    }

    #[tokio::test]
    async fn event_save_posts_to_file_events_route() {
        let (server, client) = server_and_client().await;
        Mock::given(method("POST"))
            .and(path("/files/inst.edu.sample%2Fdata%2Fa.txt/events"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let event = archivist_model::Event::new(
            archivist_model::EventType::Ingest,
            "ingest",
            archivist_model::Outcome::Success,
            "",
            "archivist",
            "object",
        );
        client
            .event_save(EntityKind::File, "inst.edu.sample/data/a.txt", &event)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn institution_list_caches_after_first_call() {
        let (server, client) = server_and_client().await;
        Mock::given(method("GET"))
            .and(path("/member-institutions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"identifier": "inst.edu", "name": "Inst"},
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let first = client.institution_list().await.unwrap();
        let second = client.institution_list().await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 1);
    }
}
