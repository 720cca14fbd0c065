use std::thread;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, REFERER, USER_AGENT};
use serde_json::Value;

use crate::config::ServerSettings;
use crate::domain::{
    Annotation, Dataset, Experimenter, Image, ObjectKind, ObjectRef, OriginalMetadata,
    PhysicalSize, Project,
};
use crate::error::ArcError;

const PAGE_SIZE: usize = 200;

/// Read access to the OMERO objects an ARC is built from.
pub trait OmeroClient: Send + Sync {
    fn project(&self, id: i64) -> Result<Project, ArcError>;
    fn datasets(&self, project_id: i64) -> Result<Vec<Dataset>, ArcError>;
    fn images(&self, dataset_id: i64) -> Result<Vec<Image>, ArcError>;
    fn annotations(&self, object: ObjectRef) -> Result<Vec<Annotation>, ArcError>;
    fn original_metadata(&self, image_id: i64) -> Result<OriginalMetadata, ArcError>;
}

/// Client for the OMERO.web JSON API, logged in with a session cookie.
#[derive(Clone)]
pub struct OmeroHttpClient {
    client: Client,
    base_url: String,
}

impl OmeroHttpClient {
    pub fn connect(settings: &ServerSettings, password: &str) -> Result<Self, ArcError> {
        let base_url = settings.url.trim_end_matches('/').to_string();
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("omero-arc/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| ArcError::OmeroHttp(err.to_string()))?,
        );
        // Django's CSRF check insists on a same-origin referer over https.
        headers.insert(
            REFERER,
            HeaderValue::from_str(&format!("{base_url}/"))
                .map_err(|err| ArcError::OmeroHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .cookie_store(true)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|err| ArcError::OmeroHttp(err.to_string()))?;

        let omero = Self { client, base_url };
        omero.login(settings, password)?;
        Ok(omero)
    }

    fn login(&self, settings: &ServerSettings, password: &str) -> Result<(), ArcError> {
        let token = self.get_json(&format!("{}/api/v0/token/", self.base_url), &[])?;
        let token = token
            .get("data")
            .and_then(Value::as_str)
            .ok_or_else(|| ArcError::OmeroResponse("missing CSRF token".to_string()))?
            .to_string();

        let server_id = settings.server_id.unwrap_or(1).to_string();
        let response = self
            .client
            .post(format!("{}/api/v0/login/", self.base_url))
            .header("X-CSRFToken", token)
            .form(&[
                ("server", server_id.as_str()),
                ("username", settings.username.as_str()),
                ("password", password),
            ])
            .send()
            .map_err(|err| ArcError::OmeroHttp(err.to_string()))?;
        let body: Value = Self::handle_status(response)?
            .json()
            .map_err(|err| ArcError::OmeroHttp(err.to_string()))?;
        if body.get("success").and_then(Value::as_bool) != Some(true) {
            let message = body
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("login rejected")
                .to_string();
            return Err(ArcError::OmeroStatus {
                status: 403,
                message,
            });
        }
        tracing::info!(user = %settings.username, server = %self.base_url, "logged in to OMERO");
        Ok(())
    }

    fn handle_status(
        response: reqwest::blocking::Response,
    ) -> Result<reqwest::blocking::Response, ArcError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let message = response
            .text()
            .unwrap_or_else(|_| "OMERO request failed".to_string());
        Err(ArcError::OmeroStatus { status, message })
    }

    fn send_with_retries<F>(
        &self,
        mut make_req: F,
    ) -> Result<reqwest::blocking::Response, ArcError>
    where
        F: FnMut() -> reqwest::blocking::RequestBuilder,
    {
        const MAX_RETRIES: usize = 3;
        const BASE_DELAY_MS: u64 = 200;
        let mut attempt = 0usize;
        loop {
            let response = make_req().send();
            match response {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < MAX_RETRIES && is_retryable_status(status) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < MAX_RETRIES && is_retryable_error(&err) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Err(ArcError::OmeroHttp(err.to_string()));
                }
            }
        }
    }

    fn get_json(&self, url: &str, query: &[(&str, String)]) -> Result<Value, ArcError> {
        tracing::debug!(%url, "GET");
        let response = self.send_with_retries(|| self.client.get(url).query(query))?;
        Self::handle_status(response)?
            .json()
            .map_err(|err| ArcError::OmeroHttp(err.to_string()))
    }

    /// Follows `limit`/`offset` paging of a JSON API list until `totalCount`.
    fn get_all(&self, url: &str) -> Result<Vec<Value>, ArcError> {
        let mut items = Vec::new();
        loop {
            let page = self.get_json(
                url,
                &[
                    ("limit", PAGE_SIZE.to_string()),
                    ("offset", items.len().to_string()),
                ],
            )?;
            let data = page
                .get("data")
                .and_then(Value::as_array)
                .ok_or_else(|| ArcError::OmeroResponse(format!("{url}: missing data")))?;
            let fetched = data.len();
            items.extend(data.iter().cloned());
            let total = page
                .pointer("/meta/totalCount")
                .and_then(Value::as_u64)
                .map(|total| total as usize)
                .unwrap_or(items.len());
            if fetched == 0 || items.len() >= total {
                return Ok(items);
            }
        }
    }
}

impl OmeroClient for OmeroHttpClient {
    fn project(&self, id: i64) -> Result<Project, ArcError> {
        let body = self.get_json(&format!("{}/api/v0/m/projects/{id}/", self.base_url), &[])?;
        let data = body
            .get("data")
            .ok_or_else(|| ArcError::OmeroResponse(format!("Project:{id} missing data")))?;
        parse_project(data)
    }

    fn datasets(&self, project_id: i64) -> Result<Vec<Dataset>, ArcError> {
        let url = format!("{}/api/v0/m/projects/{project_id}/datasets/", self.base_url);
        self.get_all(&url)?.iter().map(parse_dataset).collect()
    }

    fn images(&self, dataset_id: i64) -> Result<Vec<Image>, ArcError> {
        let url = format!("{}/api/v0/m/datasets/{dataset_id}/images/", self.base_url);
        self.get_all(&url)?.iter().map(parse_image).collect()
    }

    fn annotations(&self, object: ObjectRef) -> Result<Vec<Annotation>, ArcError> {
        let url = format!("{}/webclient/api/annotations/", self.base_url);
        let mut annotations = Vec::new();
        let mut page = 1usize;
        loop {
            let body = self.get_json(
                &url,
                &[
                    ("type", "map".to_string()),
                    (object.kind.query_key(), object.id.to_string()),
                    ("page", page.to_string()),
                    ("limit", PAGE_SIZE.to_string()),
                ],
            )?;
            let batch = parse_annotations(&body)?;
            let fetched = batch.len();
            annotations.extend(batch);
            if fetched < PAGE_SIZE {
                return Ok(annotations);
            }
            page += 1;
        }
    }

    fn original_metadata(&self, image_id: i64) -> Result<OriginalMetadata, ArcError> {
        let url = format!(
            "{}/webclient/api/original_metadata/{image_id}/",
            self.base_url
        );
        let body = self.get_json(&url, &[])?;
        Ok(parse_original_metadata(&body))
    }
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}

fn object_id(value: &Value, kind: ObjectKind) -> Result<i64, ArcError> {
    value
        .get("@id")
        .and_then(Value::as_i64)
        .ok_or_else(|| ArcError::OmeroResponse(format!("{kind} without @id")))
}

fn string_field(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn parse_owner(value: &Value) -> Experimenter {
    let owner = value.pointer("/omero:details/owner");
    Experimenter {
        first_name: owner.and_then(|o| string_field(o, "FirstName")),
        last_name: owner.and_then(|o| string_field(o, "LastName")),
        email: owner.and_then(|o| string_field(o, "Email")),
    }
}

pub fn parse_project(value: &Value) -> Result<Project, ArcError> {
    Ok(Project {
        id: object_id(value, ObjectKind::Project)?,
        name: string_field(value, "Name").unwrap_or_default(),
        description: string_field(value, "Description"),
        owner: parse_owner(value),
    })
}

pub fn parse_dataset(value: &Value) -> Result<Dataset, ArcError> {
    Ok(Dataset {
        id: object_id(value, ObjectKind::Dataset)?,
        name: string_field(value, "Name").unwrap_or_default(),
        description: string_field(value, "Description"),
        owner: parse_owner(value),
    })
}

fn physical_size(pixels: Option<&Value>, key: &str) -> Option<PhysicalSize> {
    let size = pixels?.get(key)?;
    Some(PhysicalSize {
        value: size.get("Value")?.as_f64()?,
        unit: string_field(size, "Unit").or_else(|| string_field(size, "Symbol")),
    })
}

pub fn parse_image(value: &Value) -> Result<Image, ArcError> {
    let pixels = value.get("Pixels");
    let count = |key: &str| pixels.and_then(|p| p.get(key)).and_then(Value::as_u64);
    Ok(Image {
        id: object_id(value, ObjectKind::Image)?,
        name: string_field(value, "Name").unwrap_or_default(),
        description: string_field(value, "Description"),
        size_x: count("SizeX"),
        size_y: count("SizeY"),
        size_z: count("SizeZ"),
        pixel_size_x: physical_size(pixels, "PhysicalSizeX"),
        pixel_size_y: physical_size(pixels, "PhysicalSizeY"),
        pixel_size_z: physical_size(pixels, "PhysicalSizeZ"),
    })
}

fn pair_list(value: Option<&Value>) -> Vec<(String, Value)> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| {
                let pair = item.as_array()?;
                let key = pair.first()?.as_str()?.to_string();
                let value = pair.get(1).cloned().unwrap_or(Value::Null);
                Some((key, value))
            })
            .collect(),
        Some(Value::Object(map)) => map
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect(),
        _ => Vec::new(),
    }
}

pub fn parse_annotations(body: &Value) -> Result<Vec<Annotation>, ArcError> {
    let items = body
        .get("annotations")
        .and_then(Value::as_array)
        .ok_or_else(|| ArcError::OmeroResponse("missing annotations".to_string()))?;
    Ok(items
        .iter()
        .map(|item| Annotation {
            namespace: string_field(item, "ns"),
            values: pair_list(item.get("values"))
                .into_iter()
                .map(|(key, value)| {
                    let value = match value {
                        Value::String(text) => text,
                        Value::Null => String::new(),
                        other => other.to_string(),
                    };
                    (key, value)
                })
                .collect(),
        })
        .collect())
}

pub fn parse_original_metadata(body: &Value) -> OriginalMetadata {
    OriginalMetadata {
        series: pair_list(body.get("series_metadata")),
        global: pair_list(body.get("global_metadata")),
    }
}
