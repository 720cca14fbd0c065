use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::domain::ObjectRef;
use crate::error::ArcError;

pub const CONFIG_FILE: &str = "omero-arc.json";
pub const PASSWORD_ENV: &str = "OMERO_PASSWORD";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub server: Option<ServerEntry>,
    #[serde(default)]
    pub arc_executable: Option<String>,
    #[serde(default)]
    pub image_root: Option<String>,
    #[serde(default)]
    pub image_mapping: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct ServerEntry {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub server_id: Option<u32>,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    pub url: String,
    pub server_id: Option<u32>,
    pub username: String,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub server: Option<ServerSettings>,
    pub arc_executable: Option<PathBuf>,
    pub image_root: Option<PathBuf>,
    pub image_mapping: Option<PathBuf>,
}

impl ResolvedConfig {
    pub fn require_server(&self) -> Result<&ServerSettings, ArcError> {
        self.server
            .as_ref()
            .ok_or_else(|| ArcError::MissingCredentials("server.url and server.username".to_string()))
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Explicit path, else `./omero-arc.json`, else the per-user config file.
    /// With no file anywhere the defaults are used.
    pub fn resolve(path: Option<&Path>) -> Result<ResolvedConfig, ArcError> {
        let config_path = match path {
            Some(path) => Some(path.to_path_buf()),
            None => Self::discover(),
        };

        let config = match config_path {
            Some(config_path) => {
                let content = fs::read_to_string(&config_path)
                    .map_err(|_| ArcError::ConfigRead(config_path.clone()))?;
                tracing::debug!(path = %config_path.display(), "loaded config");
                serde_json::from_str(&content)
                    .map_err(|err| ArcError::ConfigParse(err.to_string()))?
            }
            None => Config::default(),
        };

        Self::resolve_config(config)
    }

    fn discover() -> Option<PathBuf> {
        let local = PathBuf::from(CONFIG_FILE);
        if local.exists() {
            return Some(local);
        }
        ProjectDirs::from("org", "omero-arc", "omero-arc")
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE))
            .filter(|path| path.exists())
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, ArcError> {
        let schema_version = config.schema_version.unwrap_or(1);

        let server = match config.server {
            Some(ServerEntry {
                url: Some(url),
                server_id,
                username: Some(username),
            }) => Some(ServerSettings {
                url,
                server_id,
                username,
            }),
            Some(ServerEntry { url: None, .. }) => {
                return Err(ArcError::MissingCredentials("server.url".to_string()));
            }
            Some(ServerEntry { username: None, .. }) => {
                return Err(ArcError::MissingCredentials("server.username".to_string()));
            }
            None => None,
        };

        Ok(ResolvedConfig {
            schema_version,
            server,
            arc_executable: config.arc_executable.map(PathBuf::from),
            image_root: config.image_root.map(PathBuf::from),
            image_mapping: config.image_mapping.map(PathBuf::from),
        })
    }
}

pub fn password_from_env() -> Result<String, ArcError> {
    std::env::var(PASSWORD_ENV)
        .ok()
        .filter(|value| !value.is_empty())
        .ok_or_else(|| ArcError::MissingCredentials(PASSWORD_ENV.to_string()))
}

/// `Image:<id>` -> file path relative to the image root of an export.
#[derive(Debug, Clone, Default)]
pub struct ImageFileMapping {
    root: PathBuf,
    files: BTreeMap<ObjectRef, PathBuf>,
}

impl ImageFileMapping {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            files: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, image_id: i64, relative: impl Into<PathBuf>) {
        self.files.insert(ObjectRef::image(image_id), relative.into());
    }

    /// Reads a JSON object such as `{"Image:12": "pixel_images/12.czi"}`.
    pub fn load(root: impl Into<PathBuf>, mapping_file: &Path) -> Result<Self, ArcError> {
        let content = fs::read_to_string(mapping_file)
            .map_err(|_| ArcError::ConfigRead(mapping_file.to_path_buf()))?;
        let raw: BTreeMap<String, String> = serde_json::from_str(&content)
            .map_err(|err| ArcError::ConfigParse(err.to_string()))?;
        let mut mapping = Self::new(root);
        for (key, path) in raw {
            let object: ObjectRef = key.parse()?;
            mapping.files.insert(object, PathBuf::from(path));
        }
        Ok(mapping)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn relative(&self, image_id: i64) -> Result<&Path, ArcError> {
        let key = ObjectRef::image(image_id);
        self.files
            .get(&key)
            .map(PathBuf::as_path)
            .ok_or_else(|| ArcError::MissingImageFile(key.to_string()))
    }

    pub fn absolute(&self, image_id: i64) -> Result<PathBuf, ArcError> {
        Ok(self.root.join(self.relative(image_id)?))
    }

    pub fn file_name(&self, image_id: i64) -> Result<String, ArcError> {
        let relative = self.relative(image_id)?;
        relative
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| ArcError::MissingImageFile(format!("Image:{image_id}")))
    }
}
