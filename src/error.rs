use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum ArcError {
    #[error("invalid object reference: {0}")]
    InvalidObjectRef(String),

    #[error("only projects can be packed as an ARC, got {0}")]
    #[diagnostic(help("pass a reference of the form Project:<id>"))]
    NotAProject(String),

    #[error("only one annotation allowed for {namespace}, found {count}")]
    DuplicateAnnotation { namespace: String, count: usize },

    #[error("no {0} resolved for command rendering")]
    MissingIdentifier(&'static str),

    #[error("target directory already exists: {0}")]
    #[diagnostic(help("remove it, or point at an existing ARC (a directory containing .arc)"))]
    RepositoryExists(PathBuf),

    #[error("{kind} identifier {identifier} already exists in the ARC")]
    IdentifierCollision {
        kind: &'static str,
        identifier: String,
    },

    #[error("unknown assay: {0}")]
    UnknownAssay(String),

    #[error("assay workbook not found: {0}")]
    MissingWorkbook(PathBuf),

    #[error("no image file mapped for {0}")]
    MissingImageFile(String),

    #[error("no image file mapping given")]
    #[diagnostic(help("pass --mapping <FILE> or set image_mapping in omero-arc.json"))]
    MissingImageMapping,

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("missing OMERO connection settings: {0}")]
    #[diagnostic(help("set server.url and server.username in omero-arc.json and export OMERO_PASSWORD"))]
    MissingCredentials(String),

    #[error("OMERO request failed: {0}")]
    OmeroHttp(String),

    #[error("OMERO returned status {status}: {message}")]
    OmeroStatus { status: u16, message: String },

    #[error("unexpected OMERO response: {0}")]
    OmeroResponse(String),

    #[error("required tool not found: {0}")]
    MissingTool(String),

    #[error("failed to run {program}: {message}")]
    CommandSpawn { program: String, message: String },

    #[error("workbook error: {0}")]
    Workbook(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}
