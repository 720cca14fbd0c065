use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;

use camino::Utf8PathBuf;
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;

use crate::app::{AssayResult, PackResult, ProgressEvent, ProgressSink};
use crate::commander::{ARC_TOOL, ArcCommander};
use crate::config::ImageFileMapping;
use crate::domain::{Dataset, Image, ObjectRef, Project};
use crate::error::ArcError;
use crate::fs_util;
use crate::mapper::{AssayMapper, InvestigationMapper, IsaMapper, StudyMapper};
use crate::omero::OmeroClient;
use crate::sheets::{self, Table};
use crate::xlsx;

const ARC_MARKER: &str = ".arc";
const ASSAY_WORKBOOK: &str = "isa.assay.xlsx";

pub fn is_arc_repo(path: &Path) -> bool {
    path.join(ARC_MARKER).exists()
}

#[derive(Debug, Clone)]
struct AssayEntry {
    identifier: String,
    dataset: Dataset,
    mapper: AssayMapper,
}

/// Builds an ARC repository from one OMERO project: the project becomes
/// the investigation and its single study, every dataset an assay.
pub struct ArcPacker<'a, C: OmeroClient, A: ArcCommander> {
    project: Project,
    repo: Utf8PathBuf,
    images: ImageFileMapping,
    omero: &'a C,
    commander: &'a A,
    study: Option<StudyMapper>,
    assays: Vec<AssayEntry>,
    commands_run: usize,
}

impl<'a, C: OmeroClient, A: ArcCommander> ArcPacker<'a, C, A> {
    pub fn new(
        project: Project,
        repo: impl Into<Utf8PathBuf>,
        images: ImageFileMapping,
        omero: &'a C,
        commander: &'a A,
    ) -> Self {
        Self {
            project,
            repo: repo.into(),
            images,
            omero,
            commander,
            study: None,
            assays: Vec::new(),
            commands_run: 0,
        }
    }

    /// Packs into a fresh directory, or adds the project to an existing ARC.
    pub fn pack(&mut self, sink: &dyn ProgressSink) -> Result<PackResult, ArcError> {
        let created = !is_arc_repo(self.repo.as_std_path());
        let assays = if created {
            self.create_arc_repo(sink)?
        } else {
            sink.event(ProgressEvent {
                message: format!("phase=Resolve; existing ARC at {}", self.repo),
                elapsed: None,
            });
            self.check_collisions()?;
            self.add_data_to_arc_repo(sink)?
        };

        Ok(PackResult {
            project_id: self.project.id,
            repository: self.repo.to_string(),
            created,
            study_identifier: self.study_identifier()?.to_string(),
            assays,
            commands_run: self.commands_run,
            arc_version: self.commander.version(),
            packed_at: chrono::Utc::now().to_rfc3339(),
        })
    }

    pub fn create_arc_repo(&mut self, sink: &dyn ProgressSink) -> Result<Vec<AssayResult>, ArcError> {
        self.initialize_arc_repo(sink)?;
        self.add_data_to_arc_repo(sink)
    }

    pub fn initialize_arc_repo(&mut self, sink: &dyn ProgressSink) -> Result<(), ArcError> {
        sink.event(ProgressEvent {
            message: format!("phase=Init; creating {}", self.repo),
            elapsed: None,
        });
        if let Some(parent) = self.repo.parent() {
            if !parent.as_str().is_empty() {
                fs::create_dir_all(parent).map_err(|err| ArcError::Filesystem(err.to_string()))?;
            }
        }
        fs::create_dir(&self.repo).map_err(|err| match err.kind() {
            io::ErrorKind::AlreadyExists => ArcError::RepositoryExists(self.repo.clone().into()),
            _ => ArcError::Filesystem(format!("{}: {err}", self.repo)),
        })?;

        self.run_command(&init_command())?;

        let annotations = self.omero.annotations(ObjectRef::project(self.project.id))?;
        let investigation = InvestigationMapper::new(&self.project, annotations)?;
        for command in investigation.arccommander_commands()? {
            self.run_command(&command)?;
        }
        tracing::info!(repo = %self.repo, "initialized ARC");
        Ok(())
    }

    pub fn add_data_to_arc_repo(
        &mut self,
        sink: &dyn ProgressSink,
    ) -> Result<Vec<AssayResult>, ArcError> {
        self.create_study(sink)?;
        self.create_assays(sink)?;

        let identifiers: Vec<String> = self.assay_identifiers().map(str::to_string).collect();
        let mut results = Vec::with_capacity(identifiers.len());
        for identifier in &identifiers {
            let start = Instant::now();
            let images = self.add_image_data_for_assay(identifier)?;
            let metadata_files = self.add_original_metadata_for_assay(identifier)?;
            sink.event(ProgressEvent {
                message: format!("phase=Images; {images} image(s) for assay {identifier}"),
                elapsed: Some(start.elapsed()),
            });
            results.push(AssayResult {
                identifier: identifier.clone(),
                dataset_id: self.assay(identifier)?.dataset.id,
                images,
                metadata_files,
            });
        }

        sink.event(ProgressEvent {
            message: "phase=Sheets; appending assay sheets".to_string(),
            elapsed: None,
        });
        self.add_isa_assay_sheets()?;
        Ok(results)
    }

    pub fn create_study(&mut self, sink: &dyn ProgressSink) -> Result<(), ArcError> {
        let study = self.resolve_study()?;
        sink.event(ProgressEvent {
            message: format!("phase=Study; {}", study.study_identifier()?),
            elapsed: None,
        });
        for command in study.arccommander_commands()? {
            self.run_command(&command)?;
        }
        self.study = Some(study);
        Ok(())
    }

    pub fn create_assays(&mut self, sink: &dyn ProgressSink) -> Result<(), ArcError> {
        let study_identifier = self.study_identifier()?.to_string();
        let entries = self.resolve_assays(&study_identifier)?;
        for entry in &entries {
            sink.event(ProgressEvent {
                message: format!(
                    "phase=Assay; {} from Dataset:{}",
                    entry.identifier, entry.dataset.id
                ),
                elapsed: None,
            });
            for command in entry.mapper.arccommander_commands()? {
                self.run_command(&command)?;
            }
        }
        self.assays = entries;
        Ok(())
    }

    /// Available once `create_study` has run.
    pub fn study_identifier(&self) -> Result<&str, ArcError> {
        self.study
            .as_ref()
            .ok_or(ArcError::MissingIdentifier("study identifier"))?
            .study_identifier()
    }

    pub fn assay_identifiers(&self) -> impl Iterator<Item = &str> {
        self.assays.iter().map(|entry| entry.identifier.as_str())
    }

    pub fn dataset_for_assay(&self, assay: &str) -> Result<&Dataset, ArcError> {
        Ok(&self.assay(assay)?.dataset)
    }

    pub fn image_filename(&self, image_id: i64, absolute: bool) -> Result<PathBuf, ArcError> {
        if absolute {
            self.images.absolute(image_id)
        } else {
            Ok(self.images.relative(image_id)?.to_path_buf())
        }
    }

    pub fn isa_assay_filename(&self, assay: &str) -> Result<Utf8PathBuf, ArcError> {
        self.assay(assay)?;
        let path = self.assay_dir(assay).join(ASSAY_WORKBOOK);
        if path.is_file() {
            Ok(path)
        } else {
            Err(ArcError::MissingWorkbook(path.into()))
        }
    }

    /// Copies every image of the assay's dataset into `<assay>/dataset`.
    pub fn add_image_data_for_assay(&self, assay: &str) -> Result<usize, ArcError> {
        let entry = self.assay(assay)?;
        let target = self.assay_dir(assay).join("dataset");
        let images = self.omero.images(entry.dataset.id)?;
        for image in &images {
            let source = self.image_filename(image.id, true)?;
            let dest = target.as_std_path().join(self.images.file_name(image.id)?);
            let bytes = fs_util::copy_preserving_mtime(&source, &dest)?;
            tracing::debug!(image = image.id, bytes, dest = %dest.display(), "copied image");
        }
        Ok(images.len())
    }

    /// Writes one `ImageID<id>_metadata.json` per image into `<assay>/protocols`.
    pub fn add_original_metadata_for_assay(&self, assay: &str) -> Result<usize, ArcError> {
        let entry = self.assay(assay)?;
        let target = self.assay_dir(assay).join("protocols");
        let images = self.omero.images(entry.dataset.id)?;
        for image in &images {
            let metadata = self.omero.original_metadata(image.id)?;
            let sidecar = ImageMetadataSidecar {
                series_metadata: OrderedMap::non_empty(&metadata.series),
                global_metadata: OrderedMap::non_empty(&metadata.global),
                image_id: image.id,
                image_filename: self.images.file_name(image.id)?,
            };
            let path = target
                .as_std_path()
                .join(format!("ImageID{}_metadata.json", image.id));
            fs_util::write_json_pretty(&path, &sidecar)?;
            tracing::debug!(image = image.id, path = %path.display(), "wrote metadata");
        }
        Ok(images.len())
    }

    pub fn isa_assay_tables(&self, assay: &str) -> Result<Vec<Table>, ArcError> {
        let entry = self.assay(assay)?;
        let images: Vec<Image> = self.omero.images(entry.dataset.id)?;
        Ok(vec![
            sheets::image_files_table(&images, |image| self.images.file_name(image.id).ok()),
            sheets::image_metadata_table(&images),
        ])
    }

    pub fn add_isa_assay_sheets(&self) -> Result<(), ArcError> {
        for entry in &self.assays {
            let workbook = self.isa_assay_filename(&entry.identifier)?;
            let tables = self.isa_assay_tables(&entry.identifier)?;
            xlsx::append_sheets(workbook.as_std_path(), &tables)?;
            tracing::debug!(workbook = %workbook, "appended assay sheets");
        }
        Ok(())
    }

    /// Every command packing would run, in order, without running any.
    /// Init and investigation commands are left out for an existing ARC.
    pub fn plan(&self) -> Result<Vec<Vec<String>>, ArcError> {
        let mut commands = Vec::new();
        if !is_arc_repo(self.repo.as_std_path()) {
            commands.push(init_command());
            let annotations = self.omero.annotations(ObjectRef::project(self.project.id))?;
            commands.extend(InvestigationMapper::new(&self.project, annotations)?.arccommander_commands()?);
        }
        let study = self.resolve_study()?;
        commands.extend(study.arccommander_commands()?);
        for entry in self.resolve_assays(study.study_identifier()?)? {
            commands.extend(entry.mapper.arccommander_commands()?);
        }
        Ok(commands)
    }

    /// Rejects a study or assay whose directory already exists in the ARC.
    pub fn check_collisions(&self) -> Result<(), ArcError> {
        let study = self.resolve_study()?;
        let study_identifier = study.study_identifier()?;
        if self.repo.join("studies").join(study_identifier).exists() {
            return Err(ArcError::IdentifierCollision {
                kind: "study",
                identifier: study_identifier.to_string(),
            });
        }
        for entry in self.resolve_assays(study_identifier)? {
            if self.assay_dir(&entry.identifier).exists() {
                return Err(ArcError::IdentifierCollision {
                    kind: "assay",
                    identifier: entry.identifier,
                });
            }
        }
        Ok(())
    }

    fn resolve_study(&self) -> Result<StudyMapper, ArcError> {
        let annotations = self.omero.annotations(ObjectRef::project(self.project.id))?;
        StudyMapper::new(&self.project, annotations)
    }

    fn resolve_assays(&self, study_identifier: &str) -> Result<Vec<AssayEntry>, ArcError> {
        let mut entries: Vec<AssayEntry> = Vec::new();
        for dataset in self.omero.datasets(self.project.id)? {
            let annotations = self.omero.annotations(ObjectRef::dataset(dataset.id))?;
            let mapper = AssayMapper::new(&dataset, annotations, study_identifier)?;
            let identifier = mapper.assay_identifier()?.to_string();
            if entries.iter().any(|entry| entry.identifier == identifier) {
                return Err(ArcError::IdentifierCollision {
                    kind: "assay",
                    identifier,
                });
            }
            entries.push(AssayEntry {
                identifier,
                dataset,
                mapper,
            });
        }
        Ok(entries)
    }

    fn assay(&self, assay: &str) -> Result<&AssayEntry, ArcError> {
        self.assays
            .iter()
            .find(|entry| entry.identifier == assay)
            .ok_or_else(|| ArcError::UnknownAssay(assay.to_string()))
    }

    fn assay_dir(&self, assay: &str) -> Utf8PathBuf {
        self.repo.join("assays").join(assay)
    }

    fn run_command(&mut self, command: &[String]) -> Result<(), ArcError> {
        if command.is_empty() {
            return Ok(());
        }
        tracing::debug!(command = %command.join(" "), "running");
        self.commander.run(command, self.repo.as_std_path())?;
        self.commands_run += 1;
        Ok(())
    }
}

fn init_command() -> Vec<String> {
    vec![ARC_TOOL.to_string(), "init".to_string()]
}

/// Key/value pairs serialized as a JSON object in their original order.
struct OrderedMap<'m>(&'m [(String, Value)]);

impl<'m> OrderedMap<'m> {
    fn non_empty(pairs: &'m [(String, Value)]) -> Option<Self> {
        if pairs.is_empty() { None } else { Some(Self(pairs)) }
    }
}

impl Serialize for OrderedMap<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, value) in self.0 {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

#[derive(serde::Serialize)]
struct ImageMetadataSidecar<'m> {
    series_metadata: Option<OrderedMap<'m>>,
    global_metadata: Option<OrderedMap<'m>>,
    image_id: i64,
    image_filename: String,
}
