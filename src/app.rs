use std::time::Duration;

use camino::Utf8PathBuf;
use serde::Serialize;

use crate::commander::ArcCommander;
use crate::config::ImageFileMapping;
use crate::domain::ObjectRef;
use crate::error::ArcError;
use crate::mapper::{InvestigationMapper, IsaMapper, StudyMapper};
use crate::omero::OmeroClient;
use crate::packer::ArcPacker;

#[derive(Debug, Clone)]
pub struct PackRequest {
    pub project: ObjectRef,
    pub target: Utf8PathBuf,
    pub images: ImageFileMapping,
}

#[derive(Debug, Clone, Serialize)]
pub struct PackResult {
    pub project_id: i64,
    pub repository: String,
    pub created: bool,
    pub study_identifier: String,
    pub assays: Vec<AssayResult>,
    pub commands_run: usize,
    pub arc_version: Option<String>,
    pub packed_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AssayResult {
    pub identifier: String,
    pub dataset_id: i64,
    pub images: usize,
    pub metadata_files: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlanResult {
    pub project_id: i64,
    pub repository: String,
    pub commands: Vec<Vec<String>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CommandsResult {
    pub project_id: i64,
    pub investigation: Vec<Vec<String>>,
    pub study: Vec<Vec<String>>,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

pub struct App<C: OmeroClient, A: ArcCommander> {
    omero: C,
    commander: A,
}

impl<C: OmeroClient, A: ArcCommander> App<C, A> {
    pub fn new(omero: C, commander: A) -> Self {
        Self { omero, commander }
    }

    pub fn omero(&self) -> &C {
        &self.omero
    }

    pub fn commander(&self) -> &A {
        &self.commander
    }

    pub fn pack(&self, request: PackRequest, sink: &dyn ProgressSink) -> Result<PackResult, ArcError> {
        let project_id = request.project.expect_project()?;
        sink.event(ProgressEvent {
            message: format!("phase=Resolve; {}", request.project),
            elapsed: None,
        });
        let project = self.omero.project(project_id)?;
        tracing::info!(project = project.id, name = %project.name, target = %request.target, "packing");

        let start = std::time::Instant::now();
        let mut packer = ArcPacker::new(
            project,
            request.target,
            request.images,
            &self.omero,
            &self.commander,
        );
        let result = packer.pack(sink)?;
        sink.event(ProgressEvent {
            message: format!("phase=Done; {} assay(s)", result.assays.len()),
            elapsed: Some(start.elapsed()),
        });
        Ok(result)
    }

    /// Dry run: the commands `pack` would issue for the same request.
    pub fn plan(&self, request: PackRequest, sink: &dyn ProgressSink) -> Result<PlanResult, ArcError> {
        let project_id = request.project.expect_project()?;
        sink.event(ProgressEvent {
            message: format!("phase=Resolve; {}", request.project),
            elapsed: None,
        });
        let project = self.omero.project(project_id)?;
        let repository = request.target.to_string();
        let packer = ArcPacker::new(
            project,
            request.target,
            request.images,
            &self.omero,
            &self.commander,
        );
        Ok(PlanResult {
            project_id,
            repository,
            commands: packer.plan()?,
        })
    }
}

/// Investigation and study commands for a project, without an ARC or a tool.
pub fn mapper_commands<C: OmeroClient>(
    omero: &C,
    project: ObjectRef,
) -> Result<CommandsResult, ArcError> {
    let project_id = project.expect_project()?;
    let project = omero.project(project_id)?;
    let annotations = omero.annotations(ObjectRef::project(project_id))?;
    let investigation = InvestigationMapper::new(&project, annotations.clone())?;
    let study = StudyMapper::new(&project, annotations)?;
    Ok(CommandsResult {
        project_id,
        investigation: investigation.arccommander_commands()?,
        study: study.arccommander_commands()?,
    })
}
