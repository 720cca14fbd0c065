#![allow(dead_code)]

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Mutex;

use omero_arc::commander::ArcCommander;
use omero_arc::domain::{
    Annotation, Dataset, Experimenter, Image, ObjectRef, OriginalMetadata, PhysicalSize, Project,
};
use omero_arc::error::ArcError;
use omero_arc::omero::OmeroClient;
use omero_arc::sheets::Table;
use omero_arc::xlsx;

#[derive(Default)]
pub struct FakeOmero {
    pub projects: Vec<Project>,
    pub datasets: HashMap<i64, Vec<Dataset>>,
    pub images: HashMap<i64, Vec<Image>>,
    pub annotations: HashMap<ObjectRef, Vec<Annotation>>,
    pub metadata: HashMap<i64, OriginalMetadata>,
}

impl FakeOmero {
    pub fn annotate(&mut self, object: ObjectRef, annotation: Annotation) {
        self.annotations.entry(object).or_default().push(annotation);
    }
}

impl OmeroClient for FakeOmero {
    fn project(&self, id: i64) -> Result<Project, ArcError> {
        self.projects
            .iter()
            .find(|project| project.id == id)
            .cloned()
            .ok_or_else(|| ArcError::OmeroStatus {
                status: 404,
                message: format!("Project:{id}"),
            })
    }

    fn datasets(&self, project_id: i64) -> Result<Vec<Dataset>, ArcError> {
        Ok(self.datasets.get(&project_id).cloned().unwrap_or_default())
    }

    fn images(&self, dataset_id: i64) -> Result<Vec<Image>, ArcError> {
        Ok(self.images.get(&dataset_id).cloned().unwrap_or_default())
    }

    fn annotations(&self, object: ObjectRef) -> Result<Vec<Annotation>, ArcError> {
        Ok(self.annotations.get(&object).cloned().unwrap_or_default())
    }

    fn original_metadata(&self, image_id: i64) -> Result<OriginalMetadata, ArcError> {
        Ok(self.metadata.get(&image_id).cloned().unwrap_or_default())
    }
}

/// Records every command and lays out what `arc` itself would create.
#[derive(Default)]
pub struct RecordingArc {
    pub calls: Mutex<Vec<Vec<String>>>,
}

impl RecordingArc {
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }
}

impl ArcCommander for RecordingArc {
    fn run(&self, command: &[String], cwd: &Path) -> Result<(), ArcError> {
        self.calls.lock().unwrap().push(command.to_vec());
        let args: Vec<&str> = command.iter().map(String::as_str).collect();
        match args.as_slice() {
            ["arc", "init"] => {
                fs::create_dir_all(cwd.join(".arc")).unwrap();
                fs::create_dir_all(cwd.join("studies")).unwrap();
                fs::create_dir_all(cwd.join("assays")).unwrap();
            }
            ["arc", "study", "add", rest @ ..] => {
                let id = flag_value(rest, "--identifier").unwrap();
                xlsx::new_workbook(&cwd.join("studies").join(id).join("isa.study.xlsx"), &[
                    placeholder("Study"),
                ])
                .unwrap();
            }
            ["arc", "assay", "add", rest @ ..] => {
                let id = flag_value(rest, "--assayidentifier").unwrap();
                let dir = cwd.join("assays").join(id);
                fs::create_dir_all(dir.join("dataset")).unwrap();
                fs::create_dir_all(dir.join("protocols")).unwrap();
                xlsx::new_workbook(&dir.join("isa.assay.xlsx"), &[placeholder("Assay")]).unwrap();
            }
            _ => {}
        }
        Ok(())
    }

    fn version(&self) -> Option<String> {
        Some("arc 0.0.0-test".to_string())
    }
}

fn flag_value<'a>(args: &[&'a str], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|arg| *arg == flag)
        .and_then(|index| args.get(index + 1).copied())
}

fn placeholder(name: &str) -> Table {
    Table {
        name: name.to_string(),
        columns: vec!["Sample Name".to_string()],
        rows: Vec::new(),
    }
}

pub fn owner() -> Experimenter {
    Experimenter {
        first_name: Some("Ada".to_string()),
        last_name: Some("Lovelace".to_string()),
        email: Some("ada@example.org".to_string()),
    }
}

pub fn project(id: i64, name: &str) -> Project {
    Project {
        id,
        name: name.to_string(),
        description: None,
        owner: owner(),
    }
}

pub fn dataset(id: i64, name: &str) -> Dataset {
    Dataset {
        id,
        name: name.to_string(),
        description: Some(format!("{name} description")),
        owner: owner(),
    }
}

pub fn image(id: i64, name: &str) -> Image {
    let size = |value| {
        Some(PhysicalSize {
            value,
            unit: Some("µm".to_string()),
        })
    };
    Image {
        id,
        name: name.to_string(),
        description: None,
        size_x: Some(512),
        size_y: Some(512),
        size_z: Some(1),
        pixel_size_x: size(0.25),
        pixel_size_y: size(0.25),
        pixel_size_z: None,
    }
}

pub fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}
