use std::str::FromStr;

use assert_matches::assert_matches;

use omero_arc::domain::{ObjectKind, ObjectRef, fmt_identifier};
use omero_arc::error::ArcError;

#[test]
fn parse_object_references() {
    let project = ObjectRef::from_str("Project:12").unwrap();
    assert_eq!(project.kind, ObjectKind::Project);
    assert_eq!(project.id, 12);
    assert_eq!(project.expect_project().unwrap(), 12);

    let image: ObjectRef = " Image:1203 ".parse().unwrap();
    assert_eq!(image, ObjectRef::image(1203));
    assert_eq!(image.to_string(), "Image:1203");
}

#[test]
fn reject_malformed_references() {
    for value in ["Project", "Project:", "project:12", "Plate:3", "Project:-1", "Project:abc", "12"] {
        assert_matches!(
            ObjectRef::from_str(value),
            Err(ArcError::InvalidObjectRef(_)),
            "{value}"
        );
    }
}

#[test]
fn only_projects_can_be_packed() {
    let dataset: ObjectRef = "Dataset:7".parse().unwrap();
    assert_matches!(dataset.expect_project(), Err(ArcError::NotAProject(text)) if text == "Dataset:7");
}

#[test]
fn identifiers_from_titles() {
    assert_eq!(fmt_identifier("Dataset One"), "dataset-one");
    assert_eq!(fmt_identifier("HeLa  Cells"), "hela--cells");
}
