use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use assert_matches::assert_matches;

use omero_arc::domain::{Image, PhysicalSize};
use omero_arc::error::ArcError;
use omero_arc::sheets::{
    Cell, IMAGE_FILES_SHEET, IMAGE_METADATA_SHEET, Table, image_files_table, image_metadata_table,
};
use omero_arc::xlsx;

fn images() -> Vec<Image> {
    vec![
        Image {
            id: 5,
            name: "a & b <raw>".to_string(),
            description: Some("first".to_string()),
            size_x: Some(100),
            size_y: Some(50),
            size_z: None,
            pixel_size_x: Some(PhysicalSize {
                value: 1.5,
                unit: Some("µm".to_string()),
            }),
            pixel_size_y: None,
            pixel_size_z: None,
        },
        Image {
            id: 6,
            name: "second".to_string(),
            description: None,
            size_x: None,
            size_y: None,
            size_z: None,
            pixel_size_x: None,
            pixel_size_y: None,
            pixel_size_z: None,
        },
    ]
}

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

fn workbook_xml(path: &Path) -> String {
    let mut archive = zip::ZipArchive::new(fs::File::open(path).unwrap()).unwrap();
    let mut xml = String::new();
    archive
        .by_name("xl/workbook.xml")
        .unwrap()
        .read_to_string(&mut xml)
        .unwrap();
    xml
}

#[test]
fn append_to_existing_workbook_keeps_sheets() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("isa.assay.xlsx");
    let assay = Table {
        name: "Assay".to_string(),
        columns: vec!["Sample Name".to_string()],
        rows: vec![vec![Cell::Text("s1".to_string())]],
    };
    xlsx::new_workbook(&path, &[assay]).unwrap();

    let images = images();
    let tables = vec![
        image_files_table(&images, |image| Some(format!("{}.tif", image.id))),
        image_metadata_table(&images),
    ];
    xlsx::append_sheets(&path, &tables).unwrap();

    assert_eq!(
        xlsx::sheet_names(&path).unwrap(),
        vec!["Assay", IMAGE_FILES_SHEET, IMAGE_METADATA_SHEET]
    );
    assert_eq!(
        xlsx::read_sheet(&path, "Assay").unwrap(),
        vec![vec!["Sample Name".to_string()], vec!["s1".to_string()]]
    );

    let files = xlsx::read_sheet(&path, IMAGE_FILES_SHEET).unwrap();
    assert_eq!(files.len(), 3);
    assert_eq!(files[1], vec!["5", "a & b <raw>", "first", "5.tif"]);
    assert_eq!(files[2], vec!["6", "second", "", "6.tif"]);

    let metadata = xlsx::read_sheet(&path, IMAGE_METADATA_SHEET).unwrap();
    assert_eq!(metadata[0].last().map(String::as_str), Some("Pixel Size Unit"));
    assert_eq!(metadata[1], vec!["5", "100", "50", "", "1.5", "", "", "µm"]);
    assert_eq!(metadata[2], vec!["6"]);
}

#[test]
fn existing_sheet_name_is_rejected() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("book.xlsx");
    let images = images();
    xlsx::new_workbook(&path, &[image_metadata_table(&images)]).unwrap();

    let err = xlsx::append_sheets(&path, &[image_metadata_table(&images)]).unwrap_err();
    assert_matches!(err, ArcError::Workbook(_));
    assert_eq!(xlsx::sheet_names(&path).unwrap(), vec![IMAGE_METADATA_SHEET]);
}

#[test]
fn missing_sheet_is_an_error() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("book.xlsx");
    xlsx::new_workbook(&path, &[]).unwrap();
    assert!(xlsx::sheet_names(&path).unwrap().is_empty());
    assert_matches!(
        xlsx::read_sheet(&path, "Nope"),
        Err(ArcError::Workbook(_))
    );
}

#[test]
fn prefixed_workbook_from_another_writer() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("isa.assay.xlsx");
    fs::copy(fixture("prefixed_assay.xlsx"), &path).unwrap();

    assert_eq!(xlsx::sheet_names(&path).unwrap(), vec!["Assay"]);
    assert_eq!(
        xlsx::read_sheet(&path, "Assay").unwrap(),
        vec![
            vec!["Source Name".to_string(), "Sample Name".to_string()],
            vec!["sample-1".to_string(), "HeLa & co".to_string()],
        ]
    );

    let images = images();
    let tables = vec![
        image_files_table(&images, |image| Some(format!("{}.czi", image.id))),
        image_metadata_table(&images),
    ];
    xlsx::append_sheets(&path, &tables).unwrap();

    assert_eq!(
        xlsx::sheet_names(&path).unwrap(),
        vec!["Assay", IMAGE_FILES_SHEET, IMAGE_METADATA_SHEET]
    );
    let files = xlsx::read_sheet(&path, IMAGE_FILES_SHEET).unwrap();
    assert_eq!(files[1], vec!["5", "a & b <raw>", "first", "5.czi"]);
    let metadata = xlsx::read_sheet(&path, IMAGE_METADATA_SHEET).unwrap();
    assert_eq!(metadata.len(), 3);
    assert_eq!(xlsx::read_sheet(&path, "Assay").unwrap()[1][0], "sample-1");

    let xml = workbook_xml(&path);
    assert!(xml.contains(r#"<x:sheet name="Image Files" sheetId="2" r:id="rId1"/>"#));
    assert!(xml.contains(r#"<x:sheet name="Image Metadata" sheetId="3" r:id="rId2"/></x:sheets><x:definedNames>"#));

    // Appending twice hits the duplicate check on prefixed sheets too.
    assert_matches!(
        xlsx::append_sheets(&path, &tables[..1]),
        Err(ArcError::Workbook(_))
    );
}

#[cfg(unix)]
#[test]
fn append_keeps_file_permissions() {
    use std::os::unix::fs::PermissionsExt;

    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("isa.assay.xlsx");
    xlsx::new_workbook(&path, &[]).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();

    xlsx::append_sheets(&path, &[image_metadata_table(&images())]).unwrap();
    let mode = fs::metadata(&path).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o644);
}
