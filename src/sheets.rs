use std::fmt;

use serde::Serialize;

use crate::domain::{Image, PhysicalSize};

pub const IMAGE_FILES_SHEET: &str = "Image Files";
pub const IMAGE_METADATA_SHEET: &str = "Image Metadata";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Cell {
    Int(i64),
    Float(f64),
    Text(String),
    Empty,
}

impl Cell {
    fn text(value: Option<&str>) -> Self {
        value.map_or(Cell::Empty, |v| Cell::Text(v.to_string()))
    }

    fn count(value: Option<u64>) -> Self {
        value.map_or(Cell::Empty, |v| Cell::Int(v as i64))
    }

    fn size(value: Option<&PhysicalSize>) -> Self {
        value.map_or(Cell::Empty, |v| Cell::Float(v.value))
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Int(value) => write!(f, "{value}"),
            Cell::Float(value) => write!(f, "{value}"),
            Cell::Text(value) => f.write_str(value),
            Cell::Empty => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Table {
    pub name: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl Table {
    fn new(name: &str, columns: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: Vec::new(),
        }
    }
}

/// One row per image: id, name, description and the name of the copied file.
/// `filename` yields the file name each image was exported under.
pub fn image_files_table<F>(images: &[Image], mut filename: F) -> Table
where
    F: FnMut(&Image) -> Option<String>,
{
    let mut table = Table::new(
        IMAGE_FILES_SHEET,
        &["Image ID", "Name", "Description", "Filename"],
    );
    for image in images {
        table.rows.push(vec![
            Cell::Int(image.id),
            Cell::Text(image.name.clone()),
            Cell::text(image.description.as_deref()),
            Cell::text(filename(image).as_deref()),
        ]);
    }
    table
}

pub fn image_metadata_table(images: &[Image]) -> Table {
    let mut table = Table::new(
        IMAGE_METADATA_SHEET,
        &[
            "Image ID",
            "Image Size X",
            "Image Size Y",
            "Image Size Z",
            "Pixel Size X",
            "Pixel Size Y",
            "Pixel Size Z",
            "Pixel Size Unit",
        ],
    );
    for image in images {
        table.rows.push(vec![
            Cell::Int(image.id),
            Cell::count(image.size_x),
            Cell::count(image.size_y),
            Cell::count(image.size_z),
            Cell::size(image.pixel_size_x.as_ref()),
            Cell::size(image.pixel_size_y.as_ref()),
            Cell::size(image.pixel_size_z.as_ref()),
            Cell::text(image.pixel_size_unit()),
        ]);
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(id: i64) -> Image {
        Image {
            id,
            name: format!("img{id}.czi"),
            description: None,
            size_x: Some(512),
            size_y: Some(256),
            size_z: None,
            pixel_size_x: Some(PhysicalSize {
                value: 0.1,
                unit: Some("µm".to_string()),
            }),
            pixel_size_y: None,
            pixel_size_z: None,
        }
    }

    #[test]
    fn metadata_rows_leave_missing_values_empty() {
        let table = image_metadata_table(&[image(3)]);
        let row = &table.rows[0];
        assert_eq!(row.len(), table.columns.len());
        assert_eq!(row[1], Cell::Int(512));
        assert_eq!(row[3], Cell::Empty);
        assert_eq!(row[7], Cell::Text("µm".to_string()));
    }

    #[test]
    fn files_table_uses_supplied_filename() {
        let images = [image(1), image(2)];
        let table = image_files_table(&images, |img| Some(format!("file-{}.czi", img.id)));
        assert_eq!(table.name, IMAGE_FILES_SHEET);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[1][3].to_string(), "file-2.czi");
    }
}
