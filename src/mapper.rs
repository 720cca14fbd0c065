use serde::Serialize;

use crate::attributes::{self, CategoryConfig, CommandToken, METADATA};
use crate::domain::{Annotation, Dataset, Project};
use crate::error::ArcError;

/// Field/value pairs in the order of the category's default table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Record(Vec<(String, String)>);

impl Record {
    pub fn get(&self, field: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, value)| value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn set(&mut self, field: &str, value: &str) {
        match self.0.iter_mut().find(|(name, _)| name == field) {
            Some(entry) => entry.1 = value.to_string(),
            None => self.0.push((field.to_string(), value.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ResolvedCategory {
    pub name: &'static str,
    pub namespace: &'static str,
    pub values: Vec<Record>,
    #[serde(skip)]
    config: CategoryConfig,
}

impl ResolvedCategory {
    fn resolve(config: &CategoryConfig, annotations: &[&Annotation]) -> Self {
        let defaults = config
            .defaults
            .iter()
            .fold(Record::default(), |mut record, (field, value)| {
                if let Some(value) = value {
                    record.set(field, value);
                }
                record
            });

        let values = if annotations.is_empty() {
            vec![defaults]
        } else {
            annotations
                .iter()
                .map(|annotation| {
                    let mut record = Record::default();
                    for (field, _) in &config.defaults {
                        let value = annotation.get(field).or_else(|| defaults.get(field));
                        if let Some(value) = value {
                            record.set(field, value);
                        }
                    }
                    record
                })
                .collect()
        };

        Self {
            name: config.name,
            namespace: config.namespace,
            values: values.into_iter().filter(|r| !r.is_empty()).collect(),
            config: config.clone(),
        }
    }
}

/// Merges annotations against a category table and renders ARC Commander
/// argument lists from the result.
#[derive(Debug, Clone)]
pub struct AttributeMapper {
    config: Vec<CategoryConfig>,
    annotations: Vec<Annotation>,
    categories: Vec<ResolvedCategory>,
}

impl AttributeMapper {
    pub fn resolve(
        config: Vec<CategoryConfig>,
        annotations: Vec<Annotation>,
    ) -> Result<Self, ArcError> {
        let mut categories = Vec::new();
        for category in &config {
            let matching = annotations
                .iter()
                .filter(|annotation| annotation.matches(category.namespace))
                .collect::<Vec<_>>();
            if category.is_single_valued() && matching.len() > 1 {
                return Err(ArcError::DuplicateAnnotation {
                    namespace: category.namespace.to_string(),
                    count: matching.len(),
                });
            }
            let resolved = ResolvedCategory::resolve(category, &matching);
            if !resolved.values.is_empty() {
                categories.push(resolved);
            }
        }
        Ok(Self {
            config,
            annotations,
            categories,
        })
    }

    pub fn categories(&self) -> &[ResolvedCategory] {
        &self.categories
    }

    pub fn category(&self, name: &str) -> Option<&ResolvedCategory> {
        self.categories.iter().find(|category| category.name == name)
    }

    /// Raw annotation records of one category, before merging.
    pub fn annotation_data(&self, category: &str) -> Vec<&Annotation> {
        let Some(config) = self.config.iter().find(|c| c.name == category) else {
            return Vec::new();
        };
        self.annotations
            .iter()
            .filter(|annotation| annotation.matches(config.namespace))
            .collect()
    }

    pub fn metadata_value(&self, field: &str) -> Option<&str> {
        self.category(METADATA)
            .and_then(|category| category.values.first())
            .and_then(|record| record.get(field))
    }

    pub fn commands(&self) -> Result<Vec<Vec<String>>, ArcError> {
        let mut commands = Vec::new();
        for category in &self.categories {
            let prefix = self.render_prefix(&category.config.command)?;
            for record in &category.values {
                let mut command = prefix.clone();
                for (field, value) in record.iter() {
                    if let Some(flag) = category.config.option(field) {
                        command.push(flag.to_string());
                        command.push(value.to_string());
                    }
                }
                commands.push(command);
            }
        }
        Ok(commands)
    }

    fn render_prefix(&self, tokens: &[CommandToken]) -> Result<Vec<String>, ArcError> {
        tokens
            .iter()
            .map(|token| match token {
                CommandToken::Literal(value) => Ok(value.clone()),
                CommandToken::StudyIdentifier => self
                    .metadata_value("Study Identifier")
                    .map(str::to_string)
                    .ok_or(ArcError::MissingIdentifier("study identifier")),
                CommandToken::AssayIdentifier => self
                    .metadata_value("Assay Identifier")
                    .map(str::to_string)
                    .ok_or(ArcError::MissingIdentifier("assay identifier")),
            })
            .collect()
    }
}

pub trait IsaMapper {
    fn attributes(&self) -> &AttributeMapper;

    fn arccommander_commands(&self) -> Result<Vec<Vec<String>>, ArcError> {
        self.attributes().commands()
    }
}

#[derive(Debug, Clone)]
pub struct InvestigationMapper {
    attributes: AttributeMapper,
}

impl InvestigationMapper {
    pub fn new(project: &Project, annotations: Vec<Annotation>) -> Result<Self, ArcError> {
        let config = attributes::investigation_config(project);
        Ok(Self {
            attributes: AttributeMapper::resolve(config, annotations)?,
        })
    }
}

impl IsaMapper for InvestigationMapper {
    fn attributes(&self) -> &AttributeMapper {
        &self.attributes
    }
}

#[derive(Debug, Clone)]
pub struct StudyMapper {
    attributes: AttributeMapper,
}

impl StudyMapper {
    pub fn new(project: &Project, annotations: Vec<Annotation>) -> Result<Self, ArcError> {
        let config = attributes::study_config(project);
        Ok(Self {
            attributes: AttributeMapper::resolve(config, annotations)?,
        })
    }

    pub fn study_identifier(&self) -> Result<&str, ArcError> {
        self.attributes
            .metadata_value("Study Identifier")
            .ok_or(ArcError::MissingIdentifier("study identifier"))
    }
}

impl IsaMapper for StudyMapper {
    fn attributes(&self) -> &AttributeMapper {
        &self.attributes
    }
}

#[derive(Debug, Clone)]
pub struct AssayMapper {
    attributes: AttributeMapper,
}

impl AssayMapper {
    pub fn new(
        dataset: &Dataset,
        annotations: Vec<Annotation>,
        study_identifier: &str,
    ) -> Result<Self, ArcError> {
        let config = attributes::assay_config(dataset, study_identifier);
        Ok(Self {
            attributes: AttributeMapper::resolve(config, annotations)?,
        })
    }

    pub fn assay_identifier(&self) -> Result<&str, ArcError> {
        self.attributes
            .metadata_value("Assay Identifier")
            .ok_or(ArcError::MissingIdentifier("assay identifier"))
    }
}

impl IsaMapper for AssayMapper {
    fn attributes(&self) -> &AttributeMapper {
        &self.attributes
    }
}
