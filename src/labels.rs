use crate::config::{LabelsConfig, Validatable};
use std::{
    fs::File,
    io::{self, BufRead},
    path::Path,
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LabelsError {
    #[error("Failed to read class names from {path}: {source}")]
    Read { path: String, source: io::Error },
    #[error("Class names file {0} is empty")]
    Empty(String),
}

/// Ordered class names; position `i` is the label of model output `i`.
#[derive(Debug, Clone)]
pub struct ClassIndex {
    class_names: Vec<String>,
}

impl ClassIndex {
    pub fn new(labels_cfg: &LabelsConfig) -> Result<Self, LabelsError> {
        let path = labels_cfg.get_path();
        let class_index =
            Self::from_names(load_class_names(&path).map_err(|source| LabelsError::Read {
                path: path.display().to_string(),
                source,
            })?);

        if class_index.is_empty() {
            return Err(LabelsError::Empty(path.display().to_string()));
        }

        tracing::info!("Loaded {} class names from {:?}", class_index.len(), path);
        Ok(class_index)
    }

    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            class_names: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.class_names.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.class_names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.class_names.is_empty()
    }
}

/// One name per line, trimmed. Blank lines are kept so that positions keep
/// matching the model's output indices.
pub fn load_class_names(filepath: &Path) -> io::Result<Vec<String>> {
    let file = File::open(filepath)?;
    parse_class_names(io::BufReader::new(file))
}

fn parse_class_names<R: BufRead>(reader: R) -> io::Result<Vec<String>> {
    reader
        .lines()
        .map(|line| line.map(|l| l.trim().to_string()))
        .collect()
}
