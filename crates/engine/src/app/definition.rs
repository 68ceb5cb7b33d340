use serde::de::DeserializeOwned;
use thiserror::Error;

use super::{LoadError, ResourceManager};

#[derive(Debug, Error)]
pub enum DefinitionError {
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error("{key}: invalid definition at {path}: {message}")]
    Parse {
        key: String,
        path: String,
        message: String,
    },
    #[error("{key}: {message}")]
    Invalid { key: String, message: String },
}

impl DefinitionError {
    pub fn invalid(key: &str, message: impl Into<String>) -> Self {
        DefinitionError::Invalid {
            key: key.to_string(),
            message: message.into(),
        }
    }
}

/// Parses JSON, reporting the path of the offending field on failure.
pub fn parse_definition<T: DeserializeOwned>(key: &str, raw: &str) -> Result<T, DefinitionError> {
    let mut deserializer = serde_json::Deserializer::from_str(raw);
    serde_path_to_error::deserialize(&mut deserializer).map_err(|error| {
        DefinitionError::Parse {
            key: key.to_string(),
            path: error.path().to_string(),
            message: error.inner().to_string(),
        }
    })
}

pub fn load_definition<T: DeserializeOwned>(
    resources: &mut ResourceManager,
    key: &str,
) -> Result<T, DefinitionError> {
    let raw = resources.read_text(key)?;
    parse_definition(key, &raw)
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, Deserialize)]
    #[allow(dead_code)]
    struct Sample {
        name: String,
        items: Vec<Item>,
    }

    #[derive(Debug, Deserialize)]
    #[allow(dead_code)]
    struct Item {
        weight: u32,
    }

    #[test]
    fn parse_error_names_field_path() {
        let error = parse_definition::<Sample>(
            "defs/sample.json",
            r#"{"name":"a","items":[{"weight":1},{"weight":"heavy"}]}"#,
        )
        .expect_err("bad weight");

        match error {
            DefinitionError::Parse { key, path, .. } => {
                assert_eq!(key, "defs/sample.json");
                assert_eq!(path, "items[1].weight");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
