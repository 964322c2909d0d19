use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum SerdeFormatError {
    #[error("Failed to get file extension")]
    MissingFileExtension,
    #[error("Unsupported file extension for file: {0}")]
    UnsupportedFileExtension(String),
    #[error("YAML serialization failed")]
    Yaml(#[from] serde_yml::Error),
    #[error("JSON serialization failed")]
    Json(#[from] serde_json::Error),
}

pub type SerdeFormatResult<T> = Result<T, SerdeFormatError>;

pub fn get_file_extension(filename: &str) -> Option<&str> {
    Path::new(filename)
        .extension()
        .and_then(|os_str| os_str.to_str())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SerdeFormat {
    Yaml,
    Json,
}

impl SerdeFormat {
    pub fn from_file_name(file_name: &str) -> SerdeFormatResult<Self> {
        let ext = get_file_extension(file_name).ok_or(SerdeFormatError::MissingFileExtension)?;

        if ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml") {
            Ok(Self::Yaml)
        } else if ext.eq_ignore_ascii_case("json") {
            Ok(Self::Json)
        } else {
            Err(SerdeFormatError::UnsupportedFileExtension(
                file_name.to_string(),
            ))
        }
    }
}

/// Serializes `value` to text, always terminated by a single `\n`.
pub fn serialize<T: Serialize>(value: &T, format: SerdeFormat) -> SerdeFormatResult<String> {
    let mut text = match format {
        SerdeFormat::Yaml => serde_yml::to_string(value)?,
        SerdeFormat::Json => serde_json::to_string_pretty(value)?,
    };
    if !text.ends_with('\n') {
        text.push('\n');
    }
    Ok(text)
}

pub fn deserialize<T: DeserializeOwned>(
    serialized: &str,
    format: SerdeFormat,
) -> SerdeFormatResult<T> {
    match format {
        SerdeFormat::Yaml => Ok(serde_yml::from_str(serialized)?),
        SerdeFormat::Json => Ok(serde_json::from_str(serialized)?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        name: String,
        size: usize,
    }

    #[test]
    fn test_format_from_file_name() {
        assert_eq!(
            SerdeFormat::from_file_name("grid.YAML").unwrap(),
            SerdeFormat::Yaml
        );
        assert_eq!(
            SerdeFormat::from_file_name("grid.yml").unwrap(),
            SerdeFormat::Yaml
        );
        assert_eq!(
            SerdeFormat::from_file_name("grid.json").unwrap(),
            SerdeFormat::Json
        );
        assert!(matches!(
            SerdeFormat::from_file_name("grid"),
            Err(SerdeFormatError::MissingFileExtension)
        ));
        assert!(matches!(
            SerdeFormat::from_file_name("grid.fits"),
            Err(SerdeFormatError::UnsupportedFileExtension(_))
        ));
    }

    #[test]
    fn test_json_and_yaml_agree() {
        let sample = Sample {
            name: "tile".to_string(),
            size: 32,
        };
        for format in [SerdeFormat::Yaml, SerdeFormat::Json] {
            let text = serialize(&sample, format).unwrap();
            assert!(text.ends_with('\n'));
            let back: Sample = deserialize(&text, format).unwrap();
            assert_eq!(back, sample);
        }
    }

    #[test]
    fn test_deserialize_reports_malformed_input() {
        let result: SerdeFormatResult<Sample> = deserialize("{ not json", SerdeFormat::Json);
        assert!(matches!(result, Err(SerdeFormatError::Json(_))));
    }
}
