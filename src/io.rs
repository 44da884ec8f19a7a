use std::{
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use strum::{Display, EnumString, IntoStaticStr};

use crate::error::{IoError, TraderError, TraderResult};

/// Write buffer used for checkpoint files.
pub const BUFFER_SIZE: usize = 128 * 1024;

// ================================================================================================
// Serde Formats
// ================================================================================================

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    PartialOrd,
    Eq,
    Hash,
    Ord,
    Serialize,
    Deserialize,
    EnumString,
    Display,
    IntoStaticStr,
    Default,
)]
#[strum(serialize_all = "lowercase")]
pub enum SerdeFormat {
    #[default]
    Postcard,
    Json,
}

impl SerdeFormat {
    pub fn as_str(&self) -> &'static str {
        self.into()
    }

    pub fn extension(&self) -> &'static str {
        self.as_str()
    }

    pub fn from_path(path: &str) -> TraderResult<Self> {
        match path
            .rsplit_once('.')
            .ok_or_else(|| err(path, true))?
            .1
            .to_lowercase()
            .as_str()
        {
            "postcard" => Ok(Self::Postcard),
            "json" => Ok(Self::Json),
            ext => Err(err(ext, false)),
        }
    }
}

fn err(s: &str, missing_extension: bool) -> TraderError {
    let msg = if missing_extension {
        format!("missing or invalid extension in path '{s}'")
    } else {
        format!("'{s}'")
    };
    IoError::UnsupportedFormat(msg).into()
}

// ================================================================================================
// Read / Write
// ================================================================================================

/// Serializes `value` to `path`, creating parent directories as needed.
pub fn write<T: Serialize + ?Sized>(
    path: &Path,
    value: &T,
    format: SerdeFormat,
) -> TraderResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(IoError::Io)?;
    }
    let file = File::create(path).map_err(IoError::Io)?;
    let mut writer = BufWriter::with_capacity(BUFFER_SIZE, file);

    match format {
        SerdeFormat::Postcard => {
            let bytes = postcard::to_stdvec(value).map_err(IoError::Postcard)?;
            writer.write_all(&bytes).map_err(IoError::Io)?;
        }
        SerdeFormat::Json => {
            serde_json::to_writer_pretty(&mut writer, value).map_err(IoError::Json)?;
        }
    }
    writer.flush().map_err(IoError::Io)?;
    Ok(())
}

pub fn read<T: DeserializeOwned>(path: &Path, format: SerdeFormat) -> TraderResult<T> {
    match format {
        SerdeFormat::Postcard => {
            let bytes = std::fs::read(path).map_err(IoError::Io)?;
            Ok(postcard::from_bytes(&bytes).map_err(IoError::Postcard)?)
        }
        SerdeFormat::Json => {
            let reader = BufReader::new(File::open(path).map_err(IoError::Io)?);
            Ok(serde_json::from_reader(reader).map_err(IoError::Json)?)
        }
    }
}

// ================================================================================================
// Checkpoint Layout
// ================================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum CheckpointPart {
    Weights,
    Params,
    History,
}

impl CheckpointPart {
    pub fn format(&self) -> SerdeFormat {
        match self {
            Self::Weights => SerdeFormat::Postcard,
            Self::Params | Self::History => SerdeFormat::Json,
        }
    }

    /// `<name>.<part>.<ext>`
    pub fn file_name(&self, name: &str) -> String {
        let part: &'static str = self.into();
        format!("{name}.{part}.{}", self.format().extension())
    }
}

/// The three sibling files that make up one checkpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointPaths {
    pub weights: PathBuf,
    pub params: PathBuf,
    pub history: PathBuf,
}

impl CheckpointPaths {
    pub fn new(dir: &Path, name: &str) -> Self {
        Self {
            weights: dir.join(CheckpointPart::Weights.file_name(name)),
            params: dir.join(CheckpointPart::Params.file_name(name)),
            history: dir.join(CheckpointPart::History.file_name(name)),
        }
    }

    pub fn all(&self) -> [(CheckpointPart, &Path); 3] {
        [
            (CheckpointPart::Weights, self.weights.as_path()),
            (CheckpointPart::Params, self.params.as_path()),
            (CheckpointPart::History, self.history.as_path()),
        ]
    }

    /// Fails with [`IoError::Checkpoint`] naming the first missing file.
    pub fn ensure_exist(&self) -> TraderResult<()> {
        for (_, path) in self.all() {
            if !path.is_file() {
                return Err(checkpoint_error(path, "file not found"));
            }
        }
        Ok(())
    }
}

/// Wraps any failure into the recoverable checkpoint error kind.
pub fn checkpoint_error(path: &Path, msg: impl ToString) -> TraderError {
    IoError::Checkpoint {
        path: path.display().to_string(),
        msg: msg.to_string(),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Blob {
        xs: Vec<f64>,
        tag: String,
    }

    #[test]
    fn format_from_extension() {
        assert_eq!(
            SerdeFormat::from_path("a/b.weights.postcard").unwrap(),
            SerdeFormat::Postcard
        );
        assert_eq!(SerdeFormat::from_path("x.JSON").unwrap(), SerdeFormat::Json);
        assert!(SerdeFormat::from_path("noext").is_err());
        assert!(SerdeFormat::from_path("x.csv").is_err());
    }

    #[test]
    fn write_then_read_both_formats() {
        let dir = tempfile::tempdir().unwrap();
        let blob = Blob {
            xs: vec![1.5, -2.0],
            tag: "q".to_string(),
        };
        for format in [SerdeFormat::Postcard, SerdeFormat::Json] {
            let path = dir
                .path()
                .join("nested")
                .join(format!("blob.{}", format.extension()));
            write(&path, &blob, format).unwrap();
            let back: Blob = read(&path, format).unwrap();
            assert_eq!(back, blob);
        }
    }

    #[test]
    fn checkpoint_layout_and_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let paths = CheckpointPaths::new(dir.path(), "dqn");
        assert!(paths.weights.ends_with("dqn.weights.postcard"));
        assert!(paths.params.ends_with("dqn.params.json"));
        assert!(paths.history.ends_with("dqn.history.json"));

        let err = paths.ensure_exist().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CheckpointIo);
        assert!(err.is_recoverable());
    }
}
