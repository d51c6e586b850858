use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_MODEL_PATH: &str = "pokemon_cnn.onnx";
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;

/// Crate directory at build time. Used for the bundled config and static
/// assets when `CARGO_MANIFEST_DIR` is not set at runtime, e.g. when the
/// binary is started directly instead of through `cargo run`.
const BUILD_MANIFEST_DIR: &str = env!("CARGO_MANIFEST_DIR");

const DEFAULT_LABELS: [&str; 11] = [
    "Water", "Normal", "Fire", "Grass", "Ghost", "Bug", "Electric", "Poison", "Psychic", "Rock",
    "Fighting",
];

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse classifier config: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Invalid classifier config: {0}")]
    Invalid(String),
}

/// Everything the server needs at startup, read once in `main`.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub model_path: PathBuf,
    pub max_upload_bytes: usize,
    pub static_dir: PathBuf,
    pub classifier: ClassifierConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClassifierConfig {
    pub image: ImageConfig,
    pub model: ModelConfig,
    pub labels: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ImageConfig {
    /// `[width, height]` of the model input.
    pub size: [u32; 2],
    pub normalize: bool,
    pub resize_method: ResizeMethod,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelConfig {
    pub apply_softmax: bool,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ResizeMethod {
    Nearest,
    #[serde(alias = "triangle")]
    Bilinear,
    #[default]
    #[serde(alias = "catmullrom")]
    Bicubic,
    Gaussian,
    Lanczos3,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            image: ImageConfig::default(),
            model: ModelConfig::default(),
            labels: DEFAULT_LABELS.iter().map(|l| l.to_string()).collect(),
        }
    }
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            size: [120, 120],
            normalize: true,
            resize_method: ResizeMethod::default(),
        }
    }
}

impl ImageConfig {
    pub fn width(&self) -> u32 {
        self.size[0]
    }

    pub fn height(&self) -> u32 {
        self.size[1]
    }
}

impl ClassifierConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let config_str = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml_str(&config_str)
    }

    pub fn from_yaml_str(config_str: &str) -> Result<Self, ConfigError> {
        let config: ClassifierConfig = serde_yaml::from_str(config_str)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.image.width() == 0 || self.image.height() == 0 {
            return Err(ConfigError::Invalid(format!(
                "image size must be non-zero, got {}x{}",
                self.image.width(),
                self.image.height()
            )));
        }
        if self.labels.is_empty() {
            return Err(ConfigError::Invalid("label list is empty".into()));
        }
        if let Some(pos) = self.labels.iter().position(|l| l.trim().is_empty()) {
            return Err(ConfigError::Invalid(format!("label {} is blank", pos)));
        }
        Ok(())
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(with_build_manifest_dir(|key| std::env::var(key).ok()))
    }

    /// Builds the config from an arbitrary key lookup so tests need not touch
    /// the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = lookup("HOST").unwrap_or_else(|| DEFAULT_HOST.to_string());
        let port = parse_or("PORT", lookup("PORT"), DEFAULT_PORT)?;
        let max_upload_bytes = parse_or(
            "MAX_UPLOAD_BYTES",
            lookup("MAX_UPLOAD_BYTES"),
            DEFAULT_MAX_UPLOAD_BYTES,
        )?;
        if max_upload_bytes == 0 {
            return Err(ConfigError::InvalidValue {
                key: "MAX_UPLOAD_BYTES",
                value: "0".into(),
            });
        }

        let model_path = PathBuf::from(
            lookup("MODEL_PATH").unwrap_or_else(|| DEFAULT_MODEL_PATH.to_string()),
        );

        let manifest_dir = lookup("CARGO_MANIFEST_DIR").map(PathBuf::from);
        let static_dir = match (lookup("STATIC_DIR"), &manifest_dir) {
            (Some(dir), _) => PathBuf::from(dir),
            (None, Some(manifest_dir)) => manifest_dir.join("static"),
            (None, None) => PathBuf::from("/usr/src/app/backend/static"),
        };
        if !static_dir.is_dir() {
            log::warn!(
                "Static directory {} does not exist, /static will return 404",
                static_dir.display()
            );
        }

        let classifier = match (lookup("CLASSIFIER_CONFIG"), &manifest_dir) {
            (Some(path), _) => ClassifierConfig::load(Path::new(&path))?,
            (None, Some(manifest_dir))
                if manifest_dir.join("../config/classifier.yaml").is_file() =>
            {
                ClassifierConfig::load(&manifest_dir.join("../config/classifier.yaml"))?
            }
            (None, Some(manifest_dir)) => {
                log::warn!(
                    "No classifier config at {}, using built-in defaults. Set CLASSIFIER_CONFIG to override",
                    manifest_dir.join("../config/classifier.yaml").display()
                );
                ClassifierConfig::default()
            }
            (None, None) => {
                log::warn!(
                    "CLASSIFIER_CONFIG and CARGO_MANIFEST_DIR are unset, using built-in classifier defaults"
                );
                ClassifierConfig::default()
            }
        };

        Ok(Self {
            host,
            port,
            model_path,
            max_upload_bytes,
            static_dir,
            classifier,
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Falls back to the build-time crate directory when the runtime lookup has
/// no `CARGO_MANIFEST_DIR`.
fn with_build_manifest_dir<F>(lookup: F) -> impl Fn(&str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    move |key| {
        lookup(key).or_else(|| {
            (key == "CARGO_MANIFEST_DIR").then(|| BUILD_MANIFEST_DIR.to_string())
        })
    }
}

fn parse_or<T: std::str::FromStr>(
    key: &'static str,
    value: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match value {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { key, value: raw }),
        None => Ok(default),
    }
}
