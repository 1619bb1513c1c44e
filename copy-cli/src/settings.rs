use anyhow::{bail, Context, Result};
use copy_core::Config;
use std::fs;
use std::path::Path;

enum Format {
    Json,
    Yaml,
}

impl Format {
    /// JSON for `.json`, YAML for anything else.
    fn of(path: &Path) -> Self {
        match path.extension().and_then(|s| s.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Format::Json,
            _ => Format::Yaml,
        }
    }
}

pub fn load(path: &Path) -> Result<Config> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("read config {}", path.display()))?;
    let config = match Format::of(path) {
        Format::Json => serde_json::from_str(&text)
            .with_context(|| format!("parse {}", path.display()))?,
        Format::Yaml => serde_yaml::from_str(&text)
            .with_context(|| format!("parse {}", path.display()))?,
    };
    Ok(config)
}

/// Write [`Config::sample`] to `path`. An existing file is left alone.
pub fn write_sample(path: &Path) -> Result<()> {
    if path.exists() {
        bail!("{} already exists, not overwriting it", path.display());
    }
    let sample = Config::sample();
    let text = match Format::of(path) {
        Format::Json => serde_json::to_string_pretty(&sample)?,
        Format::Yaml => serde_yaml::to_string(&sample)?,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, text).with_context(|| format!("write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_loads_back_in_both_formats() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["copy.yaml", "copy.json", "nested/copy.yml"] {
            let path = dir.path().join(name);
            write_sample(&path).unwrap();
            let config = load(&path).unwrap();
            config.validate().unwrap();
            assert_eq!(config.clients.len(), 4, "{name}");
        }
    }

    #[test]
    fn init_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "tasks: []\n").unwrap();
        assert!(write_sample(&path).is_err());
        assert_eq!(fs::read_to_string(&path).unwrap(), "tasks: []\n");
    }

    #[test]
    fn json_is_chosen_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.JSON");
        fs::write(
            &path,
            r#"{"debug": true, "clients": [{"kind": "local", "name": "disk"}]}"#,
        )
        .unwrap();
        let config = load(&path).unwrap();
        assert!(config.debug);
        assert!(config.tasks.is_empty());
    }

    #[test]
    fn missing_file_names_the_path() {
        let err = load(Path::new("/no/such/config.yaml")).unwrap_err();
        assert!(err.to_string().contains("/no/such/config.yaml"), "{err:#}");
    }
}
