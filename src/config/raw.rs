use std::{fs, path::Path};

use walkdir::WalkDir;

use super::{is_kustomization_file, parse_documents, ConfigError, ConfigProvider};
use crate::resource::DeclaredResource;

const EXTENSIONS: &[&str] = &["yaml", "yml", "json"];

fn has_config_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|ext| EXTENSIONS.contains(&ext))
        .unwrap_or(false)
}

fn read(path: &Path) -> Result<Vec<DeclaredResource>, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_owned(),
        source,
    })?;
    parse_documents(&contents)
}

/// Plain yaml/json files, or directories of them
pub struct RawFileProvider;

impl ConfigProvider for RawFileProvider {
    fn is_supported(&self, path: &Path) -> bool {
        path.is_dir() || has_config_extension(path)
    }

    fn get_config(&self, path: &Path) -> Result<Vec<DeclaredResource>, ConfigError> {
        // Don't allow running on kustomization files, prevents weird things like globbing
        if is_kustomization_file(path) {
            return Err(ConfigError::KustomizationFile(
                path.parent().unwrap_or(path).to_owned(),
            ));
        }
        if !path.is_dir() {
            return read(path);
        }

        let mut objects = vec![];
        for entry in WalkDir::new(path).sort_by_file_name() {
            let entry = entry?;
            if !entry.file_type().is_file() || !has_config_extension(entry.path()) {
                continue;
            }
            // Nested kustomization is not a resource, its directory should be built by kustomize
            if is_kustomization_file(entry.path()) {
                log::debug!("Skipping {}", entry.path().display());
                continue;
            }
            objects.extend(read(entry.path())?);
        }
        Ok(objects)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CM: &str = "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: NAME\n  namespace: default\n";

    #[test]
    fn directory_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.yaml"), CM.replace("NAME", "second")).unwrap();
        fs::write(dir.path().join("a.yml"), CM.replace("NAME", "first")).unwrap();
        fs::write(dir.path().join("notes.txt"), "not a config").unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(
            dir.path().join("nested/c.json"),
            r#"{"apiVersion": "v1", "kind": "Secret", "metadata": {"name": "third"}}"#,
        )
        .unwrap();

        assert!(RawFileProvider.is_supported(dir.path()));
        let names: Vec<_> = RawFileProvider
            .get_config(dir.path())
            .unwrap()
            .iter()
            .map(|resource| resource.reference().name.clone())
            .collect();
        assert_eq!(names, vec!["first", "second", "third"]);
    }

    #[test]
    fn single_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("cm.yaml");
        fs::write(&file, format!("{}---\n{}", CM.replace("NAME", "a"), CM.replace("NAME", "b"))).unwrap();
        assert_eq!(RawFileProvider.get_config(&file).unwrap().len(), 2);
        assert!(!RawFileProvider.is_supported(&dir.path().join("cm.txt")));
    }

    #[test]
    fn refuses_kustomization_file() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["kustomization.yaml", "kustomization.yml"] {
            let file = dir.path().join(name);
            fs::write(&file, "resources: []\n").unwrap();
            assert!(matches!(
                RawFileProvider.get_config(&file),
                Err(ConfigError::KustomizationFile(parent)) if parent == dir.path()
            ));
        }
        assert!(is_kustomization_file(&dir.path().join("Kustomization")));
    }

    #[test]
    fn skips_nested_kustomization() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("cm.yaml"), CM.replace("NAME", "cm1")).unwrap();
        fs::create_dir(dir.path().join("overlay")).unwrap();
        fs::write(dir.path().join("overlay/kustomization.yml"), "resources:\n- ../cm.yaml\n").unwrap();
        fs::write(dir.path().join("overlay/kustomization.yaml"), "resources: []\n").unwrap();

        let names: Vec<_> = RawFileProvider
            .get_config(dir.path())
            .unwrap()
            .iter()
            .map(|resource| resource.reference().name.clone())
            .collect();
        assert_eq!(names, vec!["cm1"]);
    }

    #[test]
    fn missing_file() {
        assert!(matches!(
            RawFileProvider.get_config(Path::new("/nonexistent/kapply/cm.yaml")),
            Err(ConfigError::Io { .. })
        ));
    }
}
