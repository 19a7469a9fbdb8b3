//! Sources of declared resources

mod kustomize;
mod raw;

use std::{
    fmt::{self, Display},
    path::{Path, PathBuf},
};

use kapply_inventory::ResourceReference;
use serde::Deserialize;
use serde_json::Value;
use serde_yaml_with_quirks::DeserializingQuirks;
use subprocess::PopenError;
use thiserror::Error;

use crate::resource::DeclaredResource;

pub use kustomize::KustomizeProvider;

/// File names `kustomize build` recognizes as a kustomization root
pub(crate) const KUSTOMIZATION_FILES: &[&str] = &["kustomization.yaml", "kustomization.yml", "Kustomization"];

pub(crate) fn is_kustomization_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|s| s.to_str())
        .map(|name| KUSTOMIZATION_FILES.contains(&name))
        .unwrap_or(false)
}
pub use raw::RawFileProvider;

#[derive(Debug)]
pub struct IdentStr(pub String);
impl Display for IdentStr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in self.0.lines() {
            writeln!(f, "\t{}", line)?;
        }

        Ok(())
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("no config provider supports {0}")]
    Unsupported(PathBuf),
    #[error("cannot run on a kustomization file - use the directory ({0}) instead")]
    KustomizationFile(PathBuf),
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to walk directory: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("failed to parse yaml: {0}")]
    Yaml(#[from] serde_yaml_with_quirks::Error),
    #[error("object is missing {0}")]
    MissingField(&'static str),
    #[error("top level documents should be objects")]
    NotAnObject,
    #[error("list object items should be array")]
    InvalidList,
    #[error("kustomize binary not found in path: {0}")]
    KustomizeNotFound(std::io::Error),
    #[error("kustomize build failed:\n{0}")]
    Kustomize(IdentStr),
    #[error("spawn error: {0}")]
    Popen(PopenError),
    #[error("more than one inventory object declared: {}", .0.iter().map(ToString::to_string).collect::<Vec<_>>().join(", "))]
    MultipleInventoryObjects(Vec<ResourceReference>),
}

/// Turns a path into ordered sequence of declared resources
pub trait ConfigProvider: Send + Sync {
    fn is_supported(&self, path: &Path) -> bool;

    fn get_config(&self, path: &Path) -> Result<Vec<DeclaredResource>, ConfigError>;
}

/// Tries providers in order, first one supporting path wins
pub struct ProviderChain {
    providers: Vec<Box<dyn ConfigProvider>>,
}

impl ProviderChain {
    pub fn new(providers: Vec<Box<dyn ConfigProvider>>) -> Self {
        Self { providers }
    }

    pub fn with(mut self, provider: impl ConfigProvider + 'static) -> Self {
        self.providers.push(Box::new(provider));
        self
    }
}

impl Default for ProviderChain {
    fn default() -> Self {
        Self::new(vec![])
            .with(KustomizeProvider::default())
            .with(RawFileProvider)
    }
}

impl ConfigProvider for ProviderChain {
    fn is_supported(&self, path: &Path) -> bool {
        self.providers
            .iter()
            .any(|provider| provider.is_supported(path))
    }

    fn get_config(&self, path: &Path) -> Result<Vec<DeclaredResource>, ConfigError> {
        match self
            .providers
            .iter()
            .find(|provider| provider.is_supported(path))
        {
            Some(provider) => provider.get_config(path),
            None => Err(ConfigError::Unsupported(path.to_owned())),
        }
    }
}

fn flatten(item: Value, out: &mut Vec<DeclaredResource>) -> Result<(), ConfigError> {
    // This check is enough
    // https://github.com/kubernetes/apimachinery/blob/master/pkg/apis/meta/v1/unstructured/unstructured.go#L54
    match item {
        Value::Object(mut obj) if obj.contains_key("items") => {
            let items = match obj.remove("items") {
                Some(Value::Array(items)) => items,
                _ => return Err(ConfigError::InvalidList),
            };
            for item in items {
                flatten(item, out)?;
            }
            Ok(())
        }
        item => {
            out.push(DeclaredResource::new(item)?);
            Ok(())
        }
    }
}

/// Parse multi-document yaml stream, list objects are flattened
pub(crate) fn parse_documents(contents: &str) -> Result<Vec<DeclaredResource>, ConfigError> {
    let mut out = Vec::new();
    for document in serde_yaml_with_quirks::Deserializer::from_str_with_quirks(
        contents,
        DeserializingQuirks { old_octals: true },
    ) {
        let value = Value::deserialize(document)?;
        if matches!(&value, Value::Null) {
            continue;
        }
        flatten(value, &mut out)?;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_are_flattened() {
        let parsed = parse_documents(
            r#"
apiVersion: v1
kind: ConfigMap
metadata:
  name: cm1
  namespace: default
---
apiVersion: v1
kind: List
items:
- apiVersion: v1
  kind: ConfigMap
  metadata:
    name: cm2
- apiVersion: v1
  kind: Secret
  metadata:
    name: s1
---
"#,
        )
        .unwrap();
        let names: Vec<_> = parsed
            .iter()
            .map(|resource| resource.reference().name.as_str())
            .collect();
        assert_eq!(names, vec!["cm1", "cm2", "s1"]);
        assert_eq!(parsed[0].reference().namespace.as_deref(), Some("default"));
    }

    #[test]
    fn invalid_documents() {
        assert!(matches!(
            parse_documents("kind: List\nitems: 3\n"),
            Err(ConfigError::InvalidList)
        ));
        assert!(matches!(
            parse_documents("apiVersion: v1\nkind: ConfigMap\n"),
            Err(ConfigError::MissingField("metadata"))
        ));
        assert!(matches!(parse_documents("- a\n- b\n"), Err(ConfigError::NotAnObject)));
    }

    struct Fixed(&'static str);
    impl ConfigProvider for Fixed {
        fn is_supported(&self, path: &Path) -> bool {
            path.starts_with(self.0)
        }
        fn get_config(&self, _path: &Path) -> Result<Vec<DeclaredResource>, ConfigError> {
            parse_documents(&format!(
                "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: {}\n",
                self.0.trim_start_matches('/')
            ))
        }
    }

    #[test]
    fn chain_order() {
        let chain = ProviderChain::new(vec![]).with(Fixed("/a")).with(Fixed("/"));
        let from_a = chain.get_config(Path::new("/a/b")).unwrap();
        assert_eq!(from_a[0].reference().name, "a");
        assert!(chain.is_supported(Path::new("/c")));

        let empty = ProviderChain::new(vec![]);
        assert!(!empty.is_supported(Path::new("/c")));
        assert!(matches!(
            empty.get_config(Path::new("/c")),
            Err(ConfigError::Unsupported(_))
        ));
    }
}
