use std::path::Path;

use subprocess::{Exec, PopenError, Redirection};

use super::{parse_documents, ConfigError, ConfigProvider, IdentStr, KUSTOMIZATION_FILES};
use crate::resource::DeclaredResource;

/// Renders kustomization directories with `kustomize build`
pub struct KustomizeProvider {
    binary: String,
}

impl KustomizeProvider {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Default for KustomizeProvider {
    fn default() -> Self {
        Self::new("kustomize")
    }
}

impl ConfigProvider for KustomizeProvider {
    fn is_supported(&self, path: &Path) -> bool {
        path.is_dir()
            && KUSTOMIZATION_FILES
                .iter()
                .any(|file| path.join(file).is_file())
    }

    fn get_config(&self, path: &Path) -> Result<Vec<DeclaredResource>, ConfigError> {
        log::debug!("Running {} build {}", self.binary, path.display());
        let capture = Exec::cmd(&self.binary)
            .arg("build")
            .arg(path)
            .stdout(Redirection::Pipe)
            .stderr(Redirection::Pipe)
            .capture()
            .map_err(|e| match e {
                PopenError::IoError(io) => ConfigError::KustomizeNotFound(io),
                e => ConfigError::Popen(e),
            })?;

        if !capture.success() {
            return Err(ConfigError::Kustomize(IdentStr(capture.stderr_str())));
        }

        parse_documents(&capture.stdout_str())
    }
}
