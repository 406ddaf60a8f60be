//! Node Registration Service (spec §4.11): writes a generated node's
//! definition and script to disk, rolling back every file it wrote for
//! that node name if any step fails.

use super::generator::GeneratedNode;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("failed to serialize node definition: {0}")]
    Serialize(#[from] serde_yaml::Error),
    #[error("failed to write {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },
}

/// Writes `<definitions_dir>/<name>.yaml` and `<scripts_dir>/<name>.<ext>`.
/// On any failure, every file this call wrote is removed before the error
/// is returned — a partially-registered node is never left on disk.
pub struct RegistrationService {
    definitions_dir: PathBuf,
    scripts_dir: PathBuf,
}

impl RegistrationService {
    pub fn new(definitions_dir: impl Into<PathBuf>, scripts_dir: impl Into<PathBuf>) -> Self {
        Self {
            definitions_dir: definitions_dir.into(),
            scripts_dir: scripts_dir.into(),
        }
    }

    pub fn register(&self, generated: &GeneratedNode) -> Result<(PathBuf, PathBuf), RegistrationError> {
        let yaml = serde_yaml::to_string(&generated.definition)?;
        let extension = match generated.language {
            super::gap::Language::Python => "py",
            super::gap::Language::Javascript => "js",
        };

        let definition_path = self.definitions_dir.join(format!("{}.yaml", generated.definition.name));
        let script_path = self.scripts_dir.join(format!("{}.{extension}", generated.definition.name));

        let mut written = Vec::new();
        let result = self.write_all(&definition_path, &yaml, &script_path, &generated.code, &mut written);
        match result {
            Ok(()) => Ok((definition_path, script_path)),
            Err(err) => {
                for path in &written {
                    let _ = std::fs::remove_file(path);
                }
                Err(err)
            }
        }
    }

    fn write_all(
        &self,
        definition_path: &Path,
        yaml: &str,
        script_path: &Path,
        code: &str,
        written: &mut Vec<PathBuf>,
    ) -> Result<(), RegistrationError> {
        self.write_one(definition_path, yaml, written)?;
        self.write_one(script_path, code, written)?;
        Ok(())
    }

    fn write_one(&self, path: &Path, contents: &str, written: &mut Vec<PathBuf>) -> Result<(), RegistrationError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| RegistrationError::Io { path: path.to_path_buf(), source })?;
        }
        std::fs::write(path, contents).map_err(|source| RegistrationError::Io { path: path.to_path_buf(), source })?;
        written.push(path.to_path_buf());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::gap::{GapAnalysis, Language};
    use crate::codegen::generator::Generator;
    use tempfile::tempdir;

    fn generated_sum_node() -> GeneratedNode {
        let generator = Generator::new();
        let analysis = GapAnalysis {
            has_gap: true,
            suggested_node_name: Some("sum_values".to_string()),
            suggested_language: Some(Language::Python),
            inferred_parameters: Vec::new(),
            missing_capabilities: vec!["sum_values".to_string()],
            confidence: 0.6,
        };
        generator.generate(&analysis).expect("generates")
    }

    #[test]
    fn registers_definition_and_script() {
        let dir = tempdir().unwrap();
        let service = RegistrationService::new(dir.path().join("defs"), dir.path().join("scripts"));
        let generated = generated_sum_node();
        let (definition_path, script_path) = service.register(&generated).expect("registers");
        assert!(definition_path.exists());
        assert!(script_path.exists());
    }

    #[test]
    fn failure_rolls_back_already_written_files() {
        let dir = tempdir().unwrap();
        let scripts_dir = dir.path().join("scripts");
        // Pre-create the scripts path as a directory so writing the script
        // file there fails after the definition file has already landed.
        std::fs::create_dir_all(scripts_dir.join("sum_values.py")).unwrap();

        let service = RegistrationService::new(dir.path().join("defs"), &scripts_dir);
        let generated = generated_sum_node();
        let result = service.register(&generated);
        assert!(result.is_err());
        assert!(!dir.path().join("defs").join("sum_values.yaml").exists());
    }
}
