//! YAML Node Loader (spec §4.7): reads node definitions and their
//! optional companion scripts from a definitions/scripts directory pair.

use super::definition::{parse_definition, DefinitionError, NodeDefinition};
use std::path::{Path, PathBuf};

/// Resolves node definitions by name from a definitions directory, and
/// companion code by name+language from a scripts directory — the
/// filesystem layout the spec's "YAML node definition file" interface
/// describes (§6): one `<defs>/<name>.yaml`, one optional
/// `<scripts>/<name>.{py,js,...}`.
pub struct YamlNodeLoader {
    definitions_dir: PathBuf,
    scripts_dir: PathBuf,
}

impl YamlNodeLoader {
    pub fn new(definitions_dir: impl Into<PathBuf>, scripts_dir: impl Into<PathBuf>) -> Self {
        Self {
            definitions_dir: definitions_dir.into(),
            scripts_dir: scripts_dir.into(),
        }
    }

    fn definition_path(&self, name: &str) -> PathBuf {
        self.definitions_dir.join(format!("{name}.yaml"))
    }

    /// Loads and parses `<definitions_dir>/<name>.yaml`.
    pub fn load(&self, name: &str) -> Result<NodeDefinition, DefinitionError> {
        let path = self.definition_path(name);
        let text = std::fs::read_to_string(&path).map_err(|_| DefinitionError::NotFound(name.to_string()))?;
        parse_definition(&text)
    }

    /// Locates the companion script for `name`, trying every extension in
    /// `candidate_extensions` (order matters — first match wins) under the
    /// scripts directory.
    pub fn load_script(&self, name: &str, candidate_extensions: &[&str]) -> Option<(PathBuf, String)> {
        for ext in candidate_extensions {
            let path = self.scripts_dir.join(format!("{name}.{ext}"));
            if let Ok(code) = std::fs::read_to_string(&path) {
                return Some((path, code));
            }
        }
        None
    }

    pub fn definitions_dir(&self) -> &Path {
        &self.definitions_dir
    }

    pub fn scripts_dir(&self) -> &Path {
        &self.scripts_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn loads_definition_and_matching_script() {
        let dir = tempdir().unwrap();
        let defs = dir.path().join("defs");
        let scripts = dir.path().join("scripts");
        std::fs::create_dir_all(&defs).unwrap();
        std::fs::create_dir_all(&scripts).unwrap();
        std::fs::write(
            defs.join("sum_values.yaml"),
            "name: sum_values\nexecutor_type: code\nlanguage: python\n",
        )
        .unwrap();
        std::fs::write(scripts.join("sum_values.py"), "output_data = {'total': sum(values)}\n").unwrap();

        let loader = YamlNodeLoader::new(&defs, &scripts);
        let definition = loader.load("sum_values").expect("loads");
        assert_eq!(definition.name, "sum_values");

        let (path, code) = loader.load_script("sum_values", &["py", "js"]).expect("script found");
        assert!(path.ends_with("sum_values.py"));
        assert!(code.contains("sum(values)"));
    }

    #[test]
    fn missing_definition_is_not_found() {
        let dir = tempdir().unwrap();
        let loader = YamlNodeLoader::new(dir.path().join("defs"), dir.path().join("scripts"));
        assert!(matches!(loader.load("nope"), Err(DefinitionError::NotFound(_))));
    }

    #[test]
    fn missing_script_returns_none() {
        let dir = tempdir().unwrap();
        let scripts = dir.path().join("scripts");
        std::fs::create_dir_all(&scripts).unwrap();
        let loader = YamlNodeLoader::new(dir.path().join("defs"), &scripts);
        assert!(loader.load_script("nope", &["py"]).is_none());
    }
}
