//! Project manifest (`prove.toml`) loading.
//!
//! Every key has a default, so an absent manifest means a fully defaulted
//! build. Unknown keys are ignored: older compilers keep working against
//! newer manifests.
//!
//! | Section | Key | Default |
//! |---------|-----|---------|
//! | `[package]` | `name` | `untitled` |
//! | | `version` | `0.0.0` |
//! | `[build]` | `target` | `native` |
//! | | `optimize` | `false` |
//! | | `c_flags` / `link_flags` | `[]` |
//! | `[test]` | `property_rounds` | `1000` |
//! | `[style]` | `line_length` | `90` |
//! | `[explain]` | `operations` / `connectors` | `[]` |

use std::path::Path;

use serde::Deserialize;

use prove_base::FatalError;

use crate::contracts::explain::ExplainConfig;

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Manifest {
    pub package: PackageSection,
    pub build: BuildSection,
    pub test: TestSection,
    pub style: StyleSection,
    pub explain: ExplainSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PackageSection {
    /// Output binary name.
    pub name: String,
    /// Embedded in diagnostics.
    pub version: String,
}

impl Default for PackageSection {
    fn default() -> Self {
        Self { name: "untitled".to_string(), version: "0.0.0".to_string() }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BuildSection {
    /// Selects the emitter; only `native` is implemented.
    pub target: String,
    /// Passes `-O2` to the C compiler.
    pub optimize: bool,
    pub c_flags: Vec<String>,
    pub link_flags: Vec<String>,
}

impl Default for BuildSection {
    fn default() -> Self {
        Self {
            target: "native".to_string(),
            optimize: false,
            c_flags: Vec::new(),
            link_flags: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TestSection {
    /// Property-test iterations; consumed by the external harness.
    pub property_rounds: u32,
}

impl Default for TestSection {
    fn default() -> Self {
        Self { property_rounds: 1000 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StyleSection {
    /// Formatter line length; the formatter is an external collaborator.
    pub line_length: u32,
}

impl Default for StyleSection {
    fn default() -> Self {
        Self { line_length: 90 }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ExplainSection {
    /// Additional recognized operation verbs.
    pub operations: Vec<String>,
    /// Additional recognized connector words.
    pub connectors: Vec<String>,
}

impl Manifest {
    /// Loads a manifest file; a missing file yields all defaults.
    pub fn load(path: &Path) -> Result<Manifest, FatalError> {
        if !path.exists() {
            return Ok(Manifest::default());
        }
        let text = std::fs::read_to_string(path)
            .map_err(|e| FatalError::from(e).in_context(format!("reading {}", path.display())))?;
        Self::parse(&text)
            .map_err(|e| e.in_context(format!("parsing {}", path.display())))
    }

    pub fn parse(text: &str) -> Result<Manifest, FatalError> {
        toml::from_str(text).map_err(|e| FatalError::new(format!("invalid manifest: {e}")))
    }

    /// The `[explain]` extensions for the CNL analyzer.
    pub fn explain_config(&self) -> ExplainConfig {
        ExplainConfig {
            operations: self.explain.operations.clone(),
            connectors: self.explain.connectors.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let manifest = Manifest::load(Path::new("/nonexistent/prove.toml")).unwrap();
        assert_eq!(manifest.package.name, "untitled");
        assert_eq!(manifest.package.version, "0.0.0");
        assert_eq!(manifest.build.target, "native");
        assert!(!manifest.build.optimize);
        assert_eq!(manifest.test.property_rounds, 1000);
        assert_eq!(manifest.style.line_length, 90);
    }

    #[test]
    fn all_sections_parse() {
        let manifest = Manifest::parse(
            r#"
[package]
name = "webapp"
version = "1.2.0"

[build]
optimize = true
c_flags = ["-Wall"]
link_flags = ["-lm"]

[test]
property_rounds = 50

[style]
line_length = 100

[explain]
operations = ["tally"]
connectors = ["across"]
"#,
        )
        .unwrap();
        assert_eq!(manifest.package.name, "webapp");
        assert!(manifest.build.optimize);
        assert_eq!(manifest.build.c_flags, vec!["-Wall"]);
        assert_eq!(manifest.test.property_rounds, 50);
        assert_eq!(manifest.style.line_length, 100);
        assert_eq!(manifest.explain.operations, vec!["tally"]);
        assert_eq!(manifest.explain_config().connectors, vec!["across"]);
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let manifest = Manifest::parse("[package]\nname = \"x\"\nfuture_key = 3\n").unwrap();
        assert_eq!(manifest.package.name, "x");
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let manifest = Manifest::parse("[build]\noptimize = true\n").unwrap();
        assert!(manifest.build.optimize);
        assert_eq!(manifest.build.target, "native");
        assert_eq!(manifest.package.name, "untitled");
    }

    #[test]
    fn load_reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prove.toml");
        std::fs::write(&path, "[package]\nname = \"ondisk\"\n").unwrap();
        let manifest = Manifest::load(&path).unwrap();
        assert_eq!(manifest.package.name, "ondisk");
    }

    #[test]
    fn bad_toml_is_a_fatal_error() {
        assert!(Manifest::parse("not [valid").is_err());
    }
}
