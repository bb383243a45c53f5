//! The compilation driver.
//!
//! # Pipeline
//!
//! ```text
//! .prv files
//!     │
//!     ▼
//! ┌─────────┐   ┌─────────┐   ┌──────────┐   ┌─────────┐   ┌──────────┐   ┌─────────┐
//! │ sources │──▶│  lexer  │──▶│  parser  │──▶│ resolve │──▶│  check   │──▶│ emit C  │
//! └─────────┘   └─────────┘   └──────────┘   └─────────┘   └──────────┘   └─────────┘
//!                                                               │
//!                                                               ▼
//!                                                        contract verifier
//! ```
//!
//! Each stage appends diagnostics and continues as far as it can. A module
//! whose stage produced an *error* skips its remaining stages; other
//! modules still run all the way to emission. Warnings never gate.
//! Internal failures (unreadable file) abort with a [`FatalError`] carrying
//! a context trail.

use std::path::{Path, PathBuf};
use std::process::Command;

use prove_base::{Diagnostic, DiagnosticBag, FatalError, Interner, Severity, SourceMap};
use prove_language::ast::Module;
use prove_language::{lexer, parser};

use crate::analysis::check::check_module;
use crate::codegen_c::{emit_module, CompiledUnit};
use crate::contracts::{verify_module, CoverageSummary};
use crate::manifest::Manifest;
use crate::resolve::{exports_of, resolve_module, ExportMap};

/// Everything one `compile` run produced.
#[derive(Debug)]
pub struct Compilation {
    pub sources: SourceMap,
    pub interner: Interner,
    pub diagnostics: DiagnosticBag,
    /// One unit per error-free module.
    pub units: Vec<CompiledUnit>,
    /// Per-module contract coverage, for the `check` summary.
    pub coverage: Vec<(String, CoverageSummary)>,
}

impl Compilation {
    pub fn success(&self) -> bool {
        !self.diagnostics.has_errors()
    }
}

/// Module names are CamelCase; file stems are converted so `net_util.prv`
/// is importable as `NetUtil`.
fn module_name_of(path: &Path) -> String {
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("main");
    let mut out = String::with_capacity(stem.len());
    let mut upper_next = true;
    for c in stem.chars() {
        if c == '_' || c == '-' {
            upper_next = true;
        } else if upper_next {
            out.push(c.to_ascii_uppercase());
            upper_next = false;
        } else {
            out.push(c);
        }
    }
    out
}

/// Runs the full pipeline over a set of `.prv` files.
///
/// Imports resolve against modules earlier in `paths`.
pub fn compile<P: AsRef<Path>>(paths: &[P], manifest: &Manifest) -> Result<Compilation, FatalError> {
    if manifest.build.target != "native" {
        return Err(FatalError::new(format!(
            "build target '{}' is not supported; only 'native' is implemented",
            manifest.build.target
        )));
    }

    let mut sources = SourceMap::new();
    let mut interner = Interner::new();
    let mut diagnostics = DiagnosticBag::new();
    let explain_config = manifest.explain_config();

    // Parse every module first so the emitter knows the full module list.
    let mut modules: Vec<(String, Module, bool)> = Vec::new();
    for path in paths {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| FatalError::from(e).in_context(format!("loading {}", path.display())))?;
        let file = sources.add_file(path.display().to_string(), text);
        let name = module_name_of(path);
        let name_sym = interner.intern(&name);

        let (tokens, lex_diags) = lexer::lex(sources.file(file).text(), file, &mut interner);
        let lex_failed = has_error(&lex_diags);
        diagnostics.extend(lex_diags);
        if lex_failed {
            modules.push((name, empty_module(name_sym), true));
            continue;
        }

        let (module, parse_diags) = parser::parse_module(&tokens, file, name_sym, &interner);
        let parse_failed = has_error(&parse_diags);
        diagnostics.extend(parse_diags);
        modules.push((name, module, parse_failed));
    }

    let module_names: Vec<String> = modules.iter().map(|(name, _, _)| name.clone()).collect();

    // Semantic stages, module by module; each module's exports feed later
    // modules.
    let mut exports = ExportMap::new();
    let mut units = Vec::new();
    let mut coverage = Vec::new();
    for (name, module, failed) in &mut modules {
        if *failed {
            continue;
        }

        let mut stage_diags = Vec::new();
        let resolved = resolve_module(module, &exports, &mut interner, &mut stage_diags);
        let resolve_failed = has_error(&stage_diags);
        diagnostics.extend(stage_diags);
        if resolve_failed {
            continue;
        }

        let mut stage_diags = Vec::new();
        let check = check_module(module, &resolved, &interner, &mut stage_diags);
        let check_failed = has_error(&stage_diags);
        diagnostics.extend(stage_diags);
        if check_failed {
            continue;
        }

        let mut stage_diags = Vec::new();
        let summary =
            verify_module(module, &resolved, &check, &explain_config, &interner, &mut stage_diags);
        let verify_failed = has_error(&stage_diags);
        diagnostics.extend(stage_diags);
        coverage.push((name.clone(), summary));
        if verify_failed {
            continue;
        }

        units.push(emit_module(module, name, &module_names, &resolved, &check, &interner));
        exports.insert(interner.intern(name), exports_of(&resolved));
    }

    Ok(Compilation { sources, interner, diagnostics, units, coverage })
}

fn has_error(diags: &[Diagnostic]) -> bool {
    diags.iter().any(|d| d.severity == Severity::Error)
}

fn empty_module(name: prove_base::Symbol) -> Module {
    Module {
        name,
        doc: None,
        narrative: None,
        imports: Vec::new(),
        types: Vec::new(),
        constants: Vec::new(),
        functions: Vec::new(),
        mains: Vec::new(),
        foreigns: Vec::new(),
        networks: Vec::new(),
        span: prove_base::Span::default(),
    }
}

/// Writes the generated units into `out_dir`, one `<module>.c` each.
pub fn write_units(compilation: &Compilation, out_dir: &Path) -> Result<Vec<PathBuf>, FatalError> {
    std::fs::create_dir_all(out_dir)
        .map_err(|e| FatalError::from(e).in_context(format!("creating {}", out_dir.display())))?;
    let mut written = Vec::new();
    for unit in &compilation.units {
        let path = out_dir.join(format!("{}.c", unit.name));
        std::fs::write(&path, &unit.source)
            .map_err(|e| FatalError::from(e).in_context(format!("writing {}", path.display())))?;
        written.push(path);
    }
    Ok(written)
}

/// Invokes the system C compiler over the written units.
///
/// Returns the compiler's exit code; `build` surfaces it as its own.
pub fn invoke_cc(
    compilation: &Compilation,
    c_files: &[PathBuf],
    manifest: &Manifest,
    out_dir: &Path,
) -> Result<i32, FatalError> {
    let binary = out_dir.join(&manifest.package.name);
    let mut cmd = Command::new("cc");
    cmd.args(c_files);
    cmd.arg("-o").arg(&binary);
    if manifest.build.optimize {
        cmd.arg("-O2");
    }
    for flag in &manifest.build.c_flags {
        cmd.arg(flag);
    }
    cmd.arg("-lprove_runtime");
    for unit in &compilation.units {
        for library in &unit.libraries {
            cmd.arg(format!("-l{library}"));
        }
    }
    for flag in &manifest.build.link_flags {
        cmd.arg(flag);
    }
    let status = cmd
        .status()
        .map_err(|e| FatalError::from(e).in_context("invoking the C compiler"))?;
    Ok(status.code().unwrap_or(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn module_names_camel_case_the_stem() {
        assert_eq!(module_name_of(Path::new("net.prv")), "Net");
        assert_eq!(module_name_of(Path::new("src/net_util.prv")), "NetUtil");
        assert_eq!(module_name_of(Path::new("http-client.prv")), "HttpClient");
    }

    #[test]
    fn compile_reports_missing_file_as_fatal() {
        let manifest = Manifest::default();
        let err = compile(&[Path::new("/does/not/exist.prv")], &manifest).unwrap_err();
        assert!(err.to_string().contains("loading"));
    }

    #[test]
    fn non_native_target_is_rejected() {
        let mut manifest = Manifest::default();
        manifest.build.target = "wasm".to_string();
        let err = compile(&[Path::new("whatever.prv")], &manifest).unwrap_err();
        assert!(err.to_string().contains("only 'native'"));
    }

    #[test]
    fn clean_module_emits_a_unit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hello.prv");
        std::fs::write(&path, "main()!\nfrom\n    println(\"Hello from Prove!\")\n").unwrap();
        let compilation = compile(&[&path], &Manifest::default()).unwrap();
        assert!(compilation.success(), "diagnostics: {:?}",
            compilation.diagnostics.iter().map(|d| (d.code, d.message.clone())).collect::<Vec<_>>());
        assert_eq!(compilation.units.len(), 1);
        assert!(compilation.units[0].source.contains("int main(int argc, char **argv)"));
        assert!(compilation.units[0].source.contains("prove_runtime_init"));
    }

    #[test]
    fn erroring_module_skips_emission_but_reports() {
        let dir = tempfile::tempdir().unwrap();
        let bad = dir.path().join("bad.prv");
        std::fs::write(&bad, "transforms id(x Integer) Integer\nfrom\n    missing\n").unwrap();
        let compilation = compile(&[&bad], &Manifest::default()).unwrap();
        assert!(!compilation.success());
        assert!(compilation.units.is_empty());
    }

    #[test]
    fn error_in_one_module_does_not_stop_another() {
        let dir = tempfile::tempdir().unwrap();
        let bad = dir.path().join("bad.prv");
        std::fs::write(&bad, "transforms id(x Integer) Integer\nfrom\n    missing\n").unwrap();
        let good = dir.path().join("good.prv");
        std::fs::write(&good, "main()!\nfrom\n    println(\"ok\")\n").unwrap();
        let compilation = compile(&[&bad, &good], &Manifest::default()).unwrap();
        assert!(!compilation.success());
        assert_eq!(compilation.units.len(), 1);
        assert_eq!(compilation.units[0].name, "Good");
    }

    #[test]
    fn write_units_creates_c_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hello.prv");
        std::fs::write(&path, "main()!\nfrom\n    println(\"hi\")\n").unwrap();
        let compilation = compile(&[&path], &Manifest::default()).unwrap();
        let out_dir = dir.path().join("out");
        let written = write_units(&compilation, &out_dir).unwrap();
        assert_eq!(written.len(), 1);
        assert!(written[0].ends_with("Hello.c"));
        assert!(std::fs::read_to_string(&written[0]).unwrap().contains("PROVE_RUNTIME_ABI"));
    }
}
