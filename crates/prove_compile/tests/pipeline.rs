//! End-to-end pipeline scenarios: source text through check, verify, and C
//! emission.

use std::path::PathBuf;

use prove_compile::compile::{compile, write_units};
use prove_compile::manifest::Manifest;

fn write_source(dir: &tempfile::TempDir, name: &str, source: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, source).unwrap();
    path
}

fn compile_source(source: &str) -> prove_compile::Compilation {
    let dir = tempfile::tempdir().unwrap();
    let path = write_source(&dir, "app.prv", source);
    compile(&[&path], &Manifest::default()).unwrap()
}

fn codes(compilation: &prove_compile::Compilation) -> Vec<&'static str> {
    compilation.diagnostics.iter().map(|d| d.code).collect()
}

#[test]
fn hello_world_builds_and_calls_the_runtime() {
    let compilation = compile_source("main()!\nfrom\n    println(\"Hello from Prove!\")\n");
    assert!(compilation.success(), "{:?}", codes(&compilation));
    let unit = &compilation.units[0];
    assert!(unit.source.contains("prove_println"));
    assert!(unit.source.contains("Hello from Prove!"));
    assert!(unit.source.contains("int main(int argc, char **argv)"));
    assert!(unit.source.contains("prove_runtime_init()"));
    assert!(unit.source.contains("prove_runtime_cleanup()"));
}

#[test]
fn verb_dispatch_selects_by_context() {
    let source = "\
type Email is String

validates email(a String)
from
    contains(a, \"@\")

transforms email(raw String) Email
from
    lowercase(trim(raw))

main()!
from
    ok as Boolean = email(\"a@b.c\")
    name as Email = email(\"  A@B.C \")
    println(name)
";
    let compilation = compile_source(source);
    assert!(compilation.success(), "{:?}", codes(&compilation));
    let unit = &compilation.units[0];
    // Both variants are emitted under distinct mangled identities, and both
    // are called from main.
    assert!(unit.source.contains("prove_validates_email_String"));
    assert!(unit.source.contains("prove_transforms_email_String"));
}

#[test]
fn refinement_rejection_is_static_with_clamp_suggestion() {
    let source = "\
type Port is Integer where 1..65535

main()!
from
    port as Port = 70000
    println(\"unreachable\")
";
    let compilation = compile_source(source);
    assert!(!compilation.success());
    let diag = compilation
        .diagnostics
        .iter()
        .find(|d| d.code == "E310")
        .expect("refinement rejection");
    assert!(diag.suggestions.iter().any(|s| s.contains("clamp(70000, 1, 65535)")));
    // The span points at the offending literal.
    assert_eq!(compilation.sources.snippet(diag.span), "70000");
}

#[test]
fn refinement_boundaries_are_inclusive() {
    for port in ["1", "65535"] {
        let source = format!(
            "type Port is Integer where 1..65535\n\nmain()!\nfrom\n    port as Port = {port}\n    println(\"ok\")\n"
        );
        let compilation = compile_source(&source);
        assert!(compilation.success(), "{port}: {:?}", codes(&compilation));
    }
    let compilation = compile_source(
        "type Port is Integer where 1..65535\n\nmain()!\nfrom\n    port as Port = 0\n    println(\"no\")\n",
    );
    assert!(codes(&compilation).contains(&"E310"));
}

#[test]
fn fail_propagation_lowers_to_early_return() {
    let source = "\
type Config is with raw String

inputs decode(raw String) Config!
from
    Config(raw)

inputs load(path String) Config!
from
    raw as String = read_file(path)!
    decode(raw)!
";
    let compilation = compile_source(source);
    assert!(compilation.success(), "{:?}", codes(&compilation));
    let unit = &compilation.units[0];
    assert!(unit.source.contains("PROVE_ERR"));
    assert!(unit.source.contains("return prove_err("));
    assert!(unit.source.contains("prove_read_file"));
}

#[test]
fn non_exhaustive_match_names_the_missing_variant() {
    let source = "\
type Shape is Circle(r Decimal) | Rect(w Decimal, h Decimal)

matches area(s Shape) Decimal
from
    Circle(r) => pi * r * r
";
    let compilation = compile_source(source);
    assert!(!compilation.success());
    let diag = compilation
        .diagnostics
        .iter()
        .find(|d| d.code == "E303")
        .expect("exhaustiveness error");
    assert!(diag.message.contains("Rect"));
}

#[test]
fn exhaustive_match_emits_a_switch_on_the_tag() {
    let source = "\
type Shape is Circle(r Decimal) | Rect(w Decimal, h Decimal)

matches area(s Shape) Decimal
from
    Circle(r) => pi * r * r
    Rect(w, h) => w * h
";
    let compilation = compile_source(source);
    assert!(compilation.success(), "{:?}", codes(&compilation));
    let unit = &compilation.units[0];
    assert!(unit.source.contains("switch ("));
    assert!(unit.source.contains("Type_Shape_tag_Circle"));
    assert!(unit.source.contains("Type_Shape_tag_Rect"));
    assert!(unit.source.contains("uint8_t tag;"));
}

#[test]
fn explain_strict_mode_counts_rows_against_statements() {
    let source = "\
transforms clamp(x Integer, lo Integer, hi Integer) Integer
ensures result >= lo
explain
    bound value from below using lo
    return result
from
    a as Integer = max(lo, x)
    b as Integer = min(a, hi)
    b
";
    let compilation = compile_source(source);
    let diag = compilation
        .diagnostics
        .iter()
        .find(|d| d.code == "E390")
        .expect("strict explain count mismatch");
    assert!(diag.message.contains("2 rows"));
    assert!(diag.message.contains("3 statements"));
}

#[test]
fn explain_with_matching_rows_passes() {
    let source = "\
transforms clamp(x Integer, lo Integer, hi Integer) Integer
ensures result >= lo
explain
    bound value from below using lo
    bound value from above using hi
    return result
from
    a as Integer = max(lo, x)
    b as Integer = min(a, hi)
    b
";
    let compilation = compile_source(source);
    assert!(compilation.success(), "{:?}", codes(&compilation));
}

#[test]
fn transforms_calling_println_is_e362() {
    let source = "\
transforms noisy(x Integer) Integer
from
    println(\"side effect\")
    x
";
    let compilation = compile_source(source);
    assert!(codes(&compilation).contains(&"E362"));
}

#[test]
fn pure_function_calling_inputs_is_e363() {
    let source = "\
inputs fetch(path String) String!
from
    read_file(path)!

transforms sneaky(path String) String
from
    fetch(path)
";
    let compilation = compile_source(source);
    assert!(codes(&compilation).contains(&"E363"));
}

#[test]
fn recursion_without_terminates_is_e366() {
    let source = "\
transforms countdown(n Integer) Integer
from
    countdown(n - 1)
";
    let compilation = compile_source(source);
    assert!(codes(&compilation).contains(&"E366"));
}

#[test]
fn terminates_with_integer_decrement_is_accepted() {
    let source = "\
transforms countdown(n Integer) Integer
terminates: n
from
    countdown(n - 1)
";
    let compilation = compile_source(source);
    assert!(
        !codes(&compilation).contains(&"E366"),
        "{:?}",
        codes(&compilation)
    );
}

#[test]
fn believe_without_ensures_is_e393() {
    let source = "\
transforms inc(x Integer) Integer
believe result > x
from
    x + 1
";
    let compilation = compile_source(source);
    assert!(codes(&compilation).contains(&"E393"));
}

#[test]
fn fail_marker_outside_io_verbs_is_e361() {
    let source = "\
transforms risky(path String) String
from
    read_file(path)!
";
    let compilation = compile_source(source);
    assert!(codes(&compilation).contains(&"E361"));
}

#[test]
fn chain_gaps_surface_in_the_coverage_summary() {
    let source = "\
transforms helper(x Integer) Integer
from
    x + 1

transforms outer(x Integer) Integer
ensures result >= x
from
    helper(x)
";
    let compilation = compile_source(source);
    assert!(compilation.success(), "{:?}", codes(&compilation));
    let (_, summary) = &compilation.coverage[0];
    assert_eq!(summary.chain_gaps.len(), 1);
    assert_eq!(summary.chain_gaps[0].callee, "helper");
    assert!(summary.render().contains("chain gap"));
}

#[test]
fn trusted_callee_closes_the_chain_gap() {
    let source = "\
transforms helper(x Integer) Integer
trusted \"audited by hand\"
from
    x + 1

transforms outer(x Integer) Integer
ensures result >= x
from
    helper(x)
";
    let compilation = compile_source(source);
    assert!(compilation.success(), "{:?}", codes(&compilation));
    let (_, summary) = &compilation.coverage[0];
    assert!(summary.chain_gaps.is_empty());
}

#[test]
fn generic_function_monomorphizes_per_instantiation() {
    let source = "\
transforms first_or(items List<T>, fallback T) T
from
    match head(items)
        Some(x) => x
        None => fallback

main()!
from
    n as Integer = first_or([1, 2, 3], 0)
    s as String = first_or([\"a\"], \"z\")
    println(s)
";
    let compilation = compile_source(source);
    assert!(compilation.success(), "{:?}", codes(&compilation));
    let unit = &compilation.units[0];
    assert!(unit.source.contains("__Integer"));
    assert!(unit.source.contains("__String"));
}

#[test]
fn emitting_twice_is_byte_identical() {
    let source = "\
type Shape is Circle(r Decimal) | Rect(w Decimal, h Decimal)

matches area(s Shape) Decimal
from
    Circle(r) => pi * r * r
    Rect(w, h) => w * h

main()!
from
    println(\"ok\")
";
    let first = compile_source(source);
    let second = compile_source(source);
    assert!(first.success() && second.success());
    assert_eq!(first.units[0].source, second.units[0].source);
}

#[test]
fn foreign_block_emits_externs_and_records_libraries() {
    let source = "\
foreign \"m\" with
    sqrt(x Decimal) Decimal

transforms hypotenuse(a Decimal, b Decimal) Decimal
from
    sqrt(a * a + b * b)
";
    let compilation = compile_source(source);
    assert!(compilation.success(), "{:?}", codes(&compilation));
    let unit = &compilation.units[0];
    assert!(unit.source.contains("extern double sqrt(double"));
    assert_eq!(unit.libraries, vec!["m"]);
}

#[test]
fn units_are_written_with_the_runtime_prelude() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_source(&dir, "hello.prv", "main()!\nfrom\n    println(\"hi\")\n");
    let compilation = compile(&[&path], &Manifest::default()).unwrap();
    let out_dir = dir.path().join("out");
    let written = write_units(&compilation, &out_dir).unwrap();
    let text = std::fs::read_to_string(&written[0]).unwrap();
    assert!(text.starts_with("/* Generated by the Prove compiler."));
    assert!(text.contains("#ifndef PROVE_RUNTIME_ABI"));
}

#[test]
fn if_outside_comptime_is_rejected() {
    let source = "\
transforms pick(x Integer) Integer
from
    if x > 0
        x
    else
        0 - x
";
    let compilation = compile_source(source);
    assert!(codes(&compilation).contains(&"E368"));
}

#[test]
fn string_interpolation_survives_to_emission() {
    let source = "\
main()!
from
    port as Integer = 8080
    println(f\"listening on {port}\")
";
    let compilation = compile_source(source);
    assert!(compilation.success(), "{:?}", codes(&compilation));
    let unit = &compilation.units[0];
    assert!(unit.source.contains("prove_string_concat"));
    assert!(unit.source.contains("prove_int_to_string"));
}

#[test]
fn pipe_desugars_to_an_appended_call() {
    let source = "\
transforms shout(s String) String
from
    uppercase(s)

main()!
from
    loud as String = \"hello\" |> shout
    println(loud)
";
    let compilation = compile_source(source);
    assert!(compilation.success(), "{:?}", codes(&compilation));
    assert!(compilation.units[0].source.contains("prove_transforms_shout_String("));
}

#[test]
fn imports_resolve_against_earlier_modules() {
    let dir = tempfile::tempdir().unwrap();
    let util = write_source(
        &dir,
        "util.prv",
        "transforms shout(s String) String\nfrom\n    uppercase(s)\n",
    );
    let app = write_source(
        &dir,
        "app.prv",
        "use Util transforms shout\n\nmain()!\nfrom\n    println(shout(\"hi\"))\n",
    );
    let compilation = compile(&[&util, &app], &Manifest::default()).unwrap();
    assert!(compilation.success(), "{:?}", codes(&compilation));
    assert_eq!(compilation.units.len(), 2);
}
