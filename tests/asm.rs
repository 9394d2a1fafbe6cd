// Archasm: toolchain for small custom CPU architectures
// Assembler, instruction encoders and a reversible emulator
//
// Designed & written in 2021 by
//     the Archasm contributors

use archasm::instr::{Input, Operation};
use archasm::issues::{LexError, LinkError, LinkWarning, ResolveError, SourceUnit};
use archasm::linker::MemoryProvider;
use archasm::{arch, Assembler, MainError};
use rstest::rstest;

macro_rules! assembler {
    ($arch:expr) => {
        assembler!($arch, MemoryProvider::new())
    };
    ($arch:expr, $provider:expr) => {
        Assembler::with_provider(arch::by_id($arch).unwrap(), $provider)
    };
}

macro_rules! assemble_ok {
    ($arch:expr, $code:expr) => { {
        match assembler!($arch).assemble_str("test", $code) {
            Ok(program) => program,
            Err(err) => panic!("expected success:\n{}", err),
        }
    } };
}

macro_rules! assemble_err {
    ($arch:expr, $code:expr) => { {
        match assembler!($arch).assemble_str("test", $code) {
            Ok(program) => panic!("expected failure, got program:\n{:?}", program),
            Err(err) => err,
        }
    } };
}

fn resolve_error(err: MainError) -> (&'static str, ResolveError) {
    match err {
        MainError::Resolve(_, pass, issues) => (pass, issues.errors().next().cloned().unwrap()),
        other => panic!("expected resolution failure, got:\n{}", other),
    }
}

#[test]
fn forward_label() {
    let program = assemble_ok!("rx16", "jump @target\nnop\nnop\n@target: nop");
    assert_eq!(program.len(), 4);
    assert_eq!(program.get(0).unwrap().a, Input::Immediate(3));
}

#[test]
fn forward_label_upcast() {
    let arch = arch::by_id("rx8").unwrap();
    let program = assemble_ok!("rx8", "jump @target\nnop\nnop\n@target: nop");
    assert_eq!(
        program.dump(&arch),
        "0000: LOAD_2 PC = 3, 0\n0001: NOP\n0002: NOP\n0003: NOP\n"
    );
}

#[test]
fn nested_scopes_vanish() {
    let arch = arch::by_id("rx8").unwrap();
    let program = assemble_ok!("rx8", "@outer { @inner { R1 = 5 } }");
    assert_eq!(program.dump(&arch), "0000: LOAD R1 = 5\n");
}

#[test]
fn circular_variables() {
    let (pass, err) = resolve_error(assemble_err!("rx8", "$a = $b\n$b = $a\nR1 = $a"));
    assert_eq!(pass, "resolve variable values");
    assert!(matches!(
        err,
        ResolveError::CircularReference(ref name) if name == "a" || name == "b"
    ));
}

#[test]
fn variables_shadow_outer_scope() {
    let program = assemble_ok!("rx8", "$v = 1\n{\n$v = 2\nR1 = $v\n}\nR2 = $v");
    assert_eq!(program.get(0).unwrap().a, Input::Immediate(2));
    assert_eq!(program.get(1).unwrap().a, Input::Immediate(1));
}

#[test]
fn start_jump_and_constants() {
    let arch = arch::by_id("rx8").unwrap();
    let program = assemble_ok!("rx8", "@msg: !data \"hi\"\n@start: R1 = @msg");
    assert_eq!(
        program.dump(&arch),
        "0000: LOAD_2 PC = 4, 0\n0001: DATA 104\n0002: DATA 105\n0003: DATA 0\n\
         0004: LOAD R1 = 1\n"
    );
}

#[test]
fn spaced_minus_is_subtraction() {
    let program = assemble_ok!("rx8", "R1 = R2 -5\npush -5");
    let sub = program.get(0).unwrap();
    assert_eq!(sub.operation, Operation::Subtract);
    assert_eq!(sub.b, Input::Immediate(5));
    assert_eq!(program.get(1).unwrap().a, Input::Immediate(0xFB));
}

#[test]
fn wide_register_operands() {
    let arch = arch::by_id("rx8").unwrap();
    let program = assemble_ok!("rx8", "jump X\ncall X");
    assert_eq!(program.dump(&arch), "0000: LOAD PC = X\n0001: CALL PC = X\n");
    assert!(program.encode(&arch).is_ok());
}

#[test]
fn placed_scope() {
    let program = assemble_ok!("rx16", "R1 = 1\n!at 4 {\nR2 = 2\n}");
    assert_eq!(program.len(), 5);
    assert_eq!(program.get(2).unwrap().operation, Operation::Nop);
    assert_eq!(program.get(4).unwrap().a, Input::Immediate(2));

    let (pass, err) = resolve_error(assemble_err!("rx16", "R1 = 1\nR2 = 2\n!at 1 {\n}"));
    assert_eq!(pass, "apply anchor indices");
    assert_eq!(err, ResolveError::PlacementOverlap { position: 1, index: 2 });
}

#[rstest]
#[case("rx8", "R1 = 255", true)]
#[case("rx8", "R1 = 256", false)]
#[case("rx8", "R1 = -128", true)]
#[case("rx8", "R1 = -129", false)]
#[case("rx8", "X = 0xFFFF", true)]
#[case("rx8", "X = 0x10000", false)]
#[case("rx8", "X = -0x8001", false)]
#[case("rx8", "jump 0x12345", false)]
#[case("rx16", "R1 = 65535", true)]
#[case("rx16", "R1 = 65536", false)]
fn immediate_ranges(#[case] arch: &str, #[case] code: &str, #[case] fits: bool) {
    let result = assembler!(arch).assemble_str("test", code);
    match (fits, result) {
        (true, Ok(_)) => {}
        (false, Err(err)) => {
            assert!(matches!(resolve_error(err).1, ResolveError::IntegerOutOfRange { .. }))
        }
        (_, Ok(program)) => panic!("{} must not fit, got {:?}", code, program),
        (_, Err(err)) => panic!("{} must fit:\n{}", code, err),
    }
}

#[rstest]
#[case("R9 = 1", "replace names", ResolveError::UnknownRegister(s("R9")))]
#[case("jump @nowhere", "replace names", ResolveError::UnknownLabel(s("nowhere")))]
#[case("exit @nowhere", "replace names", ResolveError::UnknownScope(s("nowhere")))]
#[case("R1 = $nothing", "replace names", ResolveError::UnknownVariable(s("nothing")))]
#[case("}", "build scopes", ResolveError::ScopeUnderflow)]
#[case("@a {\nnop", "build scopes", ResolveError::ScopeNotClosed(s("@a")))]
#[case("@l: nop\n@l: nop", "define labels and variables", ResolveError::RepeatedLabel(s("l")))]
#[case("repeat", "replace names", ResolveError::InvalidJumpTarget("repeat"))]
#[case("nop\nif R1 == 0", "resolve if-blocks", ResolveError::IfWithoutBody)]
fn resolution_failures(
    #[case] code: &str,
    #[case] expected_pass: &str,
    #[case] expected: ResolveError,
) {
    let (pass, err) = resolve_error(assemble_err!("rx8", code));
    assert_eq!(pass, expected_pass);
    assert_eq!(err, expected);
}

fn s(text: &str) -> String { text.to_owned() }

#[test]
fn syntax_errors_are_collected() {
    match assemble_err!("rx8", "R1 = = 2\nnop\nfrobnicate R1") {
        MainError::Syntax(unit, count, issues) => {
            assert_eq!(unit, "test");
            assert_eq!(count, 2);
            assert_eq!(issues.count_errors(), 2);
        }
        other => panic!("expected syntax error, got:\n{}", other),
    }
}

#[test]
fn lexer_errors() {
    match assemble_err!("rx8", "!data \"unterminated") {
        MainError::Lexer(_, issues) => {
            assert_eq!(issues.errors().next(), Some(&LexError::UnterminatedLiteral))
        }
        other => panic!("expected lexer error, got:\n{}", other),
    }
}

#[test]
fn includes() {
    let provider = MemoryProvider::new()
        .with("lib", "@sub {\nR2 = 7\nreturn\n}\n@unused {\nR3 = 1\n}")
        .with("consts", "$seven = 7");
    let assembler = assembler!("rx8", provider);

    let (program, warnings) = assembler
        .assemble(&SourceUnit::new(
            "main",
            "!include @sub from \"lib\"\n!include \"consts\"\n!include \"consts\"\n\
             @start: call @sub\nR1 = $seven",
        ))
        .unwrap();
    assert_eq!(program.len(), 5);
    assert_eq!(warnings.count_warnings(), 1);
    assert_eq!(warnings.warnings().next(), Some(&LinkWarning::RepeatedInclude(s("consts"))));

    let program = assembler
        .assemble_str("main", "!include @sub from \"lib\" as @helper\ncall @helper")
        .unwrap();
    let call = program.get(2).unwrap();
    assert_eq!(call.operation, Operation::Call2);
    assert_eq!((call.a, call.b), (Input::Immediate(0), Input::Immediate(0)));
}

#[test]
fn include_failures() {
    let provider = MemoryProvider::new()
        .with("a", "!include \"b\"")
        .with("b", "!include \"a\"")
        .with("broken", "R1 = = 1");
    let assembler = assembler!("rx8", provider);

    match assembler.assemble_str("main", "!include \"missing\"").unwrap_err() {
        MainError::Linking(unit, errors, _, issues) => {
            assert_eq!(unit, "main");
            assert_eq!(errors, 1);
            assert_eq!(issues.errors().next(), Some(&LinkError::UnitNotFound(s("missing"))));
        }
        other => panic!("unexpected:\n{}", other),
    }

    let err = assembler.assemble_str("main", "!include \"a\"").unwrap_err();
    assert!(err.to_string().contains("circular include"));

    match assembler.assemble_str("main", "!include \"broken\"").unwrap_err() {
        MainError::Included { unit, included, source } => {
            assert_eq!(unit, "main");
            assert_eq!(included, "broken");
            assert!(matches!(*source, MainError::Syntax(..)));
        }
        other => panic!("unexpected:\n{}", other),
    }
}

#[test]
fn diagnostics_show_source() {
    let err = assemble_err!("rx8", "nop\n  R1 = $missing");
    let message = err.to_string();
    assert!(message.contains("unknown variable `$missing`"));
    assert!(message.contains("test:2:"));
    assert!(message.contains("could not compile `test` during pass `replace names`"));
}
