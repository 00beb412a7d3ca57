use scrip_util::Idx;

use crate::diagnostics::ErrorKind;
use crate::model::constant::Constant;
use crate::pipeline::{BuildContext, Stage};
use crate::source::{symbols_to_string, FileIdx, MemorySourceProvider};
use crate::testing::{build_with, preprocess, run_until};
use crate::tokens::{DelimiterKind, DelimiterSide, TokenData};

fn preprocess_with(source: &str, provider: MemorySourceProvider) -> BuildContext {
    run_until(build_with(source, provider), Stage::Parse)
}

fn names(ctx: &BuildContext) -> Vec<String> {
    ctx.tokens
        .iter()
        .filter_map(|(_, token)| match &token.data {
            TokenData::Command(name) | TokenData::Identifier(name) => Some(name.clone()),
            _ => None,
        })
        .collect()
}

fn numbers(ctx: &BuildContext) -> Vec<Constant> {
    ctx.tokens
        .iter()
        .filter_map(|(_, token)| match token.data {
            TokenData::Number(value) => Some(value),
            _ => None,
        })
        .collect()
}

fn errors(ctx: &BuildContext) -> Vec<ErrorKind> {
    ctx.diagnostics.iter().map(|d| d.kind.clone()).collect()
}

fn line(ctx: &BuildContext, index: usize) -> String {
    symbols_to_string(ctx.code.line(index).unwrap().symbols())
}

fn statement_ends(ctx: &BuildContext) -> usize {
    ctx.tokens
        .iter()
        .filter(|(_, token)| token.is_statement_end())
        .count()
}

#[test]
fn test_macro_expands_in_place() {
    let ctx = preprocess("#define FOO 2+2\nX = FOO;");
    assert!(ctx.diagnostics.is_empty());
    assert_eq!(line(&ctx, 1), "X = 2+2;");
    assert_eq!(names(&ctx), vec!["X"]);
    assert_eq!(numbers(&ctx), vec![Constant::Int(2), Constant::Int(2)]);
    assert_eq!(statement_ends(&ctx), 1);
}

#[test]
fn test_self_referencing_macro_expands_once() {
    let ctx = preprocess("#define A A\nA");
    assert!(ctx.diagnostics.is_empty());
    assert_eq!(line(&ctx, 1), "A");
    assert_eq!(names(&ctx), vec!["A"]);
}

#[test]
fn test_conditional_branches() {
    let ctx = preprocess("#if 1 == 1\nA\n#else\nB\n#endif");
    assert!(ctx.diagnostics.is_empty());
    assert_eq!(names(&ctx), vec!["A"]);

    let ctx = preprocess("#if 0\nA\n#elif 2 > 1\nB\n#elif 1\nC\n#else\nD\n#endif");
    assert_eq!(names(&ctx), vec!["B"]);

    // the build defines come from the configuration
    let ctx = preprocess("#ifdef FIXTURE\nA\n#endif\n#ifndef FIXTURE\nB\n#endif");
    assert_eq!(names(&ctx), vec!["A"]);
}

#[test]
fn test_inactive_block_is_skipped_silently() {
    let ctx = preprocess("#if 0\n#bogus\n\"open\n$\n#endif\nWAIT 1");
    assert!(ctx.diagnostics.is_empty());
    assert_eq!(names(&ctx), vec!["WAIT"]);
}

#[test]
fn test_conditional_errors() {
    let ctx = preprocess("#endif\n#ifdef FIXTURE\nWAIT 0");
    assert_eq!(
        errors(&ctx),
        vec![
            ErrorKind::UnmatchedConditional("endif".to_string()),
            ErrorKind::UnclosedConditional
        ]
    );
    assert_eq!(names(&ctx), vec!["WAIT"]);

    let ctx = preprocess("#if 1 / 0\nA\n#endif");
    assert_eq!(errors(&ctx), vec![ErrorKind::DivideByZero]);
}

#[test]
fn test_undef_and_redefine() {
    let ctx = preprocess("#define N 1\n#undef N\nWAIT N\n#define N 2\n#define N 3\nWAIT N");
    assert!(ctx.diagnostics.is_empty());
    assert_eq!(names(&ctx), vec!["WAIT", "N", "WAIT"]);
    assert_eq!(numbers(&ctx), vec![Constant::Int(3)]);
}

#[test]
fn test_hex_literal() {
    let ctx = preprocess("WAIT 0x6AA");
    assert_eq!(numbers(&ctx), vec![Constant::Int(1706)]);
    assert!(matches!(
        ctx.tokens.iter().next().map(|(_, token)| &token.data),
        Some(TokenData::Command(name)) if name == "WAIT"
    ));
}

#[test]
fn test_malformed_number() {
    let ctx = preprocess("WAIT 12ab");
    assert_eq!(errors(&ctx), vec![ErrorKind::MalformedNumber("12ab".to_string())]);
    assert!(numbers(&ctx).is_empty());
}

#[test]
fn test_comments_become_spaces() {
    let ctx = preprocess("WAIT/* pause */0 // trailing");
    assert!(ctx.diagnostics.is_empty());
    assert_eq!(line(&ctx, 0), "WAIT 0  ");
    assert_eq!(numbers(&ctx), vec![Constant::Int(0)]);
}

#[test]
fn test_unterminated_comment_is_fatal() {
    let ctx = preprocess("WAIT 0 /* open\nWAIT 1");
    assert!(ctx.has_fatal());
    assert_eq!(errors(&ctx), vec![ErrorKind::UnterminatedComment]);
    assert_eq!(numbers(&ctx), vec![Constant::Int(0)]);
}

#[test]
fn test_unterminated_string() {
    let ctx = preprocess("PRINT \"abc\nWAIT 0");
    assert!(!ctx.has_fatal());
    assert_eq!(errors(&ctx), vec![ErrorKind::UnterminatedString]);
    assert_eq!(numbers(&ctx), vec![Constant::Int(0)]);

    let ctx = preprocess("WAIT 0\nPRINT \"abc");
    assert!(ctx.has_fatal());
}

#[test]
fn test_statement_delimiters() {
    let ctx = preprocess("WAIT 0; WAIT 1\n\nWAIT 2");
    assert_eq!(statement_ends(&ctx), 3);
}

#[test]
fn test_delimiter_pairing() {
    let ctx = preprocess("{\nx[1]\n}");
    assert!(ctx.diagnostics.is_empty());
    let delimiters: Vec<_> = ctx
        .tokens
        .iter()
        .filter_map(|(idx, token)| match token.data {
            TokenData::Delimiter {
                kind,
                side,
                partner: Some(partner),
            } if kind != DelimiterKind::Statement => Some((idx, side, partner)),
            _ => None,
        })
        .collect();
    assert_eq!(delimiters.len(), 4);
    for (idx, _, partner) in &delimiters {
        assert!(delimiters.iter().any(|(other, _, back)| other == partner && back == idx));
    }

    let ctx = preprocess("x]\n[");
    assert_eq!(
        errors(&ctx),
        vec![
            ErrorKind::UnmatchedDelimiter("]".to_string()),
            ErrorKind::UnclosedDelimiter("[".to_string())
        ]
    );
}

#[test]
fn test_cast_is_split_into_three_tokens() {
    let ctx = preprocess("SET_MODEL <MODEL>5");
    let data: Vec<_> = ctx.tokens.iter().map(|(_, token)| token.data.clone()).collect();
    assert!(matches!(
        data.as_slice(),
        [
            TokenData::Command(_),
            TokenData::Delimiter {
                kind: DelimiterKind::Cast,
                side: DelimiterSide::Open,
                partner: Some(_)
            },
            TokenData::Identifier(name),
            TokenData::Delimiter {
                kind: DelimiterKind::Cast,
                side: DelimiterSide::Close,
                partner: Some(_)
            },
            TokenData::Number(Constant::Int(5)),
            TokenData::Delimiter { .. },
        ] if name == "MODEL"
    ));
}

#[test]
fn test_include() {
    let provider = MemorySourceProvider::new().with_file("common.sch", "#define LIMIT 5\nWAIT LIMIT");
    let ctx = preprocess_with("#include \"common.sch\"\nWAIT 1", provider);
    assert!(ctx.diagnostics.is_empty());
    assert_eq!(ctx.files.len(), 2);
    assert_eq!(numbers(&ctx), vec![Constant::Int(5), Constant::Int(1)]);
    assert_eq!(ctx.code.line(2).unwrap().file(), FileIdx::from_usize(1));
    assert_eq!(ctx.code.line(3).unwrap().file(), FileIdx::from_usize(0));
}

#[test]
fn test_include_resolves_relative_to_includer() {
    let provider = MemorySourceProvider::new()
        .with_file("lib/a.sch", "#include \"b.sch\"")
        .with_file("lib/b.sch", "WAIT 7");
    let ctx = preprocess_with("#include \"lib/a.sch\"", provider);
    assert!(ctx.diagnostics.is_empty());
    assert_eq!(numbers(&ctx), vec![Constant::Int(7)]);
}

#[test]
fn test_recursive_include() {
    let provider = MemorySourceProvider::new().with_file("a.sch", "#include \"a.sch\"\nWAIT 0");
    let ctx = preprocess_with("#include \"a.sch\"", provider);
    assert_eq!(errors(&ctx), vec![ErrorKind::RecursiveInclude("a.sch".to_string())]);
    assert!(!ctx.has_fatal());
    assert_eq!(numbers(&ctx), vec![Constant::Int(0)]);
}

#[test]
fn test_missing_include_is_fatal() {
    let ctx = preprocess("#include \"missing.sch\"\nWAIT 0");
    assert!(ctx.has_fatal());
    assert_eq!(errors(&ctx), vec![ErrorKind::IncludeFailed("missing.sch".to_string())]);
}

#[test]
fn test_register_directives() {
    let ctx = preprocess(
        "#register_var 7 VAR_INT counter[3]\n#register_command 0x99 BEEP (INT, out VAR_INT)\nBEEP 1",
    );
    assert!(ctx.diagnostics.is_empty());
    let counter = ctx.symbols.variable(ctx.symbols.lookup("counter").unwrap());
    assert_eq!((counter.index, counter.size), (7, Some(3)));
    let beep = ctx.session.commands().overloads("BEEP");
    assert_eq!(beep.len(), 1);
    assert!(ctx.session.commands().get(beep[0]).args[1].is_out());
    assert!(matches!(
        ctx.tokens.iter().find(|(_, token)| matches!(token.data, TokenData::Command(_))),
        Some((_, token)) if token.data == TokenData::Command("BEEP".to_string())
    ));

    let ctx = preprocess("#register_var 1 NOPE x\n#register_command BEEP");
    assert_eq!(
        errors(&ctx),
        vec![ErrorKind::UnknownType("NOPE".to_string()), ErrorKind::BadRegisterCommand]
    );
}

#[test]
fn test_labels() {
    let ctx = preprocess("loop:\nGOTO loop\nloop:");
    assert_eq!(
        errors(&ctx),
        vec![ErrorKind::Symbol(
            crate::model::script::SymbolError::LabelAlreadyDeclared("loop".to_string())
        )]
    );
    assert_eq!(names(&ctx), vec!["GOTO", "loop"]);
    assert!(ctx.symbols.find_label("loop").is_some());
}

#[test]
fn test_unknown_directive_and_character() {
    let ctx = preprocess("#pragma once\nWAIT $0");
    assert_eq!(
        errors(&ctx),
        vec![
            ErrorKind::InvalidDirective("pragma".to_string()),
            ErrorKind::UnexpectedCharacter('$')
        ]
    );
    assert_eq!(numbers(&ctx), vec![Constant::Int(0)]);
}

#[test]
fn test_nul_does_not_end_the_input() {
    let ctx = preprocess("WAIT 0 \0\nWAIT 1");
    assert_eq!(errors(&ctx), vec![ErrorKind::UnexpectedCharacter('\0')]);
    assert_eq!(numbers(&ctx), vec![Constant::Int(0), Constant::Int(1)]);
}

#[test]
fn test_comment_opened_on_directive_line() {
    let ctx = preprocess("#define X 1 /* a\nb c */\nWAIT X");
    assert!(ctx.diagnostics.is_empty());
    assert_eq!(names(&ctx), vec!["WAIT"]);
    assert_eq!(numbers(&ctx), vec![Constant::Int(1)]);

    // quotes hide comment openers
    let ctx = preprocess("#define S \"/*\"\nWAIT 0");
    assert!(ctx.diagnostics.is_empty());
    assert_eq!(numbers(&ctx), vec![Constant::Int(0)]);

    let ctx = preprocess("#define X 1 /* open\nWAIT X");
    assert!(ctx.has_fatal());
    assert_eq!(errors(&ctx), vec![ErrorKind::UnterminatedComment]);
    assert!(names(&ctx).is_empty());
}
