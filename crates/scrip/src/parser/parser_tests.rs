use super::{Parser, ParserState};
use crate::diagnostics::ErrorKind;
use crate::model::{
    script::SymbolError,
    translation::{AttributeValue, DataAttribute, DataSource, Xlation},
};
use crate::pipeline::{BuildContext, StageStatus};
use crate::testing::{parse, preprocess};

fn errors(ctx: &BuildContext) -> Vec<ErrorKind> {
    ctx.diagnostics.iter().map(|d| d.kind.clone()).collect()
}

fn id(xlation: &Xlation) -> Option<&AttributeValue> {
    xlation.get(DataSource::Command, DataAttribute::Id)
}

fn ids(ctx: &BuildContext) -> Vec<i64> {
    ctx.xlations
        .iter()
        .filter_map(|xlation| match id(xlation) {
            Some(AttributeValue::Int(id)) => Some(*id),
            _ => None,
        })
        .collect()
}

fn number(xlation: &Xlation) -> Option<&AttributeValue> {
    xlation.get(DataSource::Number, DataAttribute::Value)
}

// parses by hand, recording the parser state after every step
fn parse_states(source: &str) -> (BuildContext, Vec<ParserState>) {
    let mut ctx = preprocess(source);
    let mut parser = Parser::new();
    let mut states = Vec::new();
    while parser.step(&mut ctx) == StageStatus::Running {
        states.push(parser.state());
    }
    (ctx, states)
}

#[test]
fn test_single_overload_binds_directly() {
    let (ctx, states) = parse_states("WAIT 0");
    assert!(ctx.diagnostics.is_empty());
    assert!(!states.contains(&ParserState::Overloading));

    assert_eq!(ctx.xlations.len(), 1);
    let wait = &ctx.xlations[0];
    assert_eq!(id(wait), Some(&AttributeValue::Int(1)));
    assert_eq!(wait.args.len(), 1);
    assert_eq!(number(&wait.args[0]), Some(&AttributeValue::Int(0)));
}

#[test]
fn test_overloads_narrow_by_argument_type() {
    let (ctx, states) = parse_states("SHOW 1.5");
    assert!(ctx.diagnostics.is_empty());
    assert!(states.contains(&ParserState::Overloading));
    assert_eq!(states.last(), Some(&ParserState::Parsing));
    assert_eq!(ids(&ctx), vec![33]);

    let ctx = parse("SHOW 1\nSHOW 1 2\nSHOW 1, 2");
    assert!(ctx.diagnostics.is_empty());
    assert_eq!(ids(&ctx), vec![32, 34, 34]);
}

#[test]
fn test_constants_fold_left_to_right() {
    let ctx = parse("VAR_INT x\nx = 2 + 3 * 4");
    assert!(ctx.diagnostics.is_empty());
    assert_eq!(ctx.xlations.len(), 1);
    let assign = &ctx.xlations[0];
    assert_eq!(id(assign), Some(&AttributeValue::Int(4)));
    assert_eq!(
        assign.args[0].get(DataSource::Variable, DataAttribute::Index),
        Some(&AttributeValue::Int(0))
    );
    assert_eq!(number(&assign.args[1]), Some(&AttributeValue::Int(20)));

    // mixed operands promote to float
    let ctx = parse("VAR_FLOAT f\nf = -3 + HALF");
    assert!(ctx.diagnostics.is_empty());
    assert_eq!(ids(&ctx), vec![6]);
    assert_eq!(number(&ctx.xlations[0].args[1]), Some(&AttributeValue::Float(-2.5)));
}

#[test]
fn test_assignment_then_compound_operations() {
    let ctx = parse("VAR_INT x y\nx = y + 1\nx = 1 + y");
    assert!(ctx.diagnostics.is_empty());
    assert_eq!(ids(&ctx), vec![132, 8, 4, 88]);
    assert!(ctx.xlations.iter().step_by(2).all(|x| x.target.is_some()));
}

#[test]
fn test_compound_argument_uses_temporary() {
    let ctx = parse("VAR_INT x\nWAIT x + 1");
    assert!(ctx.diagnostics.is_empty());
    assert_eq!(ids(&ctx), vec![132, 8, 1]);

    let temp = ctx.symbols.variables().find(|(_, var)| var.temporary).map(|(_, var)| var.index);
    assert_eq!(temp, Some(1));
    assert_eq!(
        ctx.xlations[2].args[0].get(DataSource::Variable, DataAttribute::Index),
        Some(&AttributeValue::Int(1))
    );
}

#[test]
fn test_postfix_increment() {
    let ctx = parse("VAR_INT x\nx++");
    assert!(ctx.diagnostics.is_empty());
    assert_eq!(ids(&ctx), vec![8]);
    let inc = &ctx.xlations[0];
    assert_eq!(inc.args.len(), 2);
    assert_eq!(number(&inc.args[1]), Some(&AttributeValue::Int(1)));
}

#[test]
fn test_conditional_operator() {
    let ctx = parse("VAR_INT x\nx > 5\n5 > x");
    assert!(ctx.diagnostics.is_empty());
    assert_eq!(ids(&ctx), vec![24, 25]);
}

#[test]
fn test_comparison_is_not_a_value() {
    let ctx = parse("VAR_INT x y\nWAIT x > 1\nx = y > 1\nx = 3 > 2");
    assert_eq!(
        errors(&ctx),
        vec![
            ErrorKind::ConditionNotAValue(">".to_string()),
            ErrorKind::ConditionNotAValue(">".to_string()),
        ]
    );
    // comparisons of constants fold to a plain value
    assert_eq!(ids(&ctx), vec![4]);
    assert_eq!(number(&ctx.xlations[0].args[1]), Some(&AttributeValue::Int(1)));
}

#[test]
fn test_declarations() {
    let ctx = parse("VAR_INT a b[4]\nVAR_INT c = 7");
    assert!(ctx.diagnostics.is_empty());
    let variable = |name| ctx.symbols.variable(ctx.symbols.lookup(name).unwrap());
    assert_eq!(variable("b").size, Some(4));
    assert_eq!(variable("c").index, 5);

    assert_eq!(ids(&ctx), vec![4]);
    assert_eq!(
        ctx.xlations[0].args[0].get(DataSource::Variable, DataAttribute::Index),
        Some(&AttributeValue::Int(5))
    );
    assert_eq!(number(&ctx.xlations[0].args[1]), Some(&AttributeValue::Int(7)));
}

#[test]
fn test_local_scopes() {
    let ctx = parse("{\nLVAR_INT i\ni = 1\n}\nLVAR_INT j");
    assert_eq!(ids(&ctx), vec![5]);
    assert_eq!(
        errors(&ctx),
        vec![ErrorKind::Symbol(SymbolError::LocalOutsideScope("j".to_string()))]
    );
}

#[test]
fn test_forward_label() {
    let ctx = parse("GOTO done\nWAIT 0\ndone:\nWAIT 1");
    assert!(ctx.diagnostics.is_empty());
    assert_eq!(ids(&ctx), vec![2, 1, 1]);

    let done = ctx.symbols.find_label("done").unwrap();
    assert_eq!(ctx.symbols.label(done).xlation, Some(2));
    assert_eq!(
        ctx.xlations[0].args[0].get(DataSource::Label, DataAttribute::Offset),
        Some(&AttributeValue::Label(done))
    );
}

#[test]
fn test_undefined_label_drops_statement() {
    let ctx = parse("WAIT 0\nGOTO nowhere\nback:\nWAIT 1");
    assert_eq!(errors(&ctx), vec![ErrorKind::UndefinedLabel("nowhere".to_string())]);
    assert_eq!(ids(&ctx), vec![1, 1]);

    // positions after the dropped statement move up
    let back = ctx.symbols.find_label("back").unwrap();
    assert_eq!(ctx.symbols.label(back).xlation, Some(1));
}

#[test]
fn test_array_subscript() {
    let ctx = parse("VAR_INT arr[3] i\nWAIT arr[2]\nWAIT arr[i]");
    assert!(ctx.diagnostics.is_empty());
    let element = &ctx.xlations[0].args[0];
    assert_eq!(
        element.get(DataSource::Array, DataAttribute::Offset),
        Some(&AttributeValue::Int(2))
    );
    assert_eq!(element.args.len(), 1);

    let element = &ctx.xlations[1].args[0];
    assert_eq!(element.get(DataSource::Array, DataAttribute::Offset), None);
    assert_eq!(
        element.args[0].get(DataSource::Variable, DataAttribute::Index),
        Some(&AttributeValue::Int(3))
    );

    let ctx = parse("VAR_INT n\nWAIT n[0]");
    assert_eq!(errors(&ctx), vec![ErrorKind::NotAnArray("n".to_string())]);
}

#[test]
fn test_cast_overrides_type() {
    let ctx = parse("SET_MODEL <MODEL>5");
    assert!(ctx.diagnostics.is_empty());
    assert_eq!(ids(&ctx), vec![16]);

    let ctx = parse("WAIT <FLOAT>1");
    assert_eq!(
        errors(&ctx),
        vec![ErrorKind::NoValue("FLOAT".to_string(), "1".to_string())]
    );
}

#[test]
fn test_out_argument() {
    let ctx = parse("VAR_INT t\nGET_TIME t\nGET_TIME 1");
    assert_eq!(ids(&ctx), vec![48]);
    assert!(ctx.xlations[0].args[0].target.is_some());
    assert_eq!(errors(&ctx), vec![ErrorKind::NoMatchingOverload("GET_TIME".to_string())]);
}

#[test]
fn test_argument_errors_drop_only_their_statement() {
    let ctx = parse("WAIT 1 2\nWAIT\nSHOW 1 2 3\nWAIT 3");
    assert_eq!(
        errors(&ctx),
        vec![
            ErrorKind::ArgumentCount("WAIT".to_string(), 1, 2),
            ErrorKind::ArgumentCount("WAIT".to_string(), 1, 0),
            ErrorKind::UnresolvedIdentifier("SHOW".to_string()),
        ]
    );
    assert_eq!(ids(&ctx), vec![1]);
    assert_eq!(number(&ctx.xlations[0].args[0]), Some(&AttributeValue::Int(3)));
}

#[test]
fn test_expression_errors() {
    let ctx = parse("VAR_INT x\nx = 1 +");
    assert_eq!(errors(&ctx), vec![ErrorKind::UnexpectedToken("+".to_string())]);

    let ctx = parse("5 = 1");
    assert_eq!(errors(&ctx), vec![ErrorKind::ExpectedVariable("=".to_string())]);

    let ctx = parse("VAR_FLOAT f\nf = 1");
    assert_eq!(errors(&ctx), vec![ErrorKind::NoMatchingOperation("=".to_string())]);

    let ctx = parse("WAIT missing");
    assert_eq!(
        errors(&ctx),
        vec![ErrorKind::UnresolvedIdentifier("missing".to_string())]
    );
    assert!(ctx.xlations.is_empty());
}
