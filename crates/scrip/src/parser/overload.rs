//! Command overload selection. Everything here depends only on the
//! candidate list and the argument types.

use crate::model::{
    commands::{Command, CommandArg, CommandIdx, Commands},
    types::{MatchLevel, TypeIdx, Types},
};

// how well one argument fits one parameter; out parameters need a variable
fn arg_level(types: &Types, param: &CommandArg, arg: TypeIdx) -> MatchLevel {
    if param.is_out() && !types.get(arg).is_variable() {
        return MatchLevel::None;
    }
    types.match_level(param.ty, arg)
}

/// Drops the candidates that can't take `arg` at position `index`.
pub fn narrow(types: &Types, commands: &Commands, candidates: &mut Vec<CommandIdx>, index: usize, arg: TypeIdx) {
    candidates.retain(|candidate| {
        commands
            .get(*candidate)
            .args
            .get(index)
            .is_some_and(|param| arg_level(types, param, arg).is_match())
    });
}

// the worst argument decides; None when the arity differs or any argument fails
fn overall_level(types: &Types, command: &Command, args: &[TypeIdx]) -> Option<MatchLevel> {
    if command.args.len() != args.len() {
        return None;
    }
    command
        .args
        .iter()
        .zip(args)
        .map(|(param, arg)| arg_level(types, param, *arg))
        .try_fold(MatchLevel::Strict, |worst, level| {
            level.is_match().then_some(worst.min(level))
        })
}

/// Picks the candidate whose worst argument match is best. Ties go to the
/// first registered.
pub fn resolve(types: &Types, commands: &Commands, candidates: &[CommandIdx], args: &[TypeIdx]) -> Option<CommandIdx> {
    let mut best: Option<(CommandIdx, MatchLevel)> = None;
    for candidate in candidates {
        let Some(level) = overall_level(types, commands.get(*candidate), args) else {
            continue;
        };
        match best {
            Some((_, best_level)) if best_level >= level => {}
            _ => best = Some((*candidate, level)),
        }
    }
    best.map(|(candidate, _)| candidate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::session;

    #[test]
    fn test_resolve_by_argument_types() {
        let session = session();
        let types = session.types();
        let commands = session.commands();
        let show = commands.overloads("SHOW");
        let int = types.find("INT").unwrap();
        let float = types.find("FLOAT").unwrap();
        let var_int = types.find("VAR_INT").unwrap();

        let id = |args: &[TypeIdx]| resolve(types, commands, show, args).map(|c| commands.get(c).id);
        assert_eq!(id(&[int]), Some(32));
        assert_eq!(id(&[float]), Some(33));
        assert_eq!(id(&[int, int]), Some(34));
        // a variable stands in for its stored type
        assert_eq!(id(&[var_int]), Some(32));
        assert_eq!(id(&[int, int, int]), None);
    }

    #[test]
    fn test_resolution_is_pure() {
        let session = session();
        let types = session.types();
        let commands = session.commands();
        let show = commands.overloads("SHOW");
        let int = types.find("INT").unwrap();
        let model = types.find("MODEL").unwrap();

        let first = resolve(types, commands, show, &[model, int]);
        for _ in 0..3 {
            assert_eq!(resolve(types, commands, show, &[model, int]), first);
        }
        let mut reversed: Vec<_> = show.to_vec();
        reversed.reverse();
        // the candidate order only matters for ties
        assert_eq!(resolve(types, commands, &reversed, &[model, int]), first);
    }

    #[test]
    fn test_narrow() {
        let session = session();
        let types = session.types();
        let commands = session.commands();
        let int = types.find("INT").unwrap();
        let float = types.find("FLOAT").unwrap();

        let mut candidates = commands.overloads("SHOW").to_vec();
        narrow(types, commands, &mut candidates, 0, int);
        assert_eq!(candidates.len(), 2);
        narrow(types, commands, &mut candidates, 1, float);
        assert!(candidates.is_empty());

        // out arguments only take variables
        let mut candidates = commands.overloads("GET_TIME").to_vec();
        narrow(types, commands, &mut candidates, 0, int);
        assert!(candidates.is_empty());
        let mut candidates = commands.overloads("GET_TIME").to_vec();
        narrow(types, commands, &mut candidates, 0, types.find("LVAR_INT").unwrap());
        assert_eq!(candidates.len(), 1);
    }
}
