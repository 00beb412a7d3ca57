//! Turns resolved operand chains and commands into xlations.
//!
//! Constant runs at the head of a chain are folded at compile time through
//! the operators' auto entries; everything from the first variable on
//! becomes runtime operations.

use scrip_util::Idx;
use tracing::trace;

use super::chain::{Chain, Operand, OperandKind, Term};
use crate::diagnostics::ErrorKind;
use crate::model::{
    commands::Command,
    constant::Constant,
    operators::OperatorIdx,
    translation::{AttributeValue, DataAttribute, DataSource, TranslationIdx, Xlation},
    types::{TypeIdx, TypeKind, ValueIdx, ValueKind, VarScope},
};
use crate::pipeline::BuildContext;
use crate::session::Session;
use crate::source::Range;

/// Emits into the xlations of the statement being parsed.
pub struct Emitter<'a> {
    ctx: &'a mut BuildContext,
    out: &'a mut Vec<Xlation>,
}

impl<'a> Emitter<'a> {
    pub fn new(ctx: &'a mut BuildContext, out: &'a mut Vec<Xlation>) -> Self {
        Self { ctx, out }
    }

    pub fn ctx(&mut self) -> &mut BuildContext {
        &mut *self.ctx
    }

    pub fn session(&self) -> &Session {
        &self.ctx.session
    }

    pub fn text(&self, range: Range) -> String {
        self.ctx.code.format(range)
    }

    fn type_name(&self, ty: TypeIdx) -> String {
        self.ctx.session.types().get(ty).name().to_string()
    }

    /// A number operand, preferring the values of `ty` and falling back to
    /// the smallest number value that holds `value`.
    pub fn constant(&self, value: Constant, ty: Option<TypeIdx>, range: Range) -> Result<Operand, ErrorKind> {
        let types = self.ctx.session.types();
        let (value_idx, ty) = match ty.and_then(|ty| types.find_number_value_in(ty, value).map(|v| (v, ty))) {
            Some(found) => found,
            None => {
                let value_idx = types
                    .find_number_value(value)
                    .ok_or_else(|| ErrorKind::NoValue(ty.map_or("number".to_string(), |ty| self.type_name(ty)), value.to_string()))?;
                (value_idx, types.value(value_idx).owner())
            }
        };
        Ok(Operand {
            kind: OperandKind::Constant { value, value_idx },
            ty,
            range,
        })
    }

    /// Applies the prefix and postfix operators of one term. Constants fold,
    /// variables get their operations emitted in place.
    fn reduce_term(&mut self, term: Term) -> Result<Operand, ErrorKind> {
        let Term {
            mut operand,
            prefixes,
            postfixes,
        } = term;

        if let Some(mut value) = operand.constant() {
            if let Some(op) = postfixes.first() {
                return Err(ErrorKind::ExpectedVariable(self.ctx.session.operators().get(*op).symbol.clone()));
            }
            for op in prefixes.iter().rev() {
                let operator = self.ctx.session.operators().get(*op);
                if operator.find_auto(self.ctx.session.types(), None, Some(operand.ty)).is_none() {
                    return Err(ErrorKind::NoMatchingOperation(operator.symbol.clone()));
                }
                value = operator.sign.fold(None, Some(value))?;
                operand = self.constant(value, Some(operand.ty), operand.range)?;
            }
            return Ok(operand);
        }

        for op in prefixes.iter().rev().chain(postfixes.iter()) {
            if !operand.is_variable() {
                return Err(ErrorKind::ExpectedVariable(self.text(operand.range)));
            }
            self.unary(*op, &operand)?;
        }
        Ok(operand)
    }

    // folds the constants at the head of the chain
    fn fold_leading(
        &self,
        operands: Vec<Operand>,
        ops: Vec<OperatorIdx>,
    ) -> Result<(Option<Operand>, Vec<(OperatorIdx, Operand)>), ErrorKind> {
        let mut operands = operands.into_iter();
        let Some(mut acc) = operands.next() else {
            return Ok((None, Vec::new()));
        };
        let mut rest: Vec<(OperatorIdx, Operand)> = ops.into_iter().zip(operands).collect();

        let mut folded = 0;
        for (op, rhs) in &rest {
            let (Some(lhs_value), Some(rhs_value)) = (acc.constant(), rhs.constant()) else {
                break;
            };
            let operator = self.ctx.session.operators().get(*op);
            if operator
                .find_auto(self.ctx.session.types(), Some(acc.ty), Some(rhs.ty))
                .is_none()
            {
                return Err(ErrorKind::NoMatchingOperation(operator.symbol.clone()));
            }
            let value = operator.sign.fold(Some(lhs_value), Some(rhs_value))?;
            trace!(%lhs_value, %rhs_value, %value, "fold");
            acc = self.constant(value, Some(acc.ty), acc.range.join(rhs.range))?;
            folded += 1;
        }
        rest.drain(..folded);
        Ok((Some(acc), rest))
    }

    fn reduce(&mut self, chain: Chain) -> Result<(Option<Operand>, Vec<(OperatorIdx, Operand)>), ErrorKind> {
        let (terms, ops) = chain.into_parts();
        let operands = terms
            .into_iter()
            .map(|term| self.reduce_term(term))
            .collect::<Result<Vec<_>, _>>()?;
        self.fold_leading(operands, ops)
    }

    /// Lowers a chain standing as a statement of its own: an assignment,
    /// compound operations on the first operand, or a lone `x++`.
    pub fn statement(&mut self, chain: Chain, range: Range) -> Result<(), ErrorKind> {
        let emitted = self.out.len();
        let (terms, ops) = chain.into_parts();
        let assignment = ops
            .first()
            .copied()
            .filter(|op| self.ctx.session.operators().get(*op).is_assignment());

        match assignment {
            Some(assign) => {
                let mut terms = terms.into_iter();
                let target = match terms.next() {
                    Some(term) => self.reduce_term(term)?,
                    None => return Err(ErrorKind::UnexpectedToken(self.text(range))),
                };
                if !target.is_variable() {
                    return Err(ErrorKind::ExpectedVariable(
                        self.ctx.session.operators().get(assign).symbol.clone(),
                    ));
                }
                let operands = terms
                    .map(|term| self.reduce_term(term))
                    .collect::<Result<Vec<_>, _>>()?;
                let (value, rest) = self.fold_leading(operands, ops[1..].to_vec())?;
                let value = value.ok_or_else(|| ErrorKind::UnexpectedToken(self.text(range)))?;
                self.reject_conditions(&rest)?;
                self.binary(assign, &target, &value)?;
                for (op, operand) in rest {
                    self.binary(op, &target, &operand)?;
                }
            }
            None => {
                let operands = terms
                    .into_iter()
                    .map(|term| self.reduce_term(term))
                    .collect::<Result<Vec<_>, _>>()?;
                let (first, rest) = self.fold_leading(operands, ops)?;
                if let Some(first) = first {
                    for (op, operand) in rest {
                        self.binary(op, &first, &operand)?;
                    }
                }
            }
        }

        if self.out.len() == emitted {
            return Err(ErrorKind::UnexpectedToken(self.text(range)));
        }
        Ok(())
    }

    /// Lowers a chain used as a value. Anything that doesn't fold to a
    /// single operand is computed into a temporary variable.
    pub fn expression(&mut self, chain: Chain, range: Range) -> Result<Operand, ErrorKind> {
        let (first, rest) = self.reduce(chain)?;
        let first = first.ok_or_else(|| ErrorKind::UnexpectedToken(self.text(range)))?;
        if rest.is_empty() {
            return Ok(first);
        }

        self.reject_conditions(&rest)?;
        let temp = self.temporary(&first, range)?;
        let assign = self.ctx.session.default_assign().ok_or_else(|| {
            ErrorKind::MissingDefaultAssign(self.ctx.session.config.default_assign.clone())
        })?;
        self.binary(assign, &temp, &first)?;
        for (op, operand) in rest {
            self.binary(op, &temp, &operand)?;
        }
        Ok(temp)
    }

    // a runtime comparison only sets the condition flag
    fn reject_conditions(&self, rest: &[(OperatorIdx, Operand)]) -> Result<(), ErrorKind> {
        let operators = self.ctx.session.operators();
        match rest
            .iter()
            .map(|(op, _)| operators.get(*op))
            .find(|operator| operator.is_conditional())
        {
            Some(operator) => Err(ErrorKind::ConditionNotAValue(operator.symbol.clone())),
            None => Ok(()),
        }
    }

    // a variable of a type storing what `like` holds, local inside a scope
    fn temporary(&mut self, like: &Operand, range: Range) -> Result<Operand, ErrorKind> {
        let types = self.ctx.session.types();
        let basic = types.stored_basic(like.ty);
        let wanted = if self.ctx.symbols.depth() > 0 {
            VarScope::Local
        } else {
            VarScope::Global
        };
        let storing: Vec<(TypeIdx, VarScope)> = types
            .iter()
            .filter_map(|(idx, ty)| match ty.kind() {
                TypeKind::Variable { scope, stores } if types.basic_of(stores) == basic => Some((idx, scope)),
                _ => None,
            })
            .collect();
        let (ty, scope) = storing
            .iter()
            .find(|(_, scope)| *scope == wanted)
            .or_else(|| storing.first())
            .copied()
            .ok_or_else(|| ErrorKind::NoValue(self.type_name(basic), "temporary".to_string()))?;

        let var = self.ctx.symbols.temporary(ty, scope, range);
        trace!(%var, ty = %self.type_name(ty), "temporary");
        Ok(Operand {
            kind: OperandKind::Variable { var, index: None },
            ty,
            range,
        })
    }

    // prefix or postfix operator applied to a variable on its own
    fn unary(&mut self, op: OperatorIdx, operand: &Operand) -> Result<(), ErrorKind> {
        let types = self.ctx.session.types();
        let operator = self.ctx.session.operators().get(op);
        let prefix = operator.find_operation(types, None, Some(operand.ty)).is_some();
        if prefix {
            self.operation(op, None, Some(operand), operand.range)
        } else {
            self.operation(op, Some(operand), None, operand.range)
        }
    }

    fn binary(&mut self, op: OperatorIdx, lhs: &Operand, rhs: &Operand) -> Result<(), ErrorKind> {
        self.operation(op, Some(lhs), Some(rhs), lhs.range.join(rhs.range))
    }

    fn operation(
        &mut self,
        op: OperatorIdx,
        lhs: Option<&Operand>,
        rhs: Option<&Operand>,
        range: Range,
    ) -> Result<(), ErrorKind> {
        let operator = self.ctx.session.operators().get(op);
        let symbol = operator.symbol.clone();
        let assignment = operator.is_assignment();
        let operation = operator
            .find_operation(self.ctx.session.types(), lhs.map(|o| o.ty), rhs.map(|o| o.ty))
            .map(|(operation, _)| operation.clone())
            .ok_or_else(|| ErrorKind::NoMatchingOperation(symbol.clone()))?;
        let id = operation
            .id
            .ok_or_else(|| ErrorKind::NoMatchingOperation(symbol.clone()))?;

        let mut args = Vec::with_capacity(2);
        for (operand, value) in [(lhs, operation.lhs_value), (rhs, operation.rhs_value)] {
            match (operand, value) {
                (Some(operand), _) => args.push(self.operand(operand)?),
                (None, Some(value)) => {
                    let constant = self.constant(value, None, range)?;
                    args.push(self.operand(&constant)?);
                }
                (None, None) => {}
            }
        }

        let mut xlation = self.command_xlation(&symbol, id, args.len(), range)?;
        xlation.args = args;
        if assignment {
            if let Some(OperandKind::Variable { var, .. }) = lhs.map(|o| &o.kind) {
                xlation.target = Some(*var);
            }
        }
        trace!(operator = %symbol, id, "operation");
        self.out.push(xlation);
        Ok(())
    }

    /// Emits a resolved command with its arguments.
    pub fn command(&mut self, command: &Command, args: Vec<Operand>, range: Range) -> Result<(), ErrorKind> {
        let mut xlation = self.command_xlation(&command.name, command.id, args.len(), range)?;
        for (param, arg) in command.args.iter().zip(&args) {
            let mut arg_xlation = self.operand(arg)?;
            if let (true, OperandKind::Variable { var, .. }) = (param.is_out(), &arg.kind) {
                arg_xlation.target = Some(*var);
            }
            xlation.args.push(arg_xlation);
        }
        trace!(name = %command.name, id = command.id, args = args.len(), "command");
        self.out.push(xlation);
        Ok(())
    }

    fn command_xlation(&self, name: &str, id: u16, count: usize, range: Range) -> Result<Xlation, ErrorKind> {
        let value = self
            .ctx
            .session
            .types()
            .first_value_of_kind(ValueKind::Command)
            .ok_or_else(|| ErrorKind::MissingTranslation(name.to_string()))?;
        let (translation, size) = self.translation(value, name)?;
        Ok(Xlation::new(translation, size, range)
            .with(DataSource::Command, DataAttribute::Id, AttributeValue::Int(id.into()))
            .with(DataSource::Command, DataAttribute::Count, AttributeValue::Int(count as i64))
            .with(DataSource::Command, DataAttribute::Name, AttributeValue::Text(name.to_string())))
    }

    fn translation(&self, value: ValueIdx, what: &str) -> Result<(TranslationIdx, u32), ErrorKind> {
        let value = self.ctx.session.types().value(value);
        let translation = value
            .translation()
            .ok_or_else(|| ErrorKind::MissingTranslation(what.to_string()))?;
        Ok((translation, value.size()))
    }

    /// The xlation an operand is written as when used as an argument.
    pub fn operand(&self, operand: &Operand) -> Result<Xlation, ErrorKind> {
        let types = self.ctx.session.types();
        let range = operand.range;
        match &operand.kind {
            OperandKind::Constant { value, value_idx } => {
                let (translation, size) = self.translation(*value_idx, &value.to_string())?;
                Ok(Xlation::new(translation, size, range).with(
                    DataSource::Number,
                    DataAttribute::Value,
                    (*value).into(),
                ))
            }
            OperandKind::Text { text, value_idx } => {
                let (translation, size) = self.translation(*value_idx, text)?;
                Ok(Xlation::new(translation, size, range)
                    .with(DataSource::Text, DataAttribute::Value, AttributeValue::Text(text.clone()))
                    .with(DataSource::Text, DataAttribute::Size, AttributeValue::Int(text.len() as i64)))
            }
            OperandKind::Variable { var, index: None } => {
                let variable = self.ctx.symbols.variable(*var);
                let value = types
                    .value_of_kind(variable.ty, ValueKind::Variable)
                    .ok_or_else(|| ErrorKind::NoValue(self.type_name(variable.ty), variable.name.clone()))?;
                let (translation, size) = self.translation(value, &variable.name)?;
                Ok(Xlation::new(translation, size, range)
                    .with(DataSource::Variable, DataAttribute::Index, AttributeValue::Int(variable.index.into()))
                    .with(DataSource::Variable, DataAttribute::Size, AttributeValue::Int(variable.slots().into()))
                    .with(DataSource::Variable, DataAttribute::Type, AttributeValue::Int(variable.ty.index() as i64))
                    .with(DataSource::Variable, DataAttribute::Name, AttributeValue::Text(variable.name.clone())))
            }
            OperandKind::Variable { var, index: Some(index) } => {
                let variable = self.ctx.symbols.variable(*var);
                let value = types
                    .value_of_kind(variable.ty, ValueKind::Array)
                    .ok_or_else(|| ErrorKind::NotAnArray(variable.name.clone()))?;
                let (translation, size) = self.translation(value, &variable.name)?;
                let mut xlation = Xlation::new(translation, size, range)
                    .with(DataSource::Array, DataAttribute::Index, AttributeValue::Int(variable.index.into()))
                    .with(DataSource::Array, DataAttribute::Size, AttributeValue::Int(variable.slots().into()))
                    .with(DataSource::Array, DataAttribute::Type, AttributeValue::Int(variable.ty.index() as i64))
                    .with(DataSource::Array, DataAttribute::Name, AttributeValue::Text(variable.name.clone()));
                if let Some(offset) = index.constant() {
                    xlation.set(DataSource::Array, DataAttribute::Offset, offset.into());
                }
                xlation.args.push(self.operand(index)?);
                Ok(xlation)
            }
            OperandKind::Label(label) => {
                let name = self.ctx.symbols.label(*label).name.clone();
                let value = types
                    .first_value_of_kind(ValueKind::Label)
                    .ok_or_else(|| ErrorKind::MissingTranslation(name.clone()))?;
                let (translation, size) = self.translation(value, &name)?;
                Ok(Xlation::new(translation, size, range)
                    .with(DataSource::Label, DataAttribute::Offset, AttributeValue::Label(*label))
                    .with(DataSource::Label, DataAttribute::Id, AttributeValue::Int(label.index() as i64))
                    .with(DataSource::Label, DataAttribute::Name, AttributeValue::Text(name)))
            }
        }
    }
}
