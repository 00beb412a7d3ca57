use std::collections::HashMap;

use scrip_util::{define_index, IndexVec};
use serde::Deserialize;

use super::constant::Constant;
use super::translation::TranslationIdx;
use super::ConfigError;

define_index!(pub TypeIdx);
define_index!(pub ValueIdx);

/// How well an actual type satisfies an expected one. Ordered from worst to
/// best so that `max`/`min` pick the better/worse level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MatchLevel {
    None,
    Loose,
    Basic,
    Strict,
}

impl MatchLevel {
    // a pair is only as good as its worse side, and unusable if either side is
    pub fn combine(lhs: MatchLevel, rhs: MatchLevel) -> MatchLevel {
        if lhs == MatchLevel::None || rhs == MatchLevel::None {
            MatchLevel::None
        } else {
            lhs.min(rhs)
        }
    }

    pub fn is_match(self) -> bool {
        self != MatchLevel::None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VarScope {
    Global,
    Local,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    Basic,
    Extended { basic: TypeIdx },
    // `stores` is the basic type held by variables of this type
    Variable { scope: VarScope, stores: TypeIdx },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Type {
    name: String,
    kind: TypeKind,
    values: Vec<ValueIdx>,
}

impl Type {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> TypeKind {
        self.kind
    }

    pub fn values(&self) -> &[ValueIdx] {
        &self.values
    }

    pub fn is_variable(&self) -> bool {
        matches!(self.kind, TypeKind::Variable { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Number { float: bool },
    Text,
    Label,
    Variable,
    Array,
    Command,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Value {
    kind: ValueKind,
    owner: TypeIdx,
    // bits; 0 means unbounded (text)
    size: u32,
    translation: Option<TranslationIdx>,
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    pub fn owner(&self) -> TypeIdx {
        self.owner
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn translation(&self) -> Option<TranslationIdx> {
        self.translation
    }
}

#[derive(Debug, Default)]
pub struct Types {
    types: IndexVec<TypeIdx, Type>,
    values: IndexVec<ValueIdx, Value>,
    names: HashMap<String, TypeIdx>,
}

impl Types {
    pub fn new() -> Self {
        Self::default()
    }

    fn add(&mut self, name: &str, kind: TypeKind) -> Result<TypeIdx, ConfigError> {
        if self.names.contains_key(name) {
            return Err(ConfigError::DuplicateType(name.to_string()));
        }
        let idx = self.types.push(Type {
            name: name.to_string(),
            kind,
            values: Vec::new(),
        });
        self.names.insert(name.to_string(), idx);
        Ok(idx)
    }

    pub fn add_basic(&mut self, name: &str) -> Result<TypeIdx, ConfigError> {
        self.add(name, TypeKind::Basic)
    }

    pub fn add_extended(&mut self, name: &str, basic: TypeIdx) -> Result<TypeIdx, ConfigError> {
        if self.types[basic].kind != TypeKind::Basic {
            return Err(ConfigError::NotABasicType(self.types[basic].name.clone()));
        }
        self.add(name, TypeKind::Extended { basic })
    }

    pub fn add_variable(
        &mut self,
        name: &str,
        scope: VarScope,
        stores: TypeIdx,
    ) -> Result<TypeIdx, ConfigError> {
        if self.types[stores].is_variable() {
            return Err(ConfigError::NotABasicType(self.types[stores].name.clone()));
        }
        self.add(name, TypeKind::Variable { scope, stores })
    }

    pub fn add_value(
        &mut self,
        owner: TypeIdx,
        kind: ValueKind,
        size: u32,
        translation: Option<TranslationIdx>,
    ) -> ValueIdx {
        let idx = self.values.push(Value {
            kind,
            owner,
            size,
            translation,
        });
        self.types[owner].values.push(idx);
        idx
    }

    pub fn find(&self, name: &str) -> Option<TypeIdx> {
        self.names.get(name).copied()
    }

    pub fn get(&self, idx: TypeIdx) -> &Type {
        &self.types[idx]
    }

    pub fn value(&self, idx: ValueIdx) -> &Value {
        &self.values[idx]
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (TypeIdx, &Type)> + '_ {
        self.types.iter_enumerated()
    }

    // the basic type underneath an extended type; variables are their own base
    pub fn basic_of(&self, idx: TypeIdx) -> TypeIdx {
        match self.types[idx].kind {
            TypeKind::Extended { basic } => basic,
            TypeKind::Basic | TypeKind::Variable { .. } => idx,
        }
    }

    // basic type of the values a variable type holds, or the basic of anything else
    pub fn stored_basic(&self, idx: TypeIdx) -> TypeIdx {
        match self.types[idx].kind {
            TypeKind::Variable { stores, .. } => self.basic_of(stores),
            _ => self.basic_of(idx),
        }
    }

    /// How well an operand of type `actual` fits where `expected` is wanted.
    pub fn match_level(&self, expected: TypeIdx, actual: TypeIdx) -> MatchLevel {
        if expected == actual {
            return MatchLevel::Strict;
        }

        match (self.types[expected].kind, self.types[actual].kind) {
            (
                TypeKind::Variable {
                    scope: expected_scope,
                    ..
                },
                TypeKind::Variable {
                    scope: actual_scope,
                    ..
                },
            ) => {
                if self.stored_basic(expected) != self.stored_basic(actual) {
                    MatchLevel::None
                } else if expected_scope == actual_scope {
                    MatchLevel::Basic
                } else {
                    MatchLevel::Loose
                }
            }
            // a variable can be read where a plain value is expected, but a
            // value can't stand in for a variable
            (TypeKind::Variable { .. }, _) => MatchLevel::None,
            (_, TypeKind::Variable { .. }) => {
                if self.stored_basic(actual) == self.basic_of(expected) {
                    MatchLevel::Loose
                } else {
                    MatchLevel::None
                }
            }
            _ => {
                if self.basic_of(expected) == self.basic_of(actual) {
                    MatchLevel::Basic
                } else {
                    MatchLevel::None
                }
            }
        }
    }

    /// Smallest number value of the right kind wide enough for `constant`.
    pub fn find_number_value(&self, constant: Constant) -> Option<ValueIdx> {
        let float = constant.is_float();
        let bits = constant.min_bits();
        self.values
            .iter_enumerated()
            .filter(|(_, value)| value.kind == ValueKind::Number { float } && value.size >= bits)
            .min_by_key(|(_, value)| value.size)
            .map(|(idx, _)| idx)
    }

    /// Like [`Types::find_number_value`], restricted to values of one type.
    pub fn find_number_value_in(&self, owner: TypeIdx, constant: Constant) -> Option<ValueIdx> {
        let float = constant.is_float();
        let bits = constant.min_bits();
        self.types[self.basic_of(owner)]
            .values
            .iter()
            .copied()
            .filter(|idx| {
                let value = &self.values[*idx];
                value.kind == ValueKind::Number { float } && value.size >= bits
            })
            .min_by_key(|idx| self.values[*idx].size)
    }

    // text values of size 0 hold any length but lose to a bounded fit
    pub fn find_text_value(&self, length: usize) -> Option<ValueIdx> {
        let bits = (length * 8) as u32;
        self.values
            .iter_enumerated()
            .filter(|(_, value)| value.kind == ValueKind::Text)
            .filter(|(_, value)| value.size == 0 || value.size >= bits)
            .min_by_key(|(_, value)| if value.size == 0 { u32::MAX } else { value.size })
            .map(|(idx, _)| idx)
    }

    pub fn value_of_kind(&self, owner: TypeIdx, kind: ValueKind) -> Option<ValueIdx> {
        self.types[owner]
            .values
            .iter()
            .copied()
            .find(|idx| self.values[*idx].kind == kind)
    }

    // first value of a kind anywhere, e.g. the label or command slot
    pub fn first_value_of_kind(&self, kind: ValueKind) -> Option<ValueIdx> {
        self.values
            .iter_enumerated()
            .find(|(_, value)| value.kind == kind)
            .map(|(idx, _)| idx)
    }

    // first type whose values include `kind`
    pub fn first_type_with(&self, kind: ValueKind) -> Option<TypeIdx> {
        self.first_value_of_kind(kind)
            .map(|value| self.values[value].owner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixture {
        types: Types,
        int: TypeIdx,
        float: TypeIdx,
        model: TypeIdx,
        var_int: TypeIdx,
        lvar_int: TypeIdx,
        var_float: TypeIdx,
    }

    fn fixture() -> Fixture {
        let mut types = Types::new();
        let int = types.add_basic("INT").unwrap();
        let float = types.add_basic("FLOAT").unwrap();
        let model = types.add_extended("MODEL", int).unwrap();
        let var_int = types.add_variable("VAR_INT", VarScope::Global, int).unwrap();
        let lvar_int = types.add_variable("LVAR_INT", VarScope::Local, int).unwrap();
        let var_float = types
            .add_variable("VAR_FLOAT", VarScope::Global, float)
            .unwrap();
        types.add_value(int, ValueKind::Number { float: false }, 32, None);
        types.add_value(int, ValueKind::Number { float: false }, 8, None);
        types.add_value(int, ValueKind::Number { float: false }, 16, None);
        types.add_value(float, ValueKind::Number { float: true }, 32, None);
        Fixture {
            types,
            int,
            float,
            model,
            var_int,
            lvar_int,
            var_float,
        }
    }

    #[test]
    fn test_match_levels() {
        let f = fixture();
        let t = &f.types;
        assert_eq!(t.match_level(f.int, f.int), MatchLevel::Strict);
        assert_eq!(t.match_level(f.model, f.int), MatchLevel::Basic);
        assert_eq!(t.match_level(f.int, f.model), MatchLevel::Basic);
        assert_eq!(t.match_level(f.int, f.float), MatchLevel::None);
        assert_eq!(t.match_level(f.var_int, f.lvar_int), MatchLevel::Loose);
        assert_eq!(t.match_level(f.int, f.var_int), MatchLevel::Loose);
        assert_eq!(t.match_level(f.model, f.var_int), MatchLevel::Loose);
        assert_eq!(t.match_level(f.var_int, f.int), MatchLevel::None);
        assert_eq!(t.match_level(f.var_int, f.var_float), MatchLevel::None);
    }

    #[test]
    fn test_combine() {
        use MatchLevel::*;
        assert_eq!(MatchLevel::combine(Strict, Basic), Basic);
        assert_eq!(MatchLevel::combine(Loose, Strict), Loose);
        assert_eq!(MatchLevel::combine(Strict, None), None);
        assert_eq!(MatchLevel::combine(Strict, Strict), Strict);
    }

    #[test]
    fn test_smallest_number_value() {
        let f = fixture();
        let t = &f.types;
        let small = t.find_number_value(Constant::Int(100)).unwrap();
        assert_eq!(t.value(small).size(), 8);
        let medium = t.find_number_value(Constant::Int(1000)).unwrap();
        assert_eq!(t.value(medium).size(), 16);
        let large = t.find_number_value(Constant::Int(1 << 20)).unwrap();
        assert_eq!(t.value(large).size(), 32);
        assert!(t.find_number_value(Constant::Int(1 << 40)).is_none());
        let float = t.find_number_value(Constant::Float(1.0)).unwrap();
        assert_eq!(t.value(float).owner(), f.float);
        assert!(t.find_number_value_in(f.model, Constant::Int(3)).is_some());
    }

    #[test]
    fn test_duplicate_type_rejected() {
        let mut f = fixture();
        assert!(matches!(
            f.types.add_basic("INT"),
            Err(ConfigError::DuplicateType(_))
        ));
        assert!(matches!(
            f.types.add_extended("BAD", f.var_int),
            Err(ConfigError::NotABasicType(_))
        ));
    }
}
