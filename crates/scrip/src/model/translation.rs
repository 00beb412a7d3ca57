//! Binary layouts for values and the bound instances the compiler emits.
//!
//! A [`Translation`] declares how one kind of value is laid out in the output
//! stream: an ordered list of [`Data`] blocks, each an ordered list of
//! [`Field`]s. An [`Xlation`] is one use of a translation with the concrete
//! attribute values it needs (a command id, a variable index, a literal).

use serde::Deserialize;
use scrip_util::{define_index, Width};

use super::constant::Constant;
use super::ConfigError;
use crate::model::script::{LabelIdx, VariableIdx};
use crate::source::Range;

define_index!(pub TranslationIdx);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Int,
    Float,
    Fixed,
    Char,
    String,
    Args,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    Literal,
    Env,
    Command,
    Number,
    Text,
    Variable,
    Array,
    Label,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataAttribute {
    #[default]
    Value,
    Id,
    Index,
    Offset,
    Size,
    Type,
    Count,
    Name,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub data_type: DataType,
    pub size: Option<u32>,
    pub source: DataSource,
    pub attribute: DataAttribute,
    // literal text for `Literal` fields, variable name for `Env` fields
    pub value: Option<String>,
}

impl Field {
    pub fn new(data_type: DataType, size: Option<u32>, source: DataSource, attribute: DataAttribute) -> Self {
        Self {
            data_type,
            size,
            source,
            attribute,
            value: None,
        }
    }

    pub fn literal(data_type: DataType, size: u32, value: impl Into<String>) -> Self {
        Self {
            data_type,
            size: Some(size),
            source: DataSource::Literal,
            attribute: DataAttribute::Value,
            value: Some(value.into()),
        }
    }

    // declared width; unsized numeric fields take the width of the bound value
    pub fn width(&self) -> Width {
        match (self.data_type, self.size) {
            (DataType::Args, _) => Width::Variable,
            (DataType::String, None) => Width::Variable,
            (DataType::Char, None) => Width::Fixed(8),
            (_, Some(size)) => Width::Fixed(size),
            (_, None) => Width::Variable,
        }
    }

    // fields whose width is only known from the data they carry
    pub fn is_variable_width(&self) -> bool {
        matches!(
            (self.data_type, self.size),
            (DataType::Args, _) | (DataType::String, None)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Data {
    pub fields: Vec<Field>,
}

impl Data {
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    pub fn width(&self) -> Width {
        self.fields
            .iter()
            .fold(Width::Fixed(0), |width, field| width + field.width())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Translation {
    name: String,
    data: Vec<Data>,
}

impl Translation {
    /// Builds a translation, rejecting blocks with more than one variable
    /// width field or with a variable width field that isn't last, and
    /// float fields sized other than 32 bits.
    pub fn new(name: impl Into<String>, data: Vec<Data>) -> Result<Self, ConfigError> {
        let name = name.into();
        for block in &data {
            let float_size = block
                .fields
                .iter()
                .filter(|field| field.data_type == DataType::Float)
                .find_map(|field| field.size.filter(|size| *size != 32));
            if let Some(size) = float_size {
                return Err(ConfigError::BadFloatWidth(name, size));
            }
            if block.fields.iter().any(|field| {
                matches!(field.source, DataSource::Literal | DataSource::Env) && field.value.is_none()
            }) {
                return Err(ConfigError::MissingLiteral(name));
            }
            let variable: Vec<usize> = block
                .fields
                .iter()
                .enumerate()
                .filter(|(_, field)| field.is_variable_width())
                .map(|(i, _)| i)
                .collect();
            match variable.as_slice() {
                [] => {}
                [index] if *index + 1 == block.fields.len() => {}
                [_] => return Err(ConfigError::VariableFieldNotLast(name)),
                _ => return Err(ConfigError::MultipleVariableFields(name)),
            }
        }
        Ok(Self { name, data })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data(&self) -> &[Data] {
        &self.data
    }

    // float fields that take their width from the bound value
    pub fn has_unsized_float(&self) -> bool {
        self.data
            .iter()
            .flat_map(|block| &block.fields)
            .any(|field| field.data_type == DataType::Float && field.size.is_none())
    }

    // total declared width; only fixed when every field is sized
    pub fn width(&self) -> Width {
        self.data
            .iter()
            .fold(Width::Fixed(0), |width, block| width + block.width())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Int(i64),
    Float(f32),
    Text(String),
    // resolved to an offset by the compiler once layout is known
    Label(LabelIdx),
}

impl From<Constant> for AttributeValue {
    fn from(value: Constant) -> Self {
        match value {
            Constant::Int(v) => AttributeValue::Int(v),
            Constant::Float(v) => AttributeValue::Float(v),
        }
    }
}

/// A translation bound to concrete attribute values for one compiled symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct Xlation {
    pub translation: TranslationIdx,
    // width taken by unsized numeric fields
    pub value_size: u32,
    pub attributes: Vec<(DataSource, DataAttribute, AttributeValue)>,
    // argument list expanded by an `Args` field
    pub args: Vec<Xlation>,
    pub range: Range,
    // variable an out-argument writes to, kept for listings
    pub target: Option<VariableIdx>,
}

impl Xlation {
    pub fn new(translation: TranslationIdx, value_size: u32, range: Range) -> Self {
        Self {
            translation,
            value_size,
            attributes: Vec::new(),
            args: Vec::new(),
            range,
            target: None,
        }
    }

    pub fn with(mut self, source: DataSource, attribute: DataAttribute, value: AttributeValue) -> Self {
        self.set(source, attribute, value);
        self
    }

    pub fn set(&mut self, source: DataSource, attribute: DataAttribute, value: AttributeValue) {
        if let Some(slot) = self
            .attributes
            .iter_mut()
            .find(|(s, a, _)| *s == source && *a == attribute)
        {
            slot.2 = value;
        } else {
            self.attributes.push((source, attribute, value));
        }
    }

    pub fn get(&self, source: DataSource, attribute: DataAttribute) -> Option<&AttributeValue> {
        self.attributes
            .iter()
            .find(|(s, a, _)| *s == source && *a == attribute)
            .map(|(_, _, value)| value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(size: u32, source: DataSource, attribute: DataAttribute) -> Field {
        Field::new(DataType::Int, Some(size), source, attribute)
    }

    #[test]
    fn test_fixed_width() {
        let translation = Translation::new(
            "INT16",
            vec![Data::new(vec![
                Field::literal(DataType::Int, 8, "5"),
                int(16, DataSource::Number, DataAttribute::Value),
            ])],
        )
        .unwrap();
        assert_eq!(translation.width(), Width::Fixed(24));
    }

    #[test]
    fn test_float_fields_are_32_bits() {
        let half = Translation::new(
            "HALF",
            vec![Data::new(vec![Field::new(
                DataType::Float,
                Some(16),
                DataSource::Number,
                DataAttribute::Value,
            )])],
        );
        assert_eq!(half, Err(ConfigError::BadFloatWidth("HALF".to_string(), 16)));

        let unsized_float = Translation::new(
            "FLOAT",
            vec![Data::new(vec![Field::new(
                DataType::Float,
                None,
                DataSource::Number,
                DataAttribute::Value,
            )])],
        )
        .unwrap();
        assert!(unsized_float.has_unsized_float());
    }

    #[test]
    fn test_variable_field_must_be_last() {
        let args_first = Translation::new(
            "BAD",
            vec![Data::new(vec![
                Field::new(DataType::Args, None, DataSource::Command, DataAttribute::Value),
                int(16, DataSource::Command, DataAttribute::Id),
            ])],
        );
        assert!(matches!(args_first, Err(ConfigError::VariableFieldNotLast(_))));

        let two_variable = Translation::new(
            "BAD2",
            vec![Data::new(vec![
                Field::new(DataType::String, None, DataSource::Text, DataAttribute::Value),
                Field::new(DataType::Args, None, DataSource::Command, DataAttribute::Value),
            ])],
        );
        assert!(matches!(two_variable, Err(ConfigError::MultipleVariableFields(_))));

        let command = Translation::new(
            "COMMAND",
            vec![Data::new(vec![
                int(16, DataSource::Command, DataAttribute::Id),
                Field::new(DataType::Args, None, DataSource::Command, DataAttribute::Value),
            ])],
        )
        .unwrap();
        assert_eq!(command.width(), Width::Variable);
    }

    #[test]
    fn test_xlation_attributes_overwrite() {
        let mut xlation = Xlation::new(TranslationIdx(0), 8, Range::default());
        xlation.set(DataSource::Number, DataAttribute::Value, AttributeValue::Int(1));
        xlation.set(DataSource::Number, DataAttribute::Value, AttributeValue::Int(2));
        assert_eq!(xlation.attributes.len(), 1);
        assert_eq!(
            xlation.get(DataSource::Number, DataAttribute::Value),
            Some(&AttributeValue::Int(2))
        );
    }
}
