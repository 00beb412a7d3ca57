//! The compilation session: every configuration table a build reads, plus
//! the registration API that fills them.

use std::collections::{HashMap, HashSet};

use scrip_util::IndexVec;
use tracing::debug;

use crate::config::{ConfigDocument, EnumValueConfig, OperationConfig, ValueConfig};
use crate::model::{
    commands::{ArgFlags, Command, CommandArg, CommandIdx, Commands},
    constant::Constant,
    operators::{Operation, Operator, OperatorFlags, OperatorIdx, Operators},
    translation::{Data, Field, Translation, TranslationIdx},
    types::{TypeIdx, Types, ValueIdx, ValueKind, VarScope},
    ConfigError,
};
use crate::BuildConfig;

#[derive(Debug, Default)]
pub struct Session {
    pub config: BuildConfig,
    types: Types,
    translations: IndexVec<TranslationIdx, Translation>,
    translation_names: HashMap<String, TranslationIdx>,
    commands: Commands,
    operators: Operators,
    constants: HashMap<String, Constant>,
    enums: HashSet<String>,
}

impl Session {
    pub fn new(config: BuildConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    /// Builds a session by registering every entry of `document` in
    /// dependency order: translations, types, commands, operators, constants.
    pub fn from_document(document: &ConfigDocument) -> Result<Self, ConfigError> {
        let mut session = Session::new(document.build.clone());

        for translation in &document.translations {
            let data = translation
                .data
                .iter()
                .map(|block| {
                    Data::new(
                        block
                            .iter()
                            .map(|field| Field {
                                data_type: field.data_type,
                                size: field.size,
                                source: field.source,
                                attribute: field.attribute,
                                value: field.value.clone(),
                            })
                            .collect(),
                    )
                })
                .collect();
            session.add_translation(Translation::new(&translation.name, data)?)?;
        }

        for basic in &document.types.basic {
            let ty = session.add_basic_type(&basic.name)?;
            session.add_values(ty, &basic.values)?;
        }
        for extended in &document.types.extended {
            let ty = session.add_extended_type(&extended.name, &extended.basic)?;
            session.add_values(ty, &extended.values)?;
        }
        for variable in &document.types.variable {
            let ty = session.add_variable_type(&variable.name, variable.scope, &variable.stores)?;
            session.add_values(ty, &variable.values)?;
        }

        for command in &document.commands {
            let args = command
                .args
                .iter()
                .map(|arg| {
                    let ty = session.type_named(&arg.ty)?;
                    Ok(CommandArg {
                        ty,
                        flags: if arg.out {
                            ArgFlags::OUT
                        } else {
                            ArgFlags::empty()
                        },
                    })
                })
                .collect::<Result<Vec<_>, ConfigError>>()?;
            session.add_command(Command::new(&command.name, command.id, args))?;
        }

        for config in &document.operators {
            let mut flags = OperatorFlags::empty();
            flags.set(OperatorFlags::ASSIGNMENT, config.assignment);
            flags.set(OperatorFlags::CONDITIONAL, config.conditional);
            let mut operator = Operator::new(&config.symbol, config.sign, flags);
            for operation in &config.operations {
                operator.operations.push(session.operation(operation)?);
            }
            for operation in &config.autos {
                let mut auto = session.operation(operation)?;
                auto.id = None;
                operator.autos.push(auto);
            }
            session.add_operator(operator)?;
        }

        for (name, value) in &document.constants {
            session.add_constant(name, (*value).into())?;
        }

        for config in &document.enums {
            let mut next = 0;
            let mut values = Vec::with_capacity(config.values.len());
            for value in &config.values {
                let (name, value) = match value {
                    EnumValueConfig::Name(name) => (name.clone(), next),
                    EnumValueConfig::Valued { name, value } => (name.clone(), *value),
                };
                next = value + 1;
                values.push((name, value));
            }
            session.add_enum(&config.name, values)?;
        }

        debug!(
            types = session.types.len(),
            commands = session.commands.len(),
            operators = session.operators.len(),
            "loaded configuration"
        );
        Ok(session)
    }

    fn type_named(&self, name: &str) -> Result<TypeIdx, ConfigError> {
        self.types
            .find(name)
            .ok_or_else(|| ConfigError::UnknownType(name.to_string()))
    }

    fn add_values(&mut self, ty: TypeIdx, values: &[ValueConfig]) -> Result<(), ConfigError> {
        for value in values {
            self.add_value(ty, value.kind.into(), value.size, value.translation.as_deref())?;
        }
        Ok(())
    }

    fn operation(&self, config: &OperationConfig) -> Result<Operation, ConfigError> {
        let side = |name: &Option<String>| name.as_deref().map(|name| self.type_named(name)).transpose();
        Ok(Operation {
            lhs: side(&config.lhs)?,
            rhs: side(&config.rhs)?,
            lhs_value: config.lhs_value.map(Into::into),
            rhs_value: config.rhs_value.map(Into::into),
            id: config.id,
        })
    }

    pub fn add_translation(&mut self, translation: Translation) -> Result<TranslationIdx, ConfigError> {
        if self.translation_names.contains_key(translation.name()) {
            return Err(ConfigError::DuplicateTranslation(translation.name().to_string()));
        }
        let name = translation.name().to_string();
        let idx = self.translations.push(translation);
        self.translation_names.insert(name, idx);
        Ok(idx)
    }

    pub fn add_basic_type(&mut self, name: &str) -> Result<TypeIdx, ConfigError> {
        self.types.add_basic(name)
    }

    pub fn add_extended_type(&mut self, name: &str, basic: &str) -> Result<TypeIdx, ConfigError> {
        let basic = self.type_named(basic)?;
        self.types.add_extended(name, basic)
    }

    pub fn add_variable_type(
        &mut self,
        name: &str,
        scope: VarScope,
        stores: &str,
    ) -> Result<TypeIdx, ConfigError> {
        let stores = self.type_named(stores)?;
        self.types.add_variable(name, scope, stores)
    }

    pub fn add_value(
        &mut self,
        owner: TypeIdx,
        kind: ValueKind,
        size: u32,
        translation: Option<&str>,
    ) -> Result<ValueIdx, ConfigError> {
        if matches!(kind, ValueKind::Number { .. }) && !(1..=64).contains(&size) {
            return Err(ConfigError::BadValueSize(
                self.types.get(owner).name().to_string(),
                size,
            ));
        }
        let translation = translation
            .map(|name| {
                self.translation_names
                    .get(name)
                    .copied()
                    .ok_or_else(|| ConfigError::UnknownTranslation(name.to_string()))
            })
            .transpose()?;
        if let Some(idx) = translation {
            let translation = &self.translations[idx];
            if size != 32 && translation.has_unsized_float() {
                return Err(ConfigError::BadFloatWidth(translation.name().to_string(), size));
            }
        }
        Ok(self.types.add_value(owner, kind, size, translation))
    }

    pub fn add_command(&mut self, command: Command) -> Result<CommandIdx, ConfigError> {
        self.commands.add(command)
    }

    pub fn add_operator(&mut self, operator: Operator) -> Result<OperatorIdx, ConfigError> {
        self.operators.add(operator)
    }

    pub fn add_constant(&mut self, name: &str, value: Constant) -> Result<(), ConfigError> {
        if self.constants.contains_key(name) {
            return Err(ConfigError::DuplicateConstant(name.to_string()));
        }
        self.constants.insert(name.to_string(), value);
        Ok(())
    }

    // enum members are also plain constants
    pub fn add_enum(&mut self, name: &str, values: Vec<(String, i64)>) -> Result<(), ConfigError> {
        if self.enums.contains(name) {
            return Err(ConfigError::DuplicateEnum(name.to_string()));
        }
        for (member, value) in values {
            self.add_constant(&member, Constant::Int(value))?;
        }
        self.enums.insert(name.to_string());
        Ok(())
    }

    pub fn types(&self) -> &Types {
        &self.types
    }

    pub fn translation(&self, idx: TranslationIdx) -> &Translation {
        &self.translations[idx]
    }

    pub fn commands(&self) -> &Commands {
        &self.commands
    }

    pub fn operators(&self) -> &Operators {
        &self.operators
    }

    pub fn constant(&self, name: &str) -> Option<Constant> {
        self.constants.get(name).copied()
    }

    pub fn default_assign(&self) -> Option<OperatorIdx> {
        self.operators.find(&self.config.default_assign)
    }

    pub fn env(&self, name: &str) -> Option<&str> {
        self.config.env.get(name).map(String::as_str)
    }
}
