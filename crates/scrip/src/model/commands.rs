use std::collections::HashMap;

use bitflags::bitflags;
use scrip_util::{define_index, IndexVec};

use super::types::TypeIdx;
use super::ConfigError;

define_index!(pub CommandIdx);

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ArgFlags: u8 {
        // the command writes its result into this argument
        const OUT = 1;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommandArg {
    pub ty: TypeIdx,
    pub flags: ArgFlags,
}

impl CommandArg {
    pub fn new(ty: TypeIdx) -> Self {
        Self {
            ty,
            flags: ArgFlags::empty(),
        }
    }

    pub fn out(ty: TypeIdx) -> Self {
        Self {
            ty,
            flags: ArgFlags::OUT,
        }
    }

    pub fn is_out(&self) -> bool {
        self.flags.contains(ArgFlags::OUT)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub name: String,
    pub id: u16,
    pub args: Vec<CommandArg>,
}

impl Command {
    pub fn new(name: impl Into<String>, id: u16, args: Vec<CommandArg>) -> Self {
        Self {
            name: name.into(),
            id,
            args,
        }
    }
}

/// Command table. Commands sharing a name are overloads of each other and
/// are told apart by their argument types.
#[derive(Debug, Default)]
pub struct Commands {
    commands: IndexVec<CommandIdx, Command>,
    names: HashMap<String, Vec<CommandIdx>>,
}

impl Commands {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, command: Command) -> Result<CommandIdx, ConfigError> {
        let overloads = self.names.entry(command.name.clone()).or_default();
        if overloads
            .iter()
            .any(|idx| self.commands[*idx].args == command.args)
        {
            return Err(ConfigError::DuplicateCommand(command.name));
        }
        let idx = self.commands.push(command);
        overloads.push(idx);
        Ok(idx)
    }

    pub fn overloads(&self, name: &str) -> &[CommandIdx] {
        self.names.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains_key(name)
    }

    pub fn get(&self, idx: CommandIdx) -> &Command {
        &self.commands[idx]
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (CommandIdx, &Command)> + '_ {
        self.commands.iter_enumerated()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scrip_util::Idx;

    #[test]
    fn test_overloads_share_name() {
        let int = TypeIdx::from_usize(0);
        let float = TypeIdx::from_usize(1);
        let mut commands = Commands::new();
        let a = commands
            .add(Command::new("WAIT", 1, vec![CommandArg::new(int)]))
            .unwrap();
        let b = commands
            .add(Command::new("WAIT", 2, vec![CommandArg::new(float)]))
            .unwrap();
        assert_eq!(commands.overloads("WAIT"), &[a, b]);
        assert!(commands.overloads("NOPE").is_empty());
        assert!(matches!(
            commands.add(Command::new("WAIT", 3, vec![CommandArg::new(int)])),
            Err(ConfigError::DuplicateCommand(_))
        ));
    }
}
