use crate::diagnostics::ErrorKind;
use crate::source::Range;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConditionLevel {
    pub active: bool,
    // some branch of this level has been selected already
    pub taken: bool,
    pub parent_active: bool,
    pub else_seen: bool,
    pub range: Range,
}

/// Nesting of `#if` blocks. Code is only live while every level is active.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConditionStack {
    levels: Vec<ConditionLevel>,
}

impl ConditionStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.levels.last().map_or(true, |level| level.active)
    }

    pub fn depth(&self) -> usize {
        self.levels.len()
    }

    /// Opens a level. Under an inactive parent the level is inactive no
    /// matter what `condition` is, and counts as taken so that no `#elif` or
    /// `#else` of it can become active.
    pub fn push(&mut self, condition: bool, range: Range) {
        let parent_active = self.is_active();
        let active = parent_active && condition;
        self.levels.push(ConditionLevel {
            active,
            taken: active || !parent_active,
            parent_active,
            else_seen: false,
            range,
        });
    }

    // `condition` only runs when the branch could still be selected
    pub fn elif(&mut self, condition: impl FnOnce() -> bool) -> Result<(), ErrorKind> {
        let level = self
            .levels
            .last_mut()
            .ok_or_else(|| ErrorKind::UnmatchedConditional("elif".to_string()))?;
        if level.else_seen {
            return Err(ErrorKind::ElifAfterElse);
        }
        if level.taken {
            level.active = false;
        } else if condition() {
            level.active = true;
            level.taken = true;
        }
        Ok(())
    }

    pub fn else_branch(&mut self) -> Result<(), ErrorKind> {
        let level = self
            .levels
            .last_mut()
            .ok_or_else(|| ErrorKind::UnmatchedConditional("else".to_string()))?;
        if level.else_seen {
            return Err(ErrorKind::DuplicateElse);
        }
        level.else_seen = true;
        level.active = level.parent_active && !level.taken;
        level.taken = true;
        Ok(())
    }

    pub fn endif(&mut self) -> Result<ConditionLevel, ErrorKind> {
        self.levels
            .pop()
            .ok_or_else(|| ErrorKind::UnmatchedConditional("endif".to_string()))
    }

    // levels still open, outermost first
    pub fn drain_unclosed(&mut self) -> Vec<ConditionLevel> {
        std::mem::take(&mut self.levels)
    }
}
