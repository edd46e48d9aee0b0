//! User command table.
//!
//! The easy way to extend the protocol without touching the core: a
//! fixed-capacity mapping from command names to zero-argument callbacks.
//! Registered once at setup, never removed. Lookup is a linear scan and
//! the first match wins, so a duplicate name is effectively unreachable
//! past the first registration; that limitation is deliberate and pinned
//! by tests.

use crate::error::CoreError;
use crate::{MAX_COMMANDS, MAX_COMMAND_NAME};

pub type CommandFn = Box<dyn FnMut()>;

pub struct CommandTable {
    entries: Vec<(String, CommandFn)>,
}

impl CommandTable {
    pub fn new() -> Self {
        Self {
            entries: Vec::with_capacity(MAX_COMMANDS),
        }
    }

    /// Registers a callback under a name. Case-sensitive exact match.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        callback: CommandFn,
    ) -> Result<(), CoreError> {
        let name = name.into();
        if name.len() > MAX_COMMAND_NAME {
            return Err(CoreError::NameTooLong {
                name,
                max: MAX_COMMAND_NAME,
            });
        }
        if self.entries.len() >= MAX_COMMANDS {
            return Err(CoreError::TableFull {
                capacity: MAX_COMMANDS,
            });
        }
        self.entries.push((name, callback));
        Ok(())
    }

    /// Invokes the first callback registered under `name`. Returns whether
    /// a match was found.
    pub fn invoke(&mut self, name: &str) -> bool {
        for (entry_name, callback) in &mut self.entries {
            if entry_name == name {
                callback();
                return true;
            }
        }
        false
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for CommandTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn test_register_and_invoke() {
        let hits = Rc::new(Cell::new(0));
        let mut table = CommandTable::new();
        let counter = hits.clone();
        table
            .register("blink", Box::new(move || counter.set(counter.get() + 1)))
            .unwrap();

        assert!(table.invoke("blink"));
        assert!(table.invoke("blink"));
        assert_eq!(hits.get(), 2);
    }

    #[test]
    fn test_unknown_name_not_invoked() {
        let mut table = CommandTable::new();
        table.register("blink", Box::new(|| {})).unwrap();
        assert!(!table.invoke("Blink")); // case-sensitive
        assert!(!table.invoke("reboot"));
    }

    #[test]
    fn test_duplicate_names_first_match_wins() {
        let first = Rc::new(Cell::new(false));
        let second = Rc::new(Cell::new(false));
        let mut table = CommandTable::new();
        let hit = first.clone();
        table.register("go", Box::new(move || hit.set(true))).unwrap();
        let hit = second.clone();
        table.register("go", Box::new(move || hit.set(true))).unwrap();

        assert!(table.invoke("go"));
        assert!(first.get());
        assert!(!second.get());
    }

    #[test]
    fn test_capacity_is_hard() {
        let mut table = CommandTable::new();
        for i in 0..MAX_COMMANDS {
            table.register(format!("cmd{i}"), Box::new(|| {})).unwrap();
        }
        assert!(matches!(
            table.register("extra", Box::new(|| {})),
            Err(CoreError::TableFull { .. })
        ));
    }

    #[test]
    fn test_name_length_bound() {
        let mut table = CommandTable::new();
        let long = "x".repeat(MAX_COMMAND_NAME + 1);
        assert!(matches!(
            table.register(long, Box::new(|| {})),
            Err(CoreError::NameTooLong { .. })
        ));
    }
}
