//! Named command aliases: a class plus how to call it.

use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use crate::error::JcliError;
use crate::request::Strategy;

const BUILTIN_COMMANDS: &str = include_str!("../commands.yaml");

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandConfig {
    pub name: String,
    pub class_name: String,
    #[serde(default)]
    pub strategy: Strategy,
    #[serde(default)]
    pub factory: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub examples: Vec<String>,
}

#[derive(Deserialize)]
struct CommandFile {
    #[serde(default)]
    commands: Vec<CommandConfig>,
}

/// Built-in aliases, overridden by name by those of a user file.
#[derive(Clone, Debug, Default)]
pub struct CommandRegistry {
    commands: Vec<CommandConfig>,
}

impl CommandRegistry {
    pub fn builtin() -> Result<CommandRegistry, JcliError> {
        let mut registry = CommandRegistry::default();
        registry.merge(parse(BUILTIN_COMMANDS, "built-in commands")?);
        Ok(registry)
    }

    /// The built-in aliases plus those in `user_file`, if given.
    pub fn load(user_file: Option<&Path>) -> Result<CommandRegistry, JcliError> {
        let mut registry = CommandRegistry::builtin()?;

        if let Some(path) = user_file {
            let contents = fs::read_to_string(path).map_err(|e| {
                JcliError::Configuration(format!(
                    "cannot read command file {}: {e}",
                    path.display()
                ))
            })?;
            let commands = parse(&contents, &path.display().to_string())?;
            debug!(path = %path.display(), count = commands.len(), "loaded user commands");
            registry.merge(commands);
        }

        Ok(registry)
    }

    fn merge(&mut self, commands: Vec<CommandConfig>) {
        for command in commands {
            match self
                .commands
                .iter_mut()
                .find(|c| c.name.eq_ignore_ascii_case(&command.name))
            {
                Some(existing) => *existing = command,
                None => self.commands.push(command),
            }
        }
    }

    /// Case-insensitive lookup by alias.
    pub fn get(&self, name: &str) -> Option<&CommandConfig> {
        self.commands
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn require(&self, name: &str) -> Result<&CommandConfig, JcliError> {
        self.get(name).ok_or_else(|| {
            JcliError::Usage(format!(
                "unknown command '{name}'; --list-commands shows the available ones"
            ))
        })
    }

    pub fn commands(&self) -> &[CommandConfig] {
        &self.commands
    }

    /// One block per alias: name, class and description, then examples.
    pub fn describe(&self) -> String {
        let mut out = String::new();
        for command in &self.commands {
            out.push_str(&format!("{:<10} {}", command.name, command.class_name));
            if let Some(description) = &command.description {
                out.push_str(&format!("  {description}"));
            }
            out.push('\n');
            for example in &command.examples {
                out.push_str(&format!("    {example}\n"));
            }
        }
        out
    }
}

fn parse(contents: &str, origin: &str) -> Result<Vec<CommandConfig>, JcliError> {
    let file: CommandFile = serde_yaml::from_str(contents)
        .map_err(|e| JcliError::Configuration(format!("invalid {origin}: {e}")))?;

    for command in &file.commands {
        if command.name.trim().is_empty() || command.class_name.trim().is_empty() {
            return Err(JcliError::Configuration(format!(
                "invalid {origin}: every command needs a name and a className"
            )));
        }
    }

    Ok(file.commands)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn builtin_commands_parse() {
        let registry = CommandRegistry::builtin().unwrap();

        let math = registry.get("math").unwrap();
        assert_eq!(math.class_name, "java.lang.Math");
        assert_eq!(math.strategy, Strategy::Static);

        let uuid = registry.get("UUID").unwrap();
        assert_eq!(uuid.strategy, Strategy::Auto);
        assert_eq!(uuid.factory.as_deref(), Some("fromString"));
        assert!(!uuid.examples.is_empty());
    }

    #[test]
    fn user_file_overrides_and_extends() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "commands:\n  - name: Math\n    className: com.example.FastMath\n  - name: hex\n    className: java.util.HexFormat\n    strategy: INSTANCE\n"
        )
        .unwrap();

        let registry = CommandRegistry::load(Some(file.path())).unwrap();

        let math = registry.get("math").unwrap();
        assert_eq!(math.class_name, "com.example.FastMath");
        assert_eq!(math.strategy, Strategy::Auto);
        assert_eq!(registry.get("hex").unwrap().strategy, Strategy::Instance);
        assert_eq!(
            registry.commands().len(),
            CommandRegistry::builtin().unwrap().commands().len() + 1
        );
    }

    #[test]
    fn unknown_alias_is_a_usage_error() {
        let registry = CommandRegistry::builtin().unwrap();
        let err = registry.require("nope").unwrap_err();
        insta::assert_snapshot!(err, @"unknown command 'nope'; --list-commands shows the available ones");
    }

    #[test]
    fn commands_need_a_class() {
        let err = parse("commands:\n  - name: broken\n    className: ''\n", "test.yaml")
            .unwrap_err();
        insta::assert_snapshot!(err, @"invalid test.yaml: every command needs a name and a className");
    }

    #[test]
    fn unknown_strategy_is_rejected() {
        let err = parse(
            "commands:\n  - name: x\n    className: a.B\n    strategy: SOMETIMES\n",
            "test.yaml",
        )
        .unwrap_err();
        assert!(matches!(err, JcliError::Configuration(_)));
    }
}
