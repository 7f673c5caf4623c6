//! External command descriptions.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

/// Description of an external command: program, arguments, working directory
/// and environment overrides.
///
/// The orchestrator treats the site generator, the server process and the
/// container CLI purely as commands of this shape; it never inspects their
/// internals.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    pub env: HashMap<String, String>,
}

impl CommandSpec {
    /// Create a spec for a bare program with no arguments.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            env: HashMap::new(),
        }
    }

    /// Parse a shell-like command line on whitespace. Quoting is not
    /// supported; configuration that needs quoted arguments lists them
    /// explicitly instead.
    pub fn parse(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace();
        let program = parts.next()?.to_string();
        Some(Self {
            program,
            args: parts.map(str::to_string).collect(),
            working_dir: None,
            env: HashMap::new(),
        })
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_command_line() {
        let spec = CommandSpec::parse("bundle exec jekyll build").unwrap();
        assert_eq!(spec.program, "bundle");
        assert_eq!(spec.args, vec!["exec", "jekyll", "build"]);
    }

    #[test]
    fn test_parse_empty_line() {
        assert!(CommandSpec::parse("").is_none());
        assert!(CommandSpec::parse("   ").is_none());
    }

    #[test]
    fn test_builder_and_display() {
        let spec = CommandSpec::new("docker")
            .args(["compose", "up", "-d"])
            .env("ENVIRONMENT", "production");
        assert_eq!(spec.to_string(), "docker compose up -d");
        assert_eq!(spec.env.get("ENVIRONMENT").unwrap(), "production");
    }
}
