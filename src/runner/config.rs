//! Shell runner configuration

/// Configuration for the shell runner
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Program and leading arguments; the command text is appended last
    pub shell: Vec<String>,

    /// Pass the executor's own environment through to commands
    pub inherit_env: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        let shell = if cfg!(windows) {
            vec!["cmd".to_string(), "/C".to_string()]
        } else {
            vec!["sh".to_string(), "-c".to_string()]
        };
        Self {
            shell,
            inherit_env: true,
        }
    }
}

impl RunnerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_shell(mut self, shell: Vec<String>) -> Self {
        self.shell = shell;
        self
    }

    pub fn with_inherit_env(mut self, inherit_env: bool) -> Self {
        self.inherit_env = inherit_env;
        self
    }
}
