#![allow(dead_code)]

use workgraph::config::{ConfigFile, ConfigSection, NodeConfig, RawConfigFile};
use workgraph::types::FailurePolicy;

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                config: ConfigSection::default(),
                node: Vec::new(),
            },
        }
    }

    pub fn with_node(mut self, node: NodeConfig) -> Self {
        self.config.node.push(node);
        self
    }

    pub fn with_max_workers(mut self, n: usize) -> Self {
        self.config.config.max_workers = Some(n);
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.config.config.failure_policy = policy;
        self
    }

    pub fn with_deadline(mut self, deadline: &str) -> Self {
        self.config.config.deadline = Some(deadline.to_string());
        self
    }

    /// The unvalidated config, for tests that exercise validation itself.
    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `NodeConfig`.
pub struct NodeConfigBuilder {
    node: NodeConfig,
}

impl NodeConfigBuilder {
    pub fn new(id: &str, cmd: &str) -> Self {
        Self {
            node: NodeConfig {
                id: id.to_string(),
                cmd: cmd.to_string(),
                after: vec![],
                exclusive: vec![],
                shared: vec![],
            },
        }
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.node.after.push(dep.to_string());
        self
    }

    pub fn exclusive(mut self, key: &str) -> Self {
        self.node.exclusive.push(key.to_string());
        self
    }

    pub fn shared(mut self, key: &str) -> Self {
        self.node.shared.push(key.to_string());
        self
    }

    pub fn build(self) -> NodeConfig {
        self.node
    }
}
