use serde::Deserialize;

/// Root application configuration. Loaded from environment variables
/// with the prefix `LEADFLOW__`.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_node_id")]
    pub node_id: String,
    #[serde(default)]
    pub workflow: WorkflowConfig,
    #[serde(default)]
    pub abtest: AbTestConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowConfig {
    #[serde(default = "default_workflow_enabled")]
    pub enabled: bool,
    /// Upper bound on actions per definition accepted by the engine.
    #[serde(default = "default_max_actions")]
    pub max_actions: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AbTestConfig {
    /// Minimum participants per variant before a z-score is computed.
    #[serde(default = "default_min_sample_size")]
    pub min_sample_size: u64,
    /// Confidence level (percent) required to declare a winner.
    #[serde(default = "default_winner_confidence")]
    pub winner_confidence: f64,
}

fn default_node_id() -> String {
    "node-01".to_string()
}
fn default_workflow_enabled() -> bool {
    true
}
fn default_max_actions() -> usize {
    50
}
fn default_min_sample_size() -> u64 {
    30
}
fn default_winner_confidence() -> f64 {
    90.0
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            enabled: default_workflow_enabled(),
            max_actions: default_max_actions(),
        }
    }
}

impl Default for AbTestConfig {
    fn default() -> Self {
        Self {
            min_sample_size: default_min_sample_size(),
            winner_confidence: default_winner_confidence(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            workflow: WorkflowConfig::default(),
            abtest: AbTestConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder().add_source(
            config::Environment::with_prefix("LEADFLOW")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.abtest.min_sample_size, 30);
        assert_eq!(config.abtest.winner_confidence, 90.0);
        assert!(config.workflow.enabled);
        assert_eq!(config.workflow.max_actions, 50);
    }
}
