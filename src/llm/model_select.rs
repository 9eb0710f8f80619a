use crate::config::{AppConfig, ModelRule};

/// Chooses the model for a run when the caller did not name one.
pub trait ModelSelector: Send + Sync {
    /// `explicit` is the caller's choice, `task` the user input of the run.
    fn select(&self, explicit: Option<&str>, task: &str) -> Option<String>;
}

/// explicit → configured default → first matching keyword rule → first
/// available model.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DefaultModelSelector {
    pub configured: Option<String>,
    pub rules: Vec<ModelRule>,
    pub available: Vec<String>,
}

impl DefaultModelSelector {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            configured: cfg.model.clone(),
            rules: cfg.agent.model_rules.clone(),
            available: cfg.agent.models.clone(),
        }
    }

    fn by_rule(&self, task: &str) -> Option<String> {
        let task = task.to_lowercase();
        self.rules
            .iter()
            .find(|r| !r.keyword.is_empty() && task.contains(&r.keyword.to_lowercase()))
            .map(|r| r.model.clone())
    }
}

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}

impl ModelSelector for DefaultModelSelector {
    fn select(&self, explicit: Option<&str>, task: &str) -> Option<String> {
        explicit
            .and_then(non_empty)
            .or_else(|| self.configured.as_deref().and_then(non_empty))
            .or_else(|| self.by_rule(task))
            .or_else(|| self.available.iter().find_map(|m| non_empty(m)))
    }
}
