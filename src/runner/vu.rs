use indexmap::IndexMap;
use regex::Regex;
use std::env;

/// State exclusively owned by one virtual user: the scenario vars plus any
/// values captured so far in the current iteration. Never shared between
/// units; reset at every iteration boundary.
#[derive(Debug, Clone)]
pub struct VuState {
    base: IndexMap<String, String>,
    vars: IndexMap<String, String>,
}

impl VuState {
    pub fn new(vars: &IndexMap<String, String>) -> Self {
        Self {
            base: vars.clone(),
            vars: vars.clone(),
        }
    }

    /// Store a captured value for use by later steps in this iteration.
    pub fn set_capture(&mut self, name: &str, value: String) {
        self.vars.insert(name.to_string(), value);
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    /// Discard captures and start the next iteration from the scenario vars.
    pub fn reset(&mut self) {
        self.vars = self.base.clone();
    }

    /// Substitute `{{name}}` from this unit's vars and `${ENV:default}` from
    /// the process environment. Unknown `{{name}}` placeholders are left
    /// as written (load-time validation makes that unreachable for anything
    /// but a capture whose step failed).
    pub fn substitute(&self, text: &str) -> String {
        let var_pattern = Regex::new(r"\{\{(\w+)\}\}").unwrap();
        let env_pattern = Regex::new(r"\$\{([^:}]+)(?::([^}]*))?\}").unwrap();

        let result = var_pattern.replace_all(text, |caps: &regex::Captures| {
            let name = &caps[1];
            self.vars
                .get(name)
                .cloned()
                .unwrap_or_else(|| format!("{{{{{}}}}}", name))
        });

        env_pattern
            .replace_all(&result, |caps: &regex::Captures| {
                let name = &caps[1];
                let default = caps.get(2).map(|m| m.as_str()).unwrap_or("");
                env::var(name).unwrap_or_else(|_| default.to_string())
            })
            .to_string()
    }
}
