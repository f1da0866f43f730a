//! Declarative path → task routing.

use std::path::Path;

use glob::Pattern;

use crate::config::RouteConfig;
use crate::util::{match_options, relative_slash};
use crate::{Error, Result};

#[derive(Debug, Clone)]
struct Route {
    pattern: Pattern,
    tasks: Vec<String>,
}

/// Routing table checked once at startup.
///
/// Patterns are matched against the changed path relative to the source
/// root. Every route that matches contributes its tasks.
#[derive(Debug, Clone)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    /// Build the table. A bad pattern, a route without tasks, or a task name
    /// `is_task` does not know is a configuration error.
    pub fn new(routes: &[RouteConfig], is_task: impl Fn(&str) -> bool) -> Result<Self> {
        let mut table = Vec::with_capacity(routes.len());
        for route in routes {
            let pattern = Pattern::new(&route.pattern).map_err(|e| {
                Error::Configuration(format!("watch route '{}': {}", route.pattern, e))
            })?;
            if route.tasks.is_empty() {
                return Err(Error::Configuration(format!(
                    "watch route '{}' names no tasks",
                    route.pattern
                )));
            }
            if let Some(unknown) = route.tasks.iter().find(|t| !is_task(t.as_str())) {
                return Err(Error::Configuration(format!(
                    "watch route '{}' targets unknown task '{}'",
                    route.pattern, unknown
                )));
            }
            table.push(Route {
                pattern,
                tasks: route.tasks.clone(),
            });
        }
        Ok(Self { routes: table })
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Tasks for a source-relative path, in route order, without repeats.
    pub fn route(&self, rel: &str) -> Vec<String> {
        let options = match_options();
        let mut tasks: Vec<String> = Vec::new();
        for route in &self.routes {
            if route.pattern.matches_with(rel, options) {
                for task in &route.tasks {
                    if !tasks.contains(task) {
                        tasks.push(task.clone());
                    }
                }
            }
        }
        tasks
    }

    /// Tasks for an absolute path. Paths outside `source_root` route nowhere.
    pub fn route_path(&self, source_root: &Path, path: &Path) -> Vec<String> {
        relative_slash(path, source_root)
            .map(|rel| self.route(&rel))
            .unwrap_or_default()
    }
}
