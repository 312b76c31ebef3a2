use std::collections::BTreeMap;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Structured parameters extracted from a free-text investigation prompt by
/// the parameter agent (see `services::agents::parameter_agent`).
#[derive(Debug, Clone, Default, Serialize, Deserialize, utoipa::ToSchema)]
pub struct SearchParameters {
    /// ISO `YYYY-MM-DD` date, or `None` if the prompt carried no date.
    pub time_frame: Option<String>,
    /// Free-text domain tag, e.g. "mfs", "bkash", "npsb".
    pub domain: Option<String>,
    /// Keys/terms the prompt's claim hinges on: merchant names, transaction
    /// ids, long numeric identifiers, etc.
    pub query_keys: Vec<String>,
}

/// Describes one configured project the system can search logs for, with
/// one or more named environments (e.g. "prod", "staging"). Loaded from
/// config at startup; not persisted (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ProjectDescriptor {
    pub code: String,
    pub name: String,
    pub log_source_kind: LogSourceKind,
    pub environments: BTreeMap<String, EnvDescriptor>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum LogSourceKind {
    File,
    Remote,
}

/// One environment's concrete log source. Carries a filesystem root for
/// file-based projects, or a namespace label for remote (Loki-style) ones;
/// which variant is meaningful is governed by the owning
/// `ProjectDescriptor::log_source_kind`.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EnvDescriptor {
    File { root_dir: String },
    Remote { service_namespace: String },
}

/// Alias kept for the pipeline stages that only care about where to read
/// logs from, independent of which project/env resolved to it.
pub type ProjectSource = EnvDescriptor;

impl ProjectDescriptor {
    pub fn env(&self, env_code: &str) -> Option<&EnvDescriptor> {
        self.environments.get(env_code)
    }
}

impl EnvDescriptor {
    pub fn is_file_based(&self) -> bool {
        matches!(self, EnvDescriptor::File { .. })
    }

    pub fn is_loki_based(&self) -> bool {
        matches!(self, EnvDescriptor::Remote { .. })
    }
}

/// In-memory lookup of the configured projects, loaded once from the
/// `[[projects]]` TOML tables at startup. Mirrors the original's
/// `app/services/project_service.py`; not a database table (config loading
/// is an ambient concern, not covered by spec.md's persistence non-goal).
#[derive(Debug, Clone, Default)]
pub struct ProjectRegistry {
    by_code: HashMap<String, ProjectDescriptor>,
}

impl ProjectRegistry {
    pub fn new(projects: Vec<ProjectDescriptor>) -> Self {
        Self { by_code: projects.into_iter().map(|p| (p.code.clone(), p)).collect() }
    }

    pub fn get(&self, code: &str) -> Option<&ProjectDescriptor> {
        self.by_code.get(code)
    }

    /// Resolves a project and environment together, the lookup every
    /// request against `ChatRequest{project, env}` performs.
    pub fn resolve_env(&self, code: &str, env_code: &str) -> Option<&EnvDescriptor> {
        self.by_code.get(code).and_then(|p| p.env(env_code))
    }

    pub fn codes(&self) -> Vec<&str> {
        self.by_code.keys().map(|s| s.as_str()).collect()
    }
}
