use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

/// How many cores a build asked for
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum CoreRequest {
    Exact(usize),
    Percent(f64),
}

impl fmt::Display for CoreRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoreRequest::Exact(n) => write!(f, "{n}"),
            CoreRequest::Percent(p) => write!(f, "{p:.2}%"),
        }
    }
}

/// One build requested by the user, before cores are assigned
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuildSpec {
    pub name: Option<String>,
    pub path: PathBuf,
    pub request: Option<CoreRequest>,
}

impl BuildSpec {
    pub fn new(name: Option<&str>, path: impl Into<PathBuf>, request: Option<CoreRequest>) -> Self {
        Self {
            name: name.map(|n| n.to_string()),
            path: path.into(),
            request,
        }
    }

    /// Name for messages: the group name if given, the path otherwise
    pub fn label(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => self.path.display().to_string(),
        }
    }
}

/// A build with its final share of the instance budget
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedBuild {
    pub name: Option<String>,
    pub path: PathBuf,
    pub cores: usize,
}
