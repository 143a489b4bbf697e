//! Built-in step executors.
//!
//! - `files` -- file operations sandboxed to the workspace directory
//! - `git` -- git operations through the `git` binary
//! - `http` -- `api_call` steps via `reqwest`
//! - `simulated` -- placeholder executors for AI, analysis, deployment,
//!   testing and database steps, plus the tools the built-in templates name
//!
//! [`register_builtin_tools`] wires all of them into a registry.

pub mod files;
pub mod git;
pub mod http;
pub mod simulated;

use std::path::{Component, Path, PathBuf};

use devflow_core::capability::{CapabilityRegistry, ToolCategory, ToolError, ToolSpec};
use devflow_types::config::EngineConfig;
use serde_json::{Map, Value};

pub use files::FileOperations;
pub use git::GitOperations;
pub use http::ApiCall;
pub use simulated::SimulatedTool;

/// Register every built-in executor.
///
/// File and git tools are rooted at `workspace`. Step types resolve to the
/// tool with their own name (`file_operation`, `git_operation`, ...); the
/// `real_*` IDs are aliases kept for template and document compatibility.
pub fn register_builtin_tools(
    registry: &mut CapabilityRegistry,
    config: &EngineConfig,
    workspace: &Path,
) -> anyhow::Result<()> {
    let files = FileOperations::new(workspace);
    let git = GitOperations::new(workspace);
    let http = ApiCall::new(config.http_timeout_secs)?;

    let file_spec = || {
        ToolSpec::new("File Operations", ToolCategory::FileSystem)
            .with_type("builtin")
            .with_description("Read, write and manage files inside the workspace")
    };
    registry.register("file_operation", file_spec(), files.clone());
    registry.register("real_file_operations", file_spec(), files);

    let git_spec = || {
        ToolSpec::new("Git Operations", ToolCategory::Git)
            .with_type("builtin")
            .with_description("Run git commands against repositories in the workspace")
    };
    registry.register("git_operation", git_spec(), git.clone());
    registry.register("real_git_operations", git_spec(), git);

    registry.register(
        "api_call",
        ToolSpec::new("HTTP API Call", ToolCategory::ApiCall)
            .with_type("builtin")
            .with_description("Send an HTTP request and return the response"),
        http,
    );

    for tool in SimulatedTool::ALL {
        registry.register(tool.tool_id(), tool.spec(), *tool);
    }

    tracing::debug!(
        tools = registry.len(),
        workspace = %workspace.display(),
        "registered built-in tools"
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// Parameter helpers
// ---------------------------------------------------------------------------

pub(crate) fn required_str<'a>(params: &'a Map<String, Value>, key: &str) -> Result<&'a str, ToolError> {
    params
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| ToolError::invalid(format!("missing string parameter '{key}'")))
}

pub(crate) fn optional_str<'a>(params: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    params.get(key).and_then(Value::as_str)
}

pub(crate) fn flag(params: &Map<String, Value>, key: &str) -> bool {
    params.get(key).and_then(Value::as_bool).unwrap_or(false)
}

/// Join a caller-supplied relative path onto `root`.
///
/// Absolute paths and `..` components are rejected, and symlinks along the
/// path must resolve inside the workspace.
pub(crate) fn sandboxed(root: &Path, relative: &str) -> Result<PathBuf, ToolError> {
    let escapes = || ToolError::invalid(format!("path '{relative}' escapes the workspace"));

    let path = Path::new(relative);
    let mut joined = root.to_path_buf();
    for component in path.components() {
        match component {
            Component::Normal(part) => joined.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(escapes());
            }
        }
    }

    if !resolves_within(root, &joined) {
        return Err(escapes());
    }
    Ok(joined)
}

/// Canonicalize the deepest existing prefix of `path` and check it is still
/// under the canonical `root`. A dangling symlink never resolves within.
fn resolves_within(root: &Path, path: &Path) -> bool {
    // A workspace that does not exist yet cannot contain symlinks.
    let Ok(real_root) = std::fs::canonicalize(root) else {
        return true;
    };

    let mut existing = path;
    while std::fs::symlink_metadata(existing).is_err() {
        match existing.parent() {
            Some(parent) => existing = parent,
            None => return true,
        }
    }

    match std::fs::canonicalize(existing) {
        Ok(real) => real.starts_with(&real_root),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use devflow_types::workflow::{StepDefinition, StepType};
    use serde_json::json;

    #[test]
    fn sandboxed_joins_relative_paths() {
        let root = Path::new("/ws");
        assert_eq!(sandboxed(root, "a/b.txt").unwrap(), PathBuf::from("/ws/a/b.txt"));
        assert_eq!(sandboxed(root, "./a").unwrap(), PathBuf::from("/ws/a"));
        assert_eq!(sandboxed(root, "").unwrap(), PathBuf::from("/ws"));
    }

    #[test]
    fn sandboxed_rejects_escapes() {
        let root = Path::new("/ws");
        assert!(matches!(
            sandboxed(root, "../etc/passwd"),
            Err(ToolError::InvalidParameters(_))
        ));
        assert!(sandboxed(root, "/etc/passwd").is_err());
        assert!(sandboxed(root, "a/../../b").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn sandboxed_rejects_symlinks_leaving_the_workspace() {
        use std::os::unix::fs::symlink;

        let tmp = tempfile::TempDir::new().unwrap();
        let root = tmp.path().join("ws");
        let outside = tmp.path().join("outside");
        std::fs::create_dir_all(root.join("real")).unwrap();
        std::fs::create_dir_all(&outside).unwrap();
        symlink(&outside, root.join("escape")).unwrap();
        symlink(root.join("real"), root.join("inner")).unwrap();
        symlink(tmp.path().join("nowhere"), root.join("dangling")).unwrap();

        assert!(sandboxed(&root, "escape").is_err());
        assert!(sandboxed(&root, "escape/new.txt").is_err());
        assert!(sandboxed(&root, "escape/deep/new.txt").is_err());
        assert!(sandboxed(&root, "dangling").is_err());

        assert_eq!(
            sandboxed(&root, "inner/file.txt").unwrap(),
            root.join("inner/file.txt")
        );
        assert_eq!(
            sandboxed(&root, "real/missing/file.txt").unwrap(),
            root.join("real/missing/file.txt")
        );
    }

    #[test]
    fn parameter_helpers() {
        let params = json!({ "name": "x", "on": true, "n": 1 });
        let Value::Object(params) = params else { unreachable!() };
        assert_eq!(required_str(&params, "name").unwrap(), "x");
        assert!(required_str(&params, "n").is_err());
        assert_eq!(optional_str(&params, "missing"), None);
        assert!(flag(&params, "on"));
        assert!(!flag(&params, "missing"));
    }

    #[test]
    fn builtin_tools_cover_every_step_type_and_template_tool() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut registry = CapabilityRegistry::new();
        register_builtin_tools(&mut registry, &EngineConfig::default(), tmp.path()).unwrap();

        for step_type in [
            StepType::AiGeneration,
            StepType::CodeAnalysis,
            StepType::FileOperation,
            StepType::GitOperation,
            StepType::Deployment,
            StepType::Testing,
            StepType::ApiCall,
            StepType::DatabaseOperation,
        ] {
            let step = StepDefinition::new("s", step_type);
            assert!(registry.contains(step.tool_id()), "no tool for {step_type}");
        }

        let catalog = devflow_core::workflow::TemplateCatalog::builtin().unwrap();
        for template in catalog.list_templates() {
            for step in &template.steps {
                assert!(
                    registry.contains(step.tool_id()),
                    "template {} step {} uses unregistered tool {}",
                    template.id,
                    step.id,
                    step.tool_id()
                );
            }
        }

        assert!(registry.contains("real_git_operations"));
        assert_eq!(registry.list_by_category(ToolCategory::Git).len(), 2);
    }
}
