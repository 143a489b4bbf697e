//! Git operation executor.
//!
//! Shells out to the `git` binary. The repository is a directory inside the
//! workspace named by the `repository` parameter (the workspace root when
//! omitted).

use std::path::{Path, PathBuf};
use std::process::Stdio;

use devflow_core::capability::{StepExecutor, ToolError};
use devflow_core::workflow::StepContext;
use serde_json::{Map, Value, json};

use super::{flag, optional_str, required_str, sandboxed};

/// Author identity used for commits when the step does not name one.
const DEFAULT_AUTHOR_NAME: &str = "devflow";
const DEFAULT_AUTHOR_EMAIL: &str = "devflow@localhost";

/// Default number of entries returned by `log`.
const DEFAULT_LOG_LIMIT: u64 = 10;

/// Field separator for `git log` output.
const LOG_SEPARATOR: char = '\u{1f}';

/// Executor for `git_operation` steps.
///
/// Operations: init, status, add, commit, log, branch, checkout, diff.
#[derive(Debug, Clone)]
pub struct GitOperations {
    root: PathBuf,
}

impl GitOperations {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn repo_dir(&self, parameters: &Map<String, Value>) -> Result<PathBuf, ToolError> {
        sandboxed(&self.root, optional_str(parameters, "repository").unwrap_or("."))
    }

    async fn init(&self, repo: &Path) -> Result<Value, ToolError> {
        tokio::fs::create_dir_all(repo).await?;
        let output = git(repo, &["init"]).await?;
        Ok(json!({ "initialized": true, "output": output }))
    }

    async fn status(&self, repo: &Path) -> Result<Value, ToolError> {
        let output = git(repo, &["status", "--porcelain"]).await?;
        let files: Vec<Value> = output
            .lines()
            .filter(|l| l.len() > 3)
            .map(|l| json!({ "status": l[..2].trim(), "path": &l[3..] }))
            .collect();
        Ok(json!({ "clean": files.is_empty(), "files": files }))
    }

    async fn add(&self, repo: &Path, parameters: &Map<String, Value>) -> Result<Value, ToolError> {
        let files: Vec<String> = match parameters.get("files") {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
            Some(Value::String(single)) => vec![single.clone()],
            _ => vec![".".to_string()],
        };
        let mut args = vec!["add", "--"];
        args.extend(files.iter().map(String::as_str));
        git(repo, &args).await?;
        Ok(json!({ "added": files }))
    }

    async fn commit(&self, repo: &Path, parameters: &Map<String, Value>) -> Result<Value, ToolError> {
        let message = required_str(parameters, "message")?;
        let name = format!(
            "user.name={}",
            optional_str(parameters, "authorName").unwrap_or(DEFAULT_AUTHOR_NAME)
        );
        let email = format!(
            "user.email={}",
            optional_str(parameters, "authorEmail").unwrap_or(DEFAULT_AUTHOR_EMAIL)
        );

        let mut args = vec!["-c", name.as_str(), "-c", email.as_str(), "commit", "-m", message];
        if flag(parameters, "all") {
            args.push("--all");
        }
        git(repo, &args).await?;

        let hash = git(repo, &["rev-parse", "HEAD"]).await?;
        Ok(json!({ "commit": hash.trim(), "message": message }))
    }

    async fn log(&self, repo: &Path, parameters: &Map<String, Value>) -> Result<Value, ToolError> {
        let limit = parameters
            .get("limit")
            .and_then(Value::as_u64)
            .unwrap_or(DEFAULT_LOG_LIMIT)
            .to_string();
        let format = format!("--pretty=format:%H{0}%an{0}%ae{0}%aI{0}%s", LOG_SEPARATOR);
        let output = git(repo, &["log", "-n", limit.as_str(), format.as_str()]).await?;

        let commits: Vec<Value> = output
            .lines()
            .filter_map(|line| {
                let mut fields = line.split(LOG_SEPARATOR);
                Some(json!({
                    "hash": fields.next()?,
                    "author": fields.next()?,
                    "email": fields.next()?,
                    "date": fields.next()?,
                    "message": fields.next()?,
                }))
            })
            .collect();
        Ok(json!({ "commits": commits }))
    }

    async fn branch(&self, repo: &Path, parameters: &Map<String, Value>) -> Result<Value, ToolError> {
        if let Some(name) = optional_str(parameters, "name") {
            git(repo, &["branch", name]).await?;
            return Ok(json!({ "created": name }));
        }
        let current = git(repo, &["branch", "--show-current"]).await?;
        let output = git(repo, &["branch", "--format=%(refname:short)"]).await?;
        let branches: Vec<&str> = output.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
        Ok(json!({ "current": current.trim(), "branches": branches }))
    }

    async fn checkout(&self, repo: &Path, parameters: &Map<String, Value>) -> Result<Value, ToolError> {
        let branch = required_str(parameters, "branch")?;
        let create = flag(parameters, "create");
        let mut args = vec!["checkout"];
        if create {
            args.push("-b");
        }
        args.push(branch);
        git(repo, &args).await?;
        Ok(json!({ "branch": branch, "created": create }))
    }

    async fn diff(&self, repo: &Path, parameters: &Map<String, Value>) -> Result<Value, ToolError> {
        let mut args = vec!["diff"];
        if flag(parameters, "staged") {
            args.push("--cached");
        }
        let output = git(repo, &args).await?;
        Ok(json!({ "diff": output, "empty": output.trim().is_empty() }))
    }
}

/// Run `git <args>` in `repo` and return stdout.
///
/// The child is killed if the calling future is dropped, so a step timeout
/// does not leave git processes behind.
async fn git(repo: &Path, args: &[&str]) -> Result<String, ToolError> {
    let output = tokio::process::Command::new("git")
        .args(args)
        .current_dir(repo)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| ToolError::failed(format!("failed to spawn git: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stdout = String::from_utf8_lossy(&output.stdout);
        let detail = if stderr.trim().is_empty() { stdout } else { stderr };
        return Err(ToolError::failed(format!(
            "git {} exited with {}: {}",
            subcommand(args),
            output.status,
            detail.trim()
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// First argument that is not a `-c key=value` pair or a flag.
fn subcommand<'a>(args: &[&'a str]) -> &'a str {
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if *arg == "-c" {
            iter.next();
        } else if !arg.starts_with('-') {
            return arg;
        }
    }
    ""
}

impl StepExecutor for GitOperations {
    async fn execute(
        &self,
        parameters: Map<String, Value>,
        context: &StepContext,
    ) -> Result<Value, ToolError> {
        let operation = required_str(&parameters, "operation")?;
        let repo = self.repo_dir(&parameters)?;

        tracing::debug!(
            step_id = %context.step_id,
            operation,
            repo = %repo.display(),
            "git operation"
        );

        let mut result = match operation {
            "init" => self.init(&repo).await?,
            "status" => self.status(&repo).await?,
            "add" => self.add(&repo, &parameters).await?,
            "commit" => self.commit(&repo, &parameters).await?,
            "log" => self.log(&repo, &parameters).await?,
            "branch" => self.branch(&repo, &parameters).await?,
            "checkout" => self.checkout(&repo, &parameters).await?,
            "diff" => self.diff(&repo, &parameters).await?,
            other => return Err(ToolError::Unsupported(format!("git operation '{other}'"))),
        };

        if let Value::Object(map) = &mut result {
            map.insert("operation".to_string(), json!(operation));
            if let Some(name) = optional_str(&parameters, "repository") {
                map.insert("repository".to_string(), json!(name));
            }
        }
        Ok(result)
    }
}
