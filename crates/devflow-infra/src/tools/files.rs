//! File operation executor.
//!
//! Every path parameter is relative to the workspace root; see
//! [`sandboxed`](super::sandboxed).

use std::path::{Path, PathBuf};

use devflow_core::capability::{StepExecutor, ToolError};
use devflow_core::workflow::StepContext;
use serde_json::{Map, Value, json};
use tokio::io::AsyncWriteExt;

use super::{flag, required_str, sandboxed};

/// Largest file the executor reads or writes (10 MiB).
pub const MAX_FILE_SIZE_BYTES: u64 = 10 * 1024 * 1024;

/// Executor for `file_operation` steps.
///
/// Parameters: `operation` (read, write, append, delete, list, exists,
/// mkdir, copy, move, info), `path`, plus `content` for write/append and
/// `destination` for copy/move.
#[derive(Debug, Clone)]
pub struct FileOperations {
    root: PathBuf,
}

impl FileOperations {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn read(&self, rel: &str) -> Result<Value, ToolError> {
        let path = sandboxed(&self.root, rel)?;
        let size = tokio::fs::metadata(&path).await?.len();
        check_size(rel, size)?;
        let content = tokio::fs::read_to_string(&path).await?;
        Ok(json!({ "path": rel, "content": content, "size": size }))
    }

    async fn write(&self, rel: &str, content: &str, append: bool) -> Result<Value, ToolError> {
        let path = sandboxed(&self.root, rel)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let existed = tokio::fs::try_exists(&path).await?;
        if append {
            let current = if existed { tokio::fs::metadata(&path).await?.len() } else { 0 };
            check_size(rel, current + content.len() as u64)?;
            let mut file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .await?;
            file.write_all(content.as_bytes()).await?;
            file.flush().await?;
        } else {
            check_size(rel, content.len() as u64)?;
            tokio::fs::write(&path, content).await?;
        }

        let size = tokio::fs::metadata(&path).await?.len();
        Ok(json!({ "path": rel, "size": size, "created": !existed }))
    }

    async fn delete(&self, rel: &str, recursive: bool) -> Result<Value, ToolError> {
        let path = sandboxed(&self.root, rel)?;
        if path == self.root {
            return Err(ToolError::invalid("refusing to delete the workspace root"));
        }
        let metadata = tokio::fs::metadata(&path).await?;
        if metadata.is_dir() {
            if !recursive {
                return Err(ToolError::invalid(format!(
                    "'{rel}' is a directory; set recursive to delete it"
                )));
            }
            tokio::fs::remove_dir_all(&path).await?;
        } else {
            tokio::fs::remove_file(&path).await?;
        }
        Ok(json!({ "path": rel, "deleted": true }))
    }

    async fn list(&self, rel: &str) -> Result<Value, ToolError> {
        let path = sandboxed(&self.root, rel)?;
        let mut entries = Vec::new();
        let mut dir = tokio::fs::read_dir(&path).await?;
        while let Some(entry) = dir.next_entry().await? {
            let metadata = entry.metadata().await?;
            entries.push((
                entry.file_name().to_string_lossy().into_owned(),
                metadata.is_dir(),
                metadata.len(),
            ));
        }
        entries.sort();
        let entries: Vec<Value> = entries
            .into_iter()
            .map(|(name, is_dir, size)| json!({ "name": name, "isDirectory": is_dir, "size": size }))
            .collect();
        Ok(json!({ "path": rel, "count": entries.len(), "entries": entries }))
    }

    async fn exists(&self, rel: &str) -> Result<Value, ToolError> {
        let path = sandboxed(&self.root, rel)?;
        let exists = tokio::fs::try_exists(&path).await?;
        Ok(json!({ "path": rel, "exists": exists }))
    }

    async fn mkdir(&self, rel: &str) -> Result<Value, ToolError> {
        let path = sandboxed(&self.root, rel)?;
        tokio::fs::create_dir_all(&path).await?;
        Ok(json!({ "path": rel, "created": true }))
    }

    async fn copy_or_move(&self, rel: &str, dest: &str, remove_source: bool) -> Result<Value, ToolError> {
        let from = sandboxed(&self.root, rel)?;
        let to = sandboxed(&self.root, dest)?;
        if let Some(parent) = to.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        if remove_source {
            tokio::fs::rename(&from, &to).await?;
        } else {
            tokio::fs::copy(&from, &to).await?;
        }
        Ok(json!({ "path": rel, "destination": dest }))
    }

    async fn info(&self, rel: &str) -> Result<Value, ToolError> {
        let path = sandboxed(&self.root, rel)?;
        let metadata = tokio::fs::metadata(&path).await?;
        let modified = metadata
            .modified()
            .ok()
            .map(|t| chrono::DateTime::<chrono::Utc>::from(t).to_rfc3339());
        Ok(json!({
            "path": rel,
            "size": metadata.len(),
            "isDirectory": metadata.is_dir(),
            "isFile": metadata.is_file(),
            "modified": modified,
        }))
    }
}

fn check_size(rel: &str, size: u64) -> Result<(), ToolError> {
    if size > MAX_FILE_SIZE_BYTES {
        return Err(ToolError::failed(format!(
            "'{rel}' is {size} bytes, over the {MAX_FILE_SIZE_BYTES} byte limit"
        )));
    }
    Ok(())
}

impl StepExecutor for FileOperations {
    async fn execute(
        &self,
        parameters: Map<String, Value>,
        context: &StepContext,
    ) -> Result<Value, ToolError> {
        let operation = required_str(&parameters, "operation")?;
        let path = parameters.get("path").and_then(Value::as_str).unwrap_or(".");

        tracing::debug!(
            step_id = %context.step_id,
            operation,
            path,
            "file operation"
        );

        let mut result = match operation {
            "read" => self.read(path).await?,
            "write" | "create" | "update" => {
                self.write(path, required_str(&parameters, "content")?, false)
                    .await?
            }
            "append" => {
                self.write(path, required_str(&parameters, "content")?, true)
                    .await?
            }
            "delete" => self.delete(path, flag(&parameters, "recursive")).await?,
            "list" => self.list(path).await?,
            "exists" => self.exists(path).await?,
            "mkdir" => self.mkdir(path).await?,
            "copy" => {
                self.copy_or_move(path, required_str(&parameters, "destination")?, false)
                    .await?
            }
            "move" => {
                self.copy_or_move(path, required_str(&parameters, "destination")?, true)
                    .await?
            }
            "info" => self.info(path).await?,
            other => return Err(ToolError::Unsupported(format!("file operation '{other}'"))),
        };

        if let Value::Object(map) = &mut result {
            map.insert("operation".to_string(), json!(operation));
            map.insert("success".to_string(), json!(true));
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use devflow_types::workflow::{StepDefinition, StepType};
    use tempfile::TempDir;

    fn ctx() -> StepContext {
        StepContext::detached(&StepDefinition::new("files", StepType::FileOperation))
    }

    fn params(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("params must be an object"),
        }
    }

    async fn run(ops: &FileOperations, value: Value) -> Result<Value, ToolError> {
        ops.execute(params(value), &ctx()).await
    }

    #[tokio::test]
    async fn write_read_append_round() {
        let tmp = TempDir::new().unwrap();
        let ops = FileOperations::new(tmp.path());

        let written = run(
            &ops,
            json!({ "operation": "write", "path": "src/main.txt", "content": "hello" }),
        )
        .await
        .unwrap();
        assert_eq!(written["created"], true);
        assert_eq!(written["success"], true);
        assert_eq!(written["operation"], "write");

        run(&ops, json!({ "operation": "append", "path": "src/main.txt", "content": " world" }))
            .await
            .unwrap();

        let read = run(&ops, json!({ "operation": "read", "path": "src/main.txt" }))
            .await
            .unwrap();
        assert_eq!(read["content"], "hello world");
        assert_eq!(read["size"], 11);
        assert!(tmp.path().join("src/main.txt").exists());
    }

    #[tokio::test]
    async fn list_exists_and_info() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("b.txt"), "bb").unwrap();
        std::fs::write(tmp.path().join("a.txt"), "a").unwrap();
        std::fs::create_dir(tmp.path().join("dir")).unwrap();
        let ops = FileOperations::new(tmp.path());

        let listed = run(&ops, json!({ "operation": "list" })).await.unwrap();
        let names: Vec<_> = listed["entries"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["name"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["a.txt", "b.txt", "dir"]);

        let exists = run(&ops, json!({ "operation": "exists", "path": "a.txt" }))
            .await
            .unwrap();
        assert_eq!(exists["exists"], true);
        let missing = run(&ops, json!({ "operation": "exists", "path": "nope" }))
            .await
            .unwrap();
        assert_eq!(missing["exists"], false);

        let info = run(&ops, json!({ "operation": "info", "path": "dir" }))
            .await
            .unwrap();
        assert_eq!(info["isDirectory"], true);
    }

    #[tokio::test]
    async fn copy_move_and_delete() {
        let tmp = TempDir::new().unwrap();
        let ops = FileOperations::new(tmp.path());
        run(&ops, json!({ "operation": "write", "path": "a.txt", "content": "x" }))
            .await
            .unwrap();

        run(&ops, json!({ "operation": "copy", "path": "a.txt", "destination": "copy/a.txt" }))
            .await
            .unwrap();
        run(&ops, json!({ "operation": "move", "path": "a.txt", "destination": "b.txt" }))
            .await
            .unwrap();
        assert!(!tmp.path().join("a.txt").exists());
        assert!(tmp.path().join("b.txt").exists());
        assert!(tmp.path().join("copy/a.txt").exists());

        let err = run(&ops, json!({ "operation": "delete", "path": "copy" }))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidParameters(_)));
        run(&ops, json!({ "operation": "delete", "path": "copy", "recursive": true }))
            .await
            .unwrap();
        assert!(!tmp.path().join("copy").exists());
    }

    #[tokio::test]
    async fn rejects_paths_outside_workspace() {
        let tmp = TempDir::new().unwrap();
        let ops = FileOperations::new(tmp.path().join("ws"));
        let err = run(&ops, json!({ "operation": "read", "path": "../secret" }))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("escapes the workspace"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn writes_through_escaping_symlink_are_refused() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("ws");
        let outside = tmp.path().join("outside");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::create_dir_all(&outside).unwrap();
        std::os::unix::fs::symlink(&outside, root.join("link")).unwrap();
        let ops = FileOperations::new(&root);

        let err = run(
            &ops,
            json!({ "operation": "write", "path": "link/pwned.txt", "content": "x" }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ToolError::InvalidParameters(_)));
        assert!(!outside.join("pwned.txt").exists());

        assert!(
            run(&ops, json!({ "operation": "delete", "path": "link", "recursive": true }))
                .await
                .is_err()
        );
        assert!(outside.exists());
    }

    #[tokio::test]
    async fn missing_file_and_unknown_operation_are_errors() {
        let tmp = TempDir::new().unwrap();
        let ops = FileOperations::new(tmp.path());
        assert!(matches!(
            run(&ops, json!({ "operation": "read", "path": "ghost.txt" })).await,
            Err(ToolError::Io(_))
        ));
        assert!(matches!(
            run(&ops, json!({ "operation": "compress", "path": "x" })).await,
            Err(ToolError::Unsupported(_))
        ));
        assert!(matches!(
            run(&ops, json!({ "path": "x" })).await,
            Err(ToolError::InvalidParameters(_))
        ));
    }
}
