use async_trait::async_trait;
use indexmap::IndexMap;
use preview_protocol::{PreviewError, PreviewResult};
use serde::Deserialize;
use serde_json::Value;

/// Output of project generation: a name and files in generation order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedProject {
    pub project_name: String,
    pub files: IndexMap<String, String>,
}

/// Turns an opaque configuration into a file set.
#[async_trait]
pub trait ProjectGenerator: Send + Sync {
    async fn generate(&self, config: &Value) -> PreviewResult<GeneratedProject>;
}

/// Accepts configurations that already carry the generated files:
/// `{ "projectName": "...", "files": { "<path>": "<content>" } }`.
#[derive(Debug, Clone, Default)]
pub struct SnapshotGenerator;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Snapshot {
    project_name: String,
    files: IndexMap<String, String>,
}

#[async_trait]
impl ProjectGenerator for SnapshotGenerator {
    async fn generate(&self, config: &Value) -> PreviewResult<GeneratedProject> {
        let snapshot = Snapshot::deserialize(config)
            .map_err(|error| PreviewError::Generation(format!("invalid configuration: {error}")))?;
        let project_name = snapshot.project_name.trim();
        if project_name.is_empty() {
            return Err(PreviewError::Generation("projectName must not be empty".into()));
        }
        Ok(GeneratedProject {
            project_name: project_name.to_owned(),
            files: snapshot.files,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn snapshot_keeps_file_order() {
        let project = SnapshotGenerator
            .generate(&json!({
                "projectName": " demo ",
                "files": { "src/main.ts": "a", "package.json": "{}", "README.md": "" }
            }))
            .await
            .unwrap();
        assert_eq!(project.project_name, "demo");
        let paths: Vec<&str> = project.files.keys().map(String::as_str).collect();
        assert_eq!(paths, vec!["src/main.ts", "package.json", "README.md"]);
    }

    #[tokio::test]
    async fn malformed_configs_are_generation_errors() {
        for config in [
            json!(null),
            json!({ "files": {} }),
            json!({ "projectName": "demo", "files": { "a.ts": 1 } }),
            json!({ "projectName": "  ", "files": { "a.ts": "" } }),
        ] {
            let error = SnapshotGenerator.generate(&config).await.unwrap_err();
            assert!(matches!(error, PreviewError::Generation(_)), "{config}");
        }
    }
}
