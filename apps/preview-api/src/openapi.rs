use serde_json::{Value, json};

pub fn openapi_spec() -> Value {
    json!({
        "openapi": "3.1.0",
        "info": {
            "title": "Preview API",
            "version": env!("CARGO_PKG_VERSION"),
            "description": "Preview sessions over generated projects with sandboxed format, lint, and typecheck.",
        },
        "paths": paths(),
        "components": {
            "parameters": {
                "SessionIdPath": {
                    "name": "session_id",
                    "in": "path",
                    "required": true,
                    "schema": { "type": "string" },
                },
                "FilePathQuery": {
                    "name": "path",
                    "in": "query",
                    "required": true,
                    "schema": { "type": "string" },
                },
                "UnifiedQuery": {
                    "name": "unified",
                    "in": "query",
                    "required": false,
                    "schema": { "type": "boolean", "default": false },
                },
            },
            "schemas": schemas(),
        },
    })
}

fn json_body(schema: &str) -> Value {
    json!({
        "required": true,
        "content": {
            "application/json": {
                "schema": { "$ref": format!("#/components/schemas/{schema}") },
            },
        },
    })
}

fn json_response(description: &str, schema: &str) -> Value {
    json!({
        "description": description,
        "content": {
            "application/json": {
                "schema": { "$ref": format!("#/components/schemas/{schema}") },
            },
        },
    })
}

fn error_response(description: &str) -> Value {
    json_response(description, "ErrorResponse")
}

fn session_param() -> Value {
    json!({ "$ref": "#/components/parameters/SessionIdPath" })
}

fn file_edit(summary: &str) -> Value {
    json!({
        "post": {
            "summary": summary,
            "parameters": [session_param()],
            "requestBody": json_body("PathRequest"),
            "responses": {
                "200": json_response("File view after the edit", "FileView"),
                "404": error_response("Session or file not found"),
                "409": error_response("No history in that direction"),
                "410": error_response("Session expired"),
            },
        },
    })
}

fn paths() -> Value {
    json!({
        "/healthz": {
            "get": {
                "summary": "Health check",
                "responses": {
                    "200": {
                        "description": "Service health",
                        "content": {
                            "application/json": {
                                "schema": {
                                    "type": "object",
                                    "required": ["status", "service", "sessions", "sandbox"],
                                    "properties": {
                                        "status": { "type": "string" },
                                        "service": { "type": "string" },
                                        "sessions": { "type": "integer", "minimum": 0 },
                                        "sandbox": { "$ref": "#/components/schemas/PoolStats" },
                                    },
                                },
                            },
                        },
                    },
                },
            },
        },
        "/openapi.json": {
            "get": {
                "summary": "OpenAPI document",
                "responses": { "200": { "description": "OpenAPI 3.1 document" } },
            },
        },
        "/docs": {
            "get": {
                "summary": "Interactive API reference",
                "responses": { "200": { "description": "HTML page" } },
            },
        },
        "/sessions": {
            "post": {
                "summary": "Generate a project and open a preview session",
                "requestBody": json_body("CreateSessionRequest"),
                "responses": {
                    "200": json_response("Session summary", "SessionSummary"),
                    "422": error_response("Generation failed"),
                },
            },
        },
        "/sessions/{session_id}": {
            "get": {
                "summary": "Session status without refreshing its TTL",
                "parameters": [session_param()],
                "responses": {
                    "200": json_response("Session status", "SessionStatus"),
                    "404": error_response("Session not found"),
                    "410": error_response("Session expired"),
                },
            },
            "delete": {
                "summary": "Destroy session",
                "parameters": [session_param()],
                "responses": {
                    "204": { "description": "Session destroyed" },
                    "404": error_response("Session not found"),
                },
            },
        },
        "/sessions/{session_id}/tree": {
            "get": {
                "summary": "Directory tree of the session's files",
                "parameters": [session_param()],
                "responses": {
                    "200": json_response("File tree", "TreeResponse"),
                    "404": error_response("Session not found"),
                    "410": error_response("Session expired"),
                },
            },
        },
        "/sessions/{session_id}/file": {
            "get": {
                "summary": "Read a file",
                "parameters": [
                    session_param(),
                    { "$ref": "#/components/parameters/FilePathQuery" },
                ],
                "responses": {
                    "200": json_response("File view", "FileView"),
                    "404": error_response("Session or file not found"),
                    "410": error_response("Session expired"),
                },
            },
            "put": {
                "summary": "Save new content for a file",
                "parameters": [session_param()],
                "requestBody": json_body("SaveFileRequest"),
                "responses": {
                    "200": json_response("Saved", "OkResponse"),
                    "404": error_response("Session or file not found"),
                    "410": error_response("Session expired"),
                },
            },
        },
        "/sessions/{session_id}/diff": {
            "get": {
                "summary": "Original and current content, optionally as a unified diff",
                "parameters": [
                    session_param(),
                    { "$ref": "#/components/parameters/FilePathQuery" },
                    { "$ref": "#/components/parameters/UnifiedQuery" },
                ],
                "responses": {
                    "200": json_response("Diff view", "DiffResponse"),
                    "404": error_response("Session or file not found"),
                    "410": error_response("Session expired"),
                },
            },
        },
        "/sessions/{session_id}/undo": file_edit("Step a file back one revision"),
        "/sessions/{session_id}/redo": file_edit("Step a file forward one revision"),
        "/sessions/{session_id}/reset": file_edit("Restore a file to its generated content"),
        "/sessions/{session_id}/typecheck": {
            "post": {
                "summary": "Type-check the session's current files",
                "parameters": [session_param()],
                "requestBody": {
                    "required": false,
                    "content": {
                        "application/json": {
                            "schema": { "$ref": "#/components/schemas/TypecheckSessionRequest" },
                        },
                    },
                },
                "responses": {
                    "200": json_response("Diagnostics", "DiagnosticsResponse"),
                    "403": error_response("Sandbox violation"),
                    "410": error_response("Session expired"),
                    "422": error_response("Typecheck failed"),
                    "504": error_response("Sandbox timed out"),
                },
            },
        },
        "/sessions/{session_id}/download": {
            "get": {
                "summary": "Zip archive of the session's current files",
                "parameters": [session_param()],
                "responses": {
                    "200": {
                        "description": "Zip archive",
                        "content": {
                            "application/zip": {
                                "schema": { "type": "string", "format": "binary" },
                            },
                        },
                    },
                    "404": error_response("Session not found"),
                    "410": error_response("Session expired"),
                },
            },
        },
        "/format": {
            "post": {
                "summary": "Format a snippet",
                "requestBody": json_body("FormatRequest"),
                "responses": {
                    "200": json_response("Formatted code", "FormatOutput"),
                    "422": error_response("Unsupported language or unparsable input"),
                    "504": error_response("Sandbox timed out"),
                },
            },
        },
        "/lint": {
            "post": {
                "summary": "Lint a snippet, optionally applying fixes",
                "requestBody": json_body("LintRequest"),
                "responses": {
                    "200": json_response("Lint diagnostics", "LintOutput"),
                    "422": error_response("Unsupported file"),
                    "504": error_response("Sandbox timed out"),
                },
            },
        },
    })
}

fn schemas() -> Value {
    json!({
        "ErrorResponse": {
            "type": "object",
            "required": ["error"],
            "properties": {
                "error": {
                    "type": "object",
                    "required": ["kind", "message"],
                    "properties": {
                        "kind": {
                            "type": "string",
                            "enum": [
                                "session_not_found", "session_expired", "file_not_found",
                                "nothing_to_undo", "nothing_to_redo", "generation_error",
                                "format_error", "lint_error", "typecheck_error",
                                "sandbox_violation", "timed_out", "bad_request", "internal",
                            ],
                        },
                        "message": { "type": "string" },
                    },
                },
            },
        },
        "OkResponse": {
            "type": "object",
            "required": ["ok"],
            "properties": { "ok": { "type": "boolean" } },
        },
        "CreateSessionRequest": {
            "type": "object",
            "required": ["config"],
            "properties": {
                "config": {
                    "type": "object",
                    "required": ["projectName", "files"],
                    "properties": {
                        "projectName": { "type": "string" },
                        "files": {
                            "type": "object",
                            "additionalProperties": { "type": "string" },
                        },
                    },
                },
            },
        },
        "SessionSummary": {
            "type": "object",
            "required": ["sessionId", "projectName", "totalFiles"],
            "properties": {
                "sessionId": { "type": "string" },
                "projectName": { "type": "string" },
                "totalFiles": { "type": "integer", "minimum": 0 },
            },
        },
        "SessionStatus": {
            "type": "object",
            "required": [
                "sessionId", "projectName", "totalFiles", "createdAt",
                "lastAccessedAt", "expiresAt", "ttlSecs", "dirtyFiles",
            ],
            "properties": {
                "sessionId": { "type": "string" },
                "projectName": { "type": "string" },
                "totalFiles": { "type": "integer", "minimum": 0 },
                "createdAt": { "type": "string", "format": "date-time" },
                "lastAccessedAt": { "type": "string", "format": "date-time" },
                "expiresAt": { "type": "string", "format": "date-time" },
                "ttlSecs": { "type": "integer", "minimum": 0 },
                "dirtyFiles": { "type": "array", "items": { "type": "string" } },
            },
        },
        "TreeNode": {
            "type": "object",
            "required": ["name", "path", "type"],
            "properties": {
                "name": { "type": "string" },
                "path": { "type": "string" },
                "type": { "type": "string", "enum": ["file", "dir"] },
                "children": {
                    "type": "array",
                    "items": { "$ref": "#/components/schemas/TreeNode" },
                },
            },
        },
        "TreeResponse": {
            "type": "object",
            "required": ["tree"],
            "properties": {
                "tree": { "type": "array", "items": { "$ref": "#/components/schemas/TreeNode" } },
            },
        },
        "FileView": {
            "type": "object",
            "required": ["content", "dirty", "canUndo", "canRedo"],
            "properties": {
                "content": { "type": "string" },
                "dirty": { "type": "boolean" },
                "canUndo": { "type": "boolean" },
                "canRedo": { "type": "boolean" },
            },
        },
        "SaveFileRequest": {
            "type": "object",
            "required": ["path", "content"],
            "properties": {
                "path": { "type": "string" },
                "content": { "type": "string" },
            },
        },
        "PathRequest": {
            "type": "object",
            "required": ["path"],
            "properties": { "path": { "type": "string" } },
        },
        "DiffResponse": {
            "type": "object",
            "required": ["original", "current"],
            "properties": {
                "original": { "type": "string" },
                "current": { "type": "string" },
                "unified": { "type": "string" },
            },
        },
        "TypecheckSessionRequest": {
            "type": "object",
            "properties": {
                "compilerOptions": { "type": "object" },
                "path": { "type": "string" },
            },
        },
        "Diagnostic": {
            "type": "object",
            "required": ["line", "column", "message", "severity", "source"],
            "properties": {
                "file": { "type": "string" },
                "line": { "type": "integer", "minimum": 1 },
                "column": { "type": "integer", "minimum": 1 },
                "message": { "type": "string" },
                "severity": { "type": "string", "enum": ["error", "warning", "info"] },
                "source": { "type": "string", "enum": ["eslint", "typescript", "validation"] },
                "code": { "type": "string" },
            },
        },
        "DiagnosticsResponse": {
            "type": "object",
            "required": ["diagnostics"],
            "properties": {
                "diagnostics": {
                    "type": "array",
                    "items": { "$ref": "#/components/schemas/Diagnostic" },
                },
            },
        },
        "FormatRequest": {
            "type": "object",
            "required": ["code", "language"],
            "properties": {
                "code": { "type": "string" },
                "language": { "type": "string" },
            },
        },
        "FormatOutput": {
            "type": "object",
            "required": ["formatted"],
            "properties": { "formatted": { "type": "string" } },
        },
        "LintRequest": {
            "type": "object",
            "required": ["code", "filePath"],
            "properties": {
                "code": { "type": "string" },
                "filePath": { "type": "string" },
                "fix": { "type": "boolean", "default": false },
            },
        },
        "LintOutput": {
            "type": "object",
            "required": ["diagnostics"],
            "properties": {
                "diagnostics": {
                    "type": "array",
                    "items": { "$ref": "#/components/schemas/Diagnostic" },
                },
                "fixedCode": { "type": "string" },
            },
        },
        "PoolStats": {
            "type": "object",
            "properties": {
                "spawned": { "type": "integer" },
                "discarded": { "type": "integer" },
                "completed": { "type": "integer" },
                "faulted": { "type": "integer" },
                "timedOut": { "type": "integer" },
                "idle": { "type": "integer" },
            },
        },
    })
}

pub fn scalar_docs_html(spec_url: &str) -> String {
    format!(
        r#"<!doctype html>
<html lang="en">
  <head>
    <meta charset="utf-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1" />
    <title>Preview API Docs</title>
    <style>
      html, body, #app {{
        margin: 0;
        padding: 0;
        height: 100%;
        width: 100%;
      }}
    </style>
  </head>
  <body>
    <div id="app"></div>
    <script src="https://cdn.jsdelivr.net/npm/@scalar/api-reference"></script>
    <script>
      Scalar.createApiReference('#app', {{
        url: '{spec_url}',
      }});
    </script>
  </body>
</html>
"#
    )
}

#[cfg(test)]
mod tests {
    use super::{openapi_spec, scalar_docs_html};

    #[test]
    fn openapi_spec_lists_every_route() {
        let spec = openapi_spec();
        assert_eq!(spec["openapi"], "3.1.0");
        for path in [
            "/healthz",
            "/openapi.json",
            "/docs",
            "/sessions",
            "/sessions/{session_id}",
            "/sessions/{session_id}/tree",
            "/sessions/{session_id}/file",
            "/sessions/{session_id}/diff",
            "/sessions/{session_id}/undo",
            "/sessions/{session_id}/redo",
            "/sessions/{session_id}/reset",
            "/sessions/{session_id}/typecheck",
            "/sessions/{session_id}/download",
            "/format",
            "/lint",
        ] {
            assert!(spec["paths"][path].is_object(), "{path}");
        }
        assert!(spec["paths"]["/sessions/{session_id}/file"]["put"].is_object());
        assert!(spec["paths"]["/sessions/{session_id}"]["delete"].is_object());
    }

    #[test]
    fn every_schema_reference_resolves() {
        let spec = openapi_spec();
        let text = spec.to_string();
        let prefix = "#/components/schemas/";
        for (start, _) in text.match_indices(prefix) {
            let rest = &text[start + prefix.len()..];
            let name = &rest[..rest.find('"').unwrap()];
            assert!(spec["components"]["schemas"][name].is_object(), "{name}");
        }
    }

    #[test]
    fn scalar_html_uses_openapi_url_and_scalar_bundle() {
        let html = scalar_docs_html("/openapi.json");
        assert!(html.contains("https://cdn.jsdelivr.net/npm/@scalar/api-reference"));
        assert!(html.contains("Scalar.createApiReference('#app'"));
        assert!(html.contains("url: '/openapi.json'"));
    }
}
