//! Compiler options: a fixed baseline plus per-request overrides.

use serde_json::{Map, Value};

use super::{DiagnosticCategory, TsDiagnostic};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerOptions {
    pub target: String,
    pub module: String,
    pub strict: bool,
    pub no_implicit_any: Option<bool>,
    pub strict_null_checks: Option<bool>,
    pub no_emit: bool,
    pub jsx: Option<String>,
    pub allow_js: bool,
    pub check_js: bool,
    pub skip_lib_check: bool,
    pub out_dir: Option<String>,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            target: "es2020".into(),
            module: "esnext".into(),
            strict: true,
            no_implicit_any: Some(true),
            strict_null_checks: None,
            no_emit: true,
            jsx: Some("react-jsx".into()),
            allow_js: true,
            check_js: false,
            skip_lib_check: true,
            out_dir: None,
        }
    }
}

/// Options accepted and ignored because they do not affect checking.
const PASSIVE_BOOLEAN: &[&str] = &[
    "esModuleInterop",
    "allowSyntheticDefaultImports",
    "forceConsistentCasingInFileNames",
    "isolatedModules",
    "resolveJsonModule",
    "noFallthroughCasesInSwitch",
    "noImplicitReturns",
    "noUnusedLocals",
    "noUnusedParameters",
    "declaration",
    "sourceMap",
    "useDefineForClassFields",
    "experimentalDecorators",
    "emitDecoratorMetadata",
    "allowImportingTsExtensions",
];

const PASSIVE_STRING: &[&str] = &["moduleResolution", "rootDir", "baseUrl", "jsxImportSource"];

const PASSIVE_LIST: &[&str] = &["lib", "types", "typeRoots"];

impl CompilerOptions {
    pub fn no_implicit_any(&self) -> bool {
        self.no_implicit_any.unwrap_or(self.strict)
    }

    pub fn strict_null_checks(&self) -> bool {
        self.strict_null_checks.unwrap_or(self.strict)
    }

    /// Applies a JSON object of overrides on top of `self`. Unknown names
    /// and mistyped values are reported as project-level diagnostics and
    /// otherwise ignored.
    pub fn apply_overrides(&mut self, overrides: &Map<String, Value>) -> Vec<TsDiagnostic> {
        let mut diagnostics = Vec::new();
        for (name, value) in overrides {
            if let Err(expected) = self.apply(name, value) {
                diagnostics.push(match expected {
                    Some(expected) => TsDiagnostic::global(
                        5024,
                        format!("Compiler option '{name}' requires a value of type {expected}."),
                    ),
                    None => TsDiagnostic::global(5023, format!("Unknown compiler option '{name}'.")),
                });
            }
        }
        diagnostics
    }

    /// `Err(None)` for unknown options, `Err(Some(type))` for bad values.
    fn apply(&mut self, name: &str, value: &Value) -> Result<(), Option<&'static str>> {
        let boolean = || value.as_bool().ok_or(Some("boolean"));
        let string = || value.as_str().map(str::to_string).ok_or(Some("string"));
        match name {
            "target" => self.target = string()?.to_ascii_lowercase(),
            "module" => self.module = string()?.to_ascii_lowercase(),
            "strict" => self.strict = boolean()?,
            "noImplicitAny" => self.no_implicit_any = Some(boolean()?),
            "strictNullChecks" => self.strict_null_checks = Some(boolean()?),
            "noEmit" => self.no_emit = boolean()?,
            "allowJs" => self.allow_js = boolean()?,
            "checkJs" => self.check_js = boolean()?,
            "skipLibCheck" => self.skip_lib_check = boolean()?,
            "jsx" if value.is_null() => self.jsx = None,
            "jsx" => self.jsx = Some(string()?),
            "outDir" => self.out_dir = Some(string()?),
            name if PASSIVE_BOOLEAN.contains(&name) => {
                boolean()?;
            }
            name if PASSIVE_STRING.contains(&name) => {
                string()?;
            }
            name if PASSIVE_LIST.contains(&name) => {
                if !value.is_array() {
                    return Err(Some("list"));
                }
            }
            _ => return Err(None),
        }
        Ok(())
    }
}

impl TsDiagnostic {
    pub(crate) fn global(code: u32, message_text: String) -> Self {
        Self {
            file: None,
            start: None,
            length: None,
            message_text,
            category: DiagnosticCategory::Error,
            code,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn overrides(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn baseline_is_strict_without_emit() {
        let options = CompilerOptions::default();
        assert!(options.strict);
        assert!(options.no_implicit_any());
        assert!(options.strict_null_checks());
        assert!(options.no_emit);
        assert_eq!(options.jsx.as_deref(), Some("react-jsx"));
    }

    #[test]
    fn overrides_apply_and_report_problems() {
        let mut options = CompilerOptions::default();
        let diagnostics = options.apply_overrides(&overrides(json!({
            "strict": false,
            "noImplicitAny": false,
            "target": "ES2022",
            "noEmit": "yes",
            "bogus": true,
        })));
        assert!(!options.strict_null_checks());
        assert!(!options.no_implicit_any());
        assert_eq!(options.target, "es2022");
        assert!(options.no_emit);

        let codes: Vec<u32> = diagnostics.iter().map(|d| d.code).collect();
        assert_eq!(codes, vec![5024, 5023]);
        assert_eq!(diagnostics[1].message_text, "Unknown compiler option 'bogus'.");
        assert!(diagnostics.iter().all(|d| d.file.is_none()));
    }
}
