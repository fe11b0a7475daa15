//! Program loading and the per-file semantic pass.
//!
//! Scoping is flat: a name declared more than once anywhere in a file is
//! ambiguous and never used for inference. Every check stays silent when it
//! cannot be sure, so the diagnostics produced are a subset of tsc's.

use std::collections::{BTreeMap, HashMap, HashSet};

use preview_protocol::path;

use super::options::CompilerOptions;
use super::resolver::FileResolver;
use super::types::{Ty, is_assignable, number_value, parse_type, string_value, union};
use super::{CheckError, DiagnosticCategory, TsDiagnostic};
use crate::lexer::{Dialect, TokenKind};
use crate::syntax::{Group, Structure, analyze};

/// Names provided by the default libraries and host environments.
const GLOBALS: &[&str] = &[
    "AbortController", "Array", "ArrayBuffer", "Audio", "BigInt", "Blob", "Boolean",
    "Buffer", "CustomEvent", "DataView", "Date", "Element", "Error", "Event",
    "EventTarget", "File", "FileReader", "Float32Array", "Float64Array", "FormData",
    "Function", "HTMLElement", "Headers", "Image", "Infinity", "Int32Array", "Intl",
    "IntersectionObserver", "JSON", "JSX", "Map", "Math", "MutationObserver", "NaN",
    "Node", "Notification", "Number", "Object", "Promise", "Proxy", "RangeError",
    "React", "Reflect", "RegExp", "Request", "ResizeObserver", "Response", "Set",
    "String", "Symbol", "SyntaxError", "TextDecoder", "TextEncoder", "TypeError", "URL",
    "URLSearchParams", "Uint8Array", "WeakMap", "WeakSet", "WebSocket", "Worker",
    "__dirname", "__filename", "addEventListener", "alert", "arguments", "atob", "btoa",
    "cancelAnimationFrame", "clearInterval", "clearTimeout", "confirm", "console",
    "crypto", "decodeURI", "decodeURIComponent", "document", "encodeURI",
    "encodeURIComponent", "eval", "exports", "fetch", "getComputedStyle", "global",
    "globalThis", "history", "isFinite", "isNaN", "localStorage", "location",
    "matchMedia", "module", "navigator", "parseFloat", "parseInt", "performance",
    "process", "prompt", "queueMicrotask", "removeEventListener", "require",
    "requestAnimationFrame", "self", "sessionStorage", "setInterval", "setTimeout",
    "structuredClone", "undefined", "window",
];

/// What a module exports, as far as a syntactic scan can tell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Exports {
    Known { names: HashSet<String>, default: bool },
    /// No import or export statements at all.
    Script,
    /// `export =`, `export *`, CommonJS, or unparsable.
    Open,
}

struct SourceFile<'a> {
    path: String,
    dialect: Dialect,
    structure: Option<Structure<'a>>,
}

pub(crate) struct Program<'a> {
    resolver: &'a dyn FileResolver,
    options: &'a CompilerOptions,
    files: Vec<SourceFile<'a>>,
    diagnostics: Vec<TsDiagnostic>,
}

impl<'a> Program<'a> {
    pub(crate) fn load(
        root_names: &[String],
        resolver: &'a dyn FileResolver,
        options: &'a CompilerOptions,
    ) -> Self {
        let mut files = Vec::new();
        let mut diagnostics = Vec::new();
        let mut seen = HashSet::new();
        for root in root_names {
            let Some(key) = path::normalize(root) else {
                diagnostics.push(TsDiagnostic::global(6053, format!("File '{root}' not found.")));
                continue;
            };
            if !seen.insert(key.clone()) {
                continue;
            }
            let Some(dialect) = Dialect::from_path(&key) else {
                diagnostics.push(TsDiagnostic::global(
                    6054,
                    format!(
                        "File '{key}' has an unsupported extension. The only supported \
                         extensions are '.ts', '.tsx', '.d.ts', '.js', '.jsx'."
                    ),
                ));
                continue;
            };
            if !dialect.typescript && !options.allow_js {
                diagnostics.push(TsDiagnostic::global(
                    6504,
                    format!(
                        "File '{key}' is a JavaScript file. Did you mean to enable the \
                         'allowJs' option?"
                    ),
                ));
                continue;
            }
            let Some(source) = resolver.read(&key) else {
                diagnostics.push(TsDiagnostic::global(6053, format!("File '{key}' not found.")));
                continue;
            };
            let structure = match analyze(source, dialect) {
                Ok(structure) => Some(structure),
                Err(error) => {
                    diagnostics.push(TsDiagnostic {
                        file: Some(key.clone()),
                        start: Some(error.offset),
                        length: Some(error.length),
                        message_text: error.message,
                        category: DiagnosticCategory::Error,
                        code: error.code,
                    });
                    None
                }
            };
            files.push(SourceFile {
                path: key,
                dialect,
                structure,
            });
        }
        Self {
            resolver,
            options,
            files,
            diagnostics,
        }
    }

    pub(crate) fn check(mut self) -> Result<Vec<TsDiagnostic>, CheckError> {
        let exports: BTreeMap<String, Exports> = self
            .files
            .iter()
            .map(|file| {
                let exports = file.structure.as_ref().map_or(Exports::Open, exports_of);
                (file.path.clone(), exports)
            })
            .collect();

        for file in &self.files {
            let Some(structure) = &file.structure else {
                continue;
            };
            if file.path.ends_with(".d.ts") && self.options.skip_lib_check {
                continue;
            }
            if !file.dialect.typescript && !self.options.check_js {
                continue;
            }
            let checker = FileChecker::new(
                &file.path,
                structure,
                self.options,
                self.resolver,
                &exports,
            );
            self.diagnostics.extend(checker.run());
        }
        self.diagnostics
            .sort_by(|a, b| a.file.cmp(&b.file).then(a.start.cmp(&b.start)));

        if !self.options.no_emit {
            self.emit()?;
        }
        Ok(self.diagnostics)
    }

    /// Writes one output per source through the resolver.
    fn emit(&self) -> Result<(), CheckError> {
        for file in &self.files {
            if file.path.ends_with(".d.ts") {
                continue;
            }
            let Some(output) = output_path(&file.path, self.options.out_dir.as_deref()) else {
                continue;
            };
            let content = self.resolver.read(&file.path).unwrap_or_default();
            self.resolver
                .write(&output, content)
                .map_err(|source| CheckError::Violation {
                    path: output.clone(),
                    source,
                })?;
        }
        Ok(())
    }
}

/// JavaScript output location; `None` when it would overwrite the input.
fn output_path(source: &str, out_dir: Option<&str>) -> Option<String> {
    let (stem, extension) = source.rsplit_once('.')?;
    let extension = match extension {
        "ts" | "tsx" => "js",
        "mts" => "mjs",
        "cts" => "cjs",
        other if out_dir.is_some() => other,
        _ => return None,
    };
    let relative = format!("{stem}.{extension}");
    match out_dir {
        Some(dir) => path::normalize(&format!("{dir}/{relative}")),
        None => Some(relative),
    }
}

pub(crate) fn exports_of(s: &Structure<'_>) -> Exports {
    let ends: HashSet<usize> = s.missing_semicolons().into_iter().collect();
    let mut names = HashSet::new();
    let mut default = false;
    let mut module = false;
    for index in 0..s.len() {
        if s.parent[index].is_some() {
            continue;
        }
        match s.tokens[index].kind {
            TokenKind::KwImport => {
                module = true;
                continue;
            }
            TokenKind::KwExport => module = true,
            _ => continue,
        }
        let mut cursor = index + 1;
        while s.kind(cursor) == Some(TokenKind::Ident)
            && matches!(s.text(cursor), "declare" | "abstract" | "async")
        {
            cursor += 1;
        }
        let name_after = |at: usize| (s.kind(at) == Some(TokenKind::Ident)).then(|| s.text(at));
        match s.kind(cursor) {
            Some(TokenKind::KwDefault) => default = true,
            Some(TokenKind::Eq) => return Exports::Open,
            Some(TokenKind::Star) => {
                if !s.is_ident(cursor + 1, "as") {
                    return Exports::Open;
                }
                names.extend(name_after(cursor + 2).map(str::to_string));
            }
            Some(TokenKind::LBrace) => {
                for (_, exported) in specifier_list(s, cursor) {
                    match s.kind(exported) {
                        Some(TokenKind::KwDefault) => default = true,
                        Some(TokenKind::String) => {
                            names.insert(string_value(s.text(exported)));
                        }
                        _ => {
                            names.insert(s.text(exported).to_string());
                        }
                    }
                }
            }
            Some(TokenKind::KwConst) if s.kind(cursor + 1) == Some(TokenKind::KwEnum) => {
                names.extend(name_after(cursor + 2).map(str::to_string));
            }
            Some(TokenKind::KwConst | TokenKind::KwLet | TokenKind::KwVar) => {
                names.extend(
                    declarator_names(s, &ends, cursor)
                        .into_iter()
                        .map(|token| s.text(token).to_string()),
                );
            }
            Some(TokenKind::KwFunction) => {
                let at = if s.kind(cursor + 1) == Some(TokenKind::Star) {
                    cursor + 2
                } else {
                    cursor + 1
                };
                names.extend(name_after(at).map(str::to_string));
            }
            Some(
                TokenKind::KwClass | TokenKind::KwInterface | TokenKind::KwEnum | TokenKind::KwImport,
            ) => {
                names.extend(name_after(cursor + 1).map(str::to_string));
            }
            Some(TokenKind::Ident) => match s.text(cursor) {
                "type" if s.kind(cursor + 1) == Some(TokenKind::LBrace) => {
                    names.extend(
                        specifier_list(s, cursor + 1)
                            .into_iter()
                            .map(|(_, exported)| s.text(exported).to_string()),
                    );
                }
                "type" | "namespace" | "module" => {
                    names.extend(name_after(cursor + 1).map(str::to_string));
                }
                _ => {}
            },
            _ => {}
        }
    }

    if module {
        Exports::Known { names, default }
    } else if s.dialect.typescript {
        Exports::Script
    } else {
        Exports::Open
    }
}

/// `(imported, local)` token pairs of a `{ a, b as c }` list opened at
/// `open`.
fn specifier_list(s: &Structure<'_>, open: usize) -> Vec<(usize, usize)> {
    let Some(close) = s.partner[open] else {
        return Vec::new();
    };
    let mut pairs = Vec::new();
    let mut item = open + 1;
    while item < close {
        if s.is_ident(item, "type")
            && matches!(
                s.kind(item + 1),
                Some(TokenKind::Ident | TokenKind::KwDefault | TokenKind::String)
            )
            && !s.is_ident(item + 1, "as")
        {
            item += 1;
        }
        let local = if s.is_ident(item + 1, "as") { item + 2 } else { item };
        if matches!(
            s.kind(item),
            Some(TokenKind::Ident | TokenKind::KwDefault | TokenKind::String)
        ) {
            pairs.push((item, local));
        }
        item = local + 1;
        if s.kind(item) == Some(TokenKind::Comma) {
            item += 1;
        }
    }
    pairs
}

/// Names bound by the declarators of the `var`/`let`/`const` at `keyword`.
fn declarator_names(s: &Structure<'_>, ends: &HashSet<usize>, keyword: usize) -> Vec<usize> {
    let mut names = Vec::new();
    let mut cursor = keyword + 1;
    loop {
        let after = match s.kind(cursor) {
            Some(TokenKind::Ident) => {
                names.push(cursor);
                cursor + 1
            }
            Some(TokenKind::LBrace | TokenKind::LBracket) => {
                names.extend(s.pattern_names(cursor));
                match s.partner[cursor] {
                    Some(close) => close + 1,
                    None => return names,
                }
            }
            _ => return names,
        };
        let (_, _, next) = declarator_tail(s, ends, after);
        if s.kind(next) == Some(TokenKind::Comma) && !ends.contains(&(next - 1)) {
            cursor = next + 1;
        } else {
            return names;
        }
    }
}

/// Annotation and initializer ranges following a declarator name that ends
/// just before `after`, plus the index where the declarator stops.
fn declarator_tail(
    s: &Structure<'_>,
    ends: &HashSet<usize>,
    after: usize,
) -> (Option<(usize, usize)>, Option<(usize, usize)>, usize) {
    let mut next = after;
    let mut annotation = None;
    let mut init = None;
    if ends.contains(&(next - 1)) {
        return (None, None, next);
    }
    if s.kind(next) == Some(TokenKind::Bang) {
        next += 1;
    }
    if s.kind(next) == Some(TokenKind::Colon) {
        let end = scan(s, ends, next + 1, true);
        annotation = Some((next + 1, end));
        next = end;
    }
    if !ends.contains(&(next - 1)) && s.kind(next) == Some(TokenKind::Eq) {
        let end = scan(s, ends, next + 1, false);
        init = Some((next + 1, end));
        next = end;
    }
    (annotation, init, next)
}

/// Whether the `<` at `index` opens type arguments: it is glued to the
/// preceding identifier in a TypeScript file.
fn opens_type_arguments(s: &Structure<'_>, index: usize) -> bool {
    s.dialect.typescript
        && index > 0
        && s.tokens[index - 1].kind == TokenKind::Ident
        && s.tokens[index - 1].end == s.tokens[index].start
}

/// End (exclusive) of the type annotation or expression starting at
/// `start`, stopping at a comma, semicolon, enclosing closer, or a statement
/// end. Annotations also stop at `=`, `in`, and `of`.
fn scan(s: &Structure<'_>, ends: &HashSet<usize>, start: usize, annotation: bool) -> usize {
    let mut depth = 0usize;
    let mut index = start;
    while index < s.len() {
        let kind = s.tokens[index].kind;
        if depth == 0 {
            let stop = match kind {
                TokenKind::Comma | TokenKind::Semicolon => true,
                kind if kind.is_closer() => true,
                TokenKind::Eq | TokenKind::KwIn => annotation,
                TokenKind::Ident => annotation && s.text(index) == "of",
                _ => false,
            };
            if stop {
                break;
            }
        }
        match kind {
            TokenKind::Lt if annotation || opens_type_arguments(s, index) => depth += 1,
            TokenKind::Gt if depth > 0 => depth -= 1,
            TokenKind::Shr if depth > 0 => depth = depth.saturating_sub(2),
            kind if kind.is_opener() => index = s.partner[index].unwrap_or(index),
            _ => {}
        }
        if ends.contains(&index) {
            return index + 1;
        }
        index += 1;
    }
    index.min(s.len())
}

fn display(source: &Ty, target: &Ty) -> String {
    if target.contains_literal() {
        source.to_string()
    } else {
        source.widened().to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SymbolKind {
    Const,
    Let,
    Var,
    Param,
    Function,
    Class,
    Import,
    Type,
}

#[derive(Debug, Clone)]
struct Symbol {
    kind: SymbolKind,
    ty: Ty,
    /// Index into [`FileChecker::functions`].
    signature: Option<usize>,
    ambiguous: bool,
}

#[derive(Debug, Clone)]
struct Param {
    /// Simple identifier name.
    name: Option<usize>,
    /// Every name bound, including destructured ones.
    names: Vec<usize>,
    ty: Option<Ty>,
    optional: bool,
    has_default: bool,
    rest: bool,
}

#[derive(Debug, Clone)]
struct Function {
    params: Vec<Param>,
    ret: Option<Ty>,
    /// A parameter type can come from context (callbacks, annotated
    /// targets, object members), so missing annotations are fine.
    contextual: bool,
}

#[derive(Debug, Clone)]
struct Variable {
    name: usize,
    annotation: Ty,
    init: (usize, usize),
}

#[derive(Debug, Default)]
struct ImportClause {
    /// Local binding tokens.
    locals: Vec<usize>,
    /// Token requiring a default export.
    default: Option<usize>,
    /// Imported-name tokens requiring named exports.
    named: Vec<usize>,
    specifier: Option<usize>,
}

enum Resolution {
    /// A bare specifier, assumed to come from an installed package.
    External,
    /// A non-script file that exists in the project.
    Asset,
    Module(String),
    Missing,
}

struct FileChecker<'a, 'src> {
    path: &'a str,
    s: &'a Structure<'src>,
    options: &'a CompilerOptions,
    resolver: &'a dyn FileResolver,
    exports: &'a BTreeMap<String, Exports>,
    ends: HashSet<usize>,
    symbols: HashMap<&'src str, Symbol>,
    known: HashSet<&'src str>,
    /// Tokens naming something at its declaration.
    declarations: HashSet<usize>,
    functions: Vec<Function>,
    /// First token of a function expression to its index.
    function_starts: HashMap<usize, usize>,
    /// Opening brace of a function body to its index.
    bodies: HashMap<usize, usize>,
    variables: Vec<Variable>,
    diagnostics: Vec<TsDiagnostic>,
}

impl<'a, 'src> FileChecker<'a, 'src> {
    fn new(
        path: &'a str,
        s: &'a Structure<'src>,
        options: &'a CompilerOptions,
        resolver: &'a dyn FileResolver,
        exports: &'a BTreeMap<String, Exports>,
    ) -> Self {
        Self {
            path,
            s,
            options,
            resolver,
            exports,
            ends: s.missing_semicolons().into_iter().collect(),
            symbols: HashMap::new(),
            known: HashSet::new(),
            declarations: HashSet::new(),
            functions: Vec::new(),
            function_starts: HashMap::new(),
            bodies: HashMap::new(),
            variables: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    fn run(mut self) -> Vec<TsDiagnostic> {
        self.collect_functions();
        self.collect_declarations();
        self.check_jsx_option();
        self.check_module_references();
        self.check_variables();
        self.check_assignments();
        self.check_calls();
        self.check_returns();
        self.check_parameters();
        self.diagnostics
    }

    fn report(&mut self, first: usize, last: usize, code: u32, message_text: String) {
        let start = self.s.tokens[first].start;
        let end = self.s.tokens[last.max(first)].end;
        self.diagnostics.push(TsDiagnostic {
            file: Some(self.path.to_string()),
            start: Some(start),
            length: Some(end - start),
            message_text,
            category: DiagnosticCategory::Error,
            code,
        });
    }

    fn strict_null_checks(&self) -> bool {
        self.options.strict_null_checks()
    }

    fn symbol(&self, name: &str) -> Option<&Symbol> {
        self.symbols.get(name).filter(|symbol| !symbol.ambiguous)
    }

    fn declare(&mut self, token: usize, kind: SymbolKind, ty: Ty, signature: Option<usize>) {
        let name = self.s.text(token);
        self.declarations.insert(token);
        self.known.insert(name);
        self.symbols
            .entry(name)
            .and_modify(|symbol| symbol.ambiguous = true)
            .or_insert(Symbol {
                kind,
                ty,
                signature,
                ambiguous: false,
            });
    }

    fn at_statement_start(&self, index: usize) -> bool {
        let Some(previous) = index.checked_sub(1) else {
            return true;
        };
        match self.s.tokens[previous].kind {
            TokenKind::Semicolon
            | TokenKind::LBrace
            | TokenKind::RBrace
            | TokenKind::KwExport
            | TokenKind::KwDefault => true,
            TokenKind::Ident if self.s.text(previous) == "declare" => true,
            _ => self.s.tokens[index].newline_before,
        }
    }

    /// Comma-separated ranges inside the bracket pair `open..close`.
    fn segments(&self, open: usize, close: usize, generics: bool) -> Vec<(usize, usize)> {
        let s = self.s;
        let mut ranges = Vec::new();
        let mut depth = 0usize;
        let mut start = open + 1;
        for index in open + 1..close {
            if s.parent[index] != Some(open) {
                continue;
            }
            match s.tokens[index].kind {
                TokenKind::Lt if generics || opens_type_arguments(s, index) => depth += 1,
                TokenKind::Gt if depth > 0 => depth -= 1,
                TokenKind::Shr if depth > 0 => depth = depth.saturating_sub(2),
                TokenKind::Comma if depth == 0 => {
                    if index > start {
                        ranges.push((start, index));
                    }
                    start = index + 1;
                }
                _ => {}
            }
        }
        if close > start {
            ranges.push((start, close));
        }
        ranges
    }

    // Collection.

    fn collect_functions(&mut self) {
        for index in 0..self.s.len() {
            match self.s.tokens[index].kind {
                TokenKind::KwFunction => self.function_keyword(index),
                TokenKind::Arrow => self.arrow(index),
                TokenKind::LParen => self.method(index),
                _ => {}
            }
        }
    }

    fn function_keyword(&mut self, keyword: usize) {
        let s = self.s;
        let mut cursor = keyword + 1;
        if s.kind(cursor) == Some(TokenKind::Star) {
            cursor += 1;
        }
        let name = (s.kind(cursor) == Some(TokenKind::Ident)).then_some(cursor);
        let Some(open) = (cursor..s.len())
            .find(|&i| s.tokens[i].kind == TokenKind::LParen && s.parent[i] == s.parent[keyword])
        else {
            return;
        };
        let Some(close) = s.partner[open] else {
            return;
        };
        let expression = matches!(
            s.group[open],
            Some(Group::Paren {
                expression: true,
                ..
            })
        );
        let start = if keyword > 0 && s.is_ident(keyword - 1, "async") {
            keyword - 1
        } else {
            keyword
        };
        let contextual = expression && self.is_contextual(start);
        let params = self.parameters(open, close);
        let (ret, body) = self.signature_tail(close);
        let id = self.register(params, ret, body, contextual, start);
        match name {
            Some(name) if !expression => {
                self.declare(name, SymbolKind::Function, Ty::Opaque, Some(id));
            }
            Some(name) => {
                self.declarations.insert(name);
                self.known.insert(s.text(name));
            }
            None => {}
        }
    }

    fn arrow(&mut self, arrow: usize) {
        let s = self.s;
        let Some(previous) = arrow.checked_sub(1) else {
            return;
        };
        let body = (s.kind(arrow + 1) == Some(TokenKind::LBrace)).then_some(arrow + 1);

        let single = s.tokens[previous].kind == TokenKind::Ident
            && (previous == 0 || s.tokens[previous - 1].kind != TokenKind::Colon);
        if single {
            let start = if previous > 0 && s.is_ident(previous - 1, "async") {
                previous - 1
            } else {
                previous
            };
            let param = Param {
                name: Some(previous),
                names: vec![previous],
                ty: None,
                optional: false,
                has_default: false,
                rest: false,
            };
            let contextual = self.is_contextual(start);
            self.register(vec![param], None, body, contextual, start);
            return;
        }

        let (open, close, ret) = if s.tokens[previous].kind == TokenKind::RParen {
            let Some(open) = s.partner[previous] else {
                return;
            };
            (open, previous, None)
        } else {
            let Some(close) = self.annotated_params_close(arrow) else {
                return;
            };
            let Some(open) = s.partner[close] else {
                return;
            };
            (open, close, Some(parse_type(s, close + 2, arrow)))
        };
        let start = if open > 0 && s.is_ident(open - 1, "async") {
            open - 1
        } else {
            open
        };
        let params = self.parameters(open, close);
        let contextual = self.is_contextual(start);
        self.register(params, ret, body, contextual, start);
    }

    /// Closing paren of `(...): T =>`, searching back from the arrow.
    fn annotated_params_close(&self, arrow: usize) -> Option<usize> {
        let s = self.s;
        let mut index = arrow.checked_sub(1)?;
        loop {
            if s.parent[index] != s.parent[arrow] {
                return None;
            }
            match s.tokens[index].kind {
                TokenKind::RParen if s.kind(index + 1) == Some(TokenKind::Colon) => {
                    return Some(index);
                }
                TokenKind::Eq | TokenKind::Comma | TokenKind::Semicolon | TokenKind::Arrow => {
                    return None;
                }
                kind if kind.is_closer() => index = s.partner[index]?,
                _ => {}
            }
            index = index.checked_sub(1)?;
        }
    }

    fn method(&mut self, open: usize) {
        let s = self.s;
        let object = match s.container(open) {
            Some(Group::ClassBody) => false,
            Some(Group::Object) => true,
            _ => return,
        };
        let Some(previous) = open.checked_sub(1) else {
            return;
        };
        if !matches!(
            s.tokens[previous].kind,
            TokenKind::Ident | TokenKind::String | TokenKind::PrivateName
        ) {
            return;
        }
        let Some(close) = s.partner[open] else {
            return;
        };
        let defined = match s.kind(close + 1) {
            Some(TokenKind::LBrace) => matches!(s.group[close + 1], Some(Group::Block { .. })),
            Some(TokenKind::Colon) => !s.ternary[close + 1],
            _ => false,
        };
        if !defined {
            return;
        }
        self.declarations.insert(previous);
        let params = self.parameters(open, close);
        let (ret, body) = self.signature_tail(close);
        self.register(params, ret, body, object, previous);
    }

    fn register(
        &mut self,
        params: Vec<Param>,
        ret: Option<Ty>,
        body: Option<usize>,
        contextual: bool,
        start: usize,
    ) -> usize {
        let id = self.functions.len();
        let strict_null_checks = self.strict_null_checks();
        for param in &params {
            let ty = match (&param.ty, param.name) {
                (Some(ty), Some(_)) if param.optional && strict_null_checks => {
                    union(vec![ty.clone(), Ty::Undefined])
                }
                (Some(ty), Some(_)) => ty.clone(),
                _ => Ty::Opaque,
            };
            for &name in &param.names {
                self.declare(name, SymbolKind::Param, ty.clone(), None);
            }
        }
        self.functions.push(Function {
            params,
            ret,
            contextual,
        });
        self.function_starts.insert(start, id);
        if let Some(body) = body {
            self.bodies.insert(body, id);
        }
        id
    }

    fn parameters(&self, open: usize, close: usize) -> Vec<Param> {
        let s = self.s;
        let mut params = Vec::new();
        for (start, end) in self.segments(open, close, true) {
            let mut cursor = start;
            while cursor + 1 < end
                && s.tokens[cursor].kind == TokenKind::Ident
                && matches!(
                    s.text(cursor),
                    "public" | "private" | "protected" | "readonly" | "override"
                )
                && matches!(
                    s.kind(cursor + 1),
                    Some(TokenKind::Ident | TokenKind::LBrace | TokenKind::LBracket)
                )
            {
                cursor += 1;
            }
            if s.tokens[cursor].kind == TokenKind::KwThis {
                continue;
            }
            let rest = s.tokens[cursor].kind == TokenKind::Ellipsis;
            if rest {
                cursor += 1;
            }
            let (name, names, after) = match s.kind(cursor) {
                Some(TokenKind::Ident) => (Some(cursor), vec![cursor], cursor + 1),
                Some(TokenKind::LBrace | TokenKind::LBracket) => {
                    let after = s.partner[cursor].map_or(end, |close| close + 1);
                    (None, s.pattern_names(cursor), after)
                }
                _ => continue,
            };
            let mut cursor = after;
            let optional = cursor < end && s.tokens[cursor].kind == TokenKind::Question;
            if optional {
                cursor += 1;
            }
            let mut ty = None;
            if cursor < end && s.tokens[cursor].kind == TokenKind::Colon {
                let type_end = (cursor + 1..end)
                    .find(|&i| s.tokens[i].kind == TokenKind::Eq && s.parent[i] == Some(open))
                    .unwrap_or(end);
                ty = Some(parse_type(s, cursor + 1, type_end));
                cursor = type_end;
            }
            let has_default = cursor < end && s.tokens[cursor].kind == TokenKind::Eq;
            params.push(Param {
                name,
                names,
                ty,
                optional: optional || has_default,
                has_default,
                rest,
            });
        }
        params
    }

    /// Return annotation and body brace following a parameter list.
    fn signature_tail(&self, close: usize) -> (Option<Ty>, Option<usize>) {
        let s = self.s;
        let mut cursor = close + 1;
        let mut ret = None;
        if s.kind(cursor) == Some(TokenKind::Colon) && !self.ends.contains(&close) {
            let start = cursor + 1;
            let mut depth = 0usize;
            let mut index = start;
            while index < s.len() {
                let kind = s.tokens[index].kind;
                let stop = match kind {
                    TokenKind::LBrace => matches!(s.group[index], Some(Group::Block { .. })),
                    TokenKind::Arrow | TokenKind::Comma => depth == 0,
                    TokenKind::Semicolon => true,
                    kind => kind.is_closer(),
                };
                if stop {
                    break;
                }
                match kind {
                    TokenKind::Lt => depth += 1,
                    TokenKind::Gt if depth > 0 => depth -= 1,
                    kind if kind.is_opener() => index = s.partner[index].unwrap_or(index),
                    _ => {}
                }
                if self.ends.contains(&index) {
                    index += 1;
                    break;
                }
                index += 1;
            }
            ret = Some(parse_type(s, start, index));
            cursor = index;
        }
        let body = match s.kind(cursor) {
            Some(TokenKind::LBrace) if matches!(s.group[cursor], Some(Group::Block { .. })) => {
                Some(cursor)
            }
            _ => None,
        };
        (ret, body)
    }

    fn is_contextual(&self, start: usize) -> bool {
        let s = self.s;
        if s.container(start) == Some(Group::Object) {
            return true;
        }
        let Some(before) = start.checked_sub(1) else {
            return false;
        };
        match s.tokens[before].kind {
            TokenKind::LParen | TokenKind::Comma => matches!(
                s.container(start),
                Some(Group::Paren {
                    control: false,
                    function: false,
                    ..
                })
            ),
            TokenKind::Colon => true,
            TokenKind::Eq => self.has_typed_target(before),
            _ => false,
        }
    }

    /// The assignment at `eq` targets an annotated declaration or a member.
    fn has_typed_target(&self, eq: usize) -> bool {
        let s = self.s;
        let mut index = eq;
        while let Some(previous) = index.checked_sub(1) {
            if s.parent[previous] != s.parent[eq] {
                return false;
            }
            match s.tokens[previous].kind {
                TokenKind::Colon => return !s.ternary[previous],
                TokenKind::Dot | TokenKind::QuestionDot => return true,
                TokenKind::KwConst
                | TokenKind::KwLet
                | TokenKind::KwVar
                | TokenKind::Semicolon
                | TokenKind::Comma => return false,
                kind if kind.is_closer() => match s.partner[previous] {
                    Some(open) => index = open,
                    None => return false,
                },
                _ => index = previous,
            }
        }
        false
    }

    fn collect_declarations(&mut self) {
        let s = self.s;
        for index in 0..s.len() {
            match s.tokens[index].kind {
                TokenKind::KwVar | TokenKind::KwLet | TokenKind::KwConst
                    if s.kind(index + 1) != Some(TokenKind::KwEnum) =>
                {
                    self.variable_statement(index);
                }
                TokenKind::KwClass if s.kind(index + 1) == Some(TokenKind::Ident) => {
                    let name = s.text(index + 1).to_string();
                    self.declare(index + 1, SymbolKind::Class, Ty::Named(name), None);
                }
                TokenKind::KwInterface | TokenKind::KwEnum
                    if s.kind(index + 1) == Some(TokenKind::Ident) =>
                {
                    self.declare(index + 1, SymbolKind::Type, Ty::Opaque, None);
                }
                TokenKind::Ident
                    if matches!(s.text(index), "type" | "namespace" | "module")
                        && s.kind(index + 1) == Some(TokenKind::Ident)
                        && !s.tokens[index + 1].newline_before
                        && self.at_statement_start(index) =>
                {
                    self.declare(index + 1, SymbolKind::Type, Ty::Opaque, None);
                }
                TokenKind::KwImport => {
                    if let Some(clause) = self.import_clause(index) {
                        for local in clause.locals {
                            self.declare(local, SymbolKind::Import, Ty::Opaque, None);
                        }
                    }
                }
                TokenKind::KwCatch if s.kind(index + 1) == Some(TokenKind::LParen) => {
                    let names = match s.kind(index + 2) {
                        Some(TokenKind::Ident) => vec![index + 2],
                        Some(TokenKind::LBrace | TokenKind::LBracket) => s.pattern_names(index + 2),
                        _ => Vec::new(),
                    };
                    for name in names {
                        self.declare(name, SymbolKind::Param, Ty::Opaque, None);
                    }
                }
                _ => {}
            }
        }
    }

    fn variable_statement(&mut self, keyword: usize) {
        let s = self.s;
        let kind = match s.tokens[keyword].kind {
            TokenKind::KwConst => SymbolKind::Const,
            TokenKind::KwLet => SymbolKind::Let,
            _ => SymbolKind::Var,
        };
        let mut cursor = keyword + 1;
        loop {
            let (names, simple, after) = match s.kind(cursor) {
                Some(TokenKind::Ident) => (vec![cursor], true, cursor + 1),
                Some(TokenKind::LBrace | TokenKind::LBracket) => match s.partner[cursor] {
                    Some(close) => (s.pattern_names(cursor), false, close + 1),
                    None => return,
                },
                _ => return,
            };
            let (annotation, init, next) = declarator_tail(s, &self.ends, after);
            let annotation = annotation.map(|(start, end)| parse_type(s, start, end));
            let inferred = init.map(|(start, end)| self.infer(start, end));
            let ty = match (&annotation, inferred) {
                _ if !simple => Ty::Opaque,
                (Some(annotation), _) => annotation.clone(),
                (None, Some(Ty::Array(element))) if *element == Ty::Never => Ty::Opaque,
                (None, Some(inferred)) if kind == SymbolKind::Const => inferred,
                (None, Some(inferred)) => inferred.widened(),
                (None, None) => Ty::Opaque,
            };
            let signature = init.and_then(|(start, _)| self.function_starts.get(&start).copied());
            for &name in &names {
                self.declare(name, kind, ty.clone(), signature);
            }
            if simple
                && let (Some(annotation), Some(init)) = (annotation, init)
            {
                self.variables.push(Variable {
                    name: names[0],
                    annotation,
                    init,
                });
            }
            if s.kind(next) == Some(TokenKind::Comma) && !self.ends.contains(&(next - 1)) {
                cursor = next + 1;
            } else {
                return;
            }
        }
    }

    fn import_clause(&self, keyword: usize) -> Option<ImportClause> {
        let s = self.s;
        if matches!(
            s.kind(keyword + 1),
            Some(TokenKind::LParen | TokenKind::Dot) | None
        ) {
            return None;
        }
        let mut clause = ImportClause::default();
        let mut cursor = keyword + 1;
        if s.kind(cursor) == Some(TokenKind::String) {
            clause.specifier = Some(cursor);
            return Some(clause);
        }
        if s.is_ident(cursor, "type")
            && matches!(
                s.kind(cursor + 1),
                Some(TokenKind::Ident | TokenKind::LBrace | TokenKind::Star)
            )
            && !s.is_ident(cursor + 1, "from")
        {
            cursor += 1;
        }
        loop {
            match s.kind(cursor) {
                Some(TokenKind::Ident)
                    if s.text(cursor) == "from" && s.kind(cursor + 1) == Some(TokenKind::String) =>
                {
                    clause.specifier = Some(cursor + 1);
                    return Some(clause);
                }
                Some(TokenKind::Ident) => {
                    clause.locals.push(cursor);
                    if s.kind(cursor + 1) == Some(TokenKind::Eq) {
                        return Some(clause);
                    }
                    clause.default = Some(cursor);
                    cursor += 1;
                }
                Some(TokenKind::Star) => {
                    if s.is_ident(cursor + 1, "as") && s.kind(cursor + 2) == Some(TokenKind::Ident) {
                        clause.locals.push(cursor + 2);
                        cursor += 3;
                    } else {
                        cursor += 1;
                    }
                }
                Some(TokenKind::LBrace) => {
                    for (imported, local) in specifier_list(s, cursor) {
                        match s.tokens[imported].kind {
                            TokenKind::KwDefault => clause.default = Some(imported),
                            _ => clause.named.push(imported),
                        }
                        if s.kind(local) == Some(TokenKind::Ident) {
                            clause.locals.push(local);
                        }
                    }
                    cursor = s.partner[cursor]? + 1;
                }
                Some(TokenKind::Comma) => cursor += 1,
                _ => return Some(clause),
            }
        }
    }

    // Inference.

    fn top_level(&self, start: usize, end: usize) -> Vec<usize> {
        let s = self.s;
        let mut indices = Vec::new();
        let mut index = start;
        while index < end {
            indices.push(index);
            index = match s.partner[index] {
                Some(close) if s.tokens[index].kind.is_opener() => close + 1,
                _ => index + 1,
            };
        }
        indices
    }

    /// Type of the expression occupying tokens `start..end`.
    fn infer(&self, start: usize, end: usize) -> Ty {
        let s = self.s;
        if start >= end || end > s.len() {
            return Ty::Opaque;
        }
        let first = s.tokens[start].kind;
        if first == TokenKind::LParen && s.partner[start] == Some(end - 1) {
            return self.infer(start + 1, end - 1);
        }
        let top = self.top_level(start, end);
        let kind_of = |index: usize| s.tokens[index].kind;

        if let Some(&cast) = top
            .iter()
            .rev()
            .find(|&&i| i > start && (s.is_ident(i, "as") || s.is_ident(i, "satisfies")))
        {
            if s.is_ident(cast, "satisfies") {
                return self.infer(start, cast);
            }
            if s.is_ident(cast + 1, "const") {
                return Ty::Opaque;
            }
            return parse_type(s, cast + 1, end);
        }
        if top.iter().any(|&i| {
            let kind = kind_of(i);
            kind == TokenKind::Arrow || kind == TokenKind::Comma || kind.is_assignment()
        }) {
            return Ty::Opaque;
        }

        let is_ternary = |i: usize, kind: TokenKind| s.ternary[i] && kind_of(i) == kind;
        if let Some(question) = top.iter().copied().find(|&i| is_ternary(i, TokenKind::Question)) {
            let colon = top
                .iter()
                .copied()
                .find(|&i| i > question && is_ternary(i, TokenKind::Colon));
            return match colon {
                Some(colon)
                    if !top.iter().any(|&i| {
                        i > question && i < colon && is_ternary(i, TokenKind::Question)
                    }) =>
                {
                    let then = self.infer(question + 1, colon);
                    let otherwise = self.infer(colon + 1, end);
                    if then.is_opaque() || otherwise.is_opaque() {
                        Ty::Opaque
                    } else {
                        union(vec![then, otherwise])
                    }
                }
                _ => Ty::Opaque,
            };
        }

        if top.iter().any(|&i| {
            matches!(
                kind_of(i),
                TokenKind::AmpAmp | TokenKind::PipePipe | TokenKind::QuestionQuestion
            )
        }) {
            return Ty::Opaque;
        }

        let generic = top
            .iter()
            .any(|&i| kind_of(i) == TokenKind::Lt && opens_type_arguments(s, i));
        if top.iter().any(|&i| match kind_of(i) {
            TokenKind::EqEq
            | TokenKind::EqEqEq
            | TokenKind::NotEq
            | TokenKind::NotEqEq
            | TokenKind::LtEq
            | TokenKind::GtEq
            | TokenKind::KwInstanceof
            | TokenKind::KwIn => true,
            TokenKind::Lt | TokenKind::Gt => !generic && i > start,
            _ => false,
        }) {
            return Ty::Boolean;
        }

        let binary: Vec<usize> = top
            .iter()
            .copied()
            .filter(|&i| {
                i > start
                    && s.tokens[i - 1].kind.ends_operand()
                    && matches!(
                        kind_of(i),
                        TokenKind::Plus
                            | TokenKind::Minus
                            | TokenKind::Star
                            | TokenKind::Slash
                            | TokenKind::Percent
                            | TokenKind::StarStar
                            | TokenKind::Shl
                            | TokenKind::Shr
                            | TokenKind::UShr
                            | TokenKind::Amp
                            | TokenKind::Pipe
                            | TokenKind::Caret
                    )
            })
            .collect();
        if !binary.is_empty() {
            let pluses: Vec<usize> = binary
                .iter()
                .copied()
                .filter(|&i| kind_of(i) == TokenKind::Plus)
                .collect();
            let bitwise = binary.iter().any(|&i| {
                matches!(
                    kind_of(i),
                    TokenKind::Shl
                        | TokenKind::Shr
                        | TokenKind::UShr
                        | TokenKind::Amp
                        | TokenKind::Pipe
                        | TokenKind::Caret
                )
            });
            if pluses.is_empty() || bitwise {
                return Ty::Number;
            }
            let mut operands = Vec::new();
            let mut operand_start = start;
            for plus in pluses {
                operands.push(self.infer(operand_start, plus).widened());
                operand_start = plus + 1;
            }
            operands.push(self.infer(operand_start, end).widened());
            if operands.contains(&Ty::String) {
                return Ty::String;
            }
            if operands.iter().all(|operand| *operand == Ty::Number) {
                return Ty::Number;
            }
            return Ty::Opaque;
        }

        match first {
            TokenKind::Bang | TokenKind::KwDelete => return Ty::Boolean,
            TokenKind::KwTypeof => return Ty::String,
            TokenKind::KwVoid => return Ty::Undefined,
            TokenKind::Tilde | TokenKind::PlusPlus | TokenKind::MinusMinus => return Ty::Number,
            TokenKind::Minus | TokenKind::Plus => {
                if end == start + 2 && kind_of(start + 1) == TokenKind::Number {
                    return match number_value(s.text(start + 1)) {
                        Some(value) if first == TokenKind::Minus => Ty::NumberLit(-value),
                        Some(value) => Ty::NumberLit(value),
                        None => Ty::Opaque,
                    };
                }
                return Ty::Number;
            }
            TokenKind::KwNew => {
                let constructor = s.kind(start + 1) == Some(TokenKind::Ident)
                    && (end == start + 2
                        || s.kind(start + 2) == Some(TokenKind::LParen)
                            && s.partner[start + 2] == Some(end - 1));
                return if constructor {
                    Ty::Named(s.text(start + 1).to_string())
                } else {
                    Ty::Opaque
                };
            }
            _ => {}
        }
        if end == start + 2 && matches!(kind_of(start + 1), TokenKind::PlusPlus | TokenKind::MinusMinus)
        {
            return Ty::Number;
        }

        if end == start + 1 {
            let text = s.text(start);
            return match first {
                TokenKind::String => Ty::StringLit(string_value(text)),
                TokenKind::Number if text.ends_with('n') => Ty::BigInt,
                TokenKind::Number => number_value(text).map_or(Ty::Number, Ty::NumberLit),
                TokenKind::Template => Ty::String,
                TokenKind::KwTrue => Ty::BooleanLit(true),
                TokenKind::KwFalse => Ty::BooleanLit(false),
                TokenKind::KwNull => Ty::Null,
                TokenKind::Regex => Ty::Named("RegExp".into()),
                TokenKind::Jsx => Ty::Named("JSX.Element".into()),
                TokenKind::Ident => match text {
                    "undefined" => Ty::Undefined,
                    "NaN" | "Infinity" => Ty::Number,
                    name => self.symbol(name).map_or(Ty::Opaque, |symbol| symbol.ty.clone()),
                },
                _ => Ty::Opaque,
            };
        }

        if first == TokenKind::Ident
            && s.kind(start + 1) == Some(TokenKind::LParen)
            && s.partner[start + 1] == Some(end - 1)
        {
            return match s.text(start) {
                "String" => Ty::String,
                "Number" | "parseInt" | "parseFloat" => Ty::Number,
                "Boolean" | "isNaN" | "isFinite" => Ty::Boolean,
                name => self
                    .symbol(name)
                    .and_then(|symbol| symbol.signature)
                    .and_then(|id| self.functions[id].ret.clone())
                    .unwrap_or(Ty::Opaque),
            };
        }

        if first == TokenKind::LBracket && s.partner[start] == Some(end - 1) {
            let elements = self.segments(start, end - 1, false);
            if elements.is_empty() {
                return Ty::Array(Box::new(Ty::Never));
            }
            let mut members = Vec::with_capacity(elements.len());
            for (element_start, element_end) in elements {
                if kind_of(element_start) == TokenKind::Ellipsis {
                    return Ty::Opaque;
                }
                let ty = self.infer(element_start, element_end);
                if ty.is_opaque() {
                    return Ty::Opaque;
                }
                members.push(ty.widened());
            }
            return Ty::Array(Box::new(union(members)));
        }

        Ty::Opaque
    }

    // Checks.

    fn check_jsx_option(&mut self) {
        if self.options.jsx.is_some() || !self.s.dialect.jsx {
            return;
        }
        for index in 0..self.s.len() {
            if self.s.tokens[index].kind == TokenKind::Jsx {
                self.report(
                    index,
                    index,
                    17004,
                    "Cannot use JSX unless the '--jsx' flag is provided.".into(),
                );
            }
        }
    }

    fn check_module_references(&mut self) {
        let s = self.s;
        for index in 0..s.len() {
            if s.is_member_name(index) {
                continue;
            }
            match s.tokens[index].kind {
                TokenKind::KwImport if s.kind(index + 1) == Some(TokenKind::LParen) => {
                    if s.kind(index + 2) == Some(TokenKind::String)
                        && s.kind(index + 3) == Some(TokenKind::RParen)
                    {
                        self.check_specifier(index + 2, None, &[], false);
                    }
                }
                TokenKind::KwImport => {
                    if let Some(clause) = self.import_clause(index)
                        && let Some(specifier) = clause.specifier
                    {
                        let side_effect_only = clause.locals.is_empty();
                        self.check_specifier(specifier, clause.default, &clause.named, side_effect_only);
                    }
                }
                TokenKind::KwExport => {
                    if let Some((specifier, default, named)) = self.re_export(index) {
                        self.check_specifier(specifier, default, &named, false);
                    }
                }
                _ => {}
            }
        }
    }

    /// `export ... from "x"`: the specifier plus the names it pulls in.
    fn re_export(&self, keyword: usize) -> Option<(usize, Option<usize>, Vec<usize>)> {
        let s = self.s;
        let mut cursor = keyword + 1;
        if s.is_ident(cursor, "type") {
            cursor += 1;
        }
        let mut default = None;
        let mut named = Vec::new();
        match s.kind(cursor)? {
            TokenKind::Star => {
                cursor += 1;
                if s.is_ident(cursor, "as") {
                    cursor += 2;
                }
            }
            TokenKind::LBrace => {
                for (imported, _) in specifier_list(s, cursor) {
                    match s.tokens[imported].kind {
                        TokenKind::KwDefault => default = Some(imported),
                        _ => named.push(imported),
                    }
                }
                cursor = s.partner[cursor]? + 1;
            }
            _ => return None,
        }
        (s.is_ident(cursor, "from") && s.kind(cursor + 1) == Some(TokenKind::String))
            .then_some((cursor + 1, default, named))
    }

    fn resolve(&self, specifier: &str) -> Resolution {
        let relative = specifier.starts_with("./")
            || specifier.starts_with("../")
            || specifier.starts_with('/')
            || specifier == "."
            || specifier == "..";
        if !relative {
            return Resolution::External;
        }
        let Some(base) = path::join(self.path, specifier) else {
            return Resolution::Missing;
        };

        let mut extensions = vec![".ts", ".tsx", ".d.ts"];
        if self.options.allow_js {
            extensions.extend([".js", ".jsx"]);
        }
        let mut candidates = Vec::new();
        for (js, ts) in [(".js", ".ts"), (".jsx", ".tsx"), (".mjs", ".mts"), (".cjs", ".cts")] {
            if let Some(stem) = base.strip_suffix(js) {
                candidates.push(format!("{stem}{ts}"));
                if js == ".js" {
                    candidates.push(format!("{stem}.tsx"));
                }
            }
        }
        candidates.push(base.clone());
        candidates.extend(extensions.iter().map(|ext| format!("{base}{ext}")));
        candidates.extend(extensions.iter().map(|ext| format!("{base}/index{ext}")));

        for candidate in candidates {
            if self.resolver.exists(&candidate) {
                return if candidate == base && Dialect::from_path(&base).is_none() {
                    Resolution::Asset
                } else {
                    Resolution::Module(candidate)
                };
            }
        }
        Resolution::Missing
    }

    fn check_specifier(
        &mut self,
        specifier: usize,
        default: Option<usize>,
        named: &[usize],
        side_effect_only: bool,
    ) {
        let s = self.s;
        let text = string_value(s.text(specifier));
        match self.resolve(&text) {
            Resolution::External | Resolution::Asset => {}
            Resolution::Missing => {
                if !side_effect_only {
                    self.report(
                        specifier,
                        specifier,
                        2307,
                        format!("Cannot find module '{text}' or its corresponding type declarations."),
                    );
                }
            }
            Resolution::Module(module) => {
                let exports = self.exports;
                match exports.get(&module) {
                    Some(Exports::Known {
                        names,
                        default: has_default,
                    }) => {
                        if let Some(token) = default
                            && !has_default
                        {
                            self.report(
                                token,
                                token,
                                1192,
                                format!("Module '\"{text}\"' has no default export."),
                            );
                        }
                        for &token in named {
                            let name = match s.tokens[token].kind {
                                TokenKind::String => string_value(s.text(token)),
                                _ => s.text(token).to_string(),
                            };
                            if !names.contains(&name) {
                                self.report(
                                    token,
                                    token,
                                    2305,
                                    format!("Module '\"{text}\"' has no exported member '{name}'."),
                                );
                            }
                        }
                    }
                    Some(Exports::Script) if !side_effect_only => {
                        self.report(
                            specifier,
                            specifier,
                            2306,
                            format!("File '{module}' is not a module."),
                        );
                    }
                    _ => {}
                }
            }
        }
    }

    /// Reports an identifier in a checked position that nothing declares.
    fn check_reference(&mut self, index: usize) {
        let name = self.s.text(index);
        if self.s.tokens[index].kind != TokenKind::Ident
            || self.known.contains(name)
            || GLOBALS.contains(&name)
        {
            return;
        }
        self.report(index, index, 2304, format!("Cannot find name '{name}'."));
    }

    fn check_variables(&mut self) {
        let strict_null_checks = self.strict_null_checks();
        let variables = std::mem::take(&mut self.variables);
        for variable in &variables {
            let (start, end) = variable.init;
            if end == start + 1 {
                self.check_reference(start);
            }
            let source = self.infer(start, end);
            if !is_assignable(&source, &variable.annotation, strict_null_checks) {
                let message = format!(
                    "Type '{}' is not assignable to type '{}'.",
                    display(&source, &variable.annotation),
                    variable.annotation
                );
                self.report(variable.name, variable.name, 2322, message);
            }
        }
        self.variables = variables;
    }

    fn check_assignments(&mut self) {
        let s = self.s;
        for index in 0..s.len() {
            if s.tokens[index].kind != TokenKind::Ident
                || self.declarations.contains(&index)
                || s.is_member_name(index)
                || matches!(
                    s.container(index),
                    Some(Group::ClassBody | Group::EnumBody | Group::TypeBody | Group::Object)
                )
            {
                continue;
            }
            let next = s.tokens.get(index + 1);
            let postfix = next.is_some_and(|token| {
                matches!(token.kind, TokenKind::PlusPlus | TokenKind::MinusMinus)
                    && !token.newline_before
            });
            let prefix = index > 0
                && matches!(
                    s.tokens[index - 1].kind,
                    TokenKind::PlusPlus | TokenKind::MinusMinus
                );
            let assigned = next.is_some_and(|token| token.kind.is_assignment());
            if !(assigned || postfix || prefix) {
                continue;
            }
            let name = s.text(index);
            let (code, what) = match self.symbol(name).map(|symbol| symbol.kind) {
                Some(SymbolKind::Const) => (2588, "a constant"),
                Some(SymbolKind::Import) => (2632, "an import"),
                _ => continue,
            };
            self.report(
                index,
                index,
                code,
                format!("Cannot assign to '{name}' because it is {what}."),
            );
        }
    }

    fn check_calls(&mut self) {
        let s = self.s;
        for index in 0..s.len() {
            if s.tokens[index].kind != TokenKind::Ident
                || s.kind(index + 1) != Some(TokenKind::LParen)
                || self.declarations.contains(&index)
                || s.is_member_name(index)
            {
                continue;
            }
            match index.checked_sub(1).map(|previous| s.tokens[previous].kind) {
                Some(TokenKind::KwFunction) => continue,
                Some(TokenKind::KwNew) => {
                    self.check_reference(index);
                    continue;
                }
                _ => {}
            }
            let open = index + 1;
            let Some(close) = s.partner[open] else {
                continue;
            };
            if s.kind(close + 1) == Some(TokenKind::LBrace)
                && matches!(s.group[close + 1], Some(Group::Block { .. }))
            {
                continue;
            }
            self.check_reference(index);
            let args = self.segments(open, close, false);
            for &(start, end) in &args {
                if end == start + 1 {
                    self.check_reference(start);
                }
            }
            if let Some(id) = self.symbol(s.text(index)).and_then(|symbol| symbol.signature) {
                self.check_arguments(index, id, &args);
            }
        }
    }

    fn check_arguments(&mut self, callee: usize, id: usize, args: &[(usize, usize)]) {
        let s = self.s;
        if args
            .iter()
            .any(|&(start, _)| s.tokens[start].kind == TokenKind::Ellipsis)
        {
            return;
        }
        let params = self.functions[id].params.clone();
        let required = params
            .iter()
            .filter(|param| !param.optional && !param.rest)
            .count();
        let maximum = (!params.iter().any(|param| param.rest)).then_some(params.len());
        let count = args.len();

        if count < required || maximum.is_some_and(|maximum| count > maximum) {
            let expected = match maximum {
                Some(maximum) if maximum == required => maximum.to_string(),
                Some(maximum) => format!("{required}-{maximum}"),
                None => format!("at least {required}"),
            };
            let message = format!("Expected {expected} arguments, but got {count}.");
            match maximum {
                Some(maximum) if count > maximum => {
                    self.report(args[maximum].0, args[count - 1].1 - 1, 2554, message);
                }
                _ => self.report(callee, callee, 2554, message),
            }
            return;
        }

        let strict_null_checks = self.strict_null_checks();
        for (param, &(start, end)) in params.iter().zip(args) {
            if param.rest {
                break;
            }
            let Some(target) = &param.ty else {
                continue;
            };
            let source = self.infer(start, end);
            if !is_assignable(&source, target, strict_null_checks) {
                let message = format!(
                    "Argument of type '{}' is not assignable to parameter of type '{target}'.",
                    display(&source, target)
                );
                self.report(start, end - 1, 2345, message);
            }
        }
    }

    /// Function whose body most closely encloses `index`.
    fn owner(&self, index: usize) -> Option<usize> {
        let mut parent = self.s.parent[index];
        while let Some(open) = parent {
            if let Some(&id) = self.bodies.get(&open) {
                return Some(id);
            }
            parent = self.s.parent[open];
        }
        None
    }

    fn check_returns(&mut self) {
        let s = self.s;
        let strict_null_checks = self.strict_null_checks();
        for index in 0..s.len() {
            if s.tokens[index].kind != TokenKind::KwReturn {
                continue;
            }
            let Some(target) = self.owner(index).and_then(|id| self.functions[id].ret.clone())
            else {
                continue;
            };
            if target.is_opaque() {
                continue;
            }
            let start = index + 1;
            let end = if self.ends.contains(&index) {
                start
            } else {
                scan(s, &self.ends, start, false)
            };
            if start >= end {
                if !matches!(target, Ty::Void | Ty::Undefined)
                    && !is_assignable(&Ty::Undefined, &target, strict_null_checks)
                {
                    self.report(
                        index,
                        index,
                        2322,
                        format!("Type 'undefined' is not assignable to type '{target}'."),
                    );
                }
                continue;
            }
            if end == start + 1 {
                self.check_reference(start);
            }
            let source = self.infer(start, end);
            if !is_assignable(&source, &target, strict_null_checks) {
                let message = format!(
                    "Type '{}' is not assignable to type '{target}'.",
                    display(&source, &target)
                );
                self.report(start, end - 1, 2322, message);
            }
        }
    }

    fn check_parameters(&mut self) {
        if !self.s.dialect.typescript || !self.options.no_implicit_any() {
            return;
        }
        let s = self.s;
        let functions = std::mem::take(&mut self.functions);
        for function in functions.iter().filter(|function| !function.contextual) {
            for param in function.params.iter().filter(|param| param.ty.is_none()) {
                match param.name {
                    Some(name) if param.rest => self.report(
                        name,
                        name,
                        7019,
                        format!(
                            "Rest parameter '{}' implicitly has an 'any[]' type.",
                            s.text(name)
                        ),
                    ),
                    Some(name) if !param.has_default => self.report(
                        name,
                        name,
                        7006,
                        format!("Parameter '{}' implicitly has an 'any' type.", s.text(name)),
                    ),
                    Some(_) => {}
                    None => {
                        for &name in &param.names {
                            if s.kind(name + 1) == Some(TokenKind::Eq) {
                                continue;
                            }
                            self.report(
                                name,
                                name,
                                7031,
                                format!(
                                    "Binding element '{}' implicitly has an 'any' type.",
                                    s.text(name)
                                ),
                            );
                        }
                    }
                }
            }
        }
        self.functions = functions;
    }
}

#[cfg(test)]
mod tests {
    use super::super::{SnapshotResolver, check_project};
    use super::*;

    fn check_with(files: &[(&str, &str)], options: &CompilerOptions) -> Vec<TsDiagnostic> {
        let resolver = SnapshotResolver::new(
            files
                .iter()
                .map(|(path, content)| (path.to_string(), content.to_string())),
        );
        let roots: Vec<String> = files
            .iter()
            .map(|(path, _)| path.to_string())
            .filter(|path| Dialect::from_path(path).is_some())
            .collect();
        check_project(&roots, &resolver, options).unwrap()
    }

    fn check(files: &[(&str, &str)]) -> Vec<TsDiagnostic> {
        check_with(files, &CompilerOptions::default())
    }

    fn codes(diagnostics: &[TsDiagnostic]) -> Vec<u32> {
        diagnostics.iter().map(|d| d.code).collect()
    }

    #[test]
    fn reports_mismatched_declaration_at_the_name() {
        let diagnostics = check(&[("a.ts", "const n: number = 'x';")]);
        assert_eq!(diagnostics.len(), 1);
        let diagnostic = &diagnostics[0];
        assert_eq!(diagnostic.code, 2322);
        assert_eq!(diagnostic.file.as_deref(), Some("a.ts"));
        assert_eq!(diagnostic.start, Some(6));
        assert_eq!(diagnostic.length, Some(1));
        assert_eq!(
            diagnostic.message_text,
            "Type 'string' is not assignable to type 'number'."
        );
    }

    #[test]
    fn literal_targets_keep_literal_sources() {
        let diagnostics = check(&[("a.ts", "const m: 'a' | 'b' = 'c';\nconst ok: 'a' | 'b' = 'a';\n")]);
        assert_eq!(codes(&diagnostics), vec![2322]);
        assert_eq!(
            diagnostics[0].message_text,
            "Type '\"c\"' is not assignable to type '\"a\" | \"b\"'."
        );
    }

    #[test]
    fn clean_project_has_no_diagnostics() {
        let diagnostics = check(&[
            (
                "src/App.tsx",
                "import { useState } from 'react';\nimport { add } from './math';\n\nexport default function App() {\n  const [count, setCount] = useState(0);\n  return <button onClick={() => setCount(add(count, 1))}>{count}</button>;\n}\n",
            ),
            (
                "src/math.ts",
                "export function add(a: number, b: number): number {\n  return a + b;\n}\n",
            ),
            ("src/main.tsx", "import App from './App';\nimport './index.css';\nconsole.log(App);\n"),
            ("src/index.css", "body { margin: 0; }"),
        ]);
        assert!(diagnostics.is_empty(), "{diagnostics:?}");
    }

    #[test]
    fn checks_call_arity_and_argument_types() {
        let source = "function greet(name: string, times?: number): string {\n  return name.repeat(times ?? 1);\n}\ngreet(42);\ngreet();\ngreet('a', 1, 2);\n";
        let diagnostics = check(&[("a.ts", source)]);
        assert_eq!(codes(&diagnostics), vec![2345, 2554, 2554]);
        assert_eq!(
            diagnostics[0].message_text,
            "Argument of type 'number' is not assignable to parameter of type 'string'."
        );
        assert_eq!(diagnostics[1].message_text, "Expected 1-2 arguments, but got 0.");
        assert_eq!(diagnostics[2].message_text, "Expected 1-2 arguments, but got 3.");
        assert_eq!(diagnostics[2].start, source.rfind("2)"));
    }

    #[test]
    fn reports_constant_reassignment_implicit_any_and_unknown_names() {
        let source = "const limit = 1;\nlimit = 2;\nfunction twice(x) {\n  return x * 2;\n}\nmissing();\n[1, 2].map((n) => n * 2);\n";
        let diagnostics = check(&[("a.ts", source)]);
        assert_eq!(codes(&diagnostics), vec![2588, 7006, 2304]);
        assert_eq!(
            diagnostics[0].message_text,
            "Cannot assign to 'limit' because it is a constant."
        );
        assert_eq!(
            diagnostics[1].message_text,
            "Parameter 'x' implicitly has an 'any' type."
        );
        assert_eq!(diagnostics[2].message_text, "Cannot find name 'missing'.");
    }

    #[test]
    fn checks_return_statements_against_annotations() {
        let source = "function label(n: number): string {\n  return n;\n}\nfunction none(): number {\n  return;\n}\n";
        let diagnostics = check(&[("a.ts", source)]);
        assert_eq!(codes(&diagnostics), vec![2322, 2322]);
        assert_eq!(
            diagnostics[0].message_text,
            "Type 'number' is not assignable to type 'string'."
        );
        assert_eq!(
            diagnostics[1].message_text,
            "Type 'undefined' is not assignable to type 'number'."
        );
    }

    #[test]
    fn resolves_relative_imports_and_their_exports() {
        let diagnostics = check(&[
            ("src/util.ts", "export const add = (a: number, b: number) => a + b;\n"),
            (
                "src/main.ts",
                "import { add, sub } from './util';\nimport def from './util';\nimport gone from './gone';\nconsole.log(add, sub, def, gone);\n",
            ),
        ]);
        assert_eq!(codes(&diagnostics), vec![2305, 1192, 2307]);
        assert_eq!(
            diagnostics[0].message_text,
            "Module '\"./util\"' has no exported member 'sub'."
        );
        assert_eq!(diagnostics[0].file.as_deref(), Some("src/main.ts"));
        assert_eq!(
            diagnostics[2].message_text,
            "Cannot find module './gone' or its corresponding type declarations."
        );
    }

    #[test]
    fn host_paths_are_never_resolved() {
        let diagnostics = check(&[(
            "a.ts",
            "import secret from '/etc/passwd';\nimport hosts from '../../../etc/hosts';\nconsole.log(secret, hosts);\n",
        )]);
        assert_eq!(codes(&diagnostics), vec![2307, 2307]);
        assert!(
            diagnostics
                .iter()
                .all(|d| d.message_text.starts_with("Cannot find module"))
        );
    }

    #[test]
    fn syntax_errors_are_reported_per_file() {
        let diagnostics = check(&[("bad.ts", "function f( {\n"), ("good.ts", "export {};\n")]);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].code, 1005);
        assert_eq!(diagnostics[0].file.as_deref(), Some("bad.ts"));
    }

    #[test]
    fn javascript_is_only_checked_with_check_js() {
        let files = [("a.js", "const n = 1;\nn = 2;\n")];
        assert!(check(&files).is_empty());
        let options = CompilerOptions {
            check_js: true,
            ..CompilerOptions::default()
        };
        assert_eq!(codes(&check_with(&files, &options)), vec![2588]);
    }

    #[test]
    fn jsx_requires_the_flag() {
        let files = [("App.tsx", "export const App = () => <div />;\n")];
        assert!(check(&files).is_empty());
        let options = CompilerOptions {
            jsx: None,
            ..CompilerOptions::default()
        };
        assert_eq!(codes(&check_with(&files, &options)), vec![17004]);
    }

    #[test]
    fn exports_are_scanned_syntactically() {
        let structure = analyze(
            "export default class A {}\nexport const b = 1, { c } = o;\nexport { d as e };\nexport type F = string;\n",
            Dialect::TS,
        )
        .unwrap();
        let Exports::Known { names, default } = exports_of(&structure) else {
            panic!("expected known exports");
        };
        assert!(default);
        let mut names: Vec<_> = names.into_iter().collect();
        names.sort();
        assert_eq!(names, vec!["F", "b", "c", "e"]);

        let script = analyze("const a = 1;\n", Dialect::TS).unwrap();
        assert_eq!(exports_of(&script), Exports::Script);
    }
}
