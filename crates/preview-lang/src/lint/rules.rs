use std::collections::{HashMap, HashSet};

use super::{Fix, LintMessage, SEVERITY_ERROR, SEVERITY_WARN};
use crate::lexer::TokenKind;
use crate::line_index::LineIndex;
use crate::syntax::{Group, Structure};

pub(super) fn run(structure: &Structure<'_>) -> Vec<LintMessage> {
    let mut cx = Context {
        structure,
        lines: LineIndex::new(structure.source),
        statement_ends: structure.missing_semicolons(),
        messages: Vec::new(),
    };
    semi(&mut cx);
    no_var(&mut cx);
    eqeqeq(&mut cx);
    no_debugger(&mut cx);
    no_empty(&mut cx);
    no_console(&mut cx);
    quotes(&mut cx);
    no_trailing_spaces(&mut cx);

    let bindings = bindings(structure, &cx.statement_ends);
    let usage = usage(structure, &bindings);
    prefer_const(&mut cx, &bindings, &usage);
    no_unused_vars(&mut cx, &bindings, &usage);
    cx.messages
}

struct Context<'a, 'src> {
    structure: &'a Structure<'src>,
    lines: LineIndex<'src>,
    statement_ends: Vec<usize>,
    messages: Vec<LintMessage>,
}

impl Context<'_, '_> {
    fn report(
        &mut self,
        rule_id: &'static str,
        severity: u8,
        offset: usize,
        message: impl Into<String>,
        fix: Option<Fix>,
    ) {
        let (line, column) = self.lines.one_based(offset);
        self.messages.push(LintMessage {
            rule_id: Some(rule_id),
            severity,
            message: message.into(),
            line: Some(line),
            column: Some(column),
            fatal: false,
            fix,
        });
    }
}

fn semi(cx: &mut Context<'_, '_>) {
    for index in cx.statement_ends.clone() {
        let end = cx.structure.tokens[index].end;
        let fix = Fix {
            start: end,
            end,
            text: ";".into(),
        };
        cx.report("semi", SEVERITY_ERROR, end, "Missing semicolon.", Some(fix));
    }
}

fn no_var(cx: &mut Context<'_, '_>) {
    for token in cx.structure.tokens.clone() {
        if token.kind == TokenKind::KwVar {
            let fix = Fix {
                start: token.start,
                end: token.end,
                text: "let".into(),
            };
            cx.report(
                "no-var",
                SEVERITY_ERROR,
                token.start,
                "Unexpected var, use let or const instead.",
                Some(fix),
            );
        }
    }
}

fn eqeqeq(cx: &mut Context<'_, '_>) {
    for token in cx.structure.tokens.clone() {
        let (expected, actual) = match token.kind {
            TokenKind::EqEq => ("===", "=="),
            TokenKind::NotEq => ("!==", "!="),
            _ => continue,
        };
        cx.report(
            "eqeqeq",
            SEVERITY_ERROR,
            token.start,
            format!("Expected '{expected}' and instead saw '{actual}'."),
            None,
        );
    }
}

fn no_debugger(cx: &mut Context<'_, '_>) {
    for token in cx.structure.tokens.clone() {
        if token.kind == TokenKind::KwDebugger {
            cx.report(
                "no-debugger",
                SEVERITY_ERROR,
                token.start,
                "Unexpected 'debugger' statement.",
                None,
            );
        }
    }
}

fn no_empty(cx: &mut Context<'_, '_>) {
    let structure = cx.structure;
    for (index, token) in structure.tokens.iter().enumerate() {
        if token.kind != TokenKind::LBrace
            || !matches!(structure.group[index], Some(Group::Block { expression: false }))
            || structure.partner[index] != Some(index + 1)
        {
            continue;
        }
        let close = structure.tokens[index + 1];
        let has_comment = structure.all[token.raw + 1..close.raw]
            .iter()
            .any(|raw| raw.kind.is_comment());
        if has_comment || is_function_body(structure, index) {
            continue;
        }
        cx.report("no-empty", SEVERITY_ERROR, token.start, "Empty block statement.", None);
    }
}

fn is_function_body(structure: &Structure<'_>, open: usize) -> bool {
    let Some(previous) = open.checked_sub(1) else {
        return false;
    };
    match structure.tokens[previous].kind {
        TokenKind::Arrow => true,
        TokenKind::RParen => !matches!(
            structure.partner[previous].and_then(|paren| structure.group[paren]),
            Some(Group::Paren { control: true, .. })
        ),
        // `(): T {`
        _ => {
            let mut cursor = previous;
            while cursor > 0 && structure.tokens[cursor].kind != TokenKind::Colon {
                if structure.tokens[cursor].newline_before
                    || matches!(
                        structure.tokens[cursor].kind,
                        TokenKind::Semicolon | TokenKind::LBrace | TokenKind::RBrace
                    )
                {
                    return false;
                }
                cursor -= 1;
            }
            cursor > 0 && structure.tokens[cursor - 1].kind == TokenKind::RParen
        }
    }
}

fn no_console(cx: &mut Context<'_, '_>) {
    let structure = cx.structure;
    for index in 0..structure.len() {
        if structure.is_ident(index, "console")
            && structure.kind(index + 1) == Some(TokenKind::Dot)
            && !structure.is_member_name(index)
        {
            cx.report(
                "no-console",
                SEVERITY_WARN,
                structure.tokens[index].start,
                "Unexpected console statement.",
                None,
            );
        }
    }
}

fn quotes(cx: &mut Context<'_, '_>) {
    let structure = cx.structure;
    for (index, token) in structure.tokens.iter().enumerate() {
        if token.kind != TokenKind::String {
            continue;
        }
        let text = structure.text(index);
        if !text.starts_with('\'') {
            continue;
        }
        let inner = &text[1..text.len() - 1];
        let fix = (!inner.contains('"')).then(|| Fix {
            start: token.start,
            end: token.end,
            text: format!("\"{}\"", inner.replace("\\'", "'")),
        });
        cx.report(
            "quotes",
            SEVERITY_WARN,
            token.start,
            "Strings must use doublequote.",
            fix,
        );
    }
}

fn no_trailing_spaces(cx: &mut Context<'_, '_>) {
    let structure = cx.structure;
    let all = &structure.all;
    for (raw, token) in all.iter().enumerate() {
        if token.kind != TokenKind::Whitespace {
            continue;
        }
        let at_line_end = all
            .get(raw + 1)
            .is_none_or(|next| next.kind == TokenKind::Newline);
        if at_line_end {
            let (start, end) = (token.start(), token.end());
            let fix = Fix {
                start,
                end,
                text: String::new(),
            };
            cx.report(
                "no-trailing-spaces",
                SEVERITY_WARN,
                start,
                "Trailing spaces not allowed.",
                Some(fix),
            );
        }
    }
}

fn prefer_const(cx: &mut Context<'_, '_>, bindings: &[Binding], usage: &Usage<'_>) {
    let mut by_statement: HashMap<usize, Vec<&Binding>> = HashMap::new();
    for binding in bindings {
        if binding.kind == BindingKind::Let {
            by_statement
                .entry(binding.keyword)
                .or_default()
                .push(binding);
        }
    }
    let mut keywords: Vec<usize> = by_statement.keys().copied().collect();
    keywords.sort_unstable();
    for keyword in keywords {
        let group = &by_statement[&keyword];
        let never_written = |binding: &&Binding| {
            binding.initialized
                && !binding.destructured
                && usage.writes(cx.structure.text(binding.token)) == 0
        };
        if !group.iter().any(never_written) {
            continue;
        }
        let whole_statement = group.iter().all(never_written);
        let keyword_token = cx.structure.tokens[keyword];
        for binding in group.iter().filter(|binding| never_written(binding)) {
            let name = cx.structure.text(binding.token);
            let fix = whole_statement.then(|| Fix {
                start: keyword_token.start,
                end: keyword_token.end,
                text: "const".into(),
            });
            cx.report(
                "prefer-const",
                SEVERITY_ERROR,
                cx.structure.tokens[binding.token].start,
                format!("'{name}' is never reassigned. Use 'const' instead."),
                fix,
            );
        }
    }
}

fn no_unused_vars(cx: &mut Context<'_, '_>, bindings: &[Binding], usage: &Usage<'_>) {
    for binding in bindings {
        if binding.exported {
            continue;
        }
        let name = cx.structure.text(binding.token);
        if usage.reads(name) > 0 {
            continue;
        }
        let message = if binding.initialized {
            format!("'{name}' is assigned a value but never used.")
        } else {
            format!("'{name}' is defined but never used.")
        };
        cx.report(
            "no-unused-vars",
            SEVERITY_WARN,
            cx.structure.tokens[binding.token].start,
            message,
            None,
        );
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BindingKind {
    Var,
    Let,
    Const,
    Function,
    Class,
    Import,
}

/// A declared name.
#[derive(Debug, Clone)]
pub(crate) struct Binding {
    pub token: usize,
    /// Declaring keyword token.
    pub keyword: usize,
    pub kind: BindingKind,
    pub initialized: bool,
    pub destructured: bool,
    pub exported: bool,
}

/// Collects top-level and nested declarations in source order.
pub(crate) fn bindings(structure: &Structure<'_>, statement_ends: &[usize]) -> Vec<Binding> {
    let ends: HashSet<usize> = statement_ends.iter().copied().collect();
    let mut out = Vec::new();
    let mut index = 0;
    while index < structure.len() {
        let kind = structure.tokens[index].kind;
        let exported = index
            .checked_sub(1)
            .is_some_and(|previous| is_export_prefix(structure, previous));
        match kind {
            TokenKind::KwVar | TokenKind::KwLet | TokenKind::KwConst
                if structure.kind(index + 1) != Some(TokenKind::KwEnum) =>
            {
                let binding_kind = match kind {
                    TokenKind::KwVar => BindingKind::Var,
                    TokenKind::KwLet => BindingKind::Let,
                    _ => BindingKind::Const,
                };
                declarators(structure, &ends, index, binding_kind, exported, &mut out);
            }
            TokenKind::KwFunction => {
                let mut name = index + 1;
                if structure.kind(name) == Some(TokenKind::Star) {
                    name += 1;
                }
                let declaration = structure
                    .tokens
                    .iter()
                    .enumerate()
                    .skip(name)
                    .find(|(_, token)| token.kind == TokenKind::LParen)
                    .and_then(|(paren, _)| structure.group[paren])
                    .is_some_and(|group| {
                        matches!(
                            group,
                            Group::Paren {
                                expression: false,
                                ..
                            }
                        )
                    });
                if declaration && structure.kind(name) == Some(TokenKind::Ident) {
                    out.push(Binding {
                        token: name,
                        keyword: index,
                        kind: BindingKind::Function,
                        initialized: false,
                        destructured: false,
                        exported,
                    });
                }
            }
            TokenKind::KwClass if structure.kind(index + 1) == Some(TokenKind::Ident) => {
                let statement = index == 0
                    || exported
                    || matches!(
                        structure.kind(index - 1),
                        Some(TokenKind::Semicolon | TokenKind::LBrace | TokenKind::RBrace)
                    )
                    || structure.tokens[index].newline_before;
                if statement {
                    out.push(Binding {
                        token: index + 1,
                        keyword: index,
                        kind: BindingKind::Class,
                        initialized: false,
                        destructured: false,
                        exported,
                    });
                }
            }
            TokenKind::KwImport if structure.kind(index + 1) != Some(TokenKind::LParen) => {
                import_bindings(structure, index, &mut out);
            }
            _ => {}
        }
        index += 1;
    }
    out
}

fn is_export_prefix(structure: &Structure<'_>, index: usize) -> bool {
    match structure.tokens[index].kind {
        TokenKind::KwExport => true,
        TokenKind::KwDefault => index
            .checked_sub(1)
            .is_some_and(|previous| structure.kind(previous) == Some(TokenKind::KwExport)),
        TokenKind::Ident if matches!(structure.text(index), "declare" | "async" | "abstract") => {
            index
                .checked_sub(1)
                .is_some_and(|previous| is_export_prefix(structure, previous))
        }
        _ => false,
    }
}

fn declarators(
    structure: &Structure<'_>,
    ends: &HashSet<usize>,
    keyword: usize,
    kind: BindingKind,
    exported: bool,
    out: &mut Vec<Binding>,
) {
    let mut cursor = keyword + 1;
    loop {
        let (names, destructured, next) = match structure.kind(cursor) {
            Some(TokenKind::Ident) => (vec![cursor], false, cursor + 1),
            Some(TokenKind::LBrace | TokenKind::LBracket) => match structure.partner[cursor] {
                Some(close) => (structure.pattern_names(cursor), true, close + 1),
                None => return,
            },
            _ => return,
        };
        let stop_after_names = ends.contains(&(next - 1));
        cursor = next;
        let mut initialized = false;
        if !stop_after_names {
            cursor = skip_until_declarator_end(structure, ends, cursor, &mut initialized);
        }
        for token in names {
            out.push(Binding {
                token,
                keyword,
                kind,
                initialized,
                destructured,
                exported,
            });
        }
        if stop_after_names || structure.kind(cursor) != Some(TokenKind::Comma) {
            return;
        }
        cursor += 1;
    }
}

/// Skips a type annotation and initializer; returns the index of the
/// terminating token.
fn skip_until_declarator_end(
    structure: &Structure<'_>,
    ends: &HashSet<usize>,
    mut cursor: usize,
    initialized: &mut bool,
) -> usize {
    let mut angle = 0usize;
    while let Some(kind) = structure.kind(cursor) {
        match kind {
            TokenKind::Comma if angle == 0 => return cursor,
            TokenKind::Semicolon => return cursor,
            kind if kind.is_closer() => return cursor,
            TokenKind::Ident if matches!(structure.text(cursor), "of") && !*initialized => {
                *initialized = true;
                return cursor;
            }
            TokenKind::KwIn if !*initialized => return cursor,
            TokenKind::Eq if angle == 0 => *initialized = true,
            TokenKind::Lt if !*initialized => angle += 1,
            TokenKind::Gt if !*initialized => angle = angle.saturating_sub(1),
            _ => {}
        }
        if kind.is_opener() {
            match structure.partner[cursor] {
                Some(close) => cursor = close,
                None => return cursor,
            }
        }
        if ends.contains(&cursor) {
            return cursor + 1;
        }
        cursor += 1;
    }
    cursor
}

fn import_bindings(structure: &Structure<'_>, keyword: usize, out: &mut Vec<Binding>) {
    let mut push = |token: usize| {
        out.push(Binding {
            token,
            keyword,
            kind: BindingKind::Import,
            initialized: false,
            destructured: false,
            exported: false,
        });
    };
    let mut cursor = keyword + 1;
    if structure.is_ident(cursor, "type") && structure.kind(cursor + 1) != Some(TokenKind::Comma) {
        cursor += 1;
    }
    loop {
        match structure.kind(cursor) {
            Some(TokenKind::Ident) if structure.text(cursor) != "from" => {
                push(cursor);
                cursor += 1;
            }
            Some(TokenKind::Star) => {
                if structure.is_ident(cursor + 1, "as") {
                    push(cursor + 2);
                }
                cursor += 3;
            }
            Some(TokenKind::LBrace) => {
                let Some(close) = structure.partner[cursor] else {
                    return;
                };
                let mut item = cursor + 1;
                while item < close {
                    if structure.kind(item) == Some(TokenKind::Ident) {
                        let is_type_modifier = structure.text(item) == "type"
                            && structure.kind(item + 1) == Some(TokenKind::Ident)
                            && !structure.is_ident(item + 1, "as");
                        if !is_type_modifier {
                            if structure.is_ident(item + 1, "as") {
                                push(item + 2);
                                item += 3;
                            } else {
                                push(item);
                                item += 1;
                            }
                            continue;
                        }
                    }
                    item += 1;
                }
                cursor = close + 1;
            }
            Some(TokenKind::Comma) => cursor += 1,
            _ => return,
        }
    }
}

/// Read and write counts per identifier name.
pub(crate) struct Usage<'src> {
    reads: HashMap<&'src str, usize>,
    writes: HashMap<&'src str, usize>,
}

impl Usage<'_> {
    pub fn reads(&self, name: &str) -> usize {
        self.reads.get(name).copied().unwrap_or(0)
    }

    pub fn writes(&self, name: &str) -> usize {
        self.writes.get(name).copied().unwrap_or(0)
    }
}

pub(crate) fn usage<'src>(structure: &Structure<'src>, bindings: &[Binding]) -> Usage<'src> {
    let declared: HashSet<usize> = bindings.iter().map(|binding| binding.token).collect();
    let mut usage = Usage {
        reads: HashMap::new(),
        writes: HashMap::new(),
    };
    for index in 0..structure.len() {
        match structure.tokens[index].kind {
            TokenKind::Ident => {
                if declared.contains(&index) || structure.is_member_name(index) {
                    continue;
                }
                let name = structure.text(index);
                if is_write(structure, index) {
                    *usage.writes.entry(name).or_default() += 1;
                    let compound = structure
                        .kind(index + 1)
                        .is_some_and(|kind| kind.is_assignment() && kind != TokenKind::Eq);
                    if !compound {
                        continue;
                    }
                }
                *usage.reads.entry(name).or_default() += 1;
            }
            TokenKind::Template | TokenKind::Jsx => {
                for word in embedded_words(structure.text(index)) {
                    *usage.reads.entry(word).or_default() += 1;
                }
            }
            _ => {}
        }
    }
    usage
}

/// Identifier-like words inside an opaque template or JSX token.
pub(crate) fn embedded_words(text: &str) -> impl Iterator<Item = &str> {
    text.split(|ch: char| !(ch.is_ascii_alphanumeric() || ch == '_' || ch == '$'))
        .filter(|word| {
            word.chars()
                .next()
                .is_some_and(|first| first.is_ascii_alphabetic() || first == '_' || first == '$')
        })
}

fn is_write(structure: &Structure<'_>, index: usize) -> bool {
    let next = structure.kind(index + 1);
    if next.is_some_and(TokenKind::is_assignment) {
        return true;
    }
    let update = |kind: Option<TokenKind>| {
        matches!(kind, Some(TokenKind::PlusPlus | TokenKind::MinusMinus))
    };
    update(next) || update(index.checked_sub(1).and_then(|previous| structure.kind(previous)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Dialect;
    use crate::syntax::analyze;

    fn messages(source: &str) -> Vec<LintMessage> {
        let structure = analyze(source, Dialect::TS).unwrap();
        run(&structure)
    }

    fn by_rule<'a>(messages: &'a [LintMessage], rule: &str) -> Vec<&'a LintMessage> {
        messages
            .iter()
            .filter(|message| message.rule_id == Some(rule))
            .collect()
    }

    #[test]
    fn unused_variables_and_imports() {
        let found = messages(
            "import { a, b as c } from \"./m\";\nconst used = a;\nconst unused = 2;\nexport const out = used;\n",
        );
        let unused: Vec<&str> = by_rule(&found, "no-unused-vars")
            .iter()
            .map(|message| message.message.as_str())
            .collect();
        assert_eq!(
            unused,
            vec![
                "'c' is defined but never used.",
                "'unused' is assigned a value but never used.",
            ]
        );
    }

    #[test]
    fn prefer_const_skips_reassigned_bindings() {
        let found = messages("let a = 1;\nlet b = 2;\nb += a;\nfor (let i = 0; i < b; i++) {}\n");
        let flagged = by_rule(&found, "prefer-const");
        assert_eq!(flagged.len(), 1);
        assert_eq!(flagged[0].message, "'a' is never reassigned. Use 'const' instead.");
        assert!(flagged[0].fix.is_some());
    }

    #[test]
    fn template_and_jsx_contents_count_as_reads() {
        let structure = analyze(
            "import Button from \"./Button\";\nconst name = \"x\";\nexport const view = <Button label={`hi ${name}`} />;\n",
            Dialect::TSX,
        )
        .unwrap();
        assert!(by_rule(&run(&structure), "no-unused-vars").is_empty());
    }

    #[test]
    fn empty_blocks_except_function_bodies() {
        let found = messages("if (x) {}\nfunction f() {}\nconst g = () => {};\ntry { f(); } catch (e) { /* ignore */ }\n");
        let empty = by_rule(&found, "no-empty");
        assert_eq!(empty.len(), 1);
        assert_eq!(empty[0].line, Some(1));
    }

    #[test]
    fn trailing_spaces_and_quotes() {
        let found = messages("const s = 'a';  \nconst t = 'it\"s';\n");
        assert_eq!(by_rule(&found, "no-trailing-spaces").len(), 1);
        let quotes = by_rule(&found, "quotes");
        assert_eq!(quotes.len(), 2);
        assert!(quotes[0].fix.is_some());
        assert!(quotes[1].fix.is_none());
    }
}
