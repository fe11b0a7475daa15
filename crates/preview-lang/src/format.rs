//! Source formatter.
//!
//! Line structure is kept as written. Each line is re-indented from the
//! bracket nesting (two spaces per level), tokens on the line are re-spaced,
//! single-quoted strings become double-quoted when that needs no escapes,
//! and statements relying on automatic semicolon insertion get an explicit
//! `;`.

use std::collections::HashSet;

use thiserror::Error;

use crate::lexer::{Dialect, TokenKind};
use crate::line_index::LineIndex;
use crate::syntax::{Group, Structure, analyze};

const INDENT: &str = "  ";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    #[error("Couldn't resolve parser \"{0}\"")]
    UnknownLanguage(String),
    #[error("{message} ({line}:{column})")]
    Syntax {
        message: String,
        line: u32,
        column: u32,
    },
}

/// Input languages understood by [`format`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    Script(Dialect),
    Json,
}

impl Language {
    pub fn parse(name: &str) -> Option<Self> {
        if name.eq_ignore_ascii_case("json") {
            return Some(Self::Json);
        }
        Dialect::from_language(name).map(Self::Script)
    }
}

/// Formats `code` written in `language`.
pub fn format(code: &str, language: &str) -> Result<String, FormatError> {
    match Language::parse(language) {
        Some(Language::Json) => format_json(code),
        Some(Language::Script(dialect)) => format_script(code, dialect),
        None => Err(FormatError::UnknownLanguage(language.to_string())),
    }
}

fn format_json(code: &str) -> Result<String, FormatError> {
    let value: serde_json::Value =
        serde_json::from_str(code).map_err(|error| FormatError::Syntax {
            message: error.to_string(),
            line: u32::try_from(error.line()).unwrap_or(u32::MAX),
            column: u32::try_from(error.column()).unwrap_or(u32::MAX),
        })?;
    let mut formatted = serde_json::to_string_pretty(&value).map_err(|error| {
        FormatError::Syntax {
            message: error.to_string(),
            line: 1,
            column: 1,
        }
    })?;
    formatted.push('\n');
    Ok(formatted)
}

pub fn format_script(code: &str, dialect: Dialect) -> Result<String, FormatError> {
    let structure = analyze(code, dialect).map_err(|error| {
        let (line, column) = LineIndex::new(code).one_based(error.offset);
        FormatError::Syntax {
            message: error.message,
            line,
            column,
        }
    })?;
    Ok(Printer::new(&structure).print())
}

#[derive(Debug, Clone, Copy)]
struct Level {
    line_indent: usize,
    switch_body: bool,
    seen_case: bool,
}

struct Printer<'a, 'src> {
    structure: &'a Structure<'src>,
    semicolons: HashSet<usize>,
    sig_of_raw: Vec<Option<usize>>,
    levels: Vec<Level>,
    lines: Vec<String>,
    current: String,
    current_indent: usize,
    line_started: bool,
    previous: Option<usize>,
}

impl<'a, 'src> Printer<'a, 'src> {
    fn new(structure: &'a Structure<'src>) -> Self {
        let mut sig_of_raw = vec![None; structure.all.len()];
        for (index, token) in structure.tokens.iter().enumerate() {
            sig_of_raw[token.raw] = Some(index);
        }
        Self {
            structure,
            semicolons: structure.missing_semicolons().into_iter().collect(),
            sig_of_raw,
            levels: Vec::new(),
            lines: Vec::new(),
            current: String::new(),
            current_indent: 0,
            line_started: false,
            previous: None,
        }
    }

    fn print(mut self) -> String {
        let source = self.structure.source;
        for raw in 0..self.structure.all.len() {
            let token = self.structure.all[raw];
            match token.kind {
                TokenKind::Newline => self.flush_line(),
                TokenKind::Whitespace => {}
                TokenKind::LineComment | TokenKind::BlockComment => {
                    if self.line_started {
                        self.current.push(' ');
                    } else {
                        self.start_line(self.base_indent());
                    }
                    self.current.push_str(token.text(source).trim_end());
                }
                _ => {
                    if let Some(index) = self.sig_of_raw[raw] {
                        self.emit(index);
                    }
                }
            }
        }
        self.flush_line();
        finish(self.lines)
    }

    fn start_line(&mut self, indent: usize) {
        self.current_indent = indent;
        self.current = INDENT.repeat(indent);
        self.line_started = true;
    }

    fn flush_line(&mut self) {
        let line = std::mem::take(&mut self.current);
        self.lines.push(line.trim_end().to_string());
        self.line_started = false;
    }

    fn base_indent(&self) -> usize {
        match self.levels.last() {
            Some(level) => {
                let case_body = level.switch_body && level.seen_case;
                level.line_indent + 1 + usize::from(case_body)
            }
            None => 0,
        }
    }

    fn line_indent_for(&self, index: usize) -> usize {
        let kind = self.structure.tokens[index].kind;
        if kind.is_closer() {
            return self.levels.last().map_or(0, |level| level.line_indent);
        }
        let mut indent = self.base_indent();
        if matches!(kind, TokenKind::KwCase | TokenKind::KwDefault)
            && self.levels.last().is_some_and(|level| level.switch_body)
        {
            indent -= usize::from(self.levels.last().is_some_and(|level| level.seen_case));
        }
        if self.is_continuation(index) {
            indent += 1;
        }
        indent
    }

    fn is_continuation(&self, index: usize) -> bool {
        let kind = self.structure.tokens[index].kind;
        if matches!(kind, TokenKind::Dot | TokenKind::QuestionDot) || self.structure.ternary[index]
        {
            return true;
        }
        if kind.is_binary_operator() && kind != TokenKind::Arrow && !kind.is_assignment() {
            return true;
        }
        match self.previous {
            Some(previous) => {
                let previous_kind = self.structure.tokens[previous].kind;
                (previous_kind.is_assignment() || previous_kind.is_binary_operator())
                    && !previous_kind.is_opener()
                    && self.structure.container(index).is_none_or(Group::is_statement_list)
            }
            None => false,
        }
    }

    fn emit(&mut self, index: usize) {
        let structure = self.structure;
        let token = structure.tokens[index];
        if self.line_started {
            if let Some(previous) = self.previous
                && self.current.len() > self.current_indent * INDENT.len()
                && needs_space(structure, previous, index)
            {
                self.current.push(' ');
            }
        } else {
            let indent = self.line_indent_for(index);
            self.start_line(indent);
        }

        if token.kind == TokenKind::String {
            self.current.push_str(&prefer_double_quotes(structure.text(index)));
        } else {
            self.current.push_str(structure.text(index));
        }
        if self.semicolons.contains(&index) {
            self.current.push(';');
        }

        match token.kind {
            kind if kind.is_opener() => {
                let switch_body = kind == TokenKind::LBrace && self.is_switch_body(index);
                self.levels.push(Level {
                    line_indent: self.current_indent,
                    switch_body,
                    seen_case: false,
                });
            }
            kind if kind.is_closer() => {
                self.levels.pop();
            }
            TokenKind::KwCase | TokenKind::KwDefault => {
                if let Some(level) = self.levels.last_mut()
                    && level.switch_body
                {
                    level.seen_case = true;
                }
            }
            _ => {}
        }
        self.previous = Some(index);
    }

    fn is_switch_body(&self, index: usize) -> bool {
        let structure = self.structure;
        index
            .checked_sub(1)
            .filter(|&close| structure.tokens[close].kind == TokenKind::RParen)
            .and_then(|close| structure.partner[close])
            .and_then(|open| open.checked_sub(1))
            .is_some_and(|keyword| structure.tokens[keyword].kind == TokenKind::KwSwitch)
    }
}

/// Whether a space separates two adjacent significant tokens on one line.
fn needs_space(structure: &Structure<'_>, left: usize, right: usize) -> bool {
    let a = structure.tokens[left];
    let b = structure.tokens[right];
    let adjacent = a.end == b.start;
    let operand_before =
        |index: usize| index.checked_sub(1).is_some_and(|i| ends_operand(structure, i));

    if matches!(
        b.kind,
        TokenKind::Comma
            | TokenKind::Semicolon
            | TokenKind::RParen
            | TokenKind::RBracket
            | TokenKind::Dot
            | TokenKind::QuestionDot
    ) {
        return false;
    }
    if matches!(
        a.kind,
        TokenKind::LParen
            | TokenKind::LBracket
            | TokenKind::Dot
            | TokenKind::QuestionDot
            | TokenKind::Ellipsis
            | TokenKind::At
            | TokenKind::Bang
            | TokenKind::Tilde
    ) {
        return false;
    }
    if a.kind == TokenKind::LBrace && b.kind == TokenKind::RBrace {
        return false;
    }
    let angle = |kind: TokenKind| {
        matches!(
            kind,
            TokenKind::Lt | TokenKind::Gt | TokenKind::Shr | TokenKind::UShr
        )
    };
    if structure.dialect.typescript && (angle(a.kind) || angle(b.kind)) && adjacent {
        return false;
    }
    match b.kind {
        TokenKind::Colon => return structure.ternary[right],
        TokenKind::Question => return structure.ternary[right],
        TokenKind::LParen => {
            if is_async_arrow(structure, left, right) {
                return true;
            }
            return !(a.kind.ends_operand() || a.kind == TokenKind::KwImport || angle(a.kind) && adjacent);
        }
        TokenKind::LBracket => return !a.kind.ends_operand(),
        TokenKind::PlusPlus | TokenKind::MinusMinus if is_postfix_update(structure, right) => {
            return false;
        }
        TokenKind::Bang if a.kind.ends_operand() && adjacent => return false,
        TokenKind::Template if a.kind.ends_operand() && adjacent => return false,
        _ => {}
    }
    match a.kind {
        TokenKind::PlusPlus | TokenKind::MinusMinus => is_postfix_update(structure, left),
        TokenKind::Minus | TokenKind::Plus => operand_before(left),
        _ => true,
    }
}

/// Like [`TokenKind::ends_operand`], except the `)` closing a control
/// header such as `if (...)` ends a statement head, not an operand.
fn ends_operand(structure: &Structure<'_>, index: usize) -> bool {
    let kind = structure.tokens[index].kind;
    if kind == TokenKind::RParen
        && matches!(structure.group[index], Some(Group::Paren { control: true, .. }))
    {
        return false;
    }
    kind.ends_operand()
}

/// A `++`/`--` is postfix when an operand ends right before it on the same
/// line; a line break there makes it prefix to the next expression.
fn is_postfix_update(structure: &Structure<'_>, index: usize) -> bool {
    index > 0 && !structure.tokens[index].newline_before && ends_operand(structure, index - 1)
}

/// `async (...) =>`: contextual `async` introducing an arrow function.
fn is_async_arrow(structure: &Structure<'_>, left: usize, right: usize) -> bool {
    structure.tokens[left].kind == TokenKind::Ident
        && structure.text(left) == "async"
        && structure.partner[right]
            .and_then(|close| structure.kind(close + 1))
            .is_some_and(|kind| kind == TokenKind::Arrow)
}

/// `'a'` becomes `"a"` unless the content holds a double quote.
fn prefer_double_quotes(literal: &str) -> String {
    if !literal.starts_with('\'') || literal.len() < 2 {
        return literal.to_string();
    }
    let inner = &literal[1..literal.len() - 1];
    if inner.contains('"') {
        return literal.to_string();
    }
    format!("\"{}\"", inner.replace("\\'", "'"))
}

fn finish(lines: Vec<String>) -> String {
    let mut kept: Vec<String> = Vec::with_capacity(lines.len());
    for (index, line) in lines.iter().enumerate() {
        if line.is_empty() {
            let after_opener = kept.last().is_none_or(|last| {
                last.is_empty() || last.ends_with(['{', '(', '['])
            });
            let before_closer = lines[index + 1..]
                .iter()
                .find(|next| !next.is_empty())
                .is_none_or(|next| next.trim_start().starts_with(['}', ')', ']']));
            if after_opener || before_closer {
                continue;
            }
        }
        kept.push(line.clone());
    }
    if kept.is_empty() {
        return String::new();
    }
    let mut output = kept.join("\n");
    output.push('\n');
    output
}
