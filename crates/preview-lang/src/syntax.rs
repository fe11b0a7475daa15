//! Bracket structure and statement boundaries over a token stream.
//!
//! This is deliberately shallow: it pairs brackets, classifies every brace
//! (block, object literal, type literal, class or enum body), and finds
//! statement ends that rely on automatic semicolon insertion. The
//! formatter, linter, and checker all work on top of it.

use crate::lexer::{Dialect, Token, TokenKind, lex};

/// A non-trivia token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SigToken {
    pub kind: TokenKind,
    pub start: usize,
    pub end: usize,
    /// A line break (or a comment spanning one) separates this token from
    /// the previous significant token.
    pub newline_before: bool,
    /// Index into [`Structure::all`].
    pub raw: usize,
}

/// What a bracket pair delimits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Group {
    Paren {
        /// `if (...)`, `for (...)`, `while (...)`, `switch (...)`, ...
        control: bool,
        /// Parameter list of a `function` keyword.
        function: bool,
        /// The function is used as an expression.
        expression: bool,
    },
    Bracket,
    Block {
        /// Arrow or function-expression body.
        expression: bool,
    },
    Object,
    TypeBody,
    ClassBody,
    EnumBody,
}

impl Group {
    pub fn is_statement_list(self) -> bool {
        matches!(self, Self::Block { .. } | Self::ClassBody)
    }
}

/// A fatal syntax problem, tsc-coded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxError {
    pub offset: usize,
    pub length: usize,
    pub code: u32,
    pub message: String,
}

impl SyntaxError {
    fn new(offset: usize, length: usize, code: u32, message: impl Into<String>) -> Self {
        Self {
            offset,
            length,
            code,
            message: message.into(),
        }
    }
}

/// Analyzed token stream of one source text.
#[derive(Debug, Clone)]
pub struct Structure<'src> {
    pub source: &'src str,
    pub dialect: Dialect,
    /// Every token including trivia.
    pub all: Vec<Token>,
    pub tokens: Vec<SigToken>,
    /// Partner index of every opener and closer.
    pub partner: Vec<Option<usize>>,
    /// Group of every opener and closer.
    pub group: Vec<Option<Group>>,
    /// Innermost enclosing opener. A closer's parent is outside its own pair.
    pub parent: Vec<Option<usize>>,
    /// `?` and `:` tokens of conditional expressions.
    pub ternary: Vec<bool>,
}

impl<'src> Structure<'src> {
    pub fn text(&self, index: usize) -> &'src str {
        let token = &self.tokens[index];
        &self.source[token.start..token.end]
    }

    pub fn kind(&self, index: usize) -> Option<TokenKind> {
        self.tokens.get(index).map(|token| token.kind)
    }

    pub fn is_ident(&self, index: usize, text: &str) -> bool {
        self.kind(index) == Some(TokenKind::Ident) && self.text(index) == text
    }

    /// Group of the innermost bracket pair containing `index`.
    pub fn container(&self, index: usize) -> Option<Group> {
        self.parent[index].and_then(|open| self.group[open])
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Member names and object keys, which are not variable references.
    pub fn is_member_name(&self, index: usize) -> bool {
        let after_dot = index.checked_sub(1).is_some_and(|previous| {
            matches!(
                self.kind(previous),
                Some(TokenKind::Dot | TokenKind::QuestionDot)
            )
        });
        after_dot
            || self.kind(index + 1) == Some(TokenKind::Colon)
                && !self.ternary[index + 1]
                && matches!(
                    self.container(index),
                    Some(Group::Object | Group::TypeBody | Group::ClassBody)
                )
    }

    /// Names bound by the object or array destructuring pattern opened at
    /// `open`.
    pub fn pattern_names(&self, open: usize) -> Vec<usize> {
        let Some(close) = self.partner[open] else {
            return Vec::new();
        };
        let object = self.tokens[open].kind == TokenKind::LBrace;
        let mut names = Vec::new();
        let mut cursor = open + 1;
        while cursor < close {
            match self.tokens[cursor].kind {
                TokenKind::Ident => {
                    if object && self.kind(cursor + 1) == Some(TokenKind::Colon) {
                        cursor += 2;
                        continue;
                    }
                    names.push(cursor);
                    cursor += 1;
                }
                TokenKind::LBrace | TokenKind::LBracket => {
                    names.extend(self.pattern_names(cursor));
                    cursor = self.partner[cursor].map_or(close, |end| end + 1);
                }
                TokenKind::Eq => {
                    cursor += 1;
                    while cursor < close && self.tokens[cursor].kind != TokenKind::Comma {
                        cursor = match self.partner[cursor] {
                            Some(end) if self.tokens[cursor].kind.is_opener() => end + 1,
                            _ => cursor + 1,
                        };
                    }
                }
                _ => cursor += 1,
            }
        }
        names
    }

    /// Significant token indices after which a statement ends without a
    /// semicolon.
    pub fn missing_semicolons(&self) -> Vec<usize> {
        (0..self.tokens.len())
            .filter(|&index| self.ends_statement_without_semicolon(index))
            .collect()
    }

    fn ends_statement_without_semicolon(&self, index: usize) -> bool {
        if !self
            .container(index)
            .is_none_or(|group| group.is_statement_list())
        {
            return false;
        }
        if !self.can_end_statement(index) {
            return false;
        }
        let Some(next) = self.tokens.get(index + 1) else {
            return true;
        };
        if next.kind == TokenKind::RBrace {
            return self.group[index + 1].is_some_and(Group::is_statement_list);
        }
        next.newline_before && !self.continues_expression(index + 1)
    }

    fn can_end_statement(&self, index: usize) -> bool {
        let kind = self.tokens[index].kind;
        match kind {
            TokenKind::RParen => !matches!(
                self.group[index],
                Some(Group::Paren { control: true, .. })
            ),
            TokenKind::RBrace => match self.group[index] {
                Some(Group::Object) => true,
                Some(Group::Block { expression }) => expression,
                Some(Group::TypeBody) => self
                    .partner[index]
                    .and_then(|open| open.checked_sub(1))
                    .is_some_and(|before| self.tokens[before].kind == TokenKind::Eq),
                _ => false,
            },
            TokenKind::KwBreak
            | TokenKind::KwContinue
            | TokenKind::KwReturn
            | TokenKind::KwDebugger => true,
            _ => kind.ends_operand(),
        }
    }

    fn continues_expression(&self, index: usize) -> bool {
        let kind = self.tokens[index].kind;
        if kind.is_binary_operator() && !matches!(kind, TokenKind::PlusPlus | TokenKind::MinusMinus)
        {
            return true;
        }
        if kind == TokenKind::Ident {
            return matches!(self.text(index), "as" | "satisfies");
        }
        matches!(
            kind,
            TokenKind::Dot
                | TokenKind::QuestionDot
                | TokenKind::Question
                | TokenKind::Colon
                | TokenKind::Comma
                | TokenKind::LParen
                | TokenKind::LBracket
                | TokenKind::LBrace
                | TokenKind::RParen
                | TokenKind::RBracket
                | TokenKind::Template
                | TokenKind::Lt
                | TokenKind::Gt
                | TokenKind::KwElse
                | TokenKind::KwCatch
                | TokenKind::KwFinally
                | TokenKind::KwIn
                | TokenKind::KwInstanceof
                | TokenKind::KwExtends
        )
    }
}

/// Converts a lexical error token into a syntax error.
pub fn lexical_error(token: &Token, source: &str) -> Option<SyntaxError> {
    let (code, message) = match token.kind {
        TokenKind::UnterminatedString => (1002, "Unterminated string literal.".to_string()),
        TokenKind::UnterminatedTemplate => (1160, "Unterminated template literal.".to_string()),
        TokenKind::UnterminatedComment => (1010, "'*/' expected.".to_string()),
        TokenKind::UnterminatedRegex => {
            (1161, "Unterminated regular expression literal.".to_string())
        }
        TokenKind::UnterminatedJsx => {
            let tag: String = token.text(source)[1..]
                .chars()
                .take_while(|ch| ch.is_ascii_alphanumeric() || *ch == '.' || *ch == '-')
                .collect();
            (
                17008,
                format!("JSX element '{tag}' has no corresponding closing tag."),
            )
        }
        TokenKind::Error => (1127, "Invalid character.".to_string()),
        _ => return None,
    };
    let length = if token.kind == TokenKind::Error {
        token.end() - token.start()
    } else {
        1
    };
    Some(SyntaxError::new(token.start(), length, code, message))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pending {
    None,
    Class,
    Interface,
    Enum,
    Namespace,
    TypeAlias { depth: usize },
}

#[derive(Debug, Default, Clone, Copy)]
struct Frame {
    ternaries: u32,
    case_label: bool,
}

/// Lexes and analyzes `source`, failing on the first lexical or bracket
/// error.
pub fn analyze(source: &str, dialect: Dialect) -> Result<Structure<'_>, SyntaxError> {
    let all = lex(source, dialect);
    let mut tokens = Vec::new();
    let mut newline_pending = false;
    for (raw, token) in all.iter().enumerate() {
        if let Some(error) = lexical_error(token, source) {
            return Err(error);
        }
        match token.kind {
            TokenKind::Newline => newline_pending = true,
            TokenKind::BlockComment if token.text(source).contains('\n') => {
                newline_pending = true;
            }
            kind if kind.is_trivia() => {}
            kind => {
                tokens.push(SigToken {
                    kind,
                    start: token.start(),
                    end: token.end(),
                    newline_before: newline_pending,
                    raw,
                });
                newline_pending = false;
            }
        }
    }

    let mut builder = Builder {
        source,
        dialect,
        tokens: &tokens,
        partner: vec![None; tokens.len()],
        group: vec![None; tokens.len()],
        parent: vec![None; tokens.len()],
        ternary: vec![false; tokens.len()],
        stack: Vec::new(),
        frames: vec![Frame::default()],
        pending: Pending::None,
        return_annotation: None,
        last_colon: Colon::Other,
    };
    builder.run()?;
    let Builder {
        partner,
        group,
        parent,
        ternary,
        ..
    } = builder;

    Ok(Structure {
        source,
        dialect,
        all,
        tokens,
        partner,
        group,
        parent,
        ternary,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Colon {
    Ternary,
    Case,
    AfterParams,
    Other,
}

struct Builder<'a> {
    source: &'a str,
    dialect: Dialect,
    tokens: &'a [SigToken],
    partner: Vec<Option<usize>>,
    group: Vec<Option<Group>>,
    parent: Vec<Option<usize>>,
    ternary: Vec<bool>,
    stack: Vec<usize>,
    frames: Vec<Frame>,
    pending: Pending,
    /// Opening paren of a parameter list followed by a return annotation.
    return_annotation: Option<usize>,
    last_colon: Colon,
}

impl Builder<'_> {
    fn text(&self, index: usize) -> &str {
        let token = &self.tokens[index];
        &self.source[token.start..token.end]
    }

    fn kind(&self, index: usize) -> Option<TokenKind> {
        self.tokens.get(index).map(|token| token.kind)
    }

    fn frame(&mut self) -> &mut Frame {
        let last = self.frames.len() - 1;
        &mut self.frames[last]
    }

    fn container(&self) -> Option<Group> {
        self.stack.last().and_then(|&open| self.group[open])
    }

    fn run(&mut self) -> Result<(), SyntaxError> {
        for index in 0..self.tokens.len() {
            self.parent[index] = self.stack.last().copied();
            let token = self.tokens[index];

            if let Pending::TypeAlias { depth } = self.pending
                && token.newline_before
                && depth == self.stack.len()
                && index > 0
                && !self.tokens[index - 1].kind.is_binary_operator()
                && !matches!(self.tokens[index - 1].kind, TokenKind::Pipe | TokenKind::Amp)
            {
                self.pending = Pending::None;
            }

            match token.kind {
                kind if kind.is_opener() => {
                    let group = self.classify(index);
                    self.group[index] = Some(group);
                    self.stack.push(index);
                    self.frames.push(Frame::default());
                }
                kind if kind.is_closer() => self.close(index)?,
                TokenKind::Semicolon => {
                    self.pending = Pending::None;
                    self.return_annotation = None;
                    self.frame().case_label = false;
                }
                TokenKind::Question => {
                    let optional_marker = matches!(
                        self.kind(index + 1),
                        Some(TokenKind::Colon | TokenKind::RParen | TokenKind::Comma | TokenKind::Eq)
                    );
                    if !optional_marker {
                        self.frame().ternaries += 1;
                        self.ternary[index] = true;
                    }
                }
                TokenKind::Colon => {
                    let frame = *self.frames.last().unwrap_or(&Frame::default());
                    self.last_colon = if frame.ternaries > 0 {
                        self.frame().ternaries -= 1;
                        self.ternary[index] = true;
                        Colon::Ternary
                    } else if frame.case_label {
                        self.frame().case_label = false;
                        Colon::Case
                    } else if index > 0 && self.tokens[index - 1].kind == TokenKind::RParen {
                        let open = self.partner[index - 1];
                        if let Some(open) = open
                            && matches!(
                                self.group[open],
                                Some(Group::Paren { control: false, .. })
                            )
                        {
                            self.return_annotation = Some(open);
                        }
                        Colon::AfterParams
                    } else {
                        Colon::Other
                    };
                }
                TokenKind::KwCase => self.frame().case_label = true,
                TokenKind::KwDefault => {
                    let exported = index > 0 && self.tokens[index - 1].kind == TokenKind::KwExport;
                    if !exported {
                        self.frame().case_label = true;
                    }
                }
                TokenKind::KwClass => self.pending = Pending::Class,
                TokenKind::KwInterface => self.pending = Pending::Interface,
                TokenKind::KwEnum => self.pending = Pending::Enum,
                TokenKind::Arrow => self.return_annotation = None,
                TokenKind::Eq if !matches!(self.pending, Pending::TypeAlias { .. }) => {
                    self.return_annotation = None;
                }
                TokenKind::Ident => self.note_contextual_keyword(index),
                _ => {}
            }
        }

        if let Some(&open) = self.stack.last() {
            let expected = closer_text(self.tokens[open].kind);
            return Err(SyntaxError::new(
                self.source.len(),
                0,
                1005,
                format!("'{expected}' expected."),
            ));
        }
        Ok(())
    }

    fn note_contextual_keyword(&mut self, index: usize) {
        let at_statement_start = self.at_statement_start(index);
        let next_is_name = matches!(
            self.kind(index + 1),
            Some(TokenKind::Ident) | Some(TokenKind::String)
        ) && !self.tokens[index + 1].newline_before;
        match self.text(index) {
            "type" if at_statement_start && next_is_name && self.dialect.typescript => {
                self.pending = Pending::TypeAlias {
                    depth: self.stack.len(),
                };
            }
            "namespace" | "module" if at_statement_start && next_is_name => {
                self.pending = Pending::Namespace;
            }
            _ => {}
        }
    }

    fn at_statement_start(&self, index: usize) -> bool {
        let Some(previous) = index.checked_sub(1) else {
            return true;
        };
        match self.tokens[previous].kind {
            TokenKind::Semicolon | TokenKind::LBrace | TokenKind::RBrace => true,
            TokenKind::KwExport | TokenKind::KwDefault => true,
            TokenKind::Ident if matches!(self.text(previous), "declare" | "async" | "abstract") => {
                self.at_statement_start(previous)
            }
            _ => self.tokens[index].newline_before,
        }
    }

    fn close(&mut self, index: usize) -> Result<(), SyntaxError> {
        let token = self.tokens[index];
        let Some(open) = self.stack.pop() else {
            return Err(SyntaxError::new(
                token.start,
                token.end - token.start,
                1128,
                "Declaration or statement expected.",
            ));
        };
        self.frames.pop();
        let open_kind = self.tokens[open].kind;
        let expected = closer_text(open_kind);
        if closer_text(open_kind) != closer_text_of_closer(token.kind) {
            return Err(SyntaxError::new(
                token.start,
                token.end - token.start,
                1005,
                format!("'{expected}' expected."),
            ));
        }
        self.partner[open] = Some(index);
        self.partner[index] = Some(open);
        self.group[index] = self.group[open];
        self.parent[index] = self.stack.last().copied();
        if self.return_annotation == Some(open) {
            self.return_annotation = None;
        }
        Ok(())
    }

    fn classify(&mut self, index: usize) -> Group {
        match self.tokens[index].kind {
            TokenKind::LParen => self.classify_paren(index),
            TokenKind::LBracket => Group::Bracket,
            _ => self.classify_brace(index),
        }
    }

    fn classify_paren(&self, index: usize) -> Group {
        let Some(previous) = index.checked_sub(1) else {
            return Group::Paren {
                control: false,
                function: false,
                expression: false,
            };
        };
        let control = matches!(
            self.tokens[previous].kind,
            TokenKind::KwIf
                | TokenKind::KwFor
                | TokenKind::KwWhile
                | TokenKind::KwSwitch
                | TokenKind::KwCatch
                | TokenKind::KwWith
        );
        let keyword = match self.tokens[previous].kind {
            TokenKind::KwFunction => Some(previous),
            TokenKind::Ident
                if previous > 0 && self.tokens[previous - 1].kind == TokenKind::KwFunction =>
            {
                Some(previous - 1)
            }
            TokenKind::Star
                if previous > 0 && self.tokens[previous - 1].kind == TokenKind::KwFunction =>
            {
                Some(previous - 1)
            }
            _ => None,
        };
        match keyword {
            Some(keyword) => Group::Paren {
                control: false,
                function: true,
                expression: !self.at_statement_start(keyword),
            },
            None => Group::Paren {
                control,
                function: false,
                expression: false,
            },
        }
    }

    fn classify_brace(&mut self, index: usize) -> Group {
        if self.container() == Some(Group::TypeBody) {
            return Group::TypeBody;
        }
        match std::mem::replace(&mut self.pending, Pending::None) {
            Pending::Class => return Group::ClassBody,
            Pending::Interface => return Group::TypeBody,
            Pending::Enum => return Group::EnumBody,
            Pending::Namespace => return Group::Block { expression: false },
            alias @ Pending::TypeAlias { .. } => {
                self.pending = alias;
                return Group::TypeBody;
            }
            Pending::None => {}
        }

        let Some(previous) = index.checked_sub(1) else {
            return Group::Block { expression: false };
        };
        let previous_kind = self.tokens[previous].kind;

        if let Some(open) = self.return_annotation
            && !matches!(
                previous_kind,
                TokenKind::Colon
                    | TokenKind::Pipe
                    | TokenKind::Amp
                    | TokenKind::Lt
                    | TokenKind::Comma
                    | TokenKind::Arrow
            )
        {
            self.return_annotation = None;
            let expression = matches!(
                self.group[open],
                Some(Group::Paren {
                    expression: true,
                    ..
                })
            );
            return Group::Block { expression };
        }

        match previous_kind {
            TokenKind::Arrow => Group::Block { expression: true },
            TokenKind::RParen => match self.partner[previous].and_then(|open| self.group[open]) {
                Some(Group::Paren {
                    function: true,
                    expression,
                    ..
                }) => Group::Block { expression },
                _ => Group::Block { expression: false },
            },
            TokenKind::Colon => match self.last_colon {
                Colon::Ternary => Group::Object,
                Colon::Case => Group::Block { expression: false },
                Colon::AfterParams => Group::TypeBody,
                Colon::Other => match self.container() {
                    Some(Group::Object) => Group::Object,
                    _ if self.dialect.typescript => Group::TypeBody,
                    _ => Group::Object,
                },
            },
            TokenKind::KwElse
            | TokenKind::KwTry
            | TokenKind::KwFinally
            | TokenKind::KwDo
            | TokenKind::Semicolon
            | TokenKind::LBrace
            | TokenKind::RBrace => match self.container() {
                Some(Group::Object) => Group::Object,
                _ => Group::Block { expression: false },
            },
            TokenKind::Ident if self.text(previous) == "static" => {
                Group::Block { expression: false }
            }
            TokenKind::Pipe | TokenKind::Amp | TokenKind::Lt if self.dialect.typescript => {
                Group::TypeBody
            }
            _ if self.tokens[index].newline_before
                && self.container().is_none_or(Group::is_statement_list)
                && !previous_kind.is_binary_operator()
                && !matches!(
                    previous_kind,
                    TokenKind::LParen
                        | TokenKind::LBracket
                        | TokenKind::Comma
                        | TokenKind::KwReturn
                        | TokenKind::Question
                ) =>
            {
                Group::Block { expression: false }
            }
            _ => Group::Object,
        }
    }
}

fn closer_text(opener: TokenKind) -> &'static str {
    match opener {
        TokenKind::LParen => ")",
        TokenKind::LBracket => "]",
        _ => "}",
    }
}

fn closer_text_of_closer(closer: TokenKind) -> &'static str {
    match closer {
        TokenKind::RParen => ")",
        TokenKind::RBracket => "]",
        _ => "}",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn brace_groups(source: &str, dialect: Dialect) -> Vec<Group> {
        let structure = analyze(source, dialect).unwrap();
        structure
            .tokens
            .iter()
            .enumerate()
            .filter(|(_, token)| token.kind == TokenKind::LBrace)
            .filter_map(|(index, _)| structure.group[index])
            .collect()
    }

    #[test]
    fn classifies_braces() {
        let groups = brace_groups(
            "const o = { a: { b: 1 } };\nfunction f(x: { y: number }): void { if (x) { } }",
            Dialect::TS,
        );
        assert_eq!(
            groups,
            vec![
                Group::Object,
                Group::Object,
                Group::TypeBody,
                Group::Block { expression: false },
                Group::Block { expression: false },
            ]
        );
        let groups = brace_groups(
            "interface A { b: { c: string } }\nclass C { m() { } }\nenum E { X }",
            Dialect::TS,
        );
        assert_eq!(
            groups,
            vec![
                Group::TypeBody,
                Group::TypeBody,
                Group::ClassBody,
                Group::Block { expression: false },
                Group::EnumBody,
            ]
        );
    }

    #[test]
    fn arrow_bodies_are_expression_blocks() {
        let groups = brace_groups("const f = (a) => { return a };", Dialect::JS);
        assert_eq!(groups, vec![Group::Block { expression: true }]);
    }

    #[test]
    fn finds_missing_semicolons() {
        let structure = analyze("let x=1\nif (x) {\n  y()\n}\nconst o = {\n  a: 1\n}", Dialect::JS)
            .unwrap();
        let ends: Vec<&str> = structure
            .missing_semicolons()
            .into_iter()
            .map(|index| structure.text(index))
            .collect();
        assert_eq!(ends, vec!["1", ")", "}"]);
    }

    #[test]
    fn continuation_lines_do_not_end_statements() {
        let structure = analyze("const a = b\n  .map(f)\n  .filter(g);", Dialect::JS).unwrap();
        assert!(structure.missing_semicolons().is_empty());
    }

    #[test]
    fn reports_bracket_errors() {
        let error = analyze("function f() {\n  call(1;\n}", Dialect::JS).unwrap_err();
        assert_eq!(error.code, 1005);
        assert_eq!(error.message, "')' expected.");

        let error = analyze("let a = 1;\n}", Dialect::JS).unwrap_err();
        assert_eq!(error.code, 1128);

        let error = analyze("if (a) {", Dialect::JS).unwrap_err();
        assert_eq!(error.message, "'}' expected.");
        assert_eq!(error.offset, 8);
    }

    #[test]
    fn reports_lexical_errors() {
        let error = analyze("const s = 'open", Dialect::JS).unwrap_err();
        assert_eq!(error.code, 1002);
        assert_eq!(error.offset, 10);
    }
}
