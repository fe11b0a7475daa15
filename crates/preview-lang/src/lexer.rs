//! Lexer for TypeScript and JavaScript source.
//!
//! Tokens are produced by a `logos` automaton. Two constructs cannot be
//! recognized by a context-free automaton and are resolved here instead:
//! regular expression literals (a `/` in operand position) and, in JSX
//! dialects, whole JSX elements, which are kept as one opaque token.

use logos::Logos;
use text_size::{TextRange, TextSize};

fn lex_block_comment(lex: &mut logos::Lexer<TokenKind>) -> bool {
    let rest = lex.remainder();
    match rest.find("*/") {
        Some(index) => lex.bump(index + 2),
        None => lex.bump(rest.len()),
    }
    true
}

/// All token kinds. Contextual words (`as`, `from`, `of`, `type`, ...) lex
/// as identifiers; only reserved words get their own kind.
#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    // Trivia
    #[regex(r"[ \t\x0B\x0C]+")]
    Whitespace,
    #[regex(r"\r\n|\n|\r")]
    Newline,
    #[regex(r"//[^\r\n]*", allow_greedy = true)]
    LineComment,
    #[token("/*", lex_block_comment)]
    BlockComment,

    // Literals
    #[regex(r"[0-9][0-9_]*(\.[0-9_]*)?([eE][+-]?[0-9_]+)?n?")]
    #[regex(r"\.[0-9][0-9_]*([eE][+-]?[0-9_]+)?")]
    #[regex(r"0[xX][0-9a-fA-F_]+n?")]
    #[regex(r"0[bB][01_]+n?")]
    #[regex(r"0[oO][0-7_]+n?")]
    Number,
    #[regex(r#""([^"\\\r\n]|\\(.|\r?\n))*""#)]
    #[regex(r#"'([^'\\\r\n]|\\(.|\r?\n))*'"#)]
    String,
    #[regex(r"`([^`\\]|\\(.|\r?\n))*`")]
    Template,
    /// Produced by the wrapper, never by the automaton.
    Regex,
    /// Produced by the wrapper, never by the automaton.
    Jsx,

    #[regex(r"[A-Za-z_$][A-Za-z0-9_$]*")]
    Ident,
    #[regex(r"#[A-Za-z_$][A-Za-z0-9_$]*")]
    PrivateName,

    // Reserved words
    #[token("break")]
    KwBreak,
    #[token("case")]
    KwCase,
    #[token("catch")]
    KwCatch,
    #[token("class")]
    KwClass,
    #[token("const")]
    KwConst,
    #[token("continue")]
    KwContinue,
    #[token("debugger")]
    KwDebugger,
    #[token("default")]
    KwDefault,
    #[token("delete")]
    KwDelete,
    #[token("do")]
    KwDo,
    #[token("else")]
    KwElse,
    #[token("enum")]
    KwEnum,
    #[token("export")]
    KwExport,
    #[token("extends")]
    KwExtends,
    #[token("false")]
    KwFalse,
    #[token("finally")]
    KwFinally,
    #[token("for")]
    KwFor,
    #[token("function")]
    KwFunction,
    #[token("if")]
    KwIf,
    #[token("import")]
    KwImport,
    #[token("in")]
    KwIn,
    #[token("instanceof")]
    KwInstanceof,
    #[token("interface")]
    KwInterface,
    #[token("let")]
    KwLet,
    #[token("new")]
    KwNew,
    #[token("null")]
    KwNull,
    #[token("return")]
    KwReturn,
    #[token("super")]
    KwSuper,
    #[token("switch")]
    KwSwitch,
    #[token("this")]
    KwThis,
    #[token("throw")]
    KwThrow,
    #[token("true")]
    KwTrue,
    #[token("try")]
    KwTry,
    #[token("typeof")]
    KwTypeof,
    #[token("var")]
    KwVar,
    #[token("void")]
    KwVoid,
    #[token("while")]
    KwWhile,
    #[token("with")]
    KwWith,
    #[token("yield")]
    KwYield,
    #[token("await")]
    KwAwait,

    // Punctuation
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token(";")]
    Semicolon,
    #[token(",")]
    Comma,
    #[token(".")]
    Dot,
    #[token("...")]
    Ellipsis,
    #[token("?.")]
    QuestionDot,
    #[token("?")]
    Question,
    #[token("??")]
    QuestionQuestion,
    #[token(":")]
    Colon,
    #[token("=>")]
    Arrow,
    #[token("@")]
    At,

    // Operators
    #[token("=")]
    Eq,
    #[token("==")]
    EqEq,
    #[token("===")]
    EqEqEq,
    #[token("!=")]
    NotEq,
    #[token("!==")]
    NotEqEq,
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,
    #[token("<=")]
    LtEq,
    #[token(">=")]
    GtEq,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("**")]
    StarStar,
    #[token("++")]
    PlusPlus,
    #[token("--")]
    MinusMinus,
    #[token("<<")]
    Shl,
    #[token(">>")]
    Shr,
    #[token(">>>")]
    UShr,
    #[token("&")]
    Amp,
    #[token("|")]
    Pipe,
    #[token("^")]
    Caret,
    #[token("!")]
    Bang,
    #[token("~")]
    Tilde,
    #[token("&&")]
    AmpAmp,
    #[token("||")]
    PipePipe,
    #[token("+=")]
    PlusEq,
    #[token("-=")]
    MinusEq,
    #[token("*=")]
    StarEq,
    #[token("/=")]
    SlashEq,
    #[token("%=")]
    PercentEq,
    #[token("**=")]
    StarStarEq,
    #[token("<<=")]
    ShlEq,
    #[token(">>=")]
    ShrEq,
    #[token(">>>=")]
    UShrEq,
    #[token("&=")]
    AmpEq,
    #[token("|=")]
    PipeEq,
    #[token("^=")]
    CaretEq,
    #[token("&&=")]
    AmpAmpEq,
    #[token("||=")]
    PipePipeEq,
    #[token("??=")]
    QuestionQuestionEq,

    // Errors
    #[regex(r#""([^"\\\r\n]|\\(.|\r?\n))*"#)]
    #[regex(r#"'([^'\\\r\n]|\\(.|\r?\n))*"#)]
    UnterminatedString,
    #[regex(r"`([^`\\]|\\(.|\r?\n))*")]
    UnterminatedTemplate,
    UnterminatedComment,
    UnterminatedRegex,
    UnterminatedJsx,
    Error,
}

impl TokenKind {
    pub fn is_trivia(self) -> bool {
        matches!(
            self,
            Self::Whitespace | Self::Newline | Self::LineComment | Self::BlockComment
        )
    }

    pub fn is_comment(self) -> bool {
        matches!(self, Self::LineComment | Self::BlockComment)
    }

    pub fn is_error(self) -> bool {
        matches!(
            self,
            Self::UnterminatedString
                | Self::UnterminatedTemplate
                | Self::UnterminatedComment
                | Self::UnterminatedRegex
                | Self::UnterminatedJsx
                | Self::Error
        )
    }

    pub fn is_keyword(self) -> bool {
        matches!(
            self,
            Self::KwBreak
                | Self::KwCase
                | Self::KwCatch
                | Self::KwClass
                | Self::KwConst
                | Self::KwContinue
                | Self::KwDebugger
                | Self::KwDefault
                | Self::KwDelete
                | Self::KwDo
                | Self::KwElse
                | Self::KwEnum
                | Self::KwExport
                | Self::KwExtends
                | Self::KwFalse
                | Self::KwFinally
                | Self::KwFor
                | Self::KwFunction
                | Self::KwIf
                | Self::KwImport
                | Self::KwIn
                | Self::KwInstanceof
                | Self::KwInterface
                | Self::KwLet
                | Self::KwNew
                | Self::KwNull
                | Self::KwReturn
                | Self::KwSuper
                | Self::KwSwitch
                | Self::KwThis
                | Self::KwThrow
                | Self::KwTrue
                | Self::KwTry
                | Self::KwTypeof
                | Self::KwVar
                | Self::KwVoid
                | Self::KwWhile
                | Self::KwWith
                | Self::KwYield
                | Self::KwAwait
        )
    }

    /// Keywords that behave like operands (`this`, `true`, ...).
    pub fn is_value_keyword(self) -> bool {
        matches!(
            self,
            Self::KwThis | Self::KwSuper | Self::KwTrue | Self::KwFalse | Self::KwNull
        )
    }

    pub fn is_literal(self) -> bool {
        matches!(
            self,
            Self::Number | Self::String | Self::Template | Self::Regex | Self::Jsx
        )
    }

    /// Identifier-like or literal tokens that need a space between them.
    pub fn is_word(self) -> bool {
        self == Self::Ident || self == Self::PrivateName || self.is_keyword() || self.is_literal()
    }

    /// Tokens that can end an operand, after which `/` divides and `<`
    /// compares rather than opening a regex or JSX element.
    pub fn ends_operand(self) -> bool {
        matches!(
            self,
            Self::Ident
                | Self::PrivateName
                | Self::RParen
                | Self::RBracket
                | Self::PlusPlus
                | Self::MinusMinus
        ) || self.is_literal()
            || self.is_value_keyword()
    }

    pub fn is_opener(self) -> bool {
        matches!(self, Self::LBrace | Self::LParen | Self::LBracket)
    }

    pub fn is_closer(self) -> bool {
        matches!(self, Self::RBrace | Self::RParen | Self::RBracket)
    }

    pub fn is_assignment(self) -> bool {
        matches!(
            self,
            Self::Eq
                | Self::PlusEq
                | Self::MinusEq
                | Self::StarEq
                | Self::SlashEq
                | Self::PercentEq
                | Self::StarStarEq
                | Self::ShlEq
                | Self::ShrEq
                | Self::UShrEq
                | Self::AmpEq
                | Self::PipeEq
                | Self::CaretEq
                | Self::AmpAmpEq
                | Self::PipePipeEq
                | Self::QuestionQuestionEq
        )
    }

    /// Infix operators, including assignment and `=>`.
    pub fn is_binary_operator(self) -> bool {
        self.is_assignment()
            || matches!(
                self,
                Self::EqEq
                    | Self::EqEqEq
                    | Self::NotEq
                    | Self::NotEqEq
                    | Self::LtEq
                    | Self::GtEq
                    | Self::Plus
                    | Self::Minus
                    | Self::Star
                    | Self::Slash
                    | Self::Percent
                    | Self::StarStar
                    | Self::Shl
                    | Self::Shr
                    | Self::UShr
                    | Self::Amp
                    | Self::Pipe
                    | Self::Caret
                    | Self::AmpAmp
                    | Self::PipePipe
                    | Self::QuestionQuestion
                    | Self::Arrow
            )
    }
}

/// Source flavour, derived from a file extension or a formatter language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dialect {
    pub typescript: bool,
    pub jsx: bool,
}

impl Dialect {
    pub const TS: Self = Self {
        typescript: true,
        jsx: false,
    };
    pub const TSX: Self = Self {
        typescript: true,
        jsx: true,
    };
    pub const JS: Self = Self {
        typescript: false,
        jsx: false,
    };
    pub const JSX: Self = Self {
        typescript: false,
        jsx: true,
    };

    pub fn from_path(path: &str) -> Option<Self> {
        let extension = path.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase())?;
        match extension.as_str() {
            "ts" | "mts" | "cts" => Some(Self::TS),
            "tsx" => Some(Self::TSX),
            "js" | "mjs" | "cjs" => Some(Self::JS),
            "jsx" => Some(Self::JSX),
            _ => None,
        }
    }

    pub fn from_language(language: &str) -> Option<Self> {
        match language.to_ascii_lowercase().as_str() {
            "typescript" | "ts" => Some(Self::TS),
            "tsx" => Some(Self::TSX),
            "javascript" | "js" | "babel" => Some(Self::JS),
            "jsx" => Some(Self::JSX),
            _ => None,
        }
    }
}

/// A token with its byte range in the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub range: TextRange,
}

impl Token {
    pub fn new(kind: TokenKind, range: TextRange) -> Self {
        Self { kind, range }
    }

    pub fn start(&self) -> usize {
        usize::from(self.range.start())
    }

    pub fn end(&self) -> usize {
        usize::from(self.range.end())
    }

    pub fn text<'src>(&self, source: &'src str) -> &'src str {
        &source[self.start()..self.end()]
    }
}

/// Lexer over a source string. Unrecognized input is returned as error
/// kinds rather than aborting.
pub struct Lexer<'src> {
    inner: logos::Lexer<'src, TokenKind>,
    source: &'src str,
    dialect: Dialect,
    previous: Option<TokenKind>,
}

impl<'src> Lexer<'src> {
    pub fn new(source: &'src str, dialect: Dialect) -> Self {
        Self {
            inner: TokenKind::lexer(source),
            source,
            dialect,
            previous: None,
        }
    }

    fn operand_expected(&self) -> bool {
        !self.previous.is_some_and(TokenKind::ends_operand)
    }
}

impl Iterator for Lexer<'_> {
    type Item = Token;

    fn next(&mut self) -> Option<Self::Item> {
        let kind = self.inner.next()?;
        let span = self.inner.span();
        let mut kind = kind.unwrap_or(TokenKind::Error);
        let mut end = span.end;

        match kind {
            TokenKind::BlockComment => {
                let text = &self.source[span.start..span.end];
                if text.len() < 4 || !text.ends_with("*/") {
                    kind = TokenKind::UnterminatedComment;
                }
            }
            TokenKind::Slash | TokenKind::SlashEq if self.operand_expected() => {
                match scan_regex(self.source, span.start) {
                    Some(regex_end) => {
                        self.inner.bump(regex_end - span.end);
                        kind = TokenKind::Regex;
                        end = regex_end;
                    }
                    None => {
                        let line_end = self.source[span.start..]
                            .find(['\r', '\n'])
                            .map_or(self.source.len(), |offset| span.start + offset);
                        self.inner.bump(line_end - span.end);
                        kind = TokenKind::UnterminatedRegex;
                        end = line_end;
                    }
                }
            }
            TokenKind::Lt if self.dialect.jsx && self.operand_expected() => {
                let next = self.source.as_bytes().get(span.end).copied();
                if next.is_some_and(|byte| byte.is_ascii_alphabetic() || byte == b'>') {
                    match scan_jsx(self.source, span.start) {
                        Some(jsx_end) => {
                            self.inner.bump(jsx_end - span.end);
                            kind = TokenKind::Jsx;
                            end = jsx_end;
                        }
                        None => {
                            self.inner.bump(self.source.len() - span.end);
                            kind = TokenKind::UnterminatedJsx;
                            end = self.source.len();
                        }
                    }
                }
            }
            _ => {}
        }

        if !kind.is_trivia() {
            self.previous = Some(kind);
        }

        Some(Token::new(
            kind,
            TextRange::new(offset(span.start), offset(end)),
        ))
    }
}

fn offset(value: usize) -> TextSize {
    TextSize::try_from(value).unwrap_or(TextSize::from(u32::MAX))
}

/// Lex the entire source.
pub fn lex(source: &str, dialect: Dialect) -> Vec<Token> {
    Lexer::new(source, dialect).collect()
}

fn scan_regex(source: &str, start: usize) -> Option<usize> {
    let bytes = source.as_bytes();
    let mut index = start + 1;
    let mut in_class = false;
    while index < bytes.len() {
        match bytes[index] {
            b'\\' => {
                index += 2;
                continue;
            }
            b'\r' | b'\n' => return None,
            b'[' => in_class = true,
            b']' => in_class = false,
            b'/' if !in_class => {
                index += 1;
                while index < bytes.len() && bytes[index].is_ascii_alphabetic() {
                    index += 1;
                }
                return Some(index);
            }
            _ => {}
        }
        index += 1;
    }
    None
}

fn skip_quoted(bytes: &[u8], start: usize) -> Option<usize> {
    let quote = bytes[start];
    let mut index = start + 1;
    while index < bytes.len() {
        match bytes[index] {
            b'\\' => index += 2,
            byte if byte == quote => return Some(index + 1),
            _ => index += 1,
        }
    }
    None
}

fn skip_braces(bytes: &[u8], start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut index = start;
    while index < bytes.len() {
        match bytes[index] {
            b'"' | b'\'' | b'`' => {
                index = skip_quoted(bytes, index)?;
                continue;
            }
            b'{' => depth += 1,
            b'}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(index + 1);
                }
            }
            _ => {}
        }
        index += 1;
    }
    None
}

/// Returns the end offset of the JSX element starting at `start`.
fn scan_jsx(source: &str, start: usize) -> Option<usize> {
    let bytes = source.as_bytes();
    let mut index = start;
    let mut depth = 0usize;
    while index < bytes.len() {
        match bytes[index] {
            b'<' if bytes.get(index + 1) == Some(&b'/') => {
                let close = index + bytes[index..].iter().position(|&byte| byte == b'>')?;
                index = close + 1;
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(index);
                }
            }
            b'<' => {
                let mut cursor = index + 1;
                let mut self_closing = false;
                loop {
                    match bytes.get(cursor)? {
                        b'"' | b'\'' => cursor = skip_quoted(bytes, cursor)?,
                        b'{' => cursor = skip_braces(bytes, cursor)?,
                        b'/' if bytes.get(cursor + 1) == Some(&b'>') => {
                            cursor += 2;
                            self_closing = true;
                            break;
                        }
                        b'>' => {
                            cursor += 1;
                            break;
                        }
                        _ => cursor += 1,
                    }
                }
                index = cursor;
                if self_closing {
                    if depth == 0 {
                        return Some(index);
                    }
                } else {
                    depth += 1;
                }
            }
            b'{' => index = skip_braces(bytes, index)?,
            _ => index += 1,
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str, dialect: Dialect) -> Vec<TokenKind> {
        lex(source, dialect)
            .into_iter()
            .map(|token| token.kind)
            .filter(|kind| !kind.is_trivia())
            .collect()
    }

    #[test]
    fn lexes_declaration() {
        assert_eq!(
            kinds("const n: number = 'x';", Dialect::TS),
            vec![
                TokenKind::KwConst,
                TokenKind::Ident,
                TokenKind::Colon,
                TokenKind::Ident,
                TokenKind::Eq,
                TokenKind::String,
                TokenKind::Semicolon,
            ]
        );
    }

    #[test]
    fn line_comment_stops_at_line_end() {
        let tokens = lex("a // note\r\nb", Dialect::TS);
        let comment = tokens
            .iter()
            .find(|token| token.kind == TokenKind::LineComment)
            .unwrap();
        assert_eq!(usize::from(comment.range.len()), "// note".len());
        assert_eq!(
            kinds("a // note\r\nb", Dialect::TS),
            vec![TokenKind::Ident, TokenKind::Ident]
        );
    }

    #[test]
    fn slash_after_operand_divides_and_otherwise_starts_regex() {
        assert_eq!(
            kinds("a / b", Dialect::JS),
            vec![TokenKind::Ident, TokenKind::Slash, TokenKind::Ident]
        );
        assert_eq!(
            kinds("x = /a'b[/]/g.test(s)", Dialect::JS),
            vec![
                TokenKind::Ident,
                TokenKind::Eq,
                TokenKind::Regex,
                TokenKind::Dot,
                TokenKind::Ident,
                TokenKind::LParen,
                TokenKind::Ident,
                TokenKind::RParen,
            ]
        );
    }

    #[test]
    fn reports_unterminated_literals() {
        assert_eq!(
            kinds("let s = \"abc", Dialect::JS).last(),
            Some(&TokenKind::UnterminatedString)
        );
        assert_eq!(
            kinds("/* open", Dialect::JS),
            vec![TokenKind::UnterminatedComment]
        );
    }

    #[test]
    fn jsx_element_is_one_token() {
        let source = "return <div className=\"a\">Don't {items.map((i) => <b>{i}</b>)}</div>;";
        assert_eq!(
            kinds(source, Dialect::TSX),
            vec![TokenKind::KwReturn, TokenKind::Jsx, TokenKind::Semicolon]
        );
    }

    #[test]
    fn less_than_after_operand_compares_in_jsx_dialect() {
        assert_eq!(
            kinds("a < b", Dialect::TSX),
            vec![TokenKind::Ident, TokenKind::Lt, TokenKind::Ident]
        );
    }

    #[test]
    fn dialect_from_path() {
        assert_eq!(Dialect::from_path("src/App.tsx"), Some(Dialect::TSX));
        assert_eq!(Dialect::from_path("types.d.ts"), Some(Dialect::TS));
        assert_eq!(Dialect::from_path("style.css"), None);
    }
}
