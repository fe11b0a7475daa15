//! The small type lattice the checker reasons about.
//!
//! Anything outside it is `Opaque`, which is assignable in both directions,
//! so unsupported constructs never produce diagnostics.

use std::fmt;

use crate::lexer::TokenKind;
use crate::syntax::Structure;

#[derive(Debug, Clone, PartialEq)]
pub enum Ty {
    Any,
    Unknown,
    Never,
    Void,
    Undefined,
    Null,
    Number,
    String,
    Boolean,
    BigInt,
    Symbol,
    Object,
    StringLit(String),
    NumberLit(f64),
    BooleanLit(bool),
    Array(Box<Ty>),
    Union(Vec<Ty>),
    /// A named type the checker does not model (interfaces, classes, ...).
    Named(String),
    Opaque,
}

impl Ty {
    /// Literal types widened to their primitive.
    pub fn widened(&self) -> Ty {
        match self {
            Self::StringLit(_) => Self::String,
            Self::NumberLit(_) => Self::Number,
            Self::BooleanLit(_) => Self::Boolean,
            Self::Array(element) => Self::Array(Box::new(element.widened())),
            Self::Union(members) => union(members.iter().map(Ty::widened).collect()),
            other => other.clone(),
        }
    }

    pub fn is_opaque(&self) -> bool {
        match self {
            Self::Opaque | Self::Named(_) | Self::Any | Self::Unknown => true,
            Self::Array(element) => element.is_opaque(),
            Self::Union(members) => members.iter().any(Ty::is_opaque),
            _ => false,
        }
    }

    pub fn contains_literal(&self) -> bool {
        match self {
            Self::StringLit(_) | Self::NumberLit(_) | Self::BooleanLit(_) => true,
            Self::Union(members) => members.iter().any(Ty::contains_literal),
            Self::Array(element) => element.contains_literal(),
            _ => false,
        }
    }
}

/// Builds a union, flattening nested unions and dropping duplicates.
pub fn union(members: Vec<Ty>) -> Ty {
    let mut flat: Vec<Ty> = Vec::new();
    for member in members {
        let parts = match member {
            Ty::Union(inner) => inner,
            other => vec![other],
        };
        for part in parts {
            if !flat.contains(&part) {
                flat.push(part);
            }
        }
    }
    if flat.len() == 1 {
        flat.pop().unwrap_or(Ty::Never)
    } else if flat.is_empty() {
        Ty::Never
    } else {
        Ty::Union(flat)
    }
}

impl fmt::Display for Ty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("any"),
            Self::Unknown => f.write_str("unknown"),
            Self::Never => f.write_str("never"),
            Self::Void => f.write_str("void"),
            Self::Undefined => f.write_str("undefined"),
            Self::Null => f.write_str("null"),
            Self::Number => f.write_str("number"),
            Self::String => f.write_str("string"),
            Self::Boolean => f.write_str("boolean"),
            Self::BigInt => f.write_str("bigint"),
            Self::Symbol => f.write_str("symbol"),
            Self::Object => f.write_str("object"),
            Self::StringLit(value) => write!(f, "\"{value}\""),
            Self::NumberLit(value) => write!(f, "{value}"),
            Self::BooleanLit(value) => write!(f, "{value}"),
            Self::Array(element) => match element.as_ref() {
                Self::Union(_) => write!(f, "({element})[]"),
                _ => write!(f, "{element}[]"),
            },
            Self::Union(members) => {
                for (index, member) in members.iter().enumerate() {
                    if index > 0 {
                        f.write_str(" | ")?;
                    }
                    write!(f, "{member}")?;
                }
                Ok(())
            }
            Self::Named(name) => f.write_str(name),
            Self::Opaque => f.write_str("any"),
        }
    }
}

/// Whether a value of type `source` can be assigned to `target`.
pub fn is_assignable(source: &Ty, target: &Ty, strict_null_checks: bool) -> bool {
    if source.is_opaque() || target.is_opaque() || matches!(source, Ty::Never) {
        return true;
    }
    if let Ty::Union(members) = source {
        return members
            .iter()
            .all(|member| is_assignable(member, target, strict_null_checks));
    }
    if let Ty::Union(members) = target {
        let both_booleans = members.contains(&Ty::BooleanLit(true))
            && members.contains(&Ty::BooleanLit(false));
        return (matches!(source, Ty::Boolean) && both_booleans)
            || members
                .iter()
                .any(|member| is_assignable(source, member, strict_null_checks));
    }
    match (source, target) {
        (Ty::Null | Ty::Undefined, _) if !strict_null_checks => true,
        (Ty::Undefined, Ty::Void) => true,
        (Ty::StringLit(_), Ty::String)
        | (Ty::NumberLit(_), Ty::Number)
        | (Ty::BooleanLit(_), Ty::Boolean) => true,
        (Ty::Array(source), Ty::Array(target)) => {
            is_assignable(source, target, strict_null_checks)
        }
        (Ty::Array(_), Ty::Object) => true,
        (source, target) => source == target,
    }
}

/// Parses the type annotation occupying tokens `start..end`.
pub fn parse_type(structure: &Structure<'_>, start: usize, end: usize) -> Ty {
    let mut parser = TypeParser {
        structure,
        cursor: start,
        end,
    };
    let ty = parser.union();
    if parser.cursor == end { ty } else { Ty::Opaque }
}

struct TypeParser<'a, 'src> {
    structure: &'a Structure<'src>,
    cursor: usize,
    end: usize,
}

impl TypeParser<'_, '_> {
    fn peek(&self) -> Option<TokenKind> {
        (self.cursor < self.end)
            .then(|| self.structure.kind(self.cursor))
            .flatten()
    }

    fn union(&mut self) -> Ty {
        if self.peek() == Some(TokenKind::Pipe) {
            self.cursor += 1;
        }
        let mut members = vec![self.postfix()];
        while self.peek() == Some(TokenKind::Pipe) {
            self.cursor += 1;
            members.push(self.postfix());
        }
        if self.peek() == Some(TokenKind::Amp) {
            self.cursor = self.end;
            return Ty::Opaque;
        }
        union(members)
    }

    fn postfix(&mut self) -> Ty {
        let mut ty = self.primary();
        while self.peek() == Some(TokenKind::LBracket)
            && self.structure.kind(self.cursor + 1) == Some(TokenKind::RBracket)
        {
            self.cursor += 2;
            ty = Ty::Array(Box::new(ty));
        }
        ty
    }

    fn skip_group(&mut self) {
        self.cursor = self.structure.partner[self.cursor].map_or(self.end, |close| close + 1);
    }

    fn primary(&mut self) -> Ty {
        let Some(kind) = self.peek() else {
            return Ty::Opaque;
        };
        let index = self.cursor;
        self.cursor += 1;
        match kind {
            TokenKind::KwNull => Ty::Null,
            TokenKind::KwVoid => Ty::Void,
            TokenKind::KwTrue => Ty::BooleanLit(true),
            TokenKind::KwFalse => Ty::BooleanLit(false),
            TokenKind::String => Ty::StringLit(string_value(self.structure.text(index))),
            TokenKind::Number => number_value(self.structure.text(index))
                .map_or(Ty::Number, Ty::NumberLit),
            TokenKind::LParen => {
                let close = self.structure.partner[index].unwrap_or(self.end);
                let arrow = self.structure.kind(close + 1) == Some(TokenKind::Arrow);
                if arrow {
                    self.cursor = self.end;
                    return Ty::Opaque;
                }
                let inner = parse_type(self.structure, index + 1, close);
                self.cursor = close + 1;
                inner
            }
            TokenKind::LBrace | TokenKind::LBracket => {
                self.cursor = index;
                self.skip_group();
                Ty::Opaque
            }
            TokenKind::KwTypeof | TokenKind::KwNew => {
                self.cursor = self.end;
                Ty::Opaque
            }
            TokenKind::Ident => self.named(index),
            _ => Ty::Opaque,
        }
    }

    fn named(&mut self, index: usize) -> Ty {
        let mut name = self.structure.text(index).to_string();
        while self.peek() == Some(TokenKind::Dot)
            && self.structure.kind(self.cursor + 1) == Some(TokenKind::Ident)
        {
            name.push('.');
            name.push_str(self.structure.text(self.cursor + 1));
            self.cursor += 2;
        }
        let arguments = self.type_arguments();
        match (name.as_str(), arguments.as_slice()) {
            ("number", []) => Ty::Number,
            ("string", []) => Ty::String,
            ("boolean", []) => Ty::Boolean,
            ("any", []) => Ty::Any,
            ("unknown", []) => Ty::Unknown,
            ("never", []) => Ty::Never,
            ("undefined", []) => Ty::Undefined,
            ("object", []) => Ty::Object,
            ("bigint", []) => Ty::BigInt,
            ("symbol", []) => Ty::Symbol,
            ("Array" | "ReadonlyArray", [element]) => Ty::Array(Box::new(element.clone())),
            ("keyof" | "readonly" | "unique" | "infer" | "asserts", _) => {
                self.cursor = self.end;
                Ty::Opaque
            }
            _ => Ty::Named(name),
        }
    }

    /// `<A, B>` after a type name. A closer glued into `>>` ends the list
    /// with an opaque last argument.
    fn type_arguments(&mut self) -> Vec<Ty> {
        if self.peek() != Some(TokenKind::Lt) {
            return Vec::new();
        }
        let mut arguments = Vec::new();
        let mut depth = 0usize;
        let mut start = self.cursor + 1;
        let mut cursor = self.cursor;
        while cursor < self.end {
            match self.structure.kind(cursor) {
                Some(TokenKind::Lt) => depth += 1,
                Some(TokenKind::Comma) if depth == 1 => {
                    arguments.push(parse_type(self.structure, start, cursor));
                    start = cursor + 1;
                }
                Some(kind @ (TokenKind::Gt | TokenKind::Shr | TokenKind::UShr)) => {
                    let closes = match kind {
                        TokenKind::Gt => 1,
                        TokenKind::Shr => 2,
                        _ => 3,
                    };
                    depth = depth.saturating_sub(closes);
                    if depth == 0 {
                        arguments.push(parse_type(self.structure, start, cursor));
                        self.cursor = cursor + 1;
                        return arguments;
                    }
                }
                Some(kind) if kind.is_opener() => {
                    cursor = self.structure.partner[cursor].unwrap_or(self.end);
                }
                _ => {}
            }
            cursor += 1;
        }
        self.cursor = self.end;
        vec![Ty::Opaque]
    }
}

/// Content of a string literal token, unescaping quotes.
pub fn string_value(literal: &str) -> String {
    if literal.len() < 2 {
        return String::new();
    }
    let quote = &literal[..1];
    literal[1..literal.len() - 1].replace(&format!("\\{quote}"), quote)
}

pub fn number_value(literal: &str) -> Option<f64> {
    let cleaned = literal.replace('_', "");
    if let Some(hex) = cleaned.strip_prefix("0x").or_else(|| cleaned.strip_prefix("0X")) {
        return u64::from_str_radix(hex, 16).ok().map(|value| value as f64);
    }
    if cleaned.ends_with('n') {
        return None;
    }
    cleaned.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Dialect;
    use crate::syntax::analyze;

    fn parse(source: &str) -> Ty {
        let structure = analyze(source, Dialect::TS).unwrap();
        parse_type(&structure, 0, structure.len())
    }

    #[test]
    fn parses_primitives_arrays_and_unions() {
        assert_eq!(parse("number"), Ty::Number);
        assert_eq!(parse("string[]"), Ty::Array(Box::new(Ty::String)));
        assert_eq!(parse("Array<boolean>"), Ty::Array(Box::new(Ty::Boolean)));
        assert_eq!(
            parse("'a' | 'b' | null"),
            Ty::Union(vec![
                Ty::StringLit("a".into()),
                Ty::StringLit("b".into()),
                Ty::Null
            ])
        );
        assert_eq!(parse("Map<string, Array<number>>"), Ty::Named("Map".into()));
        assert_eq!(parse("{ a: number }"), Ty::Opaque);
        assert_eq!(parse("(a: number) => void"), Ty::Opaque);
    }

    #[test]
    fn assignability() {
        let strict = true;
        assert!(is_assignable(&Ty::StringLit("x".into()), &Ty::String, strict));
        assert!(!is_assignable(&Ty::StringLit("x".into()), &Ty::Number, strict));
        assert!(!is_assignable(&Ty::Null, &Ty::Number, strict));
        assert!(is_assignable(&Ty::Null, &Ty::Number, false));
        assert!(is_assignable(
            &Ty::NumberLit(1.0),
            &Ty::Union(vec![Ty::String, Ty::Number]),
            strict
        ));
        assert!(is_assignable(&Ty::Named("Foo".into()), &Ty::Number, strict));
        assert!(!is_assignable(
            &Ty::Array(Box::new(Ty::String)),
            &Ty::Array(Box::new(Ty::Number)),
            strict
        ));
    }

    #[test]
    fn displays_like_tsc() {
        assert_eq!(Ty::StringLit("x".into()).to_string(), "\"x\"");
        assert_eq!(
            Ty::Array(Box::new(Ty::Union(vec![Ty::String, Ty::Number]))).to_string(),
            "(string | number)[]"
        );
    }
}
