//! S-expression reader.
//!
//! Turns source text into [`Expr`] trees. The grammar is small:
//!
//! - `( ... )` lists and `[ ... ]` vectors
//! - `"..."` strings with `\n \t \r \"` escapes
//! - `:name` keywords, `'form` quotes, `;` line comments
//! - bare tokens are numbers when they look like `[+-]digits[.digits]`,
//!   symbols otherwise

use nom::{
    IResult, Parser,
    bytes::complete::{take_while, take_while1},
    character::complete::{char, digit1, one_of},
    combinator::{all_consuming, opt, recognize},
    error::ErrorKind,
    sequence::{pair, preceded},
};
use std::borrow::Cow;

use crate::ast::Expr;
use crate::{Error, MAX_PARSE_DEPTH, ParseError, ParseErrorKind};

/// Reader options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseConfig {
    /// Produce `Expr::Comment` nodes for `;` comments. When false, comments
    /// are skipped like whitespace.
    pub handle_comments: bool,
}

impl Default for ParseConfig {
    fn default() -> Self {
        ParseConfig {
            handle_comments: true,
        }
    }
}

/// nom error carrying the position and the user-facing classification
#[derive(Debug)]
struct ReaderError<'a> {
    at: &'a str,
    kind: ParseErrorKind,
    message: Cow<'static, str>,
}

impl<'a> nom::error::ParseError<&'a str> for ReaderError<'a> {
    fn from_error_kind(input: &'a str, kind: ErrorKind) -> Self {
        if input.is_empty() {
            ReaderError {
                at: input,
                kind: ParseErrorKind::Incomplete,
                message: "Unexpected end of input".into(),
            }
        } else {
            ReaderError {
                at: input,
                kind: ParseErrorKind::InvalidSyntax,
                message: format!("Invalid syntax ({kind:?})").into(),
            }
        }
    }

    fn append(_: &'a str, _: ErrorKind, other: Self) -> Self {
        other
    }
}

type PResult<'a, T> = IResult<&'a str, T, ReaderError<'a>>;

fn fail<'a, T>(
    at: &'a str,
    kind: ParseErrorKind,
    message: impl Into<Cow<'static, str>>,
) -> PResult<'a, T> {
    Err(nom::Err::Failure(ReaderError {
        at,
        kind,
        message: message.into(),
    }))
}

/// Characters that end a bare token
fn is_separator(c: char) -> bool {
    matches!(
        c,
        ' ' | '\t' | '\n' | '\r' | '(' | ')' | '[' | ']' | '{' | '}' | '"' | '\''
    )
}

fn is_whitespace(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | '\r')
}

/// Skip whitespace, and comments too unless they are produced as forms.
fn skip_trivia(mut input: &str, config: ParseConfig) -> PResult<'_, ()> {
    loop {
        let (rest, _) = take_while(is_whitespace).parse(input)?;
        input = rest;
        if !config.handle_comments && input.starts_with(';') {
            let (rest, _) = parse_comment(input)?;
            input = rest;
            continue;
        }
        return Ok((input, ()));
    }
}

/// Line comment; the trailing newline is consumed, the text is trimmed.
fn parse_comment(input: &str) -> PResult<'_, Expr> {
    let (input, text) = preceded(char(';'), take_while(|c: char| c != '\n')).parse(input)?;
    let (input, _) = opt(char('\n')).parse(input)?;
    Ok((input, Expr::Comment(text.trim().to_owned())))
}

fn is_number_literal(token: &str) -> bool {
    all_consuming(recognize((
        opt(one_of::<_, _, nom::error::Error<&str>>("+-")),
        digit1,
        opt(pair(char('.'), digit1)),
    )))
    .parse(token)
    .is_ok()
}

/// Bare token: number or symbol
fn parse_atom(input: &str) -> PResult<'_, Expr> {
    let (rest, token) = take_while1(|c: char| !is_separator(c)).parse(input)?;
    if is_number_literal(token) {
        Ok((rest, Expr::number(token)))
    } else {
        Ok((rest, Expr::Symbol(token.to_owned())))
    }
}

fn parse_keyword(input: &str) -> PResult<'_, Expr> {
    let (rest, name) = preceded(char(':'), take_while(|c: char| !is_separator(c))).parse(input)?;
    if let Some(pos) = name.find('\\') {
        let at = &input[1 + pos..];
        return fail(
            at,
            ParseErrorKind::InvalidSyntax,
            "Unexpected character '\\' in keyword",
        );
    }
    Ok((rest, Expr::Keyword(name.to_owned())))
}

/// String literal. Unknown escapes keep the backslash and the character.
fn parse_string(input: &str) -> PResult<'_, Expr> {
    let (mut remaining, _) = char('"').parse(input)?;
    let mut text = String::new();

    loop {
        let mut chars = remaining.chars();
        match chars.next() {
            Some('"') => return Ok((chars.as_str(), Expr::String(text))),
            Some('\\') => match chars.next() {
                Some('n') => text.push('\n'),
                Some('t') => text.push('\t'),
                Some('r') => text.push('\r'),
                Some('"') => text.push('"'),
                Some(other) => {
                    text.push('\\');
                    text.push(other);
                }
                None => break,
            },
            Some(ch) => text.push(ch),
            None => break,
        }
        remaining = chars.as_str();
    }

    fail(
        input,
        ParseErrorKind::Incomplete,
        "Unterminated string literal",
    )
}

fn parse_quote(input: &str, config: ParseConfig, depth: usize) -> PResult<'_, Expr> {
    let (input, _) = char('\'').parse(input)?;
    let (input, expr) = parse_form(input, config, depth + 1)?;
    Ok((input, Expr::quote(expr)))
}

/// Elements up to the matching `close`. A different closer is an error.
fn parse_seq(
    input: &str,
    open: char,
    close: char,
    config: ParseConfig,
    depth: usize,
) -> PResult<'_, Vec<Expr>> {
    let (mut input, _) = char(open).parse(input)?;
    let mut items = Vec::new();

    loop {
        let (rest, _) = skip_trivia(input, config)?;
        input = rest;
        match input.chars().next() {
            None => {
                return fail(
                    input,
                    ParseErrorKind::Incomplete,
                    format!("Unclosed '{open}'"),
                );
            }
            Some(c) if c == close => return Ok((&input[1..], items)),
            Some(c @ (')' | ']')) => {
                return fail(
                    input,
                    ParseErrorKind::InvalidSyntax,
                    format!("Mismatched '{c}', expected '{close}'"),
                );
            }
            Some(_) => {
                let (rest, expr) = parse_form(input, config, depth + 1)?;
                items.push(expr);
                input = rest;
            }
        }
    }
}

/// One form, after any leading trivia.
fn parse_form(input: &str, config: ParseConfig, depth: usize) -> PResult<'_, Expr> {
    if depth >= MAX_PARSE_DEPTH {
        return fail(
            input,
            ParseErrorKind::TooDeeplyNested,
            format!("Expression too deeply nested (max depth: {MAX_PARSE_DEPTH})"),
        );
    }

    let (input, _) = skip_trivia(input, config)?;
    match input.chars().next() {
        None => fail(input, ParseErrorKind::Incomplete, "Unexpected end of input"),
        Some('(') => {
            let (rest, items) = parse_seq(input, '(', ')', config, depth)?;
            Ok((rest, Expr::List(items)))
        }
        Some('[') => {
            let (rest, items) = parse_seq(input, '[', ']', config, depth)?;
            Ok((rest, Expr::Vector(items)))
        }
        Some(c @ (')' | ']' | '{' | '}')) => fail(
            input,
            ParseErrorKind::InvalidSyntax,
            format!("Unexpected '{c}'"),
        ),
        Some('"') => parse_string(input),
        Some('\'') => parse_quote(input, config, depth),
        Some(':') => parse_keyword(input),
        Some(';') => parse_comment(input),
        Some(_) => parse_atom(input),
    }
}

/// Convert reader failures to the crate's structured parse error
fn to_error(input: &str, err: nom::Err<ReaderError<'_>>) -> Error {
    match err {
        nom::Err::Error(e) | nom::Err::Failure(e) => {
            let byte_offset = input.len().saturating_sub(e.at.len());
            let offset = input
                .get(..byte_offset)
                .map_or(0, |consumed| consumed.chars().count());
            let found = e.at.chars().next().map(|c| c.to_string());
            ParseError::with_context(e.kind, e.message, input, offset, found).into()
        }
        nom::Err::Incomplete(_) => {
            ParseError::from_message(ParseErrorKind::Incomplete, "Incomplete input").into()
        }
    }
}

/// Parse exactly one form from `input`.
pub fn parse(input: &str) -> Result<Expr, Error> {
    parse_with_config(input, ParseConfig::default())
}

pub fn parse_with_config(input: &str, config: ParseConfig) -> Result<Expr, Error> {
    let (rest, expr) = parse_form(input, config, 0).map_err(|e| to_error(input, e))?;

    // Trailing comments never count as extra content
    let trailing = ParseConfig {
        handle_comments: false,
    };
    let (rest, _) = skip_trivia(rest, trailing).map_err(|e| to_error(input, e))?;
    if rest.is_empty() {
        Ok(expr)
    } else {
        let offset = input.len() - rest.len();
        Err(ParseError::with_context(
            ParseErrorKind::TrailingContent,
            "Unexpected content after expression",
            input,
            input[..offset].chars().count(),
            rest.chars().next().map(|c| c.to_string()),
        )
        .into())
    }
}

/// Parse every form in `input` as one module. Reading stops at the end of
/// input or at an unmatched `)` / `]`.
pub fn parse_module(name: &str, input: &str) -> Result<Expr, Error> {
    parse_module_with_config(name, input, ParseConfig::default())
}

pub fn parse_module_with_config(
    name: &str,
    input: &str,
    config: ParseConfig,
) -> Result<Expr, Error> {
    let mut exprs = Vec::new();
    let mut rest = input;

    loop {
        let (after, _) = skip_trivia(rest, config).map_err(|e| to_error(input, e))?;
        if after.is_empty() || after.starts_with([')', ']']) {
            break;
        }
        let (after, expr) = parse_form(after, config, 0).map_err(|e| to_error(input, e))?;
        exprs.push(expr);
        rest = after;
    }

    Ok(Expr::module(name, exprs))
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::ast::{list, num, sym};

    /// Expected outcome of a parse test case
    #[derive(Debug)]
    enum ParseTestResult {
        Success(Expr),
        SpecificError(ParseErrorKind, &'static str),
    }
    use ParseTestResult::*;

    fn success(expr: Expr) -> ParseTestResult {
        Success(expr)
    }

    fn string(s: &str) -> Expr {
        Expr::String(s.to_owned())
    }

    fn run_parse_tests(test_cases: Vec<(&str, ParseTestResult)>) {
        for (i, (input, expected)) in test_cases.iter().enumerate() {
            let test_id = format!("Parse test #{} ({input:?})", i + 1);
            let result = parse(input);

            match (result, expected) {
                (Ok(actual), Success(expected_expr)) => {
                    assert_eq!(&actual, expected_expr, "{test_id}: value mismatch");

                    // display -> parse -> display should be stable
                    let displayed = actual.to_string();
                    let reparsed = parse(&displayed).unwrap_or_else(|e| {
                        panic!("{test_id}: round-trip parse failed for '{displayed}': {e}")
                    });
                    assert_eq!(&reparsed, expected_expr, "{test_id}: reparsed value");
                    assert_eq!(displayed, reparsed.to_string(), "{test_id}: round trip");
                }
                (Err(Error::ParseError(err)), SpecificError(kind, fragment)) => {
                    assert_eq!(&err.kind, kind, "{test_id}: error kind");
                    assert!(
                        err.message.contains(fragment),
                        "{test_id}: expected '{fragment}' in '{}'",
                        err.message
                    );
                }
                (actual, expected) => {
                    panic!("{test_id}: expected {expected:?}, got {actual:?}")
                }
            }
        }
    }

    #[test]
    fn test_parse_atoms() {
        run_parse_tests(vec![
            ("42", success(num("42"))),
            ("-3.25", success(num("-3.25"))),
            ("+7", success(num("+7"))),
            ("1.", success(sym("1."))),
            (".5", success(sym(".5"))),
            ("1e5", success(sym("1e5"))),
            ("-", success(sym("-"))),
            ("foo.bar", success(sym("foo.bar"))),
            ("  spaced \n", success(sym("spaced"))),
            (":key", success(Expr::Keyword("key".into()))),
            (":", success(Expr::Keyword(String::new()))),
            (
                ":bad\\key",
                SpecificError(ParseErrorKind::InvalidSyntax, "in keyword"),
            ),
        ]);
    }

    #[test]
    fn test_parse_strings() {
        run_parse_tests(vec![
            (r#""hello""#, success(string("hello"))),
            (r#""a\nb\tc\rd""#, success(string("a\nb\tc\rd"))),
            (r#""say \"hi\"""#, success(string("say \"hi\""))),
            (r#""keep \q""#, success(string("keep \\q"))),
            (r#""""#, success(string(""))),
            (
                r#""open"#,
                SpecificError(ParseErrorKind::Incomplete, "Unterminated string"),
            ),
        ]);
    }

    #[test]
    fn test_parse_collections() {
        run_parse_tests(vec![
            ("()", success(list([]))),
            ("(+ 1 2)", success(list([sym("+"), num("1"), num("2")]))),
            (
                "(f [x 1] (g))",
                success(list([
                    sym("f"),
                    Expr::Vector(vec![sym("x"), num("1")]),
                    list([sym("g")]),
                ])),
            ),
            ("(a\"s\")", success(list([sym("a"), string("s")]))),
            ("'x", success(Expr::quote(sym("x")))),
            (
                "'(1 2)",
                success(Expr::quote(list([num("1"), num("2")]))),
            ),
            ("(1 2", SpecificError(ParseErrorKind::Incomplete, "Unclosed '('")),
            ("[1 2)", SpecificError(ParseErrorKind::InvalidSyntax, "Mismatched ')'")),
            ("{}", SpecificError(ParseErrorKind::InvalidSyntax, "Unexpected '{'")),
            ("'", SpecificError(ParseErrorKind::Incomplete, "end of input")),
            ("", SpecificError(ParseErrorKind::Incomplete, "end of input")),
            ("1 2", SpecificError(ParseErrorKind::TrailingContent, "after expression")),
        ]);
    }

    #[test]
    fn test_comments() {
        run_parse_tests(vec![
            (";  a note  \n", success(Expr::Comment("a note".into()))),
            ("x ; trailing", success(sym("x"))),
            (
                "(f ; inside\n 1)",
                success(list([sym("f"), Expr::Comment("inside".into()), num("1")])),
            ),
            (
                "[1 ;; last ]\n]",
                success(Expr::Vector(vec![num("1"), Expr::Comment("; last ]".into())])),
            ),
            (
                "'(a ; b\n)",
                success(Expr::quote(list([sym("a"), Expr::Comment("b".into())]))),
            ),
        ]);

        let skipping = ParseConfig {
            handle_comments: false,
        };
        assert_eq!(
            parse_with_config("; skipped\n(f ; inside\n 1)", skipping).unwrap(),
            list([sym("f"), num("1")])
        );
    }

    #[test]
    fn test_parse_module() {
        let module = parse_module("main", "(def) 1\n:k ) ignored (").unwrap();
        assert_eq!(
            module,
            Expr::module(
                "main",
                vec![list([sym("def")]), num("1"), Expr::Keyword("k".into())]
            )
        );

        assert_eq!(parse_module("empty", "  ").unwrap(), Expr::module("empty", vec![]));
        assert!(matches!(
            parse_module("bad", "1 (2"),
            Err(Error::ParseError(ParseError { kind: ParseErrorKind::Incomplete, .. }))
        ));
    }

    #[test]
    fn test_depth_limit() {
        let deep = format!("{}{}", "(".repeat(MAX_PARSE_DEPTH + 1), ")".repeat(MAX_PARSE_DEPTH + 1));
        let err = parse(&deep).unwrap_err();
        assert!(matches!(
            err,
            Error::ParseError(ParseError { kind: ParseErrorKind::TooDeeplyNested, .. })
        ));

        let ok = format!("{}{}", "(".repeat(MAX_PARSE_DEPTH), ")".repeat(MAX_PARSE_DEPTH));
        assert!(parse(&ok).is_ok());
    }

    #[test]
    fn test_error_context() {
        let Err(Error::ParseError(err)) = parse("(a b ]") else {
            panic!("expected parse error");
        };
        assert_eq!(err.found.as_deref(), Some("]"));
        assert_eq!(err.context.as_deref(), Some("(a b ]"));
    }
}
