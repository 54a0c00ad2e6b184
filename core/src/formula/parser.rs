use nom::{
    branch::alt,
    bytes::complete::take_while1,
    character::complete::{char, multispace0, one_of},
    combinator::{opt, value},
    error::{ErrorKind, ParseError},
    sequence::preceded,
    IResult, Parser,
};

use crate::error::FormulaError;
use crate::formula::ast::{BinaryOp, Expr, UnaryOp};

#[derive(Debug, Clone, PartialEq)]
enum SyntaxErrorKind {
    Nom(ErrorKind),
    UnexpectedEnd,
    UnexpectedCharacter(char),
    UnexpectedToken(char),
    MalformedNumber(String),
    UnterminatedParenthesis,
    TooDeeplyNested,
}

/// Parser error carrying the remaining input at the failure point.
#[derive(Debug, Clone, PartialEq)]
struct SyntaxError<'a> {
    input: &'a str,
    kind: SyntaxErrorKind,
}

impl<'a> SyntaxError<'a> {
    fn into_formula_error(self, formula: &str) -> FormulaError {
        let position = formula.len().saturating_sub(self.input.len());
        match self.kind {
            SyntaxErrorKind::UnexpectedEnd => FormulaError::UnexpectedEnd,
            SyntaxErrorKind::UnexpectedCharacter(found) => {
                FormulaError::UnexpectedCharacter { position, found }
            }
            SyntaxErrorKind::UnexpectedToken(found) => {
                FormulaError::UnexpectedToken { position, found }
            }
            SyntaxErrorKind::MalformedNumber(literal) => {
                FormulaError::MalformedNumber { position, literal }
            }
            SyntaxErrorKind::UnterminatedParenthesis => {
                FormulaError::UnterminatedParenthesis { position }
            }
            SyntaxErrorKind::TooDeeplyNested => FormulaError::TooDeeplyNested { position },
            SyntaxErrorKind::Nom(_) => match self.input.chars().next() {
                Some(found) => FormulaError::UnexpectedCharacter { position, found },
                None => FormulaError::UnexpectedEnd,
            },
        }
    }
}

impl<'a> ParseError<&'a str> for SyntaxError<'a> {
    fn from_error_kind(input: &'a str, kind: ErrorKind) -> Self {
        SyntaxError {
            input,
            kind: SyntaxErrorKind::Nom(kind),
        }
    }

    fn append(_input: &'a str, _kind: ErrorKind, other: Self) -> Self {
        other
    }
}

type ParseResult<'a, O> = IResult<&'a str, O, SyntaxError<'a>>;

/// Parsed sub-expression together with the height of its tree.
type Node = (Expr, usize);

/// Deepest run of parentheses and signs a factor may open.
pub const MAX_NESTING: usize = 64;

/// Tallest expression tree the parser builds, bounding every recursive walk over it.
pub const MAX_HEIGHT: usize = 256;

fn fail(input: &str, kind: SyntaxErrorKind) -> nom::Err<SyntaxError<'_>> {
    nom::Err::Failure(SyntaxError { input, kind })
}

/// True for characters that can begin a token of the formula grammar.
fn is_token_start(c: char) -> bool {
    c.is_ascii_digit() || c.is_ascii_uppercase() || matches!(c, '.' | '+' | '-' | '*' | '/' | '(' | ')')
}

/// Parse a formula string into an AST.
///
/// The whole input must form one expression; anything left over after a
/// complete expression is reported as trailing input.
pub fn parse(formula: &str) -> Result<Expr, FormulaError> {
    if formula.trim().is_empty() {
        return Err(FormulaError::EmptyFormula);
    }

    match parse_expression(formula, 0) {
        Ok((remaining, (expr, _))) => {
            let remaining = remaining.trim_start();
            match remaining.chars().next() {
                None => Ok(expr),
                Some(found) => {
                    let position = formula.len() - remaining.len();
                    if is_token_start(found) {
                        Err(FormulaError::TrailingInput { position, found })
                    } else {
                        Err(FormulaError::UnexpectedCharacter { position, found })
                    }
                }
            }
        }
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => Err(e.into_formula_error(formula)),
        Err(nom::Err::Incomplete(_)) => Err(FormulaError::UnexpectedEnd),
    }
}

fn whitespace(input: &str) -> ParseResult<'_, &str> {
    multispace0(input)
}

fn parse_expression(input: &str, depth: usize) -> ParseResult<'_, Node> {
    let (input, left) = parse_term(input, depth)?;
    parse_binary_chain(input, left, depth, parse_additive_op, parse_term)
}

fn parse_additive_op(input: &str) -> ParseResult<'_, BinaryOp> {
    preceded(
        multispace0,
        alt((
            value(BinaryOp::Add, char('+')),
            value(BinaryOp::Sub, char('-')),
        )),
    )
    .parse(input)
}

fn parse_term(input: &str, depth: usize) -> ParseResult<'_, Node> {
    let (input, left) = parse_factor(input, depth)?;
    parse_binary_chain(input, left, depth, parse_multiplicative_op, parse_factor)
}

fn parse_multiplicative_op(input: &str) -> ParseResult<'_, BinaryOp> {
    preceded(
        multispace0,
        alt((
            value(BinaryOp::Mul, char('*')),
            value(BinaryOp::Div, char('/')),
        )),
    )
    .parse(input)
}

fn parse_binary_chain<'a, F>(
    mut input: &'a str,
    (mut left, mut height): Node,
    depth: usize,
    mut op_parser: F,
    operand_parser: fn(&'a str, usize) -> ParseResult<'a, Node>,
) -> ParseResult<'a, Node>
where
    F: Parser<&'a str, Output = BinaryOp, Error = SyntaxError<'a>>,
{
    loop {
        match op_parser.parse(input) {
            Ok((remaining, op)) => {
                let (remaining, (right, right_height)) = operand_parser(remaining, depth)?;
                height = height.max(right_height) + 1;
                if height > MAX_HEIGHT {
                    return Err(fail(input, SyntaxErrorKind::TooDeeplyNested));
                }
                left = Expr::binary(op, left, right);
                input = remaining;
            }
            Err(nom::Err::Error(_)) => return Ok((input, (left, height))),
            Err(e) => return Err(e),
        }
    }
}

fn parse_sign(input: &str) -> ParseResult<'_, Option<char>> {
    opt(one_of("+-")).parse(input)
}

fn parse_factor(input: &str, depth: usize) -> ParseResult<'_, Node> {
    let (input, _) = whitespace(input)?;
    let (rest, sign) = parse_sign(input)?;

    let op = match sign {
        Some('-') => UnaryOp::Neg,
        Some(_) => UnaryOp::Plus,
        None => return parse_primary(input, depth),
    };
    if depth >= MAX_NESTING {
        return Err(fail(input, SyntaxErrorKind::TooDeeplyNested));
    }
    let (rest, (expr, height)) = parse_factor(rest, depth + 1)?;
    Ok((rest, (Expr::unary(op, expr), height + 1)))
}

fn parse_primary(input: &str, depth: usize) -> ParseResult<'_, Node> {
    match input.chars().next() {
        None => Err(fail(input, SyntaxErrorKind::UnexpectedEnd)),
        Some('(') => parse_parenthesized(input, depth),
        Some(c) if c.is_ascii_digit() || c == '.' => leaf(parse_number(input)),
        Some(c) if c.is_ascii_uppercase() => leaf(parse_variable(input)),
        Some(c) if is_token_start(c) => Err(fail(input, SyntaxErrorKind::UnexpectedToken(c))),
        Some(c) => Err(fail(input, SyntaxErrorKind::UnexpectedCharacter(c))),
    }
}

fn open_paren(input: &str) -> ParseResult<'_, char> {
    char('(').parse(input)
}

fn close_paren(input: &str) -> ParseResult<'_, char> {
    char(')').parse(input)
}

fn leaf(parsed: ParseResult<'_, Expr>) -> ParseResult<'_, Node> {
    parsed.map(|(rest, expr)| (rest, (expr, 1)))
}

fn parse_parenthesized(input: &str, depth: usize) -> ParseResult<'_, Node> {
    if depth >= MAX_NESTING {
        return Err(fail(input, SyntaxErrorKind::TooDeeplyNested));
    }
    let (rest, _) = open_paren(input)?;
    let (rest, expr) = parse_expression(rest, depth + 1)?;
    let (rest, _) = whitespace(rest)?;

    if let Ok((rest, _)) = close_paren(rest) {
        return Ok((rest, expr));
    }

    match rest.chars().next() {
        None => Err(fail(input, SyntaxErrorKind::UnterminatedParenthesis)),
        Some(c) if is_token_start(c) => Err(fail(rest, SyntaxErrorKind::UnexpectedToken(c))),
        Some(c) => Err(fail(rest, SyntaxErrorKind::UnexpectedCharacter(c))),
    }
}

fn parse_number(input: &str) -> ParseResult<'_, Expr> {
    let (rest, literal) = take_while1(|c: char| c.is_ascii_digit() || c == '.').parse(input)?;

    let malformed = || fail(input, SyntaxErrorKind::MalformedNumber(literal.to_string()));
    if literal.matches('.').count() > 1 {
        return Err(malformed());
    }
    let number: f32 = literal.parse().map_err(|_| malformed())?;

    Ok((rest, Expr::Number(number)))
}

fn parse_variable(input: &str) -> ParseResult<'_, Expr> {
    let (rest, name) = take_while1(|c: char| c.is_ascii_uppercase()).parse(input)?;
    Ok((rest, Expr::variable(name)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_number() {
        let expr = parse("42").unwrap();
        assert!(matches!(expr, Expr::Number(n) if (n - 42.0).abs() < f32::EPSILON));

        let expr = parse("3.5").unwrap();
        assert!(matches!(expr, Expr::Number(n) if (n - 3.5).abs() < f32::EPSILON));

        let expr = parse(".5").unwrap();
        assert!(matches!(expr, Expr::Number(n) if (n - 0.5).abs() < f32::EPSILON));

        let expr = parse("-5").unwrap();
        assert!(matches!(
            expr,
            Expr::Unary {
                op: UnaryOp::Neg,
                ..
            }
        ));
    }

    #[test]
    fn test_parse_variable() {
        let expr = parse("L").unwrap();
        assert!(matches!(expr, Expr::Variable(ref s) if s == "L"));

        let expr = parse("HB").unwrap();
        assert!(matches!(expr, Expr::Variable(ref s) if s == "HB"));
    }

    #[test]
    fn test_parse_binary_ops() {
        for (formula, expected) in [
            ("1 + 2", BinaryOp::Add),
            ("L - B", BinaryOp::Sub),
            ("L * 2", BinaryOp::Mul),
            ("H / 2", BinaryOp::Div),
        ] {
            let expr = parse(formula).unwrap();
            assert!(
                matches!(expr, Expr::Binary { op, .. } if op == expected),
                "formula {formula}"
            );
        }
    }

    #[test]
    fn test_parse_precedence() {
        // Multiplication binds tighter than addition
        let expr = parse("1 + 2 * 3").unwrap();
        if let Expr::Binary { op, left, right } = expr {
            assert_eq!(op, BinaryOp::Add);
            assert!(matches!(*left, Expr::Number(_)));
            assert!(matches!(
                *right,
                Expr::Binary {
                    op: BinaryOp::Mul,
                    ..
                }
            ));
        } else {
            panic!("Expected binary expression");
        }
    }

    #[test]
    fn test_parse_left_associative() {
        // 10 - 4 - 3 must group as (10 - 4) - 3
        let expr = parse("10 - 4 - 3").unwrap();
        if let Expr::Binary { op, left, right } = expr {
            assert_eq!(op, BinaryOp::Sub);
            assert!(matches!(
                *left,
                Expr::Binary {
                    op: BinaryOp::Sub,
                    ..
                }
            ));
            assert!(matches!(*right, Expr::Number(n) if (n - 3.0).abs() < f32::EPSILON));
        } else {
            panic!("Expected binary expression");
        }
    }

    #[test]
    fn test_parse_parentheses() {
        let expr = parse("(L+6)/2").unwrap();
        if let Expr::Binary { op, left, .. } = expr {
            assert_eq!(op, BinaryOp::Div);
            assert!(matches!(
                *left,
                Expr::Binary {
                    op: BinaryOp::Add,
                    ..
                }
            ));
        } else {
            panic!("Expected binary expression");
        }
    }

    #[test]
    fn test_parse_empty() {
        assert!(matches!(parse(""), Err(FormulaError::EmptyFormula)));
        assert!(matches!(parse("   "), Err(FormulaError::EmptyFormula)));
    }

    #[test]
    fn test_parse_unexpected_character() {
        assert_eq!(
            parse("L + $"),
            Err(FormulaError::UnexpectedCharacter {
                position: 4,
                found: '$'
            })
        );
        assert_eq!(
            parse("l + 1"),
            Err(FormulaError::UnexpectedCharacter {
                position: 0,
                found: 'l'
            })
        );
    }

    #[test]
    fn test_parse_missing_operand() {
        assert_eq!(parse("1 +"), Err(FormulaError::UnexpectedEnd));
        assert_eq!(
            parse("* 3"),
            Err(FormulaError::UnexpectedToken {
                position: 0,
                found: '*'
            })
        );
        assert_eq!(
            parse("()"),
            Err(FormulaError::UnexpectedToken {
                position: 1,
                found: ')'
            })
        );
    }

    #[test]
    fn test_parse_malformed_number() {
        assert_eq!(
            parse("1.2.3 + L"),
            Err(FormulaError::MalformedNumber {
                position: 0,
                literal: "1.2.3".to_string()
            })
        );
        assert_eq!(
            parse("L + ."),
            Err(FormulaError::MalformedNumber {
                position: 4,
                literal: ".".to_string()
            })
        );
    }

    #[test]
    fn test_parse_unterminated_parenthesis() {
        assert_eq!(
            parse("(3+4"),
            Err(FormulaError::UnterminatedParenthesis { position: 0 })
        );
        assert_eq!(
            parse("2 * ((1 + 2)"),
            Err(FormulaError::UnterminatedParenthesis { position: 4 })
        );
    }

    #[test]
    fn test_parse_deep_nesting_is_an_error() {
        let n = 10_000;
        let parens = format!("{}1{}", "(".repeat(n), ")".repeat(n));
        assert_eq!(
            parse(&parens),
            Err(FormulaError::TooDeeplyNested {
                position: MAX_NESTING
            })
        );

        let signs = format!("{}L", "-".repeat(n));
        assert_eq!(
            parse(&signs),
            Err(FormulaError::TooDeeplyNested {
                position: MAX_NESTING
            })
        );

        let mixed = format!("{}1", "-(".repeat(n));
        assert!(matches!(
            parse(&mixed),
            Err(FormulaError::TooDeeplyNested { .. })
        ));
    }

    #[test]
    fn test_parse_nesting_within_limit() {
        let depth = MAX_NESTING - 1;
        let parens = format!("{}L{}", "(".repeat(depth), ")".repeat(depth));
        assert_eq!(parse(&parens), Ok(Expr::variable("L")));

        let signs = format!("{}L", "-".repeat(depth));
        assert!(parse(&signs).is_ok());
    }

    #[test]
    fn test_parse_long_chain_is_bounded() {
        let within = vec!["L"; MAX_HEIGHT].join("+");
        assert!(parse(&within).is_ok());

        let chain = vec!["L"; 10_000].join("+");
        assert!(matches!(
            parse(&chain),
            Err(FormulaError::TooDeeplyNested { .. })
        ));
    }

    #[test]
    fn test_parse_trailing_input() {
        assert_eq!(
            parse("3 4"),
            Err(FormulaError::TrailingInput {
                position: 2,
                found: '4'
            })
        );
        assert_eq!(
            parse("(L+6))"),
            Err(FormulaError::TrailingInput {
                position: 5,
                found: ')'
            })
        );
    }
}
