//! Arithmetic calculator tool
//!
//! Parses a single-line expression with nom into a small AST and evaluates
//! it. Supports `+ - * / % ** ^`, unary signs, parentheses, the constants
//! `pi` and `e`, and a handful of one-argument functions.

use crate::error::OrchestrationError;
use crate::models::{ToolInput, ToolOutput};
use crate::tools::{require_str, Tool};
use crate::Result;
use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::{alpha1, alphanumeric0, char, digit0, digit1, multispace0, one_of},
    combinator::{all_consuming, map, map_res, opt, recognize},
    multi::many0,
    sequence::{delimited, pair, preceded, tuple},
    IResult,
};
use serde_json::{json, Value};

const MAX_EXPRESSION_LEN: usize = 1024;
const MAX_NESTING: usize = 64;

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Num(f64),
    Ident(String),
    Call(String, Box<Expr>),
    Neg(Box<Expr>),
    Binary(Op, Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Op {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Pow,
}

// ============================================================================
// Nom Parser Combinators
// ============================================================================

fn ws<'a, O, F>(inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O>
where
    F: FnMut(&'a str) -> IResult<&'a str, O>,
{
    delimited(multispace0, inner, multispace0)
}

/// 12, 12.5, .5, 1e-3
fn number(input: &str) -> IResult<&str, Expr> {
    map_res(
        recognize(pair(
            alt((
                recognize(pair(digit1, opt(pair(char('.'), digit0)))),
                recognize(pair(char('.'), digit1)),
            )),
            opt(tuple((one_of("eE"), opt(one_of("+-")), digit1))),
        )),
        |s: &str| s.parse::<f64>().map(Expr::Num),
    )(input)
}

fn identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(alpha1, alphanumeric0))(input)
}

/// `pi`, or `sqrt(<expr>)`
fn call_or_ident(input: &str) -> IResult<&str, Expr> {
    let (input, name) = identifier(input)?;
    let (input, arg) = opt(delimited(ws(char('(')), expr, char(')')))(input)?;

    let name = name.to_lowercase();
    let node = match arg {
        Some(arg) => Expr::Call(name, Box::new(arg)),
        None => Expr::Ident(name),
    };
    Ok((input, node))
}

fn atom(input: &str) -> IResult<&str, Expr> {
    ws(alt((
        number,
        call_or_ident,
        delimited(char('('), expr, char(')')),
    )))(input)
}

/// Leading signs; true when they negate
fn signs(input: &str) -> IResult<&str, bool> {
    map(many0(ws(one_of("+-"))), |signs: Vec<char>| {
        signs.iter().filter(|&&c| c == '-').count() % 2 == 1
    })(input)
}

fn negate_if(negative: bool, node: Expr) -> Expr {
    if negative {
        Expr::Neg(Box::new(node))
    } else {
        node
    }
}

/// Right-associative, binds tighter than unary minus: -2**2 == -4
fn power(input: &str) -> IResult<&str, Expr> {
    let (input, base) = atom(input)?;
    let (input, exponents) = many0(preceded(
        ws(alt((tag("**"), tag("^")))),
        pair(signs, atom),
    ))(input)?;

    // a ^ -b ^ c == a ^ (-(b ^ c))
    let exponent = exponents
        .into_iter()
        .rev()
        .fold(None, |acc: Option<Expr>, (negative, operand)| {
            let node = match acc {
                Some(rhs) => Expr::Binary(Op::Pow, Box::new(operand), Box::new(rhs)),
                None => operand,
            };
            Some(negate_if(negative, node))
        });

    let node = match exponent {
        Some(exponent) => Expr::Binary(Op::Pow, Box::new(base), Box::new(exponent)),
        None => base,
    };
    Ok((input, node))
}

fn unary(input: &str) -> IResult<&str, Expr> {
    let (input, negative) = signs(input)?;
    let (input, node) = power(input)?;
    Ok((input, negate_if(negative, node)))
}

fn fold(first: Expr, rest: Vec<(Op, Expr)>) -> Expr {
    rest.into_iter().fold(first, |acc, (op, rhs)| {
        Expr::Binary(op, Box::new(acc), Box::new(rhs))
    })
}

fn term(input: &str) -> IResult<&str, Expr> {
    let (input, first) = unary(input)?;
    let (input, rest) = many0(pair(
        ws(alt((
            map(char('*'), |_| Op::Mul),
            map(char('/'), |_| Op::Div),
            map(char('%'), |_| Op::Rem),
        ))),
        unary,
    ))(input)?;
    Ok((input, fold(first, rest)))
}

fn expr(input: &str) -> IResult<&str, Expr> {
    let (input, first) = term(input)?;
    let (input, rest) = many0(pair(
        ws(alt((map(char('+'), |_| Op::Add), map(char('-'), |_| Op::Sub)))),
        term,
    ))(input)?;
    Ok((input, fold(first, rest)))
}

fn parse_expression(source: &str) -> std::result::Result<Expr, String> {
    all_consuming(expr)(source)
        .map(|(_, parsed)| parsed)
        .map_err(|e| format!("Could not parse expression '{}': {}", source, e))
}

// ============================================================================
// Evaluation
// ============================================================================

fn eval(node: &Expr) -> std::result::Result<f64, String> {
    match node {
        Expr::Num(value) => Ok(*value),
        Expr::Ident(name) => match name.as_str() {
            "pi" => Ok(std::f64::consts::PI),
            "e" => Ok(std::f64::consts::E),
            other => Err(format!("Unknown constant '{}'", other)),
        },
        Expr::Call(name, arg) => {
            let x = eval(arg)?;
            match name.as_str() {
                "sqrt" if x < 0.0 => Err("Square root of a negative number".to_string()),
                "sqrt" => Ok(x.sqrt()),
                "ln" | "log" | "log10" if x <= 0.0 => {
                    Err("Logarithm of a non-positive number".to_string())
                }
                "ln" | "log" => Ok(x.ln()),
                "log10" => Ok(x.log10()),
                "exp" => Ok(x.exp()),
                "abs" => Ok(x.abs()),
                "sin" => Ok(x.sin()),
                "cos" => Ok(x.cos()),
                "tan" => Ok(x.tan()),
                "floor" => Ok(x.floor()),
                "ceil" => Ok(x.ceil()),
                "round" => Ok(x.round()),
                other => Err(format!("Unknown function '{}'", other)),
            }
        }
        Expr::Neg(inner) => Ok(-eval(inner)?),
        Expr::Binary(op, lhs, rhs) => {
            let a = eval(lhs)?;
            let b = eval(rhs)?;
            match op {
                Op::Div | Op::Rem if b == 0.0 => Err("Division by zero".to_string()),
                Op::Add => Ok(a + b),
                Op::Sub => Ok(a - b),
                Op::Mul => Ok(a * b),
                Op::Div => Ok(a / b),
                Op::Rem => Ok(a % b),
                Op::Pow => Ok(a.powf(b)),
            }
        }
    }
}

/// Bound input size and parenthesis depth before the recursive parser runs.
fn check_shape(source: &str) -> Result<()> {
    if source.len() > MAX_EXPRESSION_LEN {
        return Err(OrchestrationError::InvalidToolInput(format!(
            "Expression is longer than {} characters",
            MAX_EXPRESSION_LEN
        )));
    }

    let mut depth = 0usize;
    for c in source.chars() {
        match c {
            '(' => {
                depth += 1;
                if depth > MAX_NESTING {
                    return Err(OrchestrationError::InvalidToolInput(format!(
                        "Expression nests parentheses deeper than {} levels",
                        MAX_NESTING
                    )));
                }
            }
            ')' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }

    Ok(())
}

/// Evaluate an expression such as `"37593 * 67"` or `"sin(pi/4)"`.
pub fn evaluate(source: &str) -> Result<f64> {
    let source = source.trim();
    if source.is_empty() {
        return Err(OrchestrationError::InvalidToolInput(
            "Expression is empty".to_string(),
        ));
    }

    check_shape(source)?;

    let parsed = parse_expression(source).map_err(OrchestrationError::InvalidToolInput)?;
    let value = eval(&parsed).map_err(OrchestrationError::ToolError)?;

    if !value.is_finite() {
        return Err(OrchestrationError::ToolError(format!(
            "Expression '{}' does not have a finite value",
            source
        )));
    }

    Ok(value)
}

/// Integral values print without a trailing ".0"
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

pub struct CalculatorTool;

#[async_trait::async_trait]
impl Tool for CalculatorTool {
    fn name(&self) -> &'static str {
        "calculator"
    }

    fn description(&self) -> &'static str {
        "Evaluate a single-line math expression, e.g. \"37593 * 67\", \"37593**(1/5)\" or \"sin(pi/4)\""
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "expression": {"type": "string", "description": "A single-line mathematical expression"}
            },
            "required": ["expression"]
        })
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
        let expression = require_str(input, "expression")?;
        let value = evaluate(&expression)?;

        Ok(ToolOutput::ok(json!({
            "expression": expression,
            "result": format_number(value),
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(source: &str) -> f64 {
        evaluate(source).unwrap()
    }

    #[test]
    fn test_basic_arithmetic() {
        assert_eq!(approx("37593 * 67"), 2_518_731.0);
        assert_eq!(approx("(1 + 2) * 3"), 9.0);
        assert_eq!(approx("10 % 3"), 1.0);
        assert_eq!(approx("7 - 2 - 1"), 4.0);
        assert_eq!(approx("1.5e2 / 3"), 50.0);
        assert_eq!(approx(".5 + .25"), 0.75);
    }

    #[test]
    fn test_power_precedence() {
        assert_eq!(approx("-2**2"), -4.0);
        assert_eq!(approx("2^3^2"), 512.0);
        assert_eq!(approx("2 ** -1"), 0.5);
        assert!((approx("37593**(1/5)") - 8.2141).abs() < 1e-3);
    }

    #[test]
    fn test_functions_and_constants() {
        assert!((approx("sin(pi/4)") - std::f64::consts::FRAC_1_SQRT_2).abs() < 1e-12);
        assert!((approx("ln(e)") - 1.0).abs() < 1e-12);
        assert_eq!(approx("sqrt(16) + abs(-4)"), 8.0);
        assert_eq!(approx("round(2.6)"), 3.0);
    }

    #[test]
    fn test_errors() {
        assert!(matches!(evaluate("1 / 0"), Err(OrchestrationError::ToolError(_))));
        assert!(matches!(evaluate("2 +"), Err(OrchestrationError::InvalidToolInput(_))));
        assert!(matches!(evaluate("foo(2)"), Err(OrchestrationError::ToolError(_))));
        assert!(matches!(evaluate(""), Err(OrchestrationError::InvalidToolInput(_))));
        assert!(evaluate("sqrt(-1)").is_err());
    }

    #[test]
    fn test_deep_nesting_is_rejected() {
        let deep = format!("{}1{}", "(".repeat(50_000), ")".repeat(50_000));
        assert!(matches!(evaluate(&deep), Err(OrchestrationError::InvalidToolInput(_))));

        let too_deep = format!("{}1{}", "(".repeat(65), ")".repeat(65));
        assert!(matches!(
            evaluate(&too_deep),
            Err(OrchestrationError::InvalidToolInput(ref m)) if m.contains("64 levels")
        ));

        let nested = format!("{}2{}", "(".repeat(64), ")".repeat(64));
        assert_eq!(approx(&nested), 2.0);
    }

    #[test]
    fn test_long_sign_and_power_chains() {
        let signs = format!("{}3", "-".repeat(1000));
        assert_eq!(approx(&signs), 3.0);
        assert_eq!(approx("--3"), 3.0);
        assert_eq!(approx("2 ** -3 ** 2"), 2f64.powf(-9.0));

        let chain = format!("1{}", "^1".repeat(400));
        assert_eq!(approx(&chain), 1.0);

        let too_long = "1+".repeat(600) + "1";
        assert!(matches!(evaluate(&too_long), Err(OrchestrationError::InvalidToolInput(_))));
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(2_518_731.0), "2518731");
        assert_eq!(format_number(0.5), "0.5");
    }

    #[tokio::test]
    async fn test_tool_execute() {
        let input = ToolInput {
            tool_name: "calculator".to_string(),
            parameters: json!({"expression": "190.12 * 10"}),
        };
        let output = CalculatorTool.execute(&input).await.unwrap();
        assert!(output.success);
        assert_eq!(output.data["result"], "1901.2");
    }
}
