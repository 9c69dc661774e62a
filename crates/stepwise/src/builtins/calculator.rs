//! Calculator tool: safe arithmetic over a restricted grammar.

use serde_json::{json, Value};

use crate::error::AgentResult;
use crate::routing::{Router, RoutingMetadata};
use crate::tools::schema::{boxed_tool_future, format_number, ToolDefinition};
use crate::tools::registry::ToolRegistry;

/// Tool identifier.
pub const TOOL_ID: &str = "calculator";

/// Register the calculator tool and its routing metadata.
pub fn register(registry: &mut ToolRegistry, router: &mut Router) -> AgentResult<()> {
    registry.register(definition())?;
    router.register(routing_metadata());
    Ok(())
}

pub(crate) fn routing_metadata() -> RoutingMetadata {
    RoutingMetadata {
        tool_id: TOOL_ID.to_string(),
        keywords: vec![
            "calculate".into(),
            "math".into(),
            "compute".into(),
            "evaluate".into(),
            "plus".into(),
            "minus".into(),
            "times".into(),
        ],
        examples: vec![
            "what is".into(),
            "how much is".into(),
            "multiplied by".into(),
            "divided by".into(),
        ],
        verbs: vec![
            "calculate".into(),
            "compute".into(),
            "add".into(),
            "multiply".into(),
            "divide".into(),
            "subtract".into(),
            "solve".into(),
        ],
        objects: vec![
            "expression".into(),
            "sum".into(),
            "product".into(),
            "total".into(),
        ],
    }
}

pub fn definition() -> ToolDefinition {
    ToolDefinition {
        tool_id: TOOL_ID.to_string(),
        description: "Evaluates arithmetic expressions with + - * / and parentheses.".to_string(),
        input_hint: "an arithmetic expression such as \"(100 + 50) * 2\"".to_string(),
        output_schema: json!({
            "type": "object",
            "required": ["expression", "result", "success"],
            "properties": {
                "expression": {"type": "string"},
                "result": {"type": "number"},
                "success": {"type": "boolean"}
            }
        }),
        handler: std::sync::Arc::new(|input: String| {
            boxed_tool_future(async move { Ok(calculate(&input)) })
        }),
        render,
    }
}

/// Evaluate `expression` into the calculator's output record. Never fails;
/// problems are reported with `"success": false`.
pub fn calculate(expression: &str) -> Value {
    let expression = expression.trim();
    match evaluate(expression) {
        Ok(result) => json!({
            "expression": expression,
            "result": result,
            "success": true,
        }),
        Err(error) => json!({
            "expression": expression,
            "result": Value::Null,
            "success": false,
            "error": error.to_string(),
        }),
    }
}

fn render(output: &Value) -> String {
    output
        .get("result")
        .and_then(Value::as_f64)
        .map(format_number)
        .unwrap_or_default()
}

// --- Restricted arithmetic evaluator ---

/// Deepest parenthesis nesting the parser accepts.
const MAX_NESTING: usize = 64;

/// Why an expression could not be evaluated.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CalcError {
    #[error("invalid character '{ch}' at position {position} in expression")]
    InvalidCharacter { ch: char, position: usize },
    #[error("malformed number '{0}'")]
    MalformedNumber(String),
    #[error("empty expression")]
    Empty,
    #[error("unexpected end of expression")]
    UnexpectedEnd,
    #[error("unexpected token")]
    UnexpectedToken,
    #[error("unexpected tokens after expression")]
    TrailingTokens,
    #[error("missing closing parenthesis")]
    UnclosedParenthesis,
    #[error("expression nested too deeply")]
    TooDeep,
    #[error("division by zero")]
    DivisionByZero,
    #[error("result is not a finite number")]
    NotFinite,
}

pub type CalcResult<T> = Result<T, CalcError>;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
}

fn check_charset(input: &str) -> CalcResult<()> {
    for (position, ch) in input.chars().enumerate() {
        let allowed = ch.is_ascii_digit()
            || matches!(ch, '+' | '-' | '*' | '/' | '(' | ')' | '.')
            || ch.is_whitespace();
        if !allowed {
            return Err(CalcError::InvalidCharacter { ch, position });
        }
    }
    Ok(())
}

fn lex(input: &str) -> CalcResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&ch) = chars.peek() {
        let token = match ch {
            c if c.is_whitespace() => {
                chars.next();
                continue;
            }
            '0'..='9' | '.' => {
                let mut num_str = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_ascii_digit() || c == '.' {
                        num_str.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let number = num_str
                    .parse::<f64>()
                    .map_err(|_| CalcError::MalformedNumber(num_str.clone()))?;
                tokens.push(Token::Number(number));
                continue;
            }
            '+' => Token::Plus,
            '-' => Token::Minus,
            '*' => Token::Star,
            '/' => Token::Slash,
            '(' => Token::LParen,
            ')' => Token::RParen,
            _ => return Err(CalcError::UnexpectedToken),
        };
        tokens.push(token);
        chars.next();
    }

    Ok(tokens)
}

/// Evaluate an arithmetic expression string.
pub fn evaluate(input: &str) -> CalcResult<f64> {
    check_charset(input)?;
    let tokens = lex(input)?;
    if tokens.is_empty() {
        return Err(CalcError::Empty);
    }
    let mut parser = Parser {
        tokens: &tokens,
        pos: 0,
        depth: 0,
    };
    let result = parser.expr()?;
    if parser.pos != tokens.len() {
        return Err(CalcError::TrailingTokens);
    }
    if !result.is_finite() {
        return Err(CalcError::NotFinite);
    }
    Ok(result)
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    /// Open parentheses around the current position.
    depth: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn expr(&mut self) -> CalcResult<f64> {
        let mut left = self.term()?;
        loop {
            match self.peek() {
                Some(Token::Plus) => {
                    self.pos += 1;
                    left += self.term()?;
                }
                Some(Token::Minus) => {
                    self.pos += 1;
                    left -= self.term()?;
                }
                _ => return Ok(left),
            }
        }
    }

    fn term(&mut self) -> CalcResult<f64> {
        let mut left = self.unary()?;
        loop {
            match self.peek() {
                Some(Token::Star) => {
                    self.pos += 1;
                    left *= self.unary()?;
                }
                Some(Token::Slash) => {
                    self.pos += 1;
                    let right = self.unary()?;
                    if right == 0.0 {
                        return Err(CalcError::DivisionByZero);
                    }
                    left /= right;
                }
                _ => return Ok(left),
            }
        }
    }

    /// Sign runs are folded in a loop so `----1` costs no stack.
    fn unary(&mut self) -> CalcResult<f64> {
        let mut negative = false;
        loop {
            match self.peek() {
                Some(Token::Minus) => negative = !negative,
                Some(Token::Plus) => {}
                _ => break,
            }
            self.pos += 1;
        }
        let value = self.primary()?;
        Ok(if negative { -value } else { value })
    }

    fn primary(&mut self) -> CalcResult<f64> {
        match self.peek() {
            None => Err(CalcError::UnexpectedEnd),
            Some(Token::Number(n)) => {
                let n = *n;
                self.pos += 1;
                Ok(n)
            }
            Some(Token::LParen) => {
                if self.depth >= MAX_NESTING {
                    return Err(CalcError::TooDeep);
                }
                self.pos += 1;
                self.depth += 1;
                let value = self.expr()?;
                self.depth -= 1;
                if self.peek() != Some(&Token::RParen) {
                    return Err(CalcError::UnclosedParenthesis);
                }
                self.pos += 1;
                Ok(value)
            }
            Some(_) => Err(CalcError::UnexpectedToken),
        }
    }
}
