//! calculate tool - evaluate a restricted arithmetic expression

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::tools::{Tool, ToolResult};

const ALLOWED_CHARS: &str = "0123456789+-*/().% ";

pub struct CalculateTool;

impl CalculateTool {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CalculateTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for CalculateTool {
    fn name(&self) -> &str {
        "calculate"
    }

    fn description(&self) -> &str {
        "Evaluate an arithmetic expression using +, -, *, /, %, and parentheses."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "expression": {
                    "type": "string",
                    "description": "Arithmetic expression, e.g. '(2 + 3) * 4'"
                }
            },
            "required": ["expression"]
        })
    }

    async fn execute(&self, input: Value) -> ToolResult {
        debug!(?input, "CalculateTool::execute: called");
        let expression = match input["expression"].as_str() {
            Some(e) => e,
            None => return ToolResult::failure("expression is required"),
        };

        if let Some(bad) = expression.chars().find(|c| !ALLOWED_CHARS.contains(*c)) {
            debug!(%bad, "CalculateTool::execute: disallowed character");
            return ToolResult::failure(format!("disallowed character in expression: '{}'", bad));
        }

        match eval_expression(expression) {
            Ok(value) => ToolResult::ok(value.to_string()),
            Err(e) => ToolResult::failure(e),
        }
    }
}

/// Recursive-descent evaluator over the restricted grammar
/// `expr := term (('+' | '-') term)*`, `term := factor (('*' | '/' | '%') factor)*`,
/// `factor := number | '(' expr ')' | '-' factor`.
fn eval_expression(input: &str) -> Result<f64, String> {
    let tokens: Vec<char> = input.chars().filter(|c| !c.is_whitespace()).collect();
    let mut pos = 0usize;
    let value = parse_expr(&tokens, &mut pos)?;
    if pos != tokens.len() {
        return Err(format!("unexpected token at position {}", pos));
    }
    Ok(value)
}

fn parse_expr(tokens: &[char], pos: &mut usize) -> Result<f64, String> {
    let mut value = parse_term(tokens, pos)?;
    while let Some(&op) = tokens.get(*pos) {
        match op {
            '+' => {
                *pos += 1;
                value += parse_term(tokens, pos)?;
            }
            '-' => {
                *pos += 1;
                value -= parse_term(tokens, pos)?;
            }
            _ => break,
        }
    }
    Ok(value)
}

fn parse_term(tokens: &[char], pos: &mut usize) -> Result<f64, String> {
    let mut value = parse_factor(tokens, pos)?;
    while let Some(&op) = tokens.get(*pos) {
        match op {
            '*' => {
                *pos += 1;
                value *= parse_factor(tokens, pos)?;
            }
            '/' => {
                *pos += 1;
                let rhs = parse_factor(tokens, pos)?;
                if rhs == 0.0 {
                    return Err("division by zero".to_string());
                }
                value /= rhs;
            }
            '%' => {
                *pos += 1;
                let rhs = parse_factor(tokens, pos)?;
                if rhs == 0.0 {
                    return Err("division by zero".to_string());
                }
                value %= rhs;
            }
            _ => break,
        }
    }
    Ok(value)
}

fn parse_factor(tokens: &[char], pos: &mut usize) -> Result<f64, String> {
    match tokens.get(*pos) {
        Some('-') => {
            *pos += 1;
            Ok(-parse_factor(tokens, pos)?)
        }
        Some('(') => {
            *pos += 1;
            let value = parse_expr(tokens, pos)?;
            match tokens.get(*pos) {
                Some(')') => {
                    *pos += 1;
                    Ok(value)
                }
                _ => Err("unmatched parenthesis".to_string()),
            }
        }
        Some(c) if c.is_ascii_digit() || *c == '.' => {
            let start = *pos;
            while matches!(tokens.get(*pos), Some(c) if c.is_ascii_digit() || *c == '.') {
                *pos += 1;
            }
            let text: String = tokens[start..*pos].iter().collect();
            text.parse::<f64>().map_err(|_| format!("invalid number: {}", text))
        }
        _ => Err(format!("unexpected token at position {}", pos)),
    }
}
