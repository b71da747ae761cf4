//! Formula parser for the expression engine
//!
//! Converts a sequence of tokens into an Abstract Syntax Tree (AST).
//! Uses recursive descent parsing with JavaScript-like operator precedence:
//! ternary < `||` < `&&` < equality < relational/`in` < additive <
//! multiplicative < unary < primary.

use super::tokenizer::Token;

/// Contents of a `{{ ... }}` block.
///
/// Blocks are parsed independently of the surrounding formula, so a broken
/// condition only falsifies its own block.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Parsed(Box<Expr>),
    /// Parse failure message
    Malformed(String),
}

/// Abstract Syntax Tree node for formula expressions
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Text(String),
    Boolean(bool),
    Null,
    /// A bare name such as `tally` or `units`
    Identifier(String),
    /// Parenthesized sub-expression, kept so top-level splitting can see it
    Group(Box<Expr>),
    /// Conditional block `{{ ... }}`
    Block(Condition),
    /// Operands of a `+` chain, folded left to right.
    ///
    /// Kept flat so a group of many rows stays one level deep.
    Sum(Vec<Expr>),
    /// Function call: name(arg1, arg2, ...)
    FunctionCall { name: String, args: Vec<Expr> },
    /// Binary operation: left op right
    BinaryOp {
        op: String,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// Unary operation: `!expr`, `-expr`, `+expr`
    UnaryOp { op: String, operand: Box<Expr> },
    /// condition ? then_branch : else_branch
    Ternary {
        condition: Box<Expr>,
        then_branch: Box<Expr>,
        else_branch: Box<Expr>,
    },
    /// value in [a, b, c]; items are kept as raw text
    Membership { value: Box<Expr>, items: Vec<String> },
}

impl Expr {
    pub fn binary(op: &str, left: Expr, right: Expr) -> Self {
        Expr::BinaryOp {
            op: op.to_string(),
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// A `+` chain over `terms`; a single term stands alone
    pub fn sum(mut terms: Vec<Expr>) -> Self {
        if terms.len() == 1 {
            terms.remove(0)
        } else {
            Expr::Sum(terms)
        }
    }

    /// True for `==`, `!=`, `===`, `!==`, `<`, `>`, `<=`, `>=`
    pub fn is_comparison_op(op: &str) -> bool {
        matches!(
            op,
            "==" | "!=" | "===" | "!==" | "<" | ">" | "<=" | ">="
        )
    }

    /// Rebuild this node with `f` applied to each direct child.
    ///
    /// Block contents are opaque and never visited.
    pub fn map_children(self, f: &mut impl FnMut(Expr) -> Expr) -> Expr {
        match self {
            Expr::Group(inner) => Expr::Group(Box::new(f(*inner))),
            Expr::FunctionCall { name, args } => Expr::FunctionCall {
                name,
                args: args.into_iter().map(&mut *f).collect(),
            },
            Expr::Sum(terms) => Expr::Sum(terms.into_iter().map(&mut *f).collect()),
            Expr::BinaryOp { op, left, right } => Expr::BinaryOp {
                op,
                left: Box::new(f(*left)),
                right: Box::new(f(*right)),
            },
            Expr::UnaryOp { op, operand } => Expr::UnaryOp {
                op,
                operand: Box::new(f(*operand)),
            },
            Expr::Ternary {
                condition,
                then_branch,
                else_branch,
            } => Expr::Ternary {
                condition: Box::new(f(*condition)),
                then_branch: Box::new(f(*then_branch)),
                else_branch: Box::new(f(*else_branch)),
            },
            Expr::Membership { value, items } => Expr::Membership {
                value: Box::new(f(*value)),
                items,
            },
            leaf => leaf,
        }
    }

    /// Direct children, blocks excluded
    pub fn children(&self) -> Vec<&Expr> {
        match self {
            Expr::Group(inner) => vec![inner.as_ref()],
            Expr::FunctionCall { args, .. } | Expr::Sum(args) => args.iter().collect(),
            Expr::BinaryOp { left, right, .. } => vec![left.as_ref(), right.as_ref()],
            Expr::UnaryOp { operand, .. } => vec![operand.as_ref()],
            Expr::Ternary {
                condition,
                then_branch,
                else_branch,
            } => vec![
                condition.as_ref(),
                then_branch.as_ref(),
                else_branch.as_ref(),
            ],
            Expr::Membership { value, .. } => vec![value.as_ref()],
            _ => Vec::new(),
        }
    }

    /// True if the identifier appears anywhere outside blocks
    pub fn references(&self, name: &str) -> bool {
        match self {
            Expr::Identifier(ident) => ident == name,
            other => other.children().into_iter().any(|c| c.references(name)),
        }
    }
}

/// Error during parsing
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
    pub position: usize,
}

impl ParseError {
    fn new(message: impl Into<String>, position: usize) -> Self {
        Self {
            message: message.into(),
            position,
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Parse error at position {}: {}",
            self.position, self.message
        )
    }
}

impl std::error::Error for ParseError {}

/// Parser for formula tokens
pub struct Parser {
    tokens: Vec<Token>,
    position: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            position: 0,
        }
    }

    /// Parse the tokens into an AST
    pub fn parse(mut self) -> Result<Expr, ParseError> {
        if self.tokens.is_empty() {
            return Err(ParseError::new("Empty expression", 0));
        }
        let expr = self.expression()?;

        if !self.is_at_end() {
            return Err(ParseError::new(
                format!("Unexpected token after expression: {:?}", self.peek()),
                self.position,
            ));
        }

        Ok(expr)
    }

    fn is_at_end(&self) -> bool {
        self.position >= self.tokens.len()
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn peek_next(&self) -> Option<&Token> {
        self.tokens.get(self.position + 1)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.position).cloned();
        if token.is_some() {
            self.position += 1;
        }
        token
    }

    fn match_token(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn match_any_operator(&mut self, ops: &[&str]) -> Option<String> {
        if let Some(Token::Operator(s)) = self.peek() {
            if ops.contains(&s.as_str()) {
                let op = s.clone();
                self.advance();
                return Some(op);
            }
        }
        None
    }

    fn expect(&mut self, expected: &Token, message: &str) -> Result<(), ParseError> {
        if self.match_token(expected) {
            Ok(())
        } else {
            Err(ParseError::new(message, self.position))
        }
    }

    /// Expression: ternary
    fn expression(&mut self) -> Result<Expr, ParseError> {
        self.ternary()
    }

    /// Ternary: or ( "?" expression ":" expression )?   (right-associative)
    fn ternary(&mut self) -> Result<Expr, ParseError> {
        let condition = self.logical_or()?;

        if self.match_token(&Token::Question) {
            let then_branch = self.expression()?;
            self.expect(&Token::Colon, "Expected ':' in conditional expression")?;
            let else_branch = self.expression()?;
            return Ok(Expr::Ternary {
                condition: Box::new(condition),
                then_branch: Box::new(then_branch),
                else_branch: Box::new(else_branch),
            });
        }

        Ok(condition)
    }

    fn logical_or(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.logical_and()?;
        while let Some(op) = self.match_any_operator(&["||"]) {
            let right = self.logical_and()?;
            left = Expr::binary(&op, left, right);
        }
        Ok(left)
    }

    fn logical_and(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.equality()?;
        while let Some(op) = self.match_any_operator(&["&&"]) {
            let right = self.equality()?;
            left = Expr::binary(&op, left, right);
        }
        Ok(left)
    }

    fn equality(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.relational()?;
        while let Some(op) = self.match_any_operator(&["==", "!=", "===", "!=="]) {
            let right = self.relational()?;
            left = Expr::binary(&op, left, right);
        }
        Ok(left)
    }

    /// Relational: additive (( "<" | ">" | "<=" | ">=" ) additive | "in" list)*
    fn relational(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.additive()?;

        loop {
            if let Some(op) = self.match_any_operator(&["<", ">", "<=", ">="]) {
                let right = self.additive()?;
                left = Expr::binary(&op, left, right);
            } else if self.at_membership() {
                self.advance();
                let items = self.membership_items()?;
                left = Expr::Membership {
                    value: Box::new(left),
                    items,
                };
            } else {
                break;
            }
        }

        Ok(left)
    }

    fn at_membership(&self) -> bool {
        matches!(self.peek(), Some(Token::Identifier(kw)) if kw == "in")
            && self.peek_next() == Some(&Token::OpenBracket)
    }

    /// List: "[" item ( "," item )* "]" where each item is raw text
    fn membership_items(&mut self) -> Result<Vec<String>, ParseError> {
        self.expect(&Token::OpenBracket, "Expected '[' after 'in'")?;
        let mut items = Vec::new();
        let mut current = String::new();

        loop {
            match self.advance() {
                None => {
                    return Err(ParseError::new("Unterminated membership list", self.position))
                }
                Some(Token::CloseBracket) => break,
                Some(Token::Comma) => {
                    items.push(std::mem::take(&mut current).trim().to_string());
                }
                Some(token) => current.push_str(&token.raw_text()),
            }
        }
        items.push(current.trim().to_string());
        items.retain(|item| !item.is_empty());

        Ok(items)
    }

    /// Additive: `+` operands collect into one flat sum; `-` closes the sum
    /// so far into its left operand
    fn additive(&mut self) -> Result<Expr, ParseError> {
        let mut terms = vec![self.multiplicative()?];
        while let Some(op) = self.match_any_operator(&["+", "-"]) {
            let right = self.multiplicative()?;
            if op == "+" {
                terms.push(right);
            } else {
                let left = Expr::sum(std::mem::take(&mut terms));
                terms.push(Expr::binary(&op, left, right));
            }
        }
        Ok(Expr::sum(terms))
    }

    fn multiplicative(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.unary()?;
        while let Some(op) = self.match_any_operator(&["*", "/", "%"]) {
            let right = self.unary()?;
            left = Expr::binary(&op, left, right);
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr, ParseError> {
        if let Some(op) = self.match_any_operator(&["!", "-", "+"]) {
            let operand = self.unary()?;
            Ok(Expr::UnaryOp {
                op,
                operand: Box::new(operand),
            })
        } else {
            self.primary()
        }
    }

    /// Primary: NUMBER | STRING | keyword | IDENTIFIER | call | "(" expr ")" | block
    fn primary(&mut self) -> Result<Expr, ParseError> {
        match self.advance() {
            Some(Token::Number(n)) => Ok(Expr::Number(n)),
            Some(Token::Text(s)) => Ok(Expr::Text(s)),
            Some(Token::Identifier(name)) => self.identifier(name),
            Some(Token::OpenParen) => {
                let expr = self.expression()?;
                self.expect(&Token::CloseParen, "Expected ')' after expression")?;
                Ok(Expr::Group(Box::new(expr)))
            }
            Some(Token::BlockOpen) => self.block(),
            Some(token) => Err(ParseError::new(
                format!("Unexpected token: {:?}", token),
                self.position - 1,
            )),
            None => Err(ParseError::new(
                "Unexpected end of expression",
                self.position,
            )),
        }
    }

    fn identifier(&mut self, name: String) -> Result<Expr, ParseError> {
        match name.as_str() {
            "true" => return Ok(Expr::Boolean(true)),
            "false" => return Ok(Expr::Boolean(false)),
            "null" => return Ok(Expr::Null),
            _ => {}
        }

        if self.match_token(&Token::OpenParen) {
            let args = self.arguments()?;
            self.expect(&Token::CloseParen, "Expected ')' after function arguments")?;
            return Ok(Expr::FunctionCall { name, args });
        }

        Ok(Expr::Identifier(name))
    }

    fn arguments(&mut self) -> Result<Vec<Expr>, ParseError> {
        let mut args = Vec::new();

        if let Some(Token::CloseParen) = self.peek() {
            return Ok(args);
        }

        args.push(self.expression()?);
        while self.match_token(&Token::Comma) {
            args.push(self.expression()?);
        }

        Ok(args)
    }

    /// Block: tokens up to the next `}}`, parsed on their own
    fn block(&mut self) -> Result<Expr, ParseError> {
        let start = self.position;
        let mut inner = Vec::new();

        loop {
            match self.advance() {
                None => return Err(ParseError::new("Unterminated '{{' block", start)),
                Some(Token::BlockClose) => break,
                Some(token) => inner.push(token),
            }
        }

        let condition = match Parser::new(inner).parse() {
            Ok(expr) => Condition::Parsed(Box::new(expr)),
            Err(e) => Condition::Malformed(e.message),
        };
        Ok(Expr::Block(condition))
    }
}

/// Convenience function to parse tokens into an AST
pub fn parse(tokens: Vec<Token>) -> Result<Expr, ParseError> {
    Parser::new(tokens).parse()
}
