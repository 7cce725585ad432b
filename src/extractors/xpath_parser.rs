//! XPath expression parser
//!
//! Covers the XPath 1.0 subset scraper selector maps use: location paths
//! over the common axes, predicates, unions, comparisons, boolean operators
//! and a handful of string/node-set functions. No arithmetic.

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Slash,
    DoubleSlash,
    LBracket,
    RBracket,
    LParen,
    RParen,
    At,
    Comma,
    Pipe,
    Dot,
    DotDot,
    Star,
    ColonColon,
    Eq,
    NotEq,
    Lt,
    Gt,
    Le,
    Ge,
    Literal(String),
    Number(f64),
    Name(String),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Slash => write!(f, "/"),
            Token::DoubleSlash => write!(f, "//"),
            Token::LBracket => write!(f, "["),
            Token::RBracket => write!(f, "]"),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::At => write!(f, "@"),
            Token::Comma => write!(f, ","),
            Token::Pipe => write!(f, "|"),
            Token::Dot => write!(f, "."),
            Token::DotDot => write!(f, ".."),
            Token::Star => write!(f, "*"),
            Token::ColonColon => write!(f, "::"),
            Token::Eq => write!(f, "="),
            Token::NotEq => write!(f, "!="),
            Token::Lt => write!(f, "<"),
            Token::Gt => write!(f, ">"),
            Token::Le => write!(f, "<="),
            Token::Ge => write!(f, ">="),
            Token::Literal(s) => write!(f, "'{}'", s),
            Token::Number(n) => write!(f, "{}", n),
            Token::Name(n) => write!(f, "{}", n),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Child,
    Descendant,
    DescendantOrSelf,
    SelfAxis,
    Parent,
    Ancestor,
    AncestorOrSelf,
    FollowingSibling,
    PrecedingSibling,
    Attribute,
}

impl Axis {
    fn from_name(name: &str) -> Option<Axis> {
        Some(match name {
            "child" => Axis::Child,
            "descendant" => Axis::Descendant,
            "descendant-or-self" => Axis::DescendantOrSelf,
            "self" => Axis::SelfAxis,
            "parent" => Axis::Parent,
            "ancestor" => Axis::Ancestor,
            "ancestor-or-self" => Axis::AncestorOrSelf,
            "following-sibling" => Axis::FollowingSibling,
            "preceding-sibling" => Axis::PrecedingSibling,
            "attribute" => Axis::Attribute,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeTest {
    Name(String),
    Any,
    Text,
    Comment,
    Node,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub axis: Axis,
    pub test: NodeTest,
    pub predicates: Vec<Expr>,
}

impl Step {
    fn descendant_or_self() -> Self {
        Step {
            axis: Axis::DescendantOrSelf,
            test: NodeTest::Node,
            predicates: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    NotEq,
    Lt,
    Gt,
    Le,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Last,
    Position,
    Count,
    String,
    Concat,
    Contains,
    StartsWith,
    EndsWith,
    Not,
    True,
    False,
    NormalizeSpace,
    StringLength,
    Translate,
    Name,
}

impl Function {
    fn from_name(name: &str) -> Option<(Function, usize, usize)> {
        // (function, min args, max args)
        Some(match name {
            "last" => (Function::Last, 0, 0),
            "position" => (Function::Position, 0, 0),
            "count" => (Function::Count, 1, 1),
            "string" => (Function::String, 0, 1),
            "concat" => (Function::Concat, 2, usize::MAX),
            "contains" => (Function::Contains, 2, 2),
            "starts-with" => (Function::StartsWith, 2, 2),
            "ends-with" => (Function::EndsWith, 2, 2),
            "not" => (Function::Not, 1, 1),
            "true" => (Function::True, 0, 0),
            "false" => (Function::False, 0, 0),
            "normalize-space" => (Function::NormalizeSpace, 0, 1),
            "string-length" => (Function::StringLength, 0, 1),
            "translate" => (Function::Translate, 3, 3),
            "name" | "local-name" => (Function::Name, 0, 1),
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Path {
        absolute: bool,
        steps: Vec<Step>,
    },
    /// Primary expression with predicates and an optional trailing path
    Filter {
        base: Box<Expr>,
        predicates: Vec<Expr>,
        steps: Vec<Step>,
    },
    Union(Vec<Expr>),
    Or(Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Compare(CmpOp, Box<Expr>, Box<Expr>),
    Literal(String),
    Number(f64),
    Call(Function, Vec<Expr>),
}

impl Expr {
    /// Whether evaluation always yields a node-set
    pub fn is_node_set(&self) -> bool {
        matches!(self, Expr::Path { .. } | Expr::Filter { .. } | Expr::Union(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XPathSyntaxError(pub String);

impl fmt::Display for XPathSyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for XPathSyntaxError {}

type ParseResult<T> = Result<T, XPathSyntaxError>;

fn err<T>(message: impl Into<String>) -> ParseResult<T> {
    Err(XPathSyntaxError(message.into()))
}

fn is_name_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | '.')
}

fn tokenize(input: &str) -> ParseResult<Vec<Token>> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        match c {
            c if c.is_whitespace() => i += 1,
            '/' if next == Some('/') => {
                tokens.push(Token::DoubleSlash);
                i += 2;
            }
            '/' => {
                tokens.push(Token::Slash);
                i += 1;
            }
            '[' => {
                tokens.push(Token::LBracket);
                i += 1;
            }
            ']' => {
                tokens.push(Token::RBracket);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '@' => {
                tokens.push(Token::At);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '|' => {
                tokens.push(Token::Pipe);
                i += 1;
            }
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            ':' if next == Some(':') => {
                tokens.push(Token::ColonColon);
                i += 2;
            }
            '=' => {
                tokens.push(Token::Eq);
                i += 1;
            }
            '!' if next == Some('=') => {
                tokens.push(Token::NotEq);
                i += 2;
            }
            '<' if next == Some('=') => {
                tokens.push(Token::Le);
                i += 2;
            }
            '<' => {
                tokens.push(Token::Lt);
                i += 1;
            }
            '>' if next == Some('=') => {
                tokens.push(Token::Ge);
                i += 2;
            }
            '>' => {
                tokens.push(Token::Gt);
                i += 1;
            }
            '"' | '\'' => {
                let end = chars[i + 1..]
                    .iter()
                    .position(|&ch| ch == c)
                    .ok_or_else(|| XPathSyntaxError("unterminated string literal".into()))?;
                tokens.push(Token::Literal(chars[i + 1..i + 1 + end].iter().collect()));
                i += end + 2;
            }
            '.' if next == Some('.') => {
                tokens.push(Token::DotDot);
                i += 2;
            }
            '.' if next.is_some_and(|n| n.is_ascii_digit()) => {
                let start = i;
                i += 1;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                tokens.push(Token::Number(text.parse().map_err(|_| {
                    XPathSyntaxError(format!("invalid number '{}'", text))
                })?));
            }
            '.' => {
                tokens.push(Token::Dot);
                i += 1;
            }
            c if c.is_ascii_digit() => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                tokens.push(Token::Number(text.parse().map_err(|_| {
                    XPathSyntaxError(format!("invalid number '{}'", text))
                })?));
            }
            c if is_name_start(c) => {
                let start = i;
                while i < chars.len() && is_name_char(chars[i]) {
                    i += 1;
                }
                // prefix:local, but not axis::
                if i + 1 < chars.len()
                    && chars[i] == ':'
                    && chars[i + 1] != ':'
                    && is_name_start(chars[i + 1])
                {
                    i += 1;
                    while i < chars.len() && is_name_char(chars[i]) {
                        i += 1;
                    }
                }
                tokens.push(Token::Name(chars[start..i].iter().collect()));
            }
            other => return err(format!("unexpected character '{}'", other)),
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &Token) -> ParseResult<()> {
        match self.advance() {
            Some(ref t) if t == token => Ok(()),
            Some(t) => err(format!("expected '{}', found '{}'", token, t)),
            None => err(format!("expected '{}', found end of expression", token)),
        }
    }

    fn eat_operator_name(&mut self, name: &str) -> bool {
        if matches!(self.peek(), Some(Token::Name(n)) if n == name) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn parse_or(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_and()?;
        while self.eat_operator_name("or") {
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_equality()?;
        while self.eat_operator_name("and") {
            let right = self.parse_equality()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_relational()?;
        loop {
            let op = match self.peek() {
                Some(Token::Eq) => CmpOp::Eq,
                Some(Token::NotEq) => CmpOp::NotEq,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.parse_relational()?;
            left = Expr::Compare(op, Box::new(left), Box::new(right));
        }
    }

    fn parse_relational(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_union()?;
        loop {
            let op = match self.peek() {
                Some(Token::Lt) => CmpOp::Lt,
                Some(Token::Gt) => CmpOp::Gt,
                Some(Token::Le) => CmpOp::Le,
                Some(Token::Ge) => CmpOp::Ge,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.parse_union()?;
            left = Expr::Compare(op, Box::new(left), Box::new(right));
        }
    }

    fn parse_union(&mut self) -> ParseResult<Expr> {
        let first = self.parse_path()?;
        if self.peek() != Some(&Token::Pipe) {
            return Ok(first);
        }

        let mut members = vec![first];
        while self.eat(&Token::Pipe) {
            let member = self.parse_path()?;
            if !member.is_node_set() {
                return err("union operands must be node-sets");
            }
            members.push(member);
        }
        if !members[0].is_node_set() {
            return err("union operands must be node-sets");
        }
        Ok(Expr::Union(members))
    }

    fn starts_step(&self) -> bool {
        match self.peek() {
            Some(Token::Star | Token::At | Token::Dot | Token::DotDot) => true,
            Some(Token::Name(name)) => match self.peek_at(1) {
                Some(Token::LParen) => matches!(name.as_str(), "text" | "node" | "comment"),
                _ => true,
            },
            _ => false,
        }
    }

    fn parse_path(&mut self) -> ParseResult<Expr> {
        match self.peek() {
            Some(Token::Slash) => {
                self.pos += 1;
                let steps = if self.starts_step() {
                    self.parse_relative_steps()?
                } else {
                    Vec::new()
                };
                Ok(Expr::Path {
                    absolute: true,
                    steps,
                })
            }
            Some(Token::DoubleSlash) => {
                self.pos += 1;
                let mut steps = vec![Step::descendant_or_self()];
                steps.extend(self.parse_relative_steps()?);
                Ok(Expr::Path {
                    absolute: true,
                    steps,
                })
            }
            _ if self.starts_step() => Ok(Expr::Path {
                absolute: false,
                steps: self.parse_relative_steps()?,
            }),
            _ => self.parse_filter(),
        }
    }

    fn parse_filter(&mut self) -> ParseResult<Expr> {
        let base = self.parse_primary()?;
        let predicates = self.parse_predicates()?;

        let steps = match self.peek() {
            Some(Token::Slash) => {
                self.pos += 1;
                self.parse_relative_steps()?
            }
            Some(Token::DoubleSlash) => {
                self.pos += 1;
                let mut steps = vec![Step::descendant_or_self()];
                steps.extend(self.parse_relative_steps()?);
                steps
            }
            _ => Vec::new(),
        };

        if predicates.is_empty() && steps.is_empty() {
            return Ok(base);
        }
        Ok(Expr::Filter {
            base: Box::new(base),
            predicates,
            steps,
        })
    }

    fn parse_primary(&mut self) -> ParseResult<Expr> {
        match self.advance() {
            Some(Token::Literal(s)) => Ok(Expr::Literal(s)),
            Some(Token::Number(n)) => Ok(Expr::Number(n)),
            Some(Token::LParen) => {
                let inner = self.parse_or()?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Name(name)) if self.peek() == Some(&Token::LParen) => {
                self.pos += 1;
                let Some((function, min, max)) = Function::from_name(&name) else {
                    return err(format!("unsupported function '{}'", name));
                };

                let mut args = Vec::new();
                if !self.eat(&Token::RParen) {
                    loop {
                        args.push(self.parse_or()?);
                        if self.eat(&Token::Comma) {
                            continue;
                        }
                        self.expect(&Token::RParen)?;
                        break;
                    }
                }

                if args.len() < min || args.len() > max {
                    return err(format!("wrong number of arguments to {}()", name));
                }
                Ok(Expr::Call(function, args))
            }
            Some(t) => err(format!("unexpected '{}'", t)),
            None => err("unexpected end of expression"),
        }
    }

    fn parse_relative_steps(&mut self) -> ParseResult<Vec<Step>> {
        let mut steps = vec![self.parse_step()?];
        loop {
            match self.peek() {
                Some(Token::Slash) => {
                    self.pos += 1;
                    steps.push(self.parse_step()?);
                }
                Some(Token::DoubleSlash) => {
                    self.pos += 1;
                    steps.push(Step::descendant_or_self());
                    steps.push(self.parse_step()?);
                }
                _ => return Ok(steps),
            }
        }
    }

    fn parse_step(&mut self) -> ParseResult<Step> {
        if self.eat(&Token::Dot) {
            return Ok(Step {
                axis: Axis::SelfAxis,
                test: NodeTest::Node,
                predicates: Vec::new(),
            });
        }
        if self.eat(&Token::DotDot) {
            return Ok(Step {
                axis: Axis::Parent,
                test: NodeTest::Node,
                predicates: Vec::new(),
            });
        }

        let axis = if self.eat(&Token::At) {
            Axis::Attribute
        } else if let (Some(Token::Name(name)), Some(Token::ColonColon)) =
            (self.peek(), self.peek_at(1))
        {
            let axis = Axis::from_name(name)
                .ok_or_else(|| XPathSyntaxError(format!("unsupported axis '{}'", name)))?;
            self.pos += 2;
            axis
        } else {
            Axis::Child
        };

        let test = self.parse_node_test()?;
        let predicates = self.parse_predicates()?;
        Ok(Step {
            axis,
            test,
            predicates,
        })
    }

    fn parse_node_test(&mut self) -> ParseResult<NodeTest> {
        match self.advance() {
            Some(Token::Star) => Ok(NodeTest::Any),
            Some(Token::Name(name)) => {
                if self.peek() != Some(&Token::LParen) {
                    return Ok(NodeTest::Name(name.to_ascii_lowercase()));
                }
                let test = match name.as_str() {
                    "text" => NodeTest::Text,
                    "node" => NodeTest::Node,
                    "comment" => NodeTest::Comment,
                    other => return err(format!("unsupported node test '{}()'", other)),
                };
                self.pos += 1;
                self.expect(&Token::RParen)?;
                Ok(test)
            }
            Some(t) => err(format!("expected node test, found '{}'", t)),
            None => err("expected node test, found end of expression"),
        }
    }

    fn parse_predicates(&mut self) -> ParseResult<Vec<Expr>> {
        let mut predicates = Vec::new();
        while self.eat(&Token::LBracket) {
            predicates.push(self.parse_or()?);
            self.expect(&Token::RBracket)?;
        }
        Ok(predicates)
    }
}

/// Parse an XPath expression
pub fn parse_xpath(input: &str) -> Result<Expr, XPathSyntaxError> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return err("empty expression");
    }

    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_or()?;
    match parser.peek() {
        None => Ok(expr),
        Some(t) => err(format!("unexpected '{}' after expression", t)),
    }
}
