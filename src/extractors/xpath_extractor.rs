//! XPath evaluation over the scraper HTML tree
//!
//! Node-set results come back in document order without duplicates.
//! Elements render as outer HTML, text nodes and attributes as their value.
//! An expression that yields a string, number or boolean renders as a single
//! value.

use ego_tree::{NodeId, NodeRef, Tree};
use once_cell::unsync::OnceCell;
use scraper::{ElementRef, Html, Node};
use std::collections::HashMap;

use super::xpath_parser::{parse_xpath, Axis, CmpOp, Expr, Function, NodeTest, Step, XPathSyntaxError};

/// A compiled XPath expression
#[derive(Debug, Clone)]
pub struct XPathQuery {
    expr: Expr,
}

impl XPathQuery {
    pub fn parse(input: &str) -> Result<Self, XPathSyntaxError> {
        Ok(Self {
            expr: parse_xpath(input)?,
        })
    }

    /// Evaluate against a whole document; relative paths start at `<html>`
    pub fn select_document(&self, document: &Html) -> Vec<String> {
        let context = document.root_element().id();
        Evaluator::new(&document.tree).select(&self.expr, context)
    }

    /// Evaluate with `element` as the context node
    pub fn select_within(&self, element: ElementRef<'_>) -> Vec<String> {
        Evaluator::new(element.tree()).select(&self.expr, element.id())
    }
}

#[derive(Debug, Clone, PartialEq)]
enum XNode {
    Node(NodeId),
    /// Owning element and attribute name
    Attr(NodeId, String),
}

#[derive(Debug, Clone)]
enum Value {
    Nodes(Vec<XNode>),
    Str(String),
    Num(f64),
    Bool(bool),
}

struct Context {
    node: XNode,
    position: usize,
    size: usize,
}

struct Evaluator<'a> {
    tree: &'a Tree<Node>,
    order: OnceCell<HashMap<NodeId, usize>>,
}

fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

impl<'a> Evaluator<'a> {
    fn new(tree: &'a Tree<Node>) -> Self {
        Self {
            tree,
            order: OnceCell::new(),
        }
    }

    fn select(&self, expr: &Expr, context: NodeId) -> Vec<String> {
        let ctx = Context {
            node: XNode::Node(context),
            position: 1,
            size: 1,
        };

        match self.eval(expr, &ctx) {
            Value::Nodes(nodes) => nodes.iter().filter_map(|n| self.render(n)).collect(),
            other => {
                let text = self.to_str(&other);
                if text.is_empty() {
                    Vec::new()
                } else {
                    vec![text]
                }
            }
        }
    }

    fn get(&self, id: NodeId) -> Option<NodeRef<'a, Node>> {
        self.tree.get(id)
    }

    fn render(&self, node: &XNode) -> Option<String> {
        match node {
            XNode::Attr(..) => Some(self.string_value(node)),
            XNode::Node(id) => {
                let node = self.get(*id)?;
                match node.value() {
                    Node::Element(_) => ElementRef::wrap(node).map(|el| el.html()),
                    Node::Text(t) if t.text.trim().is_empty() => None,
                    Node::Text(t) => Some(t.text.to_string()),
                    Node::Comment(c) => Some(format!("<!--{}-->", c.comment)),
                    Node::Document | Node::Fragment => node
                        .children()
                        .find_map(ElementRef::wrap)
                        .map(|el| el.html()),
                    _ => None,
                }
            }
        }
    }

    fn string_value(&self, node: &XNode) -> String {
        match node {
            XNode::Attr(owner, name) => self
                .get(*owner)
                .and_then(|n| n.value().as_element().and_then(|e| e.attr(name)))
                .unwrap_or_default()
                .to_string(),
            XNode::Node(id) => {
                let Some(node) = self.get(*id) else {
                    return String::new();
                };
                match node.value() {
                    Node::Text(t) => t.text.to_string(),
                    Node::Comment(c) => c.comment.to_string(),
                    _ => node
                        .descendants()
                        .filter_map(|d| d.value().as_text())
                        .map(|t| &*t.text)
                        .collect(),
                }
            }
        }
    }

    fn node_name(&self, node: &XNode) -> String {
        match node {
            XNode::Attr(_, name) => name.clone(),
            XNode::Node(id) => self
                .get(*id)
                .and_then(|n| n.value().as_element().map(|e| e.name().to_string()))
                .unwrap_or_default(),
        }
    }

    fn to_str(&self, value: &Value) -> String {
        match value {
            Value::Nodes(nodes) => nodes
                .first()
                .map(|n| self.string_value(n))
                .unwrap_or_default(),
            Value::Str(s) => s.clone(),
            Value::Num(n) => format_number(*n),
            Value::Bool(b) => b.to_string(),
        }
    }

    fn to_number(&self, value: &Value) -> f64 {
        match value {
            Value::Num(n) => *n,
            Value::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            other => self.to_str(other).trim().parse().unwrap_or(f64::NAN),
        }
    }

    fn to_bool(&self, value: &Value) -> bool {
        match value {
            Value::Nodes(nodes) => !nodes.is_empty(),
            Value::Str(s) => !s.is_empty(),
            Value::Num(n) => *n != 0.0 && !n.is_nan(),
            Value::Bool(b) => *b,
        }
    }

    fn sort_key(&self, node: &XNode) -> (usize, usize) {
        let order = self.order.get_or_init(|| {
            self.tree
                .root()
                .descendants()
                .enumerate()
                .map(|(i, n)| (n.id(), i))
                .collect()
        });

        match node {
            XNode::Node(id) => (order.get(id).copied().unwrap_or(usize::MAX), 0),
            XNode::Attr(owner, name) => {
                let rank = self
                    .get(*owner)
                    .and_then(|n| n.value().as_element())
                    .and_then(|e| e.attrs().position(|(n, _)| n == name.as_str()))
                    .unwrap_or(0);
                (order.get(owner).copied().unwrap_or(usize::MAX), rank + 1)
            }
        }
    }

    fn document_order(&self, mut nodes: Vec<XNode>) -> Vec<XNode> {
        nodes.sort_by_key(|n| self.sort_key(n));
        nodes.dedup();
        nodes
    }

    fn eval(&self, expr: &Expr, ctx: &Context) -> Value {
        match expr {
            Expr::Path { absolute, steps } => {
                let start = if *absolute {
                    XNode::Node(self.tree.root().id())
                } else {
                    ctx.node.clone()
                };
                Value::Nodes(self.apply_steps(vec![start], steps))
            }
            Expr::Filter {
                base,
                predicates,
                steps,
            } => {
                let Value::Nodes(nodes) = self.eval(base, ctx) else {
                    return Value::Nodes(Vec::new());
                };
                let nodes = self.apply_predicates(self.document_order(nodes), predicates);
                Value::Nodes(self.apply_steps(nodes, steps))
            }
            Expr::Union(members) => {
                let mut all = Vec::new();
                for member in members {
                    if let Value::Nodes(nodes) = self.eval(member, ctx) {
                        all.extend(nodes);
                    }
                }
                Value::Nodes(self.document_order(all))
            }
            Expr::Or(a, b) => {
                Value::Bool(self.to_bool(&self.eval(a, ctx)) || self.to_bool(&self.eval(b, ctx)))
            }
            Expr::And(a, b) => {
                Value::Bool(self.to_bool(&self.eval(a, ctx)) && self.to_bool(&self.eval(b, ctx)))
            }
            Expr::Compare(op, a, b) => {
                let (a, b) = (self.eval(a, ctx), self.eval(b, ctx));
                Value::Bool(self.compare(*op, &a, &b))
            }
            Expr::Literal(s) => Value::Str(s.clone()),
            Expr::Number(n) => Value::Num(*n),
            Expr::Call(function, args) => self.call(*function, args, ctx),
        }
    }

    fn apply_steps(&self, mut nodes: Vec<XNode>, steps: &[Step]) -> Vec<XNode> {
        for step in steps {
            let mut next = Vec::new();
            for node in &nodes {
                let candidates: Vec<XNode> = self
                    .axis(node, step.axis)
                    .into_iter()
                    .filter(|n| self.matches(n, step.axis, &step.test))
                    .collect();
                next.extend(self.apply_predicates(candidates, &step.predicates));
            }
            nodes = self.document_order(next);
        }
        nodes
    }

    fn apply_predicates(&self, mut nodes: Vec<XNode>, predicates: &[Expr]) -> Vec<XNode> {
        for predicate in predicates {
            let size = nodes.len();
            nodes = nodes
                .into_iter()
                .enumerate()
                .filter(|(i, node)| {
                    let ctx = Context {
                        node: node.clone(),
                        position: i + 1,
                        size,
                    };
                    match self.eval(predicate, &ctx) {
                        Value::Num(n) => n == (i + 1) as f64,
                        other => self.to_bool(&other),
                    }
                })
                .map(|(_, node)| node)
                .collect();
        }
        nodes
    }

    /// Nodes along `axis`, in proximity order
    fn axis(&self, node: &XNode, axis: Axis) -> Vec<XNode> {
        let id = match node {
            XNode::Node(id) => *id,
            XNode::Attr(owner, _) => {
                return match axis {
                    Axis::SelfAxis => vec![node.clone()],
                    Axis::Parent => vec![XNode::Node(*owner)],
                    Axis::Ancestor | Axis::AncestorOrSelf => {
                        let mut chain = Vec::new();
                        if axis == Axis::AncestorOrSelf {
                            chain.push(node.clone());
                        }
                        chain.push(XNode::Node(*owner));
                        chain.extend(self.axis(&XNode::Node(*owner), Axis::Ancestor));
                        chain
                    }
                    _ => Vec::new(),
                };
            }
        };

        let Some(n) = self.get(id) else {
            return Vec::new();
        };
        let ids = |iter: &mut dyn Iterator<Item = NodeRef<'a, Node>>| -> Vec<XNode> {
            iter.map(|n| XNode::Node(n.id())).collect()
        };

        match axis {
            Axis::Child => ids(&mut n.children()),
            Axis::Descendant => ids(&mut n.descendants().skip(1)),
            Axis::DescendantOrSelf => ids(&mut n.descendants()),
            Axis::SelfAxis => vec![XNode::Node(id)],
            Axis::Parent => ids(&mut n.parent().into_iter()),
            Axis::Ancestor => ids(&mut n.ancestors()),
            Axis::AncestorOrSelf => ids(&mut std::iter::once(n).chain(n.ancestors())),
            Axis::FollowingSibling => ids(&mut n.next_siblings()),
            Axis::PrecedingSibling => ids(&mut n.prev_siblings()),
            Axis::Attribute => match n.value().as_element() {
                Some(el) => el
                    .attrs()
                    .map(|(name, _)| XNode::Attr(id, name.to_string()))
                    .collect(),
                None => Vec::new(),
            },
        }
    }

    fn matches(&self, node: &XNode, axis: Axis, test: &NodeTest) -> bool {
        match node {
            XNode::Attr(_, name) => match test {
                NodeTest::Name(wanted) => name.eq_ignore_ascii_case(wanted),
                NodeTest::Any | NodeTest::Node => true,
                _ => false,
            },
            XNode::Node(id) => {
                let Some(n) = self.get(*id) else {
                    return false;
                };
                match (test, n.value()) {
                    (NodeTest::Node, _) => axis != Axis::Attribute,
                    (NodeTest::Name(wanted), Node::Element(el)) => {
                        el.name().eq_ignore_ascii_case(wanted)
                    }
                    (NodeTest::Any, Node::Element(_)) => true,
                    (NodeTest::Text, Node::Text(_)) => true,
                    (NodeTest::Comment, Node::Comment(_)) => true,
                    _ => false,
                }
            }
        }
    }

    fn compare(&self, op: CmpOp, a: &Value, b: &Value) -> bool {
        match (a, b) {
            (Value::Nodes(xs), Value::Nodes(ys)) => xs.iter().any(|x| {
                let left = Value::Str(self.string_value(x));
                ys.iter()
                    .any(|y| self.compare_atoms(op, &left, &Value::Str(self.string_value(y))))
            }),
            (Value::Nodes(xs), Value::Bool(_)) => {
                self.compare_atoms(op, &Value::Bool(!xs.is_empty()), b)
            }
            (Value::Bool(_), Value::Nodes(ys)) => {
                self.compare_atoms(op, a, &Value::Bool(!ys.is_empty()))
            }
            (Value::Nodes(xs), _) => xs
                .iter()
                .any(|x| self.compare_atoms(op, &Value::Str(self.string_value(x)), b)),
            (_, Value::Nodes(ys)) => ys
                .iter()
                .any(|y| self.compare_atoms(op, a, &Value::Str(self.string_value(y)))),
            _ => self.compare_atoms(op, a, b),
        }
    }

    fn compare_atoms(&self, op: CmpOp, a: &Value, b: &Value) -> bool {
        match op {
            CmpOp::Eq | CmpOp::NotEq => {
                let equal = if matches!(a, Value::Bool(_)) || matches!(b, Value::Bool(_)) {
                    self.to_bool(a) == self.to_bool(b)
                } else if matches!(a, Value::Num(_)) || matches!(b, Value::Num(_)) {
                    self.to_number(a) == self.to_number(b)
                } else {
                    self.to_str(a) == self.to_str(b)
                };
                equal == (op == CmpOp::Eq)
            }
            _ => {
                let (x, y) = (self.to_number(a), self.to_number(b));
                match op {
                    CmpOp::Lt => x < y,
                    CmpOp::Gt => x > y,
                    CmpOp::Le => x <= y,
                    _ => x >= y,
                }
            }
        }
    }

    /// First argument as a string, or the context node's string value
    fn string_arg(&self, args: &[Expr], ctx: &Context) -> String {
        match args.first() {
            Some(arg) => self.to_str(&self.eval(arg, ctx)),
            None => self.string_value(&ctx.node),
        }
    }

    fn call(&self, function: Function, args: &[Expr], ctx: &Context) -> Value {
        let string_at = |i: usize| self.to_str(&self.eval(&args[i], ctx));

        match function {
            Function::Last => Value::Num(ctx.size as f64),
            Function::Position => Value::Num(ctx.position as f64),
            Function::Count => match self.eval(&args[0], ctx) {
                Value::Nodes(nodes) => Value::Num(nodes.len() as f64),
                _ => Value::Num(f64::NAN),
            },
            Function::String => Value::Str(self.string_arg(args, ctx)),
            Function::Concat => Value::Str((0..args.len()).map(string_at).collect()),
            Function::Contains => Value::Bool(string_at(0).contains(&string_at(1))),
            Function::StartsWith => Value::Bool(string_at(0).starts_with(&string_at(1))),
            Function::EndsWith => Value::Bool(string_at(0).ends_with(&string_at(1))),
            Function::Not => Value::Bool(!self.to_bool(&self.eval(&args[0], ctx))),
            Function::True => Value::Bool(true),
            Function::False => Value::Bool(false),
            Function::NormalizeSpace => Value::Str(
                self.string_arg(args, ctx)
                    .split_whitespace()
                    .collect::<Vec<_>>()
                    .join(" "),
            ),
            Function::StringLength => {
                Value::Num(self.string_arg(args, ctx).chars().count() as f64)
            }
            Function::Translate => {
                let from: Vec<char> = string_at(1).chars().collect();
                let to: Vec<char> = string_at(2).chars().collect();
                Value::Str(
                    string_at(0)
                        .chars()
                        .filter_map(|c| match from.iter().position(|f| *f == c) {
                            Some(i) => to.get(i).copied(),
                            None => Some(c),
                        })
                        .collect(),
                )
            }
            Function::Name => match args.first() {
                Some(arg) => match self.eval(arg, ctx) {
                    Value::Nodes(nodes) => Value::Str(
                        nodes.first().map(|n| self.node_name(n)).unwrap_or_default(),
                    ),
                    _ => Value::Str(String::new()),
                },
                None => Value::Str(self.node_name(&ctx.node)),
            },
        }
    }
}
