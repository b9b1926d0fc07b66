//! XPath construction and a small XPath 1.0 evaluator
//!
//! The evaluator backs [`DomTree`]. It covers location paths over the child, descendant, self and
//! parent axes with name tests and predicates. Predicates support `and`/`or`, `=`/`!=`,
//! positions, `@attr`, `.`, `text()`, child names, and the functions `contains`, `starts-with`,
//! `not`, `normalize-space`, `string`, `concat`, `position` and `last`.

use crate::dom::tree::DomTree;
use crate::error::{BrowserError, Result};

/// Quote `value` as an XPath string literal
pub fn literal(value: &str) -> String {
    if !value.contains('"') {
        return format!("\"{}\"", value);
    }
    if !value.contains('\'') {
        return format!("'{}'", value);
    }

    // Both quote kinds: stitch the pieces together with concat()
    let parts: Vec<String> = value.split('"').map(|part| format!("\"{}\"", part)).collect();
    format!("concat({})", parts.join(", '\"', "))
}

/// `//tag[contains(., "text")]`, or just `//tag` when `text` is empty
pub fn tag_with_text(tag_name: &str, text: Option<&str>) -> String {
    match text.filter(|text| !text.is_empty()) {
        Some(text) => format!("//{}[contains(., {})]", tag_name, literal(text)),
        None => format!("//{}", tag_name),
    }
}

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
    Dot,
    DotDot,
    Star,
    Eq,
    NotEq,
    Pipe,
    Literal(String),
    Number(f64),
    Name(String),
}

fn tokenize(expr: &str) -> std::result::Result<Vec<Token>, String> {
    let chars: Vec<char> = expr.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\n' | '\r' => i += 1,
            '/' if chars.get(i + 1) == Some(&'/') => {
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
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            '|' => {
                tokens.push(Token::Pipe);
                i += 1;
            }
            '=' => {
                tokens.push(Token::Eq);
                i += 1;
            }
            '!' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::NotEq);
                i += 2;
            }
            '.' if chars.get(i + 1) == Some(&'.') => {
                tokens.push(Token::DotDot);
                i += 2;
            }
            '.' if !chars.get(i + 1).is_some_and(char::is_ascii_digit) => {
                tokens.push(Token::Dot);
                i += 1;
            }
            '"' | '\'' => {
                let end = chars[i + 1..]
                    .iter()
                    .position(|other| *other == c)
                    .ok_or_else(|| "unterminated string literal".to_string())?;
                tokens.push(Token::Literal(chars[i + 1..i + 1 + end].iter().collect()));
                i += end + 2;
            }
            c if c.is_ascii_digit() || c == '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let number = text.parse::<f64>().map_err(|_| format!("invalid number '{}'", text))?;
                tokens.push(Token::Number(number));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || matches!(chars[i], '_' | '-' | ':')) {
                    // A '::' axis separator is not part of the name
                    if chars[i] == ':' && chars.get(i + 1) == Some(&':') {
                        break;
                    }
                    i += 1;
                }
                tokens.push(Token::Name(chars[start..i].iter().collect()));
            }
            other => return Err(format!("unexpected character '{}'", other)),
        }
    }

    Ok(tokens)
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Axis {
    Child,
    DescendantOrSelf,
    SelfNode,
    Parent,
}

#[derive(Debug, Clone, PartialEq)]
enum NameTest {
    Any,
    Tag(String),
    /// `node()` on the descendant-or-self step of `//`
    Node,
}

#[derive(Debug, Clone, PartialEq)]
struct Step {
    axis: Axis,
    test: NameTest,
    predicates: Vec<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
struct LocationPath {
    absolute: bool,
    steps: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Or(Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Eq(Box<Expr>, Box<Expr>),
    NotEq(Box<Expr>, Box<Expr>),
    Literal(String),
    Number(f64),
    Attribute(String),
    ContextNode,
    Text,
    Path(LocationPath),
    Call(String, Vec<Expr>),
}

/// Intermediate values while evaluating a predicate
#[derive(Debug, Clone)]
enum Value {
    /// Node-set, reduced to the string values of its members
    Strings(Vec<String>),
    Str(String),
    Num(f64),
    Bool(bool),
}

impl Value {
    fn truthy(&self) -> bool {
        match self {
            Value::Strings(values) => !values.is_empty(),
            Value::Str(s) => !s.is_empty(),
            Value::Num(n) => *n != 0.0 && !n.is_nan(),
            Value::Bool(b) => *b,
        }
    }

    fn string(&self) -> String {
        match self {
            Value::Strings(values) => values.first().cloned().unwrap_or_default(),
            Value::Str(s) => s.clone(),
            Value::Num(n) if n.fract() == 0.0 => format!("{}", *n as i64),
            Value::Num(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
        }
    }

    fn number(&self) -> f64 {
        match self {
            Value::Num(n) => *n,
            Value::Bool(b) => f64::from(u8::from(*b)),
            other => other.string().trim().parse().unwrap_or(f64::NAN),
        }
    }
}

fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Strings(a), Value::Strings(b)) => a.iter().any(|x| b.contains(x)),
        (Value::Strings(set), other) | (other, Value::Strings(set)) => match other {
            Value::Num(n) => set.iter().any(|s| s.trim().parse::<f64>().ok() == Some(*n)),
            Value::Bool(b) => !set.is_empty() == *b,
            _ => {
                let other = other.string();
                set.iter().any(|s| *s == other)
            }
        },
        (Value::Bool(_), _) | (_, Value::Bool(_)) => left.truthy() == right.truthy(),
        (Value::Num(_), _) | (_, Value::Num(_)) => left.number() == right.number(),
        _ => left.string() == right.string(),
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn expect(&mut self, expected: Token) -> std::result::Result<(), String> {
        match self.next() {
            Some(token) if token == expected => Ok(()),
            Some(token) => Err(format!("expected {:?}, found {:?}", expected, token)),
            None => Err(format!("expected {:?}, found end of expression", expected)),
        }
    }

    fn peek_name(&self, name: &str) -> bool {
        matches!(self.peek(), Some(Token::Name(n)) if n == name)
    }

    fn location_path(&mut self) -> std::result::Result<LocationPath, String> {
        let mut absolute = false;
        let mut steps = Vec::new();

        match self.peek() {
            Some(Token::Slash) => {
                self.pos += 1;
                absolute = true;
            }
            Some(Token::DoubleSlash) => {
                self.pos += 1;
                absolute = true;
                steps.push(Step { axis: Axis::DescendantOrSelf, test: NameTest::Node, predicates: Vec::new() });
            }
            _ => {}
        }

        steps.push(self.step()?);

        loop {
            match self.peek() {
                Some(Token::Slash) => {
                    self.pos += 1;
                }
                Some(Token::DoubleSlash) => {
                    self.pos += 1;
                    steps.push(Step { axis: Axis::DescendantOrSelf, test: NameTest::Node, predicates: Vec::new() });
                }
                _ => break,
            }
            steps.push(self.step()?);
        }

        Ok(LocationPath { absolute, steps })
    }

    fn step(&mut self) -> std::result::Result<Step, String> {
        let (axis, test) = match self.next() {
            Some(Token::Dot) => (Axis::SelfNode, NameTest::Node),
            Some(Token::DotDot) => (Axis::Parent, NameTest::Node),
            Some(Token::Star) => (Axis::Child, NameTest::Any),
            Some(Token::Name(name)) if name == "node" && self.peek() == Some(&Token::LParen) => {
                self.expect(Token::LParen)?;
                self.expect(Token::RParen)?;
                (Axis::Child, NameTest::Any)
            }
            Some(Token::Name(name)) if name == "text" && self.peek() == Some(&Token::LParen) => {
                return Err("text() cannot be selected as an element".to_string());
            }
            Some(Token::Name(name)) => (Axis::Child, NameTest::Tag(name.to_ascii_lowercase())),
            Some(Token::At) => return Err("attribute nodes cannot be selected as elements".to_string()),
            Some(token) => return Err(format!("unexpected {:?} in location step", token)),
            None => return Err("expression ends with an incomplete location step".to_string()),
        };

        let mut predicates = Vec::new();
        while self.peek() == Some(&Token::LBracket) {
            self.pos += 1;
            predicates.push(self.or_expr()?);
            self.expect(Token::RBracket)?;
        }

        Ok(Step { axis, test, predicates })
    }

    fn or_expr(&mut self) -> std::result::Result<Expr, String> {
        let mut left = self.and_expr()?;
        while self.peek_name("or") {
            self.pos += 1;
            let right = self.and_expr()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> std::result::Result<Expr, String> {
        let mut left = self.equality_expr()?;
        while self.peek_name("and") {
            self.pos += 1;
            let right = self.equality_expr()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn equality_expr(&mut self) -> std::result::Result<Expr, String> {
        let left = self.primary()?;
        match self.peek() {
            Some(Token::Eq) => {
                self.pos += 1;
                Ok(Expr::Eq(Box::new(left), Box::new(self.primary()?)))
            }
            Some(Token::NotEq) => {
                self.pos += 1;
                Ok(Expr::NotEq(Box::new(left), Box::new(self.primary()?)))
            }
            _ => Ok(left),
        }
    }

    fn primary(&mut self) -> std::result::Result<Expr, String> {
        match self.peek().cloned() {
            Some(Token::LParen) => {
                self.pos += 1;
                let inner = self.or_expr()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Literal(value)) => {
                self.pos += 1;
                Ok(Expr::Literal(value))
            }
            Some(Token::Number(value)) => {
                self.pos += 1;
                Ok(Expr::Number(value))
            }
            Some(Token::At) => {
                self.pos += 1;
                match self.next() {
                    Some(Token::Name(name)) => Ok(Expr::Attribute(name.to_ascii_lowercase())),
                    other => Err(format!("expected attribute name after '@', found {:?}", other)),
                }
            }
            Some(Token::Dot) if !matches!(self.tokens.get(self.pos + 1), Some(Token::Slash | Token::DoubleSlash)) => {
                self.pos += 1;
                Ok(Expr::ContextNode)
            }
            Some(Token::Name(name)) if self.tokens.get(self.pos + 1) == Some(&Token::LParen) => {
                self.pos += 2;
                if name == "text" {
                    self.expect(Token::RParen)?;
                    return Ok(Expr::Text);
                }
                let mut args = Vec::new();
                if self.peek() != Some(&Token::RParen) {
                    args.push(self.or_expr()?);
                    while self.peek() == Some(&Token::Comma) {
                        self.pos += 1;
                        args.push(self.or_expr()?);
                    }
                }
                self.expect(Token::RParen)?;
                check_function(&name, args.len())?;
                Ok(Expr::Call(name, args))
            }
            Some(Token::Name(_) | Token::Star | Token::Slash | Token::DoubleSlash | Token::Dot | Token::DotDot) => {
                Ok(Expr::Path(self.location_path()?))
            }
            Some(token) => Err(format!("unexpected {:?} in predicate", token)),
            None => Err("predicate ends unexpectedly".to_string()),
        }
    }
}

fn check_function(name: &str, arity: usize) -> std::result::Result<(), String> {
    let ok = match name {
        "contains" | "starts-with" => arity == 2,
        "not" => arity == 1,
        "normalize-space" | "string" => arity <= 1,
        "concat" => arity >= 2,
        "position" | "last" => arity == 0,
        _ => return Err(format!("unsupported function {}()", name)),
    };
    if ok {
        Ok(())
    } else {
        Err(format!("wrong number of arguments for {}()", name))
    }
}

/// A compiled XPath expression selecting elements
#[derive(Debug, Clone, PartialEq)]
pub struct XPath {
    source: String,
    paths: Vec<LocationPath>,
}

impl XPath {
    pub fn parse(expr: &str) -> Result<Self> {
        let invalid = |reason: String| BrowserError::InvalidSelector { selector: expr.to_string(), reason };

        let tokens = tokenize(expr).map_err(invalid)?;
        if tokens.is_empty() {
            return Err(invalid("empty expression".to_string()));
        }

        let mut parser = Parser { tokens, pos: 0 };
        let mut paths = vec![parser.location_path().map_err(invalid)?];
        while parser.peek() == Some(&Token::Pipe) {
            parser.pos += 1;
            paths.push(parser.location_path().map_err(invalid)?);
        }
        if let Some(token) = parser.peek() {
            return Err(invalid(format!("unexpected trailing {:?}", token)));
        }

        Ok(Self { source: expr.to_string(), paths })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Element node ids of `tree` matched by the expression, in document order
    pub(crate) fn select(&self, tree: &DomTree) -> Result<Vec<usize>> {
        let mut out = Vec::new();
        for path in &self.paths {
            out.extend(eval_path(tree, path, 0));
        }
        out.retain(|node| tree.tag_of(*node).is_some());
        out.sort_unstable();
        out.dedup();
        Ok(out)
    }
}

fn eval_path(tree: &DomTree, path: &LocationPath, context: usize) -> Vec<usize> {
    let mut current = vec![if path.absolute { 0 } else { context }];

    for step in &path.steps {
        let mut next = Vec::new();
        for node in &current {
            let candidates: Vec<usize> = axis_nodes(tree, step.axis, *node)
                .into_iter()
                .filter(|candidate| matches_test(tree, &step.test, *candidate))
                .collect();
            next.extend(apply_predicates(tree, candidates, &step.predicates));
        }
        next.sort_unstable();
        next.dedup();
        current = next;
    }

    current
}

fn axis_nodes(tree: &DomTree, axis: Axis, node: usize) -> Vec<usize> {
    match axis {
        Axis::Child => tree.element_children(node).collect(),
        Axis::SelfNode => vec![node],
        Axis::Parent => tree.node(node).parent.into_iter().collect(),
        Axis::DescendantOrSelf => {
            let mut out = vec![node];
            let mut stack: Vec<usize> = tree.element_children(node).collect();
            stack.reverse();
            while let Some(next) = stack.pop() {
                out.push(next);
                let mut children: Vec<usize> = tree.element_children(next).collect();
                children.reverse();
                stack.extend(children);
            }
            out
        }
    }
}

fn matches_test(tree: &DomTree, test: &NameTest, node: usize) -> bool {
    match test {
        NameTest::Node => true,
        NameTest::Any => tree.tag_of(node).is_some(),
        NameTest::Tag(tag) => tree.tag_of(node) == Some(tag.as_str()),
    }
}

fn apply_predicates(tree: &DomTree, mut nodes: Vec<usize>, predicates: &[Expr]) -> Vec<usize> {
    for predicate in predicates {
        let size = nodes.len();
        nodes = nodes
            .into_iter()
            .enumerate()
            .filter(|(index, node)| {
                let ctx = Context { node: *node, position: index + 1, size };
                match eval(tree, predicate, &ctx) {
                    Value::Num(n) => n == (index + 1) as f64,
                    other => other.truthy(),
                }
            })
            .map(|(_, node)| node)
            .collect();
    }
    nodes
}

struct Context {
    node: usize,
    position: usize,
    size: usize,
}

fn eval(tree: &DomTree, expr: &Expr, ctx: &Context) -> Value {
    match expr {
        Expr::Or(a, b) => Value::Bool(eval(tree, a, ctx).truthy() || eval(tree, b, ctx).truthy()),
        Expr::And(a, b) => Value::Bool(eval(tree, a, ctx).truthy() && eval(tree, b, ctx).truthy()),
        Expr::Eq(a, b) => Value::Bool(values_equal(&eval(tree, a, ctx), &eval(tree, b, ctx))),
        Expr::NotEq(a, b) => Value::Bool(!values_equal(&eval(tree, a, ctx), &eval(tree, b, ctx))),
        Expr::Literal(s) => Value::Str(s.clone()),
        Expr::Number(n) => Value::Num(*n),
        Expr::Attribute(name) => {
            Value::Strings(tree.attribute_of(ctx.node, name).map(str::to_string).into_iter().collect())
        }
        Expr::ContextNode => Value::Strings(vec![tree.string_value(ctx.node)]),
        Expr::Text => Value::Strings(tree.text_children(ctx.node)),
        Expr::Path(path) => {
            Value::Strings(eval_path(tree, path, ctx.node).into_iter().map(|node| tree.string_value(node)).collect())
        }
        Expr::Call(name, args) => call(tree, name, args, ctx),
    }
}

fn call(tree: &DomTree, name: &str, args: &[Expr], ctx: &Context) -> Value {
    let arg = |index: usize| -> Value {
        match args.get(index) {
            Some(expr) => eval(tree, expr, ctx),
            None => Value::Strings(vec![tree.string_value(ctx.node)]),
        }
    };

    match name {
        "contains" => Value::Bool(arg(0).string().contains(&arg(1).string())),
        "starts-with" => Value::Bool(arg(0).string().starts_with(&arg(1).string())),
        "not" => Value::Bool(!arg(0).truthy()),
        "normalize-space" => Value::Str(arg(0).string().split_whitespace().collect::<Vec<_>>().join(" ")),
        "string" => Value::Str(arg(0).string()),
        "concat" => Value::Str((0..args.len()).map(|index| arg(index).string()).collect()),
        "position" => Value::Num(ctx.position as f64),
        "last" => Value::Num(ctx.size as f64),
        _ => Value::Bool(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::page::Page;

    fn tree() -> DomTree {
        DomTree::parse(
            r#"<div id="main" class="container">
                <ul>
                    <li class="item first">One</li>
                    <li class="item">Two <b>bold</b></li>
                    <li class="item last" data-x="y">Three</li>
                </ul>
                <form><input name="q" type="text"><input name="go" type="submit"></form>
                <p>He said "it's fine"</p>
            </div>"#,
        )
        .unwrap()
    }

    fn count(tree: &DomTree, xpath: &str) -> usize {
        tree.find_by_xpath(xpath).unwrap().len()
    }

    fn texts(tree: &DomTree, xpath: &str) -> Vec<String> {
        tree.find_by_xpath(xpath).unwrap().iter().map(|e| tree.text(e).unwrap()).collect()
    }

    #[test]
    fn test_literal_quoting() {
        assert_eq!(literal("plain"), "\"plain\"");
        assert_eq!(literal("say \"hi\""), "'say \"hi\"'");
        assert_eq!(literal("it's \"x\""), "concat(\"it's \", '\"', \"x\", '\"', \"\")");
    }

    #[test]
    fn test_tag_with_text() {
        assert_eq!(tag_with_text("button", Some("Submit")), "//button[contains(., \"Submit\")]");
        assert_eq!(tag_with_text("input", Some("")), "//input");
        assert_eq!(tag_with_text("input", None), "//input");
    }

    #[test]
    fn test_paths() {
        let tree = tree();
        assert_eq!(count(&tree, "//li"), 3);
        assert_eq!(count(&tree, "/html/body/div/ul/li"), 3);
        assert_eq!(count(&tree, "//ul/*"), 3);
        assert_eq!(count(&tree, "//div//input"), 2);
        assert_eq!(count(&tree, "//b/.."), 1);
        assert_eq!(count(&tree, "//li | //p"), 4);
        assert_eq!(count(&tree, "//table"), 0);
    }

    #[test]
    fn test_attribute_predicates() {
        let tree = tree();
        assert_eq!(count(&tree, "//input[@name='q']"), 1);
        assert_eq!(count(&tree, "//li[@data-x]"), 1);
        assert_eq!(count(&tree, "//li[not(@data-x)]"), 2);
        assert_eq!(count(&tree, "//input[@name='q' or @type='submit']"), 2);
        assert_eq!(count(&tree, "//input[@name='q' and @type='submit']"), 0);
        assert_eq!(count(&tree, "//li[@class!='item']"), 2);
        assert_eq!(count(&tree, "//li[contains(@class, 'last')]"), 1);
        assert_eq!(count(&tree, "//*[@id=\"main\"]"), 1);
    }

    #[test]
    fn test_text_predicates() {
        let tree = tree();
        assert_eq!(texts(&tree, "//li[contains(., 'bold')]"), vec!["Two bold"]);
        assert_eq!(texts(&tree, "//li[text()='One']"), vec!["One"]);
        assert_eq!(texts(&tree, "//li[normalize-space(text())='Two']"), vec!["Two bold"]);
        assert_eq!(texts(&tree, "//li[starts-with(., 'Th')]"), vec!["Three"]);
        assert_eq!(count(&tree, "//p[contains(., concat('it', \"'s\"))]"), 1);
        assert_eq!(count(&tree, "//li[b]"), 1);
    }

    #[test]
    fn test_positions() {
        let tree = tree();
        assert_eq!(texts(&tree, "//li[1]"), vec!["One"]);
        assert_eq!(texts(&tree, "//li[last()]"), vec!["Three"]);
        assert_eq!(texts(&tree, "//li[position() = 2]"), vec!["Two bold"]);
        assert_eq!(count(&tree, "//input[2]"), 1);
    }

    #[test]
    fn test_invalid_expressions() {
        for bad in ["", "//li[", "//li[@]", "//@class", "//li/text()", "//li[foo()]", "//li[\"x]"] {
            let err = XPath::parse(bad).unwrap_err();
            assert!(matches!(err, BrowserError::InvalidSelector { .. }), "{}", bad);
        }
    }
}
