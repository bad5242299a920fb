//! Strict name resolution over the parsed template
//!
//! tera only errors on an unknown name when it is printed. In conditions,
//! through `default(...)` or behind `is defined` it quietly evaluates to
//! nothing, so every name is resolved here before rendering.

use super::TemplateData;
use tera::ast::{Expr, ExprVal, FunctionCall, Node, Test};

type Check = Result<(), String>;

/// Fail on the first name that is neither template data nor a local
/// (`for` variables, `loop`, `set` targets), and on the constructs that
/// tolerate missing names.
pub(super) fn check(nodes: &[Node], data: &TemplateData) -> Check {
    let mut scope = Scope {
        data,
        locals: Vec::new(),
    };
    scope.nodes(nodes)
}

struct Scope<'a> {
    data: &'a TemplateData,
    locals: Vec<String>,
}

impl Scope<'_> {
    fn nodes(&mut self, nodes: &[Node]) -> Check {
        for node in nodes {
            self.node(node)?;
        }
        Ok(())
    }

    fn node(&mut self, node: &Node) -> Check {
        match node {
            Node::VariableBlock(_, expr) => self.expr(expr),
            Node::If(branches, _) => {
                for (_, condition, body) in &branches.conditions {
                    self.expr(condition)?;
                    self.nodes(body)?;
                }
                match &branches.otherwise {
                    Some((_, body)) => self.nodes(body),
                    None => Ok(()),
                }
            }
            Node::Forloop(_, forloop, _) => {
                self.expr(&forloop.container)?;

                let outer = self.locals.len();
                self.locals.push(forloop.value.clone());
                self.locals.extend(forloop.key.clone());
                self.locals.push("loop".to_string());
                self.nodes(&forloop.body)?;
                self.locals.truncate(outer);

                match &forloop.empty_body {
                    Some(body) => self.nodes(body),
                    None => Ok(()),
                }
            }
            Node::Set(_, set) => {
                self.expr(&set.value)?;
                self.locals.push(set.key.clone());
                Ok(())
            }
            Node::FilterSection(_, section, _) => {
                self.filter(&section.filter)?;
                self.nodes(&section.body)
            }
            Node::Block(_, block, _) => self.nodes(&block.body),
            Node::MacroDefinition(..) | Node::ImportMacro(..) => {
                Err("macros are not supported in manifest templates".to_string())
            }
            _ => Ok(()),
        }
    }

    fn expr(&self, expr: &Expr) -> Check {
        for filter in &expr.filters {
            self.filter(filter)?;
        }
        self.value(&expr.val)
    }

    fn value(&self, value: &ExprVal) -> Check {
        match value {
            ExprVal::Ident(ident) => self.ident(ident),
            ExprVal::Math(math) => {
                self.expr(&math.lhs)?;
                self.expr(&math.rhs)
            }
            ExprVal::Logic(logic) => {
                self.expr(&logic.lhs)?;
                self.expr(&logic.rhs)
            }
            ExprVal::In(within) => {
                self.expr(&within.lhs)?;
                self.expr(&within.rhs)
            }
            ExprVal::Test(test) => self.test(test),
            ExprVal::FunctionCall(call) => self.args(call),
            ExprVal::MacroCall(_) => {
                Err("macros are not supported in manifest templates".to_string())
            }
            ExprVal::Array(items) => items.iter().try_for_each(|item| self.expr(item)),
            ExprVal::StringConcat(concat) => {
                concat.values.iter().try_for_each(|part| self.value(part))
            }
            _ => Ok(()),
        }
    }

    /// `a.b` and `a["b"]` resolve through their root name.
    fn ident(&self, ident: &str) -> Check {
        let root = ident.split(['.', '[']).next().unwrap_or(ident);
        if self.data.get(root).is_some() || self.locals.iter().any(|local| local == root) {
            Ok(())
        } else {
            Err(format!("Variable `{ident}` not found in context"))
        }
    }

    fn test(&self, test: &Test) -> Check {
        if matches!(test.name.as_str(), "defined" | "undefined") {
            return Err(format!(
                "`is {}` is not supported: every referenced key must be set",
                test.name
            ));
        }
        self.ident(&test.ident)?;
        test.args.iter().try_for_each(|arg| self.expr(arg))
    }

    fn filter(&self, filter: &FunctionCall) -> Check {
        if filter.name == "default" {
            return Err(
                "the `default` filter is not supported: every referenced key must be set"
                    .to_string(),
            );
        }
        self.args(filter)
    }

    fn args(&self, call: &FunctionCall) -> Check {
        call.args.values().try_for_each(|arg| self.expr(arg))
    }
}
