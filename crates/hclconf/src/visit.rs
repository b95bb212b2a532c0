//! traversals referenced by expressions
use hcl::{
    template::{Directive, Element},
    Expression, Identifier, ObjectKey, Operation, Template, Traversal, TraversalOperator,
};

/// Recursively visit all [hcl::Traversal]s that reference variables of the evaluation context
///
/// Iterator variables introduced by `for` expressions and `%{ for }` directives are local to
/// them: traversals rooted at such a variable are skipped.
pub trait VisitTraversals {
    fn visit_traversals(&self, visitor: &mut dyn FnMut(&Traversal));
}

impl VisitTraversals for Expression {
    fn visit_traversals(&self, visitor: &mut dyn FnMut(&Traversal)) {
        expression(self, visitor, &mut Vec::new());
    }
}

type Scope = Vec<Identifier>;

fn expression(expr: &Expression, visitor: &mut dyn FnMut(&Traversal), scope: &mut Scope) {
    match expr {
        Expression::Variable(variable) => {
            if scope.iter().any(|local| local.as_str() == variable.as_str()) {
                return;
            }

            // a standalone variable is a traversal with no operators...kind of
            let traversal = Traversal::new(
                Expression::Variable(variable.clone()),
                Vec::<TraversalOperator>::new(),
            );
            visitor(&traversal);
        }
        Expression::Traversal(traversal) => {
            match &traversal.expr {
                Expression::Variable(variable) => {
                    if !scope.iter().any(|local| local.as_str() == variable.as_str()) {
                        visitor(traversal);
                    }
                }
                other => expression(other, visitor, scope),
            }

            for operator in &traversal.operators {
                if let TraversalOperator::Index(index) = operator {
                    expression(index, visitor, scope);
                }
            }
        }
        Expression::Array(array) => {
            for expr in array {
                expression(expr, visitor, scope);
            }
        }
        Expression::Object(object) => {
            for (key, value) in object {
                if let ObjectKey::Expression(key) = key {
                    expression(key, visitor, scope);
                }
                expression(value, visitor, scope);
            }
        }
        Expression::TemplateExpr(template_expr) => {
            if let Ok(parsed) = Template::from_expr(template_expr) {
                template(&parsed, visitor, scope);
            }
        }
        Expression::FuncCall(func_call) => {
            for arg in &func_call.args {
                expression(arg, visitor, scope);
            }
        }
        Expression::Parenthesis(expr) => expression(expr, visitor, scope),
        Expression::Conditional(cond) => {
            expression(&cond.cond_expr, visitor, scope);
            expression(&cond.true_expr, visitor, scope);
            expression(&cond.false_expr, visitor, scope);
        }
        Expression::Operation(operation) => match operation.as_ref() {
            Operation::Binary(binop) => {
                expression(&binop.lhs_expr, visitor, scope);
                expression(&binop.rhs_expr, visitor, scope);
            }
            Operation::Unary(unop) => expression(&unop.expr, visitor, scope),
        },
        Expression::ForExpr(forexpr) => {
            expression(&forexpr.collection_expr, visitor, scope);

            let outer = scope.len();
            scope.extend(forexpr.key_var.iter().cloned());
            scope.push(forexpr.value_var.clone());

            if let Some(key_expr) = &forexpr.key_expr {
                expression(key_expr, visitor, scope);
            }
            expression(&forexpr.value_expr, visitor, scope);
            if let Some(cond_expr) = &forexpr.cond_expr {
                expression(cond_expr, visitor, scope);
            }

            scope.truncate(outer);
        }
        _ => {}
    }
}

fn template(parsed: &Template, visitor: &mut dyn FnMut(&Traversal), scope: &mut Scope) {
    for element in parsed.elements() {
        match element {
            Element::Interpolation(interpolation) => {
                expression(&interpolation.expr, visitor, scope);
            }
            Element::Directive(directive) => match directive {
                Directive::If(ifdir) => {
                    expression(&ifdir.cond_expr, visitor, scope);
                    template(&ifdir.true_template, visitor, scope);
                    if let Some(false_template) = &ifdir.false_template {
                        template(false_template, visitor, scope);
                    }
                }
                Directive::For(fordir) => {
                    expression(&fordir.collection_expr, visitor, scope);

                    let outer = scope.len();
                    scope.extend(fordir.key_var.iter().cloned());
                    scope.push(fordir.value_var.clone());
                    template(&fordir.template, visitor, scope);
                    scope.truncate(outer);
                }
            },
            Element::Literal(_) => {}
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::util::TraversalExt;
    use pretty_assertions::assert_eq;

    fn roots(src: &str) -> Vec<String> {
        let expr: Expression = src
            .parse::<hcl_edit::expr::Expression>()
            .expect("valid expression")
            .into();

        let mut roots = vec![];
        expr.visit_traversals(&mut |traversal: &Traversal| {
            roots.extend(traversal.root_name().map(str::to_string))
        });
        roots
    }

    #[test]
    fn finds_nested_references() {
        assert_eq!(
            roots(r#"upper("${a.b}-${c}") == d[e] ? [f] : { (g) = h }"#),
            vec!["a", "c", "d", "e", "f", "g", "h"]
        );
    }

    #[test]
    fn iterator_variables_are_not_references() {
        assert_eq!(
            roots(r#"[for k, v in local.items : "${k}=${v.name}" if v.enabled && other]"#),
            vec!["local", "other"]
        );
        assert_eq!(
            roots(r#""%{ for x in list }${x}${y}%{ endfor }""#),
            vec!["list", "y"]
        );
    }
}
