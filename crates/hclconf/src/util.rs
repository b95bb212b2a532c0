use crate::visit::VisitTraversals;
use hcl::{Expression, Traversal, TraversalOperator};

pub(crate) trait TraversalExt {
    fn root_name(&self) -> Option<&str>;
    fn get_longest_path(&self) -> Vec<String>;
}

impl TraversalExt for Traversal {
    fn root_name(&self) -> Option<&str> {
        let Expression::Variable(var) = &self.expr else {
            return None;
        };

        Some(var.as_str())
    }

    /// Longest static prefix: the root variable followed by attribute names and literal keys
    ///
    /// `group.type1["default"].value[0]` gives `[group, type1, default, value]`
    fn get_longest_path(&self) -> Vec<String> {
        let Some(root) = self.root_name() else {
            return vec![];
        };

        let mut path = vec![root.to_string()];
        for operator in &self.operators {
            match operator {
                TraversalOperator::GetAttr(ident) => path.push(ident.to_string()),
                TraversalOperator::Index(Expression::String(key)) => path.push(key.clone()),
                _ => break,
            }
        }

        path
    }
}

/// Every traversal in `expr` referencing the evaluation context
pub(crate) fn references(expr: &Expression) -> Vec<Traversal> {
    let mut traversals = vec![];
    expr.visit_traversals(&mut |traversal: &Traversal| traversals.push(traversal.clone()));
    traversals
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn longest_path() {
        let traversal = Traversal::builder(hcl::Variable::unchecked("group"))
            .attr("type1")
            .index("default")
            .attr("value")
            .index(0)
            .attr("ignored")
            .build();

        assert_eq!(
            traversal.get_longest_path(),
            vec!["group", "type1", "default", "value"]
        );
        assert_eq!(traversal.root_name(), Some("group"));
    }

    #[test]
    fn references_of_an_expression() {
        let expr: Expression = "a.b + c"
            .parse::<hcl_edit::expr::Expression>()
            .expect("valid expression")
            .into();

        let paths: Vec<_> = references(&expr)
            .iter()
            .map(TraversalExt::get_longest_path)
            .collect();
        assert_eq!(paths, vec![vec!["a", "b"], vec!["c"]]);
    }
}
