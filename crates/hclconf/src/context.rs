//! evaluation context: variable namespace plus function namespace
use crate::{
    functions::Functions,
    value::{merge_variables, Object, Value},
};
use hcl::eval::Evaluate;
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct EvalContext {
    variables: Object,
    functions: Arc<Functions>,
}

impl EvalContext {
    pub fn new(variables: Object, functions: impl Into<Arc<Functions>>) -> EvalContext {
        EvalContext {
            variables,
            functions: functions.into(),
        }
    }

    /// Deep merge additional variables into this context
    pub fn merge_variables(&mut self, variables: Object) {
        merge_variables(&mut self.variables, variables);
    }

    /// Same functions, but `variables` replace the whole variable namespace
    pub fn with_variables(&self, variables: Object) -> EvalContext {
        EvalContext {
            variables,
            functions: self.functions.clone(),
        }
    }

    pub fn lookup(&self, path: &[&str]) -> Option<&Value> {
        let (first, rest) = path.split_first()?;
        self.variables.get(*first)?.get_path(rest)
    }

    /// Evaluate an expression
    ///
    /// Unknown variables are not declared, so referencing them fails.
    pub fn evaluate(&self, expr: &hcl::Expression) -> Result<Value, hcl::eval::Error> {
        let mut ctx = hcl::eval::Context::new();

        for (name, value) in &self.variables {
            if let Some(value) = value.to_hcl() {
                ctx.declare_var(name.as_str(), value);
            }
        }

        for (name, func) in self.functions.iter() {
            ctx.declare_func(name.as_str(), func.clone());
        }

        let value = expr.evaluate(&ctx)?;
        tracing::trace!(?expr, %value, "evaluated");
        Ok(value.into())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn expr(src: &str) -> hcl::Expression {
        src.parse::<hcl_edit::expr::Expression>()
            .expect("valid expression")
            .into()
    }

    #[test]
    fn evaluates_against_variables_and_functions() {
        let variables: Object = [(
            "group".to_string(),
            Value::Object([("a".to_string(), Value::Integer(2))].into_iter().collect()),
        )]
        .into_iter()
        .collect();
        let ctx = EvalContext::new(variables, crate::functions::default_functions());

        assert_eq!(
            ctx.evaluate(&expr("group.a + 1")).expect("evaluates"),
            Value::Integer(3)
        );
        assert_eq!(
            ctx.evaluate(&expr("upper(\"x\")")).expect("evaluates"),
            Value::from("X")
        );
        assert_eq!(ctx.lookup(&["group", "a"]), Some(&Value::Integer(2)));
    }

    #[test]
    fn unknown_values_fail_evaluation() {
        let variables: Object = [("later".to_string(), Value::Unknown)]
            .into_iter()
            .collect();
        let ctx = EvalContext::new(variables, Functions::default());

        let err = ctx.evaluate(&expr("later")).expect_err("must fail");
        assert!(matches!(
            err.kind(),
            hcl::eval::ErrorKind::UndefinedVar(name) if name.as_str() == "later"
        ));
    }
}
