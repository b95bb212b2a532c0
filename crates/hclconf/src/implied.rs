//! implied variables: values of other blocks, addressable from any expression
//!
//! Every attribute of every block described by the target descriptor becomes a variable at
//! `block_type.label1.label2.attribute`:
//!
//! ```hcl
//! group "type1" "default" {
//!   value = 1
//! }
//!
//! group "type2" "default" {
//!   value = group.type1.default.value + 1
//! }
//! ```
//!
//! There is no dependency analysis. All attributes are evaluated against what is known so far;
//! whatever fails to evaluate is unknown in this pass. The pass is repeated with the results of
//! the previous one until nothing is unknown anymore or [CIRCUIT_BREAK] passes were made.
use crate::{
    body::{Block, Body},
    context::EvalContext,
    descriptor::{Decode, Field},
    diagnostic::{Diagnostic, Diagnostics},
    value::{merge_variables, Object, Value},
};

/// Maximum number of evaluation passes
pub const CIRCUIT_BREAK: usize = 100;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ImpliedVariables {
    pub variables: Object,
    /// number of evaluation passes
    pub iterations: usize,
}

/// Resolve the implied variables of `body` as seen through the descriptor of `T`
///
/// `ctx` is not modified, the result is meant to be merged into it.
#[tracing::instrument(level = "debug", skip_all, fields(ty = std::any::type_name::<T>()))]
pub fn resolve_implied_variables<T: Decode>(
    body: &Body,
    ctx: &EvalContext,
) -> (ImpliedVariables, Diagnostics) {
    let mut cloned = ctx.clone();
    let mut variables = Object::new();

    for iteration in 1..=CIRCUIT_BREAK {
        let (level, known) = implied_level::<T>(body, &cloned);
        tracing::debug!(iteration, known, "implied variables pass");

        if known {
            let implied = ImpliedVariables {
                variables: level,
                iterations: iteration,
            };
            return (implied, Diagnostics::default());
        }

        cloned.merge_variables(level.clone());
        variables = level;
    }

    tracing::warn!(passes = CIRCUIT_BREAK, "implied variables circuit break");
    let diagnostic = Diagnostic::warning(
        "Implied Variables",
        format!("circuit break! evaluated {CIRCUIT_BREAK} times, maybe cyclic reference"),
        None,
    );

    let implied = ImpliedVariables {
        variables,
        iterations: CIRCUIT_BREAK,
    };
    (implied, diagnostic.into())
}

/// One pass over one descriptor level. `false` if any value is still unknown.
pub(crate) fn implied_level<T: Decode>(body: &Body, ctx: &EvalContext) -> (Object, bool) {
    let descriptor = T::descriptor();

    let (content, _, diagnostics) = descriptor.content(body);
    if diagnostics.has_errors() {
        // reported by the decoder
        return (Object::new(), true);
    }

    let mut known = true;
    let mut variables = Object::new();

    for (name, attribute) in &content.attributes {
        let value = match ctx.evaluate(&attribute.expr) {
            Ok(value) => value,
            Err(err) => {
                tracing::trace!(attribute = %name, %err, "not known yet");
                Value::Unknown
            }
        };

        known &= value.is_wholly_known();
        variables.insert(name.clone(), value);
    }

    for field in &descriptor.fields {
        let Field::Block(block_field) = field else {
            continue;
        };

        let blocks: Vec<&Block> = content.blocks_of_type(block_field.block_type()).collect();
        if blocks.is_empty() {
            continue;
        }

        let (block_variables, block_known) = block_field.implied_variables(&blocks, ctx);
        known &= block_known;
        merge_variables(&mut variables, block_variables);
    }

    (variables, known)
}

/// Variables of block instances, nested under their labels and the block type
pub(crate) fn implied_blocks<C: Decode>(
    block_type: &str,
    blocks: &[&Block],
    ctx: &EvalContext,
) -> (Object, bool) {
    let mut known = true;
    let mut variables = Object::new();

    for block in blocks {
        let (mut current, block_known) = implied_level::<C>(&block.body, ctx);
        known &= block_known;

        for label in block.labels.iter().rev() {
            current = Object::from([(label.clone(), Value::Object(current))]);
        }

        let wrapped = Object::from([(block_type.to_string(), Value::Object(current))]);
        merge_variables(&mut variables, wrapped);
    }

    (variables, known)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{descriptor::Descriptor, functions::default_functions};
    use pretty_assertions::assert_eq;

    #[derive(Default, Debug)]
    struct Group {
        kind: String,
        name: String,
        value: i64,
    }

    impl Decode for Group {
        fn descriptor() -> Descriptor<Self> {
            Descriptor::builder()
                .label("type", |g: &mut Self| &mut g.kind)
                .label("name", |g: &mut Self| &mut g.name)
                .attribute("value", |g: &mut Self| &mut g.value)
                .build()
        }
    }

    #[derive(Default, Debug)]
    struct Config {
        groups: Vec<Group>,
    }

    impl Decode for Config {
        fn descriptor() -> Descriptor<Self> {
            Descriptor::builder()
                .blocks("group", |c: &mut Self| &mut c.groups)
                .build()
        }
    }

    fn ctx() -> EvalContext {
        EvalContext::new(Object::new(), default_functions())
    }

    fn group_value(variables: &Object, kind: &str, name: &str) -> Option<Value> {
        variables
            .get("group")
            .and_then(|group| group.get_path(&[kind, name, "value"]))
            .cloned()
    }

    #[test]
    fn single_pass_without_references() {
        let body = crate::hcl_body!(
            r#"
            group "type1" "default" { value = 1 }
            group "type2" "default" { value = 2 }
            "#
        );

        let (implied, diagnostics) = resolve_implied_variables::<Config>(&body, &ctx());
        assert!(diagnostics.is_empty());
        assert_eq!(implied.iterations, 1);
        assert_eq!(
            group_value(&implied.variables, "type1", "default"),
            Some(Value::Integer(1))
        );
    }

    #[test]
    fn forward_references_settle() {
        let body = crate::hcl_body!(
            r#"
            group "a" "x" { value = group.b.x.value + 1 }
            group "b" "x" { value = group.c.x.value + 1 }
            group "c" "x" { value = 1 }
            "#
        );

        let (implied, diagnostics) = resolve_implied_variables::<Config>(&body, &ctx());
        assert!(diagnostics.is_empty());
        assert_eq!(implied.iterations, 3);
        assert_eq!(group_value(&implied.variables, "a", "x"), Some(Value::Integer(3)));
    }

    #[test]
    fn cycles_break_with_a_warning() {
        let body = crate::hcl_body!(
            r#"
            group "a" "x" { value = group.b.x.value }
            group "b" "x" { value = group.a.x.value }
            "#
        );

        let (implied, diagnostics) = resolve_implied_variables::<Config>(&body, &ctx());
        assert_eq!(implied.iterations, CIRCUIT_BREAK);
        assert_eq!(diagnostics.len(), 1);
        assert!(!diagnostics.has_errors());
        assert_eq!(group_value(&implied.variables, "a", "x"), Some(Value::Unknown));
    }

    #[test]
    fn structural_errors_yield_an_empty_level() {
        let body = crate::hcl_body!("unexpected = 1\n");
        let (implied, diagnostics) = resolve_implied_variables::<Config>(&body, &ctx());
        assert!(diagnostics.is_empty());
        assert_eq!(implied.iterations, 1);
        assert!(implied.variables.is_empty());
    }
}
