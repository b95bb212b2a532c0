//! local variables: the reserved top-level `locals` blocks
//!
//! ```hcl
//! locals {
//!   domain = "example.com"
//!   api    = "api.${local.domain}"
//! }
//! ```
//!
//! Locals may only reference other locals (`local.<name>`) and functions. They are resolved
//! before anything else and the `locals` blocks are removed from the body, so the target type
//! never has to describe them.
use crate::{
    body::{Attribute, BlockHeaderSchema, Body, BodySchema},
    context::EvalContext,
    diagnostic::{Diagnostic, Diagnostics},
    util::{references, TraversalExt},
    value::{merge_variables, Object, Value},
};
use indexmap::IndexMap;

/// Maximum number of evaluation passes
pub const CIRCUIT_BREAK: usize = 100;

/// Reserved block type
pub const LOCALS_BLOCK: &str = "locals";

/// Reserved namespace key
pub const LOCAL_NAMESPACE: &str = "local";

/// Resolve all locals of `body`
///
/// Returns the body without `locals` blocks, the namespace `{"local": {...}}` (empty if there are
/// no locals) and diagnostics.
#[tracing::instrument(level = "debug", skip_all)]
pub fn resolve_locals(body: &Body, ctx: &EvalContext) -> (Body, Object, Diagnostics) {
    let schema = BodySchema {
        attributes: vec![],
        blocks: vec![BlockHeaderSchema::new(LOCALS_BLOCK, vec![])],
    };

    let (content, remainder, mut diagnostics) = body.partial_content(&schema);
    if diagnostics.has_errors() || content.blocks.is_empty() {
        return (remainder, Object::new(), diagnostics);
    }

    let mut locals: IndexMap<String, Attribute> = IndexMap::new();
    for block in &content.blocks {
        let (attributes, attribute_diagnostics) = block.body.just_attributes();
        diagnostics.extend(attribute_diagnostics);

        for (name, attribute) in attributes {
            if let Some(existing) = locals.get(&name) {
                diagnostics.push(Diagnostic::error(
                    "Duplicate local value definition",
                    format!(
                        "A local value named {name:?} was already defined at {}. Local value names must be unique.",
                        existing.name_range
                    ),
                    attribute.name_range.clone(),
                ));
                continue;
            }

            diagnostics.extend(check_references(&name, &attribute));
            locals.insert(name, attribute);
        }
    }

    if diagnostics.has_errors() {
        return (remainder, Object::new(), diagnostics);
    }

    let mut resolved = Object::new();
    for iteration in 1..=CIRCUIT_BREAK {
        let local_ctx = ctx.with_variables(namespace(&resolved));

        let mut pass = Object::new();
        for (name, attribute) in &locals {
            let value = match local_ctx.evaluate(&attribute.expr) {
                Ok(value) => value,
                Err(err) => {
                    tracing::trace!(local = %name, %err, "not known yet");
                    Value::Unknown
                }
            };
            pass.insert(name.clone(), value);
        }

        merge_variables(&mut resolved, pass);
        tracing::debug!(iteration, "local variables pass");

        if resolved.values().all(Value::is_wholly_known) {
            return (remainder, namespace(&resolved), diagnostics);
        }
    }

    let unresolved: Vec<&str> = resolved
        .iter()
        .filter(|(_, value)| !value.is_wholly_known())
        .map(|(name, _)| name.as_str())
        .collect();
    tracing::warn!(passes = CIRCUIT_BREAK, ?unresolved, "local variables circuit break");

    diagnostics.push(Diagnostic::warning(
        "Local Variables",
        format!(
            "circuit break! evaluated {CIRCUIT_BREAK} times, maybe cyclic reference: {}",
            unresolved.join(", ")
        ),
        None,
    ));

    (remainder, namespace(&resolved), diagnostics)
}

fn namespace(locals: &Object) -> Object {
    Object::from([(LOCAL_NAMESPACE.to_string(), Value::Object(locals.clone()))])
}

fn check_references(name: &str, attribute: &Attribute) -> Diagnostics {
    references(&attribute.expr)
        .iter()
        .filter_map(TraversalExt::root_name)
        .filter(|root| *root != LOCAL_NAMESPACE)
        .map(|root| {
            Diagnostic::error(
                "Local Variables",
                format!(
                    "The local variable {name:?} references {root:?}. Locals may only reference other local variables."
                ),
                attribute.range.clone(),
            )
        })
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::functions::default_functions;
    use pretty_assertions::assert_eq;

    fn ctx() -> EvalContext {
        EvalContext::new(Object::new(), default_functions())
    }

    #[test]
    fn without_locals_the_body_passes_through() {
        let body = crate::hcl_body!("a = 1\nb {}\n");
        let (remainder, namespace, diagnostics) = resolve_locals(&body, &ctx());

        assert!(diagnostics.is_empty());
        assert!(namespace.is_empty());
        assert_eq!(remainder.attributes.len(), 1);
        assert_eq!(remainder.blocks.len(), 1);
    }

    #[test]
    fn locals_reference_each_other() {
        let body = crate::hcl_body!(
            r#"
            locals {
              api = "api.${local.domain}"
            }

            locals {
              domain = lower("EXAMPLE.com")
            }

            service {}
            "#
        );
        let (remainder, namespace, diagnostics) = resolve_locals(&body, &ctx());

        assert!(diagnostics.is_empty());
        assert_eq!(remainder.blocks.len(), 1);
        assert_eq!(remainder.blocks[0].block_type, "service");
        assert_eq!(
            namespace["local"].get_path(&["api"]),
            Some(&Value::from("api.example.com"))
        );
    }

    #[test]
    fn only_locals_may_be_referenced() {
        let body = crate::hcl_body!(
            r#"
            locals {
              ok  = local.other
              bad = service.http.port
              other = 1
            }
            "#
        );
        let (_, namespace, diagnostics) = resolve_locals(&body, &ctx());

        assert!(namespace.is_empty());
        assert_eq!(diagnostics.error_count(), 1);
        let diagnostic = diagnostics.iter().next().expect("one diagnostic");
        assert_eq!(diagnostic.summary, "Local Variables");
        assert!(diagnostic.detail.contains("\"bad\""));
    }

    #[test]
    fn nested_blocks_and_duplicates_are_rejected() {
        let body = crate::hcl_body!(
            r#"
            locals {
              a = 1
              nested {}
            }
            locals {
              a = 2
            }
            "#
        );
        let (_, _, diagnostics) = resolve_locals(&body, &ctx());

        let summaries: Vec<_> = diagnostics.iter().map(|d| d.summary.as_str()).collect();
        assert_eq!(
            summaries,
            vec!["Unexpected \"nested\" block", "Duplicate local value definition"]
        );
    }

    #[test]
    fn cycles_break_with_a_warning() {
        let body = crate::hcl_body!(
            r#"
            locals {
              a = local.b
              b = local.a
              c = 1
            }
            "#
        );
        let (_, namespace, diagnostics) = resolve_locals(&body, &ctx());

        assert!(!diagnostics.has_errors());
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics
            .iter()
            .all(|d| d.detail.ends_with("maybe cyclic reference: a, b")));
        assert_eq!(namespace["local"].get_path(&["c"]), Some(&Value::Integer(1)));
    }
}
