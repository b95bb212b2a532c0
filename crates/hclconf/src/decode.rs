//! structural decoding: evaluate attributes and bind blocks into a target
use crate::{
    body::{Attribute, Block, Body},
    context::EvalContext,
    descriptor::{ConversionError, Decode, Field, FromValue},
    diagnostic::{Diagnostic, Diagnostics},
    sources::SourceRange,
    util::{references, TraversalExt},
    value::Value,
};
use hcl::eval::ErrorKind;

/// Decode `body` into `target`, then run the restriction validators
///
/// A target with a [crate::BodyDecoder] is decoded by it alone. The validators only run if
/// decoding produced no errors.
#[tracing::instrument(level = "debug", skip_all, fields(ty = std::any::type_name::<T>()))]
pub fn load_with_body<T: Decode>(body: &Body, ctx: &EvalContext, target: &mut T) -> Diagnostics {
    if let Some(decoder) = T::descriptor().body_decoder {
        return decoder(target, body, ctx);
    }

    let mut diagnostics = decode_body(body, ctx, target);
    if diagnostics.has_errors() {
        return diagnostics;
    }

    diagnostics.extend(crate::restrict::restrict(body, ctx, target));
    diagnostics
}

pub(crate) fn decode_body<T: Decode>(
    body: &Body,
    ctx: &EvalContext,
    target: &mut T,
) -> Diagnostics {
    let descriptor = T::descriptor();
    if let Some(decoder) = descriptor.body_decoder {
        return decoder(target, body, ctx);
    }

    let (content, mut remainder, mut diagnostics) = descriptor.content(body);

    for field in &descriptor.fields {
        match field {
            Field::Attribute { name, assign, .. } => {
                let Some(attribute) = content.attributes.get(name) else {
                    continue;
                };

                let value = match evaluate(&attribute.expr, &attribute.expr_range, ctx) {
                    Ok(value) => value,
                    Err(errors) => {
                        diagnostics.extend(errors);
                        continue;
                    }
                };

                if let Err(err) = assign(target, value) {
                    diagnostics.push(unsuitable(name, &attribute.expr_range, &err));
                }
            }
            Field::Block(block_field) => {
                let blocks: Vec<&Block> = content.blocks_of_type(block_field.block_type()).collect();
                diagnostics.extend(block_field.decode(
                    target,
                    &blocks,
                    ctx,
                    content.missing_item_range.as_ref(),
                ));
            }
            Field::Remainder(access) => *access(target) = std::mem::take(&mut remainder),
            Field::Label { .. } => {}
        }
    }

    diagnostics
}

/// A fresh `C` with labels and body of `block`
pub(crate) fn decode_block<C: Decode>(block: &Block, ctx: &EvalContext) -> (C, Diagnostics) {
    let mut item = C::default();
    C::descriptor().set_labels(&mut item, &block.labels);
    let diagnostics = decode_body(&block.body, ctx, &mut item);
    (item, diagnostics)
}

/// Cardinality of a singular block field
pub(crate) fn check_singular(
    block_type: &str,
    blocks: &[&Block],
    required: bool,
    missing_item_range: Option<&SourceRange>,
) -> Diagnostics {
    let mut diagnostics = Diagnostics::default();

    let Some((first, extra)) = blocks.split_first() else {
        if required {
            diagnostics.push(Diagnostic::error(
                format!("Missing {block_type:?} block"),
                format!("A {block_type:?} block is required."),
                missing_item_range.cloned(),
            ));
        }
        return diagnostics;
    };

    for block in extra {
        diagnostics.push(Diagnostic::error(
            format!("Duplicate {block_type:?} block"),
            format!(
                "Only one {block_type:?} block is allowed. Another was defined at {}.",
                first.def_range
            ),
            block.def_range.clone(),
        ));
    }

    diagnostics
}

/// Evaluate a single attribute into any [FromValue] type
///
/// ```
/// # use hclconf::{decode::decode_attribute, context::EvalContext};
/// let body = hclconf::hcl_body!("port = 8000 + 80");
/// let port: u16 = decode_attribute(&body.attributes[0], &EvalContext::default()).unwrap();
/// assert_eq!(port, 8080);
/// ```
pub fn decode_attribute<V: FromValue>(
    attribute: &Attribute,
    ctx: &EvalContext,
) -> Result<V, Diagnostics> {
    let value = evaluate(&attribute.expr, &attribute.expr_range, ctx)?;
    V::from_value(value)
        .map_err(|err| unsuitable(&attribute.name, &attribute.expr_range, &err).into())
}

/// Evaluate `expr` into any [FromValue] type, diagnostics are attached to `subject`
pub fn decode_expression<V: FromValue>(
    expr: &hcl::Expression,
    subject: &SourceRange,
    ctx: &EvalContext,
) -> Result<V, Diagnostics> {
    let value = evaluate(expr, subject, ctx)?;
    V::from_value(value).map_err(|err| {
        Diagnostic::error(
            "Unsuitable value type",
            format!("Unsuitable value: {err}"),
            subject.clone(),
        )
        .into()
    })
}

fn evaluate(
    expr: &hcl::Expression,
    subject: &SourceRange,
    ctx: &EvalContext,
) -> Result<Value, Diagnostics> {
    let unknown: Diagnostics = references(expr)
        .iter()
        .filter_map(|traversal| unknown_reference(&traversal.get_longest_path(), ctx))
        .map(|path| {
            Diagnostic::error(
                "Unknown value",
                format!("The value of {path:?} is not known, maybe cyclic reference."),
                subject.clone(),
            )
        })
        .collect();
    if !unknown.is_empty() {
        return Err(unknown);
    }

    ctx.evaluate(expr)
        .map_err(|err| evaluation_error(&err, subject).into())
}

/// The shortest prefix of `path` that resolves to a value which is not (wholly) known
fn unknown_reference(path: &[String], ctx: &EvalContext) -> Option<String> {
    let path: Vec<&str> = path.iter().map(String::as_str).collect();

    for end in 1..=path.len() {
        match ctx.lookup(&path[..end])? {
            Value::Unknown => return Some(path[..end].join(".")),
            array @ Value::Array(_) if !array.is_wholly_known() => {
                return Some(path[..end].join("."))
            }
            _ => {}
        }
    }

    None
}

fn evaluation_error(err: &hcl::eval::Error, subject: &SourceRange) -> Diagnostic {
    let (summary, detail) = match err.kind() {
        ErrorKind::UndefinedVar(ident) => (
            "Unknown variable",
            format!("There is no variable named {:?}.", ident.as_str()),
        ),
        ErrorKind::NoSuchKey(key) => (
            "Unsupported attribute",
            format!("This object does not have an attribute named {key:?}."),
        ),
        ErrorKind::UndefinedFunc(name) => (
            "Call to unknown function",
            format!("There is no function named {:?}.", name.to_string()),
        ),
        ErrorKind::FuncCall(name, msg) => (
            "Error in function call",
            format!("Call to function {:?} failed: {msg}.", name.to_string()),
        ),
        kind => ("Invalid expression", format!("{kind}.")),
    };

    Diagnostic::error(summary, detail, subject.clone())
}

fn unsuitable(name: &str, subject: &SourceRange, err: &ConversionError) -> Diagnostic {
    Diagnostic::error(
        "Unsuitable value type",
        format!("Unsuitable value for {name:?}: {err}"),
        subject.clone(),
    )
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        descriptor::{BodyDecoder, Descriptor},
        functions::default_functions,
        value::Object,
    };
    use pretty_assertions::assert_eq;

    #[derive(Default, Debug, PartialEq)]
    struct Listener {
        name: String,
        port: u16,
        tls: Option<bool>,
    }

    impl Decode for Listener {
        fn descriptor() -> Descriptor<Self> {
            Descriptor::builder()
                .label("name", |l: &mut Self| &mut l.name)
                .attribute("port", |l: &mut Self| &mut l.port)
                .attribute("tls", |l: &mut Self| &mut l.tls)
                .build()
        }
    }

    #[derive(Default, Debug, PartialEq)]
    struct Server {
        host: String,
        listeners: Vec<Listener>,
        admin: Option<Listener>,
        rest: Body,
    }

    impl Decode for Server {
        fn descriptor() -> Descriptor<Self> {
            Descriptor::builder()
                .attribute("host", |s: &mut Self| &mut s.host)
                .blocks("listener", |s: &mut Self| &mut s.listeners)
                .block("admin", |s: &mut Self| &mut s.admin)
                .remainder(|s: &mut Self| &mut s.rest)
                .build()
        }
    }

    #[derive(Default, Debug)]
    struct Root {
        server: Server,
    }

    impl Decode for Root {
        fn descriptor() -> Descriptor<Self> {
            Descriptor::builder()
                .required_block("server", |r: &mut Self| &mut r.server)
                .build()
        }
    }

    fn ctx() -> EvalContext {
        let variables = Object::from([("base".to_string(), Value::Integer(8000))]);
        EvalContext::new(variables, default_functions())
    }

    fn summaries(diagnostics: &Diagnostics) -> Vec<&str> {
        diagnostics.iter().map(|d| d.summary.as_str()).collect()
    }

    #[test]
    fn decodes_nested_blocks() {
        let body = crate::hcl_body!(
            r#"
            server {
              host = upper("localhost")

              listener "http" {
                port = base + 80
              }

              listener "https" {
                port = base + 443
                tls  = true
              }

              admin "local" {
                port = 9000
              }

              extra = "kept"
            }
            "#
        );

        let mut root = Root::default();
        let diagnostics = load_with_body(&body, &ctx(), &mut root);
        assert!(diagnostics.is_empty(), "{diagnostics}");

        assert_eq!(root.server.host, "LOCALHOST");
        assert_eq!(
            root.server.listeners,
            vec![
                Listener {
                    name: "http".to_string(),
                    port: 8080,
                    tls: None
                },
                Listener {
                    name: "https".to_string(),
                    port: 8443,
                    tls: Some(true)
                },
            ]
        );
        assert_eq!(root.server.admin.as_ref().map(|a| a.port), Some(9000));
        assert_eq!(root.server.rest.attributes.len(), 1);
        assert_eq!(root.server.rest.attributes[0].name, "extra");
    }

    #[test]
    fn missing_required_attribute_is_reported_at_the_block() {
        let body = crate::hcl_body!("listener \"http\" {\n}\n");

        #[derive(Default)]
        struct Listeners {
            listeners: Vec<Listener>,
        }

        impl Decode for Listeners {
            fn descriptor() -> Descriptor<Self> {
                Descriptor::builder()
                    .blocks("listener", |l: &mut Self| &mut l.listeners)
                    .build()
            }
        }

        let mut target = Listeners::default();
        let diagnostics = load_with_body(&body, &ctx(), &mut target);

        assert_eq!(diagnostics.len(), 1);
        assert_eq!(
            diagnostics.to_string(),
            "test.hcl:1,17-17: Missing required argument; \
             The argument \"port\" is required, but no definition was found."
        );
    }

    #[test]
    fn singular_blocks_are_counted() {
        let body = crate::hcl_body!("");
        let mut root = Root::default();
        let diagnostics = load_with_body(&body, &ctx(), &mut root);
        assert_eq!(summaries(&diagnostics), vec!["Missing \"server\" block"]);

        let body = crate::hcl_body!(
            r#"
            server {
              host = "a"
              admin "one" { port = 1 }
              admin "two" { port = 2 }
            }
            "#
        );
        let mut root = Root::default();
        let diagnostics = load_with_body(&body, &ctx(), &mut root);
        assert_eq!(summaries(&diagnostics), vec!["Duplicate \"admin\" block"]);
    }

    #[test]
    fn decoding_continues_after_errors() {
        let body = crate::hcl_body!(
            r#"
            server {
              host = nope
              listener "a" { port = 70000 }
              listener "b" { port = missing("x") }
              listener "c" { port = 1 }
            }
            "#
        );

        let mut root = Root::default();
        let diagnostics = load_with_body(&body, &ctx(), &mut root);
        assert_eq!(
            summaries(&diagnostics),
            vec![
                "Unknown variable",
                "Unsuitable value type",
                "Call to unknown function"
            ]
        );
        assert_eq!(root.server.listeners.len(), 3);
        assert_eq!(root.server.listeners[2].port, 1);
    }

    #[test]
    fn unknown_references_are_errors() {
        let mut ctx = ctx();
        ctx.merge_variables(Object::from([(
            "group".to_string(),
            Value::Object(Object::from([("a".to_string(), Value::Unknown)])),
        )]));

        let body = crate::hcl_body!("value = group.a.value\n");
        let result: Result<i64, _> = decode_attribute(&body.attributes[0], &ctx);
        let diagnostics = result.expect_err("value is unknown");
        assert_eq!(
            diagnostics.to_string(),
            "test.hcl:1,9-22: Unknown value; The value of \"group.a\" is not known, maybe cyclic reference."
        );
    }

    #[derive(Default, Debug)]
    struct Dynamic {
        values: Object,
    }

    impl BodyDecoder for Dynamic {
        fn decode_body(&mut self, body: &Body, ctx: &EvalContext) -> Diagnostics {
            let (attributes, mut diagnostics) = body.just_attributes();
            for (name, attribute) in attributes {
                match decode_attribute::<Value>(&attribute, ctx) {
                    Ok(value) => {
                        self.values.insert(name, value);
                    }
                    Err(errors) => diagnostics.extend(errors),
                }
            }
            diagnostics
        }
    }

    impl Decode for Dynamic {
        fn descriptor() -> Descriptor<Self> {
            Descriptor::builder().body_decoder().build()
        }
    }

    #[test]
    fn body_decoder_replaces_structural_decoding() {
        let body = crate::hcl_body!("a = 1\nb = [\"x\", base]\n");
        let mut dynamic = Dynamic::default();
        let diagnostics = load_with_body(&body, &ctx(), &mut dynamic);

        assert!(diagnostics.is_empty());
        assert_eq!(dynamic.values["a"], Value::Integer(1));
        assert_eq!(
            dynamic.values["b"],
            Value::Array(vec![Value::from("x"), Value::Integer(8000)])
        );
    }
}
