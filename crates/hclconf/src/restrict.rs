//! restrictions: semantic validation after a successful decode
//!
//! A type registers a [Restrictor] in its descriptor to validate the decoded values against the
//! raw content they came from:
//!
//! ```
//! use hclconf::{
//!     body::BodyContent, context::EvalContext, diagnostic::{Diagnostic, Diagnostics},
//!     restrict::{attribute_range, restrict_unique_block_labels}, Decode, Descriptor, Restrictor,
//! };
//!
//! #[derive(Default)]
//! struct Config {
//!     io_mode: String,
//! }
//!
//! impl Restrictor for Config {
//!     fn restrict(&mut self, content: &BodyContent, _: &EvalContext) -> Diagnostics {
//!         let mut diagnostics = restrict_unique_block_labels(content);
//!         if self.io_mode != "readwrite" && self.io_mode != "readonly" {
//!             diagnostics.push(Diagnostic::error(
//!                 "Invalid io_mode",
//!                 "Possible values for io_mode are readwrite or readonly",
//!                 attribute_range(content, "io_mode"),
//!             ));
//!         }
//!         diagnostics
//!     }
//! }
//!
//! impl Decode for Config {
//!     fn descriptor() -> Descriptor<Self> {
//!         Descriptor::builder()
//!             .attribute("io_mode", |c: &mut Self| &mut c.io_mode)
//!             .restrictor()
//!             .build()
//!     }
//! }
//! ```
use crate::{
    body::{Block, Body, BodyContent},
    context::EvalContext,
    descriptor::{Decode, Field},
    diagnostic::{Diagnostic, Diagnostics},
    sources::SourceRange,
};
use std::collections::HashMap;

pub use crate::descriptor::Restrictor;

/// Run the registered restrictors of `target` and of everything nested in it, depth first
pub fn restrict<T: Decode>(body: &Body, ctx: &EvalContext, target: &mut T) -> Diagnostics {
    let descriptor = T::descriptor();

    let (content, _, query_diagnostics) = descriptor.content(body);
    if query_diagnostics.has_errors() {
        // the decoder already reported these
        return Diagnostics::default();
    }

    let mut diagnostics = Diagnostics::default();
    if let Some(restrictor) = descriptor.restrictor {
        diagnostics.extend(restrictor(target, &content, ctx));
    }

    for field in &descriptor.fields {
        let Field::Block(block_field) = field else {
            continue;
        };

        let blocks: Vec<&Block> = content.blocks_of_type(block_field.block_type()).collect();
        diagnostics.extend(block_field.restrict(target, &blocks, ctx));
    }

    diagnostics
}

/// Restrict every item of a repeated block field
///
/// Items are paired with blocks in document order. If a restrictor changed the collection the
/// items are matched by their labels instead; items without a block are skipped.
pub(crate) fn restrict_items<C: Decode>(
    items: &mut [C],
    blocks: &[&Block],
    ctx: &EvalContext,
) -> Diagnostics {
    let descriptor = C::descriptor();

    let in_order = items.len() == blocks.len()
        && items
            .iter_mut()
            .zip(blocks)
            .all(|(item, block)| descriptor.get_labels(item) == block.labels);

    let mut diagnostics = Diagnostics::default();
    if in_order {
        for (item, block) in items.iter_mut().zip(blocks) {
            diagnostics.extend(restrict(&block.body, ctx, item));
        }
        return diagnostics;
    }

    for item in items.iter_mut() {
        let labels = descriptor.get_labels(item);
        match blocks.iter().find(|block| block.labels == labels) {
            Some(block) => diagnostics.extend(restrict(&block.body, ctx, item)),
            None => tracing::debug!(?labels, "no block for item, restriction skipped"),
        }
    }

    diagnostics
}

/// Blocks of the same type must have distinct labels
///
/// Every repeat is reported at its definition, pointing at the nearest prior declaration.
pub fn restrict_unique_block_labels(content: &BodyContent) -> Diagnostics {
    let mut declared: HashMap<(&str, &[String]), &SourceRange> = HashMap::new();
    let mut diagnostics = Diagnostics::default();

    for block in &content.blocks {
        let key = (block.block_type.as_str(), block.labels.as_slice());
        if let Some(prior) = declared.insert(key, &block.def_range) {
            diagnostics.push(duplicate_labels(block, prior));
        }
    }

    diagnostics
}

fn duplicate_labels(block: &Block, prior: &SourceRange) -> Diagnostic {
    let ty = &block.block_type;
    let (summary, detail) = match block.labels.as_slice() {
        [] => (
            format!("Duplicate {ty} declaration"),
            format!("A {ty} block was already declared at {prior}. Only one {ty} block is allowed in a configuration"),
        ),
        [name] => (
            format!("Duplicate {ty} declaration"),
            format!("A {ty} named {name:?} was already declared at {prior}. {ty} names must unique within a configuration"),
        ),
        [kind, name] => (
            format!("Duplicate {ty} {kind:?} configuration"),
            format!("A {kind} {ty} named {name:?} was already declared at {prior}. {ty} names must unique per type in a configuration"),
        ),
        labels => {
            let joined = labels.join(".");
            (
                format!("Duplicate {ty} {joined:?} configuration"),
                format!("A {ty} named {joined:?} was already declared at {prior}. {ty} names must unique per labels"),
            )
        }
    };

    Diagnostic::error(summary, detail, block.def_range.clone())
}

/// Every listed block type must appear at least once
pub fn restrict_required_block(content: &BodyContent, block_types: &[&str]) -> Diagnostics {
    block_types
        .iter()
        .filter(|block_type| content.blocks_of_type(block_type).next().is_none())
        .map(|block_type| {
            Diagnostic::error(
                format!("Missing {block_type:?} block"),
                format!("A {block_type:?} block is required."),
                content.missing_item_range.clone(),
            )
        })
        .collect()
}

/// Every listed block type may appear at most once
pub fn restrict_only_one_block(content: &BodyContent, block_types: &[&str]) -> Diagnostics {
    let mut diagnostics = Diagnostics::default();

    for block_type in block_types {
        let mut blocks = content.blocks_of_type(block_type);
        let Some(first) = blocks.next() else {
            continue;
        };

        for extra in blocks {
            diagnostics.push(Diagnostic::error(
                format!("Duplicate {block_type:?} block"),
                format!(
                    "Only one {block_type:?} block is allowed. Another was defined at {}.",
                    first.def_range
                ),
                extra.def_range.clone(),
            ));
        }
    }

    diagnostics
}

/// Range of attribute `name`, or the missing item range if it is not set
pub fn attribute_range(content: &BodyContent, name: &str) -> Option<SourceRange> {
    content
        .attributes
        .get(name)
        .map(|attribute| attribute.range.clone())
        .or_else(|| content.missing_item_range.clone())
}
