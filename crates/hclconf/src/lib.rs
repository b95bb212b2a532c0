//! # hclconf - HCL configuration into typed structures
//!
//! Load one or more `.hcl` (or `.hcl.json`) files into a Rust value. Attributes may reference values of other
//! blocks in the same configuration, no matter in which order (or file) they are defined, and
//! values from a `locals` scope.
//!
//! ```
//! use hclconf::{Decode, Descriptor};
//!
//! #[derive(Default, Debug)]
//! struct Group {
//!     kind: String,
//!     name: String,
//!     value: i64,
//! }
//!
//! impl Decode for Group {
//!     fn descriptor() -> Descriptor<Self> {
//!         Descriptor::builder()
//!             .label("type", |g: &mut Self| &mut g.kind)
//!             .label("name", |g: &mut Self| &mut g.name)
//!             .attribute("value", |g: &mut Self| &mut g.value)
//!             .build()
//!     }
//! }
//!
//! #[derive(Default, Debug)]
//! struct Config {
//!     groups: Vec<Group>,
//! }
//!
//! impl Decode for Config {
//!     fn descriptor() -> Descriptor<Self> {
//!         Descriptor::builder()
//!             .blocks("group", |c: &mut Self| &mut c.groups)
//!             .build()
//!     }
//! }
//!
//! let mut config = Config::default();
//! hclconf::load_str(
//!     &mut config,
//!     "config.hcl",
//!     r#"
//!     group "type2" "default" {
//!       value = group.type1.default.value + local.step
//!     }
//!
//!     group "type1" "default" {
//!       value = 1
//!     }
//!
//!     locals {
//!       step = 1
//!     }
//!     "#,
//! )?;
//!
//! assert_eq!(config.groups[0].value, 2);
//! assert_eq!(config.groups[1].value, 1);
//! # Ok::<(), hclconf::LoadError>(())
//! ```
//!
//! ## Introduction for developers
//!
//! ### HCL Terms
//!
//! In hcl terms...
//! - a file gets parsed as a `body`
//! - ...which is a list of `attributes` ("key = expression")
//! - ...and `blocks`: a type, 0 or more `labels` and a nested `body` enclosed in `{` and `}`
//!
//! ### Loading files
//!
//! [sources::Sources] reads and parses every file with [hcl_edit] and remembers the text so
//! diagnostics can point into it. Each file becomes a [body::Body], a simplified view that keeps
//! the source ranges of everything. The bodies of all files are merged into one.
//!
//! JSON documents are read with [serde_json]. Their properties start out as attributes and only
//! turn into blocks once a schema asks for a block of that name.
//!
//! ### Describing the target
//!
//! There is no reflection: a target type implements [Decode] and returns a [Descriptor], see
//! [descriptor]. From the descriptor we derive the expected shape of a body
//! ([Descriptor::schema]) on every nesting level.
//!
//! ### Resolving
//!
//! 1. [locals::resolve_locals] removes the `locals` blocks and evaluates them into the `local`
//!    namespace.
//! 2. [implied::resolve_implied_variables] evaluates every attribute of every described block
//!    into the namespace `block_type.label1.label2.attribute`. Anything that can not be evaluated
//!    yet is [value::Value::Unknown] and another pass is made.
//!
//! Both are brute force fixpoints with a cap of 100 passes. Reaching the cap is a warning.
//!
//! ### Decoding
//!
//! [decode::load_with_body] evaluates attributes with [hcl::eval] against the final
//! [context::EvalContext] and converts them with [FromValue]. Nested blocks are decoded
//! recursively. Afterwards [restrict::restrict] runs the [Restrictor]s registered on the way.
//!
//! ### Diagnostics
//!
//! Problems with the configuration are [diagnostic::Diagnostic]s, never panics. A load fails
//! with [LoadError] if there is at least one error; all diagnostics are handed to the
//! [diagnostic::DiagnosticWriter] of the [Loader] first.
pub mod body;
pub mod context;
pub mod decode;
pub mod descriptor;
pub mod diagnostic;
pub mod functions;
pub mod implied;
pub mod loader;
pub mod locals;
pub mod restrict;
pub mod sources;
mod util;
pub mod value;
pub mod visit;

pub use descriptor::{BodyDecoder, ConversionError, Decode, Descriptor, FromValue, Restrictor};
pub use diagnostic::{Diagnostic, Diagnostics};
pub use loader::{load, load_str, load_with_body, LoadError, Loader};
pub use value::Value;

/// Parse hcl source text into a [body::Body] (for tests and examples)
///
/// A single source is parsed as `test.hcl`, multiple sources are given with their file name and
/// merged.
///
/// ```
/// let body = hclconf::hcl_body!("a = 1");
/// assert_eq!(body.attributes.len(), 1);
///
/// let body = hclconf::hcl_body! {
///     "one.hcl" => "a = 1",
///     "two.hcl" => "b = 2",
/// };
/// assert_eq!(body.attributes[1].range.to_string(), "two.hcl:1,1-6");
/// ```
///
/// # Panic
/// Panics if a source is not valid HCL.
#[macro_export]
macro_rules! hcl_body {
    ($($filename:expr => $src:expr),+ $(,)?) => {{
        let mut sources = $crate::sources::Sources::default();
        $crate::body::Body::merge([
            $(sources.parse($filename, $src).expect("body must parse")),+
        ])
    }};
    ($src:expr) => {
        $crate::sources::Sources::default()
            .parse("test.hcl", $src)
            .expect("body must parse")
    };
}
