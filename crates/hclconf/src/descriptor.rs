//! target descriptors: how a Rust type maps onto an HCL body
//!
//! There is no runtime reflection. Every type that can be loaded implements [Decode] and builds
//! a [Descriptor] listing its fields:
//!
//! ```
//! use hclconf::{Decode, Descriptor};
//!
//! #[derive(Default)]
//! struct Service {
//!     kind: String,
//!     name: String,
//!     port: i64,
//!     comment: Option<String>,
//! }
//!
//! impl Decode for Service {
//!     fn descriptor() -> Descriptor<Self> {
//!         Descriptor::builder()
//!             .label("type", |s: &mut Self| &mut s.kind)
//!             .label("name", |s: &mut Self| &mut s.name)
//!             .attribute("port", |s: &mut Self| &mut s.port)
//!             .attribute("comment", |s: &mut Self| &mut s.comment)
//!             .build()
//!     }
//! }
//!
//! #[derive(Default)]
//! struct Config {
//!     services: Vec<Service>,
//! }
//!
//! impl Decode for Config {
//!     fn descriptor() -> Descriptor<Self> {
//!         Descriptor::builder()
//!             .blocks("service", |c: &mut Self| &mut c.services)
//!             .build()
//!     }
//! }
//! ```
//!
//! Field roles:
//! - attribute: required unless the field type is an [Option]
//! - label: positional, only meaningful for block types, declared before everything else
//! - block: `Option<C>` (at most one), `C` (exactly one) or `Vec<C>` (any number)
//! - remainder: a [Body] receiving everything not described by the other fields
//!
//! Optional capabilities ([Restrictor], [BodyDecoder]) are registered on the builder.
use crate::{
    body::{AttributeSchema, Block, BlockHeaderSchema, Body, BodyContent, BodySchema},
    context::EvalContext,
    diagnostic::Diagnostics,
    sources::SourceRange,
    value::{Object, Value},
};
use std::collections::HashMap;

/// A type that can be loaded from an HCL body
pub trait Decode: Default + 'static {
    fn descriptor() -> Descriptor<Self>;
}

/// Post-decode validation hook, see [crate::restrict]
pub trait Restrictor {
    fn restrict(&mut self, content: &BodyContent, ctx: &EvalContext) -> Diagnostics;
}

/// Replaces structural decoding of a body entirely
pub trait BodyDecoder {
    fn decode_body(&mut self, body: &Body, ctx: &EvalContext) -> Diagnostics;
}

pub(crate) type AssignFn<T> = Box<dyn Fn(&mut T, Value) -> Result<(), ConversionError>>;
pub(crate) type RestrictFn<T> = fn(&mut T, &BodyContent, &EvalContext) -> Diagnostics;
pub(crate) type BodyDecoderFn<T> = fn(&mut T, &Body, &EvalContext) -> Diagnostics;

pub struct Descriptor<T> {
    pub(crate) fields: Vec<Field<T>>,
    pub(crate) restrictor: Option<RestrictFn<T>>,
    pub(crate) body_decoder: Option<BodyDecoderFn<T>>,
}

pub(crate) enum Field<T> {
    Attribute {
        name: String,
        required: bool,
        assign: AssignFn<T>,
    },
    Label {
        name: String,
        access: fn(&mut T) -> &mut String,
    },
    Block(Box<dyn BlockField<T>>),
    Remainder(fn(&mut T) -> &mut Body),
}

impl<T> Field<T> {
    fn name(&self) -> Option<&str> {
        match self {
            Field::Attribute { name, .. } | Field::Label { name, .. } => Some(name.as_str()),
            Field::Block(block) => Some(block.block_type()),
            Field::Remainder(_) => None,
        }
    }
}

impl<T: Decode> Descriptor<T> {
    pub fn builder() -> DescriptorBuilder<T> {
        DescriptorBuilder {
            descriptor: Descriptor {
                fields: vec![],
                restrictor: None,
                body_decoder: None,
            },
        }
    }

    /// Expected shape of the body and whether unexpected content is tolerated
    ///
    /// Only describes this level, nested bodies are queried with their own descriptor.
    pub fn schema(&self) -> (BodySchema, bool) {
        let mut schema = BodySchema::default();
        let mut partial = self.body_decoder.is_some();

        for field in &self.fields {
            match field {
                Field::Attribute { name, required, .. } => schema
                    .attributes
                    .push(AttributeSchema::new(name.as_str(), *required)),
                Field::Block(block) => schema.blocks.push(block.header()),
                Field::Label { .. } => {}
                Field::Remainder(_) => partial = true,
            }
        }

        (schema, partial)
    }

    /// Query `body` according to [Descriptor::schema]
    ///
    /// The remainder is empty unless the schema is partial.
    pub fn content(&self, body: &Body) -> (BodyContent, Body, Diagnostics) {
        let (schema, partial) = self.schema();
        if partial {
            body.partial_content(&schema)
        } else {
            let (content, diagnostics) = body.content(&schema);
            (content, Body::default(), diagnostics)
        }
    }

    pub fn label_names(&self) -> Vec<String> {
        self.fields
            .iter()
            .filter_map(|field| match field {
                Field::Label { name, .. } => Some(name.clone()),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn set_labels(&self, target: &mut T, labels: &[String]) {
        let accessors = self.fields.iter().filter_map(|field| match field {
            Field::Label { access, .. } => Some(access),
            _ => None,
        });

        for (access, label) in accessors.zip(labels) {
            *access(target) = label.clone();
        }
    }

    pub(crate) fn get_labels(&self, target: &mut T) -> Vec<String> {
        self.fields
            .iter()
            .filter_map(|field| match field {
                Field::Label { access, .. } => Some(access(target).clone()),
                _ => None,
            })
            .collect()
    }
}

pub struct DescriptorBuilder<T> {
    descriptor: Descriptor<T>,
}

impl<T: Decode> DescriptorBuilder<T> {
    /// Attribute `name`, required unless `V` is an [Option]
    pub fn attribute<V: FromValue + 'static>(
        mut self,
        name: &str,
        access: fn(&mut T) -> &mut V,
    ) -> Self {
        self.descriptor.fields.push(Field::Attribute {
            name: name.to_string(),
            required: V::REQUIRED,
            assign: Box::new(move |target, value| {
                *access(target) = V::from_value(value)?;
                Ok(())
            }),
        });
        self
    }

    /// Positional block label
    pub fn label(mut self, name: &str, access: fn(&mut T) -> &mut String) -> Self {
        self.descriptor.fields.push(Field::Label {
            name: name.to_string(),
            access,
        });
        self
    }

    /// Optional singular block: at most one block of type `block_type`
    pub fn block<C: Decode>(
        mut self,
        block_type: &str,
        access: fn(&mut T) -> &mut Option<C>,
    ) -> Self {
        self.descriptor.fields.push(Field::Block(Box::new(NestedBlock {
            block_type: block_type.to_string(),
            slot: Slot::Optional(access),
        })));
        self
    }

    /// Repeated block: any number of blocks of type `block_type`
    pub fn blocks<C: Decode>(
        mut self,
        block_type: &str,
        access: fn(&mut T) -> &mut Vec<C>,
    ) -> Self {
        self.descriptor.fields.push(Field::Block(Box::new(NestedBlock {
            block_type: block_type.to_string(),
            slot: Slot::Repeated(access),
        })));
        self
    }

    /// Required singular block: exactly one block of type `block_type`
    pub fn required_block<C: Decode>(
        mut self,
        block_type: &str,
        access: fn(&mut T) -> &mut C,
    ) -> Self {
        self.descriptor.fields.push(Field::Block(Box::new(NestedBlock {
            block_type: block_type.to_string(),
            slot: Slot::Required(access),
        })));
        self
    }

    /// Capture everything the other fields do not describe
    pub fn remainder(mut self, access: fn(&mut T) -> &mut Body) -> Self {
        self.descriptor.fields.push(Field::Remainder(access));
        self
    }

    /// # Panic
    /// Panics if the descriptor is malformed: labels after other fields, a name used twice or
    /// more than one remainder.
    pub fn build(self) -> Descriptor<T> {
        let fields = &self.descriptor.fields;

        let first_non_label = fields
            .iter()
            .position(|field| !matches!(field, Field::Label { .. }))
            .unwrap_or(fields.len());
        assert!(
            fields[first_non_label..]
                .iter()
                .all(|field| !matches!(field, Field::Label { .. })),
            "labels must be declared before any other field of {}",
            std::any::type_name::<T>()
        );

        let mut seen = std::collections::HashSet::new();
        for name in fields.iter().filter_map(Field::name) {
            assert!(
                seen.insert(name),
                "field name {name:?} declared twice in {}",
                std::any::type_name::<T>()
            );
        }

        let remainders = fields
            .iter()
            .filter(|field| matches!(field, Field::Remainder(_)))
            .count();
        assert!(
            remainders <= 1,
            "only one remainder allowed in {}",
            std::any::type_name::<T>()
        );

        self.descriptor
    }
}

impl<T: Decode + Restrictor> DescriptorBuilder<T> {
    /// Run [Restrictor::restrict] after a successful decode
    pub fn restrictor(mut self) -> Self {
        self.descriptor.restrictor = Some(<T as Restrictor>::restrict);
        self
    }
}

impl<T: Decode + BodyDecoder> DescriptorBuilder<T> {
    /// Decode bodies with [BodyDecoder::decode_body] instead of the declared fields
    pub fn body_decoder(mut self) -> Self {
        self.descriptor.body_decoder = Some(<T as BodyDecoder>::decode_body);
        self
    }
}

/// Type erased nested block field of a `T`
pub(crate) trait BlockField<T> {
    fn block_type(&self) -> &str;

    fn header(&self) -> BlockHeaderSchema;

    /// Implied variables of all `blocks` (already filtered by type), merged.
    /// `false` if any value is still unknown.
    fn implied_variables(&self, blocks: &[&Block], ctx: &EvalContext) -> (Object, bool);

    fn decode(
        &self,
        target: &mut T,
        blocks: &[&Block],
        ctx: &EvalContext,
        missing_item_range: Option<&SourceRange>,
    ) -> Diagnostics;

    fn restrict(&self, target: &mut T, blocks: &[&Block], ctx: &EvalContext) -> Diagnostics;
}

enum Slot<T, C> {
    Optional(fn(&mut T) -> &mut Option<C>),
    Repeated(fn(&mut T) -> &mut Vec<C>),
    Required(fn(&mut T) -> &mut C),
}

struct NestedBlock<T, C> {
    block_type: String,
    slot: Slot<T, C>,
}

impl<T: Decode, C: Decode> BlockField<T> for NestedBlock<T, C> {
    fn block_type(&self) -> &str {
        &self.block_type
    }

    fn header(&self) -> BlockHeaderSchema {
        BlockHeaderSchema::new(self.block_type.as_str(), C::descriptor().label_names())
    }

    fn implied_variables(&self, blocks: &[&Block], ctx: &EvalContext) -> (Object, bool) {
        crate::implied::implied_blocks::<C>(&self.block_type, blocks, ctx)
    }

    fn decode(
        &self,
        target: &mut T,
        blocks: &[&Block],
        ctx: &EvalContext,
        missing_item_range: Option<&SourceRange>,
    ) -> Diagnostics {
        match &self.slot {
            Slot::Repeated(access) => {
                let mut diagnostics = Diagnostics::default();
                let items = access(target);
                items.clear();
                for block in blocks {
                    let (item, item_diagnostics) = crate::decode::decode_block::<C>(block, ctx);
                    items.push(item);
                    diagnostics.extend(item_diagnostics);
                }
                diagnostics
            }
            Slot::Optional(access) => {
                let mut diagnostics = crate::decode::check_singular(
                    &self.block_type,
                    blocks,
                    false,
                    missing_item_range,
                );
                let slot = access(target);
                *slot = None;
                if let Some(block) = blocks.first() {
                    let (item, item_diagnostics) = crate::decode::decode_block::<C>(block, ctx);
                    *slot = Some(item);
                    diagnostics.extend(item_diagnostics);
                }
                diagnostics
            }
            Slot::Required(access) => {
                let mut diagnostics = crate::decode::check_singular(
                    &self.block_type,
                    blocks,
                    true,
                    missing_item_range,
                );
                if let Some(block) = blocks.first() {
                    let (item, item_diagnostics) = crate::decode::decode_block::<C>(block, ctx);
                    *access(target) = item;
                    diagnostics.extend(item_diagnostics);
                }
                diagnostics
            }
        }
    }

    fn restrict(&self, target: &mut T, blocks: &[&Block], ctx: &EvalContext) -> Diagnostics {
        match &self.slot {
            Slot::Repeated(access) => {
                crate::restrict::restrict_items::<C>(access(target), blocks, ctx)
            }
            Slot::Optional(access) => match (access(target).as_mut(), blocks.first()) {
                (Some(item), Some(block)) => crate::restrict::restrict::<C>(&block.body, ctx, item),
                _ => Diagnostics::default(),
            },
            Slot::Required(access) => match blocks.first() {
                Some(block) => crate::restrict::restrict::<C>(&block.body, ctx, access(target)),
                None => Diagnostics::default(),
            },
        }
    }
}

/// Conversion from an evaluated [Value] into a field type
pub trait FromValue: Sized {
    /// Whether the attribute must be present in the body
    const REQUIRED: bool = true;

    fn from_value(value: Value) -> Result<Self, ConversionError>;
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ConversionError {
    #[error("the value is not known yet")]
    Unknown,
    #[error("a null value is not allowed here")]
    Null,
    #[error("{expected} required, but have {found}")]
    Type {
        expected: &'static str,
        found: &'static str,
    },
    #[error("{value} is out of range for {expected}")]
    Range {
        value: String,
        expected: &'static str,
    },
    #[error("element {index}: {source}")]
    Element {
        index: usize,
        source: Box<ConversionError>,
    },
    #[error("attribute {key:?}: {source}")]
    Key {
        key: String,
        source: Box<ConversionError>,
    },
}

fn unexpected(expected: &'static str, value: &Value) -> ConversionError {
    match value {
        Value::Unknown => ConversionError::Unknown,
        Value::Null => ConversionError::Null,
        other => ConversionError::Type {
            expected,
            found: other.type_name(),
        },
    }
}

impl FromValue for Value {
    fn from_value(value: Value) -> Result<Self, ConversionError> {
        if !value.is_wholly_known() {
            return Err(ConversionError::Unknown);
        }
        Ok(value)
    }
}

impl FromValue for String {
    fn from_value(value: Value) -> Result<Self, ConversionError> {
        match value {
            Value::String(s) => Ok(s),
            Value::Integer(i) => Ok(i.to_string()),
            Value::Decimal(d) => Ok(d.to_string()),
            Value::Boolean(b) => Ok(b.to_string()),
            other => Err(unexpected("string", &other)),
        }
    }
}

impl FromValue for bool {
    fn from_value(value: Value) -> Result<Self, ConversionError> {
        match value {
            Value::Boolean(b) => Ok(b),
            Value::String(s) if s == "true" => Ok(true),
            Value::String(s) if s == "false" => Ok(false),
            other => Err(unexpected("bool", &other)),
        }
    }
}

impl FromValue for f64 {
    fn from_value(value: Value) -> Result<Self, ConversionError> {
        match value {
            Value::Integer(i) => Ok(i as f64),
            Value::Decimal(d) => Ok(d),
            Value::String(s) => s.trim().parse().map_err(|_| ConversionError::Type {
                expected: "number",
                found: "string",
            }),
            other => Err(unexpected("number", &other)),
        }
    }
}

fn integer(value: Value) -> Result<i64, ConversionError> {
    match value {
        Value::Integer(i) => Ok(i),
        Value::Decimal(d) if d.fract() == 0.0 && d >= i64::MIN as f64 && d <= i64::MAX as f64 => {
            Ok(d as i64)
        }
        Value::Decimal(d) => Err(ConversionError::Range {
            value: d.to_string(),
            expected: "integer",
        }),
        Value::String(s) => s.trim().parse().map_err(|_| ConversionError::Type {
            expected: "number",
            found: "string",
        }),
        other => Err(unexpected("number", &other)),
    }
}

macro_rules! impl_from_value_integer {
    ($($ty:ty),*) => {
        $(
            impl FromValue for $ty {
                fn from_value(value: Value) -> Result<Self, ConversionError> {
                    let int = integer(value)?;
                    <$ty>::try_from(int).map_err(|_| ConversionError::Range {
                        value: int.to_string(),
                        expected: stringify!($ty),
                    })
                }
            }
        )*
    };
}

impl_from_value_integer!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

impl<V: FromValue> FromValue for Option<V> {
    const REQUIRED: bool = false;

    fn from_value(value: Value) -> Result<Self, ConversionError> {
        match value {
            Value::Null => Ok(None),
            other => V::from_value(other).map(Some),
        }
    }
}

impl<V: FromValue> FromValue for Vec<V> {
    fn from_value(value: Value) -> Result<Self, ConversionError> {
        let Value::Array(array) = value else {
            return Err(unexpected("list", &value));
        };

        array
            .into_iter()
            .enumerate()
            .map(|(index, element)| {
                V::from_value(element).map_err(|source| ConversionError::Element {
                    index,
                    source: Box::new(source),
                })
            })
            .collect()
    }
}

fn object_entries<V: FromValue>(
    value: Value,
) -> Result<impl Iterator<Item = Result<(String, V), ConversionError>>, ConversionError> {
    let Value::Object(object) = value else {
        return Err(unexpected("map", &value));
    };

    Ok(object.into_iter().map(|(key, element)| {
        match V::from_value(element) {
            Ok(element) => Ok((key, element)),
            Err(source) => Err(ConversionError::Key {
                key,
                source: Box::new(source),
            }),
        }
    }))
}

impl<V: FromValue> FromValue for indexmap::IndexMap<String, V> {
    fn from_value(value: Value) -> Result<Self, ConversionError> {
        object_entries(value)?.collect()
    }
}

impl<V: FromValue> FromValue for HashMap<String, V> {
    fn from_value(value: Value) -> Result<Self, ConversionError> {
        object_entries(value)?.collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[derive(Default, Debug)]
    struct Inner {
        name: String,
    }

    impl Decode for Inner {
        fn descriptor() -> Descriptor<Self> {
            Descriptor::builder()
                .label("name", |i: &mut Self| &mut i.name)
                .build()
        }
    }

    #[derive(Default, Debug)]
    struct Outer {
        port: i64,
        comment: Option<String>,
        inner: Vec<Inner>,
        rest: Body,
    }

    impl Decode for Outer {
        fn descriptor() -> Descriptor<Self> {
            Descriptor::builder()
                .attribute("port", |o: &mut Self| &mut o.port)
                .attribute("comment", |o: &mut Self| &mut o.comment)
                .blocks("inner", |o: &mut Self| &mut o.inner)
                .remainder(|o: &mut Self| &mut o.rest)
                .build()
        }
    }

    #[test]
    fn schema() {
        let (schema, partial) = Outer::descriptor().schema();
        assert!(partial);
        assert_eq!(
            schema,
            BodySchema {
                attributes: vec![
                    AttributeSchema::new("port", true),
                    AttributeSchema::new("comment", false),
                ],
                blocks: vec![BlockHeaderSchema::new("inner", vec!["name".to_string()])],
            }
        );

        let (schema, partial) = Inner::descriptor().schema();
        assert!(!partial);
        assert_eq!(schema, BodySchema::default());
    }

    #[test]
    fn labels() {
        let descriptor = Inner::descriptor();
        let mut inner = Inner::default();
        descriptor.set_labels(&mut inner, &["first".to_string()]);
        assert_eq!(inner.name, "first");
        assert_eq!(descriptor.get_labels(&mut inner), vec!["first"]);
    }

    #[derive(Default)]
    struct LateLabel {
        a: i64,
        name: String,
    }

    impl Decode for LateLabel {
        fn descriptor() -> Descriptor<Self> {
            Descriptor::builder()
                .attribute("a", |l: &mut Self| &mut l.a)
                .label("name", |l: &mut Self| &mut l.name)
                .build()
        }
    }

    #[test]
    #[should_panic(expected = "labels must be declared before")]
    fn labels_after_fields_are_rejected() {
        LateLabel::descriptor();
    }

    #[derive(Default)]
    struct Twice {
        a: i64,
        b: i64,
    }

    impl Decode for Twice {
        fn descriptor() -> Descriptor<Self> {
            Descriptor::builder()
                .attribute("a", |t: &mut Self| &mut t.a)
                .attribute("a", |t: &mut Self| &mut t.b)
                .build()
        }
    }

    #[test]
    #[should_panic(expected = "declared twice")]
    fn duplicate_names_are_rejected() {
        Twice::descriptor();
    }

    #[test]
    fn conversions() {
        assert_eq!(String::from_value(Value::Integer(3)), Ok("3".to_string()));
        assert_eq!(i64::from_value(Value::from("42")), Ok(42));
        assert_eq!(i64::from_value(Value::Decimal(2.0)), Ok(2));
        assert_eq!(bool::from_value(Value::from("true")), Ok(true));
        assert_eq!(Option::<i64>::from_value(Value::Null), Ok(None));
        assert_eq!(
            u8::from_value(Value::Integer(300)),
            Err(ConversionError::Range {
                value: "300".to_string(),
                expected: "u8"
            })
        );
        assert_eq!(
            Vec::<i64>::from_value(Value::Array(vec![Value::Integer(1), Value::Boolean(true)]))
                .map_err(|err| err.to_string()),
            Err("element 1: number required, but have bool".to_string())
        );
        assert_eq!(String::from_value(Value::Unknown), Err(ConversionError::Unknown));
        assert_eq!(String::from_value(Value::Null), Err(ConversionError::Null));
    }
}
