//! document bodies and structural queries against them
//!
//! A parsed file is turned into a [Body]: attributes with their unevaluated expressions and
//! blocks with their labels and nested bodies. Every element keeps its [SourceRange]s so that
//! diagnostics can point back at the text.
//!
//! A body is queried with a [BodySchema]:
//! - [Body::content] requires every attribute and block to be described by the schema
//! - [Body::partial_content] hands everything not described back as a remainder [Body]
//! - [Body::just_attributes] accepts any attribute but no blocks
//!
//! JSON documents have no syntactic difference between attributes and blocks. Their top-level
//! properties are read as attributes and turned into blocks only when a schema asks for a block
//! type of that name: one object level per label, then an object (or an array of objects) for
//! each block body.
use crate::{
    diagnostic::{Diagnostic, Diagnostics},
    sources::{SourceFile, SourceRange},
};
use hcl::{Expression, ObjectKey};
use hcl_edit::{structure::Structure, Span};
use indexmap::IndexMap;

#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub name: String,
    pub expr: hcl::Expression,
    pub range: SourceRange,
    pub name_range: SourceRange,
    pub expr_range: SourceRange,
    /// read from a JSON document, may still be expanded into blocks
    pub(crate) from_json: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub block_type: String,
    pub labels: Vec<String>,
    pub body: Body,
    /// block type through the last label
    pub def_range: SourceRange,
    pub type_range: SourceRange,
    pub label_ranges: Vec<SourceRange>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Body {
    pub attributes: Vec<Attribute>,
    pub blocks: Vec<Block>,
    /// Where to point at when something required is absent from this body
    pub missing_item_range: Option<SourceRange>,
}

/// Expected shape of a body
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BodySchema {
    pub attributes: Vec<AttributeSchema>,
    pub blocks: Vec<BlockHeaderSchema>,
}

#[derive(Debug, Clone, PartialEq, Eq, derive_new::new)]
pub struct AttributeSchema {
    #[new(into)]
    pub name: String,
    pub required: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, derive_new::new)]
pub struct BlockHeaderSchema {
    #[new(into)]
    pub block_type: String,
    pub label_names: Vec<String>,
}

/// Result of a schema query: attributes by name and blocks in document order
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BodyContent {
    pub attributes: IndexMap<String, Attribute>,
    pub blocks: Vec<Block>,
    pub missing_item_range: Option<SourceRange>,
}

impl BodyContent {
    pub fn blocks_of_type<'a>(&'a self, block_type: &'a str) -> impl Iterator<Item = &'a Block> {
        self.blocks
            .iter()
            .filter(move |block| block.block_type == block_type)
    }
}

impl Body {
    pub(crate) fn from_edit(body: hcl_edit::structure::Body, file: &SourceFile) -> Body {
        let mut converted = Body {
            missing_item_range: Some(file.range(0..0)),
            ..Body::default()
        };

        for structure in body {
            match structure {
                Structure::Attribute(attribute) => converted
                    .attributes
                    .push(Attribute::from_edit(attribute, file)),
                Structure::Block(block) => converted.blocks.push(Block::from_edit(block, file)),
            }
        }

        converted
    }

    /// Top-level properties of a JSON document as attributes
    ///
    /// serde_json keeps no positions, so every property points at its quoted name.
    pub(crate) fn from_json(
        value: serde_json::Value,
        file: &SourceFile,
    ) -> Result<Body, Diagnostic> {
        let serde_json::Value::Object(object) = value else {
            return Err(Diagnostic::error(
                "Invalid JSON body",
                "A JSON object is required at the root of the document.",
                file.range(0..0),
            ));
        };

        let mut body = Body {
            missing_item_range: Some(file.range(0..0)),
            ..Body::default()
        };

        let mut cursor = 0;
        for (name, value) in object {
            let name_range = locate_property(file, &name, &mut cursor);
            body.attributes.push(Attribute {
                name,
                expr: json_expression(value),
                range: name_range.clone(),
                name_range: name_range.clone(),
                expr_range: name_range,
                from_json: true,
            });
        }

        Ok(body)
    }

    /// Concatenates multiple bodies (usually one per file) into one
    pub fn merge(bodies: impl IntoIterator<Item = Body>) -> Body {
        let mut merged = Body::default();
        for body in bodies {
            if merged.missing_item_range.is_none() {
                merged.missing_item_range = body.missing_item_range;
            }
            merged.attributes.extend(body.attributes);
            merged.blocks.extend(body.blocks);
        }
        merged
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty() && self.blocks.is_empty()
    }

    /// Every attribute and block must be described by `schema`
    pub fn content(&self, schema: &BodySchema) -> (BodyContent, Diagnostics) {
        let (content, remainder, mut diagnostics) = self.query(schema);

        for attribute in &remainder.attributes {
            let suggestion =
                suggestion(&attribute.name, schema.attributes.iter().map(|a| a.name.as_str()));
            diagnostics.push(Diagnostic::error(
                "Unsupported argument",
                format!(
                    "An argument named {:?} is not expected here.{suggestion}",
                    attribute.name
                ),
                attribute.name_range.clone(),
            ));
        }

        for block in &remainder.blocks {
            let suggestion = suggestion(
                &block.block_type,
                schema.blocks.iter().map(|b| b.block_type.as_str()),
            );
            diagnostics.push(Diagnostic::error(
                "Unsupported block type",
                format!(
                    "Blocks of type {:?} are not expected here.{suggestion}",
                    block.block_type
                ),
                block.type_range.clone(),
            ));
        }

        (content, diagnostics)
    }

    /// Like [Body::content] but returns everything unexpected as remainder
    pub fn partial_content(&self, schema: &BodySchema) -> (BodyContent, Body, Diagnostics) {
        self.query(schema)
    }

    /// Every attribute of this body; blocks are rejected
    pub fn just_attributes(&self) -> (IndexMap<String, Attribute>, Diagnostics) {
        let mut diagnostics = Diagnostics::default();

        for block in &self.blocks {
            diagnostics.push(Diagnostic::error(
                format!("Unexpected {:?} block", block.block_type),
                "Blocks are not allowed here.",
                block.type_range.clone(),
            ));
        }

        let mut attributes = IndexMap::new();
        for attribute in &self.attributes {
            insert_attribute(&mut attributes, attribute, &mut diagnostics);
        }

        (attributes, diagnostics)
    }

    fn query(&self, schema: &BodySchema) -> (BodyContent, Body, Diagnostics) {
        let mut diagnostics = Diagnostics::default();
        let mut content = BodyContent {
            missing_item_range: self.missing_item_range.clone(),
            ..BodyContent::default()
        };
        let mut remainder = Body {
            missing_item_range: self.missing_item_range.clone(),
            ..Body::default()
        };

        let mut json_blocks = vec![];
        for attribute in &self.attributes {
            let header = schema
                .blocks
                .iter()
                .find(|header| header.block_type == attribute.name);
            if let (true, Some(header)) = (attribute.from_json, header) {
                expand_json_blocks(
                    attribute,
                    &attribute.expr,
                    &mut vec![],
                    header.label_names.len(),
                    &mut json_blocks,
                    &mut diagnostics,
                );
                continue;
            }

            if schema.attributes.iter().any(|a| a.name == attribute.name) {
                insert_attribute(&mut content.attributes, attribute, &mut diagnostics);
            } else {
                remainder.attributes.push(attribute.clone());
            }
        }

        for required in schema.attributes.iter().filter(|a| a.required) {
            if !content.attributes.contains_key(&required.name) {
                diagnostics.push(Diagnostic::error(
                    "Missing required argument",
                    format!(
                        "The argument {:?} is required, but no definition was found.",
                        required.name
                    ),
                    self.missing_item_range.clone(),
                ));
            }
        }

        for block in &self.blocks {
            let Some(header) = schema
                .blocks
                .iter()
                .find(|header| header.block_type == block.block_type)
            else {
                remainder.blocks.push(block.clone());
                continue;
            };

            if let Some(diagnostic) = check_labels(block, header) {
                diagnostics.push(diagnostic);
                continue;
            }

            content.blocks.push(block.clone());
        }
        content.blocks.extend(json_blocks);

        (content, remainder, diagnostics)
    }
}

impl Attribute {
    fn from_edit(attribute: hcl_edit::structure::Attribute, file: &SourceFile) -> Attribute {
        let range = file.range(attribute.span().unwrap_or(0..0));
        let name_range = file.range(attribute.key.span().unwrap_or(0..0));
        let expr_range = file.range(attribute.value.span().unwrap_or(0..0));

        Attribute {
            name: attribute.key.as_str().to_string(),
            expr: attribute.value.into(),
            range,
            name_range,
            expr_range,
            from_json: false,
        }
    }
}

impl Block {
    fn from_edit(block: hcl_edit::structure::Block, file: &SourceFile) -> Block {
        let type_range = file.range(block.ident.span().unwrap_or(0..0));
        let label_ranges: Vec<_> = block
            .labels
            .iter()
            .map(|label| file.range(label.span().unwrap_or(0..0)))
            .collect();
        let def_range = match label_ranges.last() {
            Some(last) => type_range.to(last),
            None => type_range.clone(),
        };

        let header_end = def_range.end.byte;
        let open_brace = file
            .text()
            .get(header_end..)
            .and_then(|rest| rest.find('{'))
            .map_or(header_end, |offset| header_end + offset);

        let mut body = Body::from_edit(block.body, file);
        body.missing_item_range = Some(file.range(open_brace..open_brace));

        Block {
            block_type: block.ident.as_str().to_string(),
            labels: block
                .labels
                .iter()
                .map(|label| label.as_str().to_string())
                .collect(),
            body,
            def_range,
            type_range,
            label_ranges,
        }
    }
}

fn json_expression(value: serde_json::Value) -> Expression {
    match value {
        serde_json::Value::Null => Expression::Null,
        serde_json::Value::Bool(b) => Expression::Bool(b),
        serde_json::Value::Number(n) => match (n.as_i64(), n.as_u64(), n.as_f64()) {
            (Some(int), _, _) => Expression::from(int),
            (None, Some(uint), _) => Expression::from(uint),
            (None, None, Some(float)) => Expression::from(float),
            (None, None, None) => Expression::Null,
        },
        // strings are templates, as in native syntax
        serde_json::Value::String(s) if s.contains("${") || s.contains("%{") => {
            Expression::from(hcl::TemplateExpr::from(s))
        }
        serde_json::Value::String(s) => Expression::String(s),
        serde_json::Value::Array(array) => {
            Expression::Array(array.into_iter().map(json_expression).collect())
        }
        serde_json::Value::Object(object) => Expression::Object(
            object
                .into_iter()
                .map(|(key, value)| {
                    let key = ObjectKey::Expression(Expression::String(key));
                    (key, json_expression(value))
                })
                .collect(),
        ),
    }
}

fn json_key(key: &ObjectKey) -> Option<String> {
    match key {
        ObjectKey::Identifier(ident) => Some(ident.to_string()),
        ObjectKey::Expression(Expression::String(key)) => Some(key.clone()),
        _ => None,
    }
}

/// Range of the next `"name"` at or after `cursor`, advancing it
fn locate_property(file: &SourceFile, name: &str, cursor: &mut usize) -> SourceRange {
    let quoted = serde_json::Value::from(name).to_string();
    let rest = file.text().get(*cursor..).unwrap_or_default();

    match rest.find(&quoted) {
        Some(found) => {
            let start = *cursor + found;
            *cursor = start + quoted.len();
            file.range(start..*cursor)
        }
        None => file.range(*cursor..*cursor),
    }
}

/// Blocks described by the value of a JSON property, `remaining` labels still to read
fn expand_json_blocks(
    attribute: &Attribute,
    expr: &Expression,
    labels: &mut Vec<String>,
    remaining: usize,
    blocks: &mut Vec<Block>,
    diagnostics: &mut Diagnostics,
) {
    match expr {
        Expression::Array(elements) => {
            for element in elements {
                expand_json_blocks(attribute, element, labels, remaining, blocks, diagnostics);
            }
        }
        Expression::Object(object) if remaining == 0 => {
            blocks.push(json_block(attribute, labels.clone(), object));
        }
        Expression::Object(object) => {
            for (key, value) in object {
                let Some(label) = json_key(key) else {
                    continue;
                };

                labels.push(label);
                expand_json_blocks(attribute, value, labels, remaining - 1, blocks, diagnostics);
                labels.pop();
            }
        }
        _ => {
            let detail = if remaining == 0 {
                format!(
                    "A JSON object is required here, setting the arguments for this {:?} block.",
                    attribute.name
                )
            } else {
                format!(
                    "A JSON object is required here, to specify block labels for this {:?} block.",
                    attribute.name
                )
            };
            diagnostics.push(Diagnostic::error(
                "Incorrect JSON value type",
                detail,
                attribute.name_range.clone(),
            ));
        }
    }
}

fn json_block(
    attribute: &Attribute,
    labels: Vec<String>,
    object: &hcl::Object<ObjectKey, Expression>,
) -> Block {
    let attributes = object
        .iter()
        .filter_map(|(key, expr)| {
            Some(Attribute {
                name: json_key(key)?,
                expr: expr.clone(),
                range: attribute.range.clone(),
                name_range: attribute.name_range.clone(),
                expr_range: attribute.expr_range.clone(),
                from_json: true,
            })
        })
        .collect();

    Block {
        block_type: attribute.name.clone(),
        label_ranges: vec![attribute.name_range.clone(); labels.len()],
        labels,
        body: Body {
            attributes,
            blocks: vec![],
            missing_item_range: Some(attribute.name_range.clone()),
        },
        def_range: attribute.name_range.clone(),
        type_range: attribute.name_range.clone(),
    }
}

fn insert_attribute(
    attributes: &mut IndexMap<String, Attribute>,
    attribute: &Attribute,
    diagnostics: &mut Diagnostics,
) {
    if let Some(existing) = attributes.get(&attribute.name) {
        diagnostics.push(Diagnostic::error(
            "Duplicate argument",
            format!(
                "The argument {:?} was already set at {}. Each argument may be set only once.",
                attribute.name, existing.name_range
            ),
            attribute.name_range.clone(),
        ));
        return;
    }

    attributes.insert(attribute.name.clone(), attribute.clone());
}

fn check_labels(block: &Block, header: &BlockHeaderSchema) -> Option<Diagnostic> {
    let expected = header.label_names.len();
    let found = block.labels.len();

    if found < expected {
        return Some(Diagnostic::error(
            format!("Missing name for {}", block.block_type),
            format!(
                "All {} blocks must have {expected} labels ({}).",
                block.block_type,
                header.label_names.join(", ")
            ),
            block
                .label_ranges
                .last()
                .unwrap_or(&block.type_range)
                .clone(),
        ));
    }

    if found > expected {
        let detail = match expected {
            0 => format!("No labels are expected for {} blocks.", block.block_type),
            _ => format!(
                "Only {expected} labels ({}) are expected for {} blocks.",
                header.label_names.join(", "),
                block.block_type
            ),
        };
        return Some(Diagnostic::error(
            format!("Extraneous label for {}", block.block_type),
            detail,
            block.label_ranges[expected].clone(),
        ));
    }

    None
}

/// ` Did you mean "x"?` when a candidate is close enough to `given`
fn suggestion<'a>(given: &str, candidates: impl Iterator<Item = &'a str>) -> String {
    candidates
        .map(|candidate| (levenshtein(given, candidate), candidate))
        .filter(|(distance, _)| *distance < 3)
        .min_by_key(|(distance, _)| *distance)
        .map(|(_, candidate)| format!(" Did you mean {candidate:?}?"))
        .unwrap_or_default()
}

fn levenshtein(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut previous: Vec<usize> = (0..=b.len()).collect();

    for (i, a_char) in a.chars().enumerate() {
        let mut current = vec![i + 1; b.len() + 1];
        for (j, b_char) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(a_char != *b_char);
            current[j + 1] = substitution.min(previous[j + 1] + 1).min(current[j] + 1);
        }
        previous = current;
    }

    previous[b.len()]
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn schema() -> BodySchema {
        BodySchema {
            attributes: vec![
                AttributeSchema::new("name", true),
                AttributeSchema::new("port", false),
            ],
            blocks: vec![BlockHeaderSchema::new("service", vec!["type".into(), "name".into()])],
        }
    }

    #[test]
    fn ranges() {
        let body = crate::hcl_body!("service \"http\" \"web\" {\n  port = 80\n}\n");
        let block = &body.blocks[0];
        assert_eq!(block.def_range.to_string(), "test.hcl:1,1-21");
        assert_eq!(block.type_range.to_string(), "test.hcl:1,1-8");
        assert_eq!(
            block.body.missing_item_range.as_ref().map(ToString::to_string),
            Some("test.hcl:1,22-22".to_string())
        );

        let attribute = &block.body.attributes[0];
        assert_eq!(attribute.name_range.to_string(), "test.hcl:2,3-7");
        assert_eq!(attribute.expr_range.to_string(), "test.hcl:2,10-12");
    }

    #[test]
    fn exact_content_rejects_unknown_items() {
        let body = crate::hcl_body!(
            r#"
            name = "x"
            prot = 1
            servce "a" "b" {}
            "#
        );

        let (content, diagnostics) = body.content(&schema());
        assert_eq!(content.attributes.len(), 1);

        let messages: Vec<_> = diagnostics.iter().map(|d| d.detail.as_str()).collect();
        assert_eq!(
            messages,
            vec![
                "An argument named \"prot\" is not expected here. Did you mean \"port\"?",
                "Blocks of type \"servce\" are not expected here. Did you mean \"service\"?",
            ]
        );
    }

    #[test]
    fn partial_content_returns_remainder() {
        let body = crate::hcl_body!(
            r#"
            name = "x"
            extra = 1
            other {}
            service "a" "b" {}
            "#
        );

        let (content, remainder, diagnostics) = body.partial_content(&schema());
        assert!(diagnostics.is_empty());
        assert_eq!(content.blocks.len(), 1);
        assert_eq!(remainder.attributes[0].name, "extra");
        assert_eq!(remainder.blocks[0].block_type, "other");
    }

    #[test]
    fn missing_required_attribute() {
        let body = crate::hcl_body!("port = 1\n");
        let (_, diagnostics) = body.content(&schema());

        assert_eq!(diagnostics.len(), 1);
        let diagnostic = diagnostics.iter().next().expect("one diagnostic");
        assert_eq!(diagnostic.summary, "Missing required argument");
        assert_eq!(
            diagnostic.subject.as_ref().map(ToString::to_string),
            Some("test.hcl:1,1-1".to_string())
        );
    }

    #[test]
    fn label_count_is_checked() {
        let body = crate::hcl_body!(
            r#"
            name = "x"
            service "a" {}
            service "a" "b" "c" {}
            "#
        );
        let (content, diagnostics) = body.content(&schema());

        assert!(content.blocks.is_empty());
        let summaries: Vec<_> = diagnostics.iter().map(|d| d.summary.as_str()).collect();
        assert_eq!(
            summaries,
            vec!["Missing name for service", "Extraneous label for service"]
        );
    }

    #[test]
    fn just_attributes_rejects_blocks() {
        let body = crate::hcl_body!("a = 1\nb {}\n");
        let (attributes, diagnostics) = body.just_attributes();
        assert_eq!(attributes.len(), 1);
        assert_eq!(
            diagnostics.iter().next().map(|d| d.summary.as_str()),
            Some("Unexpected \"b\" block")
        );
    }

    #[test]
    fn merged_bodies_report_duplicates() {
        let one = crate::hcl_body!("name = 1\n");
        let two = crate::hcl_body!("name = 2\n");
        let body = Body::merge([one, two]);

        let (_, diagnostics) = body.content(&schema());
        assert_eq!(
            diagnostics.iter().next().map(|d| d.summary.as_str()),
            Some("Duplicate argument")
        );
    }

    fn json_body(src: &str) -> Body {
        crate::sources::Sources::default()
            .parse("test.hcl.json", src)
            .expect("valid json")
    }

    #[test]
    fn json_properties_become_blocks_when_the_schema_asks() {
        let body = json_body(
            r#"{
  "name": "x",
  "service": {
    "http": {
      "web": { "port": 80 },
      "api": [{ "port": 81 }, { "port": 82 }]
    }
  }
}"#,
        );

        let (content, diagnostics) = body.content(&schema());
        assert!(diagnostics.is_empty(), "{diagnostics}");
        assert_eq!(
            content.attributes["name"].name_range.to_string(),
            "test.hcl.json:2,3-9"
        );

        let blocks: Vec<_> = content
            .blocks
            .iter()
            .map(|block| (block.labels.join("."), block.body.attributes.len()))
            .collect();
        assert_eq!(
            blocks,
            vec![
                ("http.web".to_string(), 1),
                ("http.api".to_string(), 1),
                ("http.api".to_string(), 1),
            ]
        );
        assert_eq!(
            content.blocks[0].def_range.to_string(),
            "test.hcl.json:3,3-12"
        );

        // without a block schema the property stays an attribute
        let (attributes, diagnostics) = body.just_attributes();
        assert!(diagnostics.is_empty());
        assert_eq!(attributes.len(), 2);
    }

    #[test]
    fn json_blocks_need_objects() {
        let body = json_body(r#"{"name": "x", "service": {"http": 1}}"#);
        let (content, diagnostics) = body.content(&schema());

        assert!(content.blocks.is_empty());
        assert_eq!(
            diagnostics.to_string(),
            "test.hcl.json:1,15-24: Incorrect JSON value type; \
             A JSON object is required here, to specify block labels for this \"service\" block."
        );
    }

    #[test]
    fn json_root_must_be_an_object() {
        let diagnostics = crate::sources::Sources::default()
            .parse("test.hcl.json", "[1, 2]")
            .expect_err("not an object");
        assert_eq!(
            diagnostics.iter().next().map(|d| d.summary.as_str()),
            Some("Invalid JSON body")
        );
    }

    #[test]
    fn edit_distance() {
        assert_eq!(levenshtein("prot", "port"), 2);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("same", "same"), 0);
    }
}
