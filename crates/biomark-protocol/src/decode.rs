//! Schema-driven decoding of agent-supplied parameter strings.
//!
//! Parameter values arrive as strings whatever their logical type, and list
//! values show up in several encodings depending on how the model chose to
//! serialize them: a canonical JSON array, a scripting-style literal with
//! single quotes and bare identifiers, or a comma-separated fragment with
//! stray brackets. [`decode`] resolves all of them with a fixed strategy
//! order so the same raw string always produces the same value.

use indexmap::IndexMap;
use serde_json::Value;
use thiserror::Error;

use crate::invocation::Parameter;

/// Expected logical type of one parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    Text,
    Number,
    Bool,
    TextList,
    NumberList,
    BoolList,
}

impl ParamType {
    fn label(self) -> &'static str {
        match self {
            ParamType::Text => "text",
            ParamType::Number => "number",
            ParamType::Bool => "boolean",
            ParamType::TextList => "text list",
            ParamType::NumberList => "number list",
            ParamType::BoolList => "boolean list",
        }
    }
}

/// A decoded parameter value.
///
/// List decoding never fails outright: when the permissive recovery pass
/// cannot coerce every element of a `NumberList`/`BoolList` request, the
/// decoder hands back the raw elements as a [`ParamValue::TextList`] rather
/// than guessing. Callers that need strict element types check the variant
/// through the typed accessors on [`DecodedParams`].
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Text(String),
    Number(f64),
    Bool(bool),
    TextList(Vec<String>),
    NumberList(Vec<f64>),
    BoolList(Vec<bool>),
}

/// Decode failure for a single parameter.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("parameter {name}: cannot parse {value:?} as {expected}")]
    Scalar {
        name: String,
        value: String,
        expected: &'static str,
    },
    #[error("missing required parameter: {0}")]
    Missing(String),
    #[error("duplicate parameter: {0}")]
    Duplicate(String),
}

#[derive(Debug, Clone, Copy)]
struct SchemaField {
    ty: ParamType,
    required: bool,
}

/// Mapping from parameter name to expected logical type, per call site.
#[derive(Debug, Clone, Default)]
pub struct ParamSchema {
    fields: IndexMap<String, SchemaField>,
}

impl ParamSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn required(mut self, name: impl Into<String>, ty: ParamType) -> Self {
        self.fields
            .insert(name.into(), SchemaField { ty, required: true });
        self
    }

    pub fn optional(mut self, name: impl Into<String>, ty: ParamType) -> Self {
        self.fields.insert(name.into(), SchemaField {
            ty,
            required: false,
        });
        self
    }
}

/// Decoded parameters, in the order they were received.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedParams {
    values: IndexMap<String, ParamValue>,
}

impl DecodedParams {
    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.values.get(name)
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        match self.values.get(name)? {
            ParamValue::Text(value) => Some(value),
            _ => None,
        }
    }

    pub fn number(&self, name: &str) -> Option<f64> {
        match self.values.get(name)? {
            ParamValue::Number(value) => Some(*value),
            _ => None,
        }
    }

    pub fn boolean(&self, name: &str) -> Option<bool> {
        match self.values.get(name)? {
            ParamValue::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn text_list(&self, name: &str) -> Option<&[String]> {
        match self.values.get(name)? {
            ParamValue::TextList(values) => Some(values),
            _ => None,
        }
    }

    pub fn number_list(&self, name: &str) -> Option<&[f64]> {
        match self.values.get(name)? {
            ParamValue::NumberList(values) => Some(values),
            _ => None,
        }
    }

    pub fn bool_list(&self, name: &str) -> Option<&[bool]> {
        match self.values.get(name)? {
            ParamValue::BoolList(values) => Some(values),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.values.iter().map(|(name, value)| (name.as_str(), value))
    }
}

/// Decode an ordered parameter list against a schema.
///
/// Pure and deterministic: the same parameters and schema always yield the
/// same result. Parameters not named in the schema are ignored; duplicate
/// names and missing required parameters are errors.
pub fn decode(parameters: &[Parameter], schema: &ParamSchema) -> Result<DecodedParams, DecodeError> {
    let mut values = IndexMap::new();
    for parameter in parameters {
        let Some(field) = schema.fields.get(&parameter.name) else {
            continue;
        };
        if values.contains_key(&parameter.name) {
            return Err(DecodeError::Duplicate(parameter.name.clone()));
        }
        let value = decode_value(&parameter.name, &parameter.value, field.ty)?;
        values.insert(parameter.name.clone(), value);
    }

    for (name, field) in &schema.fields {
        if field.required && !values.contains_key(name) {
            return Err(DecodeError::Missing(name.clone()));
        }
    }

    Ok(DecodedParams { values })
}

fn decode_value(name: &str, raw: &str, ty: ParamType) -> Result<ParamValue, DecodeError> {
    match ty {
        ParamType::Text => Ok(ParamValue::Text(raw.to_owned())),
        ParamType::Number => parse_number(raw.trim())
            .map(ParamValue::Number)
            .ok_or_else(|| DecodeError::Scalar {
                name: name.to_owned(),
                value: raw.to_owned(),
                expected: ty.label(),
            }),
        ParamType::Bool => parse_bool(raw.trim()).map(ParamValue::Bool).ok_or_else(|| {
            DecodeError::Scalar {
                name: name.to_owned(),
                value: raw.to_owned(),
                expected: ty.label(),
            }
        }),
        ParamType::TextList => Ok(decode_list(raw, ElemKind::Text)),
        ParamType::NumberList => Ok(decode_list(raw, ElemKind::Number)),
        ParamType::BoolList => Ok(decode_list(raw, ElemKind::Bool)),
    }
}

/// Numeric lexical forms only; `nan`/`inf` parse as floats but are not
/// values an agent can meaningfully send, so they stay text.
fn parse_number(raw: &str) -> Option<f64> {
    raw.parse::<f64>().ok().filter(|value| value.is_finite())
}

fn parse_bool(raw: &str) -> Option<bool> {
    if raw.eq_ignore_ascii_case("true") {
        Some(true)
    } else if raw.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ElemKind {
    Text,
    Number,
    Bool,
}

/// Decode a list value. Strategies are tried in a fixed order and the first
/// success wins: strict JSON array, then scripting-style literal, then
/// permissive recovery. The recovery pass never fails, so neither does this
/// function.
fn decode_list(raw: &str, kind: ElemKind) -> ParamValue {
    if let Some(value) = parse_json_list(raw, kind) {
        return value;
    }
    if let Some(value) = parse_literal_list(raw, kind) {
        return value;
    }
    recover_list(raw, kind)
}

/// Strategy (a): canonical JSON array with typed elements.
fn parse_json_list(raw: &str, kind: ElemKind) -> Option<ParamValue> {
    let parsed: Value = serde_json::from_str(raw.trim()).ok()?;
    let items = parsed.as_array()?;
    validate_json_elements(items, kind)
}

fn validate_json_elements(items: &[Value], kind: ElemKind) -> Option<ParamValue> {
    match kind {
        ElemKind::Text => items
            .iter()
            .map(|item| item.as_str().map(str::to_owned))
            .collect::<Option<Vec<_>>>()
            .map(ParamValue::TextList),
        // Numeric-looking strings are coerced for number lists only.
        ElemKind::Number => items
            .iter()
            .map(|item| match item {
                Value::Number(number) => number.as_f64(),
                Value::String(text) => parse_number(text.trim()),
                _ => None,
            })
            .collect::<Option<Vec<_>>>()
            .map(ParamValue::NumberList),
        ElemKind::Bool => items
            .iter()
            .map(Value::as_bool)
            .collect::<Option<Vec<_>>>()
            .map(ParamValue::BoolList),
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Literal {
    Str(String),
    Num(f64),
    Bool(bool),
}

/// Strategy (b): scripting-style list literal. Accepts single- or
/// double-quoted strings, bare identifiers, `True`/`False` in either case,
/// and optional surrounding brackets or parentheses.
fn parse_literal_list(raw: &str, kind: ElemKind) -> Option<ParamValue> {
    let trimmed = raw.trim();
    let inner = strip_matching_delimiters(trimmed);

    let mut literals = Vec::new();
    let mut chars = inner.chars().peekable();
    loop {
        while matches!(chars.peek(), Some(c) if c.is_whitespace()) {
            chars.next();
        }
        match chars.peek().copied() {
            None => break,
            Some(quote) if quote == '\'' || quote == '"' => {
                chars.next();
                let mut text = String::new();
                let mut closed = false;
                while let Some(c) = chars.next() {
                    if c == '\\' {
                        match chars.next() {
                            Some(escaped) => text.push(escaped),
                            None => return None,
                        }
                    } else if c == quote {
                        closed = true;
                        break;
                    } else {
                        text.push(c);
                    }
                }
                if !closed {
                    return None;
                }
                literals.push(Literal::Str(text));
            }
            Some(_) => {
                let mut token = String::new();
                while let Some(&c) = chars.peek() {
                    if c == ',' {
                        break;
                    }
                    if c == '\'' || c == '"' || c == '[' || c == ']' || c == '(' || c == ')' {
                        // Quotes or brackets inside a bare token mean this is
                        // not a well-formed literal.
                        return None;
                    }
                    token.push(c);
                    chars.next();
                }
                let token = token.trim();
                if token.is_empty() {
                    return None;
                }
                literals.push(bare_literal(token));
            }
        }
        // After one item: optional whitespace, then either a comma or the end.
        while matches!(chars.peek(), Some(c) if c.is_whitespace()) {
            chars.next();
        }
        match chars.next() {
            None => break,
            Some(',') => continue,
            Some(_) => return None,
        }
    }

    if literals.is_empty() {
        return None;
    }
    validate_literal_elements(&literals, kind)
}

fn strip_matching_delimiters(trimmed: &str) -> &str {
    for (open, close) in [('[', ']'), ('(', ')')] {
        if trimmed.len() >= 2 && trimmed.starts_with(open) && trimmed.ends_with(close) {
            return trimmed[1..trimmed.len() - 1].trim();
        }
    }
    trimmed
}

fn bare_literal(token: &str) -> Literal {
    if let Some(number) = parse_number(token) {
        return Literal::Num(number);
    }
    match parse_bool(token) {
        Some(flag) => Literal::Bool(flag),
        None => Literal::Str(token.to_owned()),
    }
}

fn validate_literal_elements(literals: &[Literal], kind: ElemKind) -> Option<ParamValue> {
    match kind {
        ElemKind::Text => literals
            .iter()
            .map(|literal| match literal {
                Literal::Str(text) => Some(text.clone()),
                _ => None,
            })
            .collect::<Option<Vec<_>>>()
            .map(ParamValue::TextList),
        ElemKind::Number => literals
            .iter()
            .map(|literal| match literal {
                Literal::Num(number) => Some(*number),
                Literal::Str(text) => parse_number(text.trim()),
                Literal::Bool(_) => None,
            })
            .collect::<Option<Vec<_>>>()
            .map(ParamValue::NumberList),
        ElemKind::Bool => literals
            .iter()
            .map(|literal| match literal {
                Literal::Bool(flag) => Some(*flag),
                _ => None,
            })
            .collect::<Option<Vec<_>>>()
            .map(ParamValue::BoolList),
    }
}

/// Strategy (c): permissive recovery. Strips one leading and one trailing
/// bracket/quote run, splits on top-level commas, trims each element, and
/// coerces per the expected element type. Never fails; for non-empty input
/// the result is a non-empty list.
fn recover_list(raw: &str, kind: ElemKind) -> ParamValue {
    let stripped = raw
        .trim()
        .trim_start_matches(['[', '{', '(', '\'', '"'])
        .trim_end_matches([']', '}', ')', '\'', '"']);

    let items: Vec<String> = split_top_level(stripped)
        .into_iter()
        .map(|part| part.trim().trim_matches(['\'', '"']).trim().to_owned())
        .collect();

    match kind {
        ElemKind::Text => ParamValue::TextList(items),
        ElemKind::Number => {
            match items
                .iter()
                .map(|item| parse_number(item))
                .collect::<Option<Vec<_>>>()
            {
                Some(numbers) => ParamValue::NumberList(numbers),
                None => ParamValue::TextList(items),
            }
        }
        ElemKind::Bool => {
            match items
                .iter()
                .map(|item| parse_bool(item))
                .collect::<Option<Vec<_>>>()
            {
                Some(flags) => ParamValue::BoolList(flags),
                None => ParamValue::TextList(items),
            }
        }
    }
}

/// Split on commas that sit outside quotes and outside nested brackets.
fn split_top_level(input: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth: u32 = 0;
    let mut in_quote: Option<char> = None;

    for c in input.chars() {
        match in_quote {
            Some(quote) => {
                if c == quote {
                    in_quote = None;
                }
                current.push(c);
            }
            None => match c {
                '\'' | '"' => {
                    in_quote = Some(c);
                    current.push(c);
                }
                '[' | '{' | '(' => {
                    depth += 1;
                    current.push(c);
                }
                ']' | '}' | ')' => {
                    depth = depth.saturating_sub(1);
                    current.push(c);
                }
                ',' if depth == 0 => {
                    parts.push(std::mem::take(&mut current));
                }
                _ => current.push(c),
            },
        }
    }
    parts.push(current);
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> Vec<Parameter> {
        pairs
            .iter()
            .map(|(name, value)| Parameter::new(*name, *value))
            .collect()
    }

    #[test]
    fn scalars_decode() {
        let schema = ParamSchema::new()
            .required("threshold", ParamType::Number)
            .required("label", ParamType::Text)
            .required("normalize", ParamType::Bool);
        let decoded = decode(
            &params(&[
                ("threshold", "10.5"),
                ("label", "EGFR"),
                ("normalize", "TRUE"),
            ]),
            &schema,
        )
        .unwrap();

        assert_eq!(decoded.number("threshold"), Some(10.5));
        assert_eq!(decoded.text("label"), Some("EGFR"));
        assert_eq!(decoded.boolean("normalize"), Some(true));
    }

    #[test]
    fn integer_lexical_form_is_a_number() {
        let schema = ParamSchema::new().required("threshold", ParamType::Number);
        let decoded = decode(&params(&[("threshold", "42")]), &schema).unwrap();
        assert_eq!(decoded.number("threshold"), Some(42.0));
    }

    #[test]
    fn bad_scalar_is_fatal() {
        let schema = ParamSchema::new().required("threshold", ParamType::Number);
        let err = decode(&params(&[("threshold", "ten")]), &schema).unwrap_err();
        assert!(matches!(err, DecodeError::Scalar { ref name, .. } if name == "threshold"));
    }

    #[test]
    fn missing_required_parameter_is_an_error() {
        let schema = ParamSchema::new().required("query", ParamType::Text);
        let err = decode(&[], &schema).unwrap_err();
        assert_eq!(err, DecodeError::Missing("query".to_owned()));
    }

    #[test]
    fn duplicate_parameter_is_an_error() {
        let schema = ParamSchema::new().required("query", ParamType::Text);
        let err = decode(&params(&[("query", "a"), ("query", "b")]), &schema).unwrap_err();
        assert_eq!(err, DecodeError::Duplicate("query".to_owned()));
    }

    #[test]
    fn optional_parameter_may_be_absent() {
        let schema = ParamSchema::new()
            .required("query", ParamType::Text)
            .optional("limit", ParamType::Number);
        let decoded = decode(&params(&[("query", "egfr")]), &schema).unwrap();
        assert!(decoded.get("limit").is_none());
    }

    #[test]
    fn unknown_parameters_are_ignored() {
        let schema = ParamSchema::new().required("query", ParamType::Text);
        let decoded = decode(&params(&[("query", "a"), ("extra", "b")]), &schema).unwrap();
        assert!(decoded.get("extra").is_none());
    }

    #[test]
    fn json_list_roundtrip_preserves_order() {
        let schema = ParamSchema::new().required("ids", ParamType::TextList);
        let original = vec!["R01-005".to_owned(), "R01-006".to_owned(), "R01-100".to_owned()];
        let encoded = serde_json::to_string(&original).unwrap();
        let decoded = decode(&params(&[("ids", &encoded)]), &schema).unwrap();
        assert_eq!(decoded.text_list("ids"), Some(original.as_slice()));
    }

    #[test]
    fn json_number_list_decodes_strictly() {
        let schema = ParamSchema::new().required("values", ParamType::NumberList);
        let decoded = decode(&params(&[("values", "[1, 2.5, 3]")]), &schema).unwrap();
        assert_eq!(decoded.number_list("values"), Some([1.0, 2.5, 3.0].as_slice()));
    }

    #[test]
    fn numeric_strings_coerce_for_number_lists_only() {
        let numbers = ParamSchema::new().required("values", ParamType::NumberList);
        let decoded = decode(&params(&[("values", r#"["1", "2"]"#)]), &numbers).unwrap();
        assert_eq!(decoded.number_list("values"), Some([1.0, 2.0].as_slice()));

        // The same payload against a text schema stays textual.
        let texts = ParamSchema::new().required("values", ParamType::TextList);
        let decoded = decode(&params(&[("values", r#"["1", "2"]"#)]), &texts).unwrap();
        assert_eq!(
            decoded.text_list("values"),
            Some(["1".to_owned(), "2".to_owned()].as_slice())
        );
    }

    #[test]
    fn literal_list_with_single_quotes_decodes() {
        let schema = ParamSchema::new().required("ids", ParamType::TextList);
        let decoded = decode(&params(&[("ids", "['R01-005', 'R01-006']")]), &schema).unwrap();
        assert_eq!(
            decoded.text_list("ids"),
            Some(["R01-005".to_owned(), "R01-006".to_owned()].as_slice())
        );
    }

    #[test]
    fn literal_list_with_python_booleans_decodes() {
        let schema = ParamSchema::new().required("events", ParamType::BoolList);
        let decoded = decode(&params(&[("events", "[True, False, True]")]), &schema).unwrap();
        assert_eq!(
            decoded.bool_list("events"),
            Some([true, false, true].as_slice())
        );
    }

    #[test]
    fn bare_fragment_recovers_to_text_list() {
        let schema = ParamSchema::new().required("ids", ParamType::TextList);
        let decoded = decode(&params(&[("ids", r#"a, b, "c"}"#)]), &schema).unwrap();
        assert_eq!(
            decoded.text_list("ids"),
            Some(["a".to_owned(), "b".to_owned(), "c".to_owned()].as_slice())
        );
    }

    #[test]
    fn recovery_without_delimiter_yields_single_element() {
        let schema = ParamSchema::new().required("ids", ParamType::TextList);
        let decoded = decode(&params(&[("ids", "just-one-value")]), &schema).unwrap();
        assert_eq!(decoded.text_list("ids"), Some(["just-one-value".to_owned()].as_slice()));
    }

    #[test]
    fn unparsable_number_list_degrades_to_text() {
        let schema = ParamSchema::new().required("values", ParamType::NumberList);
        let decoded = decode(&params(&[("values", "1, fast, 3")]), &schema).unwrap();
        assert!(decoded.number_list("values").is_none());
        assert_eq!(
            decoded.text_list("values"),
            Some(["1".to_owned(), "fast".to_owned(), "3".to_owned()].as_slice())
        );
    }

    #[test]
    fn non_finite_forms_are_not_numbers() {
        let scalar = ParamSchema::new().required("threshold", ParamType::Number);
        assert!(decode(&params(&[("threshold", "NaN")]), &scalar).is_err());
        assert!(decode(&params(&[("threshold", "inf")]), &scalar).is_err());

        let lists = ParamSchema::new().required("values", ParamType::NumberList);
        let decoded = decode(&params(&[("values", "nan, 1")]), &lists).unwrap();
        assert!(decoded.number_list("values").is_none());
        assert_eq!(
            decoded.text_list("values"),
            Some(["nan".to_owned(), "1".to_owned()].as_slice())
        );
    }

    #[test]
    fn nested_arrays_do_not_split_inside_brackets() {
        let schema = ParamSchema::new().required("values", ParamType::TextList);
        let decoded = decode(&params(&[("values", "[a, [b, c], d")]), &schema).unwrap();
        assert_eq!(
            decoded.text_list("values"),
            Some(["a".to_owned(), "[b, c]".to_owned(), "d".to_owned()].as_slice())
        );
    }

    #[test]
    fn decode_is_idempotent() {
        let schema = ParamSchema::new()
            .required("values", ParamType::NumberList)
            .required("ids", ParamType::TextList);
        let raw = params(&[("values", "[1, '2', 3]"), ("ids", "a, 'b', c]")]);
        let first = decode(&raw, &schema).unwrap();
        let second = decode(&raw, &schema).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn decoded_params_preserve_input_order() {
        let schema = ParamSchema::new()
            .required("b", ParamType::Text)
            .required("a", ParamType::Text);
        let decoded = decode(&params(&[("a", "1"), ("b", "2")]), &schema).unwrap();
        let names: Vec<&str> = decoded.iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            // The recovery pass accepts any non-empty string and yields a
            // non-empty list.
            #[test]
            fn recovery_is_total(raw in ".{1,64}") {
                for kind in [ElemKind::Text, ElemKind::Number, ElemKind::Bool] {
                    match recover_list(&raw, kind) {
                        ParamValue::TextList(items) => prop_assert!(!items.is_empty()),
                        ParamValue::NumberList(items) => prop_assert!(!items.is_empty()),
                        ParamValue::BoolList(items) => prop_assert!(!items.is_empty()),
                        other => prop_assert!(false, "unexpected scalar {other:?}"),
                    }
                }
            }

            // Whatever the encoding, the full decoder never rejects a list
            // parameter.
            #[test]
            fn list_decode_never_fails(raw in ".{0,64}") {
                let schema = ParamSchema::new().required("values", ParamType::TextList);
                prop_assert!(decode(&params(&[("values", &raw)]), &schema).is_ok());
            }

            // Same raw string, same schema, same value.
            #[test]
            fn list_decode_is_deterministic(raw in ".{0,64}") {
                for ty in [ParamType::TextList, ParamType::NumberList, ParamType::BoolList] {
                    let schema = ParamSchema::new().required("values", ty);
                    let first = decode(&params(&[("values", &raw)]), &schema).unwrap();
                    let second = decode(&params(&[("values", &raw)]), &schema).unwrap();
                    prop_assert_eq!(first, second);
                }
            }

            // Canonical JSON round-trip through the strict strategy.
            #[test]
            fn canonical_roundtrip(items in proptest::collection::vec("[a-z]{1,8}", 1..6)) {
                let schema = ParamSchema::new().required("values", ParamType::TextList);
                let encoded = serde_json::to_string(&items).unwrap();
                let decoded = decode(&params(&[("values", &encoded)]), &schema).unwrap();
                prop_assert_eq!(decoded.text_list("values").unwrap(), items.as_slice());
            }
        }
    }
}
