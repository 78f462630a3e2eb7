//! Batch payload decoding
//!
//! A batch carries several submissions in one request. Decoding yields raw
//! fields only; validation is applied per item by `Validator::validate_batch`.

use std::fmt;

use contracts::{fields, RawFeedback};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde_json::Value;

use crate::BatchError;

/// Batch payload encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchFormat {
    Json,
    Xml,
}

impl fmt::Display for BatchFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json => f.write_str("JSON"),
            Self::Xml => f.write_str("XML"),
        }
    }
}

impl BatchFormat {
    /// Request field carrying a batch of this format
    pub fn field(self) -> &'static str {
        match self {
            Self::Json => fields::JSON_BATCH,
            Self::Xml => fields::XML_BATCH,
        }
    }

    /// Infer format from a file extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "json" => Some(Self::Json),
            "xml" => Some(Self::Xml),
            _ => None,
        }
    }
}

/// Decode a batch payload into raw submissions
///
/// Any undecodable item fails the whole payload. An embedded `key` field is
/// dropped; authentication happens once per request.
pub fn parse_batch(payload: &str, format: BatchFormat) -> Result<Vec<RawFeedback>, BatchError> {
    let mut items = match format {
        BatchFormat::Json => parse_json(payload)?,
        BatchFormat::Xml => parse_xml(payload)?,
    };
    if items.is_empty() {
        return Err(BatchError::Empty);
    }
    for item in &mut items {
        item.remove(fields::KEY);
    }
    Ok(items)
}

/// Top-level array, or an object with a `feedback` array
fn parse_json(payload: &str) -> Result<Vec<RawFeedback>, BatchError> {
    let value: Value = serde_json::from_str(payload).map_err(|e| BatchError::json(e.to_string()))?;

    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut obj) => match obj.remove("feedback") {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(BatchError::json(
                    "expected an array or an object with a 'feedback' array",
                ))
            }
        },
        _ => {
            return Err(BatchError::json(
                "expected an array or an object with a 'feedback' array",
            ))
        }
    };

    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| json_item(index, item))
        .collect()
}

fn json_item(index: usize, item: Value) -> Result<RawFeedback, BatchError> {
    let Value::Object(obj) = item else {
        return Err(BatchError::json(format!("item {} is not an object", index)));
    };

    let mut raw = RawFeedback::new();
    for (name, value) in obj {
        match value {
            Value::Null => {}
            Value::Array(values) => {
                let parts = values
                    .into_iter()
                    .map(|v| {
                        json_scalar(v).ok_or_else(|| {
                            BatchError::json(format!(
                                "item {} field '{}' must contain scalar values",
                                index, name
                            ))
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                raw.insert(&name, parts.join(" "));
            }
            other => {
                let scalar = json_scalar(other).ok_or_else(|| {
                    BatchError::json(format!("item {} field '{}' is a nested object", index, name))
                })?;
                raw.insert(&name, scalar);
            }
        }
    }
    Ok(raw)
}

fn json_scalar(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// `<root><feedback attr=".."><field>value</field>...</feedback>...</root>`
///
/// Every child of the root element is one item; its attributes and child
/// elements are the fields.
fn parse_xml(payload: &str) -> Result<Vec<RawFeedback>, BatchError> {
    // Text outside a field element is skipped, so values keep their whitespace
    let mut reader = Reader::from_str(payload);
    reader.config_mut().trim_text(false);

    let mut items = Vec::new();
    let mut depth = 0usize;
    let mut saw_root = false;
    let mut current: Option<RawFeedback> = None;
    let mut field: Option<(String, String)> = None;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| BatchError::xml(e.to_string()))?;

        match event {
            Event::Start(e) => {
                depth += 1;
                match depth {
                    1 => saw_root = true,
                    2 => current = Some(item_from_attributes(&e)?),
                    3 => field = Some((element_name(&e), String::new())),
                    _ => return Err(BatchError::xml("feedback fields cannot contain elements")),
                }
            }
            Event::Empty(e) => match depth {
                0 => saw_root = true,
                1 => items.push(item_from_attributes(&e)?),
                2 => {
                    if let Some(item) = current.as_mut() {
                        item.insert(&element_name(&e), "");
                    }
                }
                _ => return Err(BatchError::xml("feedback fields cannot contain elements")),
            },
            Event::Text(t) => {
                if let Some((_, value)) = field.as_mut() {
                    let text = t.unescape().map_err(|e| BatchError::xml(e.to_string()))?;
                    value.push_str(&text);
                }
            }
            Event::CData(c) => {
                if let Some((_, value)) = field.as_mut() {
                    value.push_str(&String::from_utf8_lossy(&c.into_inner()));
                }
            }
            Event::End(_) => {
                match depth {
                    3 => {
                        if let (Some(item), Some((name, value))) = (current.as_mut(), field.take())
                        {
                            item.insert(&name, value);
                        }
                    }
                    2 => {
                        if let Some(item) = current.take() {
                            items.push(item);
                        }
                    }
                    _ => {}
                }
                depth = depth.saturating_sub(1);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !saw_root {
        return Err(BatchError::xml("document has no root element"));
    }
    if depth != 0 {
        return Err(BatchError::xml("unexpected end of document"));
    }
    Ok(items)
}

fn element_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

fn item_from_attributes(e: &BytesStart<'_>) -> Result<RawFeedback, BatchError> {
    let mut raw = RawFeedback::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|e| BatchError::xml(e.to_string()))?;
        let name = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| BatchError::xml(e.to_string()))?;
        raw.insert(&name, value.into_owned());
    }
    Ok(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_array_of_objects() {
        let payload = r#"[
            {"text": "Berlin is big", "feedback": "correct", "offset": 0,
             "systems": ["spotlight", "tagme"], "manual": true, "url": null},
            {"text": "Paris", "feedback": "incorrect", "key": "leaked"}
        ]"#;
        let items = parse_batch(payload, BatchFormat::Json).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].get(fields::OFFSET), Some("0"));
        assert_eq!(items[0].get(fields::SYSTEMS), Some("spotlight tagme"));
        assert_eq!(items[0].get(fields::IS_MANUAL), Some("true"));
        assert!(!items[0].contains(fields::URL));
        assert!(!items[1].contains(fields::KEY));
    }

    #[test]
    fn json_wrapped_object() {
        let payload = r#"{"feedback": [{"text": "a", "feedback": "correct"}]}"#;
        assert_eq!(parse_batch(payload, BatchFormat::Json).unwrap().len(), 1);
    }

    #[test]
    fn json_bad_shapes_are_parse_errors() {
        for payload in [
            "{not json",
            r#"{"items": []}"#,
            r#""text""#,
            r#"[{"text": {"nested": 1}}]"#,
            r#"[1, 2]"#,
        ] {
            let err = parse_batch(payload, BatchFormat::Json).unwrap_err();
            assert!(
                matches!(err, BatchError::Parse { format: BatchFormat::Json, .. }),
                "{payload}: {err:?}"
            );
        }
        assert_eq!(
            parse_batch("[]", BatchFormat::Json).unwrap_err(),
            BatchError::Empty
        );
    }

    #[test]
    fn xml_children_and_attributes() {
        let payload = r#"<?xml version="1.0"?>
<feedbacks>
  <feedback manual="true">
    <text>Tom &amp; Jerry</text>
    <surface_form><![CDATA[Tom]]></surface_form>
    <feedback>incorrect</feedback>
    <url/>
  </feedback>
  <feedback text="short" feedback="correct"/>
</feedbacks>"#;
        let items = parse_batch(payload, BatchFormat::Xml).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].get(fields::TEXT), Some("Tom & Jerry"));
        assert_eq!(items[0].get(fields::SURFACE_FORM), Some("Tom"));
        assert_eq!(items[0].get(fields::FEEDBACK), Some("incorrect"));
        assert_eq!(items[0].get(fields::IS_MANUAL), Some("true"));
        assert!(!items[0].contains(fields::URL));
        assert_eq!(items[1].get(fields::TEXT), Some("short"));
    }

    #[test]
    fn xml_values_keep_whitespace() {
        let payload = "<feedbacks>\n  <feedback>\n    <text> Paris in spring \n</text>\n    \
                       <surface_form> Paris</surface_form>\n  </feedback>\n</feedbacks>";
        let items = parse_batch(payload, BatchFormat::Xml).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].get(fields::TEXT), Some(" Paris in spring \n"));
        assert_eq!(items[0].get(fields::SURFACE_FORM), Some(" Paris"));

        let json = parse_batch(r#"[{"text": " Paris in spring \n"}]"#, BatchFormat::Json).unwrap();
        assert_eq!(json[0].get(fields::TEXT), items[0].get(fields::TEXT));
    }

    #[test]
    fn xml_malformed_documents() {
        for payload in [
            "<feedbacks><feedback><text>x</feedback></feedbacks>",
            "<feedbacks><feedback><text><b>x</b></text></feedback></feedbacks>",
            "<feedbacks><feedback><text>x</text></feedback>",
            "just text",
        ] {
            assert!(
                matches!(
                    parse_batch(payload, BatchFormat::Xml).unwrap_err(),
                    BatchError::Parse { format: BatchFormat::Xml, .. }
                ),
                "{payload}"
            );
        }
        assert_eq!(
            parse_batch("<feedbacks/>", BatchFormat::Xml).unwrap_err(),
            BatchError::Empty
        );
    }
}
