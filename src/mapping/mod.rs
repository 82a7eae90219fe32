// toolsync/src/mapping/mod.rs
//! Translates a tool record, as serialized by the host CAM library, into the
//! flat column layout of the remote table.
//!
//! Every column is looked up independently. A missing or malformed source key
//! only drops that column; the description is the one key a record cannot
//! live without.

mod expressions;

use rust_decimal::Decimal;
use serde_json::{Number, Value};
use std::collections::BTreeMap;

pub use expressions::{parse_expression_number, strip_quotes};

/// Flat column -> value map sent to the remote table.
pub type FieldMap = BTreeMap<String, Value>;

pub const DESCRIPTION_FIELD: &str = "Description (tool_description)";
pub const COMMENT_FIELD: &str = "Comment (tool_comment)";
pub const HOLDER_FIELD: &str = "Holder Description (holder_description)";

/// A geometry value copied into a column after rounding.
struct GeometryField {
    column: &'static str,
    key: &'static str,
    precision: u32,
}

const GEOMETRY_FIELDS: &[GeometryField] = &[
    GeometryField {
        column: "Gauge Length (tool_assemblyGaugeLength)",
        key: "assemblyGaugeLength",
        precision: 5,
    },
    GeometryField {
        column: "Flute Length (tool_fluteLength)",
        key: "LCF",
        precision: 6,
    },
    GeometryField {
        column: "Number of Flutes (tool_numberOfFlutes)",
        key: "NOF",
        precision: 6,
    },
    GeometryField {
        column: "Overall Length (tool_overallLength)",
        key: "OAL",
        precision: 6,
    },
    GeometryField {
        column: "Diameter (tool_diameter)",
        key: "SFDM",
        precision: 6,
    },
    GeometryField {
        column: "Corner Radius (tool_cornerRadius)",
        key: "RE",
        precision: 6,
    },
    GeometryField {
        column: "Body Length (tool_bodyLength)",
        key: "LB",
        precision: 6,
    },
];

/// Top-level record keys copied verbatim.
const TOP_LEVEL_FIELDS: &[(&str, &str)] = &[
    ("Unit (tool_unit)", "unit"),
    ("Type (tool_type)", "type"),
];

/// String expressions, quotes stripped. These win over the structured values.
const STRING_EXPRESSIONS: &[(&str, &str)] = &[
    ("tool_comment", COMMENT_FIELD),
    ("tool_productId", "Product ID (tool_productId)"),
    ("tool_vendor", "Vendor (tool_vendor)"),
    ("tool_productLink", "Product Link (tool_productLink)"),
    ("tool_unit", "Unit (tool_unit)"),
];

/// Numeric expressions. Only consulted with `MapOptions::expression_numbers`,
/// and only for columns the geometry block left empty.
const NUMBER_EXPRESSIONS: &[(&str, &str)] = &[
    ("tool_diameter", "Diameter (tool_diameter)"),
    ("tool_bodyLength", "Body Length (tool_bodyLength)"),
    ("tool_cornerRadius", "Corner Radius (tool_cornerRadius)"),
    ("tool_fluteLength", "Flute Length (tool_fluteLength)"),
    ("tool_numberOfFlutes", "Number of Flutes (tool_numberOfFlutes)"),
    ("tool_overallLength", "Overall Length (tool_overallLength)"),
];

const EXPRESSION_NUMBER_PRECISION: u32 = 6;

#[derive(Debug, Clone, Copy, Default)]
pub struct MapOptions {
    pub expression_numbers: bool,
}

/// Builds the remote entry for one tool. `None` when the record has no
/// string `description`.
pub fn generate_remote_entry(tool: &Value, options: MapOptions) -> Option<FieldMap> {
    let description = tool.get("description")?.as_str()?;

    let mut fields = FieldMap::new();
    fields.insert(DESCRIPTION_FIELD.to_string(), Value::from(description));

    if let Some(comment) = lookup(tool, &["post-process", "comment"]) {
        fields.insert(COMMENT_FIELD.to_string(), comment.clone());
    }
    if let Some(holder) = lookup(tool, &["holder", "description"]) {
        fields.insert(HOLDER_FIELD.to_string(), holder.clone());
    }

    for field in GEOMETRY_FIELDS {
        if let Some(value) =
            lookup(tool, &["geometry", field.key]).and_then(|v| round_number(v, field.precision))
        {
            fields.insert(field.column.to_string(), value);
        }
    }

    for (column, key) in TOP_LEVEL_FIELDS {
        if let Some(value) = tool.get(*key) {
            fields.insert(column.to_string(), value.clone());
        }
    }

    if let Some(exprs) = tool.get("expressions").and_then(Value::as_object) {
        for (key, column) in STRING_EXPRESSIONS {
            if let Some(text) = exprs.get(*key).and_then(Value::as_str) {
                fields.insert(column.to_string(), Value::from(strip_quotes(text)));
            }
        }

        if options.expression_numbers {
            for (key, column) in NUMBER_EXPRESSIONS {
                if fields.contains_key(*column) {
                    continue;
                }
                let parsed = exprs
                    .get(*key)
                    .and_then(Value::as_str)
                    .and_then(parse_expression_number)
                    .and_then(|n| round_f64(n, EXPRESSION_NUMBER_PRECISION));
                if let Some(value) = parsed {
                    fields.insert(column.to_string(), value);
                }
            }
        }
    }

    Some(fields)
}

/// Description key of a generated entry.
pub fn entry_description(fields: &FieldMap) -> Option<&str> {
    fields.get(DESCRIPTION_FIELD).and_then(Value::as_str)
}

fn lookup<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(value, |current, key| current.get(*key))
}

/// Integers pass through untouched; floats are rounded half-to-even.
fn round_number(value: &Value, precision: u32) -> Option<Value> {
    let number = value.as_number()?;
    if number.is_i64() || number.is_u64() {
        return Some(value.clone());
    }
    round_f64(number.as_f64()?, precision)
}

/// Values outside the `Decimal` range are kept unrounded.
fn round_f64(value: f64, precision: u32) -> Option<Value> {
    let rounded = match Decimal::from_f64_retain(value) {
        // parse the decimal text so the result is the nearest f64 to the rounded value
        Some(decimal) => decimal
            .round_dp(precision)
            .normalize()
            .to_string()
            .parse::<f64>()
            .ok()?,
        None => value,
    };
    Number::from_f64(rounded).map(Value::Number)
}
