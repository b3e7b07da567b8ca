//! Loosely-typed visit input as submitted by forms and API clients.

use serde::{Deserialize, Deserializer, Serialize};

use super::VisitRecord;

/// Visit fields as received over the wire.
///
/// Accepts both the upload column names (`AADHAR_NO`, `DEPARTMENT_VISITED`, ...)
/// and the short form names (`aadhar`, `department`, ...). When both are sent
/// the column name wins unless it is blank. Numbers are accepted wherever a
/// string is expected, and `age` is coerced from a number or a numeric string.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(from = "WireVisitInput")]
pub struct VisitInput {
    pub identifier: Option<String>,
    pub name: Option<String>,
    pub age: Option<u32>,
    pub gender: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub department: Option<String>,
}

/// Every accepted spelling kept apart so no two keys collide.
#[derive(Deserialize)]
struct WireVisitInput {
    #[serde(default, rename = "AADHAR_NO", deserialize_with = "loose_string")]
    aadhar_no: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    aadhar: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    identifier: Option<String>,

    #[serde(default, rename = "NAME", deserialize_with = "loose_string")]
    name_column: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    name: Option<String>,

    #[serde(default, rename = "AGE", deserialize_with = "loose_age")]
    age_column: Option<u32>,
    #[serde(default, deserialize_with = "loose_age")]
    age: Option<u32>,

    #[serde(default, rename = "GENDER", deserialize_with = "loose_string")]
    gender_column: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    gender: Option<String>,

    #[serde(default, rename = "ADDRESS", deserialize_with = "loose_string")]
    address_column: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    address: Option<String>,

    #[serde(default, rename = "PHONE", deserialize_with = "loose_string")]
    phone_column: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    phone: Option<String>,

    #[serde(default, rename = "DEPARTMENT_VISITED", deserialize_with = "loose_string")]
    department_column: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    department: Option<String>,
    #[serde(default, rename = "departmentVisited", deserialize_with = "loose_string")]
    department_visited: Option<String>,
}

impl From<WireVisitInput> for VisitInput {
    fn from(wire: WireVisitInput) -> Self {
        Self {
            identifier: first_filled([wire.aadhar_no, wire.aadhar, wire.identifier]),
            name: first_filled([wire.name_column, wire.name]),
            age: wire.age_column.or(wire.age),
            gender: first_filled([wire.gender_column, wire.gender]),
            address: first_filled([wire.address_column, wire.address]),
            phone: first_filled([wire.phone_column, wire.phone]),
            department: first_filled([
                wire.department_column,
                wire.department,
                wire.department_visited,
            ]),
        }
    }
}

/// First non-blank value, else the first present one.
fn first_filled<const N: usize>(values: [Option<String>; N]) -> Option<String> {
    let mut fallback = None;
    for value in values.into_iter().flatten() {
        if !value.trim().is_empty() {
            return Some(value);
        }
        fallback.get_or_insert(value);
    }
    fallback
}

impl From<VisitInput> for VisitRecord {
    fn from(input: VisitInput) -> Self {
        VisitRecord {
            identifier: input.identifier.unwrap_or_default(),
            name: input.name.unwrap_or_default(),
            age: input.age,
            gender: input.gender,
            address: input.address,
            phone: input.phone,
            department: input.department.unwrap_or_default(),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LooseValue {
    Unsigned(u64),
    Signed(i64),
    Float(f64),
    Text(String),
}

fn loose_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<LooseValue> = Option::deserialize(deserializer)?;
    Ok(value.map(|v| match v {
        LooseValue::Unsigned(n) => n.to_string(),
        LooseValue::Signed(n) => n.to_string(),
        LooseValue::Float(f) => f.to_string(),
        LooseValue::Text(s) => s,
    }))
}

fn loose_age<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<LooseValue> = Option::deserialize(deserializer)?;
    Ok(value.and_then(|v| match v {
        LooseValue::Unsigned(n) => u32::try_from(n).ok(),
        LooseValue::Signed(n) => u32::try_from(n).ok(),
        LooseValue::Float(f) if f >= 0.0 && f.fract() == 0.0 && f <= u32::MAX as f64 => {
            Some(f as u32)
        }
        LooseValue::Float(_) => None,
        LooseValue::Text(s) => s.trim().parse().ok(),
    }))
}
