//! Turns form-shaped payloads into the shapes the typed resources expect.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde_json::{Map, Number, Value};

const RESERVATION_NUMERIC_FIELDS: &[&str] = &["total", "advance", "deposit", "amountPaid"];
const RESERVATION_DATE_FIELDS: &[&str] = &["eventDate", "pickupDate", "returnDate"];
const ITEM_REFERENCE_KEYS: &[&str] = &["productId", "itemId", "item", "product", "_id", "id"];

/// Numeric fields per resource kind that forms routinely send as strings.
pub fn money_fields(kind: crate::domain::resource::ResourceKind) -> &'static [&'static str] {
    use crate::domain::resource::ResourceKind::*;
    match kind {
        Customer => &[],
        Item => &["rentalPrice", "purchasePrice", "quantity"],
        Payment | Cost => &["amount"],
        Reservation => RESERVATION_NUMERIC_FIELDS,
    }
}

/// Normalizes a reservation payload in place: item references, numeric
/// strings and offset-less date-times.
pub fn reservation(patch: &mut Map<String, Value>) {
    if !patch.contains_key("customerId") {
        if let Some(customer) = patch.remove("customer") {
            if let Some(id) = reference_id(&customer) {
                patch.insert("customerId".to_string(), Value::String(id));
            }
        }
    }

    if let Some(Value::Array(items)) = patch.remove("items") {
        let items = items.into_iter().map(normalize_item).collect();
        patch.insert("items".to_string(), Value::Array(items));
    }

    coerce_numbers(patch, RESERVATION_NUMERIC_FIELDS);

    for field in RESERVATION_DATE_FIELDS {
        if let Some(Value::String(raw)) = patch.get(*field) {
            let normalized = normalize_datetime(raw);
            patch.insert(field.to_string(), normalized);
        }
    }
}

/// Replaces numeric strings under `fields` with JSON numbers. Blank strings
/// become null; anything unparseable is left for validation to reject.
pub fn coerce_numbers(patch: &mut Map<String, Value>, fields: &[&str]) {
    for field in fields {
        if let Some(Value::String(raw)) = patch.get(*field) {
            if let Some(number) = parse_number(raw) {
                patch.insert(field.to_string(), number);
            }
        }
    }
}

fn parse_number(raw: &str) -> Option<Value> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Some(Value::Null);
    }
    if let Ok(integer) = trimmed.parse::<i64>() {
        return Some(Value::from(integer));
    }
    trimmed.parse::<f64>().ok().and_then(Number::from_f64).map(Value::Number)
}

fn normalize_item(item: Value) -> Value {
    match item {
        Value::String(product_id) => {
            let mut normalized = Map::new();
            normalized.insert("productId".to_string(), Value::String(product_id));
            normalized.insert("quantity".to_string(), Value::from(1));
            Value::Object(normalized)
        }
        Value::Object(mut fields) => {
            let product_id = ITEM_REFERENCE_KEYS
                .iter()
                .find_map(|key| fields.get(*key).and_then(reference_id));

            let mut normalized = Map::new();
            match product_id {
                Some(id) => {
                    normalized.insert("productId".to_string(), Value::String(id));
                }
                None => return Value::Object(fields),
            }

            coerce_numbers(&mut fields, &["quantity", "price", "rentalPrice"]);
            let quantity = fields
                .get("quantity")
                .and_then(Value::as_f64)
                .filter(|quantity| *quantity >= 1.0)
                .map(|quantity| quantity.round() as u64)
                .unwrap_or(1);
            normalized.insert("quantity".to_string(), Value::from(quantity));

            let price = fields
                .remove("price")
                .filter(|price| price.is_number())
                .or_else(|| fields.remove("rentalPrice").filter(|price| price.is_number()));
            if let Some(price) = price {
                normalized.insert("price".to_string(), price);
            }
            Value::Object(normalized)
        }
        other => other,
    }
}

/// A reference is either the id itself or a populated object carrying it.
fn reference_id(value: &Value) -> Option<String> {
    match value {
        Value::String(id) if !id.trim().is_empty() => Some(id.trim().to_string()),
        Value::Object(object) => ["id", "_id"]
            .iter()
            .find_map(|key| object.get(*key).and_then(Value::as_str))
            .map(str::to_string),
        _ => None,
    }
}

/// Date-times without an offset are read as UTC; blank strings clear the
/// field.
pub fn normalize_datetime(raw: &str) -> Value {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Value::Null;
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Value::String(parsed.with_timezone(&Utc).to_rfc3339_opts(SecondsFormat::Secs, true));
    }

    let naive = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(trimmed, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        });

    match naive {
        Some(naive) => Value::String(
            Utc.from_utc_datetime(&naive).to_rfc3339_opts(SecondsFormat::Secs, true),
        ),
        None => Value::String(trimmed.to_string()),
    }
}
