//! # Domain Models
//!
//! The villa entity in its three shapes: loose form input (`VillaDraft`),
//! the validated editable field set (`VillaFields`), and the stored record
//! (`Villa`). All coercion happens in `VillaDraft::validate`.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::error::{AppError, Result};

pub const DEFAULT_ROOM_COUNT: u32 = 1;
pub const DEFAULT_CAPACITY: u32 = 2;

/// Booking state of a villa.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VillaStatus {
    #[default]
    Available,
    Booked,
    Maintenance,
}

impl VillaStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VillaStatus::Available => "available",
            VillaStatus::Booked => "booked",
            VillaStatus::Maintenance => "maintenance",
        }
    }
}

impl fmt::Display for VillaStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VillaStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "available" => Ok(VillaStatus::Available),
            "booked" => Ok(VillaStatus::Booked),
            "maintenance" => Ok(VillaStatus::Maintenance),
            other => Err(AppError::validation(format!(
                "status must be one of available, booked, maintenance (got '{other}')"
            ))),
        }
    }
}

/// A stored villa, as returned by the backend.
///
/// Price, fee and status are optional on read: rows may have been written by
/// other clients of the same backend. Writes always go through `VillaFields`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Villa {
    pub id: Uuid,
    /// Identity that created the record. Never changes.
    pub owner: Uuid,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub location: String,
    #[serde(default)]
    pub photo_url: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub monthly_price: Option<f64>,
    #[serde(default)]
    pub yearly_price: Option<f64>,
    #[serde(default)]
    pub agent_fee: Option<f64>,
    /// Status text outside the known values reads as `None`.
    #[serde(default, deserialize_with = "lenient_status")]
    pub status: Option<VillaStatus>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub amenities: BTreeSet<String>,
    #[serde(default = "default_room_count", deserialize_with = "room_count_or_default")]
    pub room_count: u32,
    #[serde(default = "default_capacity", deserialize_with = "capacity_or_default")]
    pub capacity: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Villa {
    /// Fee as a percentage of the monthly price (see [`agent_fee_percentage`]).
    pub fn fee_percentage(&self) -> f64 {
        agent_fee_percentage(self.monthly_price, self.agent_fee)
    }
}

/// The editable, validated field set. `owner`, `id` and timestamps are
/// deliberately absent so an update can never carry them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VillaFields {
    pub name: String,
    pub location: String,
    pub photo_url: Option<String>,
    pub description: Option<String>,
    pub monthly_price: f64,
    pub yearly_price: f64,
    pub agent_fee: f64,
    pub status: VillaStatus,
    pub amenities: BTreeSet<String>,
    pub room_count: u32,
    pub capacity: u32,
}

/// Insert payload: validated fields stamped with the creating identity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewVilla {
    pub owner: Uuid,
    #[serde(flatten)]
    pub fields: VillaFields,
}

/// A number as it arrives from a form: either already numeric or still text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NumericInput {
    Number(f64),
    Text(String),
}

impl From<f64> for NumericInput {
    fn from(value: f64) -> Self {
        NumericInput::Number(value)
    }
}

impl From<&str> for NumericInput {
    fn from(value: &str) -> Self {
        NumericInput::Text(value.to_string())
    }
}

impl NumericInput {
    fn to_number(&self, field: &str) -> Result<f64> {
        let value = match self {
            NumericInput::Number(n) => *n,
            NumericInput::Text(raw) => {
                let trimmed = raw.trim();
                if trimmed.is_empty() {
                    return Err(AppError::validation(format!("{field} is required")));
                }
                trimmed.parse::<f64>().map_err(|_| {
                    AppError::validation(format!("{field} must be a number (got '{trimmed}')"))
                })?
            }
        };
        if !value.is_finite() {
            return Err(AppError::validation(format!("{field} must be a finite number")));
        }
        Ok(value)
    }

    /// Coerces to a non-negative decimal.
    pub fn to_price(&self, field: &str) -> Result<f64> {
        let value = self.to_number(field)?;
        if value < 0.0 {
            return Err(AppError::validation(format!("{field} must not be negative")));
        }
        Ok(value)
    }

    /// Coerces to a whole number of at least 1.
    pub fn to_count(&self, field: &str) -> Result<u32> {
        let value = self.to_number(field)?;
        if value.fract() != 0.0 || value < 1.0 || value > f64::from(u32::MAX) {
            return Err(AppError::validation(format!(
                "{field} must be a whole number of at least 1"
            )));
        }
        Ok(value as u32)
    }
}

/// Loosely typed villa input, e.g. straight from a form post.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VillaDraft {
    pub name: String,
    pub location: String,
    pub photo_url: Option<String>,
    pub description: Option<String>,
    pub monthly_price: Option<NumericInput>,
    /// Derived from `monthly_price` when omitted or blank.
    pub yearly_price: Option<NumericInput>,
    pub agent_fee: Option<NumericInput>,
    pub status: Option<String>,
    /// Anything that is not a JSON array is treated as "no amenities".
    pub amenities: serde_json::Value,
    pub room_count: Option<NumericInput>,
    pub capacity: Option<NumericInput>,
}

impl VillaDraft {
    /// Coerces and validates every field, producing the typed field set.
    pub fn validate(self) -> Result<VillaFields> {
        let name = required_text("name", &self.name)?;
        let location = required_text("location", &self.location)?;

        let monthly_price = self
            .monthly_price
            .as_ref()
            .ok_or_else(|| AppError::validation("monthly_price is required"))?
            .to_price("monthly_price")?;
        let yearly_price = match &self.yearly_price {
            Some(NumericInput::Text(raw)) if raw.trim().is_empty() => yearly_price_for(monthly_price),
            Some(input) => input.to_price("yearly_price")?,
            None => yearly_price_for(monthly_price),
        };
        let agent_fee = self
            .agent_fee
            .as_ref()
            .ok_or_else(|| AppError::validation("agent_fee is required"))?
            .to_price("agent_fee")?;

        let status = match self.status.as_deref().map(str::trim) {
            None | Some("") => VillaStatus::default(),
            Some(raw) => raw.parse()?,
        };

        let room_count = match &self.room_count {
            Some(input) => input.to_count("room_count")?,
            None => DEFAULT_ROOM_COUNT,
        };
        let capacity = match &self.capacity {
            Some(input) => input.to_count("capacity")?,
            None => DEFAULT_CAPACITY,
        };

        Ok(VillaFields {
            name,
            location,
            photo_url: optional_text(self.photo_url),
            description: optional_text(self.description),
            monthly_price,
            yearly_price,
            agent_fee,
            status,
            amenities: normalize_amenities(&self.amenities),
            room_count,
            capacity,
        })
    }
}

impl From<&Villa> for VillaDraft {
    /// Pre-fills an edit form from a stored record.
    fn from(villa: &Villa) -> Self {
        VillaDraft {
            name: villa.name.clone(),
            location: villa.location.clone(),
            photo_url: villa.photo_url.clone(),
            description: villa.description.clone(),
            monthly_price: villa.monthly_price.map(NumericInput::Number),
            yearly_price: villa.yearly_price.map(NumericInput::Number),
            agent_fee: villa.agent_fee.map(NumericInput::Number),
            status: villa.status.map(|s| s.as_str().to_string()),
            amenities: serde_json::Value::Array(
                villa
                    .amenities
                    .iter()
                    .cloned()
                    .map(serde_json::Value::String)
                    .collect(),
            ),
            room_count: Some(NumericInput::Number(f64::from(villa.room_count))),
            capacity: Some(NumericInput::Number(f64::from(villa.capacity))),
        }
    }
}

/// Yearly price shown next to a monthly price.
pub fn yearly_price_for(monthly_price: f64) -> f64 {
    monthly_price * 12.0
}

/// Agent fee as a percentage of the monthly price. A missing or zero monthly
/// price divides by 1 instead.
pub fn agent_fee_percentage(monthly_price: Option<f64>, agent_fee: Option<f64>) -> f64 {
    let price = monthly_price.filter(|p| *p != 0.0).unwrap_or(1.0);
    agent_fee.unwrap_or(0.0) / price * 100.0
}

fn normalize_amenities(value: &serde_json::Value) -> BTreeSet<String> {
    match value {
        serde_json::Value::Array(items) => items
            .iter()
            .filter_map(serde_json::Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        _ => BTreeSet::new(),
    }
}

fn required_text(field: &str, value: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::validation(format!("{field} is required")));
    }
    Ok(trimmed.to_string())
}

fn optional_text(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn lenient_status<'de, D>(deserializer: D) -> std::result::Result<Option<VillaStatus>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.and_then(|s| s.parse().ok()))
}

fn room_count_or_default<'de, D>(deserializer: D) -> std::result::Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<u32>::deserialize(deserializer)?.unwrap_or(DEFAULT_ROOM_COUNT))
}

fn capacity_or_default<'de, D>(deserializer: D) -> std::result::Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<u32>::deserialize(deserializer)?.unwrap_or(DEFAULT_CAPACITY))
}

fn default_room_count() -> u32 {
    DEFAULT_ROOM_COUNT
}

fn default_capacity() -> u32 {
    DEFAULT_CAPACITY
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn draft() -> VillaDraft {
        VillaDraft {
            name: "Villa Kamboja".into(),
            location: "Ubud".into(),
            monthly_price: Some("1500".into()),
            agent_fee: Some(150.0.into()),
            ..Default::default()
        }
    }

    #[test]
    fn coerces_text_prices_and_derives_yearly() {
        let fields = draft().validate().unwrap();
        assert_eq!(fields.monthly_price, 1500.0);
        assert_eq!(fields.yearly_price, 18000.0);
        assert_eq!(fields.agent_fee, 150.0);
        assert_eq!(fields.status, VillaStatus::Available);
        assert_eq!(fields.room_count, DEFAULT_ROOM_COUNT);
        assert_eq!(fields.capacity, DEFAULT_CAPACITY);
    }

    #[test]
    fn rejects_non_numeric_price() {
        let mut d = draft();
        d.monthly_price = Some("abc".into());
        assert!(matches!(d.validate(), Err(AppError::ValidationError(_))));
    }

    #[test]
    fn rejects_negative_fee_and_missing_fields() {
        let mut d = draft();
        d.agent_fee = Some((-1.0).into());
        assert!(matches!(d.validate(), Err(AppError::ValidationError(_))));

        let mut d = draft();
        d.agent_fee = None;
        assert!(matches!(d.validate(), Err(AppError::ValidationError(_))));

        let mut d = draft();
        d.location = "   ".into();
        assert!(matches!(d.validate(), Err(AppError::ValidationError(_))));
    }

    #[test]
    fn explicit_yearly_price_is_kept_and_blank_is_derived() {
        let mut d = draft();
        d.yearly_price = Some("16000".into());
        assert_eq!(d.clone().validate().unwrap().yearly_price, 16000.0);

        d.yearly_price = Some("".into());
        assert_eq!(d.validate().unwrap().yearly_price, 18000.0);
    }

    #[test]
    fn amenities_become_a_set_and_non_arrays_are_empty() {
        let mut d = draft();
        d.amenities = json!(["WiFi", "Pool", "WiFi", 3, " "]);
        let fields = d.clone().validate().unwrap();
        assert_eq!(
            fields.amenities,
            BTreeSet::from(["Pool".to_string(), "WiFi".to_string()])
        );

        d.amenities = json!("WiFi");
        assert!(d.validate().unwrap().amenities.is_empty());
    }

    #[test]
    fn status_and_counts_are_checked() {
        let mut d = draft();
        d.status = Some("Booked".into());
        d.room_count = Some("3".into());
        let fields = d.clone().validate().unwrap();
        assert_eq!(fields.status, VillaStatus::Booked);
        assert_eq!(fields.room_count, 3);

        d.status = Some("sold".into());
        assert!(matches!(d.clone().validate(), Err(AppError::ValidationError(_))));

        d.status = None;
        d.capacity = Some(0.0.into());
        assert!(matches!(d.clone().validate(), Err(AppError::ValidationError(_))));

        d.capacity = Some(2.5.into());
        assert!(matches!(d.validate(), Err(AppError::ValidationError(_))));
    }

    #[test]
    fn draft_deserializes_from_mixed_json() {
        let d: VillaDraft = serde_json::from_value(json!({
            "name": "Villa Lumbung",
            "location": "Canggu",
            "monthly_price": "2000.5",
            "agent_fee": 200,
            "amenities": null,
            "capacity": "4"
        }))
        .unwrap();
        let fields = d.validate().unwrap();
        assert_eq!(fields.monthly_price, 2000.5);
        assert_eq!(fields.capacity, 4);
        assert!(fields.amenities.is_empty());
    }

    #[test]
    fn villa_reads_leniently() {
        let villa: Villa = serde_json::from_value(json!({
            "id": Uuid::now_v7(),
            "owner": Uuid::now_v7(),
            "name": "Villa Sawah",
            "location": null,
            "agent_fee": null,
            "status": "maintenance",
            "amenities": null,
            "created_at": "2024-05-01T10:00:00Z",
            "updated_at": "2024-05-01T10:00:00Z"
        }))
        .unwrap();
        assert_eq!(villa.location, "");
        assert_eq!(villa.agent_fee, None);
        assert_eq!(villa.status, Some(VillaStatus::Maintenance));
        assert_eq!(villa.room_count, DEFAULT_ROOM_COUNT);
        assert_eq!(villa.capacity, DEFAULT_CAPACITY);
    }

    #[test]
    fn villa_reads_null_counts_and_unknown_status() {
        let rows: Vec<Villa> = serde_json::from_value(json!([
            {
                "id": Uuid::now_v7(),
                "owner": Uuid::now_v7(),
                "name": "Villa Tegal",
                "location": "Sidemen",
                "status": "sold",
                "room_count": null,
                "capacity": null,
                "created_at": "2024-05-01T10:00:00Z",
                "updated_at": "2024-05-01T10:00:00Z"
            },
            {
                "id": Uuid::now_v7(),
                "owner": Uuid::now_v7(),
                "name": "Villa Sawah",
                "location": "Ubud",
                "status": "Booked",
                "room_count": 4,
                "capacity": 8,
                "created_at": "2024-05-01T10:00:00Z",
                "updated_at": "2024-05-01T10:00:00Z"
            }
        ]))
        .unwrap();
        assert_eq!(rows[0].status, None);
        assert_eq!(rows[0].room_count, DEFAULT_ROOM_COUNT);
        assert_eq!(rows[0].capacity, DEFAULT_CAPACITY);
        assert_eq!(rows[1].status, Some(VillaStatus::Booked));
        assert_eq!((rows[1].room_count, rows[1].capacity), (4, 8));
    }

    #[test]
    fn fee_percentage_guards_zero_price() {
        assert_eq!(agent_fee_percentage(Some(1000.0), Some(100.0)), 10.0);
        assert_eq!(agent_fee_percentage(Some(0.0), Some(5.0)), 500.0);
        assert_eq!(agent_fee_percentage(None, None), 0.0);
    }
}
