//! Wire types for the chain storage API.
//!
//! The API serves MongoDB documents as JSON. Depending on how it is configured
//! ids come back as plain strings or extended JSON (`{"$oid": ...}`) and dates
//! as RFC 3339 / RFC 2822 strings, epoch millis, or `{"$date": ...}`. All of
//! these are normalised here so the rest of the bot never sees them.

use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate};
use regex::Regex;
use serde::{Deserialize, Deserializer};

/// One row of `/cadenas/autor/{id}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChainSummary {
    #[serde(rename = "_id", deserialize_with = "object_id")]
    pub id: String,
    #[serde(default)]
    pub slug: String,
    #[serde(rename = "titulo", default)]
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Author {
    #[serde(rename = "nombre", default)]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChainParticipant {
    #[serde(rename = "nombre", deserialize_with = "scalar_string", default)]
    pub name: String,
    #[serde(rename = "puesto", deserialize_with = "scalar_string", default)]
    pub role: String,
    #[serde(rename = "numero", deserialize_with = "scalar_string", default)]
    pub number: String,
}

/// A full chain document from `/cadenas/{id_or_slug}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChainDetail {
    #[serde(rename = "_id", deserialize_with = "object_id")]
    pub id: String,
    #[serde(default)]
    pub slug: String,
    #[serde(rename = "titulo", default)]
    pub title: String,
    #[serde(rename = "autor")]
    pub author: Author,
    #[serde(rename = "fecha_inicio", deserialize_with = "api_date")]
    pub start_date: NaiveDate,
    #[serde(rename = "fecha_fin", deserialize_with = "api_date")]
    pub end_date: NaiveDate,
    #[serde(rename = "dia_aviso", deserialize_with = "scalar_string", default)]
    pub warning_days: String,
    #[serde(rename = "mensaje", default)]
    pub message: String,
    #[serde(rename = "participantes", default)]
    pub participants: Vec<ChainParticipant>,
}

/// Outcome of a lookup by id or slug.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainLookup {
    Found(Box<ChainDetail>),
    /// The API answered with `{"error": ...}`.
    Missing(String),
}

/// How `/ver_cadena` addresses a chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainKey {
    Id(String),
    Slug(String),
}

static CHAIN_KEY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(id|slug)=([A-Za-z0-9_\-]+)$").expect("static regex is valid")
});

impl ChainKey {
    /// Parse `id=...` or `slug=...`.
    pub fn parse(arg: &str) -> Option<Self> {
        let caps = CHAIN_KEY_RE.captures(arg.trim())?;
        let value = caps[2].to_string();
        match &caps[1] {
            "id" => Some(Self::Id(value)),
            _ => Some(Self::Slug(value)),
        }
    }

    /// Both ids and slugs are served from the same path.
    pub fn as_path_segment(&self) -> &str {
        match self {
            Self::Id(v) | Self::Slug(v) => v,
        }
    }
}

impl std::fmt::Display for ChainKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Id(v) => write!(f, "id={v}"),
            Self::Slug(v) => write!(f, "slug={v}"),
        }
    }
}

// ── Deserialization helpers ─────────────────────────────────────────

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Plain(String),
    Extended {
        #[serde(rename = "$oid")]
        oid: String,
    },
}

fn object_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match RawId::deserialize(deserializer)? {
        RawId::Plain(id) => id,
        RawId::Extended { oid } => oid,
    })
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawDateValue {
    Text(String),
    Millis(i64),
    Long {
        #[serde(rename = "$numberLong")]
        millis: String,
    },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawDate {
    Extended {
        #[serde(rename = "$date")]
        date: RawDateValue,
    },
    Bare(RawDateValue),
}

fn api_date<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDate, D::Error> {
    let value = match RawDate::deserialize(deserializer)? {
        RawDate::Extended { date } => date,
        RawDate::Bare(value) => value,
    };
    parse_date_value(value).map_err(serde::de::Error::custom)
}

fn parse_date_value(value: RawDateValue) -> Result<NaiveDate, String> {
    match value {
        RawDateValue::Text(text) => parse_date_text(&text),
        RawDateValue::Millis(millis) => date_from_millis(millis),
        RawDateValue::Long { millis } => {
            let millis: i64 = millis
                .parse()
                .map_err(|e| format!("invalid $numberLong {millis:?}: {e}"))?;
            date_from_millis(millis)
        }
    }
}

fn date_from_millis(millis: i64) -> Result<NaiveDate, String> {
    DateTime::from_timestamp_millis(millis)
        .map(|dt| dt.date_naive())
        .ok_or_else(|| format!("timestamp out of range: {millis}"))
}

fn parse_date_text(text: &str) -> Result<NaiveDate, String> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Ok(dt.date_naive());
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(text) {
        return Ok(dt.date_naive());
    }
    // "2024-01-31" or "2024-01-31T00:00:00" without an offset
    text.get(..10)
        .and_then(|prefix| NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok())
        .ok_or_else(|| format!("unrecognized date {text:?}"))
}

/// Accept strings, numbers and extended-JSON numbers as text.
fn scalar_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s,
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        serde_json::Value::Object(map) => map
            .get("$numberInt")
            .or_else(|| map.get("$numberLong"))
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| serde_json::Value::Object(map.clone()).to_string()),
        other => other.to_string(),
    })
}
