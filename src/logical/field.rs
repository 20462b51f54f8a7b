use std::{collections::HashMap, time::Duration};

use humantime::parse_duration;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use strum::{Display, EnumString};

use crate::errors::RvError;

#[derive(Eq, PartialEq, Copy, Clone, Debug, EnumString, Display, Serialize, Deserialize)]
pub enum FieldType {
    #[strum(to_string = "string")]
    Str,
    #[strum(to_string = "int")]
    Int,
    #[strum(to_string = "bool")]
    Bool,
    #[strum(to_string = "map")]
    Map,
    #[strum(to_string = "array")]
    Array,
    #[strum(to_string = "duration_second")]
    DurationSecond,
}

#[derive(Clone)]
pub struct Field {
    pub required: bool,
    pub field_type: FieldType,
    pub default: Value,
    pub description: String,
}

impl std::fmt::Debug for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Field")
            .field("required", &self.required)
            .field("field_type", &self.field_type)
            .field("default", &self.default)
            .finish()
    }
}

pub trait FieldTrait {
    fn is_int(&self) -> bool;
    fn is_duration(&self) -> bool;
    fn as_int(&self) -> Option<i64>;
    fn as_duration(&self) -> Option<Duration>;
    fn as_str_map(&self) -> Option<HashMap<String, String>>;
}

impl FieldTrait for Value {
    fn is_int(&self) -> bool {
        if self.is_i64() {
            return true;
        }

        self.as_str().and_then(|s| s.parse::<i64>().ok()).is_some()
    }

    fn is_duration(&self) -> bool {
        self.as_duration().is_some()
    }

    fn as_int(&self) -> Option<i64> {
        if let Some(int) = self.as_i64() {
            return Some(int);
        }

        self.as_str().and_then(|s| s.parse::<i64>().ok())
    }

    fn as_duration(&self) -> Option<Duration> {
        if let Some(secs) = self.as_u64() {
            return Some(Duration::from_secs(secs));
        }

        if let Some(secs_str) = self.as_str() {
            if let Ok(secs_int) = secs_str.parse::<u64>() {
                return Some(Duration::from_secs(secs_int));
            } else if let Ok(ret) = parse_duration(secs_str) {
                return Some(ret);
            }
        }

        None
    }

    fn as_str_map(&self) -> Option<HashMap<String, String>> {
        let obj = self.as_object()?;

        let mut map = HashMap::with_capacity(obj.len());
        for (key, value) in obj.iter() {
            map.insert(key.clone(), value.as_str()?.to_string());
        }

        Some(map)
    }
}

impl Field {
    pub fn new() -> Self {
        Self { required: false, field_type: FieldType::Str, default: Value::Null, description: String::new() }
    }

    pub fn check_data_type(&self, data: &Value) -> bool {
        match self.field_type {
            FieldType::Str => data.is_string(),
            FieldType::Int => data.is_int(),
            FieldType::Bool => data.is_boolean(),
            FieldType::Map => data.is_object(),
            FieldType::Array => data.is_array(),
            FieldType::DurationSecond => data.is_duration(),
        }
    }

    pub fn get_default(&self) -> Result<Value, RvError> {
        if !self.default.is_null() {
            return Ok(self.default.clone());
        }

        let value = match self.field_type {
            FieldType::Str => json!(""),
            FieldType::Int => json!(0),
            FieldType::Bool => json!(false),
            FieldType::Map => json!({}),
            FieldType::Array => json!([]),
            FieldType::DurationSecond => json!(0),
        };

        Ok(value)
    }
}

impl Default for Field {
    fn default() -> Self {
        Self::new()
    }
}
