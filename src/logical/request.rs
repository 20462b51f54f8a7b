use std::sync::Arc;

use better_default::Default;
use serde_json::{Map, Value};

use super::{Operation, Path};
use crate::{
    errors::RvError,
    logical::{auth::Auth, secret::SecretData},
    storage::{Storage, StorageEntry},
};

#[derive(Default, Clone)]
pub struct Request {
    #[default(Operation::Read)]
    pub operation: Operation,
    pub path: String,
    pub match_path: Option<Arc<Path>>,
    pub body: Option<Map<String, Value>>,
    pub data: Option<Map<String, Value>>,
    pub client_token: String,
    pub storage: Option<Arc<dyn Storage>>,
    pub secret: Option<SecretData>,
    pub auth: Option<Auth>,
}

impl Request {
    pub fn new<S: Into<String>>(path: S) -> Self {
        Self { path: path.into(), ..Default::default() }
    }

    pub fn new_read_request<S: Into<String>>(path: S) -> Self {
        Self { operation: Operation::Read, path: path.into(), ..Default::default() }
    }

    pub fn new_write_request<S: Into<String>>(path: S, body: Option<Map<String, Value>>) -> Self {
        Self { operation: Operation::Write, path: path.into(), body, ..Default::default() }
    }

    pub fn new_delete_request<S: Into<String>>(path: S, body: Option<Map<String, Value>>) -> Self {
        Self { operation: Operation::Delete, path: path.into(), body, ..Default::default() }
    }

    pub fn new_list_request<S: Into<String>>(path: S) -> Self {
        Self { operation: Operation::List, path: path.into(), ..Default::default() }
    }

    pub fn new_revoke_request<S: Into<String>>(
        path: S,
        secret: Option<SecretData>,
        data: Option<Map<String, Value>>,
    ) -> Self {
        Self { operation: Operation::Revoke, path: path.into(), secret, data, ..Default::default() }
    }

    pub fn new_renew_request<S: Into<String>>(
        path: S,
        secret: Option<SecretData>,
        data: Option<Map<String, Value>>,
    ) -> Self {
        Self { operation: Operation::Renew, path: path.into(), secret, data, ..Default::default() }
    }

    fn get_data_raw(&self, key: &str, default: bool) -> Result<Value, RvError> {
        let Some(match_path) = self.match_path.as_ref() else {
            return Err(RvError::ErrRequestNotReady);
        };
        let Some(field) = match_path.get_field(key) else {
            return Err(RvError::ErrRequestNoDataField);
        };

        if let Some(data) = self.data.as_ref() {
            if let Some(value) = data.get(key) {
                if !field.check_data_type(value) {
                    return Err(RvError::ErrRequestFieldInvalid);
                }
                return Ok(value.clone());
            }
        }

        if let Some(body) = self.body.as_ref() {
            if let Some(value) = body.get(key) {
                if !field.check_data_type(value) {
                    return Err(RvError::ErrRequestFieldInvalid);
                }
                return Ok(value.clone());
            }
        }

        if default {
            if field.required {
                return Err(RvError::ErrRequestFieldNotFound);
            }

            return field.get_default();
        }

        Err(RvError::ErrRequestFieldNotFound)
    }

    pub fn get_data(&self, key: &str) -> Result<Value, RvError> {
        if self.match_path.is_none() {
            return Err(RvError::ErrRequestNotReady);
        }

        if self.data.is_none() && self.body.is_none() {
            return Err(RvError::ErrRequestNoData);
        }

        self.get_data_raw(key, false)
    }

    pub fn get_data_or_default(&self, key: &str) -> Result<Value, RvError> {
        if self.match_path.is_none() {
            return Err(RvError::ErrRequestNotReady);
        }

        self.get_data_raw(key, true)
    }

    pub fn storage_list(&self, prefix: &str) -> Result<Vec<String>, RvError> {
        let Some(storage) = self.storage.as_ref() else {
            return Err(RvError::ErrRequestNotReady);
        };

        storage.list(prefix)
    }

    pub fn storage_get(&self, key: &str) -> Result<Option<StorageEntry>, RvError> {
        let Some(storage) = self.storage.as_ref() else {
            return Err(RvError::ErrRequestNotReady);
        };

        storage.get(key)
    }

    pub fn storage_put(&self, entry: &StorageEntry) -> Result<(), RvError> {
        let Some(storage) = self.storage.as_ref() else {
            return Err(RvError::ErrRequestNotReady);
        };

        storage.put(entry)
    }

    pub fn storage_delete(&self, key: &str) -> Result<(), RvError> {
        let Some(storage) = self.storage.as_ref() else {
            return Err(RvError::ErrRequestNotReady);
        };

        storage.delete(key)
    }
}

#[cfg(test)]
mod test {
    use std::collections::HashMap;

    use serde_json::json;

    use super::*;
    use crate::{
        logical::{Field, FieldType, PathOperation},
        new_fields, new_fields_internal, new_path, new_path_internal,
    };

    #[test]
    fn test_request_get_data() {
        let path: Path = new_path!({
            pattern: "lookup/(?P<token>.+)",
            fields: {
                "token": {
                    field_type: FieldType::Str,
                    description: "Token to lookup"
                },
                "increment": {
                    field_type: FieldType::Int,
                    default: 0,
                    description: "Renewal increment"
                }
            },
            operations: [
                {op: Operation::Read, raw_handler: |_backend, _req| Ok(None)}
            ]
        });

        let mut req = Request::new("lookup/foo");
        assert_eq!(req.get_data("token").unwrap_err(), RvError::ErrRequestNotReady);

        req.match_path = Some(Arc::new(path));
        assert_eq!(req.get_data("token").unwrap_err(), RvError::ErrRequestNoData);

        req.data = Some(json!({"token": "foo"}).as_object().unwrap().clone());
        assert_eq!(req.get_data("token").unwrap(), json!("foo"));
        assert_eq!(req.get_data("other").unwrap_err(), RvError::ErrRequestNoDataField);

        // absent field falls back to its default
        assert_eq!(req.get_data("increment").unwrap_err(), RvError::ErrRequestFieldNotFound);
        assert_eq!(req.get_data_or_default("increment").unwrap(), json!(0));

        // type mismatch is rejected
        req.data = Some(json!({"token": 42}).as_object().unwrap().clone());
        assert_eq!(req.get_data("token").unwrap_err(), RvError::ErrRequestFieldInvalid);
    }
}
