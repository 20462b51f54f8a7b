use std::{collections::HashMap, sync::Arc};

use regex::Regex;
use serde_json::{Map, Value};

use super::{path::Path, request::Request, response::Response, secret::Secret, Backend, Operation};
use crate::errors::RvError;

/// A backend assembled from a declarative path table. Incoming paths
/// are matched against the anchored patterns in order; named capture
/// groups land in the request data.
#[derive(Clone, Default)]
pub struct LogicalBackend {
    pub paths: Vec<Arc<Path>>,
    pub paths_re: Vec<Regex>,
    pub help: String,
    pub secrets: Vec<Arc<Secret>>,
}

impl Backend for LogicalBackend {
    fn init(&mut self) -> Result<(), RvError> {
        if self.paths.len() == self.paths_re.len() {
            return Ok(());
        }

        for path in &self.paths {
            let mut pattern = path.pattern.clone();
            if !path.pattern.starts_with('^') {
                pattern = format!("^{}", &pattern);
            }

            if !path.pattern.ends_with('$') {
                pattern = format!("{}$", &pattern);
            }

            let re = Regex::new(&pattern)?;
            self.paths_re.push(re);
        }

        Ok(())
    }

    fn handle_request(&self, req: &mut Request) -> Result<Option<Response>, RvError> {
        match req.operation {
            Operation::Renew | Operation::Revoke => {
                return self.handle_revoke_renew(req);
            }
            _ => {}
        }

        if let Some((path, captures)) = self.match_path(&req.path) {
            if !captures.is_empty() {
                let mut data = Map::new();
                captures.iter().for_each(|(key, value)| {
                    data.insert(key.to_string(), Value::String(value.to_string()));
                });
                req.data = Some(data);
            }

            req.match_path = Some(path.clone());
            for operation in &path.operations {
                if operation.op == req.operation {
                    return operation.handle_request(self, req);
                }
            }

            return Err(RvError::ErrLogicalOperationUnsupported);
        }

        Err(RvError::ErrLogicalPathUnsupported)
    }

    fn secret(&self, key: &str) -> Option<&Arc<Secret>> {
        self.secrets.iter().find(|s| s.secret_type == key)
    }
}

impl LogicalBackend {
    pub fn new() -> Self {
        Self { paths: Vec::new(), paths_re: Vec::new(), help: String::new(), secrets: Vec::new() }
    }

    pub fn handle_revoke_renew(&self, req: &mut Request) -> Result<Option<Response>, RvError> {
        if req.secret.is_none() {
            log::error!("request has no secret");
            return Ok(None);
        }

        if let Some(raw_secret_type) = req.secret.as_ref().unwrap().internal_data.get("secret_type") {
            if let Some(secret_type) = raw_secret_type.as_str() {
                if let Some(secret) = self.secret(secret_type) {
                    match req.operation {
                        Operation::Renew => {
                            return secret.renew(self, req);
                        }
                        Operation::Revoke => {
                            return secret.revoke(self, req);
                        }
                        _ => {
                            log::error!("invalid operation for revoke/renew: {}", req.operation);
                            return Ok(None);
                        }
                    }
                }
            }
        }

        log::error!("secret is unsupported by this backend");
        Ok(None)
    }

    pub fn match_path(&self, path: &str) -> Option<(Arc<Path>, HashMap<String, String>)> {
        for (i, re) in self.paths_re.iter().enumerate() {
            if let Some(matches) = re.captures(path) {
                let mut captures = HashMap::new();
                let path = self.paths[i].clone();
                for (i, name) in re.capture_names().enumerate() {
                    if let Some(name) = name {
                        captures.insert(name.to_string(), matches[i].to_string());
                    }
                }

                return Some((path, captures));
            }
        }

        None
    }
}

#[macro_export]
macro_rules! new_logical_backend {
    ($($tt:tt)*) => {
        new_logical_backend_internal!($($tt)*)
    };
}

#[macro_export]
#[doc(hidden)]
macro_rules! new_logical_backend_internal {
    (@object $object:ident () {}) => {
    };
    (@object $object:ident () {paths: [$($path:tt),*], $($rest:tt)*}) => {
        $(
            $object.paths.push(Arc::new(new_path!($path)));
        )*
        new_logical_backend_internal!(@object $object () {$($rest)*});
    };
    (@object $object:ident () {help: $help:expr, $($rest:tt)*}) => {
        $object.help = $help.to_string();
        new_logical_backend_internal!(@object $object () {$($rest)*});
    };
    (@object $object:ident () {help: $help:expr}) => {
        $object.help = $help.to_string();
    };
    (@object $object:ident () {secrets: [$($secrets:tt),* $(,)?], $($rest:tt)*}) => {
        $(
            $object.secrets.push(Arc::new(new_secret!($secrets)));
        )*
        new_logical_backend_internal!(@object $object () {$($rest)*});
    };
    ({ $($tt:tt)+ }) => {
        {
            let mut backend = LogicalBackend::new();
            new_logical_backend_internal!(@object backend () {$($tt)+});
            backend
        }
    };
}
