// Copyright 2024 The Hangar Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Remotes Registry: a named persistent mapping from remote label to
//! transport address, stored under the branch store's `"remote:"` prefix.

use std::collections::BTreeMap;

use crate::codec;
use crate::environments::Environments;
use crate::error::EntityKind;
use crate::error::HangarError;
use crate::error::Result;
use crate::staging::validate_name;

pub struct Remotes<'e> {
    env: &'e Environments,
}

impl<'e> Remotes<'e> {
    pub fn new(env: &'e Environments) -> Self {
        Self { env }
    }

    pub fn add(&self, name: &str, address: &str) -> Result<()> {
        validate_name(name)?;
        let key = codec::encode_remote_key(name);
        let mut txn = self.env.branch.begin_writer();
        if txn.get(&key)?.is_some() {
            return Err(HangarError::AlreadyExists { kind: EntityKind::Remote, id: name.to_string() });
        }
        txn.put(&key, address.as_bytes());
        txn.commit()
    }

    pub fn remove(&self, name: &str) -> Result<bool> {
        let key = codec::encode_remote_key(name);
        let mut txn = self.env.branch.begin_writer();
        if txn.get(&key)?.is_none() {
            return Ok(false);
        }
        txn.delete(&key);
        txn.commit()?;
        Ok(true)
    }

    pub fn get(&self, name: &str) -> Result<String> {
        let reader = self.env.branch.begin_reader();
        let value = reader.get(&codec::encode_remote_key(name))?.ok_or_else(|| HangarError::NotFound {
            kind: EntityKind::Remote,
            id: name.to_string(),
        })?;
        Ok(String::from_utf8_lossy(&value).into_owned())
    }

    pub fn list(&self) -> Result<BTreeMap<String, String>> {
        let reader = self.env.branch.begin_reader();
        let mut remotes = BTreeMap::new();
        for entry in reader.range(&codec::remote_prefix()) {
            let (key, value) = entry?;
            let name = codec::decode_remote_key(&key)?;
            remotes.insert(name, String::from_utf8_lossy(&value).into_owned());
        }
        Ok(remotes)
    }
}
