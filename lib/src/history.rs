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

//! History & Merge: parent-DAG traversal, lowest common ancestor, and
//! fast-forward / already-merged / three-way merge selection.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::collections::VecDeque;

use crate::branch::Branches;
use crate::codec;
use crate::codec::CommitParents;
use crate::codec::CommitSpec;
use crate::codec::RecordKv;
use crate::commit::CommitEngine;
use crate::digest::CommitDigest;
use crate::environments::Environments;
use crate::error::HangarError;
use crate::error::Result;

fn parent_list(parents: &CommitParents) -> Vec<CommitDigest> {
    match parents {
        CommitParents::Root => Vec::new(),
        CommitParents::Single(p) => vec![*p],
        CommitParents::Merge(a, b) => vec![*a, *b],
    }
}

/// Result of [`History::list_history`]: everything reachable from one
/// commit, newest first.
#[derive(Debug, Clone)]
pub struct HistoryView {
    pub head: CommitDigest,
    pub order: Vec<CommitDigest>,
    pub ancestors: BTreeMap<CommitDigest, Vec<CommitDigest>>,
    pub specs: BTreeMap<CommitDigest, CommitSpec>,
}

/// Operates over one [`Environments`]' ref/branch stores.
pub struct History<'e> {
    env: &'e Environments,
}

impl<'e> History<'e> {
    pub fn new(env: &'e Environments) -> Self {
        Self { env }
    }

    fn engine(&self) -> CommitEngine<'e> {
        CommitEngine::new(self.env)
    }

    fn branches(&self) -> Branches<'e> {
        Branches::new(self.env)
    }

    /// Resolves `branch_name` to its current head, then delegates to
    /// [`Self::list_history`].
    pub fn list_history_for_branch(&self, branch_name: &str) -> Result<HistoryView> {
        let head = self.branches().get_branch_head(branch_name)?;
        self.list_history(head)
    }

    /// BFS over the parent DAG starting at `start`, yielding the full
    /// ancestor adjacency map and a reverse-topological order (newest
    /// first), via Kahn's algorithm over the reversed child-count graph.
    pub fn list_history(&self, start: CommitDigest) -> Result<HistoryView> {
        let engine = self.engine();
        let mut ancestors: BTreeMap<CommitDigest, Vec<CommitDigest>> = BTreeMap::new();
        let mut queue = VecDeque::new();
        queue.push_back(start);
        let mut seen = BTreeSet::new();
        seen.insert(start);

        while let Some(commit) = queue.pop_front() {
            let parents = parent_list(&engine.get_parents(&commit)?);
            for parent in &parents {
                if seen.insert(*parent) {
                    queue.push_back(*parent);
                }
            }
            ancestors.insert(commit, parents);
        }

        let mut remaining_children: BTreeMap<CommitDigest, usize> = ancestors.keys().map(|c| (*c, 0)).collect();
        for parents in ancestors.values() {
            for parent in parents {
                *remaining_children.get_mut(parent).expect("every parent was discovered") += 1;
            }
        }

        // Deterministic tie-break: among commits whose children have all
        // been emitted, prefer the smallest digest string.
        let mut ready: BTreeSet<String> = remaining_children
            .iter()
            .filter(|(_, &count)| count == 0)
            .map(|(c, _)| c.hex())
            .collect();
        let by_hex: BTreeMap<String, CommitDigest> = ancestors.keys().map(|c| (c.hex(), *c)).collect();

        let mut order = Vec::with_capacity(ancestors.len());
        while let Some(next_hex) = ready.iter().next().cloned() {
            ready.remove(&next_hex);
            let next = by_hex[&next_hex];
            order.push(next);
            for parent in &ancestors[&next] {
                let count = remaining_children.get_mut(parent).expect("parent is tracked");
                *count -= 1;
                if *count == 0 {
                    ready.insert(parent.hex());
                }
            }
        }

        let mut specs = BTreeMap::new();
        for commit in ancestors.keys() {
            specs.insert(*commit, engine.get_spec(commit)?);
        }

        Ok(HistoryView { head: start, order, ancestors, specs })
    }

    /// Depth (in parent-hops) from `start` to every commit it can reach.
    fn ancestor_depths(&self, start: CommitDigest) -> Result<BTreeMap<CommitDigest, u64>> {
        let engine = self.engine();
        let mut depth = BTreeMap::new();
        depth.insert(start, 0u64);
        let mut queue = VecDeque::new();
        queue.push_back(start);
        while let Some(commit) = queue.pop_front() {
            let d = depth[&commit];
            for parent in parent_list(&engine.get_parents(&commit)?) {
                if !depth.contains_key(&parent) {
                    depth.insert(parent, d + 1);
                    queue.push_back(parent);
                }
            }
        }
        Ok(depth)
    }

    /// Classic dual-BFS ancestor-set intersection: the common ancestor with
    /// the smallest combined distance to `a` and `b`, breaking ties by
    /// smallest digest string.
    pub fn lowest_common_ancestor(&self, a: CommitDigest, b: CommitDigest) -> Result<Option<CommitDigest>> {
        let depth_a = self.ancestor_depths(a)?;
        let depth_b = self.ancestor_depths(b)?;

        let mut best: Option<(u64, CommitDigest)> = None;
        for (commit, da) in &depth_a {
            let Some(db) = depth_b.get(commit) else { continue };
            let total = da + db;
            best = Some(match best {
                    None => (total, *commit),
                    Some((best_total, best_commit)) => {
                        if total < best_total || (total == best_total && commit.hex() < best_commit.hex()) {
                            (total, *commit)
                        } else {
                            (best_total, best_commit)
                        }
                    }
            });
        }
        Ok(best.map(|(_, c)| c))
    }

    fn ref_map(&self, commit: &CommitDigest) -> Result<BTreeMap<Vec<u8>, Vec<u8>>> {
        let engine = self.engine();
        let compressed = engine.compressed_ref_bytes(commit)?;
        let bytes = crate::compress::decompress_unknown_size(&compressed)?;
        let records: Vec<RecordKv> = codec::decode_ref_list(&bytes)?;
        Ok(records.into_iter().collect())
    }

    /// Selects and performs fast-forward, already-merged, or a three-way
    /// merge of `dev_branch` into `master_branch`, returning the
    /// resulting head commit. A fast-forward or already-merged outcome
    /// performs no new commit.
    pub fn select_merge_algorithm(
        &self,
        master_branch: &str,
        dev_branch: &str,
        message: &str,
        user: &str,
        email: &str,
        time: u64,
    ) -> Result<CommitDigest> {
        let branches = self.branches();
        let master_head = branches.get_branch_head(master_branch)?;
        let dev_head = branches.get_branch_head(dev_branch)?;

        if master_head == dev_head {
            return Ok(master_head);
        }

        let lca = self.lowest_common_ancestor(master_head, dev_head)?;

        if lca == Some(master_head) {
            branches.set_branch_head(master_branch, dev_head)?;
            return Ok(dev_head);
        }
        if lca == Some(dev_head) {
            return Ok(master_head);
        }

        let base_map = match lca {
            Some(lca) => self.ref_map(&lca)?,
            None => BTreeMap::new(),
        };
        let master_map = self.ref_map(&master_head)?;
        let dev_map = self.ref_map(&dev_head)?;

        let mut keys: BTreeSet<&[u8]> = BTreeSet::new();
        keys.extend(base_map.keys().map(Vec::as_slice));
        keys.extend(master_map.keys().map(Vec::as_slice));
        keys.extend(dev_map.keys().map(Vec::as_slice));

        let mut merged: Vec<RecordKv> = Vec::new();
        for key in keys {
            let base = base_map.get(key);
            let master = master_map.get(key);
            let dev = dev_map.get(key);

            let resolved = if master == dev {
                master
            } else if master == base {
                dev
            } else if dev == base {
                master
            } else {
                return Err(HangarError::MergeConflict { key: String::from_utf8_lossy(key).into_owned() });
            };

            if let Some(value) = resolved {
                merged.push((key.to_vec(), value.clone()));
            }
        }
        merged.sort_by(|a, b| a.0.cmp(&b.0));

        let engine = self.engine();
        let compressed_refs = crate::compress::compress(&codec::encode_ref_list(&merged)?)?;
        let spec = CommitSpec { time, message: message.to_string(), user: user.to_string(), email: email.to_string() };
        let compressed_spec = crate::compress::compress(&codec::encode_commit_spec(&spec)?)?;
        let parents = CommitParents::Merge(master_head, dev_head);
        let digest = CommitEngine::compute_digest(&parents, &compressed_refs, &compressed_spec);

        // Both branches share this repository's hash/label stores, so a
        // merge commit never introduces payloads absent from the permanent
        // store; unlike `CommitEngine::commit`, no migration step is needed
        // here.
        engine.store_commit_record(digest, &parents, &compressed_refs, &compressed_spec)?;
        branches.set_branch_head(master_branch, digest)?;
        Ok(digest)
    }
}
