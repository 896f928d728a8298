//! Group Manager: membership-file bootstrap and `group://` address
//! resolution (spec §4.5, supplemented per SPEC_FULL.md §F.3/§F.4).
//!
//! Grounded on `original_source/src/group.c`'s handling of the bootstrap
//! methods and of the `a|b` fallback syntax: the member with a lower rank
//! writes the group file, higher ranks wait for it to appear. Since this
//! crate has no real MPI/PMIx substrate to delegate to, `mpi`/`pmix` are
//! accepted as declared methods but behave exactly like `init` (rank 0
//! writes, no external membership service consulted) — the distinction
//! matters to the original's static linkage, not to this composition
//! engine's logic.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::{BedrockError, BedrockResult};

/// A single member of a group, as persisted to the group file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMember {
    pub rank: u32,
    pub address: String,
}

/// The bootstrap method named in a group's configuration (spec §4.5).
/// `a|b` pairs fall back to `b` when `a`'s precondition (an existing group
/// file) does not hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapMethod {
    Init,
    Join,
    Mpi,
    Pmix,
}

impl BootstrapMethod {
    /// Parse a bootstrap method string, resolving `a|b` fallback chains by
    /// file-existence: `join` falls back to `init` when `group_file` does
    /// not exist yet (SPEC_FULL.md §F.3).
    ///
    /// # Errors
    /// Returns `ConfigInvalid` for an unrecognized method name.
    pub fn resolve(raw: &str, group_file: &Path) -> BedrockResult<Self> {
        let mut parts = raw.split('|');
        let primary = parts
            .next()
            .ok_or_else(|| BedrockError::config_invalid("empty bootstrap method"))?;
        let fallback = parts.next();
        if parts.next().is_some() {
            return Err(BedrockError::config_invalid(format!(
                "bootstrap method '{raw}' has more than one fallback"
            )));
        }

        let exists = group_file.exists();
        let chosen = if exists { primary } else { fallback.unwrap_or(primary) };

        match chosen {
            "init" => Ok(Self::Init),
            "join" => Ok(Self::Join),
            "mpi" => Ok(Self::Mpi),
            "pmix" => Ok(Self::Pmix),
            other => Err(BedrockError::config_invalid(format!(
                "unrecognized bootstrap method '{other}' in '{raw}'"
            ))),
        }
    }

    #[must_use]
    pub fn writes_group_file(self) -> bool {
        matches!(self, Self::Init | Self::Mpi)
    }
}

/// A bootstrapped group: the local rank's view of the membership table
/// (spec §4.5).
pub struct Group {
    name: String,
    file: PathBuf,
    rank: u32,
    members: Vec<GroupMember>,
}

impl Group {
    /// Bootstrap a group named `name`, backed by `group_file`, for the
    /// local member reachable at `self_address`. `method` follows spec
    /// §4.5's grammar (`init`, `join`, `mpi`, `pmix`, or an `a|b` pair).
    ///
    /// For `init`/`mpi`, `rank` is assigned by the caller (typically 0 for
    /// the first process to bootstrap); for `join`/`pmix`, the group file
    /// is read and the local member is appended with the next unused rank.
    ///
    /// The file-existence check driving `a|b` fallback resolution happens
    /// once, at this call, not by polling (SPEC_FULL.md §F.4) — a `join`
    /// against a group file that vanishes between the check and the read
    /// is a configuration error, not a condition to wait out.
    ///
    /// # Errors
    /// Returns `ConfigInvalid` for a malformed method or membership file,
    /// and `EngineError` if the group file cannot be read or written.
    pub fn bootstrap(
        name: &str,
        group_file: &Path,
        self_address: &str,
        method: &str,
        rank_hint: u32,
    ) -> BedrockResult<Self> {
        let resolved = BootstrapMethod::resolve(method, group_file)?;

        if resolved.writes_group_file() {
            let member = GroupMember {
                rank: rank_hint,
                address: self_address.to_owned(),
            };
            write_group_file(group_file, &[member.clone()])?;
            return Ok(Self {
                name: name.to_owned(),
                file: group_file.to_owned(),
                rank: member.rank,
                members: vec![member],
            });
        }

        let members = read_group_file(group_file)?;
        let rank = members.iter().map(|m| m.rank).max().map_or(0, |r| r + 1);
        let mut members = members;
        members.push(GroupMember {
            rank,
            address: self_address.to_owned(),
        });
        write_group_file(group_file, &members)?;
        Ok(Self {
            name: name.to_owned(),
            file: group_file.to_owned(),
            rank,
            members,
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn rank(&self) -> u32 {
        self.rank
    }

    #[must_use]
    pub fn members(&self) -> &[GroupMember] {
        &self.members
    }

    /// Reload the group file from disk, picking up members that joined
    /// after this process bootstrapped.
    ///
    /// # Errors
    /// Returns `EngineError` if the file cannot be read or parsed.
    pub fn refresh(&mut self) -> BedrockResult<()> {
        self.members = read_group_file(&self.file)?;
        Ok(())
    }

    /// Resolve a `group://<name>/[#]<id>` locator against this group's
    /// membership, by rank (bare digits) or by member id (`#`-prefixed,
    /// currently equivalent to rank — this engine has no separate member-id
    /// space from rank).
    ///
    /// # Errors
    /// Returns `DependencyUnresolved` if no member matches `id`.
    #[must_use]
    pub fn resolve_member(&self, id: u64) -> Option<&str> {
        self.members
            .iter()
            .find(|m| u64::from(m.rank) == id)
            .map(|m| m.address.as_str())
    }
}

fn write_group_file(path: &Path, members: &[GroupMember]) -> BedrockResult<()> {
    let json = serde_json::to_string_pretty(members)
        .map_err(|e| BedrockError::engine_error(format!("serializing group file failed: {e}")))?;
    fs::write(path, json)
        .map_err(|e| BedrockError::engine_error(format!("writing group file '{}' failed: {e}", path.display())))
}

/// Read a group membership file written by [`Group::bootstrap`]. Exposed so
/// the `bedrock-query`/`bedrock-shutdown` CLIs can resolve `--ssg-file` into
/// a list of addresses without going through a live [`Group`].
///
/// # Errors
/// `EngineError` if the file cannot be read, `ConfigInvalid` if its content
/// is not a valid member list.
pub fn read_group_file(path: &Path) -> BedrockResult<Vec<GroupMember>> {
    let contents = fs::read_to_string(path)
        .map_err(|e| BedrockError::engine_error(format!("reading group file '{}' failed: {e}", path.display())))?;
    serde_json::from_str(&contents)
        .map_err(|e| BedrockError::config_invalid(format!("malformed group file '{}': {e}", path.display())))
}

/// Holds every group bootstrapped from the aggregate configuration's `ssg`
/// list (spec §3, §4.5). There is no remove-group RPC in spec §6, so groups
/// live for the daemon's lifetime once joined.
#[derive(Default)]
pub struct GroupManager {
    groups: Mutex<Vec<(String, Arc<Group>)>>,
}

impl GroupManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// # Errors
    /// Returns `NameCollision` if a group with this name is already present.
    pub fn add(&self, group: Group) -> BedrockResult<Arc<Group>> {
        let mut groups = self.groups.lock();
        if groups.iter().any(|(name, _)| name == group.name()) {
            return Err(BedrockError::name_collision(format!(
                "group '{}' already exists",
                group.name()
            )));
        }
        let group = Arc::new(group);
        groups.push((group.name().to_owned(), group.clone()));
        Ok(group)
    }

    #[must_use]
    pub fn get_by_name(&self, name: &str) -> Option<Arc<Group>> {
        self.groups
            .lock()
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, g)| g.clone())
    }

    /// The first group declared in the aggregate configuration's `ssg` list
    /// (SPEC_FULL.md open-question resolution: a bare numeric-rank locator
    /// with no group name addresses this group, per `DESIGN.md`).
    #[must_use]
    pub fn primary(&self) -> Option<Arc<Group>> {
        self.groups.lock().first().map(|(_, g)| g.clone())
    }

    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.groups.lock().iter().map(|(n, _)| n.clone()).collect()
    }

    #[must_use]
    pub fn current_config(&self) -> HashMap<String, Vec<GroupMember>> {
        self.groups
            .lock()
            .iter()
            .map(|(name, g)| (name.clone(), g.members().to_vec()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn resolve_uses_primary_when_file_missing_and_no_fallback() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("group.json");
        assert_eq!(
            BootstrapMethod::resolve("init", &file).unwrap() as u8,
            BootstrapMethod::Init as u8
        );
    }

    #[test]
    fn resolve_falls_back_when_primary_precondition_unmet() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("group.json");
        // join|init: no group file yet, so falls back to init.
        matches!(
            BootstrapMethod::resolve("join|init", &file).unwrap(),
            BootstrapMethod::Init
        );
    }

    #[test]
    fn resolve_rejects_unknown_method() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("group.json");
        assert!(BootstrapMethod::resolve("bogus", &file).is_err());
    }

    #[test]
    fn bootstrap_init_writes_file_with_rank_zero() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("group.json");
        let group = Group::bootstrap("g1", &file, "addr-0", "init", 0).unwrap();
        assert_eq!(group.rank(), 0);
        assert_eq!(group.members().len(), 1);
        assert!(file.exists());
    }

    #[test]
    fn bootstrap_join_appends_next_rank() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("group.json");
        Group::bootstrap("g1", &file, "addr-0", "init", 0).unwrap();
        let group2 = Group::bootstrap("g1", &file, "addr-1", "join", 0).unwrap();
        assert_eq!(group2.rank(), 1);
        assert_eq!(group2.members().len(), 2);
    }

    #[test]
    fn resolve_member_by_rank() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("group.json");
        Group::bootstrap("g1", &file, "addr-0", "init", 0).unwrap();
        let group = Group::bootstrap("g1", &file, "addr-1", "join", 0).unwrap();
        assert_eq!(group.resolve_member(0), Some("addr-0"));
        assert_eq!(group.resolve_member(1), Some("addr-1"));
        assert_eq!(group.resolve_member(9), None);
    }

    #[test]
    fn bootstrap_join_without_fallback_fails_if_file_never_appeared() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("never.json");
        let err = Group::bootstrap("g1", &file, "addr-1", "join", 0).unwrap_err();
        assert_eq!(err.kind(), "EngineError");
    }

    #[test]
    fn group_manager_rejects_duplicate_names() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("group.json");
        let manager = GroupManager::new();
        manager
            .add(Group::bootstrap("g1", &file, "addr-0", "init", 0).unwrap())
            .unwrap();
        let file2 = dir.path().join("group2.json");
        let err = manager
            .add(Group::bootstrap("g1", &file2, "addr-1", "init", 0).unwrap())
            .unwrap_err();
        assert_eq!(err.kind(), "NameCollision");
    }

    #[test]
    fn group_manager_primary_is_first_added() {
        let dir = tempdir().unwrap();
        let manager = GroupManager::new();
        manager
            .add(Group::bootstrap("g1", &dir.path().join("g1.json"), "addr-0", "init", 0).unwrap())
            .unwrap();
        manager
            .add(Group::bootstrap("g2", &dir.path().join("g2.json"), "addr-0", "init", 0).unwrap())
            .unwrap();
        assert_eq!(manager.primary().unwrap().name(), "g1");
        assert_eq!(manager.names(), vec!["g1".to_owned(), "g2".to_owned()]);
    }
}
