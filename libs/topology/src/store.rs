//! Plain-text topology persistence.
//!
//! The topology is kept as two human-inspectable tab-delimited tables in a
//! working directory: `cluster_nodes.tsv` (name, address, user, role) and
//! `security_groups.tsv` (name, scope). One cluster per working directory;
//! concurrent writers against the same directory are not supported and no
//! lock is taken.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::{ClusterTopology, GroupScope, NodeRecord, NodeRole, SecurityGroupRecord};

const NODES_FILE: &str = "cluster_nodes.tsv";
const GROUPS_FILE: &str = "security_groups.tsv";

const NODES_HEADER: &str = "name\taddress\tuser\trole";
const GROUPS_HEADER: &str = "name\tscope";

/// Errors from topology persistence.
#[derive(Debug, Error)]
pub enum TopologyError {
    #[error("topology table missing: {0}")]
    Missing(PathBuf),

    #[error("malformed topology table {path}: {reason}")]
    Malformed { path: PathBuf, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Durable record of the current cluster.
///
/// `save` followed by `load` must reproduce the identical record set,
/// field-for-field.
pub trait TopologyStore: Send + Sync {
    /// Atomically overwrite both tables with the given topology.
    fn save(&self, topology: &ClusterTopology) -> Result<(), TopologyError>;

    /// Load the persisted topology.
    ///
    /// Fails with [`TopologyError::Missing`] if either table is absent;
    /// callers needing "does this cluster exist" semantics catch that
    /// variant explicitly.
    fn load(&self) -> Result<ClusterTopology, TopologyError>;

    /// Delete both tables. A no-op if they are already absent.
    fn clear(&self) -> Result<(), TopologyError>;
}

/// File-backed store rooted at a working directory.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    fn nodes_path(&self) -> PathBuf {
        self.dir.join(NODES_FILE)
    }

    fn groups_path(&self) -> PathBuf {
        self.dir.join(GROUPS_FILE)
    }

    /// Write then rename so readers never observe a partial table.
    fn write_atomic(&self, path: &Path, contents: &str) -> Result<(), TopologyError> {
        let tmp = path.with_extension("tsv.tmp");
        fs::write(&tmp, contents)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

impl TopologyStore for FileStore {
    fn save(&self, topology: &ClusterTopology) -> Result<(), TopologyError> {
        fs::create_dir_all(&self.dir)?;

        let mut nodes = String::from(NODES_HEADER);
        for node in &topology.nodes {
            nodes.push('\n');
            nodes.push_str(&format!(
                "{}\t{}\t{}\t{}",
                node.name,
                node.address,
                node.user,
                node.role.as_str()
            ));
        }
        nodes.push('\n');
        self.write_atomic(&self.nodes_path(), &nodes)?;

        let mut groups = String::from(GROUPS_HEADER);
        for group in &topology.security_groups {
            groups.push('\n');
            groups.push_str(&format!("{}\t{}", group.name, group.scope.as_str()));
        }
        groups.push('\n');
        self.write_atomic(&self.groups_path(), &groups)?;

        debug!(
            dir = %self.dir.display(),
            nodes = topology.nodes.len(),
            groups = topology.security_groups.len(),
            "Topology saved"
        );
        Ok(())
    }

    fn load(&self) -> Result<ClusterTopology, TopologyError> {
        let nodes_path = self.nodes_path();
        let groups_path = self.groups_path();

        if !nodes_path.exists() {
            return Err(TopologyError::Missing(nodes_path));
        }
        if !groups_path.exists() {
            return Err(TopologyError::Missing(groups_path));
        }

        let malformed = |path: &Path, reason: String| TopologyError::Malformed {
            path: path.to_path_buf(),
            reason,
        };

        let mut nodes = Vec::new();
        let contents = fs::read_to_string(&nodes_path)?;
        let mut lines = contents.lines();
        match lines.next() {
            Some(header) if header == NODES_HEADER => {}
            other => {
                return Err(malformed(
                    &nodes_path,
                    format!("unexpected header {:?}", other),
                ))
            }
        }
        for line in lines.filter(|l| !l.is_empty()) {
            let fields: Vec<&str> = line.split('\t').collect();
            let [name, address, user, role] = fields.as_slice() else {
                return Err(malformed(&nodes_path, format!("bad row {:?}", line)));
            };
            let address = address
                .parse()
                .map_err(|e| malformed(&nodes_path, format!("bad address {:?}: {}", address, e)))?;
            let role = NodeRole::parse(role)
                .ok_or_else(|| malformed(&nodes_path, format!("unknown role {:?}", role)))?;
            nodes.push(NodeRecord {
                name: name.to_string(),
                address,
                user: user.to_string(),
                role,
            });
        }

        let mut security_groups = Vec::new();
        let contents = fs::read_to_string(&groups_path)?;
        let mut lines = contents.lines();
        match lines.next() {
            Some(header) if header == GROUPS_HEADER => {}
            other => {
                return Err(malformed(
                    &groups_path,
                    format!("unexpected header {:?}", other),
                ))
            }
        }
        for line in lines.filter(|l| !l.is_empty()) {
            let fields: Vec<&str> = line.split('\t').collect();
            let [name, scope] = fields.as_slice() else {
                return Err(malformed(&groups_path, format!("bad row {:?}", line)));
            };
            let scope = GroupScope::parse(scope)
                .ok_or_else(|| malformed(&groups_path, format!("unknown scope {:?}", scope)))?;
            security_groups.push(SecurityGroupRecord {
                name: name.to_string(),
                scope,
            });
        }

        Ok(ClusterTopology {
            nodes,
            security_groups,
        })
    }

    fn clear(&self) -> Result<(), TopologyError> {
        for path in [self.nodes_path(), self.groups_path()] {
            match fs::remove_file(&path) {
                Ok(()) => debug!(path = %path.display(), "Topology table removed"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ClusterTopology {
        ClusterTopology {
            nodes: vec![
                NodeRecord {
                    name: "demo-master".to_string(),
                    address: "20.1.2.3".parse().unwrap(),
                    user: "azureuser".to_string(),
                    role: NodeRole::Coordinator,
                },
                NodeRecord {
                    name: "demo-worker-1".to_string(),
                    address: "20.1.2.4".parse().unwrap(),
                    user: "azureuser".to_string(),
                    role: NodeRole::Worker,
                },
            ],
            security_groups: vec![
                SecurityGroupRecord {
                    name: "demo-sg-coordinator".to_string(),
                    scope: GroupScope::CoordinatorGroup,
                },
                SecurityGroupRecord {
                    name: "demo-sg-worker".to_string(),
                    scope: GroupScope::WorkerGroup,
                },
            ],
        }
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());

        let topology = sample();
        store.save(&topology).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded, topology);
    }

    #[test]
    fn test_save_overwrites_entirely() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());

        store.save(&sample()).unwrap();

        let smaller = ClusterTopology {
            nodes: sample().nodes[..1].to_vec(),
            security_groups: vec![],
        };
        store.save(&smaller).unwrap();

        assert_eq!(store.load().unwrap(), smaller);
    }

    #[test]
    fn test_load_missing_is_explicit() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());

        assert!(matches!(store.load(), Err(TopologyError::Missing(_))));
    }

    #[test]
    fn test_load_rejects_malformed_rows() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        store.save(&sample()).unwrap();

        fs::write(
            dir.path().join("cluster_nodes.tsv"),
            "name\taddress\tuser\trole\ndemo\tnot-an-ip\tuser\tworker\n",
        )
        .unwrap();

        assert!(matches!(
            store.load(),
            Err(TopologyError::Malformed { .. })
        ));
    }

    #[test]
    fn test_clear_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());

        store.save(&sample()).unwrap();
        store.clear().unwrap();
        // Already absent: still Ok.
        store.clear().unwrap();

        assert!(matches!(store.load(), Err(TopologyError::Missing(_))));
    }

    #[test]
    fn test_tables_are_human_readable() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        store.save(&sample()).unwrap();

        let nodes = fs::read_to_string(dir.path().join("cluster_nodes.tsv")).unwrap();
        assert!(nodes.starts_with("name\taddress\tuser\trole\n"));
        assert!(nodes.contains("demo-worker-1\t20.1.2.4\tazureuser\tworker"));
    }
}
