use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::ser::{Serialize, SerializeStruct, Serializer};

use super::decisions::Decisions;
use super::policy::Policy;
use super::pool::{PackageId, Pool};
use crate::package::{AliasPackage, Package, PoolPackage};

/// Kind of an [`Operation`], as used in JSON output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperationKind {
    Install,
    Update,
    Uninstall,
    MarkAliasInstalled,
    MarkAliasUninstalled,
}

/// A single operation in a transaction
#[derive(Debug, Clone)]
pub enum Operation {
    /// Install a new package
    Install(Arc<Package>),
    /// Update a package from one version to another
    Update {
        from: Arc<Package>,
        to: Arc<Package>,
    },
    /// Remove a package
    Uninstall(Arc<Package>),
    /// Mark an alias as installed (the alias package itself is not installed,
    /// but requirements matching the alias version are satisfied)
    MarkAliasInstalled(Arc<AliasPackage>),
    /// Mark an alias as uninstalled
    MarkAliasUninstalled(Arc<AliasPackage>),
}

impl Operation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::Install(_) => OperationKind::Install,
            Operation::Update { .. } => OperationKind::Update,
            Operation::Uninstall(_) => OperationKind::Uninstall,
            Operation::MarkAliasInstalled(_) => OperationKind::MarkAliasInstalled,
            Operation::MarkAliasUninstalled(_) => OperationKind::MarkAliasUninstalled,
        }
    }

    /// Name of the package the operation acts on
    pub fn package_name(&self) -> &str {
        match self {
            Operation::Install(p) | Operation::Uninstall(p) => &p.name,
            Operation::Update { to, .. } => &to.name,
            Operation::MarkAliasInstalled(a) | Operation::MarkAliasUninstalled(a) => a.name(),
        }
    }

    /// Pretty version the operation leaves in place (the removed one for
    /// uninstalls)
    pub fn pretty_version(&self) -> &str {
        match self {
            Operation::Install(p) | Operation::Uninstall(p) => &p.pretty_version,
            Operation::Update { to, .. } => &to.pretty_version,
            Operation::MarkAliasInstalled(a) | Operation::MarkAliasUninstalled(a) => a.pretty_version(),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Install(p) => write!(f, "Installing {} ({})", p.pretty_name, p.pretty_version),
            Operation::Update { from, to } => write!(
                f,
                "Updating {} ({} => {})",
                to.pretty_name, from.pretty_version, to.pretty_version
            ),
            Operation::Uninstall(p) => write!(f, "Removing {} ({})", p.pretty_name, p.pretty_version),
            Operation::MarkAliasInstalled(a) => write!(
                f,
                "Marking {} ({}) as installed, alias of {} ({})",
                a.pretty_name(),
                a.pretty_version(),
                a.alias_of().pretty_name,
                a.alias_of().pretty_version
            ),
            Operation::MarkAliasUninstalled(a) => write!(
                f,
                "Marking {} ({}) as uninstalled, alias of {} ({})",
                a.pretty_name(),
                a.pretty_version(),
                a.alias_of().pretty_name,
                a.alias_of().pretty_version
            ),
        }
    }
}

impl Serialize for Operation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let from = match self {
            Operation::Update { from, .. } => Some(from.pretty_version.as_str()),
            _ => None,
        };
        let alias_of = match self {
            Operation::MarkAliasInstalled(a) | Operation::MarkAliasUninstalled(a) => {
                Some(a.alias_of().pretty_version.as_str())
            }
            _ => None,
        };

        let mut state = serializer.serialize_struct("Operation", 5)?;
        state.serialize_field("type", &self.kind())?;
        state.serialize_field("package", self.package_name())?;
        state.serialize_field("version", self.pretty_version())?;
        if let Some(from) = from {
            state.serialize_field("from", from)?;
        } else {
            state.skip_field("from")?;
        }
        if let Some(alias_of) = alias_of {
            state.serialize_field("alias-of", alias_of)?;
        } else {
            state.skip_field("alias-of")?;
        }
        state.end()
    }
}

/// The ordered operations turning the installed state into a solution
///
/// Installs and updates are ordered so that a package's requirements come
/// before it; removals go last.
#[derive(Debug, Clone, Default)]
pub struct Transaction {
    /// Operations to perform
    pub operations: Vec<Operation>,
}

impl Transaction {
    /// Create a new empty transaction
    pub fn new() -> Self {
        Self::default()
    }

    /// Diffs the decided packages against the installed ones.
    pub fn from_decisions(
        pool: &Pool,
        policy: &dyn Policy,
        installed: &BTreeSet<PackageId>,
        decisions: &Decisions,
    ) -> Self {
        let mut install_means_update = find_updates(pool, policy, installed, decisions);

        // Keyed maps in reverse decision order
        let mut install_map: IndexMap<PackageId, ()> = IndexMap::new();
        let mut update_map: IndexMap<PackageId, PackageId> = IndexMap::new();
        let mut ignore_remove: HashSet<PackageId> = HashSet::new();

        for decision in decisions.iter() {
            let literal = decision.literal;
            let id = literal.id();
            // wanted and installed, or neither
            if literal.is_positive() == installed.contains(&id) {
                continue;
            }
            if literal.is_negative() {
                continue;
            }

            match install_means_update.get(&id).copied() {
                Some(source) if !pool.package(id).is_alias() => {
                    update_map.insert(id, source);
                    install_means_update.remove(&id);
                    ignore_remove.insert(source);
                }
                _ => {
                    install_map.insert(id, ());
                }
            }
        }

        let uninstalls: Vec<PackageId> = decisions
            .iter()
            .map(|decision| decision.literal)
            .filter(|literal| {
                literal.is_negative()
                    && installed.contains(&literal.id())
                    && !ignore_remove.contains(&literal.id())
            })
            .map(|literal| literal.id())
            .collect();

        let mut transaction = Self::new();
        transaction.order_operations(pool, install_map, update_map);
        for id in uninstalls {
            transaction.push_uninstall(pool.package(id));
        }
        transaction
    }

    /// Emits installs and updates depth first along requires links
    fn order_operations(
        &mut self,
        pool: &Pool,
        mut install_map: IndexMap<PackageId, ()>,
        mut update_map: IndexMap<PackageId, PackageId>,
    ) {
        let mut queue = find_root_packages(pool, &install_map, &update_map);
        let mut visited: HashSet<PackageId> = HashSet::new();

        while let Some(id) = queue.pop() {
            if visited.insert(id) {
                queue.push(id);
                match pool.alias_of(id) {
                    Some(base) => queue.push(base),
                    None => {
                        for link in pool.package(id).requires() {
                            queue.extend(
                                pool.what_provides(&link.target, Some(&*link.constraint))
                                    .iter()
                                    .copied(),
                            );
                        }
                    }
                }
                continue;
            }

            if install_map.shift_remove(&id).is_some() {
                self.push_install(pool.package(id));
            }
            if let Some(source) = update_map.shift_remove(&id) {
                if let (Some(from), Some(to)) = (
                    pool.package(source).as_concrete(),
                    pool.package(id).as_concrete(),
                ) {
                    self.operations.push(Operation::Update {
                        from: from.clone(),
                        to: to.clone(),
                    });
                }
            }
        }
    }

    fn push_install(&mut self, package: &PoolPackage) {
        self.operations.push(match package {
            PoolPackage::Concrete(p) => Operation::Install(p.clone()),
            PoolPackage::Alias(a) => Operation::MarkAliasInstalled(a.clone()),
        });
    }

    fn push_uninstall(&mut self, package: &PoolPackage) {
        self.operations.push(match package {
            PoolPackage::Concrete(p) => Operation::Uninstall(p.clone()),
            PoolPackage::Alias(a) => Operation::MarkAliasUninstalled(a.clone()),
        });
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn into_operations(self) -> Vec<Operation> {
        self.operations
    }

    pub fn iter(&self) -> impl Iterator<Item = &Operation> {
        self.operations.iter()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Count of operations per kind
    pub fn summary(&self) -> HashMap<OperationKind, usize> {
        let mut counts = HashMap::new();
        for operation in &self.operations {
            *counts.entry(operation.kind()).or_insert(0) += 1;
        }
        counts
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts = self.summary();
        let count = |kind| counts.get(&kind).copied().unwrap_or(0);
        write!(
            f,
            "{} installs, {} updates, {} removals",
            count(OperationKind::Install),
            count(OperationKind::Update),
            count(OperationKind::Uninstall)
        )
    }
}

/// Maps every package that would replace a removed installed package to
/// that installed package, so installing it reads as an update.
fn find_updates(
    pool: &Pool,
    policy: &dyn Policy,
    installed: &BTreeSet<PackageId>,
    decisions: &Decisions,
) -> HashMap<PackageId, PackageId> {
    let mut install_means_update = HashMap::new();

    for decision in decisions.iter() {
        let literal = decision.literal;
        let id = literal.id();
        if pool.package(id).is_alias() {
            continue;
        }
        // not wanted but installed
        if literal.is_negative() && installed.contains(&id) {
            for update in policy.find_update_packages(pool, id) {
                install_means_update.insert(update, id);
            }
        }
    }

    install_means_update
}

/// Installs and updates nothing else in the change set requires
fn find_root_packages(
    pool: &Pool,
    install_map: &IndexMap<PackageId, ()>,
    update_map: &IndexMap<PackageId, PackageId>,
) -> Vec<PackageId> {
    let mut packages: Vec<PackageId> = install_map.keys().copied().collect();
    packages.extend(update_map.keys().filter(|id| !install_map.contains_key(*id)));

    let mut roots: IndexMap<PackageId, ()> = packages.iter().map(|&id| (id, ())).collect();
    for &id in &packages {
        if !roots.contains_key(&id) {
            continue;
        }
        for link in pool.package(id).requires() {
            for &required in pool.what_provides(&link.target, Some(&*link.constraint)).iter() {
                if required != id {
                    roots.shift_remove(&required);
                }
            }
        }
    }

    roots.into_keys().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::Package;

    fn arc(name: &str, version: &str) -> Arc<Package> {
        Arc::new(Package::new(name, version).unwrap())
    }

    #[test]
    fn test_operation_display() {
        let install = Operation::Install(arc("acme/log", "1.0"));
        assert_eq!(install.to_string(), "Installing acme/log (1.0)");

        let update = Operation::Update {
            from: arc("acme/log", "1.0"),
            to: arc("acme/log", "2.0"),
        };
        assert_eq!(update.to_string(), "Updating acme/log (1.0 => 2.0)");

        let remove = Operation::Uninstall(arc("acme/log", "1.0"));
        assert_eq!(remove.to_string(), "Removing acme/log (1.0)");
        assert_eq!(remove.kind(), OperationKind::Uninstall);
    }

    #[test]
    fn test_alias_display() {
        let alias = AliasPackage::new(
            arc("acme/log", "dev-main"),
            "1.0.9999999.9999999-dev".to_string(),
            "1.0.x-dev".to_string(),
        );
        let operation = Operation::MarkAliasInstalled(Arc::new(alias));
        assert_eq!(
            operation.to_string(),
            "Marking acme/log (1.0.x-dev) as installed, alias of acme/log (dev-main)"
        );
    }

    #[test]
    fn test_operation_json() {
        let update = Operation::Update {
            from: arc("acme/log", "1.0"),
            to: arc("acme/log", "2.0"),
        };
        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "type": "update",
                "package": "acme/log",
                "version": "2.0",
                "from": "1.0"
            })
        );

        let install = serde_json::to_value(Operation::Install(arc("acme/log", "1.0"))).unwrap();
        assert_eq!(
            install,
            serde_json::json!({"type": "install", "package": "acme/log", "version": "1.0"})
        );
    }

    #[test]
    fn test_summary() {
        let transaction = Transaction {
            operations: vec![
                Operation::Install(arc("a", "1.0")),
                Operation::Install(arc("b", "1.0")),
                Operation::Uninstall(arc("c", "1.0")),
            ],
        };
        assert_eq!(transaction.len(), 3);
        assert_eq!(transaction.to_string(), "2 installs, 0 updates, 1 removals");
    }
}
