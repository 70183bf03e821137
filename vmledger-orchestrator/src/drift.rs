use std::collections::{BTreeSet, HashMap};
use vmledger_common::LocalInstance;
use vmledger_providers::inventory::DiscoveredInstance;

/// Result of comparing provider and local inventories for one provider.
#[derive(Debug, Clone, Default)]
pub struct DriftReport {
    /// Size of the local set that was compared.
    pub checked: usize,
    /// Local instances with no remote counterpart, sorted by (name, id).
    pub orphans: Vec<LocalInstance>,
    /// Names reported more than once by the provider. They collapse to a
    /// single lookup entry, which hides which duplicate is the real one.
    pub duplicate_remote_names: Vec<String>,
}

impl DriftReport {
    pub fn has_orphans(&self) -> bool {
        !self.orphans.is_empty()
    }
}

/// Existence-only comparison by instance name. Attributes are ignored.
pub fn detect_orphans(remote: &[DiscoveredInstance], local: Vec<LocalInstance>) -> DriftReport {
    let mut lookup: HashMap<&str, &DiscoveredInstance> = HashMap::with_capacity(remote.len());
    let mut duplicates = BTreeSet::new();
    for inst in remote {
        if lookup.insert(inst.name.as_str(), inst).is_some() {
            duplicates.insert(inst.name.clone());
        }
    }

    let checked = local.len();
    let mut orphans: Vec<LocalInstance> = local
        .into_iter()
        .filter(|l| !lookup.contains_key(l.name.as_str()))
        .collect();
    // Listing order is unspecified; cleanup order must not depend on it.
    orphans.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));

    DriftReport {
        checked,
        orphans,
        duplicate_remote_names: duplicates.into_iter().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn local(provider: Uuid, names: &[(&str, &str)]) -> Vec<LocalInstance> {
        names
            .iter()
            .map(|(n, s)| LocalInstance::new(provider, *n, *s))
            .collect()
    }

    fn remote(names: &[&str]) -> Vec<DiscoveredInstance> {
        names.iter().map(|n| DiscoveredInstance::named(*n)).collect()
    }

    fn orphan_names(report: &DriftReport) -> Vec<&str> {
        report.orphans.iter().map(|o| o.name.as_str()).collect()
    }

    #[test]
    fn local_only_instances_are_orphans() {
        let p = Uuid::new_v4();
        let report = detect_orphans(
            &remote(&["A"]),
            local(p, &[("C", "creating"), ("A", "running"), ("B", "running")]),
        );
        assert_eq!(report.checked, 3);
        assert_eq!(orphan_names(&report), vec!["B", "C"]);
        assert!(report.duplicate_remote_names.is_empty());
    }

    #[test]
    fn remote_superset_yields_no_orphans() {
        let p = Uuid::new_v4();
        let report = detect_orphans(
            &remote(&["A", "B", "extra-1", "extra-2"]),
            local(p, &[("A", "running"), ("B", "stopped")]),
        );
        assert_eq!(report.checked, 2);
        assert!(!report.has_orphans());
    }

    #[test]
    fn orphan_set_matches_name_difference() {
        let p = Uuid::new_v4();
        let remote_sets: [&[&str]; 4] = [&[], &["a"], &["a", "c"], &["b", "c", "z"]];
        let local_names = ["a", "b", "c", "d"];
        for remote_names in remote_sets {
            let l = local(p, &local_names.map(|n| (n, "running")));
            let report = detect_orphans(&remote(remote_names), l);
            let expected: Vec<&str> = local_names
                .iter()
                .copied()
                .filter(|n| !remote_names.contains(n))
                .collect();
            assert_eq!(orphan_names(&report), expected, "remote={remote_names:?}");
            assert_eq!(report.checked, local_names.len());
        }
    }

    #[test]
    fn empty_local_set() {
        let report = detect_orphans(&remote(&["a"]), Vec::new());
        assert_eq!(report.checked, 0);
        assert!(!report.has_orphans());
    }

    #[test]
    fn duplicate_remote_names_are_reported_once() {
        let p = Uuid::new_v4();
        let report = detect_orphans(
            &remote(&["dup", "dup", "dup", "solo"]),
            local(p, &[("dup", "running"), ("gone", "running")]),
        );
        assert_eq!(report.duplicate_remote_names, vec!["dup".to_string()]);
        assert_eq!(orphan_names(&report), vec!["gone"]);
    }

    #[test]
    fn names_are_case_sensitive() {
        let p = Uuid::new_v4();
        let report = detect_orphans(&remote(&["VM-1"]), local(p, &[("vm-1", "running")]));
        assert_eq!(orphan_names(&report), vec!["vm-1"]);
    }
}
