use std::collections::btree_map::Entry;

use crate::api::error::{PlanError, PlanResult};
use crate::api::types::*;

/// Largest divisor of `n` not exceeding `max` (at least 1).
pub fn largest_divisor(n: usize, max: usize) -> usize {
    let cap = max.min(n).max(1);
    (1..=cap).rev().find(|d| n % d == 0).unwrap_or(1)
}

impl WorkerGrid {
    pub fn one_d(global: usize, local: usize) -> PlanResult<Self> {
        Self::new([global, 1], [local, 1], 1)
    }

    pub fn two_d(global: [usize; 2], local: [usize; 2]) -> PlanResult<Self> {
        Self::new(global, local, 2)
    }

    fn new(global: [usize; 2], local: [usize; 2], dims: u8) -> PlanResult<Self> {
        let whole = global
            .iter()
            .zip(&local)
            .all(|(&g, &l)| g > 0 && l > 0 && g % l == 0);
        if !whole {
            return Err(PlanError::PartialWorkGroup { global, local });
        }
        Ok(Self {
            global,
            local,
            dims,
        })
    }

    pub fn global(&self) -> [usize; 2] {
        self.global
    }

    pub fn local(&self) -> [usize; 2] {
        self.local
    }

    pub fn dims(&self) -> u8 {
        self.dims
    }

    /// Work-groups per dimension.
    pub fn groups(&self) -> [usize; 2] {
        [
            self.global[0] / self.local[0],
            self.global[1] / self.local[1],
        ]
    }

    pub fn group_count(&self) -> usize {
        let g = self.groups();
        g[0] * g[1]
    }
}

impl std::fmt::Display for WorkerGrid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.dims == 1 {
            write!(f, "global={} local={}", self.global[0], self.local[0])
        } else {
            write!(
                f,
                "global=({}, {}) local=({}, {})",
                self.global[0], self.global[1], self.local[0], self.local[1]
            )
        }
    }
}

impl GridSchedule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key(graph: &str, kernel: &str) -> String {
        format!("{}.{}", graph, kernel)
    }

    pub fn insert(&mut self, graph: &str, kernel: &str, grid: WorkerGrid) -> PlanResult<()> {
        match self.grids.entry(Self::key(graph, kernel)) {
            Entry::Occupied(e) => Err(PlanError::DuplicateGrid(e.key().clone())),
            Entry::Vacant(e) => {
                e.insert(grid);
                Ok(())
            }
        }
    }

    pub fn get(&self, graph: &str, kernel: &str) -> Option<&WorkerGrid> {
        self.grids.get(&Self::key(graph, kernel))
    }

    pub fn len(&self) -> usize {
        self.grids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grids.is_empty()
    }

    /// Entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &WorkerGrid)> {
        self.grids.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl DeviceVendor {
    pub const ALL: [DeviceVendor; 5] = [
        DeviceVendor::Nvidia,
        DeviceVendor::Amd,
        DeviceVendor::Intel,
        DeviceVendor::Apple,
        DeviceVendor::Generic,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            DeviceVendor::Nvidia => "nvidia",
            DeviceVendor::Amd => "amd",
            DeviceVendor::Intel => "intel",
            DeviceVendor::Apple => "apple",
            DeviceVendor::Generic => "generic",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|v| v.name().eq_ignore_ascii_case(name))
    }

    pub fn reduction_local(&self) -> usize {
        match self {
            DeviceVendor::Nvidia | DeviceVendor::Amd => 256,
            DeviceVendor::Intel => 128,
            DeviceVendor::Apple => 32,
            DeviceVendor::Generic => 64,
        }
    }

    pub fn projection_local(&self) -> usize {
        match self {
            DeviceVendor::Nvidia | DeviceVendor::Apple | DeviceVendor::Generic => 32,
            DeviceVendor::Amd | DeviceVendor::Intel => 64,
        }
    }
}

impl GridPolicy {
    pub fn for_vendor(vendor: DeviceVendor) -> Self {
        Self {
            vendor,
            projection_local: vendor.projection_local(),
            reduction_local: vendor.reduction_local(),
            elementwise_local: 128,
            attention_max_local: 64,
        }
    }

    /// Launch geometry for one kernel.
    pub fn grid_for(&self, kernel: &str, shape: ParallelShape) -> PlanResult<WorkerGrid> {
        let invalid = |reason: &str| PlanError::InvalidGrid {
            kernel: kernel.to_string(),
            reason: reason.to_string(),
        };
        match shape {
            ParallelShape::Reduction(n) => {
                if n == 0 {
                    return Err(invalid("empty reduction"));
                }
                WorkerGrid::one_d(n, largest_divisor(n, self.reduction_local))
            }
            ParallelShape::Rows(rows) => {
                if rows == 0 || self.projection_local == 0 {
                    return Err(invalid("empty projection"));
                }
                WorkerGrid::one_d(rows * self.projection_local, self.projection_local)
            }
            ParallelShape::Pairs { heads, half } => {
                if heads == 0 || half == 0 {
                    return Err(invalid("empty rotation"));
                }
                WorkerGrid::two_d(
                    [heads, half],
                    [1, largest_divisor(half, self.attention_max_local)],
                )
            }
            ParallelShape::Heads { heads, head_size } => {
                if heads == 0 || head_size == 0 {
                    return Err(invalid("no heads"));
                }
                let g = largest_divisor(head_size, self.attention_max_local);
                WorkerGrid::one_d(heads * g, g)
            }
            ParallelShape::Elements(n) => {
                if n == 0 {
                    return Err(invalid("no elements"));
                }
                WorkerGrid::one_d(n, largest_divisor(n, self.elementwise_local))
            }
        }
    }
}

impl Default for GridPolicy {
    fn default() -> Self {
        Self::for_vendor(DeviceVendor::Generic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_largest_divisor() {
        assert_eq!(largest_divisor(128, 64), 64);
        assert_eq!(largest_divisor(96, 64), 48);
        assert_eq!(largest_divisor(80, 64), 40);
        assert_eq!(largest_divisor(7, 64), 7);
        assert_eq!(largest_divisor(97, 64), 1);
        assert_eq!(largest_divisor(10, 0), 1);
    }

    #[test]
    fn test_partial_work_group_rejected() {
        assert!(matches!(
            WorkerGrid::one_d(100, 64),
            Err(PlanError::PartialWorkGroup { .. })
        ));
        assert!(WorkerGrid::one_d(128, 64).is_ok());
        assert!(WorkerGrid::two_d([4, 10], [1, 3]).is_err());
    }

    #[test]
    fn test_vendor_sizes() {
        let nv = GridPolicy::for_vendor(DeviceVendor::Nvidia);
        assert_eq!(nv.reduction_local, 256);
        assert_eq!(nv.projection_local, 32);
        let amd = GridPolicy::for_vendor(DeviceVendor::Amd);
        assert_eq!(amd.projection_local, 64);
        assert_eq!(GridPolicy::default().vendor, DeviceVendor::Generic);
        assert_eq!(DeviceVendor::from_name("Apple"), Some(DeviceVendor::Apple));
        assert_eq!(DeviceVendor::from_name("voodoo"), None);
    }

    #[test]
    fn test_policy_shapes() {
        let p = GridPolicy::for_vendor(DeviceVendor::Nvidia);

        // Reduction over a dim smaller than the vendor size shrinks the group
        let g = p.grid_for("r", ParallelShape::Reduction(96)).unwrap();
        assert_eq!((g.global()[0], g.local()[0]), (96, 96));
        let g = p.grid_for("r", ParallelShape::Reduction(4096)).unwrap();
        assert_eq!((g.global()[0], g.local()[0]), (4096, 256));

        let g = p.grid_for("m", ParallelShape::Rows(1000)).unwrap();
        assert_eq!((g.global()[0], g.local()[0]), (32000, 32));
        assert_eq!(g.group_count(), 1000);

        let g = p
            .grid_for("rope", ParallelShape::Pairs { heads: 8, half: 16 })
            .unwrap();
        assert_eq!(g.dims(), 2);
        assert_eq!(g.global(), [8, 16]);
        assert_eq!(g.local(), [1, 16]);

        let g = p
            .grid_for("att", ParallelShape::Heads { heads: 8, head_size: 96 })
            .unwrap();
        assert_eq!((g.global()[0], g.local()[0]), (8 * 48, 48));

        let g = p.grid_for("e", ParallelShape::Elements(384)).unwrap();
        assert_eq!(g.local()[0], 128);
    }

    #[test]
    fn test_duplicate_grid_rejected() {
        let mut s = GridSchedule::new();
        let g = WorkerGrid::one_d(64, 32).unwrap();
        s.insert("layer-0", "q-proj", g).unwrap();
        assert!(matches!(
            s.insert("layer-0", "q-proj", g),
            Err(PlanError::DuplicateGrid(k)) if k == "layer-0.q-proj"
        ));
        assert_eq!(s.get("layer-0", "q-proj"), Some(&g));
        assert_eq!(s.len(), 1);
    }
}
