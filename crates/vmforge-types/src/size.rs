//! VM size tiers and their fixed resource tuples.

use serde::{Deserialize, Serialize};

/// A requestable VM size. Each tier maps to a fixed CPU/RAM/disk tuple —
/// sizes are not freely configurable, by design.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VmSize {
    /// 2 vCPU / 4 GiB RAM / 50 GiB disk.
    S,
    /// 4 vCPU / 8 GiB RAM / 100 GiB disk.
    M,
    /// 8 vCPU / 16 GiB RAM / 200 GiB disk.
    L,
    /// 16 vCPU / 32 GiB RAM / 500 GiB disk.
    Xl,
}

/// The concrete CPU/RAM/disk a [`VmSize`] resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceTuple {
    pub vcpu: u16,
    pub ram_gib: u16,
    pub disk_gib: u16,
}

impl VmSize {
    /// Resolves this size to its fixed resource tuple.
    pub fn resources(self) -> ResourceTuple {
        match self {
            VmSize::S => ResourceTuple { vcpu: 2, ram_gib: 4, disk_gib: 50 },
            VmSize::M => ResourceTuple { vcpu: 4, ram_gib: 8, disk_gib: 100 },
            VmSize::L => ResourceTuple { vcpu: 8, ram_gib: 16, disk_gib: 200 },
            VmSize::Xl => ResourceTuple { vcpu: 16, ram_gib: 32, disk_gib: 500 },
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            VmSize::S => "S",
            VmSize::M => "M",
            VmSize::L => "L",
            VmSize::Xl => "XL",
        }
    }
}

impl std::str::FromStr for VmSize {
    type Err = InvalidVmSize;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "S" => Ok(VmSize::S),
            "M" => Ok(VmSize::M),
            "L" => Ok(VmSize::L),
            "XL" => Ok(VmSize::Xl),
            other => Err(InvalidVmSize(other.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid VM size: {0:?} (expected one of S, M, L, XL)")]
pub struct InvalidVmSize(String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_size_round_trips_through_its_string_form() {
        for size in [VmSize::S, VmSize::M, VmSize::L, VmSize::Xl] {
            let parsed: VmSize = size.as_str().parse().unwrap();
            assert_eq!(parsed, size);
        }
    }

    #[test]
    fn resource_tuples_match_the_fixed_table() {
        assert_eq!(VmSize::S.resources(), ResourceTuple { vcpu: 2, ram_gib: 4, disk_gib: 50 });
        assert_eq!(VmSize::M.resources(), ResourceTuple { vcpu: 4, ram_gib: 8, disk_gib: 100 });
        assert_eq!(VmSize::L.resources(), ResourceTuple { vcpu: 8, ram_gib: 16, disk_gib: 200 });
        assert_eq!(VmSize::Xl.resources(), ResourceTuple { vcpu: 16, ram_gib: 32, disk_gib: 500 });
    }
}
