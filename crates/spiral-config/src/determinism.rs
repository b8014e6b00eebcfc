// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Seed policy for random field draws.
//!
//! Engines that are handed an explicit seed always use it. Engines without one
//! consult the process-wide policy: when `SPIRAL_DETERMINISTIC` is set the seed
//! is derived from `SPIRAL_DETERMINISTIC_SEED` and the engine label, otherwise
//! the operating system supplies entropy.

use rand::{rngs::StdRng, SeedableRng};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::OnceLock;

pub const ENABLE_VAR: &str = "SPIRAL_DETERMINISTIC";
pub const SEED_VAR: &str = "SPIRAL_DETERMINISTIC_SEED";
const DEFAULT_BASE_SEED: u64 = 42;

/// Snapshot of the process-wide seed policy.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeterminismConfig {
    /// Unseeded draws are reproducible when set.
    pub enabled: bool,
    /// Mixed with each component label.
    pub base_seed: u64,
}

impl Default for DeterminismConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_seed: DEFAULT_BASE_SEED,
        }
    }
}

fn read_flag(raw: Option<String>) -> bool {
    match raw.as_deref().map(str::trim) {
        None | Some("") => false,
        Some(value) => !["0", "false", "off", "no"]
            .iter()
            .any(|off| value.eq_ignore_ascii_case(off)),
    }
}

impl DeterminismConfig {
    /// Reads `SPIRAL_DETERMINISTIC` and `SPIRAL_DETERMINISTIC_SEED`. An
    /// unparsable seed keeps the default.
    pub fn from_env() -> Self {
        let base_seed = std::env::var(SEED_VAR)
            .ok()
            .and_then(|raw| raw.trim().parse().ok())
            .unwrap_or(DEFAULT_BASE_SEED);
        Self {
            enabled: read_flag(std::env::var(ENABLE_VAR).ok()),
            base_seed,
        }
    }

    pub fn seed_for<L: Hash>(&self, label: L) -> u64 {
        let mut hasher = DefaultHasher::new();
        (self.base_seed, label).hash(&mut hasher);
        hasher.finish()
    }

    /// Seeded generator for `label` under this policy, entropy when disabled.
    pub fn rng_for(&self, label: &str) -> StdRng {
        if self.enabled {
            StdRng::seed_from_u64(self.seed_for(label))
        } else {
            StdRng::from_entropy()
        }
    }
}

static CONFIG: OnceLock<DeterminismConfig> = OnceLock::new();

/// Process policy, read from the environment on first use.
pub fn config() -> &'static DeterminismConfig {
    CONFIG.get_or_init(DeterminismConfig::from_env)
}

/// Installs an explicit policy. Only the first call (or the first implicit
/// read through [`config`]) wins.
pub fn configure(cfg: DeterminismConfig) -> &'static DeterminismConfig {
    CONFIG.get_or_init(|| cfg)
}

/// Explicit seed if given, otherwise the process policy for `label`.
pub fn rng_from_optional(seed: Option<u64>, label: &str) -> StdRng {
    seed.map_or_else(|| config().rng_for(label), StdRng::seed_from_u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;
    use std::sync::{Mutex, MutexGuard};

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    /// Serialises environment edits and restores the previous values on drop.
    struct EnvGuard {
        saved: Vec<(&'static str, Option<String>)>,
        _lock: MutexGuard<'static, ()>,
    }

    impl EnvGuard {
        fn set(vars: &[(&'static str, Option<&str>)]) -> Self {
            let lock = ENV_LOCK.lock().unwrap_or_else(|poison| poison.into_inner());
            let saved = vars
                .iter()
                .map(|&(key, value)| {
                    let previous = std::env::var(key).ok();
                    match value {
                        Some(v) => std::env::set_var(key, v),
                        None => std::env::remove_var(key),
                    }
                    (key, previous)
                })
                .collect();
            Self { saved, _lock: lock }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (key, previous) in self.saved.drain(..) {
                match previous {
                    Some(v) => std::env::set_var(key, v),
                    None => std::env::remove_var(key),
                }
            }
        }
    }

    #[test]
    fn unset_environment_means_entropy() {
        let _env = EnvGuard::set(&[(ENABLE_VAR, None), (SEED_VAR, None)]);
        assert_eq!(DeterminismConfig::from_env(), DeterminismConfig::default());
    }

    #[test]
    fn environment_enables_seeded_policy() {
        let _env = EnvGuard::set(&[(ENABLE_VAR, Some("1")), (SEED_VAR, Some(" 1337 "))]);
        let cfg = DeterminismConfig::from_env();
        assert!(cfg.enabled);
        assert_eq!(cfg.base_seed, 1337);
    }

    #[test]
    fn textual_false_and_garbage_seed() {
        let _env = EnvGuard::set(&[(ENABLE_VAR, Some("OFF")), (SEED_VAR, Some("many"))]);
        let cfg = DeterminismConfig::from_env();
        assert!(!cfg.enabled);
        assert_eq!(cfg.base_seed, DEFAULT_BASE_SEED);
    }

    #[test]
    fn enabled_policy_repeats_per_label() {
        let cfg = DeterminismConfig {
            enabled: true,
            base_seed: 99,
        };
        assert_ne!(cfg.seed_for("baseline"), cfg.seed_for("evolve"));
        let a: [f64; 3] = cfg.rng_for("baseline").gen();
        let b: [f64; 3] = cfg.rng_for("baseline").gen();
        assert_eq!(a, b);
    }

    #[test]
    fn explicit_seed_ignores_label() {
        let a: [f64; 4] = rng_from_optional(Some(7), "left").gen();
        let b: [f64; 4] = rng_from_optional(Some(7), "right").gen();
        assert_eq!(a, b);
    }
}
