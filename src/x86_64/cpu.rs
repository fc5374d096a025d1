//! x86 CPU kinds and the features that matter for ABI decisions.
//!
//! The only feature that changes lowering is the available vector width
//! (AVX widens the legal-vector limit to 256 bits), but the full kind
//! table is kept so CPU names round-trip the way front-ends expect.

use target_lexicon::{Architecture, Triple};

use crate::fx::FxHashSet;
use crate::result::{AbiError, AbiResult};

/// Known x86 CPU kinds. Names map case-sensitively; legacy aliases
/// (`atom`, `corei7`, ...) resolve to their modern kind; unknown names map
/// to `Generic`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum CpuKind {
    Generic,
    I386,
    I486,
    WinChipC6,
    WinChip2,
    C3,
    I586,
    Pentium,
    PentiumMmx,
    I686,
    PentiumPro,
    Pentium2,
    Pentium3,
    Pentium3M,
    PentiumM,
    C3_2,
    Yonah,
    Pentium4,
    Pentium4M,
    Prescott,
    Nocona,
    Core2,
    Penryn,
    Bonnell,
    Silvermont,
    Nehalem,
    Westmere,
    SandyBridge,
    IvyBridge,
    Haswell,
    Broadwell,
    Skylake,
    Knl,
    K6,
    K6_2,
    K6_3,
    Athlon,
    AthlonThunderbird,
    Athlon4,
    AthlonXp,
    AthlonMp,
    Athlon64,
    Athlon64Sse3,
    AthlonFx,
    K8,
    K8Sse3,
    Opteron,
    OpteronSse3,
    AmdFam10,
    Btver1,
    Btver2,
    Bdver1,
    Bdver2,
    Bdver3,
    Bdver4,
    X86_64,
    Geode,
}

impl CpuKind {
    /// Map a CPU name to its kind. Matching is case-sensitive; unknown
    /// names map to `Generic`.
    pub fn from_name(name: &str) -> CpuKind {
        use CpuKind::*;
        match name {
            "i386" => I386,
            "i486" => I486,
            "winchip-c6" => WinChipC6,
            "winchip2" => WinChip2,
            "c3" => C3,
            "i586" => I586,
            "pentium" => Pentium,
            "pentium-mmx" => PentiumMmx,
            "i686" => I686,
            "pentiumpro" => PentiumPro,
            "pentium2" => Pentium2,
            "pentium3" => Pentium3,
            "pentium3m" => Pentium3M,
            "pentium-m" => PentiumM,
            "c3-2" => C3_2,
            "yonah" => Yonah,
            "pentium4" => Pentium4,
            "pentium4m" => Pentium4M,
            "prescott" => Prescott,
            "nocona" => Nocona,
            "core2" => Core2,
            "penryn" => Penryn,
            "bonnell" | "atom" => Bonnell,
            "silvermont" | "slm" => Silvermont,
            "nehalem" | "corei7" => Nehalem,
            "westmere" => Westmere,
            "sandybridge" | "corei7-avx" => SandyBridge,
            "ivybridge" | "core-avx-i" => IvyBridge,
            "haswell" | "core-avx2" => Haswell,
            "broadwell" => Broadwell,
            "skylake" | "skx" => Skylake,
            "knl" => Knl,
            "k6" => K6,
            "k6-2" => K6_2,
            "k6-3" => K6_3,
            "athlon" => Athlon,
            "athlon-tbird" => AthlonThunderbird,
            "athlon-4" => Athlon4,
            "athlon-xp" => AthlonXp,
            "athlon-mp" => AthlonMp,
            "athlon64" => Athlon64,
            "athlon64-sse3" => Athlon64Sse3,
            "athlon-fx" => AthlonFx,
            "k8" => K8,
            "k8-sse3" => K8Sse3,
            "opteron" => Opteron,
            "opteron-sse3" => OpteronSse3,
            "barcelona" | "amdfam10" => AmdFam10,
            "btver1" => Btver1,
            "btver2" => Btver2,
            "bdver1" => Bdver1,
            "bdver2" => Bdver2,
            "bdver3" => Bdver3,
            "bdver4" => Bdver4,
            "x86-64" => X86_64,
            "geode" => Geode,
            _ => Generic,
        }
    }

    /// Whether this CPU only exists in 32-bit mode.
    pub fn is_32bit_only(self) -> bool {
        use CpuKind::*;
        matches!(
            self,
            I386 | I486
                | WinChipC6
                | WinChip2
                | C3
                | I586
                | Pentium
                | PentiumMmx
                | I686
                | PentiumPro
                | Pentium2
                | Pentium3
                | Pentium3M
                | PentiumM
                | C3_2
                | Yonah
                | Pentium4
                | Pentium4M
                | Prescott
                | K6
                | K6_2
                | K6_3
                | Athlon
                | AthlonThunderbird
                | Athlon4
                | AthlonXp
                | AthlonMp
                | Geode
        )
    }
}

/// Select a CPU kind for a triple, rejecting 32-bit-only CPUs in 64-bit
/// mode. An empty name selects the baseline `x86-64` CPU.
pub fn cpu_kind_for_triple(triple: &Triple, cpu_name: &str) -> AbiResult<CpuKind> {
    let name = if cpu_name.is_empty() { "x86-64" } else { cpu_name };
    let kind = CpuKind::from_name(name);

    if kind.is_32bit_only() && triple.architecture == Architecture::X86_64 {
        return Err(AbiError::InvalidArchForMode(name.to_owned()));
    }

    Ok(kind)
}

/// SSE feature levels, ordered by capability.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[allow(missing_docs)]
pub enum SseLevel {
    NoSse,
    Sse1,
    Sse2,
    Sse3,
    Ssse3,
    Sse41,
    Sse42,
    Avx,
    Avx2,
    Avx512F,
}

/// The feature set of a selected CPU.
#[derive(Clone, Debug)]
pub struct CpuFeatures {
    features: FxHashSet<String>,
    sse_level: SseLevel,
}

impl CpuFeatures {
    fn new() -> Self {
        Self { features: FxHashSet::default(), sse_level: SseLevel::NoSse }
    }

    fn add(&mut self, feature: &str) {
        self.features.insert(feature.to_owned());

        let level = match feature {
            "avx512f" | "avx512cd" | "avx512er" | "avx512pf" | "avx512dq" | "avx512bw"
            | "avx512vl" => SseLevel::Avx512F,
            "avx2" => SseLevel::Avx2,
            "fma" | "avx" => SseLevel::Avx,
            "sse4" | "sse4.2" => SseLevel::Sse42,
            "sse4.1" => SseLevel::Sse41,
            "ssse3" => SseLevel::Ssse3,
            "sse3" => SseLevel::Sse3,
            "aes" | "pclmul" | "sse2" => SseLevel::Sse2,
            "sse" => SseLevel::Sse1,
            _ => SseLevel::NoSse,
        };
        self.sse_level = self.sse_level.max(level);
    }

    /// The highest SSE level implied by the feature set.
    pub fn sse_level(&self) -> SseLevel {
        self.sse_level
    }

    /// Whether AVX (256-bit vectors) is available.
    pub fn has_avx(&self) -> bool {
        self.sse_level >= SseLevel::Avx
    }

    /// Whether the named feature is present.
    pub fn has(&self, feature: &str) -> bool {
        self.features.contains(feature)
    }
}

/// Compute the feature set of a CPU kind on the given triple.
pub fn cpu_features(triple: &Triple, kind: CpuKind) -> CpuFeatures {
    use CpuKind::*;

    let mut features = CpuFeatures::new();

    // x86_64 always has SSE2.
    if triple.architecture == Architecture::X86_64 {
        features.add("sse2");
    }

    match kind {
        Generic | I386 | I486 | I586 | Pentium | I686 | PentiumPro => {}
        PentiumMmx | Pentium2 | K6 | WinChipC6 => {
            features.add("mmx");
        }
        Pentium3 | Pentium3M | C3_2 => {
            features.add("sse");
        }
        PentiumM | Pentium4 | Pentium4M | X86_64 => {
            features.add("sse2");
        }
        Yonah | Prescott | Nocona => {
            features.add("sse3");
            features.add("cx16");
        }
        Core2 | Bonnell => {
            features.add("ssse3");
            features.add("cx16");
        }
        Penryn => {
            features.add("sse4.1");
            features.add("cx16");
        }
        Skylake | Broadwell | Haswell | IvyBridge | SandyBridge | Westmere | Silvermont
        | Nehalem => {
            if matches!(kind, Skylake) {
                for f in ["avx512f", "avx512cd", "avx512dq", "avx512bw", "avx512vl"] {
                    features.add(f);
                }
            }
            if matches!(kind, Skylake | Broadwell) {
                features.add("rdseed");
                features.add("adx");
            }
            if matches!(kind, Skylake | Broadwell | Haswell) {
                for f in ["avx2", "lzcnt", "bmi", "bmi2", "rtm", "fma"] {
                    features.add(f);
                }
            }
            if matches!(kind, Skylake | Broadwell | Haswell | IvyBridge) {
                features.add("rdrnd");
                features.add("f16c");
                features.add("fsgsbase");
            }
            if matches!(kind, Skylake | Broadwell | Haswell | IvyBridge | SandyBridge) {
                features.add("avx");
            }
            if !matches!(kind, Nehalem) {
                features.add("aes");
                features.add("pclmul");
            }
            features.add("sse4.2");
            features.add("cx16");
        }
        Knl => {
            for f in [
                "avx512f", "avx512cd", "avx512er", "avx512pf", "rdseed", "adx", "lzcnt", "bmi",
                "bmi2", "rtm", "fma", "rdrnd", "f16c", "fsgsbase", "aes", "pclmul", "cx16",
            ] {
                features.add(f);
            }
        }
        K6_2 | K6_3 | WinChip2 | C3 => {
            features.add("3dnow");
        }
        Athlon | AthlonThunderbird | Geode => {
            features.add("3dnowa");
        }
        Athlon4 | AthlonXp | AthlonMp => {
            features.add("sse");
            features.add("3dnowa");
        }
        K8 | Opteron | Athlon64 | AthlonFx => {
            features.add("sse2");
            features.add("3dnowa");
        }
        AmdFam10 | K8Sse3 | OpteronSse3 | Athlon64Sse3 => {
            if matches!(kind, AmdFam10) {
                features.add("sse4a");
                features.add("lzcnt");
                features.add("popcnt");
            }
            features.add("sse3");
            features.add("3dnowa");
        }
        Btver2 | Btver1 => {
            if matches!(kind, Btver2) {
                for f in ["avx", "aes", "pclmul", "bmi", "f16c"] {
                    features.add(f);
                }
            }
            for f in ["ssse3", "sse4a", "lzcnt", "popcnt", "prfchw", "cx16"] {
                features.add(f);
            }
        }
        Bdver4 | Bdver3 | Bdver2 | Bdver1 => {
            if matches!(kind, Bdver4) {
                features.add("avx2");
                features.add("bmi2");
            }
            if matches!(kind, Bdver4 | Bdver3) {
                features.add("fsgsbase");
            }
            if matches!(kind, Bdver4 | Bdver3 | Bdver2) {
                features.add("bmi");
                features.add("fma");
                features.add("f16c");
                features.add("tbm");
            }
            // xop implies avx, sse4a and fma4.
            for f in ["xop", "avx", "lzcnt", "aes", "pclmul", "prfchw", "cx16"] {
                features.add(f);
            }
        }
    }

    features
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn legacy_aliases() {
        assert_eq!(CpuKind::from_name("atom"), CpuKind::Bonnell);
        assert_eq!(CpuKind::from_name("corei7"), CpuKind::Nehalem);
        assert_eq!(CpuKind::from_name("core-avx2"), CpuKind::Haswell);
        assert_eq!(CpuKind::from_name("slm"), CpuKind::Silvermont);
    }

    #[test]
    fn names_are_case_sensitive_and_unknown_is_generic() {
        assert_eq!(CpuKind::from_name("Atom"), CpuKind::Generic);
        assert_eq!(CpuKind::from_name("notacpu"), CpuKind::Generic);
    }

    #[test]
    fn rejects_32bit_cpu_on_64bit_triple() {
        let triple = Triple::from_str("x86_64-unknown-linux-gnu").unwrap();
        assert!(matches!(
            cpu_kind_for_triple(&triple, "pentium3"),
            Err(AbiError::InvalidArchForMode(_))
        ));
        assert_eq!(cpu_kind_for_triple(&triple, "haswell").unwrap(), CpuKind::Haswell);
        assert_eq!(cpu_kind_for_triple(&triple, "").unwrap(), CpuKind::X86_64);
    }

    #[test]
    fn avx_levels() {
        let triple = Triple::from_str("x86_64-unknown-linux-gnu").unwrap();
        assert!(cpu_features(&triple, CpuKind::Haswell).has_avx());
        assert!(cpu_features(&triple, CpuKind::SandyBridge).has_avx());
        assert!(!cpu_features(&triple, CpuKind::Nehalem).has_avx());
        assert_eq!(cpu_features(&triple, CpuKind::X86_64).sse_level(), SseLevel::Sse2);
    }
}
