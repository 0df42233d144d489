//! Method-level simulation eligibility.

/// Substring that forces simulation of a method regardless of the lists.
pub const SIMULATE_MARKER: &str = "$simulate$";

/// Methods simulated when allow-list mode is on.
pub const DEFAULT_ALLOW_LIST: &[&str] = &[
    "other.TestByte.testDotProdComplex",
    "other.TestByte.testDotProdComplexSignedCastedToUnsigned",
    "other.TestByte.testDotProdComplexUnsigned",
    "other.TestByte.testDotProdComplexUnsignedCastedToSigned",
];

/// Methods never simulated outside allow-list mode: process entry, class
/// initializers, and library namespaces.
pub const DEFAULT_DENY_LIST: &[&str] = &[
    "main", "<clinit>", "java.", "sun.", "dalvik.", "android.", "libcore.",
];

/// Decides from a method's pretty name whether it should run under simulation.
///
/// Rules, first match wins:
/// 1. the name contains the marker: simulate;
/// 2. allow-list mode: simulate iff an allow-list entry is a substring;
/// 3. a deny-list entry is a substring: do not simulate;
/// 4. otherwise simulate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationPolicy {
    /// Substring that forces simulation. Empty disables rule 1 rather than
    /// matching every name.
    pub marker: String,
    pub allow_list_mode: bool,
    pub allow_list: Vec<String>,
    pub deny_list: Vec<String>,
}

impl Default for SimulationPolicy {
    fn default() -> Self {
        Self {
            marker: SIMULATE_MARKER.to_string(),
            allow_list_mode: false,
            allow_list: DEFAULT_ALLOW_LIST.iter().map(ToString::to_string).collect(),
            deny_list: DEFAULT_DENY_LIST.iter().map(ToString::to_string).collect(),
        }
    }
}

impl SimulationPolicy {
    #[must_use]
    pub fn with_allow_list_mode(mut self, enabled: bool) -> Self {
        self.allow_list_mode = enabled;
        self
    }

    #[must_use]
    pub fn with_allow_list<I, S>(mut self, entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allow_list = entries.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_deny_list<I, S>(mut self, entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.deny_list = entries.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn can_simulate(&self, name: &str) -> bool {
        if !self.marker.is_empty() && name.contains(self.marker.as_str()) {
            return true;
        }
        if self.allow_list_mode {
            return matches_any(name, &self.allow_list);
        }
        !matches_any(name, &self.deny_list)
    }
}

fn matches_any(name: &str, entries: &[String]) -> bool {
    entries.iter().any(|entry| name.contains(entry.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_denies_library_and_entry_methods() {
        let policy = SimulationPolicy::default();
        assert!(!policy.can_simulate("void Main.main(java.lang.String[])"));
        assert!(!policy.can_simulate("void Foo.<clinit>()"));
        assert!(!policy.can_simulate("int java.lang.String.length()"));
        assert!(!policy.can_simulate("void dalvik.system.VMRuntime.gc()"));
        assert!(policy.can_simulate("int Foo.bar(int)"));
    }

    #[test]
    fn test_marker_overrides_deny_list() {
        let policy = SimulationPolicy::default();
        assert!(policy.can_simulate("int Main.$simulate$main()"));
        assert!(policy.can_simulate("int java.lang.Math.$simulate$abs(int)"));
    }

    #[test]
    fn test_empty_marker_does_not_force_simulation() {
        let policy = SimulationPolicy {
            marker: String::new(),
            ..SimulationPolicy::default()
        };
        assert!(!policy.can_simulate("int java.lang.Math.abs(int)"));
        assert!(policy.can_simulate("int Foo.bar(int)"));
    }

    #[test]
    fn test_allow_list_mode_ignores_deny_list() {
        let policy = SimulationPolicy::default()
            .with_allow_list_mode(true)
            .with_allow_list(["java.lang.Math.abs"]);
        assert!(policy.can_simulate("int java.lang.Math.abs(int)"));
        assert!(!policy.can_simulate("int Foo.bar(int)"));
    }

    #[test]
    fn test_default_allow_list_matches_dot_product_tests() {
        let policy = SimulationPolicy::default().with_allow_list_mode(true);
        assert!(
            policy.can_simulate("int other.TestByte.testDotProdComplexUnsigned(byte[], byte[])")
        );
        assert!(!policy.can_simulate("int other.TestByte.testDotProdSimple(byte[], byte[])"));
    }

    #[test]
    fn test_policy_is_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SimulationPolicy>();
    }
}
