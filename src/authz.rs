//! Header-based authorization gate.
//!
//! A [`Requirement`] lists headers a request must carry and the values each
//! may take. Typical use is a shared secret between sidecars, or restricting
//! an internal route to a known caller:
//!
//! ```rust
//! use berth::authz::Requirement;
//!
//! let req = Requirement::new()
//!     .header("x-api-key", ["k-1", "k-2"])
//!     .header("x-caller", ["billing"]);
//! ```

use http::HeaderMap;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Requirement {
    // Lower-cased header name → allowed values.
    headers: Vec<(String, Vec<String>)>,
}

impl Requirement {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requires `name` with a value from `allowed`. Names are case-insensitive;
    /// values are compared exactly.
    pub fn header<I, S>(mut self, name: &str, allowed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let name = name.to_ascii_lowercase();
        let allowed: Vec<String> = allowed.into_iter().map(Into::into).collect();
        match self.headers.iter_mut().find(|(n, _)| *n == name) {
            Some((_, existing)) => *existing = allowed,
            None => self.headers.push((name, allowed)),
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    /// `true` only if every required header is present with an allowed value.
    pub fn allow(&self, headers: &HeaderMap) -> bool {
        self.headers.iter().all(|(name, allowed)| {
            headers
                .get(name.as_str())
                .and_then(|v| v.to_str().ok())
                .is_some_and(|v| allowed.iter().any(|a| a == v))
        })
    }
}
