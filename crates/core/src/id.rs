// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Prefixed identifier newtypes.
//!
//! Every persisted record carries an id of the form `{prefix}{nanoid}`:
//! a 3-4 character type tag plus 19 random characters, 23 bytes total so
//! the whole id sits in `SmolStr`'s inline buffer.

/// Define a prefixed id newtype over `SmolStr`.
///
/// Alongside `new()` and `from_string()`, the type gets `as_str()`,
/// `suffix()` (id without the tag), `short(n)` (truncated suffix, for
/// human-facing names), `Display`, the string conversions, and str-like
/// comparison and borrow impls.
#[macro_export]
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        pub struct $name:ident($prefix:literal);
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub smol_str::SmolStr);

        impl $name {
            pub const PREFIX: &'static str = $prefix;

            pub fn new() -> Self {
                let mut id = String::with_capacity(23);
                id.push_str(Self::PREFIX);
                id.push_str(&nanoid::nanoid!(19));
                Self(smol_str::SmolStr::new(&id))
            }

            /// Wrap an id read back from storage or a request.
            pub fn from_string(id: impl Into<smol_str::SmolStr>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// The id without its type tag.
            pub fn suffix(&self) -> &str {
                self.0.strip_prefix(Self::PREFIX).unwrap_or(&self.0)
            }

            /// At most `n` characters of the suffix.
            pub fn short(&self, n: usize) -> &str {
                let suffix = self.suffix();
                &suffix[..n.min(suffix.len())]
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self::from_string(s)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self::from_string(s)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl PartialEq<&str> for $name {
            fn eq(&self, other: &&str) -> bool {
                self.0 == *other
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl std::ops::Deref for $name {
            type Target = str;

            fn deref(&self) -> &str {
                &self.0
            }
        }
    };
}

#[cfg(test)]
#[path = "id_tests.rs"]
mod tests;
