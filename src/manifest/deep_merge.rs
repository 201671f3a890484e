//! Field-by-field merge of two app manifests.
//!
//! Precedence, per key of `target` (the primary manifest):
//! - scalar → `source`'s value when present and non-null, else `target`'s
//! - array → `target`'s items then `source`'s
//! - object → one-level shallow merge, `source`'s fields win
//!
//! Keys only in `source` are appended in `source` order. Afterwards `pages`
//! is de-duplicated by value and `subPackages` absorbs the legacy
//! `subpackages` spelling, de-duplicated by `root`. The first occurrence
//! always wins.
//!
//! Both inputs are borrowed; the result is a fresh map.

use serde_json::{Map, Value};

/// Canonical sub-package key.
pub const SUB_PACKAGES: &str = "subPackages";
/// Legacy spelling, folded into [`SUB_PACKAGES`] and never emitted.
pub const LEGACY_SUB_PACKAGES: &str = "subpackages";

const PAGES: &str = "pages";

/// Merge `source` into `target` without mutating either.
#[must_use]
pub fn merge(target: &Map<String, Value>, source: &Map<String, Value>) -> Map<String, Value> {
    let mut merged = Map::new();

    for (key, value) in target {
        let incoming = source.get(key);
        let field = match value {
            Value::Array(items) => {
                let mut out = items.clone();
                if let Some(Value::Array(more)) = incoming {
                    out.extend(more.iter().cloned());
                }
                Value::Array(out)
            }
            Value::Object(fields) => {
                let mut out = fields.clone();
                if let Some(Value::Object(more)) = incoming {
                    for (k, v) in more {
                        out.insert(k.clone(), v.clone());
                    }
                }
                Value::Object(out)
            }
            scalar => match incoming {
                Some(v) if !v.is_null() => v.clone(),
                _ => scalar.clone(),
            },
        };
        merged.insert(key.clone(), field);
    }

    for (key, value) in source {
        if !target.contains_key(key) {
            merged.insert(key.clone(), value.clone());
        }
    }

    if let Some(Value::Array(pages)) = merged.get_mut(PAGES) {
        *pages = dedup_by(std::mem::take(pages), |seen, page| seen == page);
    }

    let mut packages = take_array(&mut merged, SUB_PACKAGES);
    packages.extend(take_array(&mut merged, LEGACY_SUB_PACKAGES));
    merged.shift_remove(LEGACY_SUB_PACKAGES);
    let packages = dedup_by(packages, |seen, pkg| seen.get("root") == pkg.get("root"));
    merged.insert(SUB_PACKAGES.to_owned(), Value::Array(packages));

    merged
}

/// Take the array at `key`, leaving an empty array in place so the key keeps
/// its position. Non-array values yield nothing.
fn take_array(map: &mut Map<String, Value>, key: &str) -> Vec<Value> {
    match map.get_mut(key) {
        Some(Value::Array(items)) => std::mem::take(items),
        _ => Vec::new(),
    }
}

/// Keep the first of every group of items that `same` considers equal.
fn dedup_by(items: Vec<Value>, same: impl Fn(&Value, &Value) -> bool) -> Vec<Value> {
    let mut kept: Vec<Value> = Vec::with_capacity(items.len());
    for item in items {
        if !kept.iter().any(|seen| same(seen, &item)) {
            kept.push(item);
        }
    }
    kept
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------


#[cfg(all(test, feature = "proptests"))]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn arb_pages() -> impl Strategy<Value = Vec<String>> {
        prop::collection::vec("pages/[a-d]{1,2}/index", 0..8)
    }

    fn arb_roots() -> impl Strategy<Value = Vec<String>> {
        prop::collection::vec("pkg[a-c]", 0..6)
    }

    fn manifest(pages: &[String], roots: &[String], legacy: bool) -> Map<String, Value> {
        let mut m = Map::new();
        m.insert(
            "pages".to_owned(),
            Value::Array(pages.iter().cloned().map(Value::String).collect()),
        );
        let packages = roots
            .iter()
            .map(|r| serde_json::json!({ "root": r }))
            .collect();
        let key = if legacy { LEGACY_SUB_PACKAGES } else { SUB_PACKAGES };
        m.insert(key.to_owned(), Value::Array(packages));
        m
    }

    proptest! {
        #[test]
        fn prop_pages_unique_first_seen(
            a in arb_pages(),
            b in arb_pages(),
        ) {
            let merged = merge(&manifest(&a, &[], false), &manifest(&b, &[], false));
            let pages: Vec<String> = merged["pages"]
                .as_array()
                .unwrap()
                .iter()
                .map(|v| v.as_str().unwrap().to_owned())
                .collect();

            let mut expected: Vec<String> = Vec::new();
            for p in a.iter().chain(b.iter()) {
                if !expected.contains(p) {
                    expected.push(p.clone());
                }
            }
            prop_assert_eq!(pages, expected);
        }

        #[test]
        fn prop_one_sub_package_per_root(
            a in arb_roots(),
            b in arb_roots(),
            legacy_a in any::<bool>(),
            legacy_b in any::<bool>(),
        ) {
            let merged = merge(&manifest(&[], &a, legacy_a), &manifest(&[], &b, legacy_b));
            let roots: Vec<&str> = merged[SUB_PACKAGES]
                .as_array()
                .unwrap()
                .iter()
                .map(|v| v["root"].as_str().unwrap())
                .collect();
            let mut unique = roots.clone();
            unique.sort_unstable();
            unique.dedup();
            prop_assert_eq!(roots.len(), unique.len());
            for r in a.iter().chain(b.iter()) {
                prop_assert!(roots.contains(&r.as_str()));
            }
            prop_assert!(!merged.contains_key(LEGACY_SUB_PACKAGES));
        }

        #[test]
        fn prop_merge_is_pure(a in arb_pages(), b in arb_roots()) {
            let primary = manifest(&a, &b, true);
            let secondary = manifest(&a, &b, false);
            let (p, s) = (primary.clone(), secondary.clone());
            let first = merge(&primary, &secondary);
            let second = merge(&primary, &secondary);
            prop_assert_eq!(&primary, &p);
            prop_assert_eq!(&secondary, &s);
            prop_assert_eq!(first, second);
        }
    }
}
