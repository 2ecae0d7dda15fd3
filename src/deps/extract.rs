//! Discover external packages referenced from source text.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;

// import 'pkg' / import x from 'pkg' / import { a as b } from "pkg"
static IMPORT_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"import\s+(?:(?:[\w*\s{},]+)\s+from\s+)?["']([^"']+)["']"#)
        .expect("import pattern is valid")
});

// require('pkg')
static REQUIRE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"require\(\s*["']([^"']+)["']\s*\)"#).expect("require pattern is valid")
});

// export * from 'pkg' / export { x } from "pkg"
static EXPORT_FROM_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"export\s+(?:\*|\{[^}]*\})\s+from\s+["']([^"']+)["']"#)
        .expect("export pattern is valid")
});

// await import('pkg')
static DYNAMIC_IMPORT_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\bimport\(\s*["']([^"']+)["']\s*\)"#).expect("dynamic import pattern is valid")
});

static WINDOWS_ABSOLUTE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z]:\\").expect("windows path pattern is valid"));

/// Every distinct top-level package referenced by `code`.
pub fn extract_packages(code: &str) -> BTreeSet<String> {
    let mut packages = BTreeSet::new();
    for pattern in [
        &*IMPORT_PATTERN,
        &*REQUIRE_PATTERN,
        &*EXPORT_FROM_PATTERN,
        &*DYNAMIC_IMPORT_PATTERN,
    ] {
        for caps in pattern.captures_iter(code) {
            if let Some(base) = caps.get(1).and_then(|m| base_package(m.as_str())) {
                packages.insert(base);
            }
        }
    }
    packages
}

fn is_external(specifier: &str) -> bool {
    !specifier.starts_with('.')
        && !specifier.starts_with('/')
        && !specifier.starts_with("file:")
        && !WINDOWS_ABSOLUTE.is_match(specifier)
}

/// `@scope/name/deep` → `@scope/name`, `lodash/fp` → `lodash`.
fn base_package(specifier: &str) -> Option<String> {
    if !is_external(specifier) {
        return None;
    }
    let mut parts = specifier.split('/');
    let first = parts.next()?;
    if first.starts_with('@') {
        let name = parts.next()?;
        Some(format!("{}/{}", first, name))
    } else {
        Some(first.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_extracts_import_forms() {
        let code = r#"
import React, { useState } from 'react';
import * as d3 from "d3";
import 'normalize.css';
import { motion as m } from 'framer-motion/dist';
const _ = require('lodash/fp');
export * from '@radix-ui/react-dialog';
export { format } from "date-fns";
const mod = await import('@scope/pkg/sub/path');
"#;
        assert_eq!(
            extract_packages(code),
            set(&[
                "@radix-ui/react-dialog",
                "@scope/pkg",
                "d3",
                "date-fns",
                "framer-motion",
                "lodash",
                "normalize.css",
                "react",
            ])
        );
    }

    #[test]
    fn test_skips_local_references() {
        let code = r#"
import App from './App';
import styles from '../styles.css';
import abs from '/abs/path';
import f from 'file:../local-pkg';
const w = require('C:\\lib\\thing');
"#;
        assert!(extract_packages(code).is_empty());
    }

    #[test]
    fn test_duplicates_collapse() {
        let code = "import a from 'react';\nimport b from 'react/jsx-runtime';";
        assert_eq!(extract_packages(code), set(&["react"]));
    }
}
