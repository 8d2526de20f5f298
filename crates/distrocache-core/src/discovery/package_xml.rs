use std::{
    collections::{BTreeMap, BTreeSet},
    fs,
    path::Path,
    sync::LazyLock,
};

use regex::Regex;
use serde_json::Map;
use tracing::trace;
use walkdir::WalkDir;

use super::{Discoverer, DiscoveryError};
use crate::model::PackageDescriptor;

/// Directories holding any of these files are skipped with their subtrees.
pub const IGNORE_MARKERS: &[&str] = &["COLCON_IGNORE", "CATKIN_IGNORE", "AMENT_IGNORE"];

static COMMENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<!--.*?-->").expect("unable to compile xml comment regex")
});

// Leaf elements only: `<tag attr="..">text</tag>`.
static ELEMENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<([A-Za-z_][\w.-]*)(\s[^<>]*)?>([^<]*)</([A-Za-z_][\w.-]*)\s*>")
        .expect("unable to compile xml element regex")
});

static CONDITION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\bcondition\s*=\s*(?:"([^"]*)"|'([^']*)')"#)
        .expect("unable to compile condition attribute regex")
});

/// `$ROS_VERSION` assumed when evaluating `condition` attributes. Distribution
/// sets built by colcon are ROS 2.
pub const TARGET_ROS_VERSION: &str = "2";

const BUILD_TAGS: &[&str] = &["depend", "build_depend", "buildtool_depend"];
const RUN_TAGS: &[&str] = &[
    "depend",
    "build_export_depend",
    "buildtool_export_depend",
    "exec_depend",
    "run_depend",
];
const TEST_TAGS: &[&str] = &["test_depend"];

/// Finds ROS packages by their `package.xml` manifests.
#[derive(Debug, Default, Clone, Copy)]
pub struct PackageXmlDiscoverer;

impl Discoverer for PackageXmlDiscoverer {
    fn discover(&self, root: &Path) -> Result<Vec<PackageDescriptor>, DiscoveryError> {
        let mut packages = Vec::new();
        let mut walker = WalkDir::new(root).sort_by_file_name().into_iter();

        while let Some(entry) = walker.next() {
            let entry = entry.map_err(|source| {
                DiscoveryError::Walk {
                    root: root.to_path_buf(),
                    source,
                }
            })?;
            if !entry.file_type().is_dir() {
                continue;
            }

            let dir = entry.path();
            let hidden = entry.depth() > 0 && entry.file_name().to_string_lossy().starts_with('.');
            if hidden || IGNORE_MARKERS.iter().any(|m| dir.join(m).exists()) {
                trace!(path = %dir.display(), "skipping directory");
                walker.skip_current_dir();
                continue;
            }

            let manifest = dir.join("package.xml");
            if !manifest.is_file() {
                continue;
            }
            let content = fs::read_to_string(&manifest).map_err(|source| {
                DiscoveryError::Read {
                    path: manifest.clone(),
                    source,
                }
            })?;
            let relative = match dir.strip_prefix(root) {
                Ok(rel) if !rel.as_os_str().is_empty() => rel.to_string_lossy().into_owned(),
                _ => ".".to_string(),
            };
            let package = parse_package_xml(&content, &relative).map_err(|message| {
                DiscoveryError::InvalidManifest {
                    path: manifest.clone(),
                    message,
                }
            })?;
            trace!(name = %package.name, path = %relative, "found package");
            packages.push(package);

            // Packages do not nest.
            walker.skip_current_dir();
        }

        packages.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(packages)
    }
}

/// Extracts a descriptor from the text of a `package.xml`.
pub fn parse_package_xml(content: &str, path: &str) -> Result<PackageDescriptor, String> {
    let content = COMMENT_RE.replace_all(content, "");

    let mut elements: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for caps in ELEMENT_RE.captures_iter(&content) {
        let (Some(open), Some(text), Some(close)) = (caps.get(1), caps.get(3), caps.get(4)) else {
            continue;
        };
        if open.as_str() != close.as_str() {
            continue;
        }
        if let Some(condition) = caps.get(2).and_then(|attrs| condition_of(attrs.as_str())) {
            if !evaluate_condition(&condition) {
                trace!(tag = open.as_str(), %condition, "skipping conditional element");
                continue;
            }
        }
        let text = text.as_str().trim();
        if !text.is_empty() {
            elements
                .entry(open.as_str().to_string())
                .or_default()
                .push(unescape(text));
        }
    }

    let first = |tag: &str| elements.get(tag).and_then(|values| values.first()).cloned();
    let collect = |tags: &[&str]| -> Vec<String> {
        tags.iter()
            .filter_map(|tag| elements.get(*tag))
            .flatten()
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    };

    let name = first("name").ok_or_else(|| "missing <name>".to_string())?;

    let kind = match first("build_type") {
        Some(build_type) => format!("ros.{build_type}"),
        None if collect(&["buildtool_depend"]).iter().any(|d| d == "catkin") => {
            "ros.catkin".to_string()
        }
        None => "ros.ament_cmake".to_string(),
    };

    let mut depends = BTreeMap::new();
    for (category, tags) in [("build", BUILD_TAGS), ("run", RUN_TAGS), ("test", TEST_TAGS)] {
        let deps = collect(tags);
        if !deps.is_empty() {
            depends.insert(category.to_string(), deps);
        }
    }

    Ok(PackageDescriptor {
        name,
        kind,
        path: path.to_string(),
        version: first("version"),
        depends,
        metadata: Map::new(),
        extra: Map::new(),
    })
}

fn condition_of(attrs: &str) -> Option<String> {
    let caps = CONDITION_RE.captures(attrs)?;
    caps.get(1)
        .or_else(|| caps.get(2))
        .map(|m| unescape(m.as_str()))
}

fn variable(name: &str) -> &'static str {
    match name {
        "ROS_VERSION" => TARGET_ROS_VERSION,
        _ => "",
    }
}

fn operand(token: &str) -> &str {
    let token = token.trim().trim_matches(['"', '\'']);
    match token.strip_prefix('$') {
        Some(name) => variable(name),
        None => token,
    }
}

fn compare(lhs: &str, op: &str, rhs: &str) -> bool {
    match op {
        "==" => lhs == rhs,
        "!=" => lhs != rhs,
        "<" => lhs < rhs,
        "<=" => lhs <= rhs,
        ">" => lhs > rhs,
        ">=" => lhs >= rhs,
        _ => true,
    }
}

fn evaluate_atom(atom: &str) -> bool {
    let tokens: Vec<&str> = atom.split_whitespace().collect();
    match tokens.as_slice() {
        [lhs, op, rhs] => compare(operand(lhs), op, operand(rhs)),
        [single] => !operand(single).is_empty(),
        _ => true,
    }
}

/// Evaluates a `package.xml` condition with `or`/`and` over comparisons.
/// Parenthesised expressions are not understood and count as true, so the
/// element is kept.
pub fn evaluate_condition(condition: &str) -> bool {
    if condition.contains(['(', ')']) {
        return true;
    }
    condition
        .split(" or ")
        .any(|clause| clause.split(" and ").all(evaluate_atom))
}

fn unescape(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
